//! HTML and plaintext rendering of a [`Document`]
//!
//! Rendering is a single pass over the merged runs. Each run describes the
//! stack of elements it wants to sit in: block frames (alignment, quote
//! indents, heading or `pre`, lists and their items) followed by inline
//! frames (bold, italic, underline, strikethrough, super/subscript, styled
//! span, link). Before any content is written the open stack is diffed with
//! that description: the shared prefix stays open, the rest is closed and
//! the missing frames are opened. A tag therefore opens only when the
//! previous run lacked it and closes only when the next content lacks it,
//! and since frames open lazily right before content no empty element is
//! ever produced.
//!
//! List items are the one frame with extra state. A newline finishes the
//! current item without closing it, so a more deeply indented run can still
//! nest its list inside it; any other run closes it.

use crate::document::{
    Document, ListKind, Segment, StyleRun, ALIGNMENT_CENTER, ALIGNMENT_JUSTIFY, ALIGNMENT_RIGHT,
    FONT_WEIGHT_BOLD, FONT_WEIGHT_BOLD_ITALIC, FONT_WEIGHT_ITALIC, STYLE_TYPE_HEADING,
    STYLE_TYPE_MONOSPACED, STYLE_TYPE_SUBHEADING, STYLE_TYPE_TITLE,
};
use crate::objects::{EmbeddedContent, ObjectResolver, MISSING_OBJECT_MARKER};

const LINE_SEPARATOR: char = '\u{2028}';
const NULL_SYMBOL: char = '\u{2400}';

/// Output of rendering one document
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedDocument<O> {
    /// Text with placeholders replaced by `{description}`
    pub plaintext: String,
    /// HTML fragment
    pub html: String,
    /// Resolved embedded objects in document order
    pub objects: Vec<O>,
    /// Placeholders that rendered as the missing marker
    pub missing: usize,
}

/// Escape text for HTML element content and double-quoted attributes.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
enum Frame {
    Align(&'static str),
    Quote { level: usize, styled: bool },
    Block(&'static str),
    List { level: usize, kind: ListKind, strict: bool },
    Item { level: usize, checked: Option<bool>, uuid: Option<Vec<u8>>, host: bool },
    Bold,
    Italic,
    Underline,
    Strike,
    Superscript,
    Subscript,
    Span(String),
    Link(String),
}

impl Frame {
    fn open_tag(&self) -> String {
        match self {
            Frame::Align(align) => format!("<div style=\"text-align: {}\">", align),
            Frame::Quote { styled: true, .. } => "<blockquote class=\"block-quote\">".to_string(),
            Frame::Quote { .. } => "<blockquote>".to_string(),
            Frame::Block(tag) => format!("<{}>", tag),
            Frame::List { kind, .. } => match kind {
                ListKind::Dotted => "<ul class=\"dotted\">".to_string(),
                ListKind::Dashed => "<ul class=\"dashed\">".to_string(),
                ListKind::Numbered => "<ol>".to_string(),
                ListKind::Checklist => "<ul class=\"checklist\">".to_string(),
            },
            Frame::Item { checked: Some(true), .. } => "<li class=\"checked\">".to_string(),
            Frame::Item { checked: Some(false), .. } => "<li class=\"unchecked\">".to_string(),
            Frame::Item { .. } => "<li>".to_string(),
            Frame::Bold => "<b>".to_string(),
            Frame::Italic => "<i>".to_string(),
            Frame::Underline => "<u>".to_string(),
            Frame::Strike => "<s>".to_string(),
            Frame::Superscript => "<sup>".to_string(),
            Frame::Subscript => "<sub>".to_string(),
            Frame::Span(style) => format!("<span style=\"{}\">", escape_html(style)),
            Frame::Link(href) => format!("<a href=\"{}\" target=\"_blank\">", escape_html(href)),
        }
    }

    fn close_tag(&self) -> &'static str {
        match self {
            Frame::Align(_) => "</div>",
            Frame::Quote { .. } => "</blockquote>",
            Frame::Block("h1") => "</h1>",
            Frame::Block("h2") => "</h2>",
            Frame::Block("h3") => "</h3>",
            Frame::Block(_) => "</pre>",
            Frame::List { kind: ListKind::Numbered, .. } => "</ol>",
            Frame::List { .. } => "</ul>",
            Frame::Item { .. } => "</li>",
            Frame::Bold => "</b>",
            Frame::Italic => "</i>",
            Frame::Underline => "</u>",
            Frame::Strike => "</s>",
            Frame::Superscript => "</sup>",
            Frame::Subscript => "</sub>",
            Frame::Span(_) => "</span>",
            Frame::Link(_) => "</a>",
        }
    }
}

struct OpenFrame {
    frame: Frame,
    finished: bool,
}

fn frame_matches(open: &OpenFrame, desired: &Frame) -> bool {
    match (&open.frame, desired) {
        (
            Frame::List { level: a, kind: ka, .. },
            Frame::List { level: b, kind: kb, strict },
        ) => a == b && (!strict || ka == kb),
        (
            Frame::Item { level: a, uuid: ua, .. },
            Frame::Item { level: b, uuid: ub, host, .. },
        ) => a == b && (*host || (!open.finished && ua == ub)),
        (a, b) => a == b,
    }
}

#[derive(Default)]
struct HtmlWriter {
    out: String,
    open: Vec<OpenFrame>,
}

impl HtmlWriter {
    fn sync(&mut self, desired: &[Frame]) {
        let mut keep = 0;
        while keep < self.open.len()
            && keep < desired.len()
            && frame_matches(&self.open[keep], &desired[keep])
        {
            keep += 1;
        }
        self.close_to(keep);
        for frame in &desired[keep..] {
            self.out.push_str(&frame.open_tag());
            self.open.push(OpenFrame {
                frame: frame.clone(),
                finished: false,
            });
        }
    }

    fn close_to(&mut self, depth: usize) {
        while self.open.len() > depth {
            if let Some(open) = self.open.pop() {
                self.out.push_str(open.frame.close_tag());
            }
        }
    }

    /// Finish the innermost list item: close what is inside it and mark it
    /// so only a nested list can reuse it.
    fn finish_item(&mut self) {
        if let Some(pos) = self.open.iter().rposition(|o| matches!(o.frame, Frame::Item { .. })) {
            self.close_to(pos + 1);
            self.open[pos].finished = true;
        }
    }

    fn write(&mut self, desired: &[Frame], content: &str) {
        self.sync(desired);
        self.out.push_str(content);
    }

    fn finish(mut self) -> String {
        self.close_to(0);
        self.out
    }
}

fn is_heading(style_type: i32) -> bool {
    matches!(style_type, STYLE_TYPE_TITLE | STYLE_TYPE_HEADING | STYLE_TYPE_SUBHEADING)
}

fn block_frames(run: &StyleRun) -> Vec<Frame> {
    let mut frames = Vec::new();

    match run.alignment() {
        ALIGNMENT_CENTER => frames.push(Frame::Align("center")),
        ALIGNMENT_RIGHT => frames.push(Frame::Align("right")),
        ALIGNMENT_JUSTIFY => frames.push(Frame::Align("justify")),
        _ => {}
    }

    if let Some(kind) = run.list_kind() {
        let depth = run.normalized_indent();
        let (uuid, checked) = match run.checklist() {
            Some((uuid, done)) => (Some(uuid.to_vec()), Some(done)),
            None if kind == ListKind::Checklist => (None, Some(false)),
            None => (None, None),
        };
        for level in 0..=depth {
            let innermost = level == depth;
            frames.push(Frame::List {
                level,
                kind,
                strict: innermost,
            });
            frames.push(Frame::Item {
                level,
                checked: if innermost { checked } else { None },
                uuid: if innermost { uuid.clone() } else { None },
                host: !innermost,
            });
        }
        return frames;
    }

    let style_type = if run.has_style_type() { Some(run.style_type()) } else { None };
    let block = match style_type {
        Some(STYLE_TYPE_TITLE) => Some("h1"),
        Some(STYLE_TYPE_HEADING) => Some("h2"),
        Some(STYLE_TYPE_SUBHEADING) => Some("h3"),
        Some(STYLE_TYPE_MONOSPACED) => Some("pre"),
        _ => None,
    };

    // Monospaced text carries its indentation as literal spaces
    if block != Some("pre") {
        for level in 0..run.normalized_indent() {
            frames.push(Frame::Quote {
                level,
                styled: level == 0 && run.is_block_quote(),
            });
        }
    }
    if let Some(tag) = block {
        frames.push(Frame::Block(tag));
    }
    frames
}

fn emphasis_colors(emphasis: i32) -> Option<(&'static str, &'static str)> {
    match emphasis {
        1 => Some(("#FF00FF", "#BA55D333")),
        2 => Some(("#FF4081", "#D5000044")),
        3 => Some(("#FBC02D", "#FF6F0022")),
        4 => Some(("#8DE5DB", "#289C8ECC")),
        5 => Some(("#BBDEFB", "#2196F3")),
        _ => None,
    }
}

fn span_style(run: &StyleRun) -> Option<String> {
    let inner = run.inner();
    let mut attrs: Vec<(&str, String)> = Vec::new();

    if let Some(font) = inner.font.as_ref() {
        if let Some(name) = font.font_name.as_ref() {
            attrs.push(("font-family", format!("'{}'", name.replace('\'', "\\'"))));
        }
        if let Some(size) = font.point_size.filter(|s| *s != 0.0) {
            attrs.push(("font-size", format!("{}px", size)));
        }
    }
    if let Some(color) = inner.color.as_ref() {
        attrs.push(("color", crate::document::hex_color(color)));
    }
    if let Some((fg, bg)) = inner.emphasis_style.and_then(emphasis_colors) {
        attrs.retain(|(k, _)| *k != "color");
        attrs.push(("color", fg.to_string()));
        attrs.push(("background-color", bg.to_string()));
    }

    if attrs.is_empty() {
        return None;
    }
    Some(
        attrs
            .iter()
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect::<Vec<_>>()
            .join("; "),
    )
}

fn inline_frames(run: &StyleRun) -> Vec<Frame> {
    let inner = run.inner();
    let mut frames = Vec::new();
    let heading = run.has_style_type() && is_heading(run.style_type());

    match run.font_weight() {
        FONT_WEIGHT_BOLD if !heading => frames.push(Frame::Bold),
        FONT_WEIGHT_ITALIC => frames.push(Frame::Italic),
        FONT_WEIGHT_BOLD_ITALIC => {
            if !heading {
                frames.push(Frame::Bold);
            }
            frames.push(Frame::Italic);
        }
        _ => {}
    }
    if inner.underlined == Some(1) {
        frames.push(Frame::Underline);
    }
    if inner.strikethrough == Some(1) {
        frames.push(Frame::Strike);
    }
    match inner.superscript {
        Some(1) => frames.push(Frame::Superscript),
        Some(-1) => frames.push(Frame::Subscript),
        _ => {}
    }
    if let Some(style) = span_style(run) {
        frames.push(Frame::Span(style));
    }
    if let Some(link) = inner.link.as_ref().filter(|l| !l.is_empty()) {
        frames.push(Frame::Link(link.clone()));
    }
    frames
}

/// Split on `\n` and U+2028, keeping the separators as their own pieces.
fn split_lines(text: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, c) in text.char_indices() {
        if c == '\n' || c == LINE_SEPARATOR {
            if start < idx {
                pieces.push(&text[start..idx]);
            }
            pieces.push(&text[idx..idx + c.len_utf8()]);
            start = idx + c.len_utf8();
        }
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn render_text(writer: &mut HtmlWriter, segment: &Segment, blocks: &[Frame]) {
    let run = &segment.run;
    let in_list = run.list_kind().is_some();
    let in_pre = blocks.contains(&Frame::Block("pre"));
    let mut full = blocks.to_vec();
    full.extend(inline_frames(run));

    for piece in split_lines(&segment.text) {
        match piece {
            "\n" if in_list => writer.finish_item(),
            "\n" if in_pre => writer.write(&full, "\n"),
            "\n" => writer.write(&full, "<br>"),
            "\u{2028}" => writer.write(&full, "<br>"),
            text => {
                let text = text.replace('\0', &NULL_SYMBOL.to_string());
                writer.write(&full, &escape_html(&text));
            }
        }
    }
}

/// Render a document, resolving each embedded-object placeholder in order.
pub fn render_document<R: ObjectResolver>(
    document: &Document,
    resolver: &mut R,
) -> RenderedDocument<R::Object> {
    let segments = document.segments();
    let mut writer = HtmlWriter::default();
    let mut plaintext = String::new();
    let mut objects = Vec::new();
    let mut missing = 0usize;

    for (index, segment) in segments.iter().enumerate() {
        let run = &segment.run;
        let previous = index.checked_sub(1).and_then(|i| segments.get(i));
        if let Some(previous) = previous {
            if previous.run.list_kind().is_some() && !previous.run.same_style_type(run) {
                writer.finish_item();
            }
        }

        let blocks = block_frames(run);

        let Some(attachment) = run.attachment() else {
            plaintext.push_str(&segment.text);
            render_text(&mut writer, segment, &blocks);
            continue;
        };

        match resolver.resolve(attachment) {
            Some(object) => {
                plaintext.push_str(&format!("{{{}}}", object.describe()));
                let html = object.render_html();
                if !html.is_empty() {
                    writer.write(&blocks, &html);
                }
                objects.push(object);
            }
            None => {
                tracing::debug!(
                    "Embedded object {:?} ({:?}) could not be reconstructed",
                    attachment.attachment_identifier,
                    attachment.type_uti
                );
                missing += 1;
                plaintext.push_str(&format!("{{{}}}", MISSING_OBJECT_MARKER));
                writer.write(&blocks, &escape_html(MISSING_OBJECT_MARKER));
            }
        }
    }

    RenderedDocument {
        plaintext,
        html: writer.finish(),
        objects,
        missing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{
        STYLE_BLOCK_QUOTE, STYLE_TYPE_CHECKBOX, STYLE_TYPE_DOTTED_LIST, STYLE_TYPE_NUMBERED_LIST,
    };
    use crate::objects::NoObjects;
    use crate::proto_types::{AttachmentInfo, AttributeRun, Checklist, Color, Note, ParagraphStyle};

    fn doc(text: &str, runs: Vec<AttributeRun>) -> Document {
        Document::from_note(
            Note {
                note_text: text.to_string(),
                attribute_run: runs,
            },
            1,
        )
    }

    fn plain(length: i32) -> AttributeRun {
        AttributeRun {
            length,
            ..Default::default()
        }
    }

    fn paragraph(length: i32, style_type: i32) -> AttributeRun {
        AttributeRun {
            length,
            paragraph_style: Some(ParagraphStyle {
                style_type: Some(style_type),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn html(document: &Document) -> String {
        render_document(document, &mut NoObjects).html
    }

    #[test]
    fn test_headings_and_pre() {
        assert_eq!(html(&doc("test", vec![paragraph(4, STYLE_TYPE_TITLE)])), "<h1>test</h1>");
        assert_eq!(html(&doc("test", vec![paragraph(4, STYLE_TYPE_HEADING)])), "<h2>test</h2>");
        assert_eq!(html(&doc("test", vec![paragraph(4, STYLE_TYPE_SUBHEADING)])), "<h3>test</h3>");
        assert_eq!(
            html(&doc("a\nb", vec![paragraph(3, STYLE_TYPE_MONOSPACED)])),
            "<pre>a\nb</pre>"
        );
    }

    #[test]
    fn test_title_then_body() {
        let mut bold = plain(4);
        bold.font_weight = Some(FONT_WEIGHT_BOLD);
        let document = doc("Title\nbody", vec![paragraph(6, STYLE_TYPE_TITLE), bold]);
        assert_eq!(html(&document), "<h1>Title<br></h1><b>body</b>");
    }

    #[test]
    fn test_bold_suppressed_in_heading() {
        let mut run = paragraph(2, STYLE_TYPE_TITLE);
        run.font_weight = Some(FONT_WEIGHT_BOLD_ITALIC);
        assert_eq!(html(&doc("hi", vec![run])), "<h1><i>hi</i></h1>");
    }

    #[test]
    fn test_decorations_nest_across_runs() {
        let mut bold = plain(3);
        bold.font_weight = Some(FONT_WEIGHT_BOLD);
        let mut bold_underline = bold.clone();
        bold_underline.length = 3;
        bold_underline.underlined = Some(1);
        let document = doc("abcdef", vec![bold, bold_underline]);
        assert_eq!(html(&document), "<b>abc<u>def</u></b>");
    }

    #[test]
    fn test_sub_sup_strike_link_color() {
        let mut sub = plain(1);
        sub.superscript = Some(-1);
        let mut sup = plain(1);
        sup.superscript = Some(1);
        let mut strike = plain(1);
        strike.strikethrough = Some(1);
        let mut link = plain(1);
        link.link = Some("https://example.com/?a=1&b=2".to_string());
        let mut colored = plain(1);
        colored.color = Some(Color { red: 1.0, green: 0.0, blue: 0.0, alpha: 1.0 });

        let document = doc("abcde", vec![sub, sup, strike, link, colored]);
        assert_eq!(
            html(&document),
            "<sub>a</sub><sup>b</sup><s>c</s>\
             <a href=\"https://example.com/?a=1&amp;b=2\" target=\"_blank\">d</a>\
             <span style=\"color: #FF0000\">e</span>"
        );
    }

    #[test]
    fn test_checklist_items() {
        let mut done = paragraph(5, STYLE_TYPE_CHECKBOX);
        done.paragraph_style.as_mut().unwrap().checklist = Some(Checklist { uuid: vec![1], done: 1 });
        let mut todo = paragraph(4, STYLE_TYPE_CHECKBOX);
        todo.paragraph_style.as_mut().unwrap().checklist = Some(Checklist { uuid: vec![2], done: 0 });

        let document = doc("Milk\nEggs", vec![done, todo]);
        assert_eq!(
            html(&document),
            "<ul class=\"checklist\"><li class=\"checked\">Milk</li><li class=\"unchecked\">Eggs</li></ul>"
        );
    }

    #[test]
    fn test_multi_run_list_is_one_list() {
        let first = paragraph(4, STYLE_TYPE_DOTTED_LIST);
        let mut second = paragraph(4, STYLE_TYPE_DOTTED_LIST);
        second.font_weight = Some(FONT_WEIGHT_BOLD);
        let third = paragraph(2, STYLE_TYPE_DOTTED_LIST);
        let document = doc("one\ntwo\nxy", vec![first, second, third]);
        assert_eq!(
            html(&document),
            "<ul class=\"dotted\"><li>one</li><li><b>two</b></li><li>xy</li></ul>"
        );
    }

    #[test]
    fn test_item_spanning_runs_stays_open() {
        let first = paragraph(2, STYLE_TYPE_NUMBERED_LIST);
        let mut second = paragraph(3, STYLE_TYPE_NUMBERED_LIST);
        second.font_weight = Some(FONT_WEIGHT_ITALIC);
        let document = doc("abcd\n", vec![first, second]);
        assert_eq!(html(&document), "<ol><li>ab<i>cd</i></li></ol>");
    }

    #[test]
    fn test_nested_list_inside_parent_item() {
        let outer = paragraph(2, STYLE_TYPE_DOTTED_LIST);
        let mut inner = paragraph(2, STYLE_TYPE_DOTTED_LIST);
        inner.paragraph_style.as_mut().unwrap().indent_amount = Some(1);
        let back = paragraph(1, STYLE_TYPE_DOTTED_LIST);
        let document = doc("a\nb\nc", vec![outer, inner, back]);
        assert_eq!(
            html(&document),
            "<ul class=\"dotted\"><li>a<ul class=\"dotted\"><li>b</li></ul></li><li>c</li></ul>"
        );
    }

    #[test]
    fn test_block_quote_and_alignment() {
        let mut quote = paragraph(5, -1);
        quote.paragraph_style.as_mut().unwrap().block_quote = Some(STYLE_BLOCK_QUOTE);
        let mut centered = paragraph(3, -1);
        centered.paragraph_style.as_mut().unwrap().alignment = Some(ALIGNMENT_CENTER);
        let document = doc("quoteabc", vec![quote, centered]);
        assert_eq!(
            html(&document),
            "<blockquote class=\"block-quote\">quote</blockquote><div style=\"text-align: center\">abc</div>"
        );
    }

    #[test]
    fn test_line_separator_and_null() {
        let document = doc("a\u{2028}b\0<", vec![plain(5)]);
        assert_eq!(html(&document), "a<br>b\u{2400}&lt;");
    }

    #[test]
    fn test_missing_object_marker() {
        let attachment = AttributeRun {
            length: 1,
            attachment_info: Some(AttachmentInfo {
                attachment_identifier: Some("GONE".to_string()),
                type_uti: Some("public.jpeg".to_string()),
            }),
            ..Default::default()
        };
        let document = doc("x\u{FFFC}y", vec![plain(1), attachment, plain(1)]);
        let rendered = render_document(&document, &mut NoObjects);
        assert_eq!(rendered.missing, 1);
        assert_eq!(rendered.plaintext, "x{[missing]}y");
        assert_eq!(rendered.html, "x[missing]y");
    }

    #[test]
    fn test_emphasis_overrides_color() {
        let mut run = plain(1);
        run.color = Some(Color { red: 0.0, green: 0.0, blue: 0.0, alpha: 1.0 });
        run.emphasis_style = Some(1);
        assert_eq!(
            html(&doc("x", vec![run])),
            "<span style=\"color: #FF00FF; background-color: #BA55D333\">x</span>"
        );
    }

    #[test]
    fn test_empty_list_line_emits_nothing() {
        let document = doc("\n\n", vec![paragraph(2, STYLE_TYPE_DOTTED_LIST)]);
        assert_eq!(html(&document), "");
    }
}
