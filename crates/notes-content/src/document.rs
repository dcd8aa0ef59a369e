//! Document model: text buffer plus style runs
//!
//! [`StyleRun`] is a thin adapter over the decoded
//! [`AttributeRun`](crate::proto_types::AttributeRun) message that owns the
//! comparison rules the renderer relies on. Runs are kept in a plain `Vec`
//! and neighbours are looked up by position.

use crate::decompress::gunzip;
use crate::proto_types::{AttachmentInfo, AttributeRun, Color, Note, NoteStoreProto, ParagraphStyle};
use crate::{Error, Result};
use prost::Message;

/// Paragraph without an explicit style type
pub const STYLE_TYPE_DEFAULT: i32 = -1;
/// `h1`
pub const STYLE_TYPE_TITLE: i32 = 0;
/// `h2`
pub const STYLE_TYPE_HEADING: i32 = 1;
/// `h3`
pub const STYLE_TYPE_SUBHEADING: i32 = 2;
/// `pre`
pub const STYLE_TYPE_MONOSPACED: i32 = 4;
/// Bulleted list
pub const STYLE_TYPE_DOTTED_LIST: i32 = 100;
/// Dashed list
pub const STYLE_TYPE_DASHED_LIST: i32 = 101;
/// Numbered list
pub const STYLE_TYPE_NUMBERED_LIST: i32 = 102;
/// Checklist
pub const STYLE_TYPE_CHECKBOX: i32 = 103;

/// `ParagraphStyle.block_quote` value marking a block quote
pub const STYLE_BLOCK_QUOTE: i32 = 1;

/// Default (left) alignment
pub const ALIGNMENT_LEFT: i32 = 0;
/// Centered text
pub const ALIGNMENT_CENTER: i32 = 1;
/// Right-aligned text
pub const ALIGNMENT_RIGHT: i32 = 2;
/// Justified text
pub const ALIGNMENT_JUSTIFY: i32 = 3;

/// Regular weight
pub const FONT_WEIGHT_DEFAULT: i32 = 0;
/// Bold
pub const FONT_WEIGHT_BOLD: i32 = 1;
/// Italic
pub const FONT_WEIGHT_ITALIC: i32 = 2;
/// Bold italic
pub const FONT_WEIGHT_BOLD_ITALIC: i32 = 3;

/// Character standing in for an embedded object in the text buffer
pub const OBJECT_PLACEHOLDER: char = '\u{FFFC}';

/// List flavours a paragraph can belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    /// `ul.dotted`
    Dotted,
    /// `ul.dashed`
    Dashed,
    /// `ol`
    Numbered,
    /// `ul.checklist`
    Checklist,
}

/// One formatting span of a note
#[derive(Debug, Clone, PartialEq)]
pub struct StyleRun {
    run: AttributeRun,
}

impl From<AttributeRun> for StyleRun {
    fn from(run: AttributeRun) -> Self {
        Self { run }
    }
}

impl StyleRun {
    /// The wrapped protobuf message
    pub fn inner(&self) -> &AttributeRun {
        &self.run
    }

    /// Declared length in platform length units
    pub fn length(&self) -> usize {
        usize::try_from(self.run.length).unwrap_or(0)
    }

    fn paragraph(&self) -> Option<&ParagraphStyle> {
        self.run.paragraph_style.as_ref()
    }

    /// A run has a style type as soon as it carries a paragraph style;
    /// an unset type reads as [`STYLE_TYPE_DEFAULT`].
    pub fn has_style_type(&self) -> bool {
        self.paragraph().is_some()
    }

    /// Paragraph style type
    pub fn style_type(&self) -> i32 {
        self.paragraph()
            .and_then(|p| p.style_type)
            .unwrap_or(STYLE_TYPE_DEFAULT)
    }

    /// Paragraph alignment
    pub fn alignment(&self) -> i32 {
        self.paragraph().and_then(|p| p.alignment).unwrap_or(ALIGNMENT_LEFT)
    }

    /// Raw indent amount
    pub fn indent_amount(&self) -> i32 {
        self.paragraph().and_then(|p| p.indent_amount).unwrap_or(0)
    }

    /// True for block-quote paragraphs
    pub fn is_block_quote(&self) -> bool {
        self.paragraph().and_then(|p| p.block_quote) == Some(STYLE_BLOCK_QUOTE)
    }

    /// Indent depth with a block quote counting as one level.
    pub fn normalized_indent(&self) -> usize {
        let indent = usize::try_from(self.indent_amount()).unwrap_or(0);
        if self.is_block_quote() {
            indent + 1
        } else {
            indent
        }
    }

    /// List flavour, if the paragraph is a list item
    pub fn list_kind(&self) -> Option<ListKind> {
        if !self.has_style_type() {
            return None;
        }
        match self.style_type() {
            STYLE_TYPE_DOTTED_LIST => Some(ListKind::Dotted),
            STYLE_TYPE_DASHED_LIST => Some(ListKind::Dashed),
            STYLE_TYPE_NUMBERED_LIST => Some(ListKind::Numbered),
            STYLE_TYPE_CHECKBOX => Some(ListKind::Checklist),
            _ => None,
        }
    }

    /// True for checklist items
    pub fn is_checkbox(&self) -> bool {
        self.list_kind() == Some(ListKind::Checklist)
    }

    /// Checklist UUID and done flag for checklist items
    pub fn checklist(&self) -> Option<(&[u8], bool)> {
        if !self.is_checkbox() {
            return None;
        }
        self.paragraph()
            .and_then(|p| p.checklist.as_ref())
            .map(|c| (c.uuid.as_slice(), c.done == 1))
    }

    /// Font weight, defaulting to regular
    pub fn font_weight(&self) -> i32 {
        self.run.font_weight.unwrap_or(FONT_WEIGHT_DEFAULT)
    }

    /// Embedded-object reference carried by this run
    pub fn attachment(&self) -> Option<&AttachmentInfo> {
        self.run.attachment_info.as_ref()
    }

    /// Same paragraph style: type, alignment, indent and checklist.
    fn same_paragraph(&self, other: &StyleRun) -> bool {
        match (self.paragraph(), other.paragraph()) {
            (None, None) => true,
            (Some(a), Some(b)) => {
                a.style_type == b.style_type
                    && a.alignment == b.alignment
                    && a.indent_amount == b.indent_amount
                    && a.checklist == b.checklist
            }
            _ => false,
        }
    }

    /// Whether two adjacent runs can be coalesced into one.
    pub fn same_style(&self, other: &StyleRun) -> bool {
        if self.attachment().is_some() || other.attachment().is_some() {
            return false;
        }
        self.same_paragraph(other)
            && self.run.font == other.run.font
            && self.run.font_weight == other.run.font_weight
            && self.run.underlined == other.run.underlined
            && self.run.strikethrough == other.run.strikethrough
            && self.run.superscript == other.run.superscript
            && self.run.link == other.run.link
            && same_color(self.run.color.as_ref(), other.run.color.as_ref())
            && self.is_block_quote() == other.is_block_quote()
            && self.run.emphasis_style == other.run.emphasis_style
    }

    /// Whether two runs belong to the same block (heading, list, quote).
    pub fn same_style_type(&self, other: &StyleRun) -> bool {
        match (self.has_style_type(), other.has_style_type()) {
            (false, false) => return true,
            (true, true) => {}
            _ => return false,
        }
        if self.indent_amount() != other.indent_amount() {
            return false;
        }
        if self.is_block_quote() != other.is_block_quote() {
            return false;
        }
        if let (Some((a, _)), Some((b, _))) = (self.checklist(), other.checklist()) {
            if a != b {
                return false;
            }
        }
        self.style_type() == other.style_type()
    }

    fn extend(&mut self, extra: usize) {
        let total = self.length().saturating_add(extra);
        self.run.length = i32::try_from(total).unwrap_or(i32::MAX);
    }
}

fn same_color(a: Option<&Color>, b: Option<&Color>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => hex_color(a) == hex_color(b),
        _ => false,
    }
}

fn channel_hex(value: f32) -> String {
    let scaled = (value * 255.0).round().clamp(0.0, 255.0) as u8;
    format!("{:02X}", scaled)
}

/// `#RRGGBB` for a stored color.
pub fn hex_color(color: &Color) -> String {
    format!(
        "#{}{}{}",
        channel_hex(color.red),
        channel_hex(color.green),
        channel_hex(color.blue)
    )
}

/// Coalesce adjacent runs with identical formatting.
pub fn merge_runs(runs: &[StyleRun]) -> Vec<StyleRun> {
    let mut merged: Vec<StyleRun> = Vec::with_capacity(runs.len());
    for run in runs {
        match merged.last_mut() {
            Some(last) if last.same_style(run) => last.extend(run.length()),
            _ => merged.push(run.clone()),
        }
    }
    merged
}

/// A merged run together with the text it covers.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// The (merged) run
    pub run: StyleRun,
    /// Text covered by the run after wide-character correction
    pub text: String,
}

/// A note's text buffer and style runs
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    version: i32,
    text: Vec<char>,
    runs: Vec<StyleRun>,
}

impl Document {
    /// Wrap a decoded note message
    pub fn from_note(note: Note, version: i32) -> Self {
        Self {
            version,
            text: note.note_text.chars().collect(),
            runs: note.attribute_run.into_iter().map(StyleRun::from).collect(),
        }
    }

    /// Decode an uncompressed `NoteStoreProto` blob.
    pub fn from_protobuf(bytes: &[u8]) -> Result<Self> {
        let proto = NoteStoreProto::decode(bytes)?;
        let document = proto
            .document
            .ok_or_else(|| Error::UnexpectedShape("NoteStoreProto without document".to_string()))?;
        let note = document
            .note
            .ok_or_else(|| Error::UnexpectedShape("Document without note".to_string()))?;
        Ok(Self::from_note(note, document.version))
    }

    /// Inflate and decode a gzip-compressed note blob.
    pub fn from_compressed(data: &[u8]) -> Result<Self> {
        let inflated = gunzip(data)?;
        Self::from_protobuf(&inflated)
    }

    /// Document format version
    pub fn version(&self) -> i32 {
        self.version
    }

    /// Raw text buffer, placeholders included
    pub fn text(&self) -> String {
        self.text.iter().collect()
    }

    /// Style runs as stored
    pub fn runs(&self) -> &[StyleRun] {
        &self.runs
    }

    /// Number of embedded-object placeholders in the text buffer
    pub fn placeholder_count(&self) -> usize {
        self.text.iter().filter(|c| **c == OBJECT_PLACEHOLDER).count()
    }

    /// Merge runs and slice the text buffer for each of them.
    ///
    /// Characters above U+FFFF count as two units in a run's length but are
    /// one `char` here, so each candidate slice is shortened by the number
    /// of such characters it contains.
    pub fn segments(&self) -> Vec<Segment> {
        let merged = merge_runs(&self.runs);
        let mut segments = Vec::with_capacity(merged.len());
        let mut cursor = 0usize;

        for run in merged {
            let start = cursor.min(self.text.len());
            let candidate_end = start.saturating_add(run.length()).min(self.text.len());
            let wide = self.text[start..candidate_end]
                .iter()
                .filter(|c| u32::from(**c) > 0xFFFF)
                .count();
            let actual = run.length().saturating_sub(wide);
            let end = start.saturating_add(actual).min(self.text.len());

            let text: String = self.text[start..end].iter().collect();
            cursor = start + actual;
            segments.push(Segment { run, text });
        }

        if cursor != self.text.len() {
            tracing::debug!(
                "Style runs cover {} characters but text buffer holds {}",
                cursor,
                self.text.len()
            );
        }
        segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto_types::{Checklist, Font};

    fn run(length: i32) -> AttributeRun {
        AttributeRun {
            length,
            ..Default::default()
        }
    }

    fn styled(length: i32, style_type: i32) -> AttributeRun {
        AttributeRun {
            length,
            paragraph_style: Some(ParagraphStyle {
                style_type: Some(style_type),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_merge_identical_runs() {
        let runs: Vec<StyleRun> = vec![run(2), run(3), run(4)].into_iter().map(StyleRun::from).collect();
        let merged = merge_runs(&runs);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].length(), 9);
    }

    #[test]
    fn test_attachments_never_merge() {
        let attachment = AttributeRun {
            length: 1,
            attachment_info: Some(AttachmentInfo {
                attachment_identifier: Some("A".to_string()),
                type_uti: Some("public.jpeg".to_string()),
            }),
            ..Default::default()
        };
        let runs: Vec<StyleRun> = vec![attachment.clone(), attachment, run(2)]
            .into_iter()
            .map(StyleRun::from)
            .collect();
        assert_eq!(merge_runs(&runs).len(), 3);
    }

    #[test]
    fn test_font_and_superscript_split_runs() {
        let mut bold = run(2);
        bold.font_weight = Some(FONT_WEIGHT_BOLD);
        let mut sup = run(2);
        sup.superscript = Some(1);
        let mut font = run(2);
        font.font = Some(Font {
            font_name: Some("Menlo".to_string()),
            ..Default::default()
        });
        let runs: Vec<StyleRun> = vec![run(1), bold, sup, font].into_iter().map(StyleRun::from).collect();
        assert_eq!(merge_runs(&runs).len(), 4);
    }

    #[test]
    fn test_same_style_type_rules() {
        let title = StyleRun::from(styled(1, STYLE_TYPE_TITLE));
        let heading = StyleRun::from(styled(1, STYLE_TYPE_HEADING));
        let plain = StyleRun::from(run(1));
        assert!(title.same_style_type(&title.clone()));
        assert!(!title.same_style_type(&heading));
        assert!(!title.same_style_type(&plain));
        assert!(plain.same_style_type(&StyleRun::from(run(3))));

        let mut check_a = styled(1, STYLE_TYPE_CHECKBOX);
        check_a.paragraph_style.as_mut().unwrap().checklist = Some(Checklist { uuid: vec![1], done: 0 });
        let mut check_b = check_a.clone();
        check_b.paragraph_style.as_mut().unwrap().checklist = Some(Checklist { uuid: vec![2], done: 1 });
        assert!(!StyleRun::from(check_a).same_style_type(&StyleRun::from(check_b)));
    }

    #[test]
    fn test_block_quote_counts_as_indent() {
        let mut quote = styled(1, STYLE_TYPE_DEFAULT);
        quote.paragraph_style.as_mut().unwrap().block_quote = Some(STYLE_BLOCK_QUOTE);
        let quote = StyleRun::from(quote);
        assert!(quote.is_block_quote());
        assert_eq!(quote.normalized_indent(), 1);
    }

    #[test]
    fn test_hex_color() {
        let color = Color {
            red: 1.0,
            green: 0.5,
            blue: 0.0,
            alpha: 1.0,
        };
        assert_eq!(hex_color(&color), "#FF8000");
    }

    #[test]
    fn test_wide_character_slicing() {
        // "a😀b" declares 4 units (emoji counts as two), then "cd"
        let note = Note {
            note_text: "a😀bcd".to_string(),
            attribute_run: vec![
                AttributeRun { length: 4, font_weight: Some(1), ..Default::default() },
                run(2),
            ],
        };
        let segments = Document::from_note(note, 1).segments();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "a😀b");
        assert_eq!(segments[1].text, "cd");
    }

    #[test]
    fn test_overlong_runs_are_clamped() {
        let note = Note {
            note_text: "abc".to_string(),
            attribute_run: vec![run(10)],
        };
        let segments = Document::from_note(note, 1).segments();
        assert_eq!(segments[0].text, "abc");
    }
}
