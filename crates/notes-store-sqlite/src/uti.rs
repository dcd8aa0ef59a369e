//! Uniform type identifier classification
//!
//! Every embedded object row names its type with a UTI string. The order of
//! checks in [`classify`] matters: specific identifiers win over the broad
//! `public.*` and `dyn.*` prefixes.

use serde::Serialize;

/// Prefix of inline text attachments
pub const INLINE_PREFIX: &str = "com.apple.notes.inlinetextattachment";

#[allow(missing_docs)]
pub const UTI_HASHTAG: &str = "com.apple.notes.inlinetextattachment.hashtag";
#[allow(missing_docs)]
pub const UTI_MENTION: &str = "com.apple.notes.inlinetextattachment.mention";
#[allow(missing_docs)]
pub const UTI_LINK: &str = "com.apple.notes.inlinetextattachment.link";
#[allow(missing_docs)]
pub const UTI_CALCULATE_RESULT: &str = "com.apple.notes.inlinetextattachment.calculateresult";
#[allow(missing_docs)]
pub const UTI_CALCULATE_GRAPH: &str = "com.apple.notes.inlinetextattachment.calculategraphexpression";
#[allow(missing_docs)]
pub const UTI_URL: &str = "public.url";
#[allow(missing_docs)]
pub const UTI_VCARD: &str = "public.vcard";
#[allow(missing_docs)]
pub const UTI_ICAL: &str = "com.apple.ical.ics";
#[allow(missing_docs)]
pub const UTI_PDF: &str = "com.adobe.pdf";
#[allow(missing_docs)]
pub const UTI_GALLERY: &str = "com.apple.notes.gallery";
#[allow(missing_docs)]
pub const UTI_TABLE: &str = "com.apple.notes.table";

const AUDIO: &[&str] = &[
    "com.apple.m4a-audio",
    "com.microsoft.waveform-audio",
    "public.aiff-audio",
    "public.midi-audio",
    "public.mp3",
    "org.xiph.ogg-audio",
];

const AUDIOVISUAL: &[&str] = &[
    "com.apple.m4v-video",
    "com.apple.protected-mpeg-4-video",
    "com.apple.protected-mpeg-4-audio",
    "com.apple.quicktime-movie",
    "public.avi",
    "public.mpeg",
    "public.mpeg-2-video",
    "public.mpeg-2-transport-stream",
    "public.mpeg-4",
    "public.mpeg-4-audio",
];

const DOCUMENT: &[&str] = &[
    "com.apple.iwork.numbers.sffnumbers",
    "com.apple.log",
    "com.apple.rtfd",
    "com.microsoft.word.doc",
    "com.microsoft.excel.xls",
    "com.microsoft.powerpoint.ppt",
    "com.netscape.javascript-source",
    "net.openvpn.formats.ovpn",
    "org.idpf.epub-container",
    "org.oasis-open.opendocument.text",
    "org.openxmlformats.wordprocessingml.document",
];

const IMAGE: &[&str] = &[
    "com.adobe.illustrator.ai-image",
    "com.adobe.photoshop-image",
    "com.adobe.raw-image",
    "com.apple.icns",
    "com.apple.macpaint-image",
    "com.apple.pict",
    "com.apple.quicktime-image",
    "com.apple.notes.sketch",
    "com.compuserve.gif",
    "com.ilm.openexr-image",
    "com.kodak.flashpix.image",
    "com.microsoft.bmp",
    "com.microsoft.ico",
    "com.sgi.sgi-image",
    "com.truevision.tga-image",
    "public.camera-raw-image",
    "public.fax",
    "public.heic",
    "public.jpeg",
    "public.jpeg-2000",
    "public.png",
    "public.svg-image",
    "public.tiff",
    "public.xbitmap-image",
    "org.webmproject.webp",
];

const DRAWING: &[&str] = &["com.apple.drawing", "com.apple.drawing.2", "com.apple.paper"];

const SCAN: &[&str] = &["com.apple.paper.doc.scan", "com.apple.notes.scan"];

/// Inline text attachment flavours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InlineKind {
    /// `#tag`
    Hashtag,
    /// `@person`
    Mention,
    /// Link to another note
    Link,
    /// Math result or graph expression
    Calculate,
    /// Anything else under the inline prefix
    Other,
}

/// Broad media families sharing the `Media/` storage layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MediaCategory {
    #[allow(missing_docs)]
    Image,
    #[allow(missing_docs)]
    Video,
    #[allow(missing_docs)]
    Audio,
    #[allow(missing_docs)]
    VCard,
    #[allow(missing_docs)]
    Calendar,
    #[allow(missing_docs)]
    Document,
    #[allow(missing_docs)]
    Pdf,
    /// Other `public.*`, `dyn.*` or archive types
    Other,
}

impl MediaCategory {
    /// Word used in descriptions and link captions
    pub fn label(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::VCard => "vcard",
            Self::Calendar => "calendar",
            Self::Document => "document",
            Self::Pdf => "PDF",
            Self::Other => "media",
        }
    }

    /// True when the HTML should embed the file as an image
    pub fn renders_inline(&self) -> bool {
        matches!(self, Self::Image)
    }
}

/// What a UTI says about how to handle an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UtiClass {
    #[allow(missing_docs)]
    Inline(InlineKind),
    #[allow(missing_docs)]
    Media(MediaCategory),
    #[allow(missing_docs)]
    Url,
    #[allow(missing_docs)]
    Gallery,
    #[allow(missing_docs)]
    Table,
    #[allow(missing_docs)]
    Drawing,
    #[allow(missing_docs)]
    Scan,
    /// Unrecognized
    Generic,
}

/// Classify `uti`.
pub fn classify(uti: &str) -> UtiClass {
    if uti.starts_with(INLINE_PREFIX) {
        return UtiClass::Inline(match uti {
            UTI_HASHTAG => InlineKind::Hashtag,
            UTI_MENTION => InlineKind::Mention,
            UTI_LINK => InlineKind::Link,
            UTI_CALCULATE_RESULT | UTI_CALCULATE_GRAPH => InlineKind::Calculate,
            _ => InlineKind::Other,
        });
    }

    if IMAGE.contains(&uti) {
        UtiClass::Media(MediaCategory::Image)
    } else if AUDIOVISUAL.contains(&uti) {
        UtiClass::Media(MediaCategory::Video)
    } else if AUDIO.contains(&uti) {
        UtiClass::Media(MediaCategory::Audio)
    } else if uti == UTI_VCARD {
        UtiClass::Media(MediaCategory::VCard)
    } else if uti == UTI_ICAL {
        UtiClass::Media(MediaCategory::Calendar)
    } else if DOCUMENT.contains(&uti) {
        UtiClass::Media(MediaCategory::Document)
    } else if uti == UTI_PDF {
        UtiClass::Media(MediaCategory::Pdf)
    } else if uti == UTI_URL {
        UtiClass::Url
    } else if uti == UTI_GALLERY {
        UtiClass::Gallery
    } else if uti == UTI_TABLE {
        UtiClass::Table
    } else if SCAN.contains(&uti) {
        UtiClass::Scan
    } else if DRAWING.contains(&uti) {
        UtiClass::Drawing
    } else if uti.starts_with("public.") || uti == "com.apple.macbinary-archive" || uti.starts_with("dyn.") {
        UtiClass::Media(MediaCategory::Other)
    } else {
        tracing::warn!("Unrecognized type identifier {}", uti);
        UtiClass::Generic
    }
}

/// Short conformance label, as shown next to object descriptors
pub fn conforms_to(uti: &str) -> &'static str {
    if AUDIO.contains(&uti) {
        "audio"
    } else if DOCUMENT.contains(&uti) {
        "document"
    } else if uti.starts_with("dyn.") {
        "dynamic"
    } else if IMAGE.contains(&uti) {
        "image"
    } else if uti.starts_with(INLINE_PREFIX) {
        "inline"
    } else if uti.starts_with("public.") {
        "other public"
    } else if AUDIOVISUAL.contains(&uti) {
        "video"
    } else {
        "other"
    }
}
