//! Embedded-object seam between the renderer and whoever can look objects up

use crate::proto_types::AttachmentInfo;

/// Substituted for objects that could not be reconstructed, which is
/// expected for objects of deleted notes.
pub const MISSING_OBJECT_MARKER: &str = "[missing]";

/// What the renderer needs from a resolved embedded object.
pub trait EmbeddedContent {
    /// HTML fragment placed where the placeholder was
    fn render_html(&self) -> String;

    /// One-line plaintext description, wrapped in braces in the plaintext
    fn describe(&self) -> String;
}

/// Turns placeholder references into objects, in document order.
pub trait ObjectResolver {
    /// Resolved object type
    type Object: EmbeddedContent;

    /// Resolve one placeholder. `None` renders the missing marker.
    fn resolve(&mut self, attachment: &AttachmentInfo) -> Option<Self::Object>;
}

/// Resolver for contexts without object storage; every object is missing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoObjects;

/// Uninhabited object type for [`NoObjects`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unresolvable {}

impl EmbeddedContent for Unresolvable {
    fn render_html(&self) -> String {
        match *self {}
    }

    fn describe(&self) -> String {
        match *self {}
    }
}

impl ObjectResolver for NoObjects {
    type Object = Unresolvable;

    fn resolve(&mut self, attachment: &AttachmentInfo) -> Option<Unresolvable> {
        tracing::debug!(
            "No object storage available for {:?}",
            attachment.attachment_identifier
        );
        None
    }
}
