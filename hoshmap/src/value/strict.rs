use crate::content::{content_hosh, Content};
use crate::hosh::Hosh;

/// A value whose content is already known.
#[derive(Debug, Clone, PartialEq)]
pub struct StrictValue {
    content: Content,
    hosh: Hosh,
}

impl StrictValue {
    /// Identifies the content by its canonical bytes.
    pub fn new(content: Content) -> Self {
        let hosh = content_hosh(&content);
        Self { content, hosh }
    }

    /// Uses a predefined identity, e.g. one restored from a cache record.
    pub fn with_hosh(content: Content, hosh: Hosh) -> Self {
        Self { content, hosh }
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    pub fn hosh(&self) -> Hosh {
        self.hosh
    }

    pub fn into_content(self) -> Content {
        self.content
    }
}
