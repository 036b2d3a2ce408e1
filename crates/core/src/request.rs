use crate::document::DocumentId;
use crate::profile::RecognitionProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    One(DocumentId),
    All,
}

/// What to extract, and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRequest {
    pub selection: Selection,
    /// Re-extract even when the document already has text.
    pub force: bool,
    pub profile: RecognitionProfile,
}

impl ExtractionRequest {
    pub fn one(id: DocumentId) -> Self {
        ExtractionRequest {
            selection: Selection::One(id),
            force: false,
            profile: RecognitionProfile::default(),
        }
    }

    pub fn all() -> Self {
        ExtractionRequest {
            selection: Selection::All,
            force: false,
            profile: RecognitionProfile::default(),
        }
    }

    pub fn forced(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_profile(mut self, profile: RecognitionProfile) -> Self {
        self.profile = profile;
        self
    }
}
