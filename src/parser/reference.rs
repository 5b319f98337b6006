//! Types for normalized video and collection references.

use std::fmt;

/// How a video reference entered the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceKind {
    /// Supplied directly by the user.
    Single,
    /// Produced by expanding a collection.
    CollectionMember {
        /// Canonical URL of the parent collection.
        collection_url: String,
    },
}

/// One target video, consumed exactly once by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoReference {
    /// Text exactly as supplied (or as listed by the host).
    pub raw_url: String,
    /// Parsed, absolute URL handed to the fetch engine.
    pub url: String,
    /// Identity used for run-wide de-duplication.
    pub canonical_id: String,
    /// Where the reference came from.
    pub kind: ReferenceKind,
}

impl VideoReference {
    /// Returns true for references produced by collection expansion.
    #[must_use]
    pub fn is_collection_member(&self) -> bool {
        matches!(self.kind, ReferenceKind::CollectionMember { .. })
    }

    /// Parent collection URL for expanded references.
    #[must_use]
    pub fn collection_url(&self) -> Option<&str> {
        match &self.kind {
            ReferenceKind::CollectionMember { collection_url } => Some(collection_url),
            ReferenceKind::Single => None,
        }
    }
}

impl fmt::Display for VideoReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.url, self.canonical_id)
    }
}

/// An album, showcase, channel, group, or user page awaiting expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionReference {
    /// Text exactly as supplied.
    pub raw_url: String,
    /// Parsed, absolute URL handed to the fetch engine.
    pub url: String,
    /// Canonical form used for de-duplication.
    pub canonical_url: String,
    /// Member bound; `0` means unlimited.
    pub max_items: usize,
}

impl fmt::Display for CollectionReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.max_items == 0 {
            write!(f, "{} (all items)", self.url)
        } else {
            write!(f, "{} (max {} items)", self.url, self.max_items)
        }
    }
}

/// A normalized input token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// A single video.
    Video(VideoReference),
    /// A collection to expand.
    Collection(CollectionReference),
}

impl Reference {
    /// The URL that will be handed to the fetch engine.
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Video(video) => &video.url,
            Self::Collection(collection) => &collection.url,
        }
    }
}
