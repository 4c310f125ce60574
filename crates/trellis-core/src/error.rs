//! Error types for Trellis data sources.

/// Result type alias for source operations.
pub type Result<T> = std::result::Result<T, SourceError>;

/// Boxed error raised from inside a listener callback.
pub type BoxedListenerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while reading, mutating or observing a source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// An index was outside the valid range of a collection.
    #[error("index {index} out of range for collection of length {len}")]
    Index { index: usize, len: usize },

    /// A listener, row, node or query match was not present.
    #[error("{what} not found")]
    NotFound { what: String },

    /// A source or row was configured inconsistently.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A structural change would corrupt a tree (cycles, double attachment).
    #[error("invalid tree structure: {0}")]
    Structure(String),

    /// Assignment to an attribute the item does not have.
    #[error("no field named '{0}'")]
    UnknownField(String),

    /// A listener callback failed; dispatch was aborted.
    #[error("listener failed: {0}")]
    Listener(#[source] BoxedListenerError),
}

impl SourceError {
    /// Create an index error.
    pub fn index(index: usize, len: usize) -> Self {
        Self::Index { index, len }
    }

    /// Create a not-found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a tree structure error.
    pub fn structure(message: impl Into<String>) -> Self {
        Self::Structure(message.into())
    }

    /// Create an unknown-field error.
    pub fn unknown_field(name: impl Into<String>) -> Self {
        Self::UnknownField(name.into())
    }

    /// Wrap an arbitrary error raised by a listener.
    pub fn listener(error: impl Into<BoxedListenerError>) -> Self {
        Self::Listener(error.into())
    }

    /// Returns `true` for [`SourceError::Index`].
    pub fn is_index(&self) -> bool {
        matches!(self, Self::Index { .. })
    }

    /// Returns `true` for [`SourceError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
