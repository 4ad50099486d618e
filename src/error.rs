//! Error types for quarry

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// A document listed the same schema field more than once.
    #[error("Tried to insert `{0}` twice")]
    DupField(String),

    /// A field asked to be indexed as a type its schema entry does not carry.
    #[error("Tried to index field {0} as type not specified in schema")]
    UnsupportedType(String),

    /// A numeric field's text did not parse as a double.
    #[error("Could not parse numeric index value")]
    NotNumeric,

    /// A geo field's text had no `lon<sep>lat` delimiter.
    #[error("Invalid geo string, expected \"lon,lat\" or \"lon lat\"")]
    GeoFormat,

    /// The referenced document does not exist.
    #[error("{0}")]
    NoDoc(String),

    /// Catch-all ingest/maintenance failure. Carries the caller-facing message.
    #[error("{0}")]
    Generic(String),

    /// Invalid internal state — a bug, never expected from user input.
    #[error("{0}")]
    Inval(String),

    /// The indexing queue for the spec has shut down.
    #[error("Indexing queue closed")]
    QueueClosed,
}

pub type Result<T> = std::result::Result<T, Error>;
