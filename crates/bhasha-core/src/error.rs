use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A stored record could not be decoded. Callers must abort instead of
    /// reprocessing or skipping the track.
    #[error("corrupt classification record for track {track_id}: {reason}")]
    Corrupt { track_id: String, reason: String },
}

impl Error {
    /// Returns `true` when the error means the state store itself can no
    /// longer be trusted.
    pub fn is_inconsistency(&self) -> bool {
        matches!(self, Self::Corrupt { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
