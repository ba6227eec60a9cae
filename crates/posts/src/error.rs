use thiserror::Error;

#[derive(Error, Debug)]
pub enum PostStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt posts file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
}

impl PostStoreError {
    /// Whether the caller sent bad input, as opposed to a storage failure.
    pub fn is_validation(&self) -> bool {
        matches!(self, PostStoreError::MissingFields(_))
    }
}
