use thiserror::Error;

#[derive(Error, Debug, PartialEq, Clone)]
pub enum CacheError {
    #[error("Cache storage failed: {0}")]
    Io(String),
    #[error("Invalid cache snapshot: {0}")]
    Json(String),
    #[error("Cache snapshot version {found} does not match {expected}")]
    VersionMismatch { found: u32, expected: u32 },
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Json(err.to_string())
    }
}
