use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid stress scenario: {0}")]
    InvalidStress(String),

    #[error("{field} must be a finite number >= 0, got {value}")]
    InvalidValue { field: &'static str, value: f64 },

    #[error("asset '{0}' not found")]
    UnknownAsset(String),

    #[error("liability '{0}' not found")]
    UnknownLiability(String),

    #[error("duplicate id '{0}'")]
    DuplicateId(String),

    #[error("asset name must not be empty")]
    EmptyName,

    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("autosave task is not running")]
    SaverStopped,

    #[error("malformed document: {0}")]
    Json(#[from] serde_json::Error),
}
