use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum PesuError {
    #[error("portal request failed: {0}")]
    PortalHttp(String),

    #[error("portal returned status {status}: {message}")]
    PortalStatus { status: u16, message: String },

    #[error("no portal session available (log in or set PESU_SESSION)")]
    MissingSession,

    #[error("failed to parse {record}: {message}")]
    Parse { record: String, message: String },

    #[error("local store error: {0}")]
    Store(String),

    #[error("nothing cached under key {0}; run a sync first")]
    CacheMissing(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("no items selected")]
    NoItemsSelected,

    #[error("no content categories selected")]
    NoCategoriesSelected,

    #[error("failed to build archive: {0}")]
    Archive(String),

    #[error("failed to merge PDFs: {0}")]
    Pdf(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl PesuError {
    pub fn parse(record: &str, message: impl Into<String>) -> Self {
        PesuError::Parse {
            record: record.to_string(),
            message: message.into(),
        }
    }
}
