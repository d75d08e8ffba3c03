use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("A watch session is already active")]
    AlreadyActive,

    #[error("Watch directory not found or not a directory: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("Change-event subscription failed: {0}")]
    Subscription(std::io::Error),

    #[error("Change-event read failed: {0}")]
    Read(std::io::Error),

    #[error("Detection delivery failed: {0}")]
    Delivery(String),
}

pub type Result<T> = std::result::Result<T, WatchError>;
