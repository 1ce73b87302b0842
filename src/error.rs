use thiserror::Error;

/// Failures surfaced by the report pipeline.
///
/// "Report not found" is deliberately absent: status updates report it as
/// `false`, indistinguishable from an update that changed nothing.
#[derive(Debug, Error)]
pub enum Error {
    /// The uploaded payload could not be decoded as an image.
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),

    /// The detector backend failed while running the model.
    #[error("inference failed: {0:#}")]
    Inference(anyhow::Error),

    /// The report store rejected an operation or was unreachable.
    #[error("report store error: {0}")]
    Store(#[from] StoreError),

    /// Writing the upload to disk failed.
    #[error("upload write failed: {0}")]
    Io(#[from] std::io::Error),

    /// The upload carries no usable filename extension.
    #[error("invalid upload: {0}")]
    InvalidUpload(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("corrupt report document: {0}")]
    Document(#[from] serde_json::Error),

    #[error("corrupt report store: {0}")]
    Corrupt(String),

    #[error("store lock poisoned")]
    Poisoned,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
