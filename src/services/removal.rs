use async_trait::async_trait;
use bytes::Bytes;

use crate::models::job::ImagePayload;

/// External operation that returns a watermark-free copy of an image.
///
/// Implementations must be safe to call concurrently and must report any
/// response without image content as an error, never as an empty success.
#[async_trait]
pub trait WatermarkRemover: Send + Sync {
    async fn remove_watermark(&self, image: &ImagePayload) -> Result<Bytes, RemovalError>;

    /// Provider name for logging and health output.
    fn name(&self) -> &str;
}

#[derive(Debug, thiserror::Error)]
pub enum RemovalError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Response did not contain an image")]
    NoImage,

    #[error("Returned image data is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Remover failed: {0}")]
    Other(String),
}
