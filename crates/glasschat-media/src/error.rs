use thiserror::Error;

/// Errors produced by the attachment pipeline.
#[derive(Error, Debug)]
pub enum MediaError {
    /// The image payload could not be decoded or re-encoded.
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// The upload request itself failed (network, TLS, timeout).
    #[error("Upload request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The image host answered with a non-success status.
    #[error("Image host rejected the upload: HTTP {0}")]
    UploadRejected(u16),

    /// The image host answered 200 but without a usable hosted URL.
    #[error("Image host returned an unrecognized response")]
    MalformedResponse,
}
