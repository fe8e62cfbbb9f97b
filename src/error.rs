use std::fmt;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("invalid model identifier `{0}`: expected `workspace/dataset/version`")]
    InvalidModelId(String),
    #[error("invalid image reference `{0}`: not an existing file or an http(s) URL")]
    InvalidImageReference(String),
    #[error("failed to decode image `{path}`: {source}")]
    ImageDecode {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error("remote request failed with status {status}: {body}")]
    RemoteRequest {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("{0}")]
    InvalidParameter(String),
    #[error("model `{0}` is not supported for video inference")]
    UnsupportedModel(String),
    #[error("`{0}` is not a supported model type")]
    UnsupportedModelType(String),
    #[error("{stage}: {source}")]
    VideoUpload {
        stage: UploadStage,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed response from inference service: {0}")]
    MalformedResponse(String),
    #[error("video job `{job_id}` not ready after {attempts} attempts")]
    PollAttemptsExhausted { job_id: String, attempts: u32 },
}

/// Which step of the video upload sequence failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStage {
    SignedUrlRequest,
    ReadVideo,
    Upload,
}

impl UploadStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStage::SignedUrlRequest => "error requesting video upload url",
            UploadStage::ReadVideo => "error reading video",
            UploadStage::Upload => "error uploading video",
        }
    }
}

impl fmt::Display for UploadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
