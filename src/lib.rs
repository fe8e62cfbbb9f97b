//! Client SDK for the VisionFlow hosted inference platform.
//!
//! Runs single-image predictions against a deployed model version and
//! submits asynchronous batch video-inference jobs, polling until the
//! results are ready.
//!
//! ```no_run
//! use visionflow::{ApiKey, ClientConfig, InferenceClient, ModelKind};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), visionflow::InferenceError> {
//!     let config = ClientConfig::new(
//!         ApiKey::new("your-api-key"),
//!         "workspace/dataset/1",
//!         ModelKind::ObjectDetection,
//!     )?;
//!     let client = InferenceClient::new(config);
//!
//!     let result = client.predict("cat.jpg", None).await?;
//!     println!("{}", result.predictions);
//!
//!     let job = client.predict_video("video.mp4", None).await?;
//!     let results = client
//!         .wait_for_video_results(&job, Default::default())
//!         .await?;
//!     println!("{}", results);
//!     Ok(())
//! }
//! ```

mod client;
mod request;
mod video;

pub mod config;
pub mod error;

pub use client::{InferenceClient, PredictOptions, PredictionResult};
pub use config::{ApiKey, ClientConfig, ModelKind};
pub use error::{InferenceError, UploadStage};
pub use request::ImageDims;
pub use video::{
    AdditionalModel, ModelDescriptor, PollSettings, VideoJob, VideoOptions, MAX_INFER_FPS,
};
