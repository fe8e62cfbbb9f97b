use crate::client::{check_status, InferenceClient};
use crate::error::{InferenceError, UploadStage};
use crate::request::is_hosted;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tokio::time::sleep;
use tracing::instrument;

pub const MAX_INFER_FPS: u32 = 5;

// The service samples at its own fixed rate no matter what the caller
// validated against.
const SUBMITTED_INFER_FPS: u32 = 5;

const SUPPORTED_VIDEO_PREDICTION_TYPES: &[&str] = &["batch-video"];

const STATUS_READY: i64 = 1;

/// One model in a video-inference ensemble.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub model_id: String,
    pub model_version: String,
    pub inference_type: String,
}

/// Auxiliary models that can ride along with the primary model on a video
/// job. Fixed vocabulary; anything else is rejected up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdditionalModel {
    Clip,
    Gaze,
}

impl AdditionalModel {
    fn descriptor(&self) -> ModelDescriptor {
        match self {
            AdditionalModel::Clip => ModelDescriptor {
                model_id: "clip".to_string(),
                model_version: "1".to_string(),
                inference_type: "clip-embed-image".to_string(),
            },
            AdditionalModel::Gaze => ModelDescriptor {
                model_id: "gaze".to_string(),
                model_version: "1".to_string(),
                inference_type: "gaze-detection".to_string(),
            },
        }
    }
}

impl FromStr for AdditionalModel {
    type Err = InferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clip" => Ok(Self::Clip),
            "gaze" => Ok(Self::Gaze),
            other => Err(InferenceError::UnsupportedModel(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VideoOptions {
    pub fps: u32,
    pub additional_models: Vec<String>,
    pub prediction_type: String,
}

impl Default for VideoOptions {
    fn default() -> Self {
        Self {
            fps: MAX_INFER_FPS,
            additional_models: Vec::new(),
            prediction_type: "batch-video".to_string(),
        }
    }
}

/// Handle for one submitted video-inference job. Returned by
/// [`InferenceClient::predict_video`] and threaded by the caller into the
/// polling calls, so several jobs can be in flight against one client.
#[derive(Debug, Clone)]
pub struct VideoJob {
    pub job_id: String,
    pub source_url: String,
    pub model: ModelDescriptor,
}

/// Cadence for the blocking poll. `max_attempts: None` polls until the job
/// is ready, which will spin forever if the remote job is permanently
/// stuck; set a cap to bound it.
#[derive(Debug, Clone)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_attempts: Option<u32>,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            max_attempts: None,
        }
    }
}

#[derive(Serialize)]
struct SignedUrlRequest<'a> {
    file_name: &'a str,
}

#[derive(Deserialize)]
struct SignedUrlResponse {
    signed_url: String,
}

#[derive(Serialize)]
struct SubmitJobRequest<'a> {
    input_url: &'a str,
    infer_fps: u32,
    models: &'a [ModelDescriptor],
}

#[derive(Deserialize)]
struct SubmitJobResponse {
    job_id: String,
}

#[derive(Deserialize)]
struct JobStatusResponse {
    status: i64,
    output_signed_url: Option<String>,
}

fn upload_error(
    stage: UploadStage,
    source: impl std::error::Error + Send + Sync + 'static,
) -> InferenceError {
    InferenceError::VideoUpload {
        stage,
        source: Box::new(source),
    }
}

impl InferenceClient {
    /// Submit an asynchronous video-inference job.
    ///
    /// A local video is uploaded through a one-time signed URL first; an
    /// http(s) reference is handed to the service as-is. Returns the job
    /// handle to poll with. All parameter validation happens before any
    /// network call.
    #[instrument(skip(self, options))]
    pub async fn predict_video(
        &self,
        video_ref: &str,
        options: Option<VideoOptions>,
    ) -> Result<VideoJob, InferenceError> {
        let options = options.unwrap_or_default();

        if options.fps > MAX_INFER_FPS {
            return Err(InferenceError::InvalidParameter(format!(
                "fps must be less than or equal to {}, got {}",
                MAX_INFER_FPS, options.fps
            )));
        }
        let additional: Vec<AdditionalModel> = options
            .additional_models
            .iter()
            .map(|name| name.parse())
            .collect::<Result<_, _>>()?;
        if !SUPPORTED_VIDEO_PREDICTION_TYPES.contains(&options.prediction_type.as_str()) {
            return Err(InferenceError::UnsupportedModel(
                options.prediction_type.clone(),
            ));
        }

        let source_url = if is_hosted(video_ref) {
            video_ref.to_string()
        } else {
            self.upload_video(video_ref).await?
        };

        let primary = self.primary_descriptor();
        let mut models = vec![primary.clone()];
        models.extend(additional.iter().map(AdditionalModel::descriptor));

        let url = format!("{}/videoinfer/", self.config.api_url);
        let response = self
            .http
            .post(&url)
            .query(&[("api_key", self.config.api_key.expose())])
            .json(&SubmitJobRequest {
                input_url: &source_url,
                infer_fps: SUBMITTED_INFER_FPS,
                models: &models,
            })
            .send()
            .await?;
        let response = check_status(response).await?;
        let submitted: SubmitJobResponse = response.json().await?;

        tracing::info!(job_id = %submitted.job_id, "video inference job submitted");

        Ok(VideoJob {
            job_id: submitted.job_id,
            source_url,
            model: primary,
        })
    }

    async fn upload_video(&self, video_path: &str) -> Result<String, InferenceError> {
        let url = format!("{}/video_upload_signed_url", self.config.api_url);
        let response = self
            .http
            .post(&url)
            .query(&[("api_key", self.config.api_key.expose())])
            .json(&SignedUrlRequest {
                file_name: video_path,
            })
            .send()
            .await
            .map_err(|e| upload_error(UploadStage::SignedUrlRequest, e))?;
        let response = check_status(response)
            .await
            .map_err(|e| upload_error(UploadStage::SignedUrlRequest, e))?;
        let signed: SignedUrlResponse = response
            .json()
            .await
            .map_err(|e| upload_error(UploadStage::SignedUrlRequest, e))?;

        // Whole file in memory; uploads are not streamed.
        let video_bytes = tokio::fs::read(video_path)
            .await
            .map_err(|e| upload_error(UploadStage::ReadVideo, e))?;

        let response = self
            .http
            .put(&signed.signed_url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(video_bytes)
            .send()
            .await
            .map_err(|e| upload_error(UploadStage::Upload, e))?;
        check_status(response)
            .await
            .map_err(|e| upload_error(UploadStage::Upload, e))?;

        tracing::info!(video = video_path, "video uploaded");

        Ok(signed.signed_url)
    }

    /// Single status check for a video job.
    ///
    /// `Ok(None)` means the job is not ready yet; any status other than the
    /// ready value is treated as still pending. When ready, the final
    /// payload is fetched from the returned signed URL and handed back
    /// verbatim.
    #[instrument(skip(self, job))]
    pub async fn poll_video_results(
        &self,
        job: &VideoJob,
    ) -> Result<Option<serde_json::Value>, InferenceError> {
        let url = format!("{}/videoinfer/", self.config.api_url);
        let response = self
            .http
            .get(&url)
            .query(&[
                ("api_key", self.config.api_key.expose()),
                ("job_id", job.job_id.as_str()),
            ])
            .send()
            .await?;
        let response = check_status(response).await?;
        let status: JobStatusResponse = response.json().await?;

        if status.status != STATUS_READY {
            tracing::debug!(job_id = %job.job_id, status = status.status, "job not ready");
            return Ok(None);
        }

        let output_url = status.output_signed_url.ok_or_else(|| {
            InferenceError::MalformedResponse(
                "ready status without an output_signed_url".to_string(),
            )
        })?;

        let response = self.http.get(&output_url).send().await?;
        let response = check_status(response).await?;
        let results: serde_json::Value = response.json().await?;

        Ok(Some(results))
    }

    /// Poll until the job is ready, sleeping `settings.interval` between
    /// attempts.
    pub async fn wait_for_video_results(
        &self,
        job: &VideoJob,
        settings: PollSettings,
    ) -> Result<serde_json::Value, InferenceError> {
        let mut attempts: u32 = 0;

        loop {
            tracing::info!(
                job_id = %job.job_id,
                elapsed_secs = u64::from(attempts) * settings.interval.as_secs(),
                "checking for video inference results"
            );

            if let Some(results) = self.poll_video_results(job).await? {
                return Ok(results);
            }

            attempts += 1;
            if let Some(max_attempts) = settings.max_attempts {
                if attempts >= max_attempts {
                    return Err(InferenceError::PollAttemptsExhausted {
                        job_id: job.job_id.clone(),
                        attempts,
                    });
                }
            }

            sleep(settings.interval).await;
        }
    }

    fn primary_descriptor(&self) -> ModelDescriptor {
        ModelDescriptor {
            model_id: self.config.dataset_id.clone(),
            model_version: self.config.version.clone(),
            inference_type: self.config.kind.inference_type().to_string(),
        }
    }
}
