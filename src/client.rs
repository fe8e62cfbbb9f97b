use crate::config::ClientConfig;
use crate::error::InferenceError;
use crate::request::{build_image_request, ImageDims, MediaReference, UPLOAD_FIELD_NAME};
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::instrument;

/// Optional knobs for a single-image prediction. Extra params are merged
/// into the query string, overriding anything the request builder set.
#[derive(Debug, Clone, Default)]
pub struct PredictOptions {
    pub prediction_type: Option<String>,
    pub extra_params: BTreeMap<String, String>,
}

/// The raw prediction payload plus the context it was produced in.
/// The payload schema is owned by the remote service and passed through
/// untouched.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionResult {
    pub predictions: Value,
    pub image_path: String,
    pub prediction_type: Option<String>,
    pub image_dims: ImageDims,
    pub colors: HashMap<String, String>,
}

/// Client for the hosted inference API.
///
/// All methods take `&self`; a client holds no per-call state and can be
/// shared freely across tasks.
pub struct InferenceClient {
    pub(crate) config: ClientConfig,
    pub(crate) http: reqwest::Client,
}

impl InferenceClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Run inference on a single image, either a local file (uploaded as
    /// JPEG) or an http(s) URL (fetched by the service).
    #[instrument(skip(self, options))]
    pub async fn predict(
        &self,
        image_ref: &str,
        options: Option<PredictOptions>,
    ) -> Result<PredictionResult, InferenceError> {
        let options = options.unwrap_or_default();
        let reference = MediaReference::classify(image_ref)?;
        let request = build_image_request(&reference)?;

        // Caller extras override builder defaults; the api key always wins.
        let mut params = request.params;
        params.extend(options.extra_params);
        params.insert(
            "api_key".to_string(),
            self.config.api_key.expose().to_string(),
        );

        let url = format!(
            "{}/{}/{}",
            self.config.inference_url, self.config.dataset_id, self.config.version
        );

        let mut http_request = self.http.post(&url).query(&params);
        if let Some(jpeg) = request.jpeg_body {
            let part = Part::bytes(jpeg)
                .file_name(UPLOAD_FIELD_NAME)
                .mime_str("image/jpeg")?;
            http_request = http_request.multipart(Form::new().part(UPLOAD_FIELD_NAME, part));
        }

        let response = http_request.send().await?;
        let response = check_status(response).await?;
        let predictions: Value = response.json().await?;

        tracing::debug!(image = image_ref, "prediction request succeeded");

        Ok(PredictionResult {
            predictions,
            image_path: image_ref.to_string(),
            prediction_type: options.prediction_type,
            image_dims: request.dims,
            colors: self.config.colors.clone(),
        })
    }
}

/// Non-2xx responses surface as `RemoteRequest` with the body attached.
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, InferenceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(InferenceError::RemoteRequest { status, body })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiKey, ClientConfig, ModelKind};
    use axum::extract::{Path, Query, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use image::{ImageBuffer, Rgb};
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct MockInferenceService {
        hits: AtomicUsize,
        last_query: Mutex<Option<HashMap<String, String>>>,
        last_content_type: Mutex<Option<String>>,
    }

    async fn infer_handler(
        State(state): State<Arc<MockInferenceService>>,
        Path((dataset, version)): Path<(String, String)>,
        Query(query): Query<HashMap<String, String>>,
        headers: HeaderMap,
    ) -> Json<Value> {
        assert_eq!(dataset, "traffic-cams");
        assert_eq!(version, "3");
        state.hits.fetch_add(1, Ordering::SeqCst);
        *state.last_query.lock().unwrap() = Some(query);
        *state.last_content_type.lock().unwrap() = headers
            .get("content-type")
            .map(|v| v.to_str().unwrap().to_string());
        Json(json!({"predictions": []}))
    }

    async fn spawn_server(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn mock_client() -> (InferenceClient, Arc<MockInferenceService>) {
        let state = Arc::new(MockInferenceService::default());
        let router = Router::new()
            .route("/{dataset}/{version}", post(infer_handler))
            .with_state(state.clone());
        let base = spawn_server(router).await;

        let config = ClientConfig::new(
            ApiKey::new("test-key"),
            "acme/traffic-cams/3",
            ModelKind::ObjectDetection,
        )
        .unwrap()
        .with_inference_url(&base)
        .with_api_url(&base);

        (InferenceClient::new(config), state)
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("visionflow-test-{}-{}", std::process::id(), name))
    }

    #[tokio::test]
    async fn predict_local_image_uploads_multipart_and_reports_dims() {
        let (client, state) = mock_client().await;

        let path = temp_path("predict-cat.png");
        let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(200, 150, Rgb([0, 128, 255]));
        img.save(&path).unwrap();

        let result = client.predict(path.to_str().unwrap(), None).await.unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(result.predictions, json!({"predictions": []}));
        assert_eq!(result.image_dims.width, "200");
        assert_eq!(result.image_dims.height, "150");
        assert_eq!(state.hits.load(Ordering::SeqCst), 1);

        let content_type = state.last_content_type.lock().unwrap().clone().unwrap();
        assert!(content_type.starts_with("multipart/form-data"));

        let query = state.last_query.lock().unwrap().clone().unwrap();
        assert_eq!(query.get("api_key").map(String::as_str), Some("test-key"));
        assert!(query.get("image").is_none());
    }

    #[tokio::test]
    async fn predict_hosted_image_passes_url_and_merges_extras() {
        let (client, state) = mock_client().await;

        let options = PredictOptions {
            prediction_type: Some("object-detection".to_string()),
            extra_params: BTreeMap::from([
                ("confidence".to_string(), "40".to_string()),
                // The client-injected credential must win over caller extras.
                ("api_key".to_string(), "spoofed".to_string()),
            ]),
        };
        let result = client
            .predict("https://example.com/cat.jpg", Some(options))
            .await
            .unwrap();

        assert_eq!(result.image_dims.width, "unknown");
        assert_eq!(result.image_dims.height, "unknown");
        assert_eq!(
            result.prediction_type.as_deref(),
            Some("object-detection")
        );

        let query = state.last_query.lock().unwrap().clone().unwrap();
        assert_eq!(
            query.get("image").map(String::as_str),
            Some("https://example.com/cat.jpg")
        );
        assert_eq!(query.get("confidence").map(String::as_str), Some("40"));
        assert_eq!(query.get("api_key").map(String::as_str), Some("test-key"));
    }

    #[tokio::test]
    async fn non_2xx_response_surfaces_status_and_body() {
        let router = Router::new().route(
            "/{dataset}/{version}",
            post(|| async { (StatusCode::FORBIDDEN, "bad key") }),
        );
        let base = spawn_server(router).await;

        let config = ClientConfig::new(
            ApiKey::new("test-key"),
            "acme/traffic-cams/3",
            ModelKind::ObjectDetection,
        )
        .unwrap()
        .with_inference_url(&base);

        let client = InferenceClient::new(config);
        let result = client.predict("https://example.com/cat.jpg", None).await;

        match result {
            Err(InferenceError::RemoteRequest { status, body }) => {
                assert_eq!(status, reqwest::StatusCode::FORBIDDEN);
                assert_eq!(body, "bad key");
            }
            other => panic!("expected RemoteRequest, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn invalid_reference_fails_before_any_network_call() {
        let (client, state) = mock_client().await;

        let result = client.predict("no-such-file.jpg", None).await;

        assert!(matches!(
            result,
            Err(InferenceError::InvalidImageReference(_))
        ));
        assert_eq!(state.hits.load(Ordering::SeqCst), 0);
    }
}
