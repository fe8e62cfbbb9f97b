use crate::error::InferenceError;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;

pub const DEFAULT_INFERENCE_URL: &str = "https://detect.visionflow.ai";
pub const DEFAULT_API_URL: &str = "https://api.visionflow.ai";

/// API credential. The inner value is only readable through
/// [`ApiKey::expose`] and never appears in `Debug` output.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub(crate) fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum ModelKind {
    ObjectDetection,
    Classification,
    InstanceSegmentation,
}

impl ModelKind {
    pub fn inference_type(&self) -> &'static str {
        match self {
            ModelKind::ObjectDetection => "object-detection",
            ModelKind::Classification => "classification",
            ModelKind::InstanceSegmentation => "instance-segmentation",
        }
    }
}

impl TryFrom<String> for ModelKind {
    type Error = InferenceError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "object-detection" => Ok(Self::ObjectDetection),
            "classification" => Ok(Self::Classification),
            "instance-segmentation" => Ok(Self::InstanceSegmentation),
            other => Err(InferenceError::UnsupportedModelType(other.to_string())),
        }
    }
}

/// Per-client configuration: credential, target model version and the
/// service endpoints to reach it on.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub(crate) api_key: ApiKey,
    pub(crate) dataset_id: String,
    pub(crate) version: String,
    pub(crate) kind: ModelKind,
    pub(crate) colors: HashMap<String, String>,
    pub(crate) inference_url: String,
    pub(crate) api_url: String,
}

impl ClientConfig {
    /// `model_id` must be a `workspace/dataset/version` triple.
    pub fn new(api_key: ApiKey, model_id: &str, kind: ModelKind) -> Result<Self, InferenceError> {
        let mut segments = model_id.split('/');
        let (dataset_id, version) = match (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) {
            (Some(workspace), Some(dataset), Some(version), None)
                if !workspace.is_empty() && !dataset.is_empty() && !version.is_empty() =>
            {
                (dataset.to_string(), version.to_string())
            }
            _ => return Err(InferenceError::InvalidModelId(model_id.to_string())),
        };

        Ok(Self {
            api_key,
            dataset_id,
            version,
            kind,
            colors: HashMap::new(),
            inference_url: DEFAULT_INFERENCE_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
        })
    }

    /// Label to display-color map, passed through unchanged to prediction
    /// results.
    pub fn with_colors(mut self, colors: HashMap<String, String>) -> Self {
        self.colors = colors;
        self
    }

    pub fn with_inference_url(mut self, url: impl Into<String>) -> Self {
        self.inference_url = url.into();
        self
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    pub fn dataset_id(&self) -> &str {
        &self.dataset_id
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub client: ClientSettings,
    #[serde(deserialize_with = "deserialize_log_level")]
    pub log_level: LogLevel,
}

fn deserialize_log_level<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.try_into().map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClientSettings {
    pub api_key: ApiKey,
    pub model_id: String,
    pub model_kind: ModelKind,
    #[serde(default = "default_inference_url")]
    pub inference_url: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

fn default_inference_url() -> String {
    DEFAULT_INFERENCE_URL.to_string()
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

impl ClientSettings {
    pub fn client_config(&self) -> Result<ClientConfig, InferenceError> {
        Ok(
            ClientConfig::new(self.api_key.clone(), &self.model_id, self.model_kind)?
                .with_inference_url(&self.inference_url)
                .with_api_url(&self.api_url),
        )
    }
}

#[derive(Debug, Deserialize, Clone)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub enum LogLevel {
    Debug,
    Info,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            other => Err(format!(
                "{} is not a supported minimum log level. Use either `debug` or `info`.",
                other
            )),
        }
    }
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let base_path = std::env::current_dir().expect("Failed to determine the current directory");
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .expect("Failed to parse APP_ENVIRONMENT");

    let settings = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(config::File::from(
            configuration_directory.join(format!("{}.yaml", environment.as_str())),
        ))
        .add_source(
            config::Environment::with_prefix("VF")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    let settings: Settings = settings.try_deserialize::<Settings>()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_id_splits_into_dataset_and_version() {
        let config = ClientConfig::new(
            ApiKey::new("key"),
            "acme/traffic-cams/3",
            ModelKind::ObjectDetection,
        )
        .unwrap();

        assert_eq!(config.dataset_id(), "traffic-cams");
        assert_eq!(config.version(), "3");
    }

    #[test]
    fn model_id_with_wrong_segment_count_is_rejected() {
        for bad in ["", "traffic-cams/3", "a/b/c/d", "a//3"] {
            let result = ClientConfig::new(ApiKey::new("key"), bad, ModelKind::Classification);
            assert!(
                matches!(result, Err(InferenceError::InvalidModelId(_))),
                "expected InvalidModelId for {:?}",
                bad
            );
        }
    }

    #[test]
    fn unknown_model_kind_is_rejected() {
        let result = ModelKind::try_from("pose-estimation".to_string());
        assert!(matches!(
            result,
            Err(InferenceError::UnsupportedModelType(_))
        ));
    }

    #[test]
    fn api_key_debug_output_is_redacted() {
        let key = ApiKey::new("super-secret");
        let debug = format!("{:?}", key);
        assert!(!debug.contains("super-secret"));

        let config =
            ClientConfig::new(key, "acme/traffic-cams/3", ModelKind::ObjectDetection).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret"));
    }
}
