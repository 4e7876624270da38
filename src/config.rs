use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub gemini: GeminiConfig,
    pub storage: StorageConfig,
    pub upload: UploadConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeminiConfig {
    pub project_id: String,
    pub location: String,
    pub model: String,
    /// Generative Language API key. When set, requests skip Vertex AI.
    #[serde(default)]
    pub api_key: Option<String>,
    /// OAuth access token for Vertex AI (e.g. `gcloud auth print-access-token`).
    #[serde(default)]
    pub access_token: Option<String>,
    /// Overrides the base URL, mostly for local stubs.
    #[serde(default)]
    pub endpoint: Option<String>,
    pub temperature: f32,
    pub top_p: f32,
    pub max_output_tokens: u32,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub endpoint: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket_name: String,
    pub reports_folder: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    pub max_file_size_mb: usize,
}

impl GeminiConfig {
    /// Configured API key, ignoring blank values.
    pub fn api_key(&self) -> Option<&str> {
        non_blank(self.api_key.as_deref())
    }

    /// Configured Vertex AI access token, ignoring blank values.
    pub fn access_token(&self) -> Option<&str> {
        non_blank(self.access_token.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl UploadConfig {
    pub fn max_file_size_bytes(&self) -> usize {
        self.max_file_size_mb * 1024 * 1024
    }
}

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("RUN_ENV").unwrap_or_else(|_| "development".into());

        Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{environment}")).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .ignore_empty(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Builds a config from the bundled defaults with one TOML override layered on top.
    pub fn from_toml_override(overrides: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
            .add_source(File::from_str(overrides, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}
