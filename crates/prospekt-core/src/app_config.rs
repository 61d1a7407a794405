use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Which inference runtime executes the detection model.
///
/// `Portable` is a pure-Rust CPU runtime available on every build;
/// `Native` is ONNX Runtime and requires the `onnxruntime` build feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    Portable,
    Native,
}

impl std::fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuntimeKind::Portable => write!(f, "portable"),
            RuntimeKind::Native => write!(f, "native"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cpu,
    Cuda,
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda => write!(f, "cuda"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub retailers_path: PathBuf,
    pub model_path: PathBuf,
    pub model_input_size: u32,
    pub class_names: Vec<String>,
    pub runtime: RuntimeKind,
    pub device: Device,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub grouping_proximity: f32,
    pub max_concurrent_inferences: usize,
    pub scraper_request_timeout_secs: u64,
    pub scraper_user_agent: String,
    pub scraper_max_concurrent_pages: usize,
    pub scraper_max_retries: u32,
    pub scraper_retry_backoff_base_ms: u64,
    pub request_timeout_secs: u64,
    /// Product extraction; `None` unless `PROSPEKT_EXTRACTOR_ENABLED=true`.
    pub extractor: Option<ExtractorSettings>,
}

/// Vision-model endpoint used to read product names and prices from crops.
#[derive(Clone, PartialEq, Eq)]
pub struct ExtractorSettings {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    /// Minimum spacing between two extraction requests.
    pub min_interval_ms: u64,
}

impl std::fmt::Debug for ExtractorSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractorSettings")
            .field("api_key", &"[redacted]")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("min_interval_ms", &self.min_interval_ms)
            .finish()
    }
}
