use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::detect::DEFAULT_CONFIDENCE_THRESHOLD;
use crate::pipeline::DEFAULT_LIST_LIMIT;

const DEFAULT_DATABASE_URL: &str = "garbage_detection.db";
const DEFAULT_UPLOAD_DIR: &str = "uploads";
pub const DEFAULT_API_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;
const DEFAULT_DETECTOR_BACKEND: &str = "tract";
const DEFAULT_MODEL_PATH: &str = "yolov8n.onnx";
const DEFAULT_INPUT_SIZE: u32 = 640;

const KNOWN_BACKENDS: [&str; 2] = ["tract", "stub"];

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ServiceConfigFile {
    database_url: Option<String>,
    upload_dir: Option<PathBuf>,
    api: Option<ApiConfigFile>,
    detector: Option<DetectorConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ApiConfigFile {
    addr: Option<String>,
    max_upload_bytes: Option<usize>,
    list_limit: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    labels_path: Option<PathBuf>,
    input_size: Option<u32>,
    confidence_threshold: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// SQLite path or `file:` URI holding the `reports` collection.
    pub database_url: String,
    pub upload_dir: PathBuf,
    pub api: ApiSettings,
    pub detector: DetectorSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiSettings {
    pub addr: String,
    pub max_upload_bytes: usize,
    pub list_limit: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSettings {
    pub backend: String,
    pub model_path: PathBuf,
    pub labels_path: Option<PathBuf>,
    pub input_size: u32,
    pub confidence_threshold: f32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from_file(ServiceConfigFile::default())
    }
}

impl ServiceConfig {
    /// Read the file named by `GARBAGE_CONFIG` (if set), then apply env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("GARBAGE_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Like [`ServiceConfig::load`] with an explicit config file path.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self> {
        let file_cfg = match config_path {
            Some(path) => read_config_file(path)?,
            None => ServiceConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ServiceConfigFile) -> Self {
        let api = file.api.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        Self {
            database_url: file
                .database_url
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            upload_dir: file
                .upload_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOAD_DIR)),
            api: ApiSettings {
                addr: api.addr.unwrap_or_else(|| DEFAULT_API_ADDR.to_string()),
                max_upload_bytes: api.max_upload_bytes.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
                list_limit: api.list_limit.unwrap_or(DEFAULT_LIST_LIMIT),
            },
            detector: DetectorSettings {
                backend: detector
                    .backend
                    .unwrap_or_else(|| DEFAULT_DETECTOR_BACKEND.to_string()),
                model_path: detector
                    .model_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
                labels_path: detector.labels_path,
                input_size: detector.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
                confidence_threshold: detector
                    .confidence_threshold
                    .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(url) = non_empty_env("DATABASE_URL") {
            self.database_url = url;
        }
        if let Some(addr) = non_empty_env("GARBAGE_API_ADDR") {
            self.api.addr = addr;
        }
        if let Some(dir) = non_empty_env("GARBAGE_UPLOAD_DIR") {
            self.upload_dir = PathBuf::from(dir);
        }
        if let Some(backend) = non_empty_env("GARBAGE_DETECTOR") {
            self.detector.backend = backend;
        }
        if let Some(path) = non_empty_env("GARBAGE_MODEL_PATH") {
            self.detector.model_path = PathBuf::from(path);
        }
        if let Some(threshold) = non_empty_env("GARBAGE_CONFIDENCE_THRESHOLD") {
            self.detector.confidence_threshold = threshold.parse().map_err(|_| {
                anyhow!("GARBAGE_CONFIDENCE_THRESHOLD must be a number between 0 and 1")
            })?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.database_url.trim().is_empty() {
            return Err(anyhow!("database_url must not be empty"));
        }
        if self.upload_dir.as_os_str().is_empty() {
            return Err(anyhow!("upload_dir must not be empty"));
        }
        self.api
            .addr
            .parse::<SocketAddr>()
            .with_context(|| format!("invalid api addr '{}'", self.api.addr))?;
        if self.api.max_upload_bytes == 0 {
            return Err(anyhow!("max_upload_bytes must be greater than zero"));
        }
        if self.api.list_limit == 0 {
            return Err(anyhow!("list_limit must be greater than zero"));
        }

        self.detector.backend = self.detector.backend.trim().to_lowercase();
        if !KNOWN_BACKENDS.contains(&self.detector.backend.as_str()) {
            return Err(anyhow!(
                "unknown detector backend '{}' (expected one of {:?})",
                self.detector.backend,
                KNOWN_BACKENDS
            ));
        }
        let threshold = self.detector.confidence_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(anyhow!(
                "confidence_threshold must be in (0, 1], got {}",
                threshold
            ));
        }
        if self.detector.input_size == 0 || self.detector.input_size % 32 != 0 {
            return Err(anyhow!(
                "input_size must be a positive multiple of 32, got {}",
                self.detector.input_size
            ));
        }
        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<ServiceConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_reference_deployment() {
        let cfg = ServiceConfig::default();
        assert_eq!(cfg.database_url, "garbage_detection.db");
        assert_eq!(cfg.upload_dir, PathBuf::from("uploads"));
        assert_eq!(cfg.api.addr, "0.0.0.0:8000");
        assert_eq!(cfg.api.list_limit, 100);
        assert_eq!(cfg.detector.backend, "tract");
        assert_eq!(cfg.detector.confidence_threshold, 0.6);
        assert_eq!(cfg.detector.input_size, 640);
    }

    #[test]
    fn parses_partial_toml() {
        let file: ServiceConfigFile = toml::from_str(
            r#"
            upload_dir = "/var/lib/garbage/uploads"

            [detector]
            backend = "stub"
            "#,
        )
        .unwrap();
        let cfg = ServiceConfig::from_file(file);
        assert_eq!(cfg.upload_dir, PathBuf::from("/var/lib/garbage/uploads"));
        assert_eq!(cfg.detector.backend, "stub");
        assert_eq!(cfg.detector.model_path, PathBuf::from("yolov8n.onnx"));
        assert_eq!(cfg.api.addr, "0.0.0.0:8000");
    }

    #[test]
    fn rejects_unknown_keys() {
        let parsed: std::result::Result<ServiceConfigFile, _> =
            toml::from_str("databse_url = \"typo.db\"");
        assert!(parsed.is_err());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut cfg = ServiceConfig::default();
        cfg.detector.confidence_threshold = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = ServiceConfig::default();
        cfg.detector.backend = "opencv".into();
        assert!(cfg.validate().is_err());

        let mut cfg = ServiceConfig::default();
        cfg.api.addr = "not-an-addr".into();
        assert!(cfg.validate().is_err());

        let mut cfg = ServiceConfig::default();
        cfg.detector.input_size = 600;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_normalizes_backend_name() {
        let mut cfg = ServiceConfig::default();
        cfg.detector.backend = " Stub ".into();
        cfg.validate().unwrap();
        assert_eq!(cfg.detector.backend, "stub");
    }
}
