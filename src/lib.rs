//! Garbage Detection API
//!
//! Accepts geotagged photos, runs them through an object detector and keeps a
//! report for every photo in which something was found. Clients list reports,
//! mark them cleaned or pending, and read dashboard counters.
//!
//! # Module Structure
//!
//! - `detect`: detector adapter (`Detector`) over pluggable model backends
//! - `storage`: the `reports` collection (SQLite or in-memory)
//! - `pipeline`: report use cases (`ReportService`)
//! - `api`: HTTP surface
//! - `config`: file + environment configuration

use anyhow::{anyhow, Result};

pub mod api;
pub mod config;
pub mod detect;
pub mod error;
pub mod pipeline;
pub mod report;
pub mod storage;

pub use detect::{Detection, Detector, DetectorBackend, LabelTable, RawDetection, StubBackend};
pub use error::{Error, StoreError};
pub use pipeline::{CreateOutcome, ReportService, Submission};
pub use report::{ReportId, ReportSummary, StoredReport, WasteReport};
pub use storage::{InMemoryReportStore, ReportStore, SqliteReportStore};

use config::{DetectorSettings, ServiceConfig};

/// Construct the detector named by `settings.backend`.
pub fn build_detector(settings: &DetectorSettings) -> Result<Detector> {
    let labels = match &settings.labels_path {
        Some(path) => LabelTable::from_file(path)?,
        None => LabelTable::coco(),
    };
    let backend: Box<dyn DetectorBackend> = match settings.backend.as_str() {
        "stub" => {
            log::warn!("stub detector selected: every upload will report no detections");
            Box::new(StubBackend::new())
        }
        #[cfg(feature = "backend-tract")]
        "tract" => Box::new(detect::TractBackend::new(
            &settings.model_path,
            settings.input_size,
        )?),
        other => {
            return Err(anyhow!(
                "detector backend '{}' is not available in this build",
                other
            ))
        }
    };
    let detector = Detector::from_boxed(backend, labels).with_threshold(settings.confidence_threshold);
    detector.warm_up()?;
    Ok(detector)
}

/// Open the store, load the model and wire up the report service.
pub fn build_service(cfg: &ServiceConfig) -> Result<ReportService> {
    let detector = build_detector(&cfg.detector)?;
    let store = SqliteReportStore::open(&cfg.database_url)?;
    let service = ReportService::new(detector, store, &cfg.upload_dir)?
        .with_list_limit(cfg.api.list_limit);
    Ok(service)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_stub_service_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = ServiceConfig::default();
        cfg.database_url = storage::shared_memory_uri();
        cfg.upload_dir = dir.path().join("uploads");
        cfg.detector.backend = "stub".into();
        cfg.api.list_limit = 5;

        let service = build_service(&cfg).unwrap();
        assert_eq!(service.detector().backend_name(), "stub");
        assert!(service.upload_dir().is_dir());
        assert!(service.list_reports().unwrap().is_empty());
    }

    #[test]
    fn unknown_backend_is_an_error() {
        let mut settings = ServiceConfig::default().detector;
        settings.backend = "opencv".into();
        assert!(build_detector(&settings).is_err());
    }

    #[test]
    fn missing_labels_file_is_an_error() {
        let mut settings = ServiceConfig::default().detector;
        settings.backend = "stub".into();
        settings.labels_path = Some("/nonexistent/labels.txt".into());
        assert!(build_detector(&settings).is_err());
    }
}
