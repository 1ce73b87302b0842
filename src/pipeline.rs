//! Report use cases: create (read, infer, save, insert), list, status update
//! and dashboard summary.
//!
//! All methods are synchronous; the HTTP layer runs them on the blocking pool.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::detect::{max_confidence, Detection, Detector};
use crate::error::{Error, Result, StoreError};
use crate::report::{ReportId, ReportSummary, StoredReport, WasteReport};
use crate::storage::ReportStore;

/// Reports returned by a listing unless configured otherwise.
pub const DEFAULT_LIST_LIMIT: usize = 100;

/// URL prefix under which saved uploads are referenced.
pub const UPLOADS_URL_PREFIX: &str = "/uploads";

/// A photo submitted for analysis.
#[derive(Clone, Debug)]
pub struct Submission {
    pub latitude: f64,
    pub longitude: f64,
    /// Client-supplied filename; only its extension is kept.
    pub filename: Option<String>,
    pub image: Vec<u8>,
}

/// Result of a create-report call.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CreateOutcome {
    /// Nothing above threshold: no file written, nothing stored.
    NoWasteDetected { detections: Vec<Detection> },
    Success {
        id: ReportId,
        detections: Vec<Detection>,
    },
}

pub struct ReportService {
    detector: Detector,
    store: Mutex<Box<dyn ReportStore>>,
    upload_dir: PathBuf,
    list_limit: usize,
}

impl ReportService {
    /// Build the service, creating `upload_dir` if it does not exist.
    pub fn new<S: ReportStore + 'static>(
        detector: Detector,
        store: S,
        upload_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        Self::from_boxed(detector, Box::new(store), upload_dir)
    }

    pub fn from_boxed(
        detector: Detector,
        store: Box<dyn ReportStore>,
        upload_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let upload_dir = upload_dir.into();
        std::fs::create_dir_all(&upload_dir)?;
        Ok(Self {
            detector,
            store: Mutex::new(store),
            upload_dir,
            list_limit: DEFAULT_LIST_LIMIT,
        })
    }

    pub fn with_list_limit(mut self, list_limit: usize) -> Self {
        self.list_limit = list_limit;
        self
    }

    pub fn detector(&self) -> &Detector {
        &self.detector
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn create_report(&self, submission: Submission) -> Result<CreateOutcome> {
        let detections = self.detector.predict(&submission.image)?;
        let Some(confidence_score) = max_confidence(&detections) else {
            log::debug!("no detections in submitted image, nothing stored");
            return Ok(CreateOutcome::NoWasteDetected {
                detections: Vec::new(),
            });
        };

        let extension = upload_extension(submission.filename.as_deref())?;
        let file_name = format!("{}.{}", Uuid::new_v4(), extension);
        let file_path = self.upload_dir.join(&file_name);
        std::fs::write(&file_path, &submission.image)?;

        let report = WasteReport::detected(
            format!("{UPLOADS_URL_PREFIX}/{file_name}"),
            submission.latitude,
            submission.longitude,
            confidence_score,
        );

        let inserted = self.lock_store().and_then(|mut store| store.insert(&report));
        let id = match inserted {
            Ok(id) => id,
            Err(err) => {
                if let Err(cleanup) = std::fs::remove_file(&file_path) {
                    log::warn!(
                        "failed to remove orphaned upload {}: {}",
                        file_path.display(),
                        cleanup
                    );
                }
                return Err(err.into());
            }
        };

        log::info!(
            "report {} stored: {} detection(s), confidence {:.3}",
            id,
            detections.len(),
            confidence_score
        );
        Ok(CreateOutcome::Success { id, detections })
    }

    /// Most recent reports, newest first.
    pub fn list_reports(&self) -> Result<Vec<StoredReport>> {
        Ok(self.lock_store()?.list_recent(self.list_limit)?)
    }

    /// Overwrite a report's status. `false` covers both an unknown id and a
    /// status that was already set.
    pub fn update_status(&self, report_id: &str, status: &str) -> Result<bool> {
        let modified = self.lock_store()?.update_status(report_id, status)?;
        if modified {
            log::info!("report {} marked as {}", report_id, status);
        } else if ReportId::parse(report_id).is_none() {
            log::debug!("status update for malformed report id '{}'", report_id);
        } else {
            log::debug!("status update for {} changed nothing", report_id);
        }
        Ok(modified)
    }

    pub fn summary(&self) -> Result<ReportSummary> {
        Ok(self.lock_store()?.summary(start_of_utc_day(Utc::now()))?)
    }

    fn lock_store(&self) -> std::result::Result<MutexGuard<'_, Box<dyn ReportStore>>, StoreError> {
        self.store.lock().map_err(|_| StoreError::Poisoned)
    }
}

/// Extension of the last `.`-delimited segment of `filename`.
///
/// Uploads without one are rejected instead of being stored under a guessed
/// name; the segment must be alphanumeric so it cannot escape the upload dir.
pub fn upload_extension(filename: Option<&str>) -> Result<String> {
    let filename = filename
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| Error::InvalidUpload("image filename is missing".to_string()))?;
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .ok_or_else(|| {
            Error::InvalidUpload(format!("image filename '{filename}' has no usable extension"))
        })?;
    Ok(extension.to_string())
}

fn start_of_utc_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::default()).and_utc()
}
