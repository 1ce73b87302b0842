use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const STATUS_DETECTED: &str = "detected";
pub const STATUS_CLEANED: &str = "cleaned";
pub const STATUS_PENDING: &str = "pending";

/// Store-assigned report identifier: 12 random bytes rendered as 24 lowercase
/// hex characters, the shape of a document-database object id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportId(String);

impl ReportId {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Accepts only well-formed ids; anything else cannot name a report.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase();
        if value.len() != 24 || hex::decode(&value).is_err() {
            return None;
        }
        Some(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A persisted submission that yielded at least one detection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WasteReport {
    pub image_url: String,
    pub latitude: f64,
    pub longitude: f64,
    pub confidence_score: f32,
    pub timestamp: DateTime<Utc>,
    /// Free-form: `detected`, `cleaned` and `pending` are the values clients
    /// use, but any string is stored as given.
    pub status: String,
}

impl WasteReport {
    /// New report stamped now with status `detected`.
    pub fn detected(
        image_url: impl Into<String>,
        latitude: f64,
        longitude: f64,
        confidence_score: f32,
    ) -> Self {
        Self {
            image_url: image_url.into(),
            latitude,
            longitude,
            confidence_score,
            timestamp: Utc::now(),
            status: STATUS_DETECTED.to_string(),
        }
    }
}

/// A report as read back from the store, with its identifier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredReport {
    #[serde(rename = "_id")]
    pub id: ReportId,
    #[serde(flatten)]
    pub report: WasteReport,
}

/// Dashboard counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total: u64,
    pub pending: u64,
    pub cleaned: u64,
    pub detected: u64,
    /// Reports created since the start of the current UTC day.
    pub today_activity: u64,
}
