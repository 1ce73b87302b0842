use chrono::{DateTime, Utc};
use rand::RngCore;
use rusqlite::{params, Connection, OpenFlags};

use crate::error::StoreError;
use crate::report::{
    ReportId, ReportSummary, StoredReport, WasteReport, STATUS_CLEANED, STATUS_DETECTED,
    STATUS_PENDING,
};

/// Persistence for waste reports.
///
/// `update_status` reports `true` only when a stored document actually
/// changed: an unknown id, a malformed id and a status that is already set
/// all yield `false`.
pub trait ReportStore: Send {
    fn insert(&mut self, report: &WasteReport) -> Result<ReportId, StoreError>;

    /// Newest first by timestamp, at most `limit` entries.
    fn list_recent(&mut self, limit: usize) -> Result<Vec<StoredReport>, StoreError>;

    fn update_status(&mut self, id: &str, status: &str) -> Result<bool, StoreError>;

    /// Counters over all reports; `today_activity` counts reports at or after `since`.
    fn summary(&mut self, since: DateTime<Utc>) -> Result<ReportSummary, StoreError>;
}

/// Unique in-memory SQLite URI, handy for tests sharing one database.
pub fn shared_memory_uri() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!(
        "file:garbage_detection_{:x}?mode=memory&cache=shared",
        u64::from_le_bytes(bytes)
    )
}

fn open_db_connection(db_url: &str) -> Result<Connection, StoreError> {
    let db_url = db_url.strip_prefix("sqlite://").unwrap_or(db_url);
    if db_url.starts_with("file:") {
        return Ok(Connection::open_with_flags(
            db_url,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI,
        )?);
    }
    Ok(Connection::open(db_url)?)
}

/// SQLite-backed `reports` collection.
///
/// Each row holds the report as a JSON document; `timestamp_ms` and `status`
/// are mirrored into columns for ordering and counting.
pub struct SqliteReportStore {
    conn: Connection,
}

impl SqliteReportStore {
    pub fn open(db_url: &str) -> Result<Self, StoreError> {
        let conn = open_db_connection(db_url)?;
        let mut store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&mut self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS reports (
              seq INTEGER PRIMARY KEY AUTOINCREMENT,
              id TEXT NOT NULL UNIQUE,
              timestamp_ms INTEGER NOT NULL,
              status TEXT NOT NULL,
              document TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_reports_timestamp ON reports(timestamp_ms);
            "#,
        )?;
        Ok(())
    }
}

impl ReportStore for SqliteReportStore {
    fn insert(&mut self, report: &WasteReport) -> Result<ReportId, StoreError> {
        let id = ReportId::generate();
        let document = serde_json::to_string(report)?;
        self.conn.execute(
            r#"
            INSERT INTO reports(id, timestamp_ms, status, document)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                id.as_str(),
                report.timestamp.timestamp_millis(),
                report.status,
                document
            ],
        )?;
        Ok(id)
    }

    fn list_recent(&mut self, limit: usize) -> Result<Vec<StoredReport>, StoreError> {
        let rows = {
            let mut stmt = self.conn.prepare(
                "SELECT id, document FROM reports ORDER BY timestamp_ms DESC, seq DESC LIMIT ?1",
            )?;
            let limit = i64::try_from(limit).unwrap_or(i64::MAX);
            let mut rows = stmt.query(params![limit])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let id: String = row.get(0)?;
                let document: String = row.get(1)?;
                out.push((id, document));
            }
            out
        };

        let mut reports = Vec::with_capacity(rows.len());
        for (id, document) in rows {
            let report: WasteReport = serde_json::from_str(&document)?;
            reports.push(StoredReport {
                id: ReportId::parse(&id).ok_or_else(|| {
                    StoreError::Corrupt(format!("stored report id '{id}' is malformed"))
                })?,
                report,
            });
        }
        Ok(reports)
    }

    fn update_status(&mut self, id: &str, status: &str) -> Result<bool, StoreError> {
        let Some(id) = ReportId::parse(id) else {
            return Ok(false);
        };
        let changed = self.conn.execute(
            r#"
            UPDATE reports
            SET status = ?2, document = json_set(document, '$.status', ?2)
            WHERE id = ?1 AND status <> ?2
            "#,
            params![id.as_str(), status],
        )?;
        Ok(changed > 0)
    }

    fn summary(&mut self, since: DateTime<Utc>) -> Result<ReportSummary, StoreError> {
        let summary = self.conn.query_row(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(status = ?1), 0),
                   COALESCE(SUM(status = ?2), 0),
                   COALESCE(SUM(status = ?3), 0),
                   COALESCE(SUM(timestamp_ms >= ?4), 0)
            FROM reports
            "#,
            params![
                STATUS_PENDING,
                STATUS_CLEANED,
                STATUS_DETECTED,
                since.timestamp_millis()
            ],
            |row| {
                Ok(ReportSummary {
                    total: row.get::<_, i64>(0)? as u64,
                    pending: row.get::<_, i64>(1)? as u64,
                    cleaned: row.get::<_, i64>(2)? as u64,
                    detected: row.get::<_, i64>(3)? as u64,
                    today_activity: row.get::<_, i64>(4)? as u64,
                })
            },
        )?;
        Ok(summary)
    }
}

#[derive(Clone, Debug)]
struct InMemoryReportEntry {
    seq: u64,
    stored: StoredReport,
}

/// Volatile store with the same ordering and update semantics as SQLite.
#[derive(Clone, Debug, Default)]
pub struct InMemoryReportStore {
    entries: Vec<InMemoryReportEntry>,
    next_seq: u64,
}

impl InMemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReportStore for InMemoryReportStore {
    fn insert(&mut self, report: &WasteReport) -> Result<ReportId, StoreError> {
        let id = ReportId::generate();
        self.entries.push(InMemoryReportEntry {
            seq: self.next_seq,
            stored: StoredReport {
                id: id.clone(),
                report: report.clone(),
            },
        });
        self.next_seq += 1;
        Ok(id)
    }

    fn list_recent(&mut self, limit: usize) -> Result<Vec<StoredReport>, StoreError> {
        let mut entries: Vec<&InMemoryReportEntry> = self.entries.iter().collect();
        entries.sort_by(|a, b| {
            b.stored
                .report
                .timestamp
                .cmp(&a.stored.report.timestamp)
                .then(b.seq.cmp(&a.seq))
        });
        Ok(entries
            .into_iter()
            .take(limit)
            .map(|entry| entry.stored.clone())
            .collect())
    }

    fn update_status(&mut self, id: &str, status: &str) -> Result<bool, StoreError> {
        let Some(id) = ReportId::parse(id) else {
            return Ok(false);
        };
        let Some(entry) = self.entries.iter_mut().find(|e| e.stored.id == id) else {
            return Ok(false);
        };
        if entry.stored.report.status == status {
            return Ok(false);
        }
        entry.stored.report.status = status.to_string();
        Ok(true)
    }

    fn summary(&mut self, since: DateTime<Utc>) -> Result<ReportSummary, StoreError> {
        let mut summary = ReportSummary::default();
        for entry in &self.entries {
            let report = &entry.stored.report;
            summary.total += 1;
            match report.status.as_str() {
                STATUS_PENDING => summary.pending += 1,
                STATUS_CLEANED => summary.cleaned += 1,
                STATUS_DETECTED => summary.detected += 1,
                _ => {}
            }
            // Match SQLite's millisecond resolution.
            if report.timestamp.timestamp_millis() >= since.timestamp_millis() {
                summary.today_activity += 1;
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn report_at(offset_s: i64) -> WasteReport {
        let mut report = WasteReport::detected("/uploads/a.jpg", 10.0, 20.0, 0.8);
        report.timestamp = DateTime::from_timestamp(1_700_000_000 + offset_s, 0).unwrap();
        report
    }

    fn stores() -> Vec<Box<dyn ReportStore>> {
        vec![
            Box::new(SqliteReportStore::open(&shared_memory_uri()).unwrap()),
            Box::new(InMemoryReportStore::new()),
        ]
    }

    #[test]
    fn list_recent_orders_newest_first_and_caps() {
        for mut store in stores() {
            for offset in [5, 1, 9, 3, 7] {
                store.insert(&report_at(offset)).unwrap();
            }
            let listed = store.list_recent(3).unwrap();
            let stamps: Vec<i64> = listed.iter().map(|r| r.report.timestamp.timestamp()).collect();
            assert_eq!(
                stamps,
                vec![1_700_000_009, 1_700_000_007, 1_700_000_005]
            );
        }
    }

    #[test]
    fn equal_timestamps_list_latest_insert_first() {
        for mut store in stores() {
            let first = store.insert(&report_at(0)).unwrap();
            let second = store.insert(&report_at(0)).unwrap();
            let listed = store.list_recent(10).unwrap();
            assert_eq!(listed[0].id, second);
            assert_eq!(listed[1].id, first);
        }
    }

    #[test]
    fn round_trips_report_fields() {
        for mut store in stores() {
            let report = report_at(42);
            let id = store.insert(&report).unwrap();
            let listed = store.list_recent(100).unwrap();
            assert_eq!(listed.len(), 1);
            assert_eq!(listed[0].id, id);
            assert_eq!(listed[0].report, report);
        }
    }

    #[test]
    fn update_status_overwrites_any_value() {
        for mut store in stores() {
            let id = store.insert(&report_at(0)).unwrap();

            assert!(store.update_status(id.as_str(), "cleaned").unwrap());
            assert!(store.update_status(id.as_str(), "recycled-by-volunteers").unwrap());

            let listed = store.list_recent(1).unwrap();
            assert_eq!(listed[0].report.status, "recycled-by-volunteers");
        }
    }

    #[test]
    fn update_status_same_value_reports_no_change() {
        for mut store in stores() {
            let id = store.insert(&report_at(0)).unwrap();
            assert!(!store.update_status(id.as_str(), "detected").unwrap());
        }
    }

    #[test]
    fn update_status_unknown_id_leaves_store_unchanged() {
        for mut store in stores() {
            store.insert(&report_at(0)).unwrap();
            let before = store.list_recent(10).unwrap();

            assert!(!store.update_status("abc123", "cleaned").unwrap());
            assert!(!store
                .update_status(ReportId::generate().as_str(), "cleaned")
                .unwrap());

            assert_eq!(store.list_recent(10).unwrap(), before);
        }
    }

    #[test]
    fn summary_counts_statuses_and_recent_activity() {
        for mut store in stores() {
            let a = store.insert(&report_at(0)).unwrap();
            let b = store.insert(&report_at(100)).unwrap();
            store.insert(&report_at(200)).unwrap();
            store.insert(&report_at(300)).unwrap();
            store.update_status(a.as_str(), "cleaned").unwrap();
            store.update_status(b.as_str(), "pending").unwrap();

            let since = DateTime::from_timestamp(1_700_000_000, 0).unwrap() + Duration::seconds(150);
            let summary = store.summary(since).unwrap();
            assert_eq!(
                summary,
                ReportSummary {
                    total: 4,
                    pending: 1,
                    cleaned: 1,
                    detected: 2,
                    today_activity: 2,
                }
            );
        }
    }

    #[test]
    fn sqlite_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports.db");
        let path = path.to_string_lossy().to_string();

        let id = {
            let mut store = SqliteReportStore::open(&path).unwrap();
            store.insert(&report_at(0)).unwrap()
        };

        let mut store = SqliteReportStore::open(&path).unwrap();
        let listed = store.list_recent(100).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, id);
    }
}
