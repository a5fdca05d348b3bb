//! Dry-run sink and CSV export
//!
//! In dry-run mode route plan rows are collected in memory instead of being
//! inserted, then written out as one CSV per distributor for review.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use tracing::info;

use crate::db::RouteSink;
use crate::types::RoutePlanEntry;

#[derive(Default)]
pub struct DryRunSink {
    rows: Mutex<Vec<RoutePlanEntry>>,
}

impl DryRunSink {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    /// Remove and return every collected row
    pub fn take_rows(&self) -> Vec<RoutePlanEntry> {
        std::mem::take(&mut *self.rows.lock())
    }

    /// Write the collected rows to `dir` and clear them.
    /// Returns the path of the written file.
    pub fn export_csv(&self, dir: &Path, entity: &str, start: NaiveDate, run_tag: &str) -> Result<PathBuf> {
        let rows = self.take_rows();
        write_csv(dir, &export_file_name(entity, start, run_tag), &rows)
    }
}

#[async_trait]
impl RouteSink for DryRunSink {
    async fn write_batch(&self, rows: &[RoutePlanEntry]) -> Result<u64> {
        self.rows.lock().extend_from_slice(rows);
        Ok(rows.len() as u64)
    }

    fn name(&self) -> &str {
        "dry-run"
    }
}

/// `route_plan_<entity>_<yyyymmdd>_<tag>.csv` with the entity name reduced
/// to filesystem-safe characters
pub fn export_file_name(entity: &str, start: NaiveDate, run_tag: &str) -> String {
    let slug: String = entity
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    format!("route_plan_{}_{}_{}.csv", slug, start.format("%Y%m%d"), run_tag)
}

fn write_csv(dir: &Path, file_name: &str, rows: &[RoutePlanEntry]) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create export dir {}", dir.display()))?;
    let path = dir.join(file_name);

    let mut writer = csv::Writer::from_path(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    info!("Exported {} route plan rows to {}", rows.len(), path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LocationKind, StopNumber};

    fn row(location_id: &str, stop_no: StopNumber) -> RoutePlanEntry {
        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        RoutePlanEntry {
            location_id: location_id.to_string(),
            route_date: date,
            name: "Sari-sari".to_string(),
            weekday: 1,
            territory: "TER01".to_string(),
            agent_id: "AG01".to_string(),
            route_name: "Prospect Route AG01 2025-03-10".to_string(),
            entity_id: "D1".to_string(),
            route_code: "TER01_W02_D1".to_string(),
            stop_no,
            kind: LocationKind::Prospect,
            zone_code: "Z1".to_string(),
        }
    }

    #[test]
    fn test_export_file_name_is_safe() {
        let start = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        assert_eq!(
            export_file_name("Metro Dist. #1", start, "ab12"),
            "route_plan_metro_dist___1_20250310_ab12.csv"
        );
    }

    #[tokio::test]
    async fn test_dry_run_sink_collects_and_exports() {
        let sink = DryRunSink::new();
        let written = sink
            .write_batch(&[row("P1", StopNumber::Sequenced(1)), row("P2", StopNumber::Unsequenced)])
            .await
            .unwrap();
        assert_eq!(written, 2);
        assert_eq!(sink.len(), 2);

        let dir = std::env::temp_dir().join(format!("prospect-planner-{}", uuid::Uuid::new_v4()));
        let start = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let path = sink.export_csv(&dir, "D1", start, "test").unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines[0],
            "location_id,route_date,name,weekday,territory,agent_id,route_name,entity_id,route_code,stop_no,kind,zone_code"
        );
        assert_eq!(
            lines[1],
            "P1,2025-03-10,Sari-sari,1,TER01,AG01,Prospect Route AG01 2025-03-10,D1,TER01_W02_D1,1,prospect,Z1"
        );
        assert!(lines[2].contains(",100,prospect,"));
        assert_eq!(sink.len(), 0);

        std::fs::remove_dir_all(&dir).ok();
    }
}
