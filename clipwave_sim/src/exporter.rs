//! JSON run report exporter.
//!
//! Writes one scenario result, including every notification and the
//! per-node reception counts, for offline analysis.

use crate::runner::{ScenarioMetrics, ScenarioResult};
use clipwave_core::{FidelityReport, Notification};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// A single notification, flattened for JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub node: String,
    pub kind: String,
    pub time_sec: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<[f64; 3]>,
}

impl From<&Notification> for NotificationRecord {
    fn from(n: &Notification) -> Self {
        let (kind, position) = match n {
            Notification::PositionChange { position, .. } => ("position_change", Some([position.x, position.y, position.z])),
            Notification::Timeout { .. } => ("timeout", None),
        };
        Self {
            node: n.node().as_uuid().to_string(),
            kind: kind.to_string(),
            time_sec: n.time().as_secs_f64(),
            position,
        }
    }
}

/// Complete run export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Final simulation time in seconds
    pub duration_sec: f64,

    /// Final result
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    pub metrics: ScenarioMetrics,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fidelity: Option<FidelityReport>,

    /// Per-node reception counts in installation order
    pub receptions: Vec<u64>,

    /// All notifications in emission order
    pub notifications: Vec<NotificationRecord>,
}

impl RunExport {
    /// Builds the export from a finished scenario.
    pub fn from_result(result: &ScenarioResult) -> Self {
        Self {
            scenario: result.scenario.name().to_string(),
            seed: result.seed,
            duration_sec: result.final_time_secs,
            passed: result.passed,
            failure_reason: result.failure_reason.clone(),
            metrics: result.metrics.clone(),
            fidelity: result.fidelity.clone(),
            receptions: result.receptions.clone(),
            notifications: result.notifications.iter().map(NotificationRecord::from).collect(),
        }
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::ScenarioRunner;
    use crate::scenarios::ScenarioId;

    #[test]
    fn test_export_carries_notifications() {
        let result = ScenarioRunner::new(42, 1).run(ScenarioId::PositionChange);
        let export = RunExport::from_result(&result);

        assert_eq!(export.scenario, "position_change");
        assert_eq!(export.notifications.len(), 27);
        assert_eq!(export.notifications.iter().filter(|n| n.kind == "timeout").count(), 3);
        assert!(export
            .notifications
            .iter()
            .filter(|n| n.kind == "position_change")
            .all(|n| n.position.is_some()));

        let json = serde_json::to_string(&export).unwrap();
        let back: RunExport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.notifications, export.notifications);
        assert_eq!(back.metrics.position_changes, 24);
    }

    #[test]
    fn test_write_to_file() {
        let result = ScenarioRunner::new(1, 2).with_duration(1.0).run(ScenarioId::Clipping);
        let path = std::env::temp_dir().join(format!("clipwave-export-{}.json", std::process::id()));

        RunExport::from_result(&result).write_to_file(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["scenario"], "clipping");
        assert_eq!(value["receptions"].as_array().map(|a| a.len()), Some(4));
        assert!(value["fidelity"].is_object());
    }
}
