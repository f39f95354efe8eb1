use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};

/// Severity of a telemetry record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Debug,
    Info,
    #[strum(to_string = "WARNING", serialize = "WARN")]
    Warning,
    Error,
}

/// One row of the append-only execution log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub id: i64,
    pub ts: DateTime<Utc>,
    pub level: Level,
    pub component: String,
    pub message: String,
    pub extra: Option<Value>,
}

impl TelemetryRecord {
    /// Single line used by the `logs` command
    pub fn render(&self) -> String {
        let mut line = format!(
            "{} [{}] {}: {}",
            self.ts.format("%Y-%m-%d %H:%M:%S"),
            self.level,
            self.component,
            self.message
        );
        if let Some(extra) = &self.extra {
            line.push_str(&format!(" {}", extra));
        }
        line
    }
}
