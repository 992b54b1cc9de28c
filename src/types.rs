// src/types.rs - Records exchanged with the panel backend

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::warn;

/// Samples kept per inbound for the usage chart (one per second on the backend).
pub const STATS_WINDOW: usize = 60;

/// Consolidated state returned by `GET /api/data`.
///
/// Decoding never fails on a field's shape: absent, `null` or mistyped values
/// fall back to defaults, and list entries that cannot be read at all (an
/// inbound without a usable port, a sample that is not an object) are dropped
/// one by one so the rest of the snapshot still shows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardData {
    #[serde(default, deserialize_with = "lenient_seq")]
    pub inbounds: Vec<InboundConfig>,
    #[serde(default, deserialize_with = "lenient_seq")]
    pub logs: Vec<LogEntry>,
    #[serde(default, deserialize_with = "lenient_record")]
    pub sys: SystemSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundConfig {
    #[serde(deserialize_with = "port_number")]
    pub port: u16,
    #[serde(default, deserialize_with = "lenient_string")]
    pub path: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub uuid: String,
    #[serde(default, deserialize_with = "lenient_seq")]
    pub stats: Vec<SampleStat>,
    #[serde(default, deserialize_with = "lenient_bool", skip_serializing_if = "Option::is_none")]
    pub online: Option<bool>,
}

/// One bandwidth sample. Rates are kB/s, totals are cumulative kB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleStat {
    #[serde(deserialize_with = "lenient_f64")]
    pub up: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub down: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub total_down: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub total_up: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogEntry {
    #[serde(deserialize_with = "lenient_log_id")]
    pub id: LogId,
    #[serde(deserialize_with = "lenient_string")]
    pub time: String,
    #[serde(deserialize_with = "lenient_string")]
    pub domain: String,
    #[serde(deserialize_with = "lenient_string")]
    pub method: String,
    #[serde(deserialize_with = "lenient_string")]
    pub size: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LogId {
    Number(i64),
    Text(String),
}

impl Default for LogId {
    fn default() -> Self {
        LogId::Text(String::new())
    }
}

impl fmt::Display for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogId::Number(n) => write!(f, "{}", n),
            LogId::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemSnapshot {
    #[serde(deserialize_with = "lenient_f64")]
    pub cpu: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub ram: f64,
    #[serde(deserialize_with = "uptime_or_default")]
    pub uptime: String,
    #[serde(deserialize_with = "lenient_u64")]
    pub connections: u64,
    #[serde(deserialize_with = "traffic_or_default")]
    pub total_traffic: String,
}

impl Default for SystemSnapshot {
    fn default() -> Self {
        Self {
            cpu: 0.0,
            ram: 0.0,
            uptime: "Live".to_string(),
            connections: 0,
            total_traffic: "0.00 MB".to_string(),
        }
    }
}

impl InboundConfig {
    /// Most recent sample, or a zero sample when the backend sent none.
    pub fn latest_stat(&self) -> SampleStat {
        self.stats.last().copied().unwrap_or_default()
    }

    /// Cumulative download of the latest sample in MB.
    pub fn total_consumed_mb(&self) -> f64 {
        self.latest_stat().total_down / 1024.0
    }

    /// The trailing [`STATS_WINDOW`] samples, oldest first.
    pub fn window(&self) -> &[SampleStat] {
        let start = self.stats.len().saturating_sub(STATS_WINDOW);
        &self.stats[start..]
    }
}

impl DashboardData {
    pub fn inbound(&self, port: u16) -> Option<&InboundConfig> {
        self.inbounds.iter().find(|ib| ib.port == port)
    }
}

/// Decode a list entry by entry, dropping the ones that do not fit `T`.
fn lenient_seq<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let items = match Value::deserialize(deserializer)? {
        Value::Array(items) => items,
        Value::Null => return Ok(Vec::new()),
        other => {
            warn!(event = "payload.field_ignored", found = %value_kind(&other), "Expected a list; using an empty one.");
            return Ok(Vec::new());
        }
    };

    Ok(items
        .into_iter()
        .filter_map(|item| match T::deserialize(item) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(event = "payload.entry_skipped", error = %e, "Dropped an unreadable list entry.");
                None
            }
        })
        .collect())
}

fn lenient_record<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(T::default()),
        value => Ok(T::deserialize(value).unwrap_or_else(|e| {
            warn!(event = "payload.field_ignored", error = %e, "Unreadable record replaced with defaults.");
            T::default()
        })),
    }
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64().unwrap_or_default(),
        Value::String(s) => s.trim().parse().unwrap_or_default(),
        _ => 0.0,
    })
}

fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .unwrap_or_default(),
        Value::String(s) => s.trim().parse().unwrap_or_default(),
        _ => 0,
    })
}

fn text(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(text(Value::deserialize(deserializer)?).unwrap_or_default())
}

fn uptime_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(text(Value::deserialize(deserializer)?).unwrap_or_else(|| SystemSnapshot::default().uptime))
}

fn traffic_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(text(Value::deserialize(deserializer)?).unwrap_or_else(|| SystemSnapshot::default().total_traffic))
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => Some(b),
        _ => None,
    })
}

fn lenient_log_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<LogId, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_i64().map(LogId::Number).unwrap_or_else(|| LogId::Text(n.to_string())),
        Value::String(s) => LogId::Text(s),
        _ => LogId::default(),
    })
}

/// The port identifies an inbound, so an entry without a usable one is rejected.
fn port_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let port = match &value {
        Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    port.ok_or_else(|| D::Error::custom(format!("invalid inbound port {}", value)))
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
