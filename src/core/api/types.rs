//! Wire models for the farming API. Every field is optional or defaulted so
//! that added, removed or retyped fields degrade instead of failing the call.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::warn;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Profile {
    /// Reported as a string by the API; kept raw and parsed by the report.
    #[serde(default, deserialize_with = "lenient_string")]
    pub balance: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Timings {
    #[serde(default, deserialize_with = "lenient_millis")]
    pub finish: Option<i64>,

    #[serde(default, rename = "nextAt", deserialize_with = "lenient_millis")]
    pub next_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum FarmingState {
    Idling,
    Farming,
    Farmed,
    Unknown(String),
}

impl From<String> for FarmingState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "idling" => FarmingState::Idling,
            "farming" => FarmingState::Farming,
            "farmed" => FarmingState::Farmed,
            _ => FarmingState::Unknown(value),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FarmingSnapshot {
    #[serde(default)]
    pub state: Option<FarmingState>,

    #[serde(default)]
    pub timings: Option<Timings>,
}

impl FarmingSnapshot {
    pub fn finish_at(&self) -> Option<i64> {
        self.timings.as_ref().and_then(|t| t.finish)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum DiamondState {
    Available,
    Unavailable(String),
}

impl From<String> for DiamondState {
    fn from(value: String) -> Self {
        if value == "available" {
            DiamondState::Available
        } else {
            DiamondState::Unavailable(value)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DiamondSettings {
    #[serde(default, rename = "totalReward", deserialize_with = "lenient_string")]
    pub total_reward: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DiamondSnapshot {
    #[serde(default)]
    pub state: Option<DiamondState>,

    /// Echoed back verbatim on claim, whatever JSON type the API used.
    #[serde(default, rename = "diamondNumber")]
    pub diamond_number: Option<Value>,

    #[serde(default)]
    pub settings: Option<DiamondSettings>,

    #[serde(default)]
    pub timings: Option<Timings>,
}

impl DiamondSnapshot {
    pub fn next_at(&self) -> Option<i64> {
        self.timings.as_ref().and_then(|t| t.next_at)
    }

    pub fn total_reward(&self) -> Option<&str> {
        self.settings
            .as_ref()
            .and_then(|s| s.total_reward.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum TaskStatus {
    Available,
    InProgress,
    Verified,
    Other(String),
}

impl From<String> for TaskStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "available" => TaskStatus::Available,
            "in-progress" => TaskStatus::InProgress,
            "verified" => TaskStatus::Verified,
            _ => TaskStatus::Other(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Task {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,

    #[serde(default, deserialize_with = "lenient_slug")]
    pub slug: String,

    #[serde(default = "unknown_status", deserialize_with = "lenient_status")]
    pub status: TaskStatus,

    #[serde(default, rename = "rewardAmount", deserialize_with = "lenient_string")]
    pub reward_amount: Option<String>,
}

fn unknown_status() -> TaskStatus {
    TaskStatus::Other(String::new())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskList {
    #[serde(default, deserialize_with = "lenient_tasks")]
    pub tasks: Vec<Task>,
}

/// Accepts a string or a number and keeps its textual form.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_slug<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_string(deserializer)?.unwrap_or_default())
}

/// Non-string statuses become `Other`, which the evaluator never writes for.
fn lenient_status<'de, D>(deserializer: D) -> Result<TaskStatus, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => TaskStatus::from(s),
        Some(other) => TaskStatus::Other(other.to_string()),
        None => unknown_status(),
    })
}

/// A null list reads as empty; entries that are not task objects are dropped one by one.
fn lenient_tasks<'de, D>(deserializer: D) -> Result<Vec<Task>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(Value::Array(entries)) = Option::<Value>::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };
    Ok(entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<Task>(entry) {
            Ok(task) => Some(task),
            Err(e) => {
                warn!("Dropping unreadable task entry: {}", e);
                None
            }
        })
        .collect())
}

/// Accepts a millisecond timestamp as an integer, a float or a numeric string.
fn lenient_millis<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok().map(|f| f as i64),
        _ => None,
    })
}
