use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::warn;

pub const UNKNOWN_NAME: &str = "Unknown";

/// One automated identity. `index` is the line position in the account source
/// and decides proxy rotation and wake-up scheduling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub index: usize,
    pub payload: String,
    pub name: String,
}

#[derive(Deserialize)]
struct EmbeddedUser {
    #[serde(default)]
    first_name: Option<String>,
}

impl Account {
    pub fn new(index: usize, payload: String) -> Self {
        let name = match extract_first_name(&payload) {
            Ok(name) => name,
            Err(e) => {
                warn!("Account {}: could not read first_name ({})", index + 1, e);
                UNKNOWN_NAME.to_string()
            }
        };
        Self {
            index,
            payload,
            name,
        }
    }

    /// 1-based position for display.
    pub fn position(&self) -> usize {
        self.index + 1
    }
}

/// Pulls `first_name` out of the URL-encoded `user=` JSON embedded in the payload.
pub fn extract_first_name(payload: &str) -> Result<String> {
    let encoded = payload
        .split('&')
        .find_map(|pair| pair.strip_prefix("user="))
        .context("payload has no user= field")?;
    let decoded = urlencoding::decode(encoded).context("user= field is not valid percent-encoding")?;
    let user: EmbeddedUser = serde_json::from_str(&decoded).context("user= field is not JSON")?;
    Ok(user
        .first_name
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| UNKNOWN_NAME.to_string()))
}

pub fn parse_accounts(content: &str) -> Vec<Account> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(index, line)| Account::new(index, line.to_string()))
        .collect()
}

pub async fn load_accounts(path: &Path) -> Result<Vec<Account>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read account list {}", path.display()))?;
    Ok(parse_accounts(&content))
}
