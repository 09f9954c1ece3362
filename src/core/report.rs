use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

use crate::core::orchestrator::{AccountOutcome, AccountStatus};

/// Destination for the end-of-cycle summary.
#[async_trait]
pub trait ReportSink: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, summary: &str) -> Result<()>;
}

/// Aggregate for one pass over all accounts. Reset at the start of every cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub completed_accounts: usize,
    pub total_balance: f64,
    /// Balances that could not be parsed and were counted as zero.
    pub anomalous_balances: usize,
}

impl CycleReport {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn record(&mut self, outcome: &AccountOutcome) {
        if let Some(raw) = outcome.balance.as_deref() {
            self.add_balance(raw);
        }
        if outcome.status == AccountStatus::Completed {
            self.completed_accounts += 1;
        }
    }

    pub fn add_balance(&mut self, raw: &str) {
        match parse_balance(raw) {
            Some(value) => self.total_balance += value,
            None => {
                warn!("Ignoring unparsable balance '{}' in cycle total", raw);
                self.anomalous_balances += 1;
            }
        }
    }

    pub fn summary(&self) -> String {
        let mut text = format!(
            "Cycle Report:\nCompleted Accounts: {}\nTotal Balance: {:.2}",
            self.completed_accounts, self.total_balance
        );
        if self.anomalous_balances > 0 {
            text.push_str(&format!(
                "\nPartial data: {} balance(s) could not be read",
                self.anomalous_balances
            ));
        }
        text
    }
}

/// Finite decimal value of a balance field, if it has one.
pub fn parse_balance(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}
