pub mod progress;
pub mod telegram;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::core::report::ReportSink;

/// Writes the cycle report to the log, one line per entry.
pub struct LogSink;

#[async_trait]
impl ReportSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, summary: &str) -> Result<()> {
        for line in summary.lines() {
            info!("{}", line);
        }
        Ok(())
    }
}

/// Delivers to every inner sink; one failing sink does not stop the others.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn ReportSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn ReportSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl ReportSink for FanoutSink {
    fn name(&self) -> &str {
        "fanout"
    }

    async fn deliver(&self, summary: &str) -> Result<()> {
        let mut failures = Vec::new();
        for sink in &self.sinks {
            if let Err(e) = sink.deliver(summary).await {
                failures.push(format!("{}: {:#}", sink.name(), e));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("{}", failures.join("; ")))
        }
    }
}
