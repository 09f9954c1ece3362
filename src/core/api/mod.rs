mod http;
pub mod types;

#[cfg(test)]
pub(crate) mod fake;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::core::proxy::ProxyEndpoint;

pub use http::HttpApiFactory;
pub use types::{
    DiamondSnapshot, DiamondState, FarmingSnapshot, FarmingState, Profile, Task, TaskStatus,
};

/// The named remote operations, used for error context and call accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Auth,
    Profile,
    DailyCheckIn,
    FarmingState,
    FarmingStart,
    FarmingClaim,
    DiamondState,
    DiamondClaim,
    Tasks,
    TaskStart,
    TaskClaim,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Auth => "auth",
            Operation::Profile => "profile",
            Operation::DailyCheckIn => "daily-checkin",
            Operation::FarmingState => "farming-state",
            Operation::FarmingStart => "farming-start",
            Operation::FarmingClaim => "farming-claim",
            Operation::DiamondState => "diamond-state",
            Operation::DiamondClaim => "diamond-claim",
            Operation::Tasks => "tasks",
            Operation::TaskStart => "task-start",
            Operation::TaskClaim => "task-claim",
        }
    }

    /// True for calls that change remote state.
    pub fn is_mutating(self) -> bool {
        matches!(
            self,
            Operation::DailyCheckIn
                | Operation::FarmingStart
                | Operation::FarmingClaim
                | Operation::DiamondClaim
                | Operation::TaskStart
                | Operation::TaskClaim
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any transport, status or decoding failure of a single remote call.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{operation} failed: {message}")]
pub struct ApiError {
    pub operation: Operation,
    pub message: String,
}

impl ApiError {
    pub fn new(operation: Operation, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

/// Bearer credential for one account during one cycle.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(***)")
    }
}

#[async_trait]
pub trait FarmApi: Send + Sync {
    async fn authenticate(&self, payload: &str) -> Result<SessionToken, ApiError>;

    async fn profile(&self, token: &SessionToken) -> Result<Profile, ApiError>;

    async fn daily_check_in(&self, token: &SessionToken) -> Result<(), ApiError>;

    async fn farming_state(&self, token: &SessionToken) -> Result<FarmingSnapshot, ApiError>;

    /// Starts a farming round; the returned snapshot carries the finish time when known.
    async fn start_farming(&self, token: &SessionToken) -> Result<FarmingSnapshot, ApiError>;

    async fn claim_farming(&self, token: &SessionToken) -> Result<(), ApiError>;

    async fn diamond_state(&self, token: &SessionToken) -> Result<DiamondSnapshot, ApiError>;

    async fn claim_diamond(
        &self,
        token: &SessionToken,
        diamond_number: &Value,
    ) -> Result<(), ApiError>;

    async fn tasks(&self, token: &SessionToken) -> Result<Vec<Task>, ApiError>;

    async fn start_task(&self, token: &SessionToken, task_id: &str) -> Result<(), ApiError>;

    async fn claim_task(&self, token: &SessionToken, task_id: &str) -> Result<(), ApiError>;
}

/// Builds the client used for one account, routed through its proxy when there is one.
pub trait ApiFactory: Send + Sync {
    fn client_for(&self, proxy: Option<&ProxyEndpoint>) -> Result<Arc<dyn FarmApi>>;
}
