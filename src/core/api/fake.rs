//! Scriptable in-memory [`FarmApi`] for orchestrator and scheduler tests.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use super::types::{DiamondSettings, Timings};
use super::{
    ApiError, ApiFactory, DiamondSnapshot, DiamondState, FarmApi, FarmingSnapshot, FarmingState,
    Operation, Profile, SessionToken, Task, TaskStatus,
};
use crate::core::proxy::ProxyEndpoint;

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub payload: Option<String>,
    pub operation: Operation,
    pub arg: Option<String>,
}

/// State served for one account, keyed by its auth payload.
#[derive(Debug, Clone, Default)]
pub struct FakeAccount {
    pub auth_fails: bool,
    pub profile: Option<Profile>,
    pub diamond: Option<DiamondSnapshot>,
    pub farming: Option<FarmingSnapshot>,
    pub tasks: Option<Vec<Task>>,
    pub failing: HashSet<Operation>,
}

#[derive(Default)]
struct Inner {
    accounts: HashMap<String, FakeAccount>,
    sessions: HashMap<String, String>,
    calls: Vec<Call>,
    proxies_seen: Vec<Option<String>>,
}

#[derive(Clone, Default)]
pub struct FakeApi {
    inner: Arc<Mutex<Inner>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(self, payload: &str, account: FakeAccount) -> Self {
        self.lock().accounts.insert(payload.to_string(), account);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn operations(&self) -> Vec<Operation> {
        self.lock().calls.iter().map(|c| c.operation).collect()
    }

    pub fn operations_for(&self, payload: &str) -> Vec<Operation> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.payload.as_deref() == Some(payload))
            .map(|c| c.operation)
            .collect()
    }

    pub fn proxies_seen(&self) -> Vec<Option<String>> {
        self.lock().proxies_seen.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Records the call and returns the account behind the token, or the scripted failure.
    fn enter(
        &self,
        token: &SessionToken,
        operation: Operation,
        arg: Option<String>,
    ) -> Result<FakeAccount, ApiError> {
        let mut inner = self.lock();
        let payload = inner.sessions.get(token.as_str()).cloned();
        inner.calls.push(Call {
            payload: payload.clone(),
            operation,
            arg,
        });
        let account = payload
            .and_then(|p| inner.accounts.get(&p).cloned())
            .ok_or_else(|| ApiError::new(operation, "HTTP 401: unknown session"))?;
        if account.failing.contains(&operation) {
            return Err(ApiError::new(operation, "HTTP 500: scripted failure"));
        }
        Ok(account)
    }
}

#[async_trait]
impl FarmApi for FakeApi {
    async fn authenticate(&self, payload: &str) -> Result<SessionToken, ApiError> {
        let mut inner = self.lock();
        inner.calls.push(Call {
            payload: Some(payload.to_string()),
            operation: Operation::Auth,
            arg: None,
        });
        match inner.accounts.get(payload) {
            Some(account) if !account.auth_fails => {
                let token = format!("tok-{}", inner.sessions.len() + 1);
                inner.sessions.insert(token.clone(), payload.to_string());
                Ok(SessionToken::new(token))
            }
            _ => Err(ApiError::new(Operation::Auth, "HTTP 401: invalid init data")),
        }
    }

    async fn profile(&self, token: &SessionToken) -> Result<Profile, ApiError> {
        self.enter(token, Operation::Profile, None)?
            .profile
            .ok_or_else(|| ApiError::new(Operation::Profile, "malformed response"))
    }

    async fn daily_check_in(&self, token: &SessionToken) -> Result<(), ApiError> {
        self.enter(token, Operation::DailyCheckIn, None).map(|_| ())
    }

    async fn farming_state(&self, token: &SessionToken) -> Result<FarmingSnapshot, ApiError> {
        self.enter(token, Operation::FarmingState, None)?
            .farming
            .ok_or_else(|| ApiError::new(Operation::FarmingState, "malformed response"))
    }

    async fn start_farming(&self, token: &SessionToken) -> Result<FarmingSnapshot, ApiError> {
        self.enter(token, Operation::FarmingStart, None)?;
        Ok(FarmingSnapshot::default())
    }

    async fn claim_farming(&self, token: &SessionToken) -> Result<(), ApiError> {
        self.enter(token, Operation::FarmingClaim, None).map(|_| ())
    }

    async fn diamond_state(&self, token: &SessionToken) -> Result<DiamondSnapshot, ApiError> {
        self.enter(token, Operation::DiamondState, None)?
            .diamond
            .ok_or_else(|| ApiError::new(Operation::DiamondState, "malformed response"))
    }

    async fn claim_diamond(
        &self,
        token: &SessionToken,
        diamond_number: &Value,
    ) -> Result<(), ApiError> {
        self.enter(token, Operation::DiamondClaim, Some(diamond_number.to_string()))
            .map(|_| ())
    }

    async fn tasks(&self, token: &SessionToken) -> Result<Vec<Task>, ApiError> {
        self.enter(token, Operation::Tasks, None)?
            .tasks
            .ok_or_else(|| ApiError::new(Operation::Tasks, "malformed response"))
    }

    async fn start_task(&self, token: &SessionToken, task_id: &str) -> Result<(), ApiError> {
        self.enter(token, Operation::TaskStart, Some(task_id.to_string()))
            .map(|_| ())
    }

    async fn claim_task(&self, token: &SessionToken, task_id: &str) -> Result<(), ApiError> {
        self.enter(token, Operation::TaskClaim, Some(task_id.to_string()))
            .map(|_| ())
    }
}

impl ApiFactory for FakeApi {
    fn client_for(&self, proxy: Option<&ProxyEndpoint>) -> Result<Arc<dyn FarmApi>> {
        self.lock().proxies_seen.push(proxy.map(|p| p.host.clone()));
        Ok(Arc::new(self.clone()))
    }
}

pub fn profile(balance: &str) -> Option<Profile> {
    Some(Profile {
        balance: Some(balance.to_string()),
    })
}

pub fn farming(state: FarmingState, finish: Option<i64>) -> Option<FarmingSnapshot> {
    Some(FarmingSnapshot {
        state: Some(state),
        timings: Some(Timings {
            finish,
            next_at: None,
        }),
    })
}

pub fn diamond_cooldown(next_at: i64) -> Option<DiamondSnapshot> {
    Some(DiamondSnapshot {
        state: Some(DiamondState::Unavailable("unavailable".to_string())),
        timings: Some(Timings {
            finish: None,
            next_at: Some(next_at),
        }),
        ..DiamondSnapshot::default()
    })
}

pub fn diamond_available(number: Value, reward: &str) -> Option<DiamondSnapshot> {
    Some(DiamondSnapshot {
        state: Some(DiamondState::Available),
        diamond_number: Some(number),
        settings: Some(DiamondSettings {
            total_reward: Some(reward.to_string()),
        }),
        timings: None,
    })
}

pub fn task(id: &str, slug: &str, status: TaskStatus) -> Task {
    Task {
        id: Some(id.to_string()),
        slug: slug.to_string(),
        status,
        reward_amount: Some("100".to_string()),
    }
}

/// Healthy account: balance "12.5", diamond on cooldown, farm idle, no tasks.
pub fn idle_account(next_diamond_at: i64) -> FakeAccount {
    FakeAccount {
        profile: profile("12.5"),
        diamond: diamond_cooldown(next_diamond_at),
        farming: farming(FarmingState::Idling, None),
        tasks: Some(Vec::new()),
        ..FakeAccount::default()
    }
}
