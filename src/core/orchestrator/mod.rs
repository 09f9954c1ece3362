mod runner;

pub use runner::AccountRunner;

use crate::core::account::Account;

/// Lifecycle of one account within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Start,
    Authenticating,
    Authenticated,
    FetchingProfile,
    Profiled,
    ExecutingActions,
    Done,
    Aborted,
}

impl RunStage {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStage::Start => "start",
            RunStage::Authenticating => "authenticating",
            RunStage::Authenticated => "authenticated",
            RunStage::FetchingProfile => "fetching_profile",
            RunStage::Profiled => "profiled",
            RunStage::ExecutingActions => "executing_actions",
            RunStage::Done => "done",
            RunStage::Aborted => "aborted",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunStage::Done | RunStage::Aborted)
    }
}

pub fn can_transition(from: RunStage, to: RunStage) -> bool {
    match from {
        RunStage::Start => to == RunStage::Authenticating,
        RunStage::Authenticating => {
            matches!(to, RunStage::Authenticated | RunStage::Aborted)
        }
        RunStage::Authenticated => to == RunStage::FetchingProfile,
        RunStage::FetchingProfile => matches!(to, RunStage::Profiled | RunStage::Aborted),
        RunStage::Profiled => to == RunStage::ExecutingActions,
        // Aborting here only happens on shutdown; action failures never abort.
        RunStage::ExecutingActions => matches!(to, RunStage::Done | RunStage::Aborted),
        RunStage::Done | RunStage::Aborted => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountStatus {
    Completed,
    /// Stopped at the given stage because a required call failed.
    Aborted(RunStage),
    /// Stopped because the process is shutting down.
    Interrupted,
}

/// What one account contributed to the cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountOutcome {
    pub index: usize,
    pub name: String,
    pub status: AccountStatus,
    /// Raw balance string from the profile, when it was fetched.
    pub balance: Option<String>,
    /// Earliest "next diamond" timestamp this account reported.
    pub next_wake: Option<i64>,
    pub failed_actions: usize,
}

impl AccountOutcome {
    pub fn new(account: &Account) -> Self {
        Self {
            index: account.index,
            name: account.name.clone(),
            status: AccountStatus::Aborted(RunStage::Start),
            balance: None,
            next_wake: None,
            failed_actions: 0,
        }
    }
}
