//! Decides what to do for one account from the state the API just reported.
//!
//! `decide` is a pure function of the [`Snapshot`]: the clock is part of the
//! input, so evaluating the same snapshot twice yields the same actions.

use serde_json::Value;

use crate::core::api::{
    DiamondSnapshot, DiamondState, FarmingSnapshot, FarmingState, Task, TaskStatus,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub now_ms: i64,
    pub diamond: Option<DiamondSnapshot>,
    pub farming: Option<FarmingSnapshot>,
    pub tasks: Option<Vec<Task>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    CheckIn,
    ClaimDiamond { number: Value, reward: String },
    /// Records when the next diamond becomes available; no network call.
    ObserveDiamond { next_at: i64 },
    StartFarming,
    ClaimFarming,
    StartTask { id: String, slug: String },
    ClaimTask { id: String, slug: String, reward: String },
    /// Task is being verified remotely; log only.
    NoteVerifying { slug: String },
    /// Part of the snapshot was missing or unusable; log only.
    Skip { reason: String },
}

impl Action {
    /// True when executing the action issues a remote write.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Action::CheckIn
                | Action::ClaimDiamond { .. }
                | Action::StartFarming
                | Action::ClaimFarming
                | Action::StartTask { .. }
                | Action::ClaimTask { .. }
        )
    }
}

pub fn decide(snapshot: &Snapshot) -> Vec<Action> {
    let mut actions = vec![Action::CheckIn];
    diamond_actions(snapshot.diamond.as_ref(), &mut actions);
    farming_actions(snapshot.farming.as_ref(), snapshot.now_ms, &mut actions);
    task_actions(snapshot.tasks.as_deref(), &mut actions);
    actions
}

fn diamond_actions(diamond: Option<&DiamondSnapshot>, actions: &mut Vec<Action>) {
    let Some(diamond) = diamond else {
        actions.push(skip("diamond state unavailable"));
        return;
    };

    if diamond.state == Some(DiamondState::Available) {
        match (diamond.diamond_number.as_ref(), diamond.total_reward()) {
            (Some(number), Some(reward)) if !number.is_null() => {
                actions.push(Action::ClaimDiamond {
                    number: number.clone(),
                    reward: reward.to_string(),
                })
            }
            (Some(_), None) => {
                actions.push(skip("diamond available but settings.totalReward is missing"))
            }
            _ => actions.push(skip("diamond available but has no diamondNumber")),
        }
    } else if let Some(next_at) = diamond.next_at() {
        actions.push(Action::ObserveDiamond { next_at });
    }
}

fn farming_actions(farming: Option<&FarmingSnapshot>, now_ms: i64, actions: &mut Vec<Action>) {
    let Some(farming) = farming else {
        actions.push(skip("farming state unavailable"));
        return;
    };

    match &farming.state {
        Some(FarmingState::Idling) => actions.push(Action::StartFarming),
        Some(FarmingState::Farming | FarmingState::Farmed) => match farming.finish_at() {
            // Farming does not restart on its own after a claim.
            Some(finish) if now_ms > finish => {
                actions.push(Action::ClaimFarming);
                actions.push(Action::StartFarming);
            }
            Some(_) => {}
            None => actions.push(skip("farming in progress without a finish time")),
        },
        Some(FarmingState::Unknown(state)) => {
            actions.push(skip(&format!("unrecognized farming state '{}'", state)))
        }
        None => actions.push(skip("farming state missing from response")),
    }
}

fn task_actions(tasks: Option<&[Task]>, actions: &mut Vec<Action>) {
    let Some(tasks) = tasks else {
        actions.push(skip("task list unavailable"));
        return;
    };

    for task in tasks {
        match (&task.status, task.id.as_ref()) {
            (TaskStatus::InProgress, _) => {}
            (TaskStatus::Available, Some(id)) => actions.push(Action::StartTask {
                id: id.clone(),
                slug: task.slug.clone(),
            }),
            (TaskStatus::Verified, Some(id)) => actions.push(Action::ClaimTask {
                id: id.clone(),
                slug: task.slug.clone(),
                reward: task.reward_amount.clone().unwrap_or_else(|| "0".to_string()),
            }),
            (TaskStatus::Available | TaskStatus::Verified, None) => {
                actions.push(skip(&format!("task '{}' has no id", task.slug)))
            }
            (TaskStatus::Other(_), _) => actions.push(Action::NoteVerifying {
                slug: task.slug.clone(),
            }),
        }
    }
}

fn skip(reason: &str) -> Action {
    Action::Skip {
        reason: reason.to_string(),
    }
}
