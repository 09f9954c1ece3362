use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::{AccountOutcome, AccountStatus, RunStage, can_transition};
use crate::core::account::Account;
use crate::core::api::{ApiError, FarmApi, FarmingState, SessionToken};
use crate::core::config::{DelayRange, ScheduleConfig};
use crate::core::evaluator::{Action, Snapshot, decide};
use crate::core::terminal::account_header;
use crate::core::timing::{Jitter, WaitOutcome, Waiter, format_millis, now_millis};

const CLICK_TARGET: (f64, f64) = (250.0, 250.0);
const CLICK_RADIUS: f64 = 50.0;
const VIEWPORT: (u32, u32) = (500, 500);
const MISCLICK_PAUSE: Duration = Duration::from_millis(500);

/// Drives one account through auth, profile, state fetch and the decided actions.
pub struct AccountRunner<'a> {
    api: &'a dyn FarmApi,
    waiter: &'a dyn Waiter,
    jitter: &'a mut Jitter,
    schedule: &'a ScheduleConfig,
    stage: RunStage,
}

impl<'a> AccountRunner<'a> {
    pub fn new(
        api: &'a dyn FarmApi,
        waiter: &'a dyn Waiter,
        jitter: &'a mut Jitter,
        schedule: &'a ScheduleConfig,
    ) -> Self {
        Self {
            api,
            waiter,
            jitter,
            schedule,
            stage: RunStage::Start,
        }
    }

    pub fn stage(&self) -> RunStage {
        self.stage
    }

    pub async fn run(&mut self, account: &Account) -> AccountOutcome {
        let mut outcome = AccountOutcome::new(account);
        info!("{}", account_header(account.position(), &account.name));

        self.advance(RunStage::Authenticating);
        let token = match self.api.authenticate(&account.payload).await {
            Ok(token) => token,
            Err(e) => {
                error!("Authentication error: {}", e);
                return self.abort(outcome);
            }
        };
        self.advance(RunStage::Authenticated);
        info!("Login successful!");

        self.advance(RunStage::FetchingProfile);
        let profile = match self.api.profile(&token).await {
            Ok(profile) => profile,
            Err(e) => {
                error!("Error fetching profile: {}", e);
                return self.abort(outcome);
            }
        };
        self.advance(RunStage::Profiled);
        // A missing balance is reported as unreadable, not as zero.
        let balance = profile.balance.unwrap_or_else(|| {
            warn!("Profile response has no balance");
            String::new()
        });
        if !balance.is_empty() {
            info!("Balance: {}", balance);
        }
        outcome.balance = Some(balance);

        self.advance(RunStage::ExecutingActions);
        let snapshot = self.snapshot(&token).await;
        let actions = decide(&snapshot);
        debug!(
            "{} action(s) planned, {} of them writes",
            actions.len(),
            actions.iter().filter(|a| a.is_mutating()).count()
        );
        for action in actions {
            match self.execute(&token, &action, &mut outcome).await {
                Ok(WaitOutcome::Elapsed) => {}
                Ok(WaitOutcome::Cancelled) => {
                    warn!("Shutdown requested, leaving {} early", account.name);
                    self.advance(RunStage::Aborted);
                    outcome.status = AccountStatus::Interrupted;
                    return outcome;
                }
                Err(e) => {
                    outcome.failed_actions += 1;
                    error!("{}", e);
                }
            }
        }

        self.advance(RunStage::Done);
        outcome.status = AccountStatus::Completed;
        outcome
    }

    fn advance(&mut self, to: RunStage) {
        if !can_transition(self.stage, to) {
            warn!(
                "Unexpected account stage change {} -> {}",
                self.stage.as_str(),
                to.as_str()
            );
        }
        self.stage = to;
    }

    fn abort(&mut self, mut outcome: AccountOutcome) -> AccountOutcome {
        outcome.status = AccountStatus::Aborted(self.stage);
        self.advance(RunStage::Aborted);
        outcome
    }

    /// Reads diamond, farming and task state. A failed read leaves its section empty.
    async fn snapshot(&self, token: &SessionToken) -> Snapshot {
        let diamond = self
            .api
            .diamond_state(token)
            .await
            .inspect_err(|e| error!("Error fetching diamond state: {}", e))
            .ok();

        let farming = self
            .api
            .farming_state(token)
            .await
            .inspect_err(|e| error!("Error fetching farming state: {}", e))
            .ok();
        if let Some(farming) = &farming
            && matches!(
                farming.state,
                Some(FarmingState::Farming | FarmingState::Farmed)
            )
            && let Some(finish) = farming.finish_at()
        {
            info!("Farming completion time: {}", format_millis(finish));
        }

        let tasks = self
            .api
            .tasks(token)
            .await
            .inspect_err(|e| error!("Error fetching tasks: {}", e))
            .ok();

        Snapshot {
            now_ms: now_millis(),
            diamond,
            farming,
            tasks,
        }
    }

    async fn human_pause(&mut self, range: DelayRange, label: &str) -> WaitOutcome {
        let secs = self
            .jitter
            .countdown_secs(range, self.schedule.countdown_jitter_secs);
        self.waiter.countdown(secs, label).await
    }

    async fn execute(
        &mut self,
        token: &SessionToken,
        action: &Action,
        outcome: &mut AccountOutcome,
    ) -> Result<WaitOutcome, ApiError> {
        match action {
            Action::CheckIn => {
                self.api.daily_check_in(token).await?;
                info!("Daily check-in done");
            }
            Action::ClaimDiamond { number, reward } => {
                if self
                    .human_pause(self.schedule.diamond_delay_secs, "claim Diamonds")
                    .await
                    .is_cancelled()
                {
                    return Ok(WaitOutcome::Cancelled);
                }
                if self.simulate_click().await.is_cancelled() {
                    return Ok(WaitOutcome::Cancelled);
                }
                self.api.claim_diamond(token, number).await?;
                info!("Success claim {} diamonds!", reward);
            }
            Action::ObserveDiamond { next_at } => {
                info!("Next Diamond time: {}", format_millis(*next_at));
                outcome.next_wake = Some(outcome.next_wake.map_or(*next_at, |w| w.min(*next_at)));
            }
            Action::StartFarming => {
                if self
                    .human_pause(self.schedule.farming_delay_secs, "start farming")
                    .await
                    .is_cancelled()
                {
                    return Ok(WaitOutcome::Cancelled);
                }
                let started = self.api.start_farming(token).await?;
                match started.finish_at() {
                    Some(finish) => info!("Farming started, completes at {}", format_millis(finish)),
                    None => info!("Farming started. No completion time available."),
                }
            }
            Action::ClaimFarming => {
                if self
                    .human_pause(self.schedule.farming_delay_secs, "claim farm")
                    .await
                    .is_cancelled()
                {
                    return Ok(WaitOutcome::Cancelled);
                }
                self.api.claim_farming(token).await?;
                info!("Farm claimed successfully!");
            }
            Action::StartTask { id, slug } => {
                if self
                    .human_pause(self.schedule.task_delay_secs, "start task")
                    .await
                    .is_cancelled()
                {
                    return Ok(WaitOutcome::Cancelled);
                }
                self.api.start_task(token, id).await?;
                info!("Starting task {}!", slug);
            }
            Action::ClaimTask { id, slug, reward } => {
                if self
                    .human_pause(self.schedule.task_delay_secs, "claim task")
                    .await
                    .is_cancelled()
                {
                    return Ok(WaitOutcome::Cancelled);
                }
                self.api.claim_task(token, id).await?;
                info!("Task {} complete, reward {} diamonds!", slug, reward);
            }
            Action::NoteVerifying { slug } => info!("Verifying task {}!", slug),
            Action::Skip { reason } => warn!("Skipping: {}", reason),
        }
        Ok(WaitOutcome::Elapsed)
    }

    /// Picks a tap point on the diamond, occasionally missing first, then hesitates.
    async fn simulate_click(&mut self) -> WaitOutcome {
        let (x, y) = self.jitter.point_in_disc(CLICK_TARGET, CLICK_RADIUS);
        if self.jitter.chance(self.schedule.misclick_chance) {
            let (mx, my) = self.jitter.point_in_rect(VIEWPORT.0, VIEWPORT.1);
            info!("Simulated misclick at ({}, {})", mx, my);
            if self.waiter.pause(MISCLICK_PAUSE).await.is_cancelled() {
                return WaitOutcome::Cancelled;
            }
        }
        info!("Claiming at ({}, {})", x, y);
        let hesitation = self.jitter.pick(self.schedule.claim_pause_ms);
        self.waiter.pause(Duration::from_millis(hesitation)).await
    }
}
