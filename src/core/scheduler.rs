use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::core::account::load_accounts;
use crate::core::api::ApiFactory;
use crate::core::config::{ScheduleConfig, WakePolicy};
use crate::core::orchestrator::{AccountOutcome, AccountRunner, AccountStatus, RunStage};
use crate::core::proxy::ProxyPool;
use crate::core::report::{CycleReport, ReportSink};
use crate::core::timing::{Jitter, Waiter, now_millis};

/// Cycles never restart sooner than this after a known wake time.
const MIN_WAKE_DELAY_MS: i64 = 1_000;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleResult {
    pub report: CycleReport,
    /// Wake time chosen by the configured policy, if any account reported one.
    pub next_wake: Option<i64>,
    pub interrupted: bool,
}

/// Repeats the per-account pass forever, sleeping until the next diamond is due.
pub struct CycleScheduler {
    accounts_path: PathBuf,
    proxies: ProxyPool,
    factory: Arc<dyn ApiFactory>,
    sink: Arc<dyn ReportSink>,
    waiter: Arc<dyn Waiter>,
    schedule: ScheduleConfig,
    cancel: CancellationToken,
    jitter: Jitter,
    report: CycleReport,
}

impl CycleScheduler {
    pub fn new(
        accounts_path: PathBuf,
        proxies: ProxyPool,
        factory: Arc<dyn ApiFactory>,
        sink: Arc<dyn ReportSink>,
        waiter: Arc<dyn Waiter>,
        schedule: ScheduleConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            accounts_path,
            proxies,
            factory,
            sink,
            waiter,
            schedule,
            cancel,
            jitter: Jitter::from_entropy(),
            report: CycleReport::default(),
        }
    }

    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// Runs cycles until cancelled, or exactly one when `once` is set.
    pub async fn run(&mut self, once: bool) {
        let mut cycle: u64 = 0;
        while !self.cancel.is_cancelled() {
            cycle += 1;
            info!("Starting cycle {}", cycle);

            let result = self.run_cycle().await;
            if result.interrupted {
                break;
            }
            self.deliver(&result.report).await;

            if once {
                info!("Single cycle finished");
                return;
            }

            let delay = next_cycle_delay(
                result.next_wake,
                now_millis(),
                &self.schedule,
                &mut self.jitter,
            );
            info!("Next cycle in {} seconds", delay.as_secs());
            if self
                .waiter
                .countdown(delay.as_secs().max(1), "start next cycle")
                .await
                .is_cancelled()
            {
                break;
            }
        }
        info!("Shutdown requested, scheduler stopped after {} cycle(s)", cycle);
    }

    /// One pass over every account in the accounts file.
    pub async fn run_cycle(&mut self) -> CycleResult {
        self.report.reset();

        let accounts = match load_accounts(&self.accounts_path).await {
            Ok(accounts) => accounts,
            Err(e) => {
                error!("{:#}", e);
                return self.result(None, false);
            }
        };
        if accounts.is_empty() {
            warn!("No accounts found in {}", self.accounts_path.display());
        }

        let mut next_wake = None;
        let total = accounts.len();
        for (pos, account) in accounts.iter().enumerate() {
            let proxy = self.proxies.for_index(account.index);
            if let Some(proxy) = proxy {
                info!("Using proxy {}", proxy);
            }

            let outcome = match self.factory.client_for(proxy) {
                Ok(api) => {
                    let mut runner = AccountRunner::new(
                        api.as_ref(),
                        self.waiter.as_ref(),
                        &mut self.jitter,
                        &self.schedule,
                    );
                    let outcome = runner.run(account).await;
                    if !runner.stage().is_terminal() {
                        warn!(
                            "Account {} left unfinished at stage {}",
                            account.position(),
                            runner.stage().as_str()
                        );
                    }
                    outcome
                }
                Err(e) => {
                    error!(
                        "Could not build client for account {}: {:#}",
                        account.position(),
                        e
                    );
                    AccountOutcome::new(account)
                }
            };

            self.report.record(&outcome);
            next_wake = merge_wake(self.schedule.wake_policy, next_wake, pos, &outcome);
            if outcome.status == AccountStatus::Interrupted {
                return self.result(next_wake, true);
            }
            if let AccountStatus::Aborted(stage) = outcome.status
                && stage != RunStage::Start
            {
                warn!("Account {} stopped while {}", account.position(), stage.as_str());
            }

            if pos + 1 < total {
                let secs = self.jitter.countdown_secs(
                    self.schedule.account_delay_secs,
                    self.schedule.countdown_jitter_secs,
                );
                if self
                    .waiter
                    .countdown(secs, "process next user")
                    .await
                    .is_cancelled()
                {
                    return self.result(next_wake, true);
                }
            }
        }

        self.result(next_wake, false)
    }

    fn result(&self, next_wake: Option<i64>, interrupted: bool) -> CycleResult {
        CycleResult {
            report: self.report.clone(),
            next_wake,
            interrupted,
        }
    }

    async fn deliver(&self, report: &CycleReport) {
        let summary = report.summary();
        if let Err(e) = self.sink.deliver(&summary).await {
            warn!("Failed to deliver cycle report via {}: {:#}", self.sink.name(), e);
        }
    }
}

fn merge_wake(
    policy: WakePolicy,
    current: Option<i64>,
    position: usize,
    outcome: &AccountOutcome,
) -> Option<i64> {
    match policy {
        WakePolicy::FirstAccount if position == 0 => outcome.next_wake,
        WakePolicy::FirstAccount => current,
        WakePolicy::Earliest => match (current, outcome.next_wake) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        },
    }
}

/// Time to sleep before the next cycle.
///
/// A future wake time `T` gives `(T - now)` plus a signed jitter of up to
/// `wake_jitter_ms`, never less than one second. Otherwise the idle range is used.
pub fn next_cycle_delay(
    next_wake: Option<i64>,
    now_ms: i64,
    schedule: &ScheduleConfig,
    jitter: &mut Jitter,
) -> Duration {
    match next_wake {
        Some(wake) if wake > now_ms => {
            let ms = (wake - now_ms) + jitter.signed_offset(schedule.wake_jitter_ms);
            Duration::from_millis(ms.max(MIN_WAKE_DELAY_MS) as u64)
        }
        _ => Duration::from_secs(jitter.pick(schedule.idle_delay_secs)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::api::fake::{FakeAccount, FakeApi, idle_account};
    use crate::core::api::{Operation, Profile};
    use crate::core::proxy::ProxyEndpoint;
    use crate::core::timing::testing::InstantWaiter;
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const ALICE: &str = "user=%7B%22first_name%22%3A%22Alice%22%7D";
    const BOB: &str = "user=%7B%22first_name%22%3A%22Bob%22%7D";
    const CAROL: &str = "user=%7B%22first_name%22%3A%22Carol%22%7D";

    #[derive(Default)]
    struct RecordingSink {
        delivered: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl ReportSink for RecordingSink {
        fn name(&self) -> &str {
            "recording"
        }

        async fn deliver(&self, summary: &str) -> Result<()> {
            self.delivered.lock().unwrap().push(summary.to_string());
            if self.fail {
                return Err(anyhow!("sink offline"));
            }
            Ok(())
        }
    }

    struct Harness {
        _dir: TempDir,
        scheduler: CycleScheduler,
        sink: Arc<RecordingSink>,
        waiter: Arc<InstantWaiter>,
    }

    fn harness(
        payloads: &[&str],
        api: &FakeApi,
        proxies: ProxyPool,
        schedule: ScheduleConfig,
        waiter: InstantWaiter,
    ) -> Harness {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.txt");
        std::fs::write(&path, payloads.join("\n")).unwrap();
        let sink = Arc::new(RecordingSink::default());
        let waiter = Arc::new(waiter);
        let scheduler = CycleScheduler::new(
            path,
            proxies,
            Arc::new(api.clone()),
            sink.clone(),
            waiter.clone(),
            schedule,
            CancellationToken::new(),
        )
        .with_jitter(Jitter::seeded(17));
        Harness {
            _dir: dir,
            scheduler,
            sink,
            waiter,
        }
    }

    #[test]
    fn wake_delay_stays_within_jitter_window() {
        let schedule = ScheduleConfig::default();
        let mut jitter = Jitter::seeded(99);
        let now = 1_700_000_000_000;
        for ahead in [600_000i64, 3_600_000, 200_000] {
            for _ in 0..300 {
                let delay = next_cycle_delay(Some(now + ahead), now, &schedule, &mut jitter);
                let ms = delay.as_millis() as i64;
                assert!(ms >= (ahead - 150_000).max(1_000), "{} for {}", ms, ahead);
                assert!(ms <= ahead + 150_000, "{} for {}", ms, ahead);
            }
        }
    }

    #[test]
    fn near_wake_is_floored_at_one_second() {
        let schedule = ScheduleConfig::default();
        let mut jitter = Jitter::seeded(5);
        let now = 1_000_000;
        for _ in 0..300 {
            let delay = next_cycle_delay(Some(now + 10), now, &schedule, &mut jitter);
            assert!(delay >= Duration::from_secs(1));
        }
    }

    #[test]
    fn missing_or_past_wake_uses_idle_range() {
        let schedule = ScheduleConfig::default();
        let mut jitter = Jitter::seeded(3);
        let now = 1_000_000;
        for wake in [None, Some(now), Some(now - 5_000)] {
            for _ in 0..100 {
                let delay = next_cycle_delay(wake, now, &schedule, &mut jitter);
                assert!(delay >= Duration::from_secs(30) && delay < Duration::from_secs(61));
            }
        }
    }

    #[tokio::test]
    async fn failed_login_does_not_stop_the_cycle() {
        let wake = now_millis() + 600_000;
        let api = FakeApi::new()
            .with_account(ALICE, idle_account(wake))
            .with_account(
                BOB,
                FakeAccount {
                    auth_fails: true,
                    ..FakeAccount::default()
                },
            );
        let mut h = harness(
            &[ALICE, BOB],
            &api,
            ProxyPool::default(),
            ScheduleConfig::default(),
            InstantWaiter::new(),
        );

        let result = h.scheduler.run_cycle().await;

        assert!(!result.interrupted);
        assert_eq!(result.report.completed_accounts, 1);
        assert_eq!(result.report.total_balance, 12.5);
        assert_eq!(result.next_wake, Some(wake));
        assert_eq!(api.operations_for(BOB), vec![Operation::Auth]);
        assert_eq!(
            h.waiter.labels(),
            vec!["start farming".to_string(), "process next user".to_string()]
        );
    }

    #[tokio::test]
    async fn single_cycle_delivers_the_report() {
        let api = FakeApi::new()
            .with_account(ALICE, idle_account(now_millis() + 600_000))
            .with_account(
                BOB,
                FakeAccount {
                    auth_fails: true,
                    ..FakeAccount::default()
                },
            );
        let mut h = harness(
            &[ALICE, "", BOB],
            &api,
            ProxyPool::default(),
            ScheduleConfig::default(),
            InstantWaiter::new(),
        );

        h.scheduler.run(true).await;

        assert_eq!(
            *h.sink.delivered.lock().unwrap(),
            vec!["Cycle Report:\nCompleted Accounts: 1\nTotal Balance: 12.50".to_string()]
        );
        assert!(!h.waiter.labels().contains(&"start next cycle".to_string()));
    }

    #[tokio::test]
    async fn first_account_policy_ignores_later_wake_times() {
        let now = now_millis();
        let api = FakeApi::new()
            .with_account(
                ALICE,
                FakeAccount {
                    auth_fails: true,
                    ..FakeAccount::default()
                },
            )
            .with_account(BOB, idle_account(now + 300_000));
        let mut h = harness(
            &[ALICE, BOB],
            &api,
            ProxyPool::default(),
            ScheduleConfig::default(),
            InstantWaiter::new(),
        );

        assert_eq!(h.scheduler.run_cycle().await.next_wake, None);
    }

    #[tokio::test]
    async fn earliest_policy_picks_the_soonest_diamond() {
        let now = now_millis();
        let api = FakeApi::new()
            .with_account(ALICE, idle_account(now + 600_000))
            .with_account(BOB, idle_account(now + 300_000))
            .with_account(CAROL, idle_account(now + 900_000));
        let schedule = ScheduleConfig {
            wake_policy: WakePolicy::Earliest,
            ..ScheduleConfig::default()
        };
        let mut h = harness(
            &[ALICE, BOB, CAROL],
            &api,
            ProxyPool::default(),
            schedule,
            InstantWaiter::new(),
        );

        let result = h.scheduler.run_cycle().await;
        assert_eq!(result.next_wake, Some(now + 300_000));
        assert_eq!(result.report.completed_accounts, 3);
        assert_eq!(
            h.waiter
                .labels()
                .iter()
                .filter(|l| *l == "process next user")
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn proxies_rotate_by_account_index() {
        let api = FakeApi::new()
            .with_account(ALICE, idle_account(0))
            .with_account(BOB, idle_account(0))
            .with_account(CAROL, idle_account(0));
        let proxies = ProxyPool::new(vec![
            "u:p:10.0.0.1:8080".parse::<ProxyEndpoint>().unwrap(),
            "u:p:10.0.0.2:8080".parse::<ProxyEndpoint>().unwrap(),
        ]);
        let mut h = harness(
            &[ALICE, BOB, CAROL],
            &api,
            proxies,
            ScheduleConfig::default(),
            InstantWaiter::new(),
        );

        h.scheduler.run_cycle().await;

        assert_eq!(
            api.proxies_seen(),
            vec![
                Some("10.0.0.1".to_string()),
                Some("10.0.0.2".to_string()),
                Some("10.0.0.1".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn unreadable_accounts_file_yields_an_empty_cycle() {
        let api = FakeApi::new();
        let mut h = harness(
            &[],
            &api,
            ProxyPool::default(),
            ScheduleConfig::default(),
            InstantWaiter::new(),
        );
        h.scheduler.accounts_path = h._dir.path().join("missing.txt");

        let result = h.scheduler.run_cycle().await;
        assert_eq!(result, CycleResult::default());
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn report_is_reset_between_cycles() {
        let api = FakeApi::new().with_account(ALICE, idle_account(0));
        let mut h = harness(
            &[ALICE],
            &api,
            ProxyPool::default(),
            ScheduleConfig::default(),
            InstantWaiter::new(),
        );

        h.scheduler.run_cycle().await;
        let second = h.scheduler.run_cycle().await;
        assert_eq!(second.report.completed_accounts, 1);
        assert_eq!(second.report.total_balance, 12.5);
    }

    #[tokio::test]
    async fn cancelled_wait_ends_the_loop() {
        let api = FakeApi::new().with_account(ALICE, idle_account(0));
        // "start farming" elapses, "start next cycle" is cancelled.
        let mut h = harness(
            &[ALICE],
            &api,
            ProxyPool::default(),
            ScheduleConfig::default(),
            InstantWaiter::cancelling_after(1),
        );

        h.scheduler.run(false).await;

        assert_eq!(h.sink.delivered.lock().unwrap().len(), 1);
        assert_eq!(api.operations_for(ALICE).first(), Some(&Operation::Auth));
        assert_eq!(
            api.operations()
                .iter()
                .filter(|op| **op == Operation::Auth)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn cancelled_before_start_runs_nothing() {
        let api = FakeApi::new().with_account(ALICE, idle_account(0));
        let mut h = harness(
            &[ALICE],
            &api,
            ProxyPool::default(),
            ScheduleConfig::default(),
            InstantWaiter::new(),
        );
        h.scheduler.cancel.cancel();

        h.scheduler.run(false).await;

        assert!(api.calls().is_empty());
        assert!(h.sink.delivered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn sink_failure_is_not_fatal() {
        let api = FakeApi::new().with_account(ALICE, idle_account(0));
        let mut h = harness(
            &[ALICE],
            &api,
            ProxyPool::default(),
            ScheduleConfig::default(),
            InstantWaiter::new(),
        );
        let sink = Arc::new(RecordingSink {
            fail: true,
            ..RecordingSink::default()
        });
        h.scheduler.sink = sink.clone() as Arc<dyn ReportSink>;

        h.scheduler.run(true).await;
        assert_eq!(sink.delivered.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn single_failed_login_reports_nothing() {
        let api = FakeApi::new().with_account(
            ALICE,
            FakeAccount {
                auth_fails: true,
                ..FakeAccount::default()
            },
        );
        let mut h = harness(
            &[ALICE],
            &api,
            ProxyPool::default(),
            ScheduleConfig::default(),
            InstantWaiter::new(),
        );

        let result = h.scheduler.run_cycle().await;
        assert_eq!(result.report, CycleReport::default());
        assert_eq!(result.next_wake, None);
        assert_eq!(api.operations(), vec![Operation::Auth]);

        h.scheduler.run(true).await;
        assert_eq!(
            *h.sink.delivered.lock().unwrap(),
            vec!["Cycle Report:\nCompleted Accounts: 0\nTotal Balance: 0.00".to_string()]
        );
    }

    #[tokio::test]
    async fn missing_profile_balance_is_counted_as_anomalous() {
        let api = FakeApi::new()
            .with_account(ALICE, idle_account(0))
            .with_account(
                BOB,
                FakeAccount {
                    profile: Some(Profile { balance: None }),
                    ..idle_account(0)
                },
            );
        let mut h = harness(
            &[ALICE, BOB],
            &api,
            ProxyPool::default(),
            ScheduleConfig::default(),
            InstantWaiter::new(),
        );

        let report = h.scheduler.run_cycle().await.report;
        assert_eq!(report.completed_accounts, 2);
        assert_eq!(report.total_balance, 12.5);
        assert_eq!(report.anomalous_balances, 1);
    }
}
