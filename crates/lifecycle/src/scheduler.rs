//! Recurring archival sweeps on a cooperative polling loop.
//!
//! The scheduler sleeps between coarse ticks and compares wall-clock time
//! against the next configured fire time, instead of relying on OS cron.
//! The process must stay running for schedules to fire; that trade-off buys
//! portability. Weekly and monthly cadences share the daily gate: each tick
//! asks "does today match" before delegating to the one cleanup path.

use crate::service::LifecycleService;
use registrar_core::Error;
use registrar_core::config::{ArchivalConfig, CadenceKind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use time::{Date, OffsetDateTime, Time, Weekday};
use tokio::task::JoinHandle;

/// Resolved sweep cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Daily,
    Weekly(Weekday),
    Monthly,
}

impl Cadence {
    /// Resolve the cadence from configuration.
    pub fn from_config(config: &ArchivalConfig) -> registrar_core::Result<Self> {
        match config.cadence {
            CadenceKind::Daily => Ok(Self::Daily),
            CadenceKind::Monthly => Ok(Self::Monthly),
            CadenceKind::Weekly => match config.parse_weekday()? {
                Some(weekday) => Ok(Self::Weekly(weekday)),
                None => Err(Error::InvalidWeekday("<unset>".to_string())),
            },
        }
    }

    /// Whether the cadence fires on the given date.
    pub fn fires_on(&self, date: Date) -> bool {
        match self {
            Self::Daily => true,
            Self::Weekly(weekday) => date.weekday() == *weekday,
            Self::Monthly => date.day() == 1,
        }
    }
}

/// Next fire instant strictly after `now` for the cadence at clock time
/// `at` (UTC).
pub fn next_fire_after(now: OffsetDateTime, cadence: Cadence, at: Time) -> OffsetDateTime {
    let mut date = now.date();
    // Today only qualifies if the clock time is still ahead of us.
    if now.time() >= at {
        if let Some(next) = date.next_day() {
            date = next;
        }
    }
    while !cadence.fires_on(date) {
        match date.next_day() {
            Some(next) => date = next,
            None => break,
        }
    }
    date.with_time(at).assume_utc()
}

/// Drives `LifecycleService::run_cleanup` on a recurring cadence.
///
/// Owns its timer task; constructed and started by the hosting process and
/// torn down with `stop()`. At most one sweep executes at a time: a tick
/// arriving while the previous sweep is still running is skipped and
/// logged. `stop()` prevents future ticks but does not interrupt an
/// in-flight sweep.
pub struct ArchivalScheduler {
    service: Arc<LifecycleService>,
    config: ArchivalConfig,
    cadence: Cadence,
    retention_days: u32,
    shutdown: Arc<AtomicBool>,
    busy: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ArchivalScheduler {
    /// Create a scheduler. Fails if the configured cadence is incomplete.
    pub fn new(
        service: Arc<LifecycleService>,
        config: ArchivalConfig,
        retention_days: u32,
    ) -> registrar_core::Result<Self> {
        let cadence = Cadence::from_config(&config)?;
        Ok(Self {
            service,
            config,
            cadence,
            retention_days,
            shutdown: Arc::new(AtomicBool::new(false)),
            busy: Arc::new(AtomicBool::new(false)),
            handle: None,
        })
    }

    /// Start the scheduling loop. Idempotent while running.
    pub fn start(&mut self) {
        if self.handle.is_some() {
            return;
        }
        // Fresh flag per start, so restarting cannot revive a loop from an
        // earlier start that is still waiting out its final tick.
        let shutdown = Arc::new(AtomicBool::new(false));
        self.shutdown = shutdown.clone();

        let service = self.service.clone();
        let busy = self.busy.clone();
        let cadence = self.cadence;
        let retention_days = self.retention_days;
        let tick = self.config.tick_interval();
        let at = Time::from_hms(self.config.at_hour, self.config.at_minute, 0)
            .unwrap_or(Time::MIDNIGHT);

        let handle = tokio::spawn(async move {
            let mut next_fire = next_fire_after(OffsetDateTime::now_utc(), cadence, at);
            tracing::info!(
                cadence = ?cadence,
                next_fire = %next_fire,
                tick_secs = tick.as_secs(),
                "Archival scheduler started"
            );

            loop {
                tokio::time::sleep(tick).await;
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }

                let now = OffsetDateTime::now_utc();
                if now < next_fire {
                    continue;
                }
                next_fire = next_fire_after(now, cadence, at);

                if !try_begin_sweep(&busy) {
                    tracing::warn!(
                        next_fire = %next_fire,
                        "Previous sweep still running, skipping this tick"
                    );
                    continue;
                }

                // The sweep runs on its own task so the loop keeps ticking
                // and can observe (and skip past) a long-running sweep.
                let service = service.clone();
                let busy = busy.clone();
                tokio::spawn(async move {
                    match service.run_cleanup(retention_days).await {
                        Ok(job) => {
                            tracing::info!(
                                candidates = job.candidate_count,
                                purged = job.purged_count,
                                errors = job.errors.len(),
                                "Scheduled sweep finished"
                            );
                        }
                        Err(e) => {
                            // The loop continues to the next tick.
                            tracing::error!(error = %e, "Scheduled sweep failed");
                        }
                    }
                    busy.store(false, Ordering::SeqCst);
                });
            }

            tracing::info!("Archival scheduler stopped");
        });

        self.handle = Some(handle);
    }

    /// Stop firing future ticks. An in-flight sweep runs to completion.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.handle = None;
    }
}

/// Claim the busy flag. Returns false if a sweep already holds it.
fn try_begin_sweep(busy: &AtomicBool) -> bool {
    !busy.swap(true, Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{datetime, time};

    #[test]
    fn daily_fires_next_occurrence_of_clock_time() {
        let at = time!(03:00);
        let before = datetime!(2026-03-10 02:15 UTC);
        assert_eq!(
            next_fire_after(before, Cadence::Daily, at),
            datetime!(2026-03-10 03:00 UTC)
        );

        let after = datetime!(2026-03-10 10:00 UTC);
        assert_eq!(
            next_fire_after(after, Cadence::Daily, at),
            datetime!(2026-03-11 03:00 UTC)
        );

        // Exactly at the fire time rolls to the next day.
        let exact = datetime!(2026-03-10 03:00 UTC);
        assert_eq!(
            next_fire_after(exact, Cadence::Daily, at),
            datetime!(2026-03-11 03:00 UTC)
        );
    }

    #[test]
    fn weekly_fires_only_on_configured_weekday() {
        let at = time!(03:00);
        // 2026-03-10 is a Tuesday.
        let now = datetime!(2026-03-10 10:00 UTC);
        let fire = next_fire_after(now, Cadence::Weekly(Weekday::Friday), at);
        assert_eq!(fire, datetime!(2026-03-13 03:00 UTC));
        assert_eq!(fire.weekday(), Weekday::Friday);

        // A Friday before the clock time fires the same day.
        let friday_early = datetime!(2026-03-13 01:00 UTC);
        assert_eq!(
            next_fire_after(friday_early, Cadence::Weekly(Weekday::Friday), at),
            datetime!(2026-03-13 03:00 UTC)
        );
    }

    #[test]
    fn monthly_fires_on_first_day_only() {
        let cadence = Cadence::Monthly;
        assert!(cadence.fires_on(datetime!(2026-04-01 00:00 UTC).date()));
        assert!(!cadence.fires_on(datetime!(2026-04-02 00:00 UTC).date()));

        let at = time!(03:00);
        let mid_month = datetime!(2026-03-10 10:00 UTC);
        assert_eq!(
            next_fire_after(mid_month, cadence, at),
            datetime!(2026-04-01 03:00 UTC)
        );

        // The daily tick on day 1 before the clock time still fires.
        let first_early = datetime!(2026-04-01 01:00 UTC);
        assert_eq!(
            next_fire_after(first_early, cadence, at),
            datetime!(2026-04-01 03:00 UTC)
        );
    }

    #[test]
    fn cadence_from_config_requires_weekday_for_weekly() {
        let mut config = ArchivalConfig {
            cadence: CadenceKind::Weekly,
            ..ArchivalConfig::default()
        };
        assert!(Cadence::from_config(&config).is_err());

        config.weekday = Some("friday".to_string());
        assert_eq!(
            Cadence::from_config(&config).unwrap(),
            Cadence::Weekly(Weekday::Friday)
        );
    }

    #[test]
    fn busy_flag_admits_one_sweep() {
        let busy = AtomicBool::new(false);
        assert!(try_begin_sweep(&busy));
        assert!(!try_begin_sweep(&busy));
        busy.store(false, Ordering::SeqCst);
        assert!(try_begin_sweep(&busy));
    }

    #[tokio::test]
    async fn start_and_stop_are_clean() {
        use registrar_core::config::{LoggingConfig, RetentionConfig};

        let temp = tempfile::tempdir().unwrap();
        let store = registrar_metadata::SqliteStore::new(temp.path().join("sched.db"), None)
            .await
            .unwrap();
        let service = Arc::new(LifecycleService::new(
            Arc::new(store),
            RetentionConfig::default(),
            &LoggingConfig::default(),
        ));

        let mut scheduler =
            ArchivalScheduler::new(service, ArchivalConfig::default(), 30).unwrap();
        scheduler.start();
        // A second start while running is a no-op.
        scheduler.start();
        scheduler.stop();

        // A stopped scheduler can be started again.
        scheduler.start();
        scheduler.stop();
    }
}
