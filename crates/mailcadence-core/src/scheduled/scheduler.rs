//! Dispatch Scheduler - Runs the engine on a fixed period

use super::engine::DispatchEngine;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

/// Default period between dispatch cycles
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(10);

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Scheduler is already running")]
    AlreadyRunning,

    #[error("Scheduler is not running")]
    NotRunning,
}

struct Running {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

/// Periodic dispatch scheduler.
///
/// At most one cycle runs at a time. A cycle that outlasts the period delays
/// the next tick instead of overlapping it.
pub struct Scheduler {
    engine: Arc<DispatchEngine>,
    period: Duration,
    running: Mutex<Option<Running>>,
}

impl Scheduler {
    pub fn new(engine: Arc<DispatchEngine>) -> Self {
        Self {
            engine,
            period: DEFAULT_PERIOD,
            running: Mutex::new(None),
        }
    }

    /// Set the tick period
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Start ticking; the first cycle runs immediately
    pub async fn start(&self) -> Result<(), SchedulerError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(SchedulerError::AlreadyRunning);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(run_loop(self.engine.clone(), self.period, shutdown_rx));

        info!("Dispatch scheduler started (interval: {:?})", self.period);
        *running = Some(Running { shutdown_tx, join });
        Ok(())
    }

    /// Stop ticking. Waits for an in-flight cycle to finish.
    pub async fn stop(&self) -> Result<(), SchedulerError> {
        let Some(Running { shutdown_tx, join }) = self.running.lock().await.take() else {
            return Err(SchedulerError::NotRunning);
        };

        let _ = shutdown_tx.send(true);
        if let Err(e) = join.await {
            error!("Dispatch scheduler task ended abnormally: {}", e);
        }

        info!("Dispatch scheduler stopped");
        Ok(())
    }
}

async fn run_loop(
    engine: Arc<DispatchEngine>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => {
                debug!("Dispatch scheduler received shutdown signal");
                break;
            }
            _ = ticker.tick() => {
                run_guarded(engine.clone()).await;
            }
        }
    }
}

/// One cycle in its own task so a panic is contained and logged
async fn run_guarded(engine: Arc<DispatchEngine>) {
    let cycle = tokio::spawn(async move { engine.run_cycle().await });

    match cycle.await {
        Ok(Ok(report)) => debug!(?report, "Dispatch cycle complete"),
        Ok(Err(e)) => error!("Dispatch cycle failed: {}", e),
        Err(e) => error!("Dispatch cycle panicked: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduled::clock::Clock;
    use crate::scheduled::test_support::{client, mailing, CountingClock, ScriptedTransport};
    use chrono::{TimeZone, Utc};
    use mailcadence_storage::models::MailingStatus;
    use mailcadence_storage::repository::MailingStore;
    use mailcadence_storage::InMemoryMailingStore;
    use pretty_assertions::assert_eq;

    fn scheduler_with(
        store: Arc<InMemoryMailingStore>,
        transport: Arc<ScriptedTransport>,
        clock: Arc<CountingClock>,
    ) -> Scheduler {
        let engine = DispatchEngine::new(store, transport, clock, "news@example.com")
            .with_send_timeout(Duration::from_secs(60));
        Scheduler::new(Arc::new(engine))
    }

    fn epoch() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_every_period() {
        let clock = Arc::new(CountingClock::new(epoch()));
        let scheduler = scheduler_with(
            Arc::new(InMemoryMailingStore::new()),
            Arc::new(ScriptedTransport::failing(&[])),
            clock.clone(),
        );

        scheduler.start().await.unwrap();
        // Ticks at 0s, 10s and 20s
        tokio::time::sleep(Duration::from_secs(25)).await;
        scheduler.stop().await.unwrap();

        assert_eq!(clock.reads(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_cycles_keep_ticking() {
        let store = Arc::new(InMemoryMailingStore::new());
        store.fail_due_queries().await;
        let clock = Arc::new(CountingClock::new(epoch()));
        let scheduler = scheduler_with(
            store,
            Arc::new(ScriptedTransport::failing(&[])),
            clock.clone(),
        );

        scheduler.start().await.unwrap();
        tokio::time::sleep(Duration::from_secs(25)).await;
        assert!(scheduler.is_running().await);
        scheduler.stop().await.unwrap();

        assert_eq!(clock.reads(), 3);
    }

    /// Panics on its first read, then behaves
    struct PanicFirstClock {
        inner: CountingClock,
    }

    impl Clock for PanicFirstClock {
        fn now(&self) -> chrono::DateTime<chrono_tz::Tz> {
            let now = self.inner.now();
            if self.inner.reads() == 1 {
                panic!("clock unavailable");
            }
            now
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_cycle_keeps_ticking() {
        let store = Arc::new(InMemoryMailingStore::new());
        let a = client(&store, "a@x.com").await;
        mailing(&store, epoch(), None, vec![a.id]).await;

        let clock = Arc::new(PanicFirstClock {
            inner: CountingClock::new(epoch()),
        });
        let engine = DispatchEngine::new(
            store.clone(),
            Arc::new(ScriptedTransport::failing(&[])),
            clock.clone(),
            "news@example.com",
        );
        let scheduler = Scheduler::new(Arc::new(engine));

        scheduler.start().await.unwrap();
        tokio::time::sleep(Duration::from_secs(15)).await;
        scheduler.stop().await.unwrap();

        // The first tick panicked, the second delivered
        assert_eq!(clock.inner.reads(), 2);
        assert_eq!(store.attempts().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_cycle_does_not_overlap() {
        let store = Arc::new(InMemoryMailingStore::new());
        let transport =
            Arc::new(ScriptedTransport::failing(&[]).with_delay(Duration::from_secs(15)));
        let clock = Arc::new(CountingClock::new(epoch()));
        let a = client(&store, "a@x.com").await;
        let m = mailing(&store, epoch(), None, vec![a.id]).await;

        let scheduler = scheduler_with(store.clone(), transport.clone(), clock.clone());
        scheduler.start().await.unwrap();

        // The 10s tick falls inside the first cycle and must wait for it
        tokio::time::sleep(Duration::from_secs(12)).await;
        assert_eq!(clock.reads(), 1);
        assert_eq!(transport.max_in_flight(), 1);

        tokio::time::sleep(Duration::from_secs(20)).await;
        scheduler.stop().await.unwrap();

        assert_eq!(transport.sent().len(), 1);
        assert_eq!(transport.max_in_flight(), 1);
        assert_eq!(store.attempts().await.len(), 1);
        let stored = store.get_mailing(m.id).await.unwrap().unwrap();
        assert_eq!(stored.status_enum(), Some(MailingStatus::Sent));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_waits_for_in_flight_cycle() {
        let store = Arc::new(InMemoryMailingStore::new());
        let transport =
            Arc::new(ScriptedTransport::failing(&[]).with_delay(Duration::from_secs(5)));
        let clock = Arc::new(CountingClock::new(epoch()));
        let a = client(&store, "a@x.com").await;
        mailing(&store, epoch(), None, vec![a.id]).await;

        let scheduler = scheduler_with(store.clone(), transport, clock);
        scheduler.start().await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        scheduler.stop().await.unwrap();
        assert_eq!(store.attempts().await.len(), 1);
        assert!(!scheduler.is_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_and_stop_are_guarded() {
        let scheduler = scheduler_with(
            Arc::new(InMemoryMailingStore::new()),
            Arc::new(ScriptedTransport::failing(&[])),
            Arc::new(CountingClock::new(epoch())),
        );

        assert_eq!(scheduler.stop().await, Err(SchedulerError::NotRunning));
        scheduler.start().await.unwrap();
        assert_eq!(scheduler.start().await, Err(SchedulerError::AlreadyRunning));
        assert!(scheduler.is_running().await);
        scheduler.stop().await.unwrap();

        // Restartable after stop
        scheduler.start().await.unwrap();
        scheduler.stop().await.unwrap();
    }
}
