use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::time::{interval, Duration as TokioDuration, MissedTickBehavior};

use crate::config;
use crate::db::Database;
use crate::integrations::telegram::TelegramNotifier;
use crate::integrations::ServiceRouter;
use crate::models::Settings;
use crate::modules::{ModuleAdapter, ModuleKind, Outcome};

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Seconds between checks for due modules
    pub tick_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            tick_secs: config::tick_secs(),
        }
    }
}

/// One scheduled module. `next_run == None` means due on the next tick.
struct Slot {
    adapter: ModuleAdapter,
    interval: Duration,
    dry_run: bool,
    next_run: Option<DateTime<Utc>>,
}

impl Slot {
    fn new(adapter: ModuleAdapter, interval_secs: u64, dry_run: bool) -> Self {
        Slot {
            adapter,
            interval: Duration::seconds(interval_secs.max(1) as i64),
            dry_run,
            next_run: None,
        }
    }

    fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_run.is_none_or(|next| next <= now)
    }
}

/// Drives the enabled modules on their own intervals, one at a time
pub struct Scheduler {
    router: ServiceRouter,
    settings: Settings,
    slots: Vec<Slot>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        store: Arc<Database>,
        router: ServiceRouter,
        notifier: Arc<TelegramNotifier>,
        settings: Settings,
        enabled: &[ModuleKind],
        config: SchedulerConfig,
    ) -> Self {
        let slots = ModuleKind::ALL
            .into_iter()
            .filter(|kind| enabled.contains(kind))
            .map(|kind| {
                let adapter = ModuleAdapter::new(kind.build(), store.clone(), notifier.clone());
                Slot::new(adapter, kind.interval_secs(&settings), kind.dry_run(&settings))
            })
            .collect();
        Scheduler {
            router,
            settings,
            slots,
            config,
        }
    }

    /// Names of the scheduled modules, in run order
    pub fn module_names(&self) -> Vec<&'static str> {
        self.slots.iter().map(|s| s.adapter.name()).collect()
    }

    pub fn next_run(&self, module: &str) -> Option<DateTime<Utc>> {
        self.slots
            .iter()
            .find(|s| s.adapter.name() == module)
            .and_then(|s| s.next_run)
    }

    /// Run every module due at `now`, in declared order. The next run is
    /// measured from `now`, not from when the module finished.
    pub async fn tick_at(&mut self, now: DateTime<Utc>) -> Vec<Outcome> {
        let mut outcomes = Vec::new();
        for slot in self.slots.iter_mut() {
            if !slot.is_due(now) {
                continue;
            }
            debug!("[scheduler] Running {} (dry_run={})", slot.adapter.name(), slot.dry_run);
            let outcome = slot
                .adapter
                .run(self.router.transport(), &self.settings, slot.dry_run, self.settings.mode)
                .await;
            if !outcome.success {
                warn!("[scheduler] {} failed, next attempt in {}s", outcome.module, slot.interval.num_seconds());
            }
            slot.next_run = Some(now + slot.interval);
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Fire every enabled module exactly once, then release the transport
    pub async fn run_once(mut self) -> Vec<Outcome> {
        info!("[scheduler] Single pass over {:?}", self.module_names());
        let outcomes = self.tick_at(Utc::now()).await;
        self.router.close().await;
        outcomes
    }

    /// Main loop. Shutdown is only observed between ticks.
    pub async fn start(mut self, mut shutdown_rx: oneshot::Receiver<()>) {
        info!(
            "[scheduler] Scheduler started (modules: {:?}, mode: {}, tick: {}s)",
            self.module_names(),
            self.settings.mode,
            self.config.tick_secs
        );

        let mut tick = interval(TokioDuration::from_secs(self.config.tick_secs.max(1)));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    info!("[scheduler] Received shutdown signal");
                    break;
                }
                _ = tick.tick() => {
                    self.tick_at(Utc::now()).await;
                }
            }
        }

        self.router.close().await;
        info!("[scheduler] Scheduler stopped");
    }
}
