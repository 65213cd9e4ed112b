//! The global scheduler: selects subsystems each tick according to a
//! strategy and drains their queues (spec.md §4.8, component L11).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::domain_types::{SubsystemName, TimeSliceMs};
use crate::kernel::Kernel;
use crate::registry::Registry;
use crate::subsystem::SubsystemState;
use crate::time_provider::TimeProvider;

/// Utilisation above which the `adaptive` strategy switches to
/// `load-based` scheduling, once sustained (spec.md §4.8 leaves the exact
/// threshold open; see `DESIGN.md`'s recorded decision).
pub const ADAPTIVE_LOAD_THRESHOLD: f64 = 0.75;

/// Number of consecutive ticks a queue must stay above
/// [`ADAPTIVE_LOAD_THRESHOLD`] before `adaptive` switches strategies.
pub const ADAPTIVE_LOAD_TICKS: u32 = 3;

/// Which subsystem-selection strategy a tick applies (spec.md §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingStrategy {
    /// Advances a cursor over the scheduled list each tick.
    RoundRobin,
    /// Visits subsystems in descending priority order every tick.
    Priority,
    /// Allocates ticks proportionally to `queue.len()`.
    LoadBased,
    /// Starts round-robin; switches to load-based once any queue's
    /// utilisation exceeds [`ADAPTIVE_LOAD_THRESHOLD`] for
    /// [`ADAPTIVE_LOAD_TICKS`] consecutive ticks.
    Adaptive,
}

struct ScheduledEntry {
    name: SubsystemName,
    priority: i32,
    high_load_streak: u32,
}

/// Tracks the scheduled subsystem list, the active strategy, and (once
/// started) the background tick loop's handle.
pub struct GlobalScheduler {
    registry: Arc<Mutex<Registry>>,
    kernel: Arc<Mutex<Kernel>>,
    entries: Mutex<Vec<ScheduledEntry>>,
    strategy: Mutex<SchedulingStrategy>,
    time_slice: TimeSliceMs,
    tick_interval: Duration,
    time_provider: Arc<dyn TimeProvider>,
    stop_flag: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl GlobalScheduler {
    /// Creates a scheduler over `registry`/`kernel`, initially with no
    /// scheduled subsystems.
    #[must_use]
    pub fn new(
        registry: Arc<Mutex<Registry>>,
        kernel: Arc<Mutex<Kernel>>,
        strategy: SchedulingStrategy,
        time_slice: TimeSliceMs,
        tick_interval: Duration,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            registry,
            kernel,
            entries: Mutex::new(Vec::new()),
            strategy: Mutex::new(strategy),
            time_slice,
            tick_interval,
            time_provider,
            stop_flag: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    /// Adds `name` to the scheduled list with the given priority (higher
    /// runs first under the `priority` strategy).
    pub async fn schedule(&self, name: SubsystemName, priority: i32) {
        let mut entries = self.entries.lock().await;
        entries.push(ScheduledEntry {
            name,
            priority,
            high_load_streak: 0,
        });
    }

    /// Removes `name` from the scheduled list.
    pub async fn unschedule(&self, name: &SubsystemName) {
        let mut entries = self.entries.lock().await;
        entries.retain(|e| &e.name != name);
    }

    /// Runs one tick: selects subsystems per the active strategy and calls
    /// `process` on each that is `Running`. Paused subsystems are skipped
    /// (spec.md §4.6: "Paused subsystems still accept enqueues but are
    /// skipped by the scheduler").
    #[instrument(skip(self))]
    pub async fn tick(&self) {
        let strategy = *self.strategy.lock().await;
        let order = self.selection_order(strategy).await;

        let mut registry = self.registry.lock().await;
        let mut kernel = self.kernel.lock().await;

        for name in order {
            let Some(subsystem) = registry.get_mut(&name) else {
                continue;
            };
            if subsystem.state() == SubsystemState::Paused {
                continue;
            }
            let report = subsystem.process(self.time_slice, self.time_provider.as_ref());
            if report.processed > 0 {
                debug!(subsystem = %name, processed = report.processed, "tick processed messages");
            }
            for error in report.errors {
                kernel.error_manager_mut().record(error);
            }
        }

        if strategy == SchedulingStrategy::Adaptive {
            self.update_adaptive_streaks(&registry).await;
        }
    }

    async fn selection_order(&self, strategy: SchedulingStrategy) -> Vec<SubsystemName> {
        let entries = self.entries.lock().await;
        if entries.is_empty() {
            return Vec::new();
        }

        let effective = match strategy {
            SchedulingStrategy::Adaptive => {
                let load_based_active = entries.iter().any(|e| e.high_load_streak >= ADAPTIVE_LOAD_TICKS);
                if load_based_active {
                    SchedulingStrategy::LoadBased
                } else {
                    SchedulingStrategy::RoundRobin
                }
            }
            other => other,
        };

        match effective {
            SchedulingStrategy::RoundRobin => entries.iter().map(|e| e.name.clone()).collect(),
            SchedulingStrategy::Priority => {
                let mut sorted: Vec<&ScheduledEntry> = entries.iter().collect();
                sorted.sort_by(|a, b| b.priority.cmp(&a.priority));
                sorted.into_iter().map(|e| e.name.clone()).collect()
            }
            SchedulingStrategy::LoadBased => {
                let mut names: Vec<SubsystemName> = entries.iter().map(|e| e.name.clone()).collect();
                drop(entries);
                let registry = self.registry.lock().await;
                names.sort_by_key(|name| {
                    std::cmp::Reverse(registry.get(name).map_or(0, |s| s.queue_len()))
                });
                names
            }
            SchedulingStrategy::Adaptive => unreachable!("resolved to a concrete strategy above"),
        }
    }

    async fn update_adaptive_streaks(&self, registry: &Registry) {
        let mut entries = self.entries.lock().await;
        for entry in entries.iter_mut() {
            let utilisation = registry.get(&entry.name).map_or(0.0, |s| {
                if s.queue_capacity() == 0 {
                    0.0
                } else {
                    s.queue_len() as f64 / s.queue_capacity() as f64
                }
            });
            if utilisation > ADAPTIVE_LOAD_THRESHOLD {
                entry.high_load_streak += 1;
            } else {
                entry.high_load_streak = 0;
            }
        }
    }

    /// Launches the background tick loop (spec.md §4.8 `startScheduler`).
    /// No-op if already running.
    pub async fn start(self: &Arc<Self>) {
        let mut handle = self.handle.lock().await;
        if handle.is_some() {
            return;
        }
        self.stop_flag.store(false, Ordering::SeqCst);

        let scheduler = Arc::clone(self);
        let stop_flag = Arc::clone(&self.stop_flag);
        let interval = self.tick_interval;
        let time_provider = Arc::clone(&self.time_provider);

        *handle = Some(tokio::spawn(async move {
            while !stop_flag.load(Ordering::SeqCst) {
                scheduler.tick().await;
                time_provider.sleep(interval).await;
            }
        }));
    }

    /// Halts the tick loop and awaits the in-flight slice
    /// (spec.md §4.8 `stopScheduler`).
    pub async fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        let mut handle = self.handle.lock().await;
        if let Some(join) = handle.take() {
            if let Err(err) = join.await {
                warn!(error = %err, "scheduler task did not shut down cleanly");
            }
        }
    }

    /// Whether the background loop is currently running.
    pub async fn is_running(&self) -> bool {
        self.handle.lock().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_types::{ErrorHistorySize, QueueCapacity};
    use crate::queue::OverflowPolicy;
    use crate::subsystem::{Disposition, Subsystem};
    use crate::time_provider::MockTimeProvider;
    use serde_json::json;
    use std::sync::Arc as StdArc;

    fn name(s: &str) -> SubsystemName {
        SubsystemName::try_new(s).unwrap()
    }

    fn built_subsystem(n: &str, capacity: usize) -> Subsystem {
        let mut sub = Subsystem::new(
            name(n),
            Disposition::Canonical,
            QueueCapacity::try_new(capacity).unwrap(),
            OverflowPolicy::DropNewest,
        );
        let facets = crate::facet::FacetManager::build(
            vec![],
            &crate::facet::HookContext {
                ms: 0,
                config: json!(null),
                debug: false,
            },
            sub.name(),
            &crate::facet::ContractRegistry::new(),
        )
        .unwrap();
        sub.attach_facets(facets).unwrap();
        sub
    }

    fn scheduler(strategy: SchedulingStrategy) -> GlobalScheduler {
        GlobalScheduler::new(
            Arc::new(Mutex::new(Registry::new())),
            Arc::new(Mutex::new(Kernel::bootstrap(ErrorHistorySize::try_new(100).unwrap(), 0))),
            strategy,
            TimeSliceMs::try_new(50).unwrap(),
            Duration::from_millis(5),
            StdArc::new(MockTimeProvider::new()),
        )
    }

    #[tokio::test]
    async fn tick_processes_every_scheduled_running_subsystem() {
        let sched = scheduler(SchedulingStrategy::RoundRobin);
        let mut sub = built_subsystem("a", 10);
        sub.router_mut()
            .register_route(
                "a://op/{n}",
                StdArc::new(|_msg, _params| Ok(json!(null))),
                std::collections::HashMap::new(),
                false,
            )
            .unwrap();
        let factory = crate::message::MessageFactory::new();
        sub.accept(
            factory.create("a://op/1", json!(null)).unwrap(),
            crate::subsystem::AcceptOptions::default(),
        )
        .unwrap();

        sched.registry.lock().await.insert(sub);
        sched.schedule(name("a"), 0).await;

        sched.tick().await;

        let registry = sched.registry.lock().await;
        assert_eq!(registry.get(&name("a")).unwrap().queue_len(), 0);
    }

    #[tokio::test]
    async fn paused_subsystem_is_skipped() {
        let sched = scheduler(SchedulingStrategy::RoundRobin);
        let mut sub = built_subsystem("a", 10);
        sub.router_mut()
            .register_route(
                "a://op",
                StdArc::new(|_msg, _params| Ok(json!(null))),
                std::collections::HashMap::new(),
                false,
            )
            .unwrap();
        let factory = crate::message::MessageFactory::new();
        sub.accept(
            factory.create("a://op", json!(null)).unwrap(),
            crate::subsystem::AcceptOptions::default(),
        )
        .unwrap();
        sub.pause().unwrap();

        sched.registry.lock().await.insert(sub);
        sched.schedule(name("a"), 0).await;
        sched.tick().await;

        let registry = sched.registry.lock().await;
        assert_eq!(registry.get(&name("a")).unwrap().queue_len(), 1);
    }

    #[tokio::test]
    async fn priority_strategy_orders_by_descending_priority() {
        let sched = scheduler(SchedulingStrategy::Priority);
        sched.schedule(name("low"), 1).await;
        sched.schedule(name("high"), 10).await;
        let order = sched.selection_order(SchedulingStrategy::Priority).await;
        assert_eq!(order, vec![name("high"), name("low")]);
    }

    #[tokio::test]
    async fn adaptive_switches_to_load_based_after_sustained_high_utilisation() {
        let sched = scheduler(SchedulingStrategy::Adaptive);
        let sub = built_subsystem("busy", 2);
        sched.registry.lock().await.insert(sub);
        sched.schedule(name("busy"), 0).await;

        let factory = crate::message::MessageFactory::new();
        {
            let mut registry = sched.registry.lock().await;
            let sub = registry.get_mut(&name("busy")).unwrap();
            sub.router_mut()
                .register_route(
                    "busy://op",
                    StdArc::new(|_msg, _params| Ok(json!(null))),
                    std::collections::HashMap::new(),
                    false,
                )
                .unwrap();
        }

        for _ in 0..ADAPTIVE_LOAD_TICKS {
            {
                let mut registry = sched.registry.lock().await;
                let sub = registry.get_mut(&name("busy")).unwrap();
                let _ = sub.accept(
                    factory.create("busy://op", json!(null)).unwrap(),
                    crate::subsystem::AcceptOptions::default(),
                );
                let _ = sub.accept(
                    factory.create("busy://op", json!(null)).unwrap(),
                    crate::subsystem::AcceptOptions::default(),
                );
            }
            let registry = sched.registry.lock().await;
            sched.update_adaptive_streaks(&registry).await;
        }

        let entries = sched.entries.lock().await;
        assert!(entries[0].high_load_streak >= ADAPTIVE_LOAD_TICKS);
    }

    #[tokio::test]
    async fn start_then_stop_is_idempotent_and_clean() {
        let sched = Arc::new(scheduler(SchedulingStrategy::RoundRobin));
        sched.start().await;
        assert!(sched.is_running().await);
        sched.stop().await;
        assert!(!sched.is_running().await);
    }
}
