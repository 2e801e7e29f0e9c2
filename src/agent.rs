use crate::clock::Clock;
use crate::commands::{CommandProcessor, IncomingCommands};
use crate::config::{ConfigError, SimulatorConfig};
use crate::context::TickContext;
use crate::emergency::{fire_controlled_notice, EmergencyEngine};
use crate::fault_injection::SensorErrorInjector;
use crate::history::HistoryLog;
use crate::notifications::NotificationManager;
use crate::scheduler::{TimerAction, TimerQueue};
use crate::snapshot::Snapshot;
use crate::state::SystemState;
use crate::store::{Store, StoreError};
use crate::synthesizer::{fill_ambient, local_hour, manage_water_flow};
use crate::test_sequence::{release_cooldown, test_completed_notice, TestSequencer};
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("snapshot did not serialize to an object")]
    SnapshotShape,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct AgentStats {
    pub ticks: u64,
    pub timers_fired: u32,
    pub command_read_failures: u32,
    pub publish_failures: u32,
}

/// Owns all simulator state and runs one tick per call to [`update`].
///
/// A tick drains due deferred tasks, reads the command flags, runs the
/// command processor, then (unless shut down) the synthesizer, emergency
/// engine, test sequencer and sensor error injector, and finally publishes
/// the snapshot plus any changed notification or history collections.
///
/// [`update`]: SimulatorAgent::update
pub struct SimulatorAgent<S: Store, C: Clock> {
    config: SimulatorConfig,
    state: SystemState,
    rng: StdRng,
    notifications: NotificationManager,
    history: HistoryLog,
    timers: TimerQueue,

    commands: CommandProcessor,
    emergency: EmergencyEngine,
    test_sequencer: TestSequencer,
    sensor_errors: SensorErrorInjector,

    store: S,
    clock: C,
    last_snapshot: Option<Snapshot>,
    stats: AgentStats,
}

impl<S: Store, C: Clock> SimulatorAgent<S, C> {
    pub fn new(config: SimulatorConfig, store: S, clock: C) -> Result<Self, AgentError> {
        config.validate()?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let now = clock.now();

        Ok(Self {
            state: SystemState::new(now),
            rng,
            notifications: NotificationManager::new(Duration::seconds(i64::from(config.expiry.notification_ttl_s))),
            history: HistoryLog::new(Duration::seconds(i64::from(config.expiry.history_ttl_s))),
            timers: TimerQueue::new(),
            commands: CommandProcessor::new(),
            emergency: EmergencyEngine::new(config.emergency.clone()),
            test_sequencer: TestSequencer::new(config.test_sequence.clone()),
            sensor_errors: SensorErrorInjector::new(config.sensor_errors.clone()),
            store,
            clock,
            last_snapshot: None,
            stats: AgentStats::default(),
            config,
        })
    }

    /// Run one tick and return the snapshot it published.
    ///
    /// Store failures are logged and counted, never returned: a tick that
    /// cannot reach the store still advances the simulation.
    pub fn update(&mut self) -> Result<Snapshot, AgentError> {
        let now = self.clock.now();
        self.stats.ticks += 1;

        self.run_due_timers(now);

        let incoming = self.read_commands();
        let mut snapshot = Snapshot::baseline(&self.state, now);

        {
            let Self {
                state,
                rng,
                notifications,
                history,
                timers,
                commands,
                emergency,
                test_sequencer,
                sensor_errors,
                last_snapshot,
                ..
            } = self;
            let mut ctx = TickContext {
                now,
                state,
                rng,
                notifications,
                history,
                timers,
            };

            let override_effect = commands.process(&mut ctx, incoming, &mut snapshot, last_snapshot.as_ref());

            if ctx.state.is_shutdown {
                snapshot.force_shutdown();
            } else {
                fill_ambient(&mut snapshot, local_hour(now), ctx.rng);
                manage_water_flow(ctx.state, &mut snapshot, ctx.rng);
                emergency.update(&mut ctx, &mut snapshot);
                test_sequencer.update(&mut ctx, &mut snapshot);
                sensor_errors.update(&mut ctx, &mut snapshot);
            }

            override_effect.apply(&mut snapshot);
        }

        self.accumulate_counters(&mut snapshot);
        self.preserve_external_commands(&mut snapshot);

        if let Some(previous) = &self.last_snapshot {
            if previous.status.mode != snapshot.status.mode {
                info!(
                    "🔄 Mode {} -> {}",
                    previous.status.mode.as_str(),
                    snapshot.status.mode.as_str()
                );
            }
        }

        self.publish(&snapshot, now)?;
        self.last_snapshot = Some(snapshot.clone());
        Ok(snapshot)
    }

    fn run_due_timers(&mut self, now: DateTime<Utc>) {
        for action in self.timers.drain_due(now) {
            self.stats.timers_fired = self.stats.timers_fired.saturating_add(1);
            debug!("⏰ Deferred task fired: {:?}", action);

            let mut ctx = TickContext {
                now,
                state: &mut self.state,
                rng: &mut self.rng,
                notifications: &mut self.notifications,
                history: &mut self.history,
                timers: &mut self.timers,
            };

            match action {
                TimerAction::ExpireNotification(id) => {
                    ctx.notifications.expire(&id, now);
                }
                TimerAction::ExpireHistoryEntry(entry_id) => {
                    ctx.history.expire(entry_id);
                }
                TimerAction::RecoverSensor(sensor) => {
                    self.sensor_errors.recover(ctx.state, sensor);
                }
                TimerAction::ReleaseTestCooldown => release_cooldown(ctx.state),
                TimerAction::FireControlledNotice {
                    duration_sec,
                    water_used_liters,
                } => fire_controlled_notice(&mut ctx, duration_sec, water_used_liters),
                TimerAction::TestCompletedNotice { water_used_liters } => {
                    test_completed_notice(&mut ctx, water_used_liters);
                }
            }
        }
    }

    fn read_commands(&mut self) -> IncomingCommands {
        match self.store.get(&self.config.path("commands")) {
            Ok(value) => IncomingCommands::from_value(value.as_ref()),
            Err(e) => {
                warn!("Failed to read commands: {}", e);
                self.stats.command_read_failures = self.stats.command_read_failures.saturating_add(1);
                IncomingCommands::default()
            }
        }
    }

    fn accumulate_counters(&mut self, snapshot: &mut Snapshot) {
        if snapshot.actuators.alarm.active {
            self.state.alarm_duration_sec = self.state.alarm_duration_sec.saturating_add(1);
        }
        if snapshot.actuators.pump.active {
            self.state.pump_runtime_sec = self.state.pump_runtime_sec.saturating_add(1);
        }
        snapshot.actuators.alarm.duration_sec = self.state.alarm_duration_sec;
        snapshot.actuators.pump.runtime_sec = self.state.pump_runtime_sec;
    }

    /// Re-read the externally owned flags right before publishing so a
    /// client write during the tick is not clobbered.
    fn preserve_external_commands(&mut self, snapshot: &mut Snapshot) {
        let Ok(value) = self.store.get(&self.config.path("commands")) else {
            return;
        };
        let latest = IncomingCommands::from_value(value.as_ref());
        if latest.shutdown_system.is_some() {
            snapshot.commands.shutdown_system = latest.shutdown_system;
        }
        if let Some(override_alarm) = latest.override_alarm {
            snapshot.commands.override_alarm = override_alarm;
        }
    }

    fn publish(&mut self, snapshot: &Snapshot, now: DateTime<Utc>) -> Result<(), AgentError> {
        let Value::Object(fields) = serde_json::to_value(snapshot)? else {
            return Err(AgentError::SnapshotShape);
        };
        let root = self.config.store_root.clone();
        if let Err(e) = self.store.update(&root, fields) {
            self.publish_failed("snapshot", &e);
        }

        if self.notifications.take_dirty() {
            let payload = serde_json::to_value(self.notifications.payload(now))?;
            if let Err(e) = self.store.set(&self.config.path("notifications"), payload) {
                self.publish_failed("notifications", &e);
                self.notifications.mark_dirty();
            }
        }

        if self.history.take_dirty() {
            let entries = serde_json::to_value(self.history.entries())?;
            if let Err(e) = self.store.set(&self.config.path("history"), entries) {
                self.publish_failed("history", &e);
                self.history.mark_dirty();
            }
        }

        Ok(())
    }

    fn publish_failed(&mut self, what: &str, error: &StoreError) {
        self.stats.publish_failures = self.stats.publish_failures.saturating_add(1);
        warn!("Failed to publish {}: {}", what, error);
    }

    pub fn get_config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn get_state(&self) -> &SystemState {
        &self.state
    }

    /// Direct state access for scenario setup.
    pub fn state_mut(&mut self) -> &mut SystemState {
        &mut self.state
    }

    pub fn get_stats(&self) -> &AgentStats {
        &self.stats
    }

    pub fn notifications(&self) -> &NotificationManager {
        &self.notifications
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub fn timers(&self) -> &TimerQueue {
        &self.timers
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn last_snapshot(&self) -> Option<&Snapshot> {
        self.last_snapshot.as_ref()
    }
}
