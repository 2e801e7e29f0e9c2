//! Commands written by the mobile client under `commands`.
//!
//! The flags are externally owned: each tick reads them, reacts to changes,
//! and writes `shutdown_system` and `override_alarm` back exactly as read.

use crate::context::TickContext;
use crate::history::{HistoryData, ShutdownRecord, StartupRecord};
use crate::notifications::{NotificationData, NotificationKind};
use crate::snapshot::{Mode, Snapshot};
use crate::state::{elapsed_secs, CommandAuthor, CommandKind, LastCommand};
use crate::test_sequence::{begin_test, can_start_test};
use serde_json::Value;
use tracing::{debug, info};

/// Parsed command flags. A missing or non-boolean field counts as absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IncomingCommands {
    pub trigger_test: bool,
    pub shutdown_system: Option<bool>,
    pub override_alarm: Option<bool>,
}

impl IncomingCommands {
    pub fn from_value(value: Option<&Value>) -> Self {
        let field = |name: &str| value.and_then(|v| v.get(name)).and_then(Value::as_bool);
        Self {
            trigger_test: field("trigger_test").unwrap_or(false),
            shutdown_system: field("shutdown_system"),
            override_alarm: field("override_alarm"),
        }
    }
}

/// Alarm override to apply once the mode steps have run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverrideEffect {
    pub active: bool,
}

impl OverrideEffect {
    /// Silence the alarm and flag the override; the pump is untouched.
    pub fn apply(self, snapshot: &mut Snapshot) {
        if self.active {
            snapshot.actuators.alarm.active = false;
            snapshot.status.emergency_override = true;
        }
    }
}

#[derive(Debug, Default)]
pub struct CommandProcessor;

impl CommandProcessor {
    pub fn new() -> Self {
        Self
    }

    /// React to the command flags for this tick. `previous` is the last
    /// published snapshot, used to record what a shutdown interrupted.
    pub fn process(
        &self,
        ctx: &mut TickContext<'_>,
        commands: IncomingCommands,
        snapshot: &mut Snapshot,
        previous: Option<&Snapshot>,
    ) -> OverrideEffect {
        if commands.trigger_test && can_start_test(ctx.state) {
            begin_test(ctx.state, ctx.now);
        }

        if let Some(requested) = commands.shutdown_system {
            if requested != ctx.state.is_shutdown {
                if requested {
                    Self::enter_shutdown(ctx, previous);
                } else {
                    Self::leave_shutdown(ctx);
                }
            }
            ctx.state.previous_shutdown_state = requested;
        }

        if let Some(requested) = commands.override_alarm {
            if requested != ctx.state.previous_override_state {
                Self::override_changed(ctx, requested);
            }
            ctx.state.previous_override_state = requested;
        }
        // An absent flag keeps the last known override.
        let override_active = ctx.state.previous_override_state;

        snapshot.commands.shutdown_system = commands.shutdown_system;
        snapshot.commands.override_alarm = override_active;
        snapshot.commands.last_command = ctx.state.last_command.clone();

        OverrideEffect {
            active: override_active,
        }
    }

    fn enter_shutdown(ctx: &mut TickContext<'_>, previous: Option<&Snapshot>) {
        let now = ctx.now;
        ctx.state.is_shutdown = true;
        ctx.state.shutdown_since = Some(now);
        ctx.state.last_command = LastCommand::from_mobile_app(CommandKind::Shutdown, now);
        info!("⏸️ System shut down from the mobile app");

        ctx.notify(
            NotificationKind::SystemShutdown,
            "⏸️ System on standby",
            "The system was disabled from the mobile app. Sensors and actuators are inactive.",
            Some(NotificationData::InitiatedBy {
                initiated_by: CommandAuthor::MobileApp,
            }),
        );

        let (previous_mode, alarm_active, pump_active) = previous.map_or((Mode::Normal, false, false), |s| {
            (s.status.mode, s.actuators.alarm.active, s.actuators.pump.active)
        });
        ctx.log_history(HistoryData::SystemShutdown(ShutdownRecord {
            timestamp: now,
            initiated_by: CommandAuthor::MobileApp,
            previous_mode,
            alarm_active,
            pump_active,
        }));
    }

    fn leave_shutdown(ctx: &mut TickContext<'_>) {
        let now = ctx.now;
        let downtime_seconds = ctx
            .state
            .shutdown_since
            .take()
            .map_or(0.0, |since| elapsed_secs(since, now));
        ctx.state.is_shutdown = false;
        ctx.state.last_command = LastCommand::from_mobile_app(CommandKind::Startup, now);
        info!("▶️ System restarted after {:.0}s of downtime", downtime_seconds);

        ctx.notify(
            NotificationKind::SystemStartup,
            "▶️ System reactivated",
            "The system was re-enabled from the mobile app and is monitoring again.",
            Some(NotificationData::InitiatedBy {
                initiated_by: CommandAuthor::MobileApp,
            }),
        );

        ctx.log_history(HistoryData::SystemStartup(StartupRecord {
            timestamp: now,
            initiated_by: CommandAuthor::MobileApp,
            downtime_seconds,
            new_mode: Mode::Normal,
        }));
    }

    fn override_changed(ctx: &mut TickContext<'_>, active: bool) {
        let now = ctx.now;
        let initiated_by = CommandAuthor::MobileApp;
        debug!("Alarm override changed to {}", active);

        if active {
            ctx.state.last_command = LastCommand::from_mobile_app(CommandKind::AlarmOverride, now);
            info!("🔕 Alarm overridden from the mobile app");
            ctx.notify(
                NotificationKind::AlarmOverride,
                "🔕 Alarm silenced",
                "The alarm was silenced from the mobile app.",
                Some(NotificationData::InitiatedBy { initiated_by }),
            );
            ctx.log_history(HistoryData::AlarmOverride {
                timestamp: now,
                initiated_by,
            });
        } else {
            ctx.state.last_command = LastCommand::from_mobile_app(CommandKind::AlarmReactivated, now);
            info!("🔔 Alarm reactivated from the mobile app");
            ctx.notify(
                NotificationKind::AlarmReactivated,
                "🔔 Alarm reactivated",
                "The alarm was reactivated from the mobile app.",
                Some(NotificationData::InitiatedBy { initiated_by }),
            );
            ctx.log_history(HistoryData::AlarmReactivated {
                timestamp: now,
                initiated_by,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{HistoryEventType, HistoryLog};
    use crate::notifications::NotificationManager;
    use crate::scheduler::TimerQueue;
    use crate::state::SystemState;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    struct Harness {
        now: DateTime<Utc>,
        state: SystemState,
        rng: StdRng,
        notifications: NotificationManager,
        history: HistoryLog,
        timers: TimerQueue,
    }

    impl Harness {
        fn new() -> Self {
            let now = Utc.with_ymd_and_hms(2025, 5, 22, 8, 0, 0).unwrap();
            Self {
                now,
                state: SystemState::new(now),
                rng: StdRng::seed_from_u64(9),
                notifications: NotificationManager::new(Duration::seconds(10)),
                history: HistoryLog::new(Duration::seconds(10)),
                timers: TimerQueue::new(),
            }
        }

        fn process(&mut self, commands: IncomingCommands, previous: Option<&Snapshot>) -> (OverrideEffect, Snapshot) {
            let mut snapshot = Snapshot::baseline(&self.state, self.now);
            let mut ctx = TickContext {
                now: self.now,
                state: &mut self.state,
                rng: &mut self.rng,
                notifications: &mut self.notifications,
                history: &mut self.history,
                timers: &mut self.timers,
            };
            let effect = CommandProcessor::new().process(&mut ctx, commands, &mut snapshot, previous);
            self.now += Duration::seconds(1);
            (effect, snapshot)
        }
    }

    #[test]
    fn test_parse_tolerates_malformed_fields() {
        let value = json!({"trigger_test": "yes", "shutdown_system": true, "override_alarm": 1});
        let commands = IncomingCommands::from_value(Some(&value));
        assert!(!commands.trigger_test);
        assert_eq!(commands.shutdown_system, Some(true));
        assert_eq!(commands.override_alarm, None);

        assert_eq!(IncomingCommands::from_value(None), IncomingCommands::default());
    }

    #[test]
    fn test_trigger_starts_test_once() {
        let mut h = Harness::new();
        let commands = IncomingCommands {
            trigger_test: true,
            ..Default::default()
        };

        let (_, snapshot) = h.process(commands, None);
        assert!(h.state.test_in_progress);
        assert_eq!(snapshot.commands.last_command.kind, CommandKind::ManualTest);

        let start = h.state.test_start_time;
        h.process(commands, None);
        assert_eq!(h.state.test_start_time, start);
    }

    #[test]
    fn test_shutdown_is_edge_triggered() {
        let mut h = Harness::new();
        let mut previous = Snapshot::baseline(&h.state, h.now);
        previous.status.mode = Mode::Warning;
        previous.set_actuators(true, false);

        let commands = IncomingCommands {
            shutdown_system: Some(true),
            ..Default::default()
        };
        let (_, snapshot) = h.process(commands, Some(&previous));
        assert!(h.state.is_shutdown);
        assert_eq!(snapshot.commands.shutdown_system, Some(true));

        for _ in 0..5 {
            h.process(commands, Some(&previous));
        }

        assert_eq!(h.notifications.count_of(NotificationKind::SystemShutdown), 1);
        assert_eq!(h.history.count_of(HistoryEventType::SystemShutdown), 1);
        match &h.history.entries()[0].data {
            HistoryData::SystemShutdown(record) => {
                assert_eq!(record.previous_mode, Mode::Warning);
                assert!(record.alarm_active);
                assert!(!record.pump_active);
            }
            other => panic!("unexpected history payload {other:?}"),
        }
    }

    #[test]
    fn test_startup_records_downtime() {
        let mut h = Harness::new();
        h.process(
            IncomingCommands {
                shutdown_system: Some(true),
                ..Default::default()
            },
            None,
        );
        h.now += Duration::seconds(41);

        let (_, snapshot) = h.process(
            IncomingCommands {
                shutdown_system: Some(false),
                ..Default::default()
            },
            None,
        );

        assert!(!h.state.is_shutdown);
        assert_eq!(snapshot.commands.last_command.kind, CommandKind::Startup);
        let startup = h.history.find_first(HistoryEventType::SystemStartup).unwrap();
        match &startup.data {
            HistoryData::SystemStartup(record) => {
                assert!((record.downtime_seconds - 42.0).abs() < 1e-9);
                assert_eq!(record.new_mode, Mode::Normal);
            }
            other => panic!("unexpected history payload {other:?}"),
        }
    }

    #[test]
    fn test_missing_shutdown_flag_changes_nothing() {
        let mut h = Harness::new();
        h.state.is_shutdown = true;

        let (_, snapshot) = h.process(IncomingCommands::default(), None);

        assert!(h.state.is_shutdown);
        assert!(snapshot.commands.shutdown_system.is_none());
        assert!(h.history.is_empty());
    }

    #[test]
    fn test_override_edges() {
        let mut h = Harness::new();
        let on = IncomingCommands {
            override_alarm: Some(true),
            ..Default::default()
        };

        let (effect, _) = h.process(on, None);
        assert!(effect.active);
        let (effect, _) = h.process(on, None);
        assert!(effect.active);
        assert_eq!(h.notifications.count_of(NotificationKind::AlarmOverride), 1);

        let off = IncomingCommands {
            override_alarm: Some(false),
            ..Default::default()
        };
        let (effect, snapshot) = h.process(off, None);
        assert!(!effect.active);
        assert_eq!(h.notifications.count_of(NotificationKind::AlarmReactivated), 1);
        assert_eq!(snapshot.commands.last_command.kind, CommandKind::AlarmReactivated);
        assert_eq!(h.history.count_of(HistoryEventType::AlarmOverride), 1);
        assert_eq!(h.history.count_of(HistoryEventType::AlarmReactivated), 1);
    }

    #[test]
    fn test_missing_override_flag_keeps_last_state() {
        let mut h = Harness::new();
        h.process(
            IncomingCommands {
                override_alarm: Some(true),
                ..Default::default()
            },
            None,
        );

        let (effect, snapshot) = h.process(IncomingCommands::default(), None);

        assert!(effect.active);
        assert!(snapshot.commands.override_alarm);
        assert!(h.state.previous_override_state);
        assert_eq!(h.notifications.count_of(NotificationKind::AlarmReactivated), 0);
        assert_eq!(h.history.count_of(HistoryEventType::AlarmReactivated), 0);
    }

    #[test]
    fn test_override_effect_silences_alarm_only() {
        let h = Harness::new();
        let mut snapshot = Snapshot::baseline(&h.state, h.now);
        snapshot.set_actuators(true, true);

        OverrideEffect { active: true }.apply(&mut snapshot);

        assert!(!snapshot.actuators.alarm.active);
        assert!(snapshot.actuators.pump.active);
        assert!(snapshot.status.emergency_override);
    }
}
