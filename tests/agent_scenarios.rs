use chrono::{DateTime, Duration, TimeZone, Utc};
use firesim::history::HistoryEventType;
use firesim::notifications::{NotificationData, NotificationKind};
use firesim::state::{SensorKind, SensorStatus};
use firesim::*;
use serde_json::{json, Map, Value};
use std::cell::Cell;

fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 22, 12, 0, 0).unwrap()
}

fn quiet_config() -> SimulatorConfig {
    let mut config = SimulatorConfig {
        seed: Some(2025),
        ..Default::default()
    };
    // Keep the lower-priority machines out of the way unless a test wants them.
    config.emergency.co_increase_interval_s = 1_000_000;
    config.emergency.weak_signal_interval_s = 1_000_000;
    config
}

fn agent_with(config: SimulatorConfig) -> (SimulatorAgent<MemoryStore, ManualClock>, ManualClock) {
    let clock = ManualClock::new(start_time());
    let agent = SimulatorAgent::new(config, MemoryStore::new(), clock.clone()).unwrap();
    (agent, clock)
}

fn tick(agent: &mut SimulatorAgent<MemoryStore, ManualClock>, clock: &ManualClock) -> Snapshot {
    let snapshot = agent.update().unwrap();
    clock.advance_secs(1);
    snapshot
}

fn write_command(agent: &mut SimulatorAgent<MemoryStore, ManualClock>, field: &str, value: bool) {
    let mut fields = Map::new();
    fields.insert(field.to_string(), Value::Bool(value));
    agent.store_mut().update("system/commands", fields).unwrap();
}

#[test]
fn test_fire_starts_after_interval() {
    let (mut agent, clock) = agent_with(quiet_config());
    tick(&mut agent, &clock);

    clock.set(start_time() + Duration::seconds(7199));
    let snapshot = tick(&mut agent, &clock);
    assert_eq!(snapshot.status.mode, Mode::Normal);
    assert!(!agent.get_state().is_fire);

    let snapshot = tick(&mut agent, &clock);
    assert!(agent.get_state().is_fire);
    assert!((299..=599).contains(&agent.get_state().fire_duration));
    assert!(snapshot.actuators.alarm.active);
    assert!(snapshot.actuators.pump.active);
    assert_eq!(snapshot.status.mode, Mode::Emergency);

    let published = agent.store().get("system/status/mode").unwrap();
    assert_eq!(published, Some(json!("emergency")));
    assert_eq!(agent.notifications().count_of(NotificationKind::FireAlert), 1);
}

#[test]
fn test_fire_episode_lifecycle() {
    let mut config = quiet_config();
    config.emergency.fire_duration_s = (5, 5);
    let (mut agent, clock) = agent_with(config);
    tick(&mut agent, &clock);
    clock.set(start_time() + Duration::seconds(7200));

    for _ in 0..5 {
        let snapshot = tick(&mut agent, &clock);
        assert_eq!(snapshot.status.mode, Mode::Emergency);
    }
    assert!(!agent.get_state().is_fire);
    assert_eq!(agent.history().count_of(HistoryEventType::FireControlled), 1);

    // The "fire controlled" notice follows one second later.
    let snapshot = tick(&mut agent, &clock);
    assert_eq!(snapshot.status.mode, Mode::Normal);
    // Reset at fire end, then one more second counted on the final fire tick.
    assert_eq!(snapshot.actuators.alarm.duration_sec, 1);

    let (_, notice) = agent
        .notifications()
        .iter()
        .find(|(_, n)| n.kind == NotificationKind::FireControlled)
        .unwrap();
    match notice.data {
        Some(NotificationData::FireControlled {
            duration_sec,
            water_used_liters,
        }) => {
            assert_eq!(duration_sec, 5);
            assert!((0.6..=1.4).contains(&water_used_liters), "water {water_used_liters}");
        }
        ref other => panic!("unexpected notification data {other:?}"),
    }
}

#[test]
fn test_manual_test_sequence() {
    let (mut agent, clock) = agent_with(quiet_config());
    write_command(&mut agent, "trigger_test", true);

    let snapshot = tick(&mut agent, &clock);
    assert!(agent.get_state().test_in_progress);
    assert_eq!(snapshot.status.mode, Mode::Test);
    assert_eq!(agent.notifications().count_of(NotificationKind::SystemTest), 1);

    for _ in 1..20 {
        let snapshot = tick(&mut agent, &clock);
        assert_eq!(snapshot.status.mode, Mode::Test);
        assert!(snapshot.commands.trigger_test);
    }

    // Elapsed reaches 20 s on this tick.
    let snapshot = tick(&mut agent, &clock);
    assert!(!agent.get_state().test_in_progress);
    assert!(agent.get_state().test_cooldown);
    assert!(!snapshot.commands.trigger_test);
    assert_eq!(
        agent.store().get("system/commands/trigger_test").unwrap(),
        Some(json!(false))
    );
    assert_eq!(agent.history().count_of(HistoryEventType::SystemTest), 1);

    let entries = agent.store().get("system/history").unwrap().unwrap();
    assert_eq!(entries[0]["event_type"], json!("system_test"));
    assert_eq!(entries[0]["data"]["alarm"]["active"], json!(true));

    // Completion notice one second later.
    tick(&mut agent, &clock);
    let completion = agent
        .notifications()
        .iter()
        .filter(|(_, n)| n.kind == NotificationKind::SystemTest)
        .any(|(_, n)| matches!(n.data, Some(NotificationData::WaterUsed { .. })));
    assert!(completion);

    // A request during cooldown is dropped.
    write_command(&mut agent, "trigger_test", true);
    tick(&mut agent, &clock);
    assert!(!agent.get_state().test_in_progress);

    // Cooldown ends five seconds after completion.
    clock.set(start_time() + Duration::seconds(25));
    write_command(&mut agent, "trigger_test", true);
    tick(&mut agent, &clock);
    assert!(!agent.get_state().test_cooldown);
    assert!(agent.get_state().test_in_progress);
}

#[test]
fn test_weak_signal_frozen_while_fire_runs() {
    let (mut agent, clock) = agent_with(quiet_config());
    tick(&mut agent, &clock);

    let now = clock.now();
    let state = agent.state_mut();
    state.is_weak_signal = true;
    state.weak_signal_duration = 50;
    state.last_fire_time = now - Duration::seconds(7200);

    for _ in 0..10 {
        let snapshot = tick(&mut agent, &clock);
        assert_eq!(snapshot.status.mode, Mode::Emergency);
        assert_eq!(agent.get_state().weak_signal_duration, 50);
    }
}

#[test]
fn test_shutdown_snapshot_and_idempotence() {
    let (mut agent, clock) = agent_with(quiet_config());
    tick(&mut agent, &clock);
    write_command(&mut agent, "shutdown_system", true);

    for _ in 0..5 {
        let snapshot = tick(&mut agent, &clock);
        assert_eq!(snapshot.status.mode, Mode::Shutdown);
        assert!(!snapshot.actuators.alarm.active);
        assert!(!snapshot.actuators.pump.active);
        assert!(SensorKind::ALL
            .iter()
            .all(|&s| snapshot.sensor_status(s) == SensorStatus::Disabled));
        assert_eq!(snapshot.commands.shutdown_system, Some(true));
        // No synthesizer while shut down: readings stay at their zero values.
        assert_eq!(snapshot.sensors.temperature.value, 0.0);
        assert_eq!(snapshot.status.connectivity.signal_strength_dbm, 0);
    }

    assert_eq!(agent.history().count_of(HistoryEventType::SystemShutdown), 1);
    assert_eq!(agent.notifications().count_of(NotificationKind::SystemShutdown), 1);
    assert_eq!(
        agent.store().get("system/status/mode").unwrap(),
        Some(json!("shutdown"))
    );
    assert_eq!(
        agent.store().get("system/commands/shutdown_system").unwrap(),
        Some(json!(true))
    );
}

#[test]
fn test_shutdown_skips_emergency_logic() {
    let (mut agent, clock) = agent_with(quiet_config());
    write_command(&mut agent, "shutdown_system", true);
    tick(&mut agent, &clock);

    clock.set(start_time() + Duration::seconds(7200));
    let snapshot = tick(&mut agent, &clock);

    assert!(!agent.get_state().is_fire);
    assert_eq!(snapshot.status.mode, Mode::Shutdown);
}

#[test]
fn test_startup_after_shutdown() {
    let (mut agent, clock) = agent_with(quiet_config());
    write_command(&mut agent, "shutdown_system", true);
    tick(&mut agent, &clock);

    clock.advance_secs(29);
    write_command(&mut agent, "shutdown_system", false);
    let snapshot = tick(&mut agent, &clock);

    assert!(!agent.get_state().is_shutdown);
    assert_eq!(snapshot.status.mode, Mode::Normal);
    assert_eq!(snapshot.sensor_status(SensorKind::Temperature), SensorStatus::Ok);

    let entries = agent.store().get("system/history").unwrap().unwrap();
    let startup = entries
        .as_array()
        .unwrap()
        .iter()
        .find(|e| e["event_type"] == json!("system_startup"))
        .unwrap();
    assert_eq!(startup["data"]["downtime_seconds"], json!(30.0));
    assert_eq!(startup["data"]["new_mode"], json!("normal"));
}

#[test]
fn test_notification_expires_after_ttl() {
    let (mut agent, clock) = agent_with(quiet_config());
    write_command(&mut agent, "shutdown_system", true);
    tick(&mut agent, &clock);

    let published = agent.store().get("system/notifications").unwrap().unwrap();
    assert_eq!(published["active"], json!(true));
    assert_eq!(published["queue"].as_object().unwrap().len(), 1);

    for _ in 1..10 {
        tick(&mut agent, &clock);
    }
    assert_eq!(agent.notifications().len(), 1);

    // Ten seconds after creation.
    tick(&mut agent, &clock);
    assert!(agent.notifications().is_empty());
    let published = agent.store().get("system/notifications").unwrap().unwrap();
    assert_eq!(published["active"], json!(false));
    assert!(published["queue"].as_object().unwrap().is_empty());
}

#[test]
fn test_history_never_exceeds_capacity() {
    let mut config = quiet_config();
    config.expiry.history_ttl_s = 1_000_000;
    let (mut agent, clock) = agent_with(config);

    for i in 0..150 {
        write_command(&mut agent, "override_alarm", i % 2 == 0);
        tick(&mut agent, &clock);
        assert!(agent.history().len() <= 100);
    }

    assert_eq!(agent.history().len(), 100);
    let entries = agent.store().get("system/history").unwrap().unwrap();
    assert_eq!(entries.as_array().unwrap().len(), 100);
}

#[test]
fn test_override_silences_alarm_during_fire() {
    let (mut agent, clock) = agent_with(quiet_config());
    tick(&mut agent, &clock);
    clock.set(start_time() + Duration::seconds(7200));
    write_command(&mut agent, "override_alarm", true);

    let snapshot = tick(&mut agent, &clock);

    assert!(agent.get_state().is_fire);
    assert!(!snapshot.actuators.alarm.active);
    assert!(snapshot.actuators.pump.active);
    assert!(snapshot.status.emergency_override);
    assert!(snapshot.commands.override_alarm);
    assert_eq!(agent.history().count_of(HistoryEventType::AlarmOverride), 1);
}

#[test]
fn test_exclusive_mode_steps_over_long_run() {
    let config = SimulatorConfig {
        seed: Some(99),
        ..Default::default()
    };
    let (mut agent, clock) = agent_with(config);

    for _ in 0..7400 {
        let snapshot = tick(&mut agent, &clock);
        let now = clock.now() - Duration::seconds(1);
        let state = agent.get_state();

        if state.is_fire {
            assert_eq!(snapshot.status.mode, Mode::Emergency);
            assert!(snapshot.actuators.pump.active);
        } else if state.is_co_increasing {
            assert_eq!(snapshot.status.mode, Mode::Warning);
            assert!(snapshot.actuators.alarm.active);
            assert!(!snapshot.actuators.pump.active);
        } else if state.is_weak_signal {
            assert_eq!(snapshot.status.mode, Mode::Warning);
        }

        assert!(agent.history().len() <= 100);
        for (_, notification) in agent.notifications().iter() {
            assert!(now - notification.timestamp < Duration::seconds(10));
        }
    }

    assert!(agent.history().entries().iter().all(|e| e.timestamp > start_time()));
    assert!(agent.notifications().total_created() > 0);
}

struct FailingStore;

impl Store for FailingStore {
    fn get(&self, _path: &str) -> Result<Option<Value>, StoreError> {
        Err(StoreError::Unavailable("offline".into()))
    }

    fn set(&mut self, _path: &str, _value: Value) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("offline".into()))
    }

    fn update(&mut self, _path: &str, _fields: Map<String, Value>) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("offline".into()))
    }
}

#[test]
fn test_unreachable_store_does_not_stop_ticks() {
    let clock = ManualClock::new(start_time());
    let mut agent = SimulatorAgent::new(quiet_config(), FailingStore, clock.clone()).unwrap();

    for _ in 0..3 {
        assert!(agent.update().is_ok());
        clock.advance_secs(1);
    }

    assert_eq!(agent.get_stats().ticks, 3);
    assert_eq!(agent.get_stats().command_read_failures, 3);
    assert!(agent.get_stats().publish_failures >= 3);
}

#[test]
fn test_history_entry_expires_after_ttl() {
    let (mut agent, clock) = agent_with(quiet_config());
    write_command(&mut agent, "shutdown_system", true);
    tick(&mut agent, &clock);

    let published = agent.store().get("system/history").unwrap().unwrap();
    assert_eq!(published.as_array().unwrap().len(), 1);

    for _ in 1..10 {
        tick(&mut agent, &clock);
    }
    assert_eq!(agent.history().len(), 1);

    // Ten seconds after logging the entry is gone and the log republished.
    tick(&mut agent, &clock);
    assert!(agent.history().is_empty());
    assert_eq!(agent.store().get("system/history").unwrap(), Some(json!([])));
}

#[test]
fn test_sensor_recovers_while_shut_down() {
    let mut config = quiet_config();
    config.emergency.fire_interval_s = 1_000_000;
    let (mut agent, clock) = agent_with(config);
    tick(&mut agent, &clock);

    clock.set(start_time() + Duration::seconds(86_400));
    tick(&mut agent, &clock);
    let (sensor, _) = agent
        .get_state()
        .sensor_status
        .iter()
        .find(|(_, status)| *status == SensorStatus::Error)
        .unwrap();

    write_command(&mut agent, "shutdown_system", true);
    for _ in 1..30 {
        let snapshot = tick(&mut agent, &clock);
        assert_eq!(snapshot.status.mode, Mode::Shutdown);
        assert_eq!(agent.get_state().sensor_status.get(sensor), SensorStatus::Error);
    }

    // Thirty seconds after the fault the recovery runs despite the shutdown.
    tick(&mut agent, &clock);
    assert_eq!(agent.get_state().sensor_status.get(sensor), SensorStatus::Ok);

    write_command(&mut agent, "shutdown_system", false);
    let snapshot = tick(&mut agent, &clock);
    assert_eq!(snapshot.status.mode, Mode::Normal);
    assert_eq!(snapshot.sensor_status(sensor), SensorStatus::Ok);
}

/// In-memory store whose next `get` can be made to fail once.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    fail_next_get: Cell<bool>,
}

impl Store for FlakyStore {
    fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        if self.fail_next_get.replace(false) {
            return Err(StoreError::Unavailable("timeout".into()));
        }
        self.inner.get(path)
    }

    fn set(&mut self, path: &str, value: Value) -> Result<(), StoreError> {
        self.inner.set(path, value)
    }

    fn update(&mut self, path: &str, fields: Map<String, Value>) -> Result<(), StoreError> {
        self.inner.update(path, fields)
    }
}

#[test]
fn test_failed_command_read_keeps_override() {
    let clock = ManualClock::new(start_time());
    let mut agent = SimulatorAgent::new(quiet_config(), FlakyStore::default(), clock.clone()).unwrap();
    let mut fields = Map::new();
    fields.insert("override_alarm".into(), Value::Bool(true));
    agent.store_mut().update("system/commands", fields).unwrap();

    assert!(agent.update().unwrap().status.emergency_override);
    clock.advance_secs(1);

    agent.store().fail_next_get.set(true);
    let snapshot = agent.update().unwrap();
    assert_eq!(agent.get_stats().command_read_failures, 1);
    assert!(snapshot.status.emergency_override);
    assert!(snapshot.commands.override_alarm);
    clock.advance_secs(1);

    assert!(agent.update().unwrap().status.emergency_override);

    assert_eq!(agent.notifications().count_of(NotificationKind::AlarmOverride), 1);
    assert_eq!(agent.notifications().count_of(NotificationKind::AlarmReactivated), 0);
    assert_eq!(agent.history().count_of(HistoryEventType::AlarmOverride), 1);
    assert_eq!(agent.history().count_of(HistoryEventType::AlarmReactivated), 0);
    assert_eq!(
        agent.store().get("system/commands/override_alarm").unwrap(),
        Some(json!(true))
    );
}
