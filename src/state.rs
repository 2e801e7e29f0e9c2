use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Temperature,
    CoLevel,
    Flame,
    WaterFlow,
}

impl SensorKind {
    pub const ALL: [SensorKind; 4] = [
        SensorKind::Temperature,
        SensorKind::CoLevel,
        SensorKind::Flame,
        SensorKind::WaterFlow,
    ];

    /// Key used in the store tree and in notification payloads.
    pub fn key(self) -> &'static str {
        match self {
            SensorKind::Temperature => "temperature",
            SensorKind::CoLevel => "co_level",
            SensorKind::Flame => "flame",
            SensorKind::WaterFlow => "water_flow",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            SensorKind::Temperature => "Temperature",
            SensorKind::CoLevel => "Carbon Monoxide",
            SensorKind::Flame => "Flame",
            SensorKind::WaterFlow => "Water Flow",
        }
    }

    fn index(self) -> usize {
        match self {
            SensorKind::Temperature => 0,
            SensorKind::CoLevel => 1,
            SensorKind::Flame => 2,
            SensorKind::WaterFlow => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorStatus {
    #[default]
    Ok,
    Error,
    Disabled,
}

/// Health of every sensor, indexed by [`SensorKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SensorStatusMap {
    statuses: [SensorStatus; 4],
}

impl SensorStatusMap {
    pub fn get(&self, sensor: SensorKind) -> SensorStatus {
        self.statuses[sensor.index()]
    }

    pub fn set(&mut self, sensor: SensorKind, status: SensorStatus) {
        self.statuses[sensor.index()] = status;
    }

    pub fn iter(&self) -> impl Iterator<Item = (SensorKind, SensorStatus)> + '_ {
        SensorKind::ALL.iter().map(move |&kind| (kind, self.get(kind)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    #[default]
    None,
    ManualTest,
    Shutdown,
    Startup,
    AlarmOverride,
    AlarmReactivated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandAuthor {
    #[default]
    System,
    MobileApp,
}

/// Most recent accepted command, echoed under `commands.last_command`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastCommand {
    #[serde(rename = "type")]
    pub kind: CommandKind,
    pub author: CommandAuthor,
    pub timestamp: DateTime<Utc>,
}

impl LastCommand {
    pub fn none(timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: CommandKind::None,
            author: CommandAuthor::System,
            timestamp,
        }
    }

    pub fn from_mobile_app(kind: CommandKind, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind,
            author: CommandAuthor::MobileApp,
            timestamp,
        }
    }
}

/// Process-wide simulator state.
///
/// Owned by the [`SimulatorAgent`](crate::agent::SimulatorAgent); components
/// only ever see it through a [`TickContext`](crate::context::TickContext).
#[derive(Debug, Clone)]
pub struct SystemState {
    // Interval anchors
    pub last_fire_time: DateTime<Utc>,
    pub last_co_increase_time: DateTime<Utc>,
    pub last_weak_signal_time: DateTime<Utc>,
    pub last_sensor_error_time: DateTime<Utc>,
    pub test_start_time: Option<DateTime<Utc>>,
    pub shutdown_since: Option<DateTime<Utc>>,

    // Mode flags
    pub is_fire: bool,
    pub is_co_increasing: bool,
    pub is_weak_signal: bool,
    pub test_in_progress: bool,
    pub test_cooldown: bool,
    pub is_shutdown: bool,

    // Remaining episode seconds
    pub fire_duration: u32,
    pub co_increase_duration: u32,
    pub weak_signal_duration: u32,

    // Counters
    pub alarm_duration_sec: u32,
    pub pump_runtime_sec: u32,
    pub water_total_liters: f64,
    pub test_water_used: f64,

    pub sensor_status: SensorStatusMap,

    // Edge detection memory
    pub previous_override_state: bool,
    pub previous_shutdown_state: bool,

    pub last_command: LastCommand,
}

impl SystemState {
    /// Fresh state with every interval anchored at `now`, so the first fire
    /// happens one full fire interval after start-up.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            last_fire_time: now,
            last_co_increase_time: now,
            last_weak_signal_time: now,
            last_sensor_error_time: now,
            test_start_time: None,
            shutdown_since: None,
            is_fire: false,
            is_co_increasing: false,
            is_weak_signal: false,
            test_in_progress: false,
            test_cooldown: false,
            is_shutdown: false,
            fire_duration: 0,
            co_increase_duration: 0,
            weak_signal_duration: 0,
            alarm_duration_sec: 0,
            pump_runtime_sec: 0,
            water_total_liters: 0.0,
            test_water_used: 0.0,
            sensor_status: SensorStatusMap::default(),
            previous_override_state: false,
            previous_shutdown_state: false,
            last_command: LastCommand::none(now),
        }
    }

    pub fn reset_actuator_counters(&mut self) {
        self.alarm_duration_sec = 0;
        self.pump_runtime_sec = 0;
    }

    /// True while any of fire, CO rise or weak signal is flagged.
    pub fn in_emergency(&self) -> bool {
        self.is_fire || self.is_co_increasing || self.is_weak_signal
    }
}

/// Seconds elapsed between two instants, as a float.
pub fn elapsed_secs(since: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - since).num_milliseconds() as f64 / 1000.0
}

/// Round to one decimal place, the precision every published liter and
/// temperature value carries.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
