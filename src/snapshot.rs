//! The per-tick `{sensors, actuators, status, commands}` structure.
//!
//! A snapshot is built fresh every tick and published wholesale; field names
//! match the store tree consumed by the mobile client and archival jobs.

use crate::state::{LastCommand, SensorKind, SensorStatus, SystemState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const TEMPERATURE_UNIT: &str = "Celsius";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Normal,
    Warning,
    Emergency,
    Test,
    // Part of the published contract; the mobile client renders it even
    // though the simulator reports `Shutdown` while disabled.
    Standby,
    Shutdown,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Normal => "normal",
            Mode::Warning => "warning",
            Mode::Emergency => "emergency",
            Mode::Test => "test",
            Mode::Standby => "standby",
            Mode::Shutdown => "shutdown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureReading {
    pub value: f64,
    pub unit: String,
    pub status: SensorStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoReading {
    pub ppm: u32,
    pub status: SensorStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlameReading {
    pub detected: bool,
    pub intensity: u32,
    pub status: SensorStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterFlowReading {
    pub rate_lpm: f64,
    pub total_liters: f64,
    pub status: SensorStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sensors {
    pub temperature: TemperatureReading,
    pub co_level: CoReading,
    pub flame: FlameReading,
    pub water_flow: WaterFlowReading,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmState {
    pub active: bool,
    pub duration_sec: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PumpState {
    pub active: bool,
    pub runtime_sec: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actuators {
    pub alarm: AlarmState,
    pub pump: PumpState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connectivity {
    pub wifi_connected: bool,
    pub signal_strength_dbm: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub mode: Mode,
    pub emergency_override: bool,
    pub last_update: DateTime<Utc>,
    pub connectivity: Connectivity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commands {
    pub trigger_test: bool,
    // Externally owned: written back exactly as read, never reset here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shutdown_system: Option<bool>,
    pub override_alarm: bool,
    pub last_command: LastCommand,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub sensors: Sensors,
    pub actuators: Actuators,
    pub status: Status,
    pub commands: Commands,
}

impl Snapshot {
    /// Baseline snapshot before any component runs: sensor statuses mirror
    /// the state, readings are zero until the synthesizer fills them, and
    /// actuators are off carrying the current counters.
    ///
    /// While shut down the synthesizer never runs, so the published tree
    /// keeps these zeros: `temperature.value` is `0.0` and
    /// `signal_strength_dbm` is `0` even though `wifi_connected` stays
    /// `true`. Clients must read them as "no reading", guided by the
    /// `disabled` sensor statuses and the `shutdown` mode.
    pub fn baseline(state: &SystemState, now: DateTime<Utc>) -> Self {
        let status = |kind| state.sensor_status.get(kind);

        Self {
            sensors: Sensors {
                temperature: TemperatureReading {
                    value: 0.0,
                    unit: TEMPERATURE_UNIT.into(),
                    status: status(SensorKind::Temperature),
                },
                co_level: CoReading {
                    ppm: 0,
                    status: status(SensorKind::CoLevel),
                },
                flame: FlameReading {
                    detected: false,
                    intensity: 0,
                    status: status(SensorKind::Flame),
                },
                water_flow: WaterFlowReading {
                    rate_lpm: 0.0,
                    total_liters: 0.0,
                    status: status(SensorKind::WaterFlow),
                },
            },
            actuators: Actuators {
                alarm: AlarmState {
                    active: false,
                    duration_sec: state.alarm_duration_sec,
                },
                pump: PumpState {
                    active: false,
                    runtime_sec: state.pump_runtime_sec,
                },
            },
            status: Status {
                mode: Mode::Normal,
                emergency_override: false,
                last_update: now,
                connectivity: Connectivity {
                    wifi_connected: true,
                    signal_strength_dbm: 0,
                },
            },
            commands: Commands {
                trigger_test: false,
                shutdown_system: None,
                override_alarm: false,
                last_command: state.last_command.clone(),
            },
        }
    }

    pub fn sensor_status(&self, sensor: SensorKind) -> SensorStatus {
        match sensor {
            SensorKind::Temperature => self.sensors.temperature.status,
            SensorKind::CoLevel => self.sensors.co_level.status,
            SensorKind::Flame => self.sensors.flame.status,
            SensorKind::WaterFlow => self.sensors.water_flow.status,
        }
    }

    pub fn set_sensor_status(&mut self, sensor: SensorKind, status: SensorStatus) {
        match sensor {
            SensorKind::Temperature => self.sensors.temperature.status = status,
            SensorKind::CoLevel => self.sensors.co_level.status = status,
            SensorKind::Flame => self.sensors.flame.status = status,
            SensorKind::WaterFlow => self.sensors.water_flow.status = status,
        }
    }

    pub fn set_actuators(&mut self, alarm: bool, pump: bool) {
        self.actuators.alarm.active = alarm;
        self.actuators.pump.active = pump;
    }

    /// Disabled appliance: every sensor disabled, both actuators off.
    pub fn force_shutdown(&mut self) {
        for sensor in SensorKind::ALL {
            self.set_sensor_status(sensor, SensorStatus::Disabled);
        }
        self.set_actuators(false, false);
        self.status.mode = Mode::Shutdown;
    }
}
