use crate::context::TickContext;
use crate::history::{HistoryData, HistoryEventType, SuppressionReport};
use crate::notifications::{NotificationData, NotificationKind};
use crate::scheduler::TimerAction;
use crate::snapshot::{Mode, Snapshot};
use crate::state::{elapsed_secs, round1, SensorStatus};
use crate::synthesizer::{
    CO_FIRE_PPM, CO_INCREASED_PPM, FLAME_FIRE, SIGNAL_RESTORED_DBM, SIGNAL_WEAK_DBM, TEMPERATURE_FIRE_C,
    WATER_FLOW_ACTIVE_LPM,
};
use chrono::Duration;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

// Interval between episodes, measured from the previous episode's start
const FIRE_INTERVAL_S: u32 = 7200;
const CO_INCREASE_INTERVAL_S: u32 = 5400;
const WEAK_SIGNAL_INTERVAL_S: u32 = 1800;

// Episode length bounds (inclusive)
const FIRE_DURATION_S: (u32, u32) = (300, 600);
const CO_INCREASE_DURATION_S: (u32, u32) = (180, 300);
const WEAK_SIGNAL_DURATION_S: (u32, u32) = (120, 240);

const FOLLOWUP_NOTICE_DELAY_S: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmergencyKind {
    Fire,
    CoRise,
    WeakSignal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmergencyConfig {
    pub fire_interval_s: u32,
    pub fire_duration_s: (u32, u32),
    pub co_increase_interval_s: u32,
    pub co_increase_duration_s: (u32, u32),
    pub weak_signal_interval_s: u32,
    pub weak_signal_duration_s: (u32, u32),
    pub followup_notice_delay_s: u32,
}

impl Default for EmergencyConfig {
    fn default() -> Self {
        Self {
            fire_interval_s: FIRE_INTERVAL_S,
            fire_duration_s: FIRE_DURATION_S,
            co_increase_interval_s: CO_INCREASE_INTERVAL_S,
            co_increase_duration_s: CO_INCREASE_DURATION_S,
            weak_signal_interval_s: WEAK_SIGNAL_INTERVAL_S,
            weak_signal_duration_s: WEAK_SIGNAL_DURATION_S,
            followup_notice_delay_s: FOLLOWUP_NOTICE_DELAY_S,
        }
    }
}

/// Timed fire / CO-rise / weak-signal state machine.
///
/// Each sub-machine goes dormant → active once its interval has elapsed since
/// its last start, and back to dormant when its countdown reaches zero.
/// Only one active sub-machine runs its per-tick step per tick, in strict
/// priority order fire, CO rise, weak signal. A lower-priority episode that
/// is flagged but not stepped keeps its remaining countdown unchanged.
#[derive(Debug, Default)]
pub struct EmergencyEngine {
    config: EmergencyConfig,
}

impl EmergencyEngine {
    pub fn new(config: EmergencyConfig) -> Self {
        Self { config }
    }

    pub fn get_config(&self) -> &EmergencyConfig {
        &self.config
    }

    /// Start any due episodes, then run the step of the highest-priority
    /// active one. Returns which step ran, if any.
    pub fn update(&self, ctx: &mut TickContext<'_>, snapshot: &mut Snapshot) -> Option<EmergencyKind> {
        self.check_fire_trigger(ctx);
        self.check_co_trigger(ctx);
        self.check_weak_signal_trigger(ctx);

        if ctx.state.is_fire {
            self.fire_step(ctx, snapshot);
            Some(EmergencyKind::Fire)
        } else if ctx.state.is_co_increasing {
            Self::co_step(ctx, snapshot);
            Some(EmergencyKind::CoRise)
        } else if ctx.state.is_weak_signal {
            Self::weak_signal_step(ctx, snapshot);
            Some(EmergencyKind::WeakSignal)
        } else {
            None
        }
    }

    fn check_fire_trigger(&self, ctx: &mut TickContext<'_>) {
        let state = &mut *ctx.state;
        if state.is_fire || elapsed_secs(state.last_fire_time, ctx.now) < f64::from(self.config.fire_interval_s) {
            return;
        }

        let (min, max) = self.config.fire_duration_s;
        state.is_fire = true;
        state.fire_duration = ctx.rng.gen_range(min..=max);
        state.last_fire_time = ctx.now;
        state.reset_actuator_counters();
        info!("🔥 Fire simulation started ({}s)", state.fire_duration);

        let flame_intensity = ctx.rng.gen_range(FLAME_FIRE);
        ctx.notify(
            NotificationKind::FireAlert,
            "🔥 Fire detected",
            format!("Flame detected with intensity {flame_intensity}. Alarm and pump activated."),
            Some(NotificationData::FlameIntensity { flame_intensity }),
        );
    }

    fn check_co_trigger(&self, ctx: &mut TickContext<'_>) {
        let state = &mut *ctx.state;
        if state.is_co_increasing
            || state.is_fire
            || elapsed_secs(state.last_co_increase_time, ctx.now) < f64::from(self.config.co_increase_interval_s)
        {
            return;
        }

        let (min, max) = self.config.co_increase_duration_s;
        state.is_co_increasing = true;
        state.co_increase_duration = ctx.rng.gen_range(min..=max);
        state.last_co_increase_time = ctx.now;
        info!("🛑 CO rise simulation started ({}s)", state.co_increase_duration);

        let co_ppm = ctx.rng.gen_range(CO_INCREASED_PPM);
        ctx.notify(
            NotificationKind::CoAlert,
            "🛑 Dangerous CO levels",
            format!("Carbon monoxide reached {co_ppm} ppm. Risk of poisoning."),
            Some(NotificationData::CoLevel { co_ppm }),
        );
    }

    fn check_weak_signal_trigger(&self, ctx: &mut TickContext<'_>) {
        let state = &mut *ctx.state;
        if state.is_weak_signal
            || state.is_fire
            || state.is_co_increasing
            || elapsed_secs(state.last_weak_signal_time, ctx.now) < f64::from(self.config.weak_signal_interval_s)
        {
            return;
        }

        let (min, max) = self.config.weak_signal_duration_s;
        state.is_weak_signal = true;
        state.weak_signal_duration = ctx.rng.gen_range(min..=max);
        state.last_weak_signal_time = ctx.now;
        info!("📶 Weak signal simulation started ({}s)", state.weak_signal_duration);

        let signal_strength_dbm = ctx.rng.gen_range(SIGNAL_WEAK_DBM);
        ctx.notify(
            NotificationKind::WeakSignal,
            "📶 Weak WiFi signal",
            format!("WiFi signal strength dropped to {signal_strength_dbm} dBm. Connectivity may be lost."),
            Some(NotificationData::SignalStrength { signal_strength_dbm }),
        );
        let timestamp = ctx.now;
        ctx.log_history(HistoryData::WeakSignalDetected {
            timestamp,
            signal_strength_dbm,
        });
    }

    fn fire_step(&self, ctx: &mut TickContext<'_>, snapshot: &mut Snapshot) {
        let sensors = &mut snapshot.sensors;
        sensors.temperature.value = round1(ctx.rng.gen_range(TEMPERATURE_FIRE_C));
        sensors.temperature.status = SensorStatus::Ok;
        sensors.co_level.ppm = ctx.rng.gen_range(CO_FIRE_PPM);
        sensors.flame.detected = true;
        sensors.flame.intensity = ctx.rng.gen_range(FLAME_FIRE);
        sensors.water_flow.rate_lpm = round1(ctx.rng.gen_range(WATER_FLOW_ACTIVE_LPM));
        sensors.water_flow.total_liters = round1(ctx.state.water_total_liters);

        snapshot.set_actuators(true, true);
        snapshot.status.mode = Mode::Emergency;

        ctx.state.fire_duration = ctx.state.fire_duration.saturating_sub(1);
        if ctx.state.fire_duration == 0 {
            self.finalize_fire(ctx, snapshot);
        }
    }

    fn finalize_fire(&self, ctx: &mut TickContext<'_>, snapshot: &Snapshot) {
        // Counter covers the ticks before this one; the alarm is still on now.
        let duration_sec = ctx.state.alarm_duration_sec.saturating_add(1);
        let water_used_liters = round1(ctx.state.water_total_liters);

        ctx.state.is_fire = false;
        ctx.state.reset_actuator_counters();

        ctx.log_history(HistoryData::FireControlled(SuppressionReport {
            alarm: snapshot.actuators.alarm,
            pump: snapshot.actuators.pump,
            temperature: snapshot.sensors.temperature.clone(),
            co_level: snapshot.sensors.co_level.clone(),
            flame: snapshot.sensors.flame.clone(),
            water_flow: snapshot.sensors.water_flow.clone(),
            water_used_liters,
            duration_sec: Some(duration_sec),
        }));

        ctx.schedule(
            TimerAction::FireControlledNotice {
                duration_sec,
                water_used_liters,
            },
            Duration::seconds(i64::from(self.config.followup_notice_delay_s)),
        );

        info!("✅ Fire simulation finished after {}s, {} L used", duration_sec, water_used_liters);
    }

    fn co_step(ctx: &mut TickContext<'_>, snapshot: &mut Snapshot) {
        snapshot.sensors.co_level.ppm = ctx.rng.gen_range(CO_INCREASED_PPM);
        snapshot.set_actuators(true, false);
        snapshot.status.mode = Mode::Warning;

        ctx.state.co_increase_duration = ctx.state.co_increase_duration.saturating_sub(1);
        if ctx.state.co_increase_duration == 0 {
            Self::finalize_co_increase(ctx, snapshot);
        }
    }

    fn finalize_co_increase(ctx: &mut TickContext<'_>, snapshot: &Snapshot) {
        ctx.state.is_co_increasing = false;

        ctx.log_history(HistoryData::CoLevelNormalized {
            alarm: snapshot.actuators.alarm,
            co_level: snapshot.sensors.co_level.clone(),
        });

        let co_ppm = snapshot.sensors.co_level.ppm;
        ctx.notify(
            NotificationKind::CoLevelNormalized,
            "✅ CO levels normalized",
            format!("Carbon monoxide is back to normal. Current value: {co_ppm} ppm."),
            Some(NotificationData::CoLevel { co_ppm }),
        );

        info!("✅ CO rise simulation finished");
    }

    fn weak_signal_step(ctx: &mut TickContext<'_>, snapshot: &mut Snapshot) {
        let connectivity = &mut snapshot.status.connectivity;
        connectivity.wifi_connected = true;
        connectivity.signal_strength_dbm = ctx.rng.gen_range(SIGNAL_WEAK_DBM);
        snapshot.status.mode = Mode::Warning;

        ctx.state.weak_signal_duration = ctx.state.weak_signal_duration.saturating_sub(1);
        if ctx.state.weak_signal_duration == 0 {
            Self::finalize_weak_signal(ctx, snapshot);
        }
    }

    fn finalize_weak_signal(ctx: &mut TickContext<'_>, snapshot: &mut Snapshot) {
        ctx.state.is_weak_signal = false;

        let previous_signal_strength = snapshot.status.connectivity.signal_strength_dbm;
        let new_signal_strength = ctx.rng.gen_range(SIGNAL_RESTORED_DBM);
        snapshot.status.connectivity.wifi_connected = true;
        snapshot.status.connectivity.signal_strength_dbm = new_signal_strength;
        snapshot.status.mode = Mode::Normal;

        let timestamp = ctx.now;
        ctx.log_history(HistoryData::SignalRestored {
            timestamp,
            previous_signal_strength,
            new_signal_strength,
            duration_seconds: elapsed_secs(ctx.state.last_weak_signal_time, ctx.now),
        });

        ctx.notify(
            NotificationKind::SignalRestored,
            "📶 WiFi signal restored",
            format!("WiFi signal strength is back to {new_signal_strength} dBm."),
            Some(NotificationData::SignalStrength {
                signal_strength_dbm: new_signal_strength,
            }),
        );

        info!("✅ Weak signal simulation finished");
    }
}

/// Deferred "fire controlled" notice. The water figure is read back from the
/// oldest `fire_controlled` entry still in the history when one exists.
pub fn fire_controlled_notice(ctx: &mut TickContext<'_>, duration_sec: u32, water_used_liters: f64) {
    let water_used_liters = ctx
        .history
        .find_first(HistoryEventType::FireControlled)
        .and_then(|event| event.data.water_used_liters())
        .unwrap_or(water_used_liters);

    ctx.notify(
        NotificationKind::FireControlled,
        "✅ Fire controlled",
        format!("Fire controlled after {duration_sec} seconds. Water used: {water_used_liters} liters."),
        Some(NotificationData::FireControlled {
            duration_sec,
            water_used_liters,
        }),
    );
}
