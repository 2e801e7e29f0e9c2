//! Synthetic sensor readings.
//!
//! Baseline values follow a diurnal temperature profile and uniform draws
//! from the "normal" ranges; emergency modes sample from the ranges below.

use crate::snapshot::Snapshot;
use crate::state::{round1, SystemState};
use chrono::{DateTime, Local, Timelike, Utc};
use rand::rngs::StdRng;
use rand::Rng;
use std::ops::RangeInclusive;

pub const NIGHT_BASE_TEMP_C: f64 = 22.0;
pub const DAY_BASE_TEMP_C: f64 = 25.0;
const DAYTIME_FLUCTUATION_C: RangeInclusive<f64> = -0.5..=1.5;
const NIGHTTIME_FLUCTUATION_C: RangeInclusive<f64> = -1.0..=0.5;

pub const TEMPERATURE_FIRE_C: RangeInclusive<f64> = 80.0..=120.0;
pub const CO_NORMAL_PPM: RangeInclusive<u32> = 0..=10;
pub const CO_INCREASED_PPM: RangeInclusive<u32> = 100..=300;
pub const CO_FIRE_PPM: RangeInclusive<u32> = 500..=1000;
pub const FLAME_NORMAL: RangeInclusive<u32> = 0..=50;
pub const FLAME_FIRE: RangeInclusive<u32> = 800..=1023;
pub const WATER_FLOW_ACTIVE_LPM: RangeInclusive<f64> = 10.0..=20.0;
pub const SIGNAL_NORMAL_DBM: RangeInclusive<i32> = -70..=-50;
pub const SIGNAL_WEAK_DBM: RangeInclusive<i32> = -95..=-85;
pub const SIGNAL_RESTORED_DBM: RangeInclusive<i32> = -65..=-55;

/// Hour of day on the host's local clock, which drives the diurnal profile.
pub fn local_hour(now: DateTime<Utc>) -> u32 {
    now.with_timezone(&Local).hour()
}

/// Ambient temperature for the given hour: 22 °C base before 06:00, 25 °C
/// after, with a warmer fluctuation band during daytime (06:00-18:00).
pub fn ambient_temperature(hour: u32, rng: &mut StdRng) -> f64 {
    let base = if hour < 6 { NIGHT_BASE_TEMP_C } else { DAY_BASE_TEMP_C };
    let fluctuation = if (6..18).contains(&hour) {
        rng.gen_range(DAYTIME_FLUCTUATION_C)
    } else {
        rng.gen_range(NIGHTTIME_FLUCTUATION_C)
    };
    base + fluctuation
}

/// Fill the ambient readings of a baseline snapshot.
pub fn fill_ambient(snapshot: &mut Snapshot, hour: u32, rng: &mut StdRng) {
    snapshot.sensors.temperature.value = round1(ambient_temperature(hour, rng));
    snapshot.sensors.co_level.ppm = rng.gen_range(CO_NORMAL_PPM);
    snapshot.sensors.flame.detected = false;
    snapshot.sensors.flame.intensity = rng.gen_range(FLAME_NORMAL);
    snapshot.sensors.water_flow.rate_lpm = 0.0;
    snapshot.status.connectivity.wifi_connected = true;
    snapshot.status.connectivity.signal_strength_dbm = rng.gen_range(SIGNAL_NORMAL_DBM);
}

/// Water-flow accounting. A running test takes precedence over a fire;
/// totals accumulate at `rate / 60` liters per one-second tick.
pub fn manage_water_flow(state: &mut SystemState, snapshot: &mut Snapshot, rng: &mut StdRng) {
    let water_flow = &mut snapshot.sensors.water_flow;

    if state.test_in_progress {
        let rate = rng.gen_range(WATER_FLOW_ACTIVE_LPM);
        state.test_water_used += rate / 60.0;
        water_flow.rate_lpm = round1(rate);
        water_flow.total_liters = round1(state.test_water_used);
    } else if state.is_fire {
        let rate = rng.gen_range(WATER_FLOW_ACTIVE_LPM);
        state.water_total_liters += rate / 60.0;
        water_flow.rate_lpm = round1(rate);
        water_flow.total_liters = round1(state.water_total_liters);
    } else {
        water_flow.rate_lpm = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::SeedableRng;

    #[test]
    fn test_night_temperature_band() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let t = ambient_temperature(3, &mut rng);
            assert!((21.0..=22.5).contains(&t), "night temperature {t}");
        }
    }

    #[test]
    fn test_day_temperature_band() {
        let mut rng = StdRng::seed_from_u64(12);
        for _ in 0..200 {
            let t = ambient_temperature(12, &mut rng);
            assert!((24.5..=26.5).contains(&t), "day temperature {t}");
        }
    }

    #[test]
    fn test_evening_uses_day_base_with_night_band() {
        let mut rng = StdRng::seed_from_u64(13);
        for _ in 0..200 {
            let t = ambient_temperature(20, &mut rng);
            assert!((24.0..=25.5).contains(&t), "evening temperature {t}");
        }
    }

    #[test]
    fn test_fill_ambient_normal_ranges() {
        let now = Utc.with_ymd_and_hms(2025, 5, 22, 12, 0, 0).unwrap();
        let state = SystemState::new(now);
        let mut rng = StdRng::seed_from_u64(14);

        for _ in 0..100 {
            let mut snapshot = Snapshot::baseline(&state, now);
            fill_ambient(&mut snapshot, 12, &mut rng);
            assert!(CO_NORMAL_PPM.contains(&snapshot.sensors.co_level.ppm));
            assert!(FLAME_NORMAL.contains(&snapshot.sensors.flame.intensity));
            assert!(!snapshot.sensors.flame.detected);
            assert_eq!(snapshot.sensors.water_flow.rate_lpm, 0.0);
            assert!(SIGNAL_NORMAL_DBM.contains(&snapshot.status.connectivity.signal_strength_dbm));
        }
    }

    #[test]
    fn test_water_flow_idle_and_test() {
        let now = Utc.with_ymd_and_hms(2025, 5, 22, 12, 0, 0).unwrap();
        let mut state = SystemState::new(now);
        let mut rng = StdRng::seed_from_u64(15);

        let mut snapshot = Snapshot::baseline(&state, now);
        manage_water_flow(&mut state, &mut snapshot, &mut rng);
        assert_eq!(snapshot.sensors.water_flow.rate_lpm, 0.0);
        assert_eq!(state.test_water_used, 0.0);

        state.test_in_progress = true;
        let mut snapshot = Snapshot::baseline(&state, now);
        manage_water_flow(&mut state, &mut snapshot, &mut rng);
        assert!(WATER_FLOW_ACTIVE_LPM.contains(&snapshot.sensors.water_flow.rate_lpm));
        assert!(state.test_water_used > 10.0 / 60.0 - 1e-9);
        assert!(state.test_water_used < 20.0 / 60.0 + 1e-9);
        assert_eq!(state.water_total_liters, 0.0);
    }
}
