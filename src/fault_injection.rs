use crate::context::TickContext;
use crate::notifications::{NotificationData, NotificationKind};
use crate::scheduler::TimerAction;
use crate::snapshot::Snapshot;
use crate::state::{elapsed_secs, SensorKind, SensorStatus, SystemState};
use chrono::Duration;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// One injected sensor fault per day
const SENSOR_ERROR_INTERVAL_S: u32 = 86_400;
const SENSOR_RECOVERY_DELAY_S: u32 = 30;

/// Configuration for sensor fault injection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorErrorConfig {
    pub enabled: bool,
    pub interval_s: u32,
    pub recovery_delay_s: u32,
}

impl Default for SensorErrorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_s: SENSOR_ERROR_INTERVAL_S,
            recovery_delay_s: SENSOR_RECOVERY_DELAY_S,
        }
    }
}

/// Sensor fault injection statistics
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SensorErrorStats {
    pub total_injected: u32,
    pub total_recovered: u32,
}

/// Periodically marks one random sensor as failed and recovers it shortly
/// afterwards.
#[derive(Debug, Default)]
pub struct SensorErrorInjector {
    config: SensorErrorConfig,
    stats: SensorErrorStats,
}

impl SensorErrorInjector {
    pub fn new(config: SensorErrorConfig) -> Self {
        Self {
            config,
            stats: SensorErrorStats::default(),
        }
    }

    /// Inject a fault when the interval since the last one has elapsed.
    /// Returns the sensor that failed this tick, if any.
    pub fn update(&mut self, ctx: &mut TickContext<'_>, snapshot: &mut Snapshot) -> Option<SensorKind> {
        if !self.config.enabled {
            return None;
        }
        if elapsed_secs(ctx.state.last_sensor_error_time, ctx.now) < f64::from(self.config.interval_s) {
            return None;
        }

        let sensor = *SensorKind::ALL.choose(ctx.rng)?;
        ctx.state.last_sensor_error_time = ctx.now;
        ctx.state.sensor_status.set(sensor, SensorStatus::Error);
        snapshot.set_sensor_status(sensor, SensorStatus::Error);
        self.stats.total_injected = self.stats.total_injected.saturating_add(1);
        warn!("⚠️ Sensor fault injected on {}", sensor.key());

        ctx.notify(
            NotificationKind::SensorError,
            "⚠️ Sensor error",
            format!(
                "The {} sensor reported an error. Readings may be unreliable.",
                sensor.display_name()
            ),
            Some(NotificationData::RelatedSensor { related_sensor: sensor }),
        );
        ctx.schedule(
            TimerAction::RecoverSensor(sensor),
            Duration::seconds(i64::from(self.config.recovery_delay_s)),
        );

        Some(sensor)
    }

    /// Deferred recovery of a previously failed sensor.
    pub fn recover(&mut self, state: &mut SystemState, sensor: SensorKind) {
        state.sensor_status.set(sensor, SensorStatus::Ok);
        self.stats.total_recovered = self.stats.total_recovered.saturating_add(1);
        info!("✅ Sensor {} recovered", sensor.key());
    }

    pub fn get_config(&self) -> &SensorErrorConfig {
        &self.config
    }

    pub fn get_stats(&self) -> &SensorErrorStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HistoryLog;
    use crate::notifications::NotificationManager;
    use crate::scheduler::TimerQueue;
    use chrono::{DateTime, TimeZone, Utc};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

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
            let now = Utc.with_ymd_and_hms(2025, 5, 22, 3, 0, 0).unwrap();
            Self {
                now,
                state: SystemState::new(now),
                rng: StdRng::seed_from_u64(21),
                notifications: NotificationManager::new(Duration::seconds(10)),
                history: HistoryLog::new(Duration::seconds(10)),
                timers: TimerQueue::new(),
            }
        }

        fn tick(&mut self, injector: &mut SensorErrorInjector) -> (Option<SensorKind>, Snapshot) {
            let mut snapshot = Snapshot::baseline(&self.state, self.now);
            let mut ctx = TickContext {
                now: self.now,
                state: &mut self.state,
                rng: &mut self.rng,
                notifications: &mut self.notifications,
                history: &mut self.history,
                timers: &mut self.timers,
            };
            let injected = injector.update(&mut ctx, &mut snapshot);
            (injected, snapshot)
        }
    }

    #[test]
    fn test_no_injection_before_interval() {
        let mut injector = SensorErrorInjector::default();
        let mut h = Harness::new();
        h.now += Duration::seconds(86_399);

        let (injected, _) = h.tick(&mut injector);

        assert!(injected.is_none());
        assert_eq!(injector.get_stats().total_injected, 0);
    }

    #[test]
    fn test_injection_and_recovery() {
        let mut injector = SensorErrorInjector::default();
        let mut h = Harness::new();
        h.now += Duration::seconds(86_400);

        let (injected, snapshot) = h.tick(&mut injector);
        let sensor = injected.unwrap();

        assert_eq!(snapshot.sensor_status(sensor), SensorStatus::Error);
        assert_eq!(h.state.sensor_status.get(sensor), SensorStatus::Error);
        assert_eq!(h.notifications.count_of(NotificationKind::SensorError), 1);
        let recovery = h
            .timers
            .pending()
            .iter()
            .find(|t| t.action == TimerAction::RecoverSensor(sensor))
            .unwrap();
        assert_eq!(recovery.due, h.now + Duration::seconds(30));

        // The error persists into later snapshots until recovery runs.
        let (again, snapshot) = h.tick(&mut injector);
        assert!(again.is_none());
        assert_eq!(snapshot.sensor_status(sensor), SensorStatus::Error);

        injector.recover(&mut h.state, sensor);
        assert_eq!(h.state.sensor_status.get(sensor), SensorStatus::Ok);
        assert_eq!(injector.get_stats().total_recovered, 1);
    }

    #[test]
    fn test_disabled_injector() {
        let mut injector = SensorErrorInjector::new(SensorErrorConfig {
            enabled: false,
            ..Default::default()
        });
        let mut h = Harness::new();
        h.now += Duration::days(3);

        let (injected, _) = h.tick(&mut injector);
        assert!(injected.is_none());
    }
}
