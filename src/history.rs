use crate::scheduler::{TimerAction, TimerQueue};
use crate::snapshot::{AlarmState, CoReading, FlameReading, Mode, PumpState, TemperatureReading, WaterFlowReading};
use crate::state::CommandAuthor;
use chrono::{DateTime, Duration, Utc};
use heapless::Vec;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const HISTORY_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryEventType {
    SystemShutdown,
    SystemStartup,
    WeakSignalDetected,
    SignalRestored,
    FireControlled,
    CoLevelNormalized,
    SystemTest,
    AlarmOverride,
    AlarmReactivated,
}

/// Secondary-store collection an archival consumer files each event under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveCollection {
    FireAndTest,
    WeakSignal,
    SystemMode,
    Status,
    SensorErrors,
    Notifications,
}

impl ArchiveCollection {
    pub fn collection_name(self) -> &'static str {
        match self {
            ArchiveCollection::FireAndTest => "fire_and_test_events",
            ArchiveCollection::WeakSignal => "weak_signal_events",
            ArchiveCollection::SystemMode => "system_mode_events",
            ArchiveCollection::Status => "status_events",
            ArchiveCollection::SensorErrors => "sensor_errors",
            ArchiveCollection::Notifications => "system_notifications",
        }
    }
}

impl HistoryEventType {
    pub fn archive_collection(self) -> ArchiveCollection {
        match self {
            HistoryEventType::FireControlled | HistoryEventType::SystemTest => ArchiveCollection::FireAndTest,
            HistoryEventType::WeakSignalDetected | HistoryEventType::SignalRestored => ArchiveCollection::WeakSignal,
            HistoryEventType::SystemShutdown
            | HistoryEventType::SystemStartup
            | HistoryEventType::AlarmOverride
            | HistoryEventType::AlarmReactivated => ArchiveCollection::SystemMode,
            HistoryEventType::CoLevelNormalized => ArchiveCollection::Status,
        }
    }
}

/// Final actuator and sensor readings at the end of a fire or a self-test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuppressionReport {
    pub alarm: AlarmState,
    pub pump: PumpState,
    pub temperature: TemperatureReading,
    pub co_level: CoReading,
    pub flame: FlameReading,
    pub water_flow: WaterFlowReading,
    pub water_used_liters: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_sec: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShutdownRecord {
    pub timestamp: DateTime<Utc>,
    pub initiated_by: CommandAuthor,
    pub previous_mode: Mode,
    pub alarm_active: bool,
    pub pump_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartupRecord {
    pub timestamp: DateTime<Utc>,
    pub initiated_by: CommandAuthor,
    pub downtime_seconds: f64,
    pub new_mode: Mode,
}

/// Event payload; the variant determines the event type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HistoryData {
    SystemShutdown(ShutdownRecord),
    SystemStartup(StartupRecord),
    WeakSignalDetected {
        timestamp: DateTime<Utc>,
        signal_strength_dbm: i32,
    },
    SignalRestored {
        timestamp: DateTime<Utc>,
        previous_signal_strength: i32,
        new_signal_strength: i32,
        duration_seconds: f64,
    },
    FireControlled(SuppressionReport),
    CoLevelNormalized {
        alarm: AlarmState,
        co_level: CoReading,
    },
    SystemTest(SuppressionReport),
    AlarmOverride {
        timestamp: DateTime<Utc>,
        initiated_by: CommandAuthor,
    },
    AlarmReactivated {
        timestamp: DateTime<Utc>,
        initiated_by: CommandAuthor,
    },
}

impl HistoryData {
    pub fn event_type(&self) -> HistoryEventType {
        match self {
            HistoryData::SystemShutdown(_) => HistoryEventType::SystemShutdown,
            HistoryData::SystemStartup(_) => HistoryEventType::SystemStartup,
            HistoryData::WeakSignalDetected { .. } => HistoryEventType::WeakSignalDetected,
            HistoryData::SignalRestored { .. } => HistoryEventType::SignalRestored,
            HistoryData::FireControlled(_) => HistoryEventType::FireControlled,
            HistoryData::CoLevelNormalized { .. } => HistoryEventType::CoLevelNormalized,
            HistoryData::SystemTest(_) => HistoryEventType::SystemTest,
            HistoryData::AlarmOverride { .. } => HistoryEventType::AlarmOverride,
            HistoryData::AlarmReactivated { .. } => HistoryEventType::AlarmReactivated,
        }
    }

    /// Water used as recorded by a fire or test report.
    pub fn water_used_liters(&self) -> Option<f64> {
        match self {
            HistoryData::FireControlled(report) | HistoryData::SystemTest(report) => Some(report.water_used_liters),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEvent {
    // Identity for self-expiry; two entries with equal content stay distinct.
    #[serde(skip)]
    pub id: u64,
    pub event_type: HistoryEventType,
    pub timestamp: DateTime<Utc>,
    pub data: HistoryData,
}

/// Append-only event ledger, capped at [`HISTORY_CAPACITY`] entries, where
/// every entry also removes itself one TTL after it was logged.
#[derive(Debug)]
pub struct HistoryLog {
    entries: Vec<HistoryEvent, HISTORY_CAPACITY>,
    next_entry_id: u64,
    ttl: Duration,
    total_logged: u32,
    total_dropped: u32,
    dirty: bool,
}

impl HistoryLog {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Vec::new(),
            next_entry_id: 1,
            ttl,
            total_logged: 0,
            total_dropped: 0,
            dirty: false,
        }
    }

    pub fn log(&mut self, data: HistoryData, now: DateTime<Utc>, timers: &mut TimerQueue) -> u64 {
        let id = self.next_entry_id;
        self.next_entry_id = self.next_entry_id.wrapping_add(1);

        let event = HistoryEvent {
            id,
            event_type: data.event_type(),
            timestamp: now,
            data,
        };
        debug!("History entry {} logged: {:?}", id, event.event_type);

        if let Err(event) = self.entries.push(event) {
            // Log full, drop the oldest entry
            self.entries.remove(0);
            self.total_dropped = self.total_dropped.saturating_add(1);
            // Cannot fail: one slot was just freed
            let _ = self.entries.push(event);
        }

        self.total_logged = self.total_logged.saturating_add(1);
        self.dirty = true;

        timers.schedule(TimerAction::ExpireHistoryEntry(id), now, self.ttl);
        id
    }

    /// Remove the entry with this identity if it is still present.
    pub fn expire(&mut self, entry_id: u64) -> bool {
        match self.entries.iter().position(|e| e.id == entry_id) {
            Some(index) => {
                self.entries.remove(index);
                self.dirty = true;
                true
            }
            None => false,
        }
    }

    /// Oldest retained entry of the given type.
    pub fn find_first(&self, event_type: HistoryEventType) -> Option<&HistoryEvent> {
        self.entries.iter().find(|e| e.event_type == event_type)
    }

    pub fn entries(&self) -> &[HistoryEvent] {
        &self.entries
    }

    pub fn count_of(&self, event_type: HistoryEventType) -> usize {
        self.entries.iter().filter(|e| e.event_type == event_type).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_logged(&self) -> u32 {
        self.total_logged
    }

    pub fn total_dropped(&self) -> u32 {
        self.total_dropped
    }

    /// Flag the collection for republishing, e.g. after a failed write.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn take_dirty(&mut self) -> bool {
        core::mem::take(&mut self.dirty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 22, 9, 30, 0).unwrap()
    }

    fn override_event(now: DateTime<Utc>) -> HistoryData {
        HistoryData::AlarmOverride {
            timestamp: now,
            initiated_by: CommandAuthor::MobileApp,
        }
    }

    #[test]
    fn test_log_appends_and_schedules_expiry() {
        let mut timers = TimerQueue::new();
        let mut log = HistoryLog::new(Duration::seconds(10));

        let id = log.log(override_event(t0()), t0(), &mut timers);

        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].event_type, HistoryEventType::AlarmOverride);
        assert_eq!(timers.pending()[0].action, TimerAction::ExpireHistoryEntry(id));
        assert!(log.take_dirty());
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let mut timers = TimerQueue::new();
        let mut log = HistoryLog::new(Duration::seconds(10));

        let first = log.log(override_event(t0()), t0(), &mut timers);
        for _ in 0..HISTORY_CAPACITY + 20 {
            log.log(override_event(t0()), t0(), &mut timers);
            assert!(log.len() <= HISTORY_CAPACITY);
        }

        assert_eq!(log.len(), HISTORY_CAPACITY);
        assert_eq!(log.total_dropped(), 21);
        assert!(log.entries().iter().all(|e| e.id != first));
        // Expiring an entry that was already dropped is harmless.
        assert!(!log.expire(first));
    }

    #[test]
    fn test_expire_is_identity_based() {
        let mut timers = TimerQueue::new();
        let mut log = HistoryLog::new(Duration::seconds(10));

        let a = log.log(override_event(t0()), t0(), &mut timers);
        let b = log.log(override_event(t0()), t0(), &mut timers);

        assert!(log.expire(a));
        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].id, b);
        assert!(!log.expire(a));
    }

    #[test]
    fn test_archive_mapping() {
        assert_eq!(
            HistoryEventType::SystemTest.archive_collection().collection_name(),
            "fire_and_test_events"
        );
        assert_eq!(
            HistoryEventType::SignalRestored.archive_collection(),
            ArchiveCollection::WeakSignal
        );
        assert_eq!(
            HistoryEventType::SystemStartup.archive_collection(),
            ArchiveCollection::SystemMode
        );
    }

    #[test]
    fn test_wire_shape() {
        let mut timers = TimerQueue::new();
        let mut log = HistoryLog::new(Duration::seconds(10));
        log.log(
            HistoryData::WeakSignalDetected {
                timestamp: t0(),
                signal_strength_dbm: -90,
            },
            t0(),
            &mut timers,
        );

        let value = serde_json::to_value(log.entries()).unwrap();
        assert_eq!(value[0]["event_type"], "weak_signal_detected");
        assert_eq!(value[0]["data"]["signal_strength_dbm"], -90);
        assert!(value[0].get("id").is_none());
    }
}
