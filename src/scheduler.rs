use crate::notifications::NotificationId;
use crate::state::SensorKind;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Deferred side effect, executed by the agent once its due time passes.
///
/// None of these can be cancelled: a shutdown occurring after scheduling
/// does not stop pending expiries or recoveries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TimerAction {
    ExpireNotification(NotificationId),
    ExpireHistoryEntry(u64),
    RecoverSensor(SensorKind),
    ReleaseTestCooldown,
    FireControlledNotice { duration_sec: u32, water_used_liters: f64 },
    TestCompletedNotice { water_used_liters: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeferredTask {
    pub action: TimerAction,
    pub due: DateTime<Utc>,
    pub scheduled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SchedulerStats {
    pub total_scheduled: u32,
    pub total_fired: u32,
    pub currently_scheduled: u32,
}

/// Due-time ordered queue of deferred tasks, drained by the tick loop.
#[derive(Debug, Default)]
pub struct TimerQueue {
    tasks: Vec<DeferredTask>,
    stats: SchedulerStats,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `action` to run `delay` after `now`.
    pub fn schedule(&mut self, action: TimerAction, now: DateTime<Utc>, delay: Duration) {
        let due = now + delay;
        let task = DeferredTask {
            action,
            due,
            scheduled_at: now,
        };

        // Tasks with equal due times keep their scheduling order
        let insert_position = self
            .tasks
            .iter()
            .position(|t| t.due > due)
            .unwrap_or(self.tasks.len());
        self.tasks.insert(insert_position, task);

        self.stats.total_scheduled = self.stats.total_scheduled.saturating_add(1);
        self.stats.currently_scheduled = self.tasks.len() as u32;
    }

    /// Remove and return every task whose due time is at or before `now`,
    /// in due order.
    pub fn drain_due(&mut self, now: DateTime<Utc>) -> Vec<TimerAction> {
        let ready_count = self
            .tasks
            .iter()
            .position(|t| t.due > now)
            .unwrap_or(self.tasks.len());

        let ready: Vec<TimerAction> = self.tasks.drain(..ready_count).map(|t| t.action).collect();

        self.stats.total_fired = self.stats.total_fired.saturating_add(ready.len() as u32);
        self.stats.currently_scheduled = self.tasks.len() as u32;

        ready
    }

    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.tasks.first().map(|t| t.due)
    }

    pub fn pending(&self) -> &[DeferredTask] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get_stats(&self) -> &SchedulerStats {
        &self.stats
    }
}
