//! Explicit context threaded through every component for one tick.
//!
//! The agent owns all mutable state; components borrow it through a
//! `TickContext` for the duration of a single call, so each collection has
//! exactly one writer at a time.

use crate::history::{HistoryData, HistoryLog};
use crate::notifications::{NotificationData, NotificationId, NotificationKind, NotificationManager};
use crate::scheduler::{TimerAction, TimerQueue};
use crate::state::SystemState;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;

pub struct TickContext<'a> {
    pub now: DateTime<Utc>,
    pub state: &'a mut SystemState,
    pub rng: &'a mut StdRng,
    pub notifications: &'a mut NotificationManager,
    pub history: &'a mut HistoryLog,
    pub timers: &'a mut TimerQueue,
}

impl TickContext<'_> {
    pub fn notify(
        &mut self,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        data: Option<NotificationData>,
    ) -> NotificationId {
        self.notifications
            .create(kind, title, message, data, self.now, self.rng, self.timers)
    }

    pub fn log_history(&mut self, data: HistoryData) -> u64 {
        self.history.log(data, self.now, self.timers)
    }

    pub fn schedule(&mut self, action: TimerAction, delay: Duration) {
        self.timers.schedule(action, self.now, delay);
    }
}
