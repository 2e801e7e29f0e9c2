//! User-facing alerts with a fixed time to live.
//!
//! Every notification is removed a fixed duration after creation no matter
//! what happens in between; the full map is republished after each change.

use crate::history::ArchiveCollection;
use crate::scheduler::{TimerAction, TimerQueue};
use crate::state::{CommandAuthor, SensorKind};
use arrayvec::ArrayString;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use static_assertions::const_assert;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

pub const NOTIFICATION_ID_PREFIX: &str = "notification_";
const NOTIFICATION_ID_SUFFIX_LEN: usize = 8;
const NOTIFICATION_ID_CAPACITY: usize = 24;

const_assert!(NOTIFICATION_ID_PREFIX.len() + NOTIFICATION_ID_SUFFIX_LEN <= NOTIFICATION_ID_CAPACITY);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(ArrayString<NOTIFICATION_ID_CAPACITY>);

impl NotificationId {
    /// `notification_` followed by the first eight hex digits of a random UUID.
    pub fn generate(rng: &mut StdRng) -> Self {
        let uuid = uuid::Builder::from_random_bytes(rng.gen()).into_uuid();
        let mut buf = uuid::Uuid::encode_buffer();
        let hex = uuid.simple().encode_lower(&mut buf);

        let mut id = ArrayString::new();
        id.push_str(NOTIFICATION_ID_PREFIX);
        id.push_str(&hex[..NOTIFICATION_ID_SUFFIX_LEN]);
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    FireAlert,
    FireControlled,
    CoAlert,
    CoLevelNormalized,
    SystemTest,
    SystemShutdown,
    SystemStartup,
    SensorError,
    WeakSignal,
    SignalRestored,
    AlarmOverride,
    AlarmReactivated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

impl NotificationKind {
    pub fn priority(self) -> Priority {
        match self {
            NotificationKind::FireAlert => Priority::High,
            NotificationKind::CoAlert => Priority::Critical,
            NotificationKind::SystemTest | NotificationKind::SignalRestored => Priority::Low,
            NotificationKind::FireControlled
            | NotificationKind::CoLevelNormalized
            | NotificationKind::SystemShutdown
            | NotificationKind::SystemStartup
            | NotificationKind::SensorError
            | NotificationKind::WeakSignal
            | NotificationKind::AlarmOverride
            | NotificationKind::AlarmReactivated => Priority::Normal,
        }
    }

    /// Sensor faults are archived with their own record shape; everything
    /// else lands in the shared notification collection.
    pub fn archive_collection(self) -> ArchiveCollection {
        match self {
            NotificationKind::SensorError => ArchiveCollection::SensorErrors,
            NotificationKind::FireAlert
            | NotificationKind::FireControlled
            | NotificationKind::CoAlert
            | NotificationKind::CoLevelNormalized
            | NotificationKind::SystemTest
            | NotificationKind::SystemShutdown
            | NotificationKind::SystemStartup
            | NotificationKind::WeakSignal
            | NotificationKind::SignalRestored
            | NotificationKind::AlarmOverride
            | NotificationKind::AlarmReactivated => ArchiveCollection::Notifications,
        }
    }
}

/// Extra fields merged into the notification body, one shape per kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NotificationData {
    FireControlled { duration_sec: u32, water_used_liters: f64 },
    WaterUsed { water_used_liters: f64 },
    FlameIntensity { flame_intensity: u32 },
    CoLevel { co_ppm: u32 },
    SignalStrength { signal_strength_dbm: i32 },
    RelatedSensor { related_sensor: SensorKind },
    InitiatedBy { initiated_by: CommandAuthor },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
    #[serde(flatten, default, skip_serializing_if = "Option::is_none")]
    pub data: Option<NotificationData>,
}

/// Body published at `notifications`.
#[derive(Debug, Serialize)]
pub struct NotificationsPayload<'a> {
    pub active: bool,
    pub last_updated: DateTime<Utc>,
    pub queue: &'a BTreeMap<NotificationId, Notification>,
}

#[derive(Debug)]
pub struct NotificationManager {
    queue: BTreeMap<NotificationId, Notification>,
    ttl: Duration,
    last_updated: Option<DateTime<Utc>>,
    total_created: u32,
    dirty: bool,
}

impl NotificationManager {
    pub fn new(ttl: Duration) -> Self {
        Self {
            queue: BTreeMap::new(),
            ttl,
            last_updated: None,
            total_created: 0,
            dirty: false,
        }
    }

    /// Store a new notification and schedule its removal one TTL later.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        &mut self,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        data: Option<NotificationData>,
        now: DateTime<Utc>,
        rng: &mut StdRng,
        timers: &mut TimerQueue,
    ) -> NotificationId {
        let mut id = NotificationId::generate(rng);
        while self.queue.contains_key(&id) {
            id = NotificationId::generate(rng);
        }

        let notification = Notification {
            kind,
            title: title.into(),
            message: message.into(),
            priority: kind.priority(),
            timestamp: now,
            read: false,
            data,
        };

        debug!("Notification {} created: {:?}", id, kind);
        self.queue.insert(id, notification);
        self.total_created = self.total_created.saturating_add(1);
        self.touch(now);

        timers.schedule(TimerAction::ExpireNotification(id), now, self.ttl);
        id
    }

    /// Remove an expired notification. Returns false when it was already gone.
    pub fn expire(&mut self, id: &NotificationId, now: DateTime<Utc>) -> bool {
        if self.queue.remove(id).is_some() {
            debug!("Notification {} expired", id);
            self.touch(now);
            true
        } else {
            false
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.last_updated = Some(now);
        self.dirty = true;
    }

    pub fn payload(&self, now: DateTime<Utc>) -> NotificationsPayload<'_> {
        NotificationsPayload {
            active: !self.queue.is_empty(),
            last_updated: self.last_updated.unwrap_or(now),
            queue: &self.queue,
        }
    }

    /// Flag the collection for republishing, e.g. after a failed write.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Whether the map changed since the last call.
    pub fn take_dirty(&mut self) -> bool {
        core::mem::take(&mut self.dirty)
    }

    pub fn get(&self, id: &NotificationId) -> Option<&Notification> {
        self.queue.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NotificationId, &Notification)> {
        self.queue.iter()
    }

    pub fn count_of(&self, kind: NotificationKind) -> usize {
        self.queue.values().filter(|n| n.kind == kind).count()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn total_created(&self) -> u32 {
        self.total_created
    }
}
