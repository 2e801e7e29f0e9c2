use crate::context::TickContext;
use crate::history::{HistoryData, HistoryEventType, SuppressionReport};
use crate::notifications::{NotificationData, NotificationKind};
use crate::scheduler::TimerAction;
use crate::snapshot::{Mode, Snapshot};
use crate::state::{elapsed_secs, round1, CommandKind, LastCommand, SystemState};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

const TEST_DURATION_S: u32 = 20;
const TEST_COOLDOWN_S: u32 = 5;
const FOLLOWUP_NOTICE_DELAY_S: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestSequenceConfig {
    pub duration_s: u32,
    pub cooldown_s: u32,
    pub followup_notice_delay_s: u32,
}

impl Default for TestSequenceConfig {
    fn default() -> Self {
        Self {
            duration_s: TEST_DURATION_S,
            cooldown_s: TEST_COOLDOWN_S,
            followup_notice_delay_s: FOLLOWUP_NOTICE_DELAY_S,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestPhase {
    Started,
    Running,
    Completed,
}

/// Whether a manual test request can be honoured right now.
pub fn can_start_test(state: &SystemState) -> bool {
    !state.test_in_progress && !state.test_cooldown && !state.is_shutdown
}

/// Arm a manual self-test. Counters and the test water meter start from zero.
pub fn begin_test(state: &mut SystemState, now: DateTime<Utc>) {
    state.test_in_progress = true;
    state.test_start_time = Some(now);
    state.test_water_used = 0.0;
    state.reset_actuator_counters();
    state.last_command = LastCommand::from_mobile_app(CommandKind::ManualTest, now);
    info!("🧪 Manual test started");
}

/// Fixed-length self-test: both actuators on for the test duration, then a
/// report, a cooldown, and a delayed completion notice.
#[derive(Debug, Default)]
pub struct TestSequencer {
    config: TestSequenceConfig,
}

impl TestSequencer {
    pub fn new(config: TestSequenceConfig) -> Self {
        Self { config }
    }

    pub fn get_config(&self) -> &TestSequenceConfig {
        &self.config
    }

    pub fn update(&self, ctx: &mut TickContext<'_>, snapshot: &mut Snapshot) -> Option<TestPhase> {
        if !ctx.state.test_in_progress {
            return None;
        }
        let start = ctx.state.test_start_time?;
        let elapsed = elapsed_secs(start, ctx.now);

        if elapsed >= f64::from(self.config.duration_s) {
            self.complete(ctx, snapshot);
            return Some(TestPhase::Completed);
        }

        let phase = if elapsed < 1.0 {
            ctx.notify(
                NotificationKind::SystemTest,
                "🧪 System test started",
                format!(
                    "Running a {}-second self-test of the alarm and pump.",
                    self.config.duration_s
                ),
                None,
            );
            TestPhase::Started
        } else {
            TestPhase::Running
        };

        snapshot.set_actuators(true, true);
        snapshot.status.mode = Mode::Test;
        snapshot.commands.trigger_test = true;
        Some(phase)
    }

    fn complete(&self, ctx: &mut TickContext<'_>, snapshot: &mut Snapshot) {
        snapshot.set_actuators(true, true);
        snapshot.status.mode = Mode::Test;

        let water_used_liters = round1(ctx.state.test_water_used);
        let report = SuppressionReport {
            alarm: snapshot.actuators.alarm,
            pump: snapshot.actuators.pump,
            temperature: snapshot.sensors.temperature.clone(),
            co_level: snapshot.sensors.co_level.clone(),
            flame: snapshot.sensors.flame.clone(),
            water_flow: snapshot.sensors.water_flow.clone(),
            water_used_liters,
            duration_sec: None,
        };

        let state = &mut *ctx.state;
        state.test_in_progress = false;
        state.test_start_time = None;
        state.test_cooldown = true;
        state.reset_actuator_counters();
        snapshot.commands.trigger_test = false;

        ctx.log_history(HistoryData::SystemTest(report));
        ctx.schedule(
            TimerAction::TestCompletedNotice { water_used_liters },
            Duration::seconds(i64::from(self.config.followup_notice_delay_s)),
        );
        ctx.state.test_water_used = 0.0;
        ctx.schedule(
            TimerAction::ReleaseTestCooldown,
            Duration::seconds(i64::from(self.config.cooldown_s)),
        );

        info!("✅ Manual test completed, {} L used", water_used_liters);
    }
}

/// Deferred completion notice, reading the water figure back from the
/// oldest `system_test` history entry when one is still retained.
pub fn test_completed_notice(ctx: &mut TickContext<'_>, water_used_liters: f64) {
    let water_used_liters = ctx
        .history
        .find_first(HistoryEventType::SystemTest)
        .and_then(|event| event.data.water_used_liters())
        .unwrap_or(water_used_liters);

    ctx.notify(
        NotificationKind::SystemTest,
        "✅ System test completed",
        format!("Self-test finished successfully. Water used: {water_used_liters} liters."),
        Some(NotificationData::WaterUsed { water_used_liters }),
    );
}

pub fn release_cooldown(state: &mut SystemState) {
    state.test_cooldown = false;
}
