//! # Fire Detection and Suppression Simulator
//!
//! Simulates a networked fire detection and suppression appliance that
//! publishes live sensor readings, actuator states and operating mode to a
//! shared hierarchical JSON store once per second, and reacts to command
//! flags written into that store by a mobile client.
//!
//! ## Features
//!
//! - **Synthetic sensors**: Diurnal temperature, CO, flame and water-flow readings
//! - **Emergency scenarios**: Timed fire, CO-rise and weak-signal episodes with strict priority
//! - **Manual self-test**: Fixed-length test sequence with cooldown and report
//! - **Remote commands**: Edge-triggered shutdown/startup and alarm override
//! - **Notifications and history**: Self-expiring collections republished on change
//! - **Deferred tasks**: Deterministic timer queue driven by an injectable clock
//! - **Store protocol**: Line-delimited JSON get/set/update/subscribe over TCP
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use firesim::{ManualClock, MemoryStore, SimulatorAgent, SimulatorConfig};
//!
//! let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 5, 22, 12, 0, 0).unwrap());
//! let config = SimulatorConfig { seed: Some(7), ..Default::default() };
//! let mut agent = SimulatorAgent::new(config, MemoryStore::new(), clock).unwrap();
//!
//! let snapshot = agent.update().unwrap();
//! assert_eq!(snapshot.status.mode.as_str(), "normal");
//! ```
//!
//! ## Architecture
//!
//! - [`agent`] - Tick orchestrator and public API
//! - [`commands`] - Command flag parsing, shutdown/startup and alarm override
//! - [`emergency`] - Fire, CO-rise and weak-signal state machines
//! - [`test_sequence`] - Manual self-test controller
//! - [`fault_injection`] - Periodic sensor error injection
//! - [`synthesizer`] - Baseline readings and water-flow accounting
//! - [`notifications`] / [`history`] - Self-expiring published collections
//! - [`scheduler`] - Deferred task queue
//! - [`store`] / [`protocol`] / [`server`] - Store abstraction and its TCP front end

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

pub mod agent;
pub mod clock;
pub mod commands;
pub mod config;
pub mod context;
pub mod emergency;
pub mod fault_injection;
pub mod history;
pub mod notifications;
pub mod protocol;
pub mod scheduler;
pub mod server;
pub mod snapshot;
pub mod state;
pub mod store;
pub mod synthesizer;
pub mod test_sequence;

// Re-export main public types for convenience
pub use agent::{AgentError, SimulatorAgent};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SimulatorConfig;
pub use snapshot::{Mode, Snapshot};
pub use store::{MemoryStore, SharedStore, Store, StoreError};
