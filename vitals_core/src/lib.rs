#![forbid(unsafe_code)]

//! Core domain model and scheduling logic for the Vitals reminder system.
//!
//! This crate provides:
//! - Domain types (readings, reminder state, medications, workouts)
//! - Persistence boundary (memory and file-backed stores)
//! - Day-weighted statistics and adaptive reminder timing
//! - Reminder eligibility gates and escalation
//! - Workout session state machine and rotation
//! - Multi-channel notification dispatch
//! - The scheduler tick and the user control surface

pub mod types;
pub mod error;
pub mod clock;
pub mod config;
pub mod logging;
pub mod store;
pub mod stats;
pub mod timing;
pub mod classify;
pub mod reminder;
pub mod eligibility;
pub mod medication;
pub mod rotation;
pub mod workout;
pub mod notification;
pub mod dispatch;
pub mod channels;
pub mod scheduler;
pub mod control;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{Config, UserProfile};
pub use store::{Database, FileStore, MemoryStore, Store};
pub use classify::BpCategory;
pub use eligibility::{Decision, Gate};
pub use notification::{Notification, NotificationAction, NotificationPayload, SentHandle};
pub use dispatch::{ChannelProvider, DispatchReport, Dispatcher, RemovalOutcome};
pub use channels::{LogChannel, OutboxChannel};
pub use scheduler::{Scheduler, TickReport};
pub use control::ControlSurface;
