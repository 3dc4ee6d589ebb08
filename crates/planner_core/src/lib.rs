pub mod agenda;
pub mod clock;
pub mod error;
pub mod notifications;
pub mod recurrence;
pub mod reminder;
pub mod service;
pub mod storage;
pub mod task;

pub use crate::service::{PlannerService, PlannerServiceBuilder};
