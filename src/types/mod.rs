mod models;
mod schedule;
mod username;

pub use models::*;
pub use schedule::{CronSpec, Schedule};
pub use username::{NormalizedEmail, NormalizedUsername};
