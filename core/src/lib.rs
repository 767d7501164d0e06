pub mod clock;
pub mod config;
pub mod error;
pub mod scheduler;

pub use config::SchedulerConfig;
pub use error::TimerError;
pub use scheduler::registry;
pub use scheduler::{PostponeOptions, Scheduler, SetOptions, TimeSpec, TimerData, TimerInfo};
