pub mod actor;
pub mod scheduler;
