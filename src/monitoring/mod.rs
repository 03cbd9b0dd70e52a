pub mod config_service;
pub mod error;
pub mod events;
pub mod scheduler;
