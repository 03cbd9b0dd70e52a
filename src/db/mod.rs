pub mod memory;
pub mod models;
pub mod postgres;
pub mod repositories;
