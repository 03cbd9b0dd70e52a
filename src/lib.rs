pub mod db;
pub mod monitoring;
pub mod server;
pub mod web;
