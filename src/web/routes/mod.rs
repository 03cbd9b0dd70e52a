pub mod monitoring_routes;
pub mod speed_test_routes;
pub mod target_routes;
