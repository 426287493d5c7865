pub mod capture_management;
pub mod configuration;
pub mod error_handling;
pub mod network_control;
pub mod web_interface;
