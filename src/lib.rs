pub mod api_client;
pub mod configuration;
pub mod domain;
pub mod load;
pub mod mock_controller;
pub mod runner;
pub mod scenario;
pub mod state_model;
pub mod telemetry;
pub mod verifier;
