// Library crate shared by the binary and the integration tests.

pub mod analysis;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod routes;
pub mod server;
pub mod settings;
pub mod state;
pub mod storage;
