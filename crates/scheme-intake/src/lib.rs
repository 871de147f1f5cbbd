pub mod config;
pub mod error;
pub mod intake;
pub mod storage;
pub mod telemetry;
