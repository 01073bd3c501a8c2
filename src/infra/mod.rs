pub mod error;
pub mod http;
pub mod schema;
pub mod store;
pub mod telemetry;
