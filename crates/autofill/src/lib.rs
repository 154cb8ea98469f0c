pub mod api;
pub mod config;
pub mod context;
pub mod gateway;
pub mod jobs;
pub mod sim;
pub mod telemetry;

pub use config::Config;
pub use context::{AppContext, Visibility};
pub use gateway::{Gateway, GatewayError};
