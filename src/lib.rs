// Registry Gateway Library

pub mod auth;
pub mod config;
pub mod core;
pub mod error;
pub mod proxy;
pub mod routing;
pub mod webhook;

// Re-export commonly used types
pub use config::GatewayConfig;
pub use core::{
    gateway::{ApiGateway, Gateway},
    request::GatewayRequest,
    response::GatewayResponse,
};
pub use error::{ConfigError, GatewayError};
pub use routing::{RouteRule, RouteTable, Routes};
