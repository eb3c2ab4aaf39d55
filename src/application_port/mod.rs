mod auth_service;
mod request_gateway;

pub use auth_service::*;
pub use request_gateway::*;
