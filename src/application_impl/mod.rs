mod auth_service_impl;
mod request_gateway_impl;

pub use auth_service_impl::*;
pub use request_gateway_impl::*;
