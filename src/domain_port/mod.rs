// store

mod credential_store;

pub use credential_store::*;

// transport

mod http_transport;

pub use http_transport::*;

// notification

mod session_listener;

pub use session_listener::*;
