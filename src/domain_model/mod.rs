mod credential;
mod request;
mod session;

pub use credential::*;
pub use request::*;
pub use session::*;
