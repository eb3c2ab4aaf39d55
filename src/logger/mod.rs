//! Bootstrap logging to stderr, then narrow it once settings are loaded.

mod logger;
pub use logger::*;

pub use tracing::{debug, error, info, trace, warn};
