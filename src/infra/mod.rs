mod credential_store_file;
mod credential_store_memory;
mod transport_fake;

pub use credential_store_file::*;
pub use credential_store_memory::*;
pub use transport_fake::*;
