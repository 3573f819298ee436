pub mod imaging;
pub mod kv;
pub mod paths;
pub mod validation;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
