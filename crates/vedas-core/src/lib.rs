pub mod config;
pub mod error;
pub mod identity;
pub mod types;

pub use config::VedasConfig;
pub use error::{Result, VedasError};
pub use identity::UserIdentity;
pub use types::*;
