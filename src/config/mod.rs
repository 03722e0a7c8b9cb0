mod identity;
mod server;

pub use identity::{IdentityConfig, ProviderConfig};
pub use server::ServerConfig;
