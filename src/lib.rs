pub mod agent;
pub mod config;

pub use agent::{Agent, Confirmation};
pub use config::{AgentConfig, ClaimsConfig, StorageConfig};
