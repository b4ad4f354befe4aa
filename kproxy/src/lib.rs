mod config;
mod engine;
mod error;

pub use config::EngineConfig;
pub use engine::{Engine, ProxyState};
pub use error::{Error, Result};
