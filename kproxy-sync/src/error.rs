use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{name}: max interval ({max:?}) must be >= min interval ({min:?})")]
    Config {
        name: String,
        min: Duration,
        max: Duration,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
