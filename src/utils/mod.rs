pub mod error;

pub use error::{ConfigError, StartError, StopError};
