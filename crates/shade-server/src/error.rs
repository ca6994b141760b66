//! Server error types.

use shade_proto::ParseError;

/// Errors that can occur in the server roles.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("bad greeting: {0:?}")]
    Greeting(ParseError),
}

impl From<shade_config::ConfigError> for ServerError {
    fn from(e: shade_config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
