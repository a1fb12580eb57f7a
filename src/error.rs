use std::fmt;

#[derive(Debug)]
pub enum PoolError {
    Io(std::io::Error),
    Token(serde_json::Error),
    Store(String),
    Processing(String),
    Config(String),
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::Io(e) => write!(f, "IO error: {}", e),
            PoolError::Token(e) => write!(f, "Token error: {}", e),
            PoolError::Store(e) => write!(f, "Store error: {}", e),
            PoolError::Processing(e) => write!(f, "Processing error: {}", e),
            PoolError::Config(e) => write!(f, "Config error: {}", e),
        }
    }
}

impl std::error::Error for PoolError {}

impl From<std::io::Error> for PoolError {
    fn from(err: std::io::Error) -> Self {
        PoolError::Io(err)
    }
}

impl From<serde_json::Error> for PoolError {
    fn from(err: serde_json::Error) -> Self {
        PoolError::Token(err)
    }
}

impl From<String> for PoolError {
    fn from(err: String) -> Self {
        PoolError::Store(err)
    }
}

impl From<&str> for PoolError {
    fn from(err: &str) -> Self {
        PoolError::Store(err.to_string())
    }
}
