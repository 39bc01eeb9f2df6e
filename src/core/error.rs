use std::io;

#[derive(thiserror::Error, Debug)]
pub enum IocError {
    #[error("network error: {0}")]
    Network(String),
    #[error("timeout")]
    Timeout,
    #[error("http error: {0}")]
    Http(String),
    #[error("fetch error: {0}")]
    Fetch(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("db error: {0}")]
    Db(String),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<reqwest::Error> for IocError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            IocError::Timeout
        } else if err.is_connect() {
            IocError::Network(err.to_string())
        } else if err.is_status() {
            IocError::Http(err.to_string())
        } else if err.is_decode() {
            IocError::Serialization(err.to_string())
        } else {
            IocError::Network(err.to_string())
        }
    }
}

impl From<rusqlite::Error> for IocError {
    fn from(err: rusqlite::Error) -> Self {
        IocError::Db(err.to_string())
    }
}

impl From<serde_json::Error> for IocError {
    fn from(err: serde_json::Error) -> Self {
        IocError::Serialization(err.to_string())
    }
}
