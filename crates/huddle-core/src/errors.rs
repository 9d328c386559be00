use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallError {
    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("microphone unavailable: {0}")]
    Microphone(String),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("configuration error: {0}")]
    Config(String),
}
