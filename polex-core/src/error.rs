use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("registration error: {0}")]
    Registration(String),
    #[error("syntax error at byte {position}: {message}")]
    Syntax { position: usize, message: String },
    #[error("type error: {0}")]
    Type(String),
    #[error("literal error: {0}")]
    Literal(String),
    #[error("runtime error: {0}")]
    Runtime(String),
}
