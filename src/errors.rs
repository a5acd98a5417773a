use thiserror::Error;

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("provider error: {0}")] Provider(String),
    #[error("schema error: {0}")] Schema(String),
    #[error("stream error: {0}")] Stream(String),
    #[error("http error: {0}")] Http(#[from] reqwest::Error),
}

pub type OracleResult<T> = std::result::Result<T, OracleError>;
