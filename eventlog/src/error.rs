use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("event log file open failed: {0}")]
    LogFileOpen(std::io::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("logger thread is gone")]
    LoggerGone,
}
