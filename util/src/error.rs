use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("buffer too small")]
    ErrBufferTooSmall,
    #[error("buffer is full")]
    ErrBufferFull,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn new(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        matches!(
            (self, other),
            (Error::ErrBufferTooSmall, Error::ErrBufferTooSmall)
                | (Error::ErrBufferFull, Error::ErrBufferFull)
        ) || matches!((self, other), (Error::Other(a), Error::Other(b)) if a == b)
    }
}
