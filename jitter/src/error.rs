use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    #[error("buffer has been flushed, no further adds accepted")]
    ErrFlushed,
    #[error("unknown info item")]
    ErrUnknownInfoItem,
    #[error("value {0} out of range for {1}")]
    ErrValueOutOfRange(i64, &'static str),
}
