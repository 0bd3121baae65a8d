use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("bad engine config: {0}")]
    BadConfig(&'static str),
    #[error("media service is not running")]
    NotRunning,
    #[error("media service already running")]
    AlreadyRunning,
    #[error("invalid worker thread index {0}")]
    BadThreadIndex(usize),
    #[error(transparent)]
    Session(#[from] session::Error),
    #[error(transparent)]
    Packet(#[from] packet::Error),
    #[error(transparent)]
    Jitter(#[from] jitter::Error),
    #[error(transparent)]
    Group(#[from] group::Error),
    #[error(transparent)]
    EventLog(#[from] eventlog::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
