use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("group contributor table full ({0} max)")]
    ContributorsFull(usize),
    #[error("unknown contributor channel {0}")]
    UnknownContributor(u32),
    #[error("contributor channel {0} already attached")]
    DuplicateContributor(u32),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
