use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("didn't understand magic number {0:#010x}")]
    BadMagic(u32),
    #[error("truncated file header")]
    TruncatedFileHeader,
    #[error("truncated record (expected {expected} bytes, saw {actual})")]
    TruncatedRecord { expected: usize, actual: usize },
    #[error("pcapng section didn't start with an SHB")]
    DidntStartWithShb,
    #[error("pcapng block start/end lengths don't match ({0} != {1})")]
    BlockLengthMismatch(u32, u32),
    #[error("pcapng block length {0} too short")]
    BlockLengthTooShort(u32),
    #[error("packet references unknown interface {0}")]
    UnknownInterface(u32),
    #[error("unsupported link type {0}")]
    UnsupportedLinkType(u16),
    #[error("unknown ethertype {0:#06x}")]
    UnknownEtherType(u16),
    #[error("packet too short for link-layer header")]
    TruncatedLinkLayer,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
