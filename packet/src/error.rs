use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    #[error("packet too short for IP header")]
    ErrIpHeaderSizeInsufficient,
    #[error("bad IP version {0}")]
    ErrBadIpVersion(u8),
    #[error("IP total length {total} exceeds packet length {actual}")]
    ErrPktLenMismatch { total: usize, actual: usize },
    #[error("not a UDP datagram (protocol {0})")]
    ErrNotUdp(u8),
    #[error("packet too short for UDP header")]
    ErrUdpHeaderSizeInsufficient,
    #[error("packet too short for RTP header")]
    ErrRtpHeaderSizeInsufficient,
    #[error("RTP version {0} != 2")]
    ErrRtpVersion(u8),
    #[error("RTP payload offset past end of packet")]
    ErrBadPayloadOffset,
    #[error("RTCP payload type {0}")]
    ErrRtcpPacket(u8),
    #[error("buffer too small")]
    ErrBufferTooSmall,
    #[error("RTP event payload must be 4 bytes, got {0}")]
    ErrBadEventPayload(usize),
    #[error("format options missing required field: {0}")]
    ErrMissingFormatField(&'static str),
    #[error("source and destination IP versions differ")]
    ErrMixedIpVersions,
    #[error("{0}")]
    Util(String),
}

impl From<util::Error> for Error {
    fn from(e: util::Error) -> Self {
        Error::Util(e.to_string())
    }
}
