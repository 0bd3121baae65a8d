#[cfg(test)]
mod codec_test;

use serde::{Deserialize, Serialize};
use util::time::MilliSecs;

/// Codec families the engine can classify. Actual encode/decode is
/// external; only the estimation step below looks at payload bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodecType {
    G711U,
    G711A,
    AmrNb,
    AmrWb,
    Evs,
    /// Uncompressed 16-bit linear PCM.
    L16,
}

impl CodecType {
    /// Default sample rate for the family.
    pub fn sample_rate(self) -> u32 {
        match self {
            CodecType::G711U | CodecType::G711A | CodecType::AmrNb => 8000,
            CodecType::AmrWb | CodecType::Evs | CodecType::L16 => 16000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecEstimate {
    pub codec: CodecType,
    pub bitrate: u32,
    pub ptime: MilliSecs,
    /// Which detection stage matched, for the creation log line.
    pub category: u8,
}

fn est(codec: CodecType, bitrate: u32, category: u8) -> CodecEstimate {
    CodecEstimate {
        codec,
        bitrate,
        ptime: MilliSecs(20),
        category,
    }
}

/// Best-guess codec classification from the first payload bytes, the
/// payload size and the advertised payload type. Deliberately permissive:
/// when several codecs share a payload size the best bitrate match wins
/// and the real decoder re-detects from the bitstream.
pub fn estimate_codec_type(payload: &[u8], payload_type: u8) -> Option<CodecEstimate> {
    // static payload types
    if payload_type == 0 {
        return Some(est(CodecType::G711U, 64000, 0));
    }
    if payload_type == 8 {
        return Some(est(CodecType::G711A, 64000, 0));
    }

    if payload.len() < 2 {
        return None;
    }
    let b0 = payload[0];
    let b1 = payload[1];
    let len = payload.len();

    // AMR bandwidth-efficient: CMR byte patterns with the ToC follow bit
    // clear, or the 0xf4 CMR with a SID frame type
    if ((b0 == 0xf1 || b0 == 0x21) && b1 & 0x80 == 0) || (b0 == 0xf4 && b1 & 0xc0 != 0) {
        match len {
            6 | 7 => {
                return if b1 & 0x80 == 0 {
                    Some(est(CodecType::AmrNb, 12200, 1)) // AMR-NB SID
                } else {
                    Some(est(CodecType::AmrWb, 12650, 1)) // AMR-WB SID
                };
            }
            33 => return Some(est(CodecType::AmrWb, 12650, 1)),
            37 => return Some(est(CodecType::AmrWb, 14250, 1)),
            47 => return Some(est(CodecType::AmrWb, 18250, 1)),
            51 => return Some(est(CodecType::AmrWb, 19850, 1)),
            59 => return Some(est(CodecType::AmrWb, 23050, 1)),
            61 | 62 => return Some(est(CodecType::AmrWb, 23850, 1)),
            31 | 32 => return Some(est(CodecType::AmrNb, 12200, 1)),
            _ => {} // fall through to the EVS table
        }
    }

    // AMR octet-aligned: CMR 0xf0 with the ToC follow bit clear
    if b0 == 0xf0 && b1 & 0x80 == 0 {
        if len == 33 {
            return Some(est(CodecType::AmrNb, 12200, 2));
        }
        if len == 62 {
            return Some(est(CodecType::AmrWb, 23850, 2));
        }
    }

    // most likely EVS; sizes 61/62 disambiguate against AMR-WB 23850
    match len {
        6 | 7 | 8 | 33 | 34 | 35 => Some(est(CodecType::Evs, 13200, 4)),
        41 | 42 => Some(est(CodecType::Evs, 16400, 4)),
        61 | 62 => {
            if b0 & 0xf8 == 0xf0 {
                Some(est(CodecType::AmrWb, 23850, 4))
            } else {
                Some(est(CodecType::Evs, 24400, 4))
            }
        }
        63 => Some(est(CodecType::Evs, 24400, 4)),
        31 | 32 => Some(est(CodecType::AmrNb, 12200, 4)),
        186 | 187 => Some(est(CodecType::Evs, 24400, 4)),
        _ => None,
    }
}
