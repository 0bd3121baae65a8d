//! Two-function codec contract. Codec algorithms live outside the engine;
//! the pipeline only calls decode and encode through these traits.

use session::CodecType;

pub trait MediaCodec: Send {
    /// One RTP payload in, one frame of 16-bit samples out.
    fn decode(&mut self, payload: &[u8]) -> Vec<i16>;
    /// One frame of samples in, one RTP payload out.
    fn encode(&mut self, samples: &[i16]) -> Vec<u8>;
}

pub trait CodecFactory: Send + Sync {
    fn create(&self, codec: CodecType, bitrate: u32, sample_rate: u32) -> Box<dyn MediaCodec>;
}

/// Uncompressed 16-bit big-endian PCM, the one payload format the engine
/// handles natively. Doubles as the test codec.
pub struct L16Codec;

impl MediaCodec for L16Codec {
    fn decode(&mut self, payload: &[u8]) -> Vec<i16> {
        payload
            .chunks_exact(2)
            .map(|c| i16::from_be_bytes([c[0], c[1]]))
            .collect()
    }

    fn encode(&mut self, samples: &[i16]) -> Vec<u8> {
        let mut out = Vec::with_capacity(samples.len() * 2);
        for s in samples {
            out.extend_from_slice(&s.to_be_bytes());
        }
        out
    }
}

/// Factory that hands out [`L16Codec`] regardless of codec type. Real
/// deployments supply their own factory backed by a codec library.
pub struct L16Factory;

impl CodecFactory for L16Factory {
    fn create(&self, _codec: CodecType, _bitrate: u32, _sample_rate: u32) -> Box<dyn MediaCodec> {
        Box::new(L16Codec)
    }
}
