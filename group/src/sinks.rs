//! Wav sinks fed by mixer output: group mono, per-contributor mono and a
//! multichannel file with one channel per contributor.

use std::io::{Seek, Write};

use crate::error::Result;
use crate::mixer::MixOutput;
use crate::wav::WavWriter;

pub struct GroupSinks<W: Write + Seek> {
    pub group_wav: Option<WavWriter<W>>,
    /// (chan, writer) in contributor attach order.
    pub contributor_wavs: Vec<(u32, WavWriter<W>)>,
    pub multichannel_wav: Option<WavWriter<W>>,
}

impl<W: Write + Seek> Default for GroupSinks<W> {
    fn default() -> Self {
        GroupSinks {
            group_wav: None,
            contributor_wavs: Vec::new(),
            multichannel_wav: None,
        }
    }
}

impl<W: Write + Seek> GroupSinks<W> {
    /// Writes one tick of mixer output to every configured sink.
    pub fn write(&mut self, out: &MixOutput) -> Result<()> {
        if let Some(w) = &mut self.group_wav {
            w.write_samples(&out.mixed)?;
        }
        for (chan, w) in &mut self.contributor_wavs {
            if let Some((_, frame)) = out.per_contributor.iter().find(|(c, _)| c == chan) {
                w.write_samples(frame)?;
            }
        }
        if let Some(w) = &mut self.multichannel_wav {
            // interleave one sample per contributor per frame position
            let channels = out.per_contributor.len();
            if channels > 0 {
                let frame_len = out.per_contributor[0].1.len();
                let mut interleaved = Vec::with_capacity(frame_len * channels);
                for i in 0..frame_len {
                    for (_, frame) in &out.per_contributor {
                        interleaved.push(frame.get(i).copied().unwrap_or(0));
                    }
                }
                w.write_samples(&interleaved)?;
            }
        }
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        if let Some(w) = &mut self.group_wav {
            w.close()?;
        }
        for (_, w) in &mut self.contributor_wavs {
            w.close()?;
        }
        if let Some(w) = &mut self.multichannel_wav {
            w.close()?;
        }
        Ok(())
    }
}
