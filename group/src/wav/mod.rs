
use std::io::{Seek, SeekFrom, Write};

use byteorder::{LittleEndian, WriteBytesExt};

use crate::error::Result;

/// Minimal RIFF/WAVE writer for 16-bit PCM. The header is written up
/// front with zero lengths and patched in `close()`, so a crash mid-run
/// leaves a recognizable (if truncated) file.
pub struct WavWriter<W: Write + Seek> {
    w: W,
    channels: u16,
    sample_rate: u32,
    data_bytes: u32,
}

impl<W: Write + Seek> WavWriter<W> {
    pub fn new(w: W, channels: u16, sample_rate: u32) -> Result<Self> {
        let mut wav = WavWriter {
            w,
            channels,
            sample_rate,
            data_bytes: 0,
        };
        wav.write_header()?;
        Ok(wav)
    }

    fn write_header(&mut self) -> Result<()> {
        let block_align = self.channels * 2;
        let byte_rate = self.sample_rate * block_align as u32;

        self.w.write_all(b"RIFF")?;
        self.w.write_u32::<LittleEndian>(36)?; // patched on close
        self.w.write_all(b"WAVE")?;
        self.w.write_all(b"fmt ")?;
        self.w.write_u32::<LittleEndian>(16)?;
        self.w.write_u16::<LittleEndian>(1)?; // PCM
        self.w.write_u16::<LittleEndian>(self.channels)?;
        self.w.write_u32::<LittleEndian>(self.sample_rate)?;
        self.w.write_u32::<LittleEndian>(byte_rate)?;
        self.w.write_u16::<LittleEndian>(block_align)?;
        self.w.write_u16::<LittleEndian>(16)?; // bits per sample
        self.w.write_all(b"data")?;
        self.w.write_u32::<LittleEndian>(0)?; // patched on close
        Ok(())
    }

    /// Interleaved samples; one frame is `channels` samples.
    pub fn write_samples(&mut self, samples: &[i16]) -> Result<()> {
        for &s in samples {
            self.w.write_i16::<LittleEndian>(s)?;
        }
        self.data_bytes += (samples.len() * 2) as u32;
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        self.w.seek(SeekFrom::Start(4))?;
        self.w.write_u32::<LittleEndian>(36 + self.data_bytes)?;
        self.w.seek(SeekFrom::Start(40))?;
        self.w.write_u32::<LittleEndian>(self.data_bytes)?;
        self.w.seek(SeekFrom::End(0))?;
        self.w.flush()?;
        Ok(())
    }
}
