#[cfg(test)]
mod history_test;

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use parking_lot::Mutex;

use crate::error::Result;

/// Entries are appended in fixed chunks so memory grows in steps and can
/// be handed back wholesale on reset.
pub const CHUNK_BYTES: usize = 10_000;
pub const ENTRY_BYTES: usize = 16;
pub const CHUNK_ENTRIES: usize = CHUNK_BYTES / ENTRY_BYTES;
pub const DEFAULT_MAX_ENTRIES: usize = 300_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Added,
    Delivered,
    Repaired,
    SidReuse,
    Dropped,
    Duplicate,
}

#[derive(Debug, Clone, Copy)]
pub struct HistoryEntry {
    pub seq: u16,
    pub rtp_timestamp: u32,
    /// Microseconds on the engine clock.
    pub arrival_us: u64,
    pub disposition: Disposition,
}

/// Per-channel circular log of add/pull events.
#[derive(Debug, Default)]
pub struct ChannelHistory {
    chunks: Vec<Vec<HistoryEntry>>,
    total: usize,
    max_entries: usize,
    pub dropped_for_capacity: u64,
}

impl ChannelHistory {
    pub fn new(max_entries: usize) -> Self {
        ChannelHistory {
            chunks: Vec::new(),
            total: 0,
            max_entries,
            dropped_for_capacity: 0,
        }
    }

    pub fn push(&mut self, e: HistoryEntry) {
        if self.total >= self.max_entries {
            self.dropped_for_capacity += 1;
            return;
        }
        match self.chunks.last_mut() {
            Some(c) if c.len() < CHUNK_ENTRIES => c.push(e),
            _ => {
                let mut c = Vec::with_capacity(CHUNK_ENTRIES);
                c.push(e);
                self.chunks.push(c);
            }
        }
        self.total += 1;
    }

    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Returns the memory to the allocator.
    pub fn reset(&mut self) {
        self.chunks = Vec::new();
        self.total = 0;
        self.dropped_for_capacity = 0;
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.chunks.iter().flatten()
    }
}

/// Input-vs-output analysis for one channel.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChannelAnalysis {
    pub input: u64,
    pub output: u64,
    pub repaired: u64,
    pub sid_reuse: u64,
    pub dropped: u64,
    pub duplicates: u64,
    /// Input packets that arrived with a lower sequence number than a
    /// previously seen one.
    pub reordered: u64,
}

/// All channels' histories, shared between workers and the app thread.
#[derive(Default)]
pub struct PacketHistory {
    channels: Mutex<HashMap<u32, ChannelHistory>>,
    max_entries_per_chan: usize,
}

impl PacketHistory {
    pub fn new(max_entries_per_chan: usize) -> Self {
        PacketHistory {
            channels: Mutex::new(HashMap::new()),
            max_entries_per_chan,
        }
    }

    pub fn record(&self, chan: u32, entry: HistoryEntry) {
        let mut map = self.channels.lock();
        let max = if self.max_entries_per_chan == 0 {
            DEFAULT_MAX_ENTRIES
        } else {
            self.max_entries_per_chan
        };
        map.entry(chan)
            .or_insert_with(|| ChannelHistory::new(max))
            .push(entry);
    }

    pub fn reset_channel(&self, chan: u32) {
        if let Some(h) = self.channels.lock().get_mut(&chan) {
            h.reset();
        }
    }

    pub fn analyze(&self, chan: u32) -> ChannelAnalysis {
        let map = self.channels.lock();
        let mut a = ChannelAnalysis::default();
        let Some(h) = map.get(&chan) else {
            return a;
        };
        let mut last_in_seq: Option<u16> = None;
        for e in h.iter() {
            match e.disposition {
                Disposition::Added => {
                    a.input += 1;
                    if let Some(last) = last_in_seq {
                        if e.seq.wrapping_sub(last) > 0x8000 {
                            a.reordered += 1;
                        }
                    }
                    last_in_seq = Some(e.seq);
                }
                Disposition::Delivered => a.output += 1,
                Disposition::Repaired => {
                    a.output += 1;
                    a.repaired += 1;
                }
                Disposition::SidReuse => {
                    a.output += 1;
                    a.sid_reuse += 1;
                }
                Disposition::Dropped => a.dropped += 1,
                Disposition::Duplicate => a.duplicates += 1,
            }
        }
        a
    }

    /// Collates, sorts and writes the history log with the per-channel
    /// analysis header. Called on demand or at session delete.
    pub fn write_log<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let map = self.channels.lock();
        let mut chans: Vec<&u32> = map.keys().collect();
        chans.sort();

        let mut f = std::io::BufWriter::new(std::fs::File::create(path)?);
        writeln!(f, "** packet stats history **")?;
        for &chan in &chans {
            let h = &map[chan];
            drop_analysis_header(&mut f, *chan, h)?;

            let mut entries: Vec<&HistoryEntry> = h.iter().collect();
            entries.sort_by_key(|e| (e.arrival_us, e.seq));
            for e in entries {
                writeln!(
                    f,
                    "chan {:>4}  seq {:>5}  ts {:>10}  t {:>10} us  {:?}",
                    chan, e.seq, e.rtp_timestamp, e.arrival_us, e.disposition
                )?;
            }
        }
        f.flush()?;
        Ok(())
    }
}

fn drop_analysis_header<W: Write>(f: &mut W, chan: u32, h: &ChannelHistory) -> Result<()> {
    let mut input = 0u64;
    let mut output = 0u64;
    for e in h.iter() {
        match e.disposition {
            Disposition::Added => input += 1,
            Disposition::Delivered | Disposition::Repaired | Disposition::SidReuse => output += 1,
            _ => {}
        }
    }
    writeln!(
        f,
        "-- channel {chan}: {input} in, {output} out, {} entries ({} dropped for capacity) --",
        h.len(),
        h.dropped_for_capacity
    )?;
    Ok(())
}
