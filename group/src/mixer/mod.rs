
use log::debug;
use util::audio::{attenuate, mean_abs_level, mix_saturating};
use util::time::MilliSecs;

use crate::align::best_alignment;
use crate::error::{Error, Result};
use crate::ring::ContributorRing;

/// Sample value injected for timing/alignment markers when enabled.
pub const MARKER_AMPLITUDE: i16 = 12000;

/// What to do when a contributor's ring would overflow.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum OverrunPolicy {
    /// Drop one frame from the oldest buffered audio (silence-biased).
    #[default]
    DropSilenceFrame,
    /// Drop the incoming frame.
    DropNextFrame,
    /// Stop accepting input on this contributor.
    StopInput,
}

#[derive(Debug, Clone, Copy)]
pub struct ContributorConfig {
    /// Whether the contributor's audio is mixed into the group output.
    pub opt_in: bool,
    /// Flush buffered audio when the stream goes on hold.
    pub flush_on_hold: bool,
    pub overrun: OverrunPolicy,
}

impl Default for ContributorConfig {
    fn default() -> Self {
        ContributorConfig {
            opt_in: true,
            flush_on_hold: false,
            overrun: OverrunPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GroupConfig {
    pub id: String,
    pub ptime: MilliSecs,
    pub sample_rate: u32,
    pub max_contributors: usize,
    pub enable_flc: bool,
    pub enable_dedup: bool,
    pub enable_alignment_markers: bool,
    pub enable_timing_markers: bool,
    /// Contributor ring capacity in frames.
    pub ring_frames: usize,
    /// Ticks a silent contributor stays FLC-eligible.
    pub flc_holdover: u32,
    pub dedup_corr_threshold: f64,
    /// Search range for alignment, in samples.
    pub dedup_max_shift: usize,
}

impl Default for GroupConfig {
    fn default() -> Self {
        GroupConfig {
            id: String::new(),
            ptime: MilliSecs(20),
            sample_rate: 8000,
            max_contributors: 8,
            enable_flc: true,
            enable_dedup: false,
            enable_alignment_markers: false,
            enable_timing_markers: false,
            ring_frames: 32,
            flc_holdover: 50,
            dedup_corr_threshold: 0.85,
            dedup_max_shift: 40,
        }
    }
}

#[derive(Debug)]
pub struct Contributor {
    pub chan: u32,
    pub cfg: ContributorConfig,
    ring: ContributorRing,
    last_frame: Vec<i16>,
    flc_run: u32,
    ticks_since_data: u32,
    pub stopped: bool,
    pub overrun_drops: u64,
    pub flc_frames: u64,
    pub frames_mixed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissedInterval {
    /// Output frame index at which the miss started.
    pub index: u64,
    pub repeats: u32,
}

#[derive(Debug, Default, Clone)]
pub struct GroupStats {
    pub frames_out: u64,
    pub flc_frames: u64,
    pub missed_intervals: Vec<MissedInterval>,
    pub dedup_suppressed: u64,
    pub alignment_shifts: u64,
}

/// One tick of group output.
#[derive(Debug)]
pub struct MixOutput {
    pub index: u64,
    pub mixed: Vec<i16>,
    /// Per-contributor frames in attach order, for the per-stream and
    /// multichannel sinks. Silent/suppressed contributors yield silence.
    pub per_contributor: Vec<(u32, Vec<i16>)>,
}

/// Mixes N contributor streams into one fixed-cadence output. Owned by
/// the group owner session's worker; one `mix_frame` call per group
/// ptime.
pub struct GroupMixer {
    cfg: GroupConfig,
    framesize: usize,
    contributors: Vec<Contributor>,
    output_index: u64,
    stats: GroupStats,
}

impl GroupMixer {
    pub fn new(cfg: GroupConfig) -> Self {
        let framesize = cfg.ptime.0 as usize * (cfg.sample_rate as usize / 1000);
        GroupMixer {
            cfg,
            framesize,
            contributors: Vec::new(),
            output_index: 0,
            stats: GroupStats::default(),
        }
    }

    pub fn config(&self) -> &GroupConfig {
        &self.cfg
    }

    pub fn framesize(&self) -> usize {
        self.framesize
    }

    pub fn stats(&self) -> &GroupStats {
        &self.stats
    }

    pub fn contributors(&self) -> &[Contributor] {
        &self.contributors
    }

    pub fn add_contributor(&mut self, chan: u32, cfg: ContributorConfig) -> Result<()> {
        if self.contributors.len() >= self.cfg.max_contributors {
            return Err(Error::ContributorsFull(self.cfg.max_contributors));
        }
        if self.contributors.iter().any(|c| c.chan == chan) {
            return Err(Error::DuplicateContributor(chan));
        }
        self.contributors.push(Contributor {
            chan,
            cfg,
            ring: ContributorRing::new(self.framesize * self.cfg.ring_frames),
            last_frame: Vec::new(),
            flc_run: 0,
            ticks_since_data: 0,
            stopped: false,
            overrun_drops: 0,
            flc_frames: 0,
            frames_mixed: 0,
        });
        Ok(())
    }

    pub fn remove_contributor(&mut self, chan: u32) -> Result<()> {
        let i = self
            .contributors
            .iter()
            .position(|c| c.chan == chan)
            .ok_or(Error::UnknownContributor(chan))?;
        self.contributors.remove(i);
        Ok(())
    }

    /// Decoded audio lands here. Applies the contributor's overrun policy
    /// when the ring would overflow.
    pub fn write_samples(&mut self, chan: u32, samples: &[i16]) -> Result<()> {
        let framesize = self.framesize;
        let c = self
            .contributors
            .iter_mut()
            .find(|c| c.chan == chan)
            .ok_or(Error::UnknownContributor(chan))?;
        if c.stopped {
            return Ok(());
        }
        if c.ring.free() < samples.len() {
            match c.cfg.overrun {
                OverrunPolicy::DropSilenceFrame => {
                    c.ring.discard(framesize);
                    c.overrun_drops += 1;
                }
                OverrunPolicy::DropNextFrame => {
                    c.overrun_drops += 1;
                    return Ok(());
                }
                OverrunPolicy::StopInput => {
                    c.stopped = true;
                    c.overrun_drops += 1;
                    return Ok(());
                }
            }
        }
        c.ring.write(samples);
        Ok(())
    }

    pub fn data_available(&self, chan: u32) -> usize {
        self.contributors
            .iter()
            .find(|c| c.chan == chan)
            .map(|c| c.ring.available())
            .unwrap_or(0)
    }

    /// One group ptime: availability, dedup/alignment, per-contributor
    /// read or FLC, saturating mix, markers. Returns `None` and records a
    /// missed interval when nothing can be produced.
    pub fn mix_frame(&mut self) -> Option<MixOutput> {
        let framesize = self.framesize;

        let any_ready = self
            .contributors
            .iter()
            .any(|c| c.cfg.opt_in && c.ring.available() >= framesize);
        let any_flc = self.cfg.enable_flc
            && self.contributors.iter().any(|c| {
                c.cfg.opt_in
                    && !c.last_frame.is_empty()
                    && c.ticks_since_data < self.cfg.flc_holdover
            });

        if !any_ready && !any_flc {
            self.record_missed_interval();
            return None;
        }

        // deduplication: suppress the later of two near-identical streams
        let mut suppressed = vec![false; self.contributors.len()];
        if self.cfg.enable_dedup {
            self.dedup_pass(&mut suppressed);
        }

        let mut mixed = vec![0i16; framesize];
        let mut per_contributor = Vec::with_capacity(self.contributors.len());
        let mut any_alignment = false;

        for (i, c) in self.contributors.iter_mut().enumerate() {
            let mut frame = vec![0i16; framesize];
            let mut have = false;

            if c.ring.available() >= framesize {
                c.ring.read(&mut frame);
                c.last_frame = frame.clone();
                c.flc_run = 0;
                c.ticks_since_data = 0;
                have = true;
            } else if self.cfg.enable_flc
                && !c.last_frame.is_empty()
                && c.ticks_since_data < self.cfg.flc_holdover
            {
                // short extrapolation: repeat the last frame, fading
                frame.copy_from_slice(&c.last_frame);
                attenuate(&mut frame, 3, 4);
                c.last_frame = frame.clone();
                c.flc_run += 1;
                c.flc_frames += 1;
                self.stats.flc_frames += 1;
                c.ticks_since_data += 1;
                have = true;
            } else {
                c.ticks_since_data = c.ticks_since_data.saturating_add(1);
            }

            if have && c.cfg.opt_in && !suppressed[i] {
                mix_saturating(&mut mixed, &frame);
                c.frames_mixed += 1;
            } else if suppressed[i] {
                self.stats.dedup_suppressed += 1;
                any_alignment = true;
            }
            per_contributor.push((c.chan, frame));
        }

        if self.cfg.enable_timing_markers {
            let samples_out = self.output_index as u64 * framesize as u64;
            let second = self.cfg.sample_rate as u64;
            if samples_out % second < framesize as u64 {
                mixed[0] = MARKER_AMPLITUDE;
            }
        }
        if self.cfg.enable_alignment_markers && any_alignment {
            mixed[0] = MARKER_AMPLITUDE;
        }

        let out = MixOutput {
            index: self.output_index,
            mixed,
            per_contributor,
        };
        self.output_index += 1;
        self.stats.frames_out += 1;
        Some(out)
    }

    /// Compares ready contributors pairwise; a high correlation marks the
    /// second stream as a duplicate and shifts it into alignment.
    fn dedup_pass(&mut self, suppressed: &mut [bool]) {
        let framesize = self.framesize;
        let n = self.contributors.len();
        for i in 0..n {
            for j in (i + 1)..n {
                if suppressed[i] || suppressed[j] {
                    continue;
                }
                let (a_ok, b_ok) = (
                    self.contributors[i].ring.available() >= framesize,
                    self.contributors[j].ring.available() >= framesize,
                );
                if !a_ok || !b_ok {
                    continue;
                }
                let mut a = vec![0i16; framesize];
                let mut b = vec![0i16; framesize];
                self.contributors[i].ring.peek(&mut a);
                self.contributors[j].ring.peek(&mut b);
                // silence correlates with everything; skip quiet windows
                if mean_abs_level(&a) < 16 || mean_abs_level(&b) < 16 {
                    continue;
                }
                let al = best_alignment(&a, &b, self.cfg.dedup_max_shift);
                if al.correlation >= self.cfg.dedup_corr_threshold {
                    suppressed[j] = true;
                    if al.offset > 0 {
                        // the duplicate lags; drop samples to align it
                        self.contributors[j].ring.discard(al.offset as usize);
                        self.stats.alignment_shifts += 1;
                    }
                    debug!(
                        "group \"{}\": contributor {} duplicates {} (corr {:.3}, offset {})",
                        self.cfg.id,
                        self.contributors[j].chan,
                        self.contributors[i].chan,
                        al.correlation,
                        al.offset
                    );
                }
            }
        }
    }

    fn record_missed_interval(&mut self) {
        match self.stats.missed_intervals.last_mut() {
            Some(m) if m.index == self.output_index => m.repeats += 1,
            _ => self.stats.missed_intervals.push(MissedInterval {
                index: self.output_index,
                repeats: 1,
            }),
        }
    }
}
