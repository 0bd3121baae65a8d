//! Strong time units. The engine mixes three clocks: microsecond wall time,
//! millisecond configuration intervals and jitter-buffer depth counted in
//! ptimes. Each gets its own type; conversions are explicit and happen at
//! component boundaries only.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub};

/// Microseconds of wall or virtual clock time.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MicroSecs(pub u64);

/// Milliseconds, used for configuration intervals (ptime, alarms, timeouts).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MilliSecs(pub u64);

/// A count of packetization intervals. Jitter-buffer depth and delay targets
/// are expressed in this unit.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Ptimes(pub u32);

impl MicroSecs {
    pub const ZERO: MicroSecs = MicroSecs(0);

    pub fn as_millis(self) -> MilliSecs {
        MilliSecs(self.0 / 1000)
    }

    pub fn saturating_sub(self, rhs: MicroSecs) -> MicroSecs {
        MicroSecs(self.0.saturating_sub(rhs.0))
    }
}

impl MilliSecs {
    pub fn as_micros(self) -> MicroSecs {
        MicroSecs(self.0 * 1000)
    }
}

impl Ptimes {
    /// Duration of this many intervals at the given ptime.
    pub fn at(self, ptime: MilliSecs) -> MicroSecs {
        MicroSecs(self.0 as u64 * ptime.0 * 1000)
    }

    /// RTP timestamp units covered by this many intervals.
    pub fn rtp_units(self, ptime: MilliSecs, sample_rate: u32) -> u32 {
        self.0
            .wrapping_mul((ptime.0 as u32).wrapping_mul(sample_rate / 1000))
    }
}

impl Add for MicroSecs {
    type Output = MicroSecs;
    fn add(self, rhs: MicroSecs) -> MicroSecs {
        MicroSecs(self.0 + rhs.0)
    }
}

impl AddAssign for MicroSecs {
    fn add_assign(&mut self, rhs: MicroSecs) {
        self.0 += rhs.0;
    }
}

impl Sub for MicroSecs {
    type Output = MicroSecs;
    fn sub(self, rhs: MicroSecs) -> MicroSecs {
        MicroSecs(self.0 - rhs.0)
    }
}

impl Add for Ptimes {
    type Output = Ptimes;
    fn add(self, rhs: Ptimes) -> Ptimes {
        Ptimes(self.0 + rhs.0)
    }
}

impl AddAssign for Ptimes {
    fn add_assign(&mut self, rhs: Ptimes) {
        self.0 += rhs.0;
    }
}

impl Sub for Ptimes {
    type Output = Ptimes;
    fn sub(self, rhs: Ptimes) -> Ptimes {
        Ptimes(self.0 - rhs.0)
    }
}

impl Mul<u32> for Ptimes {
    type Output = Ptimes;
    fn mul(self, rhs: u32) -> Ptimes {
        Ptimes(self.0 * rhs)
    }
}

impl fmt::Display for MicroSecs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}us", self.0)
    }
}

impl fmt::Display for MilliSecs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

impl fmt::Display for Ptimes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ptimes", self.0)
    }
}

#[cfg(test)]
mod time_test {
    use super::*;

    #[test]
    fn conversions() {
        assert_eq!(MilliSecs(20).as_micros(), MicroSecs(20_000));
        assert_eq!(MicroSecs(41_500).as_millis(), MilliSecs(41));
        assert_eq!(Ptimes(3).at(MilliSecs(20)), MicroSecs(60_000));
        assert_eq!(Ptimes(2).rtp_units(MilliSecs(20), 8000), 320);
        assert_eq!(Ptimes(1).rtp_units(MilliSecs(20), 16000), 320);
    }

    #[test]
    fn saturating() {
        assert_eq!(
            MicroSecs(10).saturating_sub(MicroSecs(25)),
            MicroSecs::ZERO
        );
    }
}
