use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// End-of-run counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CopySummary {
    pub reels:               u32,
    pub traces_read:         u64,
    pub traces_written:      u64,
    pub traces_filtered:     u64,
    pub traces_skipped:      u64,
    pub first_cdp:           Option<i32>,
    pub last_cdp:            Option<i32>,
    pub output_volumes:      u32,
    pub short_reads:         u64,
    pub sample_mismatches:   u64,
    pub format_mismatches:   u64,
    pub coverage_rows:       u64,
    pub cube_traces:         u64,
    pub cube_skipped:        u64,
    pub trace_cap_reached:   bool,
    pub finished_at:         Option<DateTime<Utc>>,
}

impl CopySummary {
    pub fn record_cdp(&mut self, cdp: i32) {
        self.first_cdp.get_or_insert(cdp);
        self.last_cdp = Some(cdp);
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

impl fmt::Display for CopySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} traces written ({} read, {} outside cdp range, {} skipped)",
                 self.traces_written, self.traces_read, self.traces_filtered, self.traces_skipped)?;
        if let (Some(first), Some(last)) = (self.first_cdp, self.last_cdp) {
            writeln!(f, "First cdp {first}, last cdp {last}")?;
        }
        write!(f, "{} reel(s), {} output volume(s)", self.reels, self.output_volumes)?;
        if self.cube_skipped > 0 {
            write!(f, ", {} trace(s) outside the cube", self.cube_skipped)?;
        }
        if self.trace_cap_reached {
            write!(f, ", trace limit reached")?;
        }
        Ok(())
    }
}
