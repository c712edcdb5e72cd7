/// Ensemble range filter plus the leading-trace skip counter.
#[derive(Debug, Clone, Default)]
pub struct TraceFilter {
    cdp_min: i32,
    cdp_max: i32,
    skip:    u64,
}

impl TraceFilter {
    pub fn new(cdp_min: i32, cdp_max: i32, skip: u64) -> Self {
        Self { cdp_min, cdp_max, skip }
    }

    /// Whether a range is active at all.
    pub fn is_ranged(&self) -> bool {
        self.cdp_min < self.cdp_max
    }

    /// Keep a trace by CDP ensemble.  Bounds are exclusive; an empty or
    /// inverted range keeps everything.
    pub fn keep(&self, ensemble: i32) -> bool {
        !self.is_ranged() || (self.cdp_min < ensemble && ensemble < self.cdp_max)
    }

    /// Consume one unit of the skip counter.  Returns true while traces
    /// are still being skipped.
    pub fn take_skip(&mut self) -> bool {
        if self.skip > 0 {
            self.skip -= 1;
            true
        } else {
            false
        }
    }
}
