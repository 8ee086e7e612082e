//! Virtual-deadline band selection.
//!
//! A band that becomes ready gets the deadline `clock + period`, capped at
//! the earliest deadline of any lower band that is ready at that moment. The
//! ready band with the earliest deadline is served, ties going to the higher
//! band. Serving a band moves the clock to its deadline and pushes the band's
//! next deadline one period further. A band that runs empty forgets its
//! deadline.
//!
//! A band that has just become ready therefore always goes ahead of lower
//! ready bands, while a continuously ready low band is still served about
//! once every `period[low]` decisions.

use crate::domain::Priority;

#[derive(Debug, Clone)]
pub struct DeadlineArbiter {
    periods: [u64; 3],
    clock: u64,
    deadlines: [Option<u64>; 3],
}

impl DeadlineArbiter {
    /// `periods` are indexed high, medium, low. Zero periods are raised to one.
    pub fn new(periods: [u64; 3]) -> Self {
        Self {
            periods: periods.map(|p| p.max(1)),
            clock: 0,
            deadlines: [None; 3],
        }
    }

    /// Pick the band to serve given which bands have a record waiting.
    pub fn select(&mut self, ready: [bool; 3]) -> Option<Priority> {
        for (i, is_ready) in ready.iter().enumerate() {
            if !is_ready {
                self.deadlines[i] = None;
            }
        }

        // Lowest band first so a newly ready band sees the deadlines below it.
        for band in Priority::ALL.into_iter().rev() {
            let i = band.index();
            if !ready[i] || self.deadlines[i].is_some() {
                continue;
            }
            let own = self.clock + self.periods[i];
            let lower = self.deadlines[i + 1..].iter().flatten().min().copied();
            self.deadlines[i] = Some(lower.map_or(own, |d| d.min(own)));
        }

        Priority::ALL
            .into_iter()
            .filter_map(|band| self.deadlines[band.index()].map(|d| (d, band.index(), band)))
            .min_by_key(|(deadline, index, _)| (*deadline, *index))
            .map(|(_, _, band)| band)
    }

    /// Account for one record served from `band`.
    pub fn served(&mut self, band: Priority) {
        let i = band.index();
        let deadline = self.deadlines[i].unwrap_or(self.clock);
        self.clock = self.clock.max(deadline);
        self.deadlines[i] = Some(deadline + self.periods[i]);
    }
}

impl Default for DeadlineArbiter {
    fn default() -> Self {
        Self::new([1, 4, 16])
    }
}
