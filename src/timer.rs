// Copyright 2024 Saorsa Labs Ltd.
//
// This Saorsa Network Software is licensed under the General Public License (GPL), version 3.
// Please see the file LICENSE-GPL, or visit <http://www.gnu.org/licenses/> for the full text.
//
// Full details available at https://saorsalabs.com/licenses

//! Single-slot timers
//!
//! Each [`Timer`] kind owns exactly one slot. Setting a slot replaces whatever
//! was armed, so two pending timers of the same kind cannot exist.

use std::time::Instant;

/// Kinds of timer driven by the dashboard
#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub enum Timer {
    /// Next `/status.json` poll
    StatusPoll = 0,
    /// Next graph refresh
    GraphRefresh = 1,
    /// Next message-of-the-day check
    Motd = 2,
}

impl Timer {
    /// Every timer kind
    pub const VALUES: [Self; 3] = [Self::StatusPoll, Self::GraphRefresh, Self::Motd];
}

/// Keeps track of the pending deadline of each [`Timer`]
///
/// The table is advanced with [`TimerTable::expire_before`].
#[derive(Debug, Clone, Default)]
pub struct TimerTable {
    data: [Option<Instant>; Timer::VALUES.len()],
}

impl TimerTable {
    /// Arm a timer, returning the deadline it replaced
    pub fn set(&mut self, timer: Timer, time: Instant) -> Option<Instant> {
        self.data[timer as usize].replace(time)
    }

    /// Disarm a timer, returning its deadline if it was armed
    pub fn stop(&mut self, timer: Timer) -> Option<Instant> {
        self.data[timer as usize].take()
    }

    /// Pending deadline of a timer
    pub fn get(&self, timer: Timer) -> Option<Instant> {
        self.data[timer as usize]
    }

    /// Whether a timer is armed
    pub fn is_armed(&self, timer: Timer) -> bool {
        self.data[timer as usize].is_some()
    }

    /// Earliest pending deadline
    pub fn next_timeout(&self) -> Option<Instant> {
        self.data.iter().filter_map(|&x| x).min()
    }

    /// Remove and return the earliest timer due at or before `now`
    pub fn expire_before(&mut self, now: Instant) -> Option<(Timer, Instant)> {
        let (timer, time) = self
            .armed()
            .filter(|(_, time)| *time <= now)
            .min_by_key(|(_, time)| *time)?;
        self.data[timer as usize] = None;
        Some((timer, time))
    }

    /// Every armed timer with its deadline
    pub fn armed(&self) -> impl Iterator<Item = (Timer, Instant)> + '_ {
        Timer::VALUES
            .into_iter()
            .filter_map(|timer| self.data[timer as usize].map(|time| (timer, time)))
    }

    /// Disarm every timer
    pub fn reset(&mut self) {
        self.data = Default::default();
    }
}
