// Copyright 2024 Saorsa Labs Ltd.
//
// This Saorsa Network Software is licensed under the General Public License (GPL), version 3.
// Please see the file LICENSE-GPL, or visit <http://www.gnu.org/licenses/> for the full text.
//
// Full details available at https://saorsalabs.com/licenses

//! Timeout and cadence constants for the dashboard
//!
//! This module centralizes the default intervals used by the pollers so the
//! configuration defaults and the documentation stay in one place.

use std::time::Duration;

/// Full status poll
pub mod status {
    use super::*;

    /// Delay between a successful poll and the next one
    pub const POLL_INTERVAL: Duration = Duration::from_secs(10);

    /// Delay after a failed poll
    pub const RETRY_INTERVAL: Duration = Duration::from_secs(30);

    /// Upper bound on a single `/status.json` request
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
}

/// Historical graph
pub mod graph {
    use super::*;

    /// Delay between graph refreshes, also used after a failure
    pub const REFRESH_INTERVAL: Duration = Duration::from_secs(60);

    /// Upper bound on a single `/counterdata` request
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
}

/// Message of the day
pub mod motd {
    use super::*;

    /// Delay between message-of-the-day checks
    pub const CHECK_INTERVAL: Duration = Duration::from_secs(61);

    /// Upper bound on a single message-of-the-day request
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
}
