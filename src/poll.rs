// Copyright 2024 Saorsa Labs Ltd.
//
// This Saorsa Network Software is licensed under the General Public License (GPL), version 3.
// Please see the file LICENSE-GPL, or visit <http://www.gnu.org/licenses/> for the full text.
//
// Full details available at https://saorsalabs.com/licenses

//! Status poll scheduling
//!
//! [`PollScheduler`] issues one `/status.json` request at a time. The poll timer
//! is stopped whenever a request goes out and re-armed exactly once when its
//! response arrives, so at most one request and one timer exist at any moment.
//! Responses carrying an outdated [`Ticket`] are dropped.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use crate::config::DashboardConfig;
use crate::error::{FailureClass, FetchError};
use crate::event::{Request, Ticket};
use crate::snapshot::StatusSnapshot;
use crate::timer::{Timer, TimerTable};

/// What a status response amounted to
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// A usable snapshot arrived
    Snapshot {
        /// The decoded document
        snapshot: Arc<StatusSnapshot>,
        /// Whether this is the first usable snapshot of the session
        first: bool,
    },
    /// The server answered but has not reported its clock yet
    NotReady,
    /// The request failed; a retry is armed
    Failed(FetchError),
    /// The response belongs to a request that is no longer current
    Stale,
}

/// Drives the periodic status fetch
#[derive(Debug)]
pub struct PollScheduler {
    request_timeout: Duration,
    poll_interval: Duration,
    retry_interval: Duration,
    next_ticket: u64,
    in_flight: Option<Ticket>,
    running: bool,
    seen_success: bool,
    consecutive_failures: u32,
}

impl PollScheduler {
    /// Create a stopped scheduler using the intervals of `config`
    pub fn new(config: &DashboardConfig) -> Self {
        Self {
            request_timeout: config.status_timeout,
            poll_interval: config.poll_interval,
            retry_interval: config.retry_interval,
            next_ticket: 0,
            in_flight: None,
            running: false,
            seen_success: false,
            consecutive_failures: 0,
        }
    }

    /// Begin polling with an immediate request
    ///
    /// Returns `None` when polling is already running.
    pub fn start(&mut self, timers: &mut TimerTable) -> Option<Request> {
        if self.running {
            return None;
        }
        self.running = true;
        Some(self.issue(timers))
    }

    /// Stop polling and end the session; a response still in flight will be
    /// reported as stale
    pub fn stop(&mut self, timers: &mut TimerTable) {
        self.running = false;
        self.in_flight = None;
        self.seen_success = false;
        self.consecutive_failures = 0;
        timers.stop(Timer::StatusPoll);
    }

    /// React to the poll timer firing
    pub fn handle_timeout(&mut self, timers: &mut TimerTable) -> Option<Request> {
        if !self.running {
            return None;
        }
        if let Some(ticket) = self.in_flight {
            // the timer is stopped while a request is out; nothing to do
            trace!(%ticket, "poll timer fired with a request in flight");
            return None;
        }
        Some(self.issue(timers))
    }

    fn issue(&mut self, timers: &mut TimerTable) -> Request {
        timers.stop(Timer::StatusPoll);
        self.next_ticket += 1;
        let ticket = Ticket(self.next_ticket);
        self.in_flight = Some(ticket);
        debug!(%ticket, timeout = ?self.request_timeout, "requesting status");
        Request::Status {
            ticket,
            timeout: self.request_timeout,
        }
    }

    /// Consume a status response and arm the next cycle
    pub fn handle_response(
        &mut self,
        now: Instant,
        ticket: Ticket,
        result: Result<StatusSnapshot, FetchError>,
        timers: &mut TimerTable,
    ) -> PollOutcome {
        if self.in_flight != Some(ticket) {
            debug!(%ticket, current = ?self.in_flight, "discarding stale status response");
            return PollOutcome::Stale;
        }
        self.in_flight = None;

        let outcome = match result.and_then(|snapshot| snapshot.clock().map(|_| snapshot)) {
            Ok(snapshot) => {
                self.consecutive_failures = 0;
                let first = !self.seen_success;
                self.seen_success = true;
                if first {
                    info!(server = ?snapshot.server.server_id, "first status received");
                } else {
                    debug!(%ticket, "status received");
                }
                PollOutcome::Snapshot {
                    snapshot: Arc::new(snapshot),
                    first,
                }
            }
            Err(FetchError::MalformedPayload(field)) => {
                debug!(%ticket, field, "status not ready");
                PollOutcome::NotReady
            }
            Err(error) => {
                self.consecutive_failures += 1;
                warn!(
                    %ticket,
                    %error,
                    failures = self.consecutive_failures,
                    "status request failed"
                );
                PollOutcome::Failed(error)
            }
        };

        let delay = match outcome {
            PollOutcome::Failed(_) => self.retry_interval,
            _ => self.poll_interval,
        };
        timers.set(Timer::StatusPoll, now + delay);
        outcome
    }

    /// Whether a status request is outstanding
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Whether [`start`](Self::start) has been called and not stopped
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Failed requests since the last success
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}

/// Banner text for a failed status request
///
/// `None` for failures that are absorbed without a banner.
pub fn failure_message(error: &FetchError) -> Option<String> {
    Some(match error.class() {
        FailureClass::Timeout => {
            "Server status download timed out. Network or server down?".to_string()
        }
        FailureClass::NetworkError => {
            "Server status download failed with a network error. Network or server down?"
                .to_string()
        }
        FailureClass::Other(Some(status)) => {
            format!("Server status download failed with HTTP status {status}.")
        }
        FailureClass::Other(None) => {
            "Server status download failed: the server sent an unreadable response.".to_string()
        }
        FailureClass::NotReady => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::ServerInfo;

    fn ready() -> StatusSnapshot {
        StatusSnapshot {
            server: ServerInfo {
                time_now: Some(1_700_000_000),
                tick_now: Some(100),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn ticket(request: Option<Request>) -> Ticket {
        match request {
            Some(Request::Status { ticket, .. }) => ticket,
            other => panic!("expected a status request, got {other:?}"),
        }
    }

    #[test]
    fn start_issues_immediately_once() {
        let mut timers = TimerTable::default();
        let mut poll = PollScheduler::new(&DashboardConfig::default());
        let request = poll.start(&mut timers);
        assert!(matches!(
            request,
            Some(Request::Status { timeout, .. }) if timeout == Duration::from_secs(5)
        ));
        assert!(poll.is_in_flight());
        assert!(poll.start(&mut timers).is_none());
        assert!(!timers.is_armed(Timer::StatusPoll));
    }

    #[test]
    fn success_arms_poll_interval() {
        let now = Instant::now();
        let mut timers = TimerTable::default();
        let mut poll = PollScheduler::new(&DashboardConfig::default());
        let t = ticket(poll.start(&mut timers));

        let outcome = poll.handle_response(now, t, Ok(ready()), &mut timers);
        assert!(matches!(outcome, PollOutcome::Snapshot { first: true, .. }));
        assert_eq!(timers.get(Timer::StatusPoll), Some(now + Duration::from_secs(10)));
        assert!(!poll.is_in_flight());

        let t = ticket(poll.handle_timeout(&mut timers));
        let outcome = poll.handle_response(now, t, Ok(ready()), &mut timers);
        assert!(matches!(outcome, PollOutcome::Snapshot { first: false, .. }));
    }

    #[test]
    fn failure_arms_retry_interval() {
        let now = Instant::now();
        let mut timers = TimerTable::default();
        let mut poll = PollScheduler::new(&DashboardConfig::default());
        let t = ticket(poll.start(&mut timers));

        let outcome = poll.handle_response(now, t, Err(FetchError::RequestTimeout), &mut timers);
        assert_eq!(outcome, PollOutcome::Failed(FetchError::RequestTimeout));
        assert_eq!(timers.get(Timer::StatusPoll), Some(now + Duration::from_secs(30)));
        assert_eq!(poll.consecutive_failures(), 1);

        let t = ticket(poll.handle_timeout(&mut timers));
        poll.handle_response(now, t, Ok(ready()), &mut timers);
        assert_eq!(poll.consecutive_failures(), 0);
    }

    #[test]
    fn missing_clock_is_not_ready() {
        let now = Instant::now();
        let mut timers = TimerTable::default();
        let mut poll = PollScheduler::new(&DashboardConfig::default());
        let t = ticket(poll.start(&mut timers));

        let outcome = poll.handle_response(now, t, Ok(StatusSnapshot::default()), &mut timers);
        assert_eq!(outcome, PollOutcome::NotReady);
        assert_eq!(timers.get(Timer::StatusPoll), Some(now + Duration::from_secs(10)));
        assert_eq!(poll.consecutive_failures(), 0);
    }

    #[test]
    fn stale_and_stopped_responses_are_dropped() {
        let now = Instant::now();
        let mut timers = TimerTable::default();
        let mut poll = PollScheduler::new(&DashboardConfig::default());
        let t = ticket(poll.start(&mut timers));

        assert_eq!(
            poll.handle_response(now, Ticket(t.0 + 7), Ok(ready()), &mut timers),
            PollOutcome::Stale
        );
        assert!(poll.is_in_flight());

        poll.stop(&mut timers);
        assert_eq!(poll.handle_response(now, t, Ok(ready()), &mut timers), PollOutcome::Stale);
        assert!(!timers.is_armed(Timer::StatusPoll));
        assert!(poll.handle_timeout(&mut timers).is_none());
    }

    #[test]
    fn timer_with_request_in_flight_is_ignored() {
        let mut timers = TimerTable::default();
        let mut poll = PollScheduler::new(&DashboardConfig::default());
        poll.start(&mut timers);
        assert!(poll.handle_timeout(&mut timers).is_none());
    }

    #[test]
    fn messages_differ_per_class() {
        let timeout = failure_message(&FetchError::RequestTimeout).unwrap();
        let network = failure_message(&FetchError::Network("refused".into())).unwrap();
        let status = failure_message(&FetchError::Server(503)).unwrap();
        assert_ne!(timeout, network);
        assert!(status.contains("503"));
        assert_eq!(failure_message(&FetchError::MalformedPayload("server.tick_now")), None);
    }
}
