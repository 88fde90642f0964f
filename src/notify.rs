// Copyright 2024 Saorsa Labs Ltd.
//
// This Saorsa Network Software is licensed under the General Public License (GPL), version 3.
// Please see the file LICENSE-GPL, or visit <http://www.gnu.org/licenses/> for the full text.
//
// Full details available at https://saorsalabs.com/licenses

//! Transient banners
//!
//! All banners are edge-triggered: a change is reported once and repeating the
//! same state reports nothing, so renderers never re-animate a banner that is
//! already on screen.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::DashboardConfig;
use crate::error::FetchError;
use crate::event::{Request, Ticket};
use crate::labels;
use crate::snapshot::Alarm;
use crate::timer::{Timer, TimerTable};

/// Subsystem owning an error banner
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BannerSource {
    /// The status poll
    Status = 0,
    /// The graph refresh
    Graph = 1,
}

impl fmt::Display for BannerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Status => "status",
            Self::Graph => "graph",
        })
    }
}

/// One raised alarm
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmLine {
    /// Alarm code as reported by the server
    pub code: String,
    /// Human readable description, the code itself when unknown
    pub message: String,
}

/// Change of the alarm banner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlarmUpdate {
    /// The banner appears
    Show(Vec<AlarmLine>),
    /// The banner stays visible with different alarms
    Update(Vec<AlarmLine>),
    /// The banner disappears
    Hide,
}

impl AlarmUpdate {
    /// Whether the change should be animated
    pub fn is_animated(&self) -> bool {
        !matches!(self, Self::Update(_))
    }
}

/// Change of the message-of-the-day banner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MotdChange {
    /// Show this content
    Show(String),
    /// Remove the banner
    Hide,
}

/// Result of a message-of-the-day check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MotdStep {
    /// Fetch the message
    Fetch(Request),
    /// No message is configured any more; remove the banner
    Hide,
    /// Nothing to do
    Idle,
}

/// Banner state shown on top of the dashboard
#[derive(Debug)]
pub struct NotificationState {
    errors: [Option<String>; 2],
    alarms: Vec<AlarmLine>,
    motd: Motd,
}

impl NotificationState {
    /// Create with every banner hidden
    pub fn new(config: &DashboardConfig) -> Self {
        Self {
            errors: Default::default(),
            alarms: Vec::new(),
            motd: Motd::new(config),
        }
    }

    /// Show an error banner; returns whether the visible text changed
    pub fn show_error(&mut self, source: BannerSource, message: String) -> bool {
        let slot = &mut self.errors[source as usize];
        if slot.as_deref() == Some(message.as_str()) {
            return false;
        }
        *slot = Some(message);
        true
    }

    /// Clear an error banner; returns whether one was visible
    pub fn clear_error(&mut self, source: BannerSource) -> bool {
        self.errors[source as usize].take().is_some()
    }

    /// Visible text of an error banner
    pub fn error(&self, source: BannerSource) -> Option<&str> {
        self.errors[source as usize].as_deref()
    }

    /// Reconcile the alarm banner with a snapshot's `alarms`
    ///
    /// An absent field and an empty array both hide the banner.
    pub fn update_alarms(&mut self, alarms: Option<&[Alarm]>) -> Option<AlarmUpdate> {
        let active: Vec<AlarmLine> = alarms
            .unwrap_or_default()
            .iter()
            .filter(|alarm| alarm.set)
            .map(|alarm| AlarmLine {
                code: alarm.err.clone(),
                message: labels::alarm(&alarm.err),
            })
            .collect();

        if active == self.alarms {
            return None;
        }
        let was_visible = !self.alarms.is_empty();
        self.alarms = active;
        Some(match (was_visible, self.alarms.is_empty()) {
            (_, true) => AlarmUpdate::Hide,
            (false, false) => AlarmUpdate::Show(self.alarms.clone()),
            (true, false) => AlarmUpdate::Update(self.alarms.clone()),
        })
    }

    /// Alarms currently shown
    pub fn alarms(&self) -> &[AlarmLine] {
        &self.alarms
    }

    /// Start the message-of-the-day cycle; only the first call has an effect
    pub fn activate_motd(&mut self, now: Instant, url: Option<&str>, timers: &mut TimerTable) -> MotdStep {
        if self.motd.active {
            return MotdStep::Idle;
        }
        debug!("message of the day activated");
        self.motd.active = true;
        self.check_motd(now, url, timers)
    }

    /// Check the message of the day against the latest snapshot's URL and arm
    /// the next check
    pub fn check_motd(&mut self, now: Instant, url: Option<&str>, timers: &mut TimerTable) -> MotdStep {
        if !self.motd.active {
            return MotdStep::Idle;
        }
        timers.set(Timer::Motd, now + self.motd.interval);

        if let Some(url) = url.filter(|url| !url.is_empty()) {
            return MotdStep::Fetch(self.motd.issue(url));
        }
        if self.motd.hide() {
            MotdStep::Hide
        } else {
            MotdStep::Idle
        }
    }

    /// Consume a message-of-the-day response
    ///
    /// Failures keep whatever is shown. Identical content changes nothing.
    pub fn handle_motd(&mut self, ticket: Ticket, result: Result<String, FetchError>) -> Option<MotdChange> {
        if self.motd.in_flight != Some(ticket) {
            debug!(%ticket, "discarding stale message of the day");
            return None;
        }
        self.motd.in_flight = None;

        let body = match result {
            Ok(body) => body,
            Err(error) => {
                warn!(%error, "message of the day request failed");
                return None;
            }
        };

        if body.trim().is_empty() {
            return self.motd.hide().then_some(MotdChange::Hide);
        }
        if self.motd.shown.as_deref() == Some(body.as_str()) {
            return None;
        }
        self.motd.shown = Some(body.clone());
        Some(MotdChange::Show(body))
    }

    /// Content of the message-of-the-day banner
    pub fn motd(&self) -> Option<&str> {
        self.motd.shown.as_deref()
    }

    /// Hide everything and stop the message-of-the-day cycle
    pub fn reset(&mut self, timers: &mut TimerTable) {
        timers.stop(Timer::Motd);
        self.errors = Default::default();
        self.alarms.clear();
        self.motd.active = false;
        self.motd.in_flight = None;
        self.motd.shown = None;
    }
}

#[derive(Debug)]
struct Motd {
    interval: Duration,
    timeout: Duration,
    active: bool,
    next_ticket: u64,
    in_flight: Option<Ticket>,
    shown: Option<String>,
}

impl Motd {
    fn new(config: &DashboardConfig) -> Self {
        Self {
            interval: config.motd_interval,
            timeout: config.motd_timeout,
            active: false,
            next_ticket: 0,
            in_flight: None,
            shown: None,
        }
    }

    fn issue(&mut self, url: &str) -> Request {
        self.next_ticket += 1;
        let ticket = Ticket(self.next_ticket);
        self.in_flight = Some(ticket);
        debug!(%ticket, url, "requesting message of the day");
        Request::Motd {
            ticket,
            url: url.to_string(),
            timeout: self.timeout,
        }
    }

    /// Returns whether a banner was visible
    fn hide(&mut self) -> bool {
        self.in_flight = None;
        self.shown.take().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> NotificationState {
        NotificationState::new(&DashboardConfig::default())
    }

    fn alarm(err: &str, set: bool) -> Alarm {
        Alarm {
            err: err.to_string(),
            set,
        }
    }

    fn motd_ticket(step: MotdStep) -> Ticket {
        match step {
            MotdStep::Fetch(Request::Motd { ticket, .. }) => ticket,
            other => panic!("expected a fetch, got {other:?}"),
        }
    }

    #[test]
    fn error_banner_once_per_message() {
        let mut state = state();
        assert!(state.show_error(BannerSource::Status, "down".into()));
        assert!(!state.show_error(BannerSource::Status, "down".into()));
        assert!(state.show_error(BannerSource::Status, "still down".into()));
        assert!(!state.clear_error(BannerSource::Graph));
        assert!(state.clear_error(BannerSource::Status));
        assert!(!state.clear_error(BannerSource::Status));
        assert_eq!(state.error(BannerSource::Status), None);
    }

    #[test]
    fn alarms_are_edge_triggered() {
        let mut state = state();
        assert_eq!(state.update_alarms(Some(&[][..])), None);

        let raised = [alarm("no_uplink", true)];
        let update = state.update_alarms(Some(&raised[..])).unwrap();
        assert_eq!(
            update,
            AlarmUpdate::Show(vec![AlarmLine {
                code: "no_uplink".into(),
                message: "Server does not have any uplink connections.".into(),
            }])
        );
        assert!(update.is_animated());
        assert_eq!(state.update_alarms(Some(&raised[..])), None);

        let more = [alarm("no_uplink", true), alarm("mystery", true)];
        let update = state.update_alarms(Some(&more[..])).unwrap();
        assert!(matches!(&update, AlarmUpdate::Update(lines) if lines[1].message == "mystery"));
        assert!(!update.is_animated());

        assert_eq!(state.update_alarms(None), Some(AlarmUpdate::Hide));
        assert_eq!(state.update_alarms(None), None);
    }

    #[test]
    fn cleared_alarms_do_not_show() {
        let mut state = state();
        assert_eq!(state.update_alarms(Some(&[alarm("no_uplink", false)][..])), None);
        assert!(state.alarms().is_empty());
    }

    #[test]
    fn motd_cycle() {
        let now = Instant::now();
        let mut timers = TimerTable::default();
        let mut state = state();

        assert_eq!(state.check_motd(now, Some("/motd.html"), &mut timers), MotdStep::Idle);

        let t = motd_ticket(state.activate_motd(now, Some("/motd.html"), &mut timers));
        assert_eq!(timers.get(Timer::Motd), Some(now + Duration::from_secs(61)));
        assert_eq!(state.activate_motd(now, Some("/motd.html"), &mut timers), MotdStep::Idle);

        assert_eq!(
            state.handle_motd(t, Ok("<b>hello</b>".into())),
            Some(MotdChange::Show("<b>hello</b>".into()))
        );

        let t = motd_ticket(state.check_motd(now, Some("/motd.html"), &mut timers));
        assert_eq!(state.handle_motd(t, Ok("<b>hello</b>".into())), None);

        let t = motd_ticket(state.check_motd(now, Some("/motd.html"), &mut timers));
        assert_eq!(state.handle_motd(t, Err(FetchError::RequestTimeout)), None);
        assert_eq!(state.motd(), Some("<b>hello</b>"));

        let t = motd_ticket(state.check_motd(now, Some("/motd.html"), &mut timers));
        assert_eq!(state.handle_motd(t, Ok("  \n".into())), Some(MotdChange::Hide));
        assert_eq!(state.motd(), None);
    }

    #[test]
    fn missing_url_hides_banner() {
        let now = Instant::now();
        let mut timers = TimerTable::default();
        let mut state = state();
        let t = motd_ticket(state.activate_motd(now, Some("/motd.html"), &mut timers));
        state.handle_motd(t, Ok("hi".into()));

        assert_eq!(state.check_motd(now, None, &mut timers), MotdStep::Hide);
        assert_eq!(state.check_motd(now, None, &mut timers), MotdStep::Idle);
        assert!(timers.is_armed(Timer::Motd));
    }

    #[test]
    fn stale_motd_is_dropped() {
        let now = Instant::now();
        let mut timers = TimerTable::default();
        let mut state = state();
        let first = motd_ticket(state.activate_motd(now, Some("/a"), &mut timers));
        let _second = motd_ticket(state.check_motd(now, Some("/a"), &mut timers));
        assert_eq!(state.handle_motd(first, Ok("old".into())), None);
    }
}
