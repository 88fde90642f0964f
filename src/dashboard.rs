// Copyright 2024 Saorsa Labs Ltd.
//
// This Saorsa Network Software is licensed under the General Public License (GPL), version 3.
// Please see the file LICENSE-GPL, or visit <http://www.gnu.org/licenses/> for the full text.
//
// Full details available at https://saorsalabs.com/licenses

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use rand::{Rng, rngs::StdRng};
use tracing::{debug, trace, warn};

use crate::config::DashboardConfig;
use crate::error::CommandError;
use crate::event::{Command, Event, Request, Response};
use crate::graph::{self, GraphController, GraphOutcome};
use crate::notify::{BannerSource, MotdChange, MotdStep, NotificationState};
use crate::options::StatusOptions;
use crate::poll::{self, PollOutcome, PollScheduler};
use crate::rate::RateCache;
use crate::registry::EntityRegistry;
use crate::snapshot::StatusSnapshot;
use crate::timer::{Timer, TimerTable};
use crate::view::{DashboardView, build_view};

/// The dashboard state machine
///
/// `Dashboard` performs no I/O and never reads the clock. The owner feeds it
/// with [`handle_timeout`](Self::handle_timeout),
/// [`handle_response`](Self::handle_response) and
/// [`handle_command`](Self::handle_command), and drains it after every call:
///
/// - [`poll_request`](Self::poll_request) for HTTP requests to perform,
/// - [`poll_event`](Self::poll_event) for things to render,
/// - [`poll_timeout`](Self::poll_timeout) for when to call
///   [`handle_timeout`](Self::handle_timeout) next.
///
/// [`crate::Driver`] does all of this on a tokio runtime.
#[derive(Debug)]
pub struct Dashboard<R = StdRng> {
    config: DashboardConfig,
    timers: TimerTable,
    poll: PollScheduler,
    graph: GraphController,
    notify: NotificationState,
    rates: RateCache,
    registry: EntityRegistry<R>,
    /// Latest usable snapshot
    current: Option<Arc<StatusSnapshot>>,
    view: Option<Arc<DashboardView>>,
    raw_options: Option<String>,
    options: StatusOptions,
    requests: VecDeque<Request>,
    events: VecDeque<Event>,
}

impl Dashboard {
    /// Create an idle dashboard; nothing happens until [`start`](Self::start)
    pub fn new(config: DashboardConfig) -> Self {
        Self::with_registry(config, EntityRegistry::new())
    }
}

impl<R: Rng> Dashboard<R> {
    /// Create an idle dashboard drawing synthetic entity ids from `rng`
    pub fn with_rng(config: DashboardConfig, rng: R) -> Self {
        Self::with_registry(config, EntityRegistry::with_rng(rng))
    }

    fn with_registry(config: DashboardConfig, registry: EntityRegistry<R>) -> Self {
        Self {
            poll: PollScheduler::new(&config),
            graph: GraphController::new(&config),
            notify: NotificationState::new(&config),
            config,
            timers: TimerTable::default(),
            rates: RateCache::new(),
            registry,
            current: None,
            view: None,
            raw_options: None,
            options: StatusOptions::default(),
            requests: VecDeque::new(),
            events: VecDeque::new(),
        }
    }

    /// Begin polling and load the initial graph
    pub fn start(&mut self) {
        if let Some(request) = self.poll.start(&mut self.timers) {
            self.requests.push_back(request);
        }

        let metric = self.config.initial_metric.clone();
        match self.graph.switch_metric(&metric, &mut self.timers) {
            Ok(request) => {
                self.requests.push_back(request);
                self.events.push_back(Event::GraphSelected(metric));
            }
            Err(error) => warn!(%error, "initial graph not loaded"),
        }
    }

    /// Process every timer due at or before `now`
    ///
    /// Each timer fires at most once per call; one re-armed for `now` or
    /// earlier waits for the next call.
    pub fn handle_timeout(&mut self, now: Instant) {
        let mut due = Vec::with_capacity(Timer::VALUES.len());
        while let Some(expired) = self.timers.expire_before(now) {
            due.push(expired);
        }

        for (timer, deadline) in due {
            trace!(?timer, late = ?now.saturating_duration_since(deadline), "timeout");
            match timer {
                Timer::StatusPoll => {
                    if let Some(request) = self.poll.handle_timeout(&mut self.timers) {
                        self.requests.push_back(request);
                    }
                }
                Timer::GraphRefresh => {
                    if let Some(request) = self.graph.handle_timeout(&mut self.timers) {
                        self.requests.push_back(request);
                    }
                }
                Timer::Motd => {
                    let url = self.current.as_ref().and_then(|s| s.motd.clone());
                    let step = self.notify.check_motd(now, url.as_deref(), &mut self.timers);
                    self.motd_step(step);
                }
            }
        }
    }

    /// Process the outcome of a request returned by
    /// [`poll_request`](Self::poll_request)
    pub fn handle_response(&mut self, now: Instant, response: Response) {
        match response {
            Response::Status { ticket, result } => {
                match self.poll.handle_response(now, ticket, result, &mut self.timers) {
                    PollOutcome::Snapshot { snapshot, first } => self.on_snapshot(now, snapshot, first),
                    PollOutcome::NotReady => self.clear_error(BannerSource::Status),
                    PollOutcome::Failed(error) => {
                        if let Some(message) = poll::failure_message(&error) {
                            self.show_error(BannerSource::Status, message);
                        }
                    }
                    PollOutcome::Stale => {}
                }
            }
            Response::Series { ticket, result } => {
                match self.graph.handle_response(now, ticket, result, &mut self.timers) {
                    GraphOutcome::Chart(frame) => {
                        self.clear_error(BannerSource::Graph);
                        self.events.push_back(Event::Chart(frame));
                    }
                    GraphOutcome::Failed(error) => {
                        self.show_error(BannerSource::Graph, graph::failure_message(&error));
                    }
                    GraphOutcome::Stale => {}
                }
            }
            Response::Motd { ticket, result } => match self.notify.handle_motd(ticket, result) {
                Some(MotdChange::Show(body)) => self.events.push_back(Event::Motd(Some(body))),
                Some(MotdChange::Hide) => self.events.push_back(Event::Motd(None)),
                None => {}
            },
        }
    }

    fn on_snapshot(&mut self, now: Instant, snapshot: Arc<StatusSnapshot>, first: bool) {
        self.clear_error(BannerSource::Status);

        let Ok(clock) = snapshot.clock() else {
            return;
        };

        if snapshot.status_options != self.raw_options {
            self.raw_options = snapshot.status_options.clone();
            self.options = StatusOptions::parse(self.raw_options.as_deref());
            debug!(options = ?self.options, "status options changed");
        }

        let previous_tick = self
            .current
            .as_ref()
            .and_then(|previous| previous.server.tick_now);
        let graph = &self.graph;
        let view = Arc::new(build_view(
            snapshot.clone(),
            clock,
            previous_tick,
            self.options.clone(),
            &mut self.rates,
            &mut self.registry,
            |key| graph.catalog().contains(key),
        ));
        self.view = Some(view.clone());
        self.events.push_back(Event::Render(view));

        if let Some(update) = self.notify.update_alarms(snapshot.alarms.as_deref()) {
            self.events.push_back(Event::Alarms(update));
        }

        if first {
            let step = self
                .notify
                .activate_motd(now, snapshot.motd.as_deref(), &mut self.timers);
            self.motd_step(step);
        }

        self.current = Some(snapshot);
    }

    fn motd_step(&mut self, step: MotdStep) {
        match step {
            MotdStep::Fetch(request) => self.requests.push_back(request),
            MotdStep::Hide => self.events.push_back(Event::Motd(None)),
            MotdStep::Idle => {}
        }
    }

    fn show_error(&mut self, source: BannerSource, message: String) {
        if self.notify.show_error(source, message.clone()) {
            self.events.push_back(Event::ErrorBanner {
                source,
                message: Some(message),
            });
        }
    }

    fn clear_error(&mut self, source: BannerSource) {
        if self.notify.clear_error(source) {
            self.events.push_back(Event::ErrorBanner { source, message: None });
        }
    }

    /// Apply a user gesture
    pub fn handle_command(&mut self, now: Instant, command: Command) -> Result<(), CommandError> {
        debug!(?command, "command");
        match command {
            Command::SwitchMetric(metric) => {
                let request = self.graph.switch_metric(&metric, &mut self.timers)?;
                self.requests.push_back(request);
                self.events.push_back(Event::GraphSelected(metric));
            }
            Command::SelectRange { from, to } => {
                let frame = self.graph.select_range(now, from, to, &mut self.timers)?;
                self.events.extend(frame.map(Event::Chart));
            }
            Command::ClearSelection => {
                let frame = self.graph.clear_selection();
                self.events.extend(frame.map(Event::Chart));
            }
            Command::ZoomIn => {
                let frame = self.graph.zoom_in()?;
                self.events.extend(frame.map(Event::Chart));
            }
            Command::ZoomOut => {
                let frame = self.graph.zoom_out();
                self.events.extend(frame.map(Event::Chart));
            }
            Command::ShowRxErrors(id) => {
                let popup = self
                    .registry
                    .rx_error_detail(id)
                    .ok_or(CommandError::UnknownEntity(id))?;
                self.events.push_back(Event::Detail(popup));
            }
            Command::ShowCertificate(id) => {
                let popup = self
                    .registry
                    .certificate_detail(id)
                    .ok_or(CommandError::UnknownEntity(id))?;
                self.events.push_back(Event::Detail(popup));
            }
        }
        Ok(())
    }

    /// When [`handle_timeout`](Self::handle_timeout) must be called next
    pub fn poll_timeout(&self) -> Option<Instant> {
        self.timers.next_timeout()
    }

    /// Next request to perform
    pub fn poll_request(&mut self) -> Option<Request> {
        self.requests.pop_front()
    }

    /// Next event to render
    pub fn poll_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    /// Stop everything and forget all state, including rate baselines
    ///
    /// Responses to requests issued before the reset are discarded.
    pub fn reset(&mut self) {
        self.poll.stop(&mut self.timers);
        self.graph.stop(&mut self.timers);
        self.notify.reset(&mut self.timers);
        self.timers.reset();
        self.rates.clear();
        self.registry.clear();
        self.current = None;
        self.view = None;
        self.raw_options = None;
        self.options = StatusOptions::default();
        self.requests.clear();
        self.events.clear();
    }

    /// Whether a timer is armed
    pub fn is_armed(&self, timer: Timer) -> bool {
        self.timers.is_armed(timer)
    }

    /// Deadline of a timer
    pub fn deadline(&self, timer: Timer) -> Option<Instant> {
        self.timers.get(timer)
    }

    /// The latest rendered view
    pub fn view(&self) -> Option<&Arc<DashboardView>> {
        self.view.as_ref()
    }

    /// The latest usable snapshot
    pub fn snapshot(&self) -> Option<&Arc<StatusSnapshot>> {
        self.current.as_ref()
    }

    /// The status poll
    pub fn poll_scheduler(&self) -> &PollScheduler {
        &self.poll
    }

    /// The graph
    pub fn graph(&self) -> &GraphController {
        &self.graph
    }

    /// Banner state
    pub fn notifications(&self) -> &NotificationState {
        &self.notify
    }

    /// The configuration the dashboard was created with
    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rand::SeedableRng;

    use super::*;
    use crate::error::{FetchError, GraphError};
    use crate::event::Ticket;
    use crate::snapshot::{Alarm, EntityRecord, ServerInfo};

    fn dashboard() -> Dashboard<StdRng> {
        Dashboard::with_rng(DashboardConfig::default(), StdRng::seed_from_u64(3))
    }

    fn status(tick: i64) -> StatusSnapshot {
        StatusSnapshot {
            server: ServerInfo {
                time_now: Some(1_700_000_000 + tick),
                tick_now: Some(tick),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn requests(dashboard: &mut Dashboard<StdRng>) -> Vec<Request> {
        std::iter::from_fn(|| dashboard.poll_request()).collect()
    }

    fn events(dashboard: &mut Dashboard<StdRng>) -> Vec<Event> {
        std::iter::from_fn(|| dashboard.poll_event()).collect()
    }

    fn status_ticket(requests: &[Request]) -> Ticket {
        requests
            .iter()
            .find_map(|r| match r {
                Request::Status { ticket, .. } => Some(*ticket),
                _ => None,
            })
            .expect("status request")
    }

    #[test]
    fn start_requests_status_and_graph() {
        let mut dashboard = dashboard();
        dashboard.start();
        let requests = requests(&mut dashboard);
        assert_eq!(requests.len(), 2);
        assert!(matches!(requests[0], Request::Status { .. }));
        assert!(matches!(
            &requests[1],
            Request::Series { metric, .. } if metric == "totals.tcp_bytes_rx"
        ));
        assert_eq!(
            events(&mut dashboard),
            vec![Event::GraphSelected("totals.tcp_bytes_rx".into())]
        );
        assert_eq!(dashboard.poll_timeout(), None);
    }

    #[test]
    fn first_snapshot_activates_motd_once() {
        let now = Instant::now();
        let mut dashboard = dashboard();
        dashboard.start();
        let t = status_ticket(&requests(&mut dashboard));

        let mut snapshot = status(100);
        snapshot.motd = Some("/motd.html".into());
        dashboard.handle_response(now, Response::Status { ticket: t, result: Ok(snapshot.clone()) });
        let issued = requests(&mut dashboard);
        assert!(matches!(&issued[..], [Request::Motd { url, .. }] if url == "/motd.html"));
        assert!(dashboard.is_armed(Timer::Motd));

        dashboard.handle_timeout(now + Duration::from_secs(10));
        let t = status_ticket(&requests(&mut dashboard));
        dashboard.handle_response(now, Response::Status { ticket: t, result: Ok(snapshot) });
        assert!(requests(&mut dashboard).is_empty());
    }

    #[test]
    fn alarm_banner_shows_once() {
        let now = Instant::now();
        let mut dashboard = dashboard();
        dashboard.start();
        let t = status_ticket(&requests(&mut dashboard));
        dashboard.handle_response(now, Response::Status { ticket: t, result: Ok(status(0)) });
        events(&mut dashboard);

        let mut tick = 0;
        let mut poll = |dashboard: &mut Dashboard<StdRng>, alarms: Option<Vec<Alarm>>| {
            tick += 10;
            dashboard.handle_timeout(now + Duration::from_secs(tick as u64));
            let t = status_ticket(&requests(dashboard));
            let mut snapshot = status(tick);
            snapshot.alarms = alarms;
            dashboard.handle_response(now, Response::Status { ticket: t, result: Ok(snapshot) });
            events(dashboard)
                .into_iter()
                .filter(|e| matches!(e, Event::Alarms(_)))
                .count()
        };

        let raised = vec![Alarm {
            err: "no_uplink".into(),
            set: true,
        }];
        assert_eq!(poll(&mut dashboard, Some(vec![])), 0);
        assert_eq!(poll(&mut dashboard, Some(raised.clone())), 1);
        assert_eq!(poll(&mut dashboard, Some(raised)), 0);
        assert_eq!(poll(&mut dashboard, None), 1);
    }

    #[test]
    fn rejected_commands() {
        let now = Instant::now();
        let mut dashboard = dashboard();
        dashboard.start();
        assert_eq!(
            dashboard.handle_command(now, Command::ZoomIn),
            Err(CommandError::Graph(GraphError::NoRange))
        );
        assert_eq!(
            dashboard.handle_command(now, Command::SwitchMetric("memory.foo".into())),
            Err(CommandError::Graph(GraphError::UnknownMetric("memory.foo".into())))
        );
        assert_eq!(
            dashboard.handle_command(now, Command::ShowCertificate(4)),
            Err(CommandError::UnknownEntity(4))
        );
    }

    #[test]
    fn detail_popups() {
        let now = Instant::now();
        let mut dashboard = dashboard();
        dashboard.start();
        let t = status_ticket(&requests(&mut dashboard));
        let mut snapshot = status(1);
        snapshot.clients = vec![EntityRecord {
            fd: Some(4),
            pkts_rx: Some(10),
            ..Default::default()
        }];
        dashboard.handle_response(now, Response::Status { ticket: t, result: Ok(snapshot) });
        events(&mut dashboard);

        dashboard.handle_command(now, Command::ShowRxErrors(4)).unwrap();
        let popup = events(&mut dashboard);
        assert!(matches!(&popup[..], [Event::Detail(d)] if d.title == "10 packets received"));
    }

    #[test]
    fn graph_failure_banner_then_recovery() {
        let now = Instant::now();
        let mut dashboard = dashboard();
        dashboard.start();
        let series = requests(&mut dashboard)
            .into_iter()
            .find_map(|r| match r {
                Request::Series { ticket, .. } => Some(ticket),
                _ => None,
            })
            .unwrap();
        events(&mut dashboard);

        dashboard.handle_response(now, Response::Series { ticket: series, result: Err(FetchError::RequestTimeout) });
        assert!(matches!(
            &events(&mut dashboard)[..],
            [Event::ErrorBanner { source: BannerSource::Graph, message: Some(_) }]
        ));
        assert_eq!(dashboard.deadline(Timer::GraphRefresh), Some(now + Duration::from_secs(60)));

        dashboard.handle_timeout(now + Duration::from_secs(60));
        let series = requests(&mut dashboard)
            .into_iter()
            .find_map(|r| match r {
                Request::Series { ticket, .. } => Some(ticket),
                _ => None,
            })
            .unwrap();
        dashboard.handle_response(
            now,
            Response::Series {
                ticket: series,
                result: Ok(Default::default()),
            },
        );
        let events = events(&mut dashboard);
        assert!(matches!(
            events[0],
            Event::ErrorBanner { source: BannerSource::Graph, message: None }
        ));
        assert!(matches!(events[1], Event::Chart(_)));
    }

    #[test]
    fn reset_discards_in_flight() {
        let now = Instant::now();
        let mut dashboard = dashboard();
        dashboard.start();
        let t = status_ticket(&requests(&mut dashboard));
        dashboard.reset();
        dashboard.handle_response(now, Response::Status { ticket: t, result: Ok(status(1)) });
        assert!(events(&mut dashboard).is_empty());
        assert_eq!(dashboard.poll_timeout(), None);
        assert!(dashboard.view().is_none());
    }
}
