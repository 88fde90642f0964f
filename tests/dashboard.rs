//! End-to-end tests of the dashboard core
//!
//! The core is driven with a hand-held clock: every timeout and response is
//! delivered explicitly, so each scenario is deterministic.

use std::time::{Duration, Instant};

use aprsc_dash::notify::{AlarmUpdate, BannerSource};
use aprsc_dash::timer::Timer;
use aprsc_dash::{
    Command, Dashboard, DashboardConfig, EntityKind, Event, FetchError, GraphSeries, Request, Response,
    StatusSnapshot, Ticket,
};
use rand::SeedableRng;
use rand::rngs::StdRng;

type TestDashboard = Dashboard<StdRng>;

fn dashboard() -> TestDashboard {
    Dashboard::with_rng(DashboardConfig::default(), StdRng::seed_from_u64(7))
}

fn status(json: &str) -> StatusSnapshot {
    StatusSnapshot::from_slice(json.as_bytes()).unwrap()
}

fn status_at(tick: i64, clients: u64) -> StatusSnapshot {
    status(&format!(
        r#"{{
            "server": {{ "server_id": "T2TEST", "tick_now": {tick}, "time_now": {} }},
            "totals": {{ "clients": {clients}, "tcp_bytes_rx": {} }},
            "clients": [
                {{ "fd": 12, "addr_rem": "10.0.0.1:5000", "username": "OH7LZB",
                   "bytes_tx": {}, "bytes_rx": {}, "pkts_rx": 10, "rx_errs": [0, 1] }}
            ],
            "rx_errs": ["unknown", "no_colon"]
        }}"#,
        1_700_000_000 + tick,
        tick * 100,
        tick * 10,
        tick * 20,
    ))
}

fn requests(dashboard: &mut TestDashboard) -> Vec<Request> {
    std::iter::from_fn(|| dashboard.poll_request()).collect()
}

fn events(dashboard: &mut TestDashboard) -> Vec<Event> {
    std::iter::from_fn(|| dashboard.poll_event()).collect()
}

fn status_ticket(requests: &[Request]) -> Ticket {
    requests
        .iter()
        .find_map(|r| match r {
            Request::Status { ticket, .. } => Some(*ticket),
            _ => None,
        })
        .expect("no status request issued")
}

fn series_ticket(requests: &[Request]) -> Ticket {
    requests
        .iter()
        .find_map(|r| match r {
            Request::Series { ticket, .. } => Some(*ticket),
            _ => None,
        })
        .expect("no series request issued")
}

fn banners(events: &[Event], wanted: BannerSource) -> Vec<Option<String>> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::ErrorBanner { source, message } if *source == wanted => Some(message.clone()),
            _ => None,
        })
        .collect()
}

/// Fire the poll timer and answer the resulting status request
fn poll(dashboard: &mut TestDashboard, at: Instant, result: Result<StatusSnapshot, FetchError>) -> Vec<Event> {
    dashboard.handle_timeout(at);
    let ticket = status_ticket(&requests(dashboard));
    dashboard.handle_response(at, Response::Status { ticket, result });
    events(dashboard)
}

#[test]
fn rates_appear_from_the_second_poll() {
    let now = Instant::now();
    let mut dashboard = dashboard();
    dashboard.start();
    let ticket = status_ticket(&requests(&mut dashboard));
    events(&mut dashboard);

    dashboard.handle_response(now, Response::Status { ticket, result: Ok(status_at(100, 5)) });
    let first = dashboard.view().unwrap().clone();
    assert_eq!(first.totals[0].key, "totals.clients");
    assert_eq!(first.totals[0].rate, "");
    assert_eq!(first.tick_delta, None);

    let later = now + Duration::from_secs(10);
    let events = poll(&mut dashboard, later, Ok(status_at(160, 65)));
    assert!(events.iter().any(|e| matches!(e, Event::Render(_))));

    let view = dashboard.view().unwrap();
    assert_eq!(view.totals[0].value, 65.0);
    assert_eq!(view.totals[0].rate, "1.0/s");
    assert_eq!(view.totals[1].key, "totals.tcp_bytes_rx");
    assert_eq!(view.totals[1].rate, "100/s");
    assert_eq!(view.tick_delta, Some(60));

    let rows = view.rows(EntityKind::Client);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, 12);
    assert_eq!(rows[0].bytes_rates, "10 / 20/s");
}

#[test]
fn timeout_then_recovery_shows_one_banner() {
    let now = Instant::now();
    let config = DashboardConfig::default();
    let mut dashboard = dashboard();
    dashboard.start();
    let ticket = status_ticket(&requests(&mut dashboard));
    events(&mut dashboard);

    dashboard.handle_response(now, Response::Status { ticket, result: Err(FetchError::RequestTimeout) });
    let shown = banners(&events(&mut dashboard), BannerSource::Status);
    assert_eq!(shown.len(), 1);
    assert!(shown[0].as_deref().unwrap().contains("timed out"));
    assert_eq!(dashboard.deadline(Timer::StatusPoll), Some(now + config.retry_interval));
    assert_eq!(dashboard.poll_scheduler().consecutive_failures(), 1);

    // the timer is not due yet
    dashboard.handle_timeout(now + Duration::from_secs(1));
    assert!(requests(&mut dashboard).is_empty());

    let retry = now + config.retry_interval;
    let events = poll(&mut dashboard, retry, Ok(status_at(10, 1)));
    assert_eq!(banners(&events, BannerSource::Status), vec![None]);
    assert_eq!(dashboard.deadline(Timer::StatusPoll), Some(retry + config.poll_interval));
    assert_eq!(dashboard.poll_scheduler().consecutive_failures(), 0);
    assert_eq!(dashboard.notifications().error(BannerSource::Status), None);
}

#[test]
fn repeated_failures_keep_a_single_banner() {
    let now = Instant::now();
    let config = DashboardConfig::default();
    let mut dashboard = dashboard();
    dashboard.start();
    let ticket = status_ticket(&requests(&mut dashboard));
    dashboard.handle_response(now, Response::Status { ticket, result: Err(FetchError::Server(500)) });
    assert_eq!(banners(&events(&mut dashboard), BannerSource::Status).len(), 1);

    let mut at = now;
    for _ in 0..3 {
        at += config.retry_interval;
        let events = poll(&mut dashboard, at, Err(FetchError::Server(500)));
        assert!(banners(&events, BannerSource::Status).is_empty());
        assert_eq!(dashboard.deadline(Timer::StatusPoll), Some(at + config.retry_interval));
    }
    assert_eq!(dashboard.poll_scheduler().consecutive_failures(), 4);
}

#[test]
fn snapshot_without_clock_is_silently_retried() {
    let now = Instant::now();
    let config = DashboardConfig::default();
    let mut dashboard = dashboard();
    dashboard.start();
    let ticket = status_ticket(&requests(&mut dashboard));
    events(&mut dashboard);

    dashboard.handle_response(now, Response::Status { ticket, result: Ok(status(r#"{ "server": {} }"#)) });
    assert!(events(&mut dashboard).is_empty());
    assert!(dashboard.view().is_none());
    assert_eq!(dashboard.deadline(Timer::StatusPoll), Some(now + config.poll_interval));
}

#[test]
fn stale_status_response_is_ignored() {
    let now = Instant::now();
    let mut dashboard = dashboard();
    dashboard.start();
    let stale = status_ticket(&requests(&mut dashboard));
    dashboard.reset();
    dashboard.start();
    let current = status_ticket(&requests(&mut dashboard));
    events(&mut dashboard);
    assert_ne!(stale, current);

    dashboard.handle_response(now, Response::Status { ticket: stale, result: Ok(status_at(1, 1)) });
    assert!(events(&mut dashboard).is_empty());
    assert!(dashboard.poll_scheduler().is_in_flight());

    dashboard.handle_response(now, Response::Status { ticket: current, result: Ok(status_at(1, 1)) });
    assert!(!dashboard.poll_scheduler().is_in_flight());
    assert!(dashboard.view().is_some());
}

#[test]
fn alarm_banner_follows_alarm_edges() {
    let now = Instant::now();
    let mut dashboard = dashboard();
    dashboard.start();
    let ticket = status_ticket(&requests(&mut dashboard));
    dashboard.handle_response(now, Response::Status { ticket, result: Ok(status_at(0, 0)) });
    assert!(!events(&mut dashboard).iter().any(|e| matches!(e, Event::Alarms(_))));

    let with_alarms = |tick: i64, alarms: &str| {
        status(&format!(
            r#"{{ "server": {{ "tick_now": {tick}, "time_now": {tick} }}, "alarms": {alarms} }}"#
        ))
    };
    let alarm_events = |events: Vec<Event>| -> Vec<AlarmUpdate> {
        events
            .into_iter()
            .filter_map(|e| match e {
                Event::Alarms(update) => Some(update),
                _ => None,
            })
            .collect()
    };

    let mut at = now;
    let mut step = |dashboard: &mut TestDashboard, tick: i64, alarms: &str| {
        at += Duration::from_secs(10);
        alarm_events(poll(dashboard, at, Ok(with_alarms(tick, alarms))))
    };

    let raised = step(&mut dashboard, 10, r#"[{ "err": "no_uplink", "set": 1 }]"#);
    assert!(matches!(&raised[..], [AlarmUpdate::Show(lines)] if lines.len() == 1 && lines[0].code == "no_uplink"));
    assert!(raised[0].is_animated());

    assert!(step(&mut dashboard, 20, r#"[{ "err": "no_uplink", "set": 1 }]"#).is_empty());

    let changed = step(
        &mut dashboard,
        30,
        r#"[{ "err": "no_uplink", "set": 1 }, { "err": "packet_drop_hang", "set": true }]"#,
    );
    assert!(matches!(&changed[..], [AlarmUpdate::Update(lines)] if lines.len() == 2));
    assert!(!changed[0].is_animated());

    let cleared = step(&mut dashboard, 40, r#"[{ "err": "no_uplink", "set": 0 }]"#);
    assert_eq!(cleared, vec![AlarmUpdate::Hide]);
    assert!(dashboard.notifications().alarms().is_empty());
}

#[test]
fn switching_metric_twice_keeps_only_the_latest() {
    let now = Instant::now();
    let mut dashboard = dashboard();
    dashboard.start();
    let initial = series_ticket(&requests(&mut dashboard));
    events(&mut dashboard);

    dashboard
        .handle_command(now, Command::SwitchMetric("totals.clients".into()))
        .unwrap();
    let first = series_ticket(&requests(&mut dashboard));
    dashboard
        .handle_command(now, Command::SwitchMetric("totals.tcp_pkts_rx".into()))
        .unwrap();
    let second = series_ticket(&requests(&mut dashboard));
    assert_eq!(
        events(&mut dashboard),
        vec![
            Event::GraphSelected("totals.clients".into()),
            Event::GraphSelected("totals.tcp_pkts_rx".into()),
        ]
    );
    assert!(!dashboard.is_armed(Timer::GraphRefresh));

    let series = GraphSeries::from_slice(br#"{ "values": [[1000, 600], [1060, 1200]] }"#).unwrap();
    for stale in [initial, first] {
        dashboard.handle_response(now, Response::Series { ticket: stale, result: Ok(series.clone()) });
        assert!(events(&mut dashboard).is_empty());
    }

    dashboard.handle_response(now, Response::Series { ticket: second, result: Ok(series) });
    let frames: Vec<_> = events(&mut dashboard)
        .into_iter()
        .filter_map(|e| match e {
            Event::Chart(frame) => Some(frame),
            _ => None,
        })
        .collect();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].metric, "totals.tcp_pkts_rx");
    assert_eq!(frames[0].points, vec![(1_000_000.0, 10.0), (1_060_000.0, 20.0)]);
    assert!(dashboard.is_armed(Timer::GraphRefresh));
}

#[test]
fn range_zoom_and_refresh() {
    let now = Instant::now();
    let config = DashboardConfig::default();
    let mut dashboard = dashboard();
    dashboard.start();
    let ticket = series_ticket(&requests(&mut dashboard));
    let series = GraphSeries::from_slice(br#"{ "values": [[1000, 60], [1060, 120], [1120, 180]] }"#).unwrap();
    dashboard.handle_response(now, Response::Series { ticket, result: Ok(series.clone()) });
    events(&mut dashboard);

    let brushed = now + Duration::from_secs(20);
    dashboard
        .handle_command(
            brushed,
            Command::SelectRange {
                from: 1_060_000.0,
                to: 1_000_000.0,
            },
        )
        .unwrap();
    assert_eq!(dashboard.deadline(Timer::GraphRefresh), Some(brushed + config.graph_interval));

    dashboard.handle_command(brushed, Command::ZoomIn).unwrap();
    let zoomed = events(&mut dashboard);
    assert!(matches!(
        &zoomed[..],
        [Event::Chart(frame)] if frame.window == frame.selection && frame.window.is_some()
    ));

    dashboard.handle_command(brushed, Command::ZoomOut).unwrap();
    assert!(matches!(&events(&mut dashboard)[..], [Event::Chart(frame)] if frame.window.is_none()));

    // a refresh drops the selection
    dashboard
        .handle_command(
            brushed,
            Command::SelectRange {
                from: 1_000_000.0,
                to: 1_060_000.0,
            },
        )
        .unwrap();
    events(&mut dashboard);
    let refresh = brushed + config.graph_interval;
    dashboard.handle_timeout(refresh);
    let ticket = series_ticket(&requests(&mut dashboard));
    dashboard.handle_response(refresh, Response::Series { ticket, result: Ok(series) });
    assert!(matches!(
        &events(&mut dashboard)[..],
        [Event::Chart(frame)] if frame.selection.is_none() && frame.window.is_none()
    ));
    assert!(dashboard.handle_command(refresh, Command::ZoomIn).is_err());
}

#[test]
fn rx_error_popup_names_error_codes() {
    let now = Instant::now();
    let mut dashboard = dashboard();
    dashboard.start();
    let ticket = status_ticket(&requests(&mut dashboard));
    dashboard.handle_response(now, Response::Status { ticket, result: Ok(status_at(10, 1)) });
    events(&mut dashboard);

    dashboard.handle_command(now, Command::ShowRxErrors(12)).unwrap();
    let popup = events(&mut dashboard);
    let [Event::Detail(popup)] = &popup[..] else {
        panic!("expected a detail popup, got {popup:?}");
    };
    assert_eq!(popup.title, "10 packets received");
    assert_eq!(popup.lines.len(), 1);
    assert!(popup.lines[0].ends_with(": 1"));

    assert!(dashboard.handle_command(now, Command::ShowRxErrors(13)).is_err());
}

#[test]
fn zero_interval_timer_fires_once_per_call() {
    let now = Instant::now();
    let config = DashboardConfig {
        motd_interval: Duration::ZERO,
        ..Default::default()
    };
    let mut dashboard = Dashboard::with_rng(config, StdRng::seed_from_u64(7));
    dashboard.start();
    let ticket = status_ticket(&requests(&mut dashboard));
    let snapshot = status(r#"{ "server": { "tick_now": 1, "time_now": 1700000001 }, "motd": "/motd.html" }"#);
    dashboard.handle_response(now, Response::Status { ticket, result: Ok(snapshot) });
    assert_eq!(dashboard.deadline(Timer::Motd), Some(now));
    requests(&mut dashboard);

    dashboard.handle_timeout(now);
    let motd = requests(&mut dashboard)
        .into_iter()
        .filter(|r| matches!(r, Request::Motd { .. }))
        .count();
    assert_eq!(motd, 1);
    assert_eq!(dashboard.deadline(Timer::Motd), Some(now));
}
