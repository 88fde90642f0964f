// Copyright 2024 Saorsa Labs Ltd.
//
// This Saorsa Network Software is licensed under the General Public License (GPL), version 3.
// Please see the file LICENSE-GPL, or visit <http://www.gnu.org/licenses/> for the full text.
//
// Full details available at https://saorsalabs.com/licenses

//! Historical graph of one metric
//!
//! The graph runs on its own timer, independent of the status poll. Every
//! metric switch bumps a generation counter so a series fetched for a previous
//! selection can never reach the chart.
//!
//! ```text
//!                switch_metric
//!  Unselected ─────────────────► Selected ◄──────────────┐
//!                                  │   ▲                  │ clear_selection,
//!                     select_range │   │ refresh success  │ refresh success
//!                                  ▼   │                  │
//!                                 Ranged ──zoom_in──► Zoomed
//!                                   ▲                    │
//!                                   └──────zoom_out──────┘
//! ```

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::DashboardConfig;
use crate::error::{FailureClass, FetchError, GraphError};
use crate::event::{Request, Ticket};
use crate::snapshot::GraphSeries;
use crate::timer::{Timer, TimerTable};

/// Graphable metrics as `(key, label, divisor)`
///
/// Byte and packet counters are sampled per minute, so a divisor of 60 turns
/// them into per-second figures.
const GRAPHS: &[(&str, &str, Option<f64>)] = &[
    ("totals.clients", "Clients allocated", None),
    ("totals.connects", "Incoming connections/min", None),
    ("totals.tcp_bytes_rx", "Bytes/s Rx, TCP", Some(60.0)),
    ("totals.tcp_bytes_tx", "Bytes/s Tx, TCP", Some(60.0)),
    ("totals.udp_bytes_rx", "Bytes/s Rx, UDP", Some(60.0)),
    ("totals.udp_bytes_tx", "Bytes/s Tx, UDP", Some(60.0)),
    ("totals.sctp_bytes_rx", "Bytes/s Rx, SCTP", Some(60.0)),
    ("totals.sctp_bytes_tx", "Bytes/s Tx, SCTP", Some(60.0)),
    ("totals.tcp_pkts_rx", "APRS-IS packets/s Rx, TCP", Some(60.0)),
    ("totals.tcp_pkts_tx", "APRS-IS packets/s Tx, TCP", Some(60.0)),
    ("totals.udp_pkts_rx", "APRS-IS packets/s Rx, UDP", Some(60.0)),
    ("totals.udp_pkts_tx", "APRS-IS packets/s Tx, UDP", Some(60.0)),
    ("totals.sctp_pkts_rx", "APRS-IS packets/s Rx, SCTP", Some(60.0)),
    ("totals.sctp_pkts_tx", "APRS-IS packets/s Tx, SCTP", Some(60.0)),
    ("dupecheck.dupes_dropped", "Duplicate packets dropped/s", Some(60.0)),
    ("dupecheck.uniques_out", "Unique packets/s", Some(60.0)),
];

/// How a metric is presented on the chart
#[derive(Debug, Clone, PartialEq)]
pub struct GraphSpec {
    /// Legend text
    pub label: String,
    /// Every value is divided by this before plotting
    pub divisor: Option<f64>,
}

/// The set of metrics that may be graphed
#[derive(Debug, Clone, PartialEq)]
pub struct GraphCatalog {
    specs: BTreeMap<String, GraphSpec>,
}

impl Default for GraphCatalog {
    fn default() -> Self {
        GRAPHS
            .iter()
            .map(|&(key, label, divisor)| {
                (
                    key.to_string(),
                    GraphSpec {
                        label: label.to_string(),
                        divisor,
                    },
                )
            })
            .collect()
    }
}

impl FromIterator<(String, GraphSpec)> for GraphCatalog {
    fn from_iter<T: IntoIterator<Item = (String, GraphSpec)>>(iter: T) -> Self {
        Self {
            specs: iter.into_iter().collect(),
        }
    }
}

impl GraphCatalog {
    /// Presentation of a metric, `None` when it cannot be graphed
    pub fn get(&self, key: &str) -> Option<&GraphSpec> {
        self.specs.get(key)
    }

    /// Whether a metric can be graphed
    pub fn contains(&self, key: &str) -> bool {
        self.specs.contains_key(key)
    }

    /// Metric keys in order
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.specs.keys().map(String::as_str)
    }
}

/// A span of the chart's x axis, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    /// Start, never after `to`
    pub from: f64,
    /// End
    pub to: f64,
}

impl TimeRange {
    /// A range between two brush positions, rounded to whole units and
    /// ordered
    pub fn new(a: f64, b: f64) -> Self {
        let (a, b) = (a.round(), b.round());
        if a <= b {
            Self { from: a, to: b }
        } else {
            Self { from: b, to: a }
        }
    }

    /// Whether `x` falls inside the range
    pub fn contains(&self, x: f64) -> bool {
        self.from <= x && x <= self.to
    }
}

/// Selection and zoom state of the chart
#[derive(Debug, Clone, PartialEq)]
pub enum GraphState {
    /// No metric chosen yet
    Unselected,
    /// A metric is graphed in full
    Selected {
        /// Metric key
        metric: String,
    },
    /// A range is brushed but the chart shows the whole series
    Ranged {
        /// Metric key
        metric: String,
        /// The brushed range
        range: TimeRange,
    },
    /// The chart window is narrowed to the brushed range
    Zoomed {
        /// Metric key
        metric: String,
        /// The brushed range, also the visible window
        range: TimeRange,
    },
}

impl GraphState {
    /// The graphed metric
    pub fn metric(&self) -> Option<&str> {
        match self {
            Self::Unselected => None,
            Self::Selected { metric } | Self::Ranged { metric, .. } | Self::Zoomed { metric, .. } => {
                Some(metric)
            }
        }
    }

    /// The brushed range
    pub fn range(&self) -> Option<TimeRange> {
        match self {
            Self::Ranged { range, .. } | Self::Zoomed { range, .. } => Some(*range),
            _ => None,
        }
    }
}

/// Everything the chart widget needs to draw
#[derive(Debug, Clone, PartialEq)]
pub struct ChartFrame {
    /// Metric key
    pub metric: String,
    /// Legend text
    pub label: String,
    /// `(milliseconds, scaled value)` pairs
    pub points: Vec<(f64, f64)>,
    /// Visible x range; `None` shows the whole series
    pub window: Option<TimeRange>,
    /// Brushed range to highlight
    pub selection: Option<TimeRange>,
    /// Lower bound of the y axis
    pub y_min: f64,
}

/// What a series response amounted to
#[derive(Debug, Clone, PartialEq)]
pub enum GraphOutcome {
    /// The chart must be redrawn
    Chart(ChartFrame),
    /// The request failed; a retry is armed
    Failed(FetchError),
    /// The response belongs to a superseded request
    Stale,
}

/// Convert a server series to chart points
///
/// Timestamps go from seconds to milliseconds; values are divided by
/// `divisor` when one is given.
pub fn scale(series: &GraphSeries, divisor: Option<f64>) -> Vec<(f64, f64)> {
    let divisor = divisor.filter(|d| *d != 0.0).unwrap_or(1.0);
    series
        .values
        .iter()
        .map(|&(ts, value)| (ts * 1000.0, value / divisor))
        .collect()
}

/// Banner text for a failed series request
pub fn failure_message(error: &FetchError) -> String {
    let reason = match error.class() {
        FailureClass::Timeout => "timeout".to_string(),
        FailureClass::NetworkError => "network error".to_string(),
        FailureClass::Other(Some(status)) => format!("HTTP status {status}"),
        FailureClass::Other(None) | FailureClass::NotReady => "invalid data".to_string(),
    };
    format!("Graph data download failed ({reason}). Server or network down?")
}

/// Owns the graph's metric, series and zoom state
#[derive(Debug)]
pub struct GraphController {
    catalog: GraphCatalog,
    request_timeout: Duration,
    refresh_interval: Duration,
    state: GraphState,
    generation: u64,
    in_flight: Option<Ticket>,
    points: Option<Vec<(f64, f64)>>,
}

impl GraphController {
    /// Create an unselected controller with the default catalog
    pub fn new(config: &DashboardConfig) -> Self {
        Self::with_catalog(config, GraphCatalog::default())
    }

    /// Create an unselected controller graphing metrics from `catalog`
    pub fn with_catalog(config: &DashboardConfig, catalog: GraphCatalog) -> Self {
        Self {
            catalog,
            request_timeout: config.graph_timeout,
            refresh_interval: config.graph_interval,
            state: GraphState::Unselected,
            generation: 0,
            in_flight: None,
            points: None,
        }
    }

    /// Graph another metric, fetching its series immediately
    ///
    /// Any pending refresh is cancelled and any in-flight response becomes
    /// stale. Range and zoom are dropped.
    pub fn switch_metric(&mut self, metric: &str, timers: &mut TimerTable) -> Result<Request, GraphError> {
        if !self.catalog.contains(metric) {
            return Err(GraphError::UnknownMetric(metric.to_string()));
        }
        info!(metric, "graphing metric");
        self.state = GraphState::Selected {
            metric: metric.to_string(),
        };
        self.points = None;
        Ok(self.issue(metric.to_string(), timers))
    }

    fn issue(&mut self, metric: String, timers: &mut TimerTable) -> Request {
        timers.stop(Timer::GraphRefresh);
        self.generation += 1;
        let ticket = Ticket(self.generation);
        self.in_flight = Some(ticket);
        debug!(%ticket, metric, "requesting series");
        Request::Series {
            ticket,
            metric,
            timeout: self.request_timeout,
        }
    }

    /// React to the refresh timer firing
    ///
    /// A response still outstanding for an earlier refresh is superseded.
    pub fn handle_timeout(&mut self, timers: &mut TimerTable) -> Option<Request> {
        let metric = self.state.metric()?.to_string();
        Some(self.issue(metric, timers))
    }

    /// Consume a series response and arm the next refresh
    pub fn handle_response(
        &mut self,
        now: Instant,
        ticket: Ticket,
        result: Result<GraphSeries, FetchError>,
        timers: &mut TimerTable,
    ) -> GraphOutcome {
        if self.in_flight != Some(ticket) {
            debug!(%ticket, current = ?self.in_flight, "discarding stale series");
            return GraphOutcome::Stale;
        }
        self.in_flight = None;
        timers.set(Timer::GraphRefresh, now + self.refresh_interval);

        let Some(metric) = self.state.metric().map(str::to_string) else {
            return GraphOutcome::Stale;
        };
        match result {
            Ok(series) => {
                let divisor = self.catalog.get(&metric).and_then(|spec| spec.divisor);
                self.points = Some(scale(&series, divisor));
                // a fresh series is drawn unselected
                self.state = GraphState::Selected { metric };
                match self.frame() {
                    Some(frame) => GraphOutcome::Chart(frame),
                    None => GraphOutcome::Stale,
                }
            }
            Err(error) => {
                warn!(%ticket, metric, %error, "series request failed");
                GraphOutcome::Failed(error)
            }
        }
    }

    /// Record a brushed range
    ///
    /// No data is fetched; the next refresh is pushed a full interval into
    /// the future so it does not wipe the selection right away. Returns a
    /// frame to draw when the chart was zoomed, since the new range replaces
    /// the old window.
    pub fn select_range(
        &mut self,
        now: Instant,
        from: f64,
        to: f64,
        timers: &mut TimerTable,
    ) -> Result<Option<ChartFrame>, GraphError> {
        let metric = self.state.metric().ok_or(GraphError::NoMetric)?.to_string();
        let was_zoomed = matches!(self.state, GraphState::Zoomed { .. });
        self.state = GraphState::Ranged {
            metric,
            range: TimeRange::new(from, to),
        };
        timers.set(Timer::GraphRefresh, now + self.refresh_interval);
        Ok(if was_zoomed { self.frame() } else { None })
    }

    /// Drop the range and zoom
    pub fn clear_selection(&mut self) -> Option<ChartFrame> {
        match &self.state {
            GraphState::Ranged { metric, .. } | GraphState::Zoomed { metric, .. } => {
                self.state = GraphState::Selected {
                    metric: metric.clone(),
                };
                self.frame()
            }
            _ => None,
        }
    }

    /// Narrow the chart window to the brushed range
    pub fn zoom_in(&mut self) -> Result<Option<ChartFrame>, GraphError> {
        match &self.state {
            GraphState::Unselected => Err(GraphError::NoMetric),
            GraphState::Selected { .. } => Err(GraphError::NoRange),
            GraphState::Ranged { metric, range } | GraphState::Zoomed { metric, range } => {
                self.state = GraphState::Zoomed {
                    metric: metric.clone(),
                    range: *range,
                };
                Ok(self.frame())
            }
        }
    }

    /// Show the whole series again, keeping the brushed range
    pub fn zoom_out(&mut self) -> Option<ChartFrame> {
        if let GraphState::Zoomed { metric, range } = &self.state {
            self.state = GraphState::Ranged {
                metric: metric.clone(),
                range: *range,
            };
        }
        self.frame()
    }

    /// Disarm the refresh and forget everything
    pub fn stop(&mut self, timers: &mut TimerTable) {
        timers.stop(Timer::GraphRefresh);
        self.state = GraphState::Unselected;
        self.in_flight = None;
        self.points = None;
    }

    /// The chart as it should currently be drawn, once a series is loaded
    pub fn frame(&self) -> Option<ChartFrame> {
        let metric = self.state.metric()?;
        let points = self.points.as_ref()?;
        let label = self
            .catalog
            .get(metric)
            .map_or_else(|| metric.to_string(), |spec| spec.label.clone());
        let window = match self.state {
            GraphState::Zoomed { range, .. } => Some(range),
            _ => None,
        };
        Some(ChartFrame {
            metric: metric.to_string(),
            label,
            points: points.clone(),
            window,
            selection: self.state.range(),
            y_min: 0.0,
        })
    }

    /// Current selection and zoom state
    pub fn state(&self) -> &GraphState {
        &self.state
    }

    /// Whether `key` is the graphed metric
    pub fn is_selected(&self, key: &str) -> bool {
        self.state.metric() == Some(key)
    }

    /// The metrics that may be graphed
    pub fn catalog(&self) -> &GraphCatalog {
        &self.catalog
    }

    /// Whether a series request is outstanding
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }
}
