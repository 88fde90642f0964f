// Copyright 2024 Saorsa Labs Ltd.
//
// This Saorsa Network Software is licensed under the General Public License (GPL), version 3.
// Please see the file LICENSE-GPL, or visit <http://www.gnu.org/licenses/> for the full text.
//
// Full details available at https://saorsalabs.com/licenses

//! Messages crossing the boundary of the sans-IO core

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::error::FetchError;
use crate::graph::ChartFrame;
use crate::notify::{AlarmUpdate, BannerSource};
use crate::registry::{DetailPopup, EntityId};
use crate::snapshot::{GraphSeries, StatusSnapshot};
use crate::view::DashboardView;

/// Generation number tying a response to the request that caused it
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(pub(crate) u64);

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A request the driver must perform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// `GET /status.json`
    Status {
        /// Echo back in [`Response::Status`]
        ticket: Ticket,
        /// Give up after this long
        timeout: Duration,
    },
    /// `GET /counterdata?<metric>`
    Series {
        /// Echo back in [`Response::Series`]
        ticket: Ticket,
        /// Metric key, e.g. `totals.tcp_bytes_rx`
        metric: String,
        /// Give up after this long
        timeout: Duration,
    },
    /// `GET <url>` for the message of the day
    Motd {
        /// Echo back in [`Response::Motd`]
        ticket: Ticket,
        /// URL from the snapshot, possibly relative to the server base
        url: String,
        /// Give up after this long
        timeout: Duration,
    },
}

impl Request {
    /// How long the request may take
    pub fn timeout(&self) -> Duration {
        match self {
            Self::Status { timeout, .. } | Self::Series { timeout, .. } | Self::Motd { timeout, .. } => *timeout,
        }
    }

    /// Ticket the response must echo
    pub fn ticket(&self) -> Ticket {
        match self {
            Self::Status { ticket, .. } | Self::Series { ticket, .. } | Self::Motd { ticket, .. } => *ticket,
        }
    }

    /// The response reporting that this request failed with `error`
    pub fn fail(self, error: FetchError) -> Response {
        match self {
            Self::Status { ticket, .. } => Response::Status {
                ticket,
                result: Err(error),
            },
            Self::Series { ticket, .. } => Response::Series {
                ticket,
                result: Err(error),
            },
            Self::Motd { ticket, .. } => Response::Motd {
                ticket,
                result: Err(error),
            },
        }
    }
}

/// Outcome of a [`Request`]
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Outcome of [`Request::Status`]
    Status {
        /// Ticket of the request
        ticket: Ticket,
        /// Decoded document or failure
        result: Result<StatusSnapshot, FetchError>,
    },
    /// Outcome of [`Request::Series`]
    Series {
        /// Ticket of the request
        ticket: Ticket,
        /// Decoded series or failure
        result: Result<GraphSeries, FetchError>,
    },
    /// Outcome of [`Request::Motd`]
    Motd {
        /// Ticket of the request
        ticket: Ticket,
        /// Body text or failure
        result: Result<String, FetchError>,
    },
}

/// Something the renderer should show
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A freshly derived view of the latest snapshot
    Render(Arc<DashboardView>),
    /// Show (`Some`) or clear (`None`) an error banner
    ErrorBanner {
        /// Which subsystem the banner belongs to
        source: BannerSource,
        /// Banner text
        message: Option<String>,
    },
    /// Alarm banner change
    Alarms(AlarmUpdate),
    /// Show (`Some`) or hide (`None`) the message of the day
    Motd(Option<String>),
    /// Redraw the chart
    Chart(ChartFrame),
    /// The graphed metric changed; mark its label cell selected
    GraphSelected(String),
    /// Open a detail popup
    Detail(DetailPopup),
}

/// A user gesture
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Graph another metric
    SwitchMetric(String),
    /// Brush-select a range on the chart, in chart time units
    SelectRange {
        /// Start of the range
        from: f64,
        /// End of the range
        to: f64,
    },
    /// Drop the range selection
    ClearSelection,
    /// Zoom the chart to the selected range
    ZoomIn,
    /// Show the whole series again
    ZoomOut,
    /// Open the receive error popup of an entity
    ShowRxErrors(EntityId),
    /// Open the certificate popup of an entity
    ShowCertificate(EntityId),
}

/// A command line that is not a [`Command`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot parse command {input:?}: {reason}")]
pub struct CommandParseError {
    input: String,
    reason: &'static str,
}

impl FromStr for Command {
    type Err = CommandParseError;

    /// Parse the interactive syntax: `graph <metric>`, `range <from> <to>`,
    /// `clear`, `zoom in`, `zoom out`, `rxerr <id>`, `cert <id>`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |reason| CommandParseError {
            input: s.to_string(),
            reason,
        };
        let number = |word: Option<&str>| -> Result<f64, CommandParseError> {
            word.ok_or_else(|| err("missing number"))?
                .parse()
                .map_err(|_| err("not a number"))
        };
        let id = |word: Option<&str>| -> Result<EntityId, CommandParseError> {
            word.ok_or_else(|| err("missing id"))?
                .parse()
                .map_err(|_| err("not an id"))
        };

        let mut words = s.split_whitespace();
        let command = match words.next() {
            Some("graph") => Self::SwitchMetric(words.next().ok_or_else(|| err("missing metric"))?.to_string()),
            Some("range") => Self::SelectRange {
                from: number(words.next())?,
                to: number(words.next())?,
            },
            Some("clear") => Self::ClearSelection,
            Some("zoom") => match words.next() {
                Some("in") => Self::ZoomIn,
                Some("out") => Self::ZoomOut,
                _ => return Err(err("expected `zoom in` or `zoom out`")),
            },
            Some("rxerr") => Self::ShowRxErrors(id(words.next())?),
            Some("cert") => Self::ShowCertificate(id(words.next())?),
            Some(_) => return Err(err("unknown command")),
            None => return Err(err("empty command")),
        };

        if words.next().is_some() {
            return Err(err("trailing input"));
        }
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(
            "graph totals.clients".parse::<Command>().unwrap(),
            Command::SwitchMetric("totals.clients".into())
        );
        assert_eq!(
            "range 1000 2000.5".parse::<Command>().unwrap(),
            Command::SelectRange {
                from: 1000.0,
                to: 2000.5
            }
        );
        assert_eq!("zoom in".parse::<Command>().unwrap(), Command::ZoomIn);
        assert_eq!(" zoom out ".parse::<Command>().unwrap(), Command::ZoomOut);
        assert_eq!("clear".parse::<Command>().unwrap(), Command::ClearSelection);
        assert_eq!(
            "rxerr -4294967296".parse::<Command>().unwrap(),
            Command::ShowRxErrors(-4_294_967_296)
        );
        assert_eq!("cert 12".parse::<Command>().unwrap(), Command::ShowCertificate(12));
    }

    #[test]
    fn rejects_bad_commands() {
        assert!("".parse::<Command>().is_err());
        assert!("graph".parse::<Command>().is_err());
        assert!("zoom sideways".parse::<Command>().is_err());
        assert!("range 1".parse::<Command>().is_err());
        assert!("cert abc".parse::<Command>().is_err());
        assert!("clear now".parse::<Command>().is_err());
        assert!("reboot".parse::<Command>().is_err());
    }
}
