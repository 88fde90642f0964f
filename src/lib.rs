//! aprsc-dash: live status dashboard engine for aprsc APRS-IS servers
//!
//! The crate polls a server's `/status.json`, derives per-second rates from the
//! raw counters it reports, keeps a short-lived registry of the connected
//! entities for click-to-reveal details, and drives a historical graph with
//! range selection and zoom.
//!
//! The library is split the same way a sans-IO protocol stack is:
//! - [`Dashboard`]: the deterministic core. It is fed timeouts, responses and
//!   user commands, and it is drained for requests to perform and events to
//!   render. It never touches the network or the clock.
//! - [`driver`]: a tokio event loop that performs the requests through a
//!   [`Fetcher`] and hands events to a [`Renderer`].
//! - [`render`]: a plain-text renderer used by the `aprsc-dash` binary.

#![warn(missing_docs)]
#![warn(unreachable_pub)]
#![warn(clippy::use_self)]

pub mod config;
mod dashboard;
pub mod driver;
mod error;
mod event;
pub mod fetch;
pub mod graph;
mod labels;
pub mod notify;
mod options;
pub mod poll;
pub mod rate;
pub mod registry;
pub mod render;
pub mod snapshot;
pub mod timer;
pub mod view;

pub use config::{DashboardConfig, DashboardConfigBuilder};
pub use dashboard::Dashboard;
pub use driver::{Driver, Renderer};
pub use error::{CommandError, ConfigError, FailureClass, FetchError, GraphError};
pub use event::{Command, CommandParseError, Event, Request, Response, Ticket};
pub use fetch::{Fetcher, HttpFetcher};
pub use options::StatusOptions;
pub use snapshot::{EntityKind, EntityRecord, GraphSeries, StatusSnapshot};
