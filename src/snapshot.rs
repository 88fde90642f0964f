// Copyright 2024 Saorsa Labs Ltd.
//
// This Saorsa Network Software is licensed under the General Public License (GPL), version 3.
// Please see the file LICENSE-GPL, or visit <http://www.gnu.org/licenses/> for the full text.
//
// Full details available at https://saorsalabs.com/licenses

//! Schema of the documents served by the status port
//!
//! Every field the server may leave out is an `Option`, so "absent" and
//! "present but zero" stay distinguishable all the way to the view.

use std::fmt;

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::error::FetchError;

/// One decoded `/status.json` document
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StatusSnapshot {
    /// Server descriptor and clock
    #[serde(default)]
    pub server: ServerInfo,
    /// Server-wide totals
    #[serde(default)]
    pub totals: Option<CounterBlock>,
    /// Duplicate filter counters
    #[serde(default)]
    pub dupecheck: Option<CounterBlock>,
    /// Memory pool gauges, `<pool>_cells_used` and so on
    #[serde(default)]
    pub memory: Option<CounterBlock>,
    /// Listening sockets
    #[serde(default)]
    pub listeners: Vec<EntityRecord>,
    /// Outgoing uplink connections
    #[serde(default)]
    pub uplinks: Vec<EntityRecord>,
    /// Peer servers
    #[serde(default)]
    pub peers: Vec<EntityRecord>,
    /// Connected clients
    #[serde(default)]
    pub clients: Vec<EntityRecord>,
    /// Alarm component; `None` when the server has no alarm support
    #[serde(default)]
    pub alarms: Option<Vec<Alarm>>,
    /// URL of the message of the day
    #[serde(default)]
    pub motd: Option<String>,
    /// Space separated `key=value` display options
    #[serde(default)]
    pub status_options: Option<String>,
    /// Names of the receive error codes, indexed like each entity's `rx_errs`
    #[serde(default)]
    pub rx_errs: Option<Vec<String>>,
}

impl StatusSnapshot {
    /// Decode a `/status.json` body
    pub fn from_slice(body: &[u8]) -> Result<Self, FetchError> {
        serde_json::from_slice(body).map_err(|e| FetchError::InvalidBody(e.to_string()))
    }

    /// The server clock, or [`FetchError::MalformedPayload`] when the server
    /// has not reported it yet
    pub fn clock(&self) -> Result<ServerClock, FetchError> {
        let time_now = self
            .server
            .time_now
            .ok_or(FetchError::MalformedPayload("server.time_now"))?;
        let tick_now = self
            .server
            .tick_now
            .ok_or(FetchError::MalformedPayload("server.tick_now"))?;
        Ok(ServerClock { time_now, tick_now })
    }

    /// The records of one entity kind, in server order
    pub fn entities(&self, kind: EntityKind) -> &[EntityRecord] {
        match kind {
            EntityKind::Listener => &self.listeners,
            EntityKind::Uplink => &self.uplinks,
            EntityKind::Peer => &self.peers,
            EntityKind::Client => &self.clients,
        }
    }
}

/// Server time as reported in one snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerClock {
    /// Wall clock, UNIX seconds
    pub time_now: i64,
    /// Monotonic tick, seconds; the timestamp used for rate derivation
    pub tick_now: i64,
}

/// The `server` block
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[allow(missing_docs)]
pub struct ServerInfo {
    pub server_id: Option<String>,
    pub admin: Option<String>,
    pub email: Option<String>,
    pub software: Option<String>,
    pub software_version: Option<String>,
    pub software_build_features: Option<String>,
    pub os: Option<String>,
    pub uptime: Option<i64>,
    pub t_started: Option<i64>,
    pub time_now: Option<i64>,
    pub tick_now: Option<i64>,
}

/// A flat block of named counters such as `totals` or `dupecheck`
///
/// Non-numeric members are kept but never read as counters.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct CounterBlock(Map<String, Value>);

impl CounterBlock {
    /// Numeric value of a counter, `None` when absent or not a number
    pub fn get(&self, key: &str) -> Option<f64> {
        self.0.get(key)?.as_f64()
    }

    /// A nested block, such as `dupecheck.variations`
    pub fn nested(&self, key: &str) -> Option<Self> {
        match self.0.get(key)? {
            Value::Object(map) => Some(Self(map.clone())),
            _ => None,
        }
    }

    /// Whether the block has no members at all
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, f64)> for CounterBlock {
    fn from_iter<T: IntoIterator<Item = (String, f64)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
    }
}

/// One entry of the `alarms` array
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Alarm {
    /// Alarm code, e.g. `no_uplink`
    pub err: String,
    /// Whether the alarm is currently raised
    #[serde(default, deserialize_with = "flag")]
    pub set: bool,
}

/// Kind of entity row
#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub enum EntityKind {
    /// Listening socket
    Listener = 0,
    /// Outgoing uplink
    Uplink = 1,
    /// Peer server
    Peer = 2,
    /// Client connection
    Client = 3,
}

impl EntityKind {
    /// Every kind, in display order
    pub const ALL: [Self; 4] = [Self::Listener, Self::Uplink, Self::Peer, Self::Client];

    /// Name of the snapshot array holding this kind
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Listener => "listeners",
            Self::Uplink => "uplinks",
            Self::Peer => "peers",
            Self::Client => "clients",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One listener, uplink, peer or client
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[allow(missing_docs)]
pub struct EntityRecord {
    /// Server-assigned handle; absent or negative for pseudo-connections
    pub fd: Option<i64>,
    /// Listener address
    pub addr: Option<String>,
    /// Remote address of a connection
    pub addr_rem: Option<String>,
    /// Local address of a connection
    pub addr_loc: Option<String>,
    pub proto: Option<String>,
    pub name: Option<String>,
    pub username: Option<String>,
    pub app_name: Option<String>,
    pub app_version: Option<String>,
    pub mode: Option<String>,
    pub verified: Option<i64>,
    pub t_connect: Option<i64>,
    pub since_connect: Option<i64>,
    pub since_last_read: Option<i64>,
    pub clients: Option<u64>,
    pub clients_peak: Option<u64>,
    pub clients_max: Option<u64>,
    pub connects: Option<u64>,
    pub pkts_tx: Option<u64>,
    pub pkts_rx: Option<u64>,
    pub bytes_tx: Option<u64>,
    pub bytes_rx: Option<u64>,
    pub pkts_dup: Option<u64>,
    pub pkts_ign: Option<u64>,
    pub obuf_q: Option<u64>,
    pub heard_count: Option<u64>,
    pub filter: Option<String>,
    /// Receive error histogram, indexed like [`StatusSnapshot::rx_errs`]
    pub rx_errs: Option<Vec<u64>>,
    pub cert_subject: Option<String>,
    pub cert_issuer: Option<String>,
}

impl EntityRecord {
    /// The transport address identifying this entity across reconnects
    pub fn transport_addr(&self) -> Option<&str> {
        self.addr_rem.as_deref().or(self.addr.as_deref())
    }

    /// The server-assigned id when it is usable as a lookup key
    pub fn server_id(&self) -> Option<i64> {
        self.fd.filter(|fd| *fd >= 0)
    }

    /// Whether the entity carries any certificate information
    pub fn has_certificate(&self) -> bool {
        self.cert_subject.is_some() || self.cert_issuer.is_some()
    }
}

/// Response of `/counterdata?<metric>`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GraphSeries {
    /// `(timestamp seconds, value)` pairs in time order
    #[serde(default)]
    pub values: Vec<(f64, f64)>,
}

impl GraphSeries {
    /// Decode a `/counterdata` body
    pub fn from_slice(body: &[u8]) -> Result<Self, FetchError> {
        serde_json::from_slice(body).map_err(|e| FetchError::InvalidBody(e.to_string()))
    }
}

/// Accept `true`/`false` as well as numeric flags (`"set": 1`)
fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Number(f64),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Number(n) => n != 0.0,
    })
}
