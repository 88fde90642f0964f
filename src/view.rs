// Copyright 2024 Saorsa Labs Ltd.
//
// This Saorsa Network Software is licensed under the General Public License (GPL), version 3.
// Please see the file LICENSE-GPL, or visit <http://www.gnu.org/licenses/> for the full text.
//
// Full details available at https://saorsalabs.com/licenses

//! Derived, render-ready view of one snapshot
//!
//! [`build_view`] runs the whole derivation for a snapshot in one go: the
//! registry is rebuilt and every counter passes through the [`RateCache`]
//! before the view is handed out, so a renderer never sees a half-updated
//! pass.

use std::sync::Arc;

use rand::Rng;

use crate::options::StatusOptions;
use crate::rate::{RateCache, block_key, entity_key};
use crate::registry::{EntityId, EntityRegistry, RxHealth};
use crate::snapshot::{CounterBlock, EntityKind, EntityRecord, ServerClock, StatusSnapshot};

/// Counters of the `totals` block, in display order, with their names
pub const TOTALS_KEYS: &[(&str, &str)] = &[
    ("clients", "Clients"),
    ("connects", "Connects"),
    ("tcp_bytes_tx", "Bytes Tx TCP"),
    ("tcp_bytes_rx", "Bytes Rx TCP"),
    ("tcp_pkts_tx", "Packets Tx TCP"),
    ("tcp_pkts_rx", "Packets Rx TCP"),
    ("udp_bytes_tx", "Bytes Tx UDP"),
    ("udp_bytes_rx", "Bytes Rx UDP"),
    ("udp_pkts_tx", "Packets Tx UDP"),
    ("udp_pkts_rx", "Packets Rx UDP"),
    ("sctp_bytes_tx", "Bytes Tx SCTP"),
    ("sctp_bytes_rx", "Bytes Rx SCTP"),
    ("sctp_pkts_tx", "Packets Tx SCTP"),
    ("sctp_pkts_rx", "Packets Rx SCTP"),
];

/// Counters of the `dupecheck` block
pub const DUPECHECK_KEYS: &[(&str, &str)] = &[
    ("dupes_dropped", "Duplicate packets dropped"),
    ("uniques_out", "Unique packets seen"),
];

/// Counters of `dupecheck.variations`
pub const DUPECHECK_VARIATIONS: &[(&str, &str)] = &[
    ("exact", "Exact duplicates"),
    ("space_trim", "Dupes with spaces trimmed from end"),
    ("8bit_strip", "Dupes with 8-bit bytes stripped out"),
    ("8bit_clear", "Dupes with 8th bit set to 0"),
    ("8bit_spaced", "Dupes with 8-bit bytes replaced with spaces"),
    ("low_strip", "Dupes with low bytes stripped out"),
    ("low_spaced", "Dupes with low bytes replaced with spaces"),
    ("del_strip", "Dupes with DEL bytes stripped out"),
    ("del_spaced", "Dupes with DEL bytes replaced with spaces"),
];

/// Memory pools, in display order, with their names
pub const MEMORY_POOLS: &[(&str, &str)] = &[
    ("pbuf_small", "Small pbufs"),
    ("pbuf_medium", "Medium pbufs"),
    ("pbuf_large", "Large pbufs"),
    ("historydb", "Position history"),
    ("dupecheck", "Dupecheck DB"),
    ("client", "Clients"),
    ("client_heard", "Client MsgRcpts"),
    ("filter", "Filter entries"),
    ("filter_wx", "Filter WX stations"),
    ("filter_entrycall", "Filter entrycalls"),
];

/// Software whose peers usually serve a status page on port 14501
const LINKABLE_SOFTWARE: &[&str] = &["aprsc", "aprsd", "javAPRSSrvr"];

/// Port of the status page on linkable servers
const STATUS_PORT: u16 = 14501;

/// One counter with its rate
#[derive(Debug, Clone, PartialEq)]
pub struct CounterRow {
    /// Full metric key, e.g. `totals.clients`
    pub key: String,
    /// Display name
    pub name: &'static str,
    /// Counter value
    pub value: f64,
    /// Formatted rate, empty on the first sample
    pub rate: String,
    /// Whether the counter can be selected for the graph
    pub graphable: bool,
}

/// Gauges of one memory pool; absent gauges stay `None`
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRow {
    /// Pool prefix, e.g. `historydb`
    pub pool: &'static str,
    /// Display name
    pub name: &'static str,
    /// Bytes per cell
    pub cell_size: Option<f64>,
    /// Cells handed out
    pub cells_used: Option<f64>,
    /// Cells allocated but unused
    pub cells_free: Option<f64>,
    /// Bytes in used cells
    pub used_bytes: Option<f64>,
    /// Bytes allocated for the pool
    pub allocated_bytes: Option<f64>,
    /// Blocks allocated
    pub blocks: Option<f64>,
}

impl MemoryRow {
    fn of(block: &CounterBlock, pool: &'static str, name: &'static str) -> Option<Self> {
        let gauge = |field: &str| block.get(&format!("{pool}_{field}"));
        let row = Self {
            pool,
            name,
            cell_size: gauge("cell_size"),
            cells_used: gauge("cells_used"),
            cells_free: gauge("cells_free"),
            used_bytes: gauge("used_bytes"),
            allocated_bytes: gauge("allocated_bytes"),
            blocks: gauge("blocks"),
        };
        let gauges = [
            row.cell_size,
            row.cells_used,
            row.cells_free,
            row.used_bytes,
            row.allocated_bytes,
            row.blocks,
        ];
        gauges.iter().any(Option::is_some).then_some(row)
    }
}

/// The server descriptor as shown
#[derive(Debug, Clone, PartialEq)]
pub struct ServerView {
    /// Server callsign
    pub server_id: Option<String>,
    /// Administrator name
    pub admin: Option<String>,
    /// Administrator email, only when the server allows showing it
    pub email: Option<String>,
    /// Software name and version
    pub software: Option<String>,
    /// Compiled-in features
    pub features: Option<String>,
    /// Operating system
    pub os: Option<String>,
    /// Seconds since startup
    pub uptime: Option<i64>,
    /// Startup time, UNIX seconds
    pub started: Option<i64>,
    /// Server clock
    pub clock: ServerClock,
}

/// Derived columns of one entity row
///
/// The raw columns stay in the snapshot; `index` points at the record.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRow {
    /// Registry id for detail lookups
    pub id: EntityId,
    /// Position in the snapshot's array for this kind
    pub index: usize,
    /// Combined `"tx / rx/s"` byte rate
    pub bytes_rates: String,
    /// Accepted connections per second, listeners only
    pub connects_rates: Option<String>,
    /// Receive error highlighting
    pub rx_health: RxHealth,
    /// Whether a certificate popup is available
    pub has_certificate: bool,
    /// Status page of a linkable peer server
    pub status_url: Option<String>,
}

/// Everything a renderer needs for one pass
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardView {
    /// The snapshot the view was derived from
    pub snapshot: Arc<StatusSnapshot>,
    /// Server descriptor
    pub server: ServerView,
    /// `totals` rows present in the snapshot
    pub totals: Vec<CounterRow>,
    /// `dupecheck` rows present in the snapshot
    pub dupecheck: Vec<CounterRow>,
    /// `dupecheck.variations` rows present in the snapshot
    pub dupecheck_variations: Vec<CounterRow>,
    /// Memory pools present in the snapshot
    pub memory: Vec<MemoryRow>,
    rows: [Vec<EntityRow>; EntityKind::ALL.len()],
    /// Server ticks since the previous snapshot
    pub tick_delta: Option<i64>,
    /// Parsed `status_options`
    pub options: StatusOptions,
}

impl DashboardView {
    /// Rows of one entity kind, parallel to the snapshot's array
    pub fn rows(&self, kind: EntityKind) -> &[EntityRow] {
        &self.rows[kind as usize]
    }

    /// The record behind a row
    pub fn record(&self, kind: EntityKind, row: &EntityRow) -> Option<&EntityRecord> {
        self.snapshot.entities(kind).get(row.index)
    }
}

/// Derive the view of `snapshot`
///
/// `previous_tick` is the tick of the snapshot before, if any;
/// `graphable` tells which counter keys can be graphed.
pub fn build_view<R: Rng>(
    snapshot: Arc<StatusSnapshot>,
    clock: ServerClock,
    previous_tick: Option<i64>,
    options: StatusOptions,
    rates: &mut RateCache,
    registry: &mut EntityRegistry<R>,
    graphable: impl Fn(&str) -> bool,
) -> DashboardView {
    let tick = clock.tick_now;
    let ids = registry.rebuild(snapshot.clone());

    let mut counters = |block: Option<&CounterBlock>, prefix: &str, keys: &[(&str, &'static str)]| {
        let Some(block) = block else {
            return Vec::new();
        };
        keys.iter()
            .filter_map(|&(counter, name)| {
                let value = block.get(counter)?;
                let key = block_key(prefix, counter);
                let rate = rates.observe(&key, tick, value, false).rate;
                Some(CounterRow {
                    graphable: graphable(&key),
                    key,
                    name,
                    value,
                    rate,
                })
            })
            .collect::<Vec<_>>()
    };

    let totals = counters(snapshot.totals.as_ref(), "totals", TOTALS_KEYS);
    let dupecheck = counters(snapshot.dupecheck.as_ref(), "dupecheck", DUPECHECK_KEYS);
    let variations = snapshot.dupecheck.as_ref().and_then(|d| d.nested("variations"));
    let dupecheck_variations = counters(variations.as_ref(), "dupecheck.variations", DUPECHECK_VARIATIONS);

    let memory = match &snapshot.memory {
        Some(block) => MEMORY_POOLS
            .iter()
            .filter_map(|&(pool, name)| MemoryRow::of(block, pool, name))
            .collect(),
        None => Vec::new(),
    };

    let mut rows: [Vec<EntityRow>; EntityKind::ALL.len()] = Default::default();
    for kind in EntityKind::ALL {
        rows[kind as usize] = snapshot
            .entities(kind)
            .iter()
            .zip(ids.get(kind))
            .enumerate()
            .map(|(index, (record, &id))| entity_row(kind, index, id, record, tick, rates))
            .collect();
    }

    let info = &snapshot.server;
    let server = ServerView {
        server_id: info.server_id.clone(),
        admin: info.admin.clone(),
        email: info.email.clone().filter(|_| options.show_email()),
        software: match (&info.software, &info.software_version) {
            (Some(name), Some(version)) => Some(format!("{name} {version}")),
            (name, _) => name.clone(),
        },
        features: info.software_build_features.clone().filter(|f| !f.is_empty()),
        os: info.os.clone(),
        uptime: info.uptime,
        started: info.t_started,
        clock,
    };

    DashboardView {
        server,
        totals,
        dupecheck,
        dupecheck_variations,
        memory,
        rows,
        tick_delta: previous_tick.and_then(|previous| tick.checked_sub(previous)),
        options,
        snapshot,
    }
}

fn entity_row(
    kind: EntityKind,
    index: usize,
    id: EntityId,
    record: &EntityRecord,
    tick: i64,
    rates: &mut RateCache,
) -> EntityRow {
    let addr = match record.transport_addr() {
        Some(addr) => addr.to_string(),
        None => format!("#{id}"),
    };

    let bytes_rates = match (record.bytes_tx, record.bytes_rx) {
        (None, None) => String::new(),
        (tx, rx) => rates.observe_pair(
            &entity_key(kind, &addr, "bytes_tx"),
            &entity_key(kind, &addr, "bytes_rx"),
            tick,
            tx.unwrap_or(0) as f64,
            rx.unwrap_or(0) as f64,
        ),
    };

    let connects_rates = match (kind, record.connects) {
        (EntityKind::Listener, Some(connects)) => Some(
            rates
                .observe(&entity_key(kind, &addr, "connects"), tick, connects as f64, false)
                .rate,
        ),
        _ => None,
    };

    EntityRow {
        id,
        index,
        bytes_rates,
        connects_rates,
        rx_health: RxHealth::of(record),
        has_certificate: record.has_certificate(),
        status_url: status_url(record),
    }
}

/// Status page of a server-to-server connection running linkable software
fn status_url(record: &EntityRecord) -> Option<String> {
    let app = record.app_name.as_deref()?;
    if !LINKABLE_SOFTWARE.contains(&app) {
        return None;
    }
    let addr = record.addr_rem.as_deref()?;
    Some(format!("http://{}:{STATUS_PORT}", host_of(addr)))
}

/// Host part of `host:port`, keeping bracketed IPv6 literals intact
fn host_of(addr: &str) -> &str {
    match (addr.rfind(':'), addr.rfind(']')) {
        (Some(colon), Some(bracket)) if bracket > colon => addr,
        (Some(colon), _) => &addr[..colon],
        (None, _) => addr,
    }
}
