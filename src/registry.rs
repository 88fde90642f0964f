// Copyright 2024 Saorsa Labs Ltd.
//
// This Saorsa Network Software is licensed under the General Public License (GPL), version 3.
// Please see the file LICENSE-GPL, or visit <http://www.gnu.org/licenses/> for the full text.
//
// Full details available at https://saorsalabs.com/licenses

//! Per-pass entity index backing click-to-reveal details
//!
//! Every render pass rebuilds the registry from the current snapshot. Rows with
//! a usable server id (`fd`) keep that id, so the same connection has the same
//! registry id across polls. Rows without one get a synthetic negative id that
//! is unique within the pass only; cross-poll identity of such pseudo-clients
//! is not supported.

use std::sync::Arc;

use rand::{Rng, SeedableRng, rngs::StdRng};
use rustc_hash::FxHashMap;

use crate::labels;
use crate::snapshot::{EntityKind, EntityRecord, StatusSnapshot};

/// Identifier of an entity row within a render pass
pub type EntityId = i64;

/// Magnitude range of synthetic ids, far away from any real file descriptor
const SYNTHETIC_ID_RANGE: std::ops::Range<i64> = (1 << 32)..(1 << 52);

/// Ignored/received ratio above which a row's receive errors are severe
const SEVERE_IGNORE_RATIO: f64 = 0.1;

/// A registered entity
#[derive(Debug, Clone, Copy)]
pub struct EntityRef<'a> {
    /// Registry id
    pub id: EntityId,
    /// Which snapshot array the record came from
    pub kind: EntityKind,
    /// The record itself
    pub record: &'a EntityRecord,
}

/// Ids assigned by one [`EntityRegistry::rebuild`], in snapshot order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowIds {
    ids: [Vec<EntityId>; EntityKind::ALL.len()],
}

impl RowIds {
    /// Ids of one entity kind, parallel to [`StatusSnapshot::entities`]
    pub fn get(&self, kind: EntityKind) -> &[EntityId] {
        &self.ids[kind as usize]
    }
}

/// Content of a detail popup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailPopup {
    /// Heading line
    pub title: String,
    /// Body lines
    pub lines: Vec<String>,
}

/// Receive error highlighting for a row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxHealth {
    /// No duplicates or dropped packets
    Clean,
    /// Some packets were duplicates or dropped
    Dropping,
    /// More than a tenth of the received packets were dropped
    Severe,
}

impl RxHealth {
    /// Classify a record's receive counters
    pub fn of(record: &EntityRecord) -> Self {
        let ignored = record.pkts_ign.unwrap_or(0);
        let duplicates = record.pkts_dup.unwrap_or(0);
        if ignored == 0 && duplicates == 0 {
            return Self::Clean;
        }

        let received = record.pkts_rx.unwrap_or(0) as f64;
        if ignored as f64 > received * SEVERE_IGNORE_RATIO {
            Self::Severe
        } else {
            Self::Dropping
        }
    }
}

/// Maps registry ids to the records of the current snapshot
#[derive(Debug)]
pub struct EntityRegistry<R = StdRng> {
    snapshot: Option<Arc<StatusSnapshot>>,
    index: FxHashMap<EntityId, (EntityKind, usize)>,
    rng: R,
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityRegistry {
    /// Create an empty registry with an entropy-seeded generator
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }
}

impl<R: Rng> EntityRegistry<R> {
    /// Create an empty registry drawing synthetic ids from `rng`
    pub fn with_rng(rng: R) -> Self {
        Self {
            snapshot: None,
            index: FxHashMap::default(),
            rng,
        }
    }

    /// Re-index every entity of `snapshot`, dropping the previous pass
    pub fn rebuild(&mut self, snapshot: Arc<StatusSnapshot>) -> RowIds {
        self.index.clear();
        let mut rows = RowIds::default();

        for kind in EntityKind::ALL {
            for (pos, record) in snapshot.entities(kind).iter().enumerate() {
                let id = match record.server_id() {
                    Some(fd) if !self.index.contains_key(&fd) => fd,
                    _ => self.synthesize(),
                };
                self.index.insert(id, (kind, pos));
                rows.ids[kind as usize].push(id);
            }
        }

        self.snapshot = Some(snapshot);
        rows
    }

    /// A fresh negative id not used in the current pass
    fn synthesize(&mut self) -> EntityId {
        loop {
            let id = -self.rng.gen_range(SYNTHETIC_ID_RANGE);
            if !self.index.contains_key(&id) {
                return id;
            }
        }
    }

    /// Look up an entity of the current pass
    pub fn lookup(&self, id: EntityId) -> Option<EntityRef<'_>> {
        let (kind, pos) = *self.index.get(&id)?;
        let record = self.snapshot.as_ref()?.entities(kind).get(pos)?;
        Some(EntityRef { id, kind, record })
    }

    /// Number of entities in the current pass
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the current pass has no entities
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Drop the current pass
    pub fn clear(&mut self) {
        self.index.clear();
        self.snapshot = None;
    }

    /// Receive error breakdown of an entity
    pub fn rx_error_detail(&self, id: EntityId) -> Option<DetailPopup> {
        let entity = self.lookup(id)?;
        let names = self.snapshot.as_ref().and_then(|s| s.rx_errs.as_deref());
        Some(rx_error_popup(entity.record, names))
    }

    /// Certificate subject and issuer of an entity
    pub fn certificate_detail(&self, id: EntityId) -> Option<DetailPopup> {
        self.lookup(id).map(|entity| certificate_popup(entity.record))
    }
}

fn rx_error_popup(record: &EntityRecord, names: Option<&[String]>) -> DetailPopup {
    let title = match record.pkts_rx {
        Some(received) => format!("{received} packets received"),
        None => "Receive statistics".to_string(),
    };

    let mut lines = Vec::new();
    if record.pkts_dup.is_some() || record.pkts_ign.is_some() {
        lines.push(format!(
            "{} duplicates and {} erroneous packets dropped.",
            record.pkts_dup.unwrap_or(0),
            record.pkts_ign.unwrap_or(0)
        ));
    }

    match record.rx_errs.as_deref() {
        None => lines.push("No receive error breakdown is available for this connection.".to_string()),
        Some(counts) => {
            let before = lines.len();
            for (index, &count) in counts.iter().enumerate().filter(|(_, c)| **c > 0) {
                let label = match names.and_then(|n| n.get(index)) {
                    Some(code) => labels::rx_error(code),
                    None => format!("#{index}"),
                };
                lines.push(format!("{label}: {count}"));
            }
            if lines.len() == before {
                lines.push("No receive errors recorded.".to_string());
            }
        }
    }

    DetailPopup { title, lines }
}

fn certificate_popup(record: &EntityRecord) -> DetailPopup {
    if !record.has_certificate() {
        return DetailPopup {
            title: "No certificate".to_string(),
            lines: vec!["This connection did not authenticate using a certificate.".to_string()],
        };
    }

    let missing = "(not available)";
    DetailPopup {
        title: format!(
            "{} authenticated using a certificate.",
            record.username.as_deref().unwrap_or("Client")
        ),
        lines: vec![
            format!(
                "Certificate subject: {}",
                record.cert_subject.as_deref().unwrap_or(missing)
            ),
            format!(
                "Certificate issuer: {}",
                record.cert_issuer.as_deref().unwrap_or(missing)
            ),
        ],
    }
}
