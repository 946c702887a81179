//! In-memory indexed log of (identity, timestamp) observations.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDateTime;

/// One history observation: identity (path string) and the source
/// timestamp it was last considered at, minute resolution.
pub type HistoryRow = (String, NaiveDateTime);

/// Indexed history log with forward-advance and rollback-pruning
/// semantics.
///
/// A path may have many rows (temporal history); the "current" row is
/// the one with the maximum timestamp, and the rollback rule below
/// keeps that index truthful even when a source file regresses in
/// time (e.g. restored from an older copy).
#[derive(Debug, Default)]
pub struct HistoryStore {
    /// Every row, in insertion order.
    rows: Vec<HistoryRow>,
    /// identity → maximum timestamp among its rows.
    last: HashMap<String, NaiveDateTime>,
    /// Guard against exact (identity, timestamp) duplicates.
    seen: HashSet<HistoryRow>,
}

impl HistoryStore {
    pub fn new(initial_rows: impl IntoIterator<Item = HistoryRow>) -> Self {
        let mut store = Self::default();
        for (identity, ts) in initial_rows {
            store.add(identity, ts);
        }
        store
    }

    /// Insert a row and keep the max-per-identity index current.
    /// Exact duplicates are ignored.
    pub fn add(&mut self, identity: String, ts: NaiveDateTime) {
        let key = (identity, ts);
        if self.seen.contains(&key) {
            return;
        }
        self.seen.insert(key.clone());
        self.last
            .entry(key.0.clone())
            .and_modify(|cur| {
                if ts > *cur {
                    *cur = ts;
                }
            })
            .or_insert(ts);
        self.rows.push(key);
    }

    /// Exact-match currency check. `>=` would be wrong here: a journal
    /// timestamp newer than the source means the source rolled back,
    /// which is work, not freshness.
    pub fn is_current(&self, identity: &str, ts: NaiveDateTime) -> bool {
        self.last.get(identity) == Some(&ts)
    }

    /// Currently recorded timestamp for an identity, if any.
    pub fn current(&self, identity: &str) -> Option<NaiveDateTime> {
        self.last.get(identity).copied()
    }

    /// Record that an identity was considered at `ts`.
    ///
    /// - no prior row, or `ts` newer than current → insert;
    /// - `ts` equals current → no-op;
    /// - `ts` older than current (rollback) → delete every row for the
    ///   identity newer than `ts`, then insert. The journal must never
    ///   report a future observation as current once the source has
    ///   regressed, or a rolled-back file would be treated as up to
    ///   date forever.
    pub fn advance(&mut self, identity: &str, ts: NaiveDateTime) {
        match self.last.get(identity) {
            None => self.add(identity.to_string(), ts),
            Some(&current) if ts > current => self.add(identity.to_string(), ts),
            Some(&current) if ts == current => {}
            Some(_) => {
                self.prune_future(identity, ts);
                self.add(identity.to_string(), ts);
            }
        }
    }

    /// Drop rows for `identity` newer than `threshold`, then rebuild
    /// the dedup set and the max index for that identity.
    fn prune_future(&mut self, identity: &str, threshold: NaiveDateTime) {
        self.rows
            .retain(|(id, ts)| id != identity || *ts <= threshold);
        self.seen = self.rows.iter().cloned().collect();

        let max = self
            .rows
            .iter()
            .filter(|(id, _)| id == identity)
            .map(|(_, ts)| *ts)
            .max();
        match max {
            Some(ts) => {
                self.last.insert(identity.to_string(), ts);
            }
            None => {
                self.last.remove(identity);
            }
        }
    }

    /// Deterministic snapshot for persistence: identity ascending,
    /// timestamp descending within an identity (newest first).
    pub fn rows_sorted(&self) -> Vec<HistoryRow> {
        let mut rows = self.rows.clone();
        rows.sort_by(|(a_id, a_ts), (b_id, b_ts)| a_id.cmp(b_id).then(b_ts.cmp(a_ts)));
        rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
