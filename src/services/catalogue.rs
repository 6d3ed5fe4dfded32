//! Metric catalogue: the set of yearly metrics worth exposing
//!
//! Keys are plain values (point id, kind, year), so a presentation layer can
//! diff two catalogues and add or retire its entities without holding on to
//! any object from a previous refresh.

use std::collections::BTreeSet;

use super::aggregator::{Aggregator, YearsByPoint};
use crate::types::{ContractKind, MetricKey, MetricKind, Snapshot, YearWindow, YearlyMetric};

/// Keys appearing in / disappearing from the catalogue between two refreshes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogueDiff {
    pub added: Vec<MetricKey>,
    pub removed: Vec<MetricKey>,
}

impl CatalogueDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalogue {
    keys: BTreeSet<MetricKey>,
}

impl Catalogue {
    /// Collect every (point, kind, year) key for `snapshot`.
    ///
    /// A point contributes electricity keys only when it has both an
    /// electricity meter and contract (gas likewise). Bill years come from
    /// issue dates, index years from reading month labels; both are limited
    /// to `window`.
    pub fn build(snapshot: &Snapshot, window: YearWindow) -> Self {
        let mut keys = BTreeSet::new();

        for kind in ContractKind::ALL {
            let bill_years = Aggregator::years_with_bills(snapshot, kind);
            let index_years = Aggregator::years_with_readings(snapshot, kind);

            for point in snapshot.points() {
                let Some(id) = point.id() else { continue };
                if !point.is_supplied(kind) {
                    continue;
                }
                insert_years(&mut keys, &bill_years, id, MetricKind::BillCount(kind), window);
                insert_years(&mut keys, &index_years, id, MetricKind::IndexCount(kind), window);
            }
        }

        Self { keys }
    }

    #[allow(dead_code)] // Inspected by tests
    pub fn keys(&self) -> impl Iterator<Item = &MetricKey> {
        self.keys.iter()
    }

    #[allow(dead_code)] // Inspected by tests
    pub fn contains(&self, key: &MetricKey) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[allow(dead_code)] // Inspected by tests
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// What changed going from `previous` to `self`
    pub fn diff(&self, previous: &Catalogue) -> CatalogueDiff {
        CatalogueDiff {
            added: self.keys.difference(&previous.keys).cloned().collect(),
            removed: previous.keys.difference(&self.keys).cloned().collect(),
        }
    }

    /// Values for every key, computed now from `snapshot`
    pub fn metrics(&self, snapshot: &Snapshot) -> Vec<YearlyMetric> {
        self.keys
            .iter()
            .map(|key| Aggregator::yearly_metric(snapshot, key))
            .collect()
    }
}

fn insert_years(
    keys: &mut BTreeSet<MetricKey>,
    years: &YearsByPoint,
    point_id: &str,
    kind: MetricKind,
    window: YearWindow,
) {
    let Some(point_years) = years.get(point_id) else {
        return;
    };
    for &year in point_years.iter().filter(|&&y| window.contains(y)) {
        keys.insert(MetricKey::new(point_id, kind, year));
    }
}
