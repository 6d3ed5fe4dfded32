//! Derived metric descriptors and values

use std::fmt;

use serde::{Serialize, Serializer};

use super::ContractKind;

/// Which yearly metric a key describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum MetricKind {
    BillCount(ContractKind),
    IndexCount(ContractKind),
}

impl MetricKind {
    pub fn contract(self) -> ContractKind {
        match self {
            MetricKind::BillCount(kind) | MetricKind::IndexCount(kind) => kind,
        }
    }

    fn slug(self) -> &'static str {
        match self {
            MetricKind::BillCount(_) => "arhiva_facturi",
            MetricKind::IndexCount(_) => "arhiva_index",
        }
    }

    /// Human label prefix, e.g. "Arhivă facturi"
    pub fn label(self) -> &'static str {
        match self {
            MetricKind::BillCount(_) => "Arhivă facturi",
            MetricKind::IndexCount(_) => "Arhivă index",
        }
    }
}

/// Stable identity of one yearly metric across refreshes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MetricKey {
    pub point_id: String,
    pub kind: MetricKind,
    pub year: i32,
}

impl MetricKey {
    pub fn new(point_id: impl Into<String>, kind: MetricKind, year: i32) -> Self {
        Self {
            point_id: point_id.into(),
            kind,
            year,
        }
    }

    /// e.g. "arhiva_facturi_electricitate_1001_2024"
    pub fn slug(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            self.kind.slug(),
            self.kind.contract().slug(),
            self.point_id,
            self.year
        )
    }

    /// e.g. "Arhivă facturi - 2024"
    pub fn display_name(&self) -> String {
        format!("{} - {}", self.kind.label(), self.year)
    }
}

/// A single itemized value inside a yearly metric
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ItemValue {
    /// Bill amount including VAT, in lei
    Amount(f64),
    /// Meter index volume, truncated to an integer
    Volume(i64),
}

impl fmt::Display for ItemValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemValue::Amount(lei) => write!(f, "{:.2} lei", lei),
            ItemValue::Volume(volume) => write!(f, "{}", volume),
        }
    }
}

impl Serialize for ItemValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            ItemValue::Amount(lei) => serializer.serialize_f64(*lei),
            ItemValue::Volume(volume) => serializer.serialize_i64(*volume),
        }
    }
}

/// One (month label, value) line of a yearly metric
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineItem {
    pub month: String,
    pub value: ItemValue,
}

/// Value of one yearly metric, computed on demand from a snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearlyMetric {
    pub key: MetricKey,
    pub count: u64,
    /// In snapshot order; a repeated month label keeps its first position
    /// and takes the latest value
    pub items: Vec<LineItem>,
}

/// Inclusive range of calendar years surfaced in the catalogue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearWindow {
    pub min: i32,
    pub max: i32,
}

impl YearWindow {
    /// `[current - years_back, current]`
    pub fn trailing(current: i32, years_back: u32) -> Self {
        let years_back = i32::try_from(years_back).unwrap_or(i32::MAX);
        Self {
            min: current.saturating_sub(years_back),
            max: current,
        }
    }

    pub fn contains(&self, year: i32) -> bool {
        (self.min..=self.max).contains(&year)
    }
}

/// Details of a consumption point holding a given contract
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContractHolder {
    pub point_id: Option<String>,
    pub customer_name: Option<String>,
    pub consumption_address: Option<String>,
    pub pod_code: Option<String>,
    pub distributor_code: Option<String>,
    pub customer_type: Option<String>,
}

/// Points holding a contract of one kind
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContractSummary {
    pub kind: ContractKind,
    pub holders: Vec<ContractHolder>,
}

impl ContractSummary {
    pub fn count(&self) -> usize {
        self.holders.len()
    }
}
