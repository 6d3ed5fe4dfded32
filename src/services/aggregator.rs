//! Aggregator service for per-year bill and index metrics
//!
//! Pure functions over a [`Snapshot`]. Nothing here mutates its input or
//! keeps state between calls, so the same snapshot always yields the same
//! results.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;

use crate::types::{
    Bill, ContractHolder, ContractKind, ContractSummary, ItemValue, LineItem, MeterReading,
    MetricKey, MetricKind, Snapshot, YearlyMetric,
};

/// Years seen per consumption point id
pub type YearsByPoint = BTreeMap<String, BTreeSet<i32>>;

/// Extract the trailing 4-digit year of a month label ("Decembrie 2024" → 2024).
///
/// The digits must end the trimmed label; anything else means "no year".
pub fn extract_year(label: &str) -> Option<i32> {
    static TRAILING_YEAR: OnceLock<Regex> = OnceLock::new();
    let re = TRAILING_YEAR.get_or_init(|| Regex::new(r"(\d{4})$").expect("valid regex"));
    re.captures(label.trim())
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Aggregator for computing yearly account metrics
pub struct Aggregator;

impl Aggregator {
    /// Years in which bills of `kind` were issued, per point.
    ///
    /// Uses the issue date ("YYYY-MM-DD"); bills missing the point id,
    /// contract type or a parsable issue date are skipped.
    pub fn years_with_bills(snapshot: &Snapshot, kind: ContractKind) -> YearsByPoint {
        let mut years = YearsByPoint::new();

        for bill in snapshot.bills() {
            let (Some(point), Some(contract), Some(issued)) = (
                bill.consumption_point_id(),
                bill.contract_type(),
                bill.issue_date.as_deref(),
            ) else {
                continue;
            };
            if contract != kind.abbrev() {
                continue;
            }
            let Ok(date) = NaiveDate::parse_from_str(issued, "%Y-%m-%d") else {
                continue;
            };
            years
                .entry(point.to_string())
                .or_default()
                .insert(date.year());
        }

        years
    }

    /// Years referenced by readings of `kind`, per point, taken from the
    /// billing month label. Self-reads count here too.
    pub fn years_with_readings(snapshot: &Snapshot, kind: ContractKind) -> YearsByPoint {
        let mut years = YearsByPoint::new();

        for reading in snapshot.readings(kind) {
            let (Some(point), Some(year)) = (
                reading.consumption_point_id(),
                reading.billing_month.as_deref().and_then(extract_year),
            ) else {
                continue;
            };
            years.entry(point.to_string()).or_default().insert(year);
        }

        years
    }

    /// Number of `kind` bills for `point_id` whose billing month falls in `year`.
    ///
    /// Year assignment uses the billing month label, not the issue date used
    /// by [`Aggregator::years_with_bills`]; the two can disagree.
    pub fn count_bills_for_year(
        snapshot: &Snapshot,
        kind: ContractKind,
        point_id: &str,
        year: i32,
    ) -> u64 {
        Self::bills_for_year(snapshot, kind, point_id, year).count() as u64
    }

    /// Amount per billing month (lower-cased label) for the bills counted by
    /// [`Aggregator::count_bills_for_year`]
    pub fn bill_amounts_for_year(
        snapshot: &Snapshot,
        kind: ContractKind,
        point_id: &str,
        year: i32,
    ) -> Vec<LineItem> {
        let mut items = Vec::new();
        for (month, bill) in Self::bills_for_year(snapshot, kind, point_id, year) {
            upsert(&mut items, month, ItemValue::Amount(bill.amount()));
        }
        items
    }

    /// Number of provider readings of `kind` for `point_id` in `year`
    pub fn count_readings_for_year(
        snapshot: &Snapshot,
        kind: ContractKind,
        point_id: &str,
        year: i32,
    ) -> u64 {
        Self::readings_for_year(snapshot, kind, point_id, year).count() as u64
    }

    /// Truncated volume per billing month (lower-cased label) for the
    /// readings counted by [`Aggregator::count_readings_for_year`]
    pub fn reading_volumes_for_year(
        snapshot: &Snapshot,
        kind: ContractKind,
        point_id: &str,
        year: i32,
    ) -> Vec<LineItem> {
        let mut items = Vec::new();
        for (month, reading) in Self::readings_for_year(snapshot, kind, point_id, year) {
            upsert(&mut items, month, ItemValue::Volume(reading.volume()));
        }
        items
    }

    /// Compute the value behind one catalogue key
    pub fn yearly_metric(snapshot: &Snapshot, key: &MetricKey) -> YearlyMetric {
        let point = key.point_id.as_str();
        let (count, items) = match key.kind {
            MetricKind::BillCount(kind) => (
                Self::count_bills_for_year(snapshot, kind, point, key.year),
                Self::bill_amounts_for_year(snapshot, kind, point, key.year),
            ),
            MetricKind::IndexCount(kind) => (
                Self::count_readings_for_year(snapshot, kind, point, key.year),
                Self::reading_volumes_for_year(snapshot, kind, point, key.year),
            ),
        };

        YearlyMetric {
            key: key.clone(),
            count,
            items,
        }
    }

    /// Consumption points holding a `kind` contract, with holder details
    pub fn contract_summary(snapshot: &Snapshot, kind: ContractKind) -> ContractSummary {
        let holders = snapshot
            .points()
            .iter()
            .filter(|p| p.has_contract(kind))
            .map(|p| ContractHolder {
                point_id: p.id().map(String::from),
                customer_name: p.customer_name.as_deref().map(title_case),
                consumption_address: p.point_name.clone(),
                pod_code: p.pod_code.clone(),
                // The API reports the distributor under the gas field for both kinds
                distributor_code: p.distributor_code.clone(),
                customer_type: p.customer_type.clone(),
            })
            .collect();

        ContractSummary { kind, holders }
    }

    /// Bills matching kind, point and billing-month year, paired with their
    /// lower-cased month label
    fn bills_for_year<'a>(
        snapshot: &'a Snapshot,
        kind: ContractKind,
        point_id: &'a str,
        year: i32,
    ) -> impl Iterator<Item = (String, &'a Bill)> + 'a {
        snapshot.bills().iter().filter_map(move |bill| {
            if bill.contract_type() != Some(kind.abbrev()) {
                return None;
            }
            if bill.consumption_point_id() != Some(point_id) {
                return None;
            }
            let month = bill.billing_month.as_deref()?.to_lowercase();
            (extract_year(&month) == Some(year)).then_some((month, bill))
        })
    }

    /// Provider readings matching point and billing-month year, paired with
    /// their lower-cased month label
    fn readings_for_year<'a>(
        snapshot: &'a Snapshot,
        kind: ContractKind,
        point_id: &'a str,
        year: i32,
    ) -> impl Iterator<Item = (String, &'a MeterReading)> + 'a {
        snapshot.readings(kind).iter().filter_map(move |reading| {
            if reading.consumption_point_id() != Some(point_id) {
                return None;
            }
            // Self-submitted readings carry a submission window; only
            // provider readings count toward the index archive
            if !reading.is_provider_reading() {
                return None;
            }
            let month = reading.billing_month.as_deref()?.to_lowercase();
            (extract_year(&month) == Some(year)).then_some((month, reading))
        })
    }
}

/// Insert or overwrite `month`, keeping the position of its first occurrence
fn upsert(items: &mut Vec<LineItem>, month: String, value: ItemValue) {
    match items.iter_mut().find(|item| item.month == month) {
        Some(item) => item.value = value,
        None => items.push(LineItem { month, value }),
    }
}

/// Capitalize the first letter of every alphabetic run, lower-case the rest
fn title_case(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut in_word = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if in_word {
                result.extend(c.to_lowercase());
            } else {
                result.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            result.push(c);
            in_word = false;
        }
    }
    result
}
