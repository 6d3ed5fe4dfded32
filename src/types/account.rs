//! Raw account data as returned by the remote API

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Contract / meter family a record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractKind {
    Electricity,
    Gas,
}

impl ContractKind {
    pub const ALL: [ContractKind; 2] = [ContractKind::Electricity, ContractKind::Gas];

    /// Contract type abbreviation used by the bills endpoint
    pub fn abbrev(self) -> &'static str {
        match self {
            ContractKind::Electricity => "EE",
            ContractKind::Gas => "GN",
        }
    }

    /// Slug used in metric identifiers
    pub fn slug(self) -> &'static str {
        match self {
            ContractKind::Electricity => "electricitate",
            ContractKind::Gas => "gaz",
        }
    }
}

/// A consumption point (place of supply) attached to the account
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionPoint {
    #[serde(rename = "IdPunctConsum", default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(rename = "Adresa", default, deserialize_with = "lenient_string")]
    pub address: Option<String>,
    #[serde(rename = "AreEE", default, deserialize_with = "flag")]
    pub has_electricity_meter: bool,
    #[serde(rename = "AreContractEE", default, deserialize_with = "flag")]
    pub has_electricity_contract: bool,
    #[serde(rename = "AreGN", default, deserialize_with = "flag")]
    pub has_gas_meter: bool,
    #[serde(rename = "AreContractGN", default, deserialize_with = "flag")]
    pub has_gas_contract: bool,
    #[serde(rename = "NumePartener", default, deserialize_with = "lenient_string")]
    pub customer_name: Option<String>,
    #[serde(rename = "NumePunctConsum", default, deserialize_with = "lenient_string")]
    pub point_name: Option<String>,
    #[serde(rename = "CodPOD", default, deserialize_with = "lenient_string")]
    pub pod_code: Option<String>,
    #[serde(rename = "CodDistribuitorGN", default, deserialize_with = "lenient_string")]
    pub distributor_code: Option<String>,
    #[serde(rename = "DenumireTipConsumator", default, deserialize_with = "lenient_string")]
    pub customer_type: Option<String>,
}

impl ConsumptionPoint {
    pub fn id(&self) -> Option<&str> {
        non_empty(&self.id)
    }

    pub fn has_contract(&self, kind: ContractKind) -> bool {
        match kind {
            ContractKind::Electricity => self.has_electricity_contract,
            ContractKind::Gas => self.has_gas_contract,
        }
    }

    /// Both the meter and the supply contract are present for `kind`
    pub fn is_supplied(&self, kind: ContractKind) -> bool {
        match kind {
            ContractKind::Electricity => {
                self.has_electricity_meter && self.has_electricity_contract
            }
            ContractKind::Gas => self.has_gas_meter && self.has_gas_contract,
        }
    }

    pub fn display_address(&self) -> &str {
        self.address
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .unwrap_or("Adresa necunoscută")
    }
}

/// An issued bill
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bill {
    #[serde(rename = "IdEntitate", default, deserialize_with = "lenient_string")]
    pub consumption_point_id: Option<String>,
    #[serde(rename = "PrescurtareTipContract", default, deserialize_with = "lenient_string")]
    pub contract_type: Option<String>,
    /// "YYYY-MM-DD"
    #[serde(rename = "DataEmitere", default, deserialize_with = "lenient_string")]
    pub issue_date: Option<String>,
    /// Free text ending in a year, e.g. "Decembrie 2024"
    #[serde(rename = "PentruLuna", default, deserialize_with = "lenient_string")]
    pub billing_month: Option<String>,
    #[serde(rename = "ValoareCuTVA", default, deserialize_with = "lenient_string")]
    pub amount_with_tax: Option<String>,
}

impl Bill {
    pub fn consumption_point_id(&self) -> Option<&str> {
        non_empty(&self.consumption_point_id)
    }

    pub fn contract_type(&self) -> Option<&str> {
        non_empty(&self.contract_type)
    }

    /// Amount including VAT; missing or unparsable amounts count as zero
    pub fn amount(&self) -> f64 {
        self.amount_with_tax
            .as_deref()
            .and_then(|a| a.trim().parse::<f64>().ok())
            .unwrap_or(0.0)
    }
}

/// A meter index reading
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeterReading {
    #[serde(rename = "IdPunctConsum", default, deserialize_with = "lenient_string")]
    pub consumption_point_id: Option<String>,
    #[serde(rename = "PentruLuna", default, deserialize_with = "lenient_string")]
    pub billing_month: Option<String>,
    #[serde(rename = "TotalVolum", default, deserialize_with = "lenient_string")]
    pub total_volume: Option<String>,
    #[serde(rename = "DataInceputAutocitire", default, deserialize_with = "present")]
    pub self_read_start: Option<String>,
    #[serde(rename = "DataFinalAutocitire", default, deserialize_with = "present")]
    pub self_read_end: Option<String>,
}

impl MeterReading {
    pub fn consumption_point_id(&self) -> Option<&str> {
        non_empty(&self.consumption_point_id)
    }

    /// Volume truncated toward zero; missing or unparsable volumes count as zero
    pub fn volume(&self) -> i64 {
        self.total_volume
            .as_deref()
            .and_then(|v| v.trim().parse::<f64>().ok())
            .map(|v| v.trunc() as i64)
            .unwrap_or(0)
    }

    /// Reading taken by the provider rather than submitted by the customer.
    ///
    /// The API has no explicit flag for this: customer self-reads carry a
    /// submission window, provider/system readings carry neither bound.
    pub fn is_provider_reading(&self) -> bool {
        self.self_read_start.is_none() && self.self_read_end.is_none()
    }
}

/// Result of one fetch cycle. A failed cycle yields all four fields `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub consumption_points: Option<Vec<ConsumptionPoint>>,
    pub bills: Option<Vec<Bill>>,
    pub electricity_readings: Option<Vec<MeterReading>>,
    pub gas_readings: Option<Vec<MeterReading>>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.consumption_points.is_none()
            && self.bills.is_none()
            && self.electricity_readings.is_none()
            && self.gas_readings.is_none()
    }

    pub fn points(&self) -> &[ConsumptionPoint] {
        self.consumption_points.as_deref().unwrap_or_default()
    }

    pub fn bills(&self) -> &[Bill] {
        self.bills.as_deref().unwrap_or_default()
    }

    pub fn readings(&self, kind: ContractKind) -> &[MeterReading] {
        match kind {
            ContractKind::Electricity => self.electricity_readings.as_deref(),
            ContractKind::Gas => self.gas_readings.as_deref(),
        }
        .unwrap_or_default()
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Accept a JSON string, number or bool; null and other shapes become `None`
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(if b { "1" } else { "0" }.to_string()),
        _ => None,
    })
}

/// Only JSON null (or a missing field) is `None`; any other value is kept,
/// objects and arrays as their JSON text
fn present<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// API flags are the string "1" when set
fn flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => s.trim() == "1",
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        Some(Value::Bool(b)) => b,
        _ => false,
    })
}
