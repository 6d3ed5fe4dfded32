//! Typed access to the four account resources

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::config::Config;
use super::endpoints::Endpoints;
use super::gateway::{HttpGateway, ReqwestGateway};
use super::session::{Credentials, SessionManager};
use crate::types::{Bill, ConsumptionPoint, ContractKind, MeterReading, Result, Snapshot};

/// Anything that can produce a full snapshot per poll cycle
pub trait SnapshotSource: Send {
    fn fetch_all(&mut self) -> Snapshot;
}

#[derive(Debug, Default, Deserialize)]
struct PointsEnvelope {
    #[serde(default)]
    data: PointsData,
}

#[derive(Debug, Default, Deserialize)]
struct PointsData {
    #[serde(rename = "locuriConsum", default)]
    points: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct BillsEnvelope {
    #[serde(default)]
    data: BillsData,
}

#[derive(Debug, Default, Deserialize)]
struct BillsData {
    #[serde(default)]
    bills: Vec<Value>,
}

/// API client: one session check per cycle, then four independent GETs
pub struct ApiClient {
    session: SessionManager,
    gateway: Arc<dyn HttpGateway>,
    endpoints: Endpoints,
}

impl ApiClient {
    pub fn new(credentials: Credentials, gateway: Arc<dyn HttpGateway>, endpoints: Endpoints) -> Self {
        let session = SessionManager::new(credentials, gateway.clone(), endpoints.clone());
        Self {
            session,
            gateway,
            endpoints,
        }
    }

    /// Build a client backed by the reqwest gateway
    pub fn from_config(config: &Config) -> Result<Self> {
        let gateway = ReqwestGateway::new(Duration::from_secs(config.request_timeout_secs))?;
        Ok(Self::new(
            config.credentials(),
            Arc::new(gateway),
            Endpoints::new(&config.base_url),
        ))
    }

    #[allow(dead_code)] // Inspected by tests
    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SessionManager {
        &mut self.session
    }

    /// Ensure the session once, then fetch all four resources.
    ///
    /// A session failure yields an empty snapshot. The session is not
    /// re-checked between the four calls: a token expiring mid-batch fails
    /// the remaining resources until the next cycle.
    pub fn fetch_all(&mut self) -> Snapshot {
        if !self.session.ensure_valid_session() {
            tracing::error!(
                "Could not validate or re-obtain a token for {}; returning empty snapshot",
                self.session.credentials().email()
            );
            return Snapshot::empty();
        }

        Snapshot {
            consumption_points: self.fetch_consumption_points(),
            bills: self.fetch_bills(),
            electricity_readings: self.fetch_electricity_readings(),
            gas_readings: self.fetch_gas_readings(),
        }
    }

    pub fn fetch_consumption_points(&self) -> Option<Vec<ConsumptionPoint>> {
        let envelope: PointsEnvelope =
            self.get_resource("consumption points", &self.endpoints.consumption_points())?;
        Some(parse_records("consumption point", envelope.data.points))
    }

    pub fn fetch_bills(&self) -> Option<Vec<Bill>> {
        let envelope: BillsEnvelope = self.get_resource("bills", &self.endpoints.bills())?;
        Some(parse_records("bill", envelope.data.bills))
    }

    pub fn fetch_electricity_readings(&self) -> Option<Vec<MeterReading>> {
        self.fetch_readings(ContractKind::Electricity)
    }

    pub fn fetch_gas_readings(&self) -> Option<Vec<MeterReading>> {
        self.fetch_readings(ContractKind::Gas)
    }

    pub fn fetch_readings(&self, kind: ContractKind) -> Option<Vec<MeterReading>> {
        let name = match kind {
            ContractKind::Electricity => "electricity readings",
            ContractKind::Gas => "gas readings",
        };
        let records: Vec<Value> = self.get_resource(name, &self.endpoints.readings(kind))?;
        Some(parse_records("meter reading", records))
    }

    /// Authenticated GET of one resource; every failure is logged and `None`
    fn get_resource<T: DeserializeOwned>(&self, name: &str, url: &str) -> Option<T> {
        let Some(token) = self.session.bearer() else {
            tracing::error!("Cannot fetch {} without a token", name);
            return None;
        };

        match self.request(url, token) {
            Ok(payload) => Some(payload),
            Err(e) => {
                tracing::error!("Failed to fetch {}: {}", name, e);
                None
            }
        }
    }

    fn request<T: DeserializeOwned>(&self, url: &str, token: &str) -> Result<T> {
        let response = self.gateway.get(url, Some(token))?;
        if !response.is_ok() {
            return Err(response.status_error());
        }
        response.json()
    }
}

impl SnapshotSource for ApiClient {
    fn fetch_all(&mut self) -> Snapshot {
        ApiClient::fetch_all(self)
    }
}

/// Decode records one by one so a single malformed entry is skipped
/// instead of failing the whole resource
fn parse_records<T: DeserializeOwned>(what: &str, records: Vec<Value>) -> Vec<T> {
    records
        .into_iter()
        .filter_map(|record| match serde_json::from_value(record) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!("Skipping malformed {}: {}", what, e);
                None
            }
        })
        .collect()
}
