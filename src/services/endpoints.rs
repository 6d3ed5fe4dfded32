//! Remote API URL table

use crate::types::ContractKind;

/// Production base URL of the customer API
pub const DEFAULT_BASE_URL: &str = "https://crmadmin.novapg.ro/webapi";

/// Resolves every endpoint the client talks to against one base URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    base_url: String,
}

impl Endpoints {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn login(&self) -> String {
        format!("{}/account/postLogin", self.base_url)
    }

    pub fn validate(&self) -> String {
        format!("{}/default/validate", self.base_url)
    }

    pub fn consumption_points(&self) -> String {
        format!("{}/default/locuriConsum", self.base_url)
    }

    pub fn bills(&self) -> String {
        format!("{}/default/bills", self.base_url)
    }

    pub fn readings(&self, kind: ContractKind) -> String {
        let module = match kind {
            ContractKind::Electricity => 1,
            ContractKind::Gas => 2,
        };
        format!("{}/autocitire/all?module={}", self.base_url, module)
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_endpoints() {
        let endpoints = Endpoints::default();
        assert_eq!(
            endpoints.login(),
            "https://crmadmin.novapg.ro/webapi/account/postLogin"
        );
        assert_eq!(
            endpoints.validate(),
            "https://crmadmin.novapg.ro/webapi/default/validate"
        );
        assert_eq!(
            endpoints.readings(ContractKind::Gas),
            "https://crmadmin.novapg.ro/webapi/autocitire/all?module=2"
        );
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let endpoints = Endpoints::new("http://localhost:8080/webapi/");
        assert_eq!(endpoints.bills(), "http://localhost:8080/webapi/default/bills");
        assert_eq!(
            endpoints.readings(ContractKind::Electricity),
            "http://localhost:8080/webapi/autocitire/all?module=1"
        );
    }
}
