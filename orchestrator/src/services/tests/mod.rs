//! Service-specific tests
//!
//! Each HTTP service is exercised against a wiremock server.


pub mod common {
    use calc_shared::{BackendConfig, CalcId, CalcParams, CalcType, PolicyIds};
    use wiremock::MockServer;

    /// Config pointing both base URLs at the mock server
    pub fn config_for(server: &MockServer) -> BackendConfig {
        BackendConfig::new(server.uri(), server.uri())
    }

    pub fn params(calc_type: CalcType, country: &str, population: &str, region: Option<&str>) -> CalcParams {
        CalcParams {
            calc_id: CalcId::from("calc-1"),
            country_id: country.to_string(),
            calc_type,
            policy_ids: PolicyIds {
                baseline: "2".to_string(),
                reform: Some("88".to_string()),
            },
            population_id: population.to_string(),
            region: region.map(str::to_string),
            year: Some("2025".to_string()),
        }
    }

    /// JSON bodies of every request the server saw, in arrival order
    pub async fn request_bodies(server: &MockServer) -> Vec<serde_json::Value> {
        server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .map(|request| serde_json::from_slice(&request.body).unwrap_or(serde_json::Value::Null))
            .collect()
    }
}
