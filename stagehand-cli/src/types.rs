//! Response types of the web agent API

use serde::Deserialize;

/// One production generation as reported by `/api/deployment`
#[derive(Debug, Clone, Deserialize)]
pub struct Generation {
    pub name: String,
    pub run_id: Option<String>,
    pub live: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentStatus {
    pub current: Option<Generation>,
    pub generations: Vec<Generation>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_deployment_status() {
        let status: DeploymentStatus = serde_json::from_value(json!({
            "current": { "name": "01J0.r2", "run_id": "r2", "live": true },
            "generations": [
                { "name": "01J0.r2", "run_id": "r2", "live": true },
                { "name": "01HZ", "run_id": null, "live": false }
            ]
        }))
        .unwrap();

        assert_eq!(status.current.unwrap().run_id.as_deref(), Some("r2"));
        assert_eq!(status.generations.len(), 2);
        assert!(status.generations[1].run_id.is_none());
    }
}
