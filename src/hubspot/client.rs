//! REST transport for the HubSpot CRM v3 API.
//!
//! Uses reqwest with Bearer token auth against a configurable base endpoint
//! (default `https://api.hubapi.com`). Higher-level operations talk to the
//! `CrmTransport` trait so they can be exercised without a network.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{AssociationStrategy, HubSpotConfig};
use crate::error::IntegrationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrmMethod {
    Get,
    Post,
    Put,
}

/// One outbound CRM call. `path` includes the query string.
#[derive(Debug, Clone, PartialEq)]
pub struct CrmRequest {
    pub method: CrmMethod,
    pub path: String,
    pub body: Option<Value>,
}

impl CrmRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: CrmMethod::Get,
            path: path.into(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: CrmMethod::Post,
            path: path.into(),
            body: Some(body),
        }
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self {
            method: CrmMethod::Put,
            path: path.into(),
            body: None,
        }
    }
}

/// Raw upstream answer: status code plus the unparsed body.
#[derive(Debug, Clone)]
pub struct CrmResponse {
    pub status: u16,
    pub body: String,
}

impl CrmResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parse a 2xx body as JSON. An empty 2xx body is `Value::Null`.
    pub fn into_json(self) -> Result<Value, IntegrationError> {
        if !self.is_success() {
            return Err(IntegrationError::UpstreamStatus {
                status: self.status,
                body: self.body,
            });
        }
        if self.body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Sends a single request and returns whatever the CRM answered.
///
/// `Err` is reserved for transport failures; non-2xx answers come back as a
/// `CrmResponse` so callers can decide how to degrade.
#[async_trait]
pub trait CrmTransport: Send + Sync {
    async fn send(&self, request: CrmRequest) -> Result<CrmResponse, IntegrationError>;
}

/// reqwest-backed transport.
pub struct HubSpotHttp {
    client: reqwest::Client,
    base: String,
    token: String,
}

impl HubSpotHttp {
    pub fn new(endpoint: &str, token: &str, timeout_secs: u64) -> Result<Self, IntegrationError> {
        let parsed = url::Url::parse(endpoint).map_err(|e| {
            IntegrationError::NotConfigured(format!("invalid HubSpot endpoint {}: {}", endpoint, e))
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .map_err(|e| IntegrationError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base: parsed.as_str().trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }
}

#[async_trait]
impl CrmTransport for HubSpotHttp {
    async fn send(&self, request: CrmRequest) -> Result<CrmResponse, IntegrationError> {
        let url = format!("{}{}", self.base, request.path);
        log::debug!("HubSpot request: {:?} {}", request.method, url);

        let builder = match request.method {
            CrmMethod::Get => self.client.get(&url),
            CrmMethod::Post => self.client.post(&url),
            CrmMethod::Put => self.client.put(&url),
        }
        .bearer_auth(&self.token)
        .header("Content-Type", "application/json");

        let builder = match &request.body {
            Some(body) => builder.json(body),
            None => builder,
        };

        let resp = builder.send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        Ok(CrmResponse { status, body })
    }
}

/// HubSpot adapter: contacts, notes and note creation.
///
/// `transport` is `None` in mock mode (no access token configured).
#[derive(Clone)]
pub struct HubSpotClient {
    pub(crate) transport: Option<Arc<dyn CrmTransport>>,
    pub(crate) strategies: Vec<AssociationStrategy>,
    pub(crate) endpoint: String,
    pub(crate) token_preview: Option<String>,
}

impl HubSpotClient {
    pub fn from_config(config: &HubSpotConfig) -> Result<Self, IntegrationError> {
        let Some(token) = config.token() else {
            log::warn!("HUBSPOT_ACCESS_TOKEN is not configured. Using mock data.");
            return Ok(Self {
                endpoint: config.api_endpoint.clone(),
                ..Self::mock()
            });
        };

        let http = HubSpotHttp::new(&config.api_endpoint, token, config.request_timeout_secs)?;
        Ok(Self {
            transport: Some(Arc::new(http)),
            strategies: config.strategies(),
            endpoint: config.api_endpoint.clone(),
            token_preview: Some(mask_token(token)),
        })
    }

    /// A client that never leaves the process.
    pub fn mock() -> Self {
        Self {
            transport: None,
            strategies: super::default_association_strategies(),
            endpoint: super::DEFAULT_API_ENDPOINT.to_string(),
            token_preview: None,
        }
    }

    pub fn with_transport(
        transport: Arc<dyn CrmTransport>,
        strategies: Vec<AssociationStrategy>,
    ) -> Self {
        Self {
            transport: Some(transport),
            strategies,
            endpoint: super::DEFAULT_API_ENDPOINT.to_string(),
            token_preview: Some("test".to_string()),
        }
    }

    pub fn is_mock(&self) -> bool {
        self.transport.is_none()
    }

    pub fn strategies(&self) -> &[AssociationStrategy] {
        &self.strategies
    }
}

/// Send a request and require a 2xx JSON answer.
pub(crate) async fn fetch_json(
    transport: &dyn CrmTransport,
    request: CrmRequest,
) -> Result<Value, IntegrationError> {
    transport.send(request).await?.into_json()
}

/// Extract a HubSpot object id, which may arrive as a string or a number.
pub(crate) fn object_id(value: &Value) -> Option<String> {
    match value.get("id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// First 10 and last 5 characters; short tokens are fully hidden.
pub(crate) fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 15 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..10].iter().collect();
    let tail: String = chars[chars.len() - 5..].iter().collect();
    format!("{}...{}", head, tail)
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn into_json_checks_status_and_body() {
        let ok = CrmResponse {
            status: 200,
            body: r#"{"id":"5"}"#.into(),
        };
        assert_eq!(ok.into_json().unwrap(), json!({"id": "5"}));

        let empty = CrmResponse {
            status: 204,
            body: String::new(),
        };
        assert_eq!(empty.into_json().unwrap(), Value::Null);

        let denied = CrmResponse {
            status: 401,
            body: "expired".into(),
        };
        match denied.into_json() {
            Err(IntegrationError::UpstreamStatus { status, body }) => {
                assert_eq!(status, 401);
                assert_eq!(body, "expired");
            }
            other => panic!("unexpected: {:?}", other),
        }

        let garbled = CrmResponse {
            status: 200,
            body: "<html>".into(),
        };
        assert!(matches!(garbled.into_json(), Err(IntegrationError::Shape(_))));
    }

    #[test]
    fn object_id_accepts_strings_and_numbers() {
        assert_eq!(object_id(&json!({"id": "42"})), Some("42".into()));
        assert_eq!(object_id(&json!({"id": 42})), Some("42".into()));
        assert_eq!(object_id(&json!({"id": ""})), None);
        assert_eq!(object_id(&json!({"name": "x"})), None);
    }

    #[test]
    fn mask_token_hides_the_middle() {
        assert_eq!(
            mask_token("pat-na1-0123456789abcdef"),
            "pat-na1-01...bcdef"
        );
        assert_eq!(mask_token("short"), "*****");
    }

    #[test]
    fn from_config_without_token_is_mock() {
        let client = HubSpotClient::from_config(&HubSpotConfig::default()).unwrap();
        assert!(client.is_mock());
        assert!(client.token_preview.is_none());
    }

    #[test]
    fn from_config_rejects_bad_endpoint() {
        let config = HubSpotConfig {
            api_endpoint: "not a url".into(),
            access_token: Some("pat-na1-0123456789abcdef".into()),
            ..HubSpotConfig::default()
        };
        assert!(matches!(
            HubSpotClient::from_config(&config),
            Err(IntegrationError::NotConfigured(_))
        ));
    }

    #[test]
    fn from_config_with_token_is_live() {
        let config = HubSpotConfig {
            access_token: Some("pat-na1-0123456789abcdef".into()),
            ..HubSpotConfig::default()
        };
        let client = HubSpotClient::from_config(&config).unwrap();
        assert!(!client.is_mock());
        assert_eq!(client.token_preview.as_deref(), Some("pat-na1-01...bcdef"));
    }
}
