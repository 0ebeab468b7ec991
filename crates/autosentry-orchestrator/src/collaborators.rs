//! Clients for the two external services the controller consults.
//!
//! Both are advisory. The controller turns any error or timeout from them into
//! a neutral value ([`BehaviorReport::neutral`], an empty prediction), so these
//! clients simply report failures as [`AutosentryError::Collaborator`].

use async_trait::async_trait;
use autosentry_core::{AutosentryError, AutosentryResult, Payload};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Failure-prediction model.
#[async_trait]
pub trait PredictionService: Send + Sync {
    /// Predict from the raw telemetry bundle. The response may carry
    /// `failure_probability` and `confidence`.
    async fn predict(&self, telemetry: &Payload) -> AutosentryResult<Payload>;
}

/// Behavior-anomaly scoring of the controller's own actions.
#[async_trait]
pub trait BehaviorScorer: Send + Sync {
    async fn score(&self, action: &AgentAction) -> AutosentryResult<BehaviorReport>;
}

/// Description of one orchestration action, as sent for scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentAction {
    pub agent_id: String,
    pub agent_type: String,
    pub action_type: String,
    pub target_entity: String,
    #[serde(rename = "vehicle_id")]
    pub subject_id: String,
    pub payload_size: usize,
    pub response_time_ms: f64,
    pub success: bool,
}

/// Scoring verdict. Fields beyond `alert` and `score` (such as `risk_level`
/// or `reason`) are kept in `details`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BehaviorReport {
    #[serde(default)]
    pub alert: bool,
    #[serde(default)]
    pub score: f64,
    #[serde(flatten)]
    pub details: Payload,
}

impl BehaviorReport {
    /// The value used when scoring is unreachable: no alert, score 0.
    pub fn neutral() -> Self {
        Self::default()
    }

    pub fn to_payload(&self) -> Payload {
        let mut payload = self.details.clone();
        payload.insert("alert".into(), json!(self.alert));
        payload.insert("score".into(), json!(self.score));
        payload
    }
}

fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to build HTTP client, using defaults");
            reqwest::Client::new()
        })
}

async fn post_json(
    http: &reqwest::Client,
    url: &str,
    body: &Value,
) -> AutosentryResult<Value> {
    let resp = http
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| AutosentryError::Collaborator(format!("{url}: {e}")))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(AutosentryError::Collaborator(format!(
            "{url} returned {status}"
        )));
    }
    resp.json()
        .await
        .map_err(|e| AutosentryError::Collaborator(format!("{url}: invalid JSON: {e}")))
}

/// `POST {base_url}/predict` with the raw telemetry as body.
pub struct HttpPredictionService {
    base_url: String,
    http: reqwest::Client,
}

impl HttpPredictionService {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: http_client(timeout),
        }
    }
}

#[async_trait]
impl PredictionService for HttpPredictionService {
    async fn predict(&self, telemetry: &Payload) -> AutosentryResult<Payload> {
        let url = format!("{}/predict", self.base_url);
        debug!(url = %url, "Requesting failure prediction");
        match post_json(&self.http, &url, &Value::Object(telemetry.clone())).await? {
            Value::Object(map) => Ok(map),
            other => Err(AutosentryError::Collaborator(format!(
                "{url}: expected a JSON object, got {other}"
            ))),
        }
    }
}

/// `POST {base_url}/score` with `{"agent_action": {..}}` as body.
pub struct HttpBehaviorScorer {
    base_url: String,
    http: reqwest::Client,
}

impl HttpBehaviorScorer {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: http_client(timeout),
        }
    }
}

#[async_trait]
impl BehaviorScorer for HttpBehaviorScorer {
    async fn score(&self, action: &AgentAction) -> AutosentryResult<BehaviorReport> {
        let url = format!("{}/score", self.base_url);
        debug!(url = %url, action = %action.action_type, "Reporting action for behavior scoring");
        let value = post_json(&self.http, &url, &json!({ "agent_action": action })).await?;
        serde_json::from_value(value)
            .map_err(|e| AutosentryError::Collaborator(format!("{url}: unexpected response: {e}")))
    }
}
