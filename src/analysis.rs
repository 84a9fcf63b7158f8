use async_trait::async_trait;
use serde_json::{json, Value};
use url::Url;

use crate::model::{PiiRiskSummary, RiskReport};
use crate::{Config, ProfileError, Result};

const LOG_PREFIX: &str = "[analysis]";

/// Body returned by the analysis service.
///
/// Only the parts the screen uses are kept, and none of them is required.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AnalysisResponse {
    pub summary: Option<String>,
    pub pii_risk_summary: Option<PiiRiskSummary>,
}

impl AnalysisResponse {
    pub fn from_value(value: &Value) -> Self {
        let summary = value
            .get("summary")
            .and_then(Value::as_str)
            .map(str::to_owned);
        let pii_risk_summary = value
            .pointer("/analysis/pii_risk_summary")
            .and_then(|pii| {
                serde_json::from_value::<PiiRiskSummary>(pii.clone()).ok()
            });
        Self {
            summary,
            pii_risk_summary,
        }
    }

    /// The report to alert on, present when the service explained a risk.
    pub fn risk_report(&self) -> Option<RiskReport> {
        let summary = self.summary.as_deref()?.trim();
        if summary.is_empty() {
            return None;
        }
        Some(RiskReport {
            summary: summary.to_owned(),
            pii: self.pii_risk_summary.clone()?,
        })
    }
}

/// Scores the uploaded photo of a user for exposure of personal data.
#[async_trait]
pub trait RiskAnalyzer: Send + Sync {
    async fn analyze(&self, user_id: &str, token: &str)
        -> Result<AnalysisResponse>;
}

/// [`RiskAnalyzer`] calling `POST /api/image/analyze-image`.
pub struct HttpRiskAnalyzer {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpRiskAnalyzer {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().build()?,
            endpoint: config.analysis_endpoint()?,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl RiskAnalyzer for HttpRiskAnalyzer {
    async fn analyze(
        &self,
        user_id: &str,
        token: &str,
    ) -> Result<AnalysisResponse> {
        log::info!("{} analyzing photo of {}", LOG_PREFIX, user_id);
        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(token)
            .json(&json!({ "userid": user_id }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::error!("{} backend analysis error: {}", LOG_PREFIX, body);
            return Err(ProfileError::Status(status.as_u16(), body));
        }

        let body: Value = response.json().await?;
        let parsed = AnalysisResponse::from_value(&body);
        log::debug!("{} response {:?}", LOG_PREFIX, parsed);
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const RISKY: &str = r#"{
        "summary": "Your photo shows a street sign.",
        "analysis": {
            "pii_risk_summary": { "score": 0.82, "level": "high", "summary": "location" },
            "objects": ["sign"]
        }
    }"#;

    fn analyzer(server: &mockito::ServerGuard) -> HttpRiskAnalyzer {
        let config = Config::default()
            .with_backend_url(&server.url())
            .unwrap();
        HttpRiskAnalyzer::new(&config).unwrap()
    }

    #[tokio::test]
    async fn posts_user_id_with_bearer_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/image/analyze-image")
            .match_header("authorization", "Bearer tok")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(json!({ "userid": "u1" })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(RISKY)
            .expect(1)
            .create_async()
            .await;

        let response = analyzer(&server).analyze("u1", "tok").await.unwrap();
        let report = response.risk_report().unwrap();
        assert_eq!(report.summary, "Your photo shows a street sign.");
        assert_eq!(report.pii.level, "high");
        assert_eq!(report.pii.score, 0.82);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/image/analyze-image")
            .with_status(500)
            .with_body("model offline")
            .create_async()
            .await;

        let result = analyzer(&server).analyze("u1", "").await;
        assert!(matches!(result, Err(ProfileError::Status(500, _))));
    }

    #[test]
    fn lenient_parsing() {
        let response = AnalysisResponse::from_value(&json!({
            "summary": "ok",
            "analysis": { "pii_risk_summary": { "score": "high" } }
        }));
        assert_eq!(response.summary.as_deref(), Some("ok"));
        assert_eq!(response.pii_risk_summary, None);
        assert_eq!(response.risk_report(), None);

        let empty = AnalysisResponse::from_value(&json!({}));
        assert_eq!(empty, AnalysisResponse::default());
    }

    #[test]
    fn blank_summary_is_not_a_risk() {
        let mut response =
            AnalysisResponse::from_value(&serde_json::from_str(RISKY).unwrap());
        assert!(response.risk_report().is_some());
        response.summary = Some("   ".into());
        assert_eq!(response.risk_report(), None);
    }
}
