use std::time::Duration;

use tracing::{error, info, instrument};

use crate::app::config::settings::EsbSettings;
use crate::app::error::GatewayError;
use crate::app::esb::dto::{EsbRequest, EsbResponse};

/// The ESB operation a request is destined for, selecting which configured
/// path suffix the client posts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EsbOperation {
    Withdrawal,
    Deposit,
    Purchase,
    BalanceInquiry,
    MiniStatement,
}

/// Seam between the processor and whatever actually talks to the ESB — the
/// real HTTP client in production, a canned-response stub in tests.
#[async_trait::async_trait]
pub trait EsbGateway: Send + Sync {
    async fn call(&self, operation: EsbOperation, request: &EsbRequest) -> Result<EsbResponse, GatewayError>;
}

/// Thin HTTP facade over the core-banking ESB. The processor only depends on
/// the [`EsbGateway`] trait and the plain JSON DTOs exchanged over it — no
/// ESB-side object model leaks upstream.
pub struct EsbClient {
    http: reqwest::Client,
    settings: EsbSettings,
}

impl EsbClient {
    pub fn new(settings: EsbSettings) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| GatewayError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, settings })
    }

    fn path_for(&self, operation: EsbOperation) -> &str {
        match operation {
            EsbOperation::Withdrawal => &self.settings.withdrawal,
            EsbOperation::Deposit => &self.settings.deposit,
            EsbOperation::Purchase => &self.settings.purchase,
            EsbOperation::BalanceInquiry => &self.settings.balance_inquiry,
            EsbOperation::MiniStatement => &self.settings.mini_statement,
        }
    }
}

#[async_trait::async_trait]
impl EsbGateway for EsbClient {
    #[instrument(skip(self, request), fields(operation = ?operation))]
    async fn call(&self, operation: EsbOperation, request: &EsbRequest) -> Result<EsbResponse, GatewayError> {
        let url = format!("{}{}", self.settings.base_url, self.path_for(operation));
        let started = std::time::Instant::now();

        let resp = self
            .http
            .post(&url)
            .basic_auth(&self.settings.username, Some(&self.settings.password))
            .json(request)
            .send()
            .await
            .map_err(|e| GatewayError::EsbUnavailable(e.to_string()))?;

        let status = resp.status();
        let elapsed_ms = started.elapsed().as_millis();
        let body = resp
            .text()
            .await
            .map_err(|e| GatewayError::EsbUnavailable(e.to_string()))?;

        let parsed = interpret_response(status, &body)?;
        info!(elapsed_ms, %status, response_code = ?parsed.response_code, "ESB call completed");
        Ok(parsed)
    }
}

/// Turns an HTTP status + body into the `EsbResponse` the rest of the
/// gateway reasons about. 3xx and 4xx replies are not failures to propagate
/// as a bare error: they carry the response codes `JsonToIso` maps to "51"
/// and "14" respectively. Any other non-2xx status is a genuine ESB error.
/// A 2xx reply with an empty body is treated as an implicit approval.
fn interpret_response(status: reqwest::StatusCode, body: &str) -> Result<EsbResponse, GatewayError> {
    if status.is_redirection() {
        error!(%status, body, "ESB returned a redirect");
        return Ok(EsbResponse {
            response_code: Some("51".into()),
            message: Some(format!("HTTP {status}")),
            ..Default::default()
        });
    }
    if status.is_client_error() {
        error!(%status, body, "ESB rejected the request");
        return Ok(EsbResponse {
            response_code: Some("14".into()),
            message: Some(format!("HTTP {status}")),
            ..Default::default()
        });
    }
    if !status.is_success() {
        error!(%status, body, "ESB returned a non-2xx status");
        return Err(GatewayError::EsbError(format!("HTTP {status}")));
    }

    if body.trim().is_empty() {
        return Ok(EsbResponse {
            response_code: Some("00".into()),
            message: Some(status.canonical_reason().unwrap_or("OK").to_string()),
            ..Default::default()
        });
    }

    serde_json::from_str(body).map_err(|e| {
        error!(error = %e, body, "ESB response did not parse as JSON");
        GatewayError::EsbError(format!("malformed ESB response: {e}"))
    })
}
