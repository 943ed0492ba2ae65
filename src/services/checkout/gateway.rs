use crate::{
    config::GatewayConfig,
    errors::ServiceError,
    models::VerificationResult,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Gateway verify codes. 100 is a first-time success, 101 means the
/// transaction was verified before; both are success variants.
const VERIFY_CODE_OK: i64 = 100;
const VERIFY_CODE_ALREADY_VERIFIED: i64 = 101;

/// Payment request sent to the gateway's payment-request endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    /// Amount in the smallest currency unit; always the order's final price
    pub amount: i64,
    pub description: String,
    pub callback_url: String,
    pub metadata: PaymentMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMetadata {
    pub user_id: Uuid,
}

/// Seam to the redirect-based payment gateway.
///
/// `verify` never reports cancellation; the flow decides that from the
/// callback's `Status` parameter before calling the gateway at all.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Requests a payment and returns the gateway authority token.
    async fn request_payment(&self, request: &PaymentRequest) -> Result<String, ServiceError>;

    /// Verifies a completed transaction. `amount` must be the persisted
    /// order's final price, never a value derived from the callback URL.
    async fn verify(&self, authority: &str, amount: i64) -> Result<VerificationResult, ServiceError>;

    /// URL the user's browser is sent to for a given authority.
    fn redirect_url(&self, authority: &str) -> String;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PaymentRequestBody<'a> {
    merchant_id: &'a str,
    amount: i64,
    description: &'a str,
    callback_url: &'a str,
    metadata: &'a PaymentMetadata,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentRequestResponse {
    authority: Option<String>,
    message: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyBody<'a> {
    merchant_id: &'a str,
    authority: &'a str,
    amount: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyResponse {
    code: i64,
    reference_id: Option<String>,
    message: Option<String>,
}

/// HTTP adapter for the gateway's server-to-server API.
#[derive(Clone)]
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    config: GatewayConfig,
}

impl HttpPaymentGateway {
    pub fn new(config: GatewayConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ServiceError::InternalError(format!("build http client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[instrument(skip(self, request), fields(amount = request.amount))]
    async fn request_payment(&self, request: &PaymentRequest) -> Result<String, ServiceError> {
        let body = PaymentRequestBody {
            merchant_id: &self.config.merchant_id,
            amount: request.amount,
            description: &request.description,
            callback_url: &request.callback_url,
            metadata: &request.metadata,
        };

        let response = self
            .client
            .post(self.endpoint("payment-request"))
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::GatewayUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            warn!(%status, "gateway rejected payment request");
            return Err(ServiceError::GatewayRejected(format!(
                "status {}: {}",
                status, text
            )));
        }

        let parsed: PaymentRequestResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::GatewayUnavailable(format!("malformed response: {}", e)))?;

        match parsed.authority {
            Some(authority) if !authority.is_empty() => {
                info!(%authority, "gateway issued authority");
                Ok(authority)
            }
            _ => Err(ServiceError::GatewayRejected(
                parsed
                    .message
                    .unwrap_or_else(|| "gateway returned no authority".to_string()),
            )),
        }
    }

    #[instrument(skip(self), fields(%authority, amount))]
    async fn verify(
        &self,
        authority: &str,
        amount: i64,
    ) -> Result<VerificationResult, ServiceError> {
        let body = VerifyBody {
            merchant_id: &self.config.merchant_id,
            authority,
            amount,
        };

        let response = self
            .client
            .post(self.endpoint("verify"))
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::GatewayUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ServiceError::GatewayUnavailable(format!(
                "verify endpoint returned status {}",
                response.status()
            )));
        }

        let parsed: VerifyResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::GatewayUnavailable(format!("malformed response: {}", e)))?;

        match (parsed.code, parsed.reference_id) {
            (code @ (VERIFY_CODE_OK | VERIFY_CODE_ALREADY_VERIFIED), Some(reference_id)) => {
                let already_verified = code == VERIFY_CODE_ALREADY_VERIFIED;
                info!(%reference_id, already_verified, "gateway verification succeeded");
                Ok(VerificationResult::Verified {
                    reference_id,
                    already_verified,
                })
            }
            (code, _) => Ok(VerificationResult::Failed {
                code: Some(code),
                message: parsed
                    .message
                    .unwrap_or_else(|| format!("gateway returned code {}", code)),
            }),
        }
    }

    fn redirect_url(&self, authority: &str) -> String {
        format!(
            "{}/{}",
            self.config.start_pay_base_url.trim_end_matches('/'),
            authority
        )
    }
}
