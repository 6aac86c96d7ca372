use async_trait::async_trait;
use lagoon_core::payment::{
    AuthorizeRequest, AuthorizedPayment, DeclineReason, GatewayError, PaymentGateway, PaymentSplit,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Gateway adapter for a card-payment processor reached over HTTP.
///
/// Creates held charges with manual capture and marketplace split metadata;
/// processor error codes stay opaque here and are collapsed into the
/// engine's own decline taxonomy before anything reaches a caller.
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct IntentBody<'a> {
    amount: i64,
    currency: &'a str,
    capture_method: &'static str,
    reference: &'a str,
    operator_id: uuid::Uuid,
    operator_amount: i64,
    platform_fee: i64,
    commission_rate_bps: u32,
    metadata: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct IntentResponse {
    id: String,
    amount: i64,
    operator_amount: i64,
    platform_fee: i64,
}

#[derive(Debug, Deserialize, Default)]
struct ProcessorError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn classify_failure(response: reqwest::Response) -> GatewayError {
        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return GatewayError::Unavailable(format!("processor returned {status}"));
        }

        let body: ProcessorError = response.json().await.unwrap_or_default();
        if status.as_u16() == 402 {
            let reason = body
                .code
                .as_deref()
                .map(DeclineReason::from_processor_code)
                .unwrap_or(DeclineReason::Unknown);
            return GatewayError::Declined(reason);
        }

        GatewayError::Rejected(
            body.message
                .or(body.code)
                .unwrap_or_else(|| format!("processor returned {status}")),
        )
    }

    async fn post_terminal(&self, url: String) -> Result<(), GatewayError> {
        let response = self
            .client
            .post(url)
            .send()
            .await
            .map_err(|err| GatewayError::Unavailable(err.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::classify_failure(response).await)
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    async fn authorize(&self, request: &AuthorizeRequest) -> Result<AuthorizedPayment, GatewayError> {
        let body = IntentBody {
            amount: request.amount,
            currency: &request.currency,
            capture_method: "manual",
            reference: &request.reference,
            operator_id: request.operator_id,
            operator_amount: request.split.operator_amount,
            platform_fee: request.split.platform_fee,
            commission_rate_bps: request.commission_rate_bps,
            metadata: &request.metadata,
        };

        let response = self
            .client
            .post(format!("{}/v1/intents", self.base_url))
            .header("Idempotency-Key", &request.idempotency_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| GatewayError::Unavailable(err.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::classify_failure(response).await);
        }

        let intent: IntentResponse = response
            .json()
            .await
            .map_err(|err| GatewayError::Rejected(format!("malformed processor response: {err}")))?;

        Ok(AuthorizedPayment {
            external_ref: intent.id,
            amount: intent.amount,
            split: PaymentSplit {
                operator_amount: intent.operator_amount,
                platform_fee: intent.platform_fee,
            },
        })
    }

    async fn capture(&self, external_ref: &str) -> Result<(), GatewayError> {
        self.post_terminal(format!("{}/v1/intents/{external_ref}/capture", self.base_url))
            .await
    }

    async fn void_or_refund(&self, external_ref: &str) -> Result<(), GatewayError> {
        self.post_terminal(format!("{}/v1/intents/{external_ref}/cancel", self.base_url))
            .await
    }
}

/// Which gateway operation was invoked; recorded by [`MockGateway`] so tests
/// can count side-effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayCall {
    Authorize,
    Capture,
    VoidOrRefund,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IntentState {
    Authorized,
    Captured,
    Voided,
}

#[derive(Default)]
struct MockInner {
    intents: HashMap<String, IntentState>,
    calls: Vec<(GatewayCall, String)>,
    sequence: u64,
}

/// In-process processor double with strict per-intent state: capturing a
/// voided hold or double-voiding is an error, exactly like the real
/// processor, so engine idempotency bugs surface in tests instead of being
/// absorbed.
#[derive(Default)]
pub struct MockGateway {
    inner: parking_lot::Mutex<MockInner>,
    decline: Option<DeclineReason>,
    unavailable: bool,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gateway that declines every authorization with the given reason.
    pub fn declining(reason: DeclineReason) -> Self {
        Self {
            decline: Some(reason),
            ..Self::default()
        }
    }

    /// Gateway whose processor is unreachable.
    pub fn unreachable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<(GatewayCall, String)> {
        self.inner.lock().calls.clone()
    }

    pub fn call_count(&self, call: GatewayCall) -> usize {
        self.inner.lock().calls.iter().filter(|(c, _)| *c == call).count()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn authorize(&self, request: &AuthorizeRequest) -> Result<AuthorizedPayment, GatewayError> {
        let mut inner = self.inner.lock();
        inner
            .calls
            .push((GatewayCall::Authorize, request.reference.clone()));

        if self.unavailable {
            return Err(GatewayError::Unavailable("connection refused".to_string()));
        }
        if let Some(reason) = self.decline {
            return Err(GatewayError::Declined(reason));
        }

        inner.sequence += 1;
        let external_ref = format!("pi_mock_{:06}", inner.sequence);
        inner
            .intents
            .insert(external_ref.clone(), IntentState::Authorized);

        Ok(AuthorizedPayment {
            external_ref,
            amount: request.amount,
            split: request.split,
        })
    }

    async fn capture(&self, external_ref: &str) -> Result<(), GatewayError> {
        let mut inner = self.inner.lock();
        inner
            .calls
            .push((GatewayCall::Capture, external_ref.to_string()));

        match inner.intents.get(external_ref).copied() {
            None => Err(GatewayError::Rejected(format!(
                "unknown intent {external_ref}"
            ))),
            Some(IntentState::Authorized) => {
                inner
                    .intents
                    .insert(external_ref.to_string(), IntentState::Captured);
                Ok(())
            }
            Some(IntentState::Captured) => Err(GatewayError::Rejected(format!(
                "intent {external_ref} already captured"
            ))),
            Some(IntentState::Voided) => Err(GatewayError::Rejected(format!(
                "intent {external_ref} has been canceled"
            ))),
        }
    }

    async fn void_or_refund(&self, external_ref: &str) -> Result<(), GatewayError> {
        let mut inner = self.inner.lock();
        inner
            .calls
            .push((GatewayCall::VoidOrRefund, external_ref.to_string()));

        match inner.intents.get(external_ref).copied() {
            None => Err(GatewayError::Rejected(format!(
                "unknown intent {external_ref}"
            ))),
            // Void of an uncaptured hold and refund of a captured charge are
            // both terminal here, mirroring the processor-side dispatch.
            Some(IntentState::Authorized) | Some(IntentState::Captured) => {
                inner
                    .intents
                    .insert(external_ref.to_string(), IntentState::Voided);
                Ok(())
            }
            Some(IntentState::Voided) => Err(GatewayError::Rejected(format!(
                "intent {external_ref} already canceled"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn request(reference: &str) -> AuthorizeRequest {
        AuthorizeRequest {
            amount: 15_000,
            currency: "XPF".to_string(),
            reference: reference.to_string(),
            idempotency_key: format!("auth-{reference}"),
            operator_id: Uuid::new_v4(),
            split: PaymentSplit {
                operator_amount: 13_350,
                platform_fee: 1_650,
            },
            commission_rate_bps: 1_100,
            metadata: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn mock_enforces_intent_lifecycle() {
        let gateway = MockGateway::new();
        let authorized = gateway.authorize(&request("LGN-1-AAAA")).await.unwrap();

        gateway.capture(&authorized.external_ref).await.unwrap();
        // Capture is terminal: a second capture is a processor-side error.
        assert!(gateway.capture(&authorized.external_ref).await.is_err());
        // Refund of the captured charge is still allowed once.
        gateway.void_or_refund(&authorized.external_ref).await.unwrap();
        assert!(gateway.void_or_refund(&authorized.external_ref).await.is_err());
    }

    #[tokio::test]
    async fn mock_void_releases_uncaptured_hold() {
        let gateway = MockGateway::new();
        let authorized = gateway.authorize(&request("LGN-2-BBBB")).await.unwrap();

        gateway.void_or_refund(&authorized.external_ref).await.unwrap();
        assert!(gateway.capture(&authorized.external_ref).await.is_err());
        assert_eq!(gateway.call_count(GatewayCall::VoidOrRefund), 1);
    }

    #[tokio::test]
    async fn declining_gateway_reports_reason() {
        let gateway = MockGateway::declining(DeclineReason::InsufficientFunds);
        let err = gateway.authorize(&request("LGN-3-CCCC")).await.unwrap_err();
        match err {
            GatewayError::Declined(reason) => {
                assert_eq!(reason, DeclineReason::InsufficientFunds)
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
