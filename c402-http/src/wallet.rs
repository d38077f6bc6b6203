//! A [`WalletBackend`] implementation for a custodial wallet HTTP API.
//!
//! ## Endpoints
//!
//! - `POST {base}/wallets/{locator}/transactions` submits calls; the body is
//!   `{"params": {"calls": <call or [calls]>, "chain": <network>}}` and the
//!   `x-idempotency-key` header makes resubmission return the original
//!   transaction
//! - `GET {base}/wallets/{locator}/transactions/{id}` polls a transaction
//!
//! After submitting, the client polls once per [`WalletClient::with_poll_interval`]
//! until the transaction leaves `pending` or the deadline passes. The deadline
//! bounds the whole submission: each poll only gets the time left before it.
//! Hitting the deadline while polling is not an error: the last observed
//! (pending) result is returned and the caller decides what that means.

use std::time::Duration;

use alloy_primitives::B256;
use c402::BoxFuture;
use c402_evm::wallet::{
    CallPayload, TransactionResult, TransactionStatus, WalletBackend, WalletError, WalletSubmission,
};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, sleep_until, timeout_at};
use url::Url;

#[cfg(feature = "telemetry")]
use tracing::{Instrument, instrument};

use crate::client::{ApiClient, ClientError, join, normalize_base, push_segment};

/// Header carrying the idempotency key of a submission.
pub const IDEMPOTENCY_KEY_HEADER: &str = "x-idempotency-key";

const SUBMIT: &str = "POST /transactions";
const POLL: &str = "GET /transactions/{id}";

impl From<ClientError> for WalletError {
    fn from(error: ClientError) -> Self {
        match error {
            ClientError::HttpStatus { status, .. }
                if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS =>
            {
                Self::Unavailable(error.to_string())
            }
            ClientError::HttpStatus { status, body, .. } => Self::Rejected {
                status: status.as_u16(),
                message: body,
            },
            e @ (ClientError::Http { .. }
            | ClientError::DeadlineElapsed { .. }
            | ClientError::ResponseBodyRead { .. }) => Self::Unavailable(e.to_string()),
            e @ (ClientError::JsonDeserialization { .. }
            | ClientError::UrlParse { .. }
            | ClientError::CannotBeABase(_)) => Self::InvalidResponse(e.to_string()),
        }
    }
}

#[derive(Serialize)]
struct SubmitBody<'a> {
    params: SubmitParams<'a>,
}

#[derive(Serialize)]
struct SubmitParams<'a> {
    calls: &'a CallPayload,
    chain: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionBody {
    id: String,
    status: String,
    #[serde(default)]
    on_chain: Option<OnChainBody>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OnChainBody {
    #[serde(default)]
    tx_id: Option<B256>,
}

impl From<TransactionBody> for TransactionResult {
    fn from(body: TransactionBody) -> Self {
        // Anything the wallet has not finalised yet counts as pending.
        let status = match body.status.as_str() {
            "success" => TransactionStatus::Success,
            "failed" => TransactionStatus::Failed,
            _ => TransactionStatus::Pending,
        };
        let error = body.error.map(|value| match value {
            serde_json::Value::String(message) => message,
            other => other.to_string(),
        });
        Self {
            id: body.id,
            transaction_hash: body.on_chain.and_then(|chain| chain.tx_id),
            status,
            error,
        }
    }
}

/// A client for one custodial wallet.
#[derive(Clone, Debug)]
pub struct WalletClient {
    /// Full URL of the wallet's transactions collection.
    transactions_url: Url,
    /// Authenticated transport.
    api: ApiClient,
    /// Delay between status polls.
    poll_interval: Duration,
    /// Total time allowed for a submission to confirm.
    deadline: Duration,
}

impl WalletClient {
    /// Default delay between status polls.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

    /// Default confirmation deadline.
    pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(300);

    /// Constructs a client for the wallet `locator` under `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if URL construction fails.
    pub fn try_new(
        base_url: Url,
        api_key: impl Into<String>,
        locator: &str,
    ) -> Result<Self, ClientError> {
        let base_url = normalize_base(base_url).map_err(ClientError::CannotBeABase)?;
        let wallets_url = join(&base_url, "./wallets", "Failed to construct ./wallets URL")?;
        let transactions_url = push_segment(&push_segment(&wallets_url, locator)?, "transactions")?;
        Ok(Self {
            transactions_url,
            api: ApiClient::new(api_key),
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            deadline: Self::DEFAULT_DEADLINE,
        })
    }

    /// Sets the delay between status polls.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the confirmation deadline.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Sets a timeout for every individual request.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.api.set_timeout(timeout);
        self
    }

    /// Returns the transactions collection URL.
    #[must_use]
    pub const fn transactions_url(&self) -> &Url {
        &self.transactions_url
    }

    /// Submits a transaction and polls it until terminal or the deadline.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if a request fails, or
    /// [`ClientError::DeadlineElapsed`] if the submission itself is not
    /// answered in time.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "c402.wallet.submit", skip_all, err, fields(
            idempotency_key = %submission.idempotency_key,
            network = %submission.network,
            otel.status_code = tracing::field::Empty,
            error.message = tracing::field::Empty,
        ))
    )]
    pub async fn submit(
        &self,
        submission: &WalletSubmission,
    ) -> Result<TransactionResult, ClientError> {
        let deadline = Instant::now() + self.deadline;
        let body = SubmitBody {
            params: SubmitParams {
                calls: &submission.calls,
                chain: &submission.network,
            },
        };
        let request = self
            .api
            .post(self.transactions_url.clone())
            .header(IDEMPOTENCY_KEY_HEADER, &submission.idempotency_key)
            .json(&body);
        let submitted: TransactionBody = timeout_at(deadline, self.api.send_json(request, SUBMIT))
            .await
            .map_err(|_| ClientError::DeadlineElapsed { context: SUBMIT })??;
        let mut current = TransactionResult::from(submitted);

        while !current.status.is_terminal() {
            let next_poll = Instant::now() + self.poll_interval;
            if next_poll >= deadline {
                break;
            }
            sleep_until(next_poll).await;
            match timeout_at(deadline, self.transaction(&current.id)).await {
                Ok(polled) => current = polled?,
                Err(_) => break,
            }
        }
        if !current.status.is_terminal() {
            #[cfg(feature = "telemetry")]
            tracing::warn!(transaction_id = %current.id, "wallet transaction pending at deadline");
        }
        Ok(current)
    }

    /// Fetches the current state of a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if the request fails.
    pub async fn transaction(&self, id: &str) -> Result<TransactionResult, ClientError> {
        let url = push_segment(&self.transactions_url, id)?;
        let fut = self.api.send_json::<TransactionBody>(self.api.get(url), POLL);
        #[cfg(feature = "telemetry")]
        let fut = fut.instrument(tracing::debug_span!("c402.wallet.poll", transaction_id = %id));
        Ok(fut.await?.into())
    }
}

impl WalletBackend for WalletClient {
    fn submit(
        &self,
        submission: WalletSubmission,
    ) -> BoxFuture<'_, Result<TransactionResult, WalletError>> {
        Box::pin(async move { Self::submit(self, &submission).await.map_err(WalletError::from) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, Bytes};
    use c402_evm::wallet::ContractCall;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn submission(calls: CallPayload) -> WalletSubmission {
        WalletSubmission {
            network: "base-sepolia".into(),
            calls,
            idempotency_key: "ord_1-inbound".into(),
        }
    }

    fn call() -> ContractCall {
        ContractCall {
            to: Address::repeat_byte(0x11),
            data: Bytes::from_static(&[0xab]),
            value: None,
        }
    }

    async fn client(server: &MockServer) -> WalletClient {
        WalletClient::try_new(server.uri().parse().unwrap(), "wallet-key", "treasury")
            .unwrap()
            .with_poll_interval(Duration::from_millis(10))
            .with_deadline(Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_submit_sends_idempotency_key_and_single_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/wallets/treasury/transactions"))
            .and(header("x-idempotency-key", "ord_1-inbound"))
            .and(header("X-API-KEY", "wallet-key"))
            .and(body_partial_json(json!({
                "params": {
                    "chain": "base-sepolia",
                    "calls": { "to": "0x1111111111111111111111111111111111111111" }
                }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "tx_1",
                "status": "success",
                "onChain": { "txId": format!("0x{}", "07".repeat(32)) }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = client(&server)
            .await
            .submit(&submission(CallPayload::Single(call())))
            .await
            .unwrap();
        assert_eq!(result.status, TransactionStatus::Success);
        assert_eq!(result.transaction_hash, Some(B256::repeat_byte(7)));
    }

    #[tokio::test]
    async fn test_submit_polls_until_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/wallets/treasury/transactions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "tx_2",
                "status": "pending"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/wallets/treasury/transactions/tx_2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "tx_2",
                "status": "failed",
                "error": { "reason": "execution reverted" }
            })))
            .mount(&server)
            .await;

        let result = client(&server)
            .await
            .submit(&submission(CallPayload::Batch(vec![call()])))
            .await
            .unwrap();
        assert_eq!(result.status, TransactionStatus::Failed);
        assert!(result.error.unwrap().contains("execution reverted"));
    }

    #[tokio::test]
    async fn test_deadline_returns_pending() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/wallets/treasury/transactions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "tx_3",
                "status": "pending"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/wallets/treasury/transactions/tx_3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "tx_3",
                "status": "awaiting-approval"
            })))
            .mount(&server)
            .await;

        let result = client(&server)
            .await
            .submit(&submission(CallPayload::Batch(vec![call()])))
            .await
            .unwrap();
        assert_eq!(result.status, TransactionStatus::Pending);
        assert_eq!(result.id, "tx_3");
    }

    #[tokio::test]
    async fn test_error_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_string("nonce already used"))
            .mount(&server)
            .await;
        let client = client(&server).await;
        let backend: &dyn WalletBackend = &client;
        let err = backend
            .submit(submission(CallPayload::Batch(vec![call()])))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            WalletError::Rejected {
                status: 422,
                message: "nonce already used".into()
            }
        );
    }

    #[tokio::test]
    async fn test_stalled_poll_is_cut_at_deadline() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/wallets/treasury/transactions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "tx_4",
                "status": "pending"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/wallets/treasury/transactions/tx_4"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "id": "tx_4", "status": "success" }))
                    .set_delay(Duration::from_secs(10)),
            )
            .mount(&server)
            .await;

        let client = client(&server).await.with_timeout(Duration::from_secs(10));
        let started = std::time::Instant::now();
        let result = client
            .submit(&submission(CallPayload::Batch(vec![call()])))
            .await
            .unwrap();
        assert_eq!(result.status, TransactionStatus::Pending);
        assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
    }

    #[tokio::test]
    async fn test_stalled_submit_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "id": "tx_5", "status": "success" }))
                    .set_delay(Duration::from_secs(10)),
            )
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .submit(&submission(CallPayload::Batch(vec![call()])))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::DeadlineElapsed { context: SUBMIT }));
        assert!(matches!(WalletError::from(err), WalletError::Unavailable(_)));
    }

    #[test]
    fn test_transactions_url() {
        let base: Url = "https://w.example/api/v1".parse().unwrap();
        let client = WalletClient::try_new(base, "k", "0xabc").unwrap();
        assert_eq!(
            client.transactions_url().as_str(),
            "https://w.example/api/v1/wallets/0xabc/transactions"
        );
    }
}
