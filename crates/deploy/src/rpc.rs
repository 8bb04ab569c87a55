//! JSON-RPC chain client.
//!
//! Transactions are sent with `eth_sendTransaction`, so the signer must be an account managed by
//! the node (anvil, hardhat node, or a node with an unlocked account).

use std::{str::FromStr, time::Duration};

use alloy_core::primitives::{Address, B256};
use anyhow::Context;
use backon::{ConstantBuilder, Retryable};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use url::Url;

use crate::{ArgValue, ChainClient, ContractFactory, PendingDeployment, TxRequest};

/// Default timeout for RPC requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default interval between receipt polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client() -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .context("Failed to create HTTP client")
}

/// Make a JSON-RPC call and deserialize the result.
///
/// An `error` member in the response is turned into an error carrying the node's message (and
/// revert data, when present).
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Vec<Value>,
) -> Result<T, anyhow::Error> {
    let response = client
        .post(url)
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .with_context(|| format!("Failed to send {} request", method))?;

    let result: Value = response
        .json()
        .await
        .with_context(|| format!("Failed to parse {} response", method))?;

    if let Some(error) = result.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown");
        match error.get("data").filter(|d| !d.is_null()) {
            Some(data) => anyhow::bail!("RPC error: {} (data: {})", message, data),
            None => anyhow::bail!("RPC error: {}", message),
        }
    }

    let result_value = result
        .get("result")
        .context("No result in response")?
        .clone();

    serde_json::from_value(result_value)
        .with_context(|| format!("Failed to deserialize {} result", method))
}

/// Parse a `0x`-prefixed hex quantity.
pub(crate) fn parse_quantity(value: &str) -> anyhow::Result<u64> {
    u64::from_str_radix(value.trim_start_matches("0x"), 16)
        .with_context(|| format!("Invalid hex quantity: {value}"))
}

/// The fields of a transaction receipt we care about.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Receipt {
    status: Option<String>,
    block_number: Option<String>,
}

/// Why a receipt poll did not succeed.
#[derive(Debug, thiserror::Error)]
enum WaitError {
    #[error("transaction {0} not mined yet")]
    NotMined(B256),
    #[error("transaction {tx_hash} has {current} of {required} confirmations")]
    NotConfirmed {
        tx_hash: B256,
        current: u64,
        required: u64,
    },
    #[error("transaction {0} reverted")]
    Reverted(B256),
    #[error(transparent)]
    Rpc(#[from] anyhow::Error),
}

impl WaitError {
    fn is_retryable(&self) -> bool {
        !matches!(self, Self::Reverted(_))
    }
}

/// [`ChainClient`] over HTTP JSON-RPC.
#[derive(Debug, Clone)]
pub struct RpcChain {
    client: reqwest::Client,
    url: String,
    from: Address,
    poll_interval: Duration,
    receipt_timeout: Duration,
}

impl RpcChain {
    pub fn new(rpc_url: &str, from: Address) -> anyhow::Result<Self> {
        let url = Url::parse(rpc_url).with_context(|| format!("Invalid RPC URL: {rpc_url}"))?;
        Ok(Self {
            client: create_client()?,
            url: url.to_string(),
            from,
            poll_interval: DEFAULT_POLL_INTERVAL,
            receipt_timeout: Duration::from_secs(300),
        })
    }

    pub fn with_receipt_timeout(mut self, timeout: Duration) -> Self {
        self.receipt_timeout = timeout;
        self
    }

    pub fn signer(&self) -> Address {
        self.from
    }

    pub(crate) async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> anyhow::Result<T> {
        json_rpc_call(&self.client, &self.url, method, params).await
    }

    /// The chain id reported by the node.
    pub async fn chain_id(&self) -> anyhow::Result<u64> {
        let id: String = self.call("eth_chainId", vec![]).await?;
        parse_quantity(&id)
    }

    /// The first account managed by the node.
    pub async fn default_account(rpc_url: &str) -> anyhow::Result<Address> {
        let client = create_client()?;
        let accounts: Vec<Address> = json_rpc_call(&client, rpc_url, "eth_accounts", vec![])
            .await
            .context("Failed to list node accounts")?;
        accounts
            .into_iter()
            .next()
            .context("The node manages no account; configure a signer")
    }

    async fn nonce(&self) -> anyhow::Result<u64> {
        let nonce: String = self
            .call(
                "eth_getTransactionCount",
                vec![
                    serde_json::json!(self.from),
                    serde_json::json!("pending"),
                ],
            )
            .await
            .context("Failed to fetch signer nonce")?;
        parse_quantity(&nonce)
    }

    /// CREATE address of the signer's transaction with `nonce`.
    fn created_address(&self, nonce: u64) -> Address {
        self.from.create(nonce)
    }

    fn tx_object(&self, request: &TxRequest) -> Value {
        let mut tx = serde_json::json!({
            "from": self.from,
            "data": request.data,
        });
        if let Some(to) = request.to {
            tx["to"] = serde_json::json!(to);
        }
        tx
    }

    async fn send(&self, request: &TxRequest) -> anyhow::Result<B256> {
        let hash: String = self
            .call("eth_sendTransaction", vec![self.tx_object(request)])
            .await?;
        B256::from_str(&hash).with_context(|| format!("Invalid transaction hash: {hash}"))
    }

    async fn poll_receipt(&self, tx_hash: B256, confirmations: u64) -> Result<(), WaitError> {
        let receipt: Option<Receipt> = self
            .call("eth_getTransactionReceipt", vec![serde_json::json!(tx_hash)])
            .await?;

        let Some(receipt) = receipt else {
            return Err(WaitError::NotMined(tx_hash));
        };
        let Some(block_number) = receipt.block_number else {
            return Err(WaitError::NotMined(tx_hash));
        };
        if receipt.status.as_deref() == Some("0x0") {
            return Err(WaitError::Reverted(tx_hash));
        }

        let mined_at = parse_quantity(&block_number)?;
        let head: String = self.call("eth_blockNumber", vec![]).await?;
        let current = parse_quantity(&head)?.saturating_sub(mined_at) + 1;
        if current < confirmations {
            return Err(WaitError::NotConfirmed {
                tx_hash,
                current,
                required: confirmations,
            });
        }
        Ok(())
    }
}

impl ChainClient for RpcChain {
    async fn simulate(&self, request: &TxRequest) -> anyhow::Result<()> {
        let _: Value = self
            .call("eth_call", vec![self.tx_object(request), serde_json::json!("latest")])
            .await
            .context("Static call reverted")?;
        Ok(())
    }

    async fn deploy(
        &self,
        factory: &ContractFactory,
        args: &[ArgValue],
    ) -> anyhow::Result<PendingDeployment> {
        let nonce = self.nonce().await?;
        let request = TxRequest::create(factory.creation_code(args));
        let tx_hash = self
            .send(&request)
            .await
            .with_context(|| format!("Failed to submit {} creation", factory.name))?;

        Ok(PendingDeployment {
            address: self.created_address(nonce),
            tx_hash,
        })
    }

    async fn send_transaction(&self, request: &TxRequest) -> anyhow::Result<B256> {
        self.send(request).await
    }

    async fn wait(&self, tx_hash: B256, confirmations: u64) -> anyhow::Result<()> {
        let max_polls = (self.receipt_timeout.as_millis() / self.poll_interval.as_millis().max(1))
            .max(1) as usize;

        (|| self.poll_receipt(tx_hash, confirmations))
            .retry(
                ConstantBuilder::default()
                    .with_delay(self.poll_interval)
                    .with_max_times(max_polls),
            )
            .when(WaitError::is_retryable)
            .notify(|err, _| tracing::trace!(error = %err, "Waiting for receipt..."))
            .await
            .map_err(anyhow::Error::from)
            .with_context(|| format!("Transaction {tx_hash} was not confirmed"))
    }
}
