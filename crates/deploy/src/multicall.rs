//! Multicall3 `aggregate3` as the atomic batch primitive.

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Address, B256, Bytes, address},
};
use anyhow::Context;

use crate::{BatchAggregator, RpcChain, SetupCall, TxRequest, args::selector};

/// Canonical Multicall3 deployment address, identical on most EVM chains.
pub const MULTICALL3_ADDRESS: Address = address!("cA11bde05977b3631167028862bE2a173976CA11");

const AGGREGATE3_SIGNATURE: &str = "aggregate3((address,bool,bytes)[])";

/// Encode an `aggregate3` call where every sub-call must succeed.
pub fn encode_aggregate3(calls: &[SetupCall]) -> Bytes {
    let call3s = calls
        .iter()
        .map(|call| {
            DynSolValue::Tuple(vec![
                DynSolValue::Address(call.target),
                DynSolValue::Bool(false),
                DynSolValue::Bytes(call.call_data.to_vec()),
            ])
        })
        .collect();

    let mut data = selector(AGGREGATE3_SIGNATURE).to_vec();
    data.extend(DynSolValue::Tuple(vec![DynSolValue::Array(call3s)]).abi_encode_params());
    data.into()
}

/// Sends setup batches through a Multicall3 contract.
#[derive(Debug, Clone)]
pub struct Multicall3 {
    chain: RpcChain,
    address: Address,
}

impl Multicall3 {
    pub fn new(chain: RpcChain, address: Address) -> Self {
        Self { chain, address }
    }

    pub fn address(&self) -> Address {
        self.address
    }
}

impl BatchAggregator for Multicall3 {
    async fn aggregate(&self, calls: &[SetupCall]) -> anyhow::Result<B256> {
        let code: Bytes = self
            .chain
            .call(
                "eth_getCode",
                vec![serde_json::json!(self.address), serde_json::json!("latest")],
            )
            .await
            .context("Failed to fetch Multicall3 code")?;
        if code.is_empty() {
            anyhow::bail!("No Multicall3 contract at {}", self.address);
        }

        let request = TxRequest::call(self.address, encode_aggregate3(calls));
        crate::ChainClient::send_transaction(&self.chain, &request)
            .await
            .context("Failed to send aggregate3")
    }
}
