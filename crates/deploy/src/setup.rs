//! Post-deployment setup: configuration calls sent as one atomic batch, or one by one when the
//! batch fails.

use alloy_core::primitives::{Address, B256, Bytes};
use derive_more::Deref;
use serde::{Deserialize, Serialize};

use crate::{BatchAggregator, ChainClient, DeployContext, DeployError, DeploymentRegistry, TxRequest};

/// A configuration call against a deployed contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupCall {
    pub target: Address,
    pub call_data: Bytes,
}

/// Produces setup calls from the deployments of a run.
///
/// Implementations are pure functions of the registry.
pub trait SetupBuilder {
    fn build(&self, registry: &DeploymentRegistry) -> Result<Vec<SetupCall>, DeployError>;
}

/// Flat, ordered list of setup calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deref)]
pub struct SetupBatch(Vec<SetupCall>);

impl SetupBatch {
    /// Concatenate the calls of every builder, in builder order.
    pub fn collect(
        registry: &DeploymentRegistry,
        builders: &[&dyn SetupBuilder],
    ) -> Result<Self, DeployError> {
        let mut calls = Vec::new();
        for builder in builders {
            calls.extend(builder.build(registry)?);
        }
        Ok(Self(calls))
    }
}

impl From<Vec<SetupCall>> for SetupBatch {
    fn from(calls: Vec<SetupCall>) -> Self {
        Self(calls)
    }
}

/// How a setup batch went through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupOutcome {
    /// Nothing to send.
    Empty,
    /// All calls were committed in a single aggregated transaction.
    Batched { tx_hash: B256 },
    /// The aggregated call failed and every call was sent on its own.
    Sequential {
        tx_hashes: Vec<B256>,
        batch_error: String,
    },
}

/// Execute `batch` atomically, falling back to sequential calls if the aggregated call fails.
///
/// A failing call in the fallback is not retried: it surfaces as
/// [`DeployError::SetupCallFailed`] and the calls before it stay committed.
pub async fn execute_setup<C, A>(
    ctx: &DeployContext<C, A>,
    batch: &SetupBatch,
) -> Result<SetupOutcome, DeployError>
where
    C: ChainClient,
    A: BatchAggregator,
{
    tracing::info!(calls = batch.len(), "After deployment setup calls");
    if batch.is_empty() {
        return Ok(SetupOutcome::Empty);
    }

    let batch_error = match execute_batch(ctx, batch).await {
        Ok(tx_hash) => {
            tracing::info!(%tx_hash, "After deployment setup multicall executed");
            return Ok(SetupOutcome::Batched { tx_hash });
        }
        Err(e) => e,
    };

    tracing::warn!(
        error = %batch_error,
        "Setup multicall failed, sending calls one by one"
    );

    let mut tx_hashes = Vec::with_capacity(batch.len());
    for (index, call) in batch.iter().enumerate() {
        match execute_single(ctx, call).await {
            Ok(tx_hash) => {
                tracing::debug!(call = index + 1, target = %call.target, %tx_hash, "Setup call executed");
                tx_hashes.push(tx_hash);
            }
            Err(cause) => {
                tracing::error!(call = index + 1, target = %call.target, error = %format!("{cause:#}"), "Setup call failed");
                return Err(DeployError::SetupCallFailed {
                    call_index: index + 1,
                    committed: tx_hashes,
                    cause,
                });
            }
        }
    }

    Ok(SetupOutcome::Sequential {
        tx_hashes,
        batch_error: batch_error.to_string(),
    })
}

async fn execute_batch<C, A>(
    ctx: &DeployContext<C, A>,
    batch: &SetupBatch,
) -> Result<B256, DeployError>
where
    C: ChainClient,
    A: BatchAggregator,
{
    let tx_hash = ctx
        .aggregator
        .aggregate(batch)
        .await
        .map_err(DeployError::BatchAggregationFailed)?;
    ctx.chain
        .wait(tx_hash, ctx.confirmations)
        .await
        .map_err(DeployError::BatchAggregationFailed)?;
    Ok(tx_hash)
}

async fn execute_single<C, A>(ctx: &DeployContext<C, A>, call: &SetupCall) -> anyhow::Result<B256>
where
    C: ChainClient,
{
    let tx_hash = ctx.chain.send_transaction(&TxRequest::from(call)).await?;
    ctx.chain.wait(tx_hash, ctx.confirmations).await?;
    Ok(tx_hash)
}
