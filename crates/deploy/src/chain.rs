//! Collaborator traits the deployment core talks to.
//!
//! The core only needs success or failure and the produced addresses; transports, signing and
//! storage formats live behind these traits.

use std::future::Future;

use alloy_core::primitives::{Address, B256, Bytes};
use anyhow::Result;

use crate::{ArgValue, ContractFactory, ResolvedDeployment, SetupCall};

/// A transaction to simulate or send. `to == None` is a contract creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    pub to: Option<Address>,
    pub data: Bytes,
}

impl TxRequest {
    pub fn create(data: Bytes) -> Self {
        Self { to: None, data }
    }

    pub fn call(to: Address, data: Bytes) -> Self {
        Self { to: Some(to), data }
    }
}

impl From<&SetupCall> for TxRequest {
    fn from(call: &SetupCall) -> Self {
        Self::call(call.target, call.call_data.clone())
    }
}

/// A submitted, not yet confirmed, deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingDeployment {
    pub address: Address,
    pub tx_hash: B256,
}

/// Access to the chain: simulation, submission and confirmation.
pub trait ChainClient: Send + Sync {
    /// Dry-run a transaction against the current state. Errors on revert.
    fn simulate(&self, request: &TxRequest) -> impl Future<Output = Result<()>> + Send;

    /// Submit the creation of `factory` with `args`.
    fn deploy(
        &self,
        factory: &ContractFactory,
        args: &[ArgValue],
    ) -> impl Future<Output = Result<PendingDeployment>> + Send;

    /// Submit a call transaction.
    fn send_transaction(&self, request: &TxRequest) -> impl Future<Output = Result<B256>> + Send;

    /// Wait until `tx_hash` is mined with `confirmations` blocks. Errors if it reverted.
    fn wait(&self, tx_hash: B256, confirmations: u64) -> impl Future<Output = Result<()>> + Send;
}

/// An atomic multi-call primitive.
pub trait BatchAggregator: Send + Sync {
    fn aggregate(&self, calls: &[SetupCall]) -> impl Future<Output = Result<B256>> + Send;
}

/// Source-code verification of a deployed contract.
pub trait Verifier: Send + Sync {
    fn verify(&self, deployment: &ResolvedDeployment) -> impl Future<Output = Result<()>> + Send;
}

/// A yes/no question to the operator.
pub trait Confirm {
    fn confirm(&self, message: &str) -> Result<bool>;
}

/// A fixed answer, for non-interactive runs.
impl Confirm for bool {
    fn confirm(&self, _message: &str) -> Result<bool> {
        Ok(*self)
    }
}

impl<T: ChainClient> ChainClient for &T {
    fn simulate(&self, request: &TxRequest) -> impl Future<Output = Result<()>> + Send {
        (**self).simulate(request)
    }

    fn deploy(
        &self,
        factory: &ContractFactory,
        args: &[ArgValue],
    ) -> impl Future<Output = Result<PendingDeployment>> + Send {
        (**self).deploy(factory, args)
    }

    fn send_transaction(&self, request: &TxRequest) -> impl Future<Output = Result<B256>> + Send {
        (**self).send_transaction(request)
    }

    fn wait(&self, tx_hash: B256, confirmations: u64) -> impl Future<Output = Result<()>> + Send {
        (**self).wait(tx_hash, confirmations)
    }
}

impl<T: BatchAggregator> BatchAggregator for &T {
    fn aggregate(&self, calls: &[SetupCall]) -> impl Future<Output = Result<B256>> + Send {
        (**self).aggregate(calls)
    }
}
