//! Chain access shared by the executor and the setup phase.

use alloy_core::primitives::Address;

/// Default number of confirmations awaited for every transaction.
pub const DEFAULT_CONFIRMATIONS: u64 = 1;

/// Explicitly injected chain context.
pub struct DeployContext<C, A> {
    /// Chain client used for simulation, deployment and single calls.
    pub chain: C,
    /// Atomic multi-call primitive used by the setup phase.
    pub aggregator: A,
    /// The account that signs every transaction.
    pub signer: Address,
    pub chain_id: u64,
    /// Confirmations awaited for each transaction.
    pub confirmations: u64,
}

impl<C, A> DeployContext<C, A> {
    pub fn new(chain: C, aggregator: A, signer: Address, chain_id: u64) -> Self {
        Self {
            chain,
            aggregator,
            signer,
            chain_id,
            confirmations: DEFAULT_CONFIRMATIONS,
        }
    }

    pub fn with_confirmations(mut self, confirmations: u64) -> Self {
        self.confirmations = confirmations.max(1);
        self
    }
}
