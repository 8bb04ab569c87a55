//! In-memory chain and aggregator recording every interaction.

#![allow(dead_code)]

use std::{
    collections::HashSet,
    sync::{
        Mutex,
        atomic::{AtomicU8, Ordering},
    },
};

use alloy_core::primitives::{Address, B256, U256};
use stackvm_deploy::{
    ArgValue, BatchAggregator, ChainClient, Confirm, ContractFactory, PendingDeployment,
    ResolvedDeployment, SetupCall, TxRequest, Verifier,
};

pub const SIGNER: Address = Address::with_last_byte(0xaa);
pub const CHAIN_ID: u64 = 31337;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Simulate(Vec<u8>),
    Deploy { name: String, args: Vec<ArgValue> },
    Send(Address),
    Wait { tx_hash: B256, confirmations: u64 },
}

/// A chain where every transaction is mined instantly.
///
/// Deployed addresses and transaction hashes are numbered from 1.
#[derive(Default)]
pub struct MockChain {
    pub events: Mutex<Vec<Event>>,
    counter: AtomicU8,
    failing_simulations: HashSet<String>,
    failing_deployments: HashSet<String>,
    failing_targets: HashSet<Address>,
    reverted: HashSet<B256>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Revert the static simulation of the artifact `name`.
    pub fn fail_simulation(mut self, name: &str) -> Self {
        self.failing_simulations.insert(name.to_string());
        self
    }

    /// Reject the creation of the artifact `name`.
    pub fn fail_deployment(mut self, name: &str) -> Self {
        self.failing_deployments.insert(name.to_string());
        self
    }

    /// Reject every call sent to `target`.
    pub fn fail_calls_to(mut self, target: Address) -> Self {
        self.failing_targets.insert(target);
        self
    }

    /// Mine `tx_hash` as reverted: `wait` fails for it.
    pub fn revert_on_wait(mut self, tx_hash: B256) -> Self {
        self.reverted.insert(tx_hash);
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn deployed_names(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Deploy { name, .. } => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn sent_targets(&self) -> Vec<Address> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Send(target) => Some(target),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    fn next(&self) -> u8 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl ChainClient for MockChain {
    async fn simulate(&self, request: &TxRequest) -> anyhow::Result<()> {
        self.record(Event::Simulate(request.data.to_vec()));
        if self
            .failing_simulations
            .iter()
            .any(|name| request.data.starts_with(name.as_bytes()))
        {
            anyhow::bail!("execution reverted");
        }
        Ok(())
    }

    async fn deploy(
        &self,
        factory: &ContractFactory,
        args: &[ArgValue],
    ) -> anyhow::Result<PendingDeployment> {
        self.record(Event::Deploy {
            name: factory.name.clone(),
            args: args.to_vec(),
        });
        if self.failing_deployments.contains(&factory.name) {
            anyhow::bail!("insufficient funds");
        }
        let n = self.next();
        Ok(PendingDeployment {
            address: Address::with_last_byte(n),
            tx_hash: B256::with_last_byte(n),
        })
    }

    async fn send_transaction(&self, request: &TxRequest) -> anyhow::Result<B256> {
        let target = request.to.unwrap_or_default();
        self.record(Event::Send(target));
        if self.failing_targets.contains(&target) {
            anyhow::bail!("execution reverted: Ownable: caller is not the owner");
        }
        Ok(B256::with_last_byte(self.next()))
    }

    async fn wait(&self, tx_hash: B256, confirmations: u64) -> anyhow::Result<()> {
        self.record(Event::Wait {
            tx_hash,
            confirmations,
        });
        if self.reverted.contains(&tx_hash) {
            anyhow::bail!("transaction {tx_hash} reverted");
        }
        Ok(())
    }
}

/// An aggregator that records batch sizes and fails on demand.
#[derive(Default)]
pub struct MockAggregator {
    pub batches: Mutex<Vec<Vec<SetupCall>>>,
    fail: bool,
}

impl MockAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn batches(&self) -> Vec<Vec<SetupCall>> {
        self.batches.lock().unwrap().clone()
    }
}

impl BatchAggregator for MockAggregator {
    async fn aggregate(&self, calls: &[SetupCall]) -> anyhow::Result<B256> {
        self.batches.lock().unwrap().push(calls.to_vec());
        if self.fail {
            anyhow::bail!("Multicall3: call failed");
        }
        Ok(B256::repeat_byte(0xbb))
    }
}

/// A verifier that accepts everything and records what it was asked to verify.
#[derive(Default)]
pub struct MockVerifier {
    pub verified: Mutex<Vec<String>>,
}

impl MockVerifier {
    pub fn verified(&self) -> Vec<String> {
        self.verified.lock().unwrap().clone()
    }
}

impl Verifier for &MockVerifier {
    async fn verify(&self, deployment: &ResolvedDeployment) -> anyhow::Result<()> {
        self.verified.lock().unwrap().push(deployment.name.clone());
        Ok(())
    }
}

/// A prompt whose input is gone.
pub struct ClosedPrompt;

impl Confirm for ClosedPrompt {
    fn confirm(&self, _message: &str) -> anyhow::Result<bool> {
        anyhow::bail!("stdin is closed")
    }
}

/// A factory whose bytecode is its name.
pub fn factory(name: &str) -> ContractFactory {
    ContractFactory::new(name, name.as_bytes().to_vec())
}

pub fn uint(value: u64) -> ArgValue {
    ArgValue::Uint(U256::from(value))
}

/// Initialize tracing for tests (idempotent).
pub fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init()
        .ok();
}
