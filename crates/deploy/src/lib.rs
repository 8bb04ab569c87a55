//! stackvm-deploy - Deployment library for EVM contract suites.
//!
//! This crate builds ordered deployment plans whose steps may reference each other's addresses,
//! executes them against a chain, persists the resulting addresses, and runs post-deployment
//! setup calls as one atomic batch (falling back to one call at a time).

pub mod args;
pub use args::ArgValue;

mod error;
pub use error::DeployError;

mod plan;
pub use plan::{ContractFactory, Dependency, DeploymentPlan, DeploymentStep};

pub mod registry;
pub use registry::{AddressSource, DeploymentRegistry, LookupChain, NameQuery, ResolvedDeployment};

mod chain;
pub use chain::{BatchAggregator, ChainClient, Confirm, PendingDeployment, TxRequest, Verifier};

mod context;
pub use context::{DEFAULT_CONFIRMATIONS, DeployContext};

mod executor;
pub use executor::DeploymentExecutor;

mod setup;
pub use setup::{SetupBatch, SetupBuilder, SetupCall, SetupOutcome, execute_setup};

mod address_book;
pub use address_book::{AddressBook, JsonAddressBook};

mod artifacts;
pub use artifacts::{ArtifactSource, JsonArtifacts};

mod manifest;
pub use manifest::{Manifest, ManifestArg, ManifestEnv, ManifestSetup, Quantity, SetupSpec, StepSpec};

mod fingerprint;
pub use fingerprint::{DeploymentVersion, PlanFingerprint};

mod config;
pub use config::{CONFIG_FILENAME, DeployConfig, ENV_PREFIX, MANIFEST_FILENAME};

pub mod rpc;
pub use rpc::RpcChain;

mod multicall;
pub use multicall::{MULTICALL3_ADDRESS, Multicall3, encode_aggregate3};

mod verify;
pub use verify::{SOURCIFY_DEFAULT_URL, SourcifyVerifier, VerificationReport, verify_deployments};

mod deployer;
pub use deployer::{DeployOptions, Deployer, DeploymentSummary};
