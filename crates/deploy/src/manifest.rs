//! TOML deployment manifest.
//!
//! A manifest lists the steps of a plan and the setup calls to run once everything is deployed:
//!
//! ```toml
//! [[step]]
//! name = "Vault"
//! simulate = true
//! args = [{ ref = "Token" }, { external = "TapOFT" }, "signer", { uint = 1000 }]
//!
//! [[step]]
//! name = "Penrose"
//! args = [{ first_of = [{ external = "TapOFT" }, { external_prefix = "TapOFT" }] }]
//!
//! [[setup]]
//! target = { ref = "Vault" }
//! signature = "setOwner(address)"
//! args = ["signer"]
//!
//! [constants.1]
//! uniV2Factory = { address = "0x5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f" }
//! ```
//!
//! Top-level `ref` arguments of a step become plan dependencies. Externals are resolved once,
//! when the manifest is compiled, so a missing prerequisite stops the run before any transaction.

use std::{
    collections::{BTreeMap, HashMap},
    path::Path,
    str::FromStr,
};

use alloy_core::primitives::{Address, B256, U256};
use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::{
    AddressSource, ArgValue, ArtifactSource, DeployError, DeploymentPlan, DeploymentRegistry,
    DeploymentStep, SetupBuilder, SetupCall,
    args::encode_call,
    registry::NameQuery,
};

/// An unsigned integer written either as a TOML integer or as a (decimal or hex) string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Quantity {
    Number(u64),
    Text(String),
}

/// An argument as written in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestArg {
    Address(String),
    Uint(Quantity),
    Bool(bool),
    String(String),
    Bytes(String),
    Bytes32(String),
    Array(Vec<ManifestArg>),
    /// Address of a step of this run.
    Ref(String),
    /// Address of a deployment of another project, by exact name.
    External(String),
    /// Address of a deployment of another project, by name prefix.
    ExternalPrefix(String),
    /// The first of several `external`/`external_prefix` alternatives that resolves.
    FirstOf(Vec<ManifestArg>),
    /// A per-chain constant.
    Constant(String),
    /// The signing account.
    Signer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSpec {
    pub name: String,
    /// Artifact name, defaults to the step name.
    #[serde(default)]
    pub artifact: Option<String>,
    #[serde(default)]
    pub args: Vec<ManifestArg>,
    #[serde(default)]
    pub simulate: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupSpec {
    pub target: ManifestArg,
    pub signature: String,
    #[serde(default)]
    pub args: Vec<ManifestArg>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, rename = "step")]
    pub steps: Vec<StepSpec>,
    #[serde(default, rename = "setup")]
    pub setup: Vec<SetupSpec>,
    /// Constants keyed by chain id, then by name.
    #[serde(default)]
    pub constants: BTreeMap<String, BTreeMap<String, ManifestArg>>,
}

/// What the manifest needs from the outside to be compiled.
pub struct ManifestEnv<'a> {
    pub signer: Address,
    pub chain_id: u64,
    /// Where external deployments are looked up.
    pub externals: &'a dyn AddressSource,
}

impl Manifest {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        let manifest = Self::from_str(&content)
            .with_context(|| format!("Failed to parse manifest {}", path.display()))?;
        tracing::info!(
            path = %path.display(),
            steps = manifest.steps.len(),
            setup_calls = manifest.setup.len(),
            "Manifest loaded"
        );
        Ok(manifest)
    }

    /// Build the deployment plan and the setup builder.
    pub fn compile(
        &self,
        env: &ManifestEnv<'_>,
        artifacts: &impl ArtifactSource,
    ) -> Result<(DeploymentPlan, ManifestSetup), DeployError> {
        let bindings = self.bindings(env)?;

        let mut plan = DeploymentPlan::new();
        for spec in &self.steps {
            plan.add(bindings.step(spec, artifacts)?)?;
        }

        for (index, spec) in self.setup.iter().enumerate() {
            check_signature(&spec.signature, spec.args.len()).map_err(|reason| {
                DeployError::Manifest(format!("setup #{}: {}", index + 1, reason))
            })?;
        }

        let setup = ManifestSetup {
            calls: self.setup.clone(),
            bindings,
        };
        Ok((plan, setup))
    }

    fn bindings(&self, env: &ManifestEnv<'_>) -> Result<Bindings, DeployError> {
        let constants = self
            .constants
            .get(&env.chain_id.to_string())
            .cloned()
            .unwrap_or_default();

        let mut wanted = Vec::new();
        let all_args = self
            .steps
            .iter()
            .flat_map(|s| s.args.iter())
            .chain(self.setup.iter().flat_map(|s| std::iter::once(&s.target).chain(&s.args)))
            .chain(constants.values());
        for arg in all_args {
            collect_externals(arg, &mut wanted)?;
        }

        let mut externals = HashMap::new();
        for alternatives in wanted {
            let resolved = alternatives
                .iter()
                .find_map(|query| Some((query, env.externals.lookup(query)?)));
            let Some((query, address)) = resolved else {
                return Err(DeployError::UnresolvedDependency {
                    step: "manifest".to_string(),
                    dependency: alternatives
                        .iter()
                        .map(|query| match query {
                            NameQuery::Exact(name) => name.clone(),
                            NameQuery::Prefix(prefix) => format!("{prefix}*"),
                        })
                        .collect::<Vec<_>>()
                        .join(" or "),
                });
            };
            tracing::info!(name = query.as_str(), %address, "External deployment resolved");
            externals.insert(query.clone(), address);
        }

        Ok(Bindings {
            signer: env.signer,
            chain_id: env.chain_id,
            constants,
            externals,
        })
    }
}

impl FromStr for Manifest {
    type Err = toml::de::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        toml::from_str(s)
    }
}

fn external_query(arg: &ManifestArg) -> Option<NameQuery> {
    match arg {
        ManifestArg::External(name) => Some(NameQuery::Exact(name.clone())),
        ManifestArg::ExternalPrefix(prefix) => Some(NameQuery::Prefix(prefix.clone())),
        _ => None,
    }
}

/// Collect the external lookups `arg` needs, each as a list of alternatives tried in order.
fn collect_externals(
    arg: &ManifestArg,
    out: &mut Vec<Vec<NameQuery>>,
) -> Result<(), DeployError> {
    let alternatives = match arg {
        ManifestArg::Array(items) => {
            return items.iter().try_for_each(|item| collect_externals(item, out));
        }
        ManifestArg::FirstOf(items) => {
            let queries = items.iter().map(external_query).collect::<Option<Vec<_>>>();
            match queries {
                Some(queries) if !queries.is_empty() => queries,
                _ => {
                    return Err(DeployError::Manifest(
                        "`first_of` only accepts `external` and `external_prefix` alternatives"
                            .to_string(),
                    ));
                }
            }
        }
        other => match external_query(other) {
            Some(query) => vec![query],
            None => return Ok(()),
        },
    };
    if !out.contains(&alternatives) {
        out.push(alternatives);
    }
    Ok(())
}

/// Check that `signature` looks like `name(type,...)` with `arg_count` parameters.
fn check_signature(signature: &str, arg_count: usize) -> Result<(), String> {
    let signature: String = signature.chars().filter(|c| !c.is_whitespace()).collect();
    let open = signature
        .find('(')
        .ok_or_else(|| format!("invalid signature `{signature}`"))?;
    if open == 0 || !signature.ends_with(')') {
        return Err(format!("invalid signature `{signature}`"));
    }

    let params = &signature[open + 1..signature.len() - 1];
    let mut count = usize::from(!params.is_empty());
    let mut depth = 0i32;
    for c in params.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => count += 1,
            _ => {}
        }
        if depth < 0 {
            return Err(format!("unbalanced parentheses in `{signature}`"));
        }
    }
    if depth != 0 {
        return Err(format!("unbalanced parentheses in `{signature}`"));
    }
    if count != arg_count {
        return Err(format!(
            "`{signature}` takes {count} arguments, {arg_count} given"
        ));
    }
    Ok(())
}

/// Resolved environment shared by steps and setup calls.
#[derive(Debug, Clone)]
struct Bindings {
    signer: Address,
    chain_id: u64,
    constants: BTreeMap<String, ManifestArg>,
    externals: HashMap<NameQuery, Address>,
}

impl Bindings {
    fn step(
        &self,
        spec: &StepSpec,
        artifacts: &impl ArtifactSource,
    ) -> Result<DeploymentStep, DeployError> {
        let artifact = spec.artifact.as_deref().unwrap_or(&spec.name);
        let factory = artifacts
            .get_contract_factory(artifact)
            .map_err(|e| DeployError::Manifest(format!("step {}: {:#}", spec.name, e)))?;

        let mut step = DeploymentStep::new(&spec.name, factory).simulate(spec.simulate);
        for arg in &spec.args {
            step = match arg {
                ManifestArg::Ref(name) => step.arg_ref(name),
                other => step.arg(self.value(other, None, &spec.name, true)?),
            };
        }
        Ok(step)
    }

    /// Resolve a manifest argument. Refs are only resolvable when a registry is given.
    fn value(
        &self,
        arg: &ManifestArg,
        registry: Option<&DeploymentRegistry>,
        context: &str,
        allow_constants: bool,
    ) -> Result<ArgValue, DeployError> {
        let invalid = |what: &str, raw: &str| {
            DeployError::Manifest(format!("{context}: invalid {what} `{raw}`"))
        };

        Ok(match arg {
            ManifestArg::Address(raw) => {
                ArgValue::Address(Address::from_str(raw).map_err(|_| invalid("address", raw))?)
            }
            ManifestArg::Uint(Quantity::Number(n)) => ArgValue::Uint(U256::from(*n)),
            ManifestArg::Uint(Quantity::Text(raw)) => {
                ArgValue::Uint(U256::from_str(raw).map_err(|_| invalid("uint", raw))?)
            }
            ManifestArg::Bool(b) => ArgValue::Bool(*b),
            ManifestArg::String(s) => ArgValue::String(s.clone()),
            ManifestArg::Bytes(raw) => ArgValue::Bytes(
                hex::decode(raw.trim_start_matches("0x"))
                    .map_err(|_| invalid("bytes", raw))?
                    .into(),
            ),
            ManifestArg::Bytes32(raw) => {
                ArgValue::Bytes32(B256::from_str(raw).map_err(|_| invalid("bytes32", raw))?)
            }
            ManifestArg::Array(items) => ArgValue::Array(
                items
                    .iter()
                    .map(|item| self.value(item, registry, context, allow_constants))
                    .collect::<Result<_, _>>()?,
            ),
            ManifestArg::Ref(name) => {
                let registry = registry.ok_or_else(|| {
                    DeployError::Manifest(format!(
                        "{context}: `ref = \"{name}\"` is only allowed as a top-level argument"
                    ))
                })?;
                ArgValue::Address(registry.address_of(name).ok_or_else(|| {
                    DeployError::UnresolvedDependency {
                        step: context.to_string(),
                        dependency: name.clone(),
                    }
                })?)
            }
            ManifestArg::External(name) => self.external(NameQuery::Exact(name.clone()), context)?,
            ManifestArg::ExternalPrefix(prefix) => {
                self.external(NameQuery::Prefix(prefix.clone()), context)?
            }
            ManifestArg::FirstOf(items) => items
                .iter()
                .filter_map(external_query)
                .find_map(|query| self.externals.get(&query))
                .map(|a| ArgValue::Address(*a))
                .ok_or_else(|| {
                    DeployError::Manifest(format!("{context}: no `first_of` alternative resolved"))
                })?,
            ManifestArg::Constant(name) => {
                if !allow_constants {
                    return Err(DeployError::Manifest(format!(
                        "{context}: constant `{name}` refers to another constant"
                    )));
                }
                let value = self.constants.get(name).ok_or_else(|| {
                    DeployError::Manifest(format!(
                        "{context}: no constant `{name}` for chain {}",
                        self.chain_id
                    ))
                })?;
                self.value(value, registry, context, false)?
            }
            ManifestArg::Signer => ArgValue::Address(self.signer),
        })
    }

    fn external(&self, query: NameQuery, context: &str) -> Result<ArgValue, DeployError> {
        self.externals
            .get(&query)
            .map(|a| ArgValue::Address(*a))
            .ok_or_else(|| DeployError::UnresolvedDependency {
                step: context.to_string(),
                dependency: query.as_str().to_string(),
            })
    }
}

/// Setup calls of a manifest, resolved against the registry of a run.
#[derive(Debug, Clone)]
pub struct ManifestSetup {
    calls: Vec<SetupSpec>,
    bindings: Bindings,
}

impl ManifestSetup {
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

impl SetupBuilder for ManifestSetup {
    fn build(&self, registry: &DeploymentRegistry) -> Result<Vec<SetupCall>, DeployError> {
        self.calls
            .iter()
            .enumerate()
            .map(|(index, spec)| {
                let context = format!("setup #{} ({})", index + 1, spec.signature);
                let target = match self.bindings.value(&spec.target, Some(registry), &context, true)? {
                    ArgValue::Address(address) => address,
                    _ => {
                        return Err(DeployError::Manifest(format!(
                            "{context}: target is not an address"
                        )));
                    }
                };
                let args = spec
                    .args
                    .iter()
                    .map(|arg| self.bindings.value(arg, Some(registry), &context, true))
                    .collect::<Result<Vec<_>, _>>()?;

                Ok(SetupCall {
                    target,
                    call_data: encode_call(&spec.signature, &args),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use alloy_core::primitives::address;

    use super::*;
    use crate::{ContractFactory, ResolvedDeployment, args::selector};

    struct FakeArtifacts;

    impl ArtifactSource for FakeArtifacts {
        fn get_contract_factory(&self, name: &str) -> anyhow::Result<ContractFactory> {
            if name == "Missing" {
                anyhow::bail!("Artifact Missing not found");
            }
            Ok(ContractFactory::new(name, name.as_bytes().to_vec()))
        }
    }

    const SIGNER: Address = address!("00000000000000000000000000000000000000aa");

    const MANIFEST: &str = r#"
        [[step]]
        name = "Token"

        [[step]]
        name = "Vault"
        artifact = "VaultV2"
        simulate = true
        args = [
            { ref = "Token" },
            { external = "TapOFT" },
            { external_prefix = "WETHMock" },
            "signer",
            { constant = "factory" },
            { uint = 1000 },
            { uint = "0x10" },
            { array = [{ bool = true }, { bool = false }] },
        ]

        [[setup]]
        target = { ref = "Vault" }
        signature = "setToken(address, address)"
        args = [{ ref = "Token" }, "signer"]

        [constants.31337]
        factory = { address = "0x00000000000000000000000000000000000000ff" }
    "#;

    fn externals() -> DeploymentRegistry {
        DeploymentRegistry::from_entries([
            ResolvedDeployment {
                name: "TapOFT".to_string(),
                address: Address::with_last_byte(0x10),
                tx_hash: B256::ZERO,
                artifact: "TapOFT".to_string(),
                args: vec![],
            },
            ResolvedDeployment {
                name: "WETHMock_3".to_string(),
                address: Address::with_last_byte(0x11),
                tx_hash: B256::ZERO,
                artifact: "WETHMock".to_string(),
                args: vec![],
            },
        ])
        .unwrap()
    }

    #[test]
    fn test_compile_plan() {
        let manifest = Manifest::from_str(MANIFEST).unwrap();
        let externals = externals();
        let env = ManifestEnv {
            signer: SIGNER,
            chain_id: 31337,
            externals: &externals,
        };

        let (plan, setup) = manifest.compile(&env, &FakeArtifacts).unwrap();

        assert_eq!(plan.len(), 2);
        let vault = plan.get("Vault").unwrap();
        assert_eq!(vault.factory.name, "VaultV2");
        assert!(vault.run_static_simulation);
        assert_eq!(vault.depends_on.len(), 1);
        assert_eq!(vault.depends_on[0].arg_position, 0);
        assert_eq!(vault.args[0], ArgValue::PLACEHOLDER);
        assert_eq!(vault.args[1], ArgValue::Address(Address::with_last_byte(0x10)));
        assert_eq!(vault.args[2], ArgValue::Address(Address::with_last_byte(0x11)));
        assert_eq!(vault.args[3], ArgValue::Address(SIGNER));
        assert_eq!(vault.args[4], ArgValue::Address(Address::with_last_byte(0xff)));
        assert_eq!(vault.args[5], ArgValue::Uint(U256::from(1000u64)));
        assert_eq!(vault.args[6], ArgValue::Uint(U256::from(16u64)));
        assert_eq!(
            vault.args[7],
            ArgValue::Array(vec![ArgValue::Bool(true), ArgValue::Bool(false)])
        );
        assert_eq!(setup.len(), 1);
    }

    #[test]
    fn test_setup_resolves_against_registry() {
        let manifest = Manifest::from_str(MANIFEST).unwrap();
        let externals = externals();
        let env = ManifestEnv {
            signer: SIGNER,
            chain_id: 31337,
            externals: &externals,
        };
        let (_, setup) = manifest.compile(&env, &FakeArtifacts).unwrap();

        let mut registry = DeploymentRegistry::new();
        assert!(matches!(
            setup.build(&registry),
            Err(DeployError::UnresolvedDependency { .. })
        ));

        for (name, byte) in [("Token", 1u8), ("Vault", 2u8)] {
            registry
                .insert(ResolvedDeployment {
                    name: name.to_string(),
                    address: Address::with_last_byte(byte),
                    tx_hash: B256::ZERO,
                    artifact: name.to_string(),
                    args: vec![],
                })
                .unwrap();
        }

        let calls = setup.build(&registry).unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].target, Address::with_last_byte(2));
        assert_eq!(&calls[0].call_data[..4], &selector("setToken(address,address)"));
        assert_eq!(calls[0].call_data.len(), 4 + 64);
        assert_eq!(calls[0].call_data[4 + 31], 1);
    }

    #[test]
    fn test_missing_external_fails_compilation() {
        let manifest = Manifest::from_str(MANIFEST).unwrap();
        let empty = DeploymentRegistry::new();
        let env = ManifestEnv {
            signer: SIGNER,
            chain_id: 31337,
            externals: &empty,
        };

        let err = manifest.compile(&env, &FakeArtifacts).unwrap_err();
        assert!(matches!(
            err,
            DeployError::UnresolvedDependency { dependency, .. } if dependency == "TapOFT"
        ));
    }

    #[test]
    fn test_first_of_falls_back_to_later_alternatives() {
        let manifest = Manifest::from_str(
            r#"
            [[step]]
            name = "Penrose"
            args = [
                { first_of = [{ external = "TapOFT" }, { external_prefix = "TapOFT" }] },
                { first_of = [{ external = "WETHMock" }, { external_prefix = "WETHMock" }] },
            ]
            "#,
        )
        .unwrap();
        let externals = externals();
        let env = ManifestEnv {
            signer: SIGNER,
            chain_id: 1,
            externals: &externals,
        };

        let (plan, _) = manifest.compile(&env, &FakeArtifacts).unwrap();
        let penrose = plan.get("Penrose").unwrap();
        // exact hit
        assert_eq!(penrose.args[0], ArgValue::Address(Address::with_last_byte(0x10)));
        // no exact `WETHMock`, the prefix matches `WETHMock_3`
        assert_eq!(penrose.args[1], ArgValue::Address(Address::with_last_byte(0x11)));

        let empty = DeploymentRegistry::new();
        let env = ManifestEnv {
            signer: SIGNER,
            chain_id: 1,
            externals: &empty,
        };
        let err = manifest.compile(&env, &FakeArtifacts).unwrap_err();
        assert!(matches!(
            err,
            DeployError::UnresolvedDependency { dependency, .. } if dependency == "TapOFT or TapOFT*"
        ));
    }

    #[test]
    fn test_first_of_accepts_only_externals() {
        let manifest = Manifest::from_str(
            r#"
            [[step]]
            name = "Penrose"
            args = [{ first_of = [{ external = "TapOFT" }, "signer"] }]
            "#,
        )
        .unwrap();
        let externals = externals();
        let env = ManifestEnv {
            signer: SIGNER,
            chain_id: 1,
            externals: &externals,
        };

        let err = manifest.compile(&env, &FakeArtifacts).unwrap_err();
        assert!(matches!(err, DeployError::Manifest(msg) if msg.contains("first_of")));
    }

    #[test]
    fn test_missing_constant_for_chain() {
        let manifest = Manifest::from_str(MANIFEST).unwrap();
        let externals = externals();
        let env = ManifestEnv {
            signer: SIGNER,
            chain_id: 1,
            externals: &externals,
        };

        let err = manifest.compile(&env, &FakeArtifacts).unwrap_err();
        assert!(matches!(err, DeployError::Manifest(msg) if msg.contains("factory")));
    }

    #[test]
    fn test_nested_ref_in_step_is_rejected() {
        let manifest = Manifest::from_str(
            r#"
            [[step]]
            name = "Registry"
            args = [{ array = [{ ref = "Token" }] }]
            "#,
        )
        .unwrap();
        let empty = DeploymentRegistry::new();
        let env = ManifestEnv {
            signer: SIGNER,
            chain_id: 1,
            externals: &empty,
        };

        let err = manifest.compile(&env, &FakeArtifacts).unwrap_err();
        assert!(matches!(err, DeployError::Manifest(_)));
    }

    #[test]
    fn test_missing_artifact_is_a_manifest_error() {
        let manifest = Manifest::from_str("[[step]]\nname = \"Missing\"\n").unwrap();
        let empty = DeploymentRegistry::new();
        let env = ManifestEnv {
            signer: SIGNER,
            chain_id: 1,
            externals: &empty,
        };

        let err = manifest.compile(&env, &FakeArtifacts).unwrap_err();
        assert!(err.is_plan_error());
    }

    #[test]
    fn test_check_signature() {
        assert!(check_signature("setOwner(address)", 1).is_ok());
        assert!(check_signature("init()", 0).is_ok());
        assert!(check_signature("f((address,uint256)[],bool)", 2).is_ok());
        assert!(check_signature("setOwner(address)", 2).is_err());
        assert!(check_signature("setOwner", 0).is_err());
        assert!(check_signature("(address)", 1).is_err());
        assert!(check_signature("f((address)", 1).is_err());
    }
}
