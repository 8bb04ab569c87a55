//! Deployment plan: an ordered list of steps with address dependencies between them.
//!
//! Steps are executed in insertion order. A dependency ties one constructor argument of a step to
//! the address another step will produce. The plan rejects duplicate names, malformed
//! dependencies and dependency cycles as soon as a step is added.

use std::collections::{HashMap, HashSet};

use alloy_core::primitives::Bytes;
use serde::{Deserialize, Serialize};

use crate::{ArgValue, DeployError, DeploymentRegistry, args::encode_params};

/// A creatable artifact: the creation bytecode of a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractFactory {
    /// The artifact (contract) name.
    pub name: String,
    /// Creation bytecode, without constructor arguments.
    pub bytecode: Bytes,
    /// Compiler metadata JSON, if the artifact carries it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
}

impl ContractFactory {
    pub fn new(name: impl Into<String>, bytecode: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytecode: bytecode.into(),
            metadata: None,
        }
    }

    /// Creation code with the ABI-encoded constructor arguments appended.
    pub fn creation_code(&self, args: &[ArgValue]) -> Bytes {
        let mut code = self.bytecode.to_vec();
        code.extend_from_slice(&encode_params(args));
        code.into()
    }
}

/// A constructor argument that will receive the address of another deployment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dependency {
    pub arg_position: usize,
    pub deployment_name: String,
}

/// One deployable unit of a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentStep {
    /// Unique name of the deployment within a run.
    pub name: String,
    /// The artifact to create.
    pub factory: ContractFactory,
    /// Constructor arguments. Dependency positions hold a placeholder address.
    pub args: Vec<ArgValue>,
    /// Arguments to be replaced by the address of another deployment.
    pub depends_on: Vec<Dependency>,
    /// Dry-run the creation before broadcasting it.
    pub run_static_simulation: bool,
}

impl DeploymentStep {
    pub fn new(name: impl Into<String>, factory: ContractFactory) -> Self {
        Self {
            name: name.into(),
            factory,
            args: Vec::new(),
            depends_on: Vec::new(),
            run_static_simulation: false,
        }
    }

    /// Append a constructor argument.
    pub fn arg(mut self, value: impl Into<ArgValue>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Append a constructor argument resolved to the address of `deployment_name`.
    pub fn arg_ref(mut self, deployment_name: impl Into<String>) -> Self {
        self.depends_on.push(Dependency {
            arg_position: self.args.len(),
            deployment_name: deployment_name.into(),
        });
        self.args.push(ArgValue::PLACEHOLDER);
        self
    }

    /// Tie an existing argument to the address of `deployment_name`.
    pub fn depends_on(mut self, arg_position: usize, deployment_name: impl Into<String>) -> Self {
        self.depends_on.push(Dependency {
            arg_position,
            deployment_name: deployment_name.into(),
        });
        self
    }

    pub fn simulate(mut self, run_static_simulation: bool) -> Self {
        self.run_static_simulation = run_static_simulation;
        self
    }

    /// Names of the deployments this step depends on.
    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.depends_on.iter().map(|d| d.deployment_name.as_str())
    }

    fn check_dependencies(&self) -> Result<(), DeployError> {
        let mut seen = HashSet::new();
        for dependency in &self.depends_on {
            let malformed = |reason: &str| DeployError::MalformedDependency {
                step: self.name.clone(),
                arg_position: dependency.arg_position,
                reason: reason.to_string(),
            };

            match self.args.get(dependency.arg_position) {
                None => return Err(malformed("argument position out of range")),
                Some(arg) if !arg.is_address() => {
                    return Err(malformed("argument is not an address"));
                }
                Some(_) => {}
            }
            if dependency.deployment_name.is_empty() {
                return Err(malformed("empty deployment name"));
            }
            if !seen.insert(dependency.arg_position) {
                return Err(malformed("argument already bound to another dependency"));
            }
        }
        Ok(())
    }
}

/// Ordered sequence of deployment steps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentPlan {
    steps: Vec<DeploymentStep>,
}

impl DeploymentPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step, returning the plan for chained appends.
    ///
    /// The plan is left unchanged when the step is rejected.
    pub fn add(&mut self, step: DeploymentStep) -> Result<&mut Self, DeployError> {
        if self.contains(&step.name) {
            return Err(DeployError::DuplicateStepName(step.name));
        }
        step.check_dependencies()?;
        if let Some(cycle) = self.find_cycle_through(&step) {
            return Err(DeployError::DependencyCycle(cycle));
        }

        tracing::trace!(step = %step.name, artifact = %step.factory.name, "Step added to plan");
        self.steps.push(step);
        Ok(self)
    }

    pub fn steps(&self) -> &[DeploymentStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&DeploymentStep> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Dependencies naming a step that is not part of the plan, as `(step, dependency)` pairs.
    pub fn external_dependencies(&self) -> Vec<(&str, &str)> {
        self.steps
            .iter()
            .flat_map(|step| {
                step.dependencies()
                    .filter(|dep| !self.contains(dep))
                    .map(move |dep| (step.name.as_str(), dep))
            })
            .collect()
    }

    /// The sub-plan of steps that have no entry in `registry` yet.
    pub fn pending(&self, registry: &DeploymentRegistry) -> DeploymentPlan {
        DeploymentPlan {
            steps: self
                .steps
                .iter()
                .filter(|s| !registry.contains(&s.name))
                .cloned()
                .collect(),
        }
    }

    /// Look for a path from the new step's dependencies back to the new step.
    ///
    /// The plan is acyclic before the insertion, so any new cycle goes through `step`.
    fn find_cycle_through(&self, step: &DeploymentStep) -> Option<Vec<String>> {
        let graph: HashMap<&str, Vec<&str>> = self
            .steps
            .iter()
            .map(|s| (s.name.as_str(), s.dependencies().collect()))
            .collect();

        let mut visited = HashSet::new();
        let mut path = vec![step.name.as_str()];

        fn visit<'a>(
            node: &'a str,
            target: &str,
            graph: &HashMap<&'a str, Vec<&'a str>>,
            visited: &mut HashSet<&'a str>,
            path: &mut Vec<&'a str>,
        ) -> bool {
            path.push(node);
            if node == target {
                return true;
            }
            if visited.insert(node) {
                for next in graph.get(node).into_iter().flatten() {
                    if visit(*next, target, graph, visited, path) {
                        return true;
                    }
                }
            }
            path.pop();
            false
        }

        for dependency in step.dependencies() {
            if visit(dependency, &step.name, &graph, &mut visited, &mut path) {
                return Some(path.into_iter().map(String::from).collect());
            }
        }
        None
    }
}
