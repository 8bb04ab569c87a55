//! Full deployment runs driven from a manifest on disk, against an in-memory chain.

mod common;

use common::{
    CHAIN_ID, ClosedPrompt, MockAggregator, MockChain, MockVerifier, SIGNER, init_test_tracing,
};
use stackvm_deploy::{
    ArgValue, DeployConfig, DeployContext, DeployError, DeployOptions, Deployer,
    DeploymentSummary, JsonArtifacts, SetupOutcome,
};
use tempdir::TempDir;

const TOKEN_VAULT: &str = r#"
[[step]]
name = "Token"
args = [{ uint = 1000 }]

[[step]]
name = "Vault"
args = [{ ref = "Token" }, "signer"]

[[setup]]
target = { ref = "Token" }
signature = "setMinter(address)"
args = [{ ref = "Vault" }]
"#;

fn workspace(manifest: &str) -> (TempDir, Deployer) {
    let dir = TempDir::new("stackvm-deployer").unwrap();
    for (name, code) in [("Token", "0x6001"), ("Vault", "0x6002")] {
        std::fs::write(
            dir.path().join(format!("{name}.json")),
            format!(r#"{{ "bytecode": "{code}" }}"#),
        )
        .unwrap();
    }
    std::fs::write(dir.path().join("deploy.toml"), manifest).unwrap();

    let config = DeployConfig {
        project: "tapioca".to_string(),
        tag: "local".to_string(),
        manifest: dir.path().join("deploy.toml"),
        artifacts_dir: dir.path().to_path_buf(),
        address_book_dir: dir.path().join("deployments"),
        ..Default::default()
    };
    (dir, Deployer::new(config))
}

async fn run_on(
    deployer: &Deployer,
    chain: &MockChain,
    options: DeployOptions,
    verifier: Option<anyhow::Result<&MockVerifier>>,
) -> anyhow::Result<DeploymentSummary> {
    let aggregator = MockAggregator::new();
    let ctx = DeployContext::new(chain, &aggregator, SIGNER, CHAIN_ID);
    let artifacts = JsonArtifacts::new(&deployer.config.artifacts_dir);
    deployer
        .run(&ctx, &artifacts, verifier, options, &true)
        .await
}

#[tokio::test]
async fn test_run_deploys_records_and_sets_up() {
    init_test_tracing();
    let (dir, deployer) = workspace(TOKEN_VAULT);
    let chain = MockChain::new();

    let summary = run_on(&deployer, &chain, DeployOptions::default(), None)
        .await
        .unwrap();

    let names = summary.deployed.iter().map(|d| d.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["Token", "Vault"]);
    assert!(summary.reused.is_empty());
    assert!(matches!(summary.setup, SetupOutcome::Batched { .. }));
    assert!(summary.verification.is_none());

    let saved = deployer.list(CHAIN_ID).unwrap();
    assert_eq!(saved, summary.registry);
    assert!(deployer.version_path(CHAIN_ID).exists());
    assert!(dir.path().join("deployments/tapioca/local").is_dir());
}

#[tokio::test]
async fn test_second_run_reuses_recorded_steps() {
    let (_dir, deployer) = workspace(TOKEN_VAULT);
    run_on(&deployer, &MockChain::new(), DeployOptions::default(), None)
        .await
        .unwrap();

    let chain = MockChain::new();
    let summary = run_on(&deployer, &chain, DeployOptions::default(), None)
        .await
        .unwrap();

    assert!(summary.deployed.is_empty());
    assert_eq!(summary.reused, vec!["Token", "Vault"]);
    assert!(chain.deployed_names().is_empty());
    assert_eq!(summary.registry.len(), 2);
}

#[tokio::test]
async fn test_redeploy_ignores_the_address_book() {
    let (_dir, deployer) = workspace(TOKEN_VAULT);
    run_on(&deployer, &MockChain::new(), DeployOptions::default(), None)
        .await
        .unwrap();

    let chain = MockChain::new();
    let options = DeployOptions {
        redeploy: true,
        ..Default::default()
    };
    let summary = run_on(&deployer, &chain, options, None).await.unwrap();

    assert_eq!(chain.deployed_names(), vec!["Token", "Vault"]);
    assert_eq!(summary.deployed.len(), 2);
    assert!(summary.reused.is_empty());
}

#[tokio::test]
async fn test_failed_step_saves_progress_and_resumes() {
    init_test_tracing();
    let (_dir, deployer) = workspace(TOKEN_VAULT);

    let chain = MockChain::new().fail_deployment("Vault");
    let err = run_on(&deployer, &chain, DeployOptions::default(), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<DeployError>(),
        Some(DeployError::DeploymentFailed { step_name, .. }) if step_name == "Vault"
    ));

    let saved = deployer.list(CHAIN_ID).unwrap();
    assert_eq!(saved.len(), 1);
    let token = saved.address_of("Token").unwrap();

    let chain = MockChain::new();
    let summary = run_on(&deployer, &chain, DeployOptions::default(), None)
        .await
        .unwrap();

    assert_eq!(chain.deployed_names(), vec!["Vault"]);
    assert_eq!(summary.reused, vec!["Token"]);
    assert_eq!(
        summary.registry.get("Vault").unwrap().args[0],
        ArgValue::Address(token)
    );
}

#[tokio::test]
async fn test_misspelled_reference_sends_nothing() {
    let (_dir, deployer) = workspace(
        r#"
        [[step]]
        name = "Token"

        [[step]]
        name = "Vault"
        args = [{ ref = "Tokn" }]
        "#,
    );
    let chain = MockChain::new();

    let err = run_on(&deployer, &chain, DeployOptions::default(), None)
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<DeployError>(),
        Some(DeployError::UnresolvedDependency { step, dependency })
            if step == "Vault" && dependency == "Tokn"
    ));
    assert!(chain.events().is_empty());
    assert!(deployer.list(CHAIN_ID).unwrap().is_empty());
}

#[tokio::test]
async fn test_closed_prompt_skips_verification() {
    let (_dir, deployer) = workspace(TOKEN_VAULT);
    let verifier = MockVerifier::default();
    let aggregator = MockAggregator::new();
    let chain = MockChain::new();
    let ctx = DeployContext::new(&chain, &aggregator, SIGNER, CHAIN_ID);
    let artifacts = JsonArtifacts::new(&deployer.config.artifacts_dir);

    let summary = deployer
        .run(
            &ctx,
            &artifacts,
            Some(Ok(&verifier)),
            DeployOptions::default(),
            &ClosedPrompt,
        )
        .await
        .unwrap();

    assert!(summary.verification.is_none());
    assert!(verifier.verified().is_empty());
    assert!(matches!(summary.setup, SetupOutcome::Batched { .. }));
}

#[tokio::test]
async fn test_only_new_deployments_are_verified() {
    let (dir, deployer) = workspace(
        r#"
        [[step]]
        name = "Token"
        "#,
    );
    run_on(&deployer, &MockChain::new(), DeployOptions::default(), None)
        .await
        .unwrap();

    std::fs::write(dir.path().join("deploy.toml"), TOKEN_VAULT).unwrap();
    let verifier = MockVerifier::default();
    let options = DeployOptions {
        verify: Some(true),
        ..Default::default()
    };
    let summary = run_on(&deployer, &MockChain::new(), options, Some(Ok(&verifier)))
        .await
        .unwrap();

    assert_eq!(verifier.verified(), vec!["Vault"]);
    let report = summary.verification.unwrap();
    assert!(report.is_complete());
    assert_eq!(report.verified, vec!["Vault"]);
}

#[tokio::test]
async fn test_unavailable_verifier_does_not_stop_the_setup() {
    let (_dir, deployer) = workspace(TOKEN_VAULT);
    let options = DeployOptions {
        verify: Some(true),
        ..Default::default()
    };

    let summary = run_on(
        &deployer,
        &MockChain::new(),
        options,
        Some(Err(anyhow::anyhow!("no TLS backend"))),
    )
    .await
    .unwrap();

    let report = summary.verification.unwrap();
    assert!(!report.is_complete());
    assert_eq!(report.failed.len(), 2);
    assert!(report.failed[0].1.contains("no TLS backend"));
    assert!(matches!(summary.setup, SetupOutcome::Batched { .. }));
    assert_eq!(deployer.list(CHAIN_ID).unwrap().len(), 2);
}
