//! stackvm is a CLI tool to deploy a contract suite, record its addresses and configure it.

mod cli;
mod prompt;

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::{Table, presets::UTF8_FULL};
use figment::providers::Serialized;

use cli::{Cli, Command, OutputFormat};
use prompt::StdinPrompt;
use stackvm_deploy::{
    DeployConfig, DeployOptions, Deployer, DeploymentSummary, ResolvedDeployment, RpcChain,
    SetupOutcome,
};

fn deployments_table<'a>(deployments: impl IntoIterator<Item = &'a ResolvedDeployment>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Name", "Address", "Artifact", "Tx hash"]);
    for d in deployments {
        table.add_row(vec![
            d.name.clone(),
            d.address.to_string(),
            d.artifact.clone(),
            d.tx_hash.to_string(),
        ]);
    }
    table
}

fn report(summary: &DeploymentSummary) {
    if summary.deployed.is_empty() {
        println!("Nothing to deploy, {} step(s) already recorded", summary.reused.len());
    } else {
        println!("{}", deployments_table(&summary.deployed));
    }

    if let Some(verification) = &summary.verification {
        if verification.is_complete() {
            println!("{} contract(s) verified", verification.verified.len());
        }
        for (name, reason) in &verification.failed {
            println!("Verification of {name} failed: {reason}");
        }
    }

    match &summary.setup {
        SetupOutcome::Empty => {}
        SetupOutcome::Batched { tx_hash } => println!("Setup executed in one batch: {tx_hash}"),
        SetupOutcome::Sequential { tx_hashes, .. } => {
            println!("Setup executed in {} separate transactions", tx_hashes.len())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let config: DeployConfig = DeployConfig::figment(cli.config.as_deref())?
        .merge(Serialized::defaults(&cli.overrides))
        .extract()
        .context("Failed to load configuration")?;

    tracing::debug!(
        project = %config.project,
        tag = %config.tag,
        rpc_url = %config.rpc_url,
        manifest = %config.manifest.display(),
        "Configuration loaded"
    );

    let deployer = Deployer::new(config);

    match cli.command {
        Command::Deploy {
            redeploy,
            verify,
            no_verify,
            yes,
        } => {
            let options = DeployOptions {
                redeploy,
                verify: Command::verify_choice(verify, no_verify),
            };
            let summary = deployer.deploy(options, &StdinPrompt::new(yes)).await?;
            report(&summary);
        }
        Command::List { format } => {
            let chain_id = match deployer.config.chain_id {
                Some(chain_id) => chain_id,
                None => RpcChain::new(&deployer.config.rpc_url, Address::ZERO)?
                    .chain_id()
                    .await
                    .context("Failed to query the chain id, set it with --chain-id")?,
            };
            let registry = deployer.list(chain_id)?;

            match format {
                OutputFormat::Table => println!("{}", deployments_table(registry.iter())),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&registry)?),
            }
        }
    }

    Ok(())
}
