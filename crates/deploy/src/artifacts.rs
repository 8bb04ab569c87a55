//! Loading contract factories from compiler artifacts.

use std::path::{Path, PathBuf};

use alloy_core::primitives::Bytes;
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::ContractFactory;

/// Provides creatable artifacts by name.
pub trait ArtifactSource {
    fn get_contract_factory(&self, name: &str) -> Result<ContractFactory>;
}

/// Artifacts stored as JSON files.
///
/// `<dir>/<name>.json` is used when present. Otherwise the directory is searched recursively for
/// `<name>.sol/<name>.json`, which covers Hardhat (`contracts/**/<name>.sol/`) and Foundry
/// (`out/<name>.sol/`) layouts. A name found in more than one source file is ambiguous.
#[derive(Debug, Clone)]
pub struct JsonArtifacts {
    dir: PathBuf,
}

/// The subset of an artifact file we read.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArtifactFile {
    bytecode: Value,
    #[serde(default)]
    raw_metadata: Option<String>,
    #[serde(default)]
    metadata: Option<Value>,
}

impl JsonArtifacts {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn locate(&self, name: &str) -> Result<PathBuf> {
        let flat = self.dir.join(format!("{name}.json"));
        if flat.is_file() {
            return Ok(flat);
        }

        let mut found = Vec::new();
        Self::search(&self.dir, &format!("{name}.sol"), &format!("{name}.json"), &mut found)?;
        match found.len() {
            0 => anyhow::bail!("Artifact {} not found in {}", name, self.dir.display()),
            1 => Ok(found.remove(0)),
            _ => {
                found.sort();
                let paths = found
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                anyhow::bail!("Artifact {name} is ambiguous: {paths}")
            }
        }
    }

    fn search(dir: &Path, source: &str, file: &str, found: &mut Vec<PathBuf>) -> Result<()> {
        if !dir.is_dir() {
            return Ok(());
        }
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read artifacts directory {}", dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            if path.file_name().is_some_and(|n| n == source) {
                let candidate = path.join(file);
                if candidate.is_file() {
                    found.push(candidate);
                }
            } else {
                Self::search(&path, source, file, found)?;
            }
        }
        Ok(())
    }

    fn read(path: &Path, name: &str) -> Result<ContractFactory> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read artifact {}", path.display()))?;
        let artifact: ArtifactFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse artifact {}", path.display()))?;

        // Hardhat stores the bytecode as a string, Foundry as `{ "object": "0x.." }`.
        let bytecode = match &artifact.bytecode {
            Value::String(s) => s.as_str(),
            Value::Object(obj) => obj
                .get("object")
                .and_then(Value::as_str)
                .context("Artifact bytecode object has no `object` field")?,
            _ => anyhow::bail!("Unsupported bytecode format in {}", path.display()),
        };
        let bytecode = hex::decode(bytecode.trim_start_matches("0x"))
            .with_context(|| format!("Invalid bytecode hex in {}", path.display()))?;
        if bytecode.is_empty() {
            anyhow::bail!("{name} has no creation bytecode (abstract contract or interface?)");
        }

        let metadata = artifact.raw_metadata.or_else(|| match artifact.metadata {
            Some(Value::String(s)) => Some(s),
            Some(other @ Value::Object(_)) => Some(other.to_string()),
            _ => None,
        });

        Ok(ContractFactory {
            name: name.to_string(),
            bytecode: Bytes::from(bytecode),
            metadata,
        })
    }
}

impl ArtifactSource for JsonArtifacts {
    fn get_contract_factory(&self, name: &str) -> Result<ContractFactory> {
        let path = self.locate(name)?;

        tracing::trace!(artifact = name, path = %path.display(), "Loading artifact");
        Self::read(&path, name)
    }
}
