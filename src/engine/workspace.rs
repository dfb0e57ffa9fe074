//! Workspace factory: builds a throwaway Clarinet project on disk.
//!
//! Every tool invocation gets its own directory under the scratch root:
//!
//! ```text
//! clarinet-XXXXXX/
//!   Clarinet.toml
//!   contracts/<name>.clar
//!   settings/Simnet.toml
//!   settings/Devnet.toml
//! ```
//!
//! The returned [`Workspace`] owns the directory and removes it when closed
//! or dropped, so no exit path can leak a project tree.

use super::Contract;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const DIR_PREFIX: &str = "clarinet-";
const MANIFEST_FILE: &str = "Clarinet.toml";
const CONTRACTS_DIR: &str = "contracts";
const SETTINGS_DIR: &str = "settings";
const NETWORK_PROFILES: &[&str] = &["Simnet.toml", "Devnet.toml"];

const MANIFEST_HEADER: &str = "[project]\n\
name = \"temp-project\"\n\
authors = []\n\
description = \"\"\n\
telemetry = false\n\
[repl]\n\
costs_version = 2\n\
purify_stack = true\n\
show_costs = false\n";

/// Funded test accounts. Both network profiles share this content.
const NETWORK_SETTINGS: &str = "[network]\n\
name = \"simnet\"\n\
\n\
[accounts.deployer]\n\
mnemonic = \"twice kind fence tip hidden tilt action fragile skin nothing glory cousin green tomorrow spring wrist shed math olympic multiply hip blue scout claw\"\n\
balance = 100000000000000\n\
\n\
[accounts.wallet_1]\n\
mnemonic = \"sell invite acquire kitten bamboo drastic jelly vivid peace spawn twice guilt pave pen trash pretty park cube fragile unaware remain midnight betray rebuild\"\n\
balance = 100000000000000";

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("failed to create workspace: {context}: {source}")]
    CreationFailed {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("duplicate contract name '{0}'")]
    DuplicateContract(String),

    #[error("invalid contract name '{0}'")]
    InvalidName(String),
}

impl WorkspaceError {
    fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::CreationFailed {
            context: context.into(),
            source,
        }
    }
}

/// An ephemeral Clarinet project directory.
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
    root: PathBuf,
    contract_names: Vec<String>,
}

impl Workspace {
    /// Create a fresh workspace under `scratch_root` seeded with `contracts`.
    ///
    /// Names are validated and checked for duplicates before anything is
    /// written. On any write failure the partially built tree is removed.
    pub fn create(scratch_root: &Path, contracts: &[Contract]) -> Result<Self, WorkspaceError> {
        let mut seen = HashSet::new();
        let mut names = Vec::with_capacity(contracts.len());
        for contract in contracts {
            let name = contract
                .validated_name()
                .map_err(|_| WorkspaceError::InvalidName(contract.name.clone()))?;
            if !seen.insert(name) {
                return Err(WorkspaceError::DuplicateContract(name.to_string()));
            }
            names.push(name.to_string());
        }

        std::fs::create_dir_all(scratch_root)
            .map_err(|e| WorkspaceError::io(format!("scratch root {}", scratch_root.display()), e))?;

        let dir = tempfile::Builder::new()
            .prefix(DIR_PREFIX)
            .tempdir_in(scratch_root)
            .map_err(|e| WorkspaceError::io("project directory", e))?;
        let root = dir.path().to_path_buf();

        // From here on `dir` drops (and deletes) on any early return.
        for sub in [CONTRACTS_DIR, SETTINGS_DIR] {
            std::fs::create_dir(root.join(sub))
                .map_err(|e| WorkspaceError::io(format!("{sub}/ directory"), e))?;
        }

        let mut manifest = String::from(MANIFEST_HEADER);
        for (contract, name) in contracts.iter().zip(&names) {
            let relative = format!("{CONTRACTS_DIR}/{name}.clar");
            std::fs::write(root.join(&relative), &contract.code)
                .map_err(|e| WorkspaceError::io(relative.clone(), e))?;

            let _ = write!(
                manifest,
                "\n[contracts.{name}]\npath = \"{relative}\"\nsummary = \"\"\ndepends_on = []\n"
            );
        }

        std::fs::write(root.join(MANIFEST_FILE), manifest)
            .map_err(|e| WorkspaceError::io(MANIFEST_FILE, e))?;

        for profile in NETWORK_PROFILES {
            std::fs::write(root.join(SETTINGS_DIR).join(profile), NETWORK_SETTINGS)
                .map_err(|e| WorkspaceError::io(format!("{SETTINGS_DIR}/{profile}"), e))?;
        }

        tracing::debug!(
            "Created workspace {} with {} contract(s)",
            root.display(),
            names.len()
        );

        Ok(Self {
            dir: Some(dir),
            root,
            contract_names: names,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Sanitized names of the contracts written into the manifest.
    pub fn contract_names(&self) -> &[String] {
        &self.contract_names
    }

    /// Delete the workspace now. Failures are logged, never returned.
    pub fn close(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if let Some(dir) = self.dir.take() {
            match dir.close() {
                Ok(()) => tracing::debug!("Removed workspace {}", self.root.display()),
                Err(e) => tracing::warn!(
                    "Failed to remove workspace {}: {e}",
                    self.root.display()
                ),
            }
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.remove();
    }
}
