//! `labstx install-clarinet`: fetch a Clarinet release into `<dir>/bin`.
//!
//! The binary then sits where [`crate::engine::invoker::resolve_binary`]
//! looks first.

use crate::config::ClarinetConfig;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

const RELEASES_BASE: &str = "https://github.com/stx-labs/clarinet/releases/download";

/// What [`install`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed(PathBuf),
    AlreadyPresent(PathBuf),
    Unsupported(&'static str),
}

pub fn release_url(cfg: &ClarinetConfig) -> String {
    format!("{RELEASES_BASE}/{}/{}", cfg.version, cfg.asset)
}

/// Download and unpack the configured release into `install_dir/bin`.
pub async fn install(cfg: &ClarinetConfig, install_dir: &Path, force: bool) -> Result<InstallOutcome> {
    if std::env::consts::OS != "linux" {
        tracing::info!(
            "Skipping Clarinet install on {}; install it manually and put it on PATH",
            std::env::consts::OS
        );
        return Ok(InstallOutcome::Unsupported(std::env::consts::OS));
    }
    install_from(&release_url(cfg), install_dir, force).await
}

async fn install_from(url: &str, install_dir: &Path, force: bool) -> Result<InstallOutcome> {
    let bin_dir = install_dir.join("bin");
    let target = bin_dir.join(crate::engine::TOOL_NAME);

    if target.exists() && !force {
        tracing::info!("Clarinet already installed at {}", target.display());
        return Ok(InstallOutcome::AlreadyPresent(target));
    }

    tokio::fs::create_dir_all(&bin_dir)
        .await
        .with_context(|| format!("Failed to create {}", bin_dir.display()))?;

    tracing::info!("Downloading {url}");
    let resp = reqwest::get(url)
        .await
        .with_context(|| format!("Failed to download {url}"))?;
    anyhow::ensure!(
        resp.status().is_success(),
        "Download of {url} failed with {}",
        resp.status()
    );
    let archive_bytes = resp.bytes().await.context("Failed to read release archive")?;

    let archive = tempfile::Builder::new()
        .prefix("clarinet-")
        .suffix(".tar.gz")
        .tempfile()
        .context("Failed to create temporary archive")?;
    tokio::fs::write(archive.path(), &archive_bytes)
        .await
        .context("Failed to write release archive")?;

    let status = tokio::process::Command::new("tar")
        .arg("-xzf")
        .arg(archive.path())
        .arg("-C")
        .arg(&bin_dir)
        .status()
        .await
        .context("Failed to run tar")?;
    anyhow::ensure!(status.success(), "tar exited with {status}");
    anyhow::ensure!(
        target.exists(),
        "Archive did not contain a `{}` binary",
        crate::engine::TOOL_NAME
    );

    make_executable(&target)?;
    tracing::info!("Clarinet installed at {}", target.display());
    Ok(InstallOutcome::Installed(target))
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .with_context(|| format!("Failed to chmod {}", path.display()))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
