//! Thin `git` wrappers for the IDE's source-control panel.
//!
//! Commands run through the same [`ToolRunner`] as the Clarinet CLI, with
//! arguments passed as argv (no shell). Paths are placed after `--` so a
//! file named like an option cannot change the command.

use crate::engine::{Invocation, ToolRunner};
use anyhow::Result;
use regex::Regex;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

const GIT: &str = "git";
const LOG_LIMIT: &str = "20";
const LOG_FORMAT: &str = "--pretty=format:%H|%an|%at|%s|%D";
const DEFAULT_BRANCH: &str = "main";

static ARROW_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-> ([\w/-]+)").expect("valid ref regex"));
static BASE_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"base/([\w/-]+)").expect("valid ref regex"));

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSummary {
    pub branch: String,
    pub modified_files: Vec<String>,
    pub staged_files: Vec<String>,
    pub untracked_files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitEntry {
    pub id: String,
    pub hash: String,
    pub author: String,
    /// Milliseconds since the epoch.
    pub date: i64,
    pub message: String,
    pub branch: String,
}

pub struct GitRepo {
    runner: Arc<dyn ToolRunner>,
    root: PathBuf,
}

impl GitRepo {
    pub fn new(runner: Arc<dyn ToolRunner>, root: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            root: root.into(),
        }
    }

    /// Run git and return stdout; a nonzero exit becomes an error carrying
    /// git's own message.
    async fn git(&self, args: &[&str]) -> Result<String> {
        let invocation = Invocation::new(GIT, args.iter().copied());
        let out = self.runner.run(&invocation, &self.root).await?;
        if !out.exit_succeeded() {
            let message = if out.stderr.trim().is_empty() {
                out.stdout.trim().to_string()
            } else {
                out.stderr.trim().to_string()
            };
            anyhow::bail!("`{}` failed: {message}", invocation.display());
        }
        Ok(out.stdout)
    }

    pub async fn status(&self) -> Result<StatusSummary> {
        let porcelain = self.git(&["status", "--porcelain"]).await?;
        let branch = self.git(&["branch", "--show-current"]).await?;
        let mut summary = parse_status(&porcelain);
        summary.branch = branch.trim().to_string();
        Ok(summary)
    }

    pub async fn stage(&self, file: &str) -> Result<()> {
        self.git(&["add", "--", file]).await.map(drop)
    }

    pub async fn unstage(&self, file: &str) -> Result<()> {
        self.git(&["restore", "--staged", "--", file]).await.map(drop)
    }

    pub async fn discard(&self, file: &str) -> Result<()> {
        self.git(&["restore", "--", file]).await.map(drop)
    }

    pub async fn commit(&self, message: &str) -> Result<()> {
        anyhow::ensure!(!message.trim().is_empty(), "commit message cannot be empty");
        self.git(&["commit", "-m", message]).await.map(drop)
    }

    pub async fn log(&self) -> Result<Vec<CommitEntry>> {
        let out = self.git(&["log", "-n", LOG_LIMIT, LOG_FORMAT, "--all"]).await?;
        Ok(out.lines().filter_map(parse_log_line).collect())
    }

    pub async fn branches(&self) -> Result<Vec<String>> {
        let out = self.git(&["branch", "--format=%(refname:short)"]).await?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    pub async fn checkout(&self, branch: &str, create: bool) -> Result<()> {
        anyhow::ensure!(
            !branch.is_empty() && !branch.starts_with('-'),
            "invalid branch name '{branch}'"
        );
        if create {
            self.git(&["checkout", "-b", branch]).await.map(drop)
        } else {
            self.git(&["checkout", branch]).await.map(drop)
        }
    }
}

/// Sort `git status --porcelain` lines into staged / modified / untracked.
///
/// Untracked files also count as modified, matching what the panel shows.
pub fn parse_status(porcelain: &str) -> StatusSummary {
    let mut summary = StatusSummary::default();
    for line in porcelain.lines().filter(|l| l.len() > 3) {
        let mut codes = line.chars();
        let (index, worktree) = match (codes.next(), codes.next()) {
            (Some(i), Some(w)) => (i, w),
            _ => continue,
        };
        let file = line.get(3..).unwrap_or_default().trim().to_string();

        if index != ' ' && index != '?' {
            summary.staged_files.push(file.clone());
        }
        if worktree == 'M' || worktree == 'D' {
            summary.modified_files.push(file.clone());
        }
        if index == '?' && worktree == '?' {
            summary.untracked_files.push(file.clone());
            summary.modified_files.push(file);
        }
    }
    summary
}

/// Parse one `%H|%an|%at|%s|%D` line. The subject may itself contain `|`.
pub fn parse_log_line(line: &str) -> Option<CommitEntry> {
    let mut parts = line.splitn(4, '|');
    let hash = parts.next()?.trim();
    let author = parts.next()?;
    let date = parts.next()?;
    let (message, refs) = parts.next()?.rsplit_once('|')?;
    if hash.is_empty() {
        return None;
    }

    Some(CommitEntry {
        id: hash.to_string(),
        hash: hash.chars().take(7).collect(),
        author: author.to_string(),
        date: date.trim().parse::<i64>().unwrap_or(0) * 1000,
        message: message.to_string(),
        branch: branch_from_refs(refs),
    })
}

fn branch_from_refs(refs: &str) -> String {
    if refs.is_empty() {
        return DEFAULT_BRANCH.to_string();
    }
    if let Some(caps) = ARROW_REF.captures(refs).or_else(|| BASE_REF.captures(refs)) {
        return caps[1].to_string();
    }
    if refs.contains("HEAD") {
        let first = refs.split(", ").next().unwrap_or_default();
        let branch = first.replace("HEAD -> ", "").trim().to_string();
        if !branch.is_empty() {
            return branch;
        }
    }
    DEFAULT_BRANCH.to_string()
}
