//! GitHub connector: OAuth token exchange, auth cookie codec, and the REST
//! calls the IDE proxies (user, repos, clone, gist).
//!
//! The access token never lives server-side. It round-trips in the
//! `github_auth` cookie as base64-encoded JSON `{token, user}`.

use anyhow::{Context, Result};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

pub const AUTH_COOKIE: &str = "github_auth";
pub const OAUTH_SCOPE: &str = "read:user user:email repo gist";
/// Cookie lifetime: seven days.
pub const COOKIE_MAX_AGE_SECS: u64 = 7 * 24 * 60 * 60;

const USER_AGENT: &str = "LabSTX-IDE/0.1";
const ACCEPT: &str = "application/vnd.github.v3+json";
const DEFAULT_GIST_DESCRIPTION: &str = "Created with LabSTX IDE";

/// Clone limits.
const MAX_CLONE_FILES: usize = 50;
const MAX_CLONE_FILE_BYTES: u64 = 500_000;
const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "ico", "pdf", "zip", "tar", "gz", "woff", "woff2", "ttf", "eot",
];

// ── Auth cookie ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GithubUser {
    pub login: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub id: u64,
}

/// Contents of the `github_auth` cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthCookie {
    pub token: String,
    pub user: GithubUser,
}

impl AuthCookie {
    pub fn encode(&self) -> Result<String> {
        let raw = serde_json::to_vec(self).context("Failed to serialize auth cookie")?;
        Ok(base64::engine::general_purpose::STANDARD.encode(raw))
    }

    /// `None` for anything that is not a well-formed cookie value.
    pub fn decode(value: &str) -> Option<Self> {
        let raw = base64::engine::general_purpose::STANDARD
            .decode(value.trim())
            .ok()?;
        serde_json::from_slice(&raw).ok()
    }
}

/// `Set-Cookie` value carrying `cookie`.
pub fn set_cookie_header(encoded: &str) -> String {
    format!("{AUTH_COOKIE}={encoded}; Path=/; HttpOnly; SameSite=Lax; Max-Age={COOKIE_MAX_AGE_SECS}")
}

/// `Set-Cookie` value that clears the auth cookie.
pub fn clear_cookie_header() -> String {
    format!("{AUTH_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

/// Find `name` in a raw `Cookie:` header.
pub fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then_some(value)
    })
}

// ── API client ────────────────────────────────────────────────────────────────

/// Repository summary returned to the IDE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSummary {
    pub id: u64,
    pub name: String,
    pub full_name: String,
    pub description: Option<String>,
    pub html_url: String,
    pub clone_url: String,
    pub private: bool,
    pub language: Option<String>,
}

/// Files fetched from a repository tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClonedRepo {
    pub branch: String,
    pub files: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    tree: Vec<TreeItem>,
}

#[derive(Debug, Deserialize)]
struct TreeItem {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    size: Option<u64>,
    url: String,
}

#[derive(Debug, Deserialize)]
struct BlobResponse {
    content: String,
}

#[derive(Debug, Clone)]
pub struct GithubClient {
    http: reqwest::Client,
    api_base: String,
    oauth_base: String,
}

impl GithubClient {
    pub fn new(api_base: impl Into<String>, oauth_base: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            oauth_base: oauth_base.into().trim_end_matches('/').to_string(),
        })
    }

    /// URL of GitHub's authorization page.
    pub fn authorize_url(&self, client_id: &str, redirect_uri: &str) -> String {
        format!(
            "{base}/login/oauth/authorize?client_id={client_id}&redirect_uri={redirect}&scope={scope}",
            base = self.oauth_base,
            client_id = urlencoding::encode(client_id),
            redirect = urlencoding::encode(redirect_uri),
            scope = urlencoding::encode(OAUTH_SCOPE),
        )
    }

    /// Exchange an OAuth `code` for an access token.
    pub async fn exchange_code(
        &self,
        client_id: &str,
        client_secret: &str,
        code: &str,
    ) -> Result<String> {
        let resp = self
            .http
            .post(format!("{}/login/oauth/access_token", self.oauth_base))
            .header("Accept", "application/json")
            .json(&json!({
                "client_id": client_id,
                "client_secret": client_secret,
                "code": code,
            }))
            .send()
            .await
            .context("Failed to exchange code with GitHub")?;

        let data: serde_json::Value = resp
            .json()
            .await
            .context("Failed to parse GitHub token response")?;

        if let Some(err) = data["error"].as_str() {
            anyhow::bail!("{err}");
        }
        data["access_token"]
            .as_str()
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("GitHub returned no access token"))
    }

    fn get(&self, url: &str, token: Option<&str>) -> reqwest::RequestBuilder {
        let req = self.http.get(url).header("Accept", ACCEPT);
        match token {
            Some(t) if !t.is_empty() => req.header("Authorization", format!("Bearer {t}")),
            _ => req,
        }
    }

    pub async fn user(&self, token: &str) -> Result<GithubUser> {
        let resp = self
            .get(&format!("{}/user", self.api_base), Some(token))
            .send()
            .await
            .context("GitHub user request failed")?;
        anyhow::ensure!(
            resp.status().is_success(),
            "GitHub API returned {}",
            resp.status()
        );
        resp.json().await.context("Failed to parse GitHub user")
    }

    /// Most recently updated repositories of the authenticated user.
    pub async fn repos(&self, token: &str) -> Result<Vec<RepoSummary>> {
        let url = format!("{}/user/repos?sort=updated&per_page=50", self.api_base);
        let resp = self
            .get(&url, Some(token))
            .send()
            .await
            .context("GitHub repos request failed")?;
        let body: serde_json::Value = resp.json().await.context("Failed to parse repos")?;

        // Anything other than an array (rate limit, bad token) means no repos.
        let Some(items) = body.as_array() else {
            return Ok(Vec::new());
        };
        Ok(items
            .iter()
            .filter_map(|r| serde_json::from_value(r.clone()).ok())
            .collect())
    }

    async fn fetch_tree(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        token: Option<&str>,
    ) -> Result<TreeResponse> {
        let url = format!(
            "{}/repos/{owner}/{repo}/git/trees/{branch}?recursive=1",
            self.api_base
        );
        let resp = self
            .get(&url, token)
            .send()
            .await
            .context("GitHub tree request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body: serde_json::Value = resp.json().await.unwrap_or_default();
            let message = body["message"]
                .as_str()
                .unwrap_or("Failed to fetch repository tree. Is it public?");
            anyhow::bail!("{message} ({status})");
        }
        resp.json().await.context("Failed to parse repository tree")
    }

    /// Fetch the text files of `owner/repo` at `branch`.
    ///
    /// When `branch` is `main` and its tree cannot be fetched, `master` is
    /// tried once. No further fallbacks.
    pub async fn clone_repo(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        token: Option<&str>,
    ) -> Result<ClonedRepo> {
        let (tree, branch) = match self.fetch_tree(owner, repo, branch, token).await {
            Ok(tree) => (tree, branch.to_string()),
            Err(e) if branch == "main" => {
                tracing::info!("Tree for {owner}/{repo}@main unavailable ({e}); trying master");
                (self.fetch_tree(owner, repo, "master", token).await?, "master".to_string())
            }
            Err(e) => return Err(e),
        };

        let blobs = tree
            .tree
            .into_iter()
            .filter(|item| item.kind == "blob")
            .take(MAX_CLONE_FILES)
            .filter(|item| item.size.unwrap_or(0) <= MAX_CLONE_FILE_BYTES)
            .filter(|item| !is_binary_path(&item.path));

        let mut fetches = tokio::task::JoinSet::new();
        for item in blobs {
            let client = self.clone();
            let token = token.map(str::to_string);
            fetches.spawn(async move {
                let content = client.fetch_blob(&item.url, token.as_deref()).await;
                (item.path, content)
            });
        }

        let mut files = BTreeMap::new();
        while let Some(joined) = fetches.join_next().await {
            match joined {
                Ok((path, Ok(content))) => {
                    files.insert(path, content);
                }
                Ok((path, Err(e))) => tracing::warn!("Failed to fetch {path}: {e}"),
                Err(e) => tracing::warn!("Blob fetch task failed: {e}"),
            }
        }

        Ok(ClonedRepo { branch, files })
    }

    async fn fetch_blob(&self, url: &str, token: Option<&str>) -> Result<String> {
        let resp = self.get(url, token).send().await?;
        anyhow::ensure!(resp.status().is_success(), "blob returned {}", resp.status());
        let blob: BlobResponse = resp.json().await?;
        // GitHub wraps base64 content at 60 columns.
        let compact: String = blob.content.split_whitespace().collect();
        let bytes = base64::engine::general_purpose::STANDARD.decode(compact)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Create a gist and return its page URL. `/` in file names becomes `_`.
    pub async fn create_gist(
        &self,
        token: &str,
        description: Option<&str>,
        files: &HashMap<String, String>,
        public: bool,
    ) -> Result<String> {
        let gist_files: serde_json::Map<String, serde_json::Value> = files
            .iter()
            .map(|(name, content)| (name.replace('/', "_"), json!({ "content": content })))
            .collect();

        let resp = self
            .http
            .post(format!("{}/gists", self.api_base))
            .header("Accept", ACCEPT)
            .header("Authorization", format!("Bearer {token}"))
            .json(&json!({
                "description": description.filter(|d| !d.is_empty()).unwrap_or(DEFAULT_GIST_DESCRIPTION),
                "public": public,
                "files": gist_files,
            }))
            .send()
            .await
            .context("GitHub gist request failed")?;

        let status = resp.status();
        let body: serde_json::Value = resp.json().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!(
                "{}",
                body["message"].as_str().unwrap_or("Failed to create gist")
            );
        }
        body["html_url"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("GitHub returned no gist URL"))
    }
}

fn is_binary_path(path: &str) -> bool {
    path.rsplit_once('.')
        .map(|(_, ext)| BINARY_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
