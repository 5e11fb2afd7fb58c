//! Session target (owner + repository) and per-attempt client ids.

use rand::Rng;
use std::fmt;
use std::str::FromStr;

use crate::error::ConnectionError;

/// URL-safe alphabet, 64 symbols so every index is equally likely.
const CLIENT_ID_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

pub const CLIENT_ID_LEN: usize = 10;

/// Random token addressing the server-side processing job for one connection
/// attempt. Never reused across attempts.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClientId(String);

impl ClientId {
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let id = (0..CLIENT_ID_LEN)
            .map(|_| CLIENT_ID_ALPHABET[rng.random_range(0..CLIENT_ID_ALPHABET.len())] as char)
            .collect();
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The repository a session talks about.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RepoTarget {
    owner: String,
    repo: String,
}

impl RepoTarget {
    pub fn new(owner: impl AsRef<str>, repo: impl AsRef<str>) -> Result<Self, ConnectionError> {
        let owner = validate_segment("owner", owner.as_ref())?;
        let repo = validate_segment("repo", repo.as_ref())?;
        Ok(Self { owner, repo })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// Parse `https://github.com/owner/repo[/...]`.
    fn from_github_url(url: &str) -> Result<Self, ConnectionError> {
        let rest = url
            .strip_prefix("https://")
            .or_else(|| url.strip_prefix("http://"))
            .ok_or_else(|| invalid(format!("not a URL: {url}")))?;
        let (host, path) = rest.split_once('/').unwrap_or((rest, ""));
        let host = host.strip_prefix("www.").unwrap_or(host);
        if !host.eq_ignore_ascii_case("github.com") {
            return Err(invalid(format!("not a github.com URL: {url}")));
        }

        let path = path.split(['?', '#']).next().unwrap_or_default();
        let mut parts = path.split('/').filter(|p| !p.is_empty());
        match (parts.next(), parts.next()) {
            (Some(owner), Some(repo)) => {
                let repo = repo.strip_suffix(".git").unwrap_or(repo);
                Self::new(owner, repo)
            }
            _ => Err(invalid(format!("URL has no owner/repo path: {url}"))),
        }
    }
}

impl FromStr for RepoTarget {
    type Err = ConnectionError;

    /// Accepts `owner/repo` or a GitHub repository URL.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.contains("://") {
            return Self::from_github_url(s);
        }
        match s.split_once('/') {
            Some((owner, repo)) => Self::new(owner, repo.trim_end_matches('/')),
            None => Err(invalid(format!("expected owner/repo, got {s:?}"))),
        }
    }
}

impl fmt::Display for RepoTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

fn validate_segment(field: &str, raw: &str) -> Result<String, ConnectionError> {
    let segment = raw.trim();
    if segment.is_empty() {
        return Err(invalid(format!("{field} is empty")));
    }
    if segment == "." || segment == ".." {
        return Err(invalid(format!("{field} {segment:?} is not a name")));
    }
    if let Some(bad) = segment
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(invalid(format!("{field} contains {bad:?}")));
    }
    Ok(segment.to_string())
}

fn invalid(reason: String) -> ConnectionError {
    ConnectionError::Transport(format!("invalid target: {reason}"))
}

/// `{base}/{owner}/{repo}/{client_id}`
pub fn endpoint_url(base: &str, target: &RepoTarget, client_id: &ClientId) -> String {
    format!(
        "{}/{}/{}/{}",
        base.trim_end_matches('/'),
        target.owner,
        target.repo,
        client_id
    )
}
