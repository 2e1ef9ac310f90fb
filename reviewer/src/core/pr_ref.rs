//! Pull-request reference parsing.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static PR_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://([^/\s]+)/([^/\s]+)/([^/\s]+)/pull/(\d+)(?:[/?#]\S*)?$")
        .expect("pull request url pattern should be valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "Invalid pull request URL format: '{url}'. Expected format: https://github.com/owner/repo/pull/123"
)]
pub struct PrUrlError {
    pub url: String,
}

/// Coordinates of a pull request on a source-control host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrReference {
    pub host: String,
    pub owner: String,
    pub repo: String,
    pub pr_number: u64,
}

impl PrReference {
    /// Parse `https://<host>/<owner>/<repo>/pull/<number>`.
    ///
    /// A trailing path, query or fragment after the number is tolerated
    /// (`.../pull/42/files`).
    pub fn parse(url: &str) -> Result<Self, PrUrlError> {
        let err = || PrUrlError {
            url: url.to_string(),
        };
        let caps = PR_URL_RE.captures(url).ok_or_else(err)?;
        let pr_number = caps[4].parse::<u64>().map_err(|_| err())?;
        Ok(Self {
            host: caps[1].to_string(),
            owner: caps[2].to_string(),
            repo: caps[3].to_string(),
            pr_number,
        })
    }

    /// Repository selector understood by `gh --repo`.
    pub fn repo_selector(&self) -> String {
        if self.host == "github.com" {
            format!("{}/{}", self.owner, self.repo)
        } else {
            format!("{}/{}/{}", self.host, self.owner, self.repo)
        }
    }
}

impl fmt::Display for PrReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.pr_number)
    }
}
