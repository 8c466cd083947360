//! Account lists: which handles go into which digest.

use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;

/// A named group of accounts delivered as one digest.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccountList {
    pub name: String,
    pub accounts: Vec<String>,
    /// Per-account post cap overriding the global one.
    #[serde(default)]
    pub max_posts: Option<usize>,
}

impl AccountList {
    /// A list holding a single account, named after it.
    #[must_use]
    pub fn single(handle: &str) -> Self {
        Self {
            name: handle.to_string(),
            accounts: vec![handle.to_string()],
            max_posts: None,
        }
    }

    #[must_use]
    pub fn is_single(&self) -> bool {
        self.accounts.len() == 1
    }

    /// Effective per-account cap.
    #[must_use]
    pub fn limit(&self, default: usize) -> usize {
        self.max_posts.unwrap_or(default)
    }

    /// Digest title: `@handle Newsletter` for one account, else `Name Newsletter`.
    #[must_use]
    pub fn title(&self) -> String {
        match self.accounts.as_slice() {
            [handle] => format!("@{handle} Newsletter"),
            _ => format!("{} Newsletter", self.name),
        }
    }

    #[must_use]
    pub fn email_subject(&self, date: NaiveDate) -> String {
        format!("{} - {}", self.title(), date.format("%Y-%m-%d"))
    }
}

#[derive(Debug, Deserialize)]
struct AccountsFile {
    #[serde(default)]
    account_lists: Vec<AccountList>,
    #[serde(default)]
    accounts: Vec<LegacyAccount>,
}

/// Older files listed bare accounts, one digest each.
#[derive(Debug, Deserialize)]
struct LegacyAccount {
    handle: String,
}

/// Parse account lists from TOML.
///
/// `[[account_lists]]` takes precedence; a file with only `[[accounts]]`
/// entries yields one single-account list per handle.
///
/// # Errors
///
/// Returns an error if the TOML is malformed or defines no accounts.
pub fn parse_account_lists(content: &str) -> Result<Vec<AccountList>> {
    let file: AccountsFile = toml::from_str(content).context("Failed to parse account lists")?;

    let lists: Vec<AccountList> = if file.account_lists.is_empty() {
        file.accounts
            .iter()
            .map(|a| AccountList::single(a.handle.trim_start_matches('@')))
            .collect()
    } else {
        file.account_lists
            .into_iter()
            .map(|mut list| {
                for handle in &mut list.accounts {
                    *handle = handle.trim().trim_start_matches('@').to_string();
                }
                list
            })
            .collect()
    };

    if lists.is_empty() {
        bail!("No account lists defined");
    }
    if let Some(list) = lists.iter().find(|l| l.accounts.is_empty()) {
        bail!("Account list '{}' has no accounts", list.name);
    }
    Ok(lists)
}

/// Read and parse an account-list file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_account_lists(path: &Path) -> Result<Vec<AccountList>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read account lists from {}", path.display()))?;
    parse_account_lists(&content)
}
