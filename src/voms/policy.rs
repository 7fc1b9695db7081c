//! VO allow-list policy.
//!
//! Loaded once at process startup from a JSON object keyed by VO name
//! (the historical `voms.json` format; values are ignored). Lookup is
//! pure set membership: no wildcards, no hierarchical matching. The
//! loaded policy is never mutated, so any number of request workers may
//! read it concurrently without synchronisation.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use crate::{Error, Result};

/// The set of VO names permitted to authenticate.
#[derive(Debug, Clone, Default)]
pub struct VomsPolicy {
    allowed: HashSet<String>,
}

impl VomsPolicy {
    /// Load the allow-list from a JSON policy file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PolicyConfig`] if the file is unreadable or is not
    /// a JSON object. Callers treat this as fatal: the process must not
    /// start serving with an undefined policy.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            Error::PolicyConfig(format!("could not read {}: {e}", path.display()))
        })?;
        let entries: HashMap<String, serde_json::Value> =
            serde_json::from_str(&raw).map_err(|e| {
                Error::PolicyConfig(format!(
                    "{} is not a JSON object keyed by VO name: {e}",
                    path.display()
                ))
            })?;
        Ok(Self {
            allowed: entries.into_keys().collect(),
        })
    }

    /// Build a policy from explicit VO names (tests, embedding).
    pub fn from_vo_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Exact-match membership check. Pure, no I/O.
    #[must_use]
    pub fn is_allowed(&self, vo_name: &str) -> bool {
        self.allowed.contains(vo_name)
    }

    /// Number of permitted VOs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.allowed.len()
    }

    /// True if no VO is permitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }

    /// Permitted VO names, sorted for stable output.
    #[must_use]
    pub fn vo_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.allowed.iter().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
