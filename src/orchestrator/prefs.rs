//! Per-site preference store.
//!
//! Consumed by pages and the settings popup as an opaque key-value
//! service keyed by site hostname. In-memory only — like the rest of
//! the orchestrator's state it does not survive a restart.

use std::collections::HashMap;

/// Site → enabled map. Sites default to enabled.
#[derive(Debug, Default)]
pub struct PrefStore {
    sites: HashMap<String, bool>,
}

impl PrefStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, site: &str, enabled: bool) {
        self.sites.insert(site.to_string(), enabled);
    }

    /// Whether interception is enabled for `site`. Unknown sites are
    /// enabled.
    pub fn get(&self, site: &str) -> bool {
        self.sites.get(site).copied().unwrap_or(true)
    }

    /// Drop any stored preference for `site`; returns whether one
    /// existed.
    pub fn clear(&mut self, site: &str) -> bool {
        self.sites.remove(site).is_some()
    }
}
