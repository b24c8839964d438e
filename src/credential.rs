//! API credential handling.
//!
//! The key lives in a [`CredentialCell`] owned by the application shell and
//! shared with every client by `Arc`. Clients read it on each call, so a key
//! connected after startup takes effect on the next request.

use crate::config::API_KEY_VARS;
use std::env;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

#[derive(Clone, Default)]
pub struct CredentialCell {
    inner: Arc<RwLock<Option<String>>>,
}

impl CredentialCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(key: impl Into<String>) -> Self {
        let cell = Self::new();
        cell.set(key);
        cell
    }

    /// Stores `key`. Blank values and the literal `"undefined"` clear the cell.
    pub fn set(&self, key: impl Into<String>) {
        let key = key.into();
        let value = usable_key(&key).map(str::to_string);
        if let Ok(mut guard) = self.inner.write() {
            *guard = value;
        }
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.inner.write() {
            *guard = None;
        }
    }

    /// Current key, if one usable key is connected.
    pub fn get(&self) -> Option<String> {
        self.inner.read().ok().and_then(|guard| guard.clone())
    }

    pub fn is_connected(&self) -> bool {
        self.get().is_some()
    }
}

impl fmt::Debug for CredentialCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialCell")
            .field("connected", &self.is_connected())
            .finish()
    }
}

fn usable_key(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "undefined" {
        None
    } else {
        Some(trimmed)
    }
}

/// Host capability for obtaining a key interactively.
///
/// Queried once at startup and again whenever the user asks to connect.
pub trait KeyProvider {
    fn has_selected_key(&self) -> bool;

    /// Runs the selection flow and returns the chosen key, if any.
    fn select_key(&self) -> Option<String>;
}

/// Reads the key from `GEMINI_API_KEY`, then `API_KEY`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvKeyProvider;

impl KeyProvider for EnvKeyProvider {
    fn has_selected_key(&self) -> bool {
        self.select_key().is_some()
    }

    fn select_key(&self) -> Option<String> {
        API_KEY_VARS.iter().find_map(|name| {
            env::var(name)
                .ok()
                .and_then(|value| usable_key(&value).map(str::to_string))
        })
    }
}

/// Startup probe: fills `cell` from `provider` when it holds no key yet.
pub fn probe_key(provider: &dyn KeyProvider, cell: &CredentialCell) -> bool {
    if cell.is_connected() {
        return true;
    }
    if !provider.has_selected_key() {
        debug!("[Credential] No key available from provider at startup.");
        return false;
    }
    connect_key(provider, cell)
}

/// Explicit "connect" action: always runs the provider's selection flow.
pub fn connect_key(provider: &dyn KeyProvider, cell: &CredentialCell) -> bool {
    match provider.select_key() {
        Some(key) => {
            cell.set(key);
            let connected = cell.is_connected();
            info!("[Credential] Key connected: {}", connected);
            connected
        }
        None => {
            info!("[Credential] Key selection returned nothing.");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct FixedProvider {
        key: Option<&'static str>,
        selections: Cell<u32>,
    }

    impl KeyProvider for FixedProvider {
        fn has_selected_key(&self) -> bool {
            self.key.is_some()
        }

        fn select_key(&self) -> Option<String> {
            self.selections.set(self.selections.get() + 1);
            self.key.map(str::to_string)
        }
    }

    #[test]
    fn test_blank_and_undefined_keys_are_not_connected() {
        let cell = CredentialCell::new();
        cell.set("   ");
        assert!(!cell.is_connected());
        cell.set("undefined");
        assert!(!cell.is_connected());
        cell.set("  abc123 ");
        assert_eq!(cell.get().as_deref(), Some("abc123"));
    }

    #[test]
    fn test_clones_share_the_same_key() {
        let shell = CredentialCell::new();
        let client_view = shell.clone();
        shell.set("late-bound");
        assert_eq!(client_view.get().as_deref(), Some("late-bound"));
        shell.clear();
        assert!(client_view.get().is_none());
    }

    #[test]
    fn test_probe_skips_selection_when_already_connected() {
        let provider = FixedProvider {
            key: Some("from-provider"),
            selections: Cell::new(0),
        };
        let cell = CredentialCell::with_key("existing");
        assert!(probe_key(&provider, &cell));
        assert_eq!(provider.selections.get(), 0);
        assert_eq!(cell.get().as_deref(), Some("existing"));
    }

    #[test]
    fn test_connect_replaces_key() {
        let provider = FixedProvider {
            key: Some("fresh"),
            selections: Cell::new(0),
        };
        let cell = CredentialCell::with_key("stale");
        assert!(connect_key(&provider, &cell));
        assert_eq!(cell.get().as_deref(), Some("fresh"));
    }

    #[test]
    fn test_connect_without_key_leaves_cell_empty() {
        let provider = FixedProvider {
            key: None,
            selections: Cell::new(0),
        };
        let cell = CredentialCell::new();
        assert!(!probe_key(&provider, &cell));
        assert!(!connect_key(&provider, &cell));
        assert!(!cell.is_connected());
    }
}
