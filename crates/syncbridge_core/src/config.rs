//! Configuration for opening a synchronized store.

use crate::engine::LiveStore;
use crate::reset::{AfterResetHook, BeforeResetHook, ClientResetMode, ErrorHandler};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use syncbridge_values::Value;

/// Client-reset mode as the engine enumerates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineResetMode {
    /// Application handles the reset.
    Manual,
    /// Discard local changes.
    DiscardLocal,
    /// Recover local changes.
    Recover,
    /// Recover local changes, discarding on failure.
    RecoverOrDiscard,
}

impl From<&ClientResetMode> for EngineResetMode {
    fn from(mode: &ClientResetMode) -> Self {
        match mode {
            ClientResetMode::Manual { .. } => EngineResetMode::Manual,
            ClientResetMode::DiscardUnsynced { .. } => EngineResetMode::DiscardLocal,
            ClientResetMode::RecoverUnsynced { .. } => EngineResetMode::Recover,
            ClientResetMode::RecoverOrDiscard { .. } => EngineResetMode::RecoverOrDiscard,
        }
    }
}

/// What a store synchronizes.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncTarget {
    /// Partition-based sync on the given partition value.
    Partition(Value),
    /// Flexible sync driven by subscriptions.
    Flexible,
}

/// Callback that installs initial subscriptions on a flexible-sync store.
pub type InitialSubscriptionsCallback = Arc<dyn Fn(&dyn LiveStore) + Send + Sync>;

/// Initial subscriptions for flexible sync.
#[derive(Clone)]
pub struct InitialSubscriptions {
    /// Installs the subscriptions.
    pub callback: InitialSubscriptionsCallback,
    /// Run the callback on every open, not just the first.
    pub rerun_on_open: bool,
}

impl fmt::Debug for InitialSubscriptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitialSubscriptions")
            .field("rerun_on_open", &self.rerun_on_open)
            .finish_non_exhaustive()
    }
}

/// Immutable configuration handed to the engine when opening a store.
#[derive(Debug, Clone)]
pub struct Configuration {
    user_id: String,
    target: SyncTarget,
    client_reset: ClientResetMode,
    reset_mode: EngineResetMode,
    cancel_async_open_on_non_fatal_errors: bool,
    discard_fallback: bool,
    path: Option<PathBuf>,
    in_memory_cache: bool,
    disable_format_upgrade: bool,
    initial_subscriptions: Option<InitialSubscriptions>,
}

impl Configuration {
    /// User the store syncs as.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Sync target.
    pub fn target(&self) -> &SyncTarget {
        &self.target
    }

    /// Engine-level reset mode.
    pub fn reset_mode(&self) -> EngineResetMode {
        self.reset_mode
    }

    /// The full client-reset mode, including hooks.
    pub fn client_reset_mode(&self) -> &ClientResetMode {
        &self.client_reset
    }

    /// Manual handler attached to the reset mode.
    pub fn manual_handler(&self) -> Option<&ErrorHandler> {
        self.client_reset.error_handler()
    }

    /// Before-reset hook.
    pub fn before_reset_hook(&self) -> Option<&BeforeResetHook> {
        self.client_reset.before_hook()
    }

    /// After-reset hook.
    pub fn after_reset_hook(&self) -> Option<&AfterResetHook> {
        self.client_reset.after_hook()
    }

    /// Whether async open fails on non-fatal connection errors instead of
    /// retrying.
    pub fn cancel_async_open_on_non_fatal_errors(&self) -> bool {
        self.cancel_async_open_on_non_fatal_errors
    }

    /// Whether `RecoverOrDiscard` attempts a discard after recovery fails.
    pub fn discard_fallback(&self) -> bool {
        self.discard_fallback
    }

    /// Store path override.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether the engine may reuse cached store instances.
    pub fn in_memory_cache(&self) -> bool {
        self.in_memory_cache
    }

    /// Whether file-format upgrades are disabled.
    pub fn disable_format_upgrade(&self) -> bool {
        self.disable_format_upgrade
    }

    /// Initial flexible-sync subscriptions.
    pub fn initial_subscriptions(&self) -> Option<&InitialSubscriptions> {
        self.initial_subscriptions.as_ref()
    }
}

/// Builder for [`Configuration`].
#[derive(Debug, Clone)]
pub struct ConfigurationBuilder {
    user_id: String,
    target: SyncTarget,
    client_reset: ClientResetMode,
    cancel_async_open_on_non_fatal_errors: bool,
    discard_fallback: bool,
    path: Option<PathBuf>,
    in_memory_cache: bool,
    disable_format_upgrade: bool,
    initial_subscriptions: Option<InitialSubscriptions>,
}

impl ConfigurationBuilder {
    /// Creates a builder with default options.
    pub fn new(user_id: impl Into<String>, target: SyncTarget) -> Self {
        Self {
            user_id: user_id.into(),
            target,
            client_reset: ClientResetMode::default(),
            cancel_async_open_on_non_fatal_errors: false,
            discard_fallback: true,
            path: None,
            in_memory_cache: true,
            disable_format_upgrade: false,
            initial_subscriptions: None,
        }
    }

    /// Sets the client-reset mode.
    pub fn with_client_reset_mode(mut self, mode: ClientResetMode) -> Self {
        self.client_reset = mode;
        self
    }

    /// Fail async open on non-fatal connection errors instead of retrying.
    pub fn with_cancel_async_open_on_non_fatal_errors(mut self, cancel: bool) -> Self {
        self.cancel_async_open_on_non_fatal_errors = cancel;
        self
    }

    /// Sets whether `RecoverOrDiscard` attempts a discard after recovery fails.
    pub fn with_discard_fallback(mut self, enabled: bool) -> Self {
        self.discard_fallback = enabled;
        self
    }

    /// Overrides the store path.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Enables or disables the engine's instance cache.
    pub fn with_in_memory_cache(mut self, enabled: bool) -> Self {
        self.in_memory_cache = enabled;
        self
    }

    /// Disables file-format upgrades.
    pub fn with_disable_format_upgrade(mut self, disabled: bool) -> Self {
        self.disable_format_upgrade = disabled;
        self
    }

    /// Installs initial subscriptions for flexible sync.
    pub fn with_initial_subscriptions(
        mut self,
        callback: impl Fn(&dyn LiveStore) + Send + Sync + 'static,
        rerun_on_open: bool,
    ) -> Self {
        let callback: InitialSubscriptionsCallback = Arc::new(callback);
        self.initial_subscriptions = Some(InitialSubscriptions {
            callback,
            rerun_on_open,
        });
        self
    }

    /// Builds a configuration from the builder's own settings.
    pub fn build(&self) -> Configuration {
        self.compose(
            self.client_reset.clone(),
            self.cancel_async_open_on_non_fatal_errors,
        )
    }

    /// Builds a configuration with the given reset mode and retry preference.
    ///
    /// Pure; the builder is unchanged and each call yields an independent
    /// value.
    pub fn compose(
        &self,
        client_reset: ClientResetMode,
        cancel_async_open_on_non_fatal_errors: bool,
    ) -> Configuration {
        Configuration {
            user_id: self.user_id.clone(),
            target: self.target.clone(),
            reset_mode: EngineResetMode::from(&client_reset),
            client_reset,
            cancel_async_open_on_non_fatal_errors,
            discard_fallback: self.discard_fallback,
            path: self.path.clone(),
            in_memory_cache: self.in_memory_cache,
            disable_format_upgrade: self.disable_format_upgrade,
            initial_subscriptions: self.initial_subscriptions.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder::new("user-1", SyncTarget::Partition(Value::from("shop-42")))
    }

    #[test]
    fn defaults() {
        let config = builder().build();
        assert_eq!(config.user_id(), "user-1");
        assert_eq!(config.target(), &SyncTarget::Partition(Value::from("shop-42")));
        assert_eq!(config.reset_mode(), EngineResetMode::Recover);
        assert!(!config.cancel_async_open_on_non_fatal_errors());
        assert!(config.discard_fallback());
        assert!(config.in_memory_cache());
        assert!(!config.disable_format_upgrade());
        assert!(config.path().is_none());
        assert!(config.initial_subscriptions().is_none());
    }

    #[test]
    fn maps_every_mode() {
        let b = builder();
        let cases = [
            (ClientResetMode::manual(), EngineResetMode::Manual),
            (ClientResetMode::discard_unsynced(), EngineResetMode::DiscardLocal),
            (ClientResetMode::recover_unsynced(), EngineResetMode::Recover),
            (ClientResetMode::recover_or_discard(), EngineResetMode::RecoverOrDiscard),
        ];
        for (mode, expected) in cases {
            assert_eq!(b.compose(mode, false).reset_mode(), expected);
        }
    }

    #[test]
    fn compose_yields_independent_values() {
        let b = builder().with_path("/data/app.store");
        let first = b.compose(ClientResetMode::discard_unsynced(), true);
        let second = b.compose(ClientResetMode::manual(), false);

        assert_eq!(first.reset_mode(), EngineResetMode::DiscardLocal);
        assert!(first.cancel_async_open_on_non_fatal_errors());
        assert_eq!(second.reset_mode(), EngineResetMode::Manual);
        assert!(!second.cancel_async_open_on_non_fatal_errors());
        assert_eq!(first.path(), second.path());
        assert_eq!(b.build().reset_mode(), EngineResetMode::Recover);
    }

    #[test]
    fn hooks_are_carried() {
        let config = builder()
            .with_client_reset_mode(
                ClientResetMode::recover_or_discard()
                    .with_before(|_| {})
                    .with_after(|_, _| {}),
            )
            .build();
        assert!(config.before_reset_hook().is_some());
        assert!(config.after_reset_hook().is_some());
        assert!(config.manual_handler().is_none());
    }

    #[test]
    fn flexible_sync_options() {
        let config = ConfigurationBuilder::new("user-2", SyncTarget::Flexible)
            .with_initial_subscriptions(|_| {}, true)
            .with_in_memory_cache(false)
            .with_disable_format_upgrade(true)
            .with_discard_fallback(false)
            .build();
        assert_eq!(config.target(), &SyncTarget::Flexible);
        assert!(config.initial_subscriptions().unwrap().rerun_on_open);
        assert!(!config.in_memory_cache());
        assert!(config.disable_format_upgrade());
        assert!(!config.discard_fallback());
    }
}
