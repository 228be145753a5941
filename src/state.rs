// SPDX-License-Identifier: GPL-3.0-only

//! Shared activation state
//!
//! Two independent flags govern whether real video flows: the user's intent
//! (`feature_enabled`, written by hotkey/tray/config handlers) and the
//! downstream consumer state (`consumer_connected`, written only by the
//! relay loop, which derives it from the sink every cycle). Real video is
//! relayed iff both are true.
//!
//! Each field has exactly one writer domain. Observers such as the on-screen
//! display poll through the read-only [`ActivationView`]; there is no
//! callback or notification contract.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

struct StateInner {
    feature_enabled: AtomicBool,
    consumer_connected: AtomicBool,
}

/// Writable handle on the activation flags
#[derive(Clone)]
pub struct ActivationState {
    inner: Arc<StateInner>,
}

impl ActivationState {
    /// Create the shared state with the configured initial user intent
    pub fn new(feature_enabled: bool) -> Self {
        Self {
            inner: Arc::new(StateInner {
                feature_enabled: AtomicBool::new(feature_enabled),
                consumer_connected: AtomicBool::new(false),
            }),
        }
    }

    pub fn feature_enabled(&self) -> bool {
        self.inner.feature_enabled.load(Ordering::SeqCst)
    }

    /// Set the user intent. Writer domain: hotkey/tray/config handlers.
    pub fn set_feature_enabled(&self, enabled: bool) {
        self.inner.feature_enabled.store(enabled, Ordering::SeqCst);
    }

    /// Flip the user intent, returning the new value
    pub fn toggle_feature(&self) -> bool {
        // Single writer domain, so load-then-store cannot race another toggle
        let new = !self.feature_enabled();
        self.set_feature_enabled(new);
        new
    }

    pub fn consumer_connected(&self) -> bool {
        self.inner.consumer_connected.load(Ordering::SeqCst)
    }

    /// Publish the consumer state. Writer domain: the relay loop only.
    pub fn set_consumer_connected(&self, connected: bool) {
        self.inner
            .consumer_connected
            .store(connected, Ordering::SeqCst);
    }

    /// Read-only view for pull-only observers (OSD and friends)
    pub fn view(&self) -> ActivationView {
        ActivationView {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Default for ActivationState {
    fn default() -> Self {
        Self::new(true)
    }
}

impl std::fmt::Debug for ActivationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivationState")
            .field("feature_enabled", &self.feature_enabled())
            .field("consumer_connected", &self.consumer_connected())
            .finish()
    }
}

/// Read-only view of [`ActivationState`]
#[derive(Clone)]
pub struct ActivationView {
    inner: Arc<StateInner>,
}

impl ActivationView {
    pub fn feature_enabled(&self) -> bool {
        self.inner.feature_enabled.load(Ordering::SeqCst)
    }

    pub fn consumer_connected(&self) -> bool {
        self.inner.consumer_connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let state = ActivationState::new(true);
        assert!(state.feature_enabled());
        assert!(!state.consumer_connected());
    }

    #[test]
    fn test_toggle() {
        let state = ActivationState::new(true);
        assert!(!state.toggle_feature());
        assert!(state.toggle_feature());
    }

    #[test]
    fn test_view_tracks_writes() {
        let state = ActivationState::new(false);
        let view = state.view();
        assert!(!view.feature_enabled());

        state.set_feature_enabled(true);
        state.set_consumer_connected(true);
        assert!(view.feature_enabled());
        assert!(view.consumer_connected());
    }

    #[test]
    fn test_clones_share_state() {
        let state = ActivationState::new(false);
        let other = state.clone();
        other.set_feature_enabled(true);
        assert!(state.feature_enabled());
    }
}
