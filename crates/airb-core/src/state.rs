//! UI-agnostic request state
//!
//! `ApiState` is the single value a front-end observes. `StateStore` holds it
//! behind a `tokio::sync::watch` channel so any number of views can subscribe
//! and re-render on every transition.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Current phase of the reply request
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum ApiState {
    #[default]
    Idle,
    Loading,
    Success(String),
    Error(String),
}

impl ApiState {
    pub fn is_loading(&self) -> bool {
        matches!(self, ApiState::Loading)
    }

    /// Payload of a settled state, if any
    pub fn message(&self) -> Option<&str> {
        match self {
            ApiState::Success(text) | ApiState::Error(text) => Some(text),
            ApiState::Idle | ApiState::Loading => None,
        }
    }
}

/// Publish/subscribe holder for `ApiState`
#[derive(Debug)]
pub struct StateStore {
    tx: watch::Sender<ApiState>,
}

impl StateStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ApiState::Idle);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<ApiState> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> ApiState {
        self.tx.borrow().clone()
    }

    /// Enter Loading unless a request is already in flight.
    ///
    /// The check and the write happen under the channel's lock, so two racing
    /// callers can never both get `true`.
    pub fn begin_loading(&self) -> bool {
        self.tx.send_if_modified(|state| {
            if state.is_loading() {
                false
            } else {
                *state = ApiState::Loading;
                true
            }
        })
    }

    /// Leave Loading with a Success or Error value.
    ///
    /// Ignored unless the store is currently Loading.
    pub fn settle(&self, outcome: ApiState) -> bool {
        debug_assert!(matches!(outcome, ApiState::Success(_) | ApiState::Error(_)));
        self.tx.send_if_modified(|state| {
            if state.is_loading() {
                *state = outcome;
                true
            } else {
                false
            }
        })
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}
