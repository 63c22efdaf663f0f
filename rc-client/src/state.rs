//! Application state management
//!
//! `AppState` is built once at startup and handed to every component that
//! needs the bus, the session model or the client. The session model is
//! split into a single non-cloneable writer, owned by the protocol client,
//! and any number of read-only views.

use crate::client::BroadcastClient;
use crate::config::ClientConfig;
use crate::replay_offset::ReplayOffset;
use rc_core::{EventBus, SessionModel};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ClientConfig>,

    /// Event bus every listener registers on
    pub bus: EventBus,

    /// Read-only view of the session model
    pub model: ModelView,

    /// Session time to replay time mapping
    pub replay_offset: ReplayOffset,

    /// The broadcasting client, owner of the model writer
    pub client: Arc<BroadcastClient>,
}

impl AppState {
    pub fn new(config: ClientConfig) -> Self {
        let config = Arc::new(config);
        let bus = EventBus::new();
        let writer = ModelWriter::new();
        let model = writer.view();
        let client = Arc::new(BroadcastClient::new(config.clone(), bus.clone(), writer));

        Self {
            config,
            bus,
            model,
            replay_offset: ReplayOffset::new(),
            client,
        }
    }
}

/// Exclusive write access to the session model
pub struct ModelWriter {
    inner: Arc<RwLock<SessionModel>>,
}

impl ModelWriter {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(SessionModel::new())),
        }
    }

    /// A read-only view of the same model
    pub fn view(&self) -> ModelView {
        ModelView {
            inner: self.inner.clone(),
        }
    }

    /// Lock for writing. Do not publish events while holding the guard.
    pub fn write(&self) -> RwLockWriteGuard<'_, SessionModel> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn read(&self) -> RwLockReadGuard<'_, SessionModel> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Second handle for the receive task of the owning client
    pub(crate) fn share(&self) -> ModelWriter {
        ModelWriter {
            inner: self.inner.clone(),
        }
    }
}

impl Default for ModelWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only handle to the session model
#[derive(Clone)]
pub struct ModelView {
    inner: Arc<RwLock<SessionModel>>,
}

impl ModelView {
    /// Lock for reading. Keep the guard short-lived.
    pub fn read(&self) -> RwLockReadGuard<'_, SessionModel> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }
}
