use std::sync::{Arc, RwLock};

use crate::api::client::ApiClient;
use crate::core::config::Settings;
use crate::core::security;
use crate::core::time::Clock;
use crate::services::answer_store::{AnswerStore, KeyValueStore, StoreError, TOKEN_KEY};

/// Bearer token of the authenticated candidate, mirrored into the durable store.
#[derive(Clone)]
pub(crate) struct TokenSlot {
    kv: Arc<dyn KeyValueStore>,
    current: Arc<RwLock<Option<String>>>,
}

impl TokenSlot {
    pub(crate) fn load(kv: Arc<dyn KeyValueStore>) -> Self {
        let stored = match kv.get(TOKEN_KEY) {
            Ok(value) => value.map(|token| token.trim().to_string()).filter(|t| !t.is_empty()),
            Err(err) => {
                tracing::error!(error = %err, "Failed to read stored access token");
                None
            }
        };
        Self { kv, current: Arc::new(RwLock::new(stored)) }
    }

    pub(crate) fn get(&self) -> Option<String> {
        self.current.read().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    pub(crate) fn set(&self, token: String) -> Result<(), StoreError> {
        self.kv.set(TOKEN_KEY, &token)?;
        *self.current.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(token);
        Ok(())
    }

    /// Forgets the token everywhere; the next call must re-authenticate.
    pub(crate) fn discard(&self) {
        *self.current.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
        if let Err(err) = self.kv.remove(TOKEN_KEY) {
            tracing::error!(error = %err, "Failed to remove stored access token");
        }
        tracing::info!("Access token discarded");
    }
}

/// Everything tied to one authenticated session, passed explicitly to the
/// components that need it.
#[derive(Clone)]
pub(crate) struct SessionContext {
    inner: Arc<InnerContext>,
}

struct InnerContext {
    settings: Settings,
    api: ApiClient,
    store: AnswerStore,
    token: TokenSlot,
    clock: Arc<dyn Clock>,
}

impl SessionContext {
    pub(crate) fn new(
        settings: Settings,
        kv: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let token = TokenSlot::load(kv.clone());
        let api = ApiClient::from_settings(&settings, token.clone())?;
        let store = AnswerStore::new(kv);
        Ok(Self { inner: Arc::new(InnerContext { settings, api, store, token, clock }) })
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    pub(crate) fn store(&self) -> &AnswerStore {
        &self.inner.store
    }

    pub(crate) fn token(&self) -> &TokenSlot {
        &self.inner.token
    }

    pub(crate) fn clock(&self) -> Arc<dyn Clock> {
        self.inner.clock.clone()
    }

    /// Subject of the stored token if it is still usable. Expired or
    /// malformed tokens are discarded.
    pub(crate) fn authenticated_subject(&self) -> Option<String> {
        let token = self.token().get()?;
        match security::inspect_token(&token, self.inner.clock.now()) {
            Ok(claims) => Some(claims.sub),
            Err(err) => {
                tracing::info!(error = %err, "Stored access token unusable");
                self.token().discard();
                None
            }
        }
    }
}
