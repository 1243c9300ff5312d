//! `RoomlinkClient` builder and facade.
//!
//! This is the entry point for embedding Roomlink in a game client. It
//! ties together all the layers: transport → session → room / matching.
//!
//! ```text
//!            ┌──────────────────────────┐
//!  app ────► │      RoomlinkClient      │
//!            ├────────────┬─────────────┤
//!            │ room actor │  matching   │
//!            ├────────────┴─────────────┤
//!            │ reconnection · identity  │
//!            ├──────────────────────────┤
//!            │        transport         │
//!            └──────────────────────────┘
//! ```

use std::sync::Arc;

use roomlink_matching::{MatchingConfig, MatchingStateMachine};
use roomlink_room::{
    CodeRegistryConfig, EnergyLedger, RoomCodeRegistry, RoomConfig, RoomError, RoomSessionHandle,
    RoomSessionManager, UnlimitedEnergy, spawn_session,
};
use roomlink_runtime::{SharedClock, SystemClock};
use roomlink_session::{
    IdentityProvider, KeyValueStore, LocalIdentity, ReconnectConfig, ReconnectionCoordinator,
};
use roomlink_transport::Transport;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::RoomlinkError;

/// Every component's settings in one place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub room: RoomConfig,
    pub codes: CodeRegistryConfig,
    pub reconnect: ReconnectConfig,
    pub matching: MatchingConfig,
    /// Store key for held room codes.
    pub codes_storage_key: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            room: RoomConfig::default(),
            codes: CodeRegistryConfig::default(),
            reconnect: ReconnectConfig::default(),
            matching: MatchingConfig::default(),
            codes_storage_key: "roomlink.codes".to_string(),
        }
    }
}

/// What [`RoomlinkClient::on_app_foreground`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ForegroundOutcome {
    /// A reconnect attempt was started or brought forward.
    pub reconnect_triggered: bool,
    /// A background search was abandoned.
    pub search_reset: bool,
}

/// Builder for configuring and starting a [`RoomlinkClient`].
///
/// # Example
///
/// ```rust,ignore
/// use roomlink::prelude::*;
///
/// let client = RoomlinkClient::builder(Arc::new(transport))
///     .store(Arc::new(MemoryStore::new()))
///     .start(&StaticIdentity(LocalIdentity::new(PlayerId(7), "ada")))
///     .await?;
/// let room = client.room().create_room(4).await?;
/// ```
pub struct ClientBuilder<T, E = UnlimitedEnergy> {
    transport: Arc<T>,
    energy: Arc<E>,
    config: ClientConfig,
    store: Option<Arc<dyn KeyValueStore>>,
    clock: Option<SharedClock>,
    policy_key: Option<String>,
}

impl<T: Transport> ClientBuilder<T> {
    /// A builder with default settings, unlimited energy and no store.
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            energy: Arc::new(UnlimitedEnergy),
            config: ClientConfig::default(),
            store: None,
            clock: None,
            policy_key: None,
        }
    }
}

impl<T: Transport, E: EnergyLedger> ClientBuilder<T, E> {
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Charge room operations against `energy`.
    pub fn energy<E2: EnergyLedger>(self, energy: Arc<E2>) -> ClientBuilder<T, E2> {
        ClientBuilder {
            transport: self.transport,
            energy,
            config: self.config,
            store: self.store,
            clock: self.clock,
            policy_key: self.policy_key,
        }
    }

    /// Persist matching state and held room codes to `store`.
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use `clock` for wall-clock policy. Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Key join rate limiting and the brute-force guard by `key` instead
    /// of the player id (for example a device id).
    pub fn policy_key(mut self, key: impl Into<String>) -> Self {
        self.policy_key = Some(key.into());
        self
    }

    /// Identify the local player, restore persisted state, connect, and
    /// spawn the room session.
    ///
    /// A failed connect does not fail startup: reconnection takes over.
    pub async fn start(
        self,
        identity: &impl IdentityProvider,
    ) -> Result<RoomlinkClient<T>, RoomlinkError> {
        let Self {
            transport,
            energy,
            config,
            store,
            clock,
            policy_key,
        } = self;
        let clock = clock.unwrap_or_else(SystemClock::shared);
        let identity = identity.identify().await?;

        let registry = RoomCodeRegistry::new(config.codes.clone(), clock.clone());
        let matching = match &store {
            Some(store) => {
                if let Err(e) = registry.restore_from(store.as_ref(), &config.codes_storage_key) {
                    warn!(error = %e, "could not restore room codes, starting empty");
                }
                let matching = MatchingStateMachine::with_store(
                    config.matching.clone(),
                    clock.clone(),
                    Arc::clone(store),
                );
                if let Err(e) = matching.restore() {
                    warn!(error = %e, "could not restore matching state, starting idle");
                }
                matching
            }
            None => MatchingStateMachine::new(config.matching.clone(), clock.clone()),
        };

        let reconnect = ReconnectionCoordinator::new(
            Arc::clone(&transport),
            config.reconnect.clone(),
            clock.clone(),
        );

        let mut manager = RoomSessionManager::new(
            identity.clone(),
            Arc::clone(&transport),
            energy,
            registry.clone(),
            config.room.clone(),
            clock,
        );
        if let Some(key) = policy_key {
            manager = manager.with_policy_key(key);
        }

        if !transport.is_connected() {
            if let Err(e) = transport.connect().await {
                warn!(error = %e, "initial connect failed, reconnecting in background");
                reconnect.on_connection_lost(None);
            }
        }

        let room = spawn_session(manager, Some(reconnect.clone()));
        info!(player_id = %identity.player_id, "roomlink client started");

        Ok(RoomlinkClient {
            identity,
            transport,
            room,
            matching,
            reconnect,
            registry,
            store,
            config,
        })
    }
}

/// A running client: the room session actor plus matching and
/// reconnection.
pub struct RoomlinkClient<T: Transport> {
    identity: LocalIdentity,
    transport: Arc<T>,
    room: RoomSessionHandle,
    matching: MatchingStateMachine,
    reconnect: ReconnectionCoordinator<T>,
    registry: RoomCodeRegistry,
    store: Option<Arc<dyn KeyValueStore>>,
    config: ClientConfig,
}

impl<T: Transport> RoomlinkClient<T> {
    /// Creates a new builder.
    pub fn builder(transport: Arc<T>) -> ClientBuilder<T> {
        ClientBuilder::new(transport)
    }

    pub fn identity(&self) -> &LocalIdentity {
        &self.identity
    }

    /// Handle to the room session actor.
    pub fn room(&self) -> &RoomSessionHandle {
        &self.room
    }

    pub fn matching(&self) -> &MatchingStateMachine {
        &self.matching
    }

    pub fn reconnect(&self) -> &ReconnectionCoordinator<T> {
        &self.reconnect
    }

    pub fn registry(&self) -> &RoomCodeRegistry {
        &self.registry
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The app regained focus: try reconnecting now, and drop a search
    /// that ran while the app was in the background.
    pub fn on_app_foreground(&self) -> ForegroundOutcome {
        ForegroundOutcome {
            reconnect_triggered: self.reconnect.on_app_foreground(),
            search_reset: self.matching.on_app_resume(),
        }
    }

    /// Write held room codes to the store. No-op without a store.
    pub fn persist_codes(&self) -> Result<(), RoomlinkError> {
        if let Some(store) = &self.store {
            self.registry
                .save_to(store.as_ref(), &self.config.codes_storage_key)?;
        }
        Ok(())
    }

    /// Stop the room session and reconnection, persist codes, and
    /// disconnect.
    pub async fn shutdown(self) -> Result<(), RoomlinkError> {
        match self.room.shutdown().await {
            Ok(()) | Err(RoomError::Unavailable) => {}
            Err(e) => return Err(e.into()),
        }
        self.reconnect.cancel();
        self.persist_codes()?;
        self.transport.disconnect().await?;
        info!(player_id = %self.identity.player_id, "roomlink client stopped");
        Ok(())
    }
}
