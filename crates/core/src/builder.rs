//! This module provides [ClientBuilder] and its interface for [RoomClient].

use std::sync::Arc;

use palaver_transport::core::transport::PeerId;
use palaver_transport::core::transport::SharedTransport;

use crate::callback::CallbackRegistry;
use crate::callback::SharedClientCallback;
use crate::client::RoomClient;
use crate::config::ClientConfig;

/// Creates a ClientBuilder to configure a [RoomClient].
pub struct ClientBuilder {
    transport: SharedTransport,
    config: ClientConfig,
    self_id: Option<PeerId>,
    callbacks: Vec<SharedClientCallback>,
}

impl ClientBuilder {
    /// Creates new instance of [ClientBuilder] around the external transport.
    pub fn new(transport: SharedTransport) -> Self {
        Self {
            transport,
            config: ClientConfig::default(),
            self_id: None,
            callbacks: Vec::new(),
        }
    }

    /// Replace the default tuning knobs.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the identity to join rooms with. A random one is generated
    /// otherwise.
    pub fn self_id(mut self, self_id: PeerId) -> Self {
        self.self_id = Some(self_id);
        self
    }

    /// Subscribe a callback before the client starts. More can be added
    /// later with [RoomClient::subscribe].
    pub fn callback(mut self, callback: SharedClientCallback) -> Self {
        self.callbacks.push(callback);
        self
    }

    /// Build the [RoomClient].
    pub fn build(self) -> Arc<RoomClient> {
        let self_id = self
            .self_id
            .unwrap_or_else(|| PeerId::new(uuid::Uuid::new_v4().to_string()));

        let registry = CallbackRegistry::new();
        for callback in self.callbacks {
            registry.subscribe(callback);
        }

        RoomClient::new(self.transport, self.config, self_id, registry)
    }
}
