/*
 *
 * Copyright 2025 gRPC authors.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 *
 */

//! Capability interfaces for the xDS client.
//!
//! The client that speaks the ADS protocol, caches resources, and dispatches
//! watcher callbacks lives outside this crate.  Consumers here only rely on
//! the capabilities below, which also makes every piece testable with fake
//! implementations.

use std::{error::Error, sync::Arc};

use once_cell::sync::OnceCell;

use super::{
    bootstrap::BootstrapConfig,
    resource::{ListenerUpdate, RouteConfigUpdate},
};

/// Receives updates for a Listener resource subscription.  Callbacks may be
/// delivered from arbitrary client threads.
pub trait ListenerWatcher: Send + Sync {
    /// A new version of the resource is available.
    fn on_update(&self, update: ListenerUpdate);

    /// A transient, non-terminal error occurred (connection loss, parse
    /// failure reported by the client).  Previously delivered state remains
    /// valid.
    fn on_error(&self, error: String);

    /// The control plane no longer has the resource.
    fn on_resource_not_found(&self);
}

/// Receives updates for a RouteConfiguration resource subscription.
pub trait RouteConfigWatcher: Send + Sync {
    fn on_update(&self, update: RouteConfigUpdate);
    fn on_error(&self, error: String);
    fn on_resource_not_found(&self);
}

/// Cancels a resource subscription.  After cancel returns, in-flight
/// deliveries may still invoke the watcher; watchers must tolerate that.
/// Cancel is idempotent.
pub trait WatchHandle: Send + Sync {
    fn cancel(&self);
}

/// The xDS client capabilities the resolver depends on.
pub trait XdsClient: Send + Sync {
    /// Registers a watcher for the Listener resource with the given name.
    fn watch_listener(
        &self,
        resource_name: &str,
        watcher: Arc<dyn ListenerWatcher>,
    ) -> Box<dyn WatchHandle>;

    /// Registers a watcher for the RouteConfiguration resource with the
    /// given name.
    fn watch_route_config(
        &self,
        resource_name: &str,
        watcher: Arc<dyn RouteConfigWatcher>,
    ) -> Box<dyn WatchHandle>;

    /// The bootstrap configuration the client was created from.
    fn bootstrap_config(&self) -> Arc<BootstrapConfig>;

    /// Releases the caller's reference to the client.  The underlying
    /// client is shared and reference-counted externally; each successful
    /// factory call must be balanced by exactly one close.
    fn close(&self);
}

/// Creates (or hands out a reference to) an xDS client.
///
/// The resolver builder accepts a factory instance so tests can run
/// multiple resolvers against distinct bootstrap configurations in the same
/// process.  Production channels typically rely on the process-wide default
/// factory installed via [`set_default_client_factory`].
pub trait XdsClientFactory: Send + Sync {
    fn new_client(&self) -> Result<Arc<dyn XdsClient>, Box<dyn Error + Send + Sync>>;
}

static DEFAULT_CLIENT_FACTORY: OnceCell<Arc<dyn XdsClientFactory>> = OnceCell::new();

/// Installs the process-wide default xDS client factory.  Returns an error
/// if a default factory was already installed.
pub fn set_default_client_factory(
    factory: Arc<dyn XdsClientFactory>,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    DEFAULT_CLIENT_FACTORY
        .set(factory)
        .map_err(|_| "default xDS client factory is already set".into())
}

/// Returns the process-wide default xDS client factory, if one is installed.
pub fn default_client_factory() -> Option<Arc<dyn XdsClientFactory>> {
    DEFAULT_CLIENT_FACTORY.get().cloned()
}
