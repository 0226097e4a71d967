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

//! Adapters translating xDS client callbacks into serialized resolver
//! events.
//!
//! The xDS client invokes watchers from its own threads; these adapters do
//! nothing but post the corresponding event onto the resolver's serializer.
//! After stop() they drop all further callbacks, so in-flight deliveries
//! racing a cancellation are harmless.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use crate::xds::client::{self as xdsclient, WatchHandle, XdsClient};
use crate::xds::resource::{ListenerUpdate, RouteConfigUpdate};

use super::{serializer::CallbackSerializer, ResolverState};

pub(super) struct ListenerWatcher {
    serializer: CallbackSerializer<ResolverState>,
    stopped: AtomicBool,
    subscription: Mutex<Option<Box<dyn WatchHandle>>>,
}

impl ListenerWatcher {
    pub(super) fn start(
        resource_name: &str,
        serializer: CallbackSerializer<ResolverState>,
        client: &dyn XdsClient,
    ) -> Arc<Self> {
        let watcher = Arc::new(Self {
            serializer,
            stopped: AtomicBool::new(false),
            subscription: Mutex::new(None),
        });
        let subscription = client.watch_listener(resource_name, watcher.clone());
        watcher.set_subscription(subscription);
        watcher
    }

    fn set_subscription(&self, subscription: Box<dyn WatchHandle>) {
        // stop() may have raced the subscription call; cancel instead of
        // storing in that case.
        let mut guard = self.subscription.lock().unwrap();
        if self.stopped.load(Ordering::Acquire) {
            subscription.cancel();
        } else {
            *guard = Some(subscription);
        }
    }

    /// Cancels the subscription and drops all subsequent callbacks.
    /// Idempotent.
    pub(super) fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(subscription) = self.subscription.lock().unwrap().take() {
            subscription.cancel();
        }
    }
}

impl xdsclient::ListenerWatcher for ListenerWatcher {
    fn on_update(&self, update: ListenerUpdate) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        self.serializer
            .schedule(move |state| state.on_listener_resource_update(update));
    }

    fn on_error(&self, error: String) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        self.serializer
            .schedule(move |state| state.on_listener_resource_error(error));
    }

    fn on_resource_not_found(&self) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        self.serializer
            .schedule(move |state| state.on_listener_resource_not_found());
    }
}

/// At most one exists at a time, bound to a specific RouteConfiguration
/// resource name; the resolver replaces it whenever the Listener's route
/// config name changes.
pub(super) struct RouteConfigWatcher {
    resource_name: String,
    serializer: CallbackSerializer<ResolverState>,
    stopped: AtomicBool,
    subscription: Mutex<Option<Box<dyn WatchHandle>>>,
}

impl RouteConfigWatcher {
    pub(super) fn start(
        resource_name: String,
        serializer: CallbackSerializer<ResolverState>,
        client: &dyn XdsClient,
    ) -> Arc<Self> {
        let watcher = Arc::new(Self {
            resource_name: resource_name.clone(),
            serializer,
            stopped: AtomicBool::new(false),
            subscription: Mutex::new(None),
        });
        let subscription = client.watch_route_config(&resource_name, watcher.clone());
        watcher.set_subscription(subscription);
        watcher
    }

    fn set_subscription(&self, subscription: Box<dyn WatchHandle>) {
        let mut guard = self.subscription.lock().unwrap();
        if self.stopped.load(Ordering::Acquire) {
            subscription.cancel();
        } else {
            *guard = Some(subscription);
        }
    }

    /// Cancels the subscription and drops all subsequent callbacks.
    /// Idempotent.
    pub(super) fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(subscription) = self.subscription.lock().unwrap().take() {
            subscription.cancel();
        }
    }
}

impl xdsclient::RouteConfigWatcher for RouteConfigWatcher {
    fn on_update(&self, update: RouteConfigUpdate) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        let name = self.resource_name.clone();
        self.serializer
            .schedule(move |state| state.on_route_config_resource_update(name, update));
    }

    fn on_error(&self, error: String) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        let name = self.resource_name.clone();
        self.serializer
            .schedule(move |state| state.on_route_config_resource_error(name, error));
    }

    fn on_resource_not_found(&self) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        let name = self.resource_name.clone();
        self.serializer
            .schedule(move |state| state.on_route_config_resource_not_found(name));
    }
}
