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

//! The xds resolver: performs LDS and RDS to find the cluster to use for a
//! channel target.
//!
//! The resolver owns two correlated resource subscriptions (one Listener
//! watcher, and at most one RouteConfiguration watcher whose lifetime
//! follows the Listener's contents), derives a route table from the
//! received configuration, and emits service-config updates paired with a
//! per-RPC config selector.  All state transitions run on a single-worker
//! callback serializer; the only state shared with other threads is the
//! per-cluster reference count.

use std::{error::Error, sync::Arc};

use rand::Rng;
use tracing::{debug, error, info, warn};

use crate::client::name_resolution::{
    self, ChannelController, Resolver, ResolverBuilder, ResolverOptions, ResolverUpdate, Target,
    GLOBAL_RESOLVER_REGISTRY,
};
use crate::xds::{
    bootstrap,
    client::{XdsClient, XdsClientFactory},
    resource::{
        find_best_matching_virtual_host, ListenerUpdate, RouteConfigUpdate, VirtualHost,
    },
};

mod cluster;
mod config_selector;
mod serializer;
mod service_config;
mod watchers;

#[cfg(test)]
mod test_utils;

pub use config_selector::{ClusterSelection, ResolvedHttpFilter};

use cluster::ActiveClusters;
use config_selector::XdsConfigSelector;
use serializer::CallbackSerializer;
use service_config::service_config_json;
use watchers::{ListenerWatcher, RouteConfigWatcher};

/// The xds resolver's URI scheme.
pub const XDS_SCHEME: &str = "xds";

/// Registers the xds resolver with the global resolver registry.
pub fn reg() {
    GLOBAL_RESOLVER_REGISTRY.register(Box::new(XdsResolverBuilder::new()));
}

/// Errors detected synchronously while building an xds resolver.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("xds: no xDS client factory is configured for the channel")]
    NoClientFactory,

    #[error("xds: failed to create xds client: {0}")]
    ClientCreation(String),

    #[error("xds: bootstrap configuration is empty")]
    EmptyBootstrap,

    #[error(
        "xds: use of xDS credentials is specified, but certificate provider \
         config is missing in the bootstrap configuration"
    )]
    MissingCertificateProviders,

    #[error(
        "xds: authority {authority:?} specified in dial target {target} is \
         not found in the bootstrap configuration"
    )]
    AuthorityNotFound { authority: String, target: String },
}

/// Builds xds resolvers.
///
/// The xDS client is obtained through an injectable factory so that tests
/// can run resolvers against distinct bootstrap configurations in parallel;
/// production channels use the process-wide default factory.
pub struct XdsResolverBuilder {
    client_factory: Option<Arc<dyn XdsClientFactory>>,
}

impl XdsResolverBuilder {
    pub fn new() -> Self {
        Self {
            client_factory: None,
        }
    }

    /// Creates a builder that obtains xDS clients from the provided factory
    /// instead of the process-wide default.
    pub fn with_client_factory(factory: Arc<dyn XdsClientFactory>) -> Self {
        Self {
            client_factory: Some(factory),
        }
    }

    fn new_client(&self) -> Result<Arc<dyn XdsClient>, BuildError> {
        let factory = self
            .client_factory
            .clone()
            .or_else(crate::xds::client::default_client_factory)
            .ok_or(BuildError::NoClientFactory)?;
        factory
            .new_client()
            .map_err(|err| BuildError::ClientCreation(err.to_string()))
    }
}

impl Default for XdsResolverBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// Performs the following sanity checks:
//   - Verifies that the bootstrap configuration is not empty.
//   - Verifies that if xDS credentials are specified by the user, the
//     bootstrap configuration contains certificate providers.
//   - Verifies that if the provided dial target contains an authority, the
//     bootstrap configuration contains server config for that authority.
//
// Returns the listener resource name template to use.
fn sanity_checks_on_bootstrap_config(
    target: &Target,
    options: &ResolverOptions,
    client: &dyn XdsClient,
) -> Result<String, BuildError> {
    let config = client.bootstrap_config();
    if config.is_empty() {
        return Err(BuildError::EmptyBootstrap);
    }

    // If xDS credentials were specified by the user, but the bootstrap
    // config does not contain any certificate providers, fail right now
    // rather than when a security config arrives from the control plane.
    let uses_xds_creds = options
        .credentials
        .as_ref()
        .is_some_and(|creds| creds.uses_xds());
    if uses_xds_creds && config.cert_provider_configs.is_empty() {
        return Err(BuildError::MissingCertificateProviders);
    }

    // Use the top-level template, unless the target names an authority with
    // its own.
    let mut template = config.client_default_listener_resource_name_template.clone();
    let authority = target.authority();
    if !authority.is_empty() {
        let authority_config =
            config
                .authorities
                .get(authority)
                .ok_or_else(|| BuildError::AuthorityNotFound {
                    authority: authority.to_string(),
                    target: target.to_string(),
                })?;
        if !authority_config.client_listener_resource_name_template.is_empty() {
            template = authority_config
                .client_listener_resource_name_template
                .clone();
        }
    }
    Ok(template)
}

impl ResolverBuilder for XdsResolverBuilder {
    // The xds bootstrap process is performed (and an xds client reference is
    // taken) every time an xds resolver is built.
    fn build(
        &self,
        target: &Target,
        channel: Arc<dyn ChannelController>,
        options: ResolverOptions,
    ) -> Result<Box<dyn Resolver>, Box<dyn Error + Send + Sync>> {
        let channel_id: u64 = rand::thread_rng().gen();
        info!(channel_id, target = %target, "creating xds resolver");

        let client = self.new_client()?;
        let template = match sanity_checks_on_bootstrap_config(target, &options, client.as_ref())
        {
            Ok(template) => template,
            Err(err) => {
                client.close();
                return Err(err.into());
            }
        };

        let endpoint = target.path().trim_start_matches('/');
        let lds_resource_name = bootstrap::populate_resource_template(&template, endpoint);

        let (serializer, driver) = CallbackSerializer::new();
        let mut state = ResolverState {
            channel,
            channel_id,
            xds_client: Some(client.clone()),
            serializer: serializer.clone(),
            lds_resource_name: lds_resource_name.clone(),
            listener_watcher: None,
            listener_update_received: false,
            current_listener: None,
            rds_resource_name: String::new(),
            route_config_watcher: None,
            route_config_update_received: false,
            current_route_config: None,
            current_virtual_host: None,
            active_clusters: ActiveClusters::default(),
            current_config_selector: None,
        };
        state.listener_watcher = Some(ListenerWatcher::start(
            &lds_resource_name,
            serializer.clone(),
            client.as_ref(),
        ));
        driver.run(state, options.runtime.as_ref(), ResolverState::teardown);

        Ok(Box::new(XdsResolver { serializer }))
    }

    fn scheme(&self) -> &str {
        XDS_SCHEME
    }

    fn is_valid_uri(&self, target: &Target) -> bool {
        !target.path().trim_start_matches('/').is_empty()
    }
}

/// The channel-facing handle to a running xds resolver.  All resolver state
/// lives with the serializer worker; this handle only controls its
/// lifetime.
pub struct XdsResolver {
    serializer: CallbackSerializer<ResolverState>,
}

#[tonic::async_trait]
impl Resolver for XdsResolver {
    // xDS is push based: the control plane sends updates as they happen.
    fn resolve_now(&mut self) {}

    async fn close(&mut self) {
        // Cancelling the serializer guarantees no new callbacks are
        // scheduled; callbacks already scheduled run to completion, then
        // the worker stops the watchers and releases the xds client before
        // close returns.
        self.serializer.close().await;
    }
}

impl Drop for XdsResolver {
    fn drop(&mut self) {
        self.serializer.cancel();
    }
}

// All fields are confined to the serializer worker.  The watchers, the
// config selectors, and RPC completion hooks hold clones of the serializer
// handle and schedule the on_* event methods below; mutual exclusion among
// those callbacks makes locks unnecessary here.  The one exception is the
// per-cluster reference count, which RPC completion mutates atomically from
// arbitrary threads.
struct ResolverState {
    channel: Arc<dyn ChannelController>,
    channel_id: u64,
    // Dropped (after close()) during teardown; the resolver holds exactly
    // one reference to the shared client between build and close.
    xds_client: Option<Arc<dyn XdsClient>>,
    serializer: CallbackSerializer<ResolverState>,

    lds_resource_name: String,
    listener_watcher: Option<Arc<ListenerWatcher>>,
    listener_update_received: bool,
    current_listener: Option<ListenerUpdate>,

    rds_resource_name: String,
    route_config_watcher: Option<Arc<RouteConfigWatcher>>,
    route_config_update_received: bool,
    current_route_config: Option<RouteConfigUpdate>,
    // Matched virtual host, for quick access.
    current_virtual_host: Option<VirtualHost>,

    active_clusters: ActiveClusters,
    current_config_selector: Option<Arc<XdsConfigSelector>>,
}

impl ResolverState {
    // Runs on the serializer worker after cancellation, once every
    // previously scheduled callback has completed.
    fn teardown(mut self) {
        if let Some(watcher) = self.listener_watcher.take() {
            watcher.stop();
        }
        if let Some(watcher) = self.route_config_watcher.take() {
            watcher.stop();
        }
        if let Some(client) = self.xds_client.take() {
            client.close();
        }
        info!(channel_id = self.channel_id, "xds resolver shutdown");
    }

    // Determines whether all required configuration has been received: the
    // Listener, the RouteConfiguration, and a matching virtual host in the
    // latter.
    fn resolution_complete(&self) -> bool {
        self.listener_update_received
            && self.route_config_update_received
            && self.current_virtual_host.is_some()
    }

    // Builds and installs a new config selector from the most recent
    // configuration:
    //   - creates the selector (incrementing references to the clusters it
    //     can reach),
    //   - prunes the active-cluster table and pushes a new service config,
    //   - stops the previous selector (decrementing its references).
    //
    // On any failure the previous selector stays installed.
    fn on_resolution_complete(&mut self) {
        if !self.resolution_complete() {
            return;
        }

        let (listener, virtual_host) = match (&self.current_listener, &self.current_virtual_host)
        {
            (Some(l), Some(vh)) => (l, vh),
            _ => return,
        };
        let selector = match XdsConfigSelector::new(
            listener,
            self.current_route_config.as_ref(),
            virtual_host,
            &mut self.active_clusters,
            self.serializer.clone(),
        ) {
            Ok(selector) => selector,
            Err(err) => {
                warn!(
                    channel_id = self.channel_id,
                    listener = %self.lds_resource_name,
                    "failed to build a config selector: {err}"
                );
                self.channel.report_error(err);
                return;
            }
        };

        if !self.send_new_service_config(Some(selector.clone())) {
            // An error occurred creating the service config (unexpected);
            // erase this config selector and ignore this update, continuing
            // with the previous one.
            selector.stop();
            return;
        }

        if let Some(old_selector) = self.current_config_selector.take() {
            old_selector.stop();
        }
        self.current_config_selector = Some(selector);
    }

    // Prunes active clusters, generates a service config from the remaining
    // set, and sends it to the channel together with the provided config
    // selector.  Returns false if the update could not be produced.
    fn send_new_service_config(&mut self, selector: Option<Arc<XdsConfigSelector>>) -> bool {
        // Delete entries with zero references; the generated config must
        // list exactly the clusters that are still reachable.
        self.active_clusters.prune();

        if selector.is_none() && self.active_clusters.is_empty() {
            // No clusters and a failing config selector: send the empty
            // config, which selects pick-first with no addresses and moves
            // the channel to transient failure.
            let parsed = match self.channel.parse_service_config("{}") {
                Ok(parsed) => parsed,
                Err(err) => {
                    self.channel.report_error(err);
                    return false;
                }
            };
            let mut update = ResolverUpdate {
                service_config: Ok(Some(parsed)),
                ..Default::default()
            };
            name_resolution::set_config_selector(&mut update, None);
            let _ = self.channel.update_state(update);
            return true;
        }

        let sc_json = match service_config_json(&self.active_clusters) {
            Ok(json) => json,
            Err(err) => {
                // JSON marshal error; should never happen.
                error!(
                    channel_id = self.channel_id,
                    listener = %self.lds_resource_name,
                    route_config = %self.rds_resource_name,
                    "failed to marshal newly built service config: {err}"
                );
                self.channel.report_error(Box::new(err));
                return false;
            }
        };
        debug!(
            channel_id = self.channel_id,
            listener = %self.lds_resource_name,
            route_config = %self.rds_resource_name,
            "generated service config: {sc_json}"
        );

        let parsed = match self.channel.parse_service_config(&sc_json) {
            Ok(parsed) => parsed,
            Err(err) => {
                self.channel.report_error(err);
                return false;
            }
        };
        let mut update = ResolverUpdate {
            service_config: Ok(Some(parsed)),
            ..Default::default()
        };
        name_resolution::set_config_selector(
            &mut update,
            selector.map(|s| s as Arc<dyn name_resolution::ConfigSelector>),
        );
        let _ = self.channel.update_state(update);
        true
    }

    fn apply_route_config_update(&mut self, update: RouteConfigUpdate) {
        let Some(virtual_host) =
            find_best_matching_virtual_host(&self.lds_resource_name, &update.virtual_hosts)
        else {
            self.on_error(
                format!(
                    "no matching virtual host found for {:?}",
                    self.lds_resource_name
                )
                .into(),
            );
            return;
        };
        self.current_virtual_host = Some(virtual_host.clone());
        self.current_route_config = Some(update);
        self.route_config_update_received = true;

        self.on_resolution_complete();
    }

    // Propagates the error up to the channel.  Invoked only for errors that
    // do not invalidate the current configuration, so resolver state is
    // untouched and the old config remains in use.
    fn on_error(&mut self, err: Box<dyn Error + Send + Sync>) {
        self.channel.report_error(err);
    }

    // Common handling for the disappearance of either resource.
    //
    // Clusters with ongoing RPCs cannot be removed from the service config.
    // Instead, an erroring (nil) config selector is sent along with the
    // normal service config: new RPCs fail, and as active RPCs complete the
    // cluster reference counts drain to zero.  At that point the emission
    // becomes the empty config, which puts the channel in transient
    // failure.
    fn on_resource_not_found(&mut self) {
        self.send_new_service_config(None);

        if let Some(selector) = self.current_config_selector.take() {
            selector.stop();
        }
    }

    fn on_listener_resource_update(&mut self, update: ListenerUpdate) {
        debug!(
            channel_id = self.channel_id,
            listener = %self.lds_resource_name,
            "received listener update: {update:?}"
        );

        self.current_listener = Some(update.clone());
        self.listener_update_received = true;

        if let Some(inline_route_config) = update.inline_route_config {
            // If there was a previous route config watcher because of a
            // non-inline route configuration, cancel it.
            self.rds_resource_name.clear();
            if let Some(watcher) = self.route_config_watcher.take() {
                watcher.stop();
            }

            self.apply_route_config_update(inline_route_config);
            return;
        }

        // We get here only if there was no inline route configuration.

        // If the route config name has not changed, send an update with the
        // existing route configuration and the newly received listener
        // configuration (its filters or stream duration may have changed).
        if self.rds_resource_name == update.route_config_name {
            self.on_resolution_complete();
            return;
        }

        // The route config name has changed: cancel the old watcher and
        // start a new one.  The new name is unresolved at this point, so no
        // update is sent to the channel and the old route configuration (if
        // received) stays in use until the new one arrives.
        self.rds_resource_name = update.route_config_name;
        if let Some(watcher) = self.route_config_watcher.take() {
            watcher.stop();
            self.current_virtual_host = None;
            self.route_config_update_received = false;
        }
        let client = match &self.xds_client {
            Some(client) => client.clone(),
            None => return,
        };
        self.route_config_watcher = Some(RouteConfigWatcher::start(
            self.rds_resource_name.clone(),
            self.serializer.clone(),
            client.as_ref(),
        ));
    }

    fn on_listener_resource_error(&mut self, err: String) {
        debug!(
            channel_id = self.channel_id,
            listener = %self.lds_resource_name,
            "received error for listener resource: {err}"
        );
        self.on_error(err.into());
    }

    fn on_listener_resource_not_found(&mut self) {
        debug!(
            channel_id = self.channel_id,
            listener = %self.lds_resource_name,
            "received resource-not-found error for listener resource"
        );

        self.listener_update_received = false;

        if let Some(watcher) = self.route_config_watcher.take() {
            watcher.stop();
        }
        self.rds_resource_name.clear();
        self.current_virtual_host = None;
        self.route_config_update_received = false;

        self.on_resource_not_found();
    }

    fn on_route_config_resource_update(&mut self, name: String, update: RouteConfigUpdate) {
        debug!(
            channel_id = self.channel_id,
            route_config = %name,
            "received route config update: {update:?}"
        );

        if self.rds_resource_name != name {
            // Drop updates from canceled watchers.
            return;
        }

        self.apply_route_config_update(update);
    }

    fn on_route_config_resource_error(&mut self, name: String, err: String) {
        debug!(
            channel_id = self.channel_id,
            route_config = %name,
            "received error for route config resource: {err}"
        );

        if self.rds_resource_name != name {
            // Drop errors from canceled watchers.
            return;
        }
        self.on_error(err.into());
    }

    fn on_route_config_resource_not_found(&mut self, name: String) {
        debug!(
            channel_id = self.channel_id,
            route_config = %name,
            "received resource-not-found error for route config resource"
        );

        if self.rds_resource_name != name {
            return;
        }
        self.route_config_update_received = false;
        self.current_virtual_host = None;
        self.on_resource_not_found();
    }

    // Posted whenever any cluster's reference count reaches zero; re-runs
    // service config generation so the drained cluster is pruned from the
    // emitted document.
    fn on_cluster_ref_down_to_zero(&mut self) {
        self.send_new_service_config(self.current_config_selector.clone());
    }
}
