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

use std::{
    collections::HashMap,
    error::Error,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use tonic::Status;

use crate::{
    attributes::Attributes,
    client::name_resolution::{
        ConfigSelector, MethodConfig, OnCommitted, RetryPolicy, RpcConfig, RpcInfo,
    },
    wrr::WeightedRandom,
};

use super::{
    cluster::{
        cds_child_config, ActiveClusters, ClusterInfo, CLUSTER_PREFIX,
        CLUSTER_SPECIFIER_PLUGIN_PREFIX,
    },
    serializer::CallbackSerializer,
    ResolverState,
};
use crate::xds::{
    matcher::CompositeMatcher,
    resource::{
        FilterConfigOverrides, HashPolicy, HttpFilter, ListenerUpdate, RetryConfig,
        RouteActionType, RouteConfigUpdate, VirtualHost,
    },
};

/// The routing decision attached to each admitted RPC's configuration: the
/// cluster-manager child to route to, the route's hash policies, and the
/// composed per-RPC HTTP filter list.
#[derive(Debug, Clone)]
pub struct ClusterSelection {
    /// Key of the chosen cluster, in `cluster:<name>` or `csp:<plugin>`
    /// form.
    pub cluster: String,
    pub hash_policies: Vec<HashPolicy>,
    pub http_filters: Vec<ResolvedHttpFilter>,
}

/// One HTTP filter as it applies to a single RPC: the Listener-level config
/// plus the most specific override, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedHttpFilter {
    pub name: String,
    pub config: serde_json::Value,
    pub config_override: Option<serde_json::Value>,
}

// One cluster inside a route's weighted picker.
struct RouteCluster {
    key: String,
    filter_overrides: FilterConfigOverrides,
}

struct RouteSelection {
    matcher: CompositeMatcher,
    action_type: RouteActionType,
    clusters: WeightedRandom<RouteCluster>,
    max_stream_duration: Option<Duration>,
    filter_overrides: FilterConfigOverrides,
    retry_config: Option<RetryConfig>,
    hash_policies: Vec<HashPolicy>,
}

/// An immutable per-generation snapshot of the current Listener and matched
/// virtual host.  The channel invokes it once per outgoing RPC; it performs
/// weighted cluster selection and accounts for the RPC's lifetime against
/// the active-cluster table.
pub(super) struct XdsConfigSelector {
    routes: Vec<RouteSelection>,
    // Pointers into the active-cluster table for every reachable cluster.
    // Holding them here contributes one "selector reference" per cluster,
    // taken at construction and released by stop().
    clusters: HashMap<String, Arc<ClusterInfo>>,
    http_filters: Vec<HttpFilter>,
    virtual_host_overrides: FilterConfigOverrides,
    virtual_host_retry: Option<RetryConfig>,
    serializer: CallbackSerializer<ResolverState>,
    stopped: AtomicBool,
}

impl XdsConfigSelector {
    /// Builds a selector from the current Listener and matched virtual
    /// host, inserting previously-unseen clusters into the active-cluster
    /// table.  The per-cluster selector references are taken only after all
    /// fallible work has succeeded; on error the table is left with at
    /// worst zero-reference entries, which the next prune removes.
    pub(super) fn new(
        listener: &ListenerUpdate,
        route_config: Option<&RouteConfigUpdate>,
        virtual_host: &VirtualHost,
        active_clusters: &mut ActiveClusters,
        serializer: CallbackSerializer<ResolverState>,
    ) -> Result<Arc<Self>, Box<dyn Error + Send + Sync>> {
        let mut routes = Vec::with_capacity(virtual_host.routes.len());
        let mut clusters: HashMap<String, Arc<ClusterInfo>> = HashMap::new();

        for route in &virtual_host.routes {
            let mut picker = WeightedRandom::new();
            if let Some(plugin) = &route.cluster_specifier_plugin {
                let config = route_config
                    .and_then(|rc| rc.cluster_specifier_plugins.get(plugin))
                    .cloned()
                    .ok_or_else(|| {
                        format!(
                            "cluster specifier plugin {plugin:?} not found in route configuration"
                        )
                    })?;
                let key = format!("{CLUSTER_SPECIFIER_PLUGIN_PREFIX}{plugin}");
                picker.add(
                    RouteCluster {
                        key: key.clone(),
                        filter_overrides: FilterConfigOverrides::default(),
                    },
                    1,
                );
                let entry = active_clusters.add_or_get(&key);
                entry.child_config = config;
                clusters.insert(key, entry.info.clone());
            } else {
                for (name, weighted_cluster) in &route.weighted_clusters {
                    let key = format!("{CLUSTER_PREFIX}{name}");
                    picker.add(
                        RouteCluster {
                            key: key.clone(),
                            filter_overrides: weighted_cluster
                                .http_filter_config_override
                                .clone(),
                        },
                        u64::from(weighted_cluster.weight),
                    );
                    let entry = active_clusters.add_or_get(&key);
                    entry.child_config = cds_child_config(name);
                    clusters.insert(key, entry.info.clone());
                }
            }

            let matcher = CompositeMatcher::from_route(route)?;
            routes.push(RouteSelection {
                matcher,
                action_type: route.action_type,
                clusters: picker,
                max_stream_duration: route.max_stream_duration.or(listener.max_stream_duration),
                filter_overrides: route.http_filter_config_override.clone(),
                retry_config: route.retry_config.clone(),
                hash_policies: route.hash_policies.clone(),
            });
        }

        // Account for this selector's clusters.  Done after no further
        // errors may occur, so a failed build never leaves references
        // behind.
        for info in clusters.values() {
            info.add_ref();
        }

        Ok(Arc::new(Self {
            routes,
            clusters,
            http_filters: listener.http_filters.clone(),
            virtual_host_overrides: virtual_host.http_filter_config_override.clone(),
            virtual_host_retry: virtual_host.retry_config.clone(),
            serializer,
            stopped: AtomicBool::new(false),
        }))
    }

    /// Releases the selector's cluster references and marks it stopped.
    /// Completion hooks of RPCs already admitted remain valid; new picks
    /// fail fast.
    pub(super) fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut any_down_to_zero = false;
        for info in self.clusters.values() {
            if info.drop_ref() {
                any_down_to_zero = true;
            }
        }
        if any_down_to_zero {
            self.serializer
                .schedule(|state| state.on_cluster_ref_down_to_zero());
        }
    }

    fn resolved_filters(&self, route: &RouteSelection, cluster: &RouteCluster) -> Vec<ResolvedHttpFilter> {
        self.http_filters
            .iter()
            .map(|filter| {
                let config_override = cluster
                    .filter_overrides
                    .get(&filter.name)
                    .or_else(|| route.filter_overrides.get(&filter.name))
                    .or_else(|| self.virtual_host_overrides.get(&filter.name))
                    .cloned();
                ResolvedHttpFilter {
                    name: filter.name.clone(),
                    config: filter.config.clone(),
                    config_override,
                }
            })
            .collect()
    }
}

impl ConfigSelector for XdsConfigSelector {
    fn select_config(&self, rpc: &RpcInfo) -> Result<RpcConfig, Status> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(Status::unavailable("xds: config selector is no longer active"));
        }

        let Some(route) = self.routes.iter().find(|r| r.matcher.matches(rpc)) else {
            return Err(Status::unavailable("no matching route found"));
        };
        match route.action_type {
            RouteActionType::Route => {}
            RouteActionType::NonForwardingAction => {
                return Err(Status::unavailable(
                    "matched route is a non-forwarding action",
                ));
            }
            RouteActionType::Unsupported => {
                return Err(Status::unavailable(
                    "matched route does not have a supported route action type",
                ));
            }
        }

        let cluster = route
            .clusters
            .next()
            .ok_or_else(|| Status::unavailable("matched route has no clusters"))?;
        let info = self
            .clusters
            .get(&cluster.key)
            .ok_or_else(|| Status::internal("xds: picked cluster has no active entry"))?;

        // The RPC holds one cluster reference from pick to completion.
        info.add_ref();
        let rpc_ref = Arc::clone(info);
        let serializer = self.serializer.clone();
        let on_committed = OnCommitted::new(move || {
            if rpc_ref.drop_ref() {
                serializer.schedule(|state| state.on_cluster_ref_down_to_zero());
            }
        });

        let retry_config = route
            .retry_config
            .as_ref()
            .or(self.virtual_host_retry.as_ref());
        let method_config = MethodConfig {
            timeout: route.max_stream_duration.filter(|d| !d.is_zero()),
            retry_policy: retry_config.map(retry_policy_from_config),
        };

        let mut attributes = Attributes::new();
        attributes.set(ClusterSelection {
            cluster: cluster.key.clone(),
            hash_policies: route.hash_policies.clone(),
            http_filters: self.resolved_filters(route, cluster),
        });

        Ok(RpcConfig {
            method_config,
            attributes,
            on_committed: Some(on_committed),
        })
    }
}

// The channel's retry machinery takes the generic service-config shape:
// attempts include the original RPC, and backoff grows by a fixed factor
// of two.
fn retry_policy_from_config(config: &RetryConfig) -> RetryPolicy {
    RetryPolicy {
        max_attempts: config.num_retries + 1,
        initial_backoff: config.retry_backoff.base_interval,
        max_backoff: config.retry_backoff.max_interval,
        backoff_multiplier: 2.0,
        retryable_status_codes: config.retry_on.clone(),
    }
}
