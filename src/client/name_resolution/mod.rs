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

//! Name Resolution for gRPC.
//!
//! Name Resolution is the process by which a channel's target is converted
//! into routing state for the channel: network addresses, a service config,
//! and optionally a per-RPC config selector that picks a route for every
//! outgoing call.

use core::fmt;

use super::service_config::ServiceConfig;
use crate::{attributes::Attributes, credentials::Credentials, rt};
use std::{
    error::Error,
    fmt::{Display, Formatter},
    hash::Hash,
    str::FromStr,
    sync::Arc,
    time::Duration,
};

use tonic::{metadata::MetadataMap, Status};

mod registry;
pub use registry::{ResolverRegistry, GLOBAL_RESOLVER_REGISTRY};

/// A channel target: a URI of the form `scheme://[authority]/endpoint`.
/// The scheme selects the name resolver responsible for the target.
#[derive(Debug, Clone)]
pub struct Target {
    url: url::Url,
}

impl FromStr for Target {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<url::Url>() {
            Ok(url) => Ok(Target { url }),
            Err(err) => Err(ParseError { cause: err }),
        }
    }
}

impl From<url::Url> for Target {
    fn from(url: url::Url) -> Self {
        Target { url }
    }
}

impl Target {
    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    /// The authority portion of the target URI, or the empty string if the
    /// target has none.
    pub fn authority(&self) -> &str {
        self.url.authority()
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

#[derive(Debug)]
pub struct ParseError {
    cause: url::ParseError,
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "invalid target URI: {}", self.cause)
    }
}

impl Error for ParseError {}

/// A name resolver factory.
pub trait ResolverBuilder: Send + Sync {
    /// Builds a name resolver instance for the given target, or returns an
    /// error if the target or channel configuration makes resolution
    /// impossible (e.g. a bootstrap misconfiguration).  Errors that can only
    /// be detected later are instead reported through the channel.
    fn build(
        &self,
        target: &Target,
        channel: Arc<dyn ChannelController>,
        options: ResolverOptions,
    ) -> Result<Box<dyn Resolver>, Box<dyn Error + Send + Sync>>;

    /// Reports the URI scheme handled by this name resolver.
    fn scheme(&self) -> &str;

    /// Returns the default authority for a channel using this name resolver
    /// and target.  This is typically the same as the service's name.  By
    /// default, returns the path portion of the target URI with the leading
    /// slash removed.
    fn default_authority(&self, target: &Target) -> String {
        target.path().trim_start_matches('/').to_string()
    }

    /// Returns a bool indicating whether the input uri is valid to create a
    /// resolver.
    fn is_valid_uri(&self, target: &Target) -> bool;
}

/// A collection of data configured on the channel that is constructing this
/// name resolver.
#[non_exhaustive]
pub struct ResolverOptions {
    /// The effective authority of the channel for which the resolver is
    /// built.
    pub authority: String,

    /// The runtime which provides utilities to do async work.
    pub runtime: Arc<dyn rt::Runtime>,

    /// The transport credentials configured on the channel, if any.
    pub credentials: Option<Arc<dyn Credentials>>,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            authority: String::new(),
            runtime: rt::default_runtime(),
            credentials: None,
        }
    }
}

/// Watches for updates on the specified target and pushes them to the
/// channel via the `ChannelController` it was built with.
#[tonic::async_trait]
pub trait Resolver: Send {
    /// Asks the resolver to obtain an updated resolver result, if
    /// applicable.
    ///
    /// This is useful for pull-based implementations to decide when to
    /// re-resolve.  For push-based implementations, this may be a no-op.
    fn resolve_now(&mut self);

    /// Stops the resolver and releases its resources.  No channel
    /// operations are performed after close returns.  Idempotent.
    async fn close(&mut self);
}

impl std::fmt::Debug for dyn Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Resolver")
    }
}

/// Provides the resolver with functionality to interact with the channel.
/// All methods are non-blocking and safe to call re-entrantly.
pub trait ChannelController: Send + Sync {
    /// Notifies the channel about the current state of the name resolver.
    /// If an error value is returned, the name resolver should attempt to
    /// re-resolve, if possible.
    fn update_state(&self, update: ResolverUpdate) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Notifies the channel that the resolver encountered an error that did
    /// not invalidate its previous state.
    fn report_error(&self, error: Box<dyn Error + Send + Sync>);

    /// Parses the provided JSON service config and returns an instance of a
    /// ServiceConfig.
    fn parse_service_config(
        &self,
        config: &str,
    ) -> Result<ServiceConfig, Box<dyn Error + Send + Sync>>;
}

/// ResolverUpdate contains the current Resolver state relevant to the
/// channel.
#[derive(Clone)]
#[non_exhaustive]
pub struct ResolverUpdate {
    /// Attributes contains arbitrary data about the resolver intended for
    /// consumption by the channel and the load balancing policy.
    pub attributes: Attributes,

    /// The latest set of resolved endpoints for the target.  Resolvers that
    /// produce routing configuration instead of addresses leave this empty.
    pub endpoints: Result<Vec<Endpoint>, String>,

    /// The result from parsing the latest service config.  `None` indicates
    /// no service config is present or the resolver does not provide service
    /// configs.
    pub service_config: Result<Option<ServiceConfig>, String>,

    /// An optional human-readable note describing context about the
    /// resolution, to be included in RPC failure status messages when
    /// neither endpoints nor service_config has a non-OK status.
    pub resolution_note: Option<String>,
}

impl Default for ResolverUpdate {
    fn default() -> Self {
        ResolverUpdate {
            attributes: Attributes::default(),
            endpoints: Ok(Vec::default()),
            service_config: Ok(None),
            resolution_note: None,
        }
    }
}

/// An Endpoint is an address or a collection of addresses which reference
/// one logical server.  Multiple addresses may be used if there are multiple
/// ways which the server can be reached, e.g. via IPv4 and IPv6 addresses.
#[derive(Debug, Default, Clone)]
#[non_exhaustive]
pub struct Endpoint {
    /// Addresses contains a list of addresses used to access this endpoint.
    pub addresses: Vec<Address>,

    /// Attributes contains arbitrary data about this endpoint intended for
    /// consumption by the LB policy.
    pub attributes: Attributes,
}

/// An Address is an identifier that indicates how to connect to a server.
#[non_exhaustive]
#[derive(Debug, Clone, Default)]
pub struct Address {
    /// The network type is used to identify what kind of transport to create
    /// when connecting to this address.  Typically TCP_IP_NETWORK_TYPE.
    pub network_type: String,

    /// The address itself is passed to the transport in order to create a
    /// connection to it.
    pub address: String,

    /// Attributes contains arbitrary data about this address intended for
    /// consumption by the subchannel.
    pub attributes: Attributes,
}

impl Eq for Address {}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.network_type == other.network_type && self.address == other.address
    }
}

impl Eq for Endpoint {}

impl PartialEq for Endpoint {
    fn eq(&self, other: &Self) -> bool {
        self.addresses == other.addresses
    }
}

impl Hash for Endpoint {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.addresses.hash(state);
    }
}

impl Hash for Address {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.network_type.hash(state);
        self.address.hash(state);
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.network_type, self.address)
    }
}

/// Indicates the address is an IPv4 or IPv6 address that should be connected
/// to via TCP/IP.
pub static TCP_IP_NETWORK_TYPE: &str = "tcp";

/// Identifying information about an RPC, provided to the config selector.
#[derive(Debug)]
pub struct RpcInfo {
    /// The full method name of the RPC, e.g. `/service/method`.
    pub method: String,

    /// The outgoing request headers.
    pub headers: MetadataMap,
}

impl RpcInfo {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            headers: MetadataMap::new(),
        }
    }
}

/// Per-method configuration applied to an RPC by the config selector.
#[derive(Debug, Clone, Default, PartialEq)]
#[non_exhaustive]
pub struct MethodConfig {
    /// The maximum duration allowed for the complete RPC, if limited.
    pub timeout: Option<Duration>,

    /// The retry policy for the RPC, if any.
    pub retry_policy: Option<RetryPolicy>,
}

/// A retry policy in the shape the channel's retry machinery consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the original RPC.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    pub retryable_status_codes: Vec<tonic::Code>,
}

/// The per-RPC output of a config selector.
#[derive(Debug)]
#[non_exhaustive]
pub struct RpcConfig {
    /// Configuration to apply to the RPC method.
    pub method_config: MethodConfig,

    /// Arbitrary data about the selection, intended for consumption by the
    /// channel's LB policies (e.g. the picked cluster-manager child).
    pub attributes: Attributes,

    /// Invoked exactly once when the RPC completes.  If the channel drops
    /// the hook without invoking it, it fires on drop.
    pub on_committed: Option<OnCommitted>,
}

/// A completion hook that fires exactly once: either when explicitly
/// invoked, or when dropped un-invoked.
pub struct OnCommitted(Option<Box<dyn FnOnce() + Send>>);

impl OnCommitted {
    pub fn new(hook: impl FnOnce() + Send + 'static) -> Self {
        Self(Some(Box::new(hook)))
    }

    /// Fires the hook.
    pub fn invoke(mut self) {
        if let Some(hook) = self.0.take() {
            hook();
        }
    }
}

impl Drop for OnCommitted {
    fn drop(&mut self) {
        if let Some(hook) = self.0.take() {
            hook();
        }
    }
}

impl fmt::Debug for OnCommitted {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "OnCommitted")
    }
}

/// Selects the configuration to use for each RPC on the channel.  Produced
/// by name resolvers that route per-call (e.g. xDS) and attached to resolver
/// updates; the channel invokes the current selector once per outgoing RPC.
pub trait ConfigSelector: Send + Sync {
    /// Returns the configuration for the RPC, or a status to fail it with.
    fn select_config(&self, rpc: &RpcInfo) -> Result<RpcConfig, Status>;
}

// The config selector rides in the resolver update's attributes so that the
// update type stays independent of which resolvers produce selectors.
#[derive(Clone)]
struct ConfigSelectorAttachment(Option<Arc<dyn ConfigSelector>>);

/// Attaches a config selector to the resolver update.  Passing `None`
/// explicitly instructs the channel to fail new RPCs while retaining the
/// rest of the update; omitting the attachment entirely leaves the
/// channel's previous selector in place.
pub fn set_config_selector(update: &mut ResolverUpdate, selector: Option<Arc<dyn ConfigSelector>>) {
    update.attributes.set(ConfigSelectorAttachment(selector));
}

/// Returns the config selector attached to the update, if any.  The outer
/// `Option` distinguishes "no attachment" from an explicit `None` selector.
pub fn get_config_selector(update: &ResolverUpdate) -> Option<Option<Arc<dyn ConfigSelector>>> {
    update
        .attributes
        .get::<ConfigSelectorAttachment>()
        .map(|att| att.0.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_parsing() {
        struct TestCase {
            input: &'static str,
            want_scheme: &'static str,
            want_authority: &'static str,
            want_path: &'static str,
        }
        let test_cases = vec![
            TestCase {
                input: "xds:///server.example.com",
                want_scheme: "xds",
                want_authority: "",
                want_path: "/server.example.com",
            },
            TestCase {
                input: "xds://traffic-director/server.example.com",
                want_scheme: "xds",
                want_authority: "traffic-director",
                want_path: "/server.example.com",
            },
            TestCase {
                input: "dns:///grpc.io:443",
                want_scheme: "dns",
                want_authority: "",
                want_path: "/grpc.io:443",
            },
        ];

        for tc in test_cases {
            let target: Target = tc.input.parse().unwrap();
            assert_eq!(target.scheme(), tc.want_scheme, "input {}", tc.input);
            assert_eq!(target.authority(), tc.want_authority, "input {}", tc.input);
            assert_eq!(target.path(), tc.want_path, "input {}", tc.input);
        }
    }

    #[test]
    fn on_committed_fires_once_on_invoke() {
        use std::sync::atomic::{AtomicU32, Ordering};
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let hook = OnCommitted::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        hook.invoke();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn on_committed_fires_once_on_drop() {
        use std::sync::atomic::{AtomicU32, Ordering};
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let hook = OnCommitted::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        drop(hook);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn config_selector_attachment_roundtrip() {
        struct Nop;
        impl ConfigSelector for Nop {
            fn select_config(&self, _rpc: &RpcInfo) -> Result<RpcConfig, Status> {
                Err(Status::unavailable("nop"))
            }
        }

        let mut update = ResolverUpdate::default();
        assert!(get_config_selector(&update).is_none());

        set_config_selector(&mut update, None);
        assert!(matches!(get_config_selector(&update), Some(None)));

        set_config_selector(&mut update, Some(Arc::new(Nop)));
        assert!(matches!(get_config_selector(&update), Some(Some(_))));
    }
}
