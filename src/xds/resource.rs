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

//! Validated views of the xDS resources the resolver consumes.
//!
//! The xDS client parses and validates the wire protos; watchers deliver
//! these plain representations.  Regular expressions are kept in pattern
//! form here and only compiled when a route table is turned into matchers,
//! so an invalid pattern surfaces as a selector build error.

use std::{
    collections::{BTreeMap, HashMap},
    time::Duration,
};

/// An HTTP filter installed on the Listener's filter chain, together with
/// its top-level configuration.  Filter configs are opaque to the resolver.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpFilter {
    pub name: String,
    pub config: serde_json::Value,
}

/// Per-filter configuration overrides, keyed by filter name.
pub type FilterConfigOverrides = HashMap<String, serde_json::Value>;

/// The client-side view of a Listener resource.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListenerUpdate {
    /// Name of the RouteConfiguration resource to subscribe to.  Unused if
    /// `inline_route_config` is set; the two are mutually exclusive.
    pub route_config_name: String,

    /// The RouteConfiguration delivered inline with the Listener, if the
    /// control plane chose not to require a separate RDS subscription.
    pub inline_route_config: Option<RouteConfigUpdate>,

    /// Default maximum duration of a stream, applied to routes that do not
    /// carry their own.
    pub max_stream_duration: Option<Duration>,

    /// The ordered HTTP filter chain of the Listener.
    pub http_filters: Vec<HttpFilter>,
}

/// The client-side view of a RouteConfiguration resource.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteConfigUpdate {
    pub virtual_hosts: Vec<VirtualHost>,

    /// Balancer configurations produced by cluster specifier plugins, keyed
    /// by plugin instance name.  Each value is a complete child-policy
    /// config list, emitted verbatim into the service config.
    pub cluster_specifier_plugins: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VirtualHost {
    /// Domain patterns this virtual host serves: exact names, `*`-prefixed
    /// suffix patterns, `*`-suffixed prefix patterns, or the universal `*`.
    pub domains: Vec<String>,

    /// Routes in evaluation order.
    pub routes: Vec<Route>,

    pub http_filter_config_override: FilterConfigOverrides,
    pub retry_config: Option<RetryConfig>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PathMatcher {
    Prefix(String),
    Exact(String),
    /// An RE2-style pattern that must match the full method path.
    Regex(String),
}

impl Default for PathMatcher {
    fn default() -> Self {
        PathMatcher::Prefix(String::new())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HeaderMatcherType {
    Exact(String),
    /// Pattern that must match the full header value.
    Regex(String),
    /// Matches when the value parses as an integer in `[start, end)`.
    Range { start: i64, end: i64 },
    /// Matches on presence (or absence, for `Present(false)`).
    Present(bool),
    Prefix(String),
    Suffix(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeaderMatcher {
    pub name: String,
    pub matcher: HeaderMatcherType,
    /// Inverts the match result.
    pub invert: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RouteActionType {
    /// Forward the RPC to a cluster.
    Route,
    /// Terminate the RPC locally; used for routes serving non-proxy
    /// features.
    NonForwardingAction,
    /// Any action this client does not implement.
    #[default]
    Unsupported,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightedCluster {
    pub weight: u32,
    pub http_filter_config_override: FilterConfigOverrides,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryBackoff {
    pub base_interval: Duration,
    pub max_interval: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Status codes eligible for retry.
    pub retry_on: Vec<tonic::Code>,
    pub num_retries: u32,
    pub retry_backoff: RetryBackoff,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HashPolicyType {
    Header {
        header_name: String,
        /// Optional rewrite applied to the header value before hashing.
        regex: Option<String>,
        regex_substitution: String,
    },
    ChannelId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HashPolicy {
    pub policy: HashPolicyType,
    /// A terminal policy short-circuits hash generation when it produces a
    /// hash.
    pub terminal: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Route {
    pub path_matcher: PathMatcher,
    /// Applies to prefix and exact path matching only.
    pub case_insensitive: bool,
    pub headers: Vec<HeaderMatcher>,
    /// Admit only this fraction of matching RPCs, out of 1,000,000.
    pub fraction_per_million: Option<u64>,

    /// Weighted cluster targets.  Ordered for deterministic picker
    /// construction.  Ignored when `cluster_specifier_plugin` is set.
    pub weighted_clusters: BTreeMap<String, WeightedCluster>,
    /// Name of the cluster specifier plugin producing this route's target.
    pub cluster_specifier_plugin: Option<String>,

    pub action_type: RouteActionType,
    /// Overrides the Listener's default max stream duration.
    pub max_stream_duration: Option<Duration>,
    pub http_filter_config_override: FilterConfigOverrides,
    pub retry_config: Option<RetryConfig>,
    pub hash_policies: Vec<HashPolicy>,
}

// Domain pattern kinds, in increasing match priority.
#[derive(PartialEq, PartialOrd, Clone, Copy)]
enum DomainMatch {
    Invalid,
    Universal,
    Prefix,
    Suffix,
    Exact,
}

fn match_domain(domain: &str, host: &str) -> (DomainMatch, bool) {
    let wildcards = domain.matches('*').count();
    if wildcards > 1 || domain.is_empty() {
        return (DomainMatch::Invalid, false);
    }
    if wildcards == 0 {
        return (DomainMatch::Exact, domain == host);
    }
    if domain == "*" {
        return (DomainMatch::Universal, true);
    }
    if let Some(suffix) = domain.strip_prefix('*') {
        return (DomainMatch::Suffix, host.ends_with(suffix));
    }
    if let Some(prefix) = domain.strip_suffix('*') {
        return (DomainMatch::Prefix, host.starts_with(prefix));
    }
    // A wildcard in the middle of the pattern is not supported.
    (DomainMatch::Invalid, false)
}

/// Returns the virtual host whose domains best match the given host.
///
/// Priority: exact > longest suffix pattern > longest prefix pattern >
/// universal wildcard.
pub fn find_best_matching_virtual_host<'a>(
    host: &str,
    virtual_hosts: &'a [VirtualHost],
) -> Option<&'a VirtualHost> {
    let mut best: Option<(&VirtualHost, DomainMatch, usize)> = None;
    for vh in virtual_hosts {
        for domain in &vh.domains {
            let (kind, matched) = match_domain(domain, host);
            if kind == DomainMatch::Invalid || !matched {
                continue;
            }
            let better = match &best {
                None => true,
                Some((_, best_kind, best_len)) => {
                    kind > *best_kind || (kind == *best_kind && domain.len() > *best_len)
                }
            };
            if better {
                best = Some((vh, kind, domain.len()));
            }
        }
    }
    best.map(|(vh, _, _)| vh)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vh(domains: &[&str]) -> VirtualHost {
        VirtualHost {
            domains: domains.iter().map(|d| d.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn virtual_host_matching() {
        struct TestCase {
            name: &'static str,
            host: &'static str,
            domains: Vec<Vec<&'static str>>,
            want: Option<usize>,
        }
        let test_cases = vec![
            TestCase {
                name: "exact beats wildcard",
                host: "svc.example.com",
                domains: vec![vec!["*"], vec!["svc.example.com"]],
                want: Some(1),
            },
            TestCase {
                name: "suffix beats prefix",
                host: "svc.example.com",
                domains: vec![vec!["svc.*"], vec!["*.example.com"]],
                want: Some(1),
            },
            TestCase {
                name: "longest suffix wins",
                host: "a.b.example.com",
                domains: vec![vec!["*.example.com"], vec!["*.b.example.com"]],
                want: Some(1),
            },
            TestCase {
                name: "universal fallback",
                host: "other.host",
                domains: vec![vec!["svc.example.com"], vec!["*"]],
                want: Some(1),
            },
            TestCase {
                name: "no match",
                host: "other.host",
                domains: vec![vec!["svc.example.com"], vec!["*.example.com"]],
                want: None,
            },
            TestCase {
                name: "embedded wildcard is ignored",
                host: "svc.example.com",
                domains: vec![vec!["svc.*.com"]],
                want: None,
            },
        ];

        for tc in test_cases {
            let vhosts: Vec<VirtualHost> = tc.domains.iter().map(|d| vh(d)).collect();
            let got = find_best_matching_virtual_host(tc.host, &vhosts);
            let got_idx = got.map(|g| {
                vhosts
                    .iter()
                    .position(|v| std::ptr::eq(v, g))
                    .unwrap()
            });
            assert_eq!(got_idx, tc.want, "case {:?}", tc.name);
        }
    }
}
