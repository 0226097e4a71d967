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

//! Compiled request matchers derived from route configuration.

use std::error::Error;

use rand::Rng;
use regex::Regex;

use crate::client::name_resolution::RpcInfo;

use super::resource::{HeaderMatcher, HeaderMatcherType, PathMatcher, Route};

// Compiles a pattern that must match the entire input.
fn full_match_regex(pattern: &str) -> Result<Regex, Box<dyn Error + Send + Sync>> {
    Regex::new(&format!("^(?:{pattern})$"))
        .map_err(|err| format!("invalid regular expression {pattern:?}: {err}").into())
}

enum CompiledPathMatcher {
    Prefix(String),
    Exact(String),
    Regex(Regex),
}

enum CompiledHeaderMatch {
    Exact(String),
    Regex(Regex),
    Range { start: i64, end: i64 },
    Present(bool),
    Prefix(String),
    Suffix(String),
}

struct CompiledHeaderMatcher {
    name: String,
    matcher: CompiledHeaderMatch,
    invert: bool,
}

/// The complete match predicate for one route: path, headers, and an
/// optional runtime fraction, all of which must accept the RPC.
pub(crate) struct CompositeMatcher {
    path: CompiledPathMatcher,
    case_insensitive: bool,
    headers: Vec<CompiledHeaderMatcher>,
    fraction_per_million: Option<u64>,
}

impl CompositeMatcher {
    /// Translates a route's match expression.  Fails on invalid regular
    /// expressions or malformed ranges, which must fail the enclosing
    /// selector build.
    pub(crate) fn from_route(route: &Route) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let path = match &route.path_matcher {
            PathMatcher::Prefix(p) => CompiledPathMatcher::Prefix(p.clone()),
            PathMatcher::Exact(p) => CompiledPathMatcher::Exact(p.clone()),
            PathMatcher::Regex(p) => CompiledPathMatcher::Regex(full_match_regex(p)?),
        };

        let mut headers = Vec::with_capacity(route.headers.len());
        for hm in &route.headers {
            headers.push(compile_header_matcher(hm)?);
        }

        Ok(Self {
            path,
            case_insensitive: route.case_insensitive,
            headers,
            fraction_per_million: route.fraction_per_million,
        })
    }

    pub(crate) fn matches(&self, rpc: &RpcInfo) -> bool {
        if !self.path_matches(&rpc.method) {
            return false;
        }
        for hm in &self.headers {
            if !hm.matches(rpc) {
                return false;
            }
        }
        if let Some(fraction) = self.fraction_per_million {
            if rand::thread_rng().gen_range(0..1_000_000) >= fraction {
                return false;
            }
        }
        true
    }

    fn path_matches(&self, path: &str) -> bool {
        match &self.path {
            CompiledPathMatcher::Prefix(prefix) => {
                if self.case_insensitive {
                    path.to_lowercase().starts_with(&prefix.to_lowercase())
                } else {
                    path.starts_with(prefix)
                }
            }
            CompiledPathMatcher::Exact(exact) => {
                if self.case_insensitive {
                    path.eq_ignore_ascii_case(exact)
                } else {
                    path == exact
                }
            }
            CompiledPathMatcher::Regex(re) => re.is_match(path),
        }
    }
}

fn compile_header_matcher(
    hm: &HeaderMatcher,
) -> Result<CompiledHeaderMatcher, Box<dyn Error + Send + Sync>> {
    let matcher = match &hm.matcher {
        HeaderMatcherType::Exact(v) => CompiledHeaderMatch::Exact(v.clone()),
        HeaderMatcherType::Regex(p) => CompiledHeaderMatch::Regex(full_match_regex(p)?),
        HeaderMatcherType::Range { start, end } => {
            if start > end {
                return Err(format!(
                    "invalid header range matcher for {:?}: start {} > end {}",
                    hm.name, start, end
                )
                .into());
            }
            CompiledHeaderMatch::Range {
                start: *start,
                end: *end,
            }
        }
        HeaderMatcherType::Present(p) => CompiledHeaderMatch::Present(*p),
        HeaderMatcherType::Prefix(v) => CompiledHeaderMatch::Prefix(v.clone()),
        HeaderMatcherType::Suffix(v) => CompiledHeaderMatch::Suffix(v.clone()),
    };
    Ok(CompiledHeaderMatcher {
        name: hm.name.to_lowercase(),
        matcher,
        invert: hm.invert,
    })
}

impl CompiledHeaderMatcher {
    fn matches(&self, rpc: &RpcInfo) -> bool {
        self.matches_value(header_value(rpc, &self.name)) != self.invert
    }

    fn matches_value(&self, value: Option<String>) -> bool {
        let value = match (&self.matcher, value) {
            (CompiledHeaderMatch::Present(want), v) => return v.is_some() == *want,
            (_, None) => return false,
            (_, Some(v)) => v,
        };
        match &self.matcher {
            CompiledHeaderMatch::Exact(want) => value == *want,
            CompiledHeaderMatch::Regex(re) => re.is_match(&value),
            CompiledHeaderMatch::Range { start, end } => value
                .parse::<i64>()
                .is_ok_and(|v| v >= *start && v < *end),
            CompiledHeaderMatch::Prefix(prefix) => value.starts_with(prefix),
            CompiledHeaderMatch::Suffix(suffix) => value.ends_with(suffix),
            CompiledHeaderMatch::Present(_) => unreachable!(),
        }
    }
}

// Multiple values for the same header are joined with commas before
// matching.  Binary headers cannot be matched.
fn header_value(rpc: &RpcInfo, name: &str) -> Option<String> {
    if name.ends_with("-bin") {
        return None;
    }
    let values: Vec<&str> = rpc
        .headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();
    if values.is_empty() {
        return None;
    }
    Some(values.join(","))
}
