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
    sync::{Arc, Mutex},
};

use once_cell::sync::Lazy;

use super::ResolverBuilder;

/// Maps URI schemes to the resolver builders responsible for them.
///
/// A channel consults the registry with its target's scheme to decide which
/// resolver to build; the xds resolver registers itself here under `xds`.
/// Schemes are normalized to lowercase on registration and lookup, so
/// matching is case-insensitive per RFC 3986.
pub struct ResolverRegistry {
    builders: Mutex<HashMap<String, Arc<dyn ResolverBuilder>>>,
}

impl ResolverRegistry {
    fn new() -> Self {
        Self {
            builders: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a builder under the scheme it reports.  Registering a
    /// second builder for the same scheme replaces the first.
    pub fn register(&self, builder: Box<dyn ResolverBuilder>) {
        let scheme = builder.scheme().to_ascii_lowercase();
        self.builders
            .lock()
            .unwrap()
            .insert(scheme, Arc::from(builder));
    }

    /// Returns the builder registered for the given scheme, if any.
    pub fn get_scheme(&self, scheme: &str) -> Option<Arc<dyn ResolverBuilder>> {
        self.builders
            .lock()
            .unwrap()
            .get(&scheme.to_ascii_lowercase())
            .cloned()
    }
}

/// The process-wide registry channels consult by default.
pub static GLOBAL_RESOLVER_REGISTRY: Lazy<ResolverRegistry> = Lazy::new(ResolverRegistry::new);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::name_resolution::{
        ChannelController, Resolver, ResolverOptions, Target,
    };
    use std::error::Error;

    struct StubBuilder {
        scheme: &'static str,
        valid: bool,
    }

    impl ResolverBuilder for StubBuilder {
        fn build(
            &self,
            _target: &Target,
            _channel: Arc<dyn ChannelController>,
            _options: ResolverOptions,
        ) -> Result<Box<dyn Resolver>, Box<dyn Error + Send + Sync>> {
            Err("stub resolvers cannot be built".into())
        }

        fn scheme(&self) -> &str {
            self.scheme
        }

        fn is_valid_uri(&self, _target: &Target) -> bool {
            self.valid
        }
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let registry = ResolverRegistry::new();
        registry.register(Box::new(StubBuilder {
            scheme: "StUb",
            valid: true,
        }));

        assert!(registry.get_scheme("stub").is_some());
        assert!(registry.get_scheme("STUB").is_some());
        assert!(registry.get_scheme("other").is_none());
    }

    #[test]
    fn later_registration_replaces_earlier() {
        let registry = ResolverRegistry::new();
        registry.register(Box::new(StubBuilder {
            scheme: "stub",
            valid: false,
        }));
        registry.register(Box::new(StubBuilder {
            scheme: "stub",
            valid: true,
        }));

        let builder = registry.get_scheme("stub").unwrap();
        let target: Target = "stub:///x".parse().unwrap();
        assert!(builder.is_valid_uri(&target));
    }
}
