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

/// Transport credentials configured on a channel, as visible to name
/// resolvers.
///
/// Resolvers never perform handshakes themselves; they only need to know
/// properties of the configured credentials that affect resolution.  The xDS
/// resolver, for instance, refuses to start if xDS-aware credentials are in
/// use but the bootstrap configuration carries no certificate providers.
pub trait Credentials: Send + Sync {
    /// Reports whether these credentials obtain their security configuration
    /// from an xDS control plane.
    fn uses_xds(&self) -> bool {
        false
    }
}
