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

//! The subset of the xDS bootstrap configuration consumed by the resolver.
//!
//! Discovering and loading the bootstrap file is the xDS client's concern;
//! this module only models the fields the resolver reads and the listener
//! resource name templating they drive.

use std::{collections::HashMap, error::Error};

use serde::Deserialize;

fn default_listener_template() -> String {
    "%s".to_string()
}

/// The bootstrap configuration of the xDS client, as visible to consumers.
#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapConfig {
    /// Template for the name of the Listener resource to subscribe to for
    /// channels with no authority in their target URI.
    #[serde(
        default = "default_listener_template",
        rename = "client_default_listener_resource_name_template"
    )]
    pub client_default_listener_resource_name_template: String,

    /// Per-authority configuration, keyed by authority name.
    #[serde(default)]
    pub authorities: HashMap<String, Authority>,

    /// Certificate provider instances available for xDS-provided security
    /// configuration, keyed by instance name.  Only presence matters to the
    /// resolver; the configs themselves are opaque.
    #[serde(default, rename = "certificate_providers")]
    pub cert_provider_configs: HashMap<String, serde_json::Value>,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            client_default_listener_resource_name_template: default_listener_template(),
            authorities: HashMap::new(),
            cert_provider_configs: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Authority {
    /// Template for Listener resource names for channels naming this
    /// authority.  Empty means: use the client default template.
    #[serde(default, rename = "client_listener_resource_name_template")]
    pub client_listener_resource_name_template: String,
}

impl BootstrapConfig {
    /// Parses a bootstrap JSON document, ignoring fields the resolver does
    /// not consume.
    pub fn from_json(contents: &str) -> Result<Self, Box<dyn Error + Send + Sync>> {
        serde_json::from_str(contents)
            .map_err(|err| format!("invalid bootstrap configuration: {err}").into())
    }

    /// Reports whether the configuration carries no usable content.
    pub fn is_empty(&self) -> bool {
        self.client_default_listener_resource_name_template.is_empty()
            && self.authorities.is_empty()
    }
}

/// Substitutes the endpoint from the channel target into the `%s`
/// placeholder of a listener resource name template.  Endpoints substituted
/// into `xdstp:` templates are percent-encoded, with `/` left intact.
pub fn populate_resource_template(template: &str, endpoint: &str) -> String {
    if template.starts_with("xdstp:") {
        template.replace("%s", &percent_encode(endpoint))
    } else {
        template.replace("%s", endpoint)
    }
}

// Percent-encodes everything outside the unreserved set, keeping path
// separators readable.
fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for b in input.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b'/' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}
