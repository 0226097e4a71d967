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

use std::error::Error;

/// An in-memory representation of a service config, usually provided to gRPC
/// as a JSON object.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ServiceConfig {
    raw: String,
    parsed: serde_json::Value,
}

impl ServiceConfig {
    /// Parses the provided JSON document into a `ServiceConfig`.
    pub fn from_json(json: &str) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let parsed: serde_json::Value = serde_json::from_str(json)
            .map_err(|err| format!("invalid service config JSON: {err}"))?;
        Ok(Self {
            raw: json.to_string(),
            parsed,
        })
    }

    /// The raw JSON the config was parsed from.
    pub fn json(&self) -> &str {
        &self.raw
    }

    /// The parsed JSON document.
    pub fn value(&self) -> &serde_json::Value {
        &self.parsed
    }

    /// Reports whether this is the empty config (`{}`), which selects the
    /// channel defaults: pick-first with no addresses.
    pub fn is_empty(&self) -> bool {
        self.parsed
            .as_object()
            .is_some_and(|obj| obj.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_empty_config() {
        let sc = ServiceConfig::from_json("{}").unwrap();
        assert!(sc.is_empty());
        assert_eq!(sc.json(), "{}");
    }

    #[test]
    fn rejects_invalid_json() {
        assert!(ServiceConfig::from_json("{not json").is_err());
    }

    #[test]
    fn exposes_parsed_value() {
        let sc = ServiceConfig::from_json(r#"{"loadBalancingConfig":[]}"#).unwrap();
        assert!(!sc.is_empty());
        assert!(sc.value().get("loadBalancingConfig").is_some());
    }
}
