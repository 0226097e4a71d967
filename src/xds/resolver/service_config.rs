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

//! Generation of the channel's service-configuration document from the
//! active-cluster table.

use std::collections::BTreeMap;

use serde::Serialize;

use super::cluster::ActiveClusters;

#[derive(Serialize)]
struct ServiceConfigJson {
    #[serde(rename = "loadBalancingConfig")]
    load_balancing_config: Vec<LbPolicyJson>,
}

#[derive(Serialize)]
struct LbPolicyJson {
    #[serde(rename = "xds_cluster_manager")]
    xds_cluster_manager: ClusterManagerJson,
}

#[derive(Serialize)]
struct ClusterManagerJson {
    // Sorted so that the emitted document is deterministic.
    children: BTreeMap<String, ChildJson>,
}

#[derive(Serialize)]
struct ChildJson {
    #[serde(rename = "childPolicy")]
    child_policy: serde_json::Value,
}

/// Produces the service-configuration JSON for the given cluster set: a
/// single `xds_cluster_manager` load-balancing policy whose children are
/// exactly the keys of the table, each holding its recorded child-policy
/// config verbatim.  Callers must prune the table first.
pub(super) fn service_config_json(
    active_clusters: &ActiveClusters,
) -> Result<String, serde_json::Error> {
    let children = active_clusters
        .iter()
        .map(|(key, entry)| {
            (
                key.clone(),
                ChildJson {
                    child_policy: entry.child_config.clone(),
                },
            )
        })
        .collect();
    serde_json::to_string(&ServiceConfigJson {
        load_balancing_config: vec![LbPolicyJson {
            xds_cluster_manager: ClusterManagerJson { children },
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::super::cluster::cds_child_config;
    use super::*;

    #[test]
    fn empty_table_produces_no_children() {
        let sc = service_config_json(&ActiveClusters::default()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&sc).unwrap();
        assert_eq!(
            parsed,
            serde_json::json!({
                "loadBalancingConfig": [{"xds_cluster_manager": {"children": {}}}]
            })
        );
    }

    #[test]
    fn children_mirror_the_cluster_table() {
        let mut active = ActiveClusters::default();
        active.add_or_get("cluster:a").child_config = cds_child_config("a");
        active.add_or_get("csp:plugin").child_config =
            serde_json::json!([{ "custom_policy": { "knob": 1 } }]);

        let sc = service_config_json(&active).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&sc).unwrap();
        assert_eq!(
            parsed,
            serde_json::json!({
                "loadBalancingConfig": [{"xds_cluster_manager": {"children": {
                    "cluster:a": {"childPolicy": [{"cds": {"cluster": "a"}}]},
                    "csp:plugin": {"childPolicy": [{"custom_policy": {"knob": 1}}]},
                }}}]
            })
        );
    }
}
