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

//! The reference-counted registry of clusters reachable by RPCs.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
};

/// Key prefix for CDS-backed clusters.
pub(crate) const CLUSTER_PREFIX: &str = "cluster:";

/// Key prefix for cluster-specifier-plugin results.
pub(crate) const CLUSTER_SPECIFIER_PLUGIN_PREFIX: &str = "csp:";

/// The reference count of one active cluster.
///
/// This is the only resolver state touched outside the serializer: RPC
/// completion hooks decrement it from arbitrary threads.  Everything else
/// about a cluster stays serializer-confined in [`ClusterEntry`].
#[derive(Debug, Default)]
pub(crate) struct ClusterInfo {
    ref_count: AtomicU32,
}

impl ClusterInfo {
    pub(crate) fn add_ref(&self) {
        self.ref_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Drops one reference.  Returns true iff this drop took the count to
    /// zero.
    pub(crate) fn drop_ref(&self) -> bool {
        self.ref_count.fetch_sub(1, Ordering::AcqRel) == 1
    }

    pub(crate) fn refs(&self) -> u32 {
        self.ref_count.load(Ordering::Acquire)
    }
}

/// One entry in the active-cluster table: the shared refcount plus the
/// child-policy config emitted for this cluster.  The child config is
/// replaced by the core on every selector build; only the core reads it.
pub(crate) struct ClusterEntry {
    pub(crate) info: Arc<ClusterInfo>,
    pub(crate) child_config: serde_json::Value,
}

/// Map from cluster key to cluster state.  Owned by the resolver core and
/// mutated only on the serializer; it is the sole source of truth for the
/// clusters listed in emitted service configurations.
#[derive(Default)]
pub(crate) struct ActiveClusters {
    clusters: HashMap<String, ClusterEntry>,
}

impl ActiveClusters {
    /// Returns the entry for the given key, inserting a zero-reference
    /// entry if the cluster was previously unseen.
    pub(crate) fn add_or_get(&mut self, key: &str) -> &mut ClusterEntry {
        self.clusters
            .entry(key.to_string())
            .or_insert_with(|| ClusterEntry {
                info: Arc::new(ClusterInfo::default()),
                child_config: serde_json::Value::Null,
            })
    }

    /// Deletes entries with zero references.  Entries must only ever be
    /// removed through this method.
    pub(crate) fn prune(&mut self) {
        self.clusters.retain(|_, entry| entry.info.refs() != 0);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&String, &ClusterEntry)> {
        self.clusters.iter()
    }
}

/// The child-policy config for a CDS-backed cluster: a CDS policy pointing
/// at the cluster by name.
pub(crate) fn cds_child_config(cluster: &str) -> serde_json::Value {
    serde_json::json!([{ "cds": { "cluster": cluster } }])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refcount_transitions() {
        let info = ClusterInfo::default();
        assert_eq!(info.refs(), 0);

        info.add_ref();
        info.add_ref();
        assert_eq!(info.refs(), 2);

        assert!(!info.drop_ref());
        assert!(info.drop_ref());
        assert_eq!(info.refs(), 0);
    }

    #[test]
    fn add_or_get_reuses_entries() {
        let mut active = ActiveClusters::default();
        active.add_or_get("cluster:a").info.add_ref();
        // The same key returns the same entry with its refcount intact.
        assert_eq!(active.add_or_get("cluster:a").info.refs(), 1);
    }

    #[test]
    fn prune_removes_only_zero_ref_entries() {
        let mut active = ActiveClusters::default();
        active.add_or_get("cluster:a").info.add_ref();
        active.add_or_get("cluster:b");
        active.add_or_get("csp:plugin");

        active.prune();

        let keys: Vec<&String> = active.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![&"cluster:a".to_string()]);

        // Dropping the last reference makes the survivor prunable too.
        active.add_or_get("cluster:a").info.drop_ref();
        active.prune();
        assert!(active.is_empty());
    }

    #[test]
    fn cds_child_config_shape() {
        assert_eq!(
            cds_child_config("backend"),
            serde_json::json!([{ "cds": { "cluster": "backend" } }])
        );
    }
}
