//! Create and update requests, and building the provider spec from them.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::LifecycleConfig;
use crate::error::{ClusterError, Result};
use crate::model::{NodePool, ProviderSpec};

/// Desired node pool as requested by the user.
///
/// `quantity_per_subnet` and `subnet_ids` are derived from `count` by the
/// network provisioner before the spec is built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodePoolProperties {
    /// Kubernetes version of the nodes.
    pub version: String,
    /// Requested total instance count.
    pub count: u32,
    /// Node image.
    pub image: String,
    /// Compute shape.
    pub shape: String,
    /// Node labels.
    pub labels: BTreeMap<String, String>,
    /// Derived: instances per subnet.
    pub quantity_per_subnet: u32,
    /// Derived: assigned worker subnets.
    pub subnet_ids: Vec<String>,
}

/// Provider properties of a create or update request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterProperties {
    /// Kubernetes version of the control plane.
    pub version: String,
    /// Node pools keyed by name.
    pub node_pools: BTreeMap<String, NodePoolProperties>,
    /// Derived: virtual cloud network id.
    pub vcn_id: String,
    /// Derived: first load balancer subnet.
    pub lb_subnet_id1: String,
    /// Derived: second load balancer subnet.
    pub lb_subnet_id2: String,
}

impl ClusterProperties {
    /// Fill defaults for every node pool: missing images use the configured
    /// default image, missing versions follow the control plane version.
    pub fn add_defaults(&mut self, config: &LifecycleConfig) {
        for np in self.node_pools.values_mut() {
            if np.image.is_empty() {
                np.image.clone_from(&config.default_node_image);
            }
            if np.version.is_empty() {
                np.version.clone_from(&self.version);
            }
        }
    }

    /// Reject the request if it describes exactly the stored cluster.
    ///
    /// # Errors
    /// Returns [`ClusterError::Validation`] when there is nothing to change.
    pub fn check_different(&self, stored: &ProviderSpec) -> Result<()> {
        let current = ClusterProperties::from(stored);

        if comparable(self) == comparable(&current) {
            return Err(ClusterError::Validation(
                "there is no change in the cluster properties".to_string(),
            ));
        }
        Ok(())
    }

    /// Build a fresh provider spec for a new cluster.
    #[must_use]
    pub fn into_spec(self, user_id: u64) -> ProviderSpec {
        let now = Utc::now();
        let node_pools = self
            .node_pools
            .into_iter()
            .map(|(name, np)| NodePool {
                name,
                shape: np.shape,
                image: np.image,
                version: np.version,
                count: np.count,
                quantity_per_subnet: np.quantity_per_subnet,
                subnet_ids: np.subnet_ids,
                labels: np.labels,
                created_at: now,
                created_by: user_id,
                delete: false,
            })
            .collect();

        ProviderSpec {
            ocid: None,
            version: self.version,
            vcn_id: self.vcn_id,
            lb_subnet_id1: self.lb_subnet_id1,
            lb_subnet_id2: self.lb_subnet_id2,
            node_pools,
            delete: false,
        }
    }

    /// Merge an update into the stored spec.
    ///
    /// Pools present in the update are changed in place, new pools are added
    /// with `user_id` as creator, and stored pools missing from the update
    /// are flagged pending delete. The stored spec is not modified.
    #[must_use]
    pub fn merge_into(&self, stored: &ProviderSpec, user_id: u64) -> ProviderSpec {
        let mut spec = stored.clone();

        if !self.version.is_empty() {
            spec.version.clone_from(&self.version);
        }
        if !self.vcn_id.is_empty() {
            spec.vcn_id.clone_from(&self.vcn_id);
        }
        if !self.lb_subnet_id1.is_empty() {
            spec.lb_subnet_id1.clone_from(&self.lb_subnet_id1);
        }
        if !self.lb_subnet_id2.is_empty() {
            spec.lb_subnet_id2.clone_from(&self.lb_subnet_id2);
        }

        for pool in &mut spec.node_pools {
            match self.node_pools.get(&pool.name) {
                Some(np) => {
                    if !np.version.is_empty() {
                        pool.version.clone_from(&np.version);
                    }
                    if !np.image.is_empty() {
                        pool.image.clone_from(&np.image);
                    }
                    if !np.shape.is_empty() {
                        pool.shape.clone_from(&np.shape);
                    }
                    pool.count = np.count;
                    pool.quantity_per_subnet = np.quantity_per_subnet;
                    pool.subnet_ids.clone_from(&np.subnet_ids);
                    pool.labels.clone_from(&np.labels);
                    pool.delete = false;
                }
                None => pool.delete = true,
            }
        }

        let now = Utc::now();
        for (name, np) in &self.node_pools {
            if stored.node_pool(name).is_some() {
                continue;
            }
            spec.node_pools.push(NodePool {
                name: name.clone(),
                shape: np.shape.clone(),
                image: np.image.clone(),
                version: np.version.clone(),
                count: np.count,
                quantity_per_subnet: np.quantity_per_subnet,
                subnet_ids: np.subnet_ids.clone(),
                labels: np.labels.clone(),
                created_at: now,
                created_by: user_id,
                delete: false,
            });
        }

        spec
    }
}

impl From<&ProviderSpec> for ClusterProperties {
    fn from(spec: &ProviderSpec) -> Self {
        let node_pools = spec
            .node_pools
            .iter()
            .filter(|np| !np.delete)
            .map(|np| {
                (
                    np.name.clone(),
                    NodePoolProperties {
                        version: np.version.clone(),
                        count: np.requested_count(),
                        image: np.image.clone(),
                        shape: np.shape.clone(),
                        labels: np.labels.clone(),
                        quantity_per_subnet: np.quantity_per_subnet,
                        subnet_ids: np.subnet_ids.clone(),
                    },
                )
            })
            .collect();

        Self {
            version: spec.version.clone(),
            node_pools,
            vcn_id: spec.vcn_id.clone(),
            lb_subnet_id1: spec.lb_subnet_id1.clone(),
            lb_subnet_id2: spec.lb_subnet_id2.clone(),
        }
    }
}

type PoolKey<'a> = (&'a str, u32, &'a str, &'a str, &'a BTreeMap<String, String>);

// User-facing fields only; network-derived values are ignored.
fn comparable(props: &ClusterProperties) -> (&str, BTreeMap<&str, PoolKey<'_>>) {
    let pools = props
        .node_pools
        .iter()
        .map(|(name, np)| {
            (
                name.as_str(),
                (
                    np.version.as_str(),
                    np.count,
                    np.image.as_str(),
                    np.shape.as_str(),
                    &np.labels,
                ),
            )
        })
        .collect();
    (props.version.as_str(), pools)
}

/// Request to create a new cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateClusterRequest {
    /// Cluster name.
    pub name: String,
    /// Cloud region.
    pub location: String,
    /// Credential secret.
    pub secret_id: String,
    /// SSH key secret.
    #[serde(default)]
    pub ssh_secret_id: Option<String>,
    /// Provider properties.
    pub properties: ClusterProperties,
}

/// Request to update an existing cluster.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateClusterRequest {
    /// Provider properties describing the full desired state.
    pub properties: ClusterProperties,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pools: &[(&str, u32)]) -> ClusterProperties {
        ClusterProperties {
            version: "v1.10.3".to_string(),
            node_pools: pools
                .iter()
                .map(|(name, count)| {
                    (
                        (*name).to_string(),
                        NodePoolProperties {
                            version: "v1.10.3".to_string(),
                            count: *count,
                            image: "Oracle-Linux-7.4".to_string(),
                            shape: "VM.Standard1.1".to_string(),
                            quantity_per_subnet: *count,
                            subnet_ids: vec!["w1".to_string()],
                            ..NodePoolProperties::default()
                        },
                    )
                })
                .collect(),
            ..ClusterProperties::default()
        }
    }

    #[test]
    fn test_add_defaults() {
        let mut p = ClusterProperties {
            version: "v1.11.1".to_string(),
            ..ClusterProperties::default()
        };
        p.node_pools
            .insert("pool1".to_string(), NodePoolProperties::default());
        p.add_defaults(&LifecycleConfig::default());

        let np = &p.node_pools["pool1"];
        assert_eq!(np.image, "Oracle-Linux-7.4");
        assert_eq!(np.version, "v1.11.1");
    }

    #[test]
    fn test_merge_marks_missing_pools_and_adds_new() {
        let stored = props(&[("pool1", 1), ("pool2", 1)]).into_spec(1);
        let update = props(&[("pool1", 5), ("pool3", 1)]);

        let merged = update.merge_into(&stored, 7);

        assert_eq!(merged.node_pools.len(), 3);
        assert_eq!(merged.node_pool("pool1").unwrap().quantity_per_subnet, 5);
        assert!(merged.node_pool("pool2").unwrap().delete);
        let added = merged.node_pool("pool3").unwrap();
        assert_eq!(added.created_by, 7);
        assert!(!added.delete);
        // stored spec untouched
        assert!(!stored.node_pool("pool2").unwrap().delete);
    }

    #[test]
    fn test_check_different() {
        let stored = props(&[("pool1", 1)]).into_spec(1);
        assert!(matches!(
            props(&[("pool1", 1)]).check_different(&stored),
            Err(ClusterError::Validation(_))
        ));
        assert!(props(&[("pool1", 2)]).check_different(&stored).is_ok());
    }

    #[test]
    fn test_properties_from_unplaced_spec_keep_requested_count() {
        let mut requested = props(&[("pool1", 9)]);
        for np in requested.node_pools.values_mut() {
            np.quantity_per_subnet = 0;
            np.subnet_ids.clear();
        }

        let rebuilt = ClusterProperties::from(&requested.into_spec(1));
        assert_eq!(rebuilt.node_pools["pool1"].count, 9);
    }
}
