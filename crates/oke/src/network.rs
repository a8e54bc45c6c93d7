//! Virtual network provisioning and worker subnet distribution.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::collaborators::NetworkManager;
use crate::error::{ClusterError, Result, Stage, StageExt};
use crate::request::ClusterProperties;

/// Number of load balancer subnets a cluster network must expose.
pub const LB_SUBNET_COUNT: usize = 2;

/// Minimum number of worker subnets needed to place a node pool.
pub const MIN_WORKER_SUBNETS: usize = 3;

/// Placement of a node pool over worker subnets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribution {
    /// Instances in each assigned subnet.
    pub quantity_per_subnet: u32,
    /// Assigned subnets.
    pub subnet_ids: Vec<String>,
}

impl Distribution {
    /// Whether the count could not be placed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subnet_ids.is_empty()
    }

    /// Total instances placed.
    #[must_use]
    pub fn total(&self) -> u32 {
        let subnets = u32::try_from(self.subnet_ids.len()).unwrap_or(u32::MAX);
        self.quantity_per_subnet.saturating_mul(subnets)
    }
}

/// Split `count` instances evenly over the first 3, 2 or 1 worker subnets.
///
/// Three subnets are used when `count` divides by 3, otherwise two when it
/// divides by 2, otherwise one subnet takes everything. An empty distribution
/// is returned for a zero count or when fewer than three worker subnets exist.
#[must_use]
pub fn distribute(count: u32, worker_subnet_ids: &[String]) -> Distribution {
    if count == 0 || worker_subnet_ids.len() < MIN_WORKER_SUBNETS {
        return Distribution::default();
    }

    let (quantity_per_subnet, width) = if count % 3 == 0 {
        (count / 3, 3)
    } else if count % 2 == 0 {
        (count / 2, 2)
    } else {
        (count, 1)
    };

    Distribution {
        quantity_per_subnet,
        subnet_ids: worker_subnet_ids[..width].to_vec(),
    }
}

/// Creates, describes and deletes the cluster's virtual network.
#[derive(Clone)]
pub struct NetworkProvisioner {
    manager: Arc<dyn NetworkManager>,
    name_prefix: String,
}

impl NetworkProvisioner {
    /// Create a provisioner over a network API.
    pub fn new(manager: Arc<dyn NetworkManager>, name_prefix: impl Into<String>) -> Self {
        Self {
            manager,
            name_prefix: name_prefix.into(),
        }
    }

    /// Create the cluster's virtual network, returning its id.
    ///
    /// # Errors
    /// Returns [`ClusterError::Resource`] if the created network has no id,
    /// or the upstream error labelled [`Stage::NetworkCreate`].
    pub async fn create_virtual_network(&self, cluster_name: &str) -> Result<String> {
        let name = format!("{}{cluster_name}", self.name_prefix);
        info!(network = %name, "Creating virtual network");

        let vcn = self
            .manager
            .create(&name)
            .await
            .stage(Stage::NetworkCreate)?;

        let id = vcn
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ClusterError::Resource(format!("virtual network {name} has no id")))?;

        info!(network = %name, vcn_id = %id, "Virtual network created");
        Ok(id)
    }

    /// Delete a virtual network.
    ///
    /// # Errors
    /// Returns the upstream error labelled [`Stage::NetworkDelete`].
    pub async fn delete_virtual_network(&self, vcn_id: &str) -> Result<()> {
        info!(vcn_id = %vcn_id, "Deleting virtual network");
        self.manager
            .delete(vcn_id)
            .await
            .stage(Stage::NetworkDelete)?;
        info!(vcn_id = %vcn_id, "Virtual network deleted");
        Ok(())
    }

    /// Fill the network id, load balancer subnets and per-pool placement.
    ///
    /// # Errors
    /// Returns [`ClusterError::Config`] unless the network has exactly two
    /// load balancer subnets, or the upstream error labelled
    /// [`Stage::NetworkPopulate`].
    pub async fn populate_network_values(
        &self,
        properties: &mut ClusterProperties,
        vcn_id: &str,
    ) -> Result<()> {
        let values = self
            .manager
            .describe_subnets(vcn_id)
            .await
            .stage(Stage::NetworkPopulate)?;

        debug!(
            vcn_id = %vcn_id,
            lb_subnets = values.lb_subnet_ids.len(),
            worker_subnets = values.worker_subnet_ids.len(),
            "Described network subnets"
        );

        properties.vcn_id = vcn_id.to_string();

        let [lb1, lb2] = values.lb_subnet_ids.as_slice() else {
            return Err(ClusterError::Config(format!(
                "there must be {LB_SUBNET_COUNT} loadbalancer subnets, found {}",
                values.lb_subnet_ids.len()
            )));
        };
        properties.lb_subnet_id1.clone_from(lb1);
        properties.lb_subnet_id2.clone_from(lb2);

        for (name, np) in &mut properties.node_pools {
            let placement = distribute(np.count, &values.worker_subnet_ids);
            if placement.is_empty() && np.count > 0 {
                warn!(
                    node_pool = %name,
                    count = np.count,
                    worker_subnets = values.worker_subnet_ids.len(),
                    "Node pool count is not distributable"
                );
            }
            np.quantity_per_subnet = placement.quantity_per_subnet;
            np.subnet_ids = placement.subnet_ids;
        }

        Ok(())
    }
}
