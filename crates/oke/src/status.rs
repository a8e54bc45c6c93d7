//! Read-only status and detail views of a cluster.
//!
//! Pool sizes are recomputed from the stored spec on every call; they are
//! never read back from the cloud, so they go stale if the pool is resized
//! outside this service.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::collaborators::EngineCluster;
use crate::error::{ClusterError, Result};
use crate::model::{Cluster, ClusterStatus, NodePool};

/// Creation metadata shared by several views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatorBaseFields {
    pub created_at: DateTime<Utc>,
    pub created_by: u64,
}

/// Node pool entry of [`ClusterStatusResponse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePoolStatus {
    pub count: u32,
    pub autoscaling: bool,
    pub min_count: u32,
    pub max_count: u32,
    pub instance_type: String,
    pub image: String,
    pub version: String,
}

/// Cluster status built from persisted state only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterStatusResponse {
    pub status: ClusterStatus,
    pub status_message: String,
    pub name: String,
    pub location: String,
    pub cloud: String,
    pub distribution: String,
    pub version: String,
    pub resource_id: u64,
    #[serde(flatten)]
    pub creator: CreatorBaseFields,
    pub node_pools: BTreeMap<String, NodePoolStatus>,
}

/// Node pool entry of [`ClusterDetailsResponse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDetails {
    #[serde(flatten)]
    pub creator: CreatorBaseFields,
    pub version: String,
    pub count: u32,
    pub min_count: u32,
    pub max_count: u32,
}

/// Cluster details, enriched with the live cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterDetailsResponse {
    #[serde(flatten)]
    pub creator: CreatorBaseFields,
    pub name: String,
    pub id: u64,
    pub location: String,
    pub master_version: String,
    pub endpoint: Option<String>,
    pub node_pools: BTreeMap<String, NodeDetails>,
    pub status: ClusterStatus,
}

/// Builds status views from a snapshot of the aggregate.
pub struct StatusProjector;

impl StatusProjector {
    /// Status from persisted state.
    #[must_use]
    pub fn status(cluster: &Cluster) -> ClusterStatusResponse {
        let node_pools = live_pools(cluster)
            .map(|np| {
                let count = np.node_count();
                (
                    np.name.clone(),
                    NodePoolStatus {
                        count,
                        autoscaling: false,
                        min_count: count,
                        max_count: count,
                        instance_type: np.shape.clone(),
                        image: np.image.clone(),
                        version: np.version.clone(),
                    },
                )
            })
            .collect();

        ClusterStatusResponse {
            status: cluster.status,
            status_message: cluster.status_message.clone(),
            name: cluster.name.clone(),
            location: cluster.location.clone(),
            cloud: cluster.cloud.clone(),
            distribution: cluster.distribution.clone(),
            version: cluster.spec.version.clone(),
            resource_id: cluster.id,
            creator: CreatorBaseFields {
                created_at: cluster.created_at,
                created_by: cluster.created_by,
            },
            node_pools,
        }
    }

    /// Details of an active cluster.
    ///
    /// # Errors
    /// Returns [`ClusterError::ClusterNotReady`] unless `live` is `ACTIVE`.
    pub fn details(cluster: &Cluster, live: &EngineCluster) -> Result<ClusterDetailsResponse> {
        if !live.is_active() {
            return Err(ClusterError::ClusterNotReady {
                state: live.lifecycle_state.clone(),
            });
        }

        let node_pools = live_pools(cluster)
            .map(|np| {
                let count = np.node_count();
                (
                    np.name.clone(),
                    NodeDetails {
                        creator: CreatorBaseFields {
                            created_at: np.created_at,
                            created_by: np.created_by,
                        },
                        version: np.version.clone(),
                        count,
                        min_count: count,
                        max_count: count,
                    },
                )
            })
            .collect();

        let master_version = if live.version.is_empty() {
            cluster.spec.version.clone()
        } else {
            live.version.clone()
        };

        Ok(ClusterDetailsResponse {
            creator: CreatorBaseFields {
                created_at: cluster.created_at,
                created_by: cluster.created_by,
            },
            name: cluster.name.clone(),
            id: cluster.id,
            location: cluster.location.clone(),
            master_version,
            endpoint: live.endpoint.as_deref().map(https_endpoint),
            node_pools,
            status: cluster.status,
        })
    }
}

/// Format an endpoint host as an HTTPS URL.
#[must_use]
pub fn https_endpoint(host: &str) -> String {
    format!("https://{host}")
}

fn live_pools(cluster: &Cluster) -> impl Iterator<Item = &NodePool> {
    cluster.spec.node_pools.iter().filter(|np| !np.delete)
}
