//! Cluster aggregate and provider-specific spec.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ClusterError, Result};

/// Cloud name reported for every cluster managed by this crate.
pub const CLOUD_ORACLE: &str = "oracle";

/// Distribution name of the managed offering.
pub const DISTRIBUTION_OKE: &str = "oke";

/// Lifecycle status of the cluster aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterStatus {
    /// Accepted but not yet submitted.
    Requested,
    /// Network and compute are being provisioned.
    Creating,
    /// Cluster is up.
    Active,
    /// The last operation failed.
    Error,
    /// An update is being applied.
    Updating,
    /// Compute and network are being torn down.
    Deleting,
    /// Torn down and removed from persistence.
    Deleted,
}

impl std::fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Requested => write!(f, "REQUESTED"),
            Self::Creating => write!(f, "CREATING"),
            Self::Active => write!(f, "ACTIVE"),
            Self::Error => write!(f, "ERROR"),
            Self::Updating => write!(f, "UPDATING"),
            Self::Deleting => write!(f, "DELETING"),
            Self::Deleted => write!(f, "DELETED"),
        }
    }
}

impl ClusterStatus {
    /// Whether the status may move to `next`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use ClusterStatus::{Active, Creating, Deleted, Deleting, Error, Requested, Updating};

        match self {
            Requested => matches!(next, Creating | Deleting),
            Creating => matches!(next, Active | Error | Deleting),
            Active => matches!(next, Updating | Deleting),
            Error => matches!(next, Creating | Updating | Deleting),
            Updating => matches!(next, Active | Error | Deleting),
            Deleting => matches!(next, Deleted | Error),
            Deleted => false,
        }
    }

    /// Validate a transition, returning the new status.
    ///
    /// # Errors
    /// Returns [`ClusterError::InvalidTransition`] if the move is not allowed.
    pub fn transition(self, next: Self) -> Result<Self> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(ClusterError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

/// A homogeneous group of worker instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePool {
    /// Pool name, unique within the cluster.
    pub name: String,
    /// Compute shape.
    pub shape: String,
    /// Node image.
    pub image: String,
    /// Kubernetes version of the nodes.
    pub version: String,
    /// Requested total instance count.
    #[serde(default)]
    pub count: u32,
    /// Instances placed in each assigned subnet.
    pub quantity_per_subnet: u32,
    /// Worker subnets the pool spans.
    pub subnet_ids: Vec<String>,
    /// Node labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// When the pool was added.
    pub created_at: DateTime<Utc>,
    /// User that added the pool.
    pub created_by: u64,
    /// Marked for removal on the next successful apply.
    #[serde(default)]
    pub delete: bool,
}

impl NodePool {
    /// Total instance count: quantity per subnet times assigned subnets.
    #[must_use]
    pub fn node_count(&self) -> u32 {
        let subnets = u32::try_from(self.subnet_ids.len()).unwrap_or(u32::MAX);
        self.quantity_per_subnet.saturating_mul(subnets)
    }

    /// Count to place on the next apply. Rows written before the requested
    /// count was stored fall back to the placed count.
    #[must_use]
    pub fn requested_count(&self) -> u32 {
        if self.count > 0 {
            self.count
        } else {
            self.node_count()
        }
    }
}

/// Provider-specific part of the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSpec {
    /// Container engine cluster id, assigned on first apply.
    pub ocid: Option<String>,
    /// Kubernetes version of the control plane.
    pub version: String,
    /// Virtual cloud network id.
    pub vcn_id: String,
    /// First load balancer subnet.
    pub lb_subnet_id1: String,
    /// Second load balancer subnet.
    pub lb_subnet_id2: String,
    /// Node pools, ordered by name.
    pub node_pools: Vec<NodePool>,
    /// Request teardown on the next apply.
    #[serde(default)]
    pub delete: bool,
}

impl ProviderSpec {
    /// Drop every pool flagged pending delete.
    pub fn remove_pending_deletes(&mut self) {
        self.node_pools.retain(|np| !np.delete);
    }

    /// Look up a pool by name.
    #[must_use]
    pub fn node_pool(&self, name: &str) -> Option<&NodePool> {
        self.node_pools.iter().find(|np| np.name == name)
    }
}

/// The cluster aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    /// Persistence id, 0 until first saved.
    pub id: u64,
    /// Globally unique id.
    pub uid: String,
    /// Owning organization.
    pub organization_id: u64,
    /// Creating user.
    pub created_by: u64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Cluster name.
    pub name: String,
    /// Cloud region.
    pub location: String,
    /// Cloud name.
    pub cloud: String,
    /// Distribution name.
    pub distribution: String,
    /// Lifecycle status.
    pub status: ClusterStatus,
    /// Human-readable status detail.
    pub status_message: String,
    /// Credential secret.
    pub secret_id: String,
    /// SSH key secret.
    pub ssh_secret_id: Option<String>,
    /// Kubeconfig secret.
    pub config_secret_id: Option<String>,
    /// Cached Kubernetes API endpoint.
    #[serde(skip)]
    pub api_endpoint: Option<String>,
    /// Provider-specific spec.
    pub spec: ProviderSpec,
}

/// Access to the credential references of a cluster.
pub trait HasSecret {
    /// Credential secret id.
    fn secret_id(&self) -> &str;
    /// SSH key secret id, if any.
    fn ssh_secret_id(&self) -> Option<&str>;
}

/// Access to the network placement of a cluster.
pub trait HasNetwork {
    /// Cloud region.
    fn location(&self) -> &str;
    /// Virtual cloud network id.
    fn vcn_id(&self) -> &str;
}

/// Access to the kubeconfig of a cluster.
pub trait HasKubeconfig {
    /// Container engine cluster id.
    fn engine_id(&self) -> Option<&str>;
    /// Kubeconfig secret id, if any.
    fn config_secret_id(&self) -> Option<&str>;
}

impl HasSecret for Cluster {
    fn secret_id(&self) -> &str {
        &self.secret_id
    }

    fn ssh_secret_id(&self) -> Option<&str> {
        self.ssh_secret_id.as_deref()
    }
}

impl HasNetwork for Cluster {
    fn location(&self) -> &str {
        &self.location
    }

    fn vcn_id(&self) -> &str {
        &self.spec.vcn_id
    }
}

impl HasKubeconfig for Cluster {
    fn engine_id(&self) -> Option<&str> {
        self.spec.ocid.as_deref()
    }

    fn config_secret_id(&self) -> Option<&str> {
        self.config_secret_id.as_deref()
    }
}
