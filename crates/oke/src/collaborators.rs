//! Contracts of the external services the lifecycle core drives.
//!
//! Nothing here is implemented by the core itself except
//! [`crate::rbac::KubeClientFactory`]; persistence, secrets and the cloud APIs
//! are supplied by the embedding service.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::rbac::v1::ClusterRoleBinding;
use serde::{Deserialize, Serialize};

use crate::error::{ClusterError, Result, UpstreamError};
use crate::model::{Cluster, ClusterStatus, ProviderSpec};

// ============================================================================
// Persistence and secrets
// ============================================================================

/// Storage of cluster aggregates.
#[async_trait]
pub trait ModelPersistence: Send + Sync {
    /// Load a cluster by id.
    async fn load(&self, id: u64) -> std::result::Result<Cluster, UpstreamError>;

    /// Persist the full aggregate, returning its id.
    async fn save(&self, cluster: &Cluster) -> std::result::Result<u64, UpstreamError>;

    /// Update status and status message.
    async fn update_status(
        &self,
        id: u64,
        status: ClusterStatus,
        message: &str,
    ) -> std::result::Result<(), UpstreamError>;

    /// Update the SSH secret reference.
    async fn update_ssh_secret(
        &self,
        id: u64,
        secret_id: &str,
    ) -> std::result::Result<(), UpstreamError>;

    /// Update the kubeconfig secret reference.
    async fn update_config_secret(
        &self,
        id: u64,
        secret_id: &str,
    ) -> std::result::Result<(), UpstreamError>;

    /// Delete the aggregate and its provider-specific rows.
    async fn delete(&self, id: u64) -> std::result::Result<(), UpstreamError>;
}

/// A validated secret.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretItem {
    /// Secret id.
    pub id: String,
    /// Secret name.
    pub name: String,
    /// Key/value bundle.
    pub values: BTreeMap<String, String>,
}

impl SecretItem {
    /// Value of a field, treating empty strings as missing.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// Secret storage.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch a secret and validate it against its type.
    async fn get_validated(&self, secret_id: &str) -> std::result::Result<SecretItem, UpstreamError>;
}

// ============================================================================
// Cloud clients
// ============================================================================

/// Secret field names of an Oracle credential.
pub mod secret_keys {
    pub const USER_OCID: &str = "user_ocid";
    pub const TENANCY_OCID: &str = "tenancy_ocid";
    pub const API_KEY: &str = "api_key";
    pub const API_KEY_FINGERPRINT: &str = "api_key_fingerprint";
    pub const REGION: &str = "region";
    pub const COMPARTMENT_OCID: &str = "compartment_ocid";
}

/// Oracle cloud API credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct OciCredentials {
    pub user_ocid: String,
    pub tenancy_ocid: String,
    pub api_key: String,
    pub api_key_fingerprint: String,
    pub region: String,
    pub compartment_ocid: String,
}

impl std::fmt::Debug for OciCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OciCredentials")
            .field("user_ocid", &self.user_ocid)
            .field("tenancy_ocid", &self.tenancy_ocid)
            .field("api_key", &"<redacted>")
            .field("api_key_fingerprint", &self.api_key_fingerprint)
            .field("region", &self.region)
            .field("compartment_ocid", &self.compartment_ocid)
            .finish()
    }
}

impl OciCredentials {
    /// Map a credential secret to API credentials.
    ///
    /// # Errors
    /// Returns [`ClusterError::Validation`] if the user, tenancy or key
    /// fields are missing.
    pub fn from_secret(secret: &SecretItem) -> Result<Self> {
        let required = |key: &str| {
            secret
                .value(key)
                .map(ToString::to_string)
                .ok_or_else(|| ClusterError::Validation(format!("empty {key} in secret")))
        };
        let optional = |key: &str| secret.value(key).unwrap_or_default().to_string();

        Ok(Self {
            user_ocid: required(secret_keys::USER_OCID)?,
            tenancy_ocid: required(secret_keys::TENANCY_OCID)?,
            api_key: required(secret_keys::API_KEY)?,
            api_key_fingerprint: required(secret_keys::API_KEY_FINGERPRINT)?,
            region: optional(secret_keys::REGION),
            compartment_ocid: optional(secret_keys::COMPARTMENT_OCID),
        })
    }
}

/// A cloud API client bound to one region.
pub trait CloudClient: Send + Sync {
    /// Current region.
    fn region(&self) -> &str;

    /// Switch the client to another region.
    ///
    /// # Errors
    /// Returns the upstream error if the region is not usable.
    fn change_region(&mut self, region: &str) -> std::result::Result<(), UpstreamError>;

    /// Container engine API.
    fn container_engine(&self) -> Arc<dyn ContainerEngineManager>;

    /// Virtual network API.
    fn network(&self) -> Arc<dyn NetworkManager>;
}

/// Builds cloud clients from credentials.
#[async_trait]
pub trait CloudClientFactory: Send + Sync {
    /// Create a client in the credentials' home region.
    async fn connect(
        &self,
        credentials: &OciCredentials,
    ) -> std::result::Result<Box<dyn CloudClient>, UpstreamError>;
}

// ============================================================================
// Container engine
// ============================================================================

/// Live cluster as reported by the container engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineCluster {
    /// Engine cluster id.
    pub id: String,
    /// Lifecycle state, e.g. `ACTIVE`.
    pub lifecycle_state: String,
    /// Kubernetes API endpoint host.
    pub endpoint: Option<String>,
    /// Kubernetes version.
    pub version: String,
}

/// Live lifecycle state of a ready cluster.
pub const LIFECYCLE_STATE_ACTIVE: &str = "ACTIVE";

impl EngineCluster {
    /// Whether the engine reports the cluster as active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.lifecycle_state == LIFECYCLE_STATE_ACTIVE
    }
}

/// Converges a declared cluster spec into running infrastructure.
///
/// `apply` must be atomic per call: either the whole spec converged or an
/// error is returned.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContainerEngineManager: Send + Sync {
    /// Check the spec against the engine's constraints.
    async fn validate(&self, spec: &ProviderSpec) -> std::result::Result<(), UpstreamError>;

    /// Create, update or (with `spec.delete`) tear down the cluster.
    ///
    /// Sets `spec.ocid` when the cluster is created.
    async fn apply(&self, spec: &mut ProviderSpec) -> std::result::Result<(), UpstreamError>;

    /// Query the live cluster.
    async fn get_cluster(&self, id: &str) -> std::result::Result<EngineCluster, UpstreamError>;

    /// Download the cluster kubeconfig.
    async fn get_kubeconfig(&self, id: &str) -> std::result::Result<Vec<u8>, UpstreamError>;
}

// ============================================================================
// Network
// ============================================================================

/// A virtual cloud network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualNetwork {
    /// Network id, missing if the provider did not return one.
    pub id: Option<String>,
    /// Display name.
    pub name: String,
}

/// Subnet inventory of a virtual network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkValues {
    /// Load balancer subnets.
    pub lb_subnet_ids: Vec<String>,
    /// Worker node subnets.
    pub worker_subnet_ids: Vec<String>,
}

/// Virtual network API.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NetworkManager: Send + Sync {
    /// Create a preconfigured virtual network.
    async fn create(&self, name: &str) -> std::result::Result<VirtualNetwork, UpstreamError>;

    /// Delete a virtual network and its subnets.
    async fn delete(&self, id: &str) -> std::result::Result<(), UpstreamError>;

    /// List the subnets of a network.
    async fn describe_subnets(&self, id: &str)
        -> std::result::Result<NetworkValues, UpstreamError>;
}

// ============================================================================
// Kubernetes
// ============================================================================

/// RBAC operations on a workload cluster.
#[async_trait]
pub trait RbacClient: Send + Sync {
    /// Create a cluster role binding.
    async fn create_cluster_role_binding(
        &self,
        binding: &ClusterRoleBinding,
    ) -> std::result::Result<(), UpstreamError>;
}

/// Builds Kubernetes clients from kubeconfig bytes.
#[async_trait]
pub trait KubernetesClientFactory: Send + Sync {
    /// Connect to the cluster described by `kubeconfig`.
    async fn connect(
        &self,
        kubeconfig: &[u8],
    ) -> std::result::Result<Box<dyn RbacClient>, UpstreamError>;
}
