//! Lifecycle configuration.
//!
//! Every value has a default matching the managed offering's conventions and
//! can be overridden from the environment with [`LifecycleConfig::from_env`].

use serde::{Deserialize, Serialize};

/// Default prefix of derived virtual network names.
pub const DEFAULT_NETWORK_PREFIX: &str = "p-";

/// Default name of the one-time admin cluster role binding.
pub const DEFAULT_ADMIN_BINDING_NAME: &str = "cluster-creator-admin-right";

/// Default cluster role bound to the creator.
pub const DEFAULT_ADMIN_CLUSTER_ROLE: &str = "cluster-admin";

/// Default secret field holding the user identity.
pub const DEFAULT_USER_IDENTITY_FIELD: &str = "user_ocid";

/// Default node image for pools that do not name one.
pub const DEFAULT_NODE_IMAGE: &str = "Oracle-Linux-7.4";

/// Configuration for the lifecycle controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Prefix prepended to the cluster name to form the virtual network name.
    pub network_name_prefix: String,
    /// Name of the cluster role binding created after cluster creation.
    pub admin_binding_name: String,
    /// Cluster role granted to the creator.
    pub admin_cluster_role: String,
    /// Credential field that carries the user identity.
    pub user_identity_field: String,
    /// Image used by node pools with no explicit image.
    pub default_node_image: String,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            network_name_prefix: DEFAULT_NETWORK_PREFIX.to_string(),
            admin_binding_name: DEFAULT_ADMIN_BINDING_NAME.to_string(),
            admin_cluster_role: DEFAULT_ADMIN_CLUSTER_ROLE.to_string(),
            user_identity_field: DEFAULT_USER_IDENTITY_FIELD.to_string(),
            default_node_image: DEFAULT_NODE_IMAGE.to_string(),
        }
    }
}

impl LifecycleConfig {
    /// Build the configuration from defaults overlaid with environment values.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// Empty values are ignored.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = value("OKE_NETWORK_PREFIX") {
            config.network_name_prefix = v;
        }
        if let Some(v) = value("OKE_ADMIN_BINDING_NAME") {
            config.admin_binding_name = v;
        }
        if let Some(v) = value("OKE_ADMIN_CLUSTER_ROLE") {
            config.admin_cluster_role = v;
        }
        if let Some(v) = value("OKE_USER_IDENTITY_FIELD") {
            config.user_identity_field = v;
        }
        if let Some(v) = value("OKE_DEFAULT_NODE_IMAGE") {
            config.default_node_image = v;
        }

        config
    }
}
