//! Cluster-admin role binding for the cluster creator.

use async_trait::async_trait;
use k8s_openapi::api::rbac::v1::{ClusterRoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::debug;

use crate::collaborators::{KubernetesClientFactory, RbacClient};
use crate::error::UpstreamError;

/// API group of RBAC objects.
pub const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

/// Build a binding granting `cluster_role` to the user `user`.
#[must_use]
pub fn cluster_admin_binding(name: &str, user: &str, cluster_role: &str) -> ClusterRoleBinding {
    ClusterRoleBinding {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..ObjectMeta::default()
        },
        subjects: Some(vec![Subject {
            kind: "User".to_string(),
            name: user.to_string(),
            api_group: Some(RBAC_API_GROUP.to_string()),
            namespace: None,
        }]),
        role_ref: RoleRef {
            kind: "ClusterRole".to_string(),
            name: cluster_role.to_string(),
            api_group: RBAC_API_GROUP.to_string(),
        },
    }
}

/// [`KubernetesClientFactory`] backed by kube-rs.
#[derive(Clone, Default)]
pub struct KubeClientFactory {
    options: KubeConfigOptions,
}

impl KubeClientFactory {
    /// Factory using the kubeconfig's current context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory selecting an explicit context.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.options.context = Some(context.into());
        self
    }
}

#[async_trait]
impl KubernetesClientFactory for KubeClientFactory {
    async fn connect(&self, kubeconfig: &[u8]) -> Result<Box<dyn RbacClient>, UpstreamError> {
        let yaml = std::str::from_utf8(kubeconfig)?;
        let kubeconfig = Kubeconfig::from_yaml(yaml)?;
        let config = Config::from_custom_kubeconfig(kubeconfig, &self.options).await?;
        let client = Client::try_from(config)?;

        Ok(Box::new(KubeRbacClient { client }))
    }
}

struct KubeRbacClient {
    client: Client,
}

#[async_trait]
impl RbacClient for KubeRbacClient {
    async fn create_cluster_role_binding(
        &self,
        binding: &ClusterRoleBinding,
    ) -> Result<(), UpstreamError> {
        debug!(binding = ?binding.metadata.name, "Creating cluster role binding");
        let api: Api<ClusterRoleBinding> = Api::all(self.client.clone());
        api.create(&PostParams::default(), binding).await?;
        Ok(())
    }
}
