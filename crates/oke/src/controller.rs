//! Cluster lifecycle controller.
//!
//! Drives one cluster aggregate through create, update and delete. Every
//! step runs strictly in sequence and the first failure aborts the operation;
//! nothing is retried or rolled back. A failure after the virtual network was
//! created leaves that network in place.

use std::sync::Arc;

use base64::Engine as _;
use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::collaborators::{
    CloudClient, CloudClientFactory, ContainerEngineManager, KubernetesClientFactory,
    ModelPersistence, OciCredentials, SecretStore,
};
use crate::config::LifecycleConfig;
use crate::error::{ClusterError, Result, Stage, StageExt};
use crate::model::{
    Cluster, ClusterStatus, HasKubeconfig, HasNetwork, HasSecret, CLOUD_ORACLE, DISTRIBUTION_OKE,
};
use crate::network::NetworkProvisioner;
use crate::rbac::cluster_admin_binding;
use crate::request::{ClusterProperties, CreateClusterRequest, UpdateClusterRequest};
use crate::status::{https_endpoint, ClusterDetailsResponse, ClusterStatusResponse, StatusProjector};

/// Secret field holding a base64 encoded kubeconfig.
pub const KUBECONFIG_SECRET_FIELD: &str = "K8Sconfig";

/// External services used by the controller.
#[derive(Clone)]
pub struct Dependencies {
    /// Cluster storage.
    pub persistence: Arc<dyn ModelPersistence>,
    /// Secret storage.
    pub secrets: Arc<dyn SecretStore>,
    /// Cloud API client factory.
    pub cloud: Arc<dyn CloudClientFactory>,
    /// Kubernetes client factory.
    pub kubernetes: Arc<dyn KubernetesClientFactory>,
    /// Lifecycle settings.
    pub config: LifecycleConfig,
}

/// Owns one cluster aggregate for the duration of a lifecycle operation.
pub struct ClusterLifecycleController {
    cluster: Cluster,
    requested: Option<ClusterProperties>,
    deps: Dependencies,
}

impl ClusterLifecycleController {
    /// Build a new cluster from a create request.
    ///
    /// No upstream calls are made; the cluster starts as
    /// [`ClusterStatus::Requested`].
    #[must_use]
    pub fn from_request(
        request: CreateClusterRequest,
        organization_id: u64,
        user_id: u64,
        deps: Dependencies,
    ) -> Self {
        debug!(cluster = %request.name, "Create cluster model from the request");

        let mut properties = request.properties;
        properties.add_defaults(&deps.config);

        let cluster = Cluster {
            id: 0,
            uid: uuid::Uuid::new_v4().to_string(),
            organization_id,
            created_by: user_id,
            created_at: Utc::now(),
            name: request.name,
            location: request.location,
            cloud: CLOUD_ORACLE.to_string(),
            distribution: DISTRIBUTION_OKE.to_string(),
            status: ClusterStatus::Requested,
            status_message: String::new(),
            secret_id: request.secret_id,
            ssh_secret_id: request.ssh_secret_id,
            config_secret_id: None,
            api_endpoint: None,
            spec: properties.clone().into_spec(user_id),
        };

        Self {
            cluster,
            requested: Some(properties),
            deps,
        }
    }

    /// Wrap an already persisted cluster.
    #[must_use]
    pub fn from_model(cluster: Cluster, deps: Dependencies) -> Self {
        Self {
            cluster,
            requested: None,
            deps,
        }
    }

    /// Load a persisted cluster by id.
    ///
    /// # Errors
    /// Returns the upstream error labelled [`Stage::LoadCluster`].
    pub async fn load(id: u64, deps: Dependencies) -> Result<Self> {
        let cluster = deps.persistence.load(id).await.stage(Stage::LoadCluster)?;
        Ok(Self::from_model(cluster, deps))
    }

    // ========================================================================
    // Lifecycle operations
    // ========================================================================

    /// Provision the network, apply the cluster and grant the creator admin
    /// rights.
    ///
    /// The network id is persisted as soon as the network exists, and a
    /// network already recorded on the cluster is reused, so a failed create
    /// can be retried from a reloaded aggregate.
    ///
    /// # Errors
    /// Returns the first failing step's error. Nothing is rolled back.
    pub async fn create_cluster(&mut self) -> Result<()> {
        info!(cluster = %self.cluster.name, location = %self.cluster.location, "Start creating Oracle cluster");

        if self.cluster.id == 0 {
            self.persist().await?;
        }
        self.transition(ClusterStatus::Creating, "creating cluster")
            .await?;

        let client = connect(&self.deps, &self.cluster).await?;
        let network = self.network_provisioner(client.as_ref());

        let vcn_id = if self.cluster.vcn_id().is_empty() {
            let vcn_id = network.create_virtual_network(&self.cluster.name).await?;
            self.cluster.spec.vcn_id.clone_from(&vcn_id);
            self.persist().await?;
            vcn_id
        } else {
            info!(cluster = %self.cluster.name, vcn_id = %self.cluster.vcn_id(), "Reusing virtual network");
            self.cluster.vcn_id().to_string()
        };

        let mut properties = self
            .requested
            .clone()
            .unwrap_or_else(|| ClusterProperties::from(&self.cluster.spec));
        if let Err(e) = network
            .populate_network_values(&mut properties, &vcn_id)
            .await
        {
            error!(cluster = %self.cluster.name, vcn_id = %vcn_id, "Virtual network left in place");
            return Err(e);
        }

        let mut desired = properties.into_spec(self.cluster.created_by);
        desired.ocid.clone_from(&self.cluster.spec.ocid);

        let engine = client.container_engine();
        if let Err(e) = engine.apply(&mut desired).await {
            error!(cluster = %self.cluster.name, vcn_id = %vcn_id, "Virtual network left in place");
            return Err(ClusterError::upstream(Stage::EngineApply, e));
        }

        self.cluster.spec = desired;
        self.requested = None;
        self.persist().await?;

        self.set_cluster_admin_rights(engine.as_ref()).await?;

        info!(cluster = %self.cluster.name, id = self.cluster.id, "Oracle cluster created");
        Ok(())
    }

    /// Apply an update against the existing network.
    ///
    /// Pools missing from the request are removed only after the engine
    /// accepted the full desired spec.
    ///
    /// # Errors
    /// Returns the first failing step's error; the stored spec is left
    /// unchanged in that case.
    pub async fn update_cluster(&mut self, request: UpdateClusterRequest, user_id: u64) -> Result<()> {
        info!(cluster = %self.cluster.name, user_id, "Start updating Oracle cluster");

        self.transition(ClusterStatus::Updating, "updating cluster")
            .await?;

        let client = connect(&self.deps, &self.cluster).await?;
        let network = self.network_provisioner(client.as_ref());

        let mut properties = request.properties;
        network
            .populate_network_values(&mut properties, self.cluster.vcn_id())
            .await?;

        let mut desired = properties.merge_into(&self.cluster.spec, user_id);
        client
            .container_engine()
            .apply(&mut desired)
            .await
            .stage(Stage::EngineApply)?;

        desired.remove_pending_deletes();
        self.cluster.spec = desired;
        self.persist().await?;

        info!(cluster = %self.cluster.name, node_pools = self.cluster.spec.node_pools.len(), "Oracle cluster updated");
        Ok(())
    }

    /// Tear down the cluster's compute, then its virtual network.
    ///
    /// The persisted row is kept; remove it with
    /// [`Self::delete_from_database`].
    ///
    /// # Errors
    /// Returns the first failing step's error.
    pub async fn delete_cluster(&mut self) -> Result<()> {
        info!(cluster = %self.cluster.name, "Start deleting Oracle cluster");

        self.transition(ClusterStatus::Deleting, "deleting cluster")
            .await?;

        let client = connect(&self.deps, &self.cluster).await?;

        let mut teardown = self.cluster.spec.clone();
        teardown.delete = true;
        client
            .container_engine()
            .apply(&mut teardown)
            .await
            .stage(Stage::EngineApply)?;
        self.cluster.spec = teardown;

        let vcn_id = self.cluster.vcn_id().to_string();
        if vcn_id.is_empty() {
            warn!(cluster = %self.cluster.name, "Cluster has no virtual network to delete");
        } else {
            self.network_provisioner(client.as_ref())
                .delete_virtual_network(&vcn_id)
                .await?;
        }

        info!(cluster = %self.cluster.name, "Oracle cluster deleted");
        Ok(())
    }

    /// Remove the aggregate and its provider rows from persistence.
    ///
    /// # Errors
    /// Returns [`ClusterError::InvalidTransition`] unless the cluster is
    /// being deleted, or the upstream error labelled [`Stage::DeleteCluster`].
    pub async fn delete_from_database(&mut self) -> Result<()> {
        let next = self.cluster.status.transition(ClusterStatus::Deleted)?;
        self.deps
            .persistence
            .delete(self.cluster.id)
            .await
            .stage(Stage::DeleteCluster)?;

        self.cluster.status = next;
        self.cluster.status_message = "cluster deleted".to_string();
        info!(cluster = %self.cluster.name, id = self.cluster.id, "Cluster removed from database");
        Ok(())
    }

    // ========================================================================
    // Views
    // ========================================================================

    /// Status from persisted state; makes no upstream call.
    #[must_use]
    pub fn get_status(&self) -> ClusterStatusResponse {
        StatusProjector::status(&self.cluster)
    }

    /// Details of the live cluster.
    ///
    /// # Errors
    /// Returns [`ClusterError::ClusterNotReady`] unless the engine reports the
    /// cluster `ACTIVE`, or any upstream error.
    pub async fn get_cluster_details(&self) -> Result<ClusterDetailsResponse> {
        let client = connect(&self.deps, &self.cluster).await?;
        let engine_id = engine_id(&self.cluster)?;
        let live = client
            .container_engine()
            .get_cluster(engine_id)
            .await
            .stage(Stage::EngineQuery)?;

        StatusProjector::details(&self.cluster, &live)
    }

    /// Kubernetes API endpoint as an HTTPS URL, cached after the first query.
    ///
    /// # Errors
    /// Returns [`ClusterError::Resource`] if the engine reports no endpoint,
    /// or any upstream error.
    pub async fn get_api_endpoint(&mut self) -> Result<String> {
        if let Some(endpoint) = &self.cluster.api_endpoint {
            return Ok(endpoint.clone());
        }

        let client = connect(&self.deps, &self.cluster).await?;
        let engine_id = engine_id(&self.cluster)?;
        let live = client
            .container_engine()
            .get_cluster(engine_id)
            .await
            .stage(Stage::EngineQuery)?;

        let host = live.endpoint.ok_or_else(|| {
            ClusterError::Resource(format!("cluster {engine_id} has no kubernetes endpoint"))
        })?;
        let endpoint = https_endpoint(&host);
        self.cluster.api_endpoint = Some(endpoint.clone());

        Ok(endpoint)
    }

    // ========================================================================
    // Validation
    // ========================================================================

    /// Ask the container engine to validate the desired spec.
    ///
    /// # Errors
    /// Returns the upstream error labelled [`Stage::EngineValidate`].
    pub async fn validate_creation_fields(&self) -> Result<()> {
        let client = connect(&self.deps, &self.cluster).await?;
        client
            .container_engine()
            .validate(&self.cluster.spec)
            .await
            .stage(Stage::EngineValidate)
    }

    /// Reject an update that would not change anything.
    ///
    /// # Errors
    /// Returns [`ClusterError::Validation`] when the request matches the
    /// stored cluster.
    pub fn check_equality_to_update(&self, request: &UpdateClusterRequest) -> Result<()> {
        info!(cluster = %self.cluster.name, "Check stored & updated cluster equals");
        request.properties.check_different(&self.cluster.spec)
    }

    /// Fill node pool defaults in an update request.
    pub fn add_defaults_to_update(&self, request: &mut UpdateClusterRequest) {
        request.properties.add_defaults(&self.deps.config);
    }

    // ========================================================================
    // Kubeconfig
    // ========================================================================

    /// Download the kubeconfig from the container engine.
    ///
    /// # Errors
    /// Returns any upstream error.
    pub async fn download_kubeconfig(&self) -> Result<Vec<u8>> {
        let client = connect(&self.deps, &self.cluster).await?;
        download(client.container_engine().as_ref(), &self.cluster).await
    }

    /// Kubeconfig from the config secret, or downloaded if none is recorded.
    ///
    /// # Errors
    /// Returns [`ClusterError::Validation`] for a malformed secret, or any
    /// upstream error.
    pub async fn k8s_config(&self) -> Result<Vec<u8>> {
        if self.cluster.config_secret_id().is_some() {
            return kubeconfig_from_secret(&self.deps, &self.cluster).await;
        }
        self.download_kubeconfig().await
    }

    // ========================================================================
    // Persistence helpers
    // ========================================================================

    /// Record a status reported for the cluster, typically the terminal
    /// `Active` or `Error` reported by the container engine manager.
    ///
    /// # Errors
    /// Returns [`ClusterError::InvalidTransition`] or the upstream error.
    pub async fn record_status(&mut self, status: ClusterStatus, message: &str) -> Result<()> {
        self.transition(status, message).await
    }

    /// Store the SSH secret reference.
    ///
    /// # Errors
    /// Returns the upstream error labelled [`Stage::PersistCluster`].
    pub async fn save_ssh_secret_id(&mut self, secret_id: &str) -> Result<()> {
        self.deps
            .persistence
            .update_ssh_secret(self.cluster.id, secret_id)
            .await
            .stage(Stage::PersistCluster)?;
        self.cluster.ssh_secret_id = Some(secret_id.to_string());
        Ok(())
    }

    /// Store the kubeconfig secret reference.
    ///
    /// # Errors
    /// Returns the upstream error labelled [`Stage::PersistCluster`].
    pub async fn save_config_secret_id(&mut self, secret_id: &str) -> Result<()> {
        self.deps
            .persistence
            .update_config_secret(self.cluster.id, secret_id)
            .await
            .stage(Stage::PersistCluster)?;
        self.cluster.config_secret_id = Some(secret_id.to_string());
        Ok(())
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[must_use]
    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    /// Immutable copy of the aggregate for read paths.
    #[must_use]
    pub fn snapshot(&self) -> Cluster {
        self.cluster.clone()
    }

    #[must_use]
    pub fn into_model(self) -> Cluster {
        self.cluster
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.cluster.id
    }

    #[must_use]
    pub fn uid(&self) -> &str {
        &self.cluster.uid
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.cluster.name
    }

    #[must_use]
    pub fn location(&self) -> &str {
        &self.cluster.location
    }

    #[must_use]
    pub fn cloud(&self) -> &str {
        &self.cluster.cloud
    }

    #[must_use]
    pub fn distribution(&self) -> &str {
        &self.cluster.distribution
    }

    #[must_use]
    pub fn organization_id(&self) -> u64 {
        self.cluster.organization_id
    }

    #[must_use]
    pub fn secret_id(&self) -> &str {
        self.cluster.secret_id()
    }

    #[must_use]
    pub fn ssh_secret_id(&self) -> Option<&str> {
        self.cluster.ssh_secret_id()
    }

    #[must_use]
    pub fn config_secret_id(&self) -> Option<&str> {
        self.cluster.config_secret_id()
    }

    /// RBAC is always enabled on managed clusters.
    #[must_use]
    pub const fn rbac_enabled() -> bool {
        true
    }

    // ========================================================================
    // Internals
    // ========================================================================

    async fn persist(&mut self) -> Result<()> {
        let id = self
            .deps
            .persistence
            .save(&self.cluster)
            .await
            .stage(Stage::PersistCluster)?;
        self.cluster.id = id;
        Ok(())
    }

    async fn transition(&mut self, status: ClusterStatus, message: &str) -> Result<()> {
        let next = self.cluster.status.transition(status)?;
        self.deps
            .persistence
            .update_status(self.cluster.id, next, message)
            .await
            .stage(Stage::UpdateStatus)?;

        debug!(cluster = %self.cluster.name, from = %self.cluster.status, to = %next, "Cluster status changed");
        self.cluster.status = next;
        self.cluster.status_message = message.to_string();
        Ok(())
    }

    fn network_provisioner(&self, client: &dyn CloudClient) -> NetworkProvisioner {
        NetworkProvisioner::new(client.network(), self.deps.config.network_name_prefix.clone())
    }

    // Creates a cluster role binding which gives admin rights to the user
    // identity of the secret used to create the cluster.
    async fn set_cluster_admin_rights(&self, engine: &dyn ContainerEngineManager) -> Result<()> {
        let config = &self.deps.config;

        let kubeconfig = if self.cluster.config_secret_id().is_some() {
            kubeconfig_from_secret(&self.deps, &self.cluster).await?
        } else {
            download(engine, &self.cluster).await?
        };

        let client = self
            .deps
            .kubernetes
            .connect(&kubeconfig)
            .await
            .stage(Stage::KubernetesClient)?;

        let secret = self
            .deps
            .secrets
            .get_validated(self.cluster.secret_id())
            .await
            .stage(Stage::FetchSecret)?;

        let user = secret
            .value(&config.user_identity_field)
            .ok_or_else(|| ClusterError::Validation("empty user OCID".to_string()))?;

        let binding = cluster_admin_binding(&config.admin_binding_name, user, &config.admin_cluster_role);
        client
            .create_cluster_role_binding(&binding)
            .await
            .stage(Stage::RbacBinding)?;

        info!(name = %config.admin_binding_name, "cluster role binding created");
        Ok(())
    }
}

/// Build a cloud client for the cluster's credentials, switched to its region.
async fn connect<C>(deps: &Dependencies, cluster: &C) -> Result<Box<dyn CloudClient>>
where
    C: HasSecret + HasNetwork + Sync,
{
    let secret = deps
        .secrets
        .get_validated(cluster.secret_id())
        .await
        .stage(Stage::FetchSecret)?;
    let credentials = OciCredentials::from_secret(&secret)?;

    let mut client = deps
        .cloud
        .connect(&credentials)
        .await
        .stage(Stage::CloudClient)?;

    if client.region() != cluster.location() {
        client
            .change_region(cluster.location())
            .stage(Stage::ChangeRegion)?;
    }

    Ok(client)
}

fn engine_id<C: HasKubeconfig>(cluster: &C) -> Result<&str> {
    cluster
        .engine_id()
        .ok_or_else(|| ClusterError::Resource("cluster has no container engine id".to_string()))
}

async fn download<C>(engine: &dyn ContainerEngineManager, cluster: &C) -> Result<Vec<u8>>
where
    C: HasKubeconfig + Sync,
{
    let id = engine_id(cluster)?;
    engine.get_kubeconfig(id).await.stage(Stage::Kubeconfig)
}

async fn kubeconfig_from_secret<C>(deps: &Dependencies, cluster: &C) -> Result<Vec<u8>>
where
    C: HasKubeconfig + Sync,
{
    let secret_id = cluster
        .config_secret_id()
        .ok_or_else(|| ClusterError::Validation("no kubeconfig secret recorded".to_string()))?;

    let secret = deps
        .secrets
        .get_validated(secret_id)
        .await
        .stage(Stage::Kubeconfig)?;

    let encoded = secret.value(KUBECONFIG_SECRET_FIELD).ok_or_else(|| {
        ClusterError::Validation(format!("empty {KUBECONFIG_SECRET_FIELD} in secret {secret_id}"))
    })?;

    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| ClusterError::Validation(format!("malformed kubeconfig secret: {e}")))
}
