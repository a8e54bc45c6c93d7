//! Error taxonomy for cluster lifecycle operations.

use thiserror::Error;

use crate::model::ClusterStatus;

/// Error returned by an external collaborator.
pub type UpstreamError = Box<dyn std::error::Error + Send + Sync>;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClusterError>;

/// Step of a lifecycle operation, used to label upstream failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    LoadCluster,
    PersistCluster,
    UpdateStatus,
    FetchSecret,
    CloudClient,
    ChangeRegion,
    NetworkCreate,
    NetworkDelete,
    NetworkPopulate,
    EngineValidate,
    EngineApply,
    EngineQuery,
    Kubeconfig,
    KubernetesClient,
    RbacBinding,
    DeleteCluster,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::LoadCluster => "error loading cluster",
            Self::PersistCluster => "error persisting cluster",
            Self::UpdateStatus => "error updating cluster status",
            Self::FetchSecret => "error getting secret",
            Self::CloudClient => "error creating cloud client",
            Self::ChangeRegion => "error changing region",
            Self::NetworkCreate => "error creating virtual network",
            Self::NetworkDelete => "error deleting virtual network",
            Self::NetworkPopulate => "error populating network values",
            Self::EngineValidate => "error validating cluster",
            Self::EngineApply => "error applying cluster",
            Self::EngineQuery => "error getting cluster",
            Self::Kubeconfig => "error getting k8s config",
            Self::KubernetesClient => "error getting k8s client",
            Self::RbacBinding => "creating cluster role binding failed",
            Self::DeleteCluster => "error deleting cluster from database",
        };
        f.write_str(label)
    }
}

/// Errors that can occur while driving a cluster through its lifecycle.
#[derive(Error, Debug)]
pub enum ClusterError {
    /// Invalid network topology.
    #[error("Invalid network config: {0}")]
    Config(String),

    /// A provisioned resource lacks an expected identifier.
    #[error("Invalid resource: {0}")]
    Resource(String),

    /// The live cluster is not in the required lifecycle state.
    #[error("Cluster is not ready (lifecycle state: {state})")]
    ClusterNotReady { state: String },

    /// The requested status change is not allowed.
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: ClusterStatus,
        to: ClusterStatus,
    },

    /// A required field is missing or a request is not acceptable.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An external collaborator failed.
    #[error("{stage}: {source}")]
    Upstream {
        stage: Stage,
        #[source]
        source: UpstreamError,
    },
}

impl ClusterError {
    /// Wrap a collaborator error with the stage it failed in.
    pub fn upstream(stage: Stage, source: impl Into<UpstreamError>) -> Self {
        Self::Upstream {
            stage,
            source: source.into(),
        }
    }

    /// The stage label of an upstream failure.
    #[must_use]
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Upstream { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Attach a [`Stage`] to collaborator results.
pub(crate) trait StageExt<T> {
    fn stage(self, stage: Stage) -> Result<T>;
}

impl<T> StageExt<T> for std::result::Result<T, UpstreamError> {
    fn stage(self, stage: Stage) -> Result<T> {
        self.map_err(|source| ClusterError::Upstream { stage, source })
    }
}
