//! Cluster lifecycle orchestration for Oracle Container Engine for
//! Kubernetes (OKE).
//!
//! This crate drives a single cluster through create, update and delete:
//!
//! - **Network** - creates the cluster's virtual cloud network, reads its
//!   subnet inventory and spreads node pools over worker subnets
//! - **Controller** - sequences network provisioning, container engine
//!   apply calls and the creator's admin role binding
//! - **Status** - read-only status and detail views
//!
//! Persistence, secrets and the cloud APIs are external collaborators; see
//! [`collaborators`].

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod collaborators;
pub mod config;
pub mod controller;
pub mod error;
pub mod model;
pub mod network;
pub mod rbac;
pub mod request;
pub mod status;

pub use collaborators::{
    CloudClient, CloudClientFactory, ContainerEngineManager, EngineCluster,
    KubernetesClientFactory, ModelPersistence, NetworkManager, NetworkValues, OciCredentials,
    RbacClient, SecretItem, SecretStore, VirtualNetwork,
};
pub use config::LifecycleConfig;
pub use controller::{ClusterLifecycleController, Dependencies};
pub use error::{ClusterError, Result, Stage, UpstreamError};
pub use model::{Cluster, ClusterStatus, HasKubeconfig, HasNetwork, HasSecret, NodePool, ProviderSpec};
pub use network::{distribute, Distribution, NetworkProvisioner};
pub use request::{ClusterProperties, CreateClusterRequest, NodePoolProperties, UpdateClusterRequest};
pub use status::{ClusterDetailsResponse, ClusterStatusResponse, StatusProjector};
