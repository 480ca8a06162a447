//! Cluster registration against the topology inventory.
//!
//! A cluster registers by finding (or creating) the account's cloud, finding
//! (or creating) a pending cluster record keyed by its workload identity, and
//! promoting that record to managed. Every step re-reads remote state, so
//! `register` can be called again after any failure and resumes where the
//! previous call stopped.
//!
//! ## Modules
//!
//! - [`client`]: typed inventory operations over HTTP
//! - [`cloud`] / [`cluster`]: resolution of the cloud and cluster records
//! - [`compat`]: whether an existing record may be used by this cluster
//! - [`orchestrator`]: the end-to-end register / unregister flows
//! - [`collaborators`]: secrets, local cluster info, workload identity
//! - [`mock`]: in-memory inventory for tests and local runs

pub mod client;
pub mod cloud;
pub mod cluster;
pub mod collaborators;
pub mod compat;
pub mod config;
pub mod error;
pub mod mock;
pub mod model;
pub mod orchestrator;

pub use client::{AccountScope, ApiToken, InventoryApi, InventoryClient, Resource};
pub use cloud::CloudResolver;
pub use cluster::{ClusterResolver, ResolvedCluster};
pub use compat::{evaluate, Incompatibility, Registration};
pub use config::Config;
pub use error::RegistrationError;
pub use orchestrator::{Registrar, Settings};
