//! pki-topology - computes the PKI a Kubernetes control plane needs
//!
//! Given a cluster configuration, the builder produces a declarative set of
//! task descriptors: which CAs to create, which keypairs to issue and who signs
//! them, which legacy secrets to provision, and where to mirror the secret and
//! key stores. Executing the tasks (key generation, signing, storage) is left
//! to the caller.
//!
//! # Architecture
//!
//! - Configuration is read-only input
//! - An ordered rule table gates each group of tasks on configuration flags
//! - Signers are referenced by name and checked against the finished set
//! - External lookups (service IPs, storage paths, legacy tokens) go through
//!   pluggable resolvers
//!
//! # Modules
//!
//! - [`cluster`] - Cluster configuration (networking, authentication, etcd)
//! - [`pki`] - Task descriptors, the output task set, identity naming
//! - [`resolve`] - Resolver traits and their default implementations
//! - [`topology`] - The rule table and builder
//! - [`telemetry`] - Logging setup for binaries
//! - [`error`] - Error types for topology builds

#![deny(missing_docs)]

pub mod cluster;
pub mod error;
pub mod pki;
pub mod resolve;
pub mod telemetry;
pub mod topology;

pub use error::Error;
pub use topology::{build_topology, TopologyBuilder};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
