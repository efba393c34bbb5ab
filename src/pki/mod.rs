//! PKI task descriptors and identity naming
//!
//! - [`task`]: the closed [`Task`] enum and its payloads ([`CertificateAuthority`],
//!   [`KeypairRequest`], [`SecretRequest`], [`MirrorRequest`])
//! - [`naming`]: subjects and alternate names for control-plane identities
//! - [`TaskSet`]: the keyed output of a build, with the cross-task invariant check

pub mod naming;
mod set;
pub mod task;

pub use naming::{Identity, AGGREGATOR_ALLOWED_NAME, AGGREGATOR_CA_NAME, DEFAULT_CA_NAME};
pub use set::TaskSet;
pub use task::{
    AlternateName, CertificateAuthority, KeyUsage, KeypairRequest, KeysetFormat, Lifecycle,
    MirrorRequest, SecretRequest, SignerRef, Subject, Task, TaskKey, TaskKind,
};
