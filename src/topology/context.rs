//! State threaded through the rules of a single build

use crate::cluster::ClusterConfiguration;
use crate::pki::{
    CertificateAuthority, KeypairRequest, KeysetFormat, Lifecycle, SecretRequest, Task, TaskSet,
};
use crate::resolve::Resolvers;
use crate::{Error, Result};

/// Inputs and the partial task set of a running build
///
/// The `add_*` helpers stamp the build's lifecycle and keyset format on each
/// descriptor, so rules only describe identities.
pub struct RuleContext<'a> {
    config: &'a ClusterConfiguration,
    resolvers: &'a Resolvers,
    lifecycle: Lifecycle,
    format: KeysetFormat,
    tasks: TaskSet,
}

impl<'a> RuleContext<'a> {
    /// Start an empty build
    pub fn new(
        config: &'a ClusterConfiguration,
        resolvers: &'a Resolvers,
        lifecycle: Lifecycle,
        format: KeysetFormat,
    ) -> Self {
        Self {
            config,
            resolvers,
            lifecycle,
            format,
            tasks: TaskSet::new(),
        }
    }

    /// Cluster configuration being planned
    pub fn config(&self) -> &'a ClusterConfiguration {
        self.config
    }

    /// Collaborators for this build
    pub fn resolvers(&self) -> &'a Resolvers {
        self.resolvers
    }

    /// Tasks emitted so far
    pub fn tasks(&self) -> &TaskSet {
        &self.tasks
    }

    /// Add a CA
    pub fn add_ca(&mut self, mut ca: CertificateAuthority) -> Result<()> {
        ca.lifecycle = self.lifecycle;
        ca.format = self.format;
        self.tasks.insert(Task::CreateCa(ca))
    }

    /// Add a keypair
    pub fn add_keypair(&mut self, mut keypair: KeypairRequest) -> Result<()> {
        keypair.lifecycle = self.lifecycle;
        keypair.format = self.format;
        self.tasks.insert(Task::CreateKeypair(keypair))
    }

    /// Add a secret
    pub fn add_secret(&mut self, mut secret: SecretRequest) -> Result<()> {
        secret.lifecycle = self.lifecycle;
        self.tasks.insert(Task::CreateSecret(secret))
    }

    /// Add a secret-store or key-store mirror
    pub fn add_mirror(&mut self, mut task: Task) -> Result<()> {
        match &mut task {
            Task::MirrorSecretStore(mirror) | Task::MirrorKeyStore(mirror) => {
                mirror.lifecycle = self.lifecycle;
            }
            other => {
                return Err(Error::invariant(format!("{} is not a mirror", other.key())));
            }
        }
        self.tasks.insert(task)
    }

    /// Finish the build, handing back the collected tasks unverified
    pub fn into_tasks(self) -> TaskSet {
        self.tasks
    }
}
