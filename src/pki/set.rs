//! The output collection of a topology build

use std::collections::BTreeMap;

use serde::Serialize;
use serde_yaml::with::singleton_map_recursive;

use super::naming::DEFAULT_CA_NAME;
use super::task::{
    CertificateAuthority, KeypairRequest, MirrorRequest, SecretRequest, Task, TaskKey,
};
use crate::{Error, Result};

/// Keyed, ordered set of tasks
///
/// Iteration and serialization follow key order, so two builds from the same
/// input produce byte-identical output.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TaskSet {
    tasks: BTreeMap<TaskKey, Task>,
}

impl TaskSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from tasks and check it
    pub fn from_tasks(tasks: impl IntoIterator<Item = Task>) -> Result<Self> {
        let mut set = Self::new();
        for task in tasks {
            set.insert(task)?;
        }
        set.verify()?;
        Ok(set)
    }

    /// Add a task after structural validation
    ///
    /// Fails if a task with the same key is already present.
    pub fn insert(&mut self, task: Task) -> Result<()> {
        task.validate()?;
        let key = task.key();
        if self.tasks.contains_key(&key) {
            return Err(Error::invariant(format!("duplicate task {key}")));
        }
        self.tasks.insert(key, task);
        Ok(())
    }

    /// Check cross-task invariants
    ///
    /// - the default CA is present
    /// - every signer reference resolves to a CA in this set
    /// - exactly one secret-store mirror and one key-store mirror
    pub fn verify(&self) -> Result<()> {
        if self.certificate_authority(DEFAULT_CA_NAME).is_none() {
            return Err(Error::invariant(format!(
                "default CA {DEFAULT_CA_NAME} is missing"
            )));
        }

        for (key, task) in &self.tasks {
            let Some(signer) = task.signer() else {
                continue;
            };
            match self.tasks.get(&TaskKey::keystore(signer.name())) {
                Some(candidate) if candidate.is_signer() => {}
                Some(_) => {
                    return Err(Error::invariant(format!(
                        "{key} is signed by {signer}, which is not a CA"
                    )));
                }
                None => {
                    return Err(Error::invariant(format!(
                        "{key} references missing signer {signer}"
                    )));
                }
            }
        }

        let secret_mirrors = self
            .tasks
            .values()
            .filter(|t| matches!(t, Task::MirrorSecretStore(_)))
            .count();
        let keystore_mirrors = self
            .tasks
            .values()
            .filter(|t| matches!(t, Task::MirrorKeyStore(_)))
            .count();
        if secret_mirrors != 1 || keystore_mirrors != 1 {
            return Err(Error::invariant(format!(
                "expected one secret-store and one key-store mirror, found {secret_mirrors} and {keystore_mirrors}"
            )));
        }

        Ok(())
    }

    /// Number of tasks
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true if the set has no tasks
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Look up a task by key
    pub fn get(&self, key: &TaskKey) -> Option<&Task> {
        self.tasks.get(key)
    }

    /// Returns true if a task with this key exists
    pub fn contains(&self, key: &TaskKey) -> bool {
        self.tasks.contains_key(key)
    }

    /// Iterate tasks in key order
    pub fn iter(&self) -> impl Iterator<Item = (&TaskKey, &Task)> {
        self.tasks.iter()
    }

    /// Task keys in order
    pub fn keys(&self) -> impl Iterator<Item = &TaskKey> {
        self.tasks.keys()
    }

    /// Task names in key order
    pub fn names(&self) -> Vec<String> {
        self.tasks.keys().map(ToString::to_string).collect()
    }

    /// Look up a keypair by name
    pub fn keypair(&self, name: &str) -> Option<&KeypairRequest> {
        self.tasks
            .get(&TaskKey::keystore(name))
            .and_then(Task::as_keypair)
    }

    /// Look up a CA by name
    pub fn certificate_authority(&self, name: &str) -> Option<&CertificateAuthority> {
        self.tasks
            .get(&TaskKey::keystore(name))
            .and_then(Task::as_certificate_authority)
    }

    /// Look up a secret by name
    pub fn secret(&self, name: &str) -> Option<&SecretRequest> {
        self.tasks
            .get(&TaskKey::secret(name))
            .and_then(Task::as_secret)
    }

    /// Look up a mirror by name
    pub fn mirror(&self, name: &str) -> Option<&MirrorRequest> {
        self.tasks
            .get(&TaskKey::mirror(name))
            .and_then(Task::as_mirror)
    }

    /// All CAs
    pub fn certificate_authorities(&self) -> impl Iterator<Item = &CertificateAuthority> {
        self.tasks.values().filter_map(Task::as_certificate_authority)
    }

    /// All keypairs
    pub fn keypairs(&self) -> impl Iterator<Item = &KeypairRequest> {
        self.tasks.values().filter_map(Task::as_keypair)
    }

    /// All secrets
    pub fn secrets(&self) -> impl Iterator<Item = &SecretRequest> {
        self.tasks.values().filter_map(Task::as_secret)
    }

    /// All mirrors
    pub fn mirrors(&self) -> impl Iterator<Item = &MirrorRequest> {
        self.tasks.values().filter_map(Task::as_mirror)
    }

    /// Keypairs signed by the named CA
    pub fn signed_by<'a>(&'a self, ca_name: &'a str) -> impl Iterator<Item = &'a KeypairRequest> {
        self.keypairs()
            .filter(move |kp| kp.signer.as_ref().is_some_and(|s| s.name() == ca_name))
    }

    /// Serialize as YAML
    ///
    /// Tasks are written as single-key maps (`createCA: {...}`) rather than
    /// YAML tags, matching the JSON shape.
    pub fn to_yaml(&self) -> Result<String> {
        let mut buf = Vec::new();
        let mut serializer = serde_yaml::Serializer::new(&mut buf);
        singleton_map_recursive::serialize(self, &mut serializer)?;
        String::from_utf8(buf).map_err(|e| Error::serialization(e.to_string()))
    }

    /// Serialize as pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a set written by [`to_yaml`](Self::to_yaml) and verify it
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let tasks: BTreeMap<String, Task> =
            singleton_map_recursive::deserialize(serde_yaml::Deserializer::from_str(yaml))?;
        Self::from_keyed(tasks)
    }

    /// Parse a set written by [`to_json`](Self::to_json) and verify it
    pub fn from_json(json: &str) -> Result<Self> {
        let tasks: BTreeMap<String, Task> = serde_json::from_str(json)?;
        Self::from_keyed(tasks)
    }

    fn from_keyed(tasks: BTreeMap<String, Task>) -> Result<Self> {
        let mismatched = tasks
            .iter()
            .find(|(key, task)| **key != task.key().to_string());
        if let Some((key, task)) = mismatched {
            return Err(Error::serialization(format!(
                "entry {key} holds task {}",
                task.key()
            )));
        }
        Self::from_tasks(tasks.into_values())
    }
}

impl<'a> IntoIterator for &'a TaskSet {
    type Item = (&'a TaskKey, &'a Task);
    type IntoIter = std::collections::btree_map::Iter<'a, TaskKey, Task>;

    fn into_iter(self) -> Self::IntoIter {
        self.tasks.iter()
    }
}
