//! Task descriptors handed to the external task executor
//!
//! Every descriptor is an inert request: it names what must exist and who
//! signs it, but carries no key material. Signers are referenced by name so a
//! task set can be serialized and checked without knowing construction order.

use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::resolve::StoragePath;
use crate::{Error, Result};

// =============================================================================
// Identity attributes
// =============================================================================

/// Intended key usage of an issued certificate
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyUsage {
    /// Signing certificate
    Ca,
    /// TLS client authentication
    Client,
    /// TLS server authentication
    Server,
    /// Both client and server authentication
    ClientServer,
}

impl std::fmt::Display for KeyUsage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ca => write!(f, "ca"),
            Self::Client => write!(f, "client"),
            Self::Server => write!(f, "server"),
            Self::ClientServer => write!(f, "clientServer"),
        }
    }
}

/// On-disk keyset representation the executor should write
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum KeysetFormat {
    /// Single keyset.yaml per keypair
    #[default]
    #[serde(rename = "v1alpha2")]
    V1Alpha2,
    /// Separate certificate and key files
    #[serde(rename = "legacy")]
    Legacy,
}

impl std::fmt::Display for KeysetFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::V1Alpha2 => write!(f, "v1alpha2"),
            Self::Legacy => write!(f, "legacy"),
        }
    }
}

impl FromStr for KeysetFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "v1alpha2" => Ok(Self::V1Alpha2),
            "legacy" => Ok(Self::Legacy),
            _ => Err(Error::validation(
                "format",
                format!("invalid keyset format: {s}, expected one of: v1alpha2, legacy"),
            )),
        }
    }
}

/// How the executor should treat a task
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Lifecycle {
    /// Create or update the artifact
    #[default]
    Sync,
    /// Skip the task entirely
    Ignore,
    /// Sync, but only warn when permissions are missing
    WarnIfInsufficientAccess,
    /// Require the artifact to exist and match
    ExistsAndValidates,
    /// Require the artifact to exist, warn on drift
    ExistsAndWarnIfChanges,
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sync => write!(f, "Sync"),
            Self::Ignore => write!(f, "Ignore"),
            Self::WarnIfInsufficientAccess => write!(f, "WarnIfInsufficientAccess"),
            Self::ExistsAndValidates => write!(f, "ExistsAndValidates"),
            Self::ExistsAndWarnIfChanges => write!(f, "ExistsAndWarnIfChanges"),
        }
    }
}

impl FromStr for Lifecycle {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sync" => Ok(Self::Sync),
            "ignore" => Ok(Self::Ignore),
            "warnifinsufficientaccess" => Ok(Self::WarnIfInsufficientAccess),
            "existsandvalidates" => Ok(Self::ExistsAndValidates),
            "existsandwarnifchanges" => Ok(Self::ExistsAndWarnIfChanges),
            _ => Err(Error::validation(
                "lifecycle",
                format!(
                    "invalid lifecycle: {s}, expected one of: Sync, Ignore, \
                     WarnIfInsufficientAccess, ExistsAndValidates, ExistsAndWarnIfChanges"
                ),
            )),
        }
    }
}

/// Distinguished name of a certificate holder
///
/// Renders as `o=<org>,ou=<unit>,cn=<name>`, organizations first. A `\`,
/// `,` or `=` inside a value is escaped with a backslash.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct Subject {
    organizations: Vec<String>,
    organizational_units: Vec<String>,
    common_name: String,
}

impl Subject {
    /// Subject with only a common name
    pub fn common_name(cn: impl Into<String>) -> Self {
        Self {
            organizations: Vec::new(),
            organizational_units: Vec::new(),
            common_name: cn.into(),
        }
    }

    /// Subject whose organization places the holder in an RBAC group
    pub fn in_group(group: impl Into<String>, cn: impl Into<String>) -> Self {
        Self {
            organizations: vec![group.into()],
            organizational_units: Vec::new(),
            common_name: cn.into(),
        }
    }

    /// Add an organizational unit
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.organizational_units.push(unit.into());
        self
    }

    /// The common name
    pub fn cn(&self) -> &str {
        &self.common_name
    }

    /// Organizations (RBAC groups)
    pub fn organizations(&self) -> &[String] {
        &self.organizations
    }

    /// Organizational units
    pub fn organizational_units(&self) -> &[String] {
        &self.organizational_units
    }
}

fn escape_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | ',' | '=') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn unescape_value(value: &str, subject: &str) -> Result<String> {
    let mut unescaped = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            unescaped.push(c);
            continue;
        }
        let next = chars.next().ok_or_else(|| {
            Error::validation("subject", format!("dangling escape in {subject:?}"))
        })?;
        unescaped.push(next);
    }
    Ok(unescaped)
}

/// Byte offset of the first `sep` not preceded by an escaping backslash
fn find_unescaped(s: &str, sep: char) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == sep {
            return Some(i);
        }
    }
    None
}

/// Split on `sep` outside escapes, leaving escapes in place
fn split_unescaped(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = s;
    while let Some(i) = find_unescaped(rest, sep) {
        parts.push(&rest[..i]);
        rest = &rest[i + sep.len_utf8()..];
    }
    parts.push(rest);
    parts
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for org in &self.organizations {
            write!(f, "o={},", escape_value(org))?;
        }
        for unit in &self.organizational_units {
            write!(f, "ou={},", escape_value(unit))?;
        }
        write!(f, "cn={}", escape_value(&self.common_name))
    }
}

impl FromStr for Subject {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut organizations = Vec::new();
        let mut organizational_units = Vec::new();
        let mut common_name = None;

        for part in split_unescaped(s, ',') {
            let eq = find_unescaped(part, '=').ok_or_else(|| {
                Error::validation("subject", format!("malformed attribute {part:?} in {s:?}"))
            })?;
            let (key, value) = (&part[..eq], &part[eq + 1..]);
            let value = unescape_value(value.trim(), s)?;
            match key.trim().to_lowercase().as_str() {
                "o" => organizations.push(value),
                "ou" => organizational_units.push(value),
                "cn" if common_name.is_none() => common_name = Some(value),
                "cn" => {
                    return Err(Error::validation(
                        "subject",
                        format!("multiple common names in {s:?}"),
                    ))
                }
                other => {
                    return Err(Error::validation(
                        "subject",
                        format!("unsupported attribute {other:?} in {s:?}"),
                    ))
                }
            }
        }

        let common_name = common_name
            .ok_or_else(|| Error::validation("subject", format!("no common name in {s:?}")))?;

        Ok(Self {
            organizations,
            organizational_units,
            common_name,
        })
    }
}

impl TryFrom<String> for Subject {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Subject> for String {
    fn from(subject: Subject) -> Self {
        subject.to_string()
    }
}

/// A subject alternative name
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum AlternateName {
    /// DNS name, possibly a wildcard
    Dns(String),
    /// IP address literal
    Ip(IpAddr),
}

impl AlternateName {
    /// Returns true if this is an IP literal
    pub fn is_ip(&self) -> bool {
        matches!(self, Self::Ip(_))
    }

    fn is_blank(&self) -> bool {
        matches!(self, Self::Dns(name) if name.trim().is_empty())
    }
}

impl std::fmt::Display for AlternateName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dns(name) => write!(f, "{name}"),
            Self::Ip(ip) => write!(f, "{ip}"),
        }
    }
}

impl From<&str> for AlternateName {
    fn from(s: &str) -> Self {
        match s.parse::<IpAddr>() {
            Ok(ip) => Self::Ip(ip),
            Err(_) => Self::Dns(s.to_string()),
        }
    }
}

impl From<String> for AlternateName {
    fn from(s: String) -> Self {
        match s.parse::<IpAddr>() {
            Ok(ip) => Self::Ip(ip),
            Err(_) => Self::Dns(s),
        }
    }
}

impl From<&String> for AlternateName {
    fn from(s: &String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<IpAddr> for AlternateName {
    fn from(ip: IpAddr) -> Self {
        Self::Ip(ip)
    }
}

impl From<AlternateName> for String {
    fn from(name: AlternateName) -> Self {
        name.to_string()
    }
}

/// Reference to the signing CA by name
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct SignerRef(String);

impl SignerRef {
    /// Reference a signer by keystore name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The referenced keystore name
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SignerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&CertificateAuthority> for SignerRef {
    fn from(ca: &CertificateAuthority) -> Self {
        Self(ca.name.clone())
    }
}

impl From<&str> for SignerRef {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

// =============================================================================
// Descriptors
// =============================================================================

/// A self-signed root certificate authority
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateAuthority {
    /// Keystore name
    pub name: String,
    /// Subject of the CA certificate
    pub subject: Subject,
    /// Keyset representation
    #[serde(default)]
    pub format: KeysetFormat,
    /// Executor lifecycle
    #[serde(default)]
    pub lifecycle: Lifecycle,
}

impl CertificateAuthority {
    /// Create a CA with the default format and lifecycle
    pub fn new(name: impl Into<String>, subject: Subject) -> Self {
        Self {
            name: name.into(),
            subject,
            format: KeysetFormat::default(),
            lifecycle: Lifecycle::default(),
        }
    }

    /// Reference to this CA for use as a signer
    pub fn reference(&self) -> SignerRef {
        SignerRef::from(self)
    }
}

/// A leaf (or intermediate) keypair to issue
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeypairRequest {
    /// Keystore name
    pub name: String,
    /// Subject of the issued certificate
    pub subject: Subject,
    /// Key usage
    #[serde(rename = "type")]
    pub usage: KeyUsage,
    /// Subject alternative names, in emission order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternate_names: Vec<AlternateName>,
    /// Signing CA
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer: Option<SignerRef>,
    /// Keyset representation
    #[serde(default)]
    pub format: KeysetFormat,
    /// Executor lifecycle
    #[serde(default)]
    pub lifecycle: Lifecycle,
}

impl KeypairRequest {
    /// Create an unsigned keypair request
    pub fn new(name: impl Into<String>, subject: Subject, usage: KeyUsage) -> Self {
        Self {
            name: name.into(),
            subject,
            usage,
            alternate_names: Vec::new(),
            signer: None,
            format: KeysetFormat::default(),
            lifecycle: Lifecycle::default(),
        }
    }

    /// Client certificate request
    pub fn client(name: impl Into<String>, subject: Subject) -> Self {
        Self::new(name, subject, KeyUsage::Client)
    }

    /// Server certificate request
    pub fn server(name: impl Into<String>, subject: Subject) -> Self {
        Self::new(name, subject, KeyUsage::Server)
    }

    /// Set the signing CA
    pub fn signed_by(mut self, signer: impl Into<SignerRef>) -> Self {
        self.signer = Some(signer.into());
        self
    }

    /// Append alternate names
    pub fn with_alternate_names<I, N>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<AlternateName>,
    {
        self.alternate_names
            .extend(names.into_iter().map(Into::into));
        self
    }

    /// Returns true if the alternate names include `name`
    ///
    /// IP literals compare by address, so `FD00::0001` matches `fd00::1`.
    pub fn has_alternate_name(&self, name: &str) -> bool {
        let wanted = AlternateName::from(name);
        self.alternate_names.contains(&wanted)
    }
}

/// An opaque named secret (deprecated bearer tokens)
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretRequest {
    /// Secret store name
    pub name: String,
    /// Executor lifecycle
    #[serde(default)]
    pub lifecycle: Lifecycle,
}

impl SecretRequest {
    /// Create a secret request
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lifecycle: Lifecycle::default(),
        }
    }
}

/// Replicate a logical store to a durable location
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorRequest {
    /// Task name
    pub name: String,
    /// Destination
    pub path: StoragePath,
    /// Executor lifecycle
    #[serde(default)]
    pub lifecycle: Lifecycle,
}

impl MirrorRequest {
    /// Create a mirror request
    pub fn new(name: impl Into<String>, path: StoragePath) -> Self {
        Self {
            name: name.into(),
            path,
            lifecycle: Lifecycle::default(),
        }
    }
}

/// A request for the external executor
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Task {
    /// Create a root CA
    #[serde(rename = "createCA")]
    CreateCa(CertificateAuthority),
    /// Issue a keypair
    CreateKeypair(KeypairRequest),
    /// Create an opaque secret
    CreateSecret(SecretRequest),
    /// Mirror the secret store
    MirrorSecretStore(MirrorRequest),
    /// Mirror the key store
    MirrorKeyStore(MirrorRequest),
}

/// Store namespace a task's name lives in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskKind {
    /// CAs and keypairs
    Keystore,
    /// Opaque secrets
    Secret,
    /// Store mirrors
    Mirror,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Keystore => write!(f, "keypair"),
            Self::Secret => write!(f, "secret"),
            Self::Mirror => write!(f, "mirror"),
        }
    }
}

/// Unique identity of a task within one build
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskKey {
    /// Namespace
    pub kind: TaskKind,
    /// Name within the namespace
    pub name: String,
}

impl TaskKey {
    /// Key for a CA or keypair
    pub fn keystore(name: impl Into<String>) -> Self {
        Self {
            kind: TaskKind::Keystore,
            name: name.into(),
        }
    }

    /// Key for a secret
    pub fn secret(name: impl Into<String>) -> Self {
        Self {
            kind: TaskKind::Secret,
            name: name.into(),
        }
    }

    /// Key for a mirror
    pub fn mirror(name: impl Into<String>) -> Self {
        Self {
            kind: TaskKind::Mirror,
            name: name.into(),
        }
    }
}

impl std::fmt::Display for TaskKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

impl Serialize for TaskKey {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl Task {
    /// Unique key of this task
    pub fn key(&self) -> TaskKey {
        match self {
            Task::CreateCa(ca) => TaskKey::keystore(&ca.name),
            Task::CreateKeypair(kp) => TaskKey::keystore(&kp.name),
            Task::CreateSecret(secret) => TaskKey::secret(&secret.name),
            Task::MirrorSecretStore(mirror) | Task::MirrorKeyStore(mirror) => {
                TaskKey::mirror(&mirror.name)
            }
        }
    }

    /// Task name
    pub fn name(&self) -> &str {
        match self {
            Task::CreateCa(ca) => &ca.name,
            Task::CreateKeypair(kp) => &kp.name,
            Task::CreateSecret(secret) => &secret.name,
            Task::MirrorSecretStore(mirror) | Task::MirrorKeyStore(mirror) => &mirror.name,
        }
    }

    /// Executor lifecycle
    pub fn lifecycle(&self) -> Lifecycle {
        match self {
            Task::CreateCa(ca) => ca.lifecycle,
            Task::CreateKeypair(kp) => kp.lifecycle,
            Task::CreateSecret(secret) => secret.lifecycle,
            Task::MirrorSecretStore(mirror) | Task::MirrorKeyStore(mirror) => mirror.lifecycle,
        }
    }

    /// Signer reference, for keypairs that have one
    pub fn signer(&self) -> Option<&SignerRef> {
        match self {
            Task::CreateKeypair(kp) => kp.signer.as_ref(),
            _ => None,
        }
    }

    /// Returns true if this task can sign other keypairs
    pub fn is_signer(&self) -> bool {
        match self {
            Task::CreateCa(_) => true,
            Task::CreateKeypair(kp) => kp.usage == KeyUsage::Ca,
            _ => false,
        }
    }

    /// The CA payload, if this is a CreateCA task
    pub fn as_certificate_authority(&self) -> Option<&CertificateAuthority> {
        match self {
            Task::CreateCa(ca) => Some(ca),
            _ => None,
        }
    }

    /// The keypair payload, if this is a CreateKeypair task
    pub fn as_keypair(&self) -> Option<&KeypairRequest> {
        match self {
            Task::CreateKeypair(kp) => Some(kp),
            _ => None,
        }
    }

    /// The secret payload, if this is a CreateSecret task
    pub fn as_secret(&self) -> Option<&SecretRequest> {
        match self {
            Task::CreateSecret(secret) => Some(secret),
            _ => None,
        }
    }

    /// The mirror payload, if this is a mirror task
    pub fn as_mirror(&self) -> Option<&MirrorRequest> {
        match self {
            Task::MirrorSecretStore(mirror) | Task::MirrorKeyStore(mirror) => Some(mirror),
            _ => None,
        }
    }

    /// Check that required fields are present
    ///
    /// Cross-task invariants (signer existence, uniqueness) belong to
    /// [`TaskSet`](crate::pki::TaskSet).
    pub fn validate(&self) -> Result<()> {
        let key = self.key();
        if self.name().trim().is_empty() {
            return Err(Error::invariant(format!("{} task has an empty name", key.kind)));
        }

        match self {
            Task::CreateCa(ca) => {
                if ca.subject.cn().trim().is_empty() {
                    return Err(Error::invariant(format!("{key} has an empty common name")));
                }
            }
            Task::CreateKeypair(kp) => {
                if kp.subject.cn().trim().is_empty() {
                    return Err(Error::invariant(format!("{key} has an empty common name")));
                }
                match &kp.signer {
                    None if kp.usage != KeyUsage::Ca => {
                        return Err(Error::invariant(format!(
                            "{key} is a {} keypair without a signer",
                            kp.usage
                        )));
                    }
                    Some(signer) if signer.name() == kp.name => {
                        return Err(Error::invariant(format!("{key} names itself as signer")));
                    }
                    _ => {}
                }
                if kp.alternate_names.iter().any(AlternateName::is_blank) {
                    return Err(Error::invariant(format!("{key} has an empty alternate name")));
                }
            }
            Task::CreateSecret(_) | Task::MirrorSecretStore(_) | Task::MirrorKeyStore(_) => {}
        }

        Ok(())
    }
}
