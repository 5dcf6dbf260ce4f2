/// Rotated RSA signing keys
///
/// The key store maps `kid → key` and always exposes exactly one current key,
/// the newest key younger than the configured expiration. Keys older than the
/// disable threshold (twice the expiration) are never loaded, so tokens signed
/// with them stop verifying.
///
/// Keys come from a [`KeySource`]:
///
/// - [`FileKeySource`]: one PEM file managed by an operator
/// - [`SecretsManagerKeySource`]: versions of one AWS Secrets Manager secret
/// - [`MemoryKeySource`]: process memory, for tests and local development
///
/// The loaded set is an immutable [`KeySet`] behind `RwLock<Arc<_>>`. Readers
/// clone the `Arc` and release the lock immediately; [`KeyStore::rotate`]
/// swaps in a new set without disturbing verifications holding the old one.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use chrono::{Duration, Utc};
/// use launchpad_shared::auth::keystore::{FileKeySource, KeyStore, RotationPolicy};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let source = Arc::new(FileKeySource::new("/etc/launchpad/signing.pem"));
/// let store = KeyStore::new(source, RotationPolicy::new(Duration::hours(24)), Utc::now()).await?;
///
/// let key = store.current();
/// println!("signing with {}", key.kid);
/// # Ok(())
/// # }
/// ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use aws_sdk_secretsmanager::error::DisplayErrorContext;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::RsaPrivateKey;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

/// Modulus size of minted keys
pub const KEY_BITS: usize = 2048;

#[derive(Debug, thiserror::Error)]
pub enum KeyStoreError {
    /// The backing store could not be read or written
    #[error("Key backend error: {0}")]
    Backend(String),

    #[error("Unknown key id: {0}")]
    UnknownKid(String),

    #[error("Invalid key material for {kid}: {reason}")]
    InvalidKey { kid: String, reason: String },

    #[error("Key generation failed: {0}")]
    Generate(String),
}

/// One key version as listed by a source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyVersion {
    pub kid: String,
    pub created_at: DateTime<Utc>,
}

/// Where signing keys are stored
#[async_trait]
pub trait KeySource: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Every stored version, in no particular order
    async fn versions(&self, now: DateTime<Utc>) -> Result<Vec<KeyVersion>, KeyStoreError>;

    /// PEM-encoded private key of `kid`
    async fn load(&self, kid: &str) -> Result<String, KeyStoreError>;

    /// Stores a newly minted key and returns its version
    async fn persist(&self, private_pem: &str, now: DateTime<Utc>) -> Result<KeyVersion, KeyStoreError>;
}

/// A single PEM file on disk (PKCS#1 or PKCS#8)
///
/// The `kid` is the first 16 hex characters of the SHA-256 of the file. The key
/// reports the time it was listed as its creation time, so an operator-managed
/// file never ages out in-process. If the file does not exist, minting writes
/// the new key there.
#[derive(Debug, Clone)]
pub struct FileKeySource {
    path: PathBuf,
}

impl FileKeySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<Option<String>, KeyStoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(KeyStoreError::Backend(format!(
                "reading {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

/// `kid` of a file-backed key
pub fn file_kid(contents: &str) -> String {
    let digest = hex::encode(Sha256::digest(contents.as_bytes()));
    digest[..16].to_string()
}

#[async_trait]
impl KeySource for FileKeySource {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn versions(&self, now: DateTime<Utc>) -> Result<Vec<KeyVersion>, KeyStoreError> {
        Ok(self
            .read()
            .await?
            .map(|contents| KeyVersion {
                kid: file_kid(&contents),
                created_at: now,
            })
            .into_iter()
            .collect())
    }

    async fn load(&self, kid: &str) -> Result<String, KeyStoreError> {
        match self.read().await? {
            Some(contents) if file_kid(&contents) == kid => Ok(contents),
            _ => Err(KeyStoreError::UnknownKid(kid.to_string())),
        }
    }

    async fn persist(&self, private_pem: &str, now: DateTime<Utc>) -> Result<KeyVersion, KeyStoreError> {
        if self.read().await?.is_some() {
            return Err(KeyStoreError::Backend(format!(
                "refusing to overwrite {}",
                self.path.display()
            )));
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| KeyStoreError::Backend(format!("creating {}: {}", parent.display(), e)))?;
        }

        tokio::fs::write(&self.path, private_pem)
            .await
            .map_err(|e| KeyStoreError::Backend(format!("writing {}: {}", self.path.display(), e)))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|e| KeyStoreError::Backend(format!("chmod {}: {}", self.path.display(), e)))?;
        }

        info!(path = %self.path.display(), "Wrote new signing key");
        Ok(KeyVersion {
            kid: file_kid(private_pem),
            created_at: now,
        })
    }
}

/// Versions of one AWS Secrets Manager secret
///
/// `VersionId` is the `kid` and `CreatedDate` the creation time. Minting calls
/// `PutSecretValue`, creating the secret on first use.
#[derive(Debug, Clone)]
pub struct SecretsManagerKeySource {
    client: aws_sdk_secretsmanager::Client,
    secret_id: String,
}

impl SecretsManagerKeySource {
    pub fn new(client: aws_sdk_secretsmanager::Client, secret_id: impl Into<String>) -> Self {
        Self {
            client,
            secret_id: secret_id.into(),
        }
    }

    /// Client configured from the standard AWS environment
    pub async fn from_env(secret_id: impl Into<String>) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(aws_sdk_secretsmanager::Client::new(&config), secret_id)
    }
}

fn aws_time(at: &aws_sdk_secretsmanager::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(at.secs(), at.subsec_nanos())
}

#[async_trait]
impl KeySource for SecretsManagerKeySource {
    fn name(&self) -> &'static str {
        "secretsmanager"
    }

    async fn versions(&self, _now: DateTime<Utc>) -> Result<Vec<KeyVersion>, KeyStoreError> {
        let mut versions = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let output = match self
                .client
                .list_secret_version_ids()
                .secret_id(&self.secret_id)
                .include_deprecated(true)
                .set_next_token(next_token.take())
                .send()
                .await
            {
                Ok(output) => output,
                Err(e)
                    if e.as_service_error()
                        .map(|se| se.is_resource_not_found_exception())
                        .unwrap_or(false) =>
                {
                    debug!(secret_id = %self.secret_id, "Signing key secret does not exist yet");
                    return Ok(Vec::new());
                }
                Err(e) => {
                    return Err(KeyStoreError::Backend(format!(
                        "ListSecretVersionIds: {}",
                        DisplayErrorContext(&e)
                    )))
                }
            };

            for entry in output.versions() {
                let (Some(kid), Some(created_at)) =
                    (entry.version_id(), entry.created_date().and_then(aws_time))
                else {
                    continue;
                };
                versions.push(KeyVersion {
                    kid: kid.to_string(),
                    created_at,
                });
            }

            match output.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }

        Ok(versions)
    }

    async fn load(&self, kid: &str) -> Result<String, KeyStoreError> {
        let output = self
            .client
            .get_secret_value()
            .secret_id(&self.secret_id)
            .version_id(kid)
            .send()
            .await
            .map_err(|e| {
                KeyStoreError::Backend(format!("GetSecretValue {}: {}", kid, DisplayErrorContext(&e)))
            })?;

        output
            .secret_string()
            .map(str::to_string)
            .ok_or_else(|| KeyStoreError::InvalidKey {
                kid: kid.to_string(),
                reason: "secret has no string value".to_string(),
            })
    }

    async fn persist(&self, private_pem: &str, now: DateTime<Utc>) -> Result<KeyVersion, KeyStoreError> {
        let put = self
            .client
            .put_secret_value()
            .secret_id(&self.secret_id)
            .secret_string(private_pem)
            .send()
            .await;

        let version_id = match put {
            Ok(output) => output.version_id().map(str::to_string),
            Err(e)
                if e.as_service_error()
                    .map(|se| se.is_resource_not_found_exception())
                    .unwrap_or(false) =>
            {
                info!(secret_id = %self.secret_id, "Creating signing key secret");
                self.client
                    .create_secret()
                    .name(&self.secret_id)
                    .secret_string(private_pem)
                    .send()
                    .await
                    .map_err(|e| {
                        KeyStoreError::Backend(format!("CreateSecret: {}", DisplayErrorContext(&e)))
                    })?
                    .version_id()
                    .map(str::to_string)
            }
            Err(e) => {
                return Err(KeyStoreError::Backend(format!(
                    "PutSecretValue: {}",
                    DisplayErrorContext(&e)
                )))
            }
        };

        let kid = version_id
            .ok_or_else(|| KeyStoreError::Backend("secret store returned no version id".to_string()))?;
        Ok(KeyVersion { kid, created_at: now })
    }
}

/// Keys held in process memory
#[derive(Debug, Default)]
pub struct MemoryKeySource {
    entries: Mutex<Vec<(KeyVersion, String)>>,
}

impl MemoryKeySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `private_pem` as a version created at `created_at`; returns its kid
    pub fn insert(&self, private_pem: impl Into<String>, created_at: DateTime<Utc>) -> String {
        let kid = uuid::Uuid::new_v4().simple().to_string();
        let version = KeyVersion {
            kid: kid.clone(),
            created_at,
        };
        self.lock().push((version, private_pem.into()));
        kid
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(KeyVersion, String)>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl KeySource for MemoryKeySource {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn versions(&self, _now: DateTime<Utc>) -> Result<Vec<KeyVersion>, KeyStoreError> {
        Ok(self.lock().iter().map(|(version, _)| version.clone()).collect())
    }

    async fn load(&self, kid: &str) -> Result<String, KeyStoreError> {
        self.lock()
            .iter()
            .find(|(version, _)| version.kid == kid)
            .map(|(_, pem)| pem.clone())
            .ok_or_else(|| KeyStoreError::UnknownKid(kid.to_string()))
    }

    async fn persist(&self, private_pem: &str, now: DateTime<Utc>) -> Result<KeyVersion, KeyStoreError> {
        let kid = self.insert(private_pem, now);
        Ok(KeyVersion { kid, created_at: now })
    }
}

/// A loaded key: the private half for signing, the public half for verifying
pub struct SigningKey {
    pub kid: String,
    pub created_at: DateTime<Utc>,
    encoding: EncodingKey,
    decoding: DecodingKey,
    public_pem: String,
}

impl SigningKey {
    /// Parses a PKCS#8 or PKCS#1 PEM private key
    pub fn from_pem(kid: impl Into<String>, created_at: DateTime<Utc>, pem: &str) -> Result<Self, KeyStoreError> {
        let kid = kid.into();
        let invalid = |reason: String| KeyStoreError::InvalidKey {
            kid: kid.clone(),
            reason,
        };

        let private = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| invalid(e.to_string()))?;
        let public_pem = private
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| invalid(e.to_string()))?;

        let encoding = EncodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| invalid(e.to_string()))?;
        let decoding =
            DecodingKey::from_rsa_pem(public_pem.as_bytes()).map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            kid,
            created_at,
            encoding,
            decoding,
            public_pem,
        })
    }

    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }

    /// SPKI PEM of the public half
    pub fn public_pem(&self) -> &str {
        &self.public_pem
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// An immutable snapshot of the loaded keys
#[derive(Debug, Clone)]
pub struct KeySet {
    keys: BTreeMap<String, Arc<SigningKey>>,
    current: Arc<SigningKey>,
}

impl KeySet {
    pub fn current(&self) -> &Arc<SigningKey> {
        &self.current
    }

    pub fn get(&self, kid: &str) -> Option<&Arc<SigningKey>> {
        self.keys.get(kid)
    }

    pub fn kids(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    /// A key stops being current at this age
    pub expiration: Duration,
}

impl RotationPolicy {
    pub fn new(expiration: Duration) -> Self {
        Self { expiration }
    }

    /// A key is dropped entirely at this age
    pub fn disabled_after(&self) -> Duration {
        self.expiration * 2
    }
}

/// Generates a fresh RSA private key as PKCS#8 PEM on the blocking pool
pub async fn generate_private_key_pem() -> Result<String, KeyStoreError> {
    tokio::task::spawn_blocking(generate_pem)
        .await
        .map_err(|e| KeyStoreError::Generate(format!("key generation task failed: {}", e)))?
}

fn generate_pem() -> Result<String, KeyStoreError> {
    let key = RsaPrivateKey::new(&mut rand::thread_rng(), KEY_BITS)
        .map_err(|e| KeyStoreError::Generate(e.to_string()))?;
    let pem = key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| KeyStoreError::Generate(e.to_string()))?;
    Ok(pem.as_str().to_owned())
}

pub struct KeyStore {
    source: Arc<dyn KeySource>,
    policy: RotationPolicy,
    snapshot: RwLock<Arc<KeySet>>,
}

impl std::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStore")
            .field("source", &self.source.name())
            .field("policy", &self.policy)
            .field("current", &self.current().kid)
            .finish()
    }
}

impl KeyStore {
    /// Loads the key set, minting a new current key if none qualifies
    ///
    /// # Errors
    ///
    /// Fails if the source is unreachable or a minted key cannot be stored.
    pub async fn new(
        source: Arc<dyn KeySource>,
        policy: RotationPolicy,
        now: DateTime<Utc>,
    ) -> Result<Self, KeyStoreError> {
        let set = Self::load(source.as_ref(), &policy, now).await?;
        info!(
            source = source.name(),
            keys = set.len(),
            current = %set.current.kid,
            "Key store ready"
        );

        Ok(Self {
            source,
            policy,
            snapshot: RwLock::new(Arc::new(set)),
        })
    }

    async fn load(
        source: &dyn KeySource,
        policy: &RotationPolicy,
        now: DateTime<Utc>,
    ) -> Result<KeySet, KeyStoreError> {
        let mut keys = BTreeMap::new();

        for version in source.versions(now).await? {
            let age = now - version.created_at;
            if age >= policy.disabled_after() {
                debug!(kid = %version.kid, "Skipping disabled key");
                continue;
            }

            let pem = source.load(&version.kid).await?;
            match SigningKey::from_pem(version.kid.clone(), version.created_at, &pem) {
                Ok(key) => {
                    keys.insert(version.kid, Arc::new(key));
                }
                Err(e) => warn!(kid = %version.kid, error = %e, "Skipping unreadable key"),
            }
        }

        let current = keys
            .values()
            .filter(|key| now - key.created_at < policy.expiration)
            .max_by_key(|key| key.created_at)
            .cloned();

        let current = match current {
            Some(key) => key,
            None => {
                info!(source = source.name(), "No current signing key, minting one");
                let pem = generate_private_key_pem().await?;
                let version = source.persist(&pem, now).await?;
                let key = Arc::new(SigningKey::from_pem(version.kid.clone(), version.created_at, &pem)?);
                keys.insert(version.kid, key.clone());
                key
            }
        };

        Ok(KeySet { keys, current })
    }

    fn snapshot(&self) -> Arc<KeySet> {
        self.snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// The key new tokens are signed with
    pub fn current(&self) -> Arc<SigningKey> {
        self.snapshot().current.clone()
    }

    /// The key for `kid`, whose public half verifies its tokens
    pub fn public(&self, kid: &str) -> Result<Arc<SigningKey>, KeyStoreError> {
        self.snapshot()
            .get(kid)
            .cloned()
            .ok_or_else(|| KeyStoreError::UnknownKid(kid.to_string()))
    }

    /// The full snapshot
    pub fn keys(&self) -> Arc<KeySet> {
        self.snapshot()
    }

    pub fn policy(&self) -> RotationPolicy {
        self.policy
    }

    /// Reloads the key set as of `now` and publishes it
    ///
    /// Returns the current key of the new set.
    pub async fn rotate(&self, now: DateTime<Utc>) -> Result<Arc<SigningKey>, KeyStoreError> {
        let set = Arc::new(Self::load(self.source.as_ref(), &self.policy, now).await?);
        let current = set.current.clone();

        *self
            .snapshot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = set;

        info!(current = %current.kid, "Signing keys rotated");
        Ok(current)
    }
}
