use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::fs;
use std::future::Future;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::errors::{StoreError, StoreResult};

const DEFAULT_STORE_DIR: &str = "/var/lib/facematch/signatures";
const STORE_DIR_ENV: &str = "FACEMATCH_STORE_DIR";
const RECORD_EXTENSION: &str = "json";
const RECORD_VERSION: u32 = 1;
const RECORD_ALGORITHM: &str = "AES-256-GCM";
const RECORD_NONCE_LEN: usize = 12;
const STORE_KEY_LEN: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignatureRecord {
    pub identity_id: String,
    pub signature: Vec<f64>,
    pub registered_at: DateTime<Utc>,
}

impl SignatureRecord {
    pub fn new(identity_id: &str, signature: &[f64]) -> Self {
        Self {
            identity_id: identity_id.to_string(),
            signature: signature.to_vec(),
            registered_at: Utc::now(),
        }
    }
}

/// Durable identity → signature mapping.
///
/// `put` is an upsert and must be visible to the next `list` once it returns. A `list`
/// racing a `put` may see the old or the new record for that identity, never a torn one.
#[async_trait]
pub trait SignatureStore: Send + Sync {
    async fn put(&self, identity_id: &str, signature: &[f64]) -> StoreResult<SignatureRecord>;

    /// Snapshot of every record. An empty store yields an empty vector.
    async fn list(&self) -> StoreResult<Vec<SignatureRecord>>;

    /// Removes the record entirely. Returns whether one existed.
    async fn delete(&self, identity_id: &str) -> StoreResult<bool>;
}

/// Bounds a store call; dropping the returned future cancels the call.
///
/// A filesystem `put` that is cancelled before its record is renamed into place leaves the
/// store untouched. The rename itself is not interruptible, so a write cancelled while it is
/// being committed can still land; `put` is an upsert, so retrying it is harmless.
pub async fn with_store_timeout<T, F>(timeout: Duration, call: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(timeout)),
    }
}

/// Process-local store. Enumerates in identity order.
#[derive(Debug, Default)]
pub struct MemorySignatureStore {
    records: RwLock<BTreeMap<String, SignatureRecord>>,
}

impl MemorySignatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = SignatureRecord>) -> Self {
        let map = records
            .into_iter()
            .map(|record| (record.identity_id.clone(), record))
            .collect();
        Self {
            records: RwLock::new(map),
        }
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend("in-memory store lock poisoned".into())
}

#[async_trait]
impl SignatureStore for MemorySignatureStore {
    async fn put(&self, identity_id: &str, signature: &[f64]) -> StoreResult<SignatureRecord> {
        let record = SignatureRecord::new(identity_id, signature);
        let mut records = self.records.write().map_err(|_| poisoned())?;
        records.insert(identity_id.to_string(), record.clone());
        Ok(record)
    }

    async fn list(&self) -> StoreResult<Vec<SignatureRecord>> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records.values().cloned().collect())
    }

    async fn delete(&self, identity_id: &str) -> StoreResult<bool> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        Ok(records.remove(identity_id).is_some())
    }
}

/// AES-256-GCM key for at-rest record encryption.
#[derive(Clone, PartialEq, Eq)]
pub struct StoreKey([u8; STORE_KEY_LEN]);

impl StoreKey {
    pub fn from_bytes(bytes: &[u8]) -> StoreResult<Self> {
        let key: [u8; STORE_KEY_LEN] = bytes.try_into().map_err(|_| {
            StoreError::Encryption(format!(
                "store key must be {STORE_KEY_LEN} bytes, found {}",
                bytes.len()
            ))
        })?;
        Ok(Self(key))
    }

    pub fn from_base64(encoded: &str) -> StoreResult<Self> {
        let bytes = general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|err| StoreError::Encryption(format!("invalid store key encoding: {err}")))?;
        Self::from_bytes(&bytes)
    }

    pub fn generate() -> Self {
        let mut key = [0u8; STORE_KEY_LEN];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StoreKey(..)")
    }
}

/// One JSON document per identity in a single directory.
#[derive(Debug, Clone)]
pub struct FilesystemSignatureStore {
    dir: PathBuf,
    key: Option<StoreKey>,
}

impl FilesystemSignatureStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            key: None,
        }
    }

    pub fn with_key(mut self, key: StoreKey) -> Self {
        self.key = Some(key);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record_path(&self, identity_id: &str) -> PathBuf {
        record_path(&self.dir, identity_id)
    }
}

#[async_trait]
impl SignatureStore for FilesystemSignatureStore {
    async fn put(&self, identity_id: &str, signature: &[f64]) -> StoreResult<SignatureRecord> {
        let record = SignatureRecord::new(identity_id, signature);
        let path = self.record_path(identity_id);
        let key = self.key.clone();
        let written = record.clone();
        let guard = CancelOnDrop::new();
        let cancelled = guard.flag();
        run_blocking(move || write_record(&path, &written, key.as_ref(), &cancelled)).await?;
        guard.disarm();
        Ok(record)
    }

    async fn list(&self) -> StoreResult<Vec<SignatureRecord>> {
        let dir = self.dir.clone();
        let key = self.key.clone();
        run_blocking(move || read_records(&dir, key.as_ref())).await
    }

    async fn delete(&self, identity_id: &str) -> StoreResult<bool> {
        let path = self.record_path(identity_id);
        run_blocking(move || match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StoreError::Write { path, source }),
        })
        .await
    }
}

/// Raises its flag when dropped while armed, i.e. when the awaiting future goes away.
struct CancelOnDrop {
    flag: Arc<AtomicBool>,
    armed: bool,
}

impl CancelOnDrop {
    fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            armed: true,
        }
    }

    fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.armed {
            self.flag.store(true, Ordering::SeqCst);
        }
    }
}

async fn run_blocking<T, F>(task: F) -> StoreResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> StoreResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|err| StoreError::Backend(format!("store task failed: {err}")))?
}

/// Explicit value, then `$FACEMATCH_STORE_DIR`, then the system default.
pub fn resolve_store_dir(override_dir: Option<&Path>) -> PathBuf {
    if let Some(dir) = override_dir {
        dir.to_path_buf()
    } else if let Ok(env_value) = env::var(STORE_DIR_ENV) {
        PathBuf::from(env_value)
    } else {
        PathBuf::from(DEFAULT_STORE_DIR)
    }
}

// Identity ids are opaque; URL-safe base64 keeps them filesystem-safe and reversible.
fn record_path(dir: &Path, identity_id: &str) -> PathBuf {
    let stem = general_purpose::URL_SAFE_NO_PAD.encode(identity_id.as_bytes());
    dir.join(format!("{stem}.{RECORD_EXTENSION}"))
}

fn identity_from_path(path: &Path) -> Option<String> {
    if path.extension()?.to_str()? != RECORD_EXTENSION {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let bytes = general_purpose::URL_SAFE_NO_PAD.decode(stem).ok()?;
    String::from_utf8(bytes).ok()
}

fn write_record(
    path: &Path,
    record: &SignatureRecord,
    key: Option<&StoreKey>,
    cancelled: &AtomicBool,
) -> StoreResult<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|source| StoreError::Write {
        path: parent.to_path_buf(),
        source,
    })?;

    let serialized = match key {
        Some(key) => serialize_encrypted_record(record, key)?,
        None => serde_json::to_vec_pretty(record)?,
    };

    let mut tmp = NamedTempFile::new_in(parent).map_err(|source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    })?;

    {
        let file = tmp.as_file_mut();
        {
            let mut writer = BufWriter::new(&mut *file);
            writer
                .write_all(&serialized)
                .and_then(|_| writer.write_all(b"\n"))
                .and_then(|_| writer.flush())
                .map_err(|source| StoreError::Write {
                    path: path.to_path_buf(),
                    source,
                })?;
        }
        file.sync_all().map_err(|source| StoreError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    }

    // Last point at which the write can be abandoned; the temp file is removed on drop.
    if cancelled.load(Ordering::SeqCst) {
        debug!(path = %path.display(), "signature write cancelled before commit");
        return Err(StoreError::Cancelled);
    }

    let file = tmp.persist(path).map_err(|err| StoreError::Write {
        path: path.to_path_buf(),
        source: err.error,
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))
            .map_err(|source| StoreError::Write {
                path: path.to_path_buf(),
                source,
            })?;
    }
    #[cfg(not(unix))]
    drop(file);

    debug!(path = %path.display(), identity = %record.identity_id, "wrote signature record");
    Ok(())
}

fn read_records(dir: &Path, key: Option<&StoreKey>) -> StoreResult<Vec<SignatureRecord>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(StoreError::Read {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| StoreError::Read {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if let Some(identity) = identity_from_path(&path) {
            paths.push((path, identity));
        }
    }
    paths.sort();

    let mut records = Vec::with_capacity(paths.len());
    for (path, identity) in paths {
        let data = match fs::read(&path) {
            Ok(data) => data,
            // Deleted between read_dir and read.
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(source) => return Err(StoreError::Read { path, source }),
        };

        match decode_record(&path, &data, key) {
            Ok(record) if record.identity_id == identity => records.push(record),
            Ok(record) => warn!(
                path = %path.display(),
                found = %record.identity_id,
                expected = %identity,
                "skipping signature record stored under another identity"
            ),
            Err(StoreError::InvalidRecord { message, .. }) => warn!(
                path = %path.display(),
                %message,
                "skipping unreadable signature record"
            ),
            Err(err) => return Err(err),
        }
    }

    Ok(records)
}

fn decode_record(path: &Path, data: &[u8], key: Option<&StoreKey>) -> StoreResult<SignatureRecord> {
    if let Ok(wrapper) = serde_json::from_slice::<EncryptedRecord>(data) {
        return decrypt_record(path, wrapper, key);
    }

    // A keyed store only trusts records it can authenticate.
    if key.is_some() {
        return Err(StoreError::InvalidRecord {
            path: path.to_path_buf(),
            message: "plaintext record in an encrypted store".into(),
        });
    }

    serde_json::from_slice(data).map_err(|err| StoreError::InvalidRecord {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

fn serialize_encrypted_record(record: &SignatureRecord, key: &StoreKey) -> StoreResult<Vec<u8>> {
    let plaintext = serde_json::to_vec(record)?;
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|_| StoreError::Encryption("invalid AES-GCM key length".into()))?;
    let mut nonce = [0u8; RECORD_NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext.as_ref())
        .map_err(|err| StoreError::Encryption(format!("failed to encrypt record: {err}")))?;
    let wrapper = EncryptedRecord {
        version: RECORD_VERSION,
        algorithm: RECORD_ALGORITHM.to_string(),
        nonce: general_purpose::STANDARD.encode(nonce),
        ciphertext: general_purpose::STANDARD.encode(ciphertext),
    };
    Ok(serde_json::to_vec_pretty(&wrapper)?)
}

fn decrypt_record(
    path: &Path,
    wrapper: EncryptedRecord,
    key: Option<&StoreKey>,
) -> StoreResult<SignatureRecord> {
    if wrapper.algorithm != RECORD_ALGORITHM {
        return Err(StoreError::Encryption(format!(
            "unsupported record algorithm '{}'",
            wrapper.algorithm
        )));
    }
    if wrapper.version != RECORD_VERSION {
        return Err(StoreError::Encryption(format!(
            "unsupported record version {}",
            wrapper.version
        )));
    }

    let key = key.ok_or_else(|| StoreError::EncryptedRecordRequiresKey {
        path: path.to_path_buf(),
    })?;

    let nonce = general_purpose::STANDARD
        .decode(wrapper.nonce.trim())
        .map_err(|err| StoreError::Encryption(format!("invalid nonce encoding: {err}")))?;
    if nonce.len() != RECORD_NONCE_LEN {
        return Err(StoreError::Encryption(format!(
            "expected nonce of {} bytes but found {}",
            RECORD_NONCE_LEN,
            nonce.len()
        )));
    }

    let ciphertext = general_purpose::STANDARD
        .decode(wrapper.ciphertext.trim())
        .map_err(|err| StoreError::Encryption(format!("invalid ciphertext encoding: {err}")))?;

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|_| StoreError::Encryption("invalid AES-GCM key length".into()))?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
        .map_err(|err| StoreError::Encryption(format!("failed to decrypt record: {err}")))?;

    serde_json::from_slice(&plaintext).map_err(|err| StoreError::InvalidRecord {
        path: path.to_path_buf(),
        message: format!("invalid decrypted record: {err}"),
    })
}

#[derive(Serialize, Deserialize)]
struct EncryptedRecord {
    version: u32,
    algorithm: String,
    nonce: String,
    ciphertext: String,
}
