//! High-level API for the session credential.

use crate::{
    Credential, SessionMeta, StorageBackend, StorageKeys, StoreError, StoreResult, LEGACY_KEYS,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

struct Inner {
    backend: Box<dyn StorageBackend>,
    writer_claimed: AtomicBool,
}

/// Cheap-clone handle to the canonical credential location.
///
/// All clones share one backend and one writer slot. Exactly one component
/// (the identity client) may claim the writer slot; everything else is a
/// reader.
#[derive(Clone)]
pub struct CredentialStore {
    inner: Arc<Inner>,
}

impl CredentialStore {
    /// Create a store over the given backend.
    pub fn new(backend: Box<dyn StorageBackend>) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                writer_claimed: AtomicBool::new(false),
            }),
        }
    }

    /// Read the stored credential, if any.
    ///
    /// A present-but-undecodable value surfaces as `StoreError::Corrupted`.
    pub fn read(&self) -> StoreResult<Option<Credential>> {
        match self.inner.backend.get(StorageKeys::CREDENTIAL)? {
            Some(raw) => {
                let credential = serde_json::from_str(&raw)
                    .map_err(|e| StoreError::Corrupted(e.to_string()))?;
                Ok(Some(credential))
            }
            None => Ok(None),
        }
    }

    /// Write the credential under the canonical key, replacing any previous one.
    pub fn write(&self, credential: &Credential) -> StoreResult<()> {
        let raw = serde_json::to_string(credential)?;
        self.inner.backend.set(StorageKeys::CREDENTIAL, &raw)?;
        debug!("Credential written");
        Ok(())
    }

    /// Read the identity metadata stored beside the credential.
    pub fn read_meta(&self) -> StoreResult<Option<SessionMeta>> {
        match self.inner.backend.get(StorageKeys::SESSION_META)? {
            Some(raw) => {
                let meta = serde_json::from_str(&raw)
                    .map_err(|e| StoreError::Corrupted(e.to_string()))?;
                Ok(Some(meta))
            }
            None => Ok(None),
        }
    }

    /// Write the identity metadata beside the credential.
    pub fn write_meta(&self, meta: &SessionMeta) -> StoreResult<()> {
        let raw = serde_json::to_string(meta)?;
        self.inner.backend.set(StorageKeys::SESSION_META, &raw)?;
        Ok(())
    }

    /// Remove the stored credential and its metadata. Idempotent.
    pub fn clear(&self) -> StoreResult<()> {
        let existed = self.inner.backend.delete(StorageKeys::CREDENTIAL)?;
        self.inner.backend.delete(StorageKeys::SESSION_META)?;
        if existed {
            debug!("Credential cleared");
        }
        Ok(())
    }

    /// Claim the single writer slot.
    ///
    /// The identity client calls this at construction; a second claim against
    /// the same store (any clone) fails, which is how duplicate client
    /// instances are rejected before they can race on the credential key.
    pub fn claim_writer(&self) -> StoreResult<()> {
        if self
            .inner
            .writer_claimed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(StoreError::WriterAlreadyClaimed);
        }
        Ok(())
    }

    /// Release the writer slot (called when the claiming client is dropped).
    pub fn release_writer(&self) {
        self.inner.writer_claimed.store(false, Ordering::SeqCst);
    }

    /// Delete obsolete keys left behind by earlier releases.
    ///
    /// Scoped strictly to the `LEGACY_KEYS` allow-list and guarded by a
    /// persisted migration flag, so it runs at most once per install and can
    /// never remove the canonical credential. Returns true if cleanup ran.
    pub fn run_legacy_cleanup(&self) -> StoreResult<bool> {
        if self.inner.backend.has(StorageKeys::LEGACY_CLEANUP_DONE)? {
            debug!("Legacy cleanup already done, skipping");
            return Ok(false);
        }

        let mut removed = 0usize;
        for key in LEGACY_KEYS {
            match self.inner.backend.delete(key) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => warn!(key = %key, error = %e, "Failed to delete legacy key"),
            }
        }

        self.inner
            .backend
            .set(StorageKeys::LEGACY_CLEANUP_DONE, "1")?;

        info!(removed, "Legacy storage cleanup complete");
        Ok(true)
    }
}
