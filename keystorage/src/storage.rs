//! Per-SecurityGroup key storage: owns the ordered [`KeyList`], splits the
//! current key into signing/encrypting/nonce material for channel
//! activation, and schedules rollover (spec.md §4.C, §4.E).
//!
//! The reference implementation threads an opaque `context: void*` through
//! its rollover and SKS-pull callbacks. We replace that with two trait
//! objects, `RolloverSink` and `SksPuller`, so a caller's state is captured
//! in the closure/type rather than cast back out of a raw pointer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pubsub_codec::security::{SecurityKeys, SecurityPolicy};
use tracing::{debug, warn};

use crate::error::{KeyStorageError, Result};
use crate::list::KeyList;

/// Notified when a bound WriterGroup/ReaderGroup should start using a new
/// current key (its `securityTokenId` advances).
#[async_trait]
pub trait RolloverSink: Send + Sync {
    async fn on_key_activated(&self, security_group_id: &str, key_id: u32);
}

/// Triggers a GetSecurityKeys pull against the configured SKS endpoint when
/// the local list is about to run off its future end.
#[async_trait]
pub trait SksPuller: Send + Sync {
    async fn pull_more_keys(&self, security_group_id: &str) -> Result<()>;
}

/// Keying material split out of one key for use in [`pubsub_codec::security`]
/// seal/open calls. Owns its bytes so it can outlive the storage lock.
pub struct ActivatedKeys {
    pub signing_key: Vec<u8>,
    pub encrypting_key: Vec<u8>,
    pub nonce: Vec<u8>,
}

impl ActivatedKeys {
    pub fn as_security_keys(&self) -> SecurityKeys<'_> {
        SecurityKeys {
            signing_key: &self.signing_key,
            encrypting_key: &self.encrypting_key,
            nonce: &self.nonce,
        }
    }
}

pub struct KeyStorage {
    security_group_id: String,
    policy: SecurityPolicy,
    key_lifetime: Duration,
    list: KeyList,
    rollover_sink: Option<Arc<dyn RolloverSink>>,
    sks_puller: Option<Arc<dyn SksPuller>>,
}

impl KeyStorage {
    pub fn new(
        security_group_id: impl Into<String>,
        policy: SecurityPolicy,
        max_past_keys: u32,
        max_future_keys: u32,
        key_lifetime: Duration,
    ) -> Self {
        Self {
            security_group_id: security_group_id.into(),
            policy,
            key_lifetime,
            list: KeyList::new(max_past_keys, max_future_keys),
            rollover_sink: None,
            sks_puller: None,
        }
    }

    pub fn with_rollover_sink(mut self, sink: Arc<dyn RolloverSink>) -> Self {
        self.rollover_sink = Some(sink);
        self
    }

    pub fn with_sks_puller(mut self, puller: Arc<dyn SksPuller>) -> Self {
        self.sks_puller = Some(puller);
        self
    }

    pub fn security_group_id(&self) -> &str {
        &self.security_group_id
    }

    pub fn key_lifetime(&self) -> Duration {
        self.key_lifetime
    }

    pub fn policy(&self) -> SecurityPolicy {
        self.policy
    }

    /// Appends keys received from a GetSecurityKeys response or a pushed
    /// SetSecurityKeys call. Ids are assigned `first_key_id, first_key_id+1,
    /// ...` in the order given, matching the wire `addKeys` convention.
    pub fn add_keys(&mut self, keys: Vec<Vec<u8>>, first_key_id: u32) {
        self.list.add_keys(keys, first_key_id);
    }

    pub fn set_current(&mut self, key_id: u32) -> Result<()> {
        self.list.set_current(key_id)
    }

    pub fn current_key_id(&self) -> Option<u32> {
        self.list.current_key_id()
    }

    /// Returns a clone of the key bytes at `key_id`, if present. Named
    /// distinctly from the list's own borrowing `get` since callers outside
    /// this crate (the SKS server, re-serving keys over the wire) need an
    /// owned copy rather than a borrow tied to the storage's lock guard.
    pub fn list_ref_key(&self, key_id: u32) -> Option<Vec<u8>> {
        self.list.get(key_id).map(|item| item.key.clone())
    }

    pub fn replace_all(&mut self, current_token_id: u32, current_key: Vec<u8>, future_keys: Vec<Vec<u8>>) {
        self.list.replace_all(current_token_id, current_key, future_keys);
    }

    pub fn merge_forward(
        &mut self,
        current_token_id: u32,
        current_key: Vec<u8>,
        future_keys: Vec<Vec<u8>>,
    ) -> Result<()> {
        self.list.merge_forward(current_token_id, current_key, future_keys)
    }

    /// Splits the current key into signing/encrypting/nonce material sized
    /// per `self.policy`. The reference keeps these three regions packed
    /// contiguously in the raw key bytes in that order.
    pub fn activate_into_channel(&self) -> Result<ActivatedKeys> {
        let current = self.list.current().ok_or(KeyStorageError::NoCurrentItem)?;
        let sign_len = self.policy.signing_key_length();
        let enc_len = self.policy.encrypting_key_length();
        let nonce_len = self.policy.nonce_length();
        let needed = sign_len + enc_len + nonce_len;
        if current.key.len() < needed {
            return Err(KeyStorageError::InvalidConfig(format!(
                "key {} is {} bytes, policy needs at least {needed}",
                current.key_id,
                current.key.len()
            )));
        }
        Ok(ActivatedKeys {
            signing_key: current.key[..sign_len].to_vec(),
            encrypting_key: current.key[sign_len..sign_len + enc_len].to_vec(),
            nonce: current.key[sign_len + enc_len..sign_len + enc_len + nonce_len].to_vec(),
        })
    }

    /// Advances the cursor by one key and notifies the rollover sink. If the
    /// list is about to run dry, asks the SKS puller for more before giving
    /// up. Intended to run off a per-group timer at `key_lifetime` cadence.
    pub async fn rollover(&mut self) -> Result<u32> {
        if self.list.is_near_future_exhaustion() {
            if let Some(puller) = &self.sks_puller {
                debug!(
                    security_group_id = %self.security_group_id,
                    "future key list exhausted, pulling more keys from SKS"
                );
                puller.pull_more_keys(&self.security_group_id).await?;
            }
        }

        match self.list.roll_forward() {
            Ok(item) => {
                let key_id = item.key_id;
                if let Some(sink) = &self.rollover_sink {
                    sink.on_key_activated(&self.security_group_id, key_id).await;
                }
                Ok(key_id)
            }
            Err(e) => {
                warn!(
                    security_group_id = %self.security_group_id,
                    "rollover could not advance: key list exhausted"
                );
                Err(e)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct RecordingSink {
        last: AtomicU32,
    }

    #[async_trait]
    impl RolloverSink for RecordingSink {
        async fn on_key_activated(&self, _security_group_id: &str, key_id: u32) {
            self.last.store(key_id, Ordering::SeqCst);
        }
    }

    struct FixedPuller;

    #[async_trait]
    impl SksPuller for FixedPuller {
        async fn pull_more_keys(&self, _security_group_id: &str) -> Result<()> {
            Ok(())
        }
    }

    fn make_key(byte: u8) -> Vec<u8> {
        vec![byte; 32 + 32 + 8]
    }

    #[tokio::test]
    async fn rollover_advances_and_notifies_sink() {
        let sink = Arc::new(RecordingSink {
            last: AtomicU32::new(0),
        });
        let mut storage = KeyStorage::new(
            "group-1",
            SecurityPolicy::Aes256CtrHmacSha256,
            2,
            2,
            Duration::from_secs(1),
        )
        .with_rollover_sink(sink.clone());

        storage.add_keys(vec![make_key(1), make_key(2)], 10);
        storage.set_current(10).unwrap();

        let new_id = storage.rollover().await.unwrap();
        assert_eq!(new_id, 11);
        assert_eq!(sink.last.load(Ordering::SeqCst), 11);
    }

    #[tokio::test]
    async fn rollover_pulls_more_keys_at_tail() {
        let mut storage = KeyStorage::new(
            "group-1",
            SecurityPolicy::Aes128CtrHmacSha256,
            2,
            2,
            Duration::from_secs(1),
        )
        .with_sks_puller(Arc::new(FixedPuller));

        storage.add_keys(vec![make_key(1)], 1);
        storage.set_current(1).unwrap();

        // Only one key exists; the puller is consulted but still can't
        // conjure a next key out of thin air, so rollover fails cleanly.
        assert!(storage.rollover().await.is_err());
    }

    #[test]
    fn activate_into_channel_splits_key_by_policy_lengths() {
        let mut storage = KeyStorage::new(
            "group-1",
            SecurityPolicy::Aes128CtrHmacSha256,
            1,
            1,
            Duration::from_secs(1),
        );
        storage.add_keys(vec![make_key(9)], 5);
        storage.set_current(5).unwrap();

        let activated = storage.activate_into_channel().unwrap();
        assert_eq!(activated.signing_key.len(), 32);
        assert_eq!(activated.encrypting_key.len(), 16);
        assert_eq!(activated.nonce.len(), 8);
    }

    #[test]
    fn activate_into_channel_rejects_undersized_key() {
        let mut storage = KeyStorage::new(
            "group-1",
            SecurityPolicy::Aes256CtrHmacSha256,
            1,
            1,
            Duration::from_secs(1),
        );
        storage.add_keys(vec![vec![0u8; 4]], 1);
        storage.set_current(1).unwrap();
        assert!(storage.activate_into_channel().is_err());
    }
}
