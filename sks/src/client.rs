//! Pull side of the SKS protocol: `getSecurityKeysAndStore` and the
//! half-key-lifetime rescheduling loop (spec.md §4.E).

use std::sync::Arc;
use std::time::Duration;

use pubsub_keystorage::KeyStorage;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::error::Result;
use crate::protocol::GetSecurityKeysRequest;
use crate::transport::SksTransport;

/// Drives one SecurityGroup's periodic pull against a remote SKS endpoint,
/// storing results into the group's [`KeyStorage`] and re-arming itself at
/// half the returned key lifetime, per §4.C's `scheduleRollover` note.
pub struct SksClient {
    security_group_id: String,
    storage: Arc<Mutex<KeyStorage>>,
    transport: Arc<dyn SksTransport>,
}

impl SksClient {
    pub fn new(
        security_group_id: impl Into<String>,
        storage: Arc<Mutex<KeyStorage>>,
        transport: Arc<dyn SksTransport>,
    ) -> Self {
        Self {
            security_group_id: security_group_id.into(),
            storage,
            transport,
        }
    }

    /// §4.E pull: requests all available keys, stores them, and returns the
    /// delay to wait before pulling again (half the reported key lifetime).
    pub async fn get_security_keys_and_store(&self) -> Result<Duration> {
        let request = GetSecurityKeysRequest::all(self.security_group_id.clone());
        debug!(security_group_id = %self.security_group_id, "pulling security keys from SKS");
        let response = self.transport.get_security_keys(request).await?;

        let mut storage = self.storage.lock().await;

        let bound_uri = storage.policy().uri();
        if response.security_policy_uri != bound_uri {
            return Err(crate::error::SksError::SecurityPolicyRejected {
                security_group_id: self.security_group_id.clone(),
                response_policy_uri: response.security_policy_uri.clone(),
            });
        }

        if response.keys.is_empty() {
            return Ok(response.key_lifetime / 2);
        }
        let current_key = response.keys[0].clone();
        let future_keys = response.keys[1..].to_vec();

        let known = storage.list_ref_key(response.first_token_id).is_some();
        if known {
            storage.merge_forward(response.first_token_id, current_key, future_keys)?;
        } else {
            storage.replace_all(response.first_token_id, current_key, future_keys);
        }
        storage.set_current(response.first_token_id)?;

        info!(
            security_group_id = %self.security_group_id,
            first_token_id = response.first_token_id,
            key_count = storage.len(),
            "applied GetSecurityKeys response"
        );

        Ok(response.key_lifetime / 2)
    }

    /// Runs the pull/reschedule loop until `transport` reports a terminal
    /// error; intended to be spawned as its own task per SecurityGroup.
    pub async fn run(&self) {
        loop {
            match self.get_security_keys_and_store().await {
                Ok(delay) => {
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(
                        security_group_id = %self.security_group_id,
                        error = %e,
                        "SKS pull failed, retrying after key lifetime fallback"
                    );
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
}
