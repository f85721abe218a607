//! Push/pull-serving side of the SKS protocol: the authz gate and
//! reconciliation logic exposed under the `PublishSubscribe` node
//! (spec.md §4.E).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use pubsub_keystorage::KeyStorage;
use tracing::{info, warn};

use crate::error::{Result, SksError};
use crate::protocol::{
    CallerContext, GetSecurityKeysRequest, GetSecurityKeysResponse, SetSecurityKeysRequest,
};

struct SecurityGroupEntry {
    storage: Mutex<KeyStorage>,
    security_policy_uri: String,
    allowed_users: Vec<String>,
}

/// Serves `GetSecurityKeys`/`SetSecurityKeys` for a fixed set of
/// SecurityGroups, gating every call on channel security mode and a
/// per-group user allow list before touching any key state.
pub struct SksServer {
    groups: HashMap<String, SecurityGroupEntry>,
}

impl SksServer {
    pub fn new() -> Self {
        Self {
            groups: HashMap::new(),
        }
    }

    pub fn register_group(
        &mut self,
        storage: KeyStorage,
        security_policy_uri: impl Into<String>,
        allowed_users: Vec<String>,
    ) {
        let security_group_id = storage.security_group_id().to_string();
        self.groups.insert(
            security_group_id,
            SecurityGroupEntry {
                storage: Mutex::new(storage),
                security_policy_uri: security_policy_uri.into(),
                allowed_users,
            },
        );
    }

    fn authorize<'a>(
        &'a self,
        ctx: &CallerContext,
        security_group_id: &str,
    ) -> Result<&'a SecurityGroupEntry> {
        if !ctx.channel_is_sign_and_encrypt {
            return Err(SksError::SecurityModeInsufficient);
        }
        let entry = self
            .groups
            .get(security_group_id)
            .ok_or_else(|| SksError::NotFound(security_group_id.to_string()))?;
        if !entry.allowed_users.iter().any(|u| u == &ctx.user) {
            warn!(
                security_group_id,
                user = %ctx.user,
                "GetSecurityKeys/SetSecurityKeys denied: user not in allow list"
            );
            return Err(SksError::UserAccessDenied(security_group_id.to_string()));
        }
        Ok(entry)
    }

    /// §4.E step "GetSecurityKeys": returns at most `1 + maxFutureKeyCount`
    /// keys starting at the resolved first id.
    pub fn get_security_keys(
        &self,
        ctx: &CallerContext,
        request: GetSecurityKeysRequest,
    ) -> Result<GetSecurityKeysResponse> {
        let entry = self.authorize(ctx, &request.security_group_id)?;
        let storage = entry.storage.lock().expect("keystorage mutex poisoned");

        let current_id = storage
            .current_key_id()
            .ok_or_else(|| SksError::InternalError("security group has no current key".into()))?;

        let first_token_id = if request.starting_token_id == 0 {
            current_id
        } else {
            request.starting_token_id
        };

        let max_count = if request.requested_key_count == u32::MAX {
            u32::MAX
        } else {
            request.requested_key_count.max(1)
        };

        let mut keys = Vec::new();
        let mut id = first_token_id;
        loop {
            let Some(key) = storage.list_ref_key(id) else {
                break;
            };
            keys.push(key);
            if keys.len() as u32 >= max_count {
                break;
            }
            id = id.wrapping_add(1);
        }
        if keys.is_empty() {
            if let Some(key) = storage.list_ref_key(current_id) {
                keys.push(key);
            }
        }

        info!(
            security_group_id = %request.security_group_id,
            user = %ctx.user,
            returned = keys.len(),
            "GetSecurityKeys served"
        );

        Ok(GetSecurityKeysResponse {
            security_policy_uri: entry.security_policy_uri.clone(),
            first_token_id,
            keys,
            time_to_next_key: storage.key_lifetime(),
            key_lifetime: storage.key_lifetime(),
        })
    }

    /// §4.E step "SetSecurityKeys": if `current_token_id` matches an
    /// existing key, merge forward from that id preserving monotonicity;
    /// otherwise replace the entire list.
    pub fn set_security_keys(
        &self,
        ctx: &CallerContext,
        request: SetSecurityKeysRequest,
    ) -> Result<()> {
        let entry = self.authorize(ctx, &request.security_group_id)?;
        let mut storage = entry.storage.lock().expect("keystorage mutex poisoned");

        let known = storage.list_ref_key(request.current_token_id).is_some();
        if !known {
            storage.replace_all(
                request.current_token_id,
                request.current_key,
                request.future_keys,
            );
        } else {
            storage.merge_forward(
                request.current_token_id,
                request.current_key,
                request.future_keys,
            )?;
        }
        storage.set_current(request.current_token_id)?;

        info!(
            security_group_id = %request.security_group_id,
            user = %ctx.user,
            current_token_id = request.current_token_id,
            "SetSecurityKeys applied"
        );
        Ok(())
    }
}

impl Default for SksServer {
    fn default() -> Self {
        Self::new()
    }
}

/// How long the periodic rollover timer should sleep before acting again;
/// used by callers wiring a `SksServer`'s groups into a tick loop.
pub fn rollover_interval(key_lifetime: Duration) -> Duration {
    key_lifetime
}

#[cfg(test)]
mod tests {
    use super::*;
    use pubsub_codec::security::SecurityPolicy;

    fn make_key(byte: u8) -> Vec<u8> {
        vec![byte; 32 + 32 + 8]
    }

    fn authorized_ctx() -> CallerContext {
        CallerContext {
            user: "user1".to_string(),
            channel_is_sign_and_encrypt: true,
        }
    }

    fn server_with_group() -> SksServer {
        let mut storage = KeyStorage::new(
            "TestSecurityGroup",
            SecurityPolicy::Aes256CtrHmacSha256,
            2,
            2,
            Duration::from_millis(1000),
        );
        storage.add_keys(vec![make_key(1), make_key(2), make_key(3)], 1);
        storage.set_current(1).unwrap();

        let mut server = SksServer::new();
        server.register_group(
            storage,
            "http://opcfoundation.org/UA/SecurityPolicy#PubSub-Aes256-CTR",
            vec!["user1".to_string()],
        );
        server
    }

    #[test]
    fn denies_user_not_on_allow_list() {
        let server = server_with_group();
        let ctx = CallerContext {
            user: "user2".to_string(),
            channel_is_sign_and_encrypt: true,
        };
        let result = server.get_security_keys(
            &ctx,
            GetSecurityKeysRequest {
                security_group_id: "TestSecurityGroup".to_string(),
                starting_token_id: 1,
                requested_key_count: 1,
            },
        );
        assert!(matches!(result, Err(SksError::UserAccessDenied(_))));
    }

    #[test]
    fn denies_channel_without_sign_and_encrypt() {
        let server = server_with_group();
        let ctx = CallerContext {
            user: "user1".to_string(),
            channel_is_sign_and_encrypt: false,
        };
        let result = server.get_security_keys(&ctx, GetSecurityKeysRequest::current_only("TestSecurityGroup"));
        assert!(matches!(result, Err(SksError::SecurityModeInsufficient)));
    }

    #[test]
    fn get_security_keys_current_only_returns_single_key() {
        let server = server_with_group();
        let ctx = authorized_ctx();
        let response = server
            .get_security_keys(&ctx, GetSecurityKeysRequest::current_only("TestSecurityGroup"))
            .unwrap();
        assert_eq!(response.keys.len(), 1);
        assert_eq!(response.first_token_id, 1);
    }

    #[test]
    fn set_security_keys_rolls_current_forward() {
        let server = server_with_group();
        let ctx = authorized_ctx();
        server
            .set_security_keys(
                &ctx,
                SetSecurityKeysRequest {
                    security_group_id: "TestSecurityGroup".to_string(),
                    security_policy_uri: "http://opcfoundation.org/UA/SecurityPolicy#PubSub-Aes256-CTR"
                        .to_string(),
                    current_token_id: 3,
                    current_key: make_key(3),
                    future_keys: vec![],
                    time_to_next_key: Duration::from_millis(500),
                    key_lifetime: Duration::from_millis(1000),
                },
            )
            .unwrap();

        let response = server
            .get_security_keys(&ctx, GetSecurityKeysRequest::current_only("TestSecurityGroup"))
            .unwrap();
        assert_eq!(response.first_token_id, 3);
    }
}
