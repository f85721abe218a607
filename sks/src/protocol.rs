//! Wire-level shapes for the two standardized SKS methods (spec.md §4.E).
//! These model the positional arguments/return values of
//! `PublishSubscribe_GetSecurityKeys`/`PublishSubscribe_SetSecurityKeys`
//! without committing to a particular RPC transport — the session/channel
//! that carries them is represented by [`crate::transport::SksTransport`].

use std::time::Duration;

/// `startingTokenId == 0` means "current"; `requestedKeyCount == u32::MAX`
/// means "all available".
pub const STARTING_TOKEN_ID_CURRENT: u32 = 0;
pub const REQUESTED_KEY_COUNT_ALL: u32 = u32::MAX;

#[derive(Debug, Clone)]
pub struct GetSecurityKeysRequest {
    pub security_group_id: String,
    pub starting_token_id: u32,
    pub requested_key_count: u32,
}

impl GetSecurityKeysRequest {
    pub fn current_only(security_group_id: impl Into<String>) -> Self {
        Self {
            security_group_id: security_group_id.into(),
            starting_token_id: STARTING_TOKEN_ID_CURRENT,
            requested_key_count: 0,
        }
    }

    pub fn all(security_group_id: impl Into<String>) -> Self {
        Self {
            security_group_id: security_group_id.into(),
            starting_token_id: STARTING_TOKEN_ID_CURRENT,
            requested_key_count: REQUESTED_KEY_COUNT_ALL,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GetSecurityKeysResponse {
    pub security_policy_uri: String,
    pub first_token_id: u32,
    pub keys: Vec<Vec<u8>>,
    pub time_to_next_key: Duration,
    pub key_lifetime: Duration,
}

#[derive(Debug, Clone)]
pub struct SetSecurityKeysRequest {
    pub security_group_id: String,
    pub security_policy_uri: String,
    pub current_token_id: u32,
    pub current_key: Vec<u8>,
    pub future_keys: Vec<Vec<u8>>,
    pub time_to_next_key: Duration,
    pub key_lifetime: Duration,
}

/// Caller identity behind the secure channel, as far as these methods care:
/// a session user name checked against a SecurityGroup's allow list, plus
/// whether the channel itself meets the SignAndEncrypt requirement.
#[derive(Debug, Clone)]
pub struct CallerContext {
    pub user: String,
    pub channel_is_sign_and_encrypt: bool,
}
