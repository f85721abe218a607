//! SecurityGroup and SKS endpoint configuration (spec.md §4.C, §4.E).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecurityPolicyId {
    Aes128Ctr,
    Aes256Ctr,
}

impl SecurityPolicyId {
    pub fn uri(self) -> &'static str {
        match self {
            SecurityPolicyId::Aes128Ctr => {
                "http://opcfoundation.org/UA/SecurityPolicy#PubSub-Aes128-CTR"
            }
            SecurityPolicyId::Aes256Ctr => {
                "http://opcfoundation.org/UA/SecurityPolicy#PubSub-Aes256-CTR"
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityGroupConfig {
    pub security_group_id: String,
    pub policy: SecurityPolicyId,
    pub max_past_keys: u32,
    pub max_future_keys: u32,
    pub key_lifetime_ms: u64,
    /// Users authorized to call GetSecurityKeys/SetSecurityKeys for this
    /// group (§4.E authz gate).
    #[serde(default)]
    pub allowed_users: Vec<String>,
    #[serde(default)]
    pub sks: Option<SksClientConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SksClientConfig {
    /// `opc.tcp://` endpoint of the remote SKS node (§4.E step 2).
    pub endpoint_url: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl SecurityGroupConfig {
    pub fn unsecured(security_group_id: impl Into<String>) -> Self {
        Self {
            security_group_id: security_group_id.into(),
            policy: SecurityPolicyId::Aes256Ctr,
            max_past_keys: 1,
            max_future_keys: 1,
            key_lifetime_ms: 1000,
            allowed_users: Vec::new(),
            sks: None,
        }
    }
}
