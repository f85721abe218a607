//! Message-level security framing: signing and encryption of NetworkMessage
//! bytes under a SecurityPolicy, keyed by the (signingKey, encryptingKey,
//! keyNonce) triple a keystorage channel activation produces.
//!
//! Signing covers the header and payload; encryption covers only the
//! payload span. This mirrors the split `build_with_payload_offset` already
//! draws in [`crate::wire::builder`].

use aes::cipher::{KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{CodecError, CodecResult};

type Aes128Ctr = ctr::Ctr64BE<aes::Aes128>;
type Aes256Ctr = ctr::Ctr64BE<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// The symmetric policies a SecurityGroup can select. Policy URIs map onto
/// these the way a keystorage's `maxKeyLength` table does for OPC-UA's
/// published policy set; this core only implements the CTR/HMAC pair each
/// policy standardizes on, not every policy in the official registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityPolicy {
    Aes128CtrHmacSha256,
    Aes256CtrHmacSha256,
}

impl SecurityPolicy {
    pub fn signing_key_length(self) -> usize {
        32
    }

    pub fn encrypting_key_length(self) -> usize {
        match self {
            SecurityPolicy::Aes128CtrHmacSha256 => 16,
            SecurityPolicy::Aes256CtrHmacSha256 => 32,
        }
    }

    pub fn nonce_length(self) -> usize {
        8
    }

    pub fn signature_length(self) -> usize {
        32
    }

    /// The policy URI an SKS exchange carries for this policy, matching the
    /// registered OPC-UA PubSub security policy set.
    pub fn uri(self) -> &'static str {
        match self {
            SecurityPolicy::Aes128CtrHmacSha256 => {
                "http://opcfoundation.org/UA/SecurityPolicy#PubSub-Aes128-CTR"
            }
            SecurityPolicy::Aes256CtrHmacSha256 => {
                "http://opcfoundation.org/UA/SecurityPolicy#PubSub-Aes256-CTR"
            }
        }
    }
}

/// Activated keying material for one channel, as produced by a keystorage
/// `activateIntoChannel` call.
pub struct SecurityKeys<'a> {
    pub signing_key: &'a [u8],
    pub encrypting_key: &'a [u8],
    pub nonce: &'a [u8],
}

fn keystream_iv(nonce: &[u8], counter: u64) -> CodecResult<[u8; 16]> {
    if nonce.len() != 8 {
        return Err(CodecError::MissingSecurityHeader);
    }
    let mut iv = [0u8; 16];
    iv[..8].copy_from_slice(nonce);
    iv[8..].copy_from_slice(&counter.to_be_bytes());
    Ok(iv)
}

fn apply_keystream(
    policy: SecurityPolicy,
    keys: &SecurityKeys,
    counter: u64,
    data: &mut [u8],
) -> CodecResult<()> {
    let iv = keystream_iv(keys.nonce, counter)?;
    match policy {
        SecurityPolicy::Aes128CtrHmacSha256 => {
            let mut cipher = Aes128Ctr::new(keys.encrypting_key.into(), &iv.into());
            cipher.apply_keystream(data);
        }
        SecurityPolicy::Aes256CtrHmacSha256 => {
            let mut cipher = Aes256Ctr::new(keys.encrypting_key.into(), &iv.into());
            cipher.apply_keystream(data);
        }
    }
    Ok(())
}

fn hmac_tag(signing_key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(signing_key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Encrypts the payload span in place (if the mode calls for it) and appends
/// a trailing signature covering the whole buffer.
pub fn seal(
    bytes: &mut Vec<u8>,
    payload_offset: usize,
    encrypt: bool,
    policy: SecurityPolicy,
    keys: &SecurityKeys,
    sequence_counter: u64,
) -> CodecResult<()> {
    if encrypt {
        apply_keystream(policy, keys, sequence_counter, &mut bytes[payload_offset..])?;
    }
    let tag = hmac_tag(keys.signing_key, bytes);
    bytes.extend_from_slice(&tag);
    Ok(())
}

/// Verifies the trailing signature and, if present, decrypts the payload
/// span in place. `bytes` must still include the trailing signature on
/// entry; it is stripped on success.
pub fn open(
    bytes: &mut Vec<u8>,
    payload_offset: usize,
    decrypt: bool,
    policy: SecurityPolicy,
    keys: &SecurityKeys,
    sequence_counter: u64,
) -> CodecResult<()> {
    let sig_len = policy.signature_length();
    if bytes.len() < sig_len {
        return Err(CodecError::SignatureMismatch);
    }
    let split = bytes.len() - sig_len;
    let (body, tag) = bytes.split_at(split);
    let expected = hmac_tag(keys.signing_key, body);
    if expected.as_slice() != tag {
        return Err(CodecError::SignatureMismatch);
    }
    bytes.truncate(split);

    if decrypt {
        apply_keystream(policy, keys, sequence_counter, &mut bytes[payload_offset..])
            .map_err(|_| CodecError::DecryptionFailed)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_then_open_round_trips_and_decrypts() {
        let policy = SecurityPolicy::Aes128CtrHmacSha256;
        let signing_key = [7u8; 32];
        let encrypting_key = [9u8; 16];
        let nonce = [1u8; 8];
        let keys = SecurityKeys {
            signing_key: &signing_key,
            encrypting_key: &encrypting_key,
            nonce: &nonce,
        };

        let mut bytes = vec![0xAA; 4];
        bytes.extend_from_slice(b"secret-payload-bytes");
        let payload_offset = 4;
        let plaintext_payload = bytes[payload_offset..].to_vec();

        seal(&mut bytes, payload_offset, true, policy, &keys, 1).unwrap();
        assert_ne!(&bytes[payload_offset..bytes.len() - policy.signature_length()], plaintext_payload.as_slice());

        open(&mut bytes, payload_offset, true, policy, &keys, 1).unwrap();
        assert_eq!(&bytes[payload_offset..], plaintext_payload.as_slice());
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let policy = SecurityPolicy::Aes256CtrHmacSha256;
        let signing_key = [1u8; 32];
        let encrypting_key = [2u8; 32];
        let nonce = [3u8; 8];
        let keys = SecurityKeys {
            signing_key: &signing_key,
            encrypting_key: &encrypting_key,
            nonce: &nonce,
        };

        let mut bytes = vec![1, 2, 3, 4];
        seal(&mut bytes, 2, false, policy, &keys, 0).unwrap();
        *bytes.last_mut().unwrap() ^= 0xFF;

        assert!(open(&mut bytes, 2, false, policy, &keys, 0).is_err());
    }
}
