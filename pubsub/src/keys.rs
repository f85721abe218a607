//! Per-group cryptographic channel context: the activated key material plus
//! the nonce counter a WriterGroup/ReaderGroup needs to call
//! [`pubsub_codec::security::seal`]/`open` (spec.md §4.B, §4.C).

use pubsub_codec::security::SecurityPolicy;
use pubsub_keystorage::ActivatedKeys;
use rand::RngCore;

/// §4.B requires the nonce to combine a sender-scoped random seed (picked at
/// group start) with a monotonically increasing per-message counter so no
/// two messages under one key ever reuse a keystream. We fold both into one
/// `u64` counter: it starts at a random value and increments by one per
/// message, rather than transmitting the seed and counter separately.
pub struct SecurityContext {
    pub policy: SecurityPolicy,
    pub security_group_id: String,
    pub security_token_id: u32,
    keys: Option<ActivatedKeys>,
    counter: u64,
}

impl SecurityContext {
    pub fn new(policy: SecurityPolicy, security_group_id: impl Into<String>) -> Self {
        Self {
            policy,
            security_group_id: security_group_id.into(),
            security_token_id: 0,
            keys: None,
            counter: rand::thread_rng().next_u64(),
        }
    }

    pub fn activate(&mut self, security_token_id: u32, keys: ActivatedKeys) {
        self.security_token_id = security_token_id;
        self.keys = Some(keys);
    }

    pub fn is_activated(&self) -> bool {
        self.keys.is_some()
    }

    pub fn keys(&self) -> Option<&ActivatedKeys> {
        self.keys.as_ref()
    }

    /// Returns the counter to use for this message's keystream/header nonce
    /// and advances it for the next call.
    pub fn next_counter(&mut self) -> u64 {
        let counter = self.counter;
        self.counter = self.counter.wrapping_add(1);
        counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_is_monotonic_per_call() {
        let mut ctx = SecurityContext::new(SecurityPolicy::Aes128CtrHmacSha256, "group-1");
        let c0 = ctx.next_counter();
        let c1 = ctx.next_counter();
        assert_eq!(c1, c0.wrapping_add(1));
    }
}
