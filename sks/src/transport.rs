//! Abstracts the "create an encrypted Client session, invoke a method,
//! tear the session down" sequence §4.E describes for the pull side, the
//! same way [`pubsub_transport::Channel`] abstracts a PubSub data channel.
//! A concrete implementation opens a secure OPC-UA session against the
//! configured endpoint; tests use an in-memory stand-in wired directly to a
//! [`crate::server::SksServer`].

use async_trait::async_trait;

use crate::error::Result;
use crate::protocol::{GetSecurityKeysRequest, GetSecurityKeysResponse};

#[async_trait]
pub trait SksTransport: Send + Sync {
    /// Opens a session (if not already open), invokes `GetSecurityKeys`,
    /// and returns the response. Implementations MUST use a session whose
    /// security policy is at least Basic256Sha256, per §4.E step 2.
    async fn get_security_keys(
        &self,
        request: GetSecurityKeysRequest,
    ) -> Result<GetSecurityKeysResponse>;
}
