//! Client (pull) and server (push) sides of the SKS protocol (spec.md §4.E).

pub mod client;
pub mod error;
pub mod protocol;
pub mod server;
pub mod transport;

pub use client::SksClient;
pub use error::{Result, SksError};
pub use protocol::{
    CallerContext, GetSecurityKeysRequest, GetSecurityKeysResponse, SetSecurityKeysRequest,
};
pub use server::SksServer;
pub use transport::SksTransport;
