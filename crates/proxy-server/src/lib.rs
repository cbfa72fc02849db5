//! Transparent Redis-protocol proxy that pins every client connection to
//! a tenant key namespace.
//!
//! Clients speak plain RESP2. The proxy derives a namespace prefix per
//! connection (from the `AUTH` handshake, or a configured default) and
//! rewrites the key arguments of every data-plane command so tenant `A`'s
//! `user:42` lands on the shared backend as `A:user:42`. `SCAN` replies
//! are filtered back down to the tenant's namespace, and destructive
//! flush commands are refused outright.

pub mod commands;
pub mod config;
pub mod metrics;
pub mod proxy;
pub mod resp;
pub mod rewrite;
mod session;

pub use config::Config;
pub use proxy::{run_proxy, ProxyState};
