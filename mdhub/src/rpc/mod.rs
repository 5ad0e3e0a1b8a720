//! Cross-process boundary for the cache.
//!
//! The server process owns the single [`MarketDataCache`](crate::cache::MarketDataCache)
//! instance; clients in other processes connect with the same address and
//! authentication key and receive a typed stub exposing the identical method
//! set. Message passing, not shared memory: every call is one synchronous
//! request/response round trip that may fail or time out, and retry/backoff
//! policy belongs to the caller.

pub mod client;
pub mod protocol;
pub mod server;

pub use client::CacheClient;
pub use protocol::{Request, Response};
pub use server::CacheServer;
