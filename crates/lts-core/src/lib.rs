//! lts-core library.
//!
//! Read path of the long-term store: logical offsets map onto fixed-size
//! shard files ([`address`]), which are read through a bounded cache of
//! open handles ([`cache`]) behind the [`store::ShardStore`] facade.
//!
//! # Conventions
//!
//! - **Errors**: typed `thiserror` enums in the read path, `anyhow::Result`
//!   for config loading.
//! - **Logging**: `tracing` macros (`warn!`, `debug!`, `trace!`).

pub mod address;
pub mod cache;
pub mod config;
pub mod error;
pub mod slot;
pub mod store;
pub mod timing;

pub use address::{ShardAddress, ShardLayout, resolve};
pub use cache::{CacheConfig, CacheStats, HandleCache};
pub use error::{ConfigError, ErrorCode, ReadError};
pub use store::ShardStore;
