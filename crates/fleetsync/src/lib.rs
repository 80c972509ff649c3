//! Fleetsync - keeps an access-control allow-list in step with an MDM fleet.
//!
//! Devices are read from a directory (Kandji), filtered by policy, and
//! reconciled against a target collection (a Cloudflare Gateway list), with
//! optional read-only auxiliary collections merged in as extra sources.
//!
//! # Features
//!
//! - `kandji` - Kandji directory client.
//! - `cloudflare` - Cloudflare Gateway list client.
//!
//! # Example
//!
//! ```ignore
//! use fleetsync::{RateGovernor, SyncEngine, SyncOptions};
//! use fleetsync::cloudflare::CloudflareClient;
//! use fleetsync::kandji::KandjiClient;
//!
//! let governor = RateGovernor::default();
//! let kandji = KandjiClient::new("https://acme.api.kandji.io", token, governor.clone())?;
//! let cloudflare = CloudflareClient::new(account_id, cf_token, governor)?;
//!
//! let engine = SyncEngine::new(kandji, cloudflare, SyncOptions::new(list_id))?;
//! let summary = engine.run_once(&cancel).await?;
//! ```

pub mod client;
pub mod http;
pub mod sync;

#[cfg(any(feature = "kandji", feature = "cloudflare"))]
pub mod retry;

#[cfg(feature = "kandji")]
pub mod kandji;

#[cfg(feature = "cloudflare")]
pub mod cloudflare;

pub use client::{
    ClientError, CollectionClient, DirectoryClient, RateBudget, RateGovernor, RatePool,
    SourceDevice, TargetItem, rate_limits,
};
pub use sync::{CycleSummary, MissingPolicy, SyncEngine, SyncError, SyncOptions};
