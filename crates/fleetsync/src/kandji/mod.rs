//! Kandji directory client.
//!
//! # Module Structure
//!
//! - [`error`] - Error types for Kandji API operations
//! - [`types`] - Response data structures
//! - [`client`] - Client creation and the `DirectoryClient` implementation
//! - [`convert`] - Conversion to `SourceDevice`
//!
//! ```ignore
//! use fleetsync::kandji::KandjiClient;
//! use fleetsync::{DirectoryClient, RateGovernor};
//!
//! let client = KandjiClient::new("https://acme.api.kandji.io", "token", RateGovernor::default())?;
//! let devices = client.list_devices(&cancel).await?;
//! ```

mod client;
mod convert;
mod error;
mod types;

pub use client::{KandjiClient, PAGE_SIZE};
pub use convert::to_source_device;
pub use error::KandjiError;
pub use types::{KandjiDevice, KandjiUser, KandjiUserField};
