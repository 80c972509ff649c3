//! Cloudflare Zero Trust Gateway lists as a [`CollectionClient`](crate::client::CollectionClient).
//!
//! Lists are read page by page and modified with a single `PATCH` carrying
//! either `append` or `remove`. An append that fails because a value is
//! already present is retried one item at a time so the remaining values
//! still land.

mod client;
mod error;
mod types;

pub use client::{API_BASE, CloudflareClient, ITEMS_PER_PAGE};
pub use error::CloudflareError;
pub use types::{ApiMessage, Envelope, GatewayList, GatewayListItem, PatchListRequest};
