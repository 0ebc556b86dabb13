//! Source fetching and response normalization.
//!
//! [`SourceClient`] retrieves raw catalog payloads over HTTP and converts
//! heterogeneous response shapes into canonical [`kasane_core::CatalogEntry`]
//! values. The pipeline boundary never throws: any network, timeout, or
//! parse failure is logged and yields an empty list so the orchestrator can
//! continue with the remaining sources.

pub mod client;
pub mod normalize;
pub mod rate_limit;

pub use client::{CatalogFetcher, FetchError, SourceClient, SourceProbe};
pub use normalize::normalize_catalog;
pub use rate_limit::cancellable_sleep;
