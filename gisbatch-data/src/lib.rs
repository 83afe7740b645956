//! Data access for gisbatch.
//!
//! Responsibilities:
//! - Load source datasets exported as Esri JSON feature sets.
//! - Adapt feature service REST endpoints to the store traits in
//!   `gisbatch-core`.
//!
//! Boundaries:
//! - Do not encode append rules (live in `gisbatch-core`).
//! - Keep the store traits synchronous; async IO stays behind the client.

#![forbid(unsafe_code)]

pub mod service;
pub mod source;

pub use service::{
    ClientBuildError, DEFAULT_USER_AGENT, FeatureLayer, FeatureService, PortalClient,
    PortalClientConfig, ServiceUrlError,
};
pub use source::{SourceError, load_feature_set, parse_feature_set};
