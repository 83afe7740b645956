//! Feature service adapter.
//!
//! A thin REST client covering the handful of endpoints an append run
//! needs: layer metadata, `applyEdits`, `query`, `deleteFeatures` and the
//! admin `updateDefinition` used to toggle editor tracking. Requests carry a
//! pre-issued token; signing in is left to whoever issued it.

mod client;
mod esri;
mod layer;
mod urls;

pub use client::{ClientBuildError, DEFAULT_USER_AGENT, PortalClient, PortalClientConfig};
pub use layer::{FeatureLayer, FeatureService};
pub use urls::ServiceUrlError;
