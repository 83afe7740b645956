//! Source datasets exported as Esri JSON feature sets.
//!
//! A feature set is the `{"features": [{"attributes": {...}, "geometry":
//! {...}}]}` document desktop tools export for layers and tables alike.
//! Files can be large, so they are parsed with `simd-json`.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use gisbatch_core::SourceRow;
use gisbatch_fs::read_bytes;
use log::info;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Deserialize)]
struct FeatureSet {
    #[serde(default)]
    features: Vec<SourceRow>,
}

/// Errors raised while loading a source dataset.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The file could not be read.
    #[error("failed to read source dataset {path:?}")]
    Read {
        /// Dataset path.
        path: Utf8PathBuf,
        /// Underlying IO failure.
        source: io::Error,
    },
    /// The file is not a valid feature set.
    #[error("failed to parse source dataset {path:?}")]
    Parse {
        /// Dataset path.
        path: Utf8PathBuf,
        /// Decoder failure.
        source: simd_json::Error,
    },
}

/// Load every row of the feature set stored at `path`.
///
/// # Errors
///
/// Returns [`SourceError`] when the file cannot be read or decoded.
pub fn load_feature_set(path: &Utf8Path) -> Result<Vec<SourceRow>, SourceError> {
    let mut bytes = read_bytes(path).map_err(|source| SourceError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let rows = parse_feature_set(&mut bytes).map_err(|source| SourceError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    info!("read {} rows from {path}", rows.len());
    Ok(rows)
}

/// Decode a feature set held in memory.
///
/// `simd-json` parses in place, so the buffer is clobbered.
///
/// # Errors
///
/// Returns the decoder error for malformed input.
pub fn parse_feature_set(bytes: &mut [u8]) -> Result<Vec<SourceRow>, simd_json::Error> {
    let set: FeatureSet = simd_json::serde::from_slice(bytes)?;
    Ok(set.features)
}
