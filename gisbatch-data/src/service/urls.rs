//! URL handling for feature service layers and their admin endpoints.

use thiserror::Error;
use url::Url;

const SERVICES_PATH: &str = "/rest/services/";
const ADMIN_SERVICES_PATH: &str = "/rest/admin/services/";

/// Errors raised while interpreting a service or layer URL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceUrlError {
    /// The text is not a URL.
    #[error("invalid URL {url:?}")]
    Parse {
        /// Offending text.
        url: String,
        /// Parser failure.
        source: url::ParseError,
    },
    /// The URL has no path to extend (for example `mailto:`).
    #[error("URL {url:?} cannot address a feature service")]
    CannotBeABase {
        /// Offending URL.
        url: String,
    },
    /// The URL does not contain a `/rest/services/` segment.
    #[error("URL {url:?} is not a REST services URL")]
    NotAServiceUrl {
        /// Offending URL.
        url: String,
    },
}

/// Parse `raw`, dropping any query, fragment and trailing slash.
pub(crate) fn parse_resource_url(raw: &str) -> Result<Url, ServiceUrlError> {
    let mut url = Url::parse(raw.trim()).map_err(|source| ServiceUrlError::Parse {
        url: raw.to_owned(),
        source,
    })?;
    if url.cannot_be_a_base() {
        return Err(ServiceUrlError::CannotBeABase {
            url: raw.to_owned(),
        });
    }
    url.set_query(None);
    url.set_fragment(None);
    let trimmed = url.path().trim_end_matches('/').to_owned();
    url.set_path(&trimmed);
    Ok(url)
}

/// Append a path segment such as `applyEdits`.
pub(crate) fn join_segment(base: &Url, segment: &str) -> Url {
    let mut url = base.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push(segment);
    }
    url
}

/// Service URL owning the layer at `layer`, when the final segment is a
/// layer index.
pub(crate) fn service_url_for_layer(layer: &Url) -> Option<Url> {
    let last = layer.path_segments()?.next_back()?;
    if last.is_empty() || !last.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let mut url = layer.clone();
    url.path_segments_mut().ok()?.pop();
    Some(url)
}

/// Admin counterpart of a REST service URL.
pub(crate) fn admin_url(service: &Url) -> Result<Url, ServiceUrlError> {
    let path = service.path();
    if !path.contains(SERVICES_PATH) {
        return Err(ServiceUrlError::NotAServiceUrl {
            url: service.to_string(),
        });
    }
    let mut url = service.clone();
    url.set_path(&path.replacen(SERVICES_PATH, ADMIN_SERVICES_PATH, 1));
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const LAYER: &str =
        "https://services.example.com/arcgis/rest/services/Trees/FeatureServer/0";

    fn layer() -> Url {
        parse_resource_url(LAYER).expect("layer url parses")
    }

    #[rstest]
    #[case("https://services.example.com/arcgis/rest/services/Trees/FeatureServer/0/")]
    #[case("https://services.example.com/arcgis/rest/services/Trees/FeatureServer/0?f=json")]
    fn parse_strips_query_and_trailing_slash(#[case] raw: &str) {
        assert_eq!(parse_resource_url(raw).expect("parses").as_str(), LAYER);
    }

    #[rstest]
    fn parse_rejects_garbage() {
        let err = parse_resource_url("not a url").expect_err("should fail");
        assert!(matches!(err, ServiceUrlError::Parse { .. }));
        let err = parse_resource_url("mailto:gis@example.com").expect_err("should fail");
        assert!(matches!(err, ServiceUrlError::CannotBeABase { .. }));
    }

    #[rstest]
    fn join_appends_operation() {
        assert_eq!(
            join_segment(&layer(), "applyEdits").as_str(),
            format!("{LAYER}/applyEdits")
        );
    }

    #[rstest]
    fn service_url_drops_layer_index() {
        let service = service_url_for_layer(&layer()).expect("layer index present");
        assert_eq!(
            service.as_str(),
            "https://services.example.com/arcgis/rest/services/Trees/FeatureServer"
        );
        assert!(service_url_for_layer(&service).is_none());
    }

    #[rstest]
    fn admin_url_inserts_admin_segment() {
        let service = service_url_for_layer(&layer()).expect("service");
        assert_eq!(
            admin_url(&service).expect("admin url").as_str(),
            "https://services.example.com/arcgis/rest/admin/services/Trees/FeatureServer"
        );
    }

    #[rstest]
    fn admin_url_requires_services_path() {
        let url = parse_resource_url("https://example.com/portal/home").expect("parses");
        let err = admin_url(&url).expect_err("should fail");
        assert!(matches!(err, ServiceUrlError::NotAServiceUrl { .. }));
    }
}
