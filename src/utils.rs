//! Small URL helpers.

use url::Url;

/// Resolves `reference` against `base` the way a browser resolves a link.
///
/// Absolute references are returned as-is.
pub fn url_join(base: &str, reference: &str) -> Result<String, url::ParseError> {
    match Url::parse(reference) {
        Ok(absolute) => Ok(absolute.into()),
        Err(url::ParseError::RelativeUrlWithoutBase) => Ok(Url::parse(base)?.join(reference)?.into()),
        Err(e) => Err(e),
    }
}
