//! Validation of inbound node requests.
//!
//! Validation happens before any document is opened, so every rejection here
//! can still be reported with a transport status.

use std::num::ParseIntError;

use thiserror::Error;
use url::form_urlencoded;

use crate::ElementId;

/// The only method the nodes endpoint answers.
pub const READ_METHOD: &str = "GET";

/// Query parameter carrying the comma-separated identifier list.
pub const IDS_PARAM: &str = "ids";

/// Historical name of [`IDS_PARAM`], still accepted by the endpoint.
pub const LEGACY_IDS_PARAM: &str = "nodes";

/// Transport-level view of a request.
pub trait RawRequest {
    /// Request method, e.g. `GET`.
    fn method(&self) -> &str;

    /// Raw, still URL-encoded query string without the leading `?`.
    fn query_string(&self) -> &str;
}

/// Owned request used by the CLI and tests.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HttpRequest {
    method: String,
    query_string: String,
}

impl HttpRequest {
    /// Build a request from a method and a raw query string.
    pub fn new(method: impl Into<String>, query_string: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            query_string: query_string.into(),
        }
    }

    /// Build a `GET` request.
    pub fn get(query_string: impl Into<String>) -> Self {
        Self::new(READ_METHOD, query_string)
    }
}

impl RawRequest for HttpRequest {
    fn method(&self) -> &str {
        &self.method
    }

    fn query_string(&self) -> &str {
        &self.query_string
    }
}

/// Rejections raised before a response is streamed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// The request used a method other than [`READ_METHOD`].
    #[error("method {method} not allowed: {reason}")]
    MethodNotAllowed {
        /// Method supplied by the client.
        method: String,
        /// Human-readable explanation.
        reason: String,
    },
    /// The identifier parameter was malformed.
    #[error("bad request: {reason}")]
    BadRequest {
        /// Human-readable explanation.
        reason: String,
    },
}

impl RequestError {
    /// HTTP status code the transport should answer with.
    pub const fn status(&self) -> u16 {
        match self {
            Self::MethodNotAllowed { .. } => 405,
            Self::BadRequest { .. } => 400,
        }
    }

    /// Human-readable reason suitable for a response body.
    pub fn reason(&self) -> &str {
        match self {
            Self::MethodNotAllowed { reason, .. } | Self::BadRequest { reason } => reason,
        }
    }
}

/// Validate a nodes request and return the requested identifiers.
///
/// A missing identifier parameter yields an empty list. Token order is kept
/// and duplicates are preserved.
///
/// # Errors
///
/// Returns [`RequestError::MethodNotAllowed`] for any method other than
/// [`READ_METHOD`] and [`RequestError::BadRequest`] when any token of the
/// identifier parameter is not a valid identifier.
///
/// # Examples
/// ```
/// use mapread_core::{ElementId, HttpRequest, RequestError, validate_request};
///
/// let ids = validate_request(&HttpRequest::get("ids=3,1,3"))?;
/// assert_eq!(ids, vec![ElementId::new(3), ElementId::new(1), ElementId::new(3)]);
///
/// assert!(validate_request(&HttpRequest::get("")).map(|ids| ids.is_empty())?);
///
/// let err = validate_request(&HttpRequest::get("ids=5,abc,7")).unwrap_err();
/// assert_eq!(err.status(), 400);
/// # Ok::<(), RequestError>(())
/// ```
pub fn validate_request<R>(request: &R) -> Result<Vec<ElementId>, RequestError>
where
    R: RawRequest + ?Sized,
{
    let method = request.method();
    if method != READ_METHOD {
        return Err(RequestError::MethodNotAllowed {
            method: method.to_owned(),
            reason: format!("Only the {READ_METHOD} method is supported for nodes requests."),
        });
    }

    let Some((name, value)) = form_urlencoded::parse(request.query_string().as_bytes())
        .find(|(key, _)| key.as_ref() == IDS_PARAM || key.as_ref() == LEGACY_IDS_PARAM)
    else {
        return Ok(Vec::new());
    };

    parse_id_list(&value).map_err(|_| RequestError::BadRequest {
        reason: format!(
            "The parameter {name} is required, and must be of the form {name}=id[,id[,id...]]."
        ),
    })
}

/// Parse a comma-separated identifier list.
///
/// Parsing is all-or-nothing: an empty value or any empty or malformed token
/// fails the whole list.
///
/// # Errors
///
/// Returns the parse error of the first token that is not a valid
/// identifier.
pub fn parse_id_list(value: &str) -> Result<Vec<ElementId>, ParseIntError> {
    value.split(',').map(str::parse).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn ids(raw: &[u64]) -> Vec<ElementId> {
        raw.iter().copied().map(ElementId::new).collect()
    }

    #[rstest]
    #[case("POST")]
    #[case("PUT")]
    #[case("DELETE")]
    #[case("get")]
    fn rejects_non_read_methods(#[case] method: &str) {
        let err = validate_request(&HttpRequest::new(method, "ids=1"))
            .expect_err("non-GET methods should be rejected");
        assert!(matches!(err, RequestError::MethodNotAllowed { .. }));
        assert_eq!(err.status(), 405);
        assert!(err.reason().contains("GET"));
    }

    #[rstest]
    fn method_is_checked_before_parameters() {
        let err = validate_request(&HttpRequest::new("POST", "ids=abc"))
            .expect_err("method should be rejected first");
        assert!(matches!(err, RequestError::MethodNotAllowed { .. }));
    }

    #[rstest]
    #[case("")]
    #[case("bbox=1,2,3,4")]
    #[case("idsx=1")]
    fn missing_parameter_yields_empty_list(#[case] query: &str) {
        let found = validate_request(&HttpRequest::get(query)).expect("query should validate");
        assert!(found.is_empty());
    }

    #[rstest]
    #[case("ids=1", &[1])]
    #[case("ids=3,1,2", &[3, 1, 2])]
    #[case("ids=4,4,4", &[4, 4, 4])]
    #[case("nodes=8,9", &[8, 9])]
    #[case("ids=1%2C2", &[1, 2])]
    #[case("format=json&ids=5", &[5])]
    fn parses_identifier_lists(#[case] query: &str, #[case] expected: &[u64]) {
        let found = validate_request(&HttpRequest::get(query)).expect("query should validate");
        assert_eq!(found, ids(expected));
    }

    #[rstest]
    #[case("ids=5,1&nodes=2", &[5, 1])]
    #[case("nodes=2&ids=5,1", &[2])]
    #[case("ids=7&ids=abc", &[7])]
    fn first_identifier_parameter_wins(#[case] query: &str, #[case] expected: &[u64]) {
        let found = validate_request(&HttpRequest::get(query)).expect("query should validate");
        assert_eq!(found, ids(expected));
    }

    #[rstest]
    #[case("ids=5,abc,7", "ids")]
    #[case("ids=", "ids")]
    #[case("ids=1,,2", "ids")]
    #[case("ids=1,", "ids")]
    #[case("ids=-1", "ids")]
    #[case("nodes=x", "nodes")]
    fn rejects_malformed_parameters(#[case] query: &str, #[case] name: &str) {
        let err = validate_request(&HttpRequest::get(query))
            .expect_err("malformed identifiers should be rejected");
        assert_eq!(err.status(), 400);
        assert!(
            err.reason().contains(&format!("{name}=id[,id[,id...]]")),
            "unexpected reason {:?}",
            err.reason()
        );
    }
}
