//! Response body templating (C4).
//!
//! When a matched pair carries `templated: true`, its response body is
//! rendered through [`handlebars`] over a context exposing the inbound
//! request's scheme, path parameters, and query parameters. A template
//! failure surfaces as [`ProxyError::Templating`] — the original,
//! unrendered body is never substituted in its place.
//!
//! # Examples
//!
//! ```rust
//! use simulacra::canonical::{HeaderMultiMap, RequestDetails};
//! use simulacra::templating::render;
//!
//! let request = RequestDetails {
//!     scheme: "https".into(),
//!     method: "GET".into(),
//!     destination: "example.com".into(),
//!     path: "/users/42".into(),
//!     query: "tag=a&tag=b".into(),
//!     body: String::new(),
//!     headers: HeaderMultiMap::default(),
//! };
//! let body = render("{{Request.Scheme}}: {{Request.QueryParam.tag.[0]}}", &request, &["42".into()]).unwrap();
//! assert_eq!(body, "https: a");
//! ```

use std::collections::BTreeMap;

use serde::Serialize;

use crate::canonical::RequestDetails;
use crate::error::ProxyError;

#[derive(Serialize)]
struct RequestContext {
    #[serde(rename = "Scheme")]
    scheme: String,
    #[serde(rename = "PathParam")]
    path_param: Vec<String>,
    #[serde(rename = "QueryParam")]
    query_param: BTreeMap<String, Vec<String>>,
}

#[derive(Serialize)]
struct TemplateContext {
    #[serde(rename = "Request")]
    request: RequestContext,
}

/// Renders `template` against `request`'s scheme, `path_params` (extracted
/// by the router from the matched route), and the request's query
/// parameters (as `name -> [values]`, preserving every value for a
/// repeated key rather than the matcher's last-value-wins rule).
pub fn render(template: &str, request: &RequestDetails, path_params: &[String]) -> Result<String, ProxyError> {
    let context = TemplateContext {
        request: RequestContext {
            scheme: request.scheme.clone(),
            path_param: path_params.to_vec(),
            query_param: multi_value_query_map(&request.query),
        },
    };

    let engine = handlebars::Handlebars::new();
    let rendered = engine.render_template(template, &context)?;
    Ok(rendered)
}

fn multi_value_query_map(query: &str) -> BTreeMap<String, Vec<String>> {
    let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
    if query.is_empty() {
        return map;
    }
    for (k, v) in url::form_urlencoded::parse(query.as_bytes()) {
        map.entry(k.into_owned()).or_default().push(v.into_owned());
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::HeaderMultiMap;

    fn sample_request(query: &str) -> RequestDetails {
        RequestDetails {
            scheme: "https".into(),
            method: "GET".into(),
            destination: "example.com".into(),
            path: "/users/42".into(),
            query: query.into(),
            body: String::new(),
            headers: HeaderMultiMap::default(),
        }
    }

    #[test]
    fn renders_scheme() {
        let out = render("scheme={{Request.Scheme}}", &sample_request(""), &[]).unwrap();
        assert_eq!(out, "scheme=https");
    }

    #[test]
    fn renders_path_param() {
        let out = render("id={{Request.PathParam.[0]}}", &sample_request(""), &["42".into()]).unwrap();
        assert_eq!(out, "id=42");
    }

    #[test]
    fn renders_query_param_list() {
        let out = render(
            "first={{Request.QueryParam.tag.[0]}},second={{Request.QueryParam.tag.[1]}}",
            &sample_request("tag=a&tag=b"),
            &[],
        )
        .unwrap();
        assert_eq!(out, "first=a,second=b");
    }

    #[test]
    fn bad_template_is_templating_error() {
        let err = render("{{#if}}", &sample_request(""), &[]).unwrap_err();
        assert!(matches!(err, ProxyError::Templating(_)));
    }
}
