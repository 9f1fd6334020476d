//! Canonicalization of inbound requests and outbound responses (C1).
//!
//! Turns a live `hyper::Request<Incoming>` into the stable, hashable
//! [`RequestDetails`] shape the matcher and journal operate on, and decides
//! how a captured response body should be stored (raw text vs. base64) when
//! exporting a [`crate::simulation::schema::ResponseDetailsV3`].
//!
//! # Examples
//!
//! ```rust
//! use simulacra::canonical::{canonicalize_query, hash, RequestDetails, HeaderMultiMap};
//!
//! let q = canonicalize_query("b=b&a=a");
//! assert_eq!(q, "a=a&b=b");
//!
//! let details = RequestDetails {
//!     scheme: "http".into(),
//!     method: "GET".into(),
//!     destination: "example.com".into(),
//!     path: "/".into(),
//!     query: String::new(),
//!     body: String::new(),
//!     headers: HeaderMultiMap::default(),
//! };
//! let h1 = hash(&details);
//! let h2 = hash(&details);
//! assert_eq!(h1, h2);
//! ```

use http_body_util::BodyExt;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

use crate::error::ProxyError;
use crate::types::Request;

/// Textual MIME subtype fragments a sniffed body is checked against before
/// deciding it should be stored raw instead of base64-encoded, per spec.md
/// §4.1. These are matched against the body itself, never the declared
/// `Content-Type` header (see [`classify_body`]).
const TEXTUAL_SUBTYPES: [&str; 8] = [
    "text",
    "plain",
    "css",
    "html",
    "json",
    "xml",
    "js",
    "javascript",
];

/// Ordered multimap of header name to list of values.
///
/// Preserves insertion order of values for a given name (needed for the
/// comma-separated multi-value header comparisons in the matcher) while
/// making lookups case-insensitive, since HTTP header names are.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeaderMultiMap(Vec<(String, Vec<String>)>);

impl HeaderMultiMap {
    /// Builds a multimap from a `hyper::HeaderMap`, preserving value order
    /// per name and merging repeated header names into one entry.
    pub fn from_header_map(headers: &http::HeaderMap) -> Self {
        let mut map = HeaderMultiMap::default();
        for (name, value) in headers.iter() {
            let value = value.to_str().unwrap_or_default().to_owned();
            map.push(name.as_str(), value);
        }
        map
    }

    /// Builds a multimap from an iterator of `(name, values)` pairs, e.g. a
    /// stored simulation's `BTreeMap<String, Vec<String>>` header shape.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, Vec<String>)>) -> Self {
        let mut map = HeaderMultiMap::default();
        for (name, values) in pairs {
            for value in values {
                map.push(&name, value);
            }
        }
        map
    }

    /// Appends a value under `name`, creating the entry if absent.
    pub fn push(&mut self, name: &str, value: String) {
        let lower = name.to_ascii_lowercase();
        if let Some((_, values)) = self.0.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(&lower))
        {
            values.push(value);
        } else {
            self.0.push((name.to_owned(), vec![value]));
        }
    }

    /// Returns the values stored under `name`, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
    }

    /// Iterates all `(name, values)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &(String, Vec<String>)> {
        self.0.iter()
    }

    /// True if no headers are stored.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Canonical, hashable form of an inbound HTTP request (spec.md §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestDetails {
    /// Lower-cased URI scheme (`http`/`https`).
    pub scheme: String,
    /// HTTP method, preserved as given (expected uppercase).
    pub method: String,
    /// Lower-cased host, without port unless the port is explicit and
    /// non-default for the scheme.
    pub destination: String,
    /// URI path, taken verbatim with percent-encoding preserved.
    pub path: String,
    /// Canonicalized query string (see [`canonicalize_query`]).
    pub query: String,
    /// Request body, decoded as UTF-8 (lossily, since arbitrary bytes may
    /// be sent — the canonical form is a string per spec.md §3).
    pub body: String,
    /// Request headers, case-insensitive lookup, order-preserving values.
    pub headers: HeaderMultiMap,
}

/// Canonical form of an outbound HTTP response (spec.md §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseDetails {
    /// HTTP status code.
    pub status: u16,
    /// Response body — raw text, or base64 when `encoded_body` is set.
    pub body: String,
    /// Response headers.
    pub headers: HeaderMultiMap,
    /// True iff `body` is base64-encoded because the content was detected
    /// as non-textual, or a `Content-Encoding` header was present.
    pub encoded_body: bool,
}

/// Stateless canonicalizer for inbound requests.
pub struct Canonicalizer;

impl Canonicalizer {
    /// Reads and canonicalizes a live request, including its body.
    ///
    /// The scheme is taken from the request's URI (defaulting to `http` if
    /// absent, e.g. for origin-form proxy requests), since a forward proxy
    /// may not always see an absolute-form URI with a scheme.
    pub async fn canonicalize(req: Request) -> Result<RequestDetails, ProxyError> {
        let (parts, body) = req.into_parts();

        let scheme = parts
            .uri
            .scheme_str()
            .unwrap_or("http")
            .to_ascii_lowercase();
        let method = parts.method.as_str().to_owned();
        let destination = parts
            .uri
            .authority()
            .map(|a| a.as_str().to_ascii_lowercase())
            .or_else(|| {
                parts
                    .headers
                    .get(http::header::HOST)
                    .and_then(|h| h.to_str().ok())
                    .map(|h| h.to_ascii_lowercase())
            })
            .unwrap_or_default();
        let path = parts.uri.path().to_owned();
        let query = canonicalize_query(parts.uri.query().unwrap_or(""));

        let collected = body
            .collect()
            .await
            .map_err(|_| ProxyError::Io(std::io::Error::other("failed to read request body")))?;
        let body = String::from_utf8_lossy(&collected.to_bytes()).into_owned();

        Ok(RequestDetails {
            scheme,
            method,
            destination,
            path,
            query,
            body,
            headers: HeaderMultiMap::from_header_map(&parts.headers),
        })
    }
}

/// Sorts a raw query string's `k=v` pairs lexicographically by key then
/// value, preserving duplicate keys, and re-encodes them.
///
/// Stable sort: pairs that compare equal keep their relative order, which
/// is what makes `canonical(canonical(q)) == canonical(q)` hold even when
/// duplicate `k=v` pairs are present.
pub fn canonicalize_query(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    let mut pairs: Vec<(String, String)> = url::form_urlencoded::parse(raw.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort_by(|a, b| a.cmp(b));

    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs.iter())
        .finish()
}

/// MD5 hash of `destination || path || method || query || body`, hex-lowercase.
///
/// Advisory only — used as a cache key, collisions are tolerated. Depends
/// only on the five named fields: permuting header order, or any header at
/// all, never changes the hash.
pub fn hash(details: &RequestDetails) -> String {
    hash_parts(
        &details.destination,
        &details.path,
        &details.method,
        &details.query,
        &details.body,
    )
}

/// Same as [`hash`], but omits `destination` from the concatenation — used
/// when destination should not distinguish two otherwise-identical requests.
pub fn hash_without_destination(details: &RequestDetails) -> String {
    hash_parts("", &details.path, &details.method, &details.query, &details.body)
}

fn hash_parts(destination: &str, path: &str, method: &str, query: &str, body: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(destination.as_bytes());
    hasher.update(path.as_bytes());
    hasher.update(method.as_bytes());
    hasher.update(query.as_bytes());
    hasher.update(body.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Decides whether a captured response body should be stored raw or
/// base64-encoded, per spec.md §4.1: a `Content-Encoding` header always
/// forces base64; otherwise the body's own bytes are sniffed the same way
/// Hoverfly's `ConvertToResponseDetailsView` does (`http.DetectContentType`
/// against the body, never the declared `Content-Type` header, which is
/// untrustworthy — missing, generic, or simply wrong).
pub fn classify_body(content_encoding_present: bool, body: &[u8]) -> (String, bool) {
    let is_textual = !content_encoding_present && sniff_is_textual(body);

    if is_textual {
        (String::from_utf8_lossy(body).into_owned(), false)
    } else {
        (
            base64::Engine::encode(&base64::engine::general_purpose::STANDARD, body),
            true,
        )
    }
}

/// Approximates the textual branches of Go's `net/http.DetectContentType`:
/// an HTML or XML signature at the start of the body, or (the common case)
/// a control-byte-free, valid-UTF-8 body — both of which resolve to a MIME
/// family that appears in [`TEXTUAL_SUBTYPES`].
fn sniff_is_textual(body: &[u8]) -> bool {
    let start = body
        .iter()
        .position(|b| !matches!(b, b' ' | b'\t' | b'\n' | b'\x0c' | b'\r'))
        .unwrap_or(body.len());
    let trimmed = &body[start..];

    const HTML_PREFIXES: [&[u8]; 17] = [
        b"<!DOCTYPE HTML",
        b"<HTML",
        b"<HEAD",
        b"<SCRIPT",
        b"<IFRAME",
        b"<H1",
        b"<DIV",
        b"<FONT",
        b"<TABLE",
        b"<A",
        b"<STYLE",
        b"<TITLE",
        b"<B",
        b"<BODY",
        b"<BR",
        b"<P",
        b"<!--",
    ];
    let sniffed = if HTML_PREFIXES.iter().any(|p| starts_with_ignore_ascii_case(trimmed, p)) {
        "text/html"
    } else if starts_with_ignore_ascii_case(trimmed, b"<?xml") {
        "text/xml"
    } else if is_control_free_utf8(body) {
        "text/plain"
    } else {
        "application/octet-stream"
    };

    TEXTUAL_SUBTYPES.iter().any(|t| sniffed.contains(t))
}

fn starts_with_ignore_ascii_case(haystack: &[u8], prefix: &[u8]) -> bool {
    haystack.len() >= prefix.len() && haystack[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// Mirrors Go's `isText`: valid UTF-8 and free of the control bytes that
/// mark a body as binary (NUL-BS, VT-SUB, FS-US — tab/LF/CR are exempt).
fn is_control_free_utf8(body: &[u8]) -> bool {
    let Ok(text) = std::str::from_utf8(body) else {
        return false;
    };
    !text.chars().any(|c| {
        let c = c as u32;
        c <= 0x08 || (0x0B..=0x1A).contains(&c) || (0x1C..=0x1F).contains(&c)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_query_sorts_stably() {
        assert_eq!(canonicalize_query("b=b&a=a"), "a=a&b=b");
    }

    #[test]
    fn canonicalize_query_is_idempotent() {
        let once = canonicalize_query("b=b&a=a&a=c");
        let twice = canonicalize_query(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn canonicalize_empty_query() {
        assert_eq!(canonicalize_query(""), "");
    }

    fn sample(headers: HeaderMultiMap) -> RequestDetails {
        RequestDetails {
            scheme: "http".into(),
            method: "GET".into(),
            destination: "example.com".into(),
            path: "/a".into(),
            query: "a=a".into(),
            body: "body".into(),
            headers,
        }
    }

    #[test]
    fn hash_ignores_headers() {
        let mut with_headers = HeaderMultiMap::default();
        with_headers.push("X-Trace", "1".into());
        let a = sample(HeaderMultiMap::default());
        let b = sample(with_headers);
        assert_eq!(hash(&a), hash(&b));
    }

    #[test]
    fn hash_without_destination_ignores_destination() {
        let mut other = sample(HeaderMultiMap::default());
        other.destination = "other.example.com".into();
        let a = sample(HeaderMultiMap::default());
        assert_eq!(hash_without_destination(&a), hash_without_destination(&other));
        assert_ne!(hash(&a), hash(&other));
    }

    #[test]
    fn classify_body_text_stays_raw() {
        let (body, encoded) = classify_body(false, b"{}");
        assert!(!encoded);
        assert_eq!(body, "{}");
    }

    #[test]
    fn classify_body_ignores_misleading_content_type() {
        // A JSON body is textual regardless of what Content-Type claimed.
        let (body, encoded) = classify_body(false, br#"{"a":1}"#);
        assert!(!encoded);
        assert_eq!(body, r#"{"a":1}"#);
    }

    #[test]
    fn classify_body_binary_is_base64() {
        let (_, encoded) = classify_body(false, b"\x89PNG\r\n\x1a\n");
        assert!(encoded);
    }

    #[test]
    fn classify_body_content_encoding_forces_base64() {
        let (_, encoded) = classify_body(true, b"hello");
        assert!(encoded);
    }

    #[test]
    fn classify_body_sniffs_html() {
        let (_, encoded) = classify_body(false, b"<!DOCTYPE html><html></html>");
        assert!(!encoded);
    }

    #[test]
    fn header_multimap_is_case_insensitive() {
        let mut map = HeaderMultiMap::default();
        map.push("Content-Type", "application/json".into());
        assert_eq!(map.get("content-type"), Some(&["application/json".to_owned()][..]));
    }
}
