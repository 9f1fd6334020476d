//! Multi-field, multi-strategy request matcher (C3).
//!
//! Compiles the wire-level [`crate::simulation::schema::MatcherSpec`] tagged
//! union into a [`Matcher`] with its pattern pre-compiled (glob, regex,
//! jsonpath), then scores stored pairs against a canonical
//! [`crate::canonical::RequestDetails`] under a `first`/`strongest`
//! strategy.
//!
//! # Examples
//!
//! ```rust
//! use simulacra::matcher::Matcher;
//! use simulacra::simulation::schema::MatcherSpec;
//!
//! let m = Matcher::compile(&MatcherSpec::glob("/users/*")).unwrap();
//! assert!(m.matches("/users/42"));
//! assert!(!m.matches("/accounts/42"));
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::canonical::{HeaderMultiMap, RequestDetails};
use crate::error::ProxyError;
use crate::simulation::schema::{MatcherSpec, PairV3, RequestMatcherSetV3, ResponseView};

/// A compiled, single-field matcher. Each variant caches whatever compiled
/// form its strategy needs (a `Regex`, a `GlobMatcher`, a parsed
/// `JsonPath`) so a stored simulation compiles its patterns once, not once
/// per incoming request.
///
/// XML and XPath matchers are kept as raw strings and parsed per match:
/// `sxd_document::Package` owns an arena that any parsed `Document`
/// borrows from, which makes a long-lived compiled form self-referential —
/// not worth the complexity for a matcher type the pack does not otherwise
/// exercise.
#[derive(Debug, Clone)]
pub enum Matcher {
    Exact(String),
    Glob {
        pattern: String,
        compiled: globset::GlobMatcher,
    },
    Regex {
        pattern: String,
        compiled: regex::Regex,
    },
    Json(serde_json::Value),
    Xml(String),
    XPath(String),
    JsonPath {
        expr: String,
        compiled: serde_json_path::JsonPath,
    },
}

impl Matcher {
    /// Compiles a wire-level [`MatcherSpec`] into a [`Matcher`].
    ///
    /// Invalid regex and jsonpath patterns fail here, at load time, per
    /// spec.md §4.3 ("fails closed on invalid regex at load time, not match
    /// time").
    pub fn compile(spec: &MatcherSpec) -> Result<Matcher, ProxyError> {
        if let Some(pattern) = &spec.exact_match {
            return Ok(Matcher::Exact(pattern.clone()));
        }
        if let Some(pattern) = &spec.glob_match {
            let compiled = globset::Glob::new(pattern)
                .map_err(|e| ProxyError::Validation(format!("invalid glob pattern: {e}")))?
                .compile_matcher();
            return Ok(Matcher::Glob {
                pattern: pattern.clone(),
                compiled,
            });
        }
        if let Some(pattern) = &spec.regex_match {
            let compiled = regex::Regex::new(pattern)
                .map_err(|e| ProxyError::Validation(format!("invalid regex pattern: {e}")))?;
            return Ok(Matcher::Regex {
                pattern: pattern.clone(),
                compiled,
            });
        }
        if let Some(value) = &spec.json_match {
            return Ok(Matcher::Json(value.clone()));
        }
        if let Some(xml) = &spec.xml_match {
            return Ok(Matcher::Xml(xml.clone()));
        }
        if let Some(expr) = &spec.xpath_match {
            return Ok(Matcher::XPath(expr.clone()));
        }
        if let Some(expr) = &spec.json_path_match {
            let compiled = serde_json_path::JsonPath::parse(expr)
                .map_err(|e| ProxyError::Validation(format!("invalid jsonpath expression: {e}")))?;
            return Ok(Matcher::JsonPath {
                expr: expr.clone(),
                compiled,
            });
        }
        Err(ProxyError::Validation(
            "matcher object must set exactly one strategy".to_string(),
        ))
    }

    /// Matches `value` against this matcher's strategy.
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Matcher::Exact(expected) => value == expected,
            Matcher::Glob { compiled, .. } => compiled.is_match(value),
            Matcher::Regex { compiled, .. } => compiled.is_match(value),
            Matcher::Json(expected) => match serde_json::from_str::<serde_json::Value>(value) {
                Ok(actual) => &actual == expected,
                Err(_) => false,
            },
            Matcher::Xml(expected) => xml_canonically_equal(expected, value),
            Matcher::XPath(expr) => xpath_yields_nonempty(expr, value),
            Matcher::JsonPath { compiled, .. } => {
                match serde_json::from_str::<serde_json::Value>(value) {
                    Ok(actual) => !compiled.query(&actual).is_empty(),
                    Err(_) => false,
                }
            }
        }
    }

    /// Like [`Matcher::matches`], but compares `Exact` case-insensitively —
    /// used only for the `destination` field, which is canonicalized to
    /// lower-case on both the stored pattern and the live request.
    pub fn matches_destination(&self, value: &str) -> bool {
        match self {
            Matcher::Exact(expected) => value.eq_ignore_ascii_case(expected),
            other => other.matches(value),
        }
    }
}

fn xml_canonically_equal(expected_xml: &str, actual_xml: &str) -> bool {
    let (expected_pkg, actual_pkg) = match (
        sxd_document::parser::parse(expected_xml),
        sxd_document::parser::parse(actual_xml),
    ) {
        (Ok(e), Ok(a)) => (e, a),
        _ => return false,
    };
    let expected_doc = expected_pkg.as_document();
    let actual_doc = actual_pkg.as_document();
    elements_equal(expected_doc.root(), actual_doc.root())
}

fn elements_equal<'d>(a: sxd_document::dom::Root<'d>, b: sxd_document::dom::Root<'d>) -> bool {
    use sxd_document::dom::ChildOfRoot;

    let a_children: Vec<_> = a
        .children()
        .into_iter()
        .filter(|c| matches!(c, ChildOfRoot::Element(_)))
        .collect();
    let b_children: Vec<_> = b
        .children()
        .into_iter()
        .filter(|c| matches!(c, ChildOfRoot::Element(_)))
        .collect();

    if a_children.len() != b_children.len() {
        return false;
    }
    a_children.iter().zip(b_children.iter()).all(|(x, y)| match (x, y) {
        (ChildOfRoot::Element(ex), ChildOfRoot::Element(ey)) => element_trees_equal(*ex, *ey),
        _ => false,
    })
}

fn element_trees_equal<'d>(a: sxd_document::dom::Element<'d>, b: sxd_document::dom::Element<'d>) -> bool {
    use sxd_document::dom::ChildOfElement;

    if a.name() != b.name() {
        return false;
    }

    let mut a_attrs: Vec<_> = a
        .attributes()
        .iter()
        .map(|attr| (attr.name().local_part().to_string(), attr.value().to_string()))
        .collect();
    let mut b_attrs: Vec<_> = b
        .attributes()
        .iter()
        .map(|attr| (attr.name().local_part().to_string(), attr.value().to_string()))
        .collect();
    a_attrs.sort();
    b_attrs.sort();
    if a_attrs != b_attrs {
        return false;
    }

    let text_of = |children: &[ChildOfElement<'d>]| -> String {
        children
            .iter()
            .filter_map(|c| match c {
                ChildOfElement::Text(t) => Some(t.text().trim()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    };

    let a_children = a.children();
    let b_children = b.children();
    if text_of(&a_children) != text_of(&b_children) {
        return false;
    }

    let a_elems: Vec<_> = a_children
        .iter()
        .filter_map(|c| match c {
            ChildOfElement::Element(e) => Some(*e),
            _ => None,
        })
        .collect();
    let b_elems: Vec<_> = b_children
        .iter()
        .filter_map(|c| match c {
            ChildOfElement::Element(e) => Some(*e),
            _ => None,
        })
        .collect();

    a_elems.len() == b_elems.len()
        && a_elems
            .iter()
            .zip(b_elems.iter())
            .all(|(x, y)| element_trees_equal(*x, *y))
}

fn xpath_yields_nonempty(expr: &str, body: &str) -> bool {
    let package = match sxd_document::parser::parse(body) {
        Ok(p) => p,
        Err(_) => return false,
    };
    let document = package.as_document();

    let xpath = match sxd_xpath::Factory::new().build(expr) {
        Ok(Some(x)) => x,
        _ => return false,
    };
    let context = sxd_xpath::Context::new();
    match xpath.evaluate(&context, document.root()) {
        Ok(sxd_xpath::Value::Nodeset(nodes)) => nodes.size() > 0,
        _ => false,
    }
}

/// A request matcher set with every field's pattern pre-compiled.
#[derive(Debug, Clone)]
pub struct CompiledRequestMatcherSet {
    pub scheme: Option<Matcher>,
    pub method: Option<Matcher>,
    pub destination: Option<Matcher>,
    pub path: Option<Matcher>,
    pub query: Option<BTreeMap<String, Matcher>>,
    pub body: Option<Matcher>,
    pub headers: Option<BTreeMap<String, Vec<String>>>,
}

impl CompiledRequestMatcherSet {
    fn compile(set: &RequestMatcherSetV3) -> Result<Self, ProxyError> {
        let query = set
            .query
            .as_ref()
            .map(|m| -> Result<BTreeMap<String, Matcher>, ProxyError> {
                m.iter()
                    .map(|(k, v)| Ok((k.clone(), Matcher::compile(v)?)))
                    .collect()
            })
            .transpose()?;

        Ok(Self {
            scheme: set.scheme.as_ref().map(Matcher::compile).transpose()?,
            method: set.method.as_ref().map(Matcher::compile).transpose()?,
            destination: set.destination.as_ref().map(Matcher::compile).transpose()?,
            path: set.path.as_ref().map(Matcher::compile).transpose()?,
            query,
            body: set.body.as_ref().map(Matcher::compile).transpose()?,
            headers: set.headers.clone(),
        })
    }
}

/// A stored pair with its matcher set pre-compiled and ready to score
/// against incoming requests.
#[derive(Debug, Clone)]
pub struct CompiledPair {
    pub request: CompiledRequestMatcherSet,
    pub response: ResponseView,
}

impl CompiledPair {
    pub fn compile(pair: &PairV3) -> Result<Self, ProxyError> {
        Ok(Self {
            request: CompiledRequestMatcherSet::compile(&pair.request)?,
            response: pair.response.clone(),
        })
    }

    pub fn templated(&self) -> bool {
        self.response.templated.unwrap_or(false)
    }
}

/// Selection strategy among pairs that all satisfy the matcher fields they
/// declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Return the first pair whose every declared field matches.
    First,
    /// Return the fully-matching pair with the most declared fields (ties
    /// broken by insertion order).
    Strongest,
}

/// The disqualified pair with the highest partial match score, carried by
/// [`crate::error::ProxyError::Matching`] for diagnostic reporting.
#[derive(Debug, Clone, Serialize)]
pub struct ClosestMiss {
    pub pair_index: usize,
    pub score: usize,
}

/// Evaluates every declared (non-nil) field of `pair` against `request`,
/// returning `(matched_fields, total_declared, all_matched)`.
fn score_pair(pair: &CompiledRequestMatcherSet, request: &RequestDetails) -> (usize, usize, bool) {
    let request_query = parse_query_map(&request.query);

    let checks: [Option<bool>; 7] = [
        pair.scheme.as_ref().map(|m| m.matches(&request.scheme)),
        pair.method.as_ref().map(|m| m.matches(&request.method)),
        pair.destination
            .as_ref()
            .map(|m| m.matches_destination(&request.destination)),
        pair.path.as_ref().map(|m| m.matches(&request.path)),
        pair.body.as_ref().map(|m| m.matches(&request.body)),
        pair.query.as_ref().map(|m| query_matches(m, &request_query)),
        pair.headers
            .as_ref()
            .map(|m| headers_match(m, &request.headers)),
    ];

    let declared = checks.iter().filter(|c| c.is_some()).count();
    let matched = checks.iter().filter(|c| matches!(c, Some(true))).count();
    let all_matched = checks.iter().all(|c| !matches!(c, Some(false)));

    (matched, declared, all_matched)
}

/// Builds a last-value-wins key→value map from a canonical query string.
fn parse_query_map(query: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    if query.is_empty() {
        return map;
    }
    for (k, v) in url::form_urlencoded::parse(query.as_bytes()) {
        map.insert(k.into_owned(), v.into_owned());
    }
    map
}

/// Every key in `pair` must be present in `request` and match; request keys
/// absent from `pair` are ignored.
fn query_matches(pair: &BTreeMap<String, Matcher>, request: &BTreeMap<String, String>) -> bool {
    pair.iter().all(|(key, matcher)| {
        request
            .get(key)
            .map(|value| matcher.matches(value))
            .unwrap_or(false)
    })
}

/// Every header in `pair` must be present in `request`; each expected value
/// must literally appear among the request's values for that header, where
/// a single request header value may itself carry comma-separated values.
fn headers_match(pair: &BTreeMap<String, Vec<String>>, request: &HeaderMultiMap) -> bool {
    pair.iter().all(|(name, expected_values)| {
        let Some(actual_values) = request.get(name) else {
            return false;
        };
        let actual_flat: Vec<&str> = actual_values
            .iter()
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .collect();
        expected_values
            .iter()
            .all(|expected| actual_flat.contains(&expected.trim()))
    })
}

/// Selects the best pair for `request` among `pairs` under `strategy`.
///
/// Returns `Ok` with the zero-based index into `pairs` and its response on
/// a match, or `Err` with the closest miss (the disqualified pair — one
/// with at least one declared field that failed — with the highest partial
/// score) when nothing fully matches.
pub fn find_match<'p>(
    pairs: &'p [CompiledPair],
    request: &RequestDetails,
    strategy: Strategy,
) -> Result<(usize, &'p ResponseView), Option<ClosestMiss>> {
    let mut best_full: Option<(usize, usize)> = None; // (pair_index, score)
    let mut best_miss: Option<ClosestMiss> = None;

    for (index, pair) in pairs.iter().enumerate() {
        let (matched, _declared, all_matched) = score_pair(&pair.request, request);

        if all_matched {
            if strategy == Strategy::First {
                return Ok((index, &pair.response));
            }
            let better = best_full.map(|(_, best_score)| matched > best_score).unwrap_or(true);
            if better {
                best_full = Some((index, matched));
            }
        } else {
            let better = best_miss.as_ref().map(|m| matched > m.score).unwrap_or(true);
            if better {
                best_miss = Some(ClosestMiss {
                    pair_index: index,
                    score: matched,
                });
            }
        }
    }

    match best_full {
        Some((index, _)) => Ok((index, &pairs[index].response)),
        None => Err(best_miss),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::HeaderMultiMap;
    use crate::simulation::schema::MatcherSpec;

    fn req(path: &str) -> RequestDetails {
        RequestDetails {
            scheme: "http".into(),
            method: "GET".into(),
            destination: "example.com".into(),
            path: path.into(),
            query: String::new(),
            body: String::new(),
            headers: HeaderMultiMap::default(),
        }
    }

    fn pair_with_path(pattern: &str) -> CompiledPair {
        let mut set = RequestMatcherSetV3::default();
        set.path = Some(MatcherSpec::exact(pattern));
        CompiledPair::compile(&PairV3 {
            request: set,
            response: ResponseView {
                status: 200,
                body: "hit".into(),
                ..Default::default()
            },
        })
        .unwrap()
    }

    #[test]
    fn first_strategy_returns_first_full_match() {
        let pairs = vec![pair_with_path("/a"), pair_with_path("/b")];
        let (idx, resp) = find_match(&pairs, &req("/b"), Strategy::First).unwrap();
        assert_eq!(idx, 1);
        assert_eq!(resp.body, "hit");
    }

    #[test]
    fn no_match_reports_closest_miss() {
        let pairs = vec![pair_with_path("/a")];
        let err = find_match(&pairs, &req("/z"), Strategy::First).unwrap_err();
        assert!(err.is_some());
    }

    #[test]
    fn nil_field_is_wildcard() {
        let pairs = vec![CompiledPair::compile(&PairV3 {
            request: RequestMatcherSetV3::default(),
            response: ResponseView {
                status: 204,
                ..Default::default()
            },
        })
        .unwrap()];
        let (idx, _) = find_match(&pairs, &req("/anything"), Strategy::First).unwrap();
        assert_eq!(idx, 0);
    }

    #[test]
    fn strongest_prefers_more_specific_pair() {
        let mut specific = RequestMatcherSetV3::default();
        specific.path = Some(MatcherSpec::exact("/a"));
        specific.method = Some(MatcherSpec::exact("GET"));
        let specific_pair = CompiledPair::compile(&PairV3 {
            request: specific,
            response: ResponseView {
                status: 200,
                body: "specific".into(),
                ..Default::default()
            },
        })
        .unwrap();

        let wildcard_pair = CompiledPair::compile(&PairV3 {
            request: RequestMatcherSetV3::default(),
            response: ResponseView {
                status: 200,
                body: "wildcard".into(),
                ..Default::default()
            },
        })
        .unwrap();

        let pairs = vec![wildcard_pair, specific_pair];
        let (idx, resp) = find_match(&pairs, &req("/a"), Strategy::Strongest).unwrap();
        assert_eq!(idx, 1);
        assert_eq!(resp.body, "specific");
    }

    #[test]
    fn headers_support_comma_separated_values() {
        let mut set = RequestMatcherSetV3::default();
        let mut headers = BTreeMap::new();
        headers.insert("accept".to_string(), vec!["application/json".to_string()]);
        set.headers = Some(headers);
        let pair = CompiledPair::compile(&PairV3 {
            request: set,
            response: ResponseView {
                status: 200,
                ..Default::default()
            },
        })
        .unwrap();

        let mut request = req("/");
        request
            .headers
            .push("Accept", "text/html, application/json".to_string());

        let pairs = vec![pair];
        assert!(find_match(&pairs, &request, Strategy::First).is_ok());
    }
}
