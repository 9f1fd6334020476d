//! Versioned simulation wire shapes and the v1 → v2 → v3 upgrade path (C2).
//!
//! Each schema version is kept as its own data shape (`SimulationV1`,
//! `SimulationV2`, `SimulationV3`) with a pure function upgrading one to the
//! next, per the design notes in spec.md §9. [`load`] dispatches on
//! `meta.schemaVersion` and composes the upgrade chain; [`export`] always
//! emits v3.
//!
//! # Examples
//!
//! ```rust
//! use simulacra::simulation::schema::{load, export};
//!
//! let json = br#"{"data":{"pairs":[],"globalActions":{"delays":[]}},
//!                 "meta":{"schemaVersion":"v3","hoverflyVersion":"x","timeExported":"2024-01-01T00:00:00Z"}}"#;
//! let sim = load(json).unwrap();
//! assert_eq!(sim.meta.schema_version, "v3");
//! let bytes = export(&sim);
//! assert!(String::from_utf8(bytes).unwrap().contains("\"schemaVersion\":\"v3\""));
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ProxyError;

/// A single request-field matcher, wire-compatible with the documented
/// `{"exactMatch": "..."}`-style shape. Exactly one field is `Some` — see
/// [`MatcherSpec::strategy_name`] and [`MatcherSpec::pattern`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatcherSpec {
    #[serde(rename = "exactMatch", skip_serializing_if = "Option::is_none")]
    pub exact_match: Option<String>,
    #[serde(rename = "globMatch", skip_serializing_if = "Option::is_none")]
    pub glob_match: Option<String>,
    #[serde(rename = "regexMatch", skip_serializing_if = "Option::is_none")]
    pub regex_match: Option<String>,
    #[serde(rename = "jsonMatch", skip_serializing_if = "Option::is_none")]
    pub json_match: Option<serde_json::Value>,
    #[serde(rename = "xmlMatch", skip_serializing_if = "Option::is_none")]
    pub xml_match: Option<String>,
    #[serde(rename = "xpathMatch", skip_serializing_if = "Option::is_none")]
    pub xpath_match: Option<String>,
    #[serde(rename = "jsonPathMatch", skip_serializing_if = "Option::is_none")]
    pub json_path_match: Option<String>,
}

impl MatcherSpec {
    /// Builds an `exactMatch` spec with the given pattern.
    pub fn exact(value: impl Into<String>) -> Self {
        Self {
            exact_match: Some(value.into()),
            ..Default::default()
        }
    }

    /// Builds a `globMatch` spec with the given pattern.
    pub fn glob(value: impl Into<String>) -> Self {
        Self {
            glob_match: Some(value.into()),
            ..Default::default()
        }
    }

    /// Name of whichever single strategy field is set (`"exactMatch"`, …).
    /// `None` if no field is set, which is invalid per the one-of invariant.
    pub fn strategy_name(&self) -> Option<&'static str> {
        if self.exact_match.is_some() {
            Some("exactMatch")
        } else if self.glob_match.is_some() {
            Some("globMatch")
        } else if self.regex_match.is_some() {
            Some("regexMatch")
        } else if self.json_match.is_some() {
            Some("jsonMatch")
        } else if self.xml_match.is_some() {
            Some("xmlMatch")
        } else if self.xpath_match.is_some() {
            Some("xpathMatch")
        } else if self.json_path_match.is_some() {
            Some("jsonPathMatch")
        } else {
            None
        }
    }

    /// Rebuilds a spec with the same strategy as `self` but a new string
    /// pattern. Used by the v2→v3 query-splitting algorithm, which must
    /// preserve the original matcher strategy for each derived key.
    ///
    /// Only meaningful for the string-pattern strategies (exact/glob/regex);
    /// structural strategies (json/xml/xpath/jsonPath) have no string pattern
    /// to rebuild and are returned unchanged.
    pub fn with_pattern(&self, pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        match self.strategy_name() {
            Some("exactMatch") => MatcherSpec::exact(pattern),
            Some("globMatch") => MatcherSpec::glob(pattern),
            Some("regexMatch") => MatcherSpec {
                regex_match: Some(pattern),
                ..Default::default()
            },
            _ => self.clone(),
        }
    }

    /// Is this one of the string-pattern strategies that the v2→v3 query
    /// split algorithm knows how to split on `&`/`=`?
    fn is_splittable(&self) -> bool {
        self.exact_match.is_some() || self.glob_match.is_some()
    }

    /// The raw string pattern, for the splittable strategies only.
    fn pattern(&self) -> Option<&str> {
        self.exact_match
            .as_deref()
            .or(self.glob_match.as_deref())
    }
}

/// Request matcher set, v3 shape: `query` is a map keyed by parameter name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMatcherSetV3 {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheme: Option<MatcherSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<MatcherSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<MatcherSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<MatcherSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<BTreeMap<String, MatcherSpec>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<MatcherSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, Vec<String>>>,
}

/// Request matcher set, v2 shape: `query` is a single matcher over the
/// whole query string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMatcherSetV2 {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheme: Option<MatcherSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<MatcherSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<MatcherSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<MatcherSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<MatcherSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<MatcherSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, Vec<String>>>,
}

/// Request shape, v1: every field is a scalar string (or absent).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestV1 {
    pub scheme: Option<String>,
    pub method: Option<String>,
    pub destination: Option<String>,
    pub path: Option<String>,
    pub query: Option<String>,
    pub body: Option<String>,
    /// `"recording"` (the default) maps to `exactMatch`; `"template"` maps
    /// to `globMatch`.
    pub request_type: Option<String>,
}

impl RequestV1 {
    fn is_empty(&self) -> bool {
        self.scheme.is_none()
            && self.method.is_none()
            && self.destination.is_none()
            && self.path.is_none()
            && self.query.is_none()
            && self.body.is_none()
    }
}

/// Response shape, identical across all three schema versions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseView {
    pub status: u16,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub encoded_body: bool,
    #[serde(default)]
    pub headers: BTreeMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub templated: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PairV1 {
    pub request: Option<RequestV1>,
    pub response: Option<ResponseView>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PairV2 {
    pub request: RequestMatcherSetV2,
    pub response: ResponseView,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PairV3 {
    pub request: RequestMatcherSetV3,
    pub response: ResponseView,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelayV3 {
    pub url_pattern: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_method: Option<String>,
    pub delay_millis: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalActionsV3 {
    #[serde(default)]
    pub delays: Vec<DelayV3>,
}

#[derive(Debug, Clone, Deserialize)]
struct MetaVersionOnly {
    #[serde(rename = "schemaVersion")]
    schema_version: Option<String>,
}

/// Probes only the nested `meta` object of a simulation document, without
/// requiring the rest of the document to parse into any particular shape.
#[derive(Debug, Clone, Deserialize)]
struct MetaProbe {
    meta: Option<MetaVersionOnly>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaV3 {
    pub schema_version: String,
    pub hoverfly_version: String,
    pub time_exported: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataV1 {
    #[serde(default)]
    pub pairs: Vec<PairV1>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationV1 {
    pub data: DataV1,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataV2 {
    #[serde(default)]
    pub pairs: Vec<PairV2>,
    #[serde(default, rename = "globalActions")]
    pub global_actions: GlobalActionsV3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationV2 {
    pub data: DataV2,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataV3 {
    #[serde(default)]
    pub pairs: Vec<PairV3>,
    #[serde(default, rename = "globalActions")]
    pub global_actions: GlobalActionsV3,
}

/// A fully upgraded, current-schema simulation (spec.md §3 `Simulation`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationV3 {
    pub data: DataV3,
    pub meta: MetaV3,
}

/// Parses arbitrary simulation JSON (v1, v2, or v3) and upgrades it to v3.
///
/// Returns [`ProxyError::Validation`] if the document is not a JSON object
/// with a string `meta.schemaVersion`, and [`ProxyError::Version`] if that
/// version is not one of `v1`/`v2`/`v3`.
pub fn load(bytes: &[u8]) -> Result<SimulationV3, ProxyError> {
    let probe: MetaProbe = serde_json::from_slice(bytes).map_err(|_| {
        ProxyError::Validation(
            "Invalid JSON, missing meta.schemaVersion".to_string(),
        )
    })?;
    let version = probe
        .meta
        .and_then(|m| m.schema_version)
        .ok_or_else(|| ProxyError::Validation("Invalid JSON, missing meta.schemaVersion".to_string()))?;

    match version.as_str() {
        "v1" => {
            let v1: SimulationV1 = serde_json::from_slice(bytes)
                .map_err(|e| ProxyError::Validation(e.to_string()))?;
            let v2 = upgrade_v1_to_v2(v1)?;
            Ok(upgrade_v2_to_v3(v2))
        }
        "v2" => {
            let v2: SimulationV2 = serde_json::from_slice(bytes)
                .map_err(|e| ProxyError::Validation(e.to_string()))?;
            Ok(upgrade_v2_to_v3(v2))
        }
        "v3" => {
            let v3: SimulationV3 = serde_json::from_slice(bytes)
                .map_err(|e| ProxyError::Validation(e.to_string()))?;
            Ok(v3)
        }
        other => Err(ProxyError::Version(other.to_string())),
    }
}

/// Serializes a v3 simulation back to its canonical JSON shape. Exports
/// always emit v3, regardless of what version was loaded.
pub fn export(sim: &SimulationV3) -> Vec<u8> {
    serde_json::to_vec(sim).expect("SimulationV3 is always serializable")
}

/// Stamps `meta.hoverflyVersion`/`timeExported` and forces `schemaVersion`
/// to `"v3"`, for use when building a simulation to export from scratch
/// (e.g. the in-memory store never round-tripped through `load`).
pub fn fresh_meta(time_exported: impl Into<String>) -> MetaV3 {
    MetaV3 {
        schema_version: "v3".to_string(),
        hoverfly_version: env!("CARGO_PKG_VERSION").to_string(),
        time_exported: time_exported.into(),
    }
}

/// v1 → v2: scalar fields become single-field matchers (`exactMatch` for
/// `requestType: "recording"`, the default, or `globMatch` for
/// `"template"`); headers are dropped.
pub fn upgrade_v1_to_v2(v1: SimulationV1) -> Result<SimulationV2, ProxyError> {
    let mut pairs = Vec::with_capacity(v1.data.pairs.len());

    for pair in v1.data.pairs {
        let request_empty = pair.request.as_ref().map(RequestV1::is_empty).unwrap_or(true);
        if request_empty && pair.response.is_none() {
            return Err(ProxyError::Validation(
                "Invalid v1 simulation: request is required, response is required".to_string(),
            ));
        }

        let request = pair.request.unwrap_or_default();
        let is_template = request.request_type.as_deref() == Some("template");
        let build = |value: &Option<String>| -> Option<MatcherSpec> {
            value.as_ref().map(|v| {
                if is_template {
                    MatcherSpec::glob(v.clone())
                } else {
                    MatcherSpec::exact(v.clone())
                }
            })
        };

        let request_v2 = RequestMatcherSetV2 {
            scheme: build(&request.scheme),
            method: build(&request.method),
            destination: build(&request.destination),
            path: build(&request.path),
            query: build(&request.query),
            body: build(&request.body),
            headers: None,
        };

        pairs.push(PairV2 {
            request: request_v2,
            response: pair.response.unwrap_or_default(),
        });
    }

    Ok(SimulationV2 {
        data: DataV2 {
            pairs,
            global_actions: GlobalActionsV3::default(),
        },
    })
}

/// v2 → v3: the single query matcher over the whole query string becomes a
/// map keyed by parameter name, per the splitting algorithm in spec.md §4.2.
pub fn upgrade_v2_to_v3(v2: SimulationV2) -> SimulationV3 {
    let pairs = v2
        .data
        .pairs
        .into_iter()
        .map(|pair| PairV3 {
            request: upgrade_request_v2_to_v3(pair.request),
            response: pair.response,
        })
        .collect();

    SimulationV3 {
        data: DataV3 {
            pairs,
            global_actions: v2.data.global_actions,
        },
        meta: fresh_meta(""),
    }
}

fn upgrade_request_v2_to_v3(req: RequestMatcherSetV2) -> RequestMatcherSetV3 {
    RequestMatcherSetV3 {
        scheme: req.scheme,
        method: req.method,
        destination: req.destination,
        path: req.path,
        query: req.query.and_then(split_query_matcher),
        body: req.body,
        headers: req.headers,
    }
}

/// Splits a v2 query matcher into the v3 per-key map.
///
/// - `exactMatch`/`globMatch` patterns are split on `&`, each `k=v` segment
///   becoming `{k: {same-strategy: v}}`; a bare `k` becomes
///   `{k: {same-strategy: ""}}`. Duplicate keys keep the **last** value.
///   Commas inside a value are never split on.
/// - Any other strategy (regex/json/jsonPath/xml/xpath) has no sensible
///   per-key split, so the whole matcher is preserved opaquely under the
///   empty-string key.
/// - A syntactically unparseable pattern (bad percent-encoding) logs a
///   warning and drops the query field for that pair entirely.
fn split_query_matcher(spec: MatcherSpec) -> Option<BTreeMap<String, MatcherSpec>> {
    if !spec.is_splittable() {
        let mut map = BTreeMap::new();
        map.insert(String::new(), spec);
        return Some(map);
    }

    let pattern = spec.pattern().unwrap_or("");
    if pattern.is_empty() {
        return Some(BTreeMap::new());
    }

    if !is_percent_encoding_valid(pattern) {
        tracing::warn!(
            pattern = pattern,
            "There was an error when upgrading v2 simulation to v3"
        );
        return None;
    }

    let mut map: BTreeMap<String, MatcherSpec> = BTreeMap::new();
    for segment in pattern.split('&') {
        if segment.is_empty() {
            continue;
        }
        match segment.split_once('=') {
            Some((k, v)) => {
                map.insert(k.to_string(), spec.with_pattern(v.to_string()));
            }
            None => {
                map.insert(segment.to_string(), spec.with_pattern(String::new()));
            }
        }
    }
    Some(map)
}

/// Conservative percent-encoding validity check: every `%` must be followed
/// by two hex digits.
fn is_percent_encoding_valid(s: &str) -> bool {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if i + 2 >= bytes.len()
                || !bytes[i + 1].is_ascii_hexdigit()
                || !bytes[i + 2].is_ascii_hexdigit()
            {
                return false;
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_key(map: &BTreeMap<String, MatcherSpec>, key: &str) -> MatcherSpec {
        map.get(key).cloned().unwrap_or_else(|| panic!("missing key {key}"))
    }

    #[test]
    fn v2_to_v3_single_query_exact() {
        let spec = MatcherSpec::exact("q=something");
        let map = split_query_matcher(spec).unwrap();
        assert_eq!(one_key(&map, "q").exact_match.as_deref(), Some("something"));
    }

    #[test]
    fn v2_to_v3_multi_query_glob() {
        let spec = MatcherSpec::glob("limit=*&order=asc");
        let map = split_query_matcher(spec).unwrap();
        assert_eq!(one_key(&map, "limit").glob_match.as_deref(), Some("*"));
        assert_eq!(one_key(&map, "order").glob_match.as_deref(), Some("asc"));
    }

    #[test]
    fn v2_to_v3_key_only_with_ampersand() {
        let spec = MatcherSpec::exact("something&else");
        let map = split_query_matcher(spec).unwrap();
        assert_eq!(one_key(&map, "something").exact_match.as_deref(), Some(""));
        assert_eq!(one_key(&map, "else").exact_match.as_deref(), Some(""));
    }

    #[test]
    fn v2_to_v3_duplicate_key_last_wins() {
        let spec = MatcherSpec::exact("something=one&something=two");
        let map = split_query_matcher(spec).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(one_key(&map, "something").exact_match.as_deref(), Some("two"));
    }

    #[test]
    fn v2_to_v3_comma_value_preserved() {
        let spec = MatcherSpec::exact("something=one,two");
        let map = split_query_matcher(spec).unwrap();
        assert_eq!(one_key(&map, "something").exact_match.as_deref(), Some("one,two"));
    }

    #[test]
    fn v2_to_v3_regex_query_is_opaque() {
        let spec = MatcherSpec {
            regex_match: Some("^foo.*".to_string()),
            ..Default::default()
        };
        let map = split_query_matcher(spec).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(one_key(&map, "").regex_match.as_deref(), Some("^foo.*"));
    }

    #[test]
    fn v2_to_v3_bad_percent_encoding_drops_query() {
        let spec = MatcherSpec::exact("q=%zz");
        assert!(split_query_matcher(spec).is_none());
    }

    #[test]
    fn bad_json_load_is_validation_error() {
        let err = load(b"{}{}[^.^]{}{}").unwrap_err();
        assert!(matches!(err, ProxyError::Validation(_)));
    }

    #[test]
    fn v1_to_v2_recording_becomes_exact_match() {
        let v1: SimulationV1 = serde_json::from_str(
            r#"{"data":{"pairs":[{"request":{"scheme":"http","path":"/path","requestType":"recording"},"response":{"status":200,"body":"ok"}}]}}"#,
        )
        .unwrap();
        let v2 = upgrade_v1_to_v2(v1).unwrap();
        let pair = &v2.data.pairs[0];
        assert_eq!(pair.request.scheme.as_ref().unwrap().exact_match.as_deref(), Some("http"));
        assert_eq!(pair.request.path.as_ref().unwrap().exact_match.as_deref(), Some("/path"));
        assert!(pair.request.headers.is_none());
    }

    #[test]
    fn v1_to_v2_template_becomes_glob_match() {
        let v1: SimulationV1 = serde_json::from_str(
            r#"{"data":{"pairs":[{"request":{"scheme":"http","path":"/path","requestType":"template"},"response":{"status":200,"body":"ok"}}]}}"#,
        )
        .unwrap();
        let v2 = upgrade_v1_to_v2(v1).unwrap();
        let pair = &v2.data.pairs[0];
        assert_eq!(pair.request.scheme.as_ref().unwrap().glob_match.as_deref(), Some("http"));
    }

    #[test]
    fn v1_empty_pair_is_invalid() {
        let v1: SimulationV1 = serde_json::from_str(r#"{"data":{"pairs":[{"request":{},"response":null}]}}"#).unwrap();
        let err = upgrade_v1_to_v2(v1).unwrap_err();
        assert!(matches!(err, ProxyError::Validation(_)));
    }

    #[test]
    fn upgrade_to_v3_is_idempotent() {
        let v2: SimulationV2 = serde_json::from_str(
            r#"{"data":{"pairs":[{"request":{"query":{"exactMatch":"a=a&b=b"}},"response":{"status":200,"body":""}}],"globalActions":{"delays":[]}}}"#,
        )
        .unwrap();
        let v3_first = upgrade_v2_to_v3(v2);
        let bytes = export(&v3_first);
        let v3_second = load(&bytes).unwrap();
        assert_eq!(v3_first.data, v3_second.data);
    }
}
