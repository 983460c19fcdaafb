//! Selector resolution from bare URLs.
//!
//! A `select` request either names an entity id directly (`/4f0c...:tree`) or
//! carries a query token that an external mini-parser turns into a query
//! object (`/tag=div`). Either way the derived selector is the last step of
//! any selector chain, so `modifier.laststep` is always forced on.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Modifier key marking the final step of a selector chain.
pub const LASTSTEP: &str = "laststep";

/// URLs addressing the collection as a whole; the selector comes from headers.
const COLLECTION_URLS: [&str; 2] = ["/select", "/"];

/// Normalised query descriptor consumed by `select` handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Selector {
    /// Direct reference to a single entity.
    Id(IdSelector),
    /// Query object produced by a selector parser; opaque to the supplier.
    Query(Map<String, Value>),
}

/// Direct entity reference with modifier flags.
///
/// Objects carrying any other field decode as [`Selector::Query`] instead, so
/// header selectors are never truncated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdSelector {
    /// Entity id.
    pub diggerid: String,
    /// Modifier flags such as `laststep` or `tree`.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub modifier: Map<String, Value>,
}

impl Selector {
    /// Creates an id selector without modifiers.
    pub fn id(diggerid: impl Into<String>) -> Self {
        Self::Id(IdSelector {
            diggerid: diggerid.into(),
            modifier: Map::new(),
        })
    }

    /// Returns the entity id for id selectors.
    pub fn diggerid(&self) -> Option<&str> {
        match self {
            Self::Id(selector) => Some(selector.diggerid.as_str()),
            Self::Query(_) => None,
        }
    }

    /// Returns the modifier map, if the selector carries one.
    pub fn modifier(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Id(selector) => Some(&selector.modifier),
            Self::Query(query) => query.get("modifier").and_then(Value::as_object),
        }
    }

    /// Returns whether the named modifier flag is set to `true`.
    pub fn has_modifier(&self, name: &str) -> bool {
        self.modifier()
            .and_then(|modifier| modifier.get(name))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    fn mark_laststep(&mut self) {
        let modifier = match self {
            Self::Id(selector) => &mut selector.modifier,
            Self::Query(query) => {
                let slot = query
                    .entry("modifier")
                    .or_insert_with(|| Value::Object(Map::new()));
                if !slot.is_object() {
                    *slot = Value::Object(Map::new());
                }
                match slot {
                    Value::Object(modifier) => modifier,
                    _ => return,
                }
            }
        };
        modifier.insert(LASTSTEP.to_owned(), Value::Bool(true));
    }
}

/// Parses a query token into a query selector object.
pub trait SelectorParser: Send + Sync {
    /// Parses `token` into a query object.
    fn parse(&self, token: &str) -> Map<String, Value>;
}

impl<F> SelectorParser for F
where
    F: Fn(&str) -> Map<String, Value> + Send + Sync,
{
    fn parse(&self, token: &str) -> Map<String, Value> {
        self(token)
    }
}

/// Parser that keeps the token as an unparsed `string` field.
///
/// Stands in when no query grammar is plugged in; the backend receives the
/// raw token and decides what it means.
#[derive(Debug, Default, Clone, Copy)]
pub struct LiteralSelectorParser;

impl SelectorParser for LiteralSelectorParser {
    fn parse(&self, token: &str) -> Map<String, Value> {
        let mut query = Map::new();
        query.insert(String::from("string"), Value::String(token.to_owned()));
        query
    }
}

/// Predicate deciding whether a URL token is an entity id.
pub type IdMatcher = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Default id predicate: 32 hexadecimal digits, the dash-free UUID form.
pub fn is_diggerid(token: &str) -> bool {
    token.len() == 32 && token.bytes().all(|byte| byte.is_ascii_hexdigit())
}

/// Derives selectors from the first URL segment.
#[derive(Clone)]
pub struct SelectorResolver {
    matcher: IdMatcher,
    parser: Arc<dyn SelectorParser>,
}

impl fmt::Debug for SelectorResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectorResolver").finish_non_exhaustive()
    }
}

impl Default for SelectorResolver {
    fn default() -> Self {
        Self::new(Arc::new(is_diggerid), Arc::new(LiteralSelectorParser))
    }
}

impl SelectorResolver {
    /// Creates a resolver from an id predicate and a query parser.
    pub fn new(matcher: IdMatcher, parser: Arc<dyn SelectorParser>) -> Self {
        Self { matcher, parser }
    }

    /// Returns a resolver using a different id predicate.
    #[must_use]
    pub fn with_matcher(mut self, matcher: IdMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    /// Returns a resolver using a different query parser.
    #[must_use]
    pub fn with_parser(mut self, parser: Arc<dyn SelectorParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Returns whether `url` names something to resolve rather than the
    /// collection itself.
    pub fn applies_to(url: &str) -> bool {
        !COLLECTION_URLS.contains(&url)
    }

    /// Resolves the selector named by the first segment of `url`.
    ///
    /// The segment splits on `:` into a base token and modifier tokens. An id
    /// base yields an id selector with each modifier token set; any other base
    /// goes to the query parser. Returns `None` for `/select` and `/`.
    pub fn resolve(&self, url: &str) -> Option<Selector> {
        if !Self::applies_to(url) {
            return None;
        }

        let path = url.strip_prefix('/').unwrap_or(url);
        let segment = path.split('/').next().unwrap_or_default();
        let mut tokens = segment.split(':');
        let base = tokens.next().unwrap_or_default();

        let mut selector = if (self.matcher)(base) {
            let modifier = tokens
                .filter(|token| !token.is_empty())
                .map(|token| (token.to_owned(), Value::Bool(true)))
                .collect();
            Selector::Id(IdSelector {
                diggerid: base.to_owned(),
                modifier,
            })
        } else {
            Selector::Query(self.parser.parse(base))
        };
        selector.mark_laststep();
        Some(selector)
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};
    use serde_json::json;

    use super::*;

    #[fixture]
    fn resolver() -> SelectorResolver {
        SelectorResolver::default().with_matcher(Arc::new(|token: &str| token == "abc123"))
    }

    #[rstest]
    #[case("/select")]
    #[case("/")]
    fn collection_urls_are_not_resolved(resolver: SelectorResolver, #[case] url: &str) {
        assert_eq!(resolver.resolve(url), None);
    }

    #[rstest]
    fn id_tokens_become_id_selectors(resolver: SelectorResolver) {
        let selector = resolver.resolve("/abc123").expect("selector");
        assert_eq!(
            serde_json::to_value(&selector).expect("encode"),
            json!({"diggerid": "abc123", "modifier": {"laststep": true}})
        );
    }

    #[rstest]
    fn id_modifiers_are_flagged(resolver: SelectorResolver) {
        let selector = resolver.resolve("/abc123:tree:children/rest").expect("selector");
        assert_eq!(selector.diggerid(), Some("abc123"));
        assert!(selector.has_modifier("tree"));
        assert!(selector.has_modifier("children"));
        assert!(selector.has_modifier(LASTSTEP));
    }

    #[rstest]
    fn other_tokens_go_to_the_parser(resolver: SelectorResolver) {
        let selector = resolver.resolve("/tag=div").expect("selector");
        assert_eq!(
            serde_json::to_value(&selector).expect("encode"),
            json!({"string": "tag=div", "modifier": {"laststep": true}})
        );
    }

    #[test]
    fn parser_modifiers_are_preserved_and_laststep_forced() {
        let parser = |token: &str| {
            let mut query = Map::new();
            query.insert(String::from("tag"), Value::String(token.to_owned()));
            query.insert(String::from("modifier"), json!({"laststep": false, "limit": 3}));
            query
        };
        let resolver = SelectorResolver::default().with_parser(Arc::new(parser));
        let selector = resolver.resolve("/div").expect("selector");
        assert!(selector.has_modifier(LASTSTEP));
        assert_eq!(
            selector.modifier().and_then(|modifier| modifier.get("limit")),
            Some(&json!(3))
        );
    }

    #[test]
    fn replaces_non_object_modifier_from_parser() {
        let parser = |_: &str| {
            let mut query = Map::new();
            query.insert(String::from("modifier"), json!("bogus"));
            query
        };
        let resolver = SelectorResolver::default().with_parser(Arc::new(parser));
        let selector = resolver.resolve("/x").expect("selector");
        assert!(selector.has_modifier(LASTSTEP));
    }

    #[rstest]
    #[case("0123456789abcdef0123456789ABCDEF", true)]
    #[case("abc123", false)]
    #[case("0123456789abcdef0123456789abcdeg", false)]
    fn default_matcher_accepts_dashless_uuids(#[case] token: &str, #[case] expected: bool) {
        assert_eq!(is_diggerid(token), expected);
    }

    #[test]
    fn header_selectors_deserialize_by_shape() {
        let id: Selector = serde_json::from_value(json!({"diggerid": "abc"})).expect("id");
        assert_eq!(id, Selector::id("abc"));

        let query: Selector = serde_json::from_value(json!({"tag": "div"})).expect("query");
        assert!(matches!(query, Selector::Query(_)));
    }

    #[rstest]
    #[case(json!({"diggerid": "abc", "tag": "div", "class": ["red"]}))]
    #[case(json!({"diggerid": "abc", "modifier": {"tree": true}, "limit": 3}))]
    fn id_objects_with_extra_fields_stay_queries(#[case] header: Value) {
        let selector: Selector = serde_json::from_value(header.clone()).expect("selector");
        assert!(matches!(selector, Selector::Query(_)));
        assert_eq!(serde_json::to_value(&selector).expect("encode"), header);
    }

    #[rstest]
    #[case(json!({"diggerid": "abc"}))]
    #[case(json!({"diggerid": "abc", "modifier": {"tree": true}}))]
    fn plain_id_objects_reencode_unchanged(#[case] header: Value) {
        let selector: Selector = serde_json::from_value(header.clone()).expect("selector");
        assert_eq!(selector.diggerid(), Some("abc"));
        assert_eq!(serde_json::to_value(&selector).expect("encode"), header);
    }
}
