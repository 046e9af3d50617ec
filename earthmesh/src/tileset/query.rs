//! URL query handling for tileset requests.
//!
//! Every request to the tile service must carry the access credential (`key`)
//! and, once the service has handed one out, the session token (`session`).
//! Both are volatile: they differ between runs for the same tile, so they are
//! stripped when deriving a tile's cache identity.

use std::fmt;

use reqwest::Url;

/// Query parameter holding the access credential.
pub const KEY_PARAM: &str = "key";

/// Query parameter holding the session token.
pub const SESSION_PARAM: &str = "session";

/// File extension of leaf mesh assets.
const MESH_EXTENSION: &str = ".glb";

/// Session token threaded through the fetches of one traversal branch.
///
/// The token starts empty, is replaced whenever a content URI carries a
/// non-empty `session` value, and is stamped onto every later URL of the
/// branch that lacks one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionToken(Option<String>);

impl SessionToken {
    /// Creates an empty token.
    pub fn new() -> Self {
        Self(None)
    }

    /// Returns the current token value.
    pub fn value(&self) -> Option<&str> {
        self.0.as_deref()
    }

    /// Records the URL's `session` value if it has a non-empty one.
    pub fn observe(&mut self, url: &Url) {
        if let Some(session) = query_value(url, SESSION_PARAM).filter(|s| !s.is_empty()) {
            self.0 = Some(session);
        }
    }
}

/// Returns the first value of a query parameter.
pub fn query_value(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

fn has_param(url: &Url, name: &str) -> bool {
    url.query_pairs().any(|(k, _)| k == name)
}

/// Ensures the URL carries the access credential and the current session.
///
/// Parameters already present are left untouched.
pub fn authorize(url: &mut Url, api_key: &str, session: &SessionToken) {
    if !has_param(url, KEY_PARAM) {
        url.query_pairs_mut().append_pair(KEY_PARAM, api_key);
    }
    if let Some(token) = session.value() {
        if !has_param(url, SESSION_PARAM) {
            url.query_pairs_mut().append_pair(SESSION_PARAM, token);
        }
    }
}

/// Returns the URL as a string with the access credential masked, for logs
/// and error messages.
pub fn redacted(url: &Url) -> String {
    if !has_param(url, KEY_PARAM) {
        return url.to_string();
    }
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == KEY_PARAM { "***".into() } else { v.into_owned() };
            (k.into_owned(), v)
        })
        .collect();
    let mut masked = url.clone();
    masked.query_pairs_mut().clear().extend_pairs(pairs);
    masked.to_string()
}

/// Returns true if the URL names a mesh asset directly.
pub fn is_mesh_url(url: &Url) -> bool {
    url.path().to_ascii_lowercase().ends_with(MESH_EXTENSION)
}

/// Stable identity of a tile, independent of credentials and sessions.
///
/// Formed from the URL path plus the remaining query parameters in their
/// original order. Host and scheme are not part of the identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileIdentity(String);

impl TileIdentity {
    /// Derives the identity of a tile URL.
    pub fn from_url(url: &Url) -> Self {
        let remaining: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| k != KEY_PARAM && k != SESSION_PARAM)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let mut stripped = url.clone();
        if remaining.is_empty() {
            stripped.set_query(None);
        } else {
            stripped.query_pairs_mut().clear().extend_pairs(remaining);
        }

        match stripped.query() {
            Some(query) => Self(format!("{}?{}", stripped.path(), query)),
            None => Self(stripped.path().to_string()),
        }
    }

    /// Returns the identity string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TileIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_authorize_adds_key_and_session() {
        let mut u = url("https://tile.example/v1/3dtiles/datasets/x/files/a.json");
        let mut session = SessionToken::new();
        session.observe(&url("https://tile.example/b.json?session=abc"));

        authorize(&mut u, "K", &session);

        assert_eq!(query_value(&u, KEY_PARAM).as_deref(), Some("K"));
        assert_eq!(query_value(&u, SESSION_PARAM).as_deref(), Some("abc"));
    }

    #[test]
    fn test_authorize_keeps_existing_values() {
        let mut u = url("https://tile.example/a.json?session=mine&key=other");
        let mut session = SessionToken::new();
        session.observe(&url("https://tile.example/b.json?session=theirs"));

        authorize(&mut u, "K", &session);

        assert_eq!(u.query(), Some("session=mine&key=other"));
    }

    #[test]
    fn test_authorize_without_session() {
        let mut u = url("https://tile.example/a.json");
        authorize(&mut u, "K", &SessionToken::new());
        assert_eq!(u.query(), Some("key=K"));
    }

    #[test]
    fn test_empty_session_is_not_observed() {
        let mut session = SessionToken::new();
        session.observe(&url("https://tile.example/a.json?session=first"));
        session.observe(&url("https://tile.example/b.json?session="));
        assert_eq!(session.value(), Some("first"));

        session.observe(&url("https://tile.example/c.json?session=second"));
        assert_eq!(session.value(), Some("second"));
    }

    #[test]
    fn test_redacted_masks_key_only() {
        let u = url("https://tile.example/a.json?key=SECRET&session=S");
        let r = redacted(&u);
        assert!(!r.contains("SECRET"));
        assert!(r.contains("session=S"));
        assert_eq!(redacted(&url("https://tile.example/a.json")), "https://tile.example/a.json");
    }

    #[test]
    fn test_mesh_url_detection_ignores_query() {
        assert!(is_mesh_url(&url("https://tile.example/files/x.glb?key=K&session=S")));
        assert!(is_mesh_url(&url("https://tile.example/files/X.GLB")));
        assert!(!is_mesh_url(&url("https://tile.example/files/x.json?f=.glb")));
    }

    #[test]
    fn test_identity_strips_volatile_params() {
        let a = TileIdentity::from_url(&url("https://tile.example/files/x.glb?key=A&session=S1"));
        let b = TileIdentity::from_url(&url("https://tile.example/files/x.glb?session=S2&key=B"));
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "/files/x.glb");
    }

    #[test]
    fn test_identity_keeps_other_params() {
        let a = TileIdentity::from_url(&url("https://tile.example/x.glb?v=3&key=A&lod=2&session=S"));
        let b = TileIdentity::from_url(&url("https://tile.example/x.glb?v=3&lod=2"));
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "/x.glb?v=3&lod=2");

        let c = TileIdentity::from_url(&url("https://tile.example/x.glb?v=4&lod=2"));
        assert_ne!(a, c);
    }

    #[test]
    fn test_identity_ignores_host() {
        let a = TileIdentity::from_url(&url("https://a.example/files/x.glb"));
        let b = TileIdentity::from_url(&url("https://b.example/files/x.glb"));
        assert_eq!(a, b);
    }
}
