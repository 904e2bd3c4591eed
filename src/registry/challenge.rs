//! `WWW-Authenticate: Bearer` challenge parsing.

use url::Url;

use crate::registry::auth::AuthFlowError;

/// Parameters of a registry Bearer challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerChallenge {
    pub realm: Url,
    pub service: Option<String>,
    pub scope: Option<String>,
}

impl BearerChallenge {
    /// Parse a header value such as
    /// `Bearer realm="https://auth.example/token",service="registry",scope="repository:x:pull"`.
    pub fn parse(header: &str) -> Result<Self, AuthFlowError> {
        let header = header.trim();
        let (scheme, params) = header
            .split_once(char::is_whitespace)
            .ok_or_else(|| AuthFlowError::MalformedChallenge(header.to_string()))?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return Err(AuthFlowError::MalformedChallenge(header.to_string()));
        }

        let mut realm = None;
        let mut service = None;
        let mut scope = None;
        for (name, value) in parse_params(params)
            .ok_or_else(|| AuthFlowError::MalformedChallenge(header.to_string()))?
        {
            match name.to_ascii_lowercase().as_str() {
                "realm" => realm = Some(value),
                "service" => service = Some(value),
                "scope" => scope = Some(value),
                _ => {}
            }
        }

        let realm = realm
            .and_then(|r| Url::parse(&r).ok())
            .filter(|u| matches!(u.scheme(), "http" | "https"))
            .ok_or_else(|| AuthFlowError::MalformedChallenge(header.to_string()))?;

        Ok(Self {
            realm,
            service,
            scope,
        })
    }

    /// Token endpoint URL for an anonymous pull token.
    ///
    /// `fallback_scope` is used when the challenge itself carries none.
    pub fn token_url(&self, fallback_scope: Option<&str>) -> Url {
        let mut url = self.realm.clone();
        {
            let mut query = url.query_pairs_mut();
            if let Some(service) = &self.service {
                query.append_pair("service", service);
            }
            if let Some(scope) = self.scope.as_deref().or(fallback_scope) {
                query.append_pair("scope", scope);
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }
        url
    }
}

/// Derive `repository:<name>:pull` from a registry v2 API path.
pub fn scope_from_path(path: &str) -> Option<String> {
    let rest = path.split_once("/v2/")?.1;
    let segments: Vec<&str> = rest.split('/').collect();
    let end = segments
        .iter()
        .position(|s| matches!(*s, "manifests" | "blobs" | "tags" | "referrers"))?;
    if end == 0 {
        return None;
    }
    Some(format!("repository:{}:pull", segments[..end].join("/")))
}

/// Split `a="x", b=y` into name/value pairs. Quoted values may contain commas.
fn parse_params(input: &str) -> Option<Vec<(String, String)>> {
    let mut out = Vec::new();
    let mut rest = input.trim();

    while !rest.is_empty() {
        let (name, after) = rest.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        let after = after.trim_start();

        let (value, remainder) = if let Some(quoted) = after.strip_prefix('"') {
            let close = quoted.find('"')?;
            (&quoted[..close], &quoted[close + 1..])
        } else {
            match after.find(',') {
                Some(i) => (after[..i].trim_end(), &after[i..]),
                None => (after.trim_end(), ""),
            }
        };
        out.push((name.to_string(), value.to_string()));

        rest = remainder.trim_start();
        if let Some(r) = rest.strip_prefix(',') {
            rest = r.trim_start();
        } else if !rest.is_empty() {
            return None;
        }
    }

    Some(out)
}
