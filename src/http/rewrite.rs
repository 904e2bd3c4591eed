//! Absolute-URL rewriting inside package metadata.
//!
//! npm and PyPI metadata embed absolute links to their file hosts. Those
//! links are pointed back at this gateway so follow-up downloads are
//! accelerated too. Best effort: anything unexpected leaves the body as is.

use std::collections::HashMap;

use axum::http::header::{CONTENT_ENCODING, CONTENT_TYPE};
use axum::http::HeaderMap;
use bytes::Bytes;
use tracing::debug;

use crate::config::BodyRewriteRule;

#[derive(Debug, Clone, Default)]
pub struct ResponseRewriter {
    rules: HashMap<String, Vec<BodyRewriteRule>>,
}

impl ResponseRewriter {
    pub fn new(rules: &[BodyRewriteRule]) -> Self {
        let mut by_platform: HashMap<String, Vec<BodyRewriteRule>> = HashMap::new();
        for rule in rules {
            by_platform
                .entry(rule.platform.clone())
                .or_default()
                .push(rule.clone());
        }
        Self { rules: by_platform }
    }

    pub fn applies_to(&self, platform: &str) -> bool {
        self.rules.contains_key(platform)
    }

    /// Rewritten body, or `None` when nothing was (or could be) replaced.
    pub fn rewrite(&self, platform: &str, origin: &str, headers: &HeaderMap, body: &Bytes) -> Option<Bytes> {
        let rules = self.rules.get(platform)?;
        if !is_text_content(headers) {
            return None;
        }
        if headers
            .get(CONTENT_ENCODING)
            .is_some_and(|v| !v.as_bytes().eq_ignore_ascii_case(b"identity"))
        {
            debug!(platform, "Encoded body, rewrite skipped");
            return None;
        }
        let Ok(text) = std::str::from_utf8(body) else {
            debug!(platform, "Body is not UTF-8, rewrite skipped");
            return None;
        };

        let origin = origin.trim_end_matches('/');
        let mut out = None::<String>;
        for rule in rules {
            let current = out.as_deref().unwrap_or(text);
            let from = rule.upstream_origin.trim_end_matches('/');
            if from.is_empty() || !current.contains(from) {
                continue;
            }
            let to = format!("{origin}/{}", rule.target_platform);
            out = Some(current.replace(from, &to));
        }
        out.map(Bytes::from)
    }
}

fn is_text_content(headers: &HeaderMap) -> bool {
    let Some(content_type) = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let media = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    media == "text/html" || media == "application/json" || media.ends_with("+json")
}
