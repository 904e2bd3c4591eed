//! Platform lookup and path transformation.
//!
//! # Responsibilities
//! - Store the platform table, sorted longest key first
//! - Resolve a request path to a platform and the path remainder
//! - Apply the platform's rewrite rule to build the upstream URL
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) prefix scan, first match wins; longest-first ordering gives
//!   specificity without a trie (`pypi-files` beats `pypi`)
//! - No match is an explicit `None`, the caller picks the HTTP status

use std::sync::Arc;

use url::Url;

use crate::config::{PlatformDefinition, RewriteKind};

/// A matched platform plus the path left after its prefix.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub platform: Arc<PlatformDefinition>,
    /// Either empty or starting with `/`.
    pub remaining: String,
}

/// Longest-prefix platform resolver.
#[derive(Debug, Clone)]
pub struct PlatformResolver {
    entries: Vec<(String, Arc<PlatformDefinition>)>,
}

impl PlatformResolver {
    /// Build a resolver from the injected platform table.
    pub fn new(platforms: Vec<PlatformDefinition>) -> Self {
        let mut entries: Vec<_> = platforms
            .into_iter()
            .map(|p| (p.prefix(), Arc::new(p)))
            .collect();
        // Ties are broken by key so the order never depends on config order.
        entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        Self { entries }
    }

    /// Number of configured platforms.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find the platform serving `path`.
    pub fn resolve(&self, path: &str) -> Option<Resolution> {
        self.entries.iter().find_map(|(prefix, platform)| {
            let rest = path.strip_prefix(prefix.as_str())?;
            if rest.is_empty() || rest.starts_with('/') {
                Some(Resolution {
                    platform: platform.clone(),
                    remaining: rest.to_string(),
                })
            } else {
                None
            }
        })
    }

    /// Absolute upstream URL for a resolution, carrying the inbound query.
    pub fn upstream_url(
        &self,
        resolution: &Resolution,
        query: Option<&str>,
    ) -> Result<Url, url::ParseError> {
        let path = transform_path(&resolution.platform.rewrite, &resolution.remaining);
        let mut raw = format!(
            "{}{}",
            resolution.platform.upstream_base.trim_end_matches('/'),
            path
        );
        if let Some(q) = query.filter(|q| !q.is_empty()) {
            raw.push('?');
            raw.push_str(q);
        }
        Url::parse(&raw)
    }
}

/// Apply a rewrite rule to the path remainder.
pub fn transform_path(rewrite: &RewriteKind, remaining: &str) -> String {
    match rewrite {
        RewriteKind::None | RewriteKind::PypiFiles => leading_slash(remaining),
        RewriteKind::PathPrefix { prefix } => join(prefix, remaining),
        RewriteKind::SearchSpecial {
            prefix,
            search_path,
        } => {
            if is_search_path(remaining) {
                leading_slash(search_path)
            } else {
                join(prefix, remaining)
            }
        }
        RewriteKind::RegistrySpecial {
            segment,
            passthrough,
        } => {
            let first = remaining
                .trim_start_matches('/')
                .split('/')
                .next()
                .unwrap_or_default();
            if passthrough.iter().any(|p| p == first) {
                leading_slash(remaining)
            } else {
                join(&format!("/{}", segment.trim_matches('/')), remaining)
            }
        }
        RewriteKind::DockerLibrary => docker_library(remaining),
    }
}

fn is_search_path(remaining: &str) -> bool {
    matches!(remaining, "" | "/" | "/search" | "/search/")
}

fn leading_slash(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

fn join(prefix: &str, remaining: &str) -> String {
    let prefix = leading_slash(prefix.trim_end_matches('/'));
    if remaining.is_empty() || remaining == "/" {
        prefix
    } else {
        format!("{}{}", prefix, leading_slash(remaining))
    }
}

/// `/v2/nginx/manifests/latest` → `/v2/library/nginx/manifests/latest`.
fn docker_library(remaining: &str) -> String {
    let Some(rest) = remaining.strip_prefix("/v2/") else {
        return leading_slash(remaining);
    };
    let segments: Vec<&str> = rest.split('/').collect();
    let marker = segments
        .iter()
        .position(|s| matches!(*s, "manifests" | "blobs" | "tags"));
    match marker {
        Some(1) => format!("/v2/library/{}", rest),
        _ => remaining.to_string(),
    }
}
