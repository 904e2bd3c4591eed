//! Protocol classification.
//!
//! # Responsibilities
//! - Tag every request with exactly one `ProtocolTag`
//! - Evaluate the rules in a fixed order, first match wins
//!
//! # Rule Order
//! ```text
//! 1. Docker/OCI  registry v2 path shape, registry Accept/User-Agent markers
//! 2. Git         Git client User-Agent, smart-HTTP endpoints
//! 3. Git-LFS     Git request that accepts application/vnd.git-lfs+json
//! 4. Inference   path under /ip/
//! 5. Generic     everything else
//! ```
//!
//! Registry path shapes are the most specific signal, so they go first.

use axum::http::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use axum::http::HeaderMap;

/// Path segment reserved for inference providers.
pub const INFERENCE_PREFIX: &str = "/ip/";

/// Path segment reserved for container registries.
pub const REGISTRY_PREFIX: &str = "/cr/";

/// Platform whose bare `/v2` root is the registry ping.
const DOCKER_HUB_PREFIX: &str = "/dockerhub";

const LFS_MEDIA_TYPE: &str = "application/vnd.git-lfs+json";

const REGISTRY_MEDIA_MARKERS: &[&str] = &["application/vnd.docker.", "application/vnd.oci."];

const REGISTRY_AGENT_MARKERS: &[&str] = &[
    "docker/",
    "docker-client/",
    "containerd/",
    "buildkit/",
    "podman/",
    "skopeo/",
    "go-containerregistry/",
    "crane/",
];

const GIT_AGENT_PREFIXES: &[&str] = &["git/", "git-lfs/"];
const GIT_AGENT_MARKERS: &[&str] = &["jgit/", "libgit2", "go-git/"];

const GIT_PATH_SUFFIXES: &[&str] = &["/info/refs", "/git-upload-pack", "/git-receive-pack"];

/// Protocol category of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolTag {
    Docker,
    Git,
    GitLfs,
    AiInference,
    Generic,
}

impl ProtocolTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolTag::Docker => "docker",
            ProtocolTag::Git => "git",
            ProtocolTag::GitLfs => "git-lfs",
            ProtocolTag::AiInference => "ai",
            ProtocolTag::Generic => "generic",
        }
    }

    /// Protocol-tagged requests keep upstream semantics byte-for-byte.
    pub fn is_protocol(&self) -> bool {
        !matches!(self, ProtocolTag::Generic)
    }
}

impl std::fmt::Display for ProtocolTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a request by its normalized path and headers.
pub fn classify(path: &str, headers: &HeaderMap) -> ProtocolTag {
    if is_registry(path, headers) {
        return ProtocolTag::Docker;
    }
    if is_git(path, headers) {
        if header_contains(headers, ACCEPT, LFS_MEDIA_TYPE) {
            return ProtocolTag::GitLfs;
        }
        return ProtocolTag::Git;
    }
    if path.starts_with(INFERENCE_PREFIX) {
        return ProtocolTag::AiInference;
    }
    ProtocolTag::Generic
}

fn is_registry(path: &str, headers: &HeaderMap) -> bool {
    if path.starts_with(REGISTRY_PREFIX) || has_registry_v2_shape(path) {
        return true;
    }
    if REGISTRY_MEDIA_MARKERS
        .iter()
        .any(|m| header_contains(headers, ACCEPT, m))
    {
        return true;
    }
    let agent = user_agent(headers);
    REGISTRY_AGENT_MARKERS.iter().any(|m| agent.contains(m))
}

/// The `/v2/` ping of a registry platform, or a `/v2/` path that addresses
/// manifests, blobs, tags or the catalog.
fn has_registry_v2_shape(path: &str) -> bool {
    let Some(idx) = path.find("/v2/").or_else(|| path.ends_with("/v2").then(|| path.len() - 3)) else {
        return false;
    };
    if idx == 0 {
        return false;
    }
    let api = &path[idx + 3..];
    if api.is_empty() || api == "/" {
        let platform = &path[..idx];
        return platform == DOCKER_HUB_PREFIX || platform.starts_with(REGISTRY_PREFIX);
    }
    api.contains("/manifests/")
        || api.contains("/blobs/")
        || api.ends_with("/tags/list")
        || api == "/_catalog"
}

fn is_git(path: &str, headers: &HeaderMap) -> bool {
    if GIT_PATH_SUFFIXES.iter().any(|s| path.ends_with(s)) || path.contains("/info/lfs/") {
        return true;
    }
    if header_contains(headers, CONTENT_TYPE, "application/x-git-") {
        return true;
    }
    let agent = user_agent(headers);
    GIT_AGENT_PREFIXES.iter().any(|p| agent.starts_with(p))
        || GIT_AGENT_MARKERS.iter().any(|m| agent.contains(m))
}

fn user_agent(headers: &HeaderMap) -> String {
    headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

fn header_contains(
    headers: &HeaderMap,
    name: axum::http::header::HeaderName,
    needle: &str,
) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.to_ascii_lowercase().contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.append(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn test_registry_paths() {
        let empty = HeaderMap::new();
        assert_eq!(classify("/dockerhub/v2/library/nginx/manifests/latest", &empty), ProtocolTag::Docker);
        assert_eq!(classify("/dockerhub/v2/", &empty), ProtocolTag::Docker);
        assert_eq!(classify("/dockerhub/v2", &empty), ProtocolTag::Docker);
        assert_eq!(classify("/cr/ghcr/owner/image", &empty), ProtocolTag::Docker);
        assert_eq!(classify("/dockerhub/v2/bitnami/redis/tags/list", &empty), ProtocolTag::Docker);
    }

    #[test]
    fn test_v2_in_generic_path_is_not_registry() {
        let empty = HeaderMap::new();
        assert_eq!(classify("/gh/org/repo/v2/README.md", &empty), ProtocolTag::Generic);
        assert_eq!(classify("/v2/", &empty), ProtocolTag::Generic);
    }

    #[test]
    fn test_bare_v2_root_only_for_registry_platforms() {
        let empty = HeaderMap::new();
        assert_eq!(classify("/gh/org/v2", &empty), ProtocolTag::Generic);
        assert_eq!(classify("/npm/some-pkg/v2/", &empty), ProtocolTag::Generic);
        assert_eq!(classify("/ip/openai/v2/", &empty), ProtocolTag::AiInference);
        assert_eq!(classify("/dockerhub/v2", &empty), ProtocolTag::Docker);
        assert_eq!(classify("/dockerhub/v2/", &empty), ProtocolTag::Docker);
    }

    #[test]
    fn test_registry_headers() {
        let h = headers(&[("accept", "application/vnd.oci.image.index.v1+json")]);
        assert_eq!(classify("/gh/whatever", &h), ProtocolTag::Docker);
        let h = headers(&[("user-agent", "docker/24.0.7 go/go1.20.10 os/linux")]);
        assert_eq!(classify("/gh/whatever", &h), ProtocolTag::Docker);
    }

    #[test]
    fn test_git_detection() {
        let empty = HeaderMap::new();
        assert_eq!(classify("/gh/org/repo.git/info/refs", &empty), ProtocolTag::Git);
        assert_eq!(classify("/gh/org/repo.git/git-upload-pack", &empty), ProtocolTag::Git);
        let h = headers(&[("user-agent", "git/2.43.0")]);
        assert_eq!(classify("/gh/org/repo", &h), ProtocolTag::Git);
        let h = headers(&[("user-agent", "JGit/6.7.0")]);
        assert_eq!(classify("/gl/org/repo", &h), ProtocolTag::Git);
    }

    #[test]
    fn test_lfs_refines_git() {
        let h = headers(&[
            ("user-agent", "git-lfs/3.4.0 (GitHub; linux amd64; go 1.21)"),
            ("accept", "application/vnd.git-lfs+json"),
        ]);
        assert_eq!(classify("/gh/org/repo.git/info/lfs/objects/batch", &h), ProtocolTag::GitLfs);

        // The LFS media type alone does not make a request Git.
        let h = headers(&[("accept", "application/vnd.git-lfs+json")]);
        assert_eq!(classify("/gh/org/repo/file", &h), ProtocolTag::Generic);
    }

    #[test]
    fn test_order_is_significant() {
        // A git User-Agent hitting a registry path is still a registry request.
        let h = headers(&[("user-agent", "git/2.43.0")]);
        assert_eq!(classify("/dockerhub/v2/library/alpine/manifests/3", &h), ProtocolTag::Docker);
        // Git signals beat the inference prefix.
        assert_eq!(classify("/ip/openai/info/refs", &HeaderMap::new()), ProtocolTag::Git);
    }

    #[test]
    fn test_inference_and_generic() {
        let empty = HeaderMap::new();
        assert_eq!(classify("/ip/openai/v1/chat/completions", &empty), ProtocolTag::AiInference);
        assert_eq!(classify("/npm/lodash", &empty), ProtocolTag::Generic);
        assert!(!ProtocolTag::Generic.is_protocol());
        assert!(ProtocolTag::GitLfs.is_protocol());
    }
}
