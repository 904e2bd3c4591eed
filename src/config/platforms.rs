//! Built-in platform table.
//!
//! Used when the configuration file does not supply its own `[[platforms]]`.

use crate::config::schema::{BodyRewriteRule, PlatformDefinition, RewriteKind};

/// Default path prefix to upstream mapping.
pub fn builtin_platforms() -> Vec<PlatformDefinition> {
    vec![
        // Code hosting
        PlatformDefinition::new("gh", "https://github.com", RewriteKind::None),
        PlatformDefinition::new("gist", "https://gist.github.com", RewriteKind::None),
        PlatformDefinition::new("gl", "https://gitlab.com", RewriteKind::None),
        PlatformDefinition::new("bb", "https://bitbucket.org", RewriteKind::None),
        PlatformDefinition::new("hf", "https://huggingface.co", RewriteKind::None),
        // Package registries
        PlatformDefinition::new("npm", "https://registry.npmjs.org", RewriteKind::None),
        PlatformDefinition::new("pypi", "https://pypi.org", RewriteKind::None),
        PlatformDefinition::new("pypi-files", "https://files.pythonhosted.org", RewriteKind::PypiFiles),
        PlatformDefinition::new(
            "crates",
            "https://crates.io",
            RewriteKind::SearchSpecial {
                prefix: "/api/v1/crates".into(),
                search_path: "/api/v1/crates".into(),
            },
        ),
        PlatformDefinition::new("maven", "https://repo1.maven.org/maven2", RewriteKind::None),
        PlatformDefinition::new(
            "rubygems",
            "https://rubygems.org",
            RewriteKind::PathPrefix { prefix: "/gems".into() },
        ),
        PlatformDefinition::new(
            "jenkins",
            "https://updates.jenkins.io",
            RewriteKind::RegistrySpecial {
                segment: "current".into(),
                passthrough: vec![
                    "current".into(),
                    "download".into(),
                    "experimental".into(),
                    "stable".into(),
                ],
            },
        ),
        // Container registries
        PlatformDefinition::new("dockerhub", "https://registry-1.docker.io", RewriteKind::DockerLibrary),
        PlatformDefinition::new("cr/ghcr", "https://ghcr.io", RewriteKind::None),
        PlatformDefinition::new("cr/quay", "https://quay.io", RewriteKind::None),
        PlatformDefinition::new("cr/gcr", "https://gcr.io", RewriteKind::None),
        // Inference providers
        PlatformDefinition::new("ip/openai", "https://api.openai.com", RewriteKind::None),
        PlatformDefinition::new("ip/anthropic", "https://api.anthropic.com", RewriteKind::None),
        PlatformDefinition::new(
            "ip/gemini",
            "https://generativelanguage.googleapis.com",
            RewriteKind::None,
        ),
        PlatformDefinition::new("ip/openrouter", "https://openrouter.ai/api", RewriteKind::None),
    ]
}

/// Default response-body rewrites for package metadata.
pub fn builtin_body_rewrites() -> Vec<BodyRewriteRule> {
    vec![
        BodyRewriteRule {
            platform: "npm".into(),
            upstream_origin: "https://registry.npmjs.org".into(),
            target_platform: "npm".into(),
        },
        BodyRewriteRule {
            platform: "pypi".into(),
            upstream_origin: "https://files.pythonhosted.org".into(),
            target_platform: "pypi-files".into(),
        },
    ]
}
