// SPDX-License-Identifier: MIT

//! Engine settings loaded from the environment

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default public URL under which the upload root is served
pub const DEFAULT_PUBLIC_URL: &str = "http://localhost:8000/uploads";

/// Runtime configuration for storage, providers and scheduling
#[derive(Debug, Clone)]
pub struct Settings {
    /// Root directory for uploaded and generated images
    pub upload_dir: PathBuf,
    /// Subdirectory (under `upload_dir`) for downloaded workflow images
    pub output_subdir: String,
    /// Public URL prefix the upload root is served from
    pub public_url: String,
    /// Upper bound for a single provider call
    pub provider_timeout: Duration,
    /// Run nodes of the same ready frontier concurrently
    pub parallel_nodes: bool,
    /// TrueType font used by text overlays
    pub font_path: Option<PathBuf>,
    /// Provider endpoint overrides
    pub endpoints: ProviderEndpoints,
}

/// Base URLs for every generation backend
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    pub openai: String,
    pub fal: String,
    pub stability: String,
    pub stability_v2: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            openai: "https://api.openai.com/v1".to_string(),
            fal: "https://fal.run/fal-ai".to_string(),
            stability: "https://api.stability.ai/v1/generation".to_string(),
            stability_v2: "https://api.stability.ai/v2beta/stable-image/generate".to_string(),
        }
    }
}

impl ProviderEndpoints {
    /// Read `<PROVIDER>_BASE_URL` overrides, falling back to public endpoints
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            openai: env::var("OPENAI_BASE_URL").unwrap_or(defaults.openai),
            fal: env::var("FAL_BASE_URL").unwrap_or(defaults.fal),
            stability: env::var("STABILITY_BASE_URL").unwrap_or(defaults.stability),
            stability_v2: env::var("STABILITY_V2_BASE_URL").unwrap_or(defaults.stability_v2),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            output_subdir: "workflow_outputs".to_string(),
            public_url: DEFAULT_PUBLIC_URL.to_string(),
            provider_timeout: Duration::from_secs(300),
            parallel_nodes: true,
            font_path: None,
            endpoints: ProviderEndpoints::default(),
        }
    }
}

impl Settings {
    /// Load settings from `CANVAS_*` environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let provider_timeout = env::var("CANVAS_PROVIDER_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.provider_timeout);

        let parallel_nodes = env::var("CANVAS_PARALLEL_NODES")
            .ok()
            .map(|v| parse_flag(&v))
            .unwrap_or(defaults.parallel_nodes);

        Self {
            upload_dir: env::var("CANVAS_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            output_subdir: env::var("CANVAS_OUTPUT_SUBDIR").unwrap_or(defaults.output_subdir),
            public_url: env::var("CANVAS_PUBLIC_URL").unwrap_or(defaults.public_url),
            provider_timeout,
            parallel_nodes,
            font_path: env::var("CANVAS_FONT_PATH").ok().map(PathBuf::from),
            endpoints: ProviderEndpoints::from_env(),
        }
    }

    /// Settings rooted at a specific upload directory
    pub fn with_upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.upload_dir = dir.into();
        self
    }
}

fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.upload_dir, PathBuf::from("uploads"));
        assert_eq!(settings.output_subdir, "workflow_outputs");
        assert_eq!(settings.provider_timeout, Duration::from_secs(300));
        assert!(settings.parallel_nodes);
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag("1"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag(" Off "));
    }

    #[test]
    fn test_with_upload_dir() {
        let settings = Settings::default().with_upload_dir("/tmp/canvas");
        assert_eq!(settings.upload_dir, PathBuf::from("/tmp/canvas"));
    }
}
