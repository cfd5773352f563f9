//! Workspace configuration (`grove.toml` or `.grove/config.toml`)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cache::CACHE_DIR;
use crate::error::{GroveError, Result};

/// Config file at the workspace root.
pub const CONFIG_FILE: &str = "grove.toml";

/// Config file inside the cache directory.
pub const NESTED_CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroveConfig {
    pub scan: ScanConfig,
    pub resolver: ResolverConfig,
    pub enrich: EnrichConfig,
    pub ai: AiConfig,
    pub cache: CacheConfig,
}

impl GroveConfig {
    /// Load configuration for a workspace. Missing files yield defaults.
    pub fn load(root: &Path) -> Result<Self> {
        let mut config = match Self::locate(root) {
            Some(path) => {
                tracing::debug!("Loading config from {}", path.display());
                Self::from_file(&path)?
            }
            None => GroveConfig::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|source| GroveError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn locate(root: &Path) -> Option<PathBuf> {
        [root.join(CONFIG_FILE), root.join(CACHE_DIR).join(NESTED_CONFIG_FILE)]
            .into_iter()
            .find(|p| p.is_file())
    }

    /// Environment variables take precedence over the config file.
    pub fn apply_env(&mut self) {
        if let Ok(provider) = std::env::var("GROVE_AI_PROVIDER") {
            self.ai.provider = provider;
        }
        if let Ok(model) = std::env::var("GROVE_AI_MODEL") {
            self.ai.model = Some(model);
        }
        if let Ok(base_url) = std::env::var("GROVE_AI_BASE_URL") {
            self.ai.base_url = Some(base_url);
        }
    }

    pub fn validate(&self) -> Result<()> {
        let e = &self.enrich;
        for (name, value) in [
            ("summary_concurrency", e.summary_concurrency),
            ("directory_concurrency", e.directory_concurrency),
            ("structure_concurrency", e.structure_concurrency),
            ("risk_concurrency", e.risk_concurrency),
            ("structure_attempts", e.structure_attempts),
        ] {
            if value == 0 {
                return Err(GroveError::Config(format!("enrich.{name} must be at least 1")));
            }
        }
        if self.resolver.aliases.iter().any(|a| a.prefix.is_empty()) {
            return Err(GroveError::Config("resolver alias prefix cannot be empty".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Glob patterns (root-relative) for files and directories to skip.
    pub exclude: Vec<String>,
    pub respect_gitignore: bool,
    pub max_file_bytes: u64,
    /// Leading lines kept as a preview for the summarizer.
    pub preview_lines: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            exclude: ["node_modules", "dist", "build", "out", "coverage", ".git", CACHE_DIR]
                .iter()
                .flat_map(|d| [d.to_string(), format!("**/{d}")])
                .collect(),
            respect_gitignore: true,
            max_file_bytes: 1024 * 1024,
            preview_lines: 20,
        }
    }
}

/// Maps an import prefix onto directories below the project root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasRule {
    pub prefix: String,
    /// Tried in order; `""` is the project root itself.
    pub targets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub aliases: Vec<AliasRule>,
    /// Files whose presence marks a project root for alias resolution.
    pub root_markers: Vec<String>,
    /// Platform modules never reported as external dependencies.
    pub builtins: Vec<String>,
    /// Look for root markers on disk as well as in the scanned set.
    pub probe_filesystem: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            aliases: vec![
                AliasRule { prefix: "@/".to_string(), targets: vec![String::new(), "src".to_string()] },
                AliasRule { prefix: "~/".to_string(), targets: vec![String::new()] },
            ],
            root_markers: ["package.json", "tsconfig.json", "jsconfig.json"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            builtins: [
                "assert", "buffer", "child_process", "cluster", "crypto", "dgram", "dns", "events",
                "fs", "http", "http2", "https", "module", "net", "os", "path", "perf_hooks",
                "process", "querystring", "readline", "stream", "string_decoder", "timers", "tls",
                "tty", "url", "util", "v8", "vm", "worker_threads", "zlib",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            probe_filesystem: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichConfig {
    /// In-flight file summary calls.
    pub summary_concurrency: usize,
    /// In-flight directory summary calls.
    pub directory_concurrency: usize,
    /// In-flight structure analysis calls.
    pub structure_concurrency: usize,
    /// In-flight risk calls; kept below `structure_concurrency`.
    pub risk_concurrency: usize,
    /// Attempts per file before the fallback structure record is stored.
    pub structure_attempts: usize,
    /// Source files shorter than this are not worth a structure breakdown.
    pub min_structure_lines: u32,
    /// Write the snapshot after each phase.
    pub persist_snapshots: bool,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            summary_concurrency: 10,
            directory_concurrency: 5,
            structure_concurrency: 3,
            risk_concurrency: 2,
            structure_attempts: 3,
            min_structure_lines: 10,
            persist_snapshots: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// `openai`, `openrouter`, `gemini`, `anthropic`, or `local`.
    pub provider: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
    /// Falls back to the provider's environment variable.
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: "local".to_string(),
            model: None,
            base_url: None,
            api_key: None,
            temperature: 0.2,
            max_tokens: 2000,
            request_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Re-scan when the stored snapshot no longer matches the files on disk.
    pub validate_on_load: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { validate_on_load: true }
    }
}
