//! Test utilities for Grove

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::capsule::{ParsedSource, RawExport, RawImport, RawSymbol, SourceFile, build_capsule, compute_content_hash};
use crate::config::ResolverConfig;
use crate::model::{FileCapsule, Language};

/// Builds a capsule the way the parser would describe a file.
pub struct CapsuleBuilder {
    source: SourceFile,
    parsed: ParsedSource,
}

pub fn capsule(root: &Path, relative: &str) -> CapsuleBuilder {
    let path = root.join(relative);
    CapsuleBuilder {
        source: SourceFile {
            name: relative.rsplit('/').next().unwrap_or(relative).to_string(),
            language: Language::from_path(&path),
            relative_path: relative.to_string(),
            path,
            content_hash: None,
            line_count: None,
        },
        parsed: ParsedSource { line_count: 1, ..Default::default() },
    }
}

impl CapsuleBuilder {
    pub fn import(mut self, specifier: &str, names: &[&str]) -> Self {
        let line = self.parsed.imports.len() as u32 + 1;
        self.parsed.imports.push(RawImport {
            specifier: specifier.to_string(),
            names: names.iter().map(|s| s.to_string()).collect(),
            reexport: false,
            line,
        });
        self
    }

    pub fn reexport(mut self, specifier: &str, names: &[&str]) -> Self {
        self = self.import(specifier, names);
        if let Some(last) = self.parsed.imports.last_mut() {
            last.reexport = true;
        }
        self
    }

    pub fn function(mut self, name: &str, line_start: u32, line_end: u32) -> Self {
        self.parsed.functions.push(RawSymbol {
            name: name.to_string(),
            line_start,
            line_end,
            signature: Some(format!("function {name}()")),
        });
        self.parsed.line_count = self.parsed.line_count.max(line_end);
        self
    }

    pub fn exported_function(mut self, name: &str, line_start: u32, line_end: u32) -> Self {
        self.parsed.exports.push(RawExport { name: name.to_string(), ..Default::default() });
        self.function(name, line_start, line_end)
    }

    pub fn lines(mut self, count: u32) -> Self {
        self.parsed.line_count = count;
        self
    }

    pub fn content_hash(mut self, content: &str) -> Self {
        self.source.content_hash = Some(compute_content_hash(content));
        self
    }

    pub fn build(self) -> FileCapsule {
        build_capsule(self.source, Some(self.parsed))
    }
}

/// Resolver settings that never look at the real filesystem.
pub fn offline_resolver() -> ResolverConfig {
    ResolverConfig { probe_filesystem: false, ..ResolverConfig::default() }
}

pub fn virtual_root() -> PathBuf {
    PathBuf::from("/repo")
}

/// Create a repository with a specific file structure
pub fn create_repo_with_structure(structure: &[(&str, &str)]) -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();

    for (path, content) in structure {
        let full_path = root.join(path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&full_path, content).unwrap();
    }

    temp_dir
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_repo_with_structure() {
        let temp_dir = create_repo_with_structure(&[("a/b.ts", "import './c';"), ("a/c.ts", "")]);
        assert!(temp_dir.path().join("a/b.ts").exists());
        assert!(temp_dir.path().join("a/c.ts").exists());
    }
}
