//! Import string -> file identity resolution

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use crate::config::ResolverConfig;

/// Probe order for a computed local target; first hit wins.
pub const PROBE_SUFFIXES: [&str; 9] = [
    "",
    ".ts",
    ".tsx",
    ".js",
    ".jsx",
    "/index.ts",
    "/index.tsx",
    "/index.js",
    "/index.jsx",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Local(PathBuf),
    /// Third-party package, reported by package name.
    External(String),
    Builtin,
    Unresolved,
}

/// Resolves imports against the set of scanned file identities.
pub struct ImportResolver<'a> {
    known: &'a HashSet<PathBuf>,
    config: &'a ResolverConfig,
}

impl<'a> ImportResolver<'a> {
    pub fn new(known: &'a HashSet<PathBuf>, config: &'a ResolverConfig) -> Self {
        Self { known, config }
    }

    pub fn resolve(&self, specifier: &str, importer: &Path) -> Resolution {
        let specifier = specifier.trim();
        let importer_dir = importer.parent().unwrap_or(Path::new("/"));

        if is_relative(specifier) {
            return self.local(self.probe(&normalize_path(&importer_dir.join(specifier))));
        }

        if specifier.starts_with('/') {
            return self.local(self.probe(&normalize_path(Path::new(specifier))));
        }

        if let Some((rule_targets, suffix)) = self.match_alias(specifier) {
            return self.local(self.resolve_alias(rule_targets, suffix, importer_dir));
        }

        if self.is_builtin(specifier) {
            return Resolution::Builtin;
        }

        Resolution::External(package_name(specifier))
    }

    fn local(&self, hit: Option<PathBuf>) -> Resolution {
        hit.map_or(Resolution::Unresolved, Resolution::Local)
    }

    /// Longest matching alias prefix wins.
    fn match_alias<'s>(&self, specifier: &'s str) -> Option<(&'a [String], &'s str)> {
        self.config
            .aliases
            .iter()
            .filter(|rule| specifier.starts_with(rule.prefix.as_str()))
            .max_by_key(|rule| rule.prefix.len())
            .map(|rule| (rule.targets.as_slice(), &specifier[rule.prefix.len()..]))
    }

    fn resolve_alias(&self, targets: &[String], suffix: &str, importer_dir: &Path) -> Option<PathBuf> {
        if let Some(root) = self.find_project_root(importer_dir) {
            return self.probe_targets(&root, targets, suffix);
        }

        // No marker anywhere above: every directory in the importer's chain is a root candidate.
        tracing::debug!(
            "No project root marker above {}; probing directory chain for alias",
            importer_dir.display()
        );
        importer_dir
            .ancestors()
            .find_map(|dir| self.probe_targets(dir, targets, suffix))
    }

    fn probe_targets(&self, root: &Path, targets: &[String], suffix: &str) -> Option<PathBuf> {
        let default_target = [String::new()];
        let targets = if targets.is_empty() { &default_target[..] } else { targets };
        targets.iter().find_map(|target| {
            let base = if target.is_empty() { root.join(suffix) } else { root.join(target).join(suffix) };
            self.probe(&normalize_path(&base))
        })
    }

    /// Nearest ancestor of `start` (inclusive) holding one of the root marker files.
    pub fn find_project_root(&self, start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .find(|dir| self.config.root_markers.iter().any(|m| self.has_file(&dir.join(m))))
            .map(Path::to_path_buf)
    }

    fn has_file(&self, path: &Path) -> bool {
        self.known.contains(path) || (self.config.probe_filesystem && path.is_file())
    }

    fn probe(&self, base: &Path) -> Option<PathBuf> {
        PROBE_SUFFIXES.iter().find_map(|suffix| {
            let mut candidate: OsString = base.as_os_str().to_owned();
            candidate.push(suffix);
            let candidate = PathBuf::from(candidate);
            self.known.contains(&candidate).then_some(candidate)
        })
    }

    fn is_builtin(&self, specifier: &str) -> bool {
        if specifier.starts_with("node:") || specifier.starts_with("bun:") {
            return true;
        }
        let head = specifier.split('/').next().unwrap_or(specifier);
        self.config.builtins.iter().any(|b| b == head)
    }
}

fn is_relative(specifier: &str) -> bool {
    specifier == "." || specifier == ".." || specifier.starts_with("./") || specifier.starts_with("../")
}

/// `lodash/fp` -> `lodash`, `@scope/pkg/sub` -> `@scope/pkg`.
pub fn package_name(specifier: &str) -> String {
    let mut parts = specifier.split('/');
    match (parts.next(), parts.next()) {
        (Some(scope), Some(name)) if scope.starts_with('@') => format!("{scope}/{name}"),
        (Some(head), _) => head.to_string(),
        _ => specifier.to_string(),
    }
}

/// Lexically resolve `.` and `..` without touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out
}
