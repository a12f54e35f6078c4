//! Path mapper (§4.2): rewrites paths between dev-relative wire form and
//! exec-absolute filesystem paths.

use std::path::{Path, PathBuf};

/// Shared contract for both mapper flavors.
pub trait PathMapper: Send + Sync {
    /// Absolute local path -> wire-relative path (forward-slash separated).
    fn to_wire(&self, abs: &Path) -> Option<String>;
    /// Wire-relative path -> absolute local path.
    fn from_wire(&self, rel: &str) -> Option<PathBuf>;

    /// The configured symlink path for `rel`, if any (exec-side only). Like
    /// `from_wire`, this substitutes the matched mapping prefix into the
    /// configured link directory, so every file under the mapping gets its
    /// own symlink rather than all sharing one literal path.
    fn link_for(&self, _rel: &str) -> Option<PathBuf> {
        None
    }
}

fn to_forward_slash(path: &Path) -> String {
    let mut parts = Vec::new();
    let mut absolute = false;
    for component in path.components() {
        match component {
            std::path::Component::RootDir => absolute = true,
            other => parts.push(other.as_os_str().to_string_lossy().into_owned()),
        }
    }
    let joined = parts.join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

fn join_from_wire(root: &Path, rel: &str) -> PathBuf {
    let mut out = root.to_path_buf();
    for segment in rel.split('/').filter(|s| !s.is_empty()) {
        out.push(segment);
    }
    out
}

/// Dev-side single-root mapper (§4.2 "Dev-side (single root)").
#[derive(Debug, Clone)]
pub struct DevMapper {
    root: PathBuf,
}

impl DevMapper {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl PathMapper for DevMapper {
    fn to_wire(&self, abs: &Path) -> Option<String> {
        let rel = abs.strip_prefix(&self.root).ok()?;
        let wire = to_forward_slash(rel);
        Some(wire.trim_start_matches('/').to_string())
    }

    fn from_wire(&self, rel: &str) -> Option<PathBuf> {
        Some(join_from_wire(&self.root, rel))
    }
}

/// Splits a trailing-separator-enforced pattern into a fixed prefix and an
/// optional trailing `{name}` placeholder (the Open Question resolution in
/// SPEC_FULL.md §9: prefix form is primary, `{name}` is a guarded extension
/// restricted to the final path segment).
fn split_placeholder(enforced: &str) -> (String, Option<String>) {
    let without_trailing = &enforced[..enforced.len() - 1]; // drop trailing '/'
    match without_trailing.rsplit_once('/') {
        Some((head, tail)) if tail.starts_with('{') && tail.ends_with('}') => {
            (format!("{head}/"), Some(tail[1..tail.len() - 1].to_string()))
        }
        None if without_trailing.starts_with('{') && without_trailing.ends_with('}') => {
            (String::new(), Some(without_trailing[1..without_trailing.len() - 1].to_string()))
        }
        _ => (enforced.to_string(), None),
    }
}

fn ensure_trailing_sep(s: &str) -> String {
    if s.ends_with('/') {
        s.to_string()
    } else {
        format!("{s}/")
    }
}

#[derive(Debug, Clone)]
struct MappingRule {
    is_joker: bool,
    pattern_prefix: String,
    dest_prefix: String,
    placeholder: Option<String>,
    /// Symlink directory prefix, substituted per file the same way
    /// `dest_prefix` is (§4.4).
    link_prefix: Option<String>,
}

impl MappingRule {
    fn new(pattern: &str, dest: &Path, link: Option<PathBuf>) -> Result<Self, common::ConfigError> {
        let link_prefix = link.map(|l| ensure_trailing_sep(&to_forward_slash(&l)));
        if pattern == "*" {
            return Ok(Self {
                is_joker: true,
                pattern_prefix: String::new(),
                dest_prefix: ensure_trailing_sep(&to_forward_slash(dest)),
                placeholder: None,
                link_prefix,
            });
        }
        let pattern = ensure_trailing_sep(pattern);
        let dest_str = ensure_trailing_sep(&to_forward_slash(dest));
        let (pattern_prefix, pattern_placeholder) = split_placeholder(&pattern);
        let (dest_prefix, dest_placeholder) = split_placeholder(&dest_str);
        if pattern_placeholder.is_some() != dest_placeholder.is_some() {
            return Err(common::ConfigError::InvalidPlaceholder(pattern));
        }
        Ok(Self {
            is_joker: false,
            pattern_prefix,
            dest_prefix,
            placeholder: pattern_placeholder,
            link_prefix,
        })
    }

    /// Length used to pick the longest-prefix-wins match (§4.2).
    fn specificity(&self) -> usize {
        self.pattern_prefix.len()
    }

    /// Substitutes `remainder` (and, with a placeholder, `captured`/`rest`)
    /// into `prefix`, mirroring how `dest_prefix` is expanded per file.
    fn expand(&self, prefix: &str, remainder: &str) -> PathBuf {
        match &self.placeholder {
            None => join_from_wire(Path::new("/"), &format!("{prefix}{remainder}")),
            Some(name) => {
                let (captured, rest) = remainder.split_once('/').unwrap_or((remainder, ""));
                let filled = prefix.replace(&format!("{{{name}}}"), captured);
                join_from_wire(Path::new("/"), &format!("{filled}{rest}"))
            }
        }
    }
}

/// Exec-side many-mapping mapper (§4.2 "Exec-side (many mappings)").
pub struct ExecMapper {
    rules: Vec<MappingRule>,
}

impl ExecMapper {
    pub fn from_profile(profile: &common::ExecProfile) -> Result<Self, common::ConfigError> {
        let mut rules = Vec::with_capacity(profile.mappings.len());
        for (pattern, entry) in &profile.mappings {
            rules.push(MappingRule::new(pattern, &entry.dest, entry.link.clone())?);
        }
        Ok(Self { rules })
    }

    fn best_rule_for_wire(&self, rel: &str) -> Option<&MappingRule> {
        self.rules
            .iter()
            .filter(|r| !r.is_joker && rel.starts_with(&r.pattern_prefix))
            .max_by_key(|r| r.specificity())
            .or_else(|| self.rules.iter().find(|r| r.is_joker))
    }

    fn best_rule_for_abs(&self, abs_wire: &str) -> Option<&MappingRule> {
        self.rules
            .iter()
            .filter(|r| !r.is_joker && abs_wire.starts_with(&r.dest_prefix))
            .max_by_key(|r| r.dest_prefix.len())
            .or_else(|| self.rules.iter().find(|r| r.is_joker))
    }

    /// Resolves a wire-relative `src` to an absolute exec path plus the
    /// symlink path configured for the matched mapping, if any. Both are
    /// derived from the same matched prefix and remainder, the way
    /// `original_source/pyremotedev/file.py` computes `new_path` and `link`
    /// from one `found` match (used by the executor, C4).
    #[must_use]
    pub fn resolve(&self, rel: &str) -> Option<(PathBuf, Option<PathBuf>)> {
        let rule = self.best_rule_for_wire(rel)?;
        if rule.is_joker {
            let abs = PathBuf::from("/").join(rel);
            let link = rule.link_prefix.as_ref().map(|lp| rule.expand(lp, rel));
            return Some((abs, link));
        }
        let remainder = &rel[rule.pattern_prefix.len()..];
        let abs = rule.expand(&rule.dest_prefix, remainder);
        let link = rule.link_prefix.as_ref().map(|lp| rule.expand(lp, remainder));
        Some((abs, link))
    }
}

impl PathMapper for ExecMapper {
    fn to_wire(&self, abs: &Path) -> Option<String> {
        let abs_wire = to_forward_slash(abs);
        let rule = self.best_rule_for_abs(&abs_wire)?;
        if rule.is_joker {
            return Some(abs_wire.trim_start_matches('/').to_string());
        }
        let remainder = &abs_wire[rule.dest_prefix.len()..];
        let wire = match &rule.placeholder {
            None => format!("{}{}", rule.pattern_prefix, remainder),
            Some(_placeholder) => {
                let (captured, rest) = remainder.split_once('/').unwrap_or((remainder, ""));
                format!("{}{}/{}", rule.pattern_prefix, captured, rest)
            }
        };
        Some(wire.trim_start_matches('/').to_string())
    }

    fn from_wire(&self, rel: &str) -> Option<PathBuf> {
        self.resolve(rel).map(|(abs, _link)| abs)
    }

    fn link_for(&self, rel: &str) -> Option<PathBuf> {
        self.resolve(rel).and_then(|(_abs, link)| link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_mapper_roundtrips() {
        let mapper = DevMapper::new(PathBuf::from("/home/dev/repo"));
        let abs = PathBuf::from("/home/dev/repo/src/a.txt");
        let wire = mapper.to_wire(&abs).unwrap();
        assert_eq!(wire, "src/a.txt");
        assert_eq!(mapper.from_wire(&wire).unwrap(), abs);
    }

    #[test]
    fn dev_mapper_rejects_paths_outside_root() {
        let mapper = DevMapper::new(PathBuf::from("/home/dev/repo"));
        assert!(mapper.to_wire(Path::new("/etc/passwd")).is_none());
    }

    fn exec_profile(entries: &[(&str, &str, Option<&str>)]) -> common::ExecProfile {
        let mut mappings = std::collections::BTreeMap::new();
        for (pattern, dest, link) in entries {
            mappings.insert(
                pattern.to_string(),
                common::MappingEntry {
                    dest: PathBuf::from(dest),
                    link: link.map(PathBuf::from),
                },
            );
        }
        common::ExecProfile {
            log_file_path: None,
            mappings,
        }
    }

    #[test]
    fn exec_mapper_maps_prefix() {
        let profile = exec_profile(&[("src/", "/opt/app/src/", None)]);
        let mapper = ExecMapper::from_profile(&profile).unwrap();
        let (abs, link) = mapper.resolve("src/a.txt").unwrap();
        assert_eq!(abs, PathBuf::from("/opt/app/src/a.txt"));
        assert!(link.is_none());
        assert_eq!(mapper.to_wire(&abs).unwrap(), "src/a.txt");
    }

    #[test]
    fn exec_mapper_longest_prefix_wins() {
        let profile = exec_profile(&[
            ("src/", "/opt/app/src/", None),
            ("src/special/", "/opt/app/special/", None),
        ]);
        let mapper = ExecMapper::from_profile(&profile).unwrap();
        let (abs, _) = mapper.resolve("src/special/a.txt").unwrap();
        assert_eq!(abs, PathBuf::from("/opt/app/special/a.txt"));
    }

    #[test]
    fn exec_mapper_falls_back_to_joker() {
        let profile = exec_profile(&[("src/", "/opt/app/src/", None), ("*", "/opt/other/", None)]);
        let mapper = ExecMapper::from_profile(&profile).unwrap();
        let (abs, _) = mapper.resolve("misc/z.txt").unwrap();
        assert_eq!(abs, PathBuf::from("/opt/other/misc/z.txt"));
    }

    #[test]
    fn exec_mapper_reports_unmappable() {
        let profile = exec_profile(&[("src/", "/opt/app/src/", None)]);
        let mapper = ExecMapper::from_profile(&profile).unwrap();
        assert!(mapper.resolve("other/z.txt").is_none());
    }

    #[test]
    fn exec_mapper_supports_placeholder_extension() {
        let profile = exec_profile(&[("projects/{name}/", "/data/projects/{name}/", None)]);
        let mapper = ExecMapper::from_profile(&profile).unwrap();
        let (abs, _) = mapper.resolve("projects/alpha/main.rs").unwrap();
        assert_eq!(abs, PathBuf::from("/data/projects/alpha/main.rs"));
        assert_eq!(mapper.to_wire(&abs).unwrap(), "projects/alpha/main.rs");
    }

    #[test]
    fn exec_mapper_configures_symlink() {
        let profile = exec_profile(&[("src/", "/opt/app/src/", Some("/usr/local/lib/x/"))]);
        let mapper = ExecMapper::from_profile(&profile).unwrap();
        let (_, link) = mapper.resolve("src/b.txt").unwrap();
        assert_eq!(link, Some(PathBuf::from("/usr/local/lib/x/b.txt")));
    }

    #[test]
    fn exec_mapper_symlink_covers_every_file_under_mapping() {
        // A single configured link directory must produce a distinct,
        // correctly-rewritten symlink path for every file under the
        // mapping, not just one literal path.
        let profile = exec_profile(&[("src/", "/opt/app/src/", Some("/usr/local/lib/x/"))]);
        let mapper = ExecMapper::from_profile(&profile).unwrap();
        let (_, link_a) = mapper.resolve("src/a.txt").unwrap();
        let (_, link_b) = mapper.resolve("src/sub/b.txt").unwrap();
        assert_eq!(link_a, Some(PathBuf::from("/usr/local/lib/x/a.txt")));
        assert_eq!(link_b, Some(PathBuf::from("/usr/local/lib/x/sub/b.txt")));
    }
}
