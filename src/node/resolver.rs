//! Module resolver: specifier classification and `package.json`-aware
//! candidate-path computation.
//!
//! Pure path/specifier logic: given a specifier and the requesting
//! directory, decides *what absolute path or built-in name* a `require`
//! resolves to. Reading candidate files back out of the VFS to pick the
//! right one is the caller's job (the executor, which has the VFS handle);
//! this module only computes candidate lists and parses `package.json`
//! shapes, so it's testable without booting a kernel.

use serde::Deserialize;

use crate::vfs::path;

/// What a specifier resolved to, before the executor reads and runs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// One of the injected Node-compat shims.
    BuiltIn(String),
    /// An absolute VFS path to a source file.
    File(String),
    /// `@rollup/rollup-<platform>-*` and friends: a non-functional native
    /// stub the executor injects directly instead of resolving a real file.
    NativeStub(String),
}

pub const BUILTIN_MODULES: &[&str] = &[
    "fs", "path", "os", "process", "console", "buffer", "http", "dns", "stream", "events", "url",
    "module", "querystring", "crypto", "util", "assert", "timers",
];

/// Parsed slice of a `package.json` relevant to resolution.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageJson {
    #[serde(default, rename = "type")]
    pub module_type: Option<String>,
    #[serde(default)]
    pub main: Option<String>,
    #[serde(default)]
    pub exports: Option<serde_json::Value>,
    #[serde(default)]
    pub imports: Option<serde_json::Value>,
}

impl PackageJson {
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }

    pub fn is_esm(&self) -> bool {
        self.module_type.as_deref() == Some("module")
    }
}

/// Recursively pick `require`, then `default`, then `import` from a
/// conditional-exports object; explicitly skips `"types"`.
pub fn pick_condition(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Object(map) => {
            for key in ["require", "default", "import"] {
                if key == "types" {
                    continue;
                }
                if let Some(v) = map.get(key) {
                    if let Some(resolved) = pick_condition(v) {
                        return Some(resolved);
                    }
                }
            }
            None
        }
        _ => None,
    }
}

/// Split `s` starts-with `./`/`../`/`/` relative-path detection.
pub fn is_relative_or_absolute(specifier: &str) -> bool {
    specifier.starts_with("./") || specifier.starts_with("../") || specifier.starts_with('/')
}

/// Split a bare specifier into `(package_name, subpath)`, respecting scoped
/// `@scope/pkg` names. `subpath` is `None` when the specifier names just the
/// package itself.
pub fn split_package_specifier(specifier: &str) -> (String, Option<String>) {
    let mut parts = specifier.splitn(if specifier.starts_with('@') { 3 } else { 2 }, '/');
    let package = if specifier.starts_with('@') {
        let scope = parts.next().unwrap_or("");
        let name = parts.next().unwrap_or("");
        format!("{scope}/{name}")
    } else {
        parts.next().unwrap_or("").to_string()
    };
    let subpath = parts.next().map(|s| format!("./{s}"));
    (package, subpath)
}

/// Candidate absolute file paths to try (in order) for a relative or
/// absolute specifier resolved against `dir`.
pub fn relative_candidates(specifier: &str, dir: &str) -> Vec<String> {
    let resolved = path::normalize(specifier, dir);
    let mut out = vec![resolved.clone()];
    for ext in [".js", ".mjs", ".json"] {
        out.push(format!("{resolved}{ext}"));
    }
    out.push(path::join(&resolved, "index.js"));
    out.push(path::join(&resolved, "index.mjs"));
    out
}

/// Every `node_modules/<package>` directory to try, walking up from `dir`
/// to root -- nearest first.
pub fn node_modules_candidates(dir: &str, package: &str) -> Vec<String> {
    path::ancestors(dir)
        .into_iter()
        .map(|ancestor| path::join(&ancestor, &format!("node_modules/{package}")))
        .collect()
}

/// The global fallback roots, in lookup order.
pub fn global_candidates(package: &str, search_roots: &[String]) -> Vec<String> {
    search_roots
        .iter()
        .map(|root| path::join(root, package))
        .collect()
}

/// `@rollup/rollup-<platform>-*` native-binary specifiers resolve to an
/// injected stub rather than a real file.
pub fn is_native_stub_specifier(specifier: &str) -> bool {
    specifier.starts_with("@rollup/rollup-") || specifier.starts_with("@esbuild/")
}

/// Resolve `exports["./<subpath>"]`, including a `"./dist/*"` glob pattern,
/// returning the matched target (with `*` substituted) if any.
pub fn resolve_exports_subpath(exports: &serde_json::Value, subpath: &str) -> Option<String> {
    let map = exports.as_object()?;
    if let Some(v) = map.get(subpath) {
        return pick_condition(v);
    }
    for (pattern, value) in map {
        if let Some(star) = pattern.strip_suffix('*') {
            if let Some(rest) = subpath.strip_prefix(star) {
                if let Some(target) = pick_condition(value) {
                    return Some(target.replacen('*', rest, 1));
                }
            }
        }
    }
    None
}

/// First-pass classification of a specifier, used by the executor to decide
/// which resolution branch (built-in / subpath-import / relative / bare) to
/// walk. Doesn't touch the VFS.
pub enum Kind {
    NodePrefixed(String),
    BuiltIn(String),
    SubpathImport(String),
    RelativeOrAbsolute,
    Bare { package: String, subpath: Option<String> },
}

pub fn classify(specifier: &str) -> Kind {
    if let Some(rest) = specifier.strip_prefix("node:") {
        return Kind::NodePrefixed(rest.to_string());
    }
    if BUILTIN_MODULES.contains(&specifier) {
        return Kind::BuiltIn(specifier.to_string());
    }
    if let Some(rest) = specifier.strip_prefix('#') {
        return Kind::SubpathImport(rest.to_string());
    }
    if is_relative_or_absolute(specifier) {
        return Kind::RelativeOrAbsolute;
    }
    let (package, subpath) = split_package_specifier(specifier);
    Kind::Bare { package, subpath }
}

/// Resolve a `package.json#imports` subpath map entry (the `#name` form),
/// applying the same conditional resolution as `exports`.
pub fn resolve_imports_map(imports: &serde_json::Value, key: &str) -> Option<String> {
    let map = imports.as_object()?;
    let lookup_key = format!("#{key}");
    if let Some(v) = map.get(&lookup_key) {
        return pick_condition(v);
    }
    for (pattern, value) in map {
        if let Some(star) = pattern.strip_prefix('#').and_then(|p| p.strip_suffix('*')) {
            if let Some(rest) = key.strip_prefix(star) {
                if let Some(target) = pick_condition(value) {
                    return Some(target.replacen('*', rest, 1));
                }
            }
        }
    }
    None
}

/// Pure helper: given a resolved `node_modules/<package>` directory and an
/// optional subpath plus the package's parsed `package.json`, compute the
/// file (relative to that directory) main entry resolution should load.
pub fn entry_for_package(pkg: &PackageJson, subpath: Option<&str>) -> Option<String> {
    if let Some(subpath) = subpath {
        if let Some(exports) = &pkg.exports {
            if let Some(target) = resolve_exports_subpath(exports, subpath) {
                return Some(target);
            }
        }
        return Some(subpath.to_string());
    }
    if let Some(exports) = &pkg.exports {
        if let Some(dot) = exports.get(".") {
            if let Some(target) = pick_condition(dot) {
                return Some(target);
            }
        } else if let Some(target) = pick_condition(exports) {
            return Some(target);
        }
    }
    if let Some(main) = &pkg.main {
        return Some(main.clone());
    }
    Some("index.js".to_string())
}

/// Build the `imports` map lookup key from a `#foo` specifier as used in
/// `classify`'s `SubpathImport` variant, resolving it against the nearest
/// ancestor `package.json`'s `imports` field. `find_package_json` supplies
/// the parsed content of the first `package.json` found walking up from
/// `dir` (the caller does the VFS read since this module stays IO-free).
pub fn resolve_subpath_import(
    key: &str,
    nearest_package: Option<&PackageJson>,
) -> Option<String> {
    let pkg = nearest_package?;
    let imports = pkg.imports.as_ref()?;
    resolve_imports_map(imports, key)
}

/// Utility the executor uses to find the nearest ancestor directory
/// containing a `package.json`, without reading the VFS itself -- callers
/// supply a predicate closure instead, keeping this module synchronous.
pub fn nearest_package_json_dir(dir: &str, exists: impl Fn(&str) -> bool) -> Option<String> {
    for ancestor in path::ancestors(dir) {
        let candidate = path::join(&ancestor, "package.json");
        if exists(&candidate) {
            return Some(ancestor);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_node_prefix() {
        matches!(classify("node:fs"), Kind::NodePrefixed(ref s) if s == "fs");
    }

    #[test]
    fn classifies_builtin() {
        assert!(matches!(classify("path"), Kind::BuiltIn(_)));
    }

    #[test]
    fn classifies_scoped_package_with_subpath() {
        match classify("@scope/pkg/sub/path") {
            Kind::Bare { package, subpath } => {
                assert_eq!(package, "@scope/pkg");
                assert_eq!(subpath.as_deref(), Some("./sub/path"));
            }
            _ => panic!("expected bare"),
        }
    }

    #[test]
    fn classifies_unscoped_package_with_subpath() {
        match classify("lodash/debounce") {
            Kind::Bare { package, subpath } => {
                assert_eq!(package, "lodash");
                assert_eq!(subpath.as_deref(), Some("./debounce"));
            }
            _ => panic!("expected bare"),
        }
    }

    #[test]
    fn relative_candidates_try_extensions_then_index() {
        let cands = relative_candidates("./x", "/a/b");
        assert_eq!(
            cands,
            vec![
                "/a/b/x".to_string(),
                "/a/b/x.js".to_string(),
                "/a/b/x.mjs".to_string(),
                "/a/b/x.json".to_string(),
                "/a/b/x/index.js".to_string(),
                "/a/b/x/index.mjs".to_string(),
            ]
        );
    }

    #[test]
    fn node_modules_candidates_walk_up_to_root() {
        let cands = node_modules_candidates("/a/b", "pkg");
        assert_eq!(
            cands,
            vec![
                "/a/b/node_modules/pkg".to_string(),
                "/a/node_modules/pkg".to_string(),
                "/node_modules/pkg".to_string(),
            ]
        );
    }

    #[test]
    fn pick_condition_prefers_require_then_default_then_import() {
        let v = serde_json::json!({"types": "x.d.ts", "import": "esm.js", "require": "cjs.js"});
        assert_eq!(pick_condition(&v), Some("cjs.js".to_string()));
    }

    #[test]
    fn exports_glob_pattern_substitutes_star() {
        let exports = serde_json::json!({"./dist/*": "./dist/*.js"});
        assert_eq!(
            resolve_exports_subpath(&exports, "./dist/util"),
            Some("./dist/util.js".to_string())
        );
    }

    #[test]
    fn native_stub_specifiers_are_detected() {
        assert!(is_native_stub_specifier("@rollup/rollup-linux-x64-gnu"));
        assert!(!is_native_stub_specifier("rollup"));
    }

    #[test]
    fn entry_for_package_falls_back_main_then_index() {
        let pkg = PackageJson { main: Some("./lib.js".into()), ..Default::default() };
        assert_eq!(entry_for_package(&pkg, None), Some("./lib.js".to_string()));
        let empty = PackageJson::default();
        assert_eq!(entry_for_package(&empty, None), Some("index.js".to_string()));
    }
}
