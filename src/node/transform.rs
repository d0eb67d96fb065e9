//! ESM->CJS transformer.
//!
//! Accepts arbitrary -- often minified, `$`-suffixed-identifier, bundled --
//! ESM source and produces a functionally equivalent CommonJS body suitable
//! for execution inside the synchronous function wrapper the executor builds.
//! A full parser would be ~10x the code for no extra correctness where it
//! matters: the masking pass is what buys safety in the presence of
//! minified, regex-rich source.

use once_cell::sync::Lazy;
use regex::Regex;

use super::mask::mask;

/// A pending `export {a, b as c}` (no source) entry resolved at end-of-file:
/// either a live-binding getter onto an imported module's reference, or a
/// plain assignment of a locally declared name.
#[derive(Debug, Clone)]
enum PendingExport {
    /// `exports.c = c;` for a plain local declaration.
    Local { local: String, exported: String },
    /// A getter forwarding to `modRef.prop`, for re-exporting an imported
    /// binding so cycles resolve at use-site rather than at import time.
    Reexport { mod_ref: String, prop: String, exported: String },
}

/// Transform one ESM source module into a CommonJS-equivalent body.
/// Identity on any source with no top-level `import`/`export` outside
/// string/regex/comment contexts.
pub fn transform(source: &str) -> String {
    let mut src = normalize_line_endings(source);
    src = rewrite_import_meta(&src);

    let masked = mask(&src);
    let mut body = masked.source;

    body = break_minified_statement_imports(&body);

    let mut pending_exports: Vec<PendingExport> = Vec::new();
    let mut import_bindings: std::collections::HashMap<String, (String, String)> =
        std::collections::HashMap::new();

    body = rewrite_imports(&body, &mut import_bindings);
    body = rewrite_exports(&body, &mut pending_exports, &import_bindings);
    body = rewrite_dynamic_import(&body);
    body = fixup_wrapper_collisions(&body);

    if !pending_exports.is_empty() {
        body.push_str("\n");
        for pe in &pending_exports {
            match pe {
                PendingExport::Local { local, exported } => {
                    body.push_str(&format!("exports.{exported} = {local};\n"));
                }
                PendingExport::Reexport { mod_ref, prop, exported } => {
                    body.push_str(&format!(
                        "Object.defineProperty(exports, {exported:?}, {{ get() {{ return {mod_ref}.{prop}; }}, enumerable: true, configurable: true }});\n"
                    ));
                }
            }
        }
    }

    masked.unmask(&body)
}

fn normalize_line_endings(source: &str) -> String {
    source.replace("\r\n", "\n").replace('\r', "\n")
}

static IMPORT_META_PROP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"import\.meta\.(url|dirname|filename|require|resolve)\b").unwrap());
static IMPORT_META_BARE: Lazy<Regex> = Lazy::new(|| Regex::new(r"import\.meta\b").unwrap());

/// Step 2: rewrite `import.meta.*` (and then bare `import.meta`) to the
/// injected wrapper parameter names, operating on raw source before masking
/// so the property names themselves are never hidden behind a placeholder.
fn rewrite_import_meta(source: &str) -> String {
    let replaced = IMPORT_META_PROP.replace_all(source, |caps: &regex::Captures| match &caps[1] {
        "url" => "__importMetaUrl".to_string(),
        "dirname" => "__dirname".to_string(),
        "filename" => "__filename".to_string(),
        "require" => "require".to_string(),
        "resolve" => "__importMetaResolve".to_string(),
        other => format!("__importMeta.{other}"),
    });
    IMPORT_META_BARE.replace_all(&replaced, "__importMeta").into_owned()
}

static MINIFIED_IMPORT_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r";\s*(import|export)\b").unwrap());

/// Step 4: break `...; import ...` / `...; export ...` runs (common in
/// minified bundles) onto their own line so the line-anchored rewrite
/// regexes below can find them.
fn break_minified_statement_imports(source: &str) -> String {
    MINIFIED_IMPORT_BREAK
        .replace_all(source, |caps: &regex::Captures| format!(";\n{}", &caps[1]))
        .into_owned()
}

static IMPORT_DEFAULT_NAMED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^[ \t]*import\s+(\w+)\s*,\s*\{([^}]*)\}\s*from\s*(["']?[^"';\n]+["']?|"__LIFO_S\d+__");?"#).unwrap()
});
static IMPORT_DEFAULT_STAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^[ \t]*import\s+(\w+)\s*,\s*\*\s*as\s+(\w+)\s*from\s*("__LIFO_S\d+__");?"#).unwrap()
});
static IMPORT_NAMED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^[ \t]*import\s*\{([^}]*)\}\s*from\s*("__LIFO_S\d+__");?"#).unwrap()
});
static IMPORT_STAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^[ \t]*import\s*\*\s*as\s+(\w+)\s*from\s*("__LIFO_S\d+__");?"#).unwrap()
});
static IMPORT_DEFAULT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^[ \t]*import\s+(\w+)\s*from\s*("__LIFO_S\d+__");?"#).unwrap()
});
static IMPORT_BARE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^[ \t]*import\s*("__LIFO_S\d+__");?"#).unwrap());

fn parse_named_clause(clause: &str) -> Vec<(String, String)> {
    clause
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| match entry.split_once(" as ") {
            Some((orig, alias)) => (orig.trim().to_string(), alias.trim().to_string()),
            None => (entry.to_string(), entry.to_string()),
        })
        .collect()
}

/// Step 5: rewrite every import form. `import_bindings` records, per local
/// name introduced by a *named* import, `(moduleRefVar, originalProperty)`
/// so step 6 can install live-binding getters for re-exports.
fn rewrite_imports(
    source: &str,
    import_bindings: &mut std::collections::HashMap<String, (String, String)>,
) -> String {
    let mut out = source.to_string();
    let mut counter = 0usize;

    out = IMPORT_DEFAULT_NAMED
        .replace_all(&out, |caps: &regex::Captures| {
            counter += 1;
            let var = format!("__mod{counter}");
            let default_name = &caps[1];
            let named = parse_named_clause(&caps[2]);
            let module = &caps[3];
            for (orig, alias) in &named {
                import_bindings.insert(alias.clone(), (var.clone(), orig.clone()));
            }
            let destructure = named
                .iter()
                .map(|(orig, alias)| if orig == alias { orig.clone() } else { format!("{orig}: {alias}") })
                .collect::<Vec<_>>()
                .join(", ");
            import_bindings.insert(default_name.to_string(), (var.clone(), "default".to_string()));
            format!(
                "const {var} = require({module}); const {default_name} = {var}.default || {var}; const {{{destructure}}} = {var};"
            )
        })
        .into_owned();

    out = IMPORT_DEFAULT_STAR
        .replace_all(&out, |caps: &regex::Captures| {
            let default_name = &caps[1];
            let ns_name = &caps[2];
            let module = &caps[3];
            format!(
                "const {ns_name} = require({module}); const {default_name} = {ns_name}.default || {ns_name};"
            )
        })
        .into_owned();

    out = IMPORT_NAMED
        .replace_all(&out, |caps: &regex::Captures| {
            counter += 1;
            let var = format!("__imp{counter}");
            let named = parse_named_clause(&caps[1]);
            let module = &caps[2];
            for (orig, alias) in &named {
                import_bindings.insert(alias.clone(), (var.clone(), orig.clone()));
            }
            let destructure = named
                .iter()
                .map(|(orig, alias)| if orig == alias { orig.clone() } else { format!("{orig}: {alias}") })
                .collect::<Vec<_>>()
                .join(", ");
            format!("const {var} = require({module}); const {{{destructure}}} = {var};")
        })
        .into_owned();

    out = IMPORT_STAR
        .replace_all(&out, |caps: &regex::Captures| {
            format!("const {} = require({});", &caps[1], &caps[2])
        })
        .into_owned();

    out = IMPORT_DEFAULT
        .replace_all(&out, |caps: &regex::Captures| {
            format!("const {} = require({});", &caps[1], &caps[2])
        })
        .into_owned();

    out = IMPORT_BARE
        .replace_all(&out, |caps: &regex::Captures| format!("require({});", &caps[1]))
        .into_owned();

    out
}

static EXPORT_STAR_FROM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^[ \t]*export\s*\*\s*from\s*("__LIFO_S\d+__");?"#).unwrap()
});
static EXPORT_NAMED_FROM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^[ \t]*export\s*\{([^}]*)\}\s*from\s*("__LIFO_S\d+__");?"#).unwrap()
});
static EXPORT_DEFAULT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*export\s+default\s+").unwrap());
static EXPORT_DECL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*export\s+(const|let|var)\s+(\w+)").unwrap());
static EXPORT_FN_CLASS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*export\s+(async\s+function|function|class)\s+(\w+)").unwrap()
});
static EXPORT_NAMED_BARE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*export\s*\{([^}]*)\}\s*;?[ \t]*$").unwrap());
static EXPORT_EMPTY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*export\s*\{\s*\}\s*;?[ \t]*$").unwrap());

/// Step 6: rewrite every export form, recording deferred end-of-file
/// assignments/getters in `pending`.
fn rewrite_exports(
    source: &str,
    pending: &mut Vec<PendingExport>,
    import_bindings: &std::collections::HashMap<String, (String, String)>,
) -> String {
    let mut out = source.to_string();
    let mut counter = 0usize;

    out = EXPORT_EMPTY.replace_all(&out, "").into_owned();

    out = EXPORT_STAR_FROM
        .replace_all(&out, |caps: &regex::Captures| {
            counter += 1;
            let var = format!("__star{counter}");
            let module = &caps[1];
            format!(
                "const {var} = require({module}); for (const __k of Object.keys({var})) {{ if (__k !== 'default') Object.defineProperty(exports, __k, {{ get() {{ return {var}[__k]; }}, enumerable: true, configurable: true }}); }}"
            )
        })
        .into_owned();

    out = EXPORT_NAMED_FROM
        .replace_all(&out, |caps: &regex::Captures| {
            counter += 1;
            let var = format!("__re{counter}");
            let named = parse_named_clause(&caps[1]);
            let module = &caps[2];
            let mut stmt = format!("const {var} = require({module});");
            for (orig, alias) in &named {
                stmt.push_str(&format!(
                    " Object.defineProperty(exports, {alias:?}, {{ get() {{ return {var}.{orig}; }}, enumerable: true, configurable: true }});"
                ));
            }
            stmt
        })
        .into_owned();

    // `export default` has no named exports visible to a line-local regex,
    // so use `module.exports =` when rewriting; callers that also have
    // named exports still work because Node allows a later `exports.x = `
    // assignment to coexist on the same object `module.exports` points to.
    out = EXPORT_DEFAULT.replace_all(&out, "module.exports = ").into_owned();

    out = EXPORT_DECL
        .replace_all(&out, |caps: &regex::Captures| {
            let kind = &caps[1];
            let name = &caps[2];
            pending.push(PendingExport::Local { local: name.to_string(), exported: name.to_string() });
            format!("{kind} {name}")
        })
        .into_owned();

    out = EXPORT_FN_CLASS
        .replace_all(&out, |caps: &regex::Captures| {
            let kind = &caps[1];
            let name = &caps[2];
            pending.push(PendingExport::Local { local: name.to_string(), exported: name.to_string() });
            format!("{kind} {name}")
        })
        .into_owned();

    out = EXPORT_NAMED_BARE
        .replace_all(&out, |caps: &regex::Captures| {
            let named = parse_named_clause(&caps[1]);
            for (orig, alias) in &named {
                if let Some((mod_ref, prop)) = import_bindings.get(orig) {
                    pending.push(PendingExport::Reexport {
                        mod_ref: mod_ref.clone(),
                        prop: prop.clone(),
                        exported: alias.clone(),
                    });
                } else {
                    pending.push(PendingExport::Local { local: orig.clone(), exported: alias.clone() });
                }
            }
            String::new()
        })
        .into_owned();

    out
}

static DYNAMIC_IMPORT_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?:^|[^.\w])import\(\s*("__LIFO_S\d+__")\s*\)"#).unwrap());

/// Step 7: rewrite `import(...)`. Literal specifiers resolve synchronously
/// through `require` wrapped in an already-resolved promise; dynamic
/// expressions defer the `require` call into a `.then`. Skips occurrences
/// immediately preceded by `.` (a method call named `import`) or that look
/// like a class method definition (`import(x) {`).
fn rewrite_dynamic_import(source: &str) -> String {
    let mut out = DYNAMIC_IMPORT_LITERAL
        .replace_all(source, |caps: &regex::Captures| {
            let whole = caps.get(0).unwrap().as_str();
            let prefix = &whole[..whole.len() - caps[1].len() - 1 - "import(".len() + 1];
            format!("{prefix}Promise.resolve(require({}))", &caps[1])
        })
        .into_owned();

    // Balanced-paren scan for `import(<expr>)` with a non-literal argument.
    let mut result = String::new();
    let bytes: Vec<char> = out.chars().collect();
    let mut i = 0usize;
    while i < bytes.len() {
        let rest: String = bytes[i..].iter().collect();
        if rest.starts_with("import(") {
            let preceded_by_dot = result.trim_end().ends_with('.');
            let before = i.checked_sub(1).map(|j| bytes[j]);
            let is_method_call = matches!(before, Some(c) if c.is_alphanumeric() || c == '_' || c == '$');
            if !preceded_by_dot && !is_method_call {
                let start = i + "import(".len();
                let mut depth = 1i32;
                let mut j = start;
                while j < bytes.len() && depth > 0 {
                    match bytes[j] {
                        '(' => depth += 1,
                        ')' => depth -= 1,
                        _ => {}
                    }
                    if depth > 0 {
                        j += 1;
                    }
                }
                let is_class_method = {
                    let mut k = j + 1;
                    while k < bytes.len() && bytes[k].is_whitespace() {
                        k += 1;
                    }
                    bytes.get(k) == Some(&'{')
                        && !matches!(before, Some(c) if c == '=' || c == '(' || c == ',')
                };
                if j < bytes.len() && !is_class_method {
                    let expr: String = bytes[start..j].iter().collect();
                    result.push_str(&format!("Promise.resolve().then(()=>require({expr}))"));
                    i = j + 1;
                    continue;
                }
            }
        }
        result.push(bytes[i]);
        i += 1;
    }
    out = result;
    out
}

static WRAPPER_PARAM_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^([ \t]*)(const|let)(\s+)(__dirname|__filename|exports|require|module|console|process|Buffer|global)\b",
    )
    .unwrap()
});

/// Step 8: identifiers shadowing the wrapper's injected parameters must use
/// `var` so redeclaration doesn't throw a `SyntaxError` in the wrapped
/// function body.
fn fixup_wrapper_collisions(source: &str) -> String {
    WRAPPER_PARAM_DECL
        .replace_all(source, |caps: &regex::Captures| {
            format!("{}var{}{}", &caps[1], &caps[3], &caps[4])
        })
        .into_owned()
}

/// Regex-based heuristic used by the module executor to decide whether
/// untyped `.js` source is ESM when no `package.json` `type` field settles
/// it. Deliberately over-inclusive: a false "looks like ESM" just routes
/// through the transformer, which is identity on plain CJS anyway.
pub fn looks_like_esm(source: &str) -> bool {
    static TOP_LEVEL_IMPORT_EXPORT: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?m)^[ \t]*(import\s|export\s|export\{|export\*)").unwrap()
    });
    let masked = mask(source);
    TOP_LEVEL_IMPORT_EXPORT.is_match(&masked.source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_on_plain_commonjs() {
        let src = "const x = require('y');\nmodule.exports = x;\n";
        assert_eq!(transform(src), src);
    }

    #[test]
    fn named_default_import() {
        let out = transform("import React, { useState, useEffect as fx } from 'react';\n");
        assert!(out.contains("require('react')"));
        assert!(out.contains("const React ="));
        assert!(out.contains("useEffect: fx"));
    }

    #[test]
    fn namespace_import() {
        let out = transform("import * as path from 'path';\n");
        assert_eq!(out.trim(), "const path = require('path');");
    }

    #[test]
    fn bare_import_for_side_effects() {
        let out = transform("import './polyfill.js';\n");
        assert_eq!(out.trim(), "require('./polyfill.js');");
    }

    #[test]
    fn export_const_assigns_and_retains_declaration() {
        let out = transform("export const v = 7;\n");
        assert!(out.contains("const v = 7;"));
        assert!(out.contains("exports.v = v;"));
    }

    #[test]
    fn export_default_expression() {
        let out = transform("export default function hello() { return 1; }\n");
        assert!(out.starts_with("module.exports = function hello()"));
    }

    #[test]
    fn export_function_appends_trailing_export() {
        let out = transform("export function add(a, b) { return a + b; }\n");
        assert!(out.contains("function add(a, b)"));
        assert!(out.trim_end().ends_with("exports.add = add;"));
    }

    #[test]
    fn named_export_bare_reexports_import_live_binding() {
        let out = transform("import { x } from './a.mjs';\nexport { x as y };\n");
        assert!(out.contains("Object.defineProperty(exports, \"y\""));
        assert!(out.contains("__imp1.x"));
    }

    #[test]
    fn export_star_from_installs_getters() {
        let out = transform("export * from './util.mjs';\n");
        assert!(out.contains("Object.keys(__star1)"));
        assert!(out.contains("require('./util.mjs')"));
    }

    #[test]
    fn import_meta_url_is_rewritten() {
        let out = transform("console.log(import.meta.url);\n");
        assert!(out.contains("__importMetaUrl"));
    }

    #[test]
    fn dynamic_import_literal_becomes_resolved_require() {
        let out = transform("const m = import('./x.js');\n");
        assert!(out.contains("Promise.resolve(require("));
    }

    #[test]
    fn dynamic_import_expression_defers_require() {
        let out = transform("const m = import(path);\n");
        assert!(out.contains("Promise.resolve().then(()=>require(path))"));
    }

    #[test]
    fn method_call_named_import_is_untouched() {
        let out = transform("loader.import(x);\n");
        assert!(out.contains("loader.import(x)"));
    }

    #[test]
    fn template_literal_spelling_export_keyword_survives() {
        let out = transform("const s = `export function foo() {}`;\nexport const ok = 1;\n");
        assert!(out.contains("`export function foo() {}`"));
        assert!(out.contains("exports.ok = ok;"));
    }

    #[test]
    fn collision_with_wrapper_param_becomes_var() {
        let out = transform("const module = {};\nexport const x = 1;\n");
        assert!(out.contains("var module = {};"));
    }

    #[test]
    fn looks_like_esm_detects_top_level_import() {
        assert!(looks_like_esm("import x from 'y';\n"));
        assert!(!looks_like_esm("const x = require('y');\n"));
        assert!(!looks_like_esm("const s = 'import foo from bar';\n"));
    }
}
