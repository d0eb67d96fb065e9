//! Word expansion: variables, tilde, and glob. Command substitution needs a
//! live interpreter to run the nested command, so it lives in
//! [`super::interpreter`] and is applied before these passes run.

use std::collections::HashMap;

use crate::vfs::Vfs;

/// Replace `$NAME`, `${NAME}` and `$?` with values from `env`. Unknown
/// variables expand to the empty string, matching POSIX shells.
pub fn expand_variables(text: &str, env: &HashMap<String, String>) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '$' && i + 1 < chars.len() {
            if chars[i + 1] == '{' {
                if let Some(end) = chars[i + 2..].iter().position(|&c| c == '}') {
                    let name: String = chars[i + 2..i + 2 + end].iter().collect();
                    out.push_str(env.get(&name).map(String::as_str).unwrap_or(""));
                    i += 2 + end + 1;
                    continue;
                }
            } else if chars[i + 1] == '?' {
                out.push_str(env.get("?").map(String::as_str).unwrap_or("0"));
                i += 2;
                continue;
            } else if chars[i + 1] == '$' {
                out.push_str(env.get("$").map(String::as_str).unwrap_or("0"));
                i += 2;
                continue;
            } else if chars[i + 1].is_alphabetic() || chars[i + 1] == '_' {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && (chars[end].is_alphanumeric() || chars[end] == '_') {
                    end += 1;
                }
                let name: String = chars[start..end].iter().collect();
                out.push_str(env.get(&name).map(String::as_str).unwrap_or(""));
                i = end;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

/// Expand a leading `~` or `~/...` to `home`. Only applies at the very start
/// of an unquoted word.
pub fn expand_tilde(text: &str, home: &str) -> String {
    if text == "~" {
        home.to_string()
    } else if let Some(rest) = text.strip_prefix("~/") {
        format!("{home}/{rest}")
    } else {
        text.to_string()
    }
}

fn has_glob_chars(text: &str) -> bool {
    text.contains('*') || text.contains('?') || text.contains('[')
}

/// Match a simple glob pattern (`*`, `?`, `[...]`) against a literal name.
fn glob_match(pattern: &[char], name: &[char]) -> bool {
    match (pattern.first(), name.first()) {
        (None, None) => true,
        (Some('*'), _) => {
            glob_match(&pattern[1..], name) || (!name.is_empty() && glob_match(pattern, &name[1..]))
        }
        (Some('?'), Some(_)) => glob_match(&pattern[1..], &name[1..]),
        (Some('['), Some(c)) => {
            if let Some(close) = pattern.iter().position(|&ch| ch == ']') {
                let class = &pattern[1..close];
                let negate = class.first() == Some(&'!');
                let class = if negate { &class[1..] } else { class };
                let matched = class.contains(c);
                if matched != negate {
                    glob_match(&pattern[close + 1..], &name[1..])
                } else {
                    false
                }
            } else {
                false
            }
        }
        (Some(p), Some(c)) if p == c => glob_match(&pattern[1..], &name[1..]),
        _ => false,
    }
}

/// Expand a glob pattern against the VFS directory it names. Returns the
/// pattern unchanged (as a single-element vec) if it has no glob characters
/// or if nothing matches -- matching a shell with `nullglob` off.
pub async fn expand_glob(text: &str, cwd: &str, vfs: &Vfs) -> Vec<String> {
    if !has_glob_chars(text) {
        return vec![text.to_string()];
    }

    let (dir, pattern) = match text.rfind('/') {
        Some(idx) => (&text[..idx + 1], &text[idx + 1..]),
        None => ("", text),
    };
    let dir_path = if dir.is_empty() { "." } else { dir.trim_end_matches('/') };

    let entries = match vfs.readdir(dir_path, cwd).await {
        Ok(entries) => entries,
        Err(_) => return vec![text.to_string()],
    };

    let pattern_chars: Vec<char> = pattern.chars().collect();
    let mut matches: Vec<String> = entries
        .into_iter()
        .filter(|e| !e.name.starts_with('.') || pattern.starts_with('.'))
        .filter(|e| glob_match(&pattern_chars, &e.name.chars().collect::<Vec<_>>()))
        .map(|e| format!("{dir}{}", e.name))
        .collect();

    if matches.is_empty() {
        vec![text.to_string()]
    } else {
        matches.sort();
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn expands_dollar_var_and_braces() {
        let e = env(&[("HOME", "/home/user")]);
        assert_eq!(expand_variables("$HOME/x", &e), "/home/user/x");
        assert_eq!(expand_variables("${HOME}/y", &e), "/home/user/y");
    }

    #[test]
    fn unknown_variable_expands_empty() {
        let e = env(&[]);
        assert_eq!(expand_variables("$MISSING!", &e), "!");
    }

    #[test]
    fn question_mark_expands_exit_status() {
        let e = env(&[("?", "7")]);
        assert_eq!(expand_variables("$?", &e), "7");
    }

    #[test]
    fn tilde_expands_only_at_start() {
        assert_eq!(expand_tilde("~/docs", "/home/user"), "/home/user/docs");
        assert_eq!(expand_tilde("a~b", "/home/user"), "a~b");
    }

    #[tokio::test]
    async fn glob_expands_against_directory() {
        let vfs = Vfs::new();
        vfs.mkdir("/d", false, "/").await.unwrap();
        vfs.write_file("/d/a.txt", b"1", "/").await.unwrap();
        vfs.write_file("/d/b.txt", b"2", "/").await.unwrap();
        vfs.write_file("/d/c.rs", b"3", "/").await.unwrap();
        let mut matches = expand_glob("/d/*.txt", "/", &vfs).await;
        matches.sort();
        assert_eq!(matches, vec!["/d/a.txt".to_string(), "/d/b.txt".to_string()]);
    }

    #[tokio::test]
    async fn glob_with_no_matches_passes_through() {
        let vfs = Vfs::new();
        vfs.mkdir("/d", false, "/").await.unwrap();
        let matches = expand_glob("/d/*.nope", "/", &vfs).await;
        assert_eq!(matches, vec!["/d/*.nope".to_string()]);
    }
}
