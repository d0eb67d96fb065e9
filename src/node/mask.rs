//! Literal masker for the ESM->CJS transformer.
//!
//! Walks the source once, tracking line/block comments, string and template
//! literals, and regex literals, replacing each with a placeholder of the
//! form `"__LIFO_S<n>__"` so the regex-driven rewrite passes never touch
//! text that merely *looks* like an import/export keyword inside a string.
//!
//! The regex-literal detector is deliberately over-inclusive: a false
//! positive (masking something that wasn't really a regex) is invisible to
//! the rewrite passes, but a false negative -- failing to mask a regex
//! containing a backtick -- would shred the template scanner. When in
//! doubt, this scanner treats `/` as a regex start.

/// One masked-out literal, with enough detail to unmask it verbatim later.
#[derive(Debug, Clone)]
pub struct MaskedLiteral {
    pub original: String,
}

/// The output of masking: the rewritten source (with placeholders) and the
/// table needed to restore the originals.
pub struct Masked {
    pub source: String,
    literals: Vec<MaskedLiteral>,
}

impl Masked {
    pub fn placeholder(index: usize) -> String {
        format!("__LIFO_S{index}__")
    }

    /// Replace every placeholder in `text` with its original literal. Used
    /// both for the final unmask pass and for inspecting a masked slice
    /// mid-rewrite (e.g. re-checking an export name).
    pub fn unmask(&self, text: &str) -> String {
        let mut out = text.to_string();
        // Longest-index-first avoids `__LIFO_S1__` prefix-matching inside
        // `__LIFO_S10__` during replacement.
        let mut indices: Vec<usize> = (0..self.literals.len()).collect();
        indices.sort_unstable_by(|a, b| b.cmp(a));
        for i in indices {
            out = out.replace(&Self::placeholder(i), &self.literals[i].original);
        }
        out
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Code,
    LineComment,
    BlockComment,
    SingleQuote,
    DoubleQuote,
    Template,
    Regex,
}

/// Heuristic: does the previous non-whitespace token suggest `/` starts a
/// regex literal rather than a division operator? Over-inclusive by design.
fn prev_allows_regex(prev_non_ws: Option<char>) -> bool {
    match prev_non_ws {
        None => true,
        Some(c) => !(c.is_alphanumeric() || c == '_' || c == '$' || c == ')' || c == ']'),
    }
}

pub fn mask(source: &str) -> Masked {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::new();
    let mut literals = Vec::new();
    let mut mode = Mode::Code;
    let mut lit_start = 0usize;
    let mut prev_non_ws: Option<char> = None;
    let mut template_depth = 0i32; // brace depth inside `${...}` within a template
    let mut i = 0usize;

    while i < chars.len() {
        let c = chars[i];
        match mode {
            Mode::Code => {
                if c == '/' && chars.get(i + 1) == Some(&'/') {
                    mode = Mode::LineComment;
                    i += 2;
                    continue;
                }
                if c == '/' && chars.get(i + 1) == Some(&'*') {
                    mode = Mode::BlockComment;
                    i += 2;
                    continue;
                }
                if c == '\'' {
                    mode = Mode::SingleQuote;
                    lit_start = i;
                    i += 1;
                    continue;
                }
                if c == '"' {
                    mode = Mode::DoubleQuote;
                    lit_start = i;
                    i += 1;
                    continue;
                }
                if c == '`' {
                    mode = Mode::Template;
                    lit_start = i;
                    i += 1;
                    continue;
                }
                if c == '/' && prev_allows_regex(prev_non_ws) {
                    mode = Mode::Regex;
                    lit_start = i;
                    i += 1;
                    continue;
                }
                out.push(c);
                if !c.is_whitespace() {
                    prev_non_ws = Some(c);
                }
                i += 1;
            }
            Mode::LineComment => {
                if c == '\n' {
                    mode = Mode::Code;
                    out.push(c);
                }
                i += 1;
            }
            Mode::BlockComment => {
                if c == '*' && chars.get(i + 1) == Some(&'/') {
                    mode = Mode::Code;
                    i += 2;
                    continue;
                }
                if c == '\n' {
                    out.push(c);
                }
                i += 1;
            }
            Mode::SingleQuote | Mode::DoubleQuote => {
                let quote = if mode == Mode::SingleQuote { '\'' } else { '"' };
                if c == '\\' && i + 1 < chars.len() {
                    i += 2;
                    continue;
                }
                if c == quote {
                    let literal: String = chars[lit_start..=i].iter().collect();
                    let idx = literals.len();
                    literals.push(MaskedLiteral { original: literal });
                    out.push('"');
                    out.push_str(&Masked::placeholder(idx));
                    out.push('"');
                    prev_non_ws = Some('"');
                    mode = Mode::Code;
                }
                i += 1;
            }
            Mode::Template => {
                if c == '\\' && i + 1 < chars.len() {
                    i += 2;
                    continue;
                }
                if c == '$' && chars.get(i + 1) == Some(&'{') {
                    template_depth = 1;
                    i += 2;
                    // Scan the `${...}` expression body, tracking nested
                    // braces and any literals nested inside it, so a quote
                    // or backtick inside the expression doesn't prematurely
                    // close the template.
                    while i < chars.len() && template_depth > 0 {
                        match chars[i] {
                            '{' => {
                                template_depth += 1;
                                i += 1;
                            }
                            '}' => {
                                template_depth -= 1;
                                i += 1;
                            }
                            '\'' | '"' | '`' => {
                                let q = chars[i];
                                i += 1;
                                while i < chars.len() && chars[i] != q {
                                    if chars[i] == '\\' {
                                        i += 1;
                                    }
                                    i += 1;
                                }
                                i += 1;
                            }
                            _ => i += 1,
                        }
                    }
                    continue;
                }
                if c == '`' {
                    let literal: String = chars[lit_start..=i].iter().collect();
                    let idx = literals.len();
                    literals.push(MaskedLiteral { original: literal });
                    out.push('"');
                    out.push_str(&Masked::placeholder(idx));
                    out.push('"');
                    prev_non_ws = Some('"');
                    mode = Mode::Code;
                }
                i += 1;
            }
            Mode::Regex => {
                if c == '\\' && i + 1 < chars.len() {
                    i += 2;
                    continue;
                }
                if c == '[' {
                    // character classes may contain an unescaped `/`
                    i += 1;
                    while i < chars.len() && chars[i] != ']' {
                        if chars[i] == '\\' {
                            i += 1;
                        }
                        i += 1;
                    }
                    i += 1;
                    continue;
                }
                if c == '/' {
                    i += 1;
                    while i < chars.len() && chars[i].is_alphabetic() {
                        i += 1; // flags
                    }
                    let literal: String = chars[lit_start..i].iter().collect();
                    let idx = literals.len();
                    literals.push(MaskedLiteral { original: literal });
                    out.push('"');
                    out.push_str(&Masked::placeholder(idx));
                    out.push('"');
                    prev_non_ws = Some('"');
                    mode = Mode::Code;
                    continue;
                }
                if c == '\n' {
                    // A literal newline inside what we thought was a regex
                    // means this wasn't one; bail out by treating it as a
                    // lone division -- reset and replay from lit_start + 1
                    // in Code mode to avoid eating the rest of the file.
                    mode = Mode::Code;
                    out.push_str(&chars[lit_start..i].iter().collect::<String>());
                    continue;
                }
                i += 1;
            }
        }
    }

    Masked { source: out, literals }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_double_quoted_string() {
        let m = mask(r#"const x = "export default 1";"#);
        assert!(m.source.contains("__LIFO_S0__"));
        assert!(!m.source.contains("export default"));
        assert_eq!(m.unmask(&m.source), r#"const x = "export default 1";"#);
    }

    #[test]
    fn masks_template_with_expression() {
        let m = mask("const x = `hi ${name} export`;");
        assert!(!m.source.contains("export"));
        assert_eq!(m.unmask(&m.source), "const x = `hi ${name} export`;");
    }

    #[test]
    fn regex_with_backtick_does_not_confuse_template_scanner() {
        let src = "const re = /`/; export const y = 1;";
        let m = mask(src);
        assert!(m.source.contains("export const y"));
        assert_eq!(m.unmask(&m.source), src);
    }

    #[test]
    fn division_is_not_treated_as_regex() {
        let src = "const a = b / c / d;";
        let m = mask(src);
        assert_eq!(m.source, src);
    }

    #[test]
    fn line_comment_is_stripped_of_content() {
        let m = mask("let x = 1; // export default\nlet y = 2;");
        assert!(!m.source.contains("export default"));
        assert!(m.source.contains("let y = 2;"));
    }

    #[test]
    fn block_comment_is_stripped_of_content() {
        let m = mask("/* export default */ let y = 2;");
        assert!(!m.source.contains("export default"));
    }
}
