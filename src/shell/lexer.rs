//! Shell lexer: turns a command line into
//! words and operators, honoring quoting and escapes.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A word, tagged with whether it came from an unquoted context (and is
    /// therefore eligible for glob/tilde expansion) or a quoted one.
    Word { text: String, quoted: bool },
    Pipe,
    And,
    Or,
    Semicolon,
    Background,
    RedirectOut,
    RedirectAppend,
    RedirectIn,
    RedirectErr,
    RedirectErrAppend,
    RedirectBoth,
    LParen,
    RParen,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError(pub String);

/// Tokenize a full command line. Quoting rules: single quotes are fully
/// literal; double quotes allow later variable/command-substitution
/// expansion (the lexer itself only strips the quote characters and resolves
/// backslash escapes inside them); a backslash outside quotes escapes the
/// next character literally.
pub fn tokenize(line: &str) -> Result<Vec<Token>, LexError> {
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;
    let mut tokens = Vec::new();

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c == '#' {
            break; // comment to end of line
        }

        match c {
            '|' => {
                if chars.get(i + 1) == Some(&'|') {
                    tokens.push(Token::Or);
                    i += 2;
                } else {
                    tokens.push(Token::Pipe);
                    i += 1;
                }
                continue;
            }
            '&' => {
                if chars.get(i + 1) == Some(&'&') {
                    tokens.push(Token::And);
                    i += 2;
                } else if chars.get(i + 1) == Some(&'>') {
                    tokens.push(Token::RedirectBoth);
                    i += 2;
                } else {
                    tokens.push(Token::Background);
                    i += 1;
                }
                continue;
            }
            ';' => {
                tokens.push(Token::Semicolon);
                i += 1;
                continue;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
                continue;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
                continue;
            }
            '>' => {
                if chars.get(i + 1) == Some(&'>') {
                    tokens.push(Token::RedirectAppend);
                    i += 2;
                } else {
                    tokens.push(Token::RedirectOut);
                    i += 1;
                }
                continue;
            }
            '<' => {
                tokens.push(Token::RedirectIn);
                i += 1;
                continue;
            }
            '2' if chars.get(i + 1) == Some(&'>') => {
                if chars.get(i + 2) == Some(&'>') {
                    tokens.push(Token::RedirectErrAppend);
                    i += 3;
                } else {
                    tokens.push(Token::RedirectErr);
                    i += 2;
                }
                continue;
            }
            _ => {}
        }

        let (word, quoted, consumed) = read_word(&chars[i..])?;
        tokens.push(Token::Word { text: word, quoted });
        i += consumed;
    }

    Ok(tokens)
}

/// Read one whitespace-delimited word starting at `chars[0]`, honoring
/// quote/escape rules. Returns `(text, was_quoted, chars_consumed)`.
fn read_word(chars: &[char]) -> Result<(String, bool, usize), LexError> {
    let mut out = String::new();
    let mut i = 0;
    let mut quoted = false;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            break;
        }
        match c {
            '|' | '&' | ';' | '(' | ')' | '>' | '<' | '#' => break,
            '\'' => {
                quoted = true;
                i += 1;
                let start = i;
                while i < chars.len() && chars[i] != '\'' {
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(LexError("unterminated single quote".to_string()));
                }
                out.push_str(&chars[start..i].iter().collect::<String>());
                i += 1;
            }
            '"' => {
                quoted = true;
                i += 1;
                loop {
                    if i >= chars.len() {
                        return Err(LexError("unterminated double quote".to_string()));
                    }
                    match chars[i] {
                        '"' => {
                            i += 1;
                            break;
                        }
                        '\\' if i + 1 < chars.len()
                            && matches!(chars[i + 1], '"' | '\\' | '$' | '`') =>
                        {
                            out.push(chars[i + 1]);
                            i += 2;
                        }
                        other => {
                            out.push(other);
                            i += 1;
                        }
                    }
                }
            }
            '\\' => {
                if i + 1 >= chars.len() {
                    return Err(LexError("trailing backslash".to_string()));
                }
                out.push(chars[i + 1]);
                i += 2;
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }

    Ok((out, quoted, i))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_pipeline() {
        let tokens = tokenize("echo hi | tr a-z A-Z").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Word { text: "echo".into(), quoted: false },
                Token::Word { text: "hi".into(), quoted: false },
                Token::Pipe,
                Token::Word { text: "tr".into(), quoted: false },
                Token::Word { text: "a-z".into(), quoted: false },
                Token::Word { text: "A-Z".into(), quoted: false },
            ]
        );
    }

    #[test]
    fn single_quotes_are_literal() {
        let tokens = tokenize("echo '$HOME'").unwrap();
        assert_eq!(
            tokens[1],
            Token::Word { text: "$HOME".into(), quoted: true }
        );
    }

    #[test]
    fn double_quotes_preserve_dollar_for_later_expansion() {
        let tokens = tokenize("echo \"$HOME\"").unwrap();
        assert_eq!(
            tokens[1],
            Token::Word { text: "$HOME".into(), quoted: true }
        );
    }

    #[test]
    fn recognizes_operators() {
        let tokens = tokenize("a && b || c; d & e > f >> g < h 2> i 2>> j").unwrap();
        assert!(tokens.contains(&Token::And));
        assert!(tokens.contains(&Token::Or));
        assert!(tokens.contains(&Token::Semicolon));
        assert!(tokens.contains(&Token::Background));
        assert!(tokens.contains(&Token::RedirectOut));
        assert!(tokens.contains(&Token::RedirectAppend));
        assert!(tokens.contains(&Token::RedirectIn));
        assert!(tokens.contains(&Token::RedirectErr));
        assert!(tokens.contains(&Token::RedirectErrAppend));
    }

    #[test]
    fn comment_truncates_line() {
        let tokens = tokenize("echo hi # trailing comment").unwrap();
        assert_eq!(tokens.len(), 2);
    }
}
