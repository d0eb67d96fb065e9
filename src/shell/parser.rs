//! Shell parser: tokens -> simple commands,
//! pipelines, and-or lists, sequences, background directives.

use super::lexer::Token;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectKind {
    Out,
    Append,
    In,
    Err,
    ErrAppend,
    Both,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub kind: RedirectKind,
    pub target: Word,
}

/// A lexer word tagged with its quoting, carried into the AST so expansion
/// can later decide whether to glob/tilde-expand it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    pub text: String,
    pub quoted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleCommand {
    pub name: Word,
    pub args: Vec<Word>,
    pub redirects: Vec<Redirect>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub commands: Vec<SimpleCommand>,
    pub background: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AndOr {
    Pipeline(Pipeline),
    And(Box<AndOr>, Pipeline),
    Or(Box<AndOr>, Pipeline),
}

/// A full parsed command line: a sequence of and-or lists, each one
/// separated by `;` (or a newline, in multi-line script sources).
pub type Sequence = Vec<AndOr>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError(pub String);

pub fn parse(tokens: &[Token]) -> Result<Sequence, ParseError> {
    let mut parser = Parser { tokens, pos: 0 };
    parser.parse_sequence()
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&Token> {
        let t = self.tokens.get(self.pos);
        self.pos += 1;
        t
    }

    fn parse_sequence(&mut self) -> Result<Sequence, ParseError> {
        let mut out = Vec::new();
        while self.peek().is_some() {
            if matches!(self.peek(), Some(Token::Semicolon)) {
                self.advance();
                continue;
            }
            out.push(self.parse_and_or()?);
            match self.peek() {
                Some(Token::Semicolon) => {
                    self.advance();
                }
                None => break,
                _ => {}
            }
        }
        Ok(out)
    }

    fn parse_and_or(&mut self) -> Result<AndOr, ParseError> {
        let mut left = AndOr::Pipeline(self.parse_pipeline()?);
        loop {
            match self.peek() {
                Some(Token::And) => {
                    self.advance();
                    let rhs = self.parse_pipeline()?;
                    left = AndOr::And(Box::new(left), rhs);
                }
                Some(Token::Or) => {
                    self.advance();
                    let rhs = self.parse_pipeline()?;
                    left = AndOr::Or(Box::new(left), rhs);
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn parse_pipeline(&mut self) -> Result<Pipeline, ParseError> {
        let mut commands = vec![self.parse_simple_command()?];
        while matches!(self.peek(), Some(Token::Pipe)) {
            self.advance();
            commands.push(self.parse_simple_command()?);
        }
        let background = matches!(self.peek(), Some(Token::Background));
        if background {
            self.advance();
        }
        Ok(Pipeline { commands, background })
    }

    fn parse_simple_command(&mut self) -> Result<SimpleCommand, ParseError> {
        let mut words = Vec::new();
        let mut redirects = Vec::new();

        loop {
            match self.peek() {
                Some(Token::Word { text, quoted }) => {
                    words.push(Word { text: text.clone(), quoted: *quoted });
                    self.advance();
                }
                Some(tok @ (Token::RedirectOut
                | Token::RedirectAppend
                | Token::RedirectIn
                | Token::RedirectErr
                | Token::RedirectErrAppend
                | Token::RedirectBoth)) => {
                    let kind = match tok {
                        Token::RedirectOut => RedirectKind::Out,
                        Token::RedirectAppend => RedirectKind::Append,
                        Token::RedirectIn => RedirectKind::In,
                        Token::RedirectErr => RedirectKind::Err,
                        Token::RedirectErrAppend => RedirectKind::ErrAppend,
                        Token::RedirectBoth => RedirectKind::Both,
                        _ => unreachable!(),
                    };
                    self.advance();
                    match self.advance() {
                        Some(Token::Word { text, quoted }) => redirects.push(Redirect {
                            kind,
                            target: Word { text: text.clone(), quoted: *quoted },
                        }),
                        _ => return Err(ParseError("expected redirection target".to_string())),
                    }
                }
                _ => break,
            }
        }

        if words.is_empty() {
            return Err(ParseError("expected command".to_string()));
        }
        let name = words.remove(0);
        Ok(SimpleCommand { name, args: words, redirects })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::lexer::tokenize;

    fn parse_str(s: &str) -> Sequence {
        parse(&tokenize(s).unwrap()).unwrap()
    }

    #[test]
    fn parses_simple_command() {
        let seq = parse_str("echo hi");
        assert_eq!(seq.len(), 1);
        match &seq[0] {
            AndOr::Pipeline(p) => {
                assert_eq!(p.commands.len(), 1);
                assert_eq!(p.commands[0].name.text, "echo");
                assert_eq!(p.commands[0].args[0].text, "hi");
            }
            _ => panic!("expected pipeline"),
        }
    }

    #[test]
    fn parses_pipeline() {
        let seq = parse_str("echo hi | tr a-z A-Z");
        match &seq[0] {
            AndOr::Pipeline(p) => assert_eq!(p.commands.len(), 2),
            _ => panic!("expected pipeline"),
        }
    }

    #[test]
    fn parses_and_or_chain() {
        let seq = parse_str("true && echo ok || echo bad");
        match &seq[0] {
            AndOr::Or(lhs, _) => match lhs.as_ref() {
                AndOr::And(_, _) => {}
                _ => panic!("expected nested And"),
            },
            _ => panic!("expected Or"),
        }
    }

    #[test]
    fn parses_background_pipeline() {
        let seq = parse_str("sleep 5 &");
        match &seq[0] {
            AndOr::Pipeline(p) => assert!(p.background),
            _ => panic!("expected pipeline"),
        }
    }

    #[test]
    fn parses_redirects() {
        let seq = parse_str("cat < in.txt > out.txt");
        match &seq[0] {
            AndOr::Pipeline(p) => {
                assert_eq!(p.commands[0].redirects.len(), 2);
                assert_eq!(p.commands[0].redirects[0].kind, RedirectKind::In);
                assert_eq!(p.commands[0].redirects[1].kind, RedirectKind::Out);
            }
            _ => panic!("expected pipeline"),
        }
    }

    #[test]
    fn parses_sequence_of_statements() {
        let seq = parse_str("echo a; echo b");
        assert_eq!(seq.len(), 2);
    }
}
