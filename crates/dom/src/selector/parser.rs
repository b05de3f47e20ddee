//! Selector compiler - text to [`CompiledSelector`]
//!
//! Hand-written recursive-descent over chars. Fails fast: an empty or
//! unparsable selector is an error, never a selector that matches nothing.

use super::{AttrOp, AttrTest, Combinator, CompiledSelector, Compound, Nth, Pseudo, Step};
use crate::error::{DomError, Result};

/// Compile selector text
pub fn parse(input: &str) -> Result<CompiledSelector> {
    let mut parser = Parser::new(input);
    let result = parser.parse_selector();
    if let Err(e) = &result {
        tracing::debug!("Selector compilation failed: {}", e);
    }
    result
}

struct Parser<'a> {
    input: &'a str,
    /// Byte offset of the next char
    pos: usize,
    /// Byte offset where the compound being parsed starts (for errors)
    clause_start: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            clause_start: 0,
        }
    }

    fn parse_selector(&mut self) -> Result<CompiledSelector> {
        self.skip_whitespace();
        if self.at_end() {
            return Err(DomError::selector(self.input, "", "empty selector"));
        }

        let mut steps = Vec::new();
        loop {
            self.clause_start = self.pos;
            let compound = self.parse_compound()?;
            let had_whitespace = self.skip_whitespace();

            let combinator = match self.peek() {
                None => {
                    steps.push(Step {
                        compound,
                        combinator: None,
                    });
                    break;
                }
                Some('>') => {
                    self.clause_start = self.pos;
                    self.bump();
                    self.skip_whitespace();
                    if self.at_end() {
                        return Err(self.error("dangling '>' combinator"));
                    }
                    Combinator::Child
                }
                Some(',') => {
                    self.clause_start = self.pos;
                    return Err(self.error("selector groups (',') are not supported"));
                }
                Some(c @ ('+' | '~')) => {
                    self.clause_start = self.pos;
                    return Err(self.error(format!("unsupported combinator '{}'", c)));
                }
                Some(_) if had_whitespace => Combinator::Descendant,
                Some(c) => return Err(self.error(format!("unexpected character '{}'", c))),
            };

            steps.push(Step {
                compound,
                combinator: Some(combinator),
            });
        }

        Ok(CompiledSelector::from_steps(steps))
    }

    fn parse_compound(&mut self) -> Result<Compound> {
        let mut compound = Compound::default();
        let mut parts = 0usize;

        match self.peek() {
            Some('*') => {
                self.bump();
                parts += 1;
            }
            Some(c) if is_ident_char(c) || c == '\\' => {
                compound.tag = self.ident()?.map(|tag| tag.to_ascii_lowercase());
                parts += 1;
            }
            _ => {}
        }

        loop {
            match self.peek() {
                Some('#') => {
                    self.bump();
                    let id = self
                        .ident()?
                        .ok_or_else(|| self.error("expected identifier after '#'"))?;
                    if compound.id.is_some() {
                        return Err(self.error("more than one id in a compound selector"));
                    }
                    compound.id = Some(id);
                }
                Some('.') => {
                    self.bump();
                    let class = self
                        .ident()?
                        .ok_or_else(|| self.error("expected class name after '.'"))?;
                    compound.classes.push(class);
                }
                Some('[') => {
                    self.bump();
                    let test = self.parse_attribute()?;
                    compound.attributes.push(test);
                }
                Some(':') => {
                    self.bump();
                    let pseudo = self.parse_pseudo()?;
                    compound.pseudos.push(pseudo);
                }
                _ => break,
            }
            parts += 1;
        }

        if parts == 0 {
            return Err(match self.peek() {
                None => self.error("empty compound selector"),
                Some(c) => self.error(format!("unexpected character '{}'", c)),
            });
        }

        Ok(compound)
    }

    /// After `[`
    fn parse_attribute(&mut self) -> Result<AttrTest> {
        self.skip_whitespace();
        let name = self
            .ident()?
            .ok_or_else(|| self.error("expected attribute name"))?
            .to_ascii_lowercase();
        self.skip_whitespace();

        let op: fn(String) -> AttrOp = match self.peek() {
            Some(']') => {
                self.bump();
                return Ok(AttrTest {
                    name,
                    op: AttrOp::Exists,
                });
            }
            Some('=') => {
                self.bump();
                AttrOp::Equals
            }
            Some(c @ ('~' | '|' | '^' | '$' | '*')) => {
                self.bump();
                if self.peek() != Some('=') {
                    return Err(self.error(format!("unknown attribute operator '{}'", c)));
                }
                self.bump();
                match c {
                    '~' => AttrOp::Includes,
                    '|' => AttrOp::DashMatch,
                    '^' => AttrOp::Prefix,
                    '$' => AttrOp::Suffix,
                    _ => AttrOp::Substring,
                }
            }
            None => return Err(self.error("unterminated attribute selector")),
            Some(c) => return Err(self.error(format!("unknown attribute operator '{}'", c))),
        };

        self.skip_whitespace();
        let value = match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.bump();
                self.quoted(quote)?
            }
            _ => self
                .unquoted_value()
                .ok_or_else(|| self.error("expected attribute value"))?,
        };
        self.skip_whitespace();

        match self.bump() {
            Some(']') => Ok(AttrTest {
                name,
                op: op(value),
            }),
            None => Err(self.error("unterminated attribute selector")),
            Some(c) => Err(self.error(format!("expected ']' but found '{}'", c))),
        }
    }

    /// After `:`
    fn parse_pseudo(&mut self) -> Result<Pseudo> {
        if self.peek() == Some(':') {
            return Err(self.error("pseudo-elements are not supported"));
        }
        let name = self
            .ident()?
            .ok_or_else(|| self.error("expected pseudo-class name after ':'"))?
            .to_ascii_lowercase();

        match name.as_str() {
            "first-child" => Ok(Pseudo::FirstChild),
            "last-child" => Ok(Pseudo::LastChild),
            "only-child" => Ok(Pseudo::OnlyChild),
            "empty" => Ok(Pseudo::Empty),
            "nth-child" => {
                if self.bump() != Some('(') {
                    return Err(self.error("':nth-child' requires an argument"));
                }
                let rest = &self.input[self.pos..];
                let close = rest
                    .find(')')
                    .ok_or_else(|| self.error("unterminated ':nth-child('"))?;
                let argument = rest[..close].trim().to_ascii_lowercase();
                self.pos += close + 1;

                let nth = match argument.as_str() {
                    "odd" => Nth::Odd,
                    "even" => Nth::Even,
                    n => n.parse::<u32>().map(Nth::Index).map_err(|_| {
                        self.error(format!("invalid ':nth-child' argument '{}'", n))
                    })?,
                };
                Ok(Pseudo::NthChild(nth))
            }
            other => Err(self.error(format!("unsupported pseudo-class ':{}'", other))),
        }
    }

    /// Identifier with backslash escapes; `None` if empty
    fn ident(&mut self) -> Result<Option<String>> {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c == '\\' {
                self.bump();
                match self.bump() {
                    Some(escaped) => out.push(escaped),
                    None => return Err(self.error("dangling escape")),
                }
            } else if is_ident_char(c) {
                self.bump();
                out.push(c);
            } else {
                break;
            }
        }
        Ok(if out.is_empty() { None } else { Some(out) })
    }

    /// Lenient unquoted attribute value: anything up to whitespace or `]`
    fn unquoted_value(&mut self) -> Option<String> {
        let rest = &self.input[self.pos..];
        let end = rest
            .find(|c: char| c.is_whitespace() || matches!(c, ']' | '"' | '\''))
            .unwrap_or(rest.len());
        if end == 0 {
            return None;
        }
        let value = rest[..end].to_string();
        self.pos += end;
        Some(value)
    }

    /// String body after the opening quote
    fn quoted(&mut self, quote: char) -> Result<String> {
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string")),
                Some('\\') => match self.bump() {
                    Some(escaped) => out.push(escaped),
                    None => return Err(self.error("unterminated string")),
                },
                Some(c) if c == quote => return Ok(out),
                Some(c) => out.push(c),
            }
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    /// Returns whether anything was skipped
    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while self.peek().map_or(false, char::is_whitespace) {
            self.bump();
        }
        self.pos != start
    }

    /// Error naming the clause being parsed
    fn error(&self, reason: impl Into<String>) -> DomError {
        let rest = &self.input[self.clause_start..];
        let end = rest
            .char_indices()
            .skip(1)
            .find(|&(_, c)| c.is_whitespace() || c == '>')
            .map_or(rest.len(), |(i, _)| i);
        DomError::selector(self.input, &rest[..end], reason)
    }
}

pub(super) fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || !c.is_ascii()
}
