//! CSS-like selectors: compiled form, compiler, matcher and cache
//!
//! ```text
//! "section > article.post:last-child a"
//!      │ compile (parser.rs)
//!      ▼
//! CompiledSelector [Step{section, Child}, Step{article.post:last-child, Descendant}, Step{a}]
//!      │ match right-to-left (matcher.rs)
//!      ▼
//! Vec<NodeId> in document order
//! ```

pub mod cache;
pub mod matcher;
pub mod parser;

use std::fmt;
use std::str::FromStr;

use smallvec::SmallVec;

use crate::error::{DomError, Result};

pub use cache::{global_cache, CacheConfig, SelectorCache};

/// A compiled selector: a chain of compound steps, leftmost first.
///
/// Stateless and immutable. Equal selector strings compile to equal values,
/// so it is safe to cache by source text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompiledSelector {
    steps: Vec<Step>,
}

impl CompiledSelector {
    /// Compile selector text
    pub fn compile(selector: &str) -> Result<Self> {
        parser::parse(selector)
    }

    pub(crate) fn from_steps(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}

impl FromStr for CompiledSelector {
    type Err = DomError;

    fn from_str(s: &str) -> Result<Self> {
        Self::compile(s)
    }
}

/// One compound selector and its relation to the next step
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Step {
    pub compound: Compound,
    /// `None` only on the last step
    pub combinator: Option<Combinator>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Combinator {
    /// Whitespace: any depth
    Descendant,
    /// `>`: immediate child
    Child,
}

/// Predicates of one compound selector, combined with AND
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Compound {
    /// Lower-cased tag, `None` for `*` or no tag at all
    pub tag: Option<String>,
    pub id: Option<String>,
    pub classes: SmallVec<[String; 2]>,
    pub attributes: Vec<AttrTest>,
    pub pseudos: Vec<Pseudo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttrTest {
    /// Lower-cased attribute name
    pub name: String,
    pub op: AttrOp,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AttrOp {
    /// `[name]`
    Exists,
    /// `[name=value]`
    Equals(String),
    /// `[name~=value]`: whitespace-separated word
    Includes(String),
    /// `[name|=value]`: exact or followed by `-`
    DashMatch(String),
    /// `[name^=value]`
    Prefix(String),
    /// `[name$=value]`
    Suffix(String),
    /// `[name*=value]`
    Substring(String),
}

impl AttrOp {
    pub fn matches(&self, value: &str) -> bool {
        match self {
            AttrOp::Exists => true,
            AttrOp::Equals(expected) => value == expected,
            AttrOp::Includes(word) => {
                !word.is_empty() && value.split_ascii_whitespace().any(|w| w == word)
            }
            AttrOp::DashMatch(prefix) => {
                value == prefix
                    || (value.starts_with(prefix.as_str())
                        && value[prefix.len()..].starts_with('-'))
            }
            AttrOp::Prefix(prefix) => !prefix.is_empty() && value.starts_with(prefix.as_str()),
            AttrOp::Suffix(suffix) => !suffix.is_empty() && value.ends_with(suffix.as_str()),
            AttrOp::Substring(needle) => !needle.is_empty() && value.contains(needle.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Pseudo {
    FirstChild,
    LastChild,
    OnlyChild,
    NthChild(Nth),
    Empty,
}

/// `:nth-child` argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Nth {
    /// 1-based position
    Index(u32),
    Odd,
    Even,
}

impl Nth {
    pub fn matches(self, position: usize) -> bool {
        match self {
            Nth::Index(n) => position == n as usize,
            Nth::Odd => position % 2 == 1,
            Nth::Even => position % 2 == 0,
        }
    }
}

impl fmt::Display for CompiledSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.steps {
            write!(f, "{}", step.compound)?;
            match step.combinator {
                Some(Combinator::Descendant) => f.write_str(" ")?,
                Some(Combinator::Child) => f.write_str(" > ")?,
                None => {}
            }
        }
        Ok(())
    }
}

/// Writes an identifier so the compiler reads it back unchanged
struct Ident<'a>(&'a str);

impl fmt::Display for Ident<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in self.0.chars() {
            if !parser::is_ident_char(c) {
                f.write_str("\\")?;
            }
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

/// Double-quoted string with `\` and `"` escaped
struct Quoted<'a>(&'a str);

impl fmt::Display for Quoted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("\"")?;
        for c in self.0.chars() {
            if matches!(c, '\\' | '"') {
                f.write_str("\\")?;
            }
            write!(f, "{}", c)?;
        }
        f.write_str("\"")
    }
}

impl fmt::Display for Compound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag {
            Some(tag) => write!(f, "{}", Ident(tag))?,
            None if self.id.is_none()
                && self.classes.is_empty()
                && self.attributes.is_empty()
                && self.pseudos.is_empty() =>
            {
                f.write_str("*")?
            }
            None => {}
        }
        if let Some(id) = &self.id {
            write!(f, "#{}", Ident(id))?;
        }
        for class in &self.classes {
            write!(f, ".{}", Ident(class))?;
        }
        for attr in &self.attributes {
            let (op, value) = match &attr.op {
                AttrOp::Exists => {
                    write!(f, "[{}]", Ident(&attr.name))?;
                    continue;
                }
                AttrOp::Equals(v) => ("=", v),
                AttrOp::Includes(v) => ("~=", v),
                AttrOp::DashMatch(v) => ("|=", v),
                AttrOp::Prefix(v) => ("^=", v),
                AttrOp::Suffix(v) => ("$=", v),
                AttrOp::Substring(v) => ("*=", v),
            };
            write!(f, "[{}{}{}]", Ident(&attr.name), op, Quoted(value))?;
        }
        for pseudo in &self.pseudos {
            match pseudo {
                Pseudo::FirstChild => f.write_str(":first-child")?,
                Pseudo::LastChild => f.write_str(":last-child")?,
                Pseudo::OnlyChild => f.write_str(":only-child")?,
                Pseudo::Empty => f.write_str(":empty")?,
                Pseudo::NthChild(Nth::Index(n)) => write!(f, ":nth-child({})", n)?,
                Pseudo::NthChild(Nth::Odd) => f.write_str(":nth-child(odd)")?,
                Pseudo::NthChild(Nth::Even) => f.write_str(":nth-child(even)")?,
            }
        }
        Ok(())
    }
}
