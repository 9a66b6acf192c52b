//! Attributes, attribute patterns, and unknown-sets.
//!
//! An attribute is a rooted qualified path naming an input position, e.g.
//! `request.auth.claims["email"]`. Patterns add wildcard qualifiers and
//! declare which inputs are (partially) unknown. An unknown-set is the
//! runtime trace of attributes an evaluation touched without knowing their
//! value.
//!
//! Textual grammar for both forms:
//!
//! ```text
//! root ( '.' name | '[' literal ']' )* ( '.*' )?
//! ```
//!
//! where `literal` is a bool, int, uint (`3u`), or quoted string.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EvalError;

/// One path step below the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Qualifier {
    Bool(bool),
    Int(i64),
    Uint(u64),
    String(String),
}

impl Qualifier {
    pub fn field(name: impl Into<String>) -> Self {
        Self::String(name.into())
    }
}

impl Display for Qualifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "[{b}]"),
            Self::Int(i) => write!(f, "[{i}]"),
            Self::Uint(u) => write!(f, "[{u}u]"),
            Self::String(s) => {
                if is_identifier(s) {
                    write!(f, ".{s}")
                } else {
                    write!(f, "[{s:?}]")
                }
            }
        }
    }
}

/// A rooted qualified path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Attribute {
    root: String,
    qualifiers: Vec<Qualifier>,
}

impl Attribute {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            qualifiers: Vec::new(),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn qualifiers(&self) -> &[Qualifier] {
        &self.qualifiers
    }

    /// Extend the path by one qualifier.
    pub fn qualify(mut self, qualifier: Qualifier) -> Self {
        self.qualifiers.push(qualifier);
        self
    }

    /// Extend the path by a field name.
    pub fn select(self, name: impl Into<String>) -> Self {
        self.qualify(Qualifier::String(name.into()))
    }

    /// Structural prefix test: same root, and every qualifier of `self`
    /// equals the corresponding qualifier of `other`.
    pub fn is_prefix_of(&self, other: &Attribute) -> bool {
        self.root == other.root
            && self.qualifiers.len() <= other.qualifiers.len()
            && self
                .qualifiers
                .iter()
                .zip(other.qualifiers.iter())
                .all(|(a, b)| a == b)
    }
}

impl Display for Attribute {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)?;
        for q in &self.qualifiers {
            write!(f, "{q}")?;
        }
        Ok(())
    }
}

impl FromStr for Attribute {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (root, qualifiers, wildcard) = parse_path(s)?;
        if wildcard {
            return Err(EvalError::bad_format(
                "wildcard is only valid in attribute patterns",
            ));
        }
        Ok(Self { root, qualifiers })
    }
}

/// One pattern step: an exact qualifier or a wildcard over any qualifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatternQualifier {
    Exact(Qualifier),
    Wildcard,
}

impl PatternQualifier {
    fn covers(&self, qualifier: &Qualifier) -> bool {
        match self {
            Self::Wildcard => true,
            Self::Exact(q) => q == qualifier,
        }
    }
}

/// Outcome of matching a pattern against an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternMatch {
    /// The attribute is at least as long as the pattern and every pattern
    /// qualifier covers the corresponding attribute qualifier.
    Full,
    /// The attribute is a covered proper prefix of the pattern.
    Partial,
    Miss,
}

/// An attribute with optional wildcard qualifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttributePattern {
    root: String,
    qualifiers: Vec<PatternQualifier>,
}

impl AttributePattern {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            qualifiers: Vec::new(),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn qualify(mut self, qualifier: Qualifier) -> Self {
        self.qualifiers.push(PatternQualifier::Exact(qualifier));
        self
    }

    pub fn select(self, name: impl Into<String>) -> Self {
        self.qualify(Qualifier::String(name.into()))
    }

    pub fn wildcard(mut self) -> Self {
        self.qualifiers.push(PatternQualifier::Wildcard);
        self
    }

    pub fn match_against(&self, attribute: &Attribute) -> PatternMatch {
        if self.root != attribute.root() {
            return PatternMatch::Miss;
        }
        let quals = attribute.qualifiers();
        let shared = self.qualifiers.len().min(quals.len());
        for (p, q) in self.qualifiers[..shared].iter().zip(quals[..shared].iter()) {
            if !p.covers(q) {
                return PatternMatch::Miss;
            }
        }
        if quals.len() >= self.qualifiers.len() {
            PatternMatch::Full
        } else {
            PatternMatch::Partial
        }
    }
}

impl Display for AttributePattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)?;
        for q in &self.qualifiers {
            match q {
                PatternQualifier::Exact(q) => write!(f, "{q}")?,
                PatternQualifier::Wildcard => write!(f, ".*")?,
            }
        }
        Ok(())
    }
}

impl FromStr for AttributePattern {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (root, qualifiers, wildcard) = parse_path(s)?;
        let mut qualifiers: Vec<_> = qualifiers.into_iter().map(PatternQualifier::Exact).collect();
        if wildcard {
            qualifiers.push(PatternQualifier::Wildcard);
        }
        Ok(Self { root, qualifiers })
    }
}

/// An ordered, de-duplicated set of concrete attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnknownSet {
    attributes: Vec<Attribute>,
}

impl UnknownSet {
    pub fn singleton(attribute: Attribute) -> Self {
        Self {
            attributes: vec![attribute],
        }
    }

    pub fn union(&self, other: &UnknownSet) -> Self {
        let mut attributes = self.attributes.clone();
        attributes.extend(other.attributes.iter().cloned());
        attributes.sort();
        attributes.dedup();
        Self { attributes }
    }

    pub fn contains(&self, attribute: &Attribute) -> bool {
        self.attributes.contains(attribute)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.iter()
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

impl FromIterator<Attribute> for UnknownSet {
    fn from_iter<T: IntoIterator<Item = Attribute>>(iter: T) -> Self {
        let mut attributes: Vec<_> = iter.into_iter().collect();
        attributes.sort();
        attributes.dedup();
        Self { attributes }
    }
}

impl Display for UnknownSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, attr) in self.attributes.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{attr}")?;
        }
        Ok(())
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parse `root ( '.' name | '[' literal ']' )* ( '.*' )?`.
///
/// Returns the root, exact qualifiers, and whether a trailing wildcard was
/// present.
fn parse_path(input: &str) -> Result<(String, Vec<Qualifier>, bool), EvalError> {
    let mut scanner = Scanner::new(input);
    let root = scanner.identifier()?;
    let mut qualifiers = Vec::new();
    let mut wildcard = false;

    while let Some(c) = scanner.peek() {
        if wildcard {
            return Err(scanner.fail("wildcard must be the final qualifier"));
        }
        match c {
            '.' => {
                scanner.bump();
                if scanner.peek() == Some('*') {
                    scanner.bump();
                    wildcard = true;
                } else {
                    qualifiers.push(Qualifier::String(scanner.identifier()?));
                }
            }
            '[' => {
                scanner.bump();
                qualifiers.push(scanner.literal()?);
                scanner.expect(']')?;
            }
            _ => return Err(scanner.fail(format!("unexpected character {c:?}"))),
        }
    }

    Ok((root, qualifiers, wildcard))
}

struct Scanner<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn expect(&mut self, expected: char) -> Result<(), EvalError> {
        match self.bump() {
            Some(c) if c == expected => Ok(()),
            _ => Err(self.fail(format!("expected {expected:?}"))),
        }
    }

    fn fail(&self, message: impl Display) -> EvalError {
        EvalError::bad_format(format!(
            "invalid attribute path at offset {}: {message}",
            self.pos
        ))
    }

    fn identifier(&mut self) -> Result<String, EvalError> {
        let start = self.pos;
        match self.peek() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                self.bump();
            }
            _ => return Err(self.fail("expected identifier")),
        }
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.bump();
            } else {
                break;
            }
        }
        Ok(self.input[start..self.pos].to_string())
    }

    /// Bracket literal: bool, int, uint (`3u`), or quoted string.
    fn literal(&mut self) -> Result<Qualifier, EvalError> {
        match self.peek() {
            Some(quote @ ('\'' | '"')) => {
                self.bump();
                let mut text = String::new();
                loop {
                    match self.bump() {
                        Some(c) if c == quote => break,
                        Some('\\') => match self.bump() {
                            Some(c @ ('\\' | '\'' | '"')) => text.push(c),
                            Some('n') => text.push('\n'),
                            Some('t') => text.push('\t'),
                            _ => return Err(self.fail("invalid escape")),
                        },
                        Some(c) => text.push(c),
                        None => return Err(self.fail("unterminated string literal")),
                    }
                }
                Ok(Qualifier::String(text))
            }
            Some('t' | 'f') => {
                let word = self.identifier()?;
                match word.as_str() {
                    "true" => Ok(Qualifier::Bool(true)),
                    "false" => Ok(Qualifier::Bool(false)),
                    _ => Err(self.fail(format!("invalid literal {word:?}"))),
                }
            }
            Some(c) if c == '-' || c.is_ascii_digit() => {
                let start = self.pos;
                if c == '-' {
                    self.bump();
                }
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.bump();
                }
                let digits = &self.input[start..self.pos];
                if self.peek() == Some('u') {
                    self.bump();
                    let value = digits
                        .parse::<u64>()
                        .map_err(|_| self.fail("invalid uint literal"))?;
                    Ok(Qualifier::Uint(value))
                } else {
                    let value = digits
                        .parse::<i64>()
                        .map_err(|_| self.fail("invalid int literal"))?;
                    Ok(Qualifier::Int(value))
                }
            }
            _ => Err(self.fail("expected literal")),
        }
    }
}
