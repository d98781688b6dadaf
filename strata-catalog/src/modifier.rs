//! The modifier language.
//!
//! A modifier is one structural fact attached to a table or column, written
//! compactly:
//!
//! ```text
//! notnull
//! default=0
//! default=`now()`
//! references={film.film_id ondelete=cascade index}
//! index={. unique using=gin}
//! ```
//!
//! Modifiers are separated by whitespace. A value is either bare or quoted
//! with backticks (a literal backtick is written as two). A braced value
//! holds the modifier's own value followed by its submodifiers; `.` stands
//! for "no value". Unknown names are kept as-is so that newer modifiers pass
//! through older readers untouched.

use std::fmt;
use std::str::FromStr;

use crate::error::{CatalogError, CatalogResult};

/// A modifier's value, remembering whether it was written bare or quoted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModifierValue {
    /// Written without quotes.
    Plain(String),
    /// Written between backticks.
    Raw(String),
}

impl ModifierValue {
    /// Pick the bare form when the text survives it, the quoted form otherwise.
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        if needs_raw(&value) {
            Self::Raw(value)
        } else {
            Self::Plain(value)
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Plain(v) | Self::Raw(v) => v,
        }
    }
}

fn needs_raw(value: &str) -> bool {
    value.is_empty()
        || value == "."
        || value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '`' | '{' | '}' | '='))
}

/// One fact and its nested sub-facts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modifier {
    pub name: String,
    pub value: Option<ModifierValue>,
    pub submodifiers: Vec<Modifier>,
}

impl Modifier {
    /// A modifier with no value.
    pub fn flag(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
            submodifiers: Vec::new(),
        }
    }

    /// A modifier whose value is quoted only if it has to be.
    pub fn with_value(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            value: Some(ModifierValue::new(value)),
            ..Self::flag(name)
        }
    }

    /// A modifier whose value is always quoted.
    pub fn raw(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            value: Some(ModifierValue::Raw(value.into())),
            ..Self::flag(name)
        }
    }

    /// Append a submodifier.
    pub fn push(mut self, submodifier: Modifier) -> Self {
        self.submodifiers.push(submodifier);
        self
    }

    pub fn value_str(&self) -> Option<&str> {
        self.value.as_ref().map(ModifierValue::as_str)
    }

    pub fn submodifier(&self, name: &str) -> Option<&Modifier> {
        self.submodifiers.iter().find(|m| m.name == name)
    }

    pub fn has_submodifier(&self, name: &str) -> bool {
        self.submodifier(name).is_some()
    }
}

/// An ordered list of modifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Modifiers(pub Vec<Modifier>);

impl Modifiers {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, modifier: Modifier) {
        self.0.push(modifier);
    }

    pub fn get(&self, name: &str) -> Option<&Modifier> {
        self.0.iter().find(|m| m.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Modifier> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a Modifiers {
    type Item = &'a Modifier;
    type IntoIter = std::slice::Iter<'a, Modifier>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl IntoIterator for Modifiers {
    type Item = Modifier;
    type IntoIter = std::vec::IntoIter<Modifier>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl From<Vec<Modifier>> for Modifiers {
    fn from(modifiers: Vec<Modifier>) -> Self {
        Self(modifiers)
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    write!(f, "`{}`", value.replace('`', "``"))
}

fn write_value(f: &mut fmt::Formatter<'_>, value: &ModifierValue) -> fmt::Result {
    match value {
        ModifierValue::Plain(v) if !needs_raw(v) => f.write_str(v),
        ModifierValue::Plain(v) | ModifierValue::Raw(v) => write_quoted(f, v),
    }
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if self.submodifiers.is_empty() {
            if let Some(value) = &self.value {
                f.write_str("=")?;
                write_value(f, value)?;
            }
            return Ok(());
        }
        f.write_str("={")?;
        match &self.value {
            Some(value) => write_value(f, value)?,
            None => f.write_str(".")?,
        }
        for submodifier in &self.submodifiers {
            write!(f, " {submodifier}")?;
        }
        f.write_str("}")
    }
}

impl fmt::Display for Modifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, modifier) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{modifier}")?;
        }
        Ok(())
    }
}

impl FromStr for Modifiers {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_modifiers(s)
    }
}

/// Parse whitespace-separated modifiers.
pub fn parse_modifiers(src: &str) -> CatalogResult<Modifiers> {
    let mut parser = ModifierParser { src, pos: 0 };
    let mut modifiers = Vec::new();
    loop {
        parser.skip_whitespace();
        if parser.at_end() {
            break;
        }
        modifiers.push(parser.modifier()?);
    }
    Ok(Modifiers(modifiers))
}

/// Single-pass, left-to-right reader over the modifier text.
struct ModifierParser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> ModifierParser<'a> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn error(&self, offset: usize, message: impl Into<String>) -> CatalogError {
        CatalogError::modifier_syntax(self.src, offset, message)
    }

    /// Read until whitespace or one of the structural characters.
    fn word(&mut self) -> &'a str {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() || matches!(ch, '=' | '{' | '}' | '`') {
                break;
            }
            self.bump();
        }
        &self.src[start..self.pos]
    }

    fn modifier(&mut self) -> CatalogResult<Modifier> {
        let start = self.pos;
        let name = self.word();
        if name.is_empty() {
            let found = self.peek().map(|c| c.to_string()).unwrap_or_default();
            return Err(self.error(start, format!("expected a modifier name, found `{found}`")));
        }
        let mut modifier = Modifier::flag(name);
        if self.peek() != Some('=') {
            return Ok(modifier);
        }
        self.bump();
        match self.peek() {
            Some('{') => {
                let open = self.pos;
                self.bump();
                self.skip_whitespace();
                modifier.value = self.braced_value()?;
                loop {
                    self.skip_whitespace();
                    match self.peek() {
                        Some('}') => {
                            self.bump();
                            break;
                        }
                        None => return Err(self.error(open, "unterminated `{`")),
                        Some(_) => modifier.submodifiers.push(self.modifier()?),
                    }
                }
            }
            Some('`') => modifier.value = Some(ModifierValue::Raw(self.quoted()?)),
            _ => {
                let value_start = self.pos;
                let value = self.word();
                if value.is_empty() {
                    return Err(self.error(value_start, format!("expected a value for `{name}`")));
                }
                modifier.value = Some(ModifierValue::Plain(value.to_string()));
            }
        }
        Ok(modifier)
    }

    /// The leading value inside braces; `.` means none.
    fn braced_value(&mut self) -> CatalogResult<Option<ModifierValue>> {
        match self.peek() {
            Some('`') => Ok(Some(ModifierValue::Raw(self.quoted()?))),
            Some('}') | None => Err(self.error(self.pos, "expected a value or `.` after `{`")),
            Some(_) => {
                let start = self.pos;
                let value = self.word();
                match value {
                    "" => Err(self.error(start, "expected a value or `.` after `{`")),
                    "." => Ok(None),
                    _ => Ok(Some(ModifierValue::Plain(value.to_string()))),
                }
            }
        }
    }

    fn quoted(&mut self) -> CatalogResult<String> {
        let open = self.pos;
        self.bump();
        let mut value = String::new();
        loop {
            match self.bump() {
                Some('`') if self.peek() == Some('`') => {
                    self.bump();
                    value.push('`');
                }
                Some('`') => return Ok(value),
                Some(ch) => value.push(ch),
                None => return Err(self.error(open, "unterminated quoted value")),
            }
        }
    }
}
