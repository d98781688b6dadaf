//! A forward-only cursor over the tokens of one statement.

use strata_catalog::Dialect;

use super::lexer::{Token, TokenKind, tokenize};

pub(super) type StepResult<T> = Result<T, String>;

pub(super) struct Cursor<'a> {
    sql: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    dialect: Dialect,
}

impl<'a> Cursor<'a> {
    pub fn new(sql: &'a str, dialect: Dialect) -> StepResult<Self> {
        let tokens = tokenize(sql).map_err(|e| e.to_string())?;
        Ok(Self {
            sql,
            tokens,
            pos: 0,
            dialect,
        })
    }

    pub fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    pub fn peek_nth(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n)
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.tokens.len() || self.is_symbol(';')
    }

    pub fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.peek().is_some_and(|t| t.is_keyword(keyword))
    }

    pub fn is_keyword_at(&self, n: usize, keyword: &str) -> bool {
        self.peek_nth(n).is_some_and(|t| t.is_keyword(keyword))
    }

    pub fn is_symbol(&self, symbol: char) -> bool {
        self.peek().is_some_and(|t| t.is_symbol(symbol))
    }

    pub fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.is_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Consume `keywords` in sequence, or nothing if any is missing.
    pub fn eat_keywords(&mut self, keywords: &[&str]) -> bool {
        let matches = keywords
            .iter()
            .enumerate()
            .all(|(i, k)| self.is_keyword_at(i, k));
        if matches {
            self.pos += keywords.len();
        }
        matches
    }

    pub fn eat_symbol(&mut self, symbol: char) -> bool {
        if self.is_symbol(symbol) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub fn expect_keyword(&mut self, keyword: &str) -> StepResult<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(format!("expected {keyword}, found {}", self.describe()))
        }
    }

    pub fn expect_symbol(&mut self, symbol: char) -> StepResult<()> {
        if self.eat_symbol(symbol) {
            Ok(())
        } else {
            Err(format!("expected `{symbol}`, found {}", self.describe()))
        }
    }

    /// The upcoming token, for error messages.
    pub fn describe(&self) -> String {
        match self.peek() {
            Some(token) => format!("`{}`", token.text),
            None => "end of statement".to_string(),
        }
    }

    /// An identifier. Postgres folds unquoted identifiers to lower case.
    pub fn identifier(&mut self) -> StepResult<String> {
        match self.peek() {
            Some(token) if token.is_identifier() => {
                let name = match (token.kind, self.dialect) {
                    (TokenKind::Word, Dialect::Postgres) => token.text.to_lowercase(),
                    _ => token.text.clone(),
                };
                self.pos += 1;
                Ok(name)
            }
            _ => Err(format!("expected an identifier, found {}", self.describe())),
        }
    }

    /// `name`, `schema.name` or `database.schema.name`, as `(schema, name)`.
    pub fn qualified_name(&mut self) -> StepResult<(String, String)> {
        let mut parts = vec![self.identifier()?];
        while self.is_symbol('.') {
            self.pos += 1;
            parts.push(self.identifier()?);
        }
        let name = parts.pop().unwrap_or_default();
        let schema = parts.pop().unwrap_or_default();
        Ok((schema, name))
    }

    /// A parenthesized, comma-separated list of plain identifiers.
    pub fn identifier_list(&mut self) -> StepResult<Vec<String>> {
        self.expect_symbol('(')?;
        let mut names = Vec::new();
        loop {
            names.push(self.identifier()?);
            // Sort order and prefix lengths carry no meaning for constraints.
            while !self.is_symbol(',') && !self.is_symbol(')') && !self.at_end() {
                if self.is_symbol('(') {
                    self.skip_group()?;
                } else {
                    self.pos += 1;
                }
            }
            if !self.eat_symbol(',') {
                break;
            }
        }
        self.expect_symbol(')')?;
        Ok(names)
    }

    /// Skip a balanced parenthesized group starting at the current `(`.
    pub fn skip_group(&mut self) -> StepResult<()> {
        self.group_span().map(|_| ())
    }

    /// The text inside a balanced parenthesized group, trimmed.
    pub fn group_text(&mut self) -> StepResult<String> {
        let (open, close) = self.group_span()?;
        Ok(self.sql[self.tokens[open].end..self.tokens[close].start]
            .trim()
            .to_string())
    }

    /// The text of a balanced group including its parentheses.
    pub fn group_with_parens(&mut self) -> StepResult<String> {
        let (open, close) = self.group_span()?;
        Ok(self.text(open, close + 1))
    }

    fn group_span(&mut self) -> StepResult<(usize, usize)> {
        let open = self.pos;
        self.expect_symbol('(')?;
        let mut depth = 1;
        while let Some(token) = self.peek() {
            if token.is_symbol('(') {
                depth += 1;
            } else if token.is_symbol(')') {
                depth -= 1;
                if depth == 0 {
                    let close = self.pos;
                    self.pos += 1;
                    return Ok((open, close));
                }
            }
            self.pos += 1;
        }
        Err("unbalanced parentheses".to_string())
    }

    /// Source text covering tokens `from..to`.
    pub fn text(&self, from: usize, to: usize) -> String {
        if from >= to || to > self.tokens.len() {
            return String::new();
        }
        self.sql[self.tokens[from].start..self.tokens[to - 1].end].to_string()
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Consume an expression: at least one token, then everything up to a
    /// top-level `,` or `)`, or one of `stop` keywords.
    pub fn expression(&mut self, stop: &[&str]) -> StepResult<String> {
        let start = self.pos;
        let mut first = true;
        while let Some(token) = self.peek() {
            if token.is_symbol(',') || token.is_symbol(')') || token.is_symbol(';') {
                break;
            }
            if !first && stop.iter().any(|k| token.is_keyword(k)) {
                break;
            }
            if token.is_symbol('(') {
                self.skip_group()?;
            } else {
                self.pos += 1;
            }
            first = false;
        }
        if start == self.pos {
            return Err(format!("expected an expression, found {}", self.describe()));
        }
        Ok(self.text(start, self.pos))
    }

    /// Everything left in the statement.
    pub fn rest(&mut self) -> String {
        let start = self.pos;
        self.pos = self.tokens.len();
        let mut end = self.pos;
        if end > start && self.tokens[end - 1].is_symbol(';') {
            end -= 1;
        }
        self.text(start, end)
    }

    /// Skip tokens up to the next top-level `,` or the end.
    pub fn skip_to_comma(&mut self) -> StepResult<()> {
        while !self.at_end() && !self.is_symbol(',') && !self.is_symbol(')') {
            if self.is_symbol('(') {
                self.skip_group()?;
            } else {
                self.pos += 1;
            }
        }
        Ok(())
    }
}
