//! Statement splitting and tokenizing for migration scripts.
//!
//! The splitter cuts a script on top-level semicolons (and SQL Server `GO`
//! lines) while honouring string literals, quoted identifiers, comments,
//! parentheses, dollar-quoted bodies and trigger `BEGIN ... END` blocks. The
//! lexer then turns one statement into tokens that keep their byte spans,
//! so expressions can be copied out of the statement verbatim.

use std::fmt;

/// Split a script into statements, dropping empty ones and trailing `;`.
pub fn split_statements(sql: &str) -> Vec<String> {
    let mut splitter = Splitter {
        src: sql,
        pos: 0,
        start: 0,
        depth: 0,
        block_depth: 0,
        words: Vec::new(),
        statements: Vec::new(),
    };
    splitter.run();
    splitter.statements
}

struct Splitter<'a> {
    src: &'a str,
    pos: usize,
    start: usize,
    depth: i32,
    /// Open `BEGIN` blocks inside a trigger body.
    block_depth: i32,
    /// Leading words of the current statement, upper-cased.
    words: Vec<String>,
    statements: Vec<String>,
}

impl Splitter<'_> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.src[self.pos..].chars().nth(offset)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_until(&mut self, terminator: &str) {
        match self.src[self.pos..].find(terminator) {
            Some(offset) => self.pos += offset + terminator.len(),
            None => self.pos = self.src.len(),
        }
    }

    fn skip_quoted(&mut self, close: char) {
        while let Some(ch) = self.bump() {
            if ch == close {
                // A doubled closing quote is an escaped quote.
                if self.peek() == Some(close) {
                    self.bump();
                    continue;
                }
                return;
            }
        }
    }

    fn finish_statement(&mut self, end: usize) {
        let text = self.src[self.start..end].trim();
        if !is_blank(text) {
            self.statements.push(text.to_string());
        }
        self.words.clear();
        self.depth = 0;
        self.block_depth = 0;
    }

    fn is_trigger(&self) -> bool {
        self.words.first().is_some_and(|w| w == "CREATE")
            && self.words.iter().take(6).any(|w| w == "TRIGGER")
    }

    fn at_line_start(&self) -> bool {
        self.src[..self.pos]
            .chars()
            .rev()
            .take_while(|c| *c != '\n')
            .all(char::is_whitespace)
    }

    fn run(&mut self) {
        while let Some(ch) = self.peek() {
            match ch {
                '\'' | '"' | '`' => {
                    self.bump();
                    self.skip_quoted(ch);
                }
                '[' => {
                    self.bump();
                    self.skip_quoted(']');
                }
                '-' if self.peek_at(1) == Some('-') => self.skip_until("\n"),
                '/' if self.peek_at(1) == Some('*') => {
                    self.pos += 2;
                    self.skip_until("*/");
                }
                '$' => {
                    let rest = &self.src[self.pos..];
                    match dollar_tag(rest) {
                        Some(tag) => {
                            self.pos += tag.len();
                            let tag = tag.to_string();
                            self.skip_until(&tag);
                        }
                        None => {
                            self.bump();
                        }
                    }
                }
                '(' => {
                    self.depth += 1;
                    self.bump();
                }
                ')' => {
                    self.depth -= 1;
                    self.bump();
                }
                ';' if self.depth <= 0 && self.block_depth <= 0 => {
                    let end = self.pos;
                    self.bump();
                    self.finish_statement(end);
                    self.start = self.pos;
                }
                c if c.is_ascii_alphabetic() || c == '_' => {
                    let line_start = self.at_line_start();
                    let begin = self.pos;
                    while self
                        .peek()
                        .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
                    {
                        self.bump();
                    }
                    let word = self.src[begin..self.pos].to_ascii_uppercase();
                    if word == "GO" && line_start && self.rest_of_line_blank() {
                        self.finish_statement(begin);
                        self.skip_until("\n");
                        self.start = self.pos;
                        continue;
                    }
                    if self.is_trigger() {
                        match word.as_str() {
                            "BEGIN" | "CASE" => self.block_depth += 1,
                            "END" => self.block_depth -= 1,
                            _ => {}
                        }
                    }
                    if self.words.len() < 8 {
                        self.words.push(word);
                    }
                }
                _ => {
                    self.bump();
                }
            }
        }
        let end = self.src.len();
        self.finish_statement(end);
    }

    fn rest_of_line_blank(&self) -> bool {
        self.src[self.pos..]
            .split('\n')
            .next()
            .is_none_or(|line| line.trim().is_empty())
    }
}

/// The `$tag$` opening a dollar-quoted string, if `text` starts with one.
fn dollar_tag(text: &str) -> Option<&str> {
    let rest = text.strip_prefix('$')?;
    let end = rest.find('$')?;
    let tag = &rest[..end];
    if tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !tag.starts_with(|c: char| c.is_ascii_digit())
    {
        Some(&text[..end + 2])
    } else {
        None
    }
}

/// Whether `text` holds nothing but whitespace and comments.
fn is_blank(text: &str) -> bool {
    let mut rest = text.trim_start();
    loop {
        if rest.is_empty() {
            return true;
        }
        if let Some(after) = rest.strip_prefix("--") {
            rest = after.split_once('\n').map_or("", |(_, tail)| tail).trim_start();
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.split_once("*/").map_or("", |(_, tail)| tail).trim_start();
        } else {
            return false;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Unquoted word: keyword or identifier.
    Word,
    /// `"x"`, `` `x` `` or `[x]`, with the quotes removed from `text`.
    QuotedIdent,
    /// String literal; `text` keeps the quotes.
    Str,
    Number,
    Symbol,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// Byte span in the statement.
    pub start: usize,
    pub end: usize,
}

impl Token {
    /// Whether this is the unquoted keyword `keyword`, ignoring case.
    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.text.eq_ignore_ascii_case(keyword)
    }

    pub fn is_symbol(&self, symbol: char) -> bool {
        self.kind == TokenKind::Symbol && self.text.len() == 1 && self.text.starts_with(symbol)
    }

    pub fn is_identifier(&self) -> bool {
        matches!(self.kind, TokenKind::Word | TokenKind::QuotedIdent)
    }
}

/// Tokenizing failure with the byte position it happened at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub message: String,
    pub position: usize,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at byte {}", self.message, self.position)
    }
}

/// Tokenize one statement. Comments and whitespace are dropped.
pub fn tokenize(sql: &str) -> Result<Vec<Token>, LexError> {
    let mut lexer = Lexer { src: sql, pos: 0 };
    let mut tokens = Vec::new();
    loop {
        lexer.skip_whitespace_and_comments();
        if lexer.at_end() {
            break;
        }
        tokens.push(lexer.next_token()?);
    }
    Ok(tokens)
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl Lexer<'_> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.src[self.pos..].chars().nth(offset)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while self.peek().is_some_and(char::is_whitespace) {
                self.bump();
            }
            if self.peek() == Some('-') && self.peek_at(1) == Some('-') {
                while self.peek().is_some_and(|c| c != '\n') {
                    self.bump();
                }
                continue;
            }
            if self.peek() == Some('/') && self.peek_at(1) == Some('*') {
                match self.src[self.pos + 2..].find("*/") {
                    Some(offset) => self.pos += offset + 4,
                    None => self.pos = self.src.len(),
                }
                continue;
            }
            break;
        }
    }

    fn token(&self, kind: TokenKind, text: String, start: usize) -> Token {
        Token {
            kind,
            text,
            start,
            end: self.pos,
        }
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        let start = self.pos;
        let Some(ch) = self.peek() else {
            return Err(LexError {
                message: "unexpected end of input".into(),
                position: start,
            });
        };
        match ch {
            '\'' => {
                self.bump();
                self.quoted(start, '\'')?;
                let text = self.src[start..self.pos].to_string();
                Ok(self.token(TokenKind::Str, text, start))
            }
            '"' | '`' => {
                self.bump();
                let inner = self.quoted(start, ch)?;
                Ok(self.token(TokenKind::QuotedIdent, inner, start))
            }
            '[' => {
                self.bump();
                let inner = self.quoted(start, ']')?;
                Ok(self.token(TokenKind::QuotedIdent, inner, start))
            }
            '$' => {
                if let Some(tag) = dollar_tag(&self.src[self.pos..]) {
                    let tag = tag.to_string();
                    self.pos += tag.len();
                    match self.src[self.pos..].find(&tag) {
                        Some(offset) => self.pos += offset + tag.len(),
                        None => {
                            return Err(LexError {
                                message: format!("unterminated {tag} string"),
                                position: start,
                            });
                        }
                    }
                    let text = self.src[start..self.pos].to_string();
                    return Ok(self.token(TokenKind::Str, text, start));
                }
                self.bump();
                Ok(self.token(TokenKind::Symbol, "$".into(), start))
            }
            c if c.is_ascii_digit() => {
                while self
                    .peek()
                    .is_some_and(|c| c.is_ascii_alphanumeric() || c == '.')
                {
                    self.bump();
                }
                let text = self.src[start..self.pos].to_string();
                Ok(self.token(TokenKind::Number, text, start))
            }
            c if c.is_alphabetic() || c == '_' || c == '@' || c == '#' => {
                while self
                    .peek()
                    .is_some_and(|c| c.is_alphanumeric() || matches!(c, '_' | '$' | '@' | '#'))
                {
                    self.bump();
                }
                let text = self.src[start..self.pos].to_string();
                Ok(self.token(TokenKind::Word, text, start))
            }
            _ => {
                self.bump();
                Ok(self.token(TokenKind::Symbol, ch.to_string(), start))
            }
        }
    }

    /// Consume up to the closing quote and return the unescaped contents.
    fn quoted(&mut self, start: usize, close: char) -> Result<String, LexError> {
        let mut inner = String::new();
        loop {
            match self.bump() {
                Some(c) if c == close => {
                    if self.peek() == Some(close) {
                        self.bump();
                        inner.push(close);
                    } else {
                        return Ok(inner);
                    }
                }
                Some(c) => inner.push(c),
                None => {
                    return Err(LexError {
                        message: format!("unterminated quoted text starting with {close}"),
                        position: start,
                    });
                }
            }
        }
    }
}
