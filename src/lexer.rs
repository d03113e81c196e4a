use std::fmt;

const LEFT_DELIM: &str = "{{";
const RIGHT_DELIM: &str = "}}";
const LEFT_COMMENT: &str = "/*";
const RIGHT_COMMENT: &str = "*/";
/// A trim marker is a `-` plus one space, on the inner side of a delimiter.
const TRIM_MARKER_LEN: usize = 2;
const SPACE_CHARS: [char; 4] = [' ', '\t', '\r', '\n'];

const DECIMAL_DIGITS: &str = "0123456789_";
const HEX_DIGITS: &str = "0123456789abcdefABCDEF_";
const OCTAL_DIGITS: &str = "01234567_";
const BINARY_DIGITS: &str = "01_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Text,
    Comment,
    LeftDelim,
    RightDelim,
    Space,
    Identifier,
    Bool,
    Number,
    CharConstant,
    Complex,
    String,
    RawString,
    /// `$` or `$name`
    Variable,
    /// `.name`
    Field,
    Dot,
    Nil,
    Declare,
    Assign,
    Pipe,
    LeftParen,
    RightParen,
    /// Any other printable ASCII character, e.g. `,`.
    Char,
    // Keywords
    Block,
    Break,
    Continue,
    Define,
    Else,
    End,
    If,
    Range,
    Template,
    With,
    Eof,
}

impl TokenKind {
    const fn is_keyword(self) -> bool {
        matches!(
            self,
            Self::Block
                | Self::Break
                | Self::Continue
                | Self::Define
                | Self::Else
                | Self::End
                | Self::If
                | Self::Range
                | Self::Template
                | Self::With
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Token<'a> {
    pub kind: TokenKind,
    pub val: &'a str,
    /// Byte offset of the token in the source.
    pub pos: usize,
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind == TokenKind::Eof {
            return f.write_str("EOF");
        }
        if self.kind.is_keyword() {
            return write!(f, "<{}>", self.val);
        }
        match self.val.char_indices().nth(10) {
            Some((cut, _)) => write!(f, "{:?}...", self.val.get(..cut).unwrap_or(self.val)),
            None => write!(f, "{:?}", self.val),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LexError {
    pub pos: usize,
    pub message: String,
}

/// Maps byte offsets to 1-based line and column numbers.
pub(crate) struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    pub(crate) fn new(input: &str) -> Self {
        let starts = std::iter::once(0)
            .chain(input.match_indices('\n').map(|(i, _)| i.saturating_add(1)))
            .collect();
        Self { starts }
    }

    pub(crate) fn location(&self, pos: usize) -> (usize, usize) {
        let line = self.starts.partition_point(|&start| start <= pos).max(1);
        let line_start = self
            .starts
            .get(line.saturating_sub(1))
            .copied()
            .unwrap_or_default();
        (line, pos.saturating_sub(line_start).saturating_add(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Text,
    InsideAction,
    Done,
}

type LexResult<T> = Result<T, LexError>;

pub(crate) struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    paren_depth: usize,
    tokens: Vec<Token<'a>>,
}

impl<'a> Lexer<'a> {
    pub(crate) const fn new(input: &'a str) -> Self {
        Lexer {
            input,
            pos: 0,
            paren_depth: 0,
            tokens: Vec::new(),
        }
    }

    /// Splits the whole input into tokens, ending with a single `Eof`.
    pub(crate) fn tokenize(mut self) -> LexResult<Vec<Token<'a>>> {
        let mut state = State::Text;
        while state != State::Done {
            state = match state {
                State::Text => self.lex_text()?,
                State::InsideAction => self.lex_inside_action()?,
                State::Done => State::Done,
            };
        }
        Ok(self.tokens)
    }

    fn rest(&self) -> &'a str {
        self.input.get(self.pos..).unwrap_or_default()
    }

    fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn next_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos = self.pos.saturating_add(c.len_utf8());
        Some(c)
    }

    fn accept(&mut self, valid: &str) -> bool {
        match self.peek_char() {
            Some(c) if valid.contains(c) => {
                self.pos = self.pos.saturating_add(c.len_utf8());
                true
            }
            Some(_) | None => false,
        }
    }

    fn accept_run(&mut self, valid: &str) {
        while self.accept(valid) {}
    }

    fn emit(&mut self, kind: TokenKind, start: usize) {
        let val = self.input.get(start..self.pos).unwrap_or_default();
        self.tokens.push(Token {
            kind,
            val,
            pos: start,
        });
    }

    fn error<T>(&self, pos: usize, message: impl Into<String>) -> LexResult<T> {
        Err(LexError {
            pos,
            message: message.into(),
        })
    }

    /// Reports whether the input is at a right delimiter, and whether that
    /// delimiter carries a trim marker.
    fn at_right_delim(&self) -> (bool, bool) {
        let rest = self.rest();
        if has_right_trim_marker(rest)
            && rest
                .get(TRIM_MARKER_LEN..)
                .is_some_and(|after| after.starts_with(RIGHT_DELIM))
        {
            return (true, true);
        }
        (rest.starts_with(RIGHT_DELIM), false)
    }

    fn at_terminator(&self) -> bool {
        match self.peek_char() {
            None | Some('.' | ',' | '|' | ':' | ')' | '(') => true,
            Some(c) if is_space(c) => true,
            Some(_) => self.rest().starts_with(RIGHT_DELIM),
        }
    }

    fn lex_text(&mut self) -> LexResult<State> {
        let rest = self.rest();
        let Some(x) = rest.find(LEFT_DELIM) else {
            if !rest.is_empty() {
                let start = self.pos;
                self.pos = self.input.len();
                self.emit(TokenKind::Text, start);
            }
            self.pos = self.input.len();
            self.emit(TokenKind::Eof, self.pos);
            return Ok(State::Done);
        };

        let mut text = rest.get(..x).unwrap_or_default();
        let after_delim = rest.get(x.saturating_add(LEFT_DELIM.len())..).unwrap_or_default();
        if has_left_trim_marker(after_delim) {
            text = text.trim_end_matches(SPACE_CHARS);
        }
        if !text.is_empty() {
            self.tokens.push(Token {
                kind: TokenKind::Text,
                val: text,
                pos: self.pos,
            });
        }
        self.pos = self.pos.saturating_add(x);
        self.lex_left_delim()
    }

    fn lex_left_delim(&mut self) -> LexResult<State> {
        let start = self.pos;
        self.pos = self.pos.saturating_add(LEFT_DELIM.len());
        let after_marker = if has_left_trim_marker(self.rest()) {
            TRIM_MARKER_LEN
        } else {
            0
        };
        let is_comment = self
            .rest()
            .get(after_marker..)
            .is_some_and(|s| s.starts_with(LEFT_COMMENT));
        self.pos = self.pos.saturating_add(after_marker);
        if is_comment {
            return self.lex_comment();
        }
        self.tokens.push(Token {
            kind: TokenKind::LeftDelim,
            val: LEFT_DELIM,
            pos: start,
        });
        self.paren_depth = 0;
        Ok(State::InsideAction)
    }

    fn lex_comment(&mut self) -> LexResult<State> {
        let start = self.pos;
        let body = self.rest().get(LEFT_COMMENT.len()..).unwrap_or_default();
        let Some(x) = body.find(RIGHT_COMMENT) else {
            return self.error(start, "unclosed comment");
        };
        self.pos = start
            .saturating_add(LEFT_COMMENT.len())
            .saturating_add(x)
            .saturating_add(RIGHT_COMMENT.len());
        let (delim, trim) = self.at_right_delim();
        if !delim {
            return self.error(self.pos, "comment ends before closing delimiter");
        }
        self.emit(TokenKind::Comment, start);
        self.skip_right_delim(trim);
        Ok(State::Text)
    }

    fn skip_right_delim(&mut self, trim: bool) {
        if trim {
            self.pos = self.pos.saturating_add(TRIM_MARKER_LEN);
        }
        self.pos = self.pos.saturating_add(RIGHT_DELIM.len());
        if trim {
            self.pos = self.pos.saturating_add(left_trim_length(self.rest()));
        }
    }

    fn lex_right_delim(&mut self, trim: bool) -> State {
        if trim {
            self.pos = self.pos.saturating_add(TRIM_MARKER_LEN);
        }
        let start = self.pos;
        self.pos = self.pos.saturating_add(RIGHT_DELIM.len());
        self.emit(TokenKind::RightDelim, start);
        if trim {
            self.pos = self.pos.saturating_add(left_trim_length(self.rest()));
        }
        State::Text
    }

    fn lex_inside_action(&mut self) -> LexResult<State> {
        let (delim, trim) = self.at_right_delim();
        if delim {
            if self.paren_depth == 0 {
                return Ok(self.lex_right_delim(trim));
            }
            return self.error(self.pos, "unclosed left paren");
        }

        let start = self.pos;
        let Some(c) = self.next_char() else {
            return self.error(start, "unclosed action");
        };
        match c {
            c if is_space(c) => {
                self.pos = start;
                self.lex_space();
            }
            '=' => self.emit(TokenKind::Assign, start),
            ':' => {
                if self.next_char() != Some('=') {
                    return self.error(start, "expected :=");
                }
                self.emit(TokenKind::Declare, start);
            }
            '|' => self.emit(TokenKind::Pipe, start),
            '"' => self.lex_quote(start)?,
            '`' => self.lex_raw_quote(start)?,
            '$' => self.lex_field_or_variable(start, TokenKind::Variable)?,
            '\'' => self.lex_char(start)?,
            '.' if self.peek_char().is_some_and(|r| !r.is_ascii_digit()) => {
                self.lex_field_or_variable(start, TokenKind::Field)?;
            }
            '.' | '+' | '-' | '0'..='9' => {
                self.pos = start;
                self.lex_number()?;
            }
            c if is_alphanumeric(c) => {
                self.pos = start;
                self.lex_identifier()?;
            }
            '(' => {
                self.emit(TokenKind::LeftParen, start);
                self.paren_depth = self.paren_depth.saturating_add(1);
            }
            ')' => {
                if self.paren_depth == 0 {
                    return self.error(start, "unexpected right paren");
                }
                self.emit(TokenKind::RightParen, start);
                self.paren_depth = self.paren_depth.saturating_sub(1);
            }
            c if c.is_ascii() && !c.is_ascii_control() => self.emit(TokenKind::Char, start),
            c => {
                return self.error(
                    start,
                    format!("unrecognized character in action: {:?}", c),
                );
            }
        }
        Ok(State::InsideAction)
    }

    fn lex_space(&mut self) {
        let start = self.pos;
        let mut num_spaces = 0usize;
        while self.peek_char().is_some_and(is_space) {
            self.pos = self.pos.saturating_add(1);
            num_spaces = num_spaces.saturating_add(1);
        }
        // A space followed by "-}}" belongs to the closing delimiter.
        let last_space = self.pos.saturating_sub(1);
        let tail = self.input.get(last_space..).unwrap_or_default();
        if has_right_trim_marker(tail)
            && tail
                .get(TRIM_MARKER_LEN..)
                .is_some_and(|after| after.starts_with(RIGHT_DELIM))
        {
            self.pos = last_space;
            if num_spaces == 1 {
                return;
            }
        }
        self.emit(TokenKind::Space, start);
    }

    fn lex_identifier(&mut self) -> LexResult<()> {
        let start = self.pos;
        while self.peek_char().is_some_and(is_alphanumeric) {
            self.next_char();
        }
        if !self.at_terminator() {
            return self.bad_character();
        }
        let word = self.input.get(start..self.pos).unwrap_or_default();
        let kind = match word {
            "block" => TokenKind::Block,
            "break" => TokenKind::Break,
            "continue" => TokenKind::Continue,
            "define" => TokenKind::Define,
            "else" => TokenKind::Else,
            "end" => TokenKind::End,
            "if" => TokenKind::If,
            "range" => TokenKind::Range,
            "nil" => TokenKind::Nil,
            "template" => TokenKind::Template,
            "with" => TokenKind::With,
            "true" | "false" => TokenKind::Bool,
            _ => TokenKind::Identifier,
        };
        self.emit(kind, start);
        Ok(())
    }

    /// Lexes a `$variable` or `.field`; the sigil at `start` is already
    /// consumed. A lone sigil is the `$` variable or the dot.
    fn lex_field_or_variable(&mut self, start: usize, kind: TokenKind) -> LexResult<()> {
        if self.at_terminator() {
            let kind = if kind == TokenKind::Variable {
                TokenKind::Variable
            } else {
                TokenKind::Dot
            };
            self.emit(kind, start);
            return Ok(());
        }
        while self.peek_char().is_some_and(is_alphanumeric) {
            self.next_char();
        }
        if !self.at_terminator() {
            return self.bad_character();
        }
        self.emit(kind, start);
        Ok(())
    }

    fn bad_character<T>(&self) -> LexResult<T> {
        let found = self.peek_char().unwrap_or(char::REPLACEMENT_CHARACTER);
        self.error(self.pos, format!("bad character {:?}", found))
    }

    fn lex_char(&mut self, start: usize) -> LexResult<()> {
        self.lex_escaped_until(start, '\'', "unterminated character constant")?;
        self.emit(TokenKind::CharConstant, start);
        Ok(())
    }

    fn lex_quote(&mut self, start: usize) -> LexResult<()> {
        self.lex_escaped_until(start, '"', "unterminated quoted string")?;
        self.emit(TokenKind::String, start);
        Ok(())
    }

    fn lex_escaped_until(&mut self, start: usize, closing: char, message: &str) -> LexResult<()> {
        loop {
            match self.next_char() {
                Some('\\') => match self.next_char() {
                    Some(c) if c != '\n' => {}
                    Some(_) | None => return self.error(start, message),
                },
                Some('\n') | None => return self.error(start, message),
                Some(c) if c == closing => return Ok(()),
                Some(_) => {}
            }
        }
    }

    fn lex_raw_quote(&mut self, start: usize) -> LexResult<()> {
        loop {
            match self.next_char() {
                Some('`') => break,
                Some(_) => {}
                None => return self.error(start, "unterminated raw quoted string"),
            }
        }
        self.emit(TokenKind::RawString, start);
        Ok(())
    }

    fn lex_number(&mut self) -> LexResult<()> {
        let start = self.pos;
        if !self.scan_number() {
            return self.bad_number(start);
        }
        if matches!(self.peek_char(), Some('+' | '-')) {
            // Complex: 1+2i
            if !self.scan_number() || !self.rest_before(start).ends_with('i') {
                return self.bad_number(start);
            }
            self.emit(TokenKind::Complex, start);
        } else {
            self.emit(TokenKind::Number, start);
        }
        Ok(())
    }

    fn rest_before(&self, start: usize) -> &'a str {
        self.input.get(start..self.pos).unwrap_or_default()
    }

    fn bad_number<T>(&self, start: usize) -> LexResult<T> {
        self.error(
            start,
            format!("bad number syntax: {:?}", self.rest_before(start)),
        )
    }

    fn scan_number(&mut self) -> bool {
        self.accept("+-");
        let mut digits = DECIMAL_DIGITS;
        if self.accept("0") {
            if self.accept("xX") {
                digits = HEX_DIGITS;
            } else if self.accept("oO") {
                digits = OCTAL_DIGITS;
            } else if self.accept("bB") {
                digits = BINARY_DIGITS;
            }
        }
        self.accept_run(digits);
        if self.accept(".") {
            self.accept_run(digits);
        }
        if digits == DECIMAL_DIGITS && self.accept("eE") {
            self.accept("+-");
            self.accept_run(DECIMAL_DIGITS);
        }
        if digits == HEX_DIGITS && self.accept("pP") {
            self.accept("+-");
            self.accept_run(DECIMAL_DIGITS);
        }
        self.accept("i");
        if self.peek_char().is_some_and(is_alphanumeric) {
            self.next_char();
            return false;
        }
        true
    }
}

fn is_space(c: char) -> bool {
    SPACE_CHARS.contains(&c)
}

fn is_alphanumeric(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

fn has_left_trim_marker(s: &str) -> bool {
    matches!(s.as_bytes(), [b'-', b' ' | b'\t' | b'\r' | b'\n', ..])
}

fn has_right_trim_marker(s: &str) -> bool {
    matches!(s.as_bytes(), [b' ' | b'\t' | b'\r' | b'\n', b'-', ..])
}

fn left_trim_length(s: &str) -> usize {
    s.len().saturating_sub(s.trim_start_matches(SPACE_CHARS).len())
}
