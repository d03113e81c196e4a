use std::borrow::Cow;

use crate::{
    ast::{Branch, Command, Node, Operand, Pipe},
    error::{ParseError, ParseErrorKind},
    escape::{unquote, unquote_bytes},
    interface::SourceParser,
    lexer::{LexError, Lexer, LineIndex, Token, TokenKind},
    number::check_number,
    template::TemplateSet,
};

type ParseResult<T> = Result<T, ParseError>;

/// `TemplateParser` parses template source text into a [`TemplateSet`].
///
/// Function names used in pipelines are never checked, since templates are
/// only ever transcoded and never executed.
///
/// # Example
///
/// ```rust
/// use tmplxml::{SourceParser, TemplateParser};
///
/// let set = TemplateParser::new()
///     .parse(r#"{{define "row"}}<tr>{{.}}</tr>{{end}}{{range .}}{{template "row" .}}{{end}}"#)
///     .unwrap();
/// assert_eq!(set.len(), 2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TemplateParser {
    keep_comments: bool,
}

impl TemplateParser {
    pub const fn new() -> Self {
        Self {
            keep_comments: false,
        }
    }

    /// Keep `{{/* comments */}}` in the tree as [`Node::Comment`] instead of
    /// dropping them.
    pub const fn keep_comments(mut self, keep: bool) -> Self {
        self.keep_comments = keep;
        self
    }
}

impl SourceParser for TemplateParser {
    fn parse_bytes(&self, source: &[u8]) -> Result<TemplateSet, ParseError> {
        let input = lexable(source);
        let lines = LineIndex::new(&input);
        let invalid_utf8 = || ParseErrorKind::Lexical {
            message: "invalid UTF-8 encoding".to_string(),
        };

        let mut tokens = Lexer::new(&input)
            .tokenize()
            .map_err(|LexError { pos, message }| {
                let kind = if is_invalid_at(source, &input, pos) {
                    invalid_utf8()
                } else {
                    ParseErrorKind::Lexical { message }
                };
                make_error(&lines, pos, kind)
            })?;
        // Only literal text and comments may carry bytes that are not UTF-8.
        if let Some(token) = tokens.iter().find(|token| {
            !matches!(token.kind, TokenKind::Text | TokenKind::Comment)
                && std::str::from_utf8(original(source, token)).is_err()
        }) {
            return Err(make_error(&lines, token.pos, invalid_utf8()));
        }
        if !self.keep_comments {
            tokens.retain(|token| token.kind != TokenKind::Comment);
        }
        let set = Parser::new(source, &input, tokens, &lines).parse_root()?;
        log::debug!("parsed {} template(s)", set.len());
        Ok(set)
    }
}

/// Stands in a NUL for every byte of an invalid UTF-8 sequence, so byte
/// offsets into the result are offsets into `source`.
fn lexable(source: &[u8]) -> Cow<'_, str> {
    if let Ok(text) = std::str::from_utf8(source) {
        return Cow::Borrowed(text);
    }
    let mut text = String::with_capacity(source.len());
    for chunk in source.utf8_chunks() {
        text.push_str(chunk.valid());
        text.extend(std::iter::repeat_n('\0', chunk.invalid().len()));
    }
    Cow::Owned(text)
}

/// The source bytes `token` was lexed from.
fn original<'s>(source: &'s [u8], token: &Token<'_>) -> &'s [u8] {
    let end = token.pos.saturating_add(token.val.len());
    source.get(token.pos..end).unwrap_or_default()
}

fn is_invalid_at(source: &[u8], input: &str, pos: usize) -> bool {
    input.as_bytes().get(pos) == Some(&0) && source.get(pos) != Some(&0)
}

/// Parses `source` with the default [`TemplateParser`].
///
/// # Errors
/// - If `source` does not follow the template grammar.
pub fn parse(source: &str) -> Result<TemplateSet, ParseError> {
    TemplateParser::new().parse(source)
}

/// Parses raw `source` bytes with the default [`TemplateParser`].
///
/// # Errors
/// - If `source` does not follow the template grammar, or holds bytes that
///   are not UTF-8 anywhere but literal text.
pub fn parse_bytes(source: &[u8]) -> Result<TemplateSet, ParseError> {
    TemplateParser::new().parse_bytes(source)
}

fn make_error(lines: &LineIndex, pos: usize, kind: ParseErrorKind) -> ParseError {
    let (line, column) = lines.location(pos);
    ParseError { line, column, kind }
}

/// What ended a list of nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminator {
    End(usize),
    Else(usize),
}

enum Item {
    Node(Node),
    Stop(Terminator),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    If,
    Range,
    With,
}

impl Control {
    const fn context(self) -> &'static str {
        match self {
            Self::If => "if",
            Self::Range => "range",
            Self::With => "with",
        }
    }
}

struct Parser<'a, 'l> {
    /// Raw source, from which text tokens take their bytes.
    source: &'a [u8],
    tokens: Vec<Token<'a>>,
    /// Index of the next token to hand out.
    pos: usize,
    eof: Token<'a>,
    lines: &'l LineIndex,
    /// Variables in scope for the tree being parsed.
    vars: Vec<String>,
    range_depth: usize,
    set: TemplateSet,
}

impl<'a, 'l> Parser<'a, 'l> {
    fn new(source: &'a [u8], input: &'a str, tokens: Vec<Token<'a>>, lines: &'l LineIndex) -> Self {
        Parser {
            source,
            tokens,
            pos: 0,
            eof: Token {
                kind: TokenKind::Eof,
                val: "",
                pos: input.len(),
            },
            lines,
            vars: vec!["$".to_string()],
            range_depth: 0,
            set: TemplateSet::empty(),
        }
    }

    fn make_error(&self, pos: usize, kind: ParseErrorKind) -> ParseError {
        make_error(self.lines, pos, kind)
    }

    fn unexpected(&self, token: Token<'_>, context: &str) -> ParseError {
        self.make_error(
            token.pos,
            ParseErrorKind::UnexpectedToken {
                context: context.to_string(),
                found: token.to_string(),
            },
        )
    }

    // --- Token stream ---

    fn next(&mut self) -> Token<'a> {
        match self.tokens.get(self.pos) {
            Some(token) => {
                self.pos = self.pos.saturating_add(1);
                *token
            }
            None => self.eof,
        }
    }

    fn backup(&mut self) {
        self.pos = self.pos.saturating_sub(1);
    }

    fn peek(&self) -> Token<'a> {
        self.tokens.get(self.pos).copied().unwrap_or(self.eof)
    }

    fn next_non_space(&mut self) -> Token<'a> {
        loop {
            let token = self.next();
            if token.kind != TokenKind::Space {
                return token;
            }
        }
    }

    /// Skips spaces, then returns the next token without consuming it.
    fn peek_non_space(&mut self) -> Token<'a> {
        while self.peek().kind == TokenKind::Space {
            self.next();
        }
        self.peek()
    }

    fn expect(&mut self, kind: TokenKind, context: &str) -> ParseResult<Token<'a>> {
        let token = self.next_non_space();
        if token.kind != kind {
            return Err(self.unexpected(token, context));
        }
        Ok(token)
    }

    /// Starts a fresh tree (a `define` or `block` body) with its own scope.
    fn enter_tree(&mut self) -> (Vec<String>, usize) {
        (
            std::mem::replace(&mut self.vars, vec!["$".to_string()]),
            std::mem::take(&mut self.range_depth),
        )
    }

    fn leave_tree(&mut self, saved: (Vec<String>, usize)) {
        (self.vars, self.range_depth) = saved;
    }

    // --- Trees ---

    fn parse_root(mut self) -> ParseResult<TemplateSet> {
        let mut root = Vec::new();
        while self.peek().kind != TokenKind::Eof {
            if self.peek().kind == TokenKind::LeftDelim {
                let delim_index = self.pos;
                self.next();
                if self.next_non_space().kind == TokenKind::Define {
                    self.parse_definition()?;
                    continue;
                }
                self.pos = delim_index;
            }
            match self.text_or_action()? {
                Item::Node(node) => root.push(node),
                Item::Stop(Terminator::End(pos)) => {
                    return Err(self.make_error(
                        pos,
                        ParseErrorKind::Message("unexpected {{end}}".to_string()),
                    ));
                }
                Item::Stop(Terminator::Else(pos)) => {
                    return Err(self.make_error(
                        pos,
                        ParseErrorKind::Message("unexpected {{else}}".to_string()),
                    ));
                }
            }
        }
        let eof = self.eof.pos;
        self.set
            .define("", Node::List(root))
            .map_err(|kind| make_error(self.lines, eof, kind))?;
        Ok(self.set)
    }

    /// Parses `{{define "name"}} list {{end}}`; the `define` keyword has
    /// been consumed.
    fn parse_definition(&mut self) -> ParseResult<()> {
        const CONTEXT: &str = "define clause";
        let token = self.next_non_space();
        let name = self.parse_template_name(token, CONTEXT)?;
        self.expect(TokenKind::RightDelim, CONTEXT)?;

        let saved = self.enter_tree();
        let body = self.item_list();
        self.leave_tree(saved);
        let (list, end) = body?;
        if let Terminator::Else(pos) = end {
            return Err(self.make_error(
                pos,
                ParseErrorKind::UnexpectedToken {
                    context: CONTEXT.to_string(),
                    found: "{{else}}".to_string(),
                },
            ));
        }
        log::trace!("defined template {:?}", name);
        self.set
            .define(name, Node::List(list))
            .map_err(|kind| self.make_error(token.pos, kind))
    }

    /// Parses nodes until an `{{end}}` or `{{else}}`.
    fn item_list(&mut self) -> ParseResult<(Vec<Node>, Terminator)> {
        let mut list = Vec::new();
        while self.peek_non_space().kind != TokenKind::Eof {
            match self.text_or_action()? {
                Item::Node(node) => list.push(node),
                Item::Stop(terminator) => return Ok((list, terminator)),
            }
        }
        Err(self.make_error(self.eof.pos, ParseErrorKind::unexpected_eof(Some("{{end}}"))))
    }

    fn text_or_action(&mut self) -> ParseResult<Item> {
        let token = self.next_non_space();
        match token.kind {
            TokenKind::Text => Ok(Item::Node(Node::Text(original(self.source, &token).to_vec()))),
            TokenKind::LeftDelim => self.action(),
            TokenKind::Comment => {
                let comment = String::from_utf8_lossy(original(self.source, &token));
                Ok(Item::Node(Node::Comment(comment.into_owned())))
            }
            _ => Err(self.unexpected(token, "input")),
        }
    }

    // --- Actions ---

    /// Parses the inside of `{{ ... }}`; the left delimiter has been consumed.
    fn action(&mut self) -> ParseResult<Item> {
        let token = self.next_non_space();
        match token.kind {
            TokenKind::Block => return self.block_control().map(Item::Node),
            TokenKind::Break => return self.loop_control(token, Node::Break),
            TokenKind::Continue => return self.loop_control(token, Node::Continue),
            TokenKind::Else => return self.else_control(),
            TokenKind::End => return self.end_control(),
            TokenKind::If => return self.parse_control(Control::If).map(Item::Node),
            TokenKind::Range => return self.parse_control(Control::Range).map(Item::Node),
            TokenKind::Template => return self.template_control().map(Item::Node),
            TokenKind::With => return self.parse_control(Control::With).map(Item::Node),
            _ => {}
        }
        self.backup();
        // Variables declared here stay in scope until the enclosing {{end}}.
        let pipe = self.pipeline("command", TokenKind::RightDelim)?;
        Ok(Item::Node(Node::Action(pipe)))
    }

    /// `{{break}}` and `{{continue}}`.
    fn loop_control(&mut self, token: Token<'a>, node: Node) -> ParseResult<Item> {
        let context = format!("{{{{{}}}}}", token.val);
        let next = self.next_non_space();
        if next.kind != TokenKind::RightDelim {
            return Err(self.unexpected(next, &context));
        }
        if self.range_depth == 0 {
            return Err(self.make_error(
                token.pos,
                ParseErrorKind::Message(format!("{} outside {{{{range}}}}", context)),
            ));
        }
        Ok(Item::Node(node))
    }

    fn else_control(&mut self) -> ParseResult<Item> {
        // "{{else if ..." and "{{else with ..." are read as "{{else}}{{if ...".
        let peek = self.peek_non_space();
        if matches!(peek.kind, TokenKind::If | TokenKind::With) {
            return Ok(Item::Stop(Terminator::Else(peek.pos)));
        }
        let token = self.expect(TokenKind::RightDelim, "else")?;
        Ok(Item::Stop(Terminator::Else(token.pos)))
    }

    fn end_control(&mut self) -> ParseResult<Item> {
        let token = self.expect(TokenKind::RightDelim, "end")?;
        Ok(Item::Stop(Terminator::End(token.pos)))
    }

    fn parse_control(&mut self, control: Control) -> ParseResult<Node> {
        let vars_in_scope = self.vars.len();
        let branch = self.parse_branch(control);
        self.vars.truncate(vars_in_scope);
        let branch = branch?;
        Ok(match control {
            Control::If => Node::If(branch),
            Control::Range => Node::Range(branch),
            Control::With => Node::With(branch),
        })
    }

    fn parse_branch(&mut self, control: Control) -> ParseResult<Branch> {
        let pipe = self.pipeline(control.context(), TokenKind::RightDelim)?;

        if control == Control::Range {
            self.range_depth = self.range_depth.saturating_add(1);
        }
        let body = self.item_list();
        if control == Control::Range {
            self.range_depth = self.range_depth.saturating_sub(1);
        }
        let (list, next) = body?;

        let else_list = match next {
            Terminator::End(_) => None,
            Terminator::Else(_) => {
                let chained = match (control, self.peek().kind) {
                    (Control::If, TokenKind::If) => Some(Control::If),
                    (Control::With, TokenKind::With) => Some(Control::With),
                    _ => None,
                };
                match chained {
                    // The chained control consumes the single {{end}}.
                    Some(chained) => {
                        self.next();
                        Some(vec![self.parse_control(chained)?])
                    }
                    None => {
                        let (else_list, next) = self.item_list()?;
                        if let Terminator::Else(pos) = next {
                            return Err(self.make_error(
                                pos,
                                ParseErrorKind::Message(
                                    "expected end; found {{else}}".to_string(),
                                ),
                            ));
                        }
                        Some(else_list)
                    }
                }
            }
        };

        Ok(Branch {
            pipe,
            list,
            else_list,
        })
    }

    fn template_control(&mut self) -> ParseResult<Node> {
        const CONTEXT: &str = "template clause";
        let token = self.next_non_space();
        let name = self.parse_template_name(token, CONTEXT)?;
        let pipe = if self.next_non_space().kind == TokenKind::RightDelim {
            None
        } else {
            self.backup();
            Some(self.pipeline(CONTEXT, TokenKind::RightDelim)?)
        };
        Ok(Node::Template { name, pipe })
    }

    /// `{{block "name" pipeline}} list {{end}}` defines `name` and invokes it
    /// in place.
    fn block_control(&mut self) -> ParseResult<Node> {
        const CONTEXT: &str = "block clause";
        let token = self.next_non_space();
        let name = self.parse_template_name(token, CONTEXT)?;
        let pipe = self.pipeline(CONTEXT, TokenKind::RightDelim)?;

        let saved = self.enter_tree();
        let body = self.item_list();
        self.leave_tree(saved);
        let (list, end) = body?;
        if let Terminator::Else(pos) = end {
            return Err(self.make_error(
                pos,
                ParseErrorKind::UnexpectedToken {
                    context: CONTEXT.to_string(),
                    found: "{{else}}".to_string(),
                },
            ));
        }
        self.set
            .define(name.clone(), Node::List(list))
            .map_err(|kind| self.make_error(token.pos, kind))?;
        Ok(Node::Template {
            name,
            pipe: Some(pipe),
        })
    }

    fn parse_template_name(&self, token: Token<'a>, context: &str) -> ParseResult<String> {
        match token.kind {
            TokenKind::String | TokenKind::RawString => {
                unquote(token.val).map_err(|kind| self.make_error(token.pos, kind))
            }
            _ => Err(self.unexpected(token, context)),
        }
    }

    // --- Pipelines ---

    fn pipeline(&mut self, context: &str, end: TokenKind) -> ParseResult<Pipe> {
        let start = self.peek_non_space();
        let mut pipe = Pipe::default();

        // Declarations or assignments.
        loop {
            let variable = self.peek_non_space();
            if variable.kind != TokenKind::Variable {
                break;
            }
            let variable_index = self.pos;
            self.next();
            let next = self.peek_non_space();
            match next.kind {
                TokenKind::Assign | TokenKind::Declare => {
                    pipe.is_assign = next.kind == TokenKind::Assign;
                    self.next_non_space();
                    pipe.decl.push(variable.val.to_string());
                    self.vars.push(variable.val.to_string());
                }
                TokenKind::Char if next.val == "," => {
                    self.next_non_space();
                    pipe.decl.push(variable.val.to_string());
                    self.vars.push(variable.val.to_string());
                    if context == "range" && pipe.decl.len() < 2 {
                        match self.peek_non_space().kind {
                            TokenKind::Variable | TokenKind::RightDelim | TokenKind::RightParen => {
                                continue;
                            }
                            _ => {
                                return Err(self.make_error(
                                    next.pos,
                                    ParseErrorKind::Message(
                                        "range can only initialize variables".to_string(),
                                    ),
                                ));
                            }
                        }
                    }
                    return Err(self.make_error(
                        next.pos,
                        ParseErrorKind::Message(format!("too many declarations in {}", context)),
                    ));
                }
                _ => self.pos = variable_index,
            }
            break;
        }

        loop {
            let token = self.next_non_space();
            if token.kind == end {
                self.check_pipeline(&pipe, context, start.pos)?;
                return Ok(pipe);
            }
            match token.kind {
                TokenKind::Bool
                | TokenKind::CharConstant
                | TokenKind::Complex
                | TokenKind::Dot
                | TokenKind::Field
                | TokenKind::Identifier
                | TokenKind::Number
                | TokenKind::Nil
                | TokenKind::RawString
                | TokenKind::String
                | TokenKind::Variable
                | TokenKind::LeftParen => {
                    self.backup();
                    pipe.cmds.push(self.command()?);
                }
                _ => return Err(self.unexpected(token, context)),
            }
        }
    }

    fn check_pipeline(&self, pipe: &Pipe, context: &str, pos: usize) -> ParseResult<()> {
        if pipe.cmds.is_empty() {
            return Err(self.make_error(
                pos,
                ParseErrorKind::MissingValue {
                    context: context.to_string(),
                },
            ));
        }
        // Only the first stage may be a constant.
        for (stage, cmd) in pipe.cmds.iter().enumerate().skip(1) {
            if matches!(
                cmd.args.first(),
                Some(
                    Operand::Bool(_)
                        | Operand::Dot
                        | Operand::Nil
                        | Operand::Number(_)
                        | Operand::String(_)
                )
            ) {
                return Err(self.make_error(
                    pos,
                    ParseErrorKind::NonExecutableCommand {
                        stage: stage.saturating_add(1),
                    },
                ));
            }
        }
        Ok(())
    }

    fn command(&mut self) -> ParseResult<Command> {
        let start = self.peek_non_space();
        let mut cmd = Command::default();
        loop {
            self.peek_non_space();
            if let Some(operand) = self.operand()? {
                cmd.args.push(operand);
            }
            let token = self.next();
            match token.kind {
                TokenKind::Space => continue,
                TokenKind::RightDelim | TokenKind::RightParen => self.backup(),
                TokenKind::Pipe => {}
                _ => return Err(self.unexpected(token, "operand")),
            }
            break;
        }
        if cmd.args.is_empty() {
            return Err(self.make_error(
                start.pos,
                ParseErrorKind::Message("empty command".to_string()),
            ));
        }
        Ok(cmd)
    }

    /// A term optionally followed by field accesses.
    fn operand(&mut self) -> ParseResult<Option<Operand>> {
        let start = self.peek_non_space();
        let Some(node) = self.term()? else {
            return Ok(None);
        };
        if self.peek().kind != TokenKind::Field {
            return Ok(Some(node));
        }

        let mut fields = Vec::new();
        while self.peek().kind == TokenKind::Field {
            let field = self.next();
            fields.push(field.val.trim_start_matches('.').to_string());
        }
        let operand = match node {
            Operand::Field(mut idents) => {
                idents.extend(fields);
                Operand::Field(idents)
            }
            Operand::Variable(mut idents) => {
                idents.extend(fields);
                Operand::Variable(idents)
            }
            term @ (Operand::Bool(_)
            | Operand::String(_)
            | Operand::Number(_)
            | Operand::Nil
            | Operand::Dot) => {
                return Err(self.make_error(
                    start.pos,
                    ParseErrorKind::Message(format!("unexpected . after term \"{}\"", term)),
                ));
            }
            other @ (Operand::Identifier(_) | Operand::Chain { .. } | Operand::Pipe(_)) => {
                Operand::Chain {
                    node: Box::new(other),
                    fields,
                }
            }
        };
        Ok(Some(operand))
    }

    fn term(&mut self) -> ParseResult<Option<Operand>> {
        let token = self.next_non_space();
        let operand = match token.kind {
            TokenKind::Identifier => Operand::Identifier(token.val.to_string()),
            TokenKind::Dot => Operand::Dot,
            TokenKind::Nil => Operand::Nil,
            TokenKind::Variable => self.use_var(token)?,
            TokenKind::Field => Operand::Field(vec![token.val.trim_start_matches('.').to_string()]),
            TokenKind::Bool => Operand::Bool(token.val == "true"),
            TokenKind::CharConstant | TokenKind::Complex | TokenKind::Number => {
                self.number(token)?
            }
            TokenKind::LeftParen => {
                let pipe = self.pipeline("parenthesized pipeline", TokenKind::RightParen)?;
                Operand::Pipe(Box::new(pipe))
            }
            TokenKind::String | TokenKind::RawString => {
                unquote_bytes(token.val).map_err(|kind| self.make_error(token.pos, kind))?;
                Operand::String(token.val.to_string())
            }
            _ => {
                self.backup();
                return Ok(None);
            }
        };
        Ok(Some(operand))
    }

    fn number(&self, token: Token<'a>) -> ParseResult<Operand> {
        match token.kind {
            TokenKind::CharConstant => {
                unquote(token.val).map_err(|_| {
                    self.make_error(
                        token.pos,
                        ParseErrorKind::Message(format!("malformed character constant: {}", token.val)),
                    )
                })?;
            }
            kind => check_number(token.val, kind == TokenKind::Complex)
                .map_err(|kind| self.make_error(token.pos, kind))?,
        }
        Ok(Operand::Number(token.val.to_string()))
    }

    fn use_var(&self, token: Token<'a>) -> ParseResult<Operand> {
        if !self.vars.iter().any(|var| var == token.val) {
            return Err(self.make_error(
                token.pos,
                ParseErrorKind::UndefinedVariable {
                    name: token.val.to_string(),
                },
            ));
        }
        Ok(Operand::Variable(vec![token.val.to_string()]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Helper macros for quick tree creation in tests
    macro_rules! text {
        ($data:expr) => {
            Node::Text($data.as_bytes().to_vec())
        };
    }
    macro_rules! field {
        ($($name:expr),+) => {
            Operand::Field(vec![$($name.to_string()),+])
        };
    }
    macro_rules! pipe {
        ($($arg:expr),+) => {
            Pipe {
                cmds: vec![Command { args: vec![$($arg),+] }],
                ..Pipe::default()
            }
        };
    }

    fn root(source: &str) -> Vec<Node> {
        match parse(source).unwrap().root() {
            Some(Node::List(nodes)) => nodes.clone(),
            other => panic!("unexpected root {other:?}"),
        }
    }

    fn action_string(source: &str) -> String {
        match root(source).as_slice() {
            [Node::Action(pipe)] => pipe.to_string(),
            other => panic!("expected a single action, got {other:?}"),
        }
    }

    fn error_kind(source: &str) -> ParseErrorKind {
        parse(source).unwrap_err().kind
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_empty_input() {
        assert_eq!(root(""), vec![]);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_text_and_action() {
        assert_eq!(
            root("Hello {{.Name}}"),
            vec![text!("Hello "), Node::Action(pipe!(field!("Name")))]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_trim_markers() {
        assert_eq!(
            root("a  \n{{- .X -}}\t b"),
            vec![text!("a"), Node::Action(pipe!(field!("X"))), text!("b")]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_comments_dropped_by_default() {
        assert_eq!(root("a {{- /* note */ -}} b"), vec![text!("a"), text!("b")]);

        let set = TemplateParser::new()
            .keep_comments(true)
            .parse("a{{/* note */}}b")
            .unwrap();
        assert_eq!(
            set.root(),
            Some(&Node::List(vec![
                text!("a"),
                Node::Comment("/* note */".to_string()),
                text!("b"),
            ]))
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_if_else_if_chain() {
        assert_eq!(
            root("{{if .A}}a{{else if .B}}b{{else}}c{{end}}"),
            vec![Node::If(Branch {
                pipe: pipe!(field!("A")),
                list: vec![text!("a")],
                else_list: Some(vec![Node::If(Branch {
                    pipe: pipe!(field!("B")),
                    list: vec![text!("b")],
                    else_list: Some(vec![text!("c")]),
                })]),
            })]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_if_without_else() {
        assert_eq!(
            root("{{if .A}}{{end}}"),
            vec![Node::If(Branch {
                pipe: pipe!(field!("A")),
                list: vec![],
                else_list: None,
            })]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_range_with_declarations_and_else() {
        assert_eq!(
            root("{{range $i, $e := .Items}}{{$i}}{{else}}none{{end}}"),
            vec![Node::Range(Branch {
                pipe: Pipe {
                    decl: vec!["$i".to_string(), "$e".to_string()],
                    is_assign: false,
                    cmds: vec![Command {
                        args: vec![field!("Items")],
                    }],
                },
                list: vec![Node::Action(pipe!(Operand::Variable(vec![
                    "$i".to_string()
                ])))],
                else_list: Some(vec![text!("none")]),
            })]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_with_else_with_chain() {
        assert_eq!(
            root("{{with .A}}{{.}}{{else with .B}}b{{end}}"),
            vec![Node::With(Branch {
                pipe: pipe!(field!("A")),
                list: vec![Node::Action(pipe!(Operand::Dot))],
                else_list: Some(vec![Node::With(Branch {
                    pipe: pipe!(field!("B")),
                    list: vec![text!("b")],
                    else_list: None,
                })]),
            })]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_define_template_and_block() {
        let set = parse(r#"{{define "x"}}X{{end}}{{template "x" .}}{{block "y" .}}Y{{end}}"#)
            .unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(
            set.root(),
            Some(&Node::List(vec![
                Node::Template {
                    name: "x".to_string(),
                    pipe: Some(pipe!(Operand::Dot)),
                },
                Node::Template {
                    name: "y".to_string(),
                    pipe: Some(pipe!(Operand::Dot)),
                },
            ]))
        );
        assert_eq!(set.get("x"), Some(&Node::List(vec![text!("X")])));
        assert_eq!(set.get("y"), Some(&Node::List(vec![text!("Y")])));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_template_without_pipeline() {
        assert_eq!(
            root("{{template `raw name`}}"),
            vec![Node::Template {
                name: "raw name".to_string(),
                pipe: None,
            }]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_pipe_stringification() {
        assert_eq!(
            action_string(r#"{{printf "%d" (len .X) | html}}"#),
            r#"printf "%d" (len .X) | html"#
        );
        assert_eq!(action_string("{{ $.Site.Title }}"), "$.Site.Title");
        assert_eq!(action_string("{{(index . 0).Name}}"), "(index . 0).Name");
        assert_eq!(action_string("{{.A.B   .C}}"), ".A.B .C");
        assert_eq!(action_string("{{eq 'a' 0x1F 1e3 true nil}}"), "eq 'a' 0x1F 1e3 true nil");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_declare_then_assign() {
        let nodes = root("{{$x := 1}}{{$x = 2}}{{$x}}");
        let rendered: Vec<_> = nodes
            .iter()
            .map(|node| match node {
                Node::Action(pipe) => pipe.to_string(),
                other => panic!("unexpected node {other:?}"),
            })
            .collect();
        assert_eq!(rendered, vec!["$x := 1", "$x = 2", "$x"]);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_break_and_continue_inside_range() {
        assert_eq!(
            root("{{range .}}{{break}}{{continue}}{{end}}"),
            vec![Node::Range(Branch {
                pipe: pipe!(Operand::Dot),
                list: vec![Node::Break, Node::Continue],
                else_list: None,
            })]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_break_outside_range() {
        assert_eq!(
            error_kind("{{break}}"),
            ParseErrorKind::Message("{{break}} outside {{range}}".to_string())
        );
        // A block body starts a new scope.
        assert_eq!(
            error_kind(r#"{{range .}}{{block "b" .}}{{continue}}{{end}}{{end}}"#),
            ParseErrorKind::Message("{{continue}} outside {{range}}".to_string())
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_undefined_variable() {
        assert_eq!(
            error_kind("{{$x}}"),
            ParseErrorKind::UndefinedVariable {
                name: "$x".to_string()
            }
        );
        // Control variables go out of scope at {{end}}.
        assert_eq!(
            error_kind("{{range $i := .}}{{end}}{{$i}}"),
            ParseErrorKind::UndefinedVariable {
                name: "$i".to_string()
            }
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_multiple_definition() {
        assert_eq!(
            error_kind(r#"{{define "a"}}1{{end}}{{define "a"}}2{{end}}"#),
            ParseErrorKind::MultipleDefinition {
                name: "a".to_string()
            }
        );

        let set = parse(r#"{{define "a"}}1{{end}}{{define "a"}}  {{end}}"#).unwrap();
        assert_eq!(set.get("a"), Some(&Node::List(vec![text!("1")])));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_define_only_at_top_level() {
        assert_eq!(
            error_kind(r#"{{if .}}{{define "x"}}{{end}}{{end}}"#),
            ParseErrorKind::UnexpectedToken {
                context: "command".to_string(),
                found: "<define>".to_string(),
            }
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_missing_value() {
        assert_eq!(
            error_kind("{{if}}{{end}}"),
            ParseErrorKind::MissingValue {
                context: "if".to_string()
            }
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_non_executable_command() {
        assert_eq!(
            error_kind(r#"{{.X | "s"}}"#),
            ParseErrorKind::NonExecutableCommand { stage: 2 }
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_unclosed_action() {
        let err = parse("{{.X").unwrap_err();
        assert_eq!(
            err.kind,
            ParseErrorKind::Lexical {
                message: "unclosed action".to_string()
            }
        );
        assert_eq!((err.line, err.column), (1, 5));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_unclosed_control() {
        assert_eq!(
            error_kind("{{if .X}}abc"),
            ParseErrorKind::unexpected_eof(Some("{{end}}"))
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_stray_end() {
        assert_eq!(
            error_kind("a{{end}}"),
            ParseErrorKind::Message("unexpected {{end}}".to_string())
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_error_location() {
        let err = parse("line one\n{{.X | 1}}").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::NonExecutableCommand { stage: 2 });
        assert_eq!((err.line, err.column), (2, 3));
        assert_eq!(
            err.to_string(),
            "Parse error at line 2, column 3: non executable command in pipeline stage 2"
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_number_constants() {
        assert_eq!(
            action_string("{{print 017 0o17 0b101 1_000 .5 0x1p-2 2i 1+2i -2}}"),
            "print 017 0o17 0b101 1_000 .5 0x1p-2 2i 1+2i -2"
        );
        for source in ["{{print 0x}}", "{{print 1e}}", "{{print 1_}}", "{{print 08}}"] {
            assert!(
                matches!(error_kind(source), ParseErrorKind::Message(_)),
                "{source:?} should be rejected"
            );
        }
        assert_eq!(
            error_kind("{{print 99999999999999999999999}}"),
            ParseErrorKind::Message("integer overflow: \"99999999999999999999999\"".to_string())
        );
        assert_eq!(
            error_kind("{{print 'ab'}}"),
            ParseErrorKind::Message("malformed character constant: 'ab'".to_string())
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_text_keeps_invalid_utf8() {
        let set = parse_bytes(b"caf\xe9 {{.X}}\xff").unwrap();
        match set.root() {
            Some(Node::List(nodes)) => assert_eq!(
                nodes.as_slice(),
                [
                    Node::Text(b"caf\xe9 ".to_vec()),
                    Node::Action(pipe!(field!("X"))),
                    Node::Text(b"\xff".to_vec()),
                ]
            ),
            other => panic!("unexpected root {other:?}"),
        }
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_invalid_utf8_inside_actions() {
        let invalid = ParseErrorKind::Lexical {
            message: "invalid UTF-8 encoding".to_string(),
        };
        let err = parse_bytes(b"ok\n{{\"a\xffb\"}}").unwrap_err();
        assert_eq!(err.kind, invalid);
        assert_eq!((err.line, err.column), (2, 3));
        assert_eq!(parse_bytes(b"{{.X \xff}}").unwrap_err().kind, invalid);
        assert!(parse_bytes(b"{{/* \xff */}}").is_ok());
        assert_eq!(
            parse_bytes(b"{{\"\\xff\"}}").map(|set| set.len()),
            Ok(1),
            "an escaped byte is fine"
        );
    }
}
