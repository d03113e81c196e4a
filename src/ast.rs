use std::fmt;

/// A node of a parsed template tree.
///
/// The set of variants mirrors what the template grammar can produce. Only a
/// subset of them can be transcoded; see [`crate::convert_node`] for which.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// An ordered sequence of nodes. Lists flatten into their parent when
    /// converted, they never produce an element of their own.
    List(Vec<Node>),
    /// Literal text copied byte for byte from the template, trim markers
    /// already applied. It need not be valid UTF-8.
    Text(Vec<u8>),
    /// `{{pipeline}}`
    Action(Pipe),
    /// `{{if pipeline}} list {{else}} list {{end}}`
    If(Branch),
    /// `{{range pipeline}} list {{else}} list {{end}}`
    Range(Branch),
    /// `{{with pipeline}} list {{else}} list {{end}}`
    With(Branch),
    /// `{{template "name" pipeline}}`, also produced by `{{block}}`.
    Template { name: String, pipe: Option<Pipe> },
    /// `{{break}}`
    Break,
    /// `{{continue}}`
    Continue,
    /// `{{/* comment */}}`, only retained when the parser is asked to keep
    /// comments.
    Comment(String),
}

impl Node {
    /// Short lowercase name of the node kind, used in diagnostics.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::List(_) => "list",
            Self::Text(_) => "text",
            Self::Action(_) => "action",
            Self::If(_) => "if",
            Self::Range(_) => "range",
            Self::With(_) => "with",
            Self::Template { .. } => "template",
            Self::Break => "break",
            Self::Continue => "continue",
            Self::Comment(_) => "comment",
        }
    }

    /// Whether the node carries no content besides whitespace.
    ///
    /// An empty definition may be silently replaced by a later definition of
    /// the same name.
    pub fn is_empty_tree(&self) -> bool {
        match self {
            Self::List(nodes) => nodes.iter().all(Self::is_empty_tree),
            Self::Text(text) => String::from_utf8_lossy(text).trim().is_empty(),
            Self::Comment(_) => true,
            Self::Action(_)
            | Self::If(_)
            | Self::Range(_)
            | Self::With(_)
            | Self::Template { .. }
            | Self::Break
            | Self::Continue => false,
        }
    }
}

/// The shared shape of `if`, `range` and `with`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    pub pipe: Pipe,
    /// Body, or the "then" branch of an `if`. Always present, possibly empty.
    pub list: Vec<Node>,
    /// Present iff the source had an `{{else}}` clause.
    pub else_list: Option<Vec<Node>>,
}

/// A pipeline, optionally preceded by variable declarations.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Pipe {
    /// Declared or assigned variables, including the leading `$`.
    pub decl: Vec<String>,
    /// `$x = ...` rather than `$x := ...`.
    pub is_assign: bool,
    pub cmds: Vec<Command>,
}

/// One stage of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Command {
    pub args: Vec<Operand>,
}

/// An argument of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// A function name. Never resolved.
    Identifier(String),
    Dot,
    Nil,
    Bool(bool),
    /// Any numeric or character constant, kept exactly as written.
    Number(String),
    /// A string literal, kept with its original quoting.
    String(String),
    /// `$x.Field.Other`; the first element includes the `$`.
    Variable(Vec<String>),
    /// `.Field.Other`, without the leading dots.
    Field(Vec<String>),
    /// A term followed by field accesses, e.g. `(pipe).Field`.
    Chain { node: Box<Operand>, fields: Vec<String> },
    /// A parenthesised pipeline.
    Pipe(Box<Pipe>),
}

impl fmt::Display for Pipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.decl.is_empty() {
            write!(f, "{}", self.decl.join(", "))?;
            f.write_str(if self.is_assign { " = " } else { " := " })?;
        }
        for (i, cmd) in self.cmds.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{cmd}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            match arg {
                Operand::Pipe(pipe) => write!(f, "({pipe})")?,
                other => write!(f, "{other}")?,
            }
        }
        Ok(())
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identifier(name) => f.write_str(name),
            Self::Dot => f.write_str("."),
            Self::Nil => f.write_str("nil"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Number(text) | Self::String(text) => f.write_str(text),
            Self::Variable(idents) => f.write_str(&idents.join(".")),
            Self::Field(idents) => {
                for ident in idents {
                    write!(f, ".{ident}")?;
                }
                Ok(())
            }
            Self::Chain { node, fields } => {
                match node.as_ref() {
                    Self::Pipe(pipe) => write!(f, "({pipe})")?,
                    other => write!(f, "{other}")?,
                }
                for field in fields {
                    write!(f, ".{field}")?;
                }
                Ok(())
            }
            Self::Pipe(pipe) => write!(f, "{pipe}"),
        }
    }
}
