pub type TmplXmlResult<T> = std::result::Result<T, TmplXmlError>;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParseErrorKind {
    UnexpectedToken {
        /// Where the token was found, e.g. "command" or "define clause".
        context: String,
        found: String,
    },
    UnexpectedEOF {
        /// Describes what was expected, e.g., " (expected '{{end}}')"
        expected_what: String,
    },
    /// The tokenizer could not make sense of the input.
    Lexical {
        message: String,
    },
    UndefinedVariable {
        name: String,
    },
    MultipleDefinition {
        name: String,
    },
    MissingValue {
        context: String,
    },
    NonExecutableCommand {
        stage: usize,
    },
    InvalidStringLiteral {
        literal: String,
    },
    Message(String),
}

impl std::fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnexpectedToken { context, found } => {
                write!(f, "unexpected {} in {}", found, context)
            }
            Self::UnexpectedEOF { expected_what } => {
                write!(f, "unexpected EOF{}", expected_what)
            }
            Self::Lexical { message } => f.write_str(message),
            Self::UndefinedVariable { name } => {
                write!(f, "undefined variable \"{}\"", name)
            }
            Self::MultipleDefinition { name } => {
                write!(f, "multiple definition of template \"{}\"", name)
            }
            Self::MissingValue { context } => {
                write!(f, "missing value for {}", context)
            }
            Self::NonExecutableCommand { stage } => {
                write!(f, "non executable command in pipeline stage {}", stage)
            }
            Self::InvalidStringLiteral { literal } => {
                write!(f, "invalid string literal {}", literal)
            }
            Self::Message(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for ParseErrorKind {}

impl ParseErrorKind {
    pub fn unexpected_eof(expected: Option<&str>) -> Self {
        Self::UnexpectedEOF {
            expected_what: expected.map_or_else(String::new, |e| format!(" (expected '{}')", e)),
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub kind: ParseErrorKind,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Parse error at line {}, column {}: {}",
            self.line, self.column, self.kind
        )
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TmplXmlError {
    /// The template source could not be read.
    Input { path: String, message: String },
    /// The template source does not follow the template grammar.
    Parse(ParseError),
    /// The tree holds a node kind that has no XML form.
    UnsupportedNode { kind: String },
    /// The output destination rejected a write.
    Emit { message: String },
}

impl std::fmt::Display for TmplXmlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Input { path, message } => {
                write!(f, "Failed to read {}: {}", path, message)
            }
            Self::Parse(parse_error) => {
                write!(f, "{}", parse_error)
            }
            Self::UnsupportedNode { kind } => {
                write!(f, "Unsupported node kind: {}", kind)
            }
            Self::Emit { message } => {
                write!(f, "Failed to write XML: {}", message)
            }
        }
    }
}

impl std::error::Error for TmplXmlError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Parse(parse_error) => Some(parse_error),
            Self::Input { .. } | Self::UnsupportedNode { .. } | Self::Emit { .. } => None,
        }
    }
}

impl From<ParseError> for TmplXmlError {
    fn from(error: ParseError) -> Self {
        Self::Parse(error)
    }
}

impl From<std::io::Error> for TmplXmlError {
    fn from(error: std::io::Error) -> Self {
        Self::Emit {
            message: error.to_string(),
        }
    }
}

impl From<quick_xml::Error> for TmplXmlError {
    fn from(error: quick_xml::Error) -> Self {
        Self::Emit {
            message: error.to_string(),
        }
    }
}
