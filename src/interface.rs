use std::io::Write;

use crate::error::ParseError;
use crate::template::TemplateSet;

/// How literal template text is made embeddable in the XML output.
///
/// The mode is chosen once per conversion and applies to every text node of
/// the document; the two strategies are never mixed.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum EscapeMode {
    /// Double-quoted, backslash-escaped literal. Reversed by
    /// [`crate::escape::unquote`], or [`crate::escape::unquote_bytes`] for
    /// text that is not UTF-8.
    #[default]
    Quote,
    /// XML character-data escaping. Reversed by
    /// [`crate::escape::unescape_xml`] for text made of XML characters;
    /// anything else is replaced with U+FFFD.
    Xml,
}

/// Where a conversion writes its document.
///
/// Only [`OutputTarget::Buffer`] prepends an XML declaration. Callers handing
/// in their own writer are responsible for any header they need.
pub enum OutputTarget<'w> {
    /// Write into a fresh in-memory buffer that is returned to the caller.
    Buffer,
    /// Write into a caller-owned destination.
    Writer(&'w mut dyn Write),
}

impl std::fmt::Debug for OutputTarget<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buffer => f.write_str("Buffer"),
            Self::Writer(_) => f.write_str("Writer(..)"),
        }
    }
}

/// `SourceParser` turns template source text into the tree of the root
/// template plus every named template discovered in it.
///
/// Implementations must not perform execution-time validation: function
/// names in pipelines are never resolved since nothing is executed.
pub trait SourceParser {
    /// Parses raw `source` bytes into a [`TemplateSet`].
    ///
    /// Literal text outside actions is kept byte for byte, even where it is
    /// not valid UTF-8.
    ///
    /// # Errors
    /// - If `source` does not follow the template grammar.
    fn parse_bytes(&self, source: &[u8]) -> Result<TemplateSet, ParseError>;

    /// Parses `source` into a [`TemplateSet`].
    ///
    /// # Errors
    /// - If `source` does not follow the template grammar.
    fn parse(&self, source: &str) -> Result<TemplateSet, ParseError> {
        self.parse_bytes(source.as_bytes())
    }
}
