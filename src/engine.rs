use crate::convert::{Define, Document, convert_node};
use crate::emit::write_document;
use crate::error::TmplXmlResult;
use crate::interface::{EscapeMode, OutputTarget, SourceParser};
use crate::parser::TemplateParser;
use crate::template::TemplateSet;

/// `Converter` is the entry point for transcoding templates into XML.
///
/// It holds only the conversion-wide [`EscapeMode`]; the output destination
/// is chosen per call, so one converter may be shared freely.
///
/// # Examples
///
/// ```
/// use tmplxml::{Converter, EscapeMode, OutputTarget};
///
/// let converter = Converter::new(EscapeMode::Xml);
/// let xml = converter
///     .convert_str("Hello {{.Name}}", OutputTarget::Buffer)
///     .unwrap()
///     .unwrap();
///
/// assert!(xml.starts_with("<?xml"));
/// assert!(xml.contains("<text>Hello </text>"));
/// assert!(xml.contains("<action>.Name</action>"));
/// ```
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Converter {
    mode: EscapeMode,
}

impl Converter {
    /// Creates a converter applying `mode` to every text node.
    pub const fn new(mode: EscapeMode) -> Self {
        Self { mode }
    }

    pub const fn escape_mode(&self) -> EscapeMode {
        self.mode
    }

    /// Converts every definition of `set` and orders them by name.
    ///
    /// Names compare byte-wise, so the unnamed root always comes first and
    /// the order never depends on where definitions appeared in the source.
    ///
    /// # Errors
    ///
    /// Returns `TmplXmlError::UnsupportedNode` if any tree holds a node kind
    /// that has no XML form.
    pub fn document(&self, set: &TemplateSet) -> TmplXmlResult<Document> {
        let mut trees: Vec<_> = set.iter().collect();
        trees.sort_unstable_by(|(a, _), (b, _)| a.as_bytes().cmp(b.as_bytes()));

        let mut defines = Vec::with_capacity(trees.len());
        for (name, tree) in trees {
            log::trace!("converting template {:?}", name);
            let mut children = Vec::new();
            convert_node(tree, self.mode, &mut children)?;
            defines.push(Define {
                name: (!name.is_empty()).then(|| name.to_string()),
                children,
            });
        }
        Ok(Document { defines })
    }

    /// Converts an already parsed `set` and writes it to `target`.
    ///
    /// The document is fully built before the first byte is written, so a
    /// conversion failure leaves a caller-supplied writer untouched.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(xml))` for [`OutputTarget::Buffer`], with an XML
    ///   declaration prepended
    /// * `Ok(None)` for [`OutputTarget::Writer`], which receives no
    ///   declaration
    ///
    /// # Errors
    ///
    /// * `TmplXmlError::UnsupportedNode` if the set cannot be converted
    /// * `TmplXmlError::Emit` if the writer rejects a write; whatever was
    ///   already written must be discarded
    pub fn convert_set(
        &self,
        set: &TemplateSet,
        target: OutputTarget<'_>,
    ) -> TmplXmlResult<Option<String>> {
        let document = self.document(set)?;
        log::debug!(
            "emitting {} definition(s) with {:?} escaping to {:?}",
            document.defines.len(),
            self.mode,
            target
        );
        match target {
            OutputTarget::Buffer => {
                let mut buf = Vec::new();
                write_document(&mut buf, &document, true)?;
                // Every piece written is a valid `str`.
                Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
            }
            OutputTarget::Writer(writer) => {
                write_document(writer, &document, false)?;
                Ok(None)
            }
        }
    }

    /// Parses `source` with `parser`, then behaves like
    /// [`Converter::convert_set`].
    ///
    /// # Errors
    ///
    /// * `TmplXmlError::Parse` if `source` is not a valid template
    /// * see [`Converter::convert_set`]
    pub fn convert_with<P: SourceParser>(
        &self,
        parser: &P,
        source: &[u8],
        target: OutputTarget<'_>,
    ) -> TmplXmlResult<Option<String>> {
        let set = parser.parse_bytes(source)?;
        self.convert_set(&set, target)
    }

    /// Parses raw `source` bytes with the default [`TemplateParser`] and
    /// converts them. Text that is not UTF-8 survives as `\xHH` escapes in
    /// quote mode.
    ///
    /// # Errors
    ///
    /// See [`Converter::convert_with`].
    pub fn convert_bytes(
        &self,
        source: &[u8],
        target: OutputTarget<'_>,
    ) -> TmplXmlResult<Option<String>> {
        self.convert_with(&TemplateParser::new(), source, target)
    }

    /// Parses `source` with the default [`TemplateParser`] and converts it.
    ///
    /// # Errors
    ///
    /// See [`Converter::convert_with`].
    pub fn convert_str(
        &self,
        source: &str,
        target: OutputTarget<'_>,
    ) -> TmplXmlResult<Option<String>> {
        self.convert_bytes(source.as_bytes(), target)
    }
}

/// Converts `source` into an XML document string using quote escaping,
/// declaration included.
///
/// # Errors
///
/// See [`Converter::convert_with`].
pub fn to_xml_string(source: &str) -> TmplXmlResult<String> {
    Converter::default()
        .convert_str(source, OutputTarget::Buffer)
        .map(Option::unwrap_or_default)
}
