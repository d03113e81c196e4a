mod ast;
mod convert;
mod emit;
mod engine;
mod error;
pub mod escape;
mod interface;
mod lexer;
mod number;
mod parser;
mod template;

// Public exports.
pub use ast::{Branch, Command, Node, Operand, Pipe};
pub use convert::{Block, Define, Document, XmlNode, convert_list, convert_node};
pub use engine::{Converter, to_xml_string};
pub use error::{ParseError, ParseErrorKind, TmplXmlError, TmplXmlResult};
pub use interface::{EscapeMode, OutputTarget, SourceParser};
pub use parser::{TemplateParser, parse, parse_bytes};
pub use template::TemplateSet;
