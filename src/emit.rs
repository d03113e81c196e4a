use std::io::Write;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::convert::{Block, Define, Document, XmlNode};
use crate::error::TmplXmlResult;

const INDENT_SIZE: usize = 2;

/// Serializes `document` into `writer` with two-space indentation.
///
/// With `declaration` set an `<?xml ...?>` header is written first.
pub(crate) fn write_document<W: Write>(
    writer: W,
    document: &Document,
    declaration: bool,
) -> TmplXmlResult<()> {
    let mut xml = Writer::new_with_indent(writer, b' ', INDENT_SIZE);
    if declaration {
        xml.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    }
    xml.write_event(Event::Start(BytesStart::new("defines")))?;
    for define in &document.defines {
        write_define(&mut xml, define)?;
    }
    xml.write_event(Event::End(BytesEnd::new("defines")))?;
    Ok(())
}

fn write_define<W: Write>(xml: &mut Writer<W>, define: &Define) -> TmplXmlResult<()> {
    match &define.name {
        Some(name) => write_element(xml, "define", &[("template", name.as_str())], &define.children),
        None => write_element(xml, "define", &[], &define.children),
    }
}

/// Writes `<tag attrs>children</tag>`, or `<tag attrs/>` without children.
fn write_element<W: Write>(
    xml: &mut Writer<W>,
    tag: &str,
    attrs: &[(&str, &str)],
    children: &[XmlNode],
) -> TmplXmlResult<()> {
    let start = BytesStart::new(tag).with_attributes(attrs.iter().copied());
    if children.is_empty() {
        xml.write_event(Event::Empty(start))?;
        return Ok(());
    }
    xml.write_event(Event::Start(start))?;
    for child in children {
        write_node(xml, child)?;
    }
    xml.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

/// Writes a leaf whose content is already safe to embed verbatim.
fn write_leaf<W: Write>(xml: &mut Writer<W>, tag: &str, content: &str) -> TmplXmlResult<()> {
    xml.write_event(Event::Start(BytesStart::new(tag)))?;
    xml.write_event(Event::Text(BytesText::from_escaped(content)))?;
    xml.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

fn write_node<W: Write>(xml: &mut Writer<W>, node: &XmlNode) -> TmplXmlResult<()> {
    match node {
        XmlNode::Text(text) => write_leaf(xml, "text", text),
        XmlNode::Action(pipe) => write_leaf(xml, "action", pipe),
        XmlNode::If {
            cond,
            then,
            otherwise,
        } => {
            xml.write_event(Event::Start(
                BytesStart::new("if").with_attributes([("cond", cond.as_str())]),
            ))?;
            write_element(xml, "then", &[], then)?;
            if let Some(otherwise) = otherwise {
                write_element(xml, "else", &[], otherwise)?;
            }
            xml.write_event(Event::End(BytesEnd::new("if")))?;
            Ok(())
        }
        XmlNode::Range(block) => write_block(xml, "range", block),
        XmlNode::With(block) => write_block(xml, "with", block),
        XmlNode::Template { name } => write_element(xml, "template", &[("name", name.as_str())], &[]),
    }
}

fn write_block<W: Write>(xml: &mut Writer<W>, tag: &str, block: &Block) -> TmplXmlResult<()> {
    let attrs = [("pipe", block.pipe.as_str())];
    let Some(otherwise) = &block.otherwise else {
        return write_element(xml, tag, &attrs, &block.body);
    };
    xml.write_event(Event::Start(BytesStart::new(tag).with_attributes(attrs)))?;
    for child in &block.body {
        write_node(xml, child)?;
    }
    write_element(xml, "else", &[], otherwise)?;
    xml.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}
