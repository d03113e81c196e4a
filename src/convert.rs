use crate::ast::{Branch, Node};
use crate::error::{TmplXmlError, TmplXmlResult};
use crate::escape::escape;
use crate::interface::EscapeMode;

/// A node of the converted document, one per XML element.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    /// `<text>`, holding already escaped text.
    Text(String),
    /// `<action>`, holding the pipeline exactly as stringified.
    Action(String),
    /// `<if cond="..."><then>...</then><else>...</else></if>`
    If {
        cond: String,
        then: Vec<XmlNode>,
        otherwise: Option<Vec<XmlNode>>,
    },
    /// `<range pipe="...">...<else>...</else></range>`
    Range(Block),
    /// `<with pipe="...">...<else>...</else></with>`
    With(Block),
    /// `<template name="..."/>`
    Template { name: String },
}

/// The body of a `range` or `with` element.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub pipe: String,
    pub body: Vec<XmlNode>,
    pub otherwise: Option<Vec<XmlNode>>,
}

/// One converted template definition.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Define {
    /// `None` for the unnamed root template.
    pub name: Option<String>,
    pub children: Vec<XmlNode>,
}

/// Every converted definition, root first, then ascending by name.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Document {
    pub defines: Vec<Define>,
}

/// Converts `node` and appends the result to `out`.
///
/// A list contributes its converted children in order rather than a node of
/// its own.
///
/// # Errors
/// - [`TmplXmlError::UnsupportedNode`] for `break`, `continue` and comment
///   nodes, which have no XML form. Nothing is skipped.
pub fn convert_node(node: &Node, mode: EscapeMode, out: &mut Vec<XmlNode>) -> TmplXmlResult<()> {
    match node {
        Node::List(nodes) => {
            for child in nodes {
                convert_node(child, mode, out)?;
            }
        }
        Node::Text(text) => out.push(XmlNode::Text(escape(text, mode).into_owned())),
        Node::Action(pipe) => out.push(XmlNode::Action(pipe.to_string())),
        Node::If(branch) => {
            let (cond, then, otherwise) = convert_branch(branch, mode)?;
            out.push(XmlNode::If {
                cond,
                then,
                otherwise,
            });
        }
        Node::Range(branch) => {
            let (pipe, body, otherwise) = convert_branch(branch, mode)?;
            out.push(XmlNode::Range(Block {
                pipe,
                body,
                otherwise,
            }));
        }
        Node::With(branch) => {
            let (pipe, body, otherwise) = convert_branch(branch, mode)?;
            out.push(XmlNode::With(Block {
                pipe,
                body,
                otherwise,
            }));
        }
        // The invoked template is emitted as its own definition, never inlined.
        Node::Template { name, .. } => out.push(XmlNode::Template { name: name.clone() }),
        Node::Break | Node::Continue | Node::Comment(_) => {
            return Err(TmplXmlError::UnsupportedNode {
                kind: node.kind().to_string(),
            });
        }
    }
    Ok(())
}

/// Converts a sequence of sibling nodes.
///
/// # Errors
/// - See [`convert_node`].
pub fn convert_list(nodes: &[Node], mode: EscapeMode) -> TmplXmlResult<Vec<XmlNode>> {
    let mut out = Vec::with_capacity(nodes.len());
    for node in nodes {
        convert_node(node, mode, &mut out)?;
    }
    Ok(out)
}

fn convert_branch(
    branch: &Branch,
    mode: EscapeMode,
) -> TmplXmlResult<(String, Vec<XmlNode>, Option<Vec<XmlNode>>)> {
    let list = convert_list(&branch.list, mode)?;
    let else_list = branch
        .else_list
        .as_deref()
        .map(|nodes| convert_list(nodes, mode))
        .transpose()?;
    Ok((branch.pipe.to_string(), list, else_list))
}
