use std::collections::HashMap;

use crate::ast::Node;
use crate::error::ParseErrorKind;

/// A TemplateSet holds the tree of every template found in one source text:
/// the unnamed root template plus each `{{define}}` and `{{block}}`.
///
/// The set is keyed by name, with the root stored under the empty name. It
/// has no meaningful iteration order; [`crate::Converter`] sorts the names
/// before emitting anything.
///
/// # Example
///
/// ```rust
/// use tmplxml::{Node, TemplateSet};
///
/// let mut set = TemplateSet::new(Node::List(vec![Node::Text(b"root".to_vec())]));
/// set.define("footer", Node::List(vec![Node::Text(b"bye".to_vec())])).unwrap();
///
/// assert_eq!(set.len(), 2);
/// assert!(set.get("footer").is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSet {
    trees: HashMap<String, Node>,
}

impl TemplateSet {
    /// Creates a set holding only the root template.
    pub fn new(root: Node) -> Self {
        let mut trees = HashMap::new();
        trees.insert(String::new(), root);
        Self { trees }
    }

    /// Registers a template under `name`.
    ///
    /// A template whose body is only whitespace never wins over an existing
    /// definition, and may itself be replaced by a later one.
    ///
    /// # Errors
    ///
    /// Returns [`ParseErrorKind::MultipleDefinition`] if both the existing and
    /// the new definition have content.
    pub fn define<N: Into<String>>(&mut self, name: N, root: Node) -> Result<(), ParseErrorKind> {
        let name = name.into();
        match self.trees.get(&name) {
            Some(existing) if !existing.is_empty_tree() => {
                if root.is_empty_tree() {
                    Ok(())
                } else {
                    Err(ParseErrorKind::MultipleDefinition { name })
                }
            }
            Some(_) | None => {
                self.trees.insert(name, root);
                Ok(())
            }
        }
    }

    /// A set without a root, filled in by the parser.
    pub(crate) fn empty() -> Self {
        Self {
            trees: HashMap::new(),
        }
    }

    /// The tree of the unnamed root template.
    pub fn root(&self) -> Option<&Node> {
        self.trees.get("")
    }

    pub fn get<N: AsRef<str>>(&self, name: N) -> Option<&Node> {
        self.trees.get(name.as_ref())
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    /// Every `(name, tree)` pair, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.trees.iter().map(|(name, tree)| (name.as_str(), tree))
    }
}
