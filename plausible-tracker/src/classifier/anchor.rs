//! Finding the link behind a click.
//!
//! The element that receives a click is often a descendant of the link
//! (an icon or a `<span>` inside an `<a>`), so the classifier walks up the
//! tree until it meets an anchor with a usable `href`.

/// A link element, reduced to what the classifier needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    /// The link's `href`, as reported by the host (absolute in browsers).
    pub href: String,
    /// The `target` attribute, if set.
    pub target: Option<String>,
}

impl Anchor {
    /// Create an anchor with no target.
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            target: None,
        }
    }

    /// Set the `target` attribute.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

/// A node in a document tree.
pub trait DomNode: Sized {
    /// The parent node, `None` at the root.
    fn parent_node(&self) -> Option<Self>;

    /// This node as a link, when it is an `a` element with a non-empty `href`.
    fn as_anchor(&self) -> Option<Anchor>;
}

/// Walk from `node` towards the root and return the first trackable anchor.
pub fn find_trackable_anchor<N: DomNode>(node: N) -> Option<Anchor> {
    let mut current = Some(node);
    while let Some(node) = current {
        if let Some(anchor) = node.as_anchor().filter(|a| !a.href.is_empty()) {
            return Some(anchor);
        }
        current = node.parent_node();
    }
    None
}
