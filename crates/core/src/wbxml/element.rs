/// A node in the codec's intermediate representation.
///
/// Attributes exist in the WBXML spec but SyncML 1.2 DM never uses them;
/// encoders must never emit an attribute-bearing form.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    /// Tag name, e.g. `"SyncHdr"`
    pub tag: String,
    /// Text content, if any
    pub text: Option<String>,
    /// Ordered child elements
    pub children: Vec<Element>,
}

impl Element {
    /// Construct an element with no text and no children.
    pub fn new(tag: impl Into<String>) -> Self {
        Element {
            tag: tag.into(),
            text: None,
            children: Vec::new(),
        }
    }

    /// Construct a leaf element with text content.
    pub fn with_text(tag: impl Into<String>, text: impl Into<String>) -> Self {
        Element {
            tag: tag.into(),
            text: Some(text.into()),
            children: Vec::new(),
        }
    }

    /// Append a child and return `self` for chaining.
    pub fn child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    /// Append a child in place.
    pub fn push(&mut self, child: Element) {
        self.children.push(child);
    }

    /// Find the first direct child with the given tag.
    pub fn find(&self, tag: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.tag == tag)
    }

    /// Find all direct children with the given tag.
    pub fn find_all<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.tag == tag)
    }

    /// Text of the first direct child with the given tag, if any and non-empty.
    pub fn child_text(&self, tag: &str) -> Option<String> {
        self.find(tag).and_then(|c| c.text.clone())
    }

    /// Whether this element has text or at least one child.
    pub fn has_content(&self) -> bool {
        self.text.is_some() || !self.children.is_empty()
    }
}
