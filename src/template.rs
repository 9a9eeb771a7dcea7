use genawaiter::rc::gen;
use genawaiter::yield_;
use ahash::HashSet;
use indextree::{Arena, NodeId};

/// The XSLT namespace. Elements in it are instructions.
pub const XSL_NAMESPACE: &str = "http://www.w3.org/1999/XSL/Transform";
/// The XHTML namespace. Elements in it count as HTML elements.
pub const XHTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

pub(crate) type TemplateArena = Arena<Value>;

/// A node in a [`Template`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Node(NodeId);

impl Node {
    #[inline]
    pub(crate) fn new(node_id: NodeId) -> Self {
        Node(node_id)
    }

    #[inline]
    pub(crate) fn get(&self) -> NodeId {
        self.0
    }
}

/// The type of a template node.
///
/// Use it when you are interested in the kind of node without matching on
/// its value.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum ValueType {
    Root,
    Element,
    DynamicElement,
    Attribute,
    Text,
    ValueOf,
    CopyOf,
    Copy,
    If,
    Choose,
    When,
    Otherwise,
    ForEach,
    ApplyTemplates,
    ProcessingInstruction,
    ProcessingInstructionConstructor,
    Comment,
    Instruction,
}

/// A template node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Holds the content of the template.
    Root,
    /// A literal result element, e.g. `<b title="{@title}">`.
    Element(Element),
    /// `xsl:element`
    DynamicElement(DynamicElement),
    /// `xsl:attribute`
    Attribute(AttributeConstructor),
    /// Literal text or `xsl:text`.
    Text(Text),
    /// `xsl:value-of`
    ValueOf(ValueOf),
    /// `xsl:copy-of`, with its select expression.
    CopyOf(String),
    /// `xsl:copy`
    Copy,
    /// `xsl:if`, with its test expression.
    If(String),
    /// `xsl:choose`
    Choose,
    /// `xsl:when`, with its test expression.
    When(String),
    /// `xsl:otherwise`
    Otherwise,
    /// `xsl:for-each`, with its select expression.
    ForEach(String),
    /// `xsl:apply-templates`, with its select expression if any.
    ApplyTemplates(Option<String>),
    /// A literal processing instruction, e.g. `<?php ?>`.
    ProcessingInstruction(ProcessingInstruction),
    /// `xsl:processing-instruction`, with its name as written. The name is
    /// an attribute value template.
    ProcessingInstructionConstructor(String),
    /// A literal comment or `xsl:comment`.
    Comment(Comment),
    /// Any other XSL element, e.g. `xsl:variable` or `xsl:call-template`.
    Instruction(Instruction),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Root => ValueType::Root,
            Value::Element(_) => ValueType::Element,
            Value::DynamicElement(_) => ValueType::DynamicElement,
            Value::Attribute(_) => ValueType::Attribute,
            Value::Text(_) => ValueType::Text,
            Value::ValueOf(_) => ValueType::ValueOf,
            Value::CopyOf(_) => ValueType::CopyOf,
            Value::Copy => ValueType::Copy,
            Value::If(_) => ValueType::If,
            Value::Choose => ValueType::Choose,
            Value::When(_) => ValueType::When,
            Value::Otherwise => ValueType::Otherwise,
            Value::ForEach(_) => ValueType::ForEach,
            Value::ApplyTemplates(_) => ValueType::ApplyTemplates,
            Value::ProcessingInstruction(_) => ValueType::ProcessingInstruction,
            Value::ProcessingInstructionConstructor(_) => {
                ValueType::ProcessingInstructionConstructor
            }
            Value::Comment(_) => ValueType::Comment,
            Value::Instruction(_) => ValueType::Instruction,
        }
    }

    /// Whether this node was written as an XSL instruction.
    pub fn is_instruction(&self) -> bool {
        !matches!(
            self,
            Value::Root
                | Value::Element(_)
                | Value::ProcessingInstruction(_)
                | Value::Comment(Comment { literal: true, .. })
                | Value::Text(Text { verbatim: false, .. })
        )
    }

    /// The literal element, if this is one.
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Value::Element(element) => Some(element),
            _ => None,
        }
    }
}

/// A literal result element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// The local name, as written.
    pub name: String,
    /// The namespace URI, if any.
    pub namespace: Option<String>,
    /// Attributes in document order. Values are attribute value templates.
    /// Attributes in the XSL namespace are stored with an `xsl:` prefix.
    pub attributes: Vec<(String, String)>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Element {
            name: name.into(),
            namespace: None,
            attributes: Vec::new(),
        }
    }

    /// Whether this is an HTML element: no namespace or the XHTML one.
    pub fn is_html(&self) -> bool {
        self.namespace
            .as_deref()
            .map_or(true, |namespace| namespace == XHTML_NAMESPACE)
    }

    /// The lowercased name of an HTML element.
    pub fn html_name(&self) -> Option<String> {
        self.is_html().then(|| self.name.to_ascii_lowercase())
    }

    /// Get an attribute value. Names are compared case-insensitively.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .attributes
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            Some((_, existing)) => *existing = value,
            None => self.attributes.push((name, value)),
        }
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<String> {
        let index = self
            .attributes
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))?;
        Some(self.attributes.remove(index).1)
    }
}

/// `xsl:element`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicElement {
    /// The name, as an attribute value template.
    pub name: String,
    pub namespace: Option<String>,
    pub use_attribute_sets: Option<String>,
}

/// `xsl:attribute`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeConstructor {
    /// The name, as an attribute value template.
    pub name: String,
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Text {
    pub text: String,
    pub disable_output_escaping: bool,
    /// Written as `xsl:text`; its content is never rewritten.
    pub verbatim: bool,
}

impl Text {
    pub fn new(text: impl Into<String>) -> Self {
        Text {
            text: text.into(),
            disable_output_escaping: false,
            verbatim: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueOf {
    pub select: String,
    pub disable_output_escaping: bool,
}

impl ValueOf {
    pub fn new(select: impl Into<String>) -> Self {
        ValueOf {
            select: select.into(),
            disable_output_escaping: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingInstruction {
    pub target: String,
    pub data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    /// The text of a literal comment. `xsl:comment` has its content as
    /// children instead.
    pub text: String,
    pub literal: bool,
}

/// An XSL element without a dedicated node type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// The local name, e.g. `variable`.
    pub name: String,
    pub attributes: Vec<(String, String)>,
}

impl Instruction {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value.as_str())
    }
}

/// How an expression is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExpressionKind {
    /// An XPath expression, e.g. a `select` or `test` attribute.
    XPath,
    /// An attribute value template, e.g. `title="{@title}"`.
    AttributeValueTemplate,
}

/// An expression found in a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expression<'a> {
    pub node: Node,
    pub kind: ExpressionKind,
    /// The attribute holding the expression.
    pub attribute: &'a str,
    pub source: &'a str,
}

// Attributes of other instructions that hold XPath expressions.
const XPATH_ATTRIBUTES: &[&str] = &["select", "test", "value", "use", "count", "from"];

fn expression_sites(value: &Value) -> Vec<(ExpressionKind, &str, &str)> {
    use ExpressionKind::*;
    match value {
        Value::Element(element) => element
            .attributes
            .iter()
            .map(|(name, value)| (AttributeValueTemplate, name.as_str(), value.as_str()))
            .collect(),
        Value::DynamicElement(element) => {
            let mut sites = vec![(AttributeValueTemplate, "name", element.name.as_str())];
            if let Some(namespace) = &element.namespace {
                sites.push((AttributeValueTemplate, "namespace", namespace.as_str()));
            }
            sites
        }
        Value::Attribute(attribute) => {
            let mut sites = vec![(AttributeValueTemplate, "name", attribute.name.as_str())];
            if let Some(namespace) = &attribute.namespace {
                sites.push((AttributeValueTemplate, "namespace", namespace.as_str()));
            }
            sites
        }
        Value::ValueOf(value_of) => vec![(XPath, "select", value_of.select.as_str())],
        Value::CopyOf(select) | Value::ForEach(select) => vec![(XPath, "select", select.as_str())],
        Value::If(test) | Value::When(test) => vec![(XPath, "test", test.as_str())],
        Value::ApplyTemplates(Some(select)) => vec![(XPath, "select", select.as_str())],
        Value::ProcessingInstructionConstructor(name) => {
            vec![(AttributeValueTemplate, "name", name.as_str())]
        }
        Value::Instruction(instruction) => instruction
            .attributes
            .iter()
            .map(|(name, value)| {
                let kind = if XPATH_ATTRIBUTES.contains(&name.as_str()) {
                    XPath
                } else {
                    AttributeValueTemplate
                };
                (kind, name.as_str(), value.as_str())
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// A render template.
///
/// Nodes live in an arena owned by the template. The root node holds the
/// content of the `xsl:template` element.
#[derive(Debug, Clone)]
pub struct Template {
    pub(crate) arena: TemplateArena,
    root: Node,
    // XSL instructions written with a `disable-output-escaping` attribute.
    pub(crate) unescaped: HashSet<Node>,
}

impl Template {
    /// An empty template.
    pub fn new() -> Self {
        let mut arena = TemplateArena::new();
        let root = Node::new(arena.new_node(Value::Root));
        Template {
            arena,
            root,
            unescaped: HashSet::default(),
        }
    }

    /// A template made of a single `xsl:apply-templates`. This is what a tag
    /// without a template renders as.
    pub fn apply_templates() -> Self {
        let mut template = Template::new();
        let node = template.new_node(Value::ApplyTemplates(None));
        template.append(template.root, node);
        template
    }

    #[inline]
    pub fn root(&self) -> Node {
        self.root
    }

    #[inline]
    pub fn value(&self, node: Node) -> &Value {
        self.arena[node.get()].get()
    }

    #[inline]
    pub fn value_mut(&mut self, node: Node) -> &mut Value {
        self.arena[node.get()].get_mut()
    }

    #[inline]
    pub fn value_type(&self, node: Node) -> ValueType {
        self.value(node).value_type()
    }

    /// Create a detached node.
    pub fn new_node(&mut self, value: Value) -> Node {
        Node::new(self.arena.new_node(value))
    }

    /// Record that the instruction at `node` carries a
    /// `disable-output-escaping` attribute.
    pub(crate) fn set_disable_output_escaping(&mut self, node: Node) {
        self.unescaped.insert(node);
    }

    /// Whether `node` asks for its output not to be escaped, whatever kind
    /// of node it is.
    pub fn disables_output_escaping(&self, node: Node) -> bool {
        match self.value(node) {
            Value::Text(text) if text.disable_output_escaping => true,
            Value::ValueOf(value_of) if value_of.disable_output_escaping => true,
            Value::Element(element) => element.attribute("disable-output-escaping").is_some(),
            Value::Instruction(instruction) => {
                instruction.attribute("disable-output-escaping").is_some()
            }
            _ => self.unescaped.contains(&node),
        }
    }

    /// The literal element at `node`, if it is one.
    pub fn element(&self, node: Node) -> Option<&Element> {
        self.value(node).as_element()
    }

    /// The lowercased HTML element name at `node`, if it is an HTML element.
    pub fn html_name(&self, node: Node) -> Option<String> {
        self.element(node).and_then(Element::html_name)
    }

    /// Whether the content of two nodes is the same, ignoring the nodes
    /// themselves.
    pub fn same_content(&self, a: Node, b: Node) -> bool {
        let mut a_children = self.children(a);
        let mut b_children = self.children(b);
        loop {
            match (a_children.next(), b_children.next()) {
                (None, None) => return true,
                (Some(a), Some(b)) => {
                    if !self.deep_equal(a, b) {
                        return false;
                    }
                }
                _ => return false,
            }
        }
    }

    /// Whether two subtrees are structurally identical.
    pub fn deep_equal(&self, a: Node, b: Node) -> bool {
        self.value(a) == self.value(b)
            && self.disables_output_escaping(a) == self.disables_output_escaping(b)
            && self.same_content(a, b)
    }

    /// Every expression in the template, in document order.
    ///
    /// ```rust
    /// use tagrules::{parse_template, ParseOptions};
    ///
    /// let template = parse_template(
    ///     r#"<a href="{@url}"><xsl:value-of select="@text"/></a>"#,
    ///     &ParseOptions::default(),
    /// )?;
    /// let sources = template
    ///     .expressions()
    ///     .map(|expression| expression.source)
    ///     .collect::<Vec<_>>();
    /// assert_eq!(sources, vec!["{@url}", "@text"]);
    /// # Ok::<(), tagrules::Error>(())
    /// ```
    pub fn expressions(&self) -> impl Iterator<Item = Expression<'_>> + '_ {
        gen!({
            for node in self.descendants(self.root) {
                for (kind, attribute, source) in expression_sites(self.value(node)) {
                    yield_!(Expression {
                        node,
                        kind,
                        attribute,
                        source,
                    });
                }
            }
        })
        .into_iter()
    }
}

impl Default for Template {
    fn default() -> Self {
        Self::new()
    }
}
