//! Static safety analysis of render templates.
//!
//! The checker proves that a template cannot send user-controlled data to
//! a dangerous place: a script, a stylesheet, an event handler or a URL.
//! It fails closed: anything it cannot assess is rejected.
//!
//! ```rust
//! use tagrules::{parse_template, AttributeType, FilterRegistry, ParseOptions, Tag, TemplateChecker};
//!
//! let filters = FilterRegistry::default();
//! let mut tag = Tag::new("B")?;
//! tag.add_attribute("foo", AttributeType::Text)?;
//! let template = parse_template(r#"<b onclick="{@foo}"/>"#, &ParseOptions::default())?;
//!
//! let error = TemplateChecker::new(&filters).check(&template, &tag).unwrap_err();
//! assert_eq!(error.to_string(), "Attribute 'foo' is not properly filtered to be used in JS");
//!
//! tag.attribute_mut("foo").unwrap().filter_chain.push("#int".to_string());
//! assert!(TemplateChecker::new(&filters).check(&template, &tag).is_ok());
//! # Ok::<(), tagrules::Error>(())
//! ```
mod flash;
mod sinks;

pub use flash::{FlashSetting, UnknownFlashSetting};

use crate::avt::{is_literal, literal_prefix, parse_avt, AvtPart};
use crate::filter::{FilterLookup, Sink};
use crate::tag::Tag;
use crate::template::{ExpressionKind, Node, Template, Value};
use crate::xpath::Expr;

/// Why a template was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Unsafe {
    #[error("PHP tags are not allowed")]
    PhpTag,
    #[error("Dynamic processing instructions are not allowed")]
    DynamicProcessingInstruction,
    #[error("Cannot assess the safety of attribute sets")]
    AttributeSets,
    #[error("The template contains a 'disable-output-escaping' attribute")]
    DisableOutputEscaping,
    /// An XSL instruction whose output cannot be assessed, e.g. `xsl:copy`.
    #[error("Cannot assess the safety of an 'xsl:{0}' element")]
    Instruction(String),
    #[error("An XPath expression uses the document() function")]
    DocumentFunction,
    #[error("Cannot assess 'xsl:element' name '{0}'")]
    DynamicElementName(String),
    #[error("Cannot assess 'xsl:attribute' name '{0}'")]
    DynamicAttributeName(String),
    #[error("Cannot assess the safety of a 'param' element with a dynamically generated name")]
    DynamicParamName,
    #[error("The template contains a '{element}' element with a non-fixed URL attribute '{attribute}'")]
    NonFixedUrl { element: String, attribute: String },
    #[error("The template contains a '{element}' element with a dynamically generated '{attribute}' attribute that does not use a fixed URL")]
    DynamicNonFixedUrl { element: String, attribute: String },
    #[error("Cannot assess the safety of dynamic attributes")]
    DynamicFlashAttribute,
    #[error("Cannot assess AllowScriptAccess setting '{0}'")]
    UnassessableScriptAccess(String),
    #[error("Unknown AllowScriptAccess value '{0}'")]
    UnknownScriptAccess(String),
    #[error("AllowScriptAccess setting '{setting}' exceeds restricted value '{max}'")]
    ScriptAccessExceeds { setting: String, max: FlashSetting },
    /// `xsl:apply-templates` in a script or a stylesheet.
    #[error("A '{0}' element lets unfiltered data through")]
    UnfilteredElement(String),
    #[error("A dynamically generated '{0}' element lets unfiltered data through")]
    UnfilteredDynamicElement(String),
    #[error("A dynamically generated '{0}' attribute lets unfiltered data through")]
    UnfilteredDynamicAttribute(String),
    #[error("Cannot assess the safety of 'xsl:apply-templates' select expression '{0}'")]
    ApplyTemplatesSelect(String),
    #[error("Cannot assess the safety of XPath expression '{0}'")]
    Expression(String),
    #[error("Undefined attribute '{0}'")]
    UndefinedAttribute(String),
    #[error("Attribute '{attribute}' is not properly filtered to be used in {sink}")]
    UnfilteredAttribute { attribute: String, sink: Sink },
    #[error("Cannot assess 'xsl:copy-of' select expression '{0}' to be safe")]
    CopyOfSelect(String),
    #[error("Cannot evaluate context node due to 'xsl:for-each'")]
    ForEachContext,
}

/// A template was rejected. Holds the reason and the node it was found at.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}")]
pub struct UnsafeTemplateError {
    kind: Unsafe,
    node: Node,
}

impl UnsafeTemplateError {
    pub(crate) fn new(kind: Unsafe, node: Node) -> Self {
        UnsafeTemplateError { kind, node }
    }

    pub fn kind(&self) -> &Unsafe {
        &self.kind
    }

    /// The offending node.
    pub fn node(&self) -> Node {
        self.node
    }
}

/// Options of the [`TemplateChecker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct CheckerOptions {
    /// If set, every `<embed>` and `<object>` must declare an
    /// `allowscriptaccess` setting no higher than this.
    pub max_script_access: Option<FlashSetting>,
    /// An `<embed>` or `<object>` whose setting is at most this may use a
    /// filtered dynamic URL.
    pub fixed_url_exemption: FlashSetting,
}

impl Default for CheckerOptions {
    fn default() -> Self {
        CheckerOptions {
            max_script_access: None,
            fixed_url_exemption: FlashSetting::Never,
        }
    }
}

/// Checks templates against the attributes of their tag.
pub struct TemplateChecker<'a> {
    filters: &'a dyn FilterLookup,
    options: CheckerOptions,
}

impl<'a> TemplateChecker<'a> {
    pub fn new(filters: &'a dyn FilterLookup) -> Self {
        TemplateChecker {
            filters,
            options: CheckerOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CheckerOptions) -> Self {
        self.options = options;
        self
    }

    /// Check a normalized template. Stops at the first violation.
    pub fn check(&self, template: &Template, tag: &Tag) -> Result<(), UnsafeTemplateError> {
        let check = Check {
            template,
            tag,
            filters: self.filters,
            options: &self.options,
        };
        check.structure()?;
        check.expressions()?;
        check.fixed_urls()?;
        check.flash()?;
        check.walk(template.root(), &Scope::root())
    }
}

impl std::fmt::Debug for TemplateChecker<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateChecker")
            .field("options", &self.options)
            .finish()
    }
}

/// The text of an attribute value template without expressions.
pub(crate) fn literal_text(source: &str) -> Option<String> {
    let parts = parse_avt(source).ok()?;
    is_literal(&parts).then(|| {
        parts
            .into_iter()
            .map(|part| match part {
                AvtPart::Literal(text) | AvtPart::Expression(text) => text,
            })
            .collect()
    })
}

/// The lowercase name of the element a node constructs: a literal element
/// or an `xsl:element` with a literal name.
///
/// The namespace is ignored. An SVG `script` loads and runs code the same
/// way an HTML one does.
pub(crate) fn constructed_name(template: &Template, node: Node) -> Option<String> {
    match template.value(node) {
        Value::Element(element) => Some(element.name.to_ascii_lowercase()),
        Value::DynamicElement(element) => {
            literal_text(&element.name).map(|name| name.to_ascii_lowercase())
        }
        _ => None,
    }
}

/// The element an attribute constructed at `node` lands on.
fn owner_element(template: &Template, node: Node) -> Option<Node> {
    template.ancestors(node).find(|ancestor| {
        matches!(
            template.value(*ancestor),
            Value::Element(_) | Value::DynamicElement(_)
        )
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FixedUrlAttributes {
    /// Every URL attribute.
    Url,
    /// The `value` of a `<param>` naming a movie or a script.
    ParamValue,
}

impl FixedUrlAttributes {
    fn contains(&self, attribute: &str, param_name: Option<&str>) -> bool {
        match self {
            FixedUrlAttributes::Url => sinks::is_url_attribute(attribute),
            FixedUrlAttributes::ParamValue => {
                sinks::is_url_param_value("param", attribute, param_name)
            }
        }
    }
}

/// Who owns the output of a scope, for error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Owner {
    Template,
    Element { name: String, dynamic: bool },
    Attribute(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Scope {
    /// `None` when output is escaped text or a harmless attribute value.
    sink: Option<Sink>,
    owner: Owner,
    /// A URL attribute starting with `mailto:`.
    mailto: bool,
    /// Whether attribute references refer to the tag's own attributes.
    node_binding_known: bool,
}

impl Scope {
    fn root() -> Self {
        Scope {
            sink: None,
            owner: Owner::Template,
            mailto: false,
            node_binding_known: true,
        }
    }
}

struct Check<'a> {
    template: &'a Template,
    tag: &'a Tag,
    filters: &'a dyn FilterLookup,
    options: &'a CheckerOptions,
}

impl Check<'_> {
    fn reject<T>(&self, kind: Unsafe, node: Node) -> Result<T, UnsafeTemplateError> {
        tracing::debug!(tag = %self.tag.name(), reason = %kind, "unsafe template");
        Err(UnsafeTemplateError::new(kind, node))
    }

    fn element_name(&self, node: Node) -> String {
        constructed_name(self.template, node).unwrap_or_default()
    }

    fn param_name(&self, node: Node) -> Option<&str> {
        self.template
            .element(node)
            .and_then(|element| element.attribute("name"))
    }

    /// Constructs whose output cannot be assessed at all.
    fn structure(&self) -> Result<(), UnsafeTemplateError> {
        let template = self.template;
        for node in template.descendants(template.root()) {
            if template.disables_output_escaping(node) {
                return self.reject(Unsafe::DisableOutputEscaping, node);
            }
            match template.value(node) {
                Value::ProcessingInstruction(pi) if pi.target.eq_ignore_ascii_case("php") => {
                    return self.reject(Unsafe::PhpTag, node)
                }
                Value::ProcessingInstructionConstructor(name) => match literal_text(name) {
                    Some(name) if name.trim().eq_ignore_ascii_case("php") => {
                        return self.reject(Unsafe::PhpTag, node)
                    }
                    Some(_) => {}
                    None => return self.reject(Unsafe::DynamicProcessingInstruction, node),
                },
                Value::Copy => return self.reject(Unsafe::Instruction("copy".to_string()), node),
                Value::Instruction(instruction) => {
                    if matches!(instruction.name.as_str(), "call-template" | "apply-imports") {
                        return self.reject(Unsafe::Instruction(instruction.name.clone()), node);
                    }
                    if instruction.attribute("use-attribute-sets").is_some() {
                        return self.reject(Unsafe::AttributeSets, node);
                    }
                }
                Value::Element(element) => {
                    if element.attribute("use-attribute-sets").is_some()
                        || element.attribute("xsl:use-attribute-sets").is_some()
                    {
                        return self.reject(Unsafe::AttributeSets, node);
                    }
                    let dynamic_param_name = self.element_name(node) == "param"
                        && element
                            .attribute("name")
                            .is_some_and(|name| literal_text(name).is_none());
                    if dynamic_param_name {
                        return self.reject(Unsafe::DynamicParamName, node);
                    }
                }
                Value::DynamicElement(element) => {
                    if element.use_attribute_sets.is_some() {
                        return self.reject(Unsafe::AttributeSets, node);
                    }
                    if literal_text(&element.name).is_none() {
                        return self.reject(Unsafe::DynamicElementName(element.name.clone()), node);
                    }
                }
                Value::Attribute(attribute) => {
                    let Some(name) = literal_text(&attribute.name) else {
                        return self
                            .reject(Unsafe::DynamicAttributeName(attribute.name.clone()), node);
                    };
                    let on_param = owner_element(template, node)
                        .is_some_and(|owner| self.element_name(owner) == "param");
                    if on_param && name.eq_ignore_ascii_case("name") {
                        return self.reject(Unsafe::DynamicParamName, node);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Every expression must parse and none may call `document()`.
    fn expressions(&self) -> Result<(), UnsafeTemplateError> {
        for expression in self.template.expressions() {
            let sources = match expression.kind {
                ExpressionKind::XPath => vec![expression.source.to_string()],
                ExpressionKind::AttributeValueTemplate => match parse_avt(expression.source) {
                    Ok(parts) => parts
                        .into_iter()
                        .filter_map(|part| match part {
                            AvtPart::Expression(source) => Some(source),
                            AvtPart::Literal(_) => None,
                        })
                        .collect(),
                    Err(_) => {
                        let kind = Unsafe::Expression(expression.source.trim().to_string());
                        return self.reject(kind, expression.node);
                    }
                },
            };
            for source in sources {
                match Expr::parse(&source) {
                    Ok(expr) if expr.calls_function("document") => {
                        return self.reject(Unsafe::DocumentFunction, expression.node)
                    }
                    Ok(_) => {}
                    Err(_) => {
                        return self.reject(
                            Unsafe::Expression(source.trim().to_string()),
                            expression.node,
                        )
                    }
                }
            }
        }
        Ok(())
    }

    /// Whether a URL is fixed: literal, or a literal scheme and host
    /// followed by expressions filtered for URLs.
    fn is_fixed_url(&self, value: &str) -> bool {
        let Ok(parts) = parse_avt(value) else {
            return false;
        };
        if is_literal(&parts) {
            return true;
        }
        if !sinks::has_fixed_origin(literal_prefix(&parts)) {
            return false;
        }
        parts.iter().all(|part| match part {
            AvtPart::Literal(_) => true,
            AvtPart::Expression(source) => Expr::parse(source)
                .ok()
                .and_then(|expr| expr.sources())
                .is_some_and(|sources| {
                    sources.iter().all(|name| self.is_filtered(name, Sink::Url))
                }),
        })
    }

    fn is_filtered(&self, attribute: &str, sink: Sink) -> bool {
        self.tag.attribute(attribute).is_some_and(|attribute| {
            attribute
                .filter_chain
                .iter()
                .any(|filter| self.filters.is_safe(filter, sink))
        })
    }

    /// Whether an `<embed>` or `<object>` keeps script access low enough to
    /// load a dynamic URL.
    fn is_exempt(&self, node: Node) -> bool {
        flash::check_element(self.template, node, self.options.fixed_url_exemption).is_ok()
    }

    /// Which attributes of `node` must hold a fixed URL, if any.
    fn fixed_url_attributes(&self, node: Node) -> Option<FixedUrlAttributes> {
        match self.element_name(node).as_str() {
            "embed" | "object" if self.is_exempt(node) => None,
            "embed" | "object" | "iframe" | "script" => Some(FixedUrlAttributes::Url),
            "param" => {
                let object = self
                    .template
                    .ancestors(node)
                    .find(|ancestor| self.element_name(*ancestor) == "object")?;
                (!self.is_exempt(object)).then_some(FixedUrlAttributes::ParamValue)
            }
            _ => None,
        }
    }

    /// Elements that load code must use fixed URLs.
    fn fixed_urls(&self) -> Result<(), UnsafeTemplateError> {
        let template = self.template;
        for node in template.descendants(template.root()) {
            let Some(attributes) = self.fixed_url_attributes(node) else {
                continue;
            };
            let element = self.element_name(node);
            let param_name = self.param_name(node);

            if let Some(literal) = template.element(node) {
                for (attribute, value) in &literal.attributes {
                    if attributes.contains(attribute, param_name) && !self.is_fixed_url(value) {
                        let kind = Unsafe::NonFixedUrl {
                            element,
                            attribute: attribute.to_ascii_lowercase(),
                        };
                        return self.reject(kind, node);
                    }
                }
            }

            for descendant in template.descendants(node).skip(1) {
                if owner_element(template, descendant) != Some(node) {
                    continue;
                }
                let (attribute, fixed) = match template.value(descendant) {
                    Value::Attribute(attribute) => {
                        let fixed = template.children(descendant).all(|child| {
                            matches!(
                                template.value(child),
                                Value::Text(text) if !text.disable_output_escaping
                            ) || matches!(
                                template.value(child),
                                Value::ProcessingInstruction(_) | Value::Comment(_)
                            )
                        });
                        (literal_text(&attribute.name).unwrap_or_default(), fixed)
                    }
                    Value::CopyOf(select) => match Expr::parse(select) {
                        Ok(expr) => match expr.as_attribute() {
                            Some(name) => (name.to_string(), false),
                            None => continue,
                        },
                        Err(_) => continue,
                    },
                    _ => continue,
                };
                if !fixed && attributes.contains(&attribute, param_name) {
                    let kind = Unsafe::DynamicNonFixedUrl {
                        element,
                        attribute: attribute.to_ascii_lowercase(),
                    };
                    return self.reject(kind, descendant);
                }
            }
        }
        Ok(())
    }

    fn flash(&self) -> Result<(), UnsafeTemplateError> {
        let Some(max) = self.options.max_script_access else {
            return Ok(());
        };
        for node in self.template.descendants(self.template.root()) {
            if let Err(error) = flash::check_element(self.template, node, max) {
                return self.reject(error.kind, error.node);
            }
        }
        Ok(())
    }

    fn element_scope(&self, name: String, dynamic: bool, outer: &Scope) -> Scope {
        match sinks::element_sink(&name) {
            Some(sink) => Scope {
                sink: Some(sink),
                owner: Owner::Element { name, dynamic },
                mailto: false,
                node_binding_known: outer.node_binding_known,
            },
            // Markup inside a script is still script.
            None if outer.sink.is_some() => outer.clone(),
            None => Scope {
                sink: None,
                owner: Owner::Element { name, dynamic },
                mailto: false,
                node_binding_known: outer.node_binding_known,
            },
        }
    }

    /// Follow output through the template, checking what reaches each sink.
    fn walk(&self, node: Node, scope: &Scope) -> Result<(), UnsafeTemplateError> {
        let template = self.template;
        for child in template.children(node) {
            match template.value(child) {
                Value::Element(element) => {
                    let name = element.name.to_ascii_lowercase();
                    let param_name = element.attribute("name");
                    for (attribute, value) in &element.attributes {
                        if attribute.starts_with("xsl:") {
                            continue;
                        }
                        if let Some(sink) = sinks::attribute_sink(&name, attribute, param_name) {
                            self.check_avt(child, value, sink, scope)?;
                        }
                    }
                    let inner = self.element_scope(name, false, scope);
                    self.walk(child, &inner)?;
                }
                Value::DynamicElement(_) => {
                    let inner = self.element_scope(self.element_name(child), true, scope);
                    self.walk(child, &inner)?;
                }
                Value::Attribute(attribute) => {
                    let name = literal_text(&attribute.name)
                        .unwrap_or_default()
                        .to_ascii_lowercase();
                    let owner = owner_element(template, child);
                    let element = owner.map(|owner| self.element_name(owner)).unwrap_or_default();
                    let param_name = owner.and_then(|owner| self.param_name(owner));
                    let sink = sinks::attribute_sink(&element, &name, param_name);
                    let mailto = sink == Some(Sink::Url)
                        && template.first_child(child).is_some_and(|first| {
                            matches!(template.value(first), Value::Text(text) if sinks::is_mailto(&text.text))
                        });
                    let inner = Scope {
                        sink,
                        owner: Owner::Attribute(name),
                        mailto,
                        node_binding_known: scope.node_binding_known,
                    };
                    self.walk(child, &inner)?;
                }
                Value::ValueOf(value_of) => {
                    if let Some(sink) = scope.sink {
                        self.check_xpath(child, &value_of.select, sink, scope)?;
                    }
                }
                Value::CopyOf(select) => self.check_copy_of(child, select, scope)?,
                Value::ApplyTemplates(select) => {
                    if scope.sink.is_none() {
                        continue;
                    }
                    let kind = match (select, &scope.owner) {
                        (Some(select), _) => Unsafe::ApplyTemplatesSelect(select.trim().to_string()),
                        (None, Owner::Element { name, dynamic: false }) => {
                            Unsafe::UnfilteredElement(name.clone())
                        }
                        (None, Owner::Element { name, dynamic: true }) => {
                            Unsafe::UnfilteredDynamicElement(name.clone())
                        }
                        (None, Owner::Attribute(name)) => {
                            Unsafe::UnfilteredDynamicAttribute(name.clone())
                        }
                        (None, Owner::Template) => Unsafe::Instruction("apply-templates".to_string()),
                    };
                    return self.reject(kind, child);
                }
                Value::ForEach(_) => {
                    let inner = Scope {
                        node_binding_known: false,
                        ..scope.clone()
                    };
                    self.walk(child, &inner)?;
                }
                Value::Instruction(instruction) => {
                    if scope.sink.is_some() && instruction.name != "sort" {
                        return self.reject(Unsafe::Instruction(instruction.name.clone()), child);
                    }
                    self.walk(child, scope)?;
                }
                _ => self.walk(child, scope)?,
            }
        }
        Ok(())
    }

    fn check_avt(
        &self,
        node: Node,
        value: &str,
        sink: Sink,
        scope: &Scope,
    ) -> Result<(), UnsafeTemplateError> {
        let parts = match parse_avt(value) {
            Ok(parts) => parts,
            Err(_) => return self.reject(Unsafe::Expression(value.trim().to_string()), node),
        };
        let scope = Scope {
            sink: Some(sink),
            mailto: sink == Sink::Url && sinks::is_mailto(literal_prefix(&parts)),
            ..scope.clone()
        };
        for part in &parts {
            if let AvtPart::Expression(source) = part {
                self.check_xpath(node, source, sink, &scope)?;
            }
        }
        Ok(())
    }

    /// An expression in a sink may only output constants and filtered
    /// attributes.
    fn check_xpath(
        &self,
        node: Node,
        source: &str,
        sink: Sink,
        scope: &Scope,
    ) -> Result<(), UnsafeTemplateError> {
        let Some(sources) = Expr::parse(source).ok().and_then(|expr| expr.sources()) else {
            return self.reject(Unsafe::Expression(source.trim().to_string()), node);
        };
        for attribute in sources {
            self.check_attribute(node, &attribute, sink, scope)?;
        }
        Ok(())
    }

    fn check_attribute(
        &self,
        node: Node,
        attribute: &str,
        sink: Sink,
        scope: &Scope,
    ) -> Result<(), UnsafeTemplateError> {
        if !scope.node_binding_known {
            return self.reject(Unsafe::ForEachContext, node);
        }
        if self.tag.attribute(attribute).is_none() {
            return self.reject(Unsafe::UndefinedAttribute(attribute.to_string()), node);
        }
        // A mailto: prefix fixes the scheme, so any attribute-safe value
        // will do.
        let required = if scope.mailto { Sink::Attribute } else { sink };
        if !self.is_filtered(attribute, required) {
            let kind = Unsafe::UnfilteredAttribute {
                attribute: attribute.to_string(),
                sink,
            };
            return self.reject(kind, node);
        }
        Ok(())
    }

    /// `xsl:copy-of` may only copy an attribute, which is checked for the
    /// sink it lands in.
    fn check_copy_of(
        &self,
        node: Node,
        select: &str,
        scope: &Scope,
    ) -> Result<(), UnsafeTemplateError> {
        let expr = Expr::parse(select).ok();
        let Some(attribute) = expr.as_ref().and_then(Expr::as_attribute) else {
            return self.reject(Unsafe::CopyOfSelect(select.trim().to_string()), node);
        };
        let sink = match (&scope.owner, scope.sink) {
            // Inside an attribute, only the value is copied.
            (Owner::Attribute(_), sink) => sink,
            _ => {
                let owner = owner_element(self.template, node);
                let element = owner.map(|owner| self.element_name(owner)).unwrap_or_default();
                let param_name = owner.and_then(|owner| self.param_name(owner));
                sinks::attribute_sink(&element, attribute, param_name)
            }
        };
        match sink {
            Some(sink) => {
                let scope = Scope {
                    mailto: false,
                    ..scope.clone()
                };
                self.check_attribute(node, attribute, sink, &scope)
            }
            None => Ok(()),
        }
    }
}
