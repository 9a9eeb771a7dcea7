use std::collections::BTreeMap;

use crate::error::Error;
use crate::name::{AttributeName, TagName};
use crate::rule::RuleSet;
use crate::template::Template;

/// A default rule: whether tags not named by an explicit rule are allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum Policy {
    #[default]
    Allow,
    Deny,
}

/// Per-tag options.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct TagOptions {
    /// Applies to every tag not targeted by an explicit child rule.
    pub default_child_rule: Policy,
    /// Applies to every tag not targeted by an explicit descendant rule.
    pub default_descendant_rule: Policy,
    pub disallow_as_root: bool,
    /// Disabled tags take no ordinal and are left out of the rule table.
    pub disabled: bool,
    pub nesting_limit: u32,
    pub tag_limit: u32,
    /// The tag renders as an HTML element with a transparent content model.
    pub transparent: bool,
}

impl Default for TagOptions {
    fn default() -> Self {
        TagOptions {
            default_child_rule: Policy::Allow,
            default_descendant_rule: Policy::Allow,
            disallow_as_root: false,
            disabled: false,
            nesting_limit: 10,
            tag_limit: 100,
            transparent: false,
        }
    }
}

/// The declared type of an attribute.
///
/// Every type but [`AttributeType::Text`] comes with a built-in filter that
/// seeds the attribute's filter chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AttributeType {
    #[default]
    Text,
    Alnum,
    Color,
    Email,
    Float,
    Identifier,
    Int,
    Ip,
    Number,
    Range,
    Simpletext,
    Uint,
    Url,
}

impl AttributeType {
    pub fn builtin_filter(&self) -> Option<&'static str> {
        match self {
            AttributeType::Text => None,
            AttributeType::Alnum => Some("#alnum"),
            AttributeType::Color => Some("#color"),
            AttributeType::Email => Some("#email"),
            AttributeType::Float => Some("#float"),
            AttributeType::Identifier => Some("#identifier"),
            AttributeType::Int => Some("#int"),
            AttributeType::Ip => Some("#ip"),
            AttributeType::Number => Some("#number"),
            AttributeType::Range => Some("#range"),
            AttributeType::Simpletext => Some("#simpletext"),
            AttributeType::Uint => Some("#uint"),
            AttributeType::Url => Some("#url"),
        }
    }
}

/// An attribute of a tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    name: AttributeName,
    attribute_type: AttributeType,
    pub required: bool,
    pub default_value: Option<String>,
    /// Filter names, applied in order. Every name must be known to the
    /// filter registry of the configuration the tag belongs to.
    pub filter_chain: Vec<String>,
}

impl Attribute {
    pub fn new(name: AttributeName, attribute_type: AttributeType) -> Self {
        Attribute {
            name,
            attribute_type,
            required: true,
            default_value: None,
            filter_chain: attribute_type
                .builtin_filter()
                .map(str::to_string)
                .into_iter()
                .collect(),
        }
    }

    pub fn name(&self) -> &AttributeName {
        &self.name
    }

    pub fn attribute_type(&self) -> AttributeType {
        self.attribute_type
    }
}

/// A tag: its options, rules, attributes and render template.
#[derive(Debug, Clone)]
pub struct Tag {
    name: TagName,
    pub options: TagOptions,
    pub rules: RuleSet,
    attributes: BTreeMap<AttributeName, Attribute>,
    template: Option<Template>,
}

impl Tag {
    pub fn new(name: &str) -> Result<Self, Error> {
        Ok(Tag::with_name(TagName::new(name)?))
    }

    pub fn with_name(name: TagName) -> Self {
        Tag {
            name,
            options: TagOptions::default(),
            rules: RuleSet::new(),
            attributes: BTreeMap::new(),
            template: None,
        }
    }

    pub fn name(&self) -> &TagName {
        &self.name
    }

    /// Declare an attribute. Its filter chain starts with the type's
    /// built-in filter.
    pub fn add_attribute(
        &mut self,
        name: &str,
        attribute_type: AttributeType,
    ) -> Result<&mut Attribute, Error> {
        let name = AttributeName::new(name)?;
        if self.attributes.contains_key(&name) {
            return Err(Error::AttributeExists {
                tag: self.name.clone(),
                attribute: name,
            });
        }
        Ok(self
            .attributes
            .entry(name.clone())
            .or_insert_with(|| Attribute::new(name, attribute_type)))
    }

    pub fn remove_attribute(&mut self, name: &str) -> Result<Attribute, Error> {
        let name = AttributeName::new(name)?;
        self.attributes
            .remove(&name)
            .ok_or_else(|| Error::UnknownAttribute {
                tag: self.name.clone(),
                attribute: name,
            })
    }

    /// Look up an attribute. The name is matched case-insensitively.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        match self.attributes.get(name) {
            Some(attribute) => Some(attribute),
            None => self.attributes.get(name.to_ascii_lowercase().as_str()),
        }
    }

    pub fn attribute_mut(&mut self, name: &str) -> Option<&mut Attribute> {
        self.attributes.get_mut(name.to_ascii_lowercase().as_str())
    }

    /// Attributes in name order.
    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> + '_ {
        self.attributes.values()
    }

    pub fn template(&self) -> Option<&Template> {
        self.template.as_ref()
    }

    /// Replace the template without checking it. [`crate::Configuration`]
    /// checks templates before they get here.
    pub fn set_template(&mut self, template: Template) {
        self.template = Some(template);
    }

    pub fn take_template(&mut self) -> Option<Template> {
        self.template.take()
    }
}
