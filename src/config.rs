//! Declaring tags, attributes, rules and templates, and building the rule
//! table from them.
//!
//! ```rust
//! use tagrules::{AttributeType, Configuration, RuleAction, TemplateFlags};
//!
//! let mut config = Configuration::new();
//! config.add_tag("URL")?;
//! config.add_attribute("URL", "url", AttributeType::Url)?;
//! config.set_template("URL", r#"<a href="{@url}"><xsl:apply-templates/></a>"#, TemplateFlags::default())?;
//! config.add_tag("B")?;
//! config.add_rule("URL", RuleAction::DenyChild, "URL")?;
//!
//! let table = config.compile()?;
//! assert!(table.allows_child("URL", "B"));
//! assert!(!table.allows_child("URL", "URL"));
//! # Ok::<(), tagrules::Error>(())
//! ```
use std::collections::{BTreeMap, BTreeSet};

use crate::checker::{CheckerOptions, TemplateChecker};
use crate::compiler::{self, RuleTable};
use crate::derive::Html5RuleDeriver;
use crate::error::Error;
use crate::filter::{normalize_filter_name, FilterLookup, FilterRegistry};
use crate::name::{AttributeName, TagName};
use crate::normalize::TemplateNormalizer;
use crate::parse::{parse_template, ParseOptions};
use crate::rule::RuleAction;
use crate::tag::{Attribute, AttributeType, Tag};

/// How [`Configuration::set_template`] treats a template.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TemplateFlags {
    /// Skip the safety checker. The template is trusted as is.
    pub allow_unsafe: bool,
    /// Keep whitespace-only text.
    pub preserve_whitespace: bool,
}

/// A set of tags and everything needed to build their rule table.
#[derive(Debug, Default)]
pub struct Configuration {
    tags: BTreeMap<TagName, Tag>,
    /// Tags whose template was accepted with `allow_unsafe`.
    trusted_templates: BTreeSet<TagName>,
    pub filters: FilterRegistry,
    pub normalizer: TemplateNormalizer,
    pub checker_options: CheckerOptions,
}

impl Configuration {
    /// A configuration with the built-in filters and the default template
    /// normalizations.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tag(&mut self, name: &str) -> Result<&mut Tag, Error> {
        let name = TagName::new(name)?;
        if self.tags.contains_key(&name) {
            return Err(Error::TagExists(name));
        }
        tracing::debug!(tag = %name, "adding tag");
        Ok(self
            .tags
            .entry(name.clone())
            .or_insert_with(|| Tag::with_name(name)))
    }

    pub fn remove_tag(&mut self, name: &str) -> Result<Tag, Error> {
        let name = TagName::new(name)?;
        self.trusted_templates.remove(&name);
        self.tags.remove(&name).ok_or(Error::UnknownTag(name))
    }

    /// Look up a tag. The name is case-insensitive.
    pub fn tag(&self, name: &str) -> Option<&Tag> {
        let name = TagName::new(name).ok()?;
        self.tags.get(&name)
    }

    pub fn tag_mut(&mut self, name: &str) -> Option<&mut Tag> {
        let name = TagName::new(name).ok()?;
        self.tags.get_mut(&name)
    }

    pub fn tag_exists(&self, name: &str) -> bool {
        self.tag(name).is_some()
    }

    /// Tags in name order.
    pub fn tags(&self) -> impl Iterator<Item = &Tag> + '_ {
        self.tags.values()
    }

    fn existing_tag_mut(&mut self, name: &str) -> Result<&mut Tag, Error> {
        let name = TagName::new(name)?;
        self.tags.get_mut(&name).ok_or(Error::UnknownTag(name))
    }

    pub fn add_attribute(
        &mut self,
        tag: &str,
        name: &str,
        attribute_type: AttributeType,
    ) -> Result<&mut Attribute, Error> {
        self.existing_tag_mut(tag)?.add_attribute(name, attribute_type)
    }

    pub fn remove_attribute(&mut self, tag: &str, name: &str) -> Result<Attribute, Error> {
        self.existing_tag_mut(tag)?.remove_attribute(name)
    }

    /// Replace the filter chain of an attribute. Every filter must be
    /// registered.
    pub fn set_filter_chain<'f>(
        &mut self,
        tag: &str,
        attribute: &str,
        filters: impl IntoIterator<Item = &'f str>,
    ) -> Result<(), Error> {
        let chain = filters
            .into_iter()
            .map(|filter| {
                let filter = normalize_filter_name(filter)?;
                if !self.filters.contains(&filter) {
                    return Err(Error::UnknownFilter(filter));
                }
                Ok(filter)
            })
            .collect::<Result<Vec<_>, Error>>()?;
        let tag = self.existing_tag_mut(tag)?;
        let tag_name = tag.name().clone();
        let attribute = tag
            .attribute_mut(attribute)
            .ok_or_else(|| match AttributeName::new(attribute) {
                Ok(attribute) => Error::UnknownAttribute {
                    tag: tag_name,
                    attribute,
                },
                Err(error) => error,
            })?;
        attribute.filter_chain = chain;
        Ok(())
    }

    /// Add a rule and the rule it implies. The target does not need to
    /// exist.
    pub fn add_rule(&mut self, tag: &str, action: RuleAction, target: &str) -> Result<(), Error> {
        let target = TagName::new(target)?;
        self.existing_tag_mut(tag)?.rules.add(action, target);
        Ok(())
    }

    /// Add a rule by the name of its action, e.g. `denyChild`.
    pub fn add_rule_str(&mut self, tag: &str, action: &str, target: &str) -> Result<(), Error> {
        let action = action.parse::<RuleAction>()?;
        self.add_rule(tag, action, target)
    }

    /// Remove a single rule. Returns whether it was there.
    pub fn remove_rule(
        &mut self,
        tag: &str,
        action: RuleAction,
        target: &str,
    ) -> Result<bool, Error> {
        let target = TagName::new(target)?;
        Ok(self.existing_tag_mut(tag)?.rules.remove(action, target.as_str()))
    }

    /// Parse, normalize and check a template, then store it on the tag.
    pub fn set_template(
        &mut self,
        tag: &str,
        source: &str,
        flags: TemplateFlags,
    ) -> Result<(), Error> {
        let options = ParseOptions {
            preserve_whitespace: flags.preserve_whitespace,
        };
        let mut template = parse_template(source, &options)?;
        self.normalizer.normalize(&mut template);

        let name = TagName::new(tag)?;
        let tag = self.tags.get(&name).ok_or(Error::UnknownTag(name.clone()))?;
        if !flags.allow_unsafe {
            TemplateChecker::new(&self.filters)
                .with_options(self.checker_options)
                .check(&template, tag)
                .map_err(|source| Error::UnsafeTemplate {
                    tag: name.clone(),
                    source,
                })?;
            self.trusted_templates.remove(&name);
        } else {
            self.trusted_templates.insert(name.clone());
        }
        self.existing_tag_mut(name.as_str())?.set_template(template);
        Ok(())
    }

    /// Add the rules derived from the HTML5 content model of every tag's
    /// template.
    pub fn add_rules_from_html5(&mut self, deriver: &Html5RuleDeriver) -> Result<(), Error> {
        let derived = deriver.derive(
            self.tags
                .values()
                .map(|tag| (tag.name().clone(), tag.template())),
        )?;
        for (name, derived) in derived {
            let Some(tag) = self.tags.get_mut(&name) else {
                continue;
            };
            tag.rules
                .extend(derived.rules.iter().map(|(action, target)| (action, target.clone())));
            tag.options.disallow_as_root |= derived.disallow_as_root;
            tag.options.disabled |= derived.disabled;
            tag.options.transparent |= derived.transparent;
        }
        Ok(())
    }

    /// Build the rule table. Templates are checked again first, since
    /// attributes and filters may have changed since they were set.
    pub fn compile(&self) -> Result<RuleTable, Error> {
        let checker = TemplateChecker::new(&self.filters).with_options(self.checker_options);
        for tag in self.tags.values() {
            if self.trusted_templates.contains(tag.name()) {
                continue;
            }
            if let Some(template) = tag.template() {
                checker
                    .check(template, tag)
                    .map_err(|source| Error::UnsafeTemplate {
                        tag: tag.name().clone(),
                        source,
                    })?;
            }
        }
        Ok(compiler::compile(self.tags.values()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_names_are_case_insensitive() {
        let mut config = Configuration::new();
        config.add_tag("b").unwrap();
        assert!(config.tag_exists("B"));
        assert_eq!(config.tag("b").unwrap().name().as_str(), "B");
        assert!(matches!(config.add_tag("B"), Err(Error::TagExists(_))));
    }

    #[test]
    fn test_unknown_tag() {
        let mut config = Configuration::new();
        assert!(matches!(
            config.add_rule("X", RuleAction::AllowChild, "Y"),
            Err(Error::UnknownTag(_))
        ));
        assert!(matches!(config.remove_tag("X"), Err(Error::UnknownTag(_))));
    }

    #[test]
    fn test_trusted_template_is_not_rechecked() {
        let mut config = Configuration::new();
        config.add_tag("X").unwrap();
        let flags = TemplateFlags {
            allow_unsafe: true,
            ..Default::default()
        };
        config
            .set_template("X", "<script><xsl:apply-templates/></script>", flags)
            .unwrap();
        assert!(config.compile().is_ok());
    }
}
