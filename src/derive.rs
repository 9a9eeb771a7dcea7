//! Derive nesting rules from the HTML5 content model.
//!
//! Every tag's template is walked statically to find the HTML elements it
//! opens at its top level, the categories of every element it emits and,
//! at each `xsl:apply-templates`, the categories of content its HTML
//! ancestors accept. Comparing these across tags yields `allowChild`,
//! `denyChild`, `denyDescendant` and `closeParent` rules.
//!
//! ```rust
//! use tagrules::{parse_template, Html5RuleDeriver, ParseOptions, RuleAction, TagName};
//!
//! let options = ParseOptions::default();
//! let li = parse_template("<li><xsl:apply-templates/></li>", &options)?;
//! let ul = parse_template("<ul><xsl:apply-templates/></ul>", &options)?;
//! let tags = [
//!     (TagName::new("LI")?, Some(&li)),
//!     (TagName::new("UL")?, Some(&ul)),
//! ];
//! let derived = Html5RuleDeriver::new().derive(tags)?;
//!
//! let ul_rules = &derived.get("UL").unwrap().rules;
//! assert!(ul_rules.contains(RuleAction::AllowChild, "LI"));
//! assert!(ul_rules.contains(RuleAction::DenyChild, "UL"));
//! let li_rules = &derived.get("LI").unwrap().rules;
//! assert!(li_rules.contains(RuleAction::CloseParent, "LI"));
//! # Ok::<(), tagrules::Error>(())
//! ```
use std::collections::BTreeMap;

use crate::error::Error;
use crate::html5::{self, Field};
use crate::name::TagName;
use crate::rule::{RuleAction, RuleSet};
use crate::template::{Element, Node, Template, Value};

/// Options a tag receives from derivation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivedTagOptions {
    pub rules: RuleSet,
    /// The tag cannot be a direct child of the root element.
    pub disallow_as_root: bool,
    /// The tag cannot appear anywhere below the root element.
    pub disabled: bool,
    /// Every HTML ancestor of the tag's content has a transparent content
    /// model.
    pub transparent: bool,
}

/// Derived options, by tag name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivedRules {
    tags: BTreeMap<TagName, DerivedTagOptions>,
}

impl DerivedRules {
    pub fn get(&self, name: &str) -> Option<&DerivedTagOptions> {
        self.tags.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TagName, &DerivedTagOptions)> + '_ {
        self.tags.iter()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl IntoIterator for DerivedRules {
    type Item = (TagName, DerivedTagOptions);
    type IntoIter = std::collections::btree_map::IntoIter<TagName, DerivedTagOptions>;

    fn into_iter(self) -> Self::IntoIter {
        self.tags.into_iter()
    }
}

/// What a template tells us about the HTML structure of its tag.
#[derive(Debug, Default)]
struct TemplateInfo {
    first_children: Vec<u32>,
    first_children_names: Vec<String>,
    used_categories: u32,
    denied_descendants: u32,
    allowed_children: Vec<u32>,
    last_children: Vec<String>,
    transparent: Option<bool>,
}

fn element_name(element: &Element) -> String {
    element.name.to_ascii_lowercase()
}

fn bits(field: Field, element: &Element) -> u32 {
    if !element.is_html() {
        return 0;
    }
    html5::element(&element_name(element))
        .map_or(0, |descriptor| descriptor.bits(field, element))
}

fn is_transparent(element: &Element) -> bool {
    element.is_html()
        && html5::element(&element_name(element)).is_some_and(|descriptor| descriptor.transparent)
}

impl TemplateInfo {
    fn new(template: &Template) -> Self {
        let mut info = TemplateInfo::default();
        for node in template.descendants(template.root()) {
            match template.value(node) {
                Value::Element(element) => {
                    info.used_categories |= bits(Field::Categories, element);
                    let nested = template
                        .ancestors(node)
                        .any(|ancestor| template.element(ancestor).is_some());
                    if !nested {
                        info.first_children.push(bits(Field::Categories, element));
                        info.first_children_names.push(element_name(element));
                    }
                }
                Value::ApplyTemplates(_) => info.substitution_point(template, node),
                _ => {}
            }
        }
        info
    }

    fn substitution_point(&mut self, template: &Template, node: Node) {
        // Ancestors from the outermost in.
        let mut ancestors = template
            .ancestors(node)
            .filter_map(|ancestor| template.element(ancestor))
            .collect::<Vec<_>>();
        ancestors.reverse();

        let Some(innermost) = ancestors.last() else {
            // Nothing constrains the content.
            self.allowed_children.push(u32::MAX);
            return;
        };
        self.last_children.push(element_name(innermost));

        let mut allowed: Option<u32> = None;
        for element in &ancestors {
            self.denied_descendants |= bits(Field::DeniedDescendants, element);
            let accumulated = if !is_transparent(element) {
                self.transparent = Some(false);
                0
            } else if let Some(accumulated) = allowed {
                accumulated
            } else {
                self.transparent.get_or_insert(true);
                bits(Field::Categories, element)
            };
            allowed = Some(accumulated | bits(Field::AllowedChildren, element));
        }
        self.allowed_children.push(allowed.unwrap_or(0));
    }
}

/// Derives nesting rules from the HTML5 content model of tag templates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Html5RuleDeriver {
    root_element: Option<String>,
}

impl Html5RuleDeriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// The HTML element the rendered markup is placed in. Tags it does not
    /// accept as children are disallowed as root and tags it does not accept
    /// as descendants are disabled.
    pub fn root_element(mut self, name: impl Into<String>) -> Self {
        self.root_element = Some(name.into());
        self
    }

    /// Derive options for every tag. A tag without a template renders its
    /// content as is.
    pub fn derive<'a>(
        &self,
        tags: impl IntoIterator<Item = (TagName, Option<&'a Template>)>,
    ) -> Result<DerivedRules, Error> {
        let root = self.root_template()?;

        // The synthetic root has no name.
        let default_template = Template::apply_templates();
        let mut infos: Vec<(Option<TagName>, TemplateInfo)> = tags
            .into_iter()
            .map(|(name, template)| {
                let info = TemplateInfo::new(template.unwrap_or(&default_template));
                (Some(name), info)
            })
            .collect();
        if let Some(root) = &root {
            infos.push((None, TemplateInfo::new(root)));
        }

        let mut options: Vec<(Option<TagName>, DerivedTagOptions)> = infos
            .iter()
            .map(|(name, info)| {
                let options = DerivedTagOptions {
                    transparent: info.transparent == Some(true),
                    ..Default::default()
                };
                (name.clone(), options)
            })
            .collect();
        // Rules targeting the synthetic root are dropped.
        let mut collected: Vec<Vec<(RuleAction, Option<TagName>)>> = vec![Vec::new(); infos.len()];

        for (index, (_, info)) in infos.iter().enumerate() {
            let rules = &mut collected[index];

            for first_child in &info.first_children_names {
                let Some(closes) = html5::element(first_child).map(|d| d.closes) else {
                    continue;
                };
                for (target, target_info) in &infos {
                    for last_child in &target_info.last_children {
                        if closes.contains(&last_child.as_str()) {
                            rules.push((RuleAction::CloseParent, target.clone()));
                        }
                    }
                }
            }

            if info.allowed_children.is_empty() {
                for (target, _) in &infos {
                    rules.push((RuleAction::DenyChild, target.clone()));
                }
            }
            for allowed in &info.allowed_children {
                for (target, target_info) in &infos {
                    for first_child in &target_info.first_children {
                        let action = if allowed & first_child != 0 {
                            RuleAction::AllowChild
                        } else {
                            RuleAction::DenyChild
                        };
                        rules.push((action, target.clone()));
                    }
                }
            }

            for (target, target_info) in &infos {
                if info.denied_descendants & target_info.used_categories != 0 {
                    rules.push((RuleAction::DenyDescendant, target.clone()));
                }
            }
        }

        for (index, rules) in collected.into_iter().enumerate() {
            let is_root = options[index].0.is_none();
            for (action, target) in rules {
                match (is_root, target) {
                    (true, Some(target)) => {
                        let flag = options
                            .iter_mut()
                            .find(|(name, _)| name.as_ref() == Some(&target))
                            .map(|(_, options)| options);
                        match (action, flag) {
                            (RuleAction::DenyChild, Some(options)) => {
                                options.disallow_as_root = true
                            }
                            (RuleAction::DenyDescendant, Some(options)) => options.disabled = true,
                            _ => {}
                        }
                    }
                    (false, Some(target)) => {
                        let (name, options) = &mut options[index];
                        tracing::trace!(
                            tag = name.as_ref().map(TagName::as_str),
                            %action,
                            %target,
                            "derived rule"
                        );
                        options.rules.insert(action, target);
                    }
                    (_, None) => {}
                }
            }
        }

        let tags = options
            .into_iter()
            .filter_map(|(name, mut options)| {
                resolve_conflicts(&mut options.rules);
                name.map(|name| (name, options))
            })
            .collect();
        Ok(DerivedRules { tags })
    }

    fn root_template(&self) -> Result<Option<Template>, Error> {
        let Some(name) = &self.root_element else {
            return Ok(None);
        };
        if html5::element(name).is_none() {
            return Err(Error::UnknownHtmlElement(name.clone()));
        }
        let mut template = Template::new();
        let element = template.new_node(Value::Element(Element::new(name.as_str())));
        let apply = template.new_node(Value::ApplyTemplates(None));
        template.append(element, apply);
        template.append(template.root(), element);
        Ok(Some(template))
    }
}

/// Stronger rules remove weaker ones for the same target: `denyDescendant`
/// over `denyChild` and `allowChild`, then `denyChild` over `allowChild`.
///
/// The rule compiler applies the same precedence to declared rules.
pub(crate) fn resolve_conflicts(rules: &mut RuleSet) {
    const PRECEDENCE: [(RuleAction, RuleAction); 3] = [
        (RuleAction::DenyDescendant, RuleAction::DenyChild),
        (RuleAction::DenyDescendant, RuleAction::AllowChild),
        (RuleAction::DenyChild, RuleAction::AllowChild),
    ];
    for (stronger, weaker) in PRECEDENCE {
        let targets = rules.targets(stronger).cloned().collect::<Vec<_>>();
        for target in targets {
            rules.remove(weaker, target.as_str());
        }
    }
}
