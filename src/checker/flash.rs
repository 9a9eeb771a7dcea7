//! The `allowscriptaccess` setting of Flash `<embed>` and `<object>`
//! elements.
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use super::{constructed_name, sinks, Unsafe, UnsafeTemplateError};
use crate::template::{Node, Template, Value};

const SETTING: &str = "allowscriptaccess";

/// How much a Flash movie may script the page, from least to most.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "camelCase")
)]
pub enum FlashSetting {
    Never,
    SameDomain,
    Always,
}

impl FlashSetting {
    /// What Flash players assume when the setting is absent.
    pub const DEFAULT: FlashSetting = FlashSetting::SameDomain;

    pub fn as_str(&self) -> &'static str {
        match self {
            FlashSetting::Never => "never",
            FlashSetting::SameDomain => "sameDomain",
            FlashSetting::Always => "always",
        }
    }
}

/// The string is not an `allowscriptaccess` value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown AllowScriptAccess value '{0}'")]
pub struct UnknownFlashSetting(String);

impl FromStr for FlashSetting {
    type Err = UnknownFlashSetting;

    /// Values are case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "never" => Ok(FlashSetting::Never),
            "samedomain" => Ok(FlashSetting::SameDomain),
            "always" => Ok(FlashSetting::Always),
            _ => Err(UnknownFlashSetting(s.to_string())),
        }
    }
}

impl Display for FlashSetting {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check that an `<embed>` or `<object>` does not allow more than `max`.
/// Other nodes pass.
pub(crate) fn check_element(
    template: &Template,
    node: Node,
    max: FlashSetting,
) -> Result<(), UnsafeTemplateError> {
    match constructed_name(template, node).as_deref() {
        Some("embed") => check_embed(template, node, max),
        Some("object") => check_object(template, node, max),
        _ => Ok(()),
    }
}

fn is_attribute_constructor(template: &Template, node: Node, name: &str) -> bool {
    matches!(
        template.value(node),
        Value::Attribute(attribute) if attribute.name.eq_ignore_ascii_case(name)
    )
}

fn check_embed(template: &Template, embed: Node, max: FlashSetting) -> Result<(), UnsafeTemplateError> {
    if let Some(node) = template
        .descendants(embed)
        .skip(1)
        .find(|node| is_attribute_constructor(template, *node, SETTING))
    {
        return Err(UnsafeTemplateError::new(Unsafe::DynamicFlashAttribute, node));
    }
    match template
        .element(embed)
        .and_then(|element| element.attribute(SETTING))
    {
        Some(setting) => check_setting(embed, setting, max),
        None => check_setting(embed, FlashSetting::DEFAULT.as_str(), max),
    }
}

/// Settings are `<param>` elements. A `<param>` nested deeper than a direct
/// child may belong to a fallback object or be conditional, so it is
/// checked but does not replace the default.
fn check_object(
    template: &Template,
    object: Node,
    max: FlashSetting,
) -> Result<(), UnsafeTemplateError> {
    let mut use_default = true;
    for param in template.descendants(object).skip(1) {
        let Some(element) = template.element(param) else {
            continue;
        };
        let is_setting = element.name.eq_ignore_ascii_case("param")
            && element
                .attribute("name")
                .is_some_and(|name| name.eq_ignore_ascii_case(SETTING));
        if !is_setting {
            continue;
        }
        check_setting(param, element.attribute("value").unwrap_or_default(), max)?;
        if let Some(node) = template
            .descendants(param)
            .skip(1)
            .find(|node| is_attribute_constructor(template, *node, "value"))
        {
            return Err(UnsafeTemplateError::new(Unsafe::DynamicFlashAttribute, node));
        }
        if template.parent(param) == Some(object) {
            use_default = false;
        }
    }
    if use_default {
        check_setting(object, FlashSetting::DEFAULT.as_str(), max)?;
    }
    Ok(())
}

fn check_setting(node: Node, setting: &str, max: FlashSetting) -> Result<(), UnsafeTemplateError> {
    let kind = match setting.parse::<FlashSetting>() {
        Ok(value) if value <= max => return Ok(()),
        Ok(_) => Unsafe::ScriptAccessExceeds {
            setting: setting.to_string(),
            max,
        },
        Err(_) if sinks::has_expression(setting) => {
            Unsafe::UnassessableScriptAccess(setting.to_string())
        }
        Err(_) => Unsafe::UnknownScriptAccess(setting.to_string()),
    };
    Err(UnsafeTemplateError::new(kind, node))
}
