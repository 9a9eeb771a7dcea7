//! Which output contexts are dangerous.
use crate::filter::Sink;

/// Attributes whose value is a URL.
const URL_ATTRIBUTES: &[&str] = &[
    "action",
    "background",
    "cite",
    "classid",
    "codebase",
    "data",
    "formaction",
    "href",
    "icon",
    "longdesc",
    "lowsrc",
    "manifest",
    "pluginspage",
    "poster",
    "profile",
    "src",
    "usemap",
    "xlink:href",
];

/// Values of a `<param name>` whose `value` is a URL.
const URL_PARAMS: &[&str] = &["code", "movie", "src", "url"];

pub(crate) fn is_url_attribute(attribute: &str) -> bool {
    URL_ATTRIBUTES.contains(&attribute.to_ascii_lowercase().as_str())
}

pub(crate) fn is_url_param(param_name: &str) -> bool {
    URL_PARAMS.contains(&param_name.to_ascii_lowercase().as_str())
}

/// The sink of the content of an element. `element` is lowercase.
pub(crate) fn element_sink(element: &str) -> Option<Sink> {
    match element {
        "script" => Some(Sink::Js),
        "style" => Some(Sink::Css),
        _ => None,
    }
}

/// The sink of an attribute value. `element` is lowercase. `param_name` is
/// the `name` of a `<param>` element.
pub(crate) fn attribute_sink(
    element: &str,
    attribute: &str,
    param_name: Option<&str>,
) -> Option<Sink> {
    let attribute = attribute.to_ascii_lowercase();
    if attribute.starts_with("on") {
        Some(Sink::Js)
    } else if attribute == "style" {
        Some(Sink::Css)
    } else if is_url_attribute(&attribute) || is_url_param_value(element, &attribute, param_name)
    {
        Some(Sink::Url)
    } else {
        None
    }
}

/// Whether the attribute is the URL of a `<param>`.
pub(crate) fn is_url_param_value(element: &str, attribute: &str, param_name: Option<&str>) -> bool {
    element == "param"
        && attribute.eq_ignore_ascii_case("value")
        && param_name.is_some_and(is_url_param)
}

/// Whether a URL starts with `mailto:`.
pub(crate) fn is_mailto(prefix: &str) -> bool {
    prefix
        .get(..7)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("mailto:"))
}

/// Whether a literal URL prefix fixes the scheme and the host, i.e. it
/// matches `(https?:)?//host/`.
pub(crate) fn has_fixed_origin(prefix: &str) -> bool {
    let lowercase = prefix.to_ascii_lowercase();
    let rest = lowercase
        .strip_prefix("https:")
        .or_else(|| lowercase.strip_prefix("http:"))
        .unwrap_or(&lowercase);
    let Some(authority) = rest.strip_prefix("//") else {
        return false;
    };
    authority.find('/').is_some_and(|slash| slash > 0)
}

/// Whether the text has a run of `{` of odd length, i.e. an unescaped
/// expression in an attribute value template.
pub(crate) fn has_expression(value: &str) -> bool {
    let mut run = 0;
    for c in value.chars().chain(std::iter::once('\0')) {
        if c == '{' {
            run += 1;
        } else {
            if run % 2 == 1 {
                return true;
            }
            run = 0;
        }
    }
    false
}
