use std::borrow::Borrow;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::error::Error;

/// The name of a tag.
///
/// Tag names are case-insensitive. They are validated and stored in
/// uppercase, so `b`, `B` and `TagName::new("b")` all refer to the same tag.
///
/// ```rust
/// use tagrules::TagName;
///
/// let name = TagName::new("url")?;
/// assert_eq!(name.as_str(), "URL");
/// assert!(TagName::new("1st").is_err());
/// # Ok::<(), tagrules::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TagName(String);

impl TagName {
    /// Validate and normalize a tag name.
    pub fn new(name: &str) -> Result<Self, Error> {
        if !is_valid_tag_name(name) {
            return Err(Error::InvalidTagName(name.to_string()));
        }
        Ok(TagName(name.to_ascii_uppercase()))
    }

    /// The normalized name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Tag names are made of ASCII letters, digits and underscores and don't
/// start with a digit.
pub fn is_valid_tag_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl FromStr for TagName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TagName::new(s)
    }
}

impl Display for TagName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TagName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for TagName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// The name of a tag's attribute.
///
/// Attribute names are case-insensitive and stored in lowercase. Unlike tag
/// names they may contain dashes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AttributeName(String);

impl AttributeName {
    /// Validate and normalize an attribute name.
    pub fn new(name: &str) -> Result<Self, Error> {
        if !is_valid_attribute_name(name) {
            return Err(Error::InvalidAttributeName(name.to_string()));
        }
        Ok(AttributeName(name.to_ascii_lowercase()))
    }

    /// The normalized name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

pub fn is_valid_attribute_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl FromStr for AttributeName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AttributeName::new(s)
    }
}

impl Display for AttributeName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AttributeName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for AttributeName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_name_is_uppercased() {
        assert_eq!(TagName::new("quote").unwrap().as_str(), "QUOTE");
        assert_eq!(TagName::new("_x1").unwrap().as_str(), "_X1");
    }

    #[test]
    fn test_invalid_tag_names() {
        for name in ["", "1a", "a-b", "fake-root", "a b", "é"] {
            assert!(TagName::new(name).is_err(), "{name}");
        }
    }

    #[test]
    fn test_attribute_name_is_lowercased() {
        assert_eq!(AttributeName::new("Data-Id").unwrap().as_str(), "data-id");
        assert!(AttributeName::new("-x").is_err());
    }
}
