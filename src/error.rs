use crate::checker::UnsafeTemplateError;
use crate::name::{AttributeName, TagName};

/// Configuration errors.
///
/// These are raised at the declaration boundary, before anything reaches the
/// compiler or the checker.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The string is not a valid tag name.
    #[error("Invalid tag name '{0}'")]
    InvalidTagName(String),
    /// The string is not a valid attribute name.
    #[error("Invalid attribute name '{0}'")]
    InvalidAttributeName(String),
    /// The string is not a valid filter name.
    #[error("Invalid filter name '{0}'")]
    InvalidFilterName(String),
    /// A tag with this name was already declared.
    #[error("Tag '{0}' already exists")]
    TagExists(TagName),
    /// The tag was never declared.
    #[error("Tag '{0}' does not exist")]
    UnknownTag(TagName),
    /// The attribute was already declared on this tag.
    #[error("Attribute '{attribute}' already exists in tag '{tag}'")]
    AttributeExists {
        tag: TagName,
        attribute: AttributeName,
    },
    /// The attribute was never declared on this tag.
    #[error("Attribute '{attribute}' does not exist in tag '{tag}'")]
    UnknownAttribute {
        tag: TagName,
        attribute: AttributeName,
    },
    /// The rule action is not one of the known actions.
    #[error("Unknown rule action '{0}'")]
    UnknownRuleAction(String),
    /// The filter is not registered.
    #[error("Unknown filter '{0}'")]
    UnknownFilter(String),
    /// The name does not refer to an element of the HTML5 table.
    #[error("Unknown HTML element '{0}'")]
    UnknownHtmlElement(String),
    /// A rule table rebuilt from compiled tags is not self-consistent.
    #[error("Invalid rule table: {0}")]
    InvalidRuleTable(String),
    /// The template could not be parsed.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// The template was rejected by the safety checker.
    #[error("Unsafe template for tag '{tag}': {source}")]
    UnsafeTemplate {
        tag: TagName,
        #[source]
        source: UnsafeTemplateError,
    },
}

/// Errors raised while building a template from its source text.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The tokenizer rejected the input.
    #[error("Invalid XML: {0}")]
    XmlParser(#[from] xmlparser::Error),
    /// A close tag does not match the open element.
    #[error("Invalid close tag '{found}', expected '{expected}'")]
    InvalidCloseTag { expected: String, found: String },
    /// A close tag was found without any open element.
    #[error("Unexpected close tag '{0}'")]
    UnexpectedCloseTag(String),
    /// The input ended with elements still open.
    #[error("Premature end of data in tag '{0}'")]
    UnclosedElement(String),
    /// A prefix is used that was never declared.
    #[error("Unknown namespace prefix '{0}'")]
    UnknownPrefix(String),
    /// An entity reference was not terminated by `;`.
    #[error("Unclosed entity '&{0}'")]
    UnclosedEntity(String),
    /// An entity reference is neither predefined nor a character reference.
    #[error("Invalid entity '&{0};'")]
    InvalidEntity(String),
    /// An XSL instruction lacks a mandatory attribute.
    #[error("Missing attribute '{attribute}' on 'xsl:{element}'")]
    MissingAttribute {
        element: String,
        attribute: &'static str,
    },
    /// The byte input could not be decoded.
    #[error("Cannot decode template as {0}")]
    Encoding(&'static str),
}
