//! Compile BBCode-like tag rules into compact bitfields, derive rules from
//! the HTML5 content model of tag templates, and check XSLT templates for
//! unsafe output.
//!
//! ```rust
//! use tagrules::{compile, RuleAction, Tag};
//!
//! let mut b = Tag::new("B")?;
//! b.rules.add(RuleAction::DenyChild, tagrules::TagName::new("B")?);
//! let i = Tag::new("I")?;
//!
//! let table = compile([&b, &i]);
//! assert!(table.allows_child("B", "I"));
//! assert!(!table.allows_child("B", "B"));
//! # Ok::<(), tagrules::Error>(())
//! ```
#![forbid(unsafe_code)]

mod access;
mod avt;
mod bitfield;
mod checker;
mod compiler;
mod config;
mod derive;
mod encoding;
mod entity;
mod error;
mod filter;
pub mod html5;
mod idmap;
mod name;
mod normalize;
mod parse;
mod rule;
mod tag;
mod template;
mod xpath;

pub use avt::{is_literal, literal_prefix, parse_avt, AvtError, AvtPart};
pub use bitfield::Bitfield;
pub use checker::{
    CheckerOptions, FlashSetting, TemplateChecker, UnknownFlashSetting, Unsafe,
    UnsafeTemplateError,
};
pub use compiler::{compile, CompiledTag, RuleTable};
pub use config::{Configuration, TemplateFlags};
pub use derive::{DerivedRules, DerivedTagOptions, Html5RuleDeriver};
pub use error::{Error, ParseError};
pub use filter::{normalize_filter_name, FilterLookup, FilterRegistry, SafeContexts, Sink};
pub use name::{is_valid_attribute_name, is_valid_tag_name, AttributeName, TagName};
pub use normalize::{
    ConvertCurlyExpressionsInText, InlineLiteralValueOf, MergeIdenticalConditionalBranches,
    Normalization, TemplateNormalizer,
};
pub use parse::{parse_template, parse_template_bytes, ParseOptions};
pub use rule::{RuleAction, RuleSet};
pub use tag::{Attribute, AttributeType, Policy, Tag, TagOptions};
pub use template::{
    AttributeConstructor, Comment, DynamicElement, Element, Expression, ExpressionKind,
    Instruction, Node, ProcessingInstruction, Template, Text, Value, ValueOf, ValueType,
    XHTML_NAMESPACE, XSL_NAMESPACE,
};
pub use xpath::{Axis, Expr, ExprError, NodeTest, Operator, Step};
