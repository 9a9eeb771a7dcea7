//! Compile tag rules into the bitfield rule table.
//!
//! Enabled tags are sorted by name and numbered; bit `i` of every bitfield
//! refers to the tag numbered `i`. Each tag gets two bitfields, the tags it
//! allows as direct children and the tags it allows as descendants.
//!
//! ```rust
//! use tagrules::{compile, Policy, RuleAction, Tag};
//!
//! let mut a = Tag::new("A")?;
//! let mut b = Tag::new("B")?;
//! b.options.default_child_rule = Policy::Deny;
//! b.rules.add(RuleAction::AllowChild, a.name().clone());
//! a.rules.add(RuleAction::DenyDescendant, b.name().clone());
//!
//! let table = compile([&a, &b]);
//! assert!(table.allows_child("B", "A"));
//! assert!(!table.allows_child("B", "B"));
//! assert!(!table.allows_child("A", "B"));
//! # Ok::<(), tagrules::Error>(())
//! ```
use std::collections::BTreeMap;

use crate::bitfield::Bitfield;
use crate::error::Error;
use crate::idmap::{IdIndex, IdMap};
use crate::name::TagName;
use crate::rule::RuleAction;
use crate::tag::{Policy, Tag};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Ordinal(usize);

impl IdIndex<Ordinal> for Ordinal {
    fn to_id(index: usize) -> Ordinal {
        Ordinal(index)
    }

    fn from_id(id: Ordinal) -> usize {
        id.0
    }
}

/// The compiled rules of one enabled tag.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CompiledTag {
    pub name: TagName,
    pub ordinal: usize,
    pub allowed_children: Bitfield,
    pub allowed_descendants: Bitfield,
    pub disallow_as_root: bool,
    pub nesting_limit: u32,
    pub tag_limit: u32,
    pub close_ancestor: Vec<TagName>,
    pub close_parent: Vec<TagName>,
    pub reopen_child: Vec<TagName>,
    /// Kept as declared, even when the target is not enabled.
    pub require_ancestor: Vec<TagName>,
    /// Kept as declared, even when the target is not enabled.
    pub require_parent: Vec<TagName>,
}

/// The compiled rule table, in ordinal order.
#[derive(Debug, Clone)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "Vec<CompiledTag>", into = "Vec<CompiledTag>")
)]
pub struct RuleTable {
    ordinals: IdMap<Ordinal, TagName>,
    tags: Vec<CompiledTag>,
}

impl RuleTable {
    /// The ordinal of an enabled tag. The name is case-insensitive.
    pub fn ordinal(&self, name: &str) -> Option<usize> {
        self.ordinals
            .get(name)
            .or_else(|| self.ordinals.get(name.to_ascii_uppercase().as_str()))
            .map(Ordinal::from_id)
    }

    pub fn get(&self, name: &str) -> Option<&CompiledTag> {
        self.ordinal(name).and_then(|ordinal| self.tags.get(ordinal))
    }

    pub fn by_ordinal(&self, ordinal: usize) -> Option<&CompiledTag> {
        self.tags.get(ordinal)
    }

    /// The name of the tag with this ordinal.
    pub fn name(&self, ordinal: usize) -> Option<&TagName> {
        (ordinal < self.ordinals.len()).then(|| self.ordinals.get_value(Ordinal(ordinal)))
    }

    /// Whether `child` may be a direct child of `parent`. Tags that are not
    /// enabled allow nothing and are allowed nowhere.
    pub fn allows_child(&self, parent: &str, child: &str) -> bool {
        match (self.get(parent), self.ordinal(child)) {
            (Some(parent), Some(child)) => parent.allowed_children.get(child),
            _ => false,
        }
    }

    pub fn allows_descendant(&self, ancestor: &str, descendant: &str) -> bool {
        match (self.get(ancestor), self.ordinal(descendant)) {
            (Some(ancestor), Some(descendant)) => ancestor.allowed_descendants.get(descendant),
            _ => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompiledTag> + '_ {
        self.tags.iter()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl PartialEq for RuleTable {
    fn eq(&self, other: &Self) -> bool {
        self.tags == other.tags
    }
}

impl Eq for RuleTable {}

/// Rebuild a table from its compiled tags, e.g. after deserialization.
///
/// The tags may come in any order, but their ordinals must number them
/// `0..n` with distinct names, and every bitfield must be `n` bits wide.
impl TryFrom<Vec<CompiledTag>> for RuleTable {
    type Error = Error;

    fn try_from(mut tags: Vec<CompiledTag>) -> Result<Self, Error> {
        tags.sort_by_key(|tag| tag.ordinal);
        let len = tags.len();
        let mut ordinals = IdMap::new();
        for (index, tag) in tags.iter().enumerate() {
            if tag.ordinal != index {
                return Err(Error::InvalidRuleTable(format!(
                    "tag '{}' has ordinal {}, expected {}",
                    tag.name, tag.ordinal, index
                )));
            }
            if Ordinal::from_id(ordinals.get_id(tag.name.clone())) != index {
                return Err(Error::InvalidRuleTable(format!(
                    "tag '{}' appears more than once",
                    tag.name
                )));
            }
            if tag.allowed_children.len() != len || tag.allowed_descendants.len() != len {
                return Err(Error::InvalidRuleTable(format!(
                    "bitfields of tag '{}' are not {} bits wide",
                    tag.name, len
                )));
            }
        }
        Ok(RuleTable { ordinals, tags })
    }
}

impl From<RuleTable> for Vec<CompiledTag> {
    fn from(table: RuleTable) -> Self {
        table.tags
    }
}

/// Compile tags into a rule table.
///
/// Disabled tags are left out and take no ordinal. Rules that target a tag
/// outside the enabled set are dropped, except `requireParent` and
/// `requireAncestor` which are carried through as declared. When two tags
/// share a name the last one wins.
pub fn compile<'a>(tags: impl IntoIterator<Item = &'a Tag>) -> RuleTable {
    let enabled = tags
        .into_iter()
        .filter(|tag| !tag.options.disabled)
        .map(|tag| (tag.name(), tag))
        .collect::<BTreeMap<_, _>>();

    let mut ordinals = IdMap::<Ordinal, TagName>::new();
    for name in enabled.keys() {
        ordinals.get_id((*name).clone());
    }
    let universe = ordinals.len();

    let tags = enabled
        .values()
        .enumerate()
        .map(|(ordinal, tag)| compile_tag(tag, ordinal, universe, &ordinals))
        .collect::<Vec<_>>();

    tracing::info!(tags = tags.len(), "compiled rule table");
    RuleTable { ordinals, tags }
}

fn compile_tag(
    tag: &Tag,
    ordinal: usize,
    universe: usize,
    ordinals: &IdMap<Ordinal, TagName>,
) -> CompiledTag {
    let initial = |policy| match policy {
        Policy::Allow => Bitfield::filled(universe),
        Policy::Deny => Bitfield::new(universe),
    };
    let mut allowed_children = initial(tag.options.default_child_rule);
    let mut allowed_descendants = initial(tag.options.default_descendant_rule);

    let resolve = |action: RuleAction| {
        tag.rules.targets(action).filter_map(move |target| {
            let found = ordinals.get(target.as_str()).map(Ordinal::from_id);
            if found.is_none() {
                tracing::debug!(
                    tag = %tag.name(),
                    %target,
                    %action,
                    "dropping rule that targets a tag outside the enabled set"
                );
            }
            found
        })
    };

    // allow first, so that deny wins
    for target in resolve(RuleAction::AllowChild) {
        allowed_children.set(target, true);
    }
    for target in resolve(RuleAction::AllowDescendant) {
        allowed_descendants.set(target, true);
    }
    for target in resolve(RuleAction::DenyChild) {
        allowed_children.set(target, false);
    }
    for target in resolve(RuleAction::DenyDescendant) {
        allowed_descendants.set(target, false);
        allowed_children.set(target, false);
    }
    allowed_children.intersect_with(&allowed_descendants);

    let names = |action| {
        resolve(action)
            .map(|target| ordinals.get_value(Ordinal(target)).clone())
            .collect::<Vec<_>>()
    };
    let declared = |action| tag.rules.targets(action).cloned().collect::<Vec<_>>();

    CompiledTag {
        name: tag.name().clone(),
        ordinal,
        allowed_children,
        allowed_descendants,
        disallow_as_root: tag.options.disallow_as_root,
        nesting_limit: tag.options.nesting_limit,
        tag_limit: tag.options.tag_limit,
        close_ancestor: names(RuleAction::CloseAncestor),
        close_parent: names(RuleAction::CloseParent),
        reopen_child: names(RuleAction::ReopenChild),
        require_ancestor: declared(RuleAction::RequireAncestor),
        require_parent: declared(RuleAction::RequireParent),
    }
}
