use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::error::Error;
use crate::name::TagName;

/// What a rule does to its target tag.
///
/// The first four actions shape the compiled bitfields. The others are
/// carried through to the compiled rule table for the parser to enforce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "camelCase")
)]
pub enum RuleAction {
    AllowChild,
    AllowDescendant,
    CloseAncestor,
    CloseParent,
    DenyChild,
    DenyDescendant,
    ReopenChild,
    RequireAncestor,
    RequireParent,
}

impl RuleAction {
    pub const ALL: [RuleAction; 9] = [
        RuleAction::AllowChild,
        RuleAction::AllowDescendant,
        RuleAction::CloseAncestor,
        RuleAction::CloseParent,
        RuleAction::DenyChild,
        RuleAction::DenyDescendant,
        RuleAction::ReopenChild,
        RuleAction::RequireAncestor,
        RuleAction::RequireParent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleAction::AllowChild => "allowChild",
            RuleAction::AllowDescendant => "allowDescendant",
            RuleAction::CloseAncestor => "closeAncestor",
            RuleAction::CloseParent => "closeParent",
            RuleAction::DenyChild => "denyChild",
            RuleAction::DenyDescendant => "denyDescendant",
            RuleAction::ReopenChild => "reopenChild",
            RuleAction::RequireAncestor => "requireAncestor",
            RuleAction::RequireParent => "requireParent",
        }
    }

    /// The child-level action a descendant-level action implies.
    pub fn implied(&self) -> Option<RuleAction> {
        match self {
            RuleAction::AllowDescendant => Some(RuleAction::AllowChild),
            RuleAction::DenyDescendant => Some(RuleAction::DenyChild),
            _ => None,
        }
    }

    /// Whether the action shapes the allowed children/descendants bitfields.
    pub fn is_bitfield_rule(&self) -> bool {
        matches!(
            self,
            RuleAction::AllowChild
                | RuleAction::AllowDescendant
                | RuleAction::DenyChild
                | RuleAction::DenyDescendant
        )
    }
}

impl FromStr for RuleAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RuleAction::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| Error::UnknownRuleAction(s.to_string()))
    }
}

impl Display for RuleAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The rules of a single tag, grouped by action.
///
/// Targets are kept sorted and deduplicated. Targets are not required to
/// exist; the compiler drops those that are not in the enabled tag set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    rules: BTreeMap<RuleAction, BTreeSet<TagName>>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule and the child-level rule it implies, if any.
    pub fn add(&mut self, action: RuleAction, target: TagName) {
        if let Some(implied) = action.implied() {
            self.insert(implied, target.clone());
        }
        self.insert(action, target);
    }

    /// Add exactly this rule, without implied rules.
    pub fn insert(&mut self, action: RuleAction, target: TagName) -> bool {
        self.rules.entry(action).or_default().insert(target)
    }

    /// Remove a rule. Returns whether it was present.
    pub fn remove(&mut self, action: RuleAction, target: &str) -> bool {
        let Some(targets) = self.rules.get_mut(&action) else {
            return false;
        };
        let removed = targets.remove(target);
        if targets.is_empty() {
            self.rules.remove(&action);
        }
        removed
    }

    /// Remove every rule targeting `target`.
    pub fn remove_target(&mut self, target: &str) {
        for targets in self.rules.values_mut() {
            targets.remove(target);
        }
        self.rules.retain(|_, targets| !targets.is_empty());
    }

    pub fn contains(&self, action: RuleAction, target: &str) -> bool {
        self.rules
            .get(&action)
            .is_some_and(|targets| targets.contains(target))
    }

    /// The targets of an action, in sorted order.
    pub fn targets(&self, action: RuleAction) -> impl Iterator<Item = &TagName> + '_ {
        self.rules.get(&action).into_iter().flatten()
    }

    /// All rules as `(action, target)` pairs, grouped by action.
    pub fn iter(&self) -> impl Iterator<Item = (RuleAction, &TagName)> + '_ {
        self.rules
            .iter()
            .flat_map(|(action, targets)| targets.iter().map(move |target| (*action, target)))
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.values().map(BTreeSet::len).sum()
    }
}

impl Extend<(RuleAction, TagName)> for RuleSet {
    fn extend<T: IntoIterator<Item = (RuleAction, TagName)>>(&mut self, iter: T) {
        for (action, target) in iter {
            self.add(action, target);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(name: &str) -> TagName {
        TagName::new(name).unwrap()
    }

    #[test]
    fn test_parse_actions() {
        for action in RuleAction::ALL {
            assert_eq!(action.as_str().parse::<RuleAction>().unwrap(), action);
        }
        assert!(matches!(
            "denyAll".parse::<RuleAction>(),
            Err(Error::UnknownRuleAction(s)) if s == "denyAll"
        ));
    }

    #[test]
    fn test_descendant_implies_child() {
        let mut rules = RuleSet::new();
        rules.add(RuleAction::DenyDescendant, tag("x"));
        rules.add(RuleAction::AllowDescendant, tag("y"));
        assert!(rules.contains(RuleAction::DenyChild, "X"));
        assert!(rules.contains(RuleAction::AllowChild, "Y"));
        assert_eq!(rules.len(), 4);
    }

    #[test]
    fn test_rules_are_deduplicated() {
        let mut rules = RuleSet::new();
        rules.add(RuleAction::CloseParent, tag("b"));
        rules.add(RuleAction::CloseParent, tag("B"));
        assert_eq!(rules.len(), 1);
        assert!(rules.remove(RuleAction::CloseParent, "B"));
        assert!(rules.is_empty());
    }
}
