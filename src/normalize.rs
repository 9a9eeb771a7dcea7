//! Rewrites applied to a template before it is checked.
use crate::template::{Node, Template, Text, Value, ValueOf};
use crate::xpath::Expr;

/// A rewrite of a template.
pub trait Normalization {
    fn normalize(&self, template: &mut Template);
}

/// Turn `{@attr}` and `{$var}` in the text of literal elements into
/// `xsl:value-of` nodes.
///
/// Text directly inside XSL instructions, and `xsl:text`, is left alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConvertCurlyExpressionsInText;

/// Find the next `{@name}` or `{$name}` in text. Returns the byte range of
/// the match and the expression inside the braces.
fn find_curly_expression(text: &str) -> Option<(usize, usize, &str)> {
    let bytes = text.as_bytes();
    let mut start = 0;
    while let Some(offset) = text[start..].find('{') {
        let open = start + offset;
        let sigil = open + 1;
        if matches!(bytes.get(sigil), Some(b'@' | b'$')) {
            let name_end = bytes[sigil + 1..]
                .iter()
                .position(|b| !(b.is_ascii_alphanumeric() || *b == b'_' || *b == b'-'))
                .map_or(bytes.len(), |position| sigil + 1 + position);
            if name_end > sigil + 1 && bytes.get(name_end) == Some(&b'}') {
                return Some((open, name_end + 1, &text[sigil..name_end]));
            }
        }
        start = open + 1;
    }
    None
}

impl Normalization for ConvertCurlyExpressionsInText {
    fn normalize(&self, template: &mut Template) {
        let candidates = template
            .descendants(template.root())
            .filter(|node| match template.value(*node) {
                Value::Text(text) => {
                    !text.verbatim && find_curly_expression(&text.text).is_some()
                }
                _ => false,
            })
            .filter(|node| {
                template
                    .parent(*node)
                    .is_some_and(|parent| template.element(parent).is_some())
            })
            .collect::<Vec<_>>();

        for node in candidates {
            let Value::Text(text) = template.value(node) else {
                continue;
            };
            let mut rest = text.text.clone();
            let mut replacement = Vec::new();
            while let Some((start, end, expression)) = find_curly_expression(&rest) {
                if start > 0 {
                    replacement.push(Value::Text(Text::new(&rest[..start])));
                }
                replacement.push(Value::ValueOf(ValueOf::new(expression)));
                rest = rest[end..].to_string();
            }
            if !rest.is_empty() {
                replacement.push(Value::Text(Text::new(rest)));
            }
            for value in replacement {
                let new_node = template.new_node(value);
                template.insert_before(node, new_node);
            }
            template.remove(node);
        }
    }
}

/// Replace `xsl:value-of` nodes that select a string or number literal with
/// the text they output.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineLiteralValueOf;

impl Normalization for InlineLiteralValueOf {
    fn normalize(&self, template: &mut Template) {
        let nodes = template.descendants(template.root()).collect::<Vec<_>>();
        for node in nodes {
            let Value::ValueOf(value_of) = template.value(node) else {
                continue;
            };
            if value_of.disable_output_escaping {
                continue;
            }
            let text = match Expr::parse(&value_of.select) {
                Ok(Expr::Literal(value)) => value,
                Ok(number @ Expr::Number(_)) => number.to_string(),
                _ => continue,
            };
            *template.value_mut(node) = Value::Text(Text::new(text));
        }
    }
}

/// Merge `xsl:when` branches of an `xsl:choose` whose content is identical.
///
/// First, runs of branches that test the same variable part against
/// distinct constants are merged regardless of their position in the run.
/// Then adjacent branches are merged whatever their tests. Merged branches
/// keep the first branch and join the tests with `or`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeIdenticalConditionalBranches;

impl MergeIdenticalConditionalBranches {
    fn is_when(template: &Template, node: Node) -> bool {
        matches!(template.value(node), Value::When(_))
    }

    fn test(template: &Template, node: Node) -> &str {
        match template.value(node) {
            Value::When(test) => test,
            _ => "",
        }
    }

    fn merge_compatible_branches(template: &mut Template, choose: Node) {
        let mut next = template.first_child(choose);
        while let Some(node) = next {
            let nodes = Self::collect_compatible_branches(template, node);
            match nodes.last() {
                Some(last) if nodes.len() > 1 => {
                    next = template.next_sibling(*last);
                    Self::merge_branches(template, &nodes);
                }
                _ => next = template.next_sibling(node),
            }
        }
    }

    fn merge_consecutive_branches(template: &mut Template, choose: Node) {
        let branches = template
            .children(choose)
            .filter(|node| Self::is_when(template, *node))
            .collect::<Vec<_>>();
        for index in (1..branches.len()).rev() {
            Self::merge_branches(template, &branches[index - 1..=index]);
        }
    }

    fn collect_compatible_branches(template: &Template, start: Node) -> Vec<Node> {
        let mut nodes = Vec::new();
        let mut key: Option<String> = None;
        let mut values: Vec<String> = Vec::new();
        let mut next = Some(start);
        while let Some(node) = next {
            if !Self::is_when(template, node) {
                break;
            }
            let Some((branch_key, branch_values)) = Expr::parse(Self::test(template, node))
                .ok()
                .and_then(|expr| expr.equality_terms())
            else {
                break;
            };
            if key.as_ref().is_some_and(|key| *key != branch_key) {
                break;
            }
            if branch_values.iter().any(|value| values.contains(value)) {
                break;
            }
            key = Some(branch_key);
            values.extend(branch_values);
            nodes.push(node);
            next = template.next_sibling(node);
        }
        nodes
    }

    fn merge_branches(template: &mut Template, nodes: &[Node]) {
        let mut groups: Vec<Vec<Node>> = Vec::new();
        for node in nodes {
            if template.is_removed(*node) {
                continue;
            }
            match groups
                .iter_mut()
                .find(|group| template.same_content(group[0], *node))
            {
                Some(group) => group.push(*node),
                None => groups.push(vec![*node]),
            }
        }
        for group in groups.into_iter().filter(|group| group.len() > 1) {
            let test = group
                .iter()
                .map(|node| Self::test(template, *node))
                .collect::<Vec<_>>()
                .join(" or ");
            tracing::trace!(%test, branches = group.len(), "merging identical branches");
            for node in &group[1..] {
                template.remove(*node);
            }
            *template.value_mut(group[0]) = Value::When(test);
        }
    }
}

impl Normalization for MergeIdenticalConditionalBranches {
    fn normalize(&self, template: &mut Template) {
        let chooses = template
            .descendants(template.root())
            .filter(|node| matches!(template.value(*node), Value::Choose))
            .collect::<Vec<_>>();
        for choose in chooses {
            if template.is_removed(choose) {
                continue;
            }
            Self::merge_compatible_branches(template, choose);
            Self::merge_consecutive_branches(template, choose);
        }
    }
}

/// Runs normalizations in order.
pub struct TemplateNormalizer {
    normalizations: Vec<Box<dyn Normalization>>,
}

impl TemplateNormalizer {
    /// A normalizer that does nothing.
    pub fn empty() -> Self {
        TemplateNormalizer {
            normalizations: Vec::new(),
        }
    }

    pub fn push(&mut self, normalization: impl Normalization + 'static) {
        self.normalizations.push(Box::new(normalization));
    }

    pub fn normalize(&self, template: &mut Template) {
        for normalization in &self.normalizations {
            normalization.normalize(template);
        }
    }
}

impl Default for TemplateNormalizer {
    /// Curly expressions first, so the inlining and merging passes see the
    /// resulting nodes.
    fn default() -> Self {
        let mut normalizer = TemplateNormalizer::empty();
        normalizer.push(ConvertCurlyExpressionsInText);
        normalizer.push(InlineLiteralValueOf);
        normalizer.push(MergeIdenticalConditionalBranches);
        normalizer
    }
}

impl std::fmt::Debug for TemplateNormalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateNormalizer")
            .field("normalizations", &self.normalizations.len())
            .finish()
    }
}
