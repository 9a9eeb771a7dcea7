//! Attribute value templates: `title="Hello {@name}"`.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AvtError {
    #[error("Unterminated expression in attribute value template")]
    UnterminatedExpression,
    #[error("Unmatched '}}' in attribute value template")]
    UnmatchedCloseBrace,
}

/// A part of an attribute value template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvtPart {
    /// Literal text, with `{{` and `}}` unescaped.
    Literal(String),
    /// The source of an expression, without its braces.
    Expression(String),
}

/// Split an attribute value template into literal text and expressions.
///
/// Braces inside string literals do not end an expression.
///
/// ```rust
/// use tagrules::{parse_avt, AvtPart};
///
/// let parts = parse_avt("a{{b}}{concat('}', @c)}")?;
/// assert_eq!(parts, vec![
///     AvtPart::Literal("a{b}".to_string()),
///     AvtPart::Expression("concat('}', @c)".to_string()),
/// ]);
/// # Ok::<(), tagrules::AvtError>(())
/// ```
pub fn parse_avt(source: &str) -> Result<Vec<AvtPart>, AvtError> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut chars = source.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                literal.push('}');
            }
            '}' => return Err(AvtError::UnmatchedCloseBrace),
            '{' => {
                if !literal.is_empty() {
                    parts.push(AvtPart::Literal(std::mem::take(&mut literal)));
                }
                let mut expression = String::new();
                let mut quote = None;
                loop {
                    let c = chars.next().ok_or(AvtError::UnterminatedExpression)?;
                    match (quote, c) {
                        (None, '}') => break,
                        (None, '"' | '\'') => quote = Some(c),
                        (Some(q), c) if q == c => quote = None,
                        _ => {}
                    }
                    expression.push(c);
                }
                parts.push(AvtPart::Expression(expression));
            }
            c => literal.push(c),
        }
    }
    if !literal.is_empty() {
        parts.push(AvtPart::Literal(literal));
    }
    Ok(parts)
}

/// The literal prefix of an attribute value template, up to the first
/// expression.
pub fn literal_prefix(parts: &[AvtPart]) -> &str {
    match parts.first() {
        Some(AvtPart::Literal(text)) => text,
        _ => "",
    }
}

/// Whether an attribute value template has no expressions.
pub fn is_literal(parts: &[AvtPart]) -> bool {
    parts
        .iter()
        .all(|part| matches!(part, AvtPart::Literal(_)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_only() {
        let parts = parse_avt("http://example.org/").unwrap();
        assert!(is_literal(&parts));
        assert_eq!(literal_prefix(&parts), "http://example.org/");
        assert!(parse_avt("").unwrap().is_empty());
    }

    #[test]
    fn test_expressions() {
        let parts = parse_avt("mailto:{@email}?subject={\"}\"}").unwrap();
        assert_eq!(
            parts,
            vec![
                AvtPart::Literal("mailto:".to_string()),
                AvtPart::Expression("@email".to_string()),
                AvtPart::Literal("?subject=".to_string()),
                AvtPart::Expression("\"}\"".to_string()),
            ]
        );
        assert!(!is_literal(&parts));
    }

    #[test]
    fn test_errors() {
        assert_eq!(parse_avt("{@x"), Err(AvtError::UnterminatedExpression));
        assert_eq!(parse_avt("{'}"), Err(AvtError::UnterminatedExpression));
        assert_eq!(parse_avt("a}b"), Err(AvtError::UnmatchedCloseBrace));
    }
}
