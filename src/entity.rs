use std::borrow::Cow;

use crate::error::ParseError;

/// Resolve the predefined entities and character references in text or an
/// attribute value.
///
/// Character references are resolved here, before any expression parsing,
/// so `doc&#117;ment()` reaches the checker as `document()`.
pub(crate) fn parse_entities(content: Cow<str>) -> Result<Cow<str>, ParseError> {
    if !content.contains('&') {
        return Ok(content);
    }
    let mut result = String::with_capacity(content.len());
    let mut chars = content.chars();
    while let Some(c) = chars.next() {
        if c != '&' {
            result.push(c);
            continue;
        }
        let mut entity = String::new();
        let mut is_complete = false;
        for c in chars.by_ref() {
            if c == ';' {
                is_complete = true;
                break;
            }
            entity.push(c);
        }
        if !is_complete {
            return Err(ParseError::UnclosedEntity(entity));
        }
        let resolved = match entity.as_str() {
            "amp" => '&',
            "apos" => '\'',
            "gt" => '>',
            "lt" => '<',
            "quot" => '"',
            _ => character_reference(&entity).ok_or(ParseError::InvalidEntity(entity))?,
        };
        result.push(resolved);
    }
    Ok(result.into())
}

fn character_reference(entity: &str) -> Option<char> {
    let reference = entity.strip_prefix('#')?;
    let code = match reference.strip_prefix('x') {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => reference.parse::<u32>().ok()?,
    };
    char::from_u32(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predefined() {
        let text = "&amp;&apos;&gt;&lt;&quot;";
        assert_eq!(parse_entities(text.into()).unwrap(), "&'><\"");
    }

    #[test]
    fn test_character_references() {
        assert_eq!(
            parse_entities("doc&#117;ment(&#x40;x)".into()).unwrap(),
            "document(@x)"
        );
    }

    #[test]
    fn test_unknown_entity() {
        let err = parse_entities("&nbsp;".into());
        assert!(matches!(err, Err(ParseError::InvalidEntity(entity)) if entity == "nbsp"));
        let err = parse_entities("&#xD800;".into());
        assert!(matches!(err, Err(ParseError::InvalidEntity(_))));
    }

    #[test]
    fn test_unclosed_entity() {
        let err = parse_entities("&amp".into());
        assert!(matches!(err, Err(ParseError::UnclosedEntity(entity)) if entity == "amp"));
    }

    #[test]
    fn test_no_entities_borrows() {
        let text = "hello";
        let result = parse_entities(text.into()).unwrap();
        assert!(matches!(result, Cow::Borrowed(_)));
    }
}
