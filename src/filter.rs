use std::fmt::{Display, Formatter};

use ahash::HashMap;

use crate::error::Error;

/// An output context a filter can be proven safe for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sink {
    /// A stylesheet or a `style` attribute.
    Css,
    /// A script or an event handler attribute.
    Js,
    /// A URL-bearing attribute.
    Url,
    /// Any other attribute value.
    Attribute,
}

impl Sink {
    fn bit(self) -> u8 {
        match self {
            Sink::Css => 1,
            Sink::Js => 2,
            Sink::Url => 4,
            Sink::Attribute => 8,
        }
    }
}

impl Display for Sink {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Sink::Css => "CSS",
            Sink::Js => "JS",
            Sink::Url => "URL",
            Sink::Attribute => "attribute",
        })
    }
}

/// The set of sinks a filter is safe for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SafeContexts(u8);

impl SafeContexts {
    pub const NONE: SafeContexts = SafeContexts(0);

    pub fn of(sinks: &[Sink]) -> Self {
        SafeContexts(sinks.iter().fold(0, |bits, sink| bits | sink.bit()))
    }

    pub fn contains(&self, sink: Sink) -> bool {
        self.0 & sink.bit() != 0
    }

    pub fn with(self, sink: Sink) -> Self {
        SafeContexts(self.0 | sink.bit())
    }
}

/// Answers which sinks a filter is safe for.
pub trait FilterLookup {
    /// `None` if the filter is unknown.
    fn safe_contexts(&self, filter: &str) -> Option<SafeContexts>;

    fn is_safe(&self, filter: &str, sink: Sink) -> bool {
        self.safe_contexts(filter)
            .is_some_and(|contexts| contexts.contains(sink))
    }

    fn contains(&self, filter: &str) -> bool {
        self.safe_contexts(filter).is_some()
    }
}

/// Validate a filter name and normalize it to lowercase.
///
/// Built-in filters start with `#`; other names are callbacks known to the
/// host.
pub fn normalize_filter_name(name: &str) -> Result<String, Error> {
    let bare = name.strip_prefix('#').unwrap_or(name);
    let mut chars = bare.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(Error::InvalidFilterName(name.to_string()));
    }
    Ok(name.to_ascii_lowercase())
}

const BUILTINS: &[(&str, &[Sink])] = {
    use Sink::*;
    &[
        ("#alnum", &[Css, Js, Url, Attribute]),
        ("#color", &[Css, Attribute]),
        ("#email", &[Attribute]),
        ("#float", &[Css, Js, Url, Attribute]),
        ("#identifier", &[Css, Url, Attribute]),
        ("#int", &[Css, Js, Url, Attribute]),
        ("#ip", &[Attribute]),
        ("#map", &[]),
        ("#number", &[Css, Js, Url, Attribute]),
        ("#range", &[Css, Js, Url, Attribute]),
        ("#regexp", &[]),
        ("#simpletext", &[Css, Attribute]),
        ("#uint", &[Css, Js, Url, Attribute]),
        ("#url", &[Css, Js, Url, Attribute]),
        ("rawurlencode", &[Js, Url, Attribute]),
        ("strtotime", &[Js, Attribute]),
        ("urlencode", &[Js, Url, Attribute]),
    ]
};

/// Registry of known filters and the sinks they are safe for.
#[derive(Debug, Clone)]
pub struct FilterRegistry {
    filters: HashMap<String, SafeContexts>,
}

impl FilterRegistry {
    /// A registry with no filters at all.
    pub fn empty() -> Self {
        FilterRegistry {
            filters: HashMap::default(),
        }
    }

    /// Register a filter, replacing any previous registration.
    pub fn register(&mut self, name: &str, contexts: SafeContexts) -> Result<(), Error> {
        let name = normalize_filter_name(name)?;
        self.filters.insert(name, contexts);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl Default for FilterRegistry {
    /// A registry with the built-in filters.
    fn default() -> Self {
        let filters = BUILTINS
            .iter()
            .map(|(name, sinks)| (name.to_string(), SafeContexts::of(sinks)))
            .collect();
        FilterRegistry { filters }
    }
}

impl FilterLookup for FilterRegistry {
    fn safe_contexts(&self, filter: &str) -> Option<SafeContexts> {
        match self.filters.get(filter) {
            Some(contexts) => Some(*contexts),
            None => self.filters.get(&filter.to_ascii_lowercase()).copied(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("#url", Sink::Url, true)]
    #[case("#url", Sink::Js, true)]
    #[case("#identifier", Sink::Js, false)]
    #[case("#identifier", Sink::Url, true)]
    #[case("#simpletext", Sink::Css, true)]
    #[case("#simpletext", Sink::Url, false)]
    #[case("#email", Sink::Url, false)]
    #[case("#email", Sink::Attribute, true)]
    #[case("strtotime", Sink::Js, true)]
    #[case("strtotime", Sink::Css, false)]
    #[case("#regexp", Sink::Attribute, false)]
    #[case("#URL", Sink::Url, true)]
    #[case("#unknown", Sink::Attribute, false)]
    fn test_builtin_capabilities(#[case] filter: &str, #[case] sink: Sink, #[case] safe: bool) {
        assert_eq!(FilterRegistry::default().is_safe(filter, sink), safe);
    }

    #[test]
    fn test_register_custom_filter() {
        let mut registry = FilterRegistry::empty();
        registry
            .register("My_Filter", SafeContexts::NONE.with(Sink::Css))
            .unwrap();
        assert!(registry.is_safe("my_filter", Sink::Css));
        assert!(!registry.is_safe("my_filter", Sink::Js));
        assert!(registry.register("#1x", SafeContexts::NONE).is_err());
        assert!(registry.register("a-b", SafeContexts::NONE).is_err());
    }
}
