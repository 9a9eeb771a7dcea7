use rstest::rstest;

use tagrules::{
    parse_template, AttributeType, Configuration, DerivedRules, Error, Html5RuleDeriver,
    ParseOptions, RuleAction, TagName, Template, TemplateFlags,
};

fn derive_with(
    deriver: &Html5RuleDeriver,
    tags: &[(&str, Option<&str>)],
) -> Result<DerivedRules, Error> {
    let templates = tags
        .iter()
        .map(|(name, source)| {
            let template = source
                .map(|source| parse_template(source, &ParseOptions::default()))
                .transpose()?;
            Ok((TagName::new(name)?, template))
        })
        .collect::<Result<Vec<(TagName, Option<Template>)>, Error>>()?;
    deriver.derive(
        templates
            .iter()
            .map(|(name, template)| (name.clone(), template.as_ref())),
    )
}

fn derive(tags: &[(&str, Option<&str>)]) -> DerivedRules {
    derive_with(&Html5RuleDeriver::new(), tags).unwrap()
}

const INLINE_AND_BLOCK: &[(&str, Option<&str>)] = &[
    ("B", Some("<b><xsl:apply-templates/></b>")),
    ("DIV", Some("<div><xsl:apply-templates/></div>")),
    ("P", Some("<p><xsl:apply-templates/></p>")),
    ("A", Some(r#"<a href="{@url}"><xsl:apply-templates/></a>"#)),
];

fn rules(derived: &DerivedRules, tag: &str) -> Vec<String> {
    derived
        .get(tag)
        .unwrap()
        .rules
        .iter()
        .map(|(action, target)| format!("{action} {target}"))
        .collect()
}

#[test]
fn test_inline_and_block() {
    let derived = derive(INLINE_AND_BLOCK);
    insta::assert_debug_snapshot!(rules(&derived, "B"), @r###"
    [
        "allowChild A",
        "allowChild B",
        "denyChild DIV",
        "denyChild P",
    ]
    "###);
    insta::assert_debug_snapshot!(rules(&derived, "DIV"), @r###"
    [
        "allowChild A",
        "allowChild B",
        "allowChild DIV",
        "allowChild P",
        "closeParent P",
    ]
    "###);
    insta::assert_debug_snapshot!(rules(&derived, "P"), @r###"
    [
        "allowChild A",
        "allowChild B",
        "closeParent P",
        "denyChild DIV",
        "denyChild P",
    ]
    "###);
}

#[test]
fn test_block_closes_paragraph() {
    let derived = derive(INLINE_AND_BLOCK);
    let div = &derived.get("DIV").unwrap().rules;
    assert!(div.contains(RuleAction::CloseParent, "P"));
    let b = &derived.get("B").unwrap().rules;
    assert!(!b.contains(RuleAction::CloseParent, "P"));
}

#[test]
fn test_transparent_link() {
    let derived = derive(INLINE_AND_BLOCK);
    let a = derived.get("A").unwrap();
    assert!(a.transparent);
    assert!(a.rules.contains(RuleAction::DenyDescendant, "A"));
    // Weaker rules for the same target are gone.
    assert!(!a.rules.contains(RuleAction::AllowChild, "A"));
    assert!(!a.rules.contains(RuleAction::DenyChild, "A"));
    assert!(a.rules.contains(RuleAction::AllowChild, "DIV"));
    assert!(!derived.get("B").unwrap().transparent);
}

#[rstest]
#[case(r#"<img src="{@src}"/>"#, false)]
#[case(r##"<img src="{@src}" usemap="#map"/>"##, true)]
fn test_interactive_image(#[case] image: &str, #[case] denied: bool) {
    let derived = derive(&[
        ("A", Some(r#"<a href="{@url}"><xsl:apply-templates/></a>"#)),
        ("IMG", Some(image)),
    ]);
    let a = &derived.get("A").unwrap().rules;
    assert_eq!(a.contains(RuleAction::DenyDescendant, "IMG"), denied);
}

#[test]
fn test_tag_without_template() {
    let derived = derive(&[("X", None), ("B", Some("<b><xsl:apply-templates/></b>"))]);
    let x = &derived.get("X").unwrap().rules;
    assert!(x.contains(RuleAction::AllowChild, "B"));
    assert!(!x.contains(RuleAction::AllowChild, "X"));
    assert!(!x.contains(RuleAction::DenyChild, "X"));
    let b = &derived.get("B").unwrap().rules;
    assert!(b.targets(RuleAction::AllowChild).all(|target| target.as_str() != "X"));
}

#[test]
fn test_empty_element_denies_everything() {
    let derived = derive(&[
        ("HR", Some("<hr/>")),
        ("B", Some("<b><xsl:apply-templates/></b>")),
    ]);
    let hr = &derived.get("HR").unwrap().rules;
    assert!(hr.contains(RuleAction::DenyChild, "B"));
    assert!(hr.contains(RuleAction::DenyChild, "HR"));
    assert!(hr.targets(RuleAction::AllowChild).next().is_none());
}

#[test]
fn test_list_root() {
    let deriver = Html5RuleDeriver::new().root_element("ul");
    let derived = derive_with(
        &deriver,
        &[
            ("LI", Some("<li><xsl:apply-templates/></li>")),
            ("B", Some("<b><xsl:apply-templates/></b>")),
        ],
    )
    .unwrap();
    assert!(!derived.get("LI").unwrap().disallow_as_root);
    assert!(derived.get("B").unwrap().disallow_as_root);
    assert!(!derived.get("B").unwrap().disabled);
    assert_eq!(derived.len(), 2);
}

#[test]
fn test_link_root_disables_links() {
    let deriver = Html5RuleDeriver::new().root_element("a");
    let derived = derive_with(
        &deriver,
        &[
            ("A", Some(r#"<a href="{@url}"><xsl:apply-templates/></a>"#)),
            ("B", Some("<b><xsl:apply-templates/></b>")),
        ],
    )
    .unwrap();
    assert!(derived.get("A").unwrap().disabled);
    assert!(!derived.get("B").unwrap().disabled);
    assert!(!derived.get("B").unwrap().disallow_as_root);
}

#[test]
fn test_unknown_root() {
    let deriver = Html5RuleDeriver::new().root_element("blink");
    assert!(matches!(
        derive_with(&deriver, &[("B", Some("<b/>"))]),
        Err(Error::UnknownHtmlElement(name)) if name == "blink"
    ));
}

#[test]
fn test_derived_rules_compile() -> Result<(), Error> {
    let mut config = Configuration::new();
    for (name, source) in INLINE_AND_BLOCK {
        config.add_tag(name)?;
        if let Some(source) = source {
            if name == &"A" {
                config.add_attribute(name, "url", AttributeType::Url)?;
            }
            config.set_template(name, source, TemplateFlags::default())?;
        }
    }
    config.add_rules_from_html5(&Html5RuleDeriver::new())?;
    assert!(config.tag("A").unwrap().options.transparent);

    let table = config.compile()?;
    assert!(table.allows_child("B", "A"));
    assert!(!table.allows_child("B", "DIV"));
    assert!(table.allows_child("DIV", "P"));
    assert!(!table.allows_descendant("A", "A"));
    assert!(table.allows_child("A", "DIV"));
    assert_eq!(table.get("P").unwrap().close_parent, vec![TagName::new("P")?]);
    Ok(())
}
