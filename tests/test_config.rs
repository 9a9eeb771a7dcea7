use tagrules::{
    AttributeType, CheckerOptions, Configuration, Error, FlashSetting, Html5RuleDeriver,
    RuleAction, TemplateFlags, TemplateNormalizer,
};

fn url_config() -> Configuration {
    let mut config = Configuration::new();
    config.add_tag("URL").unwrap();
    config
        .add_attribute("URL", "url", AttributeType::Url)
        .unwrap();
    config
        .set_template(
            "URL",
            r#"<a href="{@url}"><xsl:apply-templates/></a>"#,
            TemplateFlags::default(),
        )
        .unwrap();
    config
}

#[test]
fn test_invalid_names() {
    let mut config = Configuration::new();
    assert!(matches!(config.add_tag("1b"), Err(Error::InvalidTagName(_))));
    config.add_tag("B").unwrap();
    assert!(matches!(
        config.add_attribute("B", "a b", AttributeType::Text),
        Err(Error::InvalidAttributeName(_))
    ));
    assert!(matches!(
        config.add_rule("B", RuleAction::AllowChild, "not a tag"),
        Err(Error::InvalidTagName(_))
    ));
}

#[test]
fn test_filter_chain() {
    let mut config = url_config();
    assert!(matches!(
        config.set_filter_chain("URL", "url", ["#nope"]),
        Err(Error::UnknownFilter(name)) if name == "#nope"
    ));
    assert!(matches!(
        config.set_filter_chain("URL", "url", ["#bad-name"]),
        Err(Error::InvalidFilterName(_))
    ));
    assert!(matches!(
        config.set_filter_chain("URL", "title", ["#int"]),
        Err(Error::UnknownAttribute { .. })
    ));
    config
        .set_filter_chain("URL", "URL", ["#URL", "rawurlencode"])
        .unwrap();
    let attribute = config.tag("url").unwrap().attribute("url").unwrap();
    assert_eq!(attribute.filter_chain, vec!["#url", "rawurlencode"]);
}

#[test]
fn test_unsafe_template_is_rejected() {
    let mut config = Configuration::new();
    config.add_tag("X").unwrap();
    config.add_attribute("X", "foo", AttributeType::Text).unwrap();
    let err = config
        .set_template(
            "X",
            r#"<b onclick="{@foo}"/>"#,
            TemplateFlags::default(),
        )
        .unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"Unsafe template for tag 'X': Attribute 'foo' is not properly filtered to be used in JS");
    assert!(config.tag("X").unwrap().template().is_none());
}

#[test]
fn test_parse_error_is_reported() {
    let mut config = Configuration::new();
    config.add_tag("X").unwrap();
    let err = config
        .set_template("X", "<xsl:copy>", TemplateFlags::default())
        .unwrap_err();
    assert_eq!(err.to_string(), "Premature end of data in tag 'xsl:copy'");
}

#[test]
fn test_compile_rechecks_templates() {
    let mut config = url_config();
    assert!(config.compile().is_ok());
    config
        .set_filter_chain("URL", "url", Vec::<&str>::new())
        .unwrap();
    let err = config.compile().unwrap_err();
    assert_eq!(
        err.to_string(),
        "Unsafe template for tag 'URL': Attribute 'url' is not properly filtered to be used in URL"
    );
}

#[test]
fn test_templates_are_normalized_before_checking() {
    let mut config = Configuration::new();
    config.add_tag("X").unwrap();
    // {@x} becomes an xsl:value-of, which reads an undefined attribute.
    let err = config
        .set_template("X", "<script>{@x}</script>", TemplateFlags::default())
        .unwrap_err();
    assert!(err.to_string().ends_with("Undefined attribute 'x'"));

    config.normalizer = TemplateNormalizer::empty();
    assert!(config
        .set_template("X", "<script>{@x}</script>", TemplateFlags::default())
        .is_ok());
}

#[test]
fn test_rules() {
    let mut config = Configuration::new();
    config.add_tag("LIST").unwrap();
    config.add_tag("LI").unwrap();
    config
        .add_rule_str("LIST", "denyDescendant", "li")
        .unwrap();
    let rules = &config.tag("LIST").unwrap().rules;
    assert!(rules.contains(RuleAction::DenyDescendant, "LI"));
    assert!(rules.contains(RuleAction::DenyChild, "LI"));

    assert!(config
        .remove_rule("LIST", RuleAction::DenyChild, "li")
        .unwrap());
    assert!(!config
        .remove_rule("LIST", RuleAction::DenyChild, "li")
        .unwrap());
    assert!(matches!(
        config.add_rule_str("LIST", "allowSibling", "LI"),
        Err(Error::UnknownRuleAction(_))
    ));

    let table = config.compile().unwrap();
    assert!(!table.allows_child("LIST", "LI"));
}

#[test]
fn test_remove_tag() {
    let mut config = url_config();
    let tag = config.remove_tag("url").unwrap();
    assert_eq!(tag.name().as_str(), "URL");
    assert!(!config.tag_exists("URL"));
    assert!(config.compile().unwrap().is_empty());
}

#[test]
fn test_root_element_flags() {
    let mut config = Configuration::new();
    for (name, source) in [
        ("LI", "<li><xsl:apply-templates/></li>"),
        ("B", "<b><xsl:apply-templates/></b>"),
    ] {
        config.add_tag(name).unwrap();
        config
            .set_template(name, source, TemplateFlags::default())
            .unwrap();
    }
    config
        .add_rules_from_html5(&Html5RuleDeriver::new().root_element("ul"))
        .unwrap();
    assert!(config.tag("B").unwrap().options.disallow_as_root);
    assert!(!config.tag("LI").unwrap().options.disallow_as_root);

    let table = config.compile().unwrap();
    assert!(table.get("B").unwrap().disallow_as_root);
}

#[test]
fn test_checker_options() {
    let mut config = Configuration::new();
    config.checker_options = CheckerOptions {
        max_script_access: Some(FlashSetting::Never),
        ..Default::default()
    };
    config.add_tag("FLASH").unwrap();
    let err = config
        .set_template(
            "FLASH",
            r#"<embed src="http://example.org/movie.swf"/>"#,
            TemplateFlags::default(),
        )
        .unwrap_err();
    assert!(matches!(err, Error::UnsafeTemplate { .. }));

    let trusted = TemplateFlags {
        allow_unsafe: true,
        ..Default::default()
    };
    config
        .set_template(
            "FLASH",
            r#"<embed src="http://example.org/movie.swf"/>"#,
            trusted,
        )
        .unwrap();
    assert!(config.compile().is_ok());
}
