use rstest::rstest;

use tagrules::{
    parse_template, AttributeType, CheckerOptions, FilterRegistry, FlashSetting, ParseOptions,
    Tag, TemplateChecker, Unsafe,
};

/// Attribute names with a single filter, or none if empty.
type Attributes<'a> = &'a [(&'a str, &'a str)];

fn tag(attributes: Attributes) -> Tag {
    let mut tag = Tag::new("X").unwrap();
    for (name, filter) in attributes {
        let attribute = tag.add_attribute(name, AttributeType::Text).unwrap();
        attribute.filter_chain = filter
            .split_whitespace()
            .map(|filter| filter.to_string())
            .collect();
    }
    tag
}

fn check_with(
    source: &str,
    attributes: Attributes,
    options: CheckerOptions,
) -> Result<(), String> {
    let filters = FilterRegistry::default();
    let template = parse_template(source, &ParseOptions::default()).unwrap();
    TemplateChecker::new(&filters)
        .with_options(options)
        .check(&template, &tag(attributes))
        .map_err(|error| error.to_string())
}

fn check(source: &str, attributes: Attributes) -> Result<(), String> {
    check_with(source, attributes, CheckerOptions::default())
}

#[rstest]
#[case(r#"<embed src="{@url}"/>"#, &[("url", "#url")], "The template contains a 'embed' element with a non-fixed URL attribute 'src'")]
#[case(r#"<embed src="{@url}" allowscriptaccess="always"/>"#, &[("url", "#url")], "The template contains a 'embed' element with a non-fixed URL attribute 'src'")]
#[case(r#"<embed src="{@url}" allowscriptaccess="sameDomain"/>"#, &[("url", "#url")], "The template contains a 'embed' element with a non-fixed URL attribute 'src'")]
#[case(r#"<iframe src="{@url}"/>"#, &[("url", "#url")], "The template contains a 'iframe' element with a non-fixed URL attribute 'src'")]
#[case(r#"<object data="{@url}"/>"#, &[("url", "#url")], "The template contains a 'object' element with a non-fixed URL attribute 'data'")]
#[case(r#"<script src="{@url}"/>"#, &[("url", "#url")], "The template contains a 'script' element with a non-fixed URL attribute 'src'")]
#[case(r#"<script src="{@url}"/>"#, &[("src", "#url")], "The template contains a 'script' element with a non-fixed URL attribute 'src'")]
#[case(r#"<script src="http://{@foo}"/>"#, &[("foo", "#url")], "The template contains a 'script' element with a non-fixed URL attribute 'src'")]
#[case(r#"<SCRIPT src="{@url}"/>"#, &[("url", "#url")], "The template contains a 'script' element with a non-fixed URL attribute 'src'")]
#[case(r#"<script SRC="{@url}"/>"#, &[("url", "#url")], "The template contains a 'script' element with a non-fixed URL attribute 'src'")]
#[case(r#"<script><xsl:attribute name="src"><xsl:value-of select="@url"/></xsl:attribute></script>"#, &[("url", "#url")], "The template contains a 'script' element with a dynamically generated 'src' attribute that does not use a fixed URL")]
#[case(r#"<script><xsl:copy-of select="@src"/></script>"#, &[("src", "#url")], "The template contains a 'script' element with a dynamically generated 'src' attribute that does not use a fixed URL")]
#[case(r#"<object><param name="movie" value="{@url}"/></object>"#, &[("url", "#url")], "The template contains a 'param' element with a non-fixed URL attribute 'value'")]
#[case(r#"<svg:script xmlns:svg="http://www.w3.org/2000/svg" href="{@url}"/>"#, &[("url", "#url")], "The template contains a 'script' element with a non-fixed URL attribute 'href'")]
fn test_non_fixed_url(#[case] source: &str, #[case] attributes: Attributes, #[case] expected: &str) {
    assert_eq!(check(source, attributes), Err(expected.to_string()));
}

#[rstest]
#[case(r#"<embed src="{@url}" allowscriptaccess="never"/>"#, &[("url", "#url")])]
#[case(r#"<object data="{@url}"><param name="allowscriptaccess" value="never"/></object>"#, &[("url", "#url")])]
#[case(r#"<object><param name="allowscriptaccess" value="never"/><param name="movie" value="{@url}"/></object>"#, &[("url", "#url")])]
#[case(r#"<script src="https://gist.github.com/{@id}.js"/>"#, &[("id", "#number")])]
#[case(r#"<script src="//gist.github.com/{@id}.js"/>"#, &[("id", "#number")])]
#[case(r#"<script src="http://example.org/legit.js"/>"#, &[])]
#[case(r#"<script><xsl:attribute name="src">http://example.org/legit.js</xsl:attribute></script>"#, &[])]
#[case(r#"<iframe src="http://example.org/"/>"#, &[])]
fn test_fixed_url(#[case] source: &str, #[case] attributes: Attributes) {
    assert_eq!(check(source, attributes), Ok(()));
}

#[rstest]
#[case(r#"<script><xsl:apply-templates/></script>"#, &[], "A 'script' element lets unfiltered data through")]
#[case(r#"<style><xsl:apply-templates/></style>"#, &[], "A 'style' element lets unfiltered data through")]
#[case(r#"<script><xsl:apply-templates select="st"/></script>"#, &[], "Cannot assess the safety of 'xsl:apply-templates' select expression 'st'")]
#[case(r#"<script><xsl:value-of select="st"/></script>"#, &[], "Cannot assess the safety of XPath expression 'st'")]
#[case(r#"<script><xsl:value-of select="@foo"/></script>"#, &[], "Undefined attribute 'foo'")]
#[case(r#"<script><xsl:value-of select="@foo"/></script>"#, &[("foo", "")], "Attribute 'foo' is not properly filtered to be used in JS")]
#[case(r#"<script><xsl:value-of select="@foo"/></script>"#, &[("foo", "#email")], "Attribute 'foo' is not properly filtered to be used in JS")]
#[case(r#"<style><xsl:value-of select="@foo"/></style>"#, &[("foo", "")], "Attribute 'foo' is not properly filtered to be used in CSS")]
#[case(r#"<style><xsl:value-of select="@foo"/></style>"#, &[("foo", "urlencode")], "Attribute 'foo' is not properly filtered to be used in CSS")]
#[case(r#"<xsl:element name="script"><xsl:apply-templates/></xsl:element>"#, &[], "A dynamically generated 'script' element lets unfiltered data through")]
#[case(r#"<xsl:element name="SCRIPT"><xsl:apply-templates/></xsl:element>"#, &[], "A dynamically generated 'script' element lets unfiltered data through")]
#[case(r#"<script><xsl:for-each select="//item"><xsl:value-of select="@foo"/></xsl:for-each></script>"#, &[("foo", "#int")], "Cannot evaluate context node due to 'xsl:for-each'")]
#[case(r#"<script><xsl:variable name="x" select="1"/></script>"#, &[], "Cannot assess the safety of an 'xsl:variable' element")]
#[case(r#"<script><xsl:value-of select="."/></script>"#, &[], "Cannot assess the safety of XPath expression '.'")]
#[case(r#"<script><xsl:value-of select="string()"/></script>"#, &[], "Cannot assess the safety of XPath expression 'string()'")]
#[case(r#"<b onclick="{normalize-space()}"/>"#, &[], "Cannot assess the safety of XPath expression 'normalize-space()'")]
#[case(r#"<a href="{string()}"/>"#, &[], "Cannot assess the safety of XPath expression 'string()'")]
fn test_unsafe_content(#[case] source: &str, #[case] attributes: Attributes, #[case] expected: &str) {
    assert_eq!(check(source, attributes), Err(expected.to_string()));
}

#[rstest]
#[case("script", "#float")]
#[case("script", "#int")]
#[case("script", "#number")]
#[case("script", "#range")]
#[case("script", "#uint")]
#[case("script", "#url")]
#[case("script", "rawurlencode")]
#[case("script", "strtotime")]
#[case("script", "urlencode")]
#[case("style", "#color")]
#[case("style", "#float")]
#[case("style", "#int")]
#[case("style", "#number")]
#[case("style", "#range")]
#[case("style", "#simpletext")]
#[case("style", "#uint")]
#[case("style", "#url")]
fn test_safe_content(#[case] element: &str, #[case] filter: &str) {
    let source = format!(r#"<{element}><xsl:value-of select="@foo"/></{element}>"#);
    assert_eq!(check(&source, &[("foo", filter)]), Ok(()));
}

#[rstest]
#[case("b", "style", "CSS")]
#[case("b", "onclick", "JS")]
#[case("b", "onanything", "JS")]
#[case("form", "action", "URL")]
#[case("q", "cite", "URL")]
#[case("foo", "data", "URL")]
#[case("input", "formaction", "URL")]
#[case("a", "href", "URL")]
#[case("html", "manifest", "URL")]
#[case("video", "poster", "URL")]
#[case("img", "src", "URL")]
#[case("img", "lowsrc", "URL")]
fn test_attribute_sinks(#[case] element: &str, #[case] attribute: &str, #[case] sink: &str) {
    let expected = format!("Attribute 'foo' is not properly filtered to be used in {sink}");
    let literal = format!(r#"<{element} {attribute}="{{@foo}}"/>"#);
    assert_eq!(check(&literal, &[("foo", "")]), Err(expected.clone()));

    let dynamic = format!(
        r#"<{element}><xsl:attribute name="{attribute}"><xsl:value-of select="@foo"/></xsl:attribute></{element}>"#
    );
    assert_eq!(check(&dynamic, &[("foo", "")]), Err(expected));
}

#[test]
fn test_harmless_attributes() {
    assert_eq!(check(r#"<b title="{@foo}"/>"#, &[("foo", "")]), Ok(()));
    assert_eq!(
        check(r#"<b><xsl:value-of select="@foo"/></b>"#, &[("foo", "")]),
        Ok(())
    );
    assert_eq!(
        check(r#"<b><xsl:apply-templates/></b>"#, &[]),
        Ok(())
    );
}

#[test]
fn test_dynamic_attribute_content() {
    assert_eq!(
        check(
            r#"<b><xsl:attribute name="onclick"><xsl:apply-templates/></xsl:attribute></b>"#,
            &[]
        ),
        Err("A dynamically generated 'onclick' attribute lets unfiltered data through".to_string())
    );
}

#[rstest]
#[case(r#"<b><xsl:copy-of select="@onclick"/></b>"#, &[], Err("Undefined attribute 'onclick'"))]
#[case(r#"<b><xsl:copy-of select="@title"/></b>"#, &[], Ok(()))]
#[case(r#"<a><xsl:copy-of select="@href"/></a>"#, &[("href", "")], Err("Attribute 'href' is not properly filtered to be used in URL"))]
#[case(r#"<a><xsl:copy-of select="@href"/></a>"#, &[("href", "#url")], Ok(()))]
#[case(r#"<b><xsl:copy-of select="script"/></b>"#, &[], Err("Cannot assess 'xsl:copy-of' select expression 'script' to be safe"))]
#[case(r#"<b><xsl:copy-of select=" parent::* "/></b>"#, &[], Err("Cannot assess 'xsl:copy-of' select expression 'parent::*' to be safe"))]
fn test_copy_of(
    #[case] source: &str,
    #[case] attributes: Attributes,
    #[case] expected: Result<(), &str>,
) {
    assert_eq!(check(source, attributes), expected.map_err(str::to_string));
}

#[rstest]
#[case(r#"<b><xsl:value-of select="document('x')"/></b>"#)]
#[case(r#"<b><xsl:value-of select="doc&#117;ment('x')"/></b>"#)]
#[case(r#"<b><xsl:value-of select="concat('}',document())"/></b>"#)]
#[case(r#"<b title="{document()}"/>"#)]
#[case(r#"<b><xsl:if test="document('x')">x</xsl:if></b>"#)]
fn test_document_function(#[case] source: &str) {
    assert_eq!(
        check(source, &[]),
        Err("An XPath expression uses the document() function".to_string())
    );
}

#[rstest]
#[case(r#"<b title="document()"/>"#)]
#[case(r#"<b title="{&quot;document()&quot;}"/>"#)]
fn test_document_lookalikes(#[case] source: &str) {
    assert_eq!(check(source, &[]), Ok(()));
}

#[rstest]
#[case(r#"<a href="mailto:{@email}"/>"#, Ok(()))]
#[case(r#"<a href="mailto:{@email}?subject=foo"/>"#, Ok(()))]
#[case(r#"<a href="MAILTO:{@email}"/>"#, Ok(()))]
#[case(r#"<a><xsl:attribute name="href">mailto:<xsl:value-of select="@email"/></xsl:attribute></a>"#, Ok(()))]
#[case(r#"<a href="http://{@email}"/>"#, Err("Attribute 'email' is not properly filtered to be used in URL"))]
#[case(r#"<a href="{@email}"/>"#, Err("Attribute 'email' is not properly filtered to be used in URL"))]
fn test_mailto(#[case] source: &str, #[case] expected: Result<(), &str>) {
    assert_eq!(
        check(source, &[("email", "#email")]),
        expected.map_err(str::to_string)
    );
}

#[rstest]
#[case(r#"<b><?php echo 1; ?></b>"#, "PHP tags are not allowed")]
#[case(r#"<b><?PHP echo 1; ?></b>"#, "PHP tags are not allowed")]
#[case(r#"<xsl:processing-instruction name="php">echo 1;</xsl:processing-instruction>"#, "PHP tags are not allowed")]
#[case(r#"<xsl:processing-instruction name="PHP">echo 1;</xsl:processing-instruction>"#, "PHP tags are not allowed")]
#[case(r#"<xsl:processing-instruction name="{@foo}">x</xsl:processing-instruction>"#, "Dynamic processing instructions are not allowed")]
#[case(r#"<xsl:element name="b" use-attribute-sets="foo"/>"#, "Cannot assess the safety of attribute sets")]
#[case(r#"<b xsl:use-attribute-sets="foo"/>"#, "Cannot assess the safety of attribute sets")]
#[case(r#"<b disable-output-escaping="1"/>"#, "The template contains a 'disable-output-escaping' attribute")]
#[case(r#"<b><xsl:value-of select="@foo" disable-output-escaping="yes"/></b>"#, "The template contains a 'disable-output-escaping' attribute")]
#[case(r#"<b><xsl:text disable-output-escaping="yes">&lt;</xsl:text></b>"#, "The template contains a 'disable-output-escaping' attribute")]
#[case(r#"<xsl:element name="b" disable-output-escaping="yes"/>"#, "The template contains a 'disable-output-escaping' attribute")]
#[case(r#"<b><xsl:copy-of select="@foo" disable-output-escaping="yes"/></b>"#, "The template contains a 'disable-output-escaping' attribute")]
#[case(r#"<xsl:if test="@foo" disable-output-escaping="yes">x</xsl:if>"#, "The template contains a 'disable-output-escaping' attribute")]
#[case(r#"<xsl:variable name="v" disable-output-escaping="yes"/>"#, "The template contains a 'disable-output-escaping' attribute")]
#[case(r#"<xsl:copy/>"#, "Cannot assess the safety of an 'xsl:copy' element")]
#[case(r#"<xsl:call-template name="foo"/>"#, "Cannot assess the safety of an 'xsl:call-template' element")]
#[case(r#"<xsl:apply-imports/>"#, "Cannot assess the safety of an 'xsl:apply-imports' element")]
#[case(r#"<xsl:element name="{FOO}"/>"#, "Cannot assess 'xsl:element' name '{FOO}'")]
#[case(r#"<b><xsl:attribute name="{FOO}"/></b>"#, "Cannot assess 'xsl:attribute' name '{FOO}'")]
fn test_unassessable_structure(#[case] source: &str, #[case] expected: &str) {
    assert_eq!(check(source, &[]), Err(expected.to_string()));
}

#[rstest]
#[case(r#"<x:element xmlns:x="http://www.w3.org/1999/XSL/Transform" name="script"><x:apply-templates/></x:element>"#)]
#[case(r#"<element xmlns="http://www.w3.org/1999/XSL/Transform" name="script"><apply-templates/></element>"#)]
fn test_instructions_are_found_by_namespace(#[case] source: &str) {
    assert_eq!(
        check(source, &[]),
        Err("A dynamically generated 'script' element lets unfiltered data through".to_string())
    );
}

#[test]
fn test_max_script_access() {
    let options = CheckerOptions {
        max_script_access: Some(FlashSetting::Never),
        ..Default::default()
    };
    let error = check_with(r#"<embed src="http://example.org/x.swf"/>"#, &[], options);
    insta::assert_snapshot!(error.unwrap_err(), @"AllowScriptAccess setting 'sameDomain' exceeds restricted value 'never'");

    let error = check_with(
        r#"<object><param name="allowscriptaccess" value="always"/></object>"#,
        &[],
        options,
    );
    insta::assert_snapshot!(error.unwrap_err(), @"AllowScriptAccess setting 'always' exceeds restricted value 'never'");

    assert_eq!(
        check_with(
            r#"<embed src="http://example.org/x.swf" allowscriptaccess="never"/>"#,
            &[],
            options
        ),
        Ok(())
    );
}

#[test]
fn test_raised_fixed_url_exemption() {
    let options = CheckerOptions {
        fixed_url_exemption: FlashSetting::SameDomain,
        ..Default::default()
    };
    assert_eq!(
        check_with(r#"<embed src="{@url}"/>"#, &[("url", "#url")], options),
        Ok(())
    );
    assert!(check_with(
        r#"<embed src="{@url}" allowscriptaccess="always"/>"#,
        &[("url", "#url")],
        options
    )
    .is_err());
}

#[test]
fn test_error_kind() {
    let filters = FilterRegistry::default();
    let template = parse_template(
        r#"<b onclick="{@foo}"/>"#,
        &ParseOptions::default(),
    )
    .unwrap();
    let error = TemplateChecker::new(&filters)
        .check(&template, &tag(&[]))
        .unwrap_err();
    assert_eq!(error.kind(), &Unsafe::UndefinedAttribute("foo".to_string()));
    let b = template.first_child(template.root()).unwrap();
    assert_eq!(error.node(), b);
}
