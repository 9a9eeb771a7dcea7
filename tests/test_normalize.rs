use rstest::rstest;

use tagrules::{
    parse_template, ConvertCurlyExpressionsInText, InlineLiteralValueOf,
    MergeIdenticalConditionalBranches, Node, Normalization, ParseOptions, Template,
    TemplateNormalizer, Text, Value,
};

/// A compact rendering of a template tree.
fn outline(template: &Template, node: Node) -> String {
    let label = match template.value(node) {
        Value::Root => "root".to_string(),
        Value::Element(element) => element.name.clone(),
        Value::Text(text) => format!("{:?}", text.text),
        Value::ValueOf(value_of) => format!("value-of({})", value_of.select),
        Value::If(test) => format!("if({test})"),
        Value::When(test) => format!("when({test})"),
        other => format!("{:?}", other.value_type()).to_lowercase(),
    };
    let children = template
        .children(node)
        .map(|child| outline(template, child))
        .collect::<Vec<_>>();
    if children.is_empty() {
        label
    } else {
        format!("{label}[{}]", children.join(", "))
    }
}

fn normalized(source: &str, normalization: impl Normalization) -> String {
    let mut template = parse_template(source, &ParseOptions::default()).unwrap();
    normalization.normalize(&mut template);
    outline(&template, template.root())
}

#[rstest]
#[case("<b>Hello {@name}!</b>", r#"root[b["Hello ", value-of(@name), "!"]]"#)]
#[case("<b>{@a}{$b}</b>", "root[b[value-of(@a), value-of($b)]]")]
#[case("<b>{@a b} {x}</b>", r#"root[b["{@a b} {x}"]]"#)]
#[case("<b><xsl:text>{@a}</xsl:text></b>", r#"root[b["{@a}"]]"#)]
#[case(r#"<xsl:if test="@a">{@a}</xsl:if>"#, r#"root[if(@a)["{@a}"]]"#)]
fn test_convert_curly_expressions(#[case] source: &str, #[case] expected: &str) {
    assert_eq!(normalized(source, ConvertCurlyExpressionsInText), expected);
}

#[rstest]
#[case(r#"<b><xsl:value-of select="'foo'"/></b>"#, r#"root[b["foo"]]"#)]
#[case(r#"<b><xsl:value-of select='"x&apos;y"'/></b>"#, r#"root[b["x'y"]]"#)]
#[case(r#"<b><xsl:value-of select="@foo"/></b>"#, "root[b[value-of(@foo)]]")]
#[case(r#"<b><xsl:value-of select="concat('a', 'b')"/></b>"#, "root[b[value-of(concat('a', 'b'))]]")]
fn test_inline_literal_value_of(#[case] source: &str, #[case] expected: &str) {
    assert_eq!(normalized(source, InlineLiteralValueOf), expected);
}

#[test]
fn test_inlined_literal_is_escaped_text() {
    let mut template =
        parse_template(r#"<b><xsl:value-of select="'&lt;i&gt;'"/></b>"#, &ParseOptions::default())
            .unwrap();
    InlineLiteralValueOf.normalize(&mut template);
    let b = template.first_child(template.root()).unwrap();
    let text = template.first_child(b).unwrap();
    assert_eq!(template.value(text), &Value::Text(Text::new("<i>")));
}

#[rstest]
#[case(
    r#"<xsl:choose><xsl:when test="@x=1">A</xsl:when><xsl:when test="@x=2">A</xsl:when><xsl:otherwise>B</xsl:otherwise></xsl:choose>"#,
    r#"root[choose[when(@x=1 or @x=2)["A"], otherwise["B"]]]"#
)]
#[case(
    r#"<xsl:choose><xsl:when test="@x=1">A</xsl:when><xsl:when test="@x=2">B</xsl:when><xsl:when test="@x=3">A</xsl:when></xsl:choose>"#,
    r#"root[choose[when(@x=1 or @x=3)["A"], when(@x=2)["B"]]]"#
)]
#[case(
    r#"<xsl:choose><xsl:when test="@x=1">A</xsl:when><xsl:when test="@y=1">A</xsl:when></xsl:choose>"#,
    r#"root[choose[when(@x=1 or @y=1)["A"]]]"#
)]
#[case(
    r#"<xsl:choose><xsl:when test="@x=1">A</xsl:when><xsl:when test="@y=1">B</xsl:when><xsl:when test="@z=1">A</xsl:when></xsl:choose>"#,
    r#"root[choose[when(@x=1)["A"], when(@y=1)["B"], when(@z=1)["A"]]]"#
)]
#[case(
    r#"<xsl:choose><xsl:when test="@x=1"><b>A</b></xsl:when><xsl:when test="@x=2"><i>A</i></xsl:when></xsl:choose>"#,
    r#"root[choose[when(@x=1)[b["A"]], when(@x=2)[i["A"]]]]"#
)]
fn test_merge_identical_branches(#[case] source: &str, #[case] expected: &str) {
    assert_eq!(normalized(source, MergeIdenticalConditionalBranches), expected);
}

#[test]
fn test_default_normalizer_runs_in_order() {
    let mut template = parse_template(
        r#"<b>{@a}<xsl:value-of select="'!'"/></b>"#,
        &ParseOptions::default(),
    )
    .unwrap();
    TemplateNormalizer::default().normalize(&mut template);
    assert_eq!(
        outline(&template, template.root()),
        r#"root[b[value-of(@a), "!"]]"#
    );
}

struct UppercaseText;

impl Normalization for UppercaseText {
    fn normalize(&self, template: &mut Template) {
        let nodes = template.descendants(template.root()).collect::<Vec<_>>();
        for node in nodes {
            if let Value::Text(text) = template.value_mut(node) {
                text.text = text.text.to_uppercase();
            }
        }
    }
}

#[test]
fn test_custom_normalization() {
    let mut normalizer = TemplateNormalizer::empty();
    normalizer.push(UppercaseText);
    let mut template = parse_template("<b>{@a}</b>", &ParseOptions::default()).unwrap();
    normalizer.normalize(&mut template);
    assert_eq!(outline(&template, template.root()), r#"root[b["{@A}"]]"#);
}
