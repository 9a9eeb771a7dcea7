use std::borrow::Cow;

use xmlparser::{ElementEnd, Token, Tokenizer};

use crate::encoding::decode;
use crate::entity::parse_entities;
use crate::error::{Error, ParseError};
use crate::template::{
    AttributeConstructor, Comment, DynamicElement, Element, Instruction, Node,
    ProcessingInstruction, Template, Text, Value, ValueOf, XSL_NAMESPACE,
};

const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Options for building a template from source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseOptions {
    /// Keep text nodes made only of whitespace. They are dropped by default,
    /// except inside `xsl:text`.
    pub preserve_whitespace: bool,
}

struct PendingElement<'a> {
    prefix: &'a str,
    local: &'a str,
    attributes: Vec<(&'a str, &'a str, Cow<'a, str>)>,
    declarations: Vec<(&'a str, Cow<'a, str>)>,
}

struct OpenElement<'a> {
    prefix: &'a str,
    local: &'a str,
    node: Node,
    declarations: Vec<(&'a str, Cow<'a, str>)>,
}

impl OpenElement<'_> {
    fn qualified_name(&self) -> String {
        qualified_name(self.prefix, self.local)
    }
}

fn qualified_name(prefix: &str, local: &str) -> String {
    if prefix.is_empty() {
        local.to_string()
    } else {
        format!("{}:{}", prefix, local)
    }
}

struct TemplateBuilder<'a> {
    template: Template,
    open: Vec<OpenElement<'a>>,
    pending: Option<PendingElement<'a>>,
    preserve_whitespace: bool,
}

impl<'a> TemplateBuilder<'a> {
    fn new(options: &ParseOptions) -> Self {
        TemplateBuilder {
            template: Template::new(),
            open: Vec::new(),
            pending: None,
            preserve_whitespace: options.preserve_whitespace,
        }
    }

    fn current(&self) -> Node {
        self.open
            .last()
            .map_or(self.template.root(), |element| element.node)
    }

    /// Resolve a prefix against the declarations in scope. The empty prefix
    /// resolves to the default namespace, which may be none.
    fn namespace(
        &self,
        prefix: &str,
        pending: &[(&'a str, Cow<'a, str>)],
    ) -> Result<Option<String>, ParseError> {
        let declared = pending.iter().rev().chain(
            self.open
                .iter()
                .rev()
                .flat_map(|element| element.declarations.iter().rev()),
        );
        for (declared_prefix, uri) in declared {
            if *declared_prefix == prefix {
                return Ok((!uri.is_empty()).then(|| uri.to_string()));
            }
        }
        match prefix {
            "" => Ok(None),
            "xsl" => Ok(Some(XSL_NAMESPACE.to_string())),
            "xml" => Ok(Some(XML_NAMESPACE.to_string())),
            _ => Err(ParseError::UnknownPrefix(prefix.to_string())),
        }
    }

    fn element_start(&mut self, prefix: &'a str, local: &'a str) {
        self.pending = Some(PendingElement {
            prefix,
            local,
            attributes: Vec::new(),
            declarations: Vec::new(),
        });
    }

    fn attribute(
        &mut self,
        prefix: &'a str,
        local: &'a str,
        value: &'a str,
    ) -> Result<(), ParseError> {
        let value = parse_entities(value.into())?;
        if let Some(pending) = &mut self.pending {
            match (prefix, local) {
                ("", "xmlns") => pending.declarations.push(("", value)),
                ("xmlns", _) => pending.declarations.push((local, value)),
                _ => pending.attributes.push((prefix, local, value)),
            }
        }
        Ok(())
    }

    fn open_element(&mut self, empty: bool) -> Result<(), ParseError> {
        let Some(pending) = self.pending.take() else {
            return Ok(());
        };
        let namespace = self.namespace(pending.prefix, &pending.declarations)?;
        let is_instruction = namespace.as_deref() == Some(XSL_NAMESPACE);
        let value = if is_instruction {
            self.instruction(&pending)?
        } else {
            let mut element = Element::new(pending.local);
            element.namespace = namespace;
            for (prefix, local, value) in &pending.attributes {
                let name = if prefix.is_empty() {
                    local.to_string()
                } else if self.namespace(prefix, &pending.declarations)?.as_deref()
                    == Some(XSL_NAMESPACE)
                {
                    format!("xsl:{}", local)
                } else {
                    qualified_name(prefix, local)
                };
                element.attributes.push((name, value.to_string()));
            }
            Value::Element(element)
        };
        let node = self.template.new_node(value);
        let parent = self.current();
        self.template.append(parent, node);
        let unescaped = pending
            .attributes
            .iter()
            .any(|(prefix, local, _)| prefix.is_empty() && *local == "disable-output-escaping");
        if is_instruction && unescaped {
            self.template.set_disable_output_escaping(node);
        }
        if !empty {
            self.open.push(OpenElement {
                prefix: pending.prefix,
                local: pending.local,
                node,
                declarations: pending.declarations,
            });
        }
        Ok(())
    }

    fn instruction(&self, pending: &PendingElement<'a>) -> Result<Value, ParseError> {
        let attribute = |name: &str| {
            pending
                .attributes
                .iter()
                .find(|(prefix, local, _)| prefix.is_empty() && *local == name)
                .map(|(_, _, value)| value.to_string())
        };
        let required = |name: &'static str| {
            attribute(name).ok_or_else(|| ParseError::MissingAttribute {
                element: pending.local.to_string(),
                attribute: name,
            })
        };
        let disable_output_escaping = attribute("disable-output-escaping").is_some();
        Ok(match pending.local {
            "element" => Value::DynamicElement(DynamicElement {
                name: required("name")?,
                namespace: attribute("namespace"),
                use_attribute_sets: attribute("use-attribute-sets"),
            }),
            "attribute" => Value::Attribute(AttributeConstructor {
                name: required("name")?,
                namespace: attribute("namespace"),
            }),
            "text" => Value::Text(Text {
                text: String::new(),
                disable_output_escaping,
                verbatim: true,
            }),
            "value-of" => Value::ValueOf(ValueOf {
                select: required("select")?,
                disable_output_escaping,
            }),
            "copy-of" => Value::CopyOf(required("select")?),
            "copy" => Value::Copy,
            "if" => Value::If(required("test")?),
            "choose" => Value::Choose,
            "when" => Value::When(required("test")?),
            "otherwise" => Value::Otherwise,
            "for-each" => Value::ForEach(required("select")?),
            "apply-templates" => Value::ApplyTemplates(attribute("select")),
            "processing-instruction" => {
                Value::ProcessingInstructionConstructor(required("name")?)
            }
            "comment" => Value::Comment(Comment {
                text: String::new(),
                literal: false,
            }),
            name => Value::Instruction(Instruction {
                name: name.to_string(),
                attributes: pending
                    .attributes
                    .iter()
                    .map(|(prefix, local, value)| {
                        (qualified_name(prefix, local), value.to_string())
                    })
                    .collect(),
            }),
        })
    }

    fn close_element(&mut self, prefix: &str, local: &str) -> Result<(), ParseError> {
        let found = qualified_name(prefix, local);
        let open = self
            .open
            .pop()
            .ok_or_else(|| ParseError::UnexpectedCloseTag(found.clone()))?;
        if open.prefix != prefix || open.local != local {
            return Err(ParseError::InvalidCloseTag {
                expected: open.qualified_name(),
                found,
            });
        }
        Ok(())
    }

    fn text(&mut self, text: Cow<str>) {
        let current = self.current();
        if let Value::Text(xsl_text) = self.template.value_mut(current) {
            // content of xsl:text
            xsl_text.text.push_str(&text);
            return;
        }
        if !self.preserve_whitespace && text.trim().is_empty() {
            return;
        }
        if let Some(last) = self.template.last_child(current) {
            if let Value::Text(Text {
                text: existing,
                verbatim: false,
                ..
            }) = self.template.value_mut(last)
            {
                existing.push_str(&text);
                return;
            }
        }
        let node = self.template.new_node(Value::Text(Text::new(text)));
        self.template.append(current, node);
    }

    fn add(&mut self, value: Value) {
        let node = self.template.new_node(value);
        let current = self.current();
        self.template.append(current, node);
    }

    fn finish(self) -> Result<Template, ParseError> {
        match self.open.last() {
            Some(open) => Err(ParseError::UnclosedElement(open.qualified_name())),
            None => Ok(self.template),
        }
    }
}

fn build(source: &str, options: &ParseOptions) -> Result<Template, ParseError> {
    let mut builder = TemplateBuilder::new(options);
    for token in Tokenizer::from_fragment(source, 0..source.len()) {
        match token? {
            Token::ElementStart { prefix, local, .. } => {
                builder.element_start(prefix.as_str(), local.as_str());
            }
            Token::Attribute {
                prefix,
                local,
                value,
                ..
            } => {
                builder.attribute(prefix.as_str(), local.as_str(), value.as_str())?;
            }
            Token::ElementEnd { end, .. } => match end {
                ElementEnd::Open => builder.open_element(false)?,
                ElementEnd::Empty => builder.open_element(true)?,
                ElementEnd::Close(prefix, local) => {
                    builder.close_element(prefix.as_str(), local.as_str())?
                }
            },
            Token::Text { text } => {
                let text = parse_entities(text.as_str().into())?;
                builder.text(text);
            }
            Token::Cdata { text, .. } => builder.text(text.as_str().into()),
            Token::Comment { text, .. } => builder.add(Value::Comment(Comment {
                text: text.as_str().to_string(),
                literal: true,
            })),
            Token::ProcessingInstruction {
                target, content, ..
            } => builder.add(Value::ProcessingInstruction(ProcessingInstruction {
                target: target.as_str().to_string(),
                data: content.map(|content| content.as_str().to_string()),
            })),
            _ => {}
        }
    }
    builder.finish()
}

/// Build a template from the content of an `xsl:template` element.
///
/// The `xsl` prefix is bound to the XSL namespace. Instructions are
/// recognized by namespace, so any prefix bound to it works.
///
/// ```rust
/// use tagrules::{parse_template, ParseOptions, ValueType};
///
/// let template = parse_template(
///     r#"<b><xsl:apply-templates/></b>"#,
///     &ParseOptions::default(),
/// )?;
/// let b = template.first_child(template.root()).unwrap();
/// let apply = template.first_child(b).unwrap();
/// assert_eq!(template.value_type(apply), ValueType::ApplyTemplates);
/// # Ok::<(), tagrules::Error>(())
/// ```
pub fn parse_template(source: &str, options: &ParseOptions) -> Result<Template, Error> {
    Ok(build(source, options)?)
}

/// Build a template from bytes in any encoding `xhtmlchardet` can detect.
/// A leading XML declaration is skipped.
pub fn parse_template_bytes(bytes: &[u8], options: &ParseOptions) -> Result<Template, Error> {
    let source = decode(bytes, None)?;
    let mut content = source.trim_start();
    if content.starts_with("<?xml ") {
        if let Some(end) = content.find("?>") {
            content = &content[end + 2..];
        }
    }
    parse_template(content, options)
}
