//! A compressed HTML5 content model.
//!
//! Each element has a bitfield of the content categories it belongs to, a
//! bitfield of the categories it accepts as children and a bitfield of the
//! categories it forbids as descendants. Some bits only apply when a
//! condition on the element's attributes holds, e.g. `img` is interactive
//! content only with `@usemap`.
use crate::template::Element;

/// Which bitfield of a descriptor a conditional bit belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Categories,
    AllowedChildren,
    DeniedDescendants,
}

/// A condition on the literal attributes of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    Has(&'static str),
    Lacks(&'static str),
    /// The attribute is present with another value.
    NotEquals(&'static str, &'static str),
    /// The attribute is present with one of the values.
    EqualsAny(&'static str, &'static [&'static str]),
}

impl Condition {
    pub fn holds(&self, element: &Element) -> bool {
        match self {
            Condition::Has(name) => element.attribute(name).is_some(),
            Condition::Lacks(name) => element.attribute(name).is_none(),
            Condition::NotEquals(name, value) => {
                element.attribute(name).is_some_and(|actual| actual != *value)
            }
            Condition::EqualsAny(name, values) => element
                .attribute(name)
                .is_some_and(|actual| values.contains(&actual)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConditionalBit {
    pub field: Field,
    pub bit: u32,
    pub condition: Condition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementDescriptor {
    pub name: &'static str,
    pub categories: u32,
    pub allowed_children: u32,
    pub denied_descendants: u32,
    /// The element has a transparent content model.
    pub transparent: bool,
    /// Elements whose optional end tag is implied by this element's start
    /// tag.
    pub closes: &'static [&'static str],
    pub conditions: &'static [ConditionalBit],
}

impl ElementDescriptor {
    const fn new(name: &'static str, categories: u32, allowed_children: u32) -> Self {
        ElementDescriptor {
            name,
            categories,
            allowed_children,
            denied_descendants: 0,
            transparent: false,
            closes: &[],
            conditions: &[],
        }
    }

    const fn deny(self, denied_descendants: u32) -> Self {
        ElementDescriptor {
            denied_descendants,
            ..self
        }
    }

    const fn transparent(self) -> Self {
        ElementDescriptor {
            transparent: true,
            ..self
        }
    }

    const fn closes(self, closes: &'static [&'static str]) -> Self {
        ElementDescriptor { closes, ..self }
    }

    const fn when(self, conditions: &'static [ConditionalBit]) -> Self {
        ElementDescriptor { conditions, ..self }
    }

    /// A bitfield of this element, with the bits whose condition does not
    /// hold for `element` cleared.
    pub fn bits(&self, field: Field, element: &Element) -> u32 {
        let mut bits = match field {
            Field::Categories => self.categories,
            Field::AllowedChildren => self.allowed_children,
            Field::DeniedDescendants => self.denied_descendants,
        };
        for conditional in self.conditions {
            if conditional.field == field && !conditional.condition.holds(element) {
                bits &= !(1 << conditional.bit);
            }
        }
        bits
    }
}

const fn c(bit: u32, condition: Condition) -> ConditionalBit {
    ConditionalBit {
        field: Field::Categories,
        bit,
        condition,
    }
}

const fn ac(bit: u32, condition: Condition) -> ConditionalBit {
    ConditionalBit {
        field: Field::AllowedChildren,
        bit,
        condition,
    }
}

use Condition::*;

const P: &[&str] = &["p"];

/// Sorted by name.
static ELEMENTS: &[ElementDescriptor] = &[
    ElementDescriptor::new("a", 15, 0).deny(8).transparent(),
    ElementDescriptor::new("abbr", 7, 4),
    ElementDescriptor::new("address", 1027, 1).deny(1552).closes(P),
    ElementDescriptor::new("area", 5, 0),
    ElementDescriptor::new("article", 515, 1).closes(P),
    ElementDescriptor::new("aside", 515, 1).closes(P),
    ElementDescriptor::new("audio", 47, 8192)
        .transparent()
        .when(&[
            c(3, Has("controls")),
            c(1, Has("controls")),
            ac(13, Has("src")),
        ]),
    ElementDescriptor::new("b", 7, 4),
    ElementDescriptor::new("bdi", 7, 4),
    ElementDescriptor::new("bdo", 7, 4),
    ElementDescriptor::new("blockquote", 259, 1).closes(P),
    ElementDescriptor::new("br", 5, 0),
    ElementDescriptor::new("button", 15, 4).deny(8),
    ElementDescriptor::new("canvas", 39, 0).transparent(),
    ElementDescriptor::new("caption", 64, 1).deny(4194304),
    ElementDescriptor::new("cite", 7, 4),
    ElementDescriptor::new("code", 7, 4),
    ElementDescriptor::new("col", 268435456, 0).when(&[c(28, Lacks("span"))]),
    ElementDescriptor::new("colgroup", 64, 268435456).when(&[ac(28, Lacks("span"))]),
    ElementDescriptor::new("datalist", 5, 1048580),
    ElementDescriptor::new("dd", 131072, 1).closes(&["dd", "dt"]),
    ElementDescriptor::new("del", 5, 0).transparent(),
    ElementDescriptor::new("details", 267, 524289),
    ElementDescriptor::new("dfn", 134217735, 4).deny(134217728),
    ElementDescriptor::new("div", 3, 1).closes(P),
    ElementDescriptor::new("dl", 3, 131072).closes(P),
    ElementDescriptor::new("dt", 131072, 1)
        .deny(16912)
        .closes(&["dd", "dt"]),
    ElementDescriptor::new("em", 7, 4),
    ElementDescriptor::new("embed", 47, 0),
    ElementDescriptor::new("fieldset", 259, 2097153).closes(P),
    ElementDescriptor::new("figcaption", 0x80000000, 1),
    ElementDescriptor::new("figure", 259, 0x80000001),
    ElementDescriptor::new("footer", 17411, 1).deny(16384).closes(P),
    ElementDescriptor::new("form", 67108867, 1)
        .deny(67108864)
        .closes(P),
    ElementDescriptor::new("h1", 147, 4).closes(P),
    ElementDescriptor::new("h2", 147, 4).closes(P),
    ElementDescriptor::new("h3", 147, 4).closes(P),
    ElementDescriptor::new("h4", 147, 4).closes(P),
    ElementDescriptor::new("h5", 147, 4).closes(P),
    ElementDescriptor::new("h6", 147, 4).closes(P),
    ElementDescriptor::new("header", 17411, 1).deny(16384).closes(P),
    ElementDescriptor::new("hgroup", 19, 128).closes(P),
    ElementDescriptor::new("hr", 1, 0).closes(P),
    ElementDescriptor::new("i", 7, 4),
    ElementDescriptor::new("img", 47, 0).when(&[c(3, Has("usemap"))]),
    ElementDescriptor::new("input", 15, 0).when(&[
        c(3, NotEquals("type", "hidden")),
        c(1, NotEquals("type", "hidden")),
    ]),
    ElementDescriptor::new("ins", 7, 0).transparent(),
    ElementDescriptor::new("kbd", 7, 4),
    ElementDescriptor::new("keygen", 15, 0),
    ElementDescriptor::new("label", 33554447, 4).deny(33554432),
    ElementDescriptor::new("legend", 2097152, 4),
    ElementDescriptor::new("li", 1073741824, 1).closes(&["li"]),
    ElementDescriptor::new("map", 7, 0).transparent(),
    ElementDescriptor::new("mark", 7, 4),
    ElementDescriptor::new("menu", 11, 1073741825)
        .closes(P)
        .when(&[
            c(3, EqualsAny("type", &["toolbar"])),
            c(1, EqualsAny("type", &["toolbar", "list"])),
        ]),
    ElementDescriptor::new("meter", 16779271, 4).deny(16777216),
    ElementDescriptor::new("nav", 515, 1).closes(P),
    ElementDescriptor::new("object", 47, 8388608)
        .transparent()
        .when(&[c(3, Has("usemap"))]),
    ElementDescriptor::new("ol", 3, 1073741824).closes(P),
    ElementDescriptor::new("optgroup", 4096, 1048576).closes(&["optgroup", "option"]),
    ElementDescriptor::new("option", 1052672, 0).closes(&["option"]),
    ElementDescriptor::new("output", 7, 4),
    ElementDescriptor::new("p", 3, 4).closes(P),
    ElementDescriptor::new("param", 8388608, 0),
    ElementDescriptor::new("pre", 3, 4).closes(P),
    ElementDescriptor::new("progress", 264199, 4).deny(262144),
    ElementDescriptor::new("q", 7, 4),
    ElementDescriptor::new("rp", 65536, 4).closes(&["rp", "rt"]),
    ElementDescriptor::new("rt", 65536, 4).closes(&["rp", "rt"]),
    ElementDescriptor::new("ruby", 7, 65540),
    ElementDescriptor::new("s", 7, 4),
    ElementDescriptor::new("samp", 7, 4),
    ElementDescriptor::new("section", 515, 1).closes(P),
    ElementDescriptor::new("select", 15, 4096),
    ElementDescriptor::new("small", 7, 4),
    ElementDescriptor::new("source", 8192, 0).when(&[c(13, Lacks("src"))]),
    ElementDescriptor::new("span", 7, 4),
    ElementDescriptor::new("strong", 7, 4),
    ElementDescriptor::new("sub", 7, 4),
    ElementDescriptor::new("summary", 524288, 4),
    ElementDescriptor::new("sup", 7, 4),
    ElementDescriptor::new("table", 4194307, 64).closes(P),
    ElementDescriptor::new("tbody", 64, 536870912).closes(&["tbody", "tfoot", "thead"]),
    ElementDescriptor::new("td", 33024, 1).closes(&["td", "th"]),
    ElementDescriptor::new("textarea", 15, 0),
    ElementDescriptor::new("tfoot", 64, 536870912).closes(&["tbody", "thead"]),
    ElementDescriptor::new("th", 32768, 1)
        .deny(16912)
        .closes(&["td", "th"]),
    ElementDescriptor::new("thead", 64, 536870912),
    ElementDescriptor::new("time", 7, 4),
    ElementDescriptor::new("tr", 536870976, 32768).closes(&["tr"]),
    ElementDescriptor::new("track", 8192, 0).when(&[c(13, Has("src"))]),
    ElementDescriptor::new("u", 7, 4),
    ElementDescriptor::new("ul", 3, 1073741824).closes(P),
    ElementDescriptor::new("var", 7, 4),
    ElementDescriptor::new("video", 47, 8192)
        .transparent()
        .when(&[c(3, Has("controls")), ac(13, Has("src"))]),
    ElementDescriptor::new("wbr", 5, 0),
];

/// Look up an element by its lowercase name.
pub fn element(name: &str) -> Option<&'static ElementDescriptor> {
    ELEMENTS
        .binary_search_by(|descriptor| descriptor.name.cmp(name))
        .ok()
        .map(|index| &ELEMENTS[index])
}

/// Every element of the table, in name order.
pub fn elements() -> impl Iterator<Item = &'static ElementDescriptor> {
    ELEMENTS.iter()
}
