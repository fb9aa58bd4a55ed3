//! A small css-ish selector engine over an html5ever dom.
//!
//! Supports tag, `#id`, `.class`, `[attr]`, `[attr=value]` (plus `^=`, `$=`,
//! `*=`), descendant and `>` child combinators. Matches are returned in
//! document order.

use std::{
    cell::Ref,
    collections::{HashMap, HashSet},
    sync::Arc,
};

use html5ever::{
    driver::ParseOpts, parse_document, tendril::TendrilSink, tree_builder::TreeBuilderOpts,
};
use markup5ever::{Attribute, QualName};
use markup5ever_arcdom::{ArcDom, Handle, NodeData};

pub struct Document {
    doc: ArcDom,
}

fn default_parse_opts() -> ParseOpts {
    ParseOpts {
        tree_builder: TreeBuilderOpts {
            drop_doctype: true,
            ..Default::default()
        },
        ..Default::default()
    }
}

impl TryFrom<&str> for Document {
    type Error = imhodump_common::Report;

    fn try_from(input: &str) -> Result<Self, Self::Error> {
        let doc = parse_document(ArcDom::default(), default_parse_opts())
            .from_utf8()
            .read_from(&mut input.as_bytes())?;

        Ok(Self { doc })
    }
}

impl Document {
    pub fn select(&self, selector: &str) -> Vec<Element> {
        Selector::from(selector).find(self.doc.document.children.borrow())
    }

    pub fn first(&self, selector: &str) -> Option<Element> {
        self.select(selector).into_iter().next()
    }
}

#[derive(Debug, PartialEq, Clone)]
enum AttributeSpec {
    Present,
    Exact(String),
    Starts(String),
    Ends(String),
    Contains(String),
}

impl AttributeSpec {
    fn matches(&self, value: &str) -> bool {
        match self {
            AttributeSpec::Present => true,
            AttributeSpec::Exact(v) => value == v,
            AttributeSpec::Starts(v) => value.starts_with(v.as_str()),
            AttributeSpec::Ends(v) => value.ends_with(v.as_str()),
            AttributeSpec::Contains(v) => value.contains(v.as_str()),
        }
    }
}

#[derive(Debug, PartialEq, Clone, Default)]
struct Matcher {
    tag: Option<String>,
    class: Vec<String>,
    id: Option<String>,
    attribute: HashMap<String, AttributeSpec>,
    /// A bare `>` combinator
    child_combinator: bool,
}

impl From<&str> for Matcher {
    fn from(input: &str) -> Self {
        if input == ">" {
            return Self {
                child_combinator: true,
                ..Default::default()
            };
        }

        let mut segments = vec![];
        let mut buf = String::new();

        for c in input.chars() {
            match c {
                '#' | '.' | '[' => {
                    segments.push(std::mem::take(&mut buf));
                }
                ']' => {
                    segments.push(std::mem::take(&mut buf));
                    continue;
                }
                _ => {}
            };

            buf.push(c);
        }
        segments.push(buf);

        let mut res = Self::default();

        for segment in segments {
            match segment.chars().next() {
                Some('#') => res.id = Some(segment[1..].to_string()),
                Some('.') => res.class.push(segment[1..].to_string()),
                Some('[') => res.add_attribute(&segment[1..]),
                None => {}
                _ => res.tag = Some(segment),
            }
        }

        res
    }
}

impl Matcher {
    fn add_attribute(&mut self, spec: &str) {
        let (key, value) = match spec.split_once('=') {
            Some((key, value)) => (key, value.trim_matches('"').to_string()),
            None => {
                self.attribute.insert(spec.to_string(), AttributeSpec::Present);
                return;
            }
        };

        let (key, spec) = match key.chars().last() {
            Some('^') => (&key[..key.len() - 1], AttributeSpec::Starts(value)),
            Some('$') => (&key[..key.len() - 1], AttributeSpec::Ends(value)),
            Some('*') => (&key[..key.len() - 1], AttributeSpec::Contains(value)),
            _ => (key, AttributeSpec::Exact(value)),
        };

        self.attribute.insert(key.to_string(), spec);
    }

    fn matches(&self, name: &QualName, attrs: Ref<'_, Vec<Attribute>>) -> bool {
        if let Some(tag) = &self.tag {
            if &*name.local != tag.as_str() {
                return false;
            }
        }

        if let Some(id) = &self.id {
            if get_attr(&attrs, "id").as_deref() != Some(id.as_str()) {
                return false;
            }
        }

        if !self.class.is_empty() {
            let el_class = get_attr(&attrs, "class").unwrap_or_default();
            let el_classes: Vec<_> = el_class.split_whitespace().collect();

            if !self
                .class
                .iter()
                .all(|class| el_classes.iter().any(|eclass| eclass == class))
            {
                return false;
            }
        }

        self.attribute
            .iter()
            .all(|(key, spec)| match get_attr(&attrs, key) {
                Some(value) => spec.matches(&value),
                None => false,
            })
    }
}

#[derive(Debug, PartialEq)]
struct Selector {
    matchers: Vec<Matcher>,
}

impl From<&str> for Selector {
    fn from(input: &str) -> Self {
        let matchers: Vec<_> = input.split_whitespace().map(Matcher::from).collect();

        Selector { matchers }
    }
}

fn children_of(elements: &[Handle]) -> Vec<Handle> {
    elements
        .iter()
        .flat_map(|el| {
            el.children
                .borrow()
                .iter()
                .map(Arc::clone)
                .collect::<Vec<_>>()
        })
        .collect()
}

fn get_attr(attrs: &Ref<'_, Vec<Attribute>>, name: &str) -> Option<String> {
    attrs
        .iter()
        .find(|attr| &*attr.name.local == name)
        .map(|attr| attr.value.to_string())
}

impl Selector {
    fn find_nodes(
        &self,
        matcher: &Matcher,
        elements: &[Handle],
        direct: bool,
        acc: &mut Vec<Handle>,
    ) {
        for el in elements {
            if let NodeData::Element {
                ref name,
                ref attrs,
                ..
            } = el.data
            {
                if matcher.matches(name, attrs.borrow()) {
                    acc.push(Arc::clone(el));
                }
            }

            if !direct {
                let children: Vec<_> = el.children.borrow().iter().map(Arc::clone).collect();
                self.find_nodes(matcher, &children, false, acc);
            }
        }
    }

    fn find(&self, elements: Ref<'_, Vec<Handle>>) -> Vec<Element> {
        let mut elements: Vec<_> = elements.iter().map(Arc::clone).collect();
        let mut direct = false;

        for (step, matcher) in self.matchers.iter().enumerate() {
            // after the first step only what lies below the previous matches is searched
            if matcher.child_combinator || (step > 0 && !direct) {
                elements = children_of(&elements);
            }

            if matcher.child_combinator {
                direct = true;
                continue;
            }

            let mut acc = vec![];
            self.find_nodes(matcher, &elements, direct, &mut acc);

            // nested matches of the previous step reach the same descendants twice
            let mut seen = HashSet::new();
            acc.retain(|el| seen.insert(Arc::as_ptr(el)));

            elements = acc;
            direct = false;
        }

        elements.iter().map(Element::from).collect()
    }
}

#[derive(Debug)]
pub struct Element {
    handle: Handle,
}

impl From<&Handle> for Element {
    fn from(e: &Handle) -> Self {
        Element {
            handle: Arc::clone(e),
        }
    }
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<String> {
        match self.handle.data {
            NodeData::Element { ref attrs, .. } => get_attr(&attrs.borrow(), name),
            _ => None,
        }
    }

    /// Concatenated text of every descendant text node.
    pub fn text(&self) -> String {
        let mut res = String::new();
        collect_text(&self.handle, &mut res);
        res
    }

    pub fn select(&self, selector: &str) -> Vec<Element> {
        Selector::from(selector).find(self.handle.children.borrow())
    }

    pub fn first(&self, selector: &str) -> Option<Element> {
        self.select(selector).into_iter().next()
    }
}

fn collect_text(handle: &Handle, buf: &mut String) {
    for child in handle.children.borrow().iter() {
        match child.data {
            NodeData::Text { ref contents } => buf.push_str(&contents.borrow()),
            NodeData::Element { .. } => collect_text(child, buf),
            _ => {}
        }
    }
}
