use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Root element wrapping the sanitized markup.
pub const DESCRIPTION_ROOT: &str = "description";

/// HTML elements that never carry content and render self-closed.
const VOID_ELEMENTS: &[&str] = &["br", "hr", "img"];

/// Structured rich-text content of a story or task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Description {
    pub nodes: Vec<DescriptionNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DescriptionNode {
    Text {
        text: String,
    },
    Element {
        name: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        attributes: Vec<(String, String)>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        children: Vec<DescriptionNode>,
    },
}

#[derive(Debug, Error)]
pub enum DescriptionError {
    #[error("malformed description markup: {0}")]
    Malformed(String),
    #[error("expected <{DESCRIPTION_ROOT}> root element, found <{0}>")]
    UnexpectedRoot(String),
    #[error("description markup ended with unclosed <{0}>")]
    Unclosed(String),
}

struct OpenElement {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<DescriptionNode>,
}

impl Description {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Parses a `<description>` document into its content nodes.
    pub fn parse(markup: &str) -> Result<Self, DescriptionError> {
        let mut reader = Reader::from_str(markup);
        let mut stack: Vec<OpenElement> = Vec::new();
        let mut root: Option<Vec<DescriptionNode>> = None;

        loop {
            let event = reader
                .read_event()
                .map_err(|e| DescriptionError::Malformed(e.to_string()))?;
            match event {
                Event::Start(ref e) => stack.push(open_element(e)?),
                Event::Empty(ref e) => {
                    let element = open_element(e)?;
                    if stack.is_empty() {
                        check_root(&element.name)?;
                        root = Some(Vec::new());
                    } else {
                        push_child(&mut stack, close_element(element));
                    }
                }
                Event::End(_) => {
                    let Some(element) = stack.pop() else {
                        return Err(DescriptionError::Malformed("unbalanced end tag".into()));
                    };
                    if stack.is_empty() {
                        check_root(&element.name)?;
                        root = Some(element.children);
                    } else {
                        push_child(&mut stack, close_element(element));
                    }
                }
                Event::Text(ref e) => {
                    let text = e
                        .unescape()
                        .map_err(|err| DescriptionError::Malformed(err.to_string()))?;
                    push_text(&mut stack, &text)?;
                }
                Event::CData(_) => {
                    return Err(DescriptionError::Malformed(
                        "CDATA sections are not allowed".into(),
                    ));
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = stack.pop() {
            return Err(DescriptionError::Unclosed(open.name));
        }
        root.map(|nodes| Self { nodes })
            .ok_or_else(|| DescriptionError::Malformed("missing root element".into()))
    }

    /// Renders the content back to markup, without the `<description>` root.
    pub fn to_markup(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            render(node, &mut out);
        }
        out
    }

    /// Flattens the content to plain text.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            collect_text(node, &mut out);
        }
        out
    }
}

fn open_element(start: &BytesStart) -> Result<OpenElement, DescriptionError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| DescriptionError::Malformed(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| DescriptionError::Malformed(e.to_string()))?;
        attributes.push((key, value.into_owned()));
    }
    Ok(OpenElement {
        name,
        attributes,
        children: Vec::new(),
    })
}

fn close_element(element: OpenElement) -> DescriptionNode {
    DescriptionNode::Element {
        name: element.name,
        attributes: element.attributes,
        children: element.children,
    }
}

fn check_root(name: &str) -> Result<(), DescriptionError> {
    if name == DESCRIPTION_ROOT {
        Ok(())
    } else {
        Err(DescriptionError::UnexpectedRoot(name.to_string()))
    }
}

fn push_child(stack: &mut [OpenElement], node: DescriptionNode) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
    }
}

fn push_text(stack: &mut [OpenElement], text: &str) -> Result<(), DescriptionError> {
    let Some(parent) = stack.last_mut() else {
        if text.trim().is_empty() {
            return Ok(());
        }
        return Err(DescriptionError::Malformed("text outside root element".into()));
    };
    // Adjacent text events collapse into one node.
    if let Some(DescriptionNode::Text { text: last }) = parent.children.last_mut() {
        last.push_str(text);
    } else {
        parent.children.push(DescriptionNode::Text {
            text: text.to_string(),
        });
    }
    Ok(())
}

fn render(node: &DescriptionNode, out: &mut String) {
    match node {
        DescriptionNode::Text { text } => out.push_str(&partial_escape(text)),
        DescriptionNode::Element {
            name,
            attributes,
            children,
        } => {
            out.push('<');
            out.push_str(name);
            for (key, value) in attributes {
                out.push_str(&format!(
                    " {key}=\"{}\"",
                    partial_escape(value).replace('"', "&quot;")
                ));
            }
            if children.is_empty() && VOID_ELEMENTS.contains(&name.as_str()) {
                out.push_str("/>");
                return;
            }
            out.push('>');
            for child in children {
                render(child, out);
            }
            out.push_str(&format!("</{name}>"));
        }
    }
}

fn collect_text(node: &DescriptionNode, out: &mut String) {
    match node {
        DescriptionNode::Text { text } => out.push_str(text),
        DescriptionNode::Element { name, children, .. } => {
            if name == "br" {
                out.push('\n');
            }
            for child in children {
                collect_text(child, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> DescriptionNode {
        DescriptionNode::Text { text: s.into() }
    }

    #[test]
    fn parse_paragraph_with_markup() {
        let desc =
            Description::parse("<description><p>Hello <b>world</b><br/>bye</p></description>")
                .unwrap();
        assert_eq!(desc.nodes.len(), 1);
        let DescriptionNode::Element { name, children, .. } = &desc.nodes[0] else {
            panic!("expected element");
        };
        assert_eq!(name, "p");
        assert_eq!(children.len(), 4);
        assert_eq!(children[0], text("Hello "));
        assert_eq!(desc.text(), "Hello world\nbye");
    }

    #[test]
    fn parse_unescapes_entities() {
        let desc = Description::parse("<description><p>a &amp; b</p></description>").unwrap();
        assert_eq!(desc.text(), "a & b");
    }

    #[test]
    fn parse_keeps_attributes() {
        let desc = Description::parse(
            "<description><p><a href=\"http://x/?a=1&amp;b=2\">link</a></p></description>",
        )
        .unwrap();
        assert_eq!(
            desc.to_markup(),
            "<p><a href=\"http://x/?a=1&amp;b=2\">link</a></p>"
        );
    }

    #[test]
    fn parse_rejects_mismatched_tags() {
        let result = Description::parse("<description><p><b>x</p></description>");
        assert!(result.is_err());
    }

    #[test]
    fn parse_rejects_unclosed_root() {
        let result = Description::parse("<description><p>x</p>");
        assert!(result.is_err());
    }

    #[test]
    fn parse_rejects_wrong_root() {
        let result = Description::parse("<summary>x</summary>");
        assert!(matches!(result, Err(DescriptionError::UnexpectedRoot(_))));
    }

    #[test]
    fn markup_escapes_text_but_not_quotes() {
        let desc = Description {
            nodes: vec![DescriptionNode::Element {
                name: "p".into(),
                attributes: vec![],
                children: vec![text("say \"hi\" & <go>")],
            }],
        };
        assert_eq!(desc.to_markup(), "<p>say \"hi\" &amp; &lt;go&gt;</p>");
    }

    #[test]
    fn void_elements_render_self_closed() {
        let desc = Description::parse("<description><p>a<br/>b</p><p></p></description>").unwrap();
        assert_eq!(desc.to_markup(), "<p>a<br/>b</p><p></p>");
    }

    #[test]
    fn parse_rejects_cdata() {
        let result = Description::parse("<description><p><![CDATA[1 < 2]]></p></description>");
        assert!(matches!(result, Err(DescriptionError::Malformed(_))));
    }

    #[test]
    fn empty_root_has_no_nodes() {
        let desc = Description::parse("<description/>").unwrap();
        assert!(desc.is_empty());
    }
}
