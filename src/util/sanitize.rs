use std::sync::OnceLock;

use regex::Regex;

use crate::model::description::{Description, DESCRIPTION_ROOT};

/// Normalize an escaped rich-text field from the vendor into a [`Description`].
///
/// The rewrites run in a fixed order: `&amp;` is decoded before `&nbsp;` so that
/// doubly-escaped non-breaking spaces collapse to a single space, and every `&`
/// left afterwards is re-escaped before the markup is parsed. `&quot;` is the
/// one entity carried through, so quotes inside attribute values stay escaped.
///
/// Never fails. Markup that still does not parse is logged and yields an empty
/// description.
pub fn sanitize(raw: &str) -> Description {
    if raw.trim().is_empty() {
        return Description::default();
    }

    let body = normalize(raw);
    let markup = format!("<{DESCRIPTION_ROOT}>{body}</{DESCRIPTION_ROOT}>");
    match Description::parse(&markup) {
        Ok(description) => description,
        Err(e) => {
            tracing::warn!(error = %e, markup = %markup, "failed to parse description");
            Description::default()
        }
    }
}

const QUOT: &str = "&quot;";

/// Apply the ordered escape rewrites and wrap the body in a paragraph when needed.
pub fn normalize(raw: &str) -> String {
    static BR: OnceLock<Regex> = OnceLock::new();
    static CDATA: OnceLock<Regex> = OnceLock::new();
    let br = BR.get_or_init(|| Regex::new(r"<br\s*>").unwrap());
    let cdata = CDATA.get_or_init(|| Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").unwrap());

    // CDATA content goes through the same rewrites as any other text.
    let text = cdata.replace_all(raw, "$1");
    let text = text
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
        .replace("&nbsp;", " ");
    let text = decode_numeric_references(&text);
    let text = br.replace_all(&text, "<br/>");
    let text = escape_ampersands(&escape_quotes(&text));

    if text.starts_with("<p>") {
        text
    } else {
        format!("<p>{text}</p>")
    }
}

/// Decode `&#NN;` and `&#xHH;`. A decoded `"` becomes `&quot;` so it cannot end
/// an attribute value; references to invalid or control characters are left
/// for the `&` re-escape.
fn decode_numeric_references(text: &str) -> String {
    static NUMERIC: OnceLock<Regex> = OnceLock::new();
    let numeric =
        NUMERIC.get_or_init(|| Regex::new(r"&#(?:[xX]([0-9a-fA-F]{1,6})|([0-9]{1,7}));").unwrap());

    numeric
        .replace_all(text, |caps: &regex::Captures| {
            let code = match (caps.get(1), caps.get(2)) {
                (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
                (None, Some(dec)) => dec.as_str().parse::<u32>().ok(),
                (None, None) => None,
            };
            match code.and_then(char::from_u32) {
                Some('"') => QUOT.to_string(),
                Some(c) if !c.is_control() || matches!(c, '\t' | '\n' | '\r') => c.to_string(),
                _ => caps[0].to_string(),
            }
        })
        .into_owned()
}

#[derive(Clone, Copy)]
enum QuoteState {
    Text,
    Tag,
    Quoted,
    SingleQuoted,
    EntityQuoted,
}

/// Settle quotes before the markup is parsed.
///
/// In text a literal `"` becomes `&quot;`. Inside a tag an `&quot;` that opens
/// or closes an attribute value becomes a plain delimiter, while an `&quot;`
/// inside a `"`-delimited value is content and stays escaped.
fn escape_quotes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut state = QuoteState::Text;
    let mut skip_to = 0;
    for (i, c) in text.char_indices() {
        if i < skip_to {
            continue;
        }
        let at_quot = text[i..].starts_with(QUOT);
        state = match (state, c) {
            (QuoteState::Text, '<') => QuoteState::Tag,
            (QuoteState::Text, '"') => {
                out.push_str(QUOT);
                continue;
            }
            (QuoteState::Tag, '>') => QuoteState::Text,
            (QuoteState::Tag, '"') => QuoteState::Quoted,
            (QuoteState::Tag, '\'') => QuoteState::SingleQuoted,
            (QuoteState::Tag, '&') if at_quot => {
                out.push('"');
                skip_to = i + QUOT.len();
                QuoteState::EntityQuoted
            }
            (QuoteState::Quoted, '"') | (QuoteState::SingleQuoted, '\'') => QuoteState::Tag,
            (QuoteState::EntityQuoted, '&') if at_quot => {
                out.push('"');
                skip_to = i + QUOT.len();
                QuoteState::Tag
            }
            (QuoteState::EntityQuoted, '"') => {
                out.push_str(QUOT);
                continue;
            }
            (state, _) => state,
        };
        if i >= skip_to {
            out.push(c);
        }
    }
    out
}

/// Re-escape every `&` except the start of a `&quot;` entity.
fn escape_ampersands(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, c) in text.char_indices() {
        if c == '&' && !text[i..].starts_with(QUOT) {
            out.push_str("&amp;");
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::description::DescriptionNode;
    use pretty_assertions::assert_eq;

    #[test]
    fn doubly_escaped_nbsp_becomes_single_space() {
        assert_eq!(normalize("&amp;nbsp;"), "<p> </p>");
        assert_eq!(sanitize("&amp;nbsp;").text(), " ");
    }

    #[test]
    fn escaped_markup_is_decoded() {
        let desc = sanitize("&lt;p&gt;Hello &lt;b&gt;there&lt;/b&gt;&lt;/p&gt;");
        assert_eq!(desc.to_markup(), "<p>Hello <b>there</b></p>");
    }

    #[test]
    fn bare_line_breaks_are_closed() {
        assert_eq!(normalize("a<br>b<br  >c"), "<p>a<br/>b<br/>c</p>");
        assert_eq!(sanitize("a<br >b").to_markup(), "<p>a<br/>b</p>");
    }

    #[test]
    fn remaining_ampersands_are_reescaped() {
        let desc = sanitize("Tom & Jerry");
        assert_eq!(desc.text(), "Tom & Jerry");
        assert_eq!(desc.to_markup(), "<p>Tom &amp; Jerry</p>");
    }

    #[test]
    fn quote_entities_are_decoded() {
        let desc = sanitize("say &quot;hi&quot;");
        assert_eq!(desc.text(), "say \"hi\"");
        assert_eq!(normalize("say \"hi\""), "<p>say &quot;hi&quot;</p>");
    }

    #[test]
    fn quotes_inside_attribute_values_survive() {
        let desc = sanitize(r#"<p><span style="font-family: &quot;Arial&quot;">Hello</span></p>"#);
        assert_eq!(desc.text(), "Hello");
        assert_eq!(
            desc.to_markup(),
            r#"<p><span style="font-family: &quot;Arial&quot;">Hello</span></p>"#
        );
        let DescriptionNode::Element { children, .. } = &desc.nodes[0] else {
            panic!("expected paragraph");
        };
        let DescriptionNode::Element { attributes, .. } = &children[0] else {
            panic!("expected span");
        };
        assert_eq!(
            attributes,
            &vec![("style".to_string(), "font-family: \"Arial\"".to_string())]
        );
    }

    #[test]
    fn escaped_markup_with_quoted_attributes_parses() {
        let desc = sanitize("&lt;a href=&quot;https://rally.test/x&quot;&gt;link&lt;/a&gt;");
        assert_eq!(
            desc.to_markup(),
            r#"<p><a href="https://rally.test/x">link</a></p>"#
        );
    }

    #[test]
    fn numeric_references_are_decoded() {
        assert_eq!(sanitize("it&#39;s").text(), "it's");
        assert_eq!(sanitize("a&#160;b").text(), "a\u{a0}b");
        assert_eq!(sanitize("caf&#xE9;").text(), "café");
        assert_eq!(sanitize("it&amp;#39;s").text(), "it's");
        assert_eq!(sanitize("&#34;quoted&#x22;").text(), "\"quoted\"");
    }

    #[test]
    fn invalid_numeric_references_stay_literal() {
        assert_eq!(sanitize("&#0;").text(), "&#0;");
        assert_eq!(sanitize("&#xD800;").text(), "&#xD800;");
    }

    #[test]
    fn cdata_content_is_normalized_like_text() {
        assert_eq!(sanitize("<p><![CDATA[plain & simple]]></p>").text(), "plain & simple");
        assert!(sanitize("<p><![CDATA[1 < 2]]></p>").is_empty());
    }

    #[test]
    fn paragraph_is_synthesized_only_when_missing() {
        assert_eq!(normalize("plain"), "<p>plain</p>");
        assert_eq!(normalize("<p>already</p>"), "<p>already</p>");
    }

    #[test]
    fn end_to_end_example_keeps_both_spaces() {
        let desc = sanitize("A &amp;nbsp;B");
        assert_eq!(desc.text(), "A  B");
    }

    #[test]
    fn sanitizing_rendered_output_is_stable() {
        let inputs = [
            "A &amp;nbsp;B",
            "Tom & Jerry",
            "Tom &amp;amp; Jerry",
            "&lt;p&gt;one&lt;/p&gt;&lt;p&gt;two&lt;br&gt;three&lt;/p&gt;",
            "say &quot;hi&quot;",
            "<ul><li>x</li><li>y</li></ul>",
            r#"<p><span style="font-family: &quot;Arial&quot;">Hello</span></p>"#,
            "<p><![CDATA[1 < 2]]></p>",
            "<p><![CDATA[plain & simple]]></p>",
            "it&#39;s &#34;fine&#34;",
            "a &lt; b",
        ];
        for input in inputs {
            let once = sanitize(input);
            let twice = sanitize(&once.to_markup());
            assert_eq!(twice, once, "input: {input}");
        }
    }

    #[test]
    fn unparseable_markup_degrades_to_empty() {
        let desc = sanitize("<b>unclosed");
        assert!(desc.is_empty());
    }

    #[test]
    fn blank_input_is_empty() {
        assert!(sanitize("").is_empty());
        assert!(sanitize("   ").is_empty());
    }
}
