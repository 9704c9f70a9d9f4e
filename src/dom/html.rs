//! Lenient HTML reader feeding `quick-xml` events into a xot tree.
//!
//! Names are lower-cased and never namespaced, void elements need no end
//! tag, stray end tags close the nearest matching element or are ignored,
//! and unknown entities are kept as written.

use std::borrow::Cow;

use quick_xml::escape::{resolve_html5_entity, unescape_with};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use xot::Xot;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Appends the nodes of `input` to `parent`. Returns the content of a
/// `<!DOCTYPE ...>` declaration when the markup had one.
pub(super) fn parse_into(
    xot: &mut Xot,
    parent: xot::Node,
    input: &str,
) -> Result<Option<String>, String> {
    let mut reader = Reader::from_str(input);
    {
        let config = reader.config_mut();
        config.trim_text(false);
        config.check_end_names = false;
        config.allow_unmatched_ends = true;
        config.allow_dangling_amp = true;
    }

    let top_level = xot.is_document(parent);
    let mut doctype = None;
    let mut open: Vec<(xot::Node, String)> = Vec::new();
    loop {
        let event = reader
            .read_event()
            .map_err(|err| format!("{err} (at byte {})", reader.buffer_position()))?;
        let current = open.last().map_or(parent, |(node, _)| *node);
        match event {
            Event::Start(start) => {
                let (element, name) = open_element(xot, &start)?;
                attach(xot, current, element)?;
                if !VOID_ELEMENTS.contains(&name.as_str()) {
                    open.push((element, name));
                }
            }
            Event::Empty(start) => {
                let (element, _) = open_element(xot, &start)?;
                attach(xot, current, element)?;
            }
            Event::End(end) => {
                let name = utf8(end.name().into_inner())?.to_ascii_lowercase();
                if let Some(index) = open.iter().rposition(|(_, open_name)| *open_name == name) {
                    open.truncate(index);
                }
            }
            Event::Text(text) => {
                let text = utf8(&text)?;
                append_text(xot, current, text, top_level && open.is_empty())?;
            }
            Event::GeneralRef(reference) => {
                let text = match reference.resolve_char_ref().map_err(|err| err.to_string())? {
                    Some(c) => c.to_string(),
                    None => {
                        let name = reference.decode().map_err(|err| err.to_string())?;
                        match resolve_html5_entity(&name) {
                            Some(value) => value.to_string(),
                            None => format!("&{name};"),
                        }
                    }
                };
                append_text(xot, current, &text, top_level && open.is_empty())?;
            }
            Event::CData(data) => {
                let text = utf8(&data)?;
                append_text(xot, current, text, top_level && open.is_empty())?;
            }
            Event::Comment(comment) => {
                let node = xot.new_comment(utf8(&comment)?);
                attach(xot, current, node)?;
            }
            Event::PI(instruction) => {
                let raw = utf8(&instruction)?;
                let (target, data) = match raw.find(char::is_whitespace) {
                    Some(index) => (&raw[..index], Some(raw[index..].trim_start())),
                    None => (raw, None),
                };
                let target = xot.add_name(target);
                let node = xot.new_processing_instruction(target, data);
                attach(xot, current, node)?;
            }
            Event::DocType(content) => {
                doctype = Some(utf8(&content)?.trim().to_string());
            }
            Event::Decl(_) => {}
            Event::Eof => break,
        }
    }
    Ok(doctype)
}

fn utf8(bytes: &[u8]) -> Result<&str, String> {
    std::str::from_utf8(bytes).map_err(|err| format!("invalid UTF-8: {err}"))
}

fn attach(xot: &mut Xot, parent: xot::Node, child: xot::Node) -> Result<(), String> {
    xot.append(parent, child).map_err(|err| err.to_string())
}

fn open_element(xot: &mut Xot, start: &BytesStart<'_>) -> Result<(xot::Node, String), String> {
    let name = utf8(start.name().into_inner())?.to_ascii_lowercase();
    let name_id = xot.add_name(&name);
    let element = xot.new_element(name_id);
    let mut attributes = start.html_attributes();
    attributes.with_checks(false);
    for attribute in attributes {
        let attribute = attribute.map_err(|err| err.to_string())?;
        let key = utf8(attribute.key.as_ref())?.to_ascii_lowercase();
        let raw = utf8(&attribute.value)?;
        let value = unescape_with(raw, resolve_html5_entity).unwrap_or(Cow::Borrowed(raw));
        let key = xot.add_name(&key);
        xot.attributes_mut(element).insert(key, value.into_owned());
    }
    Ok((element, name))
}

fn append_text(
    xot: &mut Xot,
    parent: xot::Node,
    text: &str,
    top_level: bool,
) -> Result<(), String> {
    if text.is_empty() || (top_level && text.trim().is_empty()) {
        return Ok(());
    }
    if let Some(last) = xot.last_child(parent) {
        if let Some(existing) = xot.text_mut(last) {
            existing.get_mut().push_str(text);
            return Ok(());
        }
    }
    let node = xot.new_text(text);
    attach(xot, parent, node)
}

#[cfg(test)]
mod tests {
    use crate::dom::Document;

    #[test]
    fn is_lenient_about_case_void_elements_and_stray_tags() {
        let document =
            Document::parse_html("<HTML><Body><p class=x>a<br>b &copy; &bogus;</p></div></body></html>")
                .unwrap();
        let html = document.document_element().unwrap();
        assert_eq!(html.node_name(), "html");
        let p = html.first_child().unwrap().first_child().unwrap();
        assert_eq!(p.attribute("class").as_deref(), Some("x"));
        assert_eq!(p.children().len(), 3);
        assert_eq!(p.text_content(), "ab \u{A9} &bogus;");
    }

    #[test]
    fn doctype_is_written_back() {
        let document = Document::parse_html("<!DOCTYPE html>\n<p>x</p>").unwrap();
        assert_eq!(document.to_html(), "<!DOCTYPE html>\n<p>x</p>\n");
    }
}
