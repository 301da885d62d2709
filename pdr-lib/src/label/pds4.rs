//! PDS4 XML labels, folded into the same [Block] shape PDS3 labels use.
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::trace;

use super::pds3::parse_number;
use super::{Block, LabelFormat, Metadata, Value};
use crate::Result;

/// Key holding an element's own text when it also carries attributes.
pub const TEXT_KEY: &str = "_text";

/// Tags that describe array-like data objects.
pub const ARRAY_TAGS: [&str; 6] = [
    "Array",
    "Array_1D",
    "Array_2D",
    "Array_2D_Image",
    "Array_3D_Image",
    "Array_3D_Spectrum",
];
/// Tags that describe table data objects.
pub const TABLE_TAGS: [&str; 3] = ["Table_Binary", "Table_Character", "Table_Delimited"];

#[derive(Debug, Default)]
struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn start(e: &BytesStart<'_>, visited: &mut Vec<String>) -> Result<Self> {
        let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
        visited.push(name.clone());
        let mut attrs = Vec::new();
        for attr in e.attributes() {
            let attr = attr.map_err(quick_xml::Error::from)?;
            let raw = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            if raw.starts_with("xmlns") || raw.starts_with("xsi:") {
                continue;
            }
            let key = format!("@{}", raw.rsplit(':').next().unwrap_or(&raw));
            visited.push(key.clone());
            attrs.push((key, attr.unescape_value()?.into_owned()));
        }
        Ok(Self {
            name,
            attrs,
            ..Default::default()
        })
    }

    fn into_entry(self) -> (String, Value) {
        let text = self.text.trim();
        if self.children.is_empty() && self.attrs.is_empty() {
            return (self.name, scalar(text));
        }
        let mut block = Block::new();
        for (k, v) in self.attrs {
            block.push(k, Value::Text(v));
        }
        if !text.is_empty() {
            block.push(TEXT_KEY, scalar(text));
        }
        for child in self.children {
            let (k, v) = child.into_entry();
            block.push(k, v);
        }
        (self.name, Value::Block(block))
    }
}

fn scalar(text: &str) -> Value {
    parse_number(text).unwrap_or_else(|| Value::Text(text.to_string()))
}

fn attach(stack: &mut [Element], root: &mut Vec<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => root.push(element),
    }
}

/// Convert an XML document into a label tree plus every element and attribute name
/// visited, in document order and not deduplicated.
///
/// Elements holding only child elements become blocks, repeated sibling elements become
/// repeated keys, attributes become `@name` keys.
pub fn adapt(xml: &str) -> Result<(Block, Vec<String>)> {
    // Text is trimmed per element rather than per event so entity references keep the
    // whitespace around them.
    let mut reader = Reader::from_str(xml);

    let mut visited = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut roots: Vec<Element> = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) => stack.push(Element::start(&e, &mut visited)?),
            Event::Empty(e) => {
                let element = Element::start(&e, &mut visited)?;
                attach(&mut stack, &mut roots, element);
            }
            Event::End(_) => {
                if let Some(element) = stack.pop() {
                    attach(&mut stack, &mut roots, element);
                }
            }
            Event::Text(t) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&t));
                }
            }
            Event::CData(t) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&t));
                }
            }
            Event::GeneralRef(r) => {
                if let Some(top) = stack.last_mut() {
                    if let Ok(Some(c)) = r.resolve_char_ref() {
                        top.text.push(c);
                    } else {
                        let name = String::from_utf8_lossy(&r);
                        if let Some(s) = quick_xml::escape::resolve_predefined_entity(&name) {
                            top.text.push_str(s);
                        }
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    // Tolerate truncated documents by closing whatever is still open.
    while let Some(element) = stack.pop() {
        attach(&mut stack, &mut roots, element);
    }
    trace!(names = visited.len(), "adapted xml label");

    let mut tree = Block::new();
    for element in roots {
        let (k, v) = element.into_entry();
        tree.push(k, v);
    }
    Ok((tree, visited))
}

/// Parse a PDS4 XML label into [Metadata].
pub fn parse(xml: &str) -> Result<Metadata> {
    let (tree, visited) = adapt(xml)?;
    Ok(Metadata::new(tree, visited, LabelFormat::Pds4, xml.to_string()))
}

/// Scalar content of an element, looking through a `{@attr.., _text}` wrapper.
pub fn text_of(value: &Value) -> Option<&Value> {
    match value {
        Value::Block(b) => b.get(TEXT_KEY),
        other => Some(other),
    }
}

/// A data object declared by a PDS4 `File_Area_*` element.
#[derive(Debug, Clone)]
pub struct Pds4Object {
    pub name: String,
    pub file_name: String,
    /// Tag of the describing element, e.g., `Array_2D_Image`.
    pub tag: String,
    pub block: Block,
}

/// Data objects declared in `File_Area_*` elements, in label order.
///
/// Objects are named by `local_identifier`, then `name`, then `<tag>_<index>`.
pub fn objects(meta: &Metadata) -> Vec<Pds4Object> {
    let mut found = Vec::new();
    let mut areas = Vec::new();
    collect_file_areas(meta.tree(), &mut areas);
    let mut index = 0;
    for area in areas {
        let Some(file_name) = area
            .get("File")
            .and_then(Value::as_block)
            .and_then(|f| f.get("file_name"))
            .and_then(text_of)
            .map(Value::to_string)
        else {
            continue;
        };
        for (tag, value) in area.iter() {
            let Some(block) = value.as_block() else {
                continue;
            };
            let kind_tag = ARRAY_TAGS.contains(&tag)
                || TABLE_TAGS.contains(&tag)
                || tag == "Header"
                || tag == "Encoded_Header";
            if !kind_tag {
                continue;
            }
            let name = ["local_identifier", "name"]
                .iter()
                .find_map(|k| block.get(k).and_then(text_of).map(Value::to_string))
                .unwrap_or_else(|| format!("{tag}_{index}"));
            index += 1;
            found.push(Pds4Object {
                name,
                file_name: file_name.clone(),
                tag: tag.to_string(),
                block: block.clone(),
            });
        }
    }
    found
}

fn collect_file_areas<'a>(block: &'a Block, areas: &mut Vec<&'a Block>) {
    for (k, v) in block.iter() {
        if let Value::Block(child) = v {
            if k.starts_with("File_Area") {
                areas.push(child);
            } else {
                collect_file_areas(child, areas);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LABEL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Product_Observational xmlns="http://pds.nasa.gov/pds4/pds/v1"
    xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <Identification_Area>
    <logical_identifier>urn:nasa:pds:test:data:cat</logical_identifier>
    <title>Cats &amp; Dogs</title>
  </Identification_Area>
  <File_Area_Observational>
    <File><file_name>cat.img</file_name></File>
    <Array_2D_Image>
      <local_identifier>CAT_IMAGE</local_identifier>
      <offset unit="byte">0</offset>
      <Axis_Array><axis_name>Line</axis_name><elements>2</elements></Axis_Array>
      <Axis_Array><axis_name>Sample</axis_name><elements>3</elements></Axis_Array>
    </Array_2D_Image>
  </File_Area_Observational>
</Product_Observational>
"#;

    #[test]
    fn adapt_builds_blocks_and_repeated_keys() {
        let (tree, visited) = adapt(LABEL).unwrap();
        let product = tree.get("Product_Observational").unwrap().as_block().unwrap();
        let image = product.find_block("Array_2D_Image").unwrap();
        assert_eq!(image.get_all("Axis_Array").count(), 2);
        let offset = image.get("offset").unwrap().as_block().unwrap();
        assert_eq!(offset.get("@unit"), Some(&Value::from("byte")));
        assert_eq!(offset.get(TEXT_KEY), Some(&Value::Integer(0)));
        assert_eq!(product.find("title"), Some(&Value::from("Cats & Dogs")));
        assert_eq!(visited.iter().filter(|n| *n == "Axis_Array").count(), 2);
        assert!(visited.contains(&"@unit".to_string()));
        assert!(!visited.iter().any(|n| n.contains("xmlns")));
    }

    #[test]
    fn objects_are_named_by_identifier() {
        let meta = parse(LABEL).unwrap();
        let objects = objects(&meta);
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].name, "CAT_IMAGE");
        assert_eq!(objects[0].file_name, "cat.img");
        assert_eq!(objects[0].tag, "Array_2D_Image");
        assert_eq!(meta.format(), LabelFormat::Pds4);
        assert_eq!(meta.fieldcount("elements"), 2);
    }

    #[test]
    fn malformed_xml_is_an_error() {
        assert!(adapt("<a><b></a>").is_err());
    }
}
