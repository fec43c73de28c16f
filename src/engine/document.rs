//! Configuration document parsing.
//!
//! A configuration is a tree of `<module name="...">` elements, each carrying
//! `<property name="..." value="..."/>` children.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// A `<module>` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleNode {
    pub name: String,
    pub properties: Vec<PropertyNode>,
    pub children: Vec<ModuleNode>,
}

/// A `<property>` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyNode {
    pub name: String,
    pub value: String,
    /// Used when `value` references a property nobody set
    pub default: Option<String>,
}

/// Parse a configuration document into its root module.
pub fn parse_modules(content: &[u8]) -> Result<ModuleNode, String> {
    let mut reader = Reader::from_reader(content);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<ModuleNode> = Vec::new();
    let mut root: Option<ModuleNode> = None;
    let mut depth_outside_modules = 0usize;
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| format!("unable to parse configuration at position {}: {}", reader.buffer_position(), e))?;

        match &event {
            Event::Start(e) if e.name().as_ref() == b"module" && depth_outside_modules == 0 => {
                stack.push(module_from(e)?);
            }
            Event::Empty(e) if e.name().as_ref() == b"module" && depth_outside_modules == 0 => {
                let module = module_from(e)?;
                attach(&mut stack, &mut root, module)?;
            }
            Event::Empty(e) | Event::Start(e) if e.name().as_ref() == b"property" && depth_outside_modules == 0 => {
                let property = property_from(e)?;
                let Some(parent) = stack.last_mut() else {
                    return Err(format!("property '{}' is not inside a module", property.name));
                };
                parent.properties.push(property);
                if matches!(event, Event::Start(_)) {
                    depth_outside_modules += 1;
                }
            }
            // <message>, <metadata> and anything else carry nothing we evaluate.
            Event::Start(_) => depth_outside_modules += 1,
            Event::End(e) => {
                if depth_outside_modules > 0 {
                    depth_outside_modules -= 1;
                } else if e.name().as_ref() == b"module" {
                    if let Some(module) = stack.pop() {
                        attach(&mut stack, &mut root, module)?;
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(format!("module '{}' is not closed", open.name));
    }
    root.ok_or_else(|| "configuration contains no module".to_string())
}

fn attach(stack: &mut [ModuleNode], root: &mut Option<ModuleNode>, module: ModuleNode) -> Result<(), String> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(module);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(module);
            Ok(())
        }
        None => Err(format!("configuration has more than one root module ('{}')", module.name)),
    }
}

fn module_from(element: &BytesStart<'_>) -> Result<ModuleNode, String> {
    let name = attribute(element, "name")?.ok_or_else(|| "module without a name".to_string())?;
    Ok(ModuleNode { name, properties: Vec::new(), children: Vec::new() })
}

fn property_from(element: &BytesStart<'_>) -> Result<PropertyNode, String> {
    let name = attribute(element, "name")?.ok_or_else(|| "property without a name".to_string())?;
    let value = attribute(element, "value")?.unwrap_or_default();
    let default = attribute(element, "default")?;
    Ok(PropertyNode { name, value, default })
}

fn attribute(element: &BytesStart<'_>, key: &str) -> Result<Option<String>, String> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| format!("invalid attribute: {}", e))?;
        if attr.key.as_ref() == key.as_bytes() {
            let value = attr.unescape_value().map_err(|e| format!("invalid attribute value: {}", e))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"<?xml version="1.0"?>
<!DOCTYPE module PUBLIC "-//Checkstyle//DTD Checkstyle Configuration 1.3//EN"
  "https://checkstyle.org/dtds/configuration_1_3.dtd">
<module name="Checker">
  <property name="severity" value="warning"/>
  <module name="LineLength">
    <property name="max" value="${maxLen}" default="100"/>
    <message key="maxLineLen" value="Too long"/>
  </module>
  <module name="TreeWalker">
    <module name="TodoComment"/>
  </module>
</module>
"#;

    #[test]
    fn test_parses_module_tree() {
        let root = parse_modules(CONFIG.as_bytes()).unwrap();
        assert_eq!(root.name, "Checker");
        assert_eq!(root.properties[0].value, "warning");
        assert_eq!(root.children.len(), 2);

        let line_length = &root.children[0];
        assert_eq!(line_length.properties[0].value, "${maxLen}");
        assert_eq!(line_length.properties[0].default.as_deref(), Some("100"));
        assert_eq!(root.children[1].children[0].name, "TodoComment");
    }

    #[test]
    fn test_unescapes_values() {
        let xml = r#"<module name="Checker"><module name="RegexpSingleline"><property name="format" value="a&amp;b"/></module></module>"#;
        let root = parse_modules(xml.as_bytes()).unwrap();
        assert_eq!(root.children[0].properties[0].value, "a&b");
    }

    #[test]
    fn test_rejects_unclosed_module() {
        assert!(parse_modules(br#"<module name="Checker"><module name="LineLength">"#).is_err());
    }

    #[test]
    fn test_rejects_mismatched_tags() {
        assert!(parse_modules(br#"<module name="Checker"></property>"#).is_err());
    }

    #[test]
    fn test_rejects_empty_document() {
        assert!(parse_modules(b"<?xml version=\"1.0\"?>").is_err());
    }
}
