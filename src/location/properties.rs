//! Property discovery.
//!
//! A configuration document declares the properties it needs through
//! `value="${name}"` attributes. Discovery collects those names (with any
//! declared `default`) and merges them into the location's property map.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;

static PROPERTY_REFERENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").expect("valid regex"));

/// Property name to value; `None` means declared but unset.
pub type PropertyMap = BTreeMap<String, Option<String>>;

/// Collect every property a document references.
pub fn discover_properties(content: &[u8]) -> Result<PropertyMap, String> {
    let mut reader = Reader::from_reader(content);
    let mut discovered = PropertyMap::new();
    let mut depth = 0usize;
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| format!("position {}: {}", reader.buffer_position(), e))?;
        match &event {
            Event::Start(element) => {
                depth += 1;
                collect(element, &mut discovered)?;
            }
            Event::Empty(element) => collect(element, &mut discovered)?,
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Eof => break,
            _ => {}
        }
    }

    if depth > 0 {
        return Err("document ends inside an open element".to_string());
    }
    Ok(discovered)
}

fn collect(element: &BytesStart<'_>, discovered: &mut PropertyMap) -> Result<(), String> {
    let mut value = None;
    let mut default = None;
    for attr in element.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        match attr.key.as_ref() {
            b"value" => value = Some(attr.unescape_value().map_err(|e| e.to_string())?.into_owned()),
            b"default" => default = Some(attr.unescape_value().map_err(|e| e.to_string())?.into_owned()),
            _ => {}
        }
    }

    let Some(value) = value else {
        return Ok(());
    };
    let default = if element.name().as_ref() == b"property" { default } else { None };
    for caps in PROPERTY_REFERENCE.captures_iter(&value) {
        discovered.entry(caps[1].to_string()).or_insert_with(|| default.clone());
    }
    Ok(())
}

/// Merge discovered properties into an existing map.
///
/// Existing values win, newly discovered names are added with their
/// discovered value, and names the document no longer references are removed.
pub fn merge_discovered(existing: &mut PropertyMap, discovered: PropertyMap) {
    existing.retain(|name, _| discovered.contains_key(name));
    for (name, value) in discovered {
        existing.entry(name).or_insert(value);
    }
}

/// Properties with a non-blank value.
pub fn non_empty(properties: &PropertyMap) -> BTreeMap<String, String> {
    properties
        .iter()
        .filter_map(|(name, value)| {
            value.as_ref().filter(|v| !v.trim().is_empty()).map(|v| (name.clone(), v.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, Option<&str>)]) -> PropertyMap {
        entries.iter().map(|(k, v)| (k.to_string(), v.map(str::to_string))).collect()
    }

    #[test]
    fn test_discovers_references_and_defaults() {
        let xml = br#"<module name="Checker">
            <module name="LineLength">
                <property name="max" value="${maxLen}" default="100"/>
                <property name="ignorePattern" value="${ignore}"/>
            </module>
            <module name="FileLength"><property name="max" value="2000"/></module>
        </module>"#;

        let discovered = discover_properties(xml).unwrap();
        assert_eq!(discovered, map(&[("ignore", None), ("maxLen", Some("100"))]));
    }

    #[test]
    fn test_multiple_references_in_one_value() {
        let discovered = discover_properties(br#"<property name="f" value="${a}/${b}"/>"#).unwrap();
        assert_eq!(discovered.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_malformed_document() {
        assert!(discover_properties(b"<module name=\"Checker\"><module>").is_err());
        assert!(discover_properties(b"<module></other>").is_err());
    }

    #[test]
    fn test_merge_keeps_existing_adds_new_drops_absent() {
        let mut existing = map(&[("a", Some("1")), ("c", Some("2"))]);
        merge_discovered(&mut existing, map(&[("a", None), ("b", None)]));
        assert_eq!(existing, map(&[("a", Some("1")), ("b", None)]));

        let again = existing.clone();
        merge_discovered(&mut existing, map(&[("a", None), ("b", None)]));
        assert_eq!(existing, again);
    }

    #[test]
    fn test_non_empty_filters_blank_values() {
        let props = map(&[("a", Some("1")), ("b", None), ("c", Some("  "))]);
        assert_eq!(non_empty(&props), BTreeMap::from([("a".to_string(), "1".to_string())]));
    }
}
