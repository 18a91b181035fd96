//! Layered cluster configuration and the merge engine.
//!
//! Configuration content maps a section type (e.g. `"cluster"`) to an
//! ordered sequence of named sections. On the wire a section is a flat
//! string map whose reserved `name` key names the section:
//!
//! ```json
//! { "cluster": [ { "name": "smp", "min": "2" } ] }
//! ```
//!
//! A configuration supplied at cluster creation is a list of layers, each
//! either inline content or a reference (`{"_id": "..."}`) to a stored
//! config document. Layers are ordered lowest priority first: **the last
//! layer wins**. See [`merge`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Field name to value, within one section.
pub type SectionFields = BTreeMap<String, String>;

/// One named section of configuration.
///
/// Serializes as a flat map carrying the section name under the reserved
/// `name` key alongside its fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SectionFields", into = "SectionFields")]
pub struct ConfigSection {
    pub name: String,
    pub fields: SectionFields,
}

impl ConfigSection {
    pub fn new(name: impl Into<String>, fields: SectionFields) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }
}

impl TryFrom<SectionFields> for ConfigSection {
    type Error = String;

    fn try_from(mut map: SectionFields) -> Result<Self, Self::Error> {
        let name = map
            .remove("name")
            .ok_or_else(|| "configuration section is missing a 'name' field".to_string())?;
        Ok(Self { name, fields: map })
    }
}

impl From<ConfigSection> for SectionFields {
    fn from(section: ConfigSection) -> Self {
        let mut map = section.fields;
        map.insert("name".to_string(), section.name);
        map
    }
}

/// Section type to ordered sections. Section order within a type is
/// insertion order and is preserved by the merge.
pub type ConfigContent = BTreeMap<String, Vec<ConfigSection>>;

/// One layer of a cluster's configuration list.
///
/// References use the original wire key `_id`; anything else is treated
/// as inline content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigLayer {
    Reference {
        #[serde(rename = "_id")]
        id: String,
    },
    Inline(ConfigContent),
}

/// Merge resolved configuration layers, lowest priority first.
///
/// The fold overlays each layer onto the accumulated result, so the last
/// layer is authoritative. For every section type, sections are matched
/// by name (first match, linear scan): a matching higher-priority section
/// overwrites same-named fields of the lower-priority one, comparing
/// field names case-insensitively; unmatched sections are appended; and
/// section types present in only one layer pass through unchanged.
///
/// The overlay is associative with respect to layer order:
/// `merge([A, B, C]) == merge([merge([A, B]), C])`.
pub fn merge(layers: impl IntoIterator<Item = ConfigContent>) -> ConfigContent {
    let mut merged = ConfigContent::new();
    for layer in layers {
        overlay(&mut merged, layer);
    }
    merged
}

/// Overlay a higher-priority layer onto `base` in place.
fn overlay(base: &mut ConfigContent, layer: ConfigContent) {
    for (section_type, sections) in layer {
        match base.entry(section_type) {
            std::collections::btree_map::Entry::Vacant(entry) => {
                entry.insert(sections);
            }
            std::collections::btree_map::Entry::Occupied(mut entry) => {
                for section in sections {
                    match find_section(entry.get_mut(), &section.name) {
                        Some(existing) => merge_fields(&mut existing.fields, &section.fields),
                        None => entry.get_mut().push(section),
                    }
                }
            }
        }
    }
}

/// First section with the given name, if any.
fn find_section<'a>(
    sections: &'a mut [ConfigSection],
    name: &str,
) -> Option<&'a mut ConfigSection> {
    sections.iter_mut().find(|s| s.name == name)
}

/// Overwrite `lower` with every field of `higher`, matching field names
/// case-insensitively. The higher-priority spelling of the key survives.
fn merge_fields(lower: &mut SectionFields, higher: &SectionFields) {
    for (key, value) in higher {
        lower.retain(|existing, _| !existing.eq_ignore_ascii_case(key));
        lower.insert(key.clone(), value.clone());
    }
}
