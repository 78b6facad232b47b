// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Hierarchical scene descriptions.
//!
//! A scene is a JSON document: elements are objects, attributes are scalar
//! (or small array) fields, child elements are object- or array-valued
//! fields. [`SceneNode`] wraps a borrowed element and provides the typed
//! attribute accessors every `init` boundary consumes:
//!
//! - missing required attribute → [`SceneError::MissingAttribute`]
//! - wrong attribute type       → [`SceneError::Parse`]
//! - unrecognised element       → [`SceneError::UnknownElement`]

use std::path::Path;

use glam::DVec3;
use serde_json::Value;

use crate::error::SceneError;

/// An owned, parsed scene document.
#[derive(Debug, Clone)]
pub struct SceneDoc {
    root: Value,
}

impl std::str::FromStr for SceneDoc {
    type Err = SceneError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let root: Value = serde_json::from_str(text).map_err(|e| SceneError::Parse {
            element: "<document>".into(),
            detail: e.to_string(),
        })?;
        if !root.is_object() {
            return Err(SceneError::Parse {
                element: "<document>".into(),
                detail: "top-level value must be an object".into(),
            });
        }
        Ok(Self { root })
    }
}

impl SceneDoc {
    /// Reads and parses a scene document from a file.
    pub fn from_path(path: &Path) -> Result<Self, SceneError> {
        let text = std::fs::read_to_string(path)?;
        text.parse()
    }

    /// Borrows the root element.
    #[must_use]
    pub fn root(&self) -> SceneNode<'_> {
        SceneNode {
            name: "<root>",
            value: &self.root,
        }
    }
}

/// A borrowed view of one element in a scene document.
#[derive(Debug, Clone, Copy)]
pub struct SceneNode<'a> {
    name: &'a str,
    value: &'a Value,
}

impl<'a> SceneNode<'a> {
    /// Builds a node view over a raw value; used by factories that receive
    /// inline parameter objects.
    #[must_use]
    pub fn from_value(name: &'a str, value: &'a Value) -> Self {
        Self { name, value }
    }

    /// Element name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name
    }

    /// Reads a required attribute, converting it to `T`.
    pub fn attribute<T: FromSceneValue>(&self, attribute: &str) -> Result<T, SceneError> {
        match self.value.get(attribute) {
            None => Err(SceneError::MissingAttribute {
                element: self.name.to_owned(),
                attribute: attribute.to_owned(),
            }),
            Some(v) => T::from_scene_value(v).ok_or_else(|| SceneError::Parse {
                element: self.name.to_owned(),
                detail: format!("attribute `{attribute}` is not a {}", T::EXPECTED),
            }),
        }
    }

    /// Reads an optional attribute, falling back to `default` when absent.
    ///
    /// A present attribute with the wrong type is still a parse error; only
    /// absence selects the default.
    pub fn attribute_or<T: FromSceneValue>(
        &self,
        attribute: &str,
        default: T,
    ) -> Result<T, SceneError> {
        match self.value.get(attribute) {
            None => Ok(default),
            Some(v) => T::from_scene_value(v).ok_or_else(|| SceneError::Parse {
                element: self.name.to_owned(),
                detail: format!("attribute `{attribute}` is not a {}", T::EXPECTED),
            }),
        }
    }

    /// Returns the single child element with the given name, if present.
    #[must_use]
    pub fn child(&self, name: &'a str) -> Option<SceneNode<'a>> {
        match self.value.get(name) {
            Some(v) if v.is_object() => Some(SceneNode { name, value: v }),
            _ => None,
        }
    }

    /// Returns the child element with the given name, or a parse error
    /// naming the absent child.
    pub fn require_child(&self, name: &'a str) -> Result<SceneNode<'a>, SceneError> {
        self.child(name).ok_or_else(|| SceneError::Parse {
            element: self.name.to_owned(),
            detail: format!("missing child element `{name}`"),
        })
    }

    /// Returns all children under `name`: an array field yields its object
    /// elements in order, an object field yields itself, anything else
    /// yields nothing.
    #[must_use]
    pub fn children(&self, name: &'a str) -> Vec<SceneNode<'a>> {
        match self.value.get(name) {
            Some(Value::Array(items)) => items
                .iter()
                .filter(|v| v.is_object())
                .map(|v| SceneNode { name, value: v })
                .collect(),
            Some(v) if v.is_object() => vec![SceneNode { name, value: v }],
            _ => Vec::new(),
        }
    }

    /// Verifies that every field of this element is in `known`, reporting
    /// the first stranger as [`SceneError::UnknownElement`].
    pub fn check_known(&self, known: &[&str]) -> Result<(), SceneError> {
        if let Some(map) = self.value.as_object() {
            for field in map.keys() {
                if !known.contains(&field.as_str()) {
                    return Err(SceneError::UnknownElement {
                        element: format!("{}.{field}", self.name),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Conversion from a raw scene value into a typed attribute.
pub trait FromSceneValue: Sized {
    /// Human-readable type name used in parse errors.
    const EXPECTED: &'static str;
    /// Attempts the conversion; `None` means a type mismatch.
    fn from_scene_value(value: &Value) -> Option<Self>;
}

impl FromSceneValue for f64 {
    const EXPECTED: &'static str = "number";
    fn from_scene_value(value: &Value) -> Option<Self> {
        value.as_f64()
    }
}

impl FromSceneValue for u64 {
    const EXPECTED: &'static str = "non-negative integer";
    fn from_scene_value(value: &Value) -> Option<Self> {
        value.as_u64()
    }
}

impl FromSceneValue for u32 {
    const EXPECTED: &'static str = "non-negative integer";
    fn from_scene_value(value: &Value) -> Option<Self> {
        value.as_u64().and_then(|v| Self::try_from(v).ok())
    }
}

impl FromSceneValue for usize {
    const EXPECTED: &'static str = "non-negative integer";
    fn from_scene_value(value: &Value) -> Option<Self> {
        value.as_u64().and_then(|v| Self::try_from(v).ok())
    }
}

impl FromSceneValue for bool {
    const EXPECTED: &'static str = "boolean";
    fn from_scene_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl FromSceneValue for String {
    const EXPECTED: &'static str = "string";
    fn from_scene_value(value: &Value) -> Option<Self> {
        value.as_str().map(ToOwned::to_owned)
    }
}

impl FromSceneValue for DVec3 {
    const EXPECTED: &'static str = "[x, y, z] number array";
    fn from_scene_value(value: &Value) -> Option<Self> {
        let items = value.as_array()?;
        if items.len() != 3 {
            return None;
        }
        let x = items[0].as_f64()?;
        let y = items[1].as_f64()?;
        let z = items[2].as_f64()?;
        Some(Self::new(x, y, z))
    }
}

impl FromSceneValue for [u8; 3] {
    const EXPECTED: &'static str = "[r, g, b] byte array";
    fn from_scene_value(value: &Value) -> Option<Self> {
        let items = value.as_array()?;
        if items.len() != 3 {
            return None;
        }
        let mut out = [0u8; 3];
        for (slot, item) in out.iter_mut().zip(items) {
            *slot = u8::try_from(item.as_u64()?).ok()?;
        }
        Some(out)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::SceneError;

    fn doc() -> SceneDoc {
        parse(
            r#"{
                "arena": { "size": [4.0, 4.0, 2.0], "seed": 42 },
                "robots": [
                    { "id": "a", "position": [0.0, 0.0, 0.0] },
                    { "id": "b", "position": [1.0, 0.0, 0.0] }
                ]
            }"#,
        )
        .expect("valid document")
    }

    fn parse(text: &str) -> Result<SceneDoc, SceneError> {
        text.parse()
    }

    #[test]
    fn typed_attributes_round_trip() {
        let doc = doc();
        let arena = doc.root().require_child("arena").expect("arena");
        let size: DVec3 = arena.attribute("size").expect("size");
        assert_eq!(size, DVec3::new(4.0, 4.0, 2.0));
        let seed: u64 = arena.attribute("seed").expect("seed");
        assert_eq!(seed, 42);
    }

    #[test]
    fn missing_attribute_is_its_own_kind() {
        let doc = doc();
        let arena = doc.root().require_child("arena").expect("arena");
        let err = arena.attribute::<f64>("gravity").unwrap_err();
        assert!(matches!(
            err,
            SceneError::MissingAttribute { ref attribute, .. } if attribute == "gravity"
        ));
    }

    #[test]
    fn type_mismatch_is_a_parse_error() {
        let doc = doc();
        let arena = doc.root().require_child("arena").expect("arena");
        let err = arena.attribute::<String>("seed").unwrap_err();
        assert!(matches!(err, SceneError::Parse { .. }));
    }

    #[test]
    fn defaults_apply_only_when_absent() {
        let doc = doc();
        let arena = doc.root().require_child("arena").expect("arena");
        assert_eq!(arena.attribute_or("seed", 7u64).expect("seed"), 42);
        assert_eq!(arena.attribute_or("missing", 7u64).expect("default"), 7);
        assert!(arena.attribute_or::<String>("seed", String::new()).is_err());
    }

    #[test]
    fn children_preserve_document_order() {
        let doc = doc();
        let ids: Vec<String> = doc
            .root()
            .children("robots")
            .iter()
            .map(|r| r.attribute::<String>("id").expect("id"))
            .collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn unknown_elements_are_rejected() {
        let doc = parse(r#"{ "arena": {}, "widgets": {} }"#).expect("parse");
        let err = doc.root().check_known(&["arena"]).unwrap_err();
        assert!(matches!(
            err,
            SceneError::UnknownElement { ref element } if element.contains("widgets")
        ));
    }

    #[test]
    fn malformed_documents_fail_to_parse() {
        assert!(matches!(parse("not json"), Err(SceneError::Parse { .. })));
        assert!(matches!(parse("[1, 2, 3]"), Err(SceneError::Parse { .. })));
    }
}
