// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The entity graph: a tree of composable entities held in an arena.
//!
//! Entities are nodes keyed by generation-stamped [`EntityKey`]s. A node
//! owns its components (children) through an ordered multimap from child
//! type-tag to key; everything else — bodies, devices, controllables —
//! references nodes by key. Pose propagation from bodies to device entities
//! is owned by the world (see [`crate::space`]), not by the arena itself.

pub mod anchor;
pub mod body;
pub mod controllable;

use slotmap::SlotMap;

use crate::error::{ComponentError, SimError};
use crate::ident::{BodyKey, EntityKey, LedKey, RabKey};

/// What a node *is*, beyond its place in the tree.
///
/// Built-in payloads form a closed set; user extensions hang off the device
/// registries instead of widening this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityPayload {
    /// A pure grouping node.
    Composite,
    /// An embodied entity; the key resolves in the body arena.
    Body(BodyKey),
    /// A controllable entity; the index resolves in the controllables list.
    Controllable(usize),
    /// A range-and-bearing transceiver device.
    RabDevice(RabKey),
    /// An LED device.
    LedDevice(LedKey),
}

/// One node of the entity tree.
#[derive(Debug)]
pub struct EntityNode {
    /// Stable, human-readable identifier.
    pub id: String,
    /// Type tag used for component lookups (`body`, `leds`, ...).
    pub type_tag: String,
    /// Disabled entities are skipped by every phase.
    pub enabled: bool,
    /// Parent node, if attached.
    pub parent: Option<EntityKey>,
    /// Ordered child multimap.
    pub components: ComponentMap,
    /// Role-specific payload.
    pub payload: EntityPayload,
}

impl EntityNode {
    /// Creates a detached, enabled node.
    #[must_use]
    pub fn new(id: impl Into<String>, type_tag: impl Into<String>, payload: EntityPayload) -> Self {
        Self {
            id: id.into(),
            type_tag: type_tag.into(),
            enabled: true,
            parent: None,
            components: ComponentMap::default(),
            payload,
        }
    }
}

/// Ordered multimap from child type-tag to entity key.
///
/// Insertion order is preserved; bracketed indices count matching children
/// in that order, 0-based.
#[derive(Debug, Default)]
pub struct ComponentMap {
    entries: Vec<(String, EntityKey)>,
}

impl ComponentMap {
    /// Appends a child under `tag`.
    pub fn add(&mut self, tag: impl Into<String>, child: EntityKey) {
        self.entries.push((tag.into(), child));
    }

    /// Resolves `query` (`tag` or `tag[i]`) to a child key.
    pub fn resolve(&self, query: &str) -> Result<EntityKey, ComponentError> {
        let (tag, index) = parse_component_query(query)?;
        let matches: Vec<EntityKey> = self
            .entries
            .iter()
            .filter(|(t, _)| t == tag)
            .map(|(_, k)| *k)
            .collect();
        let count = matches.len();
        if count == 0 {
            // The count check precedes the index check: `leds[0]` with no
            // `leds` children is NotFound, not IndexOutOfBounds.
            return Err(ComponentError::NotFound {
                query: query.to_owned(),
            });
        }
        match index {
            None if count == 1 => Ok(matches[0]),
            None => Err(ComponentError::AmbiguousLookup {
                tag: tag.to_owned(),
                count,
            }),
            Some(i) if i < count => Ok(matches[i]),
            Some(i) => Err(ComponentError::IndexOutOfBounds {
                tag: tag.to_owned(),
                index: i,
                count,
            }),
        }
    }

    /// Removes the child resolved by `query`, returning its key.
    pub fn remove(&mut self, query: &str) -> Result<EntityKey, ComponentError> {
        let key = self.resolve(query)?;
        self.entries.retain(|(_, k)| *k != key);
        Ok(key)
    }

    /// Returns `true` if `query` resolves to exactly one child.
    #[must_use]
    pub fn contains(&self, query: &str) -> bool {
        self.resolve(query).is_ok()
    }

    /// Iterates `(tag, key)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, EntityKey)> {
        self.entries.iter().map(|(t, k)| (t.as_str(), *k))
    }

    /// Number of children.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the map holds no children.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Splits a component query into its base tag and optional bracketed index.
///
/// Any query where `]` does not properly close a `[` — including `]` before
/// `[`, a missing `]`, an empty or non-numeric index, or trailing characters
/// after `]` — is a syntax error.
fn parse_component_query(query: &str) -> Result<(&str, Option<usize>), ComponentError> {
    let syntax = || ComponentError::SyntaxError {
        query: query.to_owned(),
    };
    let Some(open) = query.find('[') else {
        if query.contains(']') || query.is_empty() {
            return Err(syntax());
        }
        return Ok((query, None));
    };
    let close = query.rfind(']').ok_or_else(syntax)?;
    if close < open || close != query.len() - 1 || open == 0 {
        return Err(syntax());
    }
    let digits = &query[open + 1..close];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(syntax());
    }
    let index: usize = digits.parse().map_err(|_| syntax())?;
    Ok((&query[..open], Some(index)))
}

/// Arena of entity nodes.
#[derive(Debug, Default)]
pub struct EntityArena {
    nodes: SlotMap<EntityKey, EntityNode>,
}

impl EntityArena {
    /// Creates an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a detached node.
    pub fn insert(&mut self, node: EntityNode) -> EntityKey {
        self.nodes.insert(node)
    }

    /// Borrows a node, failing with a stale-handle error for removed keys.
    pub fn get(&self, key: EntityKey) -> Result<&EntityNode, SimError> {
        self.nodes.get(key).ok_or(SimError::InvalidHandle)
    }

    /// Mutably borrows a node.
    pub fn get_mut(&mut self, key: EntityKey) -> Result<&mut EntityNode, SimError> {
        self.nodes.get_mut(key).ok_or(SimError::InvalidHandle)
    }

    /// Attaches `child` under `parent`, keyed by the child's type tag.
    pub fn add_component(&mut self, parent: EntityKey, child: EntityKey) -> Result<(), SimError> {
        let tag = self.get(child)?.type_tag.clone();
        self.get_mut(child)?.parent = Some(parent);
        self.get_mut(parent)?.components.add(tag, child);
        Ok(())
    }

    /// Resolves a component query under `parent`.
    pub fn get_component(&self, parent: EntityKey, query: &str) -> Result<EntityKey, SimError> {
        Ok(self.get(parent)?.components.resolve(query)?)
    }

    /// Returns `true` if the query resolves under `parent`.
    #[must_use]
    pub fn has_component(&self, parent: EntityKey, query: &str) -> bool {
        self.nodes
            .get(parent)
            .is_some_and(|n| n.components.contains(query))
    }

    /// Detaches and destroys the component resolved by `query`, along with
    /// its entire subtree. Returns the removed child's key.
    pub fn remove_component(
        &mut self,
        parent: EntityKey,
        query: &str,
    ) -> Result<EntityKey, SimError> {
        let child = self.get_mut(parent)?.components.remove(query)?;
        self.remove_subtree(child);
        Ok(child)
    }

    /// Detaches `key` from its parent (if any) and destroys it together
    /// with its entire subtree.
    pub fn remove_entity(&mut self, key: EntityKey) {
        if let Some(parent) = self.nodes.get(key).and_then(|n| n.parent) {
            if let Some(parent_node) = self.nodes.get_mut(parent) {
                parent_node.components.entries.retain(|(_, k)| *k != key);
            }
        }
        self.remove_subtree(key);
    }

    fn remove_subtree(&mut self, key: EntityKey) {
        let children: Vec<EntityKey> = self
            .nodes
            .get(key)
            .map(|n| n.components.iter().map(|(_, k)| k).collect())
            .unwrap_or_default();
        for child in children {
            self.remove_subtree(child);
        }
        self.nodes.remove(key);
    }

    /// Iterates every live node.
    pub fn iter(&self) -> impl Iterator<Item = (EntityKey, &EntityNode)> {
        self.nodes.iter()
    }

    /// Number of live nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the arena holds no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn arena_with_leds(n: usize) -> (EntityArena, EntityKey) {
        let mut arena = EntityArena::new();
        let root = arena.insert(EntityNode::new("bot", "robot", EntityPayload::Composite));
        for i in 0..n {
            let led = arena.insert(EntityNode::new(
                format!("led{i}"),
                "leds",
                EntityPayload::Composite,
            ));
            arena.add_component(root, led).unwrap();
        }
        (arena, root)
    }

    #[test]
    fn bare_tag_resolves_unique_child() {
        let (arena, root) = arena_with_leds(1);
        let led = arena.get_component(root, "leds").unwrap();
        assert_eq!(arena.get(led).unwrap().id, "led0");
    }

    #[test]
    fn bare_tag_with_two_children_is_ambiguous() {
        let (arena, root) = arena_with_leds(2);
        let err = arena.get_component(root, "leds").unwrap_err();
        assert!(matches!(
            err,
            SimError::Component(ComponentError::AmbiguousLookup { count: 2, .. })
        ));
    }

    #[test]
    fn indexed_lookup_on_missing_tag_is_not_found() {
        let (arena, root) = arena_with_leds(0);
        let err = arena.get_component(root, "leds[0]").unwrap_err();
        assert!(matches!(
            err,
            SimError::Component(ComponentError::NotFound { .. })
        ));
    }

    #[test]
    fn indexed_lookup_past_count_is_out_of_bounds() {
        let (arena, root) = arena_with_leds(2);
        let err = arena.get_component(root, "leds[7]").unwrap_err();
        assert!(matches!(
            err,
            SimError::Component(ComponentError::IndexOutOfBounds {
                index: 7,
                count: 2,
                ..
            })
        ));
    }

    #[test]
    fn indices_follow_insertion_order() {
        let (arena, root) = arena_with_leds(3);
        for i in 0..3 {
            let led = arena.get_component(root, &format!("leds[{i}]")).unwrap();
            assert_eq!(arena.get(led).unwrap().id, format!("led{i}"));
        }
    }

    #[test]
    fn malformed_queries_are_syntax_errors() {
        let (arena, root) = arena_with_leds(2);
        for query in ["leds[", "leds[0", "leds[]", "leds[x]", "x]foo[y", "leds[0]z", "[0]"] {
            let err = arena.get_component(root, query).unwrap_err();
            assert!(
                matches!(err, SimError::Component(ComponentError::SyntaxError { .. })),
                "query {query:?} should be a syntax error, got {err:?}"
            );
        }
    }

    #[test]
    fn remove_component_destroys_the_subtree() {
        let mut arena = EntityArena::new();
        let root = arena.insert(EntityNode::new("bot", "robot", EntityPayload::Composite));
        let arm = arena.insert(EntityNode::new("arm", "arm", EntityPayload::Composite));
        let tip = arena.insert(EntityNode::new("tip", "tip", EntityPayload::Composite));
        arena.add_component(root, arm).unwrap();
        arena.add_component(arm, tip).unwrap();

        let removed = arena.remove_component(root, "arm").unwrap();
        assert_eq!(removed, arm);
        assert!(matches!(arena.get(arm), Err(SimError::InvalidHandle)));
        assert!(matches!(arena.get(tip), Err(SimError::InvalidHandle)));
        assert!(!arena.has_component(root, "arm"));
    }

    #[test]
    fn stale_keys_surface_invalid_handle() {
        let (mut arena, root) = arena_with_leds(1);
        let led = arena.get_component(root, "leds").unwrap();
        arena.remove_component(root, "leds").unwrap();
        assert!(matches!(arena.get(led), Err(SimError::InvalidHandle)));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod query_properties {
    use proptest::prelude::*;

    use super::parse_component_query;

    proptest! {
        #[test]
        fn well_formed_queries_round_trip(tag in "[a-z_]{1,12}", index in 0usize..64) {
            let query = format!("{tag}[{index}]");
            let (base, idx) = parse_component_query(&query).unwrap();
            prop_assert_eq!(base, tag);
            prop_assert_eq!(idx, Some(index));
        }

        #[test]
        fn bare_tags_parse_without_an_index(tag in "[a-z_]{1,12}") {
            let (base, idx) = parse_component_query(&tag).unwrap();
            prop_assert_eq!(base, tag.clone());
            prop_assert_eq!(idx, None);
        }

        #[test]
        fn arbitrary_input_never_panics(query in "\\PC{0,24}") {
            let _ = parse_component_query(&query);
        }
    }
}
