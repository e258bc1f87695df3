//! Structured record model
//!
//! Each [`SyncItem`](crate::types::SyncItem) carries its entity's field-level
//! state as a serialized hierarchical document. The root node is named after
//! the document's type: either an application entity (e.g.
//! `org.openmrs.Encounter`) or a collection wrapper (e.g.
//! `org.hibernate.collection.PersistentSet`). Its direct children are the
//! fields or members, and a child whose `type` attribute names an application
//! entity is a cross-reference to another entity.
//!
//! ## Serialized form
//!
//! ```json
//! {
//!   "name": "org.openmrs.Encounter",
//!   "children": [
//!     { "name": "patient", "attributes": { "type": "org.openmrs.Patient" }, "data": "u1" },
//!     { "name": "encounterDatetime", "attributes": { "type": "timestamp" }, "data": "2024-01-01" }
//!   ]
//! }
//! ```
//!
//! Cross-references are extracted once into [`EntityReference`] values so
//! dependency checks never look at raw type-name strings again.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{SyncError, SyncResult};

/// Attribute naming a child node's entity type
pub const TYPE_ATTRIBUTE: &str = "type";

/// Attribute carrying a collection member's identity
pub const UUID_ATTRIBUTE: &str = "uuid";

/// How a type name is classified by an [`EntityNamespace`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    /// An application entity with a stable identity
    Entity,
    /// A generic collection wrapper around entities
    Collection,
    /// Anything else (primitives, foreign types)
    Other,
}

/// Type-name prefixes that separate application entities from collection
/// wrappers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityNamespace {
    pub entity_prefix: String,
    pub collection_prefix: String,
}

impl Default for EntityNamespace {
    fn default() -> Self {
        Self {
            entity_prefix: "org.openmrs.".to_string(),
            collection_prefix: "org.hibernate.collection.".to_string(),
        }
    }
}

impl EntityNamespace {
    pub fn new(entity_prefix: impl Into<String>, collection_prefix: impl Into<String>) -> Self {
        Self {
            entity_prefix: entity_prefix.into(),
            collection_prefix: collection_prefix.into(),
        }
    }

    pub fn kind(&self, type_name: &str) -> TypeKind {
        if type_name.starts_with(self.collection_prefix.as_str()) {
            TypeKind::Collection
        } else if type_name.starts_with(self.entity_prefix.as_str()) {
            TypeKind::Entity
        } else {
            TypeKind::Other
        }
    }

    pub fn is_entity(&self, type_name: &str) -> bool {
        self.kind(type_name) == TypeKind::Entity
    }

    pub fn is_collection(&self, type_name: &str) -> bool {
        self.kind(type_name) == TypeKind::Collection
    }
}

/// A node of a record document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentNode {
    pub name: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub children: Vec<DocumentNode>,
}

impl DocumentNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeMap::new(),
            data: None,
            children: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn with_child(mut self, child: DocumentNode) -> Self {
        self.children.push(child);
        self
    }

    /// Get a non-blank attribute value
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }
}

/// A cross-reference from a document to another entity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityReference {
    /// Member of a collection-wrapper document, identified by its `uuid`
    /// attribute
    CollectionMember { entity_type: String, identity: String },
    /// Field of an entity document, identified by the node's data
    Field { entity_type: String, identity: String },
}

impl EntityReference {
    pub fn entity_type(&self) -> &str {
        match self {
            EntityReference::CollectionMember { entity_type, .. } => entity_type,
            EntityReference::Field { entity_type, .. } => entity_type,
        }
    }

    pub fn identity(&self) -> &str {
        match self {
            EntityReference::CollectionMember { identity, .. } => identity,
            EntityReference::Field { identity, .. } => identity,
        }
    }

    pub fn is_collection_member(&self) -> bool {
        matches!(self, EntityReference::CollectionMember { .. })
    }
}

/// Parsed content of a sync item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordDocument {
    pub root: DocumentNode,
}

impl RecordDocument {
    pub fn new(root: DocumentNode) -> Self {
        Self { root }
    }

    /// Parse serialized item content.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::InvalidDocument` for empty input, malformed input,
    /// or a root node without a name.
    pub fn parse(content: &str) -> SyncResult<Self> {
        if content.trim().is_empty() {
            return Err(SyncError::InvalidDocument("empty content".to_string()));
        }

        let document: RecordDocument = serde_json::from_str(content)
            .map_err(|e| SyncError::InvalidDocument(e.to_string()))?;

        if document.name().trim().is_empty() {
            return Err(SyncError::InvalidDocument(
                "root node has no name".to_string(),
            ));
        }

        Ok(document)
    }

    pub fn to_json(&self) -> SyncResult<String> {
        serde_json::to_string(self).map_err(|e| SyncError::Serialization(e.to_string()))
    }

    /// Type name of the document
    pub fn name(&self) -> &str {
        &self.root.name
    }

    /// Direct children of the root node
    pub fn items(&self) -> &[DocumentNode] {
        &self.root.children
    }

    /// Cross-references to application entities, in document order.
    ///
    /// In a collection-wrapper document a member's identity is its `uuid`
    /// attribute; in an entity document a field's identity is its data.
    /// References without an identity are dropped, and documents of any other
    /// root type yield nothing.
    pub fn entity_references(&self, namespace: &EntityNamespace) -> Vec<EntityReference> {
        let root_kind = namespace.kind(self.name());
        if root_kind == TypeKind::Other {
            return Vec::new();
        }

        self.items()
            .iter()
            .filter_map(|node| {
                let entity_type = node.attribute(TYPE_ATTRIBUTE)?;
                if !namespace.is_entity(entity_type) {
                    return None;
                }
                let entity_type = entity_type.to_string();
                match root_kind {
                    TypeKind::Collection => node.attribute(UUID_ATTRIBUTE).map(|identity| {
                        EntityReference::CollectionMember {
                            entity_type,
                            identity: identity.to_string(),
                        }
                    }),
                    _ => node.data.as_ref().map(|identity| EntityReference::Field {
                        entity_type,
                        identity: identity.clone(),
                    }),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encounter_doc() -> RecordDocument {
        RecordDocument::new(
            DocumentNode::new("org.openmrs.Encounter")
                .with_child(
                    DocumentNode::new("patient")
                        .with_attribute("type", "org.openmrs.Patient")
                        .with_data("u1"),
                )
                .with_child(
                    DocumentNode::new("encounterDatetime")
                        .with_attribute("type", "timestamp")
                        .with_data("2024-01-01T00:00:00"),
                )
                .with_child(
                    DocumentNode::new("location")
                        .with_attribute("type", "org.openmrs.Location")
                        .with_data("loc-9"),
                ),
        )
    }

    #[test]
    fn test_namespace_kinds() {
        let ns = EntityNamespace::default();
        assert_eq!(ns.kind("org.openmrs.Patient"), TypeKind::Entity);
        assert_eq!(
            ns.kind("org.hibernate.collection.PersistentSet"),
            TypeKind::Collection
        );
        assert_eq!(ns.kind("java.lang.String"), TypeKind::Other);
    }

    #[test]
    fn test_parse_roundtrip() {
        let doc = encounter_doc();
        let json = doc.to_json().unwrap();
        assert_eq!(RecordDocument::parse(&json).unwrap(), doc);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(matches!(
            RecordDocument::parse("<not json"),
            Err(SyncError::InvalidDocument(_))
        ));
        assert!(matches!(
            RecordDocument::parse("   "),
            Err(SyncError::InvalidDocument(_))
        ));
        assert!(matches!(
            RecordDocument::parse(r#"{"name": ""}"#),
            Err(SyncError::InvalidDocument(_))
        ));
    }

    #[test]
    fn test_parse_minimal_document() {
        let doc = RecordDocument::parse(r#"{"name": "org.openmrs.Person"}"#).unwrap();
        assert_eq!(doc.name(), "org.openmrs.Person");
        assert!(doc.items().is_empty());
    }

    #[test]
    fn test_entity_document_references_use_data() {
        let refs = encounter_doc().entity_references(&EntityNamespace::default());
        assert_eq!(
            refs,
            vec![
                EntityReference::Field {
                    entity_type: "org.openmrs.Patient".to_string(),
                    identity: "u1".to_string(),
                },
                EntityReference::Field {
                    entity_type: "org.openmrs.Location".to_string(),
                    identity: "loc-9".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_collection_document_references_use_uuid_attribute() {
        let doc = RecordDocument::new(
            DocumentNode::new("org.hibernate.collection.PersistentSet")
                .with_child(
                    DocumentNode::new("entry")
                        .with_attribute("type", "org.openmrs.Obs")
                        .with_attribute("uuid", "obs-1")
                        .with_data("ignored"),
                )
                .with_child(
                    DocumentNode::new("entry")
                        .with_attribute("type", "org.openmrs.Obs"),
                ),
        );

        let refs = doc.entity_references(&EntityNamespace::default());
        assert_eq!(refs.len(), 1);
        assert!(refs[0].is_collection_member());
        assert_eq!(refs[0].entity_type(), "org.openmrs.Obs");
        assert_eq!(refs[0].identity(), "obs-1");
    }

    #[test]
    fn test_foreign_root_yields_no_references() {
        let doc = RecordDocument::new(
            DocumentNode::new("com.example.Widget").with_child(
                DocumentNode::new("owner")
                    .with_attribute("type", "org.openmrs.Person")
                    .with_data("p1"),
            ),
        );
        assert!(doc.entity_references(&EntityNamespace::default()).is_empty());
    }

    #[test]
    fn test_blank_type_attribute_is_ignored() {
        let doc = RecordDocument::new(
            DocumentNode::new("org.openmrs.Obs").with_child(
                DocumentNode::new("person")
                    .with_attribute("type", "  ")
                    .with_data("p1"),
            ),
        );
        assert!(doc.entity_references(&EntityNamespace::default()).is_empty());
    }

    #[test]
    fn test_custom_namespace() {
        let ns = EntityNamespace::new("com.acme.", "com.acme.collections.");
        assert_eq!(ns.kind("com.acme.collections.Bag"), TypeKind::Collection);
        assert_eq!(ns.kind("com.acme.Order"), TypeKind::Entity);
    }
}
