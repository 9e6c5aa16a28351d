//! The [`Entity`] trait and the mapping between typed values and stored
//! documents.
//!
//! An entity is any `serde`-serializable type registered with a type name.
//! Encoding produces a JSON field map plus the blob writes split out of it;
//! decoding reverses the process, resolving blob references back into bytes.
//! Documents that fail to decode are skipped with a warning rather than
//! failing the whole read, so a collection with a few stale documents stays
//! readable.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::engine::StorageEngine;
use crate::error::{StoreError, StoreResult};

/// Hidden field carrying the entity type name on every stored document.
pub const TYPE_FIELD: &str = "@type";

/// Key of the single-entry object that replaces a blob field's bytes in the
/// stored document, pointing at the externally stored blob.
pub const BLOB_REF_FIELD: &str = "@blob";

/// A type that can be stored as documents.
///
/// Usually derived:
///
/// ```ignore
/// #[derive(Serialize, Deserialize, Clone, Entity)]
/// struct User {
///     #[entity(primary_key)]
///     id: String,
///     name: String,
///     #[entity(blob)]
///     avatar: Vec<u8>,
/// }
/// ```
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Stable name identifying this type in storage. Renaming it orphans
    /// previously stored documents.
    const TYPE_NAME: &'static str;

    /// Names of fields whose bytes are stored as blobs outside the document.
    /// Each must serialize to a byte array (or null, for optional blobs).
    const BLOB_FIELDS: &'static [&'static str] = &[];

    /// The value identifying this instance, if the type is primary-keyed.
    ///
    /// Keyed types get deterministic document identifiers, enabling upserts
    /// and deletion by identity. Non-keyed types always insert fresh
    /// documents under random identifiers.
    fn primary_key(&self) -> Option<String> {
        None
    }
}

/// A blob split out of an encoded document, pending storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobWrite {
    /// Blob identifier, `<document id>/<field name>`.
    pub id: String,
    /// Raw bytes.
    pub bytes: Vec<u8>,
}

/// The deterministic document identifier for a primary-keyed value, or
/// `None` when the type declares no primary key.
pub fn document_id<T: Entity>(value: &T) -> Option<String> {
    value.primary_key().map(|key| format!("{key}-{}", T::TYPE_NAME))
}

/// Encodes a value into a stored field map plus its extracted blob writes.
///
/// The map carries the type discriminator; declared blob fields are replaced
/// with references and returned separately as [`BlobWrite`]s.
pub fn encode<T: Entity>(
    value: &T,
    doc_id: &str,
) -> StoreResult<(Map<String, Value>, Vec<BlobWrite>)> {
    let encoded = serde_json::to_value(value)?;
    let Value::Object(mut fields) = encoded else {
        return Err(StoreError::Encode(format!(
            "{} did not serialize to a field map",
            T::TYPE_NAME
        )));
    };
    let mut blobs = Vec::new();
    for name in T::BLOB_FIELDS {
        let Some(raw) = fields.get(*name) else { continue };
        if raw.is_null() {
            continue;
        }
        let bytes = value_as_bytes(raw).ok_or_else(|| {
            StoreError::Encode(format!(
                "blob field {name} of {} is not a byte sequence",
                T::TYPE_NAME
            ))
        })?;
        let blob_id = format!("{doc_id}/{name}");
        let mut reference = Map::new();
        reference.insert(BLOB_REF_FIELD.to_string(), Value::String(blob_id.clone()));
        fields.insert((*name).to_string(), Value::Object(reference));
        blobs.push(BlobWrite { id: blob_id, bytes });
    }
    fields.insert(TYPE_FIELD.to_string(), Value::String(T::TYPE_NAME.to_string()));
    Ok((fields, blobs))
}

/// Decodes a stored field map back into a value, resolving blob references
/// through the engine.
///
/// Returns `None` for documents that no longer decode into `T`; the failure
/// is logged and the document skipped.
pub fn decode<T, E>(mut fields: Map<String, Value>, engine: &E) -> Option<T>
where
    T: Entity,
    E: StorageEngine + ?Sized,
{
    fields.remove(TYPE_FIELD);
    for name in T::BLOB_FIELDS {
        let Some(reference) = fields.get(*name).and_then(blob_ref) else { continue };
        match engine.get_blob(&reference) {
            Ok(Some(bytes)) => {
                let array = bytes.into_iter().map(Value::from).collect();
                fields.insert((*name).to_string(), Value::Array(array));
            }
            Ok(None) => {
                tracing::warn!(
                    entity = T::TYPE_NAME,
                    field = *name,
                    blob = %reference,
                    "skipping document whose blob is missing"
                );
                return None;
            }
            Err(err) => {
                tracing::warn!(
                    entity = T::TYPE_NAME,
                    field = *name,
                    blob = %reference,
                    %err,
                    "skipping document whose blob failed to load"
                );
                return None;
            }
        }
    }
    match serde_json::from_value(Value::Object(fields)) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(entity = T::TYPE_NAME, %err, "skipping document that failed to decode");
            None
        }
    }
}

fn blob_ref(value: &Value) -> Option<String> {
    value
        .as_object()?
        .get(BLOB_REF_FIELD)?
        .as_str()
        .map(String::from)
}

fn value_as_bytes(value: &Value) -> Option<Vec<u8>> {
    value
        .as_array()?
        .iter()
        .map(|item| item.as_u64().and_then(|n| u8::try_from(n).ok()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        title: String,
        stars: u32,
    }

    impl Entity for Note {
        const TYPE_NAME: &'static str = "Note";

        fn primary_key(&self) -> Option<String> {
            Some(self.title.clone())
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Attachment {
        name: String,
        #[serde(default)]
        payload: Vec<u8>,
    }

    impl Entity for Attachment {
        const TYPE_NAME: &'static str = "Attachment";
        const BLOB_FIELDS: &'static [&'static str] = &["payload"];
    }

    #[test]
    fn document_id_combines_key_and_type_name() {
        let note = Note { title: "groceries".into(), stars: 3 };
        assert_eq!(document_id(&note), Some("groceries-Note".into()));
    }

    #[test]
    fn encode_stamps_the_type_discriminator() {
        let note = Note { title: "groceries".into(), stars: 3 };
        let (fields, blobs) = encode(&note, "groceries-Note").unwrap();
        assert_eq!(fields.get(TYPE_FIELD), Some(&json!("Note")));
        assert_eq!(fields.get("stars"), Some(&json!(3)));
        assert!(blobs.is_empty());
    }

    #[test]
    fn encode_splits_blob_fields_into_references() {
        let attachment = Attachment { name: "photo".into(), payload: vec![1, 2, 3] };
        let (fields, blobs) = encode(&attachment, "doc-1").unwrap();
        assert_eq!(fields.get("payload"), Some(&json!({ BLOB_REF_FIELD: "doc-1/payload" })));
        assert_eq!(blobs, vec![BlobWrite { id: "doc-1/payload".into(), bytes: vec![1, 2, 3] }]);
    }
}
