//! Translation between records, filters and BSON documents.

use bson::{doc, oid::ObjectId, Bson, Document};
use serde_json::{Map, Number, Value};
use temps_storage::{
    pattern, Filter, FilterValue, Record, RepositoryDefinition, Result, StorageError,
};
use uuid::Uuid;

/// Caller-facing identifier field
pub const ID_FIELD: &str = "id";
/// Engine identifier field
pub const OBJECT_ID_FIELD: &str = "_id";

/// Engine field name of a caller field
pub fn field_name(field: &str) -> &str {
    if field == ID_FIELD {
        OBJECT_ID_FIELD
    } else {
        field
    }
}

/// Convert a caller id into the stored `_id` value
pub fn id_to_bson(value: &Value, custom_id: bool) -> Result<Bson> {
    if custom_id {
        return json_to_bson(value);
    }

    match value {
        Value::String(hex) => ObjectId::parse_str(hex).map(Bson::ObjectId).map_err(|e| {
            StorageError::invalid_input(format!("invalid object id '{}': {}", hex, e))
        }),
        other => Err(StorageError::invalid_input(format!(
            "object id must be a hex string, got {}",
            other
        ))),
    }
}

pub fn json_to_bson(value: &Value) -> Result<Bson> {
    bson::to_bson(value)
        .map_err(|e| StorageError::invalid_input(format!("value cannot be stored: {}", e)))
}

/// Convert a stored value into its caller-facing JSON form.
///
/// Object ids become hex strings and dates RFC 3339 strings; types without a
/// plain JSON counterpart use relaxed extended JSON.
pub fn bson_to_json(value: Bson) -> Value {
    match value {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(b) => Value::Bool(b),
        Bson::Int32(i) => Value::from(i),
        Bson::Int64(i) => Value::from(i),
        Bson::Double(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        Bson::String(s) => Value::String(s),
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::DateTime(dt) => match dt.try_to_rfc3339_string() {
            Ok(s) => Value::String(s),
            Err(_) => Value::from(dt.timestamp_millis()),
        },
        Bson::Array(items) => Value::Array(items.into_iter().map(bson_to_json).collect()),
        Bson::Document(document) => Value::Object(document_to_map(document)),
        other => other.into_relaxed_extjson(),
    }
}

fn document_to_map(document: Document) -> Map<String, Value> {
    document
        .into_iter()
        .map(|(key, value)| (key, bson_to_json(value)))
        .collect()
}

/// Convert a stored document into a record, exposing `_id` as `id`
pub fn document_to_record(document: Document) -> Record {
    document
        .into_iter()
        .map(|(key, value)| {
            let key = if key == OBJECT_ID_FIELD {
                ID_FIELD.to_string()
            } else {
                key
            };
            (key, bson_to_json(value))
        })
        .collect()
}

/// Build the document inserted on create.
///
/// Assigns `_id` from the record's `id` (generated when absent) and stamps
/// the TTL attribute with the absolute expiry time.
pub fn record_to_new_document(
    record: &Record,
    definition: &RepositoryDefinition,
) -> Result<Document> {
    let mut document = Document::new();

    let id = match record.get(ID_FIELD) {
        Some(value) if !value.is_null() => id_to_bson(value, definition.custom_id())?,
        _ if definition.custom_id() => Bson::String(Uuid::new_v4().to_string()),
        _ => Bson::ObjectId(ObjectId::new()),
    };
    document.insert(OBJECT_ID_FIELD, id);

    for (key, value) in record {
        if key == ID_FIELD || key == OBJECT_ID_FIELD {
            continue;
        }
        document.insert(key.clone(), json_to_bson(value)?);
    }

    if let Some((attribute, seconds)) = definition.ttl() {
        let expires_at = chrono::Utc::now() + chrono::Duration::seconds(seconds);
        document.insert(
            attribute,
            Bson::DateTime(bson::DateTime::from_millis(expires_at.timestamp_millis())),
        );
    }

    Ok(document)
}

/// Fields of a partial update.
///
/// Identifier fields are never overwritten, and the TTL attribute keeps the
/// date stamped on create (reads return it as text).
pub fn record_to_update(record: &Record, definition: &RepositoryDefinition) -> Result<Document> {
    let ttl_attribute = definition.ttl().map(|(attribute, _)| attribute);

    let mut set = Document::new();
    for (key, value) in record {
        if key == ID_FIELD || key == OBJECT_ID_FIELD || Some(key.as_str()) == ttl_attribute {
            continue;
        }
        set.insert(key.clone(), json_to_bson(value)?);
    }
    Ok(set)
}

/// Compile a filter into a query document
pub fn to_mongo_filter(filter: &Filter, custom_id: bool) -> Result<Document> {
    let mut query = Document::new();

    for (field, value) in filter {
        let name = field_name(field);
        let condition = match value {
            FilterValue::Equals(v) if name == OBJECT_ID_FIELD => id_to_bson(v, custom_id)?,
            FilterValue::Equals(v) => json_to_bson(v)?,
            FilterValue::Pattern(_) if name == OBJECT_ID_FIELD && !custom_id => {
                return Err(StorageError::invalid_input(
                    "object ids do not support pattern matching",
                ))
            }
            FilterValue::Pattern(p) => Bson::Document(doc! { "$regex": pattern::to_regex(p) }),
        };
        query.insert(name, condition);
    }

    Ok(query)
}

/// Restrict a query to records whose TTL attribute lies in the future
pub fn with_ttl_condition(query: Document, definition: &RepositoryDefinition) -> Document {
    let Some((attribute, _)) = definition.ttl() else {
        return query;
    };

    let live = doc! { "$gt": bson::DateTime::now() };
    if query.contains_key(attribute) {
        doc! { "$and": [query, { attribute: live }] }
    } else {
        let mut query = query;
        query.insert(attribute, live);
        query
    }
}

/// Index key document; a leading `-` on a field selects descending order
pub fn index_keys(fields: &[String]) -> Result<Document> {
    if fields.is_empty() {
        return Err(StorageError::invalid_input("index must name at least one field"));
    }

    let mut keys = Document::new();
    for field in fields {
        let (name, order) = match field.strip_prefix('-') {
            Some(name) => (name, -1),
            None => (field.as_str(), 1),
        };
        if name.is_empty() {
            return Err(StorageError::invalid_input("index field name is empty"));
        }
        keys.insert(field_name(name), order);
    }
    Ok(keys)
}
