use super::models::EntityKind;
use super::trait_def::{FieldDelta, StoreError, StoreResult};
use serde_json::Value;

/// Applies `deltas` in order to `document`.
///
/// The `id` field is immutable. `AddToSet` and `Pull` create or expect array
/// fields; a missing array counts as empty.
pub fn apply_deltas(kind: EntityKind, document: &mut Value, deltas: &[FieldDelta]) -> StoreResult<()> {
    let object = document
        .as_object_mut()
        .ok_or_else(|| StoreError::InvalidDocument {
            kind,
            reason: "document is not an object".to_string(),
        })?;

    for delta in deltas {
        let field = delta.field();
        validate_field_name(field)?;
        if field == "id" {
            return Err(StoreError::InvalidDocument {
                kind,
                reason: "id is immutable".to_string(),
            });
        }

        match delta {
            FieldDelta::Set(_, value) => {
                object.insert(field.to_string(), value.clone());
            }
            FieldDelta::AddToSet(_, value) => {
                let array = array_field(kind, object, field)?;
                if !array.contains(value) {
                    array.push(value.clone());
                }
            }
            FieldDelta::Pull(_, value) => {
                let array = array_field(kind, object, field)?;
                array.retain(|item| item != value);
            }
        }
    }
    Ok(())
}

fn array_field<'a>(
    kind: EntityKind,
    object: &'a mut serde_json::Map<String, Value>,
    field: &str,
) -> StoreResult<&'a mut Vec<Value>> {
    let slot = object
        .entry(field.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if slot.is_null() {
        *slot = Value::Array(Vec::new());
    }
    slot.as_array_mut()
        .ok_or_else(|| StoreError::InvalidDocument {
            kind,
            reason: format!("{} is not an array", field),
        })
}

/// Field names end up inside SQL JSON paths, so only plain identifiers pass.
pub fn validate_field_name(field: &str) -> StoreResult<()> {
    let valid = !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !field.starts_with(|c: char| c.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidField(field.to_string()))
    }
}
