//! Deterministic physical table names.
//!
//! Every table name is `strata__document__<collection>` followed by the
//! parts that identify the table within its collection:
//!
//! | table type      | name                                                   |
//! |-----------------|--------------------------------------------------------|
//! | document        | `strata__document__page`                               |
//! | versions        | `strata__document__page__versions`                     |
//! | document-fields | `strata__document__page__fields`                       |
//! | brick           | `strata__document__page__hero`                         |
//! | repeater        | `strata__document__page__hero__slides__links`          |
//! | repeater        | `strata__document__page__fields__faq` (no brick)       |
//!
//! Key parts are validated so that the mapping is injective: a part never
//! contains the separator and brick keys cannot shadow the reserved
//! `versions` and `fields` segments.

use crate::error::{Result, SchemaError};
use crate::schema::{TableKey, TableType};

/// Prefix shared by every table the engine owns.
pub const TABLE_PREFIX: &str = "strata";

/// Separator between name parts.
pub const SEPARATOR: &str = "__";

const DOCUMENT: &str = "document";
const VERSIONS: &str = "versions";
const FIELDS: &str = "fields";

/// Validates a collection, brick, repeater or field key.
///
/// # Errors
///
/// Returns [`SchemaError::InvalidKey`] unless the key is non-empty, uses only
/// `[a-z0-9_-]`, does not contain `__` and neither starts nor ends with `_`.
pub fn validate_key_part(key: &str) -> Result<()> {
    let invalid = |reason| {
        Err(SchemaError::InvalidKey {
            key: key.to_string(),
            reason,
        })
    };

    if key.is_empty() {
        return invalid("key must not be empty");
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
    {
        return invalid("only lowercase letters, digits, '_' and '-' are allowed");
    }
    if key.contains(SEPARATOR) {
        return invalid("key must not contain '__'");
    }
    if key.starts_with('_') || key.ends_with('_') {
        return invalid("key must not start or end with '_'");
    }
    Ok(())
}

/// Validates a brick key: a valid key part that is not a reserved segment.
///
/// # Errors
///
/// Returns [`SchemaError::InvalidKey`] for invalid or reserved keys.
pub fn validate_brick_key(key: &str) -> Result<()> {
    validate_key_part(key)?;
    if key == VERSIONS || key == FIELDS {
        return Err(SchemaError::InvalidKey {
            key: key.to_string(),
            reason: "brick keys 'versions' and 'fields' are reserved",
        });
    }
    Ok(())
}

fn unexpected(table_type: TableType, part: &'static str, value: &str) -> SchemaError {
    SchemaError::UnexpectedKeyPart {
        table_type: table_type.as_str(),
        part,
        value: value.to_string(),
    }
}

/// Builds the physical name of a table.
///
/// # Errors
///
/// * [`SchemaError::MissingBrickKey`] for a brick table without a brick key.
/// * [`SchemaError::EmptyRepeaterPath`] for a repeater table with no path.
/// * [`SchemaError::InvalidKey`] if any key part is invalid.
/// * [`SchemaError::UnexpectedKeyPart`] if the key carries a brick or path the
///   table type does not use.
pub fn table_name(table_type: TableType, key: &TableKey) -> Result<String> {
    validate_key_part(&key.collection)?;

    let mut parts: Vec<&str> = vec![TABLE_PREFIX, DOCUMENT, &key.collection];

    match table_type {
        TableType::Document | TableType::Versions | TableType::DocumentFields => {
            if let Some(brick) = &key.brick {
                return Err(unexpected(table_type, "brick key", brick));
            }
            if let Some(repeater) = key.repeater_path.first() {
                return Err(unexpected(table_type, "repeater", repeater));
            }
            match table_type {
                TableType::Versions => parts.push(VERSIONS),
                TableType::DocumentFields => parts.push(FIELDS),
                _ => {}
            }
        }
        TableType::Brick => {
            let brick = key
                .brick
                .as_deref()
                .ok_or_else(|| SchemaError::MissingBrickKey(key.collection.clone()))?;
            if let Some(repeater) = key.repeater_path.first() {
                return Err(unexpected(table_type, "repeater", repeater));
            }
            validate_brick_key(brick)?;
            parts.push(brick);
        }
        TableType::Repeater => {
            if key.repeater_path.is_empty() {
                return Err(SchemaError::EmptyRepeaterPath(key.collection.clone()));
            }
            match key.brick.as_deref() {
                Some(brick) => {
                    validate_brick_key(brick)?;
                    parts.push(brick);
                }
                None => parts.push(FIELDS),
            }
            for repeater in &key.repeater_path {
                validate_key_part(repeater)?;
                parts.push(repeater);
            }
        }
    }

    Ok(parts.join(SEPARATOR))
}

fn split_parts(table_name: &str) -> Option<Vec<&str>> {
    let rest = table_name
        .strip_prefix(TABLE_PREFIX)?
        .strip_prefix(SEPARATOR)?
        .strip_prefix(DOCUMENT)?
        .strip_prefix(SEPARATOR)?;
    let parts: Vec<&str> = rest.split(SEPARATOR).collect();
    if parts.iter().any(|p| validate_key_part(p).is_err()) {
        return None;
    }
    Some(parts)
}

/// Returns the collection key of a table name produced by [`table_name`].
#[must_use]
pub fn collection_of(table_name: &str) -> Option<&str> {
    split_parts(table_name).and_then(|parts| parts.first().copied())
}

/// Inverse of [`table_name`].
///
/// Returns `None` for names the namer could not have produced.
#[must_use]
pub fn parse_table_name(table_name: &str) -> Option<(TableType, TableKey)> {
    let parts = split_parts(table_name)?;
    let (collection, rest) = parts.split_first()?;
    let key = TableKey::new(*collection);

    match rest {
        [] => Some((TableType::Document, key)),
        [VERSIONS] => Some((TableType::Versions, key)),
        [FIELDS] => Some((TableType::DocumentFields, key)),
        [brick] => Some((TableType::Brick, key.with_brick(*brick))),
        [VERSIONS, ..] => None,
        [owner, path @ ..] => {
            let key = if *owner == FIELDS {
                key
            } else {
                key.with_brick(*owner)
            };
            let key = path.iter().fold(key, |k, r| k.with_repeater(*r));
            Some((TableType::Repeater, key))
        }
    }
}
