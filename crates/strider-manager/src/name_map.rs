//! [`NameMap`] – bidirectional name ↔ integer-id association.
//!
//! Built incrementally via repeated registration calls during control
//! manager configuration. Re-registering an identical pair is idempotent;
//! registering a conflicting id for an existing name (or the reverse) is
//! rejected without mutating the table.

use std::collections::HashMap;

use strider_types::StriderError;

/// Bidirectional association between names and integer ids.
#[derive(Debug, Default, Clone)]
pub struct NameMap {
    by_name: HashMap<String, usize>,
    by_id: HashMap<usize, String>,
}

impl NameMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name ↔ id`.
    ///
    /// Idempotent for an identical pair.
    ///
    /// # Errors
    ///
    /// `StriderError::Lookup` when either side is already associated with a
    /// different partner. The table is left unchanged.
    pub fn insert(&mut self, name: &str, id: usize) -> Result<(), StriderError> {
        match (self.by_name.get(name), self.by_id.get(&id)) {
            (Some(&existing_id), _) if existing_id != id => Err(StriderError::Lookup(format!(
                "name '{name}' is already mapped to id {existing_id}, refusing id {id}"
            ))),
            (_, Some(existing_name)) if existing_name != name => {
                Err(StriderError::Lookup(format!(
                    "id {id} is already mapped to '{existing_name}', refusing '{name}'"
                )))
            }
            _ => {
                self.by_name.insert(name.to_string(), id);
                self.by_id.insert(id, name.to_string());
                Ok(())
            }
        }
    }

    /// Id registered for `name`.
    pub fn id_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Name registered for `id`.
    pub fn name_of(&self, id: usize) -> Option<&str> {
        self.by_id.get(&id).map(String::as_str)
    }

    /// Number of registered pairs.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Whether no pair has been registered.
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Whether every id in `0..count` has a name. The control manager
    /// requires this before entering Running.
    pub fn covers(&self, count: usize) -> bool {
        (0..count).all(|id| self.by_id.contains_key(&id))
    }
}
