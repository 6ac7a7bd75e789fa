//! Normalized response cache.
//!
//! Every object that carries `__typename` and `id` (or `_id`) is stored once
//! under `"{__typename}:{id}"` and replaced in its parent by
//! `{"__ref": key}`. Later responses that contain the same entity merge their
//! fields into the stored copy, so every cached result referring to it sees
//! the update.
//!
//! Query results are stored per (document, variables) and rebuilt from the
//! entity table on read. A result whose entity has been evicted is a miss.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};

use crate::graphql::GraphQLRequest;

const REF: &str = "__ref";

/// Entity table plus normalized query results.
#[derive(Debug, Default, Clone)]
pub struct NormalizedCache {
    entities: HashMap<String, Map<String, Value>>,
    results: HashMap<String, Value>,
}

impl NormalizedCache {
    /// Empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache key of an object, if it can be normalized.
    pub fn entity_key(object: &Map<String, Value>) -> Option<String> {
        let typename = object.get("__typename")?.as_str()?;
        let id = match object.get("id").or_else(|| object.get("_id"))? {
            Value::String(id) => id.clone(),
            Value::Number(id) => id.to_string(),
            _ => return None,
        };
        Some(format!("{typename}:{id}"))
    }

    /// Key a query result is stored under.
    pub fn result_key(request: &GraphQLRequest) -> String {
        // serde_json maps are ordered by key, so equal variable sets print
        // identically.
        format!(
            "{}|{}",
            request.query,
            Value::Object(request.variables.clone())
        )
    }

    /// Store `data` as the result for `key`, merging its entities.
    pub fn write_result(&mut self, key: &str, data: &Value) {
        let normalized = self.normalize(data);
        self.results.insert(key.to_string(), normalized);
    }

    /// Merge the entities in `data` without storing a result (mutations).
    pub fn write_entities(&mut self, data: &Value) {
        let _ = self.normalize(data);
    }

    /// Rebuild the result stored for `key`.
    pub fn read_result(&self, key: &str) -> Option<Value> {
        let normalized = self.results.get(key)?;
        self.denormalize(normalized, &mut HashSet::new())
    }

    /// Rebuild one entity by key.
    pub fn entity(&self, key: &str) -> Option<Value> {
        let mut visiting = HashSet::new();
        self.denormalize(&reference(key), &mut visiting)
    }

    /// Number of stored entities.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Number of stored query results.
    pub fn result_count(&self) -> usize {
        self.results.len()
    }

    /// Drop one entity. Results referring to it become misses.
    pub fn evict(&mut self, key: &str) -> bool {
        self.entities.remove(key).is_some()
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.entities.clear();
        self.results.clear();
    }

    fn normalize(&mut self, value: &Value) -> Value {
        match value {
            Value::Array(items) => Value::Array(items.iter().map(|v| self.normalize(v)).collect()),
            Value::Object(object) => {
                let fields: Map<String, Value> = object
                    .iter()
                    .map(|(name, v)| (name.clone(), self.normalize(v)))
                    .collect();
                match Self::entity_key(object) {
                    Some(key) => {
                        self.entities.entry(key.clone()).or_default().extend(fields);
                        reference(&key)
                    }
                    None => Value::Object(fields),
                }
            }
            other => other.clone(),
        }
    }

    fn denormalize(&self, value: &Value, visiting: &mut HashSet<String>) -> Option<Value> {
        match value {
            Value::Array(items) => items
                .iter()
                .map(|v| self.denormalize(v, visiting))
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
            Value::Object(object) => {
                if let Some(key) = ref_key(object) {
                    // A cycle is returned as the bare reference.
                    if !visiting.insert(key.to_string()) {
                        return Some(value.clone());
                    }
                    let entity = self.entities.get(key)?;
                    let rebuilt = self.denormalize_fields(entity, visiting);
                    visiting.remove(key);
                    return rebuilt;
                }
                self.denormalize_fields(object, visiting)
            }
            other => Some(other.clone()),
        }
    }

    fn denormalize_fields(
        &self,
        object: &Map<String, Value>,
        visiting: &mut HashSet<String>,
    ) -> Option<Value> {
        let mut fields = Map::with_capacity(object.len());
        for (name, v) in object {
            fields.insert(name.clone(), self.denormalize(v, visiting)?);
        }
        Some(Value::Object(fields))
    }
}

fn reference(key: &str) -> Value {
    let mut object = Map::new();
    object.insert(REF.to_string(), Value::String(key.to_string()));
    Value::Object(object)
}

fn ref_key(object: &Map<String, Value>) -> Option<&str> {
    if object.len() != 1 {
        return None;
    }
    object.get(REF)?.as_str()
}
