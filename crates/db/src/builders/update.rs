//! Structured document update operations.

use bson::{Bson, Document, doc};

/// An update operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateOp {
    /// Overwrite a path.
    Set,
    /// Remove a path.
    Unset,
    /// Append values absent from an array.
    AddToSet,
    /// Append values to an array.
    Push,
    /// Remove array elements matching a condition.
    Pull,
}

impl UpdateOp {
    /// Operator keyword.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Set => "$set",
            Self::Unset => "$unset",
            Self::AddToSet => "$addToSet",
            Self::Push => "$push",
            Self::Pull => "$pull",
        }
    }
}

/// Operators in first-use order, each with a path to value mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateMap {
    ops: Vec<(UpdateOp, Document)>,
}

impl UpdateMap {
    /// An empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, op: UpdateOp) -> &mut Document {
        let i = match self.ops.iter().position(|(o, _)| *o == op) {
            Some(i) => i,
            None => {
                self.ops.push((op, Document::new()));
                self.ops.len() - 1
            }
        };
        &mut self.ops[i].1
    }

    /// `$set[key] = value`, overwriting a previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Bson>) -> &mut Self {
        self.entry(UpdateOp::Set).insert(key.into(), value.into());
        self
    }

    /// `$unset[key]`.
    pub fn unset(&mut self, key: impl Into<String>) -> &mut Self {
        self.entry(UpdateOp::Unset).insert(key.into(), "");
        self
    }

    /// `$addToSet[key]`. Repeated calls collect into `$each` without duplicates.
    pub fn add_to_set(&mut self, key: impl Into<String>, value: impl Into<Bson>) -> &mut Self {
        let key = key.into();
        let value = value.into();
        let entry = self.entry(UpdateOp::AddToSet);
        let merged = match entry.remove(&key) {
            None => value,
            Some(existing) => {
                let mut each = into_each(existing);
                if !each.contains(&value) {
                    each.push(value);
                }
                Bson::Document(doc! { "$each": each })
            }
        };
        entry.insert(key, merged);
        self
    }

    /// `$push[key]`. Repeated calls collect into `$each` in call order.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<Bson>) -> &mut Self {
        let key = key.into();
        let value = value.into();
        let entry = self.entry(UpdateOp::Push);
        let merged = match entry.remove(&key) {
            None => value,
            Some(existing) => {
                let mut each = into_each(existing);
                each.push(value);
                Bson::Document(doc! { "$each": each })
            }
        };
        entry.insert(key, merged);
        self
    }

    /// `$pull[key]` with a condition. Repeated calls are joined with `$or`.
    pub fn pull(&mut self, key: impl Into<String>, condition: impl Into<Bson>) -> &mut Self {
        let key = key.into();
        let condition = condition.into();
        let entry = self.entry(UpdateOp::Pull);
        let merged = match entry.remove(&key) {
            None => condition,
            Some(Bson::Document(mut existing)) if existing.contains_key("$or") => {
                if let Ok(any) = existing.get_array_mut("$or") {
                    any.push(condition);
                }
                Bson::Document(existing)
            }
            Some(existing) => Bson::Document(doc! { "$or": [existing, condition] }),
        };
        entry.insert(key, merged);
        self
    }

    /// Value recorded for `key` under `op`.
    #[must_use]
    pub fn get(&self, op: UpdateOp, key: &str) -> Option<&Bson> {
        self.ops
            .iter()
            .find(|(o, _)| *o == op)
            .and_then(|(_, d)| d.get(key))
    }

    /// Whether `key` is targeted by `op`.
    #[must_use]
    pub fn has(&self, op: UpdateOp, key: &str) -> bool {
        self.get(op, key).is_some()
    }

    /// Whether any operator targets `key`.
    #[must_use]
    pub fn has_key(&self, key: &str) -> bool {
        self.ops.iter().any(|(_, d)| d.contains_key(key))
    }

    /// Whether any operator targets `key` or a path below it.
    #[must_use]
    pub fn touches(&self, key: &str) -> bool {
        self.ops
            .iter()
            .flat_map(|(_, d)| d.keys())
            .any(|k| is_path_or_child(k, key))
    }

    /// Number of operators targeting `key` or a path below it.
    #[must_use]
    pub fn operators_on(&self, key: &str) -> usize {
        self.ops
            .iter()
            .filter(|(_, d)| d.keys().any(|k| is_path_or_child(k, key)))
            .count()
    }

    /// Replace every operation on `key` and its children with `$set[key] = value`.
    ///
    /// Used when several operators target one array, which a single store
    /// update cannot express.
    pub fn flatten_key(&mut self, key: &str, value: impl Into<Bson>) -> &mut Self {
        for (_, d) in &mut self.ops {
            let stale: Vec<String> = d
                .keys()
                .filter(|k| is_path_or_child(k, key))
                .cloned()
                .collect();
            for k in stale {
                d.remove(&k);
            }
        }
        self.ops.retain(|(_, d)| !d.is_empty());
        self.set(key, value)
    }

    /// Whether no operation is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.iter().all(|(_, d)| d.is_empty())
    }

    /// Drop every operation.
    pub fn clear(&mut self) {
        self.ops.clear();
    }

    /// Store update document, operators in first-use order.
    #[must_use]
    pub fn to_document(&self) -> Document {
        let mut out = Document::new();
        for (op, d) in &self.ops {
            if !d.is_empty() {
                out.insert(op.as_str(), d.clone());
            }
        }
        out
    }
}

fn into_each(existing: Bson) -> Vec<Bson> {
    match existing {
        Bson::Document(mut d) if d.contains_key("$each") => match d.remove("$each") {
            Some(Bson::Array(values)) => values,
            _ => Vec::new(),
        },
        other => vec![other],
    }
}

fn is_path_or_child(path: &str, key: &str) -> bool {
    path == key
        || path
            .strip_prefix(key)
            .is_some_and(|rest| rest.starts_with('.'))
}
