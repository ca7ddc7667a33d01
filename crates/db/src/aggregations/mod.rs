//! Read pipelines as data.
//!
//! A [`Stage`] is one store-agnostic pipeline step. A [`Fragment`] is an
//! ordered list of stages; fragments compose by concatenation.

mod ban;
mod emote;
mod emote_set;
mod report;
mod user;

pub use ban::*;
pub use emote::*;
pub use emote_set::*;
pub use report::*;
pub use user::*;

use bson::{Bson, Document, doc};

use crate::store::Collection;

/// One pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// Keep documents matching a filter.
    Match(Document),
    /// Equality join.
    Lookup {
        /// Joined collection.
        from: Collection,
        /// Field of the input document.
        local_field: String,
        /// Field of the joined document.
        foreign_field: String,
        /// Output array field.
        as_field: String,
    },
    /// Join through a sub-pipeline with bound variables.
    LookupPipeline {
        /// Joined collection.
        from: Collection,
        /// Variables visible to the sub-pipeline as `$$name`.
        let_vars: Document,
        /// Sub-pipeline.
        pipeline: Vec<Stage>,
        /// Output array field.
        as_field: String,
    },
    /// Add or overwrite computed fields.
    Set(Document),
    /// Remove fields.
    Unset(Vec<String>),
    /// One output document per array element.
    Unwind {
        /// Array path, without the `$` prefix.
        path: String,
        /// Keep documents whose array is missing or empty.
        preserve_null_and_empty: bool,
    },
    /// Group by an expression.
    Group(Document),
    /// Reshape documents.
    Project(Document),
    /// Order documents.
    Sort(Document),
    /// Skip documents.
    Skip(u64),
    /// Cap documents.
    Limit(i64),
    /// Promote an embedded document to the root.
    ReplaceRoot(Bson),
    /// Count documents into a field.
    Count(String),
}

impl Stage {
    /// Equality join shorthand.
    pub fn lookup(
        from: Collection,
        local_field: impl Into<String>,
        foreign_field: impl Into<String>,
        as_field: impl Into<String>,
    ) -> Self {
        Self::Lookup {
            from,
            local_field: local_field.into(),
            foreign_field: foreign_field.into(),
            as_field: as_field.into(),
        }
    }

    /// Unwind shorthand.
    pub fn unwind(path: impl Into<String>, preserve_null_and_empty: bool) -> Self {
        Self::Unwind {
            path: path.into(),
            preserve_null_and_empty,
        }
    }

    /// Stage keyword.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Match(_) => "$match",
            Self::Lookup { .. } | Self::LookupPipeline { .. } => "$lookup",
            Self::Set(_) => "$set",
            Self::Unset(_) => "$unset",
            Self::Unwind { .. } => "$unwind",
            Self::Group(_) => "$group",
            Self::Project(_) => "$project",
            Self::Sort(_) => "$sort",
            Self::Skip(_) => "$skip",
            Self::Limit(_) => "$limit",
            Self::ReplaceRoot(_) => "$replaceRoot",
            Self::Count(_) => "$count",
        }
    }

    /// Store form of the stage.
    #[must_use]
    pub fn to_document(&self) -> Document {
        let body: Bson = match self {
            Self::Match(d) | Self::Set(d) | Self::Group(d) | Self::Project(d) | Self::Sort(d) => {
                Bson::Document(d.clone())
            }
            Self::Lookup {
                from,
                local_field,
                foreign_field,
                as_field,
            } => Bson::Document(doc! {
                "from": from.name(),
                "localField": local_field.clone(),
                "foreignField": foreign_field.clone(),
                "as": as_field.clone(),
            }),
            Self::LookupPipeline {
                from,
                let_vars,
                pipeline,
                as_field,
            } => Bson::Document(doc! {
                "from": from.name(),
                "let": let_vars.clone(),
                "pipeline": pipeline.iter().map(Self::to_document).collect::<Vec<_>>(),
                "as": as_field.clone(),
            }),
            Self::Unset(fields) => Bson::from(fields.clone()),
            Self::Unwind {
                path,
                preserve_null_and_empty,
            } => Bson::Document(doc! {
                "path": format!("${path}"),
                "preserveNullAndEmptyArrays": *preserve_null_and_empty,
            }),
            Self::Skip(n) => Bson::Int64(i64::try_from(*n).unwrap_or(i64::MAX)),
            Self::Limit(n) => Bson::Int64(*n),
            Self::ReplaceRoot(new_root) => Bson::Document(doc! { "newRoot": new_root.clone() }),
            Self::Count(field) => Bson::String(field.clone()),
        };
        let mut out = Document::new();
        out.insert(self.kind(), body);
        out
    }
}

/// An ordered, composable list of stages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment(Vec<Stage>);

impl Fragment {
    /// An empty fragment.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a stage.
    #[must_use]
    pub fn then(mut self, stage: Stage) -> Self {
        self.0.push(stage);
        self
    }

    /// Append another fragment.
    #[must_use]
    pub fn concat(mut self, other: Self) -> Self {
        self.0.extend(other.0);
        self
    }

    /// Stages in order.
    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.0
    }

    /// Number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Take the stages.
    #[must_use]
    pub fn into_pipeline(self) -> Vec<Stage> {
        self.0
    }

    /// Store form of every stage.
    #[must_use]
    pub fn to_documents(&self) -> Vec<Document> {
        self.0.iter().map(Stage::to_document).collect()
    }
}

impl From<Vec<Stage>> for Fragment {
    fn from(stages: Vec<Stage>) -> Self {
        Self(stages)
    }
}

impl FromIterator<Stage> for Fragment {
    fn from_iter<I: IntoIterator<Item = Stage>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Fragment {
    type Item = Stage;
    type IntoIter = std::vec::IntoIter<Stage>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_document() {
        let stage = Stage::lookup(Collection::Users, "owner_id", "_id", "owner");
        assert_eq!(
            stage.to_document(),
            doc! { "$lookup": {
                "from": "users",
                "localField": "owner_id",
                "foreignField": "_id",
                "as": "owner",
            } }
        );
    }

    #[test]
    fn test_nested_pipeline_document() {
        let stage = Stage::LookupPipeline {
            from: Collection::Roles,
            let_vars: doc! { "ids": "$role_ids" },
            pipeline: vec![
                Stage::Match(doc! { "$expr": { "$in": ["$_id", "$$ids"] } }),
                Stage::Sort(doc! { "position": -1 }),
            ],
            as_field: "roles".to_string(),
        };
        let d = stage.to_document();
        let lookup = d.get_document("$lookup").unwrap();
        assert_eq!(lookup.get_str("from").unwrap(), "roles");
        assert_eq!(lookup.get_array("pipeline").unwrap().len(), 2);
    }

    #[test]
    fn test_fragments_concatenate_in_order() {
        let a = Fragment::new().then(Stage::Match(doc! { "a": 1 }));
        let b = Fragment::new()
            .then(Stage::unwind("x", true))
            .then(Stage::Limit(5));
        let all = a.concat(b);

        let kinds: Vec<&str> = all.stages().iter().map(Stage::kind).collect();
        assert_eq!(kinds, vec!["$match", "$unwind", "$limit"]);
        assert_eq!(
            all.to_documents()[1],
            doc! { "$unwind": { "path": "$x", "preserveNullAndEmptyArrays": true } }
        );
    }
}
