//! # Schema Module
//!
//! Merges the columns declared by every registered filter into the one
//! schema the cache is widened to.
//!
//! A column keeps its type forever. It may be given a build expression
//! by at most one definition; a second filter declaring the same column
//! with a different build is a conflict unless overwrite is requested.

use crate::core::cache::{ColumnType, CHECKED_TIME_COLUMN, PATH_COLUMN};
use crate::core::filter::{BuildExpr, ColumnSpec, Filter};
use crate::error::SchemaError;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
struct ColumnEntry {
    column_type: ColumnType,
    build: Option<BuildExpr>,
}

/// Merged column requirements of all registered filters
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    columns: BTreeMap<String, ColumnEntry>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a filter's columns. On error nothing is registered.
    pub fn register(&mut self, filter: &Filter) -> Result<usize, SchemaError> {
        self.register_columns(&filter.columns(), false)
    }

    /// Like `register`, but a different build expression replaces the
    /// existing one. Type disagreements are still conflicts.
    pub fn register_overwrite(&mut self, filter: &Filter) -> Result<usize, SchemaError> {
        self.register_columns(&filter.columns(), true)
    }

    /// Merge column declarations all-or-nothing.
    ///
    /// Returns the number of columns that were not known before.
    pub fn register_columns(
        &mut self,
        specs: &[ColumnSpec],
        overwrite: bool,
    ) -> Result<usize, SchemaError> {
        let mut staged = self.columns.clone();
        let mut added = 0;

        for spec in specs {
            if spec.name.is_empty() {
                return Err(SchemaError::EmptyName);
            }
            if spec.name == PATH_COLUMN || spec.name == CHECKED_TIME_COLUMN {
                return Err(SchemaError::Reserved {
                    column: spec.name.clone(),
                });
            }

            match staged.get_mut(&spec.name) {
                None => {
                    staged.insert(
                        spec.name.clone(),
                        ColumnEntry {
                            column_type: spec.column_type,
                            build: spec.build.clone(),
                        },
                    );
                    added += 1;
                }
                Some(existing) => {
                    if existing.column_type != spec.column_type {
                        return Err(SchemaError::Conflict {
                            column: spec.name.clone(),
                            existing: existing.column_type.to_string(),
                            incoming: spec.column_type.to_string(),
                        });
                    }
                    let replacement = match (&existing.build, &spec.build) {
                        (_, None) => None,
                        (None, Some(incoming)) => Some(incoming.clone()),
                        (Some(current), Some(incoming)) if current == incoming => None,
                        (Some(_), Some(incoming)) if overwrite => Some(incoming.clone()),
                        (Some(current), Some(incoming)) => {
                            return Err(SchemaError::Conflict {
                                column: spec.name.clone(),
                                existing: current.id().to_string(),
                                incoming: incoming.id().to_string(),
                            });
                        }
                    };
                    if let Some(build) = replacement {
                        existing.build = Some(build);
                    }
                }
            }
        }

        self.columns = staged;
        Ok(added)
    }

    /// Every registered column and its type
    pub fn merged_schema(&self) -> BTreeMap<String, ColumnType> {
        self.columns
            .iter()
            .map(|(name, entry)| (name.clone(), entry.column_type))
            .collect()
    }

    /// Columns that know how to compute themselves
    pub fn build_exprs(&self) -> BTreeMap<String, BuildExpr> {
        self.columns
            .iter()
            .filter_map(|(name, entry)| entry.build.clone().map(|b| (name.clone(), b)))
            .collect()
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    pub fn column_type(&self, column: &str) -> Option<ColumnType> {
        self.columns.get(column).map(|entry| entry.column_type)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::Value;
    use crate::core::filter::{
        CustomFilter, DateField, DateFilter, HashFilter, Predicate, ResolutionFilter,
    };

    fn column_names(registry: &SchemaRegistry) -> Vec<String> {
        registry.merged_schema().into_keys().collect()
    }

    fn custom(columns: Vec<ColumnSpec>) -> Filter {
        CustomFilter::new("custom", columns, Predicate::And(vec![])).into()
    }

    #[test]
    fn schema_only_grows() {
        let mut registry = SchemaRegistry::new();
        let filters: Vec<Filter> = vec![
            ResolutionFilter::new(Some(10), None).unwrap().into(),
            HashFilter::new("gradient", "newest").unwrap().into(),
            DateFilter::new(DateField::Modified, None, None).unwrap().into(),
        ];

        let mut previous = Vec::new();
        for filter in &filters {
            registry.register(filter).unwrap();
            let current = column_names(&registry);
            assert!(previous.iter().all(|c| current.contains(c)));
            previous = current;
        }

        assert_eq!(previous, vec!["hash", "modified_time", "resolution"]);
    }

    #[test]
    fn shared_columns_merge_silently() {
        let mut registry = SchemaRegistry::new();

        // both declare modified_time with the same build
        registry
            .register(&HashFilter::new("mean", "newest").unwrap().into())
            .unwrap();
        let added = registry
            .register(&DateFilter::new(DateField::Modified, None, None).unwrap().into())
            .unwrap();

        assert_eq!(added, 0);
    }

    #[test]
    fn different_hash_builds_conflict_and_leave_registry_unchanged() {
        let mut registry = SchemaRegistry::new();
        registry
            .register(&HashFilter::new("gradient", "newest").unwrap().into())
            .unwrap();
        let before = registry.build_exprs();

        let result = registry.register(&HashFilter::new("mean", "largest").unwrap().into());

        assert!(matches!(result, Err(SchemaError::Conflict { ref column, .. }) if column == "hash"));
        assert_eq!(registry.build_exprs(), before);
        assert!(!registry.contains("resolution"));
    }

    #[test]
    fn overwrite_replaces_build() {
        let mut registry = SchemaRegistry::new();
        registry
            .register(&HashFilter::new("gradient", "newest").unwrap().into())
            .unwrap();

        registry
            .register_overwrite(&HashFilter::new("mean", "newest").unwrap().into())
            .unwrap();

        assert_eq!(registry.build_exprs()["hash"].id(), "hash:mean");
    }

    #[test]
    fn type_change_conflicts_even_with_overwrite() {
        let mut registry = SchemaRegistry::new();
        registry
            .register(&custom(vec![ColumnSpec::assumed("rating", ColumnType::Integer)]))
            .unwrap();

        let result =
            registry.register_overwrite(&custom(vec![ColumnSpec::assumed("rating", ColumnType::Float)]));

        assert!(matches!(result, Err(SchemaError::Conflict { .. })));
        assert_eq!(registry.column_type("rating"), Some(ColumnType::Integer));
    }

    #[test]
    fn build_upgrades_an_assumed_column() {
        let mut registry = SchemaRegistry::new();
        registry
            .register(&custom(vec![ColumnSpec::assumed("rating", ColumnType::Integer)]))
            .unwrap();
        assert!(registry.build_exprs().is_empty());

        registry
            .register(&custom(vec![ColumnSpec::computed(
                "rating",
                ColumnType::Integer,
                BuildExpr::new("rating:v1", |_| Ok(Value::Integer(3))),
            )]))
            .unwrap();

        assert_eq!(registry.build_exprs()["rating"].id(), "rating:v1");
    }

    #[test]
    fn reserved_and_empty_names_are_rejected() {
        let mut registry = SchemaRegistry::new();

        assert_eq!(
            registry.register(&custom(vec![ColumnSpec::assumed("path", ColumnType::Text)])),
            Err(SchemaError::Reserved {
                column: "path".to_string()
            })
        );
        assert_eq!(
            registry.register(&custom(vec![ColumnSpec::assumed("", ColumnType::Text)])),
            Err(SchemaError::EmptyName)
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn failed_batch_registers_nothing() {
        let mut registry = SchemaRegistry::new();

        let result = registry.register(&custom(vec![
            ColumnSpec::assumed("fine", ColumnType::Text),
            ColumnSpec::assumed("checked_time", ColumnType::Timestamp),
        ]));

        assert!(result.is_err());
        assert!(!registry.contains("fine"));
    }
}
