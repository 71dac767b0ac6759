//! Test data for schemadir: the droids dataset and a small query engine.
//!
//! [`DroidsSchema`] implements [`QuerySchema`] over two droids, keyed by id
//! `"2000"` (C-3PO) and `"2001"` (R2-D2). The engine in [`engine`] is generic
//! over a [`SchemaModel`] so other small schemas can be built the same way.

pub mod droids;
pub mod engine;

pub use droids::{droid, Droid, DroidsSchema, ARTOO, THREEPIO};
pub use engine::{ArgSpec, FieldKind, FieldSpec, SchemaModel};

use schemadir_core::{QuerySchema, SchemaDefinition, SchemaMetadata};
use std::sync::Arc;

/// Query that asks for the hero's type and name.
pub const DROIDS_QUERY: &str = "
    query CheckTypeOfR2 {
        droidHero {
            __typename
            name
        }
    }";

/// Query that needs a non-null `$id` variable.
pub const DROIDS_VARIABLES_QUERY: &str = "
    query GetDroidNameR2($id: String!) {
        droid(id: $id) {
            name
        }
    }";

/// The droids schema, published under its query type name `DroidQueries`.
pub fn droids_definition() -> Arc<SchemaDefinition> {
    Arc::new(SchemaDefinition::new(droids_schema()))
}

/// The droids schema published under `name`.
pub fn named_definition(name: &str) -> Arc<SchemaDefinition> {
    Arc::new(SchemaDefinition::with_metadata(
        droids_schema(),
        SchemaMetadata::new().with_schema_name(name),
    ))
}

fn droids_schema() -> Arc<dyn QuerySchema> {
    Arc::new(DroidsSchema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemadir_core::Queryable;
    use serde_json::json;

    #[tokio::test]
    async fn test_definition_answers_queries() {
        let result = droids_definition().query(DROIDS_QUERY).await.unwrap();
        assert!(result.is_succeeded());
        assert_eq!(result.data()["droidHero"]["name"], json!("R2-D2"));
    }

    #[tokio::test]
    async fn test_invalid_query_is_a_failed_result() {
        let result = droids_definition()
            .query(&DROIDS_QUERY[10..])
            .await
            .unwrap();
        assert!(!result.is_succeeded());
        assert!(result.data().is_empty());
        assert_eq!(result.errors()[0].error_type(), "InvalidSyntax");
        assert_eq!(result.errors()[0].locations()[0].line(), 1);
    }

    #[tokio::test]
    async fn test_missing_variable_is_an_error() {
        let err = droids_definition()
            .query_with_variables(DROIDS_VARIABLES_QUERY, Some(json!({"some": "other variable"})))
            .await
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("Variable 'id' has coerced Null value for NonNull type 'String!'"));
    }

    #[test]
    fn test_named_definition() {
        let definition = named_definition("A");
        assert_eq!(definition.schema_name(), "A");
        assert_eq!(definition.query_type_name(), "DroidQueries");
    }
}
