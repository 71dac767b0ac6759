//! The droids of the Star Wars trilogy and a schema to query them.

use crate::engine::{self, ArgSpec, FieldKind, FieldSpec, SchemaModel};
use schemadir_core::{ExecutionResult, QuerySchema};
use serde_json::{json, Map, Value};

pub const QUERY_TYPE: &str = "DroidQueries";
pub const DROID_TYPE: &str = "Droid";
pub const CHARACTER_TYPE: &str = "Character";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Droid {
    pub id: &'static str,
    pub name: &'static str,
    /// Ids of friends. Only droids resolve; other characters are skipped.
    pub friends: &'static [&'static str],
    pub appears_in: &'static [u8],
    pub primary_function: &'static str,
}

pub static THREEPIO: Droid = Droid {
    id: "2000",
    name: "C-3PO",
    friends: &["1000", "1002", "1003", "2001"],
    appears_in: &[4, 5, 6],
    primary_function: "Protocol",
};

pub static ARTOO: Droid = Droid {
    id: "2001",
    name: "R2-D2",
    friends: &["1000", "1002", "1003"],
    appears_in: &[4, 5, 6],
    primary_function: "Astromech",
};

pub static DROIDS: [&Droid; 2] = [&THREEPIO, &ARTOO];

/// Look a droid up by id.
pub fn droid(id: &str) -> Option<&'static Droid> {
    DROIDS.iter().copied().find(|droid| droid.id == id)
}

/// Name of an episode number, as the `Episode` enum renders it.
pub fn episode_name(episode: u8) -> &'static str {
    match episode {
        4 => "NEWHOPE",
        5 => "EMPIRE",
        6 => "JEDI",
        _ => "UNKNOWN",
    }
}

impl Droid {
    /// Source value the resolvers read from.
    pub fn to_value(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "friends": self.friends,
            "appearsIn": self.appears_in,
            "primaryFunction": self.primary_function,
        })
    }
}

const NO_ARGUMENTS: &[ArgSpec] = &[];

const HERO_ARGUMENTS: &[ArgSpec] = &[ArgSpec {
    name: "episode",
    required: false,
}];

const DROID_ARGUMENTS: &[ArgSpec] = &[ArgSpec {
    name: "id",
    required: true,
}];

const LEAF: FieldSpec = FieldSpec {
    kind: FieldKind::Leaf,
    arguments: NO_ARGUMENTS,
};

/// Query schema over the droids.
///
/// Root type `DroidQueries` with `droidHero(episode)` and `droid(id!)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DroidsSchema;

impl SchemaModel for DroidsSchema {
    fn query_type(&self) -> &'static str {
        QUERY_TYPE
    }

    fn field(&self, type_name: &str, field: &str) -> Option<FieldSpec> {
        match (type_name, field) {
            (QUERY_TYPE, "droidHero") => Some(FieldSpec {
                kind: FieldKind::Object(DROID_TYPE),
                arguments: HERO_ARGUMENTS,
            }),
            (QUERY_TYPE, "droid") => Some(FieldSpec {
                kind: FieldKind::Object(DROID_TYPE),
                arguments: DROID_ARGUMENTS,
            }),
            (DROID_TYPE, "primaryFunction") => Some(LEAF),
            (DROID_TYPE | CHARACTER_TYPE, "id" | "name" | "appearsIn") => Some(LEAF),
            (DROID_TYPE | CHARACTER_TYPE, "friends") => Some(FieldSpec {
                kind: FieldKind::Object(CHARACTER_TYPE),
                arguments: NO_ARGUMENTS,
            }),
            _ => None,
        }
    }

    fn resolve(
        &self,
        type_name: &str,
        source: &Value,
        field: &str,
        arguments: &Map<String, Value>,
    ) -> Value {
        match (type_name, field) {
            (QUERY_TYPE, "droidHero") => ARTOO.to_value(),
            (QUERY_TYPE, "droid") => arguments
                .get("id")
                .and_then(Value::as_str)
                .and_then(droid)
                .map(Droid::to_value)
                .unwrap_or(Value::Null),
            (_, "friends") => Value::Array(
                string_list(source, "friends")
                    .filter_map(droid)
                    .map(Droid::to_value)
                    .collect(),
            ),
            (_, "appearsIn") => Value::Array(
                source
                    .get("appearsIn")
                    .and_then(Value::as_array)
                    .into_iter()
                    .flatten()
                    .filter_map(Value::as_u64)
                    .map(|episode| Value::from(episode_name(episode as u8)))
                    .collect(),
            ),
            _ => source.get(field).cloned().unwrap_or(Value::Null),
        }
    }

    fn concrete_type(&self, type_name: &str, value: &Value) -> String {
        let is_droid = value
            .get("id")
            .and_then(Value::as_str)
            .and_then(droid)
            .is_some();
        if type_name == CHARACTER_TYPE && is_droid {
            DROID_TYPE.to_string()
        } else {
            type_name.to_string()
        }
    }
}

fn string_list<'a>(source: &'a Value, key: &str) -> impl Iterator<Item = &'a str> {
    source
        .get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
}

impl QuerySchema for DroidsSchema {
    fn query_type_name(&self) -> &str {
        QUERY_TYPE
    }

    fn query_fields(&self) -> Vec<String> {
        vec!["droidHero".to_string(), "droid".to_string()]
    }

    fn execute(&self, query: &str, variables: Option<&Value>) -> anyhow::Result<ExecutionResult> {
        engine::execute(self, query, variables)
    }
}
