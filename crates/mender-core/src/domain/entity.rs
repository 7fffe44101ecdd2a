//! Entities and the static entity registry.
//!
//! The registry is loaded once per run from a TOML file:
//!
//! ```toml
//! [classes]
//! bank = ["extract", "report"]
//! holding = ["report"]
//!
//! [entities.JPM]
//! id = "852218"
//! name = "JPMorgan Chase Bank"
//! class = "bank"
//! ```
//!
//! Without a `[classes]` table every task type applies to every entity.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::ids::EntityId;
use super::task_type::TaskType;

/// An identified subject of processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entity {
    pub id: EntityId,

    /// Human-readable registry key (e.g. a ticker).
    pub code: String,

    pub name: String,

    /// Classification tag, selects the applicable task types.
    pub class: String,

    /// Task types that apply to this entity, in declared order.
    pub task_types: Vec<TaskType>,
}

impl Entity {
    pub fn applies(&self, task_type: TaskType) -> bool {
        self.task_types.contains(&task_type)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("cannot read entity registry {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("entity registry is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("entity {code} has unknown class {class:?}")]
    UnknownClass { code: String, class: String },

    #[error("class {class:?} lists unknown task type {task_type:?}")]
    UnknownTaskType { class: String, task_type: String },

    #[error("entity id {id} is registered twice ({first} and {second})")]
    DuplicateId {
        id: EntityId,
        first: String,
        second: String,
    },

    #[error("entity code {code} is registered twice (ids {first_id} and {second_id}); codes are case-insensitive")]
    DuplicateCode {
        code: String,
        first_id: EntityId,
        second_id: EntityId,
    },
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    classes: Option<BTreeMap<String, Vec<String>>>,
    #[serde(default)]
    entities: BTreeMap<String, EntityEntry>,
}

#[derive(Debug, Deserialize)]
struct EntityEntry {
    id: String,
    name: String,
    #[serde(default = "default_class")]
    class: String,
}

fn default_class() -> String {
    "default".to_string()
}

/// Immutable lookup tables built once per run.
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    by_id: BTreeMap<EntityId, Entity>,
    code_to_id: HashMap<String, EntityId>,
}

impl EntityRegistry {
    pub fn from_entities(entities: impl IntoIterator<Item = Entity>) -> Result<Self, RegistryError> {
        let mut registry = Self::default();
        for entity in entities {
            if let Some(existing) = registry.by_id.get(&entity.id) {
                return Err(RegistryError::DuplicateId {
                    id: entity.id.clone(),
                    first: existing.code.clone(),
                    second: entity.code,
                });
            }
            let code = entity.code.to_ascii_uppercase();
            if let Some(first_id) = registry.code_to_id.get(&code) {
                return Err(RegistryError::DuplicateCode {
                    code,
                    first_id: first_id.clone(),
                    second_id: entity.id,
                });
            }
            registry.code_to_id.insert(code, entity.id.clone());
            registry.by_id.insert(entity.id.clone(), entity);
        }
        Ok(registry)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, RegistryError> {
        let file: RegistryFile = toml::from_str(s)?;

        let classes = match file.classes {
            Some(classes) => {
                let mut resolved = HashMap::with_capacity(classes.len());
                for (class, names) in classes {
                    let mut types = Vec::with_capacity(names.len());
                    for name in names {
                        let t = name.parse::<TaskType>().map_err(|_| {
                            RegistryError::UnknownTaskType {
                                class: class.clone(),
                                task_type: name.clone(),
                            }
                        })?;
                        types.push(t);
                    }
                    types.sort();
                    types.dedup();
                    resolved.insert(class, types);
                }
                Some(resolved)
            }
            None => None,
        };

        let mut entities = Vec::with_capacity(file.entities.len());
        for (code, entry) in file.entities {
            let task_types = match &classes {
                None => TaskType::ALL.to_vec(),
                Some(classes) => classes.get(&entry.class).cloned().ok_or_else(|| {
                    RegistryError::UnknownClass {
                        code: code.clone(),
                        class: entry.class.clone(),
                    }
                })?,
            };
            entities.push(Entity {
                id: EntityId::new(entry.id),
                code,
                name: entry.name,
                class: entry.class,
                task_types,
            });
        }

        Self::from_entities(entities)
    }

    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let contents = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn get(&self, id: &EntityId) -> Option<&Entity> {
        self.by_id.get(id)
    }

    /// Case-insensitive lookup by human-readable code.
    pub fn by_code(&self, code: &str) -> Option<&Entity> {
        self.code_to_id
            .get(&code.to_ascii_uppercase())
            .and_then(|id| self.by_id.get(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.by_id.values()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [classes]
        bank = ["extract", "report"]
        holding = ["report"]

        [entities.JPM]
        id = "852218"
        name = "JPMorgan Chase Bank"
        class = "bank"

        [entities.bac]
        id = "480228"
        name = "Bank of America"
        class = "bank"

        [entities.GS]
        id = "2182786"
        name = "Goldman Sachs Group"
        class = "holding"
    "#;

    #[test]
    fn loads_entities_with_class_task_types() {
        let reg = EntityRegistry::from_toml_str(SAMPLE).unwrap();
        assert_eq!(reg.len(), 3);

        let jpm = reg.get(&EntityId::from("852218")).unwrap();
        assert_eq!(jpm.code, "JPM");
        assert_eq!(jpm.task_types, vec![TaskType::Extract, TaskType::Report]);

        let gs = reg.by_code("gs").unwrap();
        assert!(!gs.applies(TaskType::Extract));
        assert!(gs.applies(TaskType::Report));
    }

    #[test]
    fn lookup_by_code_ignores_case() {
        let reg = EntityRegistry::from_toml_str(SAMPLE).unwrap();
        assert_eq!(reg.by_code("BAC").unwrap().id, EntityId::from("480228"));
        assert!(reg.by_code("WFC").is_none());
    }

    #[test]
    fn missing_classes_table_means_all_task_types() {
        let reg = EntityRegistry::from_toml_str(
            r#"
            [entities.X]
            id = "1"
            name = "X Bank"
            "#,
        )
        .unwrap();
        let x = reg.by_code("X").unwrap();
        assert_eq!(x.class, "default");
        assert_eq!(x.task_types, TaskType::ALL.to_vec());
    }

    #[test]
    fn unknown_class_is_an_error() {
        let err = EntityRegistry::from_toml_str(
            r#"
            [classes]
            bank = ["extract"]

            [entities.X]
            id = "1"
            name = "X"
            class = "insurer"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, RegistryError::UnknownClass { ref class, .. } if class == "insurer"));
    }

    #[test]
    fn unknown_task_type_is_an_error() {
        let err = EntityRegistry::from_toml_str(
            r#"
            [classes]
            bank = ["extract", "forecast"]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, RegistryError::UnknownTaskType { .. }));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = EntityRegistry::from_toml_str(
            r#"
            [entities.A]
            id = "1"
            name = "A"

            [entities.B]
            id = "1"
            name = "B"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateId { .. }));
    }

    #[test]
    fn codes_differing_only_in_case_are_rejected() {
        let err = EntityRegistry::from_toml_str(
            r#"
            [entities.JPM]
            id = "1"
            name = "upper"

            [entities.jpm]
            id = "2"
            name = "lower"
            "#,
        )
        .unwrap_err();
        match err {
            RegistryError::DuplicateCode {
                code,
                first_id,
                second_id,
            } => {
                assert_eq!(code, "JPM");
                assert_eq!(first_id, EntityId::from("1"));
                assert_eq!(second_id, EntityId::from("2"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let err = EntityRegistry::from_toml_str("entities = [").unwrap_err();
        assert!(matches!(err, RegistryError::Parse(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = EntityRegistry::load(Path::new("/nonexistent/entities.toml")).unwrap_err();
        assert!(matches!(err, RegistryError::Io { .. }));
    }
}
