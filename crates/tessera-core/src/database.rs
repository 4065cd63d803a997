//! The root of the descriptor tree.

use serde::{Deserialize, Serialize};

use crate::contract::AccessObjectContract;
use crate::descriptor::EntityDescriptor;
use crate::migration::MigrationStep;
use crate::types::{DomainType, StorageType};

/// Everything the pipeline consumes for one database configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseDescriptor {
    pub name: String,
    /// Declared schema version, supplied by the author.
    pub version: u32,
    pub entities: Vec<EntityDescriptor>,
    #[serde(default)]
    pub contracts: Vec<AccessObjectContract>,
    #[serde(default)]
    pub migrations: Vec<MigrationStep>,
    /// Custom types mapped with the JSON payload converter.
    #[serde(default)]
    pub converters: Vec<ConverterDeclaration>,
}

impl DatabaseDescriptor {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        DatabaseDescriptor {
            name: name.into(),
            version,
            entities: Vec::new(),
            contracts: Vec::new(),
            migrations: Vec::new(),
            converters: Vec::new(),
        }
    }

    pub fn entity(mut self, entity: EntityDescriptor) -> Self {
        self.entities.push(entity);
        self
    }

    pub fn contract(mut self, contract: AccessObjectContract) -> Self {
        self.contracts.push(contract);
        self
    }

    pub fn migration(mut self, step: MigrationStep) -> Self {
        self.migrations.push(step);
        self
    }

    /// Parses a descriptor from its JSON interchange form.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Declares that a custom domain type is stored as `storage_type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConverterDeclaration {
    pub domain_type: DomainType,
    pub storage_type: StorageType,
}
