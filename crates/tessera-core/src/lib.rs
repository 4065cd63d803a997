pub mod contract;
pub mod convert;
pub mod database;
pub mod descriptor;
pub mod error;
pub mod ident;
pub mod migration;
pub mod record;
pub mod schema;
pub mod types;
pub mod value;

// Re-export commonly used types
pub use contract::{
    AccessObjectContract, ConflictStrategy, OperationDescriptor, OperationKind, ParamDescriptor,
    ParamType, ReturnShape,
};
pub use convert::{Converter, ConverterRegistry, ConverterScope};
pub use database::{ConverterDeclaration, DatabaseDescriptor};
pub use descriptor::{
    EntityDescriptor, FieldDescriptor, ForeignKeyAction, ForeignKeyDescriptor, IndexDescriptor,
    PrimaryKeyDescriptor,
};
pub use error::{ConversionError, ConverterError, SchemaError};
pub use migration::MigrationStep;
pub use record::Record;
pub use schema::{
    ColumnDefinition, ForeignKeyDefinition, IndexDefinition, PrimaryKeyDefinition, SchemaModel,
    TableDefinition,
};
pub use types::{DomainType, StorageType};
pub use value::{DomainValue, StorageValue};
