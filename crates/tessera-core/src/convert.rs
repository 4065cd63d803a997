//! Type conversion registry.
//!
//! [`ConverterRegistry`] maps domain types onto storage types. Resolution is
//! deterministic:
//!
//! 1. explicit converters, narrowest scope first ([`ConverterScope::Entity`] /
//!    [`ConverterScope::Contract`], then [`ConverterScope::Database`]);
//! 2. the native identity mapping for types the store supports directly;
//! 3. otherwise [`ConverterError::Unresolved`].
//!
//! Within one scope a domain type has at most one converter. Re-registering
//! the exact same pair from the same origin replaces the earlier converter;
//! anything else for that domain type is a [`ConverterError::Conflict`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::database::ConverterDeclaration;
use crate::error::{ConversionError, ConverterError};
use crate::types::{DomainType, StorageType};
use crate::value::{DomainValue, StorageValue};

/// Domain-to-storage conversion function.
pub type ToStorageFn = dyn Fn(&DomainValue) -> Result<StorageValue, ConversionError> + Send + Sync;

/// Storage-to-domain conversion function.
pub type FromStorageFn = dyn Fn(&StorageValue) -> Result<DomainValue, ConversionError> + Send + Sync;

const DEFAULT_ORIGIN: &str = "default";
const NATIVE_ORIGIN: &str = "native";

/// A bidirectional conversion between one domain type and one storage type.
///
/// NULL passes through unchanged in both directions; nullability is enforced
/// by the binders and row mappers, not by converters.
#[derive(Clone)]
pub struct Converter {
    domain: DomainType,
    storage: StorageType,
    origin: String,
    to_storage: Arc<ToStorageFn>,
    from_storage: Arc<FromStorageFn>,
}

impl Converter {
    pub fn new<T, F>(domain: DomainType, storage: StorageType, to_storage: T, from_storage: F) -> Self
    where
        T: Fn(&DomainValue) -> Result<StorageValue, ConversionError> + Send + Sync + 'static,
        F: Fn(&StorageValue) -> Result<DomainValue, ConversionError> + Send + Sync + 'static,
    {
        Converter {
            domain,
            storage,
            origin: DEFAULT_ORIGIN.to_string(),
            to_storage: Arc::new(to_storage),
            from_storage: Arc::new(from_storage),
        }
    }

    /// Tags the converter with where it was registered from.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    /// The identity mapping for a natively supported domain type.
    pub fn native(domain: &DomainType) -> Option<Converter> {
        let storage = domain.native_storage()?;
        let to_ty = domain.clone();
        let from_ty = domain.clone();
        Some(
            Converter::new(
                domain.clone(),
                storage,
                move |v| native_to_storage(&to_ty, v),
                move |v| native_from_storage(&from_ty, v),
            )
            .with_origin(NATIVE_ORIGIN),
        )
    }

    /// A converter for custom types whose payload is carried as JSON.
    ///
    /// `INTEGER`/`REAL` store the JSON number, `TEXT` stores the JSON
    /// encoding (so every payload round-trips exactly), `BLOB` stores the
    /// encoded bytes.
    pub fn json(domain: DomainType, storage: StorageType) -> Converter {
        let to_ty = domain.clone();
        let from_ty = domain.clone();
        Converter::new(
            domain,
            storage,
            move |v| json_to_storage(&to_ty, storage, v),
            move |v| json_from_storage(&from_ty, v),
        )
        .with_origin("json")
    }

    pub fn domain(&self) -> &DomainType {
        &self.domain
    }

    pub fn storage(&self) -> StorageType {
        self.storage
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn is_native(&self) -> bool {
        self.origin == NATIVE_ORIGIN
    }

    pub fn to_storage(&self, value: &DomainValue) -> Result<StorageValue, ConversionError> {
        if value.is_null() {
            return Ok(StorageValue::Null);
        }
        (self.to_storage)(value)
    }

    pub fn from_storage(&self, value: &StorageValue) -> Result<DomainValue, ConversionError> {
        if value.is_null() {
            return Ok(DomainValue::Null);
        }
        (self.from_storage)(value)
    }
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Converter")
            .field("domain", &self.domain)
            .field("storage", &self.storage)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

/// Where a converter applies.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConverterScope {
    Database,
    Entity(String),
    Contract(String),
}

impl fmt::Display for ConverterScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConverterScope::Database => f.write_str("database"),
            ConverterScope::Entity(name) => write!(f, "entity '{}'", name),
            ConverterScope::Contract(name) => write!(f, "contract '{}'", name),
        }
    }
}

/// Registry of explicit converters, grouped by scope.
#[derive(Debug, Clone, Default)]
pub struct ConverterRegistry {
    scopes: HashMap<ConverterScope, HashMap<DomainType, Converter>>,
}

impl ConverterRegistry {
    pub fn new() -> Self {
        ConverterRegistry::default()
    }

    /// Registers a database-wide converter from the default origin.
    pub fn register<T, F>(
        &mut self,
        domain: DomainType,
        storage: StorageType,
        to_storage: T,
        from_storage: F,
    ) -> Result<(), ConverterError>
    where
        T: Fn(&DomainValue) -> Result<StorageValue, ConversionError> + Send + Sync + 'static,
        F: Fn(&StorageValue) -> Result<DomainValue, ConversionError> + Send + Sync + 'static,
    {
        self.register_converter(Converter::new(domain, storage, to_storage, from_storage))
    }

    /// Registers a prepared converter in the database scope.
    pub fn register_converter(&mut self, converter: Converter) -> Result<(), ConverterError> {
        self.register_scoped(ConverterScope::Database, converter)
    }

    /// Registers a converter in a specific scope.
    pub fn register_scoped(
        &mut self,
        scope: ConverterScope,
        converter: Converter,
    ) -> Result<(), ConverterError> {
        let scope_name = scope.to_string();
        let entries = self.scopes.entry(scope).or_default();
        if let Some(existing) = entries.get(&converter.domain) {
            if existing.storage != converter.storage || existing.origin != converter.origin {
                return Err(ConverterError::Conflict {
                    domain: converter.domain.clone(),
                    scope: scope_name,
                    storage: converter.storage,
                    origin: converter.origin.clone(),
                    existing_storage: existing.storage,
                    existing_origin: existing.origin.clone(),
                });
            }
        }
        entries.insert(converter.domain.clone(), converter);
        Ok(())
    }

    /// Registers JSON payload converters for descriptor-level declarations.
    pub fn register_declarations(
        &mut self,
        declarations: &[ConverterDeclaration],
    ) -> Result<(), ConverterError> {
        for decl in declarations {
            self.register_converter(Converter::json(decl.domain_type.clone(), decl.storage_type))?;
        }
        Ok(())
    }

    /// Resolves the storage type of `domain` in the database scope.
    pub fn resolve(&self, domain: &DomainType) -> Result<StorageType, ConverterError> {
        self.converter_for(domain, &[]).map(|c| c.storage())
    }

    /// Resolves the converter for `domain`, consulting `scopes` (narrowest
    /// first) before the database scope and the native mapping.
    pub fn converter_for(
        &self,
        domain: &DomainType,
        scopes: &[ConverterScope],
    ) -> Result<Converter, ConverterError> {
        let explicit = scopes
            .iter()
            .chain(std::iter::once(&ConverterScope::Database))
            .find_map(|scope| self.scopes.get(scope).and_then(|m| m.get(domain)));
        if let Some(converter) = explicit {
            return Ok(converter.clone());
        }
        Converter::native(domain).ok_or_else(|| ConverterError::Unresolved {
            domain: domain.clone(),
        })
    }

    /// Number of explicit converters across all scopes.
    pub fn len(&self) -> usize {
        self.scopes.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Native conversions
// ---------------------------------------------------------------------------

fn mismatch_domain(domain: &DomainType, value: &DomainValue) -> ConversionError {
    ConversionError::ValueMismatch {
        expected: domain.to_string(),
        actual: value.kind().to_string(),
    }
}

fn mismatch_storage(domain: &DomainType, value: &StorageValue) -> ConversionError {
    ConversionError::ValueMismatch {
        expected: domain.to_string(),
        actual: value.kind().to_string(),
    }
}

fn check_range(domain: &DomainType, value: i64) -> Result<i64, ConversionError> {
    match domain.integer_range() {
        Some((lo, hi)) if value < lo || value > hi => Err(ConversionError::OutOfRange {
            value,
            target: domain.to_string(),
        }),
        _ => Ok(value),
    }
}

fn native_to_storage(domain: &DomainType, value: &DomainValue) -> Result<StorageValue, ConversionError> {
    match (domain, value) {
        (DomainType::Bool, DomainValue::Bool(b)) => Ok(StorageValue::Integer(i64::from(*b))),
        (DomainType::Bool, DomainValue::Integer(i)) if *i == 0 || *i == 1 => {
            Ok(StorageValue::Integer(*i))
        }
        (d, DomainValue::Integer(i)) if d.is_integer() => check_range(d, *i).map(StorageValue::Integer),
        (DomainType::F32 | DomainType::F64, DomainValue::Real(r)) => Ok(StorageValue::Real(*r)),
        (DomainType::F32 | DomainType::F64, DomainValue::Integer(i)) => {
            Ok(StorageValue::Real(*i as f64))
        }
        (DomainType::String, DomainValue::Text(s)) => Ok(StorageValue::Text(s.clone())),
        (DomainType::Bytes, DomainValue::Bytes(b)) => Ok(StorageValue::Blob(b.clone())),
        (d, v) => Err(mismatch_domain(d, v)),
    }
}

fn native_from_storage(domain: &DomainType, value: &StorageValue) -> Result<DomainValue, ConversionError> {
    match (domain, value) {
        (DomainType::Bool, StorageValue::Integer(i)) => Ok(DomainValue::Bool(*i != 0)),
        (d, StorageValue::Integer(i)) if d.is_integer() => check_range(d, *i).map(DomainValue::Integer),
        (DomainType::F32 | DomainType::F64, StorageValue::Real(r)) => Ok(DomainValue::Real(*r)),
        (DomainType::F32 | DomainType::F64, StorageValue::Integer(i)) => {
            Ok(DomainValue::Real(*i as f64))
        }
        (DomainType::String, StorageValue::Text(s)) => Ok(DomainValue::Text(s.clone())),
        (DomainType::Bytes, StorageValue::Blob(b)) => Ok(DomainValue::Bytes(b.clone())),
        (d, v) => Err(mismatch_storage(d, v)),
    }
}

// ---------------------------------------------------------------------------
// JSON payload conversions
// ---------------------------------------------------------------------------

fn custom_failure(domain: &DomainType, reason: impl fmt::Display) -> ConversionError {
    ConversionError::Custom {
        domain: domain.clone(),
        reason: reason.to_string(),
    }
}

fn json_payload(value: &DomainValue) -> serde_json::Value {
    match value {
        DomainValue::Null => serde_json::Value::Null,
        DomainValue::Bool(b) => serde_json::Value::Bool(*b),
        DomainValue::Integer(i) => serde_json::Value::from(*i),
        DomainValue::Real(r) => serde_json::Value::from(*r),
        DomainValue::Text(s) => serde_json::Value::String(s.clone()),
        DomainValue::Bytes(b) => serde_json::Value::from(b.clone()),
        DomainValue::Custom(json) => json.clone(),
    }
}

fn json_to_storage(
    domain: &DomainType,
    storage: StorageType,
    value: &DomainValue,
) -> Result<StorageValue, ConversionError> {
    let payload = json_payload(value);
    match storage {
        StorageType::Integer => payload
            .as_i64()
            .map(StorageValue::Integer)
            .ok_or_else(|| custom_failure(domain, format!("{} is not an integer", payload))),
        StorageType::Real => payload
            .as_f64()
            .map(StorageValue::Real)
            .ok_or_else(|| custom_failure(domain, format!("{} is not a number", payload))),
        StorageType::Text => serde_json::to_string(&payload)
            .map(StorageValue::Text)
            .map_err(|e| custom_failure(domain, e)),
        StorageType::Blob => serde_json::to_vec(&payload)
            .map(StorageValue::Blob)
            .map_err(|e| custom_failure(domain, e)),
    }
}

fn json_from_storage(domain: &DomainType, value: &StorageValue) -> Result<DomainValue, ConversionError> {
    let payload = match value {
        StorageValue::Null => serde_json::Value::Null,
        StorageValue::Integer(i) => serde_json::Value::from(*i),
        StorageValue::Real(r) => serde_json::Value::from(*r),
        StorageValue::Text(s) => serde_json::from_str(s).map_err(|e| custom_failure(domain, e))?,
        StorageValue::Blob(b) => serde_json::from_slice(b).map_err(|e| custom_failure(domain, e))?,
    };
    Ok(DomainValue::Custom(payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn timestamp() -> DomainType {
        DomainType::Custom("Timestamp".into())
    }

    fn epoch_converter(origin: &str) -> Converter {
        Converter::new(
            timestamp(),
            StorageType::Integer,
            |v| match v {
                DomainValue::Custom(serde_json::Value::Number(n)) => n
                    .as_i64()
                    .map(StorageValue::Integer)
                    .ok_or_else(|| ConversionError::Custom {
                        domain: DomainType::Custom("Timestamp".into()),
                        reason: "not an epoch".into(),
                    }),
                other => Err(ConversionError::ValueMismatch {
                    expected: "Timestamp".into(),
                    actual: other.kind().into(),
                }),
            },
            |v| match v {
                StorageValue::Integer(i) => Ok(DomainValue::Custom((*i).into())),
                other => Err(ConversionError::ValueMismatch {
                    expected: "Timestamp".into(),
                    actual: other.kind().into(),
                }),
            },
        )
        .with_origin(origin)
    }

    #[test]
    fn native_types_resolve_without_registration() {
        let reg = ConverterRegistry::new();
        assert_eq!(reg.resolve(&DomainType::I32).unwrap(), StorageType::Integer);
        assert_eq!(reg.resolve(&DomainType::String).unwrap(), StorageType::Text);
    }

    #[test]
    fn custom_type_without_converter_is_unresolved() {
        let reg = ConverterRegistry::new();
        let err = reg.resolve(&timestamp()).unwrap_err();
        assert_eq!(err, ConverterError::Unresolved { domain: timestamp() });
    }

    #[test]
    fn same_origin_reregistration_replaces() {
        let mut reg = ConverterRegistry::new();
        reg.register_converter(epoch_converter("app")).unwrap();
        reg.register_converter(epoch_converter("app")).unwrap();
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn different_origin_same_pair_conflicts() {
        let mut reg = ConverterRegistry::new();
        reg.register_converter(epoch_converter("app")).unwrap();
        let err = reg.register_converter(epoch_converter("plugin")).unwrap_err();
        assert!(matches!(err, ConverterError::Conflict { .. }));
    }

    #[test]
    fn different_storage_in_same_scope_conflicts() {
        let mut reg = ConverterRegistry::new();
        reg.register_converter(epoch_converter("app")).unwrap();
        let err = reg
            .register_converter(Converter::json(timestamp(), StorageType::Text).with_origin("app"))
            .unwrap_err();
        assert!(matches!(err, ConverterError::Conflict { .. }));
    }

    #[test]
    fn explicit_converter_beats_native_identity() {
        let mut reg = ConverterRegistry::new();
        reg.register_converter(
            Converter::json(DomainType::Bool, StorageType::Text).with_origin("app"),
        )
        .unwrap();
        assert_eq!(reg.resolve(&DomainType::Bool).unwrap(), StorageType::Text);
    }

    #[test]
    fn narrower_scope_wins() {
        let mut reg = ConverterRegistry::new();
        reg.register_converter(epoch_converter("app")).unwrap();
        reg.register_scoped(
            ConverterScope::Entity("Event".into()),
            Converter::json(timestamp(), StorageType::Text),
        )
        .unwrap();
        let scoped = reg
            .converter_for(&timestamp(), &[ConverterScope::Entity("Event".into())])
            .unwrap();
        assert_eq!(scoped.storage(), StorageType::Text);
        let global = reg.converter_for(&timestamp(), &[]).unwrap();
        assert_eq!(global.storage(), StorageType::Integer);
    }

    #[test]
    fn native_integer_range_enforced() {
        let conv = Converter::native(&DomainType::I8).unwrap();
        assert!(conv.to_storage(&DomainValue::Integer(1000)).is_err());
        assert!(conv.from_storage(&StorageValue::Integer(-129)).is_err());
        assert_eq!(
            conv.to_storage(&DomainValue::Integer(-3)).unwrap(),
            StorageValue::Integer(-3)
        );
    }

    #[test]
    fn null_passes_through() {
        let conv = Converter::json(timestamp(), StorageType::Integer);
        assert_eq!(conv.to_storage(&DomainValue::Null).unwrap(), StorageValue::Null);
        assert_eq!(conv.from_storage(&StorageValue::Null).unwrap(), DomainValue::Null);
    }

    proptest! {
        #[test]
        fn registered_converter_round_trips(epoch in any::<i64>()) {
            let conv = epoch_converter("app");
            let original = DomainValue::Custom(epoch.into());
            let stored = conv.to_storage(&original).unwrap();
            prop_assert_eq!(conv.from_storage(&stored).unwrap(), original);
        }

        #[test]
        fn json_text_converter_round_trips(s in ".*", n in any::<i32>()) {
            let conv = Converter::json(DomainType::Custom("Tag".into()), StorageType::Text);
            let original = DomainValue::Custom(serde_json::json!({ "label": s, "n": n }));
            let stored = conv.to_storage(&original).unwrap();
            prop_assert_eq!(conv.from_storage(&stored).unwrap(), original);
        }

        #[test]
        fn native_integers_round_trip(v in any::<i32>()) {
            let conv = Converter::native(&DomainType::I32).unwrap();
            let original = DomainValue::Integer(v as i64);
            let stored = conv.to_storage(&original).unwrap();
            prop_assert_eq!(conv.from_storage(&stored).unwrap(), original);
        }
    }
}
