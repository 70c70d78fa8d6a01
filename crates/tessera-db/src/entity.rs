//! Entity registration and physical name resolution.
//!
//! Entities are described once through an [`EntityBuilder`] and registered in
//! an [`EntityRegistry`]. Resolving a key under a [`NamingConvention`] applies
//! the convention to every name without an explicit override and caches the
//! resulting [`EntityDescriptor`], which is immutable from then on.
//!
//! ```
//! use tessera_db::entity::{Entity, EntityBuilder, EntityRegistry};
//! use tessera_db::value::SqlType;
//! use tessera_core::NamingConvention;
//!
//! struct User;
//!
//! impl Entity for User {
//!     fn entity_name() -> &'static str {
//!         "User"
//!     }
//!
//!     fn describe(builder: EntityBuilder) -> EntityBuilder {
//!         builder
//!             .table("users")
//!             .key("Id").of_type(SqlType::Int)
//!             .column("UserName")
//!     }
//! }
//!
//! let registry = EntityRegistry::new();
//! registry.register::<User>().unwrap();
//! let user = registry.resolve("User", NamingConvention::SnakeCase).unwrap();
//! assert_eq!(user.table, "users");
//! assert_eq!(user.column("UserName").unwrap().physical, "user_name");
//! ```

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tessera_core::{NamingConvention, TesseraError, TesseraResult};

use crate::value::SqlType;

/// Implemented by types that map onto a table.
pub trait Entity {
    /// The logical name used as the registry key and in query trees.
    fn entity_name() -> &'static str;

    /// Declares the table and columns.
    fn describe(builder: EntityBuilder) -> EntityBuilder;
}

/// One resolved column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    /// The member name as written in query trees.
    pub member: String,
    /// The physical column name.
    pub physical: String,
    pub is_key: bool,
    pub is_read_only: bool,
    pub sql_type: Option<SqlType>,
}

/// A resolved entity: physical table name and ordered columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    /// The logical entity name.
    pub name: String,
    /// The physical table name.
    pub table: String,
    /// The convention the descriptor was resolved under.
    pub convention: NamingConvention,
    /// Columns in declaration order.
    pub columns: Vec<ColumnDescriptor>,
}

impl EntityDescriptor {
    /// Looks a column up by member name.
    pub fn column(&self, member: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.member == member)
    }

    /// Looks a column up by member name, failing with `UnknownMember`.
    pub fn require_column(&self, member: &str) -> TesseraResult<&ColumnDescriptor> {
        self.column(member)
            .ok_or_else(|| TesseraError::unknown_member(&self.name, member))
    }

    /// The key columns in declaration order.
    pub fn key_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter().filter(|c| c.is_key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ColumnSpec {
    member: String,
    physical: Option<String>,
    is_key: bool,
    is_read_only: bool,
    sql_type: Option<SqlType>,
}

/// Declares an entity's table and columns.
///
/// `named` and `of_type` apply to the most recently declared column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityBuilder {
    name: String,
    table: Option<String>,
    columns: Vec<ColumnSpec>,
}

impl EntityBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            columns: Vec::new(),
        }
    }

    /// The logical name this builder registers under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Overrides the physical table name. The naming convention is not
    /// applied to an explicit table name.
    #[must_use]
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Declares a plain column.
    #[must_use]
    pub fn column(self, member: impl Into<String>) -> Self {
        self.push(member.into(), false, false)
    }

    /// Declares a key column.
    #[must_use]
    pub fn key(self, member: impl Into<String>) -> Self {
        self.push(member.into(), true, false)
    }

    /// Declares a read-only (computed or database-generated) column.
    #[must_use]
    pub fn read_only(self, member: impl Into<String>) -> Self {
        self.push(member.into(), false, true)
    }

    /// Overrides the physical name of the last declared column.
    #[must_use]
    pub fn named(mut self, physical: impl Into<String>) -> Self {
        if let Some(last) = self.columns.last_mut() {
            last.physical = Some(physical.into());
        }
        self
    }

    /// Sets the static type of the last declared column.
    #[must_use]
    pub fn of_type(mut self, sql_type: SqlType) -> Self {
        if let Some(last) = self.columns.last_mut() {
            last.sql_type = Some(sql_type);
        }
        self
    }

    fn push(mut self, member: String, is_key: bool, is_read_only: bool) -> Self {
        self.columns.push(ColumnSpec {
            member,
            physical: None,
            is_key,
            is_read_only,
            sql_type: None,
        });
        self
    }

    fn validate(&self) -> TesseraResult<()> {
        if self.columns.is_empty() {
            return Err(TesseraError::ConfigurationError(format!(
                "entity '{}' declares no columns",
                self.name
            )));
        }
        for (i, col) in self.columns.iter().enumerate() {
            if self.columns[..i].iter().any(|c| c.member == col.member) {
                return Err(TesseraError::ConfigurationError(format!(
                    "entity '{}' declares member '{}' twice",
                    self.name, col.member
                )));
            }
        }
        Ok(())
    }

    fn resolve(&self, convention: NamingConvention) -> EntityDescriptor {
        EntityDescriptor {
            name: self.name.clone(),
            table: self
                .table
                .clone()
                .unwrap_or_else(|| convention.apply(&self.name)),
            convention,
            columns: self
                .columns
                .iter()
                .map(|spec| ColumnDescriptor {
                    member: spec.member.clone(),
                    physical: spec
                        .physical
                        .clone()
                        .unwrap_or_else(|| convention.apply(&spec.member)),
                    is_key: spec.is_key,
                    is_read_only: spec.is_read_only,
                    sql_type: spec.sql_type.clone(),
                })
                .collect(),
        }
    }
}

/// Registered entity shapes plus the cache of resolved descriptors.
///
/// The registry is an ordinary value: create one per application (or per
/// test) and share it through an `Arc`.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    builders: RwLock<HashMap<String, EntityBuilder>>,
    resolved: RwLock<HashMap<(String, NamingConvention), Arc<EntityDescriptor>>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an [`Entity`] implementation.
    pub fn register<E: Entity>(&self) -> TesseraResult<()> {
        self.register_builder(E::describe(EntityBuilder::new(E::entity_name())))
    }

    /// Registers a hand-built shape. Registering an identical shape again is
    /// a no-op; a different shape under the same name is rejected.
    pub fn register_builder(&self, builder: EntityBuilder) -> TesseraResult<()> {
        builder.validate()?;
        let mut builders = self.builders.write().unwrap_or_else(PoisonError::into_inner);
        match builders.get(&builder.name) {
            Some(existing) if *existing == builder => Ok(()),
            Some(_) => Err(TesseraError::ConfigurationError(format!(
                "entity '{}' is already registered with a different shape",
                builder.name
            ))),
            None => {
                tracing::debug!(entity = %builder.name, columns = builder.columns.len(), "registered entity");
                builders.insert(builder.name.clone(), builder);
                Ok(())
            }
        }
    }

    /// Resolves an entity under a naming convention.
    ///
    /// Descriptors are cached per `(key, convention)`. Two threads racing on
    /// the first resolution may both build a descriptor; only the first one
    /// stored is ever handed out.
    pub fn resolve(
        &self,
        key: &str,
        convention: NamingConvention,
    ) -> TesseraResult<Arc<EntityDescriptor>> {
        let cache_key = (key.to_string(), convention);
        if let Some(hit) = self
            .resolved
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&cache_key)
        {
            return Ok(Arc::clone(hit));
        }

        let descriptor = {
            let builders = self.builders.read().unwrap_or_else(PoisonError::into_inner);
            let builder = builders
                .get(key)
                .ok_or_else(|| TesseraError::UnknownEntity(key.to_string()))?;
            builder.resolve(convention)
        };
        tracing::debug!(entity = key, %convention, table = %descriptor.table, "entity cache miss");

        let mut resolved = self.resolved.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(
            resolved
                .entry(cache_key)
                .or_insert_with(|| Arc::new(descriptor)),
        ))
    }

    /// Resolves a registered [`Entity`] implementation.
    pub fn resolve_entity<E: Entity>(
        &self,
        convention: NamingConvention,
    ) -> TesseraResult<Arc<EntityDescriptor>> {
        self.resolve(E::entity_name(), convention)
    }

    /// Returns `true` if an entity is registered under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.builders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// The number of registered entities.
    pub fn len(&self) -> usize {
        self.builders.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct User;

    impl Entity for User {
        fn entity_name() -> &'static str {
            "User"
        }

        fn describe(builder: EntityBuilder) -> EntityBuilder {
            builder
                .key("Id")
                .of_type(SqlType::Int)
                .column("UserName")
                .column("EMail")
                .named("email_address")
                .read_only("CreatedAt")
        }
    }

    // ── resolution ──────────────────────────────────────────────────

    #[test]
    fn test_resolve_applies_convention_once() {
        let registry = EntityRegistry::new();
        registry.register::<User>().unwrap();

        let snake = registry.resolve("User", NamingConvention::SnakeCase).unwrap();
        assert_eq!(snake.table, "user");
        assert_eq!(snake.column("UserName").unwrap().physical, "user_name");
        assert_eq!(snake.column("EMail").unwrap().physical, "email_address");
        assert_eq!(snake.column("Id").unwrap().sql_type, Some(SqlType::Int));

        let as_is = registry.resolve_entity::<User>(NamingConvention::AsIs).unwrap();
        assert_eq!(as_is.table, "User");
        assert_eq!(as_is.column("UserName").unwrap().physical, "UserName");
    }

    #[test]
    fn test_resolve_is_cached() {
        let registry = EntityRegistry::new();
        registry.register::<User>().unwrap();
        let a = registry.resolve("User", NamingConvention::CamelCase).unwrap();
        let b = registry.resolve("User", NamingConvention::CamelCase).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_resolve_concurrently_stores_once() {
        let registry = Arc::new(EntityRegistry::new());
        registry.register::<User>().unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.resolve("User", NamingConvention::UrlCase).unwrap())
            })
            .collect();
        let first = registry.resolve("User", NamingConvention::UrlCase).unwrap();
        for handle in handles {
            assert!(Arc::ptr_eq(&first, &handle.join().unwrap()));
        }
    }

    #[test]
    fn test_key_columns_and_flags() {
        let registry = EntityRegistry::new();
        registry.register::<User>().unwrap();
        let user = registry.resolve("User", NamingConvention::AsIs).unwrap();
        let keys: Vec<_> = user.key_columns().map(|c| c.member.as_str()).collect();
        assert_eq!(keys, ["Id"]);
        assert!(user.column("CreatedAt").unwrap().is_read_only);
    }

    #[test]
    fn test_unknown_entity_and_member() {
        let registry = EntityRegistry::new();
        assert_eq!(
            registry.resolve("Ghost", NamingConvention::AsIs).unwrap_err().code(),
            "unknown_entity"
        );
        registry.register::<User>().unwrap();
        let user = registry.resolve("User", NamingConvention::AsIs).unwrap();
        let err = user.require_column("Nickname").unwrap_err();
        assert_eq!(err.to_string(), "Unknown member 'Nickname' on entity 'User'");
    }

    // ── registration ────────────────────────────────────────────────

    #[test]
    fn test_register_same_shape_twice_is_noop() {
        let registry = EntityRegistry::new();
        registry.register::<User>().unwrap();
        registry.register::<User>().unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("User"));
    }

    #[test]
    fn test_register_conflicting_shape_fails() {
        let registry = EntityRegistry::new();
        registry.register::<User>().unwrap();
        let err = registry
            .register_builder(EntityBuilder::new("User").key("Id"))
            .unwrap_err();
        assert_eq!(err.code(), "configuration");
    }

    #[test]
    fn test_register_rejects_empty_and_duplicate_members() {
        let registry = EntityRegistry::new();
        assert!(registry.register_builder(EntityBuilder::new("Empty")).is_err());
        assert!(registry
            .register_builder(EntityBuilder::new("Dup").column("A").column("A"))
            .is_err());
        assert!(registry.is_empty());
    }
}
