//! Component identity: declared type plus optional name.

use std::any::{TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Compile-time generated identity of a declared component type.
///
/// Equality and hashing use the `TypeId` only. The type name is kept for
/// messages, and the `TypeId` of `Arc<T>` lets the resolver suggest the
/// pointer/value counterpart of a type that was not found.
#[derive(Clone, Copy)]
pub struct TypeTag {
    id: TypeId,
    name: &'static str,
    shared_id: TypeId,
}

impl TypeTag {
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
            shared_id: TypeId::of::<Arc<T>>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether `other` is `Arc<Self>` or `Self` is `Arc<other>`.
    pub fn is_counterpart_of(&self, other: &TypeTag) -> bool {
        self.shared_id == other.id || other.shared_id == self.id
    }
}

impl PartialEq for TypeTag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeTag {}

impl Hash for TypeTag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Registry key: `(type, name)`. An empty name means unnamed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Coordinate {
    ty: TypeTag,
    name: String,
}

impl Coordinate {
    pub fn new(ty: TypeTag, name: impl Into<String>) -> Self {
        Self {
            ty,
            name: name.into(),
        }
    }

    pub fn of<T: 'static>(name: impl Into<String>) -> Self {
        Self::new(TypeTag::of::<T>(), name)
    }

    pub fn type_tag(&self) -> &TypeTag {
        &self.ty
    }

    pub fn type_name(&self) -> &'static str {
        self.ty.name
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_unnamed(&self) -> bool {
        self.name.is_empty()
    }

    /// Same name, with the declared type swapped for its `Arc` counterpart.
    pub fn is_near_miss_of(&self, other: &Coordinate) -> bool {
        self.name == other.name && self.ty.is_counterpart_of(&other.ty)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = if self.name.is_empty() {
            "(Unnamed)"
        } else {
            self.name.as_str()
        };
        write!(f, "({}, {})", self.ty.name, name)
    }
}
