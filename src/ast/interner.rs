//! Type interning.
//!
//! Every type the back end encounters is assigned a compact `IType`. The
//! table is append-only: it is filled while the program tree is built,
//! frozen, and then shared (read-only) by the code generator and the native
//! runtime, which receives itypes as plain 64-bit words from JIT code.

use std::collections::HashMap;

use super::types::{BaseType, TypeId};

/// A packed, interned type id.
///
/// The base kind lives in the top byte and the table index in the low 24
/// bits, so the kind of a runtime value can be read without a table lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IType(u32);

impl IType {
    const INDEX_MASK: u32 = 0x00FF_FFFF;

    pub fn new(base_type: BaseType, index: u32) -> Self {
        assert!(index <= Self::INDEX_MASK, "Type table overflow");
        IType(((base_type as u32) << 24) | index)
    }

    pub fn from_raw(raw: u32) -> Self {
        IType(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn as_u64(self) -> u64 {
        self.0 as u64
    }

    pub fn index(self) -> u32 {
        self.0 & Self::INDEX_MASK
    }

    /// # Panics
    ///
    /// Panics if the top byte is not a valid base kind.
    pub fn base_type(self) -> BaseType {
        BaseType::from_u8((self.0 >> 24) as u8)
            .unwrap_or_else(|| panic!("Corrupt itype {:#x}", self.0))
    }
}

/// Bidirectional table between type descriptors and itypes.
#[derive(Debug, Clone)]
pub struct TypeInterner {
    types: Vec<TypeId>,
    lookup: HashMap<TypeId, IType>,
    frozen: bool,
}

impl Default for TypeInterner {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeInterner {
    /// Creates a table with every scalar type already interned.
    pub fn new() -> Self {
        let mut interner = TypeInterner {
            types: vec![],
            lookup: HashMap::new(),
            frozen: false,
        };

        for scalar in [
            TypeId::Undefined,
            TypeId::Any,
            TypeId::Void,
            TypeId::Bool,
            TypeId::Int,
            TypeId::Double,
            TypeId::String,
            TypeId::JsonValue,
            TypeId::Typeid,
        ] {
            interner.intern(&scalar);
        }

        interner
    }

    /// Interns a type and all types nested inside it.
    ///
    /// # Panics
    ///
    /// Panics if the table is frozen and the type is new.
    pub fn intern(&mut self, type_: &TypeId) -> IType {
        let mut nested = vec![];
        type_.walk(&mut |child| nested.push(child.clone()));

        // Children are interned first so their ids are smaller than the parent's.
        for child in nested.iter().rev() {
            self.intern_single(child);
        }
        self.lookup_itype(type_)
    }

    fn intern_single(&mut self, type_: &TypeId) -> IType {
        if let Some(itype) = self.lookup.get(type_) {
            return *itype;
        }

        if self.frozen {
            panic!("Attempted to intern {} into a frozen type table", type_);
        }

        let itype = IType::new(type_.base_type(), self.types.len() as u32);
        self.types.push(type_.clone());
        self.lookup.insert(type_.clone(), itype);
        itype
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn find_itype(&self, type_: &TypeId) -> Option<IType> {
        self.lookup.get(type_).copied()
    }

    /// # Panics
    ///
    /// Panics if the type was never interned.
    pub fn lookup_itype(&self, type_: &TypeId) -> IType {
        self.find_itype(type_)
            .unwrap_or_else(|| panic!("Type {} was never interned", type_))
    }

    /// # Panics
    ///
    /// Panics if the itype does not belong to this table.
    pub fn lookup_type(&self, itype: IType) -> &TypeId {
        let type_ = self
            .types
            .get(itype.index() as usize)
            .unwrap_or_else(|| panic!("Unknown itype {:#x}", itype.raw()));
        assert_eq!(type_.base_type(), itype.base_type());
        type_
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (IType, &TypeId)> {
        self.types
            .iter()
            .enumerate()
            .map(|(index, type_)| (IType::new(type_.base_type(), index as u32), type_))
    }
}

/// Packs a type into the 64-bit word passed to and from JIT code.
pub fn pack_itype(interner: &TypeInterner, type_: &TypeId) -> u64 {
    interner.lookup_itype(type_).as_u64()
}

/// Inverse of `pack_itype`.
pub fn unpack_itype(interner: &TypeInterner, packed: u64) -> TypeId {
    interner.lookup_type(IType::from_raw(packed as u32)).clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::types::{Member, Purity};

    fn sample_types() -> Vec<TypeId> {
        let point = TypeId::make_struct(vec![
            Member::new("x", TypeId::Double),
            Member::new("label", TypeId::String),
            Member::new("tags", TypeId::make_vector(TypeId::String)),
        ]);

        vec![
            TypeId::Int,
            TypeId::make_vector(TypeId::Int),
            TypeId::make_vector(TypeId::make_vector(TypeId::Double)),
            TypeId::make_dict(TypeId::Bool),
            point.clone(),
            TypeId::make_struct(vec![Member::new("p", point)]),
            TypeId::make_function(TypeId::Any, vec![TypeId::Any, TypeId::Int], Purity::Impure),
        ]
    }

    #[test]
    fn test_itype_round_trip() {
        let mut interner = TypeInterner::new();
        for type_ in sample_types() {
            interner.intern(&type_);
        }
        interner.freeze();

        for (_, type_) in interner.iter() {
            let packed = pack_itype(&interner, type_);
            assert_eq!(&unpack_itype(&interner, packed), type_);
        }
    }

    #[test]
    fn test_structural_dedup() {
        let mut interner = TypeInterner::new();
        let a = interner.intern(&TypeId::make_vector(TypeId::Int));
        let b = interner.intern(&TypeId::make_vector(TypeId::Int));
        assert_eq!(a, b);
        assert_eq!(a.base_type(), BaseType::Vector);
    }

    #[test]
    fn test_children_interned_first() {
        let mut interner = TypeInterner::new();
        let nested = TypeId::make_vector(TypeId::make_dict(TypeId::String));
        let outer = interner.intern(&nested);
        let inner = interner.lookup_itype(nested.vector_element_type());
        assert!(inner.index() < outer.index());
    }

    #[test]
    #[should_panic(expected = "frozen")]
    fn test_frozen_table_rejects_new_types() {
        let mut interner = TypeInterner::new();
        interner.freeze();
        interner.intern(&TypeId::make_vector(TypeId::Bool));
    }
}
