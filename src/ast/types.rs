//! Type descriptors for the typed program tree.
//!
//! This module defines the closed set of Floyd types the back end consumes:
//!
//! - Scalar types (bool, int, double, string, typeid)
//! - Dynamic types (`any`, `json`)
//! - Composite types (structs, vectors, dictionaries, functions)
//!
//! Types are immutable once constructed and compare structurally, so two
//! separately built `[int]` descriptors are the same type.

use std::fmt::Display;

/// The base kind of a type, without its children.
///
/// The discriminant is stored in the top byte of a packed `IType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum BaseType {
    Undefined = 0,
    Any = 1,
    Void = 2,
    Bool = 3,
    Int = 4,
    Double = 5,
    String = 6,
    JsonValue = 7,
    Typeid = 8,
    Struct = 9,
    Vector = 10,
    Dict = 11,
    Function = 12,
}

impl BaseType {
    pub fn from_u8(value: u8) -> Option<BaseType> {
        let base = match value {
            0 => BaseType::Undefined,
            1 => BaseType::Any,
            2 => BaseType::Void,
            3 => BaseType::Bool,
            4 => BaseType::Int,
            5 => BaseType::Double,
            6 => BaseType::String,
            7 => BaseType::JsonValue,
            8 => BaseType::Typeid,
            9 => BaseType::Struct,
            10 => BaseType::Vector,
            11 => BaseType::Dict,
            12 => BaseType::Function,
            _ => return None,
        };
        Some(base)
    }
}

/// Whether a function may have side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Purity {
    Pure,
    Impure,
}

/// A named, typed struct member.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Member {
    pub name: String,
    pub member_type: TypeId,
}

impl Member {
    pub fn new(name: &str, member_type: TypeId) -> Self {
        Member {
            name: name.to_string(),
            member_type,
        }
    }
}

/// Struct layout in declaration order. Member order is never changed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructDefinition {
    pub members: Vec<Member>,
}

impl StructDefinition {
    /// Returns the declaration index of a member.
    pub fn find_member_index(&self, name: &str) -> Option<usize> {
        self.members.iter().position(|member| member.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionSignature {
    pub return_type: Box<TypeId>,
    pub args: Vec<TypeId>,
    pub purity: Purity,
}

/// A Floyd type descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeId {
    Undefined,
    Any,
    Void,
    Bool,
    Int,
    Double,
    String,
    JsonValue,
    Typeid,
    Struct(StructDefinition),
    Vector(Box<TypeId>),
    Dict(Box<TypeId>),
    Function(FunctionSignature),
}

impl TypeId {
    pub fn make_vector(element_type: TypeId) -> Self {
        TypeId::Vector(Box::new(element_type))
    }

    pub fn make_dict(value_type: TypeId) -> Self {
        TypeId::Dict(Box::new(value_type))
    }

    pub fn make_struct(members: Vec<Member>) -> Self {
        TypeId::Struct(StructDefinition { members })
    }

    pub fn make_function(return_type: TypeId, args: Vec<TypeId>, purity: Purity) -> Self {
        TypeId::Function(FunctionSignature {
            return_type: Box::new(return_type),
            args,
            purity,
        })
    }

    pub fn base_type(&self) -> BaseType {
        match self {
            TypeId::Undefined => BaseType::Undefined,
            TypeId::Any => BaseType::Any,
            TypeId::Void => BaseType::Void,
            TypeId::Bool => BaseType::Bool,
            TypeId::Int => BaseType::Int,
            TypeId::Double => BaseType::Double,
            TypeId::String => BaseType::String,
            TypeId::JsonValue => BaseType::JsonValue,
            TypeId::Typeid => BaseType::Typeid,
            TypeId::Struct(_) => BaseType::Struct,
            TypeId::Vector(_) => BaseType::Vector,
            TypeId::Dict(_) => BaseType::Dict,
            TypeId::Function(_) => BaseType::Function,
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, TypeId::Any)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, TypeId::Void)
    }

    /// Returns the element type of a vector.
    ///
    /// # Panics
    ///
    /// Panics if the type is not a vector.
    pub fn vector_element_type(&self) -> &TypeId {
        match self {
            TypeId::Vector(element_type) => element_type,
            _ => panic!("Expected vector type, found {}", self),
        }
    }

    /// Returns the value type of a dictionary.
    ///
    /// # Panics
    ///
    /// Panics if the type is not a dictionary.
    pub fn dict_value_type(&self) -> &TypeId {
        match self {
            TypeId::Dict(value_type) => value_type,
            _ => panic!("Expected dict type, found {}", self),
        }
    }

    /// # Panics
    ///
    /// Panics if the type is not a struct.
    pub fn struct_definition(&self) -> &StructDefinition {
        match self {
            TypeId::Struct(definition) => definition,
            _ => panic!("Expected struct type, found {}", self),
        }
    }

    /// # Panics
    ///
    /// Panics if the type is not a function.
    pub fn function_signature(&self) -> &FunctionSignature {
        match self {
            TypeId::Function(signature) => signature,
            _ => panic!("Expected function type, found {}", self),
        }
    }

    /// Visits this type and every type nested inside it, parents first.
    pub fn walk<F: FnMut(&TypeId)>(&self, visit: &mut F) {
        visit(self);
        match self {
            TypeId::Struct(definition) => {
                for member in definition.members.iter() {
                    member.member_type.walk(visit);
                }
            }
            TypeId::Vector(element_type) => element_type.walk(visit),
            TypeId::Dict(value_type) => value_type.walk(visit),
            TypeId::Function(signature) => {
                signature.return_type.walk(visit);
                for arg in signature.args.iter() {
                    arg.walk(visit);
                }
            }
            TypeId::Undefined
            | TypeId::Any
            | TypeId::Void
            | TypeId::Bool
            | TypeId::Int
            | TypeId::Double
            | TypeId::String
            | TypeId::JsonValue
            | TypeId::Typeid => {}
        }
    }
}

impl Display for TypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeId::Undefined => write!(f, "undef"),
            TypeId::Any => write!(f, "any"),
            TypeId::Void => write!(f, "void"),
            TypeId::Bool => write!(f, "bool"),
            TypeId::Int => write!(f, "int"),
            TypeId::Double => write!(f, "double"),
            TypeId::String => write!(f, "string"),
            TypeId::JsonValue => write!(f, "json"),
            TypeId::Typeid => write!(f, "typeid"),
            TypeId::Struct(definition) => {
                write!(f, "struct {{")?;
                for member in definition.members.iter() {
                    write!(f, "{} {};", member.member_type, member.name)?;
                }
                write!(f, "}}")
            }
            TypeId::Vector(element_type) => write!(f, "[{}]", element_type),
            TypeId::Dict(value_type) => write!(f, "[string:{}]", value_type),
            TypeId::Function(signature) => {
                let args = signature
                    .args
                    .iter()
                    .map(|arg| arg.to_string())
                    .collect::<Vec<String>>()
                    .join(",");
                let purity = match signature.purity {
                    Purity::Pure => "",
                    Purity::Impure => " impure",
                };
                write!(f, "func {}({}){}", signature.return_type, args, purity)
            }
        }
    }
}

