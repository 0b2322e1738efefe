//! Mapping from Floyd types to LLVM types.
//!
//! This module owns the three named runtime types shared with the native
//! runtime and decides the calling convention of every Floyd function:
//!
//! - `VEC_T`: `{ i64*, i32, i16, i16 }`, vectors by value
//! - `DICT_T`: `{ i8* }`, dictionaries by value
//! - `WIDE_RETURN_T`: `{ i64, i64 }`, two-word returns and `any` values

use inkwell::{
    context::Context,
    types::{BasicMetadataTypeEnum, BasicType, BasicTypeEnum, FunctionType, PointerType, StructType},
    AddressSpace,
};

use crate::ast::types::{StructDefinition, TypeId};

/// What an LLVM argument carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgRole {
    /// Hidden first argument pointing at the runtime context.
    RuntimePtr,
    /// A concretely typed Floyd argument.
    Simple,
    /// Boxed value word of an `any` argument.
    DynValue,
    /// Itype of an `any` argument. Always follows its `DynValue`.
    DynType,
}

#[derive(Debug, Clone)]
pub struct MappedArg<'a> {
    pub llvm_type: BasicTypeEnum<'a>,
    pub role: ArgRole,
    /// Index of the Floyd argument this LLVM argument belongs to.
    pub floyd_arg_index: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct FunctionArgMapping<'a> {
    /// `None` for void functions.
    pub return_type: Option<BasicTypeEnum<'a>>,
    pub floyd_return_type: TypeId,
    pub args: Vec<MappedArg<'a>>,
}

/// Values of these types are returned as `WIDE_RETURN_T`.
pub fn is_wide_return_type(type_: &TypeId) -> bool {
    matches!(
        type_,
        TypeId::Any | TypeId::Vector(_) | TypeId::Dict(_) | TypeId::Struct(_)
    )
}

/// Named types live in the context, so a second program generated with the
/// same context reuses them instead of getting `VEC_T.0`.
fn named_struct_type<'a>(context: &'a Context, name: &str, fields: &[BasicTypeEnum<'a>]) -> StructType<'a> {
    if let Some(existing) = context.get_struct_type(name) {
        return existing;
    }
    let struct_type = context.opaque_struct_type(name);
    struct_type.set_body(fields, false);
    struct_type
}

#[derive(Debug, Clone, Copy)]
pub struct TypeMapper<'a> {
    pub context: &'a Context,
    pub vec_type: StructType<'a>,
    pub dict_type: StructType<'a>,
    pub wide_return_type: StructType<'a>,
}

impl<'a> TypeMapper<'a> {
    pub fn new(context: &'a Context) -> Self {
        let i64_ptr = context.i64_type().ptr_type(AddressSpace::default());
        let i8_ptr = context.i8_type().ptr_type(AddressSpace::default());

        let vec_type = named_struct_type(
            context,
            "VEC_T",
            &[
                i64_ptr.into(),
                context.i32_type().into(),
                context.i16_type().into(),
                context.i16_type().into(),
            ],
        );
        let dict_type = named_struct_type(context, "DICT_T", &[i8_ptr.into()]);
        let wide_return_type = named_struct_type(
            context,
            "WIDE_RETURN_T",
            &[context.i64_type().into(), context.i64_type().into()],
        );

        TypeMapper {
            context,
            vec_type,
            dict_type,
            wide_return_type,
        }
    }

    pub fn runtime_ptr_type(&self) -> PointerType<'a> {
        self.context.i8_type().ptr_type(AddressSpace::default())
    }

    pub fn string_type(&self) -> PointerType<'a> {
        self.context.i8_type().ptr_type(AddressSpace::default())
    }

    pub fn json_type(&self) -> PointerType<'a> {
        self.context.i16_type().ptr_type(AddressSpace::default())
    }

    /// The LLVM layout of a struct's members, in declaration order.
    pub fn intern_struct_type(&self, definition: &StructDefinition) -> StructType<'a> {
        let members = definition
            .members
            .iter()
            .map(|member| self.intern_type(&member.member_type))
            .collect::<Vec<BasicTypeEnum<'a>>>();
        self.context.struct_type(&members, false)
    }

    /// Converts a Floyd value type to its LLVM type.
    ///
    /// # Panics
    ///
    /// Panics on `undefined` and `void`, which have no value representation.
    pub fn intern_type(&self, type_: &TypeId) -> BasicTypeEnum<'a> {
        match type_ {
            TypeId::Undefined | TypeId::Void => {
                panic!("Type {} has no LLVM value type", type_)
            }
            TypeId::Bool => self.context.bool_type().into(),
            TypeId::Int | TypeId::Typeid => self.context.i64_type().into(),
            TypeId::Double => self.context.f64_type().into(),
            TypeId::String => self.string_type().into(),
            TypeId::JsonValue => self.json_type().into(),
            TypeId::Vector(_) => self.vec_type.into(),
            TypeId::Dict(_) => self.dict_type.into(),
            TypeId::Any => self.wide_return_type.into(),
            TypeId::Struct(definition) => self
                .intern_struct_type(definition)
                .ptr_type(AddressSpace::default())
                .into(),
            TypeId::Function(_) => self
                .function_type(type_)
                .ptr_type(AddressSpace::default())
                .into(),
        }
    }

    /// Decides the LLVM signature of a Floyd function type.
    pub fn map_function_arguments(&self, function_type: &TypeId) -> FunctionArgMapping<'a> {
        let signature = function_type.function_signature();
        let i64_type: BasicTypeEnum<'a> = self.context.i64_type().into();

        let mut args = vec![MappedArg {
            llvm_type: self.runtime_ptr_type().into(),
            role: ArgRole::RuntimePtr,
            floyd_arg_index: None,
        }];

        for (index, arg_type) in signature.args.iter().enumerate() {
            if arg_type.is_any() {
                args.push(MappedArg {
                    llvm_type: i64_type,
                    role: ArgRole::DynValue,
                    floyd_arg_index: Some(index),
                });
                args.push(MappedArg {
                    llvm_type: i64_type,
                    role: ArgRole::DynType,
                    floyd_arg_index: Some(index),
                });
            } else {
                args.push(MappedArg {
                    llvm_type: self.intern_type(arg_type),
                    role: ArgRole::Simple,
                    floyd_arg_index: Some(index),
                });
            }
        }

        let return_type = signature.return_type.as_ref();
        let llvm_return_type = if return_type.is_void() {
            None
        } else if is_wide_return_type(return_type) {
            Some(self.wide_return_type.into())
        } else {
            Some(self.intern_type(return_type))
        };

        FunctionArgMapping {
            return_type: llvm_return_type,
            floyd_return_type: return_type.clone(),
            args,
        }
    }

    pub fn function_type(&self, function_type: &TypeId) -> FunctionType<'a> {
        self.mapping_to_function_type(&self.map_function_arguments(function_type))
    }

    pub fn mapping_to_function_type(&self, mapping: &FunctionArgMapping<'a>) -> FunctionType<'a> {
        let params = mapping
            .args
            .iter()
            .map(|arg| arg.llvm_type.into())
            .collect::<Vec<BasicMetadataTypeEnum<'a>>>();

        match mapping.return_type {
            Some(return_type) => return_type.fn_type(&params, false),
            None => self.context.void_type().fn_type(&params, false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::types::{Member, Purity};

    #[test]
    fn test_scalar_types() {
        let context = Context::create();
        let types = TypeMapper::new(&context);

        assert_eq!(types.intern_type(&TypeId::Bool), context.bool_type().into());
        assert_eq!(types.intern_type(&TypeId::Int), context.i64_type().into());
        assert_eq!(types.intern_type(&TypeId::Typeid), context.i64_type().into());
        assert_eq!(types.intern_type(&TypeId::Double), context.f64_type().into());
        assert_eq!(types.intern_type(&TypeId::String), types.string_type().into());
        assert_eq!(types.intern_type(&TypeId::JsonValue), types.json_type().into());
    }

    #[test]
    fn test_collection_types_are_named() {
        let context = Context::create();
        let types = TypeMapper::new(&context);

        let vector = types.intern_type(&TypeId::make_vector(TypeId::Int));
        assert_eq!(vector.into_struct_type().get_name().unwrap().to_str(), Ok("VEC_T"));
        let dict = types.intern_type(&TypeId::make_dict(TypeId::Int));
        assert_eq!(dict.into_struct_type().get_name().unwrap().to_str(), Ok("DICT_T"));
        let any = types.intern_type(&TypeId::Any);
        assert_eq!(any.into_struct_type().count_fields(), 2);
    }

    #[test]
    fn test_second_mapper_reuses_named_types() {
        let context = Context::create();
        let first = TypeMapper::new(&context);
        let second = TypeMapper::new(&context);

        assert_eq!(first.vec_type, second.vec_type);
        assert_eq!(first.dict_type, second.dict_type);
        assert_eq!(first.wide_return_type, second.wide_return_type);
        assert!(context.get_struct_type("VEC_T.0").is_none());
    }

    #[test]
    fn test_struct_is_pointer_in_member_order() {
        let context = Context::create();
        let types = TypeMapper::new(&context);
        let point = TypeId::make_struct(vec![
            Member::new("flag", TypeId::Bool),
            Member::new("x", TypeId::Double),
        ]);

        let llvm_type = types.intern_type(&point).into_pointer_type();
        let struct_type = llvm_type.get_element_type().into_struct_type();
        assert_eq!(
            struct_type.get_field_types(),
            vec![context.bool_type().into(), context.f64_type().into()]
        );
    }

    #[test]
    fn test_any_argument_takes_two_llvm_params() {
        let context = Context::create();
        let types = TypeMapper::new(&context);
        let function_type = TypeId::make_function(
            TypeId::Int,
            vec![TypeId::Double, TypeId::Any],
            Purity::Pure,
        );

        let mapping = types.map_function_arguments(&function_type);
        let roles = mapping.args.iter().map(|arg| arg.role).collect::<Vec<ArgRole>>();
        assert_eq!(
            roles,
            vec![
                ArgRole::RuntimePtr,
                ArgRole::Simple,
                ArgRole::DynValue,
                ArgRole::DynType
            ]
        );
        assert_eq!(mapping.args[2].floyd_arg_index, Some(1));
        assert_eq!(mapping.args[3].floyd_arg_index, Some(1));
        assert_eq!(mapping.return_type, Some(context.i64_type().into()));
    }

    #[test]
    fn test_wide_and_void_returns() {
        let context = Context::create();
        let types = TypeMapper::new(&context);

        for return_type in [
            TypeId::Any,
            TypeId::make_vector(TypeId::Int),
            TypeId::make_dict(TypeId::String),
            TypeId::make_struct(vec![Member::new("x", TypeId::Int)]),
        ] {
            let function_type = TypeId::make_function(return_type, vec![], Purity::Pure);
            let mapping = types.map_function_arguments(&function_type);
            assert_eq!(mapping.return_type, Some(types.wide_return_type.into()));
        }

        let void_function = TypeId::make_function(TypeId::Void, vec![], Purity::Impure);
        let mapping = types.map_function_arguments(&void_function);
        assert_eq!(mapping.return_type, None);
        assert!(types.function_type(&void_function).get_return_type().is_none());
    }
}
