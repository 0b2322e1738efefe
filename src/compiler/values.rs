//! Conversions between the in-register form of a value and the encodings
//! shared with the native runtime.
//!
//! - **word**: one `i64`, as stored in vector elements, dict values and the
//!   value half of an `any`. Vectors, dicts and `any` values are boxed into a
//!   runtime cell first.
//! - **wide**: a `WIDE_RETURN_T`, used for two-word returns and for `any`.

use inkwell::{
    types::{BasicType, BasicTypeEnum},
    values::{BasicMetadataValueEnum, BasicValueEnum, IntValue, PointerValue, StructValue},
    AddressSpace, IntPredicate,
};

use crate::{ast::types::TypeId, runtime::RuntimeFunction};

use super::compiler::CodeGenerator;

/// A dynamically typed value: boxed word plus itype.
#[derive(Debug, Clone, Copy)]
pub struct DynValue<'a> {
    pub value: IntValue<'a>,
    pub itype: IntValue<'a>,
}

/// Calls a runtime helper, passing the runtime context first.
pub fn call_runtime<'a>(
    generator: &CodeGenerator<'a, '_>,
    function: RuntimeFunction,
    args: &[BasicMetadataValueEnum<'a>],
) -> Option<BasicValueEnum<'a>> {
    let mut call_args: Vec<BasicMetadataValueEnum<'a>> = vec![generator.runtime_ptr().into()];
    call_args.extend_from_slice(args);

    generator.builder
        .build_call(generator.runtime_function(function), &call_args, "")
        .unwrap()
        .try_as_basic_value()
        .left()
}

/// Like `call_runtime` for helpers that return a value.
pub fn call_runtime_value<'a>(
    generator: &CodeGenerator<'a, '_>,
    function: RuntimeFunction,
    args: &[BasicMetadataValueEnum<'a>],
) -> BasicValueEnum<'a> {
    call_runtime(generator, function, args)
        .unwrap_or_else(|| panic!("Runtime function {} returns void", function.name()))
}

/// Stores a value into a fresh entry-block slot and returns the slot.
pub fn spill_to_stack<'a>(generator: &CodeGenerator<'a, '_>, value: BasicValueEnum<'a>) -> PointerValue<'a> {
    let slot = generator.build_entry_alloca(value.get_type(), "spill");
    generator.builder.build_store(slot, value).unwrap();
    slot
}

pub fn build_wide<'a>(generator: &CodeGenerator<'a, '_>, a: IntValue<'a>, b: IntValue<'a>) -> StructValue<'a> {
    let undef = generator.types.wide_return_type.get_undef();
    let with_a = generator
        .builder
        .build_insert_value(undef, a, 0, "")
        .unwrap()
        .into_struct_value();
    generator.builder
        .build_insert_value(with_a, b, 1, "")
        .unwrap()
        .into_struct_value()
}

pub fn split_wide<'a>(generator: &CodeGenerator<'a, '_>, wide: StructValue<'a>) -> (IntValue<'a>, IntValue<'a>) {
    let a = generator.builder.build_extract_value(wide, 0, "wide_a").unwrap();
    let b = generator.builder.build_extract_value(wide, 1, "wide_b").unwrap();
    (a.into_int_value(), b.into_int_value())
}

/// Reinterprets the bits of a value as another type of the same size.
fn reinterpret<'a>(
    generator: &CodeGenerator<'a, '_>,
    value: BasicValueEnum<'a>,
    target_type: BasicTypeEnum<'a>,
) -> BasicValueEnum<'a> {
    let slot = spill_to_stack(generator, value);
    let cast = generator
        .builder
        .build_bit_cast(slot, target_type.ptr_type(AddressSpace::default()), "")
        .unwrap()
        .into_pointer_value();
    generator.builder.build_load(cast, "").unwrap()
}

/// Word form of a value whose type fits in one word.
///
/// # Panics
///
/// Panics for vectors and `any`, which need two words.
fn narrow_word<'a>(generator: &CodeGenerator<'a, '_>, value: BasicValueEnum<'a>, type_: &TypeId) -> IntValue<'a> {
    let i64_type = generator.context.i64_type();
    match type_ {
        TypeId::Bool => generator
            .builder
            .build_int_z_extend(value.into_int_value(), i64_type, "")
            .unwrap(),
        TypeId::Int | TypeId::Typeid => value.into_int_value(),
        TypeId::Double => generator
            .builder
            .build_bit_cast(value, i64_type, "")
            .unwrap()
            .into_int_value(),
        TypeId::String | TypeId::JsonValue | TypeId::Struct(_) | TypeId::Function(_) => generator
            .builder
            .build_ptr_to_int(value.into_pointer_value(), i64_type, "")
            .unwrap(),
        TypeId::Dict(_) => {
            let body = generator
                .builder
                .build_extract_value(value.into_struct_value(), 0, "dict_body")
                .unwrap();
            generator.builder
                .build_ptr_to_int(body.into_pointer_value(), i64_type, "")
                .unwrap()
        }
        TypeId::Vector(_) | TypeId::Any | TypeId::Undefined | TypeId::Void => {
            panic!("Type {} does not fit in one word", type_)
        }
    }
}

/// Inverse of `narrow_word`.
fn from_narrow_word<'a>(generator: &CodeGenerator<'a, '_>, word: IntValue<'a>, type_: &TypeId) -> BasicValueEnum<'a> {
    match type_ {
        TypeId::Bool => generator
            .builder
            .build_int_compare(IntPredicate::NE, word, word.get_type().const_zero(), "")
            .unwrap()
            .into(),
        TypeId::Int | TypeId::Typeid => word.into(),
        TypeId::Double => generator
            .builder
            .build_bit_cast(word, generator.context.f64_type(), "")
            .unwrap(),
        TypeId::String | TypeId::JsonValue | TypeId::Struct(_) | TypeId::Function(_) => generator
            .builder
            .build_int_to_ptr(word, generator.types.intern_type(type_).into_pointer_type(), "")
            .unwrap()
            .into(),
        TypeId::Dict(_) => {
            let body = generator
                .builder
                .build_int_to_ptr(word, generator.types.runtime_ptr_type(), "")
                .unwrap();
            generator.builder
                .build_insert_value(generator.types.dict_type.get_undef(), body, 0, "")
                .unwrap()
                .into_struct_value()
                .into()
        }
        TypeId::Vector(_) | TypeId::Any | TypeId::Undefined | TypeId::Void => {
            panic!("Type {} does not fit in one word", type_)
        }
    }
}

/// Encodes a value as `WIDE_RETURN_T`.
pub fn encode_to_wide<'a>(
    generator: &CodeGenerator<'a, '_>,
    value: BasicValueEnum<'a>,
    type_: &TypeId,
) -> StructValue<'a> {
    match type_ {
        TypeId::Vector(_) => {
            reinterpret(generator, value, generator.types.wide_return_type.into()).into_struct_value()
        }
        TypeId::Any => value.into_struct_value(),
        _ => {
            let a = narrow_word(generator, value, type_);
            build_wide(generator, a, generator.context.i64_type().const_zero())
        }
    }
}

/// Decodes a `WIDE_RETURN_T` into a value of `type_`.
pub fn decode_from_wide<'a>(
    generator: &CodeGenerator<'a, '_>,
    wide: StructValue<'a>,
    type_: &TypeId,
) -> BasicValueEnum<'a> {
    match type_ {
        TypeId::Vector(_) => reinterpret(generator, wide.into(), generator.types.vec_type.into()),
        TypeId::Any => wide.into(),
        _ => {
            let (a, _) = split_wide(generator, wide);
            from_narrow_word(generator, a, type_)
        }
    }
}

/// Packs a value into one word, boxing vectors, dicts and `any` values into
/// a runtime cell.
pub fn box_word<'a>(generator: &CodeGenerator<'a, '_>, value: BasicValueEnum<'a>, type_: &TypeId) -> IntValue<'a> {
    match type_ {
        TypeId::Vector(_) | TypeId::Dict(_) | TypeId::Any => {
            let (a, b) = split_wide(generator, encode_to_wide(generator, value, type_));
            call_runtime_value(generator, RuntimeFunction::BoxWide, &[a.into(), b.into()])
                .into_int_value()
        }
        _ => narrow_word(generator, value, type_),
    }
}

/// Inverse of `box_word`.
pub fn unbox_word<'a>(generator: &CodeGenerator<'a, '_>, word: IntValue<'a>, type_: &TypeId) -> BasicValueEnum<'a> {
    match type_ {
        TypeId::Vector(_) | TypeId::Dict(_) | TypeId::Any => {
            let cell_type = generator.types.wide_return_type.ptr_type(AddressSpace::default());
            let cell = generator.builder.build_int_to_ptr(word, cell_type, "cell").unwrap();
            let wide = generator.builder.build_load(cell, "").unwrap().into_struct_value();
            decode_from_wide(generator, wide, type_)
        }
        _ => from_narrow_word(generator, word, type_),
    }
}

/// Converts a statically typed value into a dynamic one.
pub fn make_dyn<'a>(generator: &CodeGenerator<'a, '_>, value: BasicValueEnum<'a>, type_: &TypeId) -> DynValue<'a> {
    if type_.is_any() {
        return dyn_from_wide(generator, value.into_struct_value());
    }
    DynValue {
        value: box_word(generator, value, type_),
        itype: generator.itype_constant(type_),
    }
}

pub fn dyn_from_wide<'a>(generator: &CodeGenerator<'a, '_>, wide: StructValue<'a>) -> DynValue<'a> {
    let (value, itype) = split_wide(generator, wide);
    DynValue { value, itype }
}

/// The SSA form of an `any` value.
pub fn dyn_to_wide<'a>(generator: &CodeGenerator<'a, '_>, dyn_value: DynValue<'a>) -> StructValue<'a> {
    build_wide(generator, dyn_value.value, dyn_value.itype)
}

/// Converts a value to `type_`, unboxing it when it is dynamic.
pub fn coerce_value<'a>(
    generator: &CodeGenerator<'a, '_>,
    value: BasicValueEnum<'a>,
    from_type: &TypeId,
    to_type: &TypeId,
) -> BasicValueEnum<'a> {
    if from_type == to_type {
        value
    } else if to_type.is_any() {
        dyn_to_wide(generator, make_dyn(generator, value, from_type)).into()
    } else if from_type.is_any() {
        let dyn_value = dyn_from_wide(generator, value.into_struct_value());
        unbox_word(generator, dyn_value.value, to_type)
    } else {
        panic!("Cannot convert {} to {}", from_type, to_type)
    }
}
