//! Host corelib.
//!
//! Native implementations of the Floyd functions declared as host functions.
//! Each takes the runtime context first, then its arguments in the JIT calling
//! convention: an `any` argument arrives as (boxed word, itype).

#![allow(clippy::not_unsafe_ptr_arg_deref)]

use std::os::raw::c_char;

use serde_json::Value as JsonValue;
use tracing::debug;

use crate::ast::{
    ast::FunctionDefinition,
    types::{Purity, TypeId},
};

use super::{
    runtime_from_ptr,
    values::{
        json_ref, read_c_string, value_to_string, wide_to_word, word_to_wide, DictT, VecT,
        WideReturn,
    },
    FloydRuntime,
};

/// Floyd declarations of every host function this module implements.
pub fn corelib_function_defs() -> Vec<FunctionDefinition> {
    vec![
        FunctionDefinition::host(
            "print",
            TypeId::make_function(TypeId::Void, vec![TypeId::Any], Purity::Impure),
        ),
        FunctionDefinition::host(
            "assert",
            TypeId::make_function(TypeId::Void, vec![TypeId::Bool], Purity::Impure),
        ),
        FunctionDefinition::host(
            "size",
            TypeId::make_function(TypeId::Int, vec![TypeId::Any], Purity::Pure),
        ),
        FunctionDefinition::host(
            "push_back",
            TypeId::make_function(TypeId::Any, vec![TypeId::Any, TypeId::Any], Purity::Pure),
        ),
        FunctionDefinition::host(
            "to_string",
            TypeId::make_function(TypeId::String, vec![TypeId::Any], Purity::Pure),
        ),
    ]
}

pub extern "C" fn floyd_print(frp: *mut FloydRuntime, value: u64, itype: u64) {
    let runtime = unsafe { runtime_from_ptr(frp) };
    let type_ = runtime.lookup_type(itype);
    let line = value_to_string(runtime, &type_, word_to_wide(&type_, value));

    println!("{}", line);
    runtime.print_output.push(line);
}

pub extern "C" fn floyd_assert(frp: *mut FloydRuntime, value: u8) {
    let runtime = unsafe { runtime_from_ptr(frp) };
    if value & 1 == 0 {
        runtime.record_error(String::from("Assertion failed"));
    }
}

pub extern "C" fn floyd_size(frp: *mut FloydRuntime, value: u64, itype: u64) -> i64 {
    let runtime = unsafe { runtime_from_ptr(frp) };
    let type_ = runtime.lookup_type(itype);
    let wide = word_to_wide(&type_, value);

    match &type_ {
        TypeId::String => read_c_string(wide.a as *const c_char).len() as i64,
        TypeId::Vector(_) => VecT::from_wide(wide).element_count as i64,
        TypeId::Dict(_) => DictT::from_wide(wide).body().map.len() as i64,
        TypeId::JsonValue => match json_ref(wide.a) {
            JsonValue::Array(array) => array.len() as i64,
            JsonValue::Object(object) => object.len() as i64,
            JsonValue::String(string) => string.len() as i64,
            other => {
                runtime.record_error(format!("Cannot take size of json value {}", other));
                0
            }
        },
        _ => {
            runtime.record_error(format!("Cannot take size of {}", type_));
            0
        }
    }
}

/// Appends `element` to a vector (or a character code to a string) and
/// returns the new collection as an `any`.
pub extern "C" fn floyd_push_back(
    frp: *mut FloydRuntime,
    value: u64,
    itype: u64,
    element: u64,
    element_itype: u64,
) -> WideReturn {
    let runtime = unsafe { runtime_from_ptr(frp) };
    let type_ = runtime.lookup_type(itype);
    if runtime.trace {
        debug!(type_ = %type_, "push_back");
    }

    match &type_ {
        TypeId::Vector(element_type) => {
            let vector = VecT::from_wide(word_to_wide(&type_, value));
            let element_word = if element_type.is_any() {
                runtime.heap.alloc_cell(WideReturn::new(element, element_itype)) as u64
            } else {
                element
            };

            let mut elements = vector.elements().to_vec();
            elements.push(element_word);
            let result = runtime.heap.alloc_vector(&elements).to_wide();
            WideReturn::new(wide_to_word(runtime, &type_, result), itype)
        }
        TypeId::String => {
            let mut bytes = read_c_string(value as *const c_char).to_vec();
            bytes.push(element as u8);
            WideReturn::new(runtime.heap.alloc_string(&bytes) as u64, itype)
        }
        _ => {
            runtime.record_error(format!("Cannot push_back to {}", type_));
            WideReturn::new(value, itype)
        }
    }
}

pub extern "C" fn floyd_to_string(frp: *mut FloydRuntime, value: u64, itype: u64) -> *const c_char {
    let runtime = unsafe { runtime_from_ptr(frp) };
    let type_ = runtime.lookup_type(itype);
    let text = value_to_string(runtime, &type_, word_to_wide(&type_, value));
    runtime.alloc_string_value(&text)
}
