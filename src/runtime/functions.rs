//! Runtime helper functions called from generated code.
//!
//! Every helper takes the runtime context as its first argument. Vectors and
//! dicts arrive by pointer to their `VEC_T`/`DICT_T`; vector and dict results
//! are returned as `WideReturn`. Helpers never unwind into JIT frames: user
//! errors are recorded on the runtime and a neutral value is returned.
//!
//! Pointers are produced by generated code and are always valid, so these
//! entry points are not marked `unsafe`.

#![allow(clippy::not_unsafe_ptr_arg_deref)]

use std::{cmp::Ordering, os::raw::c_char};

use serde_json::Value as JsonValue;
use tracing::debug;

use crate::ast::expressions::ComparisonOp;

use super::{
    runtime_from_ptr,
    values::{
        compare_values, default_word, json_ref, read_c_string, value_to_json, DictBody, DictT,
        VecT, WideReturn,
    },
    FloydRuntime,
};

fn comparison_result(op_code: i64, ordering: Ordering) -> i32 {
    let op = ComparisonOp::from_code(op_code)
        .unwrap_or_else(|| panic!("Unknown comparison op code {}", op_code));
    op.holds(ordering) as i32
}

pub extern "C" fn allocate_vector(frp: *mut FloydRuntime, element_count: u64) -> WideReturn {
    let runtime = unsafe { runtime_from_ptr(frp) };
    if runtime.trace {
        debug!(element_count, "allocate_vector");
    }
    let elements = vec![0u64; element_count as usize];
    runtime.heap.alloc_vector(&elements).to_wide()
}

pub extern "C" fn allocate_dict(frp: *mut FloydRuntime) -> WideReturn {
    let runtime = unsafe { runtime_from_ptr(frp) };
    if runtime.trace {
        debug!("allocate_dict");
    }
    runtime.heap.alloc_dict(DictBody::default()).to_wide()
}

/// Returns a copy of `dict` with `key` set to `value`.
pub extern "C" fn store_dict(
    frp: *mut FloydRuntime,
    dict: *const DictT,
    key: *const c_char,
    value: u64,
) -> WideReturn {
    let runtime = unsafe { runtime_from_ptr(frp) };
    let dict = unsafe { *dict };
    let key = String::from_utf8_lossy(read_c_string(key)).into_owned();
    if runtime.trace {
        debug!(key = %key, "store_dict");
    }

    let mut body = dict.body().clone();
    body.map.insert(key, value);
    runtime.heap.alloc_dict(body).to_wide()
}

pub extern "C" fn lookup_dict(
    frp: *mut FloydRuntime,
    dict: *const DictT,
    key: *const c_char,
    value_itype: u64,
) -> u64 {
    let runtime = unsafe { runtime_from_ptr(frp) };
    let dict = unsafe { *dict };
    let key = String::from_utf8_lossy(read_c_string(key)).into_owned();
    if runtime.trace {
        debug!(key = %key, "lookup_dict");
    }

    match dict.body().map.get(&key) {
        Some(word) => *word,
        None => {
            runtime.record_error(format!("Dictionary key {:?} not found", key));
            let value_type = runtime.lookup_type(value_itype);
            default_word(runtime, &value_type)
        }
    }
}

pub extern "C" fn allocate_struct(frp: *mut FloydRuntime, size: u64) -> *mut u8 {
    let runtime = unsafe { runtime_from_ptr(frp) };
    if runtime.trace {
        debug!(size, "allocate_struct");
    }
    runtime.heap.alloc_bytes(size)
}

/// Compares two values of type `itype`, each in wide form. Returns 1 if
/// `op` holds.
pub extern "C" fn compare_values_op(
    frp: *mut FloydRuntime,
    op: i64,
    itype: u64,
    lhs_a: u64,
    lhs_b: u64,
    rhs_a: u64,
    rhs_b: u64,
) -> i32 {
    let runtime = unsafe { runtime_from_ptr(frp) };
    let type_ = runtime.lookup_type(itype);
    if runtime.trace {
        debug!(op, type_ = %type_, "compare_values");
    }
    let ordering = compare_values(
        runtime,
        &type_,
        WideReturn::new(lhs_a, lhs_b),
        WideReturn::new(rhs_a, rhs_b),
    );
    comparison_result(op, ordering)
}

pub extern "C" fn compare_strings(
    frp: *mut FloydRuntime,
    op: i64,
    lhs: *const c_char,
    rhs: *const c_char,
) -> i32 {
    let runtime = unsafe { runtime_from_ptr(frp) };
    if runtime.trace {
        debug!(op, "compare_strings");
    }
    comparison_result(op, read_c_string(lhs).cmp(read_c_string(rhs)))
}

pub extern "C" fn concatenate_strings(
    frp: *mut FloydRuntime,
    lhs: *const c_char,
    rhs: *const c_char,
) -> *const c_char {
    let runtime = unsafe { runtime_from_ptr(frp) };
    let mut bytes = read_c_string(lhs).to_vec();
    bytes.extend_from_slice(read_c_string(rhs));
    if runtime.trace {
        debug!(length = bytes.len(), "concatenate_strings");
    }
    runtime.heap.alloc_string(&bytes)
}

pub extern "C" fn concatenate_vectors(
    frp: *mut FloydRuntime,
    lhs: *const VecT,
    rhs: *const VecT,
) -> WideReturn {
    let runtime = unsafe { runtime_from_ptr(frp) };
    let (lhs, rhs) = unsafe { (*lhs, *rhs) };

    let mut elements = lhs.elements().to_vec();
    elements.extend_from_slice(rhs.elements());
    if runtime.trace {
        debug!(element_count = elements.len(), "concatenate_vectors");
    }
    runtime.heap.alloc_vector(&elements).to_wide()
}

/// Boxes a wide value into a heap cell and returns the cell address.
pub extern "C" fn box_wide(frp: *mut FloydRuntime, a: u64, b: u64) -> u64 {
    let runtime = unsafe { runtime_from_ptr(frp) };
    runtime.heap.alloc_cell(WideReturn::new(a, b)) as u64
}

/// Converts a value of type `itype`, in wide form, to a JSON value.
pub extern "C" fn allocate_json(frp: *mut FloydRuntime, a: u64, b: u64, itype: u64) -> *mut JsonValue {
    let runtime = unsafe { runtime_from_ptr(frp) };
    let type_ = runtime.lookup_type(itype);
    if runtime.trace {
        debug!(type_ = %type_, "allocate_json");
    }
    let json = value_to_json(runtime, &type_, WideReturn::new(a, b));
    runtime.heap.alloc_json(json)
}

/// Looks up a member of a JSON object (string key) or an element of a JSON
/// array (int key).
pub extern "C" fn lookup_json(
    frp: *mut FloydRuntime,
    json: *const JsonValue,
    key_a: u64,
    key_b: u64,
    key_itype: u64,
) -> *mut JsonValue {
    let runtime = unsafe { runtime_from_ptr(frp) };
    let parent = json_ref(json as u64);
    let key_type = runtime.lookup_type(key_itype);
    let key_json = value_to_json(runtime, &key_type, WideReturn::new(key_a, key_b));
    if runtime.trace {
        debug!(key = %key_json, "lookup_json");
    }

    let found = match (parent, &key_json) {
        (JsonValue::Object(object), JsonValue::String(name)) => object.get(name).cloned(),
        (JsonValue::Array(array), JsonValue::Number(index)) => index
            .as_u64()
            .and_then(|index| array.get(index as usize))
            .cloned(),
        _ => {
            runtime.record_error(format!(
                "Cannot look up {} in json value {}",
                key_json, parent
            ));
            Some(JsonValue::Null)
        }
    };

    let value = found.unwrap_or_else(|| {
        runtime.record_error(format!("Json value has no member {}", key_json));
        JsonValue::Null
    });
    runtime.heap.alloc_json(value)
}

pub extern "C" fn check_divisor(frp: *mut FloydRuntime, divisor: i64) {
    let runtime = unsafe { runtime_from_ptr(frp) };
    if divisor == 0 {
        runtime.record_error(String::from("Division by zero"));
    }
}

/// Records an out-of-range vector or string index.
pub extern "C" fn check_index(frp: *mut FloydRuntime, index: i64, length: i64) {
    let runtime = unsafe { runtime_from_ptr(frp) };
    if index < 0 || index >= length {
        runtime.record_error(format!("Index {} out of bounds, size is {}", index, length));
    }
}

pub extern "C" fn string_length(_frp: *mut FloydRuntime, string: *const c_char) -> i64 {
    read_c_string(string).len() as i64
}
