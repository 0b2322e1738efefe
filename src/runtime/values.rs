//! Binary layouts of runtime values and the operations the native helpers
//! perform on them.
//!
//! A value crosses the JIT boundary in one of two encodings:
//!
//! - **wide**: a `WideReturn` pair. Scalars and pointers use `a` only,
//!   vectors use both words (the `VEC_T` bits), `any` is `{word, itype}`.
//! - **word**: a single 64-bit element slot as stored inside vectors and
//!   dictionaries. Vectors, dicts and `any` values do not fit in one word and
//!   are boxed into a heap cell holding their wide form.

use std::{cmp::Ordering, collections::BTreeMap, ffi::CStr, os::raw::c_char};

use serde_json::Value as JsonValue;

use crate::ast::{interner::IType, types::TypeId};

use super::FloydRuntime;

pub const VEC_MAGIC: u16 = 0xDABB;
pub const VEC_ELEMENT_BITS: u16 = 64;

/// Two-word return payload, `{ i64, i64 }` in LLVM.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WideReturn {
    pub a: u64,
    pub b: u64,
}

impl WideReturn {
    pub fn new(a: u64, b: u64) -> Self {
        WideReturn { a, b }
    }
}

/// `VEC_T`: `{ i64*, i32, i16, i16 }` in LLVM.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VecT {
    pub element_ptr: *mut u64,
    pub element_count: u32,
    pub magic: u16,
    pub element_bits: u16,
}

impl VecT {
    pub fn from_wide(wide: WideReturn) -> Self {
        // SAFETY: both types are 16 bytes of plain data.
        unsafe { std::mem::transmute::<WideReturn, VecT>(wide) }
    }

    pub fn to_wide(self) -> WideReturn {
        // SAFETY: both types are 16 bytes of plain data.
        unsafe { std::mem::transmute::<VecT, WideReturn>(self) }
    }

    /// # Panics
    ///
    /// Panics if the vector was not produced by the runtime.
    pub fn check_invariant(&self) {
        assert_eq!(self.magic, VEC_MAGIC, "Corrupt VEC_T magic");
        assert!(!self.element_ptr.is_null(), "VEC_T with null element_ptr");
        assert_eq!(self.element_bits, VEC_ELEMENT_BITS);
    }

    pub fn elements(&self) -> &[u64] {
        self.check_invariant();
        // SAFETY: the runtime heap owns `element_count` words at `element_ptr`
        // for as long as the runtime lives.
        unsafe { std::slice::from_raw_parts(self.element_ptr, self.element_count as usize) }
    }
}

/// Owned body of a dictionary.
#[derive(Debug, Clone, Default)]
pub struct DictBody {
    pub map: BTreeMap<String, u64>,
}

/// `DICT_T`: `{ i8* }` in LLVM.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DictT {
    pub body_ptr: *mut DictBody,
}

impl DictT {
    pub fn from_wide(wide: WideReturn) -> Self {
        DictT {
            body_ptr: wide.a as *mut DictBody,
        }
    }

    pub fn to_wide(self) -> WideReturn {
        WideReturn::new(self.body_ptr as u64, 0)
    }

    pub fn body(&self) -> &DictBody {
        assert!(!self.body_ptr.is_null(), "DICT_T with null body");
        // SAFETY: dict bodies are owned by the runtime heap.
        unsafe { &*self.body_ptr }
    }
}

/// Byte offsets of a struct's members, as computed by LLVM's data layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructLayout {
    pub offsets: Vec<u64>,
    pub size: u64,
}

/// Whether a value of this type is boxed into a heap cell when stored in a
/// single word.
pub fn is_cell_boxed(type_: &TypeId) -> bool {
    matches!(type_, TypeId::Vector(_) | TypeId::Dict(_) | TypeId::Any)
}

/// Reads a C string produced by JIT code or the runtime. Null reads as "".
pub fn read_c_string<'a>(ptr: *const c_char) -> &'a [u8] {
    if ptr.is_null() {
        return b"";
    }
    // SAFETY: strings are NUL-terminated constants or runtime-owned.
    unsafe { CStr::from_ptr(ptr).to_bytes() }
}

/// Expands an element word into the wide encoding of `type_`.
pub fn word_to_wide(type_: &TypeId, word: u64) -> WideReturn {
    if is_cell_boxed(type_) {
        if word == 0 {
            return WideReturn::default();
        }
        // SAFETY: cell words always point at a runtime-owned `WideReturn`.
        unsafe { std::ptr::read(word as *const WideReturn) }
    } else {
        WideReturn::new(word, 0)
    }
}

/// Packs a wide value into an element word, boxing when needed.
pub fn wide_to_word(runtime: &mut FloydRuntime, type_: &TypeId, wide: WideReturn) -> u64 {
    if is_cell_boxed(type_) {
        runtime.heap.alloc_cell(wide) as u64
    } else {
        wide.a
    }
}

/// Reads a value of `type_` stored in memory in its LLVM layout.
///
/// # Safety
///
/// `ptr` must point at a live value of `type_`.
pub unsafe fn read_value_at(type_: &TypeId, ptr: *const u8) -> WideReturn {
    match type_ {
        TypeId::Bool => WideReturn::new((std::ptr::read(ptr) & 1) as u64, 0),
        TypeId::Vector(_) | TypeId::Any => std::ptr::read_unaligned(ptr as *const WideReturn),
        _ => WideReturn::new(std::ptr::read_unaligned(ptr as *const u64), 0),
    }
}

/// Reads member `index` of the struct at `ptr`.
pub fn read_struct_member(
    runtime: &FloydRuntime,
    struct_type: &TypeId,
    ptr: *const u8,
    index: usize,
) -> WideReturn {
    let layout = runtime.struct_layout(struct_type);
    let member_type = &struct_type.struct_definition().members[index].member_type;
    let offset = layout.offsets[index] as usize;

    // SAFETY: `ptr` points at a struct allocated with `layout.size` bytes.
    unsafe { read_value_at(member_type, ptr.add(offset)) }
}

/// Three-way comparison of two values of the same type.
pub fn compare_values(
    runtime: &FloydRuntime,
    type_: &TypeId,
    lhs: WideReturn,
    rhs: WideReturn,
) -> Ordering {
    match type_ {
        TypeId::Undefined | TypeId::Void => Ordering::Equal,
        TypeId::Bool => (lhs.a & 1).cmp(&(rhs.a & 1)),
        TypeId::Int => (lhs.a as i64).cmp(&(rhs.a as i64)),
        TypeId::Typeid | TypeId::Function(_) => lhs.a.cmp(&rhs.a),
        TypeId::Double => f64::from_bits(lhs.a)
            .partial_cmp(&f64::from_bits(rhs.a))
            .unwrap_or(Ordering::Equal),
        TypeId::String => {
            read_c_string(lhs.a as *const c_char).cmp(read_c_string(rhs.a as *const c_char))
        }
        TypeId::JsonValue => compare_json(json_ref(lhs.a), json_ref(rhs.a)),
        TypeId::Struct(definition) => {
            let lhs_ptr = lhs.a as *const u8;
            let rhs_ptr = rhs.a as *const u8;
            if lhs_ptr == rhs_ptr {
                return Ordering::Equal;
            }
            for (index, member) in definition.members.iter().enumerate() {
                let ordering = compare_values(
                    runtime,
                    &member.member_type,
                    read_struct_member(runtime, type_, lhs_ptr, index),
                    read_struct_member(runtime, type_, rhs_ptr, index),
                );
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        }
        TypeId::Vector(element_type) => {
            let lhs = VecT::from_wide(lhs);
            let rhs = VecT::from_wide(rhs);
            for (a, b) in lhs.elements().iter().zip(rhs.elements().iter()) {
                let ordering = compare_values(
                    runtime,
                    element_type,
                    word_to_wide(element_type, *a),
                    word_to_wide(element_type, *b),
                );
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            lhs.element_count.cmp(&rhs.element_count)
        }
        TypeId::Dict(value_type) => {
            let lhs = DictT::from_wide(lhs);
            let rhs = DictT::from_wide(rhs);
            let lhs_map = &lhs.body().map;
            let rhs_map = &rhs.body().map;
            for ((lhs_key, a), (rhs_key, b)) in lhs_map.iter().zip(rhs_map.iter()) {
                let ordering = lhs_key.cmp(rhs_key).then_with(|| {
                    compare_values(
                        runtime,
                        value_type,
                        word_to_wide(value_type, *a),
                        word_to_wide(value_type, *b),
                    )
                });
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            lhs_map.len().cmp(&rhs_map.len())
        }
        TypeId::Any => {
            if lhs.b != rhs.b {
                return lhs.b.cmp(&rhs.b);
            }
            let actual_type = runtime.lookup_type(lhs.b);
            compare_values(
                runtime,
                &actual_type,
                word_to_wide(&actual_type, lhs.a),
                word_to_wide(&actual_type, rhs.a),
            )
        }
    }
}

fn json_rank(value: &JsonValue) -> u8 {
    match value {
        JsonValue::Null => 0,
        JsonValue::Bool(_) => 1,
        JsonValue::Number(_) => 2,
        JsonValue::String(_) => 3,
        JsonValue::Array(_) => 4,
        JsonValue::Object(_) => 5,
    }
}

/// Orders JSON values by kind first, then by content.
pub fn compare_json(lhs: &JsonValue, rhs: &JsonValue) -> Ordering {
    match (lhs, rhs) {
        (JsonValue::Bool(a), JsonValue::Bool(b)) => a.cmp(b),
        (JsonValue::Number(a), JsonValue::Number(b)) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (JsonValue::String(a), JsonValue::String(b)) => a.cmp(b),
        (JsonValue::Array(a), JsonValue::Array(b)) => {
            for (x, y) in a.iter().zip(b.iter()) {
                let ordering = compare_json(x, y);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            a.len().cmp(&b.len())
        }
        (JsonValue::Object(a), JsonValue::Object(b)) => {
            for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
                let ordering = ka.cmp(kb).then_with(|| compare_json(va, vb));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            a.len().cmp(&b.len())
        }
        _ => json_rank(lhs).cmp(&json_rank(rhs)),
    }
}

static JSON_NULL: JsonValue = JsonValue::Null;

/// Borrows a runtime-owned JSON value. Null pointers read as JSON null.
pub fn json_ref<'a>(word: u64) -> &'a JsonValue {
    if word == 0 {
        return &JSON_NULL;
    }
    // SAFETY: JSON words point at runtime-owned values.
    unsafe { &*(word as *const JsonValue) }
}

/// Converts a value into its JSON form.
pub fn value_to_json(runtime: &FloydRuntime, type_: &TypeId, wide: WideReturn) -> JsonValue {
    match type_ {
        TypeId::Undefined | TypeId::Void | TypeId::Function(_) => JsonValue::Null,
        TypeId::Bool => JsonValue::Bool(wide.a & 1 == 1),
        TypeId::Int => JsonValue::from(wide.a as i64),
        TypeId::Double => serde_json::Number::from_f64(f64::from_bits(wide.a))
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        TypeId::String => JsonValue::String(
            String::from_utf8_lossy(read_c_string(wide.a as *const c_char)).into_owned(),
        ),
        TypeId::Typeid => JsonValue::String(
            runtime
                .lookup_type(wide.a)
                .to_string(),
        ),
        TypeId::JsonValue => json_ref(wide.a).clone(),
        TypeId::Struct(definition) => {
            let mut object = serde_json::Map::new();
            for (index, member) in definition.members.iter().enumerate() {
                let member_value = read_struct_member(runtime, type_, wide.a as *const u8, index);
                object.insert(
                    member.name.clone(),
                    value_to_json(runtime, &member.member_type, member_value),
                );
            }
            JsonValue::Object(object)
        }
        TypeId::Vector(element_type) => JsonValue::Array(
            VecT::from_wide(wide)
                .elements()
                .iter()
                .map(|word| value_to_json(runtime, element_type, word_to_wide(element_type, *word)))
                .collect(),
        ),
        TypeId::Dict(value_type) => {
            let mut object = serde_json::Map::new();
            for (key, word) in DictT::from_wide(wide).body().map.iter() {
                object.insert(
                    key.clone(),
                    value_to_json(runtime, value_type, word_to_wide(value_type, *word)),
                );
            }
            JsonValue::Object(object)
        }
        TypeId::Any => {
            let actual_type = runtime.lookup_type(wide.b);
            value_to_json(runtime, &actual_type, word_to_wide(&actual_type, wide.a))
        }
    }
}

/// Renders a value the way `print` and `to_string` show it.
///
/// Strings are quoted only when nested inside a collection.
pub fn value_to_string(runtime: &FloydRuntime, type_: &TypeId, wide: WideReturn) -> String {
    render_value(runtime, type_, wide, false)
}

fn render_value(runtime: &FloydRuntime, type_: &TypeId, wide: WideReturn, nested: bool) -> String {
    match type_ {
        TypeId::Undefined => String::from("undef"),
        TypeId::Void => String::from("void"),
        TypeId::Bool => (wide.a & 1 == 1).to_string(),
        TypeId::Int => (wide.a as i64).to_string(),
        TypeId::Double => {
            let value = f64::from_bits(wide.a);
            if value.fract() == 0.0 && value.is_finite() {
                format!("{:.1}", value)
            } else {
                value.to_string()
            }
        }
        TypeId::String => {
            let text = String::from_utf8_lossy(read_c_string(wide.a as *const c_char)).into_owned();
            if nested {
                format!("\"{}\"", text)
            } else {
                text
            }
        }
        TypeId::Typeid => runtime.lookup_type(wide.a).to_string(),
        TypeId::Function(_) => format!("function@{:#x}", wide.a),
        TypeId::JsonValue => json_ref(wide.a).to_string(),
        TypeId::Struct(definition) => {
            let members = definition
                .members
                .iter()
                .enumerate()
                .map(|(index, member)| {
                    let member_value =
                        read_struct_member(runtime, type_, wide.a as *const u8, index);
                    format!(
                        "{}={}",
                        member.name,
                        render_value(runtime, &member.member_type, member_value, true)
                    )
                })
                .collect::<Vec<String>>();
            format!("{{{}}}", members.join(", "))
        }
        TypeId::Vector(element_type) => {
            let elements = VecT::from_wide(wide)
                .elements()
                .iter()
                .map(|word| {
                    render_value(runtime, element_type, word_to_wide(element_type, *word), true)
                })
                .collect::<Vec<String>>();
            format!("[{}]", elements.join(", "))
        }
        TypeId::Dict(value_type) => {
            let entries = DictT::from_wide(wide)
                .body()
                .map
                .iter()
                .map(|(key, word)| {
                    format!(
                        "\"{}\": {}",
                        key,
                        render_value(runtime, value_type, word_to_wide(value_type, *word), true)
                    )
                })
                .collect::<Vec<String>>();
            format!("{{{}}}", entries.join(", "))
        }
        TypeId::Any => {
            let actual_type = runtime.lookup_type(wide.b);
            render_value(runtime, &actual_type, word_to_wide(&actual_type, wide.a), nested)
        }
    }
}

/// The element word a missing lookup yields for `type_`.
pub fn default_word(runtime: &mut FloydRuntime, type_: &TypeId) -> u64 {
    match type_ {
        TypeId::Vector(_) => {
            let empty = runtime.heap.alloc_vector(&[]);
            wide_to_word(runtime, type_, empty.to_wide())
        }
        TypeId::Dict(_) => {
            let empty = runtime.heap.alloc_dict(DictBody::default());
            wide_to_word(runtime, type_, empty.to_wide())
        }
        TypeId::String => runtime.heap.alloc_string(b"") as u64,
        TypeId::JsonValue => runtime.heap.alloc_json(JsonValue::Null) as u64,
        TypeId::Any => {
            let undefined = runtime.interner.lookup_itype(&TypeId::Undefined);
            wide_to_word(runtime, type_, WideReturn::new(0, undefined.as_u64()))
        }
        TypeId::Struct(_) => {
            let size = runtime.struct_layout(type_).size;
            runtime.heap.alloc_bytes(size) as u64
        }
        _ => 0,
    }
}

/// Returns the itype recorded for a runtime type word.
pub fn itype_from_word(word: u64) -> IType {
    IType::from_raw(word as u32)
}
