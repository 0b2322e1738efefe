//! Native runtime for JIT-compiled Floyd code.
//!
//! This module contains everything generated code calls back into:
//!
//! - The binary value model shared with the IR (`VEC_T`, `DICT_T`, wide returns)
//! - The runtime context passed as the hidden first argument of every function
//! - Runtime helper functions (allocation, comparison, concatenation, lookups)
//! - The host corelib (`print`, `assert`, `size`, `push_back`, `to_string`)
//! - The process-wide table mapping symbol names to native addresses

pub mod corelib;
pub mod functions;
pub mod symbols;
pub mod values;

use std::{collections::HashMap, ffi::CString, os::raw::c_char};

use serde_json::Value as JsonValue;
use tracing::error;

use crate::ast::{interner::IType, interner::TypeInterner, types::TypeId};

use self::values::{DictBody, DictT, StructLayout, VecT, WideReturn, VEC_ELEMENT_BITS, VEC_MAGIC};

/// Prefix of the LLVM symbol of every host function.
pub const HOST_FUNCTION_PREFIX: &str = "floyd_funcdef__";

pub fn host_function_symbol(name: &str) -> String {
    format!("{}{}", HOST_FUNCTION_PREFIX, name)
}

/// Runtime helpers the generated code may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeFunction {
    AllocateVector,
    AllocateDict,
    StoreDict,
    LookupDict,
    AllocateStruct,
    CompareValues,
    CompareStrings,
    ConcatenateStrings,
    ConcatenateVectors,
    BoxWide,
    AllocateJson,
    LookupJson,
    CheckDivisor,
    CheckIndex,
    StringLength,
}

impl RuntimeFunction {
    pub const ALL: [RuntimeFunction; 15] = [
        RuntimeFunction::AllocateVector,
        RuntimeFunction::AllocateDict,
        RuntimeFunction::StoreDict,
        RuntimeFunction::LookupDict,
        RuntimeFunction::AllocateStruct,
        RuntimeFunction::CompareValues,
        RuntimeFunction::CompareStrings,
        RuntimeFunction::ConcatenateStrings,
        RuntimeFunction::ConcatenateVectors,
        RuntimeFunction::BoxWide,
        RuntimeFunction::AllocateJson,
        RuntimeFunction::LookupJson,
        RuntimeFunction::CheckDivisor,
        RuntimeFunction::CheckIndex,
        RuntimeFunction::StringLength,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RuntimeFunction::AllocateVector => "floyd_runtime__allocate_vector",
            RuntimeFunction::AllocateDict => "floyd_runtime__allocate_dict",
            RuntimeFunction::StoreDict => "floyd_runtime__store_dict",
            RuntimeFunction::LookupDict => "floyd_runtime__lookup_dict",
            RuntimeFunction::AllocateStruct => "floyd_runtime__allocate_struct",
            RuntimeFunction::CompareValues => "floyd_runtime__compare_values",
            RuntimeFunction::CompareStrings => "floyd_runtime__compare_strings",
            RuntimeFunction::ConcatenateStrings => "floyd_runtime__concatenate_strings",
            RuntimeFunction::ConcatenateVectors => "floyd_runtime__concatenate_vectors",
            RuntimeFunction::BoxWide => "floyd_runtime__box_wide",
            RuntimeFunction::AllocateJson => "floyd_runtime__allocate_json",
            RuntimeFunction::LookupJson => "floyd_runtime__lookup_json",
            RuntimeFunction::CheckDivisor => "floyd_runtime__check_divisor",
            RuntimeFunction::CheckIndex => "floyd_runtime__check_index",
            RuntimeFunction::StringLength => "floyd_runtime__string_length",
        }
    }
}

enum Allocation {
    Words(*mut [u64]),
    String(*mut c_char),
    Dict(*mut DictBody),
    Cell(*mut WideReturn),
    Json(*mut JsonValue),
}

/// Owns every allocation made on behalf of JIT code.
///
/// Runtime values are immutable once built and may be shared freely between
/// vectors, dicts and globals, so nothing is released before the heap drops.
#[derive(Default)]
pub struct RuntimeHeap {
    allocations: Vec<Allocation>,
}

impl RuntimeHeap {
    pub fn new() -> Self {
        RuntimeHeap {
            allocations: vec![],
        }
    }

    pub fn len(&self) -> usize {
        self.allocations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }

    /// Zeroed, 8-byte aligned words. Never returns null, even for zero words.
    pub fn alloc_words(&mut self, count: usize) -> *mut u64 {
        let words = Box::into_raw(vec![0u64; count.max(1)].into_boxed_slice());
        self.allocations.push(Allocation::Words(words));
        words as *mut u64
    }

    pub fn alloc_bytes(&mut self, size: u64) -> *mut u8 {
        let words = (size as usize).div_ceil(8);
        self.alloc_words(words) as *mut u8
    }

    pub fn alloc_vector(&mut self, elements: &[u64]) -> VecT {
        let element_count =
            u32::try_from(elements.len()).unwrap_or_else(|_| panic!("Vector too large"));
        let element_ptr = self.alloc_words(elements.len());
        // SAFETY: `element_ptr` has room for at least `elements.len()` words.
        unsafe {
            std::ptr::copy_nonoverlapping(elements.as_ptr(), element_ptr, elements.len());
        }
        VecT {
            element_ptr,
            element_count,
            magic: VEC_MAGIC,
            element_bits: VEC_ELEMENT_BITS,
        }
    }

    /// Strings are cut at the first NUL byte.
    pub fn alloc_string(&mut self, bytes: &[u8]) -> *const c_char {
        let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
        let string = CString::new(&bytes[..end]).unwrap_or_default().into_raw();
        self.allocations.push(Allocation::String(string));
        string
    }

    pub fn alloc_dict(&mut self, body: DictBody) -> DictT {
        let body_ptr = Box::into_raw(Box::new(body));
        self.allocations.push(Allocation::Dict(body_ptr));
        DictT { body_ptr }
    }

    pub fn alloc_cell(&mut self, wide: WideReturn) -> *mut WideReturn {
        let cell = Box::into_raw(Box::new(wide));
        self.allocations.push(Allocation::Cell(cell));
        cell
    }

    pub fn alloc_json(&mut self, value: JsonValue) -> *mut JsonValue {
        let json = Box::into_raw(Box::new(value));
        self.allocations.push(Allocation::Json(json));
        json
    }
}

impl Drop for RuntimeHeap {
    fn drop(&mut self) {
        // SAFETY: every pointer came from `Box::into_raw`/`CString::into_raw`
        // and is released exactly once.
        unsafe {
            for allocation in self.allocations.drain(..) {
                match allocation {
                    Allocation::Words(words) => drop(Box::from_raw(words)),
                    Allocation::String(string) => drop(CString::from_raw(string)),
                    Allocation::Dict(body) => drop(Box::from_raw(body)),
                    Allocation::Cell(cell) => drop(Box::from_raw(cell)),
                    Allocation::Json(json) => drop(Box::from_raw(json)),
                }
            }
        }
    }
}

/// The runtime context every JIT function receives as its hidden first
/// argument.
pub struct FloydRuntime {
    pub interner: TypeInterner,
    pub struct_layouts: HashMap<IType, StructLayout>,
    pub heap: RuntimeHeap,
    /// Lines written by `print`, in order.
    pub print_output: Vec<String>,
    /// First error recorded by a native helper.
    pub error: Option<String>,
    pub trace: bool,
}

impl FloydRuntime {
    pub fn new(
        interner: TypeInterner,
        struct_layouts: HashMap<IType, StructLayout>,
        trace: bool,
    ) -> Self {
        FloydRuntime {
            interner,
            struct_layouts,
            heap: RuntimeHeap::new(),
            print_output: vec![],
            error: None,
            trace,
        }
    }

    /// Records a runtime error. Only the first error is kept.
    pub fn record_error(&mut self, message: String) {
        error!(message = %message, "Floyd runtime error");
        if self.error.is_none() {
            self.error = Some(message);
        }
    }

    pub fn take_error(&mut self) -> Option<String> {
        self.error.take()
    }

    /// # Panics
    ///
    /// Panics if the word is not an itype of this program.
    pub fn lookup_type(&self, itype_word: u64) -> TypeId {
        self.interner
            .lookup_type(IType::from_raw(itype_word as u32))
            .clone()
    }

    /// # Panics
    ///
    /// Panics if no layout was computed for the struct.
    pub fn struct_layout(&self, struct_type: &TypeId) -> &StructLayout {
        let itype = self.interner.lookup_itype(struct_type);
        self.struct_layouts
            .get(&itype)
            .unwrap_or_else(|| panic!("No layout for struct {}", struct_type))
    }

    pub fn alloc_string_value(&mut self, text: &str) -> *const c_char {
        self.heap.alloc_string(text.as_bytes())
    }
}

/// Reborrows the runtime context passed by JIT code.
///
/// # Safety
///
/// `frp` must be the pointer handed to the JIT by the execution engine,
/// which keeps the context alive and unaliased for the duration of the call.
pub(crate) unsafe fn runtime_from_ptr<'a>(frp: *mut FloydRuntime) -> &'a mut FloydRuntime {
    assert!(!frp.is_null(), "Null Floyd runtime pointer");
    &mut *frp
}
