use lazy_static::lazy_static;
use std::collections::HashMap;

use super::{corelib, functions, RuntimeFunction};

lazy_static! {
    /// Every native function JIT code may call, by LLVM symbol name.
    pub static ref NATIVE_FUNCTIONS: HashMap<&'static str, usize> = {
        let mut map = HashMap::new();
        map.insert(
            RuntimeFunction::AllocateVector.name(),
            functions::allocate_vector as *const () as usize,
        );
        map.insert(
            RuntimeFunction::AllocateDict.name(),
            functions::allocate_dict as *const () as usize,
        );
        map.insert(
            RuntimeFunction::StoreDict.name(),
            functions::store_dict as *const () as usize,
        );
        map.insert(
            RuntimeFunction::LookupDict.name(),
            functions::lookup_dict as *const () as usize,
        );
        map.insert(
            RuntimeFunction::AllocateStruct.name(),
            functions::allocate_struct as *const () as usize,
        );
        map.insert(
            RuntimeFunction::CompareValues.name(),
            functions::compare_values_op as *const () as usize,
        );
        map.insert(
            RuntimeFunction::CompareStrings.name(),
            functions::compare_strings as *const () as usize,
        );
        map.insert(
            RuntimeFunction::ConcatenateStrings.name(),
            functions::concatenate_strings as *const () as usize,
        );
        map.insert(
            RuntimeFunction::ConcatenateVectors.name(),
            functions::concatenate_vectors as *const () as usize,
        );
        map.insert(
            RuntimeFunction::BoxWide.name(),
            functions::box_wide as *const () as usize,
        );
        map.insert(
            RuntimeFunction::AllocateJson.name(),
            functions::allocate_json as *const () as usize,
        );
        map.insert(
            RuntimeFunction::LookupJson.name(),
            functions::lookup_json as *const () as usize,
        );
        map.insert(
            RuntimeFunction::CheckDivisor.name(),
            functions::check_divisor as *const () as usize,
        );
        map.insert(
            RuntimeFunction::CheckIndex.name(),
            functions::check_index as *const () as usize,
        );
        map.insert(
            RuntimeFunction::StringLength.name(),
            functions::string_length as *const () as usize,
        );

        map.insert("floyd_funcdef__print", corelib::floyd_print as *const () as usize);
        map.insert("floyd_funcdef__assert", corelib::floyd_assert as *const () as usize);
        map.insert("floyd_funcdef__size", corelib::floyd_size as *const () as usize);
        map.insert(
            "floyd_funcdef__push_back",
            corelib::floyd_push_back as *const () as usize,
        );
        map.insert(
            "floyd_funcdef__to_string",
            corelib::floyd_to_string as *const () as usize,
        );
        map
    };
}

/// Resolves a declared symbol to its native address.
///
/// Names are tried as-is first, then with one leading platform mangling
/// character (`_` or `\x01`) removed.
pub fn resolve_native_symbol(name: &str) -> Option<usize> {
    if let Some(address) = NATIVE_FUNCTIONS.get(name) {
        return Some(*address);
    }

    name.strip_prefix('\u{1}')
        .or_else(|| name.strip_prefix('_'))
        .and_then(|stripped| NATIVE_FUNCTIONS.get(stripped).copied())
}
