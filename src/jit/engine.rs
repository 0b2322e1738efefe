use std::{collections::HashMap, os::raw::c_char};

use inkwell::{
    execution_engine::{ExecutionEngine, JitFunction, UnsafeFunctionPointer},
    module::Module,
    targets::TargetData,
    OptimizationLevel,
};
use serde_json::Value as JsonValue;
use tracing::{debug, info, instrument, warn};

use crate::{
    ast::{
        interner::{IType, TypeInterner},
        types::TypeId,
    },
    compiler::{
        compiler::{FunctionDef, LlvmInstance, LlvmIrProgram, RUNTIME_INIT_NAME, RUNTIME_INIT_SENTINEL},
        types::TypeMapper,
    },
    errors::errors::{JitError, JitResult},
    runtime::{
        symbols::resolve_native_symbol,
        values::{read_c_string, read_value_at, value_to_json, value_to_string, word_to_wide, StructLayout, VecT},
        FloydRuntime,
    },
};

/// Address and Floyd type of a JIT-compiled Floyd function.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalFunction {
    pub name: String,
    pub address: usize,
    pub function_type: TypeId,
}

/// An MCJIT engine running one generated module.
///
/// The engine owns the module and the runtime context. The context is boxed
/// so the pointer handed to JIT code stays valid while the engine lives.
pub struct LlvmExecutionEngine<'a> {
    ee: ExecutionEngine<'a>,
    module: Module<'a>,
    pub(super) types: TypeMapper<'a>,
    pub(super) runtime: Box<FloydRuntime>,
    function_defs: Vec<FunctionDef<'a>>,
    globals: Vec<(String, TypeId)>,
}

/// Maps every function declaration in the module to its native address.
/// Must run before the first symbol lookup, which finalizes the object code.
fn add_native_mappings(ee: &ExecutionEngine<'_>, module: &Module<'_>) {
    for function in module.get_functions() {
        if function.count_basic_blocks() > 0 {
            continue;
        }
        let name = function.get_name().to_string_lossy().into_owned();
        match resolve_native_symbol(&name) {
            Some(address) => {
                debug!(symbol = %name, "mapped native symbol");
                ee.add_global_mapping(&function, address);
            }
            None => warn!(symbol = %name, "no native implementation for declared function"),
        }
    }
}

fn compute_struct_layouts(
    target_data: &TargetData,
    types: &TypeMapper<'_>,
    interner: &TypeInterner,
) -> HashMap<IType, StructLayout> {
    interner
        .iter()
        .filter_map(|(itype, type_)| {
            let TypeId::Struct(definition) = type_ else {
                return None;
            };
            let struct_type = types.intern_struct_type(definition);
            let offsets = (0..definition.members.len())
                .map(|index| {
                    target_data
                        .offset_of_element(&struct_type, index as u32)
                        .unwrap_or_else(|| panic!("No offset for member {} of {}", index, type_))
                })
                .collect::<Vec<u64>>();
            let layout = StructLayout {
                offsets,
                size: target_data.get_abi_size(&struct_type),
            };
            Some((itype, layout))
        })
        .collect()
}

/// Creates an engine for the program without running global initialization.
#[instrument(skip_all)]
pub fn make_engine_no_init<'a>(
    instance: &'a LlvmInstance,
    program: LlvmIrProgram<'a>,
) -> JitResult<LlvmExecutionEngine<'a>> {
    if instance.config.dump_ir {
        info!(ir = %program.print_ir(), "module IR");
    }

    let ee = program
        .module
        .create_jit_execution_engine(OptimizationLevel::None)
        .map_err(|message| JitError::EngineCreation {
            message: message.to_string(),
        })?;
    add_native_mappings(&ee, &program.module);

    let struct_layouts = compute_struct_layouts(ee.get_target_data(), &program.types, &program.interner);
    let runtime = Box::new(FloydRuntime::new(
        program.interner,
        struct_layouts,
        instance.config.trace_runtime,
    ));

    Ok(LlvmExecutionEngine {
        ee,
        module: program.module,
        types: program.types,
        runtime,
        function_defs: program.function_defs,
        globals: program.debug_globals,
    })
}

/// Creates an engine and runs `floyd_runtime_init`.
pub fn make_engine_run_init<'a>(
    instance: &'a LlvmInstance,
    program: LlvmIrProgram<'a>,
) -> JitResult<LlvmExecutionEngine<'a>> {
    let mut engine = make_engine_no_init(instance, program)?;
    engine.run_init()?;
    Ok(engine)
}

pub fn get_global_ptr(engine: &LlvmExecutionEngine<'_>, name: &str) -> JitResult<*mut u8> {
    engine.global_ptr(name)
}

pub fn get_global_function(engine: &LlvmExecutionEngine<'_>, name: &str) -> JitResult<GlobalFunction> {
    engine.global_function(name)
}

impl<'a> LlvmExecutionEngine<'a> {
    pub fn module(&self) -> &Module<'a> {
        &self.module
    }

    /// The hidden first argument of every JIT function.
    pub fn runtime_ptr(&mut self) -> *mut FloydRuntime {
        &mut *self.runtime as *mut FloydRuntime
    }

    pub fn runtime(&self) -> &FloydRuntime {
        &self.runtime
    }

    /// Looks up a compiled function by its LLVM name.
    ///
    /// # Safety
    ///
    /// `F` must match the function's LLVM signature, including the hidden
    /// runtime argument.
    pub unsafe fn get_function<F: UnsafeFunctionPointer>(&self, name: &str) -> JitResult<JitFunction<'a, F>> {
        self.ee
            .get_function::<F>(name)
            .map_err(|_| JitError::FunctionNotFound {
                name: name.to_string(),
            })
    }

    /// Runs global initialization and checks its sentinel.
    pub fn run_init(&mut self) -> JitResult<()> {
        // SAFETY: `floyd_runtime_init` is always generated as `i64 (i8*)`.
        let init = unsafe {
            self.get_function::<unsafe extern "C" fn(*mut FloydRuntime) -> i64>(RUNTIME_INIT_NAME)?
        };
        let runtime = self.runtime_ptr();
        let result = unsafe { init.call(runtime) };
        debug!(result, "ran runtime init");

        self.check_runtime_error()?;
        if result != RUNTIME_INIT_SENTINEL {
            return Err(JitError::InitFailed {
                result,
                expected: RUNTIME_INIT_SENTINEL,
            });
        }
        Ok(())
    }

    /// Turns the first error recorded by a native helper into a `JitError`.
    pub fn check_runtime_error(&mut self) -> JitResult<()> {
        match self.runtime.take_error() {
            Some(message) => Err(JitError::Runtime { message }),
            None => Ok(()),
        }
    }

    /// Lines written by `print` so far.
    pub fn print_output(&self) -> &[String] {
        &self.runtime.print_output
    }

    pub fn runtime_error(&self) -> Option<&str> {
        self.runtime.error.as_deref()
    }

    pub fn global_type(&self, name: &str) -> JitResult<&TypeId> {
        self.globals
            .iter()
            .find(|(global, _)| global == name)
            .map(|(_, type_)| type_)
            .ok_or_else(|| JitError::GlobalNotFound {
                name: name.to_string(),
            })
    }

    pub fn global_ptr(&self, name: &str) -> JitResult<*mut u8> {
        self.global_type(name)?;
        // MCJIT resolves data symbols through the same lookup as functions.
        self.ee
            .get_function_address(name)
            .map(|address| address as *mut u8)
            .map_err(|_| JitError::GlobalNotFound {
                name: name.to_string(),
            })
    }

    pub fn global_function(&self, name: &str) -> JitResult<GlobalFunction> {
        let not_found = || JitError::FunctionNotFound {
            name: name.to_string(),
        };
        let function_type = self
            .function_defs
            .iter()
            .find(|def| def.name == name && def.floyd_function_id.is_some())
            .and_then(|def| def.floyd_type.clone())
            .ok_or_else(not_found)?;
        let address = self.ee.get_function_address(name).map_err(|_| not_found())?;

        Ok(GlobalFunction {
            name: name.to_string(),
            address,
            function_type,
        })
    }

    fn typed_global_ptr(&self, name: &str, expected: &TypeId) -> JitResult<*const u8> {
        let actual = self.global_type(name)?;
        let matches = match expected {
            TypeId::Vector(_) => matches!(actual, TypeId::Vector(_)),
            _ => actual == expected,
        };
        if !matches {
            return Err(JitError::GlobalTypeMismatch {
                name: name.to_string(),
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }
        self.global_ptr(name).map(|ptr| ptr as *const u8)
    }

    pub fn read_global_int(&self, name: &str) -> JitResult<i64> {
        let ptr = self.typed_global_ptr(name, &TypeId::Int)?;
        // SAFETY: the global is an initialized i64.
        Ok(unsafe { read_value_at(&TypeId::Int, ptr).a as i64 })
    }

    pub fn read_global_double(&self, name: &str) -> JitResult<f64> {
        let ptr = self.typed_global_ptr(name, &TypeId::Double)?;
        Ok(unsafe { f64::from_bits(read_value_at(&TypeId::Double, ptr).a) })
    }

    pub fn read_global_bool(&self, name: &str) -> JitResult<bool> {
        let ptr = self.typed_global_ptr(name, &TypeId::Bool)?;
        Ok(unsafe { read_value_at(&TypeId::Bool, ptr).a != 0 })
    }

    pub fn read_global_string(&self, name: &str) -> JitResult<String> {
        let ptr = self.typed_global_ptr(name, &TypeId::String)?;
        let string_ptr = unsafe { read_value_at(&TypeId::String, ptr).a } as *const c_char;
        Ok(String::from_utf8_lossy(read_c_string(string_ptr)).into_owned())
    }

    /// Reads a vector global as JSON, one value per element.
    pub fn read_global_vector(&self, name: &str) -> JitResult<Vec<JsonValue>> {
        let ptr = self.typed_global_ptr(name, &TypeId::make_vector(TypeId::Undefined))?;
        let vector_type = self.global_type(name)?;
        let element_type = vector_type.vector_element_type();

        let vector = VecT::from_wide(unsafe { read_value_at(vector_type, ptr) });
        Ok(vector
            .elements()
            .iter()
            .map(|word| value_to_json(&self.runtime, element_type, word_to_wide(element_type, *word)))
            .collect())
    }

    /// Renders any global the way `to_string` would.
    pub fn format_global(&self, name: &str) -> JitResult<String> {
        let type_ = self.global_type(name)?;
        let ptr = self.global_ptr(name)?;
        let wide = unsafe { read_value_at(type_, ptr) };
        Ok(value_to_string(&self.runtime, type_, wide))
    }
}
