//! Calling JIT-compiled Floyd functions from Rust.
//!
//! The argument list is checked against the function's Floyd signature and
//! lowered the same way the code generator lowers it: the runtime pointer
//! first, then one LLVM argument per concrete argument and two per `any`.
//! Results come back in the wide encoding of the static return type.

use tracing::debug;

use crate::{
    ast::types::TypeId,
    compiler::types::{is_wide_return_type, ArgRole},
    errors::errors::{JitError, JitResult},
    runtime::{
        values::{read_c_string, VecT, WideReturn},
        FloydRuntime,
    },
};

use super::engine::LlvmExecutionEngine;

/// A scalar Floyd value passed into JIT code.
#[derive(Debug, Clone, PartialEq)]
pub enum JitValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
}

impl JitValue {
    pub fn value_type(&self) -> TypeId {
        match self {
            JitValue::Bool(_) => TypeId::Bool,
            JitValue::Int(_) => TypeId::Int,
            JitValue::Double(_) => TypeId::Double,
            JitValue::String(_) => TypeId::String,
        }
    }
}

/// One native argument after lowering. Words travel in integer registers,
/// doubles in floating point registers.
#[derive(Debug, Clone, Copy, PartialEq)]
enum NativeArg {
    Word(u64),
    Double(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReturnClass {
    Void,
    Bool,
    Word,
    Double,
    Wide,
}

impl ReturnClass {
    fn of(return_type: &TypeId) -> Self {
        match return_type {
            TypeId::Void => ReturnClass::Void,
            TypeId::Bool => ReturnClass::Bool,
            TypeId::Double => ReturnClass::Double,
            other if is_wide_return_type(other) => ReturnClass::Wide,
            _ => ReturnClass::Word,
        }
    }
}

macro_rules! invoke_native {
    ($engine:expr, $name:expr, $runtime:expr, $output:ty $(, $value:expr => $param:ty)*) => {{
        let function = $engine
            .get_function::<unsafe extern "C" fn(*mut FloydRuntime $(, $param)*) -> $output>($name)?;
        function.call($runtime $(, $value)*)
    }};
}

impl<'a> LlvmExecutionEngine<'a> {
    /// Calls a Floyd function and returns its result in the wide encoding.
    /// Word results are in `a`. Void functions return zeroes.
    ///
    /// A runtime error recorded during the call is returned as
    /// `JitError::Runtime`.
    pub fn run_function(&mut self, name: &str, args: &[JitValue]) -> JitResult<WideReturn> {
        let function = self.global_function(name)?;
        let mapping = self.types.map_function_arguments(&function.function_type);
        let signature = function.function_type.function_signature();

        if signature.args.len() != args.len() {
            return Err(JitError::ArgumentMismatch {
                name: name.to_string(),
                message: format!("expected {} arguments, got {}", signature.args.len(), args.len()),
            });
        }
        for (index, (arg_type, value)) in signature.args.iter().zip(args).enumerate() {
            if !arg_type.is_any() && *arg_type != value.value_type() {
                return Err(JitError::ArgumentMismatch {
                    name: name.to_string(),
                    message: format!(
                        "argument {} has type {}, got {}",
                        index,
                        arg_type,
                        value.value_type()
                    ),
                });
            }
        }

        let mut native_args = Vec::with_capacity(mapping.args.len());
        for mapped in &mapping.args {
            let Some(index) = mapped.floyd_arg_index else {
                continue;
            };
            let value = &args[index];
            let native = match (mapped.role, value) {
                (ArgRole::DynType, value) => {
                    NativeArg::Word(self.runtime.interner.lookup_itype(&value.value_type()).as_u64())
                }
                (_, JitValue::Double(number)) if mapped.role == ArgRole::Simple => NativeArg::Double(*number),
                (_, value) => NativeArg::Word(self.value_word(value)),
            };
            native_args.push(native);
        }

        let return_class = ReturnClass::of(&mapping.floyd_return_type);
        debug!(function = %name, args = native_args.len(), ?return_class, "calling JIT function");

        let runtime = self.runtime_ptr();
        // SAFETY: the native argument list and return class follow the
        // function's mapped LLVM signature.
        let result = unsafe {
            match return_class {
                ReturnClass::Void => {
                    self.invoke::<()>(name, runtime, &native_args)?;
                    WideReturn { a: 0, b: 0 }
                }
                ReturnClass::Bool => {
                    let flag = self.invoke::<u8>(name, runtime, &native_args)?;
                    WideReturn {
                        a: (flag & 1) as u64,
                        b: 0,
                    }
                }
                ReturnClass::Word => WideReturn {
                    a: self.invoke::<u64>(name, runtime, &native_args)?,
                    b: 0,
                },
                ReturnClass::Double => WideReturn {
                    a: self.invoke::<f64>(name, runtime, &native_args)?.to_bits(),
                    b: 0,
                },
                ReturnClass::Wide => self.invoke::<WideReturn>(name, runtime, &native_args)?,
            }
        };

        self.check_runtime_error()?;
        Ok(result)
    }

    pub fn call_void(&mut self, name: &str, args: &[JitValue]) -> JitResult<()> {
        self.check_return_type(name, |type_| type_.is_void(), "void")?;
        self.run_function(name, args).map(|_| ())
    }

    pub fn call_int(&mut self, name: &str, args: &[JitValue]) -> JitResult<i64> {
        self.check_return_type(name, |type_| *type_ == TypeId::Int, "int")?;
        self.run_function(name, args).map(|wide| wide.a as i64)
    }

    pub fn call_double(&mut self, name: &str, args: &[JitValue]) -> JitResult<f64> {
        self.check_return_type(name, |type_| *type_ == TypeId::Double, "double")?;
        self.run_function(name, args).map(|wide| f64::from_bits(wide.a))
    }

    pub fn call_bool(&mut self, name: &str, args: &[JitValue]) -> JitResult<bool> {
        self.check_return_type(name, |type_| *type_ == TypeId::Bool, "bool")?;
        self.run_function(name, args).map(|wide| wide.a != 0)
    }

    pub fn call_string(&mut self, name: &str, args: &[JitValue]) -> JitResult<String> {
        self.check_return_type(name, |type_| *type_ == TypeId::String, "string")?;
        let wide = self.run_function(name, args)?;
        let text = read_c_string(wide.a as *const std::os::raw::c_char);
        Ok(String::from_utf8_lossy(text).into_owned())
    }

    /// Calls a function returning `[int]`.
    pub fn call_int_vector(&mut self, name: &str, args: &[JitValue]) -> JitResult<Vec<i64>> {
        self.check_return_type(
            name,
            |type_| *type_ == TypeId::make_vector(TypeId::Int),
            "[int]",
        )?;
        let wide = self.run_function(name, args)?;
        Ok(VecT::from_wide(wide)
            .elements()
            .iter()
            .map(|word| *word as i64)
            .collect())
    }

    fn check_return_type(
        &self,
        name: &str,
        accepts: impl Fn(&TypeId) -> bool,
        expected: &str,
    ) -> JitResult<()> {
        let function = self.global_function(name)?;
        let return_type = function.function_type.function_signature().return_type.as_ref();
        if accepts(return_type) {
            Ok(())
        } else {
            Err(JitError::ArgumentMismatch {
                name: name.to_string(),
                message: format!("returns {}, not {}", return_type, expected),
            })
        }
    }

    /// The word encoding of a scalar. Strings are copied onto the runtime
    /// heap so they outlive the call.
    fn value_word(&mut self, value: &JitValue) -> u64 {
        match value {
            JitValue::Bool(flag) => *flag as u64,
            JitValue::Int(number) => *number as u64,
            JitValue::Double(number) => number.to_bits(),
            JitValue::String(text) => self.runtime.alloc_string_value(text) as u64,
        }
    }

    /// # Safety
    ///
    /// `args` and `R` must match the LLVM signature of `name`.
    unsafe fn invoke<R>(&self, name: &str, runtime: *mut FloydRuntime, args: &[NativeArg]) -> JitResult<R> {
        use NativeArg::{Double as D, Word as W};

        let result = match *args {
            [] => invoke_native!(self, name, runtime, R),
            [W(a)] => invoke_native!(self, name, runtime, R, a => u64),
            [D(a)] => invoke_native!(self, name, runtime, R, a => f64),
            [W(a), W(b)] => invoke_native!(self, name, runtime, R, a => u64, b => u64),
            [W(a), D(b)] => invoke_native!(self, name, runtime, R, a => u64, b => f64),
            [D(a), W(b)] => invoke_native!(self, name, runtime, R, a => f64, b => u64),
            [D(a), D(b)] => invoke_native!(self, name, runtime, R, a => f64, b => f64),
            [W(a), W(b), W(c)] => invoke_native!(self, name, runtime, R, a => u64, b => u64, c => u64),
            [W(a), W(b), D(c)] => invoke_native!(self, name, runtime, R, a => u64, b => u64, c => f64),
            [W(a), D(b), W(c)] => invoke_native!(self, name, runtime, R, a => u64, b => f64, c => u64),
            [W(a), D(b), D(c)] => invoke_native!(self, name, runtime, R, a => u64, b => f64, c => f64),
            [D(a), W(b), W(c)] => invoke_native!(self, name, runtime, R, a => f64, b => u64, c => u64),
            [D(a), W(b), D(c)] => invoke_native!(self, name, runtime, R, a => f64, b => u64, c => f64),
            [D(a), D(b), W(c)] => invoke_native!(self, name, runtime, R, a => f64, b => f64, c => u64),
            [D(a), D(b), D(c)] => invoke_native!(self, name, runtime, R, a => f64, b => f64, c => f64),
            [W(a), W(b), W(c), W(d)] => {
                invoke_native!(self, name, runtime, R, a => u64, b => u64, c => u64, d => u64)
            }
            _ => {
                return Err(JitError::UnsupportedSignature {
                    name: name.to_string(),
                    message: format!("{} native arguments", args.len()),
                })
            }
        };
        Ok(result)
    }
}
