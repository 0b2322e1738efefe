//! Main code generation module.
//!
//! This module contains the `CodeGenerator` structure and the module-level
//! passes that turn a `SemanticAst` into an LLVM module:
//!
//! - Prototype pass: runtime helpers, host functions, user functions,
//!   `floyd_runtime_init` and one LLVM global per top-level symbol
//! - Body pass: the global initialization code, then every user function
//! - Verification of each function and of the finished module

use inkwell::{
    basic_block::BasicBlock,
    builder::Builder,
    context::Context,
    module::{Linkage, Module},
    targets::{CodeModel, InitializationConfig, RelocMode, Target, TargetMachine},
    types::{BasicMetadataTypeEnum, BasicTypeEnum, FunctionType},
    values::{AnyValue, BasicValue, BasicValueEnum, FunctionValue, IntValue, PointerValue},
    AddressSpace, OptimizationLevel,
};
use tracing::{debug, error, instrument};

use crate::{
    ast::{
        ast::{FunctionBody, SemanticAst},
        expressions::Value,
        interner::TypeInterner,
        types::TypeId,
    },
    config::GeneratorConfig,
    runtime::{host_function_symbol, RuntimeFunction},
};

use super::{
    scope::{ResolvedSymbol, ScopeStack, SymbolType},
    stmt::{gen_function_body, gen_runtime_init_body},
    types::TypeMapper,
};

pub const RUNTIME_INIT_NAME: &str = "floyd_runtime_init";
/// Returned by `floyd_runtime_init` once all globals are initialized.
pub const RUNTIME_INIT_SENTINEL: i64 = 667;

/// One function known to the module: a runtime helper, a host function, a
/// user function or the runtime init function.
#[derive(Debug, Clone)]
pub struct FunctionDef<'a> {
    pub name: String,
    pub llvm_function: FunctionValue<'a>,
    /// Index into `SemanticAst::function_defs`. `None` for runtime helpers.
    pub floyd_function_id: Option<usize>,
    pub floyd_type: Option<TypeId>,
}

/// The LLVM context together with generation options.
pub struct LlvmInstance {
    pub context: Context,
    pub config: GeneratorConfig,
}

impl Default for LlvmInstance {
    fn default() -> Self {
        Self::new()
    }
}

impl LlvmInstance {
    pub fn new() -> Self {
        Self::with_config(GeneratorConfig::from_env())
    }

    pub fn with_config(config: GeneratorConfig) -> Self {
        LlvmInstance {
            context: Context::create(),
            config,
        }
    }
}

/// A generated, verified module ready to be handed to the JIT.
pub struct LlvmIrProgram<'a> {
    pub module: Module<'a>,
    pub types: TypeMapper<'a>,
    pub interner: TypeInterner,
    pub function_defs: Vec<FunctionDef<'a>>,
    /// Name and type of every global, in slot order.
    pub debug_globals: Vec<(String, TypeId)>,
}

impl<'a> LlvmIrProgram<'a> {
    pub fn print_ir(&self) -> String {
        self.module.print_to_string().to_string()
    }

    pub fn find_function_def(&self, name: &str) -> Option<&FunctionDef<'a>> {
        self.function_defs.iter().find(|def| def.name == name)
    }
}

/// The state of one generation pass.
///
/// # Type Parameters
///
/// * `'a` - Lifetime of the LLVM context
/// * `'b` - Lifetime of the program tree being generated
pub struct CodeGenerator<'a, 'b> {
    /// Reference to the LLVM context
    pub context: &'a Context,
    /// The LLVM module being built
    pub module: Module<'a>,
    /// The LLVM IR builder
    pub builder: Builder<'a>,
    pub types: TypeMapper<'a>,
    pub ast: &'b SemanticAst,
    pub config: GeneratorConfig,

    pub function_defs: Vec<FunctionDef<'a>>,
    pub scopes: ScopeStack<'a>,
    /// The function whose body is being generated.
    pub current_function: Option<FunctionValue<'a>>,
    /// Floyd return type of the current function. `None` inside
    /// `floyd_runtime_init`.
    pub current_return_type: Option<TypeId>,
}

impl<'a, 'b> CodeGenerator<'a, 'b> {
    pub fn new(instance: &'a LlvmInstance, ast: &'b SemanticAst, module_name: &str) -> Self {
        let context = &instance.context;
        CodeGenerator {
            context,
            module: context.create_module(module_name),
            builder: context.create_builder(),
            types: TypeMapper::new(context),
            ast,
            config: instance.config.clone(),
            function_defs: vec![],
            scopes: ScopeStack::new(),
            current_function: None,
            current_return_type: None,
        }
    }

    pub fn interner(&self) -> &TypeInterner {
        &self.ast.interner
    }

    /// Packs a type into the i64 constant passed to runtime helpers.
    pub fn itype_constant(&self, type_: &TypeId) -> IntValue<'a> {
        let itype = self.interner().lookup_itype(type_);
        self.context.i64_type().const_int(itype.as_u64(), false)
    }

    /// Targets the module at the host, like the execution engine will.
    fn setup_target(&self) {
        Target::initialize_native(&InitializationConfig::default())
            .unwrap_or_else(|message| panic!("Failed to initialize native target: {}", message));
        let target_triple = TargetMachine::get_default_triple();
        let target = Target::from_triple(&target_triple)
            .unwrap_or_else(|message| panic!("Unknown target triple: {}", message));
        let target_machine = target
            .create_target_machine(
                &target_triple,
                "generic",
                "",
                OptimizationLevel::None,
                RelocMode::Default,
                CodeModel::JITDefault,
            )
            .unwrap_or_else(|| panic!("Failed to create target machine"));

        self.module.set_triple(&target_triple);
        self.module
            .set_data_layout(&target_machine.get_target_data().get_data_layout());
    }

    /// Declares every runtime helper with its native signature.
    fn declare_runtime_functions(&mut self) {
        let i8_ptr: BasicMetadataTypeEnum<'a> = self.types.runtime_ptr_type().into();
        let i64_type: BasicMetadataTypeEnum<'a> = self.context.i64_type().into();
        let i32_type = self.context.i32_type();
        let string: BasicMetadataTypeEnum<'a> = self.types.string_type().into();
        let json = self.types.json_type();
        let vec_ptr: BasicMetadataTypeEnum<'a> =
            self.types.vec_type.ptr_type(AddressSpace::default()).into();
        let dict_ptr: BasicMetadataTypeEnum<'a> =
            self.types.dict_type.ptr_type(AddressSpace::default()).into();
        let wide = self.types.wide_return_type;

        for function in RuntimeFunction::ALL {
            let function_type = match function {
                RuntimeFunction::AllocateVector => wide.fn_type(&[i8_ptr, i64_type], false),
                RuntimeFunction::AllocateDict => wide.fn_type(&[i8_ptr], false),
                RuntimeFunction::StoreDict => {
                    wide.fn_type(&[i8_ptr, dict_ptr, string, i64_type], false)
                }
                RuntimeFunction::LookupDict => self
                    .context
                    .i64_type()
                    .fn_type(&[i8_ptr, dict_ptr, string, i64_type], false),
                RuntimeFunction::AllocateStruct => self
                    .context
                    .i8_type()
                    .ptr_type(AddressSpace::default())
                    .fn_type(&[i8_ptr, i64_type], false),
                RuntimeFunction::CompareValues => i32_type.fn_type(
                    &[
                        i8_ptr, i64_type, i64_type, i64_type, i64_type, i64_type, i64_type,
                    ],
                    false,
                ),
                RuntimeFunction::CompareStrings => {
                    i32_type.fn_type(&[i8_ptr, i64_type, string, string], false)
                }
                RuntimeFunction::ConcatenateStrings => self
                    .types
                    .string_type()
                    .fn_type(&[i8_ptr, string, string], false),
                RuntimeFunction::ConcatenateVectors => {
                    wide.fn_type(&[i8_ptr, vec_ptr, vec_ptr], false)
                }
                RuntimeFunction::BoxWide => self
                    .context
                    .i64_type()
                    .fn_type(&[i8_ptr, i64_type, i64_type], false),
                RuntimeFunction::AllocateJson => {
                    json.fn_type(&[i8_ptr, i64_type, i64_type, i64_type], false)
                }
                RuntimeFunction::LookupJson => json.fn_type(
                    &[i8_ptr, json.into(), i64_type, i64_type, i64_type],
                    false,
                ),
                RuntimeFunction::CheckDivisor => self
                    .context
                    .void_type()
                    .fn_type(&[i8_ptr, i64_type], false),
                RuntimeFunction::CheckIndex => self
                    .context
                    .void_type()
                    .fn_type(&[i8_ptr, i64_type, i64_type], false),
                RuntimeFunction::StringLength => self
                    .context
                    .i64_type()
                    .fn_type(&[i8_ptr, string], false),
            };

            let llvm_function = self.create_function_proto(function.name(), function_type);
            self.function_defs.push(FunctionDef {
                name: function.name().to_string(),
                llvm_function,
                floyd_function_id: None,
                floyd_type: None,
            });
        }
    }

    /// # Panics
    ///
    /// Panics if the runtime helpers were not declared.
    pub fn runtime_function(&self, function: RuntimeFunction) -> FunctionValue<'a> {
        self.module
            .get_function(function.name())
            .unwrap_or_else(|| panic!("Runtime function {} not declared", function.name()))
    }

    /// Declares host functions (`floyd_funcdef__<name>`) and user functions.
    fn declare_floyd_functions(&mut self) {
        let ast = self.ast;
        for (function_id, function_def) in ast.function_defs.iter().enumerate() {
            let function_type = self.types.function_type(&function_def.function_type);
            let name = match function_def.body {
                FunctionBody::Host => host_function_symbol(&function_def.name),
                FunctionBody::Floyd(_) => function_def.name.clone(),
            };

            let llvm_function = self.create_function_proto(&name, function_type);
            self.function_defs.push(FunctionDef {
                name,
                llvm_function,
                floyd_function_id: Some(function_id),
                floyd_type: Some(function_def.function_type.clone()),
            });
        }
    }

    /// # Panics
    ///
    /// Panics if no prototype exists for the function.
    pub fn find_function_def_from_floyd_id(&self, function_id: usize) -> &FunctionDef<'a> {
        self.function_defs
            .iter()
            .find(|def| def.floyd_function_id == Some(function_id))
            .unwrap_or_else(|| panic!("No prototype for function #{}", function_id))
    }

    /// A compile-time constant usable as a global initializer.
    pub fn constant_value(&self, value: &Value) -> BasicValueEnum<'a> {
        match value {
            Value::Bool(value) => self
                .context
                .bool_type()
                .const_int(*value as u64, false)
                .into(),
            Value::Int(value) => self.context.i64_type().const_int(*value as u64, true).into(),
            Value::Double(value) => self.context.f64_type().const_float(*value).into(),
            Value::Typeid(type_) => self.itype_constant(type_).into(),
            Value::String(text) => self.constant_string(text).into(),
            Value::Function(function_id) => self
                .find_function_def_from_floyd_id(*function_id)
                .llvm_function
                .as_global_value()
                .as_pointer_value()
                .into(),
        }
    }

    /// A private, NUL-terminated string global cast to `i8*`.
    pub fn constant_string(&self, text: &str) -> PointerValue<'a> {
        let bytes = self.context.const_string(text.as_bytes(), true);
        let global = self.module.add_global(bytes.get_type(), None, ".str");
        global.set_initializer(&bytes);
        global.set_constant(true);
        global.set_linkage(Linkage::Private);
        global
            .as_pointer_value()
            .const_cast(self.types.string_type())
    }

    /// Creates one LLVM global per top-level symbol and opens the global frame.
    fn declare_globals(&mut self) -> Vec<(String, TypeId)> {
        let mut resolved = vec![];
        let mut debug_globals = vec![];

        let ast = self.ast;
        for (name, symbol) in ast.globals.symbol_table.symbols.iter() {
            let llvm_type = self.types.intern_type(&symbol.value_type);
            let global = self.module.add_global(llvm_type, None, name);

            let initializer = symbol
                .init
                .as_ref()
                .map(|value| self.constant_value(value))
                .unwrap_or_else(|| zero_value(llvm_type));
            global.set_initializer(&initializer);

            debug!(global = %name, type_ = %symbol.value_type, "declared global");
            resolved.push(ResolvedSymbol::new(
                global.as_pointer_value().into(),
                SymbolType::Global,
                name,
                symbol.clone(),
            ));
            debug_globals.push((name.clone(), symbol.value_type.clone()));
        }

        self.scopes.push_frame(resolved);
        debug_globals
    }

    /// Creates the function prototype in the module.
    pub fn create_function_proto(
        &self,
        name: &str,
        function_type: FunctionType<'a>,
    ) -> FunctionValue<'a> {
        self.module
            .add_function(name, function_type, Some(Linkage::External))
    }

    /// Creates the entry basic block for a function and positions the
    /// builder at its end.
    pub fn create_function_block(&mut self, function: FunctionValue<'a>) -> BasicBlock<'a> {
        let entry = self.context.append_basic_block(function, "entry");
        self.builder.position_at_end(entry);
        self.current_function = Some(function);
        entry
    }

    /// Appends a basic block to the current function.
    pub fn create_basic_block(&self, name: &str) -> BasicBlock<'a> {
        self.context.append_basic_block(self.current_function(), name)
    }

    pub fn current_function(&self) -> FunctionValue<'a> {
        self.current_function
            .unwrap_or_else(|| panic!("No function is being generated"))
    }

    /// The hidden runtime context argument of the current function.
    pub fn runtime_ptr(&self) -> BasicValueEnum<'a> {
        self.current_function()
            .get_first_param()
            .unwrap_or_else(|| panic!("Function has no runtime argument"))
    }

    /// Whether the builder's block already ends in a terminator.
    pub fn is_block_terminated(&self) -> bool {
        self.builder
            .get_insert_block()
            .and_then(|block| block.get_terminator())
            .is_some()
    }

    /// Reserves a stack slot in the entry block of the current function.
    pub fn build_entry_alloca(&self, llvm_type: BasicTypeEnum<'a>, name: &str) -> PointerValue<'a> {
        let entry = self
            .current_function()
            .get_first_basic_block()
            .unwrap_or_else(|| panic!("Function has no entry block"));

        let entry_builder = self.context.create_builder();
        match entry.get_first_instruction() {
            Some(instruction) => entry_builder.position_before(&instruction),
            None => entry_builder.position_at_end(entry),
        }
        entry_builder.build_alloca(llvm_type, name).unwrap()
    }

    /// # Panics
    ///
    /// Panics with the function's IR if LLVM rejects it.
    fn verify_function(&self, function: FunctionValue<'a>) {
        if !function.verify(true) {
            let ir = function.print_to_string().to_string();
            error!(function = ?function.get_name(), ir = %ir, "LLVM function verification failed");
            panic!("Invalid LLVM function {:?}:\n{}", function.get_name(), ir);
        }
    }

    fn gen_runtime_init(&mut self) {
        let function_type = self
            .context
            .i64_type()
            .fn_type(&[self.types.runtime_ptr_type().into()], false);
        let function = self.create_function_proto(RUNTIME_INIT_NAME, function_type);
        self.function_defs.push(FunctionDef {
            name: RUNTIME_INIT_NAME.to_string(),
            llvm_function: function,
            floyd_function_id: None,
            floyd_type: None,
        });

        self.create_function_block(function);
        self.current_return_type = None;
        gen_runtime_init_body(self);
        self.verify_function(function);
    }

    fn gen_function_bodies(&mut self) {
        let ast = self.ast;
        for (function_id, function_def) in ast.function_defs.iter().enumerate() {
            if let FunctionBody::Floyd(body) = &function_def.body {
                debug!(function = %function_def.name, "generating function body");
                let function = self
                    .find_function_def_from_floyd_id(function_id)
                    .llvm_function;

                self.create_function_block(function);
                let signature = function_def.function_type.function_signature();
                self.current_return_type = Some(signature.return_type.as_ref().clone());
                gen_function_body(self, &function_def.function_type, body);
                self.verify_function(function);
            }
        }
        self.current_function = None;
        self.current_return_type = None;
    }

    /// Runs both passes and verifies the finished module.
    fn generate(mut self) -> LlvmIrProgram<'a> {
        self.setup_target();
        self.declare_runtime_functions();
        self.declare_floyd_functions();
        let debug_globals = self.declare_globals();

        self.gen_runtime_init();
        self.gen_function_bodies();
        self.scopes.pop_frame();

        if let Err(message) = self.module.verify() {
            let ir = self.module.print_to_string().to_string();
            error!(ir = %ir, "LLVM module verification failed");
            panic!("Invalid LLVM module: {}", message.to_string());
        }

        LlvmIrProgram {
            module: self.module,
            types: self.types,
            interner: self.ast.interner.clone(),
            function_defs: self.function_defs,
            debug_globals,
        }
    }
}

/// The all-zero value of an LLVM type.
pub fn zero_value(llvm_type: BasicTypeEnum<'_>) -> BasicValueEnum<'_> {
    match llvm_type {
        BasicTypeEnum::IntType(int_type) => int_type.const_zero().as_basic_value_enum(),
        BasicTypeEnum::FloatType(float_type) => float_type.const_zero().as_basic_value_enum(),
        BasicTypeEnum::PointerType(pointer_type) => pointer_type.const_null().as_basic_value_enum(),
        BasicTypeEnum::StructType(struct_type) => struct_type.const_zero().as_basic_value_enum(),
        BasicTypeEnum::ArrayType(array_type) => array_type.const_zero().as_basic_value_enum(),
        BasicTypeEnum::VectorType(vector_type) => vector_type.const_zero().as_basic_value_enum(),
    }
}

/// Generates and verifies the LLVM module for a program.
///
/// # Panics
///
/// Panics on internal defects: a type with no LLVM mapping, a malformed
/// program tree, or IR rejected by the verifier.
#[instrument(skip_all, fields(module = module_name))]
pub fn generate_llvm_ir_program<'a>(
    instance: &'a LlvmInstance,
    ast: &SemanticAst,
    module_name: &str,
) -> LlvmIrProgram<'a> {
    assert!(ast.interner.is_frozen(), "Type table must be frozen before generation");
    debug!(
        functions = ast.function_defs.len(),
        globals = ast.globals.symbol_table.len(),
        "generating LLVM IR"
    );

    CodeGenerator::new(instance, ast, module_name).generate()
}
