use pretty_assertions::assert_eq;

use crate::{
    ast::{
        ast::{Body, FunctionDefinition, SemanticAst, Symbol, SymbolTable, VariableAddress},
        expressions::{Expression, Value},
        statements::Statement,
        types::{Member, Purity, TypeId},
    },
    compiler::compiler::{generate_llvm_ir_program, LlvmInstance},
    errors::errors::JitError,
    jit::engine::{get_global_function, make_engine_run_init},
};

fn globals(symbols: Vec<(&str, Symbol)>, statements: Vec<Statement>) -> Body {
    let mut table = SymbolTable::new();
    for (name, symbol) in symbols {
        table.add(name, symbol);
    }
    Body::new(statements, table)
}

#[test]
fn test_constant_global_is_initialized() {
    let ast = SemanticAst::new(
        globals(vec![("answer", Symbol::constant(TypeId::Int, Value::Int(42)))], vec![]),
        vec![],
    );
    let instance = LlvmInstance::new();
    let program = generate_llvm_ir_program(&instance, &ast, "constant_global");
    let engine = make_engine_run_init(&instance, program).unwrap();

    assert_eq!(engine.read_global_int("answer"), Ok(42));
    assert_eq!(engine.format_global("answer"), Ok("42".to_string()));
}

#[test]
fn test_global_lookup_errors() {
    let ast = SemanticAst::new(
        globals(
            vec![("ratio", Symbol::mutable(TypeId::Double))],
            vec![Statement::Store {
                address: VariableAddress::global(0),
                value: Expression::literal_double(0.5),
            }],
        ),
        vec![],
    );
    let instance = LlvmInstance::new();
    let program = generate_llvm_ir_program(&instance, &ast, "global_errors");
    let engine = make_engine_run_init(&instance, program).unwrap();

    assert_eq!(engine.read_global_double("ratio"), Ok(0.5));
    assert_eq!(
        engine.read_global_int("missing"),
        Err(JitError::GlobalNotFound {
            name: "missing".to_string()
        })
    );
    assert!(matches!(
        engine.read_global_int("ratio"),
        Err(JitError::GlobalTypeMismatch { .. })
    ));
}

#[test]
fn test_global_function_only_finds_floyd_functions() {
    let function_type = TypeId::make_function(TypeId::Int, vec![], Purity::Pure);
    let body = Body::from_statements(vec![Statement::Return(Expression::literal_int(7))]);
    let ast = SemanticAst::new(
        Body::default(),
        vec![FunctionDefinition::floyd("seven", function_type.clone(), body)],
    );
    let instance = LlvmInstance::new();
    let program = generate_llvm_ir_program(&instance, &ast, "global_function");
    let engine = make_engine_run_init(&instance, program).unwrap();

    let function = get_global_function(&engine, "seven").unwrap();
    assert_eq!(function.function_type, function_type);
    assert_ne!(function.address, 0);

    assert!(matches!(
        get_global_function(&engine, "floyd_runtime__allocate_vector"),
        Err(JitError::FunctionNotFound { .. })
    ));
}

#[test]
fn test_struct_layouts_come_from_target_data() {
    let point = TypeId::make_struct(vec![
        Member::new("flag", TypeId::Bool),
        Member::new("x", TypeId::Int),
    ]);
    let ast = SemanticAst::new(globals(vec![("origin", Symbol::mutable(point.clone()))], vec![]), vec![]);
    let instance = LlvmInstance::new();
    let program = generate_llvm_ir_program(&instance, &ast, "struct_layouts");
    let engine = make_engine_run_init(&instance, program).unwrap();

    let layout = engine.runtime().struct_layout(&point);
    assert_eq!(layout.offsets, vec![0, 8]);
    assert_eq!(layout.size, 16);
}
