use inkwell::values::AnyValue;

use floyd_llvm::{
    ast::{
        ast::{Body, FunctionDefinition, SemanticAst, Symbol, SymbolTable, VariableAddress},
        expressions::{ArithmeticOp, ComparisonOp, Expression, ExpressionKind},
        statements::{RangeType, Statement},
        types::{Member, Purity, TypeId},
    },
    generate_llvm_ir_program, make_engine_no_init, make_engine_run_init,
    runtime::{corelib::corelib_function_defs, FloydRuntime},
    JitError, JitValue, LlvmInstance,
};
use pretty_assertions::assert_eq;
use serde_json::json;

/// Corelib host functions come first, user functions follow.
fn program(globals: Body, user_functions: Vec<FunctionDefinition>) -> SemanticAst {
    let mut function_defs = corelib_function_defs();
    function_defs.extend(user_functions);
    SemanticAst::new(globals, function_defs)
}

fn user_function_id(index: usize) -> usize {
    corelib_function_defs().len() + index
}

fn corelib_call(name: &str, args: Vec<Expression>, output_type: TypeId) -> Expression {
    let defs = corelib_function_defs();
    let id = defs
        .iter()
        .position(|def| def.name == name)
        .unwrap();
    let callee = Expression::literal_function(id, defs[id].function_type.clone());
    Expression::call(callee, args, output_type)
}

fn user_call(index: usize, function_type: &TypeId, args: Vec<Expression>, output_type: TypeId) -> Expression {
    let callee = Expression::literal_function(user_function_id(index), function_type.clone());
    Expression::call(callee, args, output_type)
}

fn table(symbols: Vec<(&str, Symbol)>) -> SymbolTable {
    let mut table = SymbolTable::new();
    for (name, symbol) in symbols {
        table.add(name, symbol);
    }
    table
}

fn store_global(index: usize, value: Expression) -> Statement {
    Statement::Store {
        address: VariableAddress::global(index),
        value,
    }
}

fn global(index: usize, type_: TypeId) -> Expression {
    Expression::load(VariableAddress::global(index), type_)
}

fn arg(index: usize, type_: TypeId) -> Expression {
    Expression::load(VariableAddress::local(0, index), type_)
}

/// A function argument read from inside an `if` branch, one frame deeper.
fn branch_arg(index: usize, type_: TypeId) -> Expression {
    Expression::load(VariableAddress::local(1, index), type_)
}

fn int_vector(values: &[i64]) -> Expression {
    Expression::construct(
        TypeId::make_vector(TypeId::Int),
        values.iter().map(|value| Expression::literal_int(*value)).collect(),
    )
}

#[test]
fn test_global_arithmetic() {
    let sum = Expression::arithmetic(
        ArithmeticOp::Add,
        Expression::arithmetic(ArithmeticOp::Add, Expression::literal_int(1), Expression::literal_int(2)),
        Expression::literal_int(3),
    );
    let globals = Body::new(
        vec![store_global(0, sum)],
        table(vec![("result", Symbol::mutable(TypeId::Int))]),
    );
    let ast = program(globals, vec![]);

    let instance = LlvmInstance::new();
    let program = generate_llvm_ir_program(&instance, &ast, "arithmetic");
    let engine = make_engine_run_init(&instance, program).unwrap();

    assert_eq!(engine.read_global_int("result"), Ok(6));
}

#[test]
fn test_call_with_int_and_double_arguments() {
    let function_type = TypeId::make_function(TypeId::Int, vec![TypeId::Int, TypeId::Double], Purity::Pure);
    let body = Body::new(
        vec![Statement::If {
            condition: Expression::comparison(
                ComparisonOp::Larger,
                arg(1, TypeId::Double),
                Expression::literal_double(1.0),
            ),
            then_body: Body::from_statements(vec![Statement::Return(Expression::arithmetic(
                ArithmeticOp::Multiply,
                branch_arg(0, TypeId::Int),
                Expression::literal_int(10),
            ))]),
            else_body: Body::from_statements(vec![Statement::Return(branch_arg(0, TypeId::Int))]),
        }],
        table(vec![
            ("a", Symbol::argument(TypeId::Int)),
            ("b", Symbol::argument(TypeId::Double)),
        ]),
    );
    let ast = program(
        Body::default(),
        vec![FunctionDefinition::floyd("f", function_type, body)],
    );

    let instance = LlvmInstance::new();
    let program = generate_llvm_ir_program(&instance, &ast, "int_double_call");
    let mut engine = make_engine_run_init(&instance, program).unwrap();

    assert_eq!(engine.call_int("f", &[JitValue::Int(3), JitValue::Double(1.5)]), Ok(30));
    assert_eq!(engine.call_int("f", &[JitValue::Int(3), JitValue::Double(0.5)]), Ok(3));

    let f = unsafe {
        engine
            .get_function::<unsafe extern "C" fn(*mut FloydRuntime, i64, f64) -> i64>("f")
            .unwrap()
    };
    let runtime = engine.runtime_ptr();
    assert_eq!(unsafe { f.call(runtime, 3, 1.5) }, 30);
}

#[test]
fn test_any_argument_takes_two_params() {
    let function_type = TypeId::make_function(TypeId::Void, vec![TypeId::Any], Purity::Impure);
    let body = Body::new(
        vec![Statement::Expression(corelib_call(
            "print",
            vec![arg(0, TypeId::Any)],
            TypeId::Void,
        ))],
        table(vec![("x", Symbol::argument(TypeId::Any))]),
    );
    let ast = program(
        Body::default(),
        vec![FunctionDefinition::floyd("show", function_type, body)],
    );

    let instance = LlvmInstance::new();
    let program = generate_llvm_ir_program(&instance, &ast, "any_argument");
    let mut engine = make_engine_run_init(&instance, program).unwrap();

    let show_function = engine.module().get_function("show").unwrap();
    assert_eq!(show_function.count_params(), 3);

    let int_itype = engine.runtime().interner.lookup_itype(&TypeId::Int).as_u64();
    let show = unsafe {
        engine
            .get_function::<unsafe extern "C" fn(*mut FloydRuntime, u64, u64)>("show")
            .unwrap()
    };
    let runtime = engine.runtime_ptr();
    unsafe { show.call(runtime, 42, int_itype) };

    engine.call_void("show", &[JitValue::Double(2.5)]).unwrap();
    engine.call_void("show", &[JitValue::String("hi".to_string())]).unwrap();

    assert_eq!(
        engine.print_output(),
        &["42".to_string(), "2.5".to_string(), "hi".to_string()]
    );
}

#[test]
fn test_vector_lookup_and_size() {
    let vector_type = TypeId::make_vector(TypeId::Int);
    let globals = Body::new(
        vec![
            store_global(0, int_vector(&[1, 2, 3])),
            store_global(
                1,
                Expression::lookup(global(0, vector_type.clone()), Expression::literal_int(1), TypeId::Int),
            ),
            store_global(2, corelib_call("size", vec![global(0, vector_type.clone())], TypeId::Int)),
        ],
        table(vec![
            ("v", Symbol::mutable(vector_type)),
            ("element", Symbol::mutable(TypeId::Int)),
            ("count", Symbol::mutable(TypeId::Int)),
        ]),
    );
    let ast = program(globals, vec![]);

    let instance = LlvmInstance::new();
    let program = generate_llvm_ir_program(&instance, &ast, "vector");
    let engine = make_engine_run_init(&instance, program).unwrap();

    assert_eq!(engine.read_global_int("element"), Ok(2));
    assert_eq!(engine.read_global_int("count"), Ok(3));
    assert_eq!(engine.read_global_vector("v"), Ok(vec![json!(1), json!(2), json!(3)]));
    assert_eq!(engine.format_global("v"), Ok("[1, 2, 3]".to_string()));
}

#[test]
fn test_if_else_both_returning_has_no_join_block() {
    let function_type = TypeId::make_function(TypeId::Int, vec![], Purity::Pure);
    let body = Body::from_statements(vec![Statement::If {
        condition: Expression::literal_bool(false),
        then_body: Body::from_statements(vec![Statement::Return(Expression::literal_int(1))]),
        else_body: Body::from_statements(vec![Statement::Return(Expression::literal_int(2))]),
    }]);
    let globals = Body::new(
        vec![store_global(0, user_call(0, &function_type, vec![], TypeId::Int))],
        table(vec![("picked", Symbol::mutable(TypeId::Int))]),
    );
    let ast = program(globals, vec![FunctionDefinition::floyd("pick", function_type.clone(), body)]);

    let instance = LlvmInstance::new();
    let program = generate_llvm_ir_program(&instance, &ast, "if_else");
    let pick_ir = program
        .module
        .get_function("pick")
        .unwrap()
        .print_to_string()
        .to_string();
    assert!(!pick_ir.contains("if_join"));

    let engine = make_engine_run_init(&instance, program).unwrap();
    assert_eq!(engine.read_global_int("picked"), Ok(2));
}

#[test]
fn test_one_sided_return_keeps_join_block() {
    let function_type = TypeId::make_function(TypeId::Int, vec![TypeId::Int], Purity::Pure);
    let body = Body::new(
        vec![
            Statement::If {
                condition: Expression::comparison(
                    ComparisonOp::Smaller,
                    arg(0, TypeId::Int),
                    Expression::literal_int(0),
                ),
                then_body: Body::from_statements(vec![Statement::Return(Expression::literal_int(0))]),
                else_body: Body::default(),
            },
            Statement::Return(arg(0, TypeId::Int)),
        ],
        table(vec![("x", Symbol::argument(TypeId::Int))]),
    );
    let ast = program(
        Body::default(),
        vec![FunctionDefinition::floyd("clamp", function_type, body)],
    );

    let instance = LlvmInstance::new();
    let program = generate_llvm_ir_program(&instance, &ast, "one_sided");
    assert!(program.print_ir().contains("if_join"));

    let mut engine = make_engine_run_init(&instance, program).unwrap();
    assert_eq!(engine.call_int("clamp", &[JitValue::Int(-4)]), Ok(0));
    assert_eq!(engine.call_int("clamp", &[JitValue::Int(9)]), Ok(9));
}

#[test]
fn test_wide_returns() {
    let vector_type = TypeId::make_vector(TypeId::Int);
    let dict_type = TypeId::make_dict(TypeId::Int);

    let make_pair_type = TypeId::make_function(vector_type.clone(), vec![TypeId::Int], Purity::Pure);
    let make_pair = Body::new(
        vec![Statement::Return(Expression::construct(
            vector_type.clone(),
            vec![
                arg(0, TypeId::Int),
                Expression::arithmetic(ArithmeticOp::Add, arg(0, TypeId::Int), Expression::literal_int(1)),
            ],
        ))],
        table(vec![("n", Symbol::argument(TypeId::Int))]),
    );

    let scores_type = TypeId::make_function(dict_type.clone(), vec![], Purity::Pure);
    let scores = Body::from_statements(vec![Statement::Return(Expression::construct(
        dict_type.clone(),
        vec![
            Expression::literal_string("a"),
            Expression::literal_int(1),
            Expression::literal_string("b"),
            Expression::literal_int(2),
        ],
    ))]);

    let identity_type = TypeId::make_function(TypeId::Any, vec![TypeId::Any], Purity::Pure);
    let identity = Body::new(
        vec![Statement::Return(arg(0, TypeId::Any))],
        table(vec![("x", Symbol::argument(TypeId::Any))]),
    );

    let globals = Body::new(
        vec![
            store_global(
                0,
                user_call(0, &make_pair_type, vec![Expression::literal_int(5)], vector_type.clone()),
            ),
            store_global(
                1,
                Expression::lookup(
                    user_call(1, &scores_type, vec![], dict_type.clone()),
                    Expression::literal_string("b"),
                    TypeId::Int,
                ),
            ),
            store_global(
                2,
                Expression::arithmetic(
                    ArithmeticOp::Add,
                    user_call(2, &identity_type, vec![Expression::literal_int(41)], TypeId::Int),
                    Expression::literal_int(1),
                ),
            ),
        ],
        table(vec![
            ("pair", Symbol::mutable(vector_type)),
            ("b", Symbol::mutable(TypeId::Int)),
            ("k", Symbol::mutable(TypeId::Int)),
        ]),
    );
    let ast = program(
        globals,
        vec![
            FunctionDefinition::floyd("make_pair", make_pair_type, make_pair),
            FunctionDefinition::floyd("scores", scores_type, scores),
            FunctionDefinition::floyd("identity", identity_type, identity),
        ],
    );

    let instance = LlvmInstance::new();
    let program = generate_llvm_ir_program(&instance, &ast, "wide_returns");
    let mut engine = make_engine_run_init(&instance, program).unwrap();

    assert_eq!(engine.read_global_vector("pair"), Ok(vec![json!(5), json!(6)]));
    assert_eq!(engine.read_global_int("b"), Ok(2));
    assert_eq!(engine.read_global_int("k"), Ok(42));

    assert_eq!(engine.call_int_vector("make_pair", &[JitValue::Int(10)]), Ok(vec![10, 11]));

    let wide = engine.run_function("identity", &[JitValue::Int(7)]).unwrap();
    let int_itype = engine.runtime().interner.lookup_itype(&TypeId::Int).as_u64();
    assert_eq!((wide.a, wide.b), (7, int_itype));
}

#[test]
fn test_struct_member_access() {
    let inner = TypeId::make_struct(vec![Member::new("z", TypeId::Double)]);
    let point = TypeId::make_struct(vec![
        Member::new("x", TypeId::Int),
        Member::new("label", TypeId::String),
        Member::new("inner", inner.clone()),
        Member::new("tags", TypeId::make_vector(TypeId::Int)),
    ]);
    let make_point_type = TypeId::make_function(point.clone(), vec![TypeId::Int], Purity::Pure);
    let make_point = Body::new(
        vec![Statement::Return(Expression::construct(
            point.clone(),
            vec![
                arg(0, TypeId::Int),
                Expression::literal_string("seven"),
                Expression::construct(inner.clone(), vec![Expression::literal_double(0.5)]),
                int_vector(&[4, 5]),
            ],
        ))],
        table(vec![("x", Symbol::argument(TypeId::Int))]),
    );

    let p = || global(0, point.clone());
    let globals = Body::new(
        vec![
            store_global(0, user_call(0, &make_point_type, vec![Expression::literal_int(7)], point.clone())),
            store_global(1, Expression::resolve_member(p(), "x")),
            store_global(2, Expression::resolve_member(p(), "label")),
            store_global(3, Expression::resolve_member(Expression::resolve_member(p(), "inner"), "z")),
            store_global(
                4,
                Expression::lookup(Expression::resolve_member(p(), "tags"), Expression::literal_int(1), TypeId::Int),
            ),
            store_global(
                5,
                Expression::comparison(ComparisonOp::Equal, p(), p()),
            ),
        ],
        table(vec![
            ("p", Symbol::mutable(point.clone())),
            ("px", Symbol::mutable(TypeId::Int)),
            ("label", Symbol::mutable(TypeId::String)),
            ("z", Symbol::mutable(TypeId::Double)),
            ("tag", Symbol::mutable(TypeId::Int)),
            ("same", Symbol::mutable(TypeId::Bool)),
        ]),
    );
    let ast = program(globals, vec![FunctionDefinition::floyd("make_point", make_point_type, make_point)]);

    let instance = LlvmInstance::new();
    let program = generate_llvm_ir_program(&instance, &ast, "structs");
    let engine = make_engine_run_init(&instance, program).unwrap();

    assert_eq!(engine.read_global_int("px"), Ok(7));
    assert_eq!(engine.read_global_string("label"), Ok("seven".to_string()));
    assert_eq!(engine.read_global_double("z"), Ok(0.5));
    assert_eq!(engine.read_global_int("tag"), Ok(5));
    assert_eq!(engine.read_global_bool("same"), Ok(true));
    assert_eq!(
        engine.format_global("p"),
        Ok("{x=7, label=\"seven\", inner={z=0.5}, tags=[4, 5]}".to_string())
    );
}

#[test]
fn test_logical_operators_short_circuit() {
    let noisy_type = TypeId::make_function(TypeId::Bool, vec![], Purity::Impure);
    let noisy = Body::from_statements(vec![
        Statement::Expression(corelib_call(
            "print",
            vec![Expression::literal_string("called")],
            TypeId::Void,
        )),
        Statement::Return(Expression::literal_bool(true)),
    ]);
    let call_noisy = || user_call(0, &noisy_type, vec![], TypeId::Bool);

    let globals = Body::new(
        vec![
            store_global(
                0,
                Expression::arithmetic(ArithmeticOp::LogicalAnd, Expression::literal_bool(false), call_noisy()),
            ),
            store_global(
                1,
                Expression::arithmetic(ArithmeticOp::LogicalOr, Expression::literal_bool(true), call_noisy()),
            ),
            store_global(
                2,
                Expression::arithmetic(ArithmeticOp::LogicalAnd, Expression::literal_bool(true), call_noisy()),
            ),
        ],
        table(vec![
            ("and_false", Symbol::mutable(TypeId::Bool)),
            ("or_true", Symbol::mutable(TypeId::Bool)),
            ("and_true", Symbol::mutable(TypeId::Bool)),
        ]),
    );
    let ast = program(globals, vec![FunctionDefinition::floyd("noisy", noisy_type.clone(), noisy)]);

    let instance = LlvmInstance::new();
    let program = generate_llvm_ir_program(&instance, &ast, "short_circuit");
    let engine = make_engine_run_init(&instance, program).unwrap();

    assert_eq!(engine.read_global_bool("and_false"), Ok(false));
    assert_eq!(engine.read_global_bool("or_true"), Ok(true));
    assert_eq!(engine.read_global_bool("and_true"), Ok(true));
    assert_eq!(engine.print_output(), &["called".to_string()]);
}

#[test]
fn test_division_by_zero_is_a_runtime_error() {
    let globals = Body::new(
        vec![
            store_global(0, Expression::literal_int(0)),
            store_global(
                1,
                Expression::arithmetic(ArithmeticOp::Divide, Expression::literal_int(10), global(0, TypeId::Int)),
            ),
        ],
        table(vec![
            ("zero", Symbol::mutable(TypeId::Int)),
            ("quotient", Symbol::mutable(TypeId::Int)),
        ]),
    );
    let ast = program(globals, vec![]);

    let instance = LlvmInstance::new();
    let program = generate_llvm_ir_program(&instance, &ast, "division");
    match make_engine_run_init(&instance, program) {
        Err(error) => assert_eq!(
            error,
            JitError::Runtime {
                message: "Division by zero".to_string()
            }
        ),
        Ok(_) => panic!("Expected a runtime error"),
    };
}

#[test]
fn test_missing_dict_key_is_a_runtime_error() {
    let dict_type = TypeId::make_dict(TypeId::Int);
    let globals = Body::new(
        vec![
            store_global(
                0,
                Expression::construct(
                    dict_type.clone(),
                    vec![Expression::literal_string("a"), Expression::literal_int(1)],
                ),
            ),
            store_global(
                1,
                Expression::lookup(global(0, dict_type.clone()), Expression::literal_string("zzz"), TypeId::Int),
            ),
        ],
        table(vec![
            ("d", Symbol::mutable(dict_type)),
            ("missing", Symbol::mutable(TypeId::Int)),
        ]),
    );
    let ast = program(globals, vec![]);

    let instance = LlvmInstance::new();
    let program = generate_llvm_ir_program(&instance, &ast, "dict_missing");
    match make_engine_run_init(&instance, program) {
        Err(JitError::Runtime { message }) => assert!(message.contains("zzz")),
        Err(other) => panic!("Unexpected error {}", other),
        Ok(_) => panic!("Expected a runtime error"),
    };
}

#[test]
fn test_strings() {
    let globals = Body::new(
        vec![
            store_global(
                0,
                Expression::arithmetic(
                    ArithmeticOp::Add,
                    Expression::literal_string("ab"),
                    Expression::literal_string("cd"),
                ),
            ),
            store_global(
                1,
                Expression::comparison(
                    ComparisonOp::Smaller,
                    Expression::literal_string("abc"),
                    Expression::literal_string("abd"),
                ),
            ),
            store_global(
                2,
                Expression::lookup(global(0, TypeId::String), Expression::literal_int(1), TypeId::Int),
            ),
            store_global(
                3,
                corelib_call("to_string", vec![Expression::literal_double(2.0)], TypeId::String),
            ),
        ],
        table(vec![
            ("joined", Symbol::mutable(TypeId::String)),
            ("smaller", Symbol::mutable(TypeId::Bool)),
            ("second", Symbol::mutable(TypeId::Int)),
            ("rendered", Symbol::mutable(TypeId::String)),
        ]),
    );
    let ast = program(globals, vec![]);

    let instance = LlvmInstance::new();
    let program = generate_llvm_ir_program(&instance, &ast, "strings");
    let engine = make_engine_run_init(&instance, program).unwrap();

    assert_eq!(engine.read_global_string("joined"), Ok("abcd".to_string()));
    assert_eq!(engine.read_global_bool("smaller"), Ok(true));
    assert_eq!(engine.read_global_int("second"), Ok(b'b' as i64));
    assert_eq!(engine.read_global_string("rendered"), Ok("2.0".to_string()));
}

#[test]
fn test_vector_concatenation_comparison_and_push_back() {
    let vector_type = TypeId::make_vector(TypeId::Int);
    let globals = Body::new(
        vec![
            store_global(
                0,
                Expression::arithmetic(ArithmeticOp::Add, int_vector(&[1, 2]), int_vector(&[3])),
            ),
            store_global(
                1,
                Expression::comparison(ComparisonOp::Smaller, int_vector(&[1, 2]), int_vector(&[1, 3])),
            ),
            store_global(
                2,
                Expression::comparison(ComparisonOp::Equal, int_vector(&[]), int_vector(&[])),
            ),
            store_global(
                3,
                corelib_call(
                    "push_back",
                    vec![global(0, vector_type.clone()), Expression::literal_int(4)],
                    vector_type.clone(),
                ),
            ),
        ],
        table(vec![
            ("joined", Symbol::mutable(vector_type.clone())),
            ("smaller", Symbol::mutable(TypeId::Bool)),
            ("empty_equal", Symbol::mutable(TypeId::Bool)),
            ("pushed", Symbol::mutable(vector_type)),
        ]),
    );
    let ast = program(globals, vec![]);

    let instance = LlvmInstance::new();
    let program = generate_llvm_ir_program(&instance, &ast, "vectors");
    let engine = make_engine_run_init(&instance, program).unwrap();

    assert_eq!(engine.read_global_vector("joined"), Ok(vec![json!(1), json!(2), json!(3)]));
    assert_eq!(engine.read_global_bool("smaller"), Ok(true));
    assert_eq!(engine.read_global_bool("empty_equal"), Ok(true));
    assert_eq!(
        engine.read_global_vector("pushed"),
        Ok(vec![json!(1), json!(2), json!(3), json!(4)])
    );
}

#[test]
fn test_loops() {
    // while (i < 5) { total = total + i; i = i + 1 }
    // for (j in 1...4) { acc = acc + j }
    let add = |lhs: Expression, rhs: Expression| Expression::arithmetic(ArithmeticOp::Add, lhs, rhs);
    let globals = Body::new(
        vec![
            Statement::While {
                condition: Expression::comparison(
                    ComparisonOp::Smaller,
                    global(1, TypeId::Int),
                    Expression::literal_int(5),
                ),
                body: Body::from_statements(vec![
                    store_global(0, add(global(0, TypeId::Int), global(1, TypeId::Int))),
                    store_global(1, add(global(1, TypeId::Int), Expression::literal_int(1))),
                ]),
            },
            Statement::For {
                range_type: RangeType::Closed,
                start: Expression::literal_int(1),
                end: Expression::literal_int(4),
                body: Body::new(
                    vec![store_global(
                        2,
                        add(global(2, TypeId::Int), Expression::load(VariableAddress::local(0, 0), TypeId::Int)),
                    )],
                    table(vec![("j", Symbol::mutable(TypeId::Int))]),
                ),
            },
        ],
        table(vec![
            ("total", Symbol::mutable(TypeId::Int)),
            ("i", Symbol::mutable(TypeId::Int)),
            ("acc", Symbol::mutable(TypeId::Int)),
        ]),
    );
    let ast = program(globals, vec![]);

    let instance = LlvmInstance::new();
    let program = generate_llvm_ir_program(&instance, &ast, "loops");
    let engine = make_engine_run_init(&instance, program).unwrap();

    assert_eq!(engine.read_global_int("total"), Ok(10));
    assert_eq!(engine.read_global_int("i"), Ok(5));
    assert_eq!(engine.read_global_int("acc"), Ok(10));
}

#[test]
fn test_json_values() {
    let dict_type = TypeId::make_dict(TypeId::Int);
    let globals = Body::new(
        vec![
            store_global(
                0,
                Expression::construct(
                    TypeId::JsonValue,
                    vec![Expression::construct(
                        dict_type,
                        vec![Expression::literal_string("a"), Expression::literal_int(1)],
                    )],
                ),
            ),
            store_global(
                1,
                Expression::lookup(
                    global(0, TypeId::JsonValue),
                    Expression::literal_string("a"),
                    TypeId::JsonValue,
                ),
            ),
            store_global(2, Expression::construct(TypeId::JsonValue, vec![])),
        ],
        table(vec![
            ("doc", Symbol::mutable(TypeId::JsonValue)),
            ("a", Symbol::mutable(TypeId::JsonValue)),
            ("nothing", Symbol::mutable(TypeId::JsonValue)),
        ]),
    );
    let ast = program(globals, vec![]);

    let instance = LlvmInstance::new();
    let program = generate_llvm_ir_program(&instance, &ast, "json");
    let engine = make_engine_run_init(&instance, program).unwrap();

    assert_eq!(engine.format_global("doc"), Ok("{\"a\":1}".to_string()));
    assert_eq!(engine.format_global("a"), Ok("1".to_string()));
    assert_eq!(engine.format_global("nothing"), Ok("null".to_string()));
}

#[test]
fn test_unary_minus_and_conditional() {
    let globals = Body::new(
        vec![
            store_global(0, Expression::unary_minus(Expression::literal_int(7))),
            store_global(1, Expression::unary_minus(Expression::literal_double(2.5))),
            store_global(
                2,
                Expression::conditional(
                    Expression::literal_bool(false),
                    Expression::literal_int(9),
                    Expression::unary_minus(Expression::literal_int(5)),
                ),
            ),
            store_global(
                3,
                Expression::conditional(
                    Expression::comparison(
                        ComparisonOp::Smaller,
                        global(0, TypeId::Int),
                        Expression::literal_int(0),
                    ),
                    Expression::literal_double(0.25),
                    Expression::literal_double(1.0),
                ),
            ),
            store_global(
                4,
                Expression::new(
                    ExpressionKind::Conditional {
                        condition: Box::new(Expression::literal_bool(true)),
                        a: Box::new(Expression::literal_int(9)),
                        b: Box::new(Expression::literal_int(-5)),
                    },
                    TypeId::Any,
                ),
            ),
        ],
        table(vec![
            ("negative", Symbol::mutable(TypeId::Int)),
            ("negative_double", Symbol::mutable(TypeId::Double)),
            ("picked", Symbol::mutable(TypeId::Int)),
            ("ratio", Symbol::mutable(TypeId::Double)),
            ("dynamic", Symbol::mutable(TypeId::Any)),
        ]),
    );
    let ast = program(globals, vec![]);

    let instance = LlvmInstance::new();
    let program = generate_llvm_ir_program(&instance, &ast, "unary_conditional");
    assert!(program.print_ir().contains("cond_join"));
    let engine = make_engine_run_init(&instance, program).unwrap();

    assert_eq!(engine.read_global_int("negative"), Ok(-7));
    assert_eq!(engine.read_global_double("negative_double"), Ok(-2.5));
    assert_eq!(engine.read_global_int("picked"), Ok(-5));
    assert_eq!(engine.read_global_double("ratio"), Ok(0.25));
    assert_eq!(engine.format_global("dynamic"), Ok("9".to_string()));
}

#[test]
fn test_vector_index_out_of_bounds_is_a_runtime_error() {
    let vector_type = TypeId::make_vector(TypeId::Int);
    let globals = Body::new(
        vec![
            store_global(0, int_vector(&[1, 2, 3])),
            store_global(
                1,
                Expression::lookup(global(0, vector_type.clone()), Expression::literal_int(5), TypeId::Int),
            ),
        ],
        table(vec![
            ("v", Symbol::mutable(vector_type)),
            ("element", Symbol::mutable(TypeId::Int)),
        ]),
    );
    let ast = program(globals, vec![]);

    let instance = LlvmInstance::new();
    let program = generate_llvm_ir_program(&instance, &ast, "vector_bounds");
    let mut engine = make_engine_no_init(&instance, program).unwrap();

    assert_eq!(
        engine.run_init(),
        Err(JitError::Runtime {
            message: "Index 5 out of bounds, size is 3".to_string()
        })
    );
    // The lookup falls back to the first element.
    assert_eq!(engine.read_global_int("element"), Ok(1));
}

#[test]
fn test_index_checks_in_functions() {
    let pick_type = TypeId::make_function(TypeId::Int, vec![TypeId::Int], Purity::Pure);
    let pick = Body::new(
        vec![Statement::Return(Expression::lookup(
            int_vector(&[10, 20, 30]),
            arg(0, TypeId::Int),
            TypeId::Int,
        ))],
        table(vec![("i", Symbol::argument(TypeId::Int))]),
    );

    let char_at_type = TypeId::make_function(TypeId::Int, vec![TypeId::String, TypeId::Int], Purity::Pure);
    let char_at = Body::new(
        vec![Statement::Return(Expression::lookup(
            arg(0, TypeId::String),
            arg(1, TypeId::Int),
            TypeId::Int,
        ))],
        table(vec![
            ("s", Symbol::argument(TypeId::String)),
            ("i", Symbol::argument(TypeId::Int)),
        ]),
    );
    let ast = program(
        Body::default(),
        vec![
            FunctionDefinition::floyd("pick", pick_type, pick),
            FunctionDefinition::floyd("char_at", char_at_type, char_at),
        ],
    );

    let instance = LlvmInstance::new();
    let program = generate_llvm_ir_program(&instance, &ast, "index_checks");
    let mut engine = make_engine_run_init(&instance, program).unwrap();

    assert_eq!(engine.call_int("pick", &[JitValue::Int(2)]), Ok(30));
    assert_eq!(
        engine.call_int("pick", &[JitValue::Int(-1)]),
        Err(JitError::Runtime {
            message: "Index -1 out of bounds, size is 3".to_string()
        })
    );

    let text = || JitValue::String("ab".to_string());
    assert_eq!(engine.call_int("char_at", &[text(), JitValue::Int(1)]), Ok(b'b' as i64));
    assert_eq!(
        engine.call_int("char_at", &[text(), JitValue::Int(2)]),
        Err(JitError::Runtime {
            message: "Index 2 out of bounds, size is 2".to_string()
        })
    );
}

#[test]
fn test_run_function_checks_arguments() {
    let divide_type = TypeId::make_function(TypeId::Int, vec![TypeId::Int, TypeId::Int], Purity::Pure);
    let divide = Body::new(
        vec![Statement::Return(Expression::arithmetic(
            ArithmeticOp::Divide,
            arg(0, TypeId::Int),
            arg(1, TypeId::Int),
        ))],
        table(vec![
            ("a", Symbol::argument(TypeId::Int)),
            ("b", Symbol::argument(TypeId::Int)),
        ]),
    );
    let halve_type = TypeId::make_function(TypeId::Double, vec![TypeId::Double], Purity::Pure);
    let halve = Body::new(
        vec![Statement::Return(Expression::arithmetic(
            ArithmeticOp::Divide,
            arg(0, TypeId::Double),
            Expression::literal_double(2.0),
        ))],
        table(vec![("x", Symbol::argument(TypeId::Double))]),
    );
    let ast = program(
        Body::default(),
        vec![
            FunctionDefinition::floyd("divide", divide_type, divide),
            FunctionDefinition::floyd("halve", halve_type, halve),
        ],
    );

    let instance = LlvmInstance::new();
    let program = generate_llvm_ir_program(&instance, &ast, "run_function");
    let mut engine = make_engine_run_init(&instance, program).unwrap();

    assert_eq!(engine.call_int("divide", &[JitValue::Int(9), JitValue::Int(3)]), Ok(3));
    assert_eq!(
        engine.call_int("divide", &[JitValue::Int(9), JitValue::Int(0)]),
        Err(JitError::Runtime {
            message: "Division by zero".to_string()
        })
    );
    assert_eq!(engine.call_double("halve", &[JitValue::Double(5.0)]), Ok(2.5));

    assert!(matches!(
        engine.call_int("divide", &[JitValue::Int(9)]),
        Err(JitError::ArgumentMismatch { .. })
    ));
    assert!(matches!(
        engine.call_int("divide", &[JitValue::Int(9), JitValue::Double(1.0)]),
        Err(JitError::ArgumentMismatch { .. })
    ));
    assert!(matches!(
        engine.call_int("halve", &[JitValue::Double(1.0)]),
        Err(JitError::ArgumentMismatch { .. })
    ));
    assert!(matches!(
        engine.call_int("print", &[JitValue::Int(1)]),
        Err(JitError::FunctionNotFound { .. })
    ));
}

#[test]
fn test_generating_twice_reuses_runtime_types() {
    let vector_type = TypeId::make_vector(TypeId::Int);
    let ast = program(
        Body::new(
            vec![store_global(0, int_vector(&[1]))],
            table(vec![("v", Symbol::mutable(vector_type))]),
        ),
        vec![],
    );

    let instance = LlvmInstance::new();
    let first = generate_llvm_ir_program(&instance, &ast, "first").print_ir();
    let second = generate_llvm_ir_program(&instance, &ast, "second");
    let second_ir = second.print_ir();

    assert!(first.contains("%VEC_T = type"));
    assert!(second_ir.contains("%VEC_T = type"));
    assert!(!second_ir.contains("VEC_T.0"));
    assert!(!second_ir.contains("DICT_T.0"));

    let engine = make_engine_run_init(&instance, second).unwrap();
    assert_eq!(engine.read_global_vector("v"), Ok(vec![json!(1)]));
}
