use inkwell::{
    values::{BasicValue, BasicValueEnum},
    IntPredicate,
};

use crate::ast::{
    ast::{Body, SymbolKind, VariableAddress},
    expressions::Expression,
    statements::{RangeType, Statement},
    types::TypeId,
};

use super::{
    compiler::{zero_value, CodeGenerator, RUNTIME_INIT_SENTINEL},
    expr::gen_expression,
    scope::{ResolvedSymbol, SymbolType},
    types::{is_wide_return_type, ArgRole},
    values::{coerce_value, dyn_to_wide, encode_to_wide, DynValue},
};

/// Whether control can continue after a statement list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerateMode {
    More,
    /// Every path returned. Nothing may be emitted after this.
    FunctionReturning,
}

/// Resolves a body's symbols. Argument symbols take the given values in
/// order, every other symbol gets a stack slot.
fn resolve_body_symbols<'a>(
    generator: &CodeGenerator<'a, '_>,
    body: &Body,
    arguments: Vec<BasicValueEnum<'a>>,
) -> Vec<ResolvedSymbol<'a>> {
    let mut arguments = arguments.into_iter();
    let mut resolved = vec![];

    for (name, symbol) in body.symbol_table.symbols.iter() {
        if symbol.kind == SymbolKind::Argument {
            let value = arguments
                .next()
                .unwrap_or_else(|| panic!("Argument symbol {} has no parameter", name));
            resolved.push(ResolvedSymbol::new(
                value,
                SymbolType::FunctionArgument,
                name,
                symbol.clone(),
            ));
            continue;
        }

        let llvm_type = generator.types.intern_type(&symbol.value_type);
        let slot = generator.build_entry_alloca(llvm_type, name);
        let initial = symbol
            .init
            .as_ref()
            .map(|value| generator.constant_value(value))
            .unwrap_or_else(|| zero_value(llvm_type));
        generator.builder.build_store(slot, initial).unwrap();

        resolved.push(ResolvedSymbol::new(
            slot.into(),
            SymbolType::Local,
            name,
            symbol.clone(),
        ));
    }

    assert!(arguments.next().is_none(), "Parameters left without symbols");
    resolved
}

fn push_body_frame(generator: &mut CodeGenerator<'_, '_>, body: &Body) {
    let resolved = resolve_body_symbols(generator, body, vec![]);
    generator.scopes.push_frame(resolved);
}

fn gen_body(generator: &mut CodeGenerator<'_, '_>, body: &Body) -> GenerateMode {
    push_body_frame(generator, body);
    let mode = gen_statements(generator, &body.statements);
    generator.scopes.pop_frame();
    mode
}

/// Generates statements until one of them returns on every path.
pub fn gen_statements(generator: &mut CodeGenerator<'_, '_>, statements: &[Statement]) -> GenerateMode {
    for statement in statements {
        if gen_statement(generator, statement) == GenerateMode::FunctionReturning {
            return GenerateMode::FunctionReturning;
        }
    }
    GenerateMode::More
}

pub fn gen_statement(generator: &mut CodeGenerator<'_, '_>, statement: &Statement) -> GenerateMode {
    match statement {
        Statement::Return(expression) => {
            let return_type = generator
                .current_return_type
                .clone()
                .unwrap_or_else(|| panic!("Return statement in global scope"));
            let value = gen_expression(generator, expression);

            if return_type.is_void() {
                generator.builder.build_return(None).unwrap();
            } else {
                let value = coerce_value(generator, value, &expression.output_type, &return_type);
                if is_wide_return_type(&return_type) {
                    let wide = encode_to_wide(generator, value, &return_type);
                    generator.builder.build_return(Some(&wide)).unwrap();
                } else {
                    generator.builder.build_return(Some(&value)).unwrap();
                }
            }
            GenerateMode::FunctionReturning
        }
        Statement::Store { address, value } => {
            gen_store(generator, *address, value);
            GenerateMode::More
        }
        Statement::Block(body) => gen_body(generator, body),
        Statement::If {
            condition,
            then_body,
            else_body,
        } => gen_if(generator, condition, then_body, else_body),
        Statement::For {
            range_type,
            start,
            end,
            body,
        } => {
            gen_for(generator, *range_type, start, end, body);
            GenerateMode::More
        }
        Statement::While { condition, body } => {
            let test_block = generator.create_basic_block("while_test");
            let body_block = generator.create_basic_block("while_body");
            let end_block = generator.create_basic_block("while_end");
            generator
                .builder
                .build_unconditional_branch(test_block)
                .unwrap();

            generator.builder.position_at_end(test_block);
            let condition = gen_expression(generator, condition).into_int_value();
            generator
                .builder
                .build_conditional_branch(condition, body_block, end_block)
                .unwrap();

            generator.builder.position_at_end(body_block);
            if gen_body(generator, body) == GenerateMode::More {
                generator
                    .builder
                    .build_unconditional_branch(test_block)
                    .unwrap();
            }

            generator.builder.position_at_end(end_block);
            GenerateMode::More
        }
        Statement::Expression(expression) => {
            gen_expression(generator, expression);
            GenerateMode::More
        }
    }
}

fn gen_store(
    generator: &mut CodeGenerator<'_, '_>,
    address: VariableAddress,
    value: &Expression,
) {
    let (slot, target_type) = {
        let symbol = generator.scopes.resolve(address);
        if symbol.symtype == SymbolType::FunctionArgument {
            panic!("Cannot store to function argument {}", symbol.name);
        }
        (
            symbol.value_ptr.into_pointer_value(),
            symbol.symbol.value_type.clone(),
        )
    };

    let new_value = gen_expression(generator, value);
    let new_value = coerce_value(generator, new_value, &value.output_type, &target_type);
    generator.builder.build_store(slot, new_value).unwrap();
}

fn gen_if(
    generator: &mut CodeGenerator<'_, '_>,
    condition: &Expression,
    then_body: &Body,
    else_body: &Body,
) -> GenerateMode {
    let condition = gen_expression(generator, condition).into_int_value();
    let then_block = generator.create_basic_block("then");
    let else_block = generator.create_basic_block("else");
    generator
        .builder
        .build_conditional_branch(condition, then_block, else_block)
        .unwrap();

    generator.builder.position_at_end(then_block);
    let then_mode = gen_body(generator, then_body);
    let then_end = generator.builder.get_insert_block().unwrap();

    generator.builder.position_at_end(else_block);
    let else_mode = gen_body(generator, else_body);
    let else_end = generator.builder.get_insert_block().unwrap();

    if then_mode == GenerateMode::FunctionReturning && else_mode == GenerateMode::FunctionReturning {
        return GenerateMode::FunctionReturning;
    }

    let join_block = generator.create_basic_block("if_join");
    for (mode, end) in [(then_mode, then_end), (else_mode, else_end)] {
        if mode == GenerateMode::More {
            generator.builder.position_at_end(end);
            generator
                .builder
                .build_unconditional_branch(join_block)
                .unwrap();
        }
    }
    generator.builder.position_at_end(join_block);
    GenerateMode::More
}

/// The induction variable is slot 0 of the loop body. The bounds are
/// evaluated once, before the first iteration.
fn gen_for(
    generator: &mut CodeGenerator<'_, '_>,
    range_type: RangeType,
    start: &Expression,
    end: &Expression,
    body: &Body,
) {
    match body.symbol_table.symbols.first() {
        Some((_, symbol)) if symbol.value_type == TypeId::Int => {}
        _ => panic!("For loop body must start with an int induction variable"),
    }

    let start_value = gen_expression(generator, start).into_int_value();
    let end_value = gen_expression(generator, end).into_int_value();

    push_body_frame(generator, body);
    let counter = generator
        .scopes
        .resolve(VariableAddress::local(0, 0))
        .value_ptr
        .into_pointer_value();
    generator.builder.build_store(counter, start_value).unwrap();

    let test_block = generator.create_basic_block("for_test");
    let body_block = generator.create_basic_block("for_body");
    let end_block = generator.create_basic_block("for_end");
    generator
        .builder
        .build_unconditional_branch(test_block)
        .unwrap();

    generator.builder.position_at_end(test_block);
    let current = generator
        .builder
        .build_load(counter, "i")
        .unwrap()
        .into_int_value();
    let predicate = match range_type {
        RangeType::Closed => IntPredicate::SLE,
        RangeType::Open => IntPredicate::SLT,
    };
    let in_range = generator
        .builder
        .build_int_compare(predicate, current, end_value, "in_range")
        .unwrap();
    generator
        .builder
        .build_conditional_branch(in_range, body_block, end_block)
        .unwrap();

    generator.builder.position_at_end(body_block);
    if gen_statements(generator, &body.statements) == GenerateMode::More {
        let current = generator
            .builder
            .build_load(counter, "i")
            .unwrap()
            .into_int_value();
        let next = generator
            .builder
            .build_int_add(current, current.get_type().const_int(1, false), "next")
            .unwrap();
        generator.builder.build_store(counter, next).unwrap();
        generator
            .builder
            .build_unconditional_branch(test_block)
            .unwrap();
    }

    generator.builder.position_at_end(end_block);
    generator.scopes.pop_frame();
}

/// Generates the body of a user function. The builder must be positioned in
/// the function's entry block.
pub fn gen_function_body(generator: &mut CodeGenerator<'_, '_>, function_type: &TypeId, body: &Body) {
    let function = generator.current_function();
    let mapping = generator.types.map_function_arguments(function_type);
    let params = function.get_params();
    assert_eq!(params.len(), mapping.args.len());

    let mut arguments = vec![];
    let mut index = 0;
    while index < mapping.args.len() {
        match mapping.args[index].role {
            ArgRole::RuntimePtr => index += 1,
            ArgRole::Simple => {
                arguments.push(params[index]);
                index += 1;
            }
            ArgRole::DynValue => {
                assert_eq!(mapping.args[index + 1].role, ArgRole::DynType);
                let dyn_value = DynValue {
                    value: params[index].into_int_value(),
                    itype: params[index + 1].into_int_value(),
                };
                arguments.push(dyn_to_wide(generator, dyn_value).into());
                index += 2;
            }
            ArgRole::DynType => panic!("Dynamic type parameter without its value"),
        }
    }

    let resolved = resolve_body_symbols(generator, body, arguments);
    generator.scopes.push_frame(resolved);

    if gen_statements(generator, &body.statements) == GenerateMode::More {
        // Falling off the end returns the zero value.
        match mapping.return_type {
            None => generator.builder.build_return(None).unwrap(),
            Some(return_type) => {
                let zero = zero_value(return_type);
                generator
                    .builder
                    .build_return(Some(&zero as &dyn BasicValue))
                    .unwrap()
            }
        };
    }
    generator.scopes.pop_frame();
}

/// Generates `floyd_runtime_init`: the top-level statements followed by the
/// sentinel return. Expects the globals frame to be open.
pub fn gen_runtime_init_body(generator: &mut CodeGenerator<'_, '_>) {
    let ast = generator.ast;
    let mode = gen_statements(generator, &ast.globals.statements);
    assert_eq!(mode, GenerateMode::More, "Global code cannot return");

    let sentinel = generator
        .context
        .i64_type()
        .const_int(RUNTIME_INIT_SENTINEL as u64, true);
    generator.builder.build_return(Some(&sentinel)).unwrap();
}
