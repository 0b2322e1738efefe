use inkwell::{
    values::{BasicMetadataValueEnum, BasicValueEnum, CallableValue, IntValue},
    FloatPredicate, IntPredicate,
};

use crate::{
    ast::{
        ast::VariableAddress,
        expressions::{ArithmeticOp, ComparisonOp, Expression, ExpressionKind, Value},
        types::TypeId,
    },
    runtime::RuntimeFunction,
};

use super::{
    compiler::CodeGenerator,
    scope::SymbolType,
    types::is_wide_return_type,
    values::{
        box_word, call_runtime, call_runtime_value, coerce_value, decode_from_wide,
        dyn_from_wide, encode_to_wide, make_dyn, spill_to_stack, split_wide, unbox_word,
    },
};

/// Generates LLVM IR for the given expression.
pub fn gen_expression<'a>(
    generator: &CodeGenerator<'a, '_>,
    expression: &Expression,
) -> BasicValueEnum<'a> {
    match &expression.kind {
        ExpressionKind::Literal(value) => gen_literal(generator, value),
        ExpressionKind::Arithmetic { op, lhs, rhs } => gen_arithmetic(generator, *op, lhs, rhs),
        ExpressionKind::Comparison { op, lhs, rhs } => {
            gen_comparison(generator, *op, lhs, rhs).into()
        }
        ExpressionKind::UnaryMinus(operand) => {
            // Rewritten as `0 - x`.
            let zero = match &operand.output_type {
                TypeId::Int => Expression::literal_int(0),
                TypeId::Double => Expression::literal_double(0.0),
                other => panic!("Unary minus on {}", other),
            };
            let rewritten =
                Expression::arithmetic(ArithmeticOp::Subtract, zero, operand.as_ref().clone());
            gen_expression(generator, &rewritten)
        }
        ExpressionKind::Conditional { condition, a, b } => {
            gen_conditional(generator, condition, a, b, &expression.output_type)
        }
        ExpressionKind::Call { callee, args } => {
            gen_call(generator, callee, args, &expression.output_type)
        }
        ExpressionKind::ResolveMember {
            parent,
            member_name,
        } => gen_resolve_member(generator, parent, member_name),
        ExpressionKind::Lookup { parent, key } => {
            gen_lookup(generator, parent, key, &expression.output_type)
        }
        ExpressionKind::ValueConstructor { elements } => {
            gen_construct_value(generator, &expression.output_type, elements)
        }
        ExpressionKind::Load(address) => gen_load(generator, *address),
    }
}

fn gen_literal<'a>(generator: &CodeGenerator<'a, '_>, value: &Value) -> BasicValueEnum<'a> {
    match value {
        Value::String(text) => generator
            .builder
            .build_global_string_ptr(text, "")
            .unwrap()
            .as_pointer_value()
            .into(),
        Value::Bool(_) | Value::Int(_) | Value::Double(_) | Value::Typeid(_) | Value::Function(_) => {
            generator.constant_value(value)
        }
    }
}

fn gen_load<'a>(generator: &CodeGenerator<'a, '_>, address: VariableAddress) -> BasicValueEnum<'a> {
    let symbol = generator.scopes.resolve(address);
    match symbol.symtype {
        SymbolType::FunctionArgument => symbol.value_ptr,
        SymbolType::Global | SymbolType::Local => generator
            .builder
            .build_load(symbol.value_ptr.into_pointer_value(), &symbol.name)
            .unwrap(),
    }
}

fn gen_arithmetic<'a>(
    generator: &CodeGenerator<'a, '_>,
    op: ArithmeticOp,
    lhs: &Expression,
    rhs: &Expression,
) -> BasicValueEnum<'a> {
    if matches!(op, ArithmeticOp::LogicalAnd | ArithmeticOp::LogicalOr) {
        return gen_logical(generator, op, lhs, rhs).into();
    }

    let left = gen_expression(generator, lhs);
    let right = gen_expression(generator, rhs);
    let builder = &generator.builder;

    match (&lhs.output_type, op) {
        (TypeId::Int, _) => {
            let (left, right) = (left.into_int_value(), right.into_int_value());
            match op {
                ArithmeticOp::Add => builder.build_int_add(left, right, "").unwrap().into(),
                ArithmeticOp::Subtract => builder.build_int_sub(left, right, "").unwrap().into(),
                ArithmeticOp::Multiply => builder.build_int_mul(left, right, "").unwrap().into(),
                ArithmeticOp::Divide => {
                    let divisor = gen_checked_divisor(generator, right);
                    builder.build_int_signed_div(left, divisor, "").unwrap().into()
                }
                ArithmeticOp::Remainder => {
                    let divisor = gen_checked_divisor(generator, right);
                    builder.build_int_signed_rem(left, divisor, "").unwrap().into()
                }
                ArithmeticOp::LogicalAnd | ArithmeticOp::LogicalOr => unreachable!(),
            }
        }
        (TypeId::Double, _) => {
            let (left, right) = (left.into_float_value(), right.into_float_value());
            match op {
                ArithmeticOp::Add => builder.build_float_add(left, right, "").unwrap().into(),
                ArithmeticOp::Subtract => builder.build_float_sub(left, right, "").unwrap().into(),
                ArithmeticOp::Multiply => builder.build_float_mul(left, right, "").unwrap().into(),
                ArithmeticOp::Divide => builder.build_float_div(left, right, "").unwrap().into(),
                ArithmeticOp::Remainder => builder.build_float_rem(left, right, "").unwrap().into(),
                ArithmeticOp::LogicalAnd | ArithmeticOp::LogicalOr => unreachable!(),
            }
        }
        (TypeId::String, ArithmeticOp::Add) => call_runtime_value(
            generator,
            RuntimeFunction::ConcatenateStrings,
            &[left.into(), right.into()],
        ),
        (TypeId::Vector(_), ArithmeticOp::Add) => {
            let left_ptr = spill_to_stack(generator, left);
            let right_ptr = spill_to_stack(generator, right);
            let wide = call_runtime_value(
                generator,
                RuntimeFunction::ConcatenateVectors,
                &[left_ptr.into(), right_ptr.into()],
            );
            decode_from_wide(generator, wide.into_struct_value(), &lhs.output_type)
        }
        (other, _) => panic!("Unsupported arithmetic {:?} on {}", op, other),
    }
}

/// Records a division by zero and substitutes a divisor of 1.
fn gen_checked_divisor<'a>(generator: &CodeGenerator<'a, '_>, divisor: IntValue<'a>) -> IntValue<'a> {
    call_runtime(generator, RuntimeFunction::CheckDivisor, &[divisor.into()]);

    let int_type = divisor.get_type();
    let is_zero = generator
        .builder
        .build_int_compare(IntPredicate::EQ, divisor, int_type.const_zero(), "is_zero")
        .unwrap();
    generator
        .builder
        .build_select(is_zero, int_type.const_int(1, false), divisor, "divisor")
        .unwrap()
        .into_int_value()
}

/// Records an out-of-range index and substitutes index 0. Element storage
/// always holds at least one word, so index 0 is readable even when empty.
fn gen_checked_index<'a>(
    generator: &CodeGenerator<'a, '_>,
    index: IntValue<'a>,
    length: IntValue<'a>,
) -> IntValue<'a> {
    call_runtime(generator, RuntimeFunction::CheckIndex, &[index.into(), length.into()]);

    // Unsigned compare also rejects negative indexes.
    let in_bounds = generator
        .builder
        .build_int_compare(IntPredicate::ULT, index, length, "in_bounds")
        .unwrap();
    generator
        .builder
        .build_select(in_bounds, index, index.get_type().const_zero(), "index")
        .unwrap()
        .into_int_value()
}

/// `and`/`or` evaluate the right operand only when it decides the result.
fn gen_logical<'a>(
    generator: &CodeGenerator<'a, '_>,
    op: ArithmeticOp,
    lhs: &Expression,
    rhs: &Expression,
) -> IntValue<'a> {
    let bool_type = generator.context.bool_type();
    let left = gen_expression(generator, lhs).into_int_value();
    let left_block = generator.builder.get_insert_block().unwrap();

    let rhs_block = generator.create_basic_block("logic_rhs");
    let join_block = generator.create_basic_block("logic_join");

    let short_circuit_value = match op {
        ArithmeticOp::LogicalAnd => {
            generator
                .builder
                .build_conditional_branch(left, rhs_block, join_block)
                .unwrap();
            bool_type.const_zero()
        }
        ArithmeticOp::LogicalOr => {
            generator
                .builder
                .build_conditional_branch(left, join_block, rhs_block)
                .unwrap();
            bool_type.const_int(1, false)
        }
        _ => unreachable!(),
    };

    generator.builder.position_at_end(rhs_block);
    let right = gen_expression(generator, rhs).into_int_value();
    let right_block = generator.builder.get_insert_block().unwrap();
    generator
        .builder
        .build_unconditional_branch(join_block)
        .unwrap();

    generator.builder.position_at_end(join_block);
    let phi = generator.builder.build_phi(bool_type, "logic").unwrap();
    phi.add_incoming(&[(&short_circuit_value, left_block), (&right, right_block)]);
    phi.as_basic_value().into_int_value()
}

fn int_predicate(op: ComparisonOp, signed: bool) -> IntPredicate {
    match (op, signed) {
        (ComparisonOp::SmallerOrEqual, true) => IntPredicate::SLE,
        (ComparisonOp::Smaller, true) => IntPredicate::SLT,
        (ComparisonOp::LargerOrEqual, true) => IntPredicate::SGE,
        (ComparisonOp::Larger, true) => IntPredicate::SGT,
        (ComparisonOp::SmallerOrEqual, false) => IntPredicate::ULE,
        (ComparisonOp::Smaller, false) => IntPredicate::ULT,
        (ComparisonOp::LargerOrEqual, false) => IntPredicate::UGE,
        (ComparisonOp::Larger, false) => IntPredicate::UGT,
        (ComparisonOp::Equal, _) => IntPredicate::EQ,
        (ComparisonOp::NotEqual, _) => IntPredicate::NE,
    }
}

fn float_predicate(op: ComparisonOp) -> FloatPredicate {
    match op {
        ComparisonOp::SmallerOrEqual => FloatPredicate::OLE,
        ComparisonOp::Smaller => FloatPredicate::OLT,
        ComparisonOp::LargerOrEqual => FloatPredicate::OGE,
        ComparisonOp::Larger => FloatPredicate::OGT,
        ComparisonOp::Equal => FloatPredicate::OEQ,
        ComparisonOp::NotEqual => FloatPredicate::ONE,
    }
}

fn gen_comparison<'a>(
    generator: &CodeGenerator<'a, '_>,
    op: ComparisonOp,
    lhs: &Expression,
    rhs: &Expression,
) -> IntValue<'a> {
    let left = gen_expression(generator, lhs);
    let right = gen_expression(generator, rhs);
    let builder = &generator.builder;
    let i32_zero = generator.context.i32_type().const_zero();
    let op_code = generator
        .context
        .i64_type()
        .const_int(op.code() as u64, false);

    let type_ = &lhs.output_type;
    match type_ {
        TypeId::Int | TypeId::Typeid | TypeId::Bool => builder
            .build_int_compare(
                int_predicate(op, !matches!(type_, TypeId::Bool)),
                left.into_int_value(),
                right.into_int_value(),
                "",
            )
            .unwrap(),
        TypeId::Double => builder
            .build_float_compare(
                float_predicate(op),
                left.into_float_value(),
                right.into_float_value(),
                "",
            )
            .unwrap(),
        TypeId::String => {
            let result = call_runtime_value(
                generator,
                RuntimeFunction::CompareStrings,
                &[op_code.into(), left.into(), right.into()],
            );
            builder
                .build_int_compare(IntPredicate::NE, result.into_int_value(), i32_zero, "")
                .unwrap()
        }
        TypeId::JsonValue
        | TypeId::Struct(_)
        | TypeId::Vector(_)
        | TypeId::Dict(_)
        | TypeId::Function(_)
        | TypeId::Any => {
            let (left_a, left_b) = split_wide(generator, encode_to_wide(generator, left, type_));
            let (right_a, right_b) = split_wide(generator, encode_to_wide(generator, right, type_));
            let result = call_runtime_value(
                generator,
                RuntimeFunction::CompareValues,
                &[
                    op_code.into(),
                    generator.itype_constant(type_).into(),
                    left_a.into(),
                    left_b.into(),
                    right_a.into(),
                    right_b.into(),
                ],
            );
            builder
                .build_int_compare(IntPredicate::NE, result.into_int_value(), i32_zero, "")
                .unwrap()
        }
        TypeId::Undefined | TypeId::Void => panic!("Cannot compare values of type {}", type_),
    }
}

fn gen_conditional<'a>(
    generator: &CodeGenerator<'a, '_>,
    condition: &Expression,
    a: &Expression,
    b: &Expression,
    output_type: &TypeId,
) -> BasicValueEnum<'a> {
    let condition = gen_expression(generator, condition).into_int_value();

    let then_block = generator.create_basic_block("cond_true");
    let else_block = generator.create_basic_block("cond_false");
    let join_block = generator.create_basic_block("cond_join");
    generator
        .builder
        .build_conditional_branch(condition, then_block, else_block)
        .unwrap();

    generator.builder.position_at_end(then_block);
    let a_value = gen_expression(generator, a);
    let a_value = coerce_value(generator, a_value, &a.output_type, output_type);
    let a_end = generator.builder.get_insert_block().unwrap();
    generator
        .builder
        .build_unconditional_branch(join_block)
        .unwrap();

    generator.builder.position_at_end(else_block);
    let b_value = gen_expression(generator, b);
    let b_value = coerce_value(generator, b_value, &b.output_type, output_type);
    let b_end = generator.builder.get_insert_block().unwrap();
    generator
        .builder
        .build_unconditional_branch(join_block)
        .unwrap();

    generator.builder.position_at_end(join_block);
    let phi = generator
        .builder
        .build_phi(generator.types.intern_type(output_type), "cond")
        .unwrap();
    phi.add_incoming(&[(&a_value, a_end), (&b_value, b_end)]);
    phi.as_basic_value()
}

fn gen_call<'a>(
    generator: &CodeGenerator<'a, '_>,
    callee: &Expression,
    args: &[Expression],
    output_type: &TypeId,
) -> BasicValueEnum<'a> {
    let function_type = &callee.output_type;
    let signature = function_type.function_signature();
    let mapping = generator.types.map_function_arguments(function_type);
    assert_eq!(
        args.len(),
        signature.args.len(),
        "Call to {} with {} arguments",
        function_type,
        args.len()
    );

    let mut llvm_args: Vec<BasicMetadataValueEnum<'a>> = vec![generator.runtime_ptr().into()];
    for (arg, declared_type) in args.iter().zip(signature.args.iter()) {
        let value = gen_expression(generator, arg);
        if declared_type.is_any() {
            let dyn_value = make_dyn(generator, value, &arg.output_type);
            llvm_args.push(dyn_value.value.into());
            llvm_args.push(dyn_value.itype.into());
        } else {
            llvm_args.push(coerce_value(generator, value, &arg.output_type, declared_type).into());
        }
    }
    assert_eq!(llvm_args.len(), mapping.args.len());

    let call = match &callee.kind {
        ExpressionKind::Literal(Value::Function(function_id)) => {
            let function = generator
                .find_function_def_from_floyd_id(*function_id)
                .llvm_function;
            generator.builder.build_call(function, &llvm_args, "").unwrap()
        }
        _ => {
            let pointer = gen_expression(generator, callee).into_pointer_value();
            let callable = CallableValue::try_from(pointer)
                .unwrap_or_else(|_| panic!("Callee of type {} is not callable", function_type));
            generator.builder.build_call(callable, &llvm_args, "").unwrap()
        }
    };

    let return_type = signature.return_type.as_ref();
    match call.try_as_basic_value().left() {
        // Void calls yield a dummy value.
        None => generator.context.i64_type().const_zero().into(),
        Some(result) if return_type.is_any() && !output_type.is_any() => {
            let dyn_value = dyn_from_wide(generator, result.into_struct_value());
            unbox_word(generator, dyn_value.value, output_type)
        }
        Some(result) if is_wide_return_type(return_type) => {
            decode_from_wide(generator, result.into_struct_value(), return_type)
        }
        Some(result) => result,
    }
}

fn gen_resolve_member<'a>(
    generator: &CodeGenerator<'a, '_>,
    parent: &Expression,
    member_name: &str,
) -> BasicValueEnum<'a> {
    let definition = parent.output_type.struct_definition();
    let index = definition
        .find_member_index(member_name)
        .unwrap_or_else(|| panic!("Struct has no member {:?}", member_name));

    let struct_ptr = gen_expression(generator, parent).into_pointer_value();
    let member_ptr = generator
        .builder
        .build_struct_gep(struct_ptr, index as u32, member_name)
        .unwrap();
    generator.builder.build_load(member_ptr, member_name).unwrap()
}

fn gen_lookup<'a>(
    generator: &CodeGenerator<'a, '_>,
    parent: &Expression,
    key: &Expression,
    output_type: &TypeId,
) -> BasicValueEnum<'a> {
    let parent_value = gen_expression(generator, parent);
    let key_value = gen_expression(generator, key);
    let builder = &generator.builder;

    match &parent.output_type {
        TypeId::String => {
            let string_ptr = parent_value.into_pointer_value();
            let length = call_runtime_value(
                generator,
                RuntimeFunction::StringLength,
                &[string_ptr.into()],
            )
            .into_int_value();
            let index = gen_checked_index(generator, key_value.into_int_value(), length);
            let char_ptr = unsafe { builder.build_gep(string_ptr, &[index], "char_ptr").unwrap() };
            let char_value = builder.build_load(char_ptr, "char").unwrap().into_int_value();
            builder
                .build_int_s_extend(char_value, generator.context.i64_type(), "")
                .unwrap()
                .into()
        }
        TypeId::Vector(element_type) => {
            let vector = parent_value.into_struct_value();
            let element_ptr = builder
                .build_extract_value(vector, 0, "element_ptr")
                .unwrap()
                .into_pointer_value();
            let element_count = builder
                .build_extract_value(vector, 1, "element_count")
                .unwrap()
                .into_int_value();
            let length = builder
                .build_int_z_extend(element_count, generator.context.i64_type(), "length")
                .unwrap();
            let index = gen_checked_index(generator, key_value.into_int_value(), length);
            let word_ptr = unsafe { builder.build_gep(element_ptr, &[index], "word_ptr").unwrap() };
            let word = builder.build_load(word_ptr, "word").unwrap().into_int_value();
            let element = unbox_word(generator, word, element_type);
            coerce_value(generator, element, element_type, output_type)
        }
        TypeId::Dict(value_type) => {
            let dict_ptr = spill_to_stack(generator, parent_value);
            let word = call_runtime_value(
                generator,
                RuntimeFunction::LookupDict,
                &[
                    dict_ptr.into(),
                    key_value.into(),
                    generator.itype_constant(value_type).into(),
                ],
            );
            let value = unbox_word(generator, word.into_int_value(), value_type);
            coerce_value(generator, value, value_type, output_type)
        }
        TypeId::JsonValue => {
            let (key_a, key_b) =
                split_wide(generator, encode_to_wide(generator, key_value, &key.output_type));
            call_runtime_value(
                generator,
                RuntimeFunction::LookupJson,
                &[
                    parent_value.into(),
                    key_a.into(),
                    key_b.into(),
                    generator.itype_constant(&key.output_type).into(),
                ],
            )
        }
        other => panic!("Cannot look up into {}", other),
    }
}

fn gen_construct_value<'a>(
    generator: &CodeGenerator<'a, '_>,
    output_type: &TypeId,
    elements: &[Expression],
) -> BasicValueEnum<'a> {
    match output_type {
        TypeId::Vector(element_type) => {
            let count = generator
                .context
                .i64_type()
                .const_int(elements.len() as u64, false);
            let wide = call_runtime_value(generator, RuntimeFunction::AllocateVector, &[count.into()]);
            let vector = decode_from_wide(generator, wide.into_struct_value(), output_type);
            let element_ptr = generator
                .builder
                .build_extract_value(vector.into_struct_value(), 0, "element_ptr")
                .unwrap()
                .into_pointer_value();

            for (index, element) in elements.iter().enumerate() {
                let value = gen_expression(generator, element);
                let value = coerce_value(generator, value, &element.output_type, element_type);
                let word = box_word(generator, value, element_type);
                let index = generator.context.i64_type().const_int(index as u64, false);
                let word_ptr = unsafe {
                    generator
                        .builder
                        .build_gep(element_ptr, &[index], "word_ptr")
                        .unwrap()
                };
                generator.builder.build_store(word_ptr, word).unwrap();
            }
            vector
        }
        TypeId::Dict(value_type) => {
            assert!(elements.len() % 2 == 0, "Dict constructor needs key/value pairs");
            let wide = call_runtime_value(generator, RuntimeFunction::AllocateDict, &[]);
            let mut dict = decode_from_wide(generator, wide.into_struct_value(), output_type);

            for pair in elements.chunks(2) {
                let key = gen_expression(generator, &pair[0]);
                let value = gen_expression(generator, &pair[1]);
                let value = coerce_value(generator, value, &pair[1].output_type, value_type);
                let word = box_word(generator, value, value_type);

                let dict_ptr = spill_to_stack(generator, dict);
                let wide = call_runtime_value(
                    generator,
                    RuntimeFunction::StoreDict,
                    &[dict_ptr.into(), key.into(), word.into()],
                );
                dict = decode_from_wide(generator, wide.into_struct_value(), output_type);
            }
            dict
        }
        TypeId::Struct(definition) => {
            assert_eq!(
                elements.len(),
                definition.members.len(),
                "Struct constructor for {} has wrong arity",
                output_type
            );
            let struct_type = generator.types.intern_struct_type(definition);
            let size = struct_type
                .size_of()
                .unwrap_or_else(|| panic!("Struct {} has no size", output_type));
            let memory = call_runtime_value(generator, RuntimeFunction::AllocateStruct, &[size.into()]);
            let struct_ptr = generator
                .builder
                .build_bit_cast(memory, generator.types.intern_type(output_type), "struct_ptr")
                .unwrap()
                .into_pointer_value();

            for (index, (member, element)) in
                definition.members.iter().zip(elements.iter()).enumerate()
            {
                let value = gen_expression(generator, element);
                let value = coerce_value(generator, value, &element.output_type, &member.member_type);
                let member_ptr = generator
                    .builder
                    .build_struct_gep(struct_ptr, index as u32, &member.name)
                    .unwrap();
                generator.builder.build_store(member_ptr, value).unwrap();
            }
            struct_ptr.into()
        }
        TypeId::JsonValue => {
            let i64_type = generator.context.i64_type();
            let (a, b, source_type) = match elements {
                [] => (i64_type.const_zero(), i64_type.const_zero(), TypeId::Undefined),
                [element] => {
                    let value = gen_expression(generator, element);
                    if element.output_type == TypeId::JsonValue {
                        return value;
                    }
                    let (a, b) =
                        split_wide(generator, encode_to_wide(generator, value, &element.output_type));
                    (a, b, element.output_type.clone())
                }
                _ => panic!("Json constructor takes at most one element"),
            };
            call_runtime_value(
                generator,
                RuntimeFunction::AllocateJson,
                &[a.into(), b.into(), generator.itype_constant(&source_type).into()],
            )
        }
        TypeId::Any
        | TypeId::Bool
        | TypeId::Int
        | TypeId::Double
        | TypeId::String
        | TypeId::Typeid
        | TypeId::Function(_) => {
            let [element] = elements else {
                panic!("Constructor for {} takes one element", output_type)
            };
            let value = gen_expression(generator, element);
            coerce_value(generator, value, &element.output_type, output_type)
        }
        TypeId::Undefined | TypeId::Void => panic!("Cannot construct a value of type {}", output_type),
    }
}
