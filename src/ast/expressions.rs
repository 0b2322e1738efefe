//! Typed expressions.
//!
//! Every expression carries its statically resolved output type. The kinds
//! form a closed sum type, so the code generator matches them exhaustively.

use super::{ast::VariableAddress, types::TypeId};

/// A compile-time constant.
///
/// Only scalar constants exist here. Vectors, dicts and structs are always
/// built through `ExpressionKind::ValueConstructor`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Typeid(TypeId),
    /// Index into `SemanticAst::function_defs`.
    Function(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    LogicalAnd,
    LogicalOr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    SmallerOrEqual,
    Smaller,
    LargerOrEqual,
    Larger,
    Equal,
    NotEqual,
}

impl ComparisonOp {
    /// Operation code passed to the native comparison helpers.
    pub fn code(self) -> i64 {
        match self {
            ComparisonOp::SmallerOrEqual => 0,
            ComparisonOp::Smaller => 1,
            ComparisonOp::LargerOrEqual => 2,
            ComparisonOp::Larger => 3,
            ComparisonOp::Equal => 4,
            ComparisonOp::NotEqual => 5,
        }
    }

    pub fn from_code(code: i64) -> Option<ComparisonOp> {
        let op = match code {
            0 => ComparisonOp::SmallerOrEqual,
            1 => ComparisonOp::Smaller,
            2 => ComparisonOp::LargerOrEqual,
            3 => ComparisonOp::Larger,
            4 => ComparisonOp::Equal,
            5 => ComparisonOp::NotEqual,
            _ => return None,
        };
        Some(op)
    }

    /// Applies the operation to the result of a three-way comparison.
    pub fn holds(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            ComparisonOp::SmallerOrEqual => ordering != Greater,
            ComparisonOp::Smaller => ordering == Less,
            ComparisonOp::LargerOrEqual => ordering != Less,
            ComparisonOp::Larger => ordering == Greater,
            ComparisonOp::Equal => ordering == Equal,
            ComparisonOp::NotEqual => ordering != Equal,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionKind {
    Literal(Value),
    Arithmetic {
        op: ArithmeticOp,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    Comparison {
        op: ComparisonOp,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    UnaryMinus(Box<Expression>),
    Conditional {
        condition: Box<Expression>,
        a: Box<Expression>,
        b: Box<Expression>,
    },
    Call {
        callee: Box<Expression>,
        args: Vec<Expression>,
    },
    ResolveMember {
        parent: Box<Expression>,
        member_name: String,
    },
    Lookup {
        parent: Box<Expression>,
        key: Box<Expression>,
    },
    /// Builds a value of the expression's output type from its elements.
    /// Dict elements are a flat key, value, key, value list.
    ValueConstructor { elements: Vec<Expression> },
    Load(VariableAddress),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub kind: ExpressionKind,
    pub output_type: TypeId,
}

impl Expression {
    pub fn new(kind: ExpressionKind, output_type: TypeId) -> Self {
        Expression { kind, output_type }
    }

    pub fn literal_bool(value: bool) -> Self {
        Expression::new(ExpressionKind::Literal(Value::Bool(value)), TypeId::Bool)
    }

    pub fn literal_int(value: i64) -> Self {
        Expression::new(ExpressionKind::Literal(Value::Int(value)), TypeId::Int)
    }

    pub fn literal_double(value: f64) -> Self {
        Expression::new(ExpressionKind::Literal(Value::Double(value)), TypeId::Double)
    }

    pub fn literal_string(value: &str) -> Self {
        Expression::new(
            ExpressionKind::Literal(Value::String(value.to_string())),
            TypeId::String,
        )
    }

    pub fn literal_typeid(value: TypeId) -> Self {
        Expression::new(ExpressionKind::Literal(Value::Typeid(value)), TypeId::Typeid)
    }

    pub fn literal_function(function_id: usize, function_type: TypeId) -> Self {
        Expression::new(
            ExpressionKind::Literal(Value::Function(function_id)),
            function_type,
        )
    }

    /// The result has the type of the left operand.
    pub fn arithmetic(op: ArithmeticOp, lhs: Expression, rhs: Expression) -> Self {
        let output_type = lhs.output_type.clone();
        Expression::new(
            ExpressionKind::Arithmetic {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            output_type,
        )
    }

    pub fn comparison(op: ComparisonOp, lhs: Expression, rhs: Expression) -> Self {
        Expression::new(
            ExpressionKind::Comparison {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            TypeId::Bool,
        )
    }

    pub fn unary_minus(expression: Expression) -> Self {
        let output_type = expression.output_type.clone();
        Expression::new(ExpressionKind::UnaryMinus(Box::new(expression)), output_type)
    }

    pub fn conditional(condition: Expression, a: Expression, b: Expression) -> Self {
        let output_type = a.output_type.clone();
        Expression::new(
            ExpressionKind::Conditional {
                condition: Box::new(condition),
                a: Box::new(a),
                b: Box::new(b),
            },
            output_type,
        )
    }

    /// `output_type` is the type resolved at the call site, which may be
    /// more precise than the callee's declared return type.
    pub fn call(callee: Expression, args: Vec<Expression>, output_type: TypeId) -> Self {
        Expression::new(
            ExpressionKind::Call {
                callee: Box::new(callee),
                args,
            },
            output_type,
        )
    }

    /// # Panics
    ///
    /// Panics if the parent is not a struct with that member.
    pub fn resolve_member(parent: Expression, member_name: &str) -> Self {
        let definition = parent.output_type.struct_definition();
        let index = definition
            .find_member_index(member_name)
            .unwrap_or_else(|| panic!("Struct has no member {:?}", member_name));
        let output_type = definition.members[index].member_type.clone();
        Expression::new(
            ExpressionKind::ResolveMember {
                parent: Box::new(parent),
                member_name: member_name.to_string(),
            },
            output_type,
        )
    }

    pub fn lookup(parent: Expression, key: Expression, output_type: TypeId) -> Self {
        Expression::new(
            ExpressionKind::Lookup {
                parent: Box::new(parent),
                key: Box::new(key),
            },
            output_type,
        )
    }

    pub fn construct(output_type: TypeId, elements: Vec<Expression>) -> Self {
        Expression::new(ExpressionKind::ValueConstructor { elements }, output_type)
    }

    pub fn load(address: VariableAddress, output_type: TypeId) -> Self {
        Expression::new(ExpressionKind::Load(address), output_type)
    }

    /// Visits every type mentioned by this expression tree.
    pub fn walk_types<F: FnMut(&TypeId)>(&self, visit: &mut F) {
        visit(&self.output_type);
        match &self.kind {
            ExpressionKind::Literal(Value::Typeid(type_)) => visit(type_),
            ExpressionKind::Literal(_) | ExpressionKind::Load(_) => {}
            ExpressionKind::Arithmetic { lhs, rhs, .. }
            | ExpressionKind::Comparison { lhs, rhs, .. } => {
                lhs.walk_types(visit);
                rhs.walk_types(visit);
            }
            ExpressionKind::UnaryMinus(expression) => expression.walk_types(visit),
            ExpressionKind::Conditional { condition, a, b } => {
                condition.walk_types(visit);
                a.walk_types(visit);
                b.walk_types(visit);
            }
            ExpressionKind::Call { callee, args } => {
                callee.walk_types(visit);
                for arg in args.iter() {
                    arg.walk_types(visit);
                }
            }
            ExpressionKind::ResolveMember { parent, .. } => parent.walk_types(visit),
            ExpressionKind::Lookup { parent, key } => {
                parent.walk_types(visit);
                key.walk_types(visit);
            }
            ExpressionKind::ValueConstructor { elements } => {
                for element in elements.iter() {
                    element.walk_types(visit);
                }
            }
        }
    }
}
