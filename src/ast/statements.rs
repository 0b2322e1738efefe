//! Typed statements.

use super::{
    ast::{Body, VariableAddress},
    expressions::Expression,
    types::TypeId,
};

/// Range kind of a `for` loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeType {
    /// `start ... end`, end included.
    Closed,
    /// `start ..< end`, end excluded.
    Open,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Return(Expression),
    /// Assigns to an existing slot. Slots are only created on scope entry.
    Store {
        address: VariableAddress,
        value: Expression,
    },
    Block(Body),
    If {
        condition: Expression,
        then_body: Body,
        else_body: Body,
    },
    /// The induction variable is the first symbol of `body`.
    For {
        range_type: RangeType,
        start: Expression,
        end: Expression,
        body: Body,
    },
    While {
        condition: Expression,
        body: Body,
    },
    Expression(Expression),
}

impl Statement {
    pub fn walk_types<F: FnMut(&TypeId)>(&self, visit: &mut F) {
        match self {
            Statement::Return(expression) | Statement::Expression(expression) => {
                expression.walk_types(visit)
            }
            Statement::Store { value, .. } => value.walk_types(visit),
            Statement::Block(body) => body.walk_types(visit),
            Statement::If {
                condition,
                then_body,
                else_body,
            } => {
                condition.walk_types(visit);
                then_body.walk_types(visit);
                else_body.walk_types(visit);
            }
            Statement::For {
                start, end, body, ..
            } => {
                start.walk_types(visit);
                end.walk_types(visit);
                body.walk_types(visit);
            }
            Statement::While { condition, body } => {
                condition.walk_types(visit);
                body.walk_types(visit);
            }
        }
    }
}
