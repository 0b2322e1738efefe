use super::{
    expressions::Value,
    interner::TypeInterner,
    statements::Statement,
    types::TypeId,
};

/// Lexical address of a variable.
///
/// `parent_steps` counts scopes outward from the current one; the special
/// value `GLOBAL_SCOPE` addresses the global scope directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariableAddress {
    pub parent_steps: i32,
    pub index: usize,
}

impl VariableAddress {
    pub const GLOBAL_SCOPE: i32 = -1;

    pub fn global(index: usize) -> Self {
        VariableAddress {
            parent_steps: Self::GLOBAL_SCOPE,
            index,
        }
    }

    pub fn local(parent_steps: i32, index: usize) -> Self {
        assert!(parent_steps >= 0);
        VariableAddress {
            parent_steps,
            index,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    /// A function argument, bound to the incoming LLVM parameter.
    Argument,
    Immutable,
    Mutable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub kind: SymbolKind,
    pub value_type: TypeId,
    /// Compile-time initializer, stored when the scope is entered.
    pub init: Option<Value>,
}

impl Symbol {
    pub fn argument(value_type: TypeId) -> Self {
        Symbol {
            kind: SymbolKind::Argument,
            value_type,
            init: None,
        }
    }

    pub fn immutable(value_type: TypeId) -> Self {
        Symbol {
            kind: SymbolKind::Immutable,
            value_type,
            init: None,
        }
    }

    pub fn mutable(value_type: TypeId) -> Self {
        Symbol {
            kind: SymbolKind::Mutable,
            value_type,
            init: None,
        }
    }

    pub fn constant(value_type: TypeId, init: Value) -> Self {
        Symbol {
            kind: SymbolKind::Immutable,
            value_type,
            init: Some(init),
        }
    }
}

/// Ordered symbols of one lexical scope. Slot indexes are positions here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymbolTable {
    pub symbols: Vec<(String, Symbol)>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable { symbols: vec![] }
    }

    /// Appends a symbol and returns its slot index.
    pub fn add(&mut self, name: &str, symbol: Symbol) -> usize {
        self.symbols.push((name.to_string(), symbol));
        self.symbols.len() - 1
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.symbols.iter().position(|(id, _)| id == name)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// A statement list together with the symbols it declares.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Body {
    pub statements: Vec<Statement>,
    pub symbol_table: SymbolTable,
}

impl Body {
    pub fn new(statements: Vec<Statement>, symbol_table: SymbolTable) -> Self {
        Body {
            statements,
            symbol_table,
        }
    }

    pub fn from_statements(statements: Vec<Statement>) -> Self {
        Body {
            statements,
            symbol_table: SymbolTable::new(),
        }
    }

    pub fn walk_types<F: FnMut(&TypeId)>(&self, visit: &mut F) {
        for (_, symbol) in self.symbol_table.symbols.iter() {
            visit(&symbol.value_type);
            if let Some(Value::Typeid(type_)) = &symbol.init {
                visit(type_);
            }
        }
        for statement in self.statements.iter() {
            statement.walk_types(visit);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FunctionBody {
    /// The first symbols of the body are the arguments, in order.
    Floyd(Body),
    /// Implemented natively; only the signature is known.
    Host,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDefinition {
    pub name: String,
    pub function_type: TypeId,
    pub body: FunctionBody,
}

impl FunctionDefinition {
    /// # Panics
    ///
    /// Panics if the leading symbols of `body` do not match the arguments.
    pub fn floyd(name: &str, function_type: TypeId, body: Body) -> Self {
        let signature = function_type.function_signature();
        for (index, arg_type) in signature.args.iter().enumerate() {
            let (arg_name, symbol) = body
                .symbol_table
                .symbols
                .get(index)
                .unwrap_or_else(|| panic!("Function {} is missing argument {}", name, index));
            assert!(
                symbol.kind == SymbolKind::Argument && &symbol.value_type == arg_type,
                "Argument {:?} of {} does not match its signature",
                arg_name,
                name
            );
        }

        FunctionDefinition {
            name: name.to_string(),
            function_type,
            body: FunctionBody::Floyd(body),
        }
    }

    pub fn host(name: &str, function_type: TypeId) -> Self {
        assert!(matches!(function_type, TypeId::Function(_)));
        FunctionDefinition {
            name: name.to_string(),
            function_type,
            body: FunctionBody::Host,
        }
    }
}

/// The fully type-checked program handed to the back end.
#[derive(Debug, Clone)]
pub struct SemanticAst {
    pub globals: Body,
    pub function_defs: Vec<FunctionDefinition>,
    pub interner: TypeInterner,
}

impl SemanticAst {
    /// Builds the program and freezes a type table containing every type
    /// reachable from it.
    pub fn new(globals: Body, function_defs: Vec<FunctionDefinition>) -> Self {
        let mut interner = TypeInterner::new();

        let mut reachable = vec![];
        globals.walk_types(&mut |type_| reachable.push(type_.clone()));
        for function_def in function_defs.iter() {
            reachable.push(function_def.function_type.clone());
            if let FunctionBody::Floyd(body) = &function_def.body {
                body.walk_types(&mut |type_| reachable.push(type_.clone()));
            }
        }

        for type_ in reachable.iter() {
            interner.intern(type_);
        }
        interner.freeze();

        SemanticAst {
            globals,
            function_defs,
            interner,
        }
    }

    pub fn find_function(&self, name: &str) -> Option<usize> {
        self.function_defs
            .iter()
            .position(|function_def| function_def.name == name)
    }
}
