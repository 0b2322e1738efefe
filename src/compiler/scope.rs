//! Lexical scope resolution for code generation.
//!
//! Resolved symbols live in one arena; each open scope is a frame recording
//! where its slots start. Frame 0 always holds the globals.

use inkwell::values::BasicValueEnum;

use crate::ast::ast::{Symbol, VariableAddress};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolType {
    Global,
    Local,
    FunctionArgument,
}

#[derive(Debug, Clone)]
pub struct ResolvedSymbol<'a> {
    /// Pointer to the storage for globals and locals, the argument value
    /// itself for function arguments.
    pub value_ptr: BasicValueEnum<'a>,
    pub debug_str: String,
    pub symtype: SymbolType,
    pub name: String,
    pub symbol: Symbol,
}

impl<'a> ResolvedSymbol<'a> {
    pub fn new(
        value_ptr: BasicValueEnum<'a>,
        symtype: SymbolType,
        name: &str,
        symbol: Symbol,
    ) -> Self {
        ResolvedSymbol {
            value_ptr,
            debug_str: format!("{:?} {} : {}", symtype, name, symbol.value_type),
            symtype,
            name: name.to_string(),
            symbol,
        }
    }
}

#[derive(Debug, Default)]
pub struct ScopeStack<'a> {
    slots: Vec<ResolvedSymbol<'a>>,
    frames: Vec<usize>,
}

impl<'a> ScopeStack<'a> {
    pub fn new() -> Self {
        ScopeStack {
            slots: vec![],
            frames: vec![],
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn push_frame(&mut self, symbols: Vec<ResolvedSymbol<'a>>) {
        self.frames.push(self.slots.len());
        self.slots.extend(symbols);
    }

    /// # Panics
    ///
    /// Panics if no frame is open.
    pub fn pop_frame(&mut self) {
        let base = self.frames.pop().expect("Popped an empty scope stack");
        self.slots.truncate(base);
    }

    fn frame_slots(&self, frame_index: usize) -> &[ResolvedSymbol<'a>] {
        let base = self.frames[frame_index];
        let end = self
            .frames
            .get(frame_index + 1)
            .copied()
            .unwrap_or(self.slots.len());
        &self.slots[base..end]
    }

    /// Finds the symbol a variable address refers to.
    ///
    /// # Panics
    ///
    /// Panics if the address points outside the open scopes.
    pub fn resolve(&self, address: VariableAddress) -> &ResolvedSymbol<'a> {
        let frame_index = if address.parent_steps == VariableAddress::GLOBAL_SCOPE {
            0
        } else {
            let steps = address.parent_steps as usize;
            assert!(
                steps < self.frames.len(),
                "Variable address {:?} escapes the scope stack",
                address
            );
            self.frames.len() - 1 - steps
        };

        self.frame_slots(frame_index)
            .get(address.index)
            .unwrap_or_else(|| panic!("No slot for variable address {:?}", address))
    }
}
