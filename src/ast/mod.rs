/// AST (Abstract Syntax Tree) module
/// Contains the fully typed program tree the back end consumes
///
/// Submodules:
/// - ast: Program, function definitions, bodies and symbol tables
/// - expressions: Typed expression kinds
/// - statements: Typed statement kinds
/// - types: Type descriptors
/// - interner: Type interning (descriptor <-> itype)
pub mod ast;
pub mod expressions;
pub mod interner;
pub mod statements;
pub mod types;
