//! The typed syntax tree consumed by the resolver.
//!
//! All nodes are stored in arenas owned by the [`Module`] and refer to each other by handle. The
//! tree is immutable once parsing has finished.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::arena::{Arena, Handle};
use crate::diagnostic::{LineIndex, Location};

pub use crate::diagnostic::Span;

pub type ExprId = Handle<Expr>;
pub type StmtId = Handle<Stmt>;
pub type VarId = Handle<Variable>;
pub type FnId = Handle<Function>;
pub type StructId = Handle<Struct>;
pub type AliasId = Handle<Alias>;

/// Identifies the symbol table which created a [`Symbol`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(u32);

impl ProgramId {
    fn next() -> ProgramId {
        static NEXT: AtomicU32 = AtomicU32::new(0);
        ProgramId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// An interned identifier. Two symbols are equal exactly when they name the same string in the
/// same program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol {
    id: u32,
    program: u32,
}

impl Symbol {
    pub fn program(self) -> ProgramId {
        ProgramId(self.program)
    }
}

#[derive(Debug)]
pub struct SymbolTable {
    program: ProgramId,
    names: Vec<Box<str>>,
    lookup: HashMap<Box<str>, Symbol>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        SymbolTable { program: ProgramId::next(), names: Vec::new(), lookup: HashMap::new() }
    }

    pub fn program(&self) -> ProgramId {
        self.program
    }

    pub fn intern(&mut self, name: &str) -> Symbol {
        if let Some(symbol) = self.lookup.get(name) {
            return *symbol;
        }
        let symbol = Symbol { id: self.names.len() as u32, program: self.program.0 };
        self.names.push(name.into());
        self.lookup.insert(name.into(), symbol);
        symbol
    }

    pub fn get(&self, name: &str) -> Option<Symbol> {
        self.lookup.get(name).copied()
    }

    pub fn name(&self, symbol: Symbol) -> &str {
        assert_eq!(
            symbol.program(),
            self.program,
            "symbol from program {:?} used with program {:?}",
            symbol.program(),
            self.program
        );
        &self.names[symbol.id as usize]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ident {
    pub symbol: Symbol,
    pub span: Span,
}

/// An identifier with an optional template list, such as `vec3<f32>` or `ptr<function, i32>`.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplatedIdent {
    pub ident: Ident,
    pub template: Vec<ExprId>,
}

#[derive(Debug, Default)]
pub struct Module {
    pub symbols: SymbolTable,
    pub lines: Option<LineIndex>,

    /// Extensions named by `enable` directives.
    pub enables: Vec<Ident>,
    /// Module-scope declarations in source order.
    pub decls: Vec<GlobalDecl>,

    pub exprs: Arena<Expr>,
    pub stmts: Arena<Stmt>,
    pub vars: Arena<Variable>,
    pub functions: Arena<Function>,
    pub structs: Arena<Struct>,
    pub aliases: Arena<Alias>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlobalDecl {
    /// `var`, `const` or `override`.
    Var(VarId),
    Function(FnId),
    Struct(StructId),
    Alias(AliasId),
    /// A `const_assert` statement.
    ConstAssert(StmtId),
}

impl Module {
    pub fn name(&self, ident: Ident) -> &str {
        self.symbols.name(ident.symbol)
    }

    /// The name and source span of a module-scope declaration, if it declares a name.
    pub fn decl_name(&self, decl: GlobalDecl) -> Option<Ident> {
        match decl {
            GlobalDecl::Var(var) => Some(self.vars[var].name),
            GlobalDecl::Function(func) => Some(self.functions[func].name),
            GlobalDecl::Struct(strukt) => Some(self.structs[strukt].name),
            GlobalDecl::Alias(alias) => Some(self.aliases[alias].name),
            GlobalDecl::ConstAssert(_) => None,
        }
    }

    /// The source location of a span, if the module was parsed from source.
    pub fn location(&self, span: Span) -> Option<Location> {
        self.lines.as_ref().map(|lines| lines.location(span.start))
    }

    /// A description of the declaration such as `var` or `function`, as used in diagnostics.
    pub fn decl_kind(&self, decl: GlobalDecl) -> &'static str {
        match decl {
            GlobalDecl::Var(var) => self.vars[var].kind.as_str(),
            GlobalDecl::Function(_) => "function",
            GlobalDecl::Struct(_) => "struct",
            GlobalDecl::Alias(_) => "alias",
            GlobalDecl::ConstAssert(_) => "const_assert",
        }
    }

    pub fn is_enabled(&self, extension: &str) -> bool {
        self.enables.iter().any(|ident| self.name(*ident) == extension)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// A reference to a value or type, possibly with a template list.
    Ident(TemplatedIdent),
    Literal(Literal),
    Call { callee: TemplatedIdent, args: Vec<ExprId> },
    Index { base: ExprId, index: ExprId },
    Member { base: ExprId, member: Ident },
    Unary { op: UnaryOp, operand: ExprId },
    Binary { op: BinaryOp, lhs: ExprId, rhs: ExprId },
    /// The `_` on the left hand side of a phony assignment.
    Phony,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal {
    Int { value: i64, suffix: IntSuffix },
    Float { value: f64, suffix: FloatSuffix },
    Bool(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntSuffix {
    None,
    I,
    U,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatSuffix {
    None,
    F,
    H,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
    Complement,
    AddressOf,
    Indirection,
}

impl UnaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            UnaryOp::Negate => "-",
            UnaryOp::Not => "!",
            UnaryOp::Complement => "~",
            UnaryOp::AddressOf => "&",
            UnaryOp::Indirection => "*",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    And,
    Or,
    Xor,
    ShiftLeft,
    ShiftRight,
    LogicalAnd,
    LogicalOr,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl BinaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::Xor => "^",
            BinaryOp::ShiftLeft => "<<",
            BinaryOp::ShiftRight => ">>",
            BinaryOp::LogicalAnd => "&&",
            BinaryOp::LogicalOr => "||",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::Less
                | BinaryOp::LessEqual
                | BinaryOp::Greater
                | BinaryOp::GreaterEqual
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub stmts: Vec<StmtId>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Block(Block),
    /// A function-scope `var`, `let` or `const`.
    Decl(VarId),
    Return(Option<ExprId>),
    If {
        condition: ExprId,
        accept: Block,
        /// Either another `if` statement or a block.
        reject: Option<StmtId>,
    },
    Switch {
        selector: ExprId,
        clauses: Vec<SwitchClause>,
    },
    Loop {
        body: Block,
        continuing: Option<Block>,
    },
    For {
        init: Option<StmtId>,
        condition: Option<ExprId>,
        update: Option<StmtId>,
        body: Block,
    },
    While {
        condition: ExprId,
        body: Block,
    },
    Break,
    BreakIf(ExprId),
    Continue,
    Discard,
    /// `lhs = rhs` or, with an operator, `lhs op= rhs`.
    Assign {
        lhs: ExprId,
        op: Option<BinaryOp>,
        rhs: ExprId,
    },
    Increment(ExprId),
    Decrement(ExprId),
    Call(ExprId),
    ConstAssert(ExprId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchClause {
    pub selectors: Vec<CaseSelector>,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CaseSelector {
    Default(Span),
    Expr(ExprId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    Var,
    Let,
    Const,
    Override,
    Parameter,
}

impl VariableKind {
    pub fn as_str(self) -> &'static str {
        match self {
            VariableKind::Var => "var",
            VariableKind::Let => "let",
            VariableKind::Const => "const",
            VariableKind::Override => "override",
            VariableKind::Parameter => "parameter",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub kind: VariableKind,
    pub name: Ident,
    /// The template list of a `var`, naming the address space and access mode.
    pub template: Vec<ExprId>,
    pub ty: Option<ExprId>,
    pub initializer: Option<ExprId>,
    pub attributes: Vec<Attribute>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: Ident,
    pub attributes: Vec<Attribute>,
    pub params: Vec<VarId>,
    pub return_type: Option<ExprId>,
    pub return_attributes: Vec<Attribute>,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Struct {
    pub name: Ident,
    pub members: Vec<StructMember>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructMember {
    pub name: Ident,
    pub ty: ExprId,
    pub attributes: Vec<Attribute>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alias {
    pub name: Ident,
    pub ty: ExprId,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub kind: AttributeKind,
    pub args: Vec<ExprId>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    Align,
    Binding,
    Builtin,
    Compute,
    Const,
    Diagnostic,
    Fragment,
    Group,
    Id,
    Interpolate,
    Invariant,
    Location,
    MustUse,
    Size,
    Vertex,
    WorkgroupSize,
}

impl AttributeKind {
    pub fn from_name(name: &str) -> Option<AttributeKind> {
        Some(match name {
            "align" => AttributeKind::Align,
            "binding" => AttributeKind::Binding,
            "builtin" => AttributeKind::Builtin,
            "compute" => AttributeKind::Compute,
            "const" => AttributeKind::Const,
            "diagnostic" => AttributeKind::Diagnostic,
            "fragment" => AttributeKind::Fragment,
            "group" => AttributeKind::Group,
            "id" => AttributeKind::Id,
            "interpolate" => AttributeKind::Interpolate,
            "invariant" => AttributeKind::Invariant,
            "location" => AttributeKind::Location,
            "must_use" => AttributeKind::MustUse,
            "size" => AttributeKind::Size,
            "vertex" => AttributeKind::Vertex,
            "workgroup_size" => AttributeKind::WorkgroupSize,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            AttributeKind::Align => "align",
            AttributeKind::Binding => "binding",
            AttributeKind::Builtin => "builtin",
            AttributeKind::Compute => "compute",
            AttributeKind::Const => "const",
            AttributeKind::Diagnostic => "diagnostic",
            AttributeKind::Fragment => "fragment",
            AttributeKind::Group => "group",
            AttributeKind::Id => "id",
            AttributeKind::Interpolate => "interpolate",
            AttributeKind::Invariant => "invariant",
            AttributeKind::Location => "location",
            AttributeKind::MustUse => "must_use",
            AttributeKind::Size => "size",
            AttributeKind::Vertex => "vertex",
            AttributeKind::WorkgroupSize => "workgroup_size",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbols_are_interned() {
        let mut table = SymbolTable::new();
        let a = table.intern("a");
        let b = table.intern("b");
        assert_eq!(a, table.intern("a"));
        assert_ne!(a, b);
        assert_eq!(table.name(b), "b");
    }

    #[test]
    #[should_panic(expected = "used with program")]
    fn symbols_are_program_specific() {
        let mut first = SymbolTable::new();
        let second = SymbolTable::new();
        let symbol = first.intern("x");
        second.name(symbol);
    }
}
