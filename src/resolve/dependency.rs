//! Orders module-scope declarations so that every declaration comes after the declarations it
//! references.

use std::collections::HashMap;

use crate::ast::{
    Block, CaseSelector, ExprId, ExprKind, GlobalDecl, Module, StmtId, StmtKind, Symbol, VarId,
};
use crate::diagnostic::{Diagnostics, Span};

use super::scope::Scope;

/// Maps the names of module-scope declarations to their declaration. Later declarations with the
/// same name are reported and ignored.
pub fn collect_globals(module: &Module, diagnostics: &mut Diagnostics) -> HashMap<Symbol, GlobalDecl> {
    let mut globals = HashMap::with_capacity(module.decls.len());
    for &decl in module.decls.iter() {
        let Some(name) = module.decl_name(decl) else { continue };
        match globals.get(&name.symbol) {
            Some(&previous) => {
                let text = module.name(name);
                diagnostics.error(module.location(name.span), format!("redeclaration of '{text}'"));
                if let Some(previous) = module.decl_name(previous) {
                    diagnostics.note(
                        module.location(previous.span),
                        format!("'{text}' previously declared here"),
                    );
                }
            },
            None => {
                globals.insert(name.symbol, decl);
            },
        }
    }
    globals
}

/// Sorts the module-scope declarations topologically. Declarations without a dependency between
/// them keep their source order.
///
/// Returns `None` after reporting a cyclic dependency.
pub fn sort(
    module: &Module,
    globals: &HashMap<Symbol, GlobalDecl>,
    diagnostics: &mut Diagnostics,
) -> Option<Vec<GlobalDecl>> {
    let index: HashMap<GlobalDecl, usize> =
        module.decls.iter().enumerate().map(|(i, decl)| (*decl, i)).collect();

    let edges: Vec<Vec<(usize, Span)>> = module
        .decls
        .iter()
        .map(|&decl| {
            let mut collector = ReferenceCollector::new(module, globals);
            collector.decl(decl);
            collector.references.into_iter().map(|(target, span)| (index[&target], span)).collect()
        })
        .collect();

    let mut sorter = Sorter {
        edges: &edges,
        state: vec![State::Unvisited; edges.len()],
        path: Vec::new(),
        order: Vec::with_capacity(edges.len()),
    };

    for root in 0..edges.len() {
        if let Err(cycle) = sorter.visit(root) {
            report_cycle(module, &cycle, diagnostics);
            return None;
        }
    }

    Some(sorter.order.into_iter().map(|i| module.decls[i]).collect())
}

fn report_cycle(module: &Module, cycle: &[(usize, Span)], diagnostics: &mut Diagnostics) {
    let decl = |i: usize| module.decls[i];
    let name = |i: usize| module.decl_name(decl(i)).map_or("", |ident| module.name(ident));

    let Some(&(first, _)) = cycle.first() else { return };
    let mut chain = format!("'{}'", name(first));
    for position in 0..cycle.len() {
        let target = cycle.get(position + 1).map_or(first, |(target, _)| *target);
        chain.push_str(&format!(" -> '{}'", name(target)));
    }

    let span = module.decl_name(decl(first)).map_or(Span::default(), |ident| ident.span);
    diagnostics.error(module.location(span), format!("cyclic dependency found: {chain}"));

    for (position, &(from, reference)) in cycle.iter().enumerate() {
        let to = cycle.get(position + 1).map_or(first, |(target, _)| *target);
        let verb = match (decl(from), decl(to)) {
            (GlobalDecl::Function(_), GlobalDecl::Function(_)) => "calls",
            _ => "references",
        };
        diagnostics.note(
            module.location(reference),
            format!(
                "{} '{}' {verb} {} '{}' here",
                module.decl_kind(decl(from)),
                name(from),
                module.decl_kind(decl(to)),
                name(to)
            ),
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Unvisited,
    InProgress,
    Done,
}

struct Sorter<'a> {
    edges: &'a [Vec<(usize, Span)>],
    state: Vec<State>,
    /// Declarations currently being visited, with the reference leading to the next one.
    path: Vec<(usize, Span)>,
    order: Vec<usize>,
}

impl Sorter<'_> {
    /// Fails with the declarations forming a cycle, each paired with the span of its reference to
    /// the next declaration in the cycle.
    fn visit(&mut self, node: usize) -> Result<(), Vec<(usize, Span)>> {
        match self.state[node] {
            State::Done => return Ok(()),
            State::InProgress => {
                let start = self.path.iter().position(|(entry, _)| *entry == node).unwrap_or(0);
                return Err(self.path[start..].to_vec());
            },
            State::Unvisited => {},
        }

        self.state[node] = State::InProgress;
        for &(target, span) in self.edges[node].iter() {
            self.path.push((node, span));
            self.visit(target)?;
            self.path.pop();
        }
        self.state[node] = State::Done;
        self.order.push(node);
        Ok(())
    }
}

/// Finds the module-scope declarations referenced by a declaration, skipping names that are
/// shadowed by local declarations.
struct ReferenceCollector<'a> {
    module: &'a Module,
    globals: &'a HashMap<Symbol, GlobalDecl>,
    locals: Scope<()>,
    references: Vec<(GlobalDecl, Span)>,
}

impl<'a> ReferenceCollector<'a> {
    fn new(module: &'a Module, globals: &'a HashMap<Symbol, GlobalDecl>) -> Self {
        ReferenceCollector { module, globals, locals: Scope::new(), references: Vec::new() }
    }

    fn reference(&mut self, symbol: Symbol, span: Span) {
        if self.locals.get(symbol).is_some() {
            return;
        }
        let Some(&target) = self.globals.get(&symbol) else { return };
        if !self.references.iter().any(|(existing, _)| *existing == target) {
            self.references.push((target, span));
        }
    }

    fn decl(&mut self, decl: GlobalDecl) {
        let module = self.module;
        match decl {
            GlobalDecl::Var(var) => self.variable(var),
            GlobalDecl::Function(func) => {
                let func = &module.functions[func];
                self.attributes(&func.attributes);
                let scope = self.locals.begin();
                for &param in func.params.iter() {
                    self.variable(param);
                    let _ = self.locals.declare(module.vars[param].name.symbol, ());
                }
                if let Some(ty) = func.return_type {
                    self.expr(ty);
                }
                self.attributes(&func.return_attributes);
                self.block_contents(&func.body);
                self.locals.end(scope);
            },
            GlobalDecl::Struct(strukt) => {
                for member in module.structs[strukt].members.iter() {
                    self.expr(member.ty);
                    self.attributes(&member.attributes);
                }
            },
            GlobalDecl::Alias(alias) => self.expr(module.aliases[alias].ty),
            GlobalDecl::ConstAssert(stmt) => self.stmt(stmt),
        }
    }

    fn variable(&mut self, var: VarId) {
        let module = self.module;
        let var = &module.vars[var];
        // the template of a `var` only names an address space and access mode
        if let Some(ty) = var.ty {
            self.expr(ty);
        }
        if let Some(init) = var.initializer {
            self.expr(init);
        }
        self.attributes(&var.attributes);
    }

    fn attributes(&mut self, attributes: &[crate::ast::Attribute]) {
        for attribute in attributes {
            for &arg in attribute.args.iter() {
                self.expr(arg);
            }
        }
    }

    fn block(&mut self, block: &Block) {
        let scope = self.locals.begin();
        self.block_contents(block);
        self.locals.end(scope);
    }

    fn block_contents(&mut self, block: &Block) {
        for &stmt in block.stmts.iter() {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: StmtId) {
        let module = self.module;
        match &module.stmts[stmt].kind {
            StmtKind::Block(block) => self.block(block),
            StmtKind::Decl(var) => {
                self.variable(*var);
                let _ = self.locals.declare(module.vars[*var].name.symbol, ());
            },
            StmtKind::Return(value) => {
                if let Some(value) = value {
                    self.expr(*value);
                }
            },
            StmtKind::If { condition, accept, reject } => {
                self.expr(*condition);
                self.block(accept);
                if let Some(reject) = reject {
                    self.stmt(*reject);
                }
            },
            StmtKind::Switch { selector, clauses } => {
                self.expr(*selector);
                for clause in clauses {
                    for selector in clause.selectors.iter() {
                        if let CaseSelector::Expr(expr) = selector {
                            self.expr(*expr);
                        }
                    }
                    self.block(&clause.body);
                }
            },
            StmtKind::Loop { body, continuing } => {
                let scope = self.locals.begin();
                self.block_contents(body);
                if let Some(continuing) = continuing {
                    self.block(continuing);
                }
                self.locals.end(scope);
            },
            StmtKind::For { init, condition, update, body } => {
                let scope = self.locals.begin();
                if let Some(init) = init {
                    self.stmt(*init);
                }
                if let Some(condition) = condition {
                    self.expr(*condition);
                }
                if let Some(update) = update {
                    self.stmt(*update);
                }
                self.block(body);
                self.locals.end(scope);
            },
            StmtKind::While { condition, body } => {
                self.expr(*condition);
                self.block(body);
            },
            StmtKind::Break | StmtKind::Continue | StmtKind::Discard => {},
            StmtKind::Assign { lhs, rhs, .. } => {
                self.expr(*lhs);
                self.expr(*rhs);
            },
            StmtKind::BreakIf(expr)
            | StmtKind::Increment(expr)
            | StmtKind::Decrement(expr)
            | StmtKind::Call(expr)
            | StmtKind::ConstAssert(expr) => self.expr(*expr),
        }
    }

    fn expr(&mut self, expr: ExprId) {
        let module = self.module;
        match &module.exprs[expr].kind {
            ExprKind::Ident(ident) => {
                self.reference(ident.ident.symbol, ident.ident.span);
                for &arg in ident.template.iter() {
                    self.expr(arg);
                }
            },
            ExprKind::Call { callee, args } => {
                self.reference(callee.ident.symbol, callee.ident.span);
                for &arg in callee.template.iter().chain(args.iter()) {
                    self.expr(arg);
                }
            },
            ExprKind::Index { base, index } => {
                self.expr(*base);
                self.expr(*index);
            },
            ExprKind::Member { base, .. } => self.expr(*base),
            ExprKind::Unary { operand, .. } => self.expr(*operand),
            ExprKind::Binary { lhs, rhs, .. } => {
                self.expr(*lhs);
                self.expr(*rhs);
            },
            ExprKind::Literal(_) | ExprKind::Phony => {},
        }
    }
}

#[cfg(test)]
mod tests {
    use expect_test::{expect, Expect};
    use indoc::indoc;

    use super::*;

    fn check(source: &str, expected: Expect) {
        let module = crate::parse::parse(source).unwrap_or_else(|error| panic!("{error}"));
        let mut diagnostics = Diagnostics::new();
        let globals = collect_globals(&module, &mut diagnostics);
        let output = match sort(&module, &globals, &mut diagnostics) {
            Some(order) => order
                .into_iter()
                .filter_map(|decl| module.decl_name(decl))
                .map(|name| module.name(name).to_string())
                .collect::<Vec<_>>()
                .join(" "),
            None => String::new(),
        };
        expected.assert_eq(&format!("{output}\n{diagnostics}"));
    }

    #[test]
    fn declaration_order_is_irrelevant() {
        check(
            indoc! {r#"
                fn main() -> S { return S(b); }
                struct S { x: T }
                alias T = f32;
                const b = a * 2.0;
                const a = 1.0;
            "#},
            expect![[r#"
                T S a b main
            "#]],
        );
    }

    #[test]
    fn locals_shadow_globals() {
        check(
            indoc! {r#"
                fn f() -> i32 { let a = 1; return a; }
                const a = 2;
            "#},
            expect![[r#"
                f a
            "#]],
        );
    }

    #[test]
    fn cycle() {
        check(
            indoc! {r#"
                const a = b;
                const b = c + 1;
                const c = a;
            "#},
            expect![[r#"

                1:7 error: cyclic dependency found: 'a' -> 'b' -> 'c' -> 'a'
                1:11 note: const 'a' references const 'b' here
                2:11 note: const 'b' references const 'c' here
                3:11 note: const 'c' references const 'a' here"#]],
        );
    }

    #[test]
    fn recursion() {
        check(
            indoc! {r#"
                fn f() { g(); }
                fn g() { f(); }
            "#},
            expect![[r#"

                1:4 error: cyclic dependency found: 'f' -> 'g' -> 'f'
                1:10 note: function 'f' calls function 'g' here
                2:10 note: function 'g' calls function 'f' here"#]],
        );
    }

    #[test]
    fn redeclaration() {
        check(
            indoc! {r#"
                var<private> x: i32;
                fn x() {}
            "#},
            expect![[r#"
                x x
                2:4 error: redeclaration of 'x'
                1:14 note: 'x' previously declared here"#]],
        );
    }
}
