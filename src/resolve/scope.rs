use std::collections::{hash_map::Entry, HashMap};

use crate::ast::Symbol;

/// Lexically scoped symbols.
///
/// Scopes are identified by increasing ids, so the set of active scopes is always sorted. Stale
/// symbols of scopes which have ended are pruned lazily on lookup.
pub struct Scope<T> {
    symbols: HashMap<Symbol, ScopeSymbol<T>>,
    next_scope: ScopeId,
    active_scopes: Vec<ScopeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ScopeId(u32);

struct ScopeSymbol<T> {
    value: T,
    /// In which scope this symbol is valid.
    scope: ScopeId,
    /// Points to a shadowed symbol of the same name.
    shadowed: Option<Box<ScopeSymbol<T>>>,
}

impl<T: Copy> Default for Scope<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy> Scope<T> {
    pub fn new() -> Scope<T> {
        Scope { symbols: HashMap::new(), next_scope: ScopeId(0), active_scopes: Vec::new() }
    }

    pub fn begin(&mut self) -> ScopeId {
        let scope = self.next_scope;
        self.active_scopes.push(scope);
        self.next_scope.0 += 1;
        scope
    }

    pub fn end(&mut self, scope: ScopeId) {
        assert_eq!(Some(scope), self.active_scopes.last().copied(), "scopes ended out of order");
        self.active_scopes.pop();
    }

    /// Declares `symbol` in the innermost scope, shadowing any outer declaration. Fails with the
    /// previous value if the innermost scope already declares the same symbol.
    pub fn declare(&mut self, symbol: Symbol, value: T) -> Result<(), T> {
        let current = *self.active_scopes.last().expect("declaration outside of any scope");
        let new = ScopeSymbol { value, scope: current, shadowed: None };
        match self.symbols.entry(symbol) {
            Entry::Occupied(mut entry) => {
                if let Some(existing) = Self::get_slot(entry.get_mut(), &self.active_scopes) {
                    if entry.get().scope == current {
                        return Err(existing);
                    }
                    let shadowed = std::mem::replace(entry.get_mut(), new);
                    entry.get_mut().shadowed = Some(Box::new(shadowed));
                } else {
                    *entry.get_mut() = new;
                }
            },
            Entry::Vacant(entry) => {
                entry.insert(new);
            },
        }
        Ok(())
    }

    pub fn get(&mut self, symbol: Symbol) -> Option<T> {
        let Entry::Occupied(mut entry) = self.symbols.entry(symbol) else { return None };

        match Self::get_slot(entry.get_mut(), &self.active_scopes) {
            Some(value) => Some(value),
            None => {
                entry.remove();
                None
            },
        }
    }

    fn get_slot(slot: &mut ScopeSymbol<T>, active_scopes: &[ScopeId]) -> Option<T> {
        loop {
            if Self::is_active(slot.scope, active_scopes) {
                return Some(slot.value);
            }
            *slot = *slot.shadowed.take()?;
        }
    }

    fn is_active(target: ScopeId, scopes: &[ScopeId]) -> bool {
        if scopes.len() < 16 {
            scopes.iter().rev().any(|x| *x == target)
        } else {
            scopes.binary_search(&target).is_ok()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::SymbolTable;

    #[test]
    fn shadowing() {
        let mut symbols = SymbolTable::new();
        let x = symbols.intern("x");
        let y = symbols.intern("y");

        let mut scope = Scope::new();
        let outer = scope.begin();
        scope.declare(x, 1).unwrap();

        let inner = scope.begin();
        assert_eq!(scope.get(x), Some(1));
        scope.declare(x, 2).unwrap();
        scope.declare(y, 3).unwrap();
        assert_eq!(scope.get(x), Some(2));
        assert_eq!(scope.declare(x, 4), Err(2));
        scope.end(inner);

        assert_eq!(scope.get(x), Some(1));
        assert_eq!(scope.get(y), None);

        let sibling = scope.begin();
        scope.declare(y, 5).unwrap();
        assert_eq!(scope.get(y), Some(5));
        scope.end(sibling);
        scope.end(outer);

        assert_eq!(scope.get(x), None);
    }

    #[test]
    #[should_panic(expected = "scopes ended out of order")]
    fn unbalanced_scopes() {
        let mut scope = Scope::<u32>::new();
        let outer = scope.begin();
        let _inner = scope.begin();
        scope.end(outer);
    }
}
