use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolScope {
    Global,
    /// A slot in the current call frame (a function's parameter).
    Local,
    /// A local of an enclosing function, reached from a nested one.
    Free,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub scope: SymbolScope,
    pub index: usize,
}

/// Name to slot assignment. The outermost table hands out global slots;
/// enclosed tables hand out frame-local slots.
#[derive(Debug, Default)]
pub struct SymbolTable {
    outer: Option<Box<SymbolTable>>,
    store: HashMap<String, Symbol>,
    num_definitions: usize,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    pub fn enclosed(outer: SymbolTable) -> Self {
        SymbolTable { outer: Some(Box::new(outer)), ..SymbolTable::default() }
    }

    /// Give back the enclosing table, if any.
    pub fn into_outer(self) -> Option<SymbolTable> {
        self.outer.map(|b| *b)
    }

    /// Always allocates a fresh index, even when `name` is already defined;
    /// the earlier slot stays allocated but is no longer reachable by name.
    pub fn define(&mut self, name: &str) -> Symbol {
        let scope = if self.outer.is_some() { SymbolScope::Local } else { SymbolScope::Global };
        let symbol = Symbol { name: name.to_string(), scope, index: self.num_definitions };
        self.num_definitions += 1;
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    pub fn resolve(&self, name: &str) -> Option<Symbol> {
        if let Some(symbol) = self.store.get(name) {
            return Some(symbol.clone());
        }
        let found = self.outer.as_ref()?.resolve(name)?;
        match found.scope {
            SymbolScope::Global => Some(found),
            SymbolScope::Local | SymbolScope::Free => Some(Symbol { scope: SymbolScope::Free, ..found }),
        }
    }

    pub fn num_definitions(&self) -> usize {
        self.num_definitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_assigns_increasing_global_slots() {
        let mut table = SymbolTable::new();
        let a = table.define("a");
        let b = table.define("b");
        assert_eq!(a, Symbol { name: "a".into(), scope: SymbolScope::Global, index: 0 });
        assert_eq!(b, Symbol { name: "b".into(), scope: SymbolScope::Global, index: 1 });
    }

    #[test]
    fn resolve_unknown_is_none() {
        let table = SymbolTable::new();
        assert_eq!(table.resolve("missing"), None);
    }

    #[test]
    fn redefinition_takes_a_new_slot() {
        let mut table = SymbolTable::new();
        table.define("x");
        table.define("x");
        assert_eq!(table.resolve("x").unwrap().index, 1);
        assert_eq!(table.num_definitions(), 2);
    }

    #[test]
    fn enclosed_table_defines_locals_and_sees_globals() {
        let mut global = SymbolTable::new();
        global.define("g");
        let mut local = SymbolTable::enclosed(global);
        let param = local.define("p");
        assert_eq!(param.scope, SymbolScope::Local);
        assert_eq!(param.index, 0);
        assert_eq!(local.resolve("g").unwrap().scope, SymbolScope::Global);
        assert_eq!(local.resolve("p").unwrap().scope, SymbolScope::Local);
    }

    #[test]
    fn outer_local_resolves_as_free() {
        let mut outer = SymbolTable::enclosed(SymbolTable::new());
        outer.define("x");
        let mut inner = SymbolTable::enclosed(outer);
        inner.define("y");
        assert_eq!(inner.resolve("x").unwrap().scope, SymbolScope::Free);
        assert_eq!(inner.resolve("y").unwrap().scope, SymbolScope::Local);
    }

    #[test]
    fn inner_definition_shadows_outer() {
        let mut global = SymbolTable::new();
        global.define("x");
        let mut local = SymbolTable::enclosed(global);
        local.define("x");
        assert_eq!(local.resolve("x").unwrap().scope, SymbolScope::Local);
        let global = local.into_outer().unwrap();
        assert_eq!(global.resolve("x").unwrap().scope, SymbolScope::Global);
    }
}
