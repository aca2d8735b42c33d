// Per-function symbol table. A Scope maps identifiers to typed storage handles and sits on
// top of the global snapshot the function was compiled against. The dialect has no nested
// scopes: every declaration (parameters, `var` declarations, implicit declarations by first
// assignment, for-loop counters) stays visible until the end of the function, and a name
// may be declared only once, neither twice locally nor over a global binding. The storage
// handle is generic so that the code generator can bind stack slots and the reference
// interpreter can bind indices into its value store. Names are interned in the session
// arena, so the table borrows them instead of owning copies.

//! Function-local symbol table.

use hashbrown::HashMap;

use crate::ast::Span;
use crate::core::error::{CompileError, CompileResult};
use crate::core::session::CompilationSession;
use crate::types::{GlobalSymbol, Globals, Type};

/// A local name's type and where it lives.
#[derive(Debug, Clone, Copy)]
pub struct Binding<H> {
    pub ty: Type,
    pub storage: H,
}

/// Result of resolving a name.
#[derive(Debug)]
pub enum Resolved<'s, H> {
    Local(&'s Binding<H>),
    Global(&'s GlobalSymbol),
}

pub struct Scope<'a, H> {
    globals: &'a Globals,
    locals: HashMap<&'a str, Binding<H>>,
}

impl<'a, H> Scope<'a, H> {
    pub fn new(globals: &'a Globals) -> Self {
        Self {
            globals,
            locals: HashMap::new(),
        }
    }

    pub fn globals(&self) -> &'a Globals {
        self.globals
    }

    /// Fail if `name` cannot be declared here.
    pub fn ensure_undeclared(&self, name: &str, span: Span) -> CompileResult<()> {
        if self.locals.contains_key(name) || self.globals.contains(name) {
            return Err(CompileError::redeclaration(name, span));
        }
        Ok(())
    }

    /// Declare `name` with its storage.
    pub fn declare<'arena: 'a>(
        &mut self,
        session: &CompilationSession<'arena>,
        name: &str,
        ty: Type,
        storage: H,
        span: Span,
    ) -> CompileResult<&Binding<H>> {
        self.ensure_undeclared(name, span)?;
        let key: &'a str = session.intern_str(name);
        log::trace!("declare {}: {}", key, ty);
        Ok(self.locals.entry(key).or_insert(Binding { ty, storage }))
    }

    pub fn local(&self, name: &str) -> Option<&Binding<H>> {
        self.locals.get(name)
    }

    /// Resolve `name` locally, then globally.
    pub fn resolve(&self, name: &str, span: Span) -> CompileResult<Resolved<'_, H>> {
        if let Some(binding) = self.locals.get(name) {
            return Ok(Resolved::Local(binding));
        }
        match self.globals.get(name) {
            Some(symbol) => Ok(Resolved::Global(symbol)),
            None => Err(CompileError::undefined_symbol(name, span)),
        }
    }

    pub fn len(&self) -> usize {
        self.locals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locals.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::types::{Scalar, ScalarType};
    use bumpalo::Bump;

    #[test]
    fn test_declare_and_resolve() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let globals = Globals::prelude();
        let mut scope: Scope<'_, usize> = Scope::new(&globals);

        scope
            .declare(&session, "x", Type::INT, 0, Span::new(2, 4))
            .unwrap();
        scope
            .declare(&session, "v", Type::vector(ScalarType::Float, 4).unwrap(), 1, Span::new(3, 4))
            .unwrap();

        match scope.resolve("x", Span::UNKNOWN).unwrap() {
            Resolved::Local(b) => {
                assert_eq!(b.ty, Type::INT);
                assert_eq!(b.storage, 0);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            scope.resolve("True", Span::UNKNOWN).unwrap(),
            Resolved::Global(GlobalSymbol::Constant(Scalar::Bool(true)))
        ));
        assert_eq!(scope.len(), 2);
    }

    #[test]
    fn test_redeclaration_is_rejected() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let globals = Globals::prelude();
        let mut scope: Scope<'_, ()> = Scope::new(&globals);

        scope.declare(&session, "i", Type::INT, (), Span::new(2, 8)).unwrap();
        // same name, different type: still a redeclaration
        let err = scope
            .declare(&session, "i", Type::DOUBLE, (), Span::new(5, 8))
            .unwrap_err();
        assert!(err.is_due_to(ErrorKind::VariableRedeclaration));
        assert_eq!(err.span(), Span::new(5, 8));

        let err = scope
            .declare(&session, "Int", Type::INT, (), Span::new(6, 4))
            .unwrap_err();
        assert!(err.is_due_to(ErrorKind::VariableRedeclaration));
        assert_eq!(scope.len(), 1);
    }

    #[test]
    fn test_undefined_symbol() {
        let globals = Globals::prelude();
        let scope: Scope<'_, ()> = Scope::new(&globals);
        let err = scope.resolve("missing", Span::new(4, 2)).unwrap_err();
        assert!(err.is_due_to(ErrorKind::UndefinedSymbol));
        assert!(scope.is_empty());
    }
}
