//! Scope analysis (spec §4.1): turns an [`ast::Program`] into a
//! [`ScopeModel`] the IL compiler consumes alongside the AST.
//!
//! Two private passes, mirroring the teacher crate's parse/prepare split:
//! [`pass1`] builds scopes and classifies bindings in one depth-first walk;
//! [`pass2`] assigns every binding a storage [`types::Slot`].

mod pass1;
mod pass2;
pub mod types;

use crate::ast::Program;
use crate::error::ScopeResult;
use crate::intern::Interns;

pub use types::{
    Binding, BindingId, BindingKind, PrologueOp, Reference, Resolved, Scope, ScopeId, ScopeKind, Slot,
};

/// The complete result of scope analysis for one module.
#[derive(Debug)]
pub struct ScopeModel {
    pub scopes: Vec<Scope>,
    pub bindings: Vec<Binding>,
    /// Identifier-use references, in the exact depth-first order the AST
    /// will be walked again during IL compilation. Consume through
    /// [`ReferenceCursor`] rather than indexing directly.
    pub references: Vec<Reference>,
    pub module_scope: ScopeId,
    pub interns: Interns,
}

impl ScopeModel {
    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.index()]
    }

    pub fn binding(&self, id: BindingId) -> &Binding {
        &self.bindings[id.index()]
    }

    pub fn cursor(&self) -> ReferenceCursor<'_> {
        ReferenceCursor {
            references: &self.references,
            next: 0,
        }
    }
}

/// Hands out [`Reference`]s one at a time, in the order pass 1 recorded
/// them. The IL compiler must visit identifier-like AST nodes in that same
/// depth-first order and pull exactly one reference per visit — this is
/// what keeps the two passes in lockstep without embedding resolution data
/// back into the AST.
pub struct ReferenceCursor<'a> {
    references: &'a [Reference],
    next: usize,
}

impl<'a> ReferenceCursor<'a> {
    /// Consumes the next reference. Panics if the IL compiler visits more
    /// identifier-like nodes than pass 1 recorded — that mismatch means the
    /// two traversals have fallen out of lockstep and is a compiler bug, not
    /// a property of the input program.
    pub fn next(&mut self) -> Reference {
        let reference = self.references[self.next];
        self.next += 1;
        reference
    }

    pub fn is_exhausted(&self) -> bool {
        self.next == self.references.len()
    }
}

/// Runs both passes over `program`, producing the scope model the IL
/// compiler consumes (spec §4.1).
pub fn analyze(program: &Program) -> ScopeResult<ScopeModel> {
    let mut builder = pass1::build_scopes(program)?;
    let module_scope = ScopeId(0);
    pass2::assign_slots(&mut builder.scopes, &mut builder.bindings, &mut builder.interner, module_scope)?;
    Ok(ScopeModel {
        scopes: builder.scopes,
        bindings: builder.bindings,
        references: builder.references,
        module_scope,
        interns: builder.interner.into_interns(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::*;

    fn loc() -> SourceLocation {
        SourceLocation::new(1, 1)
    }

    fn ident(name: &str) -> Expr {
        Expr {
            loc: loc(),
            kind: ExprKind::Identifier(name.to_owned()),
        }
    }

    #[test]
    fn top_level_var_gets_a_global_slot() {
        let program = Program {
            body: vec![Stmt {
                loc: loc(),
                kind: StmtKind::VariableDeclaration {
                    kind: DeclKind::Var,
                    declarations: vec![VarDeclarator {
                        loc: loc(),
                        name: "counter".to_owned(),
                        init: Some(Box::new(Expr {
                            loc: loc(),
                            kind: ExprKind::Literal(Literal::Number(0.0)),
                        })),
                    }],
                },
            }],
        };
        let model = analyze(&program).expect("analysis should succeed");
        let module = model.scope(model.module_scope);
        assert_eq!(module.var_declarations.len(), 1);
        let binding = model.binding(module.var_declarations[0]);
        assert!(matches!(binding.slot, Some(Slot::Global { .. })));
    }

    #[test]
    fn closure_capture_marks_binding_and_allocates_closure_slot() {
        // function outer() { let x = 1; function inner() { return x; } return inner; }
        let inner = FunctionNode {
            loc: loc(),
            name: Some("inner".to_owned()),
            params: vec![],
            body: FunctionBody::Block(vec![Stmt {
                loc: loc(),
                kind: StmtKind::Return(Some(Box::new(ident("x")))),
            }]),
            is_arrow: false,
            is_async: false,
        };
        let outer = FunctionNode {
            loc: loc(),
            name: Some("outer".to_owned()),
            params: vec![],
            body: FunctionBody::Block(vec![
                Stmt {
                    loc: loc(),
                    kind: StmtKind::VariableDeclaration {
                        kind: DeclKind::Let,
                        declarations: vec![VarDeclarator {
                            loc: loc(),
                            name: "x".to_owned(),
                            init: Some(Box::new(Expr {
                                loc: loc(),
                                kind: ExprKind::Literal(Literal::Number(1.0)),
                            })),
                        }],
                    },
                },
                Stmt {
                    loc: loc(),
                    kind: StmtKind::FunctionDeclaration(Box::new(inner)),
                },
                Stmt {
                    loc: loc(),
                    kind: StmtKind::Return(Some(Box::new(ident("inner")))),
                },
            ]),
            is_arrow: false,
            is_async: false,
        };
        let program = Program {
            body: vec![Stmt {
                loc: loc(),
                kind: StmtKind::FunctionDeclaration(Box::new(outer)),
            }],
        };

        let model = analyze(&program).expect("analysis should succeed");
        let outer_scope = model
            .scopes
            .iter()
            .find(|s| s.kind == ScopeKind::Function && !s.lexical_declarations.is_empty())
            .expect("outer function scope exists");
        let x_binding_id = outer_scope.lexical_declarations[0];
        let x_binding = model.binding(x_binding_id);
        assert!(x_binding.is_accessed_by_nested_function);
        assert!(matches!(x_binding.slot, Some(Slot::Closure { index: 0 })));
        assert_eq!(outer_scope.closure_slot_count, 1);
        assert!(matches!(outer_scope.prologue.first(), Some(PrologueOp::ScopePush { slot_count: 1 })));
    }
}
