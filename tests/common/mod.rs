//! Hand-built AST fixtures shared across integration tests.
//!
//! This crate ships no parser (spec §1 treats parsing as an external
//! collaborator), so tests construct `ast::Program` values directly instead
//! of parsing source text, the way the teacher's own `tests/main.rs` feeds
//! source strings straight to `Executor::new`.

use microvium::ast::*;

pub fn loc() -> SourceLocation {
    SourceLocation::new(0, 0)
}

pub fn ident(name: &str) -> Expr {
    Expr {
        loc: loc(),
        kind: ExprKind::Identifier(name.to_owned()),
    }
}

pub fn number(n: f64) -> Expr {
    Expr {
        loc: loc(),
        kind: ExprKind::Literal(Literal::Number(n)),
    }
}

pub fn call(callee: Expr, args: Vec<Expr>) -> Expr {
    Expr {
        loc: loc(),
        kind: ExprKind::Call {
            callee: Box::new(callee),
            args,
        },
    }
}

pub fn expr_stmt(expr: Expr) -> Stmt {
    Stmt {
        loc: loc(),
        kind: StmtKind::ExpressionStatement(Box::new(expr)),
    }
}

/// `vmExport(0, () => 42);` (spec §8 scenario 1).
pub fn trivial_export_program() -> Program {
    let thunk = Expr {
        loc: loc(),
        kind: ExprKind::Function(Box::new(FunctionNode {
            loc: loc(),
            name: None,
            params: vec![],
            body: FunctionBody::Expression(Box::new(number(42.0))),
            is_arrow: true,
            is_async: false,
        })),
    };
    Program {
        body: vec![expr_stmt(call(ident("vmExport"), vec![number(0.0), thunk]))],
    }
}

/// `function mk(){let x=1; return ()=>++x;} vmExport(0, mk());` (spec §8
/// scenario 2).
pub fn closure_capture_program() -> Program {
    let increment_x = Expr {
        loc: loc(),
        kind: ExprKind::Update {
            op: UpdateOp::Increment,
            prefix: true,
            argument: Box::new(ident("x")),
        },
    };

    let inner_closure = Expr {
        loc: loc(),
        kind: ExprKind::Function(Box::new(FunctionNode {
            loc: loc(),
            name: None,
            params: vec![],
            body: FunctionBody::Expression(Box::new(increment_x)),
            is_arrow: true,
            is_async: false,
        })),
    };

    let mk = Stmt {
        loc: loc(),
        kind: StmtKind::FunctionDeclaration(Box::new(FunctionNode {
            loc: loc(),
            name: Some("mk".to_owned()),
            params: vec![],
            body: FunctionBody::Block(vec![
                Stmt {
                    loc: loc(),
                    kind: StmtKind::VariableDeclaration {
                        kind: DeclKind::Let,
                        declarations: vec![VarDeclarator {
                            loc: loc(),
                            name: "x".to_owned(),
                            init: Some(Box::new(number(1.0))),
                        }],
                    },
                },
                Stmt {
                    loc: loc(),
                    kind: StmtKind::Return(Some(Box::new(inner_closure))),
                },
            ]),
            is_arrow: false,
            is_async: false,
        })),
    };

    let export_call = expr_stmt(call(ident("vmExport"), vec![number(0.0), call(ident("mk"), vec![])]));

    Program {
        body: vec![mk, export_call],
    }
}
