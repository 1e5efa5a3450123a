//! End-to-end demo: hand-build a tiny [`ast::Program`] (standing in for a
//! parser this crate doesn't ship), compile it, run it through the
//! reference host VM, and dump the resulting snapshot image.
//!
//! Run with `cargo run --example compile_and_dump`.

use microvium::ast::{BinaryOp, Expr, ExprKind, FunctionBody, FunctionNode, Literal, Program, SourceLocation, Stmt, StmtKind};
use microvium::{analyze, compile, encode, verify_unit, Executor};

fn loc() -> SourceLocation {
    SourceLocation::new(0, 0)
}

fn ident(name: &str) -> Expr {
    Expr {
        loc: loc(),
        kind: ExprKind::Identifier(name.to_owned()),
    }
}

fn number(n: f64) -> Expr {
    Expr {
        loc: loc(),
        kind: ExprKind::Literal(Literal::Number(n)),
    }
}

fn call(callee: Expr, args: Vec<Expr>) -> Expr {
    Expr {
        loc: loc(),
        kind: ExprKind::Call {
            callee: Box::new(callee),
            args,
        },
    }
}

/// Builds the program:
/// ```text
/// function add(a, b) { return a + b; }
/// vmExport(0, () => add(2, 3));
/// ```
fn build_program() -> Program {
    let add_fn = Stmt {
        loc: loc(),
        kind: StmtKind::FunctionDeclaration(Box::new(FunctionNode {
            loc: loc(),
            name: Some("add".to_owned()),
            params: vec!["a".to_owned(), "b".to_owned()],
            body: FunctionBody::Block(vec![Stmt {
                loc: loc(),
                kind: StmtKind::Return(Some(Box::new(Expr {
                    loc: loc(),
                    kind: ExprKind::Binary {
                        op: BinaryOp::Add,
                        left: Box::new(ident("a")),
                        right: Box::new(ident("b")),
                    },
                }))),
            }]),
            is_arrow: false,
            is_async: false,
        })),
    };

    let exported_thunk = Expr {
        loc: loc(),
        kind: ExprKind::Function(Box::new(FunctionNode {
            loc: loc(),
            name: None,
            params: vec![],
            body: FunctionBody::Expression(Box::new(call(ident("add"), vec![number(2.0), number(3.0)]))),
            is_arrow: true,
            is_async: false,
        })),
    };

    let export_call = Stmt {
        loc: loc(),
        kind: StmtKind::ExpressionStatement(Box::new(call(ident("vmExport"), vec![number(0.0), exported_thunk]))),
    };

    Program {
        body: vec![add_fn, export_call],
    }
}

fn main() {
    let program = build_program();

    let model = match analyze(&program) {
        Ok(model) => model,
        Err(err) => {
            eprintln!("error:\n{err}");
            std::process::exit(1);
        }
    };

    let unit = match compile(&program, &model, "demo.mjs") {
        Ok(unit) => unit,
        Err(err) => {
            eprintln!("error:\n{err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = verify_unit(&unit) {
        eprintln!("error:\n{err}");
        std::process::exit(1);
    }

    let mut executor = Executor::create(None);
    if let Err(err) = executor.evaluate_module(&program, "demo.mjs") {
        eprintln!("error:\n{err}");
        std::process::exit(1);
    }

    executor.garbage_collect();

    let snapshot_info = match executor.create_snapshot_info() {
        Ok(info) => info,
        Err(err) => {
            eprintln!("error:\n{err}");
            std::process::exit(1);
        }
    };

    match encode(&snapshot_info) {
        Ok(image) => println!("encoded snapshot: {} bytes", image.len()),
        Err(err) => {
            eprintln!("error:\n{err}");
            std::process::exit(1);
        }
    }

    if let Some(value) = executor.resolve_export(0) {
        println!("export 0 resolved to a {}", value.type_name());
    }
}
