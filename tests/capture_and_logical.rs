//! Regression tests for two maintainer-flagged bugs: a captured parameter
//! kept an `Argument` slot instead of a `Closure` one, and `&&`/`||`
//! mis-predeclared their RHS block's entry depth.

mod common;

use microvium::ast::*;
use microvium::{analyze, compile, verify_unit, Executor, Value};

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr {
        loc: common::loc(),
        kind: ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
    }
}

/// `function adder(x){ return function(y){ return x + y; }; }
/// vmExport(0, adder(3));` (captured parameter, spec §8 invariant "a
/// binding captured by a nested function never occupies an ArgumentSlot").
#[test]
fn a_captured_parameter_is_readable_from_the_inner_closure() {
    let inner = Expr {
        loc: common::loc(),
        kind: ExprKind::Function(Box::new(FunctionNode {
            loc: common::loc(),
            name: None,
            params: vec!["y".to_owned()],
            body: FunctionBody::Block(vec![Stmt {
                loc: common::loc(),
                kind: StmtKind::Return(Some(Box::new(binary(BinaryOp::Add, common::ident("x"), common::ident("y"))))),
            }]),
            is_arrow: false,
            is_async: false,
        })),
    };

    let adder = Stmt {
        loc: common::loc(),
        kind: StmtKind::FunctionDeclaration(Box::new(FunctionNode {
            loc: common::loc(),
            name: Some("adder".to_owned()),
            params: vec!["x".to_owned()],
            body: FunctionBody::Block(vec![Stmt {
                loc: common::loc(),
                kind: StmtKind::Return(Some(Box::new(inner))),
            }]),
            is_arrow: false,
            is_async: false,
        })),
    };

    let export_call = common::expr_stmt(common::call(
        common::ident("vmExport"),
        vec![common::number(0.0), common::call(common::ident("adder"), vec![common::number(3.0)])],
    ));

    let program = Program {
        body: vec![adder, export_call],
    };

    let model = analyze(&program).unwrap();
    let unit = compile(&program, &model, "capture.mjs").unwrap();
    verify_unit(&unit).unwrap();

    let mut executor = Executor::create(None);
    executor.evaluate_module(&program, "capture.mjs").unwrap();
    let add_y = executor.resolve_export(0).expect("vmExport(0, adder(3)) ran");

    let result = executor.call(add_y, vec![Value::Undefined, Value::Number(4.0)]).unwrap();
    match result {
        Value::Number(n) => assert_eq!(n, 7.0, "x (captured as 3) + y (4) should be 7"),
        other => panic!("expected a number, got {other:?}"),
    }
}

/// `function pick(a, b){ return a && b; } vmExport(0, pick);`
#[test]
fn logical_and_short_circuits_on_a_falsy_left_operand() {
    let pick = Stmt {
        loc: common::loc(),
        kind: StmtKind::FunctionDeclaration(Box::new(FunctionNode {
            loc: common::loc(),
            name: Some("pick".to_owned()),
            params: vec!["a".to_owned(), "b".to_owned()],
            body: FunctionBody::Block(vec![Stmt {
                loc: common::loc(),
                kind: StmtKind::Return(Some(Box::new(Expr {
                    loc: common::loc(),
                    kind: ExprKind::Logical {
                        op: LogicalOp::And,
                        left: Box::new(common::ident("a")),
                        right: Box::new(common::ident("b")),
                    },
                }))),
            }]),
            is_arrow: false,
            is_async: false,
        })),
    };

    let export_call = common::expr_stmt(common::call(common::ident("vmExport"), vec![common::number(0.0), common::ident("pick")]));

    let program = Program {
        body: vec![pick, export_call],
    };

    let model = analyze(&program).unwrap();
    let unit = compile(&program, &model, "logical_and.mjs").unwrap();
    verify_unit(&unit).unwrap();

    let mut executor = Executor::create(None);
    executor.evaluate_module(&program, "logical_and.mjs").unwrap();
    let pick = executor.resolve_export(0).expect("vmExport(0, pick) ran");

    let truthy_left = executor
        .call(pick.clone(), vec![Value::Undefined, Value::Number(1.0), Value::Number(2.0)])
        .unwrap();
    match truthy_left {
        Value::Number(n) => assert_eq!(n, 2.0, "truthy left should evaluate and return the right operand"),
        other => panic!("expected a number, got {other:?}"),
    }

    let falsy_left = executor.call(pick, vec![Value::Undefined, Value::Number(0.0), Value::Number(5.0)]).unwrap();
    match falsy_left {
        Value::Number(n) => assert_eq!(n, 0.0, "falsy left should short-circuit and return the left operand"),
        other => panic!("expected a number, got {other:?}"),
    }
}
