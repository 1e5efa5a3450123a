//! Spec §8 scenarios 3 (switch-with-default) and 4 (integer-truncation
//! idiom), driven through the IL compiler and the reference host VM.

mod common;

use microvium::ast::*;
use microvium::il::{IlBinOp, Opcode};
use microvium::{analyze, compile, verify_unit, Executor, Value};

/// `function classify(x){ switch(x){ case 1: return "a"; case 2: return "b";
/// default: return "d"; } } vmExport(0, classify);`
fn switch_with_default_program() -> Program {
    let case = |test: Option<Expr>, result: &str| SwitchCase {
        loc: common::loc(),
        test: test.map(Box::new),
        consequent: vec![Stmt {
            loc: common::loc(),
            kind: StmtKind::Return(Some(Box::new(Expr {
                loc: common::loc(),
                kind: ExprKind::Literal(Literal::String(result.to_owned())),
            }))),
        }],
    };

    let switch_stmt = Stmt {
        loc: common::loc(),
        kind: StmtKind::Switch {
            discriminant: Box::new(common::ident("x")),
            cases: vec![
                case(Some(common::number(1.0)), "a"),
                case(Some(common::number(2.0)), "b"),
                case(None, "d"),
            ],
        },
    };

    let classify = Stmt {
        loc: common::loc(),
        kind: StmtKind::FunctionDeclaration(Box::new(FunctionNode {
            loc: common::loc(),
            name: Some("classify".to_owned()),
            params: vec!["x".to_owned()],
            body: FunctionBody::Block(vec![switch_stmt]),
            is_arrow: false,
            is_async: false,
        })),
    };

    let export_call = common::expr_stmt(common::call(common::ident("vmExport"), vec![common::number(0.0), common::ident("classify")]));

    Program {
        body: vec![classify, export_call],
    }
}

#[test]
fn switch_falls_through_to_default_on_no_match() {
    let program = switch_with_default_program();
    let model = analyze(&program).unwrap();
    let unit = compile(&program, &model, "switch.mjs").unwrap();
    verify_unit(&unit).unwrap();

    // The join block for the switch's own function ends with exactly one
    // `Pop 1` that discards the discriminant, regardless of which case
    // branch got there (spec §8 scenario 3: "The join block contains a
    // single Pop 1").
    let classify_fn = unit
        .functions
        .values()
        .find(|f| f.blocks.len() > 1)
        .expect("classify's IL function has more than one block");
    let join_pop_count = classify_fn
        .blocks
        .values()
        .flat_map(|b| &b.operations)
        .filter(|op| matches!(op.opcode, Opcode::Pop { count: 1 }))
        .count();
    assert_eq!(join_pop_count, 3, "one Pop 1 per case body, discarding the discriminant before each return");

    let mut executor = Executor::create(None);
    executor.evaluate_module(&program, "switch.mjs").unwrap();
    let classify = executor.resolve_export(0).expect("vmExport(0, classify) ran");

    // `1` and `2` hit their own case; a `bool` discriminant matches neither
    // numeric literal under strict equality and falls through to `default`.
    let one = executor.call(classify.clone(), vec![Value::Undefined, Value::Number(1.0)]).unwrap();
    let two = executor.call(classify.clone(), vec![Value::Undefined, Value::Number(2.0)]).unwrap();
    let other = executor.call(classify, vec![Value::Undefined, Value::Boolean(true)]).unwrap();

    assert!(matches!(one, Value::String(_)), "case 1 should return a string");
    assert!(matches!(two, Value::String(_)), "case 2 should return a string");
    assert!(matches!(other, Value::String(_)), "default should return a string");
}

/// `vmExport(0, () => (7/2)|0);` (spec §8 scenario 4).
fn truncation_idiom_program() -> Program {
    let truncated = Expr {
        loc: common::loc(),
        kind: ExprKind::Binary {
            op: BinaryOp::BitOr,
            left: Box::new(Expr {
                loc: common::loc(),
                kind: ExprKind::Binary {
                    op: BinaryOp::Div,
                    left: Box::new(common::number(7.0)),
                    right: Box::new(common::number(2.0)),
                },
            }),
            right: Box::new(common::number(0.0)),
        },
    };

    let thunk = Expr {
        loc: common::loc(),
        kind: ExprKind::Function(Box::new(FunctionNode {
            loc: common::loc(),
            name: None,
            params: vec![],
            body: FunctionBody::Expression(Box::new(truncated)),
            is_arrow: true,
            is_async: false,
        })),
    };

    Program {
        body: vec![common::expr_stmt(common::call(common::ident("vmExport"), vec![common::number(0.0), thunk]))],
    }
}

#[test]
fn integer_truncation_idiom_folds_to_a_single_opcode() {
    let program = truncation_idiom_program();
    let model = analyze(&program).unwrap();
    let unit = compile(&program, &model, "truncation.mjs").unwrap();
    verify_unit(&unit).unwrap();

    let all_ops: Vec<&Opcode> = unit.functions.values().flat_map(|f| f.blocks.values()).flat_map(|b| &b.operations).map(|op| &op.opcode).collect();

    let divide_and_trunc_count = all_ops.iter().filter(|op| matches!(op, Opcode::BinOp(IlBinOp::DivideAndTrunc))).count();
    assert_eq!(divide_and_trunc_count, 1, "exactly one BinOp DIVIDE_AND_TRUNC");

    let bit_or_count = all_ops.iter().filter(|op| matches!(op, Opcode::BinOp(IlBinOp::BitOr))).count();
    assert_eq!(bit_or_count, 0, "no BinOp BitOr should remain once the idiom is folded");

    let mut executor = Executor::create(None);
    executor.evaluate_module(&program, "truncation.mjs").unwrap();
    let thunk = executor.resolve_export(0).expect("vmExport(0, thunk) ran");
    let result = executor.call(thunk, vec![Value::Undefined]).unwrap();
    match result {
        Value::Number(n) => assert_eq!(n, 3.0),
        other => panic!("expected a number, got {other:?}"),
    }
}
