//! Snapshot encode/decode round-trip and corruption detection (spec §8
//! scenarios 5 and 6).

mod common;

use microvium::{analyze, compile, decode, encode, verify_unit, ComponentKind, Executor};

fn build_snapshot_bytes() -> Vec<u8> {
    // `let greeting = "hi"; function greet(){return greeting;} vmExport(0, greet);`
    use microvium::ast::*;

    let greeting_decl = Stmt {
        loc: common::loc(),
        kind: StmtKind::VariableDeclaration {
            kind: DeclKind::Let,
            declarations: vec![VarDeclarator {
                loc: common::loc(),
                name: "greeting".to_owned(),
                init: Some(Box::new(Expr {
                    loc: common::loc(),
                    kind: ExprKind::Literal(Literal::String("hi".to_owned())),
                })),
            }],
        },
    };

    let greet_fn = Stmt {
        loc: common::loc(),
        kind: StmtKind::FunctionDeclaration(Box::new(FunctionNode {
            loc: common::loc(),
            name: Some("greet".to_owned()),
            params: vec![],
            body: FunctionBody::Block(vec![Stmt {
                loc: common::loc(),
                kind: StmtKind::Return(Some(Box::new(common::ident("greeting")))),
            }]),
            is_arrow: false,
            is_async: false,
        })),
    };

    let export_call = common::expr_stmt(common::call(common::ident("vmExport"), vec![common::number(0.0), common::ident("greet")]));

    let program = Program {
        body: vec![greeting_decl, greet_fn, export_call],
    };

    let model = analyze(&program).unwrap();
    let unit = compile(&program, &model, "round_trip.mjs").unwrap();
    verify_unit(&unit).unwrap();

    let mut executor = Executor::create(None);
    executor.evaluate_module(&program, "round_trip.mjs").unwrap();
    executor.garbage_collect();
    let info = executor.create_snapshot_info().unwrap();
    encode(&info).unwrap()
}

#[test]
fn encoding_is_deterministic_and_decodes_structurally() {
    let bytes = build_snapshot_bytes();
    let bytes_again = {
        // Re-running the whole pipeline from scratch should produce a
        // byte-identical image (spec §8 "bytes == bytes").
        build_snapshot_bytes()
    };
    assert_eq!(bytes, bytes_again);

    let image = decode(&bytes).unwrap();
    assert_eq!(image.bytecode_version, 1);

    let all_components: Vec<_> = image.regions.iter().flat_map(|r| r.components.iter()).collect();
    assert!(
        all_components.iter().any(|c| matches!(&c.kind, ComponentKind::StringTableEntry { value } if value == "hi")),
        "expected the string literal to appear in the decoded string table"
    );
    assert!(
        all_components.iter().any(|c| matches!(c.kind, ComponentKind::Export)),
        "expected the vmExport call to produce a decoded export entry"
    );
}

#[test]
fn flipping_a_byte_past_the_crc_coverage_start_is_detected() {
    let mut bytes = build_snapshot_bytes();
    let tail_index = bytes.len() - 1;
    bytes[tail_index] ^= 0xFF;

    let err = decode(&bytes).unwrap_err();
    assert!(matches!(err, microvium::MicroviumError::InvalidBytecode(microvium::InvalidBytecodeReason::CrcMismatch { .. })));
}

#[test]
fn corrupting_the_declared_size_is_detected() {
    let mut bytes = build_snapshot_bytes();
    bytes[2] = 0xFF;
    bytes[3] = 0xFF;

    let err = decode(&bytes).unwrap_err();
    assert!(matches!(err, microvium::MicroviumError::InvalidBytecode(microvium::InvalidBytecodeReason::SizeMismatch { .. })));
}
