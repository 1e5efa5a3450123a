//! End-to-end scenarios from spec §8 "Scenarios", driven through the
//! reference host VM since this crate has no parser of its own.

mod common;

use microvium::{analyze, compile, verify_unit, Executor, Value};

#[test]
fn trivial_export_resolves_to_42() {
    let program = common::trivial_export_program();
    let model = analyze(&program).unwrap();
    let unit = compile(&program, &model, "trivial_export.mjs").unwrap();
    verify_unit(&unit).unwrap();

    let mut executor = Executor::create(None);
    executor.evaluate_module(&program, "trivial_export.mjs").unwrap();

    let exported = executor.resolve_export(0).expect("export 0 was set by vmExport");
    let result = executor.call(exported, vec![Value::Undefined]).unwrap();
    match result {
        Value::Number(n) => assert_eq!(n, 42.0),
        other => panic!("expected a number, got {other:?}"),
    }
}

#[test]
fn closure_capture_increments_across_calls() {
    let program = common::closure_capture_program();
    let model = analyze(&program).unwrap();
    let unit = compile(&program, &model, "closure_capture.mjs").unwrap();
    verify_unit(&unit).unwrap();

    let mut executor = Executor::create(None);
    executor.evaluate_module(&program, "closure_capture.mjs").unwrap();

    let exported = executor.resolve_export(0).expect("export 0 was set by vmExport");
    assert!(matches!(exported, Value::Reference(_)), "mk() should return a closure");

    let first = executor.call(exported.clone(), vec![Value::Undefined]).unwrap();
    let second = executor.call(exported, vec![Value::Undefined]).unwrap();

    match (first, second) {
        (Value::Number(a), Value::Number(b)) => {
            assert_eq!(a, 2.0);
            assert_eq!(b, 3.0);
        }
        other => panic!("expected two numbers, got {other:?}"),
    }
}

#[test]
fn garbage_collect_does_not_drop_a_live_export() {
    let program = common::closure_capture_program();
    let model = analyze(&program).unwrap();
    let unit = compile(&program, &model, "gc.mjs").unwrap();
    verify_unit(&unit).unwrap();

    let mut executor = Executor::create(None);
    executor.evaluate_module(&program, "gc.mjs").unwrap();
    executor.garbage_collect();

    let exported = executor.resolve_export(0).expect("export survives a GC pass");
    let result = executor.call(exported, vec![Value::Undefined]).unwrap();
    assert!(matches!(result, Value::Number(n) if n == 2.0));
}
