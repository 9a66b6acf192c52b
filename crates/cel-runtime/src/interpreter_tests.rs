use std::sync::Arc;

use cel_ast::{AstBuilder, CheckedAst, Expr};
use cel_core::{
    DynProvider, ErrorKind, FieldDecl, FieldKind, MessageDecl, TypeProvider, Value,
};

use crate::activation::Activation;
use crate::config::{CancellationToken, EvalLimits, Features};
use crate::dispatcher::{Dispatcher, FunctionRegistry};
use crate::interpreter::Interpreter;
use crate::listener::{CollectingListener, NoopListener};
use crate::runtime::{ProgramError, Runtime};

fn runtime() -> Runtime {
    Runtime::builder().build().unwrap()
}

fn eval_in(expr: Expr, activation: &Activation) -> Result<Value, ProgramError> {
    runtime().program(CheckedAst::new(expr)).eval(activation)
}

fn eval(expr: Expr) -> Result<Value, ProgramError> {
    eval_in(expr, &Activation::new())
}

fn expect_err(result: Result<Value, ProgramError>, kind: ErrorKind) {
    match result {
        Err(e) => assert_eq!(e.kind, kind, "unexpected error: {e}"),
        Ok(v) => panic!("expected {kind:?} error, got {v}"),
    }
}

#[test]
fn constants_evaluate_to_themselves() {
    let mut b = AstBuilder::new();
    assert_eq!(eval(b.const_null()).unwrap(), Value::Null);
    assert_eq!(eval(b.const_int(-7)).unwrap(), Value::Int(-7));
    assert_eq!(eval(b.const_uint(7)).unwrap(), Value::Uint(7));
    assert_eq!(eval(b.const_double(0.5)).unwrap(), Value::Double(0.5));
    assert_eq!(eval(b.const_string("hi")).unwrap(), Value::string("hi"));
    assert_eq!(eval(b.const_bytes(vec![1, 2])).unwrap(), Value::bytes(vec![1, 2]));
}

#[test]
fn uint_constants_narrow_without_unsigned_longs() {
    let mut b = AstBuilder::new();
    let expr = b.const_uint(2);
    let runtime = Runtime::builder()
        .features(Features::new().unsigned_longs(false))
        .build()
        .unwrap();
    let value = runtime.program(CheckedAst::new(expr)).eval(&Activation::new());
    assert_eq!(value.unwrap(), Value::Int(2));
}

#[test]
fn addition_with_variable() {
    // 1 + a + 2 with a = 3 evaluates to 6
    let mut b = AstBuilder::new();
    let one = b.const_int(1);
    let a = b.ident("a");
    let inner = b.call("_+_", vec![one, a]);
    let two = b.const_int(2);
    let sum = b.call("_+_", vec![inner, two]);

    let activation = Activation::new().with_value("a", 3i64);
    assert_eq!(eval_in(sum, &activation).unwrap(), Value::Int(6));
}

#[test]
fn child_activation_shadows_parent() {
    let mut b = AstBuilder::new();
    let a = b.ident("a");
    let c = b.ident("c");
    let sum = b.call("_+_", vec![a, c]);

    let parent = Arc::new(Activation::new().with_value("a", 1i64).with_value("c", 10i64));
    let child = Activation::extend(parent).with_value("a", 2i64);
    assert_eq!(eval_in(sum, &child).unwrap(), Value::Int(12));
}

#[test]
fn undeclared_identifier_is_attribute_not_found() {
    let mut b = AstBuilder::new();
    let expr = b.ident("nope");
    expect_err(eval(expr), ErrorKind::AttributeNotFound);
}

#[test]
fn checker_attached_overload_ids_drive_dispatch() {
    let mut b = AstBuilder::new();
    let one = b.const_int(1);
    let two = b.const_int(2);
    let sum = b.call_with_overloads("_+_", vec!["add_int64".into()], vec![one, two]);
    assert_eq!(eval(sum).unwrap(), Value::Int(3));

    // A candidate list that cannot admit the arguments fails even though
    // the registry could.
    let mut b = AstBuilder::new();
    let one = b.const_int(1);
    let two = b.const_int(2);
    let sum = b.call_with_overloads("_+_", vec!["add_double".into()], vec![one, two]);
    expect_err(eval(sum), ErrorKind::NoSuchOverload);
}

#[test]
fn division_by_zero_surfaces_as_error() {
    let mut b = AstBuilder::new();
    let one = b.const_int(1);
    let zero = b.const_int(0);
    let div = b.call("_/_", vec![one, zero]);
    expect_err(eval(div), ErrorKind::DivisionByZero);
}

#[test]
fn or_short_circuits_past_division_by_zero() {
    // 1 == 1 || 1/0 == 0
    let mut b = AstBuilder::new();
    let l1 = b.const_int(1);
    let r1 = b.const_int(1);
    let eq1 = b.call("_==_", vec![l1, r1]);
    let n = b.const_int(1);
    let z = b.const_int(0);
    let div = b.call("_/_", vec![n, z]);
    let zero = b.const_int(0);
    let eq2 = b.call("_==_", vec![div, zero]);
    let or = b.call("_||_", vec![eq1, eq2]);

    assert_eq!(eval(or).unwrap(), Value::Bool(true));
}

#[test]
fn disabled_short_circuit_observes_the_error_branch() {
    // Same expression, but both sides evaluate; the result is unchanged and
    // the listener sees the division error.
    let mut b = AstBuilder::new();
    let l1 = b.const_int(1);
    let r1 = b.const_int(1);
    let eq1 = b.call("_==_", vec![l1, r1]);
    let n = b.const_int(1);
    let z = b.const_int(0);
    let div = b.call("_/_", vec![n, z]);
    let div_id = div.id;
    let zero = b.const_int(0);
    let eq2 = b.call("_==_", vec![div, zero]);
    let or = b.call("_||_", vec![eq1, eq2]);

    let runtime = Runtime::builder()
        .features(Features::new().short_circuit(false))
        .build()
        .unwrap();
    let program = runtime.program(CheckedAst::new(or));
    let mut listener = CollectingListener::new();
    let result = program.trace(&Activation::new(), &mut listener);

    assert_eq!(result.unwrap(), Value::Bool(true));
    let observed = listener.values_for(div_id);
    assert_eq!(observed.len(), 1);
    assert!(observed[0].is_error());
}

#[test]
fn and_never_evaluates_past_false() {
    // false && (1/0 == 0)
    let mut b = AstBuilder::new();
    let lhs = b.const_bool(false);
    let n = b.const_int(1);
    let z = b.const_int(0);
    let div = b.call("_/_", vec![n, z]);
    let div_id = div.id;
    let zero = b.const_int(0);
    let eq = b.call("_==_", vec![div, zero]);
    let and = b.call("_&&_", vec![lhs, eq]);

    let program = runtime().program(CheckedAst::new(and));
    let mut listener = CollectingListener::new();
    let result = program.trace(&Activation::new(), &mut listener);

    assert_eq!(result.unwrap(), Value::Bool(false));
    assert!(listener.values_for(div_id).is_empty());
}

#[test]
fn logical_operators_absorb_errors_when_forced() {
    let mut b = AstBuilder::new();
    let n = b.const_int(1);
    let z = b.const_int(0);
    let div = b.call("_/_", vec![n, z]);
    let f = b.const_bool(false);
    // error && false forces false even though the left side failed
    let and = b.call("_&&_", vec![div, f]);
    assert_eq!(eval(and).unwrap(), Value::Bool(false));

    let mut b = AstBuilder::new();
    let n = b.const_int(1);
    let z = b.const_int(0);
    let div = b.call("_/_", vec![n, z]);
    let t = b.const_bool(true);
    // error && true propagates the error
    let and = b.call("_&&_", vec![div, t]);
    expect_err(eval(and), ErrorKind::DivisionByZero);
}

#[test]
fn logical_operator_with_non_bool_operand() {
    let mut b = AstBuilder::new();
    let t = b.const_bool(true);
    let one = b.const_int(1);
    let and = b.call("_&&_", vec![t, one]);
    expect_err(eval(and), ErrorKind::NoSuchOverload);
}

#[test]
fn ternary_selects_branches() {
    let mut b = AstBuilder::new();
    let c = b.const_bool(true);
    let t = b.const_int(1);
    let e = b.const_int(2);
    let cond = b.call("_?_:_", vec![c, t, e]);
    assert_eq!(eval(cond).unwrap(), Value::Int(1));

    let mut b = AstBuilder::new();
    let c = b.const_bool(false);
    let t = b.const_int(1);
    let e = b.const_int(2);
    let cond = b.call("_?_:_", vec![c, t, e]);
    assert_eq!(eval(cond).unwrap(), Value::Int(2));
}

#[test]
fn ternary_propagates_condition_error_without_branching() {
    let mut b = AstBuilder::new();
    let n = b.const_int(1);
    let z = b.const_int(0);
    let div = b.call("_/_", vec![n, z]);
    let t = b.const_int(1);
    let t_id = t.id;
    let e = b.const_int(2);
    let cond = b.call("_?_:_", vec![div, t, e]);

    let program = runtime().program(CheckedAst::new(cond));
    let mut listener = CollectingListener::new();
    let result = program.trace(&Activation::new(), &mut listener);
    expect_err(result, ErrorKind::DivisionByZero);
    assert!(listener.values_for(t_id).is_empty());
}

#[test]
fn ternary_rejects_non_bool_condition() {
    let mut b = AstBuilder::new();
    let c = b.const_int(1);
    let t = b.const_int(1);
    let e = b.const_int(2);
    let cond = b.call("_?_:_", vec![c, t, e]);
    expect_err(eval(cond), ErrorKind::NoSuchOverload);
}

#[test]
fn heterogeneous_equality_can_be_disabled() {
    let mut b = AstBuilder::new();
    let two = b.const_int(2);
    let two_u = b.const_uint(2);
    let eq = b.call("_==_", vec![two, two_u]);

    assert_eq!(eval(eq.clone()).unwrap(), Value::Bool(true));

    let runtime = Runtime::builder()
        .features(Features::new().heterogeneous_comparisons(false))
        .build()
        .unwrap();
    let result = runtime.program(CheckedAst::new(eq)).eval(&Activation::new());
    expect_err(result, ErrorKind::NoSuchOverload);
}

#[test]
fn select_reads_map_fields() {
    let mut b = AstBuilder::new();
    let m = b.ident("m");
    let sel = b.select(m, "k");

    let map: cel_core::MapValue = [(cel_core::MapKey::String("k".into()), Value::Int(7))]
        .into_iter()
        .collect();
    let activation = Activation::new().with_value("m", Value::Map(map));
    assert_eq!(eval_in(sel, &activation).unwrap(), Value::Int(7));
}

#[test]
fn select_missing_map_key_is_no_such_key() {
    let mut b = AstBuilder::new();
    let m = b.ident("m");
    let sel = b.select(m, "missing");
    let activation = Activation::new().with_value("m", Value::Map(cel_core::MapValue::new()));
    expect_err(eval_in(sel, &activation), ErrorKind::NoSuchKey);
}

#[test]
fn dotted_binding_resolves_as_package_qualified_identifier() {
    let mut b = AstBuilder::new();
    let pkg = b.ident("pkg");
    let sel = b.select(pkg, "flag");
    let activation = Activation::new().with_value("pkg.flag", true);
    assert_eq!(eval_in(sel, &activation).unwrap(), Value::Bool(true));
}

fn account_provider() -> DynProvider {
    DynProvider::new().with_type(
        MessageDecl::new("test.Account")
            .field("name", FieldDecl::new(FieldKind::String))
            .field(
                "standalone_message",
                FieldDecl::new(FieldKind::Message("test.Account".into())),
            ),
    )
}

#[test]
fn presence_test_on_unset_message_field_is_false() {
    // has(msg.standalone_message) with the field unset
    let mut b = AstBuilder::new();
    let msg = b.ident("msg");
    let has = b.presence_test(msg, "standalone_message");

    let provider = account_provider();
    let value = provider.new_value("test.Account", vec![(Arc::from("name"), Value::string("x"))]);
    let runtime = Runtime::builder()
        .type_provider(Arc::new(provider))
        .build()
        .unwrap();
    let activation = Activation::new().with_value("msg", value);
    let result = runtime.program(CheckedAst::new(has)).eval(&activation);
    assert_eq!(result.unwrap(), Value::Bool(false));
}

#[test]
fn struct_literal_builds_through_the_provider() {
    let mut b = AstBuilder::new();
    let name = b.const_string("alice");
    let none = b.call("optional.none", vec![]);
    let st = b.struct_(
        "test.Account",
        vec![
            ("name".to_string(), name, false),
            // Optional field entry whose value is empty: dropped.
            ("standalone_message".to_string(), none, true),
        ],
    );

    let runtime = Runtime::builder()
        .type_provider(Arc::new(account_provider()))
        .build()
        .unwrap();
    let result = runtime
        .program(CheckedAst::new(st))
        .eval(&Activation::new())
        .unwrap();
    let Value::Struct(s) = result else {
        panic!("expected struct");
    };
    assert_eq!(s.type_name(), "test.Account");
    assert_eq!(s.field("name"), Some(&Value::string("alice")));
    assert!(!s.is_set("standalone_message"));
}

#[test]
fn list_literal_with_optional_elements() {
    // [1, ?optional.of(2), ?optional.none()] => [1, 2]
    let mut b = AstBuilder::new();
    let one = b.const_int(1);
    let two = b.const_int(2);
    let of = b.call("optional.of", vec![two]);
    let none = b.call("optional.none", vec![]);
    let list = b.list_with_optionals(vec![one, of, none], vec![1, 2]);

    assert_eq!(
        eval(list).unwrap(),
        Value::list(vec![Value::Int(1), Value::Int(2)])
    );
}

#[test]
fn optional_marked_element_requires_an_optional() {
    let mut b = AstBuilder::new();
    let one = b.const_int(1);
    let list = b.list_with_optionals(vec![one], vec![0]);
    expect_err(eval(list), ErrorKind::InvalidArgument);
}

#[test]
fn map_literal_preserves_construction_order_and_skips_empty_optionals() {
    // {"b": 1, "a": ?optional.none(), "c": 3}
    let mut b = AstBuilder::new();
    let kb = b.const_string("b");
    let vb = b.const_int(1);
    let ka = b.const_string("a");
    let va = b.call("optional.none", vec![]);
    let kc = b.const_string("c");
    let vc = b.const_int(3);
    let map = b.map(vec![(kb, vb, false), (ka, va, true), (kc, vc, false)]);

    let Value::Map(map) = eval(map).unwrap() else {
        panic!("expected map");
    };
    let keys: Vec<String> = map.keys().map(|k| k.to_string()).collect();
    assert_eq!(keys, ["\"b\"", "\"c\""]);
}

#[test]
fn map_literal_rejects_repeated_keys() {
    // {2: "a", 2u: "b"} collide under numeric key equality
    let mut b = AstBuilder::new();
    let k1 = b.const_int(2);
    let v1 = b.const_string("a");
    let k2 = b.const_uint(2);
    let v2 = b.const_string("b");
    let map = b.map(vec![(k1, v1, false), (k2, v2, false)]);
    expect_err(eval(map), ErrorKind::InvalidArgument);
}

/// Macro expansion of `[true].exists(i, i)`.
fn exists_expr(b: &mut AstBuilder) -> Expr {
    let elem = b.const_bool(true);
    let range = b.list(vec![elem]);
    let accu_init = b.const_bool(false);
    let accu = b.ident("__result__");
    let not_accu = b.call("!_", vec![accu]);
    let cond = b.call("@not_strictly_false", vec![not_accu]);
    let step_lhs = b.ident("__result__");
    let step_rhs = b.ident("i");
    let step = b.call("_||_", vec![step_lhs, step_rhs]);
    let result = b.ident("__result__");
    b.comprehension("i", range, "__result__", accu_init, cond, step, result)
}

#[test]
fn exists_comprehension() {
    let mut b = AstBuilder::new();
    let comp = exists_expr(&mut b);
    assert_eq!(eval(comp).unwrap(), Value::Bool(true));
}

#[test]
fn fold_comprehension_sums_a_list() {
    // sum over [1, 2, 3]
    let mut b = AstBuilder::new();
    let e1 = b.const_int(1);
    let e2 = b.const_int(2);
    let e3 = b.const_int(3);
    let range = b.list(vec![e1, e2, e3]);
    let init = b.const_int(0);
    let cond = b.const_bool(true);
    let acc = b.ident("acc");
    let x = b.ident("x");
    let step = b.call("_+_", vec![acc, x]);
    let result = b.ident("acc");
    let comp = b.comprehension("x", range, "acc", init, cond, step, result);

    assert_eq!(eval(comp).unwrap(), Value::Int(6));
}

#[test]
fn comprehension_iterates_map_keys_in_construction_order() {
    // Collect keys of {"b": 1, "a": 2} into a list.
    let mut b = AstBuilder::new();
    let kb = b.const_string("b");
    let vb = b.const_int(1);
    let ka = b.const_string("a");
    let va = b.const_int(2);
    let range = b.map(vec![(kb, vb, false), (ka, va, false)]);
    let init = b.list(vec![]);
    let cond = b.const_bool(true);
    let acc = b.ident("acc");
    let k = b.ident("k");
    let single = b.list(vec![k]);
    let step = b.call("_+_", vec![acc, single]);
    let result = b.ident("acc");
    let comp = b.comprehension("k", range, "acc", init, cond, step, result);

    assert_eq!(
        eval(comp).unwrap(),
        Value::list(vec![Value::string("b"), Value::string("a")])
    );
}

#[test]
fn nested_comprehensions_shadow_the_accumulator() {
    // Outer fold over [[1, 2], [3]]; the inner fold reuses the accumulator
    // name and must not leak into the outer scope.
    let mut b = AstBuilder::new();
    let e1 = b.const_int(1);
    let e2 = b.const_int(2);
    let inner_list1 = b.list(vec![e1, e2]);
    let e3 = b.const_int(3);
    let inner_list2 = b.list(vec![e3]);
    let range = b.list(vec![inner_list1, inner_list2]);

    let init = b.const_int(0);
    let cond = b.const_bool(true);

    // Inner: sum of xs.
    let inner_range = b.ident("xs");
    let inner_init = b.const_int(0);
    let inner_cond = b.const_bool(true);
    let inner_acc = b.ident("acc");
    let inner_x = b.ident("x");
    let inner_step = b.call("_+_", vec![inner_acc, inner_x]);
    let inner_result = b.ident("acc");
    let inner = b.comprehension(
        "x",
        inner_range,
        "acc",
        inner_init,
        inner_cond,
        inner_step,
        inner_result,
    );

    let acc = b.ident("acc");
    let step = b.call("_+_", vec![acc, inner]);
    let result = b.ident("acc");
    let comp = b.comprehension("xs", range, "acc", init, cond, step, result);

    assert_eq!(eval(comp).unwrap(), Value::Int(6));
}

#[test]
fn comprehension_budget_is_checked_against_range_length() {
    // Even a loop that would exit immediately trips the budget: the check is
    // on the range length, not the run count.
    let mut b = AstBuilder::new();
    let e1 = b.const_int(1);
    let e2 = b.const_int(2);
    let e3 = b.const_int(3);
    let range = b.list(vec![e1, e2, e3]);
    let init = b.const_int(0);
    let cond = b.const_bool(false);
    let step = b.ident("acc");
    let result = b.ident("acc");
    let comp = b.comprehension("x", range, "acc", init, cond, step, result);

    let runtime = Runtime::builder()
        .limits(EvalLimits::new().comprehension_max_iterations(2))
        .build()
        .unwrap();
    let result = runtime.program(CheckedAst::new(comp)).eval(&Activation::new());
    expect_err(result, ErrorKind::IterationBudgetExceeded);
}

#[test]
fn comprehension_over_non_container_fails() {
    let mut b = AstBuilder::new();
    let range = b.const_int(1);
    let init = b.const_int(0);
    let cond = b.const_bool(true);
    let step = b.ident("acc");
    let result = b.ident("acc");
    let comp = b.comprehension("x", range, "acc", init, cond, step, result);
    expect_err(eval(comp), ErrorKind::NoSuchOverload);
}

#[test]
fn scope_depth_is_restored_after_errors() {
    let provider = DynProvider::new();
    let registry = FunctionRegistry::new();
    let activation = Activation::new();
    let mut listener = NoopListener;
    let mut interp = Interpreter::new(
        &provider,
        Dispatcher::new(&registry, None),
        Features::default(),
        EvalLimits::default(),
        &activation,
        &mut listener,
        None,
    );

    // The step calls a function the empty registry cannot resolve.
    let mut b = AstBuilder::new();
    let e1 = b.const_int(1);
    let range = b.list(vec![e1]);
    let init = b.const_int(0);
    let cond = b.const_bool(true);
    let acc = b.ident("acc");
    let step = b.call("missing", vec![acc]);
    let result = b.ident("acc");
    let comp = b.comprehension("x", range, "acc", init, cond, step, result);

    assert_eq!(interp.scope_depth(), 0);
    let out = interp.eval(&comp);
    assert!(out.is_error());
    assert_eq!(interp.scope_depth(), 0);
}

#[test]
fn evaluation_recursion_depth_is_limited() {
    let mut b = AstBuilder::new();
    let mut expr = b.const_int(0);
    for i in 1..=500 {
        let rhs = b.const_int(i);
        expr = b.call("_+_", vec![expr, rhs]);
    }
    expect_err(eval(expr), ErrorKind::RecursionDepthExceeded);
}

#[test]
fn cancellation_stops_evaluation() {
    let mut b = AstBuilder::new();
    let one = b.const_int(1);
    let two = b.const_int(2);
    let sum = b.call("_+_", vec![one, two]);

    let token = CancellationToken::new();
    token.cancel();
    let program = runtime().program(CheckedAst::new(sum));
    let result = program.eval_cancellable(&Activation::new(), &token);
    expect_err(result, ErrorKind::Cancelled);
}

#[test]
fn unknown_patterns_mark_attributes_unknown() {
    let mut b = AstBuilder::new();
    let request = b.ident("request");
    let auth = b.select(request, "auth");
    let claims = b.select(auth, "claims");

    let activation =
        Activation::new().with_unknown_patterns(vec!["request.auth".parse().unwrap()]);
    let result = eval_in(claims, &activation).unwrap();
    let Value::Unknown(set) = result else {
        panic!("expected unknown result");
    };
    assert!(set.contains(&"request.auth.claims".parse().unwrap()));
}

#[test]
fn partially_matched_root_is_unknown() {
    let mut b = AstBuilder::new();
    let request = b.ident("request");

    let activation =
        Activation::new().with_unknown_patterns(vec!["request.auth".parse().unwrap()]);
    let result = eval_in(request, &activation).unwrap();
    assert!(result.is_unknown());
}

#[test]
fn sibling_attributes_of_an_unknown_pattern_still_resolve() {
    // Pattern request.auth must not swallow request.uri through the shared
    // root.
    let mut b = AstBuilder::new();
    let request = b.ident("request");
    let uri = b.select(request, "uri");

    let map: cel_core::MapValue = [(
        cel_core::MapKey::String("uri".into()),
        Value::string("/index"),
    )]
    .into_iter()
    .collect();
    let activation = Activation::new()
        .with_value("request", Value::Map(map))
        .with_unknown_patterns(vec!["request.auth".parse().unwrap()]);

    assert_eq!(eval_in(uri, &activation).unwrap(), Value::string("/index"));
}

#[test]
fn unknowns_propagate_through_strict_calls() {
    let mut b = AstBuilder::new();
    let request = b.ident("request");
    let size = b.call("size", vec![request]);

    let activation =
        Activation::new().with_unknown_patterns(vec!["request".parse().unwrap()]);
    let result = eval_in(size, &activation).unwrap();
    assert!(result.is_unknown());
}

#[test]
fn logical_operators_prefer_unknowns_over_errors() {
    // unknown || (1/0 == 0) collapses to the unknown, not the error.
    let mut b = AstBuilder::new();
    let request = b.ident("request");
    let n = b.const_int(1);
    let z = b.const_int(0);
    let div = b.call("_/_", vec![n, z]);
    let zero = b.const_int(0);
    let eq = b.call("_==_", vec![div, zero]);
    let or = b.call("_||_", vec![request, eq]);

    let activation =
        Activation::new().with_unknown_patterns(vec!["request".parse().unwrap()]);
    let result = eval_in(or, &activation).unwrap();
    assert!(result.is_unknown());
}

#[test]
fn forced_boolean_beats_unknown() {
    // unknown && false is false.
    let mut b = AstBuilder::new();
    let request = b.ident("request");
    let f = b.const_bool(false);
    let and = b.call("_&&_", vec![request, f]);

    let activation =
        Activation::new().with_unknown_patterns(vec!["request".parse().unwrap()]);
    assert_eq!(eval_in(and, &activation).unwrap(), Value::Bool(false));
}

#[test]
fn trace_reports_every_sub_expression() {
    let mut b = AstBuilder::new();
    let one = b.const_int(1);
    let two = b.const_int(2);
    let sum = b.call("_+_", vec![one, two]);
    let sum_id = sum.id;

    let program = runtime().program(CheckedAst::new(sum));
    let mut listener = CollectingListener::new();
    let result = program.trace(&Activation::new(), &mut listener);

    assert_eq!(result.unwrap(), Value::Int(3));
    assert_eq!(listener.events.len(), 3);
    assert_eq!(listener.values_for(sum_id), vec![&Value::Int(3)]);
}

#[test]
fn determinism_across_repeated_evaluations() {
    let mut b = AstBuilder::new();
    let comp = exists_expr(&mut b);
    let program = runtime().program(CheckedAst::new(comp));
    let activation = Activation::new();

    let first = program.eval(&activation).unwrap();
    let second = program.eval(&activation).unwrap();
    assert_eq!(first, second);
}
