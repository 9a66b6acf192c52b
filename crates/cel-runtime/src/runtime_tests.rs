use cel_ast::{AstBuilder, CheckedAst, NavigableAst, SourceInfo};
use cel_core::{ErrorKind, EvalError, Value};

use crate::activation::Activation;
use crate::dispatcher::{ArgKind, BindingError, FunctionRegistry, Overload};
use crate::runtime::Runtime;

#[test]
fn builder_produces_a_shareable_runtime() {
    let runtime = Runtime::builder().build().unwrap();
    let mut b = AstBuilder::new();
    let one = b.const_int(1);
    let two = b.const_int(2);
    let sum = b.call("_+_", vec![one, two]);
    let program = runtime.program(CheckedAst::new(sum));

    let clone = program.clone();
    let handle = std::thread::spawn(move || clone.eval(&Activation::new()).unwrap());
    assert_eq!(program.eval(&Activation::new()).unwrap(), Value::Int(3));
    assert_eq!(handle.join().unwrap(), Value::Int(3));
}

#[test]
fn evaluation_does_not_mutate_the_ast() {
    let mut b = AstBuilder::new();
    let one = b.const_int(1);
    let two = b.const_int(2);
    let sum = b.call("_+_", vec![one, two]);
    let ast = CheckedAst::new(sum);
    let snapshot = ast.clone();

    let runtime = Runtime::builder().build().unwrap();
    let program = runtime.program(ast);
    program.eval(&Activation::new()).unwrap();
    assert_eq!(program.ast(), &snapshot);
}

#[test]
fn root_errors_carry_source_locations() {
    let mut b = AstBuilder::new();
    let one = b.const_int(1);
    let zero = b.const_int(0);
    let div = b.call("_/_", vec![one, zero]);
    let mut info = SourceInfo::new();
    info.add(div.id, 1, 5);
    let ast = CheckedAst::new(div).with_source_info(info);

    let runtime = Runtime::builder().build().unwrap();
    let err = runtime.program(ast).eval(&Activation::new()).unwrap_err();
    assert_eq!(err.kind, ErrorKind::DivisionByZero);
    let location = err.location.expect("location should be mapped");
    assert_eq!((location.line, location.column), (1, 5));
    assert!(err.message.contains("line 1"), "message: {}", err.message);
}

#[test]
fn custom_member_function_formats_a_list() {
    // '%f %s'.format([3.14, 'test']) with a registered member-style binding.
    let mut b = AstBuilder::new();
    let template = b.const_string("%f %s");
    let pi = b.const_double(3.14);
    let text = b.const_string("test");
    let list = b.list(vec![pi, text]);
    let call = b.member_call(template, "format", vec![list]);
    let ast = CheckedAst::new(call);

    // Exactly one list node, directly under the call root.
    let nav = NavigableAst::build(&ast).unwrap();
    let lists: Vec<_> = nav
        .root()
        .all_nodes()
        .filter(|n| n.kind_name() == "list")
        .collect();
    assert_eq!(lists.len(), 1);
    assert_eq!(lists[0].parent().unwrap().id(), nav.root().id());

    let runtime = Runtime::builder()
        .with_function(
            "format",
            Overload::new(
                "format_string_list",
                [ArgKind::String, ArgKind::List],
                |args| {
                    let [Value::String(template), Value::List(items)] = args else {
                        return EvalError::internal("format expects (string, list)").into();
                    };
                    let mut out = template.to_string();
                    for item in items.iter() {
                        let formatted = match item {
                            Value::Double(d) => format!("{d:.6}"),
                            Value::String(s) => s.to_string(),
                            other => other.to_string(),
                        };
                        let next = [out.find("%f"), out.find("%s")]
                            .into_iter()
                            .flatten()
                            .min();
                        match next {
                            Some(pos) => out.replace_range(pos..pos + 2, &formatted),
                            None => break,
                        }
                    }
                    Value::string(out)
                },
            ),
        )
        .build()
        .unwrap();

    let result = runtime.program(ast).eval(&Activation::new()).unwrap();
    assert_eq!(result, Value::string("3.140000 test"));
}

#[test]
fn late_bindings_resolve_after_engine_bindings() {
    let mut b = AstBuilder::new();
    let one = b.const_int(21);
    let call = b.call("double_it", vec![one]);
    let runtime = Runtime::builder().build().unwrap();
    let program = runtime.program(CheckedAst::new(call));

    // Unbound without the late layer.
    let err = program.eval(&Activation::new()).unwrap_err();
    assert_eq!(err.kind, ErrorKind::NoSuchOverload);

    let mut late = FunctionRegistry::new();
    late.add(
        "double_it",
        Overload::new("double_it_int", [ArgKind::Int], |args| match args {
            [Value::Int(i)] => Value::Int(i * 2),
            _ => EvalError::internal("bad args").into(),
        }),
    )
    .unwrap();
    let result = program.eval_with(&Activation::new(), &late).unwrap();
    assert_eq!(result, Value::Int(42));
}

#[test]
fn standard_subset_include_filter() {
    let runtime = Runtime::builder()
        .include_standard_functions(["_+_"])
        .build()
        .unwrap();

    let mut b = AstBuilder::new();
    let one = b.const_int(1);
    let two = b.const_int(2);
    let sum = b.call("_+_", vec![one, two]);
    assert_eq!(
        runtime.program(CheckedAst::new(sum)).eval(&Activation::new()).unwrap(),
        Value::Int(3)
    );

    let mut b = AstBuilder::new();
    let s = b.const_string("x");
    let size = b.call("size", vec![s]);
    let err = runtime
        .program(CheckedAst::new(size))
        .eval(&Activation::new())
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NoSuchOverload);
}

#[test]
fn standard_subset_exclude_filter() {
    let runtime = Runtime::builder()
        .exclude_standard_function("matches")
        .build()
        .unwrap();

    let mut b = AstBuilder::new();
    let s = b.const_string("x");
    let re = b.const_string("x");
    let m = b.call("matches", vec![s, re]);
    let err = runtime
        .program(CheckedAst::new(m))
        .eval(&Activation::new())
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NoSuchOverload);
}

#[test]
fn standard_subset_predicate_filter() {
    let runtime = Runtime::builder()
        .filter_standard_functions(|name| !name.starts_with("_"))
        .build()
        .unwrap();

    let mut b = AstBuilder::new();
    let one = b.const_int(1);
    let two = b.const_int(2);
    let sum = b.call("_+_", vec![one, two]);
    let err = runtime
        .program(CheckedAst::new(sum))
        .eval(&Activation::new())
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NoSuchOverload);

    let mut b = AstBuilder::new();
    let s = b.const_string("ab");
    let size = b.call("size", vec![s]);
    assert_eq!(
        runtime.program(CheckedAst::new(size)).eval(&Activation::new()).unwrap(),
        Value::Int(2)
    );
}

#[test]
fn without_standard_functions() {
    let runtime = Runtime::builder().without_standard_functions().build().unwrap();
    let mut b = AstBuilder::new();
    let one = b.const_int(1);
    let two = b.const_int(2);
    let sum = b.call("_+_", vec![one, two]);
    let err = runtime
        .program(CheckedAst::new(sum))
        .eval(&Activation::new())
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NoSuchOverload);
}

#[test]
fn custom_overload_id_collisions_fail_at_build() {
    let err = Runtime::builder()
        .with_function(
            "my_add",
            Overload::new("add_int64", [ArgKind::Int, ArgKind::Int], |_| Value::Null),
        )
        .build()
        .unwrap_err();
    assert_eq!(err, BindingError::DuplicateOverload("add_int64".into()));
}

#[test]
fn unknown_results_surface_as_values() {
    let mut b = AstBuilder::new();
    let ident = b.ident("pending");
    let runtime = Runtime::builder().build().unwrap();
    let activation = Activation::new().with_unknown_patterns(vec!["pending".parse().unwrap()]);
    let result = runtime
        .program(CheckedAst::new(ident))
        .eval(&activation)
        .unwrap();
    assert!(result.is_unknown());
}
