//! Declaration resolution across files and in any order.

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use terp::{AstBuilder, BinaryOp, ErrorCode, NodeId, Package, SourceFile, SymbolKind};

use crate::common::{assert_compile_error, interp, main_fn, println, run};

/// Top-level declarations that refer to each other in every direction.
fn tangled_decls(b: &AstBuilder) -> Vec<NodeId> {
    let int = || b.ident("int");
    let counter_recv = b.field(&["c"], b.pointer_type(b.ident("Counter")));
    let add_body = b.block(vec![b.op_assign(
        BinaryOp::Add,
        b.selector(b.ident("c"), "n"),
        b.ident("k"),
    )]);
    let main_body = vec![
        println(
            b,
            vec![
                b.call_named("describe", vec![b.ident("origin")]),
                b.ident("total"),
                b.ident("Scale"),
            ],
        ),
        b.define(&["c"], vec![b.composite(Some(b.ident("Counter")), Vec::new())]),
        b.expr_stmt(b.method_call(b.ident("c"), "Add", vec![b.ident("Scale")])),
        println(b, vec![b.selector(b.ident("c"), "n")]),
    ];
    vec![
        main_fn(b, main_body),
        b.var_decl(
            &["total"],
            None,
            vec![b.call_named("sum", vec![b.ident("Scale"), b.ident("offset")])],
        ),
        b.var_decl(
            &["offset"],
            None,
            vec![b.binary(BinaryOp::Mul, b.ident("Scale"), b.int(2))],
        ),
        b.const_decl(vec![b.value_spec(
            &["Scale"],
            None,
            vec![b.binary(BinaryOp::Add, b.ident("Base"), b.int(1))],
        )]),
        b.const_decl(vec![b.value_spec(&["Base"], None, vec![b.int(2)])]),
        b.type_decl("Point", b.struct_type(vec![b.field(&["X", "Y"], int())])),
        b.var_decl(
            &["origin"],
            None,
            vec![b.composite(
                Some(b.ident("Point")),
                vec![
                    b.field_value("X", b.ident("Scale")),
                    b.field_value("Y", b.ident("offset")),
                ],
            )],
        ),
        b.func(
            "describe",
            vec![b.field(&["p"], b.ident("Point"))],
            vec![b.anon(int())],
            b.block(vec![b.ret(vec![b.binary(
                BinaryOp::Add,
                b.selector(b.ident("p"), "X"),
                b.selector(b.ident("p"), "Y"),
            )])]),
        ),
        b.func(
            "sum",
            vec![b.field(&["a", "b"], int())],
            vec![b.anon(int())],
            b.block(vec![b.ret(vec![b.binary(
                BinaryOp::Add,
                b.ident("a"),
                b.ident("b"),
            )])]),
        ),
        b.type_decl("Counter", b.struct_type(vec![b.field(&["n"], int())])),
        b.method(
            counter_recv,
            "Add",
            b.sig(vec![b.field(&["k"], int())], Vec::new()),
            add_body,
        ),
    ]
}

const TANGLED_OUTPUT: &str = "9 9 3\n3\n";

/// Number of declarations `tangled_decls` returns.
const TANGLED_LEN: usize = 11;

#[test]
fn forward_references_resolve() {
    assert_eq!(run(tangled_decls), TANGLED_OUTPUT);
}

/// Run `tangled_decls` reordered by `order` and dealt round-robin into
/// `files` source files.
fn run_shuffled(order: &[usize], files: usize) -> (String, Vec<(String, SymbolKind)>) {
    let interp = interp();
    let b = interp.ast_builder();
    let decls = tangled_decls(&b);
    let mut sources: Vec<SourceFile> = (0..files)
        .map(|i| SourceFile::new(format!("file{i}")))
        .collect();
    for (n, &i) in order.iter().enumerate() {
        sources[n % files].decls.push(decls[i]);
    }
    let program = interp
        .compile(Package::new(b.finish(), sources))
        .unwrap_or_else(|e| panic!("compile failed: {e}"));
    interp.run_main(&program).unwrap();

    let kinds = ["main", "total", "offset", "Scale", "Base", "Point", "origin", "describe", "Counter"]
        .iter()
        .map(|name| {
            let sym = interp.symbol(name).unwrap();
            ((*name).to_string(), sym.kind)
        })
        .collect();
    (interp.output(), kinds)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn declaration_order_does_not_matter(
        order in Just((0..TANGLED_LEN).collect::<Vec<usize>>()).prop_shuffle(),
        files in 1usize..4,
    ) {
        let (output, kinds) = run_shuffled(&order, files);
        let (canonical_output, canonical_kinds) = run_shuffled(&(0..TANGLED_LEN).collect::<Vec<_>>(), 1);
        prop_assert_eq!(output, canonical_output);
        prop_assert_eq!(kinds, canonical_kinds);
    }
}

#[test]
fn variables_initialize_after_their_dependencies() {
    let out = run(|b| {
        let f_body = b.block(vec![
            println(b, vec![b.string("f")]),
            b.ret(vec![b.int(1)]),
        ]);
        vec![
            b.var_decl(&["a"], None, vec![b.binary(BinaryOp::Add, b.ident("b"), b.int(1))]),
            b.var_decl(&["b"], None, vec![b.call_named("f", Vec::new())]),
            b.func("f", Vec::new(), vec![b.anon(b.ident("int"))], f_body),
            main_fn(b, vec![println(b, vec![b.ident("a"), b.ident("b")])]),
        ]
    });
    assert_eq!(out, "f\n2 1\n");
}

/// `func name() int { return value }`
fn returning(b: &AstBuilder, name: &str, value: NodeId) -> NodeId {
    b.func(
        name,
        Vec::new(),
        vec![b.anon(b.ident("int"))],
        b.block(vec![b.ret(vec![value])]),
    )
}

#[test]
fn variables_initialize_after_variables_read_by_called_functions() {
    let out = run(|b| {
        vec![
            returning(b, "f", b.ident("bb")),
            returning(b, "g", b.int(5)),
            b.var_decl(&["a"], None, vec![b.call_named("f", Vec::new())]),
            b.var_decl(&["bb"], None, vec![b.call_named("g", Vec::new())]),
            main_fn(b, vec![println(b, vec![b.ident("a"), b.ident("bb")])]),
        ]
    });
    assert_eq!(out, "5 5\n");
}

#[test]
fn dependencies_through_methods_and_nested_calls_are_followed() {
    let out = run(|b| {
        let scaled = b.method(
            b.field(&["m"], b.ident("Meter")),
            "Scaled",
            b.sig(Vec::new(), vec![b.anon(b.ident("int"))]),
            b.block(vec![b.ret(vec![b.binary(
                BinaryOp::Mul,
                b.call(b.ident("int"), vec![b.ident("m")]),
                b.call_named("factor", Vec::new()),
            )])]),
        );
        vec![
            b.var_decl(
                &["length"],
                None,
                vec![b.method_call(b.call(b.ident("Meter"), vec![b.int(3)]), "Scaled", Vec::new())],
            ),
            returning(b, "factor", b.ident("unit")),
            b.var_decl(&["unit"], None, vec![b.int(10)]),
            b.type_decl("Meter", b.ident("int")),
            scaled,
            main_fn(b, vec![println(b, vec![b.ident("length")])]),
        ]
    });
    assert_eq!(out, "30\n");
}

#[test]
fn initialization_cycle_through_a_function_is_reported() {
    let err = crate::common::compile_err(|b| {
        vec![
            b.var_decl(&["a"], None, vec![b.call_named("f", Vec::new())]),
            returning(b, "f", b.ident("a")),
        ]
    });
    assert!(err.has_code(ErrorCode::E1004), "{err}");
    assert!(err.to_string().contains("a refers to f refers to a"), "{err}");
}

#[test]
fn init_functions_run_before_main_in_order() {
    let out = run(|b| {
        vec![
            main_fn(b, vec![println(b, vec![b.string("main")])]),
            b.func(
                "init",
                Vec::new(),
                Vec::new(),
                b.block(vec![println(b, vec![b.string("init 1")])]),
            ),
            b.func(
                "init",
                Vec::new(),
                Vec::new(),
                b.block(vec![println(b, vec![b.string("init 2")])]),
            ),
        ]
    });
    assert_eq!(out, "init 1\ninit 2\nmain\n");
}

#[test]
fn initializers_run_once_per_program() {
    let interp = interp();
    let program = crate::common::compile_on(&interp, |b| {
        vec![
            b.var_decl(&["hits"], Some(b.ident("int")), Vec::new()),
            b.func(
                "init",
                Vec::new(),
                Vec::new(),
                b.block(vec![b.inc(b.ident("hits"))]),
            ),
            main_fn(b, vec![println(b, vec![b.ident("hits")])]),
        ]
    })
    .unwrap();
    interp.run_main(&program).unwrap();
    interp.run_main(&program).unwrap();
    assert_eq!(interp.take_output(), "1\n1\n");
}

#[test]
fn functions_may_read_package_variables() {
    let out = run(|b| {
        vec![
            b.var_decl(&["x"], None, vec![b.int(7)]),
            b.func(
                "f",
                Vec::new(),
                vec![b.anon(b.ident("int"))],
                b.block(vec![b.ret(vec![b.ident("x")])]),
            ),
            main_fn(b, vec![println(b, vec![b.call_named("f", Vec::new())])]),
        ]
    });
    assert_eq!(out, "7\n");
}

#[test]
fn undefined_name_is_reported() {
    assert_compile_error(
        |b| vec![main_fn(b, vec![println(b, vec![b.ident("nowhere")])])],
        ErrorCode::E1001,
    );
}

#[test]
fn direct_initialization_cycle_is_reported() {
    assert_compile_error(
        |b| {
            vec![
                b.var_decl(&["a"], None, vec![b.ident("b")]),
                b.var_decl(&["b"], None, vec![b.ident("a")]),
            ]
        },
        ErrorCode::E1004,
    );
}

#[test]
fn main_with_parameters_is_rejected() {
    assert_compile_error(
        |b| {
            vec![b.func(
                "main",
                vec![b.field(&["x"], b.ident("int"))],
                Vec::new(),
                b.block(Vec::new()),
            )]
        },
        ErrorCode::E2014,
    );
}

#[test]
fn failed_compile_leaves_the_session_untouched() {
    let interp = interp();
    let bad = crate::common::compile_on(&interp, |b| {
        vec![
            b.var_decl(&["ok"], None, vec![b.int(1)]),
            b.var_decl(&["broken"], None, vec![b.ident("nowhere")]),
        ]
    });
    assert!(bad.is_err());
    assert!(interp.symbol("ok").is_none());

    let program = crate::common::compile_on(&interp, |b| {
        vec![
            b.var_decl(&["ok"], None, vec![b.int(2)]),
            main_fn(b, vec![println(b, vec![b.ident("ok")])]),
        ]
    })
    .unwrap();
    interp.run_main(&program).unwrap();
    assert_eq!(interp.output(), "2\n");
}
