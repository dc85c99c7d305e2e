//! Generic functions and types: inference, constraints and instance reuse.

use pretty_assertions::assert_eq;
use terp::{AstBuilder, BinaryOp, ErrorCode, NodeId};

use crate::common::{assert_compile_error, compile_on, interp, main_fn, println, run};

/// `type Number interface { ~int | ~float64 }`
fn number_decl(b: &AstBuilder) -> NodeId {
    let terms = b.union(vec![b.tilde(b.ident("int")), b.tilde(b.ident("float64"))]);
    b.type_decl("Number", b.interface_type(vec![terms]))
}

/// `func Larger[T Number](a, b T) T`
fn larger_decl(b: &AstBuilder) -> NodeId {
    let tparams = vec![b.field(&["T"], b.ident("Number"))];
    let sig = b.sig(vec![b.field(&["a", "b"], b.ident("T"))], vec![b.anon(b.ident("T"))]);
    let body = b.block(vec![
        b.if_stmt(
            None,
            b.binary(BinaryOp::Gt, b.ident("a"), b.ident("b")),
            b.block(vec![b.ret(vec![b.ident("a")])]),
            None,
        ),
        b.ret(vec![b.ident("b")]),
    ]);
    b.func_decl("Larger", None, tparams, sig, body)
}

/// `func Zero[T any]() T { var z T; return z }`
fn zero_decl(b: &AstBuilder) -> NodeId {
    let tparams = vec![b.field(&["T"], b.ident("any"))];
    let sig = b.sig(Vec::new(), vec![b.anon(b.ident("T"))]);
    let body = b.block(vec![
        b.var_stmt(&["z"], Some(b.ident("T")), Vec::new()),
        b.ret(vec![b.ident("z")]),
    ]);
    b.func_decl("Zero", None, tparams, sig, body)
}

#[test]
fn equal_type_arguments_share_one_instance() {
    let interp = interp();
    let program = compile_on(&interp, |b| {
        let main = main_fn(
            b,
            vec![
                println(b, vec![b.call_named("Larger", vec![b.int(1), b.int(2)])]),
                println(b, vec![b.call_named("Larger", vec![b.int(9), b.int(4)])]),
                b.define(&["f"], vec![b.call_named("Larger", vec![b.float(1.5), b.float(0.5)])]),
                println(b, vec![b.binary(BinaryOp::Gt, b.ident("f"), b.float(1.0))]),
            ],
        );
        vec![number_decl(b), larger_decl(b), main]
    })
    .unwrap();
    assert_eq!(interp.instantiation_count(), 2);
    interp.run_main(&program).unwrap();
    assert_eq!(interp.output(), "2\n9\ntrue\n");
}

#[test]
fn explicit_instantiation_fixes_the_type() {
    let out = run(|b| {
        let call = b.call(
            b.instantiate(b.ident("Larger"), vec![b.ident("float64")]),
            vec![b.int(3), b.int(2)],
        );
        let main = main_fn(
            b,
            vec![
                b.define(&["x"], vec![call]),
                b.var_stmt(&["y"], Some(b.ident("float64")), vec![b.ident("x")]),
                println(b, vec![b.binary(BinaryOp::Eq, b.ident("y"), b.float(3.0))]),
            ],
        );
        vec![number_decl(b), larger_decl(b), main]
    });
    assert_eq!(out, "true\n");
}

#[test]
fn named_types_satisfy_approximation_terms() {
    let out = run(|b| {
        let main = main_fn(
            b,
            vec![
                b.define(
                    &["a"],
                    vec![b.call(b.ident("Celsius"), vec![b.int(20)])],
                ),
                b.define(
                    &["c"],
                    vec![b.call_named(
                        "Larger",
                        vec![b.ident("a"), b.call(b.ident("Celsius"), vec![b.int(25)])],
                    )],
                ),
                println(b, vec![b.call(b.ident("int"), vec![b.ident("c")])]),
            ],
        );
        vec![
            number_decl(b),
            larger_decl(b),
            b.type_decl("Celsius", b.ident("int")),
            main,
        ]
    });
    assert_eq!(out, "25\n");
}

#[test]
fn unsatisfied_constraint_is_reported() {
    assert_compile_error(
        |b| {
            let main = main_fn(
                b,
                vec![println(
                    b,
                    vec![b.call_named("Larger", vec![b.string("a"), b.string("b")])],
                )],
            );
            vec![number_decl(b), larger_decl(b), main]
        },
        ErrorCode::E2007,
    );
}

#[test]
fn uninferable_type_parameter_is_reported() {
    assert_compile_error(
        |b| {
            let main = main_fn(b, vec![b.define(&["z"], vec![b.call_named("Zero", Vec::new())])]);
            vec![zero_decl(b), main]
        },
        ErrorCode::E2008,
    );
}

#[test]
fn wrong_type_argument_count_is_reported() {
    assert_compile_error(
        |b| {
            let call = b.call(
                b.instantiate(b.ident("Zero"), vec![b.ident("int"), b.ident("string")]),
                Vec::new(),
            );
            vec![zero_decl(b), main_fn(b, vec![b.define(&["z"], vec![call])])]
        },
        ErrorCode::E2009,
    );
}

#[test]
fn zero_value_of_a_type_parameter() {
    let out = run(|b| {
        let zero_of = |ty: &str| {
            b.call(b.instantiate(b.ident("Zero"), vec![b.ident(ty)]), Vec::new())
        };
        let main = main_fn(
            b,
            vec![
                println(b, vec![zero_of("int"), zero_of("bool")]),
                println(b, vec![b.call_named("len", vec![zero_of("string")])]),
            ],
        );
        vec![zero_decl(b), main]
    });
    assert_eq!(out, "0 false\n0\n");
}

/// `type Stack[T any] struct { items []T }` with `Push` and `Len`.
fn stack_decls(b: &AstBuilder) -> Vec<NodeId> {
    let recv = || {
        b.field(
            &["s"],
            b.pointer_type(b.instantiate(b.ident("Stack"), vec![b.ident("T")])),
        )
    };
    let items = || b.selector(b.ident("s"), "items");
    let push = b.method(
        recv(),
        "Push",
        b.sig(vec![b.field(&["v"], b.ident("T"))], Vec::new()),
        b.block(vec![b.assign(
            vec![items()],
            vec![b.call_named("append", vec![items(), b.ident("v")])],
        )]),
    );
    let len = b.method(
        recv(),
        "Len",
        b.sig(Vec::new(), vec![b.anon(b.ident("int"))]),
        b.block(vec![b.ret(vec![b.call_named("len", vec![items()])])]),
    );
    let stack = b.generic_type_decl(
        "Stack",
        vec![b.field(&["T"], b.ident("any"))],
        b.struct_type(vec![b.field(&["items"], b.slice_type(b.ident("T")))]),
    );
    vec![push, stack, len]
}

#[test]
fn generic_types_get_their_methods_per_instance() {
    let interp = interp();
    let program = compile_on(&interp, |b| {
        let new_stack = |ty: &str| {
            b.addr(b.composite(
                Some(b.instantiate(b.ident("Stack"), vec![b.ident(ty)])),
                Vec::new(),
            ))
        };
        let main = main_fn(
            b,
            vec![
                b.define(&["ints"], vec![new_stack("int")]),
                b.expr_stmt(b.method_call(b.ident("ints"), "Push", vec![b.int(1)])),
                b.expr_stmt(b.method_call(b.ident("ints"), "Push", vec![b.int(2)])),
                b.define(&["words"], vec![new_stack("string")]),
                b.expr_stmt(b.method_call(b.ident("words"), "Push", vec![b.string("a")])),
                b.define(&["more"], vec![new_stack("int")]),
                println(
                    b,
                    vec![
                        b.method_call(b.ident("ints"), "Len", Vec::new()),
                        b.method_call(b.ident("words"), "Len", Vec::new()),
                        b.method_call(b.ident("more"), "Len", Vec::new()),
                    ],
                ),
            ],
        );
        let mut decls = stack_decls(b);
        decls.push(main);
        decls
    })
    .unwrap();
    // Stack[int] and Stack[string].
    assert_eq!(interp.instantiation_count(), 2);
    interp.run_main(&program).unwrap();
    assert_eq!(interp.output(), "2 1 0\n");
}

#[test]
fn generic_function_over_slices_and_funcs() {
    let out = run(|b| {
        let tparams = vec![
            b.field(&["T"], b.ident("any")),
            b.field(&["U"], b.ident("any")),
        ];
        let f_ty = b.func_type(
            vec![b.anon(b.ident("T"))],
            vec![b.anon(b.ident("U"))],
            false,
        );
        let sig = b.sig(
            vec![
                b.field(&["xs"], b.slice_type(b.ident("T"))),
                b.field(&["f"], f_ty),
            ],
            vec![b.anon(b.slice_type(b.ident("U")))],
        );
        let body = b.block(vec![
            b.define(
                &["out"],
                vec![b.call_named(
                    "make",
                    vec![
                        b.slice_type(b.ident("U")),
                        b.int(0),
                        b.call_named("len", vec![b.ident("xs")]),
                    ],
                )],
            ),
            b.range(
                Some(b.ident("_")),
                Some(b.ident("x")),
                true,
                b.ident("xs"),
                b.block(vec![b.assign(
                    vec![b.ident("out")],
                    vec![b.call_named(
                        "append",
                        vec![b.ident("out"), b.call(b.ident("f"), vec![b.ident("x")])],
                    )],
                )]),
            ),
            b.ret(vec![b.ident("out")]),
        ]);
        let map_fn = b.func_decl("Map", None, tparams, sig, body);

        let letter = b.func_lit(
            b.sig(vec![b.field(&["n"], b.ident("int"))], vec![b.anon(b.ident("string"))]),
            b.block(vec![b.ret(vec![b.index(b.ident("names"), b.ident("n"))])]),
        );
        let names = b.composite(
            Some(b.slice_type(b.ident("string"))),
            vec![b.string("a"), b.string("b"), b.string("c")],
        );
        let nums = b.composite(Some(b.slice_type(b.ident("int"))), vec![b.int(0), b.int(1), b.int(2)]);
        let main = main_fn(
            b,
            vec![
                b.define(&["names"], vec![names]),
                b.define(&["letters"], vec![b.call_named("Map", vec![nums, letter])]),
                println(b, vec![b.ident("letters"), b.call_named("len", vec![b.ident("letters")])]),
            ],
        );
        vec![map_fn, main]
    });
    assert_eq!(out, "[a b c] 3\n");
}
