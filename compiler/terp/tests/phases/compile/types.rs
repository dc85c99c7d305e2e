//! Type checking: constants, interfaces, embedding and the usual mistakes.

use pretty_assertions::assert_eq;
use terp::{AstBuilder, BinaryOp, ErrorCode, NodeId, UnaryOp};

use crate::common::{assert_compile_error, main_fn, println, run};

/// `type Shape interface { Area() int }` plus `Rect` and `Square`
/// implementing it by value and by pointer.
fn shapes(b: &AstBuilder) -> Vec<NodeId> {
    let int = || b.ident("int");
    let area_sig = || b.sig(Vec::new(), vec![b.anon(int())]);
    let shape = b.type_decl(
        "Shape",
        b.interface_type(vec![b.method_elem("Area", area_sig())]),
    );
    let rect = b.type_decl("Rect", b.struct_type(vec![b.field(&["W", "H"], int())]));
    let rect_area = b.method(
        b.field(&["r"], b.ident("Rect")),
        "Area",
        area_sig(),
        b.block(vec![b.ret(vec![b.binary(
            BinaryOp::Mul,
            b.selector(b.ident("r"), "W"),
            b.selector(b.ident("r"), "H"),
        )])]),
    );
    let square = b.type_decl("Square", b.struct_type(vec![b.field(&["S"], int())]));
    let square_area = b.method(
        b.field(&["q"], b.pointer_type(b.ident("Square"))),
        "Area",
        area_sig(),
        b.block(vec![b.ret(vec![b.binary(
            BinaryOp::Mul,
            b.selector(b.ident("q"), "S"),
            b.selector(b.ident("q"), "S"),
        )])]),
    );
    vec![shape, rect, rect_area, square, square_area]
}

#[test]
fn interface_calls_dispatch_on_the_dynamic_type() {
    let out = run(|b| {
        let rect = b.composite(Some(b.ident("Rect")), vec![b.int(2), b.int(3)]);
        let square = b.addr(b.composite(
            Some(b.ident("Square")),
            vec![b.field_value("S", b.int(4))],
        ));
        let list = b.composite(Some(b.slice_type(b.ident("Shape"))), vec![rect, square]);
        let main = main_fn(
            b,
            vec![
                b.define(&["total"], vec![b.int(0)]),
                b.range_define(
                    "_",
                    Some("s"),
                    list,
                    b.block(vec![b.op_assign(
                        BinaryOp::Add,
                        b.ident("total"),
                        b.method_call(b.ident("s"), "Area", Vec::new()),
                    )]),
                ),
                println(b, vec![b.ident("total")]),
            ],
        );
        let mut decls = shapes(b);
        decls.push(main);
        decls
    });
    assert_eq!(out, "22\n");
}

#[test]
fn value_receiver_does_not_cover_pointer_methods() {
    assert_compile_error(
        |b| {
            let main = main_fn(
                b,
                vec![b.var_stmt(
                    &["s"],
                    Some(b.ident("Shape")),
                    vec![b.composite(Some(b.ident("Square")), Vec::new())],
                )],
            );
            let mut decls = shapes(b);
            decls.push(main);
            decls
        },
        ErrorCode::E2001,
    );
}

#[test]
fn type_switch_binds_the_case_type() {
    let out = run(|b| {
        let describe_body = b.block(vec![b.type_switch(
            Some("v"),
            b.ident("x"),
            vec![
                b.case(
                    vec![b.ident("int")],
                    vec![b.ret(vec![b.binary(BinaryOp::Mul, b.ident("v"), b.int(10))])],
                ),
                b.case(
                    vec![b.ident("string")],
                    vec![b.ret(vec![b.call_named("len", vec![b.ident("v")])])],
                ),
                b.case(vec![b.nil()], vec![b.ret(vec![b.int(-1)])]),
                b.default_case(vec![b.ret(vec![b.int(0)])]),
            ],
        )]);
        let describe = b.func(
            "describe",
            vec![b.field(&["x"], b.ident("any"))],
            vec![b.anon(b.ident("int"))],
            describe_body,
        );
        let main = main_fn(
            b,
            vec![println(
                b,
                vec![
                    b.call_named("describe", vec![b.int(4)]),
                    b.call_named("describe", vec![b.string("hey")]),
                    b.call_named("describe", vec![b.nil()]),
                    b.call_named("describe", vec![b.boolean(true)]),
                ],
            )],
        );
        vec![describe, main]
    });
    assert_eq!(out, "40 3 -1 0\n");
}

#[test]
fn comma_ok_forms() {
    let out = run(|b| {
        let map_ty = b.map_type(b.ident("string"), b.ident("int"));
        let ages = b.composite(
            Some(map_ty),
            vec![b.key_value(b.string("ann"), b.int(31))],
        );
        let main = main_fn(
            b,
            vec![
                b.define(&["ages"], vec![ages]),
                b.define(&["a", "ok"], vec![b.index(b.ident("ages"), b.string("ann"))]),
                b.define(&["z", "found"], vec![b.index(b.ident("ages"), b.string("bob"))]),
                println(b, vec![b.ident("a"), b.ident("ok"), b.ident("z"), b.ident("found")]),
                b.var_stmt(&["x"], Some(b.ident("any")), vec![b.string("s")]),
                b.define(&["n", "isInt"], vec![b.type_assert(b.ident("x"), b.ident("int"))]),
                b.define(&["s", "isStr"], vec![b.type_assert(b.ident("x"), b.ident("string"))]),
                println(b, vec![b.ident("n"), b.ident("isInt"), b.ident("s"), b.ident("isStr")]),
            ],
        );
        vec![main]
    });
    assert_eq!(out, "31 true 0 false\n0 false s true\n");
}

#[test]
fn embedded_fields_and_methods_are_promoted() {
    let out = run(|b| {
        let base = b.type_decl("Base", b.struct_type(vec![b.field(&["ID"], b.ident("int"))]));
        let describe = b.method(
            b.field(&["b"], b.ident("Base")),
            "Describe",
            b.sig(Vec::new(), vec![b.anon(b.ident("int"))]),
            b.block(vec![b.ret(vec![b.binary(
                BinaryOp::Add,
                b.selector(b.ident("b"), "ID"),
                b.int(100),
            )])]),
        );
        let user = b.type_decl(
            "User",
            b.struct_type(vec![
                b.anon(b.ident("Base")),
                b.field(&["Name"], b.ident("string")),
            ]),
        );
        let main = main_fn(
            b,
            vec![
                b.define(
                    &["u"],
                    vec![b.composite(
                        Some(b.ident("User")),
                        vec![
                            b.field_value(
                                "Base",
                                b.composite(Some(b.ident("Base")), vec![b.int(7)]),
                            ),
                            b.field_value("Name", b.string("ann")),
                        ],
                    )],
                ),
                println(
                    b,
                    vec![
                        b.selector(b.ident("u"), "ID"),
                        b.method_call(b.ident("u"), "Describe", Vec::new()),
                        b.selector(b.ident("u"), "Name"),
                    ],
                ),
            ],
        );
        vec![base, describe, user, main]
    });
    assert_eq!(out, "7 107 ann\n");
}

#[test]
fn constants_keep_full_precision_until_used() {
    let out = run(|b| {
        let huge = b.binary(BinaryOp::Shl, b.int(1), b.int(100));
        let main = main_fn(
            b,
            vec![
                b.decl_stmt(b.const_decl(vec![b.value_spec(&["Huge"], None, vec![huge])])),
                println(
                    b,
                    vec![b.binary(
                        BinaryOp::Shr,
                        b.ident("Huge"),
                        b.int(98),
                    )],
                ),
            ],
        );
        vec![main]
    });
    assert_eq!(out, "4\n");
}

#[test]
fn constant_overflow_is_reported() {
    assert_compile_error(
        |b| {
            vec![main_fn(
                b,
                vec![b.var_stmt(&["x"], Some(b.ident("int8")), vec![b.int(300)])],
            )]
        },
        ErrorCode::E2006,
    );
}

#[test]
fn mismatched_operands_are_reported() {
    assert_compile_error(
        |b| {
            vec![main_fn(
                b,
                vec![
                    b.define(&["a"], vec![b.int(1)]),
                    b.define(&["s"], vec![b.string("x")]),
                    println(b, vec![b.binary(BinaryOp::Add, b.ident("a"), b.ident("s"))]),
                ],
            )]
        },
        ErrorCode::E2001,
    );
}

#[test]
fn division_by_constant_zero_is_reported() {
    assert_compile_error(
        |b| {
            vec![main_fn(
                b,
                vec![
                    b.define(&["a"], vec![b.int(1)]),
                    println(b, vec![b.binary(BinaryOp::Div, b.ident("a"), b.int(0))]),
                ],
            )]
        },
        ErrorCode::E2017,
    );
}

#[test]
fn wrong_argument_count_is_reported() {
    assert_compile_error(
        |b| {
            let f = b.func(
                "f",
                vec![b.field(&["x"], b.ident("int"))],
                Vec::new(),
                b.block(Vec::new()),
            );
            vec![f, main_fn(b, vec![b.expr_stmt(b.call_named("f", Vec::new()))])]
        },
        ErrorCode::E2003,
    );
}

#[test]
fn assigning_to_a_constant_is_reported() {
    assert_compile_error(
        |b| {
            vec![
                b.const_decl(vec![b.value_spec(&["K"], None, vec![b.int(1)])]),
                main_fn(b, vec![b.assign(vec![b.ident("K")], vec![b.int(2)])]),
            ]
        },
        ErrorCode::E2018,
    );
}

#[test]
fn invalid_conversion_is_reported() {
    assert_compile_error(
        |b| {
            vec![main_fn(
                b,
                vec![
                    b.define(&["f"], vec![b.boolean(true)]),
                    println(b, vec![b.call(b.ident("int"), vec![b.ident("f")])]),
                ],
            )]
        },
        ErrorCode::E2005,
    );
}

#[test]
fn negation_of_an_unsigned_constant_is_not_representable() {
    assert_compile_error(
        |b| {
            vec![main_fn(
                b,
                vec![b.var_stmt(
                    &["u"],
                    Some(b.ident("uint")),
                    vec![b.unary(UnaryOp::Neg, b.int(1))],
                )],
            )]
        },
        ErrorCode::E2006,
    );
}
