#![allow(clippy::unwrap_used, clippy::expect_used)]

use pretty_assertions::assert_eq;
use terp_diagnostic::{CompileError, ErrorCode};
use terp_ir::{AstBuilder, BinaryOp, Package, SharedInterner};
use terp_types::{ConstValue, Idx};

use crate::scope::{Storage, SymbolKind};
use crate::CompileContext;

fn compile(build: impl FnOnce(&AstBuilder) -> Vec<terp_ir::NodeId>) -> (CompileContext, Result<(), CompileError>) {
    let interner = SharedInterner::new();
    let b = AstBuilder::new(interner.clone());
    let decls = build(&b);
    let pkg: Package = b.into_package(decls);
    let mut ctx = CompileContext::new(interner);
    let result = ctx.compile_package(pkg).map(|_| ());
    (ctx, result)
}

fn package_sym(ctx: &CompileContext, name: &str) -> crate::Symbol {
    let name = ctx.interner().intern(name);
    ctx.package.get(name).cloned().expect("declared")
}

#[test]
fn variables_resolve_in_dependency_order() {
    let (ctx, result) = compile(|b| {
        vec![
            b.var_decl(
                &["a"],
                None,
                vec![b.binary(BinaryOp::Add, b.ident("b"), b.int(1))],
            ),
            b.var_decl(&["b"], Some(b.ident("int")), vec![b.int(2)]),
        ]
    });
    result.unwrap();
    let a = package_sym(&ctx, "a");
    let b = package_sym(&ctx, "b");
    assert_eq!(a.kind, SymbolKind::Var);
    assert_eq!(a.ty, Idx::INT);
    let (Storage::Global(sa), Storage::Global(sb)) = (a.storage, b.storage) else {
        panic!("package variables live in the root frame");
    };
    // `b` resolves first, so it gets the earlier slot.
    assert!(sb < sa);
    // One initializer chunk per variable spec.
    assert_eq!(ctx.program().inits().len(), 2);
}

#[test]
fn constants_repeat_the_previous_spec_with_iota() {
    let (ctx, result) = compile(|b| {
        let first = b.value_spec(&["A"], None, vec![b.ident("iota")]);
        let second = b.value_spec(&["B"], None, Vec::new());
        let third = b.value_spec(&["C"], None, Vec::new());
        vec![b.const_decl(vec![first, second, third])]
    });
    result.unwrap();
    for (name, want) in [("A", 0), ("B", 1), ("C", 2)] {
        let sym = package_sym(&ctx, name);
        assert_eq!(sym.kind, SymbolKind::Const);
        assert_eq!(sym.ty, Idx::UNTYPED_INT);
        assert_eq!(sym.value, Some(ConstValue::Int(want)));
    }
}

#[test]
fn mutually_dependent_variables_are_a_cycle() {
    let (_, result) = compile(|b| {
        vec![
            b.var_decl(&["a"], None, vec![b.ident("b")]),
            b.var_decl(&["b"], None, vec![b.ident("a")]),
        ]
    });
    let err = result.unwrap_err();
    assert!(err.has_code(ErrorCode::E1004));
}

#[test]
fn unknown_names_are_undefined() {
    let (_, result) = compile(|b| vec![b.var_decl(&["a"], None, vec![b.ident("missing")])]);
    let err = result.unwrap_err();
    assert!(err.has_code(ErrorCode::E1001));
    assert!(err.first().unwrap().message.contains("missing"));
}

#[test]
fn struct_containing_itself_by_value_is_rejected() {
    let (_, result) = compile(|b| {
        let fields = vec![b.field(&["next"], b.ident("Node"))];
        vec![b.type_decl("Node", b.struct_type(fields))]
    });
    assert!(result.unwrap_err().has_code(ErrorCode::E1004));
}

#[test]
fn self_reference_through_a_pointer_is_fine() {
    let (ctx, result) = compile(|b| {
        let fields = vec![
            b.field(&["value"], b.ident("int")),
            b.field(&["next"], b.pointer_type(b.ident("Node"))),
        ];
        vec![b.type_decl("Node", b.struct_type(fields))]
    });
    result.unwrap();
    let node = package_sym(&ctx, "Node");
    assert_eq!(node.kind, SymbolKind::Type);
    assert_eq!(ctx.pool().struct_fields(node.ty).map(<[_]>::len), Some(2));
}

#[test]
fn methods_attach_regardless_of_order() {
    let (ctx, result) = compile(|b| {
        let recv = b.field(&["c"], b.pointer_type(b.ident("Counter")));
        let sig = b.sig(Vec::new(), vec![b.anon(b.ident("int"))]);
        let body = b.block(vec![b.ret(vec![b.int(1)])]);
        let method = b.method(recv, "Get", sig, body);
        let fields = vec![b.field(&["n"], b.ident("int"))];
        vec![method, b.type_decl("Counter", b.struct_type(fields))]
    });
    result.unwrap();
    let counter = package_sym(&ctx, "Counter").ty;
    let get = ctx.interner().intern("Get");
    assert!(ctx.methods.contains_key(&(counter, get)));
}

#[test]
fn duplicate_top_level_names_are_redeclared() {
    let (_, result) = compile(|b| {
        vec![
            b.var_decl(&["x"], Some(b.ident("int")), Vec::new()),
            b.var_decl(&["x"], Some(b.ident("string")), Vec::new()),
        ]
    });
    assert!(result.unwrap_err().has_code(ErrorCode::E1002));
}

#[test]
fn init_functions_are_not_symbols() {
    let (ctx, result) = compile(|b| {
        vec![
            b.func("init", Vec::new(), Vec::new(), b.block(Vec::new())),
            b.func("init", Vec::new(), Vec::new(), b.block(Vec::new())),
            b.func("main", Vec::new(), Vec::new(), b.block(Vec::new())),
        ]
    });
    result.unwrap();
    let init = ctx.interner().intern("init");
    assert!(ctx.package.get(init).is_none());
    assert_eq!(ctx.program().inits().len(), 2);
    assert!(ctx.program().entry("main").is_some());
}

#[test]
fn aliases_denote_the_same_type() {
    let (ctx, result) = compile(|b| {
        vec![
            b.alias_decl("Number", b.ident("Celsius")),
            b.type_decl("Celsius", b.ident("float64")),
        ]
    });
    result.unwrap();
    assert_eq!(package_sym(&ctx, "Number").ty, package_sym(&ctx, "Celsius").ty);
}

/// `func name() int { body }`
fn int_func(b: &AstBuilder, name: &str, body: Vec<terp_ir::NodeId>) -> terp_ir::NodeId {
    b.func(name, Vec::new(), vec![b.anon(b.ident("int"))], b.block(body))
}

#[test]
fn variable_reading_itself_through_a_function_is_a_cycle() {
    let (_, result) = compile(|b| {
        vec![
            b.var_decl(&["a"], None, vec![b.call_named("f", Vec::new())]),
            int_func(b, "f", vec![b.ret(vec![b.ident("a")])]),
        ]
    });
    let err = result.unwrap_err();
    assert!(err.has_code(ErrorCode::E1004));
    assert_eq!(
        err.first().unwrap().message,
        "initialization cycle: a refers to f refers to a"
    );
}

#[test]
fn cycle_through_a_method_is_reported() {
    let (_, result) = compile(|b| {
        let get = b.method(
            b.field(&["c"], b.ident("Counter")),
            "Get",
            b.sig(Vec::new(), vec![b.anon(b.ident("int"))]),
            b.block(vec![b.ret(vec![b.ident("total")])]),
        );
        vec![
            b.type_decl("Counter", b.ident("int")),
            get,
            b.var_decl(
                &["total"],
                None,
                vec![b.method_call(b.call(b.ident("Counter"), vec![b.int(1)]), "Get", Vec::new())],
            ),
        ]
    });
    assert!(result.unwrap_err().has_code(ErrorCode::E1004));
}

#[test]
fn locals_shadowing_a_variable_are_not_dependencies() {
    let (_, result) = compile(|b| {
        vec![
            b.var_decl(&["a"], None, vec![b.call_named("f", Vec::new())]),
            int_func(
                b,
                "f",
                vec![b.define(&["a"], vec![b.int(1)]), b.ret(vec![b.ident("a")])],
            ),
        ]
    });
    result.unwrap();
}

#[test]
fn recursive_functions_called_from_an_initializer_are_fine() {
    let (ctx, result) = compile(|b| {
        let n = || b.ident("n");
        let body = vec![
            b.if_stmt(
                None,
                b.binary(BinaryOp::LtEq, n(), b.int(1)),
                b.block(vec![b.ret(vec![b.int(1)])]),
                None,
            ),
            b.ret(vec![b.binary(
                BinaryOp::Mul,
                n(),
                b.call_named("fact", vec![b.binary(BinaryOp::Sub, n(), b.int(1))]),
            )]),
        ];
        vec![
            b.var_decl(&["x"], None, vec![b.call_named("fact", vec![b.int(5)])]),
            b.func(
                "fact",
                vec![b.field(&["n"], b.ident("int"))],
                vec![b.anon(b.ident("int"))],
                b.block(body),
            ),
        ]
    });
    result.unwrap();
    assert_eq!(ctx.program().inits().len(), 1);
}
