use std::fmt::Write;

use crystal_ast::{Ast, ChainOp, NodeId, Visibility::*};
use crystal_emit::to_clarity;
use crystal_types::{TraitTarget, Type};
use insta::assert_snapshot;

fn add() -> Ast {
    let mut ast = Ast::new();
    let a = ast.arg("a", Type::Int);
    let b = ast.arg("b", Type::Int);
    let (x, y) = (ast.id("a"), ast.id("b"));
    let sum = ast.chain(ChainOp::Add, x, y);
    let r = ast.ret(sum);
    let f = ast.function(Private, "add", vec![a, b], vec![r]);
    ast.push_definition(f);
    ast
}

fn early_return() -> Ast {
    let mut ast = Ast::new();
    let x = ast.arg("x", Type::Bool);
    let cond = ast.id("x");
    let one = ast.uint(1);
    let e = ast.call("err", vec![one]);
    let r1 = ast.ret(e);
    let stmt = ast.if_stmt(cond, vec![r1]);
    let t = ast.bool_lit(true);
    let ok = ast.call("ok", vec![t]);
    let r2 = ast.ret(ok);
    let f = ast.function(Public, "check", vec![x], vec![stmt, r2]);
    ast.push_definition(f);
    ast
}

fn hoisted_locals() -> Ast {
    let mut ast = Ast::new();
    let n = ast.arg("n", Type::Uint);
    let (id_n, two) = (ast.id("n"), ast.uint(2));
    let double = ast.chain(ChainOp::Mul, id_n, two);
    let d = ast.const_decl("d", double);
    let (id_d, one) = (ast.id("d"), ast.uint(1));
    let sum = ast.chain(ChainOp::Add, id_d, one);
    let r = ast.ret(sum);
    let f = ast.function(Private, "f", vec![n], vec![d, r]);
    ast.push_definition(f);
    ast
}

fn final_else() -> Ast {
    let mut ast = Ast::new();
    let x = ast.arg("x", Type::Bool);
    let cond = ast.id("x");
    let one = ast.uint(1);
    let r1 = ast.ret(one);
    let two = ast.uint(2);
    let r2 = ast.ret(two);
    let stmt = ast.if_else(cond, vec![r1], vec![r2]);
    let f = ast.function(Private, "pick", vec![x], vec![stmt]);
    ast.push_definition(f);
    ast
}

fn storage() -> Ast {
    let mut ast = Ast::new();
    let zero = ast.uint(0);
    let counter = ast.data_var("counter", Type::Uint, zero);
    let balances = ast.data_map("balances", Type::Principal, Type::Uint);
    let meta = ast.data_map(
        "meta",
        Type::Uint,
        Type::map([("owner", Type::Principal), ("uri", Type::StringAscii(Some(64)))]),
    );
    let sender = ast.keyword("tx-sender", Type::Principal);
    let owner = ast.const_decl("owner", sender);
    let supply = ast.uint(1_000_000);
    let gold = ast.fungible_token("gold", Some(supply));
    let badge = ast.nft("badge", Type::Uint);
    let defs: [NodeId; 6] = [counter, balances, meta, owner, gold, badge];
    for def in defs {
        ast.push_definition(def);
    }
    ast
}

fn trait_argument() -> Ast {
    let mut ast = Ast::new();
    let t = ast.arg("t", Type::Trait(TraitTarget::Principal(".token.sip-010".to_string())));
    let yes = ast.bool_lit(true);
    let ok = ast.call("ok", vec![yes]);
    let r = ast.ret(ok);
    let f = ast.function(Public, "transfer", vec![t], vec![r]);
    ast.push_definition(f);
    ast
}

fn trait_definition() -> Ast {
    let mut ast = Ast::new();
    let who = ast.arg("who", Type::Principal);
    let amount = ast.arg("amount", Type::Uint);
    let mint = ast.extern_func(
        Public,
        "mint",
        vec![who, amount],
        Type::response(Some(Type::Bool), Some(Type::Uint)),
    );
    let tr = ast.trait_def("can-mint", vec![mint]);
    ast.push_definition(tr);
    ast
}

fn literals() -> Ast {
    let mut ast = Ast::new();
    let items = vec![ast.int(-3), ast.int(4)];
    let list = ast.list(items);
    let c1 = ast.const_decl("numbers", list);
    let text = ast.string("caf\u{e9}");
    let c2 = ast.const_decl("greeting", text);
    let name = ast.ascii("crystal");
    let c3 = ast.const_decl("name", name);
    let bytes = ast.buff(&[0xde, 0xad]);
    let c4 = ast.const_decl("tag", bytes);
    let vault = ast.principal(".vault");
    let c5 = ast.const_decl("vault", vault);
    let (a, b) = (ast.uint(1), ast.bool_lit(false));
    let rec = ast.record(vec![("id", a), ("done", b)]);
    let c6 = ast.const_decl("entry", rec);
    for def in [c1, c2, c3, c4, c5, c6] {
        ast.push_definition(def);
    }
    ast
}

#[test]
fn clarity_snapshot_corpus() {
    let cases: [(&str, fn() -> Ast); 8] = [
        ("add", add),
        ("early_return", early_return),
        ("hoisted_locals", hoisted_locals),
        ("final_else", final_else),
        ("storage", storage),
        ("trait_argument", trait_argument),
        ("trait_definition", trait_definition),
        ("literals", literals),
    ];

    let mut output = String::new();
    for (name, build) in cases {
        writeln!(&mut output, "## {name}").unwrap();
        output.push_str(&to_clarity(&build()).unwrap());
    }

    assert_snapshot!("clarity_corpus", output);
}
