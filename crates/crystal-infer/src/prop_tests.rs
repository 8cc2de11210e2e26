//! Property tests for inference using proptest.
//!
//! Properties:
//!
//! 1. Folding literal arithmetic yields the checked result, and leaves the
//!    expression alone when the result would overflow.
//! 2. A literal written as int adopts uint from a uint sibling when it is
//!    non-negative.
//! 3. Chains of one operator flatten to a single n-ary chain.
//! 4. Inference is deterministic: the same tree types the same way twice.

use proptest::prelude::*;

use crystal_ast::{Ast, BinOp, ChainOp, Lit, NodeId, NodeKind, Visibility};
use crystal_types::Type;

use crate::{InferOptions, determine_types, validate_functions};

fn type_of(ast: &mut Ast, expr: NodeId, optimize: bool) -> Type {
    let ret = ast.ret(expr);
    let f = ast.function(Visibility::Private, "subject", vec![], vec![ret]);
    ast.push_definition(f);
    let order = validate_functions(ast).unwrap();
    determine_types(ast, order, &InferOptions { optimize }, &mut Vec::new(), None).unwrap();
    ast.ty(f).clone()
}

fn arb_op() -> impl Strategy<Value = ChainOp> {
    prop_oneof![
        Just(ChainOp::Add),
        Just(ChainOp::Sub),
        Just(ChainOp::Mul),
        Just(ChainOp::Div),
    ]
}

fn checked(op: ChainOp, a: u128, b: u128) -> Option<u128> {
    match op {
        ChainOp::Add => a.checked_add(b),
        ChainOp::Sub => a.checked_sub(b),
        ChainOp::Mul => a.checked_mul(b),
        ChainOp::Div => a.checked_div(b),
        ChainOp::And | ChainOp::Or => None,
    }
}

proptest! {
    #[test]
    fn uint_arithmetic_folds_to_checked_result(a in any::<u128>(), b in any::<u128>(), op in arb_op()) {
        let mut ast = Ast::new();
        let (x, y) = (ast.uint(a), ast.uint(b));
        let expr = ast.chain(op, x, y);
        let ty = type_of(&mut ast, expr, true);
        prop_assert_eq!(ty, Type::Uint);
        match checked(op, a, b) {
            Some(v) => prop_assert_eq!(ast.lit(expr), Some(&Lit::Uint(v))),
            None => {
                let unfolded = matches!(ast.kind(expr), NodeKind::Chain { .. });
                prop_assert!(unfolded);
            }
        }
    }

    #[test]
    fn non_negative_ints_adopt_uint(a in 0i128..=i128::MAX, b in any::<u128>()) {
        let mut ast = Ast::new();
        let (x, y) = (ast.uint(b), ast.int(a));
        let cmp = ast.binary(BinOp::Lt, x, y);
        prop_assert_eq!(type_of(&mut ast, cmp, true), Type::Bool);
        prop_assert_eq!(ast.ty(y), &Type::Uint);
    }

    #[test]
    fn same_operator_chains_flatten(len in 2usize..8) {
        let mut ast = Ast::new();
        let arg = ast.arg("x", Type::Int);
        let first = ast.id("x");
        let mut expr = first;
        for _ in 1..len {
            let next = ast.id("x");
            expr = ast.chain(ChainOp::Add, expr, next);
        }
        let ret = ast.ret(expr);
        let f = ast.function(Visibility::Private, "sum", vec![arg], vec![ret]);
        ast.push_definition(f);
        let order = validate_functions(&mut ast).unwrap();
        determine_types(&mut ast, order, &InferOptions::default(), &mut Vec::new(), None).unwrap();
        match ast.kind(expr) {
            NodeKind::Chain { op, operands } => {
                prop_assert_eq!(*op, ChainOp::Add);
                prop_assert_eq!(operands.len(), len);
            }
            other => prop_assert!(false, "expected a chain, got {:?}", other),
        }
    }

    #[test]
    fn inference_is_deterministic(values in prop::collection::vec(any::<i64>(), 1..6)) {
        let build = |ast: &mut Ast| {
            let items: Vec<_> = values.iter().map(|&v| ast.int(v as i128)).collect();
            ast.list(items)
        };
        let mut first = Ast::new();
        let a = build(&mut first);
        let mut second = Ast::new();
        let b = build(&mut second);
        prop_assert_eq!(type_of(&mut first, a, true), type_of(&mut second, b, true));
    }
}
