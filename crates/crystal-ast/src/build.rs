//! Constructors for tree nodes.
//!
//! The parser front end and the tests build trees through these. Nodes
//! take the line last given to [`Ast::set_line`].

use indexmap::IndexMap;

use crate::{
    Arg, AssignOp, Ast, BinOp, ChainOp, ElseIf, ExternDecl, ExternFunc, ExternRef, FuncDef, Ident, IfStmt,
    Lit, NodeId, NodeKind, Persist, PersistKind, Protect, TraitDecl, Type, UnaryOp, VarDecl,
    Visibility,
};

impl Ast {
    // -- literals -----------------------------------------------------------

    pub fn int(&mut self, v: i128) -> NodeId {
        self.alloc_typed(NodeKind::Lit(Lit::Int(v)), Type::Int)
    }

    pub fn uint(&mut self, v: u128) -> NodeId {
        self.alloc_typed(NodeKind::Lit(Lit::Uint(v)), Type::Uint)
    }

    pub fn bool_lit(&mut self, v: bool) -> NodeId {
        self.alloc_typed(NodeKind::Lit(Lit::Bool(v)), Type::Bool)
    }

    /// UTF-8 string literal.
    pub fn string(&mut self, s: &str) -> NodeId {
        let size = s.chars().count() as u128;
        self.alloc_typed(NodeKind::Lit(Lit::Str(s.to_string())), Type::String(Some(size)))
    }

    /// ASCII string literal.
    pub fn ascii(&mut self, s: &str) -> NodeId {
        let size = s.len() as u128;
        self.alloc_typed(
            NodeKind::Lit(Lit::Str(s.to_string())),
            Type::StringAscii(Some(size)),
        )
    }

    pub fn principal(&mut self, s: &str) -> NodeId {
        self.alloc_typed(NodeKind::Lit(Lit::Str(s.to_string())), Type::Principal)
    }

    pub fn buff(&mut self, bytes: &[u8]) -> NodeId {
        let size = bytes.len() as u128;
        self.alloc_typed(NodeKind::Lit(Lit::Buff(bytes.to_vec())), Type::Buff(Some(size)))
    }

    pub fn none(&mut self) -> NodeId {
        self.alloc_typed(NodeKind::Lit(Lit::None), Type::None)
    }

    /// A runtime keyword such as `tx-sender`, emitted as written.
    pub fn keyword(&mut self, word: &str, ty: Type) -> NodeId {
        self.alloc_typed(NodeKind::Lit(Lit::Keyword(word.to_string())), ty)
    }

    pub fn list(&mut self, items: Vec<NodeId>) -> NodeId {
        self.alloc(NodeKind::Lit(Lit::List(items)))
    }

    pub fn record(&mut self, fields: Vec<(&str, NodeId)>) -> NodeId {
        let fields: IndexMap<String, NodeId> = fields
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        self.alloc(NodeKind::Lit(Lit::Map(fields)))
    }

    pub fn typedef_lit(&mut self, ty: Type) -> NodeId {
        let node_ty = Type::Typedef(Box::new(ty.clone()));
        self.alloc_typed(NodeKind::Lit(Lit::Typedef(ty)), node_ty)
    }

    // -- expressions --------------------------------------------------------

    pub fn id(&mut self, name: &str) -> NodeId {
        self.alloc(NodeKind::Id(Ident {
            name: name.to_string(),
            decl: None,
            bind: Vec::new(),
        }))
    }

    pub fn unary(&mut self, op: UnaryOp, a: NodeId) -> NodeId {
        self.alloc(NodeKind::Unary { op, a })
    }

    pub fn binary(&mut self, op: BinOp, a: NodeId, b: NodeId) -> NodeId {
        self.alloc(NodeKind::Binary { op, a, b })
    }

    pub fn chain(&mut self, op: ChainOp, a: NodeId, b: NodeId) -> NodeId {
        self.alloc(NodeKind::Chain {
            op,
            operands: vec![a, b],
        })
    }

    pub fn expr_if(&mut self, cond: NodeId, a: NodeId, b: NodeId) -> NodeId {
        self.alloc(NodeKind::ExprIf { cond, a, b })
    }

    /// `expr[key]`
    pub fn index(&mut self, expr: NodeId, key: NodeId) -> NodeId {
        self.alloc(NodeKind::Index {
            dot: false,
            expr: Some(expr),
            key,
        })
    }

    /// `expr.key`, or `.key` without an expression.
    pub fn dot(&mut self, expr: Option<NodeId>, key: &str) -> NodeId {
        let key = self.string(key);
        self.alloc(NodeKind::Index {
            dot: true,
            expr,
            key,
        })
    }

    /// Call of a function named `name`.
    pub fn call(&mut self, name: &str, args: Vec<NodeId>) -> NodeId {
        let callee = self.id(name);
        self.call_expr(callee, args)
    }

    pub fn call_expr(&mut self, callee: NodeId, args: Vec<NodeId>) -> NodeId {
        self.alloc(NodeKind::Call { callee, args })
    }

    pub fn foreach(&mut self, list: NodeId, func: NodeId) -> NodeId {
        self.alloc(NodeKind::Foreach {
            list,
            func,
            captured: Vec::new(),
        })
    }

    pub fn countof(&mut self, expr: NodeId) -> NodeId {
        self.alloc(NodeKind::CountOf { expr })
    }

    pub fn typeof_(&mut self, expr: NodeId) -> NodeId {
        self.alloc(NodeKind::TypeOf { expr })
    }

    // -- statements ---------------------------------------------------------

    pub fn body(&mut self, stmts: Vec<NodeId>) -> NodeId {
        self.alloc(NodeKind::Body(stmts))
    }

    pub fn ret(&mut self, expr: NodeId) -> NodeId {
        self.alloc(NodeKind::Return { expr })
    }

    pub fn const_decl(&mut self, name: &str, expr: NodeId) -> NodeId {
        self.var_decl(name, Protect::Const, expr)
    }

    pub fn var_decl(&mut self, name: &str, protect: Protect, expr: NodeId) -> NodeId {
        self.alloc(NodeKind::VarDecl(VarDecl {
            id: name.to_string(),
            protect,
            expr,
        }))
    }

    pub fn assign(&mut self, op: AssignOp, lval: NodeId, rval: NodeId) -> NodeId {
        self.alloc(NodeKind::Assign { op, lval, rval })
    }

    pub fn delete(&mut self, lval: NodeId) -> NodeId {
        self.alloc(NodeKind::Delete { lval })
    }

    pub fn if_stmt(&mut self, cond: NodeId, body: Vec<NodeId>) -> NodeId {
        let body = self.body(body);
        self.alloc(NodeKind::If(IfStmt {
            cond,
            body,
            ..IfStmt::default()
        }))
    }

    pub fn if_else(&mut self, cond: NodeId, body: Vec<NodeId>, else_body: Vec<NodeId>) -> NodeId {
        let stmt = self.if_stmt(cond, body);
        self.add_else(stmt, else_body);
        stmt
    }

    /// Append an `elsif` branch to an `if` statement.
    pub fn add_elsif(&mut self, stmt: NodeId, cond: NodeId, body: Vec<NodeId>) {
        let body = self.body(body);
        if let NodeKind::If(s) = self.kind_mut(stmt) {
            s.elsif.push(ElseIf {
                cond,
                body,
                body_return: None,
            });
        }
    }

    pub fn add_else(&mut self, stmt: NodeId, else_body: Vec<NodeId>) {
        let body = self.body(else_body);
        if let NodeKind::If(s) = self.kind_mut(stmt) {
            s.else_body = Some(body);
        }
    }

    // -- definitions --------------------------------------------------------

    /// Function argument. Types given as `Unknown` are filled later.
    pub fn arg(&mut self, name: &str, ty: Type) -> NodeId {
        self.alloc_typed(
            NodeKind::Arg(Arg {
                name: name.to_string(),
                closure: None,
            }),
            ty,
        )
    }

    pub fn function(
        &mut self,
        vis: Visibility,
        name: &str,
        args: Vec<NodeId>,
        body: Vec<NodeId>,
    ) -> NodeId {
        let body = self.body(body);
        self.alloc(NodeKind::Func(FuncDef {
            name: Some(name.to_string()),
            vis,
            args,
            body,
            ..FuncDef::default()
        }))
    }

    pub fn anon_func(&mut self, args: Vec<NodeId>, body: Vec<NodeId>) -> NodeId {
        let body = self.body(body);
        self.alloc(NodeKind::Func(FuncDef {
            name: None,
            args,
            body,
            anon: true,
            ..FuncDef::default()
        }))
    }

    pub fn data_var(&mut self, name: &str, ty: Type, initial: NodeId) -> NodeId {
        self.alloc_typed(
            NodeKind::Persist(Persist {
                id: name.to_string(),
                kind: PersistKind::DataVar { initial },
            }),
            ty,
        )
    }

    pub fn data_map(&mut self, name: &str, key: Type, val: Type) -> NodeId {
        self.alloc_typed(
            NodeKind::Persist(Persist {
                id: name.to_string(),
                kind: PersistKind::DataMap,
            }),
            Type::DataMap(Box::new(key), Box::new(val)),
        )
    }

    pub fn fungible_token(&mut self, name: &str, total_supply: Option<NodeId>) -> NodeId {
        self.alloc_typed(
            NodeKind::Persist(Persist {
                id: name.to_string(),
                kind: PersistKind::Ft { total_supply },
            }),
            Type::Ft,
        )
    }

    pub fn nft(&mut self, name: &str, token: Type) -> NodeId {
        self.alloc_typed(
            NodeKind::Persist(Persist {
                id: name.to_string(),
                kind: PersistKind::Nft,
            }),
            Type::Nft(Box::new(token)),
        )
    }

    /// Signature inside a trait or an extern declaration.
    pub fn extern_func(
        &mut self,
        vis: Visibility,
        name: &str,
        args: Vec<NodeId>,
        ret: Type,
    ) -> NodeId {
        self.alloc_typed(
            NodeKind::ExternFunc(ExternFunc {
                name: name.to_string(),
                vis,
                args,
                contract_id: None,
                implemented: false,
            }),
            ret,
        )
    }

    pub fn trait_def(&mut self, name: &str, members: Vec<NodeId>) -> NodeId {
        let id = self.alloc(NodeKind::TraitDef(TraitDecl {
            id: name.to_string(),
            members,
            contract_id: None,
            external: false,
        }));
        self.set_ty(id, Type::TraitDef(id));
        id
    }

    pub fn impl_trait(&mut self, expr: NodeId) -> NodeId {
        self.alloc(NodeKind::ImplTrait { expr })
    }

    pub fn declare_extern(
        &mut self,
        alias: Option<&str>,
        contract_id: Option<NodeId>,
        defs: Vec<NodeId>,
    ) -> NodeId {
        let trait_impls = defs
            .iter()
            .filter_map(|&d| match self.kind(d) {
                NodeKind::ExternTraitImpl { impl_contract_id } => {
                    self.lit_text(*impl_contract_id).map(str::to_string)
                }
                _ => None,
            })
            .collect();
        let id = self.alloc(NodeKind::DeclareExtern(ExternDecl {
            id: alias.map(str::to_string),
            contract_id,
            defs,
            import_path: None,
        }));
        self.set_ty(
            id,
            Type::ExternDecl(ExternRef {
                decl: id,
                alias: alias.unwrap_or_default().to_string(),
                trait_impls,
            }),
        );
        id
    }

    pub fn extern_trait_impl(&mut self, impl_contract_id: NodeId) -> NodeId {
        self.alloc(NodeKind::ExternTraitImpl { impl_contract_id })
    }

    /// Set the line of a single node.
    pub fn at(&mut self, id: NodeId, line: u32) -> NodeId {
        self[id].line = Some(line);
        id
    }
}
