//! Syntax tree for Crystal.
//!
//! The tree is an arena of [`Node`]s addressed by stable [`NodeId`]
//! handles. Passes rewrite nodes in place by swapping a slot's payload
//! (see [`rewrite`]), so every handle held elsewhere (identifier to
//! declaration links, function references inside types) stays valid.
//!
//! The root node is a statement sequence holding the top-level
//! definitions. Function, conditional and scope bodies are statement
//! sequences too; their node ids double as scope identities.

pub mod build;
pub mod rewrite;

use std::ops::{Index, IndexMut};

use indexmap::IndexMap;

pub use crystal_types::{ExternRef, FuncRef, MapType, NodeId, ResponseType, Size, TraitTarget, Type};

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

/// One tree element: its payload, its type, where it came from, and the
/// source comments attached to it.
#[derive(Debug, Clone, Default)]
pub struct Node {
    pub kind: NodeKind,
    pub ty: Type,
    pub line: Option<u32>,
    pub comments: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub enum NodeKind {
    /// Removed statement.
    #[default]
    Nop,
    /// Statement sequence.
    Body(Vec<NodeId>),
    Lit(Lit),
    Id(Ident),
    Unary { op: UnaryOp, a: NodeId },
    Binary { op: BinOp, a: NodeId, b: NodeId },
    /// `+ - * / && ||`, flattened to any number of operands.
    Chain { op: ChainOp, operands: Vec<NodeId> },
    /// `cond ? a : b`
    ExprIf { cond: NodeId, a: NodeId, b: NodeId },
    /// `expr[key]`, or `expr.key` when `dot` is set. A dot access without
    /// an expression is a relative contract id (`.contract`).
    Index { dot: bool, expr: Option<NodeId>, key: NodeId },
    Call { callee: NodeId, args: Vec<NodeId> },
    /// `foreach(list, func)`. `captured` holds the values of variables an
    /// anonymous body captures, once the body is globalized.
    Foreach { list: NodeId, func: NodeId, captured: Vec<NodeId> },
    Func(FuncDef),
    Arg(Arg),
    VarDecl(VarDecl),
    Persist(Persist),
    TraitDef(TraitDecl),
    ImplTrait { expr: NodeId },
    DeclareExtern(ExternDecl),
    ExternFunc(ExternFunc),
    ExternTraitImpl { impl_contract_id: NodeId },
    Return { expr: NodeId },
    If(IfStmt),
    /// A body run unconditionally, left behind when an `if` folds away.
    Scope { body: NodeId, body_return: Option<Type> },
    Assign { op: AssignOp, lval: NodeId, rval: NodeId },
    Delete { lval: NodeId },
    CountOf { expr: NodeId },
    TypeOf { expr: NodeId },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Lit {
    Int(i128),
    Uint(u128),
    Bool(bool),
    /// Text of a utf8 string, ascii string or principal literal; the node
    /// type says which.
    Str(String),
    Buff(Vec<u8>),
    None,
    /// Emitted verbatim, e.g. `tx-sender` or `block-height`.
    Keyword(String),
    List(Vec<NodeId>),
    Map(IndexMap<String, NodeId>),
    Typedef(Type),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub name: String,
    /// Declaring node, once resolved. Never set for functions or builtins.
    pub decl: Option<NodeId>,
    /// Receiver values bound by dot access, passed as leading arguments.
    pub bind: Vec<NodeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// `!`
    Not,
    /// `~`
    BitNot,
    /// `-x`
    Negate,
    /// `+x`
    Plus,
    /// `#x`: unwrap an optional.
    Unwrap,
    /// `int(x)`
    ToInt,
    /// `uint(x)`
    ToUint,
    /// `principal(x)`
    ToPrincipal,
    /// `optional(x)`
    Some,
}

impl UnaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
            UnaryOp::Negate => "sign-",
            UnaryOp::Plus => "sign+",
            UnaryOp::Unwrap => "#",
            UnaryOp::ToInt => "int",
            UnaryOp::ToUint => "uint",
            UnaryOp::ToPrincipal => "principal",
            UnaryOp::Some => "optional",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    Shl,
    Shr,
    BitXor,
    BitAnd,
    BitOr,
    Mod,
    Pow,
}

impl BinOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::BitXor => "^",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainOp {
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
}

impl ChainOp {
    pub fn as_str(self) -> &'static str {
        match self {
            ChainOp::Add => "+",
            ChainOp::Sub => "-",
            ChainOp::Mul => "*",
            ChainOp::Div => "/",
            ChainOp::And => "&&",
            ChainOp::Or => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssignOp {
    /// `=`
    Set,
    /// `?=`: insert only when absent.
    Insert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Visibility {
    Public,
    ReadOnly,
    #[default]
    Private,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::ReadOnly => "read-only",
            Visibility::Private => "private",
        }
    }

    pub fn is_external(self) -> bool {
        !matches!(self, Visibility::Private)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FuncDef {
    /// `None` for anonymous functions until they are globalized.
    pub name: Option<String>,
    pub vis: Visibility,
    pub args: Vec<NodeId>,
    pub body: NodeId,
    /// Set for anonymous function expressions, also after globalization.
    pub anon: bool,
    /// Top-level name an inner function will get.
    pub globalized_name: Option<String>,
    pub globalized: bool,
    pub uses_closure: bool,
    /// The trait declaration this function implements a member of.
    pub trait_def: Option<NodeId>,
    /// Maximum size of the list an anonymous foreach body iterates.
    pub foreach_list_size: Option<Size>,
    /// Imported file the definition came from.
    pub import_path: Option<String>,
}

impl FuncDef {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("anonymous function")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arg {
    pub name: String,
    /// For captured variables: the name the value has in the enclosing scope.
    pub closure: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protect {
    Const,
    Mutable,
}

#[derive(Debug, Clone)]
pub struct VarDecl {
    pub id: String,
    pub protect: Protect,
    pub expr: NodeId,
}

#[derive(Debug, Clone)]
pub struct Persist {
    pub id: String,
    pub kind: PersistKind,
}

/// Persistent storage. The node type carries the declared value type, the
/// `DataMap` key and value types, or the `Nft` token type.
#[derive(Debug, Clone)]
pub enum PersistKind {
    DataVar { initial: NodeId },
    DataMap,
    Ft { total_supply: Option<NodeId> },
    Nft,
}

impl PersistKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersistKind::DataVar { .. } => "datavar",
            PersistKind::DataMap => "datamap",
            PersistKind::Ft { .. } => "ft",
            PersistKind::Nft => "nft",
        }
    }
}

/// A trait: a set of member function signatures. Imported traits belong to
/// an extern declaration and know their contract.
#[derive(Debug, Clone)]
pub struct TraitDecl {
    pub id: String,
    pub members: Vec<NodeId>,
    pub contract_id: Option<NodeId>,
    pub external: bool,
}

/// Declaration-only view of another contract.
#[derive(Debug, Clone)]
pub struct ExternDecl {
    /// Alias the contract is referred to by.
    pub id: Option<String>,
    pub contract_id: Option<NodeId>,
    /// Member functions, traits and trait implementations.
    pub defs: Vec<NodeId>,
    pub import_path: Option<String>,
}

/// Signature of a function in another contract or in a trait. The node type
/// is the return type.
#[derive(Debug, Clone)]
pub struct ExternFunc {
    pub name: String,
    pub vis: Visibility,
    pub args: Vec<NodeId>,
    pub contract_id: Option<NodeId>,
    /// Trait members: whether some function implements it.
    pub implemented: bool,
}

#[derive(Debug, Clone, Default)]
pub struct IfStmt {
    pub cond: NodeId,
    pub body: NodeId,
    pub elsif: Vec<ElseIf>,
    pub else_body: Option<NodeId>,
    /// Set when every path through the body returns.
    pub body_return: Option<Type>,
    pub else_return: Option<Type>,
}

#[derive(Debug, Clone)]
pub struct ElseIf {
    pub cond: NodeId,
    pub body: NodeId,
    pub body_return: Option<Type>,
}

// ---------------------------------------------------------------------------
// Arena
// ---------------------------------------------------------------------------

/// The tree arena.
#[derive(Debug, Clone)]
pub struct Ast {
    nodes: Vec<Node>,
    root: NodeId,
    /// Line given to newly allocated nodes.
    line_cursor: Option<u32>,
}

impl Default for Ast {
    fn default() -> Self {
        Self::new()
    }
}

impl Ast {
    pub fn new() -> Self {
        let root = Node {
            kind: NodeKind::Body(Vec::new()),
            ..Node::default()
        };
        Self {
            nodes: vec![root],
            root: NodeId(0),
            line_cursor: None,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions().is_empty()
    }

    pub fn alloc(&mut self, kind: NodeKind) -> NodeId {
        self.alloc_typed(kind, Type::Unknown)
    }

    pub fn alloc_typed(&mut self, kind: NodeKind, ty: Type) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind,
            ty,
            line: self.line_cursor,
            comments: Vec::new(),
        });
        id
    }

    /// Line given to every node allocated from now on.
    pub fn set_line(&mut self, line: u32) {
        self.line_cursor = Some(line);
    }

    pub fn clear_line(&mut self) {
        self.line_cursor = None;
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self[id].kind
    }

    pub fn kind_mut(&mut self, id: NodeId) -> &mut NodeKind {
        &mut self[id].kind
    }

    pub fn ty(&self, id: NodeId) -> &Type {
        &self[id].ty
    }

    pub fn set_ty(&mut self, id: NodeId, ty: Type) {
        self[id].ty = ty;
    }

    pub fn line(&self, id: NodeId) -> Option<u32> {
        self[id].line
    }

    pub fn add_comment(&mut self, id: NodeId, text: impl Into<String>) {
        self[id].comments.push(text.into());
    }

    /// Top-level definitions, in order.
    pub fn definitions(&self) -> &[NodeId] {
        self.stmts(self.root)
    }

    pub fn push_definition(&mut self, def: NodeId) {
        let root = self.root;
        self.stmts_mut(root).push(def);
    }

    /// Statements of a body node; empty for anything else.
    pub fn stmts(&self, body: NodeId) -> &[NodeId] {
        match &self[body].kind {
            NodeKind::Body(stmts) => stmts,
            _ => &[],
        }
    }

    /// Statements of a body node. Turns a non-body node into an empty body.
    pub fn stmts_mut(&mut self, body: NodeId) -> &mut Vec<NodeId> {
        let node = &mut self[body];
        if !matches!(node.kind, NodeKind::Body(_)) {
            node.kind = NodeKind::Body(Vec::new());
        }
        match &mut node.kind {
            NodeKind::Body(stmts) => stmts,
            _ => unreachable!("node was just made a body"),
        }
    }

    pub fn func(&self, id: NodeId) -> Option<&FuncDef> {
        match &self[id].kind {
            NodeKind::Func(def) => Some(def),
            _ => None,
        }
    }

    pub fn func_mut(&mut self, id: NodeId) -> Option<&mut FuncDef> {
        match &mut self[id].kind {
            NodeKind::Func(def) => Some(def),
            _ => None,
        }
    }

    pub fn ident(&self, id: NodeId) -> Option<&Ident> {
        match &self[id].kind {
            NodeKind::Id(ident) => Some(ident),
            _ => None,
        }
    }

    pub fn lit(&self, id: NodeId) -> Option<&Lit> {
        match &self[id].kind {
            NodeKind::Lit(lit) => Some(lit),
            _ => None,
        }
    }

    pub fn is_lit(&self, id: NodeId) -> bool {
        matches!(self[id].kind, NodeKind::Lit(_))
    }

    /// Value of a literal boolean node.
    pub fn lit_bool(&self, id: NodeId) -> Option<bool> {
        match self.lit(id) {
            Some(Lit::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// Text of a string-like literal (strings, principals, keywords).
    pub fn lit_text(&self, id: NodeId) -> Option<&str> {
        match self.lit(id) {
            Some(Lit::Str(s)) | Some(Lit::Keyword(s)) => Some(s),
            _ => None,
        }
    }

    /// Name of the declaration an identifier, var or function node stands for.
    pub fn decl_name(&self, id: NodeId) -> Option<&str> {
        match &self[id].kind {
            NodeKind::Id(ident) => Some(&ident.name),
            NodeKind::Func(def) => def.name.as_deref(),
            NodeKind::Arg(arg) => Some(&arg.name),
            NodeKind::VarDecl(decl) => Some(&decl.id),
            NodeKind::Persist(p) => Some(&p.id),
            NodeKind::TraitDef(t) => Some(&t.id),
            NodeKind::DeclareExtern(e) => e.id.as_deref(),
            NodeKind::ExternFunc(f) => Some(&f.name),
            _ => None,
        }
    }

    /// Short description of a declaration for messages, e.g. `const`.
    pub fn describe(&self, id: NodeId) -> &'static str {
        match &self[id].kind {
            NodeKind::VarDecl(decl) => match decl.protect {
                Protect::Const => "const",
                Protect::Mutable => "var",
            },
            NodeKind::Func(_) => "function",
            NodeKind::Persist(p) => p.kind.as_str(),
            NodeKind::TraitDef(_) => "trait",
            NodeKind::DeclareExtern(_) => "extern",
            NodeKind::ExternFunc(_) => "extern function",
            NodeKind::Arg(_) => "argument",
            _ => "declaration",
        }
    }

    /// Direct children in source order. Declaration links and types are
    /// not followed.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        match &self[id].kind {
            NodeKind::Nop | NodeKind::Arg(_) => {}
            NodeKind::Body(stmts) => out.extend(stmts),
            NodeKind::Lit(Lit::List(items)) => out.extend(items),
            NodeKind::Lit(Lit::Map(fields)) => out.extend(fields.values()),
            NodeKind::Lit(_) => {}
            NodeKind::Id(ident) => out.extend(&ident.bind),
            NodeKind::Unary { a, .. } => out.push(*a),
            NodeKind::Binary { a, b, .. } => out.extend([*a, *b]),
            NodeKind::Chain { operands, .. } => out.extend(operands),
            NodeKind::ExprIf { cond, a, b } => out.extend([*cond, *a, *b]),
            NodeKind::Index { expr, key, .. } => {
                out.extend(expr);
                out.push(*key);
            }
            NodeKind::Call { callee, args } => {
                out.push(*callee);
                out.extend(args);
            }
            NodeKind::Foreach { list, func, captured } => {
                out.extend([*list, *func]);
                out.extend(captured);
            }
            NodeKind::Func(def) => {
                out.extend(&def.args);
                out.push(def.body);
            }
            NodeKind::VarDecl(decl) => out.push(decl.expr),
            NodeKind::Persist(p) => match &p.kind {
                PersistKind::DataVar { initial } => out.push(*initial),
                PersistKind::Ft { total_supply } => out.extend(total_supply),
                PersistKind::DataMap | PersistKind::Nft => {}
            },
            NodeKind::TraitDef(t) => out.extend(&t.members),
            NodeKind::ImplTrait { expr } => out.push(*expr),
            NodeKind::DeclareExtern(e) => {
                out.extend(e.contract_id);
                out.extend(&e.defs);
            }
            NodeKind::ExternFunc(f) => out.extend(&f.args),
            NodeKind::ExternTraitImpl { impl_contract_id } => out.push(*impl_contract_id),
            NodeKind::Return { expr } => out.push(*expr),
            NodeKind::If(stmt) => {
                out.push(stmt.cond);
                out.push(stmt.body);
                for elsif in &stmt.elsif {
                    out.push(elsif.cond);
                    out.push(elsif.body);
                }
                out.extend(stmt.else_body);
            }
            NodeKind::Scope { body, .. } => out.push(*body),
            NodeKind::Assign { lval, rval, .. } => out.extend([*lval, *rval]),
            NodeKind::Delete { lval } => out.push(*lval),
            NodeKind::CountOf { expr } | NodeKind::TypeOf { expr } => out.push(*expr),
        }
        out
    }

    /// Visit the descendants of `id` in pre-order. The callback returns
    /// whether to descend into the visited node.
    pub fn walk(&self, id: NodeId, f: &mut dyn FnMut(NodeId) -> bool) {
        for child in self.children(id) {
            if f(child) {
                self.walk(child, f);
            }
        }
    }

    /// Like [`Ast::walk`], but visits `id` itself first.
    pub fn walk_from(&self, id: NodeId, f: &mut dyn FnMut(NodeId) -> bool) {
        if f(id) {
            self.walk(id, f);
        }
    }

    /// First `return` statement under `id`, not looking into nested functions.
    pub fn find_first_return(&self, id: NodeId) -> Option<NodeId> {
        let mut found = None;
        self.walk(id, &mut |n| {
            if found.is_some() {
                return false;
            }
            match self.kind(n) {
                NodeKind::Return { .. } => {
                    found = Some(n);
                    false
                }
                NodeKind::Func(_) => false,
                _ => true,
            }
        });
        found
    }
}

impl Index<NodeId> for Ast {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }
}

impl IndexMut<NodeId> for Ast {
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }
}
