//! In-place tree rewrites.
//!
//! A rewrite replaces the payload of an arena slot. The slot's handle stays
//! valid, so links held by other nodes see the new payload.

use crystal_types::Type;

use crate::{Ast, Node, NodeId, NodeKind};

impl Ast {
    /// Replace the payload and type of `id`. Line and comments stay.
    pub fn reset(&mut self, id: NodeId, kind: NodeKind, ty: Type) {
        let node = &mut self[id];
        node.kind = kind;
        node.ty = ty;
    }

    /// Turn `id` into a removed statement.
    pub fn make_nop(&mut self, id: NodeId) {
        self.reset(id, NodeKind::Nop, Type::Unknown);
    }

    /// Move the whole node at `id` into a fresh slot, leaving a `Nop`
    /// behind. Returns the new slot.
    pub fn detach(&mut self, id: NodeId) -> NodeId {
        let node = std::mem::take(&mut self[id]);
        let line = node.line;
        let new_id = self.alloc(NodeKind::Nop);
        self[new_id] = node;
        self[id].line = line;
        new_id
    }

    /// Push the current contents of `id` down into a new child and rebuild
    /// `id` around it with `wrap`.
    ///
    /// ```text
    /// x  =>  optional(x)
    /// ```
    pub fn wrap(&mut self, id: NodeId, ty: Type, wrap: impl FnOnce(NodeId) -> NodeKind) -> NodeId {
        let child = self.detach(id);
        let kind = wrap(child);
        self.reset(id, kind, ty);
        child
    }

    /// Replace `id` with its child. The child's slot is left as a `Nop`.
    /// Comments of both nodes are kept, the parent's first.
    pub fn raise_child(&mut self, id: NodeId, child: NodeId) {
        let Node {
            kind,
            ty,
            line,
            comments,
        } = std::mem::take(&mut self[child]);
        let node = &mut self[id];
        node.kind = kind;
        node.ty = ty;
        if line.is_some() {
            node.line = line;
        }
        node.comments.extend(comments);
    }

    /// Replace `old` with `new` wherever `parent` refers to it directly.
    pub fn replace_child(&mut self, parent: NodeId, old: NodeId, new: NodeId) {
        let swap = |slot: &mut NodeId| {
            if *slot == old {
                *slot = new;
            }
        };
        let swap_all = |slots: &mut Vec<NodeId>| slots.iter_mut().for_each(swap);
        match &mut self[parent].kind {
            NodeKind::Body(stmts) => swap_all(stmts),
            NodeKind::Call { callee, args } => {
                swap(callee);
                swap_all(args);
            }
            NodeKind::Chain { operands, .. } => swap_all(operands),
            NodeKind::Unary { a, .. } => swap(a),
            NodeKind::Binary { a, b, .. } => {
                swap(a);
                swap(b);
            }
            NodeKind::Foreach { list, func, .. } => {
                swap(list);
                swap(func);
            }
            NodeKind::ExprIf { cond, a, b } => {
                swap(cond);
                swap(a);
                swap(b);
            }
            NodeKind::Index { expr, key, .. } => {
                if let Some(expr) = expr {
                    swap(expr);
                }
                swap(key);
            }
            NodeKind::Assign { lval, rval, .. } => {
                swap(lval);
                swap(rval);
            }
            NodeKind::CountOf { expr } | NodeKind::TypeOf { expr } => swap(expr),
            NodeKind::Lit(lit) => match lit {
                crate::Lit::List(items) => swap_all(items),
                crate::Lit::Map(fields) => fields.values_mut().for_each(swap),
                _ => {}
            },
            NodeKind::Return { expr } | NodeKind::ImplTrait { expr } => swap(expr),
            NodeKind::VarDecl(decl) => swap(&mut decl.expr),
            _ => {}
        }
    }

    /// Statements after a `return` in the same body can never run; turn
    /// them into `Nop`s. Applies to every function at the top level.
    pub fn remove_unreachable(&mut self) {
        let defs = self.definitions().to_vec();
        for def in defs {
            if let Some(func) = self.func(def) {
                let body = func.body;
                self.remove_unreachable_in(body);
            }
        }
    }

    fn remove_unreachable_in(&mut self, body: NodeId) {
        let mut unreachable = false;
        for stmt in self.stmts(body).to_vec() {
            if unreachable {
                self.make_nop(stmt);
                continue;
            }
            match self.kind(stmt) {
                NodeKind::Return { .. } => unreachable = true,
                NodeKind::Func(def) => {
                    let inner = def.body;
                    self.remove_unreachable_in(inner);
                }
                NodeKind::If(stmt) => {
                    let mut bodies = vec![stmt.body];
                    bodies.extend(stmt.elsif.iter().map(|e| e.body));
                    bodies.extend(stmt.else_body);
                    for inner in bodies {
                        self.remove_unreachable_in(inner);
                    }
                }
                _ => {}
            }
        }
    }

    /// Drop `Nop` statements from every body, the root included.
    pub fn remove_nops(&mut self) {
        let root = self.root();
        self.remove_nops_in(root);
    }

    fn remove_nops_in(&mut self, body: NodeId) {
        let stmts = self.stmts(body).to_vec();
        let mut kept = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            let inner: Vec<NodeId> = match self.kind(stmt) {
                NodeKind::Nop => continue,
                NodeKind::Func(def) => vec![def.body],
                NodeKind::If(s) => {
                    let mut bodies = vec![s.body];
                    bodies.extend(s.elsif.iter().map(|e| e.body));
                    bodies.extend(s.else_body);
                    bodies
                }
                NodeKind::Scope { body, .. } => vec![*body],
                _ => Vec::new(),
            };
            for inner in inner {
                self.remove_nops_in(inner);
            }
            kept.push(stmt);
        }
        *self.stmts_mut(body) = kept;
    }
}
