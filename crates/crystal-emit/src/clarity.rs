//! Tree to Clarity translation.
//!
//! Clarity has no statements and no early return, so statement sequences
//! are restructured into expressions:
//!
//! - local declarations are hoisted into one `let` around the rest;
//! - several statements are wrapped in `begin`;
//! - an `if` is `(and test body... true)` with `elsif`/`else` as further
//!   `or` alternatives, and only the `else` of a final `if` becomes the
//!   trailing value;
//! - a `return` that is not the last statement of its function becomes
//!   `(asserts! false value)`.

use indexmap::IndexMap;
use tracing::debug;

use crystal_ast::{
    AssignOp, Ast, BinOp, ChainOp, FuncDef, Ident, IfStmt, Lit, NodeId, NodeKind, Persist, PersistKind, TraitDecl,
    UnaryOp,
};
use crystal_diag::{Category, Diagnostic};
use crystal_types::{MapType, Size, Type};

use crate::format::Sexp;

type Result<T> = std::result::Result<T, Diagnostic>;

/// Emit Clarity for a lowered tree, in chunks: the `use-trait` lines, then
/// one chunk per top-level definition.
pub fn emit(ast: &Ast, out: &mut dyn FnMut(&str)) -> Result<()> {
    let emitter = Emitter::new(ast);
    debug!(
        definitions = ast.definitions().len(),
        traits = emitter.traits.len(),
        "emitting clarity"
    );

    for (contract_id, name) in &emitter.traits {
        let use_trait = Sexp::form("use-trait", [Sexp::atom(name), Sexp::atom(principal(contract_id))]);
        out(&format!("{use_trait}\n"));
    }
    if !emitter.traits.is_empty() {
        out("\n");
    }

    for &def in ast.definitions() {
        if let Some(sexp) = emitter.definition(def)? {
            out(&format!("{sexp}\n\n"));
        }
    }
    Ok(())
}

/// [`emit`] collected into one string.
pub fn to_clarity(ast: &Ast) -> Result<String> {
    let mut text = String::new();
    emit(ast, &mut |chunk| text.push_str(chunk))?;
    Ok(text)
}

struct Emitter<'a> {
    ast: &'a Ast,
    /// Trait contract id to the name its `use-trait` binds.
    traits: IndexMap<String, String>,
}

impl<'a> Emitter<'a> {
    fn new(ast: &'a Ast) -> Self {
        let mut traits = IndexMap::new();
        for &def in ast.definitions() {
            let funcs = match ast.kind(def) {
                NodeKind::Func(_) => vec![def],
                NodeKind::TraitDef(t) => t.members.clone(),
                _ => continue,
            };
            for func in funcs {
                let args = match ast.kind(func) {
                    NodeKind::Func(f) => &f.args,
                    NodeKind::ExternFunc(f) => &f.args,
                    _ => continue,
                };
                for &arg in args {
                    if let Type::Trait(target) = ast.ty(arg)
                        && let Some(contract_id) = target.contract_id()
                    {
                        traits
                            .entry(contract_id.to_string())
                            .or_insert_with(|| trait_alias(contract_id));
                    }
                }
            }
        }
        Self { ast, traits }
    }

    // -- definitions ----------------------------------------------------------

    fn definition(&self, def: NodeId) -> Result<Option<Sexp>> {
        let sexp = match self.ast.kind(def) {
            NodeKind::Func(f) => self.function(f)?,
            NodeKind::VarDecl(v) => Sexp::form("define-constant", [Sexp::atom(&v.id), self.expr(v.expr)?]),
            NodeKind::Persist(p) => self.persist(def, p)?,
            NodeKind::TraitDef(t) => self.trait_def(t)?,
            NodeKind::ImplTrait { expr } => Sexp::form("impl-trait", [self.expr(*expr)?]),
            NodeKind::DeclareExtern(_) | NodeKind::Nop => return Ok(None),
            _ => return Err(self.unexpected(def, "definition")),
        };
        Ok(Some(sexp.with_comments(&self.ast[def].comments)))
    }

    fn function(&self, f: &FuncDef) -> Result<Sexp> {
        let name = f
            .name
            .as_deref()
            .ok_or_else(|| Diagnostic::internal("function without a name"))?;
        let mut signature = vec![Sexp::atom(name)];
        for &arg in &f.args {
            let NodeKind::Arg(a) = self.ast.kind(arg) else {
                return Err(self.unexpected(arg, "argument"));
            };
            signature.push(
                Sexp::list(vec![Sexp::atom(&a.name), self.typedef(self.ast.ty(arg))?])
                    .with_comments(&self.ast[arg].comments),
            );
        }
        Ok(Sexp::form(
            &format!("define-{}", f.vis.as_str()),
            [Sexp::list(signature), self.body(true, f.body)?.nl_at(3)],
        ))
    }

    fn persist(&self, def: NodeId, p: &Persist) -> Result<Sexp> {
        let name = Sexp::atom(&p.id);
        Ok(match (&p.kind, self.ast.ty(def)) {
            (PersistKind::DataVar { initial }, ty) => Sexp::form(
                "define-data-var",
                [name, self.typedef(ty)?, self.expr(*initial)?],
            ),
            (PersistKind::DataMap, Type::DataMap(key, value)) => Sexp::form(
                "define-map",
                [name, self.typedef(key)?, self.typedef(value)?],
            ),
            (PersistKind::Ft { total_supply }, _) => {
                let mut items = vec![name];
                if let Some(supply) = total_supply {
                    items.push(self.expr(*supply)?);
                }
                Sexp::form("define-fungible-token", items)
            }
            (PersistKind::Nft, Type::Nft(token)) => {
                Sexp::form("define-non-fungible-token", [name, self.typedef(token)?])
            }
            _ => return Err(self.unexpected(def, "storage declaration")),
        })
    }

    fn trait_def(&self, t: &TraitDecl) -> Result<Sexp> {
        let mut members = Vec::with_capacity(t.members.len());
        for &member in &t.members {
            let NodeKind::ExternFunc(f) = self.ast.kind(member) else {
                return Err(self.unexpected(member, "trait member"));
            };
            let args = f
                .args
                .iter()
                .map(|&a| self.typedef(self.ast.ty(a)))
                .collect::<Result<Vec<_>>>()?;
            members.push(
                Sexp::list(vec![
                    Sexp::atom(&f.name),
                    Sexp::list(args).nl(),
                    self.typedef(self.ast.ty(member))?.nl(),
                ])
                .nl_at(-2),
            );
        }
        Ok(Sexp::form("define-trait", [Sexp::atom(&t.id), Sexp::list(members)]))
    }

    // -- statement sequences -------------------------------------------------

    /// `last`: whether the sequence ends its function, so a trailing
    /// `return` is the function's value.
    fn body(&self, last: bool, body: NodeId) -> Result<Sexp> {
        let stmts = self.ast.stmts(body);
        let mut output = Vec::new();
        let mut vars = Vec::new();

        for (idx, &stmt) in stmts.iter().enumerate() {
            let is_last = last && idx + 1 == stmts.len();
            let comments = &self.ast[stmt].comments;
            match self.ast.kind(stmt) {
                NodeKind::VarDecl(v) => {
                    vars.push(Sexp::list(vec![Sexp::atom(&v.id), self.expr(v.expr)?]).with_comments(comments));
                }
                NodeKind::Scope { body, .. } => output.push(self.body(is_last, *body)?),
                NodeKind::If(s) => self.if_stmt(stmt, s, is_last, &mut output)?,
                NodeKind::Return { expr } if is_last => {
                    let mut value = self.expr(*expr)?;
                    value.prepend_comments(comments.clone());
                    output.push(value);
                }
                NodeKind::Return { expr } => {
                    output.push(
                        Sexp::form("asserts!", [Sexp::atom("false"), self.expr(*expr)?]).with_comments(comments),
                    );
                }
                NodeKind::Nop => {}
                _ => output.push(self.expr(stmt)?),
            }
        }

        for item in &mut output {
            item.set_nl(None);
        }

        if !vars.is_empty() {
            for var in vars.iter_mut().skip(1) {
                var.set_nl(None);
            }
            let mut items = vec![Sexp::atom("let"), Sexp::list(vars)];
            items.extend(output);
            return Ok(Sexp::list(items).nl());
        }

        match output.len() {
            0 => Err(Diagnostic::error(Category::NotSupported, "empty statement blocks are not supported")
                .at_line(self.ast.line(body))),
            1 => Ok(output.remove(0)),
            _ => {
                output[0].set_nl(Some(3));
                let comments = output[0].take_comments();
                let mut begin = Sexp::form("begin", output).nl_at(3);
                begin.prepend_comments(comments);
                Ok(begin)
            }
        }
    }

    fn if_stmt(&self, stmt: NodeId, s: &IfStmt, is_last: bool, output: &mut Vec<Sexp>) -> Result<()> {
        let mut branches = vec![
            Sexp::form("and", [self.expr(s.cond)?, self.true_body(s.body)?.nl_at(5)])
                .with_comments(&self.ast[stmt].comments),
        ];
        for elsif in &s.elsif {
            branches.push(Sexp::form("and", [self.expr(elsif.cond)?, self.true_body(elsif.body)?]).nl());
        }

        let mut final_else = None;
        if let Some(else_body) = s.else_body {
            if is_last {
                final_else = Some(self.body(true, else_body)?.nl());
            } else {
                branches.push(self.true_body(else_body)?);
            }
        }

        if branches.len() > 1 {
            output.push(Sexp::form("or", branches));
        } else {
            output.extend(branches);
        }
        if let Some(value) = final_else {
            if value.is_form("begin", false) {
                output.extend(value.into_items().into_iter().skip(1));
            } else {
                output.push(value);
            }
        }
        Ok(())
    }

    /// A branch body that evaluates to `true` unless it aborts.
    fn true_body(&self, body: NodeId) -> Result<Sexp> {
        let mut b = self.body(false, body)?;
        let mut head = b.head();
        if matches!(head, Some("let" | "begin")) {
            head = b.items().last().and_then(Sexp::head);
        }
        if head == Some("asserts!") {
            return Ok(b.nl());
        }
        if b.is_list() && self.ast.stmts(body).len() > 1 {
            b.push(Sexp::atom("true").nl());
            return Ok(b.nl());
        }
        Ok(Sexp::form("begin", [b.nl_at(3), Sexp::atom("true").nl()]).nl_at(3))
    }

    // -- expressions ---------------------------------------------------------

    fn expr(&self, id: NodeId) -> Result<Sexp> {
        let sexp = match self.ast.kind(id) {
            NodeKind::Lit(lit) => self.lit(id, lit)?,
            NodeKind::Id(ident) => self.ident(id, ident)?,
            NodeKind::Unary { op, a } => self.unary(id, *op, *a)?,
            NodeKind::Binary { op, a, b } => self.binary(*op, *a, *b)?,
            NodeKind::Chain { op, operands } => self.chain(id, *op, operands)?,
            NodeKind::ExprIf { cond, a, b } => {
                Sexp::form("if", [self.expr(*cond)?, self.expr(*a)?, self.expr(*b)?])
            }
            NodeKind::Index { expr, key, .. } => self.index(id, *expr, *key)?,
            NodeKind::Call { callee, args } => self.call(*callee, args)?,
            NodeKind::Assign { op, lval, rval } => self.assign(*op, *lval, *rval)?,
            NodeKind::Delete { lval } => match self.ast.kind(*lval) {
                NodeKind::Index { expr: Some(map), key, .. } => {
                    Sexp::form("map-delete", [self.expr(*map)?, self.expr(*key)?])
                }
                _ => return Err(self.unexpected(*lval, "delete target")),
            },
            _ => return Err(self.unexpected(id, "expression")),
        };
        Ok(sexp.with_comments(&self.ast[id].comments))
    }

    fn lit(&self, id: NodeId, lit: &Lit) -> Result<Sexp> {
        Ok(match lit {
            Lit::Keyword(word) => Sexp::atom(word),
            Lit::None => Sexp::atom("none"),
            Lit::Int(v) => Sexp::atom(v.to_string()),
            Lit::Uint(v) => Sexp::atom(format!("u{v}")),
            Lit::Bool(v) => Sexp::atom(v.to_string()),
            Lit::Buff(bytes) => Sexp::atom(format!("0x{}", hex(bytes))),
            Lit::Str(text) => match self.ast.ty(id) {
                Type::Principal => Sexp::atom(principal(text)),
                Type::StringAscii(_) => Sexp::atom(quote(text, false)),
                _ => Sexp::atom(format!("u{}", quote(text, true))),
            },
            Lit::List(items) => Sexp::form(
                "list",
                items.iter().map(|&item| self.expr(item)).collect::<Result<Vec<_>>>()?,
            ),
            Lit::Map(fields) => {
                let fields = fields
                    .iter()
                    .map(|(key, &value)| Ok(format!("{key}: {}", self.expr(value)?)))
                    .collect::<Result<Vec<_>>>()?;
                Sexp::atom(format!("{{{}}}", fields.join(", ")))
            }
            Lit::Typedef(ty) => self.typedef(ty)?,
        })
    }

    fn ident(&self, id: NodeId, ident: &Ident) -> Result<Sexp> {
        if let Some(decl) = ident.decl {
            match self.ast.kind(decl) {
                NodeKind::Persist(Persist {
                    kind: PersistKind::DataVar { .. },
                    ..
                }) => return Ok(Sexp::form("var-get", [Sexp::atom(&ident.name)])),
                NodeKind::DeclareExtern(ext) => {
                    let contract_id = ext
                        .contract_id
                        .and_then(|c| self.ast.lit_text(c))
                        .ok_or_else(|| Diagnostic::internal(format!("extern '{}' has no contract id", ident.name)))?;
                    return Ok(Sexp::atom(principal(contract_id)));
                }
                _ => {}
            }
        }
        Ok(Sexp::atom(self.function_name(id).unwrap_or(ident.name.as_str())))
    }

    /// Current name of the function a reference points to. Globalization
    /// renames definitions, not every reference.
    fn function_name(&self, id: NodeId) -> Option<&str> {
        match self.ast.ty(id) {
            Type::Func(fref) => self.ast.func(fref.def).and_then(|f| f.name.as_deref()),
            _ => None,
        }
    }

    fn unary(&self, id: NodeId, op: UnaryOp, a: NodeId) -> Result<Sexp> {
        let name = match op {
            UnaryOp::Not => "not",
            UnaryOp::BitNot => "bit-not",
            UnaryOp::Negate => "-",
            UnaryOp::ToInt => "to-int",
            UnaryOp::ToUint => "to-uint",
            UnaryOp::Some => "some",
            UnaryOp::Plus => return self.expr(a),
            UnaryOp::Unwrap | UnaryOp::ToPrincipal => {
                return Err(self.unexpected(id, &format!("operator '{}'", op.as_str())));
            }
        };
        Ok(Sexp::form(name, [self.expr(a)?]))
    }

    fn binary(&self, op: BinOp, a: NodeId, b: NodeId) -> Result<Sexp> {
        let name = match op {
            BinOp::Eq => return self.equality(a, b),
            BinOp::Ne => return Ok(Sexp::form("not", [self.equality(a, b)?])),
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Shl => "bit-shift-left",
            BinOp::Shr => "bit-shift-right",
            BinOp::BitXor => "xor",
            BinOp::BitAnd => "bit-and",
            BinOp::BitOr => "bit-or",
            BinOp::Mod => "mod",
            BinOp::Pow => "pow",
        };
        Ok(Sexp::form(name, [self.expr(a)?, self.expr(b)?]))
    }

    /// Comparing with `none` tests the other side.
    fn equality(&self, a: NodeId, b: NodeId) -> Result<Sexp> {
        if self.ast.ty(b).is_none() {
            return Ok(Sexp::form("is-none", [self.expr(a)?]));
        }
        if self.ast.ty(a).is_none() {
            return Ok(Sexp::form("is-none", [self.expr(b)?]));
        }
        Ok(Sexp::form("is-eq", [self.expr(a)?, self.expr(b)?]))
    }

    fn chain(&self, id: NodeId, op: ChainOp, operands: &[NodeId]) -> Result<Sexp> {
        let mut parts = operands
            .iter()
            .map(|&o| self.expr(o))
            .collect::<Result<Vec<_>>>()?
            .into_iter();
        let name = match op {
            ChainOp::Add if self.ast.ty(id).is_sequence() => {
                // concat takes exactly two sequences.
                let first = parts.next().ok_or_else(|| self.unexpected(id, "empty chain"))?;
                return Ok(parts.fold(first, |acc, next| Sexp::form("concat", [acc, next])));
            }
            ChainOp::Add => "+",
            ChainOp::Sub => "-",
            ChainOp::Mul => "*",
            ChainOp::Div => "/",
            ChainOp::And => "and",
            ChainOp::Or => "or",
        };
        Ok(Sexp::form(name, parts))
    }

    fn index(&self, id: NodeId, expr: Option<NodeId>, key: NodeId) -> Result<Sexp> {
        let Some(expr) = expr else {
            let name = self.ast.lit_text(key).unwrap_or_default();
            return Ok(Sexp::atom(format!(".{name}")));
        };
        if let Type::TraitDef(def) = self.ast.ty(id) {
            return self.trait_principal(*def);
        }
        let receiver_ty = match self.ast.ty(expr) {
            Type::Optional(item) => item.as_ref(),
            other => other,
        };
        let key_is_text = matches!(self.ast.ty(key), Type::String(_) | Type::StringAscii(_));
        match receiver_ty {
            Type::DataMap(..) => Ok(Sexp::form("map-get?", [self.expr(expr)?, self.expr(key)?])),
            Type::Response(_) if key_is_text => match self.ast.lit_text(key) {
                Some("okval") => Ok(Sexp::form("unwrap-panic", [self.expr(expr)?])),
                Some("errval") => Ok(Sexp::form("unwrap-err-panic", [self.expr(expr)?])),
                _ => Err(self.unexpected(id, "response property")),
            },
            Type::Map(_) if key_is_text => {
                let field = self.ast.lit_text(key).unwrap_or_default();
                Ok(Sexp::form("get", [Sexp::atom(field), self.expr(expr)?]))
            }
            Type::List(..) => Ok(Sexp::form(
                "unwrap-panic",
                [Sexp::form("element-at?", [self.expr(expr)?, self.expr(key)?])],
            )),
            _ => Err(self.unexpected(id, "index expression")),
        }
    }

    fn trait_principal(&self, def: NodeId) -> Result<Sexp> {
        let NodeKind::TraitDef(t) = self.ast.kind(def) else {
            return Err(self.unexpected(def, "trait"));
        };
        let contract_id = t
            .contract_id
            .and_then(|c| self.ast.lit_text(c))
            .ok_or_else(|| Diagnostic::internal(format!("trait '{}' has no contract id", t.id)))?;
        Ok(Sexp::atom(principal(&format!("{contract_id}.{}", t.id))))
    }

    fn call(&self, callee: NodeId, args: &[NodeId]) -> Result<Sexp> {
        let name = match (self.function_name(callee), self.ast.ident(callee)) {
            (Some(name), _) => name,
            (None, Some(ident)) => ident.name.as_str(),
            (None, None) => return Err(self.unexpected(callee, "callee")),
        };
        let mut items = vec![Sexp::atom(name)];
        for &arg in args {
            items.push(self.expr(arg)?);
        }
        Ok(Sexp::list(items))
    }

    fn assign(&self, op: AssignOp, lval: NodeId, rval: NodeId) -> Result<Sexp> {
        match self.ast.kind(lval) {
            NodeKind::Id(ident) if op == AssignOp::Set => {
                Ok(Sexp::form("var-set", [Sexp::atom(&ident.name), self.expr(rval)?]))
            }
            NodeKind::Index { expr: Some(map), key, .. } => {
                let name = match op {
                    AssignOp::Set => "map-set",
                    AssignOp::Insert => "map-insert",
                };
                Ok(Sexp::form(name, [self.expr(*map)?, self.expr(*key)?, self.expr(rval)?]))
            }
            _ => Err(self.unexpected(lval, "assignment target")),
        }
    }

    // -- types -----------------------------------------------------------------

    fn typedef(&self, ty: &Type) -> Result<Sexp> {
        let sized = |name: &str, size: &Option<Size>| -> Result<Sexp> {
            let size = size.ok_or_else(|| {
                Diagnostic::error(Category::UndeterminedType, format!("the size of type '{ty}' is not known"))
            })?;
            Ok(Sexp::form(name, [Sexp::atom(size.to_string())]))
        };
        Ok(match ty {
            Type::Int => Sexp::atom("int"),
            Type::Uint => Sexp::atom("uint"),
            Type::Bool => Sexp::atom("bool"),
            Type::Principal => Sexp::atom("principal"),
            Type::List(item, _) if **item == Type::Empty => Sexp::form("list", []),
            Type::List(item, size) => {
                let mut list = sized("list", size)?;
                list.push(self.typedef(item)?);
                list
            }
            Type::Buff(size) => sized("buff", size)?,
            Type::String(size) => sized("string-utf8", size)?,
            Type::StringAscii(size) => sized("string-ascii", size)?,
            Type::Response(r) => {
                // Clarity needs both sides; a missing one mirrors the other.
                let ok = r.ok.as_deref().or(r.err.as_deref());
                let err = r.err.as_deref().or(r.ok.as_deref());
                match (ok, err) {
                    (Some(ok), Some(err)) => Sexp::form("response", [self.typedef(ok)?, self.typedef(err)?]),
                    _ => return Err(no_representation(ty)),
                }
            }
            Type::Map(MapType::Fields(fields)) => {
                let fields = fields
                    .iter()
                    .map(|(key, field)| Ok(format!("{key}: {}", self.typedef(field)?)))
                    .collect::<Result<Vec<_>>>()?;
                Sexp::atom(format!("{{{}}}", fields.join(", ")))
            }
            Type::Optional(item) => Sexp::form("optional", [self.typedef(item)?]),
            Type::Trait(target) => {
                let name = target
                    .contract_id()
                    .and_then(|cid| self.traits.get(cid))
                    .ok_or_else(|| Diagnostic::internal(format!("no use-trait name for '{ty}'")))?;
                Sexp::atom(format!("<{name}>"))
            }
            _ => return Err(no_representation(ty)),
        })
    }

    fn unexpected(&self, id: NodeId, what: &str) -> Diagnostic {
        Diagnostic::internal(format!("unhandled {what} '{}'", self.ast.describe(id))).at_line(self.ast.line(id))
    }
}

fn no_representation(ty: &Type) -> Diagnostic {
    Diagnostic::error(
        Category::UndeterminedType,
        format!("type '{ty}' has no clarity representation"),
    )
}

/// `use-trait` name of a trait contract id: dots become dashes.
fn trait_alias(contract_id: &str) -> String {
    let name = contract_id.replace('.', "-");
    name.strip_prefix('-').unwrap_or(&name).to_string()
}

/// Relative contract ids are written as is, everything else with the
/// principal quote.
fn principal(text: &str) -> String {
    if text.starts_with('.') {
        text.to_string()
    } else {
        format!("'{text}")
    }
}

fn quote(text: &str, utf8: bool) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if utf8 && !c.is_ascii() => out.push_str(&format!("\\u{{{:x}}}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trait_aliases_drop_the_leading_dash() {
        assert_eq!(trait_alias(".token.sip-010"), "token-sip-010");
        assert_eq!(trait_alias("SP3FBR2AGK5H9QBDH3EEN6DF8EK8JY7RX8QJ5SVTE.token.sip-010"), "SP3FBR2AGK5H9QBDH3EEN6DF8EK8JY7RX8QJ5SVTE-token-sip-010");
    }

    #[test]
    fn principals_are_quoted_unless_relative() {
        assert_eq!(principal(".vault"), ".vault");
        assert_eq!(principal("ST1PQHQKV0RJXZFY1DGX8MNSNYVE3VGZJSRTPGZGM"), "'ST1PQHQKV0RJXZFY1DGX8MNSNYVE3VGZJSRTPGZGM");
    }

    #[test]
    fn strings_are_escaped() {
        assert_eq!(quote("say \"hi\"", false), "\"say \\\"hi\\\"\"");
        assert_eq!(quote("caf\u{e9}", true), "\"caf\\u{e9}\"");
        assert_eq!(hex(&[0, 171, 255]), "00abff");
    }
}
