//! Property access (`x.p`) and indexing (`x[k]`).
//!
//! Which properties exist depends on the receiver's type. Properties
//! that map onto a builtin turn the access into a reference to that
//! builtin with the receiver bound as its first argument, so
//! `s.len()` ends up as `len(s)`. List, map, datamap and response value
//! accesses stay index nodes.

use crystal_ast::{Ident, Lit, NodeId, NodeKind};
use crystal_diag::{Category, Diagnostic};
use crystal_types::{FuncRef, TraitTarget, Type, equal_strict};

use crate::coerce::{coerce_literal, unwrap_optional};
use crate::typeck::Infer;

/// A closed table of property names and the builtins they stand for.
macro_rules! properties {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $prop:literal : $builtin:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        enum $name {
            $($variant),+
        }

        impl $name {
            fn parse(prop: &str) -> Option<Self> {
                match prop {
                    $($prop => Some($name::$variant),)+
                    _ => None,
                }
            }

            fn builtin(self) -> &'static str {
                match self {
                    $($name::$variant => $builtin),+
                }
            }

            fn valid() -> String {
                [$($prop),+].join(", ")
            }
        }
    };
}

properties! {
    /// Strings, buffers and lists.
    SeqProp {
        Ascii => "ascii": "_utf8-to-ascii",
        Append => "append": "append",
        Concat => "concat": "concat",
        IndexOf => "indexOf?": "index-of?",
        ReplaceAt => "replaceAt?": "replace-at?",
        Slice => "slice?": "slice?",
        Len => "len": "len",
        ToInt => "toInt?": "string-to-int?",
        ToUint => "toUint?": "string-to-uint?",
    }
}

properties! {
    IntProp {
        ToStringAscii => "toStringAscii": "int-to-ascii",
        ToString => "toString": "int-to-utf8",
    }
}

properties! {
    /// Fungible tokens.
    FtProp {
        GetBalance => "getBalance": "ft-get-balance",
        GetSupply => "getSupply": "ft-get-supply",
        Transfer => "transfer?": "ft-transfer?",
        Mint => "mint?": "ft-mint?",
        Burn => "burn?": "ft-burn?",
    }
}

properties! {
    /// Non-fungible tokens.
    NftProp {
        GetOwner => "getOwner?": "nft-get-owner?",
        Transfer => "transfer?": "nft-transfer?",
        Mint => "mint?": "nft-mint?",
        Burn => "burn?": "nft-burn?",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponseProp {
    OkVal,
    ErrVal,
    IsOk,
    IsErr,
}

impl ResponseProp {
    fn parse(prop: &str) -> Option<Self> {
        match prop {
            "okval" => Some(Self::OkVal),
            "errval" => Some(Self::ErrVal),
            "isok" => Some(Self::IsOk),
            "iserr" => Some(Self::IsErr),
            _ => None,
        }
    }
}

fn unknown_property(prop: &str, valid: Option<String>) -> Diagnostic {
    let message = match valid {
        Some(valid) => format!("operator '.'. unknown property '{prop}'. Valid properties are {valid}"),
        None => format!("operator '.'. unknown property '{prop}'"),
    };
    Diagnostic::error(Category::PropertyNotFound, message)
}

fn literal_key_required(what: &str) -> Diagnostic {
    Diagnostic::error(Category::NotSupported, what.to_string())
}

impl Infer<'_> {
    pub(crate) fn fill_index(&mut self, node: NodeId, scopes: &[NodeId]) -> Result<(), Diagnostic> {
        let NodeKind::Index { dot, expr, key } = self.ast.kind(node).clone() else {
            return Err(Diagnostic::internal("expected an index expression"));
        };
        if let Some(expr) = expr {
            self.fill_expr(expr, scopes)?;
        }

        if dot {
            let key_text = self.ast.lit_text(key).unwrap_or_default().to_string();
            match expr {
                // `.contract` is relative to the deployer.
                None => {
                    self.ast.reset(
                        node,
                        NodeKind::Lit(Lit::Str(format!(".{key_text}"))),
                        Type::Principal,
                    );
                    return Ok(());
                }
                Some(expr) if *self.ast.ty(expr) == Type::Principal => {
                    if let Some(base) = self.ast.lit_text(expr) {
                        let cid = format!("{base}.{key_text}");
                        self.ast
                            .reset(node, NodeKind::Lit(Lit::Str(cid)), Type::Principal);
                        return Ok(());
                    }
                }
                Some(_) => {}
            }
        }

        let Some(expr) = expr else {
            return Err(Diagnostic::internal("index without a receiver"));
        };
        self.fill_expr(key, scopes)?;
        if !self.check(&[expr, key], None)? {
            return Ok(());
        }

        let expr_ty = self.ast.ty(expr).clone();
        let inner = match &expr_ty {
            Type::Optional(item) => (**item).clone(),
            other => other.clone(),
        };
        let operator = if dot { "." } else { "[]" };
        let supported = inner.is_sequence()
            || matches!(
                inner,
                Type::Int
                    | Type::Uint
                    | Type::Map(_)
                    | Type::Response(_)
                    | Type::DataMap(..)
                    | Type::ExternDecl(_)
                    | Type::Trait(_)
                    | Type::TraitDef(_)
                    | Type::Ft
                    | Type::Nft(_)
            );
        if !supported {
            return Err(Diagnostic::error(
                Category::TypeMismatch,
                format!("cannot operate on type '{expr_ty}' with '{operator}'"),
            ));
        }
        coerce_literal(self.ast, key, &Type::Uint);
        unwrap_optional(self.ast, key);
        let key_ty = self.ast.ty(key).clone();
        let key_is_text = matches!(key_ty, Type::String(_) | Type::StringAscii(_));
        let prop = self.ast.lit_text(key).unwrap_or_default().to_string();

        match &inner {
            _ if dot && inner.is_sequence() => self.seq_property(node, expr, &inner, &prop),
            Type::Int | Type::Uint if dot => {
                let p = IntProp::parse(&prop).ok_or_else(|| unknown_property(&prop, Some(IntProp::valid())))?;
                unwrap_optional(self.ast, expr);
                self.bind_property(node, expr, p.builtin());
                Ok(())
            }
            Type::List(item, _) if key_ty == Type::Uint => {
                unwrap_optional(self.ast, expr);
                self.ast.set_ty(node, (**item).clone());
                Ok(())
            }
            Type::Map(_) if key_is_text => self.map_field(node, key, &expr_ty, &inner),
            Type::DataMap(k, v) => {
                if dot {
                    return Err(Diagnostic::error(
                        Category::Syntax,
                        "dot notation cannot be used with datamaps",
                    ));
                }
                self.fit_datamap_key(key, k);
                let got = self.ast.ty(key).clone();
                if !equal_strict(k, &got)? {
                    return Err(Diagnostic::error(
                        Category::TypeMismatch,
                        format!("map key of type '{got}' is incompatible with datamap's type '{k}'"),
                    ));
                }
                self.ast.set_ty(node, Type::Optional(v.clone()));
                Ok(())
            }
            Type::Response(_) if dot => self.response_property(node, expr, &expr_ty, &prop),
            Type::ExternDecl(ext) if key_is_text => self.extern_member(node, key, ext),
            Type::Trait(target) if key_is_text => self.trait_member(node, expr, key, target),
            Type::TraitDef(def) if key_is_text => {
                let def = *def;
                let member = self.require_literal_key(key)?;
                match self.trait_member_named(def, &member) {
                    Some(m) => {
                        self.ast.set_ty(node, Type::Func(FuncRef { def: m, implementor: None }));
                        Ok(())
                    }
                    None => Err(self.not_in_trait(def, &member)),
                }
            }
            Type::Ft if dot => {
                let p = FtProp::parse(&prop).ok_or_else(|| unknown_property(&prop, Some(FtProp::valid())))?;
                self.bind_property(node, expr, p.builtin());
                Ok(())
            }
            Type::Nft(_) if dot => {
                let p = NftProp::parse(&prop).ok_or_else(|| unknown_property(&prop, Some(NftProp::valid())))?;
                self.bind_property(node, expr, p.builtin());
                Ok(())
            }
            _ => Err(Diagnostic::error(
                Category::TypeMismatch,
                format!("not a valid index type '{key_ty}' for '{expr_ty}'"),
            )),
        }
    }

    /// Turn `node` into a reference to `builtin` with `receiver` bound as
    /// its first argument.
    fn bind_property(&mut self, node: NodeId, receiver: NodeId, builtin: &str) {
        self.ast.reset(
            node,
            NodeKind::Id(Ident {
                name: builtin.to_string(),
                decl: None,
                bind: vec![receiver],
            }),
            Type::Builtin(builtin.to_string()),
        );
    }

    fn require_literal_key(&self, key: NodeId) -> Result<String, Diagnostic> {
        match self.ast.lit(key) {
            Some(Lit::Str(text)) => Ok(text.clone()),
            _ => Err(literal_key_required(
                "operator '.'. indirect access to extern declarations is not supported.",
            )),
        }
    }

    fn seq_property(&mut self, node: NodeId, expr: NodeId, seq: &Type, prop: &str) -> Result<(), Diagnostic> {
        let unknown = || unknown_property(prop, Some(SeqProp::valid()));
        let p = SeqProp::parse(prop).ok_or_else(unknown)?;
        match p {
            SeqProp::Ascii => {
                let literal_utf8 = self.ast.is_lit(expr) && matches!(seq, Type::String(_));
                if !literal_utf8 {
                    return Err(Diagnostic::error(
                        Category::NotSupported,
                        "must be a literal string to use ascii()",
                    ));
                }
            }
            SeqProp::Append if !matches!(seq, Type::List(..)) => return Err(unknown()),
            _ => {}
        }
        unwrap_optional(self.ast, expr);
        self.bind_property(node, expr, p.builtin());
        Ok(())
    }

    fn map_field(&mut self, node: NodeId, key: NodeId, map_ty: &Type, fields_ty: &Type) -> Result<(), Diagnostic> {
        let Some(Lit::Str(name)) = self.ast.lit(key).cloned() else {
            return Err(literal_key_required(
                "clarity does not support indirect map lookups, a literal string is required",
            ));
        };
        let fields = fields_ty.map_fields().cloned().unwrap_or_default();
        let Some(field) = fields.get(&name) else {
            let valid: Vec<&str> = fields.keys().map(String::as_str).collect();
            return Err(Diagnostic::error(
                Category::MapKeyNotFound,
                format!("map key '{name}' not found in map (valid keys are {})", valid.join(",")),
            ));
        };
        let ty = if map_ty.is_optional() {
            Type::optional(field.clone())
        } else {
            field.clone()
        };
        self.ast.set_ty(node, ty);
        Ok(())
    }

    fn response_property(&mut self, node: NodeId, expr: NodeId, response: &Type, prop: &str) -> Result<(), Diagnostic> {
        let Some(p) = ResponseProp::parse(prop) else {
            return Err(unknown_property(prop, None));
        };
        match p {
            ResponseProp::OkVal => match response.ok_type() {
                Some(ok) => self.ast.set_ty(node, ok.clone()),
                None => {
                    return Err(Diagnostic::error(
                        Category::UnsetResponseType,
                        "operator '.'. response object never obtains an ok value, and therefore 'ok' cannot be accessed",
                    ));
                }
            },
            ResponseProp::ErrVal => match response.err_type() {
                Some(err) => self.ast.set_ty(node, err.clone()),
                None => {
                    return Err(Diagnostic::error(
                        Category::UnsetResponseType,
                        "operator '.'. response object never obtains an err value, and therefore 'err' cannot be accessed",
                    ));
                }
            },
            ResponseProp::IsOk => self.bind_property(node, expr, "is-ok"),
            ResponseProp::IsErr => self.bind_property(node, expr, "is-err"),
        }
        Ok(())
    }

    fn extern_member(&mut self, node: NodeId, key: NodeId, ext: &crystal_types::ExternRef) -> Result<(), Diagnostic> {
        let name = self.require_literal_key(key)?;
        let NodeKind::DeclareExtern(decl) = self.ast.kind(ext.decl) else {
            return Err(Diagnostic::internal("extern reference without a declaration"));
        };
        let mut found = None;
        for &def in &decl.defs {
            match self.ast.kind(def) {
                NodeKind::ExternFunc(f) if f.name == name => {
                    found = Some(Type::Func(FuncRef { def, implementor: None }));
                }
                NodeKind::TraitDef(t) if t.id == name => found = Some(Type::TraitDef(def)),
                NodeKind::ExternTraitImpl { impl_contract_id } if self.ast.lit_text(*impl_contract_id) == Some(name.as_str()) => {
                    return Err(Diagnostic::error(
                        Category::NotSupported,
                        format!("'{name}' is a trait implemented by '{}' and cannot be accessed", ext.alias),
                    ));
                }
                _ => {}
            }
            if found.is_some() {
                break;
            }
        }
        match found {
            Some(ty) => {
                self.ast.set_ty(node, ty);
                Ok(())
            }
            None => Err(Diagnostic::error(
                Category::MapKeyNotFound,
                format!(
                    "'{name}' not found in extern declaration '{}' imported from '{}'",
                    ext.alias,
                    decl.import_path.as_deref().unwrap_or("<unknown>")
                ),
            )),
        }
    }

    fn trait_member(&mut self, node: NodeId, expr: NodeId, key: NodeId, target: &TraitTarget) -> Result<(), Diagnostic> {
        let name = self.require_literal_key(key)?;
        let TraitTarget::Def { def, .. } = target else {
            return Err(Diagnostic::error(
                Category::NotSupported,
                format!("the functions of trait '{}' are not known", target.contract_id().unwrap_or("?")),
            ));
        };
        match self.trait_member_named(*def, &name) {
            Some(member) => {
                self.ast.set_ty(
                    node,
                    Type::Func(FuncRef {
                        def: member,
                        implementor: Some(expr),
                    }),
                );
                Ok(())
            }
            None => Err(self.not_in_trait(*def, &name)),
        }
    }

    fn trait_member_named(&self, def: NodeId, name: &str) -> Option<NodeId> {
        let NodeKind::TraitDef(t) = self.ast.kind(def) else {
            return None;
        };
        t.members
            .iter()
            .copied()
            .find(|&m| self.ast.decl_name(m) == Some(name))
    }

    fn not_in_trait(&self, def: NodeId, name: &str) -> Diagnostic {
        let trait_name = self.ast.decl_name(def).unwrap_or("?");
        Diagnostic::error(
            Category::MapKeyNotFound,
            format!("'{name}' not found in trait '{trait_name}'"),
        )
    }
}

#[cfg(test)]
mod tests {
    use crystal_ast::{Ast, NodeId, NodeKind, Visibility::*};
    use crystal_diag::Category;
    use crystal_types::Type;

    use crate::typeck::{InferOptions, determine_types};
    use crate::validate_functions;

    fn type_of(ast: &mut Ast, args: Vec<NodeId>, expr: NodeId) -> Result<Type, crystal_diag::Diagnostic> {
        let ret = ast.ret(expr);
        let f = ast.function(Private, "subject", args, vec![ret]);
        ast.push_definition(f);
        let order = validate_functions(ast)?;
        determine_types(ast, order, &InferOptions::default(), &mut Vec::new(), None)?;
        Ok(ast.ty(f).clone())
    }

    #[test]
    fn relative_contract_ids() {
        let mut ast = Ast::new();
        let cid = ast.dot(None, "token");
        assert_eq!(type_of(&mut ast, vec![], cid).unwrap(), Type::Principal);
        assert_eq!(ast.lit_text(cid), Some(".token"));
    }

    #[test]
    fn absolute_contract_ids() {
        let mut ast = Ast::new();
        let p = ast.principal("SP000000000000000000002Q6VF78");
        let cid = ast.dot(Some(p), "pox");
        type_of(&mut ast, vec![], cid).unwrap();
        assert_eq!(ast.lit_text(cid), Some("SP000000000000000000002Q6VF78.pox"));
    }

    #[test]
    fn string_length_binds_the_receiver() {
        let mut ast = Ast::new();
        let s = ast.arg("s", Type::String(Some(10)));
        let sid = ast.id("s");
        let len = ast.dot(Some(sid), "len");
        let call = ast.call_expr(len, vec![]);
        assert_eq!(type_of(&mut ast, vec![s], call).unwrap(), Type::Uint);
        let NodeKind::Call { callee, args } = ast.kind(call) else {
            panic!("expected a call");
        };
        assert_eq!(ast.ident(*callee).unwrap().name, "len");
        assert!(ast.ident(*callee).unwrap().bind.is_empty());
        assert_eq!(args, &vec![sid]);
    }

    #[test]
    fn unknown_sequence_properties_list_the_valid_ones() {
        let mut ast = Ast::new();
        let s = ast.arg("s", Type::String(Some(10)));
        let sid = ast.id("s");
        let bad = ast.dot(Some(sid), "size");
        let err = type_of(&mut ast, vec![s], bad).unwrap_err();
        assert_eq!(err.category, Category::PropertyNotFound);
        assert_eq!(
            err.message,
            "operator '.'. unknown property 'size'. Valid properties are ascii, append, concat, indexOf?, replaceAt?, slice?, len, toInt?, toUint?"
        );
    }

    #[test]
    fn map_fields() {
        let mut ast = Ast::new();
        let a = ast.int(1);
        let b = ast.bool_lit(true);
        let rec = ast.record(vec![("a", a), ("b", b)]);
        let field = ast.dot(Some(rec), "b");
        assert_eq!(type_of(&mut ast, vec![], field).unwrap(), Type::Bool);

        let mut ast = Ast::new();
        let a = ast.int(1);
        let rec = ast.record(vec![("a", a)]);
        let field = ast.dot(Some(rec), "z");
        let err = type_of(&mut ast, vec![], field).unwrap_err();
        assert_eq!(err.category, Category::MapKeyNotFound);
        assert_eq!(err.message, "map key 'z' not found in map (valid keys are a)");
    }

    #[test]
    fn list_items() {
        let mut ast = Ast::new();
        let l = ast.arg("l", Type::list(Type::Int, Some(5)));
        let lid = ast.id("l");
        let zero = ast.int(0);
        let item = ast.index(lid, zero);
        assert_eq!(type_of(&mut ast, vec![l], item).unwrap(), Type::Int);
        assert_eq!(ast.ty(zero), &Type::Uint);
    }

    #[test]
    fn datamap_lookups_are_optional() {
        let mut ast = Ast::new();
        let map = ast.data_map("owners", Type::Uint, Type::Principal);
        ast.push_definition(map);
        let m = ast.id("owners");
        let k = ast.int(7);
        let get = ast.index(m, k);
        assert_eq!(type_of(&mut ast, vec![], get).unwrap(), Type::optional(Type::Principal));

        let mut ast = Ast::new();
        let map = ast.data_map("owners", Type::Uint, Type::Principal);
        ast.push_definition(map);
        let m = ast.id("owners");
        let get = ast.dot(Some(m), "x");
        let err = type_of(&mut ast, vec![], get).unwrap_err();
        assert_eq!(err.message, "dot notation cannot be used with datamaps");
    }

    #[test]
    fn response_values() {
        let mut ast = Ast::new();
        let r = ast.arg("r", Type::response(Some(Type::Uint), None));
        let rid = ast.id("r");
        let ok = ast.dot(Some(rid), "okval");
        assert_eq!(type_of(&mut ast, vec![r], ok).unwrap(), Type::Uint);

        let mut ast = Ast::new();
        let r = ast.arg("r", Type::response(Some(Type::Uint), None));
        let rid = ast.id("r");
        let err = ast.dot(Some(rid), "errval");
        let e = type_of(&mut ast, vec![r], err).unwrap_err();
        assert_eq!(e.category, Category::UnsetResponseType);
    }

    #[test]
    fn booleans_have_no_properties() {
        let mut ast = Ast::new();
        let b = ast.bool_lit(true);
        let p = ast.dot(Some(b), "x");
        let err = type_of(&mut ast, vec![], p).unwrap_err();
        assert_eq!(err.message, "cannot operate on type 'bool' with '.'");
    }
}
