//! Import stubs.
//!
//! A stub is Crystal source another contract imports to call this one: a
//! `declare extern` block with the public and read-only signatures, the
//! traits this contract implements, and the traits it defines. Trait
//! definitions are copied so importers can `use` a trait through the
//! implementing contract.

use crystal_ast::{Ast, NodeId, NodeKind, Visibility};
use crystal_types::{Type, pretty_types};

/// `public function f(uint,bool) => response<bool,uint>`
fn signature(ast: &Ast, def: NodeId) -> Option<String> {
    let (vis, name, args) = match ast.kind(def) {
        NodeKind::Func(f) => (f.vis, f.name.as_deref()?, &f.args),
        NodeKind::ExternFunc(f) => (f.vis, f.name.as_str(), &f.args),
        _ => return None,
    };
    let vis = match vis {
        Visibility::ReadOnly => "public readonly",
        other => other.as_str(),
    };
    let args = pretty_types(args.iter().map(|&a| ast.ty(a)), true);
    Some(format!(
        "{vis} function {name}({args}) => {}",
        ast.ty(def).pretty_for_machines()
    ))
}

/// `<contract id>.<trait>` of a trait declaration.
fn trait_id(ast: &Ast, def: NodeId) -> Option<String> {
    match ast.kind(def) {
        NodeKind::TraitDef(t) => {
            let contract_id = t.contract_id.and_then(|c| ast.lit_text(c)).unwrap_or_default();
            Some(format!("{contract_id}.{}", t.id))
        }
        _ => None,
    }
}

/// Write the stub for the contract `contract_name`. Nothing is written
/// when the contract has no external surface.
pub fn emit_import_stub(ast: &Ast, contract_name: &str, out: &mut dyn FnMut(&str)) {
    let mut implements = Vec::new();
    let mut functions = Vec::new();
    let mut traits = Vec::new();

    for &def in ast.definitions() {
        if let NodeKind::ImplTrait { expr } = ast.kind(def)
            && let Type::TraitDef(trait_def) = ast.ty(*expr)
            && let Some(id) = trait_id(ast, *trait_def)
        {
            implements.push(format!("    implements trait {id},\n"));
        }
    }

    for &def in ast.definitions() {
        match ast.kind(def) {
            NodeKind::Func(f) if f.vis.is_external() => {
                if let Some(id) = f.trait_def.and_then(|t| trait_id(ast, t)) {
                    functions.push(format!("    // member of trait {id}\n"));
                }
                if let Some(sig) = signature(ast, def) {
                    functions.push(format!("    {sig},\n"));
                }
            }
            NodeKind::TraitDef(t) => {
                traits.push(format!("    trait {} {{\n", t.id));
                for &member in &t.members {
                    if let Some(sig) = signature(ast, member) {
                        traits.push(format!("        {sig},\n"));
                    }
                }
                traits.push("    },\n".to_string());
            }
            _ => {}
        }
    }

    if implements.is_empty() && functions.is_empty() && traits.is_empty() {
        return;
    }

    let dot = if contract_name.starts_with('.') { "" } else { "." };
    out("//\n");
    out("// this is a generated file - do not edit\n");
    out("//\n");
    out(&format!("// Contract: {dot}{contract_name}\n"));
    out("\n");
    out("declare extern {\n");
    for section in [&implements, &functions] {
        for line in section {
            out(line);
        }
        if !section.is_empty() {
            out("\n");
        }
    }
    for line in &traits {
        out(line);
    }
    out("};\n");
}

/// [`emit_import_stub`] collected into a string; `None` without an
/// external surface.
pub fn import_stub(ast: &Ast, contract_name: &str) -> Option<String> {
    let mut text = String::new();
    emit_import_stub(ast, contract_name, &mut |chunk| text.push_str(chunk));
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crystal_ast::Visibility::*;

    #[test]
    fn private_only_contracts_have_no_stub() {
        let mut ast = Ast::new();
        let one = ast.uint(1);
        let r = ast.ret(one);
        let f = ast.function(Private, "helper", vec![], vec![r]);
        ast.set_ty(f, Type::Uint);
        ast.push_definition(f);
        assert_eq!(import_stub(&ast, "vault"), None);
    }

    #[test]
    fn external_functions_are_declared() {
        let mut ast = Ast::new();
        let zero = ast.uint(0);
        let r = ast.ret(zero);
        let get = ast.function(ReadOnly, "get-count", vec![], vec![r]);
        ast.set_ty(get, Type::Uint);
        let yes = ast.bool_lit(true);
        let r = ast.ret(yes);
        let inc = ast.function(Public, "increment", vec![], vec![r]);
        ast.set_ty(inc, Type::response(Some(Type::Bool), Some(Type::Uint)));
        for def in [get, inc] {
            ast.push_definition(def);
        }
        assert_eq!(
            import_stub(&ast, "counter").unwrap(),
            "//\n\
             // this is a generated file - do not edit\n\
             //\n\
             // Contract: .counter\n\
             \n\
             declare extern {\n\
             \x20   public readonly function get-count() => uint,\n\
             \x20   public function increment() => response<bool,uint>,\n\
             \n\
             };\n"
        );
    }

    #[test]
    fn read_only_functions_are_public_readonly() {
        let mut ast = Ast::new();
        let who = ast.arg("who", Type::Principal);
        let zero = ast.uint(0);
        let r = ast.ret(zero);
        let f = ast.function(ReadOnly, "balance-of", vec![who], vec![r]);
        ast.set_ty(f, Type::Uint);
        ast.push_definition(f);
        assert_eq!(
            signature(&ast, f).as_deref(),
            Some("public readonly function balance-of(principal) => uint")
        );
    }
}
