//! Source comments carried into the output.

use crystal_ast::Ast;

/// A comment as the target should print it, e.g. `;; owner only`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub line: u32,
    pub text: String,
}

impl Comment {
    pub fn new(line: u32, text: impl Into<String>) -> Self {
        Self {
            line,
            text: text.into(),
        }
    }
}

/// Attach each comment to the first node, in pre-order, whose line is at
/// or after the comment's. Returns the comments no node claimed.
pub fn merge_comments(ast: &mut Ast, mut comments: Vec<Comment>) -> Vec<Comment> {
    comments.sort_by_key(|c| c.line);

    let mut lined = Vec::new();
    let root = ast.root();
    ast.walk(root, &mut |id| {
        if let Some(line) = ast.line(id) {
            lined.push((id, line));
        }
        true
    });

    let mut pending = comments.into_iter().peekable();
    for (id, line) in lined {
        while let Some(comment) = pending.next_if(|c| line >= c.line) {
            ast.add_comment(id, comment.text);
        }
        if pending.peek().is_none() {
            break;
        }
    }
    pending.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crystal_ast::Visibility::Private;

    #[test]
    fn comments_attach_to_the_next_node() {
        let mut ast = Ast::new();
        let one = ast.uint(1);
        ast.at(one, 3);
        let r = ast.ret(one);
        let f = ast.function(Private, "one", vec![], vec![r]);
        ast.at(f, 2);
        ast.push_definition(f);

        let rest = merge_comments(
            &mut ast,
            vec![
                Comment::new(1, ";; first"),
                Comment::new(3, ";; inner"),
                Comment::new(9, ";; end"),
            ],
        );
        assert_eq!(ast[f].comments, vec![";; first".to_string()]);
        assert_eq!(ast[one].comments, vec![";; inner".to_string()]);
        assert_eq!(rest, vec![Comment::new(9, ";; end")]);
    }

    #[test]
    fn nodes_without_lines_are_skipped() {
        let mut ast = Ast::new();
        let seven = ast.int(7);
        let c = ast.const_decl("c", seven);
        ast.push_definition(c);
        let rest = merge_comments(&mut ast, vec![Comment::new(1, ";; lost")]);
        assert!(ast[c].comments.is_empty());
        assert_eq!(rest.len(), 1);
    }
}
