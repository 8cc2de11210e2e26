//! Nested-list output with line and indent tracking.
//!
//! [`Sexp`] is the tree the translator builds; [`Formatter`] turns it into
//! lines. Tokens are joined with single spaces, a `)` sticks to the token
//! before it, and every open list pushes an indent level equal to the
//! column just after its head token.

use std::fmt;

#[derive(Debug, Clone)]
struct Line {
    words: Vec<String>,
    /// Cumulative indent stack; the top is where the next line starts.
    indent: Vec<i32>,
}

#[derive(Debug)]
pub struct Formatter {
    done: Vec<Line>,
    current: Line,
}

impl Default for Formatter {
    fn default() -> Self {
        Self::new()
    }
}

impl Formatter {
    pub fn new() -> Self {
        Self {
            done: Vec::new(),
            current: Line {
                words: Vec::new(),
                indent: vec![0],
            },
        }
    }

    /// Append one token to the current line.
    pub fn push(&mut self, token: &str) {
        let line = &mut self.current;
        if token == ")" {
            match line.words.last_mut() {
                Some(word) => word.push(')'),
                None => line.words.push(")".to_string()),
            }
            if line.indent.len() > 1 {
                line.indent.pop();
            }
            return;
        }

        let comment_at = token.find(";;");
        let clean = match comment_at {
            Some(at) => token[..at].trim_end(),
            None => token,
        };
        let top = line.indent.len() - 1;
        let in_list = line.words.first().is_some_and(|w| w.starts_with('('));
        if in_list || token == "(" {
            line.indent[top] += width(clean);
        }

        match line.words.last_mut() {
            Some(word) if word.ends_with('(') => word.push_str(token),
            _ => {
                line.words.push(token.to_string());
                if line.words.len() > 1 && comment_at != Some(0) {
                    line.indent[top] += 1;
                }
            }
        }

        if token == "(" {
            line.indent[top] -= 1;
            let inner = line.indent[top] + 1;
            line.indent.push(inner);
        }
    }

    /// Start a new line. `indent` adjusts where it starts: negative values
    /// reach back into the indent stack, others are relative to the
    /// enclosing list (or absolute at the outer levels). Empty lines are
    /// only produced with `allow_repeats`.
    pub fn newline(&mut self, indent: Option<i32>, allow_repeats: bool) {
        let stack = &mut self.current.indent;
        let depth = stack.len();
        match indent {
            Some(n) if n < 0 => {
                let base = usize::try_from(depth as i32 + n - 1)
                    .ok()
                    .and_then(|at| stack.get(at).copied())
                    .unwrap_or(3);
                stack[depth - 1] = base.max(3);
            }
            Some(n) if depth > 2 => stack[depth - 1] = stack[depth - 2] + n,
            Some(n) => stack[depth - 1] = n,
            None => {}
        }

        if allow_repeats || !self.current.words.is_empty() {
            let next = Line {
                words: Vec::new(),
                indent: self.current.indent.clone(),
            };
            self.done.push(std::mem::replace(&mut self.current, next));
        }
    }

    pub fn finish(self) -> String {
        let mut out = Vec::with_capacity(self.done.len() + 1);
        let mut indent = 0;
        for line in self.done.iter().chain(std::iter::once(&self.current)) {
            let pad = usize::try_from(indent).unwrap_or(0);
            out.push(format!("{}{}", " ".repeat(pad), line.words.join(" ")));
            indent = line.indent.last().copied().unwrap_or(0);
        }
        out.join("\n")
    }
}

fn width(text: &str) -> i32 {
    i32::try_from(text.chars().count()).unwrap_or(i32::MAX)
}

// ---------------------------------------------------------------------------
// Output tree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Shape {
    List(Vec<Sexp>),
    Atom(String),
}

/// A list or atom of output with its attached comments and whether it
/// starts on a new line.
#[derive(Debug, Clone)]
pub struct Sexp {
    pub shape: Shape,
    comments: Vec<String>,
    /// `Some(indent)` starts a new line before the element.
    line_break: Option<Option<i32>>,
}

impl Sexp {
    pub fn atom(text: impl Into<String>) -> Self {
        Self {
            shape: Shape::Atom(text.into()),
            comments: Vec::new(),
            line_break: None,
        }
    }

    pub fn list(items: Vec<Sexp>) -> Self {
        Self {
            shape: Shape::List(items),
            comments: Vec::new(),
            line_break: None,
        }
    }

    /// `(head items...)`
    pub fn form(head: &str, items: impl IntoIterator<Item = Sexp>) -> Self {
        let mut all = vec![Sexp::atom(head)];
        all.extend(items);
        Self::list(all)
    }

    /// Attach comments. An atom with comments always starts a new line.
    pub fn with_comments(mut self, comments: &[String]) -> Self {
        if comments.is_empty() {
            return self;
        }
        self.prepend_comments(comments.to_vec());
        if matches!(self.shape, Shape::Atom(_)) && self.line_break.is_none() {
            self.line_break = Some(None);
        }
        self
    }

    pub fn prepend_comments(&mut self, mut comments: Vec<String>) {
        comments.append(&mut self.comments);
        self.comments = comments;
    }

    pub fn take_comments(&mut self) -> Vec<String> {
        std::mem::take(&mut self.comments)
    }

    /// Start on a new line.
    pub fn nl(mut self) -> Self {
        self.line_break = Some(None);
        self
    }

    /// Start on a new line at `indent`.
    pub fn nl_at(mut self, indent: i32) -> Self {
        self.line_break = Some(Some(indent));
        self
    }

    pub fn set_nl(&mut self, indent: Option<i32>) {
        self.line_break = Some(indent);
    }

    pub fn push(&mut self, item: Sexp) {
        if let Shape::List(items) = &mut self.shape {
            items.push(item);
        }
    }

    pub fn items(&self) -> &[Sexp] {
        match &self.shape {
            Shape::List(items) => items,
            Shape::Atom(_) => &[],
        }
    }

    pub fn into_items(self) -> Vec<Sexp> {
        match self.shape {
            Shape::List(items) => items,
            Shape::Atom(_) => Vec::new(),
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self.shape, Shape::List(_))
    }

    pub fn text(&self) -> Option<&str> {
        match &self.shape {
            Shape::Atom(text) => Some(text),
            Shape::List(_) => None,
        }
    }

    /// The leading atom of a list.
    pub fn head(&self) -> Option<&str> {
        self.items().first().and_then(Sexp::text)
    }

    /// A list headed by `name`; with `list_arg`, its first argument must be a
    /// list too.
    pub fn is_form(&self, name: &str, list_arg: bool) -> bool {
        self.head() == Some(name) && (!list_arg || self.items().get(1).is_some_and(Sexp::is_list))
    }

    pub fn render(self, f: &mut Formatter) {
        match self.shape {
            Shape::List(items) => {
                let mut indent = self.line_break.flatten();
                if !self.comments.is_empty() {
                    for comment in &self.comments {
                        f.newline(indent, false);
                        f.push(comment);
                        indent = None;
                    }
                    f.newline(indent, false);
                }
                if self.line_break.is_some() {
                    f.newline(indent, false);
                }
                f.push("(");
                for item in simplify(items) {
                    item.render(f);
                }
                f.push(")");
            }
            Shape::Atom(text) => match self.comments.as_slice() {
                [] => {
                    if let Some(indent) = self.line_break {
                        f.newline(indent, false);
                    }
                    f.push(&text);
                }
                [comment] => {
                    if let Some(indent) = self.line_break {
                        f.newline(indent, false);
                    }
                    f.push(&text);
                    f.push(comment);
                    f.newline(None, false);
                }
                comments => {
                    let mut indent = self.line_break.flatten();
                    for comment in comments {
                        f.newline(indent, false);
                        f.push(comment);
                        indent = None;
                    }
                    f.newline(indent, false);
                    f.push(&text);
                }
            },
        }
    }
}

impl fmt::Display for Sexp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = Formatter::new();
        self.clone().render(&mut out);
        f.write_str(&out.finish())
    }
}

/// Peephole rewrites on a list's items:
/// `(not (not x))` to `x`, nested `begin`s flattened, and
/// `(not (is-some x))` to `(is-none x)`.
fn simplify(mut items: Vec<Sexp>) -> Vec<Sexp> {
    let this = |items: &[Sexp], name: &str| {
        items.first().and_then(Sexp::text) == Some(name) && items.get(1).is_some_and(Sexp::is_list)
    };

    if this(&items, "not")
        && items[1].is_form("not", false)
        && items[1].items().get(1).is_some_and(Sexp::is_list)
    {
        let mut inner = items.remove(1).into_items();
        items = inner.remove(1).into_items();
    }

    if this(&items, "begin") && items[1].is_form("begin", false) {
        let mut rest = items.split_off(1);
        let nested = rest.remove(0).into_items();
        items.extend(nested.into_iter().skip(1));
        items.extend(rest);
    }

    if this(&items, "not") && items[1].is_form("is-some", false) {
        let inner = std::mem::replace(&mut items[1], Sexp::atom("")).into_items();
        items[0] = Sexp::atom("is-none");
        if let Some(arg) = inner.into_iter().nth(1) {
            items[1] = arg;
        }
    }

    items
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(s: Sexp) -> String {
        s.to_string()
    }

    #[test]
    fn close_parens_stick_to_the_previous_token() {
        let s = Sexp::form("+", [Sexp::atom("a"), Sexp::form("*", [Sexp::atom("b"), Sexp::atom("c")])]);
        assert_eq!(render(s), "(+ a (* b c))");
    }

    #[test]
    fn broken_items_continue_at_the_line_width() {
        let s = Sexp::form("and", [Sexp::atom("x"), Sexp::atom("y").nl(), Sexp::atom("z").nl()]);
        assert_eq!(render(s), "(and x\n      y\n      z)");
    }

    #[test]
    fn explicit_indents_are_relative_to_the_outer_list() {
        let s = Sexp::form("begin", [Sexp::atom("a").nl_at(3), Sexp::atom("b").nl()]);
        assert_eq!(render(s), "(begin\n   a\n   b)");
    }

    #[test]
    fn double_negation_is_removed() {
        let inner = Sexp::form("is-eq", [Sexp::atom("a"), Sexp::atom("b")]);
        let s = Sexp::form("not", [Sexp::form("not", [inner])]);
        assert_eq!(render(s), "(is-eq a b)");
    }

    #[test]
    fn negated_is_some_becomes_is_none() {
        let s = Sexp::form("not", [Sexp::form("is-some", [Sexp::atom("x")])]);
        assert_eq!(render(s), "(is-none x)");
    }

    #[test]
    fn nested_begins_flatten() {
        let inner = Sexp::form("begin", [Sexp::atom("a"), Sexp::atom("b")]);
        let s = Sexp::form("begin", [inner, Sexp::atom("c")]);
        assert_eq!(render(s), "(begin a b c)");
    }

    #[test]
    fn single_comments_trail_atoms() {
        let s = Sexp::form(
            "list",
            [Sexp::atom("u1").with_comments(&[";; one".to_string()]), Sexp::atom("u2")],
        );
        assert_eq!(render(s), "(list\n     u1 ;; one\n     u2)");
    }

    #[test]
    fn list_comments_precede_the_list() {
        let s = Sexp::form("ok", [Sexp::atom("true")]).with_comments(&[";; done".to_string()]);
        assert_eq!(render(s), ";; done\n(ok true)");
    }
}
