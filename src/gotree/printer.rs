//! Go pretty-printer.
//!
//! Renders a (possibly mutated) tree back to source in a deterministic
//! gofmt-like layout: tab indentation, one blank line between top-level
//! declarations, parenthesized import groups, struct tags verbatim. This is
//! the single serialization point — whatever the executor did to the tree,
//! the output comes from here.
//!
//! Column alignment inside struct literals and field lists is not
//! reproduced; one space separates names from types.

use crate::gotree::{DeclTok, Node, NodeId, Tree};

/// Render a `File` node to Go source.
pub fn render(tree: &Tree, file: NodeId) -> String {
    let mut p = Printer {
        tree,
        out: String::new(),
        indent: 0,
    };
    p.file(file);
    p.out
}

/// Render a single expression subtree. Templates use this to stringify a
/// bound node that is neither an identifier nor a literal.
pub fn render_expr(tree: &Tree, id: NodeId) -> String {
    let p = Printer {
        tree,
        out: String::new(),
        indent: 0,
    };
    p.expr(id)
}

struct Printer<'t> {
    tree: &'t Tree,
    out: String,
    indent: usize,
}

impl<'t> Printer<'t> {
    fn push_indent(&mut self) {
        for _ in 0..self.indent {
            self.out.push('\t');
        }
    }

    fn file(&mut self, id: NodeId) {
        let Node::File { name, decls } = self.tree.node(id) else {
            return;
        };
        self.out.push_str("package ");
        self.out.push_str(&self.expr(*name));
        self.out.push('\n');

        for decl in decls {
            self.out.push('\n');
            self.decl(*decl);
        }
    }

    fn decl(&mut self, id: NodeId) {
        match self.tree.node(id) {
            Node::GenDecl { tok, lparen, specs } => {
                self.push_indent();
                self.out.push_str(tok.keyword());
                if *lparen || specs.len() > 1 {
                    self.out.push_str(" (\n");
                    self.indent += 1;
                    for spec in specs.clone() {
                        self.push_indent();
                        let text = self.spec(spec);
                        self.out.push_str(&text);
                        self.out.push('\n');
                    }
                    self.indent -= 1;
                    self.push_indent();
                    self.out.push_str(")\n");
                } else if let Some(spec) = specs.first() {
                    self.out.push(' ');
                    let text = self.spec(*spec);
                    self.out.push_str(&text);
                    self.out.push('\n');
                } else {
                    self.out.push_str(" ()\n");
                }
            }
            Node::FuncDecl {
                recv,
                name,
                typ,
                body,
            } => {
                self.out.push_str("func ");
                if let Some(recv) = recv {
                    self.out.push('(');
                    self.out.push_str(&self.field_list(*recv));
                    self.out.push_str(") ");
                }
                self.out.push_str(&self.expr(*name));
                self.out.push_str(&self.signature(*typ));
                if let Some(body) = *body {
                    self.out.push(' ');
                    self.block(body);
                }
                self.out.push('\n');
            }
            _ => {
                // A declaration slot holding something unexpected renders as
                // an expression line rather than being dropped silently.
                self.push_indent();
                let text = self.expr(id);
                self.out.push_str(&text);
                self.out.push('\n');
            }
        }
    }

    fn spec(&mut self, id: NodeId) -> String {
        match self.tree.node(id) {
            Node::ImportSpec { name, path } => match name {
                Some(alias) => format!("{} {}", self.expr(*alias), self.expr(*path)),
                None => self.expr(*path),
            },
            Node::TypeSpec { name, typ } => {
                format!("{} {}", self.expr(*name), self.expr(*typ))
            }
            Node::ValueSpec { names, typ, values } => {
                let mut s = names
                    .iter()
                    .map(|n| self.expr(*n))
                    .collect::<Vec<_>>()
                    .join(", ");
                if let Some(typ) = typ {
                    s.push(' ');
                    s.push_str(&self.expr(*typ));
                }
                if !values.is_empty() {
                    s.push_str(" = ");
                    s.push_str(
                        &values
                            .iter()
                            .map(|v| self.expr(*v))
                            .collect::<Vec<_>>()
                            .join(", "),
                    );
                }
                s
            }
            _ => self.expr(id),
        }
    }

    /// `(params)` plus results for a `FuncType`.
    fn signature(&self, typ: NodeId) -> String {
        let Node::FuncType { params, results } = self.tree.node(typ) else {
            return String::new();
        };
        let mut s = format!("({})", self.field_list(*params));
        if let Some(results) = results {
            let Node::FieldList { list } = self.tree.node(*results) else {
                return s;
            };
            let named = list.iter().any(|f| {
                matches!(self.tree.node(*f), Node::Field { names, .. } if !names.is_empty())
            });
            if list.len() == 1 && !named {
                s.push(' ');
                s.push_str(&self.field(list[0]));
            } else if !list.is_empty() {
                s.push_str(" (");
                s.push_str(&self.field_list(*results));
                s.push(')');
            }
        }
        s
    }

    fn field_list(&self, id: NodeId) -> String {
        let Node::FieldList { list } = self.tree.node(id) else {
            return String::new();
        };
        list.iter()
            .map(|f| self.field(*f))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn field(&self, id: NodeId) -> String {
        let Node::Field { names, typ, tag } = self.tree.node(id) else {
            return String::new();
        };
        let mut s = String::new();
        if !names.is_empty() {
            s.push_str(
                &names
                    .iter()
                    .map(|n| self.expr(*n))
                    .collect::<Vec<_>>()
                    .join(", "),
            );
            s.push(' ');
        }
        s.push_str(&self.expr(*typ));
        if let Some(tag) = tag {
            s.push(' ');
            s.push_str(&self.expr(*tag));
        }
        s
    }

    fn block(&mut self, id: NodeId) {
        let Node::BlockStmt { list } = self.tree.node(id) else {
            self.out.push_str("{}");
            return;
        };
        if list.is_empty() {
            self.out.push_str("{}");
            return;
        }
        self.out.push_str("{\n");
        self.indent += 1;
        for stmt in list.clone() {
            self.push_indent();
            self.stmt(stmt);
            self.out.push('\n');
        }
        self.indent -= 1;
        self.push_indent();
        self.out.push('}');
    }

    fn stmt(&mut self, id: NodeId) {
        match self.tree.node(id) {
            Node::ExprStmt { x } => {
                let text = self.expr(*x);
                self.out.push_str(&text);
            }
            Node::AssignStmt { lhs, tok, rhs } => {
                let lhs_text = lhs
                    .iter()
                    .map(|e| self.expr(*e))
                    .collect::<Vec<_>>()
                    .join(", ");
                let rhs_text = rhs
                    .iter()
                    .map(|e| self.expr(*e))
                    .collect::<Vec<_>>()
                    .join(", ");
                self.out.push_str(&lhs_text);
                self.out.push(' ');
                self.out.push_str(tok);
                self.out.push(' ');
                self.out.push_str(&rhs_text);
            }
            Node::IncDecStmt { x, op } => {
                let text = format!("{}{}", self.expr(*x), op);
                self.out.push_str(&text);
            }
            Node::ReturnStmt { results } => {
                self.out.push_str("return");
                if !results.is_empty() {
                    self.out.push(' ');
                    let text = results
                        .iter()
                        .map(|e| self.expr(*e))
                        .collect::<Vec<_>>()
                        .join(", ");
                    self.out.push_str(&text);
                }
            }
            Node::DeferStmt { call } => {
                let text = self.expr(*call);
                self.out.push_str("defer ");
                self.out.push_str(&text);
            }
            Node::GoStmt { call } => {
                let text = self.expr(*call);
                self.out.push_str("go ");
                self.out.push_str(&text);
            }
            Node::BranchStmt { tok } => self.out.push_str(tok),
            Node::DeclStmt { decl } => {
                // Inline declaration; `decl` adds its own indent, so strip
                // ours (already written by the caller).
                let decl = *decl;
                let start = self.out.len();
                self.decl(decl);
                // decl() appends a trailing newline; statements add their own.
                if self.out.ends_with('\n') {
                    self.out.truncate(self.out.len() - 1);
                }
                // Remove the doubled indent decl() wrote at `start`.
                let doubled: String = "\t".repeat(self.indent);
                if self.out[start..].starts_with(&doubled) {
                    self.out.replace_range(start..start + doubled.len(), "");
                }
            }
            Node::IfStmt {
                init,
                cond,
                body,
                els,
            } => {
                let init = *init;
                let cond = *cond;
                let body = *body;
                let els = *els;
                self.out.push_str("if ");
                if let Some(init) = init {
                    self.stmt(init);
                    self.out.push_str("; ");
                }
                let cond_text = self.expr(cond);
                self.out.push_str(&cond_text);
                self.out.push(' ');
                self.block(body);
                if let Some(els) = els {
                    self.out.push_str(" else ");
                    match self.tree.node(els) {
                        Node::IfStmt { .. } => self.stmt(els),
                        _ => self.block(els),
                    }
                }
            }
            Node::ForStmt {
                init,
                cond,
                post,
                body,
            } => {
                let init = *init;
                let cond = *cond;
                let post = *post;
                let body = *body;
                self.out.push_str("for ");
                if init.is_some() || post.is_some() {
                    if let Some(init) = init {
                        self.stmt(init);
                    }
                    self.out.push_str("; ");
                    if let Some(cond) = cond {
                        let text = self.expr(cond);
                        self.out.push_str(&text);
                    }
                    self.out.push_str("; ");
                    if let Some(post) = post {
                        self.stmt(post);
                    }
                    self.out.push(' ');
                } else if let Some(cond) = cond {
                    let text = self.expr(cond);
                    self.out.push_str(&text);
                    self.out.push(' ');
                }
                self.block(body);
            }
            Node::RangeStmt {
                key,
                value,
                tok,
                x,
                body,
            } => {
                let mut header = String::from("for ");
                if let Some(key) = key {
                    header.push_str(&self.expr(*key));
                    if let Some(value) = value {
                        header.push_str(", ");
                        header.push_str(&self.expr(*value));
                    }
                    header.push(' ');
                    header.push_str(tok);
                    header.push(' ');
                }
                header.push_str("range ");
                header.push_str(&self.expr(*x));
                header.push(' ');
                let body = *body;
                self.out.push_str(&header);
                self.block(body);
            }
            Node::SwitchStmt { init, tag, body } => {
                let init = *init;
                let tag = *tag;
                let body = body.clone();
                self.out.push_str("switch ");
                if let Some(init) = init {
                    self.stmt(init);
                    self.out.push_str("; ");
                }
                if let Some(tag) = tag {
                    let text = self.expr(tag);
                    self.out.push_str(&text);
                    self.out.push(' ');
                }
                self.out.push_str("{\n");
                for case in body {
                    self.push_indent();
                    self.case_clause(case);
                }
                self.push_indent();
                self.out.push('}');
            }
            Node::BlockStmt { .. } => self.block(id),
            _ => {
                let text = self.expr(id);
                self.out.push_str(&text);
            }
        }
    }

    fn case_clause(&mut self, id: NodeId) {
        let Node::CaseClause { list, body } = self.tree.node(id) else {
            return;
        };
        let list = list.clone();
        let body = body.clone();
        if list.is_empty() {
            self.out.push_str("default:\n");
        } else {
            let exprs = list
                .iter()
                .map(|e| self.expr(*e))
                .collect::<Vec<_>>()
                .join(", ");
            self.out.push_str("case ");
            self.out.push_str(&exprs);
            self.out.push_str(":\n");
        }
        self.indent += 1;
        for stmt in body {
            self.push_indent();
            self.stmt(stmt);
            self.out.push('\n');
        }
        self.indent -= 1;
    }

    fn expr(&self, id: NodeId) -> String {
        match self.tree.node(id) {
            Node::Ident { name } => name.clone(),
            Node::BasicLit { value, .. } => value.clone(),
            Node::SelectorExpr { x, sel } => {
                format!("{}.{}", self.expr(*x), self.expr(*sel))
            }
            Node::CallExpr { fun, args } => {
                let args_text = args
                    .iter()
                    .map(|a| self.expr(*a))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{}({args_text})", self.expr(*fun))
            }
            Node::IndexExpr { x, index } => {
                format!("{}[{}]", self.expr(*x), self.expr(*index))
            }
            Node::StarExpr { x } => format!("*{}", self.expr(*x)),
            Node::UnaryExpr { op, x } => format!("{op}{}", self.expr(*x)),
            Node::BinaryExpr { x, op, y } => {
                format!("{} {op} {}", self.expr(*x), self.expr(*y))
            }
            Node::ParenExpr { x } => format!("({})", self.expr(*x)),
            Node::KeyValueExpr { key, value } => {
                format!("{}: {}", self.expr(*key), self.expr(*value))
            }
            Node::CompositeLit { typ, elts } => {
                let elts_text = elts
                    .iter()
                    .map(|e| self.expr(*e))
                    .collect::<Vec<_>>()
                    .join(", ");
                match typ {
                    Some(typ) => format!("{}{{{elts_text}}}", self.expr(*typ)),
                    None => format!("{{{elts_text}}}"),
                }
            }
            Node::Ellipsis { elt } => match elt {
                Some(elt) => format!("...{}", self.expr(*elt)),
                None => "...".to_string(),
            },
            Node::ArrayType { len, elt } => match len {
                Some(len) => format!("[{}]{}", self.expr(*len), self.expr(*elt)),
                None => format!("[]{}", self.expr(*elt)),
            },
            Node::MapType { key, value } => {
                format!("map[{}]{}", self.expr(*key), self.expr(*value))
            }
            Node::FuncType { .. } => format!("func{}", self.signature(id)),
            Node::FuncLit { typ, body } => {
                let mut nested = Printer {
                    tree: self.tree,
                    out: String::new(),
                    indent: self.indent,
                };
                nested.block(*body);
                format!("func{} {}", self.signature(*typ), nested.out)
            }
            Node::StructType { fields } => self.braced_fields("struct", *fields),
            Node::InterfaceType { methods } => self.interface_type(*methods),
            _ => String::new(),
        }
    }

    /// Multi-line `struct { … }` with one field per line.
    fn braced_fields(&self, keyword: &str, field_list: NodeId) -> String {
        let Node::FieldList { list } = self.tree.node(field_list) else {
            return format!("{keyword}{{}}");
        };
        if list.is_empty() {
            return format!("{keyword}{{}}");
        }
        let inner_indent = "\t".repeat(self.indent + 1);
        let close_indent = "\t".repeat(self.indent);
        let mut s = format!("{keyword} {{\n");
        for f in list {
            s.push_str(&inner_indent);
            s.push_str(&self.field(*f));
            s.push('\n');
        }
        s.push_str(&close_indent);
        s.push('}');
        s
    }

    /// `interface { … }` — methods print as `Name(params) results`.
    fn interface_type(&self, methods: NodeId) -> String {
        let Node::FieldList { list } = self.tree.node(methods) else {
            return "interface{}".to_string();
        };
        if list.is_empty() {
            return "interface{}".to_string();
        }
        let inner_indent = "\t".repeat(self.indent + 1);
        let close_indent = "\t".repeat(self.indent);
        let mut s = String::from("interface {\n");
        for f in list {
            let Node::Field { names, typ, .. } = self.tree.node(*f) else {
                continue;
            };
            s.push_str(&inner_indent);
            if let Some(name) = names.first() {
                s.push_str(&self.expr(*name));
                s.push_str(&self.signature(*typ));
            } else {
                s.push_str(&self.expr(*typ));
            }
            s.push('\n');
        }
        s.push_str(&close_indent);
        s.push('}');
        s
    }
}
