//! Go parser.
//!
//! Recursive descent over the scanner's token stream, allocating directly
//! into a `Tree` arena. Covers the declaration, statement, and expression
//! grammar of ordinary service code; generics and channel types are out of
//! scope and fail with a positioned error.
//!
//! `parse_statements` exists for the executor: it wraps a snippet in a
//! synthetic function, parses it *into the target tree's arena*, and hands
//! back the statement ids. Appending to the arena never moves existing
//! nodes, so bindings held across the splice stay valid.

use crate::error::Error;
use crate::gotree::lexer::{GoTok, GoToken, Scanner, is_keyword};
use crate::gotree::{DeclTok, LitKind, Node, NodeId, Pos, Tree};

/// Parse a Go source file into a fresh tree. Returns the tree and the id of
/// its `File` node.
pub fn parse_file(src: &str) -> Result<(Tree, NodeId), Error> {
    let mut tree = Tree::new();
    let file = parse_file_into(&mut tree, src)?;
    Ok((tree, file))
}

/// Parse a Go source file into an existing arena.
pub fn parse_file_into(tree: &mut Tree, src: &str) -> Result<NodeId, Error> {
    let tokens = Scanner::new(src).tokenize()?;
    GoParser::new(tree, tokens).parse_file()
}

/// Parse a statement list by wrapping it in a synthetic function body.
/// New nodes land in `tree`; the returned ids are the parsed statements.
pub fn parse_statements(tree: &mut Tree, src: &str) -> Result<Vec<NodeId>, Error> {
    let wrapped = format!("package p\nfunc f() {{\n{src}\n}}");
    let file = parse_file_into(tree, &wrapped)?;

    let decls = match tree.node(file) {
        Node::File { decls, .. } => decls.clone(),
        _ => unreachable!("parse_file_into returns a File node"),
    };
    for decl in decls {
        if let Node::FuncDecl {
            body: Some(body), ..
        } = tree.node(decl)
        {
            if let Node::BlockStmt { list } = tree.node(*body) {
                return Ok(list.clone());
            }
        }
    }
    Err(Error::TargetParse(
        "no statements found in snippet".to_string(),
    ))
}

/// A parameter-list entry before regrouping. `a, b int` scans as an unnamed
/// `a` followed by a named `b int`; regrouping turns that into one field
/// with two names.
enum ParamEntry {
    Unnamed(NodeId),
    Named { name: NodeId, typ: NodeId },
}

struct GoParser<'t> {
    tree: &'t mut Tree,
    tokens: Vec<GoToken>,
    pos: usize,
    /// Whether `T{…}` parses as a composite literal here. False inside
    /// if/for/switch headers, where `{` opens the body instead.
    allow_composite: bool,
}

impl<'t> GoParser<'t> {
    fn new(tree: &'t mut Tree, tokens: Vec<GoToken>) -> Self {
        Self {
            tree,
            tokens,
            pos: 0,
            allow_composite: true,
        }
    }

    fn peek(&self) -> &GoTok {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].kind
    }

    fn peek_at(&self, offset: usize) -> &GoTok {
        &self.tokens[(self.pos + offset).min(self.tokens.len() - 1)].kind
    }

    fn here(&self) -> Pos {
        self.tokens[self.pos.min(self.tokens.len() - 1)].pos
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn error(&self, expected: &str) -> Error {
        Error::TargetParse(format!(
            "{}: expected {expected}, found {}",
            self.here(),
            self.peek().describe()
        ))
    }

    fn at_op(&self, op: &str) -> bool {
        matches!(self.peek(), GoTok::Op(o) if *o == op)
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), GoTok::Ident(name) if name == keyword)
    }

    fn expect_op(&mut self, op: &'static str) -> Result<(), Error> {
        if self.at_op(op) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(&format!("`{op}`")))
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), Error> {
        if self.at_keyword(keyword) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(&format!("`{keyword}`")))
        }
    }

    /// Expect a non-keyword identifier and allocate an `Ident` node for it.
    fn expect_ident(&mut self) -> Result<NodeId, Error> {
        let pos = self.here();
        match self.peek() {
            GoTok::Ident(name) if !is_keyword(name) => {
                let name = name.clone();
                self.advance();
                Ok(self.tree.alloc(Node::Ident { name }, pos))
            }
            _ => Err(self.error("identifier")),
        }
    }

    fn skip_semis(&mut self) {
        while self.at_op(";") {
            self.advance();
        }
    }

    // --- File and declarations ---

    fn parse_file(&mut self) -> Result<NodeId, Error> {
        let file_pos = self.here();
        self.expect_keyword("package")?;
        let name = self.expect_ident()?;
        self.skip_semis();

        let mut decls = Vec::new();
        while !matches!(self.peek(), GoTok::Eof) {
            decls.push(self.parse_decl()?);
            self.skip_semis();
        }

        Ok(self.tree.alloc(Node::File { name, decls }, file_pos))
    }

    fn parse_decl(&mut self) -> Result<NodeId, Error> {
        if self.at_keyword("func") {
            return self.parse_func_decl();
        }
        for (keyword, tok) in [
            ("import", DeclTok::Import),
            ("const", DeclTok::Const),
            ("type", DeclTok::Type),
            ("var", DeclTok::Var),
        ] {
            if self.at_keyword(keyword) {
                return self.parse_gen_decl(tok);
            }
        }
        Err(self.error("declaration"))
    }

    fn parse_gen_decl(&mut self, tok: DeclTok) -> Result<NodeId, Error> {
        let pos = self.here();
        self.advance(); // keyword

        let mut specs = Vec::new();
        let lparen = self.at_op("(");
        if lparen {
            self.advance();
            self.skip_semis();
            while !self.at_op(")") {
                specs.push(self.parse_spec(tok)?);
                self.skip_semis();
            }
            self.expect_op(")")?;
        } else {
            specs.push(self.parse_spec(tok)?);
        }

        Ok(self.tree.alloc(Node::GenDecl { tok, lparen, specs }, pos))
    }

    fn parse_spec(&mut self, tok: DeclTok) -> Result<NodeId, Error> {
        let pos = self.here();
        match tok {
            DeclTok::Import => {
                // Optional alias identifier before the path.
                let name = if matches!(self.peek(), GoTok::Ident(n) if !is_keyword(n)) {
                    Some(self.expect_ident()?)
                } else {
                    None
                };
                let path = match self.peek() {
                    GoTok::Str(value) => {
                        let value = value.clone();
                        self.advance();
                        self.tree.alloc(
                            Node::BasicLit {
                                lit_kind: LitKind::Str,
                                value,
                            },
                            pos,
                        )
                    }
                    _ => return Err(self.error("import path string")),
                };
                Ok(self.tree.alloc(Node::ImportSpec { name, path }, pos))
            }
            DeclTok::Type => {
                let name = self.expect_ident()?;
                let typ = self.parse_type()?;
                Ok(self.tree.alloc(Node::TypeSpec { name, typ }, pos))
            }
            DeclTok::Const | DeclTok::Var => {
                let mut names = vec![self.expect_ident()?];
                while self.at_op(",") {
                    self.advance();
                    names.push(self.expect_ident()?);
                }
                let typ = if !self.at_op("=") && !self.at_op(";") && !self.at_op(")") {
                    Some(self.parse_type()?)
                } else {
                    None
                };
                let mut values = Vec::new();
                if self.at_op("=") {
                    self.advance();
                    values.push(self.parse_expr()?);
                    while self.at_op(",") {
                        self.advance();
                        values.push(self.parse_expr()?);
                    }
                }
                Ok(self.tree.alloc(Node::ValueSpec { names, typ, values }, pos))
            }
        }
    }

    fn parse_func_decl(&mut self) -> Result<NodeId, Error> {
        let pos = self.here();
        self.expect_keyword("func")?;

        let recv = if self.at_op("(") {
            Some(self.parse_paren_field_list()?)
        } else {
            None
        };

        let name = self.expect_ident()?;
        let typ = self.parse_signature(pos)?;

        let body = if self.at_op("{") {
            Some(self.parse_block()?)
        } else {
            None
        };

        Ok(self.tree.alloc(
            Node::FuncDecl {
                recv,
                name,
                typ,
                body,
            },
            pos,
        ))
    }

    /// `(params) results?` — allocates the `FuncType`.
    fn parse_signature(&mut self, pos: Pos) -> Result<NodeId, Error> {
        let params = self.parse_paren_field_list()?;
        let results = self.parse_results()?;
        Ok(self.tree.alloc(Node::FuncType { params, results }, pos))
    }

    fn parse_results(&mut self) -> Result<Option<NodeId>, Error> {
        if self.at_op("(") {
            return Ok(Some(self.parse_paren_field_list()?));
        }
        if self.starts_type() {
            let pos = self.here();
            let typ = self.parse_type()?;
            let field = self.tree.alloc(
                Node::Field {
                    names: vec![],
                    typ,
                    tag: None,
                },
                pos,
            );
            return Ok(Some(
                self.tree.alloc(Node::FieldList { list: vec![field] }, pos),
            ));
        }
        Ok(None)
    }

    fn starts_type(&self) -> bool {
        match self.peek() {
            GoTok::Ident(name) => {
                !is_keyword(name)
                    || matches!(name.as_str(), "map" | "func" | "interface" | "struct")
            }
            GoTok::Op(op) => matches!(*op, "*" | "[" | "("),
            _ => false,
        }
    }

    /// `(a, b int, c string)` — parses entries, then regroups shared-type
    /// name runs the way go/parser does.
    fn parse_paren_field_list(&mut self) -> Result<NodeId, Error> {
        let pos = self.here();
        self.expect_op("(")?;

        let saved = self.allow_composite;
        self.allow_composite = true;

        let mut entries = Vec::new();
        if !self.at_op(")") {
            entries.push(self.parse_param_entry()?);
            while self.at_op(",") {
                self.advance();
                if self.at_op(")") {
                    break; // trailing comma
                }
                entries.push(self.parse_param_entry()?);
            }
        }
        self.expect_op(")")?;
        self.allow_composite = saved;

        let any_named = entries.iter().any(|e| matches!(e, ParamEntry::Named { .. }));
        let mut list = Vec::new();

        if any_named {
            let mut pending: Vec<NodeId> = Vec::new();
            for entry in entries {
                match entry {
                    ParamEntry::Unnamed(expr) => pending.push(expr),
                    ParamEntry::Named { name, typ } => {
                        pending.push(name);
                        list.push(self.tree.alloc(
                            Node::Field {
                                names: std::mem::take(&mut pending),
                                typ,
                                tag: None,
                            },
                            pos,
                        ));
                    }
                }
            }
            if !pending.is_empty() {
                return Err(Error::TargetParse(format!(
                    "{pos}: mixed named and unnamed parameters"
                )));
            }
        } else {
            for entry in entries {
                let ParamEntry::Unnamed(typ) = entry else {
                    unreachable!()
                };
                list.push(self.tree.alloc(
                    Node::Field {
                        names: vec![],
                        typ,
                        tag: None,
                    },
                    pos,
                ));
            }
        }

        Ok(self.tree.alloc(Node::FieldList { list }, pos))
    }

    fn parse_param_entry(&mut self) -> Result<ParamEntry, Error> {
        if self.at_op("...") {
            let pos = self.here();
            self.advance();
            let elt = Some(self.parse_type()?);
            return Ok(ParamEntry::Unnamed(
                self.tree.alloc(Node::Ellipsis { elt }, pos),
            ));
        }

        let first = self.parse_type()?;

        // A name is a bare identifier followed by something that starts a
        // type (or `...`).
        let is_bare_ident = matches!(self.tree.node(first), Node::Ident { .. });
        if is_bare_ident && (self.starts_type() || self.at_op("...")) {
            let typ = if self.at_op("...") {
                let pos = self.here();
                self.advance();
                let elt = Some(self.parse_type()?);
                self.tree.alloc(Node::Ellipsis { elt }, pos)
            } else {
                self.parse_type()?
            };
            return Ok(ParamEntry::Named { name: first, typ });
        }

        Ok(ParamEntry::Unnamed(first))
    }

    // --- Types ---

    fn parse_type(&mut self) -> Result<NodeId, Error> {
        let pos = self.here();

        if self.at_op("*") {
            self.advance();
            let x = self.parse_type()?;
            return Ok(self.tree.alloc(Node::StarExpr { x }, pos));
        }

        if self.at_op("[") {
            self.advance();
            let len = if self.at_op("]") {
                None
            } else {
                Some(self.parse_expr()?)
            };
            self.expect_op("]")?;
            let elt = self.parse_type()?;
            return Ok(self.tree.alloc(Node::ArrayType { len, elt }, pos));
        }

        if self.at_op("(") {
            self.advance();
            let x = self.parse_type()?;
            self.expect_op(")")?;
            return Ok(self.tree.alloc(Node::ParenExpr { x }, pos));
        }

        if self.at_keyword("map") {
            self.advance();
            self.expect_op("[")?;
            let key = self.parse_type()?;
            self.expect_op("]")?;
            let value = self.parse_type()?;
            return Ok(self.tree.alloc(Node::MapType { key, value }, pos));
        }

        if self.at_keyword("func") {
            self.advance();
            return self.parse_signature(pos);
        }

        if self.at_keyword("struct") {
            self.advance();
            let fields = self.parse_struct_fields()?;
            return Ok(self.tree.alloc(Node::StructType { fields }, pos));
        }

        if self.at_keyword("interface") {
            self.advance();
            let methods = self.parse_interface_methods()?;
            return Ok(self.tree.alloc(Node::InterfaceType { methods }, pos));
        }

        if self.at_keyword("chan") || (self.at_op("<-") && matches!(self.peek_at(1), GoTok::Ident(n) if n == "chan"))
        {
            return Err(Error::TargetParse(format!(
                "{pos}: channel types are not supported"
            )));
        }

        // Named or qualified type.
        if matches!(self.peek(), GoTok::Ident(name) if !is_keyword(name)) {
            let ident = self.expect_ident()?;
            if self.at_op(".") {
                self.advance();
                let sel = self.expect_ident()?;
                return Ok(self.tree.alloc(Node::SelectorExpr { x: ident, sel }, pos));
            }
            return Ok(ident);
        }

        Err(self.error("type"))
    }

    fn parse_struct_fields(&mut self) -> Result<NodeId, Error> {
        let pos = self.here();
        self.expect_op("{")?;
        self.skip_semis();

        let mut list = Vec::new();
        while !self.at_op("}") {
            let field_pos = self.here();

            // `ID string` / `a, b int` are named; `http.Client` is embedded.
            let named = matches!(self.peek(), GoTok::Ident(n) if !is_keyword(n))
                && (self.starts_type_at(1)
                    || matches!(self.peek_at(1), GoTok::Op(op) if *op == ","));

            let (names, typ) = if named {
                let mut names = vec![self.expect_ident()?];
                while self.at_op(",") {
                    self.advance();
                    names.push(self.expect_ident()?);
                }
                (names, self.parse_type()?)
            } else {
                (vec![], self.parse_type()?)
            };

            let tag = match self.peek() {
                GoTok::RawStr(value) | GoTok::Str(value) => {
                    let value = value.clone();
                    let tag_pos = self.here();
                    self.advance();
                    Some(self.tree.alloc(
                        Node::BasicLit {
                            lit_kind: LitKind::Str,
                            value,
                        },
                        tag_pos,
                    ))
                }
                _ => None,
            };

            list.push(
                self.tree
                    .alloc(Node::Field { names, typ, tag }, field_pos),
            );
            self.skip_semis();
        }
        self.expect_op("}")?;

        Ok(self.tree.alloc(Node::FieldList { list }, pos))
    }

    fn starts_type_at(&self, offset: usize) -> bool {
        match self.peek_at(offset) {
            GoTok::Ident(name) => {
                !is_keyword(name)
                    || matches!(name.as_str(), "map" | "func" | "interface" | "struct")
            }
            GoTok::Op(op) => matches!(*op, "*" | "["),
            _ => false,
        }
    }

    fn parse_interface_methods(&mut self) -> Result<NodeId, Error> {
        let pos = self.here();
        self.expect_op("{")?;
        self.skip_semis();

        let mut list = Vec::new();
        while !self.at_op("}") {
            let field_pos = self.here();
            if matches!(self.peek(), GoTok::Ident(n) if !is_keyword(n))
                && matches!(self.peek_at(1), GoTok::Op("("))
            {
                let name = self.expect_ident()?;
                let typ = self.parse_signature(field_pos)?;
                list.push(self.tree.alloc(
                    Node::Field {
                        names: vec![name],
                        typ,
                        tag: None,
                    },
                    field_pos,
                ));
            } else {
                let typ = self.parse_type()?;
                list.push(self.tree.alloc(
                    Node::Field {
                        names: vec![],
                        typ,
                        tag: None,
                    },
                    field_pos,
                ));
            }
            self.skip_semis();
        }
        self.expect_op("}")?;

        Ok(self.tree.alloc(Node::FieldList { list }, pos))
    }

    // --- Statements ---

    fn parse_block(&mut self) -> Result<NodeId, Error> {
        let pos = self.here();
        self.expect_op("{")?;

        let saved = self.allow_composite;
        self.allow_composite = true;

        let mut list = Vec::new();
        self.skip_semis();
        while !self.at_op("}") {
            list.push(self.parse_stmt()?);
            self.skip_semis();
        }
        self.expect_op("}")?;
        self.allow_composite = saved;

        Ok(self.tree.alloc(Node::BlockStmt { list }, pos))
    }

    fn parse_stmt(&mut self) -> Result<NodeId, Error> {
        let pos = self.here();

        if self.at_keyword("var") || self.at_keyword("const") || self.at_keyword("type") {
            let tok = if self.at_keyword("var") {
                DeclTok::Var
            } else if self.at_keyword("const") {
                DeclTok::Const
            } else {
                DeclTok::Type
            };
            let decl = self.parse_gen_decl(tok)?;
            return Ok(self.tree.alloc(Node::DeclStmt { decl }, pos));
        }

        if self.at_keyword("return") {
            self.advance();
            let mut results = Vec::new();
            if !self.at_op(";") && !self.at_op("}") {
                results.push(self.parse_expr()?);
                while self.at_op(",") {
                    self.advance();
                    results.push(self.parse_expr()?);
                }
            }
            return Ok(self.tree.alloc(Node::ReturnStmt { results }, pos));
        }

        if self.at_keyword("defer") {
            self.advance();
            let call = self.parse_expr()?;
            return Ok(self.tree.alloc(Node::DeferStmt { call }, pos));
        }

        if self.at_keyword("go") {
            self.advance();
            let call = self.parse_expr()?;
            return Ok(self.tree.alloc(Node::GoStmt { call }, pos));
        }

        if self.at_keyword("if") {
            return self.parse_if();
        }

        if self.at_keyword("for") {
            return self.parse_for();
        }

        if self.at_keyword("switch") {
            return self.parse_switch();
        }

        if self.at_keyword("break") || self.at_keyword("continue") {
            let tok = match self.peek() {
                GoTok::Ident(name) => name.clone(),
                _ => unreachable!(),
            };
            self.advance();
            return Ok(self.tree.alloc(Node::BranchStmt { tok }, pos));
        }

        if self.at_op("{") {
            return self.parse_block();
        }

        self.parse_simple_stmt()
    }

    /// Expression statement, assignment, short declaration, or inc/dec.
    fn parse_simple_stmt(&mut self) -> Result<NodeId, Error> {
        let pos = self.here();
        let mut lhs = vec![self.parse_expr()?];
        while self.at_op(",") {
            self.advance();
            lhs.push(self.parse_expr()?);
        }

        if let GoTok::Op(op) = self.peek() {
            if matches!(
                *op,
                ":=" | "=" | "+=" | "-=" | "*=" | "/=" | "%=" | "&=" | "|=" | "^="
            ) {
                let tok = op.to_string();
                self.advance();
                let mut rhs = vec![self.parse_expr()?];
                while self.at_op(",") {
                    self.advance();
                    rhs.push(self.parse_expr()?);
                }
                return Ok(self.tree.alloc(Node::AssignStmt { lhs, tok, rhs }, pos));
            }
            if matches!(*op, "++" | "--") {
                let op = op.to_string();
                self.advance();
                return Ok(self.tree.alloc(
                    Node::IncDecStmt {
                        x: lhs[0],
                        op,
                    },
                    pos,
                ));
            }
        }

        if lhs.len() != 1 {
            return Err(self.error("assignment"));
        }
        Ok(self.tree.alloc(Node::ExprStmt { x: lhs[0] }, pos))
    }

    /// Unwrap an `ExprStmt` parsed in a header position back to its
    /// expression; anything else is a malformed condition.
    fn stmt_expr(&self, stmt: NodeId) -> Result<NodeId, Error> {
        match self.tree.node(stmt) {
            Node::ExprStmt { x } => Ok(*x),
            _ => Err(Error::TargetParse(format!(
                "{}: expected condition expression",
                self.here()
            ))),
        }
    }

    fn parse_if(&mut self) -> Result<NodeId, Error> {
        let pos = self.here();
        self.expect_keyword("if")?;

        let saved = self.allow_composite;
        self.allow_composite = false;
        let first = self.parse_simple_stmt()?;

        let (init, cond) = if self.at_op(";") {
            self.advance();
            let cond = self.parse_expr()?;
            (Some(first), cond)
        } else {
            (None, self.stmt_expr(first)?)
        };
        self.allow_composite = saved;

        let body = self.parse_block()?;

        let els = if self.at_keyword("else") {
            self.advance();
            if self.at_keyword("if") {
                Some(self.parse_if()?)
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };

        Ok(self.tree.alloc(
            Node::IfStmt {
                init,
                cond,
                body,
                els,
            },
            pos,
        ))
    }

    fn parse_for(&mut self) -> Result<NodeId, Error> {
        let pos = self.here();
        self.expect_keyword("for")?;

        if self.at_op("{") {
            let body = self.parse_block()?;
            return Ok(self.tree.alloc(
                Node::ForStmt {
                    init: None,
                    cond: None,
                    post: None,
                    body,
                },
                pos,
            ));
        }

        let saved = self.allow_composite;
        self.allow_composite = false;

        // `for k, v := range xs { … }`
        if let Some(range_stmt) = self.try_parse_range(pos)? {
            self.allow_composite = saved;
            return Ok(range_stmt);
        }

        let first = self.parse_simple_stmt()?;

        let stmt = if self.at_op("{") {
            // `for cond { … }`
            let cond = self.stmt_expr(first)?;
            self.allow_composite = saved;
            let body = self.parse_block()?;
            Node::ForStmt {
                init: None,
                cond: Some(cond),
                post: None,
                body,
            }
        } else {
            // `for init; cond; post { … }`
            self.expect_op(";")?;
            let cond = if self.at_op(";") {
                None
            } else {
                Some(self.parse_expr()?)
            };
            self.expect_op(";")?;
            let post = if self.at_op("{") {
                None
            } else {
                Some(self.parse_simple_stmt()?)
            };
            self.allow_composite = saved;
            let body = self.parse_block()?;
            Node::ForStmt {
                init: Some(first),
                cond,
                post,
                body,
            }
        };

        Ok(self.tree.alloc(stmt, pos))
    }

    /// Lookahead for the range form: `ident [, ident] := range` or
    /// `ident [, ident] = range`.
    fn try_parse_range(&mut self, pos: Pos) -> Result<Option<NodeId>, Error> {
        let is_range = |parser: &Self, at: usize| {
            matches!(parser.peek_at(at), GoTok::Ident(n) if n == "range")
        };
        let assign_then_range = |parser: &Self, at: usize| {
            matches!(parser.peek_at(at), GoTok::Op(op) if matches!(*op, ":=" | "="))
                && is_range(parser, at + 1)
        };

        let has_value = if matches!(self.peek(), GoTok::Ident(n) if !is_keyword(n)) {
            if assign_then_range(self, 1) {
                false
            } else if matches!(self.peek_at(1), GoTok::Op(","))
                && matches!(self.peek_at(2), GoTok::Ident(n) if !is_keyword(n))
                && assign_then_range(self, 3)
            {
                true
            } else {
                return Ok(None);
            }
        } else {
            return Ok(None);
        };

        let key = Some(self.expect_ident()?);
        let value = if has_value {
            self.expect_op(",")?;
            Some(self.expect_ident()?)
        } else {
            None
        };

        let tok = match self.peek() {
            GoTok::Op(op) => op.to_string(),
            _ => unreachable!(),
        };
        self.advance();
        self.expect_keyword("range")?;
        let x = self.parse_expr()?;

        let saved = self.allow_composite;
        self.allow_composite = true;
        let body = self.parse_block()?;
        self.allow_composite = saved;

        Ok(Some(self.tree.alloc(
            Node::RangeStmt {
                key,
                value,
                tok,
                x,
                body,
            },
            pos,
        )))
    }

    fn parse_switch(&mut self) -> Result<NodeId, Error> {
        let pos = self.here();
        self.expect_keyword("switch")?;

        let saved = self.allow_composite;
        self.allow_composite = false;

        let (init, tag) = if self.at_op("{") {
            (None, None)
        } else {
            let first = self.parse_simple_stmt()?;
            if self.at_op(";") {
                self.advance();
                if self.at_op("{") {
                    (Some(first), None)
                } else {
                    let tag_stmt = self.parse_simple_stmt()?;
                    (Some(first), Some(self.stmt_expr(tag_stmt)?))
                }
            } else {
                (None, Some(self.stmt_expr(first)?))
            }
        };
        self.allow_composite = saved;

        self.expect_op("{")?;
        self.skip_semis();

        let mut body = Vec::new();
        while !self.at_op("}") {
            let case_pos = self.here();
            let list = if self.at_keyword("case") {
                self.advance();
                let mut list = vec![self.parse_expr()?];
                while self.at_op(",") {
                    self.advance();
                    list.push(self.parse_expr()?);
                }
                list
            } else {
                self.expect_keyword("default")?;
                vec![]
            };
            self.expect_op(":")?;

            let mut stmts = Vec::new();
            self.skip_semis();
            while !self.at_op("}") && !self.at_keyword("case") && !self.at_keyword("default") {
                stmts.push(self.parse_stmt()?);
                self.skip_semis();
            }
            body.push(
                self.tree
                    .alloc(Node::CaseClause { list, body: stmts }, case_pos),
            );
        }
        self.expect_op("}")?;

        Ok(self.tree.alloc(Node::SwitchStmt { init, tag, body }, pos))
    }

    // --- Expressions ---

    fn parse_expr(&mut self) -> Result<NodeId, Error> {
        self.parse_binary(1)
    }

    fn binary_prec(op: &str) -> Option<u8> {
        match op {
            "||" => Some(1),
            "&&" => Some(2),
            "==" | "!=" | "<" | "<=" | ">" | ">=" => Some(3),
            "+" | "-" | "|" | "^" => Some(4),
            "*" | "/" | "%" | "<<" | ">>" | "&" | "&^" => Some(5),
            _ => None,
        }
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<NodeId, Error> {
        let mut x = self.parse_unary()?;

        loop {
            let (op, prec) = match self.peek() {
                GoTok::Op(op) => match Self::binary_prec(op) {
                    Some(prec) if prec >= min_prec => (op.to_string(), prec),
                    _ => break,
                },
                _ => break,
            };
            let pos = self.here();
            self.advance();
            let y = self.parse_binary(prec + 1)?;
            x = self.tree.alloc(Node::BinaryExpr { x, op, y }, pos);
        }

        Ok(x)
    }

    fn parse_unary(&mut self) -> Result<NodeId, Error> {
        let pos = self.here();
        if let GoTok::Op(op) = self.peek() {
            match *op {
                "*" => {
                    self.advance();
                    let x = self.parse_unary()?;
                    return Ok(self.tree.alloc(Node::StarExpr { x }, pos));
                }
                "+" | "-" | "!" | "^" | "&" | "<-" => {
                    let op = op.to_string();
                    self.advance();
                    let x = self.parse_unary()?;
                    return Ok(self.tree.alloc(Node::UnaryExpr { op, x }, pos));
                }
                _ => {}
            }
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<NodeId, Error> {
        let mut x = self.parse_operand()?;

        loop {
            let pos = self.here();
            if self.at_op(".") {
                self.advance();
                let sel = self.expect_ident()?;
                x = self.tree.alloc(Node::SelectorExpr { x, sel }, pos);
            } else if self.at_op("(") {
                self.advance();
                let saved = self.allow_composite;
                self.allow_composite = true;
                let mut args = Vec::new();
                if !self.at_op(")") {
                    args.push(self.parse_expr()?);
                    while self.at_op(",") {
                        self.advance();
                        if self.at_op(")") {
                            break;
                        }
                        args.push(self.parse_expr()?);
                    }
                }
                self.expect_op(")")?;
                self.allow_composite = saved;
                x = self.tree.alloc(Node::CallExpr { fun: x, args }, pos);
            } else if self.at_op("[") {
                self.advance();
                let saved = self.allow_composite;
                self.allow_composite = true;
                let index = self.parse_expr()?;
                self.expect_op("]")?;
                self.allow_composite = saved;
                x = self.tree.alloc(Node::IndexExpr { x, index }, pos);
            } else if self.at_op("{") && self.allow_composite && self.is_literal_type(x) {
                x = self.parse_composite_lit(Some(x))?;
            } else {
                break;
            }
        }

        Ok(x)
    }

    /// Whether an already-parsed expression can head a composite literal.
    fn is_literal_type(&self, x: NodeId) -> bool {
        matches!(
            self.tree.node(x),
            Node::Ident { .. }
                | Node::SelectorExpr { .. }
                | Node::ArrayType { .. }
                | Node::MapType { .. }
                | Node::StructType { .. }
        )
    }

    fn parse_composite_lit(&mut self, typ: Option<NodeId>) -> Result<NodeId, Error> {
        let pos = self.here();
        self.expect_op("{")?;

        let saved = self.allow_composite;
        self.allow_composite = true;

        let mut elts = Vec::new();
        self.skip_semis();
        while !self.at_op("}") {
            let elt_pos = self.here();
            let elt = if self.at_op("{") {
                // Nested untyped literal element.
                self.parse_composite_lit(None)?
            } else {
                self.parse_expr()?
            };
            let elt = if self.at_op(":") {
                self.advance();
                let value = if self.at_op("{") {
                    self.parse_composite_lit(None)?
                } else {
                    self.parse_expr()?
                };
                self.tree
                    .alloc(Node::KeyValueExpr { key: elt, value }, elt_pos)
            } else {
                elt
            };
            elts.push(elt);

            if self.at_op(",") {
                self.advance();
                self.skip_semis();
            } else {
                break;
            }
        }
        self.skip_semis();
        self.expect_op("}")?;
        self.allow_composite = saved;

        Ok(self.tree.alloc(Node::CompositeLit { typ, elts }, pos))
    }

    fn parse_operand(&mut self) -> Result<NodeId, Error> {
        let pos = self.here();

        match self.peek().clone() {
            GoTok::Int(value) => {
                self.advance();
                Ok(self.tree.alloc(
                    Node::BasicLit {
                        lit_kind: LitKind::Int,
                        value,
                    },
                    pos,
                ))
            }
            GoTok::Float(value) => {
                self.advance();
                Ok(self.tree.alloc(
                    Node::BasicLit {
                        lit_kind: LitKind::Float,
                        value,
                    },
                    pos,
                ))
            }
            GoTok::Str(value) | GoTok::RawStr(value) => {
                self.advance();
                Ok(self.tree.alloc(
                    Node::BasicLit {
                        lit_kind: LitKind::Str,
                        value,
                    },
                    pos,
                ))
            }
            GoTok::Char(value) => {
                self.advance();
                Ok(self.tree.alloc(
                    Node::BasicLit {
                        lit_kind: LitKind::Char,
                        value,
                    },
                    pos,
                ))
            }
            GoTok::Op("(") => {
                self.advance();
                let saved = self.allow_composite;
                self.allow_composite = true;
                let x = self.parse_expr()?;
                self.expect_op(")")?;
                self.allow_composite = saved;
                Ok(self.tree.alloc(Node::ParenExpr { x }, pos))
            }
            GoTok::Op("[") => self.parse_type(),
            GoTok::Ident(name) if name == "func" => {
                self.advance();
                let typ = self.parse_signature(pos)?;
                if self.at_op("{") {
                    let body = self.parse_block()?;
                    Ok(self.tree.alloc(Node::FuncLit { typ, body }, pos))
                } else {
                    Ok(typ)
                }
            }
            GoTok::Ident(name)
                if matches!(name.as_str(), "map" | "struct" | "interface") =>
            {
                self.parse_type()
            }
            GoTok::Ident(name) if !is_keyword(&name) => {
                self.advance();
                Ok(self.tree.alloc(Node::Ident { name }, pos))
            }
            _ => Err(self.error("expression")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gotree::Value;

    fn parse(src: &str) -> (Tree, NodeId) {
        parse_file(src).unwrap()
    }

    fn func_names(tree: &Tree, file: NodeId) -> Vec<String> {
        let mut names = Vec::new();
        tree.walk(file, &mut |id| {
            if let Node::FuncDecl { name, .. } = tree.node(id) {
                names.push(tree.ident_name(*name).unwrap().to_string());
            }
        });
        names
    }

    #[test]
    fn parse_two_function_file() {
        let (tree, file) = parse(
            "package m\n\
             func Hello(n string) string { return n }\n\
             func Goodbye() {}\n",
        );
        assert_eq!(func_names(&tree, file), vec!["Hello", "Goodbye"]);
    }

    #[test]
    fn parse_method_with_pointer_receiver() {
        let (tree, file) = parse(
            "package m\n\
             type S struct{}\n\
             func (s *S) Get(id string) error { return nil }\n",
        );
        let mut found = false;
        tree.walk(file, &mut |id| {
            if let Node::FuncDecl {
                recv: Some(recv), ..
            } = tree.node(id)
            {
                found = true;
                match tree.field(*recv, "list") {
                    Value::List(fields) => assert_eq!(fields.len(), 1),
                    other => panic!("expected list, got {other:?}"),
                }
            }
        });
        assert!(found, "expected a method declaration");
    }

    #[test]
    fn parse_grouped_imports() {
        let (tree, file) = parse(
            "package m\n\
             import (\n\t\"fmt\"\n\t\"net/http\"\n)\n",
        );
        let mut paths = Vec::new();
        tree.walk(file, &mut |id| {
            if let Node::ImportSpec { path, .. } = tree.node(id) {
                if let Node::BasicLit { value, .. } = tree.node(*path) {
                    paths.push(value.clone());
                }
            }
        });
        assert_eq!(paths, vec!["\"fmt\"", "\"net/http\""]);
    }

    #[test]
    fn parse_struct_with_tags() {
        let (tree, file) = parse(
            "package m\n\
             type User struct {\n\
             \tID   string `json:\"id\"`\n\
             \tName string `json:\"name\"`\n\
             }\n",
        );
        let mut tags = 0;
        tree.walk(file, &mut |id| {
            if let Node::Field { tag: Some(_), .. } = tree.node(id) {
                tags += 1;
            }
        });
        assert_eq!(tags, 2);
    }

    #[test]
    fn parse_shared_param_type() {
        // `a, b int` groups into one field with two names.
        let (tree, file) = parse("package m\nfunc F(a, b int, c string) {}\n");
        let mut field_shapes = Vec::new();
        tree.walk(file, &mut |id| {
            if let Node::Field { names, .. } = tree.node(id) {
                field_shapes.push(names.len());
            }
        });
        assert_eq!(field_shapes, vec![2, 1]);
    }

    #[test]
    fn parse_if_with_init() {
        let (tree, file) = parse(
            "package m\n\
             import \"strconv\"\n\
             func F(s string) int {\n\
             \tif n, err := strconv.Atoi(s); err == nil {\n\
             \t\treturn n\n\
             \t}\n\
             \treturn 0\n\
             }\n",
        );
        let mut saw_if_with_init = false;
        tree.walk(file, &mut |id| {
            if let Node::IfStmt { init: Some(_), .. } = tree.node(id) {
                saw_if_with_init = true;
            }
        });
        assert!(saw_if_with_init);
    }

    #[test]
    fn parse_defer_and_multi_assign() {
        let (tree, file) = parse(
            "package m\n\
             func F() error {\n\
             \tresp, err := get()\n\
             \tif err != nil {\n\
             \t\treturn err\n\
             \t}\n\
             \tdefer resp.Body.Close()\n\
             \treturn nil\n\
             }\n",
        );
        let mut saw_defer = false;
        let mut saw_define = false;
        tree.walk(file, &mut |id| match tree.node(id) {
            Node::DeferStmt { .. } => saw_defer = true,
            Node::AssignStmt { tok, lhs, .. } if tok == ":=" => {
                saw_define = true;
                assert_eq!(lhs.len(), 2);
            }
            _ => {}
        });
        assert!(saw_defer && saw_define);
    }

    #[test]
    fn parse_for_and_range() {
        let (tree, file) = parse(
            "package m\n\
             func F(xs []int) int {\n\
             \ttotal := 0\n\
             \tfor i := 0; i < 10; i++ {\n\
             \t\ttotal += i\n\
             \t}\n\
             \tfor _, x := range xs {\n\
             \t\ttotal += x\n\
             \t}\n\
             \treturn total\n\
             }\n",
        );
        let mut fors = 0;
        let mut ranges = 0;
        tree.walk(file, &mut |id| match tree.node(id) {
            Node::ForStmt { .. } => fors += 1,
            Node::RangeStmt { .. } => ranges += 1,
            _ => {}
        });
        assert_eq!((fors, ranges), (1, 1));
    }

    #[test]
    fn parse_switch_with_cases() {
        let (tree, file) = parse(
            "package m\n\
             func F(n int) string {\n\
             \tswitch n {\n\
             \tcase 0, 1:\n\
             \t\treturn \"small\"\n\
             \tdefault:\n\
             \t\treturn \"big\"\n\
             \t}\n\
             }\n",
        );
        let mut cases = 0;
        tree.walk(file, &mut |id| {
            if matches!(tree.node(id), Node::CaseClause { .. }) {
                cases += 1;
            }
        });
        assert_eq!(cases, 2);
    }

    #[test]
    fn parse_composite_literal() {
        let (tree, file) = parse(
            "package m\n\
             func F() User {\n\
             \treturn User{ID: \"1\", Name: \"x\"}\n\
             }\n",
        );
        let mut kv = 0;
        tree.walk(file, &mut |id| {
            if matches!(tree.node(id), Node::KeyValueExpr { .. }) {
                kv += 1;
            }
        });
        assert_eq!(kv, 2);
    }

    #[test]
    fn composite_literal_not_confused_with_if_body() {
        // `v` in the header must not swallow `{` as a composite literal.
        let (tree, file) = parse(
            "package m\n\
             func F(v bool) {\n\
             \tif v {\n\
             \t\treturn\n\
             \t}\n\
             }\n",
        );
        let mut saw_if = false;
        tree.walk(file, &mut |id| {
            if matches!(tree.node(id), Node::IfStmt { .. }) {
                saw_if = true;
            }
        });
        assert!(saw_if);
    }

    #[test]
    fn parse_binary_precedence() {
        let (tree, file) = parse("package m\nvar x = 1 + 2*3\n");
        // Root of the initializer must be `+`, with `*` nested under it.
        let mut root_op = None;
        tree.walk(file, &mut |id| {
            if let Node::ValueSpec { values, .. } = tree.node(id) {
                if let Node::BinaryExpr { op, .. } = tree.node(values[0]) {
                    root_op = Some(op.clone());
                }
            }
        });
        assert_eq!(root_op.as_deref(), Some("+"));
    }

    #[test]
    fn parse_statements_into_existing_tree() {
        let (mut tree, file) = parse("package m\nfunc F() {}\n");
        let before = {
            let mut count = 0;
            tree.walk(file, &mut |_| count += 1);
            count
        };

        let stmts = parse_statements(
            &mut tree,
            "ctx, cancel := context.WithTimeout(ctx, 30*time.Second)\ndefer cancel()",
        )
        .unwrap();
        assert_eq!(stmts.len(), 2);
        assert!(matches!(tree.node(stmts[0]), Node::AssignStmt { .. }));
        assert!(matches!(tree.node(stmts[1]), Node::DeferStmt { .. }));

        // The original file subtree is untouched.
        let after = {
            let mut count = 0;
            tree.walk(file, &mut |_| count += 1);
            count
        };
        assert_eq!(before, after);
    }

    #[test]
    fn parse_error_is_positioned() {
        let err = parse_file("package m\nfunc F( {}\n").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("target parse error"), "got: {msg}");
        assert!(msg.contains("2:"), "got: {msg}");
    }

    #[test]
    fn channel_types_rejected() {
        let err = parse_file("package m\nvar c chan int\n").unwrap_err();
        assert!(err.to_string().contains("channel types"), "got: {err}");
    }
}
