//! Rule language parser.
//!
//! Recursive descent over the token stream from `rule::lexer`. Alternations
//! resolve in declaration order (first match wins) and every decision point
//! needs at most a handful of tokens of lookahead. The parser performs no
//! semantic checks: a rule that references an unbound `$Name` parses fine and
//! fails later in the matcher or executor.

use crate::error::Error;
use crate::rule::ast::*;
use crate::rule::lexer::{Lexer, Pos, Token, TokenKind};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

/// Parse a complete `.lift` source string.
pub fn parse_program(input: &str) -> Result<Program, Error> {
    let tokens = Lexer::new(input).tokenize()?;
    Parser::new(tokens).parse()
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn peek_at(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + offset).map(|t| &t.kind)
    }

    fn advance(&mut self) -> Option<&Token> {
        let tok = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(tok)
    }

    /// Position of the current token, or of the end of input.
    fn here(&self) -> Pos {
        match self.tokens.get(self.pos).or_else(|| self.tokens.last()) {
            Some(t) => t.pos,
            None => Pos { line: 1, column: 1 },
        }
    }

    fn error(&self, expected: &str) -> Error {
        let found = match self.peek() {
            Some(kind) => kind.describe(),
            None => "end of input".to_string(),
        };
        Error::parse(self.here(), format!("expected {expected}, found {found}"))
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<(), Error> {
        if self.peek() == Some(&kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(expected))
        }
    }

    fn expect_ident(&mut self, expected: &str) -> Result<String, Error> {
        match self.peek() {
            Some(TokenKind::Ident(name)) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.error(expected)),
        }
    }

    fn expect_string(&mut self, expected: &str) -> Result<String, Error> {
        match self.peek() {
            Some(TokenKind::Str(s)) => {
                let s = s.clone();
                self.advance();
                Ok(s)
            }
            _ => Err(self.error(expected)),
        }
    }

    fn expect_raw_string(&mut self, expected: &str) -> Result<String, Error> {
        match self.peek() {
            Some(TokenKind::RawStr(s)) => {
                let s = s.clone();
                self.advance();
                Ok(s)
            }
            _ => Err(self.error(expected)),
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

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(TokenKind::Ident(name)) if name == keyword)
    }

    /// Binding reference head: `$` Ident.
    fn expect_binding_name(&mut self) -> Result<String, Error> {
        self.expect(TokenKind::Dollar, "`$`")?;
        self.expect_ident("binding name")
    }

    // --- Top level ---

    pub fn parse(&mut self) -> Result<Program, Error> {
        let mut blocks = Vec::new();
        while self.peek().is_some() {
            blocks.push(self.parse_lift_block()?);
        }
        Ok(Program { blocks })
    }

    /// `lift "name" { from … where* action* }`
    fn parse_lift_block(&mut self) -> Result<LiftBlock, Error> {
        self.expect_keyword("lift")?;
        let name = self.expect_string("block name string")?;
        self.expect(TokenKind::LBrace, "`{`")?;

        let from = self.parse_from_clause()?;

        let mut where_clauses = Vec::new();
        while self.at_keyword("where") {
            where_clauses.push(self.parse_where_clause()?);
        }

        let mut actions = Vec::new();
        while self.peek() != Some(&TokenKind::RBrace) {
            actions.push(self.parse_action()?);
        }
        self.expect(TokenKind::RBrace, "`}`")?;

        Ok(LiftBlock {
            name,
            from,
            where_clauses,
            actions,
        })
    }

    /// `from go { matchstmt* }`
    fn parse_from_clause(&mut self) -> Result<FromClause, Error> {
        self.expect_keyword("from")?;
        self.expect_keyword("go")?;
        self.expect(TokenKind::LBrace, "`{`")?;

        let mut matchers = Vec::new();
        while self.at_keyword("match") {
            matchers.push(self.parse_match_stmt()?);
        }
        self.expect(TokenKind::RBrace, "`}` closing from clause")?;

        Ok(FromClause { matchers })
    }

    /// `match TypeSpec { … }` or `match CallExpr in $Body { … }`
    fn parse_match_stmt(&mut self) -> Result<MatchStmt, Error> {
        self.expect_keyword("match")?;
        let node_type = self.expect_ident("node type name")?;

        let scope = if self.at_keyword("in") {
            self.advance();
            Some(self.expect_binding_name()?)
        } else {
            None
        };

        self.expect(TokenKind::LBrace, "`{`")?;
        let fields = self.parse_field_matches()?;
        self.expect(TokenKind::RBrace, "`}` closing match")?;

        Ok(MatchStmt {
            node_type,
            scope,
            fields,
        })
    }

    /// Zero or more `name: value` pairs, up to the closing brace.
    fn parse_field_matches(&mut self) -> Result<Vec<FieldMatch>, Error> {
        let mut fields = Vec::new();
        while matches!(self.peek(), Some(TokenKind::Ident(_))) {
            let name = self.expect_ident("field name")?;
            self.expect(TokenKind::Colon, "`:` after field name")?;
            let value = self.parse_match_value()?;
            fields.push(FieldMatch { name, value });
        }
        Ok(fields)
    }

    fn parse_match_value(&mut self) -> Result<MatchValue, Error> {
        match self.peek() {
            Some(TokenKind::Dollar) => {
                let name = self.expect_binding_name()?;
                if self.peek() == Some(&TokenKind::Spread) {
                    self.advance();
                    Ok(MatchValue::Spread(name))
                } else {
                    Ok(MatchValue::Binding(name))
                }
            }
            Some(TokenKind::Ident(name)) if name == "_" => {
                self.advance();
                Ok(MatchValue::Wildcard)
            }
            Some(TokenKind::Ident(_)) => Ok(MatchValue::Pattern(self.parse_ast_pattern()?)),
            Some(TokenKind::LBracket) => {
                self.advance();
                let mut items = Vec::new();
                if self.peek() != Some(&TokenKind::RBracket) {
                    items.push(self.parse_match_value()?);
                    while self.peek() == Some(&TokenKind::Comma) {
                        self.advance();
                        items.push(self.parse_match_value()?);
                    }
                }
                self.expect(TokenKind::RBracket, "`]` closing list pattern")?;
                Ok(MatchValue::List(items))
            }
            Some(TokenKind::Str(_)) => Ok(MatchValue::Exact(self.expect_string("string")?)),
            _ => Err(self.error("match value (`$X`, `$X...`, pattern, list, string, or `_`)")),
        }
    }

    /// `StructType { fields: … }`
    fn parse_ast_pattern(&mut self) -> Result<AstPattern, Error> {
        let node_type = self.expect_ident("node type name")?;
        self.expect(TokenKind::LBrace, "`{` after node type")?;
        let fields = self.parse_field_matches()?;
        self.expect(TokenKind::RBrace, "`}` closing pattern")?;
        Ok(AstPattern { node_type, fields })
    }

    // --- Where clauses ---

    /// `where { predicate* }`
    fn parse_where_clause(&mut self) -> Result<WhereClause, Error> {
        self.expect_keyword("where")?;
        self.expect(TokenKind::LBrace, "`{`")?;

        let mut predicates = Vec::new();
        while self.peek() != Some(&TokenKind::RBrace) {
            predicates.push(self.parse_predicate()?);
        }
        self.expect(TokenKind::RBrace, "`}` closing where clause")?;

        Ok(WhereClause { predicates })
    }

    fn parse_predicate(&mut self) -> Result<Predicate, Error> {
        if self.at_keyword("not") {
            self.advance();
            return Ok(Predicate::Not(Box::new(self.parse_predicate()?)));
        }

        if self.at_keyword("contains") {
            self.advance();
            self.expect(TokenKind::LParen, "`(`")?;
            let binding = self.expect_binding_name()?;
            self.expect(TokenKind::Comma, "`,`")?;
            let pattern = self.parse_ast_pattern()?;
            self.expect(TokenKind::RParen, "`)` closing contains")?;
            return Ok(Predicate::Contains { binding, pattern });
        }

        if self.at_keyword("len") {
            self.advance();
            self.expect(TokenKind::LParen, "`(`")?;
            let binding = self.expect_binding_name()?;
            self.expect(TokenKind::RParen, "`)`")?;
            let op = self.parse_cmp_op()?;
            let value = match self.peek() {
                Some(TokenKind::Int(n)) => {
                    let n = *n;
                    self.advance();
                    n
                }
                _ => return Err(self.error("integer")),
            };
            return Ok(Predicate::Len { binding, op, value });
        }

        if self.peek() == Some(&TokenKind::Dollar) {
            let binding = self.expect_binding_name()?;
            if self.at_keyword("in") {
                self.advance();
                self.expect(TokenKind::LBracket, "`[`")?;
                let mut values = vec![self.expect_string("string")?];
                while self.peek() == Some(&TokenKind::Comma) {
                    self.advance();
                    values.push(self.expect_string("string")?);
                }
                self.expect(TokenKind::RBracket, "`]` closing membership list")?;
                return Ok(Predicate::Member { binding, values });
            }
            if self.peek() == Some(&TokenKind::Dot) {
                self.advance();
                let prop_name = self.expect_ident("property name")?;
                let property = Property::from_name(&prop_name).ok_or_else(|| {
                    Error::parse(
                        self.here(),
                        format!(
                            "unknown property `{prop_name}` (expected exported, pointer, \
                             slice, map, builtin, or error)"
                        ),
                    )
                })?;
                return Ok(Predicate::Property { binding, property });
            }
            return Err(self.error("`in` or `.` after binding in predicate"));
        }

        Err(self.error("predicate (`not`, `contains`, `len`, `$X in […]`, or `$X.prop`)"))
    }

    fn parse_cmp_op(&mut self) -> Result<CmpOp, Error> {
        let op = match self.peek() {
            Some(TokenKind::Gt) => CmpOp::Gt,
            Some(TokenKind::Ge) => CmpOp::Ge,
            Some(TokenKind::Lt) => CmpOp::Lt,
            Some(TokenKind::Le) => CmpOp::Le,
            Some(TokenKind::EqEq) => CmpOp::Eq,
            Some(TokenKind::NotEq) => CmpOp::Ne,
            _ => return Err(self.error("comparison operator")),
        };
        self.advance();
        Ok(op)
    }

    // --- Actions ---

    fn parse_action(&mut self) -> Result<Action, Error> {
        if self.at_keyword("patch") {
            return self.parse_patch();
        }
        if self.at_keyword("delete") {
            return self.parse_delete();
        }
        if self.at_keyword("insert") {
            return self.parse_insert();
        }
        if self.at_keyword("emit") {
            return self.parse_emit();
        }
        Err(self.error("action (`patch`, `delete`, `insert`, or `emit`)"))
    }

    /// `patch { patchstmt* }`
    fn parse_patch(&mut self) -> Result<Action, Error> {
        self.expect_keyword("patch")?;
        self.expect(TokenKind::LBrace, "`{`")?;
        let stmts = self.parse_patch_stmts()?;
        self.expect(TokenKind::RBrace, "`}` closing patch")?;
        Ok(Action::Patch(stmts))
    }

    fn parse_patch_stmts(&mut self) -> Result<Vec<PatchStmt>, Error> {
        let mut stmts = Vec::new();
        while self.peek() != Some(&TokenKind::RBrace) {
            stmts.push(self.parse_patch_stmt()?);
        }
        Ok(stmts)
    }

    fn parse_patch_stmt(&mut self) -> Result<PatchStmt, Error> {
        if self.at_keyword("if") {
            self.advance();
            let condition = self.parse_predicate()?;
            self.expect(TokenKind::LBrace, "`{`")?;
            let stmts = self.parse_patch_stmts()?;
            self.expect(TokenKind::RBrace, "`}` closing conditional patch")?;
            return Ok(PatchStmt::If { condition, stmts });
        }

        if self.at_keyword("set") {
            self.advance();
            let (binding, path) = self.parse_field_path()?;
            self.expect(TokenKind::Assign, "`=`")?;
            let value = self.parse_expr()?;
            return Ok(PatchStmt::Set {
                binding,
                path,
                value,
            });
        }

        if self.at_keyword("rename") {
            self.advance();
            let binding = self.expect_binding_name()?;
            let new_name = self.expect_string("new name string")?;
            return Ok(PatchStmt::Rename { binding, new_name });
        }

        if self.at_keyword("retype") {
            self.advance();
            let binding = self.expect_binding_name()?;
            let new_type = self.expect_string("new type string")?;
            return Ok(PatchStmt::Retype { binding, new_type });
        }

        Err(self.error("patch statement (`if`, `set`, `rename`, or `retype`)"))
    }

    /// `$Field.type.name` — binding plus dotted segments.
    fn parse_field_path(&mut self) -> Result<(String, Vec<String>), Error> {
        let binding = self.expect_binding_name()?;
        let mut path = Vec::new();
        while self.peek() == Some(&TokenKind::Dot) {
            self.advance();
            path.push(self.expect_ident("path segment")?);
        }
        Ok((binding, path))
    }

    fn parse_expr(&mut self) -> Result<Expr, Error> {
        match self.peek() {
            Some(TokenKind::Dollar) => Ok(Expr::Ref(self.parse_binding_ref()?)),
            Some(TokenKind::Str(_)) => Ok(Expr::Str(self.expect_string("string")?)),
            Some(TokenKind::Int(n)) => {
                let n = *n;
                self.advance();
                Ok(Expr::Int(n))
            }
            _ => Err(self.error("expression (`$X`, string, or integer)")),
        }
    }

    /// `delete { (remove <fieldpath>)* }`
    fn parse_delete(&mut self) -> Result<Action, Error> {
        self.expect_keyword("delete")?;
        self.expect(TokenKind::LBrace, "`{`")?;
        let mut stmts = Vec::new();
        while self.at_keyword("remove") {
            self.advance();
            let (binding, path) = self.parse_field_path()?;
            stmts.push(DeleteStmt { binding, path });
        }
        self.expect(TokenKind::RBrace, "`}` closing delete")?;
        Ok(Action::Delete(stmts))
    }

    /// `insert ast|code { <position> [$X] <payload>? }`
    fn parse_insert(&mut self) -> Result<Action, Error> {
        self.expect_keyword("insert")?;
        let mode = match self.peek() {
            Some(TokenKind::Ident(name)) if name == "ast" => InsertMode::Ast,
            Some(TokenKind::Ident(name)) if name == "code" => InsertMode::Code,
            _ => return Err(self.error("`ast` or `code`")),
        };
        self.advance();
        self.expect(TokenKind::LBrace, "`{`")?;

        let position = match self.peek() {
            Some(TokenKind::Ident(name)) => match name.as_str() {
                "after" => InsertPos::After,
                "before" => InsertPos::Before,
                "prepend" => InsertPos::Prepend,
                "append" => InsertPos::Append,
                "into" => InsertPos::Into,
                _ => return Err(self.error("insert position")),
            },
            _ => return Err(self.error("insert position")),
        };
        self.advance();

        let target = if self.peek() == Some(&TokenKind::Dollar) {
            Some(self.expect_binding_name()?)
        } else {
            None
        };

        let payload = match self.peek() {
            Some(TokenKind::RawStr(_)) => Some(InsertPayload::Code(
                self.expect_raw_string("code payload")?,
            )),
            Some(TokenKind::Ident(_)) => Some(InsertPayload::Ast(self.parse_ast_build()?)),
            _ => None,
        };

        self.expect(TokenKind::RBrace, "`}` closing insert")?;
        Ok(Action::Insert(InsertAction {
            mode,
            position,
            target,
            payload,
        }))
    }

    /// `emit go { file "x.go" package main ast { … } }`
    fn parse_emit(&mut self) -> Result<Action, Error> {
        self.expect_keyword("emit")?;
        let target_name = self.expect_ident("emit target")?;
        let target = EmitTarget::from_name(&target_name).ok_or_else(|| {
            Error::parse(
                self.here(),
                format!(
                    "unknown emit target `{target_name}` (expected go, proto, sql, graphql, \
                     json, yaml, or toml)"
                ),
            )
        })?;

        self.expect(TokenKind::LBrace, "`{`")?;
        self.expect_keyword("file")?;
        let file = self.expect_string("file name string")?;

        let package = if self.at_keyword("package") {
            self.advance();
            Some(self.expect_ident("package name")?)
        } else {
            None
        };

        let body = if self.at_keyword("ast") {
            self.advance();
            self.expect(TokenKind::LBrace, "`{`")?;
            let build = self.parse_ast_build()?;
            self.expect(TokenKind::RBrace, "`}` closing ast body")?;
            Some(EmitBody::Ast(build))
        } else if self.at_keyword("code") {
            self.advance();
            self.expect(TokenKind::LBrace, "`{`")?;
            let text = self.expect_raw_string("raw string")?;
            self.expect(TokenKind::RBrace, "`}` closing code body")?;
            Some(EmitBody::Code(text))
        } else if self.at_keyword("template") {
            self.advance();
            self.expect(TokenKind::LBrace, "`{`")?;
            let text = self.expect_raw_string("raw string")?;
            self.expect(TokenKind::RBrace, "`}` closing template body")?;
            Some(EmitBody::Template(text))
        } else {
            None
        };

        self.expect(TokenKind::RBrace, "`}` closing emit")?;
        Ok(Action::Emit(EmitAction {
            target,
            file,
            package,
            body,
        }))
    }

    // --- AST construction grammar (emit/insert ast bodies) ---

    /// `GenDecl { tok: "TYPE" specs: … }`
    fn parse_ast_build(&mut self) -> Result<AstBuild, Error> {
        let node_type = self.expect_ident("node type name")?;
        self.expect(TokenKind::LBrace, "`{` after node type")?;

        let mut fields = Vec::new();
        while matches!(self.peek(), Some(TokenKind::Ident(_))) {
            // `for` starts a value, never a field name, so an ident here
            // followed by `:` is always a field.
            if self.peek_at(1) != Some(&TokenKind::Colon) {
                break;
            }
            let name = self.expect_ident("field name")?;
            self.expect(TokenKind::Colon, "`:`")?;
            let value = self.parse_ast_build_value()?;
            fields.push(AstBuildField { name, value });
        }

        self.expect(TokenKind::RBrace, "`}` closing constructor")?;
        Ok(AstBuild { node_type, fields })
    }

    fn parse_ast_build_value(&mut self) -> Result<AstBuildValue, Error> {
        if self.at_keyword("for") {
            self.advance();
            let var = self.expect_binding_name()?;
            self.expect_keyword("in")?;
            let source = self.parse_binding_ref()?;
            self.expect(TokenKind::LBrace, "`{`")?;
            let body = self.parse_ast_build()?;
            self.expect(TokenKind::RBrace, "`}` closing for loop")?;
            return Ok(AstBuildValue::For {
                var,
                source,
                body: Box::new(body),
            });
        }

        match self.peek() {
            Some(TokenKind::Dollar) => Ok(AstBuildValue::Ref(self.parse_binding_ref()?)),
            Some(TokenKind::Ident(_)) => {
                Ok(AstBuildValue::Build(Box::new(self.parse_ast_build()?)))
            }
            Some(TokenKind::LBracket) => {
                self.advance();
                let mut items = Vec::new();
                if self.peek() != Some(&TokenKind::RBracket) {
                    items.push(self.parse_ast_build_value()?);
                    while self.peek() == Some(&TokenKind::Comma) {
                        self.advance();
                        items.push(self.parse_ast_build_value()?);
                    }
                }
                self.expect(TokenKind::RBracket, "`]` closing list")?;
                Ok(AstBuildValue::List(items))
            }
            Some(TokenKind::Str(_)) => Ok(AstBuildValue::Str(self.expect_string("string")?)),
            Some(TokenKind::Int(n)) => {
                let n = *n;
                self.advance();
                Ok(AstBuildValue::Int(n))
            }
            _ => Err(self.error("constructor value")),
        }
    }

    /// `$Name`, `$m.MethodType`, `$f.Type | proto_type`
    fn parse_binding_ref(&mut self) -> Result<BindingRef, Error> {
        let name = self.expect_binding_name()?;
        let field = if self.peek() == Some(&TokenKind::Dot) {
            self.advance();
            Some(self.expect_ident("field name")?)
        } else {
            None
        };
        let mut transforms = Vec::new();
        while self.peek() == Some(&TokenKind::Pipe) {
            self.advance();
            transforms.push(self.expect_ident("transform name")?);
        }
        Ok(BindingRef {
            name,
            field,
            transforms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Program {
        parse_program(input).unwrap()
    }

    #[test]
    fn parse_struct_to_interface_block() {
        let prog = parse(
            r#"
lift "interface-from-struct" {
    from go {
        match TypeSpec {
            name: $Name
            type: StructType {
                fields: $Fields...
            }
        }

        match FuncDecl {
            recv: StarExpr { x: $Name }
            name: $MethodName
            type: $MethodType
        }
    }

    where {
        $Name.exported
        len($Methods) > 0
    }

    emit go {
        file "service.go"
        package main

        ast {
            GenDecl {
                tok: "TYPE"
                specs: TypeSpec {
                    name: "Service"
                    type: InterfaceType {
                        methods: for $m in $Methods {
                            Field {
                                names: [$m.Name]
                                type: $m.MethodType
                            }
                        }
                    }
                }
            }
        }
    }
}
"#,
        );

        assert_eq!(prog.blocks.len(), 1);
        let block = &prog.blocks[0];
        assert_eq!(block.name, "interface-from-struct");
        assert_eq!(block.from.matchers.len(), 2);
        assert_eq!(block.from.matchers[0].node_type, "TypeSpec");
        assert_eq!(block.from.matchers[1].node_type, "FuncDecl");
        assert_eq!(block.where_clauses.len(), 1);
        assert_eq!(block.where_clauses[0].predicates.len(), 2);
        assert_eq!(block.actions.len(), 1);
        match &block.actions[0] {
            Action::Emit(emit) => {
                assert_eq!(emit.target, EmitTarget::Go);
                assert_eq!(emit.file, "service.go");
                assert_eq!(emit.package.as_deref(), Some("main"));
                assert!(matches!(emit.body, Some(EmitBody::Ast(_))));
            }
            other => panic!("expected emit action, got {other:?}"),
        }
    }

    #[test]
    fn parse_deep_match_with_contains() {
        let prog = parse(
            r#"
lift "enforce-ctx-timeout" {
    from go {
        match FuncDecl {
            name: $FuncName
            type: FuncType {
                params: $Params...
                results: $Results...
            }
            body: $Body
        }

        match CallExpr in $Body {
            fun: SelectorExpr {
                sel: $CallName
            }
            args: $CallArgs...
        }
    }

    where {
        $CallName in ["Get", "Post", "Do", "Dial"]
        not contains($Body, CallExpr {
            fun: SelectorExpr {
                x: Ident { name: "context" }
                sel: Ident { name: "WithTimeout" }
            }
        })
    }

    insert code {
        prepend $Body
    }
}
"#,
        );

        let block = &prog.blocks[0];
        let deep = &block.from.matchers[1];
        assert_eq!(deep.scope.as_deref(), Some("Body"));

        let preds = &block.where_clauses[0].predicates;
        match &preds[0] {
            Predicate::Member { values, .. } => assert_eq!(values.len(), 4),
            other => panic!("expected member predicate, got {other:?}"),
        }
        match &preds[1] {
            Predicate::Not(inner) => {
                assert!(matches!(**inner, Predicate::Contains { .. }));
            }
            other => panic!("expected negated contains, got {other:?}"),
        }

        match &block.actions[0] {
            Action::Insert(ins) => {
                assert_eq!(ins.mode, InsertMode::Code);
                assert_eq!(ins.position, InsertPos::Prepend);
                assert_eq!(ins.target.as_deref(), Some("Body"));
                assert!(ins.payload.is_none());
            }
            other => panic!("expected insert action, got {other:?}"),
        }
    }

    #[test]
    fn parse_conditional_patch() {
        let prog = parse(
            r#"
lift "add-ctx-param" {
    from go {
        match FuncDecl {
            name: $FuncName
            type: FuncType {
                params: $Params...
            }
        }
    }

    patch {
        if not contains($Params, Field {
            type: SelectorExpr {
                x: Ident { name: "context" }
                sel: Ident { name: "Context" }
            }
        }) {
            set $Params.first = "ctx context.Context"
        }
    }
}
"#,
        );

        match &prog.blocks[0].actions[0] {
            Action::Patch(stmts) => {
                assert_eq!(stmts.len(), 1);
                match &stmts[0] {
                    PatchStmt::If { condition, stmts } => {
                        assert!(matches!(condition, Predicate::Not(_)));
                        assert_eq!(stmts.len(), 1);
                        match &stmts[0] {
                            PatchStmt::Set { binding, path, .. } => {
                                assert_eq!(binding, "Params");
                                assert_eq!(path, &["first".to_string()]);
                            }
                            other => panic!("expected set, got {other:?}"),
                        }
                    }
                    other => panic!("expected conditional patch, got {other:?}"),
                }
            }
            other => panic!("expected patch action, got {other:?}"),
        }
    }

    #[test]
    fn parse_delete_action() {
        let prog = parse(
            r#"
lift "remove-tags" {
    from go {
        match TypeSpec {
            name: $Name
            type: StructType {
                fields: $Fields...
            }
        }
    }

    delete {
        remove $Fields.tags
    }
}
"#,
        );

        match &prog.blocks[0].actions[0] {
            Action::Delete(stmts) => {
                assert_eq!(stmts.len(), 1);
                assert_eq!(stmts[0].binding, "Fields");
                assert_eq!(stmts[0].path, vec!["tags".to_string()]);
            }
            other => panic!("expected delete action, got {other:?}"),
        }
    }

    #[test]
    fn parse_proto_template_emit() {
        let prog = parse(
            "lift \"proto-from-struct\" {\n\
             \tfrom go {\n\
             \t\tmatch TypeSpec { name: $Name type: StructType { fields: $Fields... } }\n\
             \t}\n\
             \temit proto {\n\
             \t\tfile \"model.proto\"\n\
             \t\ttemplate {`syntax = \"proto3\"; message ${Name} { ${Fields} }`}\n\
             \t}\n\
             }\n",
        );

        match &prog.blocks[0].actions[0] {
            Action::Emit(emit) => {
                assert_eq!(emit.target, EmitTarget::Proto);
                match &emit.body {
                    Some(EmitBody::Template(text)) => assert!(text.contains("${Name}")),
                    other => panic!("expected template body, got {other:?}"),
                }
            }
            other => panic!("expected emit action, got {other:?}"),
        }
    }

    #[test]
    fn parse_multiple_emit_actions() {
        let prog = parse(
            "lift \"full-entity\" {\n\
             \tfrom go {\n\
             \t\tmatch TypeSpec { name: $Name type: StructType { fields: $Fields... } }\n\
             \t}\n\
             \temit go { file \"interface.go\" package main ast { GenDecl { tok: \"TYPE\" } } }\n\
             \temit proto { file \"model.proto\" template {`syntax = \"proto3\";`} }\n\
             \temit sql { file \"migration.sql\" template {`CREATE TABLE test;`} }\n\
             }\n",
        );

        let block = &prog.blocks[0];
        assert_eq!(block.actions.len(), 3);
        let targets: Vec<EmitTarget> = block
            .actions
            .iter()
            .map(|a| match a {
                Action::Emit(e) => e.target,
                other => panic!("expected emit, got {other:?}"),
            })
            .collect();
        assert_eq!(
            targets,
            vec![EmitTarget::Go, EmitTarget::Proto, EmitTarget::Sql]
        );
    }

    #[test]
    fn parse_wildcard_and_list() {
        let prog = parse(
            r#"
lift "wildcard-test" {
    from go {
        match FuncDecl {
            name: _
            type: FuncType {
                params: [
                    Field { type: Ident { name: "int" } },
                    $Second
                ]
            }
        }
    }

    delete {
        remove $Second
    }
}
"#,
        );

        let matcher = &prog.blocks[0].from.matchers[0];
        assert!(matches!(matcher.fields[0].value, MatchValue::Wildcard));

        match &matcher.fields[1].value {
            MatchValue::Pattern(func_type) => match &func_type.fields[0].value {
                MatchValue::List(items) => {
                    assert_eq!(items.len(), 2);
                    assert!(matches!(items[0], MatchValue::Pattern(_)));
                    assert!(matches!(&items[1], MatchValue::Binding(b) if b == "Second"));
                }
                other => panic!("expected list, got {other:?}"),
            },
            other => panic!("expected nested pattern, got {other:?}"),
        }
    }

    #[test]
    fn parse_code_mode_emit() {
        let prog = parse(
            "lift \"repo-gen\" {\n\
             \tfrom go {\n\
             \t\tmatch TypeSpec { name: $Name type: StructType { fields: $Fields... } }\n\
             \t}\n\
             \temit go {\n\
             \t\tfile \"repo.go\"\n\
             \t\tpackage main\n\
             \t\tcode {`type ${Name}Repository struct { db *sql.DB }`}\n\
             \t}\n\
             }\n",
        );

        match &prog.blocks[0].actions[0] {
            Action::Emit(emit) => assert!(matches!(emit.body, Some(EmitBody::Code(_)))),
            other => panic!("expected emit, got {other:?}"),
        }
    }

    #[test]
    fn parse_rename_and_retype() {
        let prog = parse(
            r#"
lift "transform" {
    from go {
        match TypeSpec {
            name: $Name
            type: StructType { fields: $Fields... }
        }
    }

    patch {
        rename $Name "Renamed"
        retype $Fields "string"
    }
}
"#,
        );

        match &prog.blocks[0].actions[0] {
            Action::Patch(stmts) => {
                assert_eq!(stmts.len(), 2);
                assert!(matches!(&stmts[0], PatchStmt::Rename { new_name, .. } if new_name == "Renamed"));
                assert!(matches!(&stmts[1], PatchStmt::Retype { new_type, .. } if new_type == "string"));
            }
            other => panic!("expected patch, got {other:?}"),
        }
    }

    #[test]
    fn parse_len_operators() {
        for (op_text, expected) in [
            (">", CmpOp::Gt),
            (">=", CmpOp::Ge),
            ("<", CmpOp::Lt),
            ("<=", CmpOp::Le),
            ("==", CmpOp::Eq),
            ("!=", CmpOp::Ne),
        ] {
            let input = format!(
                "lift \"t\" {{ from go {{ match FuncDecl {{ }} }} where {{ len($X) {op_text} 2 }} }}"
            );
            let prog = parse(&input);
            match &prog.blocks[0].where_clauses[0].predicates[0] {
                Predicate::Len { op, value, .. } => {
                    assert_eq!(*op, expected, "operator {op_text}");
                    assert_eq!(*value, 2);
                }
                other => panic!("expected len predicate, got {other:?}"),
            }
        }
    }

    #[test]
    fn parse_multiple_blocks() {
        let prog = parse(
            r#"
lift "first" {
    from go { match FuncDecl { name: $A } }
}
lift "second" {
    from go { match TypeSpec { name: $B } }
}
"#,
        );
        assert_eq!(prog.blocks.len(), 2);
        assert_eq!(prog.blocks[0].name, "first");
        assert_eq!(prog.blocks[1].name, "second");
    }

    #[test]
    fn error_names_expected_production() {
        let err = parse_program("lift \"x\" { from rust { } }").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("expected `go`"), "got: {msg}");
        assert!(msg.contains("parse error at"), "got: {msg}");
    }

    #[test]
    fn error_on_missing_colon() {
        let err =
            parse_program("lift \"x\" { from go { match FuncDecl { name $N } } }").unwrap_err();
        assert!(err.to_string().contains("`:`"), "got: {err}");
    }

    #[test]
    fn error_on_unknown_property() {
        let err = parse_program(
            "lift \"x\" { from go { match FuncDecl { } } where { $N.shiny } }",
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown property"), "got: {err}");
    }

    #[test]
    fn dangling_binding_parses_clean() {
        // "Parse, not validate": $Nowhere is not introduced by any matcher,
        // but that is the matcher/executor's problem.
        let prog = parse(
            r#"
lift "dangling" {
    from go { match FuncDecl { name: $A } }
    patch { rename $Nowhere "X" }
}
"#,
        );
        assert_eq!(prog.blocks[0].actions.len(), 1);
    }

    #[test]
    fn inspect_json_roundtrip() {
        let prog = parse(
            r#"
lift "json" {
    from go { match FuncDecl { name: $Name body: $Body } }
    where { $Name.exported }
    patch { rename $Name "X" }
}
"#,
        );
        let json = serde_json::to_string_pretty(&prog).unwrap();
        assert!(json.contains("\"json\""));
        assert!(json.contains("FuncDecl"));
        assert!(json.contains("Exported"));
    }
}
