//! Action executor.
//!
//! Applies a lift block's actions to the matched tree: in-place patches
//! (rename, set), statement insertion, and file emission. Runs after
//! matching has fully completed; the matcher's bindings are `NodeId`s into
//! the same tree, and every mutation here either edits a node in place or
//! appends new nodes, so those ids stay valid throughout.
//!
//! Grammar constructs with no dispatch here (`delete`, `retype`, `insert
//! ast`, `emit ast`, positions `after`/`before`/`into`) fail with an
//! unsupported-feature error rather than silently doing nothing.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::Error;
use crate::gotree::{self, DeclTok, LitKind, Node, NodeId, Pos, Tree, Value};
use crate::matcher::{self, Bindings, Match};
use crate::rule::ast::{
    Action, EmitAction, EmitBody, Expr, InsertAction, InsertMode, InsertPayload, InsertPos,
    LiftBlock, PatchStmt,
};
use crate::template::interpolate;

/// Output of executing one lift block.
#[derive(Debug, Default)]
pub struct ExecResult {
    /// The whole file re-rendered after mutation.
    pub modified_source: String,
    /// Filename → content pairs from emit actions.
    pub emitted_files: BTreeMap<String, String>,
    /// One entry per applied action. The strings are stable: `"patch"`,
    /// `"insert"`, `"emit:<file>"`.
    pub applied: Vec<String>,
}

/// Applies lift block actions to a target tree.
///
/// One executor spans all blocks of a run so the import-to-add set
/// accumulates; import reconciliation is idempotent, re-running it adds no
/// duplicates.
pub struct Executor {
    imports_to_add: BTreeSet<String>,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor {
    pub fn new() -> Self {
        Self {
            imports_to_add: BTreeSet::new(),
        }
    }

    /// Apply every action of `block` to every match, action-major order,
    /// then reconcile imports and re-render.
    pub fn execute(
        &mut self,
        tree: &mut Tree,
        file: NodeId,
        block: &LiftBlock,
        matches: &[Match],
    ) -> Result<ExecResult, Error> {
        let mut result = ExecResult::default();

        for action in &block.actions {
            for m in matches {
                match action {
                    Action::Insert(ins) => {
                        self.execute_insert(tree, ins, &m.bindings)?;
                        result.applied.push("insert".to_string());
                    }
                    Action::Patch(stmts) => {
                        self.execute_patch(tree, stmts, &m.bindings)?;
                        result.applied.push("patch".to_string());
                    }
                    Action::Delete(_) => {
                        return Err(Error::Unsupported("delete"));
                    }
                    Action::Emit(emit) => {
                        let content = self.execute_emit(tree, emit, &m.bindings)?;
                        result
                            .emitted_files
                            .insert(emit.file.clone(), content);
                        result.applied.push(format!("emit:{}", emit.file));
                    }
                }
            }
        }

        self.reconcile_imports(tree, file);
        result.modified_source = gotree::render(tree, file);
        Ok(result)
    }

    fn lookup<'b>(&self, bindings: &'b Bindings, name: &str) -> Result<&'b Value, Error> {
        bindings
            .get(name)
            .ok_or_else(|| Error::BindingNotFound(name.to_string()))
    }

    fn execute_insert(
        &mut self,
        tree: &mut Tree,
        ins: &InsertAction,
        bindings: &Bindings,
    ) -> Result<(), Error> {
        if ins.mode != InsertMode::Code {
            return Err(Error::Unsupported("insert ast mode"));
        }
        let Some(InsertPayload::Code(text)) = &ins.payload else {
            return Err(Error::TypeMismatch(
                "insert code requires a code payload".to_string(),
            ));
        };
        let Some(target_name) = &ins.target else {
            return Err(Error::TypeMismatch(
                "insert requires a target binding".to_string(),
            ));
        };

        let target = self.lookup(bindings, target_name)?;
        let block_id = match target {
            Value::Node(id) if matches!(tree.node(*id), Node::BlockStmt { .. }) => *id,
            _ => {
                return Err(Error::TypeMismatch(format!(
                    "${target_name} is not a BlockStmt"
                )));
            }
        };

        let code = interpolate(tree, text, bindings);

        // Import inference by substring — deliberate, and the only
        // mechanism for inserted snippets.
        if code.contains("context.") {
            self.imports_to_add.insert("context".to_string());
        }
        if code.contains("time.") {
            self.imports_to_add.insert("time".to_string());
        }

        let stmts = gotree::parse_statements(tree, &code)?;

        let Node::BlockStmt { list } = tree.node_mut(block_id) else {
            unreachable!("checked above");
        };
        match ins.position {
            InsertPos::Prepend => {
                list.splice(0..0, stmts);
            }
            InsertPos::Append => {
                list.extend(stmts);
            }
            InsertPos::After => return Err(Error::Unsupported("insert position after")),
            InsertPos::Before => return Err(Error::Unsupported("insert position before")),
            InsertPos::Into => return Err(Error::Unsupported("insert position into")),
        }

        Ok(())
    }

    fn execute_patch(
        &mut self,
        tree: &mut Tree,
        stmts: &[PatchStmt],
        bindings: &Bindings,
    ) -> Result<(), Error> {
        for stmt in stmts {
            if let PatchStmt::If { condition, stmts } = stmt {
                if matcher::eval_predicate(tree, condition, bindings) {
                    self.execute_patch(tree, stmts, bindings)?;
                }
                continue;
            }
            self.execute_patch_stmt(tree, stmt, bindings)?;
        }
        Ok(())
    }

    fn execute_patch_stmt(
        &mut self,
        tree: &mut Tree,
        stmt: &PatchStmt,
        bindings: &Bindings,
    ) -> Result<(), Error> {
        match stmt {
            PatchStmt::Rename { binding, new_name } => {
                let target = self.lookup(bindings, binding)?;
                let ident_id = match target {
                    Value::Node(id) if matches!(tree.node(*id), Node::Ident { .. }) => *id,
                    _ => {
                        return Err(Error::TypeMismatch(format!(
                            "${binding} is not an identifier"
                        )));
                    }
                };
                // Local rewrite only: references elsewhere keep the old name.
                if let Node::Ident { name } = tree.node_mut(ident_id) {
                    *name = new_name.clone();
                }
                Ok(())
            }
            PatchStmt::Set {
                binding,
                path,
                value,
            } => self.execute_set(tree, binding, path, value, bindings),
            PatchStmt::Retype { .. } => Err(Error::Unsupported("retype")),
            PatchStmt::If { .. } => unreachable!("handled by execute_patch"),
        }
    }

    /// `set $X.first = "name type"` — prepend a synthesized field to a
    /// field-list container. The only supported path today.
    fn execute_set(
        &mut self,
        tree: &mut Tree,
        binding: &str,
        path: &[String],
        value: &Expr,
        bindings: &Bindings,
    ) -> Result<(), Error> {
        let target = self.lookup(bindings, binding)?;
        if path.len() != 1 || path[0] != "first" {
            return Err(Error::Unsupported("set path"));
        }

        let list_id = match target {
            Value::Node(id) if matches!(tree.node(*id), Node::FieldList { .. }) => *id,
            _ => {
                return Err(Error::TypeMismatch(format!(
                    "${binding} is not a FieldList"
                )));
            }
        };

        let Expr::Str(spec) = value else {
            return Err(Error::TypeMismatch("set value must be a string".to_string()));
        };
        let Some((name, type_str)) = spec.split_once(' ') else {
            return Err(Error::TypeMismatch(format!("invalid field spec: {spec}")));
        };

        let name_id = tree.new_ident(name);
        let typ = tree.new_type_expr(type_str);
        let field = tree.alloc(
            Node::Field {
                names: vec![name_id],
                typ,
                tag: None,
            },
            Pos::NONE,
        );

        let Node::FieldList { list } = tree.node_mut(list_id) else {
            unreachable!("checked above");
        };
        list.insert(0, field);

        // A qualified type pulls its package into the import set.
        if let Some((pkg, _)) = type_str.split_once('.') {
            self.imports_to_add.insert(pkg.to_string());
        }

        Ok(())
    }

    fn execute_emit(
        &mut self,
        tree: &Tree,
        emit: &EmitAction,
        bindings: &Bindings,
    ) -> Result<String, Error> {
        match &emit.body {
            Some(EmitBody::Template(text)) => Ok(interpolate(tree, text, bindings)),
            Some(EmitBody::Code(text)) => {
                let content = interpolate(tree, text, bindings);
                Ok(match &emit.package {
                    Some(package) => format!("package {package}\n\n{content}"),
                    None => content,
                })
            }
            Some(EmitBody::Ast(_)) => Err(Error::Unsupported("emit ast mode")),
            None => Ok(String::new()),
        }
    }

    /// Find or synthesize the file's import declaration and append any
    /// pending package that is not already imported. Idempotent.
    fn reconcile_imports(&mut self, tree: &mut Tree, file: NodeId) {
        if self.imports_to_add.is_empty() {
            return;
        }

        let decls = match tree.node(file) {
            Node::File { decls, .. } => decls.clone(),
            _ => return,
        };

        let import_decl = decls.iter().copied().find(|d| {
            matches!(
                tree.node(*d),
                Node::GenDecl {
                    tok: DeclTok::Import,
                    ..
                }
            )
        });

        let import_decl = match import_decl {
            Some(id) => id,
            None => {
                let decl = tree.alloc(
                    Node::GenDecl {
                        tok: DeclTok::Import,
                        lparen: true,
                        specs: vec![],
                    },
                    Pos::NONE,
                );
                if let Node::File { decls, .. } = tree.node_mut(file) {
                    decls.insert(0, decl);
                }
                decl
            }
        };

        let existing: BTreeSet<String> = match tree.node(import_decl) {
            Node::GenDecl { specs, .. } => specs
                .iter()
                .filter_map(|spec| match tree.node(*spec) {
                    Node::ImportSpec { path, .. } => match tree.node(*path) {
                        Node::BasicLit { value, .. } => {
                            Some(value.trim_matches('"').to_string())
                        }
                        _ => None,
                    },
                    _ => None,
                })
                .collect(),
            _ => return,
        };

        let mut new_specs = Vec::new();
        for import in &self.imports_to_add {
            if existing.contains(import) {
                continue;
            }
            let path = tree.alloc(
                Node::BasicLit {
                    lit_kind: LitKind::Str,
                    value: format!("\"{import}\""),
                },
                Pos::NONE,
            );
            new_specs.push(tree.alloc(Node::ImportSpec { name: None, path }, Pos::NONE));
        }

        if let Node::GenDecl { specs, lparen, .. } = tree.node_mut(import_decl) {
            specs.extend(new_specs);
            if specs.len() > 1 {
                *lparen = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gotree::parse_file;
    use crate::matcher::{Matcher, filter_matches};
    use crate::rule::parse_program;

    fn apply(rule: &str, src: &str) -> ExecResult {
        let prog = parse_program(rule).unwrap();
        let (mut tree, file) = parse_file(src).unwrap();
        let block = &prog.blocks[0];

        let matches = {
            let m = Matcher::new(&tree, file);
            let found = m.match_block(block);
            filter_matches(&tree, found, &block.where_clauses)
        };
        assert!(!matches.is_empty(), "rule produced no matches");

        let mut exec = Executor::new();
        exec.execute(&mut tree, file, block, &matches).unwrap()
    }

    #[test]
    fn insert_prepend_adds_statements_and_imports() {
        let result = apply(
            "lift \"test\" {\n\
             \tfrom go {\n\
             \t\tmatch FuncDecl {\n\
             \t\t\tname: $FuncName\n\
             \t\t\tbody: $Body\n\
             \t\t}\n\
             \t}\n\
             \tinsert code {\n\
             \t\tprepend $Body\n\
             \t\t`ctx, cancel := context.WithTimeout(ctx, 30*time.Second)\n\
             defer cancel()`\n\
             \t}\n\
             }\n",
            "package main\n\
             \n\
             func Fetch(url string) error {\n\
             \tresp, err := http.Get(url)\n\
             \tif err != nil {\n\
             \t\treturn err\n\
             \t}\n\
             \tdefer resp.Body.Close()\n\
             \treturn nil\n\
             }\n",
        );

        let out = &result.modified_source;
        assert!(out.contains("context.WithTimeout"), "got:\n{out}");
        assert!(out.contains("defer cancel()"), "got:\n{out}");
        assert!(out.contains("\"context\""), "got:\n{out}");
        assert!(out.contains("\"time\""), "got:\n{out}");
        assert_eq!(result.applied, vec!["insert"]);

        // The inserted statements come before the original ones.
        let timeout_idx = out.find("WithTimeout").unwrap();
        let get_idx = out.find("http.Get").unwrap();
        assert!(timeout_idx < get_idx);
    }

    #[test]
    fn patch_rename_is_local() {
        let result = apply(
            r#"
lift "test" {
    from go {
        match FuncDecl {
            name: $Name
        }
    }

    patch {
        rename $Name "NewName"
    }
}
"#,
            "package main\n\
             \n\
             func OldName() {\n\
             \tprintln(\"hello\")\n\
             }\n",
        );

        let out = &result.modified_source;
        assert!(out.contains("func NewName()"), "got:\n{out}");
        assert!(!out.contains("OldName"), "got:\n{out}");
        assert_eq!(result.applied, vec!["patch"]);
    }

    #[test]
    fn patch_set_prepends_param() {
        let result = apply(
            r#"
lift "test" {
    from go {
        match FuncDecl {
            name: $Name
            type: FuncType {
                params: $Params...
            }
        }
    }

    patch {
        set $Params.first = "ctx context.Context"
    }
}
"#,
            "package main\n\
             \n\
             func Fetch(url string) error {\n\
             \treturn nil\n\
             }\n",
        );

        let out = &result.modified_source;
        assert!(out.contains("ctx context.Context"), "got:\n{out}");
        let ctx_idx = out.find("ctx context.Context").unwrap();
        let url_idx = out.find("url string").unwrap();
        assert!(ctx_idx < url_idx, "ctx must come first:\n{out}");
        assert!(out.contains("\"context\""), "context import:\n{out}");
    }

    #[test]
    fn conditional_patch_skips_when_predicate_false() {
        let result = apply(
            r#"
lift "test" {
    from go {
        match FuncDecl {
            name: $Name
            type: FuncType {
                params: $Params...
            }
        }
    }

    where {
        not contains($Params, Field {
            type: SelectorExpr {
                x: Ident { name: "context" }
                sel: Ident { name: "Context" }
            }
        })
    }

    patch {
        set $Params.first = "ctx context.Context"
    }
}
"#,
            "package main\n\
             \n\
             func WithCtx(ctx context.Context, url string) error {\n\
             \treturn nil\n\
             }\n\
             \n\
             func NoCtx(url string) error {\n\
             \treturn nil\n\
             }\n",
        );

        let out = &result.modified_source;
        assert!(
            out.contains("func NoCtx(ctx context.Context, url string)"),
            "got:\n{out}"
        );
        // WithCtx already had the parameter; the filter excluded it.
        assert!(
            out.contains("func WithCtx(ctx context.Context, url string)"),
            "got:\n{out}"
        );
        assert!(
            !out.contains("ctx context.Context, ctx context.Context"),
            "got:\n{out}"
        );
    }

    #[test]
    fn emit_template_interpolates() {
        let result = apply(
            "lift \"test\" {\n\
             \tfrom go {\n\
             \t\tmatch TypeSpec {\n\
             \t\t\tname: $Name\n\
             \t\t\ttype: StructType { fields: $Fields... }\n\
             \t\t}\n\
             \t}\n\
             \temit proto {\n\
             \t\tfile \"model.proto\"\n\
             \t\ttemplate {`syntax = \"proto3\";\n\
             \n\
             message ${Name} {\n\
             }`}\n\
             \t}\n\
             }\n",
            "package main\n\
             \n\
             type User struct {\n\
             \tID   int\n\
             \tName string\n\
             }\n",
        );

        let proto = result.emitted_files.get("model.proto").unwrap();
        assert!(proto.contains("message User"), "got:\n{proto}");
        assert_eq!(result.applied, vec!["emit:model.proto"]);
    }

    #[test]
    fn emit_with_snake_case_transform() {
        let result = apply(
            "lift \"test\" {\n\
             \tfrom go {\n\
             \t\tmatch TypeSpec { name: $Name }\n\
             \t}\n\
             \temit sql {\n\
             \t\tfile \"migration.sql\"\n\
             \t\ttemplate {`CREATE TABLE ${Name | snake_case} (\n\
             \tid SERIAL PRIMARY KEY\n\
             );`}\n\
             \t}\n\
             }\n",
            "package main\n\
             \n\
             type UserAccount struct {\n\
             \tID int\n\
             }\n",
        );

        let sql = result.emitted_files.get("migration.sql").unwrap();
        assert!(sql.contains("user_account"), "got:\n{sql}");
    }

    #[test]
    fn emit_code_prefixes_package() {
        let result = apply(
            "lift \"test\" {\n\
             \tfrom go {\n\
             \t\tmatch TypeSpec { name: $Name }\n\
             \t}\n\
             \temit go {\n\
             \t\tfile \"repo.go\"\n\
             \t\tpackage main\n\
             \t\tcode {`type ${Name}Repository struct{}`}\n\
             \t}\n\
             }\n",
            "package main\n\ntype User struct {\n\tID int\n}\n",
        );

        let code = result.emitted_files.get("repo.go").unwrap();
        assert!(code.starts_with("package main\n\n"), "got:\n{code}");
        assert!(code.contains("type UserRepository struct{}"), "got:\n{code}");
    }

    #[test]
    fn delete_reports_unsupported() {
        let prog = parse_program(
            r#"
lift "test" {
    from go { match TypeSpec { name: $Name } }
    delete { remove $Name }
}
"#,
        )
        .unwrap();
        let (mut tree, file) = parse_file("package main\ntype T struct{}\n").unwrap();
        let block = &prog.blocks[0];
        let matches = Matcher::new(&tree, file).match_block(block);

        let mut exec = Executor::new();
        let err = exec
            .execute(&mut tree, file, block, &matches)
            .unwrap_err();
        assert!(matches!(err, Error::Unsupported("delete")));
    }

    #[test]
    fn retype_reports_unsupported() {
        let prog = parse_program(
            r#"
lift "test" {
    from go { match TypeSpec { name: $Name } }
    patch { retype $Name "string" }
}
"#,
        )
        .unwrap();
        let (mut tree, file) = parse_file("package main\ntype T struct{}\n").unwrap();
        let block = &prog.blocks[0];
        let matches = Matcher::new(&tree, file).match_block(block);

        let mut exec = Executor::new();
        let err = exec
            .execute(&mut tree, file, block, &matches)
            .unwrap_err();
        assert!(matches!(err, Error::Unsupported("retype")));
    }

    #[test]
    fn rename_of_unbound_name_errors() {
        let prog = parse_program(
            r#"
lift "test" {
    from go { match TypeSpec { name: $Name } }
    patch { rename $Ghost "X" }
}
"#,
        )
        .unwrap();
        let (mut tree, file) = parse_file("package main\ntype T struct{}\n").unwrap();
        let block = &prog.blocks[0];
        let matches = Matcher::new(&tree, file).match_block(block);

        let mut exec = Executor::new();
        let err = exec
            .execute(&mut tree, file, block, &matches)
            .unwrap_err();
        assert!(matches!(err, Error::BindingNotFound(name) if name == "Ghost"));
    }

    #[test]
    fn import_reconciliation_is_idempotent() {
        let src = "package main\n\
             \n\
             import (\n\
             \t\"net/http\"\n\
             )\n\
             \n\
             func Fetch(url string) error {\n\
             \t_, err := http.Get(url)\n\
             \treturn err\n\
             }\n";
        let rule = "lift \"test\" {\n\
             \tfrom go {\n\
             \t\tmatch FuncDecl { name: $F body: $Body }\n\
             \t}\n\
             \tinsert code {\n\
             \t\tprepend $Body\n\
             \t\t`ctx, cancel := context.WithTimeout(ctx, 30*time.Second)\n\
             defer cancel()`\n\
             \t}\n\
             }\n";

        let prog = parse_program(rule).unwrap();
        let (mut tree, file) = parse_file(src).unwrap();
        let block = &prog.blocks[0];
        let matches = Matcher::new(&tree, file).match_block(block);

        let mut exec = Executor::new();
        let first = exec.execute(&mut tree, file, block, &matches).unwrap();
        // Reconcile again with the same pending set: no duplicates appear.
        exec.reconcile_imports(&mut tree, file);
        let again = gotree::render(&tree, file);

        for out in [&first.modified_source, &again] {
            assert_eq!(out.matches("\"context\"").count(), 1, "got:\n{out}");
            assert_eq!(out.matches("\"time\"").count(), 1, "got:\n{out}");
            assert_eq!(out.matches("\"net/http\"").count(), 1, "got:\n{out}");
        }
    }

    #[test]
    fn import_decl_synthesized_when_missing() {
        let result = apply(
            "lift \"test\" {\n\
             \tfrom go {\n\
             \t\tmatch FuncDecl { name: $F body: $Body }\n\
             \t}\n\
             \tinsert code {\n\
             \t\tprepend $Body\n\
             \t\t`ctx, cancel := context.WithTimeout(ctx, 30*time.Second)\n\
             defer cancel()`\n\
             \t}\n\
             }\n",
            "package main\n\nfunc F() {\n\treturn\n}\n",
        );

        let out = &result.modified_source;
        // Parenthesized group, inserted before the function.
        assert!(out.contains("import (\n\t\"context\"\n\t\"time\"\n)"), "got:\n{out}");
        let import_idx = out.find("import").unwrap();
        let func_idx = out.find("func F").unwrap();
        assert!(import_idx < func_idx);
    }

    #[test]
    fn full_enforce_context_timeout() {
        let result = apply(
            "lift \"enforce-ctx-timeout\" {\n\
             \tfrom go {\n\
             \t\tmatch FuncDecl {\n\
             \t\t\tname: $FuncName\n\
             \t\t\ttype: FuncType {\n\
             \t\t\t\tparams: $Params...\n\
             \t\t\t}\n\
             \t\t\tbody: $Body\n\
             \t\t}\n\
             \n\
             \t\tmatch CallExpr in $Body {\n\
             \t\t\tfun: SelectorExpr {\n\
             \t\t\t\tsel: $CallName\n\
             \t\t\t}\n\
             \t\t}\n\
             \t}\n\
             \n\
             \twhere {\n\
             \t\t$CallName in [\"Get\", \"Post\", \"Do\"]\n\
             \t\tnot contains($Body, CallExpr {\n\
             \t\t\tfun: SelectorExpr {\n\
             \t\t\t\tx: Ident { name: \"context\" }\n\
             \t\t\t\tsel: Ident { name: \"WithTimeout\" }\n\
             \t\t\t}\n\
             \t\t})\n\
             \t}\n\
             \n\
             \tpatch {\n\
             \t\tif not contains($Params, Field {\n\
             \t\t\ttype: SelectorExpr {\n\
             \t\t\t\tx: Ident { name: \"context\" }\n\
             \t\t\t\tsel: Ident { name: \"Context\" }\n\
             \t\t\t}\n\
             \t\t}) {\n\
             \t\t\tset $Params.first = \"ctx context.Context\"\n\
             \t\t}\n\
             \t}\n\
             \n\
             \tinsert code {\n\
             \t\tprepend $Body\n\
             \t\t`ctx, cancel := context.WithTimeout(ctx, 30*time.Second)\n\
             defer cancel()`\n\
             \t}\n\
             }\n",
            "package client\n\
             \n\
             import (\n\
             \t\"net/http\"\n\
             )\n\
             \n\
             func Fetch(url string) (*http.Response, error) {\n\
             \treturn http.Get(url)\n\
             }\n",
        );

        let out = &result.modified_source;
        assert!(
            out.contains("func Fetch(ctx context.Context, url string)"),
            "got:\n{out}"
        );
        assert!(out.contains("context.WithTimeout"), "got:\n{out}");
        assert!(out.contains("defer cancel()"), "got:\n{out}");
        assert!(out.contains("\"context\""), "got:\n{out}");
        assert!(out.contains("\"time\""), "got:\n{out}");
        assert_eq!(result.applied, vec!["patch", "insert"]);
    }
}
