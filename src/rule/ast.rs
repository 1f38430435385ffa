//! Typed AST for `.lift` rule files.
//!
//! If a rule file parses, it is structurally valid — there is no separate
//! validation pass. Dangling binding names are diagnosed later, by the
//! matcher and executor, where they become "binding not found" errors.
//!
//! Everything derives `Serialize` so `golift inspect` can dump the parsed
//! structure as JSON.

use serde::Serialize;

/// Root of a `.lift` file: an ordered list of lift blocks.
#[derive(Debug, Clone, Serialize)]
pub struct Program {
    pub blocks: Vec<LiftBlock>,
}

/// One named transformation unit:
/// `lift "name" { from go { … } where { … } <actions> }`
#[derive(Debug, Clone, Serialize)]
pub struct LiftBlock {
    pub name: String,
    pub from: FromClause,
    pub where_clauses: Vec<WhereClause>,
    pub actions: Vec<Action>,
}

/// `from go { <matchers> }`
#[derive(Debug, Clone, Serialize)]
pub struct FromClause {
    pub matchers: Vec<MatchStmt>,
}

/// `match FuncDecl { … }` or `match CallExpr in $Body { … }`
#[derive(Debug, Clone, Serialize)]
pub struct MatchStmt {
    pub node_type: String,
    /// `in $X` — narrows the search to the subtree bound to `X` by an
    /// earlier matcher.
    pub scope: Option<String>,
    pub fields: Vec<FieldMatch>,
}

/// `name: $Name`
#[derive(Debug, Clone, Serialize)]
pub struct FieldMatch {
    pub name: String,
    pub value: MatchValue,
}

/// The recursive heart of the pattern grammar:
/// MatchValue → AstPattern → FieldMatch → MatchValue → …
#[derive(Debug, Clone, Serialize)]
pub enum MatchValue {
    /// `$Fields...` — captures a whole list-valued field.
    Spread(String),
    /// `$Name`
    Binding(String),
    /// `StructType { fields: … }`
    Pattern(AstPattern),
    /// `[v1, v2, …]` — positional, exact length.
    List(Vec<MatchValue>),
    /// `"literal"`
    Exact(String),
    /// `_`
    Wildcard,
}

/// A nested structural pattern: node type plus per-field constraints.
#[derive(Debug, Clone, Serialize)]
pub struct AstPattern {
    pub node_type: String,
    pub fields: Vec<FieldMatch>,
}

/// `where { <predicates> }`
#[derive(Debug, Clone, Serialize)]
pub struct WhereClause {
    pub predicates: Vec<Predicate>,
}

#[derive(Debug, Clone, Serialize)]
pub enum Predicate {
    /// `not <predicate>`
    Not(Box<Predicate>),
    /// `contains($Body, CallExpr { … })`
    Contains { binding: String, pattern: AstPattern },
    /// `len($Params) > 0`
    Len {
        binding: String,
        op: CmpOp,
        value: i64,
    },
    /// `$Method in ["Get", "Post"]`
    Member {
        binding: String,
        values: Vec<String>,
    },
    /// `$Name.exported`
    Property {
        binding: String,
        property: Property,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CmpOp {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Property {
    Exported,
    Pointer,
    Slice,
    Map,
    Builtin,
    Error,
}

impl Property {
    pub fn from_name(name: &str) -> Option<Property> {
        match name {
            "exported" => Some(Property::Exported),
            "pointer" => Some(Property::Pointer),
            "slice" => Some(Property::Slice),
            "map" => Some(Property::Map),
            "builtin" => Some(Property::Builtin),
            "error" => Some(Property::Error),
            _ => None,
        }
    }
}

/// One action of a lift block. Executed per match, in source order.
#[derive(Debug, Clone, Serialize)]
pub enum Action {
    /// `patch { … }`
    Patch(Vec<PatchStmt>),
    /// `delete { … }`
    Delete(Vec<DeleteStmt>),
    /// `insert ast|code { … }`
    Insert(InsertAction),
    /// `emit go|proto|sql|… { … }`
    Emit(EmitAction),
}

#[derive(Debug, Clone, Serialize)]
pub enum PatchStmt {
    /// `if <predicate> { <stmts> }`
    If {
        condition: Predicate,
        stmts: Vec<PatchStmt>,
    },
    /// `set $X.first = "ctx context.Context"`
    Set {
        binding: String,
        path: Vec<String>,
        value: Expr,
    },
    /// `rename $X "NewName"`
    Rename { binding: String, new_name: String },
    /// `retype $X "string"`
    Retype { binding: String, new_type: String },
}

/// `remove $X` or `remove $X.field`
#[derive(Debug, Clone, Serialize)]
pub struct DeleteStmt {
    pub binding: String,
    pub path: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InsertAction {
    pub mode: InsertMode,
    pub position: InsertPos,
    /// `$X` after the position keyword. The grammar allows omitting it; the
    /// executor requires it.
    pub target: Option<String>,
    /// Optional in the grammar (`insert code { prepend $X }` parses); the
    /// executor reports a missing payload.
    pub payload: Option<InsertPayload>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InsertMode {
    Ast,
    Code,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InsertPos {
    After,
    Before,
    Prepend,
    Append,
    Into,
}

#[derive(Debug, Clone, Serialize)]
pub enum InsertPayload {
    Ast(AstBuild),
    Code(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct EmitAction {
    pub target: EmitTarget,
    pub file: String,
    pub package: Option<String>,
    pub body: Option<EmitBody>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EmitTarget {
    Go,
    Proto,
    Sql,
    Graphql,
    Json,
    Yaml,
    Toml,
}

impl EmitTarget {
    pub fn from_name(name: &str) -> Option<EmitTarget> {
        match name {
            "go" => Some(EmitTarget::Go),
            "proto" => Some(EmitTarget::Proto),
            "sql" => Some(EmitTarget::Sql),
            "graphql" => Some(EmitTarget::Graphql),
            "json" => Some(EmitTarget::Json),
            "yaml" => Some(EmitTarget::Yaml),
            "toml" => Some(EmitTarget::Toml),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub enum EmitBody {
    /// `ast { GenDecl { … } }` — parsed, rejected by the executor.
    Ast(AstBuild),
    /// `code { `…` }`
    Code(String),
    /// `template { `…` }`
    Template(String),
}

/// AST-constructor grammar for emit/insert `ast` bodies.
/// Recurses: AstBuild → AstBuildField → AstBuildValue → AstBuild.
#[derive(Debug, Clone, Serialize)]
pub struct AstBuild {
    pub node_type: String,
    pub fields: Vec<AstBuildField>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AstBuildField {
    pub name: String,
    pub value: AstBuildValue,
}

#[derive(Debug, Clone, Serialize)]
pub enum AstBuildValue {
    /// `for $m in $Methods { Field { … } }`
    For {
        var: String,
        source: BindingRef,
        body: Box<AstBuild>,
    },
    /// `$Name`, `$m.MethodType`, `$f.Type | proto_type`
    Ref(BindingRef),
    /// Nested constructor.
    Build(Box<AstBuild>),
    List(Vec<AstBuildValue>),
    Str(String),
    Int(i64),
}

/// A `$`-reference with optional field projection and transform pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct BindingRef {
    pub name: String,
    pub field: Option<String>,
    pub transforms: Vec<String>,
}

/// General expression used on the right-hand side of `set`.
#[derive(Debug, Clone, Serialize)]
pub enum Expr {
    Ref(BindingRef),
    Str(String),
    Int(i64),
}
