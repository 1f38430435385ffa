//! Template interpolation for emit bodies and insert payloads.
//!
//! Replaces `${Name}` and `${Name | transform}` with the stringified value
//! of the binding. Single pass, left to right, non-recursive: text produced
//! by one substitution is never re-scanned. Unbound names are left literal.

use std::sync::OnceLock;

use regex::Regex;

use crate::gotree::{Node, NodeId, Tree, Value};
use crate::matcher::Bindings;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Literal pattern, cannot fail to compile.
    RE.get_or_init(|| Regex::new(r"\$\{(\w+)(?:\s*\|\s*(\w+))?\}").unwrap())
}

/// Interpolate `${…}` placeholders in `text` against `bindings`.
pub fn interpolate(tree: &Tree, text: &str, bindings: &Bindings) -> String {
    placeholder_re()
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            let Some(value) = bindings.get(name) else {
                // Leave the placeholder untouched.
                return caps[0].to_string();
            };

            let mut s = stringify(tree, value);
            if let Some(transform) = caps.get(2) {
                s = apply_transform(&s, transform.as_str());
            }
            s
        })
        .into_owned()
}

/// Stringify a bound value: identifier to its name, string to itself, basic
/// literal to its literal text, any other node to its rendered source.
fn stringify(tree: &Tree, value: &Value) -> String {
    match value {
        Value::Str(s) => s.clone(),
        Value::Node(id) => stringify_node(tree, *id),
        Value::List(items) => items
            .iter()
            .map(|id| stringify_node(tree, *id))
            .collect::<Vec<_>>()
            .join(", "),
        Value::Nil => String::new(),
    }
}

fn stringify_node(tree: &Tree, id: NodeId) -> String {
    match tree.node(id) {
        Node::Ident { name } => name.clone(),
        Node::BasicLit { value, .. } => value.clone(),
        _ => crate::gotree::printer::render_expr(tree, id),
    }
}

fn apply_transform(s: &str, transform: &str) -> String {
    match transform {
        "snake_case" => to_snake_case(s),
        "camel_case" => to_camel_case(s),
        "lower" => s.to_ascii_lowercase(),
        "upper" => s.to_ascii_uppercase(),
        // Unknown transforms pass the value through unchanged.
        _ => s.to_string(),
    }
}

/// `UserAccount` → `user_account`: underscore before each interior
/// uppercase letter, then lowercase everything.
fn to_snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for (i, ch) in s.chars().enumerate() {
        if i > 0 && ch.is_ascii_uppercase() {
            out.push('_');
        }
        out.push(ch.to_ascii_lowercase());
    }
    out
}

/// `user_account` → `userAccount`: capitalize every segment after the first.
fn to_camel_case(s: &str) -> String {
    s.split('_')
        .enumerate()
        .map(|(i, part)| {
            if i == 0 || part.is_empty() {
                part.to_string()
            } else {
                let mut chars = part.chars();
                match chars.next() {
                    Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                    None => String::new(),
                }
            }
        })
        .collect()
}
