pub mod cli;
pub mod error;
pub mod executor;
pub mod gotree;
pub mod matcher;
pub mod rule;
pub mod template;

use std::path::Path;

use anyhow::{Context, Result};

use cli::{Args, Command};
use executor::Executor;
use gotree::{Node, Tree, Value};
use matcher::{Match, Matcher, filter_matches};
use rule::{Program, parse_program};

/// Run a subcommand. Returns the process exit code: 0 = success, 1 = any
/// error.
pub fn run(args: Args) -> Result<i32> {
    match args.command {
        Command::Parse { files } => cmd_parse(&files),
        Command::Inspect { file } => cmd_inspect(&file),
        Command::Match { rule, source } => cmd_match(&rule, &source, args.debug),
        Command::Version => {
            println!("golift v{}", env!("CARGO_PKG_VERSION"));
            Ok(0)
        }
        Command::Apply {
            rule,
            source,
            output,
            write,
        } => cmd_apply(&rule, &source, output.as_deref(), write, args.debug),
    }
}

fn load_rule(path: &Path) -> Result<Program> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let prog = parse_program(&text).with_context(|| path.display().to_string())?;
    Ok(prog)
}

fn cmd_parse(files: &[std::path::PathBuf]) -> Result<i32> {
    for path in files {
        let prog = load_rule(path)?;
        println!("{} — {} lift block(s)", path.display(), prog.blocks.len());
        for block in &prog.blocks {
            println!(
                "  {}: {} matcher(s), {} where(s), {} action(s)",
                block.name,
                block.from.matchers.len(),
                block.where_clauses.len(),
                block.actions.len()
            );
        }
    }
    Ok(0)
}

fn cmd_inspect(file: &Path) -> Result<i32> {
    let prog = load_rule(file)?;
    // Safe to unwrap: the rule AST always serializes successfully.
    println!("{}", serde_json::to_string_pretty(&prog).unwrap());
    Ok(0)
}

fn cmd_match(rule: &Path, source: &Path, debug: bool) -> Result<i32> {
    let prog = load_rule(rule)?;
    let src = std::fs::read_to_string(source)
        .with_context(|| format!("failed to read {}", source.display()))?;
    let (tree, file) = gotree::parse_file(&src).with_context(|| source.display().to_string())?;

    if debug {
        eprintln!("debug: {} lift block(s)", prog.blocks.len());
        eprintln!("debug: target tree: {} node(s)", tree.len());
    }

    let matcher = Matcher::new(&tree, file);
    let mut total = 0;

    for block in &prog.blocks {
        let matches = matcher.match_block(block);
        let matches = filter_matches(&tree, matches, &block.where_clauses);
        if matches.is_empty() {
            continue;
        }

        println!("Block {}: {} match(es)", block.name, matches.len());
        for (i, m) in matches.iter().enumerate() {
            let pos = tree.pos(m.node);
            println!("  [{}] {}:{}", i + 1, source.display(), pos.line);
            for (name, value) in &m.bindings {
                println!("      ${name} = {}", format_binding(&tree, value));
            }
        }
        total += matches.len();
    }

    if total == 0 {
        println!("No matches found.");
    } else {
        println!("\nTotal: {total} match(es)");
    }
    Ok(0)
}

/// Compact display of a binding value for `match` output.
fn format_binding(tree: &Tree, value: &Value) -> String {
    match value {
        Value::Nil => "<nil>".to_string(),
        Value::Str(s) => s.clone(),
        Value::List(items) => format!("<List({})>", items.len()),
        Value::Node(id) => match tree.node(*id) {
            Node::Ident { name } => name.clone(),
            Node::BasicLit { value, .. } => value.clone(),
            Node::FieldList { list } => format!("<FieldList({})>", list.len()),
            other => format!("<{}>", other.kind_name()),
        },
    }
}

fn cmd_apply(
    rule: &Path,
    source: &Path,
    output: Option<&Path>,
    write: bool,
    debug: bool,
) -> Result<i32> {
    let prog = load_rule(rule)?;
    let src = std::fs::read_to_string(source)
        .with_context(|| format!("failed to read {}", source.display()))?;
    let (mut tree, file) =
        gotree::parse_file(&src).with_context(|| source.display().to_string())?;

    let mut exec = Executor::new();
    let mut last_source: Option<String> = None;
    let mut total = 0;
    let mut failed = false;

    for block in &prog.blocks {
        let matches: Vec<Match> = {
            let matcher = Matcher::new(&tree, file);
            let found = matcher.match_block(block);
            filter_matches(&tree, found, &block.where_clauses)
        };
        if matches.is_empty() {
            continue;
        }

        println!("Block {}: applying to {} match(es)", block.name, matches.len());
        total += matches.len();

        let result = match exec.execute(&mut tree, file, block, &matches) {
            Ok(result) => result,
            Err(e) => {
                // Mutations applied before the failure stay in the tree and
                // show up in the next successful block's render.
                eprintln!("error: block {}: {e}", block.name);
                failed = true;
                continue;
            }
        };

        for action in &result.applied {
            println!("  applied {action}");
        }
        for (filename, content) in &result.emitted_files {
            std::fs::write(filename, content)
                .with_context(|| format!("failed to write {filename}"))?;
            println!("  wrote {filename}");
        }

        if debug {
            eprintln!("debug: tree now {} node(s)", tree.len());
        }
        last_source = Some(result.modified_source);
    }

    if total == 0 {
        println!("No matches found.");
        return Ok(0);
    }

    if let Some(modified) = last_source {
        if write {
            std::fs::write(source, &modified)
                .with_context(|| format!("failed to write {}", source.display()))?;
            println!("\nwrote {}", source.display());
        } else if let Some(output) = output {
            std::fs::write(output, &modified)
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!("\nwrote {}", output.display());
        } else {
            println!("\n--- Modified source ---");
            println!("{modified}");
        }
    }

    Ok(if failed { 1 } else { 0 })
}
