/// Grammar Linter: checks Tracery grammars for dangling symbols,
/// unknown modifiers, and runaway recursion.
///
/// Usage: grammar_linter <grammar_file_or_dir>

use herald::core::grammar::GrammarSet;
use std::collections::HashSet;
use std::path::Path;
use std::process;
use tracing::{info, warn};

fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: grammar_linter <grammar_file_or_dir>");
        process::exit(0);
    }

    let grammar_dir = &args[1];
    let mut grammars = GrammarSet::default();
    let grammar_path = Path::new(grammar_dir);

    if grammar_path.is_file() {
        match GrammarSet::load(grammar_path) {
            Ok(gs) => grammars.merge(gs),
            Err(e) => {
                eprintln!("ERROR: Failed to load grammar file: {}", e);
                process::exit(1);
            }
        }
    } else if grammar_path.is_dir() {
        load_grammars_recursive(grammar_path, &mut grammars);
    } else {
        eprintln!("ERROR: Path '{}' does not exist", grammar_dir);
        process::exit(1);
    }

    info!("Loaded {} grammar rules", grammars.rules.len());

    let (errors, warnings) = lint_grammars(&grammars);

    println!("\n=== Grammar Lint Report ===\n");

    if errors.is_empty() && warnings.is_empty() {
        println!("All checks passed!");
    }

    for warning in &warnings {
        println!("WARNING: {}", warning);
    }

    for error in &errors {
        println!("ERROR: {}", error);
    }

    println!(
        "\nSummary: {} errors, {} warnings",
        errors.len(),
        warnings.len()
    );

    process::exit(if errors.is_empty() { 0 } else { 1 });
}

fn load_grammars_recursive(dir: &Path, grammars: &mut GrammarSet) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            load_grammars_recursive(&path, grammars);
            continue;
        }
        let ext = path.extension().and_then(|s| s.to_str());
        if !matches!(ext, Some("json") | Some("ron")) {
            continue;
        }
        match GrammarSet::load(&path) {
            Ok(gs) => {
                info!("Loaded: {}", path.display());
                grammars.merge(gs);
            }
            Err(e) => warn!("Skipping {}: {}", path.display(), e),
        }
    }
}

fn lint_grammars(grammars: &GrammarSet) -> (Vec<String>, Vec<String>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if !grammars.rules.contains_key("origin") {
        warnings.push("No 'origin' rule found; messages must name their own root".to_string());
    }

    // Keys pushed by actions are defined at runtime, not in the file.
    let mut pushed: HashSet<&str> = HashSet::new();
    for rule in grammars.rules.values() {
        for alt in &rule.alternatives {
            pushed.extend(alt.pushed_keys());
        }
    }

    let mut names: Vec<&String> = grammars.rules.keys().collect();
    names.sort();

    for name in names {
        let rule = &grammars.rules[name];

        if rule.alternatives.is_empty() {
            errors.push(format!("Rule '{}' has no alternatives", name));
            continue;
        }
        if rule.alternatives.len() < 2 && !rule.alternatives[0].is_plain() {
            warnings.push(format!(
                "Rule '{}' has a single templated alternative (no variety)",
                name
            ));
        }

        for alt in &rule.alternatives {
            alt.visit_tags(&mut |tag| {
                if !tag.symbol.is_empty()
                    && !grammars.rules.contains_key(&tag.symbol)
                    && !pushed.contains(tag.symbol.as_str())
                {
                    errors.push(format!(
                        "Rule '{}' references non-existent rule '{}'",
                        name, tag.symbol
                    ));
                }
                for call in &tag.modifiers {
                    if !grammars.modifiers().contains(&call.name) {
                        errors.push(format!(
                            "Rule '{}' uses unknown modifier '.{}'",
                            name, call.name
                        ));
                    }
                }
            });
        }

        // Direct self-reference with no way out
        let all_self_ref = rule.alternatives.iter().all(|alt| {
            let mut refers = false;
            alt.visit_tags(&mut |tag| refers |= tag.symbol == *name);
            refers
        });
        if all_self_ref {
            errors.push(format!(
                "Rule '{}' has no non-recursive alternative (infinite recursion)",
                name
            ));
        }
    }

    (errors, warnings)
}
