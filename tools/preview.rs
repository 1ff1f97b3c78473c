/// Preview: prints flattened samples from a grammar file.
///
/// Usage: preview <grammar.json|grammar.ron> [--origin <text>] [--seed <n>] [--count <n>]

use herald::core::grammar::GrammarSet;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;
use std::process;

fn print_usage() {
    println!("Usage: preview <grammar.json|grammar.ron> [--origin <text>] [--seed <n>] [--count <n>]");
}

fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    let grammar_path = &args[1];
    let mut origin = "#origin#".to_string();
    let mut seed: Option<u64> = None;
    let mut count = 5usize;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--origin" if i + 1 < args.len() => {
                i += 1;
                origin = args[i].clone();
            }
            "--seed" if i + 1 < args.len() => {
                i += 1;
                seed = Some(args[i].parse().unwrap_or_else(|_| {
                    eprintln!("Error: --seed must be a non-negative integer");
                    process::exit(1);
                }));
            }
            "--count" if i + 1 < args.len() => {
                i += 1;
                count = args[i].parse().unwrap_or_else(|_| {
                    eprintln!("Error: --count must be a non-negative integer");
                    process::exit(1);
                });
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                process::exit(1);
            }
        }
        i += 1;
    }

    let grammars = match GrammarSet::load(Path::new(grammar_path)) {
        Ok(gs) => gs,
        Err(e) => {
            eprintln!("ERROR: Failed to load grammar: {}", e);
            process::exit(1);
        }
    };

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    println!("Loaded {} grammar rules", grammars.rules.len());
    println!("Origin: {}\n", origin);

    let mut failures = 0;
    for n in 1..=count {
        match grammars.flatten(&origin, &mut rng) {
            Ok(text) => println!("[{}] {}", n, text),
            Err(e) => {
                failures += 1;
                println!("[{}] ERROR: {}", n, e);
            }
        }
    }

    if failures > 0 {
        process::exit(1);
    }
}
