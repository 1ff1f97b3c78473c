/// Grammar loading and flattening integration tests.

use herald::core::grammar::{GrammarError, GrammarSet};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;

const GAME_NIGHT_JSON: &str = "tests/fixtures/game_night.json";
const GAME_NIGHT_RON: &str = "tests/fixtures/game_night.ron";

fn has_placeholder_syntax(text: &str) -> bool {
    text.contains('#') || text.contains('[') || text.contains(']')
}

#[test]
fn game_night_json_loads() {
    let gs = GrammarSet::load_from_json(Path::new(GAME_NIGHT_JSON)).unwrap();

    let expected_rules = [
        "origin",
        "announcement",
        "greeting",
        "crowd",
        "event",
        "when",
        "snack",
        "name",
    ];
    for rule_name in &expected_rules {
        assert!(
            gs.rules.contains_key(*rule_name),
            "Missing rule: {}",
            rule_name
        );
    }
    assert_eq!(gs.rules["origin"].alternatives.len(), 2);
}

#[test]
fn game_night_ron_loads_through_extension_dispatch() {
    let gs = GrammarSet::load(Path::new(GAME_NIGHT_RON)).unwrap();
    assert_eq!(gs.rules.len(), 3);
    assert!(gs.rules.contains_key("origin"));
}

#[test]
fn flattening_never_leaves_placeholders() {
    let gs = GrammarSet::load(Path::new(GAME_NIGHT_JSON)).unwrap();

    for seed in 0..200 {
        let mut rng = StdRng::seed_from_u64(seed);
        let text = gs.flatten("#origin#", &mut rng).unwrap();
        assert!(!text.is_empty());
        assert!(
            !has_placeholder_syntax(&text),
            "seed {} left placeholder syntax: {}",
            seed,
            text
        );
    }
}

#[test]
fn flattening_covers_every_origin_alternative() {
    let gs = GrammarSet::load(Path::new(GAME_NIGHT_JSON)).unwrap();
    let mut saw_greeting = false;
    let mut saw_host = false;

    for seed in 0..200 {
        let text = gs
            .flatten("#origin#", &mut StdRng::seed_from_u64(seed))
            .unwrap();
        if text.contains("starts") {
            saw_greeting = true;
        }
        if ["Ada", "Bo", "Cy"].iter().any(|n| text.contains(n)) {
            saw_host = true;
        }
    }
    assert!(saw_greeting && saw_host);
}

#[test]
fn host_is_consistent_within_one_message() {
    let gs = GrammarSet::load(Path::new(GAME_NIGHT_JSON)).unwrap();

    for seed in 0..100 {
        let text = gs
            .flatten("[host:#name#]#host# and #host#", &mut StdRng::seed_from_u64(seed))
            .unwrap();
        let (left, right) = text.split_once(" and ").unwrap();
        assert_eq!(left, right);
    }
}

#[test]
fn plain_origin_with_tracery_characters_is_unchanged() {
    let gs = GrammarSet::load(Path::new(GAME_NIGHT_JSON)).unwrap();
    let mut rng = StdRng::seed_from_u64(0);

    for text in ["Bring snacks :]", "We're #1 in the league", "Table 4] 20:00"] {
        assert_eq!(gs.flatten(text, &mut rng).unwrap(), text);
    }
}

#[test]
fn ron_grammar_flattens() {
    let ron = GrammarSet::load(Path::new(GAME_NIGHT_RON)).unwrap();
    let mut rng = StdRng::seed_from_u64(3);
    let text = ron.flatten("#origin#", &mut rng).unwrap();
    assert!(text.ends_with('!'));
    assert!(text.chars().next().unwrap().is_uppercase());
}

#[test]
fn dangling_reference_fails_at_flatten_time() {
    let gs = GrammarSet::load(Path::new("tests/fixtures/broken.json")).unwrap();
    let err = gs
        .flatten("#origin#", &mut StdRng::seed_from_u64(0))
        .unwrap_err();
    assert!(matches!(err, GrammarError::RuleNotFound(ref s) if s == "nobody"));
}

#[test]
fn missing_file_is_io_error() {
    let err = GrammarSet::load(Path::new("tests/fixtures/does_not_exist.json")).unwrap_err();
    assert!(matches!(err, GrammarError::Io(_)));
}

#[test]
fn no_broken_rule_references_in_fixture() {
    let gs = GrammarSet::load(Path::new(GAME_NIGHT_JSON)).unwrap();

    // Symbols introduced by push actions count as defined.
    let mut pushed = Vec::new();
    for rule in gs.rules.values() {
        for alt in &rule.alternatives {
            pushed.extend(alt.pushed_keys());
        }
    }

    for (name, rule) in &gs.rules {
        for alt in &rule.alternatives {
            alt.visit_tags(&mut |tag| {
                if tag.symbol.is_empty() || pushed.contains(&tag.symbol.as_str()) {
                    return;
                }
                assert!(
                    gs.rules.contains_key(tag.symbol.as_str()),
                    "Rule '{}' references non-existent rule '{}'",
                    name,
                    tag.symbol
                );
            });
        }
    }
}
