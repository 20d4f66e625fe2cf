/// Grammar Linter: checks that a story grammar can drive the storyteller.
///
/// Usage: grammar_linter <grammar.ron | dir> [--no-builtin]

use clap::Parser;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process;

use storyforge::core::grammar::{GrammarSet, TemplateSegment};
use storyforge::schema::board::TileKind;

const BUILTIN_GRAMMAR: &str = include_str!("../story_data/grammar.ron");

/// Rules the storyteller expands directly.
const ENTRY_RULES: [&str; 7] = [
    "tile_title",
    "tile_description",
    "choice_noble",
    "choice_selfish",
    "story_context",
    "player_story",
    "random_theme",
];

/// Values the storyteller binds.
const KNOWN_BINDINGS: [&str; 8] = [
    "theme", "index", "players", "name", "karma", "position", "moment", "deeds",
];

const TILE_KINDS: [TileKind; 6] = [
    TileKind::Start,
    TileKind::Event,
    TileKind::Challenge,
    TileKind::Blessing,
    TileKind::Curse,
    TileKind::Rest,
];

#[derive(Debug, Parser)]
#[command(name = "grammar_linter", about = "Validate a StoryForge story grammar")]
struct Args {
    /// Grammar file or directory of .ron files.
    path: PathBuf,
    /// Lint the given grammar alone instead of merging it over the built-in one.
    #[arg(long)]
    no_builtin: bool,
}

fn main() {
    let args = Args::parse();

    let mut grammars = if args.no_builtin {
        GrammarSet::default()
    } else {
        match GrammarSet::parse_ron(BUILTIN_GRAMMAR) {
            Ok(gs) => gs,
            Err(e) => {
                eprintln!("ERROR: built-in grammar failed to parse: {}", e);
                process::exit(1);
            }
        }
    };

    if args.path.is_file() {
        match GrammarSet::load_from_ron(&args.path) {
            Ok(gs) => grammars.merge(gs),
            Err(e) => {
                eprintln!("ERROR: Failed to load grammar file: {}", e);
                process::exit(1);
            }
        }
    } else if args.path.is_dir() {
        load_grammars_recursive(&args.path, &mut grammars);
    } else {
        eprintln!("ERROR: Path '{}' does not exist", args.path.display());
        process::exit(1);
    }

    println!("Loaded {} grammar rules", grammars.rules.len());

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
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                load_grammars_recursive(&path, grammars);
            } else if path.extension().and_then(|s| s.to_str()) == Some("ron") {
                match GrammarSet::load_from_ron(&path) {
                    Ok(gs) => {
                        println!("  Loaded: {}", path.display());
                        grammars.merge(gs);
                    }
                    Err(e) => {
                        eprintln!("  ERROR loading {}: {}", path.display(), e);
                    }
                }
            }
        }
    }
}

/// Whether some alternative of `rule_name` is usable with `tag` set.
fn covers_tag(grammars: &GrammarSet, rule_name: &str, tag: &str) -> bool {
    grammars.rules.get(rule_name).is_some_and(|rule| {
        rule.alternatives.iter().any(|alt| {
            alt.weight > 0
                && alt.requires.iter().all(|r| r == tag)
                && !alt.excludes.iter().any(|e| e == tag)
        })
    })
}

fn lint_grammars(grammars: &GrammarSet) -> (Vec<String>, Vec<String>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for entry in ENTRY_RULES {
        match grammars.rules.get(entry) {
            None => errors.push(format!("Missing entry rule '{}'", entry)),
            Some(rule) if !rule.requires.is_empty() => errors.push(format!(
                "Entry rule '{}' must not require tags (requires {:?})",
                entry, rule.requires
            )),
            Some(_) => {}
        }
    }

    // Every tile kind needs a title and a description.
    for kind in TILE_KINDS {
        for rule in ["tile_title", "tile_description"] {
            if grammars.rules.contains_key(rule) && !covers_tag(grammars, rule, kind.tag()) {
                errors.push(format!(
                    "Rule '{}' has no alternative for '{}'",
                    rule,
                    kind.tag()
                ));
            }
        }
    }

    for (from, to) in grammars.dangling_references() {
        errors.push(format!("Rule '{}' references non-existent rule '{}'", from, to));
    }

    let known: HashSet<&str> = KNOWN_BINDINGS.into_iter().collect();
    for (name, rule) in &grammars.rules {
        if rule.alternatives.len() < 2 {
            warnings.push(format!(
                "Rule '{}' has only {} alternative(s)",
                name,
                rule.alternatives.len()
            ));
        }

        let mut self_refs = 0;
        for alt in &rule.alternatives {
            let mut refers_to_self = false;
            for segment in &alt.template.segments {
                match segment {
                    TemplateSegment::Binding(binding) if !known.contains(binding.as_str()) => {
                        warnings.push(format!(
                            "Rule '{}' uses '${}', which the storyteller never binds",
                            name, binding
                        ));
                    }
                    TemplateSegment::RuleRef(target) if target == name => refers_to_self = true,
                    _ => {}
                }
            }
            if refers_to_self {
                self_refs += 1;
            }
        }
        if self_refs > 0 && self_refs == rule.alternatives.len() {
            errors.push(format!(
                "Rule '{}' has no non-recursive alternative (infinite recursion)",
                name
            ));
        }
    }

    errors.sort();
    warnings.sort();
    (errors, warnings)
}
