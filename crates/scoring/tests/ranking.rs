use context_cache::CacheManager;
use context_protocol::GenerateOptions;
use context_scoring::{
    optimize_for_limit, BudgetCandidate, ContextScorer, FileFacts, FileSelector, LearningConfig,
    LearningStore, ScoringContext, SelectionRules, SelectorConfig, TestIndex, WorkingSet,
};
use context_merkle::IgnoreMatcher;
use context_symbols::SymbolParser;
use pretty_assertions::assert_eq;
use std::fs;
use std::sync::Arc;
use tempfile::tempdir;

fn ten_typescript_files(root: &std::path::Path) {
    fs::create_dir_all(root.join("src")).unwrap();
    for i in 0..9 {
        fs::write(
            root.join(format!("src/helper{i}.ts")),
            format!("export function compute{i}(x: number): number {{\n  return x * {i};\n}}\n"),
        )
        .unwrap();
    }
    fs::write(
        root.join("src/runner.ts"),
        "export function main(argv: string[]): number {\n  if (argv.length > 1) {\n    return 1;\n  }\n  return 0;\n}\n",
    )
    .unwrap();
}

fn facts_for(root: &std::path::Path, paths: &[String]) -> Vec<FileFacts> {
    let parser = SymbolParser::default();
    paths
        .iter()
        .map(|path| {
            let parsed = parser.parse_file(root, path).unwrap();
            FileFacts::new(path.clone()).with_parsed(Arc::new(parsed))
        })
        .collect()
}

#[test]
fn file_exporting_main_outranks_unrelated_file() {
    let temp = tempdir().unwrap();
    ten_typescript_files(temp.path());

    let selector = FileSelector::new(
        temp.path(),
        IgnoreMatcher::with_defaults(),
        SelectionRules::default().compile().unwrap(),
        SelectorConfig::default(),
    );
    let selection = selector
        .select(&GenerateOptions::new(temp.path(), "fix main function"), None)
        .unwrap();
    assert_eq!(selection.files.len(), 10);

    let facts = facts_for(temp.path(), &selection.files);
    let scorer = ContextScorer::new(SelectionRules::default(), 0.1).unwrap();
    let ctx = ScoringContext::new(
        "fix main function",
        WorkingSet::default(),
        TestIndex::from_paths(selection.files.iter().map(String::as_str)),
    );
    let ranked = scorer.rank(&facts, &ctx);

    assert_eq!(ranked[0].path, "src/runner.ts");
    let runner = ranked.iter().find(|f| f.path == "src/runner.ts").unwrap();
    let helper = ranked.iter().find(|f| f.path == "src/helper3.ts").unwrap();
    assert!(runner.score > helper.score);
    assert!(runner.breakdown.task_keyword > 0.0);
    assert_eq!(helper.breakdown.task_keyword, 0.0);
}

#[test]
fn learned_history_lifts_previously_chosen_files() {
    let temp = tempdir().unwrap();
    ten_typescript_files(temp.path());
    let paths: Vec<String> = (0..9)
        .map(|i| format!("src/helper{i}.ts"))
        .chain(std::iter::once("src/runner.ts".to_string()))
        .collect();
    let facts = facts_for(temp.path(), &paths);

    let learning = LearningStore::load(
        Arc::new(CacheManager::memory_only(1 << 20)),
        LearningConfig::default(),
    );
    learning.record_selection(
        "speed up compute kernels",
        &["src/helper7.ts".to_string(), "src/helper2.ts".to_string()],
    );

    let scorer = ContextScorer::new(SelectionRules::default(), 0.1).unwrap();
    let ctx = ScoringContext::new("compute kernels are slow", WorkingSet::default(), TestIndex::default());
    let mut ranked = scorer.rank(&facts, &ctx);
    learning.apply("compute kernels are slow", &mut ranked);

    let top: Vec<&str> = ranked.iter().take(2).map(|f| f.path.as_str()).collect();
    assert_eq!(top, vec!["src/helper2.ts", "src/helper7.ts"]);
}

#[test]
fn budget_keeps_at_least_the_best_file() {
    let candidates = vec![
        BudgetCandidate {
            path: "src/runner.ts".to_string(),
            tokens: 5_000,
            score: 9.0,
        },
        BudgetCandidate {
            path: "src/helper1.ts".to_string(),
            tokens: 4_000,
            score: 1.0,
        },
    ];
    let picked = optimize_for_limit(candidates, 10);
    assert_eq!(picked.paths(), vec!["src/runner.ts"]);
    assert!(picked.over_budget);
}
