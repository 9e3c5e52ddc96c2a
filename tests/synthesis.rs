#[path = "common/mod.rs"]
mod common;

use common::*;
use serde_json::json;
use threadscope::{
    aggregate, build_report_context, AnalysisRecord, CategorySummary, LlmError, Outcome, StructuredReply,
    Synthesizer, ThematicSummary, Theme, REPORT_FAILED,
};

fn success(id: &str, analysis: serde_json::Value) -> AnalysisRecord {
    AnalysisRecord {
        post_id: id.into(),
        post_title: format!("T {id}"),
        permalink: format!("https://reddit.com/{id}"),
        outcome: Outcome::Success { analysis: analysis.as_object().unwrap().clone() },
    }
}

fn failure(id: &str) -> AnalysisRecord {
    AnalysisRecord {
        post_id: id.into(),
        post_title: String::new(),
        permalink: format!("https://reddit.com/{id}"),
        outcome: Outcome::Failure { reason: "bad".into(), raw_response: None },
    }
}

/// Items pool per configured category; failures and unknown keys are
/// ignored; high-value permalinks are collected.
#[test]
fn aggregation() {
    let concept = sample_concept();
    let records = vec![
        success("a", json!({"main_pain_points": ["slow", "confusing"], "unmet_needs": "a wizard", "is_high_value": true})),
        failure("b"),
        success("c", json!({"main_pain_points": ["slow", 3], "mentioned_solutions": ["x"], "is_high_value": false})),
    ];
    let agg = aggregate(&records, &concept.analysis_categories);
    assert_eq!(agg.categories["main_pain_points"], vec!["slow", "confusing", "slow", "3"]);
    assert_eq!(agg.categories["unmet_needs"], vec!["a wizard"]);
    assert!(!agg.categories.contains_key("mentioned_solutions"));
    assert_eq!(agg.high_value_threads, vec!["https://reddit.com/a"]);
}

/// Clustering replies: bare list, wrapped list, or an error entry.
#[test]
fn category_summary_from_reply() {
    let theme = json!({"theme_name": "Speed", "count": 2, "example_items": ["slow"]});
    let expected = CategorySummary::Themes(vec![Theme {
        theme_name: "Speed".into(),
        count: 2,
        example_items: vec!["slow".into()],
    }]);
    assert_eq!(CategorySummary::from_reply(StructuredReply::Json(json!([theme.clone()]))), expected);
    assert_eq!(CategorySummary::from_reply(StructuredReply::Json(json!({"themes": [theme]}))), expected);
    assert!(matches!(
        CategorySummary::from_reply(StructuredReply::Json(json!({"a": [], "b": []}))),
        CategorySummary::Error { .. }
    ));
    assert!(matches!(
        CategorySummary::from_reply(StructuredReply::Unparsed { reason: "x".into(), raw: Some("y".into()) }),
        CategorySummary::Error { raw_response: Some(_), .. }
    ));
}

/// Empty categories make no call; non-empty ones are clustered with the
/// synthesis model in JSON mode, listing each item.
#[test]
fn summarize_calls_per_non_empty_category() {
    let llm = ScriptedLlm::new(|_, _, _| Ok(json!([{"theme_name": "Speed", "count": 2, "example_items": ["slow"]}]).to_string()));
    let concept = sample_concept();
    let agg = aggregate(&[success("a", json!({"main_pain_points": ["slow", "laggy"]}))], &concept.analysis_categories);
    let synth = Synthesizer::new(&llm, &concept, quick_synthesis().with_synthesis_model("synth-m"));
    let summary = synth.summarize(&agg);

    let calls = llm.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].json_mode);
    assert_eq!(calls[0].model, "synth-m");
    assert!(calls[0].user.contains("raw 'user pain points'"));
    assert!(calls[0].user.contains("- slow\n- laggy"));
    assert!(matches!(&summary.categories["main_pain_points"], CategorySummary::Themes(t) if t.len() == 1));
    assert_eq!(summary.categories["unmet_needs"], CategorySummary::Themes(vec![]));
}

/// The report context lists themes, errors and the high-value count.
#[test]
fn report_context_format() {
    let mut summary = ThematicSummary { high_value_threads: vec!["u1".into(), "u2".into()], ..Default::default() };
    summary.categories.insert(
        "main_pain_points".into(),
        CategorySummary::Themes(vec![Theme { theme_name: "Speed".into(), count: 4, example_items: vec!["slow".into(), "laggy".into()] }]),
    );
    summary
        .categories
        .insert("unmet_needs".into(), CategorySummary::Error { error: "unparsable".into(), raw_response: None });
    let ctx = build_report_context(&summary);
    let expected = "\
## Thematic Summary for: main_pain_points

- **Theme:** Speed (Count: 4)
  - Examples: slow; laggy

---
## Thematic Summary for: unmet_needs

Error processing unmet_needs: unparsable

---
## Thematic Summary for: high_value_threads

Found 2 high-value discussion threads.

---
";
    assert_eq!(ctx, expected);
}

/// The report call fills the template; failure yields the fallback text.
#[test]
fn report_and_fallback() {
    let concept = sample_concept();
    let summary = ThematicSummary::default();

    let ok = ScriptedLlm::new(|_, _, _| Ok("# Report".into()));
    assert_eq!(Synthesizer::new(&ok, &concept, quick_synthesis()).report(&summary), "# Report");
    let call = &ok.calls()[0];
    assert!(call.user.starts_with("Write the report.\n## Thematic Summary for: high_value_threads"));
    assert_eq!(call.system, "You write reports.");

    let down = ScriptedLlm::new(|_, _, _| Err(LlmError::RateLimited));
    assert_eq!(Synthesizer::new(&down, &concept, quick_synthesis()).report(&summary), REPORT_FAILED);
}

/// The persisted summary is flat: categories and `high_value_threads` side by side.
#[test]
fn summary_wire_shape() {
    let mut summary = ThematicSummary { high_value_threads: vec!["u".into()], ..Default::default() };
    summary.categories.insert("k".into(), CategorySummary::Themes(vec![]));
    let v = serde_json::to_value(&summary).unwrap();
    assert_eq!(v, json!({"k": [], "high_value_threads": ["u"]}));
    assert_eq!(serde_json::from_value::<ThematicSummary>(v).unwrap(), summary);
}

/// Categories keep the configured order through clustering, the persisted
/// summary and the report context, even when that order is not alphabetical.
#[test]
fn configured_category_order_is_kept() {
    let mut concept = sample_concept();
    concept.analysis_categories.reverse();
    assert_eq!(concept.analysis_categories[0].key, "unmet_needs");

    let llm = ScriptedLlm::new(|_, _, _| Ok("[]".into()));
    let agg = aggregate(&[success("a", json!({"main_pain_points": ["slow"], "unmet_needs": ["a wizard"]}))], &concept.analysis_categories);
    assert_eq!(agg.categories.keys().collect::<Vec<_>>(), vec!["unmet_needs", "main_pain_points"]);

    let summary = Synthesizer::new(&llm, &concept, quick_synthesis()).summarize(&agg);
    assert_eq!(summary.categories.keys().collect::<Vec<_>>(), vec!["unmet_needs", "main_pain_points"]);
    assert!(llm.calls()[0].user.contains("raw 'wished-for features'"));

    let text = serde_json::to_string(&summary).unwrap();
    let unmet = text.find("\"unmet_needs\"").unwrap();
    let pains = text.find("\"main_pain_points\"").unwrap();
    let high = text.find("\"high_value_threads\"").unwrap();
    assert!(unmet < pains && pains < high, "{text}");
    let back: ThematicSummary = serde_json::from_str(&text).unwrap();
    assert_eq!(back.categories.keys().collect::<Vec<_>>(), vec!["unmet_needs", "main_pain_points"]);

    let ctx = build_report_context(&summary);
    let unmet = ctx.find("for: unmet_needs").unwrap();
    let pains = ctx.find("for: main_pain_points").unwrap();
    let high = ctx.find("for: high_value_threads").unwrap();
    assert!(unmet < pains && pains < high);
}

/// Theme entries with float or string counts and non-string examples are
/// kept; entries that are not objects are dropped.
#[test]
fn lenient_theme_entries() {
    let reply = json!([
        {"theme_name": "Speed", "count": 3.0, "example_items": ["slow", 42, null]},
        {"count": "2"},
        "not a theme",
        {"theme_name": "Cost", "count": -1.5, "example_items": "pricey"}
    ]);
    let summary = CategorySummary::from_reply(StructuredReply::Json(reply));
    assert_eq!(
        summary,
        CategorySummary::Themes(vec![
            Theme { theme_name: "Speed".into(), count: 3, example_items: vec!["slow".into(), "42".into()] },
            Theme { theme_name: "N/A".into(), count: 2, example_items: vec![] },
            Theme { theme_name: "Cost".into(), count: 0, example_items: vec!["pricey".into()] },
        ])
    );
}
