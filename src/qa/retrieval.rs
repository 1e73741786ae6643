//! Deterministic retrieval engine.
//!
//! Turns a [`Classification`] into a bounded [`RetrievalResult`] using only
//! deterministic rules; the fuzzy matcher is the sole ranking intelligence and
//! no generative call happens here. Absence of data is a normal outcome at
//! every stage, so this component has no error return path.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error};

use crate::domain::retrieval::{
    Breakdowns, CategoryTotal, CostTotal, LevelTotal, QuantityTotal, RelatedItem, Totals,
    MAX_BREAKDOWN_ENTRIES, MAX_RELATED_ITEMS, MAX_SNIPPETS,
};
use crate::domain::takeoff::{normalize_items, TakeoffItem};
use crate::domain::{Classification, QuestionType, RetrievalResult};
use crate::services::{SnippetStore, TakeoffStore};

use super::{fuzzy, PlanScope};

/// Sentence used whenever the takeoff path yields nothing.
pub const NO_TAKEOFF_MATCHES: &str = "No matching items found in takeoff.";

/// Totals are reported in this currency; the data model carries none.
const CURRENCY: &str = "USD";

/// Phrases that make a loosely-classified question still surface takeoff
/// context.
const GENERAL_SCOPE_HINTS: &[&str] = &[
    "project",
    "what kind",
    "tell me about",
    "overview",
    "scope of work",
    "included",
];

/// Thresholds and caps for the target-filter stage. Heuristic values, kept
/// configurable rather than load-bearing.
#[derive(Debug, Clone)]
pub struct RetrievalOptions {
    /// Keep-cutoff on fuzzy scores in the primary pass.
    pub primary_score_cutoff: f64,
    /// Word-similarity gate inside the primary scoring pass. Higher than the
    /// cutoff so near-miss words (framing vs. roofing) don't sneak in.
    pub primary_similarity_threshold: f64,
    /// Gate and cutoff for the lenient full-set rescore when the primary pass
    /// comes up empty.
    pub fallback_score_cutoff: f64,
    /// Cap on items kept by the lenient rescore.
    pub fallback_cap: usize,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            primary_score_cutoff: 0.4,
            primary_similarity_threshold: fuzzy::DEFAULT_SCORE_THRESHOLD,
            fallback_score_cutoff: 0.3,
            fallback_cap: 20,
        }
    }
}

pub struct RetrievalEngine {
    takeoff: Arc<dyn TakeoffStore>,
    snippets: Arc<dyn SnippetStore>,
    options: RetrievalOptions,
}

impl RetrievalEngine {
    pub fn new(
        takeoff: Arc<dyn TakeoffStore>,
        snippets: Arc<dyn SnippetStore>,
        options: RetrievalOptions,
    ) -> Self {
        Self {
            takeoff,
            snippets,
            options,
        }
    }

    /// Retrieve and aggregate everything the answer generator may see.
    /// Infallible: store failures are logged and treated as absence.
    pub async fn retrieve(
        &self,
        scope: &PlanScope,
        question: &str,
        classification: Classification,
    ) -> RetrievalResult {
        let question_type = classification.question_type;
        let mut result = RetrievalResult::empty(question, classification.clone());

        let wants_takeoff = question_type.is_takeoff()
            || (question_type == QuestionType::Other && has_general_scope_language(question));

        if wants_takeoff {
            let all_items = self.load_items(scope).await;
            result.takeoff_item_count = all_items.len();

            let filtered = self.filter_items(&all_items, &classification);
            debug!(
                loaded = all_items.len(),
                matched = filtered.len(),
                "takeoff items filtered"
            );

            result.related_items = filtered
                .iter()
                .take(MAX_RELATED_ITEMS)
                .map(project_item)
                .collect();
            result.totals = build_totals(&filtered);
            result.breakdowns = build_breakdowns(&filtered, classification.levels.as_deref());
            result.scope_description = if filtered.is_empty() {
                NO_TAKEOFF_MATCHES.to_string()
            } else {
                let categories = distinct_category_count(&filtered);
                format!(
                    "Found {} matching takeoff item{} across {} categor{}.",
                    filtered.len(),
                    plural_s(filtered.len()),
                    categories,
                    if categories == 1 { "y" } else { "ies" },
                )
            };
        }

        let wants_snippets = !classification.strict_takeoff_only
            && (matches!(
                question_type,
                QuestionType::PageContent | QuestionType::BlueprintContext
            ) || (question_type == QuestionType::Combined && result.related_items.is_empty()));

        if wants_snippets {
            result.blueprint_snippets = self.fetch_snippets(scope, question, &classification).await;
        }

        if result.scope_description.is_empty() {
            result.scope_description = if result.blueprint_snippets.is_empty() {
                NO_TAKEOFF_MATCHES.to_string()
            } else {
                format!(
                    "Found {} blueprint snippet{} relevant to the question.",
                    result.blueprint_snippets.len(),
                    plural_s(result.blueprint_snippets.len()),
                )
            };
        }

        result
    }

    async fn load_items(&self, scope: &PlanScope) -> Vec<TakeoffItem> {
        match self
            .takeoff
            .load_latest_takeoff(scope.plan_id, scope.user_id)
            .await
        {
            Ok(Some(raw)) => normalize_items(raw),
            Ok(None) => Vec::new(),
            Err(e) => {
                error!(error = %e, plan_id = %scope.plan_id, "takeoff load failed, proceeding with empty set");
                Vec::new()
            }
        }
    }

    /// The filtering cascade: pages, then targets (with a lenient full-set
    /// rescore when the primary pass comes up empty), then levels.
    fn filter_items(&self, items: &[TakeoffItem], c: &Classification) -> Vec<TakeoffItem> {
        let mut current: Vec<TakeoffItem> = items.to_vec();

        if let Some(pages) = c.pages.as_deref().filter(|p| !p.is_empty()) {
            current.retain(|item| page_filter_hit(item, pages));
        }

        if !c.targets.is_empty() {
            let mut scored = score_items(
                &current,
                &c.targets,
                self.options.primary_similarity_threshold,
                self.options.primary_score_cutoff,
            );

            if scored.is_empty() && !items.is_empty() {
                // Recall safety valve: slightly-mismatched vocabulary should
                // not produce an empty, unhelpful answer. Rescore the whole
                // original set leniently and keep the best few.
                debug!(targets = ?c.targets, "no primary matches, rescoring full set leniently");
                scored = score_items(
                    items,
                    &c.targets,
                    self.options.fallback_score_cutoff,
                    self.options.fallback_score_cutoff,
                );
                scored.truncate(self.options.fallback_cap);
            }

            current = scored.into_iter().map(|(_, item)| item).collect();
        }

        if let Some(levels) = c.levels.as_deref().filter(|l| !l.is_empty()) {
            current.retain(|item| matched_level(item, levels).is_some());
        }

        current
    }

    async fn fetch_snippets(
        &self,
        scope: &PlanScope,
        question: &str,
        c: &Classification,
    ) -> Vec<crate::domain::BlueprintSnippet> {
        let fetched = match c.pages.as_deref().filter(|p| !p.is_empty()) {
            Some(pages) => {
                self.snippets
                    .fetch_by_page(scope.plan_id, pages, MAX_SNIPPETS)
                    .await
            }
            None => {
                self.snippets
                    .search_by_similarity(scope.plan_id, question, MAX_SNIPPETS)
                    .await
            }
        };

        match fetched {
            Ok(mut snippets) => {
                snippets.truncate(MAX_SNIPPETS);
                snippets
            }
            Err(e) => {
                error!(error = %e, plan_id = %scope.plan_id, "snippet fetch failed, continuing without snippets");
                Vec::new()
            }
        }
    }
}

/// Score items against targets, keep those strictly above the cutoff, sorted
/// descending by score (stable for ties).
fn score_items(
    items: &[TakeoffItem],
    targets: &[String],
    similarity_threshold: f64,
    cutoff: f64,
) -> Vec<(f64, TakeoffItem)> {
    let mut scored: Vec<(f64, TakeoffItem)> = items
        .iter()
        .map(|item| {
            (
                fuzzy::score(&match_text(item), targets, similarity_threshold),
                item,
            )
        })
        .filter(|(score, _)| *score > cutoff)
        .map(|(score, item)| (score, item.clone()))
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored
}

/// The text an item is matched on: its labels and location, concatenated.
fn match_text(item: &TakeoffItem) -> String {
    let mut parts = vec![item.category.as_str()];
    if let Some(s) = item.subcategory.as_deref() {
        parts.push(s);
    }
    parts.push(item.name.as_str());
    if let Some(s) = item.description.as_deref() {
        parts.push(s);
    }
    if let Some(s) = item.location.as_deref() {
        parts.push(s);
    }
    parts.join(" ")
}

fn page_filter_hit(item: &TakeoffItem, pages: &[i64]) -> bool {
    if item.page_number.is_some_and(|p| pages.contains(&p)) {
        return true;
    }
    item.page_reference.as_deref().is_some_and(|reference| {
        let reference = reference.to_lowercase();
        pages.iter().any(|p| reference.contains(&format!("page {p}")))
    })
}

/// First requested level whose text the item's location contains.
fn matched_level<'a>(item: &TakeoffItem, levels: &'a [String]) -> Option<&'a str> {
    let location = item.location.as_deref()?.to_lowercase();
    levels
        .iter()
        .find(|level| location.contains(&level.to_lowercase()))
        .map(String::as_str)
}

fn has_general_scope_language(question: &str) -> bool {
    let q = question.to_lowercase();
    GENERAL_SCOPE_HINTS.iter().any(|hint| q.contains(hint))
}

fn project_item(item: &TakeoffItem) -> RelatedItem {
    RelatedItem {
        id: item.id.clone(),
        name: item.name.clone(),
        category: item.category.clone(),
        level: item.location.clone(),
        page_number: item.page_number,
        quantity: item.quantity,
        unit: item.unit.clone(),
        cost_total: item.total_cost,
    }
}

fn build_totals(items: &[TakeoffItem]) -> Option<Totals> {
    let quantity_sum: f64 = items.iter().filter_map(|i| i.quantity).sum();
    let cost_sum: f64 = items.iter().filter_map(|i| i.total_cost).sum();

    let quantity = (quantity_sum > 0.0).then(|| QuantityTotal {
        value: quantity_sum,
        unit: most_frequent_unit(items),
    });
    let cost = (cost_sum > 0.0).then(|| CostTotal {
        value: cost_sum,
        currency: CURRENCY.to_string(),
    });

    (quantity.is_some() || cost.is_some()).then_some(Totals { quantity, cost })
}

/// Most frequent non-null unit; ties resolve to the unit seen first.
fn most_frequent_unit(items: &[TakeoffItem]) -> Option<String> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for unit in items.iter().filter_map(|i| i.unit.as_deref()) {
        match counts.iter_mut().find(|(u, _)| *u == unit) {
            Some((_, n)) => *n += 1,
            None => counts.push((unit, 1)),
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for (unit, count) in counts {
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((unit, count));
        }
    }
    best.map(|(unit, _)| unit.to_string())
}

fn build_breakdowns(items: &[TakeoffItem], levels: Option<&[String]>) -> Option<Breakdowns> {
    if items.is_empty() {
        return None;
    }

    let by_category = group_totals(items, |item| Some(item.category.clone()))
        .into_iter()
        .map(|(category, quantity, unit, cost)| CategoryTotal {
            category,
            quantity,
            unit,
            cost,
        })
        .collect();

    let by_level = levels.filter(|l| !l.is_empty()).map(|levels| {
        group_totals(items, |item| {
            matched_level(item, levels).map(str::to_string)
        })
        .into_iter()
        .map(|(level, quantity, unit, cost)| LevelTotal {
            level,
            quantity,
            unit,
            cost,
        })
        .collect()
    });

    Some(Breakdowns {
        by_category,
        by_level,
    })
}

/// Group items by a key, summing quantity and cost and keeping the first
/// non-null unit per group; descending by quantity, capped.
fn group_totals(
    items: &[TakeoffItem],
    key_of: impl Fn(&TakeoffItem) -> Option<String>,
) -> Vec<(String, f64, Option<String>, Option<f64>)> {
    struct Acc {
        quantity: f64,
        unit: Option<String>,
        cost: f64,
    }

    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Acc> = HashMap::new();

    for item in items {
        let Some(key) = key_of(item) else { continue };
        let acc = groups.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            Acc {
                quantity: 0.0,
                unit: None,
                cost: 0.0,
            }
        });
        acc.quantity += item.quantity.unwrap_or(0.0);
        if acc.unit.is_none() {
            acc.unit = item.unit.clone();
        }
        acc.cost += item.total_cost.unwrap_or(0.0);
    }

    let mut rows: Vec<(String, f64, Option<String>, Option<f64>)> = order
        .into_iter()
        .map(|key| {
            let acc = groups.remove(&key).expect("group exists for ordered key");
            let cost = (acc.cost > 0.0).then_some(acc.cost);
            (key, acc.quantity, acc.unit, cost)
        })
        .collect();
    rows.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    rows.truncate(MAX_BREAKDOWN_ENTRIES);
    rows
}

fn distinct_category_count(items: &[TakeoffItem]) -> usize {
    let mut seen: Vec<&str> = Vec::new();
    for item in items {
        if !seen.contains(&item.category.as_str()) {
            seen.push(&item.category);
        }
    }
    seen.len()
}

fn plural_s(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(category: &str, name: &str) -> TakeoffItem {
        TakeoffItem {
            id: "t1".to_string(),
            category: category.to_string(),
            subcategory: None,
            name: name.to_string(),
            description: None,
            quantity: None,
            unit: None,
            unit_cost: None,
            total_cost: None,
            location: None,
            page_number: None,
            page_reference: None,
        }
    }

    #[test]
    fn page_filter_hits_number_and_reference() {
        let mut by_number = item("Roofing", "Shingles");
        by_number.page_number = Some(3);
        assert!(page_filter_hit(&by_number, &[3, 9]));
        assert!(!page_filter_hit(&by_number, &[4]));

        let mut by_reference = item("Roofing", "Shingles");
        by_reference.page_reference = Some("see Page 4 detail".to_string());
        assert!(page_filter_hit(&by_reference, &[4]));
        assert!(!page_filter_hit(&by_reference, &[40]));
    }

    #[test]
    fn most_frequent_unit_breaks_ties_by_first_appearance() {
        let mut a = item("A", "a");
        a.unit = Some("LF".to_string());
        let mut b = item("B", "b");
        b.unit = Some("SF".to_string());
        let items = vec![a.clone(), b, a.clone()];
        assert_eq!(most_frequent_unit(&items), Some("LF".to_string()));

        let mut c = item("C", "c");
        c.unit = Some("EA".to_string());
        let tie = vec![c, a];
        assert_eq!(most_frequent_unit(&tie), Some("EA".to_string()));
    }

    #[test]
    fn totals_absent_when_sums_are_zero() {
        let items = vec![item("A", "a"), item("B", "b")];
        assert!(build_totals(&items).is_none());

        let mut zero = item("A", "a");
        zero.quantity = Some(0.0);
        assert!(build_totals(&[zero]).is_none());
    }

    #[test]
    fn general_scope_language_detection() {
        assert!(has_general_scope_language("Tell me about this project"));
        assert!(has_general_scope_language("what kind of materials are there?"));
        assert!(!has_general_scope_language("how many windows?"));
    }

    #[test]
    fn breakdown_sorts_by_quantity_and_caps() {
        let mut items = Vec::new();
        for i in 0..15 {
            let mut it = item(&format!("Cat{i}"), "x");
            it.quantity = Some(i as f64);
            items.push(it);
        }
        let breakdowns = build_breakdowns(&items, None).unwrap();
        assert_eq!(breakdowns.by_category.len(), MAX_BREAKDOWN_ENTRIES);
        assert_eq!(breakdowns.by_category[0].category, "Cat14");
        assert!(breakdowns.by_level.is_none());
    }
}
