use std::collections::BTreeMap;

use clap::ValueEnum;

use crate::augment::{PLACEHOLDER, ResultAnnotations};
use crate::state::FilterCategories;
use crate::util::sort_rows_by;

/// Grouping axis for the result list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum GroupBy {
    File,
    Rule,
}

/// Column the rows are ordered by within each group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum SortBy {
    Line,
    File,
    Rule,
    Message,
}

/// One rendered row: a group header or a result item.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Row<'a> {
    Group { key: String, count: usize },
    Item(&'a ResultAnnotations),
}

/// The browse pipeline: filter, group, and sort, computed on demand as a
/// pure function of its inputs.
///
/// Groups are ordered largest first (ties on the key), rows within a
/// group by the sort column.
pub(crate) fn run_pipeline<'a>(
    results: impl Iterator<Item = &'a ResultAnnotations>,
    filters: &FilterCategories,
    keywords: &str,
    group_by: GroupBy,
    sort_by: SortBy,
    descending: bool,
) -> Vec<Row<'a>> {
    let mut groups: BTreeMap<String, Vec<&ResultAnnotations>> = BTreeMap::new();
    for result in results.filter(|result| row_visible(result, filters, keywords)) {
        groups
            .entry(group_key(result, group_by))
            .or_default()
            .push(result);
    }

    let mut groups: Vec<(String, Vec<&ResultAnnotations>)> = groups.into_iter().collect();
    groups.sort_by(|left, right| {
        right
            .1
            .len()
            .cmp(&left.1.len())
            .then_with(|| left.0.cmp(&right.0))
    });

    let mut rows = Vec::new();
    for (key, mut items) in groups {
        sort_rows_by(&mut items, |item| sort_key(item, sort_by), descending);
        rows.push(Row::Group {
            key,
            count: items.len(),
        });
        rows.extend(items.into_iter().map(Row::Item));
    }
    rows
}

fn row_visible(result: &ResultAnnotations, filters: &FilterCategories, keywords: &str) -> bool {
    if !facet_enabled(filters, "Level", &result.level) {
        return false;
    }
    if !facet_enabled(filters, "Baseline", &result.baseline) {
        return false;
    }
    let suppression = if result.suppressed {
        "suppressed"
    } else {
        "not suppressed"
    };
    if !facet_enabled(filters, "Suppression", suppression) {
        return false;
    }
    matches_keywords(result, keywords)
}

/// Unknown categories and facet values stay visible.
fn facet_enabled(filters: &FilterCategories, category: &str, value: &str) -> bool {
    filters
        .get(category)
        .and_then(|values| values.get(value))
        .copied()
        .unwrap_or(true)
}

/// Every whitespace-separated term must appear in the message, the URI,
/// or the rule id, case-insensitively.
fn matches_keywords(result: &ResultAnnotations, keywords: &str) -> bool {
    let keywords = keywords.trim();
    if keywords.is_empty() {
        return true;
    }
    let haystacks = [
        result.message.to_lowercase(),
        result.uri_display().to_lowercase(),
        result.rule_id.as_deref().unwrap_or("").to_lowercase(),
    ];
    keywords.split_whitespace().all(|term| {
        let term = term.to_lowercase();
        haystacks.iter().any(|haystack| haystack.contains(&term))
    })
}

fn group_key(result: &ResultAnnotations, group_by: GroupBy) -> String {
    match group_by {
        GroupBy::File => {
            if result.relative_uri.is_empty() {
                PLACEHOLDER.to_string()
            } else {
                result.relative_uri.clone()
            }
        }
        GroupBy::Rule => result
            .rule_id
            .clone()
            .unwrap_or_else(|| PLACEHOLDER.to_string()),
    }
}

/// Sort key with numeric ordering for lines and lexical for the rest.
#[derive(PartialEq, Eq, PartialOrd, Ord)]
enum SortKey {
    Number(i64),
    Text(String),
}

fn sort_key(result: &ResultAnnotations, sort_by: SortBy) -> SortKey {
    match sort_by {
        SortBy::Line => SortKey::Number(result.line),
        SortBy::File => SortKey::Text(result.relative_uri.clone()),
        SortBy::Rule => SortKey::Text(result.rule_id.clone().unwrap_or_default()),
        SortBy::Message => SortKey::Text(result.message.clone()),
    }
}

#[cfg(test)]
mod tests {
    use crate::augment::{Region, ResultId};
    use crate::state::ViewState;

    use super::*;

    fn annotation(uri: &str, line: i64, level: &str, message: &str) -> ResultAnnotations {
        ResultAnnotations {
            id: ResultId("log.sarif".to_string(), 0, 0),
            uri: Some(uri.to_string()),
            relative_uri: uri.trim_start_matches('/').to_string(),
            region: (line >= 0).then_some(Region::Line(line)),
            line,
            rule_index: None,
            rule_id: None,
            message: message.to_string(),
            level: level.to_string(),
            baseline: "new".to_string(),
            suppressed: false,
        }
    }

    #[test]
    fn groups_are_ordered_largest_first() {
        let results = vec![
            annotation("/a/one.c", 3, "warning", "m1"),
            annotation("/a/two.c", 1, "warning", "m2"),
            annotation("/a/two.c", 2, "warning", "m3"),
        ];
        let filters = ViewState::default().filters_row;

        let rows = run_pipeline(
            results.iter(),
            &filters,
            "",
            GroupBy::File,
            SortBy::Line,
            false,
        );

        assert_eq!(
            rows[0],
            Row::Group {
                key: "a/two.c".to_string(),
                count: 2
            }
        );
        assert!(matches!(&rows[1], Row::Item(item) if item.line == 1));
        assert!(matches!(&rows[2], Row::Item(item) if item.line == 2));
        assert_eq!(
            rows[3],
            Row::Group {
                key: "a/one.c".to_string(),
                count: 1
            }
        );
    }

    #[test]
    fn descending_sort_reverses_rows_within_groups() {
        let results = vec![
            annotation("/a/two.c", 1, "warning", "m2"),
            annotation("/a/two.c", 2, "warning", "m3"),
        ];
        let filters = ViewState::default().filters_row;

        let rows = run_pipeline(
            results.iter(),
            &filters,
            "",
            GroupBy::File,
            SortBy::Line,
            true,
        );

        assert!(matches!(&rows[1], Row::Item(item) if item.line == 2));
        assert!(matches!(&rows[2], Row::Item(item) if item.line == 1));
    }

    #[test]
    fn disabled_levels_are_filtered_out() {
        let results = vec![
            annotation("/a/one.c", 1, "error", "bad"),
            annotation("/a/one.c", 2, "note", "minor"),
        ];
        let mut filters = ViewState::default().filters_row;
        filters
            .get_mut("Level")
            .expect("level category")
            .insert("note".to_string(), false);

        let rows = run_pipeline(
            results.iter(),
            &filters,
            "",
            GroupBy::File,
            SortBy::Line,
            false,
        );

        assert_eq!(rows.len(), 2); // One group header, one item.
        assert!(matches!(&rows[1], Row::Item(item) if item.level == "error"));
    }

    #[test]
    fn unknown_facet_values_stay_visible() {
        let results = vec![annotation("/a/one.c", 1, "unrecognized-level", "m")];
        let filters = ViewState::default().filters_row;

        let rows = run_pipeline(
            results.iter(),
            &filters,
            "",
            GroupBy::File,
            SortBy::Line,
            false,
        );

        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn keywords_match_across_fields() {
        let results = vec![
            annotation("/a/alpha.c", 1, "warning", "overflow detected"),
            annotation("/a/beta.c", 2, "warning", "unused value"),
        ];
        let filters = ViewState::default().filters_row;

        let rows = run_pipeline(
            results.iter(),
            &filters,
            "OVERFLOW",
            GroupBy::File,
            SortBy::Line,
            false,
        );
        assert_eq!(rows.len(), 2);
        assert!(matches!(&rows[1], Row::Item(item) if item.message.contains("overflow")));

        let rows = run_pipeline(
            results.iter(),
            &filters,
            "beta unused",
            GroupBy::File,
            SortBy::Line,
            false,
        );
        assert_eq!(rows.len(), 2);

        let rows = run_pipeline(
            results.iter(),
            &filters,
            "beta overflow",
            GroupBy::File,
            SortBy::Line,
            false,
        );
        assert!(rows.is_empty());
    }

    #[test]
    fn location_free_results_group_under_the_placeholder() {
        let mut no_location = annotation("/ignored", -1, "warning", "m");
        no_location.uri = None;
        no_location.relative_uri = String::new();
        let results = vec![no_location];
        let filters = ViewState::default().filters_row;

        let rows = run_pipeline(
            results.iter(),
            &filters,
            "",
            GroupBy::File,
            SortBy::Line,
            false,
        );

        assert_eq!(
            rows[0],
            Row::Group {
                key: PLACEHOLDER.to_string(),
                count: 1
            }
        );
    }

    #[test]
    fn suppressed_results_can_be_hidden() {
        let mut suppressed = annotation("/a/one.c", 1, "warning", "m");
        suppressed.suppressed = true;
        let results = vec![suppressed];
        let mut filters = ViewState::default().filters_row;
        filters
            .get_mut("Suppression")
            .expect("suppression category")
            .insert("suppressed".to_string(), false);

        let rows = run_pipeline(
            results.iter(),
            &filters,
            "",
            GroupBy::File,
            SortBy::Line,
            false,
        );

        assert!(rows.is_empty());
    }
}
