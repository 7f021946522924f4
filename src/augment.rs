use std::collections::BTreeMap;

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use serde::Serialize;
use serde_sarif::sarif::{
    ArtifactLocation, Region as SarifRegion, Result as SarifResult, Run, Sarif,
};

use crate::distinct::map_distinct;
use crate::util::{common_length, file_name};

/// Placeholder shown when a result carries no usable value.
pub(crate) const PLACEHOLDER: &str = "—";

/// Scheme prefix of URIs that resolve to embedded artifact contents.
pub(crate) const EMBEDDED_SCHEME: &str = "sarif:";

/// Characters escaped when a log origin is embedded in a synthetic URI.
/// The slash must be escaped so the origin stays a single path segment.
const ORIGIN_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'/')
    .add(b'%')
    .add(b'#')
    .add(b'?')
    .add(b'"');

/// Stable selection key: log origin, run index, result index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub(crate) struct ResultId(pub(crate) String, pub(crate) usize, pub(crate) usize);

impl std::fmt::Display for ResultId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}:{}:{}", self.0, self.1, self.2)
    }
}

impl std::str::FromStr for ResultId {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut parts = value.rsplitn(3, ':');
        let result_index = parts
            .next()
            .and_then(|part| part.parse().ok())
            .ok_or_else(|| anyhow::anyhow!("invalid result index in id '{value}'"))?;
        let run_index = parts
            .next()
            .and_then(|part| part.parse().ok())
            .ok_or_else(|| anyhow::anyhow!("invalid run index in id '{value}'"))?;
        let uri = parts
            .next()
            .filter(|uri| !uri.is_empty())
            .ok_or_else(|| anyhow::anyhow!("missing log origin in id '{value}'"))?;
        Ok(Self(uri.to_string(), run_index, result_index))
    }
}

/// Normalized span within an artifact: a whole line, a zero-based
/// half-open character range, or a byte range for binary artifacts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Region {
    Line(i64),
    Chars {
        start_line: i64,
        start_column: i64,
        end_line: i64,
        end_column: i64,
    },
    Bytes {
        offset: i64,
        length: i64,
    },
}

impl Region {
    /// Start line when the region is line-based, -1 otherwise.
    pub(crate) fn line(&self) -> i64 {
        match self {
            Region::Line(line) => *line,
            Region::Chars { start_line, .. } => *start_line,
            Region::Bytes { .. } => -1,
        }
    }
}

impl Serialize for Region {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match *self {
            Region::Line(line) => serializer.serialize_i64(line),
            Region::Bytes { offset, length } => [offset, length].serialize(serializer),
            Region::Chars {
                start_line,
                start_column,
                end_line,
                end_column,
            } => [start_line, start_column, end_line, end_column].serialize(serializer),
        }
    }
}

/// Converts a raw SARIF region to the normalized zero-based shape.
///
/// Byte ranges pass through untouched. Line/column fields are 1-based in
/// the source document, so zero doubles as absent: a region with only a
/// start line collapses to a whole-line span, and missing end fields
/// default to a single-character range after the start column.
pub(crate) fn parse_region(region: Option<&SarifRegion>) -> Option<Region> {
    let region = region?;

    if let (Some(offset), Some(length)) = (region.byte_offset, region.byte_length) {
        return Some(Region::Bytes { offset, length });
    }

    let start_line = region.start_line.filter(|line| *line > 0)? - 1;
    let Some(start_column) = region.start_column.filter(|column| *column > 0) else {
        return Some(Region::Line(start_line));
    };
    let start_column = start_column - 1;
    let end_line = region.end_line.filter(|line| *line > 0).map(|line| line - 1);
    let end_column = region
        .end_column
        .filter(|column| *column > 0)
        .map(|column| column - 1);
    Some(Region::Chars {
        start_line,
        start_column,
        end_line: end_line.unwrap_or(start_line),
        end_column: end_column.unwrap_or(start_column + 1),
    })
}

/// Resolved URI pair for an artifact reference: the recorded URI, and the
/// synthetic content URI that supersedes it when the referenced artifact
/// carries embedded text or binary contents.
pub(crate) fn parse_artifact_location(
    origin: &str,
    run_index: usize,
    run: &Run,
    location: Option<&ArtifactLocation>,
) -> (Option<String>, Option<String>) {
    let Some(location) = location else {
        return (None, None);
    };
    let uri = location.uri.clone();
    let content_uri = location.index.and_then(|index| {
        let index = usize::try_from(index).ok()?;
        let artifact = run.artifacts.as_ref()?.get(index)?;
        let contents = artifact.contents.as_ref()?;
        if contents.text.is_none() && contents.binary.is_none() {
            return None;
        }
        let name = artifact
            .location
            .as_ref()
            .and_then(|location| location.uri.as_deref())
            .and_then(file_name)
            .unwrap_or("Untitled");
        Some(embedded_uri(origin, run_index, index, name))
    });
    (uri, content_uri)
}

/// Synthetic URI addressing embedded contents of one artifact.
pub(crate) fn embedded_uri(
    origin: &str,
    run_index: usize,
    artifact_index: usize,
    file_name: &str,
) -> String {
    format!(
        "{EMBEDDED_SCHEME}{}/{run_index}/{artifact_index}/{file_name}",
        utf8_percent_encode(origin, ORIGIN_ENCODE_SET)
    )
}

/// Expands `{N}` positional placeholders from the argument list.
/// Placeholders without a matching argument are left verbatim.
pub(crate) fn format_message(template: &str, arguments: Option<&[String]>) -> String {
    let Some(arguments) = arguments else {
        return template.to_string();
    };
    let mut output = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        output.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) if close > 0 && after[..close].bytes().all(|byte| byte.is_ascii_digit()) => {
                match after[..close].parse::<usize>().ok().and_then(|index| arguments.get(index)) {
                    Some(argument) => output.push_str(argument),
                    None => {
                        output.push('{');
                        output.push_str(&after[..close]);
                        output.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            _ => {
                output.push('{');
                rest = after;
            }
        }
    }
    output.push_str(rest);
    output
}

/// One parsed SARIF document plus its derived view annotations.
///
/// The parsed document stays untouched; everything the view needs lives in
/// the parallel annotation structure filled in by [`augment`].
pub(crate) struct LoadedLog {
    pub(crate) uri: String,
    pub(crate) uri_upgraded: Option<String>,
    pub(crate) sarif: Sarif,
    pub(crate) augmented: bool,
    pub(crate) runs: Vec<RunAnnotations>,
    pub(crate) distinct_names: BTreeMap<String, String>,
}

impl LoadedLog {
    pub(crate) fn new(uri: impl Into<String>, sarif: Sarif) -> Self {
        Self {
            uri: uri.into(),
            uri_upgraded: None,
            sarif,
            augmented: false,
            runs: Vec::new(),
            distinct_names: BTreeMap::new(),
        }
    }

    /// Recorded result and its annotations, by run and result index.
    pub(crate) fn result(
        &self,
        run_index: usize,
        result_index: usize,
    ) -> Option<(&SarifResult, &ResultAnnotations)> {
        let annotations = self.runs.get(run_index)?.results.get(result_index)?;
        let result = self
            .sarif
            .runs
            .get(run_index)?
            .results
            .as_ref()?
            .get(result_index)?;
        Some((result, annotations))
    }
}

/// Derived fields for one run.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct RunAnnotations {
    /// Longest common path prefix across the run's result URIs.
    pub(crate) implicit_base: Option<String>,
    pub(crate) results: Vec<ResultAnnotations>,
}

/// Display-ready derived fields for one result.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ResultAnnotations {
    pub(crate) id: ResultId,
    pub(crate) uri: Option<String>,
    pub(crate) relative_uri: String,
    pub(crate) region: Option<Region>,
    pub(crate) line: i64,
    pub(crate) rule_index: Option<usize>,
    pub(crate) rule_id: Option<String>,
    pub(crate) message: String,
    pub(crate) level: String,
    pub(crate) baseline: String,
    pub(crate) suppressed: bool,
}

impl ResultAnnotations {
    /// Recorded or synthetic URI, or the placeholder for location-free results.
    pub(crate) fn uri_display(&self) -> &str {
        self.uri.as_deref().unwrap_or(PLACEHOLDER)
    }
}

/// Populates every derived field of the log, exactly once.
///
/// The flag is set before any work so a reentrant trigger cannot
/// double-process; malformed sub-fields degrade to sentinel values
/// instead of failing.
pub(crate) fn augment(log: &mut LoadedLog) {
    if log.augmented {
        return;
    }
    log.augmented = true;

    let mut file_and_uris: Vec<(String, String)> = Vec::new();
    let mut runs = Vec::with_capacity(log.sarif.runs.len());
    for (run_index, run) in log.sarif.runs.iter().enumerate() {
        let rules = run.tool.driver.rules.as_deref().unwrap_or(&[]);
        let results = run.results.as_deref().unwrap_or(&[]);

        let mut implicit_base: Option<Vec<String>> = None;
        let mut annotations = Vec::with_capacity(results.len());
        for (result_index, result) in results.iter().enumerate() {
            let id = ResultId(log.uri.clone(), run_index, result_index);

            let ploc = result
                .locations
                .as_ref()
                .and_then(|locations| locations.first())
                .and_then(|location| location.physical_location.as_ref());
            let (uri, content_uri) = parse_artifact_location(
                &log.uri,
                run_index,
                run,
                ploc.and_then(|ploc| ploc.artifact_location.as_ref()),
            );
            let uri = content_uri.or(uri);

            if let Some(uri) = &uri {
                let parts: Vec<String> = uri.split('/').map(str::to_string).collect();
                implicit_base = Some(match implicit_base {
                    Some(base) => {
                        let shared = common_length(&base, &parts);
                        base[..shared].to_vec()
                    }
                    None => parts.clone(),
                });
                if let Some(file) = parts.last().filter(|file| !file.is_empty()) {
                    file_and_uris.push((file.clone(), uri.clone()));
                }
            }

            let region = parse_region(ploc.and_then(|ploc| ploc.region.as_ref()));
            let line = region.as_ref().map_or(-1, Region::line);

            let rule_index = result
                .rule_index
                .and_then(|index| usize::try_from(index).ok())
                .filter(|index| *index < rules.len());
            let rule = rule_index.map(|index| &rules[index]);
            let rule_id = rule.map(|rule| rule.id.clone());

            let template = rule
                .and_then(|rule| rule.message_strings.as_ref())
                .zip(result.message.id.as_deref())
                .and_then(|(strings, id)| strings.get(id))
                .map(|string| string.text.clone())
                .or_else(|| result.message.text.clone())
                .unwrap_or_else(|| PLACEHOLDER.to_string());
            let message = format_message(&template, result.message.arguments.as_deref());

            let level = facet(&result.level).unwrap_or_else(|| "warning".to_string());
            let baseline = facet(&result.baseline_state).unwrap_or_else(|| "new".to_string());
            let suppressed = result
                .suppressions
                .as_ref()
                .is_some_and(|suppressions| !suppressions.is_empty());

            annotations.push(ResultAnnotations {
                id,
                uri,
                relative_uri: String::new(),
                region,
                line,
                rule_index,
                rule_id,
                message,
                level,
                baseline,
                suppressed,
            });
        }

        let implicit_base = implicit_base.map(|segments| segments.join("/"));
        for annotation in &mut annotations {
            annotation.relative_uri =
                relative_to(annotation.uri.as_deref(), implicit_base.as_deref());
        }
        runs.push(RunAnnotations {
            implicit_base,
            results: annotations,
        });
    }

    log.runs = runs;
    log.distinct_names = map_distinct(file_and_uris);
}

/// URI with the implicit base prefix stripped; empty when there is no URI.
fn relative_to(uri: Option<&str>, base: Option<&str>) -> String {
    let Some(uri) = uri else {
        return String::new();
    };
    match base {
        Some(base) if !base.is_empty() && uri.starts_with(base) => {
            let rest = uri[base.len()..].trim_start_matches('/');
            if rest.is_empty() {
                // The URI is the base itself; fall back to its filename.
                file_name(uri).unwrap_or(uri).to_string()
            } else {
                rest.to_string()
            }
        }
        _ => uri.to_string(),
    }
}

/// Lowercase wire value of an optional SARIF enum field.
fn facet<T: Serialize>(value: &T) -> Option<String> {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(value)) => Some(value),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;
    use serde_sarif::sarif::{
        Artifact, ArtifactContent, ArtifactLocation, Location, Message, MultiformatMessageString,
        PhysicalLocation, Region as SarifRegion, ReportingDescriptor, Result as SarifResult, Run,
        Sarif, Tool, ToolComponent,
    };

    use super::*;

    fn location(uri: &str) -> Location {
        Location::builder()
            .physical_location(
                PhysicalLocation::builder()
                    .artifact_location(ArtifactLocation::builder().uri(uri.to_string()).build())
                    .build(),
            )
            .build()
    }

    fn run_with_results(results: Vec<SarifResult>) -> Run {
        let driver = ToolComponent::builder().name("Driver").build();
        let tool = Tool {
            driver,
            extensions: None,
            properties: None,
        };
        Run::builder().tool(tool).results(results).build()
    }

    fn log_with_runs(runs: Vec<Run>) -> LoadedLog {
        let sarif = Sarif::builder()
            .version(json!("2.1.0"))
            .runs(runs)
            .build();
        LoadedLog::new("file:///logs/test.sarif", sarif)
    }

    #[test]
    fn adds_augmented_fields() {
        let result = SarifResult::builder()
            .message(Message::builder().text("Message 1").build())
            .locations(vec![location("/folder/file.txt")])
            .build();
        let mut log = log_with_runs(vec![run_with_results(vec![result])]);

        augment(&mut log);

        let annotations = &log.runs[0].results[0];
        assert_eq!(annotations.uri.as_deref(), Some("/folder/file.txt"));
        assert_eq!(annotations.line, -1);
        assert_eq!(annotations.message, "Message 1");
        assert_eq!(
            annotations.id,
            ResultId("file:///logs/test.sarif".to_string(), 0, 0)
        );
    }

    #[test]
    fn augment_is_idempotent() {
        let result = SarifResult::builder()
            .message(Message::builder().text("Message 1").build())
            .locations(vec![location("/folder/file.txt")])
            .build();
        let mut log = log_with_runs(vec![run_with_results(vec![result])]);

        augment(&mut log);
        let first = log.runs.clone();
        augment(&mut log);

        assert!(log.augmented);
        assert_eq!(log.runs, first);
    }

    #[test]
    fn resolves_artifact_index_to_embedded_contents() {
        let result = SarifResult::builder()
            .message(Message::builder().text("Message 1").build())
            .locations(vec![Location::builder()
                .physical_location(
                    PhysicalLocation::builder()
                        .artifact_location(
                            ArtifactLocation::builder()
                                .uri("/folder/artifact.txt".to_string())
                                .index(0)
                                .build(),
                        )
                        .build(),
                )
                .build()])
            .build();
        let artifact = Artifact::builder()
            .location(
                ArtifactLocation::builder()
                    .uri("/folder/artifact.txt".to_string())
                    .build(),
            )
            .contents(ArtifactContent::builder().text("abcdef".to_string()).build())
            .build();
        let mut run = run_with_results(vec![result]);
        run.artifacts = Some(vec![artifact]);
        let mut log = log_with_runs(vec![run]);

        augment(&mut log);

        let annotations = &log.runs[0].results[0];
        assert_eq!(
            annotations.uri.as_deref(),
            Some("sarif:file:%2F%2F%2Flogs%2Ftest.sarif/0/0/artifact.txt")
        );
    }

    #[test]
    fn missing_location_degrades_to_sentinels() {
        let result = SarifResult::builder()
            .message(Message::builder().text("Message 1").build())
            .build();
        let mut log = log_with_runs(vec![run_with_results(vec![result])]);

        augment(&mut log);

        let annotations = &log.runs[0].results[0];
        assert_eq!(annotations.uri, None);
        assert_eq!(annotations.uri_display(), PLACEHOLDER);
        assert_eq!(annotations.relative_uri, "");
        assert_eq!(annotations.line, -1);
        assert_eq!(annotations.region, None);
    }

    #[test]
    fn implicit_base_and_relative_uris() {
        let results = vec![
            SarifResult::builder()
                .message(Message::builder().text("one").build())
                .locations(vec![location("/src/app/main.c")])
                .build(),
            SarifResult::builder()
                .message(Message::builder().text("two").build())
                .locations(vec![location("/src/lib/util.c")])
                .build(),
        ];
        let mut log = log_with_runs(vec![run_with_results(results)]);

        augment(&mut log);

        let run = &log.runs[0];
        assert_eq!(run.implicit_base.as_deref(), Some("/src"));
        assert_eq!(run.results[0].relative_uri, "app/main.c");
        assert_eq!(run.results[1].relative_uri, "lib/util.c");
    }

    #[test]
    fn location_free_results_do_not_reset_the_implicit_base() {
        let results = vec![
            SarifResult::builder()
                .message(Message::builder().text("one").build())
                .locations(vec![location("/src/app/main.c")])
                .build(),
            SarifResult::builder()
                .message(Message::builder().text("no location").build())
                .build(),
            SarifResult::builder()
                .message(Message::builder().text("two").build())
                .locations(vec![location("/src/app/other.c")])
                .build(),
        ];
        let mut log = log_with_runs(vec![run_with_results(results)]);

        augment(&mut log);

        assert_eq!(log.runs[0].implicit_base.as_deref(), Some("/src/app"));
        assert_eq!(log.runs[0].results[1].relative_uri, "");
    }

    #[test]
    fn rule_template_wins_over_inline_text() {
        let rule = ReportingDescriptor::builder()
            .id("R0001")
            .message_strings(BTreeMap::from([(
                "default".to_string(),
                MultiformatMessageString::builder()
                    .text("'{0}' exceeds {1}")
                    .build(),
            )]))
            .build();
        let driver = ToolComponent::builder()
            .name("Driver")
            .rules(vec![rule])
            .build();
        let tool = Tool {
            driver,
            extensions: None,
            properties: None,
        };
        let result = SarifResult::builder()
            .message(
                Message::builder()
                    .id("default".to_string())
                    .text("inline".to_string())
                    .arguments(vec!["alpha".to_string(), "beta".to_string()])
                    .build(),
            )
            .rule_index(0)
            .locations(vec![location("/folder/file.txt")])
            .build();
        let run = Run::builder().tool(tool).results(vec![result]).build();
        let mut log = log_with_runs(vec![run]);

        augment(&mut log);

        let annotations = &log.runs[0].results[0];
        assert_eq!(annotations.message, "'alpha' exceeds beta");
        assert_eq!(annotations.rule_index, Some(0));
        assert_eq!(annotations.rule_id.as_deref(), Some("R0001"));
    }

    #[test]
    fn out_of_range_rule_index_yields_no_rule() {
        let result = SarifResult::builder()
            .message(Message::builder().text("Message 1").build())
            .rule_index(7)
            .build();
        let mut log = log_with_runs(vec![run_with_results(vec![result])]);

        augment(&mut log);

        assert_eq!(log.runs[0].results[0].rule_index, None);
        assert_eq!(log.runs[0].results[0].rule_id, None);
        assert_eq!(log.runs[0].results[0].message, "Message 1");
    }

    #[test]
    fn message_defaults_to_placeholder() {
        let result = SarifResult::builder()
            .message(Message::builder().build())
            .build();
        let mut log = log_with_runs(vec![run_with_results(vec![result])]);

        augment(&mut log);

        assert_eq!(log.runs[0].results[0].message, PLACEHOLDER);
    }

    #[test]
    fn start_line_only_region_becomes_a_whole_line() {
        let region = SarifRegion::builder().start_line(1).build();
        let parsed = parse_region(Some(&region));
        assert_eq!(parsed, Some(Region::Line(0)));
        assert_eq!(parsed.as_ref().map(Region::line), Some(0));
    }

    #[test]
    fn full_region_decrements_and_defaults_end_fields() {
        let region = SarifRegion::builder().start_line(3).start_column(5).build();
        assert_eq!(
            parse_region(Some(&region)),
            Some(Region::Chars {
                start_line: 2,
                start_column: 4,
                end_line: 2,
                end_column: 5,
            })
        );

        let region = SarifRegion::builder()
            .start_line(3)
            .start_column(5)
            .end_line(4)
            .end_column(9)
            .build();
        assert_eq!(
            parse_region(Some(&region)),
            Some(Region::Chars {
                start_line: 2,
                start_column: 4,
                end_line: 3,
                end_column: 8,
            })
        );
    }

    #[test]
    fn byte_region_passes_through() {
        let region = SarifRegion::builder().byte_offset(16).byte_length(8).build();
        let parsed = parse_region(Some(&region));
        assert_eq!(
            parsed,
            Some(Region::Bytes {
                offset: 16,
                length: 8
            })
        );
        assert_eq!(parsed.as_ref().map(Region::line), Some(-1));
    }

    #[test]
    fn empty_region_parses_to_none() {
        assert_eq!(parse_region(None), None);
        let region = SarifRegion::builder().build();
        assert_eq!(parse_region(Some(&region)), None);
    }

    #[test]
    fn region_serializes_to_its_compact_shapes() {
        let line = serde_json::to_value(Region::Line(4)).unwrap();
        assert_eq!(line, json!(4));
        let chars = serde_json::to_value(Region::Chars {
            start_line: 0,
            start_column: 1,
            end_line: 0,
            end_column: 2,
        })
        .unwrap();
        assert_eq!(chars, json!([0, 1, 0, 2]));
        let bytes = serde_json::to_value(Region::Bytes {
            offset: 16,
            length: 8,
        })
        .unwrap();
        assert_eq!(bytes, json!([16, 8]));
    }

    #[test]
    fn format_message_substitutes_positional_arguments() {
        let arguments = vec!["x".to_string(), "y".to_string(), "z".to_string()];
        assert_eq!(
            format_message(
                "'{0}' was not evaluated for check '{2}': {1}.",
                Some(&arguments)
            ),
            "'x' was not evaluated for check 'z': y."
        );
    }

    #[test]
    fn format_message_leaves_unmatched_placeholders() {
        let arguments = vec!["x".to_string()];
        assert_eq!(format_message("{0} {9}", Some(&arguments)), "x {9}");
        assert_eq!(format_message("{not-a-number}", Some(&arguments)), "{not-a-number}");
        assert_eq!(format_message("{0}", None), "{0}");
    }

    #[test]
    fn result_id_round_trips_through_display() {
        let id = ResultId("file:///logs/test.sarif".to_string(), 2, 14);
        let parsed: ResultId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("no-indices".parse::<ResultId>().is_err());
        assert!(":0:1".parse::<ResultId>().is_err());
    }

    #[test]
    fn distinct_names_cover_every_located_result() {
        let results = vec![
            SarifResult::builder()
                .message(Message::builder().text("one").build())
                .locations(vec![location("/src/a/main.c")])
                .build(),
            SarifResult::builder()
                .message(Message::builder().text("two").build())
                .locations(vec![location("/src/b/main.c")])
                .build(),
            SarifResult::builder()
                .message(Message::builder().text("three").build())
                .locations(vec![location("/src/b/util.c")])
                .build(),
        ];
        let mut log = log_with_runs(vec![run_with_results(results)]);

        augment(&mut log);

        // main.c appears under two paths, so only util.c stays distinct.
        assert!(!log.distinct_names.contains_key("main.c"));
        assert_eq!(
            log.distinct_names.get("util.c").map(String::as_str),
            Some("/src/b/util.c")
        );
    }
}
