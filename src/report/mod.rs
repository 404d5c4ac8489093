//! Renders the profiling results into an HTML template by substituting
//! `%NAME%` placeholders: summary counts, three sorted function tables,
//! two sorted block tables and the chronological event table.
//!
//! A broken template or an unwritable output path kills the report, never
//! the session.

use crate::aggregate::{self, Aggregation, SortKey, TimedBlock};
use crate::events::Event;
use crate::model::ProgramModel;
use itertools::Itertools;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("could not read template")]
    Template(#[source] std::io::Error),
    #[error("could not write report")]
    Write(#[source] std::io::Error),
}

pub struct ReportContext<'a> {
    pub input_name: &'a str,
    pub events: &'a [Event],
    pub agg: &'a Aggregation,
    pub model: &'a dyn ProgramModel,
}

pub fn load_template(path: &Path) -> Result<String, ReportError> {
    std::fs::read_to_string(path).map_err(ReportError::Template)
}

/// Writes via a sibling temp file and a rename so a crash never leaves a
/// half-written report behind.
pub fn write_atomic(path: &Path, contents: &str) -> Result<(), ReportError> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, contents).map_err(ReportError::Write)?;
    std::fs::rename(&tmp, path).map_err(ReportError::Write)
}

pub fn render(template: &str, ctx: &ReportContext) -> String {
    let functions = ctx.model.functions().len() as u64;
    let hit_functions = aggregate::hit_rows(&ctx.agg.functions) as u64;
    let unhit_functions = functions - hit_functions;

    let blocks = ctx.agg.blocks.len() as u64;
    let hit_blocks = aggregate::hit_rows(&ctx.agg.blocks) as u64;
    let unhit_blocks = blocks - hit_blocks;

    let mut out = template.to_string();

    substitute(&mut out, "%FILENAME%", ctx.input_name);
    substitute(&mut out, "%NUMBER_OF_FUNCTIONS%", &functions.to_string());
    substitute(
        &mut out,
        "%NUMBER_OF_HIT_FUNCTIONS%",
        &hit_functions.to_string(),
    );
    substitute(
        &mut out,
        "%NUMBER_OF_HIT_FUNCTIONS_PERCENTAGE%",
        &pct(hit_functions, functions),
    );
    substitute(
        &mut out,
        "%NUMBER_OF_NOT_HIT_FUNCTIONS%",
        &unhit_functions.to_string(),
    );
    substitute(
        &mut out,
        "%NUMBER_OF_NOT_HIT_FUNCTIONS_PERCENTAGE%",
        &pct(unhit_functions, functions),
    );
    substitute(&mut out, "%NUMBER_OF_BLOCKS%", &blocks.to_string());
    substitute(&mut out, "%NUMBER_OF_HIT_BLOCKS%", &hit_blocks.to_string());
    substitute(
        &mut out,
        "%NUMBER_OF_HIT_BLOCKS_PERCENTAGE%",
        &pct(hit_blocks, blocks),
    );
    substitute(
        &mut out,
        "%NUMBER_OF_NOT_HIT_BLOCKS%",
        &unhit_blocks.to_string(),
    );
    substitute(
        &mut out,
        "%NUMBER_OF_NOT_HIT_BLOCKS_PERCENTAGE%",
        &pct(unhit_blocks, blocks),
    );
    substitute(
        &mut out,
        "%FUNCTIONS_BY_HITS%",
        &function_table(&ctx.agg.functions, SortKey::Hits, ctx.model),
    );
    substitute(
        &mut out,
        "%FUNCTIONS_BY_TIME%",
        &function_table(&ctx.agg.functions, SortKey::Time, ctx.model),
    );
    substitute(
        &mut out,
        "%FUNCTIONS_BY_AVERAGE_TIME%",
        &function_table(&ctx.agg.functions, SortKey::AverageTime, ctx.model),
    );
    substitute(
        &mut out,
        "%BLOCKS_BY_HITS%",
        &block_table(&ctx.agg.blocks, SortKey::Hits, ctx.model),
    );
    substitute(
        &mut out,
        "%BLOCKS_BY_TIME%",
        &block_table(&ctx.agg.blocks, SortKey::Time, ctx.model),
    );
    substitute(&mut out, "%ALL_EVENTS%", &event_table(ctx.events, ctx.model));

    out
}

/// A well-formed template carries every placeholder exactly once.
fn substitute(out: &mut String, key: &str, value: &str) {
    let occurrences = out.matches(key).count();
    if occurrences != 1 {
        warn!("placeholder {} appears {} times in the template", key, occurrences);
    }

    *out = out.replace(key, value);
}

fn pct(part: u64, total: u64) -> String {
    format!("{:.2}", aggregate::percent(part, total))
}

fn func_name(model: &dyn ProgramModel, addr: u64) -> String {
    model
        .function_containing(addr)
        .map(|f| f.name)
        .unwrap_or_else(|| format!("sub_{:x}", addr))
}

fn row_open(counter: usize) -> String {
    let class = if counter % 2 == 1 {
        "evenLine"
    } else {
        "oddLine"
    };
    format!("<tr class=\"{}\">", class)
}

fn cell(value: impl std::fmt::Display, alignment: &str, suffix: &str) -> String {
    format!(
        "<td style=\"text-align:{}\">{}{}</td>",
        alignment, value, suffix
    )
}

fn function_table(rows: &[TimedBlock], key: SortKey, model: &dyn ProgramModel) -> String {
    let rows = aggregate::sorted_by(rows, key);

    let total_time = aggregate::total_time(&rows);
    let total_hits = aggregate::total_hits(&rows);

    rows.iter()
        // rows that were never hit carry no information; depending on the
        // sort key they are not necessarily at the end, so skip, not break
        .filter(|b| b.was_hit())
        .enumerate()
        .map(|(i, b)| {
            let counter = i + 1;
            [
                row_open(counter),
                cell(counter, "center", ""),
                cell(func_name(model, b.addr), "left", ""),
                cell(format!("0x{:X}", b.addr), "center", ""),
                cell(b.time_ms, "right", " ms"),
                cell(pct(b.time_ms, total_time), "right", " %"),
                cell(b.hits, "right", ""),
                cell(pct(b.hits, total_hits), "right", " %"),
                cell(format!("{:.2}", b.average_ms()), "right", " ms"),
                "</tr>".to_string(),
            ]
            .join("")
        })
        .join("\n")
}

fn block_table(rows: &[TimedBlock], key: SortKey, model: &dyn ProgramModel) -> String {
    let rows = aggregate::sorted_by(rows, key);

    let total_time = aggregate::total_time(&rows);
    let total_hits = aggregate::total_hits(&rows);

    rows.iter()
        .filter(|b| b.was_hit())
        .enumerate()
        .map(|(i, b)| {
            let counter = i + 1;
            [
                row_open(counter),
                cell(counter, "center", ""),
                cell(format!("0x{:X}", b.addr), "center", ""),
                cell(func_name(model, b.addr), "left", ""),
                cell(b.time_ms, "right", " ms"),
                cell(pct(b.time_ms, total_time), "right", " %"),
                cell(b.hits, "right", ""),
                cell(pct(b.hits, total_hits), "right", " %"),
                "</tr>".to_string(),
            ]
            .join("")
        })
        .join("\n")
}

fn event_table(events: &[Event], model: &dyn ProgramModel) -> String {
    events
        .iter()
        .enumerate()
        .map(|(i, event)| {
            let counter = i + 1;
            [
                row_open(counter),
                cell(counter, "center", ""),
                cell(event.timestamp, "center", " ms"),
                cell(format!("0x{:X}", event.addr), "center", ""),
                cell(func_name(model, event.addr), "left", ""),
                "</tr>".to_string(),
            ]
            .join("")
        })
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::model::fixtures::FlatModel;
    use crate::model::FunctionInfo;

    fn fixture() -> (FlatModel, Aggregation, Vec<Event>) {
        let model = FlatModel {
            functions: vec![
                FunctionInfo {
                    name: "funcA".into(),
                    start: 0x100,
                    end: 0x108,
                },
                FunctionInfo {
                    name: "funcB".into(),
                    start: 0x200,
                    end: 0x210,
                },
            ],
            insns: vec![],
            edges: vec![],
        };

        let events = vec![
            Event {
                addr: 0x100,
                timestamp: 0,
            },
            Event {
                addr: 0x104,
                timestamp: 10,
            },
        ];

        let agg = aggregate(&events, &[0x100, 0x104, 0x200], &model);

        (model, agg, events)
    }

    #[test]
    fn placeholders_are_substituted() {
        let (model, agg, events) = fixture();
        let ctx = ReportContext {
            input_name: "demo.elf",
            events: &events,
            agg: &agg,
            model: &model,
        };

        let template = "<p>%FILENAME%: %NUMBER_OF_FUNCTIONS% funcs, \
             %NUMBER_OF_HIT_FUNCTIONS% hit (%NUMBER_OF_HIT_FUNCTIONS_PERCENTAGE% %), \
             %NUMBER_OF_NOT_HIT_FUNCTIONS% not hit (%NUMBER_OF_NOT_HIT_FUNCTIONS_PERCENTAGE% %), \
             %NUMBER_OF_BLOCKS% blocks, %NUMBER_OF_HIT_BLOCKS% hit \
             (%NUMBER_OF_HIT_BLOCKS_PERCENTAGE% %), %NUMBER_OF_NOT_HIT_BLOCKS% not \
             (%NUMBER_OF_NOT_HIT_BLOCKS_PERCENTAGE% %)</p>\
             <table>%FUNCTIONS_BY_HITS%</table><table>%FUNCTIONS_BY_TIME%</table>\
             <table>%FUNCTIONS_BY_AVERAGE_TIME%</table><table>%BLOCKS_BY_HITS%</table>\
             <table>%BLOCKS_BY_TIME%</table><table>%ALL_EVENTS%</table>";

        let out = render(template, &ctx);

        assert!(!out.contains("%NUMBER_OF"), "{}", out);
        assert!(!out.contains("%FILENAME%"));
        assert!(!out.contains("%ALL_EVENTS%"));
        assert!(out.contains("demo.elf: 2 funcs, 1 hit (50.00 %)"));
        assert!(out.contains("funcA"));
    }

    #[test]
    fn unhit_rows_are_skipped() {
        let (model, agg, _) = fixture();

        // 0x200 was never hit, so neither table mentions it
        let table = block_table(&agg.blocks, SortKey::Hits, &model);
        assert!(!table.contains("0x200"));
        assert!(table.contains("0x100"));

        let funcs = function_table(&agg.functions, SortKey::Hits, &model);
        assert!(!funcs.contains("funcB"));
    }

    #[test]
    fn empty_aggregation_renders_without_faults() {
        let model = FlatModel {
            functions: vec![],
            insns: vec![],
            edges: vec![],
        };
        let agg = aggregate(&[], &[], &model);
        let ctx = ReportContext {
            input_name: "empty",
            events: &[],
            agg: &agg,
            model: &model,
        };

        let out = render("%NUMBER_OF_HIT_FUNCTIONS_PERCENTAGE%", &ctx);
        assert_eq!(out, "0.00");
    }

    #[test]
    fn shipped_template_carries_each_placeholder_exactly_once() {
        let template = include_str!("../../template.htm");

        let placeholders = [
            "%FILENAME%",
            "%NUMBER_OF_FUNCTIONS%",
            "%NUMBER_OF_HIT_FUNCTIONS%",
            "%NUMBER_OF_HIT_FUNCTIONS_PERCENTAGE%",
            "%NUMBER_OF_NOT_HIT_FUNCTIONS%",
            "%NUMBER_OF_NOT_HIT_FUNCTIONS_PERCENTAGE%",
            "%NUMBER_OF_BLOCKS%",
            "%NUMBER_OF_HIT_BLOCKS%",
            "%NUMBER_OF_HIT_BLOCKS_PERCENTAGE%",
            "%NUMBER_OF_NOT_HIT_BLOCKS%",
            "%NUMBER_OF_NOT_HIT_BLOCKS_PERCENTAGE%",
            "%FUNCTIONS_BY_HITS%",
            "%FUNCTIONS_BY_TIME%",
            "%FUNCTIONS_BY_AVERAGE_TIME%",
            "%BLOCKS_BY_HITS%",
            "%BLOCKS_BY_TIME%",
            "%ALL_EVENTS%",
        ];

        for key in placeholders {
            assert_eq!(template.matches(key).count(), 1, "{}", key);
        }
    }

    #[test]
    fn rows_alternate_classes() {
        assert!(row_open(1).contains("evenLine"));
        assert!(row_open(2).contains("oddLine"));
    }

    #[test]
    fn atomic_write_and_missing_template() {
        let dir = std::env::temp_dir().join("hotch-report-test");
        std::fs::create_dir_all(&dir).unwrap();

        let out = dir.join("results.html");
        write_atomic(&out, "<html></html>").unwrap();
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "<html></html>");

        assert!(load_template(&dir.join("nope.htm")).is_err());
    }
}
