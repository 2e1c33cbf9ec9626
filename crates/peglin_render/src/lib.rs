use std::fmt::Write as _;

use peglin_core::core_api::{
    CapabilityIssue, ClassTotals, OrbDetail, OrbPlayData, OrbTotals, RunRecord, RunSummary, Session,
};
use peglin_core::export::value_to_json;
use peglin_core::graph::{Graph, Value, simple_type_name};
use peglin_core::navigator::{MAX_DUMP_DEPTH, walk};
use peglin_core::type_library::TypeResolver;
use serde_json::{Map as JsonMap, Value as JsonValue};

const LIST_COL_INDEX: usize = 5;
const LIST_COL_RESULT: usize = 7;
const LIST_COL_CLASS: usize = 14;
const LIST_COL_CRUCIBALL: usize = 11;
const LIST_COL_DAMAGE: usize = 12;
const NAME_COL_WIDTH: usize = 18;
const RECONSTRUCTED_MARK: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JsonStyle {
    #[default]
    CanonicalV1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextRenderOptions {
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Wins,
    Losses,
}

/// Which runs a listing shows. Indices always refer to the stored order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunFilter {
    pub class: Option<String>,
    pub outcome: Option<Outcome>,
    pub limit: Option<usize>,
}

impl RunFilter {
    pub fn is_empty(&self) -> bool {
        self.class.is_none() && self.outcome.is_none() && self.limit.is_none()
    }

    pub fn matches(&self, run: &RunRecord) -> bool {
        if let Some(class) = &self.class
            && !run.class.eq_ignore_ascii_case(class)
        {
            return false;
        }
        match self.outcome {
            Some(Outcome::Wins) => run.won,
            Some(Outcome::Losses) => !run.won,
            None => true,
        }
    }

    pub fn apply<'r>(&self, runs: &'r [RunRecord]) -> Vec<(usize, &'r RunRecord)> {
        runs.iter()
            .enumerate()
            .filter(|(_, run)| self.matches(run))
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}

pub fn render_json_summary(session: &Session, style: JsonStyle) -> JsonValue {
    render_json_run_summary(&session.summary(), &session.capabilities().issues, style)
}

/// Summary of a run list that did not come from a session, e.g. an import.
pub fn render_json_run_summary(
    summary: &RunSummary,
    issues: &[CapabilityIssue],
    style: JsonStyle,
) -> JsonValue {
    match style {
        JsonStyle::CanonicalV1 => JsonValue::Object(summary_json(summary, issues)),
    }
}

pub fn render_json_runs(rows: &[(usize, &RunRecord)], style: JsonStyle) -> JsonValue {
    match style {
        JsonStyle::CanonicalV1 => JsonValue::Array(
            rows.iter()
                .map(|(index, run)| JsonValue::Object(run_row_json(*index, run)))
                .collect(),
        ),
    }
}

pub fn render_json_run(index: usize, run: &RunRecord, style: JsonStyle) -> JsonValue {
    match style {
        JsonStyle::CanonicalV1 => {
            let mut out = JsonMap::new();
            out.insert("index".to_string(), JsonValue::from(index));
            if let Ok(JsonValue::Object(fields)) = serde_json::to_value(run) {
                out.extend(fields);
            }
            JsonValue::Object(out)
        }
    }
}

/// JSON view of one graph section (or the whole root).
pub fn render_json_section(graph: &Graph, value: &Value) -> JsonValue {
    value_to_json(graph, value)
}

pub fn render_text_summary(session: &Session, options: TextRenderOptions) -> String {
    render_summary_impl(
        &session.summary(),
        &session.capabilities().issues,
        Some(session.dialect().as_str()),
        options,
    )
}

pub fn render_text_run_summary(
    summary: &RunSummary,
    issues: &[CapabilityIssue],
    options: TextRenderOptions,
) -> String {
    render_summary_impl(summary, issues, None, options)
}

pub fn render_text_runs(rows: &[(usize, &RunRecord)], options: TextRenderOptions) -> String {
    let mut out = String::new();
    if rows.is_empty() {
        writeln!(&mut out, "No runs recorded.").expect("writing to String cannot fail");
        return out;
    }

    let header = format!(
        "{:>i$}  {:<r$}{:<c$}{:<k$}{:>d$}  {}",
        "#",
        "Result",
        "Class",
        "Cruciball",
        "Damage",
        "Time",
        i = LIST_COL_INDEX,
        r = LIST_COL_RESULT,
        c = LIST_COL_CLASS,
        k = LIST_COL_CRUCIBALL,
        d = LIST_COL_DAMAGE,
    );
    writeln!(&mut out, "{}", header.trim_end()).expect("writing to String cannot fail");

    let mut any_reconstructed = false;
    for (index, run) in rows {
        any_reconstructed |= run.reconstructed;
        let marker = if run.reconstructed {
            RECONSTRUCTED_MARK
        } else {
            ""
        };
        let index_label = format!("{index}{marker}");
        let cruciball = if run.cruciball_level > 0 {
            run.cruciball_level.to_string()
        } else {
            String::new()
        };
        let duration = run.duration_ms.map(format_duration_ms).unwrap_or_default();
        let line = format!(
            "{:>i$}  {:<r$}{:<c$}{:<k$}{:>d$}  {}",
            index_label,
            outcome_label(run.won),
            fit_column(&run.class, LIST_COL_CLASS - 1),
            cruciball,
            format_number_with_commas(run.damage_dealt),
            duration,
            i = LIST_COL_INDEX,
            r = LIST_COL_RESULT,
            c = LIST_COL_CLASS,
            k = LIST_COL_CRUCIBALL,
            d = LIST_COL_DAMAGE,
        );
        writeln!(&mut out, "{}", line.trim_end()).expect("writing to String cannot fail");
        if options.verbose && !run.id.is_empty() {
            writeln!(&mut out, "{:>i$}  id {}", "", run.id, i = LIST_COL_INDEX)
                .expect("writing to String cannot fail");
        }
    }

    if any_reconstructed {
        writeln!(&mut out).expect("writing to String cannot fail");
        writeln!(
            &mut out,
            "{RECONSTRUCTED_MARK} rebuilt from lifetime totals, not a recorded run"
        )
        .expect("writing to String cannot fail");
    }
    out
}

pub fn render_text_run(index: usize, run: &RunRecord, options: TextRenderOptions) -> String {
    let mut out = String::new();
    let title = if run.id.is_empty() {
        format!("Run {index}")
    } else {
        format!("Run {index} ({})", run.id)
    };
    writeln!(&mut out, "{title}").expect("writing to String cannot fail");
    if run.reconstructed {
        writeln!(&mut out, "  Rebuilt from lifetime totals; only the outcome is known.")
            .expect("writing to String cannot fail");
    }

    write_pair(&mut out, "Result", if run.won { "Won" } else { "Lost" });
    write_pair(&mut out, "Class", &run.class);
    if run.cruciball_level > 0 {
        write_pair(&mut out, "Cruciball", &run.cruciball_level.to_string());
    }
    if let Some(started) = &run.started_at {
        write_pair(&mut out, "Started", started);
    }
    if let Some(ended) = &run.ended_at {
        write_pair(&mut out, "Ended", ended);
    }
    if let Some(ms) = run.duration_ms {
        write_pair(&mut out, "Duration", &format_duration_ms(ms));
    }
    if let Some(killer) = &run.defeated_by {
        write_pair(&mut out, "Defeated by", killer);
    }

    let counters = [
        ("Damage dealt", run.damage_dealt),
        ("Damage negated", run.damage_negated),
        ("Pegs hit", run.pegs_hit),
        ("Pegs refreshed", run.pegs_refreshed),
        ("Crit pegs hit", run.crit_pegs_hit),
        ("Bomb pegs hit", run.bomb_pegs_hit),
        ("Shots", run.shots),
        ("Crit shots", run.crit_shots),
        ("Bombs thrown", run.bombs_thrown),
        ("Coins earned", run.coins_earned),
        ("Coins spent", run.coins_spent),
    ];
    for (label, value) in counters {
        if value != 0 || options.verbose {
            write_pair(&mut out, label, &format_number_with_commas(value));
        }
    }

    if !run.rooms.is_empty() {
        write_pair(&mut out, "Rooms", &run.rooms.join(", "));
    }
    if !run.bosses.is_empty() {
        write_pair(&mut out, "Bosses", &run.bosses.join(", "));
    }

    if !run.orbs.is_empty() {
        writeln!(&mut out).expect("writing to String cannot fail");
        writeln!(&mut out, "Orbs").expect("writing to String cannot fail");
        let mut orbs: Vec<&OrbPlayData> = run.orbs.values().collect();
        orbs.sort_by(|a, b| {
            b.damage_dealt
                .cmp(&a.damage_dealt)
                .then_with(|| a.id.cmp(&b.id))
        });
        for orb in orbs {
            write_orb_line(&mut out, orb, options);
        }
    }

    write_counts(&mut out, "Status effects", &run.status_effects);
    write_counts(&mut out, "Slime pegs", &run.slime_pegs);

    if options.verbose && !run.enemies.is_empty() {
        writeln!(&mut out).expect("writing to String cannot fail");
        writeln!(&mut out, "Enemies").expect("writing to String cannot fail");
        for (name, enemy) in &run.enemies {
            let mut line = format!(
                "  {:<w$}fought {}",
                fit_column(name, NAME_COL_WIDTH - 1),
                enemy.amount_fought,
                w = NAME_COL_WIDTH
            );
            if enemy.melee_damage_received > 0 || enemy.ranged_damage_received > 0 {
                let _ = write!(
                    line,
                    "  took {} melee / {} ranged",
                    format_number_with_commas(enemy.melee_damage_received),
                    format_number_with_commas(enemy.ranged_damage_received)
                );
            }
            if enemy.defeated_player {
                line.push_str("  (defeated you)");
            }
            writeln!(&mut out, "{line}").expect("writing to String cannot fail");
        }
    }
    out
}

/// Indented tree of `start` down to `max_depth` levels. Records seen earlier
/// in the dump are marked and not expanded again.
pub fn render_graph_dump(
    graph: &Graph,
    resolver: Option<&TypeResolver>,
    label: &str,
    start: &Value,
    max_depth: usize,
) -> String {
    let mut out = String::new();
    walk(graph, start, max_depth.min(MAX_DUMP_DEPTH), |visit| {
        let key = visit.key.as_deref().unwrap_or(label);
        let mut line = format!(
            "{}{}: {}",
            "  ".repeat(visit.depth),
            key,
            describe_value(graph, resolver, visit.value)
        );
        if visit.repeated {
            line.push_str(" (seen above)");
        }
        writeln!(&mut out, "{line}").expect("writing to String cannot fail");
    });
    out
}

fn summary_json(summary: &RunSummary, issues: &[CapabilityIssue]) -> JsonMap<String, JsonValue> {
    let mut out = JsonMap::new();
    out.insert("total_runs".to_string(), JsonValue::from(summary.total_runs));
    out.insert("wins".to_string(), JsonValue::from(summary.wins));
    out.insert("losses".to_string(), JsonValue::from(summary.losses));
    out.insert("win_rate".to_string(), JsonValue::from(summary.win_rate));
    out.insert(
        "reconstructed_runs".to_string(),
        JsonValue::from(summary.reconstructed_runs),
    );
    out.insert(
        "highest_cruciball_won".to_string(),
        summary
            .highest_cruciball_won
            .map_or(JsonValue::Null, JsonValue::from),
    );
    out.insert("total_damage".to_string(), JsonValue::from(summary.total_damage));
    out.insert(
        "total_play_time_ms".to_string(),
        JsonValue::from(summary.total_play_time_ms),
    );
    out.insert(
        "classes".to_string(),
        JsonValue::Array(summary.classes.iter().map(class_totals_to_json).collect()),
    );
    out.insert(
        "top_orbs".to_string(),
        JsonValue::Array(summary.top_orbs.iter().map(orb_totals_to_json).collect()),
    );
    out.insert(
        "issues".to_string(),
        JsonValue::Array(
            issues
                .iter()
                .map(|issue| JsonValue::String(issue_code(*issue).to_string()))
                .collect(),
        ),
    );
    out
}

fn class_totals_to_json(c: &ClassTotals) -> JsonValue {
    let mut m = JsonMap::new();
    m.insert("class".to_string(), JsonValue::String(c.class.clone()));
    m.insert("runs".to_string(), JsonValue::from(c.runs));
    m.insert("wins".to_string(), JsonValue::from(c.wins));
    m.insert(
        "highest_cruciball_won".to_string(),
        c.highest_cruciball_won.map_or(JsonValue::Null, JsonValue::from),
    );
    JsonValue::Object(m)
}

fn orb_totals_to_json(o: &OrbTotals) -> JsonValue {
    let mut m = JsonMap::new();
    m.insert("id".to_string(), JsonValue::String(o.id.clone()));
    m.insert("name".to_string(), JsonValue::String(o.name.clone()));
    m.insert("damage_dealt".to_string(), JsonValue::from(o.damage_dealt));
    m.insert("times_fired".to_string(), JsonValue::from(o.times_fired));
    JsonValue::Object(m)
}

fn run_row_json(index: usize, run: &RunRecord) -> JsonMap<String, JsonValue> {
    let mut m = JsonMap::new();
    m.insert("index".to_string(), JsonValue::from(index));
    m.insert("id".to_string(), JsonValue::String(run.id.clone()));
    m.insert("won".to_string(), JsonValue::Bool(run.won));
    m.insert("class".to_string(), JsonValue::String(run.class.clone()));
    m.insert(
        "cruciball_level".to_string(),
        JsonValue::from(run.cruciball_level),
    );
    m.insert("damage_dealt".to_string(), JsonValue::from(run.damage_dealt));
    m.insert(
        "duration_ms".to_string(),
        run.duration_ms.map_or(JsonValue::Null, JsonValue::from),
    );
    m.insert("reconstructed".to_string(), JsonValue::Bool(run.reconstructed));
    m
}

fn issue_code(issue: CapabilityIssue) -> &'static str {
    match issue {
        CapabilityIssue::ReconstructedHistory => "reconstructed_history",
        CapabilityIssue::MissingTypeLibrary => "missing_type_library",
        CapabilityIssue::FreshProfile => "fresh_profile",
    }
}

fn issue_note(issue: CapabilityIssue) -> &'static str {
    match issue {
        CapabilityIssue::ReconstructedHistory => {
            "No run history in this file; runs were rebuilt from lifetime totals."
        }
        CapabilityIssue::MissingTypeLibrary => {
            "Type library not loaded; classes and rooms are shown as numbers."
        }
        CapabilityIssue::FreshProfile => "No cruciball progression recorded yet.",
    }
}

fn render_summary_impl(
    summary: &RunSummary,
    issues: &[CapabilityIssue],
    dialect: Option<&str>,
    options: TextRenderOptions,
) -> String {
    let mut out = String::new();
    writeln!(&mut out, "PEGLIN RUN STATISTICS").expect("writing to String cannot fail");
    writeln!(&mut out).expect("writing to String cannot fail");

    writeln!(
        &mut out,
        "  Runs: {:<8}Wins: {:<8}Losses: {:<8}Win rate: {:.1}%",
        summary.total_runs,
        summary.wins,
        summary.losses,
        summary.win_rate * 100.0
    )
    .expect("writing to String cannot fail");
    if let Some(level) = summary.highest_cruciball_won
        && level > 0
    {
        write_pair(&mut out, "Highest cruciball won", &level.to_string());
    }
    write_pair(
        &mut out,
        "Total damage",
        &format_number_with_commas(summary.total_damage),
    );
    if summary.total_play_time_ms > 0 {
        write_pair(
            &mut out,
            "Play time",
            &format_duration_ms(summary.total_play_time_ms),
        );
    }
    if summary.reconstructed_runs > 0 {
        write_pair(
            &mut out,
            "Reconstructed runs",
            &summary.reconstructed_runs.to_string(),
        );
    }
    if options.verbose
        && let Some(dialect) = dialect
    {
        write_pair(&mut out, "Stream dialect", dialect);
    }

    if !summary.classes.is_empty() {
        writeln!(&mut out).expect("writing to String cannot fail");
        writeln!(&mut out, "Classes").expect("writing to String cannot fail");
        for class in &summary.classes {
            let mut line = format!(
                "  {:<w$}runs {:<6}wins {}",
                fit_column(&class.class, NAME_COL_WIDTH - 1),
                class.runs,
                class.wins,
                w = NAME_COL_WIDTH
            );
            if let Some(level) = class.highest_cruciball_won
                && level > 0
            {
                let _ = write!(line, "  best cruciball {level}");
            }
            writeln!(&mut out, "{line}").expect("writing to String cannot fail");
        }
    }

    if !summary.top_orbs.is_empty() {
        writeln!(&mut out).expect("writing to String cannot fail");
        writeln!(&mut out, "Top orbs").expect("writing to String cannot fail");
        for orb in &summary.top_orbs {
            writeln!(
                &mut out,
                "  {:<w$}{:>12} dmg  {} fired",
                fit_column(&orb.name, NAME_COL_WIDTH - 1),
                format_number_with_commas(orb.damage_dealt),
                format_number_with_commas(orb.times_fired),
                w = NAME_COL_WIDTH
            )
            .expect("writing to String cannot fail");
        }
    }

    let notes: Vec<&str> = issues
        .iter()
        .filter(|issue| options.verbose || **issue != CapabilityIssue::FreshProfile)
        .map(|issue| issue_note(*issue))
        .collect();
    if !notes.is_empty() {
        writeln!(&mut out).expect("writing to String cannot fail");
        for note in notes {
            writeln!(&mut out, "Note: {note}").expect("writing to String cannot fail");
        }
    }
    out
}

fn write_pair(out: &mut String, label: &str, value: &str) {
    writeln!(out, "  {label}: {value}").expect("writing to String cannot fail");
}

fn write_orb_line(out: &mut String, orb: &OrbPlayData, options: TextRenderOptions) {
    let mut line = format!(
        "  {:<w$}{:>12} dmg  {} fired",
        fit_column(&orb.name, NAME_COL_WIDTH - 1),
        format_number_with_commas(orb.damage_dealt),
        format_number_with_commas(orb.times_fired),
        w = NAME_COL_WIDTH
    );
    match orb.detail {
        OrbDetail::Plain => {}
        OrbDetail::DualComponent {
            component_damage,
            component_fires,
        } => {
            let _ = write!(
                line,
                "  [{} / {} dmg, {} / {} fired]",
                format_number_with_commas(component_damage[0]),
                format_number_with_commas(component_damage[1]),
                component_fires[0],
                component_fires[1]
            );
        }
        OrbDetail::UnlimitedUpgrade { highest_level } => {
            let _ = write!(line, "  [level {highest_level}]");
        }
    }
    if options.verbose {
        if orb.times_discarded > 0 || orb.times_removed > 0 {
            let _ = write!(
                line,
                "  discarded {} removed {}",
                orb.times_discarded, orb.times_removed
            );
        }
        if orb.level_instances.iter().any(|n| *n > 0) {
            let levels: Vec<String> = orb
                .level_instances
                .iter()
                .map(|n| n.to_string())
                .collect();
            let _ = write!(line, "  copies by level {}", levels.join("/"));
        }
    }
    writeln!(out, "{line}").expect("writing to String cannot fail");
}

fn write_counts(out: &mut String, title: &str, counts: &std::collections::BTreeMap<String, i64>) {
    if counts.is_empty() {
        return;
    }
    writeln!(out).expect("writing to String cannot fail");
    writeln!(out, "{title}").expect("writing to String cannot fail");
    for (name, count) in counts {
        writeln!(
            out,
            "  {:<w$}{}",
            fit_column(name, NAME_COL_WIDTH - 1),
            format_number_with_commas(*count),
            w = NAME_COL_WIDTH
        )
        .expect("writing to String cannot fail");
    }
}

fn describe_value(graph: &Graph, resolver: Option<&TypeResolver>, value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(v) => v.to_string(),
        Value::Int32(v) => v.to_string(),
        Value::Int64(v) => v.to_string(),
        Value::Float32(v) => v.to_string(),
        Value::Float64(v) => v.to_string(),
        Value::String(s) => format!("{s:?}"),
        Value::Enum { type_name, raw } => {
            match resolver.and_then(|r| r.enum_name(type_name, *raw)) {
                Some(label) => format!("{label} ({}={raw})", simple_type_name(type_name)),
                None => format!("{}={raw}", simple_type_name(type_name)),
            }
        }
        Value::Array {
            element_type,
            items,
        } => format!(
            "{}[{}]",
            simple_type_name(element_type),
            items.len()
        ),
        Value::Dictionary { entries, .. } => format!("{{{} entries}}", entries.len()),
        Value::Node(_) => graph
            .type_name_of(value)
            .map(|name| format!("<{name}>"))
            .unwrap_or_else(|| "<record>".to_string()),
    }
}

fn outcome_label(won: bool) -> &'static str {
    if won { "WIN" } else { "LOSS" }
}

fn fit_column(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        return value.to_string();
    }
    if width <= 3 {
        return value.chars().take(width).collect();
    }

    let mut out = String::with_capacity(width);
    for ch in value.chars().take(width - 3) {
        out.push(ch);
    }
    out.push_str("...");
    out
}

/// `1234567` -> `1,234,567`.
pub fn format_number_with_commas(n: i64) -> String {
    if n < 0 {
        format!("-{}", group_digits(n.unsigned_abs()))
    } else {
        group_digits(n.unsigned_abs())
    }
}

fn group_digits(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i).is_multiple_of(3) {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// `1_234_000` -> `20m 34s`; hours appear once the run passes an hour.
pub fn format_duration_ms(ms: i64) -> String {
    let total_secs = ms.max(0) / 1000;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{hours}h {minutes:02}m {seconds:02}s")
    } else {
        format!("{minutes}m {seconds:02}s")
    }
}
