//! jsontimeline CLI - extract timeline entities from JSON documents
//!
//! Entities and other data go to stdout; progress, warnings and errors go to stderr.

use clap::{Parser, Subcommand};
use std::io;
use std::path::{Path, PathBuf};
use std::process;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use jsontimeline::pipeline::{table_rows, FilterState, FilterValue};
use jsontimeline::rules::RuleSet;
use jsontimeline::runtime::{load_rules_file, probe_rule, Settings};
use jsontimeline::serialization::{write_entities, write_items, OutputFormat};
use jsontimeline::source::{load_document, load_documents, SourceDocument};
use jsontimeline::{
    extract_from_document, list_available_paths, merge_entity_groups, parse_date, resolve_path,
    suggest_rules, transform, DateRange, TimelineEntity,
};

#[derive(Parser)]
#[command(name = "jsontimeline")]
#[command(version, about = "Extract timeline entities from arbitrary JSON documents", long_about = None)]
struct Cli {
    /// Settings file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract entities from one or more documents
    Extract {
        /// JSON documents
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Rule-set file (JSON array); defaults to the configured rules
        #[arg(short, long)]
        rules: Option<PathBuf>,

        /// Ignore all rules and auto-detect
        #[arg(long)]
        auto: bool,

        /// Output format (ndjson, json, pretty)
        #[arg(short, long, default_value = "ndjson")]
        format: OutputFormat,
    },

    /// Extract, merge and filter entities for display
    View {
        /// JSON documents
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Rule-set file (JSON array); defaults to the configured rules
        #[arg(short, long)]
        rules: Option<PathBuf>,

        /// Keep entities ending on or after this date
        #[arg(long)]
        from: Option<String>,

        /// Keep entities starting on or before this date
        #[arg(long)]
        to: Option<String>,

        /// Only these source arrays (repeatable)
        #[arg(long = "array")]
        arrays: Vec<String>,

        /// Only these source files (repeatable)
        #[arg(long = "file")]
        selected_files: Vec<String>,

        /// Column filter as column=value (repeatable)
        #[arg(long = "filter")]
        filters: Vec<String>,

        /// Emit flattened table rows instead of entities
        #[arg(long)]
        table: bool,

        /// Output format (ndjson, json, pretty)
        #[arg(short, long, default_value = "ndjson")]
        format: OutputFormat,
    },

    /// List the addressable paths of a document
    Paths {
        file: PathBuf,

        /// Maximum nesting depth
        #[arg(short, long)]
        depth: Option<usize>,
    },

    /// Resolve a dotted/bracketed path in a document
    Resolve {
        file: PathBuf,
        path: String,
    },

    /// Suggest extraction rules for a document
    Suggest {
        file: PathBuf,
    },

    /// Import a rule-set file and report on it
    ValidateRules {
        rules: PathBuf,

        /// Check each rule's array path against this document
        #[arg(long)]
        against: Option<PathBuf>,
    },
}

fn main() {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let result = load_settings(cli.config.as_deref()).and_then(|settings| match cli.command {
        Commands::Extract { files, rules, auto, format } => {
            extract(&settings, files, rules, auto, format)
        }
        Commands::View {
            files,
            rules,
            from,
            to,
            arrays,
            selected_files,
            filters,
            table,
            format,
        } => {
            let filter_state = build_filter_state(from, to, arrays, filters)?;
            view(&settings, files, rules, selected_files, filter_state, table, format)
        }
        Commands::Paths { file, depth } => paths(&settings, &file, depth),
        Commands::Resolve { file, path } => resolve(&settings, &file, &path),
        Commands::Suggest { file } => suggest(&settings, &file),
        Commands::ValidateRules { rules, against } => validate_rules(&settings, &rules, against),
    });

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn load_settings(config: Option<&Path>) -> Result<Settings, String> {
    let settings = match config {
        Some(path) => Settings::load_from_file(path).map_err(|e| e.to_string())?,
        None => Settings::default(),
    };
    settings.with_env_overrides().map_err(|e| e.to_string())
}

fn load_rules(settings: &Settings, rules: Option<PathBuf>) -> Result<RuleSet, String> {
    let rule_set = match rules {
        Some(path) => load_rules_file(&path),
        None => settings.load_rules(),
    }
    .map_err(|e| e.to_string())?;

    eprintln!("  ✓ Loaded {} rules ({} enabled)", rule_set.len(), rule_set.enabled().count());
    Ok(rule_set)
}

/// Extract from every loadable document and merge the results.
///
/// Load failures are reported and skipped; the run fails only when no
/// document could be loaded at all.
fn extract_documents(
    settings: &Settings,
    files: &[PathBuf],
    rule_set: &RuleSet,
) -> Result<Vec<TimelineEntity>, String> {
    let loaded = load_documents(files, settings);
    for failure in &loaded.failures {
        eprintln!("  ✗ {}", failure);
    }
    if loaded.documents.is_empty() {
        return Err("No documents could be loaded".to_string());
    }

    let rules = rule_set.to_vec();
    let mut groups = Vec::with_capacity(loaded.documents.len());

    for SourceDocument { id, content, .. } in &loaded.documents {
        let (entities, warnings) = extract_from_document(id, content, &rules).into_parts();
        for warning in &warnings {
            eprintln!("  ⚠ {}", warning);
        }
        groups.push(entities);
    }

    Ok(merge_entity_groups(groups))
}

fn extract(
    settings: &Settings,
    files: Vec<PathBuf>,
    rules: Option<PathBuf>,
    auto: bool,
    format: OutputFormat,
) -> Result<(), String> {
    let rule_set = if auto { RuleSet::new() } else { load_rules(settings, rules)? };

    let entities = extract_documents(settings, &files, &rule_set)?;
    eprintln!("  ✓ Extracted {} entities", entities.len());

    write_entities(io::stdout().lock(), &entities, format).map_err(|e| e.to_string())
}

fn parse_bound(raw: Option<String>, flag: &str) -> Result<Option<DateTime<Utc>>, String> {
    match raw {
        Some(text) => parse_date(text.as_str())
            .map(Some)
            .ok_or_else(|| format!("--{} is not a recognizable date: {}", flag, text)),
        None => Ok(None),
    }
}

/// `column=value`; values that parse as JSON keep their type, everything else is text.
fn parse_column_filter(raw: &str) -> Result<(String, FilterValue), String> {
    let (column, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("Filter must look like column=value: {}", raw))?;
    if column.is_empty() {
        return Err(format!("Filter has no column: {}", raw));
    }
    let value = serde_json::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((column.to_string(), FilterValue::from_json(value)))
}

fn build_filter_state(
    from: Option<String>,
    to: Option<String>,
    arrays: Vec<String>,
    filters: Vec<String>,
) -> Result<FilterState, String> {
    let from = parse_bound(from, "from")?;
    let to = parse_bound(to, "to")?;

    let date_range = match (from, to) {
        (None, None) => None,
        (start, end) => Some(DateRange::new(
            start.unwrap_or(DateTime::<Utc>::MIN_UTC),
            end.unwrap_or(DateTime::<Utc>::MAX_UTC),
        )),
    };

    let mut state = FilterState {
        date_range,
        array_types: arrays,
        ..FilterState::default()
    };
    for raw in &filters {
        let (column, value) = parse_column_filter(raw)?;
        state.column_filters.insert(column, value);
    }
    Ok(state)
}

fn view(
    settings: &Settings,
    files: Vec<PathBuf>,
    rules: Option<PathBuf>,
    selected_files: Vec<String>,
    filter_state: FilterState,
    table: bool,
    format: OutputFormat,
) -> Result<(), String> {
    let rule_set = load_rules(settings, rules)?;
    let entities = extract_documents(settings, &files, &rule_set)?;

    let view = transform(&entities, &rule_set.to_vec(), &selected_files, &filter_state);
    eprintln!("  ✓ {} of {} entities match", view.entities.len(), entities.len());

    let out = io::stdout().lock();
    let written = if table {
        write_items(out, &table_rows(&view.entities), format)
    } else {
        write_entities(out, &view.entities, format)
    };
    written.map_err(|e| e.to_string())
}

fn paths(settings: &Settings, file: &Path, depth: Option<usize>) -> Result<(), String> {
    let document = load_document(file, settings).map_err(|e| e.to_string())?;
    let depth = depth.unwrap_or(settings.available_paths_depth);

    for path in list_available_paths(&document.content, depth) {
        println!("{}", path);
    }
    Ok(())
}

fn resolve(settings: &Settings, file: &Path, path: &str) -> Result<(), String> {
    let document = load_document(file, settings).map_err(|e| e.to_string())?;

    let value = resolve_path(&document.content, path)
        .ok_or_else(|| format!("Path not found: {}", path))?;
    let rendered = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{}", rendered);
    Ok(())
}

fn suggest(settings: &Settings, file: &Path) -> Result<(), String> {
    let document = load_document(file, settings).map_err(|e| e.to_string())?;

    let suggestions = suggest_rules(&document.content, &settings.color_palette);
    eprintln!("  ✓ {} rule suggestions", suggestions.len());

    let rendered = RuleSet::from(suggestions).export_json().map_err(|e| e.to_string())?;
    println!("{}", rendered);
    Ok(())
}

fn validate_rules(settings: &Settings, rules: &Path, against: Option<PathBuf>) -> Result<(), String> {
    let rule_set = load_rules_file(rules).map_err(|e| e.to_string())?;
    println!("✓ {} valid rules in {}", rule_set.len(), rules.display());

    let document = match against {
        Some(path) => Some(load_document(&path, settings).map_err(|e| e.to_string())?),
        None => None,
    };

    for rule in rule_set.iter() {
        let state = if rule.enabled { "enabled" } else { "disabled" };
        match &document {
            Some(doc) => match probe_rule(&doc.content, rule) {
                Some(count) => println!("  {} ({}): {} elements at '{}'", rule.name, state, count, rule.array_path),
                None => println!("  {} ({}): no array at '{}'", rule.name, state, rule.array_path),
            },
            None => println!("  {} ({}): {}", rule.name, state, rule.array_path),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_column_filter() {
        assert_eq!(
            parse_column_filter("id=E1").unwrap(),
            ("id".to_string(), FilterValue::String("E1".to_string()))
        );
        assert_eq!(
            parse_column_filter("yValue=3").unwrap(),
            ("yValue".to_string(), FilterValue::Number(3.0))
        );
        assert_eq!(
            parse_column_filter("owner.team=a=b").unwrap().1,
            FilterValue::String("a=b".to_string())
        );
        assert!(parse_column_filter("novalue").is_err());
        assert!(parse_column_filter("=x").is_err());
    }

    #[test]
    fn test_open_ended_date_range() {
        let state = build_filter_state(Some("2024-03-01".into()), None, vec![], vec![]).unwrap();
        let range = state.date_range.unwrap();
        assert_eq!(range.end, DateTime::<Utc>::MAX_UTC);

        assert!(build_filter_state(Some("whenever".into()), None, vec![], vec![]).is_err());
        assert!(build_filter_state(None, None, vec![], vec![]).unwrap().date_range.is_none());
    }
}
