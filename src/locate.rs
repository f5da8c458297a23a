//! `aloc save` and `aloc locate`.
//!
//! [`locate_file`] returns a structured [`LocateReport`] (also the `--json`
//! shape); [`run_locate`] prints it for humans.

use adaptive_locator_core::dom::{Document, NodeId};
use adaptive_locator_core::relocate::MatchCandidate;
use adaptive_locator_core::score::Score;
use adaptive_locator_core::{
    Engine, LocateRequest, LocatorResolver, MatchResult, Mode, Overrides, Refresh,
};
use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::config::Config;
use crate::file_store::FileStore;
use crate::markup;
use crate::selector::CssSelector;

const EXCERPT_CHARS: usize = 80;

/// Inputs for one `locate` run.
#[derive(Debug, Clone)]
pub struct LocateArgs<'a> {
    pub file: &'a Path,
    pub locator: &'a str,
    pub url: Option<&'a str>,
    pub domain: Option<&'a str>,
    /// `literal` or `adaptive`; the config decides when unset.
    pub mode: Option<&'a str>,
    pub threshold: Option<f64>,
    pub save: bool,
    pub explain: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ElementSummary {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    pub text: String,
    pub depth: usize,
    pub order: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CandidateSummary {
    pub element: ElementSummary,
    pub score: Score,
}

#[derive(Debug, Clone, Serialize)]
pub struct LocateReport {
    /// `literal`, `relocated`, or `no_match`.
    pub status: &'static str,
    pub domain: Option<String>,
    pub elements: Vec<ElementSummary>,
    pub scores: Vec<Score>,
    /// `not_requested`, `saved`, or `failed`.
    pub refresh: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<CandidateSummary>,
}

pub(crate) fn open_store(config: &Config) -> FileStore {
    FileStore::new(&config.store.dir).with_history_limit(config.store.history_limit)
}

pub(crate) fn build_engine(config: &Config) -> Result<Engine> {
    Engine::new(config.engine_options()).context("Invalid engine configuration")
}

fn load_document(file: &Path, url: Option<&str>) -> Result<Document> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read document: {}", file.display()))?;
    markup::parse_document(&text, url)
        .with_context(|| format!("Failed to parse document: {}", file.display()))
}

/// Resolve `locator` literally and store a fingerprint of the first match.
pub fn run_save(
    config: &Config,
    file: &Path,
    locator: &str,
    url: Option<&str>,
    domain: Option<&str>,
) -> Result<()> {
    let doc = load_document(file, url)?;
    let engine = build_engine(config)?;
    let store = open_store(config);

    let found = CssSelector.resolve(&doc, locator)?;
    let Some(&first) = found.first() else {
        bail!("No element matches '{}'; nothing saved.", locator);
    };

    let fp = engine.save_fingerprint(&store, &doc, locator, domain, first)?;
    println!(
        "Saved fingerprint for '{}' under {} ({} match{}, first kept).",
        locator,
        fp.domain_key(),
        found.len(),
        if found.len() == 1 { "" } else { "es" }
    );
    println!("    element: {}", describe(&summarize(&doc, first)));
    Ok(())
}

/// Run one locate call against the configured file store.
pub fn locate_file(config: &Config, args: &LocateArgs<'_>) -> Result<LocateReport> {
    let mode = match args.mode {
        Some(m) => m.parse::<Mode>()?,
        None => config.mode()?,
    };
    let doc = load_document(args.file, args.url)?;
    let engine = build_engine(config)?;
    let store = open_store(config);

    let overrides = Overrides {
        threshold: args.threshold,
        ..Default::default()
    };
    let mut req = LocateRequest::new(&doc, args.locator, mode)
        .save(args.save || config.adaptive.save)
        .overrides(&overrides);
    if let Some(d) = args.domain {
        req = req.domain(d);
    }

    let located = engine.locate(&store, &CssSelector, &req)?;

    let (status, scores) = match &located.result {
        MatchResult::Literal(_) => ("literal", Vec::new()),
        MatchResult::Relocated(_, scores) => ("relocated", scores.clone()),
        MatchResult::NoMatch => ("no_match", Vec::new()),
    };
    let (refresh, refresh_error) = match &located.refresh {
        Refresh::NotRequested => ("not_requested", None),
        Refresh::Saved => ("saved", None),
        Refresh::Failed(e) => ("failed", Some(e.to_string())),
    };
    let candidates = if args.explain {
        located
            .candidates
            .iter()
            .map(|c: &MatchCandidate| CandidateSummary {
                element: summarize(&doc, c.node),
                score: c.score,
            })
            .collect()
    } else {
        Vec::new()
    };

    Ok(LocateReport {
        status,
        domain: located.domain_key,
        elements: located
            .result
            .elements()
            .iter()
            .map(|&id| summarize(&doc, id))
            .collect(),
        scores,
        refresh,
        refresh_error,
        candidates,
    })
}

/// CLI entry point for `aloc locate`.
pub fn run_locate(config: &Config, args: &LocateArgs<'_>, json: bool) -> Result<()> {
    let report = locate_file(config, args)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    match report.status {
        "literal" => println!("Literal match: {} element(s)", report.elements.len()),
        "relocated" => {
            if let Some(s) = report.scores.first() {
                println!(
                    "Relocated [{:.2}] text={:.2} attr={:.2} structure={:.2} position={:.2}",
                    s.total, s.sub.text, s.sub.attr, s.sub.structure, s.sub.position
                );
            }
        }
        _ => println!("No match."),
    }

    for (i, el) in report.elements.iter().enumerate() {
        println!("{}. {}", i + 1, describe(el));
        println!("    excerpt: \"{}\"", el.text);
    }

    match report.refresh {
        "saved" => println!("Fingerprint saved."),
        "failed" => eprintln!(
            "Warning: fingerprint not saved: {}",
            report.refresh_error.as_deref().unwrap_or("unknown error")
        ),
        _ => {}
    }

    if args.explain {
        if report.candidates.is_empty() {
            println!("No candidates scored.");
        }
        for (i, c) in report.candidates.iter().enumerate() {
            println!(
                "  #{} [{:.2}] {} (text={:.2} attr={:.2} structure={:.2} position={:.2})",
                i + 1,
                c.score.total,
                describe(&c.element),
                c.score.sub.text,
                c.score.sub.attr,
                c.score.sub.structure,
                c.score.sub.position
            );
        }
    }

    Ok(())
}

fn summarize(doc: &Document, id: NodeId) -> ElementSummary {
    let text: String = doc
        .text(id)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let text = match text.char_indices().nth(EXCERPT_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text,
    };
    match doc.element(id) {
        Some(el) => ElementSummary {
            tag: el.tag().to_string(),
            attributes: el.attributes().clone(),
            text,
            depth: el.depth(),
            order: el.order(),
        },
        None => ElementSummary {
            tag: String::new(),
            attributes: BTreeMap::new(),
            text,
            depth: 0,
            order: 0,
        },
    }
}

/// `<tag key="value" ...>`
fn describe(el: &ElementSummary) -> String {
    let mut out = format!("<{}", el.tag);
    for (k, v) in &el.attributes {
        out.push_str(&format!(" {}=\"{}\"", k, v));
    }
    out.push('>');
    out
}
