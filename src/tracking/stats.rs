//! Aggregate statistics over tracked pump events.
//!
//! Everything here is a pure read: stats are recomputed from the event rows
//! on demand and never persisted as separate mutable state, so they survive
//! crashes for free. Open events count toward totals but carry no outcome
//! until they close.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::detector_core::DetectionProfile;
use crate::tracking::event::TrackedEvent;

/// Closed events shown in the compact recent-history strip.
pub const RECENT_OUTCOME_LIMIT: usize = 10;
/// Minimum closed events before a symbol can appear in the performer lists.
pub const PERFORMER_MIN_CLOSED: usize = 2;
/// Entries per performer list.
const PERFORMER_LIMIT: usize = 3;

/// Per-symbol pump history, on the 50%-retrace success criterion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolStats {
    pub symbol: String,
    pub total_events: usize,
    pub open_events: usize,
    pub closed_events: usize,
    pub retrace_successes: usize,
    pub retrace_rate_pct: f64,
    pub avg_time_to_50pct_secs: Option<i64>,
    pub full_reversals: usize,
    pub full_reversal_rate_pct: f64,
    pub avg_time_to_full_secs: Option<i64>,
    /// Outcomes of the most recent closed events, newest detection first.
    /// `true` means the pump retraced at least 50%.
    pub recent_outcomes: Vec<bool>,
}

/// Symbol entry in the top/worst performer lists.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Performer {
    pub symbol: String,
    pub retrace_rate_pct: f64,
    pub closed_events: usize,
}

/// Profile-wide summary plus the per-symbol histories that clear the
/// profile's `min_pumps_for_history` gate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateStats {
    pub profile: String,
    pub total_events: usize,
    pub open_events: usize,
    pub closed_events: usize,
    pub retrace_successes: usize,
    pub retrace_rate_pct: f64,
    pub avg_time_to_50pct_secs: Option<i64>,
    pub full_reversals: usize,
    pub full_reversal_rate_pct: f64,
    pub symbols: Vec<SymbolStats>,
    pub top_performers: Vec<Performer>,
    pub worst_performers: Vec<Performer>,
}

/// Summarize every event belonging to `profile`.
pub fn summarize(events: &[TrackedEvent], profile: &DetectionProfile) -> AggregateStats {
    let mine: Vec<&TrackedEvent> = events.iter().filter(|e| e.profile == profile.name).collect();

    let closed: Vec<&TrackedEvent> = mine.iter().copied().filter(|e| !e.is_open()).collect();
    let successes = closed.iter().filter(|e| e.hit_half_retrace()).count();
    let reversals = closed.iter().filter(|e| e.fully_reversed()).count();
    let times_to_half: Vec<i64> = closed.iter().filter_map(|e| e.time_to_50pct_secs).collect();

    // Deterministic symbol order
    let mut by_symbol: BTreeMap<&str, Vec<&TrackedEvent>> = BTreeMap::new();
    for event in &mine {
        by_symbol.entry(event.symbol.as_str()).or_default().push(event);
    }

    let mut symbols = Vec::new();
    let mut qualified = Vec::new();
    for (symbol, events) in &by_symbol {
        let stats = build_symbol_stats(symbol, events);
        if stats.closed_events >= PERFORMER_MIN_CLOSED {
            qualified.push(Performer {
                symbol: stats.symbol.clone(),
                retrace_rate_pct: stats.retrace_rate_pct,
                closed_events: stats.closed_events,
            });
        }
        if stats.closed_events >= profile.min_pumps_for_history as usize {
            symbols.push(stats);
        }
    }
    symbols.sort_by(|a, b| {
        b.closed_events
            .cmp(&a.closed_events)
            .then_with(|| a.symbol.cmp(&b.symbol))
    });

    let mut top_performers = qualified.clone();
    top_performers.sort_by(|a, b| {
        b.retrace_rate_pct
            .partial_cmp(&a.retrace_rate_pct)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.closed_events.cmp(&a.closed_events))
            .then_with(|| a.symbol.cmp(&b.symbol))
    });
    top_performers.truncate(PERFORMER_LIMIT);

    let mut worst_performers = qualified;
    worst_performers.sort_by(|a, b| {
        a.retrace_rate_pct
            .partial_cmp(&b.retrace_rate_pct)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.closed_events.cmp(&a.closed_events))
            .then_with(|| a.symbol.cmp(&b.symbol))
    });
    worst_performers.truncate(PERFORMER_LIMIT);

    AggregateStats {
        profile: profile.name.clone(),
        total_events: mine.len(),
        open_events: mine.len() - closed.len(),
        closed_events: closed.len(),
        retrace_successes: successes,
        retrace_rate_pct: percent(successes, closed.len()),
        avg_time_to_50pct_secs: mean(&times_to_half),
        full_reversals: reversals,
        full_reversal_rate_pct: percent(reversals, closed.len()),
        symbols,
        top_performers,
        worst_performers,
    }
}

/// History for one symbol under `profile`, or `None` while the symbol has
/// fewer closed events than `profile.min_pumps_for_history`.
pub fn symbol_history(
    events: &[TrackedEvent],
    profile: &DetectionProfile,
    symbol: &str,
) -> Option<SymbolStats> {
    let mine: Vec<&TrackedEvent> = events
        .iter()
        .filter(|e| e.profile == profile.name && e.symbol == symbol)
        .collect();
    if mine.is_empty() {
        return None;
    }

    let stats = build_symbol_stats(symbol, &mine);
    if stats.closed_events < profile.min_pumps_for_history as usize {
        return None;
    }
    Some(stats)
}

fn build_symbol_stats(symbol: &str, events: &[&TrackedEvent]) -> SymbolStats {
    let mut closed: Vec<&TrackedEvent> = events.iter().copied().filter(|e| !e.is_open()).collect();
    // Newest detection first, for the recent-outcome strip
    closed.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));

    let successes = closed.iter().filter(|e| e.hit_half_retrace()).count();
    let reversals = closed.iter().filter(|e| e.fully_reversed()).count();
    let times_to_half: Vec<i64> = closed.iter().filter_map(|e| e.time_to_50pct_secs).collect();
    let times_to_full: Vec<i64> = closed
        .iter()
        .filter_map(|e| e.time_to_full_reversal_secs)
        .collect();

    let recent_outcomes = closed
        .iter()
        .take(RECENT_OUTCOME_LIMIT)
        .map(|e| e.hit_half_retrace())
        .collect();

    SymbolStats {
        symbol: symbol.to_string(),
        total_events: events.len(),
        open_events: events.len() - closed.len(),
        closed_events: closed.len(),
        retrace_successes: successes,
        retrace_rate_pct: percent(successes, closed.len()),
        avg_time_to_50pct_secs: mean(&times_to_half),
        full_reversals: reversals,
        full_reversal_rate_pct: percent(reversals, closed.len()),
        avg_time_to_full_secs: mean(&times_to_full),
        recent_outcomes,
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    (part as f64 / whole as f64 * 10_000.0).round() / 100.0
}

fn mean(values: &[i64]) -> Option<i64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<i64>() / values.len() as i64)
    }
}
