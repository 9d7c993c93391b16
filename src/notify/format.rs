//! Message rendering shared by every notification backend.
//!
//! One detection, closure or stats payload renders to the same text whether
//! it lands in the log or in a webhook body.

use crate::detector_core::Trigger;
use crate::notify::DetectionEvent;
use crate::tracking::{AggregateStats, EventOutcome, TrackedEvent};

/// Multi-line detection alert.
pub fn format_detection(event: &DetectionEvent) -> String {
    let mut details = Vec::new();

    match &event.trigger {
        Trigger::Threshold => {
            details.push(format!(
                "24h change {:+.2}%, volume {}",
                event.snapshot.percent_change_24h,
                format_volume(event.snapshot.volume_24h)
            ));
        }
        Trigger::Anomaly {
            volume_ratio,
            body_ratio,
        } => {
            details.push(format!(
                "hourly anomaly: volume {:.1}x, body {:.1}x baseline",
                volume_ratio, body_ratio
            ));
        }
    }

    let ind = &event.indicators;
    if let Some(rsi) = ind.rsi_1m {
        let tier = ind.rsi_1m_tier.map(|t| t.as_str()).unwrap_or("?");
        details.push(format!("RSI 1m {:.2} ({})", rsi, tier));
    }
    if let Some(rsi) = ind.rsi_1h {
        let tier = ind.rsi_1h_tier.map(|t| t.as_str()).unwrap_or("?");
        details.push(format!("RSI 1h {:.2} ({})", rsi, tier));
    }
    match (ind.trend_daily, ind.trend_weekly) {
        (Some(daily), Some(weekly)) => {
            details.push(format!("trend {} daily / {} weekly", daily.as_str(), weekly.as_str()));
        }
        (Some(daily), None) => details.push(format!("trend {} daily", daily.as_str())),
        _ => {}
    }
    if let (Some(rate), Some(severity)) = (ind.funding_rate, ind.funding_severity) {
        details.push(format!(
            "funding {:+.4}% ({})",
            rate * 100.0,
            severity.as_str()
        ));
    }
    if let Some(ath) = &ind.ath {
        if ath.at_high {
            details.push("trading at its all-time high".to_string());
        } else {
            details.push(format!(
                "{:.2}% below ATH {}",
                ath.below_pct,
                format_price(ath.ath_price)
            ));
        }
    }
    details.push("reversal tracking armed".to_string());

    format!(
        "🚀 [{}] {} +{:.2}% at {}\n{}",
        event.profile,
        event.symbol,
        event.pump_percent,
        format_price(event.snapshot.last_price),
        tree(&details)
    )
}

/// Closure summary once an event's monitoring window ends.
pub fn format_closure(event: &TrackedEvent) -> String {
    let verdict = match event.outcome {
        Some(EventOutcome::Success) => "✅ success (50%+ retrace)",
        Some(EventOutcome::Partial) => "🟡 partial (25%+ retrace)",
        Some(EventOutcome::Failed) => "❌ failed (held its gain)",
        None => "still open",
    };

    let mut details = vec![
        format!(
            "pumped +{:.2}% to {}",
            event.pump_percent,
            format_price(event.detection_price)
        ),
        format!(
            "low {} / high {}",
            format_price(event.lowest_price),
            format_price(event.highest_price)
        ),
        format!("max drop from high {:.2}%", event.max_drop_from_high_pct),
    ];
    if let Some(secs) = event.time_to_50pct_secs {
        details.push(format!("50% retrace after {}", format_duration(secs)));
    }
    if let Some(secs) = event.time_to_full_reversal_secs {
        details.push(format!("full reversal after {}", format_duration(secs)));
    }
    if let Some(closed_at) = event.closed_at {
        details.push(format!(
            "monitored for {}",
            format_duration(closed_at - event.detected_at)
        ));
    }

    format!(
        "🏁 [{}] {} {}\n{}",
        event.profile,
        event.symbol,
        verdict,
        tree(&details)
    )
}

/// Aggregate summary for pinned display.
pub fn format_stats(stats: &AggregateStats) -> String {
    let mut details = vec![format!(
        "50% retrace rate {:.1}% ({}/{} closed)",
        stats.retrace_rate_pct, stats.retrace_successes, stats.closed_events
    )];
    if let Some(secs) = stats.avg_time_to_50pct_secs {
        details.push(format!("avg time to 50% {}", format_duration(secs)));
    }
    details.push(format!(
        "full reversal rate {:.1}% ({}/{})",
        stats.full_reversal_rate_pct, stats.full_reversals, stats.closed_events
    ));
    if !stats.top_performers.is_empty() {
        details.push(format!("top: {}", performer_line(&stats.top_performers)));
    }
    if !stats.worst_performers.is_empty() {
        details.push(format!("worst: {}", performer_line(&stats.worst_performers)));
    }
    for symbol in &stats.symbols {
        details.push(format!(
            "{} {} {:.0}% of {}",
            symbol.symbol,
            outcome_strip(&symbol.recent_outcomes),
            symbol.retrace_rate_pct,
            symbol.closed_events
        ));
    }

    format!(
        "📊 [{}] {} events, {} open / {} closed\n{}",
        stats.profile,
        stats.total_events,
        stats.open_events,
        stats.closed_events,
        tree(&details)
    )
}

fn performer_line(performers: &[crate::tracking::Performer]) -> String {
    performers
        .iter()
        .map(|p| format!("{} {:.0}% of {}", p.symbol, p.retrace_rate_pct, p.closed_events))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Compact history strip, newest first.
pub fn outcome_strip(outcomes: &[bool]) -> String {
    outcomes
        .iter()
        .map(|ok| if *ok { '✅' } else { '❌' })
        .collect()
}

pub fn format_price(price: f64) -> String {
    let raw = format!("{:.6}", price);
    let trimmed = raw.trim_end_matches('0').trim_end_matches('.');
    trimmed.to_string()
}

pub fn format_volume(volume: f64) -> String {
    if volume >= 1_000_000_000.0 {
        format!("${:.2}B", volume / 1_000_000_000.0)
    } else if volume >= 1_000_000.0 {
        format!("${:.2}M", volume / 1_000_000.0)
    } else if volume >= 1_000.0 {
        format!("${:.1}K", volume / 1_000.0)
    } else {
        format!("${:.0}", volume)
    }
}

pub fn format_duration(secs: i64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3_600 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{}h{:02}m", secs / 3_600, (secs % 3_600) / 60)
    }
}

fn tree(details: &[String]) -> String {
    details
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let glyph = if i + 1 == details.len() { "└─" } else { "├─" };
            format!("  {glyph} {line}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}
