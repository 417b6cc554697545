use signalboard_core::dashboard::{Dashboard, DashboardRow, StockDetail};
use signalboard_core::domain::recommendation::{EntryHint, Recommendation};
use signalboard_core::engine::format_price;
use anyhow::Context;
use serde::Serialize;
use signalboard_core::llm::Citation;
use std::fmt::Write;

/// AI commentary, or the advisory shown in its place.
#[derive(Debug, Serialize)]
pub struct AiSection {
    pub text: String,
    pub sources: Vec<Citation>,
    pub degraded: bool,
}

fn opt_price(v: Option<f64>) -> String {
    v.map(format_price).unwrap_or_else(|| "-".to_string())
}

fn entry(hint: Option<EntryHint>) -> String {
    match hint {
        Some(EntryHint::Market { price }) => format!("market@{}", format_price(price)),
        Some(EntryHint::Limit { price }) => format!("limit@{}", format_price(price)),
        Some(EntryHint::Staged { price }) => format!("staged@{}", format_price(price)),
        None => "-".to_string(),
    }
}

fn levels(rec: &Recommendation) -> String {
    format!(
        "entry={} exit={} stop={} risk={}",
        entry(rec.entry_hint),
        opt_price(rec.exit_hint),
        opt_price(rec.stop_hint),
        rec.risk_flag
            .map(|f| f.to_string())
            .unwrap_or_else(|| "-".to_string()),
    )
}

fn row_line(row: &DashboardRow) -> String {
    let rec = &row.recommendation;
    let held = match &row.position {
        Some(p) => format!("held@{}", format_price(p.entry_price)),
        None => String::new(),
    };
    format!(
        "{:<10} {:<12} {:>9} {:>6} {:<10} {:<10} {:<11} {}",
        row.record.code,
        row.record.name,
        format_price(row.record.close_price),
        opt_price(row.record.ai_score),
        format!("{:?}", rec.action),
        format!("{:?}", rec.confidence_label),
        held,
        levels(rec),
    )
}

pub fn render_dashboard(dashboard: &Dashboard) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "as of {} ({} instruments)",
        dashboard.as_of.to_rfc3339(),
        dashboard.rows.len()
    );
    for row in &dashboard.rows {
        let _ = writeln!(out, "{}", row_line(row));
    }
    out
}

pub fn render_detail(detail: &StockDetail) -> String {
    let rec = &detail.recommendation;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {} close={} score={} (as of {})",
        detail.record.code,
        detail.record.name,
        format_price(detail.record.close_price),
        opt_price(detail.record.ai_score),
        detail.as_of.to_rfc3339(),
    );
    let _ = writeln!(
        out,
        "short_weight={:.1} long_weight={:.1} bias={:.0} mode={:?}",
        detail.scores.short_weight,
        detail.scores.long_weight,
        detail.scores.momentum_bias,
        detail.scores.mode,
    );
    let _ = writeln!(
        out,
        "{:?} / {:?}: {}",
        rec.action, rec.confidence_label, rec.rationale
    );
    let _ = writeln!(out, "{}", levels(rec));
    out
}

pub fn render_sources(sources: &[Citation]) -> String {
    let mut out = String::new();
    for (i, s) in sources.iter().enumerate() {
        let _ = writeln!(out, "[{}] {} <{}>", i + 1, s.title, s.uri);
    }
    out
}

pub fn render_ai(ai: &AiSection) -> String {
    format!("\n{}\n{}", ai.text, render_sources(&ai.sources))
}

/// Nest the commentary under `"ai"` so JSON output stays one document.
pub fn attach_ai(report: &mut serde_json::Value, ai: &AiSection) -> anyhow::Result<()> {
    let obj = report
        .as_object_mut()
        .context("report JSON is not an object")?;
    obj.insert("ai".to_string(), serde_json::to_value(ai)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use signalboard_core::domain::recommendation::{Action, ConfidenceLabel, RiskFlag};

    fn rec() -> Recommendation {
        Recommendation {
            action: Action::Buy,
            confidence_label: ConfidenceLabel::StrongBuy,
            rationale: "r".to_string(),
            risk_flag: Some(RiskFlag::VolumeSurge),
            entry_hint: Some(EntryHint::Limit { price: 596.94 }),
            exit_hint: Some(618.0),
            stop_hint: None,
            mode: None,
        }
    }

    #[test]
    fn levels_use_one_decimal() {
        assert_eq!(
            levels(&rec()),
            "entry=limit@596.9 exit=618.0 stop=- risk=volume-surge"
        );
    }

    #[test]
    fn numbers_sources() {
        let text = render_sources(&[
            Citation {
                title: "A".to_string(),
                uri: "https://a".to_string(),
            },
            Citation {
                title: "B".to_string(),
                uri: "https://b".to_string(),
            },
        ]);
        assert_eq!(text, "[1] A <https://a>\n[2] B <https://b>\n");
    }

    #[test]
    fn ai_commentary_nests_into_json_report() {
        let mut report = serde_json::json!({"as_of": "2026-03-02T06:00:00+00:00", "rows": []});
        let ai = AiSection {
            text: "AI 分析暫時無法取得，請稍後再試。".to_string(),
            sources: Vec::new(),
            degraded: true,
        };
        attach_ai(&mut report, &ai).unwrap();

        let printed = serde_json::to_string_pretty(&report).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&printed).unwrap();
        assert_eq!(parsed["ai"]["degraded"], true);
        assert_eq!(parsed["rows"], serde_json::json!([]));

        assert!(attach_ai(&mut serde_json::json!([]), &ai).is_err());
    }

    #[test]
    fn renders_ai_text_then_sources() {
        let ai = AiSection {
            text: "summary".to_string(),
            sources: vec![Citation {
                title: "A".to_string(),
                uri: "https://a".to_string(),
            }],
            degraded: false,
        };
        assert_eq!(render_ai(&ai), "\nsummary\n[1] A <https://a>\n");
    }
}
