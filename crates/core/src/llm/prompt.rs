use crate::domain::market::MarketRecord;
use crate::domain::position::PositionRecord;
use crate::domain::recommendation::{HorizonMode, Recommendation};
use crate::engine::format_price;

/// How many instruments the market overview prompt includes.
pub const OVERVIEW_LIMIT: usize = 5;

fn pct(v: Option<f64>) -> String {
    v.map(|x| format!("{x:.1}%"))
        .unwrap_or_else(|| "N/A".to_string())
}

fn num(v: Option<f64>) -> String {
    v.map(|x| format!("{x:.1}"))
        .unwrap_or_else(|| "N/A".to_string())
}

fn summary_line(r: &MarketRecord) -> String {
    format!(
        "- {name}（{code}）：收盤價 {close}，AI 評分 {score}，ROE {roe}，營收年增率 {yoy}，本益比 {pe}，量比 {vr:.2}，波動率 {vol:.1}%",
        name = r.name,
        code = r.code,
        close = format_price(r.close_price),
        score = num(r.ai_score),
        roe = pct(r.roe),
        yoy = pct(r.revenue_yoy),
        pe = num(r.pe_ratio),
        vr = r.volume_ratio,
        vol = r.volatility,
    )
}

/// Market overview over at most [`OVERVIEW_LIMIT`] records, in the order given.
pub fn market_overview(records: &[MarketRecord]) -> String {
    let lines: Vec<String> = records
        .iter()
        .take(OVERVIEW_LIMIT)
        .map(summary_line)
        .collect();

    [
        "你是一位專業的台股投資分析師，請使用繁體中文回答。".to_string(),
        "以下是今日 AI 評分最高的標的：".to_string(),
        lines.join("\n"),
        String::new(),
        "請根據上述資料與最新市場消息：".to_string(),
        "1. 總結目前的市場氛圍與資金流向。".to_string(),
        "2. 逐一點評每檔標的的優勢與風險。".to_string(),
        "3. 提出短線操作建議與需要留意的事件。".to_string(),
        "回答請精簡，並以條列方式呈現。".to_string(),
    ]
    .join("\n")
}

/// Single-instrument analysis with the engine's view folded in.
pub fn stock_detail(
    record: &MarketRecord,
    recommendation: &Recommendation,
    position: Option<&PositionRecord>,
) -> String {
    let mode = match recommendation.mode {
        Some(HorizonMode::Short) => "短線",
        Some(HorizonMode::Long) => "中長線",
        None => "未指定",
    };
    let holding = match position {
        Some(p) => format!(
            "使用者持有 {qty} 股，成本 {entry}。",
            qty = p.quantity,
            entry = format_price(p.entry_price)
        ),
        None => "使用者目前未持有。".to_string(),
    };
    let entry = recommendation
        .entry_hint
        .map(|h| format_price(h.price()))
        .unwrap_or_else(|| "N/A".to_string());
    let risk = recommendation
        .risk_flag
        .map(|f| f.to_string())
        .unwrap_or_else(|| "無".to_string());

    [
        "你是一位專業的台股投資分析師，請使用繁體中文回答。".to_string(),
        format!("請深入分析 {}（{}）。", record.name, record.code),
        "基本資料：".to_string(),
        summary_line(record),
        format!(
            "短線分數 {:.1}，長線分數 {:.1}，資料日期 {}。",
            record.short_term_score, record.long_term_score, record.analysis_date
        ),
        holding,
        format!(
            "系統建議：{:?}（{:?}），操作週期 {mode}，進場參考 {entry}，目標價 {}，停損價 {}，風險提示 {risk}。",
            recommendation.action,
            recommendation.confidence_label,
            num(recommendation.exit_hint),
            num(recommendation.stop_hint),
        ),
        String::new(),
        "請結合最新新聞與產業動態，說明：".to_string(),
        "1. 近期股價表現的主要驅動因素。".to_string(),
        "2. 基本面與籌碼面的觀察重點。".to_string(),
        "3. 對系統建議的看法，以及進出場與停損的具體策略。".to_string(),
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::fixtures::record;
    use crate::engine::weighted;

    #[test]
    fn overview_caps_at_five_records() {
        let records: Vec<_> = (1..=8)
            .map(|i| record(&format!("{:04}.TW", 1000 + i), 100.0, Some(90.0)))
            .collect();
        let prompt = market_overview(&records);
        assert!(prompt.contains("1005.TW"));
        assert!(!prompt.contains("1006.TW"));
        assert_eq!(prompt.matches("- Name").count(), OVERVIEW_LIMIT);
    }

    #[test]
    fn missing_fundamentals_render_as_na() {
        let prompt = market_overview(&[record("2330.TW", 612.0, None)]);
        assert!(prompt.contains("AI 評分 N/A"));
        assert!(prompt.contains("收盤價 612.0"));
    }

    #[test]
    fn detail_includes_engine_levels() {
        let r = record("2330.TW", 200.0, Some(88.0));
        let rec = weighted::recommend(&r, None, Some(HorizonMode::Short));
        let prompt = stock_detail(&r, &rec, None);
        assert!(prompt.contains("2330.TW"));
        assert!(prompt.contains("短線"));
        assert!(prompt.contains("目標價 206.0"));
        assert!(prompt.contains("停損價 194.0"));
        assert!(prompt.contains("未持有"));
    }
}
