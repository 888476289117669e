use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::{
    analysis::{spread_outcome, AnalysisReport, Side, SpreadOutcome, Verdict},
    error::LeagueFailure,
    leagues::find_league,
    types::{MatchRecord, MatchStatus, Sport},
};

const RULE: &str = "━━━━━━━━━━━━━━━";
const TRUNCATION_MARKER: &str = "\n\n... (訊息過長，已截斷)";
const LEAN_BAR_WIDTH: usize = 10;

/// Rendered answer handed back to the router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    pub header: String,
    /// One block per fixture.
    pub blocks: Vec<String>,
    pub notes: Vec<String>,
}

impl Reply {
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Joins everything and cuts at `max_chars` characters, marker included.
    pub fn render(&self, max_chars: usize) -> String {
        let mut parts = vec![self.header.clone()];
        parts.extend(self.blocks.iter().cloned());
        if !self.notes.is_empty() {
            parts.push(self.notes.join("\n"));
        }
        let text = parts
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");

        if text.chars().count() <= max_chars {
            return text;
        }
        let keep = max_chars.saturating_sub(TRUNCATION_MARKER.chars().count());
        let mut truncated: String = text.chars().take(keep).collect();
        truncated.push_str(TRUNCATION_MARKER);
        truncated
    }
}

pub fn sport_name(sport: Sport) -> &'static str {
    match sport {
        Sport::Basketball => "籃球",
        Sport::Baseball => "棒球",
        Sport::Hockey => "冰球",
        Sport::Tennis => "網球",
        Sport::Soccer => "足球",
    }
}

fn sport_emoji(sport: Option<Sport>) -> &'static str {
    match sport {
        Some(Sport::Basketball) => "🏀",
        Some(Sport::Baseball) => "⚾",
        Some(Sport::Soccer) => "⚽",
        Some(Sport::Hockey) => "🏒",
        Some(Sport::Tennis) => "🎾",
        None => "🏆",
    }
}

fn status_label(status: MatchStatus) -> &'static str {
    match status {
        MatchStatus::Live => "🔴 進行中",
        MatchStatus::Scheduled => "⏳ 未開始",
        MatchStatus::Finished => "✅ 已結束",
    }
}

/// `3/1 (六)`
pub fn display_date(date: NaiveDate) -> String {
    const WEEKDAYS: [&str; 7] = ["一", "二", "三", "四", "五", "六", "日"];
    format!(
        "{}/{} ({})",
        date.month(),
        date.day(),
        WEEKDAYS[date.weekday().num_days_from_monday() as usize]
    )
}

fn league_label(code: &str) -> &str {
    find_league(code).map_or(code, |l| l.name)
}

fn score_line(record: &MatchRecord) -> String {
    match record.score {
        Some(score) => format!("{} : {}", score.home, score.away),
        None => "VS".to_string(),
    }
}

fn pick_line(record: &MatchRecord, report: &AnalysisReport) -> String {
    match report.predicted_winner {
        Verdict::Home => format!(
            "🔮 推薦：{} 主勝（信心 {} {:.0}%）",
            record.home_team,
            report.level,
            report.confidence * 100.0
        ),
        Verdict::Away => format!(
            "🔮 推薦：{} 客勝（信心 {} {:.0}%）",
            record.away_team,
            report.level,
            report.confidence * 100.0
        ),
        Verdict::TossUp => "🔮 推薦：勢均力敵，建議觀望".to_string(),
    }
}

/// One listing block for a fixture.
pub fn format_match(record: &MatchRecord, report: &AnalysisReport) -> String {
    let time = record
        .start_time
        .map(|t| t.format("%H:%M").to_string())
        .unwrap_or_default();
    let mark = match spread_outcome(record) {
        Some(SpreadOutcome::Covered) => " 🎯✔",
        _ => "",
    };

    let mut lines = vec![
        RULE.to_string(),
        format!("{}  {}{}", status_label(record.status), time, mark)
            .trim_end()
            .to_string(),
        format!("🏠 {}", record.home_team),
        format!("🚌 {}", record.away_team),
        format!("📊 {}", score_line(record)),
        pick_line(record, report),
    ];
    if let Some(spread) = record.odds.as_ref().and_then(|o| o.spread) {
        let favourite = if spread > 0.0 {
            &record.home_team
        } else {
            &record.away_team
        };
        lines.push(format!("📌 盤口：{} 讓{}", favourite, spread.abs()));
    }
    lines.join("\n")
}

fn direction_label(favours: Option<Side>) -> &'static str {
    match favours {
        Some(Side::Home) => "利主",
        Some(Side::Away) => "利客",
        None => "持平",
    }
}

/// Full analysis block for one fixture.
pub fn format_analysis(report: &AnalysisReport) -> String {
    let record = &report.generated_from;
    let lean = report.home_lean();
    let home_cells = (lean * LEAN_BAR_WIDTH as f64).round() as usize;
    let away_cells = LEAN_BAR_WIDTH.saturating_sub(home_cells);

    let mut lines = vec![
        "⚡ 賽事分析".to_string(),
        RULE.to_string(),
        format!("🏷 {}  {}", league_label(&record.league), display_date(record.date)),
        format!("🏠 {}", record.home_team),
        format!("🚌 {}", record.away_team),
    ];
    if record.status != MatchStatus::Scheduled {
        lines.push(format!(
            "📊 {}（{}）",
            score_line(record),
            status_label(record.status)
        ));
    }
    lines.extend([
        String::new(),
        "📈 勝負傾向".to_string(),
        format!("主 {} {:.0}%", "█".repeat(home_cells), lean * 100.0),
        format!("客 {} {:.0}%", "█".repeat(away_cells), (1.0 - lean) * 100.0),
        String::new(),
        pick_line(record, report),
        format!(
            "🎯 信心指數：{}（{:.0}%）",
            report.level,
            report.confidence * 100.0
        ),
    ]);
    if let Some(total) = report.projected_total {
        lines.push(format!("📐 預估總分：{:.0}", total));
    }

    lines.push(RULE.to_string());
    lines.push("📝 關鍵因素".to_string());
    if report.key_factors.is_empty() {
        lines.push("資料不足，暫無可參考的指標。".to_string());
    }
    for (idx, factor) in report.key_factors.iter().enumerate() {
        lines.push(format!(
            "{}. 【{}】{}（{}）",
            idx + 1,
            factor.signal.label(),
            factor.text,
            direction_label(factor.favours)
        ));
    }
    lines.join("\n")
}

/// Day listing: fixtures grouped by league in the order they arrive.
pub fn format_listing(
    sport: Option<Sport>,
    date: NaiveDate,
    reports: &[AnalysisReport],
    failures: &[LeagueFailure],
) -> Reply {
    let title = sport.map_or("全部", sport_name);
    let mut header = vec![
        format!("{} SPORTIQ 賽事", sport_emoji(sport)),
        RULE.to_string(),
        format!("📅 {}  {}", display_date(date), title),
    ];

    let mut notes: Vec<String> = failures
        .iter()
        .map(|f| format!("⚠️ {} 資料暫時無法取得", league_label(&f.league)))
        .collect();
    if reports.is_empty() {
        notes.insert(0, format!("{} 今日無賽事，請切換日期或運動類型。", title));
        return Reply {
            header: header.join("\n"),
            blocks: Vec::new(),
            notes,
        };
    }
    header.push(format!("📊 共 {} 場賽事", reports.len()));

    let mut league_order: Vec<&str> = Vec::new();
    for report in reports {
        let league = report.generated_from.league.as_str();
        if !league_order.contains(&league) {
            league_order.push(league);
        }
    }

    let mut blocks = Vec::with_capacity(reports.len());
    for league in league_order {
        let in_league: Vec<&AnalysisReport> = reports
            .iter()
            .filter(|r| r.generated_from.league == league)
            .collect();
        for (idx, report) in in_league.iter().enumerate() {
            let block = format_match(&report.generated_from, report);
            blocks.push(if idx == 0 {
                format!("🏷 {}【{} 場】\n{}", league_label(league), in_league.len(), block)
            } else {
                block
            });
        }
    }
    notes.push("👇 輸入「分析 隊名」查看詳細分析".to_string());

    Reply {
        header: header.join("\n"),
        blocks,
        notes,
    }
}

/// Reply for an analysis command.
pub fn format_analyses(reports: &[AnalysisReport], failures: &[LeagueFailure]) -> Reply {
    Reply {
        header: String::new(),
        blocks: reports.iter().map(format_analysis).collect(),
        notes: failures
            .iter()
            .map(|f| format!("⚠️ {} 資料暫時無法取得", league_label(&f.league)))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyze;
    use crate::types::{HeadToHead, Odds, Score, TeamStats};
    use chrono::NaiveTime;
    use std::collections::BTreeMap;

    fn record(league: &str, home: &str, away: &str) -> MatchRecord {
        MatchRecord {
            id: format!("{}-{}", home, away),
            sport: Sport::Basketball,
            league: league.into(),
            date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            start_time: NaiveTime::from_hms_opt(8, 30, 0),
            home_team: home.into(),
            away_team: away.into(),
            status: MatchStatus::Scheduled,
            score: None,
            period_scores: vec![],
            odds: None,
            team_stats: BTreeMap::new(),
            head_to_head: None,
        }
    }

    #[test]
    fn test_display_date() {
        assert_eq!(display_date(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()), "3/1 (六)");
    }

    #[test]
    fn test_format_match_finished_with_cover() {
        let mut r = record("NBA", "Lakers", "Celtics");
        r.status = MatchStatus::Finished;
        r.score = Some(Score { home: 110, away: 100 });
        r.odds = Some(Odds {
            spread: Some(4.5),
            spread_price: None,
            moneyline_home: None,
            moneyline_away: None,
            total: None,
        });
        let text = format_match(&r, &analyze(&r, &r));
        assert!(text.contains("✅ 已結束  08:30 🎯✔"));
        assert!(text.contains("📊 110 : 100"));
        assert!(text.contains("📌 盤口：Lakers 讓4.5"));
    }

    #[test]
    fn test_listing_groups_by_league() {
        let records = [
            record("NBA", "Lakers", "Celtics"),
            record("SBL", "Dreamers", "Kings"),
            record("NBA", "Heat", "Magic"),
        ];
        let reports: Vec<_> = records.iter().map(|r| analyze(r, r)).collect();
        let failures = vec![LeagueFailure {
            league: "KBL".into(),
            reason: "timeout".into(),
        }];
        let reply = format_listing(Some(Sport::Basketball), records[0].date, &reports, &failures);

        assert_eq!(reply.blocks.len(), 3);
        assert!(reply.blocks[0].starts_with("🏷 NBA【2 場】"));
        assert!(reply.blocks[1].contains("Heat"));
        assert!(reply.blocks[2].starts_with("🏷 SBL【1 場】"));
        assert!(reply.notes[0].contains("韓國職籃"));
    }

    #[test]
    fn test_empty_listing_has_indicator() {
        let reply = format_listing(Some(Sport::Tennis), NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(), &[], &[]);
        assert!(reply.is_empty());
        assert!(reply.render(5000).contains("網球 今日無賽事"));
    }

    #[test]
    fn test_analysis_block_without_factors() {
        let r = record("NBA", "Lakers", "Celtics");
        let text = format_analysis(&analyze(&r, &r));
        assert!(text.contains("勢均力敵"));
        assert!(text.contains("資料不足"));
        assert!(text.contains("主 █████ 50%"));
    }

    #[test]
    fn test_key_factors_show_direction() {
        let mut r = record("NBA", "Lakers", "Celtics");
        r.odds = Some(Odds {
            spread: Some(4.5),
            spread_price: None,
            moneyline_home: None,
            moneyline_away: None,
            total: None,
        });
        r.head_to_head = Some(HeadToHead { home_wins: 1, away_wins: 3 });
        let even = TeamStats {
            wins: 10,
            losses: 10,
            ..Default::default()
        };
        r.team_stats.insert("Lakers".into(), even.clone());
        r.team_stats.insert("Celtics".into(), even);

        let text = format_analysis(&analyze(&r, &r));
        let factor = |label: &str| {
            text.lines()
                .find(|line| line.contains(label))
                .unwrap_or_default()
                .to_string()
        };
        assert!(factor("【盤口】").ends_with("（利主）"));
        assert!(factor("【歷史交鋒】").ends_with("（利客）"));
        assert!(factor("【整體戰績】").ends_with("（持平）"));
    }

    #[test]
    fn test_render_truncates() {
        let reply = Reply {
            header: "標題".into(),
            blocks: vec!["賽".repeat(100)],
            notes: vec![],
        };
        let text = reply.render(50);
        assert_eq!(text.chars().count(), 50);
        assert!(text.ends_with("已截斷)"));
        assert_eq!(reply.render(5000).chars().count(), 104);
    }
}
