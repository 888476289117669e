//! Everything that knows the upstream livescore markup lives here.
//!
//! Two documents describe a league day: the pre-game board (`mode=2`) with names,
//! records and lines, and the live board with scores. Missing structure only ever
//! leaves a field empty; a `ParseError` is reserved for documents that are not a
//! livescore board at all (maintenance pages, gateway errors, anti-bot walls).

use scraper::{ElementRef, Html, Selector};
use std::{collections::HashMap, sync::LazyLock};
use tracing::debug;

use crate::{
    error::ParseError,
    types::{LeaguePages, RawMatchFields, Sport},
};

const GAMEBOX_PREFIX: &str = "outer-gamebox-";
const PREVIEW_PREFIX: &str = "gamebox-preview-";
const DETAIL_LINK_TEXT: &str = "詳細比分";
const START_TIME_LABEL: &str = "比賽時間";

const ERROR_MARKERS: &[&str] = &[
    "系統維護",
    "維護中",
    "Service Unavailable",
    "Bad Gateway",
    "Gateway Timeout",
    "Access denied",
    "Attention Required",
];

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

static GAMEBOX: LazyLock<Selector> = LazyLock::new(|| selector(r#"[id^="outer-gamebox-"]"#));
static BATTLE_OPTION: LazyLock<Selector> = LazyLock::new(|| selector("select#gamebattle option"));
static TEAM_LEFT: LazyLock<Selector> = LazyLock::new(|| selector(".team_left a"));
static TEAM_RIGHT: LazyLock<Selector> = LazyLock::new(|| selector(".team_right a"));
static TEAM_CENTER: LazyLock<Selector> = LazyLock::new(|| selector(".team_cinter"));
static ROW: LazyLock<Selector> = LazyLock::new(|| selector("tr"));
static LABEL_CELL: LazyLock<Selector> = LazyLock::new(|| selector(".datd_c"));
static AWAY_CELL: LazyLock<Selector> = LazyLock::new(|| selector(".datd_l"));
static HOME_CELL: LazyLock<Selector> = LazyLock::new(|| selector(".datd_r"));
static NOT_ENDED: LazyLock<Selector> = LazyLock::new(|| selector(".gamebox-notend"));
static TITLE_OR_HEADING: LazyLock<Selector> = LazyLock::new(|| selector("title, h1"));

/// Which stat row a `datd_c` label introduces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatRow {
    Season,
    LastTen,
    HeadToHead,
    Averages,
    HomeAway,
}

impl StatRow {
    fn from_label(label: &str) -> Option<Self> {
        let compact: String = label.chars().filter(|c| !c.is_whitespace()).collect();
        match compact.as_str() {
            "戰績" => Some(StatRow::Season),
            "近十場" => Some(StatRow::LastTen),
            "對戰紀錄" => Some(StatRow::HeadToHead),
            "平均得/失分" => Some(StatRow::Averages),
            "主/客戰績" => Some(StatRow::HomeAway),
            _ => None,
        }
    }
}

/// Scores and status for one game on the live board.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct LiveScore {
    away: Option<String>,
    home: Option<String>,
    away_periods: Vec<String>,
    home_periods: Vec<String>,
    in_progress: bool,
}

/// Highest period index probed on the live board.
fn max_periods(sport: Sport) -> usize {
    match sport {
        Sport::Basketball => 8,
        Sport::Baseball => 15,
        Sport::Hockey => 5,
        Sport::Tennis => 5,
        Sport::Soccer => 4,
    }
}

/// Parses both boards and merges live scores into the pre-game rows by game id.
pub fn parse(pages: &LeaguePages, sport: Sport) -> Result<Vec<RawMatchFields>, ParseError> {
    let mut fixtures = parse_preview(&pages.preview)?;
    let live = parse_live(&pages.live, sport)?;

    for fields in fixtures.iter_mut() {
        if let Some(score) = live.get(&fields.game_id) {
            fields.away_score = score.away.clone();
            fields.home_score = score.home.clone();
            fields.away_periods = score.away_periods.clone();
            fields.home_periods = score.home_periods.clone();
            fields.in_progress = score.in_progress;
        }
    }

    debug!(
        "Parsed {} fixtures ({} with live data)",
        fixtures.len(),
        live.len()
    );
    Ok(fixtures)
}

/// Pre-game board: one `RawMatchFields` per fixture block, or per `#gamebattle`
/// option when the page carries no blocks at all.
pub fn parse_preview(html: &str) -> Result<Vec<RawMatchFields>, ParseError> {
    let document = Html::parse_document(html);
    check_document(&document, html)?;

    let options = battle_options(&document);
    let mut fixtures = Vec::new();

    for gamebox in document.select(&GAMEBOX) {
        let Some(game_id) = gamebox_id(&gamebox) else {
            continue;
        };
        let mut fields = RawMatchFields {
            game_id: game_id.to_string(),
            source_oid: attr(&gamebox, "data-oid"),
            ..Default::default()
        };

        let preview = by_id(&document, &format!("{}{}", PREVIEW_PREFIX, game_id)).unwrap_or(gamebox);
        fields.away = first_text(&preview, &TEAM_LEFT);
        fields.home = first_text(&preview, &TEAM_RIGHT);
        fields.start_time = first_text(&preview, &TEAM_CENTER);
        read_stat_rows(&preview, &mut fields);

        fields.spread = data_attr(&gamebox, "data-aheadprice");
        fields.spread_price = data_attr(&gamebox, "data-aheadodds");
        fields.moneyline_home = data_attr(&gamebox, "data-moneyh");
        fields.moneyline_away = data_attr(&gamebox, "data-moneya");
        fields.total = data_attr(&gamebox, "data-totalprice");

        if fields.home.is_none() {
            fields.home = data_attr(&gamebox, "data-nameh");
        }
        if fields.away.is_none() {
            fields.away = data_attr(&gamebox, "data-namea");
        }
        if fields.start_time.is_none() {
            fields.start_time = labelled_start_time(&gamebox);
        }
        if fields.away.is_none() || fields.home.is_none() {
            if let Some((_, away, home)) = options
                .iter()
                .find(|(value, _, _)| Some(value) == fields.source_oid.as_ref())
            {
                fields.away = fields.away.or_else(|| Some(away.clone()));
                fields.home = fields.home.or_else(|| Some(home.clone()));
            }
        }

        if fields.away.is_some() || fields.home.is_some() {
            fixtures.push(fields);
        } else {
            debug!("Skipping gamebox {} with no team names", game_id);
        }
    }

    if fixtures.is_empty() {
        fixtures = options
            .into_iter()
            .enumerate()
            .map(|(idx, (value, away, home))| RawMatchFields {
                game_id: format!("sel_{}", idx),
                source_oid: Some(value),
                away: Some(away),
                home: Some(home),
                ..Default::default()
            })
            .collect();
    }

    Ok(fixtures)
}

fn parse_live(html: &str, sport: Sport) -> Result<HashMap<String, LiveScore>, ParseError> {
    let document = Html::parse_document(html);
    check_document(&document, html)?;

    let mut scores = HashMap::new();
    for gamebox in document.select(&GAMEBOX) {
        let Some(game_id) = gamebox_id(&gamebox) else {
            continue;
        };
        let text_of = |suffix: &str| {
            by_id(&document, &format!("{}_{}", game_id, suffix)).and_then(|el| element_text(&el))
        };

        let mut score = LiveScore {
            away: text_of("asr_big").or_else(|| text_of("asr")),
            home: text_of("hsr_big").or_else(|| text_of("hsr")),
            ..Default::default()
        };
        for period in 1..=max_periods(sport) {
            if let Some(away) = text_of(&format!("as{}", period)).or_else(|| text_of(&format!("a{}", period))) {
                score.away_periods.push(away);
            }
            if let Some(home) = text_of(&format!("hs{}", period)).or_else(|| text_of(&format!("h{}", period))) {
                score.home_periods.push(home);
            }
        }
        score.in_progress = gamebox.value().classes().any(|c| c == "gamebox-notend")
            || gamebox.select(&NOT_ENDED).next().is_some();

        scores.insert(game_id.to_string(), score);
    }
    Ok(scores)
}

/// A document with fixture blocks is always accepted; an empty one is
/// rejected, and a block-less one only when it announces an error.
fn check_document(document: &Html, raw: &str) -> Result<(), ParseError> {
    if raw.trim().is_empty() {
        return Err(ParseError::EmptyDocument);
    }
    if document.select(&GAMEBOX).next().is_some() {
        return Ok(());
    }
    for heading in document.select(&TITLE_OR_HEADING) {
        let text = heading.text().collect::<String>();
        if let Some(marker) = ERROR_MARKERS.iter().find(|m| text.contains(*m)) {
            return Err(ParseError::UpstreamErrorPage(marker.to_string()));
        }
    }
    Ok(())
}

fn gamebox_id<'a>(gamebox: &ElementRef<'a>) -> Option<&'a str> {
    gamebox
        .value()
        .id()
        .and_then(|id| id.strip_prefix(GAMEBOX_PREFIX))
        .filter(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
}

fn by_id<'a>(document: &'a Html, id: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(&format!(r#"[id="{}"]"#, id)).ok()?;
    document.select(&selector).next()
}

fn element_text(element: &ElementRef) -> Option<String> {
    let text = element
        .text()
        .collect::<String>()
        .replace(DETAIL_LINK_TEXT, "");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}

fn first_text(scope: &ElementRef, selector: &Selector) -> Option<String> {
    scope.select(selector).find_map(|el| element_text(&el))
}

fn attr(element: &ElementRef, name: &str) -> Option<String> {
    element
        .value()
        .attr(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Looks on the block itself first, then on its descendants.
fn data_attr(gamebox: &ElementRef, name: &str) -> Option<String> {
    attr(gamebox, name).or_else(|| {
        let selector = Selector::parse(&format!("[{}]", name)).ok()?;
        gamebox.select(&selector).find_map(|el| attr(&el, name))
    })
}

fn labelled_start_time(gamebox: &ElementRef) -> Option<String> {
    let text = gamebox.text().collect::<String>();
    let (_, after) = text.split_once(START_TIME_LABEL)?;
    after
        .split_whitespace()
        .find(|token| token.contains(':') || token.contains('：'))
        .map(str::to_string)
}

fn read_stat_rows(scope: &ElementRef, fields: &mut RawMatchFields) {
    for row in scope.select(&ROW) {
        let Some(kind) = row
            .select(&LABEL_CELL)
            .next()
            .and_then(|label| element_text(&label))
            .and_then(|label| StatRow::from_label(&label))
        else {
            continue;
        };
        let away = first_text(&row, &AWAY_CELL);
        let home = first_text(&row, &HOME_CELL);
        let (away_slot, home_slot) = match kind {
            StatRow::Season => (&mut fields.away_record, &mut fields.home_record),
            StatRow::LastTen => (&mut fields.away_recent, &mut fields.home_recent),
            StatRow::HeadToHead => (&mut fields.away_h2h, &mut fields.home_h2h),
            StatRow::Averages => (&mut fields.away_avg, &mut fields.home_avg),
            StatRow::HomeAway => (&mut fields.away_split, &mut fields.home_split),
        };
        if away_slot.is_none() {
            *away_slot = away;
        }
        if home_slot.is_none() {
            *home_slot = home;
        }
    }
}

/// `(value, away, home)` for every `Away vs Home` entry of the game picker.
fn battle_options(document: &Html) -> Vec<(String, String, String)> {
    document
        .select(&BATTLE_OPTION)
        .filter_map(|option| {
            let value = attr(&option, "value").filter(|v| v != "0")?;
            let text = element_text(&option)?;
            let (away, home) = text.split_once(" vs ").or_else(|| text.split_once("vs"))?;
            let (away, home) = (away.trim(), home.trim());
            (!away.is_empty() && !home.is_empty())
                .then(|| (value, away.to_string(), home.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PREVIEW: &str = r##"
        <html><head><title>NBA 即時比分</title></head><body>
        <select id="gamebattle">
          <option value="0">請選擇</option>
          <option value="20250301_3_LALBOS">Celtics vs Lakers</option>
        </select>
        <div id="outer-gamebox-101" data-oid="20250301_3_LALBOS" data-aheadprice="+4.5" data-aheadodds="1.91">
          <div id="gamebox-preview-101">
            <div class="team_left"><a href="#"> Celtics </a></div>
            <div class="team_cinter">08:30</div>
            <div class="team_right"><a href="#">Lakers</a></div>
            <table>
              <tr><td class="datd_l">33 - 19</td><td class="datd_c">戰績</td><td class="datd_r">40 - 12</td></tr>
              <tr><td class="datd_l">4 - 6</td><td class="datd_c">近十場</td><td class="datd_r">8 - 2 , 5連勝 詳細比分</td></tr>
              <tr><td class="datd_l">客12 - 13</td><td class="datd_c">主 / 客戰績</td><td class="datd_r">主20 - 5</td></tr>
            </table>
          </div>
        </div><!--outer-gamebox-->
        </body></html>"##;

    #[test]
    fn test_parse_preview_block() {
        let fixtures = parse_preview(PREVIEW).unwrap();
        assert_eq!(fixtures.len(), 1);
        let f = &fixtures[0];
        assert_eq!(f.game_id, "101");
        assert_eq!(f.away.as_deref(), Some("Celtics"));
        assert_eq!(f.home.as_deref(), Some("Lakers"));
        assert_eq!(f.start_time.as_deref(), Some("08:30"));
        assert_eq!(f.home_recent.as_deref(), Some("8 - 2 , 5連勝"));
        assert_eq!(f.away_split.as_deref(), Some("客12 - 13"));
        assert_eq!(f.home_record.as_deref(), Some("40 - 12"));
        assert_eq!(f.spread.as_deref(), Some("+4.5"));
        assert_eq!(f.away_h2h, None);
    }

    #[test]
    fn test_names_fall_back_to_attributes_and_options() {
        let html = r#"<html><body>
            <select id="gamebattle"><option value="oid-2">Hawks vs Bulls</option></select>
            <div id="outer-gamebox-1" data-oid="oid-1" data-nameh="Knicks" data-namea="Nets"></div>
            <div id="outer-gamebox-2" data-oid="oid-2"></div>
            <div id="outer-gamebox-3" data-oid="oid-3"></div>
        </body></html>"#;
        let fixtures = parse_preview(html).unwrap();
        assert_eq!(fixtures.len(), 2);
        assert_eq!(fixtures[0].home.as_deref(), Some("Knicks"));
        assert_eq!(fixtures[1].away.as_deref(), Some("Hawks"));
        assert_eq!(fixtures[1].home.as_deref(), Some("Bulls"));
    }

    #[test]
    fn test_picker_only_page() {
        let html = r#"<html><body><select id="gamebattle">
            <option value="a">Heat vs Magic</option><option value="b">no match here</option>
        </select></body></html>"#;
        let fixtures = parse_preview(html).unwrap();
        assert_eq!(fixtures.len(), 1);
        assert_eq!(fixtures[0].game_id, "sel_0");
    }

    #[test]
    fn test_off_day_is_empty_not_error() {
        let html = "<html><head><title>NBA 即時比分</title></head><body><p>今日無賽事</p></body></html>";
        assert_eq!(parse_preview(html).unwrap(), vec![]);
    }

    #[test]
    fn test_error_pages_are_rejected() {
        let maintenance = "<html><head><title>系統維護中</title></head><body></body></html>";
        assert_eq!(
            parse_preview(maintenance),
            Err(ParseError::UpstreamErrorPage("系統維護".into()))
        );
        assert_eq!(parse_preview("   "), Err(ParseError::EmptyDocument));
        let gateway = "<html><body><h1>502 Bad Gateway</h1></body></html>";
        assert!(matches!(parse_preview(gateway), Err(ParseError::UpstreamErrorPage(_))));
    }

    #[test]
    fn test_live_scores_merge() {
        let live = r#"<html><body>
            <div id="outer-gamebox-101" class="gamebox gamebox-notend">
              <span id="101_asr_big">88</span><span id="101_hsr">91</span>
              <span id="101_as1">20</span><span id="101_hs1">25</span>
              <span id="101_a2">30</span><span id="101_h2">28</span>
            </div>
        </body></html>"#;
        let pages = LeaguePages {
            preview: PREVIEW.to_string(),
            live: live.to_string(),
        };
        let fixtures = parse(&pages, Sport::Basketball).unwrap();
        let f = &fixtures[0];
        assert_eq!(f.away_score.as_deref(), Some("88"));
        assert_eq!(f.home_score.as_deref(), Some("91"));
        assert_eq!(f.away_periods, vec!["20".to_string(), "30".to_string()]);
        assert_eq!(f.home_periods, vec!["25".to_string(), "28".to_string()]);
        assert!(f.in_progress);
    }
}
