use crate::types::Sport;
use serde::Serialize;

/// A league the upstream site publishes a livescore board for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct League {
    pub code: &'static str,
    /// Board id in the upstream `/livescore/{id}` path.
    pub source_id: &'static str,
    pub sport: Sport,
    pub name: &'static str,
}

pub const LEAGUES: &[League] = &[
    League { code: "NBA", source_id: "3", sport: Sport::Basketball, name: "NBA" },
    League { code: "EUROLEAGUE", source_id: "8", sport: Sport::Basketball, name: "歐洲職籃" },
    League { code: "SBL", source_id: "89", sport: Sport::Basketball, name: "SBL" },
    League { code: "KBL", source_id: "92", sport: Sport::Basketball, name: "韓國職籃" },
    League { code: "BLEAGUE", source_id: "97", sport: Sport::Basketball, name: "日本職籃" },
    League { code: "MLB", source_id: "1", sport: Sport::Baseball, name: "MLB" },
    League { code: "NPB", source_id: "2", sport: Sport::Baseball, name: "日本職棒" },
    League { code: "CPBL", source_id: "6", sport: Sport::Baseball, name: "中華職棒" },
    League { code: "KBO", source_id: "9", sport: Sport::Baseball, name: "韓國職棒" },
    League { code: "SOCCER", source_id: "4", sport: Sport::Soccer, name: "足球" },
    League { code: "NHL", source_id: "91", sport: Sport::Hockey, name: "NHL冰球" },
    League { code: "TENNIS", source_id: "21", sport: Sport::Tennis, name: "網球" },
];

/// Case-insensitive lookup by league code.
pub fn find_league(code: &str) -> Option<&'static League> {
    let code = code.trim();
    LEAGUES.iter().find(|l| l.code.eq_ignore_ascii_case(code))
}

/// Resolves a (sport, league) pair, rejecting leagues filed under another sport.
pub fn resolve(sport: Sport, code: &str) -> Option<&'static League> {
    find_league(code).filter(|l| l.sport == sport)
}

pub fn leagues_for(sport: Sport) -> impl Iterator<Item = &'static League> {
    LEAGUES.iter().filter(move |l| l.sport == sport)
}
