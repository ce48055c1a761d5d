//! Completeness audit of the merged dataset against the match roster.

use std::{collections::BTreeMap, fmt, ops::Range};

use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{info, warn};

use crate::record::{Record, render_value};

/// Robots on the field per match, both alliances.
pub const TEAMS_PER_MATCH: usize = 6;

/// Empty matches directly below the highest one beyond which that highest
/// match is treated as a likely typo and the gap is logged as one line.
pub const OUTLIER_GAP: u32 = 20;

/// Expected teams for one match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MatchRoster {
    #[serde(default, deserialize_with = "team_ids")]
    pub red: Vec<String>,
    #[serde(default, deserialize_with = "team_ids")]
    pub blue: Vec<String>,
}

impl MatchRoster {
    pub fn teams(&self) -> impl Iterator<Item = &String> {
        self.red.iter().chain(self.blue.iter())
    }
}

/// Qualification schedule keyed by match number. Entries whose key is not a
/// number (playoff labels) are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "BTreeMap<String, MatchRoster>")]
pub struct Schedule {
    matches: HashMap<u32, MatchRoster>,
}

impl From<BTreeMap<String, MatchRoster>> for Schedule {
    fn from(value: BTreeMap<String, MatchRoster>) -> Self {
        let matches = value
            .into_iter()
            .filter_map(|(k, roster)| k.trim().parse::<u32>().ok().map(|m| (m, roster)))
            .collect();
        Self { matches }
    }
}

impl Schedule {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn insert(&mut self, match_number: u32, roster: MatchRoster) {
        self.matches.insert(match_number, roster);
    }

    pub fn roster(&self, match_number: u32) -> Option<&MatchRoster> {
        self.matches.get(&match_number)
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

fn team_ids<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<Value>::deserialize(deserializer)?;
    Ok(raw.iter().map(render_value).collect())
}

/// One problem found for a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    /// Scheduled teams with no data.
    MissingTeams(Vec<String>),
    /// Data for teams not scheduled in the match.
    ExtraTeams(Vec<String>),
    /// No schedule: fewer than six distinct teams.
    MissingData(Vec<String>),
    /// No schedule: more than six distinct teams.
    ExtraData(Vec<String>),
    /// Teams with more than one entry.
    Duplicates(Vec<String>),
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::MissingTeams(t) => write!(f, "missing data for {}{}", team_word(t), t.join(", ")),
            Finding::ExtraTeams(t) => write!(f, "data for {}not in match: {}", team_word(t), t.join(", ")),
            Finding::MissingData(t) if t.is_empty() => write!(f, "missing data, have no teams"),
            Finding::MissingData(t) => write!(f, "missing data, only have {}{}", team_word(t), t.join(", ")),
            Finding::ExtraData(t) => write!(f, "extra data, have teams {}", t.join(", ")),
            Finding::Duplicates(t) => write!(f, "duplicate data, have repeated entries for {}", t.join(", ")),
        }
    }
}

fn team_word(teams: &[String]) -> &'static str {
    if teams.len() > 1 { "teams " } else { "team " }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchAudit {
    pub match_number: u32,
    /// Observed team ids, one per authoritative record, duplicates kept.
    pub teams: Vec<String>,
    pub findings: Vec<Finding>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditReport {
    /// Every match from 1 through the highest with data, ascending.
    pub matches: Vec<MatchAudit>,
    /// Highest match number with any data.
    pub through_match: Option<u32>,
    /// Empty matches between the highest match and the next one down, when
    /// that gap is wider than [`OUTLIER_GAP`].
    pub suspect_gap: Option<Range<u32>>,
    /// Records without a usable match number or team.
    pub skipped: usize,
}

impl AuditReport {
    pub fn findings_for(&self, match_number: u32) -> &[Finding] {
        self.matches
            .iter()
            .find(|m| m.match_number == match_number)
            .map(|m| m.findings.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_clean(&self) -> bool {
        self.matches.iter().all(|m| m.findings.is_empty())
    }
}

/// Audits authoritative records, logging each finding as it goes.
pub fn audit<'a>(records: impl IntoIterator<Item = &'a Record>, schedule: Option<&Schedule>) -> AuditReport {
    let mut by_match: HashMap<u32, Vec<String>> = HashMap::new();
    let mut skipped = 0usize;

    for record in records {
        match (record.match_number(), record.team()) {
            (Some(m), Some(team)) => by_match.entry(m).or_default().push(team),
            _ => {
                warn!(
                    match_id = ?record.rendered(crate::types::MATCH),
                    team = ?record.rendered(crate::types::TEAM),
                    "record without usable match/team skipped by audit"
                );
                skipped += 1;
            }
        }
    }

    let Some(through) = by_match.keys().copied().max() else {
        info!("no match data found");
        return AuditReport {
            skipped,
            ..AuditReport::default()
        };
    };

    let below = by_match.keys().copied().filter(|m| *m < through).max().unwrap_or(0);
    let quiet_gap = if through - below > OUTLIER_GAP {
        warn!(
            through,
            next_highest = below,
            "match {} is far past the rest of the data, matches {}..{} are empty; check for a mistyped match number",
            through,
            below + 1,
            through - 1
        );
        (below + 1)..through
    } else {
        0..0
    };

    let matches = (1..=through)
        .map(|match_number| {
            let teams = by_match.remove(&match_number).unwrap_or_default();
            let roster = schedule.and_then(|s| s.roster(match_number));
            let findings = match_findings(&teams, roster);
            if !quiet_gap.contains(&match_number) {
                for finding in &findings {
                    warn!(match_number, "{:>2}: {}", match_number, finding);
                }
            }
            MatchAudit {
                match_number,
                teams,
                findings,
            }
        })
        .collect();

    info!("data found through match {}", through);

    AuditReport {
        matches,
        through_match: Some(through),
        suspect_gap: (!quiet_gap.is_empty()).then_some(quiet_gap),
        skipped,
    }
}

fn match_findings(teams: &[String], roster: Option<&MatchRoster>) -> Vec<Finding> {
    let mut findings = Vec::new();
    let distinct = unique_in_order(teams.iter());

    match roster {
        Some(roster) => {
            let observed: HashSet<&str> = teams.iter().map(String::as_str).collect();
            let expected: HashSet<&str> = roster.teams().map(String::as_str).collect();

            let missing = unique_in_order(roster.teams().filter(|t| !observed.contains(t.as_str())));
            let extra: Vec<String> = distinct
                .iter()
                .filter(|t| !expected.contains(t.as_str()))
                .cloned()
                .collect();

            if !missing.is_empty() {
                findings.push(Finding::MissingTeams(missing));
            }
            if !extra.is_empty() {
                findings.push(Finding::ExtraTeams(extra));
            }
        }
        None => {
            if distinct.len() < TEAMS_PER_MATCH {
                findings.push(Finding::MissingData(teams.to_vec()));
            } else if distinct.len() > TEAMS_PER_MATCH {
                findings.push(Finding::ExtraData(teams.to_vec()));
            }
        }
    }

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for team in teams {
        *counts.entry(team.as_str()).or_default() += 1;
    }
    let duplicates: Vec<String> = distinct
        .into_iter()
        .filter(|t| counts.get(t.as_str()).copied().unwrap_or(0) > 1)
        .collect();
    if !duplicates.is_empty() {
        findings.push(Finding::Duplicates(duplicates));
    }

    findings
}

fn unique_in_order<'a>(teams: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut seen = HashSet::new();
    teams
        .filter(|t| seen.insert(t.as_str()))
        .cloned()
        .collect()
}
