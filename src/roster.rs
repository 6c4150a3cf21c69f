use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const PLACEHOLDER_HOME: &str = "ALPHA";
pub const PLACEHOLDER_AWAY: &str = "OMEGA";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamSide {
    Home,
    Away,
}

impl TeamSide {
    pub fn label(self) -> &'static str {
        match self {
            TeamSide::Home => "home",
            TeamSide::Away => "away",
        }
    }
}

/// The player a pending slot or a recorded event is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRef {
    pub id: String,
    pub name: String,
    pub number: u32,
    pub side: TeamSide,
    #[serde(default)]
    pub team_id: Option<String>,
}

impl PlayerRef {
    /// Value sent as `team` on outbound records: the backend team id when
    /// known, otherwise the side label.
    pub fn team_key(&self) -> String {
        self.team_id
            .clone()
            .unwrap_or_else(|| self.side.label().to_string())
    }

    pub fn short_label(&self) -> String {
        format!("#{} {}", self.number, self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamSheet {
    pub name: String,
    #[serde(default)]
    pub team_id: Option<String>,
    pub players: Vec<RosterEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterEntry {
    pub id: String,
    pub name: String,
    pub number: u32,
    #[serde(default)]
    pub position: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Roster {
    pub home: TeamSheet,
    pub away: TeamSheet,
}

impl Roster {
    /// Players of both sides, home first, in sheet order.
    pub fn players(&self) -> Vec<PlayerRef> {
        let mut out = Vec::with_capacity(self.home.players.len() + self.away.players.len());
        out.extend(side_players(&self.home, TeamSide::Home));
        out.extend(side_players(&self.away, TeamSide::Away));
        out
    }

    pub fn find(&self, player_id: &str) -> Option<PlayerRef> {
        self.players().into_iter().find(|p| p.id == player_id)
    }

    pub fn team_name(&self, side: TeamSide) -> &str {
        match side {
            TeamSide::Home => &self.home.name,
            TeamSide::Away => &self.away.name,
        }
    }

    pub fn len(&self) -> usize {
        self.home.players.len() + self.away.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn side_players(sheet: &TeamSheet, side: TeamSide) -> impl Iterator<Item = PlayerRef> + '_ {
    sheet.players.iter().map(move |entry| PlayerRef {
        id: entry.id.clone(),
        name: entry.name.clone(),
        number: entry.number,
        side,
        team_id: sheet.team_id.clone(),
    })
}

pub fn parse_roster_json(raw: &str) -> Result<Roster> {
    serde_json::from_str::<Roster>(raw).context("invalid roster json")
}

pub fn load_roster(path: &Path) -> Result<Roster> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed reading roster {}", path.display()))?;
    parse_roster_json(&raw)
}

pub fn placeholder_roster() -> Roster {
    Roster {
        home: TeamSheet {
            name: PLACEHOLDER_HOME.to_string(),
            team_id: None,
            players: vec![
                placeholder_entry("h1", "A. Stone", 1, "GK"),
                placeholder_entry("h3", "R. Vega", 3, "DF"),
                placeholder_entry("h4", "M. Holt", 4, "DF"),
                placeholder_entry("h6", "J. Nox", 6, "MF"),
                placeholder_entry("h8", "T. Vale", 8, "MF"),
                placeholder_entry("h10", "S. Quinn", 10, "MF"),
                placeholder_entry("h9", "K. Rook", 9, "FW"),
            ],
        },
        away: TeamSheet {
            name: PLACEHOLDER_AWAY.to_string(),
            team_id: None,
            players: vec![
                placeholder_entry("a1", "L. Park", 1, "GK"),
                placeholder_entry("a2", "D. Moss", 2, "DF"),
                placeholder_entry("a5", "I. Noor", 5, "DF"),
                placeholder_entry("a7", "C. Hale", 7, "MF"),
                placeholder_entry("a10", "V. Ash", 10, "MF"),
                placeholder_entry("a11", "E. Pike", 11, "FW"),
                placeholder_entry("a19", "O. Reed", 19, "FW"),
            ],
        },
    }
}

fn placeholder_entry(id: &str, name: &str, number: u32, pos: &str) -> RosterEntry {
    RosterEntry {
        id: id.to_string(),
        name: name.to_string(),
        number,
        position: Some(pos.to_string()),
    }
}
