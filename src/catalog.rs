use std::collections::HashMap;

use once_cell::sync::Lazy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    Pass,
    Shot,
    Duel,
    Goalkeeper,
    SetPiece,
    Discipline,
    Match,
}

impl EventCategory {
    pub fn label(self) -> &'static str {
        match self {
            EventCategory::Pass => "Passing",
            EventCategory::Shot => "Shooting",
            EventCategory::Duel => "Duels",
            EventCategory::Goalkeeper => "Goalkeeping",
            EventCategory::SetPiece => "Set pieces",
            EventCategory::Discipline => "Discipline",
            EventCategory::Match => "Match",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTypeDescriptor {
    pub key: &'static str,
    pub label: &'static str,
    pub category: Option<EventCategory>,
    pub icon_ref: Option<&'static str>,
}

// Icon assets shipped with the web client, keyed by file name.
const ICON_FILES: &[&str] = &[
    "Pass.svg",
    "Long_Pass.svg",
    "Cross.svg",
    "Through_Ball.svg",
    "Shot.svg",
    "Shot_On_Target.svg",
    "Shot_Off_Target.svg",
    "Goal.svg",
    "Assist.svg",
    "Tackle.svg",
    "Interception.svg",
    "Dribble.svg",
    "Clearance.svg",
    "Aerial-Duel.svg",
    "Save.svg",
    "Corner.svg",
    "Free_Kick.svg",
    "Throw_In.svg",
    "Penalty.svg",
    "Offside.svg",
    "Foul.svg",
    "Yellow_Card.svg",
    "Red_Card.svg",
    "Substitution.svg",
];

const ENTRIES: &[(&str, &str, EventCategory)] = &[
    ("pass", "Pass", EventCategory::Pass),
    ("long_pass", "Long pass", EventCategory::Pass),
    ("cross", "Cross", EventCategory::Pass),
    ("through_ball", "Through ball", EventCategory::Pass),
    ("shot", "Shot", EventCategory::Shot),
    ("shot_on_target", "Shot on target", EventCategory::Shot),
    ("shot_off_target", "Shot off target", EventCategory::Shot),
    ("goal", "Goal", EventCategory::Match),
    ("assist", "Assist", EventCategory::Match),
    ("tackle", "Tackle", EventCategory::Duel),
    ("interception", "Interception", EventCategory::Duel),
    ("dribble", "Dribble", EventCategory::Duel),
    ("clearance", "Clearance", EventCategory::Duel),
    ("aerial_duel", "Aerial duel", EventCategory::Duel),
    ("save", "Save", EventCategory::Goalkeeper),
    ("claim", "Claim", EventCategory::Goalkeeper),
    ("corner", "Corner", EventCategory::SetPiece),
    ("free_kick", "Free kick", EventCategory::SetPiece),
    ("throw_in", "Throw-in", EventCategory::SetPiece),
    ("penalty", "Penalty", EventCategory::SetPiece),
    ("offside", "Offside", EventCategory::SetPiece),
    ("foul", "Foul", EventCategory::Discipline),
    ("yellow_card", "Yellow card", EventCategory::Discipline),
    ("red_card", "Red card", EventCategory::Discipline),
    ("substitution", "Substitution", EventCategory::Match),
];

static ICONS: Lazy<HashMap<String, &'static str>> = Lazy::new(|| {
    ICON_FILES
        .iter()
        .map(|file| (normalize_icon_key(file), *file))
        .collect()
});

static CATALOG: Lazy<Vec<EventTypeDescriptor>> = Lazy::new(|| {
    ENTRIES
        .iter()
        .map(|&(key, label, category)| EventTypeDescriptor {
            key,
            label,
            category: Some(category),
            icon_ref: icon_for(key),
        })
        .collect()
});

pub fn catalog() -> &'static [EventTypeDescriptor] {
    &CATALOG
}

pub fn descriptor(key: &str) -> Option<&'static EventTypeDescriptor> {
    CATALOG.iter().find(|d| d.key == key)
}

pub fn is_known(key: &str) -> bool {
    descriptor(key).is_some()
}

pub fn keys() -> impl Iterator<Item = &'static str> {
    CATALOG.iter().map(|d| d.key)
}

/// Display label; unknown keys are title-cased so custom assignments still
/// render readably.
pub fn label_for(key: &str) -> String {
    if let Some(d) = descriptor(key) {
        return d.label.to_string();
    }
    let words = key
        .split(['_', '-', ' '])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>();
    if words.is_empty() {
        key.to_string()
    } else {
        words.join(" ")
    }
}

pub fn icon_for(key: &str) -> Option<&'static str> {
    ICONS.get(&normalize_icon_key(key)).copied()
}

fn normalize_icon_key(raw: &str) -> String {
    let stem = raw.rsplit_once('.').map(|(s, _)| s).unwrap_or(raw);
    stem.chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}
