use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use rust_xlsxwriter::{Workbook, Worksheet};

use crate::catalog;
use crate::event_log::StoredEvent;

pub struct ExportReport {
    pub events: usize,
    pub players: usize,
    pub event_types: usize,
}

/// Writes an `Events` sheet (one row per recorded event, match-time order)
/// and a `Summary` sheet (counts per player and event type).
pub fn export_events(path: &Path, match_id: &str, events: &[StoredEvent]) -> Result<ExportReport> {
    let event_rows = event_rows(events);
    let (summary_rows, players, event_types) = summary_rows(events);

    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Events")?;
        write_rows(sheet, &event_rows)?;
    }
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Summary")?;
        write_rows(sheet, &summary_rows)?;
    }

    workbook
        .save(path)
        .with_context(|| format!("failed writing workbook for {match_id} to {}", path.display()))?;

    Ok(ExportReport {
        events: events.len(),
        players,
        event_types,
    })
}

pub fn event_rows(events: &[StoredEvent]) -> Vec<Vec<String>> {
    let mut rows = vec![vec![
        "Match".to_string(),
        "Time (UTC)".to_string(),
        "Event".to_string(),
        "Category".to_string(),
        "Player ID".to_string(),
        "Team".to_string(),
        "Tracker".to_string(),
        "Recorded At".to_string(),
    ]];
    for event in events {
        let req = &event.request;
        let category = catalog::descriptor(&req.event_type)
            .and_then(|d| d.category)
            .map(|c| c.label().to_string())
            .unwrap_or_default();
        rows.push(vec![
            req.match_id.clone(),
            req.timestamp.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
            catalog::label_for(&req.event_type),
            category,
            req.player_id.clone(),
            req.team.clone(),
            req.created_by.clone(),
            event.recorded_at.clone(),
        ]);
    }
    rows
}

/// Player × event-type count table; returns rows, player count, type count.
pub fn summary_rows(events: &[StoredEvent]) -> (Vec<Vec<String>>, usize, usize) {
    let mut types = events
        .iter()
        .map(|e| e.request.event_type.clone())
        .collect::<Vec<_>>();
    types.sort();
    types.dedup();

    let mut per_player: BTreeMap<(String, String), BTreeMap<&str, usize>> = BTreeMap::new();
    for event in events {
        let req = &event.request;
        *per_player
            .entry((req.team.clone(), req.player_id.clone()))
            .or_default()
            .entry(req.event_type.as_str())
            .or_insert(0) += 1;
    }

    let mut header = vec!["Team".to_string(), "Player ID".to_string()];
    header.extend(types.iter().map(|t| catalog::label_for(t)));
    header.push("Total".to_string());

    let mut rows = vec![header];
    for ((team, player_id), counts) in &per_player {
        let mut row = vec![team.clone(), player_id.clone()];
        row.extend(
            types
                .iter()
                .map(|t| counts.get(t.as_str()).copied().unwrap_or(0).to_string()),
        );
        row.push(counts.values().sum::<usize>().to_string());
        rows.push(row);
    }
    (rows, per_player.len(), types.len())
}

fn write_rows(worksheet: &mut Worksheet, rows: &[Vec<String>]) -> Result<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            worksheet
                .write_string(row_idx as u32, col_idx as u16, value)
                .with_context(|| format!("write cell ({row_idx},{col_idx})"))?;
        }
    }
    Ok(())
}
