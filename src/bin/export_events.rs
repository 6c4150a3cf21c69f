use std::path::PathBuf;

use anyhow::{Context, Result};

use tracker_terminal::config;
use tracker_terminal::event_log;
use tracker_terminal::export::export_events;

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let match_id = arg_value("--match")
        .or_else(|| std::env::var("TRACKER_MATCH_ID").ok())
        .unwrap_or_else(|| "local-match".to_string());
    let db_path = arg_value("--db")
        .map(PathBuf::from)
        .or_else(|| std::env::var("TRACKER_DB_PATH").ok().map(PathBuf::from))
        .or_else(config::default_db_path)
        .context("unable to resolve sqlite path")?;
    let out = arg_value("--out")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(format!("{match_id}_events.xlsx")));

    let conn = event_log::open_db(&db_path)?;
    let events = event_log::load_match_events(&conn, &match_id)?;
    if events.is_empty() {
        println!("No recorded events for {match_id} in {}", db_path.display());
        return Ok(());
    }

    let report = export_events(&out, &match_id, &events)?;
    println!("Export complete");
    println!("DB: {}", db_path.display());
    println!("File: {}", out.display());
    println!(
        "Events: {} | Players: {} | Event types: {}",
        report.events, report.players, report.event_types
    );
    Ok(())
}

fn arg_value(name: &str) -> Option<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let prefix = format!("{name}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&prefix) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(next.trim().to_string());
        }
    }
    None
}
