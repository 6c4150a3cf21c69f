use anyhow::{Context, Result, anyhow};
use chrono::Utc;

use tracker_terminal::backend::BackendClient;
use tracker_terminal::config::{BackendConfig, PipelineConfig};
use tracker_terminal::video_chunks::thread_sleep;
use tracker_terminal::video_pipeline::{
    BackendAnalysis, BackendChunkStore, DirectFetcher, JobStatus, PipelineDeps, VideoJob,
    VideoSource, run_job,
};

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let source = arg_value("--source")
        .or_else(|| std::env::args().nth(1).filter(|a| !a.starts_with("--")))
        .context("usage: video_job --source <path|url> [--match <id>] [--segment-secs N --duration-secs N]")?;
    let match_id = arg_value("--match")
        .or_else(|| std::env::var("TRACKER_MATCH_ID").ok())
        .unwrap_or_else(|| "local-match".to_string());
    let backend = BackendConfig::from_env().ok_or_else(|| anyhow!("BACKEND_URL is not set"))?;
    let client = BackendClient::new(&backend);
    let config = PipelineConfig::from_env();

    let job_id = arg_value("--job")
        .unwrap_or_else(|| format!("job-{}", Utc::now().format("%Y%m%d%H%M%S")));
    let mut job = VideoJob::new(job_id, match_id, VideoSource::parse(&source));
    job.segment_secs = arg_value("--segment-secs").and_then(|v| v.parse::<f64>().ok());
    job.duration_secs = arg_value("--duration-secs").and_then(|v| v.parse::<f64>().ok());

    let fetcher = DirectFetcher;
    let store = BackendChunkStore {
        client: client.clone(),
    };
    let analysis = BackendAnalysis { client };
    let deps = PipelineDeps {
        fetcher: &fetcher,
        store: &store,
        analysis: &analysis,
        sleep: &thread_sleep,
    };

    println!("Job {} ({})", job.id, job.source.describe());
    run_job(&mut job, &deps, &config, |j| {
        println!("  {:>3}% {:?}", j.progress, j.status);
    });

    match job.status {
        JobStatus::Completed => {
            if job.used_fallback {
                println!("Completed via fallback analysis");
            } else {
                println!("Completed");
            }
            if let Some(result) = job.result.as_ref() {
                println!("{}", serde_json::to_string_pretty(result)?);
            }
            Ok(())
        }
        _ => Err(anyhow!(
            "job {} failed: {}",
            job.id,
            job.error.as_deref().unwrap_or("unknown error")
        )),
    }
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
