use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use rayon::prelude::*;
use serde::Serialize;
use serde_json::{Value, json};

use crate::backend::{self, BackendClient};
use crate::config::PipelineConfig;
use crate::video_chunks::{RetryPolicy, VideoChunk, retry_with_backoff, split_chunks};

const PRIMARY_FUNCTION: &str = "analyze-video";
const FALLBACK_FUNCTION: &str = "analyze-youtube-fallback";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VideoSource {
    Upload { path: PathBuf },
    Link { url: String },
}

impl VideoSource {
    /// Accepts a local path or an http(s) link.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            VideoSource::Link {
                url: trimmed.to_string(),
            }
        } else {
            VideoSource::Upload {
                path: PathBuf::from(trimmed),
            }
        }
    }

    pub fn is_youtube(&self) -> bool {
        let VideoSource::Link { url } = self else {
            return false;
        };
        let lower = url.to_ascii_lowercase();
        let host = lower
            .split("://")
            .nth(1)
            .unwrap_or(lower.as_str())
            .split(['/', '?', '#'])
            .next()
            .unwrap_or_default()
            .trim_start_matches("www.")
            .trim_start_matches("m.");
        host == "youtube.com" || host == "youtu.be" || host.ends_with(".youtube.com")
    }

    /// YouTube links are handed to analysis as-is; everything else is
    /// fetched and pushed through chunked storage first.
    pub fn needs_transfer(&self) -> bool {
        !self.is_youtube()
    }

    pub fn describe(&self) -> String {
        match self {
            VideoSource::Upload { path } => path.display().to_string(),
            VideoSource::Link { url } => url.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct VideoJob {
    pub id: String,
    pub match_id: String,
    pub source: VideoSource,
    pub status: JobStatus,
    pub progress: u8,
    pub error: Option<String>,
    pub segment_secs: Option<f64>,
    pub duration_secs: Option<f64>,
    pub result: Option<Value>,
    pub used_fallback: bool,
}

impl VideoJob {
    pub fn new(id: impl Into<String>, match_id: impl Into<String>, source: VideoSource) -> Self {
        Self {
            id: id.into(),
            match_id: match_id.into(),
            source,
            status: JobStatus::Pending,
            progress: 0,
            error: None,
            segment_secs: None,
            duration_secs: None,
            result: None,
            used_fallback: false,
        }
    }

    /// Progress only moves forward.
    pub fn set_progress(&mut self, progress: u8) {
        self.progress = self.progress.max(progress.min(100));
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.error = Some(message.into());
    }

    fn complete(&mut self, result: Value) {
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.result = Some(result);
        self.error = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Segment {
    pub index: usize,
    pub start_secs: f64,
    pub end_secs: Option<f64>,
}

/// Shortest segment the analysis service is asked about.
pub const MIN_SEGMENT_SECS: f64 = 1.0;
/// Upper bound on analysis calls a single job may fan out to.
pub const MAX_SEGMENTS: usize = 512;

/// Time windows analysed independently. Without a known duration or a
/// segment length the whole video is one segment.
pub fn plan_segments(duration_secs: Option<f64>, segment_secs: Option<f64>) -> Result<Vec<Segment>> {
    let whole = vec![Segment {
        index: 0,
        start_secs: 0.0,
        end_secs: duration_secs,
    }];
    let (Some(duration), Some(step)) = (duration_secs, segment_secs) else {
        return Ok(whole);
    };
    if !duration.is_finite() || !step.is_finite() {
        bail!("segment plan needs finite durations (got {duration}s / {step}s)");
    }
    if step < MIN_SEGMENT_SECS {
        bail!("segment length {step}s is below the {MIN_SEGMENT_SECS}s minimum");
    }
    if duration <= 0.0 || step >= duration {
        return Ok(whole);
    }
    let count = (duration / step).ceil() as usize;
    if count > MAX_SEGMENTS {
        bail!("{count} segments of {step}s exceed the limit of {MAX_SEGMENTS}");
    }
    let mut out = Vec::with_capacity(count);
    for index in 0..count {
        let start = index as f64 * step;
        if start >= duration {
            break;
        }
        out.push(Segment {
            index,
            start_secs: start,
            end_secs: Some(((index + 1) as f64 * step).min(duration)),
        });
    }
    Ok(out)
}

pub trait VideoFetcher {
    fn fetch(&self, source: &VideoSource) -> Result<Vec<u8>>;
}

pub trait ChunkStore {
    fn put_chunk(&self, job_id: &str, chunk: &VideoChunk) -> Result<()>;
}

pub trait AnalysisService: Send + Sync {
    fn analyze_segment(&self, job: &VideoJob, segment: &Segment) -> Result<Value>;
    fn analyze_fallback(&self, job: &VideoJob) -> Result<Value>;
}

pub struct PipelineDeps<'a> {
    pub fetcher: &'a dyn VideoFetcher,
    pub store: &'a dyn ChunkStore,
    pub analysis: &'a dyn AnalysisService,
    pub sleep: &'a dyn Fn(Duration),
}

/// Order-preserving parallel map capped at `max_concurrency` workers.
pub fn map_bounded<T, R, F>(items: &[T], max_concurrency: usize, f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync + Send,
{
    let threads = max_concurrency.clamp(1, 32);
    if threads == 1 || items.len() <= 1 {
        return items.iter().map(&f).collect();
    }
    match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
        Ok(pool) => pool.install(|| items.par_iter().map(&f).collect()),
        Err(_) => items.iter().map(&f).collect(),
    }
}

/// Runs one job to `Completed` or `Failed`. Never returns an error itself;
/// failures land in `job.error`.
pub fn run_job(
    job: &mut VideoJob,
    deps: &PipelineDeps<'_>,
    config: &PipelineConfig,
    mut on_progress: impl FnMut(&VideoJob),
) {
    job.status = JobStatus::Processing;
    job.error = None;
    job.set_progress(5);
    on_progress(job);

    if let Err(err) = transfer(job, deps, config, &mut on_progress) {
        job.fail(format!("{err:#}"));
        on_progress(job);
        return;
    }

    match analyse(job, deps, config, &mut on_progress) {
        Ok(result) => {
            job.set_progress(95);
            on_progress(job);
            job.complete(result);
        }
        Err(err) => job.fail(format!("{err:#}")),
    }
    on_progress(job);
}

fn transfer(
    job: &mut VideoJob,
    deps: &PipelineDeps<'_>,
    config: &PipelineConfig,
    on_progress: &mut impl FnMut(&VideoJob),
) -> Result<()> {
    if !job.source.needs_transfer() {
        job.set_progress(30);
        on_progress(job);
        return Ok(());
    }

    let bytes = deps
        .fetcher
        .fetch(&job.source)
        .with_context(|| format!("failed to acquire {}", job.source.describe()))?;
    if bytes.is_empty() {
        bail!("downloaded video is empty");
    }
    job.set_progress(20);
    on_progress(job);

    let chunks = split_chunks(&bytes, config.chunk_size)?;
    let policy = RetryPolicy {
        attempts: config.upload_attempts,
        base_delay: config.retry_base,
    };
    let total = chunks.len();
    for chunk in &chunks {
        retry_with_backoff(policy, deps.sleep, |_| deps.store.put_chunk(&job.id, chunk))
            .with_context(|| format!("chunk {}/{} upload failed", chunk.index + 1, total))?;
        job.set_progress(20 + (10 * (chunk.index + 1) / total) as u8);
        on_progress(job);
    }
    Ok(())
}

fn analyse(
    job: &mut VideoJob,
    deps: &PipelineDeps<'_>,
    config: &PipelineConfig,
    on_progress: &mut impl FnMut(&VideoJob),
) -> Result<Value> {
    let segments = plan_segments(job.duration_secs, job.segment_secs)?;
    let snapshot = job.clone();
    let analysis = deps.analysis;
    let results = map_bounded(&segments, config.max_concurrency, |segment| {
        analysis.analyze_segment(&snapshot, segment)
    });
    job.set_progress(90);
    on_progress(job);

    let mut values = Vec::with_capacity(results.len());
    let mut first_err = None;
    for (segment, result) in segments.iter().zip(results) {
        match result {
            Ok(value) => values.push(value),
            Err(err) => {
                if first_err.is_none() {
                    first_err = Some(err.context(format!("segment {} analysis failed", segment.index)));
                }
            }
        }
    }

    let Some(err) = first_err else {
        return Ok(combine(values));
    };
    if !job.source.is_youtube() {
        return Err(err);
    }
    job.used_fallback = true;
    deps.analysis
        .analyze_fallback(job)
        .map_err(|fallback_err| anyhow!("{err:#}; fallback failed: {fallback_err:#}"))
}

fn combine(mut values: Vec<Value>) -> Value {
    if values.len() == 1 {
        return values.remove(0);
    }
    json!({ "segments": values })
}

/// Reads local files and downloads plain links.
pub struct DirectFetcher;

impl VideoFetcher for DirectFetcher {
    fn fetch(&self, source: &VideoSource) -> Result<Vec<u8>> {
        match source {
            VideoSource::Upload { path } => {
                fs::read(path).with_context(|| format!("failed reading {}", path.display()))
            }
            VideoSource::Link { url } => backend::fetch_bytes(url),
        }
    }
}

pub struct BackendChunkStore {
    pub client: BackendClient,
}

impl ChunkStore for BackendChunkStore {
    fn put_chunk(&self, job_id: &str, chunk: &VideoChunk) -> Result<()> {
        self.client
            .upload_object(&chunk.object_name(job_id), chunk.data.clone())
    }
}

pub struct BackendAnalysis {
    pub client: BackendClient,
}

impl AnalysisService for BackendAnalysis {
    fn analyze_segment(&self, job: &VideoJob, segment: &Segment) -> Result<Value> {
        let payload = json!({
            "job_id": job.id,
            "match_id": job.match_id,
            "source": job.source,
            "object_prefix": job.id,
            "segment": segment,
        });
        self.client.invoke_function(PRIMARY_FUNCTION, &payload)
    }

    fn analyze_fallback(&self, job: &VideoJob) -> Result<Value> {
        let payload = json!({
            "job_id": job.id,
            "match_id": job.match_id,
            "source": job.source,
        });
        self.client.invoke_function(FALLBACK_FUNCTION, &payload)
    }
}
