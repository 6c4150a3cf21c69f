use std::cell::{Cell, RefCell};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use serde_json::{Value, json};

use tracker_terminal::config::PipelineConfig;
use tracker_terminal::video_chunks::{
    ChunkPlan, RetryPolicy, VideoChunk, reassemble, retry_with_backoff, split_chunks,
};
use tracker_terminal::video_pipeline::{
    AnalysisService, ChunkStore, JobStatus, MAX_SEGMENTS, PipelineDeps, Segment, VideoFetcher,
    VideoJob, VideoSource, map_bounded, plan_segments, run_job,
};

struct BytesFetcher {
    bytes: Vec<u8>,
    calls: Cell<usize>,
}

impl BytesFetcher {
    fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            calls: Cell::new(0),
        }
    }
}

impl VideoFetcher for BytesFetcher {
    fn fetch(&self, _source: &VideoSource) -> Result<Vec<u8>> {
        self.calls.set(self.calls.get() + 1);
        Ok(self.bytes.clone())
    }
}

/// Rejects the first `failures` puts, then stores everything.
struct FlakyStore {
    failures: Cell<usize>,
    stored: RefCell<Vec<VideoChunk>>,
}

impl FlakyStore {
    fn new(failures: usize) -> Self {
        Self {
            failures: Cell::new(failures),
            stored: RefCell::new(Vec::new()),
        }
    }
}

impl ChunkStore for FlakyStore {
    fn put_chunk(&self, _job_id: &str, chunk: &VideoChunk) -> Result<()> {
        if self.failures.get() > 0 {
            self.failures.set(self.failures.get() - 1);
            bail!("storage returned 503");
        }
        self.stored.borrow_mut().push(chunk.clone());
        Ok(())
    }
}

struct ScriptedAnalysis {
    fail_segments: bool,
    fallback_ok: bool,
    fallback_calls: AtomicUsize,
    seen: Mutex<Vec<usize>>,
}

impl ScriptedAnalysis {
    fn ok() -> Self {
        Self {
            fail_segments: false,
            fallback_ok: true,
            fallback_calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn failing(fallback_ok: bool) -> Self {
        Self {
            fail_segments: true,
            fallback_ok,
            ..Self::ok()
        }
    }
}

impl AnalysisService for ScriptedAnalysis {
    fn analyze_segment(&self, _job: &VideoJob, segment: &Segment) -> Result<Value> {
        self.seen
            .lock()
            .map_err(|_| anyhow!("poisoned"))?
            .push(segment.index);
        if self.fail_segments {
            bail!("model timed out");
        }
        Ok(json!({ "segment": segment.index, "events": [] }))
    }

    fn analyze_fallback(&self, _job: &VideoJob) -> Result<Value> {
        self.fallback_calls.fetch_add(1, Ordering::SeqCst);
        if self.fallback_ok {
            Ok(json!({ "fallback": true }))
        } else {
            bail!("fallback unavailable")
        }
    }
}

fn small_config() -> PipelineConfig {
    PipelineConfig {
        chunk_size: 4,
        upload_attempts: 3,
        retry_base: Duration::from_millis(500),
        max_concurrency: 2,
    }
}

fn upload_job() -> VideoJob {
    VideoJob::new("job-1", "m1", VideoSource::parse("/tmp/match.mp4"))
}

#[test]
fn chunk_plan_covers_every_byte() {
    let plan = ChunkPlan::new(10, 4).unwrap();
    let lens = plan.chunks.iter().map(|c| (c.offset, c.len)).collect::<Vec<_>>();
    assert_eq!(lens, vec![(0, 4), (4, 4), (8, 2)]);

    assert!(ChunkPlan::new(0, 4).unwrap().is_empty());
    assert!(ChunkPlan::new(10, 0).is_err());
}

#[test]
fn reassemble_accepts_any_arrival_order() {
    let bytes = (0u8..=200).collect::<Vec<_>>();
    let mut chunks = split_chunks(&bytes, 64).unwrap();
    assert_eq!(chunks.len(), 4);
    assert_eq!(chunks[1].object_name("job-1"), "job-1/chunk_00001_of_00004");
    chunks.reverse();

    assert_eq!(reassemble(chunks).unwrap(), bytes);
    assert!(reassemble(Vec::new()).unwrap().is_empty());
}

#[test]
fn reassemble_rejects_gaps_and_corruption() {
    let bytes = b"kick-off at fifteen hundred".to_vec();

    let mut missing = split_chunks(&bytes, 8).unwrap();
    missing.remove(1);
    assert!(reassemble(missing).is_err());

    let mut duplicated = split_chunks(&bytes, 8).unwrap();
    duplicated[2] = duplicated[1].clone();
    assert!(reassemble(duplicated).is_err());

    let mut corrupted = split_chunks(&bytes, 8).unwrap();
    corrupted[0].data[0] ^= 0xff;
    let err = reassemble(corrupted).unwrap_err();
    assert!(err.to_string().contains("digest"));
}

#[test]
fn retry_backs_off_exponentially_then_succeeds() {
    let slept = RefCell::new(Vec::new());
    let attempts = Cell::new(0);

    let value = retry_with_backoff(
        RetryPolicy::default(),
        |d| slept.borrow_mut().push(d),
        |attempt| {
            attempts.set(attempt);
            if attempt < 3 { Err(anyhow!("busy")) } else { Ok(attempt) }
        },
    )
    .unwrap();

    assert_eq!(value, 3);
    assert_eq!(
        slept.into_inner(),
        vec![Duration::from_millis(500), Duration::from_millis(1000)]
    );
}

#[test]
fn retry_gives_up_after_the_last_attempt() {
    let slept = RefCell::new(Vec::new());
    let calls = Cell::new(0);

    let err = retry_with_backoff(
        RetryPolicy::default(),
        |d| slept.borrow_mut().push(d),
        |_| -> Result<()> {
            calls.set(calls.get() + 1);
            Err(anyhow!("still busy"))
        },
    )
    .unwrap_err();

    assert_eq!(calls.get(), 3);
    assert_eq!(slept.borrow().len(), 2);
    let text = format!("{err:#}");
    assert!(text.contains("gave up after 3 attempts"));
    assert!(text.contains("still busy"));
}

#[test]
fn segments_split_known_duration() {
    let segments = plan_segments(Some(25.0), Some(10.0)).unwrap();
    let bounds = segments
        .iter()
        .map(|s| (s.start_secs, s.end_secs))
        .collect::<Vec<_>>();
    assert_eq!(
        bounds,
        vec![(0.0, Some(10.0)), (10.0, Some(20.0)), (20.0, Some(25.0))]
    );

    assert_eq!(plan_segments(None, Some(10.0)).unwrap().len(), 1);
    assert_eq!(plan_segments(Some(8.0), Some(10.0)).unwrap().len(), 1);
    assert_eq!(plan_segments(Some(30.0), Some(10.0)).unwrap().len(), 3);
}

#[test]
fn segment_plan_rejects_tiny_or_too_many_segments() {
    let err = plan_segments(Some(5400.0), Some(1e-6)).unwrap_err();
    assert!(err.to_string().contains("minimum"), "{err}");

    let err = plan_segments(Some(1e18), Some(60.0)).unwrap_err();
    assert!(err.to_string().contains("exceed the limit"), "{err}");

    assert!(plan_segments(Some(f64::INFINITY), Some(60.0)).is_err());
    assert!(plan_segments(Some(90.0), Some(f64::NAN)).is_err());

    let at_limit = plan_segments(Some(MAX_SEGMENTS as f64), Some(1.0)).unwrap();
    assert_eq!(at_limit.len(), MAX_SEGMENTS);
    assert_eq!(at_limit.last().and_then(|s| s.end_secs), Some(MAX_SEGMENTS as f64));
}

#[test]
fn oversized_segment_plan_fails_the_job_before_analysis() {
    let fetcher = BytesFetcher::new(b"abc".to_vec());
    let store = FlakyStore::new(0);
    let analysis = ScriptedAnalysis::ok();
    let sleep = |_: Duration| {};
    let deps = PipelineDeps {
        fetcher: &fetcher,
        store: &store,
        analysis: &analysis,
        sleep: &sleep,
    };
    let mut job = upload_job();
    job.duration_secs = Some(5400.0);
    job.segment_secs = Some(1e-6);

    run_job(&mut job, &deps, &small_config(), |_| {});

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.clone().unwrap_or_default().contains("minimum"));
    assert!(analysis.seen.lock().unwrap().is_empty());
}

#[test]
fn map_bounded_keeps_order_and_caps_workers() {
    let active = AtomicUsize::new(0);
    let peak = AtomicUsize::new(0);
    let items = (0..12).collect::<Vec<usize>>();

    let out = map_bounded(&items, 3, |n| {
        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(5));
        active.fetch_sub(1, Ordering::SeqCst);
        n * 10
    });

    assert_eq!(out, items.iter().map(|n| n * 10).collect::<Vec<_>>());
    assert!(peak.load(Ordering::SeqCst) <= 3);
}

#[test]
fn youtube_links_are_recognised() {
    assert!(VideoSource::parse("https://www.youtube.com/watch?v=abc").is_youtube());
    assert!(VideoSource::parse("https://youtu.be/abc").is_youtube());
    assert!(VideoSource::parse("http://m.youtube.com/watch?v=abc").is_youtube());
    assert!(!VideoSource::parse("https://cdn.example.com/youtube.com.mp4").is_youtube());
    assert!(!VideoSource::parse("/videos/final.mp4").is_youtube());
    assert!(VideoSource::parse("/videos/final.mp4").needs_transfer());
}

#[test]
fn upload_job_runs_to_completion() {
    let fetcher = BytesFetcher::new(b"0123456789".to_vec());
    let store = FlakyStore::new(2);
    let analysis = ScriptedAnalysis::ok();
    let slept = RefCell::new(Vec::new());
    let sleep = |d: Duration| slept.borrow_mut().push(d);
    let deps = PipelineDeps {
        fetcher: &fetcher,
        store: &store,
        analysis: &analysis,
        sleep: &sleep,
    };
    let mut job = upload_job();
    let mut progress = Vec::new();

    run_job(&mut job, &deps, &small_config(), |j| progress.push(j.progress));

    assert_eq!(job.status, JobStatus::Completed, "error: {:?}", job.error);
    assert_eq!(job.progress, 100);
    assert!(job.error.is_none());
    assert!(!job.used_fallback);
    assert_eq!(job.result, Some(json!({ "segment": 0, "events": [] })));
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(progress.first(), Some(&5));
    assert!(progress.contains(&30));
    assert!(progress.contains(&90));
    assert!(progress.contains(&95));
    assert_eq!(progress.last(), Some(&100));

    let stored = store.stored.into_inner();
    assert_eq!(stored.len(), 3);
    assert_eq!(reassemble(stored).unwrap(), b"0123456789".to_vec());
    assert_eq!(
        slept.into_inner(),
        vec![Duration::from_millis(500), Duration::from_millis(1000)]
    );
}

#[test]
fn segmented_results_are_combined() {
    let fetcher = BytesFetcher::new(vec![7; 9]);
    let store = FlakyStore::new(0);
    let analysis = ScriptedAnalysis::ok();
    let sleep = |_: Duration| {};
    let deps = PipelineDeps {
        fetcher: &fetcher,
        store: &store,
        analysis: &analysis,
        sleep: &sleep,
    };
    let mut job = upload_job();
    job.duration_secs = Some(25.0);
    job.segment_secs = Some(10.0);

    run_job(&mut job, &deps, &small_config(), |_| {});

    assert_eq!(job.status, JobStatus::Completed);
    let segments = job.result.as_ref().and_then(|r| r["segments"].as_array().cloned());
    assert_eq!(segments.map(|s| s.len()), Some(3));
    let mut seen = analysis.seen.into_inner().unwrap();
    seen.sort();
    assert_eq!(seen, vec![0, 1, 2]);
}

#[test]
fn exhausted_upload_fails_the_job() {
    let fetcher = BytesFetcher::new(b"0123456789".to_vec());
    let store = FlakyStore::new(usize::MAX);
    let analysis = ScriptedAnalysis::ok();
    let sleep = |_: Duration| {};
    let deps = PipelineDeps {
        fetcher: &fetcher,
        store: &store,
        analysis: &analysis,
        sleep: &sleep,
    };
    let mut job = upload_job();

    run_job(&mut job, &deps, &small_config(), |_| {});

    assert_eq!(job.status, JobStatus::Failed);
    let error = job.error.clone().unwrap_or_default();
    assert!(error.contains("chunk 1/3 upload failed"), "{error}");
    assert!(error.contains("gave up after 3 attempts"), "{error}");
    assert!(job.progress < 30);
    assert!(analysis.seen.lock().unwrap().is_empty());
}

#[test]
fn empty_download_fails_the_job() {
    let fetcher = BytesFetcher::new(Vec::new());
    let store = FlakyStore::new(0);
    let analysis = ScriptedAnalysis::ok();
    let sleep = |_: Duration| {};
    let deps = PipelineDeps {
        fetcher: &fetcher,
        store: &store,
        analysis: &analysis,
        sleep: &sleep,
    };
    let mut job = VideoJob::new("job-2", "m1", VideoSource::parse("https://cdn.example.com/a.mp4"));

    run_job(&mut job, &deps, &small_config(), |_| {});

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some("downloaded video is empty"));
}

#[test]
fn youtube_job_skips_transfer_and_falls_back_once() {
    let fetcher = BytesFetcher::new(b"unused".to_vec());
    let store = FlakyStore::new(0);
    let analysis = ScriptedAnalysis::failing(true);
    let sleep = |_: Duration| {};
    let deps = PipelineDeps {
        fetcher: &fetcher,
        store: &store,
        analysis: &analysis,
        sleep: &sleep,
    };
    let mut job = VideoJob::new("job-3", "m1", VideoSource::parse("https://youtu.be/xyz"));

    run_job(&mut job, &deps, &small_config(), |_| {});

    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.used_fallback);
    assert_eq!(job.result, Some(json!({ "fallback": true })));
    assert_eq!(fetcher.calls.get(), 0);
    assert!(store.stored.borrow().is_empty());
    assert_eq!(analysis.fallback_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn failed_fallback_reports_both_errors() {
    let fetcher = BytesFetcher::new(Vec::new());
    let store = FlakyStore::new(0);
    let analysis = ScriptedAnalysis::failing(false);
    let sleep = |_: Duration| {};
    let deps = PipelineDeps {
        fetcher: &fetcher,
        store: &store,
        analysis: &analysis,
        sleep: &sleep,
    };
    let mut job = VideoJob::new("job-4", "m1", VideoSource::parse("https://www.youtube.com/watch?v=q"));

    run_job(&mut job, &deps, &small_config(), |_| {});

    assert_eq!(job.status, JobStatus::Failed);
    let error = job.error.unwrap_or_default();
    assert!(error.contains("model timed out"), "{error}");
    assert!(error.contains("fallback unavailable"), "{error}");
    assert_eq!(analysis.fallback_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn analysis_failure_without_fallback_fails_upload_job() {
    let fetcher = BytesFetcher::new(b"abc".to_vec());
    let store = FlakyStore::new(0);
    let analysis = ScriptedAnalysis::failing(true);
    let sleep = |_: Duration| {};
    let deps = PipelineDeps {
        fetcher: &fetcher,
        store: &store,
        analysis: &analysis,
        sleep: &sleep,
    };
    let mut job = upload_job();

    run_job(&mut job, &deps, &small_config(), |_| {});

    assert_eq!(job.status, JobStatus::Failed);
    assert!(!job.used_fallback);
    assert_eq!(analysis.fallback_calls.load(Ordering::SeqCst), 0);
    assert!(job.error.unwrap_or_default().contains("segment 0 analysis failed"));
}
