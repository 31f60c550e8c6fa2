use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};

use crate::image_loader::FileImageStore;
use crate::models::Photo;
use crate::scanner::{FileScanner, ScanConfig};
use crate::thumbnails::queue::DEFAULT_WORKERS;
use crate::thumbnails::{ThumbnailCacheManager, ThumbnailQueue, ThumbnailRequest};

/// Requests kept outstanding at once; stays under the queue's capacity.
const IN_FLIGHT_WINDOW: usize = 128;

/// Longest wait for a single result before the run is declared stuck.
const RESULT_TIMEOUT: Duration = Duration::from_secs(60);

pub const USAGE: &str = "Usage: thumbgrid --path <directory> [--runs N] [--cold-cache] \
[--workers N] [--cache-dir DIR] [--memory-mb N] [--disk-budget-mb N] [--thumb-size N]";

#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkArgs {
    pub path: PathBuf,
    pub runs: usize,
    pub cold_cache: bool,
    pub workers: usize,
    pub cache_dir: Option<PathBuf>,
    pub memory_mb: Option<usize>,
    pub disk_budget_mb: Option<u64>,
    pub thumb_size: Option<u32>,
}

#[derive(Debug, Default)]
struct BenchmarkRun {
    run_index: usize,
    elapsed_ms: u128,
    photos: usize,
    loaded: usize,
    failed: usize,
    rejected: usize,
    memory_hits: u64,
    disk_hits: u64,
    decodes: u64,
    coalesced: u64,
    disk_writes: u64,
    end_to_end_avg_ms: f64,
    end_to_end_p95_ms: f64,
    queue_wait_avg_ms: f64,
    work_avg_ms: f64,
    work_p95_ms: f64,
}

/// Parse benchmark flags from the process arguments.
///
/// Returns `None` when no path was given or help was requested.
pub fn maybe_parse_args() -> Result<Option<BenchmarkArgs>> {
    parse_args(env::args().skip(1))
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Option<BenchmarkArgs>> {
    let mut path: Option<PathBuf> = None;
    let mut runs: usize = 1;
    let mut cold_cache = false;
    let mut workers: usize = DEFAULT_WORKERS;
    let mut cache_dir: Option<PathBuf> = None;
    let mut memory_mb: Option<usize> = None;
    let mut disk_budget_mb: Option<u64> = None;
    let mut thumb_size: Option<u32> = None;

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(None),
            "--path" => {
                let value = args.next().context("Missing value for --path")?;
                path = Some(PathBuf::from(value));
            }
            "--runs" => {
                let value = args.next().context("Missing value for --runs")?;
                runs = value
                    .parse::<usize>()
                    .context("Failed to parse --runs as a positive integer")?;
            }
            "--workers" => {
                let value = args.next().context("Missing value for --workers")?;
                workers = value
                    .parse::<usize>()
                    .context("Failed to parse --workers as a positive integer")?;
            }
            "--cache-dir" => {
                let value = args.next().context("Missing value for --cache-dir")?;
                cache_dir = Some(PathBuf::from(value));
            }
            "--memory-mb" => {
                let value = args.next().context("Missing value for --memory-mb")?;
                memory_mb = Some(
                    value
                        .parse::<usize>()
                        .context("Failed to parse --memory-mb as a positive integer")?,
                );
            }
            "--disk-budget-mb" => {
                let value = args.next().context("Missing value for --disk-budget-mb")?;
                disk_budget_mb = Some(
                    value
                        .parse::<u64>()
                        .context("Failed to parse --disk-budget-mb as a positive integer")?,
                );
            }
            "--thumb-size" => {
                let value = args.next().context("Missing value for --thumb-size")?;
                thumb_size = Some(
                    value
                        .parse::<u32>()
                        .context("Failed to parse --thumb-size as a positive integer")?,
                );
            }
            "--cold-cache" => cold_cache = true,
            _ => {
                if path.is_none() && !arg.starts_with('-') {
                    path = Some(PathBuf::from(arg));
                } else {
                    bail!("Unknown argument: {}", arg);
                }
            }
        }
    }

    let Some(path) = path else {
        return Ok(None);
    };
    if runs == 0 {
        bail!("--runs must be greater than 0");
    }
    if workers == 0 {
        bail!("--workers must be greater than 0");
    }
    if thumb_size == Some(0) {
        bail!("--thumb-size must be greater than 0");
    }

    Ok(Some(BenchmarkArgs {
        path,
        runs,
        cold_cache,
        workers,
        cache_dir,
        memory_mb,
        disk_budget_mb,
        thumb_size,
    }))
}

/// Scan the directory and push every photo through the thumbnail queue once
/// per run, reporting which tier served each request.
pub fn run_benchmark(args: BenchmarkArgs) -> Result<i32> {
    if !args.path.is_dir() {
        bail!("Benchmark path is not a directory: {}", args.path.display());
    }

    println!("phase=scan start path={}", args.path.display());
    let (photos, scan_result) = FileScanner::with_config(ScanConfig::default())
        .scan(&args.path)
        .context("Scan failed")?;
    println!(
        "phase=scan done total={} unreadable={} ms={}",
        scan_result.total_files, scan_result.broken_files, scan_result.elapsed_ms
    );

    let mut builder = ThumbnailCacheManager::builder();
    if let Some(dir) = &args.cache_dir {
        builder = builder.cache_dir(dir);
    }
    if let Some(mb) = args.memory_mb {
        builder = builder.max_memory_mb(mb);
    }
    if let Some(mb) = args.disk_budget_mb {
        builder = builder.disk_budget_mb(mb);
    }
    if let Some(size) = args.thumb_size {
        builder = builder.thumb_size(size);
    }
    let cache = builder
        .build(Arc::new(FileImageStore::new()))
        .context("Failed to set up thumbnail cache")?;
    println!(
        "cache dir={} memory_budget_bytes={} thumb_size={}",
        cache.cache_dir().display(),
        cache.max_memory(),
        cache.thumb_size()
    );

    let queue = ThumbnailQueue::new(args.workers, cache.clone())?;
    let mut runs = Vec::with_capacity(args.runs);

    for run_index in 0..args.runs {
        let run_number = run_index + 1;
        println!("run={} phase=begin", run_number);

        if args.cold_cache {
            cache.clear_all().context("Failed to clear thumbnail cache")?;
        }

        let run = run_thumbnail_pass(&queue, &photos, run_number)?;
        println!(
            "run={} phase=thumbnails done loaded={} failed={} memory_hits={} disk_hits={} decodes={} coalesced={} ms={}",
            run_number,
            run.loaded,
            run.failed,
            run.memory_hits,
            run.disk_hits,
            run.decodes,
            run.coalesced,
            run.elapsed_ms
        );
        runs.push(run);
    }

    // Let pending disk writes land before reporting.
    cache.flush();

    let elapsed: Vec<f64> = runs.iter().map(|r| r.elapsed_ms as f64).collect();
    println!(
        "runs={} avg_ms={:.2} min_ms={:.0} max_ms={:.0} memory_usage_bytes={} memory_entries={}",
        runs.len(),
        average(&elapsed),
        elapsed.iter().copied().fold(f64::INFINITY, f64::min),
        elapsed.iter().copied().fold(0.0, f64::max),
        cache.memory_usage(),
        cache.memory_entry_count()
    );

    for run in &runs {
        println!(
            "run={} elapsed_ms={} photos={} thumbs(loaded/failed/rejected)={}/{}/{} tiers(memory/disk/decode/coalesced/written)={}/{}/{}/{}/{} e2e_avg_ms={:.2} e2e_p95_ms={:.2} wait_avg_ms={:.2} work_avg_ms={:.2} work_p95_ms={:.2}",
            run.run_index,
            run.elapsed_ms,
            run.photos,
            run.loaded,
            run.failed,
            run.rejected,
            run.memory_hits,
            run.disk_hits,
            run.decodes,
            run.coalesced,
            run.disk_writes,
            run.end_to_end_avg_ms,
            run.end_to_end_p95_ms,
            run.queue_wait_avg_ms,
            run.work_avg_ms,
            run.work_p95_ms
        );
    }

    let failed = runs.iter().any(|r| r.failed > 0);
    Ok(if failed { 1 } else { 0 })
}

fn run_thumbnail_pass(
    queue: &ThumbnailQueue,
    photos: &[Photo],
    run_number: usize,
) -> Result<BenchmarkRun> {
    println!("run={} phase=thumbnails start photos={}", run_number, photos.len());

    let stats_before = queue.cache().stats();
    let start = Instant::now();

    let mut run = BenchmarkRun {
        run_index: run_number,
        photos: photos.len(),
        ..Default::default()
    };
    let mut outstanding = 0usize;
    let mut end_to_end = Vec::with_capacity(photos.len());
    let mut waits = Vec::with_capacity(photos.len());
    let mut work = Vec::with_capacity(photos.len());

    let mut record = |run: &mut BenchmarkRun| -> Result<()> {
        let result = queue
            .recv_timeout(RESULT_TIMEOUT)
            .context("Timed out waiting for a thumbnail")?;
        let wait_ms = result.queue_wait.as_secs_f64() * 1000.0;
        let work_ms = result.work_time.as_secs_f64() * 1000.0;
        waits.push(wait_ms);
        work.push(work_ms);
        end_to_end.push(wait_ms + work_ms);
        match &result.outcome {
            Ok(_) => run.loaded += 1,
            Err(e) => {
                run.failed += 1;
                println!("run={} thumbnail_error key={} error={}", run_number, result.key, e);
            }
        }
        Ok(())
    };

    for photo in photos {
        if outstanding >= IN_FLIGHT_WINDOW {
            record(&mut run)?;
            outstanding -= 1;
        }
        if queue.request(ThumbnailRequest::from(photo)) {
            outstanding += 1;
        } else {
            run.rejected += 1;
        }
    }
    while outstanding > 0 {
        record(&mut run)?;
        outstanding -= 1;
    }

    run.elapsed_ms = start.elapsed().as_millis();

    let delta = queue.cache().stats().since(&stats_before);
    run.memory_hits = delta.memory_hits;
    run.disk_hits = delta.disk_hits;
    run.decodes = delta.decodes;
    run.coalesced = delta.coalesced;
    run.disk_writes = delta.disk_writes;
    run.end_to_end_avg_ms = average(&end_to_end);
    run.end_to_end_p95_ms = percentile_ms(&end_to_end, 0.95);
    run.queue_wait_avg_ms = average(&waits);
    run.work_avg_ms = average(&work);
    run.work_p95_ms = percentile_ms(&work, 0.95);

    Ok(run)
}

fn average(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn percentile_ms(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let clamped = p.clamp(0.0, 1.0);
    let idx = ((sorted.len() - 1) as f64 * clamped).round() as usize;
    sorted[idx]
}
