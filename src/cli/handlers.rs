use crate::cli::commands::*;
use crate::client::{ChunkSource, HttpChunkSource, LocalChunkSource, Scheduler, SchedulerOptions};
use crate::config::{self, ZimuConfig};
use crate::error::Result;
use crate::server::{self, ChunkRequest};
use crate::storage::DurableCache;
use crate::time::format_clock;
use crate::transcript::TranscriptLine;
use crate::video::extract_video_id;
use std::io::Write;
use std::sync::Arc;

pub async fn handle_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Serve { host, port } => handle_serve(host, port).await,
        Commands::Transcribe {
            url,
            duration,
            chunk_seconds,
            fps,
            concurrency,
            force,
            local,
            json,
        } => {
            let overrides = RunOverrides {
                chunk_seconds,
                fps,
                concurrency,
                force,
            };
            handle_transcribe(&url, duration, overrides, local, json).await
        }
        Commands::Segment {
            url,
            start,
            end,
            fps,
            force,
            local,
            json,
        } => handle_segment(&url, start, end, fps, force, local, json).await,
        Commands::Status {
            url,
            start,
            end,
            fps,
        } => handle_status(&url, start, end, fps).await,
        Commands::Cache { action } => handle_cache(action).await,
        Commands::Config { action } => handle_config(action).await,
    }
}

struct RunOverrides {
    chunk_seconds: Option<f64>,
    fps: Option<f64>,
    concurrency: Option<usize>,
    force: bool,
}

async fn handle_serve(host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut cfg = config::loader::load_config_with_env()?;
    if let Some(host) = host {
        cfg.server.host = host;
    }
    if let Some(port) = port {
        cfg.server.port = port;
    }
    server::run_server(&cfg).await
}

fn chunk_source(cfg: &ZimuConfig, local: bool) -> Result<Arc<dyn ChunkSource>> {
    if local {
        let orchestrator = server::build_orchestrator(cfg)?;
        Ok(Arc::new(LocalChunkSource::new(orchestrator)))
    } else {
        Ok(Arc::new(HttpChunkSource::from_config(&cfg.scheduler)?))
    }
}

fn open_durable_cache(cfg: &ZimuConfig) -> Result<DurableCache> {
    let path = config::loader::database_path(cfg)?;
    Ok(DurableCache::open(path))
}

async fn handle_transcribe(
    url: &str,
    duration: f64,
    overrides: RunOverrides,
    local: bool,
    json: bool,
) -> Result<()> {
    let cfg = config::loader::load_config_with_env()?;

    let mut options = SchedulerOptions::from(&cfg.scheduler);
    if let Some(chunk_seconds) = overrides.chunk_seconds {
        options.chunk_seconds = chunk_seconds;
    }
    if let Some(fps) = overrides.fps {
        options.fps = fps;
    }
    if let Some(concurrency) = overrides.concurrency {
        options.concurrency = concurrency.max(1);
    }
    options.force = overrides.force;

    let source = chunk_source(&cfg, local)?;
    let cache = Arc::new(open_durable_cache(&cfg)?);
    let scheduler = Arc::new(Scheduler::new(source, cache, options));

    let mut updates = scheduler.subscribe();
    let progress = tokio::spawn(async move {
        let mut last_settled = 0;
        while updates.changed().await.is_ok() {
            let state = updates.borrow_and_update().clone();
            let settled = state.segments.iter().filter(|s| s.status.is_settled()).count();
            if settled != last_settled && !state.segments.is_empty() {
                last_settled = settled;
                eprint!(
                    "\r{}/{} segments ({:.0}%), {} lines",
                    settled,
                    state.segments.len(),
                    state.progress(),
                    state.lines.len()
                );
                let _ = std::io::stderr().flush();
            }
        }
    });

    let interrupt = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nStopping after in-flight segments finish...");
                scheduler.abort();
            }
        })
    };

    let report = scheduler.run(url, duration).await;
    interrupt.abort();
    progress.abort();
    eprintln!();
    let report = report?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report.lines)?);
    } else {
        print_lines(&report.lines);
    }

    if report.from_cache {
        eprintln!("Loaded {} lines from stored transcript", report.lines.len());
    }
    for error in &report.errors {
        eprintln!("Segment {} failed: {}", error.index, error.message);
    }
    if report.aborted {
        eprintln!("Aborted by user; transcript not stored.");
    }

    Ok(())
}

async fn handle_segment(
    url: &str,
    start: f64,
    end: f64,
    fps: Option<f64>,
    force: bool,
    local: bool,
    json: bool,
) -> Result<()> {
    let cfg = config::loader::load_config_with_env()?;
    let source = chunk_source(&cfg, local)?;

    let request =
        ChunkRequest::new(url, start, end, fps.unwrap_or(cfg.scheduler.fps)).forced(force);
    let response = source.fetch(&request).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        println!(
            "{} [{} - {}] cached: {}",
            response.video_id,
            format_clock(response.start_sec),
            format_clock(response.end_sec),
            response.cached
        );
        print_lines(&response.lines);
    }
    Ok(())
}

async fn handle_status(url: &str, start: f64, end: f64, fps: Option<f64>) -> Result<()> {
    let cfg = config::loader::load_config_with_env()?;
    let source = HttpChunkSource::from_config(&cfg.scheduler)?;

    let request = ChunkRequest::new(url, start, end, fps.unwrap_or(cfg.scheduler.fps));
    let status = source.status(&request).await?;

    println!("Video:  {}", status.video_id);
    println!(
        "Window: {} - {}",
        format_clock(status.start_sec),
        format_clock(status.end_sec)
    );
    match status.lines {
        Some(lines) => println!("Cached: yes ({} lines)", lines.len()),
        None => println!("Cached: no"),
    }
    Ok(())
}

async fn handle_cache(action: CacheCommands) -> Result<()> {
    let cfg = config::loader::load_config_with_env()?;
    let db_path = config::loader::database_path(&cfg)?;

    if !db_path.exists() {
        println!("No stored transcripts yet.");
        return Ok(());
    }

    let cache = DurableCache::open(&db_path);

    match action {
        CacheCommands::List => {
            let entries = cache.list()?;
            if entries.is_empty() {
                println!("No stored transcripts yet.");
                return Ok(());
            }

            println!(
                "{:<16} {:>6} {:>8} {:>7}  {:<25}",
                "Video", "FPS", "Chunk", "Lines", "Updated"
            );
            println!("{}", "-".repeat(68));

            for entry in entries {
                println!(
                    "{:<16} {:>6} {:>7}s {:>7}  {:<25}",
                    truncate(&entry.video_id, 16),
                    entry.fps,
                    entry.chunk_seconds,
                    entry.subtitles.len(),
                    entry.updated_at.format("%Y-%m-%d %H:%M:%S").to_string()
                );
            }
        }
        CacheCommands::Clear { video } => {
            let deleted = match video {
                Some(video) => cache.delete_video(&extract_video_id(&video))?,
                None => cache.clear()?,
            };
            println!("Deleted {} stored transcript(s)", deleted);
        }
    }
    Ok(())
}

async fn handle_config(action: ConfigCommands) -> Result<()> {
    match action {
        ConfigCommands::Show => {
            let cfg = config::loader::load_config()?;
            println!("{}", toml::to_string_pretty(&cfg)?);
        }
        ConfigCommands::Path => {
            println!("{}", config::loader::config_path()?.display());
        }
        ConfigCommands::Init => {
            let cfg = config::loader::load_config()?;
            std::fs::create_dir_all(config::loader::data_dir()?)?;
            println!(
                "Configuration initialized at: {}",
                config::loader::config_path()?.display()
            );
            println!("\nDefault settings:");
            println!("  Model: {} ({})", cfg.model.model, cfg.model.provider);
            println!("  Server: {}:{}", cfg.server.host, cfg.server.port);
            println!(
                "  Segments: {}s at {} fps, {} at a time",
                cfg.scheduler.chunk_seconds, cfg.scheduler.fps, cfg.scheduler.concurrency
            );
            if cfg.model.api_key.is_none() {
                println!("\nSet GEMINI_API_KEY or model.api_key before running the server.");
            }
        }
    }
    Ok(())
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

fn print_lines(lines: &[TranscriptLine]) {
    for line in lines {
        println!(
            "[{} --> {}] {}",
            format_clock(line.start_secs()),
            format_clock(line.end_secs()),
            line.transcription
        );
        if !line.pinyin.is_empty() {
            println!("    {}", line.pinyin);
        }
        if !line.meaning.is_empty() {
            println!("    {}", line.meaning);
        }
    }
}
