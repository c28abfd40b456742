use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "zimu")]
#[command(
    author,
    version,
    about = "Segment-by-segment video transcription with pinyin and translations"
)]
#[command(
    long_about = "Cut a video into fixed windows, transcribe each window with a multimodal model, and merge the results into one ordered, deduplicated subtitle track"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the chunk transcription HTTP server
    Serve {
        /// Address to bind (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to bind (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Transcribe a whole video segment by segment
    Transcribe {
        /// Video URL
        url: String,
        /// Video duration in seconds
        #[arg(short, long)]
        duration: f64,
        /// Segment length in seconds
        #[arg(long)]
        chunk_seconds: Option<f64>,
        /// Frames per second sampled by the model
        #[arg(long)]
        fps: Option<f64>,
        /// Segments fetched at once
        #[arg(short, long)]
        concurrency: Option<usize>,
        /// Ignore stored and cached results
        #[arg(long)]
        force: bool,
        /// Call the model in-process instead of going through a server
        #[arg(long)]
        local: bool,
        /// Print the transcript as JSON
        #[arg(long)]
        json: bool,
    },

    /// Transcribe a single window of a video
    Segment {
        /// Video URL
        url: String,
        /// Window start in seconds
        #[arg(short, long, default_value = "0")]
        start: f64,
        /// Window end in seconds
        #[arg(short, long)]
        end: f64,
        #[arg(long)]
        fps: Option<f64>,
        #[arg(long)]
        force: bool,
        #[arg(long)]
        local: bool,
        #[arg(long)]
        json: bool,
    },

    /// Ask the server whether a window is already cached
    Status {
        /// Video URL
        url: String,
        #[arg(short, long, default_value = "0")]
        start: f64,
        #[arg(short, long)]
        end: f64,
        #[arg(long)]
        fps: Option<f64>,
    },

    /// Stored transcript management
    Cache {
        #[command(subcommand)]
        action: CacheCommands,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// List stored transcripts
    List,
    /// Delete stored transcripts
    Clear {
        /// Only delete transcripts of this video (URL or ID)
        #[arg(long)]
        video: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Print config file path
    Path,
    /// Initialize default configuration
    Init,
}
