use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Mealworm Monitor: upload rearing footage and review per-video analysis results.
#[derive(Parser, Debug, Clone)]
#[command(name = "mealworm-monitor", version)]
pub struct CliArgs {
    /// Base URL of the analysis server (client commands)
    #[arg(long = "server", env = "MEALWORM_SERVER", global = true)]
    pub server: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP server and the background analysis worker
    Serve(ServeArgs),

    /// Show aggregate statistics and the recent video list
    Dashboard {
        /// Render once and exit instead of starting an interactive session
        #[arg(long = "once")]
        once: bool,
    },

    /// Upload a video and open its analysis page
    Upload {
        /// Video file to upload
        file: Option<PathBuf>,

        /// Farm (rearing enclosure) identifier
        #[arg(short = 'f', long = "farm-id")]
        farm_id: Option<String>,

        /// Show the new video's analysis page once and exit
        #[arg(long = "once")]
        once: bool,
    },

    /// Show the analysis detail page of one video
    Show {
        video_id: Option<String>,

        #[arg(long = "once")]
        once: bool,
    },

    /// Delete a video and its analysis results
    Delete {
        video_id: String,

        /// Skip the confirmation prompt
        #[arg(short = 'y', long = "yes")]
        yes: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// HTTP port
    #[arg(long = "port", default_value_t = DEFAULT_SERVER_PORT)]
    pub port: u16,

    /// Directory holding the database, uploads and keyframe images
    #[arg(long = "data-dir", default_value = "data")]
    pub data_dir: PathBuf,

    /// External analysis program (receives --video-id, --video, --keyframe-dir)
    #[arg(long = "analyzer-cmd")]
    pub analyzer_cmd: Option<PathBuf>,

    /// Extra leading argument for the analysis program (repeatable)
    #[arg(long = "analyzer-arg", allow_hyphen_values = true)]
    pub analyzer_args: Vec<String>,

    /// Seconds before a running analysis is killed
    #[arg(long = "analysis-timeout-secs", default_value_t = ANALYSIS_TIMEOUT_SECS)]
    pub analysis_timeout_secs: u64,

    /// Maximum upload size in megabytes
    #[arg(long = "max-upload-mb", default_value_t = DEFAULT_MAX_UPLOAD_MB)]
    pub max_upload_mb: usize,

    /// Write a daily-rolling log file into this directory
    #[arg(long = "log-dir")]
    pub log_dir: Option<PathBuf>,
}

pub struct ServerConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub analyzer_cmd: Option<PathBuf>,
    pub analyzer_args: Vec<String>,
    pub analysis_timeout_secs: u64,
    pub max_upload_bytes: usize,
}

// Port constants
pub const DEFAULT_SERVER_PORT: u16 = 5000;
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5000";

// Listing constants
pub const VIDEO_LIST_LIMIT: usize = 50;
pub const DASHBOARD_RECENT_LIMIT: usize = 10;

// Upload constants
pub const DEFAULT_MAX_UPLOAD_MB: usize = 2048;
pub const DEFAULT_VIDEO_EXTENSION: &str = ".mp4";

// Analysis constants
pub const ANALYSIS_TIMEOUT_SECS: u64 = 1800;
pub const ANALYSIS_QUEUE_CAPACITY: usize = 256;

// Client constants
pub const CLIENT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const PROGRESS_BAR_WIDTH: usize = 20;
pub const PLACEHOLDER: &str = "-";

// Paths under the data directory
pub const DATABASE_FILE: &str = "videos.db";
pub const UPLOADS_DIR: &str = "uploads";
pub const KEYFRAMES_DIR: &str = "keyframes";
pub const STATIC_PREFIX: &str = "/static";

impl ServerConfig {
    pub fn from_args(args: ServeArgs) -> Self {
        ServerConfig {
            port: args.port,
            data_dir: args.data_dir,
            analyzer_cmd: args.analyzer_cmd,
            analyzer_args: args.analyzer_args,
            analysis_timeout_secs: args.analysis_timeout_secs,
            max_upload_bytes: args.max_upload_mb.saturating_mul(1024 * 1024),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }

    /// Directory where uploaded videos are stored under generated names.
    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join(UPLOADS_DIR)
    }

    /// Directory the analyzer writes annotated keyframe images into.
    pub fn keyframes_dir(&self) -> PathBuf {
        self.data_dir.join(KEYFRAMES_DIR)
    }
}
