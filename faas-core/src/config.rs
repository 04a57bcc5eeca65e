use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Pipeline configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Hard ceiling on uploaded archive size, in bytes.
    pub max_upload_size: u64,
    /// Deadline for a single image build.
    pub build_timeout: Duration,
    /// Deadline for a single container run.
    pub run_timeout: Duration,
    /// Prefix for generated image tags.
    pub image_prefix: String,
    /// Base directory for per-submission working directories; `None`
    /// means the system temp directory.
    pub temp_dir: Option<PathBuf>,
    /// Directory holding per-language build recipe templates.
    pub template_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_upload_size: 10 * 1024 * 1024,
            build_timeout: Duration::from_secs(120),
            run_timeout: Duration::from_secs(30),
            image_prefix: "faas".to_string(),
            temp_dir: None,
            template_dir: PathBuf::from("templates"),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Config::default();
        Self {
            max_upload_size: env_parsed("FAAS_MAX_UPLOAD_SIZE", defaults.max_upload_size),
            build_timeout: Duration::from_secs(env_parsed(
                "FAAS_BUILD_TIMEOUT_SECS",
                defaults.build_timeout.as_secs(),
            )),
            run_timeout: Duration::from_secs(env_parsed(
                "FAAS_RUN_TIMEOUT_SECS",
                defaults.run_timeout.as_secs(),
            )),
            image_prefix: env::var("FAAS_IMAGE_PREFIX").unwrap_or(defaults.image_prefix),
            temp_dir: env::var("FAAS_TEMP_DIR").ok().map(PathBuf::from),
            template_dir: env::var("FAAS_TEMPLATE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.template_dir),
        }
    }
}

fn env_parsed<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
