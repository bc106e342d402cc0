use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Defaults and binary locations the export pipeline consults when a
/// request doesn't override them.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Directory new job output files are reserved under.
    pub output_dir: String,
    /// Override for the headless Chromium binary; `None` lets chromiumoxide
    /// discover it.
    pub chrome_executable_path: Option<String>,
    /// The external video encoder binary (`ffmpeg` by default).
    pub ffmpeg_path: String,
    /// How long a completed job's artifact stays downloadable.
    pub job_ttl_secs: i64,
    /// Verbose MP4 capture diagnostics to stderr (spec.md §6 "Environment").
    pub debug: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: "exports".into(),
            chrome_executable_path: None,
            ffmpeg_path: "ffmpeg".into(),
            job_ttl_secs: 600,
            debug: false,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(
                config::Environment::with_prefix("SLIDE_EXPORT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
