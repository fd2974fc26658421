use crate::common::Result;
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default size of one page (batch) in bytes.
pub const RUSTY_QP_PAGE_SIZE_BYTES: usize = 4096;

/// Default number of pages an operator may hold when a plan doesn't say.
pub const RUSTY_QP_DEFAULT_BUFFERS: usize = 16;

/// Environment variable prefix, e.g. `RUSTYQP_PAGE_SIZE_BYTES=512`.
pub const RUSTY_QP_ENV_PREFIX: &str = "RUSTYQP";

/// Settings file looked up (optionally) by `Settings::global`.
pub const RUSTY_QP_SETTINGS_FILE: &str = "rustyqp";

static GLOBAL: Lazy<Settings> = Lazy::new(|| {
    Settings::load(Some(Path::new(RUSTY_QP_SETTINGS_FILE))).unwrap_or_else(|err| {
        log::warn!("falling back to default settings: {err}");
        Settings::default()
    })
});

/// Execution settings shared by the operators of one query.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Settings {
    /// Bytes per page; together with a schema's tuple size this fixes how many
    /// tuples fit in one batch.
    pub page_size_bytes: usize,
    /// Directory in which operators create their temp files.
    pub spill_dir: PathBuf,
    /// Buffer budget used by plans that don't specify one.
    pub default_buffers: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            page_size_bytes: RUSTY_QP_PAGE_SIZE_BYTES,
            spill_dir: std::env::temp_dir(),
            default_buffers: RUSTY_QP_DEFAULT_BUFFERS,
        }
    }
}

impl Settings {
    /// Loads settings from built-in defaults, then the optional settings file,
    /// then `RUSTYQP_*` environment variables.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let defaults = Settings::default();
        let mut builder = config::Config::builder()
            .set_default("page_size_bytes", defaults.page_size_bytes as u64)?
            .set_default(
                "spill_dir",
                defaults.spill_dir.to_string_lossy().into_owned(),
            )?
            .set_default("default_buffers", defaults.default_buffers as u64)?;
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let settings: Settings = builder
            .add_source(config::Environment::with_prefix(RUSTY_QP_ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// The process-wide settings, loaded once on first use.
    pub fn global() -> &'static Settings {
        &GLOBAL
    }

    /// Settings with the given page size, spilling into `spill_dir`.
    pub fn with_page_size(page_size_bytes: usize, spill_dir: impl Into<PathBuf>) -> Self {
        Self {
            page_size_bytes,
            spill_dir: spill_dir.into(),
            ..Settings::default()
        }
    }

    fn validate(&self) -> Result<()> {
        if self.page_size_bytes == 0 {
            return crate::errinput!("page_size_bytes must be positive");
        }
        if self.default_buffers < 3 {
            return crate::errinput!(
                "default_buffers must be at least 3, got {}",
                self.default_buffers
            );
        }
        Ok(())
    }
}
