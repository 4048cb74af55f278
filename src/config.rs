//! Settings read from an optional TOML file and `POPOLO_*` environment
//! variables, e.g. `POPOLO_STORE__PATH=popolo.db` or
//! `POPOLO_RECONCILE__OVERLAP=reject`.
//!
//! ```toml
//! [store]
//! mode = "file"
//! path = "popolo.db"
//!
//! [reconcile]
//! overlap = "merge"
//!
//! [classification]
//! multi_valued_schemes = ["LABEL"]
//!
//! [log]
//! filter = "popolo=debug"
//! ```

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use crate::error::{PopoloError, Result};
use crate::persist::PersistenceMode;
use crate::reconcile::OverlapPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub store: StoreSettings,
    pub reconcile: ReconcileSettings,
    #[serde(default)]
    pub classification: ClassificationSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    pub mode: String,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconcileSettings {
    pub overlap: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClassificationSettings {
    #[serde(default)]
    pub multi_valued_schemes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    pub filter: String,
}

impl Settings {
    /// Defaults, overridden by the file at `path` (when given), overridden by
    /// the environment.
    pub fn load(path: Option<&str>) -> Result<Settings> {
        let mut builder = Config::builder()
            .set_default("store.mode", "memory")?
            .set_default("reconcile.overlap", "merge")?
            .set_default("log.filter", "info")?;
        if let Some(path) = path {
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }
        builder = builder.add_source(
            Environment::with_prefix("POPOLO")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("classification.multi_valued_schemes")
                .try_parsing(true),
        );
        Ok(builder.build()?.try_deserialize()?)
    }
    pub fn persistence_mode(&self) -> Result<PersistenceMode> {
        match (self.store.mode.trim().to_lowercase().as_str(), &self.store.path) {
            ("memory", _) => Ok(PersistenceMode::InMemory),
            ("file", Some(path)) if !path.trim().is_empty() => Ok(PersistenceMode::File(path.clone())),
            ("file", _) => Err(PopoloError::Config("store.path is required in file mode".to_string())),
            (other, _) => Err(PopoloError::Config(format!(
                "unknown store mode '{}', expected memory or file",
                other
            ))),
        }
    }
    pub fn overlap_policy(&self) -> Result<OverlapPolicy> {
        self.reconcile.overlap.parse()
    }
}

/// Installs a formatting subscriber. `RUST_LOG` takes precedence over
/// `filter`; calling this more than once keeps the first subscriber.
pub fn init_tracing(filter: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let _ = tracing_subscriber::fmt().with_env_filter(env_filter).try_init();
}
