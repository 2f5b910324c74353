//! Configuration for the `tracetree` tool.
//!
//! The config is a KDL document declaring the traces of a view and where the view's session
//! (grouping and order) is persisted:
//!
//! ```kdl
//! session-file "~/.local/state/tracetree/session.json"
//! default-height 20
//! trace "CLK" { height 24; }
//! trace "D0"
//! trace "D1" { off; }
//! ```

#[macro_use]
extern crate tracing;

use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use miette::{miette, Context, IntoDiagnostic};

/// Row height used for traces that don't specify one.
pub const DEFAULT_TRACE_HEIGHT: u16 = 20;

#[derive(knuffel::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Config {
    #[knuffel(child, unwrap(argument))]
    pub session_file: Option<String>,
    #[knuffel(child, unwrap(argument), default = Self::default().default_height)]
    pub default_height: u16,
    #[knuffel(children(name = "trace"))]
    pub traces: Vec<TraceDecl>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session_file: None,
            default_height: DEFAULT_TRACE_HEIGHT,
            traces: Vec::new(),
        }
    }
}

#[derive(knuffel::Decode, Debug, Clone, PartialEq, Eq)]
pub struct TraceDecl {
    #[knuffel(argument)]
    pub name: String,
    #[knuffel(child, unwrap(argument))]
    pub height: Option<u16>,
    #[knuffel(child)]
    pub off: bool,
}

impl TraceDecl {
    pub fn height_or(&self, default: u16) -> u16 {
        self.height.unwrap_or(default)
    }
}

impl Config {
    /// Loads and validates the config at `path`.
    pub fn load(path: &Path) -> miette::Result<Self> {
        Self::load_internal(path).context("error loading config")
    }

    fn load_internal(path: &Path) -> miette::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .into_diagnostic()
            .with_context(|| format!("error reading {path:?}"))?;

        let config = Self::parse(
            path.file_name()
                .and_then(OsStr::to_str)
                .unwrap_or("config.kdl"),
            &contents,
        )
        .context("error parsing")?;
        config.validate()?;

        debug!("loaded config from {path:?}");
        Ok(config)
    }

    pub fn parse(filename: &str, text: &str) -> Result<Self, knuffel::Error> {
        knuffel::parse(filename, text)
    }

    /// Loads the config from the default location, falling back to an empty config when the
    /// file doesn't exist.
    pub fn load_default() -> miette::Result<Self> {
        let Some(path) = Self::default_path() else {
            debug!("no config directory available, using the default config");
            return Ok(Self::default());
        };

        if !path.exists() {
            debug!("{path:?} doesn't exist, using the default config");
            return Ok(Self::default());
        }

        Self::load(&path)
    }

    pub fn default_path() -> Option<PathBuf> {
        let dirs = directories::ProjectDirs::from("", "", "tracetree")?;
        Some(dirs.config_dir().join("config.kdl"))
    }

    /// Trace names key the persisted session, so they must be unique.
    pub fn validate(&self) -> miette::Result<()> {
        let mut seen = HashSet::new();
        for trace in &self.traces {
            if trace.name.is_empty() {
                return Err(miette!("trace names must not be empty"));
            }
            if !seen.insert(trace.name.as_str()) {
                return Err(miette!("duplicate trace name {:?}", trace.name));
            }
        }
        Ok(())
    }
}
