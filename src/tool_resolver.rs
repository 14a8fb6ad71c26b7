//! # Tool Path Resolver
//!
//! This module handles finding the external compressor in different environments:
//! - Bundled next to the project (configured relative path, e.g. `tools/pngquant`)
//! - A tools directory supplied through the `TOOLS_DIR` environment variable
//! - System-installed tools on `PATH`

use crate::error::OptimizationError;
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Anything that can yield the path of an executable compressor
pub trait ToolLocator {
    fn locate(&self) -> Result<PathBuf, OptimizationError>;
}

impl<F> ToolLocator for F
where
    F: Fn() -> Result<PathBuf, OptimizationError>,
{
    fn locate(&self) -> Result<PathBuf, OptimizationError> {
        self()
    }
}

/// Tool path resolver: configured relative path first, then the environment
#[derive(Debug, Clone)]
pub struct ToolPathResolver {
    /// Bare tool name used for `TOOLS_DIR` and `PATH` lookups
    tool_name: String,
    /// Configured location, relative to `base_dir` unless absolute
    relative_path: PathBuf,
    /// Directory the relative path is resolved against
    base_dir: PathBuf,
}

impl ToolPathResolver {
    /// Resolver for `pngquant` with the default bundled location under the current directory
    pub fn new() -> Self {
        let base_dir = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::with_paths("pngquant", Self::default_relative_path("pngquant"), base_dir)
    }

    pub fn with_paths(
        tool_name: impl Into<String>,
        relative_path: impl Into<PathBuf>,
        base_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            relative_path: relative_path.into(),
            base_dir: base_dir.into(),
        }
    }

    /// Override the configured relative path
    pub fn with_relative_path(mut self, relative_path: impl Into<PathBuf>) -> Self {
        self.relative_path = relative_path.into();
        self
    }

    /// `tools/<name>` plus the platform executable suffix
    pub fn default_relative_path(tool_name: &str) -> PathBuf {
        Path::new("tools").join(format!("{}{}", tool_name, env::consts::EXE_SUFFIX))
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    fn configured_path(&self) -> PathBuf {
        if self.relative_path.is_absolute() {
            self.relative_path.clone()
        } else {
            self.base_dir.join(&self.relative_path)
        }
    }

    fn tools_dir_path(&self) -> Option<PathBuf> {
        let tools_dir = env::var_os("TOOLS_DIR")?;
        Some(PathBuf::from(tools_dir).join(format!("{}{}", self.tool_name, env::consts::EXE_SUFFIX)))
    }
}

impl Default for ToolPathResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolLocator for ToolPathResolver {
    fn locate(&self) -> Result<PathBuf, OptimizationError> {
        let mut searched = Vec::new();

        // Strategy 1: configured path (bundled tool)
        let configured = self.configured_path();
        debug!("Checking configured tool path: {:?}", configured);
        if configured.is_file() {
            debug!("Using configured tool: {} -> {:?}", self.tool_name, configured);
            return Ok(configured);
        }
        searched.push(configured);

        // Strategy 2: TOOLS_DIR environment variable (direct override)
        if let Some(tools_dir_path) = self.tools_dir_path() {
            debug!("Checking TOOLS_DIR tool path: {:?}", tools_dir_path);
            if tools_dir_path.is_file() {
                debug!("Using tool from TOOLS_DIR: {} -> {:?}", self.tool_name, tools_dir_path);
                return Ok(tools_dir_path);
            }
            searched.push(tools_dir_path);
        }

        // Strategy 3: system PATH
        match which::which(&self.tool_name) {
            Ok(system_path) => {
                debug!("Using system tool: {} -> {:?}", self.tool_name, system_path);
                Ok(system_path)
            }
            Err(e) => {
                debug!("PATH lookup for {} failed: {}", self.tool_name, e);
                searched.push(PathBuf::from(format!("$PATH/{}", self.tool_name)));
                warn!("Tool not found: {}", self.tool_name);
                Err(OptimizationError::ToolNotFound {
                    tool: self.tool_name.clone(),
                    searched,
                })
            }
        }
    }
}
