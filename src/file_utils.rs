use anyhow::{Result, Context, anyhow};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::app_config::OutputConfig;

// @module: File and directory utilities

// @struct: File operations utility
pub struct FileManager;

impl FileManager {
    // @checks: File existence
    pub fn file_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().exists() && path.as_ref().is_file()
    }

    // @checks: Directory existence
    pub fn dir_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().exists() && path.as_ref().is_dir()
    }

    // @generates: Output path for a translated subtitle, next to its source
    // @params: source_file, output config, clock reading for the optional suffix
    pub fn output_path_for<P: AsRef<Path>>(source_file: P, output: &OutputConfig, now: DateTime<Local>) -> PathBuf {
        let source_file = source_file.as_ref();
        let dir = source_file.parent().unwrap_or_else(|| Path::new(""));

        let file_name = if output.timestamp_suffix {
            let stem = source_file.file_stem().unwrap_or_default().to_string_lossy();
            format!("{}{}_{}.srt", output.prefix, stem, now.format("%Y%m%d_%H%M%S"))
        } else {
            let name = source_file.file_name().unwrap_or_default().to_string_lossy();
            format!("{}{}", output.prefix, name)
        };

        dir.join(file_name)
    }

    /// Whether the file name carries the output prefix
    pub fn is_output_file<P: AsRef<Path>>(path: P, prefix: &str) -> bool {
        path.as_ref()
            .file_name()
            .map(|name| name.to_string_lossy().starts_with(prefix))
            .unwrap_or(false)
    }

    /// Find `.srt` files in a directory, skipping files that are translation outputs
    pub fn find_srt_files<P: AsRef<Path>>(dir: P, output_prefix: &str) -> Result<Vec<PathBuf>> {
        let mut result = Vec::new();

        for entry in WalkDir::new(dir.as_ref()).follow_links(true).sort_by_file_name() {
            let entry = entry.context("Failed to read directory entry")?;
            let path = entry.path();

            let is_srt = path
                .extension()
                .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case("srt"))
                .unwrap_or(false);
            if path.is_file() && is_srt && !Self::is_output_file(path, output_prefix) {
                result.push(path.to_path_buf());
            }
        }

        Ok(result)
    }

    /// Expand command line inputs: files are kept as given, directories are
    /// replaced by the subtitle files they contain
    pub fn expand_inputs(inputs: &[PathBuf], output_prefix: &str) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for input in inputs {
            if Self::dir_exists(input) {
                files.extend(Self::find_srt_files(input, output_prefix)?);
            } else if Self::file_exists(input) {
                files.push(input.clone());
            } else {
                return Err(anyhow!("Input not found: {}", input.display()));
            }
        }
        Ok(files)
    }
}
