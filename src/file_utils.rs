use anyhow::{Context, Result, anyhow};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// @module: File and directory utilities

/// Extension of OCR dump files
pub const DUMP_EXTENSION: &str = "json";

/// Suffix of files written by the plan compositor, never treated as input
const RENDER_SUFFIX: &str = ".render.json";

// @struct: File operations utility
pub struct FileManager;

impl FileManager {
    // @creates: Directory and parents if needed
    pub fn ensure_dir<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            fs::create_dir_all(path).with_context(|| format!("Failed to create directory: {:?}", path))?;
        }
        Ok(())
    }

    /// Find files with a specific extension in a directory, sorted by path
    pub fn find_files<P: AsRef<Path>>(dir: P, extension: &str) -> Result<Vec<PathBuf>> {
        let wanted = extension.trim_start_matches('.');
        let mut result = Vec::new();

        for entry in WalkDir::new(dir.as_ref()).follow_links(true) {
            let entry = entry.context("Failed to read directory entry")?;
            let path = entry.path();

            if path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case(wanted))
            {
                result.push(path.to_path_buf());
            }
        }

        result.sort();
        Ok(result)
    }

    /// OCR dumps under `input`: the file itself, or every dump in the directory
    pub fn collect_dumps<P: AsRef<Path>>(input: P) -> Result<Vec<PathBuf>> {
        let input = input.as_ref();
        if input.is_file() {
            return Ok(vec![input.to_path_buf()]);
        }
        if !input.is_dir() {
            return Err(anyhow!("Input path does not exist: {:?}", input));
        }

        Ok(Self::find_files(input, DUMP_EXTENSION)?
            .into_iter()
            .filter(|path| !Self::is_render_output(path))
            .collect())
    }

    // @generates: Default output directory for a run
    pub fn default_output_dir<P: AsRef<Path>>(input: P, target_language: &str) -> PathBuf {
        let input = input.as_ref();
        let base = if input.is_file() {
            input.parent().unwrap_or(Path::new(".")).to_path_buf()
        } else {
            input.to_path_buf()
        };
        base.join(format!("translated.{}", target_language))
    }

    fn is_render_output(path: &Path) -> bool {
        path.file_name()
            .is_some_and(|name| name.to_string_lossy().ends_with(RENDER_SUFFIX))
    }
}
