//! Workflow commands understood by the CI runner hosting this step.
//!
//! Commands are plain lines on stdout (`::name::data`); the path file is
//! appended to so later steps of the same job see the new entries.
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

fn running_on_runner() -> bool {
    std::env::var("GITHUB_ACTIONS").is_ok_and(|v| v == "true")
}

/// Escape `%`, CR and LF so multi-line data stays one command.
fn escape_data(s: &str) -> String {
    s.replace('%', "%25").replace('\r', "%0D").replace('\n', "%0A")
}

/// Ask the runner to replace `value` with `***` in every later log line.
///
/// Outside the runner this is a no-op; echoing the value to a plain terminal
/// would disclose it instead of hiding it.
pub fn add_mask(value: &str) {
    if value.is_empty() {
        return;
    }
    #[cfg(test)]
    testing::record_mask(value);
    if !running_on_runner() {
        return;
    }
    println!("::add-mask::{}", escape_data(value));
}

/// Emit the single terminal failure annotation for the job.
pub fn set_failed(message: &str) {
    println!("::error::{}", escape_data(message));
}

/// Emit a non-fatal annotation.
pub fn warning(message: &str) {
    println!("::warning::{}", escape_data(message));
}

/// Append `dir` to the runner's path file, if the runner provided one.
pub fn add_path(dir: &Path) -> std::io::Result<()> {
    match std::env::var_os("GITHUB_PATH") {
        Some(file) if !file.is_empty() => append_path_entry(Path::new(&file), dir),
        _ => Ok(()),
    }
}

fn append_path_entry(path_file: &Path, dir: &Path) -> std::io::Result<()> {
    let mut f = OpenOptions::new().create(true).append(true).open(path_file)?;
    writeln!(f, "{}", dir.display())
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn escape_data_encodes_newlines_and_percent() {
        assert_eq!(escape_data("50%\nnext\r"), "50%25%0Anext%0D");
    }

    #[test]
    fn append_path_entry_appends_lines() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("path");
        append_path_entry(&file, Path::new("/opt/a")).unwrap();
        append_path_entry(&file, Path::new("/opt/b")).unwrap();
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "/opt/a\n/opt/b\n");
    }

    #[test]
    fn add_mask_records_non_empty_values() {
        add_mask("");
        add_mask("s3cr3t");
        let masks = testing::masked_values();
        assert!(masks.contains(&"s3cr3t".to_string()));
        assert!(!masks.iter().any(|m| m.is_empty()));
    }
}
