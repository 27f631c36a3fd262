use std::fs::{self, File, OpenOptions};
use std::io::{self, Write as IoWrite};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use log::{error, info};
use serde_json::Value;

use crate::cli::{Cli, OutputFormat};

/// Where JSON records go. Without `--output` they are printed to stdout as
/// one JSON document per line.
#[derive(Clone)]
pub enum OutputMode {
    None,
    Single(Arc<Mutex<Vec<Value>>>),
    Ndjson(Arc<Mutex<File>>),
    PerFile(PathBuf),
}

pub fn build_output_mode(cli: &Cli) -> OutputMode {
    let Some(path) = &cli.output else {
        return OutputMode::None;
    };
    match cli.output_format {
        OutputFormat::Ndjson => match OpenOptions::new().create(true).append(true).open(path) {
            Ok(f) => OutputMode::Ndjson(Arc::new(Mutex::new(f))),
            Err(e) => {
                error!("Failed to open NDJSON output {}: {}", path, e);
                OutputMode::None
            }
        },
        OutputFormat::PerFile => {
            let dir = PathBuf::from(path);
            if let Err(e) = fs::create_dir_all(&dir) {
                error!("Failed to create output directory {}: {}", path, e);
                OutputMode::None
            } else {
                OutputMode::PerFile(dir)
            }
        }
        OutputFormat::Single => OutputMode::Single(Arc::new(Mutex::new(Vec::new()))),
    }
}

/// Route one input's results. `text` is free-form output (syntax trees, raw
/// query matches) that only ever goes to stdout.
pub fn handle_output(
    output_mode: &OutputMode,
    text: &str,
    recs: Vec<Value>,
    source_path: Option<&Path>,
    source_label: &str,
) {
    match output_mode {
        OutputMode::Single(col) => {
            if !recs.is_empty() {
                if let Ok(mut guard) = col.lock() {
                    guard.extend(recs);
                }
            }
        }
        OutputMode::Ndjson(file) => {
            if !recs.is_empty() {
                if let Ok(mut guard) = file.lock() {
                    if let Err(e) = write_lines(&mut *guard, &recs) {
                        error!("Failed to append NDJSON records for {}: {}", source_label, e);
                    }
                }
            }
        }
        OutputMode::PerFile(dir) => {
            if !recs.is_empty() {
                let outpath = per_file_path(dir, source_path, source_label);
                let written = File::create(&outpath).and_then(|f| {
                    serde_json::to_writer_pretty(f, &recs).map_err(io::Error::from)
                });
                if let Err(e) = written {
                    error!("Failed to write {}: {}", outpath.display(), e);
                }
            }
        }
        OutputMode::None => {
            // One lock for the whole input keeps records from parallel workers apart.
            let stdout = io::stdout();
            let mut lock = stdout.lock();
            if let Err(e) = write_lines(&mut lock, &recs) {
                error!("Failed to write records: {}", e);
            }
        }
    }
    if !text.is_empty() {
        println!("{}", text.trim_end());
    }
}

fn write_lines(out: &mut impl IoWrite, recs: &[Value]) -> io::Result<()> {
    for rec in recs {
        serde_json::to_writer(&mut *out, rec)?;
        out.write_all(b"\n")?;
    }
    Ok(())
}

pub fn finalize_output(output_mode: &OutputMode, cli: &Cli) {
    let Some(path) = &cli.output else {
        return;
    };
    match output_mode {
        OutputMode::Single(col) => match col.lock() {
            Ok(guard) => {
                if guard.is_empty() {
                    info!("No findings; not writing output file {}", path);
                    return;
                }
                match serde_json::to_string_pretty(&*guard) {
                    Ok(j) => match fs::write(path, j) {
                        Ok(()) => info!("Wrote JSON output to {}", path),
                        Err(e) => error!("Failed to write JSON to {}: {}", path, e),
                    },
                    Err(e) => error!("Failed to serialize JSON output: {}", e),
                }
            }
            Err(e) => error!("Failed to acquire lock to write output file: {}", e),
        },
        OutputMode::Ndjson(_) => info!("NDJSON output written incrementally to {}", path),
        OutputMode::PerFile(_) => info!("Per-file JSON output written to directory {}", path),
        OutputMode::None => {}
    }
}

fn per_file_path(dir: &Path, source_path: Option<&Path>, source_label: &str) -> PathBuf {
    let mut outpath = dir.to_path_buf();
    let name = source_path
        .and_then(Path::file_name)
        .or_else(|| Path::new(source_label).file_name());
    match name {
        Some(name) => {
            outpath.push(name);
            outpath.set_extension("json");
        }
        None => outpath.push("output.json"),
    }
    outpath
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn per_file_names_follow_the_input() {
        let dir = Path::new("/tmp/out");
        assert_eq!(
            per_file_path(dir, Some(Path::new("/src/app.min.js")), "ignored"),
            PathBuf::from("/tmp/out/app.min.json")
        );
        assert_eq!(
            per_file_path(dir, None, "https://example.com/static/main.js"),
            PathBuf::from("/tmp/out/main.json")
        );
        assert_eq!(per_file_path(dir, None, ""), PathBuf::from("/tmp/out/output.json"));
    }

    #[test]
    fn records_are_one_per_line() {
        let mut buf = Vec::new();
        write_lines(&mut buf, &[json!({"url": "/a"}), json!({"url": "/b"})]).expect("write");
        assert_eq!(String::from_utf8(buf).expect("utf8"), "{\"url\":\"/a\"}\n{\"url\":\"/b\"}\n");
    }

    #[test]
    fn per_file_mode_writes_pretty_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mode = OutputMode::PerFile(dir.path().to_path_buf());
        handle_output(&mode, "", vec![json!({"kind": "fetch"})], Some(Path::new("x/app.js")), "x/app.js");
        let written = fs::read_to_string(dir.path().join("app.json")).expect("written");
        let parsed: Value = serde_json::from_str(&written).expect("json");
        assert_eq!(parsed, json!([{"kind": "fetch"}]));
    }
}
