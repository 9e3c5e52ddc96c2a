use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;

static INIT_ONCE: std::sync::Once = std::sync::Once::new();
pub fn init_tracing_once() {
    INIT_ONCE.call_once(|| {
        let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let _ = tracing_subscriber::fmt().with_env_filter(env_filter).try_init();
    });
}

// -------- file ops with backoff --------

const TRIES: usize = 16;
const DELAY_MS: u64 = 50;

/// Transient I/O errors seen when AV scanners, sync clients or network
/// shares hold a file briefly (Windows error codes 5, 32, 33).
fn is_retriable_io_error(e: &io::Error) -> bool {
    matches!(e.raw_os_error(), Some(5) | Some(32) | Some(33)) || e.kind() == io::ErrorKind::Interrupted
}

/// Run `op` until it succeeds, fails permanently, or runs out of tries.
fn with_backoff<T>(mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    let mut last_err: Option<io::Error> = None;
    for i in 0..TRIES {
        match op() {
            Ok(v) => return Ok(v),
            Err(e) if is_retriable_io_error(&e) => {
                last_err = Some(e);
                sleep(Duration::from_millis(DELAY_MS.saturating_mul((i + 1) as u64)));
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "retries exhausted")))
}

fn tmp_path_for(dest: &Path) -> PathBuf {
    let name = dest.file_name().and_then(|n| n.to_str()).unwrap_or("out");
    dest.with_file_name(format!(".{name}.tmp"))
}

/// Atomically replace `dest` with `tmp`, falling back to copy+remove when
/// the rename keeps failing.
pub fn replace_file_atomic_backoff(tmp: &Path, dest: &Path) -> Result<()> {
    match with_backoff(|| fs::rename(tmp, dest)) {
        Ok(()) => Ok(()),
        Err(_) => {
            with_backoff(|| fs::copy(tmp, dest))
                .with_context(|| format!("copy {} -> {}", tmp.display(), dest.display()))?;
            with_backoff(|| match fs::remove_file(tmp) {
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                other => other,
            })
            .with_context(|| format!("remove {}", tmp.display()))
        }
    }
}

/// Write through a temp file next to `dest`, then promote it.
fn write_atomic(dest: &Path, fill: impl FnOnce(&mut BufWriter<File>) -> Result<()>) -> Result<()> {
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let tmp = tmp_path_for(dest);
    let f = with_backoff(|| File::create(&tmp)).with_context(|| format!("create {}", tmp.display()))?;
    let mut w = BufWriter::new(f);
    fill(&mut w)?;
    w.flush().with_context(|| format!("flush {}", tmp.display()))?;
    drop(w);
    replace_file_atomic_backoff(&tmp, dest)
}

/// Pretty-printed JSON, written atomically.
pub fn write_json_pretty<T: Serialize + ?Sized>(dest: &Path, value: &T) -> Result<()> {
    write_atomic(dest, |w| {
        serde_json::to_writer_pretty(&mut *w, value).with_context(|| format!("serialize {}", dest.display()))?;
        w.write_all(b"\n")?;
        Ok(())
    })
}

pub fn write_text(dest: &Path, text: &str) -> Result<()> {
    write_atomic(dest, |w| {
        w.write_all(text.as_bytes())?;
        Ok(())
    })
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let f = with_backoff(|| File::open(path)).with_context(|| format!("open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(f)).with_context(|| format!("parse {}", path.display()))
}
