//! Gzip-compressed containers
//!
//! Compressed sources are inflated into a temporary file that keeps the inner
//! container extension, so the decoder can still probe the format from the name.

use crate::{Error, Result};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Whether the path names a gzip-compressed file
pub fn is_gzip(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false)
}

/// Inflate `path` into a temporary file
///
/// The returned handle owns the file; it is removed when dropped.
pub fn decompress_to_temp(path: &Path) -> Result<NamedTempFile> {
    let id = super::source_id(path);
    let decode_err = |e: io::Error| Error::decode(&id, format!("gzip inflate failed: {e}"));

    // "clip.mkv.gz" -> ".mkv"
    let inner_suffix = path
        .file_stem()
        .and_then(|stem| Path::new(stem).extension())
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();

    let file = File::open(path).map_err(decode_err)?;
    let mut decoder = GzDecoder::new(BufReader::new(file));
    let mut temp = tempfile::Builder::new()
        .prefix("audionet-")
        .suffix(&inner_suffix)
        .tempfile()?;

    io::copy(&mut decoder, &mut temp).map_err(decode_err)?;
    temp.flush()?;

    tracing::debug!(source = %id, temp = %temp.path().display(), "inflated gzip source");
    Ok(temp)
}
