//! Append-only JSON-lines files.
//!
//! A crash mid-write can leave a final record without its newline. Before
//! appending, [`append_line`] cuts the file back to its last complete line
//! so the new record never merges with the torn one.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::warn;

/// Bytes scanned per step when searching backwards for a newline.
const SCAN_BLOCK: usize = 4096;

/// Append `line` plus a newline to `path` in one write, then flush.
///
/// A torn trailing record left by an earlier crash is discarded first.
pub(crate) fn append_line(path: &Path, line: &str) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)?;

    let len = file.metadata()?.len();
    let complete = complete_len(&mut file, len)?;
    if complete < len {
        warn!(
            path = %path.display(),
            discarded_bytes = len.saturating_sub(complete),
            "Discarding torn trailing line"
        );
        file.set_len(complete)?;
    }

    let mut record = String::with_capacity(line.len().saturating_add(1));
    record.push_str(line);
    record.push('\n');
    file.write_all(record.as_bytes())?;
    file.flush()
}

/// Length of the longest prefix of `file` that ends in a newline.
fn complete_len(file: &mut File, len: u64) -> io::Result<u64> {
    let block_len = u64::try_from(SCAN_BLOCK).map_err(io::Error::other)?;
    let mut block = vec![0_u8; SCAN_BLOCK];
    let mut end = len;

    while end > 0 {
        let start = end.saturating_sub(block_len);
        let size = usize::try_from(end.saturating_sub(start)).map_err(io::Error::other)?;
        let buf = block
            .get_mut(..size)
            .ok_or_else(|| io::Error::other("scan block out of range"))?;

        file.seek(SeekFrom::Start(start))?;
        file.read_exact(buf)?;
        if let Some(pos) = buf.iter().rposition(|&b| b == b'\n') {
            let pos = u64::try_from(pos).map_err(io::Error::other)?;
            return Ok(start.saturating_add(pos).saturating_add(1));
        }
        end = start;
    }
    Ok(0)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn appends_to_new_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("log.jsonl");
        append_line(&path, "{\"a\":1}").unwrap();
        append_line(&path, "{\"a\":2}").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"a\":1}\n{\"a\":2}\n");
    }

    #[test]
    fn torn_tail_is_cut_before_appending() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("log.jsonl");
        fs::write(&path, "{\"a\":1}\n{\"a\":").unwrap();

        append_line(&path, "{\"a\":3}").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"a\":1}\n{\"a\":3}\n");
    }

    #[test]
    fn file_holding_only_a_torn_line_is_emptied() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("log.jsonl");
        fs::write(&path, "{\"half").unwrap();

        append_line(&path, "{}").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{}\n");
    }

    #[test]
    fn torn_tail_longer_than_one_block() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("log.jsonl");
        let torn = "x".repeat(SCAN_BLOCK * 2 + 17);
        fs::write(&path, format!("{{}}\n{torn}")).unwrap();

        append_line(&path, "[]").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{}\n[]\n");
    }
}
