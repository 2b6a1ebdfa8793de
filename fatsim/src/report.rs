//! Text renderings of engine state for display tooling. Nothing here prints;
//! callers decide where the text goes.

use crate::dir::{DirId, DirectoryTree, FileRecord};
use crate::io::BlockNumber;

use std::fmt::Write;

const TABLE_ROW: usize = 8;
const CHAR_LINE: usize = 32;
const BINARY_LINE: usize = 16;

/// The bitmap as numbered rows of eight `0`/`1` cells.
pub fn render_bitmap(occupancy: &[bool]) -> String {
    render_table(occupancy, |&used| (if used { "1" } else { "0" }).to_string())
}

/// The allocation table as numbered rows of eight next pointers, `NUL`
/// marking end of chain.
pub fn render_fat(chains: &[Option<BlockNumber>]) -> String {
    render_table(chains, |next| match next {
        Some(blocknr) => format!("{:03}", blocknr),
        None => "NUL".to_string(),
    })
}

fn render_table<T, F: Fn(&T) -> String>(cells: &[T], cell: F) -> String {
    let mut out = String::new();
    for (row, chunk) in cells.chunks(TABLE_ROW).enumerate() {
        let line: Vec<String> = chunk.iter().map(&cell).collect();
        // Writing to a String cannot fail.
        let _ = writeln!(out, "{:02}. {}", row + 1, line.join(" "));
    }
    out
}

/// The directory tree below the root, one entry per line.
pub fn render_tree(tree: &DirectoryTree) -> String {
    let mut out = String::new();
    render_dir(tree, tree.root(), 1, &mut out);
    out
}

fn render_dir(tree: &DirectoryTree, id: DirId, level: usize, out: &mut String) {
    let dir = tree.get(id);
    let _ = writeln!(out, "{}{}/", " ".repeat(level), dir.name);
    for name in dir.files.keys() {
        let _ = writeln!(out, "{}- {}", " ".repeat(level + 1), name);
    }
    for &child in dir.subdirs.values() {
        render_dir(tree, child, level + 1, out);
    }
}

/// Disk bytes as characters, unprintable bytes shown as `.` and blocks
/// separated by ` , `.
pub fn render_chars(bytes: &[u8], block_size: usize) -> String {
    render_blocks(bytes, block_size, CHAR_LINE, "", |b| {
        if b == b' ' || b.is_ascii_graphic() {
            (b as char).to_string()
        } else {
            ".".to_string()
        }
    })
}

/// Disk bytes as space separated 8 bit binary, blocks separated by ` , `.
pub fn render_binary(bytes: &[u8], block_size: usize) -> String {
    render_blocks(bytes, block_size, BINARY_LINE, " ", |b| format!("{:08b}", b))
}

fn render_blocks<F: Fn(u8) -> String>(
    bytes: &[u8],
    block_size: usize,
    line_bytes: usize,
    cell_sep: &str,
    cell: F,
) -> String {
    let block_size = block_size.max(1);
    let blocks_per_line = (line_bytes / block_size).max(1);
    let mut out = String::new();
    let blocks: Vec<&[u8]> = bytes.chunks(block_size).collect();
    for line in blocks.chunks(blocks_per_line) {
        let rendered: Vec<String> = line
            .iter()
            .map(|block| {
                block
                    .iter()
                    .map(|&b| cell(b))
                    .collect::<Vec<_>>()
                    .join(cell_sep)
            })
            .collect();
        out.push_str(&rendered.join(" , "));
        out.push('\n');
    }
    out
}

/// Summary of one file record, `content` being its trimmed data.
pub fn render_file_info(record: &FileRecord, content: &[u8]) -> String {
    let head = match record.head {
        Some(blocknr) => blocknr.to_string(),
        None => "NUL".to_string(),
    };
    format!(
        "Name: {}\nSize: {}\nAllocated: {}\nFAT index: {}\nSaved data: {}\n",
        record.name,
        record.size,
        record.rounded_size,
        head,
        String::from_utf8_lossy(content)
    )
}
