// board_io.rs - Board ingestion and emission as binary PGM images

use std::fs;
use std::path::PathBuf;

use conway::Grid;
use tracing::debug;

use crate::error::BoardIoError;

/// Produces the initial board for a `width x height` run.
pub trait BoardSource {
    fn load(&self, width: usize, height: usize) -> Result<Grid, BoardIoError>;
}

/// Receives boards keyed by `{width}x{height}x{turn}`.
pub trait BoardSink: Send + Sync {
    /// Store `board` under `name` and return where it went.
    fn save(&self, name: &str, board: &Grid) -> Result<String, BoardIoError>;
}

/// Reads `{input_dir}/{w}x{h}.pgm`, writes `{output_dir}/{name}.pgm`.
#[derive(Debug, Clone)]
pub struct PgmStore {
    input_dir: PathBuf,
    output_dir: PathBuf,
}

impl PgmStore {
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self { input_dir: input_dir.into(), output_dir: output_dir.into() }
    }
}

impl BoardSource for PgmStore {
    fn load(&self, width: usize, height: usize) -> Result<Grid, BoardIoError> {
        let path = self.input_dir.join(format!("{width}x{height}.pgm"));
        let bytes = fs::read(&path).map_err(|source| BoardIoError::Io { path: path.clone(), source })?;
        let (w, h, cells) = parse_pgm(&bytes).map_err(|reason| BoardIoError::Malformed {
            path: path.clone(),
            reason,
        })?;
        if (w, h) != (width, height) {
            return Err(BoardIoError::WrongSize {
                path,
                expected: format!("{width}x{height}"),
                actual: format!("{w}x{h}"),
            });
        }
        debug!(path = %path.display(), "Loaded board");
        Ok(Grid::from_cells(w, h, cells.to_vec())?)
    }
}

impl BoardSink for PgmStore {
    fn save(&self, name: &str, board: &Grid) -> Result<String, BoardIoError> {
        fs::create_dir_all(&self.output_dir).map_err(|source| BoardIoError::Io {
            path: self.output_dir.clone(),
            source,
        })?;

        let path = self.output_dir.join(format!("{name}.pgm"));
        let mut image = format!("P5\n{} {}\n255\n", board.width(), board.height()).into_bytes();
        image.extend_from_slice(board.cells());
        fs::write(&path, image).map_err(|source| BoardIoError::Io { path: path.clone(), source })?;
        debug!(path = %path.display(), "Wrote board");
        Ok(path.display().to_string())
    }
}

/// Split a P5 image into (width, height, pixels).
fn parse_pgm(bytes: &[u8]) -> Result<(usize, usize, &[u8]), String> {
    let mut pos = 0;
    let mut header = [0usize; 3];

    let magic = next_token(bytes, &mut pos).ok_or("empty file")?;
    if magic != b"P5" {
        return Err(format!("bad magic {:?}", String::from_utf8_lossy(magic)));
    }
    for (slot, field) in header.iter_mut().zip(["width", "height", "maxval"]) {
        let token = next_token(bytes, &mut pos).ok_or_else(|| format!("missing {field}"))?;
        *slot = std::str::from_utf8(token)
            .ok()
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| format!("bad {field}"))?;
    }
    let [width, height, maxval] = header;
    if maxval != 255 {
        return Err(format!("maxval {maxval} unsupported"));
    }

    // Exactly one whitespace byte separates the header from the pixels.
    let pixels = width.checked_mul(height).ok_or("image too large")?;
    let start = pos + 1;
    let end = start + pixels;
    if end > bytes.len() {
        let found = bytes.len().saturating_sub(start);
        return Err(format!("expected {pixels} pixels, found {found}"));
    }
    Ok((width, height, &bytes[start..end]))
}

/// Next whitespace-separated header token, skipping `#` comments.
fn next_token<'a>(bytes: &'a [u8], pos: &mut usize) -> Option<&'a [u8]> {
    loop {
        while *pos < bytes.len() && bytes[*pos].is_ascii_whitespace() {
            *pos += 1;
        }
        if *pos < bytes.len() && bytes[*pos] == b'#' {
            while *pos < bytes.len() && bytes[*pos] != b'\n' {
                *pos += 1;
            }
            continue;
        }
        break;
    }
    let start = *pos;
    while *pos < bytes.len() && !bytes[*pos].is_ascii_whitespace() {
        *pos += 1;
    }
    (start < *pos).then(|| &bytes[start..*pos])
}
