//! Reader and writer for `.cfel` filter files.
//!
//! A filter file stores the left/right spatial filters of an eye locator and
//! the two regions of interest searched on the correlation surfaces:
//!
//! ```text
//! CFEL\n
//! <comment>\n
//! <attribution>\n
//! <rows> <cols>\n
//! <left x> <left y> <left w> <left h>\n
//! <right x> <right y> <right w> <right h>\n
//! <4-byte order marker>\n
//! <rows*cols f32 left><rows*cols f32 right>
//! ```
//!
//! The marker is `0x41424344` written in the byte order of the payload. Files
//! produced on either little- or big-endian hosts are accepted.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use asef_core::PixelRect;

use crate::kernel::check_roi;
use crate::{DimensionError, EyeSide, FilterKernel, FilterPair};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// First header line of every filter file.
pub const CFEL_MAGIC: &str = "CFEL";

/// Byte-order marker value as written by the producer.
pub const BYTE_ORDER_MARKER: u32 = 0x4142_4344;

/// Byte order of the binary part of a filter file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    /// Byte order of the running host.
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }

    /// Identify the writer's byte order from the raw marker bytes.
    pub fn detect(marker: [u8; 4]) -> Option<Self> {
        match u32::from_le_bytes(marker) {
            BYTE_ORDER_MARKER => Some(ByteOrder::Little),
            m if m == BYTE_ORDER_MARKER.swap_bytes() => Some(ByteOrder::Big),
            _ => None,
        }
    }

    pub fn marker_bytes(self) -> [u8; 4] {
        match self {
            ByteOrder::Little => BYTE_ORDER_MARKER.to_le_bytes(),
            ByteOrder::Big => BYTE_ORDER_MARKER.to_be_bytes(),
        }
    }

    #[inline]
    fn decode_f32(self, b: [u8; 4]) -> f32 {
        match self {
            ByteOrder::Little => f32::from_le_bytes(b),
            ByteOrder::Big => f32::from_be_bytes(b),
        }
    }

    #[inline]
    fn encode_f32(self, v: f32) -> [u8; 4] {
        match self {
            ByteOrder::Little => v.to_le_bytes(),
            ByteOrder::Big => v.to_be_bytes(),
        }
    }
}

/// Malformed or truncated filter file contents.
#[derive(thiserror::Error, Debug)]
pub enum FormatError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("bad magic line {found:?}, expected \"CFEL\"")]
    BadMagic { found: String },
    #[error("missing {field} line")]
    MissingLine { field: &'static str },
    #[error("malformed {field} line {line:?}")]
    MalformedLine { field: &'static str, line: String },
    #[error("unknown byte-order marker {marker:#010x}")]
    UnknownByteOrder { marker: u32 },
    #[error("byte-order marker must be followed by a newline, found byte {found:#04x}")]
    MarkerNotTerminated { found: u8 },
    #[error("filter payload is {got} bytes, expected {expected}")]
    ShortPayload { expected: usize, got: usize },
    #[error("unexpected data after the {expected}-byte filter payload")]
    TrailingData { expected: usize },
    #[error("filter size {rows}x{cols} is too large")]
    TooLarge { rows: usize, cols: usize },
    #[error(transparent)]
    Dimension(#[from] DimensionError),
}

/// Path-level failure of [`load_filter_file`] / [`save_filter_file`].
#[derive(thiserror::Error, Debug)]
pub enum FilterStoreError {
    #[error("failed to load filter file {path}")]
    Load {
        path: PathBuf,
        #[source]
        source: FormatError,
    },
    #[error("failed to save filter file {path}")]
    Save {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Contents of a filter file.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterFile {
    pub filters: FilterPair,
    pub left_roi: PixelRect,
    pub right_roi: PixelRect,
    pub comment: String,
    pub attribution: String,
}

impl FilterFile {
    /// Bundle filters and regions of interest, checking the ROIs against the filter size.
    pub fn new(
        filters: FilterPair,
        left_roi: PixelRect,
        right_roi: PixelRect,
    ) -> Result<Self, DimensionError> {
        check_roi(EyeSide::Left, left_roi, filters.rows(), filters.cols())?;
        check_roi(EyeSide::Right, right_roi, filters.rows(), filters.cols())?;
        Ok(Self {
            filters,
            left_roi,
            right_roi,
            comment: String::new(),
            attribution: String::new(),
        })
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn with_attribution(mut self, attribution: impl Into<String>) -> Self {
        self.attribution = attribution.into();
        self
    }
}

struct CfelReader<R: BufRead> {
    reader: R,
}

impl<R: BufRead> CfelReader<R> {
    fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Next `\n`-terminated line without its terminator.
    fn read_line(&mut self, field: &'static str) -> Result<String, FormatError> {
        let mut buf = Vec::new();
        let n = self.reader.read_until(b'\n', &mut buf)?;
        if n == 0 {
            return Err(FormatError::MissingLine { field });
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
        }
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    fn read_dims(&mut self) -> Result<(usize, usize), FormatError> {
        let line = self.read_line("dimensions")?;
        let malformed = || FormatError::MalformedLine {
            field: "dimensions",
            line: line.clone(),
        };
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let [r, c] = tokens.as_slice() else {
            return Err(malformed());
        };
        let rows: usize = r.parse().map_err(|_| malformed())?;
        let cols: usize = c.parse().map_err(|_| malformed())?;
        Ok((rows, cols))
    }

    fn read_rect(&mut self, field: &'static str) -> Result<PixelRect, FormatError> {
        let line = self.read_line(field)?;
        let malformed = || FormatError::MalformedLine {
            field,
            line: line.clone(),
        };
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let [x, y, w, h] = tokens.as_slice() else {
            return Err(malformed());
        };
        Ok(PixelRect::new(
            x.parse().map_err(|_| malformed())?,
            y.parse().map_err(|_| malformed())?,
            w.parse().map_err(|_| malformed())?,
            h.parse().map_err(|_| malformed())?,
        ))
    }

    fn read_byte_order(&mut self) -> Result<ByteOrder, FormatError> {
        let mut marker = [0u8; 4];
        self.reader
            .read_exact(&mut marker)
            .map_err(|e| match e.kind() {
                io::ErrorKind::UnexpectedEof => FormatError::MissingLine {
                    field: "byte-order marker",
                },
                _ => FormatError::Io(e),
            })?;
        let order = ByteOrder::detect(marker).ok_or(FormatError::UnknownByteOrder {
            marker: u32::from_le_bytes(marker),
        })?;

        let mut term = [0u8; 1];
        self.reader
            .read_exact(&mut term)
            .map_err(|e| match e.kind() {
                io::ErrorKind::UnexpectedEof => FormatError::MissingLine {
                    field: "byte-order marker",
                },
                _ => FormatError::Io(e),
            })?;
        if term[0] != b'\n' {
            return Err(FormatError::MarkerNotTerminated { found: term[0] });
        }
        Ok(order)
    }

    /// Read both payload planes; the stream must end right after them.
    fn read_payload(
        &mut self,
        rows: usize,
        cols: usize,
        order: ByteOrder,
    ) -> Result<(Vec<f32>, Vec<f32>), FormatError> {
        let n = rows
            .checked_mul(cols)
            .ok_or(FormatError::TooLarge { rows, cols })?;
        let expected = n
            .checked_mul(2 * std::mem::size_of::<f32>())
            .ok_or(FormatError::TooLarge { rows, cols })?;

        let mut bytes = Vec::new();
        (&mut self.reader)
            .take(expected as u64)
            .read_to_end(&mut bytes)?;
        if bytes.len() != expected {
            return Err(FormatError::ShortPayload {
                expected,
                got: bytes.len(),
            });
        }

        let mut extra = [0u8; 1];
        if self.reader.read(&mut extra)? != 0 {
            return Err(FormatError::TrailingData { expected });
        }

        let mut values = bytes
            .chunks_exact(4)
            .map(|c| order.decode_f32([c[0], c[1], c[2], c[3]]));
        let left: Vec<f32> = values.by_ref().take(n).collect();
        let right: Vec<f32> = values.collect();
        Ok((left, right))
    }
}

/// Parse a filter file from an already-opened reader.
pub fn read_filter_file<R: BufRead>(reader: R) -> Result<FilterFile, FormatError> {
    read_filter_file_with_order(reader).map(|(file, _)| file)
}

/// Like [`read_filter_file`], also reporting the byte order of the payload.
pub fn read_filter_file_with_order<R: BufRead>(
    reader: R,
) -> Result<(FilterFile, ByteOrder), FormatError> {
    let mut r = CfelReader::new(reader);

    let magic = r.read_line("magic")?;
    if magic.trim() != CFEL_MAGIC {
        return Err(FormatError::BadMagic { found: magic });
    }

    let comment = r.read_line("comment")?.trim().to_string();
    let attribution = r.read_line("attribution")?.trim().to_string();

    let (rows, cols) = r.read_dims()?;
    if rows == 0 || cols == 0 {
        return Err(DimensionError::EmptyKernel { rows, cols }.into());
    }
    let left_roi = r.read_rect("left region")?;
    let right_roi = r.read_rect("right region")?;

    let order = r.read_byte_order()?;
    let (left, right) = r.read_payload(rows, cols, order)?;
    if order != ByteOrder::native() {
        log::debug!("filter payload written as {order:?}, converted on load");
    }

    let filters = FilterPair::new(
        FilterKernel::new(rows, cols, left)?,
        FilterKernel::new(rows, cols, right)?,
    )?;
    let file = FilterFile::new(filters, left_roi, right_roi)?
        .with_comment(comment)
        .with_attribution(attribution);
    Ok((file, order))
}

/// Load a filter file from disk.
#[cfg_attr(feature = "tracing", instrument(level = "info", skip_all, fields(path = %path.as_ref().display())))]
pub fn load_filter_file(path: impl AsRef<Path>) -> Result<FilterFile, FilterStoreError> {
    let path = path.as_ref();
    let load = || -> Result<FilterFile, FormatError> {
        let file = File::open(path)?;
        read_filter_file(BufReader::new(file))
    };
    let file = load().map_err(|source| FilterStoreError::Load {
        path: path.to_path_buf(),
        source,
    })?;
    log::debug!(
        "loaded {}x{} filters from {} (left roi {}, right roi {})",
        file.filters.rows(),
        file.filters.cols(),
        path.display(),
        file.left_roi,
        file.right_roi
    );
    Ok(file)
}

/// Header text lines must stay on one line.
fn header_text(s: &str) -> String {
    s.trim().replace(['\r', '\n'], " ")
}

fn write_rect<W: Write>(w: &mut W, r: &PixelRect) -> io::Result<()> {
    writeln!(w, "{} {} {} {}", r.x, r.y, r.width, r.height)
}

/// Serialize a filter file with the given payload byte order.
pub fn write_filter_file<W: Write>(
    mut w: W,
    file: &FilterFile,
    order: ByteOrder,
) -> io::Result<()> {
    let rows = file.filters.rows();
    let cols = file.filters.cols();

    writeln!(w, "{CFEL_MAGIC}")?;
    writeln!(w, "{}", header_text(&file.comment))?;
    writeln!(w, "{}", header_text(&file.attribution))?;
    writeln!(w, "{rows} {cols}")?;
    write_rect(&mut w, &file.left_roi)?;
    write_rect(&mut w, &file.right_roi)?;
    w.write_all(&order.marker_bytes())?;
    w.write_all(b"\n")?;

    for kernel in [file.filters.left(), file.filters.right()] {
        for &v in kernel.data() {
            w.write_all(&order.encode_f32(v))?;
        }
    }
    w.flush()
}

/// Save a filter file to disk in the host byte order.
pub fn save_filter_file(path: impl AsRef<Path>, file: &FilterFile) -> Result<(), FilterStoreError> {
    save_filter_file_with_order(path, file, ByteOrder::native())
}

/// Save a filter file to disk with an explicit payload byte order.
pub fn save_filter_file_with_order(
    path: impl AsRef<Path>,
    file: &FilterFile,
    order: ByteOrder,
) -> Result<(), FilterStoreError> {
    let path = path.as_ref();
    let save = || -> io::Result<()> {
        let f = File::create(path)?;
        write_filter_file(BufWriter::new(f), file, order)
    };
    save().map_err(|source| FilterStoreError::Save {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_file(rows: usize, cols: usize) -> FilterFile {
        let left: Vec<f32> = (0..rows * cols).map(|i| i as f32 * 0.25 - 3.0).collect();
        let right: Vec<f32> = (0..rows * cols)
            .map(|i| ((i * 7919) % 113) as f32 / 17.0 + f32::MIN_POSITIVE)
            .collect();
        let filters = FilterPair::new(
            FilterKernel::new(rows, cols, left).unwrap(),
            FilterKernel::new(rows, cols, right).unwrap(),
        )
        .unwrap();
        FilterFile::new(
            filters,
            PixelRect::new(1, 1, cols as u32 / 2, rows as u32 / 2),
            PixelRect::new(cols as i32 / 2, 1, cols as u32 / 2, rows as u32 / 2),
        )
        .unwrap()
        .with_comment("trained on synthetic data")
        .with_attribution("(c) nobody")
    }

    fn encode(file: &FilterFile, order: ByteOrder) -> Vec<u8> {
        let mut buf = Vec::new();
        write_filter_file(&mut buf, file, order).unwrap();
        buf
    }

    fn assert_bit_identical(a: &FilterFile, b: &FilterFile) {
        for side in [EyeSide::Left, EyeSide::Right] {
            let x: Vec<u32> = a.filters.side(side).data().iter().map(|v| v.to_bits()).collect();
            let y: Vec<u32> = b.filters.side(side).data().iter().map(|v| v.to_bits()).collect();
            assert_eq!(x, y, "{side} filter differs");
        }
        assert_eq!(a.left_roi, b.left_roi);
        assert_eq!(a.right_roi, b.right_roi);
        assert_eq!(a.comment, b.comment);
        assert_eq!(a.attribution, b.attribution);
    }

    #[test]
    fn header_layout_is_textual() {
        let file = sample_file(4, 6);
        let bytes = encode(&file, ByteOrder::Little);
        let text_end = bytes
            .windows(5)
            .position(|w| w == b"DCBA\n")
            .expect("little-endian marker");
        let header = std::str::from_utf8(&bytes[..text_end]).unwrap();
        assert_eq!(
            header,
            "CFEL\ntrained on synthetic data\n(c) nobody\n4 6\n1 1 3 2\n3 1 3 2\n"
        );
        assert_eq!(bytes.len(), text_end + 5 + 2 * 4 * 6 * 4);
    }

    #[test]
    fn round_trips_in_both_byte_orders() {
        let file = sample_file(5, 7);
        for order in [ByteOrder::Little, ByteOrder::Big] {
            let bytes = encode(&file, order);
            let loaded = read_filter_file(Cursor::new(bytes)).unwrap();
            assert_bit_identical(&file, &loaded);
        }
    }

    #[test]
    fn byte_orders_load_to_same_values() {
        let file = sample_file(3, 4);
        let le = read_filter_file(Cursor::new(encode(&file, ByteOrder::Little))).unwrap();
        let be = read_filter_file(Cursor::new(encode(&file, ByteOrder::Big))).unwrap();
        assert_bit_identical(&le, &be);
        assert_ne!(
            encode(&file, ByteOrder::Little),
            encode(&file, ByteOrder::Big)
        );
    }

    #[test]
    fn reports_payload_byte_order() {
        let file = sample_file(2, 3);
        for order in [ByteOrder::Little, ByteOrder::Big] {
            let (_, found) =
                read_filter_file_with_order(Cursor::new(encode(&file, order))).unwrap();
            assert_eq!(found, order);
        }
    }

    #[test]
    fn detects_marker_patterns() {
        assert_eq!(ByteOrder::detect(*b"DCBA"), Some(ByteOrder::Little));
        assert_eq!(ByteOrder::detect(*b"ABCD"), Some(ByteOrder::Big));
        assert_eq!(ByteOrder::detect(*b"ABDC"), None);
    }

    #[test]
    fn multiline_comment_is_flattened() {
        let file = sample_file(2, 2).with_comment("first\nsecond\r\n");
        let loaded = read_filter_file(Cursor::new(encode(&file, ByteOrder::Big))).unwrap();
        assert_eq!(loaded.comment, "first second");
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = encode(&sample_file(2, 2), ByteOrder::Little);
        bytes[0] = b'X';
        assert!(matches!(
            read_filter_file(Cursor::new(bytes)),
            Err(FormatError::BadMagic { .. })
        ));
    }

    #[test]
    fn rejects_unknown_marker() {
        let mut bytes = encode(&sample_file(2, 2), ByteOrder::Little);
        let pos = bytes.windows(4).position(|w| w == b"DCBA").unwrap();
        bytes[pos..pos + 4].copy_from_slice(b"XXXX");
        assert!(matches!(
            read_filter_file(Cursor::new(bytes)),
            Err(FormatError::UnknownByteOrder { .. })
        ));
    }

    #[test]
    fn rejects_truncated_payload() {
        let mut bytes = encode(&sample_file(2, 2), ByteOrder::Little);
        bytes.truncate(bytes.len() - 3);
        match read_filter_file(Cursor::new(bytes)) {
            Err(FormatError::ShortPayload { expected, got }) => {
                assert_eq!(expected, 32);
                assert_eq!(got, 29);
            }
            other => panic!("expected short payload, got {other:?}"),
        }
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut bytes = encode(&sample_file(2, 2), ByteOrder::Little);
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        assert!(matches!(
            read_filter_file(Cursor::new(bytes)),
            Err(FormatError::TrailingData { expected: 32 })
        ));
    }

    #[test]
    fn rejects_missing_and_malformed_header_lines() {
        assert!(matches!(
            read_filter_file(Cursor::new(b"CFEL\nc\n".to_vec())),
            Err(FormatError::MissingLine {
                field: "attribution"
            })
        ));
        assert!(matches!(
            read_filter_file(Cursor::new(b"CFEL\nc\na\n4 x\n".to_vec())),
            Err(FormatError::MalformedLine {
                field: "dimensions",
                ..
            })
        ));
        assert!(matches!(
            read_filter_file(Cursor::new(b"CFEL\nc\na\n4 4\n0 0 -2 2\n".to_vec())),
            Err(FormatError::MalformedLine {
                field: "left region",
                ..
            })
        ));
    }

    #[test]
    fn rejects_roi_outside_filter() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"CFEL\n\n\n2 2\n0 0 2 2\n1 1 2 2\n");
        bytes.extend_from_slice(&ByteOrder::Little.marker_bytes());
        bytes.push(b'\n');
        bytes.extend(std::iter::repeat(0u8).take(32));
        assert!(matches!(
            read_filter_file(Cursor::new(bytes)),
            Err(FormatError::Dimension(DimensionError::RoiOutOfBounds {
                side: EyeSide::Right,
                ..
            }))
        ));
    }

    #[test]
    fn save_and_load_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eyes.cfel");
        let file = sample_file(6, 6);

        save_filter_file_with_order(&path, &file, ByteOrder::Big).unwrap();
        let loaded = load_filter_file(&path).unwrap();
        assert_bit_identical(&file, &loaded);

        save_filter_file(&path, &file).unwrap();
        assert_bit_identical(&file, &load_filter_file(&path).unwrap());
    }

    #[test]
    fn load_error_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.cfel");
        let err = load_filter_file(&path).unwrap_err();
        assert!(err.to_string().contains("missing.cfel"), "{err}");
        assert!(matches!(
            err,
            FilterStoreError::Load {
                source: FormatError::Io(_),
                ..
            }
        ));
    }
}
