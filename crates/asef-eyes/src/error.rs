use crate::peak::PeakError;
use crate::EyeSide;
use asef_core::{ExtractError, PixelRect};

/// Shape problems in filters, regions of interest or input tiles.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DimensionError {
    #[error("filter kernel must be non-empty (got {rows}x{cols})")]
    EmptyKernel { rows: usize, cols: usize },
    #[error("filter kernel data has {got} values, expected {expected} ({rows}x{cols})")]
    KernelDataLength {
        rows: usize,
        cols: usize,
        expected: usize,
        got: usize,
    },
    #[error("left filter is {left_rows}x{left_cols} but right filter is {right_rows}x{right_cols}")]
    FilterMismatch {
        left_rows: usize,
        left_cols: usize,
        right_rows: usize,
        right_cols: usize,
    },
    #[error("{side} region of interest {roi} is not a non-empty sub-rectangle of the {rows}x{cols} filter")]
    RoiOutOfBounds {
        side: EyeSide,
        roi: PixelRect,
        rows: usize,
        cols: usize,
    },
    #[error("tile is {got_width}x{got_height}, filters expect {expected_width}x{expected_height}")]
    TileSize {
        expected_width: usize,
        expected_height: usize,
        got_width: usize,
        got_height: usize,
    },
    #[error("buffer holds {got} values, the transform is {rows}x{cols}")]
    BufferLength { rows: usize, cols: usize, got: usize },
    #[error("workspace is {got_rows}x{got_cols}, engine expects {rows}x{cols}")]
    WorkspaceSize {
        rows: usize,
        cols: usize,
        got_rows: usize,
        got_cols: usize,
    },
}

/// Failure to locate eyes for one face (or one tile).
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum LocateError {
    #[error("face {face}: {source}")]
    Extract {
        face: PixelRect,
        #[source]
        source: ExtractError,
    },
    #[error("tile: {0}")]
    Tile(#[from] DimensionError),
    #[error("{side} eye peak: {source}")]
    Peak {
        side: EyeSide,
        #[source]
        source: PeakError,
    },
}
