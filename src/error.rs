//! Error types for gridalign

use std::fmt;
use std::io;

/// Result type for gridalign operations
pub type Result<T> = std::result::Result<T, Error>;

/// Grid attribute that differed during alignment verification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchAttribute {
    /// Pixel dimensions differ
    Size,
    /// Affine transform differs beyond tolerance
    Transform,
    /// Projection descriptors differ
    Projection,
}

impl MismatchAttribute {
    /// Returns the name of this attribute
    pub fn name(&self) -> &'static str {
        match self {
            MismatchAttribute::Size => "size",
            MismatchAttribute::Transform => "transform",
            MismatchAttribute::Projection => "projection",
        }
    }
}

/// Pipeline stage that produced a fatal error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Open,
    Plan,
    Schedule,
    Assemble,
    Materialize,
    Verify,
}

impl Stage {
    /// Returns the name of this stage
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Open => "open",
            Stage::Plan => "plan",
            Stage::Schedule => "schedule",
            Stage::Assemble => "assemble",
            Stage::Materialize => "materialize",
            Stage::Verify => "verify",
        }
    }
}

/// Error types that can occur in gridalign operations
#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(io::Error),

    /// Bad tile size, non-positive dimensions or other caller error
    InvalidConfiguration(String),

    /// Tile wider than the source raster or an inconsistent window
    InvalidTileGeometry(String),

    /// The warper produced no usable result for a tile
    ResampleFailure {
        tile_x: usize,
        tile_y: usize,
        reason: String,
    },

    /// Every tile job failed
    NoValidTiles {
        total: usize,
        first_failure: Option<String>,
    },

    /// Alignment verification failure
    GridMismatch {
        first: String,
        second: String,
        attribute: MismatchAttribute,
        detail: String,
    },

    /// Invalid raster container format
    InvalidFormat(String),

    /// Invalid TIFF magic number
    InvalidMagic(u16),

    /// Missing required tag
    MissingTag(u16),

    /// Unsupported feature
    Unsupported(String),

    /// Out of bounds access
    OutOfBounds(String),

    /// Projection error
    Projection(String),

    /// Configuration file could not be parsed
    Config(String),

    /// A fatal error attributed to a pipeline stage
    Stage {
        stage: Stage,
        source: Box<Error>,
    },
}

impl Error {
    /// Attributes this error to a pipeline stage
    ///
    /// Errors already carrying a stage keep their original attribution.
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            Error::Stage { .. } => self,
            other => Error::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Returns the innermost error, looking through stage attribution
    pub fn root(&self) -> &Error {
        match self {
            Error::Stage { source, .. } => source.root(),
            other => other,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::InvalidConfiguration(msg) => write!(f, "Invalid configuration: {}", msg),
            Error::InvalidTileGeometry(msg) => write!(f, "Invalid tile geometry: {}", msg),
            Error::ResampleFailure { tile_x, tile_y, reason } => {
                write!(f, "Resampling failed for tile ({}, {}): {}", tile_x, tile_y, reason)
            }
            Error::NoValidTiles { total, first_failure } => {
                write!(f, "No valid tiles: all {} tile jobs failed", total)?;
                if let Some(first) = first_failure {
                    write!(f, " (first failure: {})", first)?;
                }
                Ok(())
            }
            Error::GridMismatch { first, second, attribute, detail } => write!(
                f,
                "Grid mismatch ({}): {} vs {}: {}",
                attribute.name(),
                first,
                second,
                detail
            ),
            Error::InvalidFormat(msg) => write!(f, "Invalid format: {}", msg),
            Error::InvalidMagic(value) => write!(f, "Invalid TIFF magic number: {}", value),
            Error::MissingTag(tag) => write!(f, "Missing required tag: {}", tag),
            Error::Unsupported(msg) => write!(f, "Unsupported: {}", msg),
            Error::OutOfBounds(msg) => write!(f, "Out of bounds: {}", msg),
            Error::Projection(msg) => write!(f, "Projection error: {}", msg),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Stage { stage, source } => write!(f, "{} stage failed: {}", stage.name(), source),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Stage { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        Error::Io(error)
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Config(error.to_string())
    }
}
