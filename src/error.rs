use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FourDsError>;

/// Fatal decode/encode failures.
#[derive(Debug, Error)]
pub enum FourDsError {
    #[error("not a 4DS file (magic {found:02x?})")]
    BadMagic { found: [u8; 4] },

    #[error("unsupported 4DS version {version} (only 29 is decoded)")]
    UnsupportedVersion { version: u16 },

    #[error("unexpected end of stream at offset {offset}")]
    Truncated { offset: u64 },

    #[error("frame {frame_id} has unsupported frame type {frame_type}")]
    UnknownFrameType { frame_id: u16, frame_type: u8 },

    #[error("unsupported visual type {visual_type} for frame {frame_id}")]
    UnsupportedVisual { frame_id: u16, visual_type: u8 },

    #[error("{what}: {count} exceeds the format limit of {max}")]
    Capacity {
        what: String,
        count: usize,
        max: usize,
    },

    #[error("string '{value}' is {len} bytes, limit is 255")]
    StringTooLong { value: String, len: usize },

    #[error("string '{value}' cannot be encoded as cp1250")]
    Unencodable { value: String },

    #[error("invalid scene: {0}")]
    InvalidScene(String),

    #[error("binary codec error: {0}")]
    Codec(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FourDsError {
    pub fn capacity(what: impl Into<String>, count: usize, max: usize) -> Self {
        FourDsError::Capacity {
            what: what.into(),
            count,
            max,
        }
    }

    /// Fills in the stream position for truncation errors raised below the
    /// frame layer, where the cursor is not visible.
    pub(crate) fn at_offset(self, offset: u64) -> Self {
        match self {
            FourDsError::Truncated { offset: 0 } => FourDsError::Truncated { offset },
            other => other,
        }
    }
}

fn root_cause(err: binrw::Error) -> binrw::Error {
    match err {
        binrw::Error::Backtrace(bt) => root_cause(*bt.error),
        other => other,
    }
}

impl From<binrw::Error> for FourDsError {
    fn from(err: binrw::Error) -> Self {
        match root_cause(err) {
            binrw::Error::Io(io) if io.kind() == std::io::ErrorKind::UnexpectedEof => {
                FourDsError::Truncated { offset: 0 }
            }
            binrw::Error::Io(io) => FourDsError::Io(io),
            other => FourDsError::Codec(other.to_string()),
        }
    }
}

/// Non-fatal findings collected while decoding or encoding.
///
/// Every warning is also emitted through `log::warn!` when it is recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Warning {
    SelfParent { frame_id: u16 },
    MissingParent { frame_id: u16, parent_id: u16 },
    MissingTargetLink { frame_id: u16, link: u16 },
    UnknownBone { file_bone_id: u32, placeholder: String },
    SkinVertexOutOfRange { frame_id: u16, lod: usize, vertex: usize },
    MorphLodClamped { frame_id: u16, declared: u8, known: u8 },
    MorphVertexOutOfRange { frame_id: u16, lod: usize, vertex: u16 },
    UnparsableMorphName { frame_id: u16, name: String },
    UnknownGroupBone { frame_id: u16, group: String },
    TriangleOutOfRange { frame_id: u16, lod: usize, triangle: [u16; 3] },
    MaterialOutOfRange { frame_id: u16, material_id: u16 },
    AnimationIgnored,
    FrameSkipped { frame_id: u16, reason: String },
    AssetMissing { texture: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::SelfParent { frame_id } => {
                write!(f, "frame {frame_id} is its own parent, link dropped")
            }
            Warning::MissingParent {
                frame_id,
                parent_id,
            } => write!(f, "frame {frame_id} references missing parent {parent_id}"),
            Warning::MissingTargetLink { frame_id, link } => {
                write!(f, "target frame {frame_id} links missing frame {link}, link dropped")
            }
            Warning::UnknownBone {
                file_bone_id,
                placeholder,
            } => write!(
                f,
                "skin references unknown bone id {file_bone_id}, using '{placeholder}'"
            ),
            Warning::SkinVertexOutOfRange {
                frame_id,
                lod,
                vertex,
            } => write!(
                f,
                "frame {frame_id} LOD {lod}: skin partition claims vertex {vertex} past the end"
            ),
            Warning::MorphLodClamped {
                frame_id,
                declared,
                known,
            } => write!(
                f,
                "frame {frame_id}: morph block declares {declared} LODs, geometry has {known}"
            ),
            Warning::MorphVertexOutOfRange {
                frame_id,
                lod,
                vertex,
            } => write!(
                f,
                "frame {frame_id} LOD {lod}: morph vertex {vertex} is out of range"
            ),
            Warning::UnparsableMorphName { frame_id, name } => {
                write!(f, "frame {frame_id}: morph target '{name}' skipped")
            }
            Warning::UnknownGroupBone { frame_id, group } => write!(
                f,
                "frame {frame_id}: vertex group '{group}' has no matching bone, bound to root"
            ),
            Warning::TriangleOutOfRange {
                frame_id,
                lod,
                triangle,
            } => write!(
                f,
                "frame {frame_id} LOD {lod}: triangle {triangle:?} indexes past the vertex buffer"
            ),
            Warning::MaterialOutOfRange {
                frame_id,
                material_id,
            } => write!(
                f,
                "frame {frame_id}: material {material_id} does not exist, written as none"
            ),
            Warning::AnimationIgnored => write!(f, "animation block present but not decoded"),
            Warning::FrameSkipped { frame_id, reason } => {
                write!(f, "frame {frame_id} and the rest of the stream skipped: {reason}")
            }
            Warning::AssetMissing { texture } => write!(f, "texture '{texture}' not found"),
        }
    }
}

/// Ordered list of warnings for one decode or encode session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub warnings: Vec<Warning>,
}

impl Diagnostics {
    pub fn warn(&mut self, warning: Warning) {
        log::warn!("{warning}");
        self.warnings.push(warning);
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.warnings.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Warning> {
        self.warnings.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eof_maps_to_truncated_and_takes_offset() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        let err: FourDsError = binrw::Error::Io(io).into();
        match err.at_offset(42) {
            FourDsError::Truncated { offset } => assert_eq!(offset, 42),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn at_offset_keeps_known_offsets() {
        let err = FourDsError::Truncated { offset: 7 }.at_offset(99);
        assert!(matches!(err, FourDsError::Truncated { offset: 7 }));
    }

    #[test]
    fn diagnostics_collects_in_order() {
        let mut diag = Diagnostics::default();
        diag.warn(Warning::SelfParent { frame_id: 3 });
        diag.warn(Warning::AnimationIgnored);
        assert_eq!(diag.len(), 2);
        assert_eq!(diag.warnings[0], Warning::SelfParent { frame_id: 3 });
    }
}
