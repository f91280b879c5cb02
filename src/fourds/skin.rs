//! Skin bindings of single-mesh visuals, one block per LOD.
//!
//! ```text
//! [1 byte]    bone count
//! [4 bytes]   vertices left to the root bone
//! [24 bytes]  LOD bounds (min vec3, max vec3)
//! per bone:
//!     [64 bytes]  inverse bind matrix, 16 × f32 row-major
//!     [4 bytes]   locked vertex count
//!     [4 bytes]   weighted vertex count
//!     [4 bytes]   file bone id (matches a joint frame)
//!     [24 bytes]  bone bounds
//!     [4 bytes × weighted] weights
//! ```
//!
//! Vertex indices are never stored. Bone n owns the next `locked + weighted`
//! vertices after everything owned by bones 0..n, locked first. Whatever is
//! left belongs to the skeleton root.

use std::io::{Read, Seek, Write};
use std::ops::Range;

use binrw::{BinRead, BinResult, BinWrite, Endian};

use super::geometry::DedupVertex;
use super::primitive::{narrow_count, read_many, write_many, FileVec3};
use crate::error::{FourDsError, Result};
use crate::math::Bounds;

pub const LOCKED_WEIGHT: f32 = 0.999;
pub const MIN_WEIGHT: f32 = 0.001;
pub const MAX_BONES: usize = u8::MAX as usize;

#[derive(Debug, Clone, PartialEq)]
pub struct SkinBoneRecord {
    pub inverse_bind: [f32; 16],
    pub locked: u32,
    pub file_bone_id: u32,
    pub min: FileVec3,
    pub max: FileVec3,
    pub weights: Vec<f32>,
}

impl BinRead for SkinBoneRecord {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        endian: Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<Self> {
        let inverse_bind = <[f32; 16]>::read_options(reader, endian, ())?;
        let locked = u32::read_options(reader, endian, ())?;
        let weighted = u32::read_options(reader, endian, ())?;
        let file_bone_id = u32::read_options(reader, endian, ())?;
        let min = FileVec3::read_options(reader, endian, ())?;
        let max = FileVec3::read_options(reader, endian, ())?;
        let weights = read_many(reader, endian, weighted as usize)?;
        Ok(SkinBoneRecord {
            inverse_bind,
            locked,
            file_bone_id,
            min,
            max,
            weights,
        })
    }
}

impl BinWrite for SkinBoneRecord {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        endian: Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<()> {
        self.inverse_bind.write_options(writer, endian, ())?;
        self.locked.write_options(writer, endian, ())?;
        narrow_count::<u32, _>(writer, self.weights.len(), "bone weights")?
            .write_options(writer, endian, ())?;
        self.file_bone_id.write_options(writer, endian, ())?;
        self.min.write_options(writer, endian, ())?;
        self.max.write_options(writer, endian, ())?;
        write_many(writer, endian, &self.weights)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkinLodRecord {
    pub unweighted: u32,
    pub min: FileVec3,
    pub max: FileVec3,
    pub bones: Vec<SkinBoneRecord>,
}

impl BinRead for SkinLodRecord {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        endian: Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<Self> {
        let bone_count = u8::read_options(reader, endian, ())?;
        let unweighted = u32::read_options(reader, endian, ())?;
        let min = FileVec3::read_options(reader, endian, ())?;
        let max = FileVec3::read_options(reader, endian, ())?;
        let bones = read_many(reader, endian, bone_count as usize)?;
        Ok(SkinLodRecord {
            unweighted,
            min,
            max,
            bones,
        })
    }
}

impl BinWrite for SkinLodRecord {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        endian: Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<()> {
        narrow_count::<u8, _>(writer, self.bones.len(), "skin bones")?
            .write_options(writer, endian, ())?;
        self.unweighted.write_options(writer, endian, ())?;
        self.min.write_options(writer, endian, ())?;
        self.max.write_options(writer, endian, ())?;
        write_many(writer, endian, &self.bones)
    }
}

// ============================================================================
// Running-counter partitions
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct BonePartition {
    pub file_bone_id: u32,
    pub locked: Range<usize>,
    pub weighted: Vec<(usize, f32)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkinPartition {
    pub bones: Vec<BonePartition>,
    pub root: Range<usize>,
    /// First claimed index at or past `vertex_count`, if any.
    pub overflow: Option<usize>,
}

impl SkinLodRecord {
    /// Replays the running vertex counter. Every range is clamped to
    /// `vertex_count`; claims past the end are dropped and the first one
    /// is kept in `overflow`.
    pub fn partition(&self, vertex_count: usize) -> SkinPartition {
        let mut counter = 0usize;
        let mut overflow = None;
        let mut bones = Vec::with_capacity(self.bones.len());
        for bone in &self.bones {
            let end = counter.saturating_add(bone.locked as usize);
            let locked = counter.min(vertex_count)..end.min(vertex_count);
            if end > vertex_count && overflow.is_none() {
                overflow = Some(counter.max(vertex_count));
            }
            counter = end;

            let mut weighted = Vec::with_capacity(bone.weights.len());
            for &w in &bone.weights {
                if counter < vertex_count {
                    weighted.push((counter, w));
                } else if overflow.is_none() {
                    overflow = Some(counter);
                }
                counter = counter.saturating_add(1);
            }
            bones.push(BonePartition {
                file_bone_id: bone.file_bone_id,
                locked,
                weighted,
            });
        }
        SkinPartition {
            bones,
            root: counter.min(vertex_count)..vertex_count,
            overflow,
        }
    }
}

/// How a vertex is stored in the skin block. Bone values index the
/// skeleton's declared bone order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SkinClass {
    Locked(usize),
    Weighted(usize, f32),
    Root,
}

impl SkinClass {
    /// Classifies a vertex by its dominant bone and that bone's weight.
    pub fn classify(bone: Option<usize>, weight: f32) -> Self {
        match bone {
            Some(b) if weight >= LOCKED_WEIGHT => SkinClass::Locked(b),
            Some(b) if weight > MIN_WEIGHT => SkinClass::Weighted(b, weight),
            _ => SkinClass::Root,
        }
    }

    /// Sort key that lays vertices out in running-counter order.
    pub fn partition(&self) -> (usize, u8) {
        match *self {
            SkinClass::Locked(b) => (b, 0),
            SkinClass::Weighted(b, _) => (b, 1),
            SkinClass::Root => (usize::MAX, 0),
        }
    }

    /// Hashable identity used inside dedup keys.
    pub fn key(&self) -> (u8, usize, i64) {
        match *self {
            SkinClass::Locked(b) => (0, b, 0),
            SkinClass::Weighted(b, w) => (1, b, (w as f64 * 1e5).round() as i64),
            SkinClass::Root => (2, 0, 0),
        }
    }
}

/// Per-bone data the encoder needs from the skeleton.
#[derive(Debug, Clone, PartialEq)]
pub struct SkinBoneSpec {
    pub file_bone_id: u32,
    pub inverse_bind: [f32; 16],
}

/// Builds one LOD's skin block from vertices already in partition order.
pub fn build_skin_lod(bones: &[SkinBoneSpec], vertices: &[DedupVertex]) -> Result<SkinLodRecord> {
    if bones.len() > MAX_BONES {
        return Err(FourDsError::capacity("skin bones", bones.len(), MAX_BONES));
    }
    let lod_bounds = Bounds::from_points(vertices.iter().map(|v| &v.vertex.position.0)).unwrap_or_default();

    let mut records = Vec::with_capacity(bones.len());
    for (index, spec) in bones.iter().enumerate() {
        let mut locked = 0u32;
        let mut weights = Vec::new();
        let mut claimed = Vec::new();
        for v in vertices {
            match v.skin {
                SkinClass::Locked(b) if b == index => {
                    locked += 1;
                    claimed.push(v.vertex.position.0);
                }
                SkinClass::Weighted(b, w) if b == index => {
                    weights.push(w);
                    claimed.push(v.vertex.position.0);
                }
                _ => {}
            }
        }
        let bounds = Bounds::from_points(claimed.iter()).unwrap_or(lod_bounds);
        records.push(SkinBoneRecord {
            inverse_bind: spec.inverse_bind,
            locked,
            file_bone_id: spec.file_bone_id,
            min: FileVec3(bounds.min),
            max: FileVec3(bounds.max),
            weights,
        });
    }

    let unweighted = vertices.iter().filter(|v| v.skin == SkinClass::Root).count();
    Ok(SkinLodRecord {
        unweighted: unweighted as u32,
        min: FileVec3(lod_bounds.min),
        max: FileVec3(lod_bounds.max),
        bones: records,
    })
}
