//! Visual object geometry: LOD vertex buffers and material face groups.
//!
//! ```text
//! [2 bytes]  instance id (non-zero: shares another frame's geometry, nothing follows)
//! [1 byte]   LOD count
//! per LOD:
//!     [4 bytes]   distance
//!     [2 bytes]   vertex count
//!     per vertex: position vec3, normal vec3, uv
//!     [1 byte]    face group count
//!     per group:  [2 bytes] triangle count, triangles, [2 bytes] material id (0 = none)
//! ```

use std::collections::HashMap;
use std::io::{Read, Seek, Write};

use binrw::{binrw, BinRead, BinResult, BinWrite, Endian};
use cgmath::Vector2;

use super::primitive::{narrow_count, read_many, write_many, FileTriangle, FileUv, FileVec3};
use super::skin::SkinClass;
use crate::error::{FourDsError, Result};
use crate::math::{Bounds, Vec3};

pub const MAX_LODS: usize = u8::MAX as usize;
pub const MAX_VERTICES: usize = u16::MAX as usize;
pub const MAX_FACES: usize = u16::MAX as usize;
pub const MAX_FACE_GROUPS: usize = u8::MAX as usize;

#[binrw]
#[derive(Debug, Clone, Copy, PartialEq)]
#[brw(little)]
pub struct FileVertex {
    pub position: FileVec3,
    pub normal: FileVec3,
    pub uv: FileUv,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FaceGroupRecord {
    pub triangles: Vec<FileTriangle>,
    pub material_id: u16,
}

impl BinRead for FaceGroupRecord {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        endian: Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<Self> {
        let count = u16::read_options(reader, endian, ())?;
        let triangles = read_many(reader, endian, count as usize)?;
        let material_id = u16::read_options(reader, endian, ())?;
        Ok(FaceGroupRecord {
            triangles,
            material_id,
        })
    }
}

impl BinWrite for FaceGroupRecord {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        endian: Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<()> {
        narrow_count::<u16, _>(writer, self.triangles.len(), "face group triangles")?
            .write_options(writer, endian, ())?;
        write_many(writer, endian, &self.triangles)?;
        self.material_id.write_options(writer, endian, ())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LodRecord {
    pub distance: f32,
    pub vertices: Vec<FileVertex>,
    pub groups: Vec<FaceGroupRecord>,
}

impl LodRecord {
    pub fn bounds(&self) -> Bounds {
        Bounds::from_points(self.vertices.iter().map(|v| &v.position.0)).unwrap_or_default()
    }

    pub fn triangle_count(&self) -> usize {
        self.groups.iter().map(|g| g.triangles.len()).sum()
    }
}

impl BinRead for LodRecord {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        endian: Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<Self> {
        let distance = f32::read_options(reader, endian, ())?;
        let vertex_count = u16::read_options(reader, endian, ())?;
        let vertices = read_many(reader, endian, vertex_count as usize)?;
        let group_count = u8::read_options(reader, endian, ())?;
        let groups = read_many(reader, endian, group_count as usize)?;
        Ok(LodRecord {
            distance,
            vertices,
            groups,
        })
    }
}

impl BinWrite for LodRecord {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        endian: Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<()> {
        self.distance.write_options(writer, endian, ())?;
        narrow_count::<u16, _>(writer, self.vertices.len(), "LOD vertices")?
            .write_options(writer, endian, ())?;
        write_many(writer, endian, &self.vertices)?;
        narrow_count::<u8, _>(writer, self.groups.len(), "face groups")?
            .write_options(writer, endian, ())?;
        write_many(writer, endian, &self.groups)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectRecord {
    pub instance_id: u16,
    pub lods: Vec<LodRecord>,
}

impl BinRead for ObjectRecord {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        endian: Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<Self> {
        let instance_id = u16::read_options(reader, endian, ())?;
        if instance_id > 0 {
            return Ok(ObjectRecord {
                instance_id,
                lods: Vec::new(),
            });
        }
        let lod_count = u8::read_options(reader, endian, ())?;
        let lods = read_many(reader, endian, lod_count as usize)?;
        Ok(ObjectRecord { instance_id, lods })
    }
}

impl BinWrite for ObjectRecord {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        endian: Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<()> {
        self.instance_id.write_options(writer, endian, ())?;
        if self.instance_id > 0 {
            return Ok(());
        }
        narrow_count::<u8, _>(writer, self.lods.len(), "LODs")?.write_options(writer, endian, ())?;
        write_many(writer, endian, &self.lods)
    }
}

// ============================================================================
// Encode side: canonical vertex keys and deduplication
// ============================================================================

const KEY_SCALE: f64 = 1e5;

fn round5(v: f32) -> i64 {
    (v as f64 * KEY_SCALE).round() as i64
}

/// Position, normal and uv rounded to 5 decimals, plus the skin class so
/// corners bound to different bones never merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexKey {
    attrs: [i64; 8],
    skin: (u8, usize, i64),
}

impl VertexKey {
    pub fn new(position: Vec3, normal: Vec3, uv: Vector2<f32>, skin: SkinClass) -> Self {
        VertexKey {
            attrs: [
                round5(position.x),
                round5(position.y),
                round5(position.z),
                round5(normal.x),
                round5(normal.y),
                round5(normal.z),
                round5(uv.x),
                round5(uv.y),
            ],
            skin: skin.key(),
        }
    }
}

/// One output vertex before final ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct DedupVertex {
    pub vertex: FileVertex,
    /// Lowest source vertex index that produced this vertex.
    pub source: u32,
    pub skin: SkinClass,
    created: usize,
}

/// Collapses corners with equal [`VertexKey`]s into one stored vertex.
#[derive(Debug, Default)]
pub struct VertexDedup {
    index: HashMap<VertexKey, usize>,
    vertices: Vec<DedupVertex>,
}

impl VertexDedup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the provisional index of the corner's vertex.
    pub fn insert(
        &mut self,
        position: Vec3,
        normal: Vec3,
        uv: Vector2<f32>,
        source: u32,
        skin: SkinClass,
    ) -> usize {
        let key = VertexKey::new(position, normal, uv, skin);
        if let Some(&idx) = self.index.get(&key) {
            let v = &mut self.vertices[idx];
            v.source = v.source.min(source);
            return idx;
        }
        let idx = self.vertices.len();
        self.vertices.push(DedupVertex {
            vertex: FileVertex {
                position: FileVec3(position),
                normal: FileVec3(normal),
                uv: FileUv(uv),
            },
            source,
            skin,
            created: idx,
        });
        self.index.insert(key, idx);
        idx
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Sorts by (skin partition, source vertex, creation order) and returns
    /// the ordered vertices plus a provisional-to-final index map.
    pub fn finish(self) -> (Vec<DedupVertex>, Vec<usize>) {
        let mut order: Vec<usize> = (0..self.vertices.len()).collect();
        order.sort_by_key(|&i| {
            let v = &self.vertices[i];
            (v.skin.partition(), v.source, v.created)
        });

        let mut remap = vec![0usize; self.vertices.len()];
        for (final_idx, &provisional) in order.iter().enumerate() {
            remap[provisional] = final_idx;
        }

        let mut slots: Vec<Option<DedupVertex>> = self.vertices.into_iter().map(Some).collect();
        let ordered = order.iter().filter_map(|&i| slots[i].take()).collect();
        (ordered, remap)
    }
}

/// Fan triangulation of a corner loop: `(0, i, i + 1)`.
pub fn fan_triangulate(corners: &[usize]) -> Vec<[usize; 3]> {
    if corners.len() < 3 {
        return Vec::new();
    }
    (1..corners.len() - 1)
        .map(|i| [corners[0], corners[i], corners[i + 1]])
        .collect()
}

/// Format limits for one encoded LOD, checked before anything is written.
pub fn check_lod_capacity(lod: &LodRecord, what: &str) -> Result<()> {
    if lod.vertices.len() > MAX_VERTICES {
        return Err(FourDsError::capacity(
            format!("{what} vertices"),
            lod.vertices.len(),
            MAX_VERTICES,
        ));
    }
    let faces = lod.triangle_count();
    if faces > MAX_FACES {
        return Err(FourDsError::capacity(format!("{what} faces"), faces, MAX_FACES));
    }
    if lod.groups.len() > MAX_FACE_GROUPS {
        return Err(FourDsError::capacity(
            format!("{what} face groups"),
            lod.groups.len(),
            MAX_FACE_GROUPS,
        ));
    }
    Ok(())
}
