//! Sector, portal and occluder payloads.
//!
//! ```text
//! trimesh:
//!     [4 bytes]  vertex count
//!     [4 bytes]  triangle count
//!     positions (vec3), triangles (3 × u16)
//!
//! sector:
//!     [8 bytes]  flags (2 × u32)
//!     trimesh
//!     [24 bytes] bounds (min vec3, max vec3)
//!     [1 byte]   portal count
//!     portals
//!
//! portal:
//!     [1 byte]   vertex count
//!     [4 bytes]  flags
//!     [4 bytes]  near range
//!     [4 bytes]  far range
//!     [16 bytes] plane (normal vec3, dot f32)
//!     positions (vec3)
//!
//! occluder:
//!     trimesh
//! ```

use std::io::{Read, Seek, Write};

use binrw::{BinRead, BinResult, BinWrite, Endian};

use super::primitive::{narrow_count, read_many, write_many, FileTriangle, FileVec3};

pub const DEFAULT_SECTOR_FLAGS: [u32; 2] = [2049, 0];
pub const DEFAULT_PORTAL_FLAGS: u32 = 4;

/// Position-only triangle mesh shared by sectors, occluders and mirrors.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TriMeshRecord {
    pub positions: Vec<FileVec3>,
    pub triangles: Vec<FileTriangle>,
}

impl BinRead for TriMeshRecord {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        endian: Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<Self> {
        let vertex_count = u32::read_options(reader, endian, ())?;
        let triangle_count = u32::read_options(reader, endian, ())?;
        let positions = read_many(reader, endian, vertex_count as usize)?;
        let triangles = read_many(reader, endian, triangle_count as usize)?;
        Ok(TriMeshRecord {
            positions,
            triangles,
        })
    }
}

impl BinWrite for TriMeshRecord {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        endian: Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<()> {
        narrow_count::<u32, _>(writer, self.positions.len(), "mesh vertices")?
            .write_options(writer, endian, ())?;
        narrow_count::<u32, _>(writer, self.triangles.len(), "mesh triangles")?
            .write_options(writer, endian, ())?;
        write_many(writer, endian, &self.positions)?;
        write_many(writer, endian, &self.triangles)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortalRecord {
    pub flags: u32,
    pub near: f32,
    pub far: f32,
    pub normal: FileVec3,
    pub dot: f32,
    pub vertices: Vec<FileVec3>,
}

impl BinRead for PortalRecord {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        endian: Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<Self> {
        let vertex_count = u8::read_options(reader, endian, ())?;
        let flags = u32::read_options(reader, endian, ())?;
        let near = f32::read_options(reader, endian, ())?;
        let far = f32::read_options(reader, endian, ())?;
        let normal = FileVec3::read_options(reader, endian, ())?;
        let dot = f32::read_options(reader, endian, ())?;
        let vertices = read_many(reader, endian, vertex_count as usize)?;
        Ok(PortalRecord {
            flags,
            near,
            far,
            normal,
            dot,
            vertices,
        })
    }
}

impl BinWrite for PortalRecord {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        endian: Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<()> {
        narrow_count::<u8, _>(writer, self.vertices.len(), "portal vertices")?
            .write_options(writer, endian, ())?;
        self.flags.write_options(writer, endian, ())?;
        self.near.write_options(writer, endian, ())?;
        self.far.write_options(writer, endian, ())?;
        self.normal.write_options(writer, endian, ())?;
        self.dot.write_options(writer, endian, ())?;
        write_many(writer, endian, &self.vertices)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SectorRecord {
    pub flags: [u32; 2],
    pub mesh: TriMeshRecord,
    pub min: FileVec3,
    pub max: FileVec3,
    pub portals: Vec<PortalRecord>,
}

impl BinRead for SectorRecord {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        endian: Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<Self> {
        let flags = <[u32; 2]>::read_options(reader, endian, ())?;
        let mesh = TriMeshRecord::read_options(reader, endian, ())?;
        let min = FileVec3::read_options(reader, endian, ())?;
        let max = FileVec3::read_options(reader, endian, ())?;
        let portal_count = u8::read_options(reader, endian, ())?;
        let portals = read_many(reader, endian, portal_count as usize)?;
        Ok(SectorRecord {
            flags,
            mesh,
            min,
            max,
            portals,
        })
    }
}

impl BinWrite for SectorRecord {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        endian: Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<()> {
        self.flags.write_options(writer, endian, ())?;
        self.mesh.write_options(writer, endian, ())?;
        self.min.write_options(writer, endian, ())?;
        self.max.write_options(writer, endian, ())?;
        narrow_count::<u8, _>(writer, self.portals.len(), "portals")?
            .write_options(writer, endian, ())?;
        write_many(writer, endian, &self.portals)
    }
}
