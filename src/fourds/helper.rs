//! Small frame payloads: dummy, target, billboard, mirror and joint.
//!
//! ```text
//! dummy:      min vec3, max vec3
//! target:     [2 bytes] flags, [1 byte] link count, link frame ids (u16)
//! billboard:  [4 bytes] rotation axis (1-based), [1 byte] rotation mode (1-based)
//! mirror:     min vec3, max vec3, center vec3, radius f32,
//!             16 × f32 view matrix, rgb 3 × f32, reflection distance f32,
//!             trimesh
//! joint:      12 × f32 matrix (3 rows × 4 columns), [4 bytes] file bone id
//! ```

use std::io::{Read, Seek, Write};

use binrw::{binrw, BinRead, BinResult, BinWrite, Endian};

use super::primitive::{narrow_count, read_many, write_many, FileVec3};
use super::sector::TriMeshRecord;

#[binrw]
#[derive(Debug, Clone, Copy, PartialEq)]
#[brw(little)]
pub struct DummyRecord {
    pub min: FileVec3,
    pub max: FileVec3,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TargetRecord {
    pub flags: u16,
    pub links: Vec<u16>,
}

impl BinRead for TargetRecord {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        endian: Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<Self> {
        let flags = u16::read_options(reader, endian, ())?;
        let count = u8::read_options(reader, endian, ())?;
        let links = read_many(reader, endian, count as usize)?;
        Ok(TargetRecord { flags, links })
    }
}

impl BinWrite for TargetRecord {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        endian: Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<()> {
        self.flags.write_options(writer, endian, ())?;
        narrow_count::<u8, _>(writer, self.links.len(), "target links")?
            .write_options(writer, endian, ())?;
        write_many(writer, endian, &self.links)
    }
}

#[binrw]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[brw(little)]
pub struct BillboardRecord {
    pub rotation_axis: u32,
    pub rotation_mode: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MirrorRecord {
    pub min: FileVec3,
    pub max: FileVec3,
    pub center: FileVec3,
    pub radius: f32,
    pub matrix: [f32; 16],
    pub color: [f32; 3],
    pub distance: f32,
    pub mesh: TriMeshRecord,
}

impl BinRead for MirrorRecord {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        endian: Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<Self> {
        Ok(MirrorRecord {
            min: FileVec3::read_options(reader, endian, ())?,
            max: FileVec3::read_options(reader, endian, ())?,
            center: FileVec3::read_options(reader, endian, ())?,
            radius: f32::read_options(reader, endian, ())?,
            matrix: <[f32; 16]>::read_options(reader, endian, ())?,
            color: <[f32; 3]>::read_options(reader, endian, ())?,
            distance: f32::read_options(reader, endian, ())?,
            mesh: TriMeshRecord::read_options(reader, endian, ())?,
        })
    }
}

impl BinWrite for MirrorRecord {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        endian: Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<()> {
        self.min.write_options(writer, endian, ())?;
        self.max.write_options(writer, endian, ())?;
        self.center.write_options(writer, endian, ())?;
        self.radius.write_options(writer, endian, ())?;
        self.matrix.write_options(writer, endian, ())?;
        self.color.write_options(writer, endian, ())?;
        self.distance.write_options(writer, endian, ())?;
        self.mesh.write_options(writer, endian, ())
    }
}

#[binrw]
#[derive(Debug, Clone, Copy, PartialEq)]
#[brw(little)]
pub struct JointRecord {
    /// Row-major 4x4, translation in the last column of the top three rows.
    pub matrix: [f32; 16],
    pub file_bone_id: u32,
}
