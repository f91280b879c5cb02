//! Morph target blocks, addressed by `(target, LOD, channel)`.
//!
//! ```text
//! [1 byte]  target count (0: block ends here)
//! [1 byte]  channel count
//! [1 byte]  LOD count
//! per LOD:
//!     per channel:
//!         [2 bytes]  vertex count (0: channel empty, nothing follows)
//!         per vertex, per target: position vec3, normal vec3
//!         [1 byte]   has remap
//!         if has remap: [2 bytes × vertex count] vertex indices
//!     [40 bytes] cached bounds: min vec3, max vec3, center vec3, radius f32
//! ```

use std::io::{Read, Seek, Write};

use binrw::{binrw, BinRead, BinResult, BinWrite, Endian};

use super::primitive::{narrow_count, read_many, write_many, FileVec3};
use crate::math::Bounds;

#[binrw]
#[derive(Debug, Clone, Copy, PartialEq)]
#[brw(little)]
pub struct MorphVertexRecord {
    pub position: FileVec3,
    pub normal: FileVec3,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MorphChannelRecord {
    /// `vertices[i][t]` is listed vertex `i` in target `t`.
    pub vertices: Vec<Vec<MorphVertexRecord>>,
    pub remap: Option<Vec<u16>>,
}

impl MorphChannelRecord {
    /// Mesh vertex index of every listed vertex.
    pub fn indices(&self) -> Vec<u16> {
        match &self.remap {
            Some(remap) => remap.clone(),
            None => (0..self.vertices.len() as u16).collect(),
        }
    }
}

#[binrw]
#[derive(Debug, Clone, Copy, PartialEq)]
#[brw(little)]
pub struct MorphBounds {
    pub min: FileVec3,
    pub max: FileVec3,
    pub center: FileVec3,
    pub radius: f32,
}

impl MorphBounds {
    pub fn from_bounds(b: Bounds) -> Self {
        MorphBounds {
            min: FileVec3(b.min),
            max: FileVec3(b.max),
            center: FileVec3(b.center()),
            radius: b.diagonal(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MorphLodRecord {
    pub channels: Vec<MorphChannelRecord>,
    pub bounds: MorphBounds,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MorphRecord {
    pub target_count: u8,
    pub channel_count: u8,
    /// LOD count as stored; `lods` may hold fewer after clamping.
    pub declared_lods: u8,
    pub lods: Vec<MorphLodRecord>,
}

impl MorphRecord {
    pub fn is_empty(&self) -> bool {
        self.target_count == 0
    }
}

impl BinRead for MorphRecord {
    /// Number of geometry LODs the owning visual actually decoded.
    type Args<'a> = (u8,);

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        endian: Endian,
        args: Self::Args<'_>,
    ) -> BinResult<Self> {
        let target_count = u8::read_options(reader, endian, ())?;
        if target_count == 0 {
            return Ok(MorphRecord::default());
        }
        let channel_count = u8::read_options(reader, endian, ())?;
        let declared_lods = u8::read_options(reader, endian, ())?;
        let lod_count = declared_lods.min(args.0);

        let mut lods = Vec::with_capacity(lod_count as usize);
        for _ in 0..lod_count {
            let mut channels = Vec::with_capacity(channel_count as usize);
            for _ in 0..channel_count {
                let count = u16::read_options(reader, endian, ())? as usize;
                if count == 0 {
                    channels.push(MorphChannelRecord::default());
                    continue;
                }
                let mut vertices = Vec::with_capacity(count);
                for _ in 0..count {
                    vertices.push(read_many(reader, endian, target_count as usize)?);
                }
                let has_remap = u8::read_options(reader, endian, ())? != 0;
                let remap = if has_remap {
                    Some(read_many(reader, endian, count)?)
                } else {
                    None
                };
                channels.push(MorphChannelRecord { vertices, remap });
            }
            let bounds = MorphBounds::read_options(reader, endian, ())?;
            lods.push(MorphLodRecord { channels, bounds });
        }

        Ok(MorphRecord {
            target_count,
            channel_count,
            declared_lods,
            lods,
        })
    }
}

impl BinWrite for MorphRecord {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        endian: Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<()> {
        self.target_count.write_options(writer, endian, ())?;
        if self.target_count == 0 {
            return Ok(());
        }
        self.channel_count.write_options(writer, endian, ())?;
        narrow_count::<u8, _>(writer, self.lods.len(), "morph LODs")?.write_options(writer, endian, ())?;

        for lod in &self.lods {
            for channel in &lod.channels {
                narrow_count::<u16, _>(writer, channel.vertices.len(), "morph vertices")?
                    .write_options(writer, endian, ())?;
                if channel.vertices.is_empty() {
                    continue;
                }
                for targets in &channel.vertices {
                    write_many(writer, endian, targets)?;
                }
                match &channel.remap {
                    Some(remap) => {
                        1u8.write_options(writer, endian, ())?;
                        write_many(writer, endian, remap)?;
                    }
                    None => 0u8.write_options(writer, endian, ())?,
                }
            }
            lod.bounds.write_options(writer, endian, ())?;
        }
        Ok(())
    }
}

/// Parses `Target_<t>[_LOD<l>][_Channel<c>]`; missing parts default to 0.
pub fn parse_target_name(name: &str) -> Option<(u8, u8, u8)> {
    let mut parts = name.split('_');
    if parts.next()? != "Target" {
        return None;
    }
    let target = parts.next()?.parse().ok()?;
    let mut lod = 0;
    let mut channel = 0;
    for part in parts {
        if let Some(n) = part.strip_prefix("LOD") {
            lod = n.parse().ok()?;
        } else if let Some(n) = part.strip_prefix("Channel") {
            channel = n.parse().ok()?;
        }
    }
    Some((target, lod, channel))
}

pub fn target_name(target: u8, lod: u8, channel: u8) -> String {
    format!("Target_{target}_LOD{lod}_Channel{channel}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use binrw::{BinReaderExt, BinWriterExt};
    use cgmath::Vector3;
    use std::io::Cursor;

    fn mv(x: f32) -> MorphVertexRecord {
        MorphVertexRecord {
            position: FileVec3(Vector3::new(x, 0.0, 0.0)),
            normal: FileVec3(Vector3::new(0.0, 0.0, 1.0)),
        }
    }

    fn bounds() -> MorphBounds {
        MorphBounds::from_bounds(Bounds::new(
            Vector3::new(-1.0, -1.0, -1.0),
            Vector3::new(1.0, 1.0, 1.0),
        ))
    }

    #[test]
    fn test_names() {
        assert_eq!(target_name(3, 2, 1), "Target_3_LOD2_Channel1");
        assert_eq!(parse_target_name("Target_3_LOD2_Channel1"), Some((3, 2, 1)));
        assert_eq!(parse_target_name("Target_4"), Some((4, 0, 0)));
        assert_eq!(parse_target_name("Basis"), None);
        assert_eq!(parse_target_name("Target_x_LOD0"), None);
        assert_eq!(parse_target_name("Target_1_LODz"), None);
    }

    #[test]
    fn test_empty_block_is_one_byte() {
        let mut out = Cursor::new(Vec::new());
        out.write_le(&MorphRecord::default()).unwrap();
        assert_eq!(out.into_inner(), vec![0u8]);

        let rec = MorphRecord::read_le_args(&mut Cursor::new(&[0u8][..]), (3,)).unwrap();
        assert!(rec.is_empty());
    }

    #[test]
    fn test_sparse_and_empty_channels() {
        let rec = MorphRecord {
            target_count: 2,
            channel_count: 2,
            declared_lods: 1,
            lods: vec![MorphLodRecord {
                channels: vec![
                    MorphChannelRecord::default(),
                    MorphChannelRecord {
                        vertices: vec![vec![mv(1.0), mv(2.0)], vec![mv(3.0), mv(4.0)]],
                        remap: Some(vec![5, 9]),
                    },
                ],
                bounds: bounds(),
            }],
        };
        let mut out = Cursor::new(Vec::new());
        out.write_le(&rec).unwrap();
        let bytes = out.into_inner();
        // header 3 + empty channel 2 + count 2 + 2×2×24 + flag 1 + remap 4 + bounds 40
        assert_eq!(bytes.len(), 3 + 2 + 2 + 96 + 1 + 4 + 40);

        let back = MorphRecord::read_le_args(&mut Cursor::new(&bytes), (1,)).unwrap();
        assert_eq!(back, rec);
        assert_eq!(back.lods[0].channels[1].indices(), vec![5, 9]);
    }

    #[test]
    fn test_dense_channel_has_implicit_indices() {
        let channel = MorphChannelRecord {
            vertices: vec![vec![mv(0.0)], vec![mv(1.0)], vec![mv(2.0)]],
            remap: None,
        };
        assert_eq!(channel.indices(), vec![0, 1, 2]);
    }

    #[test]
    fn test_lod_count_is_clamped() {
        let rec = MorphRecord {
            target_count: 1,
            channel_count: 1,
            declared_lods: 2,
            lods: vec![
                MorphLodRecord {
                    channels: vec![MorphChannelRecord::default()],
                    bounds: bounds(),
                },
                MorphLodRecord {
                    channels: vec![MorphChannelRecord::default()],
                    bounds: bounds(),
                },
            ],
        };
        let mut out = Cursor::new(Vec::new());
        out.write_le(&rec).unwrap();
        let bytes = out.into_inner();

        let mut cursor = Cursor::new(&bytes);
        let back = MorphRecord::read_le_args(&mut cursor, (1,)).unwrap();
        assert_eq!(back.declared_lods, 2);
        assert_eq!(back.lods.len(), 1);
        // header 3 + one LOD (empty channel 2 + bounds 40)
        assert_eq!(cursor.position(), 3 + 42);
    }
}
