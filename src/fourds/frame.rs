//! Frame records: type prefix, header, transform and typed body.
//!
//! ```text
//! [1 byte]   frame type
//! if visual: [1 byte] visual type, [2 bytes] render flags
//! [2 bytes]  parent frame id (0 = root)
//! [12 bytes] translation vec3
//! [12 bytes] scale vec3
//! [16 bytes] rotation quat (w, x, z, y)
//! [1 byte]   cull flags
//! string     name
//! string     user properties
//! body, by type
//! ```
//!
//! Frames carry no length field. A body that cannot be decoded leaves the
//! stream at an unknown position, so every such case is an error here and
//! the caller decides whether to stop.

use std::io::{Read, Seek, Write};

use binrw::{binrw, BinRead, BinResult, BinWrite, Endian};
use serde::{Deserialize, Serialize};

use super::geometry::ObjectRecord;
use super::helper::{BillboardRecord, DummyRecord, JointRecord, MirrorRecord, TargetRecord};
use super::morph::MorphRecord;
use super::primitive::{FileQuat, FileVec3, LString};
use super::sector::{SectorRecord, TriMeshRecord};
use super::skin::SkinLodRecord;
use crate::error::{FourDsError, Result};

pub const DEFAULT_RENDER_FLAGS: [u8; 2] = [128, 42];
pub const DEFAULT_CULL_FLAGS: u8 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameType {
    Visual,
    Light,
    Camera,
    Sound,
    Sector,
    Dummy,
    Target,
    User,
    Model,
    Joint,
    Volume,
    Occluder,
    Scene,
    Area,
    Landscape,
}

impl FrameType {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            1 => FrameType::Visual,
            2 => FrameType::Light,
            3 => FrameType::Camera,
            4 => FrameType::Sound,
            5 => FrameType::Sector,
            6 => FrameType::Dummy,
            7 => FrameType::Target,
            8 => FrameType::User,
            9 => FrameType::Model,
            10 => FrameType::Joint,
            11 => FrameType::Volume,
            12 => FrameType::Occluder,
            13 => FrameType::Scene,
            14 => FrameType::Area,
            15 => FrameType::Landscape,
            _ => return None,
        })
    }

    pub fn as_u8(self) -> u8 {
        match self {
            FrameType::Visual => 1,
            FrameType::Light => 2,
            FrameType::Camera => 3,
            FrameType::Sound => 4,
            FrameType::Sector => 5,
            FrameType::Dummy => 6,
            FrameType::Target => 7,
            FrameType::User => 8,
            FrameType::Model => 9,
            FrameType::Joint => 10,
            FrameType::Volume => 11,
            FrameType::Occluder => 12,
            FrameType::Scene => 13,
            FrameType::Area => 14,
            FrameType::Landscape => 15,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VisualType {
    Object,
    LitObject,
    SingleMesh,
    SingleMorph,
    Billboard,
    Morph,
    Lens,
    Projector,
    Mirror,
    Emitter,
    Shadow,
    LandPatch,
}

impl VisualType {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => VisualType::Object,
            1 => VisualType::LitObject,
            2 => VisualType::SingleMesh,
            3 => VisualType::SingleMorph,
            4 => VisualType::Billboard,
            5 => VisualType::Morph,
            6 => VisualType::Lens,
            7 => VisualType::Projector,
            8 => VisualType::Mirror,
            9 => VisualType::Emitter,
            10 => VisualType::Shadow,
            11 => VisualType::LandPatch,
            _ => return None,
        })
    }

    pub fn as_u8(self) -> u8 {
        match self {
            VisualType::Object => 0,
            VisualType::LitObject => 1,
            VisualType::SingleMesh => 2,
            VisualType::SingleMorph => 3,
            VisualType::Billboard => 4,
            VisualType::Morph => 5,
            VisualType::Lens => 6,
            VisualType::Projector => 7,
            VisualType::Mirror => 8,
            VisualType::Emitter => 9,
            VisualType::Shadow => 10,
            VisualType::LandPatch => 11,
        }
    }
}

/// Everything between the type prefix and the body.
#[binrw]
#[derive(Debug, Clone, PartialEq)]
#[brw(little)]
pub struct FrameHeader {
    pub parent_id: u16,
    pub translation: FileVec3,
    pub scale: FileVec3,
    pub rotation: FileQuat,
    pub cull_flags: u8,
    pub name: LString,
    pub user_props: LString,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VisualBody {
    Object(ObjectRecord),
    LitObject(ObjectRecord),
    SingleMesh {
        object: ObjectRecord,
        skin: Vec<SkinLodRecord>,
    },
    SingleMorph {
        object: ObjectRecord,
        skin: Vec<SkinLodRecord>,
        morph: MorphRecord,
    },
    Billboard {
        object: ObjectRecord,
        billboard: BillboardRecord,
    },
    Morph {
        object: ObjectRecord,
        morph: MorphRecord,
    },
    Mirror(MirrorRecord),
}

impl VisualBody {
    pub fn visual_type(&self) -> VisualType {
        match self {
            VisualBody::Object(_) => VisualType::Object,
            VisualBody::LitObject(_) => VisualType::LitObject,
            VisualBody::SingleMesh { .. } => VisualType::SingleMesh,
            VisualBody::SingleMorph { .. } => VisualType::SingleMorph,
            VisualBody::Billboard { .. } => VisualType::Billboard,
            VisualBody::Morph { .. } => VisualType::Morph,
            VisualBody::Mirror(_) => VisualType::Mirror,
        }
    }

    pub fn object(&self) -> Option<&ObjectRecord> {
        match self {
            VisualBody::Object(object)
            | VisualBody::LitObject(object)
            | VisualBody::SingleMesh { object, .. }
            | VisualBody::SingleMorph { object, .. }
            | VisualBody::Billboard { object, .. }
            | VisualBody::Morph { object, .. } => Some(object),
            VisualBody::Mirror(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameBody {
    Visual {
        render_flags: [u8; 2],
        visual: VisualBody,
    },
    Sector(SectorRecord),
    Dummy(DummyRecord),
    Target(TargetRecord),
    Occluder(TriMeshRecord),
    Joint(JointRecord),
}

impl FrameBody {
    pub fn frame_type(&self) -> FrameType {
        match self {
            FrameBody::Visual { .. } => FrameType::Visual,
            FrameBody::Sector(_) => FrameType::Sector,
            FrameBody::Dummy(_) => FrameType::Dummy,
            FrameBody::Target(_) => FrameType::Target,
            FrameBody::Occluder(_) => FrameType::Occluder,
            FrameBody::Joint(_) => FrameType::Joint,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameRecord {
    pub header: FrameHeader,
    pub body: FrameBody,
}

fn read_skin<R: Read + Seek>(reader: &mut R, lod_count: usize) -> BinResult<Vec<SkinLodRecord>> {
    let mut lods = Vec::with_capacity(lod_count);
    for _ in 0..lod_count {
        lods.push(SkinLodRecord::read_options(reader, Endian::Little, ())?);
    }
    Ok(lods)
}

fn read_visual<R: Read + Seek>(
    reader: &mut R,
    frame_id: u16,
    visual_type: u8,
) -> Result<VisualBody> {
    let le = Endian::Little;
    let unsupported = FourDsError::UnsupportedVisual {
        frame_id,
        visual_type,
    };
    let kind = VisualType::from_u8(visual_type).ok_or(unsupported)?;

    let body = match kind {
        VisualType::Object => VisualBody::Object(ObjectRecord::read_options(reader, le, ())?),
        VisualType::LitObject => VisualBody::LitObject(ObjectRecord::read_options(reader, le, ())?),
        VisualType::SingleMesh => {
            let object = ObjectRecord::read_options(reader, le, ())?;
            let skin = read_skin(reader, object.lods.len())?;
            VisualBody::SingleMesh { object, skin }
        }
        VisualType::SingleMorph => {
            let object = ObjectRecord::read_options(reader, le, ())?;
            let skin = read_skin(reader, object.lods.len())?;
            let morph = MorphRecord::read_options(reader, le, (object.lods.len() as u8,))?;
            VisualBody::SingleMorph {
                object,
                skin,
                morph,
            }
        }
        VisualType::Billboard => {
            let object = ObjectRecord::read_options(reader, le, ())?;
            let billboard = BillboardRecord::read_options(reader, le, ())?;
            VisualBody::Billboard { object, billboard }
        }
        VisualType::Morph => {
            let object = ObjectRecord::read_options(reader, le, ())?;
            let morph = MorphRecord::read_options(reader, le, (object.lods.len() as u8,))?;
            VisualBody::Morph { object, morph }
        }
        VisualType::Mirror => VisualBody::Mirror(MirrorRecord::read_options(reader, le, ())?),
        VisualType::Lens
        | VisualType::Projector
        | VisualType::Emitter
        | VisualType::Shadow
        | VisualType::LandPatch => {
            return Err(FourDsError::UnsupportedVisual {
                frame_id,
                visual_type,
            })
        }
    };
    Ok(body)
}

fn read_frame_inner<R: Read + Seek>(reader: &mut R, frame_id: u16) -> Result<FrameRecord> {
    let le = Endian::Little;
    let frame_type = u8::read_options(reader, le, ())?;
    let unknown = FourDsError::UnknownFrameType {
        frame_id,
        frame_type,
    };
    let kind = FrameType::from_u8(frame_type).ok_or(unknown)?;

    let visual = if kind == FrameType::Visual {
        let visual_type = u8::read_options(reader, le, ())?;
        let render_flags = <[u8; 2]>::read_options(reader, le, ())?;
        Some((visual_type, render_flags))
    } else {
        None
    };

    let header = FrameHeader::read_options(reader, le, ())?;
    log::debug!(
        "frame {frame_id}: {:?} '{}' parent {}",
        kind,
        header.name.as_str(),
        header.parent_id
    );

    let body = match kind {
        FrameType::Visual => {
            let (visual_type, render_flags) = visual.unwrap_or((0, DEFAULT_RENDER_FLAGS));
            FrameBody::Visual {
                render_flags,
                visual: read_visual(reader, frame_id, visual_type)?,
            }
        }
        FrameType::Sector => FrameBody::Sector(SectorRecord::read_options(reader, le, ())?),
        FrameType::Dummy => FrameBody::Dummy(DummyRecord::read_options(reader, le, ())?),
        FrameType::Target => FrameBody::Target(TargetRecord::read_options(reader, le, ())?),
        FrameType::Occluder => FrameBody::Occluder(TriMeshRecord::read_options(reader, le, ())?),
        FrameType::Joint => FrameBody::Joint(JointRecord::read_options(reader, le, ())?),
        FrameType::Light
        | FrameType::Camera
        | FrameType::Sound
        | FrameType::User
        | FrameType::Model
        | FrameType::Volume
        | FrameType::Scene
        | FrameType::Area
        | FrameType::Landscape => {
            return Err(FourDsError::UnknownFrameType {
                frame_id,
                frame_type,
            })
        }
    };

    Ok(FrameRecord { header, body })
}

/// Reads one frame. `frame_id` is only used for error reporting.
pub fn read_frame<R: Read + Seek>(reader: &mut R, frame_id: u16) -> Result<FrameRecord> {
    read_frame_inner(reader, frame_id).map_err(|e| {
        let pos = reader.stream_position().unwrap_or(0);
        e.at_offset(pos)
    })
}

impl BinWrite for FrameRecord {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        endian: Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<()> {
        self.body.frame_type().as_u8().write_options(writer, endian, ())?;
        if let FrameBody::Visual {
            render_flags,
            visual,
        } = &self.body
        {
            visual.visual_type().as_u8().write_options(writer, endian, ())?;
            render_flags.write_options(writer, endian, ())?;
        }
        self.header.write_options(writer, endian, ())?;

        match &self.body {
            FrameBody::Visual { visual, .. } => match visual {
                VisualBody::Object(object) | VisualBody::LitObject(object) => {
                    object.write_options(writer, endian, ())
                }
                VisualBody::SingleMesh { object, skin } => {
                    object.write_options(writer, endian, ())?;
                    skin.write_options(writer, endian, ())
                }
                VisualBody::SingleMorph {
                    object,
                    skin,
                    morph,
                } => {
                    object.write_options(writer, endian, ())?;
                    skin.write_options(writer, endian, ())?;
                    morph.write_options(writer, endian, ())
                }
                VisualBody::Billboard { object, billboard } => {
                    object.write_options(writer, endian, ())?;
                    billboard.write_options(writer, endian, ())
                }
                VisualBody::Morph { object, morph } => {
                    object.write_options(writer, endian, ())?;
                    morph.write_options(writer, endian, ())
                }
                VisualBody::Mirror(mirror) => mirror.write_options(writer, endian, ()),
            },
            FrameBody::Sector(sector) => sector.write_options(writer, endian, ()),
            FrameBody::Dummy(dummy) => dummy.write_options(writer, endian, ()),
            FrameBody::Target(target) => target.write_options(writer, endian, ()),
            FrameBody::Occluder(mesh) => mesh.write_options(writer, endian, ()),
            FrameBody::Joint(joint) => joint.write_options(writer, endian, ()),
        }
    }
}
