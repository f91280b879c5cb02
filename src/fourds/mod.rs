//! LS3D 4DS container: header, material table, frame list, animation flag.
//!
//! ```text
//! [4 bytes]  magic "4DS\0"
//! [2 bytes]  version (29; 41 and 42 are recognised, not decoded)
//! [8 bytes]  timestamp, FILETIME
//! [2 bytes]  material count, materials
//! [2 bytes]  frame count, frames
//! [1 byte]   has animation
//! ```
//!
//! This layer keeps the on-disk record structure. Axis permutation and
//! winding are already applied by the primitive codec, everything else
//! (ids, bone references, morph addressing) is left as stored.

pub mod frame;
pub mod geometry;
pub mod helper;
pub mod material;
pub mod morph;
pub mod primitive;
pub mod sector;
pub mod skin;

use std::io::{Cursor, Seek};

use binrw::{BinRead, BinWrite, Endian};
use chrono::{DateTime, Utc};

use crate::error::{Diagnostics, FourDsError, Result, Warning};
use frame::{read_frame, FrameRecord};
use material::MaterialRecord;

pub const MAGIC: [u8; 4] = *b"4DS\0";
pub const VERSION_MAFIA: u16 = 29;
pub const VERSION_HD2: u16 = 41;
pub const VERSION_CHAMELEON: u16 = 42;
pub const MAX_MATERIALS: usize = u16::MAX as usize;
pub const MAX_FRAMES: usize = u16::MAX as usize;

/// Seconds between 1601-01-01 and the unix epoch.
const FILETIME_EPOCH_OFFSET: i64 = 11_644_473_600;
const FILETIME_TICKS_PER_SECOND: u64 = 10_000_000;

/// Current time as a Windows FILETIME (100 ns ticks since 1601).
pub fn now_filetime() -> u64 {
    datetime_to_filetime(Utc::now())
}

/// Saturates at `u64::MAX` past the last representable FILETIME.
pub fn datetime_to_filetime(time: DateTime<Utc>) -> u64 {
    let secs = time.timestamp().saturating_add(FILETIME_EPOCH_OFFSET).max(0) as u64;
    secs.saturating_mul(FILETIME_TICKS_PER_SECOND)
        .saturating_add(u64::from(time.timestamp_subsec_nanos() / 100))
}

/// `None` for stamps before the unix epoch range chrono can represent.
pub fn filetime_to_datetime(filetime: u64) -> Option<DateTime<Utc>> {
    let secs = (filetime / FILETIME_TICKS_PER_SECOND) as i64 - FILETIME_EPOCH_OFFSET;
    let nanos = ((filetime % FILETIME_TICKS_PER_SECOND) * 100) as u32;
    DateTime::from_timestamp(secs, nanos)
}

/// A whole 4DS file in record form.
#[derive(Debug, Clone, PartialEq)]
pub struct FourDsFile {
    pub version: u16,
    pub timestamp: u64,
    pub materials: Vec<MaterialRecord>,
    pub frames: Vec<FrameRecord>,
    pub has_animation: bool,
    /// Parsing stopped early on an undecodable frame.
    pub partial: bool,
}

impl FourDsFile {
    pub fn new(timestamp: u64) -> Self {
        FourDsFile {
            version: VERSION_MAFIA,
            timestamp,
            materials: Vec::new(),
            frames: Vec::new(),
            has_animation: false,
            partial: false,
        }
    }
}

fn read_u16(cursor: &mut Cursor<&[u8]>) -> Result<u16> {
    u16::read_options(cursor, Endian::Little, ())
        .map_err(|e| FourDsError::from(e).at_offset(cursor.position()))
}

/// Parses a complete file.
///
/// With `strict` unset, an unknown frame type or unsupported visual stops
/// the frame loop instead of failing: the frames read so far are kept and
/// the file is marked `partial`. Truncation is always fatal.
pub fn parse_4ds(data: &[u8], strict: bool) -> Result<(FourDsFile, Diagnostics)> {
    let mut diagnostics = Diagnostics::default();
    let mut cursor = Cursor::new(data);

    let mut magic = [0u8; 4];
    if data.len() < 4 {
        return Err(FourDsError::Truncated {
            offset: data.len() as u64,
        });
    }
    magic.copy_from_slice(&data[..4]);
    if magic != MAGIC {
        return Err(FourDsError::BadMagic { found: magic });
    }
    cursor.set_position(4);

    let version = read_u16(&mut cursor)?;
    if version != VERSION_MAFIA {
        return Err(FourDsError::UnsupportedVersion { version });
    }
    let timestamp = u64::read_options(&mut cursor, Endian::Little, ())
        .map_err(|e| FourDsError::from(e).at_offset(cursor.position()))?;

    let material_count = read_u16(&mut cursor)?;
    log::info!("4DS v{version}: {material_count} materials");
    let mut materials = Vec::with_capacity(material_count as usize);
    for _ in 0..material_count {
        let record = MaterialRecord::read_options(&mut cursor, Endian::Little, ())
            .map_err(|e| FourDsError::from(e).at_offset(cursor.position()))?;
        materials.push(record);
    }

    let frame_count = read_u16(&mut cursor)?;
    log::info!("4DS v{version}: {frame_count} frames");
    let mut frames = Vec::with_capacity(frame_count as usize);
    let mut partial = false;
    for index in 0..frame_count {
        let frame_id = index + 1;
        match read_frame(&mut cursor, frame_id) {
            Ok(frame) => frames.push(frame),
            Err(
                err @ (FourDsError::UnknownFrameType { .. } | FourDsError::UnsupportedVisual { .. }),
            ) if !strict => {
                diagnostics.warn(Warning::FrameSkipped {
                    frame_id,
                    reason: err.to_string(),
                });
                partial = true;
                break;
            }
            Err(err) => return Err(err),
        }
    }

    let has_animation = if partial {
        false
    } else {
        let flag = u8::read_options(&mut cursor, Endian::Little, ())
            .map_err(|e| FourDsError::from(e).at_offset(cursor.position()))?;
        flag != 0
    };
    if has_animation {
        diagnostics.warn(Warning::AnimationIgnored);
    }

    Ok((
        FourDsFile {
            version,
            timestamp,
            materials,
            frames,
            has_animation,
            partial,
        },
        diagnostics,
    ))
}

/// Serialises a file. Table sizes are checked before any byte is written.
pub fn write_4ds(file: &FourDsFile) -> Result<Vec<u8>> {
    if file.version != VERSION_MAFIA {
        return Err(FourDsError::UnsupportedVersion {
            version: file.version,
        });
    }
    if file.materials.len() > MAX_MATERIALS {
        return Err(FourDsError::capacity(
            "materials",
            file.materials.len(),
            MAX_MATERIALS,
        ));
    }
    if file.frames.len() > MAX_FRAMES {
        return Err(FourDsError::capacity("frames", file.frames.len(), MAX_FRAMES));
    }

    let mut cursor = Cursor::new(Vec::new());
    let le = Endian::Little;
    MAGIC.write_options(&mut cursor, le, ())?;
    file.version.write_options(&mut cursor, le, ())?;
    file.timestamp.write_options(&mut cursor, le, ())?;
    (file.materials.len() as u16).write_options(&mut cursor, le, ())?;
    for material in &file.materials {
        material.write_options(&mut cursor, le, ())?;
    }
    (file.frames.len() as u16).write_options(&mut cursor, le, ())?;
    for frame in &file.frames {
        frame.write_options(&mut cursor, le, ())?;
    }
    u8::from(file.has_animation).write_options(&mut cursor, le, ())?;
    log::debug!("wrote {} bytes", cursor.stream_position()?);
    Ok(cursor.into_inner())
}
