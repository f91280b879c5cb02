//! Primitive codec shared by every 4DS record.
//!
//! ```text
//! scalars   little-endian u8 / u16 / u32 / u64 / f32
//! string    [1 byte] length, [length bytes] cp1250 text, no terminator
//! vec3      3 × f32, stored (x, z, y)
//! quat      4 × f32, stored (w, x, z, y)
//! uv        2 × f32, v stored as 1 - v
//! triangle  3 × u16, stored (a, c, b)
//! ```
//!
//! [`swap_yz`] is the only place the file/target axis permutation lives;
//! vectors, quaternions and matrices all go through it.

use std::io::{Read, Seek, Write};

use binrw::{binrw, BinRead, BinResult, BinWrite, Endian};
use cgmath::{Matrix4, Quaternion, Vector2, Vector3};
use encoding_rs::WINDOWS_1250;

use crate::error::{FourDsError, Result};
use crate::math::Vec3;

pub const MAX_STRING_LEN: usize = 255;

/// `(x, y, z) -> (x, z, y)`. Its own inverse.
pub fn swap_yz(v: Vec3) -> Vec3 {
    Vector3::new(v.x, v.z, v.y)
}

/// The permutation as a matrix, built column by column from [`swap_yz`].
pub fn permutation_matrix() -> Matrix4<f32> {
    let x = swap_yz(Vector3::new(1.0, 0.0, 0.0));
    let y = swap_yz(Vector3::new(0.0, 1.0, 0.0));
    let z = swap_yz(Vector3::new(0.0, 0.0, 1.0));
    Matrix4::from_cols(
        x.extend(0.0),
        y.extend(0.0),
        z.extend(0.0),
        Vector3::new(0.0, 0.0, 0.0).extend(1.0),
    )
}

#[binrw]
#[derive(Debug, Clone, Copy, PartialEq)]
#[brw(little)]
pub struct FileVec3(
    #[br(map = |raw: [f32; 3]| swap_yz(Vector3::new(raw[0], raw[1], raw[2])))]
    #[bw(map = |v: &Vector3<f32>| { let f = swap_yz(*v); [f.x, f.y, f.z] })]
    pub Vec3,
);

impl FileVec3 {
    pub fn zero() -> Self {
        FileVec3(Vector3::new(0.0, 0.0, 0.0))
    }
}

impl From<Vec3> for FileVec3 {
    fn from(v: Vec3) -> Self {
        FileVec3(v)
    }
}

#[binrw]
#[derive(Debug, Clone, Copy, PartialEq)]
#[brw(little)]
pub struct FileQuat(
    #[br(map = |raw: [f32; 4]| Quaternion::from_sv(raw[0], swap_yz(Vector3::new(raw[1], raw[2], raw[3]))))]
    #[bw(map = |q: &Quaternion<f32>| { let v = swap_yz(q.v); [q.s, v.x, v.y, v.z] })]
    pub Quaternion<f32>,
);

#[binrw]
#[derive(Debug, Clone, Copy, PartialEq)]
#[brw(little)]
pub struct FileUv(
    #[br(map = |raw: [f32; 2]| Vector2::new(raw[0], 1.0 - raw[1]))]
    #[bw(map = |uv: &Vector2<f32>| [uv.x, 1.0 - uv.y])]
    pub Vector2<f32>,
);

/// Triangle indices in target winding; storage order swaps the last two.
#[binrw]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[brw(little)]
pub struct FileTriangle(
    #[br(map = |raw: [u16; 3]| [raw[0], raw[2], raw[1]])]
    #[bw(map = |t: &[u16; 3]| [t[0], t[2], t[1]])]
    pub [u16; 3],
);

// ============================================================================
// Strings
// ============================================================================

/// Encodes to cp1250, rejecting text the code page cannot hold or that does
/// not fit the one-byte length prefix.
pub fn encode_cp1250(value: &str) -> Result<Vec<u8>> {
    let (bytes, _, had_errors) = WINDOWS_1250.encode(value);
    if had_errors {
        return Err(FourDsError::Unencodable {
            value: value.to_string(),
        });
    }
    if bytes.len() > MAX_STRING_LEN {
        return Err(FourDsError::StringTooLong {
            value: value.to_string(),
            len: bytes.len(),
        });
    }
    Ok(bytes.into_owned())
}

pub fn decode_cp1250(bytes: &[u8]) -> String {
    WINDOWS_1250
        .decode_without_bom_handling(bytes)
        .0
        .into_owned()
}

/// Length-prefixed cp1250 string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LString(pub String);

impl LString {
    /// Validated constructor; writing an unvalidated `LString` can still fail.
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        encode_cp1250(&value)?;
        Ok(LString(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for LString {
    fn from(value: &str) -> Self {
        LString(value.to_string())
    }
}

impl BinRead for LString {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        endian: Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<Self> {
        let len = u8::read_options(reader, endian, ())?;
        let mut buf = vec![0u8; len as usize];
        reader.read_exact(&mut buf)?;
        Ok(LString(decode_cp1250(&buf)))
    }
}

impl BinWrite for LString {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        endian: Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<()> {
        let bytes = encode_cp1250(&self.0).map_err(|e| binrw::Error::AssertFail {
            pos: writer.stream_position().unwrap_or(0),
            message: e.to_string(),
        })?;
        (bytes.len() as u8).write_options(writer, endian, ())?;
        writer.write_all(&bytes)?;
        Ok(())
    }
}

pub fn read_lstring<R: Read + Seek>(reader: &mut R, endian: Endian) -> BinResult<String> {
    Ok(LString::read_options(reader, endian, ())?.0)
}

pub fn write_lstring<W: Write + Seek>(writer: &mut W, endian: Endian, value: &str) -> BinResult<()> {
    LString(value.to_string()).write_options(writer, endian, ())
}

// ============================================================================
// Count-prefixed sequences
// ============================================================================

/// Narrows a length to its on-disk counter width. Lengths are validated
/// before any bytes are written, so a failure here means a bypassed check.
pub fn narrow_count<T: TryFrom<usize>, W: Seek>(writer: &mut W, len: usize, what: &str) -> BinResult<T> {
    T::try_from(len).map_err(|_| binrw::Error::AssertFail {
        pos: writer.stream_position().unwrap_or(0),
        message: format!("{what}: count {len} does not fit its counter"),
    })
}

pub fn read_many<T, R>(reader: &mut R, endian: Endian, count: usize) -> BinResult<Vec<T>>
where
    T: for<'a> BinRead<Args<'a> = ()>,
    R: Read + Seek,
{
    let mut items = Vec::with_capacity(count.min(4096));
    for _ in 0..count {
        items.push(T::read_options(reader, endian, ())?);
    }
    Ok(items)
}

pub fn write_many<T, W>(writer: &mut W, endian: Endian, items: &[T]) -> BinResult<()>
where
    T: for<'a> BinWrite<Args<'a> = ()>,
    W: Write + Seek,
{
    for item in items {
        item.write_options(writer, endian, ())?;
    }
    Ok(())
}
