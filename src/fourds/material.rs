//! Material table entries.
//!
//! ```text
//! [4 bytes]   flags (MaterialFlags)
//! [12 bytes]  ambient rgb
//! [12 bytes]  diffuse rgb
//! [12 bytes]  emission rgb
//! [4 bytes]   opacity
//! if ENVMAP:                 [4 bytes] env intensity, string env texture
//!                            string diffuse texture
//! if ADDEFFECT && ALPHATEX:  string alpha texture
//! if ANIMTEXALPHA:           [14 bytes] opaque animation block
//! if ANIMTEXDIFF:            [14 bytes] opaque animation block
//! ```

use std::io::{Read, Seek, Write};

use binrw::{BinRead, BinResult, BinWrite, Endian};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use super::primitive::{read_lstring, write_lstring, LString};
use crate::error::Result;

pub const ANIM_BLOCK_LEN: usize = 14;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MaterialFlags: u32 {
        const UNLIT = 0x0000_0001;
        const NORMTEXBLEND = 0x0000_0100;
        const MULTIPLYTEXBLEND = 0x0000_0200;
        const ADDTEXBLEND = 0x0000_0400;
        const CALCREFLECTTEXY = 0x0000_1000;
        const PROJECTREFLECTTEXY = 0x0000_2000;
        const PROJECTREFLECTTEXZ = 0x0000_4000;
        const ADDEFFECT = 0x0000_8000;
        const DIFFUSETEX = 0x0004_0000;
        const ENVMAP = 0x0008_0000;
        const MIPMAP = 0x0080_0000;
        const ANIMTEXALPHA = 0x0200_0000;
        const ANIMTEXDIFF = 0x0400_0000;
        const COLORED = 0x0800_0000;
        const DOUBLESIDED = 0x1000_0000;
        const COLORKEY = 0x2000_0000;
        const ALPHATEX = 0x4000_0000;
        const ADDITIVEMIX = 0x8000_0000;
    }
}

/// On-disk material record. Conditional fields are `Some` exactly when the
/// gating flag is set.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialRecord {
    pub flags: MaterialFlags,
    pub ambient: [f32; 3],
    pub diffuse: [f32; 3],
    pub emission: [f32; 3],
    pub opacity: f32,
    pub env: Option<(f32, String)>,
    pub diffuse_texture: String,
    pub alpha_texture: Option<String>,
    pub anim_alpha: Option<[u8; ANIM_BLOCK_LEN]>,
    pub anim_diffuse: Option<[u8; ANIM_BLOCK_LEN]>,
}

impl BinRead for MaterialRecord {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        endian: Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<Self> {
        let flags = MaterialFlags::from_bits_retain(u32::read_options(reader, endian, ())?);
        let ambient = <[f32; 3]>::read_options(reader, endian, ())?;
        let diffuse = <[f32; 3]>::read_options(reader, endian, ())?;
        let emission = <[f32; 3]>::read_options(reader, endian, ())?;
        let opacity = f32::read_options(reader, endian, ())?;

        let env = if flags.contains(MaterialFlags::ENVMAP) {
            let intensity = f32::read_options(reader, endian, ())?;
            let texture = read_lstring(reader, endian)?.to_lowercase();
            Some((intensity, texture))
        } else {
            None
        };

        let diffuse_texture = read_lstring(reader, endian)?.to_lowercase();

        let alpha_texture = if flags.contains(MaterialFlags::ADDEFFECT | MaterialFlags::ALPHATEX) {
            Some(read_lstring(reader, endian)?.to_lowercase())
        } else {
            None
        };

        let anim_alpha = if flags.contains(MaterialFlags::ANIMTEXALPHA) {
            Some(<[u8; ANIM_BLOCK_LEN]>::read_options(reader, endian, ())?)
        } else {
            None
        };
        let anim_diffuse = if flags.contains(MaterialFlags::ANIMTEXDIFF) {
            Some(<[u8; ANIM_BLOCK_LEN]>::read_options(reader, endian, ())?)
        } else {
            None
        };

        Ok(MaterialRecord {
            flags,
            ambient,
            diffuse,
            emission,
            opacity,
            env,
            diffuse_texture,
            alpha_texture,
            anim_alpha,
            anim_diffuse,
        })
    }
}

impl BinWrite for MaterialRecord {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        endian: Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<()> {
        self.flags.bits().write_options(writer, endian, ())?;
        self.ambient.write_options(writer, endian, ())?;
        self.diffuse.write_options(writer, endian, ())?;
        self.emission.write_options(writer, endian, ())?;
        self.opacity.write_options(writer, endian, ())?;

        if self.flags.contains(MaterialFlags::ENVMAP) {
            let (intensity, texture) = self.env.clone().unwrap_or_default();
            intensity.write_options(writer, endian, ())?;
            write_lstring(writer, endian, &texture.to_uppercase())?;
        }

        write_lstring(writer, endian, &self.diffuse_texture.to_uppercase())?;

        if self.flags.contains(MaterialFlags::ADDEFFECT | MaterialFlags::ALPHATEX) {
            let alpha = self.alpha_texture.clone().unwrap_or_default();
            write_lstring(writer, endian, &alpha.to_uppercase())?;
        }

        if self.flags.contains(MaterialFlags::ANIMTEXALPHA) {
            self.anim_alpha
                .unwrap_or([0; ANIM_BLOCK_LEN])
                .write_options(writer, endian, ())?;
        }
        if self.flags.contains(MaterialFlags::ANIMTEXDIFF) {
            self.anim_diffuse
                .unwrap_or([0; ANIM_BLOCK_LEN])
                .write_options(writer, endian, ())?;
        }
        Ok(())
    }
}

// ============================================================================
// Semantic material
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TextureBlend {
    #[default]
    None,
    Normal,
    Multiply,
    Add,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvMap {
    pub intensity: f32,
    pub texture: String,
}

/// Host-facing material. Flags are derived from this state on encode rather
/// than stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub ambient: [f32; 3],
    pub diffuse: [f32; 3],
    pub emission: [f32; 3],
    pub opacity: f32,
    pub diffuse_texture: Option<String>,
    pub alpha_texture: Option<String>,
    pub env_map: Option<EnvMap>,
    /// Use the diffuse colour. Forced on when there is no diffuse texture.
    pub colored: bool,
    pub mipmap: bool,
    pub double_sided: bool,
    pub unlit: bool,
    pub color_key: bool,
    pub add_effect: bool,
    pub additive_mix: bool,
    pub texture_blend: TextureBlend,
    pub calc_reflect_y: bool,
    pub project_reflect_y: bool,
    pub project_reflect_z: bool,
    pub anim_alpha: Option<[u8; ANIM_BLOCK_LEN]>,
    pub anim_diffuse: Option<[u8; ANIM_BLOCK_LEN]>,
}

impl Default for Material {
    fn default() -> Self {
        Material {
            ambient: [0.5, 0.5, 0.5],
            diffuse: [1.0, 1.0, 1.0],
            emission: [0.0, 0.0, 0.0],
            opacity: 1.0,
            diffuse_texture: None,
            alpha_texture: None,
            env_map: None,
            colored: true,
            mipmap: false,
            double_sided: false,
            unlit: false,
            color_key: false,
            add_effect: false,
            additive_mix: false,
            texture_blend: TextureBlend::None,
            calc_reflect_y: false,
            project_reflect_y: false,
            project_reflect_z: false,
            anim_alpha: None,
            anim_diffuse: None,
        }
    }
}

fn non_empty(name: &str) -> Option<String> {
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

impl Material {
    pub fn solid(diffuse: [f32; 3]) -> Self {
        Material {
            diffuse,
            ..Default::default()
        }
    }

    pub fn textured(texture: &str) -> Self {
        Material {
            diffuse_texture: Some(texture.to_lowercase()),
            colored: false,
            mipmap: true,
            ..Default::default()
        }
    }

    pub fn from_record(record: &MaterialRecord) -> Self {
        let f = record.flags;
        let texture_blend = if f.contains(MaterialFlags::NORMTEXBLEND) {
            TextureBlend::Normal
        } else if f.contains(MaterialFlags::MULTIPLYTEXBLEND) {
            TextureBlend::Multiply
        } else if f.contains(MaterialFlags::ADDTEXBLEND) {
            TextureBlend::Add
        } else {
            TextureBlend::None
        };

        Material {
            ambient: record.ambient,
            diffuse: record.diffuse,
            emission: record.emission,
            opacity: record.opacity,
            diffuse_texture: non_empty(&record.diffuse_texture),
            alpha_texture: record.alpha_texture.as_deref().and_then(non_empty),
            env_map: record.env.as_ref().map(|(intensity, texture)| EnvMap {
                intensity: *intensity,
                texture: texture.clone(),
            }),
            colored: f.contains(MaterialFlags::COLORED),
            mipmap: f.contains(MaterialFlags::MIPMAP),
            double_sided: f.contains(MaterialFlags::DOUBLESIDED),
            unlit: f.contains(MaterialFlags::UNLIT),
            color_key: f.contains(MaterialFlags::COLORKEY),
            add_effect: f.contains(MaterialFlags::ADDEFFECT),
            additive_mix: f.contains(MaterialFlags::ADDITIVEMIX),
            texture_blend,
            calc_reflect_y: f.contains(MaterialFlags::CALCREFLECTTEXY),
            project_reflect_y: f.contains(MaterialFlags::PROJECTREFLECTTEXY),
            project_reflect_z: f.contains(MaterialFlags::PROJECTREFLECTTEXZ),
            anim_alpha: record.anim_alpha,
            anim_diffuse: record.anim_diffuse,
        }
    }

    /// Flag set implied by the semantic state.
    pub fn derive_flags(&self) -> MaterialFlags {
        let mut flags = MaterialFlags::empty();
        let has_diffuse = self.diffuse_texture.as_deref().is_some_and(|t| !t.is_empty());
        let has_alpha = self.alpha_texture.as_deref().is_some_and(|t| !t.is_empty());

        if has_diffuse {
            flags |= MaterialFlags::DIFFUSETEX;
        }
        if !has_diffuse || self.colored {
            flags |= MaterialFlags::COLORED;
        }
        if self.env_map.is_some() {
            flags |= MaterialFlags::ENVMAP;
        }
        if has_alpha {
            flags |= MaterialFlags::ALPHATEX | MaterialFlags::ADDEFFECT;
        }
        if self.add_effect {
            flags |= MaterialFlags::ADDEFFECT;
        }
        if self.anim_alpha.is_some() {
            flags |= MaterialFlags::ANIMTEXALPHA;
        }
        if self.anim_diffuse.is_some() {
            flags |= MaterialFlags::ANIMTEXDIFF;
        }
        flags.set(MaterialFlags::MIPMAP, self.mipmap);
        flags.set(MaterialFlags::DOUBLESIDED, self.double_sided);
        flags.set(MaterialFlags::UNLIT, self.unlit);
        flags.set(MaterialFlags::COLORKEY, self.color_key);
        flags.set(MaterialFlags::ADDITIVEMIX, self.additive_mix);
        flags.set(MaterialFlags::CALCREFLECTTEXY, self.calc_reflect_y);
        flags.set(MaterialFlags::PROJECTREFLECTTEXY, self.project_reflect_y);
        flags.set(MaterialFlags::PROJECTREFLECTTEXZ, self.project_reflect_z);
        match self.texture_blend {
            TextureBlend::None => {}
            TextureBlend::Normal => flags |= MaterialFlags::NORMTEXBLEND,
            TextureBlend::Multiply => flags |= MaterialFlags::MULTIPLYTEXBLEND,
            TextureBlend::Add => flags |= MaterialFlags::ADDTEXBLEND,
        }
        flags
    }

    /// Builds the on-disk record, validating every texture name.
    pub fn to_record(&self) -> Result<MaterialRecord> {
        let flags = self.derive_flags();
        let upper = |name: &str| -> Result<String> { Ok(LString::new(name.to_uppercase())?.0) };

        let env = match &self.env_map {
            Some(env) => Some((env.intensity, upper(&env.texture)?)),
            None => None,
        };
        let alpha_texture = match self.alpha_texture.as_deref().and_then(non_empty) {
            Some(name) => Some(upper(&name)?),
            None => None,
        };

        Ok(MaterialRecord {
            flags,
            ambient: self.ambient,
            diffuse: self.diffuse,
            emission: self.emission,
            opacity: self.opacity,
            env,
            diffuse_texture: upper(self.diffuse_texture.as_deref().unwrap_or(""))?,
            alpha_texture,
            anim_alpha: self.anim_alpha,
            anim_diffuse: self.anim_diffuse,
        })
    }
}
