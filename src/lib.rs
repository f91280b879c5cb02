//! Reader and writer for LS3D engine `.4ds` scene files.
//!
//! [`fourds`] is the byte-level record codec. [`scene`] turns records into an
//! editable frame tree with materials, meshes, skins and morph targets, and
//! back. [`assets`] resolves the textures materials refer to.

pub mod assets;
pub mod error;
pub mod fourds;
pub mod math;
pub mod scene;

pub use error::{Diagnostics, FourDsError, Result, Warning};
pub use fourds::material::Material;
pub use scene::{
    decode, decode_with, encode, encode_with, DecodeOptions, EncodeOptions, FrameNode, FrameTree,
};
