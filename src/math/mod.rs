use cgmath::{InnerSpace, Matrix3, Matrix4, Quaternion, SquareMatrix, Vector3};
use serde::{Deserialize, Serialize};

pub type Vec3 = Vector3<f32>;

/// `T * R * S`, the order every 4DS transform is composed in.
pub fn compose_trs(translation: Vec3, rotation: Quaternion<f32>, scale: Vec3) -> Matrix4<f32> {
    Matrix4::from_translation(translation)
        * Matrix4::from(rotation)
        * Matrix4::from_nonuniform_scale(scale.x, scale.y, scale.z)
}

/// Splits an affine matrix back into translation, rotation and per-axis scale.
///
/// Scale is the length of each basis column; shear is discarded.
pub fn decompose_trs(m: &Matrix4<f32>) -> (Vec3, Quaternion<f32>, Vec3) {
    let translation = Vector3::new(m.w.x, m.w.y, m.w.z);

    let mut col0 = Vector3::new(m.x.x, m.x.y, m.x.z);
    let mut col1 = Vector3::new(m.y.x, m.y.y, m.y.z);
    let mut col2 = Vector3::new(m.z.x, m.z.y, m.z.z);

    let scale_x = col0.magnitude();
    let scale_y = col1.magnitude();
    let scale_z = col2.magnitude();

    if scale_x != 0.0 {
        col0 /= scale_x;
    }
    if scale_y != 0.0 {
        col1 /= scale_y;
    }
    if scale_z != 0.0 {
        col2 /= scale_z;
    }

    let rotation = Quaternion::from(Matrix3::from_cols(col0, col1, col2)).normalize();

    (translation, rotation, Vector3::new(scale_x, scale_y, scale_z))
}

/// Flattens a matrix row by row (`m[row][col]` order on disk).
pub fn to_row_major(m: &Matrix4<f32>) -> [f32; 16] {
    [
        m.x.x, m.y.x, m.z.x, m.w.x, m.x.y, m.y.y, m.z.y, m.w.y, m.x.z, m.y.z, m.z.z, m.w.z,
        m.x.w, m.y.w, m.z.w, m.w.w,
    ]
}

#[rustfmt::skip]
pub fn from_row_major(s: &[f32; 16]) -> Matrix4<f32> {
    Matrix4::new(
        s[0], s[4], s[8], s[12],
        s[1], s[5], s[9], s[13],
        s[2], s[6], s[10], s[14],
        s[3], s[7], s[11], s[15],
    )
}

pub fn invert_or_identity(m: &Matrix4<f32>) -> Matrix4<f32> {
    m.invert().unwrap_or_else(Matrix4::identity)
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for Bounds {
    fn default() -> Self {
        Bounds {
            min: Vector3::new(0.0, 0.0, 0.0),
            max: Vector3::new(0.0, 0.0, 0.0),
        }
    }
}

impl Bounds {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Bounds { min, max }
    }

    /// Bounds of a point set, `None` when the set is empty.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Vec3>) -> Option<Bounds> {
        let mut iter = points.into_iter();
        let first = *iter.next()?;
        let mut b = Bounds::new(first, first);
        for p in iter {
            b.min.x = b.min.x.min(p.x);
            b.min.y = b.min.y.min(p.y);
            b.min.z = b.min.z.min(p.z);
            b.max.x = b.max.x.max(p.x);
            b.max.y = b.max.y.max(p.y);
            b.max.z = b.max.z.max(p.z);
        }
        Some(b)
    }

    pub fn extent(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Length of the box diagonal, used as the cached morph "radius".
    pub fn diagonal(&self) -> f32 {
        self.extent().magnitude()
    }

    /// Half of the largest extent; the marker size for dummy frames.
    pub fn display_size(&self) -> f32 {
        let e = self.extent();
        e.x.max(e.y).max(e.z) * 0.5
    }
}
