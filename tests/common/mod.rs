// Common test utilities: raw 4DS byte builders and small hand-made scenes
#![allow(dead_code)]

use cgmath::{Quaternion, Vector2, Vector3};
use ls3d_tools_lib::math::Bounds;
use ls3d_tools_lib::scene::{
    Corner, Dummy, FrameId, FrameNode, FramePayload, FrameTree, Geometry, Joint, Lod, Mesh,
    ParentLink, Polygon, Transform, Visual, VisualFrame,
};

pub const FRAME_VISUAL: u8 = 1;
pub const FRAME_LIGHT: u8 = 2;
pub const FRAME_DUMMY: u8 = 6;
pub const FRAME_JOINT: u8 = 10;

pub const VISUAL_OBJECT: u8 = 0;
pub const VISUAL_LENS: u8 = 6;

pub const MTL_COLORED: u32 = 0x0800_0000;

/// Little-endian byte stream in file axis order.
#[derive(Debug, Default, Clone)]
pub struct ByteBuilder {
    pub bytes: Vec<u8>,
}

impl ByteBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Magic, version and a zero timestamp.
    pub fn header(version: u16) -> Self {
        let mut b = Self::new();
        b.bytes.extend_from_slice(b"4DS\0");
        b.u16(version);
        b.u64(0);
        b
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.bytes.push(v);
        self
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.bytes.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.bytes.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u64(&mut self, v: u64) -> &mut Self {
        self.bytes.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn f32s(&mut self, values: &[f32]) -> &mut Self {
        for v in values {
            self.bytes.extend_from_slice(&v.to_le_bytes());
        }
        self
    }

    pub fn string(&mut self, s: &str) -> &mut Self {
        self.u8(s.len() as u8);
        self.bytes.extend_from_slice(s.as_bytes());
        self
    }

    /// Colour-only material: no textures, no env map.
    pub fn colored_material(&mut self, diffuse: [f32; 3]) -> &mut Self {
        self.u32(MTL_COLORED)
            .f32s(&[0.5, 0.5, 0.5])
            .f32s(&diffuse)
            .f32s(&[0.0, 0.0, 0.0])
            .f32s(&[1.0])
            .string("")
    }

    /// Type prefix and common header with an identity transform.
    pub fn frame_header(&mut self, frame_type: u8, parent_id: u16, name: &str) -> &mut Self {
        self.u8(frame_type);
        if frame_type == FRAME_VISUAL {
            self.u8(VISUAL_OBJECT).u8(128).u8(42);
        }
        self.u16(parent_id)
            .f32s(&[0.0, 0.0, 0.0])
            .f32s(&[1.0, 1.0, 1.0])
            .f32s(&[1.0, 0.0, 0.0, 0.0])
            .u8(128)
            .string(name)
            .string("")
    }

    pub fn dummy(&mut self, parent_id: u16, name: &str, min: [f32; 3], max: [f32; 3]) -> &mut Self {
        self.frame_header(FRAME_DUMMY, parent_id, name).f32s(&min).f32s(&max)
    }

    /// Joint with an identity matrix.
    pub fn joint(&mut self, parent_id: u16, name: &str, bone_id: u32) -> &mut Self {
        self.frame_header(FRAME_JOINT, parent_id, name)
            .f32s(&[
                1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0,
            ])
            .u32(bone_id)
    }

    pub fn finish(&mut self, has_animation: bool) -> Vec<u8> {
        self.u8(u8::from(has_animation));
        std::mem::take(&mut self.bytes)
    }
}

/// A file with no materials and the given frame builder output.
pub fn file_with_frames(count: u16, frames: impl FnOnce(&mut ByteBuilder)) -> Vec<u8> {
    let mut b = ByteBuilder::header(29);
    b.u16(0).u16(count);
    frames(&mut b);
    b.finish(false)
}

// ============================================================================
// Scene helpers
// ============================================================================

pub fn v3(x: f32, y: f32, z: f32) -> Vector3<f32> {
    Vector3::new(x, y, z)
}

pub fn approx(a: Vector3<f32>, b: Vector3<f32>) -> bool {
    (a.x - b.x).abs() < 1e-5 && (a.y - b.y).abs() < 1e-5 && (a.z - b.z).abs() < 1e-5
}

/// Quads in a strip along +X, one face group per slot entry.
pub fn strip_mesh(quads: usize, slot: u16) -> Mesh {
    let mut positions = Vec::new();
    for i in 0..=quads {
        positions.push(v3(i as f32, 0.0, 0.0));
        positions.push(v3(i as f32, 1.0, 0.0));
    }
    let polygons = (0..quads)
        .map(|q| {
            let base = (q * 2) as u32;
            let corners = [base, base + 2, base + 3, base + 1]
                .iter()
                .map(|&vertex| Corner {
                    vertex,
                    normal: v3(0.0, 0.0, 1.0),
                    uv: Vector2::new(vertex as f32 * 0.1, 0.5),
                })
                .collect();
            Polygon { slot: 0, corners }
        })
        .collect();
    Mesh {
        positions,
        polygons,
        slots: vec![slot],
        groups: Vec::new(),
    }
}

pub fn geometry(meshes: Vec<Mesh>) -> Geometry {
    Geometry {
        instance_id: 0,
        lods: meshes
            .into_iter()
            .enumerate()
            .map(|(i, mesh)| Lod {
                distance: i as f32 * 50.0,
                mesh,
            })
            .collect(),
    }
}

pub fn visual_node(name: &str, visual: Visual) -> FrameNode {
    FrameNode::new(name, FramePayload::Visual(VisualFrame::new(visual)))
}

pub fn dummy_node(name: &str) -> FrameNode {
    FrameNode::new(
        name,
        FramePayload::Dummy(Dummy {
            bounds: Bounds::new(v3(-1.0, -1.0, -1.0), v3(1.0, 1.0, 1.0)),
        }),
    )
}

pub fn joint_node(name: &str, file_bone_id: u32, translation: Vector3<f32>) -> FrameNode {
    FrameNode::new(
        name,
        FramePayload::Joint(Joint {
            file_bone_id,
            matrix: [0.0; 16],
        }),
    )
    .with_transform(Transform {
        translation,
        rotation: Quaternion::new(1.0, 0.0, 0.0, 0.0),
        scale: v3(1.0, 1.0, 1.0),
    })
}

/// Appends `node` linked to `parent` by frame id.
pub fn push_under(tree: &mut FrameTree, parent: FrameId, mut node: FrameNode) -> FrameId {
    node.link = ParentLink::Node(parent);
    node.parent_id = parent;
    tree.push(node)
}

pub fn node<'a>(tree: &'a FrameTree, name: &str) -> &'a FrameNode {
    tree.find_by_name(name)
        .unwrap_or_else(|| panic!("frame '{name}' not found"))
}

pub fn geometry_of<'a>(tree: &'a FrameTree, name: &str) -> &'a Geometry {
    node(tree, name)
        .visual()
        .and_then(|v| v.geometry())
        .unwrap_or_else(|| panic!("frame '{name}' has no geometry"))
}
