//! Host-facing scene model: materials plus an arena of frame nodes.
//!
//! [`decode`] turns a 4DS byte buffer into this model (flat decode, skeleton
//! build, skin apply, deferred parenting). [`encode`] linearises it back.

pub mod export;
pub mod import;
pub mod skeleton;

use cgmath::{Matrix4, Quaternion, Vector2, Vector3};
use ptree::item::StringItem;
use ptree::TreeBuilder;
use serde::{Deserialize, Serialize};

use crate::error::{Diagnostics, Result};
use crate::fourds::frame::{DEFAULT_CULL_FLAGS, DEFAULT_RENDER_FLAGS};
use crate::fourds::material::Material;
use crate::fourds::{parse_4ds, write_4ds};
use crate::math::{compose_trs, decompose_trs, Bounds, Vec3};

pub use skeleton::{Bone, Skeleton};

/// 1-based frame id in file order; 0 means "no parent".
pub type FrameId = u16;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quaternion<f32>,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Transform {
            translation: Vector3::new(0.0, 0.0, 0.0),
            rotation: Quaternion::new(1.0, 0.0, 0.0, 0.0),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    pub fn from_translation(translation: Vec3) -> Self {
        Transform {
            translation,
            ..Default::default()
        }
    }

    pub fn to_matrix(&self) -> Matrix4<f32> {
        compose_trs(self.translation, self.rotation, self.scale)
    }

    pub fn from_matrix(m: &Matrix4<f32>) -> Self {
        let (translation, rotation, scale) = decompose_trs(m);
        Transform {
            translation,
            rotation,
            scale,
        }
    }
}

/// How a node hangs in the hierarchy once parent ids are resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParentLink {
    Root,
    Node(FrameId),
    /// Attached to a skeleton bone; `offset` is the bone head in object space.
    Bone {
        joint: FrameId,
        bone: String,
        offset: Vec3,
    },
}

impl ParentLink {
    pub fn parent_frame(&self) -> Option<FrameId> {
        match self {
            ParentLink::Root => None,
            ParentLink::Node(id) => Some(*id),
            ParentLink::Bone { joint, .. } => Some(*joint),
        }
    }
}

// ============================================================================
// Geometry
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Corner {
    pub vertex: u32,
    pub normal: Vec3,
    pub uv: Vector2<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    /// Index into [`Mesh::slots`].
    pub slot: usize,
    pub corners: Vec<Corner>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VertexGroup {
    pub name: String,
    pub weights: Vec<(u32, f32)>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Mesh {
    pub positions: Vec<Vec3>,
    pub polygons: Vec<Polygon>,
    /// 1-based material index per face group, 0 for none.
    pub slots: Vec<u16>,
    pub groups: Vec<VertexGroup>,
}

impl Mesh {
    pub fn group(&self, name: &str) -> Option<&VertexGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    pub(crate) fn group_mut(&mut self, name: &str) -> &mut VertexGroup {
        let index = match self.groups.iter().position(|g| g.name == name) {
            Some(index) => index,
            None => {
                self.groups.push(VertexGroup {
                    name: name.to_string(),
                    weights: Vec::new(),
                });
                self.groups.len() - 1
            }
        };
        &mut self.groups[index]
    }

    pub fn triangle_count(&self) -> usize {
        self.polygons
            .iter()
            .map(|p| p.corners.len().saturating_sub(2))
            .sum()
    }

    pub fn bounds(&self) -> Bounds {
        Bounds::from_points(self.positions.iter()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lod {
    pub distance: f32,
    pub mesh: Mesh,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Geometry {
    /// Non-zero: geometry is shared with another frame and `lods` is empty.
    pub instance_id: u16,
    pub lods: Vec<Lod>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MorphVertex {
    pub vertex: u32,
    pub position: Vec3,
    pub normal: Vec3,
}

/// A named shape, `Target_<t>_LOD<l>_Channel<c>`, with absolute positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MorphTarget {
    pub name: String,
    pub vertices: Vec<MorphVertex>,
}

/// Position-only triangle mesh in target winding.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TriMesh {
    pub positions: Vec<Vec3>,
    pub triangles: Vec<[u16; 3]>,
}

// ============================================================================
// Payloads
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Billboard {
    pub rotation_axis: u32,
    pub rotation_mode: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mirror {
    pub bounds: Bounds,
    pub center: Vec3,
    pub radius: f32,
    pub matrix: [f32; 16],
    pub color: [f32; 3],
    pub distance: f32,
    pub mesh: TriMesh,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Visual {
    Object(Geometry),
    LitObject(Geometry),
    SingleMesh(Geometry),
    SingleMorph {
        geometry: Geometry,
        targets: Vec<MorphTarget>,
    },
    Billboard {
        geometry: Geometry,
        billboard: Billboard,
    },
    Morph {
        geometry: Geometry,
        targets: Vec<MorphTarget>,
    },
    Mirror(Mirror),
}

impl Visual {
    pub fn geometry(&self) -> Option<&Geometry> {
        match self {
            Visual::Object(g)
            | Visual::LitObject(g)
            | Visual::SingleMesh(g)
            | Visual::SingleMorph { geometry: g, .. }
            | Visual::Billboard { geometry: g, .. }
            | Visual::Morph { geometry: g, .. } => Some(g),
            Visual::Mirror(_) => None,
        }
    }

    pub fn geometry_mut(&mut self) -> Option<&mut Geometry> {
        match self {
            Visual::Object(g)
            | Visual::LitObject(g)
            | Visual::SingleMesh(g)
            | Visual::SingleMorph { geometry: g, .. }
            | Visual::Billboard { geometry: g, .. }
            | Visual::Morph { geometry: g, .. } => Some(g),
            Visual::Mirror(_) => None,
        }
    }

    pub fn targets(&self) -> &[MorphTarget] {
        match self {
            Visual::SingleMorph { targets, .. } | Visual::Morph { targets, .. } => targets,
            _ => &[],
        }
    }

    pub fn is_skinned(&self) -> bool {
        matches!(self, Visual::SingleMesh(_) | Visual::SingleMorph { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualFrame {
    pub render_flags: [u8; 2],
    pub visual: Visual,
}

impl VisualFrame {
    pub fn new(visual: Visual) -> Self {
        VisualFrame {
            render_flags: DEFAULT_RENDER_FLAGS,
            visual,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portal {
    pub flags: u32,
    pub near: f32,
    pub far: f32,
    pub normal: Vec3,
    pub dot: f32,
    pub vertices: Vec<Vec3>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sector {
    pub flags: [u32; 2],
    pub mesh: TriMesh,
    pub bounds: Bounds,
    pub portals: Vec<Portal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dummy {
    pub bounds: Bounds,
}

impl Dummy {
    /// Marker size: half the largest extent of the box.
    pub fn display_size(&self) -> f32 {
        self.bounds.display_size()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Target {
    pub flags: u16,
    pub links: Vec<FrameId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Joint {
    pub file_bone_id: u32,
    /// Row-major 4x4 as stored; recomputed from the skeleton on encode.
    pub matrix: [f32; 16],
}

impl Joint {
    /// 3x4 view: rotation and scale in the upper 3x3, translation in the
    /// last column.
    pub fn rows(&self) -> [f32; 12] {
        let mut out = [0.0f32; 12];
        out.copy_from_slice(&self.matrix[..12]);
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FramePayload {
    Visual(VisualFrame),
    Sector(Sector),
    Dummy(Dummy),
    Target(Target),
    Occluder(TriMesh),
    Joint(Joint),
}

impl FramePayload {
    pub fn kind(&self) -> &'static str {
        match self {
            FramePayload::Visual(v) => match v.visual {
                Visual::Object(_) => "object",
                Visual::LitObject(_) => "lit object",
                Visual::SingleMesh(_) => "single mesh",
                Visual::SingleMorph { .. } => "single morph",
                Visual::Billboard { .. } => "billboard",
                Visual::Morph { .. } => "morph",
                Visual::Mirror(_) => "mirror",
            },
            FramePayload::Sector(_) => "sector",
            FramePayload::Dummy(_) => "dummy",
            FramePayload::Target(_) => "target",
            FramePayload::Occluder(_) => "occluder",
            FramePayload::Joint(_) => "joint",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameNode {
    pub id: FrameId,
    pub name: String,
    pub user_props: String,
    pub cull_flags: u8,
    pub transform: Transform,
    /// Parent id as stored in the file.
    pub parent_id: FrameId,
    pub link: ParentLink,
    pub payload: FramePayload,
}

impl FrameNode {
    pub fn new(name: impl Into<String>, payload: FramePayload) -> Self {
        let cull_flags = match payload {
            FramePayload::Joint(_) => 0,
            _ => DEFAULT_CULL_FLAGS,
        };
        FrameNode {
            id: 0,
            name: name.into(),
            user_props: String::new(),
            cull_flags,
            transform: Transform::default(),
            parent_id: 0,
            link: ParentLink::Root,
            payload,
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn is_joint(&self) -> bool {
        matches!(self.payload, FramePayload::Joint(_))
    }

    pub fn visual(&self) -> Option<&Visual> {
        match &self.payload {
            FramePayload::Visual(v) => Some(&v.visual),
            _ => None,
        }
    }
}

// ============================================================================
// Tree
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FrameTree {
    pub nodes: Vec<FrameNode>,
    pub skeleton: Option<Skeleton>,
    /// FILETIME read from the file header.
    pub timestamp: Option<u64>,
    pub has_animation: bool,
    /// Decoding stopped early; frames after the first undecodable one are missing.
    pub partial: bool,
    pub diagnostics: Diagnostics,
}

impl FrameTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a node, assigning the next sequential id.
    pub fn push(&mut self, mut node: FrameNode) -> FrameId {
        let id = self.nodes.iter().map(|n| n.id).max().unwrap_or(0) + 1;
        node.id = id;
        self.nodes.push(node);
        id
    }

    /// Appends a node under `parent` as a plain hierarchy child.
    pub fn push_child(&mut self, parent: FrameId, mut node: FrameNode) -> FrameId {
        node.parent_id = parent;
        node.link = ParentLink::Node(parent);
        self.push(node)
    }

    pub fn get(&self, id: FrameId) -> Option<&FrameNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn get_mut(&mut self, id: FrameId) -> Option<&mut FrameNode> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&FrameNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn children(&self, id: FrameId) -> impl Iterator<Item = &FrameNode> {
        self.nodes
            .iter()
            .filter(move |n| n.link.parent_frame() == Some(id))
    }

    pub fn roots(&self) -> impl Iterator<Item = &FrameNode> {
        self.nodes.iter().filter(|n| n.link == ParentLink::Root)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn add_node_to_tree(&self, node: &FrameNode, tree: &mut TreeBuilder, depth: usize) {
        let label = format!("[{}] {} ({})", node.id, node.name, node.payload.kind());
        let children: Vec<&FrameNode> = self.children(node.id).collect();
        // depth guard against parent cycles in hand-built trees
        if children.is_empty() || depth > self.nodes.len() {
            tree.add_empty_child(label);
        } else {
            tree.begin_child(label);
            for child in children {
                self.add_node_to_tree(child, tree, depth + 1);
            }
            tree.end_child();
        }
    }

    /// Hierarchy view for printing with `ptree`.
    pub fn to_ptree(&self) -> StringItem {
        let mut tree = TreeBuilder::new("frames".to_string());
        for root in self.roots() {
            self.add_node_to_tree(root, &mut tree, 0);
        }
        tree.build()
    }
}

// ============================================================================
// Entry points
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Fail on unknown frame types instead of returning a partial tree.
    pub strict: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        DecodeOptions { strict: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncodeOptions {
    /// Header FILETIME; falls back to the tree's timestamp, then to now.
    pub timestamp: Option<u64>,
}

pub fn decode(bytes: &[u8]) -> Result<(Vec<Material>, FrameTree)> {
    decode_with(bytes, &DecodeOptions::default())
}

pub fn decode_with(bytes: &[u8], options: &DecodeOptions) -> Result<(Vec<Material>, FrameTree)> {
    let (file, diagnostics) = parse_4ds(bytes, options.strict)?;
    Ok(import::assemble(file, diagnostics))
}

pub fn encode(materials: &[Material], tree: &FrameTree) -> Result<Vec<u8>> {
    encode_with(materials, tree, &EncodeOptions::default()).map(|(bytes, _)| bytes)
}

/// Encodes and also returns the warnings raised while linearising.
pub fn encode_with(
    materials: &[Material],
    tree: &FrameTree,
    options: &EncodeOptions,
) -> Result<(Vec<u8>, Diagnostics)> {
    let mut diagnostics = Diagnostics::default();
    let file = export::linearize(materials, tree, options, &mut diagnostics)?;
    let bytes = write_4ds(&file)?;
    Ok((bytes, diagnostics))
}
