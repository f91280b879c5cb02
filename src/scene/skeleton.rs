//! Skeleton rebuilt from joint frames.
//!
//! A file holds one skeleton. Its synthetic root stands for the skinned
//! object's own origin and owns every vertex no bone claims; it has no file
//! bone id and no joint frame. Bones keep joint order.

use std::collections::HashMap;

use cgmath::{InnerSpace, Matrix4, Rotation, SquareMatrix, Vector3};
use serde::{Deserialize, Serialize};

use super::{FrameId, FrameNode, FramePayload, FrameTree};
use crate::fourds::primitive::permutation_matrix;
use crate::math::{decompose_trs, invert_or_identity, to_row_major, Vec3};

pub const DEFAULT_ROOT_NAME: &str = "Root";
const MIN_BONE_LENGTH: f32 = 0.05;
const BONE_LENGTH_PER_SCALE: f32 = 0.15;
const SNAP_EPSILON: f32 = 0.001;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bone {
    pub name: String,
    pub frame_id: FrameId,
    pub file_bone_id: u32,
    /// Parent bone; `None` hangs the bone off the synthetic root.
    pub parent: Option<usize>,
    pub local: Matrix4<f32>,
    pub world: Matrix4<f32>,
    pub scale: Vec3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skeleton {
    pub root_name: String,
    pub bones: Vec<Bone>,
}

/// Input for one joint, in file order.
#[derive(Debug, Clone)]
pub struct JointSource {
    pub frame_id: FrameId,
    pub parent_id: FrameId,
    pub name: String,
    pub file_bone_id: u32,
    pub local: Matrix4<f32>,
    pub scale: Vec3,
}

impl Skeleton {
    /// `world = parent_world * local`. A parent that is not a joint, or a
    /// joint that has not been placed yet, contributes identity.
    pub fn build(root_name: impl Into<String>, joints: &[JointSource]) -> Skeleton {
        let mut by_frame: HashMap<FrameId, usize> = HashMap::new();
        let mut bones: Vec<Bone> = Vec::with_capacity(joints.len());

        for joint in joints {
            let parent = by_frame.get(&joint.parent_id).copied();
            let parent_world = parent.map(|p| bones[p].world).unwrap_or_else(Matrix4::identity);
            let index = bones.len();
            bones.push(Bone {
                name: joint.name.clone(),
                frame_id: joint.frame_id,
                file_bone_id: joint.file_bone_id,
                parent,
                local: joint.local,
                world: parent_world * joint.local,
                scale: joint.scale,
            });
            by_frame.insert(joint.frame_id, index);
        }

        Skeleton {
            root_name: root_name.into(),
            bones,
        }
    }

    /// Builds from the joint nodes of a tree, parented by their links.
    /// The root takes the name of the first skinned visual.
    pub fn from_tree(tree: &FrameTree) -> Option<Skeleton> {
        let joints: Vec<JointSource> = tree
            .nodes
            .iter()
            .filter_map(|node| joint_source(node))
            .collect();
        if joints.is_empty() {
            return None;
        }
        Some(Skeleton::build(root_name_for(tree.nodes.iter()), &joints))
    }

    pub fn bone_index(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|b| b.name == name)
    }

    pub fn bone_by_frame(&self, frame_id: FrameId) -> Option<usize> {
        self.bones.iter().position(|b| b.frame_id == frame_id)
    }

    pub fn children(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        self.bones
            .iter()
            .enumerate()
            .filter(move |(_, b)| b.parent == Some(index))
            .map(|(i, _)| i)
    }

    pub fn head(&self, index: usize) -> Vec3 {
        let w = &self.bones[index].world;
        Vector3::new(w.w.x, w.w.y, w.w.z)
    }

    /// Head and tail for display. The tail snaps to the mean of the child
    /// heads unless they sit on this bone's head; otherwise it extends along
    /// the bone's local Y axis.
    pub fn bone_extents(&self, index: usize) -> (Vec3, Vec3) {
        let bone = &self.bones[index];
        let head = self.head(index);

        let mut max_scale = bone.scale.x.max(bone.scale.y).max(bone.scale.z);
        if max_scale < 0.01 {
            max_scale = 1.0;
        }
        let length = (BONE_LENGTH_PER_SCALE * max_scale).max(MIN_BONE_LENGTH);
        let (_, rotation, _) = decompose_trs(&bone.world);
        let forward = rotation.rotate_vector(Vector3::new(0.0, 1.0, 0.0));

        let children: Vec<usize> = self.children(index).collect();
        if !children.is_empty() {
            let sum = children
                .iter()
                .fold(Vector3::new(0.0, 0.0, 0.0), |acc, &c| acc + self.head(c));
            let average = sum / children.len() as f32;
            if (average - head).magnitude() > SNAP_EPSILON {
                return (head, average);
            }
        }
        (head, head + forward * length)
    }

    /// Row-major `inverse(world * P)`, as stored in skin blocks.
    pub fn inverse_bind(&self, index: usize) -> [f32; 16] {
        let m = self.bones[index].world * permutation_matrix();
        to_row_major(&invert_or_identity(&m))
    }

    /// Row-major `P * world`, as stored in joint frames.
    pub fn joint_matrix(&self, index: usize) -> [f32; 16] {
        to_row_major(&(permutation_matrix() * self.bones[index].world))
    }
}

fn joint_source(node: &FrameNode) -> Option<JointSource> {
    let FramePayload::Joint(joint) = &node.payload else {
        return None;
    };
    Some(JointSource {
        frame_id: node.id,
        parent_id: node.link.parent_frame().unwrap_or(0),
        name: node.name.clone(),
        file_bone_id: joint.file_bone_id,
        local: node.transform.to_matrix(),
        scale: node.transform.scale,
    })
}

pub(crate) fn root_name_for<'a>(nodes: impl Iterator<Item = &'a FrameNode>) -> String {
    nodes
        .filter(|n| n.visual().is_some_and(|v| v.is_skinned()))
        .map(|n| n.name.clone())
        .next()
        .unwrap_or_else(|| DEFAULT_ROOT_NAME.to_string())
}
