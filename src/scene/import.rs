//! File records to scene model.
//!
//! Pass 1 converts every frame on its own and records joints, skin blocks
//! and declared parents. Pass 2 builds the skeleton, pass 3 turns skin
//! blocks into vertex groups, pass 4 resolves parent ids into links.

use std::collections::{HashMap, HashSet};

use super::skeleton::{root_name_for, JointSource, Skeleton};
use super::{
    Billboard, Corner, Dummy, FrameId, FrameNode, FramePayload, FrameTree, Geometry, Joint, Lod,
    Mesh, Mirror, MorphTarget, MorphVertex, ParentLink, Polygon, Portal, Sector, Target,
    Transform, TriMesh, Visual, VisualFrame,
};
use crate::error::{Diagnostics, Warning};
use crate::fourds::frame::{FrameBody, FrameRecord, VisualBody};
use crate::fourds::geometry::{LodRecord, ObjectRecord};
use crate::fourds::material::Material;
use crate::fourds::morph::{target_name, MorphRecord};
use crate::fourds::sector::TriMeshRecord;
use crate::fourds::skin::SkinLodRecord;
use crate::fourds::FourDsFile;
use crate::math::Bounds;

struct PendingSkin {
    node: usize,
    frame_id: FrameId,
    lods: Vec<SkinLodRecord>,
}

/// Everything pass 1 collects besides the nodes themselves.
#[derive(Default)]
struct Collected {
    joints: Vec<JointSource>,
    bone_names: HashMap<u32, String>,
    skins: Vec<PendingSkin>,
}

pub(crate) fn assemble(file: FourDsFile, mut diagnostics: Diagnostics) -> (Vec<Material>, FrameTree) {
    let materials: Vec<Material> = file.materials.iter().map(Material::from_record).collect();

    // Pass 1
    let mut collected = Collected::default();
    let mut nodes = Vec::with_capacity(file.frames.len());
    for (index, frame) in file.frames.into_iter().enumerate() {
        let frame_id = (index + 1) as FrameId;
        let node = convert_frame(frame_id, frame, nodes.len(), &mut collected, &mut diagnostics);
        nodes.push(node);
    }

    // Pass 2
    let skeleton = if collected.joints.is_empty() {
        None
    } else {
        Some(Skeleton::build(root_name_for(nodes.iter()), &collected.joints))
    };

    // Pass 3
    if !collected.skins.is_empty() {
        let root_name = skeleton
            .as_ref()
            .map(|s| s.root_name.clone())
            .unwrap_or_else(|| root_name_for(nodes.iter()));
        apply_skins(
            &mut nodes,
            collected.skins,
            &collected.bone_names,
            &root_name,
            &mut diagnostics,
        );
    }

    // Pass 4
    resolve_parents(&mut nodes, skeleton.as_ref(), &mut diagnostics);

    log::info!(
        "decoded {} materials, {} frames, {} bones, {} warnings",
        materials.len(),
        nodes.len(),
        skeleton.as_ref().map_or(0, |s| s.bones.len()),
        diagnostics.len()
    );

    let tree = FrameTree {
        nodes,
        skeleton,
        timestamp: Some(file.timestamp),
        has_animation: file.has_animation,
        partial: file.partial,
        diagnostics,
    };
    (materials, tree)
}

// ============================================================================
// Pass 1
// ============================================================================

fn convert_frame(
    frame_id: FrameId,
    frame: FrameRecord,
    node_index: usize,
    collected: &mut Collected,
    diagnostics: &mut Diagnostics,
) -> FrameNode {
    let FrameRecord { header, body } = frame;
    let name = header.name.0;
    let transform = Transform {
        translation: header.translation.0,
        rotation: header.rotation.0,
        scale: header.scale.0,
    };

    let payload = match body {
        FrameBody::Visual {
            render_flags,
            visual,
        } => {
            let (visual, skin) = convert_visual(frame_id, visual, diagnostics);
            if let Some(lods) = skin {
                collected.skins.push(PendingSkin {
                    node: node_index,
                    frame_id,
                    lods,
                });
            }
            FramePayload::Visual(VisualFrame {
                render_flags,
                visual,
            })
        }
        FrameBody::Sector(sector) => FramePayload::Sector(Sector {
            flags: sector.flags,
            mesh: convert_trimesh(sector.mesh),
            bounds: Bounds::new(sector.min.0, sector.max.0),
            portals: sector
                .portals
                .into_iter()
                .map(|p| Portal {
                    flags: p.flags,
                    near: p.near,
                    far: p.far,
                    normal: p.normal.0,
                    dot: p.dot,
                    vertices: p.vertices.into_iter().map(|v| v.0).collect(),
                })
                .collect(),
        }),
        FrameBody::Dummy(dummy) => FramePayload::Dummy(Dummy {
            bounds: Bounds::new(dummy.min.0, dummy.max.0),
        }),
        FrameBody::Target(target) => FramePayload::Target(Target {
            flags: target.flags,
            links: target.links,
        }),
        FrameBody::Occluder(mesh) => FramePayload::Occluder(convert_trimesh(mesh)),
        FrameBody::Joint(joint) => {
            collected.bone_names.insert(joint.file_bone_id, name.clone());
            collected.joints.push(JointSource {
                frame_id,
                parent_id: header.parent_id,
                name: name.clone(),
                file_bone_id: joint.file_bone_id,
                local: transform.to_matrix(),
                scale: transform.scale,
            });
            FramePayload::Joint(Joint {
                file_bone_id: joint.file_bone_id,
                matrix: joint.matrix,
            })
        }
    };

    FrameNode {
        id: frame_id,
        name,
        user_props: header.user_props.0,
        cull_flags: header.cull_flags,
        transform,
        parent_id: header.parent_id,
        link: ParentLink::Root,
        payload,
    }
}

fn convert_visual(
    frame_id: FrameId,
    visual: VisualBody,
    diagnostics: &mut Diagnostics,
) -> (Visual, Option<Vec<SkinLodRecord>>) {
    match visual {
        VisualBody::Object(object) => (
            Visual::Object(convert_geometry(frame_id, object, diagnostics)),
            None,
        ),
        VisualBody::LitObject(object) => (
            Visual::LitObject(convert_geometry(frame_id, object, diagnostics)),
            None,
        ),
        VisualBody::SingleMesh { object, skin } => (
            Visual::SingleMesh(convert_geometry(frame_id, object, diagnostics)),
            Some(skin),
        ),
        VisualBody::SingleMorph {
            object,
            skin,
            morph,
        } => {
            let geometry = convert_geometry(frame_id, object, diagnostics);
            let targets = convert_morph(frame_id, &morph, &geometry, diagnostics);
            (Visual::SingleMorph { geometry, targets }, Some(skin))
        }
        VisualBody::Billboard { object, billboard } => (
            Visual::Billboard {
                geometry: convert_geometry(frame_id, object, diagnostics),
                billboard: Billboard {
                    rotation_axis: billboard.rotation_axis,
                    rotation_mode: billboard.rotation_mode,
                },
            },
            None,
        ),
        VisualBody::Morph { object, morph } => {
            let geometry = convert_geometry(frame_id, object, diagnostics);
            let targets = convert_morph(frame_id, &morph, &geometry, diagnostics);
            (Visual::Morph { geometry, targets }, None)
        }
        VisualBody::Mirror(mirror) => (
            Visual::Mirror(Mirror {
                bounds: Bounds::new(mirror.min.0, mirror.max.0),
                center: mirror.center.0,
                radius: mirror.radius,
                matrix: mirror.matrix,
                color: mirror.color,
                distance: mirror.distance,
                mesh: convert_trimesh(mirror.mesh),
            }),
            None,
        ),
    }
}

fn convert_geometry(frame_id: FrameId, object: ObjectRecord, diagnostics: &mut Diagnostics) -> Geometry {
    Geometry {
        instance_id: object.instance_id,
        lods: object
            .lods
            .iter()
            .enumerate()
            .map(|(index, lod)| convert_lod(frame_id, index, lod, diagnostics))
            .collect(),
    }
}

fn convert_lod(frame_id: FrameId, lod_index: usize, lod: &LodRecord, diagnostics: &mut Diagnostics) -> Lod {
    let count = lod.vertices.len();
    let mut polygons = Vec::with_capacity(lod.triangle_count());
    let mut slots = Vec::with_capacity(lod.groups.len());

    for (slot, group) in lod.groups.iter().enumerate() {
        slots.push(group.material_id);
        for triangle in &group.triangles {
            if triangle.0.iter().any(|&i| i as usize >= count) {
                diagnostics.warn(Warning::TriangleOutOfRange {
                    frame_id,
                    lod: lod_index,
                    triangle: triangle.0,
                });
                continue;
            }
            let corners = triangle
                .0
                .iter()
                .map(|&i| {
                    let v = &lod.vertices[i as usize];
                    Corner {
                        vertex: i as u32,
                        normal: v.normal.0,
                        uv: v.uv.0,
                    }
                })
                .collect();
            polygons.push(Polygon { slot, corners });
        }
    }

    Lod {
        distance: lod.distance,
        mesh: Mesh {
            positions: lod.vertices.iter().map(|v| v.position.0).collect(),
            polygons,
            slots,
            groups: Vec::new(),
        },
    }
}

fn convert_morph(
    frame_id: FrameId,
    morph: &MorphRecord,
    geometry: &Geometry,
    diagnostics: &mut Diagnostics,
) -> Vec<MorphTarget> {
    if morph.is_empty() {
        return Vec::new();
    }
    let known = geometry.lods.len();
    if morph.declared_lods as usize > known {
        diagnostics.warn(Warning::MorphLodClamped {
            frame_id,
            declared: morph.declared_lods,
            known: known as u8,
        });
    }

    let mut targets = Vec::new();
    for (l, lod) in morph.lods.iter().enumerate() {
        let vertex_count = geometry.lods[l].mesh.positions.len();
        for (c, channel) in lod.channels.iter().enumerate() {
            if channel.vertices.is_empty() {
                continue;
            }
            let indices = channel.indices();
            for &idx in indices.iter().filter(|&&i| i as usize >= vertex_count) {
                diagnostics.warn(Warning::MorphVertexOutOfRange {
                    frame_id,
                    lod: l,
                    vertex: idx,
                });
            }
            for t in 0..morph.target_count {
                let vertices = indices
                    .iter()
                    .enumerate()
                    .filter(|&(_, &idx)| (idx as usize) < vertex_count)
                    .map(|(i, &idx)| {
                        let mv = &channel.vertices[i][t as usize];
                        MorphVertex {
                            vertex: idx as u32,
                            position: mv.position.0,
                            normal: mv.normal.0,
                        }
                    })
                    .collect();
                targets.push(MorphTarget {
                    name: target_name(t, l as u8, c as u8),
                    vertices,
                });
            }
        }
    }
    targets
}

fn convert_trimesh(mesh: TriMeshRecord) -> TriMesh {
    TriMesh {
        positions: mesh.positions.into_iter().map(|p| p.0).collect(),
        triangles: mesh.triangles.into_iter().map(|t| t.0).collect(),
    }
}

// ============================================================================
// Pass 3
// ============================================================================

fn apply_skins(
    nodes: &mut [FrameNode],
    skins: Vec<PendingSkin>,
    bone_names: &HashMap<u32, String>,
    root_name: &str,
    diagnostics: &mut Diagnostics,
) {
    let mut reported: HashSet<u32> = HashSet::new();

    for skin in skins {
        let FramePayload::Visual(frame) = &mut nodes[skin.node].payload else {
            continue;
        };
        let Some(geometry) = frame.visual.geometry_mut() else {
            continue;
        };

        for (l, lod) in skin.lods.iter().enumerate() {
            let Some(target) = geometry.lods.get_mut(l) else {
                break;
            };
            let mesh = &mut target.mesh;
            let vertex_count = mesh.positions.len();
            let partition = lod.partition(vertex_count);

            for bone in &partition.bones {
                let name = match bone_names.get(&bone.file_bone_id) {
                    Some(name) => name.clone(),
                    None => {
                        let placeholder = format!("unknown_bone_{}", bone.file_bone_id);
                        if reported.insert(bone.file_bone_id) {
                            diagnostics.warn(Warning::UnknownBone {
                                file_bone_id: bone.file_bone_id,
                                placeholder: placeholder.clone(),
                            });
                        }
                        placeholder
                    }
                };

                let weights = bone
                    .locked
                    .clone()
                    .map(|v| (v as u32, 1.0))
                    .chain(bone.weighted.iter().map(|&(v, w)| (v as u32, w)));
                mesh.group_mut(&name).weights.extend(weights);
            }

            if let Some(vertex) = partition.overflow {
                diagnostics.warn(Warning::SkinVertexOutOfRange {
                    frame_id: skin.frame_id,
                    lod: l,
                    vertex,
                });
            }
            if !partition.root.is_empty() {
                let group = mesh.group_mut(root_name);
                group
                    .weights
                    .extend(partition.root.clone().map(|v| (v as u32, 1.0)));
            }
        }
    }
}

// ============================================================================
// Pass 4
// ============================================================================

fn resolve_parents(nodes: &mut [FrameNode], skeleton: Option<&Skeleton>, diagnostics: &mut Diagnostics) {
    let lookup: HashMap<FrameId, (bool, String)> = nodes
        .iter()
        .map(|n| (n.id, (n.is_joint(), n.name.clone())))
        .collect();

    for node in nodes.iter_mut() {
        let parent_id = node.parent_id;
        if parent_id == 0 {
            continue;
        }
        if parent_id == node.id {
            diagnostics.warn(Warning::SelfParent { frame_id: node.id });
            continue;
        }
        let Some((parent_is_joint, parent_name)) = lookup.get(&parent_id) else {
            diagnostics.warn(Warning::MissingParent {
                frame_id: node.id,
                parent_id,
            });
            continue;
        };

        node.link = if *parent_is_joint && !node.is_joint() {
            let offset = skeleton
                .and_then(|s| s.bone_by_frame(parent_id).map(|b| s.head(b)))
                .unwrap_or_else(|| cgmath::Vector3::new(0.0, 0.0, 0.0));
            ParentLink::Bone {
                joint: parent_id,
                bone: parent_name.clone(),
                offset,
            }
        } else {
            ParentLink::Node(parent_id)
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fourds::frame::FrameHeader;
    use crate::fourds::helper::{DummyRecord, JointRecord};
    use crate::fourds::primitive::{FileQuat, FileVec3, LString};
    use cgmath::{Quaternion, Vector3};

    fn header(name: &str, parent_id: u16, translation: Vector3<f32>) -> FrameHeader {
        FrameHeader {
            parent_id,
            translation: FileVec3(translation),
            scale: FileVec3(Vector3::new(1.0, 1.0, 1.0)),
            rotation: FileQuat(Quaternion::new(1.0, 0.0, 0.0, 0.0)),
            cull_flags: 0,
            name: LString::from(name),
            user_props: LString::default(),
        }
    }

    fn dummy(name: &str, parent_id: u16) -> FrameRecord {
        FrameRecord {
            header: header(name, parent_id, Vector3::new(0.0, 0.0, 0.0)),
            body: FrameBody::Dummy(DummyRecord {
                min: FileVec3::zero(),
                max: FileVec3::zero(),
            }),
        }
    }

    fn joint(name: &str, parent_id: u16, bone_id: u32, translation: Vector3<f32>) -> FrameRecord {
        FrameRecord {
            header: header(name, parent_id, translation),
            body: FrameBody::Joint(JointRecord {
                matrix: [0.0; 16],
                file_bone_id: bone_id,
            }),
        }
    }

    fn file(frames: Vec<FrameRecord>) -> FourDsFile {
        let mut file = FourDsFile::new(0);
        file.frames = frames;
        file
    }

    #[test]
    fn test_forward_parent_reference_resolves() {
        let (_, tree) = assemble(file(vec![dummy("child", 2), dummy("parent", 0)]), Diagnostics::default());
        assert_eq!(tree.nodes[0].link, ParentLink::Node(2));
        assert!(tree.diagnostics.is_empty());
    }

    #[test]
    fn test_self_parent_is_dropped() {
        let (_, tree) = assemble(file(vec![dummy("loop", 1)]), Diagnostics::default());
        assert_eq!(tree.nodes[0].link, ParentLink::Root);
        assert_eq!(tree.diagnostics.warnings, vec![Warning::SelfParent { frame_id: 1 }]);
    }

    #[test]
    fn test_missing_parent_is_reported() {
        let (_, tree) = assemble(file(vec![dummy("orphan", 9)]), Diagnostics::default());
        assert_eq!(tree.nodes[0].link, ParentLink::Root);
        assert!(matches!(
            tree.diagnostics.warnings[0],
            Warning::MissingParent { frame_id: 1, parent_id: 9 }
        ));
    }

    #[test]
    fn test_child_of_joint_attaches_to_bone() {
        let (_, tree) = assemble(
            file(vec![
                joint("hand", 0, 0, Vector3::new(1.0, 0.0, 0.0)),
                dummy("sword", 1),
            ]),
            Diagnostics::default(),
        );
        match &tree.nodes[1].link {
            ParentLink::Bone { joint, bone, offset } => {
                assert_eq!(*joint, 1);
                assert_eq!(bone, "hand");
                assert!((offset.x - 1.0).abs() < 1e-6);
            }
            other => panic!("unexpected link {other:?}"),
        }
        let skeleton = tree.skeleton.unwrap();
        assert_eq!(skeleton.root_name, "Root");
        assert_eq!(skeleton.bones[0].file_bone_id, 0);
    }

    #[test]
    fn test_joint_chain_links_as_hierarchy() {
        let (_, tree) = assemble(
            file(vec![
                joint("upper", 0, 0, Vector3::new(0.0, 0.0, 1.0)),
                joint("lower", 1, 1, Vector3::new(0.0, 0.0, 1.0)),
            ]),
            Diagnostics::default(),
        );
        assert_eq!(tree.nodes[1].link, ParentLink::Node(1));
        let skeleton = tree.skeleton.unwrap();
        assert!((skeleton.head(1).z - 2.0).abs() < 1e-6);
    }
}
