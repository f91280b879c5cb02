//! Scene model to file records.
//!
//! Linearisation folds `<base>_lod<N>` visuals into their base, assigns new
//! sequential frame ids in arena order, rebuilds the skeleton from joint
//! nodes and encodes every payload. All format limits are checked while the
//! records are built, so nothing is written for a scene that cannot fit.

use std::collections::{HashMap, HashSet};

use super::skeleton::Skeleton;
use super::{
    FrameId, FrameNode, FramePayload, FrameTree, Lod, Mesh, MorphTarget, MorphVertex, TriMesh,
    Visual,
};
use crate::error::{Diagnostics, FourDsError, Result, Warning};
use crate::fourds::frame::{FrameBody, FrameHeader, FrameRecord, VisualBody};
use crate::fourds::geometry::{
    check_lod_capacity, fan_triangulate, DedupVertex, FaceGroupRecord, LodRecord, ObjectRecord,
    VertexDedup, MAX_FACE_GROUPS, MAX_LODS, MAX_VERTICES,
};
use crate::fourds::helper::{BillboardRecord, DummyRecord, JointRecord, MirrorRecord, TargetRecord};
use crate::fourds::material::{Material, MaterialRecord};
use crate::fourds::morph::{
    parse_target_name, MorphBounds, MorphChannelRecord, MorphLodRecord, MorphRecord,
    MorphVertexRecord,
};
use crate::fourds::primitive::{FileQuat, FileTriangle, FileVec3, LString};
use crate::fourds::sector::{PortalRecord, SectorRecord, TriMeshRecord};
use crate::fourds::skin::{build_skin_lod, SkinBoneSpec, SkinClass, SkinLodRecord};
use crate::fourds::{now_filetime, FourDsFile, MAX_FRAMES, MAX_MATERIALS};

use super::EncodeOptions;

/// Splits `name_lod3` into `("name", 3)`.
pub fn split_lod_suffix(name: &str) -> Option<(&str, u32)> {
    let (base, suffix) = name.rsplit_once("_lod")?;
    let n = suffix.parse().ok()?;
    if base.is_empty() {
        return None;
    }
    Some((base, n))
}

/// Base visual index → indices of the nodes folded into it, by LOD number.
#[derive(Debug, Default)]
struct LodFolding {
    extra: HashMap<usize, Vec<usize>>,
    folded_into: HashMap<usize, usize>,
}

fn fold_lods(nodes: &[FrameNode]) -> LodFolding {
    let mut bases: HashMap<&str, usize> = HashMap::new();
    for (index, node) in nodes.iter().enumerate() {
        if node.visual().and_then(|v| v.geometry()).is_some() {
            bases.entry(node.name.as_str()).or_insert(index);
        }
    }

    let mut entries: Vec<(usize, u32, usize)> = Vec::new();
    for (index, node) in nodes.iter().enumerate() {
        if node.visual().and_then(|v| v.geometry()).is_none() {
            continue;
        }
        let Some((base, n)) = split_lod_suffix(&node.name) else {
            continue;
        };
        if n == 0 {
            continue;
        }
        if let Some(&base_index) = bases.get(base) {
            if base_index != index {
                entries.push((base_index, n, index));
            }
        }
    }
    entries.sort();

    let mut folding = LodFolding::default();
    for (base_index, _, index) in entries {
        folding.extra.entry(base_index).or_default().push(index);
        folding.folded_into.insert(index, base_index);
    }
    folding
}

/// Skeleton data shared by every skinned visual of one export.
struct SkinContext<'a> {
    root_name: &'a str,
    bone_index: HashMap<&'a str, usize>,
    specs: Vec<SkinBoneSpec>,
}

impl<'a> SkinContext<'a> {
    fn new(skeleton: &'a Skeleton) -> Self {
        SkinContext {
            root_name: &skeleton.root_name,
            bone_index: skeleton
                .bones
                .iter()
                .enumerate()
                .map(|(i, b)| (b.name.as_str(), i))
                .collect(),
            specs: skeleton
                .bones
                .iter()
                .enumerate()
                .map(|(i, b)| SkinBoneSpec {
                    file_bone_id: b.file_bone_id,
                    inverse_bind: skeleton.inverse_bind(i),
                })
                .collect(),
        }
    }
}

struct Exporter<'a> {
    material_count: usize,
    id_map: HashMap<FrameId, FrameId>,
    skeleton: Option<&'a Skeleton>,
    skin: Option<SkinContext<'a>>,
    reported_groups: HashSet<String>,
    diagnostics: &'a mut Diagnostics,
}

pub(crate) fn linearize(
    materials: &[Material],
    tree: &FrameTree,
    options: &EncodeOptions,
    diagnostics: &mut Diagnostics,
) -> Result<FourDsFile> {
    if materials.len() > MAX_MATERIALS {
        return Err(FourDsError::capacity("materials", materials.len(), MAX_MATERIALS));
    }
    let material_records = materials
        .iter()
        .map(Material::to_record)
        .collect::<Result<Vec<MaterialRecord>>>()?;

    let folding = fold_lods(&tree.nodes);
    let emitted = tree.nodes.len() - folding.folded_into.len();
    if emitted > MAX_FRAMES {
        return Err(FourDsError::capacity("frames", emitted, MAX_FRAMES));
    }

    let mut id_map: HashMap<FrameId, FrameId> = HashMap::new();
    let mut next: FrameId = 0;
    for (index, node) in tree.nodes.iter().enumerate() {
        if !folding.folded_into.contains_key(&index) {
            next += 1;
            id_map.insert(node.id, next);
        }
    }
    for (&index, &base) in &folding.folded_into {
        if let Some(&id) = id_map.get(&tree.nodes[base].id) {
            id_map.insert(tree.nodes[index].id, id);
        }
    }

    let skeleton = Skeleton::from_tree(tree);
    let mut exporter = Exporter {
        material_count: materials.len(),
        id_map,
        skeleton: skeleton.as_ref(),
        skin: skeleton.as_ref().map(SkinContext::new),
        reported_groups: HashSet::new(),
        diagnostics,
    };

    let mut frames = Vec::with_capacity(emitted);
    for (index, node) in tree.nodes.iter().enumerate() {
        if folding.folded_into.contains_key(&index) {
            continue;
        }
        let extra: Vec<&FrameNode> = folding
            .extra
            .get(&index)
            .map(|list| list.iter().map(|&i| &tree.nodes[i]).collect())
            .unwrap_or_default();
        frames.push(exporter.frame(node, &extra)?);
    }

    if tree.has_animation {
        exporter.diagnostics.warn(Warning::AnimationIgnored);
    }

    let timestamp = options
        .timestamp
        .or(tree.timestamp)
        .unwrap_or_else(now_filetime);
    log::info!(
        "encoding {} materials, {} frames ({} folded LOD nodes)",
        material_records.len(),
        frames.len(),
        folding.folded_into.len()
    );

    let mut file = FourDsFile::new(timestamp);
    file.materials = material_records;
    file.frames = frames;
    Ok(file)
}

impl<'a> Exporter<'a> {
    fn new_id(&self, node: &FrameNode) -> FrameId {
        self.id_map.get(&node.id).copied().unwrap_or(0)
    }

    fn parent_id(&mut self, node: &FrameNode) -> FrameId {
        let Some(parent) = node.link.parent_frame() else {
            return 0;
        };
        match self.id_map.get(&parent).copied() {
            Some(id) if id == self.new_id(node) => {
                self.diagnostics.warn(Warning::SelfParent { frame_id: node.id });
                0
            }
            Some(id) => id,
            None => {
                self.diagnostics.warn(Warning::MissingParent {
                    frame_id: node.id,
                    parent_id: parent,
                });
                0
            }
        }
    }

    fn frame(&mut self, node: &FrameNode, extra: &[&FrameNode]) -> Result<FrameRecord> {
        let frame_id = self.new_id(node);
        let header = FrameHeader {
            parent_id: self.parent_id(node),
            translation: FileVec3(node.transform.translation),
            scale: FileVec3(node.transform.scale),
            rotation: FileQuat(node.transform.rotation),
            cull_flags: node.cull_flags,
            name: LString::new(node.name.as_str())?,
            user_props: LString::new(node.user_props.as_str())?,
        };
        log::debug!("frame {frame_id}: {} '{}'", node.payload.kind(), node.name);

        let body = match &node.payload {
            FramePayload::Visual(frame) => FrameBody::Visual {
                render_flags: frame.render_flags,
                visual: self.visual(frame_id, &frame.visual, extra)?,
            },
            FramePayload::Sector(sector) => {
                if sector.portals.len() > u8::MAX as usize {
                    return Err(FourDsError::capacity(
                        format!("frame {frame_id} portals"),
                        sector.portals.len(),
                        u8::MAX as usize,
                    ));
                }
                let mut portals = Vec::with_capacity(sector.portals.len());
                for portal in &sector.portals {
                    if portal.vertices.len() > u8::MAX as usize {
                        return Err(FourDsError::capacity(
                            format!("frame {frame_id} portal vertices"),
                            portal.vertices.len(),
                            u8::MAX as usize,
                        ));
                    }
                    portals.push(PortalRecord {
                        flags: portal.flags,
                        near: portal.near,
                        far: portal.far,
                        normal: FileVec3(portal.normal),
                        dot: portal.dot,
                        vertices: portal.vertices.iter().map(|&v| FileVec3(v)).collect(),
                    });
                }
                FrameBody::Sector(SectorRecord {
                    flags: sector.flags,
                    mesh: trimesh_record(&sector.mesh),
                    min: FileVec3(sector.bounds.min),
                    max: FileVec3(sector.bounds.max),
                    portals,
                })
            }
            FramePayload::Dummy(dummy) => FrameBody::Dummy(DummyRecord {
                min: FileVec3(dummy.bounds.min),
                max: FileVec3(dummy.bounds.max),
            }),
            FramePayload::Target(target) => {
                if target.links.len() > u8::MAX as usize {
                    return Err(FourDsError::capacity(
                        format!("frame {frame_id} target links"),
                        target.links.len(),
                        u8::MAX as usize,
                    ));
                }
                let mut links = Vec::with_capacity(target.links.len());
                for &link in &target.links {
                    match self.id_map.get(&link) {
                        Some(&id) => links.push(id),
                        None => self.diagnostics.warn(Warning::MissingTargetLink {
                            frame_id: node.id,
                            link,
                        }),
                    }
                }
                FrameBody::Target(TargetRecord {
                    flags: target.flags,
                    links,
                })
            }
            FramePayload::Occluder(mesh) => FrameBody::Occluder(trimesh_record(mesh)),
            FramePayload::Joint(joint) => {
                let matrix = self
                    .skeleton
                    .and_then(|s| s.bone_by_frame(node.id).map(|b| s.joint_matrix(b)))
                    .unwrap_or(joint.matrix);
                FrameBody::Joint(JointRecord {
                    matrix,
                    file_bone_id: joint.file_bone_id,
                })
            }
        };

        Ok(FrameRecord { header, body })
    }

    fn visual(&mut self, frame_id: FrameId, visual: &Visual, extra: &[&FrameNode]) -> Result<VisualBody> {
        if let Visual::Mirror(mirror) = visual {
            return Ok(VisualBody::Mirror(MirrorRecord {
                min: FileVec3(mirror.bounds.min),
                max: FileVec3(mirror.bounds.max),
                center: FileVec3(mirror.center),
                radius: mirror.radius,
                matrix: mirror.matrix,
                color: mirror.color,
                distance: mirror.distance,
                mesh: trimesh_record(&mirror.mesh),
            }));
        }
        let Some(geometry) = visual.geometry() else {
            return Err(FourDsError::InvalidScene(format!(
                "frame {frame_id}: visual has no geometry"
            )));
        };

        let mut lods: Vec<&Lod> = geometry.lods.iter().collect();
        for node in extra {
            if let Some(g) = node.visual().and_then(|v| v.geometry()) {
                lods.extend(g.lods.iter());
            }
        }
        if geometry.instance_id > 0 {
            lods.clear();
        }
        if lods.len() > MAX_LODS {
            return Err(FourDsError::capacity(
                format!("frame {frame_id} LODs"),
                lods.len(),
                MAX_LODS,
            ));
        }

        let skinned = visual.is_skinned();
        let mut encoded = Vec::with_capacity(lods.len());
        for (index, lod) in lods.iter().enumerate() {
            let classes = if skinned {
                Some(self.skin_classes(frame_id, &lod.mesh))
            } else {
                None
            };
            encoded.push(self.lod(frame_id, index, lod, classes.as_deref())?);
        }

        let object = ObjectRecord {
            instance_id: geometry.instance_id,
            lods: encoded.iter().map(|e| e.record.clone()).collect(),
        };

        Ok(match visual {
            Visual::Object(_) => VisualBody::Object(object),
            Visual::LitObject(_) => VisualBody::LitObject(object),
            Visual::SingleMesh(_) => VisualBody::SingleMesh {
                object,
                skin: self.skin(&encoded)?,
            },
            Visual::SingleMorph { targets, .. } => VisualBody::SingleMorph {
                object,
                skin: self.skin(&encoded)?,
                morph: self.morph(frame_id, targets, &encoded),
            },
            Visual::Billboard { billboard, .. } => VisualBody::Billboard {
                object,
                billboard: BillboardRecord {
                    rotation_axis: billboard.rotation_axis,
                    rotation_mode: billboard.rotation_mode,
                },
            },
            Visual::Morph { targets, .. } => VisualBody::Morph {
                object,
                morph: self.morph(frame_id, targets, &encoded),
            },
            Visual::Mirror(_) => {
                return Err(FourDsError::InvalidScene(format!(
                    "frame {frame_id}: mirror has no geometry"
                )))
            }
        })
    }

    /// Dominant-group class of every position in `mesh`.
    fn skin_classes(&mut self, frame_id: FrameId, mesh: &Mesh) -> Vec<SkinClass> {
        let count = mesh.positions.len();
        let mut best: Vec<Option<(Option<usize>, f32)>> = vec![None; count];
        let root_name = self.skin.as_ref().map(|s| s.root_name).unwrap_or_default();

        for group in &mesh.groups {
            let bone = self
                .skin
                .as_ref()
                .and_then(|s| s.bone_index.get(group.name.as_str()).copied());
            if bone.is_none()
                && group.name != root_name
                && self.reported_groups.insert(group.name.clone())
            {
                self.diagnostics.warn(Warning::UnknownGroupBone {
                    frame_id,
                    group: group.name.clone(),
                });
            }
            for &(vertex, weight) in &group.weights {
                let Some(slot) = best.get_mut(vertex as usize) else {
                    continue;
                };
                if slot.map_or(true, |(_, w)| weight > w) {
                    *slot = Some((bone, weight));
                }
            }
        }

        best.into_iter()
            .map(|b| match b {
                Some((bone, weight)) => SkinClass::classify(bone, weight),
                None => SkinClass::Root,
            })
            .collect()
    }

    fn lod(
        &mut self,
        frame_id: FrameId,
        lod_index: usize,
        lod: &Lod,
        classes: Option<&[SkinClass]>,
    ) -> Result<EncodedLod> {
        let mesh = &lod.mesh;
        let group_count = mesh
            .polygons
            .iter()
            .map(|p| p.slot + 1)
            .max()
            .unwrap_or(0)
            .max(mesh.slots.len());
        if group_count > MAX_FACE_GROUPS {
            return Err(FourDsError::capacity(
                format!("frame {frame_id} LOD {lod_index} face groups"),
                group_count,
                MAX_FACE_GROUPS,
            ));
        }

        let mut dedup = VertexDedup::new();
        let mut triangles: Vec<Vec<[usize; 3]>> = vec![Vec::new(); group_count];
        for polygon in &mesh.polygons {
            let mut corners = Vec::with_capacity(polygon.corners.len());
            for corner in &polygon.corners {
                let v = corner.vertex as usize;
                let Some(&position) = mesh.positions.get(v) else {
                    return Err(FourDsError::InvalidScene(format!(
                        "frame {frame_id} LOD {lod_index}: corner references vertex {v} of {}",
                        mesh.positions.len()
                    )));
                };
                let skin = classes.map_or(SkinClass::Root, |c| c[v]);
                corners.push(dedup.insert(position, corner.normal, corner.uv, corner.vertex, skin));
            }
            triangles[polygon.slot].extend(fan_triangulate(&corners));
        }

        if dedup.len() > MAX_VERTICES {
            return Err(FourDsError::capacity(
                format!("frame {frame_id} LOD {lod_index} vertices"),
                dedup.len(),
                MAX_VERTICES,
            ));
        }
        let (vertices, remap) = dedup.finish();

        let mut groups = Vec::with_capacity(group_count);
        for (slot, tris) in triangles.iter().enumerate() {
            let mut material_id = mesh.slots.get(slot).copied().unwrap_or(0);
            if material_id as usize > self.material_count {
                self.diagnostics.warn(Warning::MaterialOutOfRange {
                    frame_id,
                    material_id,
                });
                material_id = 0;
            }
            groups.push(FaceGroupRecord {
                triangles: tris
                    .iter()
                    .map(|t| FileTriangle([remap[t[0]] as u16, remap[t[1]] as u16, remap[t[2]] as u16]))
                    .collect(),
                material_id,
            });
        }

        let record = LodRecord {
            distance: lod.distance,
            vertices: vertices.iter().map(|v| v.vertex).collect(),
            groups,
        };
        check_lod_capacity(&record, &format!("frame {frame_id} LOD {lod_index}"))?;
        Ok(EncodedLod { record, vertices })
    }

    fn skin(&self, encoded: &[EncodedLod]) -> Result<Vec<SkinLodRecord>> {
        let specs: &[SkinBoneSpec] = self.skin.as_ref().map_or(&[], |s| s.specs.as_slice());
        encoded
            .iter()
            .map(|lod| build_skin_lod(specs, &lod.vertices))
            .collect()
    }

    fn morph(&mut self, frame_id: FrameId, targets: &[MorphTarget], encoded: &[EncodedLod]) -> MorphRecord {
        // (lod, channel) -> target -> source vertex -> shape
        let mut shapes: HashMap<(u8, u8), HashMap<u8, HashMap<u32, &MorphVertex>>> = HashMap::new();
        let mut target_count = 0u8;
        let mut channel_count = 0u8;

        for target in targets {
            let parsed = parse_target_name(&target.name)
                .filter(|&(t, l, c)| t < u8::MAX && c < u8::MAX && (l as usize) < encoded.len());
            let Some((t, l, c)) = parsed else {
                self.diagnostics.warn(Warning::UnparsableMorphName {
                    frame_id,
                    name: target.name.clone(),
                });
                continue;
            };
            target_count = target_count.max(t + 1);
            channel_count = channel_count.max(c + 1);
            let by_vertex = shapes.entry((l, c)).or_default().entry(t).or_default();
            for mv in &target.vertices {
                by_vertex.insert(mv.vertex, mv);
            }
        }

        if shapes.is_empty() {
            return MorphRecord::default();
        }

        let mut lods = Vec::with_capacity(encoded.len());
        for (l, lod) in encoded.iter().enumerate() {
            let channels = (0..channel_count)
                .map(|c| match shapes.get(&(l as u8, c)) {
                    Some(by_target) => morph_channel(by_target, target_count, &lod.vertices),
                    None => MorphChannelRecord::default(),
                })
                .collect();
            lods.push(MorphLodRecord {
                channels,
                bounds: MorphBounds::from_bounds(lod.record.bounds()),
            });
        }

        MorphRecord {
            target_count,
            channel_count,
            declared_lods: encoded.len() as u8,
            lods,
        }
    }
}

struct EncodedLod {
    record: LodRecord,
    vertices: Vec<DedupVertex>,
}

/// Lists every output vertex whose source any target of the channel moves.
/// Targets that do not move a listed vertex repeat its base shape.
fn morph_channel(
    by_target: &HashMap<u8, HashMap<u32, &MorphVertex>>,
    target_count: u8,
    vertices: &[DedupVertex],
) -> MorphChannelRecord {
    let sources: HashSet<u32> = by_target.values().flat_map(|m| m.keys().copied()).collect();
    let listed: Vec<usize> = vertices
        .iter()
        .enumerate()
        .filter(|(_, v)| sources.contains(&v.source))
        .map(|(i, _)| i)
        .collect();
    if listed.is_empty() {
        return MorphChannelRecord::default();
    }

    let shapes = listed
        .iter()
        .map(|&i| {
            let base = &vertices[i];
            (0..target_count)
                .map(|t| match by_target.get(&t).and_then(|m| m.get(&base.source)) {
                    Some(mv) => MorphVertexRecord {
                        position: FileVec3(mv.position),
                        normal: FileVec3(mv.normal),
                    },
                    None => MorphVertexRecord {
                        position: base.vertex.position,
                        normal: base.vertex.normal,
                    },
                })
                .collect()
        })
        .collect();

    let remap = if listed.len() == vertices.len() {
        None
    } else {
        Some(listed.iter().map(|&i| i as u16).collect())
    };
    MorphChannelRecord {
        vertices: shapes,
        remap,
    }
}

fn trimesh_record(mesh: &TriMesh) -> TriMeshRecord {
    TriMeshRecord {
        positions: mesh.positions.iter().map(|&p| FileVec3(p)).collect(),
        triangles: mesh.triangles.iter().map(|&t| FileTriangle(t)).collect(),
    }
}
