// Encode/decode round trip over a scene holding every supported frame and visual kind

use cgmath::{Vector2, Vector3};
use ls3d_tools_lib::fourds::geometry::fan_triangulate;
use ls3d_tools_lib::math::Bounds;
use ls3d_tools_lib::scene::{
    Billboard, FrameTree, Mesh, Mirror, MorphTarget, MorphVertex, ParentLink, Portal, Sector,
    Target, TriMesh, VertexGroup, Visual,
};
use ls3d_tools_lib::scene::FramePayload;
use ls3d_tools_lib::{decode, encode, encode_with, EncodeOptions, FrameNode, Material};

#[path = "common/mod.rs"]
mod common;

use common::*;

const STAMP: u64 = 133_000_000_000_000_000;

fn skinned_strip() -> Mesh {
    let mut mesh = strip_mesh(2, 1);
    mesh.groups = vec![
        VertexGroup {
            name: "hips".to_string(),
            weights: vec![(0, 1.0), (1, 1.0), (2, 0.6)],
        },
        VertexGroup {
            name: "spine".to_string(),
            weights: vec![(2, 0.4), (3, 1.0), (4, 0.8)],
        },
    ];
    mesh
}

fn trimesh() -> TriMesh {
    TriMesh {
        positions: vec![v3(0.0, 0.0, 0.0), v3(2.0, 0.0, 0.0), v3(0.0, 2.0, 0.0)],
        triangles: vec![[0, 1, 2]],
    }
}

fn morph_target(name: &str, moves: &[(u32, Vector3<f32>)]) -> MorphTarget {
    MorphTarget {
        name: name.to_string(),
        vertices: moves
            .iter()
            .map(|&(vertex, position)| MorphVertex {
                vertex,
                position,
                normal: v3(0.0, 0.0, 1.0),
            })
            .collect(),
    }
}

fn sample_scene() -> (Vec<Material>, FrameTree) {
    let materials = vec![Material::solid([1.0, 0.0, 0.0]), Material::textured("wall.bmp")];
    let mut tree = FrameTree::new();

    let boxed = tree.push(visual_node(
        "box",
        Visual::Object(geometry(vec![strip_mesh(2, 1), strip_mesh(1, 2)])),
    ));
    tree.push(visual_node("lamp", Visual::LitObject(geometry(vec![strip_mesh(1, 2)]))));
    tree.push(visual_node(
        "sprite",
        Visual::Billboard {
            geometry: geometry(vec![strip_mesh(1, 1)]),
            billboard: Billboard {
                rotation_axis: 2,
                rotation_mode: 1,
            },
        },
    ));
    tree.push(visual_node(
        "flag",
        Visual::Morph {
            geometry: geometry(vec![strip_mesh(2, 1)]),
            targets: vec![
                morph_target("Target_0_LOD0_Channel0", &[(3, v3(1.0, 1.0, 0.5))]),
                morph_target(
                    "Target_1_LOD0_Channel0",
                    &[(3, v3(1.0, 1.0, 1.0)), (5, v3(2.0, 1.0, 1.0))],
                ),
            ],
        },
    ));
    let body = tree.push(visual_node("body", Visual::SingleMesh(geometry(vec![skinned_strip()]))));
    tree.push(visual_node(
        "face",
        Visual::SingleMorph {
            geometry: geometry(vec![skinned_strip()]),
            targets: vec![morph_target("Target_0_LOD0_Channel0", &[(5, v3(2.0, 1.0, 0.25))])],
        },
    ));
    tree.push(visual_node(
        "mirror",
        Visual::Mirror(Mirror {
            bounds: Bounds::new(v3(-1.0, -1.0, -1.0), v3(1.0, 1.0, 1.0)),
            center: v3(0.0, 0.0, 0.0),
            radius: 1.5,
            matrix: [
                1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0,
            ],
            color: [0.1, 0.2, 0.3],
            distance: 40.0,
            mesh: trimesh(),
        }),
    ));
    tree.push(FrameNode::new(
        "room",
        FramePayload::Sector(Sector {
            flags: [2049, 0],
            mesh: trimesh(),
            bounds: Bounds::new(v3(0.0, 0.0, 0.0), v3(2.0, 2.0, 0.0)),
            portals: vec![Portal {
                flags: 4,
                near: 0.0,
                far: 100.0,
                normal: v3(0.0, 1.0, 0.0),
                dot: -1.0,
                vertices: vec![v3(0.0, 1.0, 0.0), v3(1.0, 1.0, 0.0), v3(1.0, 1.0, 1.0)],
            }],
        }),
    ));
    let marker = push_under(&mut tree, boxed, dummy_node("marker"));
    tree.push(FrameNode::new(
        "aim",
        FramePayload::Target(Target {
            flags: 3,
            links: vec![boxed, marker],
        }),
    ));
    tree.push(FrameNode::new("wall", FramePayload::Occluder(trimesh())));
    let hips = push_under(&mut tree, body, joint_node("hips", 1, v3(0.0, 0.0, 1.0)));
    let spine = push_under(&mut tree, hips, joint_node("spine", 2, v3(0.0, 0.0, 0.5)));
    push_under(&mut tree, spine, dummy_node("hand_attach"));

    (materials, tree)
}

type Soup = Vec<[(Vector3<f32>, Vector3<f32>, Vector2<f32>); 3]>;

/// Every triangle as corner attributes, in face-group order.
fn triangle_soup(mesh: &Mesh) -> Soup {
    let mut soup = Soup::new();
    for slot in 0..mesh.slots.len() {
        for polygon in mesh.polygons.iter().filter(|p| p.slot == slot) {
            let indices: Vec<usize> = (0..polygon.corners.len()).collect();
            for tri in fan_triangulate(&indices) {
                soup.push(tri.map(|i| {
                    let c = &polygon.corners[i];
                    (mesh.positions[c.vertex as usize], c.normal, c.uv)
                }));
            }
        }
    }
    soup
}

fn assert_same_soup(name: &str, expected: &Mesh, actual: &Mesh) {
    let a = triangle_soup(expected);
    let b = triangle_soup(actual);
    assert_eq!(a.len(), b.len(), "{name}: triangle count");
    for (i, (ta, tb)) in a.iter().zip(&b).enumerate() {
        for k in 0..3 {
            assert!(approx(ta[k].0, tb[k].0), "{name}: triangle {i} corner {k} position");
            assert!(approx(ta[k].1, tb[k].1), "{name}: triangle {i} corner {k} normal");
            assert!((ta[k].2 - tb[k].2).x.abs() < 1e-5 && (ta[k].2 - tb[k].2).y.abs() < 1e-5);
        }
    }
    assert_eq!(expected.slots, actual.slots, "{name}: material slots");
}

#[test]
fn every_kind_survives_a_round_trip() {
    let (materials, tree) = sample_scene();
    let (bytes, diagnostics) = encode_with(
        &materials,
        &tree,
        &EncodeOptions {
            timestamp: Some(STAMP),
        },
    )
    .expect("scene encodes");
    assert!(diagnostics.is_empty(), "{:?}", diagnostics.warnings);

    let (decoded_materials, decoded) = decode(&bytes).expect("scene decodes");
    assert_eq!(decoded_materials, materials);
    assert_eq!(decoded.timestamp, Some(STAMP));
    assert!(decoded.diagnostics.is_empty(), "{:?}", decoded.diagnostics.warnings);

    let names: Vec<&str> = tree.nodes.iter().map(|n| n.name.as_str()).collect();
    let decoded_names: Vec<&str> = decoded.nodes.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, decoded_names);
    for (a, b) in tree.nodes.iter().zip(&decoded.nodes) {
        assert_eq!(a.payload.kind(), b.payload.kind(), "kind of '{}'", a.name);
    }

    for name in ["box", "lamp", "sprite", "flag", "body", "face"] {
        let expected = geometry_of(&tree, name);
        let actual = geometry_of(&decoded, name);
        assert_eq!(expected.lods.len(), actual.lods.len(), "{name}: LOD count");
        for (la, lb) in expected.lods.iter().zip(&actual.lods) {
            assert_eq!(la.distance, lb.distance);
            assert_same_soup(name, &la.mesh, &lb.mesh);
        }
    }
}

#[test]
fn helper_payloads_round_trip() {
    let (materials, tree) = sample_scene();
    let (_, decoded) = decode(&encode(&materials, &tree).unwrap()).unwrap();

    for name in ["mirror", "room", "aim", "wall"] {
        assert_eq!(node(&tree, name).payload, node(&decoded, name).payload, "{name}");
    }
    let FramePayload::Visual(sprite) = &node(&decoded, "sprite").payload else {
        panic!("sprite is not a visual");
    };
    assert!(matches!(
        sprite.visual,
        Visual::Billboard {
            billboard: Billboard {
                rotation_axis: 2,
                rotation_mode: 1
            },
            ..
        }
    ));
}

#[test]
fn hierarchy_and_skeleton_round_trip() {
    let (materials, tree) = sample_scene();
    let (_, decoded) = decode(&encode(&materials, &tree).unwrap()).unwrap();

    let boxed = node(&decoded, "box").id;
    assert_eq!(node(&decoded, "marker").link, ParentLink::Node(boxed));
    assert_eq!(node(&decoded, "hips").link, ParentLink::Node(node(&decoded, "body").id));
    assert_eq!(node(&decoded, "spine").link, ParentLink::Node(node(&decoded, "hips").id));
    match &node(&decoded, "hand_attach").link {
        ParentLink::Bone { bone, offset, .. } => {
            assert_eq!(bone, "spine");
            assert!(approx(*offset, v3(0.0, 0.0, 1.5)));
        }
        other => panic!("expected a bone link, got {other:?}"),
    }

    let skeleton = decoded.skeleton.as_ref().expect("skeleton");
    assert_eq!(skeleton.root_name, "body");
    let bones: Vec<&str> = skeleton.bones.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(bones, vec!["hips", "spine"]);
}

#[test]
fn morph_targets_keep_their_names() {
    let (materials, tree) = sample_scene();
    let (_, decoded) = decode(&encode(&materials, &tree).unwrap()).unwrap();

    let FramePayload::Visual(flag) = &node(&decoded, "flag").payload else {
        panic!("flag is not a visual");
    };
    let names: Vec<&str> = flag.visual.targets().iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["Target_0_LOD0_Channel0", "Target_1_LOD0_Channel0"]);
}

#[test]
fn re_encoding_a_decoded_scene_is_byte_stable() {
    let (materials, tree) = sample_scene();
    let options = EncodeOptions {
        timestamp: Some(STAMP),
    };
    let (first, _) = encode_with(&materials, &tree, &options).unwrap();
    let (decoded_materials, decoded) = decode(&first).unwrap();
    let (second, diagnostics) = encode_with(&decoded_materials, &decoded, &EncodeOptions::default()).unwrap();
    assert!(diagnostics.is_empty(), "{:?}", diagnostics.warnings);
    assert_eq!(first, second);
}
