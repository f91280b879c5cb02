// Morph target addressing by target, LOD and channel

use ls3d_tools_lib::scene::{FramePayload, MorphTarget, MorphVertex, Visual};
use ls3d_tools_lib::{decode, encode_with, EncodeOptions, FrameTree, Warning};

#[path = "common/mod.rs"]
mod common;

use common::*;

fn targets<'a>(tree: &'a FrameTree, name: &str) -> &'a [MorphTarget] {
    match &node(tree, name).payload {
        FramePayload::Visual(frame) => frame.visual.targets(),
        other => panic!("'{name}' is a {}", other.kind()),
    }
}

fn three_lod_morph(targets: Vec<MorphTarget>) -> FrameTree {
    let mut tree = FrameTree::new();
    tree.push(visual_node(
        "cloth",
        Visual::Morph {
            geometry: geometry(vec![strip_mesh(3, 0), strip_mesh(2, 0), strip_mesh(1, 0)]),
            targets,
        },
    ));
    tree
}

fn shape(name: &str, vertex: u32, position: cgmath::Vector3<f32>) -> MorphTarget {
    MorphTarget {
        name: name.to_string(),
        vertices: vec![MorphVertex {
            vertex,
            position,
            normal: v3(0.0, 0.0, 1.0),
        }],
    }
}

#[test]
fn target_keeps_lod_and_channel_addressing() {
    let moved = v3(0.0, 1.0, 2.0);
    let tree = three_lod_morph(vec![shape("Target_3_LOD2_Channel1", 1, moved)]);
    let (bytes, diagnostics) = encode_with(&[], &tree, &EncodeOptions::default()).unwrap();
    assert!(diagnostics.is_empty());

    let (_, decoded) = decode(&bytes).unwrap();
    let shapes = targets(&decoded, "cloth");

    // four targets in the one populated channel, none anywhere else
    let names: Vec<&str> = shapes.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "Target_0_LOD2_Channel1",
            "Target_1_LOD2_Channel1",
            "Target_2_LOD2_Channel1",
            "Target_3_LOD2_Channel1",
        ]
    );
    assert!(shapes.iter().all(|t| !t.name.contains("_LOD0") && !t.name.contains("_LOD1")));

    let target = shapes.iter().find(|t| t.name == "Target_3_LOD2_Channel1").unwrap();
    assert_eq!(target.vertices.len(), 1);
    assert_eq!(target.vertices[0].vertex, 1);
    assert!(approx(target.vertices[0].position, moved));

    // untouched targets carry the base shape
    let base = geometry_of(&decoded, "cloth").lods[2].mesh.positions[1];
    assert!(approx(shapes[0].vertices[0].position, base));
}

#[test]
fn unparsable_target_names_are_skipped() {
    let tree = three_lod_morph(vec![
        shape("Smile", 0, v3(0.0, 0.0, 1.0)),
        shape("Target_0_LOD7_Channel0", 0, v3(0.0, 0.0, 1.0)),
        shape("Target_0", 0, v3(0.0, 0.0, 1.0)),
    ]);
    let (bytes, diagnostics) = encode_with(&[], &tree, &EncodeOptions::default()).unwrap();
    let skipped: Vec<&str> = diagnostics
        .iter()
        .filter_map(|w| match w {
            Warning::UnparsableMorphName { name, .. } => Some(name.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(skipped, vec!["Smile", "Target_0_LOD7_Channel0"]);

    let (_, decoded) = decode(&bytes).unwrap();
    let names: Vec<&str> = targets(&decoded, "cloth").iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["Target_0_LOD0_Channel0"]);
}

#[test]
fn morph_without_targets_round_trips_empty() {
    let tree = three_lod_morph(Vec::new());
    let (bytes, _) = encode_with(&[], &tree, &EncodeOptions::default()).unwrap();
    let (_, decoded) = decode(&bytes).unwrap();
    assert!(targets(&decoded, "cloth").is_empty());
    assert_eq!(geometry_of(&decoded, "cloth").lods.len(), 3);
}

#[test]
fn morph_lod_count_is_clamped_to_geometry() {
    // one LOD of geometry, morph block declaring two
    let mut b = ByteBuilder::header(29);
    b.u16(0).u16(1);
    b.u8(FRAME_VISUAL).u8(5).u8(128).u8(42);
    b.u16(0)
        .f32s(&[0.0; 3])
        .f32s(&[1.0; 3])
        .f32s(&[1.0, 0.0, 0.0, 0.0])
        .u8(128)
        .string("blob")
        .string("");
    b.u16(0).u8(1).f32s(&[0.0]).u16(3);
    for p in [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]] {
        b.f32s(&p).f32s(&[0.0, 1.0, 0.0]).f32s(&[0.0, 0.0]);
    }
    b.u8(1).u16(1).u16(0).u16(1).u16(2).u16(0);
    // morph: 1 target, 1 channel, 2 LODs declared
    b.u8(1).u8(1).u8(2);
    b.u16(1).f32s(&[0.0, 0.5, 0.0]).f32s(&[0.0, 1.0, 0.0]).u8(0);
    b.f32s(&[0.0; 10]);
    let bytes = b.finish(false);

    let (_, tree) = decode(&bytes).unwrap();
    assert!(tree.diagnostics.iter().any(|w| matches!(
        w,
        Warning::MorphLodClamped {
            declared: 2,
            known: 1,
            ..
        }
    )));
    let shapes = targets(&tree, "blob");
    assert_eq!(shapes.len(), 1);
    assert_eq!(shapes[0].name, "Target_0_LOD0_Channel0");
    assert!(approx(shapes[0].vertices[0].position, v3(0.0, 0.0, 0.5)));
}
