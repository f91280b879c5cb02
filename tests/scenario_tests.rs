// Decoding of small hand-assembled byte streams

use ls3d_tools_lib::scene::{FramePayload, ParentLink, Visual};
use ls3d_tools_lib::{decode, decode_with, DecodeOptions, FourDsError, Warning};

#[path = "common/mod.rs"]
mod common;

use common::*;

#[test]
fn empty_model_decodes() {
    let mut b = ByteBuilder::header(29);
    b.u16(0).u16(0);
    let bytes = b.finish(false);

    let (materials, tree) = decode(&bytes).expect("empty file decodes");
    assert!(materials.is_empty());
    assert!(tree.is_empty());
    assert!(!tree.partial);
    assert!(tree.diagnostics.is_empty());
    assert_eq!(tree.timestamp, Some(0));
}

#[test]
fn colored_material_has_no_texture_names() {
    let mut b = ByteBuilder::header(29);
    b.u16(1).colored_material([0.25, 0.5, 0.75]).u16(0);
    let bytes = b.finish(false);

    let (materials, _) = decode(&bytes).unwrap();
    assert_eq!(materials.len(), 1);
    let m = &materials[0];
    assert!(m.colored);
    assert_eq!(m.diffuse, [0.25, 0.5, 0.75]);
    assert_eq!(m.diffuse_texture, None);
    assert_eq!(m.alpha_texture, None);
    assert!(m.env_map.is_none());
}

#[test]
fn dummy_anchor_is_a_root_marker() {
    let bytes = file_with_frames(1, |b| {
        b.dummy(0, "Anchor", [-1.0, -1.0, -1.0], [1.0, 1.0, 1.0]);
    });

    let (_, tree) = decode(&bytes).unwrap();
    assert_eq!(tree.len(), 1);
    let anchor = &tree.nodes[0];
    assert_eq!(anchor.name, "Anchor");
    assert_eq!(anchor.link, ParentLink::Root);
    match &anchor.payload {
        FramePayload::Dummy(d) => assert!((d.display_size() - 1.0).abs() < 1e-6),
        other => panic!("expected a dummy, got {}", other.kind()),
    }
}

#[test]
fn bad_magic_is_rejected() {
    let mut bytes = file_with_frames(0, |_| {});
    bytes[..4].copy_from_slice(b"5DS\0");
    assert!(matches!(decode(&bytes), Err(FourDsError::BadMagic { .. })));
}

#[test]
fn newer_format_versions_are_rejected() {
    for version in [41u16, 42] {
        let mut b = ByteBuilder::header(version);
        b.u16(0).u16(0);
        let bytes = b.finish(false);
        match decode(&bytes) {
            Err(FourDsError::UnsupportedVersion { version: v }) => assert_eq!(v, version),
            other => panic!("version {version}: unexpected {other:?}"),
        }
    }
}

#[test]
fn truncated_frame_reports_offset() {
    let bytes = file_with_frames(1, |b| {
        b.dummy(0, "Anchor", [-1.0, -1.0, -1.0], [1.0, 1.0, 1.0]);
    });
    let cut = &bytes[..bytes.len() - 10];
    match decode(cut) {
        Err(FourDsError::Truncated { offset }) => assert!(offset >= 18, "offset {offset}"),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn unknown_frame_type_fails_in_strict_mode() {
    let bytes = file_with_frames(2, |b| {
        b.dummy(0, "Anchor", [-1.0; 3], [1.0; 3]);
        b.frame_header(FRAME_LIGHT, 0, "Sun");
    });
    match decode(&bytes) {
        Err(FourDsError::UnknownFrameType {
            frame_id,
            frame_type,
        }) => {
            assert_eq!(frame_id, 2);
            assert_eq!(frame_type, FRAME_LIGHT);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn unknown_frame_type_yields_partial_tree_when_lenient() {
    let bytes = file_with_frames(3, |b| {
        b.dummy(0, "Anchor", [-1.0; 3], [1.0; 3]);
        b.frame_header(FRAME_LIGHT, 0, "Sun");
        b.dummy(0, "Never", [-1.0; 3], [1.0; 3]);
    });
    let (_, tree) = decode_with(&bytes, &DecodeOptions { strict: false }).unwrap();
    assert!(tree.partial);
    assert_eq!(tree.len(), 1);
    assert_eq!(tree.nodes[0].name, "Anchor");
    assert!(matches!(
        tree.diagnostics.warnings[0],
        Warning::FrameSkipped { frame_id: 2, .. }
    ));
}

#[test]
fn unsupported_visual_is_reported() {
    let mut b = ByteBuilder::header(29);
    b.u16(0).u16(1);
    // visual frame with a lens visual type
    b.u8(FRAME_VISUAL).u8(VISUAL_LENS).u8(128).u8(42);
    b.u16(0)
        .f32s(&[0.0; 3])
        .f32s(&[1.0; 3])
        .f32s(&[1.0, 0.0, 0.0, 0.0])
        .u8(128)
        .string("flare")
        .string("");
    let bytes = b.finish(false);
    assert!(matches!(
        decode(&bytes),
        Err(FourDsError::UnsupportedVisual {
            frame_id: 1,
            visual_type: 6
        })
    ));
}

#[test]
fn object_geometry_swaps_axes_and_winding() {
    let mut b = ByteBuilder::header(29);
    b.u16(1).colored_material([1.0, 0.0, 0.0]).u16(1);
    b.frame_header(FRAME_VISUAL, 0, "tri");
    b.u16(0).u8(1); // instance id, LOD count
    b.f32s(&[0.0]).u16(3);
    for (position, uv) in [([1.0, 2.0, 3.0], [0.0, 0.0]), ([4.0, 5.0, 6.0], [1.0, 0.0]), ([7.0, 8.0, 9.0], [0.0, 1.0])] {
        b.f32s(&position).f32s(&[0.0, 1.0, 0.0]).f32s(&uv);
    }
    b.u8(1).u16(1).u16(0).u16(1).u16(2).u16(1);
    let bytes = b.finish(false);

    let (_, tree) = decode(&bytes).unwrap();
    let FramePayload::Visual(frame) = &tree.nodes[0].payload else {
        panic!("expected a visual");
    };
    let Visual::Object(geometry) = &frame.visual else {
        panic!("expected an object");
    };
    let mesh = &geometry.lods[0].mesh;
    assert!(approx(mesh.positions[0], v3(1.0, 3.0, 2.0)));
    assert_eq!(mesh.slots, vec![1]);
    let corners: Vec<u32> = mesh.polygons[0].corners.iter().map(|c| c.vertex).collect();
    assert_eq!(corners, vec![0, 2, 1]);
    // v is flipped
    assert!((mesh.polygons[0].corners[0].uv.y - 1.0).abs() < 1e-6);
    assert!(approx(mesh.polygons[0].corners[0].normal, v3(0.0, 0.0, 1.0)));
}

#[test]
fn animation_flag_is_detected_not_decoded() {
    let mut b = ByteBuilder::header(29);
    b.u16(0).u16(0);
    let bytes = b.finish(true);
    let (_, tree) = decode(&bytes).unwrap();
    assert!(tree.has_animation);
    assert_eq!(tree.diagnostics.warnings, vec![Warning::AnimationIgnored]);
}
