//! ls3d_inspect - command line inspection of LS3D `.4ds` files
//!
//! ```bash
//! ls3d_inspect info models/car.4ds
//! ls3d_inspect tree models/car.4ds
//! ls3d_inspect dump models/car.4ds -o car.json
//! ls3d_inspect roundtrip models/car.4ds -o /tmp/car.4ds
//! ls3d_inspect textures models/car.4ds
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use ls3d_tools_lib::assets::{color_key_threshold, resolve_materials, FsAssetLoader};
use ls3d_tools_lib::fourds::filetime_to_datetime;
use ls3d_tools_lib::scene::FramePayload;
use ls3d_tools_lib::{decode_with, encode_with, DecodeOptions, EncodeOptions, FrameTree, Material};

#[derive(Parser)]
#[command(name = "ls3d_inspect")]
#[command(about = "Inspect and round-trip LS3D 4DS scene files")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print header, material and frame statistics
    Info(InputArgs),

    /// Print the frame hierarchy
    Tree(InputArgs),

    /// Dump materials and frames as JSON
    Dump {
        #[command(flatten)]
        input: InputArgs,
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Decode and re-encode, reporting whether the bytes changed
    Roundtrip {
        #[command(flatten)]
        input: InputArgs,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Resolve material textures from the `maps` directory next to the file
    Textures(InputArgs),
}

#[derive(Args)]
struct InputArgs {
    /// Path to a .4ds file
    file: PathBuf,
    /// Keep the frames read before an unsupported frame instead of failing
    #[arg(long)]
    lenient: bool,
}

fn load(args: &InputArgs) -> Result<(Vec<u8>, Vec<Material>, FrameTree)> {
    let bytes = fs::read(&args.file).with_context(|| format!("reading {}", args.file.display()))?;
    let options = DecodeOptions {
        strict: !args.lenient,
    };
    let (materials, tree) =
        decode_with(&bytes, &options).with_context(|| format!("decoding {}", args.file.display()))?;
    Ok((bytes, materials, tree))
}

fn info(args: &InputArgs) -> Result<()> {
    let (bytes, materials, tree) = load(args)?;
    println!("file:       {}", args.file.display());
    println!("size:       {} bytes", bytes.len());
    if let Some(stamp) = tree.timestamp {
        match filetime_to_datetime(stamp) {
            Some(time) => println!("timestamp:  {}", time.to_rfc3339()),
            None => println!("timestamp:  {stamp} (raw)"),
        }
    }
    println!("materials:  {}", materials.len());
    println!("frames:     {}", tree.len());

    let mut kinds: Vec<(&str, usize)> = Vec::new();
    for node in &tree.nodes {
        let kind = node.payload.kind();
        match kinds.iter_mut().find(|(k, _)| *k == kind) {
            Some((_, count)) => *count += 1,
            None => kinds.push((kind, 1)),
        }
    }
    for (kind, count) in kinds {
        println!("  {kind:<12} {count}");
    }

    let (mut lods, mut triangles, mut targets) = (0usize, 0usize, 0usize);
    for node in &tree.nodes {
        if let FramePayload::Visual(frame) = &node.payload {
            if let Some(geometry) = frame.visual.geometry() {
                lods += geometry.lods.len();
                triangles += geometry.lods.iter().map(|l| l.mesh.triangle_count()).sum::<usize>();
            }
            targets += frame.visual.targets().len();
        }
    }
    println!("LODs:       {lods}");
    println!("triangles:  {triangles}");
    println!("morphs:     {targets}");
    if let Some(skeleton) = &tree.skeleton {
        println!("skeleton:   '{}' with {} bones", skeleton.root_name, skeleton.bones.len());
    }
    if tree.has_animation {
        println!("animation:  present (not decoded)");
    }
    if tree.partial {
        println!("partial:    yes");
    }
    for warning in tree.diagnostics.iter() {
        println!("warning:    {warning}");
    }
    Ok(())
}

fn print_tree(args: &InputArgs) -> Result<()> {
    let (_, _, tree) = load(args)?;
    ptree::print_tree(&tree.to_ptree())?;
    Ok(())
}

#[derive(Serialize)]
struct Dump<'a> {
    materials: &'a [Material],
    scene: &'a FrameTree,
}

fn dump(args: &InputArgs, output: Option<&Path>) -> Result<()> {
    let (_, materials, tree) = load(args)?;
    let json = serde_json::to_string_pretty(&Dump {
        materials: &materials,
        scene: &tree,
    })?;
    match output {
        Some(path) => fs::write(path, json).with_context(|| format!("writing {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}

fn roundtrip(args: &InputArgs, output: Option<&Path>) -> Result<()> {
    let (bytes, materials, tree) = load(args)?;
    let (encoded, diagnostics) = encode_with(&materials, &tree, &EncodeOptions::default())?;
    for warning in diagnostics.iter() {
        println!("warning: {warning}");
    }
    if encoded == bytes {
        println!("identical ({} bytes)", encoded.len());
    } else {
        let first_diff = bytes
            .iter()
            .zip(&encoded)
            .position(|(a, b)| a != b)
            .unwrap_or(bytes.len().min(encoded.len()));
        println!(
            "differs: {} -> {} bytes, first difference at offset {first_diff}",
            bytes.len(),
            encoded.len()
        );
    }
    if let Some(path) = output {
        fs::write(path, &encoded).with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(())
}

fn textures(args: &InputArgs) -> Result<()> {
    let (_, materials, mut tree) = load(args)?;
    let mut loader = FsAssetLoader::for_model(&args.file);
    let resolved = resolve_materials(&materials, &mut loader, &mut tree.diagnostics);
    for (index, (material, textures)) in materials.iter().zip(&resolved).enumerate() {
        let name = material.diffuse_texture.as_deref().unwrap_or("-");
        let status = match &textures.diffuse {
            Some(handle) => format!("{}x{}", handle.image.width(), handle.image.height()),
            None if material.diffuse_texture.is_some() => "missing".to_string(),
            None => String::new(),
        };
        print!("{:>4} {name:<32} {status}", index + 1);
        if let Some(key) = textures.color_key {
            print!("  key {key:?} threshold {:.3}", color_key_threshold(key));
        }
        println!();
    }
    println!("{} textures looked up", loader.cache().len());
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    match &cli.command {
        Commands::Info(args) => info(args),
        Commands::Tree(args) => print_tree(args),
        Commands::Dump { input, output } => dump(input, output.as_deref()),
        Commands::Roundtrip { input, output } => roundtrip(input, output.as_deref()),
        Commands::Textures(args) => textures(args),
    }
}

