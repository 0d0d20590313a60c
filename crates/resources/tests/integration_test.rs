//! Integration tests for asset decoding.

use std::path::{Path, PathBuf};

use renderer_resources::{MeshData, ResourceError, TextureData};

fn asset(relative: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../assets")
        .join(relative)
}

#[test]
fn test_load_monkey_obj() {
    let path = asset("monkey_smooth.obj");
    if !path.exists() {
        eprintln!("Skipping test: mesh file not found at {:?}", path);
        return;
    }

    let mesh = MeshData::load(&path).expect("Failed to load OBJ mesh");
    assert!(mesh.vertex_count() > 0);
    assert_eq!(mesh.vertices.len() % 3, 0, "mesh should be whole triangles");
}

#[test]
fn test_load_texture_png() {
    let path = asset("lost_empire-RGBA.png");
    if !path.exists() {
        eprintln!("Skipping test: texture file not found at {:?}", path);
        return;
    }

    let texture = TextureData::load(&path).expect("Failed to load texture");
    assert_eq!(
        texture.size_bytes(),
        texture.width as u64 * texture.height as u64 * 4
    );
}

#[test]
fn test_texture_round_trip_through_png() {
    let dir = std::env::temp_dir().join("vkengine-resources-test");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("checker.png");

    let pixels: Vec<u8> = [[255, 0, 0, 255], [0, 255, 0, 255], [0, 0, 255, 255], [9, 9, 9, 0]]
        .concat();
    image::save_buffer(&path, &pixels, 2, 2, image::ColorType::Rgba8).unwrap();

    let texture = TextureData::load(&path).unwrap();
    assert_eq!((texture.width, texture.height), (2, 2));
    assert_eq!(texture.pixels, pixels);
}

#[test]
fn test_obj_file_on_disk() {
    let dir = std::env::temp_dir().join("vkengine-resources-test");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("tri.obj");
    std::fs::write(&path, "v 0 0 0\nv 1 0 0\nv 0 1 0\nvn 0 0 1\nf 1//1 2//1 3//1\n").unwrap();

    let mesh = MeshData::load(&path).unwrap();
    assert_eq!(mesh.vertex_count(), 3);
}

#[test]
fn test_unknown_extension_is_rejected() {
    let dir = std::env::temp_dir().join("vkengine-resources-test");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("mesh.fbx");
    std::fs::write(&path, b"not a mesh").unwrap();

    assert!(matches!(
        MeshData::load(&path),
        Err(ResourceError::UnsupportedFormat(_))
    ));
}
