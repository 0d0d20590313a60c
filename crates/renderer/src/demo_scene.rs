//! The demo scene: named assets, materials and object placement.

use glam::{Mat4, Vec3};
use tracing::{info, warn};

use renderer_scene::Arena;

use crate::batch::{RenderObject, sort_render_objects};
use crate::material::Material;
use crate::mesh::GpuMesh;

pub const MATERIAL_DEFAULT: &str = "defaultmesh";
pub const MATERIAL_DUPLICATE: &str = "defaultmesh_duplicate";
pub const MATERIAL_TEXTURED: &str = "texturedmesh";

/// Name of the built-in triangle mesh.
pub const TRIANGLE_MESH: &str = "triangle";

/// Meshes loaded from the asset directory: (registry name, relative path).
pub const MESH_ASSETS: [(&str, &str); 4] = [
    ("monkey", "monkey_smooth.obj"),
    ("wolf", "wolf/Wolf_One_obj.obj"),
    ("maleHuman", "FinalBaseMesh.obj"),
    ("empire", "lost_empire.obj"),
];

/// Texture sampled by [`MATERIAL_TEXTURED`].
pub const EMPIRE_TEXTURE: &str = "lost_empire-RGBA.png";

/// Half extent of the triangle grid; the grid covers `-GRID..=GRID` on x and z.
pub const GRID: i32 = 20;

/// Transform of the grid triangle at `(x, y)`.
pub fn grid_transform(x: i32, y: i32) -> Mat4 {
    Mat4::from_translation(Vec3::new(x as f32, 0.0, y as f32)) * Mat4::from_scale(Vec3::splat(0.2))
}

/// Material of the grid triangle in row `y`.
pub fn grid_material(y: i32) -> &'static str {
    if y % 2 == 0 {
        MATERIAL_DUPLICATE
    } else {
        MATERIAL_DEFAULT
    }
}

/// Places every demo object whose mesh and material are registered and
/// returns them sorted for dispatch.
pub fn build_render_objects(meshes: &Arena<GpuMesh>, materials: &Arena<Material>) -> Vec<RenderObject> {
    let mut objects = Vec::new();
    let mut place = |mesh: &str, material: &str, transform: Mat4| -> bool {
        match (meshes.handle(mesh), materials.handle(material)) {
            (Some(mesh), Some(material)) => {
                objects.push(RenderObject::new(mesh, material, transform));
                true
            }
            _ => false,
        }
    };

    let placements = [
        ("monkey", Mat4::IDENTITY),
        (
            "wolf",
            Mat4::from_scale(Vec3::splat(3.0)) * Mat4::from_translation(Vec3::new(-1.0, 3.0, 0.0)),
        ),
        (
            "maleHuman",
            Mat4::from_scale(Vec3::splat(0.3)) * Mat4::from_translation(Vec3::new(10.0, 3.0, 0.0)),
        ),
    ];
    for (mesh, transform) in placements {
        if !place(mesh, MATERIAL_DEFAULT, transform) {
            warn!("Skipping '{}': mesh or material not loaded", mesh);
        }
    }

    let mut grid_placed = 0usize;
    for x in -GRID..=GRID {
        for y in -GRID..=GRID {
            if place(TRIANGLE_MESH, grid_material(y), grid_transform(x, y)) {
                grid_placed += 1;
            }
        }
    }
    if grid_placed == 0 {
        warn!("Skipping triangle grid: triangle mesh or materials not loaded");
    }

    if !place(
        "empire",
        MATERIAL_TEXTURED,
        Mat4::from_translation(Vec3::new(5.0, -10.0, 0.0)),
    ) {
        warn!("Skipping 'empire': mesh or textured material not loaded");
    }

    sort_render_objects(&mut objects);
    info!("Scene built with {} render objects", objects.len());
    objects
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::draw_batch;
    use crate::batch::tests::{Recorder, bindings};
    use ash::vk;
    use ash::vk::Handle as _;

    fn demo_arenas() -> (Arena<GpuMesh>, Arena<Material>) {
        let mut meshes = Arena::new();
        let names = [TRIANGLE_MESH, "monkey", "wolf", "maleHuman", "empire"];
        for (i, name) in names.into_iter().enumerate() {
            meshes.insert(
                name,
                GpuMesh {
                    vertex_buffer: vk::Buffer::from_raw(1 + i as u64),
                    vertex_count: 3,
                },
            );
        }

        let mesh_pipeline = vk::Pipeline::from_raw(1);
        let mesh_layout = vk::PipelineLayout::from_raw(1);
        let mut materials = Arena::new();
        materials.insert(MATERIAL_DEFAULT, Material::new(mesh_pipeline, mesh_layout));
        materials.insert(MATERIAL_DUPLICATE, Material::new(mesh_pipeline, mesh_layout));
        materials.insert(
            MATERIAL_TEXTURED,
            Material::new(vk::Pipeline::from_raw(2), vk::PipelineLayout::from_raw(2))
                .with_texture(vk::DescriptorSet::from_raw(3)),
        );
        (meshes, materials)
    }

    #[test]
    fn test_demo_scene_object_count() {
        let (meshes, materials) = demo_arenas();
        let objects = build_render_objects(&meshes, &materials);
        // 3 named meshes, a 41x41 grid and the textured map.
        assert_eq!(objects.len(), 3 + 41 * 41 + 1);
    }

    #[test]
    fn test_demo_scene_rebinds() {
        let (meshes, materials) = demo_arenas();
        let objects = build_render_objects(&meshes, &materials);

        let mut recorder = Recorder::default();
        let stats = draw_batch(&mut recorder, &objects, &materials, &meshes, &bindings()).unwrap();

        assert_eq!(stats.pipeline_binds, 3);
        // triangle, monkey, wolf, maleHuman under defaultmesh; triangle under
        // the duplicate; empire under texturedmesh.
        assert_eq!(stats.vertex_buffer_binds, 6);
        assert_eq!(stats.draws, objects.len());
    }

    #[test]
    fn test_1850_objects_three_pipeline_binds() {
        let (meshes, materials) = demo_arenas();
        let mut objects = build_render_objects(&meshes, &materials);

        let triangle = meshes.handle(TRIANGLE_MESH).unwrap();
        let default = materials.handle(MATERIAL_DEFAULT).unwrap();
        let duplicate = materials.handle(MATERIAL_DUPLICATE).unwrap();
        let mut i = 0;
        while objects.len() < 1850 {
            let material = if i % 2 == 0 { default } else { duplicate };
            objects.push(RenderObject::new(triangle, material, grid_transform(i, 99)));
            i += 1;
        }
        sort_render_objects(&mut objects);
        assert_eq!(objects.len(), 1850);

        let mut recorder = Recorder::default();
        let stats = draw_batch(&mut recorder, &objects, &materials, &meshes, &bindings()).unwrap();
        assert_eq!(stats.pipeline_binds, 3);
        assert_eq!(stats.draws, 1850);
    }

    #[test]
    fn test_missing_assets_are_skipped() {
        let mut meshes = Arena::new();
        meshes.insert(
            TRIANGLE_MESH,
            GpuMesh {
                vertex_buffer: vk::Buffer::from_raw(1),
                vertex_count: 3,
            },
        );
        let (_, materials) = demo_arenas();

        let objects = build_render_objects(&meshes, &materials);
        assert_eq!(objects.len(), 41 * 41);
    }

    #[test]
    fn test_grid_material_alternates_by_row() {
        assert_eq!(grid_material(0), MATERIAL_DUPLICATE);
        assert_eq!(grid_material(-20), MATERIAL_DUPLICATE);
        assert_eq!(grid_material(-3), MATERIAL_DEFAULT);
        assert_eq!(grid_material(7), MATERIAL_DEFAULT);
    }

    #[test]
    fn test_grid_transform_scales_then_translates() {
        let m = grid_transform(2, -3);
        let p = m.transform_point3(Vec3::new(1.0, 0.0, 0.0));
        assert!(p.abs_diff_eq(Vec3::new(2.2, 0.0, -3.0), 1e-6));
    }
}
