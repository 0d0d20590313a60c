//! Render objects and the batched draw dispatcher.
//!
//! Objects are sorted once by `(material, mesh)` so consecutive draws share
//! state. The dispatcher then walks the sorted list and only rebinds the
//! pipeline and descriptor sets when the material changes, and the vertex
//! buffer when the mesh changes. For `M` consecutive material runs and `K`
//! consecutive mesh runs it issues exactly `M` pipeline binds and `K` vertex
//! buffer binds, whatever the object count.
//!
//! Recording goes through the [`DrawCommands`] trait, implemented for
//! [`CommandBuffer`].

use ash::vk;
use glam::Mat4;

use renderer_rhi::command::CommandBuffer;
use renderer_scene::{Arena, Handle};

use crate::error::{RenderError, RenderResult};
use crate::material::Material;
use crate::mesh::GpuMesh;
use crate::ubo::{GpuObjectData, MeshPushConstants};

/// One drawable: a mesh, a material and a transform.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderObject {
    pub mesh: Handle<GpuMesh>,
    pub material: Handle<Material>,
    pub transform: Mat4,
}

impl RenderObject {
    pub fn new(mesh: Handle<GpuMesh>, material: Handle<Material>, transform: Mat4) -> Self {
        Self {
            mesh,
            material,
            transform,
        }
    }
}

/// Sorts ascending by material, then mesh.
pub fn sort_render_objects(objects: &mut [RenderObject]) {
    objects.sort_by_key(|object| (object.material, object.mesh));
}

/// Per-object storage buffer contents, in draw order.
pub fn object_data(objects: &[RenderObject]) -> Vec<GpuObjectData> {
    objects
        .iter()
        .map(|object| GpuObjectData {
            model_matrix: object.transform,
        })
        .collect()
}

/// The subset of command recording the dispatcher needs.
pub trait DrawCommands {
    fn bind_pipeline(&mut self, pipeline: vk::Pipeline);

    fn bind_descriptor_sets(
        &mut self,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    );

    fn bind_vertex_buffer(&mut self, buffer: vk::Buffer);

    fn push_constants(&mut self, layout: vk::PipelineLayout, constants: &MeshPushConstants);

    /// One instance of `vertex_count` vertices; `first_instance` carries the
    /// object index.
    fn draw(&mut self, vertex_count: u32, first_instance: u32);
}

impl DrawCommands for CommandBuffer {
    fn bind_pipeline(&mut self, pipeline: vk::Pipeline) {
        CommandBuffer::bind_pipeline(self, vk::PipelineBindPoint::GRAPHICS, pipeline);
    }

    fn bind_descriptor_sets(
        &mut self,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    ) {
        CommandBuffer::bind_descriptor_sets(
            self,
            vk::PipelineBindPoint::GRAPHICS,
            layout,
            first_set,
            sets,
            dynamic_offsets,
        );
    }

    fn bind_vertex_buffer(&mut self, buffer: vk::Buffer) {
        CommandBuffer::bind_vertex_buffers(self, 0, &[buffer], &[0]);
    }

    fn push_constants(&mut self, layout: vk::PipelineLayout, constants: &MeshPushConstants) {
        CommandBuffer::push_constants(self, layout, vk::ShaderStageFlags::VERTEX, 0, constants);
    }

    fn draw(&mut self, vertex_count: u32, first_instance: u32) {
        CommandBuffer::draw(self, vertex_count, 1, 0, first_instance);
    }
}

/// Frame-slot descriptor state bound with every material.
#[derive(Clone, Copy, Debug)]
pub struct FrameBindings {
    pub global_set: vk::DescriptorSet,
    pub object_set: vk::DescriptorSet,
    pub scene_offset: u32,
}

/// What one dispatch recorded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub pipeline_binds: usize,
    pub vertex_buffer_binds: usize,
    pub draws: usize,
}

/// Records draws for `objects`, which should already be sorted.
///
/// # Errors
///
/// Returns [`RenderError::UnknownHandle`] if an object refers to a mesh or
/// material missing from the arenas. Commands recorded before the bad object
/// stay in the command buffer.
pub fn draw_batch<C: DrawCommands + ?Sized>(
    cmd: &mut C,
    objects: &[RenderObject],
    materials: &Arena<Material>,
    meshes: &Arena<GpuMesh>,
    bindings: &FrameBindings,
) -> RenderResult<BatchStats> {
    let mut stats = BatchStats::default();
    let mut last_material: Option<Handle<Material>> = None;
    let mut last_mesh: Option<Handle<GpuMesh>> = None;

    for (index, object) in objects.iter().enumerate() {
        let material = materials
            .get(object.material)
            .ok_or(RenderError::UnknownHandle {
                kind: "material",
                index: object.material.index(),
            })?;
        let mesh = meshes.get(object.mesh).ok_or(RenderError::UnknownHandle {
            kind: "mesh",
            index: object.mesh.index(),
        })?;

        if last_material != Some(object.material) {
            cmd.bind_pipeline(material.pipeline);
            cmd.bind_descriptor_sets(
                material.layout,
                0,
                &[bindings.global_set],
                &[bindings.scene_offset],
            );
            cmd.bind_descriptor_sets(material.layout, 1, &[bindings.object_set], &[]);
            if let Some(texture_set) = material.texture_set {
                cmd.bind_descriptor_sets(material.layout, 2, &[texture_set], &[]);
            }
            last_material = Some(object.material);
            stats.pipeline_binds += 1;
        }

        cmd.push_constants(material.layout, &MeshPushConstants::new(object.transform));

        if last_mesh != Some(object.mesh) {
            cmd.bind_vertex_buffer(mesh.vertex_buffer);
            last_mesh = Some(object.mesh);
            stats.vertex_buffer_binds += 1;
        }

        cmd.draw(mesh.vertex_count, index as u32);
        stats.draws += 1;
    }

    Ok(stats)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ash::vk::Handle as _;
    use glam::Vec3;

    #[derive(Clone, Debug, PartialEq)]
    pub(crate) enum Call {
        BindPipeline(vk::Pipeline),
        BindSets { first_set: u32, dynamic_offsets: Vec<u32> },
        BindVertexBuffer(vk::Buffer),
        Push(Mat4),
        Draw { vertex_count: u32, first_instance: u32 },
        Overlay,
    }

    #[derive(Default)]
    pub(crate) struct Recorder {
        pub calls: Vec<Call>,
    }

    impl DrawCommands for Recorder {
        fn bind_pipeline(&mut self, pipeline: vk::Pipeline) {
            self.calls.push(Call::BindPipeline(pipeline));
        }

        fn bind_descriptor_sets(
            &mut self,
            _layout: vk::PipelineLayout,
            first_set: u32,
            _sets: &[vk::DescriptorSet],
            dynamic_offsets: &[u32],
        ) {
            self.calls.push(Call::BindSets {
                first_set,
                dynamic_offsets: dynamic_offsets.to_vec(),
            });
        }

        fn bind_vertex_buffer(&mut self, buffer: vk::Buffer) {
            self.calls.push(Call::BindVertexBuffer(buffer));
        }

        fn push_constants(&mut self, _layout: vk::PipelineLayout, constants: &MeshPushConstants) {
            self.calls.push(Call::Push(constants.render_matrix));
        }

        fn draw(&mut self, vertex_count: u32, first_instance: u32) {
            self.calls.push(Call::Draw {
                vertex_count,
                first_instance,
            });
        }
    }

    pub(crate) fn bindings() -> FrameBindings {
        FrameBindings {
            global_set: vk::DescriptorSet::from_raw(100),
            object_set: vk::DescriptorSet::from_raw(101),
            scene_offset: 256,
        }
    }

    pub(crate) fn arenas() -> (Arena<Material>, Arena<GpuMesh>) {
        let mut materials = Arena::new();
        materials.insert(
            "a",
            Material::new(vk::Pipeline::from_raw(1), vk::PipelineLayout::from_raw(1)),
        );
        materials.insert(
            "b",
            Material::new(vk::Pipeline::from_raw(2), vk::PipelineLayout::from_raw(2))
                .with_texture(vk::DescriptorSet::from_raw(9)),
        );

        let mut meshes = Arena::new();
        for (i, name) in ["x", "y"].into_iter().enumerate() {
            meshes.insert(
                name,
                GpuMesh {
                    vertex_buffer: vk::Buffer::from_raw(10 + i as u64),
                    vertex_count: 3 * (i as u32 + 1),
                },
            );
        }
        (materials, meshes)
    }

    pub(crate) fn object(material: u32, mesh: u32, x: f32) -> RenderObject {
        RenderObject::new(
            Handle::from_index(mesh),
            Handle::from_index(material),
            Mat4::from_translation(Vec3::new(x, 0.0, 0.0)),
        )
    }

    fn runs<K: PartialEq>(objects: &[RenderObject], key: impl Fn(&RenderObject) -> K) -> usize {
        let keys: Vec<K> = objects.iter().map(key).collect();
        keys.iter()
            .enumerate()
            .filter(|(i, k)| *i == 0 || keys[i - 1] != **k)
            .count()
    }

    #[test]
    fn test_sort_orders_by_material_then_mesh() {
        let mut objects = vec![
            object(1, 0, 0.0),
            object(0, 1, 1.0),
            object(1, 1, 2.0),
            object(0, 0, 3.0),
            object(0, 1, 4.0),
        ];
        sort_render_objects(&mut objects);

        for pair in objects.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert!(a.material <= b.material);
            if a.material == b.material {
                assert!(a.mesh <= b.mesh);
            }
        }
    }

    #[test]
    fn test_rebinds_match_run_counts() {
        let (materials, meshes) = arenas();
        let mut objects: Vec<RenderObject> = (0..40u32)
            .map(|i| object(i % 2, (i / 3) % 2, i as f32))
            .collect();
        sort_render_objects(&mut objects);

        let mut recorder = Recorder::default();
        let stats = draw_batch(&mut recorder, &objects, &materials, &meshes, &bindings()).unwrap();

        assert_eq!(stats.pipeline_binds, runs(&objects, |o| o.material));
        assert_eq!(stats.vertex_buffer_binds, runs(&objects, |o| o.mesh));
        assert_eq!(stats.pipeline_binds, 2);
        assert_eq!(stats.vertex_buffer_binds, 4);
        assert_eq!(stats.draws, 40);
    }

    #[test]
    fn test_unsorted_input_rebinds_on_every_change() {
        let (materials, meshes) = arenas();
        let objects = vec![object(0, 0, 0.0), object(1, 0, 0.0), object(0, 0, 0.0)];

        let mut recorder = Recorder::default();
        let stats = draw_batch(&mut recorder, &objects, &materials, &meshes, &bindings()).unwrap();
        assert_eq!(stats.pipeline_binds, 3);
        assert_eq!(stats.vertex_buffer_binds, 1);
    }

    #[test]
    fn test_draw_sequence() {
        let (materials, meshes) = arenas();
        let objects = vec![object(0, 1, 1.0), object(1, 1, 2.0)];

        let mut recorder = Recorder::default();
        draw_batch(&mut recorder, &objects, &materials, &meshes, &bindings()).unwrap();

        let translate = |x: f32| Mat4::from_translation(Vec3::new(x, 0.0, 0.0));
        assert_eq!(
            recorder.calls,
            vec![
                Call::BindPipeline(vk::Pipeline::from_raw(1)),
                Call::BindSets { first_set: 0, dynamic_offsets: vec![256] },
                Call::BindSets { first_set: 1, dynamic_offsets: vec![] },
                Call::Push(translate(1.0)),
                Call::BindVertexBuffer(vk::Buffer::from_raw(11)),
                Call::Draw { vertex_count: 6, first_instance: 0 },
                Call::BindPipeline(vk::Pipeline::from_raw(2)),
                Call::BindSets { first_set: 0, dynamic_offsets: vec![256] },
                Call::BindSets { first_set: 1, dynamic_offsets: vec![] },
                Call::BindSets { first_set: 2, dynamic_offsets: vec![] },
                Call::Push(translate(2.0)),
                Call::Draw { vertex_count: 6, first_instance: 1 },
            ]
        );
    }

    #[test]
    fn test_unknown_handle_is_an_error() {
        let (materials, meshes) = arenas();
        let objects = vec![object(5, 0, 0.0)];

        let mut recorder = Recorder::default();
        let result = draw_batch(&mut recorder, &objects, &materials, &meshes, &bindings());
        assert!(matches!(
            result,
            Err(RenderError::UnknownHandle { kind: "material", index: 5 })
        ));
        assert!(recorder.calls.is_empty());
    }

    #[test]
    fn test_object_data_follows_order() {
        let objects = vec![object(0, 0, 1.0), object(0, 0, 2.0)];
        let data = object_data(&objects);
        assert_eq!(data.len(), 2);
        assert_eq!(data[1].model_matrix, objects[1].transform);
    }
}
