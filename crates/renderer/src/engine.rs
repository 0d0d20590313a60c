//! The engine: owns the GPU, the scene and the frame loop.
//!
//! [`Engine::new`] builds everything once: instance, surface, device,
//! swapchain, render pass, descriptor layouts, frame slots, pipelines, the
//! demo meshes, materials and the sorted render-object list. Each call to
//! [`Engine::draw`] renders one frame into the next frame slot.
//!
//! # Resource Destruction Order
//!
//! Objects that live as long as the engine are retired into the
//! [`DeletionQueue`] as they are created. On drop the engine:
//! 1. Waits on every frame fence, then for the device to go idle
//! 2. Drops the overlay
//! 3. Flushes the deletion queue (reverse creation order)
//! 4. Drops the size-dependent targets and the swapchain
//! 5. Drops the frame, descriptor and upload state
//! 6. Drops the surface, then the device, then the instance
//!
//! `ManuallyDrop` fields pin steps 4 to 6 to that order.

use std::mem::ManuallyDrop;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use glam::Vec3;
use tracing::{debug, error, info, warn};

use renderer_core::{EngineConfig, FpsCounter, PresentModePreference};
use renderer_platform::{Action, Surface, Window};
use renderer_resources::{MeshData, TextureData};
use renderer_rhi::RhiError;
use renderer_rhi::device::Device;
use renderer_rhi::image::{DEPTH_FORMAT, Sampler};
use renderer_rhi::instance::Instance;
use renderer_rhi::physical_device::select_physical_device;
use renderer_rhi::pipeline::{full_scissor, full_viewport};
use renderer_rhi::render_pass::RenderPass;
use renderer_rhi::swapchain::Swapchain;
use renderer_scene::{Arena, Camera};

use crate::batch::{BatchStats, FrameBindings, RenderObject, object_data};
use crate::deletion_queue::{DeletionQueue, DeviceDisposer};
use crate::demo_scene::{
    EMPIRE_TEXTURE, MATERIAL_DEFAULT, MATERIAL_DUPLICATE, MATERIAL_TEXTURED, MESH_ASSETS,
    TRIANGLE_MESH, build_render_objects,
};
use crate::descriptors::DescriptorManager;
use crate::error::{RenderError, RenderResult};
use crate::frame_manager::{FrameManager, FrameOutcome, SwapchainFrames, run_frame};
use crate::material::Material;
use crate::mesh::{GpuMesh, upload_mesh};
use crate::overlay::{FrameStats, NoOverlay, UiOverlay, draw_scene};
use crate::pipelines::Pipelines;
use crate::render_targets::{RenderTargets, clear_values};
use crate::texture::upload_texture;
use crate::ubo::{GpuCameraData, GpuObjectData, GpuSceneData};
use crate::upload::UploadContext;

/// Camera translation, in steps, for a movement action.
pub fn camera_step(action: Action) -> Option<Vec3> {
    match action {
        Action::MoveForward => Some(Vec3::Z),
        Action::MoveBack => Some(Vec3::NEG_Z),
        Action::MoveLeft => Some(Vec3::X),
        Action::MoveRight => Some(Vec3::NEG_X),
        Action::ToggleShader | Action::Quit => None,
    }
}

fn present_mode(preference: PresentModePreference) -> vk::PresentModeKHR {
    match preference {
        PresentModePreference::Immediate => vk::PresentModeKHR::IMMEDIATE,
        PresentModePreference::Fifo => vk::PresentModeKHR::FIFO,
    }
}

/// Everything created after the device that the deletion queue owns.
struct SceneResources {
    render_pass: vk::RenderPass,
    targets: RenderTargets,
    upload: UploadContext,
    descriptors: DescriptorManager,
    frames: FrameManager,
    pipelines: Pipelines,
    meshes: Arena<GpuMesh>,
    materials: Arena<Material>,
    objects: Vec<RenderObject>,
}

/// Real-time renderer for the demo scene.
pub struct Engine {
    // Scene
    camera: Camera,
    scene_data: GpuSceneData,
    objects: Vec<RenderObject>,
    object_data: Vec<GpuObjectData>,
    materials: Arena<Material>,
    meshes: Arena<GpuMesh>,
    pipelines: Pipelines,
    overlay: Box<dyn UiOverlay>,

    // Frame state
    frame_number: u64,
    colored_triangle: bool,
    debug_triangle: bool,
    fps: FpsCounter,
    last_batch: BatchStats,
    window_extent: vk::Extent2D,
    swapchain_dirty: bool,

    // GPU state, in destruction order
    deletion_queue: DeletionQueue,
    render_pass: vk::RenderPass,
    targets: ManuallyDrop<RenderTargets>,
    swapchain: ManuallyDrop<Swapchain>,
    frames: ManuallyDrop<FrameManager>,
    descriptors: ManuallyDrop<DescriptorManager>,
    upload: ManuallyDrop<UploadContext>,
    surface: ManuallyDrop<Surface>,
    device: ManuallyDrop<Arc<Device>>,
    instance: ManuallyDrop<Instance>,
}

impl Engine {
    /// Initializes the GPU and loads the demo scene for `window`.
    ///
    /// Missing shaders, meshes or textures are logged and the objects that
    /// need them are left out of the scene.
    ///
    /// # Arguments
    ///
    /// * `window` - Window to render into
    /// * `config` - Startup configuration
    ///
    /// # Errors
    ///
    /// Returns an error if any Vulkan object cannot be created, an upload
    /// fails, or the scene has more objects than `config.max_objects`.
    pub fn new(window: &Window, config: &EngineConfig) -> RenderResult<Self> {
        let (width, height) = window.size();
        info!("Initializing engine ({}x{})", width, height);

        let extensions = window.required_surface_extensions()?;
        let instance = Instance::new(config.enable_validation, &extensions)?;
        let surface = window.create_surface(instance.entry(), instance.handle())?;
        let gpu = select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(&instance, &gpu)?;

        let window_extent = vk::Extent2D { width, height };
        let swapchain = Swapchain::new(
            &instance,
            device.clone(),
            surface.handle(),
            window_extent,
            present_mode(config.present_mode),
        )?;

        let mut deletion_queue = DeletionQueue::new();
        let resources = match Self::init_scene(&device, &swapchain, &mut deletion_queue, config) {
            Ok(resources) => resources,
            Err(e) => {
                if let Err(idle) = device.wait_idle() {
                    error!("Failed to wait for device idle after init error: {}", idle);
                }
                deletion_queue.flush(&mut DeviceDisposer::new(&device));
                return Err(e);
            }
        };

        let object_data = object_data(&resources.objects);
        info!(
            "Engine initialized: {} meshes, {} materials, {} render objects",
            resources.meshes.len(),
            resources.materials.len(),
            resources.objects.len()
        );

        Ok(Self {
            camera: Camera::default(),
            scene_data: GpuSceneData::default(),
            objects: resources.objects,
            object_data,
            materials: resources.materials,
            meshes: resources.meshes,
            pipelines: resources.pipelines,
            overlay: Box::new(NoOverlay),
            frame_number: 0,
            colored_triangle: false,
            debug_triangle: config.debug_triangle,
            fps: FpsCounter::default(),
            last_batch: BatchStats::default(),
            window_extent,
            swapchain_dirty: false,
            deletion_queue,
            render_pass: resources.render_pass,
            targets: ManuallyDrop::new(resources.targets),
            swapchain: ManuallyDrop::new(swapchain),
            frames: ManuallyDrop::new(resources.frames),
            descriptors: ManuallyDrop::new(resources.descriptors),
            upload: ManuallyDrop::new(resources.upload),
            surface: ManuallyDrop::new(surface),
            device: ManuallyDrop::new(device),
            instance: ManuallyDrop::new(instance),
        })
    }

    /// Builds the render pass, frame state, pipelines and demo scene.
    fn init_scene(
        device: &Arc<Device>,
        swapchain: &Swapchain,
        deletion_queue: &mut DeletionQueue,
        config: &EngineConfig,
    ) -> RenderResult<SceneResources> {
        let render_pass = deletion_queue.track(RenderPass::new(
            device.clone(),
            swapchain.format(),
            DEPTH_FORMAT,
        )?);
        let targets = RenderTargets::new(device.clone(), render_pass, swapchain)?;

        let mut upload =
            UploadContext::new(device.clone(), deletion_queue, config.upload_timeout_ns)?;
        let descriptors = DescriptorManager::new(device.clone(), deletion_queue)?;
        let frames = FrameManager::new(
            device.clone(),
            deletion_queue,
            &descriptors,
            config.max_objects,
            config.frame_timeout_ns,
        )?;
        let pipelines = Pipelines::new(
            device,
            deletion_queue,
            render_pass,
            swapchain.extent(),
            &config.shader_dir,
            descriptors.layouts(),
        )?;

        let meshes = Self::load_meshes(
            device,
            &mut upload,
            deletion_queue,
            &config.asset_dir,
            config.gpu_only_mesh_buffers,
        )?;
        let materials = Self::init_materials(
            device,
            &mut upload,
            deletion_queue,
            &descriptors,
            &pipelines,
            &config.asset_dir,
        )?;

        let objects = build_render_objects(&meshes, &materials);
        if objects.len() > config.max_objects {
            return Err(RenderError::TooManyObjects {
                count: objects.len(),
                capacity: config.max_objects,
            });
        }

        Ok(SceneResources {
            render_pass,
            targets,
            upload,
            descriptors,
            frames,
            pipelines,
            meshes,
            materials,
            objects,
        })
    }

    /// Uploads the built-in triangle and every demo mesh found on disk.
    fn load_meshes(
        device: &Arc<Device>,
        upload: &mut UploadContext,
        deletion_queue: &mut DeletionQueue,
        asset_dir: &Path,
        gpu_only: bool,
    ) -> RenderResult<Arena<GpuMesh>> {
        let mut meshes = Arena::new();

        let triangle = upload_mesh(device, upload, deletion_queue, &MeshData::triangle(), gpu_only)?;
        meshes.insert(TRIANGLE_MESH, triangle);

        for (name, file) in MESH_ASSETS {
            let path = asset_dir.join(file);
            let data = match MeshData::load(&path) {
                Ok(data) => data,
                Err(e) => {
                    warn!("Skipping mesh '{}': {}", name, e);
                    continue;
                }
            };
            let mesh = upload_mesh(device, upload, deletion_queue, &data, gpu_only)?;
            debug!("Mesh '{}': {} vertices", name, mesh.vertex_count);
            meshes.insert(name, mesh);
        }

        Ok(meshes)
    }

    /// Registers a material for every pipeline that was built.
    ///
    /// Order matters: handles are assigned in insertion order and the batch
    /// sorts by them.
    fn init_materials(
        device: &Arc<Device>,
        upload: &mut UploadContext,
        deletion_queue: &mut DeletionQueue,
        descriptors: &DescriptorManager,
        pipelines: &Pipelines,
        asset_dir: &Path,
    ) -> RenderResult<Arena<Material>> {
        let mut materials = Arena::new();

        if pipelines.mesh != vk::Pipeline::null() {
            let untextured = Material::new(pipelines.mesh, pipelines.mesh_layout);
            materials.insert(MATERIAL_DEFAULT, untextured);
            materials.insert(MATERIAL_DUPLICATE, untextured);
        } else {
            warn!("Mesh pipeline unavailable; untextured materials not registered");
        }

        if pipelines.textured == vk::Pipeline::null() {
            warn!("Textured pipeline unavailable; '{}' not registered", MATERIAL_TEXTURED);
            return Ok(materials);
        }

        let texture = match TextureData::load(&asset_dir.join(EMPIRE_TEXTURE)) {
            Ok(texture) => texture,
            Err(e) => {
                warn!("Skipping material '{}': {}", MATERIAL_TEXTURED, e);
                return Ok(materials);
            }
        };
        let image = upload_texture(device, upload, deletion_queue, &texture)?;
        let sampler = deletion_queue.track(Sampler::new(device.clone(), vk::Filter::NEAREST)?);
        let texture_set = descriptors.allocate_texture_set(sampler, image.view)?;
        materials.insert(
            MATERIAL_TEXTURED,
            Material::new(pipelines.textured, pipelines.textured_layout).with_texture(texture_set),
        );

        Ok(materials)
    }

    /// Installs a UI overlay, running its one-time uploads first.
    ///
    /// # Errors
    ///
    /// Returns the overlay's upload error; the previous overlay stays.
    pub fn set_overlay(&mut self, mut overlay: Box<dyn UiOverlay>) -> RenderResult<()> {
        overlay.upload(&mut self.upload)?;
        self.overlay = overlay;
        Ok(())
    }

    /// Applies one input action.
    ///
    /// `Quit` is left to the caller.
    pub fn handle_action(&mut self, action: Action) {
        if let Some(step) = camera_step(action) {
            self.camera.step(step);
            debug!("Camera moved to {}", self.camera.position);
        } else if action == Action::ToggleShader {
            self.colored_triangle = !self.colored_triangle;
            debug!("Debug triangle colored: {}", self.colored_triangle);
        }
    }

    /// Records a new window size; the swapchain is rebuilt on the next draw.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == self.window_extent.width && height == self.window_extent.height {
            return;
        }
        debug!(
            "Resize: {}x{} -> {}x{}",
            self.window_extent.width, self.window_extent.height, width, height
        );
        self.window_extent = vk::Extent2D { width, height };
        self.swapchain_dirty = true;
    }

    fn rebuild_swapchain(&mut self) -> RenderResult<()> {
        self.swapchain.rebuild(self.window_extent)?;
        self.targets.rebuild(self.render_pass, &self.swapchain)?;
        self.swapchain_dirty = false;
        Ok(())
    }

    /// Renders one frame.
    ///
    /// Does nothing while the window is minimized. An out-of-date swapchain
    /// skips the frame and is rebuilt on the next call.
    ///
    /// # Errors
    ///
    /// Returns an error if a fence wait or acquire times out, a buffer write
    /// goes past its capacity, or submission or presentation fails.
    pub fn draw(&mut self) -> RenderResult<()> {
        if self.window_extent.width == 0 || self.window_extent.height == 0 {
            return Ok(());
        }
        if self.swapchain_dirty {
            self.rebuild_swapchain()?;
        }

        let frame_number = self.frame_number;
        let extent = self.swapchain.extent();
        let sync = SwapchainFrames::new(&self.frames, &self.swapchain);

        let outcome = run_frame(&sync, frame_number, |image_index| {
            let framebuffer = self.targets.framebuffer(image_index).ok_or_else(|| {
                RhiError::InvalidHandle(format!("No framebuffer for swapchain image {}", image_index))
            })?;

            let aspect = extent.width as f32 / extent.height as f32;
            let frame = self.frames.frame(frame_number);
            frame.write_camera(&GpuCameraData::new(
                self.camera.view_matrix(),
                self.camera.projection_matrix(aspect),
            ))?;
            frame.write_objects(&self.object_data)?;
            self.scene_data.animate(frame_number);
            self.descriptors.write_scene(frame_number, &self.scene_data)?;

            let sets = frame.sets();
            let bindings = FrameBindings {
                global_set: sets.global,
                object_set: sets.object,
                scene_offset: self.descriptors.scene_offset(frame_number),
            };
            self.overlay.prepare(&FrameStats {
                frame_number,
                fps: self.fps.last_fps(),
                batch: self.last_batch,
            });

            let cmd = frame.command_buffer();
            let clear = clear_values(frame_number);
            let begin_info = vk::RenderPassBeginInfo::default()
                .render_pass(self.render_pass)
                .framebuffer(framebuffer)
                .render_area(full_scissor(extent))
                .clear_values(&clear);
            cmd.begin_render_pass(&begin_info);
            cmd.set_viewport(full_viewport(extent));
            cmd.set_scissor(full_scissor(extent));

            let triangle = self.pipelines.debug_triangle(self.colored_triangle);
            if self.debug_triangle && triangle != vk::Pipeline::null() {
                cmd.bind_pipeline(vk::PipelineBindPoint::GRAPHICS, triangle);
                cmd.draw(3, 1, 0, 0);
            }

            let mut recorder = cmd.clone();
            let recorded = draw_scene(
                &mut recorder,
                &self.objects,
                &self.materials,
                &self.meshes,
                &bindings,
                self.overlay.as_mut(),
            );
            cmd.end_render_pass();
            recorded
        })?;

        match outcome {
            FrameOutcome::Presented { recorded, rebuild } => {
                self.last_batch = recorded;
                if rebuild {
                    self.swapchain_dirty = true;
                }
            }
            FrameOutcome::Skipped => {
                debug!("Swapchain out of date; skipping frame {}", frame_number);
                self.swapchain_dirty = true;
                return Ok(());
            }
        }

        self.frame_number += 1;
        if let Some(fps) = self.fps.update(self.frame_number) {
            info!("FPS: {}", fps);
        }
        Ok(())
    }

    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    #[inline]
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// What the last completed frame's batch recorded.
    #[inline]
    pub fn last_batch(&self) -> BatchStats {
        self.last_batch
    }

    #[inline]
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.frames.wait_for_all_frames() {
            error!("Failed to wait for frame fences during shutdown: {}", e);
        }
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during shutdown: {}", e);
        }

        self.overlay = Box::new(NoOverlay);
        self.deletion_queue
            .flush(&mut DeviceDisposer::new(&self.device));

        // SAFETY: each field is dropped exactly once, here, and nothing
        // touches it afterwards.
        unsafe {
            ManuallyDrop::drop(&mut self.targets);
            ManuallyDrop::drop(&mut self.swapchain);
            ManuallyDrop::drop(&mut self.frames);
            ManuallyDrop::drop(&mut self.descriptors);
            ManuallyDrop::drop(&mut self.upload);
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.instance);
        }

        info!("Engine destroyed after {} frames", self.frame_number);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_steps_follow_wasd() {
        assert_eq!(camera_step(Action::MoveForward), Some(Vec3::new(0.0, 0.0, 1.0)));
        assert_eq!(camera_step(Action::MoveBack), Some(Vec3::new(0.0, 0.0, -1.0)));
        assert_eq!(camera_step(Action::MoveLeft), Some(Vec3::new(1.0, 0.0, 0.0)));
        assert_eq!(camera_step(Action::MoveRight), Some(Vec3::new(-1.0, 0.0, 0.0)));
        assert_eq!(camera_step(Action::ToggleShader), None);
        assert_eq!(camera_step(Action::Quit), None);
    }

    #[test]
    fn test_present_mode_preference() {
        assert_eq!(
            present_mode(PresentModePreference::Immediate),
            vk::PresentModeKHR::IMMEDIATE
        );
        assert_eq!(present_mode(PresentModePreference::Fifo), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_camera_step_moves_one_unit() {
        let mut camera = Camera::default();
        let start = camera.position;
        for action in [Action::MoveForward, Action::MoveForward, Action::MoveLeft] {
            if let Some(step) = camera_step(action) {
                camera.step(step);
            }
        }
        assert_eq!(camera.position - start, Vec3::new(1.0, 0.0, 2.0));
    }
}
