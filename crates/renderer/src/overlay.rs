//! Hook for an immediate-mode UI drawn on top of the scene.
//!
//! The overlay records into the frame's command buffer inside the same render
//! pass instance, right after the 3D batch. One-time GPU setup such as a font
//! atlas goes through the upload context when the overlay is installed.

use renderer_rhi::command::CommandBuffer;
use renderer_scene::Arena;

use crate::batch::{BatchStats, DrawCommands, FrameBindings, RenderObject, draw_batch};
use crate::error::RenderResult;
use crate::material::Material;
use crate::mesh::GpuMesh;
use crate::upload::UploadContext;

/// Numbers an overlay may display.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frame_number: u64,
    /// Frames rendered during the last full second.
    pub fps: u64,
    /// What the previous frame's batch recorded.
    pub batch: BatchStats,
}

/// A UI layer recorded after the scene.
pub trait UiOverlay<C: ?Sized = CommandBuffer> {
    /// Uploads fonts or other static resources. Called once on install.
    ///
    /// # Errors
    ///
    /// Returns an error if the upload fails; the overlay is not installed.
    fn upload(&mut self, _upload: &mut UploadContext) -> RenderResult<()> {
        Ok(())
    }

    /// Builds this frame's UI before recording starts.
    fn prepare(&mut self, _stats: &FrameStats) {}

    /// Records the UI draw commands into the open render pass.
    fn record(&mut self, cmd: &mut C);
}

/// Overlay that draws nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOverlay;

impl<C: ?Sized> UiOverlay<C> for NoOverlay {
    fn record(&mut self, _cmd: &mut C) {}
}

/// Records the sorted batch followed by the overlay.
///
/// Both land in the render pass instance the caller has already begun; the
/// caller ends it afterwards.
///
/// # Errors
///
/// Returns the batch error, in which case the overlay is not recorded.
pub fn draw_scene<C, O>(
    cmd: &mut C,
    objects: &[RenderObject],
    materials: &Arena<Material>,
    meshes: &Arena<GpuMesh>,
    bindings: &FrameBindings,
    overlay: &mut O,
) -> RenderResult<BatchStats>
where
    C: DrawCommands + ?Sized,
    O: UiOverlay<C> + ?Sized,
{
    let stats = draw_batch(cmd, objects, materials, meshes, bindings)?;
    overlay.record(cmd);
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::sort_render_objects;
    use crate::batch::tests::{Call, Recorder, arenas, bindings, object};
    use crate::error::RenderError;

    #[derive(Default)]
    struct MarkerOverlay {
        prepared: Vec<FrameStats>,
    }

    impl UiOverlay<Recorder> for MarkerOverlay {
        fn prepare(&mut self, stats: &FrameStats) {
            self.prepared.push(*stats);
        }

        fn record(&mut self, cmd: &mut Recorder) {
            cmd.calls.push(Call::Overlay);
        }
    }

    #[test]
    fn test_overlay_recorded_after_batch() {
        let (materials, meshes) = arenas();
        let mut objects = vec![object(1, 0, 0.0), object(0, 1, 1.0), object(0, 0, 2.0)];
        sort_render_objects(&mut objects);

        let mut recorder = Recorder::default();
        let mut overlay = MarkerOverlay::default();
        let stats = draw_scene(
            &mut recorder,
            &objects,
            &materials,
            &meshes,
            &bindings(),
            &mut overlay,
        )
        .unwrap();

        assert_eq!(stats.draws, 3);
        assert_eq!(recorder.calls.last(), Some(&Call::Overlay));
        let overlay_calls = recorder.calls.iter().filter(|c| **c == Call::Overlay).count();
        assert_eq!(overlay_calls, 1);

        let last_draw = recorder
            .calls
            .iter()
            .rposition(|c| matches!(c, Call::Draw { .. }))
            .unwrap();
        assert_eq!(last_draw, recorder.calls.len() - 2);
    }

    #[test]
    fn test_overlay_skipped_when_batch_fails() {
        let (materials, meshes) = arenas();
        let objects = vec![object(7, 0, 0.0)];

        let mut recorder = Recorder::default();
        let mut overlay = MarkerOverlay::default();
        let result = draw_scene(
            &mut recorder,
            &objects,
            &materials,
            &meshes,
            &bindings(),
            &mut overlay,
        );

        assert!(matches!(
            result,
            Err(RenderError::UnknownHandle {
                kind: "material",
                index: 7
            })
        ));
        assert!(!recorder.calls.contains(&Call::Overlay));
    }

    #[test]
    fn test_no_overlay_records_nothing() {
        let (materials, meshes) = arenas();
        let mut recorder = Recorder::default();
        let stats = draw_scene(
            &mut recorder,
            &[],
            &materials,
            &meshes,
            &bindings(),
            &mut NoOverlay,
        )
        .unwrap();

        assert_eq!(stats, BatchStats::default());
        assert!(recorder.calls.is_empty());
    }

    #[test]
    fn test_prepare_sees_stats() {
        let mut overlay = MarkerOverlay::default();
        let stats = FrameStats {
            frame_number: 42,
            fps: 60,
            batch: BatchStats {
                pipeline_binds: 3,
                vertex_buffer_binds: 6,
                draws: 1685,
            },
        };
        UiOverlay::<Recorder>::prepare(&mut overlay, &stats);
        assert_eq!(overlay.prepared, vec![stats]);
    }
}
