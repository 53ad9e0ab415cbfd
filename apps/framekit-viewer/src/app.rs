//! Viewer application: a spinning cube in front of a movable camera.

use std::f32::consts::TAU;
use std::sync::Arc;

use glam::Vec3;
use tracing::info;

use framekit_app::{AppContext, Camera, FrameApp, FrameContext, Transform, WindowEvent};
use framekit_core::ObjectId;
use framekit_render::{Model, ModelBuilder, ObjectStore, RenderSystem, SimpleRenderSystem};

use crate::controller::KeyboardController;

/// Vertical field of view in degrees.
const FOV_Y_DEGREES: f32 = 50.0;
const NEAR: f32 = 0.1;
const FAR: f32 = 10.0;

/// Cube spin in radians per second around Y and X.
const SPIN: Vec3 = Vec3::new(0.25, 0.5, 0.0);

pub struct Viewer {
    render_system: SimpleRenderSystem,
    cube: Arc<Model>,
    cube_id: ObjectId,
    objects: ObjectStore,
    camera: Camera,
    viewer: Transform,
    controller: KeyboardController,
}

impl FrameApp for Viewer {
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
        let device = ctx.device().as_ref();
        let render_system = SimpleRenderSystem::new(
            device,
            ctx.render_pass(),
            framekit_shaders::simple_vertex_shader(),
            framekit_shaders::simple_fragment_shader(),
        )?;
        let cube = Arc::new(Model::new(device, &ModelBuilder::cube(Vec3::ZERO))?);

        let mut objects = ObjectStore::new();
        let object = objects.create();
        object.model = Some(cube.clone());
        object.color = Vec3::ONE;
        object.transform.translation = Vec3::new(0.0, 0.0, 2.5);
        object.transform.scale = Vec3::splat(0.5);
        let cube_id = object.id();

        info!("Viewer ready: {} object(s)", objects.len());

        Ok(Self {
            render_system,
            cube,
            cube_id,
            objects,
            camera: Camera::default(),
            viewer: Transform::default(),
            controller: KeyboardController::default(),
        })
    }

    fn update(&mut self, ctx: &AppContext, dt: f32) {
        self.controller.move_in_plane_xz(dt, &mut self.viewer);
        self.camera
            .set_view_yxz(self.viewer.translation, self.viewer.rotation);
        self.camera.set_perspective_projection(
            FOV_Y_DEGREES.to_radians(),
            ctx.aspect_ratio(),
            NEAR,
            FAR,
        );

        if let Some(cube) = self.objects.get_mut(self.cube_id) {
            let rotation = &mut cube.transform.rotation;
            *rotation += SPIN * dt;
            rotation.x = rotation.x.rem_euclid(TAU);
            rotation.y = rotation.y.rem_euclid(TAU);
        }
    }

    fn render(&mut self, ctx: &AppContext, frame: &FrameContext) -> anyhow::Result<()> {
        let scene = self.objects.view(&self.camera);
        self.render_system
            .render(ctx.device().as_ref(), frame, &scene);
        Ok(())
    }

    fn on_event(&mut self, event: &WindowEvent) {
        self.controller.process_event(event);
    }

    fn on_swapchain_recreated(&mut self, ctx: &mut AppContext) -> anyhow::Result<()> {
        let extent = ctx.extent();
        info!(
            "Swapchain now {}x{} ({})",
            extent.width,
            extent.height,
            ctx.renderer().generation()
        );
        self.render_system
            .on_swapchain_recreated(ctx.device().as_ref(), ctx.render_pass())?;
        Ok(())
    }

    fn cleanup(&mut self, ctx: &mut AppContext) {
        let device = ctx.device().as_ref();
        // SAFETY: the device is idle during cleanup.
        unsafe {
            self.cube.destroy(device);
            self.render_system.destroy(device);
        }
        info!("Viewer resources released");
    }
}
