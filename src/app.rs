//! Application event loop.
//!
//! One window, one session. The session owns the GPU context, the loaded
//! scene and the telemetry; it is constructed when the window mounts and
//! dropped with it, so no engine state outlives the window.
//!
//! # Lifecycle
//!
//! 1. `resumed` creates the window and GPU context (blocking on native,
//!    via a spawned task on the web) and kicks off the load tasks
//! 2. load results arrive as [`ViewerEvent`]s and are folded into the
//!    session; the camera is fitted when the model lands
//! 3. `RedrawRequested` renders continuously at the display refresh rate;
//!    the title line doubles as the telemetry readout

use std::iter;
use std::sync::Arc;

use instant::{Duration, Instant};
use winit::{
    application::ApplicationHandler,
    event::{DeviceEvent, DeviceId, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy},
    window::Window,
};

use crate::{
    config::ViewerConfig,
    context::Context,
    data_structures::model::{DrawModel, Model},
    environment::Environment,
    scene::{self, SceneRequest, ViewerEvent},
    telemetry::Telemetry,
};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

const TITLE: &str = "vitrine";
const TITLE_REFRESH: Duration = Duration::from_millis(500);

/// Per-window state: context, loaded scene, telemetry.
struct Session {
    ctx: Context,
    telemetry: Arc<Telemetry>,
    model: Option<Model>,
    environment: Option<Environment>,
    is_surface_configured: bool,
    rotating: bool,
    last_title_refresh: Instant,
}

impl Session {
    fn new(ctx: Context, telemetry: Arc<Telemetry>) -> Self {
        Self {
            ctx,
            telemetry,
            model: None,
            environment: None,
            is_surface_configured: false,
            rotating: false,
            last_title_refresh: Instant::now(),
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.ctx.resize(width, height);
            self.is_surface_configured = true;
        }
    }

    fn render(&mut self) -> Result<(), wgpu::SurfaceError> {
        // Continuous loop: each presented frame schedules the next one.
        self.ctx.window.request_redraw();

        if !self.is_surface_configured {
            return Ok(());
        }

        self.ctx.update_camera();

        let output = self.ctx.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder: wgpu::CommandEncoder =
            self.ctx
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Render Encoder"),
                });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: 0.013,
                            g: 0.013,
                            b: 0.015,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.ctx.depth_texture.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            // A critical load failure shows no partial scene.
            if self.telemetry.error().is_none() {
                let env_bind_group = self
                    .environment
                    .as_ref()
                    .map(|env| &env.bind_group)
                    .unwrap_or(&self.ctx.placeholder_env.bind_group);

                if let Some(model) = &self.model {
                    render_pass.set_pipeline(&self.ctx.pipelines.pbr);
                    render_pass.draw_model(model, &self.ctx.camera.bind_group, env_bind_group);
                }
                if let Some(env) = &self.environment {
                    render_pass.set_pipeline(&self.ctx.pipelines.sky);
                    render_pass.set_bind_group(0, &self.ctx.camera.bind_group, &[]);
                    render_pass.set_bind_group(1, &env.bind_group, &[]);
                    render_pass.draw(0..3, 0..1);
                }
            }
        }

        self.ctx.queue.submit(iter::once(encoder.finish()));
        output.present();
        self.telemetry.frame_presented();
        self.refresh_title();
        Ok(())
    }

    /// The window title doubles as the telemetry readout.
    fn refresh_title(&mut self) {
        if self.last_title_refresh.elapsed() < TITLE_REFRESH {
            return;
        }
        self.last_title_refresh = Instant::now();

        let title = if let Some(error) = self.telemetry.error() {
            format!("{} — error: {}", TITLE, error)
        } else if self.telemetry.loading() {
            format!("{} — loading {}%", TITLE, self.telemetry.progress())
        } else {
            let metrics = self.telemetry.snapshot();
            format!(
                "{} — {} · model {} · textures {}",
                TITLE,
                metrics
                    .total
                    .duration_ms
                    .map(|ms| format!("{} ms", ms))
                    .unwrap_or_else(|| "…".to_string()),
                format_bytes(metrics.model.size_bytes),
                format_bytes(metrics.textures.size_bytes),
            )
        };
        self.ctx.window.set_title(&title);
    }
}

fn format_bytes(bytes: Option<u64>) -> String {
    match bytes {
        None => "unknown".to_string(),
        Some(n) if n < 1024 => format!("{} B", n),
        Some(n) if n < 1024 * 1024 => format!("{:.1} KB", n as f64 / 1024.0),
        Some(n) => format!("{:.1} MB", n as f64 / (1024.0 * 1024.0)),
    }
}

pub struct App {
    #[cfg(not(target_arch = "wasm32"))]
    async_runtime: tokio::runtime::Runtime,
    proxy: EventLoopProxy<ViewerEvent>,
    config: Option<ViewerConfig>,
    session: Option<Session>,
}

impl App {
    fn new(event_loop: &EventLoop<ViewerEvent>, config: ViewerConfig) -> anyhow::Result<Self> {
        Ok(Self {
            #[cfg(not(target_arch = "wasm32"))]
            async_runtime: tokio::runtime::Runtime::new()?,
            proxy: event_loop.create_proxy(),
            config: Some(config),
            session: None,
        })
    }

    /// Spawn the load tasks against a live session.
    fn start_loading(&mut self, config: ViewerConfig) {
        let Some(session) = &self.session else {
            return;
        };
        let request = SceneRequest::new(&session.ctx, config, session.telemetry.clone());
        let proxy = self.proxy.clone();
        let emit = move |event| {
            // A closed loop means the window is gone; results are discarded.
            let _ = proxy.send_event(event);
        };

        #[cfg(not(target_arch = "wasm32"))]
        self.async_runtime.spawn(scene::load_session(request, emit));

        #[cfg(target_arch = "wasm32")]
        wasm_bindgen_futures::spawn_local(scene::load_session(request, emit));
    }
}

impl ApplicationHandler<ViewerEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        // Idempotent per mount; a second resume reuses the session.
        if self.session.is_some() {
            return;
        }

        #[allow(unused_mut)]
        let mut window_attributes = Window::default_attributes().with_title(TITLE);

        #[cfg(target_arch = "wasm32")]
        {
            use wasm_bindgen::JsCast;
            use winit::platform::web::WindowAttributesExtWebSys;

            const CANVAS_ID: &str = "canvas";

            let window = wgpu::web_sys::window().unwrap_throw();
            let document = window.document().unwrap_throw();
            let canvas = document.get_element_by_id(CANVAS_ID).unwrap_throw();
            let html_canvas_element = canvas.unchecked_into();
            window_attributes = window_attributes.with_canvas(Some(html_canvas_element));
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("cannot create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        #[cfg(not(target_arch = "wasm32"))]
        {
            let ctx = match self.async_runtime.block_on(Context::new(window)) {
                Ok(ctx) => ctx,
                Err(e) => {
                    log::error!("GPU context initialization failed: {}", e);
                    event_loop.exit();
                    return;
                }
            };
            self.session = Some(Session::new(ctx, Arc::new(Telemetry::new())));
            if let Some(config) = self.config.take() {
                self.start_loading(config);
            }
        }

        #[cfg(target_arch = "wasm32")]
        {
            let proxy = self.proxy.clone();
            wasm_bindgen_futures::spawn_local(async move {
                match Context::new(window).await {
                    Ok(ctx) => {
                        assert!(proxy.send_event(ViewerEvent::Ready(Box::new(ctx))).is_ok())
                    }
                    Err(e) => {
                        let _ = proxy
                            .send_event(ViewerEvent::LoadFailed(format!("GPU init failed: {}", e)));
                    }
                }
            });
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: ViewerEvent) {
        match event {
            ViewerEvent::Ready(ctx) => {
                // Web bootstrap: context arrived asynchronously.
                let mut session = Session::new(*ctx, Arc::new(Telemetry::new()));
                let size = session.ctx.window.inner_size();
                session.resize(size.width, size.height);
                session.ctx.window.request_redraw();
                self.session = Some(session);
                if let Some(config) = self.config.take() {
                    self.start_loading(config);
                }
            }
            ViewerEvent::EnvironmentReady(environment) => {
                if let Some(session) = &mut self.session {
                    session.environment = Some(*environment);
                }
            }
            ViewerEvent::SceneReady(model) => {
                if let Some(session) = &mut self.session {
                    session
                        .ctx
                        .camera
                        .controller
                        .fit(&model.bounds, &session.ctx.projection);
                    log::info!("scene ready: {} meshes", model.meshes.len());
                    session.model = Some(*model);
                }
            }
            ViewerEvent::LoadFailed(message) => {
                // The load task already routed the failure into telemetry
                // when a session exists; without one there is nothing to
                // show a message on.
                if self.session.is_none() {
                    log::error!("{}", message);
                    event_loop.exit();
                }
            }
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: DeviceId,
        event: DeviceEvent,
    ) {
        let Some(session) = &mut self.session else {
            return;
        };
        if let DeviceEvent::MouseMotion { delta: (dx, dy) } = event {
            if session.rotating {
                session.ctx.camera.controller.handle_mouse(dx, dy);
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let Some(session) = &mut self.session else {
            return;
        };

        session.ctx.camera.controller.handle_window_events(&event);

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => session.resize(size.width, size.height),
            WindowEvent::MouseInput { state, button, .. } => {
                if button == MouseButton::Left {
                    session.rotating = state.is_pressed();
                }
            }
            WindowEvent::RedrawRequested => match session.render() {
                Ok(_) => {}
                // Reconfigure the surface if it's lost or outdated
                Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                    let size = session.ctx.window.inner_size();
                    session.resize(size.width, size.height);
                }
                Err(e) => {
                    log::error!("Unable to render {}", e);
                }
            },
            _ => {}
        }
    }
}

/// Run the viewer until its window closes.
pub fn run(config: ViewerConfig) -> anyhow::Result<()> {
    #[cfg(not(target_arch = "wasm32"))]
    {
        if let Err(e) = env_logger::try_init() {
            println!("Warning: Could not initialize logger: {}", e);
        }
    }

    #[cfg(target_arch = "wasm32")]
    {
        console_log::init_with_level(log::Level::Info).unwrap_throw();
    }

    let event_loop: EventLoop<ViewerEvent> = EventLoop::with_user_event().build()?;
    let mut app = App::new(&event_loop, config)?;
    event_loop.run_app(&mut app)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(None), "unknown");
        assert_eq!(format_bytes(Some(512)), "512 B");
        assert_eq!(format_bytes(Some(2048)), "2.0 KB");
        assert_eq!(format_bytes(Some(3 * 1024 * 1024)), "3.0 MB");
    }
}
