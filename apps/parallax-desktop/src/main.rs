use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use egui::Context as EguiContext;
use glam::{UVec2, Vec2};
use parallax_assets::demo::{DEMO_DEPTH_MAP, DEMO_IMAGE, demo_loader};
use parallax_assets::{FsImageLoader, ImageLoader, Texture};
use parallax_common::{ImageRef, ListenerScope, PointerModel, Rect};
use parallax_input::{PointerEvent, PointerRouter};
use parallax_render::RenderSurface;
use parallax_render_wgpu::{WgpuBackend, WgpuParallaxSurface};
use parallax_view::{
    FetchCompletion, FetchTicket, Host, LoadOutcome, ParallaxImageView, ViewConfig, ViewPhase,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop, EventLoopProxy};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

const DEMO_SIZE: (u32, u32) = (640, 480);

#[derive(Parser)]
#[command(name = "parallax-desktop", about = "Parallax depth-map image viewer")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// YAML or JSON view config; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Base image path (procedural demo image when omitted)
    #[arg(long)]
    image: Option<String>,

    /// Grayscale depth map path
    #[arg(long)]
    depth_map: Option<String>,

    /// Output width in logical pixels
    #[arg(long)]
    width: Option<f32>,

    /// Output height in logical pixels
    #[arg(long)]
    height: Option<f32>,

    /// Displacement divisor; larger is calmer
    #[arg(long)]
    intensity: Option<f32>,

    /// Pointer model: viewport or surface
    #[arg(long)]
    model: Option<PointerModel>,

    /// Listener scope: window or surface
    #[arg(long)]
    scope: Option<ListenerScope>,
}

impl Cli {
    fn view_config(&self) -> Result<ViewConfig> {
        // Without a config file the missing half would fall back to a demo
        // locator that the filesystem loader cannot serve.
        if self.config.is_none() && self.image.is_some() != self.depth_map.is_some() {
            bail!("--image and --depth-map must be given together unless --config is set");
        }
        let mut config = match &self.config {
            Some(path) => ViewConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => ViewConfig::new(DEMO_IMAGE, DEMO_DEPTH_MAP),
        };
        if let Some(image) = &self.image {
            config.image = ImageRef::from(image.as_str());
        }
        if let Some(depth_map) = &self.depth_map {
            config.depth_map = ImageRef::from(depth_map.as_str());
        }
        config.width = self.width.or(config.width);
        config.height = self.height.or(config.height);
        config.intensity = self.intensity.or(config.intensity);
        config.model = self.model.unwrap_or(config.model);
        config.scope = self.scope.or(config.scope);
        config.validate()?;
        Ok(config)
    }
}

fn loader_for(config: &ViewConfig) -> Arc<dyn ImageLoader + Send + Sync> {
    if config.image.as_str() == DEMO_IMAGE && config.depth_map.as_str() == DEMO_DEPTH_MAP {
        tracing::info!("no image given, using procedural demo images");
        Arc::new(demo_loader(DEMO_SIZE.0, DEMO_SIZE.1))
    } else {
        Arc::new(FsImageLoader::new())
    }
}

enum AppEvent {
    TexturesFetched(FetchCompletion),
}

enum PanelAction {
    Apply(ViewConfig),
    Reload,
}

/// Thumbnails of the two source images shown in the side panel.
struct Previews {
    base: egui::TextureHandle,
    depth_map: egui::TextureHandle,
}

impl Previews {
    fn new(ctx: &EguiContext, base: &Texture, depth_map: &Texture) -> Self {
        let upload = |name: &str, texture: &Texture| {
            let pixels = texture.pixels();
            let image = egui::ColorImage::from_rgba_unmultiplied(
                [pixels.width() as usize, pixels.height() as usize],
                pixels.as_raw(),
            );
            ctx.load_texture(name, image, egui::TextureOptions::LINEAR)
        };
        Self {
            base: upload("preview_base", base),
            depth_map: upload("preview_depth_map", depth_map),
        }
    }
}

/// Snapshot of the view shown in the panel.
struct ViewStatus {
    phase: ViewPhase,
    error: Option<String>,
    size: Option<Vec2>,
    scale: Vec2,
}

/// Side panel: source previews and view settings.
struct Panel {
    draft: ViewConfig,
    previews: Option<Previews>,
    visible: bool,
}

impl Panel {
    fn draw(&mut self, ctx: &EguiContext, status: &ViewStatus) -> Option<PanelAction> {
        if !self.visible {
            return None;
        }
        let mut action = None;
        egui::SidePanel::right("parallax_panel")
            .default_width(260.0)
            .show(ctx, |ui| {
                ui.heading("Parallax");
                ui.separator();
                ui.label(format!("State: {:?}", status.phase));
                if let Some(size) = status.size {
                    ui.label(format!("Size: {:.0} x {:.0}", size.x, size.y));
                }
                ui.label(format!("Scale: ({:.2}, {:.2})", status.scale.x, status.scale.y));
                if let Some(error) = &status.error {
                    ui.colored_label(egui::Color32::LIGHT_RED, error);
                }
                ui.separator();

                ui.heading("Settings");
                egui::ComboBox::from_label("Pointer model")
                    .selected_text(self.draft.model.to_string())
                    .show_ui(ui, |ui| {
                        ui.selectable_value(
                            &mut self.draft.model,
                            PointerModel::ViewportNormalized,
                            "viewport-normalized",
                        );
                        ui.selectable_value(
                            &mut self.draft.model,
                            PointerModel::SurfaceLocal,
                            "surface-local",
                        );
                    });
                let scope_text = match self.draft.scope {
                    Some(scope) => scope.to_string(),
                    None => format!("{} (default)", self.draft.model.default_scope()),
                };
                egui::ComboBox::from_label("Listener scope")
                    .selected_text(scope_text)
                    .show_ui(ui, |ui| {
                        ui.selectable_value(&mut self.draft.scope, None, "model default");
                        let scope = &mut self.draft.scope;
                        ui.selectable_value(scope, Some(ListenerScope::Window), "window");
                        ui.selectable_value(scope, Some(ListenerScope::Surface), "surface");
                    });
                let mut intensity = self.draft.divisor();
                if ui
                    .add(egui::Slider::new(&mut intensity, 1.0..=60.0).text("Intensity"))
                    .changed()
                {
                    self.draft.intensity = Some(intensity);
                }
                ui.horizontal(|ui| {
                    if ui.button("Apply").clicked() {
                        action = Some(PanelAction::Apply(self.draft.clone()));
                    }
                    if ui.button("Reload (R)").clicked() {
                        action = Some(PanelAction::Reload);
                    }
                });

                if let Some(previews) = &self.previews {
                    ui.separator();
                    ui.label("Image");
                    ui.add(egui::Image::new(&previews.base).max_width(240.0));
                    ui.label("Depth map");
                    ui.add(egui::Image::new(&previews.depth_map).max_width(240.0));
                }

                ui.separator();
                ui.small("F1: Toggle panel | R: Reload");
            });
        action
    }
}

struct Gpu {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    config: wgpu::SurfaceConfiguration,
    backend: WgpuBackend,
    egui_winit: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,
}

impl Gpu {
    fn new(event_loop: &ActiveEventLoop, egui_ctx: &EguiContext) -> Result<Self> {
        let attrs = Window::default_attributes()
            .with_title("Parallax")
            .with_transparent(true)
            .with_inner_size(LogicalSize::new(1280.0, 720.0));
        let window = Arc::new(event_loop.create_window(attrs)?);

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance.create_surface(window.clone())?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| anyhow!("no suitable GPU adapter"))?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("parallax_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
            },
            None,
        ))?;
        let device = Arc::new(device);
        let queue = Arc::new(queue);

        let size = window.inner_size();
        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| anyhow!("surface reports no formats"))?;
        // Prefer a compositing alpha mode so the transparent clear shows through.
        let alpha_mode = [
            wgpu::CompositeAlphaMode::PreMultiplied,
            wgpu::CompositeAlphaMode::PostMultiplied,
        ]
        .into_iter()
        .find(|mode| caps.alpha_modes.contains(mode))
        .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let backend = WgpuBackend::new(Arc::clone(&device), Arc::clone(&queue), format);
        let egui_winit = egui_winit::State::new(
            egui_ctx.clone(),
            egui::ViewportId::ROOT,
            &window,
            Some(window.scale_factor() as f32),
            None,
            None,
        );
        let egui_renderer = egui_wgpu::Renderer::new(&device, format, None, 1, false);

        tracing::info!(
            backend = adapter.get_info().backend.to_str(),
            ?format,
            ?alpha_mode,
            "GPU initialized"
        );

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            backend,
            egui_winit,
            egui_renderer,
        })
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.config.width = width.max(1);
        self.config.height = height.max(1);
        self.surface.configure(&self.device, &self.config);
    }

    fn scale_factor(&self) -> f32 {
        self.window.scale_factor() as f32
    }

    /// Window inner size in logical pixels.
    fn logical_viewport(&self) -> Vec2 {
        let size = self.window.inner_size().to_logical::<f32>(self.window.scale_factor());
        Vec2::new(size.width, size.height)
    }
}

struct ParallaxApp {
    proxy: EventLoopProxy<AppEvent>,
    loader: Arc<dyn ImageLoader + Send + Sync>,
    view: ParallaxImageView<WgpuParallaxSurface>,
    router: PointerRouter,
    gpu: Option<Gpu>,
    egui_ctx: EguiContext,
    panel: Panel,
}

impl ParallaxApp {
    fn new(proxy: EventLoopProxy<AppEvent>, config: ViewConfig) -> Result<Self> {
        let loader = loader_for(&config);
        let panel = Panel {
            draft: config.clone(),
            previews: None,
            visible: true,
        };
        Ok(Self {
            proxy,
            loader,
            view: ParallaxImageView::new(config)?,
            router: PointerRouter::new(),
            gpu: None,
            egui_ctx: EguiContext::default(),
            panel,
        })
    }

    /// Fetch textures off the event loop; the result comes back as a user event.
    fn spawn_fetch(&self, ticket: FetchTicket) {
        let loader = Arc::clone(&self.loader);
        let proxy = self.proxy.clone();
        let spawned = std::thread::Builder::new()
            .name("texture-fetch".into())
            .spawn(move || {
                let completion = ticket.fetch(loader.as_ref());
                if proxy.send_event(AppEvent::TexturesFetched(completion)).is_err() {
                    tracing::debug!("event loop closed before textures arrived");
                }
            });
        if let Err(e) = spawned {
            tracing::error!("failed to spawn texture fetch: {e}");
        }
    }

    fn remount(&mut self) {
        self.panel.previews = None;
        let ticket = self.view.mount(&mut self.router);
        self.spawn_fetch(ticket);
    }

    fn apply(&mut self, action: PanelAction) {
        match action {
            PanelAction::Reload => self.remount(),
            PanelAction::Apply(config) => match self.view.reconfigure(config, &mut self.router) {
                Ok(Some(ticket)) => {
                    self.panel.previews = None;
                    self.spawn_fetch(ticket);
                }
                Ok(None) => tracing::debug!("settings unchanged"),
                Err(e) => tracing::error!("rejected settings: {e}"),
            },
        }
    }

    fn finish_load(&mut self, completion: FetchCompletion) {
        let Some(gpu) = self.gpu.as_mut() else {
            return;
        };
        let sources = completion.result.as_ref().ok().cloned();
        let device_pixel_ratio = gpu.scale_factor();
        let outcome = self.view.complete_load(
            completion,
            Host {
                backend: &mut gpu.backend,
                router: &mut self.router,
                device_pixel_ratio,
            },
        );
        if let (LoadOutcome::Ready(_), Some((base, depth_map))) = (outcome, sources) {
            self.panel.previews = Some(Previews::new(&self.egui_ctx, &base, &depth_map));
        }
        gpu.window.request_redraw();
    }

    fn pointer_moved(&mut self, position: Vec2) {
        let Some(gpu) = &self.gpu else {
            return;
        };
        // The surface is laid out at the window origin.
        let mut event = PointerEvent::new(position, gpu.logical_viewport());
        if let Some(dimensions) = self.view.dimensions() {
            event = event.with_surface_bounds(Rect::new(Vec2::ZERO, dimensions.as_vec2()));
        }
        if self.view.dispatch(&self.router, &event).is_some() {
            gpu.window.request_redraw();
        }
    }

    fn status(&self) -> ViewStatus {
        ViewStatus {
            phase: self.view.phase(),
            error: self.view.last_error().map(str::to_owned),
            size: self.view.dimensions().map(|d| d.as_vec2()),
            scale: self
                .view
                .surface()
                .map(|s| s.displacement_scale())
                .unwrap_or(Vec2::ZERO),
        }
    }

    fn redraw(&mut self) -> Option<PanelAction> {
        let status = self.status();
        let gpu = self.gpu.as_mut()?;

        let output = match gpu.surface.get_current_texture() {
            Ok(t) => t,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                gpu.surface.configure(&gpu.device, &gpu.config);
                return None;
            }
            Err(e) => {
                tracing::error!("surface error: {e}");
                return None;
            }
        };
        let target = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let target_size = UVec2::new(gpu.config.width, gpu.config.height);

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("parallax_encoder"),
            });
        match self.view.surface() {
            Some(surface) => gpu
                .backend
                .draw(&mut encoder, &target, target_size, surface, UVec2::ZERO),
            None => clear(&mut encoder, &target),
        }

        let raw_input = gpu.egui_winit.take_egui_input(&gpu.window);
        let mut action = None;
        let full_output = self.egui_ctx.run(raw_input, |ctx| {
            action = self.panel.draw(ctx, &status);
        });
        gpu.egui_winit
            .handle_platform_output(&gpu.window, full_output.platform_output);

        let paint_jobs = self
            .egui_ctx
            .tessellate(full_output.shapes, full_output.pixels_per_point);
        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [gpu.config.width, gpu.config.height],
            pixels_per_point: full_output.pixels_per_point,
        };
        for (id, image_delta) in &full_output.textures_delta.set {
            gpu.egui_renderer
                .update_texture(&gpu.device, &gpu.queue, *id, image_delta);
        }
        gpu.egui_renderer.update_buffers(
            &gpu.device,
            &gpu.queue,
            &mut encoder,
            &paint_jobs,
            &screen_descriptor,
        );
        {
            let mut pass = encoder
                .begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("egui_pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &target,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    ..Default::default()
                })
                .forget_lifetime();
            gpu.egui_renderer
                .render(&mut pass, &paint_jobs, &screen_descriptor);
        }
        gpu.queue.submit(std::iter::once(encoder.finish()));
        for id in &full_output.textures_delta.free {
            gpu.egui_renderer.free_texture(id);
        }

        output.present();
        action
    }

    fn handle_key(&mut self, key: KeyCode) {
        match key {
            KeyCode::F1 => self.panel.visible = !self.panel.visible,
            KeyCode::KeyR => self.remount(),
            _ => {}
        }
    }
}

fn clear(encoder: &mut wgpu::CommandEncoder, target: &wgpu::TextureView) {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("clear_pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: target,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        ..Default::default()
    });
}

impl ApplicationHandler<AppEvent> for ParallaxApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.gpu.is_some() {
            return;
        }
        match Gpu::new(event_loop, &self.egui_ctx) {
            Ok(gpu) => self.gpu = Some(gpu),
            Err(e) => {
                tracing::error!("failed to initialize graphics: {e:#}");
                event_loop.exit();
                return;
            }
        }
        self.remount();
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, event: AppEvent) {
        match event {
            AppEvent::TexturesFetched(completion) => self.finish_load(completion),
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let consumed = match self.gpu.as_mut() {
            Some(gpu) => gpu.egui_winit.on_window_event(&gpu.window, &event).consumed,
            None => false,
        };

        match event {
            WindowEvent::CloseRequested => {
                self.view.teardown(&mut self.router);
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(gpu) = &mut self.gpu {
                    gpu.resize(size.width, size.height);
                }
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                tracing::info!(scale_factor, "scale factor changed, remounting");
                self.remount();
            }
            // Pointer moves reach the view even over the panel; the window
            // listener covers the whole window.
            WindowEvent::CursorMoved { position, .. } => {
                if let Some(gpu) = &self.gpu {
                    let logical = position.to_logical::<f32>(gpu.window.scale_factor());
                    self.pointer_moved(Vec2::new(logical.x, logical.y));
                }
            }
            _ if consumed => {}
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => self.handle_key(key),
            WindowEvent::RedrawRequested => {
                if let Some(action) = self.redraw() {
                    self.apply(action);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(gpu) = &self.gpu {
            gpu.window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.view.teardown(&mut self.router);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let config = cli.view_config()?;
    tracing::info!(
        image = %config.image,
        depth_map = %config.depth_map,
        "parallax-desktop starting"
    );

    let event_loop = EventLoop::<AppEvent>::with_user_event().build()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = ParallaxApp::new(event_loop.create_proxy(), config)?;
    event_loop.run_app(&mut app)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_without_depth_map_is_rejected() {
        let cli = Cli::try_parse_from(["parallax-desktop", "--image", "a.png"]).unwrap();
        let err = cli.view_config().unwrap_err();
        assert!(err.to_string().contains("--depth-map"));

        let cli = Cli::try_parse_from(["parallax-desktop", "--depth-map", "d.png"]).unwrap();
        assert!(cli.view_config().is_err());
    }

    #[test]
    fn image_pair_replaces_the_demo() {
        let cli = Cli::try_parse_from([
            "parallax-desktop",
            "--image",
            "a.png",
            "--depth-map",
            "d.png",
        ])
        .unwrap();
        let config = cli.view_config().unwrap();
        assert_eq!(config.image, ImageRef::new("a.png"));
        assert_eq!(config.depth_map, ImageRef::new("d.png"));

        let demo = Cli::try_parse_from(["parallax-desktop"]).unwrap().view_config().unwrap();
        assert_eq!(demo.image.as_str(), DEMO_IMAGE);
    }

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
