use crate::config::{ConfigError, ViewConfig};
use crate::displacement::displacement_for;
use glam::Vec2;
use parallax_assets::{ImageLoader, LoadError, Texture};
use parallax_common::{ImageRef, ResolvedDimensions, ViewId};
use parallax_input::{PointerEvent, PointerRouter, Subscription, SubscriptionId};
use parallax_render::{RenderBackend, RenderError, RenderSurface, Stage, SurfaceDescriptor};

/// Errors surfaced by the view.
#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    #[error("invalid view configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to load textures: {0}")]
    ResourceLoad(#[from] LoadError),
    #[error("failed to build the rendering surface: {0}")]
    Render(#[from] RenderError),
}

/// Host collaborators needed to finish a mount.
pub struct Host<'a, B> {
    pub backend: &'a mut B,
    pub router: &'a mut PointerRouter,
    pub device_pixel_ratio: f32,
}

/// A pending texture fetch for one mount generation.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchTicket {
    pub view: ViewId,
    pub generation: u64,
    pub image: ImageRef,
    pub depth_map: ImageRef,
}

impl FetchTicket {
    /// Load the base image, then the depth map. Stops at the first failure.
    pub fn fetch<L: ImageLoader + ?Sized>(&self, loader: &L) -> FetchCompletion {
        FetchCompletion {
            view: self.view,
            generation: self.generation,
            result: parallax_assets::load_pair(loader, &self.image, &self.depth_map),
        }
    }
}

/// Result of a texture fetch, handed back to the view that issued the ticket.
#[derive(Debug)]
pub struct FetchCompletion {
    pub view: ViewId,
    pub generation: u64,
    pub result: Result<(Texture, Texture), LoadError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewPhase {
    Unmounted,
    Loading,
    Ready,
    Failed,
}

/// What [`ParallaxImageView::complete_load`] did with a completion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadOutcome {
    Ready(ResolvedDimensions),
    Failed,
    /// The completion belongs to a mount that no longer exists.
    Stale,
}

struct Mounted<S> {
    surface: S,
    subscription: Subscription,
    dimensions: ResolvedDimensions,
}

enum ViewState<S> {
    Unmounted,
    Loading { generation: u64 },
    Ready(Mounted<S>),
    Failed { error: String },
}

/// The parallax image view. Generic over the backend's surface type.
pub struct ParallaxImageView<S> {
    id: ViewId,
    config: ViewConfig,
    generation: u64,
    state: ViewState<S>,
}

impl<S: RenderSurface> ParallaxImageView<S> {
    pub fn new(config: ViewConfig) -> Result<Self, ViewError> {
        config.validate()?;
        Ok(Self {
            id: ViewId::new(),
            config,
            generation: 0,
            state: ViewState::Unmounted,
        })
    }

    pub fn id(&self) -> ViewId {
        self.id
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    /// Generation of the most recent mount.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn phase(&self) -> ViewPhase {
        match self.state {
            ViewState::Unmounted => ViewPhase::Unmounted,
            ViewState::Loading { .. } => ViewPhase::Loading,
            ViewState::Ready(_) => ViewPhase::Ready,
            ViewState::Failed { .. } => ViewPhase::Failed,
        }
    }

    pub fn dimensions(&self) -> Option<ResolvedDimensions> {
        match &self.state {
            ViewState::Ready(mounted) => Some(mounted.dimensions),
            _ => None,
        }
    }

    pub fn surface(&self) -> Option<&S> {
        match &self.state {
            ViewState::Ready(mounted) => Some(&mounted.surface),
            _ => None,
        }
    }

    pub fn subscription_id(&self) -> Option<SubscriptionId> {
        match &self.state {
            ViewState::Ready(mounted) => Some(mounted.subscription.id()),
            _ => None,
        }
    }

    /// Message of the failure that ended the last mount, if it failed.
    pub fn last_error(&self) -> Option<&str> {
        match &self.state {
            ViewState::Failed { error } => Some(error),
            _ => None,
        }
    }

    /// Start a new mount. Any previous mount is torn down first.
    pub fn mount(&mut self, router: &mut PointerRouter) -> FetchTicket {
        let _span = tracing::info_span!("mount", view = %self.id).entered();
        self.teardown(router);
        self.generation += 1;
        self.state = ViewState::Loading {
            generation: self.generation,
        };
        tracing::info!(
            generation = self.generation,
            image = %self.config.image,
            depth_map = %self.config.depth_map,
            "mounting parallax view"
        );
        FetchTicket {
            view: self.id,
            generation: self.generation,
            image: self.config.image.clone(),
            depth_map: self.config.depth_map.clone(),
        }
    }

    /// Finish a mount with fetched textures.
    ///
    /// Completions for another view, an older generation, or a mount that
    /// was torn down are dropped without touching the backend.
    pub fn complete_load<B>(
        &mut self,
        completion: FetchCompletion,
        host: Host<'_, B>,
    ) -> LoadOutcome
    where
        B: RenderBackend<Surface = S>,
    {
        let _span = tracing::info_span!(
            "complete_load",
            view = %self.id,
            generation = completion.generation
        )
        .entered();

        let current = completion.view == self.id
            && matches!(
                self.state,
                ViewState::Loading { generation } if generation == completion.generation
            );
        if !current {
            tracing::debug!("discarding stale texture fetch");
            return LoadOutcome::Stale;
        }

        let (base, depth_map) = match completion.result {
            Ok(pair) => pair,
            Err(err) => return self.fail(err.into()),
        };

        let dimensions =
            ResolvedDimensions::resolve(self.config.width, self.config.height, base.natural_size());
        let descriptor = SurfaceDescriptor::new(dimensions, host.device_pixel_ratio);
        let stage = Stage::compose(base, depth_map, dimensions);
        let surface = match host.backend.create_surface(descriptor, stage) {
            Ok(surface) => surface,
            Err(err) => return self.fail(err.into()),
        };

        let subscription = host.router.subscribe(self.config.listener_scope());
        self.state = ViewState::Ready(Mounted {
            surface,
            subscription,
            dimensions,
        });
        tracing::info!(
            width = dimensions.width,
            height = dimensions.height,
            model = %self.config.model,
            divisor = self.config.divisor(),
            "parallax view ready"
        );
        LoadOutcome::Ready(dimensions)
    }

    /// Mount and load synchronously on the calling thread.
    pub fn mount_blocking<L, B>(&mut self, loader: &L, host: Host<'_, B>) -> LoadOutcome
    where
        L: ImageLoader + ?Sized,
        B: RenderBackend<Surface = S>,
    {
        let ticket = self.mount(&mut *host.router);
        let completion = ticket.fetch(loader);
        self.complete_load(completion, host)
    }

    /// The pointer-move listener: recompute the displacement and write it
    /// into the filter. Returns the written scale.
    pub fn handle_pointer_move(&mut self, event: &PointerEvent) -> Option<Vec2> {
        let ViewState::Ready(mounted) = &mut self.state else {
            return None;
        };
        let scale = displacement_for(
            self.config.model,
            event,
            mounted.dimensions,
            self.config.divisor(),
        )?;
        mounted.surface.set_displacement_scale(scale);
        tracing::trace!(x = scale.x, y = scale.y, "displacement scale updated");
        Some(scale)
    }

    /// Route an event through the host's router; only handled if this
    /// view's subscription is among the receivers.
    pub fn dispatch(&mut self, router: &PointerRouter, event: &PointerEvent) -> Option<Vec2> {
        let id = self.subscription_id()?;
        if !router.deliver(event).contains(&id) {
            return None;
        }
        self.handle_pointer_move(event)
    }

    /// Detach the listener and destroy the surface. Safe in every phase and
    /// when called repeatedly.
    pub fn teardown(&mut self, router: &mut PointerRouter) {
        match std::mem::replace(&mut self.state, ViewState::Unmounted) {
            ViewState::Ready(mut mounted) => {
                router.unsubscribe(mounted.subscription);
                mounted.surface.destroy();
                tracing::info!(
                    view = %self.id,
                    generation = self.generation,
                    "parallax view torn down"
                );
            }
            ViewState::Loading { generation } => {
                tracing::debug!(view = %self.id, generation, "abandoning pending texture fetch");
            }
            ViewState::Failed { .. } | ViewState::Unmounted => {}
        }
    }

    /// Replace the configuration. An unchanged config is a no-op; otherwise
    /// the current mount is torn down and a new one started.
    pub fn reconfigure(
        &mut self,
        config: ViewConfig,
        router: &mut PointerRouter,
    ) -> Result<Option<FetchTicket>, ViewError> {
        config.validate()?;
        if config == self.config {
            return Ok(None);
        }
        self.teardown(router);
        self.config = config;
        Ok(Some(self.mount(router)))
    }

    fn fail(&mut self, error: ViewError) -> LoadOutcome {
        tracing::error!(view = %self.id, %error, "parallax view setup failed");
        self.state = ViewState::Failed {
            error: error.to_string(),
        };
        LoadOutcome::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;
    use parallax_assets::MemoryImageLoader;
    use parallax_common::{ListenerScope, PointerModel, Rect};
    use parallax_render::{DebugTextBackend, DebugTextSurface};

    type View = ParallaxImageView<DebugTextSurface>;

    fn loader() -> MemoryImageLoader {
        let mut loader = MemoryImageLoader::new();
        loader.insert("base.png", RgbaImage::new(400, 400));
        loader.insert("depth.png", RgbaImage::new(100, 100));
        loader
    }

    fn config() -> ViewConfig {
        ViewConfig::new("base.png", "depth.png").with_intensity(20.0)
    }

    fn host<'a>(
        backend: &'a mut DebugTextBackend,
        router: &'a mut PointerRouter,
    ) -> Host<'a, DebugTextBackend> {
        Host {
            backend,
            router,
            device_pixel_ratio: 1.0,
        }
    }

    fn viewport_event(x: f32, y: f32) -> PointerEvent {
        PointerEvent::new(Vec2::new(x, y), Vec2::new(1000.0, 500.0))
    }

    #[test]
    fn mount_registers_exactly_one_listener() {
        let mut backend = DebugTextBackend::new();
        let mut router = PointerRouter::new();
        let mut view = View::new(config()).unwrap();

        let outcome = view.mount_blocking(&loader(), host(&mut backend, &mut router));

        assert_eq!(outcome, LoadOutcome::Ready(ResolvedDimensions::new(400.0, 400.0)));
        assert_eq!(view.phase(), ViewPhase::Ready);
        assert_eq!(router.len(), 1);
        assert!(router.is_attached(view.subscription_id().unwrap()));
        assert_eq!(backend.journal().borrow().surfaces_created, 1);
    }

    #[test]
    fn pointer_move_writes_filter_scale() {
        let mut backend = DebugTextBackend::new();
        let mut router = PointerRouter::new();
        let mut view = View::new(config()).unwrap();
        view.mount_blocking(&loader(), host(&mut backend, &mut router));

        let scale = view.dispatch(&router, &viewport_event(1000.0, 250.0));

        assert_eq!(scale, Some(Vec2::new(10.0, 0.0)));
        assert_eq!(view.surface().unwrap().displacement_scale(), Vec2::new(10.0, 0.0));
        assert_eq!(backend.journal().borrow().scale_writes, 1);
    }

    #[test]
    fn unmount_detaches_listener_and_destroys_once() {
        let mut backend = DebugTextBackend::new();
        let journal = backend.journal();
        let mut router = PointerRouter::new();
        let mut view = View::new(config()).unwrap();
        view.mount_blocking(&loader(), host(&mut backend, &mut router));
        view.dispatch(&router, &viewport_event(100.0, 100.0));

        view.teardown(&mut router);

        assert!(router.is_empty());
        assert_eq!(view.phase(), ViewPhase::Unmounted);
        assert_eq!(view.dispatch(&router, &viewport_event(900.0, 400.0)), None);
        assert_eq!(view.handle_pointer_move(&viewport_event(900.0, 400.0)), None);
        let journal = journal.borrow();
        assert_eq!(journal.surfaces_destroyed, 1);
        assert_eq!(journal.scale_writes, 1);
    }

    #[test]
    fn teardown_twice_is_safe() {
        let mut backend = DebugTextBackend::new();
        let mut router = PointerRouter::new();
        let mut view = View::new(config()).unwrap();
        view.mount_blocking(&loader(), host(&mut backend, &mut router));

        view.teardown(&mut router);
        view.teardown(&mut router);

        assert_eq!(backend.journal().borrow().surfaces_destroyed, 1);
    }

    #[test]
    fn load_failure_leaves_nothing_behind() {
        let mut only_base = MemoryImageLoader::new();
        only_base.insert("base.png", RgbaImage::new(10, 10));
        let mut backend = DebugTextBackend::new();
        let mut router = PointerRouter::new();
        let mut view = View::new(config()).unwrap();

        let outcome = view.mount_blocking(&only_base, host(&mut backend, &mut router));

        assert_eq!(outcome, LoadOutcome::Failed);
        assert_eq!(view.phase(), ViewPhase::Failed);
        assert!(view.last_error().unwrap().contains("depth.png"));
        assert!(router.is_empty());

        view.teardown(&mut router);
        let journal = backend.journal();
        let journal = journal.borrow();
        assert_eq!(journal.surfaces_created, 0);
        assert_eq!(journal.surfaces_destroyed, 0);
    }

    #[test]
    fn backend_refusal_is_reported_as_failure() {
        let mut backend = DebugTextBackend::refusing("no adapter");
        let mut router = PointerRouter::new();
        let mut view = View::new(config()).unwrap();

        let outcome = view.mount_blocking(&loader(), host(&mut backend, &mut router));

        assert_eq!(outcome, LoadOutcome::Failed);
        assert!(router.is_empty());
    }

    #[test]
    fn failed_view_can_be_remounted() {
        let mut backend = DebugTextBackend::new();
        let mut router = PointerRouter::new();
        let mut view = View::new(config()).unwrap();
        view.mount_blocking(&MemoryImageLoader::new(), host(&mut backend, &mut router));
        assert_eq!(view.phase(), ViewPhase::Failed);

        view.mount_blocking(&loader(), host(&mut backend, &mut router));
        assert_eq!(view.phase(), ViewPhase::Ready);
        assert_eq!(router.len(), 1);
    }

    #[test]
    fn completion_after_teardown_is_stale() {
        let mut backend = DebugTextBackend::new();
        let mut router = PointerRouter::new();
        let mut view = View::new(config()).unwrap();

        let ticket = view.mount(&mut router);
        view.teardown(&mut router);
        let outcome = view.complete_load(ticket.fetch(&loader()), host(&mut backend, &mut router));

        assert_eq!(outcome, LoadOutcome::Stale);
        assert_eq!(view.phase(), ViewPhase::Unmounted);
        assert!(router.is_empty());
        assert_eq!(backend.journal().borrow().surfaces_created, 0);
    }

    #[test]
    fn superseded_fetch_is_discarded() {
        let mut backend = DebugTextBackend::new();
        let mut router = PointerRouter::new();
        let mut view = View::new(config()).unwrap();

        let first = view.mount(&mut router);
        let second = view
            .reconfigure(config().with_intensity(5.0), &mut router)
            .unwrap()
            .unwrap();
        assert!(second.generation > first.generation);

        let stale = view.complete_load(first.fetch(&loader()), host(&mut backend, &mut router));
        assert_eq!(stale, LoadOutcome::Stale);
        assert_eq!(view.phase(), ViewPhase::Loading);

        let fresh = view.complete_load(second.fetch(&loader()), host(&mut backend, &mut router));
        assert!(matches!(fresh, LoadOutcome::Ready(_)));
        assert_eq!(router.len(), 1);
        assert_eq!(backend.journal().borrow().surfaces_created, 1);
    }

    #[test]
    fn completion_for_another_view_is_stale() {
        let mut backend = DebugTextBackend::new();
        let mut router = PointerRouter::new();
        let mut a = View::new(config()).unwrap();
        let mut b = View::new(config()).unwrap();
        let ticket_a = a.mount(&mut router);
        b.mount(&mut router);

        let outcome = b.complete_load(ticket_a.fetch(&loader()), host(&mut backend, &mut router));
        assert_eq!(outcome, LoadOutcome::Stale);
    }

    #[test]
    fn reconfigure_tears_down_before_rebuilding() {
        let mut backend = DebugTextBackend::new();
        let journal = backend.journal();
        let mut router = PointerRouter::new();
        let mut view = View::new(config()).unwrap();
        view.mount_blocking(&loader(), host(&mut backend, &mut router));

        let ticket = view
            .reconfigure(config().with_dimensions(200.0, 100.0), &mut router)
            .unwrap()
            .unwrap();
        assert!(router.is_empty());
        assert_eq!(journal.borrow().surfaces_destroyed, 1);

        view.complete_load(ticket.fetch(&loader()), host(&mut backend, &mut router));
        assert_eq!(view.dimensions(), Some(ResolvedDimensions::new(200.0, 100.0)));
        assert_eq!(router.len(), 1);
        let journal = journal.borrow();
        assert_eq!(journal.live_surfaces(), 1);
        let destroyed_at = journal.lines.iter().position(|l| l == "destroy").unwrap();
        assert!(destroyed_at < journal.lines.len() - 1);
    }

    #[test]
    fn reconfigure_with_same_config_is_noop() {
        let mut backend = DebugTextBackend::new();
        let mut router = PointerRouter::new();
        let mut view = View::new(config()).unwrap();
        view.mount_blocking(&loader(), host(&mut backend, &mut router));

        assert!(view.reconfigure(config(), &mut router).unwrap().is_none());
        assert_eq!(view.phase(), ViewPhase::Ready);
        assert_eq!(backend.journal().borrow().surfaces_destroyed, 0);
    }

    #[test]
    fn reconfigure_rejects_invalid_config() {
        let mut router = PointerRouter::new();
        let mut view = View::new(config()).unwrap();
        let err = view.reconfigure(config().with_intensity(-1.0), &mut router);
        assert!(matches!(err, Err(ViewError::Config(_))));
        assert!(View::new(config().with_dimensions(0.0, 1.0)).is_err());
    }

    #[test]
    fn larger_intensity_means_smaller_displacement() {
        let event = viewport_event(800.0, 100.0);
        let mut scales = Vec::new();
        for intensity in [10.0, 20.0] {
            let mut backend = DebugTextBackend::new();
            let mut router = PointerRouter::new();
            let mut view = View::new(config().with_intensity(intensity)).unwrap();
            view.mount_blocking(&loader(), host(&mut backend, &mut router));
            scales.push(view.dispatch(&router, &event).unwrap());
        }
        assert!((scales[0] - scales[1] * 2.0).length() < 1e-4);
    }

    #[test]
    fn surface_scope_only_reacts_over_the_surface() {
        let mut backend = DebugTextBackend::new();
        let mut router = PointerRouter::new();
        let config = ViewConfig::new("base.png", "depth.png")
            .with_dimensions(200.0, 200.0)
            .with_model(PointerModel::SurfaceLocal);
        let mut view = View::new(config).unwrap();
        view.mount_blocking(&loader(), host(&mut backend, &mut router));
        let bounds = Rect::new(Vec2::new(100.0, 100.0), Vec2::new(200.0, 200.0));
        let viewport = Vec2::new(1000.0, 800.0);

        let outside =
            PointerEvent::new(Vec2::new(600.0, 600.0), viewport).with_surface_bounds(bounds);
        assert_eq!(view.dispatch(&router, &outside), None);

        let inside =
            PointerEvent::new(Vec2::new(150.0, 150.0), viewport).with_surface_bounds(bounds);
        assert_eq!(view.dispatch(&router, &inside), Some(Vec2::new(2.5, 2.5)));
    }

    #[test]
    fn window_scope_can_drive_the_surface_model() {
        let mut backend = DebugTextBackend::new();
        let mut router = PointerRouter::new();
        let config = ViewConfig::new("base.png", "depth.png")
            .with_model(PointerModel::SurfaceLocal)
            .with_scope(ListenerScope::Window);
        let mut view = View::new(config).unwrap();
        view.mount_blocking(&loader(), host(&mut backend, &mut router));

        let far_away = PointerEvent::new(Vec2::new(600.0, 600.0), Vec2::new(1000.0, 800.0));
        // (200 - 600) / 20 with no surface bounds laid out.
        assert_eq!(view.dispatch(&router, &far_away), Some(Vec2::new(-20.0, -20.0)));
    }

    #[test]
    fn device_pixel_ratio_reaches_the_surface() {
        let mut backend = DebugTextBackend::new();
        let mut router = PointerRouter::new();
        let mut view = View::new(config()).unwrap();
        view.mount_blocking(
            &loader(),
            Host {
                backend: &mut backend,
                router: &mut router,
                device_pixel_ratio: 2.0,
            },
        );
        let descriptor = view.surface().unwrap().descriptor();
        assert_eq!(descriptor.device_pixel_ratio, 2.0);
        assert!(descriptor.transparent);
        assert!(backend.journal().borrow().lines[0].starts_with("create 800x800 @2"));
    }

    #[test]
    fn oversized_surface_fails_without_a_listener() {
        use parallax_render::{SoftwareBackend, SoftwareSurface};

        let mut backend = SoftwareBackend::new();
        let mut router = PointerRouter::new();
        let config = config().with_dimensions(1e10, 1e10);
        let mut view = ParallaxImageView::<SoftwareSurface>::new(config).unwrap();

        let outcome = view.mount_blocking(
            &loader(),
            Host {
                backend: &mut backend,
                router: &mut router,
                device_pixel_ratio: 1.0,
            },
        );

        assert_eq!(outcome, LoadOutcome::Failed);
        assert_eq!(view.phase(), ViewPhase::Failed);
        assert!(router.is_empty());
        assert!(view.surface().is_none());
        assert!(view.last_error().unwrap().contains("exceeds the limit of 8192"));
    }
}
