use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use glam::Vec2;
use parallax_assets::demo::{DEMO_DEPTH_MAP, DEMO_IMAGE, demo_loader};
use parallax_assets::{FsImageLoader, ImageLoader};
use parallax_common::{ImageRef, ListenerScope, PointerModel, Rect, ResolvedDimensions};
use parallax_input::{PointerEvent, PointerRouter};
use parallax_render::{SoftwareBackend, SoftwareSurface};
use parallax_view::{Host, LoadOutcome, ParallaxImageView, ViewConfig, displacement_for};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const DEMO_SIZE: (u32, u32) = (640, 480);

#[derive(Parser)]
#[command(name = "parallax-cli", about = "CLI tool for the parallax image view")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print crate info
    Info,
    /// Load the textures and print the resolved surface size
    Resolve {
        #[command(flatten)]
        view: ViewArgs,
        /// Device pixel ratio used for the physical size
        #[arg(long, default_value = "1")]
        dpr: f32,
    },
    /// Compute the displacement scale for one pointer sample
    Displace {
        /// Pointer position "X,Y" in logical pixels
        #[arg(long, value_parser = parse_vec2)]
        pointer: Vec2,
        /// Viewport size "W,H"
        #[arg(long, value_parser = parse_vec2, default_value = "1000,500")]
        viewport: Vec2,
        /// Surface size "W,H"
        #[arg(long, value_parser = parse_vec2)]
        size: Vec2,
        /// Surface origin "X,Y" within the viewport
        #[arg(long, value_parser = parse_vec2)]
        origin: Option<Vec2>,
        /// Displacement divisor (model default when omitted)
        #[arg(long)]
        intensity: Option<f32>,
        /// Pointer model: viewport or surface
        #[arg(long, default_value = "viewport")]
        model: PointerModel,
    },
    /// Render one displaced frame to a PNG on the CPU
    Render {
        #[command(flatten)]
        view: ViewArgs,
        /// Pointer position "X,Y" in logical pixels
        #[arg(long, value_parser = parse_vec2)]
        pointer: Vec2,
        /// Viewport size "W,H"
        #[arg(long, value_parser = parse_vec2, default_value = "1000,500")]
        viewport: Vec2,
        /// Surface origin "X,Y" within the viewport
        #[arg(long, value_parser = parse_vec2, default_value = "0,0")]
        origin: Vec2,
        /// Device pixel ratio
        #[arg(long, default_value = "1")]
        dpr: f32,
        /// Output PNG path
        #[arg(short, long)]
        out: PathBuf,
    },
}

/// View configuration flags. A `--config` file supplies the base values.
#[derive(Args)]
struct ViewArgs {
    /// YAML or JSON view config
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

impl ViewArgs {
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

fn loader_for(config: &ViewConfig) -> Box<dyn ImageLoader> {
    if config.image.as_str() == DEMO_IMAGE && config.depth_map.as_str() == DEMO_DEPTH_MAP {
        Box::new(demo_loader(DEMO_SIZE.0, DEMO_SIZE.1))
    } else {
        Box::new(FsImageLoader::new())
    }
}

fn parse_vec2(s: &str) -> Result<Vec2, String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected \"X,Y\", got {s:?}"))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<f32>()
            .map_err(|e| format!("invalid number {v:?}: {e}"))
    };
    Ok(Vec2::new(parse(x)?, parse(y)?))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("parallax-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("common: {}", parallax_common::crate_info());
            println!("input: {}", parallax_input::crate_info());
            println!("assets: {}", parallax_assets::crate_info());
            println!("render: {}", parallax_render::crate_info());
            println!("view: {}", parallax_view::crate_info());
        }
        Commands::Resolve { view, dpr } => {
            let config = view.view_config()?;
            let loader = loader_for(&config);
            let (base, depth_map) =
                parallax_assets::load_pair(loader.as_ref(), &config.image, &config.depth_map)?;
            let dims =
                ResolvedDimensions::resolve(config.width, config.height, base.natural_size());
            let physical = dims.physical_size(dpr);
            println!("image: {} ({}x{})", base.locator(), base.width(), base.height());
            println!(
                "depth map: {} ({}x{})",
                depth_map.locator(),
                depth_map.width(),
                depth_map.height()
            );
            println!("resolved: {}x{} logical", dims.width, dims.height);
            println!("physical: {}x{} @{dpr}", physical.x, physical.y);
            println!(
                "model: {}, scope: {}, divisor: {}",
                config.model,
                config.listener_scope(),
                config.divisor()
            );
        }
        Commands::Displace {
            pointer,
            viewport,
            size,
            origin,
            intensity,
            model,
        } => {
            if size.x <= 0.0 || size.y <= 0.0 {
                bail!("surface size must be positive, got {},{}", size.x, size.y);
            }
            let dims = ResolvedDimensions::new(size.x, size.y);
            let divisor = intensity.unwrap_or_else(|| model.default_divisor());
            if !(divisor.is_finite() && divisor > 0.0) {
                bail!("intensity must be a positive number, got {divisor}");
            }
            let mut event = PointerEvent::new(pointer, viewport);
            if let Some(origin) = origin {
                event = event.with_surface_bounds(Rect::new(origin, size));
            }
            match displacement_for(model, &event, dims, divisor) {
                Some(d) => println!("displacement: ({:.4}, {:.4})", d.x, d.y),
                None => println!(
                    "no displacement: viewport {},{} is empty",
                    viewport.x, viewport.y
                ),
            }
        }
        Commands::Render {
            view,
            pointer,
            viewport,
            origin,
            dpr,
            out,
        } => {
            let config = view.view_config()?;
            let loader = loader_for(&config);
            let mut backend = SoftwareBackend::new();
            let mut router = PointerRouter::new();
            let mut view = ParallaxImageView::<SoftwareSurface>::new(config)?;

            let outcome = view.mount_blocking(
                loader.as_ref(),
                Host {
                    backend: &mut backend,
                    router: &mut router,
                    device_pixel_ratio: dpr,
                },
            );
            let LoadOutcome::Ready(dims) = outcome else {
                bail!(
                    "view failed to mount: {}",
                    view.last_error().unwrap_or("unknown error")
                );
            };

            let event = PointerEvent::new(pointer, viewport)
                .with_surface_bounds(Rect::new(origin, dims.as_vec2()));
            match view.dispatch(&router, &event) {
                Some(scale) => println!("displacement: ({:.4}, {:.4})", scale.x, scale.y),
                None => println!("pointer sample not delivered; rendering the neutral frame"),
            }

            let frame = view
                .surface()
                .and_then(SoftwareSurface::render_frame)
                .context("surface has no frame to render")?;
            frame
                .save(&out)
                .with_context(|| format!("writing {}", out.display()))?;
            println!("wrote {} ({}x{})", out.display(), frame.width(), frame.height());

            view.teardown(&mut router);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_vec2_pairs() {
        assert_eq!(parse_vec2("1000, 250").unwrap(), Vec2::new(1000.0, 250.0));
        assert!(parse_vec2("12").is_err());
        assert!(parse_vec2("a,b").is_err());
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("view.yaml");
        std::fs::write(&path, "image: a.png\ndepth_map: b.png\nintensity: 20\n").unwrap();
        let args = ViewArgs {
            config: Some(path),
            image: None,
            depth_map: Some("c.png".into()),
            width: None,
            height: None,
            intensity: Some(5.0),
            model: None,
            scope: None,
        };
        let config = args.view_config().unwrap();
        assert_eq!(config.image, ImageRef::new("a.png"));
        assert_eq!(config.depth_map, ImageRef::new("c.png"));
        assert_eq!(config.intensity, Some(5.0));
    }

    #[test]
    fn image_without_depth_map_is_rejected() {
        let cli = Cli::try_parse_from([
            "parallax-cli",
            "render",
            "--image",
            "a.png",
            "--pointer",
            "1,1",
            "-o",
            "x.png",
        ])
        .unwrap();
        let Commands::Render { view, .. } = cli.command else {
            panic!("expected the render subcommand");
        };
        let err = view.view_config().unwrap_err();
        assert!(err.to_string().contains("--depth-map"));
    }

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
