use crate::shaders;
use bytemuck::{Pod, Zeroable};
use glam::{UVec2, Vec2};
use parallax_assets::Texture;
use parallax_common::ResolvedDimensions;
use parallax_render::{RenderBackend, RenderError, RenderSurface, Stage, SurfaceDescriptor};
use std::sync::Arc;
use wgpu::util::DeviceExt;

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
struct DisplacementUniforms {
    scale: [f32; 2],
    size: [f32; 2],
}

impl DisplacementUniforms {
    fn new(scale: Vec2, dimensions: ResolvedDimensions) -> Self {
        Self {
            scale: scale.to_array(),
            size: [dimensions.width, dimensions.height],
        }
    }
}

fn check_texture_size(texture: &Texture, max: u32) -> Result<(), RenderError> {
    if texture.width() > max || texture.height() > max {
        return Err(RenderError::TextureTooLarge {
            locator: texture.locator().clone(),
            width: texture.width(),
            height: texture.height(),
            max,
        });
    }
    Ok(())
}

/// Intersection of the surface rectangle with the render target, as
/// `(x, y, width, height)`. `None` when nothing is visible.
fn scissor_rect(origin: UVec2, size: UVec2, target: UVec2) -> Option<(u32, u32, u32, u32)> {
    if origin.x >= target.x || origin.y >= target.y {
        return None;
    }
    let end = origin.saturating_add(size).min(target);
    let extent = end - origin;
    if extent.x == 0 || extent.y == 0 {
        return None;
    }
    Some((origin.x, origin.y, extent.x, extent.y))
}

/// wgpu-based surface factory and draw routine.
pub struct WgpuBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    pipeline: wgpu::RenderPipeline,
    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    target_format: wgpu::TextureFormat,
}

impl WgpuBackend {
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        target_format: wgpu::TextureFormat,
    ) -> Self {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("displacement_uniform_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let layer_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("layer_texture_layout"),
            entries: &[
                layer_entry(0),
                layer_entry(1),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("layer_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("displacement_pipeline_layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("displacement_shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::DISPLACEMENT_SHADER.into()),
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("displacement_pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: target_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: Default::default(),
            multiview: None,
            cache: None,
        });

        Self {
            device,
            queue,
            pipeline,
            uniform_layout,
            texture_layout,
            sampler,
            target_format,
        }
    }

    pub fn target_format(&self) -> wgpu::TextureFormat {
        self.target_format
    }

    /// Record one frame of the surface into `target`.
    ///
    /// Clears the whole target (transparent when the surface asks for it),
    /// then draws the displaced base layer at `origin` in physical pixels.
    /// Destroyed surfaces only clear.
    pub fn draw(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        target_size: UVec2,
        surface: &WgpuParallaxSurface,
        origin: UVec2,
    ) {
        let clear = if surface.descriptor.transparent {
            wgpu::Color::TRANSPARENT
        } else {
            wgpu::Color::BLACK
        };
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("displacement_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(clear),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            ..Default::default()
        });

        let Some(resources) = &surface.resources else {
            return;
        };
        let size = surface.descriptor.physical_size();
        let Some((sx, sy, sw, sh)) = scissor_rect(origin, size, target_size) else {
            return;
        };

        pass.set_viewport(
            origin.x as f32,
            origin.y as f32,
            size.x as f32,
            size.y as f32,
            0.0,
            1.0,
        );
        pass.set_scissor_rect(sx, sy, sw, sh);
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &resources.uniform_bind_group, &[]);
        pass.set_bind_group(1, &resources.texture_bind_group, &[]);
        pass.draw(0..3, 0..1);
    }

    fn upload(&self, texture: &Texture, format: wgpu::TextureFormat, label: &str) -> wgpu::Texture {
        let size = wgpu::Extent3d {
            width: texture.width(),
            height: texture.height(),
            depth_or_array_layers: 1,
        };
        let gpu_texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &gpu_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            texture.pixels().as_raw(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * texture.width()),
                rows_per_image: Some(texture.height()),
            },
            size,
        );
        gpu_texture
    }
}

impl RenderBackend for WgpuBackend {
    type Surface = WgpuParallaxSurface;

    fn create_surface(
        &mut self,
        descriptor: SurfaceDescriptor,
        stage: Stage,
    ) -> Result<WgpuParallaxSurface, RenderError> {
        let max = self.device.limits().max_texture_dimension_2d;
        // The draw viewport spans the physical surface, so it shares the limit.
        let physical = descriptor.checked_physical_size(max)?;
        check_texture_size(&stage.base().texture, max)?;
        check_texture_size(&stage.depth_map().texture, max)?;

        // The base layer carries color; the depth map carries raw values and
        // must not be sRGB-decoded.
        let base = self.upload(
            &stage.base().texture,
            wgpu::TextureFormat::Rgba8UnormSrgb,
            "base_layer",
        );
        let depth_map = self.upload(
            &stage.depth_map().texture,
            wgpu::TextureFormat::Rgba8Unorm,
            "depth_layer",
        );
        let base_view = base.create_view(&wgpu::TextureViewDescriptor::default());
        let depth_view = depth_map.create_view(&wgpu::TextureViewDescriptor::default());

        let dimensions = stage.dimensions();
        let scale = stage.filter().scale;
        let uniform_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("displacement_uniforms"),
                contents: bytemuck::bytes_of(&DisplacementUniforms::new(scale, dimensions)),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });
        let uniform_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("displacement_uniform_bind_group"),
            layout: &self.uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });
        let texture_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("layer_texture_bind_group"),
            layout: &self.texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&base_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&depth_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        tracing::info!(
            width = physical.x,
            height = physical.y,
            pixel_ratio = descriptor.device_pixel_ratio,
            "gpu surface created"
        );

        Ok(WgpuParallaxSurface {
            descriptor,
            dimensions,
            scale,
            queue: Arc::clone(&self.queue),
            resources: Some(GpuResources {
                base,
                depth_map,
                uniform_buffer,
                uniform_bind_group,
                texture_bind_group,
            }),
        })
    }
}

struct GpuResources {
    base: wgpu::Texture,
    depth_map: wgpu::Texture,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    texture_bind_group: wgpu::BindGroup,
}

/// GPU resources of one mounted view: both layer textures and the filter uniforms.
pub struct WgpuParallaxSurface {
    descriptor: SurfaceDescriptor,
    dimensions: ResolvedDimensions,
    scale: Vec2,
    queue: Arc<wgpu::Queue>,
    resources: Option<GpuResources>,
}

impl RenderSurface for WgpuParallaxSurface {
    fn descriptor(&self) -> &SurfaceDescriptor {
        &self.descriptor
    }

    fn set_displacement_scale(&mut self, scale: Vec2) {
        let Some(resources) = &self.resources else {
            return;
        };
        self.scale = scale;
        self.queue.write_buffer(
            &resources.uniform_buffer,
            0,
            bytemuck::bytes_of(&DisplacementUniforms::new(scale, self.dimensions)),
        );
    }

    fn displacement_scale(&self) -> Vec2 {
        self.scale
    }

    fn destroy(&mut self) {
        let Some(resources) = self.resources.take() else {
            return;
        };
        resources.base.destroy();
        resources.depth_map.destroy();
        resources.uniform_buffer.destroy();
        tracing::info!("gpu surface destroyed");
    }

    fn is_destroyed(&self) -> bool {
        self.resources.is_none()
    }
}

impl Drop for WgpuParallaxSurface {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;
    use parallax_common::ImageRef;

    #[test]
    fn uniforms_are_sixteen_bytes() {
        assert_eq!(std::mem::size_of::<DisplacementUniforms>(), 16);
        let u = DisplacementUniforms::new(
            Vec2::new(1.0, -2.0),
            ResolvedDimensions::new(400.0, 300.0),
        );
        assert_eq!(u.scale, [1.0, -2.0]);
        assert_eq!(u.size, [400.0, 300.0]);
    }

    #[test]
    fn scissor_clips_to_target() {
        let target = UVec2::new(800, 600);
        assert_eq!(
            scissor_rect(UVec2::ZERO, UVec2::new(400, 300), target),
            Some((0, 0, 400, 300))
        );
        assert_eq!(
            scissor_rect(UVec2::new(600, 500), UVec2::new(400, 300), target),
            Some((600, 500, 200, 100))
        );
        assert_eq!(scissor_rect(UVec2::new(800, 0), UVec2::new(10, 10), target), None);
        assert_eq!(
            scissor_rect(UVec2::new(10, 10), UVec2::splat(u32::MAX), target),
            Some((10, 10, 790, 590))
        );
    }

    #[test]
    fn oversized_texture_is_rejected() {
        let tex = Texture::new(
            ImageRef::new("huge"),
            Arc::new(RgbaImage::new(64, 8)),
        )
        .unwrap();
        assert!(check_texture_size(&tex, 64).is_ok());
        let err = check_texture_size(&tex, 32).unwrap_err();
        assert!(matches!(err, RenderError::TextureTooLarge { max: 32, .. }));
    }

    #[test]
    fn surface_beyond_device_limit_is_rejected() {
        let max = wgpu::Limits::default().max_texture_dimension_2d;
        let fits = SurfaceDescriptor::new(ResolvedDimensions::new(max as f32, 1.0), 1.0);
        assert!(fits.checked_physical_size(max).is_ok());
        let hidpi = SurfaceDescriptor::new(ResolvedDimensions::new(max as f32, 1.0), 2.0);
        assert!(matches!(
            hidpi.checked_physical_size(max),
            Err(RenderError::SurfaceTooLarge { .. })
        ));
        let huge = SurfaceDescriptor::new(ResolvedDimensions::new(1e10, 1e10), 1.0);
        assert!(huge.checked_physical_size(max).is_err());
    }
}
