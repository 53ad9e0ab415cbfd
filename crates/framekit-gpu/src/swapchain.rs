//! Swapchain management.
//!
//! A [`SwapchainGeneration`] bundles one swapchain with everything sized to
//! it: image views, a depth attachment, the render pass and one framebuffer
//! per image. Generations are never mutated in place; the
//! [`SwapchainManager`] builds a replacement from the current one and then
//! retires the old bundle.

use std::fmt;
use std::sync::Arc;

use ash::vk;

use crate::device::GraphicsDevice;
use crate::error::{GpuError, Result};
use crate::sync::FrameSync;

/// Depth formats in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Swapchain creation options.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapchainConfig {
    /// Present with FIFO instead of preferring MAILBOX / IMMEDIATE.
    pub vsync: bool,
}

impl Default for SwapchainConfig {
    fn default() -> Self {
        Self { vsync: true }
    }
}

/// Monotonic identifier of a swapchain generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GenerationId(pub u64);

impl GenerationId {
    /// The id following this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen{}", self.0)
    }
}

/// Result of trying to acquire a presentable image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image was acquired. `suboptimal` asks for a recreation after this frame.
    Ready { image_index: u32, suboptimal: bool },
    /// The swapchain is out of date; nothing was acquired.
    Retry,
}

/// Result of submitting and presenting a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    /// The image was queued for presentation on an optimal swapchain.
    Presented,
    /// The swapchain is out of date or suboptimal and must be recreated.
    Retry,
}

/// One immutable swapchain bundle.
#[derive(Debug)]
pub struct SwapchainGeneration {
    id: GenerationId,
    swapchain: vk::SwapchainKHR,
    requested_extent: vk::Extent2D,
    extent: vk::Extent2D,
    surface_format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    depth_format: vk::Format,
    render_pass: vk::RenderPass,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    framebuffers: Vec<vk::Framebuffer>,
    depth_image: vk::Image,
    depth_view: vk::ImageView,
    /// Slot fence currently owning each image, or null.
    images_in_flight: Vec<vk::Fence>,
}

impl SwapchainGeneration {
    /// Build a generation sized to `requested_extent`.
    ///
    /// When `previous` is given its swapchain is passed as the old swapchain,
    /// and the color and depth formats must match it. A mismatch fails before
    /// any handle is created. On any later failure every handle created so far
    /// is destroyed.
    pub fn create<D: GraphicsDevice + ?Sized>(
        device: &D,
        id: GenerationId,
        requested_extent: vk::Extent2D,
        config: SwapchainConfig,
        previous: Option<&Self>,
    ) -> Result<Self> {
        let caps = device.surface_capabilities()?;
        let surface_format = caps.recommended_format().ok_or_else(|| {
            GpuError::SwapchainCreation("surface reports no formats".to_string())
        })?;
        let depth_format = find_depth_format(device)?;

        if let Some(previous) = previous {
            if previous.surface_format.format != surface_format.format
                || previous.depth_format != depth_format
            {
                return Err(GpuError::FormatMismatch {
                    previous_color: previous.surface_format.format,
                    color: surface_format.format,
                    previous_depth: previous.depth_format,
                    depth: depth_format,
                });
            }
        }

        let present_mode = caps.recommended_present_mode(config.vsync);
        let extent = calculate_extent(
            &caps.capabilities,
            requested_extent.width,
            requested_extent.height,
        );

        let mut generation = Self {
            id,
            swapchain: vk::SwapchainKHR::null(),
            requested_extent,
            extent,
            surface_format,
            present_mode,
            depth_format,
            render_pass: vk::RenderPass::null(),
            images: Vec::new(),
            image_views: Vec::new(),
            framebuffers: Vec::new(),
            depth_image: vk::Image::null(),
            depth_view: vk::ImageView::null(),
            images_in_flight: Vec::new(),
        };

        let old_swapchain = previous.map_or_else(vk::SwapchainKHR::null, |p| p.swapchain);
        if let Err(e) = generation.build(device, &caps.capabilities, old_swapchain) {
            // SAFETY: nothing built here has been used yet.
            unsafe { generation.destroy(device) };
            return Err(e);
        }

        tracing::info!(
            generation = %id,
            width = extent.width,
            height = extent.height,
            images = generation.images.len(),
            format = ?surface_format.format,
            depth = ?depth_format,
            present_mode = ?present_mode,
            "Created swapchain"
        );

        Ok(generation)
    }

    fn build<D: GraphicsDevice + ?Sized>(
        &mut self,
        device: &D,
        capabilities: &vk::SurfaceCapabilitiesKHR,
        old_swapchain: vk::SwapchainKHR,
    ) -> Result<()> {
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(device.surface())
            .min_image_count(image_count(capabilities))
            .image_format(self.surface_format.format)
            .image_color_space(self.surface_format.color_space)
            .image_extent(self.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(self.present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        self.swapchain = device.create_swapchain(&create_info)?;
        self.images = device.swapchain_images(self.swapchain)?;
        self.images_in_flight = vec![vk::Fence::null(); self.images.len()];

        for &image in &self.images {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(self.surface_format.format)
                .components(vk::ComponentMapping::default())
                .subresource_range(subresource_range(vk::ImageAspectFlags::COLOR));
            self.image_views.push(device.create_image_view(&view_info)?);
        }

        self.create_depth_attachment(device)?;
        self.render_pass = create_render_pass(device, self.surface_format.format, self.depth_format)?;

        for &view in &self.image_views {
            let attachments = [view, self.depth_view];
            let framebuffer_info = vk::FramebufferCreateInfo::default()
                .render_pass(self.render_pass)
                .attachments(&attachments)
                .width(self.extent.width)
                .height(self.extent.height)
                .layers(1);
            self.framebuffers
                .push(device.create_framebuffer(&framebuffer_info)?);
        }

        Ok(())
    }

    fn create_depth_attachment<D: GraphicsDevice + ?Sized>(&mut self, device: &D) -> Result<()> {
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(self.depth_format)
            .extent(vk::Extent3D {
                width: self.extent.width,
                height: self.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        self.depth_image = device.create_image(&image_info, "swapchain depth")?;

        let view_info = vk::ImageViewCreateInfo::default()
            .image(self.depth_image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(self.depth_format)
            .subresource_range(subresource_range(depth_aspect(self.depth_format)));
        self.depth_view = device.create_image_view(&view_info)?;

        Ok(())
    }

    /// Destroy every handle in the bundle, skipping ones never created.
    ///
    /// # Safety
    /// The device must be idle with respect to this generation.
    pub unsafe fn destroy<D: GraphicsDevice + ?Sized>(&mut self, device: &D) {
        // SAFETY: forwarded to the caller.
        unsafe {
            for framebuffer in self.framebuffers.drain(..) {
                device.destroy_framebuffer(framebuffer);
            }
            if self.render_pass != vk::RenderPass::null() {
                device.destroy_render_pass(self.render_pass);
                self.render_pass = vk::RenderPass::null();
            }
            if self.depth_view != vk::ImageView::null() {
                device.destroy_image_view(self.depth_view);
                self.depth_view = vk::ImageView::null();
            }
            if self.depth_image != vk::Image::null() {
                device.destroy_image(self.depth_image);
                self.depth_image = vk::Image::null();
            }
            for view in self.image_views.drain(..) {
                device.destroy_image_view(view);
            }
            if self.swapchain != vk::SwapchainKHR::null() {
                device.destroy_swapchain(self.swapchain);
                self.swapchain = vk::SwapchainKHR::null();
            }
        }
        self.images.clear();
        self.images_in_flight.clear();
    }

    pub const fn id(&self) -> GenerationId {
        self.id
    }

    pub const fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub const fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub const fn requested_extent(&self) -> vk::Extent2D {
        self.requested_extent
    }

    pub const fn surface_format(&self) -> vk::SurfaceFormatKHR {
        self.surface_format
    }

    pub const fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    pub const fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    pub const fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    pub fn framebuffer(&self, image_index: u32) -> Option<vk::Framebuffer> {
        self.framebuffers.get(image_index as usize).copied()
    }
}

/// Owner of the current swapchain generation.
pub struct SwapchainManager<D: GraphicsDevice> {
    device: Arc<D>,
    config: SwapchainConfig,
    current: SwapchainGeneration,
}

impl<D: GraphicsDevice> SwapchainManager<D> {
    /// Create the first generation.
    pub fn new(device: Arc<D>, extent: vk::Extent2D, config: SwapchainConfig) -> Result<Self> {
        let current = SwapchainGeneration::create(&*device, GenerationId(0), extent, config, None)?;
        Ok(Self {
            device,
            config,
            current,
        })
    }

    /// Replace the current generation with one sized to `extent`.
    ///
    /// The current generation is handed in as the previous one and retired
    /// once the replacement exists. On failure the current generation is kept.
    ///
    /// # Safety
    /// The device must be idle.
    pub unsafe fn recreate(&mut self, extent: vk::Extent2D) -> Result<()> {
        let next = SwapchainGeneration::create(
            &*self.device,
            self.current.id.next(),
            extent,
            self.config,
            Some(&self.current),
        )?;

        let mut retired = std::mem::replace(&mut self.current, next);
        tracing::debug!(generation = %retired.id, "Retiring swapchain");
        // SAFETY: the device is idle per the caller's contract.
        unsafe { retired.destroy(&*self.device) };
        Ok(())
    }

    /// Acquire the next image for the slot described by `sync`.
    ///
    /// Waits for the slot's previous submission, then for any other slot
    /// still holding the acquired image. The slot fence is reset only after
    /// a successful acquire, so a [`AcquireOutcome::Retry`] leaves it signaled.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn acquire_next_image(&mut self, sync: &FrameSync) -> Result<AcquireOutcome> {
        sync.wait(&*self.device)?;

        let result =
            self.device
                .acquire_next_image(self.current.swapchain, u64::MAX, sync.image_available);

        match result {
            Ok((image_index, suboptimal)) => {
                let owner = self
                    .current
                    .images_in_flight
                    .get_mut(image_index as usize)
                    .ok_or_else(|| {
                        GpuError::InvalidState(format!(
                            "acquired image {image_index} outside the swapchain"
                        ))
                    })?;
                if *owner != vk::Fence::null() && *owner != sync.in_flight {
                    self.device.wait_for_fence(*owner, u64::MAX)?;
                }
                *owner = sync.in_flight;

                sync.reset(&*self.device)?;

                if suboptimal {
                    tracing::warn!(image_index, "Acquired image from a suboptimal swapchain");
                }
                Ok(AcquireOutcome::Ready {
                    image_index,
                    suboptimal,
                })
            }
            // No image was acquired and the semaphore stays unsignaled.
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::Retry),
            Err(e) => Err(GpuError::from(e)),
        }
    }

    /// Submit recorded work for `image_index` and present it.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn submit(
        &mut self,
        command_buffers: &[vk::CommandBuffer],
        image_index: u32,
        sync: &FrameSync,
    ) -> Result<PresentOutcome> {
        self.device.queue_submit(
            command_buffers,
            &[sync.image_available],
            &[vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT],
            &[sync.render_finished],
            sync.in_flight,
        )?;

        match self
            .device
            .queue_present(self.current.swapchain, image_index, &[sync.render_finished])
        {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::Retry),
            Err(e) => Err(GpuError::from(e)),
        }
    }

    pub fn image_count(&self) -> usize {
        self.current.image_count()
    }

    pub const fn extent(&self) -> vk::Extent2D {
        self.current.extent
    }

    /// Extent the current generation was requested with, before clamping.
    pub const fn requested_extent(&self) -> vk::Extent2D {
        self.current.requested_extent
    }

    pub const fn render_pass(&self) -> vk::RenderPass {
        self.current.render_pass
    }

    pub fn framebuffer(&self, image_index: u32) -> Option<vk::Framebuffer> {
        self.current.framebuffer(image_index)
    }

    pub const fn surface_format(&self) -> vk::SurfaceFormatKHR {
        self.current.surface_format
    }

    pub const fn depth_format(&self) -> vk::Format {
        self.current.depth_format
    }

    pub const fn present_mode(&self) -> vk::PresentModeKHR {
        self.current.present_mode
    }

    pub const fn generation(&self) -> GenerationId {
        self.current.id
    }

    pub const fn config(&self) -> SwapchainConfig {
        self.config
    }

    /// Width over height of the current extent.
    #[allow(clippy::cast_precision_loss)]
    pub fn aspect_ratio(&self) -> f32 {
        self.current.extent.width as f32 / self.current.extent.height as f32
    }
}

impl<D: GraphicsDevice> Drop for SwapchainManager<D> {
    fn drop(&mut self) {
        // SAFETY: owners wait for the device to go idle before dropping the manager.
        unsafe { self.current.destroy(&*self.device) };
    }
}

/// Select the best surface format.
///
/// Prefers `B8G8R8A8_SRGB` with `SRGB_NONLINEAR`, else the first reported.
pub fn select_surface_format(available: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    available
        .iter()
        .find(|format| {
            format.format == vk::Format::B8G8R8A8_SRGB
                && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| available.first())
        .copied()
}

/// Select the best present mode.
pub fn select_present_mode(available: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if vsync {
        return vk::PresentModeKHR::FIFO;
    }
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|mode| available.contains(mode))
        // FIFO is always supported
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Calculate swapchain extent.
pub fn calculate_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired_width: u32,
    desired_height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width == u32::MAX {
        vk::Extent2D {
            width: desired_width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: desired_height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    } else {
        capabilities.current_extent
    }
}

/// One more than the minimum, capped by the maximum when there is one.
pub const fn image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 && count > capabilities.max_image_count {
        capabilities.max_image_count
    } else {
        count
    }
}

/// First candidate depth format usable as an optimal-tiling attachment.
pub fn find_depth_format<D: GraphicsDevice + ?Sized>(device: &D) -> Result<vk::Format> {
    DEPTH_FORMAT_CANDIDATES
        .into_iter()
        .find(|&format| {
            device
                .format_properties(format)
                .optimal_tiling_features
                .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        })
        .ok_or(GpuError::NoSupportedDepthFormat)
}

/// Aspect mask for a depth attachment view.
pub fn depth_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    if matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D16_UNORM_S8_UINT
    ) {
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    } else {
        vk::ImageAspectFlags::DEPTH
    }
}

fn subresource_range(aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(aspect)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
}

fn create_render_pass<D: GraphicsDevice + ?Sized>(
    device: &D,
    color_format: vk::Format,
    depth_format: vk::Format,
) -> Result<vk::RenderPass> {
    let attachments = [
        vk::AttachmentDescription::default()
            .format(color_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR),
        vk::AttachmentDescription::default()
            .format(depth_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
    ];

    let color_refs = [vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    }];
    let depth_ref = vk::AttachmentReference {
        attachment: 1,
        layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    };
    let subpasses = [vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs)
        .depth_stencil_attachment(&depth_ref)];

    let stages =
        vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
    let dependencies = [vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(stages)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(stages)
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        )];

    let create_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    device.create_render_pass(&create_info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{HandleKind, MockDevice, MockOp};

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 800,
        height: 600,
    };

    fn manager(device: &Arc<MockDevice>) -> SwapchainManager<MockDevice> {
        SwapchainManager::new(device.clone(), EXTENT, SwapchainConfig::default()).unwrap()
    }

    fn caps(min: u32, max: u32, current: vk::Extent2D) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: current,
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 1024,
                height: 1024,
            },
            ..Default::default()
        }
    }

    #[test]
    fn surface_format_prefers_srgb() {
        let unorm = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let srgb = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };

        assert_eq!(select_surface_format(&[unorm, srgb]), Some(srgb));
        assert_eq!(select_surface_format(&[unorm]), Some(unorm));
        assert_eq!(select_surface_format(&[]), None);
    }

    #[test]
    fn present_mode_selection() {
        let all = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
        ];
        assert_eq!(select_present_mode(&all, true), vk::PresentModeKHR::FIFO);
        assert_eq!(select_present_mode(&all, false), vk::PresentModeKHR::MAILBOX);
        assert_eq!(
            select_present_mode(&all[..2], false),
            vk::PresentModeKHR::IMMEDIATE
        );
        assert_eq!(
            select_present_mode(&[vk::PresentModeKHR::FIFO], false),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn extent_uses_surface_extent_when_defined() {
        let fixed = caps(2, 0, EXTENT);
        assert_eq!(calculate_extent(&fixed, 100, 100), EXTENT);

        let free = caps(
            2,
            0,
            vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
        );
        assert_eq!(
            calculate_extent(&free, 4000, 0),
            vk::Extent2D {
                width: 1024,
                height: 1
            }
        );
    }

    #[test]
    fn image_count_is_min_plus_one_capped() {
        assert_eq!(image_count(&caps(2, 0, EXTENT)), 3);
        assert_eq!(image_count(&caps(2, 8, EXTENT)), 3);
        assert_eq!(image_count(&caps(3, 3, EXTENT)), 3);
    }

    #[test]
    fn depth_aspect_includes_stencil_when_present() {
        assert_eq!(
            depth_aspect(vk::Format::D32_SFLOAT),
            vk::ImageAspectFlags::DEPTH
        );
        assert!(depth_aspect(vk::Format::D24_UNORM_S8_UINT).contains(vk::ImageAspectFlags::STENCIL));
    }

    #[test]
    fn depth_format_falls_back_in_order() {
        let device = MockDevice::new();
        assert_eq!(find_depth_format(&device).unwrap(), vk::Format::D32_SFLOAT);

        device.set_depth_formats(&[vk::Format::D24_UNORM_S8_UINT]);
        assert_eq!(
            find_depth_format(&device).unwrap(),
            vk::Format::D24_UNORM_S8_UINT
        );

        device.set_depth_formats(&[]);
        assert!(matches!(
            find_depth_format(&device),
            Err(GpuError::NoSupportedDepthFormat)
        ));
    }

    #[test]
    fn first_generation_builds_every_attachment() {
        let device = Arc::new(MockDevice::new());
        let swapchain = manager(&device);

        assert_eq!(swapchain.generation(), GenerationId(0));
        assert_eq!(swapchain.image_count(), 3);
        assert_eq!(swapchain.extent(), EXTENT);
        assert_eq!(swapchain.requested_extent(), EXTENT);
        assert_eq!(swapchain.surface_format().format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(swapchain.depth_format(), vk::Format::D32_SFLOAT);
        assert_eq!(swapchain.present_mode(), vk::PresentModeKHR::FIFO);
        assert!(swapchain.framebuffer(2).is_some());
        assert!(swapchain.framebuffer(3).is_none());
        approx::assert_relative_eq!(swapchain.aspect_ratio(), 800.0 / 600.0);

        assert_eq!(device.live_count(HandleKind::Swapchain), 1);
        assert_eq!(device.live_count(HandleKind::Framebuffer), 3);
        // Three color views plus the depth view.
        assert_eq!(device.live_count(HandleKind::ImageView), 4);
        assert_eq!(device.live_count(HandleKind::Image), 1);
        assert_eq!(device.live_count(HandleKind::RenderPass), 1);

        drop(swapchain);
        assert_eq!(device.total_live(), 0);
    }

    #[test]
    fn fixed_surface_extent_and_present_mode_preference() {
        let device = Arc::new(MockDevice::new());
        let fixed = vk::Extent2D {
            width: 1024,
            height: 768,
        };
        device.set_current_extent(Some(fixed));
        device.set_present_modes(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE]);

        let swapchain =
            SwapchainManager::new(device.clone(), EXTENT, SwapchainConfig { vsync: false })
                .unwrap();

        assert_eq!(swapchain.extent(), fixed);
        assert_eq!(swapchain.requested_extent(), EXTENT);
        assert_eq!(swapchain.present_mode(), vk::PresentModeKHR::IMMEDIATE);
        let record = device.last_swapchain().unwrap();
        assert_eq!(record.extent, fixed);
        assert_eq!(record.present_mode, vk::PresentModeKHR::IMMEDIATE);
    }

    #[test]
    fn recreate_hands_over_old_swapchain_and_retires_it() {
        let device = Arc::new(MockDevice::new());
        let mut swapchain = manager(&device);
        let old = swapchain.current.handle();

        let resized = vk::Extent2D {
            width: 400,
            height: 300,
        };
        unsafe { swapchain.recreate(resized).unwrap() };

        assert_eq!(swapchain.generation(), GenerationId(1));
        assert_eq!(swapchain.extent(), resized);
        assert_eq!(device.last_swapchain().unwrap().old_swapchain, old);
        assert_eq!(device.live_count(HandleKind::Swapchain), 1);
        assert_eq!(device.live_count(HandleKind::Framebuffer), 3);
        assert_eq!(device.live_count(HandleKind::Image), 1);
    }

    #[test]
    fn color_format_change_fails_before_creating_handles() {
        let device = Arc::new(MockDevice::new());
        let mut swapchain = manager(&device);
        let created = device.counters().swapchains_created;

        device.set_surface_format(vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        });
        let err = unsafe { swapchain.recreate(EXTENT) }.unwrap_err();

        assert!(matches!(
            err,
            GpuError::FormatMismatch {
                previous_color: vk::Format::B8G8R8A8_SRGB,
                color: vk::Format::R8G8B8A8_UNORM,
                ..
            }
        ));
        assert_eq!(device.counters().swapchains_created, created);
        // The current generation is untouched.
        assert_eq!(swapchain.generation(), GenerationId(0));
        assert_eq!(device.live_count(HandleKind::Swapchain), 1);
    }

    #[test]
    fn depth_format_change_fails() {
        let device = Arc::new(MockDevice::new());
        let mut swapchain = manager(&device);

        device.set_depth_formats(&[vk::Format::D24_UNORM_S8_UINT]);
        let err = unsafe { swapchain.recreate(EXTENT) }.unwrap_err();

        assert!(matches!(
            err,
            GpuError::FormatMismatch {
                previous_depth: vk::Format::D32_SFLOAT,
                depth: vk::Format::D24_UNORM_S8_UINT,
                ..
            }
        ));
    }

    #[test]
    fn partial_construction_is_released() {
        let device = Arc::new(MockDevice::new());
        device.fail_after(MockOp::CreateFramebuffer, 1);

        let result = SwapchainManager::new(device.clone(), EXTENT, SwapchainConfig::default());

        assert!(result.is_err());
        assert_eq!(device.total_live(), 0);
    }

    #[test]
    fn out_of_date_acquire_leaves_fence_signaled() {
        let device = Arc::new(MockDevice::new());
        let mut swapchain = manager(&device);
        let sync = FrameSync::new(&*device).unwrap();

        device.push_acquire_result(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));
        let outcome = swapchain.acquire_next_image(&sync).unwrap();

        assert_eq!(outcome, AcquireOutcome::Retry);
        assert!(device.fence_signaled(sync.in_flight));
        unsafe { sync.destroy(&*device) };
    }

    #[test]
    fn acquire_resets_slot_fence_and_reports_suboptimal() {
        let device = Arc::new(MockDevice::new());
        let mut swapchain = manager(&device);
        let sync = FrameSync::new(&*device).unwrap();

        device.push_acquire_result(Ok((1, true)));
        let outcome = swapchain.acquire_next_image(&sync).unwrap();

        assert_eq!(
            outcome,
            AcquireOutcome::Ready {
                image_index: 1,
                suboptimal: true
            }
        );
        assert!(!device.fence_signaled(sync.in_flight));
        assert_eq!(swapchain.current.images_in_flight[1], sync.in_flight);
    }

    #[test]
    fn acquire_errors_are_fatal() {
        let device = Arc::new(MockDevice::new());
        let mut swapchain = manager(&device);
        let sync = FrameSync::new(&*device).unwrap();

        device.push_acquire_result(Err(vk::Result::ERROR_DEVICE_LOST));
        assert!(matches!(
            swapchain.acquire_next_image(&sync),
            Err(GpuError::Vulkan(vk::Result::ERROR_DEVICE_LOST))
        ));
    }

    #[test]
    fn present_results_map_to_outcomes() {
        let device = Arc::new(MockDevice::new());
        let mut swapchain = manager(&device);
        let sync = FrameSync::new(&*device).unwrap();
        let cmd = device.allocate_command_buffers(1).unwrap()[0];

        let mut frame = |present: ash::prelude::VkResult<bool>| {
            device.push_present_result(present);
            let AcquireOutcome::Ready { image_index, .. } =
                swapchain.acquire_next_image(&sync).unwrap()
            else {
                panic!("acquire should succeed");
            };
            device.begin_command_buffer(cmd).unwrap();
            device.end_command_buffer(cmd).unwrap();
            swapchain.submit(&[cmd], image_index, &sync)
        };

        assert_eq!(frame(Ok(false)).unwrap(), PresentOutcome::Presented);
        assert_eq!(frame(Ok(true)).unwrap(), PresentOutcome::Retry);
        assert_eq!(
            frame(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            PresentOutcome::Retry
        );
        assert!(matches!(
            frame(Err(vk::Result::ERROR_SURFACE_LOST_KHR)),
            Err(GpuError::Vulkan(vk::Result::ERROR_SURFACE_LOST_KHR))
        ));
    }

    #[test]
    fn image_held_by_other_slot_is_waited_on() {
        let device = Arc::new(MockDevice::new());
        let mut swapchain = manager(&device);
        let first = FrameSync::new(&*device).unwrap();
        let second = FrameSync::new(&*device).unwrap();
        let cmd = device.allocate_command_buffers(1).unwrap()[0];

        device.push_acquire_result(Ok((0, false)));
        swapchain.acquire_next_image(&first).unwrap();
        device.begin_command_buffer(cmd).unwrap();
        device.end_command_buffer(cmd).unwrap();
        swapchain.submit(&[cmd], 0, &first).unwrap();

        let waits = device.counters().fence_waits;
        device.push_acquire_result(Ok((0, false)));
        swapchain.acquire_next_image(&second).unwrap();

        // Own slot fence plus the fence of the slot that last used image 0.
        assert_eq!(device.counters().fence_waits, waits + 2);
        assert_eq!(swapchain.current.images_in_flight[0], second.in_flight);
    }
}
