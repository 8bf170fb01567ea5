//! Frame-scoped image allocation with staleness eviction
//!
//! Scripts name images with logical ids that are only meaningful within one frame.
//! The cache maps each frame's logical ids onto physical GPU images that persist
//! across frames as long as an equivalent request keeps arriving.

use crate::device::{DeviceError, Extent, GraphicsDevice, PixelFormat};
use std::collections::HashMap;

/// Logical id of the swapchain-sized color target copied to the surface at present time
pub const SWAPCHAIN_IMAGE_ID: u32 = 0;

/// Number of consecutive unused frames after which an allocation is released
pub const DEFAULT_STALENESS_THRESHOLD: u32 = 2;

/// A request for an image for the current frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageRequest {
    /// Logical id, valid for the current frame only
    pub id: u32,
    pub format: PixelFormat,
    pub size: Extent,
}

/// Identity of a physical allocation
///
/// `ordinal` counts the earlier requests with the same format and size in the
/// current frame, so that several same-shaped images requested in one frame get
/// distinct allocations while the same request sequence on the next frame lands
/// on the same allocations again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageKey {
    pub format: PixelFormat,
    pub size: Extent,
    pub ordinal: u32,
}

/// A physical GPU image owned by the cache
#[derive(Debug)]
pub struct AllocatedImage<I> {
    pub key: ImageKey,
    /// Monotonic identity of this allocation
    pub physical_id: u64,
    pub size: Extent,
    pub frames_since_last_use: u32,
    pub image: I,
}

/// Owner of all script-requested GPU images
pub struct ImageCache<D: GraphicsDevice> {
    allocations: HashMap<ImageKey, AllocatedImage<D::Image>>,
    /// Logical id to allocation key, rebuilt every frame
    frame_index: HashMap<u32, ImageKey>,
    /// Requests seen this frame per (format, size)
    frame_ordinals: HashMap<(PixelFormat, Extent), u32>,
    next_physical_id: u64,
    staleness_threshold: u32,
}

impl<D: GraphicsDevice> Default for ImageCache<D> {
    fn default() -> Self {
        Self::new(DEFAULT_STALENESS_THRESHOLD)
    }
}

impl<D: GraphicsDevice> ImageCache<D> {
    /// Creates an empty cache
    ///
    /// # Arguments
    /// * `staleness_threshold` - Unused frames after which an allocation is released
    pub fn new(staleness_threshold: u32) -> Self {
        Self {
            allocations: HashMap::new(),
            frame_index: HashMap::new(),
            frame_ordinals: HashMap::new(),
            next_physical_id: 0,
            staleness_threshold,
        }
    }

    /// Starts a new frame
    ///
    /// Ages every allocation by one frame, releases those that reached the staleness
    /// threshold and forgets the previous frame's logical ids.
    pub fn begin_frame(&mut self, device: &mut D) {
        let threshold = self.staleness_threshold;
        let stale_keys = self
            .allocations
            .values_mut()
            .filter_map(|allocation| {
                allocation.frames_since_last_use += 1;
                (allocation.frames_since_last_use >= threshold).then_some(allocation.key)
            })
            .collect::<Vec<_>>();

        for key in stale_keys {
            if let Some(allocation) = self.allocations.remove(&key) {
                tracing::debug!(physical_id = allocation.physical_id, format = %key.format, size = %key.size, "releasing stale image");
                device.delete_image(allocation.image);
            }
        }

        self.frame_index.clear();
        self.frame_ordinals.clear();
    }

    /// Resolves a request to a physical image, allocating one if needed
    ///
    /// Requesting the same logical id twice in one frame with the same format and
    /// size returns the allocation it already maps to.
    ///
    /// # Arguments
    /// * `device` - Device used for new allocations
    /// * `request` - The image request
    ///
    /// # Returns
    /// The allocation now registered under `request.id`
    pub fn resolve(&mut self, device: &mut D, request: &ImageRequest) -> Result<&AllocatedImage<D::Image>, DeviceError> {
        let mapped = self.frame_index.get(&request.id).copied();
        if let Some(key) = mapped.filter(|key| key.format == request.format && key.size == request.size) {
            return self.allocations.get(&key).ok_or_else(|| DeviceError::Backend(format!("image {} lost its allocation", request.id)));
        }

        let ordinal = self.frame_ordinals.entry((request.format, request.size)).or_insert(0);
        let key = ImageKey {
            format: request.format,
            size: request.size,
            ordinal: *ordinal,
        };

        if !self.allocations.contains_key(&key) {
            let image = device.create_image(request.format, request.size)?;
            let physical_id = self.next_physical_id;
            self.next_physical_id += 1;
            tracing::debug!(physical_id, image = request.id, format = %request.format, size = %request.size, "allocated image");
            self.allocations.insert(
                key,
                AllocatedImage {
                    key,
                    physical_id,
                    size: request.size,
                    frames_since_last_use: 0,
                    image,
                },
            );
        }
        *ordinal += 1;
        self.frame_index.insert(request.id, key);

        let allocation = self
            .allocations
            .get_mut(&key)
            .ok_or_else(|| DeviceError::Backend(format!("image {} lost its allocation", request.id)))?;
        allocation.frames_since_last_use = 0;
        Ok(allocation)
    }

    /// Looks up the allocation registered under a logical id for the current frame
    pub fn get(&self, logical_id: u32) -> Option<&AllocatedImage<D::Image>> {
        self.frame_index.get(&logical_id).and_then(|key| self.allocations.get(key))
    }

    /// Number of live physical allocations
    pub fn len(&self) -> usize {
        self.allocations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }

    /// Releases every allocation
    pub fn clear(&mut self, device: &mut D) {
        for (_, allocation) in self.allocations.drain() {
            device.delete_image(allocation.image);
        }
        self.frame_index.clear();
        self.frame_ordinals.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockDevice;

    fn request(id: u32, format: PixelFormat, width: u32, height: u32) -> ImageRequest {
        ImageRequest {
            id,
            format,
            size: Extent::new(width, height),
        }
    }

    fn physical_id(cache: &mut ImageCache<MockDevice>, device: &mut MockDevice, request: &ImageRequest) -> u64 {
        cache.resolve(device, request).unwrap().physical_id
    }

    #[test]
    fn test_same_request_reuses_allocation_across_frames() {
        let mut device = MockDevice::new();
        let mut cache = ImageCache::default();
        let req = request(1, PixelFormat::Rgba16F, 64, 32);

        cache.begin_frame(&mut device);
        let first = physical_id(&mut cache, &mut device, &req);
        for _ in 0..3 {
            cache.begin_frame(&mut device);
            assert_eq!(physical_id(&mut cache, &mut device, &req), first);
            assert_eq!(cache.get(1).unwrap().frames_since_last_use, 0);
        }
        assert_eq!(device.live_images(), 1);
    }

    #[test]
    fn test_logical_id_is_not_part_of_identity() {
        let mut device = MockDevice::new();
        let mut cache = ImageCache::default();

        cache.begin_frame(&mut device);
        let first = physical_id(&mut cache, &mut device, &request(1, PixelFormat::Rgba8, 8, 8));
        cache.begin_frame(&mut device);
        let second = physical_id(&mut cache, &mut device, &request(5, PixelFormat::Rgba8, 8, 8));

        assert_eq!(first, second);
        assert!(cache.get(1).is_none());
        assert_eq!(cache.get(5).unwrap().physical_id, first);
    }

    #[test]
    fn test_same_shape_in_one_frame_gets_distinct_images() {
        let mut device = MockDevice::new();
        let mut cache = ImageCache::default();

        for _ in 0..2 {
            cache.begin_frame(&mut device);
            cache.resolve(&mut device, &request(1, PixelFormat::Rgba16F, 16, 16)).unwrap();
            cache.resolve(&mut device, &request(2, PixelFormat::Rgba16F, 16, 16)).unwrap();
            assert_ne!(cache.get(1).unwrap().physical_id, cache.get(2).unwrap().physical_id);
        }
        assert_eq!(device.live_images(), 2);
    }

    #[test]
    fn test_repeated_logical_id_returns_existing_mapping() {
        let mut device = MockDevice::new();
        let mut cache = ImageCache::default();

        cache.begin_frame(&mut device);
        let first = physical_id(&mut cache, &mut device, &request(3, PixelFormat::Rgba32F, 4, 4));
        let again = physical_id(&mut cache, &mut device, &request(3, PixelFormat::Rgba32F, 4, 4));

        assert_eq!(first, again);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_unused_allocation_released_after_two_frames() {
        let mut device = MockDevice::new();
        let mut cache = ImageCache::default();

        cache.begin_frame(&mut device);
        cache.resolve(&mut device, &request(1, PixelFormat::Rgba8, 8, 8)).unwrap();

        cache.begin_frame(&mut device);
        assert_eq!(cache.len(), 1);
        assert_eq!(device.live_images(), 1);

        cache.begin_frame(&mut device);
        assert!(cache.is_empty());
        assert_eq!(device.live_images(), 0);
    }

    #[test]
    fn test_request_on_first_aging_frame_survives() {
        let mut device = MockDevice::new();
        let mut cache = ImageCache::default();
        let req = request(1, PixelFormat::Rgba8, 8, 8);

        cache.begin_frame(&mut device);
        let first = physical_id(&mut cache, &mut device, &req);

        cache.begin_frame(&mut device);
        assert_eq!(physical_id(&mut cache, &mut device, &req), first);
        cache.begin_frame(&mut device);
        assert_eq!(physical_id(&mut cache, &mut device, &req), first);
    }

    #[test]
    fn test_released_image_is_reallocated_on_demand() {
        let mut device = MockDevice::new();
        let mut cache = ImageCache::default();
        let req = request(1, PixelFormat::Rgba8, 8, 8);

        cache.begin_frame(&mut device);
        let first = physical_id(&mut cache, &mut device, &req);
        cache.begin_frame(&mut device);
        cache.begin_frame(&mut device);

        assert_ne!(physical_id(&mut cache, &mut device, &req), first);
        assert_eq!(device.live_images(), 1);
    }

    #[test]
    fn test_get_is_frame_scoped() {
        let mut device = MockDevice::new();
        let mut cache = ImageCache::default();

        cache.begin_frame(&mut device);
        cache.resolve(&mut device, &request(SWAPCHAIN_IMAGE_ID, PixelFormat::Rgba8, 320, 240)).unwrap();
        assert_eq!(cache.get(SWAPCHAIN_IMAGE_ID).unwrap().size, Extent::new(320, 240));
        assert!(cache.get(7).is_none());

        cache.begin_frame(&mut device);
        assert!(cache.get(SWAPCHAIN_IMAGE_ID).is_none());
    }

    #[test]
    fn test_creation_failure_is_reported() {
        let mut device = MockDevice::new();
        device.fail_image_creation = true;
        let mut cache = ImageCache::default();

        cache.begin_frame(&mut device);
        let result = cache.resolve(&mut device, &request(1, PixelFormat::Rgba8, 8, 8));

        assert!(matches!(result, Err(DeviceError::ImageCreation { .. })));
        assert!(cache.get(1).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear_releases_everything() {
        let mut device = MockDevice::new();
        let mut cache = ImageCache::default();

        cache.begin_frame(&mut device);
        cache.resolve(&mut device, &request(1, PixelFormat::Rgba8, 8, 8)).unwrap();
        cache.resolve(&mut device, &request(2, PixelFormat::Rgba32F, 8, 8)).unwrap();
        cache.clear(&mut device);

        assert!(cache.is_empty());
        assert_eq!(device.live_images(), 0);
    }
}
