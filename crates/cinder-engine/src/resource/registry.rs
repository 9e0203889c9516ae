use std::ops::Range;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::context::Context;
use crate::device::{DeviceError, DeviceObject, GraphicsDevice, TextureRegion};
use crate::error::{Error, Result};

use super::descriptor::ResourceDescriptor;
use super::handle::{ResourceHandle, ResourceKind};
use super::queue::{ResourceRequest, ResourceRequester};

/// Counters describing the registry's current contents.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct RegistryStats {
    /// Objects reachable through a valid handle.
    pub live: usize,
    /// Objects whose handle is gone but which an in-flight frame may still read.
    pub pending_destruction: usize,
    /// Slots ready for reuse.
    pub free_slots: usize,
    /// Slots ever allocated.
    pub capacity: usize,
}

#[derive(Debug)]
struct Entry {
    object: DeviceObject,
    /// Texture row pitch in bytes; 0 for other kinds.
    bytes_per_row: u64,
    /// Fence of the last frame that referenced the object.
    last_used: u64,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

#[derive(Debug)]
struct PendingDestroy {
    index: u32,
    object: DeviceObject,
    fence: u64,
}

/// Generation-counted slot table owning every device object of a context.
///
/// create/destroy/resolve are O(1): slots live in a `Vec` and freed indices go
/// on a free list. Destruction is deferred: `destroy` invalidates the handle at
/// once, but the device object (and its slot) is only released after the fence
/// of the last frame that used it has completed.
pub struct ResourceRegistry<D: GraphicsDevice> {
    context: Context,
    device: D,

    slots: Vec<Slot>,
    free: Vec<u32>,
    pending: Vec<PendingDestroy>,
    live: usize,

    requests_tx: Sender<ResourceRequest>,
    requests_rx: Receiver<ResourceRequest>,

    shut_down: bool,
}

impl<D: GraphicsDevice> ResourceRegistry<D> {
    pub fn new(context: &Context, device: D) -> Self {
        let (requests_tx, requests_rx) = unbounded();
        Self {
            context: context.clone(),
            device,
            slots: Vec::new(),
            free: Vec::new(),
            pending: Vec::new(),
            live: 0,
            requests_tx,
            requests_rx,
            shut_down: false,
        }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Cloneable, `Send` request queue for other threads.
    pub fn requester(&self) -> ResourceRequester {
        ResourceRequester::new(self.requests_tx.clone())
    }

    /// Creates a device object and returns a handle to it.
    ///
    /// Fails with `Error::ResourceCreation` carrying the device error code if the
    /// descriptor is rejected, and with `Error::RegistryShutDown` after `shutdown`.
    pub fn create(&mut self, descriptor: impl Into<ResourceDescriptor>) -> Result<ResourceHandle> {
        let descriptor = descriptor.into();
        self.ensure_open()?;
        self.context.ensure_alive()?;

        let kind = descriptor.kind();
        let creation_error = |e: DeviceError| Error::ResourceCreation {
            kind,
            code: e.code,
            message: e.message,
        };

        descriptor.validate().map_err(creation_error)?;

        let usage = match &descriptor {
            ResourceDescriptor::Buffer(d) => Some(d.usage),
            _ => None,
        };
        let (name, bytes_per_row) = match &descriptor {
            ResourceDescriptor::Buffer(d) => (self.device.create_buffer(d), 0),
            ResourceDescriptor::Texture(d) => (self.device.create_texture(d), d.bytes_per_row()),
            ResourceDescriptor::Program(d) => (self.device.create_program(d), 0),
        };

        let name = name.map_err(|e| {
            if e.code.is_fatal() {
                self.context.mark_lost();
            }
            log::warn!(
                "device rejected {kind} {:?}: {e}",
                descriptor.label().unwrap_or("<unlabeled>")
            );
            creation_error(e)
        })?;

        let entry = Entry {
            object: DeviceObject {
                kind,
                name,
                extent: descriptor.extent(),
                usage,
            },
            bytes_per_row,
            last_used: 0,
        };

        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                let index = u32::try_from(self.slots.len()).map_err(|_| Error::ResourceCreation {
                    kind,
                    code: crate::device::DeviceErrorCode::OutOfMemory,
                    message: "resource slot table is full".into(),
                })?;
                self.slots.push(Slot {
                    generation: 0,
                    entry: None,
                });
                index
            }
        };

        let slot = &mut self.slots[index as usize];
        slot.entry = Some(entry);
        self.live += 1;

        let handle = ResourceHandle::new(index, slot.generation, self.context.epoch(), kind);
        log::debug!("created {handle} as device object {name}");
        Ok(handle)
    }

    /// Replaces `data.len()` bytes of the resource's contents at `range`.
    ///
    /// Fails with `Error::StaleHandle` if the handle is no longer valid and with
    /// `Error::OutOfRange` if the range leaves the allocated extent, does not match
    /// `data`, or (for textures) does not cover whole rows. Nothing is written
    /// on failure.
    pub fn update(&mut self, handle: ResourceHandle, range: Range<u64>, data: &[u8]) -> Result<()> {
        self.ensure_open()?;
        self.context.ensure_alive()?;
        let entry = self.entry(handle)?;
        let (kind, name, extent, pitch) = (
            entry.object.kind,
            entry.object.name,
            entry.object.extent,
            entry.bytes_per_row,
        );
        let out_of_range = || Error::OutOfRange {
            handle,
            range: range.clone(),
            extent,
        };

        if range.start > range.end || range.end > extent || range.end - range.start != data.len() as u64
        {
            return Err(out_of_range());
        }
        if data.is_empty() {
            return Ok(());
        }

        let result = match kind {
            ResourceKind::Buffer => self.device.write_buffer(name, range.start, data),
            ResourceKind::Texture => {
                if pitch == 0 || range.start % pitch != 0 || data.len() as u64 % pitch != 0 {
                    return Err(out_of_range());
                }
                let region = TextureRegion {
                    first_row: (range.start / pitch) as u32,
                    rows: (data.len() as u64 / pitch) as u32,
                    bytes_per_row: pitch as u32,
                };
                self.device.write_texture(name, region, data)
            }
            // Programs have no byte extent; the range check above rejects them.
            ResourceKind::Program => return Err(out_of_range()),
        };

        result.map_err(|e| {
            if e.code.is_fatal() {
                self.context.mark_lost();
                Error::DeviceLost(e.message)
            } else {
                Error::ResourceCreation {
                    kind: handle.kind(),
                    code: e.code,
                    message: e.message,
                }
            }
        })
    }

    /// Invalidates the handle and schedules the device object for release.
    ///
    /// Idempotent: destroying a stale or already-destroyed handle does nothing.
    pub fn destroy(&mut self, handle: ResourceHandle) {
        if self.entry(handle).is_err() {
            log::debug!("destroy of {handle:?} ignored: handle is not live");
            return;
        }

        let index = handle.index();
        let slot = &mut self.slots[index as usize];
        let Some(entry) = slot.entry.take() else { return };
        // A retired slot (generation exhausted) is never reused.
        slot.generation = slot.generation.saturating_add(1);
        self.live -= 1;

        let completed = self.device.completed_fence();
        if entry.last_used <= completed {
            self.release(index, entry.object);
        } else {
            log::debug!(
                "deferring destruction of {handle} until fence {} (completed {completed})",
                entry.last_used
            );
            self.pending.push(PendingDestroy {
                index,
                object: entry.object,
                fence: entry.last_used,
            });
        }
    }

    /// Whether `handle` still names a live object.
    pub fn contains(&self, handle: ResourceHandle) -> bool {
        self.entry(handle).is_ok()
    }

    /// Extent in bytes of the object behind `handle`.
    pub fn extent(&self, handle: ResourceHandle) -> Result<u64> {
        self.entry(handle).map(|e| e.object.extent)
    }

    /// Maps a handle to its device object. Used by the renderer.
    pub(crate) fn resolve(&self, handle: ResourceHandle) -> Result<DeviceObject> {
        self.context.ensure_alive()?;
        self.entry(handle).map(|e| e.object)
    }

    /// Records that the frame signalling `fence` references `handle`.
    pub(crate) fn mark_in_flight(&mut self, handle: ResourceHandle, fence: u64) {
        if let Some(entry) = self
            .slots
            .get_mut(handle.index() as usize)
            .filter(|s| s.generation == handle.generation())
            .and_then(|s| s.entry.as_mut())
        {
            entry.last_used = entry.last_used.max(fence);
        }
    }

    /// Releases deferred objects whose fence has completed. Returns how many.
    pub fn collect_garbage(&mut self) -> usize {
        if self.pending.is_empty() {
            return 0;
        }

        let completed = self.device.completed_fence();
        let (ready, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|p| p.fence <= completed);
        self.pending = waiting;

        let released = ready.len();
        for p in ready {
            self.release(p.index, p.object);
        }
        if released > 0 {
            log::debug!("released {released} deferred object(s) at fence {completed}");
        }
        released
    }

    /// Applies requests queued by `ResourceRequester`s. Returns how many.
    pub fn drain_requests(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(request) = self.requests_rx.try_recv() {
            applied += 1;
            match request {
                ResourceRequest::Create { descriptor, reply } => {
                    let result = self.create(descriptor);
                    if let Err(e) = &result {
                        log::warn!("queued create failed: {e}");
                    }
                    // The requester may have stopped waiting.
                    let _ = reply.send(result);
                }
                ResourceRequest::Update {
                    handle,
                    offset,
                    data,
                } => {
                    let range = offset..offset.saturating_add(data.len() as u64);
                    if let Err(e) = self.update(handle, range, &data) {
                        log::warn!("queued update skipped: {e}");
                    }
                }
                ResourceRequest::Destroy(handle) => self.destroy(handle),
            }
        }
        applied
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            live: self.live,
            pending_destruction: self.pending.len(),
            free_slots: self.free.len(),
            capacity: self.slots.len(),
        }
    }

    pub(crate) fn device(&self) -> &D {
        &self.device
    }

    pub(crate) fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Waits for the device and releases every object. Idempotent; also run on drop.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        self.device.wait_idle();

        for p in std::mem::take(&mut self.pending) {
            self.device.destroy_object(p.object);
        }
        for slot in &mut self.slots {
            if let Some(entry) = slot.entry.take() {
                slot.generation = slot.generation.saturating_add(1);
                self.device.destroy_object(entry.object);
            }
        }
        self.live = 0;
        self.free.clear();
        log::debug!("resource registry shut down");
    }

    fn ensure_open(&self) -> Result<()> {
        if self.shut_down {
            return Err(Error::RegistryShutDown);
        }
        Ok(())
    }

    fn entry(&self, handle: ResourceHandle) -> Result<&Entry> {
        if handle.epoch() != self.context.epoch() {
            return Err(Error::StaleHandle(handle));
        }
        let slot = self
            .slots
            .get(handle.index() as usize)
            .ok_or(Error::NotFound(handle))?;
        if slot.generation != handle.generation() {
            return Err(Error::StaleHandle(handle));
        }
        slot.entry.as_ref().ok_or(Error::StaleHandle(handle))
    }

    fn release(&mut self, index: u32, object: DeviceObject) {
        self.device.destroy_object(object);
        if self.slots[index as usize].generation != u32::MAX {
            self.free.push(index);
        }
    }
}

impl<D: GraphicsDevice> Drop for ResourceRegistry<D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_lock;
    use crate::device::headless::{DeviceCall, HeadlessDevice};
    use crate::device::DeviceErrorCode;
    use crate::resource::{BufferDescriptor, PixelFormat, ProgramDescriptor, TextureDescriptor};
    use crate::resource::TextureFilter;

    fn texture(w: u32, h: u32) -> TextureDescriptor {
        TextureDescriptor {
            label: Some("t".into()),
            width: w,
            height: h,
            format: PixelFormat::Rgba8Unorm,
            filter: TextureFilter::Nearest,
            pixels: Some(vec![0xff; (w * h * 4) as usize]),
        }
    }

    fn registry() -> ResourceRegistry<HeadlessDevice> {
        ResourceRegistry::new(&Context::acquire().unwrap(), HeadlessDevice::new())
    }

    #[test]
    fn create_then_resolve_matches_kind() {
        let _guard = test_lock();
        let mut reg = registry();

        let buf = reg.create(BufferDescriptor::vertices("v", &[0.0f32; 9])).unwrap();
        let tex = reg.create(texture(8, 8)).unwrap();
        let prog = reg.create(ProgramDescriptor::wgsl(
            "p",
            "@vertex fn vs_main() {} @fragment fn fs_main() {}",
        )).unwrap();

        assert_eq!(reg.resolve(buf).unwrap().kind, ResourceKind::Buffer);
        assert_eq!(reg.resolve(tex).unwrap().kind, ResourceKind::Texture);
        assert_eq!(reg.resolve(prog).unwrap().kind, ResourceKind::Program);
        assert_eq!(reg.resolve(tex).unwrap().extent, 8 * 8 * 4);
        assert_eq!(reg.stats().live, 3);
    }

    #[test]
    fn destroyed_handle_is_stale_and_slot_reuse_bumps_generation() {
        let _guard = test_lock();
        let mut reg = registry();

        let a = reg.create(texture(4, 4)).unwrap();
        reg.destroy(a);
        assert_eq!(reg.resolve(a).unwrap_err(), Error::StaleHandle(a));

        let b = reg.create(texture(4, 4)).unwrap();
        assert_eq!(b.index(), a.index());
        assert!(b.generation() > a.generation());
        assert_eq!(reg.resolve(a).unwrap_err(), Error::StaleHandle(a));
        assert!(reg.resolve(b).is_ok());
    }

    #[test]
    fn destroy_is_idempotent() {
        let _guard = test_lock();
        let mut reg = registry();
        let a = reg.create(texture(2, 2)).unwrap();
        reg.destroy(a);
        reg.destroy(a);
        reg.destroy(a);
        let destroys = reg
            .device()
            .probe()
            .calls()
            .iter()
            .filter(|c| matches!(c, DeviceCall::Destroy(_)))
            .count();
        assert_eq!(destroys, 1);
        assert_eq!(reg.stats().free_slots, 1);
    }

    #[test]
    fn unknown_slot_is_not_found() {
        let _guard = test_lock();
        let reg = registry();
        let forged = ResourceHandle::new(42, 0, reg.context().epoch(), ResourceKind::Buffer);
        assert_eq!(reg.resolve(forged).unwrap_err(), Error::NotFound(forged));
    }

    #[test]
    fn device_rejection_carries_code() {
        let _guard = test_lock();
        let mut reg = registry();
        reg.device().probe().set_max_texture_dimension(16);
        let err = reg.create(texture(32, 32)).unwrap_err();
        assert!(matches!(
            err,
            Error::ResourceCreation {
                kind: ResourceKind::Texture,
                code: DeviceErrorCode::UnsupportedFormat,
                ..
            }
        ));
        assert_eq!(reg.stats().live, 0);
        assert_eq!(reg.stats().capacity, 0);
    }

    #[test]
    fn invalid_descriptor_never_reaches_device() {
        let _guard = test_lock();
        let mut reg = registry();
        let err = reg.create(texture(0, 4)).unwrap_err();
        assert!(matches!(
            err,
            Error::ResourceCreation {
                code: DeviceErrorCode::InvalidDescriptor,
                ..
            }
        ));
        assert!(reg.device().probe().calls().is_empty());
    }

    #[test]
    fn update_checks_extent_and_generation() {
        let _guard = test_lock();
        let mut reg = registry();
        let buf = reg.create(BufferDescriptor::vertices("v", &[0u8; 16])).unwrap();

        reg.update(buf, 4..8, &[1, 2, 3, 4]).unwrap();
        assert!(matches!(
            reg.update(buf, 12..20, &[0; 8]),
            Err(Error::OutOfRange { extent: 16, .. })
        ));
        assert!(matches!(
            reg.update(buf, 0..4, &[0; 3]),
            Err(Error::OutOfRange { .. })
        ));

        reg.destroy(buf);
        assert_eq!(
            reg.update(buf, 0..4, &[0; 4]).unwrap_err(),
            Error::StaleHandle(buf)
        );

        let writes = reg
            .device()
            .probe()
            .calls()
            .iter()
            .filter(|c| matches!(c, DeviceCall::WriteBuffer { .. }))
            .count();
        assert_eq!(writes, 1, "rejected updates must not write");
    }

    #[test]
    fn texture_updates_cover_whole_rows() {
        let _guard = test_lock();
        let mut reg = registry();
        let tex = reg.create(texture(4, 4)).unwrap();
        let row = 4 * 4;
        reg.update(tex, row..3 * row, &vec![0; 2 * row as usize]).unwrap();
        assert!(matches!(
            reg.update(tex, 2..6, &[0; 4]),
            Err(Error::OutOfRange { .. })
        ));
    }

    #[test]
    fn destruction_waits_for_fence() {
        let _guard = test_lock();
        let mut reg = registry();
        reg.device().probe().set_fence_lag(1);

        let tex = reg.create(texture(4, 4)).unwrap();
        reg.mark_in_flight(tex, 1);
        reg.device_mut().submit(1).unwrap();
        assert_eq!(reg.device_mut().completed_fence(), 0);

        reg.destroy(tex);
        assert!(!reg.contains(tex));
        assert_eq!(reg.stats().pending_destruction, 1);
        assert_eq!(reg.collect_garbage(), 0);

        // A second submission retires the first.
        reg.device_mut().submit(2).unwrap();
        assert_eq!(reg.collect_garbage(), 1);
        assert_eq!(reg.stats().pending_destruction, 0);
        assert_eq!(reg.stats().free_slots, 1);
    }

    #[test]
    fn pending_slot_is_not_reused_before_release() {
        let _guard = test_lock();
        let mut reg = registry();
        reg.device().probe().set_fence_lag(1);

        let a = reg.create(texture(4, 4)).unwrap();
        reg.mark_in_flight(a, 1);
        reg.device_mut().submit(1).unwrap();
        reg.destroy(a);

        let b = reg.create(texture(4, 4)).unwrap();
        assert_ne!(b.index(), a.index());
    }

    #[test]
    fn handles_from_previous_context_are_stale() {
        let _guard = test_lock();
        let old = {
            let mut reg = registry();
            reg.create(texture(2, 2)).unwrap()
        };
        let reg = registry();
        assert_eq!(reg.resolve(old).unwrap_err(), Error::StaleHandle(old));
    }

    #[test]
    fn queued_requests_apply_on_drain() {
        let _guard = test_lock();
        let mut reg = registry();
        let requester = reg.requester();

        let pending = std::thread::spawn(move || requester.create(texture(4, 4)))
            .join()
            .unwrap();
        assert!(pending.try_get().is_none());

        assert_eq!(reg.drain_requests(), 1);
        let handle = pending.try_get().unwrap().unwrap();
        assert!(reg.contains(handle));

        reg.requester().destroy(handle);
        reg.drain_requests();
        assert!(!reg.contains(handle));
    }

    #[test]
    fn shutdown_releases_everything() {
        let _guard = test_lock();
        let mut reg = registry();
        reg.device().probe().set_fence_lag(4);
        let a = reg.create(texture(2, 2)).unwrap();
        let b = reg.create(BufferDescriptor::vertices("v", &[0u8; 4])).unwrap();
        reg.mark_in_flight(a, 1);
        reg.device_mut().submit(1).unwrap();
        reg.destroy(a);

        reg.shutdown();
        assert!(!reg.contains(b));
        assert_eq!(reg.device().probe().live_objects(), 0);
    }

    #[test]
    fn shut_down_registry_allocates_nothing() {
        let _guard = test_lock();
        let mut reg = registry();
        let device = reg.device().probe();
        let requester = reg.requester();
        let kept = reg.create(BufferDescriptor::vertices("v", &[0u8; 16])).unwrap();
        reg.shutdown();

        assert_eq!(
            reg.create(BufferDescriptor::vertices("late", &[0u8; 16])),
            Err(Error::RegistryShutDown)
        );
        assert_eq!(reg.update(kept, 0..4, &[1; 4]), Err(Error::RegistryShutDown));

        let pending = requester.create(texture(2, 2));
        assert_eq!(reg.drain_requests(), 1);
        assert_eq!(pending.try_get(), Some(Err(Error::RegistryShutDown)));

        drop(reg);
        assert_eq!(device.live_objects(), 0);
    }

    #[test]
    fn lost_device_fails_resolve() {
        let _guard = test_lock();
        let mut reg = registry();
        let a = reg.create(texture(2, 2)).unwrap();
        reg.context().mark_lost();
        assert!(reg.resolve(a).unwrap_err().is_fatal());
        assert!(reg.create(texture(2, 2)).unwrap_err().is_fatal());
    }
}
