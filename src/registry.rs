use std::sync::Mutex;

use crate::{
    messages::ClickRegion,
    monitors::{self, MonitorInfo},
};

/// One per-monitor wallpaper instance. Plain data only: window handles are
/// raw values and the renderer is an opaque id into the command thread's
/// renderer map, so the registry can be shared across the hook, poll and
/// command threads. An instance is only registered once both its window and
/// renderer exist; partially-constructed instances never land here.
#[derive(Debug, Clone)]
pub struct WallpaperInstance {
    /// Volatile across enumerations; `device_name` is the stable identity.
    pub monitor_index: usize,
    pub device_name: String,
    pub bounds: MonitorBounds,
    pub host_hwnd: isize,
    pub shell_layer_hwnd: isize,
    /// Deepest renderer child that accepts posted mouse input; falls back to
    /// the host window when discovery failed.
    pub input_target_hwnd: isize,
    pub renderer_id: u32,
    pub mouse_transparent: bool,
    pub url: String,
    pub click_regions: Vec<ClickRegion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorBounds {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}

impl MonitorBounds {
    pub fn of(monitor: &MonitorInfo) -> Self {
        Self {
            left: monitor.left,
            top: monitor.top,
            width: monitor.width,
            height: monitor.height,
        }
    }
}

struct RegistryInner {
    instances: Vec<WallpaperInstance>,
    monitors: Vec<MonitorInfo>,
}

/// Exclusive owner of the instance collection and the monitor cache. All
/// mutation and point lookup happen under one mutex; the handle→instance
/// cache in `EventDispatcher` is a derived index rebuilt after every
/// mutation here, never patched.
pub struct InstanceRegistry {
    inner: Mutex<RegistryInner>,
    on_empty: Mutex<Option<Box<dyn Fn() + Send>>>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                instances: Vec::new(),
                monitors: Vec::new(),
            }),
            on_empty: Mutex::new(None),
        }
    }

    /// Callback fired exactly once each time the registry transitions to
    /// empty, so the owner can release the global input hook and clear
    /// default-URL state.
    pub fn set_on_empty(&self, callback: Box<dyn Fn() + Send>) {
        *self.on_empty.lock().unwrap() = Some(callback);
    }

    pub fn set_monitors(&self, monitors: Vec<MonitorInfo>) {
        self.inner.lock().unwrap().monitors = monitors;
    }

    pub fn monitors(&self) -> Vec<MonitorInfo> {
        self.inner.lock().unwrap().monitors.clone()
    }

    /// Register a fully-constructed instance. At most one instance may exist
    /// per monitor index.
    pub fn add(&self, instance: WallpaperInstance) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner
            .instances
            .iter()
            .any(|i| i.monitor_index == instance.monitor_index)
        {
            return false;
        }
        inner.instances.push(instance);
        true
    }

    /// Remove and return the instance for a monitor. Fires the empty signal
    /// (outside the lock) when this removal emptied the registry; removing
    /// from an already-empty registry fires nothing.
    pub fn remove(&self, monitor_index: usize) -> Option<WallpaperInstance> {
        let (removed, now_empty) = {
            let mut inner = self.inner.lock().unwrap();
            let pos = inner
                .instances
                .iter()
                .position(|i| i.monitor_index == monitor_index);
            match pos {
                Some(pos) => {
                    let removed = inner.instances.remove(pos);
                    (Some(removed), inner.instances.is_empty())
                }
                None => (None, false),
            }
        };

        if removed.is_some() && now_empty {
            self.fire_empty_signal();
        }
        removed
    }

    fn fire_empty_signal(&self) {
        let guard = self.on_empty.lock().unwrap();
        if let Some(callback) = guard.as_ref() {
            callback();
        }
    }

    pub fn get_for_monitor(&self, monitor_index: usize) -> Option<WallpaperInstance> {
        self.inner
            .lock()
            .unwrap()
            .instances
            .iter()
            .find(|i| i.monitor_index == monitor_index)
            .cloned()
    }

    /// Resolve a screen point to a monitor via the cached monitor list, then
    /// to that monitor's instance.
    pub fn get_at_point(&self, x: i32, y: i32) -> Option<WallpaperInstance> {
        let inner = self.inner.lock().unwrap();
        let monitor = monitors::monitor_at_point(&inner.monitors, x, y)?;
        inner
            .instances
            .iter()
            .find(|i| i.monitor_index == monitor.index)
            .cloned()
    }

    pub fn instance_count(&self) -> usize {
        self.inner.lock().unwrap().instances.len()
    }

    pub fn snapshot(&self) -> Vec<WallpaperInstance> {
        self.inner.lock().unwrap().instances.clone()
    }

    /// Replace an instance's click-region list wholesale; keyed by renderer
    /// id because monitor indices can be renumbered by display changes.
    pub fn set_click_regions(&self, renderer_id: u32, regions: Vec<ClickRegion>) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner
            .instances
            .iter_mut()
            .find(|i| i.renderer_id == renderer_id)
        {
            Some(instance) => {
                instance.click_regions = regions;
                true
            }
            None => false,
        }
    }

    pub fn clear_click_regions(&self, monitor_index: usize) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(instance) = inner
            .instances
            .iter_mut()
            .find(|i| i.monitor_index == monitor_index)
        {
            instance.click_regions.clear();
        }
    }

    pub fn set_mouse_transparent(&self, monitor_index: usize, transparent: bool) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner
            .instances
            .iter_mut()
            .find(|i| i.monitor_index == monitor_index)
        {
            Some(instance) => {
                instance.mouse_transparent = transparent;
                true
            }
            None => false,
        }
    }

    pub fn set_input_target(&self, monitor_index: usize, input_target_hwnd: isize) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(instance) = inner
            .instances
            .iter_mut()
            .find(|i| i.monitor_index == monitor_index)
        {
            instance.input_target_hwnd = input_target_hwnd;
        }
    }

    pub fn set_url(&self, monitor_index: usize, url: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner
            .instances
            .iter_mut()
            .find(|i| i.monitor_index == monitor_index)
        {
            Some(instance) => {
                instance.url = url.to_string();
                true
            }
            None => false,
        }
    }

    /// Rebind an instance to a (possibly renumbered) monitor snapshot after
    /// a display change. Keyed by renderer id: during renumbering two
    /// instances can transiently share a monitor index.
    pub fn rebind_monitor(&self, renderer_id: u32, monitor: &MonitorInfo) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner
            .instances
            .iter_mut()
            .find(|i| i.renderer_id == renderer_id)
        {
            Some(instance) => {
                instance.monitor_index = monitor.index;
                instance.device_name = monitor.device_name.clone();
                instance.bounds = MonitorBounds::of(monitor);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;
    use crate::monitors::test_monitor;

    fn instance(monitor_index: usize, device: &str, renderer_id: u32) -> WallpaperInstance {
        WallpaperInstance {
            monitor_index,
            device_name: device.to_string(),
            bounds: MonitorBounds {
                left: 1920 * monitor_index as i32,
                top: 0,
                width: 1920,
                height: 1080,
            },
            host_hwnd: 0x100 + monitor_index as isize,
            shell_layer_hwnd: 0x10,
            input_target_hwnd: 0x200 + monitor_index as isize,
            renderer_id,
            mouse_transparent: false,
            url: "https://example.com".to_string(),
            click_regions: Vec::new(),
        }
    }

    fn region(id: &str, left: i32) -> ClickRegion {
        ClickRegion {
            id: id.to_string(),
            src: String::new(),
            click_url: "https://go.example".to_string(),
            left,
            top: 0,
            width: 100,
            height: 100,
            visible: true,
        }
    }

    #[test]
    fn one_instance_per_monitor() {
        let registry = InstanceRegistry::new();
        assert!(registry.add(instance(0, r"\\.\DISPLAY1", 1)));
        assert!(!registry.add(instance(0, r"\\.\DISPLAY1", 2)));
        assert_eq!(registry.instance_count(), 1);
    }

    #[test]
    fn empty_signal_fires_exactly_once_per_transition() {
        let registry = InstanceRegistry::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        registry.set_on_empty(Box::new(move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        }));

        registry.add(instance(0, r"\\.\DISPLAY1", 1));
        registry.add(instance(1, r"\\.\DISPLAY2", 2));

        assert!(registry.remove(0).is_some());
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        assert!(registry.remove(1).is_some());
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // Removing from an already-empty registry triggers nothing.
        assert!(registry.remove(1).is_none());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn point_lookup_resolves_via_monitor_cache() {
        let registry = InstanceRegistry::new();
        registry.set_monitors(vec![
            test_monitor(0, r"\\.\DISPLAY1", 0, 0, true),
            test_monitor(1, r"\\.\DISPLAY2", 1920, 0, false),
        ]);
        registry.add(instance(1, r"\\.\DISPLAY2", 2));

        assert!(registry.get_at_point(100, 100).is_none());
        let hit = registry.get_at_point(2000, 100).unwrap();
        assert_eq!(hit.monitor_index, 1);
    }

    #[test]
    fn click_regions_replaced_wholesale() {
        let registry = InstanceRegistry::new();
        registry.add(instance(0, r"\\.\DISPLAY1", 7));

        assert!(registry.set_click_regions(7, vec![region("a", 0), region("b", 200)]));
        assert!(registry.set_click_regions(7, vec![region("c", 400)]));

        let regions = registry.get_for_monitor(0).unwrap().click_regions;
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].id, "c");

        assert!(!registry.set_click_regions(99, vec![region("d", 0)]));
    }

    #[test]
    fn rebind_updates_index_and_bounds() {
        let registry = InstanceRegistry::new();
        registry.add(instance(1, r"\\.\DISPLAY2", 2));

        let moved = test_monitor(0, r"\\.\DISPLAY2", 0, 0, true);
        assert!(registry.rebind_monitor(2, &moved));

        let rebound = registry.get_for_monitor(0).unwrap();
        assert_eq!(rebound.device_name, r"\\.\DISPLAY2");
        assert_eq!(rebound.bounds.left, 0);
        assert!(registry.get_for_monitor(1).is_none());
        assert!(!registry.rebind_monitor(99, &moved));
    }

    #[test]
    fn rebind_handles_swapped_indices() {
        let registry = InstanceRegistry::new();
        registry.add(instance(0, r"\\.\DISPLAY1", 1));
        registry.add(instance(1, r"\\.\DISPLAY2", 2));

        // The two monitors swap positions in the new enumeration.
        registry.rebind_monitor(1, &test_monitor(1, r"\\.\DISPLAY1", 1920, 0, false));
        registry.rebind_monitor(2, &test_monitor(0, r"\\.\DISPLAY2", 0, 0, true));

        assert_eq!(registry.get_for_monitor(0).unwrap().renderer_id, 2);
        assert_eq!(registry.get_for_monitor(1).unwrap().renderer_id, 1);
    }
}
