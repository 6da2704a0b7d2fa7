use std::{collections::HashMap, sync::RwLock};

use crate::registry::{MonitorBounds, WallpaperInstance};

/// Resolved dispatch entry for one instance, cached for O(1)-ish lookups on
/// the hook thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchTarget {
    pub monitor_index: usize,
    pub host_hwnd: isize,
    pub input_target_hwnd: isize,
    pub bounds: MonitorBounds,
}

#[derive(Default)]
struct DispatchCache {
    /// Raw handle → position in `targets`.
    by_hwnd: HashMap<isize, usize>,
    targets: Vec<DispatchTarget>,
}

/// Derived handle→instance index used by the input router and hit testing.
/// Deliberately behind its own lock, decoupled from the registry mutex, and
/// always rebuilt wholesale (clear + repopulate) immediately after any
/// registry mutation — a stale cache is tolerable only inside that narrow
/// window, never indefinitely.
#[derive(Default)]
pub struct EventDispatcher {
    cache: RwLock<DispatchCache>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rebuild(&self, instances: &[WallpaperInstance]) {
        let mut fresh = DispatchCache::default();
        for instance in instances {
            let target = DispatchTarget {
                monitor_index: instance.monitor_index,
                host_hwnd: instance.host_hwnd,
                input_target_hwnd: instance.input_target_hwnd,
                bounds: instance.bounds,
            };
            let pos = fresh.targets.len();
            fresh.by_hwnd.insert(instance.host_hwnd, pos);
            if instance.input_target_hwnd != 0 {
                fresh.by_hwnd.insert(instance.input_target_hwnd, pos);
            }
            fresh.targets.push(target);
        }

        *self.cache.write().unwrap() = fresh;
    }

    pub fn clear(&self) {
        *self.cache.write().unwrap() = DispatchCache::default();
    }

    /// True when the handle belongs to one of our embedded windows. Used by
    /// event classification; must never block the hook for long, hence
    /// try_read with a pessimistic false on contention.
    pub fn is_own_window(&self, raw: isize) -> bool {
        match self.cache.try_read() {
            Ok(cache) => cache.by_hwnd.contains_key(&raw),
            Err(_) => false,
        }
    }

    /// O(1) handle-based resolution, preferred over the bounds scan when the
    /// event landed directly on one of our windows.
    pub fn target_for_hwnd(&self, raw: isize) -> Option<DispatchTarget> {
        let cache = self.cache.try_read().ok()?;
        let pos = *cache.by_hwnd.get(&raw)?;
        cache.targets.get(pos).copied()
    }

    pub fn hit_test(&self, x: i32, y: i32) -> Option<DispatchTarget> {
        let cache = self.cache.try_read().ok()?;
        cache
            .targets
            .iter()
            .find(|t| {
                x >= t.bounds.left
                    && x < t.bounds.left + t.bounds.width
                    && y >= t.bounds.top
                    && y < t.bounds.top + t.bounds.height
            })
            .copied()
    }

    /// Legacy single-instance fallback: when exactly one instance exists,
    /// events that miss every cached bounds still have a target.
    pub fn single_target(&self) -> Option<DispatchTarget> {
        let cache = self.cache.try_read().ok()?;
        if cache.targets.len() == 1 {
            cache.targets.first().copied()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(monitor_index: usize, host: isize, input: isize, left: i32) -> WallpaperInstance {
        WallpaperInstance {
            monitor_index,
            device_name: format!(r"\\.\DISPLAY{}", monitor_index + 1),
            bounds: MonitorBounds {
                left,
                top: 0,
                width: 1920,
                height: 1080,
            },
            host_hwnd: host,
            shell_layer_hwnd: 0x10,
            input_target_hwnd: input,
            renderer_id: monitor_index as u32 + 1,
            mouse_transparent: false,
            url: String::new(),
            click_regions: Vec::new(),
        }
    }

    #[test]
    fn rebuild_replaces_the_whole_cache() {
        let dispatcher = EventDispatcher::new();
        dispatcher.rebuild(&[instance(0, 0x100, 0x200, 0)]);
        assert!(dispatcher.is_own_window(0x100));
        assert!(dispatcher.is_own_window(0x200));

        dispatcher.rebuild(&[instance(1, 0x300, 0x400, 1920)]);
        assert!(!dispatcher.is_own_window(0x100));
        assert!(dispatcher.is_own_window(0x300));
        assert_eq!(
            dispatcher.target_for_hwnd(0x400).unwrap().monitor_index,
            1
        );
        assert!(dispatcher.target_for_hwnd(0x100).is_none());
    }

    #[test]
    fn hit_test_resolves_monitor_bounds() {
        let dispatcher = EventDispatcher::new();
        dispatcher.rebuild(&[
            instance(0, 0x100, 0x200, 0),
            instance(1, 0x300, 0x400, 1920),
        ]);

        assert_eq!(dispatcher.hit_test(10, 10).unwrap().monitor_index, 0);
        assert_eq!(dispatcher.hit_test(2000, 10).unwrap().monitor_index, 1);
        assert!(dispatcher.hit_test(-5, 10).is_none());
    }

    #[test]
    fn single_target_only_with_exactly_one_instance() {
        let dispatcher = EventDispatcher::new();
        assert!(dispatcher.single_target().is_none());

        dispatcher.rebuild(&[instance(0, 0x100, 0x200, 0)]);
        assert_eq!(dispatcher.single_target().unwrap().host_hwnd, 0x100);

        dispatcher.rebuild(&[
            instance(0, 0x100, 0x200, 0),
            instance(1, 0x300, 0x400, 1920),
        ]);
        assert!(dispatcher.single_target().is_none());

        dispatcher.clear();
        assert!(dispatcher.single_target().is_none());
    }
}
