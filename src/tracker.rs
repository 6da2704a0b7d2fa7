use std::sync::Mutex;

use windows::Win32::UI::WindowsAndMessaging::DestroyWindow;

use crate::{
    utility::{hwnd_from_raw, is_live_window},
    warn,
};

/// Process-wide registry of every window this process creates, so shutdown
/// can force-destroy anything normal teardown missed. Injected into the
/// components that create windows rather than accessed as a global.
#[derive(Default)]
pub struct ResourceTracker {
    windows: Mutex<Vec<isize>>,
}

impl ResourceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, raw: isize) {
        if raw == 0 {
            return;
        }
        let mut windows = self.windows.lock().unwrap();
        if !windows.contains(&raw) {
            windows.push(raw);
        }
    }

    pub fn unregister(&self, raw: isize) {
        self.windows.lock().unwrap().retain(|w| *w != raw);
    }

    pub fn tracked_count(&self) -> usize {
        self.windows.lock().unwrap().len()
    }

    /// Destroy every still-live tracked window. Safe to call repeatedly and
    /// with partially torn-down state; dead handles are skipped.
    pub fn destroy_all(&self) {
        let drained: Vec<isize> = {
            let mut windows = self.windows.lock().unwrap();
            windows.drain(..).collect()
        };

        for raw in drained {
            if !is_live_window(raw) {
                continue;
            }
            if let Err(e) = unsafe { DestroyWindow(hwnd_from_raw(raw)) } {
                warn!("[TRACKER] DestroyWindow failed for {raw:#x}: {e:?}");
            }
        }
    }
}
