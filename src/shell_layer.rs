use std::{
    fmt,
    time::{Duration, Instant},
};

use windows::{
    core::{w, BOOL},
    Win32::{
        Foundation::{HWND, LPARAM, WPARAM},
        UI::WindowsAndMessaging::{
            EnumChildWindows, EnumWindows, FindWindowExW, FindWindowW, SendMessageTimeoutW,
            SMTO_NORMAL,
        },
    },
};

use crate::{
    utility::{raw_from_hwnd, window_class_name},
    warn,
};

/// Undocumented-but-stable Progman message that makes the shell spawn its
/// background worker layers.
const WM_SPAWN_SHELL_LAYERS: u32 = 0x052C;

const TRIGGER_TIMEOUT_MS: u32 = 1000;
const MAX_LOCATE_ATTEMPTS: u32 = 4;
const SETTLE_DELAY: Duration = Duration::from_millis(120);

/// How trustworthy the located embedding target is. Anything below
/// `Verified` means the icon view could not be tied to the layer and
/// icons-on-top ordering is not guaranteed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerConfidence {
    Verified,
    UnverifiedWorker,
    ContainerFallback,
}

/// Result of one locate pass. Must be re-derived after any display change or
/// session switch; the shell recreates these windows at will.
#[derive(Debug, Clone)]
pub struct ShellLayerInfo {
    pub progman: isize,
    /// Window hosting the icon view (a worker or the container itself).
    pub icon_layer: isize,
    /// The SHELLDLL_DefView window, 0 when it was never found.
    pub icon_view: isize,
    /// The window new host windows are parented into.
    pub wallpaper_layer: isize,
    pub confidence: LayerConfidence,
}

impl ShellLayerInfo {
    pub fn is_verified(&self) -> bool {
        self.confidence == LayerConfidence::Verified
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellLayerError {
    /// The shell's top-level container window does not exist. Fatal, not
    /// retryable: without a shell there is nothing to embed into.
    ProgmanMissing,
    /// No usable embedding target materialized within the retry budget.
    LayerUnavailable,
}

impl fmt::Display for ShellLayerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProgmanMissing => write!(f, "shell container window (Progman) not found"),
            Self::LayerUnavailable => write!(f, "shell wallpaper layer did not materialize"),
        }
    }
}

/// Locate the shell layer to embed into. Sends the spawn trigger and
/// re-enumerates with bounded retries; the shell sometimes needs several
/// triggers before the worker windows exist.
pub fn locate(timeout: Duration) -> Result<ShellLayerInfo, ShellLayerError> {
    let progman = unsafe { FindWindowW(w!("Progman"), None) }
        .map_err(|_| ShellLayerError::ProgmanMissing)?;

    let deadline = Instant::now() + timeout;
    let mut attempt = 0u32;
    let mut first_worker: isize = 0;

    loop {
        attempt += 1;
        send_layer_trigger(progman);
        std::thread::sleep(SETTLE_DELAY);

        let workers = collect_top_level_workers();
        if first_worker == 0 {
            first_worker = workers.first().copied().unwrap_or(0);
        }

        // A worker hosting the icon view, with the next worker sibling as the
        // wallpaper layer, is the classic (pre-24H2) hierarchy.
        for worker in &workers {
            let icon_view = find_icon_view(*worker);
            if icon_view == 0 {
                continue;
            }

            if let Ok(next) =
                unsafe { FindWindowExW(None, Some(hwnd(*worker)), w!("WorkerW"), None) }
            {
                if !next.is_invalid() {
                    return Ok(ShellLayerInfo {
                        progman: raw_from_hwnd(progman),
                        icon_layer: *worker,
                        icon_view,
                        wallpaper_layer: raw_from_hwnd(next),
                        confidence: LayerConfidence::Verified,
                    });
                }
            }
        }

        // Newer shells keep the icon view as a child of Progman itself; the
        // container then serves as both icon holder and embedding target.
        let icon_view = find_icon_view(raw_from_hwnd(progman));
        if icon_view != 0 {
            return Ok(ShellLayerInfo {
                progman: raw_from_hwnd(progman),
                icon_layer: raw_from_hwnd(progman),
                icon_view,
                wallpaper_layer: raw_from_hwnd(progman),
                confidence: LayerConfidence::Verified,
            });
        }

        if attempt >= MAX_LOCATE_ATTEMPTS || Instant::now() >= deadline {
            break;
        }
    }

    // Degraded mode: no icon view anywhere. Embedding can still be attempted
    // against a worker or the container, with bottom-of-stack Z-order.
    let (wallpaper_layer, confidence) = select_fallback_target(first_worker, raw_from_hwnd(progman));
    warn!(
        "[SHELL] Icon view not found after {attempt} attempt(s); using fallback target {wallpaper_layer:#x} ({confidence:?})"
    );
    if wallpaper_layer == 0 {
        return Err(ShellLayerError::LayerUnavailable);
    }

    Ok(ShellLayerInfo {
        progman: raw_from_hwnd(progman),
        icon_layer: 0,
        icon_view: 0,
        wallpaper_layer,
        confidence,
    })
}

/// Fallback ladder when the icon view was never found: prefer the first
/// worker seen, else the container itself.
fn select_fallback_target(first_worker: isize, progman: isize) -> (isize, LayerConfidence) {
    if first_worker != 0 {
        (first_worker, LayerConfidence::UnverifiedWorker)
    } else {
        (progman, LayerConfidence::ContainerFallback)
    }
}

fn send_layer_trigger(progman: HWND) {
    // Fire-and-forget with a bounded wait for delivery; the shell gives no
    // completion signal for the actual layer creation.
    let mut result = 0usize;
    for (wparam, lparam) in [(0usize, 0isize), (0x0D, 0), (0x0D, 1)] {
        unsafe {
            let _ = SendMessageTimeoutW(
                progman,
                WM_SPAWN_SHELL_LAYERS,
                WPARAM(wparam),
                LPARAM(lparam),
                SMTO_NORMAL,
                TRIGGER_TIMEOUT_MS,
                Some(&mut result),
            );
        }
    }
}

fn collect_top_level_workers() -> Vec<isize> {
    unsafe extern "system" fn enum_proc(hwnd: HWND, lparam: LPARAM) -> BOOL {
        let out = &mut *(lparam.0 as *mut Vec<isize>);
        if window_class_name(hwnd) == "WorkerW" {
            out.push(raw_from_hwnd(hwnd));
        }
        BOOL(1)
    }

    let mut workers = Vec::<isize>::new();
    unsafe {
        let _ = EnumWindows(
            Some(enum_proc),
            LPARAM((&mut workers as *mut Vec<isize>) as isize),
        );
    }
    workers
}

/// Search all descendants of `parent` for the icon view window.
fn find_icon_view(parent: isize) -> isize {
    unsafe extern "system" fn enum_proc(hwnd: HWND, lparam: LPARAM) -> BOOL {
        let out = &mut *(lparam.0 as *mut isize);
        if window_class_name(hwnd) == "SHELLDLL_DefView" {
            *out = raw_from_hwnd(hwnd);
            return BOOL(0);
        }
        BOOL(1)
    }

    if parent == 0 {
        return 0;
    }

    let mut found: isize = 0;
    unsafe {
        let _ = EnumChildWindows(
            Some(hwnd(parent)),
            Some(enum_proc),
            LPARAM((&mut found as *mut isize) as isize),
        );
    }
    found
}

fn hwnd(raw: isize) -> HWND {
    crate::utility::hwnd_from_raw(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_prefers_worker_over_container() {
        assert_eq!(
            select_fallback_target(0x100, 0x200),
            (0x100, LayerConfidence::UnverifiedWorker)
        );
        assert_eq!(
            select_fallback_target(0, 0x200),
            (0x200, LayerConfidence::ContainerFallback)
        );
        assert_eq!(select_fallback_target(0, 0).0, 0);
    }

    #[test]
    fn verified_info_reports_itself() {
        let info = ShellLayerInfo {
            progman: 1,
            icon_layer: 2,
            icon_view: 3,
            wallpaper_layer: 4,
            confidence: LayerConfidence::Verified,
        };
        assert!(info.is_verified());

        let degraded = ShellLayerInfo {
            confidence: LayerConfidence::UnverifiedWorker,
            ..info
        };
        assert!(!degraded.is_verified());
    }
}
