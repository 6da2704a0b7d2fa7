use std::{fmt, ptr, sync::OnceLock, time::Duration};

use windows::{
    core::PCWSTR,
    Win32::{
        Foundation::{COLORREF, HINSTANCE, HWND, LPARAM, LRESULT, RECT, WPARAM},
        System::LibraryLoader::GetModuleHandleW,
        UI::WindowsAndMessaging::{
            CreateWindowExW, DefWindowProcW, GetParent, GetWindowLongW, GetWindowRect, MoveWindow,
            RegisterClassW, SetLayeredWindowAttributes, SetWindowLongW, SetWindowPos,
            SystemParametersInfoW, GWL_EXSTYLE, HWND_BOTTOM, LWA_ALPHA, SPI_GETWORKAREA,
            SWP_FRAMECHANGED, SWP_NOACTIVATE, SWP_NOMOVE, SWP_NOSIZE, SWP_NOZORDER,
            SWP_SHOWWINDOW, SYSTEM_PARAMETERS_INFO_UPDATE_FLAGS, WINDOW_EX_STYLE, WINDOW_STYLE,
            WNDCLASSW, WS_CHILD, WS_CLIPCHILDREN, WS_CLIPSIBLINGS, WS_EX_LAYERED,
            WS_EX_NOACTIVATE, WS_EX_TOOLWINDOW, WS_EX_TRANSPARENT, WS_VISIBLE,
        },
    },
};

use crate::{
    monitors::MonitorInfo,
    shell_layer::ShellLayerInfo,
    tracker::ResourceTracker,
    utility::{hwnd_from_raw, is_live_window, raw_from_hwnd},
    warn,
};

pub const HOST_CLASS_NAME: PCWSTR = windows::core::w!("WebWallHostWindow");

/// Defensive ceiling against garbage monitor data; no sane display dimension
/// exceeds this.
const MAX_HOST_DIM: i32 = 10_000;

#[derive(Debug)]
pub enum EmbedError {
    InvalidParent,
    DegenerateBounds { width: i32, height: i32 },
    CreateFailed(String),
}

impl fmt::Display for EmbedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidParent => write!(f, "parent window is not alive"),
            Self::DegenerateBounds { width, height } => {
                write!(f, "rejecting degenerate host bounds {width}x{height}")
            }
            Self::CreateFailed(detail) => write!(f, "host window creation failed: {detail}"),
        }
    }
}

fn ensure_host_class() -> Result<(), String> {
    static CLASS_ONCE: OnceLock<bool> = OnceLock::new();
    if CLASS_ONCE.get().is_some() {
        return Ok(());
    }

    let hinstance = unsafe {
        GetModuleHandleW(None)
            .map(|h| HINSTANCE(h.0))
            .map_err(|e| format!("GetModuleHandleW failed: {e:?}"))?
    };

    let wc = WNDCLASSW {
        lpfnWndProc: Some(host_window_proc),
        hInstance: hinstance,
        lpszClassName: HOST_CLASS_NAME,
        ..Default::default()
    };

    unsafe {
        let _ = RegisterClassW(&wc);
    }

    let _ = CLASS_ONCE.set(true);
    Ok(())
}

unsafe extern "system" fn host_window_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    DefWindowProcW(hwnd, msg, wparam, lparam)
}

pub fn validate_dims(width: i32, height: i32) -> bool {
    width > 0 && height > 0 && width <= MAX_HOST_DIM && height <= MAX_HOST_DIM
}

/// Extended style for a host window. The no-activate bit is permanent (focus
/// changes would break hook-based input routing); the pass-through pair is
/// present only while the window is non-interactive.
pub fn host_ex_style(transparent: bool) -> u32 {
    let mut ex = WS_EX_TOOLWINDOW.0 | WS_EX_NOACTIVATE.0;
    if transparent {
        ex |= WS_EX_LAYERED.0 | WS_EX_TRANSPARENT.0;
    }
    ex
}

/// Toggle only the pass-through bits on an existing ex-style value.
pub fn apply_interactive(ex_style: u32, interactive: bool) -> u32 {
    let cleared = ex_style & !(WS_EX_LAYERED.0 | WS_EX_TRANSPARENT.0);
    let with_passthrough = if interactive {
        cleared
    } else {
        cleared | WS_EX_LAYERED.0 | WS_EX_TRANSPARENT.0
    };
    with_passthrough | WS_EX_NOACTIVATE.0
}

/// Create a host child window covering `monitor` (absolute virtual-desktop
/// coordinates; the parent layer spans the whole virtual desktop) or the
/// primary work area when no monitor is given.
pub fn create_host_window(
    parent: isize,
    monitor: Option<&MonitorInfo>,
    transparent: bool,
    tracker: &ResourceTracker,
) -> Result<isize, EmbedError> {
    if !is_live_window(parent) {
        return Err(EmbedError::InvalidParent);
    }
    ensure_host_class().map_err(EmbedError::CreateFailed)?;

    let parent_hwnd = hwnd_from_raw(parent);
    let mut parent_rect = RECT::default();
    unsafe {
        GetWindowRect(parent_hwnd, &mut parent_rect)
            .map_err(|e| EmbedError::CreateFailed(format!("GetWindowRect failed: {e:?}")))?;
    }

    let target = match monitor {
        Some(m) => m.rect(),
        None => primary_work_area(),
    };

    let width = target.right - target.left;
    let height = target.bottom - target.top;
    if !validate_dims(width, height) {
        return Err(EmbedError::DegenerateBounds { width, height });
    }

    // Child coordinates are relative to the parent layer's origin.
    let x = target.left - parent_rect.left;
    let y = target.top - parent_rect.top;

    let style = WINDOW_STYLE((WS_CHILD | WS_VISIBLE | WS_CLIPSIBLINGS | WS_CLIPCHILDREN).0);
    let ex_style = WINDOW_EX_STYLE(host_ex_style(transparent));

    let hinstance = unsafe {
        GetModuleHandleW(None)
            .map(|h| HINSTANCE(h.0))
            .map_err(|e| EmbedError::CreateFailed(format!("GetModuleHandleW failed: {e:?}")))?
    };

    let hwnd = unsafe {
        CreateWindowExW(
            ex_style,
            HOST_CLASS_NAME,
            PCWSTR::null(),
            style,
            x,
            y,
            width,
            height,
            Some(parent_hwnd),
            None,
            Some(hinstance),
            Some(ptr::null()),
        )
    }
    .map_err(|e| EmbedError::CreateFailed(format!("CreateWindowExW failed: {e:?}")))?;

    if transparent {
        unsafe {
            let _ = SetLayeredWindowAttributes(hwnd, COLORREF(0), 255, LWA_ALPHA);
        }
    }

    let raw = raw_from_hwnd(hwnd);
    tracker.register(raw);
    Ok(raw)
}

/// Toggle pass-through at runtime without recreating the window. Returns
/// false when the window is gone.
pub fn set_interactive(raw: isize, interactive: bool) -> bool {
    if !is_live_window(raw) {
        return false;
    }

    let hwnd = hwnd_from_raw(raw);
    unsafe {
        let ex = GetWindowLongW(hwnd, GWL_EXSTYLE) as u32;
        let new_ex = apply_interactive(ex, interactive);
        if new_ex != ex {
            let _ = SetWindowLongW(hwnd, GWL_EXSTYLE, new_ex as i32);
            if !interactive {
                let _ = SetLayeredWindowAttributes(hwnd, COLORREF(0), 255, LWA_ALPHA);
            }
            let _ = SetWindowPos(
                hwnd,
                None,
                0,
                0,
                0,
                0,
                SWP_FRAMECHANGED | SWP_NOMOVE | SWP_NOSIZE | SWP_NOZORDER | SWP_NOACTIVATE,
            );
        }
    }
    true
}

/// Place the host window immediately behind the icon view so desktop icons
/// stay visually on top. When the icon view is unavailable (or lives in a
/// different layer), fall back to the absolute bottom of the Z-order —
/// degraded but safe, never a hard failure.
pub fn set_z_order(raw: isize, layer: &ShellLayerInfo) -> bool {
    if !is_live_window(raw) {
        return false;
    }

    let hwnd = hwnd_from_raw(raw);
    let icon_view_in_layer = is_live_window(layer.icon_view)
        && unsafe { GetParent(hwnd_from_raw(layer.icon_view)) }
            .map(|p| raw_from_hwnd(p) == layer.wallpaper_layer)
            .unwrap_or(false);

    unsafe {
        if icon_view_in_layer {
            if SetWindowPos(
                hwnd,
                Some(hwnd_from_raw(layer.icon_view)),
                0,
                0,
                0,
                0,
                SWP_NOMOVE | SWP_NOSIZE | SWP_NOACTIVATE | SWP_SHOWWINDOW,
            )
            .is_ok()
            {
                return true;
            }
            warn!("[EMBED] Precise Z-order placement failed; falling back to bottom");
        }

        let _ = SetWindowPos(
            hwnd,
            Some(HWND_BOTTOM),
            0,
            0,
            0,
            0,
            SWP_NOMOVE | SWP_NOSIZE | SWP_NOACTIVATE | SWP_SHOWWINDOW,
        );
    }
    false
}

/// Move an existing host window to a monitor's new absolute bounds.
pub fn move_to_monitor(raw: isize, parent: isize, monitor: &MonitorInfo) -> bool {
    if !is_live_window(raw) || !is_live_window(parent) {
        return false;
    }
    if !validate_dims(monitor.width, monitor.height) {
        return false;
    }

    let mut parent_rect = RECT::default();
    unsafe {
        if GetWindowRect(hwnd_from_raw(parent), &mut parent_rect).is_err() {
            return false;
        }
        MoveWindow(
            hwnd_from_raw(raw),
            monitor.left - parent_rect.left,
            monitor.top - parent_rect.top,
            monitor.width,
            monitor.height,
            true,
        )
        .is_ok()
    }
}

/// Block (bounded) until a window handle stops being live, so a replacement
/// instance never coexists with the ghost of the previous one.
pub fn wait_for_destroyed(raw: isize, timeout: Duration) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while is_live_window(raw) {
        if std::time::Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    true
}

fn primary_work_area() -> RECT {
    let mut rect = RECT::default();
    unsafe {
        if SystemParametersInfoW(
            SPI_GETWORKAREA,
            0,
            Some(&mut rect as *mut RECT as *mut _),
            SYSTEM_PARAMETERS_INFO_UPDATE_FLAGS(0),
        )
        .is_err()
        {
            // Last resort; a zeroed rect would be rejected as degenerate.
            rect = RECT {
                left: 0,
                top: 0,
                right: 1920,
                bottom: 1080,
            };
        }
    }
    rect
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dims_validation_bounds() {
        assert!(validate_dims(1920, 1080));
        assert!(validate_dims(1, 1));
        assert!(!validate_dims(0, 1080));
        assert!(!validate_dims(1920, 0));
        assert!(!validate_dims(-1920, 1080));
        assert!(!validate_dims(10_001, 1080));
        assert!(validate_dims(10_000, 10_000));
    }

    #[test]
    fn ex_style_always_carries_no_activate() {
        assert_ne!(host_ex_style(false) & WS_EX_NOACTIVATE.0, 0);
        assert_ne!(host_ex_style(true) & WS_EX_NOACTIVATE.0, 0);
        assert_eq!(host_ex_style(false) & WS_EX_TRANSPARENT.0, 0);
        assert_ne!(host_ex_style(true) & WS_EX_TRANSPARENT.0, 0);
        assert_ne!(host_ex_style(true) & WS_EX_LAYERED.0, 0);
    }

    #[test]
    fn interactive_round_trip_restores_style() {
        let initial = host_ex_style(false);
        let non_interactive = apply_interactive(initial, false);
        assert_ne!(non_interactive & WS_EX_TRANSPARENT.0, 0);

        let restored = apply_interactive(non_interactive, true);
        assert_eq!(restored, initial);

        // Idempotent in both directions.
        assert_eq!(apply_interactive(restored, true), restored);
        assert_eq!(
            apply_interactive(non_interactive, false),
            non_interactive
        );
    }

    #[test]
    fn interactive_toggle_never_clears_no_activate() {
        for start in [host_ex_style(false), host_ex_style(true)] {
            for interactive in [true, false] {
                let result = apply_interactive(start, interactive);
                assert_ne!(result & WS_EX_NOACTIVATE.0, 0);
            }
        }
    }
}
