use std::{
    ffi::OsStr,
    os::windows::ffi::OsStrExt,
};

use windows::core::PCWSTR;
use windows::Win32::Foundation::HWND;
use windows::Win32::UI::Shell::ShellExecuteW;
use windows::Win32::UI::WindowsAndMessaging::{GetClassNameW, IsWindow, SW_SHOWNORMAL};

pub fn to_wstring(s: &str) -> Vec<u16> {
    OsStr::new(s)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect()
}

/// Window handles travel through shared state as raw `isize` values so the
/// containers stay `Send`; convert back to `HWND` only at the Win32 call site.
pub fn hwnd_from_raw(raw: isize) -> HWND {
    HWND(raw as *mut core::ffi::c_void)
}

pub fn raw_from_hwnd(hwnd: HWND) -> isize {
    hwnd.0 as isize
}

pub fn is_live_window(raw: isize) -> bool {
    if raw == 0 {
        return false;
    }
    unsafe { IsWindow(Some(hwnd_from_raw(raw))).as_bool() }
}

pub fn window_class_name(hwnd: HWND) -> String {
    let mut buf = [0u16; 256];
    let len = unsafe { GetClassNameW(hwnd, &mut buf) };
    if len > 0 {
        String::from_utf16_lossy(&buf[..len as usize])
    } else {
        String::new()
    }
}

/// Open a URL through the OS shell on a short-lived worker thread.
/// ShellExecuteW can stall on slow handlers, and some callers (the input
/// hook) must return in bounded time.
pub fn shell_open_url(url: &str) {
    let url = url.to_string();
    std::thread::spawn(move || {
        let operation = to_wstring("open");
        let wide = to_wstring(&url);
        unsafe {
            let _ = ShellExecuteW(
                None,
                PCWSTR(operation.as_ptr()),
                PCWSTR(wide.as_ptr()),
                None,
                None,
                SW_SHOWNORMAL,
            );
        }
    });
}
