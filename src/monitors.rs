use std::mem;

use windows::{
    core::BOOL,
    Win32::{
        Foundation::{LPARAM, RECT},
        Graphics::Gdi::{EnumDisplayMonitors, GetMonitorInfoW, HDC, HMONITOR, MONITORINFOEXW},
    },
};

const MONITORINFOF_PRIMARY: u32 = 0x1;

/// Snapshot of one physical display. `index` is only stable within a single
/// enumeration pass; `device_name` is the identity key used to match monitors
/// across display changes. Snapshots are rebuilt wholesale on every
/// enumeration, never mutated in place.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorInfo {
    pub index: usize,
    pub device_name: String,
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
    pub is_primary: bool,
    pub hmonitor: isize,
}

impl MonitorInfo {
    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        x >= self.left && x < self.left + self.width && y >= self.top && y < self.top + self.height
    }

    pub fn rect(&self) -> RECT {
        RECT {
            left: self.left,
            top: self.top,
            right: self.left + self.width,
            bottom: self.top + self.height,
        }
    }
}

pub fn enumerate_monitors() -> Vec<MonitorInfo> {
    unsafe extern "system" fn enum_monitor_proc(
        monitor: HMONITOR,
        _hdc: HDC,
        _rect: *mut RECT,
        lparam: LPARAM,
    ) -> BOOL {
        let vec = &mut *(lparam.0 as *mut Vec<MonitorInfo>);

        let mut info: MONITORINFOEXW = mem::zeroed();
        info.monitorInfo.cbSize = mem::size_of::<MONITORINFOEXW>() as u32;

        if GetMonitorInfoW(monitor, &mut info as *mut MONITORINFOEXW as *mut _).as_bool() {
            let device_len = info
                .szDevice
                .iter()
                .position(|c| *c == 0)
                .unwrap_or(info.szDevice.len());
            let rect = info.monitorInfo.rcMonitor;
            vec.push(MonitorInfo {
                index: vec.len(),
                device_name: String::from_utf16_lossy(&info.szDevice[..device_len]),
                left: rect.left,
                top: rect.top,
                width: rect.right - rect.left,
                height: rect.bottom - rect.top,
                is_primary: (info.monitorInfo.dwFlags & MONITORINFOF_PRIMARY) != 0,
                hmonitor: monitor.0 as isize,
            });
        }

        BOOL(1)
    }

    let mut monitors = Vec::<MonitorInfo>::new();
    unsafe {
        let _ = EnumDisplayMonitors(
            None,
            None,
            Some(enum_monitor_proc),
            LPARAM((&mut monitors as *mut Vec<MonitorInfo>) as isize),
        );
    }

    monitors
}

pub fn monitor_at_point(monitors: &[MonitorInfo], x: i32, y: i32) -> Option<&MonitorInfo> {
    monitors.iter().find(|m| m.contains_point(x, y))
}

/// Cheap change test used by the periodic layout check; a full reconcile
/// plan is only computed once this reports a difference.
pub fn layouts_differ(old: &[MonitorInfo], new: &[MonitorInfo]) -> bool {
    if old.len() != new.len() {
        return true;
    }
    old.iter().zip(new.iter()).any(|(a, b)| {
        a.device_name != b.device_name
            || a.left != b.left
            || a.top != b.top
            || a.width != b.width
            || a.height != b.height
    })
}

/// Resolve a monitor selector list ("*" = all, "p" = primary,
/// 1-based numbers) against an enumeration pass.
pub fn resolve_monitor_selectors<'a>(
    monitors: &'a [MonitorInfo],
    keys: &[String],
) -> Vec<&'a MonitorInfo> {
    if keys.iter().any(|v| v == "*") {
        return monitors.iter().collect();
    }

    let mut result = Vec::<&MonitorInfo>::new();
    for key in keys {
        if key.eq_ignore_ascii_case("p") {
            for monitor in monitors {
                if monitor.is_primary && !result.iter().any(|m| m.index == monitor.index) {
                    result.push(monitor);
                }
            }
            continue;
        }

        if let Ok(index) = key.parse::<usize>() {
            if index > 0 {
                if let Some(monitor) = monitors.get(index - 1) {
                    if !result.iter().any(|m| m.index == monitor.index) {
                        result.push(monitor);
                    }
                }
            }
        }
    }

    result
}

#[cfg(test)]
pub(crate) fn test_monitor(index: usize, device: &str, left: i32, top: i32, primary: bool) -> MonitorInfo {
    MonitorInfo {
        index,
        device_name: device.to_string(),
        left,
        top,
        width: 1920,
        height: 1080,
        is_primary: primary,
        hmonitor: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_lookup_uses_half_open_bounds() {
        let monitors = vec![
            test_monitor(0, r"\\.\DISPLAY1", 0, 0, true),
            test_monitor(1, r"\\.\DISPLAY2", 1920, 0, false),
        ];
        assert_eq!(monitor_at_point(&monitors, 0, 0).unwrap().index, 0);
        assert_eq!(monitor_at_point(&monitors, 1919, 500).unwrap().index, 0);
        assert_eq!(monitor_at_point(&monitors, 1920, 500).unwrap().index, 1);
        assert!(monitor_at_point(&monitors, 4000, 0).is_none());
    }

    #[test]
    fn layout_diff_detects_moves_and_counts() {
        let a = vec![test_monitor(0, r"\\.\DISPLAY1", 0, 0, true)];
        let mut b = a.clone();
        assert!(!layouts_differ(&a, &b));

        b[0].left = 100;
        assert!(layouts_differ(&a, &b));

        let c = vec![
            test_monitor(0, r"\\.\DISPLAY1", 0, 0, true),
            test_monitor(1, r"\\.\DISPLAY2", 1920, 0, false),
        ];
        assert!(layouts_differ(&a, &c));
    }

    #[test]
    fn selector_resolution() {
        let monitors = vec![
            test_monitor(0, r"\\.\DISPLAY1", 0, 0, false),
            test_monitor(1, r"\\.\DISPLAY2", 1920, 0, true),
        ];

        let all = resolve_monitor_selectors(&monitors, &["*".to_string()]);
        assert_eq!(all.len(), 2);

        let primary = resolve_monitor_selectors(&monitors, &["p".to_string()]);
        assert_eq!(primary.len(), 1);
        assert_eq!(primary[0].index, 1);

        let picked = resolve_monitor_selectors(
            &monitors,
            &["2".to_string(), "2".to_string(), "9".to_string()],
        );
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].index, 1);
    }
}
