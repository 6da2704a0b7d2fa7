use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc, LazyLock, Mutex, RwLock,
    },
    thread::JoinHandle,
};

use windows::{
    core::BOOL,
    Win32::{
        Foundation::{HWND, LPARAM, LRESULT, POINT, WPARAM},
        Graphics::Gdi::ScreenToClient,
        System::Threading::GetCurrentThreadId,
        UI::WindowsAndMessaging::{
            CallNextHookEx, DispatchMessageW, EnumChildWindows, GetAncestor, GetMessageW,
            GetWindowLongW, IsWindowVisible, PostMessageW, PostThreadMessageW, SetWindowsHookExW,
            TranslateMessage, UnhookWindowsHookEx, WindowFromPoint, GA_ROOT, GWL_STYLE,
            MSLLHOOKSTRUCT, MSG, WH_MOUSE_LL, WM_LBUTTONDOWN, WM_LBUTTONUP, WM_MOUSEMOVE,
            WM_QUIT,
        },
    },
};

use crate::{
    debug,
    dispatcher::{DispatchTarget, EventDispatcher},
    messages::ClickRegion,
    registry::InstanceRegistry,
    utility::{hwnd_from_raw, is_live_window, raw_from_hwnd, shell_open_url, window_class_name},
    warn,
};

const WS_CAPTION_BITS: u32 = 0x00C0_0000;
const WS_POPUP_BIT: u32 = 0x8000_0000;
const MK_LBUTTON_FLAG: usize = 0x0001;

/* =========================
   CLASSIFICATION
   ========================= */

/// Shell and system window classes that sit in the desktop layer. Events over
/// these (or over our own windows) belong to the wallpaper; everything else
/// with a caption or popup style is a foreground application covering the
/// desktop.
const DESKTOP_LAYER_CLASSES: &[&str] = &[
    "Progman",
    "WorkerW",
    "SHELLDLL_DefView",
    "SysListView32",
    "FolderView",
    "Shell_TrayWnd",
    "Shell_SecondaryTrayWnd",
    "Windows.UI.Core.CoreWindow",
    "XamlExplorerHostIslandWindow",
    "WebWallHostWindow",
];

pub fn is_desktop_layer_class(class_name: &str) -> bool {
    DESKTOP_LAYER_CLASSES.contains(&class_name) || class_name.starts_with("Chrome_")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowClass {
    DesktopLayer,
    OwnWindow,
    ForegroundApp,
    Unknown,
}

/// Everything classification needs to know about the window under the
/// cursor, gathered by the Win32 probe in production and constructed
/// directly by tests.
#[derive(Debug, Clone)]
pub struct WindowSnapshot {
    pub class_name: String,
    pub has_caption: bool,
    pub is_popup: bool,
    pub visible: bool,
    pub is_own: bool,
}

pub fn classify_window(snapshot: &WindowSnapshot) -> WindowClass {
    if snapshot.is_own {
        return WindowClass::OwnWindow;
    }
    if is_desktop_layer_class(&snapshot.class_name) {
        return WindowClass::DesktopLayer;
    }
    if (snapshot.has_caption || snapshot.is_popup) && snapshot.visible {
        return WindowClass::ForegroundApp;
    }
    WindowClass::Unknown
}

/* =========================
   ROUTE DECISION
   ========================= */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseKind {
    Move,
    Down,
    Up,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RouteDecision {
    /// Nothing to do; the event just continues down the hook chain.
    Ignore,
    /// Ad-click terminal branch: open the URL, never forward to the page.
    OpenClickUrl { url: String },
    Forward {
        target: DispatchTarget,
        kind: MouseKind,
        x: i32,
        y: i32,
    },
}

/// Pure routing decision for one raw mouse event. `held_before` is the
/// button state as it was before this event; a down event's own recording
/// happens in the caller, before the occlusion check, so an occluded down
/// still arms the drag state.
pub fn decide_route(
    paused: bool,
    kind: MouseKind,
    x: i32,
    y: i32,
    classification: WindowClass,
    held_before: bool,
    target: Option<DispatchTarget>,
    regions: &[ClickRegion],
) -> RouteDecision {
    if paused {
        return RouteDecision::Ignore;
    }

    // A visible application window is covering the desktop: it gets its own
    // input. The held-button exception keeps an in-flight drag alive when
    // the cursor crosses such a window mid-gesture.
    if classification == WindowClass::ForegroundApp {
        let drag_in_flight = held_before && kind != MouseKind::Down;
        if !drag_in_flight {
            return RouteDecision::Ignore;
        }
    }

    let Some(target) = target else {
        return RouteDecision::Ignore;
    };

    if kind == MouseKind::Up {
        if let Some(region) = regions.iter().find(|r| r.is_clickable() && r.contains(x, y)) {
            return RouteDecision::OpenClickUrl {
                url: region.click_url.clone(),
            };
        }
    }

    RouteDecision::Forward { target, kind, x, y }
}

/* =========================
   GLOBAL HOOK
   ========================= */

/// State shared with the hook callback. The hook reads only atomics and the
/// two caches; it never blocks on anything a slow thread could hold, because
/// a slow low-level hook gets silently unregistered by the OS.
pub struct RouterShared {
    paused: AtomicBool,
    button_down: AtomicBool,
    registry: Arc<InstanceRegistry>,
    dispatcher: Arc<EventDispatcher>,
}

/// The OS hook API requires a single static callback, so exactly one
/// process-wide slot holds the active router; the trampoline immediately
/// delegates to it.
static ROUTER_SLOT: LazyLock<RwLock<Option<Arc<RouterShared>>>> =
    LazyLock::new(|| RwLock::new(None));

struct HookThread {
    thread_id: u32,
    join: JoinHandle<()>,
}

pub struct InputRouter {
    shared: Arc<RouterShared>,
    hook: Mutex<Option<HookThread>>,
}

impl InputRouter {
    pub fn new(registry: Arc<InstanceRegistry>, dispatcher: Arc<EventDispatcher>) -> Self {
        Self {
            shared: Arc::new(RouterShared {
                paused: AtomicBool::new(false),
                button_down: AtomicBool::new(false),
                registry,
                dispatcher,
            }),
            hook: Mutex::new(None),
        }
    }

    pub fn set_paused(&self, paused: bool) {
        self.shared.paused.store(paused, Ordering::SeqCst);
    }

    pub fn is_installed(&self) -> bool {
        self.hook.lock().unwrap().is_some()
    }

    /// Install the process-wide low-level mouse hook on a dedicated thread
    /// with its own message pump. Idempotent.
    pub fn install(&self) -> bool {
        let mut guard = self.hook.lock().unwrap();
        if guard.is_some() {
            return true;
        }

        *ROUTER_SLOT.write().unwrap() = Some(self.shared.clone());

        let (tx, rx) = mpsc::channel::<Option<u32>>();
        let join = std::thread::spawn(move || unsafe {
            let hook = match SetWindowsHookExW(WH_MOUSE_LL, Some(low_level_mouse_proc), None, 0) {
                Ok(h) => h,
                Err(e) => {
                    warn!("[INPUT] SetWindowsHookExW failed: {e:?}");
                    let _ = tx.send(None);
                    return;
                }
            };
            let _ = tx.send(Some(GetCurrentThreadId()));

            let mut msg = MSG::default();
            while GetMessageW(&mut msg, None, 0, 0).into() {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }

            let _ = UnhookWindowsHookEx(hook);
        });

        match rx.recv() {
            Ok(Some(thread_id)) => {
                *guard = Some(HookThread { thread_id, join });
                true
            }
            _ => {
                *ROUTER_SLOT.write().unwrap() = None;
                let _ = join.join();
                false
            }
        }
    }

    /// Remove the hook and stop its thread. Idempotent; safe to call when
    /// installation never happened.
    pub fn release(&self) {
        let taken = self.hook.lock().unwrap().take();
        *ROUTER_SLOT.write().unwrap() = None;

        if let Some(hook_thread) = taken {
            unsafe {
                let _ = PostThreadMessageW(hook_thread.thread_id, WM_QUIT, WPARAM(0), LPARAM(0));
            }
            let _ = hook_thread.join.join();
        }
    }
}

unsafe extern "system" fn low_level_mouse_proc(
    code: i32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    if code >= 0 {
        // A panic escaping this callback would deafen desktop input
        // system-wide; swallow it and keep the chain intact.
        let _ = catch_unwind(AssertUnwindSafe(|| {
            handle_mouse_event(wparam.0 as u32, lparam);
        }));
    }
    CallNextHookEx(None, code, wparam, lparam)
}

fn handle_mouse_event(msg: u32, lparam: LPARAM) {
    let kind = match msg {
        WM_MOUSEMOVE => MouseKind::Move,
        WM_LBUTTONDOWN => MouseKind::Down,
        WM_LBUTTONUP => MouseKind::Up,
        _ => return,
    };

    let Ok(slot) = ROUTER_SLOT.try_read() else {
        return;
    };
    let Some(shared) = slot.as_ref() else {
        return;
    };

    // Record the press before any classification so an occluded down event
    // still arms the drag state.
    let held_before = match kind {
        MouseKind::Down => shared.button_down.swap(true, Ordering::SeqCst),
        _ => shared.button_down.load(Ordering::SeqCst),
    };

    let decision = if shared.paused.load(Ordering::SeqCst) {
        RouteDecision::Ignore
    } else {
        let info = unsafe { *(lparam.0 as *const MSLLHOOKSTRUCT) };
        let (x, y) = (info.pt.x, info.pt.y);

        let under = unsafe { WindowFromPoint(POINT { x, y }) };
        let classification = classify_point(shared, under);

        // Handle-based O(1) resolution when the event landed on one of our
        // windows; bounds scan otherwise, then the legacy single-instance
        // fallback.
        let target = shared
            .dispatcher
            .target_for_hwnd(raw_from_hwnd(under))
            .or_else(|| shared.dispatcher.hit_test(x, y))
            .or_else(|| shared.dispatcher.single_target());

        // Click regions live in screen coordinates inside their monitor, so
        // the registry's point lookup resolves the owning instance directly.
        let regions = match kind {
            MouseKind::Up => shared
                .registry
                .get_at_point(x, y)
                .map(|i| i.click_regions)
                .unwrap_or_default(),
            _ => Vec::new(),
        };

        decide_route(
            false,
            kind,
            x,
            y,
            classification,
            held_before,
            target,
            &regions,
        )
    };

    if kind == MouseKind::Up {
        shared.button_down.store(false, Ordering::SeqCst);
    }

    match decision {
        RouteDecision::Ignore => {}
        RouteDecision::OpenClickUrl { url } => {
            debug!("[INPUT] Click region hit, opening {url}");
            shell_open_url(&url);
        }
        RouteDecision::Forward { target, kind, x, y } => {
            forward_mouse_event(shared, &target, kind, x, y);
        }
    }
}

fn classify_point(shared: &RouterShared, under: HWND) -> WindowClass {
    if under.is_invalid() {
        return WindowClass::Unknown;
    }

    let ancestor = unsafe { GetAncestor(under, GA_ROOT) };
    let top = if ancestor.is_invalid() { under } else { ancestor };

    let snapshot = snapshot_window(shared, under, top);
    classify_window(&snapshot)
}

fn snapshot_window(shared: &RouterShared, under: HWND, top: HWND) -> WindowSnapshot {
    let style = unsafe { GetWindowLongW(top, GWL_STYLE) } as u32;
    let is_own = shared.dispatcher.is_own_window(raw_from_hwnd(under))
        || shared.dispatcher.is_own_window(raw_from_hwnd(top));

    WindowSnapshot {
        class_name: window_class_name(top),
        has_caption: (style & WS_CAPTION_BITS) == WS_CAPTION_BITS,
        is_popup: (style & WS_POPUP_BIT) != 0,
        visible: unsafe { IsWindowVisible(top) }.as_bool(),
        is_own,
    }
}

fn forward_mouse_event(shared: &RouterShared, target: &DispatchTarget, kind: MouseKind, x: i32, y: i32) {
    let raw_target = if is_live_window(target.input_target_hwnd) {
        target.input_target_hwnd
    } else {
        target.host_hwnd
    };
    if !is_live_window(raw_target) {
        return;
    }

    let hwnd = hwnd_from_raw(raw_target);
    let mut client_pt = POINT { x, y };
    unsafe {
        let _ = ScreenToClient(hwnd, &mut client_pt);
    }

    let lparam = ((client_pt.y as u16 as isize) << 16) | (client_pt.x as u16 as isize);
    let (msg, wparam) = match kind {
        MouseKind::Move => {
            let held = shared.button_down.load(Ordering::SeqCst);
            (WM_MOUSEMOVE, if held { MK_LBUTTON_FLAG } else { 0 })
        }
        MouseKind::Down => (WM_LBUTTONDOWN, MK_LBUTTON_FLAG),
        MouseKind::Up => (WM_LBUTTONUP, 0),
    };

    unsafe {
        let _ = PostMessageW(Some(hwnd), msg, WPARAM(wparam), LPARAM(lparam));
    }
}

/// Locate the deepest renderer child that accepts posted mouse input (the
/// browser engine's widget window). Returns 0 when none exists yet; callers
/// fall back to the host window.
pub fn find_renderer_input_child(host: isize) -> isize {
    unsafe extern "system" fn enum_proc(hwnd: HWND, lparam: LPARAM) -> BOOL {
        let out = &mut *(lparam.0 as *mut isize);
        if window_class_name(hwnd).starts_with("Chrome_RenderWidgetHostHWND") {
            *out = raw_from_hwnd(hwnd);
            return BOOL(0);
        }
        BOOL(1)
    }

    if !is_live_window(host) {
        return 0;
    }

    let mut found: isize = 0;
    unsafe {
        let _ = EnumChildWindows(
            Some(hwnd_from_raw(host)),
            Some(enum_proc),
            LPARAM((&mut found as *mut isize) as isize),
        );
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MonitorBounds;

    fn target(monitor_index: usize) -> DispatchTarget {
        DispatchTarget {
            monitor_index,
            host_hwnd: 0x100,
            input_target_hwnd: 0x200,
            bounds: MonitorBounds {
                left: 0,
                top: 0,
                width: 1920,
                height: 1080,
            },
        }
    }

    fn region(click_url: &str, visible: bool) -> ClickRegion {
        ClickRegion {
            id: "ad".into(),
            src: String::new(),
            click_url: click_url.into(),
            left: 100,
            top: 100,
            width: 300,
            height: 250,
            visible,
        }
    }

    #[test]
    fn classification_buckets() {
        let own = WindowSnapshot {
            class_name: "WebWallHostWindow".into(),
            has_caption: false,
            is_popup: false,
            visible: true,
            is_own: true,
        };
        assert_eq!(classify_window(&own), WindowClass::OwnWindow);

        let shell = WindowSnapshot {
            class_name: "WorkerW".into(),
            has_caption: false,
            is_popup: false,
            visible: true,
            is_own: false,
        };
        assert_eq!(classify_window(&shell), WindowClass::DesktopLayer);

        let chrome_child = WindowSnapshot {
            class_name: "Chrome_RenderWidgetHostHWND".into(),
            has_caption: false,
            is_popup: false,
            visible: true,
            is_own: false,
        };
        assert_eq!(classify_window(&chrome_child), WindowClass::DesktopLayer);

        let app = WindowSnapshot {
            class_name: "Notepad".into(),
            has_caption: true,
            is_popup: false,
            visible: true,
            is_own: false,
        };
        assert_eq!(classify_window(&app), WindowClass::ForegroundApp);

        let hidden_app = WindowSnapshot {
            visible: false,
            ..app.clone()
        };
        assert_eq!(classify_window(&hidden_app), WindowClass::Unknown);
    }

    #[test]
    fn paused_implies_zero_forwarded_events() {
        for kind in [MouseKind::Move, MouseKind::Down, MouseKind::Up] {
            for class in [
                WindowClass::DesktopLayer,
                WindowClass::OwnWindow,
                WindowClass::ForegroundApp,
                WindowClass::Unknown,
            ] {
                let decision = decide_route(
                    true,
                    kind,
                    200,
                    200,
                    class,
                    true,
                    Some(target(0)),
                    &[region("https://go.example", true)],
                );
                assert_eq!(decision, RouteDecision::Ignore);
            }
        }
    }

    #[test]
    fn foreground_app_drops_unless_dragging() {
        let decision = decide_route(
            false,
            MouseKind::Move,
            10,
            10,
            WindowClass::ForegroundApp,
            false,
            Some(target(0)),
            &[],
        );
        assert_eq!(decision, RouteDecision::Ignore);

        // Drag in flight keeps move and up events alive across the app.
        for kind in [MouseKind::Move, MouseKind::Up] {
            let decision = decide_route(
                false,
                kind,
                10,
                10,
                WindowClass::ForegroundApp,
                true,
                Some(target(0)),
                &[],
            );
            assert!(matches!(decision, RouteDecision::Forward { .. }));
        }

        // A fresh press over an app always belongs to the app.
        let decision = decide_route(
            false,
            MouseKind::Down,
            10,
            10,
            WindowClass::ForegroundApp,
            true,
            Some(target(0)),
            &[],
        );
        assert_eq!(decision, RouteDecision::Ignore);
    }

    #[test]
    fn click_region_up_is_terminal() {
        let regions = [region("https://go.example", true)];
        let decision = decide_route(
            false,
            MouseKind::Up,
            150,
            150,
            WindowClass::DesktopLayer,
            true,
            Some(target(0)),
            &regions,
        );
        assert_eq!(
            decision,
            RouteDecision::OpenClickUrl {
                url: "https://go.example".into()
            }
        );

        // Outside the region, or with no URL, the event reaches the page.
        let decision = decide_route(
            false,
            MouseKind::Up,
            50,
            50,
            WindowClass::DesktopLayer,
            true,
            Some(target(0)),
            &regions,
        );
        assert!(matches!(decision, RouteDecision::Forward { .. }));

        let unclickable = [region("", true), region("https://x.example", false)];
        let decision = decide_route(
            false,
            MouseKind::Up,
            150,
            150,
            WindowClass::DesktopLayer,
            true,
            Some(target(0)),
            &unclickable,
        );
        assert!(matches!(decision, RouteDecision::Forward { .. }));

        // Down and move events never hit the region branch.
        let decision = decide_route(
            false,
            MouseKind::Down,
            150,
            150,
            WindowClass::DesktopLayer,
            false,
            Some(target(0)),
            &regions,
        );
        assert!(matches!(decision, RouteDecision::Forward { .. }));
    }

    #[test]
    fn no_target_drops_silently() {
        let decision = decide_route(
            false,
            MouseKind::Move,
            10,
            10,
            WindowClass::DesktopLayer,
            false,
            None,
            &[],
        );
        assert_eq!(decision, RouteDecision::Ignore);
    }

    #[test]
    fn down_state_is_recorded_before_occlusion_decision() {
        // Mirrors the hook's ordering: the swap happens before decide_route,
        // so a press over a covering window still arms the drag state and a
        // subsequent move over that window forwards.
        let button_down = AtomicBool::new(false);

        let held_before = button_down.swap(true, Ordering::SeqCst);
        let down_decision = decide_route(
            false,
            MouseKind::Down,
            10,
            10,
            WindowClass::ForegroundApp,
            held_before,
            Some(target(0)),
            &[],
        );
        assert_eq!(down_decision, RouteDecision::Ignore);
        assert!(button_down.load(Ordering::SeqCst));

        let move_decision = decide_route(
            false,
            MouseKind::Move,
            12,
            12,
            WindowClass::ForegroundApp,
            button_down.load(Ordering::SeqCst),
            Some(target(0)),
            &[],
        );
        assert!(matches!(move_decision, RouteDecision::Forward { .. }));
    }
}
