use std::sync::{
    mpsc::{self, Receiver, Sender},
    Mutex, OnceLock,
};

use windows::{
    core::PCWSTR,
    Win32::{
        Foundation::{HINSTANCE, HWND, LPARAM, LRESULT, WPARAM},
        System::LibraryLoader::GetModuleHandleW,
        System::RemoteDesktop::{
            WTSRegisterSessionNotification, WTSUnRegisterSessionNotification,
            NOTIFY_FOR_THIS_SESSION,
        },
        UI::WindowsAndMessaging::{
            CreateWindowExW, DefWindowProcW, DestroyWindow, RegisterClassW, WINDOW_EX_STYLE,
            WNDCLASSW, WS_POPUP,
        },
    },
};

use crate::{
    debug,
    utility::{hwnd_from_raw, is_live_window, raw_from_hwnd},
    warn,
};

const EVENT_CLASS_NAME: PCWSTR = windows::core::w!("WebWallEventWindow");

// Broadcast messages and codes, spelled out because the windows-rs feature
// set in use does not surface all of them.
const WM_DISPLAYCHANGE: u32 = 0x007E;
const WM_POWERBROADCAST: u32 = 0x0218;
const WM_WTSSESSION_CHANGE: u32 = 0x02B1;

const PBT_APMSUSPEND: usize = 0x4;
const PBT_APMRESUMESUSPEND: usize = 0x7;
const PBT_APMRESUMEAUTOMATIC: usize = 0x12;

const WTS_CONSOLE_CONNECT: usize = 0x1;
const WTS_CONSOLE_DISCONNECT: usize = 0x2;
const WTS_REMOTE_CONNECT: usize = 0x3;
const WTS_REMOTE_DISCONNECT: usize = 0x4;
const WTS_SESSION_LOCK: usize = 0x7;
const WTS_SESSION_UNLOCK: usize = 0x8;

/// OS notifications relevant to the wallpaper lifecycle, translated out of
/// the wndproc into plain values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemEvent {
    DisplayChanged,
    SessionLocked,
    SessionUnlocked,
    ConsoleConnected,
    ConsoleDisconnected,
    RemoteConnected,
    RemoteDisconnected,
    Suspending,
    Resumed,
}

static EVENT_TX: Mutex<Option<Sender<SystemEvent>>> = Mutex::new(None);

/// Hidden top-level window that receives display/session/power broadcasts.
/// The wndproc only enqueues events; all handling happens when the command
/// loop drains the channel, never re-entrantly inside the notification.
pub struct EventWindow {
    hwnd: isize,
    rx: Receiver<SystemEvent>,
}

impl EventWindow {
    pub fn create() -> Result<Self, String> {
        ensure_event_class()?;

        let hinstance = unsafe {
            GetModuleHandleW(None)
                .map(|h| HINSTANCE(h.0))
                .map_err(|e| format!("GetModuleHandleW failed: {e:?}"))?
        };

        let (tx, rx) = mpsc::channel::<SystemEvent>();
        *EVENT_TX.lock().unwrap() = Some(tx);

        // A real (but never shown) top-level window: message-only windows do
        // not receive broadcast messages.
        let hwnd = unsafe {
            CreateWindowExW(
                WINDOW_EX_STYLE(0),
                EVENT_CLASS_NAME,
                PCWSTR::null(),
                WS_POPUP,
                0,
                0,
                0,
                0,
                None,
                None,
                Some(hinstance),
                None,
            )
        }
        .map_err(|e| format!("CreateWindowExW failed for event window: {e:?}"))?;

        unsafe {
            if WTSRegisterSessionNotification(hwnd, NOTIFY_FOR_THIS_SESSION).is_err() {
                warn!("[EVENTS] WTSRegisterSessionNotification failed; lock/remote events unavailable");
            }
        }

        Ok(Self {
            hwnd: raw_from_hwnd(hwnd),
            rx,
        })
    }

    pub fn drain(&self) -> Vec<SystemEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn destroy(&self) {
        if is_live_window(self.hwnd) {
            unsafe {
                let _ = WTSUnRegisterSessionNotification(hwnd_from_raw(self.hwnd));
                let _ = DestroyWindow(hwnd_from_raw(self.hwnd));
            }
        }
        *EVENT_TX.lock().unwrap() = None;
    }
}

fn ensure_event_class() -> Result<(), String> {
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
        lpfnWndProc: Some(event_window_proc),
        hInstance: hinstance,
        lpszClassName: EVENT_CLASS_NAME,
        ..Default::default()
    };

    unsafe {
        let _ = RegisterClassW(&wc);
    }

    let _ = CLASS_ONCE.set(true);
    Ok(())
}

fn enqueue(event: SystemEvent) {
    debug!("[EVENTS] {event:?}");
    if let Ok(guard) = EVENT_TX.lock() {
        if let Some(tx) = guard.as_ref() {
            let _ = tx.send(event);
        }
    }
}

unsafe extern "system" fn event_window_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    match msg {
        WM_DISPLAYCHANGE => {
            enqueue(SystemEvent::DisplayChanged);
            LRESULT(0)
        }
        WM_WTSSESSION_CHANGE => {
            match wparam.0 {
                WTS_SESSION_LOCK => enqueue(SystemEvent::SessionLocked),
                WTS_SESSION_UNLOCK => enqueue(SystemEvent::SessionUnlocked),
                WTS_CONSOLE_CONNECT => enqueue(SystemEvent::ConsoleConnected),
                WTS_CONSOLE_DISCONNECT => enqueue(SystemEvent::ConsoleDisconnected),
                WTS_REMOTE_CONNECT => enqueue(SystemEvent::RemoteConnected),
                WTS_REMOTE_DISCONNECT => enqueue(SystemEvent::RemoteDisconnected),
                _ => {}
            }
            LRESULT(0)
        }
        WM_POWERBROADCAST => {
            match wparam.0 {
                PBT_APMSUSPEND => enqueue(SystemEvent::Suspending),
                PBT_APMRESUMESUSPEND | PBT_APMRESUMEAUTOMATIC => enqueue(SystemEvent::Resumed),
                _ => {}
            }
            LRESULT(1)
        }
        _ => DefWindowProcW(hwnd, msg, wparam, lparam),
    }
}
