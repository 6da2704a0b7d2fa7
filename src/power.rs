use std::{collections::BTreeSet, time::Duration};

use windows::Win32::{
    Foundation::RECT,
    Graphics::Gdi::{GetMonitorInfoW, MonitorFromWindow, MONITORINFO, MONITOR_DEFAULTTONEAREST},
    System::SystemInformation::GetTickCount,
    UI::Input::KeyboardAndMouse::{GetLastInputInfo, LASTINPUTINFO},
    UI::WindowsAndMessaging::{
        GetForegroundWindow, GetParent, GetWindowLongW, GetWindowRect, GWL_STYLE,
    },
};

use crate::{
    events::SystemEvent,
    input::is_desktop_layer_class,
    registry::WallpaperInstance,
    utility::{hwnd_from_raw, is_live_window, raw_from_hwnd, window_class_name},
};

const WS_CAPTION_BITS: u32 = 0x00C0_0000;

/// Why rendering is currently suspended. The *reason* is tracked, not just a
/// boolean: automatic resume must never override a manual pause, and vice
/// versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PauseReason {
    Manual,
    Idle,
    Fullscreen,
    ScreenOff,
    Locked,
    SessionAway,
}

/// Side effects the coordinator requests from its owner. Transitions are the
/// only source of these; reading the state itself never produces any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineAction {
    /// First pause reason appeared: hide/stop rendering, cheap and
    /// reversible, without destroying instances.
    Pause(PauseReason),
    /// A pause reason cleared; resume only if no reasons remain.
    Resume(PauseReason),
    /// Console/remote switch or resume-from-suspend: embedded windows may
    /// have been silently invalidated and must be checked (and rebuilt if
    /// so) before rendering continues.
    ValidateInstances,
}

/// Session/power state machine. Pure transitions; the controller applies
/// the returned actions on the command thread.
#[derive(Default)]
pub struct SessionPowerCoordinator {
    reasons: BTreeSet<PauseReason>,
    session_locked: bool,
    remote_session: bool,
}

impl SessionPowerCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derived predicate: active unless some pause reason holds. Reading it
    /// has no side effects.
    pub fn should_be_active(&self) -> bool {
        self.reasons.is_empty()
    }

    pub fn is_paused_for(&self, reason: PauseReason) -> bool {
        self.reasons.contains(&reason)
    }

    pub fn session_locked(&self) -> bool {
        self.session_locked
    }

    pub fn remote_session(&self) -> bool {
        self.remote_session
    }

    pub fn handle_event(&mut self, event: &SystemEvent) -> Vec<EngineAction> {
        match event {
            SystemEvent::SessionLocked => {
                self.session_locked = true;
                self.add_reason(PauseReason::Locked)
            }
            SystemEvent::SessionUnlocked => {
                self.session_locked = false;
                // Fast path: plain visibility resume, no validation, no
                // shell re-locate.
                self.remove_reason(PauseReason::Locked, false)
            }
            SystemEvent::RemoteConnected => {
                self.remote_session = true;
                self.remove_reason(PauseReason::SessionAway, true)
            }
            SystemEvent::RemoteDisconnected => {
                self.remote_session = false;
                self.add_reason(PauseReason::SessionAway)
            }
            SystemEvent::ConsoleConnected => {
                self.remote_session = false;
                self.remove_reason(PauseReason::SessionAway, true)
            }
            SystemEvent::ConsoleDisconnected => self.add_reason(PauseReason::SessionAway),
            SystemEvent::Suspending => self.add_reason(PauseReason::ScreenOff),
            SystemEvent::Resumed => self.remove_reason(PauseReason::ScreenOff, true),
            SystemEvent::DisplayChanged => Vec::new(),
        }
    }

    /// Feed from the periodic idle/fullscreen poll. Manual pause is never
    /// touched here.
    pub fn poll_conditions(&mut self, idle: bool, fullscreen: bool) -> Vec<EngineAction> {
        let mut actions = Vec::new();
        actions.extend(self.set_condition(PauseReason::Idle, idle));
        actions.extend(self.set_condition(PauseReason::Fullscreen, fullscreen));
        actions
    }

    pub fn pause_manual(&mut self) -> Vec<EngineAction> {
        self.add_reason(PauseReason::Manual)
    }

    pub fn resume_manual(&mut self) -> Vec<EngineAction> {
        self.remove_reason(PauseReason::Manual, false)
    }

    fn set_condition(&mut self, reason: PauseReason, active: bool) -> Vec<EngineAction> {
        if active {
            self.add_reason(reason)
        } else {
            self.remove_reason(reason, false)
        }
    }

    fn add_reason(&mut self, reason: PauseReason) -> Vec<EngineAction> {
        if self.reasons.insert(reason) {
            vec![EngineAction::Pause(reason)]
        } else {
            Vec::new()
        }
    }

    fn remove_reason(&mut self, reason: PauseReason, validate: bool) -> Vec<EngineAction> {
        if !self.reasons.remove(&reason) {
            return Vec::new();
        }
        let mut actions = Vec::new();
        if validate {
            actions.push(EngineAction::ValidateInstances);
        }
        actions.push(EngineAction::Resume(reason));
        actions
    }
}

/* =========================
   WIN32 PROBES
   ========================= */

/// Time since the last user input, from the system-wide input timestamp.
pub fn system_idle_duration() -> Duration {
    let mut info = LASTINPUTINFO {
        cbSize: std::mem::size_of::<LASTINPUTINFO>() as u32,
        dwTime: 0,
    };
    unsafe {
        if !GetLastInputInfo(&mut info).as_bool() {
            return Duration::ZERO;
        }
        let elapsed_ms = GetTickCount().wrapping_sub(info.dwTime);
        Duration::from_millis(elapsed_ms as u64)
    }
}

/// True when the foreground window fully covers its monitor and is not a
/// desktop/shell window. Borderless-fullscreen apps have no caption;
/// maximized ordinary windows keep theirs and don't count.
pub fn foreground_fullscreen() -> bool {
    unsafe {
        let fg = GetForegroundWindow();
        if fg.is_invalid() {
            return false;
        }

        if is_desktop_layer_class(&window_class_name(fg)) {
            return false;
        }

        let mut rc = RECT::default();
        if GetWindowRect(fg, &mut rc).is_err() {
            return false;
        }

        let monitor = MonitorFromWindow(fg, MONITOR_DEFAULTTONEAREST);
        let mut mi = MONITORINFO {
            cbSize: std::mem::size_of::<MONITORINFO>() as u32,
            ..Default::default()
        };
        if !GetMonitorInfoW(monitor, &mut mi).as_bool() {
            return false;
        }

        let m = mi.rcMonitor;
        let tol = 2;
        let covers_monitor = rc.left <= m.left + tol
            && rc.top <= m.top + tol
            && rc.right >= m.right - tol
            && rc.bottom >= m.bottom - tol;
        if !covers_monitor {
            return false;
        }

        let style = GetWindowLongW(fg, GWL_STYLE) as u32;
        (style & WS_CAPTION_BITS) != WS_CAPTION_BITS
    }
}

/// Check every instance's embedded window: still alive and still parented
/// into its shell layer. Returns the monitor indexes that failed; any entry
/// means a forced rebuild is needed. Common after long suspends and session
/// switches, where the OS silently tears the hierarchy apart.
pub fn find_invalid_instances(instances: &[WallpaperInstance]) -> Vec<usize> {
    let mut invalid = Vec::new();
    for instance in instances {
        if !instance_window_valid(instance) {
            invalid.push(instance.monitor_index);
        }
    }
    invalid
}

fn instance_window_valid(instance: &WallpaperInstance) -> bool {
    if !is_live_window(instance.host_hwnd) {
        return false;
    }
    if !is_live_window(instance.shell_layer_hwnd) {
        return false;
    }
    match unsafe { GetParent(hwnd_from_raw(instance.host_hwnd)) } {
        Ok(parent) => raw_from_hwnd(parent) == instance.shell_layer_hwnd,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pause_count(actions: &[EngineAction]) -> usize {
        actions
            .iter()
            .filter(|a| matches!(a, EngineAction::Pause(_)))
            .count()
    }

    #[test]
    fn lock_unlock_uses_fast_path() {
        let mut coordinator = SessionPowerCoordinator::new();
        assert!(coordinator.should_be_active());

        let actions = coordinator.handle_event(&SystemEvent::SessionLocked);
        assert_eq!(actions, vec![EngineAction::Pause(PauseReason::Locked)]);
        assert!(!coordinator.should_be_active());
        assert!(coordinator.session_locked());

        // Unlock resumes without any validation step.
        let actions = coordinator.handle_event(&SystemEvent::SessionUnlocked);
        assert_eq!(actions, vec![EngineAction::Resume(PauseReason::Locked)]);
        assert!(coordinator.should_be_active());
        assert!(!coordinator.session_locked());
    }

    #[test]
    fn remote_reconnect_validates_before_resume() {
        let mut coordinator = SessionPowerCoordinator::new();

        let actions = coordinator.handle_event(&SystemEvent::RemoteDisconnected);
        assert_eq!(actions, vec![EngineAction::Pause(PauseReason::SessionAway)]);
        assert!(!coordinator.should_be_active());

        let actions = coordinator.handle_event(&SystemEvent::RemoteConnected);
        assert_eq!(
            actions,
            vec![
                EngineAction::ValidateInstances,
                EngineAction::Resume(PauseReason::SessionAway),
            ]
        );
        assert!(coordinator.should_be_active());
        assert!(coordinator.remote_session());
    }

    #[test]
    fn resume_from_suspend_validates() {
        let mut coordinator = SessionPowerCoordinator::new();
        coordinator.handle_event(&SystemEvent::Suspending);
        assert!(coordinator.is_paused_for(PauseReason::ScreenOff));

        let actions = coordinator.handle_event(&SystemEvent::Resumed);
        assert!(actions.contains(&EngineAction::ValidateInstances));
    }

    #[test]
    fn manual_pause_survives_automatic_resume() {
        let mut coordinator = SessionPowerCoordinator::new();
        coordinator.pause_manual();
        coordinator.poll_conditions(true, false);
        assert!(!coordinator.should_be_active());

        // Idle clears, manual still holds.
        let actions = coordinator.poll_conditions(false, false);
        assert_eq!(actions, vec![EngineAction::Resume(PauseReason::Idle)]);
        assert!(!coordinator.should_be_active());

        let actions = coordinator.resume_manual();
        assert_eq!(actions, vec![EngineAction::Resume(PauseReason::Manual)]);
        assert!(coordinator.should_be_active());
    }

    #[test]
    fn automatic_pause_survives_manual_resume() {
        let mut coordinator = SessionPowerCoordinator::new();
        coordinator.poll_conditions(false, true);
        coordinator.pause_manual();

        coordinator.resume_manual();
        assert!(!coordinator.should_be_active());
        assert!(coordinator.is_paused_for(PauseReason::Fullscreen));
    }

    #[test]
    fn duplicate_reasons_produce_no_duplicate_actions() {
        let mut coordinator = SessionPowerCoordinator::new();
        let first = coordinator.handle_event(&SystemEvent::SessionLocked);
        let second = coordinator.handle_event(&SystemEvent::SessionLocked);
        assert_eq!(pause_count(&first), 1);
        assert_eq!(pause_count(&second), 0);

        // Removing a reason that is not held resumes nothing.
        let mut fresh = SessionPowerCoordinator::new();
        assert!(fresh.handle_event(&SystemEvent::SessionUnlocked).is_empty());
        assert!(fresh.resume_manual().is_empty());
    }

    #[test]
    fn predicate_reads_are_side_effect_free() {
        let mut coordinator = SessionPowerCoordinator::new();
        coordinator.handle_event(&SystemEvent::SessionLocked);
        assert_eq!(coordinator.should_be_active(), coordinator.should_be_active());
        assert!(coordinator.is_paused_for(PauseReason::Locked));
        assert!(coordinator.is_paused_for(PauseReason::Locked));
    }

    #[test]
    fn display_change_is_not_a_power_transition() {
        let mut coordinator = SessionPowerCoordinator::new();
        assert!(coordinator.handle_event(&SystemEvent::DisplayChanged).is_empty());
        assert!(coordinator.should_be_active());
    }
}
