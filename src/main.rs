#![windows_subsystem = "windows"]

mod controller;
mod data_loaders;
mod dispatcher;
mod display;
mod events;
mod host_window;
mod input;
mod logging;
mod messages;
mod monitors;
mod paths;
mod power;
mod registry;
mod renderer;
mod shell_layer;
mod state_store;
mod tracker;
mod utility;

use std::{
    fs,
    sync::Arc,
    thread,
    time::{Duration, Instant, SystemTime},
};

use windows::Win32::System::Com::{CoInitializeEx, COINIT_APARTMENTTHREADED};
use windows::Win32::UI::HiDpi::{
    SetProcessDpiAwarenessContext, DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2,
};
use windows::Win32::UI::WindowsAndMessaging::{
    DispatchMessageW, PeekMessageW, TranslateMessage, MSG, PM_REMOVE, WM_QUIT,
};

use crate::{
    controller::WallpaperController,
    data_loaders::config::{self, AppConfig},
    events::{EventWindow, SystemEvent},
    state_store::FileStateStore,
};

pub const APP_NAME: &str = "webwall";
pub const DEBUG_NAME: &str = "WEBWALL";

fn enable_per_monitor_dpi_awareness() {
    unsafe {
        if SetProcessDpiAwarenessContext(DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2).is_err() {
            warn!(
                "[{}] Failed to set process DPI awareness to PerMonitorV2; monitor sizes may be scaled",
                DEBUG_NAME
            );
        }
    }
}

fn main() -> windows::core::Result<()> {
    logging::init("warn");

    let config_path = paths::config_path();
    config::scaffold_default(&config_path);
    let mut config = AppConfig::load(&config_path).unwrap_or_default();
    logging::set_level(&config.log_level);

    std::panic::set_hook(Box::new(|panic_info| {
        error!("[{}] Panic: {}", DEBUG_NAME, panic_info);
    }));

    enable_per_monitor_dpi_awareness();
    unsafe {
        let _ = CoInitializeEx(None, COINIT_APARTMENTTHREADED);
    }

    info!("!---------- [{}] Starting web wallpaper host ----------!", DEBUG_NAME);
    info!("[{}] Config loaded from {}", DEBUG_NAME, config_path.display());

    let store = Arc::new(FileStateStore::open(paths::state_path()));
    let mut controller = WallpaperController::new(store, config.settings.pausing.clone());

    let event_window = match EventWindow::create() {
        Ok(window) => Some(window),
        Err(e) => {
            warn!("[{}] Event window unavailable ({e}); session/power events disabled", DEBUG_NAME);
            None
        }
    };

    controller.apply_config(&config);

    let mut loop_sleep = Duration::from_millis(config.settings.runtime.tick_sleep_ms.max(1));
    let mut reconcile_debounce =
        Duration::from_millis(config.settings.runtime.reconcile_debounce_ms);
    let mut watcher_enabled = config.settings.watcher.enabled;
    let mut watcher_interval = Duration::from_millis(config.settings.watcher.interval_ms.max(100));
    let mut pause_check_interval =
        Duration::from_millis(config.settings.pausing.check_interval_ms.max(100));

    let mut last_watch_tick = Instant::now();
    let mut last_pause_check = Instant::now();
    let mut last_layout_check = Instant::now();
    let layout_check_interval = Duration::from_secs(2);
    let mut pending_reconcile_at: Option<Instant> = None;
    let mut last_config_modified: Option<SystemTime> = fs::metadata(&config_path)
        .and_then(|m| m.modified())
        .ok();

    loop {
        unsafe {
            let mut msg = MSG::default();
            while PeekMessageW(&mut msg, None, 0, 0, PM_REMOVE).as_bool() {
                if msg.message == WM_QUIT {
                    warn!("[{}] WM_QUIT received — shutting down", DEBUG_NAME);
                    controller.shutdown();
                    if let Some(window) = &event_window {
                        window.destroy();
                    }
                    return Ok(());
                }
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }

        if let Some(window) = &event_window {
            for event in window.drain() {
                match event {
                    SystemEvent::DisplayChanged => {
                        // The OS fires this before the hardware settles;
                        // debounce before reconciling.
                        pending_reconcile_at = Some(Instant::now() + reconcile_debounce);
                    }
                    other => controller.handle_system_event(&other),
                }
            }
        }

        if let Some(when) = pending_reconcile_at {
            if Instant::now() >= when {
                pending_reconcile_at = None;
                controller.reconcile_displays();
            }
        }

        // Catches layout changes whose broadcast never reached the event
        // window (seen after some driver resets).
        if last_layout_check.elapsed() >= layout_check_interval {
            last_layout_check = Instant::now();
            if pending_reconcile_at.is_none() && controller.monitors_changed() {
                warn!("[{}] Monitor layout drift detected by poll — reconciling", DEBUG_NAME);
                controller.reconcile_displays();
            }
        }

        if last_pause_check.elapsed() >= pause_check_interval {
            last_pause_check = Instant::now();
            controller.poll_pause_conditions();
        }

        if watcher_enabled && last_watch_tick.elapsed() >= watcher_interval {
            last_watch_tick = Instant::now();

            let current_modified = fs::metadata(&config_path)
                .and_then(|m| m.modified())
                .ok();

            let changed = match (last_config_modified, current_modified) {
                (Some(prev), Some(curr)) => curr > prev,
                (None, Some(_)) => true,
                _ => false,
            };

            if changed {
                match AppConfig::load(&config_path) {
                    Some(new_config) => {
                        config = new_config;
                        logging::set_level(&config.log_level);
                        controller.apply_config(&config);
                        loop_sleep =
                            Duration::from_millis(config.settings.runtime.tick_sleep_ms.max(1));
                        reconcile_debounce =
                            Duration::from_millis(config.settings.runtime.reconcile_debounce_ms);
                        watcher_enabled = config.settings.watcher.enabled;
                        watcher_interval =
                            Duration::from_millis(config.settings.watcher.interval_ms.max(100));
                        pause_check_interval = Duration::from_millis(
                            config.settings.pausing.check_interval_ms.max(100),
                        );
                        warn!(
                            "[{}][WATCHER] Reloaded config from {}",
                            DEBUG_NAME,
                            config_path.display()
                        );
                    }
                    None => {
                        warn!(
                            "[{}][WATCHER] Detected config change but failed to parse {}; keeping previous config",
                            DEBUG_NAME,
                            config_path.display()
                        );
                    }
                }

                last_config_modified = current_modified;
            }
        }

        thread::sleep(loop_sleep);
    }
}
