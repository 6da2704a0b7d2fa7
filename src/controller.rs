use std::{rc::Rc, sync::Arc, time::Duration};

use crate::{
    data_loaders::config::{AppConfig, PausingSettings},
    debug, dispatcher::EventDispatcher,
    display::{plan_reconcile, ActiveInstance},
    error,
    events::SystemEvent,
    host_window, info,
    input::{find_renderer_input_child, InputRouter},
    messages::{parse_page_message, PageMessage},
    monitors::{self, MonitorInfo},
    power::{self, EngineAction, PauseReason, SessionPowerCoordinator},
    registry::{InstanceRegistry, MonitorBounds, WallpaperInstance},
    renderer::{MessageHandler, RendererHost, RendererPhase},
    shell_layer::{self, ShellLayerInfo},
    state_store::{transparency_key, StateStore, KEY_DEFAULT_URL},
    tracker::ResourceTracker,
    utility::shell_open_url,
    warn,
};

const SHELL_LOCATE_TIMEOUT: Duration = Duration::from_secs(2);
const TEARDOWN_WAIT: Duration = Duration::from_millis(500);

/// Schemes the host will navigate to or open externally. Everything else is
/// rejected at the command boundary.
const ALLOWED_SCHEMES: &[&str] = &["http", "https", "file"];

pub fn url_allowed(url: &str) -> bool {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return false;
    }
    match trimmed.split_once("://") {
        Some((scheme, rest)) => {
            !rest.is_empty() && ALLOWED_SCHEMES.contains(&scheme.to_ascii_lowercase().as_str())
        }
        None => false,
    }
}

/// The host-facing command surface. Owns the renderer map (command-thread
/// COM affinity) and coordinates the shared registry, dispatcher cache,
/// input router and power state machine. Every host-visible operation
/// returns a boolean; no panic crosses this boundary.
pub struct WallpaperController {
    registry: Arc<InstanceRegistry>,
    dispatcher: Arc<EventDispatcher>,
    tracker: Arc<ResourceTracker>,
    router: Arc<InputRouter>,
    renderers: RendererHost,
    store: Arc<dyn StateStore>,
    coordinator: SessionPowerCoordinator,
    pausing: PausingSettings,
}

impl WallpaperController {
    pub fn new(store: Arc<dyn StateStore>, pausing: PausingSettings) -> Self {
        let registry = Arc::new(InstanceRegistry::new());
        let dispatcher = Arc::new(EventDispatcher::new());
        let router = Arc::new(InputRouter::new(registry.clone(), dispatcher.clone()));

        // Last instance gone: the global hook has nothing left to serve and
        // remembered default-URL state must not leak into the next start.
        {
            let router = router.clone();
            let store = store.clone();
            registry.set_on_empty(Box::new(move || {
                router.release();
                store.clear();
            }));
        }

        Self {
            registry,
            dispatcher,
            tracker: Arc::new(ResourceTracker::new()),
            router,
            renderers: RendererHost::new(),
            store,
            coordinator: SessionPowerCoordinator::new(),
            pausing,
        }
    }

    pub fn set_pausing_settings(&mut self, pausing: PausingSettings) {
        self.pausing = pausing;
    }

    /* =========================
       COMMAND SURFACE
       ========================= */

    /// Start the wallpaper on every monitor. True when at least one monitor
    /// came up.
    pub fn initialize_wallpaper(&mut self, url: &str, transparent: bool) -> bool {
        let monitors = self.refresh_monitors();
        let indexes: Vec<usize> = monitors.iter().map(|m| m.index).collect();
        let mut any = false;
        for index in indexes {
            any |= self.initialize_wallpaper_on_monitor(url, transparent, index);
        }
        any
    }

    pub fn initialize_wallpaper_on_monitor(
        &mut self,
        url: &str,
        transparent: bool,
        monitor_index: usize,
    ) -> bool {
        if !url_allowed(url) {
            warn!("[CONTROLLER] Rejecting initialize with disallowed url '{url}'");
            return false;
        }

        let monitors = self.refresh_monitors();
        let Some(monitor) = monitors.iter().find(|m| m.index == monitor_index).cloned() else {
            warn!("[CONTROLLER] No monitor with index {monitor_index}");
            return false;
        };

        // Re-initializing an active monitor: stop the old instance first and
        // wait for its window to actually die, so the replacement never
        // coexists with a ghost.
        if let Some(existing) = self.registry.get_for_monitor(monitor_index) {
            let old_host = existing.host_hwnd;
            self.cleanup_instance(monitor_index);
            if !host_window::wait_for_destroyed(old_host, TEARDOWN_WAIT) {
                warn!(
                    "[CONTROLLER] Old host window {old_host:#x} still alive after teardown wait"
                );
            }
        }

        let shell = match shell_layer::locate(SHELL_LOCATE_TIMEOUT) {
            Ok(shell) => shell,
            Err(e) => {
                error!("[CONTROLLER] Shell layer unavailable: {e}");
                return false;
            }
        };

        match self.embed_on_monitor(url, transparent, &monitor, &shell) {
            Ok(()) => {
                info!(
                    "[CONTROLLER] Wallpaper up on monitor {} ({})",
                    monitor.index, monitor.device_name
                );
                self.store.put(KEY_DEFAULT_URL, url);
                self.store.put(
                    &transparency_key(&monitor.device_name),
                    if transparent { "true" } else { "false" },
                );
                true
            }
            Err(e) => {
                error!(
                    "[CONTROLLER] Failed to embed on monitor {}: {e}",
                    monitor.index
                );
                false
            }
        }
    }

    pub fn stop_wallpaper(&mut self) -> bool {
        let indexes: Vec<usize> = self
            .registry
            .snapshot()
            .iter()
            .map(|i| i.monitor_index)
            .collect();
        for index in indexes {
            self.cleanup_instance(index);
        }
        self.renderers.close_all();
        // A cached environment may be stale after a session switch; the next
        // initialize must get a fresh one.
        self.renderers.invalidate_environment();
        true
    }

    pub fn stop_wallpaper_on_monitor(&mut self, monitor_index: usize) -> bool {
        let stopped = self.cleanup_instance(monitor_index);
        if self.registry.instance_count() == 0 {
            self.renderers.invalidate_environment();
        }
        stopped
    }

    pub fn navigate_to_url(&mut self, url: &str) -> bool {
        let indexes: Vec<usize> = self
            .registry
            .snapshot()
            .iter()
            .map(|i| i.monitor_index)
            .collect();
        let mut any = false;
        for index in indexes {
            any |= self.navigate_to_url_on_monitor(url, index);
        }
        any
    }

    pub fn navigate_to_url_on_monitor(&mut self, url: &str, monitor_index: usize) -> bool {
        if !url_allowed(url) {
            warn!("[CONTROLLER] Rejecting navigate with disallowed url '{url}'");
            return false;
        }
        let Some(instance) = self.registry.get_for_monitor(monitor_index) else {
            return false;
        };

        if !self.renderers.navigate(instance.renderer_id, url) {
            return false;
        }
        self.registry.set_url(monitor_index, url);
        self.store.put(KEY_DEFAULT_URL, url);
        true
    }

    pub fn get_monitors(&mut self) -> Vec<MonitorInfo> {
        self.refresh_monitors()
    }

    pub fn pause_wallpaper(&mut self) {
        if self.coordinator.is_paused_for(PauseReason::Manual) {
            return;
        }
        let actions = self.coordinator.pause_manual();
        self.apply_actions(actions);
    }

    pub fn resume_wallpaper(&mut self) {
        let actions = self.coordinator.resume_manual();
        self.apply_actions(actions);
    }

    pub fn set_interactive_on_monitor(&mut self, interactive: bool, monitor_index: usize) -> bool {
        let Some(instance) = self.registry.get_for_monitor(monitor_index) else {
            return false;
        };
        if !host_window::set_interactive(instance.host_hwnd, interactive) {
            return false;
        }
        self.registry
            .set_mouse_transparent(monitor_index, !interactive);
        self.store.put(
            &transparency_key(&instance.device_name),
            if interactive { "false" } else { "true" },
        );
        true
    }

    /* =========================
       CONFIG-DRIVEN APPLY
       ========================= */

    /// Tear down and relaunch everything from a (re)loaded config.
    pub fn apply_config(&mut self, config: &AppConfig) {
        self.set_pausing_settings(config.settings.pausing.clone());
        self.stop_wallpaper();

        let monitors = self.refresh_monitors();
        for profile in config.enabled_wallpapers() {
            let targets: Vec<usize> =
                monitors::resolve_monitor_selectors(&monitors, &profile.monitor_index)
                    .iter()
                    .map(|m| m.index)
                    .collect();
            if targets.is_empty() {
                warn!(
                    "[CONTROLLER] Section '{}' resolved no monitors",
                    profile.section
                );
                continue;
            }
            for index in targets {
                self.initialize_wallpaper_on_monitor(&profile.url, !profile.interactive, index);
            }
        }
    }

    /* =========================
       SYSTEM EVENTS & POLLING
       ========================= */

    pub fn handle_system_event(&mut self, event: &SystemEvent) {
        let actions = self.coordinator.handle_event(event);
        debug!(
            "[CONTROLLER] {event:?}: locked={} remote={} active={}",
            self.coordinator.session_locked(),
            self.coordinator.remote_session(),
            self.coordinator.should_be_active()
        );
        self.apply_actions(actions);
    }

    /// Periodic idle/fullscreen evaluation; called from the command loop on
    /// the configured cadence, never from the notification handlers.
    pub fn poll_pause_conditions(&mut self) {
        if self.registry.instance_count() == 0 {
            return;
        }

        let idle = self.pausing.idle
            && power::system_idle_duration()
                >= Duration::from_secs(self.pausing.idle_timeout_secs);
        let fullscreen = self.pausing.fullscreen && power::foreground_fullscreen();

        let actions = self.coordinator.poll_conditions(idle, fullscreen);
        self.apply_actions(actions);
        self.refresh_input_targets();
    }

    /// Re-resolve each instance's renderer input child; the browser engine
    /// recreates its widget windows across navigations.
    fn refresh_input_targets(&mut self) {
        let mut changed = false;
        for instance in self.registry.snapshot() {
            match self.renderers.phase(instance.renderer_id) {
                // The widget window only exists once navigation finished.
                Some(RendererPhase::Ready) => {}
                Some(RendererPhase::Failed) => {
                    warn!(
                        "[CONTROLLER] Renderer {} failed navigation; retrying {}",
                        instance.renderer_id, instance.url
                    );
                    self.renderers.navigate(instance.renderer_id, &instance.url);
                    continue;
                }
                _ => continue,
            }
            let discovered = find_renderer_input_child(instance.host_hwnd);
            let target = if discovered != 0 {
                discovered
            } else {
                instance.host_hwnd
            };
            if target != instance.input_target_hwnd {
                self.registry.set_input_target(instance.monitor_index, target);
                changed = true;
            }
        }
        if changed {
            self.dispatcher.rebuild(&self.registry.snapshot());
        }
    }

    fn apply_actions(&mut self, actions: Vec<EngineAction>) {
        if actions.is_empty() {
            return;
        }

        for action in &actions {
            match action {
                EngineAction::ValidateInstances => self.validate_and_rebuild(),
                EngineAction::Pause(reason) => {
                    info!("[CONTROLLER] Pausing ({reason:?})");
                }
                EngineAction::Resume(reason) => {
                    info!("[CONTROLLER] Resuming ({reason:?})");
                }
            }
        }

        let active = self.coordinator.should_be_active();
        // Fast path: visibility toggle plus page signal, no window handles.
        self.renderers.set_all_visible(active);
        self.router.set_paused(!active);
    }

    /// Proactive invalid-state detection. Window handles can be silently
    /// invalidated across suspends and session switches; if any instance
    /// fails validation the whole set is rebuilt from remembered settings.
    fn validate_and_rebuild(&mut self) {
        let snapshot = self.registry.snapshot();
        if snapshot.is_empty() {
            return;
        }

        let invalid = power::find_invalid_instances(&snapshot);
        if invalid.is_empty() {
            debug!("[CONTROLLER] All instance windows validated OK");
            return;
        }

        warn!(
            "[CONTROLLER] {} of {} instance window(s) invalidated; forcing rebuild",
            invalid.len(),
            snapshot.len()
        );
        self.rebuild_all(snapshot);
    }

    fn rebuild_all(&mut self, remembered: Vec<WallpaperInstance>) {
        // Capture settings before teardown; the registry empties (and the
        // empty-signal clears the store), so the snapshot is the source of
        // truth here.
        let settings: Vec<(String, String, bool)> = remembered
            .iter()
            .map(|i| (i.device_name.clone(), i.url.clone(), i.mouse_transparent))
            .collect();

        for instance in &remembered {
            self.cleanup_instance(instance.monitor_index);
        }
        self.renderers.close_all();
        self.renderers.invalidate_environment();

        // Re-locate the shell layer from scratch; the old info is void after
        // a session switch.
        let shell = match shell_layer::locate(SHELL_LOCATE_TIMEOUT) {
            Ok(shell) => shell,
            Err(e) => {
                error!("[CONTROLLER] Rebuild aborted, shell layer unavailable: {e}");
                return;
            }
        };

        let monitors = self.refresh_monitors();
        for (device_name, url, transparent) in settings {
            let Some(monitor) = monitors.iter().find(|m| m.device_name == device_name).cloned()
            else {
                warn!("[CONTROLLER] Monitor '{device_name}' gone, not rebuilding its instance");
                continue;
            };
            if let Err(e) = self.embed_on_monitor(&url, transparent, &monitor, &shell) {
                error!(
                    "[CONTROLLER] Rebuild failed for monitor {} ({device_name}): {e}",
                    monitor.index
                );
            } else {
                self.store.put(KEY_DEFAULT_URL, &url);
                self.store.put(
                    &transparency_key(&device_name),
                    if transparent { "true" } else { "false" },
                );
            }
        }
    }

    /* =========================
       DISPLAY RECONCILIATION
       ========================= */

    /// Cheap drift check for the periodic layout poll.
    pub fn monitors_changed(&self) -> bool {
        monitors::layouts_differ(&self.registry.monitors(), &monitors::enumerate_monitors())
    }

    /// Invoked (debounced) after a display-change notification, and by the
    /// periodic layout check.
    pub fn reconcile_displays(&mut self) {
        let old_monitors = self.registry.monitors();
        let new_monitors = monitors::enumerate_monitors();
        if new_monitors.is_empty() {
            warn!("[CONTROLLER] Display change left zero monitors; keeping instances untouched");
            return;
        }

        let actives: Vec<ActiveInstance> = self
            .registry
            .snapshot()
            .iter()
            .map(|i| ActiveInstance {
                monitor_index: i.monitor_index,
                device_name: i.device_name.clone(),
            })
            .collect();

        let plan = plan_reconcile(&old_monitors, &new_monitors, &actives);

        for monitor_index in &plan.removals {
            info!("[CONTROLLER] Monitor for instance {monitor_index} removed; tearing down");
            self.cleanup_instance(*monitor_index);
        }

        for item in &plan.resizes {
            let Some(instance) = self.registry.get_for_monitor(item.old_monitor_index) else {
                debug!(
                    "[CONTROLLER] Resize target {} vanished mid-reconcile",
                    item.old_monitor_index
                );
                continue;
            };
            if !crate::utility::is_live_window(instance.host_hwnd) {
                warn!(
                    "[CONTROLLER] Skipping resize of dead host window {:#x}",
                    instance.host_hwnd
                );
                continue;
            }

            let already_there = instance.bounds == MonitorBounds::of(&item.monitor)
                && instance.monitor_index == item.monitor.index;
            if !already_there {
                host_window::move_to_monitor(
                    instance.host_hwnd,
                    instance.shell_layer_hwnd,
                    &item.monitor,
                );
                self.renderers.set_bounds(
                    instance.renderer_id,
                    item.monitor.width,
                    item.monitor.height,
                );
                self.registry.rebind_monitor(instance.renderer_id, &item.monitor);
            }
        }

        self.registry.set_monitors(new_monitors.clone());
        self.dispatcher.rebuild(&self.registry.snapshot());

        // New monitors are eligible for auto-start when a default URL is
        // remembered; otherwise the addition is only reported.
        if !plan.additions.is_empty() {
            match self.store.get(KEY_DEFAULT_URL) {
                Some(url) if !url.is_empty() => {
                    for monitor in &plan.additions {
                        let transparent = self
                            .store
                            .get(&transparency_key(&monitor.device_name))
                            .map(|v| v == "true")
                            .unwrap_or(false);
                        info!(
                            "[CONTROLLER] Auto-starting new monitor {} ({})",
                            monitor.index, monitor.device_name
                        );
                        self.initialize_wallpaper_on_monitor(&url, transparent, monitor.index);
                    }
                }
                _ => {
                    for monitor in &plan.additions {
                        info!(
                            "[CONTROLLER] New monitor {} ({}) attached; no default URL, not starting",
                            monitor.index, monitor.device_name
                        );
                    }
                }
            }
        }

        // Layout-changed notification to the pages, posted from the command
        // loop, never from inside the OS notification handler.
        for instance in self.registry.snapshot() {
            let _ = self.renderers.post_json(
                instance.renderer_id,
                r#"{"type":"layout_changed"}"#,
            );
        }
    }

    /* =========================
       LIFECYCLE INTERNALS
       ========================= */

    fn refresh_monitors(&mut self) -> Vec<MonitorInfo> {
        let monitors = monitors::enumerate_monitors();
        self.registry.set_monitors(monitors.clone());
        monitors
    }

    fn embed_on_monitor(
        &mut self,
        url: &str,
        transparent: bool,
        monitor: &MonitorInfo,
        shell: &ShellLayerInfo,
    ) -> Result<(), String> {
        let host = host_window::create_host_window(
            shell.wallpaper_layer,
            Some(monitor),
            transparent,
            &self.tracker,
        )
        .map_err(|e| e.to_string())?;

        if !shell.is_verified() {
            warn!(
                "[CONTROLLER] Embedding into unverified shell layer ({:?}); icons-on-top not guaranteed",
                shell.confidence
            );
        }
        if !host_window::set_z_order(host, shell) {
            warn!("[CONTROLLER] Using bottom-of-stack Z-order for host {host:#x}");
        }

        let handler = make_message_handler(self.registry.clone(), self.store.clone());
        let renderer_id = match self.renderers.create(
            host,
            monitor.width,
            monitor.height,
            url,
            handler,
        ) {
            Ok(id) => id,
            Err(e) => {
                // No partial instance: the half-embedded window must not
                // stay on screen and must not be registered.
                self.tracker.unregister(host);
                if crate::utility::is_live_window(host) {
                    unsafe {
                        let _ = windows::Win32::UI::WindowsAndMessaging::DestroyWindow(
                            crate::utility::hwnd_from_raw(host),
                        );
                    }
                }
                return Err(e);
            }
        };

        let discovered = find_renderer_input_child(host);
        let input_target = if discovered != 0 { discovered } else { host };

        self.registry.add(WallpaperInstance {
            monitor_index: monitor.index,
            device_name: monitor.device_name.clone(),
            bounds: MonitorBounds::of(monitor),
            host_hwnd: host,
            shell_layer_hwnd: shell.wallpaper_layer,
            input_target_hwnd: input_target,
            renderer_id,
            mouse_transparent: transparent,
            url: url.to_string(),
            click_regions: Vec::new(),
        });
        self.dispatcher.rebuild(&self.registry.snapshot());

        if !self.router.is_installed() {
            if !self.router.install() {
                warn!("[CONTROLLER] Input hook installation failed; desktop input will not reach the page");
            }
        }
        self.router.set_paused(!self.coordinator.should_be_active());
        self.renderers
            .set_visible(renderer_id, self.coordinator.should_be_active());

        Ok(())
    }

    /// Full teardown for one monitor. Order matters: the renderer closes
    /// before its window dies so it never paints into a dead window; the
    /// registry removal comes last so lookups stay consistent throughout.
    fn cleanup_instance(&mut self, monitor_index: usize) -> bool {
        let Some(instance) = self.registry.get_for_monitor(monitor_index) else {
            return false;
        };

        self.renderers.close(instance.renderer_id);

        if crate::utility::is_live_window(instance.host_hwnd) {
            unsafe {
                if let Err(e) = windows::Win32::UI::WindowsAndMessaging::DestroyWindow(
                    crate::utility::hwnd_from_raw(instance.host_hwnd),
                ) {
                    warn!(
                        "[CONTROLLER] DestroyWindow failed for {:#x}: {e:?}",
                        instance.host_hwnd
                    );
                }
            }
        } else {
            debug!(
                "[CONTROLLER] Host window {:#x} already destroyed",
                instance.host_hwnd
            );
        }
        self.tracker.unregister(instance.host_hwnd);

        self.registry.clear_click_regions(monitor_index);
        self.registry.remove(monitor_index);
        self.dispatcher.rebuild(&self.registry.snapshot());
        true
    }

    /// Full shutdown: teardown, hook release, and force-destroy of anything
    /// the tracker still holds. Safe to call with partial state.
    pub fn shutdown(&mut self) {
        self.stop_wallpaper();
        self.router.release();
        let leaked = self.tracker.tracked_count();
        if leaked > 0 {
            warn!("[CONTROLLER] Force-destroying {leaked} window(s) left behind by teardown");
        }
        self.tracker.destroy_all();
        self.dispatcher.clear();
    }
}

/// Renderer-to-host message dispatch. Runs on the command thread inside the
/// web-message callback; replies (if any) are posted back to the page.
fn make_message_handler(
    registry: Arc<InstanceRegistry>,
    store: Arc<dyn StateStore>,
) -> MessageHandler {
    Rc::new(move |renderer_id, raw| {
        let message = parse_page_message(&raw)?;
        match message {
            PageMessage::Iframes { regions } => {
                if !registry.set_click_regions(renderer_id, regions) {
                    debug!("[CONTROLLER] Iframe update for unknown renderer {renderer_id}");
                }
                None
            }
            PageMessage::OpenUrl { url } => {
                if url_allowed(&url) {
                    shell_open_url(&url);
                } else {
                    warn!("[CONTROLLER] Page requested disallowed url '{url}'");
                }
                None
            }
            PageMessage::Ready => {
                info!("[CONTROLLER] Renderer {renderer_id} reported ready");
                None
            }
            PageMessage::Log { level, message } => {
                match level.as_str() {
                    "error" => error!("[PAGE {renderer_id}] {message}"),
                    "warn" => warn!("[PAGE {renderer_id}] {message}"),
                    _ => info!("[PAGE {renderer_id}] {message}"),
                }
                None
            }
            PageMessage::StateSave { key, value } => {
                store.put(&key, &value.to_string());
                None
            }
            PageMessage::StateLoad { key } => {
                let value = store
                    .get(&key)
                    .and_then(|s| serde_json::from_str::<serde_json::Value>(&s).ok())
                    .unwrap_or(serde_json::Value::Null);
                Some(
                    serde_json::json!({
                        "type": "state",
                        "key": key,
                        "value": value,
                    })
                    .to_string(),
                )
            }
            PageMessage::StateClear => {
                store.clear();
                None
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_store::MemoryStateStore;

    #[test]
    fn url_policy_allows_known_schemes_only() {
        assert!(url_allowed("https://example.com"));
        assert!(url_allowed("http://example.com/page?q=1"));
        assert!(url_allowed("file:///C:/wallpapers/index.html"));
        assert!(url_allowed("  https://example.com  "));

        assert!(!url_allowed(""));
        assert!(!url_allowed("   "));
        assert!(!url_allowed("javascript://alert(1)"));
        assert!(!url_allowed("ftp://example.com"));
        assert!(!url_allowed("example.com"));
        assert!(!url_allowed("https://"));
    }

    fn test_instance(renderer_id: u32) -> WallpaperInstance {
        WallpaperInstance {
            monitor_index: 0,
            device_name: r"\\.\DISPLAY1".into(),
            bounds: MonitorBounds {
                left: 0,
                top: 0,
                width: 1920,
                height: 1080,
            },
            host_hwnd: 0x100,
            shell_layer_hwnd: 0x10,
            input_target_hwnd: 0x200,
            renderer_id,
            mouse_transparent: false,
            url: "https://example.com".into(),
            click_regions: Vec::new(),
        }
    }

    #[test]
    fn iframe_updates_replace_wholesale_through_the_handler() {
        let registry = Arc::new(InstanceRegistry::new());
        registry.add(test_instance(5));
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::default());
        let handler = make_message_handler(registry.clone(), store);

        let first = r#"{"type":"iframes","regions":[
            {"id":"a","click_url":"https://a","left":0,"top":0,"width":10,"height":10},
            {"id":"b","click_url":"https://b","left":20,"top":0,"width":10,"height":10}
        ]}"#;
        let second = r#"{"type":"iframes","regions":[
            {"id":"c","click_url":"https://c","left":40,"top":0,"width":10,"height":10}
        ]}"#;

        assert!(handler(5, first.to_string()).is_none());
        assert_eq!(registry.get_for_monitor(0).unwrap().click_regions.len(), 2);

        assert!(handler(5, second.to_string()).is_none());
        let regions = registry.get_for_monitor(0).unwrap().click_regions;
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].id, "c");
    }

    #[test]
    fn state_messages_round_trip_through_the_store() {
        let registry = Arc::new(InstanceRegistry::new());
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::default());
        let handler = make_message_handler(registry, store.clone());

        assert!(handler(
            1,
            r#"{"type":"state_save","key":"volume","value":{"level":3}}"#.to_string()
        )
        .is_none());

        let reply = handler(1, r#"{"type":"state_load","key":"volume"}"#.to_string())
            .expect("state_load must answer");
        let parsed: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(parsed["type"], "state");
        assert_eq!(parsed["key"], "volume");
        assert_eq!(parsed["value"]["level"], 3);

        assert!(handler(1, r#"{"type":"state_clear"}"#.to_string()).is_none());
        let reply = handler(1, r#"{"type":"state_load","key":"volume"}"#.to_string()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert!(parsed["value"].is_null());
    }

    #[test]
    fn unknown_messages_are_ignored() {
        let registry = Arc::new(InstanceRegistry::new());
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::default());
        let handler = make_message_handler(registry, store);

        assert!(handler(1, "garbage".to_string()).is_none());
        assert!(handler(1, r#"{"type":"no_such_type"}"#.to_string()).is_none());
    }
}
