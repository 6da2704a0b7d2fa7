use std::{
    cell::Cell,
    collections::HashMap,
    rc::Rc,
    sync::mpsc,
};

use webview2_com::{
    CreateCoreWebView2ControllerCompletedHandler, CreateCoreWebView2EnvironmentCompletedHandler,
    NavigationCompletedEventHandler, WebMessageReceivedEventHandler,
    Microsoft::Web::WebView2::Win32::{
        CreateCoreWebView2Environment, EventRegistrationToken, ICoreWebView2,
        ICoreWebView2Controller, ICoreWebView2Environment,
    },
};
use windows::{
    core::{PCWSTR, PWSTR},
    Win32::{
        Foundation::{E_POINTER, RECT},
        System::Com::CoTaskMemFree,
    },
};

use crate::{
    debug, error,
    utility::{hwnd_from_raw, to_wstring},
    warn,
};

/// Injected after every navigation: exposes the host bridge to the page and
/// announces readiness over the web-message channel.
const BRIDGE_SCRIPT: &str = r#"(function () {
  if (window.__webwallBridge) { return; }
  window.__webwallBridge = true;
  var post = function (msg) {
    try { window.chrome.webview.postMessage(JSON.stringify(msg)); } catch (e) {}
  };
  window.webwall = {
    openUrl: function (url) { post({ type: 'open_url', url: url }); },
    saveState: function (key, value) { post({ type: 'state_save', key: key, value: value }); },
    loadState: function (key) { post({ type: 'state_load', key: key }); },
    clearState: function () { post({ type: 'state_clear' }); },
    reportIframes: function (regions) { post({ type: 'iframes', regions: regions }); },
    log: function (level, message) { post({ type: 'log', level: level, message: message }); }
  };
  post({ type: 'ready' });
})();"#;

/// Explicit navigation lifecycle; completion triggers bridge injection
/// rather than nesting follow-up work inside ad-hoc callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererPhase {
    Created,
    Navigating,
    ScriptInjected,
    Ready,
    Failed,
}

/// Callback invoked (on the command thread) for each raw JSON message the
/// page posts. A returned string is posted back to the page as a reply.
pub type MessageHandler = Rc<dyn Fn(u32, String) -> Option<String>>;

struct HostedRenderer {
    controller: ICoreWebView2Controller,
    webview: ICoreWebView2,
    phase: Rc<Cell<RendererPhase>>,
    visible: bool,
}

/// Owns every live browser control plus the shared renderer environment.
/// Confined to the command thread: the COM objects here have thread
/// affinity, which is why cross-thread consumers only ever see renderer ids.
pub struct RendererHost {
    environment: Option<ICoreWebView2Environment>,
    hosted: HashMap<u32, HostedRenderer>,
    next_id: u32,
}

impl RendererHost {
    pub fn new() -> Self {
        Self {
            environment: None,
            hosted: HashMap::new(),
            next_id: 1,
        }
    }

    /// One shared environment for all monitors, created lazily on first use.
    fn ensure_environment(&mut self) -> Result<ICoreWebView2Environment, String> {
        if let Some(env) = &self.environment {
            return Ok(env.clone());
        }

        let environment = {
            let (tx, rx) = mpsc::channel();

            CreateCoreWebView2EnvironmentCompletedHandler::wait_for_async_operation(
                Box::new(|handler| unsafe {
                    CreateCoreWebView2Environment(&handler)
                        .map_err(webview2_com::Error::WindowsError)
                }),
                Box::new(move |error_code, environment| {
                    error_code?;
                    tx.send(environment.ok_or_else(|| windows::core::Error::from(E_POINTER)))
                        .expect("send WebView2 environment");
                    Ok(())
                }),
            )
            .map_err(|e| format!("CreateCoreWebView2Environment failed: {e:?}"))?;

            rx.recv()
                .map_err(|_| "Failed to receive WebView2 environment".to_string())?
                .map_err(|e| format!("WebView2 environment unavailable: {e:?}"))?
        };

        self.environment = Some(environment.clone());
        Ok(environment)
    }

    /// Drop the shared environment so the next create is guaranteed a fresh
    /// one; required after a full stop, where a cached environment may have
    /// gone stale across a session switch.
    pub fn invalidate_environment(&mut self) {
        self.environment = None;
    }

    pub fn create(
        &mut self,
        host_hwnd: isize,
        width: i32,
        height: i32,
        url: &str,
        on_message: MessageHandler,
    ) -> Result<u32, String> {
        let environment = self.ensure_environment()?;
        let hwnd = hwnd_from_raw(host_hwnd);
        let id = self.next_id;

        let controller = {
            let (tx, rx) = mpsc::channel();

            CreateCoreWebView2ControllerCompletedHandler::wait_for_async_operation(
                Box::new(move |handler| unsafe {
                    environment
                        .CreateCoreWebView2Controller(hwnd, &handler)
                        .map_err(webview2_com::Error::WindowsError)
                }),
                Box::new(move |error_code, controller| {
                    error_code?;
                    tx.send(controller.ok_or_else(|| windows::core::Error::from(E_POINTER)))
                        .expect("send WebView2 controller");
                    Ok(())
                }),
            )
            .map_err(|e| format!("CreateCoreWebView2Controller failed: {e:?}"))?;

            rx.recv()
                .map_err(|_| "Failed to receive WebView2 controller".to_string())?
                .map_err(|e| format!("WebView2 controller unavailable: {e:?}"))?
        };

        let webview = unsafe {
            controller
                .SetBounds(RECT {
                    left: 0,
                    top: 0,
                    right: width.max(1),
                    bottom: height.max(1),
                })
                .map_err(|e| format!("WebView2 SetBounds failed: {e:?}"))?;
            controller
                .SetIsVisible(true)
                .map_err(|e| format!("WebView2 SetIsVisible failed: {e:?}"))?;
            controller
                .CoreWebView2()
                .map_err(|e| format!("WebView2 CoreWebView2 unavailable: {e:?}"))?
        };

        let phase = Rc::new(Cell::new(RendererPhase::Created));

        wire_navigation_completed(&webview, id, phase.clone())?;
        wire_web_message_channel(&webview, id, on_message)?;

        unsafe {
            let url_wide = to_wstring(url);
            webview
                .Navigate(PCWSTR(url_wide.as_ptr()))
                .map_err(|e| format!("WebView2 Navigate failed for '{url}': {e:?}"))?;
        }
        phase.set(RendererPhase::Navigating);

        self.hosted.insert(
            id,
            HostedRenderer {
                controller,
                webview,
                phase,
                visible: true,
            },
        );
        self.next_id += 1;
        Ok(id)
    }

    pub fn navigate(&mut self, id: u32, url: &str) -> bool {
        let Some(hosted) = self.hosted.get(&id) else {
            return false;
        };

        let url_wide = to_wstring(url);
        match unsafe { hosted.webview.Navigate(PCWSTR(url_wide.as_ptr())) } {
            Ok(()) => {
                hosted.phase.set(RendererPhase::Navigating);
                true
            }
            Err(e) => {
                warn!("[RENDERER] Navigate to '{url}' failed for renderer {id}: {e:?}");
                false
            }
        }
    }

    /// Window-relative visible bounds; the host window itself carries the
    /// absolute monitor position.
    pub fn set_bounds(&self, id: u32, width: i32, height: i32) -> bool {
        let Some(hosted) = self.hosted.get(&id) else {
            return false;
        };
        unsafe {
            hosted
                .controller
                .SetBounds(RECT {
                    left: 0,
                    top: 0,
                    right: width.max(1),
                    bottom: height.max(1),
                })
                .is_ok()
        }
    }

    /// Fast-path pause/resume: toggles renderer visibility and signals the
    /// page, without touching any window handle.
    pub fn set_visible(&mut self, id: u32, visible: bool) -> bool {
        let Some(hosted) = self.hosted.get_mut(&id) else {
            return false;
        };
        if hosted.visible == visible {
            return true;
        }

        let ok = unsafe { hosted.controller.SetIsVisible(visible).is_ok() };
        if ok {
            hosted.visible = visible;
            let payload = format!(r#"{{"type":"visibility","visible":{visible}}}"#);
            let _ = post_webview_json(&hosted.webview, &payload);
        }
        ok
    }

    pub fn set_all_visible(&mut self, visible: bool) {
        let ids: Vec<u32> = self.hosted.keys().copied().collect();
        for id in ids {
            let _ = self.set_visible(id, visible);
        }
    }

    pub fn post_json(&self, id: u32, payload: &str) -> bool {
        match self.hosted.get(&id) {
            Some(hosted) => post_webview_json(&hosted.webview, payload).is_ok(),
            None => false,
        }
    }

    pub fn execute_script(&self, id: u32, script: &str) -> bool {
        let Some(hosted) = self.hosted.get(&id) else {
            return false;
        };
        let wide = to_wstring(script);
        unsafe { hosted.webview.ExecuteScript(PCWSTR(wide.as_ptr()), None).is_ok() }
    }

    pub fn phase(&self, id: u32) -> Option<RendererPhase> {
        self.hosted.get(&id).map(|h| h.phase.get())
    }

    pub fn close(&mut self, id: u32) {
        if let Some(hosted) = self.hosted.remove(&id) {
            unsafe {
                let _ = hosted.controller.Close();
            }
        }
    }

    pub fn close_all(&mut self) {
        let ids: Vec<u32> = self.hosted.keys().copied().collect();
        for id in ids {
            self.close(id);
        }
    }
}

fn wire_navigation_completed(
    webview: &ICoreWebView2,
    id: u32,
    phase: Rc<Cell<RendererPhase>>,
) -> Result<(), String> {
    let handler = NavigationCompletedEventHandler::create(Box::new(move |sender, args| {
        let mut success = windows::core::BOOL::from(false);
        if let Some(args) = args.as_ref() {
            unsafe {
                let _ = args.IsSuccess(&mut success);
            }
        }

        if !success.as_bool() {
            warn!("[RENDERER] Navigation failed for renderer {id}");
            phase.set(RendererPhase::Failed);
            return Ok(());
        }

        // Completion drives the follow-up bridge injection.
        if let Some(webview) = sender.as_ref() {
            let wide = to_wstring(BRIDGE_SCRIPT);
            match unsafe { webview.ExecuteScript(PCWSTR(wide.as_ptr()), None) } {
                Ok(()) => {
                    phase.set(RendererPhase::ScriptInjected);
                    phase.set(RendererPhase::Ready);
                    debug!("[RENDERER] Renderer {id} ready, bridge injected");
                }
                Err(e) => {
                    warn!("[RENDERER] Bridge injection failed for renderer {id}: {e:?}");
                    phase.set(RendererPhase::Failed);
                }
            }
        }
        Ok(())
    }));

    let mut token = EventRegistrationToken::default();
    unsafe {
        webview
            .add_NavigationCompleted(&handler, &mut token)
            .map_err(|e| format!("add_NavigationCompleted failed: {e:?}"))
    }
}

fn wire_web_message_channel(
    webview: &ICoreWebView2,
    id: u32,
    on_message: MessageHandler,
) -> Result<(), String> {
    let handler = WebMessageReceivedEventHandler::create(Box::new(move |sender, args| {
        let Some(args) = args.as_ref() else {
            return Ok(());
        };

        let mut raw = PWSTR::null();
        let message = unsafe {
            if args.TryGetWebMessageAsString(&mut raw).is_ok() {
                take_pwstr(raw)
            } else if args.WebMessageAsJson(&mut raw).is_ok() {
                take_pwstr(raw)
            } else {
                return Ok(());
            }
        };

        if let Some(reply) = on_message(id, message) {
            if let Some(webview) = sender.as_ref() {
                if let Err(e) = post_webview_json(webview, &reply) {
                    error!("[RENDERER] Failed to post reply to renderer {id}: {e}");
                }
            }
        }
        Ok(())
    }));

    let mut token = EventRegistrationToken::default();
    unsafe {
        webview
            .add_WebMessageReceived(&handler, &mut token)
            .map_err(|e| format!("add_WebMessageReceived failed: {e:?}"))
    }
}

fn post_webview_json(webview: &ICoreWebView2, payload: &str) -> Result<(), String> {
    let payload_wide = to_wstring(payload);
    unsafe {
        webview
            .PostWebMessageAsJson(PCWSTR(payload_wide.as_ptr()))
            .map_err(|e| format!("WebView2 PostWebMessageAsJson failed: {e:?}"))
    }
}

/// Take ownership of a COM-allocated wide string and free it.
fn take_pwstr(source: PWSTR) -> String {
    if source.is_null() {
        return String::new();
    }
    let text = unsafe { source.to_string().unwrap_or_default() };
    unsafe {
        CoTaskMemFree(Some(source.0 as *const _));
    }
    text
}
