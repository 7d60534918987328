//! Browser host layer.
//!
//! Implements the tracker's capabilities over `window` and `document` and
//! installs the tracker when the module starts:
//!
//! 1. configuration is read from the tracker's `<script>` element
//!    (`document.currentScript`, or `#plausible` when that is gone),
//! 2. calls queued on `window.plausible.q` are captured,
//! 3. click listeners are attached,
//! 4. `window.plausible` is replaced by the live entry point and the queue is
//!    replayed,
//! 5. page-view detection starts.
//!
//! Nothing here throws into the page. Failures are logged and the tracker
//! simply does less.

use std::rc::Rc;
use std::time::Duration;

use js_sys::{Array, Function, Reflect, JSON};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{
    Document, Element, Event, EventTarget, HtmlAnchorElement, HtmlScriptElement, MouseEvent, Node,
    Window, XmlHttpRequest,
};

use crate::classifier::{Anchor, ClickEvent, DomNode, InteractionClassifier, MouseButton};
use crate::config::{ConfigSource, Features, Routing, TrackerConfig};
use crate::error::{TrackerError, TrackerResult};
use crate::event::{Callback, EventOptions, Properties};
use crate::navigation::{NavigationHandler, NavigationSource, NavigationTrigger};
use crate::page::{AutomationMarker, Page, PageLocation, StorageError, Visibility, OPT_OUT_KEY};
use crate::queue::{PendingCallQueue, QueuedCall, TrackerHandle};
use crate::scheduler::{Scheduler, Task};
use crate::tracker::{HostCapabilities, Tracker};
use crate::transport::{EventRequest, Transport, CONTENT_TYPE};

/// Global name of the page-facing entry point.
pub const ENTRY_POINT: &str = "plausible";

/// `id` looked up when `document.currentScript` is unavailable.
pub const SCRIPT_ID: &str = "plausible";

fn get(target: &JsValue, key: &str) -> JsValue {
    Reflect::get(target, &JsValue::from_str(key)).unwrap_or(JsValue::UNDEFINED)
}

/// Configuration read from the tracker's `<script>` element.
pub struct ScriptConfigSource {
    element: Element,
}

impl ScriptConfigSource {
    /// Locate the tracker's script element.
    pub fn find(document: &Document) -> Option<Self> {
        document
            .current_script()
            .or_else(|| document.get_element_by_id(SCRIPT_ID))
            .map(|element| Self { element })
    }
}

impl ConfigSource for ScriptConfigSource {
    fn attribute(&self, name: &str) -> Option<String> {
        self.element.get_attribute(name)
    }

    fn script_src(&self) -> Option<String> {
        self.element
            .dyn_ref::<HtmlScriptElement>()
            .map(HtmlScriptElement::src)
            .filter(|src| !src.is_empty())
    }
}

/// The current browser tab.
pub struct WebPage {
    window: Window,
    document: Document,
}

impl WebPage {
    pub fn new(window: Window, document: Document) -> Self {
        Self { window, document }
    }
}

impl Page for WebPage {
    fn location(&self) -> PageLocation {
        let location = self.window.location();
        PageLocation {
            href: location.href().unwrap_or_default(),
            protocol: location.protocol().unwrap_or_default(),
            host: location.host().unwrap_or_default(),
            hostname: location.hostname().unwrap_or_default(),
            pathname: location.pathname().unwrap_or_default(),
        }
    }

    fn referrer(&self) -> Option<String> {
        Some(self.document.referrer()).filter(|r| !r.is_empty())
    }

    fn viewport_width(&self) -> u32 {
        self.window
            .inner_width()
            .ok()
            .and_then(|width| width.as_f64())
            .map(|width| width as u32)
            .unwrap_or_default()
    }

    fn automation_marker(&self) -> Option<AutomationMarker> {
        let window: &JsValue = self.window.as_ref();
        AutomationMarker::ALL.into_iter().find(|marker| {
            let holder = match marker {
                AutomationMarker::WebDriver => get(window, "navigator"),
                _ => window.clone(),
            };
            !holder.is_undefined() && get(&holder, marker.property()).is_truthy()
        })
    }

    fn opt_out_flag(&self) -> Result<Option<String>, StorageError> {
        let storage = self
            .window
            .local_storage()
            .map_err(|e| StorageError(format!("{:?}", e)))?;
        match storage {
            Some(storage) => storage
                .get_item(OPT_OUT_KEY)
                .map_err(|e| StorageError(format!("{:?}", e))),
            None => Ok(None),
        }
    }

    fn visibility(&self) -> Visibility {
        get(self.document.as_ref(), "visibilityState")
            .as_string()
            .map(|state| Visibility::from_state(&state))
            .unwrap_or_default()
    }

    fn navigate(&self, href: &str) {
        if let Err(e) = self.window.location().set_href(href) {
            tracing::warn!(href, error = ?e, "Navigation failed");
        }
    }
}

/// `XMLHttpRequest` delivery.
#[derive(Debug, Default, Clone, Copy)]
pub struct XhrTransport;

impl XhrTransport {
    fn post(request: &EventRequest, on_settled: Option<Callback>) -> Result<(), JsValue> {
        let xhr = XmlHttpRequest::new()?;
        xhr.open_with_async("POST", &request.endpoint, true)?;
        xhr.set_request_header("Content-Type", CONTENT_TYPE)?;
        if let Some(callback) = on_settled {
            // `loadend` fires once, after readyState 4, whatever the outcome.
            let settled = Closure::once_into_js(move || callback());
            xhr.add_event_listener_with_callback("loadend", settled.unchecked_ref())?;
        }
        xhr.send_with_opt_str(Some(&request.body))
    }
}

impl Transport for XhrTransport {
    fn send(&self, request: EventRequest, on_settled: Option<Callback>) {
        if let Err(e) = Self::post(&request, on_settled) {
            tracing::debug!(endpoint = %request.endpoint, error = ?e, "Event request could not be sent");
        }
    }
}

/// `setTimeout` scheduling.
pub struct TimeoutScheduler {
    window: Window,
}

impl TimeoutScheduler {
    pub fn new(window: Window) -> Self {
        Self { window }
    }
}

impl Scheduler for TimeoutScheduler {
    fn schedule(&self, delay: Duration, task: Task) {
        let callback = Closure::once_into_js(move || task());
        let millis = i32::try_from(delay.as_millis()).unwrap_or(i32::MAX);
        if let Err(e) = self
            .window
            .set_timeout_with_callback_and_timeout_and_arguments_0(callback.unchecked_ref(), millis)
        {
            tracing::warn!(error = ?e, "Could not schedule task");
        }
    }
}

impl DomNode for Node {
    fn parent_node(&self) -> Option<Self> {
        Node::parent_node(self)
    }

    fn as_anchor(&self) -> Option<Anchor> {
        let element = self.dyn_ref::<Element>()?;
        if !element.tag_name().eq_ignore_ascii_case("a") {
            return None;
        }
        let href = match element.dyn_ref::<HtmlAnchorElement>() {
            Some(anchor) => anchor.href(),
            None => element.get_attribute("href")?,
        };
        Some(Anchor {
            href,
            target: element.get_attribute("target").filter(|t| !t.is_empty()),
        })
    }
}

/// Page navigation notifications for the active routing mode.
pub struct BrowserNavigation {
    window: Window,
    document: Document,
    routing: Routing,
}

impl BrowserNavigation {
    pub fn new(window: Window, document: Document, routing: Routing) -> Self {
        Self {
            window,
            document,
            routing,
        }
    }

    fn wire(&self, handler: NavigationHandler) -> Result<(), JsValue> {
        match self.routing {
            Routing::Hash => listen(&self.window, "hashchange", &handler, NavigationTrigger::HashChange)?,
            Routing::History => {
                wrap_push_state(&self.window, Rc::clone(&handler))?;
                listen(&self.window, "popstate", &handler, NavigationTrigger::PopState)?;
            }
            Routing::Manual => return Ok(()),
        }
        listen(
            &self.document,
            "visibilitychange",
            &handler,
            NavigationTrigger::VisibilityChange,
        )
    }
}

impl NavigationSource for BrowserNavigation {
    fn subscribe(&self, handler: NavigationHandler) {
        if let Err(e) = self.wire(handler) {
            tracing::warn!(error = ?e, "Could not observe navigation");
        }
    }
}

fn listen(
    target: &EventTarget,
    event: &str,
    handler: &NavigationHandler,
    trigger: NavigationTrigger,
) -> Result<(), JsValue> {
    let handler = Rc::clone(handler);
    let listener = Closure::<dyn FnMut()>::new(move || handler(trigger));
    target.add_event_listener_with_callback(event, listener.as_ref().unchecked_ref())?;
    listener.forget();
    Ok(())
}

/// Replace `history.pushState` with a version that also notifies `handler`.
fn wrap_push_state(window: &Window, handler: NavigationHandler) -> Result<(), JsValue> {
    let history = Reflect::get(window, &JsValue::from_str("history"))?;
    let Some(original) = get(&history, "pushState").dyn_ref::<Function>().cloned() else {
        return Ok(());
    };

    let receiver = history.clone();
    let wrapper = Closure::<dyn FnMut(JsValue, JsValue, JsValue)>::new(
        move |state: JsValue, title: JsValue, url: JsValue| {
            if let Err(e) = original.call3(&receiver, &state, &title, &url) {
                // The page's own pushState failed; let it see its own error.
                wasm_bindgen::throw_val(e);
            }
            handler(NavigationTrigger::PushState);
        },
    );
    Reflect::set(&history, &JsValue::from_str("pushState"), wrapper.as_ref())?;
    wrapper.forget();
    Ok(())
}

fn click_event(event: &Event) -> Option<ClickEvent> {
    let mouse = event.dyn_ref::<MouseEvent>()?;
    let mut click = match event.type_().as_str() {
        "click" => ClickEvent::click(),
        "auxclick" => ClickEvent::aux_click(MouseButton::from_dom(mouse.button())),
        _ => return None,
    };
    click.ctrl_key = mouse.ctrl_key();
    click.meta_key = mouse.meta_key();
    click.shift_key = mouse.shift_key();
    Some(click)
}

fn attach_click_listeners(
    document: &Document,
    classifier: Rc<InteractionClassifier>,
) -> Result<(), JsValue> {
    let listener = Closure::<dyn FnMut(Event)>::new(move |event: Event| {
        let Some(click) = click_event(&event) else {
            return;
        };
        let Some(node) = event.target().and_then(|t| t.dyn_into::<Node>().ok()) else {
            return;
        };
        if classifier.handle(node, &click).prevents_default() {
            event.prevent_default();
        }
    });
    for event in ["click", "auxclick"] {
        document.add_event_listener_with_callback(event, listener.as_ref().unchecked_ref())?;
    }
    listener.forget();
    Ok(())
}

fn json_map(value: &JsValue) -> Option<Properties> {
    if value.is_undefined() || value.is_null() {
        return None;
    }
    let text = JSON::stringify(value).ok()?.as_string()?;
    match serde_json::from_str::<Properties>(&text) {
        Ok(map) => Some(map),
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring non-object event option");
            None
        }
    }
}

/// Convert a page-supplied options object.
fn options_from_js(value: &JsValue) -> EventOptions {
    let mut options = EventOptions::default();
    if !value.is_object() {
        return options;
    }

    options.meta = json_map(&get(value, "meta"));
    options.props = json_map(&get(value, "props"));
    options.url = get(value, "u").as_string();
    if let Some(callback) = get(value, "callback").dyn_ref::<Function>().cloned() {
        options.callback = Some(Box::new(move || {
            if let Err(e) = callback.call0(&JsValue::NULL) {
                tracing::debug!(error = ?e, "Event callback threw");
            }
        }));
    }
    options
}

/// Calls left on `window.plausible.q` by the page's stub.
fn take_queue(window: &Window) -> PendingCallQueue {
    let queue = get(&get(window.as_ref(), ENTRY_POINT), "q");
    if !queue.is_object() {
        return PendingCallQueue::new();
    }

    Array::from(&queue)
        .iter()
        .filter(JsValue::is_object)
        .filter_map(|args| {
            let args = Array::from(&args);
            let name = args.get(0).as_string()?;
            Some(QueuedCall::new(name, options_from_js(&args.get(1))))
        })
        .collect()
}

/// Replace `window.plausible` with `handle`.
fn expose_entry_point(window: &Window, handle: Rc<TrackerHandle>) -> Result<(), JsValue> {
    let entry = Closure::<dyn FnMut(JsValue, JsValue)>::new(move |name: JsValue, options: JsValue| {
        match name.as_string() {
            Some(name) => handle.call(&name, options_from_js(&options)),
            None => tracing::debug!("Ignoring call without an event name"),
        }
    });
    Reflect::set(window, &JsValue::from_str(ENTRY_POINT), entry.as_ref())?;
    entry.forget();
    Ok(())
}

fn install() -> TrackerResult<()> {
    let window = web_sys::window().ok_or(TrackerError::ConfigurationAbsent)?;
    let document = window.document().ok_or(TrackerError::ConfigurationAbsent)?;
    let source = ScriptConfigSource::find(&document).ok_or(TrackerError::ConfigurationAbsent)?;

    let features = Features::from_build();
    let config = TrackerConfig::from_source(&source, features)?;

    let handle = Rc::new(TrackerHandle::with_queue(take_queue(&window)));
    let host = HostCapabilities::new(
        Rc::new(WebPage::new(window.clone(), document.clone())),
        Rc::new(XhrTransport),
        Rc::new(TimeoutScheduler::new(window.clone())),
    );
    let tracker = Tracker::new(config, host, Rc::clone(&handle))?;

    if let Some(classifier) = tracker.classifier() {
        if let Err(e) = attach_click_listeners(&document, Rc::clone(classifier)) {
            tracing::warn!(error = ?e, "Could not attach click listeners");
        }
    }
    if let Err(e) = expose_entry_point(&window, handle) {
        tracing::warn!(error = ?e, "Could not expose the tracking entry point");
    }

    tracker.start(&BrowserNavigation::new(window, document, features.routing));
    Ok(())
}

/// Module entry point.
#[wasm_bindgen(start)]
pub fn start() {
    if let Err(e) = install() {
        tracing::warn!(error = %e, "Tracker not installed");
    }
}
