//! Wayland screen capture using the XDG Desktop Portal screenshot interface
//!
//! The portal answers asynchronously on a per-request object whose path is
//! derived from our bus name and a handle token. We subscribe to that
//! object's `Response` signal before calling `Screenshot`, otherwise a fast
//! portal can answer before anyone is listening.

use crate::advisory::AdvisorySink;
use crate::geometry::GeometryUnifier;
use async_trait::async_trait;
use deskgrab_core::{BackendResult, CaptureConfig, CaptureError, CaptureResult, CapturedImage};
use futures::StreamExt;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;
use zbus::zvariant::{OwnedObjectPath, OwnedValue, Value};

pub const PORTAL_SERVICE: &str = "org.freedesktop.portal.Desktop";
pub const PORTAL_PATH: &str = "/org/freedesktop/portal/desktop";
pub const SCREENSHOT_INTERFACE: &str = "org.freedesktop.portal.Screenshot";
pub const REQUEST_INTERFACE: &str = "org.freedesktop.portal.Request";

/// Correlates one `Screenshot` call with its `Response` signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestToken(String);

impl RequestToken {
    pub fn new() -> Self {
        Self(format!("deskgrab_{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Object path the portal will use for the request identified by `token`
pub fn request_path(unique_name: &str, token: &RequestToken) -> String {
    let sender = unique_name.trim_start_matches(':').replace('.', "_");
    format!("{}/request/{}/{}", PORTAL_PATH, sender, token)
}

/// Convert the `file://` locator from a response into a local path
pub fn uri_to_path(uri: &str) -> CaptureResult<PathBuf> {
    let url = url::Url::parse(uri)
        .map_err(|e| CaptureError::InvalidResponse(format!("invalid file URI '{}': {}", uri, e)))?;
    if url.scheme() != "file" {
        return Err(CaptureError::InvalidResponse(format!(
            "expected a file URI, got '{}'",
            uri
        )));
    }
    url.to_file_path()
        .map_err(|_| CaptureError::InvalidResponse(format!("cannot convert URI to path: {}", uri)))
}

/// Payload of a request object's `Response` signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalResponse {
    /// 0 on success, 1 when the user cancelled, 2 for other failures
    pub status: u32,
    /// `results["uri"]`, present on success
    pub uri: Option<String>,
}

/// Session bus operations the screenshot exchange needs
#[async_trait]
pub trait PortalBus: Send + Sync {
    /// Whether `service` currently has an owner on the bus
    async fn service_registered(&self, service: &str) -> CaptureResult<bool>;

    /// Our unique connection name (`:1.42`)
    fn unique_name(&self) -> CaptureResult<String>;

    /// Start listening for `Response` on the request object at `request_path`
    async fn subscribe(&self, request_path: &str) -> CaptureResult<Box<dyn PortalRequest>>;

    /// Call `Screenshot`, returning the request handle the portal reports
    async fn screenshot(&self, parent_window: &str, token: &RequestToken, interactive: bool) -> CaptureResult<String>;
}

/// A subscribed request object. Dropping it ends the subscription.
#[async_trait]
pub trait PortalRequest: Send {
    /// Wait for the `Response` signal
    async fn response(&mut self) -> CaptureResult<PortalResponse>;

    /// Release the portal-side request object
    async fn close(&mut self) -> CaptureResult<()>;

    /// Ask the portal to release the request object without waiting for
    /// the reply. Used when a capture is abandoned before `close` ran.
    fn close_detached(&mut self);
}

fn bus_error(e: impl std::fmt::Display) -> CaptureError {
    CaptureError::Bus(e.to_string())
}

/// [`PortalBus`] over a zbus session connection
#[derive(Clone)]
pub struct ZbusPortal {
    connection: zbus::Connection,
}

impl ZbusPortal {
    pub fn new(connection: zbus::Connection) -> Self {
        Self { connection }
    }

    /// Connect to the session bus
    pub async fn session() -> CaptureResult<Self> {
        let connection = zbus::Connection::session().await.map_err(bus_error)?;
        Ok(Self::new(connection))
    }
}

#[async_trait]
impl PortalBus for ZbusPortal {
    async fn service_registered(&self, service: &str) -> CaptureResult<bool> {
        let dbus = zbus::fdo::DBusProxy::new(&self.connection)
            .await
            .map_err(bus_error)?;
        let name = zbus::names::BusName::try_from(service).map_err(bus_error)?;
        dbus.name_has_owner(name).await.map_err(bus_error)
    }

    fn unique_name(&self) -> CaptureResult<String> {
        self.connection
            .unique_name()
            .map(|name| name.to_string())
            .ok_or_else(|| CaptureError::Bus("connection has no unique name".to_string()))
    }

    async fn subscribe(&self, request_path: &str) -> CaptureResult<Box<dyn PortalRequest>> {
        let proxy = zbus::Proxy::new(
            &self.connection,
            PORTAL_SERVICE,
            request_path.to_string(),
            REQUEST_INTERFACE,
        )
        .await
        .map_err(bus_error)?;
        let responses = proxy.receive_signal("Response").await.map_err(bus_error)?;
        Ok(Box::new(ZbusRequest { proxy, responses }))
    }

    async fn screenshot(&self, parent_window: &str, token: &RequestToken, interactive: bool) -> CaptureResult<String> {
        let proxy = zbus::Proxy::new(
            &self.connection,
            PORTAL_SERVICE,
            PORTAL_PATH,
            SCREENSHOT_INTERFACE,
        )
        .await
        .map_err(bus_error)?;

        let mut options: HashMap<&str, Value<'_>> = HashMap::new();
        options.insert("handle_token", Value::from(token.as_str()));
        options.insert("interactive", Value::from(interactive));

        let handle: OwnedObjectPath = proxy
            .call("Screenshot", &(parent_window, options))
            .await
            .map_err(bus_error)?;
        Ok(handle.to_string())
    }
}

struct ZbusRequest {
    proxy: zbus::Proxy<'static>,
    responses: zbus::proxy::SignalStream<'static>,
}

#[async_trait]
impl PortalRequest for ZbusRequest {
    async fn response(&mut self) -> CaptureResult<PortalResponse> {
        let message = self
            .responses
            .next()
            .await
            .ok_or_else(|| CaptureError::Bus("response stream closed".to_string()))?;
        let (status, mut results): (u32, HashMap<String, OwnedValue>) =
            message.body().deserialize().map_err(bus_error)?;
        let uri = results
            .remove("uri")
            .map(String::try_from)
            .transpose()
            .map_err(bus_error)?;
        Ok(PortalResponse { status, uri })
    }

    async fn close(&mut self) -> CaptureResult<()> {
        self.proxy
            .call_method("Close", &())
            .await
            .map_err(bus_error)?;
        Ok(())
    }

    fn close_detached(&mut self) {
        let proxy = self.proxy.clone();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No runtime left to close portal request {}", proxy.path());
            return;
        };
        runtime.spawn(async move {
            if let Err(e) = proxy.call_method("Close", &()).await {
                warn!("Failed to close portal request {}: {}", proxy.path(), e);
            }
        });
    }
}

/// Closes the request when dropped unless [`RequestGuard::close`] finished,
/// so an abandoned capture still releases the portal-side object
struct RequestGuard {
    request: Box<dyn PortalRequest>,
    path: String,
    armed: bool,
}

impl RequestGuard {
    fn new(request: Box<dyn PortalRequest>, path: &str) -> Self {
        Self {
            request,
            path: path.to_string(),
            armed: true,
        }
    }

    fn request(&mut self) -> &mut dyn PortalRequest {
        self.request.as_mut()
    }

    async fn close(mut self) {
        let result = self.request.close().await;
        self.armed = false;
        if let Err(e) = result {
            warn!("Failed to close portal request {}: {}", self.path, e);
        }
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        if self.armed {
            debug!("Portal request {} abandoned, closing", self.path);
            self.request.close_detached();
        }
    }
}

/// Full-desktop screenshots through the desktop portal
pub struct PermissionBrokerBackend {
    bus: Option<Arc<dyn PortalBus>>,
    timeout: Duration,
    advisor: Arc<dyn AdvisorySink>,
}

impl PermissionBrokerBackend {
    /// `bus` is `None` when no session bus connection could be made
    pub fn new(bus: Option<Arc<dyn PortalBus>>, timeout: Duration, advisor: Arc<dyn AdvisorySink>) -> Self {
        Self {
            bus,
            timeout,
            advisor,
        }
    }

    pub fn from_config(
        bus: Option<Arc<dyn PortalBus>>,
        config: &CaptureConfig,
        advisor: Arc<dyn AdvisorySink>,
    ) -> Self {
        Self::new(bus, Duration::from_secs(config.portal_timeout_secs), advisor)
    }

    /// Request a non-interactive screenshot and wait for the portal's answer
    pub async fn request_screenshot(&self, unifier: &GeometryUnifier) -> BackendResult {
        let Some(bus) = self.bus.as_deref() else {
            self.advisor.error(&format!(
                "Could not locate the `{}` service: no session bus connection",
                PORTAL_SERVICE
            ));
            return BackendResult::failure();
        };

        match self.try_request(bus, unifier).await {
            Ok(image) => image.into(),
            Err(e) => {
                self.advisor.error(&e.to_string());
                BackendResult::failure()
            }
        }
    }

    async fn try_request(&self, bus: &dyn PortalBus, unifier: &GeometryUnifier) -> CaptureResult<Option<CapturedImage>> {
        if !bus.service_registered(PORTAL_SERVICE).await? {
            return Err(CaptureError::ServiceUnavailable(PORTAL_SERVICE.to_string()));
        }

        let token = RequestToken::new();
        let path = request_path(&bus.unique_name()?, &token);
        debug!("Subscribing to portal request {}", path);
        let mut request = RequestGuard::new(bus.subscribe(&path).await?, &path);

        let outcome = self.exchange(bus, request.request(), &token, &path, unifier).await;
        request.close().await;

        outcome
    }

    async fn exchange(
        &self,
        bus: &dyn PortalBus,
        request: &mut dyn PortalRequest,
        token: &RequestToken,
        path: &str,
        unifier: &GeometryUnifier,
    ) -> CaptureResult<Option<CapturedImage>> {
        let handle = bus.screenshot("", token, false).await?;
        if handle != path {
            debug!("Portal answered on {}, expected {}", handle, path);
        }

        let response = tokio::time::timeout(self.timeout, request.response())
            .await
            .map_err(|_| {
                CaptureError::Bus(format!(
                    "no screenshot response within {} s",
                    self.timeout.as_secs_f32()
                ))
            })??;

        if response.status != 0 {
            info!(
                "{}",
                CaptureError::Declined {
                    status: response.status
                }
            );
            return Ok(None);
        }

        let uri = response
            .uri
            .ok_or_else(|| CaptureError::InvalidResponse("response carries no uri".to_string()))?;
        let file = uri_to_path(&uri)?;
        debug!("Reading screenshot from {}", file.display());

        let image = CapturedImage::load(&file);
        if let Err(e) = std::fs::remove_file(&file) {
            warn!("Failed to remove {}: {}", file.display(), e);
        }
        Ok(Some(unifier.reconcile(image?).await))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisory::AdvisoryLevel;
    use crate::output::StaticOutputs;
    use crate::testing::{FakeBus, RecordingAdvisor};
    use deskgrab_core::{DesktopSession, OutputDescriptor, Rect, WindowManager};
    use tempfile::tempdir;

    fn unifier() -> GeometryUnifier {
        GeometryUnifier::new(
            DesktopSession::wayland(WindowManager::Gnome),
            Arc::new(StaticOutputs::new(vec![OutputDescriptor::new(
                1,
                "eDP-1",
                Rect::new(0, 0, 8, 4),
                2.0,
            )])),
        )
    }

    fn backend(bus: Arc<FakeBus>, advisor: Arc<RecordingAdvisor>) -> PermissionBrokerBackend {
        PermissionBrokerBackend::new(Some(bus), Duration::from_secs(5), advisor)
    }

    #[test]
    fn test_request_path_from_unique_name() {
        let token = RequestToken("abc".to_string());
        assert_eq!(
            request_path(":1.42", &token),
            "/org/freedesktop/portal/desktop/request/1_42/abc"
        );
    }

    #[test]
    fn test_tokens_are_unique() {
        let a = RequestToken::new();
        let b = RequestToken::new();
        assert_ne!(a, b);
        assert!(a
            .as_str()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_'));
    }

    #[test]
    fn test_uri_decoding() {
        let path = uri_to_path("file:///tmp/Screenshot%20%C3%A9cran.png").unwrap();
        assert_eq!(path, PathBuf::from("/tmp/Screenshot écran.png"));
        assert!(uri_to_path("https://example.com/a.png").is_err());
        assert!(uri_to_path("/tmp/plain.png").is_err());
    }

    #[tokio::test]
    async fn test_unregistered_service_sends_nothing() {
        let (bus, calls) = FakeBus::new(false, None);
        let advisor = Arc::new(RecordingAdvisor::new());

        let result = backend(bus, advisor.clone()).request_screenshot(&unifier()).await;

        assert!(!result.ok());
        assert_eq!(
            *calls.lock().unwrap(),
            vec![format!("registered {}", PORTAL_SERVICE)]
        );
        assert!(advisor.at_level(AdvisoryLevel::Error)[0].contains(PORTAL_SERVICE));
    }

    #[tokio::test]
    async fn test_declined_request_is_closed() {
        let (bus, calls) = FakeBus::answering(1);
        let advisor = Arc::new(RecordingAdvisor::new());

        let result = backend(bus, advisor.clone()).request_screenshot(&unifier()).await;

        assert!(!result.ok());
        assert!(result.image().is_none());
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 4);
        assert!(calls[1].starts_with("subscribe /org/freedesktop/portal/desktop/request/1_42/deskgrab_"));
        assert_eq!(calls[2], "screenshot parent='' interactive=false");
        assert_eq!(calls[3], "close");
        assert!(advisor.at_level(AdvisoryLevel::Error).is_empty());
    }

    #[tokio::test]
    async fn test_success_loads_and_removes_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("Screenshot écran.png");
        image::RgbaImage::from_pixel(16, 8, image::Rgba([10, 20, 30, 255]))
            .save(&file)
            .unwrap();
        let uri = url::Url::from_file_path(&file).unwrap().to_string();

        let (bus, calls) = FakeBus::new(
            true,
            Some(PortalResponse {
                status: 0,
                uri: Some(uri),
            }),
        );
        let result = backend(bus, Arc::new(RecordingAdvisor::new()))
            .request_screenshot(&unifier())
            .await;

        assert!(result.ok());
        let image = result.image().unwrap();
        assert_eq!(image.size(), (16, 8));
        // 16x8 matches neither 8x4 physical nor 4x2 logical: 8 / 2
        assert_eq!(image.scale, 4.0);
        assert!(!file.exists());
        assert_eq!(calls.lock().unwrap().last().unwrap(), "close");
    }

    #[tokio::test]
    async fn test_missing_file_fails_but_closes() {
        let (bus, calls) = FakeBus::new(
            true,
            Some(PortalResponse {
                status: 0,
                uri: Some("file:///nonexistent/deskgrab/shot.png".to_string()),
            }),
        );
        let advisor = Arc::new(RecordingAdvisor::new());

        let result = backend(bus, advisor.clone()).request_screenshot(&unifier()).await;

        assert!(!result.ok());
        assert_eq!(calls.lock().unwrap().last().unwrap(), "close");
        assert_eq!(advisor.at_level(AdvisoryLevel::Error).len(), 1);
    }

    #[tokio::test]
    async fn test_timeout_still_closes_request() {
        let (bus, calls) = FakeBus::new(true, None);
        let advisor = Arc::new(RecordingAdvisor::new());
        let backend = PermissionBrokerBackend::new(Some(bus), Duration::from_millis(50), advisor.clone());

        let result = backend.request_screenshot(&unifier()).await;

        assert!(!result.ok());
        assert_eq!(calls.lock().unwrap().last().unwrap(), "close");
        assert_eq!(advisor.at_level(AdvisoryLevel::Error).len(), 1);
    }

    #[tokio::test]
    async fn test_abandoned_request_is_closed() {
        let (bus, calls) = FakeBus::new(true, None);
        let backend = backend(bus, Arc::new(RecordingAdvisor::new()));
        let unifier = unifier();

        let abandoned =
            tokio::time::timeout(Duration::from_millis(50), backend.request_screenshot(&unifier)).await;

        assert!(abandoned.is_err());
        let calls = calls.lock().unwrap();
        assert_eq!(calls[2], "screenshot parent='' interactive=false");
        assert_eq!(calls.last().unwrap(), "close detached");
        assert!(!calls.iter().any(|c| c == "close"));
    }

    #[tokio::test]
    async fn test_no_bus_connection() {
        let advisor = Arc::new(RecordingAdvisor::new());
        let backend = PermissionBrokerBackend::new(None, Duration::from_secs(1), advisor.clone());
        assert!(!backend.request_screenshot(&unifier()).await.ok());
        assert_eq!(advisor.at_level(AdvisoryLevel::Error).len(), 1);
    }
}
