//! In-memory stand-ins for the session bus and the windowing system

use crate::advisory::{AdvisoryLevel, AdvisorySink};
use crate::hyprland::MonitorIntrospection;
use crate::output::DirectGrab;
use crate::portal_capture::{request_path, PortalBus, PortalRequest, PortalResponse, RequestToken};
use async_trait::async_trait;
use deskgrab_core::{CaptureError, CaptureResult, CapturedImage, OutputDescriptor};
use std::sync::{Arc, Mutex};

pub type Calls = Arc<Mutex<Vec<String>>>;

pub const FAKE_UNIQUE_NAME: &str = ":1.42";

/// Portal bus that records every call
pub struct FakeBus {
    registered: bool,
    /// `None` means the portal never answers
    response: Option<PortalResponse>,
    calls: Calls,
}

impl FakeBus {
    pub fn new(registered: bool, response: Option<PortalResponse>) -> (Arc<Self>, Calls) {
        let calls = Calls::default();
        let bus = Arc::new(Self {
            registered,
            response,
            calls: calls.clone(),
        });
        (bus, calls)
    }

    /// A portal that answers with `status` and no uri
    pub fn answering(status: u32) -> (Arc<Self>, Calls) {
        Self::new(true, Some(PortalResponse { status, uri: None }))
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl PortalBus for FakeBus {
    async fn service_registered(&self, service: &str) -> CaptureResult<bool> {
        self.record(format!("registered {}", service));
        Ok(self.registered)
    }

    fn unique_name(&self) -> CaptureResult<String> {
        Ok(FAKE_UNIQUE_NAME.to_string())
    }

    async fn subscribe(&self, request_path: &str) -> CaptureResult<Box<dyn PortalRequest>> {
        self.record(format!("subscribe {}", request_path));
        Ok(Box::new(FakeRequest {
            response: self.response.clone(),
            calls: self.calls.clone(),
        }))
    }

    async fn screenshot(&self, parent_window: &str, token: &RequestToken, interactive: bool) -> CaptureResult<String> {
        self.record(format!(
            "screenshot parent='{}' interactive={}",
            parent_window, interactive
        ));
        Ok(request_path(FAKE_UNIQUE_NAME, token))
    }
}

struct FakeRequest {
    response: Option<PortalResponse>,
    calls: Calls,
}

#[async_trait]
impl PortalRequest for FakeRequest {
    async fn response(&mut self) -> CaptureResult<PortalResponse> {
        match self.response.take() {
            Some(response) => Ok(response),
            None => futures::future::pending().await,
        }
    }

    async fn close(&mut self) -> CaptureResult<()> {
        self.calls.lock().unwrap().push("close".to_string());
        Ok(())
    }

    fn close_detached(&mut self) {
        self.calls.lock().unwrap().push("close detached".to_string());
    }
}

/// Direct grab that paints each output a solid colour derived from its id.
/// Outputs listed in `failing` return an error instead.
#[derive(Default)]
pub struct FakeDirect {
    pub failing: Vec<u32>,
}

impl FakeDirect {
    pub fn colour(id: u32) -> [u8; 4] {
        [(id * 60) as u8, 100, 200, 255]
    }
}

impl DirectGrab for FakeDirect {
    fn grab_output(&self, output: &OutputDescriptor) -> CaptureResult<CapturedImage> {
        if self.failing.contains(&output.id) {
            return Err(CaptureError::Image(format!("{} went away", output.name)));
        }
        Ok(CapturedImage::new(image::RgbaImage::from_pixel(
            output.rect.width as u32,
            output.rect.height as u32,
            image::Rgba(Self::colour(output.id)),
        )))
    }
}

/// Sink that keeps every message, for inspection after a capture
#[derive(Debug, Default)]
pub struct RecordingAdvisor {
    messages: Mutex<Vec<(AdvisoryLevel, String)>>,
}

impl RecordingAdvisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages received so far
    pub fn messages(&self) -> Vec<(AdvisoryLevel, String)> {
        self.messages
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Messages of one level
    pub fn at_level(&self, level: AdvisoryLevel) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m)
            .collect()
    }
}

impl AdvisorySink for RecordingAdvisor {
    fn advise(&self, level: AdvisoryLevel, message: &str) {
        if let Ok(mut guard) = self.messages.lock() {
            guard.push((level, message.to_string()));
        }
    }
}

/// Monitor query that always answers with the same JSON
pub struct FakeMonitors(pub &'static str);

#[async_trait]
impl MonitorIntrospection for FakeMonitors {
    async fn monitors_json(&self) -> CaptureResult<Vec<u8>> {
        Ok(self.0.as_bytes().to_vec())
    }
}
