//! Payload finalization.
//!
//! Envelope fields are injected once per request just before delivery,
//! never before persistence, so stored payloads remain the caller's
//! original intent.

use playkit_core::Payload;

/// Turns a raw payload mapping into the final on-the-wire mapping.
pub trait PayloadFinalizer: Send + Sync {
    fn finalize(&self, payload: &Payload) -> Payload;
}

/// Standard envelope: app and device identifiers plus the SDK version.
/// Envelope fields overwrite caller keys of the same name.
#[derive(Debug, Clone)]
pub struct DeviceEnvelope {
    pub app_id: String,
    pub device_id: String,
    pub sdk_version: String,
}

impl PayloadFinalizer for DeviceEnvelope {
    fn finalize(&self, payload: &Payload) -> Payload {
        let mut finalized = payload.clone();
        finalized.insert("app_id".into(), self.app_id.clone().into());
        finalized.insert("device_id".into(), self.device_id.clone().into());
        finalized.insert("sdk_version".into(), self.sdk_version.clone().into());
        finalized
    }
}

/// No-op finalizer for hosts that build complete payloads themselves.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughFinalizer;

impl PayloadFinalizer for PassthroughFinalizer {
    fn finalize(&self, payload: &Payload) -> Payload {
        payload.clone()
    }
}
