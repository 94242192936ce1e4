#![warn(missing_docs)]
//! # replay-app binary
//!
//! Headless demo entry point wiring auth, telemetry, and dispatch into one
//! synthetic session. Platform-specific bitmap/view-tree acquisition is the
//! embedding host's responsibility and is not replicated here.

use std::sync::Arc;

use replay_app::{app_version, batch_to_upload, capture_enabled_from_env, project_runtime_status};
use replay_auth::{AuthError, CredentialRequest, CredentialResponse, DeviceRegistrar, RegistrarTransport};
use replay_core::{DeviceInfo, EventPayload};
use replay_dispatch::{CircuitBreakerConfig, DispatchError, DispatchTransport, SegmentDispatcher, ShipOutcome};
use replay_orchestrator::{NetworkTransport, RemoteConfig, ReplayOrchestrator};
use replay_telemetry::{TelemetryConfig, TelemetryPipeline};

struct DemoRegistrarTransport;

impl RegistrarTransport for DemoRegistrarTransport {
    fn bootstrap(
        &self,
        _endpoint: &str,
        _request: &CredentialRequest,
    ) -> Result<CredentialResponse, AuthError> {
        Ok(CredentialResponse { credential: "demo-credential".to_string(), expires_at: 3_600_000 })
    }
}

struct DemoDispatchTransport;

impl DispatchTransport for DemoDispatchTransport {
    fn ship(&self, _upload: &replay_core::PendingUpload) -> Result<ShipOutcome, DispatchError> {
        Ok(ShipOutcome::Uploaded)
    }
}

fn demo_device() -> DeviceInfo {
    DeviceInfo {
        platform: "ios".to_string(),
        model: "demo-device".to_string(),
        os_name: "iOS".to_string(),
        os_version: "17.0".to_string(),
        device_fingerprint: "demo-fingerprint".to_string(),
        network_type: "wifi".to_string(),
        network_expensive: false,
        network_constrained: false,
        app_version: app_version().to_string(),
        app_id: "com.example.demo".to_string(),
        screen_width: 390.0,
        screen_height: 844.0,
        screen_scale: 3.0,
        sampled_out: false,
    }
}

fn main() {
    println!("replay-app {}", app_version());
    println!(
        "capture_enabled={} (REPLAY_ENGINE_CAPTURE_ENABLED)",
        capture_enabled_from_env()
    );

    let registrar = DeviceRegistrar::new(
        "https://ingest.example.com/api/ingest/register",
        Arc::new(DemoRegistrarTransport),
    )
    .expect("demo registrar endpoint is valid");

    let credential_request = CredentialRequest {
        api_token: "demo-api-token".to_string(),
        project_id: "demo-project".to_string(),
        device_fingerprint: "demo-fingerprint".to_string(),
        platform: "ios".to_string(),
        app_id: "com.example.demo".to_string(),
    };

    let mut orchestrator = ReplayOrchestrator::new();
    let config = RemoteConfig::default();

    orchestrator
        .begin_replay(
            config,
            &registrar,
            &credential_request,
            "https://ingest.example.com",
            "demo-project",
            0,
        )
        .expect("begin_replay is valid from Idle");
    orchestrator
        .enter_recording(config, NetworkTransport::WifiOrEthernet)
        .expect("enter_recording is valid from MonitoringNetwork");

    let mut telemetry = TelemetryPipeline::new(TelemetryConfig::default())
        .expect("default telemetry config is valid");
    for (timestamp_ms, payload) in [
        (1_000, EventPayload::Navigation { screen: "home".to_string(), view_id: None, entering: true }),
        (2_500, EventPayload::Navigation { screen: "checkout".to_string(), view_id: None, entering: true }),
    ] {
        telemetry.record_event(timestamp_ms, payload.clone());
        orchestrator.record_event(&payload);
    }

    let session_id = orchestrator
        .session()
        .map(|session| session.session_id.clone())
        .expect("session is open while Recording");

    let mut dispatcher = SegmentDispatcher::new(
        Arc::new(DemoDispatchTransport),
        CircuitBreakerConfig::default(),
        64,
    )
    .expect("retry queue capacity is non-zero");

    if let Some(Ok(batch)) = telemetry.drain_batch(demo_device()) {
        let upload = batch_to_upload(&session_id, &batch).expect("batch encodes cleanly");
        match dispatcher.dispatch(upload, 3_000) {
            Ok(ShipOutcome::Uploaded) => println!("shipped one event batch"),
            Ok(ShipOutcome::Skipped) => println!("dispatch skipped"),
            Err(error) => println!("dispatch failed: {error}"),
        }
    }

    orchestrator.end_replay().expect("end_replay is valid from Recording");
    let (session, metrics) = orchestrator.finalize(5_000).expect("finalize is valid from Finalizing");

    let status = project_runtime_status(&orchestrator, &dispatcher);
    println!(
        "session {} closed after {}s",
        session.session_id,
        session.duration_seconds().unwrap_or_default()
    );
    println!(
        "touches={} screens_visited={}",
        metrics.touch_count,
        metrics.unique_screen_count()
    );
    println!("{status:?}");
}
