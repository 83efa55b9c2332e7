use std::sync::{Arc, Mutex};
use std::time::Duration;

use scanmux_core::model::{
    ClientEvent, ClientIdentity, IfaceName, NativePnoSettings, NativeScanSettings,
    PnoNetwork, PnoSettings, ScanCapabilities, ScanData, ScanResult, ScanSettings,
    WifiBand, WorkSource,
};
use scanmux_core::scan::runtime::{ScanService, ServiceOptions};
use scanmux_core::scan::{
    EngineEvent, EngineEventSink, PnoConfig, ScanActivityEvent, ScanCoreConfig,
    ScanStatus, ScannerEngine,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{sleep, timeout};

/// Engine that finishes every single scan immediately with canned results.
struct InstantEngine {
    iface: IfaceName,
    results: ScanData,
    single_scans: Mutex<usize>,
}

impl InstantEngine {
    fn new(results: Vec<ScanResult>) -> Arc<Self> {
        Arc::new(Self {
            iface: IfaceName::from("wlan0"),
            results: ScanData::new(WifiBand::BAND_BOTH, results),
            single_scans: Mutex::new(0),
        })
    }

    fn single_scans(&self) -> usize {
        *self.single_scans.lock().unwrap()
    }
}

impl ScannerEngine for InstantEngine {
    fn iface_name(&self) -> &IfaceName {
        &self.iface
    }

    fn scan_capabilities(&self) -> Option<ScanCapabilities> {
        Some(ScanCapabilities {
            max_buckets: 8,
            max_ap_per_scan: 32,
        })
    }

    fn start_single_scan(&self, _settings: &NativeScanSettings, events: EngineEventSink) -> bool {
        *self.single_scans.lock().unwrap() += 1;
        events.emit(EngineEvent::ScanStatus(ScanStatus::ResultsAvailable));
        true
    }

    fn latest_single_scan_results(&self) -> Option<ScanData> {
        Some(self.results.clone())
    }

    fn start_batched_scan(&self, _settings: &NativeScanSettings, _events: EngineEventSink) -> bool {
        true
    }

    fn stop_batched_scan(&self) {}

    fn latest_batched_scan_results(&self, _flush: bool) -> Vec<ScanData> {
        Vec::new()
    }

    fn set_hw_pno_list(&self, _settings: &NativePnoSettings, _events: EngineEventSink) -> bool {
        false
    }

    fn reset_hw_pno_list(&self) -> bool {
        true
    }

    fn is_hw_pno_supported(&self, _is_connected: bool) -> bool {
        false
    }
}

fn spawn(engine: &Arc<InstantEngine>, config: ScanCoreConfig) -> ScanService {
    let engine = Arc::clone(engine);
    ScanService::spawn(
        config,
        ServiceOptions {
            scanning_enabled_on_start: true,
            ..ServiceOptions::default()
        },
        move || vec![engine.clone() as Arc<dyn ScannerEngine>],
    )
}

fn identity() -> ClientIdentity {
    ClientIdentity::new(10_010, "com.example.scanner")
}

async fn next_event(events: &mut UnboundedReceiver<ClientEvent>) -> ClientEvent {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for client event")
        .expect("client channel closed")
}

#[tokio::test]
async fn single_scan_round_trip_fills_cache() {
    let engine = InstantEngine::new(vec![ScanResult::new("home", "00:11", 2412, 0)]);
    let service = spawn(&engine, ScanCoreConfig::default());
    let (client, mut events) = service.register_client(identity()).await.unwrap();

    service
        .start_single_scan(
            client,
            ScanSettings::for_band(WifiBand::BAND_BOTH),
            WorkSource::from_uid(10_010),
        )
        .unwrap();

    assert_eq!(next_event(&mut events).await, ClientEvent::Success);
    let ClientEvent::Results { scans } = next_event(&mut events).await else {
        panic!("expected results");
    };
    assert_eq!(scans[0].results[0].ssid, "home");
    assert_eq!(next_event(&mut events).await, ClientEvent::SingleScanCompleted);

    let cached = service.cached_scan_results().await.unwrap();
    assert_eq!(cached.len(), 1);
    assert_eq!(engine.single_scans(), 1);

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn dropped_receiver_unregisters_client() {
    let engine = InstantEngine::new(Vec::new());
    let service = spawn(&engine, ScanCoreConfig::default());
    let (_client, events) = service.register_client(identity()).await.unwrap();
    assert_eq!(service.snapshot().await.unwrap().clients.len(), 1);

    drop(events);
    let mut remaining = 1;
    for _ in 0..100 {
        remaining = service.snapshot().await.unwrap().clients.len();
        if remaining == 0 {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(remaining, 0);

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn activity_subscribers_see_admin_toggle() {
    let engine = InstantEngine::new(Vec::new());
    let service = ScanService::spawn(
        ScanCoreConfig::default(),
        ServiceOptions::default(),
        {
            let engine = Arc::clone(&engine);
            move || vec![engine.clone() as Arc<dyn ScannerEngine>]
        },
    );
    let mut activity = service.subscribe_activity();

    service.set_scanning_enabled(true).unwrap();
    let event = timeout(Duration::from_secs(5), activity.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event, ScanActivityEvent::ScanningEnabled { enabled: true });
    assert!(service.snapshot().await.unwrap().scanning_enabled);

    service.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn software_pno_rescans_on_schedule() {
    let engine = InstantEngine::new(vec![
        ScanResult::new("cafe", "00:21", 2437, 0),
        ScanResult::new("home", "00:22", 5180, 0),
    ]);
    let config = ScanCoreConfig {
        pno: PnoConfig {
            software_pno_enabled: true,
            ..PnoConfig::default()
        },
        ..ScanCoreConfig::default()
    };
    let service = spawn(&engine, config);
    let (client, mut events) = service.register_client(identity()).await.unwrap();

    let mut settings = ScanSettings::for_band(WifiBand::BAND_BOTH);
    settings.period_ms = 20_000;
    service
        .start_pno_scan(
            client,
            settings,
            PnoSettings {
                networks: vec![PnoNetwork::new("home")],
                ..PnoSettings::default()
            },
        )
        .unwrap();

    assert_eq!(next_event(&mut events).await, ClientEvent::Success);
    let ClientEvent::PnoNetworkFound { results } = next_event(&mut events).await else {
        panic!("expected a network match");
    };
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].ssid, "home");
    assert_eq!(engine.single_scans(), 1);

    sleep(Duration::from_secs(21)).await;
    assert!(matches!(
        next_event(&mut events).await,
        ClientEvent::PnoNetworkFound { .. }
    ));
    assert_eq!(engine.single_scans(), 2);

    service.shutdown().await.unwrap();
}
