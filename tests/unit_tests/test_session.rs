use std::sync::{Arc, Mutex};

use smc_changer_rs::{
    cfg::config::Config,
    client::{
        discovery::{ChangerInfo, DeviceProvider},
        session::ChangerSession,
    },
    errors::{ChangerError, Result},
    transport::{SyncTransport, Transport},
};

use crate::unit_tests::common::{FakeDevice, FakeState};

struct FakeProvider {
    devices: Vec<ChangerInfo>,
    state: Arc<Mutex<FakeState>>,
    fail_open: bool,
}

impl FakeProvider {
    fn new(state: FakeState) -> Self {
        Self {
            devices: vec![ChangerInfo {
                vendor: "Sony".to_string(),
                product: "VAIOChanger1".to_string(),
                path: "IOService:/fake/changer".to_string(),
            }],
            state: Arc::new(Mutex::new(state)),
            fail_open: false,
        }
    }
}

impl DeviceProvider for FakeProvider {
    fn enumerate(&self) -> Result<Vec<ChangerInfo>> {
        Ok(self.devices.clone())
    }

    fn open(&self, _info: &ChangerInfo) -> Result<Transport> {
        if self.fail_open {
            return Err(ChangerError::OpenFailed("user client rejected".into()));
        }
        let device = FakeDevice {
            state: Arc::clone(&self.state),
        };
        Ok(Transport::Sync(SyncTransport::new(Box::new(device))))
    }
}

/// Opening a session probes the device with TEST UNIT READY before handing
/// it to the caller.
#[tokio::test]
async fn open_gates_on_ready_probe() {
    let provider = FakeProvider::new(FakeState::new(5));
    let state = Arc::clone(&provider.state);

    let session = ChangerSession::open(&provider, Config::default())
        .await
        .expect("open");
    assert_eq!(state.lock().expect("state").cdb_log, vec![vec![0u8; 6]]);
    session.close();
}

#[tokio::test]
async fn open_skips_probe_when_configured() {
    let provider = FakeProvider::new(FakeState::new(5));
    let state = Arc::clone(&provider.state);

    let mut cfg = Config::default();
    cfg.device.skip_ready_probe = true;
    let _session = ChangerSession::open(&provider, cfg).await.expect("open");
    assert!(state.lock().expect("state").cdb_log.is_empty());
}

#[tokio::test]
async fn open_propagates_open_failure() {
    let mut provider = FakeProvider::new(FakeState::new(5));
    provider.fail_open = true;

    assert!(matches!(
        ChangerSession::open(&provider, Config::default()).await,
        Err(ChangerError::OpenFailed(_))
    ));
}

#[tokio::test]
async fn open_rejects_identity_mismatch() {
    let provider = FakeProvider::new(FakeState::new(5));

    let mut cfg = Config::default();
    cfg.device.vendor = Some("Plasmon".to_string());
    assert!(matches!(
        ChangerSession::open(&provider, cfg).await,
        Err(ChangerError::NotFound(_))
    ));
}
