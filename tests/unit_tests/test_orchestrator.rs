use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use smc_changer_rs::{
    client::discovery::{MountObserver, MountedMedia},
    errors::ChangerError,
};

use crate::unit_tests::common::{DRIVE_ADDR, FakeState, fake_changer};

fn moves(state: &Arc<Mutex<FakeState>>) -> usize {
    state.lock().expect("state").move_cdbs().len()
}

/// Loading the same slot twice issues exactly one MOVE MEDIUM: the second
/// call sees the medium already resident in the drive (source = that slot)
/// and short-circuits without a spurious eject/reseat cycle.
#[tokio::test]
async fn load_is_idempotent() {
    let (changer, state) = fake_changer(FakeState::new(5));

    changer.load(3, 1).await.expect("first load");
    assert_eq!(moves(&state), 1);
    {
        let st = state.lock().expect("state");
        assert!(st.drive_full);
        assert_eq!(st.drive_source, Some(FakeState::slot_addr(3)));
        assert!(!st.full_slots.contains(&FakeState::slot_addr(3)));
    }

    changer.load(3, 1).await.expect("second load");
    assert_eq!(moves(&state), 1, "short-circuit must not move hardware");
}

/// Loading a different slot while the drive is occupied swaps: the current
/// medium goes home first, then the requested one is loaded.
#[tokio::test]
async fn load_swaps_occupied_drive() {
    let (changer, state) = fake_changer(FakeState::new(5));

    changer.load(1, 1).await.expect("load slot 1");
    changer.load(2, 1).await.expect("load slot 2");

    let st = state.lock().expect("state");
    let move_cdbs = st.move_cdbs();
    assert_eq!(move_cdbs.len(), 3);

    // swap step 1: drive -> recorded source (slot 1)
    assert_eq!(&move_cdbs[1][4..8], &{
        let mut b = [0u8; 4];
        b[..2].copy_from_slice(&DRIVE_ADDR.to_be_bytes());
        b[2..].copy_from_slice(&FakeState::slot_addr(1).to_be_bytes());
        b
    });
    // swap step 2: slot 2 -> drive
    assert_eq!(&move_cdbs[2][4..8], &{
        let mut b = [0u8; 4];
        b[..2].copy_from_slice(&FakeState::slot_addr(2).to_be_bytes());
        b[2..].copy_from_slice(&DRIVE_ADDR.to_be_bytes());
        b
    });

    assert!(st.full_slots.contains(&FakeState::slot_addr(1)));
    assert_eq!(st.drive_source, Some(FakeState::slot_addr(2)));
}

#[tokio::test]
async fn load_empty_slot_fails() {
    let mut st = FakeState::new(5);
    st.full_slots.remove(&FakeState::slot_addr(2));
    let (changer, state) = fake_changer(st);

    assert!(matches!(
        changer.load(2, 1).await,
        Err(ChangerError::EmptySource)
    ));
    assert_eq!(moves(&state), 0);
}

/// The drive holds a medium without a valid source address: the engine
/// refuses to guess a return slot.
#[tokio::test]
async fn load_unknown_source_refuses_to_guess() {
    let mut st = FakeState::new(5);
    st.drive_full = true;
    st.drive_source = None;
    let (changer, state) = fake_changer(st);

    assert!(matches!(
        changer.load(1, 1).await,
        Err(ChangerError::UnknownSource)
    ));
    assert_eq!(moves(&state), 0);
}

#[tokio::test]
async fn unload_moves_drive_to_slot() {
    let (changer, state) = fake_changer(FakeState::new(5));
    changer.load(4, 1).await.expect("load");
    changer.unload(4, 1).await.expect("unload");

    let st = state.lock().expect("state");
    assert!(!st.drive_full);
    assert!(st.full_slots.contains(&FakeState::slot_addr(4)));
}

/// A medium sitting in its slot ejects with exactly one move.
#[tokio::test]
async fn eject_from_slot_is_one_move() {
    let (changer, state) = fake_changer(FakeState::new(5));
    changer.eject(2, 1).await.expect("eject");

    let st = state.lock().expect("state");
    assert_eq!(st.move_cdbs().len(), 1);
    assert!(st.ie_full);
    assert!(!st.full_slots.contains(&FakeState::slot_addr(2)));
}

/// A medium sitting in the drive ejects with exactly two moves:
/// drive -> slot, then slot -> import/export port.
#[tokio::test]
async fn eject_from_drive_is_two_moves() {
    let (changer, state) = fake_changer(FakeState::new(5));
    changer.load(2, 1).await.expect("load");

    changer.eject(2, 1).await.expect("eject");

    let st = state.lock().expect("state");
    assert_eq!(st.move_cdbs().len(), 3); // 1 load + 2 eject
    assert!(st.ie_full);
    assert!(!st.drive_full);
}

/// No source info on the drive medium: an empty target slot claims it.
#[tokio::test]
async fn eject_assumes_drive_medium_for_empty_slot() {
    let mut st = FakeState::new(5);
    st.full_slots.remove(&FakeState::slot_addr(2));
    st.drive_full = true;
    st.drive_source = None;
    let (changer, state) = fake_changer(st);

    changer.eject(2, 1).await.expect("eject");
    assert_eq!(moves(&state), 2);
    assert!(state.lock().expect("state").ie_full);
}

#[tokio::test]
async fn eject_empty_slot_fails() {
    let mut st = FakeState::new(5);
    st.full_slots.remove(&FakeState::slot_addr(2));
    let (changer, state) = fake_changer(st);

    assert!(matches!(
        changer.eject(2, 1).await,
        Err(ChangerError::EmptySource)
    ));
    assert_eq!(moves(&state), 0);
}

#[tokio::test]
async fn eject_without_port_fails() {
    let mut st = FakeState::new(5);
    st.no_ie = true;
    let (changer, _state) = fake_changer(st);

    assert!(matches!(
        changer.eject(1, 1).await,
        Err(ChangerError::NotFound(_))
    ));
}

#[tokio::test]
async fn insert_and_retrieve_move_through_port() {
    let mut st = FakeState::new(5);
    st.full_slots.remove(&FakeState::slot_addr(4));
    st.ie_full = true;
    let (changer, state) = fake_changer(st);

    changer.insert(4).await.expect("insert");
    {
        let st = state.lock().expect("state");
        assert!(!st.ie_full);
        assert!(st.full_slots.contains(&FakeState::slot_addr(4)));
    }

    changer.retrieve(4).await.expect("retrieve");
    let st = state.lock().expect("state");
    assert!(st.ie_full);
    assert!(!st.full_slots.contains(&FakeState::slot_addr(4)));
    assert_eq!(st.move_cdbs().len(), 2);
}

#[tokio::test]
async fn indices_are_validated_against_fresh_topology() {
    let (changer, _state) = fake_changer(FakeState::new(5));

    assert!(matches!(
        changer.load(0, 1).await,
        Err(ChangerError::InvalidArgument(_))
    ));
    assert!(matches!(
        changer.load(6, 1).await,
        Err(ChangerError::OutOfRange {
            kind: "slot",
            index: 6,
            count: 5
        })
    ));
    assert!(matches!(
        changer.load(1, 2).await,
        Err(ChangerError::OutOfRange { kind: "drive", .. })
    ));
}

#[tokio::test]
async fn load_without_transport_fails() {
    let mut st = FakeState::new(5);
    st.no_transport = true;
    let (changer, state) = fake_changer(st);

    assert!(matches!(
        changer.load(1, 1).await,
        Err(ChangerError::NoTransport)
    ));
    assert_eq!(moves(&state), 0);
}

#[tokio::test]
async fn transport_override_is_used_verbatim() {
    let mut st = FakeState::new(5);
    st.no_transport = true;
    let (changer, state) = fake_changer(st);
    let changer = changer.with_transport_override(crate::unit_tests::common::TRANSPORT_ADDR);

    changer.load(1, 1).await.expect("load with override");
    assert_eq!(moves(&state), 1);
}

#[tokio::test]
async fn status_queries_report_live_state() {
    let (changer, _state) = fake_changer(FakeState::new(5));

    let slot = changer.slot_status(3).await.expect("slot status");
    assert_eq!(slot.address, FakeState::slot_addr(3));
    assert!(slot.full);

    let drive = changer.drive_status(1).await.expect("drive status");
    assert_eq!(drive.address, DRIVE_ADDR);
    assert!(!drive.full);

    changer.load(3, 1).await.expect("load");
    let drive = changer.drive_status(1).await.expect("drive status");
    assert!(drive.full);
    assert!(drive.valid_source);
    assert_eq!(drive.source_address, FakeState::slot_addr(3));
}

#[tokio::test]
async fn device_info_commands() {
    let (changer, _state) = fake_changer(FakeState::new(5));

    let info = changer.inquiry().await.expect("inquiry");
    assert!(info.is_changer());
    assert_eq!(info.vendor, "Sony");
    assert_eq!(info.product, "VAIOChanger1");
    assert_eq!(info.revision, "1.0");

    changer.test_unit_ready().await.expect("tur");
    changer
        .initialize_element_status()
        .await
        .expect("init element status");

    let page = changer.log_sense(0x2E).await.expect("log sense");
    assert_eq!(page.page_code, 0x2E);
    assert_eq!(page.payload, vec![0xDE, 0xAD, 0xBE, 0xEF]);

    let luns = changer.report_luns().await.expect("report luns");
    assert_eq!(luns, vec![0]);
}

struct CountingObserver {
    released: AtomicUsize,
    waited: AtomicUsize,
}

impl MountObserver for CountingObserver {
    fn release_media(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }

    fn wait_for_media(&self, _timeout: Duration) -> Option<MountedMedia> {
        self.waited.fetch_add(1, Ordering::SeqCst);
        Some(MountedMedia {
            name: "You By Me: Vol. 1".to_string(),
            size: "385.6 MB".to_string(),
        })
    }
}

/// The mount observer is consulted around moves but never drives control
/// flow: the host release fires before drive unloads, and the mount wait
/// only runs after a real load.
#[tokio::test]
async fn mount_observer_wraps_moves() {
    let observer = Arc::new(CountingObserver {
        released: AtomicUsize::new(0),
        waited: AtomicUsize::new(0),
    });
    let (changer, state) = fake_changer(FakeState::new(5));
    let changer = changer.with_mount_observer(observer.clone());

    let mounted = changer.load_verbose(1, 1).await.expect("load");
    assert_eq!(
        mounted.expect("media mounted").name,
        "You By Me: Vol. 1"
    );
    assert_eq!(observer.released.load(Ordering::SeqCst), 0);
    assert_eq!(observer.waited.load(Ordering::SeqCst), 1);

    // short-circuited load: nothing moved, nothing waited on
    let mounted = changer.load_verbose(1, 1).await.expect("load again");
    assert!(mounted.is_none());
    assert_eq!(observer.waited.load(Ordering::SeqCst), 1);

    // swap path releases host media before unloading the drive
    changer.load(2, 1).await.expect("swap");
    assert_eq!(observer.released.load(Ordering::SeqCst), 1);

    changer.unload(2, 1).await.expect("unload");
    assert_eq!(observer.released.load(Ordering::SeqCst), 2);
    assert_eq!(moves(&state), 4); // load + swap (2 moves) + unload
}
