//! Integration tests for DeviceClient against the mock scanner.
//!
//! The scanner's command log is the witness for "never reaches the
//! transport": a rejected call is followed by an accepted one, and once the
//! accepted call's reply has arrived the log must hold only that command.

use bioscan_core::{
    CaptureStatus, ClearTarget, DeviceIdentity, FrameShape, LedBrightness, LedControl, Modality,
    NfiqScore, PowerOffTimeout, SecurityLevel, SlotIndex,
};
use bioscan_device::mock::{ConnectBehavior, MockScanner, MockScannerHandle};
use bioscan_device::{
    ClientConfig, ClientError, ClientEvent, ConnectionState, DeviceClient, EventStream, Observer,
};
use bioscan_protocol::{Command, DeviceEvent, FrameImage};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

async fn next_event(events: &mut EventStream) -> ClientEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event stream ended")
}

async fn next_device_event(events: &mut EventStream) -> DeviceEvent {
    match next_event(events).await {
        ClientEvent::Device(event) => event,
        other => panic!("Expected a device event, got {other:?}"),
    }
}

fn new_client() -> (DeviceClient, MockScannerHandle, EventStream) {
    let (scanner, handle) = MockScanner::new();
    let client = DeviceClient::new(scanner, ClientConfig::default().with_label("test"));
    let events = client.subscribe().unwrap();
    (client, handle, events)
}

async fn connected_client() -> (DeviceClient, MockScannerHandle, EventStream) {
    let (client, handle, mut events) = new_client();
    client.connect().unwrap();
    assert_eq!(next_event(&mut events).await, ClientEvent::Connected);
    assert_eq!(client.connection_state(), ConnectionState::Connected);
    (client, handle, events)
}

type Operation = fn(&DeviceClient) -> bioscan_device::Result<()>;

fn op(name: &'static str, operation: Operation) -> (&'static str, Operation) {
    (name, operation)
}

/// Every operation that needs a connected session.
fn session_operations() -> Vec<(&'static str, Operation)> {
    vec![
        op("get_battery_percentage", |c: &DeviceClient| c.get_battery_percentage()),
        op("get_device_serial_number", |c: &DeviceClient| c.get_device_serial_number()),
        op("get_firmware_version", |c: &DeviceClient| c.get_firmware_version()),
        op("get_model_number", |c: &DeviceClient| c.get_model_number()),
        op("get_reader_description", |c: &DeviceClient| c.get_reader_description()),
        op("start_capture_one_finger", |c: &DeviceClient| {
            c.start_capture_one_finger(SlotIndex::new(0))
        }),
        op("start_capture_two_finger", |c: &DeviceClient| {
            c.start_capture_two_finger(SlotIndex::new(0))
        }),
        op("start_capture_four_finger", |c: &DeviceClient| {
            c.start_capture_four_finger(SlotIndex::new(0))
        }),
        op("start_capture_roll_finger", |c: &DeviceClient| {
            c.start_capture_roll_finger(SlotIndex::new(0))
        }),
        op("start_capture_iris", |c: &DeviceClient| c.start_capture_iris()),
        op("cancel_fp_capture", |c: &DeviceClient| c.cancel_fp_capture()),
        op("cancel_iris_capture", |c: &DeviceClient| c.cancel_iris_capture()),
        op("set_fp_power_on", |c: &DeviceClient| c.set_fp_power_on()),
        op("set_fp_power_off", |c: &DeviceClient| c.set_fp_power_off()),
        op("get_fp_power_status", |c: &DeviceClient| c.get_fp_power_status()),
        op("set_iris_power_on", |c: &DeviceClient| c.set_iris_power_on()),
        op("set_iris_power_off", |c: &DeviceClient| c.set_iris_power_off()),
        op("get_iris_power_status", |c: &DeviceClient| c.get_iris_power_status()),
        op("set_led_brightness", |c: &DeviceClient| {
            c.set_led_brightness(LedBrightness::new(10).unwrap())
        }),
        op("get_led_brightness", |c: &DeviceClient| c.get_led_brightness()),
        op("set_minimum_nfiq_score", |c: &DeviceClient| {
            c.set_minimum_nfiq_score(NfiqScore::new(3).unwrap())
        }),
        op("get_power_off_mode", |c: &DeviceClient| c.get_power_off_mode()),
        op("set_power_off_mode", |c: &DeviceClient| {
            c.set_power_off_mode(PowerOffTimeout::from_secs(60).unwrap())
        }),
        op("set_led_control", |c: &DeviceClient| {
            c.set_led_control(LedControl::new(1, 1, 0, 0).unwrap())
        }),
        op("clear_saved_images", |c: &DeviceClient| c.clear_saved_images(ClearTarget::All)),
        op("get_nfiq_score", |c: &DeviceClient| c.get_nfiq_score(SlotIndex::new(0))),
        op("get_segmented_image", |c: &DeviceClient| c.get_segmented_image(SlotIndex::new(0))),
        op("get_wsq_image", |c: &DeviceClient| c.get_wsq_image(SlotIndex::new(0), true)),
        op("is_finger_duplicated", |c: &DeviceClient| {
            c.is_finger_duplicated(SlotIndex::new(0), SecurityLevel::default())
        }),
        op("start_firmware_update", |c: &DeviceClient| {
            c.start_firmware_update(vec![1u8, 2, 3], false)
        }),
    ]
}

#[tokio::test]
async fn test_battery_scenario() {
    let (client, handle, mut events) = connected_client().await;

    client.get_battery_percentage().unwrap();
    match next_device_event(&mut events).await {
        DeviceEvent::BatteryPercentage(value) => assert!(value <= 100),
        other => panic!("Expected battery percentage, got {other:?}"),
    }

    client.disconnect().unwrap();
    // Exactly one reply: the next event is the disconnect.
    assert_eq!(next_event(&mut events).await, ClientEvent::Disconnected);
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);

    let error = client.get_battery_percentage().unwrap_err();
    assert!(matches!(error, ClientError::InvalidState { .. }));
    assert_eq!(error.state(), Some("disconnected"));
    assert_eq!(handle.sent_commands(), vec![Command::GetBatteryPercentage]);
}

#[tokio::test]
async fn test_operations_while_disconnected_never_reach_transport() {
    let (client, handle, _events) = new_client();

    for (name, operation) in session_operations() {
        let result = operation(&client);
        assert!(
            matches!(result, Err(ClientError::InvalidState { .. })),
            "{name} returned {result:?}"
        );
    }

    tokio::task::yield_now().await;
    assert!(handle.sent_commands().is_empty());
    assert_eq!(handle.open_count(), 0);
}

#[tokio::test]
async fn test_operations_while_connecting_fail_locally() {
    let (client, handle, _events) = new_client();
    handle.set_connect_behavior(ConnectBehavior::Hang);
    client.connect().unwrap();

    for (name, operation) in session_operations() {
        let result = operation(&client);
        assert_eq!(
            result.unwrap_err().state(),
            Some("connecting"),
            "{name} was not rejected"
        );
    }

    assert!(handle.sent_commands().is_empty());
}

#[tokio::test]
async fn test_replies_arrive_in_command_order() {
    let (client, _handle, mut events) = connected_client().await;

    client.get_battery_percentage().unwrap();
    client.get_device_serial_number().unwrap();
    client.get_firmware_version().unwrap();
    client.get_model_number().unwrap();
    client.get_reader_description().unwrap();
    client.get_led_brightness().unwrap();
    client.get_power_off_mode().unwrap();
    client.get_fp_power_status().unwrap();
    client.get_iris_power_status().unwrap();

    let mut names = Vec::new();
    for _ in 0..9 {
        names.push(next_event(&mut events).await.name());
    }
    assert_eq!(
        names,
        vec![
            "battery_percentage",
            "serial_number",
            "firmware_version",
            "model_number",
            "reader_description",
            "led_brightness",
            "power_off_mode",
            "fp_power_status",
            "iris_power_status",
        ]
    );
}

#[tokio::test]
async fn test_one_finger_capture_into_slot_three() {
    let (client, handle, mut events) = connected_client().await;
    handle.set_preview_frames(3);

    client.start_capture_one_finger(SlotIndex::new(3)).unwrap();
    assert!(client.is_fp_capturing());
    let request = client.active_capture(Modality::Fingerprint).unwrap();
    assert_eq!(request.slot, Some(SlotIndex::new(3)));
    assert!(!request.cancel_requested);

    assert!(matches!(
        next_device_event(&mut events).await,
        DeviceEvent::FpCaptureStatus { status: CaptureStatus::STARTED, .. }
    ));

    let mut previews = 0;
    loop {
        match next_device_event(&mut events).await {
            DeviceEvent::Streaming { image } => {
                assert!(image.is_consistent());
                previews += 1;
            }
            DeviceEvent::LastFrame { shape, saved_at, .. } => {
                assert_eq!(shape, FrameShape::Flat);
                assert_eq!(saved_at, SlotIndex::new(3));
                break;
            }
            other => panic!("Unexpected event during capture: {other:?}"),
        }
    }

    assert_eq!(previews, 3);
    assert!(!client.is_fp_capturing());
}

#[tokio::test]
async fn test_rolled_capture_streams_rolled_frames() {
    let (client, handle, mut events) = connected_client().await;
    handle.set_preview_frames(2);
    handle.set_raw_frames(true);

    client.start_capture_roll_finger(SlotIndex::new(1)).unwrap();
    next_device_event(&mut events).await;

    for expected_state in 0..2 {
        match next_device_event(&mut events).await {
            DeviceEvent::StreamingRolled { rolling_state, .. } => {
                assert_eq!(rolling_state, expected_state)
            }
            other => panic!("Expected a rolled preview, got {other:?}"),
        }
    }

    match next_device_event(&mut events).await {
        DeviceEvent::LastFrame { shape, raw, .. } => {
            assert_eq!(shape, FrameShape::Rolled);
            assert!(raw.is_some());
        }
        other => panic!("Expected the last frame, got {other:?}"),
    }
}

#[tokio::test]
async fn test_iris_capture_completes() {
    let (client, _handle, mut events) = connected_client().await;

    client.start_capture_iris().unwrap();
    assert!(client.is_iris_capturing());
    assert_eq!(client.active_capture(Modality::Iris).unwrap().slot, None);

    let statuses: Vec<CaptureStatus> = [
        next_device_event(&mut events).await,
        next_device_event(&mut events).await,
        next_device_event(&mut events).await,
    ]
    .into_iter()
    .map(|event| match event {
        DeviceEvent::IrisCaptureStatus { status, .. } => status,
        other => panic!("Expected iris status, got {other:?}"),
    })
    .collect();

    assert_eq!(
        statuses,
        vec![
            CaptureStatus::STARTED,
            CaptureStatus::IN_PROGRESS,
            CaptureStatus::COMPLETED
        ]
    );
    assert!(!client.is_iris_capturing());
}

#[tokio::test]
async fn test_second_capture_on_same_sensor_is_rejected() {
    let (client, handle, mut events) = connected_client().await;
    handle.hold_captures(true);

    client.start_capture_four_finger(SlotIndex::new(0)).unwrap();
    let error = client.start_capture_one_finger(SlotIndex::new(1)).unwrap_err();
    assert_eq!(
        error,
        ClientError::invalid_state("start fingerprint capture", "a fingerprint capture is active")
    );

    // The other sensor is independent.
    client.start_capture_iris().unwrap();
    assert!(client.start_capture_iris().is_err());

    next_device_event(&mut events).await;
    next_device_event(&mut events).await;

    let starts = handle
        .sent_commands()
        .into_iter()
        .filter(Command::starts_capture)
        .count();
    assert_eq!(starts, 2);
}

#[tokio::test]
async fn test_cancel_without_capture_makes_no_transport_call() {
    let (client, handle, mut events) = connected_client().await;

    assert_eq!(
        client.cancel_fp_capture(),
        Err(ClientError::NoActiveCapture {
            modality: Modality::Fingerprint
        })
    );
    assert_eq!(
        client.cancel_iris_capture(),
        Err(ClientError::NoActiveCapture {
            modality: Modality::Iris
        })
    );

    client.get_model_number().unwrap();
    next_event(&mut events).await;
    assert_eq!(handle.sent_commands(), vec![Command::GetModelNumber]);
}

#[tokio::test]
async fn test_cancel_is_sent_once_and_acknowledged() {
    let (client, handle, mut events) = connected_client().await;
    handle.hold_captures(true);

    client.start_capture_two_finger(SlotIndex::new(5)).unwrap();
    next_device_event(&mut events).await;

    client.cancel_fp_capture().unwrap();
    client.cancel_fp_capture().unwrap();
    assert!(client.active_capture(Modality::Fingerprint).unwrap().cancel_requested);

    assert_eq!(
        next_device_event(&mut events).await,
        DeviceEvent::FpCaptureCancelled
    );
    assert!(!client.is_fp_capturing());

    let cancels = handle
        .sent_commands()
        .into_iter()
        .filter(|command| *command == Command::CancelFpCapture)
        .count();
    assert_eq!(cancels, 1);

    // Nothing is left to cancel.
    assert!(matches!(
        client.cancel_fp_capture(),
        Err(ClientError::NoActiveCapture { .. })
    ));
}

#[tokio::test]
async fn test_disconnect_during_capture_yields_one_synthetic_cancel() {
    let (client, handle, mut events) = connected_client().await;
    handle.hold_captures(true);

    client.start_capture_one_finger(SlotIndex::new(0)).unwrap();
    client.start_capture_iris().unwrap();
    next_device_event(&mut events).await;
    next_device_event(&mut events).await;

    client.disconnect().unwrap();
    assert!(!client.is_fp_capturing());
    assert!(!client.is_iris_capturing());

    assert_eq!(
        next_event(&mut events).await,
        ClientEvent::Device(DeviceEvent::FpCaptureCancelled)
    );
    assert_eq!(
        next_event(&mut events).await,
        ClientEvent::Device(DeviceEvent::IrisCaptureCancelled)
    );
    assert_eq!(next_event(&mut events).await, ClientEvent::Disconnected);

    // A late last frame from the old link must not become a second terminal event.
    handle.release_fp_capture();
    handle.release_iris_capture();

    handle.hold_captures(false);
    client.connect().unwrap();
    assert_eq!(next_event(&mut events).await, ClientEvent::Connected);
    client.get_battery_percentage().unwrap();
    assert!(matches!(
        next_device_event(&mut events).await,
        DeviceEvent::BatteryPercentage(_)
    ));
}

#[tokio::test]
async fn test_led_brightness_round_trips_through_device() {
    let (client, handle, mut events) = connected_client().await;

    client
        .set_led_brightness(LedBrightness::new(7).unwrap())
        .unwrap();
    client.get_led_brightness().unwrap();

    assert_eq!(
        next_device_event(&mut events).await,
        DeviceEvent::LedBrightnessSet(7)
    );
    assert_eq!(
        next_device_event(&mut events).await,
        DeviceEvent::LedBrightness(7)
    );
    assert_eq!(
        handle.sent_commands(),
        vec![
            Command::SetLedBrightness(LedBrightness::new(7).unwrap()),
            Command::GetLedBrightness
        ]
    );

    // Every get goes to the device.
    client.get_led_brightness().unwrap();
    next_event(&mut events).await;
    assert_eq!(handle.sent_commands().len(), 3);
}

#[tokio::test]
async fn test_settings_replies() {
    let (client, handle, mut events) = connected_client().await;

    client
        .set_minimum_nfiq_score(NfiqScore::new(2).unwrap())
        .unwrap();
    client
        .set_power_off_mode(PowerOffTimeout::from_secs(900).unwrap())
        .unwrap();
    client
        .set_led_control(LedControl::new(3, 2, 1, 0).unwrap().with_blink(200, 300))
        .unwrap();

    assert_eq!(
        next_device_event(&mut events).await,
        DeviceEvent::MinimumNfiqScoreSet(2)
    );
    assert_eq!(
        next_device_event(&mut events).await,
        DeviceEvent::PowerOffModeSet(900)
    );
    assert_eq!(
        next_device_event(&mut events).await,
        DeviceEvent::LedControlSet {
            power: 3,
            fp: 2,
            com: 1,
            iris: 0
        }
    );
    assert_eq!(handle.minimum_nfiq(), 2);
    assert_eq!(handle.power_off_secs(), 900);
}

#[tokio::test]
async fn test_power_off_rejected_while_capturing() {
    let (client, handle, mut events) = connected_client().await;
    handle.hold_captures(true);

    client.start_capture_one_finger(SlotIndex::new(0)).unwrap();
    next_device_event(&mut events).await;

    let error = client.set_fp_power_off().unwrap_err();
    assert_eq!(
        error.to_string(),
        "Cannot power off fingerprint sensor while a fingerprint capture is active"
    );

    // Powering on, or the other sensor, is fine.
    client.set_fp_power_on().unwrap();
    client.set_iris_power_off().unwrap();
    assert_eq!(next_device_event(&mut events).await, DeviceEvent::FpPowerOn(true));
    assert_eq!(next_device_event(&mut events).await, DeviceEvent::IrisPowerOff);
    assert!(!handle.iris_power());

    assert!(
        !handle
            .sent_commands()
            .contains(&Command::SetFpPower { on: false })
    );
}

#[tokio::test]
async fn test_device_identity_follows_replies() {
    let (client, handle, mut events) = connected_client().await;
    handle.set_identity("SN-1234", "FAP45-IR", "2.0.7");

    client.get_device_serial_number().unwrap();
    client.get_model_number().unwrap();
    client.get_firmware_version().unwrap();
    for _ in 0..3 {
        next_event(&mut events).await;
    }

    assert_eq!(
        client.device_identity(),
        DeviceIdentity::default()
            .with_serial_number("SN-1234")
            .with_model("FAP45-IR")
            .with_firmware_version("2.0.7")
    );
}

#[tokio::test]
async fn test_saved_image_operations() {
    let (client, handle, mut events) = connected_client().await;
    handle.set_preview_frames(0);
    handle.set_capture_nfiq(2);
    handle.set_duplicate_indicator(1);

    client.start_capture_one_finger(SlotIndex::new(2)).unwrap();
    next_device_event(&mut events).await;
    next_device_event(&mut events).await;

    client.get_nfiq_score(SlotIndex::new(2)).unwrap();
    client.get_segmented_image(SlotIndex::new(2)).unwrap();
    client.get_wsq_image(SlotIndex::new(2), true).unwrap();
    client
        .is_finger_duplicated(SlotIndex::new(2), SecurityLevel::new(5).unwrap())
        .unwrap();
    client
        .clear_saved_images(ClearTarget::Slot(SlotIndex::new(2)))
        .unwrap();

    assert_eq!(
        next_device_event(&mut events).await,
        DeviceEvent::NfiqScore {
            score: 2,
            saved_at: SlotIndex::new(2)
        }
    );
    match next_device_event(&mut events).await {
        DeviceEvent::SegmentedImage { data, saved_at } => {
            assert_eq!(saved_at, SlotIndex::new(2));
            assert!(!data.is_empty());
        }
        other => panic!("Expected segmented image, got {other:?}"),
    }
    assert!(matches!(
        next_device_event(&mut events).await,
        DeviceEvent::WsqImage { .. }
    ));
    assert_eq!(
        next_device_event(&mut events).await,
        DeviceEvent::FingerDuplicated { indicator: 1 }
    );
    assert_eq!(
        next_device_event(&mut events).await,
        DeviceEvent::SavedImagesCleared(ClearTarget::Slot(SlotIndex::new(2)))
    );
    assert!(handle.saved_slots().is_empty());
}

#[tokio::test]
async fn test_firmware_update_rules() {
    let (client, handle, mut events) = connected_client().await;
    handle.set_firmware_result(0);

    assert_eq!(
        client.start_firmware_update(Vec::<u8>::new(), false),
        Err(ClientError::InvalidArgument(bioscan_core::Error::EmptyFirmware))
    );

    client.start_firmware_update(vec![0xab; 4096], true).unwrap();
    assert!(matches!(
        client.start_firmware_update(vec![0xab; 16], false),
        Err(ClientError::InvalidState { .. })
    ));

    assert_eq!(
        next_device_event(&mut events).await,
        DeviceEvent::FirmwareTransferCompleted { result: 0 }
    );

    // Finished, so another transfer may start.
    client.start_firmware_update(vec![0x01], false).unwrap();
    next_event(&mut events).await;

    let transfers = handle
        .sent_commands()
        .into_iter()
        .filter(|command| matches!(command, Command::StartFirmwareUpdate { .. }))
        .count();
    assert_eq!(transfers, 2);
}

#[tokio::test]
async fn test_failing_status_ends_capture_and_maps_to_rejection() {
    let (client, handle, mut events) = connected_client().await;
    handle.hold_captures(true);

    client.start_capture_one_finger(SlotIndex::new(0)).unwrap();
    next_device_event(&mut events).await;

    assert!(handle.fail_fp_capture(CaptureStatus::QUALITY_OR_LIGHTING));
    let event = next_event(&mut events).await;
    assert!(matches!(
        event.as_error(),
        Some(ClientError::DeviceRejected { code: 5, .. })
    ));
    assert!(!client.is_fp_capturing());
}

#[tokio::test]
async fn test_frames_without_active_capture_are_dropped() {
    let (client, handle, mut events) = connected_client().await;

    handle.inject(DeviceEvent::Streaming {
        image: FrameImage::new(2, 2, vec![0u8; 4]),
    });
    handle.inject(DeviceEvent::FpCaptureCancelled);
    client.get_battery_percentage().unwrap();

    assert!(matches!(
        next_device_event(&mut events).await,
        DeviceEvent::BatteryPercentage(_)
    ));
}

#[tokio::test]
async fn test_connection_failure_returns_to_disconnected() {
    let (client, handle, mut events) = new_client();
    handle.set_connect_behavior(ConnectBehavior::Fail("port busy".to_string()));

    client.connect().unwrap();
    assert_eq!(
        next_event(&mut events).await,
        ClientEvent::ConnectionError {
            message: "port busy".to_string()
        }
    );
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);

    let states: Vec<ConnectionState> = client
        .transition_history()
        .into_iter()
        .map(|record| record.to)
        .collect();
    assert_eq!(
        states,
        vec![
            ConnectionState::Connecting,
            ConnectionState::Error,
            ConnectionState::Disconnected
        ]
    );

    // The session stays usable for a retry.
    handle.set_connect_behavior(ConnectBehavior::Succeed);
    client.connect().unwrap();
    assert_eq!(next_event(&mut events).await, ClientEvent::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_connection_timeout() {
    let (scanner, handle) = MockScanner::new();
    handle.set_connect_behavior(ConnectBehavior::Hang);
    let config = ClientConfig::default().with_connect_timeout(Duration::from_millis(500));
    let client = DeviceClient::new(scanner, config);
    let mut events = client.subscribe().unwrap();

    client.connect().unwrap();
    assert_eq!(
        next_event(&mut events).await,
        ClientEvent::ConnectionTimeout { duration_ms: 500 }
    );
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    assert!(!handle.is_open());
}

#[tokio::test(start_paused = true)]
async fn test_open_abandoned_by_disconnect_is_closed_silently() {
    let (client, handle, mut events) = new_client();
    handle.set_connect_behavior(ConnectBehavior::Delay(Duration::from_secs(1)));

    client.connect().unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    client.disconnect().unwrap();
    assert_eq!(next_event(&mut events).await, ClientEvent::Disconnected);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(events.try_recv().is_none());
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    assert_eq!(handle.open_count(), 0);
    assert!(!handle.is_open());
}

#[tokio::test]
async fn test_link_failure_cancels_captures() {
    let (client, handle, mut events) = connected_client().await;
    handle.hold_captures(true);

    client.start_capture_iris().unwrap();
    next_device_event(&mut events).await;

    handle.fail_link("cable pulled");
    assert_eq!(
        next_event(&mut events).await,
        ClientEvent::Device(DeviceEvent::IrisCaptureCancelled)
    );
    assert_eq!(
        next_event(&mut events).await,
        ClientEvent::ConnectionError {
            message: "cable pulled".to_string()
        }
    );
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    assert!(!client.is_iris_capturing());

    let states: Vec<ConnectionState> = client
        .transition_history()
        .into_iter()
        .map(|record| record.to)
        .collect();
    assert_eq!(
        &states[states.len() - 2..],
        &[ConnectionState::Error, ConnectionState::Disconnected]
    );
}

#[tokio::test]
async fn test_close_during_capture() {
    let (client, handle, mut events) = connected_client().await;
    handle.hold_captures(true);

    client.start_capture_one_finger(SlotIndex::new(0)).unwrap();
    next_device_event(&mut events).await;

    client.close_and_wait().await.unwrap();

    assert_eq!(
        events.recv().await,
        Some(ClientEvent::Device(DeviceEvent::FpCaptureCancelled))
    );
    assert_eq!(events.recv().await, Some(ClientEvent::Disconnected));
    assert_eq!(events.recv().await, None);

    assert!(!handle.is_open());
    assert_eq!(client.get_battery_percentage(), Err(ClientError::NotInitialized));
    assert_eq!(client.disconnect(), Err(ClientError::NotInitialized));
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<ClientEvent>>,
}

impl Observer for Recorder {
    fn on_event(&self, event: &ClientEvent) {
        self.events.lock().push(event.clone());
    }
}

async fn wait_for(recorder: &Recorder, count: usize) {
    for _ in 0..500 {
        if recorder.events.lock().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("observer saw {} events, expected {count}", recorder.events.lock().len());
}

#[tokio::test]
async fn test_observer_receives_events_in_order() {
    let (scanner, _handle) = MockScanner::new();
    let client = DeviceClient::new(scanner, ClientConfig::default());
    let recorder = Arc::new(Recorder::default());
    client.set_observer(&recorder).unwrap();

    client.connect().unwrap();
    wait_for(&recorder, 1).await;
    client.get_reader_description().unwrap();
    client.get_battery_percentage().unwrap();
    wait_for(&recorder, 3).await;

    let names: Vec<&str> = recorder.events.lock().iter().map(ClientEvent::name).collect();
    assert_eq!(names, vec!["connected", "reader_description", "battery_percentage"]);
}

#[tokio::test]
async fn test_dropped_observer_is_tolerated() {
    let (scanner, _handle) = MockScanner::new();
    let client = DeviceClient::new(scanner, ClientConfig::default());
    let recorder = Arc::new(Recorder::default());
    client.set_observer(&recorder).unwrap();

    client.connect().unwrap();
    wait_for(&recorder, 1).await;
    drop(recorder);

    client.get_battery_percentage().unwrap();
    client.get_model_number().unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    client.close_and_wait().await.unwrap();
}

#[tokio::test]
async fn test_cleared_observer_receives_nothing_more() {
    let (scanner, _handle) = MockScanner::new();
    let client = DeviceClient::new(scanner, ClientConfig::default());
    let recorder = Arc::new(Recorder::default());
    client.set_observer(&recorder).unwrap();

    client.connect().unwrap();
    wait_for(&recorder, 1).await;
    client.clear_observer().unwrap();

    client.get_battery_percentage().unwrap();
    client.close_and_wait().await.unwrap();

    let names: Vec<&str> = recorder.events.lock().iter().map(ClientEvent::name).collect();
    assert_eq!(names, vec!["connected"]);
}
