//! Integration tests for the controller pipeline.
//!
//! These drive the public API end to end: alarm text is parsed, turned into
//! operations, compiled into frames and handed to an in-memory transport
//! that records what it was given.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use magic_led_controller::alarm::{self, AlarmKind};
use magic_led_controller::transport::NotificationHandler;
use magic_led_controller::*;

/// Records transmitted frames; fails the write with index `fail_at`
#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<Vec<u8>>>,
    fail_at: Option<usize>,
    attempts: Mutex<usize>,
    handler: Mutex<Option<NotificationHandler>>,
}

impl RecordingTransport {
    fn failing_at(index: usize) -> Self {
        Self {
            fail_at: Some(index),
            ..Self::default()
        }
    }

    fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    fn notify(&self, bytes: &[u8]) {
        if let Some(handler) = self.handler.lock().unwrap().as_ref() {
            handler(bytes.to_vec());
        }
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn transmit(&self, frame: &Frame) -> Result<()> {
        let mut attempts = self.attempts.lock().unwrap();
        let index = *attempts;
        *attempts += 1;
        if self.fail_at == Some(index) {
            return Err(Error::BleError("link lost".into()));
        }
        self.sent.lock().unwrap().push(frame.to_bytes());
        Ok(())
    }

    async fn subscribe(&self, on_notification: NotificationHandler) -> Result<()> {
        *self.handler.lock().unwrap() = Some(on_notification);
        Ok(())
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[tokio::test]
async fn batch_is_sent_in_order_with_consecutive_sequences() {
    let mut controller = Controller::new(RecordingTransport::default());
    let ops = [
        Operation::rgb(255, 0, 0),
        Operation::Power { on: false },
        Operation::Power { on: true },
    ];

    let frames = controller.execute_batch(&ops).await.unwrap();
    let sent = controller.transport().sent();

    assert_eq!(frames.len(), 3);
    assert_eq!(sent.len(), 3);
    assert_eq!(
        hex(&sent[0]),
        "00 00 80 00 00 08 09 0B 31 FF 00 00 00 00 0F 38"
    );
    assert_eq!(
        hex(&sent[1]),
        "00 01 80 00 00 0D 0E 0B 3B 24 00 00 00 00 00 00 00 00 00 00 27"
    );
    assert_eq!(
        hex(&sent[2]),
        "00 02 80 00 00 0D 0E 0B 3B 23 00 00 00 00 00 00 00 00 00 00 28"
    );
    assert_eq!(controller.compiler().counter().current(), 3);
}

#[tokio::test]
async fn transport_failure_aborts_remaining_operations() {
    let mut controller = Controller::new(RecordingTransport::failing_at(1));
    let ops = [
        Operation::Power { on: true },
        Operation::rgb(0, 0, 255),
        Operation::Power { on: false },
    ];

    let result = controller.execute_batch(&ops).await;

    assert!(matches!(result, Err(Error::BleError(_))));
    let sent = controller.transport().sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0][1], 0x00);
    // The failed frame still consumed its sequence number
    assert_eq!(controller.compiler().counter().current(), 2);
}

#[tokio::test]
async fn overflowing_table_is_rejected_before_anything_is_sent() {
    let mut controller = Controller::new(RecordingTransport::default());
    let spec = vec!["07:00"; 17].join(";");
    let table = alarm::parse(&spec, AlarmKind::Off).unwrap();
    let ops = [Operation::Power { on: true }, table.into_operation()];

    let result = controller.execute_batch(&ops).await;

    assert!(matches!(
        result,
        Err(Error::TableOverflow { count: 17, max: 16 })
    ));
    assert!(controller.transport().sent().is_empty());
    assert_eq!(controller.compiler().counter().current(), 0);
}

#[test]
fn malformed_alarm_batch_is_rejected_whole() {
    let result = alarm::parse("07:00,255,0,0;7h30,0,0,255", AlarmKind::Rgb);
    match result {
        Err(Error::MalformedAlarmSyntax { fragment, .. }) => assert_eq!(fragment, "7h30,0,0,255"),
        other => panic!("expected a syntax error, got {:?}", other),
    }
}

#[tokio::test]
async fn alarm_text_compiles_to_timer_frames() {
    let mut controller = Controller::with_compiler(
        RecordingTransport::default(),
        FrameCompiler::with_counter(SequenceCounter::starting_at(0x05)),
    );

    let on = alarm::parse("07:30/0011111#80%20", AlarmKind::On)
        .unwrap()
        .into_operation();
    let effect = alarm::parse("21:00,fade7/once%10", AlarmKind::Effect)
        .unwrap()
        .into_operation();
    controller.execute_batch(&[on, effect]).await.unwrap();

    let sent = controller.transport().sent();
    assert_eq!(
        hex(&sent[0]),
        "00 05 80 00 00 0C 0D 0B 14 1F 07 1E 50 14 00 0F 00 2B"
    );
    assert_eq!(
        hex(&sent[1]),
        "00 06 80 00 00 58 59 0B 80 15 00 25 0A 64 00 00 00 00 00 00 00 00 00 F0 3E"
    );
}

#[tokio::test]
async fn clearing_alarm_tables_sends_sentinel_records() {
    let mut controller = Controller::new(RecordingTransport::default());
    controller
        .execute_batch(&[
            Operation::BasicAlarmTable(Vec::new()),
            Operation::EffectAlarmTable(Vec::new()),
        ])
        .await
        .unwrap();

    let sent = controller.transport().sent();
    assert_eq!(sent[0].len(), 2 + 6 + 9 + 1);
    assert_eq!(sent[1].len(), 2 + 6 + 16 + 1);
    assert!(sent[1][8..24].iter().all(|b| *b == 0));
}

#[tokio::test]
async fn notifications_reach_the_subscriber() {
    let transport = RecordingTransport::default();
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);

    transport
        .subscribe(Box::new(move |bytes| sink.lock().unwrap().push(bytes)))
        .await
        .unwrap();
    transport.notify(&[0x04, 0x23]);

    assert_eq!(*received.lock().unwrap(), vec![vec![0x04, 0x23]]);
}

#[tokio::test]
async fn dry_run_transport_accepts_everything() {
    let mut controller = Controller::new(DryRunTransport);
    let frame = controller.sync_time().await.unwrap();
    assert_eq!(frame.family, CommandFamily::Time);
    assert!(frame.payload.iter().all(|b| b & 0x80 != 0));
}

#[test]
fn config_defaults_feed_alarm_parsing() {
    let config = Config::from_toml(
        r#"
        [defaults.alarms]
        alarm-rgb = "20:00,255,128,0#80"
        "#,
    )
    .unwrap();
    let spec = config.defaults.alarms.for_kind(AlarmKind::Rgb).unwrap();
    let table = alarm::parse(spec, AlarmKind::Rgb).unwrap();
    match table.into_operation() {
        Operation::EffectAlarmTable(entries) => {
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].action_type(), 0x0f);
            assert_eq!(entries[0].action.params(), [255, 128, 0, 80]);
        }
        other => panic!("unexpected operation {:?}", other),
    }
}
