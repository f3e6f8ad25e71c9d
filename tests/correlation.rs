// Integration tests for the peripheral adapters: FIFO pairing between
// issued commands and board acknowledgements.

mod common;

use roverduino::rover::{Buzzer, Completion, CompletionKind, LineSensor, Sonar, Wheels, MAX_DISTANCE};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::{channel, Receiver};
use tokio::time::{timeout, Duration};

use common::{connected_board, expect};

async fn next_completion(responses: &mut Receiver<Completion>) -> Completion {
    timeout(Duration::from_secs(1), responses.recv())
        .await
        .expect("timed out waiting for a completion")
        .expect("response channel closed")
}

#[tokio::test]
async fn sonar_ranges_complete_in_request_order() {
    let (board, mut device) = connected_board().await;
    let (tx, mut rx) = channel(100);
    let sonar = Sonar::new(&board, tx);

    for id in ["r1", "r2", "r3"] {
        sonar.read_range(id).await.unwrap();
        expect(&mut device, &[0xF0, 0x50, 0x00, 0xF7]).await;
    }

    // 10 cm, 20 cm, then 172 cm = (0x01 << 7) | 0x2C.
    for frame in [
        [0xF0, 0x50, 0x01, 0x0A, 0x00, 0xF7],
        [0xF0, 0x50, 0x01, 0x14, 0x00, 0xF7],
        [0xF0, 0x50, 0x01, 0x2C, 0x01, 0xF7],
    ] {
        device.write_all(&frame).await.unwrap();
    }

    let expected = [("r1", 10), ("r2", 20), ("r3", 172)];
    for (id, distance) in expected {
        let completion = next_completion(&mut rx).await;
        assert_eq!(completion.id, id);
        assert_eq!(completion.kind, CompletionKind::SonarRange);
        assert_eq!(completion.result, distance);
    }
}

#[tokio::test]
async fn sonar_turn_clamps_the_angle() {
    let (board, mut device) = connected_board().await;
    let (tx, mut rx) = channel(100);
    let sonar = Sonar::new(&board, tx);

    // 200 degrees folds to 200 mod 91 = 18.
    sonar.turn("x", "right", 200).await.unwrap();
    expect(&mut device, &[0xF0, 0x50, 0x02, 0x01, 0x12, 0x00, 0xF7]).await;

    device.write_all(&[0xF0, 0x50, 0x02, 0x02, 0xF7]).await.unwrap();
    let completion = next_completion(&mut rx).await;
    assert_eq!(completion.id, "x");
    assert_eq!(completion.kind, CompletionKind::SonarTurn);
}

#[tokio::test]
async fn sonar_transmit_failure_completes_immediately_with_sentinel() {
    let (board, _device) = connected_board().await;
    let (tx, mut rx) = channel(100);
    let sonar = Sonar::new(&board, tx);

    board.disconnect().await.unwrap();

    assert!(sonar.read_range("gone").await.is_err());
    let completion = next_completion(&mut rx).await;
    assert_eq!(completion.id, "gone");
    assert_eq!(completion.kind, CompletionKind::SonarRange);
    assert_eq!(completion.result, MAX_DISTANCE);
}

#[tokio::test]
async fn one_line_request_yields_two_completions() {
    let (board, mut device) = connected_board().await;
    let (tx, mut rx) = channel(100);
    let line_sensor = LineSensor::new(&board, tx);

    line_sensor.read("ln1").await.unwrap();
    expect(&mut device, &[0xF0, 0x55, 0x00, 0xF7]).await;

    // left = 1, right = 0 on the wire; the results are inverted.
    device
        .write_all(&[0xF0, 0x55, 0x01, 0x01, 0x00, 0xF7])
        .await
        .unwrap();

    let left = next_completion(&mut rx).await;
    assert_eq!(left.id, "ln1");
    assert_eq!(left.kind, CompletionKind::LineLeft);
    assert_eq!(left.result, 0);

    let right = next_completion(&mut rx).await;
    assert_eq!(right.id, "ln1");
    assert_eq!(right.kind, CompletionKind::LineRight);
    assert_eq!(right.result, 1);

    // Exactly two, no stragglers.
    assert!(timeout(Duration::from_millis(50), rx.recv()).await.is_err());
}

#[tokio::test]
async fn only_timed_plays_produce_buzzer_completions() {
    let (board, mut device) = connected_board().await;
    let (tx, mut rx) = channel(100);
    let buzzer = Buzzer::new(&board, tx);

    // 440 Hz for 1500 ms: 440 = 0x1B8, 1500 = 0x5DC.
    buzzer.play_tone("b1", 440, 1500).await.unwrap();
    expect(
        &mut device,
        &[0xF0, 0x53, 0x02, 0x38, 0x03, 0x5C, 0x0B, 0xF7],
    )
    .await;

    // An untimed play is fire-and-forget.
    buzzer.play_tone("", 440, 0).await.unwrap();
    expect(&mut device, &[0xF0, 0x53, 0x00, 0x38, 0x03, 0xF7]).await;

    device.write_all(&[0xF0, 0x53, 0x03, 0xF7]).await.unwrap();

    let completion = next_completion(&mut rx).await;
    assert_eq!(completion.id, "b1");
    assert_eq!(completion.kind, CompletionKind::BuzzerPlay);

    assert!(timeout(Duration::from_millis(50), rx.recv()).await.is_err());
}

#[tokio::test]
async fn wheel_turns_and_steps_complete_from_their_own_queues() {
    let (board, mut device) = connected_board().await;
    let (tx, mut rx) = channel(100);
    let wheels = Wheels::new(&board, tx);

    wheels.turn("w1", "left", 45, 6).await.unwrap();
    expect(
        &mut device,
        &[0xF0, 0x51, 0x03, 0x00, 0x00, 0x2D, 0x06, 0x00, 0xF7],
    )
    .await;

    wheels.step("w2", "forward", 100).await.unwrap();
    expect(
        &mut device,
        &[0xF0, 0x51, 0x01, 0x00, 0x00, 0x64, 0x00, 0xF7],
    )
    .await;

    wheels.wheel_step("w3", "right", "reverse", 50).await.unwrap();
    expect(
        &mut device,
        &[0xF0, 0x51, 0x01, 0x02, 0x01, 0x32, 0x00, 0xF7],
    )
    .await;

    // Step acknowledgements arrive before the turn acknowledgement; the
    // queues must not cross.
    device.write_all(&[0xF0, 0x51, 0x05, 0xF7]).await.unwrap();
    device.write_all(&[0xF0, 0x51, 0x05, 0xF7]).await.unwrap();
    device.write_all(&[0xF0, 0x51, 0x04, 0xF7]).await.unwrap();

    let first = next_completion(&mut rx).await;
    assert_eq!(first.id, "w2");
    assert_eq!(first.kind, CompletionKind::WheelStep);

    let second = next_completion(&mut rx).await;
    assert_eq!(second.id, "w3");
    assert_eq!(second.kind, CompletionKind::WheelStep);

    let third = next_completion(&mut rx).await;
    assert_eq!(third.id, "w1");
    assert_eq!(third.kind, CompletionKind::WheelTurn);
}

#[tokio::test]
async fn reverse_turn_runs_the_wheels_backwards() {
    let (board, mut device) = connected_board().await;
    let (tx, _rx) = channel(100);
    let wheels = Wheels::new(&board, tx);

    wheels.reverse_turn("w1", "right", 30, 6).await.unwrap();
    expect(
        &mut device,
        &[0xF0, 0x51, 0x03, 0x01, 0x01, 0x1E, 0x06, 0x00, 0xF7],
    )
    .await;
}
