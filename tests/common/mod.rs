//! Device-side scripting shared by the integration tests: an in-memory
//! duplex stream plays the role of the serial port and this module plays
//! the firmware during the init handshake.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::time::Duration;

use roverduino::board::Board;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

pub const WRITE_TIMEOUT: Duration = Duration::from_millis(300);

/// Reads exactly `expected.len()` bytes and asserts they match.
pub async fn expect(device: &mut DuplexStream, expected: &[u8]) {
    let mut buf = vec![0u8; expected.len()];
    device.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf, expected, "unexpected bytes on the wire");
}

/// Plays the firmware side of the init handshake. The advertised board
/// has eight pins supporting input and output, with pin 1 also exposing
/// analog channel 0. The firmware calls itself "Test".
pub async fn run_handshake(device: &mut DuplexStream) {
    // System reset, then the protocol version query.
    expect(device, &[0xFF, 0xF9]).await;
    device.write_all(&[0xF9, 0x02, 0x05]).await.unwrap();

    expect(device, &[0xF0, 0x79, 0xF7]).await;
    device
        .write_all(&[
            0xF0, 0x79, 0x02, 0x05, b'T', 0x00, b'e', 0x00, b's', 0x00, b't', 0x00, 0xF7,
        ])
        .await
        .unwrap();

    expect(device, &[0xF0, 0x6B, 0xF7]).await;
    let mut capability = vec![0xF0, 0x6C];
    for pin in 0..8 {
        capability.extend_from_slice(&[0x00, 0x01, 0x01, 0x01]);
        if pin == 1 {
            // resolution 10 analog input
            capability.extend_from_slice(&[0x02, 0x0A]);
        }
        capability.push(0x7F);
    }
    capability.push(0xF7);
    device.write_all(&capability).await.unwrap();

    expect(device, &[0xF0, 0x69, 0xF7]).await;
    device
        .write_all(&[
            0xF0, 0x6A, 0x7F, 0x00, 0x7F, 0x7F, 0x7F, 0x7F, 0x7F, 0x7F, 0xF7,
        ])
        .await
        .unwrap();

    // Digital reporting is enabled on ports 0 and 1 once ready.
    expect(device, &[0xD0, 0x01, 0xD1, 0x01]).await;
}

/// Reads past the connect-time light/beep indication sequence.
pub async fn drain_startup_indication(device: &mut DuplexStream) {
    // light red, beep, light green, beep, beep, light off
    let mut buf = [0u8; 9 + 4 + 9 + 4 + 4 + 9];
    device.read_exact(&mut buf).await.unwrap();
}

/// A board session already connected over a duplex stream, with the
/// device side handed back for scripting.
pub async fn connected_board() -> (Board, DuplexStream) {
    let (client, mut device) = duplex(1024);
    let board = Board::new(WRITE_TIMEOUT);
    let connect = {
        let board = board.clone();
        tokio::spawn(async move { board.connect(client).await })
    };
    run_handshake(&mut device).await;
    connect.await.unwrap().unwrap();
    (board, device)
}
