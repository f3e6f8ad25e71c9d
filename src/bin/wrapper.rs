// src/bin/wrapper.rs - keeps the bridge server alive
//
// A heartbeat failure makes the server exit on purpose; this supervisor
// respawns it against the same COM port and relays its stdout.

use std::env;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

fn main() {
    let com_port = match env::args().nth(1) {
        Some(port) => port,
        None => {
            eprintln!("usage: wrapper <COM_PORT>");
            std::process::exit(2);
        }
    };

    let server = server_path();

    loop {
        match Command::new(&server)
            .arg(&com_port)
            .stdout(Stdio::piped())
            .spawn()
        {
            Ok(mut child) => {
                if let Some(mut stdout) = child.stdout.take() {
                    let mut buf = [0u8; 256];
                    while let Ok(n) = stdout.read(&mut buf) {
                        if n == 0 {
                            break;
                        }
                        let _ = io::stdout().write_all(&buf[..n]);
                        let _ = io::stdout().flush();
                    }
                }
                let _ = child.wait();
            }
            Err(e) => {
                eprintln!("could not spawn {}: {}", server.display(), e);
                std::thread::sleep(Duration::from_secs(1));
            }
        }
    }
}

/// The server binary sits next to the wrapper.
fn server_path() -> PathBuf {
    env::current_exe()
        .ok()
        .and_then(|exe| {
            exe.parent()
                .map(|dir| dir.join(format!("server{}", env::consts::EXE_SUFFIX)))
        })
        .unwrap_or_else(|| PathBuf::from("server"))
}
