// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Unix-domain control socket.

use std::{
    io::{BufRead, BufReader, Write},
    os::unix::{
        fs::PermissionsExt,
        net::{UnixListener, UnixStream},
    },
    path::Path,
    sync::Arc,
};

use ringrec::Recorder;
use tracing::{debug, error, info, warn};

use crate::protocol::{Request, Response, handle};

/// Socket file permissions (owner read/write only).
const SOCKET_MODE: u32 = 0o600;

/// Binds `path`, replacing a stale socket file.
pub fn bind(path: &Path) -> std::io::Result<UnixListener> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    let listener = UnixListener::bind(path)?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(SOCKET_MODE))?;
    Ok(listener)
}

/// Serves connections until the listener fails; one thread per client.
pub fn serve(listener: UnixListener, recorder: Arc<Recorder>) -> std::io::Result<()> {
    info!("Control socket listening on {:?}", listener.local_addr()?);
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let recorder = recorder.clone();
                std::thread::Builder::new()
                    .name("ringrec-client".to_string())
                    .spawn(move || {
                        if let Err(error) = serve_client(stream, &recorder) {
                            warn!("Client connection failed: {error}");
                        }
                    })?;
            }
            Err(error) => error!("Accept error: {error}"),
        }
    }
    Ok(())
}

/// Answers every request line of one connection.
pub fn serve_client(stream: UnixStream, recorder: &Recorder) -> std::io::Result<()> {
    debug!("Client connected");
    let mut writer = stream.try_clone()?;
    for line in BufReader::new(stream).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => handle(recorder, request),
            Err(error) => Response::error(format!("Invalid request: {error}")),
        };
        serde_json::to_writer(&mut writer, &response)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
    }
    debug!("Client disconnected");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulate::{self, SimulateOptions};
    use ringrec::{
        EngineContext, FrameRate, RecorderSettings, RingAccess, TestPattern, Timecode,
    };

    fn recorder(domain: &Path) -> Recorder {
        let options = SimulateOptions {
            domain: domain.to_path_buf(),
            channels: 2,
            ring_len: 16,
            frame_rate: FrameRate::PAL,
            width: 720,
            height: 8,
            start: Timecode::from_text("09:59:59:00", 25),
            skew: 0,
            frames: 5,
            ltc_dropout: 0,
            realtime: false,
        };
        simulate::run(&options, &TestPattern::default()).unwrap();
        let settings = RecorderSettings::default();
        let ring = RingAccess::attach(domain, settings.timecode_source, &Default::default())
            .unwrap();
        Recorder::new(EngineContext::new(ring), settings)
    }

    fn exchange(reader: &mut impl BufRead, writer: &mut UnixStream, line: &str) -> Response {
        writer.write_all(line.as_bytes()).unwrap();
        writer.write_all(b"\n").unwrap();
        let mut reply = String::new();
        reader.read_line(&mut reply).unwrap();
        serde_json::from_str(&reply).unwrap()
    }

    #[test]
    fn one_response_per_request_line() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Arc::new(recorder(&dir.path().join("domain")));
        let (mut client, server) = UnixStream::pair().unwrap();
        let served = {
            let recorder = recorder.clone();
            std::thread::spawn(move || serve_client(server, &recorder))
        };
        let mut reader = BufReader::new(client.try_clone().unwrap());

        match exchange(&mut reader, &mut client, r#"{"command": "tracks_status"}"#) {
            Response::Tracks { tracks } => {
                assert_eq!(tracks.len(), 2);
                assert!(tracks.iter().all(|track| track.signal_present));
                assert!(tracks.iter().all(|track| !track.recording));
                assert_eq!(tracks[1].timecode.as_deref(), Some("09:59:59:04"));
            }
            other => panic!("Unexpected response {other:?}"),
        }
        assert!(matches!(
            exchange(&mut reader, &mut client, r#"{"command": "stop"}"#),
            Response::Error { .. }
        ));
        match exchange(&mut reader, &mut client, "not json") {
            Response::Error { message } => assert!(message.starts_with("Invalid request")),
            other => panic!("Unexpected response {other:?}"),
        }
        assert!(matches!(
            exchange(&mut reader, &mut client, r#"{"command": "update_config"}"#),
            Response::Error { .. }
        ));

        drop(reader);
        drop(client);
        served.join().unwrap().unwrap();
    }

    #[test]
    fn bind_replaces_a_stale_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run").join("control.sock");
        drop(bind(&path).unwrap());
        let _listener = bind(&path).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, SOCKET_MODE);
    }
}
