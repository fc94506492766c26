// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Control protocol: one JSON request per line, answered by one JSON response per line.

use ringrec::{
    FrameRate, Locator, Recorder, StartRequest, Timecode, TrackOutput, TrackStatus, UserComments,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A control request.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Request {
    Start {
        /// `hh:mm:ss:ff`, omitted to start now.
        #[serde(default)]
        start_timecode: Option<String>,
        #[serde(default)]
        pre_roll: i64,
        /// Per-track enable flags, channels first, then the quad track.
        #[serde(default)]
        enabled: Vec<bool>,
        #[serde(default)]
        project: String,
    },
    Stop {
        /// `hh:mm:ss:ff`, omitted to stop now.
        #[serde(default)]
        stop_timecode: Option<String>,
        #[serde(default)]
        post_roll: i64,
        #[serde(default)]
        description: String,
        #[serde(default)]
        locators: Vec<Locator>,
    },
    TracksStatus,
    UpdateConfig,
}

/// Reply to a [`Request`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Started {
        start_timecode: String,
    },
    Stopped {
        stop_timecode: String,
        duration: i64,
        tracks: Vec<TrackOutput>,
    },
    Tracks {
        tracks: Vec<TrackStatus>,
    },
    ConfigUpdated,
    Error {
        message: String,
    },
}

impl Response {
    pub fn error(message: impl ToString) -> Self {
        Response::Error {
            message: message.to_string(),
        }
    }
}

fn parse_timecode(text: Option<&str>, rate: FrameRate) -> ringrec::Result<Option<Timecode>> {
    text.map(|text| Timecode::try_from_text_at(text, rate))
        .transpose()
}

/// Executes `request` against `recorder`.
pub fn handle(recorder: &Recorder, request: Request) -> Response {
    debug!("Handling {request:?}");
    let rate = recorder.context().ring().geometry().frame_rate;
    let result = match request {
        Request::Start {
            start_timecode,
            pre_roll,
            enabled,
            project,
        } => parse_timecode(start_timecode.as_deref(), rate).and_then(|start_timecode| {
            recorder
                .start(StartRequest {
                    start_timecode,
                    pre_roll,
                    enabled,
                    project,
                })
                .map(|start| Response::Started {
                    start_timecode: start.to_string(),
                })
        }),
        Request::Stop {
            stop_timecode,
            post_roll,
            description,
            locators,
        } => parse_timecode(stop_timecode.as_deref(), rate).and_then(|stop_timecode| {
            recorder
                .stop(
                    stop_timecode,
                    post_roll,
                    UserComments {
                        description,
                        locators,
                    },
                )
                .map(|outcome| Response::Stopped {
                    stop_timecode: outcome.stop_timecode.to_string(),
                    duration: outcome.duration,
                    tracks: outcome.tracks,
                })
        }),
        Request::TracksStatus => Ok(Response::Tracks {
            tracks: recorder.tracks_status(),
        }),
        Request::UpdateConfig => recorder.update_config().map(|()| Response::ConfigUpdated),
    };
    result.unwrap_or_else(|error| {
        warn!("Request failed: {error}");
        Response::error(error)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulate::{self, SimulateOptions};
    use ringrec::{EncodingSettings, EngineContext, RecorderSettings, RingAccess, TestPattern};

    #[test]
    fn requests_use_a_command_tag() {
        let request: Request = serde_json::from_str(
            r#"{"command": "start", "start_timecode": "10:00:00:00", "pre_roll": 5}"#,
        )
        .unwrap();
        assert_eq!(
            request,
            Request::Start {
                start_timecode: Some("10:00:00:00".to_string()),
                pre_roll: 5,
                enabled: Vec::new(),
                project: String::new(),
            }
        );
        let request: Request = serde_json::from_str(r#"{"command": "tracks_status"}"#).unwrap();
        assert_eq!(request, Request::TracksStatus);
    }

    #[test]
    fn responses_use_a_status_tag() {
        let json = serde_json::to_string(&Response::error("Not recording")).unwrap();
        assert_eq!(json, r#"{"status":"error","message":"Not recording"}"#);
        let json = serde_json::to_string(&Response::ConfigUpdated).unwrap();
        assert_eq!(json, r#"{"status":"config_updated"}"#);
    }

    #[test]
    fn timecodes_are_parsed_at_the_ring_rate() {
        assert_eq!(parse_timecode(None, FrameRate::PAL).unwrap(), None);
        assert_eq!(
            parse_timecode(Some("10:00:00:05"), FrameRate::PAL).unwrap(),
            Some(Timecode::from_text("10:00:00:05", 25))
        );
        assert!(parse_timecode(Some("10:00"), FrameRate::PAL).is_err());
        assert!(parse_timecode(Some("1\u{e9}:00:00:0"), FrameRate::PAL).is_err());
        assert_eq!(
            parse_timecode(Some("01:00:00:00"), FrameRate::NTSC).unwrap(),
            Some(Timecode::from_text("01:00:00;00", 30))
        );
    }

    /// Colon-separated times address a drop-frame ring.
    #[test]
    fn start_and_stop_on_a_drop_frame_ring() {
        let dir = tempfile::tempdir().unwrap();
        let domain = dir.path().join("domain");
        let options = SimulateOptions {
            domain: domain.clone(),
            channels: 1,
            ring_len: 32,
            frame_rate: FrameRate::NTSC,
            width: 720,
            height: 8,
            start: Timecode::from_text("00:59:59;20", 30),
            skew: 0,
            frames: 20,
            ltc_dropout: 0,
            realtime: false,
        };
        simulate::run(&options, &TestPattern::default()).unwrap();
        let settings = RecorderSettings {
            encodings: vec![EncodingSettings {
                directory: dir.path().join("recordings"),
                ..Default::default()
            }],
            ..Default::default()
        };
        let ring = RingAccess::attach(&domain, settings.timecode_source, &Default::default())
            .unwrap();
        let recorder = Recorder::new(EngineContext::new(ring), settings);

        let started = handle(
            &recorder,
            Request::Start {
                start_timecode: Some("01:00:00:00".to_string()),
                pre_roll: 0,
                enabled: vec![true],
                project: String::new(),
            },
        );
        assert_eq!(
            started,
            Response::Started {
                start_timecode: "01:00:00;00".to_string()
            }
        );
        match handle(
            &recorder,
            Request::Stop {
                stop_timecode: Some("01:00:00:05".to_string()),
                post_roll: 0,
                description: String::new(),
                locators: Vec::new(),
            },
        ) {
            Response::Stopped {
                stop_timecode,
                duration,
                ..
            } => {
                assert_eq!(stop_timecode, "01:00:00;05");
                assert_eq!(duration, 5);
            }
            other => panic!("Unexpected response {other:?}"),
        }
        assert!(recorder.wait_for_completion().unwrap().success);
    }
}
