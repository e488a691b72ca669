//! Client → pipeline relay.

use crate::config::TurnDetection;
use axum::extract::ws::Message;
use futures_util::{Stream, StreamExt};
use liveagent_core::{
    audio::{self, CLIENT_INPUT_SAMPLE_RATE},
    frame::{AUDIO_MIME, Frame},
    pipeline::{LiveRequestQueue, PipelineError},
    utterance::{UtteranceDetector, UtteranceDetectorConfig},
};
use std::time::Duration;
use tokio::{
    sync::watch,
    time::{Instant, MissedTickBehavior, interval},
};
use tracing::{debug, info, warn};

/// How often the silence detector is consulted.
const SILENCE_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Trailing silence flushed before an explicit end of utterance.
const TRAILING_SILENCE: Duration = Duration::from_millis(10);

/// Whether the user is in the middle of a spoken turn.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TurnState {
    pub audio_open: bool,
}

pub struct InboundRelay {
    requests: LiveRequestQueue,
    pongs: watch::Sender<Instant>,
    turn_detection: TurnDetection,
    detector: UtteranceDetector,
    turn: TurnState,
}

impl InboundRelay {
    pub fn new(
        requests: LiveRequestQueue,
        pongs: watch::Sender<Instant>,
        turn_detection: TurnDetection,
        detector: UtteranceDetectorConfig,
    ) -> Self {
        Self {
            requests,
            pongs,
            turn_detection,
            detector: UtteranceDetector::new(detector),
            turn: TurnState::default(),
        }
    }

    /// Relays client messages until the client goes away.
    ///
    /// Returns an error only if the pipeline stops accepting input.
    pub async fn run<S>(mut self, mut incoming: S) -> Result<(), PipelineError>
    where
        S: Stream<Item = Result<Message, axum::Error>> + Unpin,
    {
        let mut poll = interval(SILENCE_POLL_INTERVAL);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let watch_silence = self.turn_detection == TurnDetection::Silence;

        loop {
            tokio::select! {
                message = incoming.next() => match message {
                    Some(Ok(Message::Text(text))) => self.handle_text(text.as_str()).await?,
                    Some(Ok(Message::Binary(data))) => {
                        warn!(bytes = data.len(), "Ignoring binary message, audio must be base64 JSON");
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!(?frame, "Client closed the connection");
                        return Ok(());
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                    Some(Err(e)) => {
                        info!(error = %e, "Client transport failed, treating as disconnect");
                        return Ok(());
                    }
                    None => {
                        info!("Client disconnected");
                        return Ok(());
                    }
                },
                _ = poll.tick(), if watch_silence => {
                    if self.turn.audio_open && self.detector.poll_boundary(Instant::now()) {
                        debug!("Silence detected, ending audio turn");
                        self.turn.audio_open = false;
                        self.requests.end_realtime().await?;
                    }
                }
            }
        }
    }

    async fn handle_text(&mut self, raw: &str) -> Result<(), PipelineError> {
        match Frame::decode(raw) {
            Ok(Some(frame)) => self.handle_frame(frame).await,
            Ok(None) => Ok(()),
            Err(e) => {
                warn!(error = %e, "Dropping malformed client frame");
                Ok(())
            }
        }
    }

    async fn handle_frame(&mut self, frame: Frame) -> Result<(), PipelineError> {
        match frame {
            Frame::Text(text) => {
                if self.turn.audio_open {
                    debug!("Text input ends the open audio turn");
                    self.close_audio_turn();
                    self.requests.end_realtime().await?;
                }
                self.requests.send_content(text.text).await
            }
            Frame::Audio(pcm) => {
                if self.turn_detection == TurnDetection::Silence {
                    self.detector.observe(&pcm, Instant::now());
                }
                self.turn.audio_open = true;
                self.requests.send_realtime(AUDIO_MIME, pcm).await
            }
            Frame::EndOfAudio => match self.turn_detection {
                TurnDetection::Pipeline => {
                    debug!("Ignoring endOfAudio, pipeline detects turn ends");
                    Ok(())
                }
                TurnDetection::Explicit | TurnDetection::Silence => {
                    self.close_audio_turn();
                    let padding = audio::silence(TRAILING_SILENCE, CLIENT_INPUT_SAMPLE_RATE);
                    self.requests
                        .send_realtime(AUDIO_MIME, padding.into())
                        .await?;
                    self.requests.send_content(String::new()).await
                }
            },
            Frame::Pong => {
                self.pongs.send_replace(Instant::now());
                Ok(())
            }
            other => {
                warn!(kind = other.kind(), "Ignoring frame clients may not send");
                Ok(())
            }
        }
    }

    fn close_audio_turn(&mut self) {
        self.turn.audio_open = false;
        self.detector.reset();
    }
}
