//! Heartbeat task: pings the client every period and gives up on it after
//! too many unanswered pings.

use super::transport::{CLOSE_GOING_AWAY, ClientSink, TransportError};
use liveagent_core::{
    frame::Frame,
    liveness::{Liveness, LivenessConfig, Verdict},
};
use tokio::{
    sync::watch,
    time::{Instant, sleep_until},
};
use tracing::{debug, warn};

pub const NO_PONG_REASON: &str = "No pong response, closing connection.";

/// Runs until the client is declared dead or the writer goes away.
///
/// `pongs` carries the arrival time of the latest client pong.
pub async fn run_liveness(
    client: ClientSink,
    mut pongs: watch::Receiver<Instant>,
    config: LivenessConfig,
) -> Result<(), TransportError> {
    let mut liveness = Liveness::new(config);

    loop {
        client.send(&Frame::Ping).await?;
        liveness.ping_sent();
        let deadline = Instant::now() + config.period;

        loop {
            tokio::select! {
                _ = sleep_until(deadline) => break,
                changed = pongs.changed() => match changed {
                    Ok(()) => {
                        let at = *pongs.borrow_and_update();
                        liveness.pong_received(at);
                    }
                    Err(_) => {
                        // Nobody reports pongs any more; let the period run out.
                        sleep_until(deadline).await;
                        break;
                    }
                },
            }
        }

        match liveness.tick() {
            Verdict::Healthy => {}
            Verdict::Missed(missed) => {
                debug!(missed, "Client missed a heartbeat");
            }
            Verdict::Dead => {
                warn!(
                    missed = liveness.missed(),
                    since_last_pong = ?liveness.last_ack().map(|at| at.elapsed()),
                    "Client stopped answering heartbeats, disconnecting"
                );
                client
                    .send(&Frame::DisconnectWarning {
                        reason: NO_PONG_REASON.to_string(),
                    })
                    .await?;
                client.close(CLOSE_GOING_AWAY, NO_PONG_REASON).await?;
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::ws::Message;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn drain(rx: &mut mpsc::Receiver<Message>) -> Vec<Message> {
        let mut seen = Vec::new();
        while let Ok(message) = rx.try_recv() {
            seen.push(message);
        }
        seen
    }

    fn ping() -> Message {
        Message::Text("__ping__".into())
    }

    #[tokio::test(start_paused = true)]
    async fn test_warns_once_then_closes_after_max_misses() {
        let (client, mut rx) = ClientSink::channel(32);
        let (_pong_tx, pongs) = watch::channel(Instant::now());
        let task = tokio::spawn(run_liveness(client, pongs, LivenessConfig::default()));

        tokio::time::sleep(Duration::from_secs(39)).await;
        assert_eq!(drain(&mut rx), vec![ping(), ping(), ping(), ping()]);
        assert!(!task.is_finished());

        tokio::time::sleep(Duration::from_secs(2)).await;
        task.await.unwrap().unwrap();

        let rest = drain(&mut rx);
        assert_eq!(rest.len(), 2);
        let warning = match &rest[0] {
            Message::Text(text) => Frame::decode(text.as_str()).unwrap().unwrap(),
            other => panic!("expected disconnect warning, got {other:?}"),
        };
        assert_eq!(
            warning,
            Frame::DisconnectWarning {
                reason: NO_PONG_REASON.to_string()
            }
        );
        match &rest[1] {
            Message::Close(Some(frame)) => assert_eq!(frame.code, CLOSE_GOING_AWAY),
            other => panic!("expected close frame, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_answering_client_stays_connected() {
        let (client, mut rx) = ClientSink::channel(32);
        let (pong_tx, pongs) = watch::channel(Instant::now());
        let task = tokio::spawn(run_liveness(client, pongs, LivenessConfig::default()));

        let responder = tokio::spawn(async move {
            let mut pings = 0;
            while let Some(message) = rx.recv().await {
                assert_eq!(message, ping());
                pings += 1;
                tokio::time::sleep(Duration::from_millis(50)).await;
                pong_tx.send_replace(Instant::now());
            }
            pings
        });

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(!task.is_finished());
        task.abort();
        let pings = responder.await.unwrap();
        assert!(pings >= 12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_pong_resets_the_count() {
        let (client, mut rx) = ClientSink::channel(32);
        let (pong_tx, pongs) = watch::channel(Instant::now());
        let task = tokio::spawn(run_liveness(client, pongs, LivenessConfig::default()));

        // Three silent periods, then one answer, then silence again.
        tokio::time::sleep(Duration::from_secs(35)).await;
        pong_tx.send_replace(Instant::now());
        tokio::time::sleep(Duration::from_secs(40)).await;
        assert!(!task.is_finished());

        tokio::time::sleep(Duration::from_secs(10)).await;
        task.await.unwrap().unwrap();
        let frames = drain(&mut rx);
        assert!(matches!(frames.last(), Some(Message::Close(_))));
    }

    #[tokio::test]
    async fn test_stops_when_writer_is_gone() {
        let (client, rx) = ClientSink::channel(1);
        drop(rx);
        let (_pong_tx, pongs) = watch::channel(Instant::now());
        let result = run_liveness(client, pongs, LivenessConfig::default()).await;
        assert!(matches!(result, Err(TransportError::WriterClosed)));
    }
}
