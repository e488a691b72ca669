//! Manages the WebSocket connection lifecycle for a live agent session.

use super::{
    inbound::InboundRelay,
    liveness::run_liveness,
    outbound::run_outbound,
    transport::{ClientSink, run_writer},
};
use crate::{config::TurnDetection, models::ConnectQuery, state::AppState};
use anyhow::{Context, Result};
use axum::{
    extract::{
        Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use chrono::Utc;
use futures_util::{Sink, Stream, StreamExt};
use liveagent_core::{
    outbound::OutboundShaper,
    pipeline::{LiveSession, ResponseMode, SessionContext},
    session::SessionPhase,
    store,
};
use std::{fmt, fmt::Display, sync::Arc, time::Duration};
use tokio::{sync::watch, task::JoinSet, time::Instant};
use tracing::{Instrument, debug, error, info, instrument, warn};

const WRITER_CAPACITY: usize = 256;
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// `GET /ws/{client_id}?is_audio=..`
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(client_id): Path<String>,
    Query(query): Query<ConnectQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    upgrade(ws, state, client_id, ResponseMode::from_is_audio(query.is_audio))
}

/// `GET /ws/audio/{client_id}`, always answers with speech.
pub async fn audio_ws_handler(
    ws: WebSocketUpgrade,
    Path(client_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    upgrade(ws, state, client_id, ResponseMode::Audio)
}

/// `GET /ws/text/{client_id}`, always answers with text.
pub async fn text_ws_handler(
    ws: WebSocketUpgrade,
    Path(client_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    upgrade(ws, state, client_id, ResponseMode::Text)
}

fn upgrade(ws: WebSocketUpgrade, state: Arc<AppState>, client_id: String, mode: ResponseMode) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, client_id, mode))
}

#[instrument(name = "ws_session", skip_all, fields(client_id = %client_id, mode = %mode, session_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, client_id: String, mode: ResponseMode) {
    info!("Client connected");
    let (sink, stream) = socket.split();
    match run_session(state, client_id, mode, sink, stream).await {
        Ok(()) => info!("Session closed"),
        Err(e) => error!(error = ?e, "Session terminated with error"),
    }
}

/// The concurrent tasks that make up an active session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Relay {
    Inbound,
    Outbound,
    Liveness,
}

impl fmt::Display for Relay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Relay::Inbound => f.write_str("inbound"),
            Relay::Outbound => f.write_str("outbound"),
            Relay::Liveness => f.write_str("liveness"),
        }
    }
}

/// Runs one connection from acceptance to teardown.
///
/// The session record is attached for the duration of the call and detached
/// afterwards, whether the session ends cleanly or not.
pub async fn run_session<W, R>(
    state: Arc<AppState>,
    client_id: String,
    mode: ResponseMode,
    sink: W,
    incoming: R,
) -> Result<()>
where
    W: Sink<Message> + Unpin + Send + 'static,
    W::Error: Display,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin + Send + 'static,
{
    let mut phase = SessionPhase::Connecting;
    let (client, writer_rx) = ClientSink::channel(WRITER_CAPACITY);
    let writer = tokio::spawn(run_writer(sink, writer_rx).in_current_span());

    let (session, resumed) = store::resume_or_create(
        state.sessions.as_ref(),
        &client_id,
        mode,
        state.config.session_ttl_chrono(),
        Utc::now(),
    )
    .await;
    tracing::Span::current().record("session_id", tracing::field::display(session.id));

    let ctx = SessionContext {
        session_id: session.id,
        client_id: client_id.clone(),
        mode,
    };
    let result = serve(&state, ctx, resumed, client.clone(), incoming, &mut phase).await;

    phase = phase.begin_close();
    store::detach(
        state.sessions.as_ref(),
        &client_id,
        session.attachment_id,
        Utc::now(),
    )
    .await;
    phase = phase.next();
    debug!(?phase, "Session record released");

    drop(client);
    match tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => debug!(error = %e, "Client writer stopped"),
        Ok(Err(e)) => warn!(error = %e, "Client writer task panicked"),
        Err(_) => warn!("Timed out flushing client writer"),
    }
    result
}

async fn serve<R>(
    state: &Arc<AppState>,
    ctx: SessionContext,
    resumed: bool,
    client: ClientSink,
    incoming: R,
    phase: &mut SessionPhase,
) -> Result<()>
where
    R: Stream<Item = Result<Message, axum::Error>> + Unpin + Send + 'static,
{
    let config = &state.config;
    let mode = ctx.mode;
    let LiveSession { requests, events } = state
        .pipeline
        .start(ctx)
        .await
        .context("Failed to start agent pipeline")?;

    if !resumed {
        if let Some(greeting) = &config.greeting_prompt {
            requests
                .send_content(greeting.clone())
                .await
                .context("Failed to send greeting")?;
            info!("Sent greeting prompt");
        }
    }

    *phase = phase.next();
    debug!(?phase, resumed, "Session is live");

    let turn_detection = effective_turn_detection(
        config.turn_detection,
        state.pipeline.supports_voice_activity_detection(),
    );
    let (pong_tx, pong_rx) = watch::channel(Instant::now());
    let inbound = InboundRelay::new(
        requests.clone(),
        pong_tx,
        turn_detection,
        config.utterance(),
    );
    let shaper = OutboundShaper::new(mode, config.producer_roles());

    let mut tasks = JoinSet::new();
    tasks.spawn(
        async move { (Relay::Inbound, inbound.run(incoming).await.map_err(anyhow::Error::from)) }
            .in_current_span(),
    );
    let outbound_client = client.clone();
    tasks.spawn(
        async move {
            let result = run_outbound(events, outbound_client, shaper).await;
            (Relay::Outbound, result.map_err(anyhow::Error::from))
        }
        .in_current_span(),
    );
    let liveness = config.liveness();
    tasks.spawn(
        async move {
            let result = run_liveness(client, pong_rx, liveness).await;
            (Relay::Liveness, result.map_err(anyhow::Error::from))
        }
        .in_current_span(),
    );

    match tasks.join_next().await {
        Some(Ok((relay, Ok(())))) => info!(%relay, "Relay finished, closing session"),
        Some(Ok((relay, Err(e)))) => warn!(%relay, error = ?e, "Relay failed, closing session"),
        Some(Err(e)) => error!(error = %e, "Relay task panicked, closing session"),
        None => {}
    }

    *phase = phase.begin_close();
    debug!(?phase, "Stopping remaining relays");
    tasks.shutdown().await;
    requests.close();
    Ok(())
}

/// Pipeline-driven turn detection needs a pipeline that detects turns itself;
/// otherwise the client's `endOfAudio` has to end the turn.
fn effective_turn_detection(configured: TurnDetection, pipeline_has_vad: bool) -> TurnDetection {
    if configured == TurnDetection::Pipeline && !pipeline_has_vad {
        warn!("Pipeline has no voice activity detection, honouring endOfAudio instead");
        return TurnDetection::Explicit;
    }
    configured
}
