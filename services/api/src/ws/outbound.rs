//! Pipeline → client relay.

use super::transport::{ClientSink, TransportError};
use futures_util::{Stream, StreamExt};
use liveagent_core::{event::AgentEvent, outbound::OutboundShaper, pipeline::PipelineError};
use tracing::{debug, info, warn};

/// Forwards shaped agent output to the client until the pipeline's event
/// stream ends or the client writer goes away.
pub async fn run_outbound<S>(
    mut events: S,
    client: ClientSink,
    mut shaper: OutboundShaper,
) -> Result<(), TransportError>
where
    S: Stream<Item = Result<AgentEvent, PipelineError>> + Unpin,
{
    while let Some(event) = events.next().await {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Skipping failed agent event");
                continue;
            }
        };
        for frame in shaper.shape(&event) {
            debug!(author = %event.author, kind = frame.kind(), "Agent to client");
            client.send(&frame).await?;
        }
    }
    info!("Agent event stream ended");
    Ok(())
}
