//! # Leg WebSocket Adapter
//!
//! Bridges a carrier's ConversationRelay WebSocket to the relay engine.
//! The carrier connects to `/ws/{leg}/{session_id}` once the call it placed
//! is answered, then exchanges JSON text frames with us for the rest of the
//! call.
//!
//! ## Connection Lifecycle:
//! 1. **Upgrade**: one [`LegWebSocket`] actor is started per connection
//! 2. **Inbound**: text frames are decoded into [`InboundMessage`]s and
//!    forwarded, in arrival order, to a leg handler task running
//!    [`RelayEngine::run_leg`]
//! 3. **Outbound**: the engine talks to the actor through [`ActorTransport`],
//!    which turns every [`OutboundEvent`] into a JSON text frame
//! 4. **Shutdown**: when the actor stops (carrier hung up, heartbeat timed
//!    out, or the engine closed the transport) the inbound channel closes
//!    and the leg handler tears the session down
//!
//! ## Rust Concepts Used:
//! - **Actors**: the socket is owned by one actor; everything else reaches it
//!   through its `Addr`, so no lock guards the socket
//! - **Channels**: an unbounded `mpsc` channel keeps inbound messages ordered
//!   without ever blocking the actor's synchronous `handle`

use crate::error::{AppError, RelayError, RelayResult};
use crate::relay::{InboundMessage, Leg, OutboundEvent, RelayEngine, Transport};
use crate::state::AppState;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One carrier connection for one leg of a session.
pub struct LegWebSocket {
    connection_id: String,
    session_id: String,
    leg: Leg,
    engine: RelayEngine,

    /// Feeds the leg handler; `None` once the actor has stopped
    inbound: Option<mpsc::UnboundedSender<RelayResult<InboundMessage>>>,

    heartbeat_interval: Duration,
    client_timeout: Duration,
    last_heartbeat: Instant,
}

impl LegWebSocket {
    pub fn new(
        session_id: String,
        leg: Leg,
        engine: RelayEngine,
        heartbeat_interval: Duration,
        client_timeout: Duration,
    ) -> Self {
        Self {
            connection_id: Uuid::new_v4().to_string(),
            session_id,
            leg,
            engine,
            inbound: None,
            heartbeat_interval,
            client_timeout,
            last_heartbeat: Instant::now(),
        }
    }

    fn forward(&mut self, message: RelayResult<InboundMessage>) {
        let Some(inbound) = &self.inbound else {
            return;
        };
        if inbound.send(message).is_err() {
            debug!(connection = %self.connection_id, "Leg handler gone, inbound message dropped");
        }
    }

    fn handle_text(&mut self, text: &str) {
        match serde_json::from_str::<InboundMessage>(text) {
            Ok(message) => self.forward(Ok(message)),
            Err(err) => warn!(
                session_id = %self.session_id,
                leg = %self.leg,
                "Undecodable frame ignored: {}",
                err
            ),
        }
    }
}

/// Serialize and send one event to the carrier.
#[derive(Message)]
#[rtype(result = "RelayResult<()>")]
struct Deliver(OutboundEvent);

/// Close the socket and stop the actor.
#[derive(Message)]
#[rtype(result = "()")]
struct Disconnect;

impl Actor for LegWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(
            session_id = %self.session_id,
            leg = %self.leg,
            connection = %self.connection_id,
            "Leg WebSocket connected"
        );

        let (tx, rx) = mpsc::unbounded_channel();
        self.inbound = Some(tx);

        let transport = ActorTransport {
            id: self.connection_id.clone(),
            addr: ctx.address(),
        };
        let engine = self.engine.clone();
        let session_id = self.session_id.clone();
        let leg = self.leg;
        tokio::spawn(async move {
            engine
                .run_leg(&session_id, leg, std::sync::Arc::new(transport), UnboundedReceiverStream::new(rx))
                .await;
        });

        ctx.run_interval(self.heartbeat_interval, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > act.client_timeout {
                warn!(connection = %act.connection_id, "WebSocket heartbeat timeout, closing connection");
                ctx.stop();
            } else {
                ctx.ping(b"");
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!(
            session_id = %self.session_id,
            leg = %self.leg,
            connection = %self.connection_id,
            "Leg WebSocket stopped"
        );
        // Ends the leg handler's inbound stream
        self.inbound = None;
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for LegWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => {
                self.last_heartbeat = Instant::now();
                self.handle_text(&text);
            }
            Ok(ws::Message::Binary(data)) => {
                debug!(connection = %self.connection_id, "Ignoring {} byte binary frame", data.len());
            }
            Ok(ws::Message::Ping(data)) => {
                ctx.pong(&data);
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!(connection = %self.connection_id, "WebSocket closed by carrier: {:?}", reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!(connection = %self.connection_id, "Received unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                self.forward(Err(RelayError::TransportFailure(err.to_string())));
                ctx.stop();
            }
        }
    }
}

impl Handler<Deliver> for LegWebSocket {
    type Result = RelayResult<()>;

    fn handle(&mut self, msg: Deliver, ctx: &mut Self::Context) -> Self::Result {
        let json = serde_json::to_string(&msg.0)
            .map_err(|e| RelayError::TransportFailure(format!("unserializable event: {}", e)))?;
        ctx.text(json);
        Ok(())
    }
}

impl Handler<Disconnect> for LegWebSocket {
    type Result = ();

    fn handle(&mut self, _msg: Disconnect, ctx: &mut Self::Context) {
        ctx.close(Some(ws::CloseReason::from(ws::CloseCode::Normal)));
        ctx.stop();
    }
}

/// The engine's handle on a [`LegWebSocket`].
pub struct ActorTransport {
    id: String,
    addr: Addr<LegWebSocket>,
}

#[async_trait]
impl Transport for ActorTransport {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send(&self, event: OutboundEvent) -> RelayResult<()> {
        self.addr
            .send(Deliver(event))
            .await
            .map_err(|e| RelayError::TransportFailure(format!("{}: {}", self.id, e)))?
    }

    async fn close(&self) -> RelayResult<()> {
        self.addr
            .send(Disconnect)
            .await
            .map_err(|e| RelayError::TransportFailure(format!("{}: {}", self.id, e)))
    }
}

/// `GET /ws/{leg}/{session_id}`: upgrade into a [`LegWebSocket`].
pub async fn leg_websocket(
    req: HttpRequest,
    stream: web::Payload,
    path: web::Path<(String, String)>,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let (leg, session_id) = path.into_inner();
    let leg: Leg = leg.parse().map_err(AppError::BadRequest)?;

    info!(
        session_id = %session_id,
        leg = %leg,
        peer = ?req.connection_info().peer_addr(),
        "New leg WebSocket connection request"
    );

    let settings = &state.config.relay;
    let websocket = LegWebSocket::new(
        session_id,
        leg,
        state.engine.clone(),
        settings.heartbeat_interval(),
        settings.client_timeout(),
    );

    ws::start(websocket, &req, stream)
}
