/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

//! The call state machine.
//!
//! Ties signaling notices (incoming calls, unreachable peers) and user
//! actions (place, accept, reject, cancel, hang up) to the media controller,
//! and keeps the [`CallState`] the presentation layer renders.
//!
//! Every call gets a generation number. Its event pump and ringing timer
//! carry that number. Once the call is finished the pump keeps draining the
//! call's channel, stopping any late stream instead of attaching it, until
//! the call object goes away.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use async_broadcast::Receiver;
use log::{debug, error, info, warn};
use peercall_types::{validate_email, CallError, FeatureFlags, MediaStream, PeerId};
use tokio::sync::mpsc;

use super::call_state::{CallDirection, CallPhase, CallSession, CallState};
use crate::config::ClientOptions;
use crate::event_bus::EventBus;
use crate::events::{CallEndReason, ClientEvent};
use crate::media::{MediaDevices, MediaStreamController, MediaSurface, PeerConnection};
use crate::platform::{self, now_ms, TimeoutHandle};
use crate::signaling::{
    CallEvent, CallLink, ConnectionState, MediaCall, SessionNotice, SignalingBackend,
    SignalingSessionManager,
};

#[derive(Default)]
struct CallRuntime {
    user_email: Option<String>,
    generation: u64,
    session: Option<CallSession>,
    /// Call object of the current session, answered or not.
    call: Option<Arc<dyn MediaCall>>,
    ring_timer: Option<TimeoutHandle>,
    error: Option<String>,
    error_seq: u64,
    error_timer: Option<TimeoutHandle>,
}

impl CallRuntime {
    /// Generation of the current session if it is ringing in `direction`.
    fn ringing(&self, direction: CallDirection) -> Option<u64> {
        self.session
            .as_ref()
            .filter(|s| s.is_ringing(direction))
            .map(|_| self.generation)
    }
}

struct Inner {
    options: Arc<ClientOptions>,
    signaling: SignalingSessionManager,
    media: MediaStreamController,
    events: EventBus,
    runtime: Mutex<CallRuntime>,
    weak_self: Weak<Inner>,
}

/// One signed-in user's calling client.
///
/// Construct with [new](Self::new), sign in with [login](Self::login), then
/// place or answer calls. Progress is published on the event bus returned by
/// [subscribe](Self::subscribe); [state](Self::state) gives the full picture
/// at any time. Cloning gives another handle to the same client.
#[derive(Clone)]
pub struct CallOrchestrator {
    inner: Arc<Inner>,
}

impl PartialEq for CallOrchestrator {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for CallOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallOrchestrator")
            .field("signaling", &self.inner.signaling)
            .field("session", &self.inner.runtime().session)
            .finish_non_exhaustive()
    }
}

impl CallOrchestrator {
    /// Constructor for the client.
    ///
    /// **Important:** must be called from within a tokio runtime; the client
    /// spawns its signaling notice pump right away.
    pub fn new(
        options: ClientOptions,
        backend: Arc<dyn SignalingBackend>,
        devices: Arc<dyn MediaDevices>,
        local_surface: Arc<dyn MediaSurface>,
        remote_surface: Arc<dyn MediaSurface>,
    ) -> Self {
        let options = Arc::new(options);
        let events = EventBus::new();
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let inner = Arc::new_cyclic(|weak_self| Inner {
            signaling: SignalingSessionManager::new(
                backend,
                options.clone(),
                events.clone(),
                notice_tx,
            ),
            media: MediaStreamController::new(
                devices,
                local_surface,
                remote_surface,
                events.clone(),
            ),
            options,
            events,
            runtime: Mutex::new(CallRuntime::default()),
            weak_self: weak_self.clone(),
        });
        platform::spawn(run_notices(Arc::downgrade(&inner), notice_rx));
        Self { inner }
    }

    /// Validates `email`, registers its identifier with the first signaling
    /// server that accepts it and, if configured, starts the local preview.
    pub async fn login(&self, email: &str) -> Result<PeerId, CallError> {
        self.inner.login(email).await
    }

    /// Ends any call, closes the signaling session and releases all media.
    pub async fn logout(&self) {
        self.inner.logout().await
    }

    /// Rings `email`. Returns once the call is placed; the call becomes
    /// active when the callee's media arrives.
    pub async fn place_call(&self, email: &str) -> Result<(), CallError> {
        self.inner.place_call(email).await
    }

    /// Gives up on an outgoing call that has not been answered yet.
    pub async fn cancel_outgoing_call(&self) {
        self.inner.cancel_outgoing_call().await
    }

    pub async fn accept_call(&self) -> Result<(), CallError> {
        self.inner.accept_call().await
    }

    /// Declines the incoming call without touching the camera.
    pub async fn reject_call(&self) -> Result<(), CallError> {
        self.inner.reject_call().await
    }

    /// Hangs up. The local preview keeps running for the next call.
    pub async fn end_call(&self) {
        self.inner.end_call().await
    }

    pub async fn toggle_video(&self) -> Option<bool> {
        self.inner.media.toggle_video().await
    }

    pub async fn toggle_audio(&self) -> Option<bool> {
        self.inner.media.toggle_audio().await
    }

    /// Starts or stops sharing the screen. Returns whether sharing is on.
    pub async fn toggle_screen_share(&self) -> Result<bool, CallError> {
        self.inner.toggle_screen_share().await
    }

    pub async fn state(&self) -> CallState {
        self.inner.state().await
    }

    pub fn session(&self) -> Option<CallSession> {
        self.inner.runtime().session.clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.signaling.state()
    }

    /// Human-readable signaling status, e.g. "Connected via PeerJS Official".
    pub fn status_text(&self) -> String {
        self.inner.signaling.status_text()
    }

    pub fn peer_id(&self) -> Option<PeerId> {
        self.inner.signaling.peer_id()
    }

    pub fn subscribe(&self) -> Receiver<ClientEvent> {
        self.inner.events.subscribe()
    }

    pub fn media(&self) -> &MediaStreamController {
        &self.inner.media
    }

    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }
}

impl Inner {
    fn runtime(&self) -> MutexGuard<'_, CallRuntime> {
        self.runtime
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.runtime().generation == generation
    }

    async fn login(&self, email: &str) -> Result<PeerId, CallError> {
        let email = validate_email(email).map_err(|e| self.report(e))?;
        let requested = FeatureFlags::peer_id_for(&email).map_err(|e| self.report(e))?;
        info!("Signing in as {email} ({requested})");
        self.clear_error();

        let peer_id = self
            .signaling
            .connect(Some(&requested))
            .await
            .map_err(|e| self.report(e))?;
        self.runtime().user_email = Some(email);
        self.events.emit(ClientEvent::LoggedIn(peer_id.clone()));

        if self.options.acquire_preview_on_login {
            if let Err(e) = self.media.ensure_local_media().await {
                self.report(e);
            }
        }
        Ok(peer_id)
    }

    async fn logout(&self) {
        info!("Signing out");
        let generation = {
            let rt = self.runtime();
            rt.session.as_ref().map(|_| rt.generation)
        };
        if let Some(generation) = generation {
            self.finish_call(generation, CallEndReason::LoggedOut, None).await;
        }
        self.signaling.destroy();
        self.media.release_all().await;
        {
            let mut rt = self.runtime();
            rt.user_email = None;
            rt.generation += 1;
            rt.error = None;
            rt.error_seq += 1;
            rt.error_timer = None;
        }
        self.events.emit(ClientEvent::LoggedOut);
    }

    async fn place_call(&self, input: &str) -> Result<(), CallError> {
        let address = input.trim().to_string();
        if address.is_empty() {
            return Err(CallError::InvalidAddress(
                "Enter the email of the person to call".to_string(),
            ));
        }
        if !self.signaling.is_connected() {
            return Err(self.report(CallError::NotConnected));
        }
        let remote_id = FeatureFlags::peer_id_for(&address).map_err(|e| self.report(e))?;

        let generation = {
            let mut rt = self.runtime();
            if rt.session.is_some() {
                warn!("Not calling {address}: another call is in progress");
                return Err(CallError::CallInProgress);
            }
            rt.generation += 1;
            rt.session = Some(CallSession::outgoing(
                address.clone(),
                remote_id.clone(),
                now_ms(),
            ));
            // Ringing time counts from here, camera start included.
            let generation = rt.generation;
            rt.ring_timer = Some(self.start_ring_timer(generation));
            generation
        };
        self.clear_error();
        info!("Calling {address} ({remote_id})");
        self.events.emit(ClientEvent::OutgoingCall(address.clone()));

        let stream = match self.media.ensure_local_media().await {
            Ok(stream) => stream,
            Err(e) => {
                self.finish_call(generation, CallEndReason::Failed, Some(e.clone())).await;
                return Err(e);
            }
        };
        if !self.is_current(generation) {
            debug!("Call to {address} was cancelled while the camera started");
            return Ok(());
        }

        let link = match self.signaling.call(&remote_id, &stream) {
            Ok(link) => link,
            Err(e) => {
                let e = match e {
                    CallError::PeerUnreachable(_) => CallError::PeerUnreachable(address),
                    other => other,
                };
                self.finish_call(generation, CallEndReason::Failed, Some(e.clone())).await;
                return Err(e);
            }
        };
        self.install_outgoing(generation, link).await;
        Ok(())
    }

    async fn install_outgoing(&self, generation: u64, link: CallLink) {
        let CallLink { call, events } = link;
        let installed = {
            let mut rt = self.runtime();
            if rt.generation == generation {
                rt.call = Some(call.clone());
                true
            } else {
                false
            }
        };
        if !installed {
            debug!("Call was cancelled before it was placed");
            call.close();
            return;
        }
        platform::spawn(run_call_events(self.weak_self.clone(), generation, events));
        if let Some(pc) = call.peer_connection() {
            self.associate_peer_connection(generation, pc).await;
        }
    }

    fn start_ring_timer(&self, generation: u64) -> TimeoutHandle {
        let weak = self.weak_self.clone();
        TimeoutHandle::new(self.options.ringing_timeout_ms, move || async move {
            if let Some(inner) = weak.upgrade() {
                inner.on_ring_timeout(generation).await;
            }
        })
    }

    async fn on_ring_timeout(&self, generation: u64) {
        let ringing = {
            let mut rt = self.runtime();
            let ringing = rt.generation == generation
                && rt.ringing(CallDirection::Outgoing).is_some();
            if ringing {
                // Runs inside the timer task, which must not abort itself.
                if let Some(timer) = rt.ring_timer.take() {
                    timer.disarm();
                }
            }
            ringing
        };
        if ringing {
            info!(
                "No answer within {}ms, cancelling the call",
                self.options.ringing_timeout_ms
            );
            self.finish_call(generation, CallEndReason::RingTimeout, None).await;
        }
    }

    async fn associate_peer_connection(&self, generation: u64, pc: Arc<dyn PeerConnection>) {
        self.media.associate_peer_connection(pc.clone()).await;
        if !self.is_current(generation) {
            self.media.clear_peer_connection_if(&pc).await;
        }
    }

    async fn cancel_outgoing_call(&self) {
        let generation = self.runtime().ringing(CallDirection::Outgoing);
        match generation {
            Some(generation) => {
                info!("Cancelling the outgoing call");
                self.finish_call(generation, CallEndReason::Cancelled, None).await;
            }
            None => debug!("No outgoing call to cancel"),
        }
    }

    fn on_incoming_call(&self, link: CallLink) {
        let CallLink { call, events } = link;
        let remote_id = call.remote_peer();
        let generation = {
            let mut rt = self.runtime();
            if rt.user_email.is_none() || rt.session.is_some() {
                None
            } else {
                rt.generation += 1;
                rt.session = Some(CallSession::incoming(remote_id.clone(), now_ms()));
                rt.call = Some(call.clone());
                Some(rt.generation)
            }
        };
        let caller = remote_id.to_email();
        let Some(generation) = generation else {
            warn!("Busy, declining the call from {caller}");
            call.close();
            return;
        };

        info!("Incoming call from {caller}");
        platform::spawn(run_call_events(self.weak_self.clone(), generation, events));
        self.events.emit(ClientEvent::IncomingCall(caller));
    }

    async fn accept_call(&self) -> Result<(), CallError> {
        let pending = {
            let rt = self.runtime();
            rt.ringing(CallDirection::Incoming).zip(rt.call.clone())
        };
        let Some((generation, call)) = pending else {
            return Err(CallError::NoPendingCall);
        };
        info!("Answering the call from {}", call.remote_peer().to_email());

        let stream = match self.media.ensure_local_media().await {
            Ok(stream) => stream,
            Err(e) => {
                self.finish_call(generation, CallEndReason::Failed, Some(e.clone())).await;
                return Err(e);
            }
        };
        {
            let mut rt = self.runtime();
            if rt.generation != generation {
                debug!("The caller hung up before the call was answered");
                return Ok(());
            }
            if let Some(session) = rt.session.as_mut() {
                session.phase = CallPhase::Connecting;
            }
        }
        call.answer(&stream);
        if let Some(pc) = call.peer_connection() {
            self.associate_peer_connection(generation, pc).await;
        }
        Ok(())
    }

    async fn reject_call(&self) -> Result<(), CallError> {
        let generation = self.runtime().ringing(CallDirection::Incoming);
        let Some(generation) = generation else {
            return Err(CallError::NoPendingCall);
        };
        info!("Rejecting the incoming call");
        self.finish_call(generation, CallEndReason::Rejected, None).await;
        Ok(())
    }

    async fn end_call(&self) {
        let generation = {
            let rt = self.runtime();
            rt.session.as_ref().map(|_| rt.generation)
        };
        match generation {
            Some(generation) => self.finish_call(generation, CallEndReason::Hangup, None).await,
            None => {
                debug!("No call to end");
                self.media.release_remote_only().await;
            }
        }
    }

    async fn on_call_event(&self, generation: u64, event: CallEvent) {
        if !self.is_current(generation) {
            debug!("Ignoring {event:?} from a finished call");
            if let CallEvent::StreamReceived(stream) = event {
                stream.stop_all();
            }
            return;
        }
        match event {
            CallEvent::StreamReceived(stream) => self.on_remote_stream(generation, stream).await,
            CallEvent::Closed => {
                info!("The other side closed the call");
                self.finish_call(generation, CallEndReason::RemoteClosed, None).await;
            }
            CallEvent::Errored(reason) => {
                error!("Call error: {reason}");
                let unanswered = self
                    .runtime()
                    .session
                    .as_ref()
                    .filter(|s| s.is_ringing(CallDirection::Outgoing))
                    .map(|s| s.counterparty.clone());
                let err = match unanswered {
                    Some(address) => CallError::PeerUnreachable(address),
                    None => CallError::MidCallFailure(reason),
                };
                self.finish_call(generation, CallEndReason::Failed, Some(err)).await;
            }
        }
    }

    async fn on_remote_stream(&self, generation: u64, stream: MediaStream) {
        let pc = self
            .runtime()
            .call
            .as_ref()
            .and_then(|call| call.peer_connection());
        self.media.attach_remote_stream(stream.clone(), pc).await;

        let activated: Result<Option<String>, ()> = {
            let mut rt = self.runtime();
            if rt.generation != generation {
                Err(())
            } else {
                let mut activated = None;
                if let Some(session) = rt.session.as_mut() {
                    if session.phase != CallPhase::Active {
                        session.phase = CallPhase::Active;
                        activated = Some(session.counterparty.clone());
                    }
                }
                if activated.is_some() {
                    rt.ring_timer = None;
                }
                Ok(activated)
            }
        };

        match activated {
            Err(()) => {
                debug!("The call ended while its media arrived");
                self.media.release_remote_if(&stream).await;
            }
            Ok(Some(remote)) => {
                info!("In a call with {remote}");
                self.clear_error();
                self.events.emit(ClientEvent::CallActive(remote));
            }
            Ok(None) => debug!("Remote media replaced"),
        }
    }

    /// Moves the call of `generation` to Idle. No-op when that call is
    /// already over.
    async fn finish_call(&self, generation: u64, reason: CallEndReason, error: Option<CallError>) {
        let ended = {
            let mut rt = self.runtime();
            if rt.generation != generation {
                None
            } else {
                rt.generation += 1;
                rt.ring_timer = None;
                Some((rt.session.take(), rt.call.take()))
            }
        };
        let Some((session, call)) = ended else {
            debug!("Call {generation} already finished");
            return;
        };

        if let Some(call) = call {
            call.close();
        }
        self.media.release_remote_only().await;

        let answered = session
            .as_ref()
            .is_some_and(|s| s.phase != CallPhase::Ringing);
        if answered && reason != CallEndReason::LoggedOut && self.media.is_screen_sharing().await {
            if let Err(e) = self.media.stop_screen_share().await {
                warn!("Could not switch back to the camera: {e}");
            }
        }

        match error {
            Some(e) => {
                self.report(e);
            }
            None => self.clear_error(),
        }
        let remote = session.map(|s| s.counterparty);
        info!(
            "Call with {} ended ({reason:?})",
            remote.as_deref().unwrap_or("nobody")
        );
        self.events.emit(ClientEvent::CallEnded { remote, reason });
    }

    async fn on_notice(&self, notice: SessionNotice) {
        match notice {
            SessionNotice::IncomingCall(link) => self.on_incoming_call(link),
            SessionNotice::PeerUnavailable(err) => {
                let unanswered = {
                    let rt = self.runtime();
                    rt.session
                        .as_ref()
                        .filter(|s| s.is_ringing(CallDirection::Outgoing))
                        .map(|s| (rt.generation, s.counterparty.clone()))
                };
                match unanswered {
                    Some((generation, address)) => {
                        self.finish_call(
                            generation,
                            CallEndReason::Failed,
                            Some(CallError::PeerUnreachable(address)),
                        )
                        .await
                    }
                    None => debug!("Ignoring peer-unavailable outside a call: {err}"),
                }
            }
            SessionNotice::Closed => {
                let generation = {
                    let rt = self.runtime();
                    rt.session.as_ref().map(|_| rt.generation)
                };
                if let Some(generation) = generation {
                    self.finish_call(
                        generation,
                        CallEndReason::Failed,
                        Some(CallError::MidCallFailure(
                            "the signaling session closed".to_string(),
                        )),
                    )
                    .await;
                }
            }
        }
    }

    async fn toggle_screen_share(&self) -> Result<bool, CallError> {
        if self.media.is_screen_sharing().await {
            self.media
                .stop_screen_share()
                .await
                .map_err(|e| self.report(e))?;
            Ok(false)
        } else {
            self.media
                .start_screen_share()
                .await
                .map_err(|e| self.report(e))?;
            Ok(true)
        }
    }

    async fn state(&self) -> CallState {
        let media = self.media.snapshot().await;
        let connection = self.signaling.state();
        let peer_id = self.signaling.peer_id();
        let rt = self.runtime();
        let session = rt.session.as_ref();
        let counterparty = |session: Option<&CallSession>| session.map(|s| s.counterparty.clone());
        let active = session.filter(|s| s.phase == CallPhase::Active);
        let outgoing = session.filter(|s| s.is_ringing(CallDirection::Outgoing));
        let incoming = session.filter(|s| s.is_ringing(CallDirection::Incoming));
        let state = CallState {
            is_connected: connection.is_connected(),
            is_in_call: active.is_some(),
            is_video_enabled: media.video_enabled,
            is_audio_enabled: media.audio_enabled,
            is_screen_sharing: media.screen_sharing,
            peer_id,
            user_email: rt.user_email.clone(),
            remote_peer_id: counterparty(active),
            outgoing_call: counterparty(outgoing),
            incoming_call: counterparty(incoming),
            error: rt.error.clone(),
            status: connection.to_string(),
        };
        state
    }

    /// Shows `err` to the user for `error_display_ms` and hands it back.
    fn report(&self, err: CallError) -> CallError {
        warn!("{err}");
        let message = err.user_message();
        {
            let mut rt = self.runtime();
            rt.error = Some(message.clone());
            rt.error_seq += 1;
            let seq = rt.error_seq;
            let weak = self.weak_self.clone();
            rt.error_timer = Some(TimeoutHandle::new(
                self.options.error_display_ms,
                move || async move {
                    if let Some(inner) = weak.upgrade() {
                        inner.expire_error(seq);
                    }
                },
            ));
        }
        self.events.emit(ClientEvent::Error(message));
        err
    }

    fn expire_error(&self, seq: u64) {
        let mut rt = self.runtime();
        if rt.error_seq != seq {
            return;
        }
        if let Some(timer) = rt.error_timer.take() {
            timer.disarm();
        }
        if rt.error.take().is_some() {
            drop(rt);
            self.events.emit(ClientEvent::ErrorCleared);
        }
    }

    fn clear_error(&self) {
        let mut rt = self.runtime();
        rt.error_seq += 1;
        rt.error_timer = None;
        if rt.error.take().is_some() {
            drop(rt);
            self.events.emit(ClientEvent::ErrorCleared);
        }
    }
}

async fn run_notices(inner: Weak<Inner>, mut notices: mpsc::UnboundedReceiver<SessionNotice>) {
    while let Some(notice) = notices.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.on_notice(notice).await;
    }
    debug!("Signaling notice pump finished");
}

/// Feeds one call's events to the client until the call object is dropped.
async fn run_call_events(
    inner: Weak<Inner>,
    generation: u64,
    mut events: mpsc::UnboundedReceiver<CallEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        inner.on_call_event(generation, event).await;
    }
    // A call object dropped without a close event still ends its call.
    if let Some(inner) = inner.upgrade() {
        inner.on_call_event(generation, CallEvent::Closed).await;
    }
    debug!("Call pump {generation} finished");
}
