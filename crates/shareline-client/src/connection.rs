//! Connection Manager for one (server, share) pair
//!
//! Owns the share handle's lifecycle:
//! - Eager or delayed establishment
//! - Liveness probing (transport connection and share binding)
//! - A single transparent reconnect when the handle went stale
//!
//! Items hold an `Arc<Connection>` and fetch the handle through
//! [`Connection::share`] for every remote call, so a reconnect replaces the
//! handle underneath them without them noticing.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use shareline_core::{
    ConnectionConfig, Credentials, LivenessState, Result, ShareError, ShareHandle, ShareTransport,
    TransportError, TransportSession,
};

/// A bound share: the transport session plus the handle bound through it
struct Session {
    transport: Box<dyn TransportSession>,
    share: Arc<dyn ShareHandle>,
}

impl Session {
    fn is_alive(&self) -> bool {
        self.transport.is_connected() && self.share.is_connected()
    }
}

/// Managed session state
struct State {
    /// Current session (if established)
    session: Option<Session>,
    /// Number of sessions established so far
    generation: u64,
}

/// Logical session to one share.
///
/// All methods take `&self`; the handle lives behind a mutex and is replaced
/// wholesale on reconnect.
pub struct Connection {
    transport: Arc<dyn ShareTransport>,
    server: String,
    share: String,
    credentials: Credentials,
    config: ConnectionConfig,
    state: Mutex<State>,
}

impl Connection {
    /// Create a connection that connects on first use
    pub fn new(
        transport: Arc<dyn ShareTransport>,
        server: impl Into<String>,
        share: impl Into<String>,
        credentials: Credentials,
        config: ConnectionConfig,
    ) -> Self {
        Self {
            transport,
            server: server.into(),
            share: share.into(),
            credentials,
            config,
            state: Mutex::new(State {
                session: None,
                generation: 0,
            }),
        }
    }

    /// Create a connection and establish the session immediately
    pub fn open(
        transport: Arc<dyn ShareTransport>,
        server: impl Into<String>,
        share: impl Into<String>,
        credentials: Credentials,
        config: ConnectionConfig,
    ) -> Result<Self> {
        let connection = Self::new(transport, server, share, credentials, config);
        connection.connect()?;
        Ok(connection)
    }

    /// Create a connection, connecting eagerly unless the configuration asks
    /// for delayed initialization
    pub fn from_config(
        transport: Arc<dyn ShareTransport>,
        server: impl Into<String>,
        share: impl Into<String>,
        credentials: Credentials,
        config: ConnectionConfig,
    ) -> Result<Self> {
        if config.delayed_initialization {
            Ok(Self::new(transport, server, share, credentials, config))
        } else {
            Self::open(transport, server, share, credentials, config)
        }
    }

    pub fn server_name(&self) -> &str {
        &self.server
    }

    pub fn share_name(&self) -> &str {
        &self.share
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Establish a fresh session, closing the current one first
    pub fn connect(&self) -> Result<()> {
        let mut state = self.state.lock();
        self.reconnect_locked(&mut state)
    }

    /// The live share handle.
    ///
    /// Connects on first use and reconnects once if the current handle went
    /// stale. Fails with [`ShareError::Connection`] if that attempt fails.
    pub fn share(&self) -> Result<Arc<dyn ShareHandle>> {
        let mut state = self.state.lock();

        if let Some(session) = state.session.as_ref() {
            if session.is_alive() {
                return Ok(Arc::clone(&session.share));
            }
            warn!("Share handle for {} went stale, reconnecting", self.unc());
        } else {
            debug!("Establishing delayed connection to {}", self.unc());
        }

        self.reconnect_locked(&mut state)?;
        state
            .session
            .as_ref()
            .map(|session| Arc::clone(&session.share))
            .ok_or_else(|| self.connection_error(TransportError::NotConnected))
    }

    /// Both the transport connection and the share binding report connected
    pub fn is_alive(&self) -> bool {
        self.state
            .lock()
            .session
            .as_ref()
            .is_some_and(Session::is_alive)
    }

    /// Current liveness, probed now
    pub fn liveness(&self) -> LivenessState {
        let state = self.state.lock();
        match state.session.as_ref() {
            Some(session) if session.is_alive() => LivenessState::Connected,
            Some(_) => LivenessState::Stale,
            None if state.generation == 0 => LivenessState::NeverConnected,
            None => LivenessState::Stale,
        }
    }

    /// Reconnect unless the connection is alive. Idempotent.
    pub fn ensure_alive(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.session.as_ref().is_some_and(Session::is_alive) {
            return Ok(());
        }
        self.reconnect_locked(&mut state)
    }

    /// Close the session if there is one. Closing twice is not an error.
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        match state.session.take() {
            Some(session) => self.close_session(session),
            None => Ok(()),
        }
    }

    fn reconnect_locked(&self, state: &mut State) -> Result<()> {
        if let Some(old) = state.session.take() {
            if let Err(e) = self.close_session(old) {
                debug!("Ignoring close failure of stale session: {}", e);
            }
        }

        let session = self.establish()?;
        state.generation += 1;
        state.session = Some(session);

        info!("Connected to {} (session #{})", self.unc(), state.generation);
        Ok(())
    }

    fn establish(&self) -> Result<Session> {
        let mut transport = self
            .transport
            .connect(&self.server, &self.config)
            .map_err(|e| self.connection_error(e))?;

        match transport.authenticate_and_bind(&self.credentials, &self.share) {
            Ok(share) => Ok(Session { transport, share }),
            Err(e) => {
                if let Err(close_err) = transport.close() {
                    debug!("Failed to close unbound session: {}", close_err);
                }
                Err(self.connection_error(e))
            }
        }
    }

    fn close_session(&self, mut session: Session) -> Result<()> {
        if !session.transport.is_connected() {
            return Ok(());
        }

        session
            .transport
            .close()
            .map_err(|e| self.connection_error(e))?;
        info!("Closed connection to {}", self.unc());
        Ok(())
    }

    fn connection_error(&self, source: TransportError) -> ShareError {
        ShareError::Connection {
            server: self.server.clone(),
            share: self.share.clone(),
            source,
        }
    }

    fn unc(&self) -> String {
        format!("\\\\{}\\{}", self.server, self.share)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(session) = self.state.get_mut().session.take() {
            if let Err(e) = self.close_session(session) {
                warn!("Failed to close connection to {}: {}", self.unc(), e);
            }
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("server", &self.server)
            .field("share", &self.share)
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}
