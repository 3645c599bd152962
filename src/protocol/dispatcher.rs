//! Command dispatch
//!
//! Routes each control line through the whitelist and the interceptor chain
//! to the base command handlers.

use std::sync::Arc;

use log::warn;

use crate::client::Connection;
use crate::error::{ProtocolError, handle_error};
use crate::middleware::{CommandHandler, Interceptor, LoggingInterceptor, Next, SecurityInterceptor};
use crate::protocol::commands::{Verb, whitelist};
use crate::protocol::handlers::BaseCommands;
use crate::protocol::parser::parse_request;

pub struct Dispatcher {
    whitelist: Vec<Verb>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    handler: Arc<dyn CommandHandler>,
}

impl Dispatcher {
    /// The standard chain: logging, then security negotiation, then the
    /// base commands.
    pub fn new(tls_supported: bool) -> Self {
        Self::with_chain(
            whitelist(tls_supported),
            vec![Arc::new(LoggingInterceptor), Arc::new(SecurityInterceptor)],
            Arc::new(BaseCommands),
        )
    }

    pub fn with_chain(
        whitelist: Vec<Verb>,
        interceptors: Vec<Arc<dyn Interceptor>>,
        handler: Arc<dyn CommandHandler>,
    ) -> Self {
        Self {
            whitelist,
            interceptors,
            handler,
        }
    }

    pub fn whitelist(&self) -> &[Verb] {
        &self.whitelist
    }

    /// Handles one command line. Commands outside the whitelist get a `500`
    /// without reaching any handler. An error escaping the chain is fatal:
    /// it is logged and the session is marked for teardown.
    pub async fn dispatch(&self, conn: &mut Connection, line: &str) {
        let request = parse_request(line);

        let allowed = request.verb.is_some_and(|verb| self.whitelist.contains(&verb));
        if !allowed {
            let error = ProtocolError::UnknownCommand(request.name.to_uppercase());
            if let Err(e) = conn.reject(error).await {
                warn!("Client {} went away: {}", conn.peer(), e);
                conn.session.abort();
            }
            return;
        }

        let next = Next::new(&self.interceptors, self.handler.as_ref());
        if let Err(e) = next.run(conn, &request).await {
            handle_error(&conn.peer().to_string(), &e);
            conn.data.close();
            conn.session.abort();
        }
    }
}
