//! Interceptor chain
//!
//! Every dispatched command runs through the configured interceptors in
//! order before reaching the base command handler. An interceptor either
//! answers the command itself or passes it on through [`Next`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::client::Connection;
use crate::error::FtpServerError;
use crate::protocol::Request;

/// Terminal handler that executes a command.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, conn: &mut Connection, request: &Request) -> Result<(), FtpServerError>;
}

#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn intercept(
        &self,
        conn: &mut Connection,
        request: &Request,
        next: Next<'_>,
    ) -> Result<(), FtpServerError>;
}

/// The remainder of the chain after the current interceptor.
pub struct Next<'a> {
    interceptors: &'a [Arc<dyn Interceptor>],
    handler: &'a dyn CommandHandler,
}

impl<'a> Next<'a> {
    pub fn new(interceptors: &'a [Arc<dyn Interceptor>], handler: &'a dyn CommandHandler) -> Self {
        Self {
            interceptors,
            handler,
        }
    }

    pub async fn run(self, conn: &mut Connection, request: &Request) -> Result<(), FtpServerError> {
        match self.interceptors.split_first() {
            Some((first, rest)) => {
                first
                    .intercept(conn, request, Next::new(rest, self.handler))
                    .await
            }
            None => self.handler.handle(conn, request).await,
        }
    }
}
