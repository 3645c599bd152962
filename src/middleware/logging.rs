//! Logging middleware
//!
//! Logs every dispatched command with the client address. Passwords are
//! never written to the log.

use async_trait::async_trait;
use log::info;

use crate::client::Connection;
use crate::error::FtpServerError;
use crate::middleware::chain::{Interceptor, Next};
use crate::protocol::{Request, Verb};

pub struct LoggingInterceptor;

/// Renders a request for the log, masking PASS parameters.
pub fn loggable(request: &Request) -> String {
    let verb = request.name.to_uppercase();
    match (&request.verb, &request.param) {
        (Some(Verb::Pass), Some(_)) => format!("{} ****", verb),
        (_, Some(param)) => format!("{} {}", verb, param),
        (_, None) => verb,
    }
}

#[async_trait]
impl Interceptor for LoggingInterceptor {
    async fn intercept(
        &self,
        conn: &mut Connection,
        request: &Request,
        next: Next<'_>,
    ) -> Result<(), FtpServerError> {
        info!("Client {} executed: {}", conn.peer(), loggable(request));
        next.run(conn, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::parse_request;

    #[test]
    fn test_password_is_masked() {
        assert_eq!(loggable(&parse_request("pass hunter2")), "PASS ****");
        assert_eq!(loggable(&parse_request("user alice")), "USER alice");
        assert_eq!(loggable(&parse_request("pwd")), "PWD");
    }
}
