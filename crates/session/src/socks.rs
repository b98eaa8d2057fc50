//! SOCKS5 dialer with optional username/password auth

use std::time::Duration;

use tokio::net::TcpStream;
use tokio_socks::tcp::Socks5Stream;
use tracing::debug;

use crate::endpoint::ProxyEndpoint;
use crate::error::{Result, SessionError};
use crate::{BoxFuture, ProxyDialer};

/// Dials through one SOCKS5 proxy with a per-dial timeout.
pub struct Socks5Dialer {
    endpoint: ProxyEndpoint,
    timeout: Duration,
}

impl Socks5Dialer {
    pub fn new(endpoint: ProxyEndpoint, timeout: Duration) -> Self {
        Self { endpoint, timeout }
    }

    async fn connect(&self, address: &str) -> Result<TcpStream> {
        let proxy = self.endpoint.address();
        let stream = if self.endpoint.login.is_empty() {
            Socks5Stream::connect(proxy.as_str(), address).await
        } else {
            Socks5Stream::connect_with_password(
                proxy.as_str(),
                address,
                &self.endpoint.login,
                self.endpoint.password.expose(),
            )
            .await
        }
        .map_err(|e| socks_error(&self.endpoint, address, e))?;

        debug!(proxy = %self.endpoint, target = address, "socks5 tunnel established");
        Ok(stream.into_inner())
    }
}

impl ProxyDialer for Socks5Dialer {
    fn endpoint(&self) -> &ProxyEndpoint {
        &self.endpoint
    }

    fn dial<'a>(&'a self, address: &'a str) -> BoxFuture<'a, Result<TcpStream>> {
        Box::pin(async move {
            tokio::time::timeout(self.timeout, self.connect(address))
                .await
                .map_err(|_| {
                    SessionError::Dial(format!(
                        "timed out after {}s dialing {address} via {}",
                        self.timeout.as_secs(),
                        self.endpoint
                    ))
                })?
        })
    }
}

fn socks_error(endpoint: &ProxyEndpoint, address: &str, e: tokio_socks::Error) -> SessionError {
    use tokio_socks::Error as E;
    match e {
        E::InvalidTargetAddress(_) | E::InvalidAuthValues(_) => {
            SessionError::InvalidEndpoint(format!("dialing {address} via {endpoint}: {e}"))
        }
        E::InvalidResponseVersion
        | E::UnknownAuthMethod
        | E::InvalidReservedByte
        | E::UnknownAddressType => {
            SessionError::Protocol(format!("socks5 reply from {endpoint}: {e}"))
        }
        E::PasswordAuthFailure(_) => {
            SessionError::Dial(format!("proxy rejected credentials for {endpoint}: {e}"))
        }
        other => SessionError::Dial(format!("dialing {address} via {endpoint}: {other}")),
    }
}
