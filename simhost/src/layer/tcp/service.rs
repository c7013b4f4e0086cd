use core::fmt;
use std::sync::Arc;

use super::super::{Error, FnHandler, Result};

/// Turns the data received by a listening service into its response.
///
/// An empty response sends no data. The handler runs on the dispatching thread while the host's
/// session table is locked, it must not call `Host::sessions`. Registering and unregistering
/// services is fine, the dispatcher only holds a snapshot of the registry.
pub trait PayloadHandler: Send + Sync {
    /// Answer the `request` received on `port`.
    fn handle(&self, port: u16, request: &[u8]) -> Vec<u8>;
}

/// The services a host accepts connections for.
///
/// Clones share the handlers.
#[derive(Clone)]
pub struct Services {
    entries: Vec<Service>,
    response_cap: usize,
}

#[derive(Clone)]
struct Service {
    port: u16,
    handler: Arc<dyn PayloadHandler>,
}

impl Services {
    /// The maximum number of services of one host.
    pub const MAX: usize = 4;

    /// Create an empty registry whose responses are cut off after `response_cap` bytes.
    pub fn new(response_cap: usize) -> Self {
        Services {
            entries: Vec::with_capacity(Self::MAX),
            response_cap,
        }
    }

    /// Start listening on `port`.
    ///
    /// Replaces the handler of an existing service on the same port.
    pub fn register<H>(&mut self, port: u16, handler: H) -> Result<()>
        where H: PayloadHandler + 'static,
    {
        if port == 0 {
            return Err(Error::Illegal);
        }

        let handler: Arc<dyn PayloadHandler> = Arc::new(handler);
        if let Some(service) = self.entries.iter_mut().find(|service| service.port == port) {
            service.handler = handler;
            return Ok(());
        }

        if self.entries.len() >= Self::MAX {
            return Err(Error::Exhausted);
        }

        self.entries.push(Service { port, handler });
        Ok(())
    }

    /// Stop listening on `port`, returning whether there was a service.
    pub fn unregister(&mut self, port: u16) -> bool {
        let before = self.entries.len();
        self.entries.retain(|service| service.port != port);
        before != self.entries.len()
    }

    /// Whether a service listens on `port`.
    pub fn is_listening(&self, port: u16) -> bool {
        self.entries.iter().any(|service| service.port == port)
    }

    /// The ports with a service.
    pub fn ports(&self) -> impl Iterator<Item=u16> + '_ {
        self.entries.iter().map(|service| service.port)
    }

    /// Run the handler of `port`.
    ///
    /// Returns no data when nobody listens.
    pub fn handle(&self, port: u16, request: &[u8]) -> Vec<u8> {
        let service = match self.entries.iter().find(|service| service.port == port) {
            Some(service) => service,
            None => return Vec::new(),
        };

        let mut response = service.handler.handle(port, request);
        if response.len() > self.response_cap {
            net_debug!("tcp: response on port {} truncated to {} bytes", port, self.response_cap);
            response.truncate(self.response_cap);
        }
        response
    }
}

impl<F> PayloadHandler for FnHandler<F>
    where F: Fn(u16, &[u8]) -> Vec<u8> + Send + Sync,
{
    fn handle(&self, port: u16, request: &[u8]) -> Vec<u8> {
        (self.0)(port, request)
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Services")
            .field("ports", &self.ports().collect::<Vec<_>>())
            .field("response_cap", &self.response_cap)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn echo() -> FnHandler<impl Fn(u16, &[u8]) -> Vec<u8> + Send + Sync> {
        FnHandler(|_: u16, request: &[u8]| request.to_vec())
    }

    #[test]
    fn register_at_most_four() {
        let mut services = Services::new(64);
        for port in 1..=4 {
            services.register(port, echo()).unwrap();
        }
        assert_eq!(services.register(5, echo()), Err(Error::Exhausted));
        // Replacing is always possible.
        assert_eq!(services.register(4, echo()), Ok(()));
        assert!(services.unregister(4));
        assert_eq!(services.register(5, echo()), Ok(()));
        assert!(!services.is_listening(4));
        assert!(services.is_listening(5));
    }

    #[test]
    fn handle_truncates() {
        let mut services = Services::new(4);
        services.register(80, echo()).unwrap();
        assert_eq!(services.handle(80, b"abcdefgh"), b"abcd");
        assert_eq!(services.handle(81, b"abcdefgh"), b"");
    }

    #[test]
    fn snapshot_keeps_handlers() {
        let mut services = Services::new(64);
        services.register(80, echo()).unwrap();
        let snapshot = services.clone();
        assert!(services.unregister(80));
        services.register(81, echo()).unwrap();

        assert_eq!(snapshot.handle(80, b"ping"), b"ping");
        assert!(!snapshot.is_listening(81));
    }

    #[test]
    fn port_zero() {
        let mut services = Services::new(4);
        assert_eq!(services.register(0, echo()), Err(Error::Illegal));
    }
}
