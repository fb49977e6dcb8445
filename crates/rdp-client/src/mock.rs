//! A scripted stand-in for the debuggee side of a [`Connection`].
//!
//! Requests the proxies send are captured instead of written to a socket, and
//! tests inject the debuggee's packets with [`MockPeer::deliver`]. Packets are
//! dispatched synchronously, as the transport's read task would.

use std::time::Duration;

use serde_json::Value;

use crate::connection::{Connection, OutboundRequests};
use crate::protocol::Request;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub struct MockPeer {
    connection: Connection,
    outbound: OutboundRequests,
}

impl Default for MockPeer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPeer {
    pub fn new() -> Self {
        let (connection, outbound) = Connection::new();
        Self {
            connection,
            outbound,
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Route `message` as if the debuggee had sent it.
    pub fn deliver(&self, message: Value) {
        self.connection.dispatch(message);
    }

    pub fn try_request(&mut self) -> Option<Request> {
        self.outbound.try_recv().ok()
    }

    /// Wait for the next request, yielding to spawned tasks meanwhile.
    ///
    /// # Panics
    ///
    /// Panics if nothing is sent within five seconds.
    pub async fn next_request(&mut self) -> Request {
        match tokio::time::timeout(REQUEST_TIMEOUT, self.outbound.recv()).await {
            Ok(Some(request)) => request,
            Ok(None) => panic!("connection dropped its outbound channel"),
            Err(_) => panic!("no request sent within {REQUEST_TIMEOUT:?}"),
        }
    }

    /// Take the next already-sent request and check where it went.
    ///
    /// # Panics
    ///
    /// Panics if no request is queued or if it does not match.
    #[track_caller]
    pub fn expect_request(&mut self, to: &str, kind: &str) -> Request {
        let Some(request) = self.try_request() else {
            panic!("expected a {kind:?} request to {to:?}, but nothing was sent");
        };
        assert_eq!(
            (request.to.as_str(), request.kind.as_str()),
            (to, kind),
            "unexpected request {request:?}"
        );
        request
    }

    pub fn drain_requests(&mut self) -> Vec<Request> {
        std::iter::from_fn(|| self.try_request()).collect()
    }

    /// # Panics
    ///
    /// Panics if any request is queued.
    #[track_caller]
    pub fn assert_idle(&mut self) {
        if let Some(request) = self.try_request() {
            panic!("unexpected request {request:?}");
        }
    }
}
