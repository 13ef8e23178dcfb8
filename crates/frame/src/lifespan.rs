//! The lifespan sub-protocol: the process startup/shutdown handshake.
//!
//! The server opens one `lifespan` connection per process and sends `lifespan.startup` before it
//! accepts traffic and `lifespan.shutdown` when it stops. The [`LifespanHandler`] answers each
//! with the matching `*.complete` message after running the [`LifespanHooks`], or with
//! `*.failed` if a hook returned an error.

use std::error::Error;

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::protocol::{Incoming, Outgoing, ProtocolError};
use crate::transport::Channel;

pub type BoxError = Box<dyn Error + Send + Sync>;

/// Process init and teardown hooks run by the lifespan handshake.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LifespanHooks: Send + Sync {
    async fn on_startup(&self) -> Result<(), BoxError> {
        Ok(())
    }

    async fn on_shutdown(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Hooks that do nothing.
#[derive(Debug, Default, Copy, Clone)]
pub struct NoopHooks;

impl LifespanHooks for NoopHooks {}

pub struct LifespanHandler<'h> {
    hooks: &'h dyn LifespanHooks,
}

impl<'h> LifespanHandler<'h> {
    pub fn new(hooks: &'h dyn LifespanHooks) -> Self {
        Self { hooks }
    }

    /// Answers handshake messages until the server closes the receive side.
    ///
    /// Each reply is sent before the next message is received. Messages that are not part of the
    /// lifespan protocol are ignored. The loop does not end after `lifespan.shutdown`: a server
    /// may run further handshake rounds on the same connection, so only the end of the receive
    /// stream terminates it.
    pub async fn run(&self, channel: &mut Channel) -> Result<(), ProtocolError> {
        while let Some(message) = channel.receive().await {
            let reply = match message {
                Incoming::LifespanStartup => match self.hooks.on_startup().await {
                    Ok(()) => {
                        info!("lifespan startup complete");
                        Outgoing::LifespanStartupComplete
                    }
                    Err(e) => {
                        error!(cause = %e, "lifespan startup failed");
                        Outgoing::LifespanStartupFailed { message: e.to_string() }
                    }
                },
                Incoming::LifespanShutdown => match self.hooks.on_shutdown().await {
                    Ok(()) => {
                        info!("lifespan shutdown complete");
                        Outgoing::LifespanShutdownComplete
                    }
                    Err(e) => {
                        error!(cause = %e, "lifespan shutdown failed");
                        Outgoing::LifespanShutdownFailed { message: e.to_string() }
                    }
                },
                other => {
                    debug!(message_type = other.type_name(), "ignore non-lifespan message");
                    continue;
                }
            };

            channel.send(reply).await?;
        }

        info!("lifespan receive side closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use futures::{StreamExt, sink, stream};

    type Log = Arc<Mutex<Vec<String>>>;

    /// A channel whose both halves record into `log`, so the interleaving of receives and sends
    /// can be asserted.
    fn recording_channel(messages: Vec<Incoming>, log: &Log) -> Channel {
        let recv_log = Arc::clone(log);
        let inbound = stream::iter(messages).inspect(move |m| {
            recv_log.lock().unwrap().push(format!("recv {}", m.type_name()));
        });

        let outbound = sink::unfold(Arc::clone(log), |log, m: Outgoing| async move {
            log.lock().unwrap().push(format!("send {}", m.type_name()));
            Ok::<_, ProtocolError>(log)
        });

        Channel::new(inbound, outbound)
    }

    #[tokio::test]
    async fn startup_is_answered_before_next_message() {
        let log = Log::default();
        let mut channel = recording_channel(vec![Incoming::LifespanStartup, Incoming::LifespanShutdown], &log);

        let mut hooks = MockLifespanHooks::new();
        hooks.expect_on_startup().times(1).returning(|| Ok(()));
        hooks.expect_on_shutdown().times(1).returning(|| Ok(()));

        LifespanHandler::new(&hooks).run(&mut channel).await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "recv lifespan.startup",
                "send lifespan.startup.complete",
                "recv lifespan.shutdown",
                "send lifespan.shutdown.complete",
            ]
        );
    }

    #[tokio::test]
    async fn failing_startup_hook_reports_failure() {
        let (tx, mut rx) = futures::channel::mpsc::channel(4);
        let mut channel = Channel::new(stream::iter(vec![Incoming::LifespanStartup]), tx);

        let mut hooks = MockLifespanHooks::new();
        hooks.expect_on_startup().returning(|| Err("database unreachable".into()));

        LifespanHandler::new(&hooks).run(&mut channel).await.unwrap();

        assert_eq!(
            rx.try_next().unwrap(),
            Some(Outgoing::LifespanStartupFailed { message: "database unreachable".into() })
        );
    }

    #[tokio::test]
    async fn other_messages_are_ignored() {
        let log = Log::default();
        let messages = vec![Incoming::http_request("x", false), Incoming::LifespanShutdown];
        let mut channel = recording_channel(messages, &log);

        LifespanHandler::new(&NoopHooks).run(&mut channel).await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["recv http.request", "recv lifespan.shutdown", "send lifespan.shutdown.complete"]
        );
    }

    #[tokio::test]
    async fn loop_survives_repeated_handshakes() {
        let log = Log::default();
        let messages = vec![
            Incoming::LifespanStartup,
            Incoming::LifespanShutdown,
            Incoming::LifespanStartup,
            Incoming::LifespanShutdown,
        ];
        let mut channel = recording_channel(messages, &log);

        LifespanHandler::new(&NoopHooks).run(&mut channel).await.unwrap();

        let sends = log.lock().unwrap().iter().filter(|entry| entry.starts_with("send")).count();
        assert_eq!(sends, 4);
    }
}
