//! [`ChanMgr`]: a map from relay identity to open link connection.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use futures::channel::oneshot;
use futures::future::{FutureExt, Shared};
use tracing::trace;

use tor_linkspec::ChanTarget;
use tor_llcrypto::pk::rsa::RsaIdentity;
use tor_proto::channel::Channel;

use crate::err::{Error, Result};
use crate::retry::connect_with_retry;

/// How long a channel with no open circuits may sit idle before
/// [`ChanMgr::expire_idle`] closes it.
const DEFAULT_MAX_IDLE: Duration = Duration::from_secs(180);

/// A future other callers can await while a channel to some relay is
/// being built.
type Pending = Shared<oneshot::Receiver<Channel>>;

/// One entry in the channel table.
enum Entry {
    /// An open channel, plus when it was last handed out.
    Open { channel: Channel, last_used: Instant },
    /// A build in progress; other callers wanting the same relay wait on
    /// this instead of launching a second connection.
    Building(Pending),
}

/// Tracks at most one open [`Channel`] per relay identity, and
/// deduplicates concurrent connection attempts to the same relay.
pub struct ChanMgr {
    /// The relay identity this manager keys channels by.
    channels: Mutex<HashMap<RsaIdentity, Entry>>,
    /// How long an unused channel may stay open before `expire_idle` closes it.
    max_idle: Duration,
}

impl Default for ChanMgr {
    fn default() -> Self {
        Self::new()
    }
}

impl ChanMgr {
    /// Create an empty channel manager with the default idle timeout.
    pub fn new() -> Self {
        ChanMgr {
            channels: Mutex::new(HashMap::new()),
            max_idle: DEFAULT_MAX_IDLE,
        }
    }

    /// Create an empty channel manager that closes channels idle for
    /// longer than `max_idle`.
    pub fn with_max_idle(max_idle: Duration) -> Self {
        ChanMgr {
            channels: Mutex::new(HashMap::new()),
            max_idle,
        }
    }

    /// Return an open channel to `target`, reusing one already open to the
    /// same relay identity if it is still usable, waiting for a
    /// same-identity build already in progress, or launching a new one via
    /// [`connect_with_retry`].
    pub async fn get_or_launch<T: ChanTarget + ?Sized>(&self, target: &T) -> Result<Channel> {
        let ident = *target.rsa_identity();
        let addr = target.addr();

        enum Action {
            Return(Channel),
            Wait(Pending),
            Launch(oneshot::Sender<Channel>),
        }

        let action = {
            let mut channels = self.channels.lock().expect("not poisoned");
            match channels.get(&ident) {
                Some(Entry::Open { channel, .. }) => Action::Return(channel.clone()),
                Some(Entry::Building(pending)) => Action::Wait(pending.clone()),
                None => {
                    let (tx, rx) = oneshot::channel();
                    channels.insert(ident, Entry::Building(rx.shared()));
                    Action::Launch(tx)
                }
            }
        };

        match action {
            Action::Return(chan) => {
                self.touch(&ident);
                Ok(chan)
            }
            Action::Wait(pending) => pending
                .await
                .map_err(|_| Error::PendingFailed { peer: addr.into() }),
            Action::Launch(tx) => {
                let chan = connect_with_retry(addr).await;
                trace!("opened link to {}", addr);

                let mut channels = self.channels.lock().expect("not poisoned");
                channels.insert(
                    ident,
                    Entry::Open { channel: chan.clone(), last_used: Instant::now() },
                );
                drop(channels);

                // Only fails if nobody was waiting; that's fine.
                let _ = tx.send(chan.clone());
                Ok(chan)
            }
        }
    }

    /// Refresh the last-used timestamp for an open channel.
    fn touch(&self, ident: &RsaIdentity) {
        let mut channels = self.channels.lock().expect("not poisoned");
        if let Some(Entry::Open { last_used, .. }) = channels.get_mut(ident) {
            *last_used = Instant::now();
        }
    }

    /// Drop any open channel that has been idle longer than this manager's
    /// `max_idle`, and any channel that has become unusable.
    pub fn expire_idle(&self) {
        let mut channels = self.channels.lock().expect("not poisoned");
        channels.retain(|_, entry| match entry {
            Entry::Open { channel, last_used } => {
                channel.is_usable() && last_used.elapsed() < self.max_idle
            }
            Entry::Building(_) => true,
        });
    }

    /// Return the currently open, usable channel for `ident`, if any,
    /// without launching a new one.
    pub fn get_nowait(&self, ident: &RsaIdentity) -> Option<Channel> {
        let channels = self.channels.lock().expect("not poisoned");
        match channels.get(ident) {
            Some(Entry::Open { channel, .. }) if channel.is_usable() => Some(channel.clone()),
            _ => None,
        }
    }
}
