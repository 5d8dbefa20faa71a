use crate::error::Error;
use crate::subscription::{
    queue, request_removal, Outbox, PushError, Removal, Subscription, SubscriptionId,
};
use events::{Event, Repository};
use futures::StreamExt;
use log::*;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Default number of events a client may fall behind before it is disconnected.
pub const DEFAULT_BUFFER_SIZE: usize = 128;

const COMMAND_CAPACITY: usize = 64;
// Only carries removal requests from connections and replay tasks.
const REMOVAL_CAPACITY: usize = 16;

/// Broker-wide knobs.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Add a wildcard `Access-Control-Allow-Origin` header to stream responses.
    pub allow_cors: bool,
    /// Replay history even when the client sent no `Last-Event-ID`.
    pub replay_all: bool,
    /// Per-subscription queue capacity.
    pub buffer_size: usize,
    /// Compress streams for clients that accept gzip.
    pub gzip: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            allow_cors: false,
            replay_all: false,
            buffer_size: DEFAULT_BUFFER_SIZE,
            gzip: false,
        }
    }
}

struct Registration {
    id: SubscriptionId,
    channel: String,
    last_event_id: String,
    outbox: Outbox,
}

enum Command {
    Register {
        channel: String,
        repository: Arc<dyn Repository>,
    },
    RegisterDefault {
        repository: Arc<dyn Repository>,
    },
    Subscribe {
        registration: Registration,
        accepted: oneshot::Sender<()>,
    },
    Publish {
        channels: Vec<String>,
        event: Event,
    },
    Count {
        channel: String,
        reply: oneshot::Sender<usize>,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

/// Handle to the coordinator task that owns all subscriber and repository
/// state. Cloning is cheap; every clone talks to the same coordinator.
///
/// Operations never fail at the call site. Once the broker has shut down
/// they are logged and ignored.
#[derive(Clone)]
pub struct Broker {
    config: BrokerConfig,
    commands: mpsc::Sender<Command>,
    removals: mpsc::Sender<Removal>,
}

impl Broker {
    /// Starts the coordinator on the current tokio runtime.
    pub fn new(config: BrokerConfig) -> Self {
        let (commands, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (removals, removal_rx) = mpsc::channel(REMOVAL_CAPACITY);

        let coordinator = Coordinator {
            replay_all: config.replay_all,
            subscribers: HashMap::new(),
            repositories: HashMap::new(),
            default_repository: None,
            evictions: Vec::new(),
            removals: removals.clone(),
        };
        tokio::spawn(coordinator.run(command_rx, removal_rx));
        info!(
            "SSE broker started (buffer_size={}, replay_all={}, gzip={}, allow_cors={})",
            config.buffer_size, config.replay_all, config.gzip, config.allow_cors
        );

        Self {
            config,
            commands,
            removals,
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Register the repository used to replay history for `channel`.
    /// A later registration for the same channel replaces the earlier one.
    pub async fn register(&self, channel: impl Into<String>, repository: Arc<dyn Repository>) {
        self.submit(Command::Register {
            channel: channel.into(),
            repository,
        })
        .await;
    }

    /// Register the repository used for every channel without its own.
    pub async fn register_default_repository(&self, repository: Arc<dyn Repository>) {
        self.submit(Command::RegisterDefault { repository }).await;
    }

    /// Publish an event to one or more channels.
    pub async fn publish<I, S>(&self, channels: I, event: impl Into<Event>)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.submit(Command::Publish {
            channels: channels.into_iter().map(Into::into).collect(),
            event: event.into(),
        })
        .await;
    }

    /// Join `channel`, returning once the coordinator has registered the
    /// subscription so nothing published afterwards can be missed.
    ///
    /// After shutdown the returned subscription is already closed.
    pub async fn subscribe(
        &self,
        channel: impl Into<String>,
        last_event_id: impl Into<String>,
    ) -> Subscription {
        let (outbox, inbox) = queue(self.config.buffer_size);
        let id = SubscriptionId::new();
        let channel = channel.into();
        let last_event_id = last_event_id.into();

        let (accepted, acceptance) = oneshot::channel();
        let registration = Registration {
            id: id.clone(),
            channel: channel.clone(),
            last_event_id: last_event_id.clone(),
            outbox: outbox.clone(),
        };
        let sent = self
            .commands
            .send(Command::Subscribe {
                registration,
                accepted,
            })
            .await
            .is_ok();
        if !sent || acceptance.await.is_err() {
            debug!("Broker is shut down, subscription to {channel} starts closed");
            outbox.close();
        }

        Subscription::new(id, channel, last_event_id, inbox, self.removals.clone())
    }

    /// Leave the subscription's channel. Removing an unknown subscription is a no-op.
    pub async fn unsubscribe(&self, mut subscription: Subscription) {
        subscription.close();
        // Waits for mailbox room, unlike the best-effort request made on drop.
        let _ = self.removals.send(subscription.removal()).await;
    }

    /// Number of live subscribers on `channel`.
    pub async fn subscriber_count(&self, channel: impl Into<String>) -> Result<usize, Error> {
        let (reply, count) = oneshot::channel();
        self.commands
            .send(Command::Count {
                channel: channel.into(),
                reply,
            })
            .await
            .map_err(|_| Error::broker_closed())?;
        count.await.map_err(|_| Error::broker_closed())
    }

    /// Close every subscription and stop the coordinator. Safe to call more than once.
    pub async fn shutdown(&self) {
        let (done, finished) = oneshot::channel();
        if self.commands.send(Command::Shutdown { done }).await.is_ok() {
            let _ = finished.await;
        }
    }

    async fn submit(&self, command: Command) {
        if self.commands.send(command).await.is_err() {
            debug!("Broker is shut down, ignoring command");
        }
    }
}

/// Single owner of the broker state. Runs as one task and handles one
/// command at a time, so none of its maps need locking.
struct Coordinator {
    replay_all: bool,
    subscribers: HashMap<String, HashMap<SubscriptionId, Outbox>>,
    repositories: HashMap<String, Arc<dyn Repository>>,
    default_repository: Option<Arc<dyn Repository>>,
    // Evictions raised while publishing, applied before the next command.
    evictions: Vec<Removal>,
    // Handed to replay tasks so they can report overflow.
    removals: mpsc::Sender<Removal>,
}

impl Coordinator {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut removals: mpsc::Receiver<Removal>,
    ) {
        let done = loop {
            self.apply_evictions();

            tokio::select! {
                biased;
                Some(removal) = removals.recv() => self.remove(&removal),
                command = commands.recv() => match command {
                    Some(Command::Shutdown { done }) => break Some(done),
                    Some(command) => self.handle(command),
                    None => break None,
                },
            }
        };

        // Reject new commands before reporting that shutdown finished.
        drop(commands);
        self.close_all();
        if let Some(done) = done {
            let _ = done.send(());
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Register {
                channel,
                repository,
            } => {
                debug!("Registering repository for channel {channel}");
                self.repositories.insert(channel, repository);
            }
            Command::RegisterDefault { repository } => {
                debug!("Registering default repository");
                self.default_repository = Some(repository);
            }
            Command::Subscribe {
                registration,
                accepted,
            } => {
                self.subscribe(registration);
                let _ = accepted.send(());
            }
            Command::Publish { channels, event } => self.publish(&channels, event),
            Command::Count { channel, reply } => {
                let count = self.subscribers.get(&channel).map_or(0, HashMap::len);
                let _ = reply.send(count);
            }
            Command::Shutdown { .. } => unreachable!("shutdown ends the command loop"),
        }
    }

    fn subscribe(&mut self, registration: Registration) {
        let Registration {
            id,
            channel,
            last_event_id,
            outbox,
        } = registration;

        debug!("Subscription {id} joined channel {channel}");
        self.subscribers
            .entry(channel.clone())
            .or_default()
            .insert(id.clone(), outbox.clone());

        if !self.replay_all && last_event_id.is_empty() {
            return;
        }
        let repository = self
            .repositories
            .get(&channel)
            .or(self.default_repository.as_ref())
            .cloned();
        match repository {
            Some(repository) => {
                tokio::spawn(replay(
                    repository,
                    Removal { channel, id },
                    last_event_id,
                    outbox,
                    self.removals.clone(),
                ));
            }
            None => trace!("No repository for channel {channel}, skipping replay"),
        }
    }

    fn publish(&mut self, channels: &[String], event: Event) {
        for channel in channels {
            let Some(subscribers) = self.subscribers.get(channel) else {
                continue;
            };
            for (id, outbox) in subscribers {
                match outbox.try_push(event.clone()) {
                    Ok(()) => {}
                    Err(PushError::Full) => {
                        warn!("Subscription {id} on channel {channel} fell behind, disconnecting");
                        outbox.close();
                        self.evictions.push(Removal {
                            channel: channel.clone(),
                            id: id.clone(),
                        });
                    }
                    Err(PushError::Closed) => self.evictions.push(Removal {
                        channel: channel.clone(),
                        id: id.clone(),
                    }),
                }
            }
        }
    }

    fn apply_evictions(&mut self) {
        for removal in std::mem::take(&mut self.evictions) {
            self.remove(&removal);
        }
    }

    fn remove(&mut self, removal: &Removal) {
        if let Some(subscribers) = self.subscribers.get_mut(&removal.channel) {
            if subscribers.remove(&removal.id).is_some() {
                debug!(
                    "Subscription {} left channel {}",
                    removal.id, removal.channel
                );
            }
            if subscribers.is_empty() {
                self.subscribers.remove(&removal.channel);
            }
        }
    }

    fn close_all(&mut self) {
        let mut closed = 0;
        for (_, subscribers) in self.subscribers.drain() {
            for (_, outbox) in subscribers {
                outbox.close();
                closed += 1;
            }
        }
        info!("SSE broker stopped, closed {closed} subscription(s)");
    }
}

/// Drains a repository's history into one subscription, evicting it on
/// overflow exactly like a live publish would.
async fn replay(
    repository: Arc<dyn Repository>,
    subscription: Removal,
    last_event_id: String,
    outbox: Outbox,
    removals: mpsc::Sender<Removal>,
) {
    let mut history = repository.replay(&subscription.channel, &last_event_id);
    let mut replayed = 0usize;

    loop {
        // A closed queue ends the replay even while the source is idle.
        let event = tokio::select! {
            biased;
            _ = outbox.closed() => return,
            event = history.next() => match event {
                Some(event) => event,
                None => break,
            },
        };
        match outbox.try_push(event) {
            Ok(()) => replayed += 1,
            Err(PushError::Full) => {
                warn!(
                    "Subscription {} on channel {} overflowed during replay, disconnecting",
                    subscription.id, subscription.channel
                );
                outbox.close();
                request_removal(&removals, subscription);
                return;
            }
            Err(PushError::Closed) => return,
        }
    }

    debug!(
        "Replayed {replayed} event(s) to subscription {} on channel {}",
        subscription.id, subscription.channel
    );
}
