//! Shared, replaying value streams
//!
//! A [`ReplayStream`] runs its producer at most once, no matter how many
//! subscribers it has, and records every value the producer emits. Each
//! subscriber gets every recorded value from the beginning, followed by live
//! values until the producer finishes.
//!
//! Clones of a `ReplayStream` are handles to the same underlying stream;
//! [`ReplayStream::ptr_eq`] tells whether two handles are the same instance.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::watch;

type Producer<T> = Box<dyn FnOnce(Emitter<T>) -> BoxFuture<'static, ()> + Send>;

#[derive(Debug)]
struct Replay<T> {
    items: Vec<T>,
    complete: bool,
}

struct Shared<T> {
    sender: watch::Sender<Replay<T>>,
    producer: Mutex<Option<Producer<T>>>,
}

impl<T> Shared<T> {
    fn push(&self, item: T) {
        self.sender.send_modify(|replay| replay.items.push(item));
    }

    fn finish(&self) {
        self.sender.send_modify(|replay| replay.complete = true);
    }
}

impl<T> Shared<T>
where
    T: Send + Sync + 'static,
{
    fn start(self: &Arc<Self>) {
        let producer = self.producer.lock().take();
        if let Some(producer) = producer {
            let emitter = Emitter {
                shared: Arc::clone(self),
            };
            tokio::spawn(producer(emitter));
        }
    }
}

/// Handle given to a producer for emitting values
///
/// The stream completes when the emitter is dropped.
pub struct Emitter<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Emitter<T> {
    /// Record a value and wake all subscribers
    pub fn emit(&self, item: T) {
        self.shared.push(item);
    }
}

impl<T> Drop for Emitter<T> {
    fn drop(&mut self) {
        self.shared.finish();
    }
}

/// Multicast stream that replays all past values to late subscribers
pub struct ReplayStream<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for ReplayStream<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for ReplayStream<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let replay = self.shared.sender.borrow();
        f.debug_struct("ReplayStream")
            .field("items", &replay.items)
            .field("complete", &replay.complete)
            .finish()
    }
}

impl<T> ReplayStream<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a stream whose values come from `producer`.
    ///
    /// The producer is spawned onto the tokio runtime the first time a
    /// subscriber polls the stream.
    pub fn new<F>(producer: F) -> Self
    where
        F: FnOnce(Emitter<T>) -> BoxFuture<'static, ()> + Send + 'static,
    {
        let (sender, _) = watch::channel(Replay {
            items: Vec::new(),
            complete: false,
        });
        Self {
            shared: Arc::new(Shared {
                sender,
                producer: Mutex::new(Some(Box::new(producer))),
            }),
        }
    }

    /// A stream that has already finished with the given values
    pub fn completed(items: Vec<T>) -> Self {
        let (sender, _) = watch::channel(Replay {
            items,
            complete: true,
        });
        Self {
            shared: Arc::new(Shared {
                sender,
                producer: Mutex::new(None),
            }),
        }
    }

    /// Whether `self` and `other` are handles to the same stream
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Append a value from outside of the producer.
    ///
    /// Subscribers that have not reached the end yet receive it, and late
    /// subscribers replay it like any other value.
    pub fn publish(&self, item: T) {
        self.shared.push(item);
    }

    /// Values recorded so far
    pub fn snapshot(&self) -> Vec<T> {
        self.shared.sender.borrow().items.clone()
    }

    /// Whether the producer has finished
    pub fn is_complete(&self) -> bool {
        self.shared.sender.borrow().complete
    }

    /// Subscribe to the stream, starting the producer if needed
    pub fn subscribe(&self) -> BoxStream<'static, T> {
        let shared = Arc::clone(&self.shared);
        let receiver = self.shared.sender.subscribe();

        stream::unfold(
            (shared, receiver, 0usize),
            |(shared, mut receiver, cursor)| async move {
                shared.start();
                loop {
                    {
                        let replay = receiver.borrow_and_update();
                        if let Some(item) = replay.items.get(cursor) {
                            let item = item.clone();
                            drop(replay);
                            return Some((item, (shared, receiver, cursor + 1)));
                        }
                        if replay.complete {
                            return None;
                        }
                    }
                    if receiver.changed().await.is_err() {
                        return None;
                    }
                }
            },
        )
        .boxed()
    }

    /// Wait for the stream to finish and return every value it produced
    pub async fn collect_all(&self) -> Vec<T> {
        self.subscribe().collect().await
    }
}
