use std::{
    error::Error,
    sync::{mpsc as std_mpsc, Arc, Mutex, PoisonError},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::normalize::truncate;
use crate::value::short_type_name;
use crate::{
    DeliveryError, Dsn, ErrorValue, Event, EventHint, Exception, ExceptionValues, HttpTransport,
    Level, Mechanism, SinkError, SinkOptions, Transport,
};

const PLATFORM: &str = "rust";
const WORKER_THREAD_NAME: &str = "report-sink-delivery";

/// Called on the delivery worker after an event could not be delivered.
pub type DeliveryFailureListener = Arc<dyn Fn(&DeliveryError) + Send + Sync>;

type SharedListener = Arc<Mutex<Option<DeliveryFailureListener>>>;

enum Command {
    Deliver(Box<Event>),
    Flush(std_mpsc::SyncSender<()>),
}

/// Holds the sink configuration and hands finished events to a background
/// delivery worker.
///
/// Capturing never waits on the network: events are queued and the worker
/// posts them one after another on its own thread. Failed deliveries are
/// logged, reported to the failure listener and dropped.
pub struct Sink {
    options: SinkOptions,
    queue: mpsc::UnboundedSender<Command>,
    failure_listener: SharedListener,
}

impl Sink {
    /// Builds a sink posting to the collector named by `dsn`.
    pub fn new(dsn: &str, options: SinkOptions) -> Result<Self, SinkError> {
        let dsn = Dsn::parse(dsn)?;
        let transport = HttpTransport::new(&dsn, &options)?;
        debug!(url = %transport.store_url(), "report sink configured");
        Self::with_transport(options, Arc::new(transport))
    }

    /// Builds a sink that delivers through a caller-provided transport.
    pub fn with_transport(
        options: SinkOptions,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, SinkError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(SinkError::Runtime)?;
        let (queue, receiver) = mpsc::unbounded_channel();
        let failure_listener: SharedListener = Arc::new(Mutex::new(None));

        let worker_listener = failure_listener.clone();
        std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || runtime.block_on(delivery_task(receiver, transport, worker_listener)))
            .map_err(SinkError::Worker)?;

        Ok(Self {
            options,
            queue,
            failure_listener,
        })
    }

    pub fn options(&self) -> &SinkOptions {
        &self.options
    }

    /// Queues `event` for delivery. Fire-and-forget.
    pub fn capture(&self, mut event: Event, hint: EventHint) {
        self.prepare(&mut event);

        let event = match &self.options.before_send {
            Some(before_send) => match before_send(event, &hint) {
                Some(event) => event,
                None => {
                    debug!("event dropped by before_send");
                    return;
                }
            },
            None => event,
        };

        if self.queue.send(Command::Deliver(Box::new(event))).is_err() {
            warn!("delivery worker is gone; dropping event");
        }
    }

    /// Reports an error the application already handled.
    ///
    /// The error and each entry of its `source()` chain become one exception
    /// entry, outermost first.
    pub fn capture_manual<E: Error + ?Sized>(&self, err: &E) {
        let mut values = vec![Exception {
            ty: Some(short_type_name::<E>()),
            value: Some(err.to_string()),
            mechanism: Some(Mechanism {
                ty: "generic".to_string(),
                handled: true,
                data: Default::default(),
            }),
            stacktrace: None,
        }];
        values.extend(
            std::iter::successors(err.source(), |&cause| cause.source()).map(|cause| Exception {
                ty: Some("Error".to_string()),
                value: Some(cause.to_string()),
                ..Exception::default()
            }),
        );

        let event = Event {
            level: Some(Level::Error),
            exception: Some(ExceptionValues { values }),
            ..Event::default()
        };
        let hint = EventHint {
            data: None,
            original_exception: Some(ErrorValue::from_error(err)),
        };
        self.capture(event, hint);
    }

    pub fn capture_message(&self, message: impl Into<String>, level: Level) {
        let event = Event {
            level: Some(level),
            message: Some(message.into()),
            ..Event::default()
        };
        self.capture(event, EventHint::default());
    }

    /// Blocks until every event queued before this call has been attempted,
    /// or `timeout` elapses. Returns `false` on timeout or when the worker is
    /// gone. Must not be called from the delivery worker itself.
    pub fn flush(&self, timeout: Duration) -> bool {
        let (ack, done) = std_mpsc::sync_channel(1);
        if self.queue.send(Command::Flush(ack)).is_err() {
            return false;
        }
        done.recv_timeout(timeout).is_ok()
    }

    /// Registers the callback told about failed deliveries, replacing any
    /// previous one.
    pub fn set_delivery_failure_listener<F>(&self, listener: F)
    where
        F: Fn(&DeliveryError) + Send + Sync + 'static,
    {
        *self
            .failure_listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(listener));
    }

    fn prepare(&self, event: &mut Event) {
        let max = self.options.max_value_length;

        event.level.get_or_insert(Level::Error);
        event.platform.get_or_insert_with(|| PLATFORM.to_string());
        if event.release.is_none() {
            event.release = self.options.release.clone();
        }
        if event.environment.is_none() {
            event.environment = self.options.environment.clone();
        }
        if event.timestamp.is_none() {
            event.timestamp = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .ok()
                .map(|elapsed| elapsed.as_secs_f64());
        }

        if let Some(message) = event.message.as_mut() {
            *message = truncate(message, max);
        }
        if let Some(exception) = event.exception.as_mut() {
            for entry in &mut exception.values {
                if let Some(value) = entry.value.as_mut() {
                    *value = truncate(value, max);
                }
            }
        }
    }
}

impl std::fmt::Debug for Sink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sink")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

async fn delivery_task(
    mut queue: mpsc::UnboundedReceiver<Command>,
    transport: Arc<dyn Transport>,
    failure_listener: SharedListener,
) {
    while let Some(command) = queue.recv().await {
        match command {
            Command::Deliver(event) => {
                if let Err(err) = transport.send(*event).await {
                    warn!(error = %err, "failed to deliver event");
                    let listener = failure_listener
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .clone();
                    if let Some(listener) = listener {
                        listener(&err);
                    }
                }
            }
            Command::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
    debug!("delivery worker stopped");
}
