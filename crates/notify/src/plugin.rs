//! Bootstrap and teardown.
//!
//! [`NotifyPlugin`] wires every component from a [`NotifyConfig`]:
//!
//! ```text
//! config ─► registry ─► (mailbox) ─► processor ─► router ─► dispatcher ─► subscriptions
//! ```
//!
//! and [`NotifyPlugin::destroy`] tears them down in reverse: subscriptions
//! and in-flight chains first, then the queue (draining buffered jobs), the
//! worker, and finally the mailbox server.

use std::sync::{Arc, Mutex, PoisonError};

use postbox_events::{DomainEvent, EventBus};

use crate::config::NotifyConfig;
use crate::delivery::{
    ChannelWorker, DeliveryMode, DeliveryObserver, DeliveryRouter, JobQueue, QueueForwarder,
    WorkerHandle,
};
use crate::dispatcher::{DispatchReport, EventDispatcher};
use crate::error::BootstrapError;
use crate::handler::HandlerDefinition;
use crate::loader::{Injector, ServiceRegistry};
use crate::mailbox::{DevMailbox, MailboxStore, MockEventSink};
use crate::processor::{PayloadProcessor, TemplateProcessor};
use crate::registry::HandlerRegistry;
use crate::render::{Template, TemplateSet};
use crate::transport::{FileTransport, Transport};

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

pub struct NotifyPluginBuilder {
    config: NotifyConfig,
    handlers: Vec<HandlerDefinition>,
    known_event_types: Option<Vec<String>>,
    injector: Option<Arc<dyn Injector>>,
    templates: TemplateSet,
    transport: Option<Arc<dyn Transport>>,
    processor: Option<Arc<dyn PayloadProcessor>>,
    observers: Vec<Arc<dyn DeliveryObserver>>,
}

impl NotifyPluginBuilder {
    pub fn handler(mut self, handler: HandlerDefinition) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn handlers(mut self, handlers: impl IntoIterator<Item = HandlerDefinition>) -> Self {
        self.handlers.extend(handlers);
        self
    }

    /// Reject handlers for event types outside this list.
    pub fn known_event_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_event_types = Some(types.into_iter().map(Into::into).collect());
        self
    }

    /// Services available to data loaders. Defaults to an empty registry.
    pub fn injector(mut self, injector: Arc<dyn Injector>) -> Self {
        self.injector = Some(injector);
        self
    }

    pub fn templates(mut self, templates: TemplateSet) -> Self {
        self.templates = templates;
        self
    }

    pub fn template(mut self, name: impl Into<String>, template: Template) -> Self {
        self.templates.insert(name, template);
        self
    }

    /// Transport for queued and inline mode. Dev mode always writes to the
    /// file sink at `dev.output_path`.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replace render-and-send entirely. Takes precedence over templates and
    /// transport in every mode.
    pub fn processor(mut self, processor: Arc<dyn PayloadProcessor>) -> Self {
        self.processor = Some(processor);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn DeliveryObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Build everything and subscribe to `bus`.
    pub async fn start(self, bus: &EventBus) -> Result<NotifyPlugin, BootstrapError> {
        let config = self.config;
        config.validate()?;

        let mut registry = HandlerRegistry::builder().handlers(self.handlers);
        if let Some(types) = self.known_event_types {
            registry = registry.known_event_types(types);
        }
        let registry = Arc::new(registry.build()?);

        // The mailbox binds before anything spawns so a taken port fails fast.
        let store = (config.delivery_mode == DeliveryMode::Dev).then(|| Arc::new(MailboxStore::new()));
        let mailbox = match (&store, &config.dev.mailbox) {
            (Some(store), Some(options)) => Some(
                DevMailbox::serve(options.clone(), Arc::clone(store), Arc::clone(&registry)).await?,
            ),
            _ => None,
        };

        let processor: Arc<dyn PayloadProcessor> = match self.processor {
            Some(processor) => processor,
            None => {
                let transport: Arc<dyn Transport> = match config.delivery_mode {
                    DeliveryMode::Dev => Arc::new(FileTransport::new(&config.dev.output_path)),
                    mode => self.transport.ok_or(BootstrapError::MissingTransport {
                        mode: mode.as_str(),
                    })?,
                };
                Arc::new(TemplateProcessor::new(Arc::new(self.templates), transport))
            }
        };

        let mut worker = None;
        let mut router = match config.delivery_mode {
            DeliveryMode::Queued => {
                let (channel, handle) = ChannelWorker::spawn(processor);
                worker = Some(handle);
                let forwarder = QueueForwarder::new(Arc::new(channel));
                let queue = JobQueue::start(&config.queue_name, config.concurrency, Arc::new(forwarder))
                    .with_retention(config.retained_jobs);
                DeliveryRouter::queued(queue)
            }
            DeliveryMode::Inline => DeliveryRouter::inline(processor),
            DeliveryMode::Dev => DeliveryRouter::dev(processor),
        };
        if let Some(store) = &store {
            router = router.with_observer(store.clone());
        }
        for observer in self.observers {
            router = router.with_observer(observer);
        }

        let injector = self
            .injector
            .unwrap_or_else(|| Arc::new(ServiceRegistry::new()));
        let dispatcher = Arc::new(EventDispatcher::new(
            Arc::clone(&registry),
            Arc::new(router),
            injector,
            Arc::new(config.global_vars.clone()),
        ));

        if let Some(mailbox) = &mailbox {
            let sink: Arc<dyn MockEventSink> = dispatcher.clone();
            mailbox.handle_mock_event(sink);
        }
        dispatcher.start(bus);

        tracing::info!(
            mode = %config.delivery_mode,
            handlers = registry.len(),
            mailbox = ?mailbox.as_ref().map(DevMailbox::local_addr),
            "Notification plugin started"
        );

        Ok(NotifyPlugin {
            config: Arc::new(config),
            dispatcher,
            worker: Mutex::new(worker),
            store,
            mailbox,
        })
    }
}

// ---------------------------------------------------------------------------
// NotifyPlugin
// ---------------------------------------------------------------------------

/// A running notification pipeline.
pub struct NotifyPlugin {
    config: Arc<NotifyConfig>,
    dispatcher: Arc<EventDispatcher>,
    worker: Mutex<Option<WorkerHandle>>,
    store: Option<Arc<MailboxStore>>,
    mailbox: Option<DevMailbox>,
}

impl std::fmt::Debug for NotifyPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyPlugin").finish_non_exhaustive()
    }
}

impl NotifyPlugin {
    pub fn builder(config: NotifyConfig) -> NotifyPluginBuilder {
        NotifyPluginBuilder {
            config,
            handlers: Vec::new(),
            known_event_types: None,
            injector: None,
            templates: TemplateSet::new(),
            transport: None,
            processor: None,
            observers: Vec::new(),
        }
    }

    pub fn config(&self) -> &Arc<NotifyConfig> {
        &self.config
    }

    pub fn mode(&self) -> DeliveryMode {
        self.config.delivery_mode
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        self.dispatcher.registry()
    }

    /// The job queue, in queued mode.
    pub fn queue(&self) -> Option<&JobQueue> {
        self.dispatcher.router().queue()
    }

    /// Captured payloads, in dev mode.
    pub fn mailbox_store(&self) -> Option<&Arc<MailboxStore>> {
        self.store.as_ref()
    }

    /// The dev mailbox server, when one is configured.
    pub fn mailbox(&self) -> Option<&DevMailbox> {
        self.mailbox.as_ref()
    }

    /// Dispatch `event` directly, bypassing the bus.
    pub async fn dispatch(&self, event: &DomainEvent) -> DispatchReport {
        self.dispatcher.dispatch(event).await
    }

    /// Tear everything down in reverse bootstrap order.
    pub async fn destroy(&self) {
        self.dispatcher.shutdown().await;
        self.dispatcher.router().shutdown().await;

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            worker.join().await;
        }

        if let Some(mailbox) = &self.mailbox {
            mailbox.destroy().await;
        }
        tracing::info!("Notification plugin destroyed");
    }
}

impl Drop for NotifyPlugin {
    fn drop(&mut self) {
        self.dispatcher.stop();
    }
}
