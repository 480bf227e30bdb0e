use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, RwLock};

use crate::config::BotConfig;
use crate::irc::{Client, LineFramer, ListenerRegistry};
use crate::types::{DispatchResult, InboundMessage, Tier};

pub mod builtins;
pub mod dispatch;
pub mod hooks;
pub mod jobs;
pub mod substitution;

use dispatch::Dispatcher;
use hooks::{Handler, HandlerSet, HookCatalog, HookModule};
use jobs::JobSupervisor;

const READ_BUFFER_SIZE: usize = 2048;

struct BotInner {
    client: Client,
    listeners: RwLock<ListenerRegistry<Bot>>,
    catalog: Mutex<HookCatalog>,
    handlers: RwLock<Arc<HandlerSet>>,
    dispatcher: Dispatcher,
    jobs: JobSupervisor,
    /// Set once the server has acknowledged us on the current connection
    ready: AtomicBool,
}

/// A chat bot bound to one server connection.
///
/// Cheap to clone; every clone drives the same connection, listeners and
/// handler set. Lines are read and dispatched by a single task, handlers run
/// to completion before the next line is read, and periodic jobs run on
/// their own tasks.
#[derive(Clone)]
pub struct Bot {
    inner: Arc<BotInner>,
}

impl Bot {
    pub fn new(mut config: BotConfig) -> DispatchResult<Self> {
        config.finalize();

        let mut listeners = ListenerRegistry::new();
        builtins::register(&mut listeners, &config)?;

        let dispatcher = Dispatcher::new(&config)?;
        let client = Client::new(Arc::new(config));
        let jobs = JobSupervisor::new(client.clone());

        Ok(Self {
            inner: Arc::new(BotInner {
                client,
                listeners: RwLock::new(listeners),
                catalog: Mutex::new(HookCatalog::new()),
                handlers: RwLock::new(Arc::new(HandlerSet::default())),
                dispatcher,
                jobs,
                ready: AtomicBool::new(false),
            }),
        })
    }

    pub fn client(&self) -> &Client {
        &self.inner.client
    }

    pub fn config(&self) -> &BotConfig {
        self.inner.client.config()
    }

    pub fn jobs(&self) -> &JobSupervisor {
        &self.inner.jobs
    }

    /// Snapshot of the handler set the dispatcher currently routes against
    pub async fn handlers(&self) -> Arc<HandlerSet> {
        Arc::clone(&*self.inner.handlers.read().await)
    }

    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::SeqCst)
    }

    /// Add a handler of the bot's own. Takes effect on the next `load_hooks`.
    pub async fn register(&self, handler: Handler) {
        self.inner.catalog.lock().await.add_handler(handler);
    }

    /// Add a behaviour module. Takes effect on the next `load_hooks`.
    pub async fn add_module(&self, module: Arc<dyn HookModule>) {
        self.inner.catalog.lock().await.add_module(module);
    }

    /// Listen for raw protocol lines matching `pattern`
    pub async fn add_listener<F, Fut>(&self, pattern: &str, callback: F) -> DispatchResult<()>
    where
        F: Fn(Bot, Vec<Option<String>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.inner.listeners.write().await.register(pattern, callback)
    }

    /// Rebuild the handler set from own handlers and every module.
    ///
    /// The new set replaces the old one in a single swap. Idle jobs pick up
    /// the new periodic handlers (or go away with them), running jobs are
    /// left alone, and jobs are started straight away when the connection is
    /// already ready.
    pub async fn load_hooks(&self) -> Result<usize> {
        let set = self.inner.catalog.lock().await.classify().await?;
        let added = self.inner.jobs.sync(&set.periodic).await;

        let total = set.len();
        info!(
            "Loaded {} handlers ({} command, {} privmsg, {} raw, {} periodic, {} new jobs)",
            total,
            set.commands.len(),
            set.direct.len(),
            set.raws.len(),
            set.periodic.len(),
            added
        );
        *self.inner.handlers.write().await = Arc::new(set);

        if self.is_ready() {
            self.inner.jobs.start_all().await;
        }
        Ok(total)
    }

    /// Route a chat message through the command, direct-message and raw tiers
    pub async fn receive_message(&self, message: InboundMessage) -> DispatchResult<Option<Tier>> {
        let handlers = self.handlers().await;
        self.inner.dispatcher.route(&handlers, &self.inner.client, message).await
    }

    /// Hand one protocol line to every matching listener
    pub async fn process_line(&self, line: &str) -> Result<()> {
        if self.config().verbose {
            info!("< {}", line);
        } else {
            debug!("< {}", line);
        }

        let fired = self.inner.listeners.read().await.matches(line);
        for (callback, groups) in fired {
            callback(self.clone(), groups).await?;
        }
        Ok(())
    }

    /// Connect to the configured server and run until the connection ends
    pub async fn connect(&self) -> Result<()> {
        let config = self.config();
        info!("Connecting to {}:{}", config.host, config.port);

        let stream = TcpStream::connect((config.host.as_str(), config.port))
            .await
            .with_context(|| format!("Failed to connect to {}:{}", config.host, config.port))?;

        self.run(stream).await
    }

    /// Run a session over an established stream.
    ///
    /// Ends on EOF, on ctrl-c, or on the first fatal error. Teardown always
    /// runs before this returns.
    pub async fn run<S>(&self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        self.inner.ready.store(false, Ordering::SeqCst);
        self.inner.client.attach(writer).await;

        let result = tokio::select! {
            result = self.session(reader) => result,
            _ = shutdown_signal() => {
                info!("Interrupted, shutting down");
                Ok(())
            }
        };

        let closed = self.close().await;
        result?;
        closed?;
        Ok(())
    }

    async fn session<R>(&self, reader: R) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        self.load_hooks().await?;
        self.inner.client.register_identity().await?;
        self.listen(reader).await
    }

    async fn listen<R>(&self, mut reader: R) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let mut framer = LineFramer::new();
        let mut buffer = [0u8; READ_BUFFER_SIZE];

        loop {
            let read = reader.read(&mut buffer).await.context("Failed to read from server")?;
            if read == 0 {
                warn!("Server closed the connection");
                return Ok(());
            }

            for line in framer.feed(&buffer[..read]) {
                self.process_line(&line).await?;
            }
        }
    }

    /// Stop every job, then shut down the connection
    pub async fn close(&self) -> Result<()> {
        self.inner.jobs.stop_all().await;
        self.inner.ready.store(false, Ordering::SeqCst);
        self.inner.client.detach().await?;
        info!("Connection closed");
        Ok(())
    }

    /// Join the autojoin channels and start periodic jobs, once per connection
    pub async fn on_ready(&self) -> Result<()> {
        if self.inner.ready.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let channels = &self.config().channels;
        if !channels.is_empty() {
            self.inner.client.join(&channels[..]).await?;
        }
        self.inner.jobs.start_all().await;
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Unable to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}
