/*!
    Host-side registry of named sources and graphs.

    The [`AutomationServer`] is what an application or script drives: it
    owns sources by name, lets any number of listeners watch each one,
    attaches named processing graphs, and runs background tasks that are
    stopped together with the sources on shutdown.
*/

mod fanout;
mod tasks;

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use media_types::{Error, Result};

use crate::graph::{ProcessingGraph, SharedGraph};
use crate::listener::VideoSourceListener;
use crate::plugin::PluginRegistry;
use crate::source::{RepeaterRegistry, VideoSource};
use crate::stop::StopSignal;

use self::fanout::FanOut;
use self::tasks::TaskSet;

pub use self::fanout::ListenerId;

struct SourceEntry {
    source: Arc<dyn VideoSource>,
    fanout: Arc<FanOut>,
    graph: Option<String>,
}

/**
    Named sources, graphs, listeners and background tasks.

    Every method takes `&self` and may be called from any thread, including
    from a listener callback. Blocking calls (stopping sources, joining
    tasks) never hold the registry locks while they wait.
*/
pub struct AutomationServer {
    plugins: Arc<PluginRegistry>,
    repeaters: Arc<RepeaterRegistry>,
    sources: RwLock<BTreeMap<String, SourceEntry>>,
    graphs: RwLock<BTreeMap<String, SharedGraph>>,
    tasks: Mutex<TaskSet>,
}

impl AutomationServer {
    pub fn new(plugins: Arc<PluginRegistry>, repeaters: Arc<RepeaterRegistry>) -> Self {
        Self {
            plugins,
            repeaters,
            sources: RwLock::new(BTreeMap::new()),
            graphs: RwLock::new(BTreeMap::new()),
            tasks: Mutex::new(TaskSet::default()),
        }
    }

    /**
        A server with the built-in filters and a fresh repeater registry.
    */
    pub fn with_builtin_plugins() -> Self {
        let repeaters = Arc::new(RepeaterRegistry::new());
        let plugins = Arc::new(PluginRegistry::with_builtin_filters(repeaters.clone()));
        Self::new(plugins, repeaters)
    }

    pub fn plugins(&self) -> &Arc<PluginRegistry> {
        &self.plugins
    }

    pub fn repeaters(&self) -> &Arc<RepeaterRegistry> {
        &self.repeaters
    }

    // ── Sources ──────────────────────────────────────────────────────────

    /**
        Register a source under its own name and take over its listener.
    */
    pub fn add_source(&self, source: Arc<dyn VideoSource>) -> Result<()> {
        let name = source.name().to_string();
        let mut sources = self.sources.write();
        if sources.contains_key(&name) {
            return Err(Error::InvalidArgument(format!("source '{name}' already exists")));
        }

        let fanout = Arc::new(FanOut::new());
        source.set_listener(Some(fanout.clone()));
        sources.insert(
            name.clone(),
            SourceEntry {
                source,
                fanout,
                graph: None,
            },
        );
        debug!(source = %name, "source added");
        Ok(())
    }

    /**
        Stop a source, detach it from its listeners and graph, and hand it
        back to the caller.
    */
    pub fn remove_source(&self, name: &str) -> Result<Arc<dyn VideoSource>> {
        let entry = self
            .sources
            .write()
            .remove(name)
            .ok_or_else(|| unknown_source(name))?;

        let source = entry.source;
        source.signal_to_stop();
        source.wait_for_stop();
        source.set_listener(None);
        source.set_graph(None);
        debug!(source = %name, "source removed");
        Ok(source)
    }

    pub fn source(&self, name: &str) -> Option<Arc<dyn VideoSource>> {
        self.sources.read().get(name).map(|entry| entry.source.clone())
    }

    pub fn source_ids(&self) -> Vec<String> {
        self.sources.read().keys().cloned().collect()
    }

    pub fn start_source(&self, name: &str) -> Result<()> {
        self.require_source(name)?.start()
    }

    /**
        Signal a source to stop and wait for its worker to exit.
    */
    pub fn stop_source(&self, name: &str) -> Result<()> {
        let source = self.require_source(name)?;
        source.signal_to_stop();
        source.wait_for_stop();
        Ok(())
    }

    /**
        Start every source. All are tried; the first failure is returned.
    */
    pub fn start_all(&self) -> Result<()> {
        let mut first_error = None;
        for source in self.all_sources() {
            if let Err(error) = source.start() {
                warn!(source = %source.name(), %error, "failed to start source");
                first_error.get_or_insert(error);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /**
        Signal every source first, then wait for all of them, so the workers
        wind down in parallel.
    */
    pub fn stop_all(&self) {
        let sources = self.all_sources();
        for source in &sources {
            source.signal_to_stop();
        }
        for source in &sources {
            source.wait_for_stop();
        }
    }

    // ── Listeners ────────────────────────────────────────────────────────

    pub fn add_listener(
        &self,
        source: &str,
        listener: Arc<dyn VideoSourceListener>,
    ) -> Result<ListenerId> {
        let fanout = self.fanout(source)?;
        Ok(fanout.add(listener))
    }

    /**
        Unsubscribe a listener. Once this returns it receives no further
        callbacks. Returns false if the id was not subscribed.
    */
    pub fn remove_listener(&self, source: &str, id: ListenerId) -> Result<bool> {
        let fanout = self.fanout(source)?;
        Ok(fanout.remove(id))
    }

    /**
        The last error a source reported, until it delivers another frame.
    */
    pub fn last_error(&self, source: &str) -> Result<Option<Error>> {
        Ok(self.fanout(source)?.last_error())
    }

    // ── Graphs ───────────────────────────────────────────────────────────

    pub fn create_graph(&self, name: &str) -> Result<SharedGraph> {
        self.add_graph(ProcessingGraph::new(name, self.plugins.clone()))
    }

    /**
        Register a graph built elsewhere under its own name.
    */
    pub fn add_graph(&self, graph: ProcessingGraph) -> Result<SharedGraph> {
        let name = graph.name().to_string();
        let mut graphs = self.graphs.write();
        if graphs.contains_key(&name) {
            return Err(Error::InvalidArgument(format!("graph '{name}' already exists")));
        }
        let graph = graph.into_shared();
        graphs.insert(name, graph.clone());
        Ok(graph)
    }

    pub fn graph(&self, name: &str) -> Option<SharedGraph> {
        self.graphs.read().get(name).cloned()
    }

    pub fn graph_ids(&self) -> Vec<String> {
        self.graphs.read().keys().cloned().collect()
    }

    /**
        Run a source's frames through a graph. Several sources may share
        one graph; frames are then processed one at a time.
    */
    pub fn attach_graph(&self, source: &str, graph: &str) -> Result<()> {
        let shared = self
            .graph(graph)
            .ok_or_else(|| Error::InvalidArgument(format!("no graph named '{graph}'")))?;

        let mut sources = self.sources.write();
        let entry = sources.get_mut(source).ok_or_else(|| unknown_source(source))?;
        entry.source.set_graph(Some(shared));
        entry.graph = Some(graph.to_string());
        debug!(source, graph, "graph attached");
        Ok(())
    }

    pub fn detach_graph(&self, source: &str) -> Result<()> {
        let mut sources = self.sources.write();
        let entry = sources.get_mut(source).ok_or_else(|| unknown_source(source))?;
        entry.source.set_graph(None);
        entry.graph = None;
        Ok(())
    }

    /**
        Name of the graph attached to a source.
    */
    pub fn attached_graph(&self, source: &str) -> Result<Option<String>> {
        let sources = self.sources.read();
        let entry = sources.get(source).ok_or_else(|| unknown_source(source))?;
        Ok(entry.graph.clone())
    }

    // ── Tasks ────────────────────────────────────────────────────────────

    /**
        Run `body` on a named background thread. It should return soon after
        its [`StopSignal`] is raised; [`shutdown`](Self::shutdown) raises it.
    */
    pub fn spawn_task<F>(&self, name: &str, body: F) -> Result<()>
    where
        F: FnOnce(StopSignal) + Send + 'static,
    {
        self.tasks.lock().spawn(name, body)
    }

    pub fn running_tasks(&self) -> Vec<String> {
        self.tasks.lock().running()
    }

    /**
        Stop and join every task, then stop every source.
    */
    pub fn shutdown(&self) {
        // Taken out so a task calling into the server cannot deadlock the join
        let mut tasks = std::mem::take(&mut *self.tasks.lock());
        tasks.stop_all();
        self.stop_all();
        info!("automation server shut down");
    }

    fn require_source(&self, name: &str) -> Result<Arc<dyn VideoSource>> {
        self.source(name).ok_or_else(|| unknown_source(name))
    }

    fn fanout(&self, source: &str) -> Result<Arc<FanOut>> {
        self.sources
            .read()
            .get(source)
            .map(|entry| entry.fanout.clone())
            .ok_or_else(|| unknown_source(source))
    }

    fn all_sources(&self) -> Vec<Arc<dyn VideoSource>> {
        self.sources.read().values().map(|entry| entry.source.clone()).collect()
    }
}

impl Drop for AutomationServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn unknown_source(name: &str) -> Error {
    Error::InvalidArgument(format!("no source named '{name}'"))
}
