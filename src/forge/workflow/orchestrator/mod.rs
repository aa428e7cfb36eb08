// SPDX-License-Identifier: MIT

//! The content pipeline
//!
//! `Orchestrator` binds the topology in `topology` to the nodes in `nodes`,
//! each node holding the collaborators it needs. Collaborators are injected
//! through `Collaborators`; `Collaborators::from_config` builds the default
//! HTTP and process backed set.

pub mod nodes;
pub mod topology;

use crate::adk::error::ForgeError;
use crate::adk::model::build_model;
use crate::forge::assets::code::CodeAssetGenerator;
use crate::forge::assets::image::{DisabledImageSearch, GoogleImageSearch};
use crate::forge::assets::sandbox::ProcessSandbox;
use crate::forge::assets::{ImageSearch, Sandbox};
use crate::forge::audio::{AudioWorkflow, Narrator, OpenAiSpeech};
use crate::forge::compile::{DocumentCompiler, PdfLatexCompiler};
use crate::forge::config::PipelineConfig;
use crate::forge::convert::{FormatConverter, LlmFormatConverter};
use crate::forge::generate::{ContentGenerator, LlmContentGenerator, LlmRouter, RequestRouter};
use crate::forge::persist::TaskLayout;
use crate::forge::placeholder::PlaceholderResolver;
use crate::forge::retrieval::{ChunkRetriever, Retriever};
use crate::forge::scoring::{LlmOptimizer, LlmQualityScorer, Optimizer, QualityScorer};
use crate::forge::workflow::graph::{CompiledGraph, GraphEvent, Node};
use crate::forge::workflow::predicate::Predicate;
use crate::forge::workflow::state::WorkflowState;
use nodes::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use topology::node;
use uuid::Uuid;

/// Everything the pipeline calls out to
#[derive(Clone)]
pub struct Collaborators {
    pub router: Arc<dyn RequestRouter>,
    pub retriever: Arc<dyn Retriever>,
    pub generator: Arc<dyn ContentGenerator>,
    pub scorer: Arc<dyn QualityScorer>,
    pub optimizer: Arc<dyn Optimizer>,
    pub converter: Arc<dyn FormatConverter>,
    pub compiler: Arc<dyn DocumentCompiler>,
    pub resolver: Arc<PlaceholderResolver>,
    pub narrator: Option<Arc<dyn Narrator>>,
}

impl Collaborators {
    /// Default collaborators. Missing image search credentials disable image
    /// assets; missing speech credentials disable narration.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, ForgeError> {
        let model = build_model(config.model.provider.as_deref(), &config.model.name)?;

        let sandbox: Arc<dyn Sandbox> = Arc::new(ProcessSandbox::new(&config.assets));
        let graphs = CodeAssetGenerator::graphs(model.clone(), &config.assets, sandbox.clone())?;
        let diagrams = CodeAssetGenerator::diagrams(model.clone(), &config.assets, sandbox)?;
        let images: Arc<dyn ImageSearch> = match GoogleImageSearch::new(&config.assets) {
            Ok(search) => Arc::new(search),
            Err(e) => {
                log::warn!("Image search unavailable: {}", e);
                Arc::new(DisabledImageSearch)
            }
        };
        let resolver = PlaceholderResolver::new(
            Arc::new(graphs),
            Arc::new(diagrams),
            images,
            config.assets.concurrency,
        );

        let narrator: Option<Arc<dyn Narrator>> = match OpenAiSpeech::new(&config.audio) {
            Ok(speech) => Some(Arc::new(AudioWorkflow::from_model(
                model.clone(),
                Arc::new(speech),
                &config.audio,
            )?)),
            Err(e) => {
                log::warn!("Narration unavailable: {}", e);
                None
            }
        };

        Ok(Self {
            router: Arc::new(LlmRouter::from_model(model.clone())),
            retriever: Arc::new(ChunkRetriever::from_model(model.clone())),
            generator: Arc::new(LlmContentGenerator::from_model(model.clone())),
            scorer: Arc::new(LlmQualityScorer::from_model(model.clone())),
            optimizer: Arc::new(LlmOptimizer::from_model(model.clone())),
            converter: Arc::new(LlmFormatConverter::from_model(model)),
            compiler: Arc::new(PdfLatexCompiler::new(&config.compiler)),
            resolver: Arc::new(resolver),
            narrator,
        })
    }
}

/// A finished task
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub task_id: Uuid,
    /// Per-task output directory
    pub root: PathBuf,
    pub state: WorkflowState,
    /// Nodes in the order they ran
    pub trace: Vec<String>,
}

/// A task running in the background
pub struct TaskHandle {
    id: Uuid,
    root: PathBuf,
    join: JoinHandle<Result<TaskOutcome, ForgeError>>,
}

impl TaskHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Where the task writes its artifacts
    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    pub async fn wait(self) -> Result<TaskOutcome, ForgeError> {
        self.join
            .await
            .map_err(|e| ForgeError::other(format!("task {} aborted: {}", self.id, e)))?
    }
}

fn bind<N>(name: &'static str, node: N) -> (&'static str, Arc<dyn Node<WorkflowState>>)
where
    N: Node<WorkflowState> + 'static,
{
    (name, Arc::new(node))
}

pub struct Orchestrator {
    config: Arc<PipelineConfig>,
    graph: CompiledGraph<WorkflowState, Predicate>,
    /// One lock per task directory; tasks on the same topic share files
    directories: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl Orchestrator {
    pub fn new(config: PipelineConfig, collaborators: Collaborators) -> Result<Self, ForgeError> {
        let narrator_available = collaborators.narrator.is_some();
        let spec = topology::topology(&config.optimization, narrator_available);
        let layout = config.layout.clone();

        let nodes = vec![
            bind(node::START, StartNode { router: collaborators.router }),
            bind(
                node::RETRIEVE_CONTEXT,
                RetrieveContextNode {
                    retriever: collaborators.retriever,
                },
            ),
            bind(
                node::GENERATE_CONTENT,
                GenerateContentNode {
                    generator: collaborators.generator,
                },
            ),
            bind(
                node::SCORE_CONTENT,
                ScoreContentNode {
                    scorer: collaborators.scorer,
                },
            ),
            bind(
                node::OPTIMIZE,
                OptimizeNode {
                    optimizer: collaborators.optimizer,
                },
            ),
            bind(node::VALIDATE, ValidateNode),
            bind(
                node::PERSIST_PRIMARY,
                PersistPrimaryNode {
                    layout: layout.clone(),
                },
            ),
            bind(
                node::COMPILE_PRIMARY,
                CompilePrimaryNode {
                    compiler: collaborators.compiler,
                },
            ),
            bind(
                node::CONVERT_FORMAT,
                ConvertFormatNode {
                    converter: collaborators.converter,
                },
            ),
            bind(
                node::PERSIST_CONVERTED,
                PersistConvertedNode {
                    layout: layout.clone(),
                },
            ),
            bind(
                node::RESOLVE_ASSETS,
                ResolveAssetsNode {
                    resolver: collaborators.resolver,
                    layout: layout.clone(),
                },
            ),
            bind(
                node::NARRATE,
                NarrateNode {
                    narrator: collaborators.narrator,
                    mode: config.audio.mode,
                    layout,
                },
            ),
        ];

        let graph = CompiledGraph::compile(spec, nodes)?;
        Ok(Self {
            config: Arc::new(config),
            graph,
            directories: Mutex::new(HashMap::new()),
        })
    }

    /// Build from configuration with the default collaborators
    pub fn from_config(config: PipelineConfig) -> Result<Self, ForgeError> {
        let collaborators = Collaborators::from_config(&config)?;
        Self::new(config, collaborators)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Fresh state in the configured language
    pub fn initial_state(&self, topic: &str, document: Option<String>) -> WorkflowState {
        WorkflowState::new(topic, document, self.config.language.clone())
    }

    pub fn layout(&self, topic: &str) -> TaskLayout {
        TaskLayout::new(&self.config.layout, topic)
    }

    pub async fn run(&self, state: WorkflowState) -> Result<TaskOutcome, ForgeError> {
        self.run_with_events(state, None).await
    }

    pub async fn run_with_events(
        &self,
        state: WorkflowState,
        events: Option<&mpsc::Sender<GraphEvent>>,
    ) -> Result<TaskOutcome, ForgeError> {
        let task_id = Uuid::new_v4();
        self.execute(task_id, state, events).await
    }

    async fn execute(
        &self,
        task_id: Uuid,
        state: WorkflowState,
        events: Option<&mpsc::Sender<GraphEvent>>,
    ) -> Result<TaskOutcome, ForgeError> {
        let root = self.layout(&state.user_input).root().to_path_buf();
        let directory = self.directory_lock(&root).await;

        let result = {
            let _held = match directory.try_lock() {
                Ok(guard) => guard,
                Err(_) => {
                    log::info!(
                        "Task {} waiting for {} to be released",
                        task_id,
                        root.display()
                    );
                    directory.lock().await
                }
            };
            log::info!("Task {} started for '{}'", task_id, state.user_input);
            self.graph.run_with_events(state, events).await
        };
        self.release_directory(&root, directory).await;

        let run = result.map_err(|e| {
            log::error!("Task {} failed: {}", task_id, e);
            e
        })?;

        log::info!("Task {} finished after {} steps", task_id, run.trace.len());
        Ok(TaskOutcome {
            task_id,
            root,
            state: run.state,
            trace: run.trace,
        })
    }

    async fn directory_lock(&self, root: &Path) -> Arc<Mutex<()>> {
        let mut directories = self.directories.lock().await;
        directories
            .entry(root.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn release_directory(&self, root: &Path, directory: Arc<Mutex<()>>) {
        let mut directories = self.directories.lock().await;
        // The map holds the other reference when no task is queued
        if Arc::strong_count(&directory) == 2 {
            directories.remove(root);
        }
    }

    /// Run a task in the background. Tasks whose topics share a task
    /// directory run one after another.
    pub fn submit(self: &Arc<Self>, topic: &str, document: Option<String>) -> TaskHandle {
        self.submit_with_events(topic, document, None)
    }

    /// Run a task in the background, reporting progress on `events`
    pub fn submit_with_events(
        self: &Arc<Self>,
        topic: &str,
        document: Option<String>,
        events: Option<mpsc::Sender<GraphEvent>>,
    ) -> TaskHandle {
        let id = Uuid::new_v4();
        let root = self.layout(topic).root().to_path_buf();
        let state = self.initial_state(topic, document);
        let this = Arc::clone(self);

        let join = tokio::spawn(async move { this.execute(id, state, events.as_ref()).await });

        TaskHandle { id, root, join }
    }
}
