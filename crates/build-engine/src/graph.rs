//! Build Graph Description
//!
//! Records the actions an external build engine executes: tool commands,
//! text file writes and copies, plus explicit ordering edges between files.
//! Nothing here runs a tool. For identical inputs the description, and its
//! JSON form, is byte-identical.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Component, Path, PathBuf};

use glob::Pattern;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use tracing::debug;

/// Graph description errors
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("{path:?} is already produced by action '{existing}'")]
    DuplicateOutput { path: PathBuf, existing: String },

    #[error("Conflicting content written to {0:?}")]
    ConflictingWrite(PathBuf),

    #[error("Dependency cycle through action '{0}'")]
    Cycle(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// What an action does
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum ActionKind {
    /// Shell command line run by the engine
    Command {
        command: String,
        allow_unexpected_output: bool,
        /// Glob patterns of output lines the engine accepts silently
        allowed_output_patterns: Vec<String>,
        env: BTreeMap<String, String>,
    },
    WriteText {
        content: String,
    },
    Copy {
        source: PathBuf,
    },
}

/// One node of the build graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Action {
    pub name: String,
    pub inputs: Vec<PathBuf>,
    pub outputs: Vec<PathBuf>,
    #[serde(flatten)]
    pub kind: ActionKind,
}

impl Action {
    /// Command action without inputs or outputs yet
    pub fn command(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            kind: ActionKind::Command {
                command: command.into(),
                allow_unexpected_output: true,
                allowed_output_patterns: Vec::new(),
                env: BTreeMap::new(),
            },
        }
    }

    pub fn inputs<I, P>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.inputs.extend(inputs.into_iter().map(Into::into));
        self
    }

    pub fn outputs<I, P>(mut self, outputs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.outputs.extend(outputs.into_iter().map(Into::into));
        self
    }

    /// Fail on any output line not matching `patterns`
    pub fn allowed_output<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let ActionKind::Command {
            allow_unexpected_output,
            allowed_output_patterns,
            ..
        } = &mut self.kind
        {
            *allow_unexpected_output = false;
            allowed_output_patterns.extend(patterns.into_iter().map(Into::into));
        }
        self
    }

    pub fn env(mut self, vars: BTreeMap<String, String>) -> Self {
        if let ActionKind::Command { env, .. } = &mut self.kind {
            env.extend(vars);
        }
        self
    }

    pub fn command_line(&self) -> Option<&str> {
        match &self.kind {
            ActionKind::Command { command, .. } => Some(command),
            _ => None,
        }
    }
}

/// Whether the engine accepts an output line under `patterns`
pub fn output_is_allowed(line: &str, patterns: &[String]) -> bool {
    patterns
        .iter()
        .filter_map(|p| Pattern::new(p).ok())
        .any(|p| p.matches(line))
}

/// Double-quoted path for command strings
pub fn quoted(path: &Path) -> String {
    format!("\"{}\"", path.display())
}

/// Number of normal components of a path
pub fn path_depth(path: &Path) -> usize {
    path.components().filter(|c| matches!(c, Component::Normal(_))).count()
}

/// Description of actions and edges
#[derive(Debug, Default, Serialize)]
pub struct BuildGraph {
    actions: Vec<Action>,
    /// (downstream, upstream)
    dependencies: BTreeSet<(PathBuf, PathBuf)>,
    #[serde(skip)]
    producers: HashMap<PathBuf, usize>,
}

impl BuildGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an action; every output may have only one producer
    pub fn add_action(&mut self, action: Action) -> Result<(), GraphError> {
        for output in &action.outputs {
            if let Some(&index) = self.producers.get(output) {
                return Err(GraphError::DuplicateOutput {
                    path: output.clone(),
                    existing: self.actions[index].name.clone(),
                });
            }
        }
        debug!("Action '{}' -> {:?}", action.name, action.outputs);
        let index = self.actions.len();
        for output in &action.outputs {
            self.producers.insert(output.clone(), index);
        }
        self.actions.push(action);
        Ok(())
    }

    /// Write `content` to `path`; repeating an identical write is a no-op
    pub fn add_write_text_action(&mut self, path: impl Into<PathBuf>, content: impl Into<String>) -> Result<(), GraphError> {
        let path = path.into();
        let content = content.into();
        if let Some(existing) = self.action_producing(&path) {
            return match &existing.kind {
                ActionKind::WriteText { content: previous } if *previous == content => Ok(()),
                ActionKind::WriteText { .. } => Err(GraphError::ConflictingWrite(path)),
                _ => Err(GraphError::DuplicateOutput {
                    path,
                    existing: existing.name.clone(),
                }),
            };
        }
        self.add_action(Action {
            name: format!("WriteText {}", path.display()),
            inputs: Vec::new(),
            outputs: vec![path],
            kind: ActionKind::WriteText { content },
        })
    }

    /// Copy `source` to `destination`; repeating an identical copy is a no-op
    pub fn add_copy_action(&mut self, destination: impl Into<PathBuf>, source: impl Into<PathBuf>) -> Result<PathBuf, GraphError> {
        let destination = destination.into();
        let source = source.into();
        if let Some(existing) = self.action_producing(&destination) {
            return match &existing.kind {
                ActionKind::Copy { source: previous } if *previous == source => Ok(destination),
                _ => Err(GraphError::DuplicateOutput {
                    path: destination,
                    existing: existing.name.clone(),
                }),
            };
        }
        self.add_action(Action {
            name: format!("Copy {}", destination.display()),
            inputs: vec![source.clone()],
            outputs: vec![destination.clone()],
            kind: ActionKind::Copy { source },
        })?;
        Ok(destination)
    }

    /// `downstream` must not be produced before `upstream`
    pub fn add_dependency(&mut self, downstream: impl Into<PathBuf>, upstream: impl Into<PathBuf>) {
        self.dependencies.insert((downstream.into(), upstream.into()));
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn dependencies(&self) -> &BTreeSet<(PathBuf, PathBuf)> {
        &self.dependencies
    }

    pub fn has_dependency(&self, downstream: &Path, upstream: &Path) -> bool {
        self.dependencies
            .contains(&(downstream.to_path_buf(), upstream.to_path_buf()))
    }

    pub fn action_producing(&self, path: &Path) -> Option<&Action> {
        self.producers.get(path).map(|&index| &self.actions[index])
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Edges from producing action to consuming action. Paths without a
    /// producer are sources on disk and add no edge.
    fn action_graph(&self) -> DiGraph<usize, ()> {
        let mut graph = DiGraph::new();
        let nodes: Vec<NodeIndex> = (0..self.actions.len()).map(|i| graph.add_node(i)).collect();

        for (consumer, action) in self.actions.iter().enumerate() {
            for input in &action.inputs {
                if let Some(&producer) = self.producers.get(input) {
                    if producer != consumer {
                        graph.update_edge(nodes[producer], nodes[consumer], ());
                    }
                }
            }
        }

        for (downstream, upstream) in &self.dependencies {
            if let (Some(&consumer), Some(&producer)) = (self.producers.get(downstream), self.producers.get(upstream)) {
                if producer != consumer {
                    graph.update_edge(nodes[producer], nodes[consumer], ());
                }
            }
        }

        graph
    }

    /// Actions in an order that respects every edge
    pub fn execution_order(&self) -> Result<Vec<&Action>, GraphError> {
        let graph = self.action_graph();
        toposort(&graph, None)
            .map(|nodes| nodes.into_iter().map(|n| &self.actions[graph[n]]).collect())
            .map_err(|cycle| GraphError::Cycle(self.actions[graph[cycle.node_id()]].name.clone()))
    }

    pub fn validate(&self) -> Result<(), GraphError> {
        self.execution_order().map(|_| ())
    }

    pub fn to_json(&self) -> Result<String, GraphError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_text_is_idempotent() {
        let mut graph = BuildGraph::new();
        graph.add_write_text_action("gradle/local.properties", "sdk.dir=/sdk").unwrap();
        graph.add_write_text_action("gradle/local.properties", "sdk.dir=/sdk").unwrap();
        assert_eq!(graph.len(), 1);

        assert!(matches!(
            graph.add_write_text_action("gradle/local.properties", "sdk.dir=/other"),
            Err(GraphError::ConflictingWrite(_))
        ));
    }

    #[test]
    fn test_duplicate_output_rejected() {
        let mut graph = BuildGraph::new();
        graph.add_copy_action("out/libs/a.jar", "deps/a.jar").unwrap();
        graph.add_copy_action("out/libs/a.jar", "deps/a.jar").unwrap();
        assert!(matches!(
            graph.add_copy_action("out/libs/a.jar", "deps/b.jar"),
            Err(GraphError::DuplicateOutput { .. })
        ));
        assert!(graph
            .add_action(Action::command("Build", "make").outputs(["out/libs/a.jar"]))
            .is_err());
    }

    #[test]
    fn test_execution_order_follows_edges() {
        let mut graph = BuildGraph::new();
        graph
            .add_action(
                Action::command("Package", "gradle assembleDebug")
                    .inputs(["gradle/libs/a.jar"])
                    .outputs(["gradle/build/app.apk"]),
            )
            .unwrap();
        graph.add_copy_action("gradle/libs/a.jar", "deps/a.jar").unwrap();
        graph.add_write_text_action("gradle/build.gradle", "apply plugin").unwrap();
        graph.add_dependency("gradle/build/app.apk", "gradle/build.gradle");

        let order: Vec<&str> = graph.execution_order().unwrap().iter().map(|a| a.name.as_str()).collect();
        let position = |name: &str| order.iter().position(|n| n.starts_with(name)).unwrap();
        assert!(position("Copy") < position("Package"));
        assert!(position("WriteText") < position("Package"));
    }

    #[test]
    fn test_cycle_detected() {
        let mut graph = BuildGraph::new();
        graph
            .add_action(Action::command("A", "a").inputs(["b.out"]).outputs(["a.out"]))
            .unwrap();
        graph
            .add_action(Action::command("B", "b").inputs(["a.out"]).outputs(["b.out"]))
            .unwrap();
        assert!(matches!(graph.validate(), Err(GraphError::Cycle(_))));
    }

    #[test]
    fn test_allowed_output_patterns() {
        let patterns = vec![":*".to_string(), "BUILD SUCCESSFUL in *".to_string()];
        assert!(output_is_allowed(":app:assembleDebug", &patterns));
        assert!(output_is_allowed("BUILD SUCCESSFUL in 12s", &patterns));
        assert!(!output_is_allowed("FAILURE: Build failed with an exception.", &patterns));

        let action = Action::command("Gradle", "gradle").allowed_output(patterns.clone());
        match action.kind {
            ActionKind::Command {
                allow_unexpected_output,
                allowed_output_patterns,
                ..
            } => {
                assert!(!allow_unexpected_output);
                assert_eq!(allowed_output_patterns, patterns);
            }
            _ => panic!("expected a command action"),
        }
    }

    #[test]
    fn test_json_is_deterministic() {
        let build = || {
            let mut graph = BuildGraph::new();
            graph.add_write_text_action("p/b.txt", "b").unwrap();
            graph.add_write_text_action("p/a.txt", "a").unwrap();
            graph.add_dependency("p/a.txt", "p/b.txt");
            graph.add_dependency("p/b.txt", "x");
            graph.to_json().unwrap()
        };
        let json = build();
        assert_eq!(json, build());
        assert!(json.contains("\"type\": \"WriteText\""));
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(path_depth(Path::new("build/game/gradle")), 3);
        assert_eq!(quoted(Path::new("a b/c")), "\"a b/c\"");
    }
}
