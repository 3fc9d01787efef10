//! Project Synthesizer
//!
//! Materializes a Gradle project from a template directory. Synthesis runs in
//! two phases: `classify` enumerates the template and decides what each file
//! becomes, `synthesize` emits the graph actions for the classified set.
//! Dependency edges are wired afterwards from the emitted file list.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::graph::BuildGraph;
use crate::BuildError;

/// Extension marking files that get token substitution
pub const TEMPLATE_EXTENSION: &str = "template";

/// File every other project file is ordered against
pub const PROJECT_DESCRIPTOR: &str = "build.gradle";

/// Placeholder values, keyed by bare token name (`APPNAME` for `**APPNAME**`)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateTokens {
    values: BTreeMap<String, String>,
}

impl TemplateTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.values.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Replace every known `**TOKEN**`; unknown tokens stay as they are
    pub fn apply(&self, text: &str) -> String {
        let mut result = text.to_string();
        for (name, value) in &self.values {
            let token = format!("**{}**", name);
            if result.contains(&token) {
                result = result.replace(&token, value);
            }
        }
        result
    }
}

/// What a project file is made from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectFileContent {
    /// Copied verbatim
    Copy(PathBuf),
    /// Template text, expanded at synthesis
    Expand(String),
}

/// A classified template entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectFile {
    /// Destination relative to the project directory
    pub relative: PathBuf,
    pub content: ProjectFileContent,
}

impl ProjectFile {
    pub fn is_descriptor(&self) -> bool {
        self.relative == Path::new(PROJECT_DESCRIPTOR)
    }
}

/// Project files emitted into a graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedProject {
    pub project_dir: PathBuf,
    /// Every emitted file, in template order
    pub files: Vec<PathBuf>,
    pub descriptor: Option<PathBuf>,
}

impl SynthesizedProject {
    /// Order `downstream` after every project file
    pub fn wire_dependencies(&self, graph: &mut BuildGraph, downstream: &Path) {
        for file in &self.files {
            graph.add_dependency(downstream, file);
        }
    }

    /// Order the descriptor after every other file in `files`
    pub fn wire_descriptor<'a>(&self, graph: &mut BuildGraph, files: impl IntoIterator<Item = &'a PathBuf>) {
        let Some(ref descriptor) = self.descriptor else {
            return;
        };
        for file in files {
            if file != descriptor {
                graph.add_dependency(descriptor, file);
            }
        }
    }
}

/// Template directory of a Gradle project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectTemplate {
    root: PathBuf,
}

impl ProjectTemplate {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Enumerate the template in sorted order and classify every file
    pub fn classify(&self) -> Result<Vec<ProjectFile>, BuildError> {
        if !self.root.is_dir() {
            return Err(BuildError::Configuration(format!(
                "Project template not found at {:?}",
                self.root
            )));
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = entry.map_err(|e| BuildError::Template {
                path: self.root.clone(),
                source: e.into(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(&self.root).unwrap_or(path).to_path_buf();

            let file = if path.extension().and_then(|e| e.to_str()) == Some(TEMPLATE_EXTENSION) {
                let text = std::fs::read_to_string(path).map_err(|source| BuildError::Template {
                    path: path.to_path_buf(),
                    source,
                })?;
                ProjectFile {
                    relative: relative.with_extension(""),
                    content: ProjectFileContent::Expand(text),
                }
            } else {
                ProjectFile {
                    relative,
                    content: ProjectFileContent::Copy(path.to_path_buf()),
                }
            };
            debug!("Template file {:?}", file.relative);
            files.push(file);
        }
        Ok(files)
    }

    /// Emit one write or copy action per template file into `project_dir`
    pub fn synthesize(
        &self,
        graph: &mut BuildGraph,
        project_dir: &Path,
        tokens: &TemplateTokens,
    ) -> Result<SynthesizedProject, BuildError> {
        let classified = self.classify()?;
        info!("Synthesizing {} project files into {:?}", classified.len(), project_dir);

        let mut files = Vec::with_capacity(classified.len());
        let mut descriptor = None;
        for file in &classified {
            let destination = project_dir.join(&file.relative);
            match &file.content {
                ProjectFileContent::Expand(text) => {
                    graph.add_write_text_action(&destination, tokens.apply(text))?;
                }
                ProjectFileContent::Copy(source) => {
                    graph.add_copy_action(&destination, source)?;
                }
            }
            if file.is_descriptor() {
                descriptor = Some(destination.clone());
            }
            files.push(destination);
        }

        Ok(SynthesizedProject {
            project_dir: project_dir.to_path_buf(),
            files,
            descriptor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ActionKind;

    fn template() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::write(
            root.join("build.gradle.template"),
            "applicationId '**PACKAGENAME**'\nabiFilters **ABIFILTERS**\n**UNKNOWN**\n",
        )
        .unwrap();
        std::fs::write(root.join("settings.gradle"), "include ':'\n").unwrap();
        std::fs::create_dir_all(root.join("src/main/res/values")).unwrap();
        std::fs::write(root.join("src/main/res/values/strings.xml.template"), "<string>**APPNAME**</string>").unwrap();
        dir
    }

    fn tokens() -> TemplateTokens {
        TemplateTokens::new()
            .with("PACKAGENAME", "com.example.game")
            .with("ABIFILTERS", "'armeabi-v7a'")
            .with("APPNAME", "Game")
    }

    #[test]
    fn test_unknown_tokens_untouched() {
        let tokens = tokens();
        assert_eq!(tokens.apply("**APPNAME** and **NOPE**"), "Game and **NOPE**");
        assert_eq!(tokens.apply("APPNAME"), "APPNAME");
    }

    #[test]
    fn test_classify_strips_template_extension() {
        let dir = template();
        let files = ProjectTemplate::new(dir.path()).classify().unwrap();
        let names: Vec<_> = files.iter().map(|f| f.relative.clone()).collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("build.gradle"),
                PathBuf::from("settings.gradle"),
                PathBuf::from("src/main/res/values/strings.xml"),
            ]
        );
        assert!(files[0].is_descriptor());
        assert!(matches!(files[1].content, ProjectFileContent::Copy(_)));
    }

    #[test]
    fn test_synthesize_expands_and_wires() {
        let dir = template();
        let mut graph = BuildGraph::new();
        let project = ProjectTemplate::new(dir.path())
            .synthesize(&mut graph, Path::new("out/gradle"), &tokens())
            .unwrap();

        assert_eq!(project.descriptor, Some(PathBuf::from("out/gradle/build.gradle")));
        match &graph.action_producing(Path::new("out/gradle/build.gradle")).unwrap().kind {
            ActionKind::WriteText { content } => {
                assert_eq!(content, "applicationId 'com.example.game'\nabiFilters 'armeabi-v7a'\n**UNKNOWN**\n");
            }
            other => panic!("unexpected action {:?}", other),
        }

        let package = PathBuf::from("out/gradle/build/outputs/apk/debug/gradle-debug.apk");
        project.wire_dependencies(&mut graph, &package);
        for file in &project.files {
            assert!(graph.has_dependency(&package, file));
        }
    }

    #[test]
    fn test_synthesis_is_idempotent() {
        let dir = template();
        let run = || {
            let mut graph = BuildGraph::new();
            let project = ProjectTemplate::new(dir.path())
                .synthesize(&mut graph, Path::new("out/gradle"), &tokens())
                .unwrap();
            project.wire_dependencies(&mut graph, Path::new("out/app.apk"));
            (graph.to_json().unwrap(), graph.dependencies().clone())
        };
        assert_eq!(run(), run());

        // a second pass into the same graph emits identical writes
        let mut graph = BuildGraph::new();
        let template = ProjectTemplate::new(dir.path());
        template.synthesize(&mut graph, Path::new("out/gradle"), &tokens()).unwrap();
        let count = graph.len();
        template.synthesize(&mut graph, Path::new("out/gradle"), &tokens()).unwrap();
        assert_eq!(graph.len(), count);
    }

    #[test]
    fn test_missing_template_is_configuration_error() {
        let result = ProjectTemplate::new("/definitely/not/a/template").classify();
        assert!(matches!(result, Err(BuildError::Configuration(_))));
    }
}
