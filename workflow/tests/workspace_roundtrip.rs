use pretty_assertions::assert_eq;
use std::path::Path;
use stratum_workflow::DocumentStore;
use stratum_workflow::FlowSeed;
use stratum_workflow::LoadPolicy;
use stratum_workflow::UnitEdit;
use stratum_workflow::UnitPath;
use stratum_workflow::WorkflowError;
use stratum_workflow::Workspace;
use stratum_workflow::WorkspaceConfig;
use stratum_workflow::WorkspaceLayout;
use stratum_workflow::load_template_file;

const TEMPLATE_YAML: &str = r#"
templates:
  - id: tpl-release
    name: Release
    levels:
      - name: Phases
        singularName: Phase
        pluralName: Phases
        unitConfig:
          enableName: true
          enableGrade: true
          gradeCumulative: true
          progressBar: true
      - name: Steps
        singularName: Step
        pluralName: Steps
        unitConfig:
          enableName: true
          enableTags: true
          enableDone: true
          enableGrade: true
"#;

async fn write_template(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("release.yaml");
    tokio::fs::write(&path, TEMPLATE_YAML).await.expect("write template");
    path
}

fn path(indices: &[usize]) -> UnitPath {
    UnitPath::from(indices.to_vec())
}

#[tokio::test]
async fn linked_flows_survive_a_save_and_reload() {
    let dir = tempfile::tempdir().expect("tempdir");
    let layout = WorkspaceLayout::new(dir.path().join("data"));
    let store = DocumentStore::new(layout.clone(), LoadPolicy::Strict);
    let config = WorkspaceConfig::default();

    let templates = load_template_file(&write_template(dir.path()).await).expect("templates");
    assert_eq!(templates[0].levels[1].order, 1);

    let mut workspace = Workspace::new(store.load_all().await.expect("load"), &config);
    workspace.import_templates(templates).expect("import");
    let staging = workspace
        .create_flow("tpl-release", "Staging", FlowSeed::Empty)
        .expect("staging");
    let build = workspace.add_unit(&staging, &UnitPath::root(), "Build").expect("phase");
    workspace.add_unit(&staging, &build, "Compile").expect("step");
    workspace.add_unit(&staging, &build, "Test").expect("step");

    let production = workspace
        .create_flow("tpl-release", "Production", FlowSeed::LinkedTo(staging.clone()))
        .expect("production");
    workspace
        .set_completed(&production, &path(&[0, 0]), true)
        .expect("done");
    workspace
        .edit_unit(
            &staging,
            &path(&[0, 1]),
            &UnitEdit {
                grade: Some(3.0),
                tags: Some(vec!["qa".into()]),
                ..Default::default()
            },
        )
        .expect("edit");
    workspace.add_unit(&staging, &build, "Package").expect("step");

    store.save_all(workspace.documents()).await.expect("save");
    let reloaded = Workspace::new(store.load_all().await.expect("reload"), &config);
    assert_eq!(reloaded.documents(), workspace.documents());

    let report = reloaded.report(&production).expect("report");
    let names: Vec<&str> = report.lines.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, vec!["Build", "Compile", "Test", "Package"]);
    assert_eq!(report.linked_with, vec![staging.clone()]);
    assert_eq!(report.lines[0].grade, Some(3.0));
    assert_eq!(report.lines[0].progress, Some(33));
    assert_eq!(report.lines[1].completed, Some(true));
    assert_eq!(report.lines[2].tags, vec!["qa"]);

    let tagged = reloaded.filter(&production, "qa").expect("filter");
    assert_eq!(tagged.len(), 1);
    assert_eq!(tagged[0].children[0].original_path, path(&[0, 1]));
}

#[tokio::test]
async fn invalid_template_files_are_rejected_whole() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = dir.path().join("broken.toml");
    let contents = r#"
[[templates]]
name = "Good"
[[templates.levels]]
name = "Tasks"
singularName = "Task"
pluralName = "Tasks"

[[templates]]
name = "Bad"
[[templates.levels]]
name = "Tasks"
singularName = "Task"
pluralName = "Tasks"
[[templates.levels]]
name = "tasks"
singularName = "Sub"
pluralName = "Subs"
"#;
    tokio::fs::write(&file, contents).await.expect("write");

    let templates = load_template_file(&file).expect("parse");
    assert_eq!(templates.len(), 2);
    let mut workspace = Workspace::default();
    let err = workspace.import_templates(templates).expect_err("invalid");
    assert!(matches!(err, WorkflowError::InvalidTemplate { ref name, .. } if name == "Bad"));
    assert!(workspace.templates().is_empty());
}

#[tokio::test]
async fn configured_fallback_recovers_from_a_corrupt_document() {
    let dir = tempfile::tempdir().expect("tempdir");
    let layout = WorkspaceLayout::new(dir.path().to_path_buf());
    tokio::fs::write(layout.config_file(), "load_policy = \"fallback\"\n")
        .await
        .expect("write config");
    tokio::fs::write(layout.workflows_file(), "[").await.expect("write");

    let config = WorkspaceConfig::load(&layout.config_file()).await.expect("config");
    let strict = DocumentStore::new(layout.clone(), LoadPolicy::Strict);
    assert!(strict.load_all().await.is_err());

    let store = DocumentStore::new(layout, config.load_policy);
    let workspace = Workspace::new(store.load_all().await.expect("fallback"), &config);
    assert!(workspace.flows().is_empty());
}
