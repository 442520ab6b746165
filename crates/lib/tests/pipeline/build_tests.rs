//! Build pipeline tests.

use std::time::{Duration, Instant};

use quire_lib::build::orchestrate::SKIP_BIBLIOGRAPHY_MARKER;
use quire_lib::build::{BuildEvent, BuildRequest};
use quire_lib::consts::{NO_EXIT_CODE, TIMEOUT_EXIT_CODE};
use quire_lib::engine::{EngineClass, EngineSpec, ToolSpec};
use quire_lib::store::ProjectKey;
use tokio::sync::mpsc;

use super::common::{CITED, Project, count};

mod multi_pass {
  use super::*;

  #[tokio::test]
  async fn first_build_runs_three_passes_and_bibliography() {
    let project = Project::new();
    project.write("paper.tex", CITED);

    let result = project.service().build(&project.request("fake")).await;

    assert!(result.ok, "build failed: {:?}\n{}", result.error, result.log);
    assert_eq!(result.artifact.as_deref(), Some(&b"%PDF-1.5 fake"[..]));
    assert_eq!(result.exit_status, 0);
    assert!(result.has_sync_map);
    assert!(result.error.is_none());
    assert_eq!(project.engine_calls(), 3);
    assert_eq!(project.bib_calls(), 1);
    assert!(result.log.contains("[quire] pass 1: fake"));
    assert_eq!(count(&result.log, "[quire] pass "), 3);
    assert_eq!(count(&result.log, "[quire] bibliography: bibtex"), 1);
    assert!(result.log.contains(&format!("BIBINPUTS={}:", project.root.display())));
  }

  #[tokio::test]
  async fn unchanged_rebuild_skips_bibliography() {
    let project = Project::new();
    project.write("paper.tex", CITED);
    let service = project.service();

    assert!(service.build(&project.request("fake")).await.ok);
    let second = service.build(&project.request("fake")).await;

    assert!(second.ok);
    assert_eq!(second.exit_status, 0);
    assert!(second.log.contains(SKIP_BIBLIOGRAPHY_MARKER));
    assert_eq!(count(&second.log, "[quire] pass "), 2);
    assert_eq!(count(&second.log, "[quire] bibliography:"), 0);
    assert_eq!(project.engine_calls(), 5);
    assert_eq!(project.bib_calls(), 1);
  }

  #[tokio::test]
  async fn changed_citations_invalidate_cache() {
    let project = Project::new();
    project.write("paper.tex", CITED);
    let service = project.service();
    assert!(service.build(&project.request("fake")).await.ok);

    project.write("paper.tex", &CITED.replace("\\cite{a}", "\\cite{a} and \\cite{b}"));
    let second = service.build(&project.request("fake")).await;

    assert!(second.ok);
    assert!(!second.log.contains(SKIP_BIBLIOGRAPHY_MARKER));
    assert_eq!(project.engine_calls(), 6);
    assert_eq!(project.bib_calls(), 2);
  }

  #[tokio::test]
  async fn clean_build_discards_cached_intermediates() {
    let project = Project::new();
    project.write("paper.tex", CITED);
    let service = project.service();
    assert!(service.build(&project.request("fake")).await.ok);

    let clean = service.build(&project.request("fake").with_clean(true)).await;

    assert!(clean.ok);
    assert_eq!(count(&clean.log, "[quire] pass "), 3);
    assert_eq!(project.bib_calls(), 2);
  }

  #[tokio::test]
  async fn biblatex_uses_biber() {
    let project = Project::new();
    project.write("paper.tex", &format!("\\usepackage[style=authoryear]{{biblatex}}\n{}", CITED));

    let result = project.service().build(&project.request("fake")).await;

    assert!(result.ok);
    assert_eq!(count(&result.log, "[quire] bibliography: biber"), 1);
  }

  #[tokio::test]
  async fn no_citations_means_no_bibliography_tool() {
    let project = Project::new();
    project.write("paper.tex", "\\documentclass{article}\n\\begin{document}plain\\end{document}\n");

    let result = project.service().build(&project.request("fake")).await;

    assert!(result.ok);
    assert_eq!(project.engine_calls(), 3);
    assert_eq!(project.bib_calls(), 0);
  }

  #[tokio::test]
  async fn main_file_in_subdirectory() {
    let project = Project::new();
    project.write("src/thesis.tex", CITED);
    let request = BuildRequest::new(&project.root, "src/thesis.tex", "fake").unwrap();

    let result = project.service().build(&request).await;

    assert!(result.ok, "{:?}", result.error);
    let persisted = project
      .service()
      .store()
      .load(&ProjectKey::for_root(&project.root))
      .unwrap()
      .unwrap();
    assert_eq!(persisted.record.stem, "thesis");
    assert!(persisted.sync_map_path().is_some());
  }

  #[tokio::test]
  async fn citations_in_included_chapters_are_tracked() {
    let project = Project::new();
    project.write(
      "paper.tex",
      "\\documentclass{book}\n\\begin{document}\n\\include{intro}\n\\bibliography{refs}\n\\end{document}\n",
    );
    project.write("intro.tex", "See \\cite{a}.\n");
    let service = project.service();
    let request = project.request("fake");

    let first = service.build(&request).await;
    assert!(first.ok, "{:?}\n{}", first.error, first.log);
    assert_eq!(count(&first.log, "[quire] bibliography: bibtex"), 1);
    assert_eq!((project.engine_calls(), project.bib_calls()), (3, 1));

    let cached = service.build(&request).await;
    assert!(cached.log.contains(SKIP_BIBLIOGRAPHY_MARKER));
    assert_eq!((project.engine_calls(), project.bib_calls()), (5, 1));

    project.write("intro.tex", "See \\cite{a} and \\cite{b}.\n");
    let changed = service.build(&request).await;
    assert!(changed.ok);
    assert!(!changed.log.contains(SKIP_BIBLIOGRAPHY_MARKER));
    assert_eq!((project.engine_calls(), project.bib_calls()), (8, 2));
  }
}

mod self_converging {
  use super::*;

  #[tokio::test]
  async fn runs_exactly_one_pass() {
    let project = Project::new();
    project.write("paper.tex", CITED);

    let result = project.service().build(&project.request("fakemk")).await;

    assert!(result.ok);
    assert_eq!(project.engine_calls(), 1);
    assert_eq!(project.bib_calls(), 0);
    assert_eq!(count(&result.log, "[quire] pass "), 1);
  }

  #[tokio::test]
  async fn rebuild_still_runs_one_pass() {
    let project = Project::new();
    project.write("paper.tex", CITED);
    let service = project.service();

    service.build(&project.request("fakemk")).await;
    let second = service.build(&project.request("fakemk")).await;

    assert!(second.ok);
    assert!(!second.log.contains(SKIP_BIBLIOGRAPHY_MARKER));
    assert_eq!(project.engine_calls(), 2);
  }
}

mod failures {
  use super::*;

  #[tokio::test]
  async fn missing_main_file_spawns_nothing() {
    let project = Project::new();

    let result = project.service().build(&project.request("fake")).await;

    assert!(!result.ok);
    assert!(result.artifact.is_none());
    assert_eq!(result.exit_status, NO_EXIT_CODE);
    assert!(result.error.unwrap().contains("main file not found"));
    assert_eq!(project.engine_calls(), 0);
    assert_eq!(project.scratch_entries(), 0);
  }

  #[tokio::test]
  async fn unsupported_engine_spawns_nothing() {
    let project = Project::new();
    project.write("paper.tex", CITED);

    let result = project.service().build(&project.request("troff")).await;

    assert!(!result.ok);
    assert_eq!(result.error.as_deref(), Some("unsupported engine: troff"));
    assert_eq!(project.engine_calls(), 0);
  }

  #[tokio::test]
  async fn missing_engine_binary_is_fatal() {
    let mut project = Project::new();
    project.config.engines.insert(
      "ghost",
      EngineSpec::new(EngineClass::MultiPass, "/nonexistent/quire-ghost", &["{main}"]),
    );
    project.write("paper.tex", CITED);

    let result = project.service().build(&project.request("ghost")).await;

    assert!(!result.ok);
    assert_eq!(result.error.as_deref(), Some("ghost not available"));
    assert!(result.log.contains("[quire] pass 1: ghost"));
    assert_eq!(project.scratch_entries(), 0);
  }

  #[tokio::test]
  async fn missing_bibliography_tool_only_warns() {
    let mut project = Project::new();
    project.config.bibtex = ToolSpec::new("/nonexistent/quire-bibtex", &["{stem}"]);
    project.write("paper.tex", CITED);

    let result = project.service().build(&project.request("fake")).await;

    assert!(result.ok);
    assert!(result.log.contains("bibtex not available, continuing without bibliography"));
    assert_eq!(project.engine_calls(), 3);
  }

  #[tokio::test]
  async fn compile_failure_reports_log_and_status() {
    let project = Project::new();
    project.write("paper.tex", "NOPDF\n");

    let result = project.service().build(&project.request("fake")).await;

    assert!(!result.ok);
    assert!(result.artifact.is_none());
    assert!(!result.has_sync_map);
    assert_eq!(result.error.as_deref(), Some("No artifact generated."));
    assert_eq!(result.exit_status, 1);
    assert!(result.log.contains("! Emergency stop."));
    assert_eq!(project.engine_calls(), 3);
    assert_eq!(project.scratch_entries(), 0);
  }

  #[tokio::test]
  async fn failed_build_keeps_previous_artifacts() {
    let project = Project::new();
    project.write("paper.tex", CITED);
    let service = project.service();
    assert!(service.build(&project.request("fake")).await.ok);

    project.write("paper.tex", "NOPDF\n");
    assert!(!service.build(&project.request("fake")).await.ok);

    let persisted = service
      .store()
      .load(&ProjectKey::for_root(&project.root))
      .unwrap()
      .unwrap();
    assert!(persisted.artifact_path().is_file());
  }

  #[tokio::test]
  async fn hung_pass_is_killed() {
    let mut project = Project::new();
    project.config.pass_timeout_secs = 1;
    project.write("paper.tex", "HANG\n");
    let start = Instant::now();

    let result = project.service().build(&project.request("fakemk")).await;

    assert!(start.elapsed() < Duration::from_secs(10));
    assert!(!result.ok);
    assert_eq!(result.exit_status, TIMEOUT_EXIT_CODE);
    assert!(result.log.contains("hanging"));
    assert!(result.log.contains("fakemk timed out after 1s, killed"));
    assert_eq!(project.scratch_entries(), 0);
  }

  #[tokio::test]
  async fn log_is_capped() {
    let project = Project::new();
    project.write("paper.tex", "SPAM \\cite{a}\n");

    let result = project.service().build(&project.request("fake")).await;

    assert!(result.ok);
    assert!(result.log.len() <= project.config.log_cap);
    assert_eq!(result.log.len(), project.config.log_cap);
  }
}

mod streaming {
  use super::*;

  fn collect(rx: &mut mpsc::UnboundedReceiver<BuildEvent>) -> Vec<BuildEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
      events.push(event);
    }
    events
  }

  fn joined_log(events: &[BuildEvent]) -> String {
    events
      .iter()
      .filter_map(|event| match event {
        BuildEvent::Log { chunk } => Some(chunk.as_str()),
        BuildEvent::Done(_) => None,
      })
      .collect()
  }

  #[tokio::test]
  async fn events_match_synchronous_result() {
    let project = Project::new();
    project.write("paper.tex", CITED);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let result = project.service().build_streaming(&project.request("fake"), tx).await;

    let events = collect(&mut rx);
    assert!(result.ok);
    assert!(events.len() > 1);
    assert_eq!(joined_log(&events), result.log);
    assert_eq!(events.iter().filter(|e| matches!(e, BuildEvent::Done(_))).count(), 1);
    match events.last() {
      Some(BuildEvent::Done(done)) => assert_eq!(*done, result),
      other => panic!("expected done event last, got {:?}", other),
    }
  }

  #[tokio::test]
  async fn streamed_log_respects_cap() {
    let project = Project::new();
    project.write("paper.tex", "SPAM\n");
    let (tx, mut rx) = mpsc::unbounded_channel();

    let result = project.service().build_streaming(&project.request("fake"), tx).await;

    let streamed = joined_log(&collect(&mut rx));
    assert_eq!(streamed.len(), project.config.log_cap);
    assert_eq!(streamed, result.log);
  }

  #[tokio::test]
  async fn streaming_matches_sync_shape() {
    let project = Project::new();
    project.write("paper.tex", CITED);
    let service = project.service();
    let (tx, _rx) = mpsc::unbounded_channel();

    let streamed = service.build_streaming(&project.request("fakemk").with_clean(true), tx).await;
    let synced = service.build(&project.request("fakemk").with_clean(true)).await;

    assert_eq!(streamed.ok, synced.ok);
    assert_eq!(streamed.artifact, synced.artifact);
    assert_eq!(streamed.exit_status, synced.exit_status);
    assert_eq!(streamed.has_sync_map, synced.has_sync_map);
    assert_eq!(streamed.log, synced.log);
  }
}

mod concurrency {
  use super::*;

  #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
  async fn same_project_builds_are_serialized() {
    let project = Project::new();
    project.write("paper.tex", CITED);
    let service = project.service();
    let request = project.request("fake");

    let (a, b) = tokio::join!(service.build(&request), service.build(&request));

    assert!(a.ok && b.ok);
    // the second build waits for the first, then hits the citation cache
    assert_eq!(project.engine_calls(), 5);
    assert_eq!(project.bib_calls(), 1);
    assert_eq!(
      count(&a.log, SKIP_BIBLIOGRAPHY_MARKER) + count(&b.log, SKIP_BIBLIOGRAPHY_MARKER),
      1
    );
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
  async fn different_projects_build_independently() {
    let first = Project::new();
    let second = Project::new();
    first.write("paper.tex", CITED);
    second.write("paper.tex", CITED);
    let (service_a, service_b) = (first.service(), second.service());
    let (request_a, request_b) = (first.request("fake"), second.request("fake"));

    let (a, b) = tokio::join!(service_a.build(&request_a), service_b.build(&request_b));

    assert!(a.ok && b.ok);
    assert_eq!(first.engine_calls(), 3);
    assert_eq!(second.engine_calls(), 3);
  }
}
