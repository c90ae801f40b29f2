//! End-to-end processing of documents through the engine.
//!
//! These tests drive `Op::Process` on a real engine worker and check the observable results:
//! the document text, the markers left behind and the events reported.

use doccmd_core::{
    config::{ConfigProvider, DocumentConfig, Fragment, FragmentMarker},
    context::DocumentContext,
    engine::{Engine, EngineState},
    event::Event,
    host::{HostDocument, MemoryDocument},
    ops::Op,
    relation::FlowId,
};
use std::{
    sync::{mpsc::channel, Arc},
    time::Duration,
};
use test_log::test;

mod common;
use common::{context_with_events, count_events, letter};

const WAIT: Duration = Duration::from_secs(5);

/// Runs `Op::Process`, resuming after every form request, and returns the context.
fn process(ctx: DocumentContext) -> DocumentContext {
    let engine = Engine::start(ctx).unwrap();
    engine.submit(Op::Process);
    loop {
        assert!(engine.handle().wait_settled(WAIT));
        if engine.state() != EngineState::Paused {
            break;
        }
        engine.resume();
    }
    engine.shutdown().unwrap()
}

#[test]
fn test_letter_fixture_end_to_end() {
    let (doc, provider) = letter();
    let (tx, rx) = channel();
    let ctx = DocumentContext::new(Box::new(doc.clone()), Arc::new(provider)).with_events(tx);

    let ctx = process(ctx);

    assert_eq!(doc.body(), "To: ADA\nDear friend, greetings from Paris.\nEnd");
    assert_eq!(doc.marker_names(), vec!["Anchor".to_string()]);
    assert_eq!(doc.marker_text("Anchor").as_deref(), Some("End"));
    assert!(ctx.tree().is_empty());

    let events: Vec<Event> = rx.try_iter().collect();
    let executed = events
        .iter()
        .filter(|e| matches!(e, Event::CommandExecuted(_)))
        .count();
    let removed = events
        .iter()
        .filter(|e| matches!(e, Event::MarkerRemoved(_)))
        .count();
    assert_eq!(executed, 3);
    // The stale placeholder inside the fragment, then the three finished commands.
    assert_eq!(removed, 4);
    assert!(!events.iter().any(|e| matches!(e, Event::CommandFailed(..))));
}

#[test]
fn test_processing_twice_changes_nothing() {
    let (doc, provider) = letter();
    let config = provider.get_config().unwrap();
    let (ctx, _rx) = context_with_events(&doc, config.clone());
    process(ctx);
    let first = doc.body();

    let (ctx, rx) = context_with_events(&doc, config);
    process(ctx);
    assert_eq!(doc.body(), first);
    assert_eq!(
        count_events(&rx, |e| matches!(e, Event::CommandExecuted(_))),
        0
    );
}

#[test]
fn test_debug_mode_keeps_status_in_markers() {
    let (doc, provider) = letter();
    let mut config = provider.get_config().unwrap();
    config.settings.debug = true;

    let (ctx, _rx) = context_with_events(&doc, config.clone());
    let ctx = process(ctx);
    assert_eq!(doc.body(), "To: ADA\nDear friend, greetings from Paris.\nEnd");
    // Name, Body, City and the unrelated anchor.
    assert_eq!(doc.marker_count(), 4);
    let commands: Vec<String> = doc
        .marker_names()
        .into_iter()
        .filter(|name| name.starts_with("CMD"))
        .collect();
    assert_eq!(commands.len(), 3);
    for name in commands.iter() {
        assert!(name.contains("DONE 'true'"), "{name}");
        assert!(name.contains("ERRORS '0'"), "{name}");
    }
    assert_eq!(ctx.tree().len(), 3);
    ctx.tree().is_balanced().unwrap();

    // Reopening the document finds every command settled.
    let (ctx, rx) = context_with_events(&doc, config);
    let ctx = process(ctx);
    assert_eq!(doc.body(), "To: ADA\nDear friend, greetings from Paris.\nEnd");
    assert_eq!(
        count_events(&rx, |e| matches!(e, Event::CommandExecuted(_))),
        0
    );
    assert_eq!(ctx.tree().len(), 3);
    let mut after: Vec<String> = doc
        .marker_names()
        .into_iter()
        .filter(|name| name.starts_with("CMD"))
        .collect();
    after.sort();
    let mut before = commands;
    before.sort();
    assert_eq!(after, before);
}

#[test]
fn test_sync_markers_is_idempotent() {
    let doc = MemoryDocument::new("Value: ____");
    doc.add_marker("CMD(KIND 'insertValue' ID 'Missing')", FlowId(0), 7, 11)
        .unwrap();
    let (mut ctx, _rx) = context_with_events(&doc, DocumentConfig::default());
    let config = ctx.config().unwrap();

    ctx.scan();
    let report = ctx.execute_pass(&config);
    assert_eq!(report.failed, 1);

    let first = ctx.sync_markers(&config.settings);
    assert_eq!(first.renamed, 1);
    let names = doc.marker_names();
    assert_eq!(names.len(), 1);
    assert!(names[0].contains("ERRORS '1'"), "{}", names[0]);

    let second = ctx.sync_markers(&config.settings);
    assert_eq!(second.renamed, 0);
    assert_eq!(doc.marker_names(), names);

    // The renamed marker is not mistaken for a new command.
    assert_eq!(ctx.scan().added, 0);
    assert_eq!(ctx.tree().len(), 1);
}

#[test]
fn test_failed_commands_are_not_retried() {
    let doc = MemoryDocument::new("Value: ____");
    doc.add_marker("CMD(KIND 'insertValue' ID 'Missing')", FlowId(0), 7, 11)
        .unwrap();

    let (ctx, rx) = context_with_events(&doc, DocumentConfig::default());
    process(ctx);
    assert_eq!(
        count_events(&rx, |e| matches!(e, Event::CommandFailed(..))),
        1
    );
    assert_eq!(doc.body(), "Value: ____");

    let (ctx, rx) = context_with_events(&doc, DocumentConfig::default());
    process(ctx);
    assert_eq!(
        count_events(&rx, |e| matches!(e, Event::CommandFailed(..))),
        0
    );
}

#[test]
fn test_clean_up_runs_right_to_left() {
    // Two fragments that become adjacent; removing marks from the left one first would let the
    // right one's range collapse onto a moved boundary.
    let doc = MemoryDocument::new("[a][b]");
    doc.add_marker("CMD(KIND 'insertFragment' FRAGMENT 'A')", FlowId(0), 0, 3)
        .unwrap();
    doc.add_marker("CMD(KIND 'insertFragment' FRAGMENT 'B')", FlowId(0), 3, 6)
        .unwrap();
    let mut config = DocumentConfig::default();
    config.settings.debug = true;
    for (id, text) in [("A", "one"), ("B", "two")] {
        config.fragments.insert(
            id.to_string(),
            Fragment {
                text: text.to_string(),
                markers: Vec::new(),
            },
        );
    }

    let (mut ctx, _rx) = context_with_events(&doc, config.clone());
    ctx.scan();
    ctx.execute_pass(&config);
    assert_eq!(doc.body(), "<one><two>");
    assert_eq!(ctx.clean_up(), 2);
    assert_eq!(doc.body(), "onetwo");
    assert_eq!(ctx.clean_up(), 0);
    ctx.tree().is_balanced().unwrap();
    let texts: Vec<Option<String>> = ctx
        .tree()
        .dfs()
        .into_iter()
        .map(|id| ctx.tree().get(id).and_then(|n| n.range()).and_then(|r| r.text()))
        .collect();
    assert_eq!(
        texts,
        vec![Some("one".to_string()), Some("two".to_string())]
    );
}

#[test]
fn test_form_request_pauses_until_resumed() {
    let doc = MemoryDocument::new("Subject: ____");
    doc.add_marker("CMD(KIND 'form' FORM(TITLE 'Subject'))", FlowId(0), 9, 13)
        .unwrap();
    doc.add_marker("CMD(KIND 'insertValue' ID 'Subject')", FlowId(0), 9, 13)
        .unwrap();
    let mut config = DocumentConfig::default();
    config
        .values
        .insert("Subject".to_string(), "Hello".to_string());
    let (ctx, rx) = context_with_events(&doc, config);

    let engine = Engine::start(ctx).unwrap();
    engine.submit(Op::Process);
    assert!(engine.handle().wait_settled(WAIT));
    assert_eq!(engine.state(), EngineState::Paused);
    // Insert marks are still in place while the form is shown.
    assert_eq!(doc.body(), "Subject: Hello");
    let forms: Vec<Event> = rx
        .try_iter()
        .filter(|e| matches!(e, Event::FormRequested(_)))
        .collect();
    assert_eq!(
        forms,
        vec![Event::FormRequested("FORM(TITLE 'Subject')".to_string())]
    );

    engine.resume();
    assert!(engine.handle().wait_settled(WAIT));
    assert_eq!(engine.state(), EngineState::Idle);
    engine.shutdown().unwrap();
    assert_eq!(doc.marker_count(), 0);
}

#[test]
fn test_fragment_markers_inside_other_flows() {
    let doc = MemoryDocument::new("body");
    let frame = doc.add_flow("[x]");
    doc.add_marker("CMD(KIND 'insertFragment' FRAGMENT 'F')", frame, 0, 3)
        .unwrap();
    let mut config = DocumentConfig::default();
    config.settings.insert_marks = false;
    config.values.insert("V".to_string(), "42".to_string());
    config.fragments.insert(
        "F".to_string(),
        Fragment {
            text: "n=?".to_string(),
            markers: vec![FragmentMarker {
                name: "CMD(KIND 'insertValue' ID 'V')".to_string(),
                start: 2,
                end: 3,
            }],
        },
    );

    let (ctx, _rx) = context_with_events(&doc, config);
    process(ctx);
    assert_eq!(doc.body(), "body");
    assert_eq!(doc.text(frame).as_deref(), Some("n=42"));
    assert_eq!(doc.marker_count(), 0);
}

#[test]
fn test_misconfigured_fragment_touches_nothing() {
    let doc = MemoryDocument::new("[outer [x] ]");
    doc.add_marker("CMD(KIND 'insertFragment' FRAGMENT 'F')", FlowId(0), 0, 12)
        .unwrap();
    doc.add_marker("CMD(KIND 'insertValue' ID 'V')", FlowId(0), 7, 10)
        .unwrap();
    let mut config = DocumentConfig::default();
    config.values.insert("V".to_string(), "v".to_string());
    config.fragments.insert(
        "F".to_string(),
        Fragment {
            text: "short".to_string(),
            markers: vec![FragmentMarker {
                name: "CMD(KIND 'insertValue' ID 'V')".to_string(),
                start: 2,
                end: 40,
            }],
        },
    );

    let (mut ctx, _rx) = context_with_events(&doc, config.clone());
    ctx.scan();
    let report = ctx.execute_pass(&config);
    assert_eq!(report.failed, 1);
    // The nested value command was not retired and still runs.
    assert_eq!(report.executed, 1);
    assert_eq!(doc.body(), "[outer v ]");
    assert_eq!(doc.marker_count(), 2);
}
