//! Async event loop for live sessions.
//!
//! [`drive`] owns a [`Session`] for the lifetime of a page: it runs the
//! analysis, applies page events as they arrive, fires the progress interval
//! and the re-index debounce on time, and sends every report to the caller.
//! Time is taken from the tokio clock, so paused-clock tests run instantly.

use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, warn};

use crate::dom_tree::NodeId;
use crate::layout::{LiveLayout, PlaybackState};
use crate::report::Report;
use crate::session::{Mutation, Session};

/// Something that happened on the page.
#[derive(Debug, Clone, PartialEq)]
pub enum PageEvent {
    Mutation(Mutation),
    Title(String),
    Scroll { x: f64, y: f64 },
    Resize { width: f64, height: f64 },
    Playback { node: NodeId, state: PlaybackState },
    /// The page is going away; the session is disposed
    Unload,
}

fn now() -> std::time::Instant {
    Instant::now().into_std()
}

/// Run a session until the page unloads, the event channel closes or the
/// report receiver is dropped. Returns the disposed session.
pub async fn drive<L: LiveLayout + Send>(
    mut session: Session<L>, mut events: mpsc::Receiver<PageEvent>, reports: mpsc::Sender<Report>,
) -> Session<L> {
    if let Some(report) = session.analyze(now())
        && reports.send(report).await.is_err()
    {
        session.dispose();
        return session;
    }

    loop {
        let deadline = session.next_deadline().map(Instant::from_std);
        let report = tokio::select! {
            maybe = events.recv() => {
                let Some(event) = maybe else { break };
                match event {
                    PageEvent::Mutation(mutation) => {
                        if let Err(e) = session.apply_mutation(mutation, now()) {
                            warn!(error = %e, "mutation ignored");
                        }
                        None
                    }
                    PageEvent::Title(title) => session.set_title(&title),
                    PageEvent::Scroll { x, y } => {
                        session.layout_mut().scroll_to(x, y);
                        session.viewport_changed();
                        None
                    }
                    PageEvent::Resize { width, height } => {
                        session.layout_mut().resize(width, height);
                        session.viewport_changed();
                        None
                    }
                    PageEvent::Playback { node, state } => {
                        session.layout_mut().set_playback(node, state);
                        None
                    }
                    PageEvent::Unload => break,
                }
            }
            _ = async {
                if let Some(deadline) = deadline {
                    sleep_until(deadline).await;
                }
            }, if deadline.is_some() => session.poll(now()),
        };

        if let Some(report) = report
            && reports.send(report).await.is_err()
        {
            debug!("report receiver dropped");
            break;
        }
    }

    session.dispose();
    session
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{StaticLayout, Viewport};
    use crate::select::ContentType;
    use crate::session::AnalysisConfig;

    fn chapter_session(viewport_height: f64) -> Session<StaticLayout> {
        let paragraphs: String = (1..=10)
            .map(|i| format!("<p>Paragraph {i}, with a lantern, a map, and the long road north.</p>"))
            .collect();
        let html = format!(
            r#"<html><head><title>Lantern - Chapter 9</title></head><body>
            <div id="text"><h3>Chapter 9</h3>{paragraphs}</div></body></html>"#
        );
        let mut session = Session::from_html(&html, None, AnalysisConfig::default()).unwrap();
        session
            .layout_mut()
            .set_viewport(Viewport { scroll_x: 0.0, scroll_y: 0.0, width: 1280.0, height: viewport_height });
        session
    }

    #[tokio::test(start_paused = true)]
    async fn test_drive_reports_scroll_progress() {
        let (event_tx, event_rx) = mpsc::channel(8);
        let (report_tx, mut report_rx) = mpsc::channel(8);
        let handle = tokio::spawn(drive(chapter_session(30.0), event_rx, report_tx));

        let first = report_rx.recv().await.unwrap();
        assert_eq!(first.content_type, Some(ContentType::Text));
        assert!(first.progress < 1.0);

        event_tx.send(PageEvent::Resize { width: 1280.0, height: 10_000.0 }).await.unwrap();
        let second = report_rx.recv().await.unwrap();
        assert_eq!(second.progress, 1.0);

        event_tx.send(PageEvent::Unload).await.unwrap();
        let session = handle.await.unwrap();
        assert!(session.is_disposed());
        assert!(report_rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drive_stops_when_events_close() {
        let (event_tx, event_rx) = mpsc::channel(1);
        let (report_tx, mut report_rx) = mpsc::channel(8);
        let handle = tokio::spawn(drive(chapter_session(800.0), event_rx, report_tx));

        assert!(report_rx.recv().await.is_some());
        drop(event_tx);
        let session = handle.await.unwrap();
        assert!(session.is_disposed());
        assert!(session.is_analyzed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drive_playback_events() {
        let session =
            Session::from_html(r#"<html><body><video id="v"></video></body></html>"#, None, AnalysisConfig::default())
                .unwrap();
        let video = session.document().tree().element_by_id("v").unwrap();
        let (event_tx, event_rx) = mpsc::channel(8);
        let (report_tx, mut report_rx) = mpsc::channel(8);
        let handle = tokio::spawn(drive(session, event_rx, report_tx));

        assert_eq!(report_rx.recv().await.unwrap().content_type, Some(ContentType::Video));
        let state = PlaybackState { current_time: 30.0, duration: Some(120.0), ended: false };
        event_tx.send(PageEvent::Playback { node: video, state }).await.unwrap();
        assert_eq!(report_rx.recv().await.unwrap().progress, 0.25);

        let ended = PlaybackState { current_time: 120.0, duration: Some(120.0), ended: true };
        event_tx.send(PageEvent::Playback { node: video, state: ended }).await.unwrap();
        assert_eq!(report_rx.recv().await.unwrap().progress, 1.0);

        event_tx.send(PageEvent::Unload).await.unwrap();
        handle.await.unwrap();
    }
}
